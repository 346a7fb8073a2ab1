use std::collections::HashMap;

use filterproxy_common::error::{ProxyError, Result};
use prometheus::proto::{
    Bucket, Counter, Gauge, Histogram, LabelPair, Metric, MetricFamily, MetricType, Quantile,
    Summary, Untyped,
};
use prometheus_parse::SampleType;
use protobuf::RepeatedField;

const BUCKET_LABEL: &str = "le";
const QUANTILE_LABEL: &str = "quantile";

type Labels = Vec<(String, String)>;

/// One `name{labels} value [timestamp]` line with its label values unescaped.
#[derive(Debug, PartialEq)]
struct SampleLine {
    name: String,
    labels: Labels,
    value: f64,
    timestamp: Option<i64>,
}

/// Which part of a family a sample line feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Plain,
    Bucket,
    Sum,
    Count,
}

/// Parses a text exposition body into families.
///
/// Families come out in the order they are first mentioned, by a `# HELP`
/// or `# TYPE` line or by a sample. Every sample line must parse.
pub(crate) fn parse(text: &str) -> Result<Vec<MetricFamily>> {
    let mut builder = FamilyBuilder::default();
    for (index, line) in text.lines().enumerate() {
        builder
            .line(index, line.trim())
            .map_err(|reason| ProxyError::Decode(format!("line {}: {reason}", index + 1)))?;
    }
    Ok(builder.finish())
}

#[derive(Default)]
struct FamilyBuilder {
    help: HashMap<String, String>,
    types: HashMap<String, MetricType>,
    first_seen: HashMap<String, usize>,
    families: Vec<PendingFamily>,
    index: HashMap<String, usize>,
}

struct PendingFamily {
    first_line: usize,
    family: MetricFamily,
    series: HashMap<Labels, usize>,
}

impl FamilyBuilder {
    fn line(&mut self, index: usize, line: &str) -> std::result::Result<(), String> {
        if line.is_empty() {
            return Ok(());
        }
        if let Some(comment) = line.strip_prefix('#') {
            self.comment(index, comment.trim_start());
            return Ok(());
        }
        let sample = parse_sample_line(line)?;
        self.sample(index, sample)
    }

    fn comment(&mut self, index: usize, comment: &str) {
        let mut words = comment.splitn(3, char::is_whitespace);
        let (Some(keyword), Some(name)) = (words.next(), words.next()) else {
            return;
        };
        let rest = words.next().unwrap_or_default().trim();
        match keyword {
            "HELP" => {
                self.help.insert(name.to_string(), unescape_help(rest));
            }
            "TYPE" => {
                let metric_type = match SampleType::parse(rest) {
                    SampleType::Counter => MetricType::COUNTER,
                    SampleType::Gauge => MetricType::GAUGE,
                    SampleType::Histogram => MetricType::HISTOGRAM,
                    SampleType::Summary => MetricType::SUMMARY,
                    SampleType::Untyped => MetricType::UNTYPED,
                };
                self.types.insert(name.to_string(), metric_type);
            }
            _ => return,
        }
        self.first_seen.entry(name.to_string()).or_insert(index);
    }

    /// Maps a sample name to its family. `_bucket`, `_sum` and `_count`
    /// series only join a family declared as a histogram or summary.
    fn resolve(&self, name: &str) -> (String, MetricType, Role) {
        if let Some(metric_type) = self.types.get(name) {
            return (name.to_string(), *metric_type, Role::Plain);
        }
        for (suffix, role) in [
            ("_bucket", Role::Bucket),
            ("_sum", Role::Sum),
            ("_count", Role::Count),
        ] {
            let Some(base) = name.strip_suffix(suffix) else {
                continue;
            };
            match self.types.get(base) {
                Some(MetricType::HISTOGRAM) => {
                    return (base.to_string(), MetricType::HISTOGRAM, role);
                }
                Some(MetricType::SUMMARY) if role != Role::Bucket => {
                    return (base.to_string(), MetricType::SUMMARY, role);
                }
                _ => {}
            }
        }
        (name.to_string(), MetricType::UNTYPED, Role::Plain)
    }

    fn sample(&mut self, index: usize, sample: SampleLine) -> std::result::Result<(), String> {
        let (family_name, metric_type, role) = self.resolve(&sample.name);
        let SampleLine {
            name,
            mut labels,
            value,
            timestamp,
        } = sample;
        labels.sort();

        let position = self.family_position(index, &family_name, metric_type);
        let pending = &mut self.families[position];

        match (metric_type, role) {
            (MetricType::COUNTER | MetricType::GAUGE | MetricType::UNTYPED, _) => {
                let mut metric = new_metric(labels, timestamp);
                match metric_type {
                    MetricType::COUNTER => {
                        let mut counter = Counter::default();
                        counter.set_value(value);
                        metric.set_counter(counter);
                    }
                    MetricType::GAUGE => {
                        let mut gauge = Gauge::default();
                        gauge.set_value(value);
                        metric.set_gauge(gauge);
                    }
                    _ => {
                        let mut untyped = Untyped::default();
                        untyped.set_value(value);
                        metric.set_untyped(untyped);
                    }
                }
                pending.family.mut_metric().push(metric);
            }
            (MetricType::HISTOGRAM, Role::Plain) => {
                return Err(format!("sample {name} does not belong to histogram {family_name}"));
            }
            (MetricType::HISTOGRAM, Role::Bucket) => {
                let bound = take_bound(&mut labels, BUCKET_LABEL, &name)?;
                let histogram = pending.series(labels, timestamp).mut_histogram();
                if bound == f64::INFINITY {
                    // Writers derive the +Inf bucket from the sample count.
                    if !histogram.has_sample_count() {
                        histogram.set_sample_count(value as u64);
                    }
                } else {
                    let mut bucket = Bucket::default();
                    bucket.set_upper_bound(bound);
                    bucket.set_cumulative_count(value as u64);
                    histogram.mut_bucket().push(bucket);
                }
            }
            (MetricType::HISTOGRAM, aggregate) => {
                let histogram = pending.series(labels, timestamp).mut_histogram();
                if aggregate == Role::Sum {
                    histogram.set_sample_sum(value);
                } else {
                    histogram.set_sample_count(value as u64);
                }
            }
            (MetricType::SUMMARY, Role::Plain) => {
                let bound = take_bound(&mut labels, QUANTILE_LABEL, &name)?;
                let mut quantile = Quantile::default();
                quantile.set_quantile(bound);
                quantile.set_value(value);
                pending
                    .series(labels, timestamp)
                    .mut_summary()
                    .mut_quantile()
                    .push(quantile);
            }
            (MetricType::SUMMARY, aggregate) => {
                let summary = pending.series(labels, timestamp).mut_summary();
                if aggregate == Role::Sum {
                    summary.set_sample_sum(value);
                } else {
                    summary.set_sample_count(value as u64);
                }
            }
        }
        Ok(())
    }

    fn family_position(&mut self, index: usize, name: &str, metric_type: MetricType) -> usize {
        if let Some(position) = self.index.get(name) {
            return *position;
        }

        let mut family = MetricFamily::default();
        family.set_name(name.to_string());
        if let Some(help) = self.help.get(name) {
            family.set_help(help.clone());
        }
        family.set_field_type(metric_type);
        self.families.push(PendingFamily {
            first_line: self.first_seen.get(name).copied().unwrap_or(index),
            family,
            series: HashMap::new(),
        });
        self.index.insert(name.to_string(), self.families.len() - 1);
        self.families.len() - 1
    }

    fn finish(mut self) -> Vec<MetricFamily> {
        self.families.sort_by_key(|pending| pending.first_line);
        self.families
            .into_iter()
            .map(|pending| pending.family)
            .collect()
    }
}

impl PendingFamily {
    /// The histogram or summary metric for `labels`, created on first use.
    fn series(&mut self, labels: Labels, timestamp: Option<i64>) -> &mut Metric {
        let position = match self.series.get(&labels) {
            Some(position) => *position,
            None => {
                let metric_type = self.family.get_field_type();
                let mut metric = new_metric(labels.clone(), timestamp);
                if metric_type == MetricType::HISTOGRAM {
                    metric.set_histogram(Histogram::default());
                } else {
                    metric.set_summary(Summary::default());
                }
                self.family.mut_metric().push(metric);
                let position = self.family.get_metric().len() - 1;
                self.series.insert(labels, position);
                position
            }
        };
        &mut self.family.mut_metric()[position]
    }
}

fn new_metric(labels: Labels, timestamp: Option<i64>) -> Metric {
    let pairs = labels
        .into_iter()
        .map(|(name, value)| {
            let mut pair = LabelPair::default();
            pair.set_name(name);
            pair.set_value(value);
            pair
        })
        .collect();

    let mut metric = Metric::default();
    metric.set_label(RepeatedField::from_vec(pairs));
    if let Some(timestamp) = timestamp {
        metric.set_timestamp_ms(timestamp);
    }
    metric
}

/// Removes the `le` or `quantile` label and returns its value.
fn take_bound(labels: &mut Labels, label: &str, name: &str) -> std::result::Result<f64, String> {
    let position = labels
        .iter()
        .position(|(key, _)| key == label)
        .ok_or_else(|| format!("sample {name} is missing the {label} label"))?;
    let (_, raw) = labels.remove(position);
    raw.parse::<f64>()
        .map_err(|_| format!("invalid {label} value {raw:?}"))
}

fn parse_sample_line(line: &str) -> std::result::Result<SampleLine, String> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .unwrap_or(line.len());
    let name = &line[..name_end];
    if !is_metric_name(name) {
        return Err(format!("invalid metric name {name:?}"));
    }

    let mut rest = &line[name_end..];
    let mut labels = Vec::new();
    if let Some(inner) = rest.strip_prefix('{') {
        rest = parse_labels(inner, &mut labels)?;
    }

    let mut fields = rest.split_whitespace();
    let value = fields
        .next()
        .ok_or_else(|| "missing sample value".to_string())?;
    let value = value
        .parse::<f64>()
        .map_err(|_| format!("invalid sample value {value:?}"))?;

    let timestamp = fields
        .next()
        .map(|timestamp| {
            timestamp
                .parse::<i64>()
                .map_err(|_| format!("invalid timestamp {timestamp:?}"))
        })
        .transpose()?;
    if fields.next().is_some() {
        return Err("unexpected trailing fields".to_string());
    }

    Ok(SampleLine {
        name: name.to_string(),
        labels,
        value,
        timestamp,
    })
}

/// Reads `name="value",...}` and returns what follows the closing brace.
fn parse_labels<'a>(
    mut input: &'a str,
    labels: &mut Labels,
) -> std::result::Result<&'a str, String> {
    loop {
        input = input.trim_start();
        if let Some(rest) = input.strip_prefix('}') {
            return Ok(rest);
        }

        let (name, rest) = input
            .split_once('=')
            .ok_or_else(|| "unterminated label set".to_string())?;
        let name = name.trim();
        if !is_label_name(name) {
            return Err(format!("invalid label name {name:?}"));
        }
        if labels.iter().any(|(existing, _)| existing == name) {
            return Err(format!("duplicate label {name:?}"));
        }

        let rest = rest
            .trim_start()
            .strip_prefix('"')
            .ok_or_else(|| format!("label {name:?} has an unquoted value"))?;
        let (value, rest) = read_quoted(rest)?;
        labels.push((name.to_string(), value));

        input = rest.trim_start();
        if let Some(rest) = input.strip_prefix(',') {
            input = rest;
        } else if !input.starts_with('}') {
            return Err("expected , or } after label value".to_string());
        }
    }
}

/// Reads an escaped label value up to its closing quote.
fn read_quoted(input: &str) -> std::result::Result<(String, &str), String> {
    let mut value = String::new();
    let mut chars = input.char_indices();
    while let Some((offset, c)) = chars.next() {
        match c {
            '"' => return Ok((value, &input[offset + 1..])),
            '\\' => match chars.next() {
                Some((_, '\\')) => value.push('\\'),
                Some((_, '"')) => value.push('"'),
                Some((_, 'n')) => value.push('\n'),
                Some((_, other)) => return Err(format!("invalid escape \\{other} in label value")),
                None => break,
            },
            c => value.push(c),
        }
    }
    Err("unterminated label value".to_string())
}

fn unescape_help(raw: &str) -> String {
    let mut help = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            help.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => help.push('\\'),
            Some('n') => help.push('\n'),
            Some(other) => {
                help.push('\\');
                help.push(other);
            }
            None => help.push('\\'),
        }
    }
    help
}

fn is_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn is_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
