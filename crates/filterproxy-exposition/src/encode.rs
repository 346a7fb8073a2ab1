use filterproxy_common::error::{ProxyError, Result};
use prometheus::{
    Encoder, TextEncoder,
    proto::{MetricFamily, MetricType},
};

pub fn text_content_type() -> String {
    TextEncoder::new().format_type().to_string()
}

/// Renders families in the text exposition format, keeping their order.
/// Families must not be empty.
///
/// `TextEncoder` cannot write untyped families, so runs of those are written
/// here and everything else goes through the encoder.
pub fn encode_text(families: &[MetricFamily]) -> Result<Vec<u8>> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    for run in families.chunk_by(|left, right| is_untyped(left) == is_untyped(right)) {
        if run.first().is_some_and(is_untyped) {
            for family in run {
                write_untyped(family, &mut buffer)?;
            }
        } else {
            encoder
                .encode(run, &mut buffer)
                .map_err(|err| ProxyError::Encode(err.to_string()))?;
        }
    }
    Ok(buffer)
}

fn is_untyped(family: &MetricFamily) -> bool {
    family.get_field_type() == MetricType::UNTYPED
}

fn write_untyped(family: &MetricFamily, buffer: &mut Vec<u8>) -> Result<()> {
    let name = family.get_name();
    if name.is_empty() || family.get_metric().is_empty() {
        return Err(ProxyError::Encode(format!(
            "untyped family {name:?} has no name or no metrics"
        )));
    }

    let mut out = String::new();
    if !family.get_help().is_empty() {
        out.push_str(&format!("# HELP {name} {}\n", escape(family.get_help(), false)));
    }
    out.push_str(&format!("# TYPE {name} untyped\n"));

    for metric in family.get_metric() {
        out.push_str(name);
        let labels = metric
            .get_label()
            .iter()
            .map(|pair| format!("{}=\"{}\"", pair.get_name(), escape(pair.get_value(), true)))
            .collect::<Vec<_>>();
        if !labels.is_empty() {
            out.push_str(&format!("{{{}}}", labels.join(",")));
        }
        out.push_str(&format!(" {}", metric.get_untyped().get_value()));
        if metric.get_timestamp_ms() != 0 {
            out.push_str(&format!(" {}", metric.get_timestamp_ms()));
        }
        out.push('\n');
    }

    buffer.extend_from_slice(out.as_bytes());
    Ok(())
}

/// Escapes backslashes and newlines, and double quotes inside label values.
fn escape(value: &str, quotes: bool) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '"' if quotes => escaped.push_str("\\\""),
            c => escaped.push(c),
        }
    }
    escaped
}
