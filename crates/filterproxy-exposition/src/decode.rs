use std::collections::HashMap;

use filterproxy_common::error::{ProxyError, Result};
use prometheus::proto::MetricFamily;
use protobuf::CodedInputStream;
use tracing::trace;

use crate::text;

const PROTOBUF_MEDIA_TYPE: &str = "application/vnd.google.protobuf";
const METRIC_FAMILY_PROTO: &str = "io.prometheus.client.MetricFamily";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpositionFormat {
    Text,
    ProtobufDelimited,
}

impl ExpositionFormat {
    /// Picks the decoder for a response `Content-Type`. Anything that is not
    /// the Prometheus protobuf media type is read as text.
    pub fn from_content_type(content_type: Option<&str>) -> Result<Self> {
        let Some(content_type) = content_type else {
            return Ok(Self::Text);
        };

        let mut parts = content_type.split(';').map(str::trim);
        let media_type = parts.next().unwrap_or_default().to_ascii_lowercase();
        if media_type != PROTOBUF_MEDIA_TYPE {
            return Ok(Self::Text);
        }

        let params = parts
            .filter_map(|param| param.split_once('='))
            .map(|(key, value)| {
                (
                    key.trim().to_ascii_lowercase(),
                    value.trim().trim_matches('"').to_string(),
                )
            })
            .collect::<HashMap<_, _>>();

        let proto = params.get("proto").map(String::as_str);
        let encoding = params.get("encoding").map(String::as_str);
        match (proto, encoding) {
            (Some(METRIC_FAMILY_PROTO), Some("delimited")) => Ok(Self::ProtobufDelimited),
            _ => Err(ProxyError::Decode(format!(
                "unsupported exposition content type: {content_type}"
            ))),
        }
    }
}

/// Decodes a complete response body. Any error discards everything decoded so far.
pub fn decode(body: &[u8], content_type: Option<&str>) -> Result<Vec<MetricFamily>> {
    let format = ExpositionFormat::from_content_type(content_type)?;
    let families = match format {
        ExpositionFormat::Text => decode_text(body)?,
        ExpositionFormat::ProtobufDelimited => decode_delimited(body)?,
    };
    trace!(?format, bytes = body.len(), families = families.len(), "decoded exposition body");
    Ok(families)
}

fn decode_delimited(body: &[u8]) -> Result<Vec<MetricFamily>> {
    let mut input = CodedInputStream::from_bytes(body);
    let mut families = Vec::new();
    while !input.eof().map_err(decode_error)? {
        let mut family: MetricFamily = input.read_message().map_err(decode_error)?;
        drop_infinite_buckets(&mut family);
        families.push(family);
    }
    Ok(families)
}

fn decode_text(body: &[u8]) -> Result<Vec<MetricFamily>> {
    let text = std::str::from_utf8(body)
        .map_err(|err| ProxyError::Decode(format!("body is not valid utf-8: {err}")))?;
    text::parse(text)
}

/// Folds an explicit `+Inf` bucket into the sample count. Text output writes
/// that bucket from the count.
fn drop_infinite_buckets(family: &mut MetricFamily) {
    for metric in family.mut_metric().iter_mut() {
        if !metric.has_histogram() {
            continue;
        }
        let histogram = metric.mut_histogram();
        let Some(position) = histogram
            .get_bucket()
            .iter()
            .position(|bucket| bucket.get_upper_bound() == f64::INFINITY)
        else {
            continue;
        };
        let infinite = histogram.mut_bucket().remove(position);
        if !histogram.has_sample_count() {
            histogram.set_sample_count(infinite.get_cumulative_count());
        }
    }
}

fn decode_error(err: impl std::fmt::Display) -> ProxyError {
    ProxyError::Decode(err.to_string())
}
