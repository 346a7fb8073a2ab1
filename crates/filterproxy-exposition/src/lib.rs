//! Exposition format handling for the filter proxy.
//!
//! Upstream bodies are decoded into `prometheus::proto::MetricFamily`
//! records, narrowed by [`filter::filter`] and written back out in the text
//! format.

use std::sync::Arc;

pub mod decode;
pub mod encode;
pub mod filter;
mod text;

pub use decode::{ExpositionFormat, decode};
pub use encode::{encode_text, text_content_type};
pub use filter::filter;
pub use prometheus::proto::{LabelPair, Metric, MetricFamily, MetricType};

/// Decoded families of one upstream scrape, shared between readers.
pub type Snapshot = Arc<Vec<MetricFamily>>;
