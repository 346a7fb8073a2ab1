//! HTTP surface of the filter proxy.
//!
//! Every configured endpoint is mounted at its own path. Static endpoints
//! answer with their filtered snapshot, cluster endpoints answer with a
//! discovery document at their mount path and with per-address snapshots
//! below it, and `/` lists the discovery entries of every endpoint.

pub mod error;
pub mod handlers;
pub mod query;
pub mod router;

pub use error::ApiError;
pub use query::parse_label_filter;
pub use router::{Mount, proxy_router};
