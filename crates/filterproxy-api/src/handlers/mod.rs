pub mod discovery;
pub mod metrics;
