pub mod error;
pub mod time;
pub mod types;

pub use error::{ProxyError, Result};
pub use time::{Clock, ManualClock, SystemClock};
pub use types::{DiscoveryEntry, LabelFilter};
