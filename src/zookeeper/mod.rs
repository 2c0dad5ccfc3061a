//! Scraping ZooKeeper members with the `mntr` and `ruok` four-letter words.

mod collect;
mod key;
mod parse;
mod probe;
mod render;

pub use collect::Collector;
pub use key::{MetricKey, Snapshot};
pub use parse::{Parsed, parse};
pub use probe::{MAX_TIMEOUT, ProbeError, Prober};
pub use render::render;
