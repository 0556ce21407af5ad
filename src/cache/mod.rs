mod config;
mod engine;
mod stats;
mod tags;

pub use config::CacheConfig;
pub use engine::{CacheEngine, MemUnit};
pub use stats::PerfStats;
pub use tags::CacheTagArray;
