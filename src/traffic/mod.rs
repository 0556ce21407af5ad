mod config;
mod driver;

pub use config::{TrafficConfig, TrafficPattern};
pub use driver::TrafficDriver;
