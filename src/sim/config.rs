use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use toml::Value;

use crate::base::port::Cycle;

/// A config struct deserializable from one section of the toml document.  A
/// missing section falls back to defaults with a warning rather than a hard
/// error, so small configs stay small.
pub trait Config: DeserializeOwned + Default {
    fn from_section(section: Option<&Value>) -> Self {
        match section {
            Some(value) => value.clone().try_into().expect("cannot deserialize config"),
            None => {
                warn!("config section not found");
                Self::default()
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct SimConfig {
    /// Cycles before an unfinished run is declared hung.
    pub timeout: Cycle,
    /// Backing-memory access latency.
    pub mem_latency: Cycle,
}

impl Config for SimConfig {}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            timeout: 1000000,
            mem_latency: 20,
        }
    }
}
