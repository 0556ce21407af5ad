use crate::sim::config::Config;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ClusterConfig {
    /// Core-side lanes feeding each input arbiter.
    pub num_lanes: usize,
    /// Input slots per unit (request streams kept distinct end to end).
    pub num_slots: usize,
    /// Cache engines; zero collapses to one bypass engine.
    pub num_units: usize,
    /// Cluster-level memory ports.
    pub mem_ports: usize,
    pub xlat_enable: bool,
    /// Translation cache instances per stage; zero forces stage bypass.
    pub xlat_units: usize,
    /// Pending-translation table entries per unit.
    pub xlat_entries: usize,
}

impl Config for ClusterConfig {}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            num_lanes: 4,
            num_slots: 2,
            num_units: 2,
            mem_ports: 1,
            xlat_enable: false,
            xlat_units: 1,
            xlat_entries: 8,
        }
    }
}
