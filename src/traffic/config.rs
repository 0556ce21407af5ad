use serde::Deserialize;

use crate::sim::config::Config;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrafficPattern {
    #[default]
    Strided,
    Random,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct TrafficConfig {
    pub pattern: TrafficPattern,
    pub requests_per_lane: u64,
    pub base_addr: u64,
    /// Strided pattern: byte distance between consecutive accesses.
    pub stride: u64,
    /// Random pattern: addresses fall in [base_addr, base_addr + addr_range).
    pub addr_range: u64,
    /// Every nth request is a store; zero means loads only.
    pub write_every: u64,
    /// Stores expect an acknowledgement (the cache's write-response flag).
    pub expect_write_ack: bool,
    /// Outstanding requests allowed per lane.
    pub max_inflight: usize,
    pub seed: u64,
    /// Pre-resolved translation distance carried in each request; zero
    /// leaves requests untranslated.
    pub phys_offset: u64,
}

impl Config for TrafficConfig {}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            pattern: TrafficPattern::Strided,
            requests_per_lane: 64,
            base_addr: 0x1_0000,
            stride: 8,
            addr_range: 0x1_0000,
            write_every: 0,
            expect_write_ack: false,
            max_inflight: 4,
            seed: 1,
            phys_offset: 0,
        }
    }
}
