use anyhow::{bail, Result};
use log::info;
use serde::Serialize;
use toml::Value;

use crate::base::port::Cycle;
use crate::cache::{CacheConfig, PerfStats};
use crate::fabric::{CacheCluster, ClusterConfig};
use crate::sim::config::{Config, SimConfig};
use crate::sim::toy_mem::ToyMemory;
use crate::traffic::{TrafficConfig, TrafficDriver};

/// All config sections of one simulation, one toml table each.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimOptions {
    pub sim: SimConfig,
    pub cluster: ClusterConfig,
    pub cache: CacheConfig,
    pub xlat: CacheConfig,
    pub traffic: TrafficConfig,
}

impl SimOptions {
    pub fn from_toml(text: &str) -> Result<Self> {
        let value: Value = text.parse()?;
        Ok(SimOptions {
            sim: SimConfig::from_section(value.get("sim")),
            cluster: ClusterConfig::from_section(value.get("cluster")),
            cache: CacheConfig::from_section(value.get("cache")),
            xlat: CacheConfig::from_section(value.get("xlat")),
            traffic: TrafficConfig::from_section(value.get("traffic")),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct SimReport {
    pub cycles: Cycle,
    pub requests_completed: u64,
    pub stats: PerfStats,
}

pub struct SimTop {
    pub cluster: CacheCluster,
    pub mem: ToyMemory,
    pub driver: TrafficDriver,
    timeout: Cycle,
}

impl SimTop {
    pub fn new(opts: &SimOptions) -> Result<SimTop> {
        let cluster = CacheCluster::new("cluster0", &opts.cluster, opts.cache, opts.xlat)?;
        let mem = ToyMemory::new(opts.cluster.mem_ports, opts.sim.mem_latency);
        mem.attach(&cluster);
        let driver = TrafficDriver::new(
            opts.traffic,
            opts.cluster.num_lanes,
            opts.cluster.num_slots,
        );
        driver.attach(&cluster);
        Ok(SimTop {
            cluster,
            mem,
            driver,
            timeout: opts.sim.timeout,
        })
    }

    /// Lock-step run until the traffic drains or the timeout trips.
    pub fn run(&mut self) -> Result<SimReport> {
        for now in 0..self.timeout {
            self.driver.tick(now)?;
            self.cluster.tick(now)?;
            self.mem.tick(now);
            if self.driver.done() {
                info!("simulation finished at cycle {}", now);
                return Ok(SimReport {
                    cycles: now,
                    requests_completed: self.driver.completed(),
                    stats: self.cluster.perf_stats(),
                });
            }
        }
        bail!(
            "simulation timed out after {} cycles ({} requests completed)",
            self.timeout,
            self.driver.completed()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{SimOptions, SimTop};

    #[test]
    fn strided_run_completes_all_requests() {
        let text = r#"
            [sim]
            timeout = 200000
            mem_latency = 10

            [cluster]
            num_lanes = 4
            num_slots = 2
            num_units = 2

            [traffic]
            requests_per_lane = 32
            stride = 8
        "#;
        let opts = SimOptions::from_toml(text).unwrap();
        let mut top = SimTop::new(&opts).unwrap();
        let report = top.run().unwrap();
        assert_eq!(report.requests_completed, 4 * 32);
        assert!(report.stats.reads > 0);
    }

    #[test]
    fn translated_run_completes_all_requests() {
        let text = r#"
            [sim]
            timeout = 400000

            [cluster]
            num_lanes = 2
            num_slots = 1
            num_units = 1
            xlat_enable = true
            xlat_entries = 4

            [cache]
            bypass = true

            [traffic]
            requests_per_lane = 16
            phys_offset = 0x100000
        "#;
        let opts = SimOptions::from_toml(text).unwrap();
        let mut top = SimTop::new(&opts).unwrap();
        let report = top.run().unwrap();
        assert_eq!(report.requests_completed, 2 * 16);
    }

    #[test]
    fn random_run_with_writes_completes() {
        let text = r#"
            [cluster]
            num_lanes = 2
            num_slots = 1
            num_units = 2

            [traffic]
            pattern = "random"
            requests_per_lane = 24
            addr_range = 4096
            write_every = 4
            seed = 7
        "#;
        let opts = SimOptions::from_toml(text).unwrap();
        let mut top = SimTop::new(&opts).unwrap();
        let report = top.run().unwrap();
        assert_eq!(report.requests_completed, 2 * 24);
        assert!(report.stats.writes > 0);
    }

    #[test]
    fn bad_cluster_config_fails_construction() {
        let text = r#"
            [cluster]
            num_lanes = 0
        "#;
        let opts = SimOptions::from_toml(text).unwrap();
        assert!(SimTop::new(&opts).is_err());
    }
}
