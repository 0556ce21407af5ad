use crate::base::port::Cycle;
use crate::sim::config::Config;
use anyhow::{bail, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct CacheConfig {
    /// Total capacity in bytes.
    pub size: u64,
    /// Line size in bytes.
    pub line_size: u64,
    /// Word size in bytes.
    pub word_size: u64,
    /// Associativity (ways per set).
    pub ways: u64,
    pub num_banks: usize,
    pub addr_width: u32,
    /// Request ports each bank accepts per cycle.
    pub ports_per_bank: usize,
    /// Core-side request slots.
    pub num_inputs: usize,
    /// Memory-side ports.
    pub mem_ports: usize,
    pub write_back: bool,
    /// Whether stores produce a response.
    pub write_response: bool,
    /// Miss-queue entries per engine.
    pub mshr_size: usize,
    /// Hit latency in cycles.
    pub latency: Cycle,
    /// Forward all traffic unmodified, no tag storage.
    pub bypass: bool,
}

impl Config for CacheConfig {}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            size: 16384,
            line_size: 64,
            word_size: 8,
            ways: 2,
            num_banks: 2,
            addr_width: 32,
            ports_per_bank: 1,
            num_inputs: 4,
            mem_ports: 1,
            write_back: false,
            write_response: false,
            mshr_size: 8,
            latency: 2,
            bypass: false,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_inputs == 0 {
            bail!("cache must have at least one input slot");
        }
        if self.mem_ports == 0 {
            bail!("cache must have at least one memory port");
        }
        if self.bypass {
            return Ok(());
        }
        for (name, v) in [
            ("size", self.size),
            ("line_size", self.line_size),
            ("word_size", self.word_size),
            ("ways", self.ways),
            ("num_banks", self.num_banks as u64),
        ] {
            if v == 0 || !v.is_power_of_two() {
                bail!("cache {} must be a nonzero power of two, got {}", name, v);
            }
        }
        if self.line_size < self.word_size {
            bail!(
                "line size {} smaller than word size {}",
                self.line_size,
                self.word_size
            );
        }
        if self.size < self.line_size * self.ways * self.num_banks as u64 {
            bail!(
                "cache size {} too small for {} ways x {} banks of {}-byte lines",
                self.size,
                self.ways,
                self.num_banks,
                self.line_size
            );
        }
        if self.ports_per_bank == 0 {
            bail!("cache must have at least one port per bank");
        }
        if self.mshr_size == 0 {
            bail!("cache must have at least one miss-queue entry");
        }
        Ok(())
    }

    /// Sets per bank.
    pub fn num_sets(&self) -> u64 {
        self.size / (self.line_size * self.ways * self.num_banks as u64)
    }

    pub fn line_of(&self, addr: u64) -> u64 {
        addr / self.line_size
    }

    pub fn bank_of(&self, addr: u64) -> usize {
        (self.line_of(addr) % self.num_banks as u64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::CacheConfig;

    #[test]
    fn default_validates() {
        assert!(CacheConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_power_of_two_line() {
        let config = CacheConfig {
            line_size: 48,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_undersized_cache() {
        let config = CacheConfig {
            size: 64,
            line_size: 64,
            ways: 2,
            num_banks: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn bypass_skips_geometry_checks() {
        let config = CacheConfig {
            bypass: true,
            size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn geometry_derivation() {
        let config = CacheConfig::default();
        // 16 KiB / (64 B x 2 ways x 2 banks)
        assert_eq!(config.num_sets(), 64);
        assert_eq!(config.line_of(0x1040), 0x41);
        assert_eq!(config.bank_of(0x1040), 1);
    }
}
