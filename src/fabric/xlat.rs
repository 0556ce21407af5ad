use crate::base::port::{Cycle, Port};
use crate::cache::{CacheConfig, CacheEngine, MemUnit, PerfStats};
use crate::fabric::{MemRequest, MemResponse};
use anyhow::Result;

/// Address-translation stage: a cache engine repurposed to hold translation
/// entries, behind the same four-port contract as a data cache.
///
/// Requesting zero underlying instances collapses to a single instance with
/// the bypass flag forced on, so the surrounding wiring never special-cases
/// a disabled stage.
pub struct TranslationStage {
    pub(crate) engine: CacheEngine,
}

impl TranslationStage {
    pub fn new(name: impl Into<String>, num_instances: usize, config: CacheConfig) -> Result<Self> {
        let mut config = config;
        if num_instances == 0 {
            config.bypass = true;
        }
        // The translation array never holds dirty state, and every lookup
        // (including one cloned from a store) must produce exactly one
        // response for the drain phase to correlate.
        config.write_back = false;
        config.write_response = true;
        Ok(TranslationStage {
            engine: CacheEngine::new(name, config)?,
        })
    }
}

impl MemUnit for TranslationStage {
    fn core_req(&self, slot: usize) -> &Port<MemRequest> {
        self.engine.core_req(slot)
    }

    fn core_rsp(&self, slot: usize) -> &Port<MemResponse> {
        self.engine.core_rsp(slot)
    }

    // TODO: route misses through a page-table walker once one exists;
    // until then they fetch from backing memory like ordinary misses.
    fn mem_req(&self, port: usize) -> &Port<MemRequest> {
        self.engine.mem_req(port)
    }

    fn mem_rsp(&self, port: usize) -> &Port<MemResponse> {
        self.engine.mem_rsp(port)
    }

    fn tick(&mut self, now: Cycle) {
        self.engine.tick(now);
    }

    fn perf_stats(&self) -> PerfStats {
        self.engine.perf_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::TranslationStage;
    use crate::cache::{CacheConfig, MemUnit};
    use crate::fabric::MemRequest;

    #[test]
    fn zero_instances_forces_bypass() {
        let config = CacheConfig {
            bypass: false,
            ..Default::default()
        };
        let stage = TranslationStage::new("xlat", 0, config).unwrap();
        assert!(stage.engine.config().bypass);
    }

    #[test]
    fn store_shaped_lookup_gets_a_response() {
        let config = CacheConfig {
            num_inputs: 1,
            write_response: false,
            write_back: true,
            ..Default::default()
        };
        let mut stage = TranslationStage::new("xlat", 1, config).unwrap();
        assert!(stage.engine.config().write_response);
        assert!(!stage.engine.config().write_back);

        let lookup = MemRequest::write(0x7000, 3, 0, 0x1, 0xff);
        assert!(stage.core_req(0).try_push(0, lookup, 0));
        let mut got = None;
        for now in 0..20 {
            stage.tick(now);
            while let Some(req) = stage.mem_req(0).pop(now) {
                let _ = stage.mem_rsp(0).try_push(
                    now,
                    crate::fabric::MemResponse { tag: req.tag, addr: req.addr, payload: 0 },
                    0,
                );
            }
            if let Some(rsp) = stage.core_rsp(0).pop(now) {
                got = Some(rsp);
                break;
            }
        }
        assert_eq!(got.unwrap().tag, 3);
    }
}
