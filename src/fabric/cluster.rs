use crate::base::port::{link, Cycle, Port};
use crate::cache::{CacheConfig, CacheEngine, MemUnit, PerfStats};
use crate::fabric::{
    ClusterConfig, MemArbiter, MemOp, MemRequest, MemResponse, PendingXlatTable, TranslationStage,
};
use anyhow::{bail, Result};
use log::{info, trace};

/// Cycles a request spends crossing between the translation stage and its
/// neighbors in either direction.
const XLAT_HANDOFF_LATENCY: Cycle = 2;

pub(crate) struct XlatUnit {
    pub(crate) stage: TranslationStage,
    pub(crate) pending: PendingXlatTable,
}

pub(crate) struct CacheUnit {
    pub(crate) engine: CacheEngine,
    pub(crate) xlat: Option<XlatUnit>,
}

/// The interconnect between core lanes and backing memory: per-slot input
/// arbiters fan lanes into cache engines, per-port output arbiters fan the
/// engines (and their translation stages) into the memory ports.
///
/// With translation enabled, arbitrated requests detour through the unit's
/// translation stage before reaching the engine; the pending table keeps the
/// original request alive across the detour, keyed by the lookup's tag.  The
/// stage and the engine share the unit's memory arbiters, the engine at
/// input `2u` and the stage at `2u + 1`.
pub struct CacheCluster {
    name: String,
    num_lanes: usize,
    num_slots: usize,
    mem_ports: usize,
    pub(crate) input_arbs: Vec<MemArbiter>,
    pub(crate) mem_arbs: Vec<MemArbiter>,
    pub(crate) units: Vec<CacheUnit>,
}

impl CacheCluster {
    /// Build and fully wire the cluster.  Construction is all or nothing:
    /// any invalid cardinality fails before any wiring happens.
    pub fn new(
        name: impl Into<String>,
        config: &ClusterConfig,
        cache_config: CacheConfig,
        xlat_config: CacheConfig,
    ) -> Result<Self> {
        let name = name.into();
        if config.num_lanes == 0 {
            bail!("{}: cluster needs at least one lane", name);
        }
        if config.num_slots == 0 {
            bail!("{}: cluster needs at least one input slot", name);
        }
        if config.mem_ports == 0 {
            bail!("{}: cluster needs at least one memory port", name);
        }
        if config.xlat_enable && config.xlat_entries == 0 {
            bail!("{}: translation needs at least one pending entry", name);
        }
        let num_units = config.num_units.max(1);
        if config.num_lanes < num_units || config.num_lanes % num_units != 0 {
            bail!(
                "{}: {} lanes do not divide evenly among {} units",
                name,
                config.num_lanes,
                num_units
            );
        }

        let mut cache_config = cache_config;
        if config.num_units == 0 {
            cache_config.bypass = true;
        }
        cache_config.num_inputs = config.num_slots;
        cache_config.mem_ports = config.mem_ports;
        let mut xlat_config = xlat_config;
        xlat_config.num_inputs = config.num_slots;
        xlat_config.mem_ports = config.mem_ports;

        let input_arbs: Vec<_> = (0..config.num_slots)
            .map(|s| {
                MemArbiter::new(
                    format!("{}.iarb{}", name, s),
                    config.num_lanes,
                    num_units,
                )
            })
            .collect();

        // With translation on, each unit claims two arbiter inputs per
        // memory port: engine traffic and translation-miss traffic.
        let fan_in = if config.xlat_enable {
            2 * num_units
        } else {
            num_units
        };
        let mem_arbs: Vec<_> = (0..config.mem_ports)
            .map(|p| MemArbiter::new(format!("{}.marb{}", name, p), fan_in, 1))
            .collect();

        let mut units = Vec::with_capacity(num_units);
        for u in 0..num_units {
            let engine = CacheEngine::new(format!("{}.cache{}", name, u), cache_config)?;
            let xlat = if config.xlat_enable {
                Some(XlatUnit {
                    stage: TranslationStage::new(
                        format!("{}.xlat{}", name, u),
                        config.xlat_units,
                        xlat_config,
                    )?,
                    pending: PendingXlatTable::new(config.xlat_entries),
                })
            } else {
                None
            };

            for (s, arb) in input_arbs.iter().enumerate() {
                // Engine responses always return through the slot's input
                // arbiter.  Requests bind directly only without translation;
                // with it, the arbiter output and the engine input stay
                // unlinked so the drain/issue phases can broker them.
                link(engine.core_rsp(s), &arb.rsp_in[u]);
                if xlat.is_none() {
                    link(&arb.req_out[u], engine.core_req(s));
                }
            }
            for (p, arb) in mem_arbs.iter().enumerate() {
                match &xlat {
                    None => {
                        link(engine.mem_req(p), &arb.req_in[u]);
                        link(engine.mem_rsp(p), &arb.rsp_out[u]);
                    }
                    Some(x) => {
                        link(engine.mem_req(p), &arb.req_in[2 * u]);
                        link(engine.mem_rsp(p), &arb.rsp_out[2 * u]);
                        link(x.stage.mem_req(p), &arb.req_in[2 * u + 1]);
                        link(x.stage.mem_rsp(p), &arb.rsp_out[2 * u + 1]);
                    }
                }
            }
            units.push(CacheUnit { engine, xlat });
        }

        info!(
            "{}: {} lanes x {} slots -> {} units -> {} memory ports (translation {})",
            name,
            config.num_lanes,
            config.num_slots,
            num_units,
            config.mem_ports,
            if config.xlat_enable { "on" } else { "off" }
        );

        Ok(CacheCluster {
            name,
            num_lanes: config.num_lanes,
            num_slots: config.num_slots,
            mem_ports: config.mem_ports,
            input_arbs,
            mem_arbs,
            units,
        })
    }

    pub fn num_lanes(&self) -> usize {
        self.num_lanes
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn mem_ports(&self) -> usize {
        self.mem_ports
    }

    /// Request port for lane `lane` at input slot `slot`.
    pub fn core_req(&self, lane: usize, slot: usize) -> &Port<MemRequest> {
        &self.input_arbs[slot].req_in[lane]
    }

    /// Response port for lane `lane` at input slot `slot`.
    pub fn core_rsp(&self, lane: usize, slot: usize) -> &Port<MemResponse> {
        &self.input_arbs[slot].rsp_out[lane]
    }

    /// Cluster-level memory request port `port`.
    pub fn mem_req(&self, port: usize) -> &Port<MemRequest> {
        &self.mem_arbs[port].req_out[0]
    }

    /// Cluster-level memory response port `port`.
    pub fn mem_rsp(&self, port: usize) -> &Port<MemResponse> {
        &self.mem_arbs[port].rsp_in[0]
    }

    /// One simulation cycle.  Per unit and slot, completed translations
    /// drain into the engine strictly before new arbitrated requests issue
    /// into the stage, so a tag freed by the drain is immediately reusable.
    pub fn tick(&mut self, now: Cycle) -> Result<()> {
        let Self {
            name,
            num_slots,
            input_arbs,
            mem_arbs,
            units,
            ..
        } = self;

        for arb in input_arbs.iter_mut() {
            arb.tick(now);
        }

        for (u, unit) in units.iter_mut().enumerate() {
            if let Some(XlatUnit { stage, pending }) = unit.xlat.as_mut() {
                for s in 0..*num_slots {
                    // Drain: a completed lookup releases its tag and hands
                    // the stored request, now carrying the translated
                    // address, to the engine.  A refused push leaves
                    // everything in place for the next cycle.
                    if let Some(rsp) = stage.core_rsp(s).peek(now) {
                        let Some(orig) = pending.get(rsp.tag) else {
                            bail!(
                                "{}: unit {} slot {}: translation response with unknown tag {:#x}",
                                name,
                                u,
                                s,
                                rsp.tag
                            );
                        };
                        let mut cache_req = orig.clone();
                        cache_req.addr = orig.phys_addr.unwrap_or(orig.addr);
                        if unit
                            .engine
                            .core_req(s)
                            .try_push(now, cache_req, XLAT_HANDOFF_LATENCY)
                        {
                            let orig = pending.release(rsp.tag).expect("entry present");
                            stage.core_rsp(s).pop(now);
                            trace!(
                                "{}: unit {} slot {}: translated {:#x} -> {:#x}, tag {:#x} released",
                                name,
                                u,
                                s,
                                orig.addr,
                                orig.phys_addr.unwrap_or(orig.addr),
                                rsp.tag
                            );
                        }
                    }

                    // Issue: a new arbitrated request binds a fresh tag to a
                    // stored copy and enters the stage.  A full table or a
                    // refused push leaves the arbiter output untouched.
                    if let Some(req) = input_arbs[s].req_out[u].peek(now) {
                        let Some(ptag) = pending.allocate(req.clone()) else {
                            continue;
                        };
                        // The lookup reads the translation entry no matter
                        // the original op; the op is replayed from the
                        // stored request at drain time.
                        let mut lookup = req;
                        lookup.tag = ptag;
                        lookup.op = MemOp::Read;
                        lookup.payload = 0;
                        lookup.write_mask = 0;
                        if stage.core_req(s).try_push(now, lookup, XLAT_HANDOFF_LATENCY) {
                            input_arbs[s].req_out[u].pop(now);
                            trace!(
                                "{}: unit {} slot {}: lookup issued, tag {:#x}",
                                name,
                                u,
                                s,
                                ptag
                            );
                        } else {
                            pending.release(ptag);
                        }
                    }
                }
                stage.tick(now);
            }
            unit.engine.tick(now);
        }

        for arb in mem_arbs.iter_mut() {
            arb.tick(now);
        }
        Ok(())
    }

    /// Aggregate counters over every engine the cluster owns, translation
    /// stages included.
    pub fn perf_stats(&self) -> PerfStats {
        self.units.iter().fold(PerfStats::default(), |mut acc, unit| {
            acc += unit.engine.perf_stats();
            if let Some(x) = &unit.xlat {
                acc += x.stage.perf_stats();
            }
            acc
        })
    }
}
