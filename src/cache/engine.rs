use crate::base::port::{ports, Cycle, Port};
use crate::cache::{CacheConfig, CacheTagArray, PerfStats};
use crate::fabric::{MemOp, MemRequest, MemResponse};
use anyhow::Result;
use log::{debug, trace};
use smallvec::{smallvec, SmallVec};
use std::collections::HashSet;

/// Shared capability of every memory-hierarchy unit: request/response ports
/// on the core side (indexed by input slot) and on the memory side (indexed
/// by memory port), a per-cycle step, and a stats snapshot.
pub trait MemUnit {
    fn core_req(&self, slot: usize) -> &Port<MemRequest>;
    fn core_rsp(&self, slot: usize) -> &Port<MemResponse>;
    fn mem_req(&self, port: usize) -> &Port<MemRequest>;
    fn mem_rsp(&self, port: usize) -> &Port<MemResponse>;
    fn tick(&mut self, now: Cycle);
    fn perf_stats(&self) -> PerfStats;
}

struct MissEntry {
    line: u64,
    /// Later misses to the same line may piggyback on this entry.  False for
    /// bypass entries, which correlate exactly one request.
    mergeable: bool,
    waiters: SmallVec<[(MemRequest, usize); 2]>,
}

/// Cycle-level set-associative cache model.  Tags and timing only; data
/// values flow through from backing memory on fills and are not retained.
///
/// Outgoing memory reads carry the miss-queue entry index as their tag, so a
/// memory response self-identifies which entry (and which merged waiters) it
/// completes.
pub struct CacheEngine {
    name: String,
    config: CacheConfig,
    core_req: Vec<Port<MemRequest>>,
    core_rsp: Vec<Port<MemResponse>>,
    mem_req: Vec<Port<MemRequest>>,
    mem_rsp: Vec<Port<MemResponse>>,
    banks: Vec<CacheTagArray>,
    dirty: HashSet<u64>,
    miss_queue: Vec<Option<MissEntry>>,
    stats: PerfStats,
}

impl CacheEngine {
    pub fn new(name: impl Into<String>, config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let banks = if config.bypass {
            Vec::new()
        } else {
            (0..config.num_banks)
                .map(|_| CacheTagArray::new(config.num_sets(), config.ways))
                .collect()
        };
        Ok(CacheEngine {
            name: name.into(),
            core_req: ports(config.num_inputs),
            core_rsp: ports(config.num_inputs),
            mem_req: ports(config.mem_ports),
            mem_rsp: ports(config.mem_ports),
            banks,
            dirty: HashSet::new(),
            miss_queue: (0..config.mshr_size).map(|_| None).collect(),
            stats: PerfStats::default(),
            config,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn mem_port_of(&self, addr: u64) -> usize {
        (self.config.line_of(addr) % self.config.mem_ports as u64) as usize
    }

    fn alloc_miss(&mut self, entry: MissEntry) -> Option<u64> {
        let id = self.miss_queue.iter().position(|e| e.is_none())?;
        self.miss_queue[id] = Some(entry);
        Some(id as u64)
    }

    /// Consume memory responses, completing the miss entry each one names.
    fn service_fills(&mut self, now: Cycle) {
        for p in 0..self.config.mem_ports {
            while let Some(rsp) = self.mem_rsp[p].peek(now) {
                let id = rsp.tag as usize;
                assert!(
                    id < self.miss_queue.len() && self.miss_queue[id].is_some(),
                    "{}: memory response for dead miss entry {}",
                    self.name,
                    id
                );
                let entry = self.miss_queue[id].as_ref().expect("checked above");

                // All side effects must land this cycle or none do: every
                // waiter's response port needs a slot, and a write-back
                // cache may need to push an eviction write.
                let blocked = entry
                    .waiters
                    .iter()
                    .any(|(_, slot)| self.core_rsp[*slot].space() == 0)
                    || (self.config.write_back
                        && entry.mergeable
                        && self.mem_req[p].space() == 0);
                if blocked {
                    break;
                }

                let entry = self.miss_queue[id].take().expect("checked above");
                self.mem_rsp[p].pop(now);

                if entry.mergeable {
                    let bank = self.config.bank_of(entry.line * self.config.line_size);
                    if let Some(evicted) = self.banks[bank].fill(entry.line) {
                        self.stats.evictions += 1;
                        if self.dirty.remove(&evicted) {
                            let wb = MemRequest::write(
                                evicted * self.config.line_size,
                                0,
                                0,
                                0,
                                u64::MAX,
                            );
                            let pushed = self.mem_req[p].try_push(now, wb, 1);
                            assert!(pushed, "space checked before fill");
                            self.stats.mem_writes += 1;
                        }
                    }
                }

                for (orig, slot) in &entry.waiters {
                    trace!(
                        "{}: fill line {:#x} completes tag {:#x} at slot {}",
                        self.name,
                        entry.line,
                        orig.tag,
                        slot
                    );
                    let pushed = self.core_rsp[*slot].try_push(
                        now,
                        MemResponse {
                            tag: orig.tag,
                            addr: orig.addr,
                            payload: rsp.payload,
                        },
                        1,
                    );
                    assert!(pushed, "space checked before fill");
                }
            }
        }
    }

    fn respond(&self, now: Cycle, slot: usize, req: &MemRequest, payload: u64) -> bool {
        self.core_rsp[slot].try_push(
            now,
            MemResponse {
                tag: req.tag,
                addr: req.addr,
                payload,
            },
            self.config.latency,
        )
    }

    fn accept_bypass(&mut self, now: Cycle, slot: usize, req: MemRequest) {
        let port = self.mem_port_of(req.addr);
        match req.op {
            MemOp::Read => {
                // Correlate through an unmerged miss entry so the memory
                // response finds its way back to the right slot and tag.
                let Some(id) = self.alloc_miss(MissEntry {
                    line: self.config.line_of(req.addr),
                    mergeable: false,
                    waiters: smallvec![(req.clone(), slot)],
                }) else {
                    self.stats.mshr_stalls += 1;
                    return;
                };
                let mut fwd = req;
                fwd.tag = id;
                if self.mem_req[port].try_push(now, fwd, self.config.latency) {
                    self.core_req[slot].pop(now);
                    self.stats.reads += 1;
                    self.stats.mem_reads += 1;
                } else {
                    self.miss_queue[id as usize] = None;
                }
            }
            MemOp::Write => {
                if self.config.write_response && self.core_rsp[slot].space() == 0 {
                    return;
                }
                if self.mem_req[port].try_push(now, req.clone(), self.config.latency) {
                    if self.config.write_response {
                        let pushed = self.respond(now, slot, &req, req.payload);
                        assert!(pushed, "space checked above");
                    }
                    self.core_req[slot].pop(now);
                    self.stats.writes += 1;
                    self.stats.mem_writes += 1;
                }
            }
        }
    }

    fn accept_cached(
        &mut self,
        now: Cycle,
        slot: usize,
        req: MemRequest,
        bank_grants: &mut [usize],
    ) {
        let bank = self.config.bank_of(req.addr);
        if bank_grants[bank] >= self.config.ports_per_bank {
            self.stats.bank_stalls += 1;
            return;
        }
        let line = self.config.line_of(req.addr);
        let port = self.mem_port_of(req.addr);
        let hit = self.banks[bank].probe(line);

        match (req.op, hit) {
            (MemOp::Read, true) => {
                if !self.respond(now, slot, &req, 0) {
                    return;
                }
                self.core_req[slot].pop(now);
                self.stats.reads += 1;
            }
            (MemOp::Read, false) => {
                // Merge with an outstanding fetch of the same line if one
                // exists; otherwise claim a fresh entry and fetch the line.
                if let Some(entry) = self
                    .miss_queue
                    .iter_mut()
                    .flatten()
                    .find(|e| e.mergeable && e.line == line)
                {
                    entry.waiters.push((req, slot));
                    self.core_req[slot].pop(now);
                    self.stats.reads += 1;
                    self.stats.read_misses += 1;
                    bank_grants[bank] += 1;
                    return;
                }
                let Some(id) = self.alloc_miss(MissEntry {
                    line,
                    mergeable: true,
                    waiters: smallvec![(req, slot)],
                }) else {
                    self.stats.mshr_stalls += 1;
                    return;
                };
                let fetch = MemRequest::read(line * self.config.line_size, id, 0);
                if self.mem_req[port].try_push(now, fetch, self.config.latency) {
                    self.core_req[slot].pop(now);
                    self.stats.reads += 1;
                    self.stats.read_misses += 1;
                    self.stats.mem_reads += 1;
                } else {
                    self.miss_queue[id as usize] = None;
                    return;
                }
            }
            (MemOp::Write, hit) => {
                if self.config.write_response && self.core_rsp[slot].space() == 0 {
                    return;
                }
                let absorbed = hit && self.config.write_back;
                if absorbed {
                    self.dirty.insert(line);
                } else {
                    // Write-through, and write-around on a write-back miss.
                    if !self.mem_req[port].try_push(now, req.clone(), self.config.latency) {
                        return;
                    }
                    self.stats.mem_writes += 1;
                }
                if self.config.write_response {
                    let pushed = self.respond(now, slot, &req, req.payload);
                    assert!(pushed, "space checked above");
                }
                self.core_req[slot].pop(now);
                self.stats.writes += 1;
                if !hit {
                    self.stats.write_misses += 1;
                }
            }
        }
        bank_grants[bank] += 1;
    }

    /// Accept at most one request per input slot.
    fn accept_requests(&mut self, now: Cycle) {
        let mut bank_grants = vec![0usize; self.config.num_banks];
        for slot in 0..self.config.num_inputs {
            let Some(req) = self.core_req[slot].peek(now) else {
                continue;
            };
            debug!(
                "{}: slot {} {:?} addr {:#x} tag {:#x}",
                self.name, slot, req.op, req.addr, req.tag
            );
            if self.config.bypass {
                self.accept_bypass(now, slot, req);
            } else {
                self.accept_cached(now, slot, req, &mut bank_grants);
            }
        }
    }
}

impl MemUnit for CacheEngine {
    fn core_req(&self, slot: usize) -> &Port<MemRequest> {
        &self.core_req[slot]
    }

    fn core_rsp(&self, slot: usize) -> &Port<MemResponse> {
        &self.core_rsp[slot]
    }

    fn mem_req(&self, port: usize) -> &Port<MemRequest> {
        &self.mem_req[port]
    }

    fn mem_rsp(&self, port: usize) -> &Port<MemResponse> {
        &self.mem_rsp[port]
    }

    fn tick(&mut self, now: Cycle) {
        self.service_fills(now);
        self.accept_requests(now);
    }

    fn perf_stats(&self) -> PerfStats {
        self.stats
    }
}
