use std::collections::HashMap;

use log::trace;

use crate::base::port::{link, ports, Cycle, Port};
use crate::fabric::{CacheCluster, MemOp, MemRequest, MemResponse};

// a sparse word-granular memory that initializes anything read with 0
pub struct ToyMemory {
    mem: HashMap<u64, u64>,
    latency: Cycle,
    req: Vec<Port<MemRequest>>,
    rsp: Vec<Port<MemResponse>>,
}

fn expand_mask(write_mask: u64) -> u64 {
    let mut mask = 0u64;
    for byte in 0..8 {
        if write_mask & (1 << byte) != 0 {
            mask |= 0xff << (byte * 8);
        }
    }
    mask
}

impl ToyMemory {
    pub fn new(num_ports: usize, latency: Cycle) -> Self {
        ToyMemory {
            mem: HashMap::new(),
            latency,
            req: ports(num_ports),
            rsp: ports(num_ports),
        }
    }

    /// Wire this memory to every cluster memory port.
    pub fn attach(&self, cluster: &CacheCluster) {
        assert_eq!(self.req.len(), cluster.mem_ports(), "port count mismatch");
        for p in 0..self.req.len() {
            link(cluster.mem_req(p), &self.req[p]);
            link(cluster.mem_rsp(p), &self.rsp[p]);
        }
    }

    pub fn word(&self, addr: u64) -> u64 {
        *self.mem.get(&(addr & !7)).unwrap_or(&0)
    }

    pub fn poke(&mut self, addr: u64, value: u64) {
        self.mem.insert(addr & !7, value);
    }

    pub fn reset(&mut self) {
        self.mem.clear();
    }

    /// Serve every queued request.  Reads respond after the configured
    /// latency; writes apply their byte mask and complete silently.
    pub fn tick(&mut self, now: Cycle) {
        for p in 0..self.req.len() {
            loop {
                let Some(req) = self.req[p].peek(now) else {
                    break;
                };
                match req.op {
                    MemOp::Read => {
                        if self.rsp[p].space() == 0 {
                            break;
                        }
                        let payload = self.word(req.addr);
                        trace!("mem: read {:#x} -> {:#x}", req.addr, payload);
                        let pushed = self.rsp[p].try_push(
                            now,
                            MemResponse {
                                tag: req.tag,
                                addr: req.addr,
                                payload,
                            },
                            self.latency,
                        );
                        assert!(pushed, "space checked above");
                    }
                    MemOp::Write => {
                        let mask = expand_mask(req.write_mask);
                        let word = req.addr & !7;
                        let old = *self.mem.get(&word).unwrap_or(&0);
                        self.mem.insert(word, (old & !mask) | (req.payload & mask));
                        trace!("mem: write {:#x} mask {:#x}", req.addr, req.write_mask);
                    }
                }
                self.req[p].pop(now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ToyMemory;
    use crate::fabric::{MemRequest, MemResponse};

    #[test]
    fn read_of_untouched_word_is_zero() {
        let mut mem = ToyMemory::new(1, 2);
        assert!(mem.req[0].try_push(0, MemRequest::read(0x40, 1, 0), 0));
        mem.tick(0);
        assert!(mem.rsp[0].peek(1).is_none());
        assert_eq!(
            mem.rsp[0].pop(2),
            Some(MemResponse {
                tag: 1,
                addr: 0x40,
                payload: 0,
            })
        );
    }

    #[test]
    fn masked_write_merges_bytes() {
        let mut mem = ToyMemory::new(1, 0);
        mem.poke(0x80, 0x1111_1111_1111_1111);
        assert!(mem.req[0].try_push(0, MemRequest::write(0x80, 0, 0, 0xaabb_ccdd, 0x0f), 0));
        mem.tick(0);
        assert_eq!(mem.word(0x80), 0x1111_1111_aabb_ccdd);
    }

    #[test]
    fn writes_do_not_respond() {
        let mut mem = ToyMemory::new(1, 0);
        assert!(mem.req[0].try_push(0, MemRequest::write(0x0, 3, 0, 1, 0xff), 0));
        mem.tick(0);
        for now in 0..5 {
            assert!(mem.rsp[0].is_empty(now));
        }
    }
}
