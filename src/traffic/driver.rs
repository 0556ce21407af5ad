use std::collections::HashMap;

use anyhow::{bail, Result};
use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::base::port::{link, Cycle, Port};
use crate::fabric::{CacheCluster, MemOp, MemRequest, MemResponse};
use crate::traffic::{TrafficConfig, TrafficPattern};

struct LaneState {
    issued: u64,
    next_tag: u64,
    inflight: HashMap<u64, MemRequest>,
}

/// Synthetic per-lane request generator with response checking.  Every
/// response must correlate with an outstanding tag on its lane; anything
/// else halts the run.
pub struct TrafficDriver {
    config: TrafficConfig,
    num_slots: usize,
    rng: StdRng,
    lanes: Vec<LaneState>,
    req: Vec<Port<MemRequest>>,
    rsp: Vec<Port<MemResponse>>,
    completed: u64,
}

impl TrafficDriver {
    pub fn new(config: TrafficConfig, num_lanes: usize, num_slots: usize) -> Self {
        let lanes = (0..num_lanes)
            .map(|_| LaneState {
                issued: 0,
                next_tag: 0,
                inflight: HashMap::new(),
            })
            .collect();
        TrafficDriver {
            config,
            num_slots,
            rng: StdRng::seed_from_u64(config.seed),
            lanes,
            req: (0..num_lanes * num_slots).map(|_| Port::new()).collect(),
            rsp: (0..num_lanes * num_slots).map(|_| Port::new()).collect(),
            completed: 0,
        }
    }

    pub fn attach(&self, cluster: &CacheCluster) {
        assert_eq!(self.lanes.len(), cluster.num_lanes(), "lane count mismatch");
        assert_eq!(self.num_slots, cluster.num_slots(), "slot count mismatch");
        for lane in 0..self.lanes.len() {
            for slot in 0..self.num_slots {
                link(&self.req[lane * self.num_slots + slot], cluster.core_req(lane, slot));
                link(&self.rsp[lane * self.num_slots + slot], cluster.core_rsp(lane, slot));
            }
        }
    }

    fn next_addr(&mut self, lane: usize, seq: u64) -> u64 {
        let word = !7u64;
        match self.config.pattern {
            TrafficPattern::Strided => {
                let lane_base = self.config.base_addr + lane as u64 * self.config.addr_range;
                (lane_base + seq * self.config.stride) & word
            }
            TrafficPattern::Random => {
                (self.config.base_addr + self.rng.gen_range(0..self.config.addr_range)) & word
            }
        }
    }

    fn issue(&mut self, now: Cycle) {
        for lane in 0..self.lanes.len() {
            let state = &self.lanes[lane];
            if state.issued >= self.config.requests_per_lane
                || state.inflight.len() >= self.config.max_inflight
            {
                continue;
            }
            let seq = state.issued;
            let tag = state.next_tag;
            let addr = self.next_addr(lane, seq);

            let is_write =
                self.config.write_every != 0 && (seq + 1) % self.config.write_every == 0;
            let mut req = if is_write {
                MemRequest::write(addr, tag, lane, seq, 0xff)
            } else {
                MemRequest::read(addr, tag, lane)
            };
            if self.config.phys_offset != 0 {
                req.phys_addr = Some(addr + self.config.phys_offset);
            }

            let slot = (seq % self.num_slots as u64) as usize;
            if !self.req[lane * self.num_slots + slot].try_push(now, req.clone(), 0) {
                continue;
            }
            trace!(
                "traffic: lane {} slot {} issued {:?} addr {:#x} tag {:#x}",
                lane,
                slot,
                req.op,
                req.addr,
                tag
            );
            let state = &mut self.lanes[lane];
            state.issued += 1;
            state.next_tag += 1;
            if req.op == MemOp::Read || self.config.expect_write_ack {
                state.inflight.insert(tag, req);
            } else {
                // Fire-and-forget store; nothing will acknowledge it.
                self.completed += 1;
            }
        }
    }

    fn collect(&mut self, now: Cycle) -> Result<()> {
        for lane in 0..self.lanes.len() {
            for slot in 0..self.num_slots {
                while let Some(rsp) = self.rsp[lane * self.num_slots + slot].pop(now) {
                    let Some(orig) = self.lanes[lane].inflight.remove(&rsp.tag) else {
                        bail!(
                            "traffic: lane {} slot {}: response with unknown tag {:#x}",
                            lane,
                            slot,
                            rsp.tag
                        );
                    };
                    debug!(
                        "traffic: lane {} completed tag {:#x} addr {:#x}",
                        lane, rsp.tag, orig.addr
                    );
                    self.completed += 1;
                }
            }
        }
        Ok(())
    }

    pub fn tick(&mut self, now: Cycle) -> Result<()> {
        self.collect(now)?;
        self.issue(now);
        Ok(())
    }

    pub fn done(&self) -> bool {
        self.lanes
            .iter()
            .all(|l| l.issued >= self.config.requests_per_lane && l.inflight.is_empty())
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::TrafficDriver;
    use crate::fabric::MemResponse;
    use crate::traffic::TrafficConfig;

    #[test]
    fn inflight_is_bounded() {
        let config = TrafficConfig {
            requests_per_lane: 16,
            max_inflight: 2,
            ..Default::default()
        };
        let mut driver = TrafficDriver::new(config, 1, 1);
        for now in 0..10 {
            driver.tick(now).unwrap();
        }
        assert_eq!(driver.lanes[0].issued, 2);
        assert_eq!(driver.lanes[0].inflight.len(), 2);
    }

    #[test]
    fn response_with_unknown_tag_is_fatal() {
        let config = TrafficConfig::default();
        let mut driver = TrafficDriver::new(config, 1, 1);
        assert!(driver.rsp[0].try_push(0, MemResponse { tag: 99, addr: 0, payload: 0 }, 0));
        let err = driver.tick(0).unwrap_err().to_string();
        assert!(err.contains("unknown tag"), "unexpected error: {}", err);
    }

    #[test]
    fn matched_response_completes_request() {
        let config = TrafficConfig {
            requests_per_lane: 1,
            ..Default::default()
        };
        let mut driver = TrafficDriver::new(config, 1, 1);
        driver.tick(0).unwrap();
        let req = driver.req[0].pop(0).unwrap();
        assert!(driver
            .rsp[0]
            .try_push(1, MemResponse { tag: req.tag, addr: req.addr, payload: 0 }, 0));
        driver.tick(1).unwrap();
        assert!(driver.done());
        assert_eq!(driver.completed(), 1);
    }

    #[test]
    fn strided_lanes_do_not_overlap() {
        let config = TrafficConfig {
            requests_per_lane: 4,
            max_inflight: 8,
            ..Default::default()
        };
        let mut driver = TrafficDriver::new(config, 2, 1);
        for now in 0..10 {
            driver.tick(now).unwrap();
        }
        let mut addrs = Vec::new();
        for lane in 0..2 {
            while let Some(req) = driver.req[lane].pop(10) {
                addrs.push(req.addr);
            }
        }
        addrs.sort();
        addrs.dedup();
        assert_eq!(addrs.len(), 8, "lanes generated overlapping addresses");
    }
}
