use crate::base::port::{ports, Cycle, Port};
use crate::fabric::{MemRequest, MemResponse};
use log::trace;

/// N-input, M-output round-robin arbiter.  Input i is statically assigned to
/// output `i / ceil(N/M)`; each output grants at most one request per cycle,
/// rotating fairly within its input group.
///
/// A forwarded request has its absolute input index folded into the tag
/// (`tag * N + i`), so the response path can route each response back to the
/// input it came from and restore the original tag without any state.
pub struct MemArbiter {
    name: String,
    num_inputs: usize,
    group_size: usize,
    pub req_in: Vec<Port<MemRequest>>,
    pub req_out: Vec<Port<MemRequest>>,
    pub rsp_in: Vec<Port<MemResponse>>,
    pub rsp_out: Vec<Port<MemResponse>>,
    grant: Vec<usize>,
}

impl MemArbiter {
    pub fn new(name: impl Into<String>, num_inputs: usize, num_outputs: usize) -> Self {
        assert!(num_inputs > 0 && num_outputs > 0, "arbiter needs ports");
        assert!(num_inputs >= num_outputs, "arbiter cannot fan out requests");
        MemArbiter {
            name: name.into(),
            num_inputs,
            group_size: num_inputs.div_ceil(num_outputs),
            req_in: ports(num_inputs),
            req_out: ports(num_outputs),
            rsp_in: ports(num_outputs),
            rsp_out: ports(num_inputs),
            grant: vec![0; num_outputs],
        }
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    /// Output that input i is assigned to.
    pub fn output_of(&self, input: usize) -> usize {
        input / self.group_size
    }

    fn forward_requests(&mut self, now: Cycle) {
        for o in 0..self.req_out.len() {
            if self.req_out[o].space() == 0 {
                continue;
            }
            let base = o * self.group_size;
            let group_len = self.group_size.min(self.num_inputs - base);
            for k in 0..group_len {
                let i = base + (self.grant[o] + k) % group_len;
                let Some(mut req) = self.req_in[i].pop(now) else {
                    continue;
                };
                trace!(
                    "{}: grant input {} -> output {}, tag {:#x}",
                    self.name,
                    i,
                    o,
                    req.tag
                );
                req.tag = req.tag * self.num_inputs as u64 + i as u64;
                let pushed = self.req_out[o].try_push(now, req, 1);
                assert!(pushed, "space checked above");
                self.grant[o] = (self.grant[o] + k + 1) % group_len;
                break;
            }
        }
    }

    fn route_responses(&mut self, now: Cycle) {
        for o in 0..self.rsp_in.len() {
            while let Some(rsp) = self.rsp_in[o].peek(now) {
                let i = (rsp.tag % self.num_inputs as u64) as usize;
                if self.rsp_out[i].space() == 0 {
                    break;
                }
                self.rsp_in[o].pop(now);
                let restored = MemResponse {
                    tag: rsp.tag / self.num_inputs as u64,
                    ..rsp
                };
                let pushed = self.rsp_out[i].try_push(now, restored, 1);
                assert!(pushed, "space checked above");
            }
        }
    }

    pub fn tick(&mut self, now: Cycle) {
        self.route_responses(now);
        self.forward_requests(now);
    }
}

#[cfg(test)]
mod tests {
    use super::MemArbiter;
    use crate::fabric::{MemRequest, MemResponse};

    #[test]
    fn contending_inputs_alternate() {
        let mut arb = MemArbiter::new("arb", 2, 1);
        let mut granted = Vec::new();
        for now in 0..8 {
            for i in 0..2 {
                if arb.req_in[i].space() > 0 {
                    assert!(arb.req_in[i].try_push(now, MemRequest::read(0x100 * i as u64, 0, i), 0));
                }
            }
            arb.tick(now);
            if let Some(req) = arb.req_out[0].pop(now + 1) {
                granted.push((req.tag % 2) as usize);
            }
        }
        assert!(granted.len() >= 4);
        for pair in granted.windows(2) {
            assert_ne!(pair[0], pair[1], "grants did not alternate: {:?}", granted);
        }
    }

    #[test]
    fn response_returns_to_origin_with_tag_restored() {
        let mut arb = MemArbiter::new("arb", 4, 1);
        assert!(arb.req_in[2].try_push(0, MemRequest::read(0xab00, 9, 2), 0));
        arb.tick(0);
        let fwd = arb.req_out[0].pop(1).unwrap();
        assert_eq!(fwd.tag, 9 * 4 + 2);

        assert!(arb.rsp_in[0].try_push(1, MemResponse { tag: fwd.tag, addr: fwd.addr, payload: 1 }, 0));
        arb.tick(1);
        for i in [0, 1, 3] {
            assert!(arb.rsp_out[i].is_empty(2));
        }
        let rsp = arb.rsp_out[2].pop(2).unwrap();
        assert_eq!(rsp.tag, 9);
    }

    #[test]
    fn inputs_map_to_output_groups() {
        let arb = MemArbiter::new("arb", 4, 2);
        assert_eq!(arb.output_of(0), 0);
        assert_eq!(arb.output_of(1), 0);
        assert_eq!(arb.output_of(2), 1);
        assert_eq!(arb.output_of(3), 1);
    }

    #[test]
    fn uneven_groups_still_route() {
        let mut arb = MemArbiter::new("arb", 3, 2);
        // ceil(3/2) = 2: inputs {0,1} -> out 0, input {2} -> out 1.
        assert_eq!(arb.output_of(2), 1);
        assert!(arb.req_in[2].try_push(0, MemRequest::read(0x40, 1, 2), 0));
        arb.tick(0);
        assert!(arb.req_out[0].is_empty(1));
        assert_eq!(arb.req_out[1].pop(1).unwrap().tag, 1 * 3 + 2);
    }

    #[test]
    fn one_grant_per_output_per_cycle() {
        let mut arb = MemArbiter::new("arb", 2, 1);
        assert!(arb.req_in[0].try_push(0, MemRequest::read(0x0, 0, 0), 0));
        assert!(arb.req_in[1].try_push(0, MemRequest::read(0x8, 0, 1), 0));
        arb.tick(0);
        assert_eq!(arb.req_out[0].occupancy(), 1);
    }
}
