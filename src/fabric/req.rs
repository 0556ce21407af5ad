/// Wire types carried between lanes, arbiters, translation stages, cache
/// engines and backing memory.  One request type serves every hop; hops that
/// rewrite a field (arbiters encode the input index into `tag`, the
/// translation drain rewrites `addr`) clone and modify.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemOp {
    Read,
    Write,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemRequest {
    /// Target address.  Virtual until the translation stage rewrites it.
    pub addr: u64,
    /// Pre-resolved physical address, set by the requester when it already
    /// knows the mapping.  The translation drain falls back to `addr` when
    /// this is absent.
    pub phys_addr: Option<u64>,
    pub op: MemOp,
    /// Correlation tag.  Rewritten at each arbiter hop and by the
    /// translation issue phase; restored on the response path.
    pub tag: u64,
    /// Originating lane, for accounting only.
    pub lane: usize,
    pub payload: u64,
    pub write_mask: u64,
}

impl MemRequest {
    pub fn read(addr: u64, tag: u64, lane: usize) -> Self {
        MemRequest {
            addr,
            phys_addr: None,
            op: MemOp::Read,
            tag,
            lane,
            payload: 0,
            write_mask: 0,
        }
    }

    pub fn write(addr: u64, tag: u64, lane: usize, payload: u64, write_mask: u64) -> Self {
        MemRequest {
            addr,
            phys_addr: None,
            op: MemOp::Write,
            tag,
            lane,
            payload,
            write_mask,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemResponse {
    pub tag: u64,
    pub addr: u64,
    pub payload: u64,
}
