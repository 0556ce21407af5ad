use serde::Serialize;
use std::ops::{Add, AddAssign};

/// Per-engine performance counters.  Merging is elementwise saturating
/// addition, so folding over any number of engines in any order yields the
/// same aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PerfStats {
    pub reads: u64,
    pub writes: u64,
    pub read_misses: u64,
    pub write_misses: u64,
    pub evictions: u64,
    pub mem_reads: u64,
    pub mem_writes: u64,
    pub mshr_stalls: u64,
    pub bank_stalls: u64,
}

impl AddAssign<&PerfStats> for PerfStats {
    fn add_assign(&mut self, other: &PerfStats) {
        self.reads = self.reads.saturating_add(other.reads);
        self.writes = self.writes.saturating_add(other.writes);
        self.read_misses = self.read_misses.saturating_add(other.read_misses);
        self.write_misses = self.write_misses.saturating_add(other.write_misses);
        self.evictions = self.evictions.saturating_add(other.evictions);
        self.mem_reads = self.mem_reads.saturating_add(other.mem_reads);
        self.mem_writes = self.mem_writes.saturating_add(other.mem_writes);
        self.mshr_stalls = self.mshr_stalls.saturating_add(other.mshr_stalls);
        self.bank_stalls = self.bank_stalls.saturating_add(other.bank_stalls);
    }
}

impl AddAssign<PerfStats> for PerfStats {
    fn add_assign(&mut self, other: PerfStats) {
        *self += &other;
    }
}

impl Add for PerfStats {
    type Output = PerfStats;

    fn add(mut self, other: PerfStats) -> PerfStats {
        self += &other;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::PerfStats;

    fn sample(seed: u64) -> PerfStats {
        PerfStats {
            reads: seed,
            writes: seed * 2,
            read_misses: seed / 2,
            write_misses: seed % 3,
            evictions: seed % 5,
            mem_reads: seed / 2 + seed % 3,
            mem_writes: seed % 7,
            mshr_stalls: seed % 11,
            bank_stalls: seed % 13,
        }
    }

    #[test]
    fn merge_is_commutative() {
        let (a, b) = (sample(17), sample(42));
        assert_eq!(a + b, b + a);
    }

    #[test]
    fn merge_is_associative() {
        let (a, b, c) = (sample(3), sample(100), sample(77));
        assert_eq!((a + b) + c, a + (b + c));
    }

    #[test]
    fn default_is_identity() {
        let a = sample(9);
        assert_eq!(a + PerfStats::default(), a);
    }

    #[test]
    fn merge_saturates() {
        let mut a = PerfStats {
            reads: u64::MAX,
            ..Default::default()
        };
        a += sample(1);
        assert_eq!(a.reads, u64::MAX);
    }
}
