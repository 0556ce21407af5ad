use crate::fabric::MemRequest;

/// Table correlating outstanding translation lookups with the requests that
/// caused them.  The slot index doubles as the lookup's tag on the wire, so
/// a translation response self-identifies its entry.
///
/// A full table is ordinary back-pressure: the caller stalls and retries.  A
/// lookup or release of a tag with no live entry is a protocol violation and
/// yields `None` for the caller to escalate.
pub struct PendingXlatTable {
    entries: Vec<Option<MemRequest>>,
}

impl PendingXlatTable {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "pending table needs at least one entry");
        PendingXlatTable {
            entries: (0..capacity).map(|_| None).collect(),
        }
    }

    /// Bind `req` to the first free slot, returning its tag.  `None` when
    /// every slot is live.
    pub fn allocate(&mut self, req: MemRequest) -> Option<u64> {
        let tag = self.entries.iter().position(|e| e.is_none())?;
        self.entries[tag] = Some(req);
        Some(tag as u64)
    }

    pub fn get(&self, tag: u64) -> Option<&MemRequest> {
        self.entries.get(tag as usize)?.as_ref()
    }

    /// Free a slot, returning the stored request.
    pub fn release(&mut self, tag: u64) -> Option<MemRequest> {
        self.entries.get_mut(tag as usize)?.take()
    }

    pub fn live(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::PendingXlatTable;
    use crate::fabric::MemRequest;

    fn req(tag: u64) -> MemRequest {
        MemRequest::read(0x1000 + tag * 8, tag, 0)
    }

    #[test]
    fn live_entries_get_distinct_tags() {
        let mut table = PendingXlatTable::new(4);
        let mut tags = Vec::new();
        for i in 0..4 {
            tags.push(table.allocate(req(i)).unwrap());
        }
        tags.sort();
        tags.dedup();
        assert_eq!(tags.len(), 4);
        assert_eq!(table.live(), 4);
    }

    #[test]
    fn full_table_refuses_allocation() {
        let mut table = PendingXlatTable::new(2);
        assert!(table.allocate(req(0)).is_some());
        assert!(table.allocate(req(1)).is_some());
        assert!(table.allocate(req(2)).is_none());
        assert_eq!(table.live(), 2);
    }

    #[test]
    fn released_tag_is_reusable() {
        let mut table = PendingXlatTable::new(1);
        let tag = table.allocate(req(0)).unwrap();
        assert_eq!(table.release(tag).unwrap().tag, 0);
        assert_eq!(table.live(), 0);
        assert!(table.allocate(req(1)).is_some());
    }

    #[test]
    fn dead_tag_lookup_yields_none() {
        let mut table = PendingXlatTable::new(2);
        assert!(table.get(1).is_none());
        assert!(table.release(1).is_none());
        assert!(table.get(99).is_none());
        let tag = table.allocate(req(5)).unwrap();
        table.release(tag);
        assert!(table.release(tag).is_none());
    }

    #[test]
    fn stored_request_survives_unchanged() {
        let mut table = PendingXlatTable::new(2);
        let original = MemRequest::write(0xdead_0000, 3, 1, 0x77, 0xf);
        let tag = table.allocate(original.clone()).unwrap();
        assert_eq!(table.get(tag), Some(&original));
        assert_eq!(table.release(tag), Some(original));
    }
}
