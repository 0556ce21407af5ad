/// `Port` models one endpoint of a bounded channel between two components.
///
/// `link` gives both endpoints the same underlying queue, which fixes a
/// one-to-one wiring at construction time.  A port that is never linked keeps
/// a private queue; this is how a wrapper module forwards traffic for an
/// inner module, and how a component exposes a queue that its owner drains
/// directly (the tie-off case).
use std::collections::VecDeque;
use std::sync::{Arc, OnceLock, RwLock};

pub type Cycle = u64;

pub const DEFAULT_PORT_DEPTH: usize = 8;

#[derive(Debug)]
struct Slot<T> {
    ready_at: Cycle,
    data: T,
}

#[derive(Debug)]
struct Channel<T> {
    depth: usize,
    slots: VecDeque<Slot<T>>,
}

/// Wrapper type of a shared reference to a channel.  Newtype is necessary to
/// implement access methods at the reference type.
pub struct ChannelRef<T>(Arc<RwLock<Channel<T>>>);

impl<T> Clone for ChannelRef<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Clone> ChannelRef<T> {
    fn new(depth: usize) -> Self {
        assert!(depth > 0, "port depth must be > 0");
        Self(Arc::new(RwLock::new(Channel {
            depth,
            slots: VecDeque::new(),
        })))
    }

    /// Enqueue a value that becomes visible to the consumer at
    /// `now + extra_latency`.  Returns false when the channel is at capacity.
    fn try_push(&self, now: Cycle, data: T, extra_latency: Cycle) -> bool {
        let mut chan = self.0.write().expect("rw lock poisoned");
        if chan.slots.len() >= chan.depth {
            return false;
        }
        chan.slots.push_back(Slot {
            ready_at: now.saturating_add(extra_latency),
            data,
        });
        true
    }

    fn peek(&self, now: Cycle) -> Option<T> {
        let chan = self.0.read().expect("rw lock poisoned");
        chan.slots
            .front()
            .filter(|slot| slot.ready_at <= now)
            .map(|slot| slot.data.clone())
    }

    fn pop(&self, now: Cycle) -> Option<T> {
        let mut chan = self.0.write().expect("rw lock poisoned");
        match chan.slots.front() {
            Some(slot) if slot.ready_at <= now => chan.slots.pop_front().map(|slot| slot.data),
            _ => None,
        }
    }

    fn space(&self) -> usize {
        let chan = self.0.read().expect("rw lock poisoned");
        chan.depth - chan.slots.len()
    }

    fn occupancy(&self) -> usize {
        self.0.read().expect("rw lock poisoned").slots.len()
    }
}

pub struct Port<T> {
    depth: usize,
    chan: OnceLock<ChannelRef<T>>,
}

impl<T: Clone> Default for Port<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Port<T> {
    pub fn new() -> Self {
        Self::with_depth(DEFAULT_PORT_DEPTH)
    }

    pub fn with_depth(depth: usize) -> Self {
        Port {
            depth,
            chan: OnceLock::new(),
        }
    }

    fn chan(&self) -> &ChannelRef<T> {
        self.chan.get_or_init(|| ChannelRef::new(self.depth))
    }

    pub fn try_push(&self, now: Cycle, data: T, extra_latency: Cycle) -> bool {
        self.chan().try_push(now, data, extra_latency)
    }

    /// Front element, only once its ready cycle has arrived.  A front element
    /// still in flight blocks everything behind it.
    pub fn peek(&self, now: Cycle) -> Option<T> {
        self.chan().peek(now)
    }

    pub fn pop(&self, now: Cycle) -> Option<T> {
        self.chan().pop(now)
    }

    pub fn is_empty(&self, now: Cycle) -> bool {
        self.peek(now).is_none()
    }

    /// Free slots, counting entries that are not yet visible.
    pub fn space(&self) -> usize {
        self.chan().space()
    }

    pub fn occupancy(&self) -> usize {
        self.chan().occupancy()
    }
}

/// Fix a one-to-one wiring between two ports by giving them the same queue.
/// Set only at construction and immutable afterward; linking a port twice is
/// a fatal wiring error.
pub fn link<T: Clone>(a: &Port<T>, b: &Port<T>) {
    let chan = ChannelRef::new(a.depth.max(b.depth));
    a.chan
        .set(chan.clone())
        .map_err(|_| "")
        .expect("port already linked");
    b.chan
        .set(chan)
        .map_err(|_| "")
        .expect("port already linked");
}

/// Whether two ports share the same underlying channel.
pub fn same_channel<T>(a: &Port<T>, b: &Port<T>) -> bool {
    match (a.chan.get(), b.chan.get()) {
        (Some(x), Some(y)) => Arc::ptr_eq(&x.0, &y.0),
        _ => false,
    }
}

pub fn ports<T: Clone>(count: usize) -> Vec<Port<T>> {
    (0..count).map(|_| Port::new()).collect()
}
