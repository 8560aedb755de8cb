use std::collections::HashMap;

use parking_lot::RwLock;

use crate::Handle;

const HANDLE_SHARD_BITS: u32 = 4;
const HANDLE_SHARDS: usize = 1usize << HANDLE_SHARD_BITS;

/// Address-keyed table of live handles, split into independently locked
/// shards so that unrelated handles never contend.
///
/// Every operation is atomic with respect to the handle it touches. Nothing
/// here takes the execution lock.
pub struct HandleTable<T> {
    shards: Vec<RwLock<HashMap<usize, T>>>,
}

fn shard_for_addr(addr: usize) -> usize {
    let mut x = addr as u64;
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51afd7ed558ccd);
    x ^= x >> 33;
    (x as usize) & (HANDLE_SHARDS - 1)
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            shards: (0..HANDLE_SHARDS)
                .map(|_| RwLock::new(HashMap::new()))
                .collect(),
        }
    }

    fn shard(&self, handle: Handle) -> &RwLock<HashMap<usize, T>> {
        &self.shards[shard_for_addr(handle.addr())]
    }

    /// Inserts `value`, returning any entry previously held under `handle`.
    pub fn insert(&self, handle: Handle, value: T) -> Option<T> {
        self.shard(handle).write().insert(handle.addr(), value)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.shard(handle).read().contains_key(&handle.addr())
    }

    pub fn read<R>(&self, handle: Handle, f: impl FnOnce(&T) -> R) -> Option<R> {
        let shard = self.shard(handle).read();
        shard.get(&handle.addr()).map(f)
    }

    pub fn update<R>(&self, handle: Handle, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut shard = self.shard(handle).write();
        shard.get_mut(&handle.addr()).map(f)
    }

    /// Runs `f` with exclusive access to the slot for `handle`. The slot may
    /// be filled, replaced or emptied; the shard stays locked throughout.
    pub fn with_slot<R>(&self, handle: Handle, f: impl FnOnce(&mut Option<T>) -> R) -> R {
        let mut shard = self.shard(handle).write();
        let mut slot = shard.remove(&handle.addr());
        let out = f(&mut slot);
        if let Some(value) = slot {
            shard.insert(handle.addr(), value);
        }
        out
    }

    pub fn remove(&self, handle: Handle) -> Option<T> {
        self.shard(handle).write().remove(&handle.addr())
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read().is_empty())
    }

    /// Empties every shard, returning what was live.
    pub fn drain(&self) -> Vec<(Handle, T)> {
        let mut out = Vec::new();
        for shard in &self.shards {
            let mut shard = shard.write();
            out.extend(shard.drain().map(|(addr, value)| (Handle::from_addr(addr), value)));
        }
        out
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn insert_read_remove() {
        let table = HandleTable::new();
        let h = Handle::from_addr(0x1000);
        assert!(table.insert(h, "a").is_none());
        assert!(table.contains(h));
        assert_eq!(table.read(h, |v| *v), Some("a"));
        assert_eq!(table.update(h, |v| std::mem::replace(v, "b")), Some("a"));
        assert_eq!(table.remove(h), Some("b"));
        assert!(!table.contains(h));
        assert!(table.read(h, |v| *v).is_none());
    }

    #[test]
    fn with_slot_can_empty_and_fill() {
        let table = HandleTable::new();
        let h = Handle::from_addr(0x2000);
        table.with_slot(h, |slot| {
            assert!(slot.is_none());
            *slot = Some(7u32);
        });
        assert_eq!(table.read(h, |v| *v), Some(7));
        let taken = table.with_slot(h, |slot| slot.take());
        assert_eq!(taken, Some(7));
        assert!(table.is_empty());
    }

    #[test]
    fn drain_returns_every_live_entry() {
        let table = HandleTable::new();
        for i in 1..=64usize {
            table.insert(Handle::from_addr(i * 16), i);
        }
        assert_eq!(table.len(), 64);
        let mut drained: Vec<usize> = table.drain().into_iter().map(|(_, v)| v).collect();
        drained.sort_unstable();
        assert_eq!(drained, (1..=64).collect::<Vec<_>>());
        assert!(table.is_empty());
    }

    proptest! {
        #[test]
        fn len_tracks_distinct_addresses(addrs in proptest::collection::vec(1usize..4096, 0..128)) {
            let table = HandleTable::new();
            for addr in &addrs {
                table.insert(Handle::from_addr(*addr * 8), ());
            }
            let mut distinct = addrs.clone();
            distinct.sort_unstable();
            distinct.dedup();
            prop_assert_eq!(table.len(), distinct.len());
        }
    }
}
