//! Slab-backed object pool shared by the tile and renderable pools
//!
//! Items live in slabs that are never reallocated once created. Growing the
//! pool appends a new slab, so a `PoolSlot` stays valid for the whole life of
//! the pool.

use bevy::log::debug;

/// Stable address of an item inside a `SlabPool`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolSlot {
    pub slab: u32,
    pub index: u32,
}

struct Entry<T> {
    value: T,
    free: bool,
}

/// Arena of slabs plus a stack of free slots
pub struct SlabPool<T> {
    slabs: Vec<Vec<Entry<T>>>,
    free: Vec<PoolSlot>,
    increment: usize,
    capacity: usize,
    label: &'static str,
}

impl<T: Default> SlabPool<T> {
    /// Create a pool holding `initial` items that grows by `increment`
    pub fn new(label: &'static str, initial: usize, increment: usize) -> Self {
        let mut pool = Self {
            slabs: Vec::new(),
            free: Vec::new(),
            increment: increment.max(1),
            capacity: 0,
            label,
        };
        if initial > 0 {
            pool.grow(initial);
        }
        pool
    }

    /// Append a slab of `count` fresh items
    fn grow(&mut self, count: usize) {
        let slab = self.slabs.len() as u32;
        let entries = (0..count)
            .map(|_| Entry {
                value: T::default(),
                free: true,
            })
            .collect();
        self.slabs.push(entries);
        // Reverse so the lowest index is handed out first
        self.free
            .extend((0..count as u32).rev().map(|index| PoolSlot { slab, index }));
        self.capacity += count;
        debug!(
            "{} pool grew by {} to {} items",
            self.label, count, self.capacity
        );
    }

    /// Take a free item, growing the pool if none is left
    pub fn acquire(&mut self) -> PoolSlot {
        if self.free.is_empty() {
            self.grow(self.increment);
        }
        let slot = self
            .free
            .pop()
            .unwrap_or_else(|| unreachable!("pool grew by at least one item"));
        self.entry_mut(slot).free = false;
        slot
    }

    /// Return an item to the free set. Returns `false` if it was already free.
    pub fn release(&mut self, slot: PoolSlot) -> bool {
        let Some(entry) = self.try_entry_mut(slot) else {
            return false;
        };
        if entry.free {
            return false;
        }
        entry.free = true;
        entry.value = T::default();
        self.free.push(slot);
        true
    }

    pub fn get(&self, slot: PoolSlot) -> Option<&T> {
        self.slabs
            .get(slot.slab as usize)
            .and_then(|slab| slab.get(slot.index as usize))
            .filter(|entry| !entry.free)
            .map(|entry| &entry.value)
    }

    pub fn get_mut(&mut self, slot: PoolSlot) -> Option<&mut T> {
        self.try_entry_mut(slot)
            .filter(|entry| !entry.free)
            .map(|entry| &mut entry.value)
    }

    fn try_entry_mut(&mut self, slot: PoolSlot) -> Option<&mut Entry<T>> {
        self.slabs
            .get_mut(slot.slab as usize)
            .and_then(|slab| slab.get_mut(slot.index as usize))
    }

    fn entry_mut(&mut self, slot: PoolSlot) -> &mut Entry<T> {
        &mut self.slabs[slot.slab as usize][slot.index as usize]
    }

    /// Total number of items ever allocated; never decreases
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Iterate over items currently handed out
    pub fn iter(&self) -> impl Iterator<Item = (PoolSlot, &T)> {
        self.slabs.iter().enumerate().flat_map(|(slab, entries)| {
            entries
                .iter()
                .enumerate()
                .filter(|(_, entry)| !entry.free)
                .map(move |(index, entry)| {
                    (
                        PoolSlot {
                            slab: slab as u32,
                            index: index as u32,
                        },
                        &entry.value,
                    )
                })
        })
    }

    /// Mutably iterate over items currently handed out
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PoolSlot, &mut T)> {
        self.slabs
            .iter_mut()
            .enumerate()
            .flat_map(|(slab, entries)| {
                entries
                    .iter_mut()
                    .enumerate()
                    .filter(|(_, entry)| !entry.free)
                    .map(move |(index, entry)| {
                        (
                            PoolSlot {
                                slab: slab as u32,
                                index: index as u32,
                            },
                            &mut entry.value,
                        )
                    })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_release() {
        let mut pool: SlabPool<u32> = SlabPool::new("test", 2, 1);
        let a = pool.acquire();
        let b = pool.acquire();
        assert_ne!(a, b);
        assert_eq!(pool.free_count(), 0);

        assert!(pool.release(a));
        assert!(!pool.release(a));
        assert_eq!(pool.free_count(), 1);
        assert!(pool.get(a).is_none());
        assert!(pool.get(b).is_some());
    }

    #[test]
    fn test_growth_keeps_slots_stable() {
        let mut pool: SlabPool<u32> = SlabPool::new("test", 1, 3);
        let first = pool.acquire();
        *pool.get_mut(first).unwrap() = 42;

        let grown = pool.acquire();
        assert_eq!(pool.capacity(), 4);
        assert_eq!(grown.slab, 1);
        assert_eq!(pool.get(first), Some(&42));
        assert_eq!(pool.capacity() - pool.free_count(), 2);
    }

    #[test]
    fn test_zero_increment_still_grows() {
        let mut pool: SlabPool<u32> = SlabPool::new("test", 0, 0);
        pool.acquire();
        pool.acquire();
        assert_eq!(pool.capacity(), 2);
    }

    #[test]
    fn test_release_resets_value() {
        let mut pool: SlabPool<u32> = SlabPool::new("test", 1, 1);
        let slot = pool.acquire();
        *pool.get_mut(slot).unwrap() = 7;
        pool.release(slot);
        let again = pool.acquire();
        assert_eq!(again, slot);
        assert_eq!(pool.get(again), Some(&0));
    }

    #[test]
    fn test_iter_only_live() {
        let mut pool: SlabPool<u32> = SlabPool::new("test", 4, 1);
        let a = pool.acquire();
        let _b = pool.acquire();
        pool.release(a);
        assert_eq!(pool.iter().count(), 1);
        for (_, value) in pool.iter_mut() {
            *value = 9;
        }
        assert!(pool.iter().all(|(_, value)| *value == 9));
    }
}
