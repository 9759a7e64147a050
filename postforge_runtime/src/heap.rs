//! Arena heap with save/restore snapshot-and-rollback.
//!
//! Allocation is append-only, so "everything allocated after a save" is
//! exactly "every slot index at or past the save's watermark" and restore
//! can reclaim by truncation. Mutation goes through [`Heap::get_mut`], which
//! copies a slot's store into the innermost save's undo log the first time
//! the slot is touched at that save level.

use crate::dict::DictStore;
use postforge_core::{ErrorKind, Handle, Object, PsResult};
use tracing::trace;

/// The backing store of one arena slot.
#[derive(Clone, Debug)]
pub enum Store {
    Array(Vec<Object>),
    Dict(DictStore),
    Bytes(Vec<u8>),
}

impl Store {
    pub fn as_array(&self) -> PsResult<&Vec<Object>> {
        match self {
            Store::Array(v) => Ok(v),
            _ => Err(ErrorKind::VmError.into()),
        }
    }

    pub fn as_array_mut(&mut self) -> PsResult<&mut Vec<Object>> {
        match self {
            Store::Array(v) => Ok(v),
            _ => Err(ErrorKind::VmError.into()),
        }
    }

    pub fn as_dict(&self) -> PsResult<&DictStore> {
        match self {
            Store::Dict(d) => Ok(d),
            _ => Err(ErrorKind::VmError.into()),
        }
    }

    pub fn as_dict_mut(&mut self) -> PsResult<&mut DictStore> {
        match self {
            Store::Dict(d) => Ok(d),
            _ => Err(ErrorKind::VmError.into()),
        }
    }

    pub fn as_bytes(&self) -> PsResult<&Vec<u8>> {
        match self {
            Store::Bytes(b) => Ok(b),
            _ => Err(ErrorKind::VmError.into()),
        }
    }

    pub fn as_bytes_mut(&mut self) -> PsResult<&mut Vec<u8>> {
        match self {
            Store::Bytes(b) => Ok(b),
            _ => Err(ErrorKind::VmError.into()),
        }
    }

    /// Rough byte footprint, for `vmstatus`.
    pub fn footprint(&self) -> usize {
        match self {
            Store::Array(v) => v.len() * std::mem::size_of::<Object>(),
            Store::Dict(d) => d.len() * 2 * std::mem::size_of::<Object>(),
            Store::Bytes(b) => b.len(),
        }
    }
}

struct Slot {
    store: Store,
    /// Save level at which this slot was last checkpointed (or allocated).
    saved_at: u32,
}

/// One pending `save`: watermark for truncation plus the undo log of
/// `(handle, pre-save store, previous checkpoint level)` triples.
pub struct SaveRecord {
    pub serial: u64,
    watermark: usize,
    undo: Vec<(u32, Store, u32)>,
}

/// One VM heap (local or global).
pub struct Heap {
    slots: Vec<Slot>,
    saves: Vec<SaveRecord>,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            saves: Vec::new(),
        }
    }

    /// Current save nesting depth.
    #[inline]
    pub fn save_level(&self) -> u32 {
        self.saves.len() as u32
    }

    /// Allocate a fresh slot.
    pub fn alloc(&mut self, store: Store) -> Handle {
        let handle = Handle(self.slots.len() as u32);
        self.slots.push(Slot {
            store,
            saved_at: self.save_level(),
        });
        handle
    }

    /// Read access to a slot's store.
    #[inline]
    pub fn get(&self, handle: Handle) -> PsResult<&Store> {
        self.slots
            .get(handle.0 as usize)
            .map(|s| &s.store)
            .ok_or_else(|| ErrorKind::VmError.into())
    }

    /// Mutable access, copying the store aside into the innermost save's
    /// undo log the first time the slot is written at this level.
    pub fn get_mut(&mut self, handle: Handle) -> PsResult<&mut Store> {
        let level = self.save_level();
        let idx = handle.0 as usize;
        if idx >= self.slots.len() {
            return Err(ErrorKind::VmError.into());
        }
        let saved_at = self.slots[idx].saved_at;
        if level > 0 && saved_at < level {
            let copy = self.slots[idx].store.clone();
            let record = self.saves.last_mut().ok_or(ErrorKind::VmError)?;
            record.undo.push((handle.0, copy, saved_at));
            self.slots[idx].saved_at = level;
        }
        Ok(&mut self.slots[idx].store)
    }

    /// Arm a new save level.
    pub fn begin_save(&mut self, serial: u64) {
        trace!(serial, level = self.saves.len() + 1, "vm save");
        self.saves.push(SaveRecord {
            serial,
            watermark: self.slots.len(),
            undo: Vec::new(),
        });
    }

    /// Whether the given save serial is still live in this heap.
    pub fn has_save(&self, serial: u64) -> bool {
        self.saves.iter().any(|r| r.serial == serial)
    }

    /// True if the slot was allocated after the save with the given serial
    /// (used for `invalidrestore` checks against live stacks).
    pub fn newer_than(&self, handle: Handle, serial: u64) -> bool {
        match self.saves.iter().find(|r| r.serial == serial) {
            Some(record) => (handle.0 as usize) >= record.watermark,
            None => false,
        }
    }

    /// Pop the topmost save: reinstall logged stores, truncate slots
    /// allocated past the watermark.
    pub fn restore_one(&mut self) -> PsResult<()> {
        let record = self.saves.pop().ok_or(ErrorKind::InvalidRestore)?;
        trace!(
            serial = record.serial,
            undone = record.undo.len(),
            reclaimed = self.slots.len() - record.watermark,
            "vm restore"
        );
        for (handle, store, prev_level) in record.undo.into_iter().rev() {
            let slot = &mut self.slots[handle as usize];
            slot.store = store;
            slot.saved_at = prev_level;
        }
        self.slots.truncate(record.watermark);
        Ok(())
    }

    /// Restore down to and including the save with the given serial.
    pub fn restore_to(&mut self, serial: u64) -> PsResult<()> {
        if !self.has_save(serial) {
            return Err(ErrorKind::InvalidRestore.into());
        }
        loop {
            let top = self
                .saves
                .last()
                .ok_or(ErrorKind::InvalidRestore)?
                .serial;
            self.restore_one()?;
            if top == serial {
                return Ok(());
            }
        }
    }

    /// Bytes in use across live slots, for `vmstatus`.
    pub fn used_bytes(&self) -> usize {
        self.slots.iter().map(|s| s.store.footprint()).sum()
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_array(vals: &[i32]) -> Store {
        Store::Array(vals.iter().map(|&i| Object::integer(i)).collect())
    }

    #[test]
    fn restore_reinstalls_mutated_store() {
        let mut heap = Heap::new();
        let h = heap.alloc(int_array(&[1, 2, 3]));
        heap.begin_save(1);
        heap.get_mut(h).unwrap().as_array_mut().unwrap()[0] = Object::integer(99);
        heap.restore_to(1).unwrap();
        let v = heap.get(h).unwrap().as_array().unwrap();
        assert_eq!(v[0], Object::integer(1));
    }

    #[test]
    fn restore_drops_post_save_allocations() {
        let mut heap = Heap::new();
        let before = heap.alloc(Store::Bytes(b"keep".to_vec()));
        heap.begin_save(7);
        let after = heap.alloc(Store::Bytes(b"drop".to_vec()));
        assert!(heap.newer_than(after, 7));
        assert!(!heap.newer_than(before, 7));
        heap.restore_to(7).unwrap();
        assert!(heap.get(before).is_ok());
        assert!(heap.get(after).is_err());
    }

    #[test]
    fn nested_saves_roll_back_in_order() {
        let mut heap = Heap::new();
        let h = heap.alloc(int_array(&[0]));
        heap.begin_save(1);
        heap.get_mut(h).unwrap().as_array_mut().unwrap()[0] = Object::integer(1);
        heap.begin_save(2);
        heap.get_mut(h).unwrap().as_array_mut().unwrap()[0] = Object::integer(2);

        heap.restore_to(2).unwrap();
        assert_eq!(
            heap.get(h).unwrap().as_array().unwrap()[0],
            Object::integer(1)
        );
        heap.restore_to(1).unwrap();
        assert_eq!(
            heap.get(h).unwrap().as_array().unwrap()[0],
            Object::integer(0)
        );
    }

    #[test]
    fn restore_skipping_levels_unwinds_all_of_them(){
        let mut heap = Heap::new();
        let h = heap.alloc(int_array(&[0]));
        heap.begin_save(1);
        heap.begin_save(2);
        heap.get_mut(h).unwrap().as_array_mut().unwrap()[0] = Object::integer(5);
        heap.restore_to(1).unwrap();
        assert_eq!(heap.save_level(), 0);
        assert_eq!(
            heap.get(h).unwrap().as_array().unwrap()[0],
            Object::integer(0)
        );
    }

    #[test]
    fn save_with_no_mutation_is_a_noop() {
        let mut heap = Heap::new();
        let h = heap.alloc(Store::Bytes(b"hello".to_vec()));
        heap.begin_save(3);
        heap.restore_to(3).unwrap();
        assert_eq!(heap.get(h).unwrap().as_bytes().unwrap(), b"hello");
    }

    #[test]
    fn invalid_serial_is_invalidrestore() {
        let mut heap = Heap::new();
        heap.begin_save(1);
        assert!(heap.restore_to(42).is_err());
    }
}
