//! The dual-heap memory facade.
//!
//! Every composite accessor takes the full object reference (handle plus
//! slice window) and performs the bounds and access arithmetic in one place,
//! so operators never index backing stores directly.

use crate::dict::{simple_key, DictKey, DictStore};
use crate::heap::{Heap, Store};
use postforge_core::{
    Access, ArrayRef, DictRef, ErrorKind, Name, Object, PsResult, Space, StringRef, Value,
};

/// Local and global VM, owned by the interpreter context.
pub struct Memory {
    pub local: Heap,
    pub global: Heap,
}

impl Memory {
    pub fn new() -> Self {
        Self {
            local: Heap::new(),
            global: Heap::new(),
        }
    }

    #[inline]
    pub fn heap(&self, space: Space) -> &Heap {
        match space {
            Space::Local => &self.local,
            Space::Global => &self.global,
        }
    }

    #[inline]
    pub fn heap_mut(&mut self, space: Space) -> &mut Heap {
        match space {
            Space::Local => &mut self.local,
            Space::Global => &mut self.global,
        }
    }

    // -------------------------------------------------------------------
    // Allocation
    // -------------------------------------------------------------------

    pub fn alloc_array(&mut self, space: Space, elems: Vec<Object>) -> ArrayRef {
        let len = elems.len();
        let handle = self.heap_mut(space).alloc(Store::Array(elems));
        ArrayRef {
            space,
            handle,
            start: 0,
            len,
        }
    }

    pub fn alloc_string(&mut self, space: Space, bytes: Vec<u8>) -> StringRef {
        let len = bytes.len();
        let handle = self.heap_mut(space).alloc(Store::Bytes(bytes));
        StringRef {
            space,
            handle,
            start: 0,
            len,
        }
    }

    pub fn alloc_dict(&mut self, space: Space, capacity: usize) -> DictRef {
        let handle = self
            .heap_mut(space)
            .alloc(Store::Dict(DictStore::new(capacity)));
        DictRef { space, handle }
    }

    // -------------------------------------------------------------------
    // Arrays
    // -------------------------------------------------------------------

    /// The element slice an `ArrayRef` views.
    pub fn array(&self, r: ArrayRef) -> PsResult<&[Object]> {
        let store = self.heap(r.space).get(r.handle)?.as_array()?;
        store
            .get(r.start..r.start + r.len)
            .ok_or_else(|| ErrorKind::RangeCheck.into())
    }

    pub fn array_get(&self, r: ArrayRef, index: usize) -> PsResult<Object> {
        if index >= r.len {
            return Err(ErrorKind::RangeCheck.into());
        }
        Ok(self.array(r)?[index])
    }

    pub fn array_put(&mut self, r: ArrayRef, index: usize, value: Object) -> PsResult<()> {
        if index >= r.len {
            return Err(ErrorKind::RangeCheck.into());
        }
        let store = self.heap_mut(r.space).get_mut(r.handle)?.as_array_mut()?;
        store[r.start + index] = value;
        Ok(())
    }

    /// Overwrite `r[index..]` with the elements of `src`.
    pub fn array_put_interval(
        &mut self,
        r: ArrayRef,
        index: usize,
        src: Vec<Object>,
    ) -> PsResult<()> {
        if index + src.len() > r.len {
            return Err(ErrorKind::RangeCheck.into());
        }
        let store = self.heap_mut(r.space).get_mut(r.handle)?.as_array_mut()?;
        store[r.start + index..r.start + index + src.len()].copy_from_slice(&src);
        Ok(())
    }

    // -------------------------------------------------------------------
    // Strings
    // -------------------------------------------------------------------

    pub fn string(&self, r: StringRef) -> PsResult<&[u8]> {
        let store = self.heap(r.space).get(r.handle)?.as_bytes()?;
        store
            .get(r.start..r.start + r.len)
            .ok_or_else(|| ErrorKind::RangeCheck.into())
    }

    pub fn string_vec(&self, r: StringRef) -> PsResult<Vec<u8>> {
        Ok(self.string(r)?.to_vec())
    }

    pub fn string_get(&self, r: StringRef, index: usize) -> PsResult<u8> {
        if index >= r.len {
            return Err(ErrorKind::RangeCheck.into());
        }
        Ok(self.string(r)?[index])
    }

    pub fn string_put(&mut self, r: StringRef, index: usize, byte: u8) -> PsResult<()> {
        if index >= r.len {
            return Err(ErrorKind::RangeCheck.into());
        }
        let store = self.heap_mut(r.space).get_mut(r.handle)?.as_bytes_mut()?;
        store[r.start + index] = byte;
        Ok(())
    }

    pub fn string_put_interval(&mut self, r: StringRef, index: usize, src: &[u8]) -> PsResult<()> {
        if index + src.len() > r.len {
            return Err(ErrorKind::RangeCheck.into());
        }
        let store = self.heap_mut(r.space).get_mut(r.handle)?.as_bytes_mut()?;
        store[r.start + index..r.start + index + src.len()].copy_from_slice(src);
        Ok(())
    }

    // -------------------------------------------------------------------
    // Dictionaries
    // -------------------------------------------------------------------

    pub fn dict(&self, r: DictRef) -> PsResult<&DictStore> {
        self.heap(r.space).get(r.handle)?.as_dict()
    }

    pub fn dict_mut(&mut self, r: DictRef) -> PsResult<&mut DictStore> {
        self.heap_mut(r.space).get_mut(r.handle)?.as_dict_mut()
    }

    /// Effective access of any object: dictionaries read it from the shared
    /// store, everything else from the reference.
    pub fn access_of(&self, obj: &Object) -> Access {
        match obj.value {
            Value::Dict(r) => match self.dict(r) {
                Ok(store) => store.access,
                Err(_) => Access::None,
            },
            _ => obj.access,
        }
    }

    /// Normalize any object into a dictionary key. String keys convert to
    /// names by byte content (PLRM 3.3.9).
    pub fn dict_key(&self, obj: &Object) -> PsResult<DictKey> {
        if let Some(key) = simple_key(obj)? {
            return Ok(key);
        }
        let r = obj.as_string().ok_or(ErrorKind::TypeCheck)?;
        Ok(DictKey::Name(Name::new(self.string(r)?)))
    }

    pub fn dict_get(&self, r: DictRef, key: DictKey) -> PsResult<Option<Object>> {
        Ok(self.dict(r)?.get(key))
    }

    pub fn dict_put(&mut self, r: DictRef, key: DictKey, value: Object) -> PsResult<()> {
        // Local composites must not leak into global dictionaries
        // (PLRM 3.7.2: invalidaccess).
        if r.space == Space::Global && value.is_composite() && !value.is_global() {
            return Err(ErrorKind::InvalidAccess.into());
        }
        self.dict_mut(r)?.put(key, value);
        Ok(())
    }

    // -------------------------------------------------------------------
    // Save bookkeeping
    // -------------------------------------------------------------------

    /// True if the composite was allocated after the save with `serial`
    /// in local VM (the `invalidrestore` test for live stack entries).
    pub fn newer_than_save(&self, obj: &Object, serial: u64) -> bool {
        match obj.value {
            Value::Array(r) | Value::PackedArray(r) if r.space == Space::Local => {
                self.local.newer_than(r.handle, serial)
            }
            Value::String(r) if r.space == Space::Local => self.local.newer_than(r.handle, serial),
            Value::Dict(r) if r.space == Space::Local => self.local.newer_than(r.handle, serial),
            _ => false,
        }
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_views_share_backing() {
        let mut mem = Memory::new();
        let r = mem.alloc_string(Space::Local, b"hello".to_vec());
        let view = StringRef {
            start: r.start + 1,
            len: 3,
            ..r
        };
        mem.string_put(view, 0, b'E').unwrap();
        assert_eq!(mem.string(r).unwrap(), b"hEllo");
    }

    #[test]
    fn putinterval_observed_through_both_references() {
        let mut mem = Memory::new();
        let r = mem.alloc_string(Space::Local, b"hello".to_vec());
        let dup = r; // dup shares the handle
        mem.string_put_interval(r, 0, b"H").unwrap();
        assert_eq!(mem.string(dup).unwrap(), b"Hello");
    }

    #[test]
    fn local_value_in_global_dict_is_invalidaccess() {
        let mut mem = Memory::new();
        let local_arr = mem.alloc_array(Space::Local, vec![Object::integer(1)]);
        let gdict = mem.alloc_dict(Space::Global, 4);
        let err = mem
            .dict_put(
                gdict,
                DictKey::Name(Name::new(b"x")),
                Object::new(Value::Array(local_arr)),
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidAccess);
    }

    #[test]
    fn string_keys_collapse_to_names() {
        let mut mem = Memory::new();
        let s = mem.alloc_string(Space::Local, b"width".to_vec());
        let key = mem
            .dict_key(&Object::new(Value::String(s)))
            .unwrap();
        assert_eq!(key, DictKey::Name(Name::new(b"width")));
    }

    #[test]
    fn out_of_window_access_is_rangecheck() {
        let mut mem = Memory::new();
        let r = mem.alloc_array(Space::Local, vec![Object::integer(0); 3]);
        assert!(mem.array_get(r, 3).is_err());
        assert!(mem.array_put(r, 3, Object::null()).is_err());
    }
}
