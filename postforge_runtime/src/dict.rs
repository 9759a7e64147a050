//! Dictionary backing stores and key normalization.

use postforge_core::{Access, ErrorKind, Name, Object, PsResult, Value};
use rustc_hash::FxHashMap;

/// A normalized dictionary key (PLRM 3.3.9).
///
/// Names and strings key by byte content (strings are interned to names at
/// key-creation time), numbers key by numeric value — an integer and a real
/// with the same value are the same key — and booleans key by value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DictKey {
    Name(Name),
    Integer(i32),
    /// A real with no exact integer equivalent, keyed by bit pattern.
    RealBits(u64),
    Boolean(bool),
    Mark,
    Operator(u16),
    /// Composite keys compare by reference identity: heap slot plus the
    /// slice window, matching `eq` on composites.
    Array {
        global: bool,
        packed: bool,
        handle: u32,
        start: u32,
        len: u32,
    },
    Dict {
        global: bool,
        handle: u32,
    },
    File(u32),
    Save(u64),
    Font(u32),
    GState(u32),
}

impl DictKey {
    /// Normalize a numeric object: integral reals collapse onto the integer
    /// key so `1` and `1.0` address the same entry.
    pub fn from_number(n: f64) -> DictKey {
        if n == n.trunc() && n >= i32::MIN as f64 && n <= i32::MAX as f64 {
            DictKey::Integer(n as i32)
        } else {
            DictKey::RealBits(n.to_bits())
        }
    }

    /// The key as a pushable object, for `forall` and `dictstack` walks.
    pub fn to_object(self) -> Object {
        use postforge_core::{
            ArrayRef, DictRef, FileId, FontId, GStateId, Handle, OperatorId, SaveRef, Space,
        };
        let space = |global: bool| if global { Space::Global } else { Space::Local };
        match self {
            DictKey::Name(n) => Object::literal_name(n),
            DictKey::Integer(i) => Object::integer(i),
            DictKey::RealBits(bits) => Object::real(f64::from_bits(bits)),
            DictKey::Boolean(b) => Object::boolean(b),
            DictKey::Mark => Object::mark(),
            DictKey::Operator(id) => Object::operator(OperatorId(id)),
            DictKey::Array {
                global,
                packed,
                handle,
                start,
                len,
            } => {
                let r = ArrayRef {
                    space: space(global),
                    handle: Handle(handle),
                    start: start as usize,
                    len: len as usize,
                };
                if packed {
                    Object::new(Value::PackedArray(r))
                } else {
                    Object::new(Value::Array(r))
                }
            }
            DictKey::Dict { global, handle } => Object::new(Value::Dict(DictRef {
                space: space(global),
                handle: Handle(handle),
            })),
            DictKey::File(id) => Object::new(Value::File(FileId(id))),
            DictKey::Save(serial) => Object::new(Value::Save(SaveRef { serial })),
            DictKey::Font(id) => Object::new(Value::Font(FontId(id))),
            DictKey::GState(id) => Object::new(Value::GState(GStateId(id))),
        }
    }
}

/// The backing store of one dictionary.
///
/// Access is a property of the value, not the reference (PLRM 3.3.2), so it
/// lives here where every `DictRef` to the same slot observes it.
#[derive(Clone, Debug)]
pub struct DictStore {
    entries: FxHashMap<DictKey, Object>,
    /// Insertion order of live keys, so `forall` walks entries in the order
    /// they were defined.
    order: Vec<DictKey>,
    pub max_length: usize,
    pub access: Access,
}

impl DictStore {
    pub fn new(max_length: usize) -> Self {
        Self {
            entries: FxHashMap::default(),
            order: Vec::new(),
            max_length,
            access: Access::Unlimited,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn get(&self, key: DictKey) -> Option<Object> {
        self.entries.get(&key).copied()
    }

    #[inline]
    pub fn contains(&self, key: DictKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Insert, auto-growing capacity (Level 2 semantics). `dictfull` is
    /// never raised here; it remains in the taxonomy for Level 1 streams.
    pub fn put(&mut self, key: DictKey, value: Object) {
        if self.entries.insert(key, value).is_none() {
            self.order.push(key);
            if self.entries.len() > self.max_length {
                self.max_length = self.entries.len();
            }
        }
    }

    pub fn remove(&mut self, key: DictKey) -> Option<Object> {
        let removed = self.entries.remove(&key);
        if removed.is_some() {
            self.order.retain(|k| *k != key);
        }
        removed
    }

    /// Entries in definition order, for `forall` and `copy`.
    pub fn iter_ordered(&self) -> impl Iterator<Item = (DictKey, Object)> + '_ {
        self.order
            .iter()
            .filter_map(move |k| self.entries.get(k).map(|v| (*k, *v)))
    }

    /// Require at least `min` access, raising the PLRM error otherwise.
    pub fn require_access(&self, min: Access) -> PsResult<()> {
        if self.access < min {
            return Err(ErrorKind::InvalidAccess.into());
        }
        Ok(())
    }
}

/// Normalize a key object that does not need string-heap access.
/// String keys are handled by [`crate::Memory::dict_key`], which can read
/// the bytes.
pub fn simple_key(obj: &Object) -> PsResult<Option<DictKey>> {
    Ok(Some(match obj.value {
        Value::Name(n) => DictKey::Name(n),
        Value::Integer(i) => DictKey::Integer(i),
        Value::Real(r) => DictKey::from_number(r),
        Value::Boolean(b) => DictKey::Boolean(b),
        // A null key is the one PLRM-forbidden case.
        Value::Null => return Err(ErrorKind::TypeCheck.into()),
        Value::String(_) => return Ok(None),
        Value::Mark(_) => DictKey::Mark,
        Value::Operator(id) => DictKey::Operator(id.0),
        Value::Array(r) | Value::PackedArray(r) => DictKey::Array {
            global: r.space == postforge_core::Space::Global,
            packed: matches!(obj.value, Value::PackedArray(_)),
            handle: r.handle.0,
            start: r.start as u32,
            len: r.len as u32,
        },
        Value::Dict(r) => DictKey::Dict {
            global: r.space == postforge_core::Space::Global,
            handle: r.handle.0,
        },
        Value::File(id) => DictKey::File(id.0),
        Value::Save(s) => DictKey::Save(s.serial),
        Value::Font(id) => DictKey::Font(id.0),
        Value::GState(id) => DictKey::GState(id.0),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_real_keys_collapse_to_integer() {
        assert_eq!(DictKey::from_number(22.0), DictKey::Integer(22));
        assert!(matches!(DictKey::from_number(2.5), DictKey::RealBits(_)));
    }

    #[test]
    fn put_autogrows_capacity() {
        let mut d = DictStore::new(1);
        d.put(DictKey::Integer(1), Object::integer(10));
        d.put(DictKey::Integer(2), Object::integer(20));
        assert_eq!(d.len(), 2);
        assert!(d.max_length >= 2);
    }

    #[test]
    fn iteration_preserves_definition_order() {
        let mut d = DictStore::new(8);
        for i in 0..5 {
            d.put(DictKey::Integer(i), Object::integer(i * 10));
        }
        d.remove(DictKey::Integer(2));
        let keys: Vec<_> = d.iter_ordered().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                DictKey::Integer(0),
                DictKey::Integer(1),
                DictKey::Integer(3),
                DictKey::Integer(4)
            ]
        );
    }

    #[test]
    fn null_key_is_a_typecheck() {
        assert!(simple_key(&Object::null()).is_err());
    }
}
