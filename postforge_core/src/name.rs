//! Globally interned PostScript names.
//!
//! Two names are equal iff their byte strings are equal (PLRM 3.3.5), so
//! names intern into a process-wide table and compare as a single `u32`.
//! Dictionary keys, operator identities, and error commands are all `Name`s.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::LazyLock;

/// Process-wide intern table. Names are immutable and never collected, so
/// the backing byte strings are leaked into `'static` storage.
static INTERNER: LazyLock<RwLock<Interner>> = LazyLock::new(|| RwLock::new(Interner::new()));

struct Interner {
    map: FxHashMap<&'static [u8], u32>,
    table: Vec<&'static [u8]>,
}

impl Interner {
    fn new() -> Self {
        Self {
            map: FxHashMap::default(),
            table: Vec::with_capacity(1024),
        }
    }

    fn intern(&mut self, bytes: &[u8]) -> u32 {
        if let Some(&id) = self.map.get(bytes) {
            return id;
        }
        let leaked: &'static [u8] = Box::leak(bytes.to_vec().into_boxed_slice());
        let id = self.table.len() as u32;
        self.table.push(leaked);
        self.map.insert(leaked, id);
        id
    }
}

/// An interned PostScript name.
///
/// Equality and hashing are by intern id, which by construction agrees with
/// byte-string equality.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(u32);

impl Name {
    /// Intern `bytes`, returning the canonical `Name` for that byte string.
    pub fn new(bytes: &[u8]) -> Self {
        // Fast path: already interned.
        {
            let interner = INTERNER.read();
            if let Some(&id) = interner.map.get(bytes) {
                return Name(id);
            }
        }
        Name(INTERNER.write().intern(bytes))
    }

    /// Intern a UTF-8 string literal.
    #[inline]
    pub fn from_str(s: &str) -> Self {
        Self::new(s.as_bytes())
    }

    /// The interned byte string.
    #[inline]
    pub fn as_bytes(self) -> &'static [u8] {
        INTERNER.read().table[self.0 as usize]
    }

    /// Byte length of the name.
    #[inline]
    pub fn len(self) -> usize {
        self.as_bytes().len()
    }

    /// True for the empty name `/`.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_bytes_intern_to_equal_names() {
        let a = Name::new(b"moveto");
        let b = Name::from_str("moveto");
        assert_eq!(a, b);
        assert_eq!(a.as_bytes(), b"moveto");
    }

    #[test]
    fn distinct_bytes_intern_to_distinct_names() {
        assert_ne!(Name::new(b"fill"), Name::new(b"eofill"));
    }

    #[test]
    fn empty_name_is_valid() {
        let n = Name::new(b"");
        assert!(n.is_empty());
        assert_eq!(n, Name::new(b""));
    }
}
