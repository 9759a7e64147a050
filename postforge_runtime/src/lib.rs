//! Virtual memory for the PostForge interpreter.
//!
//! PostScript composites (arrays, strings, dictionaries) live in arena
//! heaps indexed by integer handles; objects carry `(handle, start, length)`
//! views so `getinterval` and friends share backing stores. Two heaps exist:
//! **local VM** rolls back under `save`/`restore`, **global VM** rolls back
//! only at job boundaries.
//!
//! `save` records an allocation watermark and arms copy-on-write protection;
//! the first mutation of a protected slot copies its store into the save's
//! undo log. `restore` re-installs logged stores and truncates every slot
//! allocated after the watermark.

pub mod dict;
pub mod heap;
pub mod memory;

pub use dict::{DictKey, DictStore};
pub use heap::{Heap, SaveRecord, Store};
pub use memory::Memory;
