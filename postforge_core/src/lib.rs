//! Core object model for the PostForge PostScript interpreter.
//!
//! This crate defines the three foundations every other PostForge crate
//! builds on:
//!
//! - **Objects**: the fifteen tagged PostScript variants with their
//!   literal/executable attribute and access mask ([`Object`], [`Value`])
//! - **Errors**: the PLRM error taxonomy as in-band values ([`ErrorKind`],
//!   [`Error`]) — PostScript errors are never host panics
//! - **Names**: globally interned byte strings with O(1) equality ([`Name`])
//!
//! Composite objects (arrays, strings, dictionaries) carry arena handles
//! into a [`postforge_runtime`]-managed heap rather than owning storage, so
//! every `Object` is `Copy` and the stacks stay flat.

pub mod error;
pub mod name;
pub mod object;

pub use error::{Error, ErrorKind, PsResult};
pub use name::Name;
pub use object::{
    format_real, Access, ArrayRef, Attrib, DictRef, FileId, FontId, GStateId, Handle, MarkKind,
    Object, OperatorId, SaveRef, Space, StringRef, Value,
};

/// Largest PostScript integer; literals past this promote to reals.
pub const MAX_PS_INTEGER: i32 = i32::MAX;

/// Smallest PostScript integer.
pub const MIN_PS_INTEGER: i32 = i32::MIN;
