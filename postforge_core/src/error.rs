//! The PLRM error taxonomy as in-band values.
//!
//! A raising operator returns `Err(Error)` with its operands still intact on
//! the operand stack; the execution engine converts the error into the
//! PostScript error protocol (push the offending command, populate `$error`,
//! dispatch through `errordict`). Nothing here unwinds the host stack.

use crate::name::Name;
use std::fmt;

/// Result type used throughout the interpreter.
pub type PsResult<T> = Result<T, Error>;

/// The twenty-six PostScript error names (PLRM 3.10.1 plus Level 2
/// additions).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    VmError,
    DictFull,
    DictStackOverflow,
    DictStackUnderflow,
    ExecStackOverflow,
    InvalidAccess,
    InvalidExit,
    InvalidFileAccess,
    InvalidFont,
    InvalidRestore,
    IoError,
    LimitCheck,
    NoCurrentPoint,
    RangeCheck,
    StackOverflow,
    StackUnderflow,
    SyntaxError,
    Timeout,
    TypeCheck,
    Undefined,
    UndefinedFilename,
    UndefinedResource,
    UndefinedResult,
    UnmatchedMark,
    Unregistered,
    Interrupt,
    ConfigurationError,
}

impl ErrorKind {
    /// Every error kind, in `errordict` installation order.
    pub const ALL: [ErrorKind; 27] = [
        ErrorKind::VmError,
        ErrorKind::DictFull,
        ErrorKind::DictStackOverflow,
        ErrorKind::DictStackUnderflow,
        ErrorKind::ExecStackOverflow,
        ErrorKind::InvalidAccess,
        ErrorKind::InvalidExit,
        ErrorKind::InvalidFileAccess,
        ErrorKind::InvalidFont,
        ErrorKind::InvalidRestore,
        ErrorKind::IoError,
        ErrorKind::LimitCheck,
        ErrorKind::NoCurrentPoint,
        ErrorKind::RangeCheck,
        ErrorKind::StackOverflow,
        ErrorKind::StackUnderflow,
        ErrorKind::SyntaxError,
        ErrorKind::Timeout,
        ErrorKind::TypeCheck,
        ErrorKind::Undefined,
        ErrorKind::UndefinedFilename,
        ErrorKind::UndefinedResource,
        ErrorKind::UndefinedResult,
        ErrorKind::UnmatchedMark,
        ErrorKind::Unregistered,
        ErrorKind::Interrupt,
        ErrorKind::ConfigurationError,
    ];

    /// The PostScript name of this error, exactly as it appears in
    /// `errordict` and `$error`.
    pub fn ps_name(self) -> &'static str {
        match self {
            ErrorKind::VmError => "VMerror",
            ErrorKind::DictFull => "dictfull",
            ErrorKind::DictStackOverflow => "dictstackoverflow",
            ErrorKind::DictStackUnderflow => "dictstackunderflow",
            ErrorKind::ExecStackOverflow => "execstackoverflow",
            ErrorKind::InvalidAccess => "invalidaccess",
            ErrorKind::InvalidExit => "invalidexit",
            ErrorKind::InvalidFileAccess => "invalidfileaccess",
            ErrorKind::InvalidFont => "invalidfont",
            ErrorKind::InvalidRestore => "invalidrestore",
            ErrorKind::IoError => "ioerror",
            ErrorKind::LimitCheck => "limitcheck",
            ErrorKind::NoCurrentPoint => "nocurrentpoint",
            ErrorKind::RangeCheck => "rangecheck",
            ErrorKind::StackOverflow => "stackoverflow",
            ErrorKind::StackUnderflow => "stackunderflow",
            ErrorKind::SyntaxError => "syntaxerror",
            ErrorKind::Timeout => "timeout",
            ErrorKind::TypeCheck => "typecheck",
            ErrorKind::Undefined => "undefined",
            ErrorKind::UndefinedFilename => "undefinedfilename",
            ErrorKind::UndefinedResource => "undefinedresource",
            ErrorKind::UndefinedResult => "undefinedresult",
            ErrorKind::UnmatchedMark => "unmatchedmark",
            ErrorKind::Unregistered => "unregistered",
            ErrorKind::Interrupt => "interrupt",
            ErrorKind::ConfigurationError => "configurationerror",
        }
    }

    /// The interned `Name` of this error.
    #[inline]
    pub fn name(self) -> Name {
        Name::from_str(self.ps_name())
    }

    /// Look an error kind up by its PostScript name.
    pub fn from_name(name: Name) -> Option<ErrorKind> {
        ErrorKind::ALL.iter().copied().find(|k| k.name() == name)
    }
}

/// A raised PostScript error: the kind plus the PostScript name of the
/// offending operator (filled in by the dispatcher when the raising code
/// did not know it).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub command: Option<Name>,
}

impl Error {
    /// An error attributed to the named operator.
    #[inline]
    pub fn new(kind: ErrorKind, command: Name) -> Self {
        Self {
            kind,
            command: Some(command),
        }
    }

    /// An error whose offending command the dispatcher will fill in.
    #[inline]
    pub fn from_kind(kind: ErrorKind) -> Self {
        Self {
            kind,
            command: None,
        }
    }
}

impl From<ErrorKind> for Error {
    #[inline]
    fn from(kind: ErrorKind) -> Self {
        Error::from_kind(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.command {
            Some(cmd) => write!(f, "/{} in --{}--", self.kind.ps_name(), cmd),
            None => write!(f, "/{}", self.kind.ps_name()),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ps_names_round_trip() {
        for kind in ErrorKind::ALL {
            assert_eq!(ErrorKind::from_name(kind.name()), Some(kind));
        }
    }

    #[test]
    fn vmerror_spelling_matches_plrm() {
        assert_eq!(ErrorKind::VmError.ps_name(), "VMerror");
    }

    #[test]
    fn display_includes_command() {
        let e = Error::new(ErrorKind::TypeCheck, Name::new(b"add"));
        assert_eq!(e.to_string(), "/typecheck in --add--");
    }
}
