//! Type-safe wrappers for program positions.
//!
//! Instructions are addressed in two ways: by [`Location`], the index of the
//! instruction in the program, and by [`Pc`], the byte offset at which it is
//! encoded. Analyses and patterns speak in locations; the program counter is
//! what the instruction stream itself would see.
use std::fmt;

/// An instruction handle (0-indexed position in the program).
///
/// For a value flowing through the program, the location is the instruction
/// that *produced* it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Location(usize);

impl Location {
    /// Creates a new location with the given index.
    pub const fn new(index: usize) -> Self {
        Location(index)
    }

    /// Returns the raw index as a `usize`.
    pub const fn index(self) -> usize {
        self.0
    }

    /// Returns the location right after this one.
    pub const fn next(self) -> Self {
        Location(self.0 + 1)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<Location> for usize {
    fn from(location: Location) -> Self {
        location.0
    }
}

impl From<usize> for Location {
    fn from(index: usize) -> Self {
        Location(index)
    }
}

/// A program counter: byte offset of an instruction in the encoded stream.
///
/// Program counters change whenever something before them is rewritten,
/// locations only shift by the number of instructions added or removed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Pc(usize);

impl Pc {
    pub const fn new(offset: usize) -> Self {
        Pc(offset)
    }

    pub const fn offset(self) -> usize {
        self.0
    }

    /// Advances the program counter past an instruction of `size` bytes.
    pub const fn advance(self, size: usize) -> Self {
        Pc(self.0 + size)
    }
}

impl fmt::Display for Pc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

impl From<Pc> for usize {
    fn from(pc: Pc) -> Self {
        pc.0
    }
}
