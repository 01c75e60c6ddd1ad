use std::fmt;

use super::Lattice;

/// Whether a value is a compile-time constant.
///
/// Flat lattice: `Bottom < Constant(c) < Top` for every `c`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ConstantsValue {
    /// Contradiction / unreachable.
    Bottom,
    /// Exactly this value.
    Constant(i32),
    /// Not known to be constant.
    Top,
}

impl ConstantsValue {
    pub fn constant(value: i32) -> Self {
        ConstantsValue::Constant(value)
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, ConstantsValue::Constant(_))
    }

    pub fn as_constant(&self) -> Option<i32> {
        match self {
            ConstantsValue::Constant(value) => Some(*value),
            _ => None,
        }
    }
}

impl Lattice for ConstantsValue {
    const NAME: &'static str = "constants";

    fn top() -> Self {
        ConstantsValue::Top
    }

    fn bottom() -> Self {
        ConstantsValue::Bottom
    }

    fn is_top(&self) -> bool {
        matches!(self, ConstantsValue::Top)
    }

    fn is_bottom(&self) -> bool {
        matches!(self, ConstantsValue::Bottom)
    }

    fn le(&self, other: &Self) -> bool {
        match (self, other) {
            (ConstantsValue::Bottom, _) | (_, ConstantsValue::Top) => true,
            (ConstantsValue::Constant(a), ConstantsValue::Constant(b)) => a == b,
            _ => false,
        }
    }

    fn merge_with(&mut self, other: &Self) -> bool {
        let joined = match (*self, *other) {
            (ConstantsValue::Bottom, x) | (x, ConstantsValue::Bottom) => x,
            (ConstantsValue::Constant(a), ConstantsValue::Constant(b)) if a == b => *self,
            _ => ConstantsValue::Top,
        };
        let changed = joined != *self;
        *self = joined;
        changed
    }

    fn specificity(&self) -> u64 {
        match self {
            ConstantsValue::Top => 0,
            ConstantsValue::Constant(_) => 1,
            ConstantsValue::Bottom => 2,
        }
    }
}

impl fmt::Display for ConstantsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantsValue::Bottom => write!(f, "⊥"),
            ConstantsValue::Constant(value) => write!(f, "constant {}", value),
            ConstantsValue::Top => write!(f, "⊤"),
        }
    }
}
