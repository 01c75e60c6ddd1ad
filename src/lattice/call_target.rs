use std::fmt;

use super::Lattice;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Accuracy {
    /// The target is a hint: the call may go there.
    Possible,
    /// The call is statically known to go there.
    Certain,
}

/// Which function a call invokes.
///
/// For every target `t` the values form the chain
/// `⊥ < Certain(t) < Possible(t) < ⊤`; chains of different targets only
/// meet at top and bottom.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct CallTargetValue {
    accuracy: Accuracy,
    target: Option<String>,
}

impl CallTargetValue {
    pub fn certain(target: impl Into<String>) -> Self {
        Self {
            accuracy: Accuracy::Certain,
            target: Some(target.into()),
        }
    }

    pub fn possible(target: impl Into<String>) -> Self {
        Self {
            accuracy: Accuracy::Possible,
            target: Some(target.into()),
        }
    }

    pub fn accuracy(&self) -> Accuracy {
        self.accuracy
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn is_certain(&self) -> bool {
        self.accuracy == Accuracy::Certain && self.target.is_some()
    }

    fn rank(&self) -> u64 {
        match (&self.target, self.accuracy) {
            (None, Accuracy::Possible) => 0,
            (Some(_), Accuracy::Possible) => 1,
            (Some(_), Accuracy::Certain) => 2,
            (None, Accuracy::Certain) => 3,
        }
    }
}

impl Lattice for CallTargetValue {
    const NAME: &'static str = "call-target";

    fn top() -> Self {
        Self {
            accuracy: Accuracy::Possible,
            target: None,
        }
    }

    fn bottom() -> Self {
        Self {
            accuracy: Accuracy::Certain,
            target: None,
        }
    }

    fn is_top(&self) -> bool {
        self.target.is_none() && self.accuracy == Accuracy::Possible
    }

    fn is_bottom(&self) -> bool {
        self.target.is_none() && self.accuracy == Accuracy::Certain
    }

    fn le(&self, other: &Self) -> bool {
        if self.is_bottom() || other.is_top() {
            return true;
        }
        if self.is_top() || other.is_bottom() {
            return false;
        }
        if self.target != other.target {
            return false;
        }
        self.accuracy == Accuracy::Certain || other.accuracy == Accuracy::Possible
    }

    fn merge_with(&mut self, other: &Self) -> bool {
        if other.le(self) {
            return false;
        }
        if self.le(other) {
            *self = other.clone();
        } else {
            *self = Self::top();
        }
        true
    }

    fn specificity(&self) -> u64 {
        self.rank()
    }
}

impl fmt::Display for CallTargetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.target, self.accuracy) {
            (None, Accuracy::Possible) => write!(f, "⊤"),
            (None, Accuracy::Certain) => write!(f, "⊥"),
            (Some(target), Accuracy::Possible) => write!(f, "possible {}", target),
            (Some(target), Accuracy::Certain) => write!(f, "{}", target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::lattice::tests::check_lattice_laws;

    #[test]
    fn test_laws() {
        check_lattice_laws(&[
            CallTargetValue::top(),
            CallTargetValue::bottom(),
            CallTargetValue::certain("+"),
            CallTargetValue::possible("+"),
            CallTargetValue::certain("print"),
            CallTargetValue::possible("print"),
        ]);
    }

    #[test]
    fn test_certain_refines_possible() {
        let certain = CallTargetValue::certain("+");
        let possible = CallTargetValue::possible("+");
        assert!(certain.le(&possible));
        assert!(!possible.le(&certain));
        assert!(!certain.le(&CallTargetValue::certain("-")));
    }

    #[test]
    fn test_merge() {
        let mut v = CallTargetValue::certain("+");
        assert!(v.merge_with(&CallTargetValue::possible("+")));
        assert_eq!(v, CallTargetValue::possible("+"));
        assert!(!v.merge_with(&CallTargetValue::certain("+")));

        let mut w = CallTargetValue::certain("+");
        assert!(w.merge_with(&CallTargetValue::certain("-")));
        assert!(w.is_top());
    }

    #[test]
    fn test_accessors() {
        let v = CallTargetValue::possible("f");
        assert_eq!(v.target(), Some("f"));
        assert_eq!(v.accuracy(), Accuracy::Possible);
        assert!(!v.is_certain());
        assert!(CallTargetValue::certain("f").is_certain());
        assert!(!CallTargetValue::bottom().is_certain());
    }
}
