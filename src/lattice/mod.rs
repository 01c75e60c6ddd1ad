//! Abstract values.
//!
//! Every analysis produces facts of one lattice value type. All of them share
//! the [`Lattice`] interface:
//!
//! | Type | Top | Bottom | Shape |
//! |------|-----|--------|-------|
//! | [`RangeValue`] | `[MIN, MAX]` | `[MAX, MIN]` | intervals ordered by containment |
//! | [`CallTargetValue`] | possible, no target | certain, no target | `⊥ < Certain(t) < Possible(t) < ⊤` |
//! | [`TypeShapeValue`] | `any` | type `Bottom` | type chain × shape chain |
//! | [`ConstantsValue`] | unknown | contradiction | flat over `i32` |
//!
//! # Refinement order
//!
//! `a.le(&b)` reads "`a` is at least as specific as `b`". A value pattern
//! requiring `v` matches a location whose computed fact `a` satisfies
//! `a.le(&v)`: bottom matches every pattern, a pattern requiring top matches
//! every location.
//!
//! # Specificity
//!
//! [`Lattice::specificity`] maps values to a score that strictly grows when
//! moving down any chain (`a < b` implies `a.specificity() > b.specificity()`).
//! It is only used to rank patterns; incomparable values may tie.

use std::fmt::{Debug, Display};

mod call_target;
mod constants;
mod range;
mod type_shape;

pub use call_target::{Accuracy, CallTargetValue};
pub use constants::ConstantsValue;
pub use range::RangeValue;
pub use type_shape::{Shape, Type, TypeShapeValue};

/// A bounded lattice of abstract facts.
///
/// # Laws
///
/// - `bottom ⊑ x ⊑ top`
/// - `⊑` is reflexive, transitive and antisymmetric up to `==`
/// - after `x.merge_with(y)`, both the old `x` and `y` are `⊑ x`
/// - `x.merge_with(x)` returns `false` and leaves `x` unchanged
pub trait Lattice: Clone + Debug + Display + PartialEq {
    /// Name of the analysis family producing values of this type.
    const NAME: &'static str;

    fn top() -> Self;

    fn bottom() -> Self;

    fn is_top(&self) -> bool;

    fn is_bottom(&self) -> bool;

    /// Partial order: `self ⊑ other`.
    fn le(&self, other: &Self) -> bool;

    /// Widens `self` to the join of `self` and `other`.
    ///
    /// Returns `true` if `self` changed.
    fn merge_with(&mut self, other: &Self) -> bool;

    /// Ranking score, larger is more specific.
    fn specificity(&self) -> u64;

    /// Least upper bound as a new value.
    fn join(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge_with(other);
        result
    }

    /// Checks the `bottom ⊑ self ⊑ top` contract in debug builds.
    fn debug_check(&self) {
        debug_assert!(
            Self::bottom().le(self) && self.le(&Self::top()),
            "Lattice contract violated by {}",
            self
        );
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Checks the lattice laws over every pair and triple of `samples`.
    pub(crate) fn check_lattice_laws<L: Lattice>(samples: &[L]) {
        let top = L::top();
        let bottom = L::bottom();
        assert!(top.is_top());
        assert!(bottom.is_bottom());
        assert!(bottom.le(&top));
        assert!(!top.le(&bottom));

        for x in samples {
            assert!(x.le(x), "Reflexivity failed for {}", x);
            assert!(bottom.le(x), "Bottom is not below {}", x);
            assert!(x.le(&top), "{} is not below top", x);

            let mut same = x.clone();
            assert!(!same.merge_with(x), "Merge with self changed {}", x);
            assert_eq!(&same, x);

            for y in samples {
                if x.le(y) && y.le(x) {
                    assert_eq!(x, y, "Antisymmetry failed for {} and {}", x, y);
                }

                let z = x.join(y);
                assert!(x.le(&z), "{} is not below {} ⊔ {} = {}", x, x, y, z);
                assert!(y.le(&z), "{} is not below {} ⊔ {} = {}", y, x, y, z);
                assert_eq!(z, y.join(x), "Join is not commutative for {} and {}", x, y);

                let mut w = x.clone();
                let changed = w.merge_with(y);
                assert_eq!(changed, w != *x);

                if x.le(y) && x != y {
                    assert!(
                        x.specificity() > y.specificity(),
                        "Specificity is not monotone for {} < {}",
                        x,
                        y
                    );
                }

                for z in samples {
                    if x.le(y) && y.le(z) {
                        assert!(x.le(z), "Transitivity failed for {} ⊑ {} ⊑ {}", x, y, z);
                    }
                }
            }
        }
    }
}
