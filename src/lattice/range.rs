use std::fmt;

use super::Lattice;

/// Integer interval `[min, max]`.
///
/// Any inverted pair is the empty interval and is stored as the canonical
/// bottom `[MAX, MIN]`, so equality stays structural.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RangeValue {
    min: i32,
    max: i32,
}

impl RangeValue {
    /// Creates `[min, max]`, normalizing an inverted pair to bottom.
    pub fn new(min: i32, max: i32) -> Self {
        if min > max {
            Self::bottom()
        } else {
            Self { min, max }
        }
    }

    /// Creates `[min, max]`.
    ///
    /// # Panics
    ///
    /// Panics if `min > max`.
    pub fn range(min: i32, max: i32) -> Self {
        assert!(min <= max, "min must be smaller or equal to max");
        Self { min, max }
    }

    pub fn constant(value: i32) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    pub fn min(&self) -> i32 {
        self.min
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn as_constant(&self) -> Option<i32> {
        (self.min == self.max).then_some(self.min)
    }

    pub fn contains(&self, value: i32) -> bool {
        self.min <= value && value <= self.max
    }

    /// Number of values in the interval minus one.
    fn width(&self) -> u64 {
        (self.max as i64 - self.min as i64) as u64
    }

    /// Interval addition; an overflowing bound widens the result to top.
    pub fn add(&self, other: &Self) -> Self {
        if self.is_bottom() || other.is_bottom() {
            return Self::bottom();
        }
        match (self.min.checked_add(other.min), self.max.checked_add(other.max)) {
            (Some(min), Some(max)) => Self { min, max },
            _ => Self::top(),
        }
    }
}

impl Lattice for RangeValue {
    const NAME: &'static str = "range";

    fn top() -> Self {
        Self {
            min: i32::MIN,
            max: i32::MAX,
        }
    }

    fn bottom() -> Self {
        Self {
            min: i32::MAX,
            max: i32::MIN,
        }
    }

    fn is_top(&self) -> bool {
        self.min == i32::MIN && self.max == i32::MAX
    }

    fn is_bottom(&self) -> bool {
        self.min > self.max
    }

    fn le(&self, other: &Self) -> bool {
        if self.is_bottom() || other.is_top() {
            return true;
        }
        if other.is_bottom() {
            return false;
        }
        self.min >= other.min && self.max <= other.max
    }

    fn merge_with(&mut self, other: &Self) -> bool {
        if other.is_bottom() {
            return false;
        }
        if self.is_bottom() {
            *self = *other;
            return true;
        }
        let mut changed = false;
        if other.min < self.min {
            self.min = other.min;
            changed = true;
        }
        if other.max > self.max {
            self.max = other.max;
            changed = true;
        }
        changed
    }

    fn specificity(&self) -> u64 {
        if self.is_bottom() {
            (1u64 << 32) + 1
        } else if self.is_top() {
            0
        } else {
            (1u64 << 32) - self.width()
        }
    }
}

impl fmt::Display for RangeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bottom() {
            write!(f, "⊥")
        } else if self.is_top() {
            write!(f, "⊤")
        } else {
            write!(f, "[{}, {}]", self.min, self.max)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::lattice::tests::check_lattice_laws;

    fn samples() -> Vec<RangeValue> {
        vec![
            RangeValue::bottom(),
            RangeValue::top(),
            RangeValue::constant(0),
            RangeValue::constant(5),
            RangeValue::range(0, 10),
            RangeValue::range(-5, 5),
            RangeValue::range(3, 7),
            RangeValue::range(i32::MIN, 0),
            RangeValue::range(0, i32::MAX),
        ]
    }

    #[test]
    fn test_laws() {
        check_lattice_laws(&samples());
    }

    #[test]
    fn test_inverted_is_bottom() {
        let r = RangeValue::new(5, 1);
        assert!(r.is_bottom());
        assert_eq!(r, RangeValue::bottom());
        assert_eq!(RangeValue::new(9, -9), RangeValue::new(1, 0));
    }

    #[test]
    #[should_panic(expected = "min must be smaller or equal to max")]
    fn test_range_rejects_inverted() {
        RangeValue::range(3, 2);
    }

    #[test]
    fn test_order_is_containment() {
        let narrow = RangeValue::range(3, 7);
        let wide = RangeValue::range(0, 10);
        assert!(narrow.le(&wide));
        assert!(!wide.le(&narrow));
        assert!(!RangeValue::range(-5, 5).le(&wide));
        assert!(!wide.le(&RangeValue::bottom()));
    }

    #[test]
    fn test_merge_is_hull() {
        let mut r = RangeValue::constant(1);
        assert!(r.merge_with(&RangeValue::constant(5)));
        assert_eq!(r, RangeValue::range(1, 5));
        assert!(!r.merge_with(&RangeValue::range(2, 3)));
        assert!(!r.merge_with(&RangeValue::bottom()));

        let mut b = RangeValue::bottom();
        assert!(b.merge_with(&RangeValue::constant(4)));
        assert_eq!(b, RangeValue::constant(4));
    }

    #[test]
    fn test_add() {
        let a = RangeValue::range(1, 2);
        let b = RangeValue::range(10, 20);
        assert_eq!(a.add(&b), RangeValue::range(11, 22));
        assert_eq!(a.add(&RangeValue::bottom()), RangeValue::bottom());
        assert!(RangeValue::constant(i32::MAX).add(&RangeValue::constant(1)).is_top());
        assert_eq!(RangeValue::constant(1).add(&RangeValue::constant(2)).as_constant(), Some(3));
    }

    #[test]
    fn test_specificity() {
        assert_eq!(RangeValue::top().specificity(), 0);
        assert!(RangeValue::constant(3).specificity() > RangeValue::range(3, 4).specificity());
        assert!(RangeValue::bottom().specificity() > RangeValue::constant(i32::MIN).specificity());
    }
}
