//! Analyses and the registry that hands them to the matcher.
//!
//! An analysis is a read-only source of lattice facts keyed by [`Location`].
//! Each analysis *family* is identified by the lattice value type it produces
//! (`RangeValue`, `CallTargetValue`, ...), and every family gets a stable
//! [`AnalysisId`] the first time it is mentioned anywhere in the process.
//!
//! The instances themselves live in an explicit [`Analyses`] context that is
//! passed to the matcher and to rule actions, so tests can swap in canned
//! facts without touching any global state.
//!
//! ```
//! use peephole_rs::analysis::{Analyses, Facts};
//! use peephole_rs::lattice::{ConstantsValue, Lattice};
//! use peephole_rs::types::Location;
//!
//! let mut constants = Facts::new();
//! constants.set(Location::new(0), ConstantsValue::constant(1));
//!
//! let analyses = Analyses::new().with(constants);
//! let known: ConstantsValue = analyses.value_at(Location::new(0));
//! let unknown: ConstantsValue = analyses.value_at(Location::new(1));
//! assert_eq!(known.as_constant(), Some(1));
//! assert!(unknown.is_top());
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::ops::Range;
use std::rc::Rc;
use std::sync::{Mutex, OnceLock};

use log::trace;

use crate::lattice::{CallTargetValue, ConstantsValue, Lattice, RangeValue, TypeShapeValue};
use crate::types::Location;

/// Stable index of an analysis family, shared process-wide.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct AnalysisId(usize);

impl AnalysisId {
    /// Returns the id of the family producing values of type `V`,
    /// reserving a fresh one on first use.
    pub fn of<V: Lattice + 'static>() -> Self {
        static REGISTRY: OnceLock<Mutex<HashMap<TypeId, usize>>> = OnceLock::new();

        let mut registry = REGISTRY
            .get_or_init(|| Mutex::new(HashMap::new()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let next = registry.len();
        let index = *registry.entry(TypeId::of::<V>()).or_insert_with(|| {
            trace!("reserving analysis index {} for {}", next, V::NAME);
            next
        });
        AnalysisId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// A source of lattice facts.
pub trait Analysis: 'static {
    type Value: Lattice + 'static;

    /// Current best fact about `location`; `top` when nothing is known.
    fn value_at(&self, location: Location) -> Self::Value;
}

/// Object-safe view of a lattice value, used inside value patterns.
pub trait AnyValue: Debug + Display {
    fn as_any(&self) -> &dyn Any;

    fn family(&self) -> AnalysisId;

    fn family_name(&self) -> &'static str;

    /// `self ⊑ other`; both must belong to the same family.
    fn dyn_le(&self, other: &dyn AnyValue) -> bool;

    fn dyn_is_top(&self) -> bool;

    fn dyn_specificity(&self) -> u64;

    /// Specificity scaled so that the bottom of every family weighs `2^32`,
    /// which makes scores of different families comparable.
    fn dyn_weight(&self) -> u64;

    fn clone_box(&self) -> Box<dyn AnyValue>;
}

impl<V: Lattice + 'static> AnyValue for V {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn family(&self) -> AnalysisId {
        AnalysisId::of::<V>()
    }

    fn family_name(&self) -> &'static str {
        V::NAME
    }

    fn dyn_le(&self, other: &dyn AnyValue) -> bool {
        match other.as_any().downcast_ref::<V>() {
            Some(other) => self.le(other),
            None => panic!(
                "Cannot compare {} value with {} value",
                V::NAME,
                other.family_name()
            ),
        }
    }

    fn dyn_is_top(&self) -> bool {
        self.is_top()
    }

    fn dyn_specificity(&self) -> u64 {
        self.specificity()
    }

    fn dyn_weight(&self) -> u64 {
        let bottom = u128::from(V::bottom().specificity().max(1));
        ((u128::from(self.specificity()) << 32) / bottom) as u64
    }

    fn clone_box(&self) -> Box<dyn AnyValue> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn AnyValue> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

trait ErasedAnalysis {
    fn value_at_erased(&self, location: Location) -> Box<dyn AnyValue>;

    fn as_any(&self) -> &dyn Any;
}

impl<A: Analysis> ErasedAnalysis for A {
    fn value_at_erased(&self, location: Location) -> Box<dyn AnyValue> {
        let value = self.value_at(location);
        value.debug_check();
        Box::new(value)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The analysis instances available to one scan, at most one per family.
///
/// Cloning is cheap: instances are shared, only the location map is copied.
#[derive(Default, Clone)]
pub struct Analyses {
    slots: Vec<Option<Rc<dyn ErasedAnalysis>>>,
    /// `origins[i]` is the location whose facts describe the current
    /// instruction `i`, or `None` for code emitted by a rewrite. Identity
    /// while no rewrite has been recorded.
    origins: Option<Vec<Option<Location>>>,
}

impl Debug for Analyses {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyses")
            .field("families", &self.slots.iter().filter(|s| s.is_some()).count())
            .field("relocated", &self.origins.is_some())
            .finish()
    }
}

impl Analyses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<A: Analysis>(mut self, analysis: A) -> Self {
        self.insert(analysis);
        self
    }

    /// Installs `analysis` as the instance of its family, replacing any
    /// previous one.
    pub fn insert<A: Analysis>(&mut self, analysis: A) {
        let id = AnalysisId::of::<A::Value>();
        if self.slots.len() <= id.index() {
            self.slots.resize_with(id.index() + 1, || None);
        }
        self.slots[id.index()] = Some(Rc::new(analysis));
    }

    /// Returns the installed instance, if it has type `A`.
    ///
    /// The instance answers in the locations it was computed for, see
    /// [`Analyses::origin`].
    pub fn get<A: Analysis>(&self) -> Option<&A> {
        self.slot(AnalysisId::of::<A::Value>())
            .and_then(|analysis| analysis.as_any().downcast_ref::<A>())
    }

    pub fn contains(&self, family: AnalysisId) -> bool {
        self.slot(family).is_some()
    }

    fn slot(&self, family: AnalysisId) -> Option<&dyn ErasedAnalysis> {
        self.slots
            .get(family.index())
            .and_then(|slot| slot.as_deref())
    }

    /// Records that the instructions in `replaced` were substituted by
    /// `inserted` new ones.
    ///
    /// Facts before the range keep their locations, facts of the replaced
    /// instructions are dropped, and facts after it move along with their
    /// instructions. The new instructions have no facts.
    pub fn relocate(&mut self, len: usize, replaced: Range<Location>, inserted: usize) {
        let (start, end) = (replaced.start.index(), replaced.end.index());
        assert!(
            start <= end && end <= len,
            "Invalid relocation of {}..{} (len = {})",
            replaced.start,
            replaced.end,
            len
        );
        let origins = self
            .origins
            .get_or_insert_with(|| (0..len).map(|i| Some(Location::new(i))).collect());
        assert_eq!(origins.len(), len, "Relocation does not match the program length");
        origins.splice(start..end, std::iter::repeat(None).take(inserted));
        trace!("relocated facts: {}..{} now spans {} instruction(s)", replaced.start, replaced.end, inserted);
    }

    /// The location whose facts describe `location`, or `None` if the
    /// instruction there was emitted after the facts were computed.
    pub fn origin(&self, location: Location) -> Option<Location> {
        match &self.origins {
            None => Some(location),
            Some(origins) => origins.get(location.index()).copied().flatten(),
        }
    }

    /// Fact of family `V` about `location`; `top` when the family has no
    /// instance or the instance knows nothing.
    pub fn value_at<V: Lattice + 'static>(&self, location: Location) -> V {
        self.slot(AnalysisId::of::<V>())
            .zip(self.origin(location))
            .and_then(|(analysis, origin)| {
                analysis
                    .value_at_erased(origin)
                    .as_any()
                    .downcast_ref::<V>()
                    .cloned()
            })
            .unwrap_or_else(V::top)
    }

    /// Checks whether the fact about `location` refines `required`.
    pub fn satisfies(&self, required: &dyn AnyValue, location: Location) -> bool {
        match self.slot(required.family()).zip(self.origin(location)) {
            Some((analysis, origin)) => analysis.value_at_erased(origin).dyn_le(required),
            // Without a fact the value is top, which only top admits.
            None => required.dyn_is_top(),
        }
    }
}

/// Table-backed analysis: explicit facts per location, `top` elsewhere.
#[derive(Debug, Clone)]
pub struct Facts<V> {
    values: HashMap<Location, V>,
}

pub type RangeFacts = Facts<RangeValue>;
pub type CallTargetFacts = Facts<CallTargetValue>;
pub type TypeShapeFacts = Facts<TypeShapeValue>;
pub type ConstantsFacts = Facts<ConstantsValue>;

impl<V: Lattice> Default for Facts<V> {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
        }
    }
}

impl<V: Lattice> Facts<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, location: Location, value: V) -> &mut Self {
        self.values.insert(location, value);
        self
    }

    /// Joins `value` into the fact at `location`.
    ///
    /// Returns `true` if the stored fact changed.
    pub fn merge(&mut self, location: Location, value: &V) -> bool {
        match self.values.get_mut(&location) {
            Some(current) => current.merge_with(value),
            None => {
                let mut current = V::bottom();
                let changed = current.merge_with(value);
                self.values.insert(location, current);
                changed
            }
        }
    }

    pub fn get(&self, location: Location) -> Option<&V> {
        self.values.get(&location)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<V: Lattice> FromIterator<(Location, V)> for Facts<V> {
    fn from_iter<I: IntoIterator<Item = (Location, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl<V: Lattice + 'static> Analysis for Facts<V> {
    type Value = V;

    fn value_at(&self, location: Location) -> V {
        self.values.get(&location).cloned().unwrap_or_else(V::top)
    }
}
