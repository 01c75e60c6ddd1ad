//! Rules: a pattern tree plus the rewrite to perform when it matches.
//!
//! The action of a rule receives a [`Site`], the matched program fragment. It
//! can inspect the bound nodes (`pc`, `opcode`, `size`, analysis facts) and
//! replace instructions, but only inside [`Match::span`], the range covered by
//! the locations the match bound. At most one replacement is allowed per
//! firing: after it, every bound location past the rewrite is stale.

use std::cmp::Reverse;
use std::fmt;
use std::ops::Range;

use log::debug;

use crate::analysis::Analyses;
use crate::lattice::Lattice;
use crate::pattern::{Match, Pattern, PatternId, Patterns};
use crate::program::{Instruction, Opcode, Program, Symbol};
use crate::types::{Location, Pc};

type Guard = Box<dyn Fn(&Site<'_>) -> bool>;
type Action = Box<dyn Fn(&mut Site<'_>)>;

/// What happened when a rule fired.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Outcome {
    /// The program was not modified.
    Kept,
    /// The program was modified; the range holds the replacement.
    Rewritten(Range<Location>),
}

/// Rank of a rule among the candidates at one location. Smaller is better.
///
/// Compared field by field: fewer instruction nodes first, then the more
/// specific value constraints, then guarded rules, then registration order.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Priority {
    footprint: usize,
    specificity: Reverse<u64>,
    unguarded: bool,
    order: usize,
}

impl Priority {
    pub fn footprint(&self) -> usize {
        self.footprint
    }

    pub fn specificity(&self) -> u64 {
        self.specificity.0
    }

    pub fn order(&self) -> usize {
        self.order
    }
}

pub struct Rule {
    name: String,
    patterns: Patterns,
    root: PatternId,
    guard: Option<Guard>,
    action: Action,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("nodes", &self.patterns.len())
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}

impl Rule {
    pub fn new<F>(name: impl Into<String>, patterns: Patterns, root: PatternId, action: F) -> Self
    where
        F: Fn(&mut Site<'_>) + 'static,
    {
        assert!(
            root.index() < patterns.len(),
            "Root {} is not in the pattern arena",
            root
        );
        assert!(
            patterns.parent(root).is_none(),
            "Root {} is an operand of another pattern",
            root
        );
        Self {
            name: name.into(),
            patterns,
            root,
            guard: None,
            action: Box::new(action),
        }
    }

    /// Adds a predicate that must hold, in addition to the pattern, for the
    /// rule to count as matched.
    pub fn with_guard<G>(mut self, guard: G) -> Self
    where
        G: Fn(&Site<'_>) -> bool + 'static,
    {
        self.guard = Some(Box::new(guard));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn patterns(&self) -> &Patterns {
        &self.patterns
    }

    pub fn root(&self) -> PatternId {
        self.root
    }

    pub fn is_guarded(&self) -> bool {
        self.guard.is_some()
    }

    /// Opcodes the root node accepts, or `None` for a value or wildcard root.
    pub fn root_opcodes(&self) -> Option<&[Opcode]> {
        match self.patterns.get(self.root) {
            Pattern::Instruction(p) => Some(p.opcodes()),
            _ => None,
        }
    }

    pub fn priority(&self, order: usize) -> Priority {
        Priority {
            footprint: self.patterns.footprint(self.root),
            specificity: Reverse(self.patterns.specificity(self.root)),
            unguarded: self.guard.is_none(),
            order,
        }
    }

    pub(crate) fn accepts(&self, site: &Site<'_>) -> bool {
        self.guard.as_ref().map_or(true, |guard| guard(site))
    }

    pub(crate) fn apply(&self, site: &mut Site<'_>) -> Outcome {
        (self.action)(site);
        match site.rewritten.clone() {
            Some(range) => Outcome::Rewritten(range),
            None => Outcome::Kept,
        }
    }
}

/// A matched program fragment, handed to guards and actions.
pub struct Site<'a> {
    program: &'a mut Program,
    analyses: &'a Analyses,
    matched: &'a Match,
    rewritten: Option<Range<Location>>,
}

impl<'a> Site<'a> {
    pub fn new(program: &'a mut Program, analyses: &'a Analyses, matched: &'a Match) -> Self {
        Self {
            program,
            analyses,
            matched,
            rewritten: None,
        }
    }

    pub fn program(&self) -> &Program {
        self.program
    }

    pub fn analyses(&self) -> &Analyses {
        self.analyses
    }

    pub fn matched(&self) -> &Match {
        self.matched
    }

    pub fn location(&self, id: PatternId) -> Location {
        self.matched.location(id)
    }

    pub fn instruction(&self, id: PatternId) -> Instruction {
        self.program.at(self.location(id))
    }

    pub fn pc(&self, id: PatternId) -> Pc {
        self.program.pc(self.location(id))
    }

    pub fn opcode(&self, id: PatternId) -> Opcode {
        self.instruction(id).opcode()
    }

    pub fn size(&self, id: PatternId) -> usize {
        self.instruction(id).size()
    }

    /// The literal pushed by the instruction bound to `id`, if it is a `Push`.
    pub fn immediate(&self, id: PatternId) -> Option<i32> {
        match self.instruction(id) {
            Instruction::Push { index } => Some(self.program.pool().at(index)),
            _ => None,
        }
    }

    /// The fact of family `V` about the location bound to `id`.
    pub fn value<V: Lattice + 'static>(&self, id: PatternId) -> V {
        self.analyses.value_at(self.location(id))
    }

    pub fn span(&self) -> Range<Location> {
        self.matched.span()
    }

    /// Adds `value` to the literal pool and returns a `Push` of it.
    pub fn literal(&mut self, value: i32) -> Instruction {
        let index = self.program.pool_mut().append(value);
        Instruction::Push { index }
    }

    pub fn symbol(&mut self, name: &str) -> Symbol {
        self.program.symbol(name)
    }

    /// Replaces `range`, which must lie inside [`Site::span`].
    ///
    /// # Panics
    ///
    /// Panics if `range` leaves the span, or if the site was already
    /// rewritten.
    pub fn replace<I>(&mut self, range: Range<Location>, instructions: I) -> Range<Location>
    where
        I: IntoIterator<Item = Instruction>,
    {
        let span = self.span();
        assert!(
            span.start <= range.start && range.end <= span.end,
            "Rewrite {}..{} leaves the matched span {}..{}",
            range.start,
            range.end,
            span.start,
            span.end
        );
        assert!(self.rewritten.is_none(), "Site was already rewritten");

        let replaced = self.program.replace_range(range.clone(), instructions);
        debug!(
            "rewrote {}..{} into {}..{}",
            range.start, range.end, replaced.start, replaced.end
        );
        self.rewritten = Some(replaced.clone());
        replaced
    }

    /// Replaces just the instruction bound to `id`.
    pub fn replace_node<I>(&mut self, id: PatternId, instructions: I) -> Range<Location>
    where
        I: IntoIterator<Item = Instruction>,
    {
        let location = self.location(id);
        self.replace(location..location.next(), instructions)
    }

    /// Replaces the whole matched span.
    pub fn replace_span<I>(&mut self, instructions: I) -> Range<Location>
    where
        I: IntoIterator<Item = Instruction>,
    {
        let span = self.span();
        self.replace(span, instructions)
    }

    pub fn rewritten(&self) -> Option<Range<Location>> {
        self.rewritten.clone()
    }
}
