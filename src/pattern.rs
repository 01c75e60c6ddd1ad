//! Pattern trees.
//!
//! A pattern describes a shape in the program that a rule wants to rewrite.
//! There are exactly three kinds of nodes:
//!
//! - **instruction** nodes accept a set of opcodes and recurse into the
//!   operands of the matched instruction,
//! - **value** nodes accept any location whose analysis fact refines a
//!   required lattice value,
//! - **wildcards** accept anything.
//!
//! Nodes live in a [`Patterns`] arena and refer to their operands through
//! [`PatternId`] handles. Every node has at most one parent, so the arena of a
//! rule always holds a forest of proper trees; [`Patterns::replace`] swaps a
//! child handle in place and releases the old subtree.
//!
//! ```text
//!            add                 instruction {add}
//!           /   \
//!   naked Int   naked Int        value (type-shape), value (type-shape)
//! ```
//!
//! # Matching
//!
//! Matching a node against a location is recursive and stops at the first
//! unsatisfied constraint: the opcode is checked before operands are visited,
//! and a value node costs a single lattice comparison. A successful match
//! produces a [`Match`] holding the location of every node in the tree.

use std::fmt;
use std::ops::Range;

use log::trace;

use crate::analysis::{Analyses, AnalysisId, AnyValue};
use crate::flow::Producers;
use crate::lattice::{CallTargetValue, Lattice, TypeShapeValue};
use crate::program::{Opcode, Program};
use crate::types::Location;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PatternId(u32);

impl PatternId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct InstructionPattern {
    opcodes: Vec<Opcode>,
    operands: Vec<PatternId>,
    /// Pattern for every operand past `operands`, if the count may vary.
    rest: Option<PatternId>,
}

impl InstructionPattern {
    pub fn opcodes(&self) -> &[Opcode] {
        &self.opcodes
    }

    pub fn operands(&self) -> &[PatternId] {
        &self.operands
    }

    pub fn rest(&self) -> Option<PatternId> {
        self.rest
    }

    pub fn is_variadic(&self) -> bool {
        self.rest.is_some()
    }

    fn children(&self) -> impl Iterator<Item = PatternId> + '_ {
        self.operands.iter().copied().chain(self.rest)
    }
}

#[derive(Debug, Clone)]
pub struct ValuePattern {
    required: Box<dyn AnyValue>,
}

impl ValuePattern {
    pub fn family(&self) -> AnalysisId {
        self.required.family()
    }

    pub fn required(&self) -> &dyn AnyValue {
        self.required.as_ref()
    }
}

#[derive(Debug, Clone)]
pub enum Pattern {
    Instruction(InstructionPattern),
    Value(ValuePattern),
    Wildcard,
}

/// What a pattern is matched against.
#[derive(Debug, Copy, Clone)]
pub struct Subject<'a> {
    pub program: &'a Program,
    pub producers: &'a Producers,
    pub analyses: &'a Analyses,
}

/// Locations bound by a successful match.
#[derive(Debug, Clone)]
pub struct Match {
    root: PatternId,
    at: Location,
    bound: Vec<Vec<Location>>,
}

impl Match {
    pub fn root(&self) -> PatternId {
        self.root
    }

    /// Location the root was matched at.
    pub fn at(&self) -> Location {
        self.at
    }

    /// The location bound to `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not part of the matched tree.
    pub fn location(&self, id: PatternId) -> Location {
        match self.locations(id) {
            [location, ..] => *location,
            [] => panic!("Pattern {} is not bound", id),
        }
    }

    /// All locations bound to `id`; more than one for the `rest` node of a
    /// variadic instruction pattern.
    pub fn locations(&self, id: PatternId) -> &[Location] {
        self.bound.get(id.index()).map_or(&[], |v| v.as_slice())
    }

    pub fn is_bound(&self, id: PatternId) -> bool {
        !self.locations(id).is_empty()
    }

    /// The smallest contiguous range covering every bound location.
    ///
    /// A rewrite triggered by this match may only touch this range.
    pub fn span(&self) -> Range<Location> {
        let (min, max) = self
            .bound
            .iter()
            .flatten()
            .fold((self.at, self.at), |(min, max), &l| (min.min(l), max.max(l)));
        min..max.next()
    }

    fn bind(&mut self, id: PatternId, location: Location) {
        if self.bound.len() <= id.index() {
            self.bound.resize_with(id.index() + 1, Vec::new);
        }
        self.bound[id.index()].push(location);
    }
}

/// Arena of pattern nodes.
#[derive(Debug, Clone, Default)]
pub struct Patterns {
    nodes: Vec<Pattern>,
    parent: Vec<Option<PatternId>>,
}

impl Patterns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn alloc(&mut self, pattern: Pattern) -> PatternId {
        let id = PatternId(self.nodes.len() as u32);
        self.nodes.push(pattern);
        self.parent.push(None);
        id
    }

    fn adopt(&mut self, parent: PatternId, child: PatternId) {
        assert!(
            child.index() < self.nodes.len(),
            "Pattern {} does not exist",
            child
        );
        assert!(
            self.parent[child.index()].is_none(),
            "Pattern {} already has a parent",
            child
        );
        assert_ne!(parent, child, "Pattern {} cannot be its own operand", child);
        let mut ancestor = self.parent[parent.index()];
        while let Some(id) = ancestor {
            assert_ne!(id, child, "Pattern {} is an ancestor of {}", child, parent);
            ancestor = self.parent[id.index()];
        }
        self.parent[child.index()] = Some(parent);
    }

    pub fn wildcard(&mut self) -> PatternId {
        self.alloc(Pattern::Wildcard)
    }

    pub fn value<V: Lattice + 'static>(&mut self, required: V) -> PatternId {
        self.alloc(Pattern::Value(ValuePattern {
            required: Box::new(required),
        }))
    }

    pub fn instruction(&mut self, opcodes: &[Opcode], operands: &[PatternId]) -> PatternId {
        self.build_instruction(opcodes, operands, None)
    }

    /// Instruction pattern taking `operands` and then any number of further
    /// operands, each matching `rest`.
    pub fn variadic(&mut self, opcodes: &[Opcode], operands: &[PatternId], rest: PatternId) -> PatternId {
        self.build_instruction(opcodes, operands, Some(rest))
    }

    fn build_instruction(
        &mut self,
        opcodes: &[Opcode],
        operands: &[PatternId],
        rest: Option<PatternId>,
    ) -> PatternId {
        assert!(!opcodes.is_empty(), "Instruction pattern needs at least one opcode");
        let id = self.alloc(Pattern::Instruction(InstructionPattern {
            opcodes: opcodes.to_vec(),
            operands: operands.to_vec(),
            rest,
        }));
        for &child in operands.iter().chain(rest.iter()) {
            self.adopt(id, child);
        }
        id
    }

    pub fn push(&mut self) -> PatternId {
        self.instruction(&[Opcode::Push], &[])
    }

    pub fn add(&mut self, lhs: PatternId, rhs: PatternId) -> PatternId {
        self.instruction(&[Opcode::Add], &[lhs, rhs])
    }

    /// `call` with the callee followed by exactly `arguments`.
    pub fn call(&mut self, callee: PatternId, arguments: &[PatternId]) -> PatternId {
        let operands: Vec<PatternId> = std::iter::once(callee).chain(arguments.iter().copied()).collect();
        self.instruction(&[Opcode::Call], &operands)
    }

    pub fn naked_int(&mut self) -> PatternId {
        self.value(TypeShapeValue::naked_int())
    }

    /// Value pattern for a callee that is certainly the builtin `target`.
    pub fn builtin(&mut self, target: &str) -> PatternId {
        self.value(CallTargetValue::certain(target))
    }

    pub fn get(&self, id: PatternId) -> &Pattern {
        &self.nodes[id.index()]
    }

    pub fn parent(&self, id: PatternId) -> Option<PatternId> {
        self.parent[id.index()]
    }

    fn instruction_node(&self, id: PatternId) -> &InstructionPattern {
        match self.get(id) {
            Pattern::Instruction(p) => p,
            other => panic!("Pattern {} is not an instruction pattern: {:?}", id, other),
        }
    }

    /// Number of declared operands of instruction pattern `id`.
    pub fn operands(&self, id: PatternId) -> usize {
        self.instruction_node(id).operands.len()
    }

    /// The `index`-th operand pattern of instruction pattern `id`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is beyond the declared operands (and the pattern is
    /// not variadic).
    pub fn operand(&self, id: PatternId, index: usize) -> PatternId {
        let p = self.instruction_node(id);
        match p.operands.get(index) {
            Some(&operand) => operand,
            None => p.rest.unwrap_or_else(|| {
                panic!(
                    "Pattern {} has only {} operand(s), asked for #{}",
                    id,
                    p.operands.len(),
                    index
                )
            }),
        }
    }

    /// Replaces operand `slot` of `parent` with `with`, returning the old
    /// subtree root, which is released.
    pub fn replace(&mut self, parent: PatternId, slot: usize, with: PatternId) -> PatternId {
        let old = self.operand(parent, slot);
        assert!(
            self.instruction_node(parent).operands.len() > slot,
            "Cannot replace the rest pattern of {} by slot",
            parent
        );
        self.adopt(parent, with);
        self.parent[old.index()] = None;
        if let Pattern::Instruction(p) = &mut self.nodes[parent.index()] {
            p.operands[slot] = with;
        }
        trace!("replaced operand #{} of {}: {} -> {}", slot, parent, old, with);
        old
    }

    /// All nodes of the tree rooted at `root`, in preorder.
    pub fn tree(&self, root: PatternId) -> Vec<PatternId> {
        let mut result = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            result.push(id);
            if let Pattern::Instruction(p) = self.get(id) {
                let mark = stack.len();
                stack.extend(p.children());
                stack[mark..].reverse();
            }
        }
        result
    }

    /// Number of instruction nodes in the tree.
    pub fn footprint(&self, root: PatternId) -> usize {
        self.tree(root)
            .into_iter()
            .filter(|&id| matches!(self.get(id), Pattern::Instruction(_)))
            .count()
    }

    /// Summed specificity of the value nodes in the tree, each scaled to
    /// its family's range (see [`AnyValue::dyn_weight`]).
    pub fn specificity(&self, root: PatternId) -> u64 {
        self.tree(root)
            .into_iter()
            .filter_map(|id| match self.get(id) {
                Pattern::Value(v) => Some(v.required.dyn_weight()),
                _ => None,
            })
            .fold(0u64, |acc, s| acc.saturating_add(s))
    }

    /// Matches the tree rooted at `root` against `location`.
    pub fn matches(&self, root: PatternId, location: Location, subject: Subject<'_>) -> Option<Match> {
        let mut m = Match {
            root,
            at: location,
            bound: Vec::new(),
        };
        if self.match_node(root, location, subject, &mut m) {
            Some(m)
        } else {
            None
        }
    }

    fn match_node(&self, id: PatternId, location: Location, subject: Subject<'_>, m: &mut Match) -> bool {
        let ok = match self.get(id) {
            Pattern::Wildcard => true,
            Pattern::Value(v) => subject.analyses.satisfies(v.required(), location),
            Pattern::Instruction(p) => {
                let opcode = subject.program.at(location).opcode();
                if !p.opcodes.contains(&opcode) {
                    return false;
                }
                match subject.producers.operands(location) {
                    Some(operands) => {
                        let arity_ok = match p.rest {
                            Some(_) => operands.len() >= p.operands.len(),
                            None => operands.len() == p.operands.len(),
                        };
                        arity_ok
                            && operands.iter().enumerate().all(|(i, &operand)| {
                                let child = p.operands.get(i).copied().or(p.rest);
                                child.is_some_and(|child| self.match_node(child, operand, subject, m))
                            })
                    }
                    // Operands unknown: only an operand-free pattern can match.
                    None => p.operands.is_empty() && p.rest.is_none(),
                }
            }
        };
        if ok {
            m.bind(id, location);
        } else {
            trace!("{} does not match at {}", id, location);
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::analysis::{ConstantsFacts, TypeShapeFacts};
    use crate::lattice::{ConstantsValue, RangeValue};
    use crate::program::Instruction;

    fn add_program() -> Program {
        let mut program = Program::new();
        program.push_literal(1);
        program.push_literal(2);
        program.append(Instruction::Add);
        program
    }

    fn naked_ints(locations: &[usize]) -> Analyses {
        let facts: TypeShapeFacts = locations
            .iter()
            .map(|&i| (Location::new(i), TypeShapeValue::naked_int()))
            .collect();
        Analyses::new().with(facts)
    }

    #[test]
    fn test_instruction_shape() {
        let program = add_program();
        let producers = Producers::build(&program);
        let analyses = Analyses::new();
        let subject = Subject {
            program: &program,
            producers: &producers,
            analyses: &analyses,
        };

        let mut patterns = Patterns::new();
        let lhs = patterns.push();
        let rhs = patterns.push();
        let add = patterns.add(lhs, rhs);

        let m = patterns.matches(add, Location::new(2), subject).unwrap();
        assert_eq!(m.location(add), Location::new(2));
        assert_eq!(m.location(lhs), Location::new(0));
        assert_eq!(m.location(rhs), Location::new(1));
        assert_eq!(m.span(), Location::new(0)..Location::new(3));

        assert!(patterns.matches(add, Location::new(1), subject).is_none());
        assert_eq!(patterns.footprint(add), 3);
    }

    #[test]
    fn test_value_constraint() {
        let program = add_program();
        let producers = Producers::build(&program);
        let subject_with = |analyses: &Analyses| {
            let mut patterns = Patterns::new();
            let lhs = patterns.naked_int();
            let rhs = patterns.naked_int();
            let add = patterns.add(lhs, rhs);
            let subject = Subject {
                program: &program,
                producers: &producers,
                analyses,
            };
            patterns.matches(add, Location::new(2), subject).is_some()
        };

        assert!(subject_with(&naked_ints(&[0, 1])));
        assert!(!subject_with(&naked_ints(&[0])));
        assert!(!subject_with(&Analyses::new()));
    }

    #[test]
    fn test_top_matches_everything() {
        let program = add_program();
        let producers = Producers::build(&program);
        let mut facts = ConstantsFacts::new();
        facts.set(Location::new(0), ConstantsValue::constant(1));
        let analyses = Analyses::new().with(facts);
        let subject = Subject {
            program: &program,
            producers: &producers,
            analyses: &analyses,
        };

        let mut patterns = Patterns::new();
        let exact = patterns.value(ConstantsValue::constant(1));
        let any = patterns.value(ConstantsValue::Top);
        let other = patterns.value(ConstantsValue::constant(2));

        for location in [0, 1, 2].map(Location::new) {
            assert!(patterns.matches(any, location, subject).is_some());
        }
        assert!(patterns.matches(exact, Location::new(0), subject).is_some());
        assert!(patterns.matches(exact, Location::new(1), subject).is_none());
        assert!(patterns.matches(other, Location::new(0), subject).is_none());
    }

    #[test]
    fn test_variadic_call() {
        let mut program = Program::new();
        let plus = program.symbol("+");
        program.append(Instruction::Builtin { symbol: plus });
        program.append(Instruction::Load { slot: 0 });
        program.append(Instruction::Load { slot: 1 });
        program.append(Instruction::Load { slot: 2 });
        program.append(Instruction::Call { nargs: 3 });
        let producers = Producers::build(&program);
        let analyses = Analyses::new();
        let subject = Subject {
            program: &program,
            producers: &producers,
            analyses: &analyses,
        };

        let mut patterns = Patterns::new();
        let callee = patterns.instruction(&[Opcode::Builtin], &[]);
        let rest = patterns.instruction(&[Opcode::Load], &[]);
        let call = patterns.variadic(&[Opcode::Call], &[callee], rest);

        let m = patterns.matches(call, Location::new(4), subject).unwrap();
        assert_eq!(m.locations(rest), &[1, 2, 3].map(Location::new));
        assert_eq!(patterns.operand(call, 5), rest);

        let mut fixed = Patterns::new();
        let callee = fixed.wildcard();
        let arg = fixed.wildcard();
        let call = fixed.call(callee, &[arg]);
        assert!(fixed.matches(call, Location::new(4), subject).is_none());
    }

    #[test]
    fn test_unknown_operands() {
        let mut program = Program::new();
        program.append(Instruction::Add);
        let producers = Producers::build(&program);
        let analyses = Analyses::new();
        let subject = Subject {
            program: &program,
            producers: &producers,
            analyses: &analyses,
        };

        let mut patterns = Patterns::new();
        let lhs = patterns.wildcard();
        let rhs = patterns.wildcard();
        let add = patterns.add(lhs, rhs);
        assert!(patterns.matches(add, Location::new(0), subject).is_none());
    }

    #[test]
    #[should_panic(expected = "has only 2 operand(s)")]
    fn test_operand_out_of_range() {
        let mut patterns = Patterns::new();
        let lhs = patterns.wildcard();
        let rhs = patterns.wildcard();
        let add = patterns.add(lhs, rhs);
        patterns.operand(add, 2);
    }

    #[test]
    #[should_panic(expected = "already has a parent")]
    fn test_shared_subtree_rejected() {
        let mut patterns = Patterns::new();
        let x = patterns.wildcard();
        patterns.add(x, x);
    }

    #[test]
    fn test_replace() {
        let mut patterns = Patterns::new();
        let lhs = patterns.wildcard();
        let rhs = patterns.wildcard();
        let add = patterns.add(lhs, rhs);
        let naked = patterns.naked_int();

        let old = patterns.replace(add, 1, naked);
        assert_eq!(old, rhs);
        assert_eq!(patterns.operand(add, 1), naked);
        assert_eq!(patterns.parent(naked), Some(add));
        assert_eq!(patterns.parent(rhs), None);
        assert_eq!(patterns.tree(add), vec![add, lhs, naked]);
        assert!(patterns.specificity(add) > 0);
    }

    #[test]
    #[should_panic(expected = "is an ancestor of")]
    fn test_replace_rejects_cycle() {
        let mut patterns = Patterns::new();
        let x = patterns.wildcard();
        let y = patterns.wildcard();
        let inner = patterns.add(x, y);
        let z = patterns.wildcard();
        let outer = patterns.add(inner, z);
        patterns.replace(inner, 0, outer);
    }

    #[test]
    fn test_specificity_is_comparable_across_families() {
        let mut patterns = Patterns::new();
        let wide = {
            let lhs = patterns.value(RangeValue::range(i32::MIN + 1, i32::MAX));
            let rhs = patterns.value(RangeValue::range(i32::MIN + 1, i32::MAX));
            patterns.add(lhs, rhs)
        };
        let naked = {
            let lhs = patterns.naked_int();
            let rhs = patterns.naked_int();
            patterns.add(lhs, rhs)
        };
        let constant = {
            let lhs = patterns.value(ConstantsValue::constant(1));
            let rhs = patterns.wildcard();
            patterns.add(lhs, rhs)
        };
        assert!(patterns.specificity(wide) < patterns.specificity(naked));
        assert!(patterns.specificity(constant) < patterns.specificity(naked));
        assert!(patterns.specificity(wide) > 0);
    }
}
