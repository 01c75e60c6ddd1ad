//! The matcher: rule index, priority resolution and the rewrite loop.
//!
//! # Index
//!
//! Registering a rule walks its pattern tree once and records
//!
//! 1. for every opcode of every instruction node, that the rule is reachable
//!    through that opcode (the **instruction index**), and
//! 2. for every value node, the pair (required value, rule) under the node's
//!    analysis family (the **value index**), kept sorted from the most to the
//!    least specific value.
//!
//! Both indices are only written by [`Matcher::add_rule`], which needs `&mut
//! self`, so they are read-only while a scan borrows the matcher.
//!
//! # Scan
//!
//! ```text
//! cursor = 0
//! while cursor < len:
//!     candidates = rules rooted at opcode(cursor)     (instruction index)
//!                + rules whose root value admits cursor (value index)
//!                + rules rooted at a wildcard
//!     for rule in candidates, best priority first:
//!         if rule matches at cursor and its guard holds:
//!             fire it; stop looking
//!     cursor = first instruction of the rewrite, or cursor + 1
//! ```
//!
//! Resuming at the start of the replacement lets freshly emitted code be
//! rewritten again (e.g. folding after a simplification). The loop relies on
//! rules shrinking or otherwise retiring what they rewrite; a rule that keeps
//! rewriting the same span without progress makes the scan diverge unless
//! [`MatcherConfig::max_rewrites`] is set.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Range;

use log::{debug, info, trace, warn};

use crate::analysis::{Analyses, AnalysisId, AnyValue};
use crate::flow::Producers;
use crate::pattern::{Pattern, PatternId, Subject};
use crate::program::{Opcode, Program};
use crate::rule::{Outcome, Priority, Rule, Site};
use crate::types::Location;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RuleId(usize);

impl RuleId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MatcherConfig {
    /// Stop the scan after this many rewrites.
    pub max_rewrites: Option<usize>,
}

/// One value-index entry.
#[derive(Debug, Clone)]
pub struct ValueEntry {
    pub value: Box<dyn AnyValue>,
    pub rule: RuleId,
    pub node: PatternId,
    /// The node is the root of its rule.
    pub at_root: bool,
}

/// A rule firing observed during a scan.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Firing {
    pub rule: RuleId,
    pub location: Location,
    pub outcome: Outcome,
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct ScanStats {
    /// Instructions the cursor stopped at (revisits included).
    pub visited: usize,
    /// Full pattern matches attempted.
    pub candidates: usize,
    pub matches: usize,
    pub rewrites: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub stats: ScanStats,
    pub firings: Vec<Firing>,
    /// The scan stopped at [`MatcherConfig::max_rewrites`].
    pub truncated: bool,
}

impl ScanReport {
    pub fn rewrites(&self) -> usize {
        self.stats.rewrites
    }
}

#[derive(Default)]
pub struct Matcher {
    rules: Vec<Rule>,
    priorities: Vec<Priority>,
    /// Opcode → rules with an instruction node accepting it, best first.
    instruction_index: HashMap<Opcode, Vec<RuleId>>,
    /// Family → value constraints, most specific first.
    value_index: BTreeMap<AnalysisId, Vec<ValueEntry>>,
    /// Rules whose root is a wildcard, best first.
    anywhere: Vec<RuleId>,
    config: MatcherConfig,
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher")
            .field("rules", &self.rules.len())
            .field("opcodes", &self.instruction_index.len())
            .field("families", &self.value_index.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Matcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn with_rules<I>(rules: I) -> Self
    where
        I: IntoIterator<Item = Rule>,
    {
        let mut matcher = Self::default();
        for rule in rules {
            matcher.add_rule(rule);
        }
        matcher
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.index()]
    }

    pub fn priority(&self, id: RuleId) -> Priority {
        self.priorities[id.index()]
    }

    /// Finds a rule by name.
    pub fn find(&self, name: &str) -> Option<RuleId> {
        self.rules.iter().position(|r| r.name() == name).map(RuleId)
    }

    /// Registers `rule` and indexes its pattern tree.
    pub fn add_rule(&mut self, rule: Rule) -> RuleId {
        let id = RuleId(self.rules.len());
        let priority = rule.priority(id.index());
        debug!(
            "registering {} '{}' (footprint = {}, specificity = {})",
            id,
            rule.name(),
            priority.footprint(),
            priority.specificity()
        );

        let patterns = rule.patterns();
        let root = rule.root();
        for node in patterns.tree(root) {
            match patterns.get(node) {
                Pattern::Instruction(p) => {
                    for &opcode in p.opcodes() {
                        trace!("attaching {} of {} to instruction {}", node, id, opcode);
                        let rules = self.instruction_index.entry(opcode).or_default();
                        if !rules.contains(&id) {
                            // Kept sorted by priority.
                            let at = rules.partition_point(|r| self.priorities[r.index()] <= priority);
                            rules.insert(at, id);
                        }
                    }
                }
                Pattern::Value(v) => {
                    trace!(
                        "attaching {} of {} to analysis {} and value {}",
                        node,
                        id,
                        v.required().family_name(),
                        v.required()
                    );
                    let entries = self.value_index.entry(v.family()).or_default();
                    let specificity = v.required().dyn_specificity();
                    let at = entries.partition_point(|e| e.value.dyn_specificity() >= specificity);
                    entries.insert(
                        at,
                        ValueEntry {
                            value: v.required().clone_box(),
                            rule: id,
                            node,
                            at_root: node == root,
                        },
                    );
                }
                Pattern::Wildcard => {
                    if node == root {
                        self.anywhere.push(id);
                    }
                }
            }
        }

        self.rules.push(rule);
        self.priorities.push(priority);
        id
    }

    /// Rules reachable through an instruction node accepting `opcode`.
    pub fn rules_for_opcode(&self, opcode: Opcode) -> &[RuleId] {
        self.instruction_index
            .get(&opcode)
            .map_or(&[], |rules| rules.as_slice())
    }

    /// Value constraints registered for `family`, most specific first.
    pub fn value_entries(&self, family: AnalysisId) -> &[ValueEntry] {
        self.value_index
            .get(&family)
            .map_or(&[], |entries| entries.as_slice())
    }

    /// Candidate rules at `location`, best first.
    fn candidates(&self, program: &Program, analyses: &Analyses, location: Location) -> Vec<RuleId> {
        let opcode = program.at(location).opcode();

        let mut candidates: Vec<RuleId> = self
            .rules_for_opcode(opcode)
            .iter()
            .copied()
            .filter(|&id| {
                self.rule(id)
                    .root_opcodes()
                    .is_some_and(|opcodes| opcodes.contains(&opcode))
            })
            .collect();

        for entries in self.value_index.values() {
            for entry in entries.iter().filter(|e| e.at_root) {
                if analyses.satisfies(entry.value.as_ref(), location) {
                    candidates.push(entry.rule);
                }
            }
        }

        candidates.extend_from_slice(&self.anywhere);
        candidates.sort_by_key(|&id| self.priority(id));
        candidates.dedup();
        candidates
    }

    /// Tries the candidates at `cursor` and fires the best satisfied one.
    fn step(
        &self,
        program: &mut Program,
        producers: &Producers,
        analyses: &Analyses,
        cursor: Location,
        report: &mut ScanReport,
    ) -> Option<Range<Location>> {
        for id in self.candidates(program, analyses, cursor) {
            let rule = self.rule(id);
            report.stats.candidates += 1;

            let subject = Subject {
                program: &*program,
                producers,
                analyses,
            };
            let Some(m) = rule.patterns().matches(rule.root(), cursor, subject) else {
                continue;
            };

            let mut site = Site::new(&mut *program, analyses, &m);
            if !rule.accepts(&site) {
                trace!("'{}' matched at {} but its guard failed", rule.name(), cursor);
                continue;
            }

            report.stats.matches += 1;
            debug!("'{}' fires at {}", rule.name(), cursor);
            let outcome = rule.apply(&mut site);
            report.firings.push(Firing {
                rule: id,
                location: cursor,
                outcome: outcome.clone(),
            });
            return match outcome {
                Outcome::Rewritten(range) => Some(range),
                Outcome::Kept => None,
            };
        }
        None
    }

    /// Scans `program` once against fixed analysis facts.
    ///
    /// Facts are not recomputed after a rewrite, but they follow the
    /// instructions they were computed for: a rewrite drops the facts of the
    /// instructions it replaced and the instructions it emits have none
    /// (`top`). Use [`Matcher::scan_with`] to recompute them instead.
    pub fn scan(&self, program: &mut Program, analyses: &Analyses) -> ScanReport {
        self.run(program, analyses, &mut |_: &Program| None)
    }

    /// Scans `program`, recomputing facts with `analyze` before the scan and
    /// after every rewrite.
    pub fn scan_with<F>(&self, program: &mut Program, mut analyze: F) -> ScanReport
    where
        F: FnMut(&Program) -> Analyses,
    {
        let initial = analyze(program);
        self.run(program, &initial, &mut |p: &Program| Some(analyze(p)))
    }

    fn run(
        &self,
        program: &mut Program,
        initial: &Analyses,
        refresh: &mut dyn FnMut(&Program) -> Option<Analyses>,
    ) -> ScanReport {
        let mut report = ScanReport::default();
        let mut producers = Producers::build(program);
        let mut analyses = initial.clone();
        let mut cursor = Location::new(0);

        while cursor.index() < program.len() {
            report.stats.visited += 1;
            let len = program.len();

            match self.step(program, &producers, &analyses, cursor, &mut report) {
                Some(replaced) => {
                    report.stats.rewrites += 1;
                    if self
                        .config
                        .max_rewrites
                        .is_some_and(|max| report.stats.rewrites >= max)
                    {
                        warn!("stopping scan after {} rewrites", report.stats.rewrites);
                        report.truncated = true;
                        break;
                    }
                    producers = Producers::build(program);
                    match refresh(program) {
                        Some(fresh) => analyses = fresh,
                        None => {
                            let inserted = replaced.end.index() - replaced.start.index();
                            let old_end = Location::new(replaced.end.index() + len - program.len());
                            analyses.relocate(len, replaced.start..old_end, inserted);
                        }
                    }
                    cursor = replaced.start;
                }
                None => cursor = cursor.next(),
            }
        }

        info!(
            "scan done: visited {}, tried {}, matched {}, rewrote {}",
            report.stats.visited, report.stats.candidates, report.stats.matches, report.stats.rewrites
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::analysis::TypeShapeFacts;
    use crate::lattice::{ConstantsValue, RangeValue, TypeShapeValue};
    use crate::pattern::Patterns;
    use crate::program::Instruction;

    fn generic_add(name: &str) -> Rule {
        let mut patterns = Patterns::new();
        let lhs = patterns.wildcard();
        let rhs = patterns.wildcard();
        let add = patterns.add(lhs, rhs);
        Rule::new(name, patterns, add, |_| {})
    }

    fn naked_add(name: &str) -> Rule {
        let mut patterns = Patterns::new();
        let lhs = patterns.naked_int();
        let rhs = patterns.naked_int();
        let add = patterns.add(lhs, rhs);
        Rule::new(name, patterns, add, |_| {})
    }

    fn add_program() -> Program {
        let mut program = Program::new();
        program.push_literal(1);
        program.push_literal(2);
        program.append(Instruction::Add);
        program
    }

    #[test]
    fn test_instruction_index() {
        let mut matcher = Matcher::default();
        let generic = matcher.add_rule(generic_add("generic"));
        let naked = matcher.add_rule(naked_add("naked"));

        let mut patterns = Patterns::new();
        let lhs = patterns.push();
        let rhs = patterns.push();
        let add = patterns.add(lhs, rhs);
        let pushes = matcher.add_rule(Rule::new("pushes", patterns, add, |_| {}));

        assert_eq!(matcher.rules_for_opcode(Opcode::Add), &[naked, generic, pushes]);
        assert_eq!(matcher.rules_for_opcode(Opcode::Push), &[pushes]);
        assert!(matcher.rules_for_opcode(Opcode::Call).is_empty());
        assert_eq!(matcher.find("pushes"), Some(pushes));
    }

    #[test]
    fn test_value_index_sorted() {
        let mut matcher = Matcher::default();
        for (name, value) in [
            ("wide", RangeValue::range(0, 100)),
            ("point", RangeValue::constant(5)),
            ("narrow", RangeValue::range(0, 10)),
        ] {
            let mut patterns = Patterns::new();
            let root = patterns.value(value);
            matcher.add_rule(Rule::new(name, patterns, root, |_| {}));
        }

        let entries = matcher.value_entries(AnalysisId::of::<RangeValue>());
        let names: Vec<&str> = entries.iter().map(|e| matcher.rule(e.rule).name()).collect();
        assert_eq!(names, ["point", "narrow", "wide"]);
        assert!(entries.iter().all(|e| e.at_root));
        assert!(matcher.value_entries(AnalysisId::of::<ConstantsValue>()).is_empty());
    }

    #[test]
    fn test_specific_rule_wins() {
        let mut matcher = Matcher::default();
        let generic = matcher.add_rule(generic_add("generic"));
        let naked = matcher.add_rule(naked_add("naked"));

        let facts: TypeShapeFacts = [0, 1]
            .map(|i| (Location::new(i), TypeShapeValue::naked_int()))
            .into_iter()
            .collect();
        let analyses = Analyses::new().with(facts);

        let mut program = add_program();
        let report = matcher.scan(&mut program, &analyses);
        assert_eq!(report.firings.len(), 1);
        assert_eq!(report.firings[0].rule, naked);
        assert_eq!(report.firings[0].location, Location::new(2));

        let report = matcher.scan(&mut program, &Analyses::new());
        assert_eq!(report.firings[0].rule, generic);
    }

    #[test]
    fn test_value_rooted_rule() {
        // Replace any instruction known to produce a constant by a push.
        let mut patterns = Patterns::new();
        let root = patterns.value(RangeValue::range(0, 10));
        let rule = Rule::new("materialize", patterns, root, move |site: &mut Site<'_>| {
            let range: RangeValue = site.value(root);
            if site.opcode(root) != Opcode::Add {
                return;
            }
            if let Some(value) = range.as_constant() {
                let push = site.literal(value);
                site.replace_node(root, [push]);
            }
        });
        let matcher = Matcher::with_rules([rule]);

        let mut program = Program::new();
        program.append(Instruction::Load { slot: 0 });
        program.append(Instruction::Load { slot: 1 });
        program.append(Instruction::Add);
        let mut facts = crate::analysis::RangeFacts::new();
        facts.set(Location::new(2), RangeValue::constant(7));
        let analyses = Analyses::new().with(facts);

        let report = matcher.scan(&mut program, &analyses);
        assert_eq!(report.rewrites(), 1);
        assert_eq!(program.at(Location::new(2)).opcode(), Opcode::Push);
        assert_eq!(program.pool().at(0), 7);
    }

    #[test]
    fn test_max_rewrites_fuse() {
        // Rewrites `add` into itself forever.
        let mut patterns = Patterns::new();
        let lhs = patterns.wildcard();
        let rhs = patterns.wildcard();
        let add = patterns.add(lhs, rhs);
        let rule = Rule::new("spin", patterns, add, move |site: &mut Site<'_>| {
            site.replace_node(add, [Instruction::Add]);
        });

        let mut matcher = Matcher::new(MatcherConfig {
            max_rewrites: Some(10),
        });
        matcher.add_rule(rule);

        let mut program = add_program();
        let report = matcher.scan(&mut program, &Analyses::new());
        assert!(report.truncated);
        assert_eq!(report.rewrites(), 10);
    }

    #[test]
    fn test_kept_advances() {
        let matcher = Matcher::with_rules([generic_add("observer")]);
        let mut program = add_program();
        let report = matcher.scan(&mut program, &Analyses::new());
        assert_eq!(report.stats.visited, 3);
        assert_eq!(report.stats.matches, 1);
        assert_eq!(report.rewrites(), 0);
        assert_eq!(report.firings[0].outcome, Outcome::Kept);
    }
}
