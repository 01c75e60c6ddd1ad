//! Stock rewrite rules.
//!
//! | rule                 | pattern                                   | rewrite                  |
//! |----------------------|-------------------------------------------|--------------------------|
//! | `fold-constant-add`  | `{add,iadd}(naked Int, naked Int)` + guard | `push (a + b)`           |
//! | `specialize-add`     | `add(naked Int, naked Int)`               | `iadd`                   |
//! | `builtin-add`        | `call(certain "+", naked Int, naked Int)` | `iadd`, callee dropped   |
//! | `lower-builtin-add`  | `call(certain "+", _, _)`                 | `add`, callee dropped    |
//! | `discard-pure-pop`   | `pop({push,load,builtin})`                | nothing                  |
//! | `devirtualize:<f>`   | `call(certain f, ..)`                     | `call.known f`           |

use crate::lattice::ConstantsValue;
use crate::pattern::{PatternId, Patterns};
use crate::program::{Instruction, Opcode};
use crate::rule::{Rule, Site};
use crate::types::Location;

/// Every rule above except the per-target devirtualization.
pub fn standard() -> Vec<Rule> {
    vec![
        fold_constant_add(),
        specialize_add(),
        builtin_add(),
        lower_builtin_add(),
        discard_pure_pop(),
    ]
}

/// The constant pushed by `id`, if removing its instruction leaves the stack
/// below it untouched.
fn pure_constant(site: &Site<'_>, id: PatternId) -> Option<i32> {
    if site.instruction(id).pops() != 0 {
        return None;
    }
    site.immediate(id)
        .or_else(|| site.value::<ConstantsValue>(id).as_constant())
}

fn constant_sum(site: &Site<'_>, lhs: PatternId, rhs: PatternId) -> Option<i32> {
    pure_constant(site, lhs)?.checked_add(pure_constant(site, rhs)?)
}

/// Instructions strictly between `from` and `to`.
fn between(site: &Site<'_>, from: Location, to: Location) -> Vec<Instruction> {
    site.program().instructions()[from.next().index()..to.index()].to_vec()
}

pub fn fold_constant_add() -> Rule {
    let mut patterns = Patterns::new();
    let lhs = patterns.naked_int();
    let rhs = patterns.naked_int();
    let add = patterns.instruction(&[Opcode::Add, Opcode::IAdd], &[lhs, rhs]);

    Rule::new("fold-constant-add", patterns, add, move |site| {
        let Some(sum) = constant_sum(site, lhs, rhs) else {
            return;
        };
        let (a, b, root) = (site.location(lhs), site.location(rhs), site.location(add));

        // Whatever runs between the operands is stack-neutral above them.
        let mut replacement = between(site, a, b);
        replacement.extend(between(site, b, root));
        replacement.push(site.literal(sum));
        site.replace(a..root.next(), replacement);
    })
    .with_guard(move |site| constant_sum(site, lhs, rhs).is_some())
}

pub fn specialize_add() -> Rule {
    let mut patterns = Patterns::new();
    let lhs = patterns.naked_int();
    let rhs = patterns.naked_int();
    let add = patterns.add(lhs, rhs);

    Rule::new("specialize-add", patterns, add, move |site| {
        site.replace_node(add, [Instruction::IAdd]);
    })
}

/// `call(callee, lhs, rhs)` with a pure callee becomes `lhs rhs <add>`.
fn inline_add(name: &str, patterns: Patterns, callee: PatternId, call: PatternId, add: Instruction) -> Rule {
    Rule::new(name, patterns, call, move |site| {
        let (f, root) = (site.location(callee), site.location(call));
        let mut replacement = between(site, f, root);
        replacement.push(add);
        site.replace(f..root.next(), replacement);
    })
    .with_guard(move |site| site.instruction(callee).pops() == 0)
}

pub fn builtin_add() -> Rule {
    let mut patterns = Patterns::new();
    let callee = patterns.builtin("+");
    let lhs = patterns.naked_int();
    let rhs = patterns.naked_int();
    let call = patterns.call(callee, &[lhs, rhs]);
    inline_add("builtin-add", patterns, callee, call, Instruction::IAdd)
}

pub fn lower_builtin_add() -> Rule {
    let mut patterns = Patterns::new();
    let callee = patterns.builtin("+");
    let lhs = patterns.wildcard();
    let rhs = patterns.wildcard();
    let call = patterns.call(callee, &[lhs, rhs]);
    inline_add("lower-builtin-add", patterns, callee, call, Instruction::Add)
}

pub fn discard_pure_pop() -> Rule {
    let mut patterns = Patterns::new();
    let value = patterns.instruction(&[Opcode::Push, Opcode::Load, Opcode::Builtin], &[]);
    let pop = patterns.instruction(&[Opcode::Pop], &[value]);

    Rule::new("discard-pure-pop", patterns, pop, move |site| {
        let (v, root) = (site.location(value), site.location(pop));
        let kept = between(site, v, root);
        site.replace(v..root.next(), kept);
    })
}

/// Calls whose callee is certainly the builtin `target` become `call.known`.
pub fn devirtualize(target: &str) -> Rule {
    let target = target.to_owned();
    let mut patterns = Patterns::new();
    let callee = patterns.builtin(&target);
    let args = patterns.wildcard();
    let call = patterns.variadic(&[Opcode::Call], &[callee], args);

    Rule::new(format!("devirtualize:{}", target), patterns, call, move |site| {
        let Instruction::Call { nargs } = site.instruction(call) else {
            return;
        };
        let symbol = site.symbol(&target);
        site.replace_node(call, [Instruction::CallKnown { symbol, nargs }]);
    })
}
