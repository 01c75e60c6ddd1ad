//! Facts for straight-line code.
//!
//! Without branches every location is reached once, so a single forward walk
//! over the program computes the facts the rewrite rules consume: constants
//! and ranges of literals and sums, the type and shape of every pushed value,
//! and the targets of builtin references. Anything the walk cannot see
//! through (locals, call results) stays `top`.

use log::debug;

use crate::analysis::{Analyses, Analysis, CallTargetFacts, ConstantsFacts, RangeFacts, TypeShapeFacts};
use crate::flow::Producers;
use crate::lattice::{CallTargetValue, ConstantsValue, Lattice, RangeValue, Type, TypeShapeValue};
use crate::program::{Instruction, Program};
use crate::types::Location;

pub fn constants(program: &Program) -> ConstantsFacts {
    let producers = Producers::build(program);
    let mut facts = ConstantsFacts::new();

    for (i, instruction) in program.instructions().iter().enumerate() {
        let location = Location::new(i);
        let value = match instruction {
            Instruction::Push { index } => ConstantsValue::constant(program.pool().at(*index)),
            Instruction::Add | Instruction::IAdd => match producers.operands(location) {
                Some(&[lhs, rhs]) => {
                    let lhs = facts.value_at(lhs);
                    let rhs = facts.value_at(rhs);
                    match (lhs.as_constant(), rhs.as_constant()) {
                        (Some(a), Some(b)) => a
                            .checked_add(b)
                            .map_or(ConstantsValue::Top, ConstantsValue::constant),
                        _ if lhs.is_bottom() || rhs.is_bottom() => ConstantsValue::Bottom,
                        _ => ConstantsValue::Top,
                    }
                }
                _ => continue,
            },
            _ => continue,
        };
        facts.set(location, value);
    }

    debug!("inferred {} constant fact(s)", facts.len());
    facts
}

pub fn ranges(program: &Program) -> RangeFacts {
    let producers = Producers::build(program);
    let mut facts = RangeFacts::new();

    for (i, instruction) in program.instructions().iter().enumerate() {
        let location = Location::new(i);
        let value = match instruction {
            Instruction::Push { index } => RangeValue::constant(program.pool().at(*index)),
            Instruction::Add | Instruction::IAdd => match producers.operands(location) {
                Some(&[lhs, rhs]) => facts.value_at(lhs).add(&facts.value_at(rhs)),
                _ => continue,
            },
            _ => continue,
        };
        facts.set(location, value);
    }

    debug!("inferred {} range fact(s)", facts.len());
    facts
}

pub fn type_shapes(program: &Program) -> TypeShapeFacts {
    let producers = Producers::build(program);
    let mut facts = TypeShapeFacts::new();

    for (i, instruction) in program.instructions().iter().enumerate() {
        let location = Location::new(i);
        let value = match instruction {
            Instruction::Push { .. } | Instruction::IAdd => TypeShapeValue::naked_int(),
            Instruction::Add => match producers.operands(location) {
                Some(&[lhs, rhs]) => {
                    let both = facts.value_at(lhs).join(&facts.value_at(rhs));
                    if both.is_bottom() {
                        TypeShapeValue::bottom()
                    } else if both.le(&TypeShapeValue::of(Type::Int)) {
                        // A generic add of ints still yields an int, but a
                        // boxed one.
                        TypeShapeValue::of(Type::Int)
                    } else {
                        TypeShapeValue::top()
                    }
                }
                _ => continue,
            },
            _ => continue,
        };
        facts.set(location, value);
    }

    debug!("inferred {} type/shape fact(s)", facts.len());
    facts
}

pub fn call_targets(program: &Program) -> CallTargetFacts {
    let mut facts = CallTargetFacts::new();
    for (i, instruction) in program.instructions().iter().enumerate() {
        if let Instruction::Builtin { symbol } = instruction {
            facts.set(
                Location::new(i),
                CallTargetValue::certain(program.symbol_name(*symbol)),
            );
        }
    }
    debug!("inferred {} call target fact(s)", facts.len());
    facts
}

/// Runs every inference and bundles the results.
pub fn all(program: &Program) -> Analyses {
    Analyses::new()
        .with(constants(program))
        .with(ranges(program))
        .with(type_shapes(program))
        .with(call_targets(program))
}
