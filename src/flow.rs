//! Operand producers for straight-line stack code.
//!
//! Patterns recurse from an instruction into its operands; on a stack machine
//! an operand has no name, only the instruction that pushed it. [`Producers`]
//! recovers that relation by replaying the stack effects of the program from
//! the start and remembering which location pushed each slot.

use log::trace;

use crate::program::Program;
use crate::types::Location;

#[derive(Debug, Clone, Default)]
pub struct Producers {
    /// `operands[i]` lists the producers of the values consumed by
    /// instruction `i`, in push order, or `None` if the stack underflowed.
    operands: Vec<Option<Vec<Location>>>,
}

impl Producers {
    pub fn build(program: &Program) -> Self {
        let mut stack: Vec<Location> = Vec::new();
        let mut operands = Vec::with_capacity(program.len());
        let mut broken = false;

        for (i, instruction) in program.instructions().iter().enumerate() {
            let location = Location::new(i);
            let pops = instruction.pops();

            if broken || stack.len() < pops {
                if !broken {
                    trace!("stack underflow at {} ({} < {})", location, stack.len(), pops);
                }
                broken = true;
                operands.push(None);
                continue;
            }

            let consumed = stack.split_off(stack.len() - pops);
            operands.push(Some(consumed));
            for _ in 0..instruction.pushes() {
                stack.push(location);
            }
        }

        Self { operands }
    }

    /// Producers of the operands of the instruction at `location`.
    pub fn operands(&self, location: Location) -> Option<&[Location]> {
        self.operands
            .get(location.index())
            .and_then(|ops| ops.as_deref())
    }

    pub fn len(&self) -> usize {
        self.operands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operands.is_empty()
    }
}
