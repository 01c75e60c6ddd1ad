//! The bytecode container.
//!
//! A [`Program`] is an ordered sequence of [`Instruction`]s plus a literal
//! [`Pool`] and a table of builtin symbol names. It offers exactly what the
//! rewrite engine needs from it: appending, random access by [`Location`] or
//! by [`Pc`], and in-place replacement of a contiguous instruction range.
//!
//! The instruction set is deliberately tiny: a stack machine with literal
//! pushes, local loads, builtin function references, calls and additions.

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

use log::trace;

use crate::types::{Location, Pc};

/// Interned builtin function name.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Symbol(u32);

impl Symbol {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Opcode {
    Push,
    Load,
    Builtin,
    Call,
    CallKnown,
    Add,
    IAdd,
    Pop,
    Ret,
}

impl Opcode {
    pub const ALL: [Opcode; 9] = [
        Opcode::Push,
        Opcode::Load,
        Opcode::Builtin,
        Opcode::Call,
        Opcode::CallKnown,
        Opcode::Add,
        Opcode::IAdd,
        Opcode::Pop,
        Opcode::Ret,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Opcode::Push => "push",
            Opcode::Load => "load",
            Opcode::Builtin => "builtin",
            Opcode::Call => "call",
            Opcode::CallKnown => "call.known",
            Opcode::Add => "add",
            Opcode::IAdd => "iadd",
            Opcode::Pop => "pop",
            Opcode::Ret => "ret",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single decoded instruction.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Instruction {
    /// Push the literal `pool[index]`.
    Push { index: u32 },
    /// Push the value of local `slot`.
    Load { slot: u32 },
    /// Push a reference to a builtin function.
    Builtin { symbol: Symbol },
    /// Pop `nargs` arguments and the callee below them, push the result.
    Call { nargs: u8 },
    /// Like `Call`, but the callee is statically known to be `symbol`.
    CallKnown { symbol: Symbol, nargs: u8 },
    /// Generic (boxed) addition.
    Add,
    /// Addition of two naked integers.
    IAdd,
    Pop,
    Ret,
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Push { .. } => Opcode::Push,
            Instruction::Load { .. } => Opcode::Load,
            Instruction::Builtin { .. } => Opcode::Builtin,
            Instruction::Call { .. } => Opcode::Call,
            Instruction::CallKnown { .. } => Opcode::CallKnown,
            Instruction::Add => Opcode::Add,
            Instruction::IAdd => Opcode::IAdd,
            Instruction::Pop => Opcode::Pop,
            Instruction::Ret => Opcode::Ret,
        }
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        match self {
            Instruction::Push { .. } | Instruction::Load { .. } | Instruction::Builtin { .. } => 5,
            Instruction::Call { .. } => 2,
            Instruction::CallKnown { .. } => 6,
            Instruction::Add | Instruction::IAdd | Instruction::Pop | Instruction::Ret => 1,
        }
    }

    /// Number of stack values consumed.
    pub fn pops(&self) -> usize {
        match self {
            Instruction::Push { .. } | Instruction::Load { .. } | Instruction::Builtin { .. } => 0,
            Instruction::Call { nargs } | Instruction::CallKnown { nargs, .. } => *nargs as usize + 1,
            Instruction::Add | Instruction::IAdd => 2,
            Instruction::Pop | Instruction::Ret => 1,
        }
    }

    /// Number of stack values produced.
    pub fn pushes(&self) -> usize {
        match self {
            Instruction::Pop | Instruction::Ret => 0,
            _ => 1,
        }
    }
}

/// Append-only storage of literal values.
#[derive(Debug, Default, Clone)]
pub struct Pool {
    values: Vec<i32>,
}

impl Pool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value` and returns its index.
    pub fn append(&mut self, value: i32) -> u32 {
        let index = self.values.len() as u32;
        self.values.push(value);
        index
    }

    pub fn at(&self, index: u32) -> i32 {
        assert!(
            (index as usize) < self.values.len(),
            "Pool index {} is out of bounds (len = {})",
            index,
            self.values.len()
        );
        self.values[index as usize]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Default, Clone)]
pub struct Program {
    code: Vec<Instruction>,
    /// Program counter of every instruction, kept in sync with `code`.
    offsets: Vec<usize>,
    pool: Pool,
    symbols: Vec<String>,
    symbol_index: HashMap<String, Symbol>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut Pool {
        &mut self.pool
    }

    /// Interns a builtin name.
    pub fn symbol(&mut self, name: &str) -> Symbol {
        if let Some(&symbol) = self.symbol_index.get(name) {
            return symbol;
        }
        let symbol = Symbol(self.symbols.len() as u32);
        self.symbols.push(name.to_string());
        self.symbol_index.insert(name.to_string(), symbol);
        symbol
    }

    pub fn symbol_name(&self, symbol: Symbol) -> &str {
        &self.symbols[symbol.index()]
    }

    pub fn append(&mut self, instruction: Instruction) -> Location {
        let location = Location::new(self.code.len());
        self.offsets.push(self.end_pc().offset());
        self.code.push(instruction);
        location
    }

    /// Appends `Push` of a fresh literal.
    pub fn push_literal(&mut self, value: i32) -> Location {
        let index = self.pool.append(value);
        self.append(Instruction::Push { index })
    }

    pub fn at(&self, location: Location) -> Instruction {
        assert!(
            location.index() < self.code.len(),
            "Location {} is out of bounds (len = {})",
            location,
            self.code.len()
        );
        self.code[location.index()]
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.code
    }

    pub fn pc(&self, location: Location) -> Pc {
        if location.index() == self.code.len() {
            return self.end_pc();
        }
        assert!(
            location.index() < self.code.len(),
            "Location {} is out of bounds (len = {})",
            location,
            self.code.len()
        );
        Pc::new(self.offsets[location.index()])
    }

    /// Program counter right past the last instruction.
    pub fn end_pc(&self) -> Pc {
        match self.code.last() {
            Some(last) => Pc::new(self.offsets[self.code.len() - 1]).advance(last.size()),
            None => Pc::new(0),
        }
    }

    /// Finds the instruction starting exactly at `pc`.
    pub fn location_at(&self, pc: Pc) -> Option<Location> {
        self.offsets.binary_search(&pc.offset()).ok().map(Location::new)
    }

    /// Replaces the instructions in `range` with `instructions`.
    ///
    /// Returns the locations now occupied by the replacement. Everything
    /// before `range.start` keeps both its location and its program counter.
    pub fn replace_range<I>(&mut self, range: Range<Location>, instructions: I) -> Range<Location>
    where
        I: IntoIterator<Item = Instruction>,
    {
        let (start, end) = (range.start.index(), range.end.index());
        assert!(start <= end, "Invalid range {}..{}", range.start, range.end);
        assert!(
            end <= self.code.len(),
            "Range end {} is out of bounds (len = {})",
            range.end,
            self.code.len()
        );

        let before = self.code.len();
        self.code.splice(start..end, instructions);
        let inserted = self.code.len() + (end - start) - before;
        trace!(
            "replace_range({}..{}) with {} instruction(s)",
            range.start,
            range.end,
            inserted
        );

        self.offsets.truncate(start);
        let mut pc = match start {
            0 => Pc::new(0),
            _ => Pc::new(self.offsets[start - 1]).advance(self.code[start - 1].size()),
        };
        for instruction in &self.code[start..] {
            self.offsets.push(pc.offset());
            pc = pc.advance(instruction.size());
        }

        Location::new(start)..Location::new(start + inserted)
    }

    /// Renders a single instruction with its operands resolved.
    pub fn render(&self, instruction: &Instruction) -> String {
        match *instruction {
            Instruction::Push { index } => format!("{} {}", Opcode::Push, self.pool.at(index)),
            Instruction::Load { slot } => format!("{} %{}", Opcode::Load, slot),
            Instruction::Builtin { symbol } => format!("{} {}", Opcode::Builtin, self.symbol_name(symbol)),
            Instruction::Call { nargs } => format!("{} {}", Opcode::Call, nargs),
            Instruction::CallKnown { symbol, nargs } => {
                format!("{} {} {}", Opcode::CallKnown, self.symbol_name(symbol), nargs)
            }
            other => other.opcode().to_string(),
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, instruction) in self.code.iter().enumerate() {
            let location = Location::new(i);
            writeln!(
                f,
                "{} {:>4}  {}",
                self.pc(location),
                location.to_string(),
                self.render(instruction)
            )?;
        }
        Ok(())
    }
}
