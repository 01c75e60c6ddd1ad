//! # peephole-rs: Analysis-driven peephole rewriting
//!
//! **`peephole-rs`** rewrites small fragments of stack bytecode using facts computed by abstract interpretation.
//! A rule says *"an `add` whose operands are both naked integers"*, and the matcher finds every place where the
//! program and the analyses agree with it.
//!
//! ## How it works
//!
//! - **Lattices**: every analysis produces values of a [`Lattice`][crate::lattice::Lattice], ordered from `bottom` (no value flows here) to `top` (anything can flow here).
//! - **Analyses**: read-only sources of facts keyed by [`Location`][crate::types::Location], grouped in an [`Analyses`][crate::analysis::Analyses] context. A missing fact is `top`.
//! - **Patterns**: trees of instruction nodes, value nodes and wildcards. A value node matches when the analysis fact *refines* the required value.
//! - **Rules**: a pattern plus an action (and optionally a guard). The action may rewrite only the instructions the match touched.
//! - **Matcher**: indexes the rules by opcode and by analysis value, and walks the program once, firing the best rule at each location.
//!
//! ## Basic Usage
//!
//! ```rust
//! use peephole_rs::infer;
//! use peephole_rs::matcher::Matcher;
//! use peephole_rs::program::{Instruction, Program};
//! use peephole_rs::rules;
//!
//! // 1. Build a program: push 1; push 2; add
//! let mut program = Program::new();
//! program.push_literal(1);
//! program.push_literal(2);
//! program.append(Instruction::Add);
//!
//! // 2. Compute facts and register the stock rules
//! let analyses = infer::all(&program);
//! let matcher = Matcher::with_rules(rules::standard());
//!
//! // 3. Rewrite
//! let report = matcher.scan(&mut program, &analyses);
//! assert_eq!(report.rewrites(), 1);
//! assert_eq!(program.len(), 1);
//! assert_eq!(program.to_string().trim_end(), "0000   #0  push 3");
//! ```
//!
//! ## Core Components
//!
//! - **[`lattice`]**: the lattice trait and the stock value families.
//! - **[`pattern`]**: pattern trees and matching.
//! - **[`matcher`]**: the rule index and the rewrite loop.
//! - **[`rules`]**: ready-made rules.

pub mod analysis;
pub mod flow;
pub mod infer;
pub mod lattice;
pub mod matcher;
pub mod pattern;
pub mod program;
pub mod rule;
pub mod rules;
pub mod types;
