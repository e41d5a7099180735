#![recursion_limit = "512"]
//! cprogen-core: a typed intermediate representation, abstract interpreter,
//! and random populator for generating self-checking C/C++ test programs.
//!
//! The crate builds a statement/expression tree whose leaves and operators
//! are drawn from a seeded PRNG and a configurable [`policy::GenPolicy`],
//! then repairs any undefined behavior the abstract interpreter finds along
//! the way so the resulting tree always evaluates the same way twice. It
//! does not emit source text, parse a CLI, detect the host ISA, or run the
//! generated program through a real compiler — those concerns live one
//! layer up, in whatever consumes [`GeneratedProgram`].
//!
//! # Example
//!
//! ```rust
//! use cprogen_core::{GenPolicy, Generator};
//!
//! let mut generator = Generator::new(42, GenPolicy::default());
//! let program = generator.generate();
//! assert!(!program.root.stmts.is_empty());
//! ```
//!
//! # Module map
//!
//! - [`types`] / [`value`]: the C/C++ integer type lattice and the abstract
//!   values (sign/magnitude plus a tagged UB code) arithmetic operates over.
//! - [`data`]: the three kinds of named storage a program can read/write —
//!   scalar variables, arrays, and loop iterators.
//! - [`expr`]: the expression IR, its type propagation/evaluation passes, and
//!   the UB-repair dispatch that keeps every live subtree well-defined.
//! - [`rebuild`]: the per-`(node kind, UbKind)` repair table `expr` dispatches
//!   into.
//! - [`stmt`]: the statement IR (scopes, loops, if/else) and the populator
//!   that grows expressions into it.
//! - [`stencil`]: the multi-array stencil subscript planner.
//! - [`symtab`]: per-scope symbol tables, including installed stencil params.
//! - [`context`]: the mutable state threaded through structure/populate/
//!   evaluate passes.
//! - [`policy`] / [`config`]: the generation knobs and their TOML/JSON
//!   (de)serialization.
//! - [`rng`]: the dual-stream seeded PRNG.
//! - [`error`]: the one fallible boundary (policy file loading).

#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod expr;
pub mod generator;
pub mod policy;
pub mod rebuild;
pub mod rng;
pub mod stencil;
pub mod stmt;
pub mod symtab;
pub mod types;
pub mod value;

pub use error::{GenError, GenResult};
pub use generator::{GeneratedProgram, Generator};
pub use policy::GenPolicy;
pub use rng::GenRng;
pub use symtab::SymbolTable;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
