//! # Stratalog Compiler Core
//!
//! The two load-bearing subsystems of a Datalog compiler:
//!
//! 1. A **concurrent symbol table** — an append-only interning store mapping
//!    strings to dense integer ids, written concurrently by many worker
//!    threads while the emitted program evaluates bottom-up.
//! 2. The **AST → IR lowering** — the pass that consumes a typed Datalog
//!    program and emits an imperative relational-algebra program computing
//!    the minimal model by stratified semi-naïve evaluation.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Datalog Source Code
//!     ↓
//! [Parser]                      → AST            (upstream, out of scope)
//!     ↓
//! [Type & Semantic Analysis]    → Analyses       (upstream, out of scope)
//!     ↓
//! [SCC Analysis]                → SccGraph       (analysis module)
//!     ↓
//! [Translator]                  → IR Program     (lowering module)
//!     ↓
//! [Back-end]                    → execution      (downstream, out of scope)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use stratalog::ast::builders::{ClauseBuilder, ProgramBuilder, RelationBuilder};
//! use stratalog::{Analyses, LoweringOptions, Translator};
//!
//! // path(x, y) :- edge(x, y).
//! // path(x, z) :- path(x, y), edge(y, z).
//! let program = ProgramBuilder::new()
//!     .relation(RelationBuilder::new("edge").number_attrs(["x", "y"]).input().build())
//!     .relation(RelationBuilder::new("path").number_attrs(["x", "y"]).output().build())
//!     .clause(
//!         ClauseBuilder::new("path")
//!             .head_vars(["x", "y"])
//!             .body_atom("edge", ["x", "y"])
//!             .build(),
//!     )
//!     .clause(
//!         ClauseBuilder::new("path")
//!             .head_vars(["x", "z"])
//!             .body_atom("path", ["x", "y"])
//!             .body_atom("edge", ["y", "z"])
//!             .build(),
//!     )
//!     .build();
//!
//! let analyses = Analyses::analyse(&program);
//! let translator = Translator::new(LoweringOptions::default());
//! let unit = translator.translate(program, &analyses)?;
//!
//! assert!(unit.program.subroutines.contains_key("stratum_1"));
//! # Ok::<(), stratalog::LowerError>(())
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `symbols` | Concurrent string ↔ id interning |
//! | `ast` | Consumed program representation + builders |
//! | `analysis` | SCC graph, sum-type branches, functor registry |
//! | `lowering` | Stratum driver, semi-naïve fixpoints, clause translation |
//! | `ir` | Produced statements, operations, conditions, expressions |
//! | `config` | Lowering options (profile, debug report) |
//! | `report` | Debug report sections |

pub mod analysis;
pub mod ast;
pub mod config;
pub mod error;
pub mod ir;
pub mod lowering;
pub mod report;
pub mod symbols;

// Re-export the main entry points
pub use analysis::{Analyses, FunctorRegistry, Scc, SccGraph, SumTypeBranches};
pub use config::LoweringOptions;
pub use error::{LowerError, LowerResult, SymbolError};
pub use lowering::{delta_relation_name, new_relation_name, stratum_name, LoweredUnit, Translator};
pub use report::DebugReport;
pub use symbols::{SymbolId, SymbolTable, EMPTY_SYMBOL_ID};
