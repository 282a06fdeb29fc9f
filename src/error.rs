//! Error Types

use thiserror::Error;

/// Symbol table errors. Both variants are recoverable by the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SymbolError {
    /// The symbol has not been interned
    #[error("symbol not found: {symbol:?}")]
    NotFound { symbol: String },

    /// The id does not refer to an interned symbol
    #[error("symbol id {id} out of range (size {size})")]
    OutOfRange { id: u32, size: usize },
}

/// Lowering errors. These indicate a bug in an earlier pass; the driver is
/// expected to abort with the diagnostic rather than recover.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LowerError {
    /// A postcondition of an upstream analysis does not hold
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A head or constraint variable has no definition in a positive body atom
    #[error("variable '{variable}' is not grounded in clause {clause}")]
    UnboundVariable { variable: String, clause: String },

    /// An atom refers to a relation with no declaration
    #[error("unknown relation: {0}")]
    UnknownRelation(String),

    /// A branch constructor is not registered with any sum type
    #[error("unknown branch constructor: {0}")]
    UnknownConstructor(String),

    /// A user-defined functor has no registered signature
    #[error("unknown user-defined functor: {0}")]
    UnknownFunctor(String),
}

/// Result type for lowering operations
pub type LowerResult<T> = Result<T, LowerError>;
