//! # Datalog AST - Abstract Syntax Tree Types
//!
//! The program representation consumed by the lowering pass. The parser and
//! the semantic analyses that produce it live upstream; lowering only reads
//! these types, except for the two preprocessing rewrites (type finalization
//! and sum-type desugaring) which run on an owned copy.
//!
//! ## Builders
//!
//! For programmatic construction of AST nodes, see the [`builders`] module
//! which provides fluent APIs like `AtomBuilder` and `ClauseBuilder`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod builders;

// ============================================================================
// Programs, relations, directives
// ============================================================================

/// A complete Datalog program: relation declarations plus clauses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub relations: Vec<Relation>,
    pub clauses: Vec<Clause>,
}

impl Program {
    /// Find a relation declaration by name.
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|rel| rel.name == name)
    }

    /// All clauses whose head is `name`, in declaration order.
    pub fn clauses_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Clause> {
        self.clauses.iter().filter(move |clause| clause.head.relation == name)
    }
}

/// Declaration of a relation: attributes, physical representation, IO
/// directives and an optional tuple-count limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub representation: Representation,
    pub directives: Vec<Directive>,
    pub size_limit: Option<usize>,
}

impl Relation {
    pub fn arity(&self) -> usize {
        self.attributes.len()
    }

    pub fn load_directives(&self) -> impl Iterator<Item = &Directive> {
        self.directives.iter().filter(|d| d.kind == DirectiveKind::Input)
    }

    pub fn store_directives(&self) -> impl Iterator<Item = &Directive> {
        self.directives.iter().filter(|d| d.kind == DirectiveKind::Output)
    }

    pub fn is_input(&self) -> bool {
        self.load_directives().next().is_some()
    }

    pub fn is_output(&self) -> bool {
        self.store_directives().next().is_some()
    }
}

/// A named, typed attribute of a relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    /// Type qualifier string as produced by the type analysis, e.g. `s:symbol`
    pub type_qualifier: String,
}

/// Physical representation requested for a relation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Representation {
    #[default]
    Default,
    Btree,
    Brie,
    /// Equivalence relation; merges go through a closure-extension step
    Eqrel,
}

/// An IO directive attached to a relation declaration.
///
/// The `params` map is passed through to the emitted IO statements; the `IO`
/// key selects the driver (`file`, `stdin`, `stdout`), `filename` and `name`
/// are conventional. Values may contain the escapes `\"`, `\t`, `\r`, `\n`,
/// which are decoded on the way into the IR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectiveKind {
    Input,
    Output,
}

/// Decode `\"`, `\t`, `\r` and `\n` escapes in a directive value.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Inverse of [`unescape`].
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

// ============================================================================
// Clauses and literals
// ============================================================================

/// A single rule `head :- body.` A fact is a clause with an empty body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub head: Atom,
    pub body: Vec<Literal>,
    /// User-supplied atom orders per clause version
    pub plan: Option<ExecutionPlan>,
    /// Printable source location, carried into debug-info statements
    pub src_loc: String,
}

impl Clause {
    /// Positive body atoms in body order.
    pub fn positive_atoms(&self) -> Vec<&Atom> {
        self.body
            .iter()
            .filter_map(|lit| match lit {
                Literal::Atom(atom) => Some(atom),
                _ => None,
            })
            .collect()
    }

    /// Replace every wildcard with a fresh variable so that downstream index
    /// selection can treat all positions uniformly.
    pub fn name_unnamed_variables(&mut self) {
        let mut counter = 0;
        name_in_atom(&mut self.head, &mut counter);
        for literal in &mut self.body {
            match literal {
                Literal::Atom(atom) | Literal::Negation(atom) => name_in_atom(atom, &mut counter),
                Literal::Constraint(_) => {}
            }
        }
    }
}

fn name_in_atom(atom: &mut Atom, counter: &mut usize) {
    for arg in &mut atom.args {
        name_in_argument(arg, counter);
    }
}

fn name_in_argument(arg: &mut Argument, counter: &mut usize) {
    match arg {
        Argument::UnnamedVariable => {
            *counter += 1;
            *arg = Argument::Variable(format!("_unnamed_var{counter}"));
        }
        Argument::TypeCast { value, .. } => name_in_argument(value, counter),
        Argument::Record(args) | Argument::Branch { args, .. } => {
            for inner in args {
                name_in_argument(inner, counter);
            }
        }
        Argument::Intrinsic { args, .. } | Argument::UserFunctor { args, .. } => {
            for inner in args {
                name_in_argument(inner, counter);
            }
        }
        _ => {}
    }
}

/// A body literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// Positive atom
    Atom(Atom),
    /// Negated atom
    Negation(Atom),
    /// Binary constraint between two values
    Constraint(Constraint),
}

/// A predicate applied to argument terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub relation: String,
    pub args: Vec<Argument>,
}

impl Atom {
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

/// Binary constraint, e.g. `x < y`. Ordering comparisons are polymorphic over
/// the numeric kinds; the type analysis records the resolved kind in `ty`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub op: ComparisonOp,
    pub ty: Option<NumericType>,
    pub lhs: Argument,
    pub rhs: Argument,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
        }
    }
}

/// User-supplied execution orders, one per clause version.
///
/// An order lists body-atom positions starting from 1. A plan whose highest
/// version key is not below the number of generated versions is rejected
/// during lowering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub orders: BTreeMap<usize, Vec<usize>>,
}

impl ExecutionPlan {
    pub fn max_version(&self) -> Option<usize> {
        self.orders.keys().next_back().copied()
    }
}

// ============================================================================
// Argument terms
// ============================================================================

/// Numeric kinds a polymorphic constant or operator can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumericType {
    Int,
    Uint,
    Float,
}

/// An argument term of an atom, constraint or functor application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Argument {
    /// Named variable
    Variable(String),
    /// Wildcard `_`
    UnnamedVariable,
    /// Numeric literal; `ty` is filled by the type analysis
    NumericConstant { raw: String, ty: Option<NumericType> },
    /// String literal, interned during lowering
    StringConstant(String),
    /// `nil`, the empty record reference
    NilConstant,
    /// `as(value, type)`; transparent to lowering
    TypeCast { target: String, value: Box<Argument> },
    /// Record constructor `[a, b, c]`
    Record(Vec<Argument>),
    /// Sum-type branch constructor `$C(args)`; desugared before lowering
    Branch { constructor: String, args: Vec<Argument> },
    /// Aggregate over a single-atom body, e.g. `sum y : data(x, y)`
    Aggregator(Box<Aggregator>),
    /// Intrinsic functor application; `op` is filled by the type analysis
    Intrinsic { name: String, op: Option<IntrinsicOp>, args: Vec<Argument> },
    /// User-defined functor application; signature lives in the functor registry
    UserFunctor { name: String, args: Vec<Argument> },
    /// `$`, a fresh number on every evaluation
    Counter,
    /// Positional argument of a generated subroutine
    SubroutineArg(usize),
}

impl Argument {
    pub fn is_variable(&self) -> bool {
        matches!(self, Argument::Variable(_))
    }

    pub fn as_variable(&self) -> Option<&str> {
        if let Argument::Variable(name) = self {
            Some(name)
        } else {
            None
        }
    }

    /// Convenience constructor for a type-finalized integer literal.
    pub fn int(value: i64) -> Self {
        Argument::NumericConstant { raw: value.to_string(), ty: Some(NumericType::Int) }
    }
}

/// An aggregate term. The body is a single atom; constants and repeated
/// variables inside it become conditions on the aggregate scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregator {
    pub op: AggregateOp,
    /// Aggregated value; `None` for count
    pub target: Option<Argument>,
    pub body: Atom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateOp {
    Count,
    Sum,
    Min,
    Max,
    Mean,
}

impl AggregateOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateOp::Count => "count",
            AggregateOp::Sum => "sum",
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Mean => "mean",
        }
    }
}

/// Resolved opcodes for intrinsic functors. All current intrinsics are
/// single-valued; multi-valued intrinsics answer `true` to the functor
/// registry's multi-result predicate and bind through the value index instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntrinsicOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Band,
    Bor,
    Bxor,
    Bnot,
    Land,
    Lor,
    Lnot,
    Max,
    Min,
    Cat,
    Ord,
    Strlen,
    Substr,
    ToNumber,
    ToString,
}

// ============================================================================
// Printing
// ============================================================================

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.head)?;
        if !self.body.is_empty() {
            write!(f, " :- ")?;
            for (i, literal) in self.body.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{literal}")?;
            }
        }
        write!(f, ".")
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Atom(atom) => write!(f, "{atom}"),
            Literal::Negation(atom) => write!(f, "!{atom}"),
            Literal::Constraint(constraint) => write!(f, "{constraint}"),
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.relation)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op.as_str(), self.rhs)
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Variable(name) => write!(f, "{name}"),
            Argument::UnnamedVariable => write!(f, "_"),
            Argument::NumericConstant { raw, .. } => write!(f, "{raw}"),
            Argument::StringConstant(text) => write!(f, "\"{text}\""),
            Argument::NilConstant => write!(f, "nil"),
            Argument::TypeCast { target, value } => write!(f, "as({value}, {target})"),
            Argument::Record(args) => {
                write!(f, "[")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, "]")
            }
            Argument::Branch { constructor, args } => {
                write!(f, "${constructor}")?;
                if !args.is_empty() {
                    write!(f, "(")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ",")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    write!(f, ")")?;
                }
                Ok(())
            }
            Argument::Aggregator(agg) => {
                write!(f, "{}", agg.op.as_str())?;
                if let Some(target) = &agg.target {
                    write!(f, " {target}")?;
                }
                write!(f, " : {}", agg.body)
            }
            Argument::Intrinsic { name, args, .. } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Argument::UserFunctor { name, args } => {
                write!(f, "@{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Argument::Counter => write!(f, "$"),
            Argument::SubroutineArg(n) => write!(f, "arg_{n}"),
        }
    }
}
