//! # Relational-Algebra IR
//!
//! The imperative program produced by lowering and handed to the back-end.
//! Three sum types mirror the statement / operation / expression layering:
//! [`Statement`]s sequence work and drive fixpoint loops, [`Operation`]s form
//! the nested scan trees of a single query, [`Expression`]s compute values
//! inside them. Side conditions are [`Condition`]s.
//!
//! Every node is uniquely owned by its parent; cloning and equality are
//! structural.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::ast::{escape, AggregateOp, IntrinsicOp, Representation};

/// Signed runtime value, the domain of interned symbol ids as well.
pub type RamSigned = i64;
/// Unsigned runtime value.
pub type RamUnsigned = u64;
/// Floating-point runtime value.
pub type RamFloat = f64;

/// Runtime type of a functor argument or result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TypeAttribute {
    Symbol,
    Signed,
    Unsigned,
    Float,
    Record,
}

// ============================================================================
// Programs and relations
// ============================================================================

/// Schema of a materialized relation in the produced program.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relation {
    pub name: String,
    pub arity: usize,
    pub attribute_names: Vec<String>,
    pub attribute_types: Vec<String>,
    pub representation: Representation,
}

/// A complete produced program: the relation registry, one named subroutine
/// per stratum and the main invocation sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub relations: Vec<Relation>,
    pub main: Statement,
    pub subroutines: BTreeMap<String, Statement>,
}

impl Program {
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|rel| rel.name == name)
    }

    /// Render the whole program as indented text.
    pub fn pretty_print(&self) -> String {
        let mut out = String::from("PROGRAM\n DECLARATION\n");
        for relation in &self.relations {
            let columns: Vec<String> = relation
                .attribute_names
                .iter()
                .zip(&relation.attribute_types)
                .map(|(name, ty)| format!("{name}:{ty}"))
                .collect();
            out.push_str(&format!(
                "  {}({}) {:?}\n",
                relation.name,
                columns.join(","),
                relation.representation
            ));
        }
        out.push_str(" END DECLARATION\n");
        for (name, body) in &self.subroutines {
            out.push_str(&format!(" SUBROUTINE {name}\n"));
            out.push_str(&body.pretty_print(2));
            out.push_str(" END SUBROUTINE\n");
        }
        out.push_str(" BEGIN MAIN\n");
        out.push_str(&self.main.pretty_print(2));
        out.push_str(" END MAIN\nEND PROGRAM\n");
        out
    }
}

// ============================================================================
// Statements
// ============================================================================

/// An imperative statement of the produced program.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Execute children in order
    Sequence(Vec<Statement>),
    /// Children may execute concurrently
    Parallel(Vec<Statement>),
    /// Repeat the body until an inner `Exit` fires
    Loop(Box<Statement>),
    /// Leave the innermost loop when the condition holds
    Exit(Condition),
    /// Invoke a named subroutine
    Call(String),
    /// Remove all tuples of a relation
    Clear(String),
    /// Exchange the contents of two relations with identical schemas
    Swap(String, String),
    /// Extend an equivalence relation with the pairs of another relation
    Extend(String, String),
    /// Load or store a relation through an IO driver
    Io { relation: String, directives: BTreeMap<String, String> },
    /// Run one relational query
    Query(Operation),
    /// Annotate a statement with its source clause for diagnostics
    DebugInfo { stmt: Box<Statement>, text: String },
    /// Time a statement and log under a relation's profile entry
    LogRelationTimer { stmt: Box<Statement>, message: String, relation: String },
    /// Time a statement and log globally
    LogTimer { stmt: Box<Statement>, message: String },
    /// Log the size of a relation
    LogSize { relation: String, message: String },
}

impl Statement {
    pub fn is_query(&self) -> bool {
        matches!(self, Statement::Query(_))
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self, Statement::Parallel(_))
    }

    /// Child statements of sequencing nodes; empty for leaves.
    pub fn children(&self) -> &[Statement] {
        match self {
            Statement::Sequence(children) | Statement::Parallel(children) => children,
            _ => &[],
        }
    }

    /// Render as indented text; `indent` is the starting depth.
    pub fn pretty_print(&self, indent: usize) -> String {
        let prefix = " ".repeat(indent);
        match self {
            Statement::Sequence(children) => {
                children.iter().map(|c| c.pretty_print(indent)).collect()
            }
            Statement::Parallel(children) => {
                let mut out = format!("{prefix}PARALLEL\n");
                for child in children {
                    out.push_str(&child.pretty_print(indent + 1));
                }
                out.push_str(&format!("{prefix}END PARALLEL\n"));
                out
            }
            Statement::Loop(body) => {
                format!("{prefix}LOOP\n{}{prefix}END LOOP\n", body.pretty_print(indent + 1))
            }
            Statement::Exit(condition) => format!("{prefix}EXIT {condition}\n"),
            Statement::Call(name) => format!("{prefix}CALL {name}\n"),
            Statement::Clear(relation) => format!("{prefix}CLEAR {relation}\n"),
            Statement::Swap(a, b) => format!("{prefix}SWAP ({a}, {b})\n"),
            Statement::Extend(a, b) => format!("{prefix}EXTEND ({a}, {b})\n"),
            Statement::Io { relation, directives } => {
                let rendered: Vec<String> =
                    directives.iter().map(|(k, v)| format!("{k}=\"{}\"", escape(v))).collect();
                format!("{prefix}IO {relation} {{{}}}\n", rendered.join(","))
            }
            Statement::Query(operation) => {
                format!("{prefix}QUERY\n{}", operation.pretty_print(indent + 1))
            }
            Statement::DebugInfo { stmt, text } => {
                let flat = text.replace('\n', " ");
                format!("{prefix}DEBUG \"{flat}\"\n{}", stmt.pretty_print(indent + 1))
            }
            Statement::LogRelationTimer { stmt, message, relation } => {
                format!(
                    "{prefix}START_TIMER ON {relation} \"{message}\"\n{}{prefix}END_TIMER\n",
                    stmt.pretty_print(indent + 1)
                )
            }
            Statement::LogTimer { stmt, message } => {
                format!(
                    "{prefix}START_TIMER \"{message}\"\n{}{prefix}END_TIMER\n",
                    stmt.pretty_print(indent + 1)
                )
            }
            Statement::LogSize { relation, message } => {
                format!("{prefix}LOGSIZE {relation} \"{message}\"\n")
            }
        }
    }
}

// ============================================================================
// Operations
// ============================================================================

/// A node of a query's nested operation tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Bind each tuple of a relation at `level` and run the inner operation
    Scan { relation: String, level: usize, inner: Box<Operation> },
    /// Run the inner operation only when the condition holds
    Filter { condition: Condition, inner: Box<Operation> },
    /// Fold an expression over the matching tuples of a relation, binding the
    /// result at `(level, 0)`
    Aggregate {
        op: AggregateOp,
        relation: String,
        level: usize,
        expr: Box<Expression>,
        condition: Condition,
        inner: Box<Operation>,
    },
    /// Materialize a tuple into a relation
    Project { relation: String, values: Vec<Expression> },
}

impl Operation {
    pub fn is_scan(&self) -> bool {
        matches!(self, Operation::Scan { .. })
    }

    pub fn is_project(&self) -> bool {
        matches!(self, Operation::Project { .. })
    }

    /// The operation nested inside this one, if any.
    pub fn inner(&self) -> Option<&Operation> {
        match self {
            Operation::Scan { inner, .. }
            | Operation::Filter { inner, .. }
            | Operation::Aggregate { inner, .. } => Some(inner),
            Operation::Project { .. } => None,
        }
    }

    /// The innermost operation of the nest, normally a projection.
    pub fn innermost(&self) -> &Operation {
        let mut op = self;
        while let Some(inner) = op.inner() {
            op = inner;
        }
        op
    }

    pub fn pretty_print(&self, indent: usize) -> String {
        let prefix = " ".repeat(indent);
        match self {
            Operation::Scan { relation, level, inner } => {
                format!("{prefix}FOR t{level} IN {relation}\n{}", inner.pretty_print(indent + 1))
            }
            Operation::Filter { condition, inner } => {
                format!("{prefix}IF {condition}\n{}", inner.pretty_print(indent + 1))
            }
            Operation::Aggregate { op, relation, level, expr, condition, inner } => {
                format!(
                    "{prefix}t{level}.0 = {} {expr} FOR ALL t{level} IN {relation} WHERE {condition}\n{}",
                    op.as_str().to_uppercase(),
                    inner.pretty_print(indent + 1)
                )
            }
            Operation::Project { relation, values } => {
                let rendered: Vec<String> = values.iter().map(Expression::to_string).collect();
                format!("{prefix}INSERT ({}) INTO {relation}\n", rendered.join(","))
            }
        }
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// A side condition evaluated inside queries and loop exits.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    True,
    False,
    /// The relation holds no tuples
    EmptinessCheck(String),
    /// The relation holds a tuple matching the values; `Undef` positions
    /// match anything
    ExistenceCheck { relation: String, values: Vec<Expression> },
    Negation(Box<Condition>),
    Conjunction(Box<Condition>, Box<Condition>),
    Constraint { op: ConstraintOp, lhs: Expression, rhs: Expression },
}

impl Condition {
    /// Conjoin conditions left to right; the empty conjunction is `True`.
    pub fn conjoin(conditions: impl IntoIterator<Item = Condition>) -> Condition {
        conditions
            .into_iter()
            .reduce(|a, b| Condition::Conjunction(Box::new(a), Box::new(b)))
            .unwrap_or(Condition::True)
    }

    pub fn negate(self) -> Condition {
        Condition::Negation(Box::new(self))
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::True => write!(f, "true"),
            Condition::False => write!(f, "false"),
            Condition::EmptinessCheck(relation) => write!(f, "ISEMPTY({relation})"),
            Condition::ExistenceCheck { relation, values } => {
                let rendered: Vec<String> = values.iter().map(Expression::to_string).collect();
                write!(f, "({}) IN {relation}", rendered.join(","))
            }
            Condition::Negation(inner) => write!(f, "(NOT {inner})"),
            Condition::Conjunction(lhs, rhs) => write!(f, "({lhs} AND {rhs})"),
            Condition::Constraint { op, lhs, rhs } => {
                write!(f, "({lhs} {} {rhs})", op.as_str())
            }
        }
    }
}

/// Comparison opcodes with the numeric kind resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Ult,
    Ule,
    Ugt,
    Uge,
    Flt,
    Fle,
    Fgt,
    Fge,
}

impl ConstraintOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintOp::Eq => "=",
            ConstraintOp::Ne => "!=",
            ConstraintOp::Lt => "<",
            ConstraintOp::Le => "<=",
            ConstraintOp::Gt => ">",
            ConstraintOp::Ge => ">=",
            ConstraintOp::Ult => "u<",
            ConstraintOp::Ule => "u<=",
            ConstraintOp::Ugt => "u>",
            ConstraintOp::Uge => "u>=",
            ConstraintOp::Flt => "f<",
            ConstraintOp::Fle => "f<=",
            ConstraintOp::Fgt => "f>",
            ConstraintOp::Fge => "f>=",
        }
    }
}

// ============================================================================
// Expressions
// ============================================================================

/// A value computed inside a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    SignedConstant(RamSigned),
    UnsignedConstant(RamUnsigned),
    FloatConstant(RamFloat),
    /// Element `pos` of the tuple bound at `level`
    TupleElement { level: usize, pos: usize },
    /// Number of tuples currently in a relation
    RelationSize(String),
    IntrinsicOperator { op: IntrinsicOp, args: Vec<Expression> },
    UserDefinedOperator {
        name: String,
        arg_types: Vec<TypeAttribute>,
        return_type: TypeAttribute,
        stateful: bool,
        args: Vec<Expression>,
    },
    /// Intern a record of values and yield its reference
    PackRecord(Vec<Expression>),
    /// A fresh number on every evaluation
    AutoIncrement,
    /// Positional argument of the enclosing subroutine
    SubroutineArgument(usize),
    /// No value; matches anything in existence checks
    Undef,
}

impl Expression {
    pub fn is_undef(&self) -> bool {
        matches!(self, Expression::Undef)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::SignedConstant(value) => write!(f, "number({value})"),
            Expression::UnsignedConstant(value) => write!(f, "unsigned({value})"),
            Expression::FloatConstant(value) => write!(f, "float({value})"),
            Expression::TupleElement { level, pos } => write!(f, "t{level}.{pos}"),
            Expression::RelationSize(relation) => write!(f, "size({relation})"),
            Expression::IntrinsicOperator { op, args } => {
                let rendered: Vec<String> = args.iter().map(Expression::to_string).collect();
                write!(f, "{op:?}({})", rendered.join(","))
            }
            Expression::UserDefinedOperator { name, args, .. } => {
                let rendered: Vec<String> = args.iter().map(Expression::to_string).collect();
                write!(f, "@{name}({})", rendered.join(","))
            }
            Expression::PackRecord(args) => {
                let rendered: Vec<String> = args.iter().map(Expression::to_string).collect();
                write!(f, "[{}]", rendered.join(","))
            }
            Expression::AutoIncrement => write!(f, "autoinc()"),
            Expression::SubroutineArgument(n) => write!(f, "argument({n})"),
            Expression::Undef => write!(f, "UNDEF"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(level: usize, pos: usize) -> Expression {
        Expression::TupleElement { level, pos }
    }

    // ========================================================================
    // Clone and structural equality
    // ========================================================================

    #[test]
    fn true_and_false_clone_and_compare() {
        assert_eq!(Condition::True, Condition::True.clone());
        assert_eq!(Condition::False, Condition::False.clone());
        assert_ne!(Condition::True, Condition::False);
    }

    #[test]
    fn conjunction_clone_and_equality_is_structural() {
        // true /\ false
        let a = Condition::Conjunction(Box::new(Condition::True), Box::new(Condition::False));
        let b = Condition::Conjunction(Box::new(Condition::True), Box::new(Condition::False));
        assert_eq!(a, b);
        assert_eq!(a, a.clone());

        // true /\ (false /\ true)
        let nested = Condition::Conjunction(
            Box::new(Condition::True),
            Box::new(Condition::Conjunction(Box::new(Condition::False), Box::new(Condition::True))),
        );
        assert_eq!(nested, nested.clone());
        assert_ne!(a, nested);
    }

    #[test]
    fn negation_clone_and_equality() {
        let single = Condition::True.negate();
        let double = Condition::False.negate().negate();
        assert_eq!(single, single.clone());
        assert_eq!(double, double.clone());
        assert_ne!(single, double);
    }

    #[test]
    fn constraint_distinguishes_opcodes_and_operands() {
        let lt = Condition::Constraint {
            op: ConstraintOp::Lt,
            lhs: t(0, 0),
            rhs: Expression::SignedConstant(10),
        };
        let le = Condition::Constraint {
            op: ConstraintOp::Le,
            lhs: t(0, 0),
            rhs: Expression::SignedConstant(10),
        };
        let other_rhs = Condition::Constraint {
            op: ConstraintOp::Lt,
            lhs: t(0, 0),
            rhs: Expression::SignedConstant(11),
        };
        assert_eq!(lt, lt.clone());
        assert_ne!(lt, le);
        assert_ne!(lt, other_rhs);
    }

    #[test]
    fn emptiness_and_existence_checks_compare_by_relation() {
        let empty_a = Condition::EmptinessCheck("a".into());
        let empty_b = Condition::EmptinessCheck("b".into());
        assert_eq!(empty_a, empty_a.clone());
        assert_ne!(empty_a, empty_b);

        let exists = Condition::ExistenceCheck {
            relation: "edge".into(),
            values: vec![t(0, 0), Expression::Undef],
        };
        assert_eq!(exists, exists.clone());
    }

    #[test]
    fn statements_clone_deeply() {
        let stmt = Statement::Loop(Box::new(Statement::Sequence(vec![
            Statement::Query(Operation::Scan {
                relation: "edge".into(),
                level: 0,
                inner: Box::new(Operation::Project {
                    relation: "path".into(),
                    values: vec![t(0, 0), t(0, 1)],
                }),
            }),
            Statement::Exit(Condition::EmptinessCheck("@new_path".into())),
        ])));
        assert_eq!(stmt, stmt.clone());
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    #[test]
    fn conjoin_folds_left_and_defaults_to_true() {
        assert_eq!(Condition::conjoin(vec![]), Condition::True);

        let single = Condition::conjoin(vec![Condition::EmptinessCheck("a".into())]);
        assert_eq!(single, Condition::EmptinessCheck("a".into()));

        let folded = Condition::conjoin(vec![
            Condition::EmptinessCheck("a".into()),
            Condition::EmptinessCheck("b".into()),
            Condition::EmptinessCheck("c".into()),
        ]);
        assert_eq!(
            folded,
            Condition::Conjunction(
                Box::new(Condition::Conjunction(
                    Box::new(Condition::EmptinessCheck("a".into())),
                    Box::new(Condition::EmptinessCheck("b".into())),
                )),
                Box::new(Condition::EmptinessCheck("c".into())),
            )
        );
    }

    #[test]
    fn innermost_walks_to_the_projection() {
        let op = Operation::Scan {
            relation: "edge".into(),
            level: 0,
            inner: Box::new(Operation::Filter {
                condition: Condition::True,
                inner: Box::new(Operation::Project { relation: "path".into(), values: vec![] }),
            }),
        };
        assert!(op.is_scan());
        assert!(op.innermost().is_project());
    }

    // ========================================================================
    // Printing
    // ========================================================================

    #[test]
    fn scan_project_pretty_print() {
        let op = Operation::Scan {
            relation: "edge".into(),
            level: 0,
            inner: Box::new(Operation::Project {
                relation: "path".into(),
                values: vec![t(0, 0), t(0, 1)],
            }),
        };
        let text = op.pretty_print(0);
        assert!(text.contains("FOR t0 IN edge"));
        assert!(text.contains("INSERT (t0.0,t0.1) INTO path"));
    }

    #[test]
    fn conditions_render_inline() {
        let cond = Condition::Conjunction(
            Box::new(Condition::EmptinessCheck("@new_a".into())),
            Box::new(Condition::EmptinessCheck("@new_b".into())),
        );
        assert_eq!(cond.to_string(), "(ISEMPTY(@new_a) AND ISEMPTY(@new_b))");

        let limit = Condition::Constraint {
            op: ConstraintOp::Ge,
            lhs: Expression::RelationSize("a".into()),
            rhs: Expression::SignedConstant(1000),
        };
        assert_eq!(limit.to_string(), "(size(a) >= number(1000))");
    }

    #[test]
    fn io_statement_escapes_directive_values() {
        let mut directives = BTreeMap::new();
        directives.insert("IO".to_string(), "file".to_string());
        directives.insert("delimiter".to_string(), "\t".to_string());
        let stmt = Statement::Io { relation: "edge".into(), directives };
        let text = stmt.pretty_print(0);
        assert!(text.contains("IO edge"));
        assert!(text.contains("delimiter=\"\\t\""));
    }

    #[test]
    fn loop_statement_nests_output() {
        let stmt = Statement::Loop(Box::new(Statement::Exit(Condition::True)));
        let text = stmt.pretty_print(0);
        assert!(text.starts_with("LOOP\n"));
        assert!(text.contains(" EXIT true"));
        assert!(text.ends_with("END LOOP\n"));
    }

    #[test]
    fn program_pretty_print_lists_declarations_and_subroutines() {
        let mut subroutines = BTreeMap::new();
        subroutines.insert("stratum_0".to_string(), Statement::Clear("edge".into()));
        let program = Program {
            relations: vec![Relation {
                name: "edge".into(),
                arity: 2,
                attribute_names: vec!["x".into(), "y".into()],
                attribute_types: vec!["i:number".into(), "i:number".into()],
                representation: Representation::Default,
            }],
            main: Statement::Call("stratum_0".into()),
            subroutines,
        };
        let text = program.pretty_print();
        assert!(text.contains("edge(x:i:number,y:i:number)"));
        assert!(text.contains("SUBROUTINE stratum_0"));
        assert!(text.contains("CALL stratum_0"));
        assert!(program.relation("edge").is_some());
        assert!(program.relation("path").is_none());
    }

    #[test]
    fn expressions_render_compactly() {
        assert_eq!(t(1, 2).to_string(), "t1.2");
        assert_eq!(Expression::SignedConstant(-7).to_string(), "number(-7)");
        assert_eq!(Expression::UnsignedConstant(7).to_string(), "unsigned(7)");
        assert_eq!(
            Expression::PackRecord(vec![Expression::SignedConstant(1), t(0, 0)]).to_string(),
            "[number(1),t0.0]"
        );
        assert_eq!(Expression::AutoIncrement.to_string(), "autoinc()");
        assert_eq!(Expression::SubroutineArgument(3).to_string(), "argument(3)");
        assert!(Expression::Undef.is_undef());
        let op = Expression::IntrinsicOperator {
            op: IntrinsicOp::Add,
            args: vec![t(0, 0), Expression::SignedConstant(1)],
        };
        assert_eq!(op.to_string(), "Add(t0.0,number(1))");
    }
}
