//! Builder Patterns for AST Construction
//!
//! Provides fluent APIs for constructing AST nodes, particularly useful for
//! tests and for drivers that synthesize programs.
//!
//! ## Example
//!
//! ```rust
//! use stratalog::ast::builders::{AtomBuilder, ClauseBuilder};
//!
//! // Build an atom: path(x, y)
//! let atom = AtomBuilder::new("path").var("x").var("y").build();
//!
//! // Build a clause: path(x, z) :- path(x, y), edge(y, z).
//! let clause = ClauseBuilder::new("path")
//!     .head_vars(["x", "z"])
//!     .body_atom("path", ["x", "y"])
//!     .body_atom("edge", ["y", "z"])
//!     .build();
//! ```

use std::collections::BTreeMap;

use super::{
    Argument, Atom, Clause, ComparisonOp, Constraint, Directive, DirectiveKind, ExecutionPlan,
    Literal, NumericType, Program, Relation, Representation,
};

// ============================================================================
// AtomBuilder
// ============================================================================

/// Builder for constructing [`Atom`] instances
#[derive(Debug, Clone)]
pub struct AtomBuilder {
    relation: String,
    args: Vec<Argument>,
}

impl AtomBuilder {
    pub fn new(relation: impl Into<String>) -> Self {
        AtomBuilder { relation: relation.into(), args: Vec::new() }
    }

    /// Append a variable argument
    pub fn var(mut self, name: impl Into<String>) -> Self {
        self.args.push(Argument::Variable(name.into()));
        self
    }

    /// Append a wildcard argument
    pub fn wildcard(mut self) -> Self {
        self.args.push(Argument::UnnamedVariable);
        self
    }

    /// Append a type-finalized integer constant
    pub fn int(mut self, value: i64) -> Self {
        self.args.push(Argument::int(value));
        self
    }

    /// Append a string constant
    pub fn string(mut self, text: impl Into<String>) -> Self {
        self.args.push(Argument::StringConstant(text.into()));
        self
    }

    /// Append an arbitrary argument
    pub fn arg(mut self, arg: Argument) -> Self {
        self.args.push(arg);
        self
    }

    pub fn build(self) -> Atom {
        Atom { relation: self.relation, args: self.args }
    }
}

// ============================================================================
// ClauseBuilder
// ============================================================================

/// Builder for constructing [`Clause`] instances
#[derive(Debug, Clone)]
pub struct ClauseBuilder {
    head: Atom,
    body: Vec<Literal>,
    plan: Option<ExecutionPlan>,
    src_loc: String,
}

impl ClauseBuilder {
    pub fn new(head_relation: impl Into<String>) -> Self {
        ClauseBuilder {
            head: Atom { relation: head_relation.into(), args: Vec::new() },
            body: Vec::new(),
            plan: None,
            src_loc: String::new(),
        }
    }

    /// Set the head arguments to the given variables
    pub fn head_vars<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.head.args = names.into_iter().map(|n| Argument::Variable(n.into())).collect();
        self
    }

    /// Set the head arguments
    pub fn head_args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = Argument>,
    {
        self.head.args = args.into_iter().collect();
        self
    }

    /// Append a positive body atom over the given variables
    pub fn body_atom<I, S>(mut self, relation: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.body.push(Literal::Atom(Atom {
            relation: relation.into(),
            args: names.into_iter().map(|n| Argument::Variable(n.into())).collect(),
        }));
        self
    }

    /// Append a positive body atom with explicit arguments
    pub fn body_atom_args<I>(mut self, relation: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = Argument>,
    {
        self.body.push(Literal::Atom(Atom {
            relation: relation.into(),
            args: args.into_iter().collect(),
        }));
        self
    }

    /// Append a negated body atom over the given variables
    pub fn negated_atom<I, S>(mut self, relation: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.body.push(Literal::Negation(Atom {
            relation: relation.into(),
            args: names.into_iter().map(|n| Argument::Variable(n.into())).collect(),
        }));
        self
    }

    /// Append a binary constraint; ordering comparisons default to the signed
    /// numeric kind
    pub fn constraint(mut self, op: ComparisonOp, lhs: Argument, rhs: Argument) -> Self {
        let ty = match op {
            ComparisonOp::Eq | ComparisonOp::Ne => None,
            _ => Some(NumericType::Int),
        };
        self.body.push(Literal::Constraint(Constraint { op, ty, lhs, rhs }));
        self
    }

    /// Attach an execution order for one clause version (1-based positions)
    pub fn plan_order(mut self, version: usize, order: Vec<usize>) -> Self {
        self.plan.get_or_insert_with(ExecutionPlan::default).orders.insert(version, order);
        self
    }

    /// Attach a printable source location
    pub fn at(mut self, src_loc: impl Into<String>) -> Self {
        self.src_loc = src_loc.into();
        self
    }

    pub fn build(self) -> Clause {
        Clause { head: self.head, body: self.body, plan: self.plan, src_loc: self.src_loc }
    }
}

// ============================================================================
// RelationBuilder
// ============================================================================

/// Builder for constructing [`Relation`] declarations
#[derive(Debug, Clone)]
pub struct RelationBuilder {
    relation: Relation,
}

impl RelationBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        RelationBuilder {
            relation: Relation {
                name: name.into(),
                attributes: Vec::new(),
                representation: Representation::Default,
                directives: Vec::new(),
                size_limit: None,
            },
        }
    }

    /// Append an attribute
    pub fn attr(mut self, name: impl Into<String>, type_qualifier: impl Into<String>) -> Self {
        self.relation
            .attributes
            .push(super::Attribute { name: name.into(), type_qualifier: type_qualifier.into() });
        self
    }

    /// Append signed-number attributes with the given names
    pub fn number_attrs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self = self.attr(name, "i:number");
        }
        self
    }

    pub fn representation(mut self, representation: Representation) -> Self {
        self.relation.representation = representation;
        self
    }

    /// Attach a file-load directive
    pub fn input(self) -> Self {
        self.input_params(std::iter::empty::<(&str, &str)>())
    }

    /// Attach a load directive with explicit parameters
    pub fn input_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.relation.directives.push(Directive {
            kind: DirectiveKind::Input,
            params: Self::with_io_defaults(&self.relation.name, "file", params),
        });
        self
    }

    /// Attach a file-store directive
    pub fn output(self) -> Self {
        self.output_params(std::iter::empty::<(&str, &str)>())
    }

    /// Attach a store directive with explicit parameters
    pub fn output_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.relation.directives.push(Directive {
            kind: DirectiveKind::Output,
            params: Self::with_io_defaults(&self.relation.name, "file", params),
        });
        self
    }

    /// Cap the relation at `limit` tuples; recursive strata exit once reached
    pub fn size_limit(mut self, limit: usize) -> Self {
        self.relation.size_limit = Some(limit);
        self
    }

    pub fn build(self) -> Relation {
        self.relation
    }

    fn with_io_defaults<I, K, V>(name: &str, io: &str, params: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map: BTreeMap<String, String> =
            params.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        map.entry("IO".to_string()).or_insert_with(|| io.to_string());
        map.entry("name".to_string()).or_insert_with(|| name.to_string());
        map
    }
}

// ============================================================================
// ProgramBuilder
// ============================================================================

/// Builder for assembling a [`Program`]
#[derive(Debug, Clone, Default)]
pub struct ProgramBuilder {
    program: Program,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.program.relations.push(relation);
        self
    }

    pub fn clause(mut self, clause: Clause) -> Self {
        self.program.clauses.push(clause);
        self
    }

    pub fn build(self) -> Program {
        self.program
    }
}
