//! Program analyses consumed by the lowering pass.
//!
//! The lowering driver does not inspect the AST globally; it reads the
//! results collected here. [`SccGraph::analyse`] computes the dependency
//! condensation with Tarjan's algorithm, delivering strongly-connected
//! components in topological (evaluation) order together with recursion
//! flags, IO membership and relation expiry. [`SumTypeBranches`] and
//! [`FunctorRegistry`] are filled by upstream type analysis; tests and
//! drivers populate them directly.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::ast::{Argument, Clause, IntrinsicOp, Literal, Program};
use crate::ir::TypeAttribute;

// ============================================================================
// SCC graph
// ============================================================================

/// One strongly-connected component of the relation dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scc {
    /// Member relation names, sorted
    pub relations: Vec<String>,
    /// Whether the component must be evaluated as a fixpoint
    pub recursive: bool,
    /// Members carrying load directives
    pub input_relations: Vec<String>,
    /// Members carrying store directives
    pub output_relations: Vec<String>,
    /// Relations whose last use is this stratum; cleared at its end
    pub expired: Vec<String>,
}

/// The dependency condensation of a program, in topological order: every
/// component appears after the components it reads from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SccGraph {
    pub sccs: Vec<Scc>,
}

impl SccGraph {
    pub fn len(&self) -> usize {
        self.sccs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sccs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scc> {
        self.sccs.iter()
    }

    /// Index of the stratum a relation belongs to.
    pub fn stratum_of(&self, relation: &str) -> Option<usize> {
        self.sccs.iter().position(|scc| scc.relations.iter().any(|r| r == relation))
    }

    /// Compute the SCC graph of `program`.
    pub fn analyse(program: &Program) -> Self {
        let dependencies = dependency_graph(program);
        let components = tarjan(&dependencies);

        // Self-recursion makes a singleton component a fixpoint too.
        let mut sccs: Vec<Scc> = components
            .into_iter()
            .map(|members| {
                let recursive = members.len() > 1
                    || members.iter().any(|r| {
                        dependencies.get(r).map(|deps| deps.contains(r)).unwrap_or(false)
                    });
                let input_relations = members
                    .iter()
                    .filter(|r| program.relation(r).is_some_and(|rel| rel.is_input()))
                    .cloned()
                    .collect();
                let output_relations = members
                    .iter()
                    .filter(|r| program.relation(r).is_some_and(|rel| rel.is_output()))
                    .cloned()
                    .collect();
                Scc {
                    relations: members,
                    recursive,
                    input_relations,
                    output_relations,
                    expired: Vec::new(),
                }
            })
            .collect();

        // A relation expires in the last stratum that materializes or reads
        // it, unless it is an output of the program.
        let mut last_use: BTreeMap<&str, usize> = BTreeMap::new();
        for (index, scc) in sccs.iter().enumerate() {
            for relation in &scc.relations {
                last_use.insert(relation.as_str(), index);
                for clause in program.clauses_for(relation) {
                    for body in clause_body_relations(clause) {
                        last_use.insert(body, index);
                    }
                }
            }
        }
        let mut expired: Vec<Vec<String>> = vec![Vec::new(); sccs.len()];
        for (relation, stratum) in last_use {
            if !program.relation(relation).is_some_and(|rel| rel.is_output()) {
                expired[stratum].push(relation.to_string());
            }
        }
        for (scc, exp) in sccs.iter_mut().zip(expired) {
            scc.expired = exp;
        }

        SccGraph { sccs }
    }
}

/// Relation names appearing in the clause body: positive and negated atoms,
/// plus aggregate bodies nested in argument position.
fn clause_body_relations(clause: &Clause) -> BTreeSet<&str> {
    let mut relations = BTreeSet::new();
    for arg in &clause.head.args {
        collect_aggregate_relations(arg, &mut relations);
    }
    for literal in &clause.body {
        match literal {
            Literal::Atom(atom) | Literal::Negation(atom) => {
                relations.insert(atom.relation.as_str());
                for arg in &atom.args {
                    collect_aggregate_relations(arg, &mut relations);
                }
            }
            Literal::Constraint(constraint) => {
                collect_aggregate_relations(&constraint.lhs, &mut relations);
                collect_aggregate_relations(&constraint.rhs, &mut relations);
            }
        }
    }
    relations
}

fn collect_aggregate_relations<'a>(arg: &'a Argument, relations: &mut BTreeSet<&'a str>) {
    match arg {
        Argument::Aggregator(agg) => {
            relations.insert(agg.body.relation.as_str());
            if let Some(target) = &agg.target {
                collect_aggregate_relations(target, relations);
            }
            for inner in &agg.body.args {
                collect_aggregate_relations(inner, relations);
            }
        }
        Argument::TypeCast { value, .. } => collect_aggregate_relations(value, relations),
        Argument::Record(args)
        | Argument::Branch { args, .. }
        | Argument::Intrinsic { args, .. }
        | Argument::UserFunctor { args, .. } => {
            for inner in args {
                collect_aggregate_relations(inner, relations);
            }
        }
        _ => {}
    }
}

/// Map each relation to the relations its clauses read.
fn dependency_graph(program: &Program) -> BTreeMap<String, BTreeSet<String>> {
    let mut graph: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for relation in &program.relations {
        graph.entry(relation.name.clone()).or_default();
    }
    for clause in &program.clauses {
        let deps = graph.entry(clause.head.relation.clone()).or_default();
        let bodies: Vec<String> =
            clause_body_relations(clause).into_iter().map(str::to_string).collect();
        deps.extend(bodies.iter().cloned());
        for body in bodies {
            graph.entry(body).or_default();
        }
    }
    graph
}

/// Tarjan's strongly-connected components. With edges pointing from a head to
/// its dependencies, components pop dependencies-first, which is exactly the
/// evaluation order.
fn tarjan(graph: &BTreeMap<String, BTreeSet<String>>) -> Vec<Vec<String>> {
    struct State<'a> {
        graph: &'a BTreeMap<String, BTreeSet<String>>,
        index: HashMap<&'a str, usize>,
        lowlink: HashMap<&'a str, usize>,
        on_stack: BTreeSet<&'a str>,
        stack: Vec<&'a str>,
        counter: usize,
        components: Vec<Vec<String>>,
    }

    fn connect<'a>(state: &mut State<'a>, node: &'a str) {
        state.index.insert(node, state.counter);
        state.lowlink.insert(node, state.counter);
        state.counter += 1;
        state.stack.push(node);
        state.on_stack.insert(node);

        if let Some(successors) = state.graph.get(node) {
            for succ in successors {
                let succ = succ.as_str();
                if !state.index.contains_key(succ) {
                    connect(state, succ);
                    let low = state.lowlink[succ].min(state.lowlink[node]);
                    state.lowlink.insert(node, low);
                } else if state.on_stack.contains(succ) {
                    let low = state.index[succ].min(state.lowlink[node]);
                    state.lowlink.insert(node, low);
                }
            }
        }

        if state.lowlink[node] == state.index[node] {
            let mut members = Vec::new();
            while let Some(top) = state.stack.pop() {
                state.on_stack.remove(top);
                members.push(top.to_string());
                if top == node {
                    break;
                }
            }
            members.sort();
            state.components.push(members);
        }
    }

    let mut state = State {
        graph,
        index: HashMap::new(),
        lowlink: HashMap::new(),
        on_stack: BTreeSet::new(),
        stack: Vec::new(),
        counter: 0,
        components: Vec::new(),
    };
    for node in graph.keys() {
        if !state.index.contains_key(node.as_str()) {
            connect(&mut state, node.as_str());
        }
    }
    state.components
}

// ============================================================================
// Sum-type branches
// ============================================================================

/// A branch of an algebraic data type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub name: String,
    pub arity: usize,
}

/// An algebraic data type with its branches in lexicographic order; a branch
/// id is the branch's position in that order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdtType {
    pub name: String,
    pub branches: Vec<Branch>,
}

impl AdtType {
    /// A pure enumeration: every branch is nullary.
    pub fn is_enum(&self) -> bool {
        self.branches.iter().all(|b| b.arity == 0)
    }

    pub fn branch_id(&self, constructor: &str) -> Option<usize> {
        self.branches.iter().position(|b| b.name == constructor)
    }
}

/// Resolves a branch constructor to its parent ADT and branch list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SumTypeBranches {
    types: BTreeMap<String, AdtType>,
    constructor_types: BTreeMap<String, String>,
}

impl SumTypeBranches {
    /// Register an ADT. Branches are sorted lexicographically by name, which
    /// fixes their ids.
    pub fn register_type(&mut self, name: impl Into<String>, mut branches: Vec<Branch>) {
        let name = name.into();
        branches.sort_by(|a, b| a.name.cmp(&b.name));
        for branch in &branches {
            self.constructor_types.insert(branch.name.clone(), name.clone());
        }
        self.types.insert(name.clone(), AdtType { name, branches });
    }

    /// The type a constructor belongs to.
    pub fn type_of(&self, constructor: &str) -> Option<&AdtType> {
        self.types.get(self.constructor_types.get(constructor)?)
    }
}

// ============================================================================
// Functors
// ============================================================================

/// Resolved signature of a user-defined functor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserFunctorSignature {
    pub arg_types: Vec<TypeAttribute>,
    pub return_type: TypeAttribute,
    pub stateful: bool,
}

/// Registry of user-defined functor signatures plus the multi-result
/// predicate for intrinsics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctorRegistry {
    user: BTreeMap<String, UserFunctorSignature>,
}

impl FunctorRegistry {
    pub fn register(&mut self, name: impl Into<String>, signature: UserFunctorSignature) {
        self.user.insert(name.into(), signature);
    }

    pub fn signature(&self, name: &str) -> Option<&UserFunctorSignature> {
        self.user.get(name)
    }

    /// Whether an intrinsic produces several values per application and binds
    /// through the value index. Every operator in the current set is
    /// single-valued.
    pub fn is_multi_result(_op: IntrinsicOp) -> bool {
        false
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// The analysis results the translator consumes. All read-only.
#[derive(Debug, Clone, Default)]
pub struct Analyses {
    pub sccs: SccGraph,
    pub sum_types: SumTypeBranches,
    pub functors: FunctorRegistry,
}

impl Analyses {
    /// Analyse `program` with empty type/functor environments.
    pub fn analyse(program: &Program) -> Self {
        Analyses { sccs: SccGraph::analyse(program), ..Default::default() }
    }

    pub fn with_sum_types(mut self, sum_types: SumTypeBranches) -> Self {
        self.sum_types = sum_types;
        self
    }

    pub fn with_functors(mut self, functors: FunctorRegistry) -> Self {
        self.functors = functors;
        self
    }
}
