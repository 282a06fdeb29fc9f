//! # AST to IR Lowering
//!
//! Consumes a typed Datalog program plus its analyses and emits the
//! imperative relational-algebra program that computes the minimal model by
//! stratified semi-naïve evaluation.
//!
//! ```text
//! AST (Program) + Analyses (SCC graph, sum types, functors)
//!     ↓
//! [Preprocess]        → type-finalization check, sum-type desugaring
//!     ↓
//! [Stratum driver]    → one subroutine per SCC, main call sequence
//!     ↓
//! [Clause translator] → scan/filter/project nests per clause
//!     ↓
//! IR Program + SymbolTable + DebugReport
//! ```
//!
//! Non-recursive strata run each clause once. Recursive strata evaluate a
//! fixpoint over the relation triad `R` / `@delta_R` / `@new_R`: the preamble
//! seeds the deltas from the non-recursive rules, the loop body derives into
//! `@new` with one clause version per in-SCC body atom, the exit fires when
//! every `@new` is empty, and the update sequence merges, swaps and clears.

mod clause;
mod desugar;

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::analysis::{Analyses, Scc};
use crate::ast::{self, unescape, Argument, Clause, ComparisonOp, Literal, Program};
use crate::config::LoweringOptions;
use crate::error::{LowerError, LowerResult};
use crate::ir::{self, Condition, ConstraintOp, Expression, Operation, Statement};
use crate::report::DebugReport;
use crate::symbols::SymbolTable;

use clause::ClauseTranslator;
use desugar::desugar_adts;

/// Name of the delta relation (tuples added in the previous fixpoint step).
pub fn delta_relation_name(name: &str) -> String {
    format!("@delta_{name}")
}

/// Name of the new relation (tuples produced in the current fixpoint step).
pub fn new_relation_name(name: &str) -> String {
    format!("@new_{name}")
}

/// Name of the subroutine generated for stratum `index`.
pub fn stratum_name(index: usize) -> String {
    format!("stratum_{index}")
}

/// Everything one translation produces: the program, the symbol table the
/// back-end keeps interning into, and the diagnostic report.
#[derive(Debug)]
pub struct LoweredUnit {
    pub program: ir::Program,
    pub symbols: SymbolTable,
    pub report: DebugReport,
}

/// The lowering pass. Holds only its options; each [`Translator::translate`]
/// call produces a fresh unit.
pub struct Translator {
    options: LoweringOptions,
}

impl Translator {
    pub fn new(options: LoweringOptions) -> Self {
        Translator { options }
    }

    /// Lower `program` against its `analyses`.
    pub fn translate(&self, mut program: Program, analyses: &Analyses) -> LowerResult<LoweredUnit> {
        let symbols = SymbolTable::new();

        verify_types_finalized(&program)?;
        desugar_adts(&mut program, &analyses.sum_types)?;

        debug!(
            strata = analyses.sccs.len(),
            clauses = program.clauses.len(),
            "lowering program"
        );

        let ctx = Context {
            program: &program,
            analyses,
            symbols: &symbols,
            options: &self.options,
        };
        let (subroutines, main) = ctx.generate_program()?;
        let relations = ctx.create_relations()?;
        let ir_program = ir::Program { relations, main, subroutines };

        let mut report = DebugReport::new();
        if self.options.debug_report {
            report.add_section("ir-program", "IR Program", ir_program.pretty_print());
            if let Ok(json) = serde_json::to_string_pretty(&ir_program.relations) {
                report.add_section("ir-relations", "IR Relations", json);
            }
        }

        Ok(LoweredUnit { program: ir_program, symbols, report })
    }
}

struct Context<'a> {
    program: &'a Program,
    analyses: &'a Analyses,
    symbols: &'a SymbolTable,
    options: &'a LoweringOptions,
}

impl<'a> Context<'a> {
    fn relation(&self, name: &str) -> LowerResult<&'a ast::Relation> {
        self.program.relation(name).ok_or_else(|| LowerError::UnknownRelation(name.to_string()))
    }

    fn lower_clause(&self, clause: &Clause, version: usize) -> LowerResult<Statement> {
        ClauseTranslator::new(self.symbols, &self.analyses.functors)
            .translate_clause(clause, version)
    }

    /// Subroutines in topological order plus the main call sequence.
    fn generate_program(&self) -> LowerResult<(BTreeMap<String, Statement>, Statement)> {
        let mut subroutines = BTreeMap::new();
        if self.analyses.sccs.is_empty() {
            return Ok((subroutines, Statement::Sequence(vec![])));
        }

        for (index, scc) in self.analyses.sccs.iter().enumerate() {
            debug!(
                stratum = index,
                relations = ?scc.relations,
                recursive = scc.recursive,
                "lowering stratum"
            );
            let stratum = Statement::Sequence(vec![
                self.generate_stratum(scc)?,
                self.generate_clear_expired(scc),
            ]);
            subroutines.insert(stratum_name(index), stratum);
        }

        let calls: Vec<Statement> =
            (0..self.analyses.sccs.len()).map(|i| Statement::Call(stratum_name(i))).collect();
        let main = if self.options.profile {
            Statement::LogTimer {
                stmt: Box::new(Statement::Sequence(calls)),
                message: profile::runtime(),
            }
        } else {
            Statement::Sequence(calls)
        };
        Ok((subroutines, main))
    }

    /// Load, compute, store for one stratum.
    fn generate_stratum(&self, scc: &Scc) -> LowerResult<Statement> {
        let mut current = Vec::new();
        for name in &scc.input_relations {
            current.push(self.generate_load(self.relation(name)?));
        }

        if scc.recursive {
            current.push(self.generate_recursive_stratum(scc)?);
        } else {
            if scc.relations.len() != 1 {
                return Err(LowerError::InvariantViolation(format!(
                    "non-recursive stratum must hold exactly one relation, got {:?}",
                    scc.relations
                )));
            }
            current.push(self.generate_non_recursive(&scc.relations[0], scc)?);
        }

        for name in &scc.output_relations {
            current.push(self.generate_store(self.relation(name)?));
        }
        Ok(Statement::Sequence(current))
    }

    fn generate_load(&self, relation: &ast::Relation) -> Statement {
        let mut loads = Vec::new();
        for directive in relation.load_directives() {
            let directives =
                directive.params.iter().map(|(k, v)| (k.clone(), unescape(v))).collect();
            let mut stmt = Statement::Io { relation: relation.name.clone(), directives };
            if self.options.profile {
                stmt = Statement::LogRelationTimer {
                    stmt: Box::new(stmt),
                    message: profile::relation_load_time(&relation.name),
                    relation: relation.name.clone(),
                };
            }
            loads.push(stmt);
        }
        Statement::Sequence(loads)
    }

    fn generate_store(&self, relation: &ast::Relation) -> Statement {
        let mut stores = Vec::new();
        for directive in relation.store_directives() {
            let directives =
                directive.params.iter().map(|(k, v)| (k.clone(), unescape(v))).collect();
            let mut stmt = Statement::Io { relation: relation.name.clone(), directives };
            if self.options.profile {
                stmt = Statement::LogRelationTimer {
                    stmt: Box::new(stmt),
                    message: profile::relation_save_time(&relation.name),
                    relation: relation.name.clone(),
                };
            }
            stores.push(stmt);
        }
        Statement::Sequence(stores)
    }

    /// Run every non-recursive clause of `name` once, in declaration order.
    fn generate_non_recursive(&self, name: &str, scc: &Scc) -> LowerResult<Statement> {
        let mut result = Vec::new();
        for cl in self.program.clauses_for(name) {
            if is_recursive_clause(cl, scc) {
                continue;
            }

            let mut rule = self.lower_clause(cl, 0)?;
            if self.options.profile {
                rule = Statement::LogRelationTimer {
                    stmt: Box::new(rule),
                    message: profile::nonrecursive_rule(name, &cl.src_loc, &cl.to_string()),
                    relation: name.to_string(),
                };
            }
            rule = Statement::DebugInfo {
                stmt: Box::new(rule),
                text: format!("{cl}\nin file {}", cl.src_loc),
            };
            result.push(rule);
        }

        if self.options.profile {
            if result.is_empty() {
                result.push(Statement::LogSize {
                    relation: name.to_string(),
                    message: profile::nonrecursive_relation_size(name),
                });
            } else {
                let timed = Statement::LogRelationTimer {
                    stmt: Box::new(Statement::Sequence(result)),
                    message: profile::nonrecursive_relation_time(name),
                    relation: name.to_string(),
                };
                result = vec![timed];
            }
        }
        Ok(Statement::Sequence(result))
    }

    /// `dest <- dest ∪ src`. Propositions merge through a conditional
    /// projection; equivalence relations extend their closure first.
    fn generate_merge(&self, relation: &ast::Relation, dest: &str, src: &str) -> Statement {
        if relation.arity() == 0 {
            return Statement::Query(Operation::Filter {
                condition: Condition::EmptinessCheck(src.to_string()).negate(),
                inner: Box::new(Operation::Project {
                    relation: dest.to_string(),
                    values: vec![],
                }),
            });
        }

        let values =
            (0..relation.arity()).map(|pos| Expression::TupleElement { level: 0, pos }).collect();
        let stmt = Statement::Query(Operation::Scan {
            relation: src.to_string(),
            level: 0,
            inner: Box::new(Operation::Project { relation: dest.to_string(), values }),
        });
        if relation.representation == ast::Representation::Eqrel {
            return Statement::Sequence(vec![
                Statement::Extend(dest.to_string(), src.to_string()),
                stmt,
            ]);
        }
        stmt
    }

    /// Clause variant for one fixpoint version: the head writes to `@new`,
    /// the driver atom reads `@delta`, later in-SCC atoms are negated as
    /// deltas, and the head is negated for subsumption.
    fn create_delta_clause(&self, original: &Clause, delta_idx: usize, scc: &Scc) -> Clause {
        let mut version = original.clone();

        // @new :- ...
        version.head.relation = new_relation_name(&original.head.relation);

        // ... :- ..., @delta, ...
        let mut positive = 0;
        for literal in &mut version.body {
            if let Literal::Atom(atom) = literal {
                if positive == delta_idx {
                    atom.relation = delta_relation_name(&atom.relation);
                }
                positive += 1;
            }
        }

        // ... :- ..., !head.
        if original.head.arity() > 0 {
            version.body.push(Literal::Negation(original.head.clone()));
        }

        // Replace wildcards with variables to reduce indices.
        version.name_unnamed_variables();

        // Negated deltas of later in-SCC atoms keep each tuple from being
        // derived by several versions in the same iteration.
        let later: Vec<ast::Atom> = version
            .positive_atoms()
            .iter()
            .enumerate()
            .filter(|(i, atom)| {
                *i > delta_idx && scc.relations.iter().any(|r| r == &atom.relation)
            })
            .map(|(_, atom)| (*atom).clone())
            .collect();
        for mut atom in later {
            atom.relation = delta_relation_name(&atom.relation);
            version.body.push(Literal::Negation(atom));
        }

        version
    }

    fn generate_clause_version(
        &self,
        scc: &Scc,
        clause: &Clause,
        delta_idx: usize,
        version: usize,
    ) -> LowerResult<Statement> {
        let delta_clause = self.create_delta_clause(clause, delta_idx, scc);
        let mut rule = self.lower_clause(&delta_clause, version)?;

        if self.options.profile {
            rule = Statement::LogRelationTimer {
                stmt: Box::new(rule),
                message: profile::recursive_rule(
                    &clause.head.relation,
                    version,
                    &clause.src_loc,
                    &clause.to_string(),
                ),
                relation: new_relation_name(&clause.head.relation),
            };
        }
        rule = Statement::DebugInfo {
            stmt: Box::new(rule),
            text: format!("{clause}\nin file {}", clause.src_loc),
        };
        Ok(rule)
    }

    /// All versions of all recursive clauses of one relation.
    fn translate_recursive_clauses(&self, scc: &Scc, name: &str) -> LowerResult<Statement> {
        let mut result = Vec::new();
        for cl in self.program.clauses_for(name) {
            if !is_recursive_clause(cl, scc) {
                continue;
            }

            // One version per body atom within the component, numbered by the
            // driver atom's position.
            let mut version = 0;
            let atoms = cl.positive_atoms();
            for (i, atom) in atoms.iter().enumerate() {
                if !scc.relations.iter().any(|r| r == &atom.relation) {
                    continue;
                }
                result.push(self.generate_clause_version(scc, cl, i, version)?);
                version += 1;
            }

            if let Some(max) = cl.plan.as_ref().and_then(ast::ExecutionPlan::max_version) {
                if max >= version {
                    return Err(LowerError::InvariantViolation(format!(
                        "execution plan names version {max} but only {version} versions exist for {cl}"
                    )));
                }
            }
        }
        Ok(Statement::Sequence(result))
    }

    /// Non-recursive rules into the main relations, then seed the deltas.
    fn generate_stratum_preamble(&self, scc: &Scc) -> LowerResult<Statement> {
        let mut preamble = Vec::new();
        for name in &scc.relations {
            preamble.push(self.generate_non_recursive(name, scc)?);
            preamble.push(self.generate_merge(
                self.relation(name)?,
                &delta_relation_name(name),
                name,
            ));
        }
        Ok(Statement::Sequence(preamble))
    }

    fn generate_stratum_loop_body(&self, scc: &Scc) -> LowerResult<Statement> {
        let mut body = Vec::new();
        for name in &scc.relations {
            let mut clauses = self.translate_recursive_clauses(scc, name)?;
            if self.options.profile {
                clauses = Statement::LogRelationTimer {
                    stmt: Box::new(clauses),
                    message: profile::recursive_relation(name),
                    relation: new_relation_name(name),
                };
            }
            body.push(clauses);
        }
        Ok(Statement::Parallel(body))
    }

    fn generate_stratum_exit_sequence(&self, scc: &Scc) -> LowerResult<Statement> {
        let mut exits = Vec::new();

        // (1) all @new relations of the component are empty
        let emptiness = Condition::conjoin(
            scc.relations.iter().map(|name| Condition::EmptinessCheck(new_relation_name(name))),
        );
        exits.push(Statement::Exit(emptiness));

        // (2) a size-limited relation reached its cap
        for name in &scc.relations {
            if let Some(limit) = self.relation(name)?.size_limit {
                exits.push(Statement::Exit(Condition::Constraint {
                    op: ConstraintOp::Ge,
                    lhs: Expression::RelationSize(name.clone()),
                    rhs: Expression::SignedConstant(limit as i64),
                }));
            }
        }
        Ok(Statement::Sequence(exits))
    }

    fn generate_stratum_table_updates(&self, scc: &Scc) -> LowerResult<Statement> {
        let mut updates = Vec::new();
        for name in &scc.relations {
            let new_name = new_relation_name(name);
            let update = Statement::Sequence(vec![
                self.generate_merge(self.relation(name)?, name, &new_name),
                Statement::Swap(delta_relation_name(name), new_name.clone()),
                Statement::Clear(new_name.clone()),
            ]);
            let update = if self.options.profile {
                Statement::LogRelationTimer {
                    stmt: Box::new(update),
                    message: profile::recursive_relation_update(name),
                    relation: new_name,
                }
            } else {
                update
            };
            updates.push(update);
        }
        Ok(Statement::Sequence(updates))
    }

    fn generate_stratum_postamble(&self, scc: &Scc) -> Statement {
        let mut postamble = Vec::new();
        for name in &scc.relations {
            postamble.push(Statement::Clear(delta_relation_name(name)));
            postamble.push(Statement::Clear(new_relation_name(name)));
        }
        Statement::Sequence(postamble)
    }

    /// The full fixpoint for one recursive component.
    fn generate_recursive_stratum(&self, scc: &Scc) -> LowerResult<Statement> {
        if scc.relations.is_empty() {
            return Err(LowerError::InvariantViolation("stratum without relations".to_string()));
        }
        let fixpoint = Statement::Loop(Box::new(Statement::Sequence(vec![
            self.generate_stratum_loop_body(scc)?,
            self.generate_stratum_exit_sequence(scc)?,
            self.generate_stratum_table_updates(scc)?,
        ])));
        Ok(Statement::Sequence(vec![
            self.generate_stratum_preamble(scc)?,
            fixpoint,
            self.generate_stratum_postamble(scc),
        ]))
    }

    fn generate_clear_expired(&self, scc: &Scc) -> Statement {
        Statement::Sequence(scc.expired.iter().map(|name| Statement::Clear(name.clone())).collect())
    }

    /// The relation registry: every member of every stratum, with `@delta`
    /// and `@new` companions for recursive components. Each name appears in
    /// exactly one schema.
    fn create_relations(&self) -> LowerResult<Vec<ir::Relation>> {
        let mut names = BTreeSet::new();
        let mut relations = Vec::new();
        for scc in self.analyses.sccs.iter() {
            for name in &scc.relations {
                let decl = self.relation(name)?;
                let mut ram_names = vec![name.clone()];
                if scc.recursive {
                    ram_names.push(delta_relation_name(name));
                    ram_names.push(new_relation_name(name));
                }
                for ram_name in ram_names {
                    if !names.insert(ram_name.clone()) {
                        return Err(LowerError::InvariantViolation(format!(
                            "relation '{ram_name}' registered twice"
                        )));
                    }
                    relations.push(ir::Relation {
                        name: ram_name,
                        arity: decl.arity(),
                        attribute_names: decl.attributes.iter().map(|a| a.name.clone()).collect(),
                        attribute_types: decl
                            .attributes
                            .iter()
                            .map(|a| a.type_qualifier.clone())
                            .collect(),
                        representation: decl.representation,
                    });
                }
            }
        }
        Ok(relations)
    }
}

fn is_recursive_clause(clause: &Clause, scc: &Scc) -> bool {
    clause
        .positive_atoms()
        .iter()
        .any(|atom| scc.relations.iter().any(|r| r == &atom.relation))
}

/// Check that the upstream type analysis resolved every polymorphic node:
/// numeric constants, intrinsic opcodes and ordering-comparison kinds.
fn verify_types_finalized(program: &Program) -> LowerResult<()> {
    for clause in &program.clauses {
        verify_atom(&clause.head, clause)?;
        for literal in &clause.body {
            match literal {
                Literal::Atom(atom) | Literal::Negation(atom) => verify_atom(atom, clause)?,
                Literal::Constraint(constraint) => {
                    if !matches!(constraint.op, ComparisonOp::Eq | ComparisonOp::Ne)
                        && constraint.ty.is_none()
                    {
                        return Err(LowerError::InvariantViolation(format!(
                            "comparison '{}' without resolved numeric kind in {clause}",
                            constraint.op.as_str()
                        )));
                    }
                    verify_argument(&constraint.lhs, clause)?;
                    verify_argument(&constraint.rhs, clause)?;
                }
            }
        }
    }
    Ok(())
}

fn verify_atom(atom: &ast::Atom, clause: &Clause) -> LowerResult<()> {
    for arg in &atom.args {
        verify_argument(arg, clause)?;
    }
    Ok(())
}

fn verify_argument(arg: &Argument, clause: &Clause) -> LowerResult<()> {
    match arg {
        Argument::NumericConstant { raw, ty: None } => Err(LowerError::InvariantViolation(
            format!("numeric constant '{raw}' without inferred type in {clause}"),
        )),
        Argument::Intrinsic { name, op: None, .. } => Err(LowerError::InvariantViolation(
            format!("intrinsic functor '{name}' without resolved opcode in {clause}"),
        )),
        Argument::Intrinsic { args, .. } | Argument::UserFunctor { args, .. } => {
            for inner in args {
                verify_argument(inner, clause)?;
            }
            Ok(())
        }
        Argument::Record(args) | Argument::Branch { args, .. } => {
            for inner in args {
                verify_argument(inner, clause)?;
            }
            Ok(())
        }
        Argument::TypeCast { value, .. } => verify_argument(value, clause),
        Argument::Aggregator(agg) => {
            if let Some(target) = &agg.target {
                verify_argument(target, clause)?;
            }
            verify_atom(&agg.body, clause)
        }
        _ => Ok(()),
    }
}

/// Profile log message shapes consumed by the profiler downstream.
mod profile {
    fn stringify(text: &str) -> String {
        text.replace('\n', "\\n").replace('"', "'")
    }

    pub(super) fn runtime() -> String {
        "@runtime;".to_string()
    }

    pub(super) fn nonrecursive_rule(relation: &str, loc: &str, clause: &str) -> String {
        format!("@t-nonrecursive-rule;{relation};{loc};{};", stringify(clause))
    }

    pub(super) fn nonrecursive_relation_time(relation: &str) -> String {
        format!("@t-nonrecursive-relation;{relation};")
    }

    pub(super) fn nonrecursive_relation_size(relation: &str) -> String {
        format!("@n-nonrecursive-relation;{relation};")
    }

    pub(super) fn recursive_rule(relation: &str, version: usize, loc: &str, clause: &str) -> String {
        format!("@t-recursive-rule;{relation};{version};{loc};{};", stringify(clause))
    }

    pub(super) fn recursive_relation(relation: &str) -> String {
        format!("@t-recursive-relation;{relation};")
    }

    pub(super) fn recursive_relation_update(relation: &str) -> String {
        format!("@c-recursive-relation;{relation};")
    }

    pub(super) fn relation_load_time(relation: &str) -> String {
        format!("@t-relation-load-time;{relation};")
    }

    pub(super) fn relation_save_time(relation: &str) -> String {
        format!("@t-relation-save-time;{relation};")
    }
}
