//! Clause translation.
//!
//! Turns one clause into a relational query: a nested scan per positive body
//! atom (following the clause's execution order when it has one), filters for
//! constants, repeated variables, negations and constraints, and a projection
//! of the head. Argument terms map to IR expressions through the value index,
//! which records where each variable is first bound and at which levels
//! generator results (aggregates, multi-result functors) live.

use std::collections::{BTreeMap, HashMap};

use crate::analysis::FunctorRegistry;
use crate::ast::{
    AggregateOp, Aggregator, Argument, Atom, Clause, ComparisonOp, Literal, NumericType,
};
use crate::error::{LowerError, LowerResult};
use crate::ir::{Condition, ConstraintOp, Expression, Operation, Statement};
use crate::symbols::SymbolTable;

/// Binding point of a value: element `pos` of the tuple bound at `level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Location {
    level: usize,
    pos: usize,
}

impl Location {
    fn element(self) -> Expression {
        Expression::TupleElement { level: self.level, pos: self.pos }
    }
}

/// Top-level argument position within a clause, the key for generator
/// bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ArgSlot {
    Head(usize),
    BodyAtom { literal: usize, pos: usize },
    ConstraintLhs(usize),
    ConstraintRhs(usize),
}

/// Where variables are defined and generators bound for one clause.
#[derive(Debug, Default)]
struct ValueIndex {
    definitions: BTreeMap<String, Location>,
    generators: HashMap<ArgSlot, usize>,
}

impl ValueIndex {
    fn definition(&self, var: &str) -> Option<Location> {
        self.definitions.get(var).copied()
    }

    /// Record a binding point. Returns the existing definition when the
    /// variable is already bound, in which case the caller emits an equality.
    fn define(&mut self, var: &str, loc: Location) -> Option<Location> {
        match self.definitions.get(var) {
            Some(existing) => Some(*existing),
            None => {
                self.definitions.insert(var.to_string(), loc);
                None
            }
        }
    }
}

struct AggregateSpec {
    op: AggregateOp,
    relation: String,
    level: usize,
    expr: Expression,
    condition: Condition,
}

/// Translates clauses against a symbol table and functor registry.
pub(crate) struct ClauseTranslator<'a> {
    symbols: &'a SymbolTable,
    functors: &'a FunctorRegistry,
}

impl<'a> ClauseTranslator<'a> {
    pub(crate) fn new(symbols: &'a SymbolTable, functors: &'a FunctorRegistry) -> Self {
        ClauseTranslator { symbols, functors }
    }

    /// Lower `clause` to a query statement. `version` selects the execution
    /// order when the clause carries a plan.
    pub(crate) fn translate_clause(
        &self,
        clause: &Clause,
        version: usize,
    ) -> LowerResult<Statement> {
        let scans = scan_order(clause, version)?;

        let mut index = ValueIndex::default();
        let mut conditions: Vec<Condition> = Vec::new();

        // First bind every variable at its earliest scan position; repeats
        // become equalities. Non-variable arguments wait until all bindings
        // exist.
        let mut deferred: Vec<(Location, usize, usize)> = Vec::new();
        for (level, &(literal, atom)) in scans.iter().enumerate() {
            for (pos, arg) in atom.args.iter().enumerate() {
                let here = Location { level, pos };
                match arg {
                    Argument::Variable(name) => {
                        if let Some(def) = index.define(name, here) {
                            conditions.push(Condition::Constraint {
                                op: ConstraintOp::Eq,
                                lhs: def.element(),
                                rhs: here.element(),
                            });
                        }
                    }
                    Argument::UnnamedVariable => {}
                    _ => deferred.push((here, literal, pos)),
                }
            }
        }

        // Assign generator levels above the scans, in slot order.
        let mut slots: Vec<(ArgSlot, &Argument)> = Vec::new();
        for (pos, arg) in clause.head.args.iter().enumerate() {
            slots.push((ArgSlot::Head(pos), arg));
        }
        for &(_, literal, pos) in &deferred {
            if let Literal::Atom(atom) = &clause.body[literal] {
                slots.push((ArgSlot::BodyAtom { literal, pos }, &atom.args[pos]));
            }
        }
        for (literal, body) in clause.body.iter().enumerate() {
            if let Literal::Constraint(constraint) = body {
                slots.push((ArgSlot::ConstraintLhs(literal), &constraint.lhs));
                slots.push((ArgSlot::ConstraintRhs(literal), &constraint.rhs));
            }
        }
        let mut generators: Vec<(&Aggregator, usize)> = Vec::new();
        let mut next_level = scans.len();
        for (slot, arg) in slots {
            if let Argument::Aggregator(agg) = arg {
                index.generators.insert(slot, next_level);
                generators.push((agg.as_ref(), next_level));
                next_level += 1;
            }
        }

        // Non-variable scan arguments pin their column to the translated value.
        for (here, literal, pos) in deferred {
            let Literal::Atom(atom) = &clause.body[literal] else {
                continue;
            };
            let slot = ArgSlot::BodyAtom { literal, pos };
            let value = self.value(clause, &index, None, Some(slot), &atom.args[pos])?;
            conditions.push(Condition::Constraint {
                op: ConstraintOp::Eq,
                lhs: here.element(),
                rhs: value,
            });
        }

        // Negations and binary constraints, in body order.
        for (literal, body) in clause.body.iter().enumerate() {
            match body {
                Literal::Negation(atom) => {
                    let values = atom
                        .args
                        .iter()
                        .map(|arg| self.check_value(clause, &index, arg))
                        .collect::<LowerResult<Vec<_>>>()?;
                    conditions.push(
                        Condition::ExistenceCheck { relation: atom.relation.clone(), values }
                            .negate(),
                    );
                }
                Literal::Constraint(constraint) => {
                    let op = resolve_comparison(constraint.op, constraint.ty, clause)?;
                    let lhs = self.value(
                        clause,
                        &index,
                        None,
                        Some(ArgSlot::ConstraintLhs(literal)),
                        &constraint.lhs,
                    )?;
                    let rhs = self.value(
                        clause,
                        &index,
                        None,
                        Some(ArgSlot::ConstraintRhs(literal)),
                        &constraint.rhs,
                    )?;
                    conditions.push(Condition::Constraint { op, lhs, rhs });
                }
                Literal::Atom(_) => {}
            }
        }

        let aggregates = generators
            .into_iter()
            .map(|(agg, level)| self.aggregate_spec(clause, &index, agg, level))
            .collect::<LowerResult<Vec<_>>>()?;

        let head_values = clause
            .head
            .args
            .iter()
            .enumerate()
            .map(|(pos, arg)| self.value(clause, &index, None, Some(ArgSlot::Head(pos)), arg))
            .collect::<LowerResult<Vec<_>>>()?;

        // Assemble inside-out: project, filters, generators, scans.
        let mut op =
            Operation::Project { relation: clause.head.relation.clone(), values: head_values };
        for condition in conditions.into_iter().rev() {
            op = Operation::Filter { condition, inner: Box::new(op) };
        }
        for spec in aggregates.into_iter().rev() {
            op = Operation::Aggregate {
                op: spec.op,
                relation: spec.relation,
                level: spec.level,
                expr: Box::new(spec.expr),
                condition: spec.condition,
                inner: Box::new(op),
            };
        }
        for (level, &(_, atom)) in scans.iter().enumerate().rev() {
            op = Operation::Scan { relation: atom.relation.clone(), level, inner: Box::new(op) };
        }
        Ok(Statement::Query(op))
    }

    /// Conditions and aggregated expression for one generator level.
    fn aggregate_spec(
        &self,
        clause: &Clause,
        index: &ValueIndex,
        agg: &Aggregator,
        level: usize,
    ) -> LowerResult<AggregateSpec> {
        let mut locals: BTreeMap<String, Location> = BTreeMap::new();
        let mut conditions: Vec<Condition> = Vec::new();
        for (pos, arg) in agg.body.args.iter().enumerate() {
            let here = Location { level, pos };
            match arg {
                Argument::Variable(name) => {
                    if let Some(outer) = index.definition(name) {
                        conditions.push(Condition::Constraint {
                            op: ConstraintOp::Eq,
                            lhs: here.element(),
                            rhs: outer.element(),
                        });
                    } else if let Some(first) = locals.get(name) {
                        conditions.push(Condition::Constraint {
                            op: ConstraintOp::Eq,
                            lhs: first.element(),
                            rhs: here.element(),
                        });
                    } else {
                        locals.insert(name.clone(), here);
                    }
                }
                Argument::UnnamedVariable => {}
                _ => {
                    let value = self.value(clause, index, Some(&locals), None, arg)?;
                    conditions.push(Condition::Constraint {
                        op: ConstraintOp::Eq,
                        lhs: here.element(),
                        rhs: value,
                    });
                }
            }
        }

        let expr = match &agg.target {
            None => Expression::Undef,
            _ if agg.op == AggregateOp::Count => Expression::Undef,
            Some(target) => self.value(clause, index, Some(&locals), None, target)?,
        };

        Ok(AggregateSpec {
            op: agg.op,
            relation: agg.body.relation.clone(),
            level,
            expr,
            condition: Condition::conjoin(conditions),
        })
    }

    /// Map one argument term to an IR expression.
    fn value(
        &self,
        clause: &Clause,
        index: &ValueIndex,
        locals: Option<&BTreeMap<String, Location>>,
        slot: Option<ArgSlot>,
        arg: &Argument,
    ) -> LowerResult<Expression> {
        match arg {
            Argument::Variable(name) => locals
                .and_then(|l| l.get(name).copied())
                .or_else(|| index.definition(name))
                .map(Location::element)
                .ok_or_else(|| LowerError::UnboundVariable {
                    variable: name.clone(),
                    clause: clause.to_string(),
                }),
            Argument::UnnamedVariable => Ok(Expression::Undef),
            Argument::NumericConstant { raw, ty } => {
                let ty = ty.ok_or_else(|| {
                    LowerError::InvariantViolation(format!(
                        "numeric constant '{raw}' without inferred type in {clause}"
                    ))
                })?;
                numeric_constant(raw, ty, clause)
            }
            Argument::StringConstant(text) => {
                Ok(Expression::SignedConstant(i64::from(self.symbols.lookup(text))))
            }
            Argument::NilConstant => Ok(Expression::SignedConstant(0)),
            Argument::TypeCast { value, .. } => self.value(clause, index, locals, slot, value),
            Argument::Record(args) => {
                let values = args
                    .iter()
                    .map(|inner| self.value(clause, index, locals, None, inner))
                    .collect::<LowerResult<Vec<_>>>()?;
                Ok(Expression::PackRecord(values))
            }
            Argument::Branch { constructor, .. } => Err(LowerError::InvariantViolation(format!(
                "branch constructor '{constructor}' survived desugaring in {clause}"
            ))),
            Argument::Aggregator(_) => self.generator_binding(clause, index, slot),
            Argument::Intrinsic { name, op, args } => {
                let op = op.ok_or_else(|| {
                    LowerError::InvariantViolation(format!(
                        "intrinsic functor '{name}' without resolved opcode in {clause}"
                    ))
                })?;
                if FunctorRegistry::is_multi_result(op) {
                    return self.generator_binding(clause, index, slot);
                }
                let values = args
                    .iter()
                    .map(|inner| self.value(clause, index, locals, None, inner))
                    .collect::<LowerResult<Vec<_>>>()?;
                Ok(Expression::IntrinsicOperator { op, args: values })
            }
            Argument::UserFunctor { name, args } => {
                let signature = self
                    .functors
                    .signature(name)
                    .ok_or_else(|| LowerError::UnknownFunctor(name.clone()))?;
                let values = args
                    .iter()
                    .map(|inner| self.value(clause, index, locals, None, inner))
                    .collect::<LowerResult<Vec<_>>>()?;
                Ok(Expression::UserDefinedOperator {
                    name: name.clone(),
                    arg_types: signature.arg_types.clone(),
                    return_type: signature.return_type,
                    stateful: signature.stateful,
                    args: values,
                })
            }
            Argument::Counter => Ok(Expression::AutoIncrement),
            Argument::SubroutineArg(n) => Ok(Expression::SubroutineArgument(*n)),
        }
    }

    /// Value inside an existence check: unbound positions match anything.
    fn check_value(
        &self,
        clause: &Clause,
        index: &ValueIndex,
        arg: &Argument,
    ) -> LowerResult<Expression> {
        match arg {
            Argument::Variable(name) => {
                Ok(index.definition(name).map(Location::element).unwrap_or(Expression::Undef))
            }
            Argument::UnnamedVariable => Ok(Expression::Undef),
            _ => self.value(clause, index, None, None, arg),
        }
    }

    fn generator_binding(
        &self,
        clause: &Clause,
        index: &ValueIndex,
        slot: Option<ArgSlot>,
    ) -> LowerResult<Expression> {
        slot.and_then(|s| index.generators.get(&s))
            .map(|&level| Expression::TupleElement { level, pos: 0 })
            .ok_or_else(|| {
                LowerError::InvariantViolation(format!(
                    "generator value without a binding level in {clause}"
                ))
            })
    }
}

/// Positive body atoms in execution order: the clause's plan order for this
/// version when present, declaration order otherwise. Atoms keep their body
/// literal index.
fn scan_order(clause: &Clause, version: usize) -> LowerResult<Vec<(usize, &Atom)>> {
    let atoms: Vec<(usize, &Atom)> = clause
        .body
        .iter()
        .enumerate()
        .filter_map(|(i, lit)| match lit {
            Literal::Atom(atom) => Some((i, atom)),
            _ => None,
        })
        .collect();

    let Some(order) = clause.plan.as_ref().and_then(|plan| plan.orders.get(&version)) else {
        return Ok(atoms);
    };
    if order.len() != atoms.len() {
        return Err(LowerError::InvariantViolation(format!(
            "execution order for version {version} must cover {} atoms in {clause}",
            atoms.len()
        )));
    }
    let mut taken = vec![false; atoms.len()];
    let mut ordered = Vec::with_capacity(atoms.len());
    for &position in order {
        let idx = position
            .checked_sub(1)
            .filter(|i| *i < atoms.len())
            .ok_or_else(|| {
                LowerError::InvariantViolation(format!(
                    "execution order position {position} out of range in {clause}"
                ))
            })?;
        if taken[idx] {
            return Err(LowerError::InvariantViolation(format!(
                "execution order repeats position {position} in {clause}"
            )));
        }
        taken[idx] = true;
        ordered.push(atoms[idx]);
    }
    Ok(ordered)
}

fn resolve_comparison(
    op: ComparisonOp,
    ty: Option<NumericType>,
    clause: &Clause,
) -> LowerResult<ConstraintOp> {
    if matches!(op, ComparisonOp::Eq) {
        return Ok(ConstraintOp::Eq);
    }
    if matches!(op, ComparisonOp::Ne) {
        return Ok(ConstraintOp::Ne);
    }
    let ty = ty.ok_or_else(|| {
        LowerError::InvariantViolation(format!(
            "comparison '{}' without resolved numeric kind in {clause}",
            op.as_str()
        ))
    })?;
    Ok(match (op, ty) {
        (ComparisonOp::Lt, NumericType::Int) => ConstraintOp::Lt,
        (ComparisonOp::Le, NumericType::Int) => ConstraintOp::Le,
        (ComparisonOp::Gt, NumericType::Int) => ConstraintOp::Gt,
        (ComparisonOp::Ge, NumericType::Int) => ConstraintOp::Ge,
        (ComparisonOp::Lt, NumericType::Uint) => ConstraintOp::Ult,
        (ComparisonOp::Le, NumericType::Uint) => ConstraintOp::Ule,
        (ComparisonOp::Gt, NumericType::Uint) => ConstraintOp::Ugt,
        (ComparisonOp::Ge, NumericType::Uint) => ConstraintOp::Uge,
        (ComparisonOp::Lt, NumericType::Float) => ConstraintOp::Flt,
        (ComparisonOp::Le, NumericType::Float) => ConstraintOp::Fle,
        (ComparisonOp::Gt, NumericType::Float) => ConstraintOp::Fgt,
        (ComparisonOp::Ge, NumericType::Float) => ConstraintOp::Fge,
        (ComparisonOp::Eq | ComparisonOp::Ne, _) => ConstraintOp::Eq,
    })
}

fn numeric_constant(raw: &str, ty: NumericType, clause: &Clause) -> LowerResult<Expression> {
    let malformed = || {
        LowerError::InvariantViolation(format!("malformed numeric constant '{raw}' in {clause}"))
    };
    Ok(match ty {
        NumericType::Int => Expression::SignedConstant(raw.parse().map_err(|_| malformed())?),
        NumericType::Uint => Expression::UnsignedConstant(raw.parse().map_err(|_| malformed())?),
        NumericType::Float => Expression::FloatConstant(raw.parse().map_err(|_| malformed())?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::ClauseBuilder;
    use crate::ast::ExecutionPlan;

    fn translate(clause: &Clause) -> LowerResult<Statement> {
        let symbols = SymbolTable::new();
        let functors = FunctorRegistry::default();
        ClauseTranslator::new(&symbols, &functors).translate_clause(clause, 0)
    }

    fn query(stmt: Statement) -> Operation {
        match stmt {
            Statement::Query(op) => op,
            other => panic!("expected query, got {other:?}"),
        }
    }

    #[test]
    fn single_atom_clause_scans_and_projects() {
        let clause =
            ClauseBuilder::new("path").head_vars(["x", "y"]).body_atom("edge", ["x", "y"]).build();
        let op = query(translate(&clause).expect("lowers"));
        let Operation::Scan { relation, level, inner } = op else { panic!("scan expected") };
        assert_eq!(relation, "edge");
        assert_eq!(level, 0);
        let Operation::Project { relation, values } = *inner else { panic!("project expected") };
        assert_eq!(relation, "path");
        assert_eq!(
            values,
            vec![
                Expression::TupleElement { level: 0, pos: 0 },
                Expression::TupleElement { level: 0, pos: 1 },
            ]
        );
    }

    #[test]
    fn shared_variables_join_through_equality() {
        let clause = ClauseBuilder::new("path")
            .head_vars(["x", "z"])
            .body_atom("edge", ["x", "y"])
            .body_atom("edge", ["y", "z"])
            .build();
        let op = query(translate(&clause).expect("lowers"));
        let text = op.pretty_print(0);
        assert!(text.contains("FOR t0 IN edge"));
        assert!(text.contains("FOR t1 IN edge"));
        assert!(text.contains("IF (t0.1 = t1.0)"));
        assert!(text.contains("INSERT (t0.0,t1.1) INTO path"));
    }

    #[test]
    fn repeated_variable_in_one_atom_filters() {
        let clause = ClauseBuilder::new("loops").head_vars(["x"]).body_atom("edge", ["x", "x"]).build();
        let op = query(translate(&clause).expect("lowers"));
        assert!(op.pretty_print(0).contains("IF (t0.0 = t0.1)"));
    }

    #[test]
    fn constants_in_body_atoms_pin_columns() {
        let clause = ClauseBuilder::new("reds")
            .head_vars(["x"])
            .body_atom_args("color", vec![Argument::Variable("x".into()), Argument::int(0)])
            .build();
        let op = query(translate(&clause).expect("lowers"));
        assert!(op.pretty_print(0).contains("IF (t0.1 = number(0))"));
    }

    #[test]
    fn string_constants_intern_through_the_table() {
        let symbols = SymbolTable::new();
        let functors = FunctorRegistry::default();
        let clause = ClauseBuilder::new("tagged")
            .head_args([Argument::Variable("x".into()), Argument::StringConstant("red".into())])
            .body_atom("node", ["x"])
            .build();
        let stmt = ClauseTranslator::new(&symbols, &functors)
            .translate_clause(&clause, 0)
            .expect("lowers");
        let expected = i64::from(symbols.lookup_existing("red").expect("interned during lowering"));
        let Statement::Query(op) = stmt else { panic!("query expected") };
        let Operation::Project { values, .. } = op.innermost().clone() else {
            panic!("project expected")
        };
        assert_eq!(values[1], Expression::SignedConstant(expected));
    }

    #[test]
    fn negated_atoms_become_existence_checks() {
        let clause = ClauseBuilder::new("lonely")
            .head_vars(["x"])
            .body_atom("node", ["x"])
            .negated_atom("edge", ["x", "y"])
            .build();
        let op = query(translate(&clause).expect("lowers"));
        // y is unbound inside the negation and matches anything.
        assert!(op.pretty_print(0).contains("IF (NOT (t0.0,UNDEF) IN edge)"));
    }

    #[test]
    fn constraints_resolve_their_numeric_kind() {
        let clause = ClauseBuilder::new("small")
            .head_vars(["x"])
            .body_atom("value", ["x"])
            .constraint(ComparisonOp::Lt, Argument::Variable("x".into()), Argument::int(10))
            .build();
        let op = query(translate(&clause).expect("lowers"));
        assert!(op.pretty_print(0).contains("IF (t0.0 < number(10))"));
    }

    #[test]
    fn unresolved_comparison_kind_is_an_invariant_violation() {
        let mut clause = ClauseBuilder::new("small")
            .head_vars(["x"])
            .body_atom("value", ["x"])
            .constraint(ComparisonOp::Lt, Argument::Variable("x".into()), Argument::int(10))
            .build();
        if let Literal::Constraint(constraint) = &mut clause.body[1] {
            constraint.ty = None;
        }
        assert!(matches!(translate(&clause), Err(LowerError::InvariantViolation(_))));
    }

    #[test]
    fn unbound_head_variable_is_reported() {
        let clause = ClauseBuilder::new("bad").head_vars(["x", "y"]).body_atom("node", ["x"]).build();
        let err = translate(&clause).expect_err("y is unbound");
        assert!(matches!(err, LowerError::UnboundVariable { variable, .. } if variable == "y"));
    }

    #[test]
    fn wildcards_in_body_atoms_bind_nothing() {
        let clause = ClauseBuilder::new("firsts")
            .head_vars(["x"])
            .body_atom_args(
                "triple",
                vec![
                    Argument::Variable("x".into()),
                    Argument::UnnamedVariable,
                    Argument::UnnamedVariable,
                ],
            )
            .build();
        let op = query(translate(&clause).expect("lowers"));
        // No equality filters; straight scan and project.
        let Operation::Scan { inner, .. } = op else { panic!("scan expected") };
        assert!(inner.is_project());
    }

    #[test]
    fn plan_order_reassigns_scan_levels() {
        let mut plan = ExecutionPlan::default();
        plan.orders.insert(0, vec![2, 1]);
        let mut clause = ClauseBuilder::new("path")
            .head_vars(["x", "z"])
            .body_atom("left", ["x", "y"])
            .body_atom("right", ["y", "z"])
            .build();
        clause.plan = Some(plan);
        let op = query(translate(&clause).expect("lowers"));
        let text = op.pretty_print(0);
        assert!(text.contains("FOR t0 IN right"));
        assert!(text.contains("FOR t1 IN left"));
        assert!(text.contains("INSERT (t1.0,t0.1) INTO path"));
    }

    #[test]
    fn malformed_plan_orders_are_rejected() {
        for order in [vec![1], vec![1, 3], vec![1, 1]] {
            let mut plan = ExecutionPlan::default();
            plan.orders.insert(0, order);
            let mut clause = ClauseBuilder::new("path")
                .head_vars(["x", "z"])
                .body_atom("left", ["x", "y"])
                .body_atom("right", ["y", "z"])
                .build();
            clause.plan = Some(plan);
            assert!(matches!(translate(&clause), Err(LowerError::InvariantViolation(_))));
        }
    }

    #[test]
    fn facts_project_constants_without_scans() {
        let clause = ClauseBuilder::new("seed").head_args([Argument::int(1), Argument::int(2)]).build();
        let op = query(translate(&clause).expect("lowers"));
        let Operation::Project { relation, values } = op else { panic!("project expected") };
        assert_eq!(relation, "seed");
        assert_eq!(
            values,
            vec![Expression::SignedConstant(1), Expression::SignedConstant(2)]
        );
    }

    #[test]
    fn records_pack_their_fields() {
        let clause = ClauseBuilder::new("pairs")
            .head_args([Argument::Record(vec![
                Argument::Variable("x".into()),
                Argument::int(3),
            ])])
            .body_atom("node", ["x"])
            .build();
        let op = query(translate(&clause).expect("lowers"));
        let Operation::Project { values, .. } = op.innermost().clone() else {
            panic!("project expected")
        };
        assert_eq!(
            values[0],
            Expression::PackRecord(vec![
                Expression::TupleElement { level: 0, pos: 0 },
                Expression::SignedConstant(3),
            ])
        );
    }

    #[test]
    fn aggregates_bind_at_generator_levels() {
        use crate::ast::Atom;
        let clause = ClauseBuilder::new("total")
            .head_args([
                Argument::Variable("x".into()),
                Argument::Aggregator(Box::new(Aggregator {
                    op: AggregateOp::Sum,
                    target: Some(Argument::Variable("y".into())),
                    body: Atom {
                        relation: "data".into(),
                        args: vec![Argument::Variable("x".into()), Argument::Variable("y".into())],
                    },
                })),
            ])
            .body_atom("keys", ["x"])
            .build();
        let op = query(translate(&clause).expect("lowers"));
        let Operation::Scan { relation, inner, .. } = op else { panic!("scan expected") };
        assert_eq!(relation, "keys");
        let Operation::Aggregate { op, relation, level, expr, condition, inner } = *inner else {
            panic!("aggregate expected")
        };
        assert_eq!(op, AggregateOp::Sum);
        assert_eq!(relation, "data");
        assert_eq!(level, 1);
        assert_eq!(*expr, Expression::TupleElement { level: 1, pos: 1 });
        assert_eq!(condition.to_string(), "(t1.0 = t0.0)");
        let Operation::Project { values, .. } = *inner else { panic!("project expected") };
        assert_eq!(values[1], Expression::TupleElement { level: 1, pos: 0 });
    }

    #[test]
    fn count_aggregates_fold_no_expression() {
        use crate::ast::Atom;
        let clause = ClauseBuilder::new("degree")
            .head_args([
                Argument::Variable("x".into()),
                Argument::Aggregator(Box::new(Aggregator {
                    op: AggregateOp::Count,
                    target: None,
                    body: Atom {
                        relation: "edge".into(),
                        args: vec![Argument::Variable("x".into()), Argument::UnnamedVariable],
                    },
                })),
            ])
            .body_atom("node", ["x"])
            .build();
        let op = query(translate(&clause).expect("lowers"));
        let Operation::Scan { inner, .. } = op else { panic!("scan expected") };
        let Operation::Aggregate { op, expr, .. } = *inner else { panic!("aggregate expected") };
        assert_eq!(op, AggregateOp::Count);
        assert!(expr.is_undef());
    }

    #[test]
    fn counters_and_subroutine_args_map_directly() {
        let clause = ClauseBuilder::new("numbered")
            .head_args([Argument::Counter, Argument::SubroutineArg(2)])
            .build();
        let op = query(translate(&clause).expect("lowers"));
        let Operation::Project { values, .. } = op else { panic!("project expected") };
        assert_eq!(values, vec![Expression::AutoIncrement, Expression::SubroutineArgument(2)]);
    }

    #[test]
    fn nil_and_casts_are_transparent() {
        let clause = ClauseBuilder::new("wrapped")
            .head_args([
                Argument::NilConstant,
                Argument::TypeCast {
                    target: "number".into(),
                    value: Box::new(Argument::Variable("x".into())),
                },
            ])
            .body_atom("node", ["x"])
            .build();
        let op = query(translate(&clause).expect("lowers"));
        let Operation::Project { values, .. } = op.innermost().clone() else {
            panic!("project expected")
        };
        assert_eq!(values[0], Expression::SignedConstant(0));
        assert_eq!(values[1], Expression::TupleElement { level: 0, pos: 0 });
    }

    #[test]
    fn user_functors_need_registered_signatures() {
        let clause = ClauseBuilder::new("hashed")
            .head_args([Argument::UserFunctor {
                name: "hash".into(),
                args: vec![Argument::Variable("x".into())],
            }])
            .body_atom("node", ["x"])
            .build();
        let err = translate(&clause).expect_err("unregistered functor");
        assert!(matches!(err, LowerError::UnknownFunctor(name) if name == "hash"));

        let symbols = SymbolTable::new();
        let mut functors = FunctorRegistry::default();
        functors.register(
            "hash",
            crate::analysis::UserFunctorSignature {
                arg_types: vec![crate::ir::TypeAttribute::Signed],
                return_type: crate::ir::TypeAttribute::Signed,
                stateful: true,
            },
        );
        let stmt = ClauseTranslator::new(&symbols, &functors)
            .translate_clause(&clause, 0)
            .expect("lowers");
        let Statement::Query(op) = stmt else { panic!("query expected") };
        let Operation::Project { values, .. } = op.innermost().clone() else {
            panic!("project expected")
        };
        let Expression::UserDefinedOperator { name, stateful, args, .. } = &values[0] else {
            panic!("user functor expected")
        };
        assert_eq!(name.as_str(), "hash");
        assert!(*stateful);
        assert_eq!(args[0], Expression::TupleElement { level: 0, pos: 0 });
    }

    #[test]
    fn intrinsics_require_resolved_opcodes() {
        let unresolved = ClauseBuilder::new("sums")
            .head_args([Argument::Intrinsic {
                name: "+".into(),
                op: None,
                args: vec![Argument::Variable("x".into()), Argument::int(1)],
            }])
            .body_atom("node", ["x"])
            .build();
        assert!(matches!(translate(&unresolved), Err(LowerError::InvariantViolation(_))));

        let resolved = ClauseBuilder::new("sums")
            .head_args([Argument::Intrinsic {
                name: "+".into(),
                op: Some(crate::ast::IntrinsicOp::Add),
                args: vec![Argument::Variable("x".into()), Argument::int(1)],
            }])
            .body_atom("node", ["x"])
            .build();
        let op = query(translate(&resolved).expect("lowers"));
        let Operation::Project { values, .. } = op.innermost().clone() else {
            panic!("project expected")
        };
        assert_eq!(
            values[0],
            Expression::IntrinsicOperator {
                op: crate::ast::IntrinsicOp::Add,
                args: vec![
                    Expression::TupleElement { level: 0, pos: 0 },
                    Expression::SignedConstant(1),
                ],
            }
        );
    }
}
