//! Sum-type desugaring.
//!
//! Branch constructors are rewritten into plain records before clause
//! translation, bottom-up so nested constructors resolve first. A branch id
//! is the constructor's position in the lexicographic ordering of its type's
//! branches. Nullary branches and pure enumeration types collapse to the bare
//! tag constant; everything else becomes `[tag, payload]` where the payload
//! is a single argument directly or a record of several.

use crate::analysis::SumTypeBranches;
use crate::ast::{Argument, Atom, Literal, NumericType, Program};
use crate::error::{LowerError, LowerResult};

pub(crate) fn desugar_adts(program: &mut Program, sum_types: &SumTypeBranches) -> LowerResult<()> {
    for clause in &mut program.clauses {
        desugar_atom(&mut clause.head, sum_types)?;
        for literal in &mut clause.body {
            match literal {
                Literal::Atom(atom) | Literal::Negation(atom) => desugar_atom(atom, sum_types)?,
                Literal::Constraint(constraint) => {
                    desugar_argument(&mut constraint.lhs, sum_types)?;
                    desugar_argument(&mut constraint.rhs, sum_types)?;
                }
            }
        }
    }
    Ok(())
}

fn desugar_atom(atom: &mut Atom, sum_types: &SumTypeBranches) -> LowerResult<()> {
    for arg in &mut atom.args {
        desugar_argument(arg, sum_types)?;
    }
    Ok(())
}

fn desugar_argument(arg: &mut Argument, sum_types: &SumTypeBranches) -> LowerResult<()> {
    // Children first, so a constructor argument that is itself a constructor
    // is already a record when the parent is rebuilt.
    match arg {
        Argument::TypeCast { value, .. } => desugar_argument(value, sum_types)?,
        Argument::Record(args)
        | Argument::Branch { args, .. }
        | Argument::Intrinsic { args, .. }
        | Argument::UserFunctor { args, .. } => {
            for inner in args {
                desugar_argument(inner, sum_types)?;
            }
        }
        Argument::Aggregator(agg) => {
            if let Some(target) = &mut agg.target {
                desugar_argument(target, sum_types)?;
            }
            desugar_atom(&mut agg.body, sum_types)?;
        }
        _ => {}
    }

    let replacement = if let Argument::Branch { constructor, args } = arg {
        let ty = sum_types
            .type_of(constructor)
            .ok_or_else(|| LowerError::UnknownConstructor(constructor.clone()))?;
        let id = ty
            .branch_id(constructor)
            .ok_or_else(|| LowerError::UnknownConstructor(constructor.clone()))?;
        let tag = Argument::NumericConstant { raw: id.to_string(), ty: Some(NumericType::Int) };
        if ty.is_enum() || args.is_empty() {
            Some(tag)
        } else {
            let mut taken = std::mem::take(args);
            let payload = if taken.len() == 1 { taken.remove(0) } else { Argument::Record(taken) };
            Some(Argument::Record(vec![tag, payload]))
        }
    } else {
        None
    };
    if let Some(replacement) = replacement {
        *arg = replacement;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Branch;
    use crate::ast::builders::{ClauseBuilder, ProgramBuilder};

    fn mixed_type() -> SumTypeBranches {
        let mut sum_types = SumTypeBranches::default();
        sum_types.register_type(
            "T",
            vec![
                Branch { name: "C1".into(), arity: 0 },
                Branch { name: "C2".into(), arity: 1 },
                Branch { name: "C3".into(), arity: 2 },
            ],
        );
        sum_types
    }

    fn branch(constructor: &str, args: Vec<Argument>) -> Argument {
        Argument::Branch { constructor: constructor.into(), args }
    }

    fn desugared_head_arg(arg: Argument, sum_types: &SumTypeBranches) -> Argument {
        let mut program = ProgramBuilder::new()
            .clause(ClauseBuilder::new("out").head_args([arg]).build())
            .build();
        desugar_adts(&mut program, sum_types).expect("desugars");
        program.clauses[0].head.args[0].clone()
    }

    #[test]
    fn nullary_branch_becomes_bare_tag() {
        let arg = desugared_head_arg(branch("C1", vec![]), &mixed_type());
        assert_eq!(arg, Argument::int(0));
    }

    #[test]
    fn unary_branch_inlines_its_payload() {
        let arg = desugared_head_arg(branch("C2", vec![Argument::int(7)]), &mixed_type());
        assert_eq!(arg, Argument::Record(vec![Argument::int(1), Argument::int(7)]));
    }

    #[test]
    fn wider_branch_wraps_payload_in_a_record() {
        let arg =
            desugared_head_arg(branch("C3", vec![Argument::int(7), Argument::int(8)]), &mixed_type());
        assert_eq!(
            arg,
            Argument::Record(vec![
                Argument::int(2),
                Argument::Record(vec![Argument::int(7), Argument::int(8)]),
            ])
        );
    }

    #[test]
    fn enum_branches_collapse_to_tags() {
        let mut sum_types = SumTypeBranches::default();
        sum_types.register_type(
            "Color",
            vec![
                Branch { name: "Red".into(), arity: 0 },
                Branch { name: "Green".into(), arity: 0 },
                Branch { name: "Blue".into(), arity: 0 },
            ],
        );
        // Lexicographic: Blue=0, Green=1, Red=2.
        assert_eq!(desugared_head_arg(branch("Red", vec![]), &sum_types), Argument::int(2));
        assert_eq!(desugared_head_arg(branch("Blue", vec![]), &sum_types), Argument::int(0));
    }

    #[test]
    fn nested_constructors_resolve_bottom_up() {
        let arg = desugared_head_arg(
            branch("C2", vec![branch("C1", vec![])]),
            &mixed_type(),
        );
        assert_eq!(arg, Argument::Record(vec![Argument::int(1), Argument::int(0)]));
    }

    #[test]
    fn constructors_inside_records_are_rewritten() {
        let arg = desugared_head_arg(
            Argument::Record(vec![branch("C1", vec![]), Argument::Variable("x".into())]),
            &mixed_type(),
        );
        assert_eq!(arg, Argument::Record(vec![Argument::int(0), Argument::Variable("x".into())]));
    }

    #[test]
    fn unknown_constructor_is_reported() {
        let mut program = ProgramBuilder::new()
            .clause(ClauseBuilder::new("out").head_args([branch("Nope", vec![])]).build())
            .build();
        let err = desugar_adts(&mut program, &mixed_type()).expect_err("unknown constructor");
        assert!(matches!(err, LowerError::UnknownConstructor(name) if name == "Nope"));
    }

    #[test]
    fn body_and_constraint_positions_are_covered() {
        use crate::ast::ComparisonOp;
        let mut program = ProgramBuilder::new()
            .clause(
                ClauseBuilder::new("out")
                    .head_vars(["x"])
                    .body_atom_args("data", vec![Argument::Variable("x".into()), branch("C1", vec![])])
                    .constraint(ComparisonOp::Eq, Argument::Variable("x".into()), branch("C1", vec![]))
                    .build(),
            )
            .build();
        desugar_adts(&mut program, &mixed_type()).expect("desugars");
        let clause = &program.clauses[0];
        let Literal::Atom(atom) = &clause.body[0] else { panic!("positive atom expected") };
        assert_eq!(atom.args[1], Argument::int(0));
        let Literal::Constraint(constraint) = &clause.body[1] else { panic!("constraint expected") };
        assert_eq!(constraint.rhs, Argument::int(0));
    }
}
