//! Lowering of multi-clause, multi-scrutinee case alternatives with
//! guards into the target's single-scrutinee case/guard construct.
//!
//! The target case form does not open a new lexical scope per clause,
//! so every alternative gets a hygienic renaming of its bound names
//! before lowering. Guard fall-through and refutable auxiliary
//! bindings dispatch through nullary `Next` funs so no alternative is
//! ever duplicated.

use vela_beam::{atom_name, var_name, Atom, BeamExpr, CaseClause, NO_MATCH, RUNTIME_MODULE};
use vela_core::{Binder, CaseAlternative, CaseResult, Expr, Literal};
use vela_diag::{Category, Diagnostic};

use crate::expr::Lowerer;
use crate::rename;

/// An auxiliary binding a binder needs evaluated after the pattern
/// matches: runtime sequence conversions for array-shaped patterns.
struct SideBinding {
    pattern: BeamExpr,
    value: BeamExpr,
    /// Refutable bindings dispatch through a case with a fall-through
    /// clause; irrefutable ones bind directly.
    refutable: bool,
}

enum AltBody {
    Unconditional(BeamExpr),
    Guarded(Vec<(BeamExpr, BeamExpr)>),
}

struct LoweredAlt {
    pattern: BeamExpr,
    aux: Vec<SideBinding>,
    body: AltBody,
}

pub(crate) fn lower_case(
    lw: &mut Lowerer<'_>,
    scrutinees: &[Expr],
    alternatives: &[CaseAlternative],
) -> BeamExpr {
    let width = scrutinees.len();
    let alternatives = normalize_clause_arity(lw, width, alternatives);

    // Scrutinees are bound once, before any alternative dispatch.
    let mut stmts = Vec::new();
    let mut scrut_vars = Vec::with_capacity(width);
    for scrutinee in scrutinees {
        let lowered = lw.lower_expr(scrutinee);
        match lowered {
            BeamExpr::Var(v) => scrut_vars.push(v),
            other => {
                let tmp = var_name(&lw.ctx.fresh("case"));
                stmts.push(BeamExpr::bind(BeamExpr::Var(tmp.clone()), other));
                scrut_vars.push(tmp);
            }
        }
    }
    let scrut = if width == 1 {
        BeamExpr::Var(scrut_vars[0].clone())
    } else {
        BeamExpr::Tuple(scrut_vars.into_iter().map(BeamExpr::Var).collect())
    };

    let lowered: Vec<LoweredAlt> = alternatives
        .iter()
        .map(|alt| lower_alternative(lw, alt))
        .collect();

    // Flat case when clause order alone decides: no guards, no
    // auxiliary bindings.
    let flat = lowered
        .iter()
        .all(|alt| alt.aux.is_empty() && matches!(alt.body, AltBody::Unconditional(_)));
    let dispatch = if flat {
        let clauses = lowered
            .into_iter()
            .map(|alt| {
                let AltBody::Unconditional(body) = alt.body else {
                    unreachable!("flat dispatch requires unconditional alternatives")
                };
                CaseClause {
                    pattern: alt.pattern,
                    guard: None,
                    body,
                }
            })
            .collect();
        BeamExpr::Case(Box::new(scrut), clauses)
    } else {
        build_dispatch(lw, &scrut, &lowered)
    };

    BeamExpr::block(stmts, dispatch)
}

/// Normalizes uneven clause shapes against the scrutinee count by
/// front-padding with wildcards (defensive, surfaced as a warning —
/// the rightmost binders keep matching the rightmost scrutinees).
fn normalize_clause_arity(
    lw: &mut Lowerer<'_>,
    width: usize,
    alternatives: &[CaseAlternative],
) -> Vec<CaseAlternative> {
    let mut adjusted = false;
    let normalized = alternatives
        .iter()
        .map(|alt| {
            if alt.binders.len() == width {
                return alt.clone();
            }
            adjusted = true;
            let mut binders: Vec<Binder> = Vec::with_capacity(width);
            if alt.binders.len() < width {
                binders.extend(
                    std::iter::repeat_with(|| Binder::Wildcard)
                        .take(width - alt.binders.len()),
                );
                binders.extend(alt.binders.iter().cloned());
            } else {
                binders.extend(alt.binders[alt.binders.len() - width..].iter().cloned());
            }
            CaseAlternative {
                binders,
                result: alt.result.clone(),
            }
        })
        .collect();
    if adjusted {
        let module = lw.ctx.module_name().to_string();
        lw.ctx.warn(Diagnostic::warning(
            Category::InconsistentClauseArity,
            module,
            format!("case alternatives padded to {width} binders"),
        ));
    }
    normalized
}

fn lower_alternative(lw: &mut Lowerer<'_>, alt: &CaseAlternative) -> LoweredAlt {
    // Hygiene: every name the alternative binds gets a fresh name,
    // substituted through binders, guards, and result.
    let mut renames = rename::Renames::new();
    for binder in &alt.binders {
        for name in binder.bound_names() {
            let fresh = lw.ctx.fresh(&name);
            renames.insert(name, fresh);
        }
    }
    let alt = rename::rename_alternative(alt, &renames);

    let scope = lw.enter_scope();
    for fresh in renames.values() {
        lw.register_fresh(fresh);
    }

    let mut aux = Vec::new();
    let mut patterns: Vec<BeamExpr> = alt
        .binders
        .iter()
        .map(|binder| lower_binder(lw, binder, &mut aux))
        .collect();
    let pattern = if patterns.len() == 1 {
        patterns.pop().expect("one binder")
    } else {
        BeamExpr::Tuple(patterns)
    };

    let body = match &alt.result {
        CaseResult::Unconditional(expr) => AltBody::Unconditional(lw.lower_expr(expr)),
        CaseResult::Guarded(pairs) => AltBody::Guarded(
            pairs
                .iter()
                .map(|(guard, result)| (lw.lower_expr(guard), lw.lower_expr(result)))
                .collect(),
        ),
    };
    lw.exit_scope(scope);

    LoweredAlt { pattern, aux, body }
}

fn lower_binder(
    lw: &mut Lowerer<'_>,
    binder: &Binder,
    aux: &mut Vec<SideBinding>,
) -> BeamExpr {
    match binder {
        Binder::Wildcard => BeamExpr::wildcard(),
        Binder::Var(name) => BeamExpr::Var(lw.local_target(name)),
        Binder::Named(name, inner) => {
            let inner = lower_binder(lw, inner, aux);
            BeamExpr::bind(BeamExpr::Var(lw.local_target(name)), inner)
        }
        Binder::Literal(lit) => lower_literal_binder(lw, lit, aux),
        Binder::Constructor(ctor, binders) => {
            if lw.env.is_newtype_ctor(ctor) {
                // Newtype deconstruction is fully erased.
                return match binders.first() {
                    Some(inner) => lower_binder(lw, inner, aux),
                    None => BeamExpr::wildcard(),
                };
            }
            let mut elems = vec![BeamExpr::atom(atom_name(&ctor.name))];
            elems.extend(binders.iter().map(|b| lower_binder(lw, b, aux)));
            BeamExpr::Tuple(elems)
        }
    }
}

fn lower_literal_binder(
    lw: &mut Lowerer<'_>,
    lit: &Literal<Binder>,
    aux: &mut Vec<SideBinding>,
) -> BeamExpr {
    match lit {
        Literal::Int(n) => BeamExpr::Integer(*n),
        Literal::Float(x) => BeamExpr::Float(*x),
        Literal::Char(c) => BeamExpr::Char(*c),
        Literal::String(s) => BeamExpr::Binary(s.clone()),
        Literal::Boolean(b) => BeamExpr::atom(if *b { "true" } else { "false" }),
        Literal::Object(fields) => BeamExpr::Map(
            fields
                .iter()
                .map(|(label, binder)| {
                    (
                        BeamExpr::atom(atom_name(label)),
                        lower_binder(lw, binder, aux),
                    )
                })
                .collect(),
        ),
        Literal::Array(items) => {
            // The scrutinee is a runtime sequence; list-shaped matching
            // needs a conversion to a native list first.
            let seq_var = var_name(&lw.ctx.fresh("seq"));
            let elems: Vec<BeamExpr> = items
                .iter()
                .map(|item| lower_binder(lw, item, aux))
                .collect();
            let irrefutable = items
                .iter()
                .all(|item| matches!(item, Binder::Var(_) | Binder::Wildcard));
            let to_list = BeamExpr::call(
                Atom::remote(RUNTIME_MODULE, "sequence_to_list"),
                vec![BeamExpr::Var(seq_var.clone())],
            );
            let value = if irrefutable {
                to_list
            } else {
                // Shape-checked conversion with a sentinel fallback the
                // dispatch's wildcard clause consumes.
                BeamExpr::Case(
                    Box::new(BeamExpr::call(
                        Atom::remote(RUNTIME_MODULE, "is_sequence"),
                        vec![BeamExpr::Var(seq_var.clone())],
                    )),
                    vec![
                        CaseClause {
                            pattern: BeamExpr::atom("true"),
                            guard: None,
                            body: to_list,
                        },
                        CaseClause {
                            pattern: BeamExpr::wildcard(),
                            guard: None,
                            body: BeamExpr::atom(NO_MATCH),
                        },
                    ],
                )
            };
            aux.push(SideBinding {
                pattern: BeamExpr::List(elems),
                value,
                refutable: !irrefutable,
            });
            BeamExpr::Var(seq_var)
        }
    }
}

fn is_irrefutable_pattern(pattern: &BeamExpr) -> bool {
    match pattern {
        BeamExpr::Var(_) => true,
        BeamExpr::Match(lhs, rhs) => is_irrefutable_pattern(lhs) && is_irrefutable_pattern(rhs),
        // Only scrutinee wrappers produce bare tuples here; constructor
        // patterns always carry an atom tag and stay refutable.
        BeamExpr::Tuple(elems) => elems.iter().all(is_irrefutable_pattern),
        _ => false,
    }
}

/// Builds the general nested-function dispatch: each alternative tries
/// its pattern, auxiliary bindings, and guards, falling through to a
/// nullary `Next` fun on any failure.
fn build_dispatch(lw: &mut Lowerer<'_>, scrut: &BeamExpr, alts: &[LoweredAlt]) -> BeamExpr {
    let Some((alt, rest)) = alts.split_first() else {
        return BeamExpr::call(
            Atom::remote("erlang", "error"),
            vec![BeamExpr::Tuple(vec![
                BeamExpr::atom("case_clause"),
                scrut.clone(),
            ])],
        );
    };

    let pattern_refutable = !is_irrefutable_pattern(&alt.pattern);
    let has_guards = matches!(alt.body, AltBody::Guarded(_));
    let aux_refutable = alt.aux.iter().any(|binding| binding.refutable);

    if !pattern_refutable && !has_guards && !aux_refutable {
        // This alternative always matches; anything after it is dead.
        let AltBody::Unconditional(body) = &alt.body else {
            unreachable!("guard-free alternative")
        };
        let mut inner = body.clone();
        for binding in alt.aux.iter().rev() {
            inner = BeamExpr::block(
                vec![BeamExpr::bind(binding.pattern.clone(), binding.value.clone())],
                inner,
            );
        }
        return BeamExpr::block(
            vec![BeamExpr::bind(alt.pattern.clone(), scrut.clone())],
            inner,
        );
    }

    let next_var = var_name(&lw.ctx.fresh("next"));
    let next_call = BeamExpr::call_value(BeamExpr::Var(next_var.clone()), vec![]);

    // Guards evaluate top to bottom; a false guard is the boolean
    // sentinel that sends control to the next alternative.
    let mut inner = match &alt.body {
        AltBody::Unconditional(body) => body.clone(),
        AltBody::Guarded(pairs) => {
            pairs
                .iter()
                .rev()
                .fold(next_call.clone(), |fallthrough, (guard, result)| {
                    BeamExpr::Case(
                        Box::new(guard.clone()),
                        vec![
                            CaseClause {
                                pattern: BeamExpr::atom("true"),
                                guard: None,
                                body: result.clone(),
                            },
                            CaseClause {
                                pattern: BeamExpr::wildcard(),
                                guard: None,
                                body: fallthrough,
                            },
                        ],
                    )
                })
        }
    };

    for binding in alt.aux.iter().rev() {
        inner = if binding.refutable {
            BeamExpr::Case(
                Box::new(binding.value.clone()),
                vec![
                    CaseClause {
                        pattern: binding.pattern.clone(),
                        guard: None,
                        body: inner,
                    },
                    CaseClause {
                        pattern: BeamExpr::wildcard(),
                        guard: None,
                        body: next_call.clone(),
                    },
                ],
            )
        } else {
            BeamExpr::block(
                vec![BeamExpr::bind(binding.pattern.clone(), binding.value.clone())],
                inner,
            )
        };
    }

    let mut clauses = vec![CaseClause {
        pattern: alt.pattern.clone(),
        guard: None,
        body: inner,
    }];
    if pattern_refutable {
        clauses.push(CaseClause {
            pattern: BeamExpr::wildcard(),
            guard: None,
            body: next_call,
        });
    }
    let case = BeamExpr::Case(Box::new(scrut.clone()), clauses);
    let next_fun = BeamExpr::fun0(build_dispatch(lw, scrut, rest));
    BeamExpr::block(
        vec![BeamExpr::bind(BeamExpr::Var(next_var), next_fun)],
        case,
    )
}
