//! Centralized identifier renaming over core expressions.
//!
//! Every whole-tree rewrite of local names lives here, one explicit
//! visitor arm per node variant, so a new expression variant cannot
//! silently bypass renaming. Only unqualified (local) references are
//! ever renamed; qualified references name top-level bindings and are
//! left alone.

use std::collections::BTreeMap;

use vela_core::{Bind, Binder, CaseAlternative, CaseResult, Expr, Literal};

pub type Renames = BTreeMap<String, String>;

fn without<'a>(renames: &Renames, shadowed: impl Iterator<Item = &'a String>) -> Renames {
    let mut inner = renames.clone();
    for name in shadowed {
        inner.remove(name);
    }
    inner
}

/// Renames free local variables of `expr` according to `renames`,
/// respecting shadowing by lambda, let, and case binders.
pub fn rename_expr(expr: &Expr, renames: &Renames) -> Expr {
    if renames.is_empty() {
        return expr.clone();
    }
    match expr {
        Expr::Literal(ann, lit) => Expr::Literal(ann.clone(), rename_literal(lit, renames)),
        Expr::Constructor(..) | Expr::ConstructorRef(..) => expr.clone(),
        Expr::Accessor(ann, field, inner) => Expr::Accessor(
            ann.clone(),
            field.clone(),
            Box::new(rename_expr(inner, renames)),
        ),
        Expr::RecordUpdate(ann, base, fields) => Expr::RecordUpdate(
            ann.clone(),
            Box::new(rename_expr(base, renames)),
            fields
                .iter()
                .map(|(label, value)| (label.clone(), rename_expr(value, renames)))
                .collect(),
        ),
        Expr::Abs(ann, param, body) => {
            let inner = without(renames, std::iter::once(param));
            Expr::Abs(
                ann.clone(),
                param.clone(),
                Box::new(rename_expr(body, &inner)),
            )
        }
        Expr::App(ann, callee, arg) => Expr::App(
            ann.clone(),
            Box::new(rename_expr(callee, renames)),
            Box::new(rename_expr(arg, renames)),
        ),
        Expr::Var(ann, q) => {
            if q.is_local() {
                if let Some(new_name) = renames.get(&q.name) {
                    return Expr::Var(
                        ann.clone(),
                        vela_types::Qualified::local(new_name.clone()),
                    );
                }
            }
            expr.clone()
        }
        Expr::Case(ann, scrutinees, alternatives) => Expr::Case(
            ann.clone(),
            scrutinees
                .iter()
                .map(|s| rename_expr(s, renames))
                .collect(),
            alternatives
                .iter()
                .map(|alt| rename_alternative_uses(alt, renames))
                .collect(),
        ),
        Expr::Let(ann, binds, body) => {
            let mut scope = renames.clone();
            let mut renamed_binds = Vec::with_capacity(binds.len());
            for bind in binds {
                match bind {
                    Bind::NonRec(name, rhs) => {
                        // The right-hand side sees the outer scope; the
                        // name shadows from the next bind onward.
                        let rhs = rename_expr(rhs, &scope);
                        scope.remove(name);
                        renamed_binds.push(Bind::NonRec(name.clone(), rhs));
                    }
                    Bind::Rec(group) => {
                        for (name, _) in group {
                            scope.remove(name);
                        }
                        renamed_binds.push(Bind::Rec(
                            group
                                .iter()
                                .map(|(name, rhs)| (name.clone(), rename_expr(rhs, &scope)))
                                .collect(),
                        ));
                    }
                }
            }
            Expr::Let(
                ann.clone(),
                renamed_binds,
                Box::new(rename_expr(body, &scope)),
            )
        }
    }
}

fn rename_literal(lit: &Literal<Expr>, renames: &Renames) -> Literal<Expr> {
    match lit {
        Literal::Array(items) => {
            Literal::Array(items.iter().map(|e| rename_expr(e, renames)).collect())
        }
        Literal::Object(fields) => Literal::Object(
            fields
                .iter()
                .map(|(label, value)| (label.clone(), rename_expr(value, renames)))
                .collect(),
        ),
        Literal::Int(n) => Literal::Int(*n),
        Literal::Float(x) => Literal::Float(*x),
        Literal::Char(c) => Literal::Char(*c),
        Literal::String(s) => Literal::String(s.clone()),
        Literal::Boolean(b) => Literal::Boolean(*b),
    }
}

/// Renames *uses* inside an alternative, leaving its own binders alone:
/// names the alternative binds shadow the outer renaming.
fn rename_alternative_uses(alt: &CaseAlternative, renames: &Renames) -> CaseAlternative {
    let bound: Vec<String> = alt
        .binders
        .iter()
        .flat_map(|b| b.bound_names())
        .collect();
    let inner = without(renames, bound.iter());
    CaseAlternative {
        binders: alt.binders.clone(),
        result: rename_result(&alt.result, &inner),
    }
}

fn rename_result(result: &CaseResult, renames: &Renames) -> CaseResult {
    match result {
        CaseResult::Unconditional(expr) => CaseResult::Unconditional(rename_expr(expr, renames)),
        CaseResult::Guarded(pairs) => CaseResult::Guarded(
            pairs
                .iter()
                .map(|(guard, body)| (rename_expr(guard, renames), rename_expr(body, renames)))
                .collect(),
        ),
    }
}

/// Renames the *binding* occurrences in a binder tree. Used by the
/// hygienic-renaming pass, whose map covers exactly the names this
/// binder binds.
pub fn rename_binder(binder: &Binder, renames: &Renames) -> Binder {
    let renamed = |name: &String| renames.get(name).unwrap_or(name).clone();
    match binder {
        Binder::Wildcard => Binder::Wildcard,
        Binder::Var(name) => Binder::Var(renamed(name)),
        Binder::Named(name, inner) => {
            Binder::Named(renamed(name), Box::new(rename_binder(inner, renames)))
        }
        Binder::Literal(Literal::Array(items)) => Binder::Literal(Literal::Array(
            items.iter().map(|b| rename_binder(b, renames)).collect(),
        )),
        Binder::Literal(Literal::Object(fields)) => Binder::Literal(Literal::Object(
            fields
                .iter()
                .map(|(label, b)| (label.clone(), rename_binder(b, renames)))
                .collect(),
        )),
        Binder::Literal(Literal::Int(n)) => Binder::Literal(Literal::Int(*n)),
        Binder::Literal(Literal::Float(x)) => Binder::Literal(Literal::Float(*x)),
        Binder::Literal(Literal::Char(c)) => Binder::Literal(Literal::Char(*c)),
        Binder::Literal(Literal::String(s)) => Binder::Literal(Literal::String(s.clone())),
        Binder::Literal(Literal::Boolean(b)) => Binder::Literal(Literal::Boolean(*b)),
        Binder::Constructor(ctor, binders) => Binder::Constructor(
            ctor.clone(),
            binders.iter().map(|b| rename_binder(b, renames)).collect(),
        ),
    }
}

/// Renames an alternative for hygiene: both its binders' binding
/// occurrences and the uses inside guards and results.
pub fn rename_alternative(alt: &CaseAlternative, renames: &Renames) -> CaseAlternative {
    CaseAlternative {
        binders: alt
            .binders
            .iter()
            .map(|b| rename_binder(b, renames))
            .collect(),
        result: rename_result(&alt.result, renames),
    }
}
