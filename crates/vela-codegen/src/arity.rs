//! Arity analysis and the overload decision table.
//!
//! Two independent sources of truth feed overload synthesis: the
//! descriptor derived from a binding's declared type, and the set of
//! argument counts the module actually applies each identifier to. The
//! decision table combining them is a pure function, tested on its own.

use std::collections::{BTreeMap, BTreeSet};

use vela_core::{Bind, CaseResult, Expr, Literal, Meta, Module};
use vela_types::names::{self, FnFamily};
use vela_types::{Qualified, Type, TypeDecl, TypeEnv};

// ---------------------------------------------------------------------------
// Arity descriptors
// ---------------------------------------------------------------------------

/// Structural arity of a binding, derived from its declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// `dict` typeclass-constraint parameters followed by `value`
    /// ordinary parameters, one closure each.
    Curried { dict: usize, value: usize },
    /// A member of one of the numbered uncurried call families.
    Fixed(FnFamily, usize),
}

impl Arity {
    pub fn total(&self) -> usize {
        match *self {
            Arity::Curried { dict, value } => dict + value,
            Arity::Fixed(_, n) => n,
        }
    }

    pub fn dict(&self) -> usize {
        match *self {
            Arity::Curried { dict, .. } => dict,
            Arity::Fixed(..) => 0,
        }
    }

    pub fn value(&self) -> usize {
        match *self {
            Arity::Curried { value, .. } => value,
            Arity::Fixed(_, n) => n,
        }
    }
}

/// Expands leading synonym applications so arrows hidden behind type
/// aliases still count toward the arity.
fn expand_synonyms(env: &TypeEnv, ty: &Type) -> Type {
    let mut current = ty.clone();
    // Bounded: each expansion consumes one synonym layer, and the
    // checker rejects cyclic synonyms.
    for _ in 0..64 {
        let stripped = current.strip_foralls().clone();
        let expanded = {
            let (head, args) = stripped.unapply();
            match head {
                Type::Con(q) => match env.lookup_decl(q) {
                    Some(TypeDecl::Synonym { params, body }) if args.len() >= params.len() => {
                        let subst: BTreeMap<String, Type> = params
                            .iter()
                            .cloned()
                            .zip(args.iter().map(|a| (*a).clone()))
                            .collect();
                        let mut result = vela_types::substitute_type_vars(body, &subst);
                        for extra in &args[params.len()..] {
                            result = Type::app(result, (*extra).clone());
                        }
                        Some(result)
                    }
                    _ => None,
                },
                _ => None,
            }
        };
        match expanded {
            Some(next) => current = next,
            None => return stripped,
        }
    }
    current
}

/// Derives the arity descriptor for a declared type.
pub fn arity_from_type(env: &TypeEnv, ty: &Type) -> Arity {
    let mut dict = 0;
    let mut current = expand_synonyms(env, ty);
    while let Type::Constrained(_, body) = current {
        dict += 1;
        current = expand_synonyms(env, &body);
    }

    if dict == 0 {
        let (head, args) = current.unapply();
        if let Type::Con(q) = head {
            if let Some((family, n)) = names::uncurried_family(q) {
                // A family constructor carries its argument types plus
                // the return type.
                if args.len() == n + 1 {
                    return Arity::Fixed(family, n);
                }
            }
        }
    }

    let mut value = 0;
    loop {
        match current {
            Type::Fun(_, to) => {
                value += 1;
                current = expand_synonyms(env, &to);
            }
            _ => break,
        }
    }
    Arity::Curried { dict, value }
}

// ---------------------------------------------------------------------------
// Usage scan
// ---------------------------------------------------------------------------

/// Per-identifier set of argument counts used anywhere in the module.
/// A bare reference records arity 0.
pub type UsageMap = BTreeMap<Qualified, BTreeSet<usize>>;

/// Scans every expression in the module. Constructor applications,
/// newtype coercions, typeclass-dictionary constructions, and
/// fully-saturated foreign calls are compiled specially and never need
/// an overload, so they do not contribute usages.
pub fn scan_usages(
    module: &Module,
    foreign_arities: &BTreeMap<String, usize>,
) -> UsageMap {
    let mut usages = UsageMap::new();
    for bind in &module.decls {
        for (_, expr) in bind.bindings() {
            scan_expr(expr, module, foreign_arities, &mut usages);
        }
    }
    usages
}

fn is_special_head(ann: &vela_core::Ann) -> bool {
    matches!(
        ann.meta,
        Some(Meta::Constructor) | Some(Meta::Newtype) | Some(Meta::TypeClassConstructor)
    )
}

fn scan_expr(
    expr: &Expr,
    module: &Module,
    foreign_arities: &BTreeMap<String, usize>,
    usages: &mut UsageMap,
) {
    match expr {
        Expr::App(..) => {
            let (head, args) = expr.unapply();
            for arg in &args {
                scan_expr(arg, module, foreign_arities, usages);
            }
            match head {
                Expr::Var(ann, q) if !q.is_local() => {
                    if is_special_head(ann) {
                        return;
                    }
                    if q.module.as_ref() == Some(&module.name) {
                        if let Some(&impl_arity) = foreign_arities.get(&q.name) {
                            if args.len() >= impl_arity {
                                return;
                            }
                        }
                    }
                    usages.entry(q.clone()).or_default().insert(args.len());
                }
                Expr::ConstructorRef(..) | Expr::Constructor(..) => {}
                other => scan_expr(other, module, foreign_arities, usages),
            }
        }
        Expr::Var(ann, q) => {
            if !q.is_local() && !is_special_head(ann) {
                usages.entry(q.clone()).or_default().insert(0);
            }
        }
        Expr::Literal(_, Literal::Array(items)) => {
            for item in items {
                scan_expr(item, module, foreign_arities, usages);
            }
        }
        Expr::Literal(_, Literal::Object(fields)) => {
            for (_, value) in fields {
                scan_expr(value, module, foreign_arities, usages);
            }
        }
        Expr::Literal(..) | Expr::Constructor(..) | Expr::ConstructorRef(..) => {}
        Expr::Accessor(_, _, inner) => scan_expr(inner, module, foreign_arities, usages),
        Expr::RecordUpdate(_, base, fields) => {
            scan_expr(base, module, foreign_arities, usages);
            for (_, value) in fields {
                scan_expr(value, module, foreign_arities, usages);
            }
        }
        Expr::Abs(_, _, body) => scan_expr(body, module, foreign_arities, usages),
        Expr::Case(_, scrutinees, alternatives) => {
            for scrutinee in scrutinees {
                scan_expr(scrutinee, module, foreign_arities, usages);
            }
            for alt in alternatives {
                match &alt.result {
                    CaseResult::Unconditional(body) => {
                        scan_expr(body, module, foreign_arities, usages)
                    }
                    CaseResult::Guarded(pairs) => {
                        for (guard, body) in pairs {
                            scan_expr(guard, module, foreign_arities, usages);
                            scan_expr(body, module, foreign_arities, usages);
                        }
                    }
                }
            }
        }
        Expr::Let(_, binds, body) => {
            for bind in binds {
                match bind {
                    Bind::NonRec(_, rhs) => scan_expr(rhs, module, foreign_arities, usages),
                    Bind::Rec(group) => {
                        for (_, rhs) in group {
                            scan_expr(rhs, module, foreign_arities, usages);
                        }
                    }
                }
            }
            scan_expr(body, module, foreign_arities, usages);
        }
    }
}

// ---------------------------------------------------------------------------
// The overload decision table
// ---------------------------------------------------------------------------

/// The full-arity overload to emit for a binding, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direct {
    /// The body has at least `arity` leading closures; lower it under
    /// full saturation.
    Saturated(usize),
    /// A member of an uncurried family; apply the runtime value to all
    /// arguments at once.
    Uncurried(FnFamily, usize),
    /// The body returns a function; wrap the curried chain instead.
    Wrapper(usize),
}

impl Direct {
    pub fn arity(&self) -> usize {
        match *self {
            Direct::Saturated(n) | Direct::Wrapper(n) | Direct::Uncurried(_, n) => n,
        }
    }
}

/// The dictionary-only overload, used for partial application through
/// typeclass dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictOverload {
    pub arity: usize,
    /// Whether the body has enough leading closures to lower the
    /// overload under partial saturation; otherwise it wraps the
    /// curried chain.
    pub saturated: bool,
}

/// Which callable shapes to emit for one binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverloadPlan {
    /// The canonical arity-0 definition returning the curried chain.
    pub curried_zero: bool,
    pub direct: Option<Direct>,
    pub dict_only: Option<DictOverload>,
}

impl OverloadPlan {
    pub fn none() -> Self {
        Self {
            curried_zero: false,
            direct: None,
            dict_only: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.curried_zero && self.direct.is_none() && self.dict_only.is_none()
    }

    /// Emitted arities, ascending.
    pub fn arities(&self) -> Vec<usize> {
        let mut out = Vec::new();
        if self.curried_zero {
            out.push(0);
        }
        if let Some(dict) = &self.dict_only {
            out.push(dict.arity);
        }
        if let Some(direct) = &self.direct {
            out.push(direct.arity());
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Picks the overload a call site with `argc` arguments should
    /// target.
    pub fn call_shape(&self, argc: usize) -> CallShape {
        if let Some(direct) = &self.direct {
            if argc >= direct.arity() && direct.arity() > 0 {
                return CallShape::Direct(direct.arity());
            }
        }
        if let Some(dict) = &self.dict_only {
            if argc >= dict.arity {
                return CallShape::DictOnly(dict.arity);
            }
        }
        CallShape::CurriedChain
    }
}

/// How a call site reaches a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    /// Call the full-arity overload, applying any surplus one at a time.
    Direct(usize),
    /// Call the dictionary-only overload, applying the rest one at a
    /// time.
    DictOnly(usize),
    /// Apply arguments one at a time against the curried chain.
    CurriedChain,
}

/// The decision table: descriptor and usage set in, overload set out.
///
/// `public` covers declared exports and foreign-backed bindings: their
/// callers are unknown, so every applicable shape is emitted. Private
/// bindings emit only the shapes their recorded usages require, and a
/// private binding nothing references is omitted entirely.
pub fn plan_overloads(
    arity: &Arity,
    usages: &BTreeSet<usize>,
    public: bool,
    lambdas: usize,
    dict_ctor: bool,
) -> OverloadPlan {
    if dict_ctor {
        // Dictionary constructions are excluded from the usage scan but
        // call the constructor directly at member-count arity.
        return OverloadPlan {
            curried_zero: true,
            direct: (lambdas > 0).then_some(Direct::Saturated(lambdas)),
            dict_only: None,
        };
    }
    if !public && usages.is_empty() {
        return OverloadPlan::none();
    }

    match *arity {
        Arity::Fixed(family, k) => OverloadPlan {
            curried_zero: public || usages.iter().any(|&a| a != k),
            direct: Some(Direct::Uncurried(family, k)),
            dict_only: None,
        },
        Arity::Curried { dict, value } => {
            let total = dict + value;
            if total == 0 {
                // A value, not a function: the curried-zero form is the
                // only callable shape.
                return OverloadPlan {
                    curried_zero: true,
                    direct: None,
                    dict_only: None,
                };
            }

            let full_use = public || usages.iter().any(|&a| a >= total);
            let direct = full_use.then(|| {
                if lambdas >= total {
                    Direct::Saturated(total)
                } else {
                    Direct::Wrapper(total)
                }
            });

            let dict_use = dict > 0
                && value > 0
                && (public || usages.iter().any(|&a| a >= dict && a < total));
            let dict_only = dict_use.then(|| DictOverload {
                arity: dict,
                saturated: lambdas >= dict,
            });

            // Wrapper-shaped overloads re-enter through the chain, so
            // the chain must exist for them.
            let wraps_chain = matches!(direct, Some(Direct::Wrapper(_)))
                || dict_only.is_some_and(|d| !d.saturated);
            let covered = |a: usize| {
                (direct.is_some() && a >= total)
                    || dict_only.is_some_and(|d| a >= d.arity)
            };
            let curried_zero = public || wraps_chain || usages.iter().any(|&a| !covered(a));

            OverloadPlan {
                curried_zero,
                direct,
                dict_only,
            }
        }
    }
}

/// The plan call sites assume for a binding of another module: every
/// shape an exported binding emits.
pub fn assumed_public_plan(arity: &Arity) -> OverloadPlan {
    plan_overloads(arity, &BTreeSet::new(), true, arity.total(), false)
}
