//! BEAM code generation for Vela core modules.
//!
//! This crate lowers a desugared functional core module into the target
//! runtime's instruction tree. It reconciles the source's fully curried
//! one-argument closures with the target's fixed-arity functions by
//! synthesizing only the call-shape overloads a module actually needs,
//! re-derives type information into target type annotations while
//! breaking recursive cycles, and compiles multi-clause pattern
//! matching with guards into the target's case/guard form.
//!
//! The whole pipeline is a pure, synchronous tree-to-tree translation:
//! one [`generate_module`] call per module, no state shared across
//! calls. The first hard error aborts the module with no partial
//! output; warnings accumulate and are returned with success.

pub mod arity;
mod expr;
mod pattern;
mod rename;
mod types;

#[cfg(test)]
mod codegen_tests;

use std::collections::{BTreeMap, BTreeSet};

use vela_beam::{
    atom_name, foreign_module_atom, module_atom, var_name, Atom, BeamExpr, FunDef, FunSpec,
    ModuleAttribute, TypeSpec,
};
use vela_core::{Expr, Meta, Module};
use vela_types::names::FnFamily;
use vela_types::{Qualified, TypeEnv};

pub use crate::arity::{
    arity_from_type, plan_overloads, scan_usages, Arity, CallShape, Direct, DictOverload,
    OverloadPlan, UsageMap,
};
pub use vela_diag::{Category, CodegenError, Diagnostic, Severity};

use crate::arity::assumed_public_plan;
use crate::expr::Lowerer;
use crate::types::{erase_free_vars, TypeTranslator};

// ---------------------------------------------------------------------------
// Options and context
// ---------------------------------------------------------------------------

/// Read-only configuration, passed down without mutation.
#[derive(Debug, Clone)]
pub struct CodegenOptions {
    /// Embed source names in generated temporaries (`x@7` rather than
    /// `v@7`), for readable output during debugging.
    pub readable_names: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            readable_names: true,
        }
    }
}

/// One foreign implementation symbol and the arity it is implemented
/// at, as measured from the companion foreign-code artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignImpl {
    pub name: String,
    pub arity: usize,
}

impl ForeignImpl {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }
}

/// Per-module generation context: the monotonic fresh-name counter and
/// the append-only warning log. Passed by mutable reference through
/// every stage; never global.
pub(crate) struct Context {
    module: String,
    readable_names: bool,
    counter: u64,
    warnings: Vec<Diagnostic>,
}

impl Context {
    fn new(module: String, options: &CodegenOptions) -> Self {
        Self {
            module,
            readable_names: options.readable_names,
            counter: 0,
            warnings: Vec::new(),
        }
    }

    /// A name no source identifier can collide with: `@` never occurs
    /// in source names but is legal in the target.
    pub(crate) fn fresh(&mut self, hint: &str) -> String {
        let n = self.counter;
        self.counter += 1;
        if self.readable_names && !hint.is_empty() {
            format!("{hint}@{n}")
        } else {
            format!("v@{n}")
        }
    }

    pub(crate) fn module_name(&self) -> &str {
        &self.module
    }

    pub(crate) fn warn(&mut self, diagnostic: Diagnostic) {
        self.warnings.push(diagnostic);
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Everything generated for one module.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleOutput {
    /// Exported (symbol, arity) pairs, in emission order.
    pub exports: Vec<(String, usize)>,
    /// Named type-spec declarations, one per resolved nominal type
    /// reachable from exported signatures.
    pub type_specs: Vec<TypeSpec>,
    /// Fun specs for foreign-imported symbols.
    pub foreign_specs: Vec<FunSpec>,
    /// Fun specs for exported bindings (their canonical arity-0 form).
    pub fun_specs: Vec<FunSpec>,
    /// Module attributes, including the export declaration.
    pub attributes: Vec<ModuleAttribute>,
    /// One definition per (name, arity), each with its lowered body —
    /// the form the external safety-wrapper pass consumes.
    pub definitions: Vec<FunDef>,
    /// Qualified symbol to dictionary-argument count, for every binding
    /// with a nonzero dictionary-free value arity; drives the external
    /// call-memoization facility.
    pub memo_hints: BTreeMap<Qualified, usize>,
    /// Non-fatal diagnostics, present even on success.
    pub warnings: Vec<Diagnostic>,
}

/// The safety-wrapper pass's result, appended verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct WrappedOutput {
    pub exports: Vec<(String, usize)>,
    pub definitions: Vec<FunDef>,
}

impl ModuleOutput {
    /// Pass-through contract for the external safety wrapper: its safe
    /// exports and wrapper definitions are appended unchanged.
    pub fn attach_wrapped(&mut self, wrapped: WrappedOutput) {
        self.exports.extend(wrapped.exports.iter().cloned());
        self.definitions.extend(wrapped.definitions);
        for attribute in &mut self.attributes {
            if let ModuleAttribute::Export(entries) = attribute {
                entries.extend(wrapped.exports.iter().cloned());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Module generation
// ---------------------------------------------------------------------------

/// Lowers one core module. Inputs are the module IR, the type
/// environment, the (symbol, implemented-arity) pairs the foreign-code
/// artifact provides, and read-only options.
pub fn generate_module(
    module: &Module,
    env: &TypeEnv,
    foreign_impls: &[ForeignImpl],
    options: &CodegenOptions,
) -> Result<ModuleOutput, CodegenError> {
    let module_display = module.name.to_string();
    let mut ctx = Context::new(module_display.clone(), options);

    // ---- Foreign-import bridge: validation ----
    let foreign_arities: BTreeMap<String, usize> = foreign_impls
        .iter()
        .map(|imp| (imp.name.clone(), imp.arity))
        .collect();

    let missing: Vec<String> = module
        .foreign
        .iter()
        .filter(|name| !foreign_arities.contains_key(*name))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(CodegenError::MissingForeignImplementations {
            module: module_display,
            symbols: missing,
        });
    }

    let declared: BTreeSet<&String> = module.foreign.iter().collect();
    let unused: Vec<String> = foreign_arities
        .keys()
        .filter(|name| !declared.contains(name))
        .cloned()
        .collect();
    if !unused.is_empty() {
        ctx.warn(
            Diagnostic::warning(
                Category::UnusedForeignImplementations,
                module_display.clone(),
                "foreign implementations supplied but never imported",
            )
            .with_symbols(unused),
        );
    }

    for name in &module.foreign {
        let q = Qualified::in_module(module.name.clone(), name.clone());
        let Some(ty) = env.lookup_name(&q) else {
            // No declared type, no arity check possible.
            continue;
        };
        let declared_total = arity_from_type(env, ty).total();
        let actual = foreign_arities[name];
        if actual > declared_total {
            return Err(CodegenError::InvalidForeignArity {
                module: module_display,
                symbol: name.clone(),
                actual,
                declared: declared_total,
            });
        }
    }

    // ---- Arity engine ----
    let usages = scan_usages(module, &foreign_arities);
    let mut arities: BTreeMap<Qualified, Arity> = env
        .names
        .iter()
        .map(|(q, ty)| (q.clone(), arity_from_type(env, ty)))
        .collect();
    for bind in &module.decls {
        for (name, _) in bind.bindings() {
            let q = Qualified::in_module(module.name.clone(), name);
            if !arities.contains_key(&q) {
                // Untyped binding: the largest observed application
                // count becomes the inferred value arity.
                let observed = usages
                    .get(&q)
                    .and_then(|set| set.iter().max().copied())
                    .unwrap_or(0);
                arities.insert(
                    q,
                    Arity::Curried {
                        dict: 0,
                        value: observed,
                    },
                );
            }
        }
    }

    // ---- Overload synthesizer: plans ----
    let exports_set: BTreeSet<&str> = module.exports.iter().map(String::as_str).collect();
    let empty_usages = BTreeSet::new();
    let mut plans: BTreeMap<String, OverloadPlan> = BTreeMap::new();
    for bind in &module.decls {
        for (name, expr) in bind.bindings() {
            let q = Qualified::in_module(module.name.clone(), name);
            let descriptor = arities[&q];
            let public = exports_set.contains(name);
            let dict_ctor = expr.ann().has_meta(&Meta::TypeClassConstructor);
            let lambdas = match expr {
                Expr::Constructor(_, _, _, fields) => fields.len(),
                other => other.lambda_count(),
            };
            plans.insert(
                name.to_string(),
                plan_overloads(
                    &descriptor,
                    usages.get(&q).unwrap_or(&empty_usages),
                    public,
                    lambdas,
                    dict_ctor,
                ),
            );
        }
    }
    for name in &module.foreign {
        let q = Qualified::in_module(module.name.clone(), name.clone());
        let plan = match arities.get(&q) {
            Some(descriptor) => assumed_public_plan(descriptor),
            None => OverloadPlan {
                curried_zero: true,
                direct: None,
                dict_only: None,
            },
        };
        plans.insert(name.clone(), plan);
    }

    // ---- Emission ----
    let mut definitions: Vec<FunDef> = Vec::new();
    let mut exports: Vec<(String, usize)> = Vec::new();
    let mut memo_hints: BTreeMap<Qualified, usize> = BTreeMap::new();

    for name in &module.foreign {
        let q = Qualified::in_module(module.name.clone(), name.clone());
        emit_foreign_binding(
            &mut ctx,
            module,
            name,
            foreign_arities[name],
            arities.get(&q),
            &mut definitions,
            &mut exports,
        );
        if let Some(descriptor) = arities.get(&q) {
            if descriptor.value() > 0 {
                memo_hints.insert(q, descriptor.dict());
            }
        }
    }

    for bind in &module.decls {
        for (name, body) in bind.bindings() {
            let q = Qualified::in_module(module.name.clone(), name);
            let plan = plans[name];
            if plan.is_empty() {
                continue;
            }
            emit_binding(
                &mut ctx,
                module,
                env,
                &arities,
                &plans,
                &foreign_arities,
                name,
                body,
                &plan,
                &mut definitions,
            );
            if exports_set.contains(name) {
                let fun_name = atom_name(name);
                for arity in plan.arities() {
                    exports.push((fun_name.clone(), arity));
                }
            }
            if let Arity::Curried { dict, value } = arities[&q] {
                if value > 0 {
                    memo_hints.insert(q, dict);
                }
            }
        }
    }

    // ---- Type translation ----
    let mut translator = TypeTranslator::new(env);
    let mut fun_specs = Vec::new();
    for bind in &module.decls {
        for (name, _) in bind.bindings() {
            if !exports_set.contains(name) {
                continue;
            }
            let q = Qualified::in_module(module.name.clone(), name);
            if let Some(ty) = env.lookup_name(&q) {
                fun_specs.push(FunSpec {
                    name: atom_name(name),
                    args: Vec::new(),
                    ret: translator.translate(ty),
                });
            }
        }
    }
    let mut foreign_specs = Vec::new();
    for name in &module.foreign {
        let q = Qualified::in_module(module.name.clone(), name.clone());
        if let Some(ty) = env.lookup_name(&q) {
            foreign_specs.push(FunSpec {
                name: atom_name(name),
                args: Vec::new(),
                ret: translator.translate(ty),
            });
        }
    }
    let type_specs: Vec<TypeSpec> = translator
        .into_specs()
        .into_iter()
        .map(|spec| TypeSpec {
            name: spec.name,
            ty: erase_free_vars(&spec.ty),
        })
        .collect();
    let erase_spec = |spec: FunSpec| FunSpec {
        name: spec.name,
        args: spec.args.iter().map(erase_free_vars).collect(),
        ret: erase_free_vars(&spec.ret),
    };
    let fun_specs: Vec<FunSpec> = fun_specs.into_iter().map(erase_spec).collect();
    let foreign_specs: Vec<FunSpec> = foreign_specs.into_iter().map(erase_spec).collect();

    let attributes = vec![
        ModuleAttribute::Module(module_atom(&module.name)),
        ModuleAttribute::Export(exports.clone()),
        ModuleAttribute::Compile("no_auto_import".to_string()),
    ];

    Ok(ModuleOutput {
        exports,
        type_specs,
        foreign_specs,
        fun_specs,
        attributes,
        definitions,
        memo_hints,
        warnings: ctx.warnings,
    })
}

// ---------------------------------------------------------------------------
// Binding emission
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn emit_binding(
    ctx: &mut Context,
    module: &Module,
    env: &TypeEnv,
    arities: &BTreeMap<Qualified, Arity>,
    plans: &BTreeMap<String, OverloadPlan>,
    foreign_arities: &BTreeMap<String, usize>,
    name: &str,
    body: &Expr,
    plan: &OverloadPlan,
    definitions: &mut Vec<FunDef>,
) {
    let fun_name = atom_name(name);
    let local = Atom::local(fun_name.clone());

    if plan.curried_zero {
        let zero_body = match plan.direct {
            Some(Direct::Saturated(k)) => recurried_chain(ctx, &local, k, None),
            Some(Direct::Uncurried(family, k)) => {
                recurried_chain(ctx, &local, k, Some(family))
            }
            _ => {
                let mut lw =
                    Lowerer::new(&module.name, env, arities, plans, foreign_arities, ctx);
                lw.lower_expr(body)
            }
        };
        definitions.push(FunDef::new(fun_name.clone(), Vec::new(), zero_body));
    }

    if let Some(dict) = plan.dict_only {
        let def = if dict.saturated {
            let mut lw = Lowerer::new(&module.name, env, arities, plans, foreign_arities, ctx);
            let (params, lowered) = lw.lower_saturated(body, dict.arity);
            FunDef::new(fun_name.clone(), params, lowered)
        } else {
            chain_wrapper(ctx, &fun_name, &local, dict.arity)
        };
        definitions.push(def);
    }

    if let Some(direct) = plan.direct {
        let def = match direct {
            Direct::Saturated(k) => {
                let mut lw =
                    Lowerer::new(&module.name, env, arities, plans, foreign_arities, ctx);
                let (params, lowered) = lw.lower_saturated(body, k);
                FunDef::new(fun_name.clone(), params, lowered)
            }
            Direct::Wrapper(k) => chain_wrapper(ctx, &fun_name, &local, k),
            Direct::Uncurried(_, k) => {
                // Uncurrying: the runtime representation of a family
                // value is a k-ary fun; apply it to all arguments at
                // once.
                let mut lw =
                    Lowerer::new(&module.name, env, arities, plans, foreign_arities, ctx);
                let value = lw.lower_expr(body);
                let params: Vec<String> =
                    (0..k).map(|_| var_name(&ctx.fresh("x"))).collect();
                let call = BeamExpr::call_value(
                    value,
                    params.iter().cloned().map(BeamExpr::Var).collect(),
                );
                FunDef::new(fun_name.clone(), params, call)
            }
        };
        definitions.push(def);
    }
}

/// The thin arity-0 wrapper that re-curries a direct overload. For the
/// effectful family the innermost step is a thunk, since an effectful
/// value is a nullary fun until run.
fn recurried_chain(
    ctx: &mut Context,
    target: &Atom,
    arity: usize,
    family: Option<FnFamily>,
) -> BeamExpr {
    let params: Vec<String> = (0..arity).map(|_| var_name(&ctx.fresh("x"))).collect();
    let call = BeamExpr::call(
        target.clone(),
        params.iter().cloned().map(BeamExpr::Var).collect(),
    );
    let innermost = match family {
        Some(FnFamily::Effect) => BeamExpr::fun0(call),
        _ => call,
    };
    BeamExpr::curried(params, innermost)
}

/// The opposite-shape wrapper: an uncurried definition that re-enters
/// the curried chain one argument at a time.
fn chain_wrapper(ctx: &mut Context, fun_name: &str, local: &Atom, arity: usize) -> FunDef {
    let params: Vec<String> = (0..arity).map(|_| var_name(&ctx.fresh("x"))).collect();
    let chain = BeamExpr::call(local.clone(), Vec::new());
    let body = BeamExpr::apply_curried(
        chain,
        params.iter().cloned().map(BeamExpr::Var).collect(),
    );
    FunDef::new(fun_name, params, body)
}

// ---------------------------------------------------------------------------
// Foreign-import bridge: emission
// ---------------------------------------------------------------------------

/// Re-exposes a foreign implementation under the module's own name: the
/// canonical curried form plus, when the declared type is known, the
/// same direct shapes an exported binding would carry.
fn emit_foreign_binding(
    ctx: &mut Context,
    module: &Module,
    name: &str,
    impl_arity: usize,
    descriptor: Option<&Arity>,
    definitions: &mut Vec<FunDef>,
    exports: &mut Vec<(String, usize)>,
) {
    let fun_name = atom_name(name);
    let local = Atom::local(fun_name.clone());
    let foreign = Atom::remote(foreign_module_atom(&module.name), fun_name.clone());

    // The curried wrapper: as many one-argument closures as the
    // implementation consumes, then the direct foreign call. The
    // implementation may itself return a further function.
    let params: Vec<String> = (0..impl_arity)
        .map(|_| var_name(&ctx.fresh("x")))
        .collect();
    let call = BeamExpr::call(
        foreign.clone(),
        params.iter().cloned().map(BeamExpr::Var).collect(),
    );
    definitions.push(FunDef::new(
        fun_name.clone(),
        Vec::new(),
        BeamExpr::curried(params, call),
    ));
    exports.push((fun_name.clone(), 0));

    let Some(descriptor) = descriptor else {
        return;
    };
    let total = descriptor.total();
    if total > 0 {
        definitions.push(foreign_overload(ctx, &fun_name, &local, &foreign, impl_arity, total));
        exports.push((fun_name.clone(), total));
    }
    if descriptor.dict() > 0 && descriptor.value() > 0 && descriptor.dict() != total {
        let dict = descriptor.dict();
        definitions.push(foreign_overload(ctx, &fun_name, &local, &foreign, impl_arity, dict));
        exports.push((fun_name.clone(), dict));
    }
}

fn foreign_overload(
    ctx: &mut Context,
    fun_name: &str,
    local: &Atom,
    foreign: &Atom,
    impl_arity: usize,
    arity: usize,
) -> FunDef {
    let params: Vec<String> = (0..arity).map(|_| var_name(&ctx.fresh("x"))).collect();
    let vars: Vec<BeamExpr> = params.iter().cloned().map(BeamExpr::Var).collect();
    let body = if arity >= impl_arity {
        let call = BeamExpr::call(foreign.clone(), vars[..impl_arity].to_vec());
        BeamExpr::apply_curried(call, vars[impl_arity..].to_vec())
    } else {
        // Not enough arguments to saturate the implementation; go
        // through the curried chain.
        BeamExpr::apply_curried(BeamExpr::call(local.clone(), Vec::new()), vars)
    };
    FunDef::new(fun_name, params, body)
}
