//! Recursive lowering of core expressions into target trees.
//!
//! One lowerer is built per emitted definition. It threads the shared
//! generation context (fresh names, warnings) and consults the arity
//! table and overload plans to pick a call shape at every application.

use std::collections::BTreeMap;

use vela_beam::{
    atom_name, foreign_module_atom, module_atom, var_name, Atom, BeamExpr,
};
use vela_core::{Ann, Bind, Expr, Literal, Meta};
use vela_types::{ModuleName, Qualified, TypeEnv};

use crate::arity::{assumed_public_plan, Arity, CallShape, OverloadPlan};
use crate::pattern;
use crate::Context;

pub(crate) struct Lowerer<'a> {
    pub(crate) module: &'a ModuleName,
    pub(crate) env: &'a TypeEnv,
    pub(crate) arities: &'a BTreeMap<Qualified, Arity>,
    pub(crate) plans: &'a BTreeMap<String, OverloadPlan>,
    pub(crate) foreign_arities: &'a BTreeMap<String, usize>,
    pub(crate) ctx: &'a mut Context,
    /// Source name of each local in scope, to its target variable.
    locals: BTreeMap<String, String>,
    /// Local names rewritten to whole expressions (letrec slots).
    replacements: BTreeMap<String, BeamExpr>,
}

pub(crate) struct Scope {
    locals: BTreeMap<String, String>,
    replacements: BTreeMap<String, BeamExpr>,
}

impl<'a> Lowerer<'a> {
    pub(crate) fn new(
        module: &'a ModuleName,
        env: &'a TypeEnv,
        arities: &'a BTreeMap<Qualified, Arity>,
        plans: &'a BTreeMap<String, OverloadPlan>,
        foreign_arities: &'a BTreeMap<String, usize>,
        ctx: &'a mut Context,
    ) -> Self {
        Self {
            module,
            env,
            arities,
            plans,
            foreign_arities,
            ctx,
            locals: BTreeMap::new(),
            replacements: BTreeMap::new(),
        }
    }

    pub(crate) fn enter_scope(&mut self) -> Scope {
        Scope {
            locals: self.locals.clone(),
            replacements: self.replacements.clone(),
        }
    }

    pub(crate) fn exit_scope(&mut self, scope: Scope) {
        self.locals = scope.locals;
        self.replacements = scope.replacements;
    }

    /// Brings a source name into scope, freshening the target variable
    /// when the name would otherwise collide with one already bound
    /// (target variables cannot be rebound).
    pub(crate) fn bind_local(&mut self, source: &str) -> String {
        let target = if self.locals.contains_key(source) {
            var_name(&self.ctx.fresh(source))
        } else {
            var_name(source)
        };
        self.locals.insert(source.to_string(), target.clone());
        self.replacements.remove(source);
        target
    }

    /// Registers an already-fresh name (from hygienic renaming) without
    /// another freshening round.
    pub(crate) fn register_fresh(&mut self, source: &str) -> String {
        let target = var_name(source);
        self.locals.insert(source.to_string(), target.clone());
        target
    }

    pub(crate) fn local_target(&self, source: &str) -> String {
        self.locals
            .get(source)
            .cloned()
            .unwrap_or_else(|| var_name(source))
    }

    fn is_self_module(&self, q: &Qualified) -> bool {
        q.module.as_ref() == Some(self.module)
    }

    fn fun_atom(&self, q: &Qualified) -> Atom {
        let name = atom_name(&q.name);
        match &q.module {
            Some(m) if m != self.module => Atom::remote(module_atom(m), name),
            _ => Atom::local(name),
        }
    }

    fn plan_for(&self, q: &Qualified) -> OverloadPlan {
        if self.is_self_module(q) {
            if let Some(plan) = self.plans.get(&q.name) {
                return *plan;
            }
        }
        match self.arities.get(q) {
            Some(arity) => assumed_public_plan(arity),
            None => OverloadPlan {
                curried_zero: true,
                direct: None,
                dict_only: None,
            },
        }
    }

    // -----------------------------------------------------------------
    // Expression dispatch
    // -----------------------------------------------------------------

    pub(crate) fn lower_expr(&mut self, expr: &Expr) -> BeamExpr {
        match expr {
            Expr::Literal(_, lit) => self.lower_literal(lit),
            Expr::Constructor(ann, _, ctor, fields) => {
                self.lower_constructor_decl(ann, ctor, fields)
            }
            Expr::ConstructorRef(_, q) => self.lower_ctor_value(q),
            Expr::Accessor(_, field, inner) => {
                let value = self.lower_expr(inner);
                BeamExpr::call(
                    Atom::remote("maps", "get"),
                    vec![BeamExpr::atom(atom_name(field)), value],
                )
            }
            Expr::RecordUpdate(_, base, fields) => {
                let base = self.lower_expr(base);
                let updates = fields
                    .iter()
                    .map(|(label, value)| {
                        (BeamExpr::atom(atom_name(label)), self.lower_expr(value))
                    })
                    .collect();
                BeamExpr::MapUpdate(Box::new(base), updates)
            }
            Expr::Abs(_, param, body) => {
                let scope = self.enter_scope();
                let target = self.bind_local(param);
                let lowered = self.lower_expr(body);
                self.exit_scope(scope);
                BeamExpr::fun1(target, lowered)
            }
            Expr::App(..) => self.lower_app(expr),
            Expr::Var(ann, q) => {
                if q.is_local() {
                    if let Some(replacement) = self.replacements.get(&q.name) {
                        return replacement.clone();
                    }
                    BeamExpr::Var(self.local_target(&q.name))
                } else {
                    self.lower_top_level_value(ann, q)
                }
            }
            Expr::Case(_, scrutinees, alternatives) => {
                pattern::lower_case(self, scrutinees, alternatives)
            }
            Expr::Let(_, binds, body) => {
                let scope = self.enter_scope();
                let mut stmts = Vec::new();
                for bind in binds {
                    match bind {
                        Bind::NonRec(name, rhs) => {
                            // The right-hand side sees the outer scope.
                            let value = self.lower_expr(rhs);
                            let target = self.bind_local(name);
                            stmts.push(BeamExpr::bind(BeamExpr::Var(target), value));
                        }
                        Bind::Rec(group) => self.lower_letrec(group, &mut stmts),
                    }
                }
                let result = self.lower_expr(body);
                self.exit_scope(scope);
                BeamExpr::block(stmts, result)
            }
        }
    }

    fn lower_literal(&mut self, lit: &Literal<Expr>) -> BeamExpr {
        match lit {
            Literal::Int(n) => BeamExpr::Integer(*n),
            Literal::Float(x) => BeamExpr::Float(*x),
            Literal::Char(c) => BeamExpr::Char(*c),
            Literal::String(s) => BeamExpr::Binary(s.clone()),
            Literal::Boolean(b) => BeamExpr::atom(if *b { "true" } else { "false" }),
            Literal::Array(items) => {
                let elems = items.iter().map(|e| self.lower_expr(e)).collect();
                BeamExpr::call(
                    Atom::remote("array", "from_list"),
                    vec![BeamExpr::List(elems)],
                )
            }
            Literal::Object(fields) => BeamExpr::Map(
                fields
                    .iter()
                    .map(|(label, value)| {
                        (BeamExpr::atom(atom_name(label)), self.lower_expr(value))
                    })
                    .collect(),
            ),
        }
    }

    // -----------------------------------------------------------------
    // Constructors
    // -----------------------------------------------------------------

    /// Lowers a constructor-declaration body (the right-hand side of the
    /// binding the frontend synthesizes per constructor).
    fn lower_constructor_decl(
        &mut self,
        ann: &Ann,
        ctor: &str,
        fields: &[String],
    ) -> BeamExpr {
        if ann.has_meta(&Meta::Newtype) {
            let param = var_name(fields.first().map(String::as_str).unwrap_or("x"));
            return BeamExpr::fun1(param.clone(), BeamExpr::Var(param));
        }
        let params: Vec<String> = fields.iter().map(|f| var_name(f)).collect();
        let mut elems = vec![BeamExpr::atom(atom_name(ctor))];
        elems.extend(params.iter().cloned().map(BeamExpr::Var));
        BeamExpr::curried(params, BeamExpr::Tuple(elems))
    }

    /// Lowers a reference to a constructor used as a value: a curried
    /// chain ending in the tagged tuple, or identity for newtypes.
    fn lower_ctor_value(&mut self, q: &Qualified) -> BeamExpr {
        if self.env.is_newtype_ctor(q) {
            let param = var_name(&self.ctx.fresh("x"));
            return BeamExpr::fun1(param.clone(), BeamExpr::Var(param));
        }
        let field_count = self
            .env
            .lookup_ctor(q)
            .map(|sig| sig.arity())
            .unwrap_or(0);
        let params: Vec<String> = (0..field_count)
            .map(|_| var_name(&self.ctx.fresh("x")))
            .collect();
        let mut elems = vec![BeamExpr::atom(atom_name(&q.name))];
        elems.extend(params.iter().cloned().map(BeamExpr::Var));
        BeamExpr::curried(params, BeamExpr::Tuple(elems))
    }

    /// Lowers a constructor application with `args` already lowered.
    fn lower_ctor_app(&mut self, q: &Qualified, mut args: Vec<BeamExpr>) -> BeamExpr {
        if self.env.is_newtype_ctor(q) {
            // Newtype construction is fully erased.
            let wrapped = args.remove(0);
            return BeamExpr::apply_curried(wrapped, args);
        }
        let field_count = self
            .env
            .lookup_ctor(q)
            .map(|sig| sig.arity())
            .unwrap_or(args.len());
        if args.len() >= field_count {
            let surplus = args.split_off(field_count);
            let mut elems = vec![BeamExpr::atom(atom_name(&q.name))];
            elems.extend(args);
            BeamExpr::apply_curried(BeamExpr::Tuple(elems), surplus)
        } else {
            let chain = self.lower_ctor_value(q);
            BeamExpr::apply_curried(chain, args)
        }
    }

    // -----------------------------------------------------------------
    // Applications and top-level references
    // -----------------------------------------------------------------

    fn lower_app(&mut self, expr: &Expr) -> BeamExpr {
        let (head, args) = expr.unapply();
        let lowered: Vec<BeamExpr> = args.iter().map(|a| self.lower_expr(a)).collect();

        match head {
            Expr::Constructor(ann, _, ctor, fields) => {
                if ann.has_meta(&Meta::Newtype) {
                    let mut rest = lowered;
                    let wrapped = rest.remove(0);
                    return BeamExpr::apply_curried(wrapped, rest);
                }
                let mut args = lowered;
                if args.len() >= fields.len() {
                    let surplus = args.split_off(fields.len());
                    let mut elems = vec![BeamExpr::atom(atom_name(ctor))];
                    elems.extend(args);
                    BeamExpr::apply_curried(BeamExpr::Tuple(elems), surplus)
                } else {
                    let chain = self.lower_constructor_decl(ann, ctor, fields);
                    BeamExpr::apply_curried(chain, args)
                }
            }
            Expr::ConstructorRef(_, q) => self.lower_ctor_app(q, lowered),
            Expr::Var(ann, q) if !q.is_local() => {
                if matches!(ann.meta, Some(Meta::Constructor) | Some(Meta::Newtype)) {
                    return self.lower_ctor_app(q, lowered);
                }
                if ann.has_meta(&Meta::TypeClassConstructor) {
                    // Dictionary construction: a direct call, with
                    // self-qualification stripped inside the defining
                    // module so the target can inline it.
                    return BeamExpr::call(self.fun_atom(q), lowered);
                }
                if self.is_self_module(q) {
                    if let Some(&impl_arity) = self.foreign_arities.get(&q.name) {
                        if lowered.len() >= impl_arity {
                            // A fully saturated foreign call bypasses
                            // the curried wrapper.
                            let mut args = lowered;
                            let surplus = args.split_off(impl_arity);
                            let call = BeamExpr::call(
                                Atom::remote(
                                    foreign_module_atom(self.module),
                                    atom_name(&q.name),
                                ),
                                args,
                            );
                            return BeamExpr::apply_curried(call, surplus);
                        }
                    }
                }
                let plan = self.plan_for(q);
                match plan.call_shape(lowered.len()) {
                    CallShape::Direct(k) | CallShape::DictOnly(k) => {
                        let mut args = lowered;
                        let surplus = args.split_off(k);
                        let call = BeamExpr::call(self.fun_atom(q), args);
                        BeamExpr::apply_curried(call, surplus)
                    }
                    CallShape::CurriedChain => {
                        let chain = BeamExpr::call(self.fun_atom(q), vec![]);
                        BeamExpr::apply_curried(chain, lowered)
                    }
                }
            }
            other => {
                let callee = self.lower_expr(other);
                BeamExpr::apply_curried(callee, lowered)
            }
        }
    }

    /// A top-level binding referenced as a bare value.
    fn lower_top_level_value(&mut self, ann: &Ann, q: &Qualified) -> BeamExpr {
        if matches!(ann.meta, Some(Meta::Constructor) | Some(Meta::Newtype)) {
            return self.lower_ctor_value(q);
        }
        let plan = self.plan_for(q);
        match self.arities.get(q) {
            Some(Arity::Fixed(_, k)) => BeamExpr::FunRef(self.fun_atom(q), *k),
            Some(arity @ Arity::Curried { .. })
                if arity.total() == 1 && plan.direct.is_some() =>
            {
                BeamExpr::FunRef(self.fun_atom(q), 1)
            }
            _ => BeamExpr::call(self.fun_atom(q), vec![]),
        }
    }

    // -----------------------------------------------------------------
    // Mutual recursion
    // -----------------------------------------------------------------

    /// Lowers a local recursive group into the self-application fixed
    /// point: one tuple of slot functions, each taking the whole tuple
    /// and returning its real closure, then each name bound to its own
    /// slot applied to the tuple.
    fn lower_letrec(&mut self, group: &[(String, Expr)], stmts: &mut Vec<BeamExpr>) {
        let element = |index: usize, tuple: &str| {
            BeamExpr::call(
                Atom::remote("erlang", "element"),
                vec![BeamExpr::Integer(index as i64 + 1), BeamExpr::var(tuple)],
            )
        };

        let tuple_var = var_name(&self.ctx.fresh("letrec"));

        // Phase one: declare. Every slot closes only over the tuple
        // parameter, so no binding needs to exist yet.
        let mut slots = Vec::with_capacity(group.len());
        for (_, rhs) in group {
            let self_var = var_name(&self.ctx.fresh("self"));
            let scope = self.enter_scope();
            for (index, (sibling, _)) in group.iter().enumerate() {
                let slot = BeamExpr::call_value(
                    element(index, &self_var),
                    vec![BeamExpr::var(self_var.clone())],
                );
                self.locals.remove(sibling);
                self.replacements.insert(sibling.clone(), slot);
            }
            let body = self.lower_expr(rhs);
            self.exit_scope(scope);
            slots.push(BeamExpr::fun1(self_var, body));
        }
        stmts.push(BeamExpr::bind(
            BeamExpr::var(tuple_var.clone()),
            BeamExpr::Tuple(slots),
        ));

        // Phase two: define. Each binding is its own slot applied to
        // the completed tuple.
        for (index, (name, _)) in group.iter().enumerate() {
            let target = self.bind_local(name);
            stmts.push(BeamExpr::bind(
                BeamExpr::var(target),
                BeamExpr::call_value(
                    element(index, &tuple_var),
                    vec![BeamExpr::var(tuple_var.clone())],
                ),
            ));
        }
    }

    // -----------------------------------------------------------------
    // Saturated bodies for direct overloads
    // -----------------------------------------------------------------

    /// Strips up to `k` leading closures, returning their parameters and
    /// the lowered remainder. Constructor declarations expose their
    /// field names as parameters.
    pub(crate) fn lower_saturated(&mut self, expr: &Expr, k: usize) -> (Vec<String>, BeamExpr) {
        if let Expr::Constructor(ann, _, ctor, fields) = expr {
            let scope = self.enter_scope();
            let params: Vec<String> = fields.iter().map(|f| self.bind_local(f)).collect();
            let body = if ann.has_meta(&Meta::Newtype) {
                BeamExpr::Var(params.first().cloned().unwrap_or_else(|| var_name("x")))
            } else {
                let mut elems = vec![BeamExpr::atom(atom_name(ctor))];
                elems.extend(params.iter().cloned().map(BeamExpr::Var));
                BeamExpr::Tuple(elems)
            };
            self.exit_scope(scope);
            return (params, body);
        }

        let scope = self.enter_scope();
        let mut params = Vec::with_capacity(k);
        let mut current = expr;
        while params.len() < k {
            match current {
                Expr::Abs(_, param, body) => {
                    params.push(self.bind_local(param));
                    current = body;
                }
                _ => break,
            }
        }
        let mut body = self.lower_expr(current);
        if params.len() < k {
            // Fewer syntactic closures than requested: pass the
            // remaining parameters through the chain one at a time.
            let extra: Vec<String> = (params.len()..k)
                .map(|_| var_name(&self.ctx.fresh("x")))
                .collect();
            body = BeamExpr::apply_curried(
                body,
                extra.iter().cloned().map(BeamExpr::Var).collect(),
            );
            params.extend(extra);
        }
        self.exit_scope(scope);
        (params, body)
    }
}
