//! Behavior tests for whole-module generation: overload synthesis,
//! call-shape selection, foreign bridging, pattern dispatch, and the
//! output contract.

use std::collections::BTreeSet;

use proptest::prelude::*;
use vela_beam::{Atom, BeamExpr, CallTarget, FunDef, ModuleAttribute};
use vela_core::{
    Ann, Bind, Binder, CaseAlternative, CaseResult, Expr, Literal, Meta, Module,
};
use vela_types::names::{self, prim, FnFamily};
use vela_types::{Constraint, CtorSig, CtorTag, ModuleName, Qualified, Type, TypeDecl, TypeEnv};

use crate::arity::{plan_overloads, Arity, CallShape, Direct};
use crate::{generate_module, Category, CodegenError, CodegenOptions, ForeignImpl, ModuleOutput, WrappedOutput};

fn mname() -> ModuleName {
    ModuleName::from_dotted("Data.Queue")
}

fn q(name: &str) -> Qualified {
    Qualified::in_module(mname(), name)
}

fn int() -> Type {
    prim("Int")
}

fn int_fun(arity: usize) -> Type {
    let mut ty = int();
    for _ in 0..arity {
        ty = Type::fun(int(), ty);
    }
    ty
}

fn module(exports: &[&str], foreign: &[&str], decls: Vec<Bind>) -> Module {
    Module {
        name: mname(),
        exports: exports.iter().map(|s| s.to_string()).collect(),
        foreign: foreign.iter().map(|s| s.to_string()).collect(),
        decls,
    }
}

fn generate(module: &Module, env: &TypeEnv, foreign: &[ForeignImpl]) -> ModuleOutput {
    generate_module(module, env, foreign, &CodegenOptions::default())
        .expect("module generation succeeds")
}

fn def<'a>(out: &'a ModuleOutput, name: &str, arity: usize) -> &'a FunDef {
    out.definitions
        .iter()
        .find(|d| d.name == name && d.arity() == arity)
        .unwrap_or_else(|| {
            let shapes: Vec<(&str, usize)> = out
                .definitions
                .iter()
                .map(|d| (d.name.as_str(), d.arity()))
                .collect();
            panic!("no definition {name}/{arity}; have {shapes:?}")
        })
}

fn def_arities(out: &ModuleOutput, name: &str) -> Vec<usize> {
    let mut arities: Vec<usize> = out
        .definitions
        .iter()
        .filter(|d| d.name == name)
        .map(|d| d.arity())
        .collect();
    arities.sort_unstable();
    arities
}

fn local_call(name: &str, args: Vec<BeamExpr>) -> BeamExpr {
    BeamExpr::call(Atom::local(name), args)
}

// ---------------------------------------------------------------------------
// Overload synthesis and call shapes
// ---------------------------------------------------------------------------

#[test]
fn over_applied_binding_gets_a_callable_form_at_its_full_arity() {
    // inc has declared value arity 1 but is invoked at arity 2; the
    // call site must reach inc/1 and apply the surplus to its result.
    let mut env = TypeEnv::new();
    env.register_name(q("inc"), int_fun(1));
    env.register_name(q("caller"), int_fun(2));

    let inc_body = Expr::abs("x", Expr::local_var("x"));
    let caller_body = Expr::abs(
        "a",
        Expr::abs(
            "b",
            Expr::app(
                Expr::app(Expr::var(q("inc")), Expr::local_var("a")),
                Expr::local_var("b"),
            ),
        ),
    );
    let m = module(
        &["caller"],
        &[],
        vec![
            Bind::NonRec("inc".into(), inc_body),
            Bind::NonRec("caller".into(), caller_body),
        ],
    );

    let out = generate(&m, &env, &[]);

    // inc: private, only the full-arity shape is needed.
    assert_eq!(def_arities(&out, "inc"), vec![1]);

    let body = &def(&out, "caller", 2).body;
    let expected = BeamExpr::call_value(
        local_call("inc", vec![BeamExpr::var("A")]),
        vec![BeamExpr::var("B")],
    );
    assert_eq!(body, &expected);
}

#[test]
fn exported_bindings_recurry_their_direct_overload() {
    let mut env = TypeEnv::new();
    env.register_name(q("caller"), int_fun(2));
    let caller_body = Expr::abs("a", Expr::abs("b", Expr::local_var("a")));
    let m = module(
        &["caller"],
        &[],
        vec![Bind::NonRec("caller".into(), caller_body)],
    );

    let out = generate(&m, &env, &[]);
    assert_eq!(def_arities(&out, "caller"), vec![0, 2]);
    assert_eq!(
        out.exports,
        vec![("caller".to_string(), 0), ("caller".to_string(), 2)]
    );

    // caller/0 is the thin wrapper: fun(P1) -> fun(P2) -> caller(P1, P2).
    let zero = &def(&out, "caller", 0).body;
    let BeamExpr::Fun(outer) = zero else {
        panic!("expected a fun, got {zero:?}");
    };
    let BeamExpr::Fun(inner) = &outer[0].body else {
        panic!("expected a nested fun");
    };
    let BeamExpr::Call(CallTarget::Named(target), args) = &inner[0].body else {
        panic!("expected a direct call");
    };
    assert_eq!(target, &Atom::local("caller"));
    assert_eq!(args.len(), 2);
    assert_eq!(args[0], outer[0].params[0]);
    assert_eq!(args[1], inner[0].params[0]);
}

#[test]
fn dead_private_bindings_are_omitted_entirely() {
    let mut env = TypeEnv::new();
    env.register_name(q("helper"), int_fun(1));
    let m = module(
        &[],
        &[],
        vec![Bind::NonRec(
            "helper".into(),
            Expr::abs("x", Expr::local_var("x")),
        )],
    );
    let out = generate(&m, &env, &[]);
    assert!(out.definitions.is_empty());
    assert!(out.exports.is_empty());
}

#[test]
fn value_only_usage_emits_just_the_curried_form() {
    let mut env = TypeEnv::new();
    env.register_name(q("entry"), int());
    let m = module(
        &["entry"],
        &[],
        vec![
            Bind::NonRec("shared".into(), Expr::Literal(Ann::empty(), Literal::Int(7))),
            Bind::NonRec("entry".into(), Expr::var(q("shared"))),
        ],
    );
    let out = generate(&m, &env, &[]);
    assert_eq!(def_arities(&out, "shared"), vec![0]);
    assert_eq!(def(&out, "entry", 0).body, local_call("shared", vec![]));
}

#[test]
fn dictionary_split_call_sites_use_the_dict_overload() {
    // elem :: Eq a => a -> List a -> Bool, partially applied to its
    // dictionary at one call site.
    let mut env = TypeEnv::new();
    let eq_dict = Constraint {
        class: Qualified::from_dotted("Vela.Data.Eq", "Eq"),
        args: vec![Type::Var("a".into())],
    };
    env.register_name(
        q("elem"),
        Type::forall(
            "a",
            Type::constrained(eq_dict, Type::fun(int(), Type::fun(int(), prim("Bool")))),
        ),
    );
    env.register_name(q("use_it"), int_fun(0));

    let elem_body = Expr::abs(
        "dict",
        Expr::abs("x", Expr::abs("xs", Expr::local_var("x"))),
    );
    let use_body = Expr::app(Expr::var(q("elem")), Expr::local_var("d"));
    let m = module(
        &["use_it"],
        &[],
        vec![
            Bind::NonRec("elem".into(), elem_body),
            Bind::NonRec("use_it".into(), Expr::abs("d", use_body)),
        ],
    );

    let out = generate(&m, &env, &[]);
    // Dictionary-only overload at arity 1, no full-arity use recorded.
    assert_eq!(def_arities(&out, "elem"), vec![1]);
    assert_eq!(out.memo_hints.get(&q("elem")), Some(&1));

    let use_def = def(&out, "use_it", 0);
    let BeamExpr::Fun(clauses) = &use_def.body else {
        panic!("expected the curried lambda");
    };
    assert_eq!(
        clauses[0].body,
        local_call("elem", vec![BeamExpr::var("D")])
    );
}

#[test]
fn fixed_arity_family_bindings_apply_the_runtime_value_at_once() {
    let mut env = TypeEnv::new();
    let fn2 = Type::app(
        Type::app(
            Type::app(
                Type::Con(Qualified::from_dotted(names::FN_UNCURRIED, "Fn2")),
                int(),
            ),
            int(),
        ),
        int(),
    );
    env.register_name(q("add2"), fn2);
    let m = module(
        &["add2"],
        &[],
        vec![Bind::NonRec("add2".into(), Expr::var(q("impl_value")))],
    );
    let out = generate(&m, &env, &[]);
    assert_eq!(def_arities(&out, "add2"), vec![0, 2]);

    // add2/2 applies the runtime value to both arguments at once.
    let direct = def(&out, "add2", 2);
    let BeamExpr::Call(CallTarget::Dynamic(_), args) = &direct.body else {
        panic!("expected a dynamic call, got {:?}", direct.body);
    };
    assert_eq!(args.len(), 2);

    // add2/0 re-curries add2/2 without an effect thunk.
    let zero = &def(&out, "add2", 0).body;
    let BeamExpr::Fun(outer) = zero else {
        panic!("expected a fun");
    };
    let BeamExpr::Fun(inner) = &outer[0].body else {
        panic!("expected a nested fun");
    };
    assert!(matches!(
        inner[0].body,
        BeamExpr::Call(CallTarget::Named(_), _)
    ));
}

#[test]
fn effectful_family_recurrying_ends_in_a_thunk() {
    let mut env = TypeEnv::new();
    let eff_fn1 = Type::app(
        Type::app(
            Type::Con(Qualified::from_dotted(names::EFFECT_FN_UNCURRIED, "EffectFn1")),
            int(),
        ),
        int(),
    );
    env.register_name(q("emit"), eff_fn1);
    let m = module(
        &["emit"],
        &[],
        vec![Bind::NonRec("emit".into(), Expr::var(q("impl_value")))],
    );
    let out = generate(&m, &env, &[]);

    let zero = &def(&out, "emit", 0).body;
    let BeamExpr::Fun(outer) = zero else {
        panic!("expected a fun");
    };
    // The innermost step is a nullary fun wrapping the direct call.
    let BeamExpr::Fun(thunk) = &outer[0].body else {
        panic!("expected a thunk, got {:?}", outer[0].body);
    };
    assert!(thunk[0].params.is_empty());
    assert!(matches!(
        thunk[0].body,
        BeamExpr::Call(CallTarget::Named(_), _)
    ));
}

#[test]
fn bare_references_pick_fun_refs_or_the_chain() {
    let mut env = TypeEnv::new();
    let fn2 = Type::app(
        Type::app(
            Type::app(
                Type::Con(Qualified::from_dotted(names::FN_UNCURRIED, "Fn2")),
                int(),
            ),
            int(),
        ),
        int(),
    );
    env.register_name(q("add2"), fn2);
    env.register_name(q("inc"), int_fun(1));
    env.register_name(q("pair"), int_fun(2));
    env.register_name(q("use_it"), int());

    let tuple_body = Expr::Literal(
        Ann::empty(),
        Literal::Array(vec![
            Expr::var(q("add2")),
            Expr::var(q("inc")),
            Expr::var(q("pair")),
        ]),
    );
    let m = module(
        &["use_it", "add2", "inc", "pair"],
        &[],
        vec![
            Bind::NonRec("add2".into(), Expr::var(q("impl_value"))),
            Bind::NonRec("inc".into(), Expr::abs("x", Expr::local_var("x"))),
            Bind::NonRec(
                "pair".into(),
                Expr::abs("a", Expr::abs("b", Expr::local_var("a"))),
            ),
            Bind::NonRec("use_it".into(), tuple_body),
        ],
    );
    let out = generate(&m, &env, &[]);

    let body = &def(&out, "use_it", 0).body;
    let BeamExpr::Call(CallTarget::Named(from_list), args) = body else {
        panic!("expected array:from_list, got {body:?}");
    };
    assert_eq!(from_list, &Atom::remote("array", "from_list"));
    let BeamExpr::List(items) = &args[0] else {
        panic!("expected a list literal");
    };
    // Fixed-arity: a fun reference at the family arity.
    assert_eq!(items[0], BeamExpr::FunRef(Atom::local("add2"), 2));
    // Arity-1 curried with a direct overload: a fun reference.
    assert_eq!(items[1], BeamExpr::FunRef(Atom::local("inc"), 1));
    // Higher curried arity: retrieve the chain.
    assert_eq!(items[2], local_call("pair", vec![]));
}

#[test]
fn dictionary_constructions_call_directly_with_local_qualification() {
    let mut env = TypeEnv::new();
    env.register_name(q("mk"), int_fun(1));
    let dict_body = Expr::abs(
        "s",
        Expr::abs(
            "c",
            Expr::Literal(
                Ann::empty(),
                Literal::Object(vec![
                    ("show".into(), Expr::local_var("s")),
                    ("cmp".into(), Expr::local_var("c")),
                ]),
            ),
        ),
    );
    let dict_rhs = Expr::Abs(
        Ann::meta(Meta::TypeClassConstructor),
        "s".into(),
        Box::new(
            match dict_body {
                Expr::Abs(_, _, inner) => *inner,
                _ => unreachable!(),
            },
        ),
    );
    let call = Expr::app(
        Expr::app(
            Expr::Var(Ann::meta(Meta::TypeClassConstructor), q("showDict")),
            Expr::local_var("x"),
        ),
        Expr::local_var("x"),
    );
    let m = module(
        &["mk"],
        &[],
        vec![
            Bind::NonRec("showDict".into(), dict_rhs),
            Bind::NonRec("mk".into(), Expr::abs("x", call)),
        ],
    );
    let out = generate(&m, &env, &[]);

    // The constructor gets its member-count overload plus the chain.
    assert_eq!(def_arities(&out, "showDict"), vec![0, 2]);

    let body = &def(&out, "mk", 1).body;
    assert_eq!(
        body,
        &local_call("showDict", vec![BeamExpr::var("X"), BeamExpr::var("X")])
    );
}

// ---------------------------------------------------------------------------
// Constructors and newtypes
// ---------------------------------------------------------------------------

#[test]
fn saturated_constructor_applications_build_tagged_tuples() {
    let mut env = TypeEnv::new();
    env.register_ctor(
        q("Push"),
        CtorSig {
            tag: CtorTag::Data,
            type_name: q("Op"),
            fields: vec![int(), int()],
        },
    );
    env.register_name(q("mk"), int_fun(2));
    let body = Expr::abs(
        "a",
        Expr::abs(
            "b",
            Expr::app(
                Expr::app(Expr::ConstructorRef(Ann::empty(), q("Push")), Expr::local_var("a")),
                Expr::local_var("b"),
            ),
        ),
    );
    let m = module(&["mk"], &[], vec![Bind::NonRec("mk".into(), body)]);
    let out = generate(&m, &env, &[]);

    assert_eq!(
        def(&out, "mk", 2).body,
        BeamExpr::Tuple(vec![
            BeamExpr::atom("push"),
            BeamExpr::var("A"),
            BeamExpr::var("B"),
        ])
    );
}

#[test]
fn newtype_construction_and_matching_are_erased() {
    let mut env = TypeEnv::new();
    env.register_ctor(
        q("Age"),
        CtorSig {
            tag: CtorTag::Newtype,
            type_name: q("AgeT"),
            fields: vec![int()],
        },
    );
    env.register_name(q("wrap"), int_fun(1));
    let wrap_body = Expr::abs(
        "n",
        Expr::app(Expr::ConstructorRef(Ann::empty(), q("Age")), Expr::local_var("n")),
    );
    let unwrap_body = Expr::abs(
        "v",
        Expr::Case(
            Ann::empty(),
            vec![Expr::local_var("v")],
            vec![CaseAlternative {
                binders: vec![Binder::Constructor(
                    q("Age"),
                    vec![Binder::Var("n".into())],
                )],
                result: CaseResult::Unconditional(Expr::local_var("n")),
            }],
        ),
    );
    env.register_name(q("unwrap"), int_fun(1));
    let m = module(
        &["wrap", "unwrap"],
        &[],
        vec![
            Bind::NonRec("wrap".into(), wrap_body),
            Bind::NonRec("unwrap".into(), unwrap_body),
        ],
    );
    let out = generate(&m, &env, &[]);

    // Construction is the identity on the wrapped value.
    assert_eq!(def(&out, "wrap", 1).body, BeamExpr::var("N"));

    // Matching binds straight through the erased wrapper.
    let unwrap = &def(&out, "unwrap", 1).body;
    let BeamExpr::Case(scrut, clauses) = unwrap else {
        panic!("expected a case, got {unwrap:?}");
    };
    assert_eq!(scrut.as_ref(), &BeamExpr::var("V"));
    assert!(clauses[0].pattern.is_var(), "newtype pattern erased to the field binder");
}

// ---------------------------------------------------------------------------
// Mutual recursion
// ---------------------------------------------------------------------------

#[test]
fn top_level_recursion_needs_no_rewrite() {
    let mut env = TypeEnv::new();
    env.register_name(q("f"), int_fun(1));
    env.register_name(q("g"), int_fun(1));
    let f_body = Expr::abs(
        "x",
        Expr::app(Expr::var(q("g")), Expr::local_var("x")),
    );
    let g_body = Expr::abs(
        "x",
        Expr::app(Expr::var(q("f")), Expr::local_var("x")),
    );
    let m = module(
        &["f"],
        &[],
        vec![Bind::Rec(vec![
            ("f".into(), f_body),
            ("g".into(), g_body),
        ])],
    );
    let out = generate(&m, &env, &[]);

    // Whichever binding comes first in source order, both resolve by
    // direct name/arity reference.
    assert_eq!(
        def(&out, "f", 1).body,
        local_call("g", vec![BeamExpr::var("X")])
    );
    assert_eq!(
        def(&out, "g", 1).body,
        local_call("f", vec![BeamExpr::var("X")])
    );
}

#[test]
fn local_recursive_groups_lower_to_the_tuple_fixed_point() {
    let mut env = TypeEnv::new();
    env.register_name(q("run"), int_fun(1));
    let letrec = Expr::Let(
        Ann::empty(),
        vec![Bind::Rec(vec![
            (
                "even_steps".into(),
                Expr::abs(
                    "n",
                    Expr::app(Expr::local_var("odd_steps"), Expr::local_var("n")),
                ),
            ),
            (
                "odd_steps".into(),
                Expr::abs(
                    "n",
                    Expr::app(Expr::local_var("even_steps"), Expr::local_var("n")),
                ),
            ),
        ])],
        Box::new(Expr::app(Expr::local_var("even_steps"), Expr::local_var("x"))),
    );
    let m = module(
        &["run"],
        &[],
        vec![Bind::NonRec("run".into(), Expr::abs("x", letrec))],
    );
    let out = generate(&m, &env, &[]);

    let body = &def(&out, "run", 1).body;
    let BeamExpr::Block(stmts) = body else {
        panic!("expected a block, got {body:?}");
    };
    // Phase one: the tuple of slot functions.
    let BeamExpr::Match(tuple_var, tuple) = &stmts[0] else {
        panic!("expected the tuple binding");
    };
    assert!(tuple_var.is_var());
    let BeamExpr::Tuple(slots) = tuple.as_ref() else {
        panic!("expected the slot tuple");
    };
    assert_eq!(slots.len(), 2);

    // Each slot takes the whole tuple; sibling references apply the
    // sibling's slot to the tuple itself.
    let BeamExpr::Fun(slot0) = &slots[0] else {
        panic!("expected a slot fun");
    };
    let self_param = &slot0[0].params[0];
    let BeamExpr::Fun(real) = &slot0[0].body else {
        panic!("expected the real closure inside the slot");
    };
    let BeamExpr::Call(CallTarget::Dynamic(sibling), _) = &real[0].body else {
        panic!("expected a sibling call, got {:?}", real[0].body);
    };
    let BeamExpr::Call(CallTarget::Dynamic(element_call), self_args) = sibling.as_ref() else {
        panic!("expected slot-of-tuple application");
    };
    assert_eq!(&self_args[0], self_param);
    let BeamExpr::Call(CallTarget::Named(element), element_args) = element_call.as_ref() else {
        panic!("expected erlang:element");
    };
    assert_eq!(element, &Atom::remote("erlang", "element"));
    assert_eq!(element_args[0], BeamExpr::Integer(2));

    // Phase two: each name bound to its own slot applied to the tuple.
    let BeamExpr::Match(_, first_def) = &stmts[1] else {
        panic!("expected the first slot binding");
    };
    assert!(matches!(
        first_def.as_ref(),
        BeamExpr::Call(CallTarget::Dynamic(_), _)
    ));
}

// ---------------------------------------------------------------------------
// Pattern matching
// ---------------------------------------------------------------------------

fn case_module(alternatives: Vec<CaseAlternative>, scrutinee_count: usize) -> (Module, TypeEnv) {
    let mut env = TypeEnv::new();
    env.register_name(q("pick"), int_fun(scrutinee_count));
    let params: Vec<String> = (0..scrutinee_count)
        .map(|i| format!("s{i}"))
        .collect();
    let case = Expr::Case(
        Ann::empty(),
        params.iter().map(Expr::local_var).collect(),
        alternatives,
    );
    let body = params
        .iter()
        .rev()
        .fold(case, |acc, p| Expr::abs(p.clone(), acc));
    (
        module(&["pick"], &[], vec![Bind::NonRec("pick".into(), body)]),
        env,
    )
}

#[test]
fn uneven_clauses_are_left_padded_and_reported() {
    let full = CaseAlternative {
        binders: vec![
            Binder::Var("a".into()),
            Binder::Var("b".into()),
            Binder::Var("c".into()),
        ],
        result: CaseResult::Unconditional(Expr::local_var("a")),
    };
    let short = CaseAlternative {
        binders: vec![Binder::Var("y".into()), Binder::Var("z".into())],
        result: CaseResult::Unconditional(Expr::local_var("z")),
    };
    let (m, env) = case_module(vec![full, short], 3);
    let out = generate(&m, &env, &[]);

    assert!(out
        .warnings
        .iter()
        .any(|w| w.category == Category::InconsistentClauseArity));

    let body = &def(&out, "pick", 3).body;
    let BeamExpr::Case(scrut, clauses) = body else {
        panic!("expected a flat case, got {body:?}");
    };
    let BeamExpr::Tuple(scrutinees) = scrut.as_ref() else {
        panic!("expected a tuple scrutinee");
    };
    assert_eq!(scrutinees.len(), 3);

    // The padded clause matches its original binders against the
    // rightmost scrutinees.
    let BeamExpr::Tuple(padded) = &clauses[1].pattern else {
        panic!("expected a tuple pattern");
    };
    assert_eq!(padded[0], BeamExpr::wildcard());
    assert!(padded[1].is_var() && padded[2].is_var());
}

#[test]
fn guard_fallthrough_dispatches_to_the_next_alternative() {
    let guarded = CaseAlternative {
        binders: vec![Binder::Var("x".into())],
        result: CaseResult::Guarded(vec![(
            Expr::local_var("x"),
            Expr::Literal(Ann::empty(), Literal::String("pos".into())),
        )]),
    };
    let fallback = CaseAlternative {
        binders: vec![Binder::Var("x".into())],
        result: CaseResult::Unconditional(Expr::Literal(
            Ann::empty(),
            Literal::String("other".into()),
        )),
    };
    let (m, env) = case_module(vec![guarded, fallback], 1);
    let out = generate(&m, &env, &[]);

    let body = &def(&out, "pick", 1).body;
    let BeamExpr::Block(stmts) = body else {
        panic!("expected the dispatch block, got {body:?}");
    };

    // A nullary Next fun holding the rest of the dispatch.
    let BeamExpr::Match(next_var, next_fun) = &stmts[0] else {
        panic!("expected the Next binding");
    };
    let BeamExpr::Fun(next_clauses) = next_fun.as_ref() else {
        panic!("expected a fun");
    };
    assert!(next_clauses[0].params.is_empty());
    let BeamExpr::Block(fallback_stmts) = &next_clauses[0].body else {
        panic!("expected the fallback alternative");
    };
    assert_eq!(
        fallback_stmts.last(),
        Some(&BeamExpr::Binary("other".into()))
    );

    // The guarded clause: true selects the result, anything else calls
    // Next.
    let BeamExpr::Case(_, clauses) = &stmts[1] else {
        panic!("expected the pattern case");
    };
    let BeamExpr::Case(_, guard_clauses) = &clauses[0].body else {
        panic!("expected the guard chain, got {:?}", clauses[0].body);
    };
    assert_eq!(guard_clauses[0].pattern, BeamExpr::atom("true"));
    assert_eq!(guard_clauses[0].body, BeamExpr::Binary("pos".into()));
    assert_eq!(
        guard_clauses[1].body,
        BeamExpr::call_value(next_var.as_ref().clone(), vec![])
    );
}

#[test]
fn array_patterns_convert_through_the_runtime_with_a_sentinel_fallback() {
    let alt = CaseAlternative {
        binders: vec![Binder::Literal(Literal::Array(vec![
            Binder::Literal(Literal::Int(0)),
            Binder::Var("rest".into()),
        ]))],
        result: CaseResult::Unconditional(Expr::local_var("rest")),
    };
    let catch_all = CaseAlternative {
        binders: vec![Binder::Wildcard],
        result: CaseResult::Unconditional(Expr::Literal(Ann::empty(), Literal::Int(0))),
    };
    let (m, env) = case_module(vec![alt, catch_all], 1);
    let out = generate(&m, &env, &[]);

    let body = &def(&out, "pick", 1).body;
    let BeamExpr::Block(stmts) = body else {
        panic!("expected the dispatch block, got {body:?}");
    };
    let BeamExpr::Case(_, clauses) = &stmts[1] else {
        panic!("expected the pattern case");
    };
    // Inside the matched clause: the conversion case over the runtime
    // shape check, with the sentinel in the fallback clause.
    let BeamExpr::Case(conversion, conv_clauses) = &clauses[0].body else {
        panic!("expected the conversion case, got {:?}", clauses[0].body);
    };
    let BeamExpr::Case(shape_check, shape_clauses) = conversion.as_ref() else {
        panic!("expected the shape check");
    };
    let BeamExpr::Call(CallTarget::Named(is_seq), _) = shape_check.as_ref() else {
        panic!("expected the runtime shape check");
    };
    assert_eq!(is_seq, &Atom::remote(vela_beam::RUNTIME_MODULE, "is_sequence"));
    assert_eq!(
        shape_clauses[1].body,
        BeamExpr::atom(vela_beam::NO_MATCH)
    );
    // The converted list is matched against the element patterns.
    let BeamExpr::List(elems) = &conv_clauses[0].pattern else {
        panic!("expected a list pattern");
    };
    assert_eq!(elems[0], BeamExpr::Integer(0));
}

#[test]
fn irrefutable_array_patterns_skip_the_fallback() {
    let alt = CaseAlternative {
        binders: vec![Binder::Literal(Literal::Array(vec![
            Binder::Var("a".into()),
            Binder::Var("b".into()),
        ]))],
        result: CaseResult::Unconditional(Expr::local_var("a")),
    };
    let (m, env) = case_module(vec![alt], 1);
    let out = generate(&m, &env, &[]);

    let body = &def(&out, "pick", 1).body;
    // No guards and nothing refutable: a straight binding of the
    // converted list, no dispatch funs.
    let BeamExpr::Block(stmts) = body else {
        panic!("expected a block, got {body:?}");
    };
    assert!(stmts.iter().all(|s| !matches!(s, BeamExpr::Fun(_))));
    let conversion = stmts.iter().find_map(|s| match s {
        BeamExpr::Match(pattern, value) => match (pattern.as_ref(), value.as_ref()) {
            (BeamExpr::List(_), BeamExpr::Call(CallTarget::Named(target), _))
                if target == &Atom::remote(vela_beam::RUNTIME_MODULE, "sequence_to_list") =>
            {
                Some(())
            }
            _ => None,
        },
        _ => None,
    });
    assert!(conversion.is_some(), "expected a direct conversion binding in {stmts:?}");
}

// ---------------------------------------------------------------------------
// Foreign-import bridge
// ---------------------------------------------------------------------------

#[test]
fn foreign_arity_validation_matrix() {
    let mut env = TypeEnv::new();
    env.register_name(q("peek"), int_fun(1));
    let m = module(&["peek"], &["peek"], vec![]);

    // Equal: accepted.
    assert!(generate_module(
        &m,
        &env,
        &[ForeignImpl::new("peek", 1)],
        &CodegenOptions::default()
    )
    .is_ok());

    // Lower: accepted, the implementation returns a residual function.
    assert!(generate_module(
        &m,
        &env,
        &[ForeignImpl::new("peek", 0)],
        &CodegenOptions::default()
    )
    .is_ok());

    // Higher: rejected.
    let err = generate_module(
        &m,
        &env,
        &[ForeignImpl::new("peek", 2)],
        &CodegenOptions::default(),
    )
    .unwrap_err();
    assert_eq!(
        err,
        CodegenError::InvalidForeignArity {
            module: "Data.Queue".into(),
            symbol: "peek".into(),
            actual: 2,
            declared: 1,
        }
    );
}

#[test]
fn missing_foreign_implementations_abort_with_no_output() {
    let env = TypeEnv::new();
    let m = module(&[], &["peek", "push"], vec![]);
    let err = generate_module(&m, &env, &[ForeignImpl::new("push", 1)], &CodegenOptions::default())
        .unwrap_err();
    assert_eq!(
        err,
        CodegenError::MissingForeignImplementations {
            module: "Data.Queue".into(),
            symbols: vec!["peek".into()],
        }
    );
}

#[test]
fn unused_foreign_implementations_warn_without_aborting() {
    let mut env = TypeEnv::new();
    env.register_name(q("peek"), int_fun(1));
    let m = module(&[], &["peek"], vec![]);
    let out = generate(
        &m,
        &env,
        &[ForeignImpl::new("peek", 1), ForeignImpl::new("stale", 2)],
    );
    let warning = out
        .warnings
        .iter()
        .find(|w| w.category == Category::UnusedForeignImplementations)
        .expect("an unused-implementations warning");
    assert_eq!(warning.symbols, vec!["stale".to_string()]);
}

#[test]
fn foreign_bindings_reexport_curried_and_direct_shapes() {
    let mut env = TypeEnv::new();
    env.register_name(q("peek"), int_fun(2));
    let m = module(&[], &["peek"], vec![]);
    let out = generate(&m, &env, &[ForeignImpl::new("peek", 2)]);

    assert_eq!(
        out.exports,
        vec![("peek".to_string(), 0), ("peek".to_string(), 2)]
    );

    // peek/0: two one-argument closures around the foreign call.
    let zero = &def(&out, "peek", 0).body;
    let BeamExpr::Fun(outer) = zero else {
        panic!("expected the curried wrapper");
    };
    let BeamExpr::Fun(inner) = &outer[0].body else {
        panic!("expected the second closure");
    };
    let BeamExpr::Call(CallTarget::Named(target), args) = &inner[0].body else {
        panic!("expected the foreign call");
    };
    assert_eq!(target, &Atom::remote("data_queue@foreign", "peek"));
    assert_eq!(args.len(), 2);

    // peek/2: the direct bridge.
    let direct = &def(&out, "peek", 2).body;
    let BeamExpr::Call(CallTarget::Named(direct_target), direct_args) = direct else {
        panic!("expected the direct foreign call");
    };
    assert_eq!(direct_target, &Atom::remote("data_queue@foreign", "peek"));
    assert_eq!(direct_args.len(), 2);
}

#[test]
fn saturated_foreign_calls_bypass_the_wrapper() {
    let mut env = TypeEnv::new();
    env.register_name(q("peek"), int_fun(1));
    env.register_name(q("go"), int_fun(1));
    let go_body = Expr::abs(
        "x",
        Expr::app(Expr::var(q("peek")), Expr::local_var("x")),
    );
    let m = module(
        &["go"],
        &["peek"],
        vec![Bind::NonRec("go".into(), go_body)],
    );
    let out = generate(&m, &env, &[ForeignImpl::new("peek", 1)]);

    assert_eq!(
        def(&out, "go", 1).body,
        BeamExpr::call(
            Atom::remote("data_queue@foreign", "peek"),
            vec![BeamExpr::var("X")]
        )
    );
}

// ---------------------------------------------------------------------------
// Types, specs, and hints
// ---------------------------------------------------------------------------

#[test]
fn recursive_alias_yields_one_cached_spec_entry() {
    let mut env = TypeEnv::new();
    let looped = Qualified::from_dotted("Data.Queue", "Looped");
    env.register_decl(
        looped.clone(),
        TypeDecl::Synonym {
            params: vec![],
            body: Type::app(
                Type::Con(Qualified::from_dotted(names::DATA_LIST, "List")),
                Type::Con(looped.clone()),
            ),
        },
    );
    env.register_name(
        q("norm"),
        Type::fun(Type::Con(looped.clone()), Type::Con(looped)),
    );
    let m = module(
        &["norm"],
        &[],
        vec![Bind::NonRec("norm".into(), Expr::abs("x", Expr::local_var("x")))],
    );
    let out = generate(&m, &env, &[]);

    assert_eq!(out.type_specs.len(), 1);
    assert_eq!(out.type_specs[0].name, "looped");
    assert_eq!(
        out.type_specs[0].ty,
        vela_beam::BeamType::list(vela_beam::BeamType::Any)
    );

    // Both argument and result positions reuse the cached alias.
    let spec = &out.fun_specs[0];
    let vela_beam::BeamType::Fun(args, ret) = &spec.ret else {
        panic!("expected a fun spec");
    };
    assert_eq!(args[0], vela_beam::BeamType::Alias("looped".into()));
    assert_eq!(ret.as_ref(), &vela_beam::BeamType::Alias("looped".into()));
}

#[test]
fn exported_specs_have_free_variables_erased() {
    let mut env = TypeEnv::new();
    env.register_name(
        q("identity"),
        Type::forall("a", Type::fun(Type::Var("a".into()), Type::Var("a".into()))),
    );
    let m = module(
        &["identity"],
        &[],
        vec![Bind::NonRec(
            "identity".into(),
            Expr::abs("x", Expr::local_var("x")),
        )],
    );
    let out = generate(&m, &env, &[]);
    assert_eq!(
        out.fun_specs[0].ret,
        vela_beam::BeamType::fun(vec![vela_beam::BeamType::Any], vela_beam::BeamType::Any)
    );
}

#[test]
fn memo_hints_cover_exactly_value_bearing_bindings() {
    let mut env = TypeEnv::new();
    let show_dict = Constraint {
        class: Qualified::from_dotted("Vela.Data.Show", "Show"),
        args: vec![Type::Var("a".into())],
    };
    env.register_name(
        q("display"),
        Type::forall(
            "a",
            Type::constrained(show_dict, Type::fun(Type::Var("a".into()), prim("Text"))),
        ),
    );
    env.register_name(q("plain"), int_fun(1));
    env.register_name(q("konst"), int());
    let m = module(
        &["display", "plain", "konst"],
        &[],
        vec![
            Bind::NonRec(
                "display".into(),
                Expr::abs("d", Expr::abs("x", Expr::local_var("x"))),
            ),
            Bind::NonRec("plain".into(), Expr::abs("x", Expr::local_var("x"))),
            Bind::NonRec("konst".into(), Expr::Literal(Ann::empty(), Literal::Int(1))),
        ],
    );
    let out = generate(&m, &env, &[]);

    assert_eq!(out.memo_hints.get(&q("display")), Some(&1));
    assert_eq!(out.memo_hints.get(&q("plain")), Some(&0));
    assert_eq!(out.memo_hints.get(&q("konst")), None);
}

// ---------------------------------------------------------------------------
// Output contract
// ---------------------------------------------------------------------------

#[test]
fn attributes_and_wrapped_passthrough() {
    let mut env = TypeEnv::new();
    env.register_name(q("caller"), int_fun(1));
    let m = module(
        &["caller"],
        &[],
        vec![Bind::NonRec(
            "caller".into(),
            Expr::abs("x", Expr::local_var("x")),
        )],
    );
    let mut out = generate(&m, &env, &[]);

    assert!(out
        .attributes
        .iter()
        .any(|a| matches!(a, ModuleAttribute::Module(name) if name == "data_queue")));

    let before = out.exports.len();
    out.attach_wrapped(WrappedOutput {
        exports: vec![("caller@safe".to_string(), 1)],
        definitions: vec![FunDef::new(
            "caller@safe",
            vec!["X".to_string()],
            local_call("caller", vec![BeamExpr::var("X")]),
        )],
    });
    assert_eq!(out.exports.len(), before + 1);
    assert!(out
        .definitions
        .iter()
        .any(|d| d.name == "caller@safe" && d.arity() == 1));
    let ModuleAttribute::Export(entries) = out
        .attributes
        .iter()
        .find(|a| matches!(a, ModuleAttribute::Export(_)))
        .expect("an export attribute")
    else {
        unreachable!()
    };
    assert!(entries.contains(&("caller@safe".to_string(), 1)));
}

#[test]
fn overload_plan_snapshots() {
    let usages: BTreeSet<usize> = [1].into_iter().collect();
    let plan = plan_overloads(
        &Arity::Curried { dict: 1, value: 2 },
        &usages,
        true,
        3,
        false,
    );
    insta::assert_snapshot!(
        format!("{plan:?}"),
        @"OverloadPlan { curried_zero: true, direct: Some(Saturated(3)), dict_only: Some(DictOverload { arity: 1, saturated: true }) }"
    );

    let elided = plan_overloads(
        &Arity::Curried { dict: 0, value: 2 },
        &usages,
        false,
        2,
        false,
    );
    insta::assert_snapshot!(
        format!("{elided:?}"),
        @"OverloadPlan { curried_zero: true, direct: None, dict_only: None }"
    );
}

// ---------------------------------------------------------------------------
// Decision-table properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn curried_plans_cover_every_recorded_usage(
        dict in 0usize..3,
        value in 0usize..4,
        lambdas in 0usize..6,
        public in any::<bool>(),
        usages in proptest::collection::btree_set(0usize..8, 0..5),
    ) {
        let arity = Arity::Curried { dict, value };
        let plan = plan_overloads(&arity, &usages, public, lambdas, false);

        if !public && usages.is_empty() {
            prop_assert!(plan.is_empty());
        } else {
            if public {
                prop_assert!(plan.curried_zero);
            }
            for &a in &usages {
                match plan.call_shape(a) {
                    CallShape::Direct(k) | CallShape::DictOnly(k) => prop_assert!(a >= k),
                    CallShape::CurriedChain => prop_assert!(
                        plan.curried_zero,
                        "usage {a} fell to the chain but no chain is emitted"
                    ),
                }
            }
            if matches!(plan.direct, Some(Direct::Wrapper(_))) {
                prop_assert!(plan.curried_zero);
            }
        }
    }

    #[test]
    fn fixed_plans_cover_every_recorded_usage(
        k in 1usize..=10,
        effect in any::<bool>(),
        public in any::<bool>(),
        usages in proptest::collection::btree_set(0usize..12, 0..5),
    ) {
        let family = if effect { FnFamily::Effect } else { FnFamily::Plain };
        let plan = plan_overloads(&Arity::Fixed(family, k), &usages, public, 0, false);

        if !public && usages.is_empty() {
            prop_assert!(plan.is_empty());
        } else {
            prop_assert_eq!(plan.direct, Some(Direct::Uncurried(family, k)));
            for &a in &usages {
                match plan.call_shape(a) {
                    CallShape::Direct(shape) => prop_assert!(a >= shape),
                    CallShape::DictOnly(_) => prop_assert!(false, "no dict overload exists"),
                    CallShape::CurriedChain => prop_assert!(plan.curried_zero),
                }
            }
        }
    }
}
