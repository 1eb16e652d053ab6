//! Synthetic core modules shared by the codegen benchmarks.

use vela_core::{Ann, Bind, Binder, CaseAlternative, CaseResult, Expr, Literal, Module};
use vela_types::names::prim;
use vela_types::{ModuleName, Qualified, Type, TypeEnv};

fn mname() -> ModuleName {
    ModuleName::from_dotted("Bench.Synthetic")
}

fn int_fun(arity: usize) -> Type {
    let mut ty = prim("Int");
    for _ in 0..arity {
        ty = Type::fun(prim("Int"), ty);
    }
    ty
}

/// A module of `bindings` chained unary functions, each calling its
/// predecessor, alternating between saturated and bare references so
/// the overload synthesizer exercises both paths.
pub fn call_chain_module(bindings: usize) -> (Module, TypeEnv) {
    let module_name = mname();
    let mut env = TypeEnv::new();
    let mut decls = Vec::with_capacity(bindings);
    let mut exports = Vec::new();

    for i in 0..bindings {
        let name = format!("step_{i}");
        env.register_name(
            Qualified::in_module(module_name.clone(), name.clone()),
            int_fun(1),
        );
        let body = if i == 0 {
            Expr::abs("x", Expr::local_var("x"))
        } else {
            let prev = Qualified::in_module(module_name.clone(), format!("step_{}", i - 1));
            let call = if i % 2 == 0 {
                // Saturated call: takes the direct overload.
                Expr::app(Expr::var(prev), Expr::local_var("x"))
            } else {
                // Bare reference re-applied through a local: takes the
                // curried chain.
                Expr::Let(
                    Ann::empty(),
                    vec![Bind::NonRec("f".into(), Expr::var(prev))],
                    Box::new(Expr::app(Expr::local_var("f"), Expr::local_var("x"))),
                )
            };
            Expr::abs("x", call)
        };
        if i % 4 == 0 {
            exports.push(name.clone());
        }
        decls.push(Bind::NonRec(name, body));
    }

    (
        Module {
            name: module_name,
            exports,
            foreign: Vec::new(),
            decls,
        },
        env,
    )
}

/// A module of guarded multi-clause case expressions, stressing the
/// pattern compiler and hygienic renaming.
pub fn guarded_case_module(bindings: usize) -> (Module, TypeEnv) {
    let module_name = mname();
    let mut env = TypeEnv::new();
    let mut decls = Vec::with_capacity(bindings);
    let mut exports = Vec::new();

    for i in 0..bindings {
        let name = format!("classify_{i}");
        env.register_name(
            Qualified::in_module(module_name.clone(), name.clone()),
            int_fun(2),
        );
        let case = Expr::Case(
            Ann::empty(),
            vec![Expr::local_var("a"), Expr::local_var("b")],
            vec![
                CaseAlternative {
                    binders: vec![
                        Binder::Literal(Literal::Int(0)),
                        Binder::Var("rest".into()),
                    ],
                    result: CaseResult::Unconditional(Expr::local_var("rest")),
                },
                CaseAlternative {
                    binders: vec![Binder::Var("x".into()), Binder::Var("y".into())],
                    result: CaseResult::Guarded(vec![
                        (Expr::local_var("x"), Expr::local_var("y")),
                        (Expr::local_var("y"), Expr::local_var("x")),
                    ]),
                },
                CaseAlternative {
                    binders: vec![Binder::Wildcard, Binder::Var("z".into())],
                    result: CaseResult::Unconditional(Expr::local_var("z")),
                },
            ],
        );
        let body = Expr::abs("a", Expr::abs("b", case));
        exports.push(name.clone());
        decls.push(Bind::NonRec(name, body));
    }

    (
        Module {
            name: module_name,
            exports,
            foreign: Vec::new(),
            decls,
        },
        env,
    )
}
