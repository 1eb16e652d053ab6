//! Desugared functional core IR for Vela.
//!
//! This is the boundary between the external frontend (parser + type
//! checker) and the backend: a small expression language with explicit
//! constructors, literals, case expressions, and one-argument closures.
//! The backend consumes it read-only; nothing here survives a module's
//! compilation except through the backend's outputs.

use std::collections::BTreeSet;

use vela_types::{ModuleName, Qualified, Type};

// ---------------------------------------------------------------------------
// Annotations
// ---------------------------------------------------------------------------

/// Metadata the frontend attaches to expressions it compiled specially.
#[derive(Debug, Clone, PartialEq)]
pub enum Meta {
    /// A reference to (or application of) a data constructor.
    Constructor,
    /// A reference to a newtype constructor; erased during lowering.
    Newtype,
    /// A typeclass-dictionary constructor.
    TypeClassConstructor,
    /// A binding whose body is supplied by foreign code.
    Foreign,
}

/// Per-node annotation: the checked type when known, plus metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ann {
    pub ty: Option<Type>,
    pub meta: Option<Meta>,
}

impl Ann {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn meta(meta: Meta) -> Self {
        Self {
            ty: None,
            meta: Some(meta),
        }
    }

    pub fn has_meta(&self, meta: &Meta) -> bool {
        self.meta.as_ref() == Some(meta)
    }
}

// ---------------------------------------------------------------------------
// Literals
// ---------------------------------------------------------------------------

/// A literal, generic over its element type so the same shape serves
/// expressions and binders.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal<T> {
    Int(i64),
    Float(f64),
    Char(char),
    String(String),
    Boolean(bool),
    Array(Vec<T>),
    Object(Vec<(String, T)>),
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// A core expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Ann, Literal<Expr>),
    /// The right-hand side of a constructor declaration: type name,
    /// constructor name, field names.
    Constructor(Ann, String, String, Vec<String>),
    /// A reference to a data constructor used as a value.
    ConstructorRef(Ann, Qualified),
    /// Record field access.
    Accessor(Ann, String, Box<Expr>),
    /// Record update: base expression plus replacement fields.
    RecordUpdate(Ann, Box<Expr>, Vec<(String, Expr)>),
    /// One-argument closure.
    Abs(Ann, String, Box<Expr>),
    /// One-argument application.
    App(Ann, Box<Expr>, Box<Expr>),
    Var(Ann, Qualified),
    /// Multi-scrutinee case expression.
    Case(Ann, Vec<Expr>, Vec<CaseAlternative>),
    Let(Ann, Vec<Bind>, Box<Expr>),
}

impl Expr {
    pub fn ann(&self) -> &Ann {
        match self {
            Expr::Literal(a, _)
            | Expr::Constructor(a, _, _, _)
            | Expr::ConstructorRef(a, _)
            | Expr::Accessor(a, _, _)
            | Expr::RecordUpdate(a, _, _)
            | Expr::Abs(a, _, _)
            | Expr::App(a, _, _)
            | Expr::Var(a, _)
            | Expr::Case(a, _, _)
            | Expr::Let(a, _, _) => a,
        }
    }

    /// Flattens an application spine into (callee, arguments).
    pub fn unapply(&self) -> (&Expr, Vec<&Expr>) {
        let mut head = self;
        let mut args = Vec::new();
        while let Expr::App(_, callee, arg) = head {
            args.push(arg.as_ref());
            head = callee;
        }
        args.reverse();
        (head, args)
    }

    /// Counts the leading chain of one-argument closures.
    pub fn lambda_count(&self) -> usize {
        let mut count = 0;
        let mut expr = self;
        while let Expr::Abs(_, _, body) = expr {
            count += 1;
            expr = body;
        }
        count
    }

    pub fn app(callee: Expr, arg: Expr) -> Expr {
        Expr::App(Ann::empty(), Box::new(callee), Box::new(arg))
    }

    pub fn abs(param: impl Into<String>, body: Expr) -> Expr {
        Expr::Abs(Ann::empty(), param.into(), Box::new(body))
    }

    pub fn var(name: Qualified) -> Expr {
        Expr::Var(Ann::empty(), name)
    }

    pub fn local_var(name: impl Into<String>) -> Expr {
        Expr::Var(Ann::empty(), Qualified::local(name))
    }
}

// ---------------------------------------------------------------------------
// Binders and case alternatives
// ---------------------------------------------------------------------------

/// A pattern-matching binder: tests shape and binds sub-names.
#[derive(Debug, Clone, PartialEq)]
pub enum Binder {
    Wildcard,
    Var(String),
    /// As-pattern: binds the whole value and matches the inner binder.
    Named(String, Box<Binder>),
    Literal(Literal<Binder>),
    Constructor(Qualified, Vec<Binder>),
}

impl Binder {
    /// Every name this binder brings into scope.
    pub fn bound_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_bound_names(&mut names);
        names
    }

    fn collect_bound_names(&self, names: &mut BTreeSet<String>) {
        match self {
            Binder::Wildcard => {}
            Binder::Var(name) => {
                names.insert(name.clone());
            }
            Binder::Named(name, inner) => {
                names.insert(name.clone());
                inner.collect_bound_names(names);
            }
            Binder::Literal(Literal::Array(items)) => {
                for item in items {
                    item.collect_bound_names(names);
                }
            }
            Binder::Literal(Literal::Object(fields)) => {
                for (_, item) in fields {
                    item.collect_bound_names(names);
                }
            }
            Binder::Literal(_) => {}
            Binder::Constructor(_, binders) => {
                for binder in binders {
                    binder.collect_bound_names(names);
                }
            }
        }
    }
}

/// The result side of a case alternative.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseResult {
    /// Ordered (guard, result) pairs; the first true guard selects its
    /// result, and if none do the alternative falls through.
    Guarded(Vec<(Expr, Expr)>),
    Unconditional(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseAlternative {
    pub binders: Vec<Binder>,
    pub result: CaseResult,
}

// ---------------------------------------------------------------------------
// Bindings and modules
// ---------------------------------------------------------------------------

/// A top-level or local binding group.
#[derive(Debug, Clone, PartialEq)]
pub enum Bind {
    NonRec(String, Expr),
    /// A mutually recursive group.
    Rec(Vec<(String, Expr)>),
}

impl Bind {
    pub fn bindings(&self) -> Vec<(&str, &Expr)> {
        match self {
            Bind::NonRec(name, expr) => vec![(name.as_str(), expr)],
            Bind::Rec(group) => group
                .iter()
                .map(|(name, expr)| (name.as_str(), expr))
                .collect(),
        }
    }
}

/// A module of the core IR, as handed over by the frontend.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: ModuleName,
    /// Names the source module declares exported.
    pub exports: Vec<String>,
    /// Names whose implementations are supplied by foreign code.
    pub foreign: Vec<String>,
    /// Top-level bindings in source order.
    pub decls: Vec<Bind>,
}
