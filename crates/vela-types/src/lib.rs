//! Source-level type representations for Vela.
//!
//! This crate defines the type terms the backend receives from the
//! external type checker: resolved schemes for top-level names, type
//! synonym and data declarations, and data-constructor signatures. These
//! are distinct from the target type-annotation terms (which live in
//! `vela-beam`).

use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// A dot-separated module path, e.g. `Vela.Data.List`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleName(pub Vec<String>);

impl ModuleName {
    pub fn new(segments: &[&str]) -> Self {
        Self(segments.iter().map(|s| s.to_string()).collect())
    }

    pub fn from_dotted(path: &str) -> Self {
        Self(path.split('.').map(str::to_string).collect())
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// A possibly module-qualified name.
///
/// By convention in the core IR, references to top-level bindings are
/// always qualified and references to local (lambda/let/case-bound)
/// names are never qualified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Qualified {
    pub module: Option<ModuleName>,
    pub name: String,
}

impl Qualified {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            module: None,
            name: name.into(),
        }
    }

    pub fn in_module(module: ModuleName, name: impl Into<String>) -> Self {
        Self {
            module: Some(module),
            name: name.into(),
        }
    }

    pub fn from_dotted(path: &str, name: impl Into<String>) -> Self {
        Self {
            module: Some(ModuleName::from_dotted(path)),
            name: name.into(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.module.is_none()
    }
}

impl fmt::Display for Qualified {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "{module}.{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A record field label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub String);

impl Label {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A typeclass constraint, e.g. `Ord a`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub class: Qualified,
    pub args: Vec<Type>,
}

/// A source type term, as produced by the external checker with all
/// synonyms resolvable through the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// A free or quantified type variable.
    Var(String),
    /// A type constructor reference (primitive, data type, or synonym).
    Con(Qualified),
    /// Type-level application.
    App(Box<Type>, Box<Type>),
    /// A function arrow.
    Fun(Box<Type>, Box<Type>),
    /// Universal quantification. Outer quantifiers only.
    ForAll(String, Box<Type>),
    /// A typeclass-constraint arrow; lowered to a dictionary parameter.
    Constrained(Constraint, Box<Type>),
    /// A record type over a closed or open row.
    Record(Vec<(Label, Type)>, Option<Box<Type>>),
}

impl Type {
    pub fn fun(from: Type, to: Type) -> Type {
        Type::Fun(Box::new(from), Box::new(to))
    }

    pub fn app(head: Type, arg: Type) -> Type {
        Type::App(Box::new(head), Box::new(arg))
    }

    pub fn forall(var: impl Into<String>, body: Type) -> Type {
        Type::ForAll(var.into(), Box::new(body))
    }

    pub fn constrained(constraint: Constraint, body: Type) -> Type {
        Type::Constrained(constraint, Box::new(body))
    }

    /// Strips outer quantifiers.
    pub fn strip_foralls(&self) -> &Type {
        let mut ty = self;
        while let Type::ForAll(_, body) = ty {
            ty = body;
        }
        ty
    }

    /// Flattens a type-level application spine into (head, args).
    pub fn unapply(&self) -> (&Type, Vec<&Type>) {
        let mut head = self;
        let mut args = Vec::new();
        while let Type::App(inner, arg) = head {
            args.push(arg.as_ref());
            head = inner;
        }
        args.reverse();
        (head, args)
    }
}

/// Capture-naive substitution of type variables.
///
/// Adequate here because synonym parameters are instantiated with types
/// whose variables are disjoint from the synonym body's binders (the
/// external checker hands over resolved, alpha-renamed declarations).
pub fn substitute_type_vars(ty: &Type, subst: &BTreeMap<String, Type>) -> Type {
    match ty {
        Type::Var(v) => subst.get(v).cloned().unwrap_or_else(|| ty.clone()),
        Type::Con(_) => ty.clone(),
        Type::App(f, a) => Type::app(
            substitute_type_vars(f, subst),
            substitute_type_vars(a, subst),
        ),
        Type::Fun(a, b) => Type::fun(
            substitute_type_vars(a, subst),
            substitute_type_vars(b, subst),
        ),
        Type::ForAll(v, body) => {
            let mut inner = subst.clone();
            inner.remove(v);
            Type::forall(v.clone(), substitute_type_vars(body, &inner))
        }
        Type::Constrained(c, body) => Type::constrained(
            Constraint {
                class: c.class.clone(),
                args: c
                    .args
                    .iter()
                    .map(|a| substitute_type_vars(a, subst))
                    .collect(),
            },
            substitute_type_vars(body, subst),
        ),
        Type::Record(fields, tail) => Type::Record(
            fields
                .iter()
                .map(|(l, t)| (l.clone(), substitute_type_vars(t, subst)))
                .collect(),
            tail.as_ref()
                .map(|t| Box::new(substitute_type_vars(t, subst))),
        ),
    }
}

// ---------------------------------------------------------------------------
// Well-known names
// ---------------------------------------------------------------------------

/// Recognized type families and primitive constructors.
pub mod names {
    use super::{Qualified, Type};

    pub const PRIM: &str = "Prim";
    pub const EFFECT: &str = "Vela.Effect";
    pub const FN_UNCURRIED: &str = "Vela.Function.Uncurried";
    pub const EFFECT_FN_UNCURRIED: &str = "Vela.Effect.Uncurried";
    pub const DATA_LIST: &str = "Vela.Data.List";
    pub const DATA_MAP: &str = "Vela.Data.Map";

    /// The two numbered fixed-arity call families.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum FnFamily {
        /// `FnN`: an uncurried plain function of N arguments.
        Plain,
        /// `EffectFnN`: an uncurried effectful function of N arguments.
        Effect,
    }

    fn numbered(name: &str, prefix: &str) -> Option<usize> {
        let digits = name.strip_prefix(prefix)?;
        let n: usize = digits.parse().ok()?;
        (1..=10).contains(&n).then_some(n)
    }

    /// Recognizes a constructor of one of the numbered uncurried
    /// families, returning the family and its arity.
    pub fn uncurried_family(con: &Qualified) -> Option<(FnFamily, usize)> {
        let module = con.module.as_ref()?.to_string();
        if module == FN_UNCURRIED {
            numbered(&con.name, "Fn").map(|n| (FnFamily::Plain, n))
        } else if module == EFFECT_FN_UNCURRIED {
            numbered(&con.name, "EffectFn").map(|n| (FnFamily::Effect, n))
        } else {
            None
        }
    }

    pub fn is_prim(con: &Qualified, name: &str) -> bool {
        con.name == name && con.module.as_ref().is_some_and(|m| m.to_string() == PRIM)
    }

    pub fn is_effect(con: &Qualified) -> bool {
        con.name == "Effect"
            && con
                .module
                .as_ref()
                .is_some_and(|m| m.to_string() == EFFECT)
    }

    pub fn is_list(con: &Qualified) -> bool {
        con.name == "List"
            && con
                .module
                .as_ref()
                .is_some_and(|m| m.to_string() == DATA_LIST)
    }

    pub fn is_map(con: &Qualified) -> bool {
        con.name == "Map"
            && con
                .module
                .as_ref()
                .is_some_and(|m| m.to_string() == DATA_MAP)
    }

    pub fn prim(name: &str) -> Type {
        Type::Con(Qualified::from_dotted(PRIM, name))
    }
}

// ---------------------------------------------------------------------------
// Declarations and the environment
// ---------------------------------------------------------------------------

/// Whether a constructor belongs to a `data` or `newtype` declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtorTag {
    Data,
    Newtype,
}

/// A data-constructor signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtorSig {
    pub tag: CtorTag,
    pub type_name: Qualified,
    pub fields: Vec<Type>,
}

impl CtorSig {
    pub fn arity(&self) -> usize {
        self.fields.len()
    }
}

/// A nominal type declaration, resolvable by the type translator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDecl {
    Synonym {
        params: Vec<String>,
        body: Type,
    },
    Data {
        params: Vec<String>,
        ctors: Vec<(String, Vec<Type>)>,
        tag: CtorTag,
    },
}

/// The type environment supplied by the external checker.
///
/// Maps are keyed by qualified names; deterministic iteration order
/// keeps generated output stable across runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeEnv {
    /// Top-level value bindings to their resolved schemes.
    pub names: BTreeMap<Qualified, Type>,
    /// Data-constructor signatures.
    pub ctors: BTreeMap<Qualified, CtorSig>,
    /// Nominal type declarations (synonyms and data types).
    pub decls: BTreeMap<Qualified, TypeDecl>,
}

impl TypeEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_name(&mut self, name: Qualified, ty: Type) {
        self.names.insert(name, ty);
    }

    pub fn register_ctor(&mut self, name: Qualified, sig: CtorSig) {
        self.ctors.insert(name, sig);
    }

    pub fn register_decl(&mut self, name: Qualified, decl: TypeDecl) {
        self.decls.insert(name, decl);
    }

    pub fn lookup_name(&self, name: &Qualified) -> Option<&Type> {
        self.names.get(name)
    }

    pub fn lookup_ctor(&self, name: &Qualified) -> Option<&CtorSig> {
        self.ctors.get(name)
    }

    pub fn lookup_decl(&self, name: &Qualified) -> Option<&TypeDecl> {
        self.decls.get(name)
    }

    pub fn is_newtype_ctor(&self, name: &Qualified) -> bool {
        self.lookup_ctor(name)
            .is_some_and(|sig| sig.tag == CtorTag::Newtype)
    }
}
