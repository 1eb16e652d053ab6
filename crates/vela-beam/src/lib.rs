//! Target instruction tree for the Vela backend.
//!
//! This crate defines the expression and declaration forms of the
//! BEAM-style target runtime: functions identified by name + arity,
//! data as tagged tuples, single-scrutinee case with guards. The
//! backend produces these trees; rendering them to source text is a
//! downstream concern.

use vela_types::ModuleName;

/// The support-library module generated code calls into for sequence
/// pattern helpers.
pub const RUNTIME_MODULE: &str = "vela_runtime";

/// Sentinel atom a failed runtime shape check produces; never a valid
/// match result.
pub const NO_MATCH: &str = "no_match";

// ---------------------------------------------------------------------------
// Atoms and name derivation
// ---------------------------------------------------------------------------

/// A possibly remote function name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom {
    pub module: Option<String>,
    pub name: String,
}

impl Atom {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            module: None,
            name: name.into(),
        }
    }

    pub fn remote(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: Some(module.into()),
            name: name.into(),
        }
    }
}

/// Derives the target module atom: segments lower-cased and joined
/// with underscores (`Data.Queue` becomes `data_queue`).
pub fn module_atom(name: &ModuleName) -> String {
    name.0
        .iter()
        .map(|segment| segment.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// The module atom under which foreign implementations live.
pub fn foreign_module_atom(name: &ModuleName) -> String {
    format!("{}@foreign", module_atom(name))
}

/// Derives an atom name from a source identifier: leading character
/// lower-cased, primes mapped to a printable suffix.
pub fn atom_name(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len());
    let mut chars = ident.chars();
    if let Some(first) = chars.next() {
        out.extend(first.to_lowercase());
    }
    for c in chars {
        if c == '\'' {
            out.push_str("@prime");
        } else {
            out.push(c);
        }
    }
    out
}

/// Derives a target variable name from a source identifier: leading
/// character upper-cased, primes mapped as in [`atom_name`]. `@` is a
/// legal identifier character in the target and is preserved, which
/// keeps generated fresh names (`v@7`) collision-free against source
/// names.
pub fn var_name(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len() + 1);
    let mut chars = ident.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => out.extend(first.to_uppercase()),
        Some(first) => {
            out.push('V');
            out.push(first);
        }
        None => out.push('V'),
    }
    for c in chars {
        if c == '\'' {
            out.push_str("@prime");
        } else {
            out.push(c);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// A target expression. Pattern positions reuse the same shape; the
/// subset that is legal there is the producer's responsibility.
#[derive(Debug, Clone, PartialEq)]
pub enum BeamExpr {
    Integer(i64),
    Float(f64),
    Atom(String),
    /// A UTF-8 binary literal.
    Binary(String),
    Char(char),
    Var(String),
    Tuple(Vec<BeamExpr>),
    List(Vec<BeamExpr>),
    Map(Vec<(BeamExpr, BeamExpr)>),
    MapUpdate(Box<BeamExpr>, Vec<(BeamExpr, BeamExpr)>),
    /// `lhs = rhs`: a binding statement, or an alias in pattern position.
    Match(Box<BeamExpr>, Box<BeamExpr>),
    /// `begin ... end`; the value is the last expression's.
    Block(Vec<BeamExpr>),
    /// An anonymous fun.
    Fun(Vec<FunClause>),
    /// `fun name/arity` or `fun module:name/arity`.
    FunRef(Atom, usize),
    Call(CallTarget, Vec<BeamExpr>),
    Case(Box<BeamExpr>, Vec<CaseClause>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallTarget {
    Named(Atom),
    /// Calling the value of an expression: `(E)(Args)`.
    Dynamic(Box<BeamExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunClause {
    /// Patterns; one per argument.
    pub params: Vec<BeamExpr>,
    pub guard: Option<BeamExpr>,
    pub body: BeamExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseClause {
    pub pattern: BeamExpr,
    pub guard: Option<BeamExpr>,
    pub body: BeamExpr,
}

impl BeamExpr {
    pub fn wildcard() -> BeamExpr {
        BeamExpr::Var("_".to_string())
    }

    pub fn atom(name: impl Into<String>) -> BeamExpr {
        BeamExpr::Atom(name.into())
    }

    pub fn var(name: impl Into<String>) -> BeamExpr {
        BeamExpr::Var(name.into())
    }

    pub fn call(target: Atom, args: Vec<BeamExpr>) -> BeamExpr {
        BeamExpr::Call(CallTarget::Named(target), args)
    }

    pub fn call_value(callee: BeamExpr, args: Vec<BeamExpr>) -> BeamExpr {
        BeamExpr::Call(CallTarget::Dynamic(Box::new(callee)), args)
    }

    /// Applies `args` one at a time against a curried value.
    pub fn apply_curried(callee: BeamExpr, args: Vec<BeamExpr>) -> BeamExpr {
        args.into_iter()
            .fold(callee, |acc, arg| BeamExpr::call_value(acc, vec![arg]))
    }

    pub fn bind(lhs: BeamExpr, rhs: BeamExpr) -> BeamExpr {
        BeamExpr::Match(Box::new(lhs), Box::new(rhs))
    }

    /// A single-clause anonymous fun of the given parameter names.
    pub fn fun_n(params: Vec<String>, body: BeamExpr) -> BeamExpr {
        BeamExpr::Fun(vec![FunClause {
            params: params.into_iter().map(BeamExpr::Var).collect(),
            guard: None,
            body,
        }])
    }

    pub fn fun0(body: BeamExpr) -> BeamExpr {
        BeamExpr::fun_n(Vec::new(), body)
    }

    pub fn fun1(param: impl Into<String>, body: BeamExpr) -> BeamExpr {
        BeamExpr::fun_n(vec![param.into()], body)
    }

    /// Wraps `innermost` in a chain of one-argument funs, outermost
    /// parameter first.
    pub fn curried(params: Vec<String>, innermost: BeamExpr) -> BeamExpr {
        params
            .into_iter()
            .rev()
            .fold(innermost, |body, param| BeamExpr::fun1(param, body))
    }

    /// Wraps statements around a result expression, flattening nested
    /// blocks one level so lowering stages compose without stairs.
    pub fn block(mut stmts: Vec<BeamExpr>, result: BeamExpr) -> BeamExpr {
        if stmts.is_empty() {
            return result;
        }
        match result {
            BeamExpr::Block(inner) => {
                stmts.extend(inner);
                BeamExpr::Block(stmts)
            }
            other => {
                stmts.push(other);
                BeamExpr::Block(stmts)
            }
        }
    }

    pub fn is_var(&self) -> bool {
        matches!(self, BeamExpr::Var(_))
    }
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

/// One function definition: a (name, arity) pair with its body.
#[derive(Debug, Clone, PartialEq)]
pub struct FunDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: BeamExpr,
}

impl FunDef {
    pub fn new(name: impl Into<String>, params: Vec<String>, body: BeamExpr) -> Self {
        Self {
            name: name.into(),
            params,
            body,
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// A module-level attribute declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleAttribute {
    Module(String),
    Export(Vec<(String, usize)>),
    Compile(String),
}

// ---------------------------------------------------------------------------
// Type-annotation terms
// ---------------------------------------------------------------------------

/// A target type-annotation term, used in `-type` and `-spec`
/// declarations.
#[derive(Debug, Clone, PartialEq)]
pub enum BeamType {
    Integer,
    Float,
    Boolean,
    Binary,
    Char,
    /// `atom()` when `None`, a specific atom literal when `Some`.
    Atom(Option<String>),
    Fun(Vec<BeamType>, Box<BeamType>),
    List(Box<BeamType>),
    Map(Vec<(BeamType, BeamType)>),
    Tuple(Vec<BeamType>),
    Union(Vec<BeamType>),
    /// A reference to a locally declared named type.
    Alias(String),
    /// A remote type, e.g. `array:array(T)`.
    Remote(String, String, Vec<BeamType>),
    Var(String),
    Any,
}

impl BeamType {
    pub fn fun(args: Vec<BeamType>, ret: BeamType) -> BeamType {
        BeamType::Fun(args, Box::new(ret))
    }

    pub fn list(elem: BeamType) -> BeamType {
        BeamType::List(Box::new(elem))
    }
}

/// `-type name() :: ty`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeSpec {
    pub name: String,
    pub ty: BeamType,
}

/// `-spec name(Args) -> Ret` for a definition of the given arity.
#[derive(Debug, Clone, PartialEq)]
pub struct FunSpec {
    pub name: String,
    pub args: Vec<BeamType>,
    pub ret: BeamType,
}

impl FunSpec {
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}
