//! Error reporting and diagnostics for the Vela backend.
//!
//! This crate provides structured diagnostic values. They are created by
//! `vela-codegen` and handed to an external renderer for human- or
//! machine-readable presentation; nothing here does more formatting than
//! a basic `Display`.

use std::fmt;

// ---------------------------------------------------------------------------
// Diagnostic severity and categories
// ---------------------------------------------------------------------------

/// How severe a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

/// Broad category for diagnostics. Used for filtering and grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// A foreign implementation's arity exceeds its declared type.
    InvalidForeignArity,
    /// A declared foreign import has no backing implementation.
    MissingForeignImplementations,
    /// Backing implementations exist that no import references.
    UnusedForeignImplementations,
    /// Case alternatives with differing binder counts were normalized.
    InconsistentClauseArity,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::InvalidForeignArity,
        Category::MissingForeignImplementations,
        Category::UnusedForeignImplementations,
        Category::InconsistentClauseArity,
    ];

    pub fn all() -> &'static [Category] {
        &Self::ALL
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::InvalidForeignArity => "invalid_foreign_arity",
            Category::MissingForeignImplementations => "missing_foreign_implementations",
            Category::UnusedForeignImplementations => "unused_foreign_implementations",
            Category::InconsistentClauseArity => "inconsistent_clause_arity",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Category::InvalidForeignArity => "E0701",
            Category::MissingForeignImplementations => "E0702",
            Category::UnusedForeignImplementations => "W0703",
            Category::InconsistentClauseArity => "W0704",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Category::InvalidForeignArity | Category::MissingForeignImplementations => {
                Severity::Error
            }
            Category::UnusedForeignImplementations | Category::InconsistentClauseArity => {
                Severity::Warning
            }
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Category::InvalidForeignArity => {
                "A foreign implementation exports more arguments than its declared type supports."
            }
            Category::MissingForeignImplementations => {
                "A declared foreign import has no matching implementation symbol."
            }
            Category::UnusedForeignImplementations => {
                "The foreign-code artifact supplies implementations no import references."
            }
            Category::InconsistentClauseArity => {
                "Case alternatives in one case expression had differing binder counts and were \
                 padded to a uniform length."
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// A structured non-fatal diagnostic.
///
/// Warnings accumulate during a module's codegen and are returned
/// alongside a successful result; they never abort compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub category: Category,
    /// The module being compiled when the diagnostic was raised.
    pub module: String,
    /// Symbols the diagnostic concerns, if any.
    pub symbols: Vec<String>,
    /// Primary message: what happened.
    pub message: String,
}

impl Diagnostic {
    pub fn warning(category: Category, module: impl Into<String>, message: impl Into<String>) -> Self {
        debug_assert_eq!(category.severity(), Severity::Warning);
        Self {
            category,
            module: module.into(),
            symbols: Vec::new(),
            message: message.into(),
        }
    }

    pub fn with_symbols(mut self, symbols: Vec<String>) -> Self {
        self.symbols = symbols;
        self
    }

    pub fn severity(&self) -> Severity {
        self.category.severity()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "warning[{}] in {}: {}",
            self.category.code(),
            self.module,
            self.message
        )?;
        if !self.symbols.is_empty() {
            write!(f, " ({})", self.symbols.join(", "))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fatal errors
// ---------------------------------------------------------------------------

/// A fatal codegen error. The first one encountered aborts the module's
/// compilation; no partial output is produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodegenError {
    #[error(
        "foreign implementation `{symbol}` in module `{module}` has arity {actual}, but its \
         declared type supports at most {declared}"
    )]
    InvalidForeignArity {
        module: String,
        symbol: String,
        actual: usize,
        declared: usize,
    },
    #[error("module `{module}` declares foreign imports with no implementation: {}", .symbols.join(", "))]
    MissingForeignImplementations {
        module: String,
        symbols: Vec<String>,
    },
}

impl CodegenError {
    pub fn category(&self) -> Category {
        match self {
            CodegenError::InvalidForeignArity { .. } => Category::InvalidForeignArity,
            CodegenError::MissingForeignImplementations { .. } => {
                Category::MissingForeignImplementations
            }
        }
    }
}
