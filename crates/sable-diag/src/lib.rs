//! Error reporting and diagnostics for Sable.
//!
//! This crate provides structured diagnostics addressed by source path and
//! Core node id. Diagnostics are created by `sable-infer` and rendered here
//! for display. No unification variable names reach user-facing output:
//! callers sanitize types before storing them in `expected`/`actual`.

use std::fmt;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Diagnostic severity and categories
// ---------------------------------------------------------------------------

/// How severe a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Broad category for diagnostics. Used for filtering and grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Type mismatch: expected X, got Y.
    TypeMismatch,
    /// A row variable met a value type, or an effect row met a record row.
    KindMismatch,
    /// Record rows disagree on their labels.
    FieldMismatch,
    /// Effect rows disagree on their labels.
    EffectMismatch,
    /// Occurs check failure.
    InfiniteType,
    /// Undefined variable or name.
    UndefinedName,
    /// Arity mismatch in function call or tuple.
    ArityMismatch,
    /// A class constraint stayed non-ground with nothing left to solve it.
    UnsolvedConstraint,
    /// Ground class constraint with no registered instance.
    MissingInstance,
    /// Defaulting could not choose a type.
    AmbiguousType,
    /// Two instances for the same class and type head.
    OverlappingInstance,
    /// Effect name outside the known vocabulary.
    UnknownEffect,
    /// Lambda captured a linear capability by closure.
    CapabilityCapture,
    /// Legacy record encoding met a row-based record.
    RepresentationMismatch,
    /// General type error.
    TypeError,
}

impl Category {
    pub const ALL: [Category; 15] = [
        Category::TypeMismatch,
        Category::KindMismatch,
        Category::FieldMismatch,
        Category::EffectMismatch,
        Category::InfiniteType,
        Category::UndefinedName,
        Category::ArityMismatch,
        Category::UnsolvedConstraint,
        Category::MissingInstance,
        Category::AmbiguousType,
        Category::OverlappingInstance,
        Category::UnknownEffect,
        Category::CapabilityCapture,
        Category::RepresentationMismatch,
        Category::TypeError,
    ];

    pub fn all() -> &'static [Category] {
        &Self::ALL
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::TypeMismatch => "type_mismatch",
            Category::KindMismatch => "kind_mismatch",
            Category::FieldMismatch => "field_mismatch",
            Category::EffectMismatch => "effect_mismatch",
            Category::InfiniteType => "infinite_type",
            Category::UndefinedName => "undefined_name",
            Category::ArityMismatch => "arity_mismatch",
            Category::UnsolvedConstraint => "unsolved_constraint",
            Category::MissingInstance => "missing_instance",
            Category::AmbiguousType => "ambiguous_type",
            Category::OverlappingInstance => "overlapping_instance",
            Category::UnknownEffect => "unknown_effect",
            Category::CapabilityCapture => "capability_capture",
            Category::RepresentationMismatch => "representation_mismatch",
            Category::TypeError => "type_error",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Category::TypeMismatch => "E0001",
            Category::KindMismatch => "E0002",
            Category::FieldMismatch => "E0003",
            Category::EffectMismatch => "E0004",
            Category::InfiniteType => "E0005",
            Category::UndefinedName => "E0006",
            Category::ArityMismatch => "E0007",
            Category::UnsolvedConstraint => "E0008",
            Category::MissingInstance => "E0009",
            Category::AmbiguousType => "E0010",
            Category::OverlappingInstance => "E0011",
            Category::UnknownEffect => "E0012",
            Category::CapabilityCapture => "E0013",
            Category::RepresentationMismatch => "E0014",
            Category::TypeError => "E0015",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Category::TypeMismatch => "Expression type does not match expected type.",
            Category::KindMismatch => "A type and a row, or two rows of different kinds, met.",
            Category::FieldMismatch => "Record fields are missing, extra, or mistyped.",
            Category::EffectMismatch => "A function performs effects its context does not allow.",
            Category::InfiniteType => "A type variable would have to contain itself.",
            Category::UndefinedName => "A referenced variable, function, or name is undefined.",
            Category::ArityMismatch => "A function was called with the wrong number of arguments.",
            Category::UnsolvedConstraint => "A class constraint could not be resolved to a type.",
            Category::MissingInstance => "No instance of the class exists for the type.",
            Category::AmbiguousType => "A type variable could not be defaulted unambiguously.",
            Category::OverlappingInstance => "Two instances exist for the same class and type.",
            Category::UnknownEffect => "An effect annotation names an unknown effect.",
            Category::CapabilityCapture => "A closure captured a linear capability implicitly.",
            Category::RepresentationMismatch => {
                "Two different record encodings were mixed in one program."
            }
            Category::TypeError => "General type checking error.",
        }
    }

    pub fn example_fix(self) -> &'static str {
        match self {
            Category::TypeMismatch => {
                "Adjust the expression or add a conversion to match expected type."
            }
            Category::KindMismatch => "Use a value type where a value is expected.",
            Category::FieldMismatch => "Add the missing field or use an open record type.",
            Category::EffectMismatch => "Add the capability to the signature or handle the effect.",
            Category::InfiniteType => "Break the self-reference, usually a misplaced argument.",
            Category::UndefinedName => "Define/import the missing name or fix the spelling.",
            Category::ArityMismatch => "Call the function with its declared parameter count.",
            Category::UnsolvedConstraint => "Annotate the binding with a concrete type.",
            Category::MissingInstance => "Import the prelude or define an instance.",
            Category::AmbiguousType => "Add a type annotation to pick the numeric type.",
            Category::OverlappingInstance => "Remove one of the duplicate instances.",
            Category::UnknownEffect => "Use one of IO, FS, Net, Clock, Rand, DB, Trace, Async.",
            Category::CapabilityCapture => "Pass the capability as an explicit parameter.",
            Category::RepresentationMismatch => "Check every module with the same record encoding.",
            Category::TypeError => {
                "Follow the source path and help text to align involved types."
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Source paths
// ---------------------------------------------------------------------------

/// Chain of expression-context labels from a declaration down to a node,
/// e.g. `let main > if condition > call argument 1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SourcePath(pub Vec<String>);

impl SourcePath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: impl Into<String>) {
        self.0.push(segment.into());
    }

    pub fn pop(&mut self) -> Option<String> {
        self.0.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<top level>");
        }
        write!(f, "{}", self.0.join(" > "))
    }
}

// ---------------------------------------------------------------------------
// Field-level diffs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    /// Present in the expected row, absent from the actual one.
    Missing,
    /// Present in the actual row, absent from the expected one.
    Extra,
    /// Present in both with incompatible types.
    Mismatched,
}

/// One entry in a row diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDiff {
    pub kind: DiffKind,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl FieldDiff {
    pub fn missing(label: impl Into<String>) -> Self {
        Self {
            kind: DiffKind::Missing,
            label: label.into(),
            detail: None,
        }
    }

    pub fn extra(label: impl Into<String>) -> Self {
        Self {
            kind: DiffKind::Extra,
            label: label.into(),
            detail: None,
        }
    }

    pub fn mismatched(label: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: DiffKind::Mismatched,
            label: label.into(),
            detail: Some(detail.into()),
        }
    }
}

impl fmt::Display for FieldDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.kind {
            DiffKind::Missing => '-',
            DiffKind::Extra => '+',
            DiffKind::Mismatched => '~',
        };
        write!(f, "{marker} {}", self.label)?;
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Diagnostic
// ---------------------------------------------------------------------------

/// A structured diagnostic message.
///
/// Every diagnostic carries enough context to produce an actionable error
/// message without exposing internal checker state.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    /// Stable diagnostic code (e.g. E0001).
    pub code: Option<String>,
    pub severity: Severity,
    pub category: Category,
    /// Primary message: what went wrong.
    pub message: String,
    /// Where it went wrong, as a chain of expression contexts.
    pub path: SourcePath,
    /// Core node id of the failing expression, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diff: Vec<FieldDiff>,
    /// Suggested fix, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(category: Category, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, category, message)
    }

    pub fn warning(category: Category, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, category, message)
    }

    fn new(severity: Severity, category: Category, message: impl Into<String>) -> Self {
        Self {
            code: Some(category.code().to_string()),
            severity,
            category,
            message: message.into(),
            path: SourcePath::new(),
            node: None,
            expected: None,
            actual: None,
            diff: Vec::new(),
            help: None,
        }
    }

    pub fn at(mut self, path: SourcePath, node: Option<u32>) -> Self {
        self.path = path;
        self.node = node;
        self
    }

    pub fn with_types(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }

    pub fn with_diff(mut self, diff: Vec<FieldDiff>) -> Self {
        self.diff = diff;
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        if let Some(code) = &self.code {
            write!(f, "{prefix}[{code}]: {}", self.message)?;
        } else {
            write!(f, "{prefix}: {}", self.message)?;
        }
        if !self.path.is_empty() {
            write!(f, "\n  --> {}", self.path)?;
        }
        if let (Some(expected), Some(actual)) = (&self.expected, &self.actual) {
            write!(f, "\n  expected: {expected}\n  actual:   {actual}")?;
        }
        for entry in &self.diff {
            write!(f, "\n  {entry}")?;
        }
        if let Some(help) = &self.help {
            write!(f, "\n  help: {help}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error type for crates that produce diagnostics
// ---------------------------------------------------------------------------

/// Error type wrapping one or more diagnostics.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", render_summary(.0))]
pub struct DiagnosticError(pub Vec<Diagnostic>);

fn render_summary(diags: &[Diagnostic]) -> String {
    match diags {
        [] => String::new(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{first}\n({} more errors)", rest.len()),
    }
}

impl DiagnosticError {
    pub fn single(diag: Diagnostic) -> Self {
        Self(vec![diag])
    }

    pub fn multiple(diags: Vec<Diagnostic>) -> Self {
        Self(diags)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.0
    }

    pub fn has_category(&self, category: Category) -> bool {
        self.0.iter().any(|d| d.category == category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> SourcePath {
        SourcePath(segments.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn diagnostic_builder() {
        let diag = Diagnostic::error(Category::TypeMismatch, "expected Int, got String")
            .at(path(&["let main", "call argument 1"]), Some(7))
            .with_types("Int", "String")
            .with_help("convert with `to_int`");

        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.code.as_deref(), Some("E0001"));
        assert_eq!(diag.category, Category::TypeMismatch);
        assert_eq!(diag.node, Some(7));
        assert!(diag.message.contains("expected Int"));
        assert!(diag.help.unwrap().contains("to_int"));
    }

    #[test]
    fn diagnostic_display() {
        let diag = Diagnostic::error(Category::FieldMismatch, "record fields do not match")
            .at(path(&["let p", "record"]), None)
            .with_diff(vec![FieldDiff::extra("y")]);
        let s = format!("{diag}");
        assert!(s.starts_with("error[E0003]: record fields do not match"));
        assert!(s.contains("--> let p > record"));
        assert!(s.contains("+ y"));
    }

    #[test]
    fn error_summary_counts_the_rest() {
        let err = DiagnosticError::multiple(vec![
            Diagnostic::error(Category::UndefinedName, "undefined variable `a`"),
            Diagnostic::error(Category::UndefinedName, "undefined variable `b`"),
        ]);
        let rendered = err.to_string();
        assert!(rendered.contains("`a`"));
        assert!(rendered.contains("(1 more errors)"));
        assert!(err.has_category(Category::UndefinedName));
    }

    #[test]
    fn empty_path_renders_top_level() {
        assert_eq!(SourcePath::new().to_string(), "<top level>");
    }

    #[test]
    fn category_metadata_is_stable_and_unique() {
        let mut codes = std::collections::BTreeSet::new();
        for cat in Category::all() {
            assert!(!cat.as_str().is_empty());
            assert!(!cat.description().is_empty());
            assert!(!cat.example_fix().is_empty());
            assert!(
                codes.insert(cat.code()),
                "duplicate diagnostic code detected: {}",
                cat.code()
            );
        }
    }
}
