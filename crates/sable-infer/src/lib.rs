//! HM type inference with row-polymorphic effects and records for Sable.
//!
//! This crate implements:
//! - Constraint-based Hindley-Milner inference with let-polymorphism and
//!   the value restriction
//! - Rémy-style row unification shared by records and effect rows
//! - Type classes with coherent instances, superclass derivation, and
//!   numeric defaulting at generalization boundaries
//! - Resolution of ground class constraints into the table consumed by
//!   dictionary-passing elaboration
//!
//! Equality constraints carry provenance (node id, source path, reason) so
//! that a failed unification can be reported against the expression that
//! produced it.

pub mod builtins;
pub mod checker;
pub mod config;
pub mod defaulting;
pub mod effects;
pub mod instances;
pub mod resolve;
mod rows;
pub mod trace;
pub mod typeck;
pub mod typed;

use std::collections::BTreeSet;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, Ordering};

use sable_ast::NodeId;
use sable_types::{
    Kind, Label, Row, RowVarId, Substitution, Type, TypeVar, TypeVarId, free_type_vars,
    row_free_row_vars, sanitize_type_display, sanitize_type_pair_display,
};

use crate::resolve::ResolvedConstraints;
use crate::trace::{InferRule, InferStep, UnifyAction, UnifyStep};
use crate::typed::ApplySubst;

/// Global counters for type and row variable IDs.
///
/// Each `Unifier` allocates IDs from these counters so that no two contexts
/// ever produce the same `TypeVarId` or `RowVarId`. Builtin schemes and
/// schemes from earlier declarations share one `TypeEnv`, and applying one
/// context's substitution to them must never capture a foreign variable.
static GLOBAL_TYPE_VAR: AtomicU32 = AtomicU32::new(0);
static GLOBAL_ROW_VAR: AtomicU32 = AtomicU32::new(0);

/// IDs requested per context, so the atomic increment happens once per
/// context rather than once per variable.
const VAR_BLOCK_SIZE: u32 = 1024;

fn alloc_var_block(counter: &AtomicU32) -> u32 {
    counter.fetch_add(VAR_BLOCK_SIZE, Ordering::Relaxed)
}

// Re-export for convenience.
pub use sable_diag::{Category, Diagnostic, DiagnosticError, SourcePath};
pub use sable_types::TypeScheme;

// ---------------------------------------------------------------------------
// Provenance: why a constraint exists
// ---------------------------------------------------------------------------

/// Tracks the origin of a type constraint for error reporting.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub node: NodeId,
    pub path: SourcePath,
    pub reason: Reason,
}

/// Why a constraint was generated.
#[derive(Debug, Clone)]
pub enum Reason {
    /// Two sides of a binary operator must be compatible.
    BinaryOp(&'static str),
    /// Unary operator operand.
    UnaryOp(&'static str),
    /// Function argument must match parameter type.
    FunctionArg { param_index: usize },
    /// Callee must be a function of the right shape.
    Application,
    IfCondition,
    IfBranches,
    MatchArms,
    /// Pattern must match the scrutinee type.
    PatternMatch,
    /// Record field type must match.
    RecordField { label: Label },
    ListElement,
    /// Binding in a recursive group must match its placeholder.
    LetRec,
    /// Lambda body effects must fit the annotated effect row.
    EffectAnnotation,
    /// Effect rows joined at one expression share their tail.
    EffectJoin,
}

// ---------------------------------------------------------------------------
// Constraints
// ---------------------------------------------------------------------------

/// An equality constraint generated during type inference.
#[derive(Debug, Clone)]
pub enum Constraint {
    /// Two types must be equal.
    TypeEqual {
        expected: Type,
        actual: Type,
        provenance: Provenance,
    },
    /// Two rows must be equal.
    RowEqual {
        expected: Row,
        actual: Row,
        provenance: Provenance,
    },
}

/// Where a class constraint came from. Only operator and instantiation
/// constraints are exported to the elaborator; literal constraints are
/// checked but carry no dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintOrigin {
    Literal,
    Operator,
    Instantiation,
}

/// A class constraint `C τ` at a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassConstraint {
    pub class_name: String,
    pub ty: Type,
    pub path: SourcePath,
    pub node: NodeId,
    pub origin: ConstraintOrigin,
}

impl ClassConstraint {
    pub fn is_ground(&self) -> bool {
        sable_types::is_ground(&self.ty)
    }
}

/// Scoped accumulator for equality constraints.
#[derive(Debug, Clone)]
pub struct ConstraintSet {
    scopes: Vec<Vec<Constraint>>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self {
            scopes: vec![Vec::new()],
        }
    }

    /// Push a nested scope. Constraints emitted afterward are local until pop.
    pub fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    /// Pop the current scope.
    ///
    /// When `commit` is true, popped constraints are appended to the parent
    /// scope. When false, they are discarded. Returns `false` when attempting
    /// to pop the root scope.
    pub fn pop_scope(&mut self, commit: bool) -> bool {
        if self.scopes.len() == 1 {
            return false;
        }
        let Some(popped) = self.scopes.pop() else {
            return false;
        };
        if commit {
            if let Some(parent) = self.scopes.last_mut() {
                parent.extend(popped);
            }
        }
        true
    }

    pub fn push(&mut self, constraint: Constraint) {
        match self.scopes.last_mut() {
            Some(scope) => scope.push(constraint),
            None => self.scopes.push(vec![constraint]),
        }
    }

    pub fn len(&self) -> usize {
        self.scopes.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain all constraints in emission order.
    pub fn drain(&mut self) -> Vec<Constraint> {
        let drained: Vec<Constraint> = self.scopes.iter_mut().flat_map(std::mem::take).collect();
        self.scopes.truncate(1);
        drained
    }
}

impl Default for ConstraintSet {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A unification failure before provenance is attached.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UnifyError {
    #[error("cannot unify `{expected}` with `{actual}`")]
    Mismatch { expected: Type, actual: Type },
    #[error("kind mismatch: expected {expected}, found {actual}")]
    Kind { expected: Kind, actual: Kind },
    #[error("type variable occurs in `{ty}`")]
    Occurs { var: TypeVar, ty: Type },
    #[error("row variable occurs in `{row}`")]
    RowOccurs { var: RowVarId, row: Row },
    #[error("expected {expected} parameters, found {actual}")]
    Arity { expected: usize, actual: usize },
    #[error("expected a tuple of {expected} elements, found {actual}")]
    TupleArity { expected: usize, actual: usize },
    /// Closed rows (or rows sharing one tail) with disagreeing labels.
    /// `missing` labels are only in the expected row, `extra` only in the
    /// actual row.
    #[error("rows do not match")]
    Rows {
        kind: Kind,
        missing: Vec<Label>,
        extra: Vec<Label>,
    },
    #[error("field `{label}`: {source}")]
    Field {
        label: Label,
        source: Box<UnifyError>,
    },
    #[error("record representations differ: `{expected}` vs `{actual}`")]
    Representation { expected: Type, actual: Type },
}

/// Internal invariant failures. These indicate a solver or defaulting bug,
/// never a property of the checked program, and travel on a channel
/// separate from user diagnostics.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("non-ground type `{ty}` reached instance resolution for `{class_name}` at node {node}")]
    NonGroundResolution {
        class_name: String,
        ty: String,
        node: NodeId,
    },
    #[error("non-ground resolved constraint `{class_name} {ty}` at node {node} reached export")]
    NonGroundExport {
        class_name: String,
        ty: String,
        node: NodeId,
    },
}

fn type_mismatch_message(expected: &str, actual: &str, reason: &Reason) -> String {
    match reason {
        Reason::BinaryOp(op) => {
            format!("operands of `{op}` have incompatible types: {expected} and {actual}")
        }
        Reason::UnaryOp(op) => format!("operand of `{op}` must be {expected}, got {actual}"),
        Reason::FunctionArg { param_index } => format!(
            "argument {} has type {actual}, expected {expected}",
            param_index + 1
        ),
        Reason::Application => format!("expected a function {expected}, got {actual}"),
        Reason::IfCondition => format!("if condition must be {expected}, got {actual}"),
        Reason::IfBranches => {
            format!("if branches have incompatible types: {expected} and {actual}")
        }
        Reason::MatchArms => {
            format!("match arms have incompatible types: {expected} and {actual}")
        }
        Reason::PatternMatch => format!("pattern of type {actual} cannot match {expected}"),
        Reason::RecordField { label } => {
            format!("field `{label}` has type {actual}, expected {expected}")
        }
        Reason::ListElement => {
            format!("list elements have incompatible types: {expected} and {actual}")
        }
        Reason::LetRec => format!("recursive use expects {expected}, got {actual}"),
        Reason::EffectAnnotation | Reason::EffectJoin => {
            format!("expected {expected}, got {actual}")
        }
    }
}

fn join_labels(labels: &[Label]) -> String {
    labels
        .iter()
        .map(Label::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Turn a unification failure into a user-facing diagnostic.
///
/// `expected`/`actual` are the outer types the constraint was about; the
/// error may concern a nested part of them.
pub fn unify_diagnostic(
    err: &UnifyError,
    expected: &str,
    actual: &str,
    provenance: &Provenance,
) -> Diagnostic {
    let diag = match err {
        UnifyError::Mismatch {
            expected: inner_expected,
            actual: inner_actual,
        } => {
            let (e, a) = sanitize_type_pair_display(inner_expected, inner_actual);
            Diagnostic::error(
                Category::TypeMismatch,
                type_mismatch_message(&e, &a, &provenance.reason),
            )
        }
        UnifyError::Kind {
            expected: ek,
            actual: ak,
        } => Diagnostic::error(
            Category::KindMismatch,
            format!("kind mismatch: expected {ek}, found {ak}"),
        )
        .with_help("an effect row and a record row can never be unified"),
        UnifyError::Occurs { var, ty } => {
            let (v, t) = sanitize_type_pair_display(&Type::Var(var.clone()), ty);
            Diagnostic::error(
                Category::InfiniteType,
                format!("infinite type detected: `{v}` occurs in `{t}`"),
            )
        }
        UnifyError::RowOccurs { row, .. } => Diagnostic::error(
            Category::InfiniteType,
            format!(
                "infinite row detected: a row would contain itself in `{}`",
                sanitize_type_display(&Type::Record(row.clone()))
            ),
        ),
        UnifyError::Arity {
            expected: e,
            actual: a,
        } => Diagnostic::error(
            Category::ArityMismatch,
            format!("expected a function of {e} parameters, got one of {a}"),
        ),
        UnifyError::TupleArity {
            expected: e,
            actual: a,
        } => Diagnostic::error(
            Category::ArityMismatch,
            format!("expected a tuple of {e} elements, got {a}"),
        ),
        UnifyError::Rows {
            kind,
            missing,
            extra,
        } => rows_diagnostic(kind, missing, extra),
        UnifyError::Field { label, source } => {
            let detail = match source.as_ref() {
                UnifyError::Mismatch {
                    expected: fe,
                    actual: fa,
                } => {
                    let (e, a) = sanitize_type_pair_display(fe, fa);
                    format!("expected {e}, got {a}")
                }
                other => other.to_string(),
            };
            Diagnostic::error(
                Category::FieldMismatch,
                format!("field `{label}` does not match: {detail}"),
            )
            .with_diff(vec![sable_diag::FieldDiff::mismatched(label.as_str(), detail)])
        }
        UnifyError::Representation { .. } => Diagnostic::error(
            Category::RepresentationMismatch,
            "a legacy positional record met a row-based record",
        )
        .with_help(Category::RepresentationMismatch.example_fix()),
    };
    diag.at(provenance.path.clone(), Some(provenance.node.0))
        .with_types(expected, actual)
}

fn rows_diagnostic(kind: &Kind, missing: &[Label], extra: &[Label]) -> Diagnostic {
    let mut diff: Vec<sable_diag::FieldDiff> = missing
        .iter()
        .map(|l| sable_diag::FieldDiff::missing(l.as_str()))
        .collect();
    diff.extend(extra.iter().map(|l| sable_diag::FieldDiff::extra(l.as_str())));

    if kind.is_effect_row() {
        let mut help = Vec::new();
        if !extra.is_empty() {
            help.push(format!(
                "handle effect {} or add capability {} to the signature",
                join_labels(extra),
                join_labels(extra)
            ));
        }
        if !missing.is_empty() {
            help.push(format!("add capability {}", join_labels(missing)));
        }
        Diagnostic::error(Category::EffectMismatch, "effect rows do not match")
            .with_diff(diff)
            .with_help(help.join("; "))
    } else {
        let mut parts = Vec::new();
        if !missing.is_empty() {
            parts.push(format!("missing field(s) {}", join_labels(missing)));
        }
        if !extra.is_empty() {
            parts.push(format!("extra field(s) {}", join_labels(extra)));
        }
        Diagnostic::error(
            Category::FieldMismatch,
            format!("record fields do not match: {}", parts.join(", ")),
        )
        .with_diff(diff)
        .with_help(Category::FieldMismatch.example_fix())
    }
}

// ---------------------------------------------------------------------------
// Fresh variables
// ---------------------------------------------------------------------------

/// Source of fresh type and row variables.
#[derive(Debug, Clone)]
pub struct VarSupply {
    next_type_var: u32,
    next_row_var: u32,
}

impl VarSupply {
    pub fn new() -> Self {
        Self::with_offsets(
            alloc_var_block(&GLOBAL_TYPE_VAR),
            alloc_var_block(&GLOBAL_ROW_VAR),
        )
    }

    /// Explicit starting offsets, for tests that need deterministic ids.
    pub fn with_offsets(next_type_var: u32, next_row_var: u32) -> Self {
        Self {
            next_type_var,
            next_row_var,
        }
    }

    pub fn fresh_type_var(&mut self) -> TypeVarId {
        let id = TypeVarId(self.next_type_var);
        self.next_type_var += 1;
        id
    }

    pub fn fresh_type(&mut self) -> Type {
        Type::var(self.fresh_type_var())
    }

    pub fn fresh_row_var(&mut self) -> RowVarId {
        let id = RowVarId(self.next_row_var);
        self.next_row_var += 1;
        id
    }
}

impl Default for VarSupply {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unifier
// ---------------------------------------------------------------------------

/// Owns the substitution and performs immediate unification.
#[derive(Debug, Clone)]
pub struct Unifier {
    pub substitution: Substitution,
    supply: VarSupply,
    errors: Vec<Diagnostic>,
    /// When true, unification steps are recorded for observability tools.
    tracing: bool,
    unify_trace: Vec<UnifyStep>,
}

impl Unifier {
    pub fn new() -> Self {
        Self::from_supply(VarSupply::new())
    }

    /// Create with explicit starting offsets for variable IDs.
    ///
    /// Production code should use `new()` (which allocates from a global
    /// counter). This constructor exists for unit tests that need
    /// deterministic ids starting at 0.
    pub fn with_var_offsets(next_type_var: u32, next_row_var: u32) -> Self {
        Self::from_supply(VarSupply::with_offsets(next_type_var, next_row_var))
    }

    fn from_supply(supply: VarSupply) -> Self {
        Self {
            substitution: Substitution::new(),
            supply,
            errors: Vec::new(),
            tracing: false,
            unify_trace: Vec::new(),
        }
    }

    pub fn fresh_type_var(&mut self) -> TypeVarId {
        self.supply.fresh_type_var()
    }

    pub fn fresh_type(&mut self) -> Type {
        self.supply.fresh_type()
    }

    pub fn fresh_row_var(&mut self) -> RowVarId {
        self.supply.fresh_row_var()
    }

    pub fn supply_mut(&mut self) -> &mut VarSupply {
        &mut self.supply
    }

    /// Apply the current substitution.
    pub fn apply(&self, ty: &Type) -> Type {
        self.substitution.apply(ty)
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn push_error(&mut self, diag: Diagnostic) {
        self.errors.push(diag);
    }

    pub fn take_errors(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.errors)
    }

    /// Unify `expected` with `actual`, extending the substitution.
    pub fn unify(&mut self, expected: &Type, actual: &Type) -> Result<(), UnifyError> {
        let expected = self.substitution.apply(expected);
        let actual = self.substitution.apply(actual);

        if expected == actual {
            self.push_unify_step(UnifyAction::Identity, &expected, &actual, String::new());
            return Ok(());
        }

        match (&expected, &actual) {
            (Type::Var(var), _) => self.bind_type_var(var, &actual),
            // Re-dispatch with the variable on the left.
            (_, Type::Var(var)) => self.bind_type_var(var, &expected),

            (Type::App(h1, args1), Type::App(h2, args2)) => {
                if args1.len() != args2.len() {
                    return Err(self.mismatch(&expected, &actual));
                }
                self.push_unify_step(
                    UnifyAction::Decompose,
                    &expected,
                    &actual,
                    "application".to_string(),
                );
                self.unify(h1, h2)?;
                for (a, b) in args1.iter().zip(args2) {
                    self.unify(a, b)?;
                }
                Ok(())
            }

            (Type::List(a), Type::List(b)) => {
                self.push_unify_step(
                    UnifyAction::Decompose,
                    &expected,
                    &actual,
                    "list element".to_string(),
                );
                self.unify(a, b)
            }

            (Type::Tuple(elems1), Type::Tuple(elems2)) => {
                if elems1.len() != elems2.len() {
                    self.push_unify_step(
                        UnifyAction::Error,
                        &expected,
                        &actual,
                        "tuple arity".to_string(),
                    );
                    return Err(UnifyError::TupleArity {
                        expected: elems1.len(),
                        actual: elems2.len(),
                    });
                }
                self.push_unify_step(
                    UnifyAction::Decompose,
                    &expected,
                    &actual,
                    "tuple elements".to_string(),
                );
                for (a, b) in elems1.iter().zip(elems2) {
                    self.unify(a, b)?;
                }
                Ok(())
            }

            (Type::Function(f1), Type::Function(f2)) => {
                if f1.params.len() != f2.params.len() {
                    self.push_unify_step(
                        UnifyAction::Error,
                        &expected,
                        &actual,
                        "function arity".to_string(),
                    );
                    return Err(UnifyError::Arity {
                        expected: f1.params.len(),
                        actual: f2.params.len(),
                    });
                }
                self.push_unify_step(
                    UnifyAction::Decompose,
                    &expected,
                    &actual,
                    "function parameters, effects, return".to_string(),
                );
                for (a, b) in f1.params.iter().zip(&f2.params) {
                    self.unify(a, b)?;
                }
                self.unify_rows(&f1.effects.to_row(), &f2.effects.to_row())?;
                self.unify(&f1.ret, &f2.ret)
            }

            (Type::Record(r1), Type::Record(r2)) => self.unify_rows(r1, r2),

            (Type::Record(_), Type::App(..)) if actual.legacy_record_labels().is_some() => {
                self.representation_mismatch(&expected, &actual)
            }
            (Type::App(..), Type::Record(_)) if expected.legacy_record_labels().is_some() => {
                self.representation_mismatch(&expected, &actual)
            }

            _ => Err(self.mismatch(&expected, &actual)),
        }
    }

    fn mismatch(&mut self, expected: &Type, actual: &Type) -> UnifyError {
        self.push_unify_step(UnifyAction::Error, expected, actual, "mismatch".to_string());
        UnifyError::Mismatch {
            expected: expected.clone(),
            actual: actual.clone(),
        }
    }

    fn representation_mismatch(&mut self, expected: &Type, actual: &Type) -> Result<(), UnifyError> {
        self.push_unify_step(
            UnifyAction::Error,
            expected,
            actual,
            "record representation".to_string(),
        );
        Err(UnifyError::Representation {
            expected: expected.clone(),
            actual: actual.clone(),
        })
    }

    /// Bind a type variable after the occurs and kind checks.
    fn bind_type_var(&mut self, var: &TypeVar, ty: &Type) -> Result<(), UnifyError> {
        let var_ty = Type::Var(var.clone());
        if let Type::Var(other) = ty {
            if other.id == var.id {
                if other.kind == var.kind {
                    return Ok(());
                }
                self.push_unify_step(UnifyAction::KindCheck, &var_ty, ty, String::new());
                return Err(UnifyError::Kind {
                    expected: var.kind.clone(),
                    actual: other.kind.clone(),
                });
            }
        }
        if free_type_vars(ty).contains(&var.id) {
            self.push_unify_step(
                UnifyAction::OccursCheck,
                &var_ty,
                ty,
                "infinite type".to_string(),
            );
            return Err(UnifyError::Occurs {
                var: var.clone(),
                ty: ty.clone(),
            });
        }
        let ty_kind = ty.kind();
        if var.kind != ty_kind {
            self.push_unify_step(UnifyAction::KindCheck, &var_ty, ty, String::new());
            return Err(UnifyError::Kind {
                expected: var.kind.clone(),
                actual: ty_kind,
            });
        }
        self.push_unify_step(
            UnifyAction::Bind,
            &var_ty,
            ty,
            format!("t{} := {}", var.id.0, sanitize_type_display(ty)),
        );
        self.substitution.bind_type(var.id, ty.clone());
        Ok(())
    }

    /// Bind a row variable after the occurs check.
    fn bind_row_var(&mut self, var: RowVarId, row: Row) -> Result<(), UnifyError> {
        if row.rest == Some(var) && row.fields.is_empty() {
            return Ok(());
        }
        let as_type = Type::Record(row.clone());
        if row_free_row_vars(&row).contains(&var) {
            self.push_unify_step(
                UnifyAction::OccursCheck,
                &as_type,
                &as_type,
                format!("row variable {} occurs in its binding", var.0),
            );
            return Err(UnifyError::RowOccurs { var, row });
        }
        self.push_unify_step(
            UnifyAction::BindRowVar,
            &as_type,
            &as_type,
            format!("row {} := {row}", var.0),
        );
        self.substitution.bind_row(var, row);
        Ok(())
    }

    /// Bind defaulted variables. Variables that are already bound are left
    /// alone: defaulting only ever targets unresolved variables.
    pub fn bind_defaults(&mut self, defaults: &Substitution) {
        for (var, ty) in defaults.type_bindings() {
            if self.substitution.lookup_type(*var).is_none() {
                self.substitution.bind_type(*var, ty.clone());
            }
        }
    }

    /// Enable step-by-step tracing of unification.
    pub fn enable_tracing(&mut self) {
        self.tracing = true;
    }

    /// Whether tracing is active.
    pub fn is_tracing(&self) -> bool {
        self.tracing
    }

    /// Get the unification trace (empty if tracing was not enabled).
    pub fn unify_trace(&self) -> &[UnifyStep] {
        &self.unify_trace
    }

    fn push_unify_step(&mut self, action: UnifyAction, left: &Type, right: &Type, detail: String) {
        if self.tracing {
            let step_num = self.unify_trace.len() + 1;
            self.unify_trace.push(UnifyStep {
                step: step_num,
                action,
                left: sanitize_type_display(left),
                right: sanitize_type_display(right),
                detail,
            });
        }
    }
}

impl Default for Unifier {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Inference context
// ---------------------------------------------------------------------------

/// Generates fresh variables, collects constraints, and tracks the source
/// path during inference.
///
/// Equality constraints are buffered and solved by `flush`/`solve`. Class
/// constraints stay live in a stack of scopes that mirrors generalization
/// boundaries.
#[derive(Debug, Clone)]
pub struct InferenceContext {
    unifier: Unifier,
    constraints: ConstraintSet,
    class_scopes: Vec<Vec<ClassConstraint>>,
    path: SourcePath,
    resolved: ResolvedConstraints,
    internal: Option<InvariantViolation>,
    infer_trace: Vec<InferStep>,
}

impl InferenceContext {
    pub fn new() -> Self {
        Self::from_unifier(Unifier::new())
    }

    /// Create with deterministic variable ID offsets (for tests).
    pub fn with_var_offsets(type_offset: u32, row_offset: u32) -> Self {
        Self::from_unifier(Unifier::with_var_offsets(type_offset, row_offset))
    }

    pub fn from_unifier(unifier: Unifier) -> Self {
        Self {
            unifier,
            constraints: ConstraintSet::new(),
            class_scopes: vec![Vec::new()],
            path: SourcePath::new(),
            resolved: ResolvedConstraints::default(),
            internal: None,
            infer_trace: Vec::new(),
        }
    }

    /// Emit a constraint that two types must be equal.
    pub fn constrain_equal(&mut self, expected: Type, actual: Type, provenance: Provenance) {
        self.constraints.push(Constraint::TypeEqual {
            expected,
            actual,
            provenance,
        });
    }

    /// Emit a constraint that two rows must be equal.
    pub fn constrain_row_equal(&mut self, expected: Row, actual: Row, provenance: Provenance) {
        self.constraints.push(Constraint::RowEqual {
            expected,
            actual,
            provenance,
        });
    }

    pub fn pending_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Phase one of solving: fold every buffered equality constraint into
    /// the substitution. Failures are recorded as diagnostics.
    pub fn flush(&mut self) {
        for constraint in self.constraints.drain() {
            match constraint {
                Constraint::TypeEqual {
                    expected,
                    actual,
                    provenance,
                } => {
                    log::trace!("solving {expected} ~ {actual} at node {}", provenance.node);
                    if let Err(err) = self.unifier.unify(&expected, &actual) {
                        let (e, a) = sanitize_type_pair_display(
                            &self.unifier.apply(&expected),
                            &self.unifier.apply(&actual),
                        );
                        let diag = unify_diagnostic(&err, &e, &a, &provenance);
                        self.unifier.push_error(diag);
                    }
                }
                Constraint::RowEqual {
                    expected,
                    actual,
                    provenance,
                } => {
                    log::trace!("solving row {expected} ~ {actual} at node {}", provenance.node);
                    if let Err(err) = self.unifier.unify_rows(&expected, &actual) {
                        let e = self.unifier.substitution.apply_row(&expected).to_string();
                        let a = self.unifier.substitution.apply_row(&actual).to_string();
                        let diag = unify_diagnostic(&err, &e, &a, &provenance);
                        self.unifier.push_error(diag);
                    }
                }
            }
        }
    }

    /// Two-phase solve: unify all equality constraints, then apply the
    /// resulting substitution to every live class constraint. Returns the
    /// substituted constraints of the innermost scope.
    pub fn solve(&mut self) -> Vec<ClassConstraint> {
        self.flush();
        let subst = &self.unifier.substitution;
        for scope in &mut self.class_scopes {
            for constraint in scope.iter_mut() {
                constraint.ty = subst.apply(&constraint.ty);
            }
        }
        self.class_scopes.last().cloned().unwrap_or_default()
    }

    /// Record a class constraint in the innermost scope.
    pub fn add_class_constraint(
        &mut self,
        class_name: &str,
        ty: Type,
        node: NodeId,
        origin: ConstraintOrigin,
    ) {
        let constraint = ClassConstraint {
            class_name: class_name.to_string(),
            ty,
            path: self.path.clone(),
            node,
            origin,
        };
        match self.class_scopes.last_mut() {
            Some(scope) => scope.push(constraint),
            None => self.class_scopes.push(vec![constraint]),
        }
    }

    /// Whether any live class constraint puts `class_name` on `ty`.
    pub fn has_live_class(&self, ty: &Type, class_name: &str) -> bool {
        let target = self.unifier.apply(ty);
        self.class_scopes.iter().flatten().any(|c| {
            c.class_name == class_name && self.unifier.apply(&c.ty) == target
        })
    }

    /// Open a class-constraint scope for a generalization boundary.
    pub fn push_class_scope(&mut self) {
        self.class_scopes.push(Vec::new());
    }

    /// Close the innermost class-constraint scope and return its constraints.
    pub fn pop_class_scope(&mut self) -> Vec<ClassConstraint> {
        if self.class_scopes.len() == 1 {
            return self.class_scopes.first_mut().map(std::mem::take).unwrap_or_default();
        }
        self.class_scopes.pop().unwrap_or_default()
    }

    /// Hand constraints that a boundary could not discharge to the enclosing
    /// scope.
    pub fn defer_class_constraints(&mut self, constraints: Vec<ClassConstraint>) {
        match self.class_scopes.last_mut() {
            Some(scope) => scope.extend(constraints),
            None => self.class_scopes.push(constraints),
        }
    }

    /// Bind defaulted variables and re-substitute every live class constraint
    /// and every recorded resolution with the composed substitution.
    pub fn apply_defaults(&mut self, defaults: &Substitution) {
        if defaults.is_empty() {
            return;
        }
        self.unifier.bind_defaults(defaults);
        let subst = &self.unifier.substitution;
        for scope in &mut self.class_scopes {
            for constraint in scope.iter_mut() {
                constraint.ty = subst.apply(&constraint.ty);
            }
        }
        self.resolved.apply_subst(subst);
    }

    // -- Source path --------------------------------------------------------

    pub fn enter(&mut self, label: impl Into<String>) {
        self.path.push(label);
    }

    pub fn leave(&mut self) {
        self.path.pop();
    }

    pub fn path(&self) -> &SourcePath {
        &self.path
    }

    pub fn provenance(&self, node: NodeId, reason: Reason) -> Provenance {
        Provenance {
            node,
            path: self.path.clone(),
            reason,
        }
    }

    /// Record a diagnostic at `node` on the current path.
    pub fn report(&mut self, node: NodeId, diag: Diagnostic) {
        let diag = if diag.path.is_empty() {
            diag.at(self.path.clone(), Some(node.0))
        } else {
            diag
        };
        self.unifier.push_error(diag);
    }

    // -- Resolution and invariants ------------------------------------------

    pub fn resolved(&self) -> &ResolvedConstraints {
        &self.resolved
    }

    pub fn resolved_mut(&mut self) -> &mut ResolvedConstraints {
        &mut self.resolved
    }

    pub fn fail_internal(&mut self, violation: InvariantViolation) {
        log::error!("internal invariant violated: {violation}");
        if self.internal.is_none() {
            self.internal = Some(violation);
        }
    }

    pub fn take_internal(&mut self) -> Option<InvariantViolation> {
        self.internal.take()
    }

    pub fn has_internal_failure(&self) -> bool {
        self.internal.is_some()
    }

    // -- Tracing -------------------------------------------------------------

    /// Enable unification and inference-rule tracing.
    pub fn enable_tracing(&mut self) {
        self.unifier.enable_tracing();
    }

    pub fn infer_trace(&self) -> &[InferStep] {
        &self.infer_trace
    }

    pub fn push_infer_step(&mut self, node: NodeId, ty: &Type, rule: InferRule, detail: String) {
        if self.unifier.is_tracing() {
            self.infer_trace.push(InferStep {
                node: node.0,
                ty: sanitize_type_display(&self.unifier.apply(ty)),
                rule,
                detail,
            });
        }
    }

    /// Type and row variables free in the live class constraints.
    pub fn live_class_vars(&self) -> BTreeSet<TypeVarId> {
        self.class_scopes
            .iter()
            .flatten()
            .flat_map(|c| free_type_vars(&self.unifier.apply(&c.ty)))
            .collect()
    }
}

impl Default for InferenceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for InferenceContext {
    type Target = Unifier;

    fn deref(&self) -> &Unifier {
        &self.unifier
    }
}

impl DerefMut for InferenceContext {
    fn deref_mut(&mut self) -> &mut Unifier {
        &mut self.unifier
    }
}

#[cfg(test)]
mod prop_tests;


#[cfg(test)]
mod tests {
    use super::*;
    use sable_types::{EffectRow, FunctionType};

    fn test_prov() -> Provenance {
        Provenance {
            node: NodeId(0),
            path: SourcePath::new(),
            reason: Reason::Application,
        }
    }

    fn tv(u: &mut Unifier) -> Type {
        u.fresh_type()
    }

    #[test]
    fn unify_identical_constructors() {
        let mut u = Unifier::with_var_offsets(0, 0);
        assert!(u.unify(&Type::int(), &Type::int()).is_ok());
        assert!(u.unify(&Type::int(), &Type::string()).is_err());
    }

    #[test]
    fn unify_var_binds_either_side() {
        let mut u = Unifier::with_var_offsets(0, 0);
        let a = tv(&mut u);
        let b = tv(&mut u);
        u.unify(&a, &Type::int()).unwrap();
        u.unify(&Type::bool(), &b).unwrap();
        assert_eq!(u.apply(&a), Type::int());
        assert_eq!(u.apply(&b), Type::bool());
    }

    #[test]
    fn occurs_check_rejects_self_referential_function() {
        let mut u = Unifier::with_var_offsets(0, 0);
        let a = tv(&mut u);
        let as_param = Type::pure_function(vec![a.clone()], Type::int());
        assert!(matches!(
            u.unify(&a, &as_param),
            Err(UnifyError::Occurs { .. })
        ));

        let mut u = Unifier::with_var_offsets(0, 0);
        let a = tv(&mut u);
        let as_return = Type::pure_function(vec![Type::int()], a.clone());
        assert!(matches!(
            u.unify(&as_return, &a),
            Err(UnifyError::Occurs { .. })
        ));
    }

    #[test]
    fn distinct_variables_unify_trivially() {
        let mut u = Unifier::with_var_offsets(0, 0);
        let a = tv(&mut u);
        let b = tv(&mut u);
        assert!(u.unify(&a, &b).is_ok());
        assert_eq!(u.apply(&a), u.apply(&b));
    }

    #[test]
    fn kind_mismatch_between_type_var_and_row_kinded_var() {
        let mut u = Unifier::with_var_offsets(0, 0);
        let id = u.fresh_type_var();
        let star = Type::Var(TypeVar::star(id));
        let row_kinded = Type::Var(TypeVar {
            id,
            kind: Kind::effect_row(),
        });
        assert!(matches!(
            u.unify(&star, &row_kinded),
            Err(UnifyError::Kind { .. })
        ));

        let other = Type::Var(TypeVar {
            id: u.fresh_type_var(),
            kind: Kind::record_row(),
        });
        assert!(matches!(
            u.unify(&other, &Type::int()),
            Err(UnifyError::Kind { .. })
        ));
    }

    #[test]
    fn function_arity_mismatch() {
        let mut u = Unifier::with_var_offsets(0, 0);
        let f1 = Type::pure_function(vec![Type::int()], Type::int());
        let f2 = Type::pure_function(vec![Type::int(), Type::int()], Type::int());
        assert_eq!(
            u.unify(&f1, &f2),
            Err(UnifyError::Arity {
                expected: 1,
                actual: 2
            })
        );
    }

    #[test]
    fn tuple_arity_mismatch() {
        let mut u = Unifier::with_var_offsets(0, 0);
        let t1 = Type::Tuple(vec![Type::int()]);
        let t2 = Type::Tuple(vec![Type::int(), Type::bool()]);
        assert!(matches!(
            u.unify(&t1, &t2),
            Err(UnifyError::TupleArity { .. })
        ));
    }

    #[test]
    fn pure_function_unifies_with_open_effect_row() {
        let mut u = Unifier::with_var_offsets(0, 0);
        let e = u.fresh_row_var();
        let pure = Type::pure_function(vec![Type::int()], Type::int());
        let open = Type::Function(FunctionType {
            params: vec![Type::int()],
            effects: EffectRow::open([], e),
            ret: Box::new(Type::int()),
        });
        u.unify(&pure, &open).unwrap();
        let bound = u.substitution.lookup_row(e).unwrap();
        assert!(bound.is_closed());
        assert!(bound.is_empty());
    }

    #[test]
    fn pure_function_rejects_effectful_function() {
        let mut u = Unifier::with_var_offsets(0, 0);
        let pure = Type::pure_function(vec![], Type::unit());
        let io = Type::function(vec![], EffectRow::closed([Label::new("IO")]), Type::unit());
        assert!(matches!(
            u.unify(&pure, &io),
            Err(UnifyError::Rows { .. })
        ));
    }

    #[test]
    fn legacy_record_against_row_record_is_explicit_error() {
        let mut u = Unifier::with_var_offsets(0, 0);
        let fields = [(Label::new("x"), Type::int())];
        let legacy = Type::legacy_record(&fields.iter().cloned().collect());
        let rows = Type::Record(Row::closed_record(fields));
        assert!(matches!(
            u.unify(&legacy, &rows),
            Err(UnifyError::Representation { .. })
        ));
    }

    #[test]
    fn flush_records_diagnostic_with_provenance() {
        let mut ctx = InferenceContext::with_var_offsets(0, 0);
        ctx.enter("let main");
        let prov = ctx.provenance(NodeId(4), Reason::IfCondition);
        ctx.constrain_equal(Type::bool(), Type::int(), prov);
        ctx.flush();
        assert_eq!(ctx.error_count(), 1);
        let diag = &ctx.errors()[0];
        assert_eq!(diag.category, Category::TypeMismatch);
        assert_eq!(diag.node, Some(4));
        assert_eq!(diag.path.to_string(), "let main");
        assert!(diag.message.contains("if condition must be Bool, got Int"));
    }

    #[test]
    fn solve_substitutes_class_constraints() {
        let mut ctx = InferenceContext::with_var_offsets(0, 0);
        let a = ctx.fresh_type();
        ctx.add_class_constraint("Num", a.clone(), NodeId(1), ConstraintOrigin::Operator);
        ctx.constrain_equal(a, Type::float(), test_prov());
        let solved = ctx.solve();
        assert_eq!(solved.len(), 1);
        assert_eq!(solved[0].ty, Type::float());
        assert!(solved[0].is_ground());
    }

    #[test]
    fn class_scopes_nest() {
        let mut ctx = InferenceContext::with_var_offsets(0, 0);
        ctx.add_class_constraint("Eq", Type::int(), NodeId(1), ConstraintOrigin::Operator);
        ctx.push_class_scope();
        ctx.add_class_constraint("Ord", Type::int(), NodeId(2), ConstraintOrigin::Operator);
        let inner = ctx.pop_class_scope();
        assert_eq!(inner.len(), 1);
        assert_eq!(inner[0].class_name, "Ord");
        ctx.defer_class_constraints(inner);
        assert!(ctx.has_live_class(&Type::int(), "Ord"));
        assert!(ctx.has_live_class(&Type::int(), "Eq"));
    }

    #[test]
    fn constraint_set_scopes_commit_and_discard() {
        let mut set = ConstraintSet::new();
        set.push_scope();
        set.push(Constraint::TypeEqual {
            expected: Type::int(),
            actual: Type::int(),
            provenance: test_prov(),
        });
        assert!(set.pop_scope(false));
        assert!(set.is_empty());
        set.push_scope();
        set.push(Constraint::TypeEqual {
            expected: Type::int(),
            actual: Type::int(),
            provenance: test_prov(),
        });
        assert!(set.pop_scope(true));
        assert_eq!(set.drain().len(), 1);
        assert!(!set.pop_scope(true));
    }

    #[test]
    fn tracing_records_bind_steps() {
        let mut u = Unifier::with_var_offsets(0, 0);
        u.enable_tracing();
        let a = tv(&mut u);
        u.unify(&a, &Type::int()).unwrap();
        let trace = u.unify_trace();
        assert_eq!(trace.len(), 1);
        assert!(matches!(trace[0].action, UnifyAction::Bind));
        assert_eq!(trace[0].right, "Int");
    }
}
