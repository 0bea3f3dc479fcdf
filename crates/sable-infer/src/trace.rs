//! Step-by-step traces of unification and inference.
//!
//! Tracing is opt-in via `Unifier::enable_tracing()` and costs nothing when
//! disabled. Types are recorded in sanitized display form so traces are
//! stable across runs.

use serde::Serialize;

/// A single step in a unification trace.
#[derive(Debug, Clone, Serialize)]
pub struct UnifyStep {
    pub step: usize,
    pub action: UnifyAction,
    pub left: String,
    pub right: String,
    pub detail: String,
}

/// What action was taken during a unification step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnifyAction {
    /// Types are already identical.
    Identity,
    /// Structural recursion, e.g. `List(A) ~ List(B)` to `A ~ B`.
    Decompose,
    /// Type variable bound to a type.
    Bind,
    /// Entered row unification.
    UnifyRows,
    /// Row variable bound to residual labels.
    BindRowVar,
    /// Both rows open with different tails: fresh shared tail created.
    RemyDecompose,
    /// Occurs check fired.
    OccursCheck,
    /// Kind check fired.
    KindCheck,
    /// Unification failed.
    Error,
}

/// A single step in an inference trace.
#[derive(Debug, Clone, Serialize)]
pub struct InferStep {
    pub node: u32,
    #[serde(rename = "type")]
    pub ty: String,
    pub rule: InferRule,
    pub detail: String,
}

/// Which inference rule fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InferRule {
    Literal,
    VarLookup,
    Instantiate,
    Lambda,
    Apply,
    Let,
    LetRec,
    If,
    BinaryOp,
    UnaryOp,
    Record,
    FieldAccess,
    Update,
    List,
    Tuple,
    Match,
    Generalize,
    Default,
    Resolve,
}
