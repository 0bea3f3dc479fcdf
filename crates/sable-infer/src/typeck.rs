//! Constraint generation for Core expressions.
//!
//! Walks the Core AST, emitting equality constraints into the
//! `InferenceContext` and class constraints into its current scope, and
//! builds the typed tree in parallel. Let-bindings, letrec groups, and
//! top-level declarations are generalization boundaries: each one solves,
//! defaults, resolves ground constraints, and then generalizes (or not, per
//! the value restriction).

use std::collections::{BTreeMap, BTreeSet};

use sable_ast::{BinOp, Binding, Expr, ExprKind, Lit, NodeId, Pattern, PatternKind, UnaryOp, free_vars};
use sable_diag::{Category, Diagnostic};
use sable_types::{
    EffectRow, Kind, Label, Predicate, Row, RowVarId, Substitution, Type, TypeScheme, TypeVar,
    TypeVarId, free_row_var_kinds, free_type_var_kinds, free_type_vars, sanitize_type_display,
};

use crate::config::{CheckerConfig, RecordEncoding};
use crate::defaulting::{DefaultingMode, default_constraints};
use crate::effects::{elaborate_effect_row, subsume_effect_rows, union_effect_rows};
use crate::instances::InstanceEnv;
use crate::resolve::{ConstraintResolver, ResolveError};
use crate::trace::InferRule;
use crate::typed::{
    ApplySubst, ConcatKind, TypedArm, TypedBinding, TypedExpr, TypedExprKind, TypedPattern,
    TypedPatternKind,
};
use crate::{
    ClassConstraint, ConstraintOrigin, InferenceContext, Reason, UnifyError, unify_diagnostic,
};

// ---------------------------------------------------------------------------
// Type environment
// ---------------------------------------------------------------------------

/// Lexically scoped name → scheme bindings. The root scope holds builtins
/// and top-level declarations.
#[derive(Debug, Clone)]
pub struct TypeEnv {
    bindings: Vec<BTreeMap<String, TypeScheme>>,
}

impl TypeEnv {
    pub fn new() -> Self {
        Self {
            bindings: vec![BTreeMap::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.bindings.push(BTreeMap::new());
    }

    pub fn pop_scope(&mut self) {
        if self.bindings.len() > 1 {
            self.bindings.pop();
        }
    }

    /// Bind in the innermost scope.
    pub fn bind(&mut self, name: impl Into<String>, scheme: TypeScheme) {
        if let Some(scope) = self.bindings.last_mut() {
            scope.insert(name.into(), scheme);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&TypeScheme> {
        self.bindings.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Look up a name bound in a nested (non-root) scope.
    pub fn lookup_local(&self, name: &str) -> Option<&TypeScheme> {
        self.bindings
            .iter()
            .skip(1)
            .rev()
            .find_map(|scope| scope.get(name))
    }

    pub fn names(&self) -> BTreeSet<&str> {
        self.bindings
            .iter()
            .flat_map(|scope| scope.keys().map(String::as_str))
            .collect()
    }

    /// Free type variables of the environment, after substitution.
    pub fn free_type_vars(&self, subst: &Substitution) -> BTreeSet<TypeVarId> {
        let mut vars = BTreeSet::new();
        for scheme in self.bindings.iter().flat_map(BTreeMap::values) {
            let resolved = subst.apply_scheme(scheme);
            vars.extend(resolved.free_type_vars());
        }
        vars
    }

    /// Free row variables of the environment, after substitution.
    pub fn free_row_vars(&self, subst: &Substitution) -> BTreeSet<RowVarId> {
        let mut vars = BTreeSet::new();
        for scheme in self.bindings.iter().flat_map(BTreeMap::values) {
            let resolved = subst.apply_scheme(scheme);
            vars.extend(resolved.free_row_vars());
        }
        vars
    }
}

impl Default for TypeEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only inputs shared by one checking run.
#[derive(Debug, Clone, Copy)]
pub struct Session<'a> {
    pub instances: &'a InstanceEnv,
    pub config: &'a CheckerConfig,
    /// Pre-elaborated effect annotations on lambda nodes.
    pub annotations: &'a BTreeMap<NodeId, Vec<String>>,
}

/// Where a binding sits. Top-level boundaries report what they cannot
/// solve; local ones hand it to the enclosing boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingLevel {
    TopLevel,
    Local,
}

// ---------------------------------------------------------------------------
// Generalization and instantiation
// ---------------------------------------------------------------------------

/// Quantify the variables of `ty` that are not free in the environment.
///
/// `ty` must already have the current substitution applied.
pub fn generalize(
    ty: &Type,
    predicates: Vec<Predicate>,
    env_type_vars: &BTreeSet<TypeVarId>,
    env_row_vars: &BTreeSet<RowVarId>,
) -> TypeScheme {
    let type_vars: Vec<TypeVar> = free_type_var_kinds(ty)
        .into_iter()
        .filter(|(id, _)| !env_type_vars.contains(id))
        .map(|(id, kind)| TypeVar { id, kind })
        .collect();
    let row_vars: Vec<RowVarId> = free_row_var_kinds(ty)
        .into_keys()
        .filter(|id| !env_row_vars.contains(id))
        .collect();
    TypeScheme {
        type_vars,
        row_vars,
        predicates,
        ty: ty.clone(),
    }
}

/// Replace every quantified variable with a fresh one. Each predicate
/// becomes a class constraint at `node`.
pub fn instantiate(ctx: &mut InferenceContext, scheme: &TypeScheme, node: NodeId) -> Type {
    if scheme.is_mono() {
        return scheme.ty.clone();
    }
    let mut mapping = Substitution::new();
    for tv in &scheme.type_vars {
        let fresh = TypeVar {
            id: ctx.fresh_type_var(),
            kind: tv.kind.clone(),
        };
        mapping.bind_type(tv.id, Type::Var(fresh));
    }
    for rv in &scheme.row_vars {
        let fresh = ctx.fresh_row_var();
        mapping.bind_row(*rv, Row::open_record([], fresh));
    }
    for pred in &scheme.predicates {
        let ty = mapping.apply(&pred.ty);
        ctx.add_class_constraint(&pred.class_name, ty, node, ConstraintOrigin::Instantiation);
    }
    let ty = mapping.apply(&scheme.ty);
    ctx.push_infer_step(node, &ty, InferRule::Instantiate, scheme.to_string());
    ty
}

// ---------------------------------------------------------------------------
// Boundaries
// ---------------------------------------------------------------------------

/// Infer a let-bound value and close its generalization boundary.
pub fn infer_binding(
    ctx: &mut InferenceContext,
    env: &mut TypeEnv,
    session: &Session<'_>,
    value: &Expr,
    level: BindingLevel,
) -> (TypeScheme, TypedExpr) {
    ctx.push_class_scope();
    let mut typed = infer_expr(ctx, env, session, value);
    let generalizable = value.is_syntactic_value();
    let mut schemes = close_boundary(
        ctx,
        env,
        session,
        value.id,
        std::slice::from_ref(&typed.ty),
        level,
        generalizable,
    );
    typed.apply_subst(&ctx.substitution);
    let scheme = schemes
        .pop()
        .unwrap_or_else(|| TypeScheme::mono(typed.ty.clone()));
    (scheme, typed)
}

/// Infer a bare top-level expression. It is never generalized, so every
/// class-constrained variable is defaulted.
pub fn infer_top_level_expr(
    ctx: &mut InferenceContext,
    env: &mut TypeEnv,
    session: &Session<'_>,
    expr: &Expr,
) -> TypedExpr {
    ctx.push_class_scope();
    let mut typed = infer_expr(ctx, env, session, expr);
    close_boundary(
        ctx,
        env,
        session,
        expr.id,
        std::slice::from_ref(&typed.ty),
        BindingLevel::TopLevel,
        false,
    );
    typed.apply_subst(&ctx.substitution);
    typed
}

/// Infer a recursive binding group as one generalization boundary.
pub fn infer_rec_group(
    ctx: &mut InferenceContext,
    env: &mut TypeEnv,
    session: &Session<'_>,
    node: NodeId,
    bindings: &[Binding],
    level: BindingLevel,
) -> Vec<TypedBinding> {
    ctx.push_class_scope();
    env.push_scope();
    let placeholders: Vec<Type> = bindings
        .iter()
        .map(|b| {
            let ty = ctx.fresh_type();
            env.bind(b.name.clone(), TypeScheme::mono(ty.clone()));
            ty
        })
        .collect();

    let mut values = Vec::with_capacity(bindings.len());
    for (binding, placeholder) in bindings.iter().zip(&placeholders) {
        let typed = infer_expr(ctx, env, session, &binding.value);
        let prov = ctx.provenance(binding.value.id, Reason::LetRec);
        ctx.constrain_equal(placeholder.clone(), typed.ty.clone(), prov);
        values.push(typed);
    }
    env.pop_scope();

    let generalizable = bindings.iter().all(|b| b.value.is_syntactic_value());
    let schemes = close_boundary(ctx, env, session, node, &placeholders, level, generalizable);

    bindings
        .iter()
        .zip(values)
        .zip(schemes)
        .map(|((binding, mut value), scheme)| {
            value.apply_subst(&ctx.substitution);
            TypedBinding {
                name: binding.name.clone(),
                scheme,
                value,
            }
        })
        .collect()
}

/// Solve, default, resolve, and generalize at one boundary. Returns one
/// scheme per type in `tys`.
fn close_boundary(
    ctx: &mut InferenceContext,
    env: &TypeEnv,
    session: &Session<'_>,
    node: NodeId,
    tys: &[Type],
    level: BindingLevel,
    generalizable: bool,
) -> Vec<TypeScheme> {
    let constraints = ctx.solve();
    let env_type_vars = env.free_type_vars(&ctx.substitution);
    let env_row_vars = env.free_row_vars(&ctx.substitution);
    close_result_effects(ctx, node, tys, &env_row_vars);
    let monotype = Type::Tuple(tys.iter().map(|t| ctx.apply(t)).collect());

    let mode = if level == BindingLevel::TopLevel && !generalizable {
        DefaultingMode::TopLevel
    } else {
        DefaultingMode::Boundary
    };
    let outcome = default_constraints(
        &monotype,
        &constraints,
        &env_type_vars,
        session.instances,
        mode,
    );
    for diag in outcome.errors {
        ctx.report(node, diag);
    }
    if !outcome.substitution.is_empty() {
        let detail = outcome
            .substitution
            .type_bindings()
            .values()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        ctx.push_infer_step(node, &monotype, InferRule::Default, detail);
    }
    ctx.apply_defaults(&outcome.substitution);

    let constraints = ctx.pop_class_scope();
    let tys: Vec<Type> = tys.iter().map(|t| ctx.apply(t)).collect();
    let pending = resolve_ground(ctx, session, constraints, &outcome.rejected);

    let mut attached = vec![false; pending.len()];
    let mut schemes = Vec::with_capacity(tys.len());
    for ty in &tys {
        if !generalizable {
            schemes.push(TypeScheme::mono(ty.clone()));
            continue;
        }
        let quantified: BTreeSet<TypeVarId> = free_type_vars(ty)
            .difference(&env_type_vars)
            .copied()
            .collect();
        let mut predicates: Vec<Predicate> = Vec::new();
        for (i, c) in pending.iter().enumerate() {
            let vars = free_type_vars(&c.ty);
            if vars.is_empty() || !vars.is_subset(&quantified) {
                continue;
            }
            attached[i] = true;
            if !predicates
                .iter()
                .any(|p| p.class_name == c.class_name && p.ty == c.ty)
            {
                predicates.push(Predicate {
                    class_name: c.class_name.clone(),
                    ty: c.ty.clone(),
                });
            }
        }
        let scheme = generalize(ty, predicates, &env_type_vars, &env_row_vars);
        log::debug!("generalized at node {node}: {scheme}");
        ctx.push_infer_step(node, ty, InferRule::Generalize, scheme.to_string());
        schemes.push(scheme);
    }

    let leftovers: Vec<ClassConstraint> = pending
        .into_iter()
        .zip(attached)
        .filter(|(_, attached)| !attached)
        .map(|(c, _)| c)
        .collect();
    match level {
        BindingLevel::Local => ctx.defer_class_constraints(leftovers),
        BindingLevel::TopLevel => report_unsolved(ctx, leftovers),
    }
    schemes
}

/// Resolve every ground constraint; return the rest. Constraints on
/// variables that defaulting rejected were already reported.
fn resolve_ground(
    ctx: &mut InferenceContext,
    session: &Session<'_>,
    constraints: Vec<ClassConstraint>,
    rejected: &BTreeSet<TypeVarId>,
) -> Vec<ClassConstraint> {
    let resolver = ConstraintResolver::new(session.instances);
    let mut reported: BTreeSet<(String, String)> = BTreeSet::new();
    let mut pending = Vec::new();
    for constraint in constraints {
        if free_type_vars(&constraint.ty)
            .iter()
            .any(|v| rejected.contains(v))
        {
            continue;
        }
        if !constraint.is_ground() {
            pending.push(constraint);
            continue;
        }
        match resolver.resolve(&constraint) {
            Ok(entry) => {
                ctx.push_infer_step(
                    constraint.node,
                    &constraint.ty,
                    InferRule::Resolve,
                    constraint.class_name.clone(),
                );
                if constraint.origin != ConstraintOrigin::Literal {
                    ctx.resolved_mut().record(entry);
                }
            }
            Err(ResolveError::Missing(diag)) => {
                if reported.insert((constraint.class_name.clone(), constraint.ty.to_string())) {
                    ctx.report(constraint.node, diag);
                }
            }
            Err(ResolveError::Internal(violation)) => ctx.fail_internal(violation),
        }
    }
    pending
}

/// Remediation text for a class that could not be solved.
pub fn class_remediation(class_name: &str) -> &'static str {
    match class_name {
        "Eq" => "type must support equality",
        "Ord" => "type must support ordering",
        "Show" => "type must be printable",
        "Num" => "type must be numeric",
        "Fractional" => "type must support fractional division",
        "Integral" => "type must support integer division",
        _ => "add an instance for this type or annotate it",
    }
}

fn report_unsolved(ctx: &mut InferenceContext, leftovers: Vec<ClassConstraint>) {
    let mut seen = BTreeSet::new();
    for c in leftovers {
        let shown = sanitize_type_display(&c.ty);
        if !seen.insert((c.class_name.clone(), shown.clone())) {
            continue;
        }
        let diag = Diagnostic::error(
            Category::UnsolvedConstraint,
            format!("unsolved constraint {} {shown}", c.class_name),
        )
        .at(c.path.clone(), Some(c.node.0))
        .with_help(class_remediation(&c.class_name));
        ctx.report(c.node, diag);
    }
}

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// The empty closed row is reported as purity in the typed tree.
fn normalize_effects(effects: EffectRow) -> EffectRow {
    match &effects.row {
        Some(row) if row.is_closed() && row.is_empty() => EffectRow::pure(),
        _ => effects,
    }
}

/// Join the effects of subexpressions evaluated at one node. Distinct open
/// tails are unified so the result has a single unknown remainder.
fn join_effects<'e>(
    ctx: &mut InferenceContext,
    node: NodeId,
    rows: impl IntoIterator<Item = &'e EffectRow>,
) -> EffectRow {
    let rows: Vec<EffectRow> = rows
        .into_iter()
        .map(|r| ctx.substitution.apply_effect_row(r))
        .collect();
    let tails: BTreeSet<RowVarId> = rows.iter().filter_map(EffectRow::tail).collect();
    if tails.len() > 1 {
        let mut tails = tails.into_iter();
        if let Some(first) = tails.next() {
            for other in tails {
                let prov = ctx.provenance(node, Reason::EffectJoin);
                ctx.constrain_row_equal(
                    Row::open_effects([], first),
                    Row::open_effects([], other),
                    prov,
                );
            }
        }
        ctx.flush();
    }
    let joined = rows
        .iter()
        .fold(EffectRow::pure(), |acc, r| union_effect_rows(&acc, r));
    normalize_effects(ctx.substitution.apply_effect_row(&joined))
}

/// Give a closed latent row an unknown remainder so a function that
/// performs fewer effects fits a parameter that allows more.
fn open_latent_effects(ctx: &mut InferenceContext, ty: Type) -> Type {
    match ty {
        Type::Function(ft) if ft.effects.tail().is_none() => {
            let tail = ctx.fresh_row_var();
            Type::function(ft.params, EffectRow::open(ft.effects.labels(), tail), *ft.ret)
        }
        other => other,
    }
}

/// Close the latent tail of each function in `tys` when nothing else
/// mentions it: not the environment, not another position in the group.
fn close_result_effects(
    ctx: &mut InferenceContext,
    node: NodeId,
    tys: &[Type],
    env_row_vars: &BTreeSet<RowVarId>,
) {
    let applied: Vec<Type> = tys.iter().map(|t| ctx.apply(t)).collect();
    let group = Type::Tuple(applied.clone());
    let tails: Vec<RowVarId> = applied
        .iter()
        .filter_map(|ty| match ty {
            Type::Function(ft) => ft.effects.tail(),
            _ => None,
        })
        .filter(|tail| !env_row_vars.contains(tail) && row_var_occurrences(&group, *tail) == 1)
        .collect();
    if tails.is_empty() {
        return;
    }
    for tail in tails {
        let prov = ctx.provenance(node, Reason::EffectJoin);
        ctx.constrain_row_equal(Row::closed_effects([]), Row::open_effects([], tail), prov);
    }
    ctx.flush();
}

fn row_var_occurrences(ty: &Type, var: RowVarId) -> usize {
    let in_row = |row: &Row| {
        usize::from(row.rest == Some(var))
            + row
                .fields
                .values()
                .map(|f| row_var_occurrences(f, var))
                .sum::<usize>()
    };
    match ty {
        Type::Var(_) | Type::Con(_) => 0,
        Type::App(head, args) => {
            row_var_occurrences(head, var)
                + args.iter().map(|a| row_var_occurrences(a, var)).sum::<usize>()
        }
        Type::List(inner) => row_var_occurrences(inner, var),
        Type::Tuple(elems) => elems.iter().map(|e| row_var_occurrences(e, var)).sum(),
        Type::Function(ft) => {
            ft.effects.row.as_ref().map_or(0, in_row)
                + ft.params
                    .iter()
                    .map(|p| row_var_occurrences(p, var))
                    .sum::<usize>()
                + row_var_occurrences(&ft.ret, var)
        }
        Type::Record(row) => in_row(row),
    }
}

/// The first linear capability reachable through `ty`'s effect rows.
fn captured_capability(ty: &Type, capabilities: &BTreeSet<String>) -> Option<String> {
    match ty {
        Type::Var(_) | Type::Con(_) => None,
        Type::App(head, args) => captured_capability(head, capabilities)
            .or_else(|| args.iter().find_map(|a| captured_capability(a, capabilities))),
        Type::List(inner) => captured_capability(inner, capabilities),
        Type::Tuple(elems) => elems
            .iter()
            .find_map(|e| captured_capability(e, capabilities)),
        Type::Function(ft) => ft
            .effects
            .labels()
            .into_iter()
            .map(|l| l.as_str().to_string())
            .find(|l| capabilities.contains(l))
            .or_else(|| {
                ft.params
                    .iter()
                    .find_map(|p| captured_capability(p, capabilities))
            })
            .or_else(|| captured_capability(&ft.ret, capabilities)),
        Type::Record(row) => row
            .fields
            .values()
            .find_map(|f| captured_capability(f, capabilities)),
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

fn pure_node(id: NodeId, ty: Type, kind: TypedExprKind) -> TypedExpr {
    TypedExpr {
        id,
        ty,
        effects: EffectRow::pure(),
        kind,
    }
}

fn unify_at(ctx: &mut InferenceContext, node: NodeId, reason: Reason, expected: Type, actual: Type) {
    let prov = ctx.provenance(node, reason);
    ctx.constrain_equal(expected, actual, prov);
}

fn rule_for(kind: &ExprKind) -> InferRule {
    match kind {
        ExprKind::Lit(_) => InferRule::Literal,
        ExprKind::Var(_) => InferRule::VarLookup,
        ExprKind::Lambda { .. } => InferRule::Lambda,
        ExprKind::App { .. } => InferRule::Apply,
        ExprKind::Let { .. } => InferRule::Let,
        ExprKind::LetRec { .. } => InferRule::LetRec,
        ExprKind::If { .. } => InferRule::If,
        ExprKind::BinaryOp { .. } => InferRule::BinaryOp,
        ExprKind::UnaryOp { .. } => InferRule::UnaryOp,
        ExprKind::Record(_) => InferRule::Record,
        ExprKind::Field { .. } => InferRule::FieldAccess,
        ExprKind::Update { .. } => InferRule::Update,
        ExprKind::List(_) => InferRule::List,
        ExprKind::Tuple(_) => InferRule::Tuple,
        ExprKind::Match { .. } => InferRule::Match,
    }
}

/// Infer the type and effects of an expression.
pub fn infer_expr(
    ctx: &mut InferenceContext,
    env: &mut TypeEnv,
    session: &Session<'_>,
    expr: &Expr,
) -> TypedExpr {
    let typed = infer_expr_inner(ctx, env, session, expr);
    if ctx.is_tracing() {
        ctx.push_infer_step(expr.id, &typed.ty, rule_for(&expr.kind), String::new());
    }
    typed
}

fn infer_expr_inner(
    ctx: &mut InferenceContext,
    env: &mut TypeEnv,
    session: &Session<'_>,
    expr: &Expr,
) -> TypedExpr {
    match &expr.kind {
        ExprKind::Lit(lit) => {
            let ty = literal_type(ctx, lit, expr.id);
            pure_node(expr.id, ty, TypedExprKind::Lit(lit.clone()))
        }

        ExprKind::Var(name) => {
            let ty = match env.lookup(name).cloned() {
                Some(scheme) => instantiate(ctx, &scheme, expr.id),
                None => {
                    ctx.report(
                        expr.id,
                        Diagnostic::error(
                            Category::UndefinedName,
                            format!("undefined variable `{name}`"),
                        ),
                    );
                    ctx.fresh_type()
                }
            };
            pure_node(expr.id, ty, TypedExprKind::Var(name.clone()))
        }

        ExprKind::Lambda { params, body } => infer_lambda(ctx, env, session, expr, params, body),

        ExprKind::App { func, args } => infer_app(ctx, env, session, expr, func, args),

        ExprKind::Let { name, value, body } => {
            ctx.enter(format!("let {name}"));
            let (scheme, value) = infer_binding(ctx, env, session, value, BindingLevel::Local);
            ctx.leave();
            env.push_scope();
            env.bind(name.clone(), scheme.clone());
            let body = infer_expr(ctx, env, session, body);
            env.pop_scope();
            let effects = join_effects(ctx, expr.id, [&value.effects, &body.effects]);
            TypedExpr {
                id: expr.id,
                ty: body.ty.clone(),
                effects,
                kind: TypedExprKind::Let {
                    name: name.clone(),
                    scheme,
                    value: Box::new(value),
                    body: Box::new(body),
                },
            }
        }

        ExprKind::LetRec { bindings, body } => {
            let names: Vec<&str> = bindings.iter().map(|b| b.name.as_str()).collect();
            ctx.enter(format!("letrec {}", names.join(", ")));
            let typed_bindings =
                infer_rec_group(ctx, env, session, expr.id, bindings, BindingLevel::Local);
            ctx.leave();
            env.push_scope();
            for binding in &typed_bindings {
                env.bind(binding.name.clone(), binding.scheme.clone());
            }
            let body = infer_expr(ctx, env, session, body);
            env.pop_scope();
            let mut rows: Vec<&EffectRow> =
                typed_bindings.iter().map(|b| &b.value.effects).collect();
            rows.push(&body.effects);
            let effects = join_effects(ctx, expr.id, rows);
            TypedExpr {
                id: expr.id,
                ty: body.ty.clone(),
                effects,
                kind: TypedExprKind::LetRec {
                    bindings: typed_bindings,
                    body: Box::new(body),
                },
            }
        }

        ExprKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            ctx.enter("if");
            let condition = infer_expr(ctx, env, session, condition);
            unify_at(
                ctx,
                condition.id,
                Reason::IfCondition,
                Type::bool(),
                condition.ty.clone(),
            );
            let then_branch = infer_expr(ctx, env, session, then_branch);
            let else_branch = infer_expr(ctx, env, session, else_branch);
            unify_at(
                ctx,
                expr.id,
                Reason::IfBranches,
                then_branch.ty.clone(),
                else_branch.ty.clone(),
            );
            ctx.leave();
            let effects = join_effects(
                ctx,
                expr.id,
                [&condition.effects, &then_branch.effects, &else_branch.effects],
            );
            TypedExpr {
                id: expr.id,
                ty: then_branch.ty.clone(),
                effects,
                kind: TypedExprKind::If {
                    condition: Box::new(condition),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                },
            }
        }

        ExprKind::BinaryOp { op, left, right } => {
            let left = infer_expr(ctx, env, session, left);
            let right = infer_expr(ctx, env, session, right);
            infer_binary(ctx, expr.id, *op, left, right)
        }

        ExprKind::UnaryOp { op, operand } => {
            let operand = infer_expr(ctx, env, session, operand);
            let ty = match op {
                UnaryOp::Not => {
                    unify_at(
                        ctx,
                        expr.id,
                        Reason::UnaryOp(op.symbol()),
                        Type::bool(),
                        operand.ty.clone(),
                    );
                    Type::bool()
                }
                UnaryOp::Neg => {
                    ctx.flush();
                    let ty = ctx.apply(&operand.ty);
                    let class = if ctx.has_live_class(&ty, "Fractional") {
                        "Fractional"
                    } else {
                        "Num"
                    };
                    ctx.add_class_constraint(class, ty.clone(), expr.id, ConstraintOrigin::Operator);
                    ty
                }
            };
            TypedExpr {
                id: expr.id,
                ty,
                effects: operand.effects.clone(),
                kind: TypedExprKind::UnaryOp {
                    op: *op,
                    operand: Box::new(operand),
                },
            }
        }

        ExprKind::Record(fields) => infer_record(ctx, env, session, expr, fields),

        ExprKind::Field { record, field } => {
            let record = infer_expr(ctx, env, session, record);
            let ty = infer_field_access(ctx, expr.id, &record.ty, field);
            TypedExpr {
                id: expr.id,
                ty,
                effects: record.effects.clone(),
                kind: TypedExprKind::Field {
                    record: Box::new(record),
                    field: field.clone(),
                },
            }
        }

        ExprKind::Update { record, fields } => infer_update(ctx, env, session, expr, record, fields),

        ExprKind::List(elems) => {
            let elem_ty = ctx.fresh_type();
            let mut typed = Vec::with_capacity(elems.len());
            for elem in elems {
                let t = infer_expr(ctx, env, session, elem);
                unify_at(ctx, t.id, Reason::ListElement, elem_ty.clone(), t.ty.clone());
                typed.push(t);
            }
            let effects = join_effects(ctx, expr.id, typed.iter().map(|t| &t.effects));
            TypedExpr {
                id: expr.id,
                ty: Type::list(elem_ty),
                effects,
                kind: TypedExprKind::List(typed),
            }
        }

        ExprKind::Tuple(elems) => {
            let typed: Vec<TypedExpr> = elems
                .iter()
                .map(|e| infer_expr(ctx, env, session, e))
                .collect();
            let effects = join_effects(ctx, expr.id, typed.iter().map(|t| &t.effects));
            TypedExpr {
                id: expr.id,
                ty: Type::Tuple(typed.iter().map(|t| t.ty.clone()).collect()),
                effects,
                kind: TypedExprKind::Tuple(typed),
            }
        }

        ExprKind::Match { scrutinee, arms } => {
            ctx.enter("match");
            let scrutinee = infer_expr(ctx, env, session, scrutinee);
            let result = ctx.fresh_type();
            let mut typed_arms = Vec::with_capacity(arms.len());
            for (i, arm) in arms.iter().enumerate() {
                ctx.enter(format!("arm {}", i + 1));
                let mut bound = BTreeMap::new();
                let pattern = infer_pattern(ctx, session, &arm.pattern, &mut bound);
                unify_at(
                    ctx,
                    arm.pattern.id,
                    Reason::PatternMatch,
                    scrutinee.ty.clone(),
                    pattern.ty.clone(),
                );
                env.push_scope();
                for (name, ty) in bound {
                    env.bind(name, TypeScheme::mono(ty));
                }
                let body = infer_expr(ctx, env, session, &arm.body);
                env.pop_scope();
                unify_at(ctx, body.id, Reason::MatchArms, result.clone(), body.ty.clone());
                ctx.leave();
                typed_arms.push(TypedArm { pattern, body });
            }
            ctx.leave();
            let mut rows = vec![&scrutinee.effects];
            rows.extend(typed_arms.iter().map(|a| &a.body.effects));
            let effects = join_effects(ctx, expr.id, rows);
            TypedExpr {
                id: expr.id,
                ty: result,
                effects,
                kind: TypedExprKind::Match {
                    scrutinee: Box::new(scrutinee),
                    arms: typed_arms,
                },
            }
        }
    }
}

fn literal_type(ctx: &mut InferenceContext, lit: &Lit, node: NodeId) -> Type {
    match lit {
        Lit::Int(_) => {
            let ty = ctx.fresh_type();
            ctx.add_class_constraint("Num", ty.clone(), node, ConstraintOrigin::Literal);
            ty
        }
        Lit::Float(_) => {
            let ty = ctx.fresh_type();
            ctx.add_class_constraint("Fractional", ty.clone(), node, ConstraintOrigin::Literal);
            ty
        }
        Lit::String(_) => Type::string(),
        Lit::Bool(_) => Type::bool(),
        Lit::Unit => Type::unit(),
        Lit::Bytes(_) => Type::bytes(),
    }
}

fn infer_lambda(
    ctx: &mut InferenceContext,
    env: &mut TypeEnv,
    session: &Session<'_>,
    expr: &Expr,
    params: &[String],
    body: &Expr,
) -> TypedExpr {
    ctx.enter("lambda");
    check_captures(ctx, env, session, expr);

    env.push_scope();
    let params: Vec<(String, Type)> = params
        .iter()
        .map(|p| {
            let ty = ctx.fresh_type();
            env.bind(p.clone(), TypeScheme::mono(ty.clone()));
            (p.clone(), ty)
        })
        .collect();
    let body = infer_expr(ctx, env, session, body);
    env.pop_scope();

    let latent = match session.annotations.get(&expr.id) {
        None => body.effects.clone(),
        Some(names) => match elaborate_effect_row(names) {
            Ok(declared) => {
                check_effect_annotation(ctx, expr.id, &body.effects, &declared);
                declared
            }
            Err(diag) => {
                ctx.report(expr.id, diag);
                body.effects.clone()
            }
        },
    };
    ctx.leave();

    let ty = Type::function(
        params.iter().map(|(_, t)| t.clone()).collect(),
        latent,
        body.ty.clone(),
    );
    pure_node(
        expr.id,
        ty,
        TypedExprKind::Lambda {
            params,
            body: Box::new(body),
        },
    )
}

/// Reject closure capture of local bindings that carry a linear capability.
fn check_captures(ctx: &mut InferenceContext, env: &TypeEnv, session: &Session<'_>, lambda: &Expr) {
    let capabilities = &session.config.linear_capabilities;
    if capabilities.is_empty() {
        return;
    }
    ctx.flush();
    for name in free_vars(lambda) {
        let Some(scheme) = env.lookup_local(&name) else {
            continue;
        };
        let ty = ctx.apply(&scheme.ty);
        if let Some(capability) = captured_capability(&ty, capabilities) {
            ctx.report(
                lambda.id,
                Diagnostic::error(
                    Category::CapabilityCapture,
                    format!("lambda captures `{name}`, which carries the linear capability {capability}"),
                )
                .with_help(format!("pass `{name}` to the lambda as a parameter")),
            );
        }
    }
}

/// The body's effects must fit the annotation. An open body row is pinned
/// to the annotation; a closed one must be a subset of it.
fn check_effect_annotation(
    ctx: &mut InferenceContext,
    node: NodeId,
    body: &EffectRow,
    declared: &EffectRow,
) {
    ctx.flush();
    let actual = ctx.substitution.apply_effect_row(body);
    if actual.tail().is_some() {
        let prov = ctx.provenance(node, Reason::EffectAnnotation);
        ctx.constrain_row_equal(declared.to_row(), actual.to_row(), prov);
        ctx.flush();
        return;
    }
    if subsume_effect_rows(&actual, declared) {
        return;
    }
    let declared_labels = declared.labels();
    let extra: Vec<Label> = actual
        .labels()
        .into_iter()
        .filter(|l| !declared_labels.contains(l))
        .collect();
    let err = UnifyError::Rows {
        kind: Kind::effect_row(),
        missing: Vec::new(),
        extra,
    };
    let prov = ctx.provenance(node, Reason::EffectAnnotation);
    let diag = unify_diagnostic(&err, &declared.to_string(), &actual.to_string(), &prov);
    ctx.report(node, diag);
}

fn infer_app(
    ctx: &mut InferenceContext,
    env: &mut TypeEnv,
    session: &Session<'_>,
    expr: &Expr,
    func: &Expr,
    args: &[Expr],
) -> TypedExpr {
    let label = match &func.kind {
        ExprKind::Var(name) => format!("call {name}"),
        _ => "application".to_string(),
    };
    ctx.enter(label);
    let func = infer_expr(ctx, env, session, func);
    let args: Vec<TypedExpr> = args
        .iter()
        .map(|a| infer_expr(ctx, env, session, a))
        .collect();
    ctx.flush();

    let (ret, latent) = match ctx.apply(&func.ty) {
        Type::Function(ft) if ft.params.len() == args.len() => {
            for (i, (param, arg)) in ft.params.iter().zip(&args).enumerate() {
                let applied = ctx.apply(&arg.ty);
                let actual = open_latent_effects(ctx, applied);
                unify_at(
                    ctx,
                    arg.id,
                    Reason::FunctionArg { param_index: i },
                    param.clone(),
                    actual,
                );
            }
            (*ft.ret, ft.effects)
        }
        Type::Function(ft) => {
            ctx.report(
                expr.id,
                Diagnostic::error(
                    Category::ArityMismatch,
                    format!(
                        "function takes {} argument(s) but {} were supplied",
                        ft.params.len(),
                        args.len()
                    ),
                ),
            );
            (ctx.fresh_type(), EffectRow::pure())
        }
        callee => {
            let ret = ctx.fresh_type();
            let tail = ctx.fresh_row_var();
            let latent = EffectRow::open([], tail);
            let expected = Type::function(
                args.iter().map(|a| a.ty.clone()).collect(),
                latent.clone(),
                ret.clone(),
            );
            unify_at(ctx, func.id, Reason::Application, expected, callee);
            (ret, latent)
        }
    };
    ctx.flush();
    ctx.leave();

    let mut rows = vec![&func.effects];
    rows.extend(args.iter().map(|a| &a.effects));
    rows.push(&latent);
    let effects = join_effects(ctx, expr.id, rows);
    TypedExpr {
        id: expr.id,
        ty: ret,
        effects,
        kind: TypedExprKind::App {
            func: Box::new(func),
            args,
        },
    }
}

fn infer_binary(
    ctx: &mut InferenceContext,
    node: NodeId,
    op: BinOp,
    left: TypedExpr,
    right: TypedExpr,
) -> TypedExpr {
    let effects = join_effects(ctx, node, [&left.effects, &right.effects]);
    let symbol = op.symbol();

    if op == BinOp::Concat {
        let (kind, ty) = infer_concat(ctx, node, &left.ty, &right.ty);
        return TypedExpr {
            id: node,
            ty,
            effects,
            kind: TypedExprKind::Concat {
                kind,
                left: Box::new(left),
                right: Box::new(right),
            },
        };
    }

    let ty = if op.is_logical() {
        unify_at(ctx, left.id, Reason::BinaryOp(symbol), Type::bool(), left.ty.clone());
        unify_at(ctx, right.id, Reason::BinaryOp(symbol), Type::bool(), right.ty.clone());
        Type::bool()
    } else {
        unify_at(
            ctx,
            node,
            Reason::BinaryOp(symbol),
            left.ty.clone(),
            right.ty.clone(),
        );
        ctx.flush();
        let operand = ctx.apply(&left.ty);
        if op.is_arithmetic() {
            let class = if op == BinOp::Mod {
                "Integral"
            } else if ctx.has_live_class(&operand, "Fractional") {
                "Fractional"
            } else {
                "Num"
            };
            ctx.add_class_constraint(class, operand.clone(), node, ConstraintOrigin::Operator);
            operand
        } else {
            let class = if op.is_comparison() { "Ord" } else { "Eq" };
            ctx.add_class_constraint(class, operand, node, ConstraintOrigin::Operator);
            Type::bool()
        }
    };

    TypedExpr {
        id: node,
        ty,
        effects,
        kind: TypedExprKind::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}

/// `++` picks string or list concatenation from whichever operand is
/// already known, and falls back to lists.
fn infer_concat(
    ctx: &mut InferenceContext,
    node: NodeId,
    left: &Type,
    right: &Type,
) -> (ConcatKind, Type) {
    ctx.flush();
    let l = ctx.apply(left);
    let r = ctx.apply(right);
    let known = if l.is_var() { &r } else { &l };
    let reason = Reason::BinaryOp("++");
    let (kind, ty) = match known {
        _ if known.is_con(sable_types::STRING) => (ConcatKind::String, Type::string()),
        Type::List(_) => (ConcatKind::List, known.clone()),
        Type::Var(_) => {
            let elem = ctx.fresh_type();
            (ConcatKind::List, Type::list(elem))
        }
        other => {
            ctx.report(
                node,
                Diagnostic::error(
                    Category::TypeMismatch,
                    format!(
                        "`++` needs strings or lists, got {}",
                        sanitize_type_display(other)
                    ),
                ),
            );
            (ConcatKind::List, ctx.fresh_type())
        }
    };
    unify_at(ctx, node, reason.clone(), ty.clone(), l);
    unify_at(ctx, node, reason, ty.clone(), r);
    (kind, ty)
}

fn infer_record(
    ctx: &mut InferenceContext,
    env: &mut TypeEnv,
    session: &Session<'_>,
    expr: &Expr,
    fields: &[(String, Expr)],
) -> TypedExpr {
    let mut typed = Vec::with_capacity(fields.len());
    let mut types: BTreeMap<Label, Type> = BTreeMap::new();
    for (name, value) in fields {
        ctx.enter(format!("field {name}"));
        let value = infer_expr(ctx, env, session, value);
        ctx.leave();
        if types.insert(Label::new(name.as_str()), value.ty.clone()).is_some() {
            ctx.report(
                value.id,
                Diagnostic::error(
                    Category::FieldMismatch,
                    format!("duplicate field `{name}` in record"),
                )
                .with_diff(vec![sable_diag::FieldDiff::extra(name.as_str())]),
            );
        }
        typed.push((name.clone(), value));
    }
    let ty = match session.config.record_encoding {
        RecordEncoding::Rows => Type::Record(Row::closed_record(types)),
        RecordEncoding::Legacy => Type::legacy_record(&types),
    };
    let effects = join_effects(ctx, expr.id, typed.iter().map(|(_, t)| &t.effects));
    TypedExpr {
        id: expr.id,
        ty,
        effects,
        kind: TypedExprKind::Record(typed),
    }
}

fn missing_field(ctx: &mut InferenceContext, node: NodeId, record: &Type, field: &str) {
    ctx.report(
        node,
        Diagnostic::error(
            Category::FieldMismatch,
            format!(
                "record {} has no field `{field}`",
                sanitize_type_display(record)
            ),
        )
        .with_diff(vec![sable_diag::FieldDiff::missing(field)]),
    );
}

fn infer_field_access(ctx: &mut InferenceContext, node: NodeId, record: &Type, field: &str) -> Type {
    ctx.flush();
    let record = ctx.apply(record);
    if let (Some(labels), Type::App(_, args)) = (record.legacy_record_labels(), &record) {
        let position = labels.iter().position(|l| l.as_str() == field);
        return match position.and_then(|index| args.get(index)) {
            Some(ty) => ty.clone(),
            None => {
                missing_field(ctx, node, &record, field);
                ctx.fresh_type()
            }
        };
    }
    let field_ty = ctx.fresh_type();
    let rest = ctx.fresh_row_var();
    let expected = Type::Record(Row::open_record(
        [(Label::new(field), field_ty.clone())],
        rest,
    ));
    unify_at(
        ctx,
        node,
        Reason::RecordField {
            label: Label::new(field),
        },
        expected,
        record,
    );
    field_ty
}

fn infer_update(
    ctx: &mut InferenceContext,
    env: &mut TypeEnv,
    session: &Session<'_>,
    expr: &Expr,
    record: &Expr,
    fields: &[(String, Expr)],
) -> TypedExpr {
    let record = infer_expr(ctx, env, session, record);
    ctx.flush();
    let record_ty = ctx.apply(&record.ty);

    // Existing field types of the base, by label.
    let existing: Option<BTreeMap<String, Type>> = match &record_ty {
        Type::Record(row) => Some(
            row.fields
                .iter()
                .map(|(l, t)| (l.as_str().to_string(), t.clone()))
                .collect(),
        ),
        Type::App(_, args) => record_ty.legacy_record_labels().map(|labels| {
            labels
                .into_iter()
                .map(|l| l.as_str().to_string())
                .zip(args.iter().cloned())
                .collect()
        }),
        _ => None,
    };

    if existing.is_none() {
        ctx.report(
            expr.id,
            Diagnostic::error(
                Category::TypeMismatch,
                format!(
                    "record update needs a record of known shape, got {}",
                    sanitize_type_display(&record_ty)
                ),
            )
            .with_help("construct the record or access one of its fields before updating it"),
        );
    }

    let mut typed = Vec::with_capacity(fields.len());
    for (name, value) in fields {
        ctx.enter(format!("field {name}"));
        let value = infer_expr(ctx, env, session, value);
        ctx.leave();
        if let Some(existing) = &existing {
            match existing.get(name) {
                Some(field_ty) => unify_at(
                    ctx,
                    value.id,
                    Reason::RecordField {
                        label: Label::new(name.as_str()),
                    },
                    field_ty.clone(),
                    value.ty.clone(),
                ),
                None => ctx.report(
                    value.id,
                    Diagnostic::error(
                        Category::FieldMismatch,
                        format!(
                            "cannot update unknown field `{name}` of {}",
                            sanitize_type_display(&record_ty)
                        ),
                    )
                    .with_diff(vec![sable_diag::FieldDiff::extra(name.as_str())])
                    .with_help(Category::FieldMismatch.example_fix()),
                ),
            }
        }
        typed.push((name.clone(), value));
    }

    let mut rows = vec![&record.effects];
    rows.extend(typed.iter().map(|(_, v)| &v.effects));
    let effects = join_effects(ctx, expr.id, rows);
    TypedExpr {
        id: expr.id,
        ty: record_ty,
        effects,
        kind: TypedExprKind::Update {
            record: Box::new(record),
            fields: typed,
        },
    }
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

/// Infer a pattern's type, collecting the names it binds. A name bound
/// twice is merged by unification.
fn infer_pattern(
    ctx: &mut InferenceContext,
    session: &Session<'_>,
    pattern: &Pattern,
    bound: &mut BTreeMap<String, Type>,
) -> TypedPattern {
    let (ty, kind) = match &pattern.kind {
        PatternKind::Wildcard => (ctx.fresh_type(), TypedPatternKind::Wildcard),
        PatternKind::Var(name) => {
            let ty = ctx.fresh_type();
            if let Some(existing) = bound.get(name) {
                unify_at(
                    ctx,
                    pattern.id,
                    Reason::PatternMatch,
                    existing.clone(),
                    ty.clone(),
                );
            } else {
                bound.insert(name.clone(), ty.clone());
            }
            (ty, TypedPatternKind::Var(name.clone()))
        }
        PatternKind::Lit(lit) => (
            literal_type(ctx, lit, pattern.id),
            TypedPatternKind::Lit(lit.clone()),
        ),
        PatternKind::Tuple(elems) => {
            let elems: Vec<TypedPattern> = elems
                .iter()
                .map(|p| infer_pattern(ctx, session, p, bound))
                .collect();
            (
                Type::Tuple(elems.iter().map(|p| p.ty.clone()).collect()),
                TypedPatternKind::Tuple(elems),
            )
        }
        PatternKind::List { elements, rest } => {
            let elem_ty = ctx.fresh_type();
            let elements: Vec<TypedPattern> = elements
                .iter()
                .map(|p| {
                    let typed = infer_pattern(ctx, session, p, bound);
                    unify_at(
                        ctx,
                        p.id,
                        Reason::ListElement,
                        elem_ty.clone(),
                        typed.ty.clone(),
                    );
                    typed
                })
                .collect();
            let list_ty = Type::list(elem_ty);
            let rest = rest.as_ref().map(|r| {
                let typed = infer_pattern(ctx, session, r, bound);
                unify_at(
                    ctx,
                    r.id,
                    Reason::PatternMatch,
                    list_ty.clone(),
                    typed.ty.clone(),
                );
                Box::new(typed)
            });
            (list_ty, TypedPatternKind::List { elements, rest })
        }
        PatternKind::Record { fields, open } => {
            let fields: Vec<(String, TypedPattern)> = fields
                .iter()
                .map(|(name, p)| (name.clone(), infer_pattern(ctx, session, p, bound)))
                .collect();
            let types: BTreeMap<Label, Type> = fields
                .iter()
                .map(|(name, p)| (Label::new(name.as_str()), p.ty.clone()))
                .collect();
            let ty = if *open {
                let rest = ctx.fresh_row_var();
                Type::Record(Row::open_record(types, rest))
            } else {
                match session.config.record_encoding {
                    RecordEncoding::Rows => Type::Record(Row::closed_record(types)),
                    RecordEncoding::Legacy => Type::legacy_record(&types),
                }
            };
            (
                ty,
                TypedPatternKind::Record {
                    fields,
                    open: *open,
                },
            )
        }
    };
    TypedPattern {
        id: pattern.id,
        ty,
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generalize_skips_environment_variables() {
        let a = TypeVarId(0);
        let b = TypeVarId(1);
        let ty = Type::pure_function(vec![Type::var(a)], Type::var(b));
        let env_vars: BTreeSet<TypeVarId> = [b].into_iter().collect();
        let scheme = generalize(&ty, Vec::new(), &env_vars, &BTreeSet::new());
        assert_eq!(scheme.type_vars, vec![TypeVar::star(a)]);
    }

    #[test]
    fn generalize_quantifies_effect_tails() {
        let a = TypeVarId(0);
        let e = RowVarId(0);
        let ty = Type::function(vec![Type::var(a)], EffectRow::open([], e), Type::var(a));
        let scheme = generalize(&ty, Vec::new(), &BTreeSet::new(), &BTreeSet::new());
        assert_eq!(scheme.row_vars, vec![e]);
        assert_eq!(scheme.to_string(), "forall a. (a) -[ea]> a");
    }

    #[test]
    fn instantiate_is_fresh_per_use() {
        let mut ctx = InferenceContext::with_var_offsets(100, 100);
        let a = TypeVarId(0);
        let scheme = TypeScheme {
            type_vars: vec![TypeVar::star(a)],
            row_vars: Vec::new(),
            predicates: vec![Predicate {
                class_name: "Num".to_string(),
                ty: Type::var(a),
            }],
            ty: Type::pure_function(vec![Type::var(a)], Type::var(a)),
        };
        let first = instantiate(&mut ctx, &scheme, NodeId(1));
        let second = instantiate(&mut ctx, &scheme, NodeId(2));
        assert_ne!(first, second);
        assert!(!free_type_vars(&first).contains(&a));
        let live = ctx.solve();
        assert_eq!(live.len(), 2);
        assert!(live.iter().all(|c| c.origin == ConstraintOrigin::Instantiation));
    }

    #[test]
    fn env_lookup_local_ignores_root() {
        let mut env = TypeEnv::new();
        env.bind("print", TypeScheme::mono(Type::unit()));
        env.push_scope();
        env.bind("x", TypeScheme::mono(Type::int()));
        assert!(env.lookup("print").is_some());
        assert!(env.lookup_local("print").is_none());
        assert!(env.lookup_local("x").is_some());
        env.pop_scope();
        env.pop_scope();
        assert!(env.lookup("print").is_some());
    }

    #[test]
    fn capability_found_inside_nested_function() {
        let caps: BTreeSet<String> = ["Async".to_string()].into_iter().collect();
        let sleeper = Type::function(
            vec![Type::int()],
            EffectRow::closed([Label::new("Async")]),
            Type::unit(),
        );
        let wrapped = Type::Tuple(vec![Type::int(), sleeper]);
        assert_eq!(captured_capability(&wrapped, &caps).as_deref(), Some("Async"));
        assert_eq!(captured_capability(&Type::int(), &caps), None);
    }

    #[test]
    fn empty_closed_effects_normalize_to_pure() {
        assert!(normalize_effects(EffectRow::closed([])).is_pure());
        assert!(!normalize_effects(EffectRow::closed([Label::new("IO")])).is_pure());
    }
}
