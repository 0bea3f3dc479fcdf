//! Program-level entry point.
//!
//! `TypeChecker` owns the frozen instance registry and the builtin
//! environment. Each `check_program` call runs in its own inference
//! context, so one checker can be shared across programs.

use std::collections::BTreeMap;

use sable_ast::{Decl, Expr, NodeId, Program};
use sable_diag::DiagnosticError;
use sable_types::{Type, TypeScheme, TypeVar};

use crate::builtins::{BuiltinProvider, Prelude};
use crate::config::CheckerConfig;
use crate::instances::InstanceEnv;
use crate::resolve::{ResolvedConstraint, ResolvedConstraints, assign_operator_methods};
use crate::trace::{InferStep, UnifyStep};
use crate::typeck::{
    BindingLevel, Session, TypeEnv, infer_binding, infer_rec_group, infer_top_level_expr,
};
use crate::typed::{ApplySubst, TypedDecl, TypedExpr};
use crate::{InferenceContext, InvariantViolation, VarSupply};

/// Why checking stopped.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CheckError {
    /// User-facing type errors.
    #[error("{0}")]
    Type(DiagnosticError),
    /// The engine broke one of its own invariants. Not the user's fault.
    #[error("internal type checker error: {0}")]
    Internal(InvariantViolation),
}

/// Recorded unification and inference steps.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CheckTrace {
    pub unify: Vec<UnifyStep>,
    pub infer: Vec<InferStep>,
}

#[derive(Debug, Clone)]
pub struct CheckedProgram {
    pub decls: Vec<TypedDecl>,
    /// Final scheme of every top-level name, in declaration order of first
    /// definition.
    pub schemes: BTreeMap<String, TypeScheme>,
    /// Dictionary facts for the elaborator. Every type is ground.
    pub resolved: BTreeMap<NodeId, Vec<ResolvedConstraint>>,
    pub trace: Option<CheckTrace>,
}

#[derive(Debug, Clone)]
pub struct CheckedExpr {
    pub typed: TypedExpr,
    pub resolved: BTreeMap<NodeId, Vec<ResolvedConstraint>>,
    pub trace: Option<CheckTrace>,
}

pub struct TypeChecker {
    config: CheckerConfig,
    instances: InstanceEnv,
    globals: TypeEnv,
}

impl TypeChecker {
    /// Build a checker from `provider`. Classes are always registered;
    /// instances only when the configuration asks for them.
    pub fn new(config: CheckerConfig, provider: &dyn BuiltinProvider) -> Result<Self, DiagnosticError> {
        let mut instances = InstanceEnv::new();
        let mut errors = Vec::new();
        for class in provider.classes() {
            if let Err(diag) = instances.register_class(class) {
                errors.push(diag);
            }
        }
        if config.load_builtin_instances {
            for instance in provider.instances() {
                if let Err(diag) = instances.register_instance(instance) {
                    errors.push(diag);
                }
            }
        } else {
            log::info!("builtin instances suppressed by configuration");
        }
        if !errors.is_empty() {
            return Err(DiagnosticError::multiple(errors));
        }
        instances.set_module_default(provider.module_default());
        instances.freeze();

        let mut globals = TypeEnv::new();
        let mut supply = VarSupply::new();
        for (name, scheme) in provider.values(&mut supply) {
            globals.bind(name, scheme);
        }
        log::debug!(
            "type checker ready: {} classes, {} instances",
            instances.classes().count(),
            instances.instance_count()
        );
        Ok(Self {
            config,
            instances,
            globals,
        })
    }

    /// A checker over the standard prelude.
    pub fn with_prelude(config: CheckerConfig) -> Result<Self, DiagnosticError> {
        Self::new(config, &Prelude)
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    pub fn instances(&self) -> &InstanceEnv {
        &self.instances
    }

    fn context(&self) -> InferenceContext {
        let mut ctx = InferenceContext::new();
        if self.config.trace {
            ctx.enable_tracing();
        }
        ctx
    }

    fn trace(&self, ctx: &InferenceContext) -> Option<CheckTrace> {
        self.config.trace.then(|| CheckTrace {
            unify: ctx.unify_trace().to_vec(),
            infer: ctx.infer_trace().to_vec(),
        })
    }

    /// Check every declaration in order. A declaration that fails is bound
    /// to `forall a. a` so later declarations still get checked.
    pub fn check_program(&self, program: &Program) -> Result<CheckedProgram, CheckError> {
        let mut ctx = self.context();
        let mut env = self.globals.clone();
        let session = Session {
            instances: &self.instances,
            config: &self.config,
            annotations: &program.effect_annotations,
        };
        let mut decls = Vec::with_capacity(program.decls.len());
        let mut schemes = BTreeMap::new();

        for decl in &program.decls {
            let errors_before = ctx.error_count();
            ctx.enter(decl.label());
            let typed = match decl {
                Decl::Let { id, name, value } => {
                    let (scheme, value) =
                        infer_binding(&mut ctx, &mut env, &session, value, BindingLevel::TopLevel);
                    let scheme = if ctx.error_count() > errors_before {
                        poison(&mut ctx)
                    } else {
                        scheme
                    };
                    log::debug!("{name} : {scheme}");
                    env.bind(name.clone(), scheme.clone());
                    schemes.insert(name.clone(), scheme.clone());
                    TypedDecl::Let {
                        id: *id,
                        name: name.clone(),
                        scheme,
                        value,
                    }
                }
                Decl::LetRec { id, bindings } => {
                    let mut typed =
                        infer_rec_group(&mut ctx, &mut env, &session, *id, bindings, BindingLevel::TopLevel);
                    let failed = ctx.error_count() > errors_before;
                    for binding in &mut typed {
                        if failed {
                            binding.scheme = poison(&mut ctx);
                        }
                        log::debug!("{} : {}", binding.name, binding.scheme);
                        env.bind(binding.name.clone(), binding.scheme.clone());
                        schemes.insert(binding.name.clone(), binding.scheme.clone());
                    }
                    TypedDecl::LetRec {
                        id: *id,
                        bindings: typed,
                    }
                }
                Decl::Expr(expr) => {
                    TypedDecl::Expr(infer_top_level_expr(&mut ctx, &mut env, &session, expr))
                }
            };
            ctx.leave();
            decls.push(typed);
        }

        let subst = ctx.substitution.clone();
        for decl in &mut decls {
            decl.apply_subst(&subst);
        }
        let resolved = self.finish(&mut ctx, decls.iter().flat_map(TypedDecl::exprs))?;
        let trace = self.trace(&ctx);
        Ok(CheckedProgram {
            decls,
            schemes,
            resolved,
            trace,
        })
    }

    /// Check a single expression as if it were a one-declaration program.
    pub fn check_expr(&self, expr: &Expr) -> Result<CheckedExpr, CheckError> {
        let annotations = BTreeMap::new();
        self.check_expr_annotated(expr, &annotations)
    }

    /// Like `check_expr`, with effect annotations on lambda nodes.
    pub fn check_expr_annotated(
        &self,
        expr: &Expr,
        annotations: &BTreeMap<NodeId, Vec<String>>,
    ) -> Result<CheckedExpr, CheckError> {
        let mut ctx = self.context();
        let mut env = self.globals.clone();
        let session = Session {
            instances: &self.instances,
            config: &self.config,
            annotations,
        };
        ctx.enter("expression");
        let mut typed = infer_top_level_expr(&mut ctx, &mut env, &session, expr);
        ctx.leave();
        typed.apply_subst(&ctx.substitution);
        let resolved = self.finish(&mut ctx, std::iter::once(&typed))?;
        let trace = self.trace(&ctx);
        Ok(CheckedExpr {
            typed,
            resolved,
            trace,
        })
    }

    /// Turn accumulated errors into a result and export the resolution
    /// table. Internal failures win over user errors.
    fn finish<'t>(
        &self,
        ctx: &mut InferenceContext,
        exprs: impl Iterator<Item = &'t TypedExpr>,
    ) -> Result<BTreeMap<NodeId, Vec<ResolvedConstraint>>, CheckError> {
        if let Some(violation) = ctx.take_internal() {
            return Err(CheckError::Internal(violation));
        }
        let errors = ctx.take_errors();
        if !errors.is_empty() {
            log::debug!("checking failed with {} error(s)", errors.len());
            return Err(CheckError::Type(DiagnosticError::multiple(errors)));
        }
        let mut table: ResolvedConstraints = ctx.resolved().clone();
        for expr in exprs {
            assign_operator_methods(expr, &mut table);
        }
        table.export().map_err(CheckError::Internal)
    }
}

/// Binding for a declaration that failed to check.
fn poison(ctx: &mut InferenceContext) -> TypeScheme {
    let var = TypeVar::star(ctx.fresh_type_var());
    TypeScheme {
        type_vars: vec![var.clone()],
        row_vars: Vec::new(),
        predicates: Vec::new(),
        ty: Type::Var(var),
    }
}
