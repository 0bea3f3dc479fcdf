//! Defaulting of ambiguous class-constrained type variables.
//!
//! Runs only at generalization boundaries. A variable is ambiguous when a
//! class constraint mentions it but nothing else ever will: it is free in
//! neither the type being generalized nor the environment. Such a variable
//! is either defaulted from its classes or rejected.

use std::collections::{BTreeMap, BTreeSet};

use sable_diag::{Category, Diagnostic};
use sable_types::{Substitution, Type, TypeVarId, free_type_vars, type_arguments};

use crate::ClassConstraint;
use crate::instances::InstanceEnv;

/// Classes that never choose a representation on their own.
pub const NEUTRAL_CLASSES: &[&str] = &["Eq", "Ord", "Show"];

/// Which variables are candidates for defaulting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultingMode {
    /// Only variables absent from the monotype and the environment.
    Boundary,
    /// Also variables of the monotype, so a bare top-level `1 + 2` gets a
    /// concrete type.
    TopLevel,
}

/// Result of a defaulting pass.
#[derive(Debug, Clone, Default)]
pub struct DefaultingOutcome {
    pub substitution: Substitution,
    pub errors: Vec<Diagnostic>,
    /// Variables that could not be defaulted. Their constraints have
    /// already been reported.
    pub rejected: BTreeSet<TypeVarId>,
}

struct VarClasses<'a> {
    classes: BTreeSet<String>,
    first: &'a ClassConstraint,
}

/// Decide a default for every candidate variable.
pub fn default_constraints(
    monotype: &Type,
    constraints: &[ClassConstraint],
    env_vars: &BTreeSet<TypeVarId>,
    instances: &InstanceEnv,
    mode: DefaultingMode,
) -> DefaultingOutcome {
    let mut by_var: BTreeMap<TypeVarId, VarClasses<'_>> = BTreeMap::new();
    for constraint in constraints {
        let mut vars = BTreeSet::new();
        reduce_to_vars(&constraint.class_name, &constraint.ty, instances, &mut vars);
        for var in vars {
            by_var
                .entry(var)
                .or_insert_with(|| VarClasses {
                    classes: BTreeSet::new(),
                    first: constraint,
                })
                .classes
                .insert(constraint.class_name.clone());
        }
    }

    let in_type = free_type_vars(monotype);
    let mut outcome = DefaultingOutcome::default();
    for (var, entry) in &by_var {
        if env_vars.contains(var) {
            continue;
        }
        if mode == DefaultingMode::Boundary && in_type.contains(var) {
            continue;
        }
        match choose_default(&entry.classes, instances) {
            Ok(ty) => {
                log::debug!(
                    "defaulting t{} with classes {:?} to {ty}",
                    var.0,
                    entry.classes
                );
                outcome.substitution.bind_type(*var, ty);
            }
            Err(reason) => {
                log::debug!("cannot default t{}: {reason}", var.0);
                outcome.rejected.insert(*var);
                let diag = match &reason {
                    NoDefault::Conflict(_) => Diagnostic::error(
                        Category::AmbiguousType,
                        format!("conflicting numeric classes: {reason}"),
                    )
                    .with_help(
                        "convert one operand explicitly, e.g. with to_float, so one numeric type is used",
                    ),
                    _ => Diagnostic::error(
                        Category::AmbiguousType,
                        format!("ambiguous type requires annotation: {reason}"),
                    )
                    .with_help(Category::AmbiguousType.example_fix()),
                };
                outcome
                    .errors
                    .push(diag.at(entry.first.path.clone(), Some(entry.first.node.0)));
            }
        }
    }
    outcome
}

/// Collect the variables a constraint ultimately puts a class on, reducing
/// through instances that require the class of their arguments.
fn reduce_to_vars(
    class_name: &str,
    ty: &Type,
    instances: &InstanceEnv,
    vars: &mut BTreeSet<TypeVarId>,
) {
    if let Type::Var(v) = ty {
        vars.insert(v.id);
        return;
    }
    if let Some(instance) = instances.lookup(class_name, ty) {
        if instance.constrains_arguments {
            for arg in type_arguments(ty) {
                reduce_to_vars(class_name, arg, instances, vars);
            }
        }
    }
}

/// Why a variable got no default.
#[derive(Debug, thiserror::Error)]
enum NoDefault {
    #[error("unknown class `{0}`")]
    UnknownClass(String),
    #[error("class `{0}` has no default type")]
    NoDefaultType(String),
    /// Two primary classes no single type can satisfy.
    #[error("no type is both {}", .0.join(" and "))]
    Conflict(Vec<String>),
}

fn choose_default(classes: &BTreeSet<String>, instances: &InstanceEnv) -> Result<Type, NoDefault> {
    let mut primary = BTreeSet::new();
    for class in classes {
        if NEUTRAL_CLASSES.contains(&class.as_str()) {
            continue;
        }
        if !instances.has_class(class) {
            return Err(NoDefault::UnknownClass(class.clone()));
        }
        if instances.default_type(class).is_none() {
            return Err(NoDefault::NoDefaultType(class.clone()));
        }
        primary.insert(class.clone());
    }

    // A class implied by another primary class adds nothing: Fractional
    // already implies Num.
    let implied: BTreeSet<String> = primary
        .iter()
        .flat_map(|c| instances.superclass_closure(c))
        .collect();
    let primary: Vec<&String> = primary.iter().filter(|c| !implied.contains(*c)).collect();

    match primary.as_slice() {
        [] => Ok(instances.module_default().clone()),
        [only] => instances
            .default_type(only)
            .cloned()
            .ok_or_else(|| NoDefault::NoDefaultType((*only).clone())),
        several => Err(NoDefault::Conflict(
            several.iter().map(|c| c.to_string()).collect(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConstraintOrigin;
    use crate::instances::{ClassDecl, ClassInstance};
    use sable_ast::NodeId;
    use sable_diag::SourcePath;

    fn env() -> InstanceEnv {
        let mut env = InstanceEnv::new();
        env.register_class(ClassDecl::new("Eq", &["eq"])).unwrap();
        env.register_class(ClassDecl::new("Ord", &["lt"]).with_superclass("Eq"))
            .unwrap();
        env.register_class(ClassDecl::new("Show", &["show"])).unwrap();
        env.register_class(ClassDecl::new("Num", &["add"]).with_default(Type::int()))
            .unwrap();
        env.register_class(
            ClassDecl::new("Fractional", &["div"])
                .with_superclass("Num")
                .with_default(Type::float()),
        )
        .unwrap();
        env.register_class(
            ClassDecl::new("Integral", &["mod"])
                .with_superclass("Num")
                .with_default(Type::int()),
        )
        .unwrap();
        env.register_instance(ClassInstance::builtin("Eq", "List", &["eq"]).with_argument_context())
            .unwrap();
        env
    }

    fn c(class_name: &str, ty: Type) -> ClassConstraint {
        ClassConstraint {
            class_name: class_name.to_string(),
            ty,
            path: SourcePath::new(),
            node: NodeId(1),
            origin: ConstraintOrigin::Operator,
        }
    }

    fn var(n: u32) -> Type {
        Type::var(TypeVarId(n))
    }

    fn run(constraints: &[ClassConstraint], mode: DefaultingMode) -> DefaultingOutcome {
        default_constraints(&Type::unit(), constraints, &BTreeSet::new(), &env(), mode)
    }

    #[test]
    fn num_defaults_to_int() {
        let out = run(&[c("Num", var(0))], DefaultingMode::Boundary);
        assert!(out.errors.is_empty());
        assert_eq!(out.substitution.lookup_type(TypeVarId(0)), Some(&Type::int()));
    }

    #[test]
    fn fractional_with_num_defaults_to_float() {
        let out = run(
            &[c("Num", var(0)), c("Fractional", var(0)), c("Ord", var(0))],
            DefaultingMode::Boundary,
        );
        assert_eq!(out.substitution.lookup_type(TypeVarId(0)), Some(&Type::float()));
    }

    #[test]
    fn neutral_only_uses_module_default() {
        let out = run(&[c("Show", var(0)), c("Eq", var(0))], DefaultingMode::Boundary);
        assert_eq!(out.substitution.lookup_type(TypeVarId(0)), Some(&Type::int()));
    }

    #[test]
    fn mixed_numeric_families_are_ambiguous() {
        let out = run(
            &[c("Fractional", var(0)), c("Integral", var(0))],
            DefaultingMode::Boundary,
        );
        assert!(out.substitution.is_empty());
        assert!(out.rejected.contains(&TypeVarId(0)));
        assert_eq!(out.errors[0].category, Category::AmbiguousType);
        assert_eq!(
            out.errors[0].message,
            "conflicting numeric classes: no type is both Fractional and Integral"
        );
        assert!(out.errors[0].help.as_deref().unwrap_or("").contains("to_float"));
    }

    #[test]
    fn unknown_class_is_ambiguous() {
        let out = run(&[c("Monoid", var(0))], DefaultingMode::Boundary);
        assert_eq!(out.errors.len(), 1);
    }

    #[test]
    fn variables_of_the_monotype_wait_for_generalization() {
        let constraints = [c("Num", var(0))];
        let boundary =
            default_constraints(&var(0), &constraints, &BTreeSet::new(), &env(), DefaultingMode::Boundary);
        assert!(boundary.substitution.is_empty());
        let top =
            default_constraints(&var(0), &constraints, &BTreeSet::new(), &env(), DefaultingMode::TopLevel);
        assert_eq!(top.substitution.lookup_type(TypeVarId(0)), Some(&Type::int()));
    }

    #[test]
    fn environment_variables_are_never_defaulted() {
        let env_vars: BTreeSet<TypeVarId> = [TypeVarId(0)].into_iter().collect();
        let out = default_constraints(
            &Type::unit(),
            &[c("Num", var(0))],
            &env_vars,
            &env(),
            DefaultingMode::TopLevel,
        );
        assert!(out.substitution.is_empty());
        assert!(out.errors.is_empty());
    }

    #[test]
    fn constraints_reduce_through_instance_contexts() {
        let out = run(
            &[c("Eq", Type::list(var(0))), c("Num", var(0))],
            DefaultingMode::Boundary,
        );
        assert_eq!(out.substitution.lookup_type(TypeVarId(0)), Some(&Type::int()));
    }
}
