//! Type-class declarations and the coherent instance registry.
//!
//! Instances are keyed by `(class, type head)`. At most one instance may
//! exist per key. A lookup that finds no direct instance falls back to
//! superclass derivation: an instance of `Ord Int` also provides `Eq Int`,
//! with every `Eq` method marked as derived.

use std::collections::{BTreeMap, BTreeSet};

use sable_diag::{Category, Diagnostic};
use sable_types::{Type, type_head};

/// A registered type class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    /// Direct superclasses.
    pub superclasses: Vec<String>,
    pub methods: Vec<String>,
    /// Type chosen when an ambiguous variable carries this class.
    pub default_type: Option<Type>,
}

impl ClassDecl {
    pub fn new(name: impl Into<String>, methods: &[&str]) -> Self {
        Self {
            name: name.into(),
            superclasses: Vec::new(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
            default_type: None,
        }
    }

    pub fn with_superclass(mut self, superclass: impl Into<String>) -> Self {
        self.superclasses.push(superclass.into());
        self
    }

    pub fn with_default(mut self, ty: Type) -> Self {
        self.default_type = Some(ty);
        self
    }
}

/// How an instance provides one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodImpl {
    /// A primitive supplied by the runtime, named by its symbol.
    Builtin(String),
    /// Provided by the dictionary of a subclass instance.
    Derived { via_class: String, method: String },
}

/// An instance of a class for one type head.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassInstance {
    pub class_name: String,
    pub type_head: String,
    pub methods: BTreeMap<String, MethodImpl>,
    /// Filled in from the class declaration at registration.
    pub superclasses: Vec<String>,
    /// Whether the instance requires the same class on every type argument,
    /// as in `Eq a => Eq (List a)`.
    pub constrains_arguments: bool,
}

impl ClassInstance {
    /// An instance whose methods are runtime primitives named
    /// `<head>.<method>`.
    pub fn builtin(class_name: &str, type_head: &str, methods: &[&str]) -> Self {
        Self {
            class_name: class_name.to_string(),
            type_head: type_head.to_string(),
            methods: methods
                .iter()
                .map(|m| (m.to_string(), MethodImpl::Builtin(format!("{type_head}.{m}"))))
                .collect(),
            superclasses: Vec::new(),
            constrains_arguments: false,
        }
    }

    pub fn with_argument_context(mut self) -> Self {
        self.constrains_arguments = true;
        self
    }

    /// Whether this instance was synthesized from a subclass instance.
    pub fn is_derived(&self) -> bool {
        self.methods
            .values()
            .any(|m| matches!(m, MethodImpl::Derived { .. }))
    }

    pub fn method(&self, name: &str) -> Option<&MethodImpl> {
        self.methods.get(name)
    }
}

/// Class declarations, instances, and per-class defaults.
#[derive(Debug, Clone)]
pub struct InstanceEnv {
    classes: BTreeMap<String, ClassDecl>,
    instances: BTreeMap<(String, String), ClassInstance>,
    module_default: Type,
    frozen: bool,
}

impl InstanceEnv {
    pub fn new() -> Self {
        Self {
            classes: BTreeMap::new(),
            instances: BTreeMap::new(),
            module_default: Type::int(),
            frozen: false,
        }
    }

    pub fn register_class(&mut self, decl: ClassDecl) -> Result<(), Diagnostic> {
        self.check_open(&format!("class `{}`", decl.name))?;
        if self.classes.contains_key(&decl.name) {
            return Err(Diagnostic::error(
                Category::TypeError,
                format!("class `{}` is already defined", decl.name),
            ));
        }
        if let Some(missing) = decl
            .superclasses
            .iter()
            .find(|s| !self.classes.contains_key(*s))
        {
            return Err(Diagnostic::error(
                Category::TypeError,
                format!(
                    "class `{}` names unknown superclass `{missing}`",
                    decl.name
                ),
            ));
        }
        log::debug!("registered class {}", decl.name);
        self.classes.insert(decl.name.clone(), decl);
        Ok(())
    }

    pub fn register_instance(&mut self, mut instance: ClassInstance) -> Result<(), Diagnostic> {
        self.check_open(&format!(
            "instance {} {}",
            instance.class_name, instance.type_head
        ))?;
        let Some(decl) = self.classes.get(&instance.class_name) else {
            return Err(Diagnostic::error(
                Category::TypeError,
                format!(
                    "instance for unknown class `{}` on `{}`",
                    instance.class_name, instance.type_head
                ),
            ));
        };
        let key = (instance.class_name.clone(), instance.type_head.clone());
        if self.instances.contains_key(&key) {
            return Err(Diagnostic::error(
                Category::OverlappingInstance,
                format!(
                    "overlapping instances: `{}` already has an instance for `{}`",
                    instance.class_name, instance.type_head
                ),
            )
            .with_help(Category::OverlappingInstance.example_fix()));
        }
        instance.superclasses = decl.superclasses.clone();
        self.instances.insert(key, instance);
        Ok(())
    }

    fn check_open(&self, what: &str) -> Result<(), Diagnostic> {
        if self.frozen {
            return Err(Diagnostic::error(
                Category::TypeError,
                format!("cannot register {what}: the instance registry is frozen once inference starts"),
            ));
        }
        Ok(())
    }

    /// Reject any further registration.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn class(&self, name: &str) -> Option<&ClassDecl> {
        self.classes.get(name)
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassDecl> {
        self.classes.values()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Find the instance of `class_name` for `ty`'s head, directly or
    /// derived through a subclass instance.
    pub fn lookup(&self, class_name: &str, ty: &Type) -> Option<ClassInstance> {
        let head = type_head(ty)?;
        self.lookup_head(class_name, &head)
    }

    pub fn lookup_head(&self, class_name: &str, head: &str) -> Option<ClassInstance> {
        let key = (class_name.to_string(), head.to_string());
        if let Some(direct) = self.instances.get(&key) {
            return Some(direct.clone());
        }
        let decl = self.classes.get(class_name)?;
        // Any subclass (transitively) with an instance for this head provides
        // the dictionary. BTreeMap order keeps the choice deterministic.
        self.instances
            .values()
            .find(|inst| {
                inst.type_head == head
                    && self
                        .superclass_closure(&inst.class_name)
                        .contains(class_name)
            })
            .map(|source| ClassInstance {
                class_name: class_name.to_string(),
                type_head: head.to_string(),
                methods: decl
                    .methods
                    .iter()
                    .map(|m| {
                        (
                            m.clone(),
                            MethodImpl::Derived {
                                via_class: source.class_name.clone(),
                                method: m.clone(),
                            },
                        )
                    })
                    .collect(),
                superclasses: decl.superclasses.clone(),
                constrains_arguments: source.constrains_arguments,
            })
    }

    /// All transitive superclasses of `class_name`, excluding itself.
    pub fn superclass_closure(&self, class_name: &str) -> BTreeSet<String> {
        let mut closure = BTreeSet::new();
        let mut stack = vec![class_name.to_string()];
        while let Some(current) = stack.pop() {
            let Some(decl) = self.classes.get(&current) else {
                continue;
            };
            for sup in &decl.superclasses {
                if closure.insert(sup.clone()) {
                    stack.push(sup.clone());
                }
            }
        }
        closure
    }

    /// The registered default type for a class, if it has one.
    pub fn default_type(&self, class_name: &str) -> Option<&Type> {
        self.classes
            .get(class_name)
            .and_then(|c| c.default_type.as_ref())
    }

    /// The type chosen when only neutral classes constrain a variable.
    pub fn module_default(&self) -> &Type {
        &self.module_default
    }

    pub fn set_module_default(&mut self, ty: Type) {
        self.module_default = ty;
    }
}

impl Default for InstanceEnv {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with_classes() -> InstanceEnv {
        let mut env = InstanceEnv::new();
        env.register_class(ClassDecl::new("Eq", &["eq", "neq"]))
            .unwrap();
        env.register_class(ClassDecl::new("Ord", &["lt", "lte", "gt", "gte"]).with_superclass("Eq"))
            .unwrap();
        env.register_class(ClassDecl::new("Num", &["add", "sub", "mul", "neg"]).with_default(Type::int()))
            .unwrap();
        env.register_class(
            ClassDecl::new("Fractional", &["div"])
                .with_superclass("Num")
                .with_default(Type::float()),
        )
        .unwrap();
        env
    }

    #[test]
    fn overlapping_instance_is_rejected() {
        let mut env = env_with_classes();
        env.register_instance(ClassInstance::builtin("Eq", "Int", &["eq", "neq"]))
            .unwrap();
        let err = env
            .register_instance(ClassInstance::builtin("Eq", "Int", &["eq", "neq"]))
            .unwrap_err();
        assert_eq!(err.category, Category::OverlappingInstance);
    }

    #[test]
    fn eq_is_derived_from_ord() {
        let mut env = env_with_classes();
        env.register_instance(ClassInstance::builtin("Ord", "Int", &["lt", "lte", "gt", "gte"]))
            .unwrap();
        let eq = env.lookup("Eq", &Type::int()).unwrap();
        assert!(eq.is_derived());
        assert_eq!(
            eq.method("eq"),
            Some(&MethodImpl::Derived {
                via_class: "Ord".to_string(),
                method: "eq".to_string()
            })
        );
        assert!(eq.method("neq").is_some());
        assert!(env.lookup("Eq", &Type::string()).is_none());
    }

    #[test]
    fn direct_instance_wins_over_derivation() {
        let mut env = env_with_classes();
        env.register_instance(ClassInstance::builtin("Ord", "Int", &["lt"]))
            .unwrap();
        env.register_instance(ClassInstance::builtin("Eq", "Int", &["eq", "neq"]))
            .unwrap();
        let eq = env.lookup("Eq", &Type::int()).unwrap();
        assert!(!eq.is_derived());
        assert_eq!(eq.method("eq"), Some(&MethodImpl::Builtin("Int.eq".to_string())));
    }

    #[test]
    fn superclass_closure_is_transitive() {
        let mut env = env_with_classes();
        env.register_class(ClassDecl::new("Total", &[]).with_superclass("Ord"))
            .unwrap();
        let closure = env.superclass_closure("Total");
        assert!(closure.contains("Ord"));
        assert!(closure.contains("Eq"));
        assert!(!closure.contains("Total"));

        env.register_instance(ClassInstance::builtin("Total", "Bool", &[]))
            .unwrap();
        assert!(env.lookup("Eq", &Type::bool()).is_some());
    }

    #[test]
    fn frozen_registry_rejects_registration() {
        let mut env = env_with_classes();
        env.freeze();
        assert!(
            env.register_instance(ClassInstance::builtin("Eq", "Int", &["eq"]))
                .is_err()
        );
        assert!(env.register_class(ClassDecl::new("Show", &["show"])).is_err());
    }

    #[test]
    fn unknown_class_and_superclass_are_rejected() {
        let mut env = InstanceEnv::new();
        assert!(
            env.register_instance(ClassInstance::builtin("Eq", "Int", &["eq"]))
                .is_err()
        );
        assert!(
            env.register_class(ClassDecl::new("Ord", &["lt"]).with_superclass("Eq"))
                .is_err()
        );
    }

    #[test]
    fn lookup_on_variable_has_no_instance() {
        let mut env = env_with_classes();
        env.register_instance(ClassInstance::builtin("Eq", "Int", &["eq"]))
            .unwrap();
        assert!(env.lookup("Eq", &Type::var(sable_types::TypeVarId(0))).is_none());
    }

    #[test]
    fn defaults_come_from_class_declarations() {
        let env = env_with_classes();
        assert_eq!(env.default_type("Num"), Some(&Type::int()));
        assert_eq!(env.default_type("Fractional"), Some(&Type::float()));
        assert_eq!(env.default_type("Eq"), None);
        assert_eq!(env.module_default(), &Type::int());
    }
}
