//! Builtin classes, instances, and value bindings.
//!
//! The checker takes its builtins from a `BuiltinProvider` passed to its
//! constructor. `Prelude` is the standard provider.

use sable_types::{EffectRow, Label, Predicate, Type, TypeScheme, TypeVar};

use crate::VarSupply;
use crate::instances::{ClassDecl, ClassInstance};

/// Supplies the initial class registry and type environment.
pub trait BuiltinProvider {
    fn classes(&self) -> Vec<ClassDecl>;

    fn instances(&self) -> Vec<ClassInstance>;

    /// Builtin value bindings. Quantified variables are drawn from `supply`
    /// so they never collide with inference variables.
    fn values(&self, supply: &mut VarSupply) -> Vec<(String, TypeScheme)>;

    /// Default for variables constrained only by neutral classes.
    fn module_default(&self) -> Type {
        Type::int()
    }
}

const SCALARS: &[&str] = &["Int", "Float", "String", "Bool", "Unit", "Bytes"];
const EQ_METHODS: &[&str] = &["eq", "neq"];
const ORD_METHODS: &[&str] = &["lt", "lte", "gt", "gte"];
const SHOW_METHODS: &[&str] = &["show"];
const NUM_METHODS: &[&str] = &["add", "sub", "mul", "div", "neg"];

/// The standard builtins.
#[derive(Debug, Clone, Copy, Default)]
pub struct Prelude;

impl BuiltinProvider for Prelude {
    fn classes(&self) -> Vec<ClassDecl> {
        vec![
            ClassDecl::new("Eq", EQ_METHODS),
            ClassDecl::new("Ord", ORD_METHODS).with_superclass("Eq"),
            ClassDecl::new("Show", SHOW_METHODS),
            ClassDecl::new("Num", NUM_METHODS).with_default(Type::int()),
            // Arithmetic on a fractional operand dispatches every operator
            // through the Fractional dictionary.
            ClassDecl::new("Fractional", NUM_METHODS)
                .with_superclass("Num")
                .with_default(Type::float()),
            ClassDecl::new("Integral", &["mod"])
                .with_superclass("Num")
                .with_default(Type::int()),
        ]
    }

    fn instances(&self) -> Vec<ClassInstance> {
        let mut instances = Vec::new();
        for head in SCALARS {
            instances.push(ClassInstance::builtin("Eq", head, EQ_METHODS));
            instances.push(ClassInstance::builtin("Ord", head, ORD_METHODS));
            instances.push(ClassInstance::builtin("Show", head, SHOW_METHODS));
        }
        for head in ["List", "Tuple"] {
            instances.push(ClassInstance::builtin("Eq", head, EQ_METHODS).with_argument_context());
            instances.push(ClassInstance::builtin("Ord", head, ORD_METHODS).with_argument_context());
            instances
                .push(ClassInstance::builtin("Show", head, SHOW_METHODS).with_argument_context());
        }
        instances.push(ClassInstance::builtin("Num", "Int", NUM_METHODS));
        instances.push(ClassInstance::builtin("Num", "Float", NUM_METHODS));
        instances.push(ClassInstance::builtin("Fractional", "Float", NUM_METHODS));
        instances.push(ClassInstance::builtin("Integral", "Int", &["mod"]));
        instances
    }

    fn values(&self, supply: &mut VarSupply) -> Vec<(String, TypeScheme)> {
        let effect = |name: &str| EffectRow::closed([Label::new(name)]);
        let mono = |params: Vec<Type>, effects: EffectRow, ret: Type| {
            TypeScheme::mono(Type::function(params, effects, ret))
        };

        let show = {
            let a = supply.fresh_type_var();
            TypeScheme {
                type_vars: vec![TypeVar::star(a)],
                row_vars: Vec::new(),
                predicates: vec![Predicate {
                    class_name: "Show".to_string(),
                    ty: Type::var(a),
                }],
                ty: Type::pure_function(vec![Type::var(a)], Type::string()),
            }
        };

        let length = {
            let a = supply.fresh_type_var();
            TypeScheme {
                type_vars: vec![TypeVar::star(a)],
                row_vars: Vec::new(),
                predicates: Vec::new(),
                ty: Type::pure_function(vec![Type::list(Type::var(a))], Type::int()),
            }
        };

        let map = {
            let a = supply.fresh_type_var();
            let b = supply.fresh_type_var();
            let e = supply.fresh_row_var();
            let callback = Type::function(vec![Type::var(a)], EffectRow::open([], e), Type::var(b));
            TypeScheme {
                type_vars: vec![TypeVar::star(a), TypeVar::star(b)],
                row_vars: vec![e],
                predicates: Vec::new(),
                ty: Type::function(
                    vec![callback, Type::list(Type::var(a))],
                    EffectRow::open([], e),
                    Type::list(Type::var(b)),
                ),
            }
        };

        vec![
            (
                "print".to_string(),
                mono(vec![Type::string()], effect("IO"), Type::unit()),
            ),
            ("show".to_string(), show),
            ("length".to_string(), length),
            ("map".to_string(), map),
            (
                "read_file".to_string(),
                mono(vec![Type::string()], effect("FS"), Type::string()),
            ),
            (
                "fetch".to_string(),
                mono(vec![Type::string()], effect("Net"), Type::string()),
            ),
            (
                "now".to_string(),
                mono(vec![], effect("Clock"), Type::int()),
            ),
            (
                "random".to_string(),
                mono(vec![], effect("Rand"), Type::float()),
            ),
            (
                "sleep".to_string(),
                mono(vec![Type::int()], effect("Async"), Type::unit()),
            ),
            (
                "to_float".to_string(),
                TypeScheme::mono(Type::pure_function(vec![Type::int()], Type::float())),
            ),
        ]
    }
}
