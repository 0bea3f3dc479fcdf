//! Resolution of ground class constraints against the instance registry.
//!
//! Each resolved constraint becomes a `(node, class, type, method)` fact.
//! The elaborator turns these facts into dictionary arguments, so the table
//! must only ever hold ground types.

use std::collections::BTreeMap;

use sable_ast::{BinOp, NodeId, UnaryOp};
use sable_diag::{Category, Diagnostic};
use sable_types::{Type, is_ground, sanitize_type_display, type_arguments};

use crate::instances::InstanceEnv;
use crate::typed::{TypedExpr, TypedExprKind};
use crate::{ClassConstraint, InvariantViolation};

/// One dictionary the elaborator must supply at a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConstraint {
    pub node: NodeId,
    pub class_name: String,
    pub ground_type: Type,
    /// Filled in for operator nodes by `assign_operator_methods`.
    pub method_name: Option<String>,
    pub instance_head: String,
    /// Whether the dictionary comes from a subclass instance.
    pub derived: bool,
}

/// Resolved constraints keyed by originating node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedConstraints {
    entries: BTreeMap<NodeId, Vec<ResolvedConstraint>>,
}

impl ResolvedConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry, ignoring an exact duplicate at the same node.
    pub fn record(&mut self, entry: ResolvedConstraint) {
        let at_node = self.entries.entry(entry.node).or_default();
        if !at_node
            .iter()
            .any(|e| e.class_name == entry.class_name && e.ground_type == entry.ground_type)
        {
            at_node.push(entry);
        }
    }

    pub fn get(&self, node: NodeId) -> &[ResolvedConstraint] {
        self.entries.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedConstraint> {
        self.entries.values().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ResolvedConstraint> {
        self.entries.values_mut().flatten()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn extend(&mut self, other: ResolvedConstraints) {
        for entry in other.entries.into_values().flatten() {
            self.record(entry);
        }
    }

    /// Hand the table to the elaborator. Every entry must be ground; a
    /// variable here means defaulting or solving went wrong.
    pub fn export(&self) -> Result<BTreeMap<NodeId, Vec<ResolvedConstraint>>, InvariantViolation> {
        if let Some(bad) = self.iter().find(|e| !is_ground(&e.ground_type)) {
            return Err(InvariantViolation::NonGroundExport {
                class_name: bad.class_name.clone(),
                ty: bad.ground_type.to_string(),
                node: bad.node,
            });
        }
        Ok(self.entries.clone())
    }
}

/// Canonical method for a binary operator, if it dispatches through a class.
pub fn binary_op_method(op: BinOp) -> Option<&'static str> {
    match op {
        BinOp::Add => Some("add"),
        BinOp::Sub => Some("sub"),
        BinOp::Mul => Some("mul"),
        BinOp::Div => Some("div"),
        BinOp::Mod => Some("mod"),
        BinOp::Eq => Some("eq"),
        BinOp::Neq => Some("neq"),
        BinOp::Lt => Some("lt"),
        BinOp::Lte => Some("lte"),
        BinOp::Gt => Some("gt"),
        BinOp::Gte => Some("gte"),
        BinOp::Concat | BinOp::And | BinOp::Or => None,
    }
}

pub fn unary_op_method(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Neg => "neg",
        UnaryOp::Not => "not",
    }
}

/// Fill `method_name` on every entry recorded at an operator node.
pub fn assign_operator_methods(expr: &TypedExpr, table: &mut ResolvedConstraints) {
    let mut methods = Vec::new();
    expr.walk(&mut |node| match &node.kind {
        TypedExprKind::BinaryOp { op, .. } => {
            if let Some(method) = binary_op_method(*op) {
                methods.push((node.id, method));
            }
        }
        TypedExprKind::UnaryOp { op, .. } => methods.push((node.id, unary_op_method(*op))),
        _ => {}
    });
    for (node, method) in methods {
        if let Some(entries) = table.entries.get_mut(&node) {
            for entry in entries {
                entry.method_name = Some(method.to_string());
            }
        }
    }
}

/// Why a constraint could not be resolved.
#[derive(Debug, Clone)]
pub enum ResolveError {
    /// No instance: a user error.
    Missing(Diagnostic),
    /// A non-ground type reached resolution: an engine bug.
    Internal(InvariantViolation),
}

/// Looks up ground constraints in the instance registry.
pub struct ConstraintResolver<'a> {
    instances: &'a InstanceEnv,
}

impl<'a> ConstraintResolver<'a> {
    pub fn new(instances: &'a InstanceEnv) -> Self {
        Self { instances }
    }

    pub fn resolve(&self, constraint: &ClassConstraint) -> Result<ResolvedConstraint, ResolveError> {
        if !constraint.is_ground() {
            return Err(ResolveError::Internal(
                InvariantViolation::NonGroundResolution {
                    class_name: constraint.class_name.clone(),
                    ty: constraint.ty.to_string(),
                    node: constraint.node,
                },
            ));
        }
        let (instance_head, derived) = self
            .find(&constraint.class_name, &constraint.ty)
            .map_err(|missing| ResolveError::Missing(self.missing(constraint, &missing)))?;
        log::debug!(
            "resolved {} {} at node {}{}",
            constraint.class_name,
            constraint.ty,
            constraint.node,
            if derived { " (derived)" } else { "" }
        );
        Ok(ResolvedConstraint {
            node: constraint.node,
            class_name: constraint.class_name.clone(),
            ground_type: constraint.ty.clone(),
            method_name: None,
            instance_head,
            derived,
        })
    }

    /// Find an instance for `ty`, checking argument contexts recursively.
    /// On failure returns the innermost type that has no instance.
    fn find(&self, class_name: &str, ty: &Type) -> Result<(String, bool), Type> {
        let Some(instance) = self.instances.lookup(class_name, ty) else {
            return Err(ty.clone());
        };
        if instance.constrains_arguments {
            for arg in type_arguments(ty) {
                self.find(class_name, arg)?;
            }
        }
        let derived = instance.is_derived();
        Ok((instance.type_head, derived))
    }

    fn missing(&self, constraint: &ClassConstraint, missing_ty: &Type) -> Diagnostic {
        let shown = sanitize_type_display(missing_ty);
        let message = if *missing_ty == constraint.ty {
            format!("no instance of {} for {shown}", constraint.class_name)
        } else {
            format!(
                "no instance of {} for {shown}, required by {} {}",
                constraint.class_name,
                constraint.class_name,
                sanitize_type_display(&constraint.ty)
            )
        };
        Diagnostic::error(Category::MissingInstance, message)
            .at(constraint.path.clone(), Some(constraint.node.0))
            .with_help(format!(
                "import the prelude or define an instance of {} for {shown}",
                constraint.class_name
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConstraintOrigin;
    use crate::instances::{ClassDecl, ClassInstance};
    use sable_diag::SourcePath;
    use sable_types::TypeVarId;

    fn env() -> InstanceEnv {
        let mut env = InstanceEnv::new();
        env.register_class(ClassDecl::new("Eq", &["eq", "neq"]))
            .unwrap();
        env.register_class(ClassDecl::new("Ord", &["lt"]).with_superclass("Eq"))
            .unwrap();
        env.register_instance(ClassInstance::builtin("Ord", "Int", &["lt"]))
            .unwrap();
        env.register_instance(ClassInstance::builtin("Eq", "List", &["eq", "neq"]).with_argument_context())
            .unwrap();
        env
    }

    fn constraint(class_name: &str, ty: Type) -> ClassConstraint {
        ClassConstraint {
            class_name: class_name.to_string(),
            ty,
            path: SourcePath::new(),
            node: NodeId(7),
            origin: ConstraintOrigin::Operator,
        }
    }

    #[test]
    fn operator_method_table() {
        assert_eq!(binary_op_method(BinOp::Add), Some("add"));
        assert_eq!(binary_op_method(BinOp::Lt), Some("lt"));
        assert_eq!(binary_op_method(BinOp::Eq), Some("eq"));
        assert_eq!(binary_op_method(BinOp::Mod), Some("mod"));
        assert_eq!(binary_op_method(BinOp::Concat), None);
        assert_eq!(unary_op_method(UnaryOp::Neg), "neg");
        assert_eq!(unary_op_method(UnaryOp::Not), "not");
        let adds = [
            BinOp::Add,
            BinOp::Sub,
            BinOp::Mul,
            BinOp::Div,
            BinOp::Mod,
            BinOp::Eq,
            BinOp::Neq,
            BinOp::Lt,
            BinOp::Lte,
            BinOp::Gt,
            BinOp::Gte,
        ]
        .into_iter()
        .filter(|op| binary_op_method(*op) == Some("add"))
        .count();
        assert_eq!(adds, 1);
    }

    #[test]
    fn resolves_through_superclass() {
        let env = env();
        let resolved = ConstraintResolver::new(&env)
            .resolve(&constraint("Eq", Type::int()))
            .unwrap();
        assert!(resolved.derived);
        assert_eq!(resolved.instance_head, "Int");
        assert_eq!(resolved.node, NodeId(7));
    }

    #[test]
    fn argument_context_is_checked() {
        let env = env();
        let resolver = ConstraintResolver::new(&env);
        assert!(resolver.resolve(&constraint("Eq", Type::list(Type::int()))).is_ok());
        match resolver.resolve(&constraint("Eq", Type::list(Type::string()))) {
            Err(ResolveError::Missing(diag)) => {
                assert_eq!(diag.category, Category::MissingInstance);
                assert!(diag.message.contains("for String"));
            }
            other => panic!("expected missing instance, got {other:?}"),
        }
    }

    #[test]
    fn missing_instance_carries_hint() {
        let env = env();
        let Err(ResolveError::Missing(diag)) =
            ConstraintResolver::new(&env).resolve(&constraint("Ord", Type::bool()))
        else {
            panic!("expected missing instance");
        };
        assert_eq!(
            diag.help.as_deref(),
            Some("import the prelude or define an instance of Ord for Bool")
        );
        assert_eq!(diag.node, Some(7));
    }

    #[test]
    fn non_ground_resolution_is_internal() {
        let env = env();
        let result =
            ConstraintResolver::new(&env).resolve(&constraint("Eq", Type::var(TypeVarId(3))));
        assert!(matches!(
            result,
            Err(ResolveError::Internal(InvariantViolation::NonGroundResolution { .. }))
        ));
    }

    #[test]
    fn export_asserts_groundness() {
        let mut table = ResolvedConstraints::new();
        table.record(ResolvedConstraint {
            node: NodeId(1),
            class_name: "Num".to_string(),
            ground_type: Type::int(),
            method_name: Some("add".to_string()),
            instance_head: "Int".to_string(),
            derived: false,
        });
        assert_eq!(table.export().unwrap().len(), 1);

        table.record(ResolvedConstraint {
            node: NodeId(2),
            class_name: "Num".to_string(),
            ground_type: Type::var(TypeVarId(0)),
            method_name: None,
            instance_head: "Int".to_string(),
            derived: false,
        });
        assert!(matches!(
            table.export(),
            Err(InvariantViolation::NonGroundExport { .. })
        ));
    }
}
