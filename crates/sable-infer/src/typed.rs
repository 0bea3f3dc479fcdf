//! The typed tree handed to the elaborator.
//!
//! It mirrors the Core AST node for node. Every expression carries its
//! type and the effects of evaluating it; node ids are preserved so the
//! resolved-constraint table can be joined back onto the tree.

use sable_ast::{BinOp, Lit, NodeId, UnaryOp};
use sable_types::{EffectRow, Predicate, Substitution, Type, TypeScheme};

use crate::ClassConstraint;
use crate::resolve::{ResolvedConstraint, ResolvedConstraints};

#[derive(Debug, Clone, PartialEq)]
pub struct TypedExpr {
    pub id: NodeId,
    pub ty: Type,
    pub effects: EffectRow,
    pub kind: TypedExprKind,
}

/// String and list concatenation share `++` but lower differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcatKind {
    String,
    List,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedExprKind {
    Lit(Lit),
    Var(String),
    Lambda {
        params: Vec<(String, Type)>,
        body: Box<TypedExpr>,
    },
    App {
        func: Box<TypedExpr>,
        args: Vec<TypedExpr>,
    },
    Let {
        name: String,
        scheme: TypeScheme,
        value: Box<TypedExpr>,
        body: Box<TypedExpr>,
    },
    LetRec {
        bindings: Vec<TypedBinding>,
        body: Box<TypedExpr>,
    },
    If {
        condition: Box<TypedExpr>,
        then_branch: Box<TypedExpr>,
        else_branch: Box<TypedExpr>,
    },
    BinaryOp {
        op: BinOp,
        left: Box<TypedExpr>,
        right: Box<TypedExpr>,
    },
    Concat {
        kind: ConcatKind,
        left: Box<TypedExpr>,
        right: Box<TypedExpr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<TypedExpr>,
    },
    Record(Vec<(String, TypedExpr)>),
    Field {
        record: Box<TypedExpr>,
        field: String,
    },
    /// The node's `ty` is the full resulting record, not just the updated
    /// fields.
    Update {
        record: Box<TypedExpr>,
        fields: Vec<(String, TypedExpr)>,
    },
    List(Vec<TypedExpr>),
    Tuple(Vec<TypedExpr>),
    Match {
        scrutinee: Box<TypedExpr>,
        arms: Vec<TypedArm>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedBinding {
    pub name: String,
    pub scheme: TypeScheme,
    pub value: TypedExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedArm {
    pub pattern: TypedPattern,
    pub body: TypedExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedPattern {
    pub id: NodeId,
    pub ty: Type,
    pub kind: TypedPatternKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedPatternKind {
    Wildcard,
    Var(String),
    Lit(Lit),
    Tuple(Vec<TypedPattern>),
    List {
        elements: Vec<TypedPattern>,
        rest: Option<Box<TypedPattern>>,
    },
    Record {
        fields: Vec<(String, TypedPattern)>,
        open: bool,
    },
}

/// A checked top-level declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedDecl {
    Let {
        id: NodeId,
        name: String,
        scheme: TypeScheme,
        value: TypedExpr,
    },
    LetRec {
        id: NodeId,
        bindings: Vec<TypedBinding>,
    },
    Expr(TypedExpr),
}

impl TypedDecl {
    pub fn id(&self) -> NodeId {
        match self {
            TypedDecl::Let { id, .. } | TypedDecl::LetRec { id, .. } => *id,
            TypedDecl::Expr(expr) => expr.id,
        }
    }

    /// The top-level expressions of this declaration.
    pub fn exprs(&self) -> Vec<&TypedExpr> {
        match self {
            TypedDecl::Let { value, .. } => vec![value],
            TypedDecl::LetRec { bindings, .. } => bindings.iter().map(|b| &b.value).collect(),
            TypedDecl::Expr(expr) => vec![expr],
        }
    }
}

impl TypedExpr {
    /// Visit this node and every expression below it, parents first.
    pub fn walk(&self, visit: &mut impl FnMut(&TypedExpr)) {
        visit(self);
        match &self.kind {
            TypedExprKind::Lit(_) | TypedExprKind::Var(_) => {}
            TypedExprKind::Lambda { body, .. } => body.walk(visit),
            TypedExprKind::App { func, args } => {
                func.walk(visit);
                for arg in args {
                    arg.walk(visit);
                }
            }
            TypedExprKind::Let { value, body, .. } => {
                value.walk(visit);
                body.walk(visit);
            }
            TypedExprKind::LetRec { bindings, body } => {
                for binding in bindings {
                    binding.value.walk(visit);
                }
                body.walk(visit);
            }
            TypedExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.walk(visit);
                then_branch.walk(visit);
                else_branch.walk(visit);
            }
            TypedExprKind::BinaryOp { left, right, .. }
            | TypedExprKind::Concat { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            TypedExprKind::UnaryOp { operand, .. } => operand.walk(visit),
            TypedExprKind::Record(fields) => {
                for (_, value) in fields {
                    value.walk(visit);
                }
            }
            TypedExprKind::Field { record, .. } => record.walk(visit),
            TypedExprKind::Update { record, fields } => {
                record.walk(visit);
                for (_, value) in fields {
                    value.walk(visit);
                }
            }
            TypedExprKind::List(elems) | TypedExprKind::Tuple(elems) => {
                for elem in elems {
                    elem.walk(visit);
                }
            }
            TypedExprKind::Match { scrutinee, arms } => {
                scrutinee.walk(visit);
                for arm in arms {
                    arm.body.walk(visit);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Substitution application
// ---------------------------------------------------------------------------

/// In-place substitution over everything that holds types.
pub trait ApplySubst {
    fn apply_subst(&mut self, subst: &Substitution);
}

impl ApplySubst for Type {
    fn apply_subst(&mut self, subst: &Substitution) {
        *self = subst.apply(self);
    }
}

impl ApplySubst for EffectRow {
    fn apply_subst(&mut self, subst: &Substitution) {
        *self = subst.apply_effect_row(self);
    }
}

impl ApplySubst for TypeScheme {
    fn apply_subst(&mut self, subst: &Substitution) {
        *self = subst.apply_scheme(self);
    }
}

impl ApplySubst for Predicate {
    fn apply_subst(&mut self, subst: &Substitution) {
        self.ty.apply_subst(subst);
    }
}

impl ApplySubst for ClassConstraint {
    fn apply_subst(&mut self, subst: &Substitution) {
        self.ty.apply_subst(subst);
    }
}

impl ApplySubst for ResolvedConstraint {
    fn apply_subst(&mut self, subst: &Substitution) {
        self.ground_type.apply_subst(subst);
    }
}

impl ApplySubst for ResolvedConstraints {
    fn apply_subst(&mut self, subst: &Substitution) {
        for entry in self.iter_mut() {
            entry.apply_subst(subst);
        }
    }
}

impl<T: ApplySubst> ApplySubst for Vec<T> {
    fn apply_subst(&mut self, subst: &Substitution) {
        for item in self.iter_mut() {
            item.apply_subst(subst);
        }
    }
}

impl ApplySubst for TypedPattern {
    fn apply_subst(&mut self, subst: &Substitution) {
        self.ty.apply_subst(subst);
        match &mut self.kind {
            TypedPatternKind::Wildcard | TypedPatternKind::Var(_) | TypedPatternKind::Lit(_) => {}
            TypedPatternKind::Tuple(elems) => elems.apply_subst(subst),
            TypedPatternKind::List { elements, rest } => {
                elements.apply_subst(subst);
                if let Some(rest) = rest {
                    rest.apply_subst(subst);
                }
            }
            TypedPatternKind::Record { fields, .. } => {
                for (_, pattern) in fields {
                    pattern.apply_subst(subst);
                }
            }
        }
    }
}

impl ApplySubst for TypedBinding {
    fn apply_subst(&mut self, subst: &Substitution) {
        self.scheme.apply_subst(subst);
        self.value.apply_subst(subst);
    }
}

impl ApplySubst for TypedExpr {
    fn apply_subst(&mut self, subst: &Substitution) {
        self.ty.apply_subst(subst);
        self.effects.apply_subst(subst);
        match &mut self.kind {
            TypedExprKind::Lit(_) | TypedExprKind::Var(_) => {}
            TypedExprKind::Lambda { params, body } => {
                for (_, ty) in params {
                    ty.apply_subst(subst);
                }
                body.apply_subst(subst);
            }
            TypedExprKind::App { func, args } => {
                func.apply_subst(subst);
                args.apply_subst(subst);
            }
            TypedExprKind::Let {
                scheme,
                value,
                body,
                ..
            } => {
                scheme.apply_subst(subst);
                value.apply_subst(subst);
                body.apply_subst(subst);
            }
            TypedExprKind::LetRec { bindings, body } => {
                bindings.apply_subst(subst);
                body.apply_subst(subst);
            }
            TypedExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.apply_subst(subst);
                then_branch.apply_subst(subst);
                else_branch.apply_subst(subst);
            }
            TypedExprKind::BinaryOp { left, right, .. }
            | TypedExprKind::Concat { left, right, .. } => {
                left.apply_subst(subst);
                right.apply_subst(subst);
            }
            TypedExprKind::UnaryOp { operand, .. } => operand.apply_subst(subst),
            TypedExprKind::Record(fields) => {
                for (_, value) in fields {
                    value.apply_subst(subst);
                }
            }
            TypedExprKind::Field { record, .. } => record.apply_subst(subst),
            TypedExprKind::Update { record, fields } => {
                record.apply_subst(subst);
                for (_, value) in fields {
                    value.apply_subst(subst);
                }
            }
            TypedExprKind::List(elems) | TypedExprKind::Tuple(elems) => elems.apply_subst(subst),
            TypedExprKind::Match { scrutinee, arms } => {
                scrutinee.apply_subst(subst);
                for arm in arms {
                    arm.pattern.apply_subst(subst);
                    arm.body.apply_subst(subst);
                }
            }
        }
    }
}

impl ApplySubst for TypedDecl {
    fn apply_subst(&mut self, subst: &Substitution) {
        match self {
            TypedDecl::Let { scheme, value, .. } => {
                scheme.apply_subst(subst);
                value.apply_subst(subst);
            }
            TypedDecl::LetRec { bindings, .. } => bindings.apply_subst(subst),
            TypedDecl::Expr(expr) => expr.apply_subst(subst),
        }
    }
}
