//! Core AST node definitions for Sable.
//!
//! This is the desugared "Core" form the type checker consumes. Every
//! expression and pattern carries a stable [`NodeId`]; diagnostics, the
//! typed tree, and resolved constraints are all keyed by it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Stable per-node identifier assigned by the lowering pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Literals and operators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Unit,
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat, // ++  (String or List)
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Concat => "++",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Lt => "<",
            BinOp::Lte => "<=",
            BinOp::Gt => ">",
            BinOp::Gte => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(self, BinOp::Lt | BinOp::Lte | BinOp::Gt | BinOp::Gte)
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Neq)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        }
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Lit(Lit),
    Var(String),
    Lambda {
        params: Vec<String>,
        body: Box<Expr>,
    },
    App {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    Let {
        name: String,
        value: Box<Expr>,
        body: Box<Expr>,
    },
    /// Mutually recursive group, generalized as one unit.
    LetRec {
        bindings: Vec<Binding>,
        body: Box<Expr>,
    },
    If {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    BinaryOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Record(Vec<(String, Expr)>),
    Field {
        record: Box<Expr>,
        field: String,
    },
    /// `{ base | f = e, ... }`: replaces existing fields only.
    Update {
        record: Box<Expr>,
        fields: Vec<(String, Expr)>,
    },
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Match {
        scrutinee: Box<Expr>,
        arms: Vec<MatchArm>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub body: Expr,
}

impl Expr {
    pub fn new(id: NodeId, kind: ExprKind) -> Self {
        Self { id, kind }
    }

    /// Syntactic values may be generalized at a let: literals, lambdas,
    /// and records, tuples or lists built only from values.
    pub fn is_syntactic_value(&self) -> bool {
        match &self.kind {
            ExprKind::Lit(_) | ExprKind::Lambda { .. } => true,
            ExprKind::Record(fields) => fields.iter().all(|(_, e)| e.is_syntactic_value()),
            ExprKind::Tuple(elems) | ExprKind::List(elems) => {
                elems.iter().all(Expr::is_syntactic_value)
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub id: NodeId,
    pub kind: PatternKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatternKind {
    Wildcard,
    Var(String),
    Lit(Lit),
    Tuple(Vec<Pattern>),
    /// `[a, b, ..rest]`; `rest` binds the remaining list when present.
    List {
        elements: Vec<Pattern>,
        rest: Option<Box<Pattern>>,
    },
    /// `{ x: p, .. }` when `open`, otherwise an exact record.
    Record {
        fields: Vec<(String, Pattern)>,
        open: bool,
    },
}

// ---------------------------------------------------------------------------
// Top-level declarations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Let {
        id: NodeId,
        name: String,
        value: Expr,
    },
    LetRec {
        id: NodeId,
        bindings: Vec<Binding>,
    },
    /// A bare expression evaluated at top level.
    Expr(Expr),
}

impl Decl {
    pub fn id(&self) -> NodeId {
        match self {
            Decl::Let { id, .. } | Decl::LetRec { id, .. } => *id,
            Decl::Expr(expr) => expr.id,
        }
    }

    /// Source-path label for diagnostics inside this declaration.
    pub fn label(&self) -> String {
        match self {
            Decl::Let { name, .. } => format!("let {name}"),
            Decl::LetRec { bindings, .. } => {
                let names: Vec<&str> = bindings.iter().map(|b| b.name.as_str()).collect();
                format!("letrec {}", names.join(", "))
            }
            Decl::Expr(_) => "expression".to_string(),
        }
    }
}

/// A lowered program: declarations in order plus effect annotations that
/// the lowering pass attached to lambda nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub decls: Vec<Decl>,
    pub effect_annotations: BTreeMap<NodeId, Vec<String>>,
}

// ---------------------------------------------------------------------------
// Node construction
// ---------------------------------------------------------------------------

/// Hands out fresh node ids while building Core trees.
#[derive(Debug, Clone, Default)]
pub struct AstBuilder {
    next_id: u32,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn expr(&mut self, kind: ExprKind) -> Expr {
        Expr::new(self.fresh_id(), kind)
    }

    pub fn pattern(&mut self, kind: PatternKind) -> Pattern {
        Pattern {
            id: self.fresh_id(),
            kind,
        }
    }

    pub fn int(&mut self, n: i64) -> Expr {
        self.expr(ExprKind::Lit(Lit::Int(n)))
    }

    pub fn float(&mut self, n: f64) -> Expr {
        self.expr(ExprKind::Lit(Lit::Float(n)))
    }

    pub fn bool(&mut self, b: bool) -> Expr {
        self.expr(ExprKind::Lit(Lit::Bool(b)))
    }

    pub fn string(&mut self, s: &str) -> Expr {
        self.expr(ExprKind::Lit(Lit::String(s.to_string())))
    }

    pub fn unit(&mut self) -> Expr {
        self.expr(ExprKind::Lit(Lit::Unit))
    }

    pub fn var(&mut self, name: &str) -> Expr {
        self.expr(ExprKind::Var(name.to_string()))
    }

    pub fn lambda(&mut self, params: &[&str], body: Expr) -> Expr {
        self.expr(ExprKind::Lambda {
            params: params.iter().map(|p| p.to_string()).collect(),
            body: Box::new(body),
        })
    }

    pub fn app(&mut self, func: Expr, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::App {
            func: Box::new(func),
            args,
        })
    }

    pub fn call(&mut self, name: &str, args: Vec<Expr>) -> Expr {
        let func = self.var(name);
        self.app(func, args)
    }

    pub fn let_in(&mut self, name: &str, value: Expr, body: Expr) -> Expr {
        self.expr(ExprKind::Let {
            name: name.to_string(),
            value: Box::new(value),
            body: Box::new(body),
        })
    }

    pub fn let_rec(&mut self, bindings: Vec<(&str, Expr)>, body: Expr) -> Expr {
        self.expr(ExprKind::LetRec {
            bindings: bindings
                .into_iter()
                .map(|(name, value)| Binding {
                    name: name.to_string(),
                    value,
                })
                .collect(),
            body: Box::new(body),
        })
    }

    pub fn if_then_else(&mut self, condition: Expr, then_branch: Expr, else_branch: Expr) -> Expr {
        self.expr(ExprKind::If {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    pub fn binary(&mut self, op: BinOp, left: Expr, right: Expr) -> Expr {
        self.expr(ExprKind::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn unary(&mut self, op: UnaryOp, operand: Expr) -> Expr {
        self.expr(ExprKind::UnaryOp {
            op,
            operand: Box::new(operand),
        })
    }

    pub fn record(&mut self, fields: Vec<(&str, Expr)>) -> Expr {
        self.expr(ExprKind::Record(
            fields
                .into_iter()
                .map(|(name, e)| (name.to_string(), e))
                .collect(),
        ))
    }

    pub fn field(&mut self, record: Expr, field: &str) -> Expr {
        self.expr(ExprKind::Field {
            record: Box::new(record),
            field: field.to_string(),
        })
    }

    pub fn update(&mut self, record: Expr, fields: Vec<(&str, Expr)>) -> Expr {
        self.expr(ExprKind::Update {
            record: Box::new(record),
            fields: fields
                .into_iter()
                .map(|(name, e)| (name.to_string(), e))
                .collect(),
        })
    }

    pub fn list(&mut self, elems: Vec<Expr>) -> Expr {
        self.expr(ExprKind::List(elems))
    }

    pub fn tuple(&mut self, elems: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Tuple(elems))
    }

    pub fn match_on(&mut self, scrutinee: Expr, arms: Vec<(Pattern, Expr)>) -> Expr {
        self.expr(ExprKind::Match {
            scrutinee: Box::new(scrutinee),
            arms: arms
                .into_iter()
                .map(|(pattern, body)| MatchArm { pattern, body })
                .collect(),
        })
    }

    pub fn pvar(&mut self, name: &str) -> Pattern {
        self.pattern(PatternKind::Var(name.to_string()))
    }

    pub fn pwild(&mut self) -> Pattern {
        self.pattern(PatternKind::Wildcard)
    }
}

// ---------------------------------------------------------------------------
// Free variables
// ---------------------------------------------------------------------------

/// Variables referenced by `expr` that it does not bind itself.
pub fn free_vars(expr: &Expr) -> BTreeSet<String> {
    let mut free = BTreeSet::new();
    let mut bound = BTreeSet::new();
    collect_free_vars(expr, &mut free, &mut bound);
    free
}

fn collect_free_vars(expr: &Expr, free: &mut BTreeSet<String>, bound: &mut BTreeSet<String>) {
    match &expr.kind {
        ExprKind::Var(name) => {
            if !bound.contains(name) {
                free.insert(name.clone());
            }
        }
        ExprKind::Lit(_) => {}
        ExprKind::Lambda { params, body } => {
            let mut inner_bound = bound.clone();
            inner_bound.extend(params.iter().cloned());
            collect_free_vars(body, free, &mut inner_bound);
        }
        ExprKind::App { func, args } => {
            collect_free_vars(func, free, bound);
            for a in args {
                collect_free_vars(a, free, bound);
            }
        }
        ExprKind::Let { name, value, body } => {
            collect_free_vars(value, free, bound);
            let mut inner_bound = bound.clone();
            inner_bound.insert(name.clone());
            collect_free_vars(body, free, &mut inner_bound);
        }
        ExprKind::LetRec { bindings, body } => {
            let mut inner_bound = bound.clone();
            inner_bound.extend(bindings.iter().map(|b| b.name.clone()));
            for b in bindings {
                collect_free_vars(&b.value, free, &mut inner_bound);
            }
            collect_free_vars(body, free, &mut inner_bound);
        }
        ExprKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            collect_free_vars(condition, free, bound);
            collect_free_vars(then_branch, free, bound);
            collect_free_vars(else_branch, free, bound);
        }
        ExprKind::BinaryOp { left, right, .. } => {
            collect_free_vars(left, free, bound);
            collect_free_vars(right, free, bound);
        }
        ExprKind::UnaryOp { operand, .. } => collect_free_vars(operand, free, bound),
        ExprKind::Record(fields) => {
            for (_, e) in fields {
                collect_free_vars(e, free, bound);
            }
        }
        ExprKind::Field { record, .. } => collect_free_vars(record, free, bound),
        ExprKind::Update { record, fields } => {
            collect_free_vars(record, free, bound);
            for (_, e) in fields {
                collect_free_vars(e, free, bound);
            }
        }
        ExprKind::Tuple(exprs) | ExprKind::List(exprs) => {
            for e in exprs {
                collect_free_vars(e, free, bound);
            }
        }
        ExprKind::Match { scrutinee, arms } => {
            collect_free_vars(scrutinee, free, bound);
            for arm in arms {
                let mut arm_bound = bound.clone();
                collect_pattern_bindings(&arm.pattern, &mut arm_bound);
                collect_free_vars(&arm.body, free, &mut arm_bound);
            }
        }
    }
}

fn collect_pattern_bindings(pattern: &Pattern, bound: &mut BTreeSet<String>) {
    match &pattern.kind {
        PatternKind::Var(name) => {
            bound.insert(name.clone());
        }
        PatternKind::Wildcard | PatternKind::Lit(_) => {}
        PatternKind::Tuple(elems) => {
            for p in elems {
                collect_pattern_bindings(p, bound);
            }
        }
        PatternKind::List { elements, rest } => {
            for p in elements {
                collect_pattern_bindings(p, bound);
            }
            if let Some(rest) = rest {
                collect_pattern_bindings(rest, bound);
            }
        }
        PatternKind::Record { fields, .. } => {
            for (_, p) in fields {
                collect_pattern_bindings(p, bound);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn builder_assigns_distinct_ids() {
        let mut b = AstBuilder::new();
        let x = b.var("x");
        let one = b.int(1);
        let sum = b.binary(BinOp::Add, x, one);
        let ExprKind::BinaryOp { left, right, .. } = &sum.kind else {
            panic!("expected binary op");
        };
        assert_ne!(left.id, right.id);
        assert_ne!(sum.id, left.id);
    }

    #[test]
    fn free_vars_literal() {
        let mut b = AstBuilder::new();
        assert!(free_vars(&b.int(42)).is_empty());
    }

    #[test]
    fn free_vars_lambda_binds_params() {
        // \x. x + y: x is bound, y is free
        let mut b = AstBuilder::new();
        let x = b.var("x");
        let y = b.var("y");
        let body = b.binary(BinOp::Add, x, y);
        let lam = b.lambda(&["x"], body);
        assert_eq!(free_vars(&lam), names(&["y"]));
    }

    #[test]
    fn free_vars_let_scopes_body_only() {
        let mut b = AstBuilder::new();
        let value = b.var("x");
        let body = b.var("x");
        let e = b.let_in("x", value, body);
        assert_eq!(free_vars(&e), names(&["x"]));
    }

    #[test]
    fn free_vars_letrec_binds_group() {
        let mut b = AstBuilder::new();
        let even_call = b.call("odd", vec![]);
        let even = b.lambda(&[], even_call);
        let odd_call = b.call("even", vec![]);
        let odd = b.lambda(&[], odd_call);
        let body = b.call("even", vec![]);
        let e = b.let_rec(vec![("even", even), ("odd", odd)], body);
        assert!(free_vars(&e).is_empty());
    }

    #[test]
    fn free_vars_match_arm_bindings() {
        let mut b = AstBuilder::new();
        let scrutinee = b.var("pair");
        let pa = b.pvar("a");
        let pw = b.pwild();
        let pat = b.pattern(PatternKind::Tuple(vec![pa, pw]));
        let body = b.var("a");
        let m = b.match_on(scrutinee, vec![(pat, body)]);
        assert_eq!(free_vars(&m), names(&["pair"]));
    }

    #[test]
    fn syntactic_values() {
        let mut b = AstBuilder::new();
        let one = b.int(1);
        let body = b.var("x");
        let lam = b.lambda(&["x"], body);
        let tuple = b.tuple(vec![one, lam]);
        assert!(tuple.is_syntactic_value());

        let call = b.call("f", vec![]);
        assert!(!call.is_syntactic_value());
        let v = b.var("y");
        assert!(!v.is_syntactic_value());
        let list = b.list(vec![call]);
        assert!(!list.is_syntactic_value());
    }

    #[test]
    fn decl_labels() {
        let mut b = AstBuilder::new();
        let value = b.int(1);
        let id = b.fresh_id();
        let decl = Decl::Let {
            id,
            name: "main".to_string(),
            value,
        };
        assert_eq!(decl.label(), "let main");
        assert_eq!(decl.id(), id);
    }
}
