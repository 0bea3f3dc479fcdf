//! Type representations for Sable.
//!
//! This crate defines the semantic types used by the inference engine:
//! kinds, types, labeled rows (shared by records and effects), type
//! schemes, and substitutions. Type variables and row variables live in
//! separate namespaces and can never be confused for one another.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique identifier for a type variable during inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeVarId(pub u32);

/// Unique identifier for a row variable during inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowVarId(pub u32);

/// A record field name or an effect name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub String);

impl Label {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// Kinds classify types. Value types are `Star`; rows are `Row(k)` where
/// `k` is the kind of their labels (`Effect` or `Record`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Star,
    Effect,
    Record,
    Row(Box<Kind>),
}

impl Kind {
    pub fn effect_row() -> Self {
        Kind::Row(Box::new(Kind::Effect))
    }

    pub fn record_row() -> Self {
        Kind::Row(Box::new(Kind::Record))
    }

    pub fn is_row(&self) -> bool {
        matches!(self, Kind::Row(_))
    }

    pub fn is_effect_row(&self) -> bool {
        matches!(self, Kind::Row(inner) if **inner == Kind::Effect)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Star => write!(f, "*"),
            Kind::Effect => write!(f, "Effect"),
            Kind::Record => write!(f, "Record"),
            Kind::Row(inner) => write!(f, "Row({inner})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

pub const INT: &str = "Int";
pub const FLOAT: &str = "Float";
pub const STRING: &str = "String";
pub const BOOL: &str = "Bool";
pub const UNIT: &str = "Unit";
pub const BYTES: &str = "Bytes";

/// A type variable together with its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeVar {
    pub id: TypeVarId,
    pub kind: Kind,
}

impl TypeVar {
    pub fn star(id: TypeVarId) -> Self {
        Self {
            id,
            kind: Kind::Star,
        }
    }
}

/// A semantic type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Var(TypeVar),
    /// Ground nullary constructor: `Int`, `Float`, `String`, ...
    Con(String),
    App(Box<Type>, Vec<Type>),
    List(Box<Type>),
    Tuple(Vec<Type>),
    Function(FunctionType),
    /// Row-based record.
    Record(Row),
}

/// A function type with its latent effect row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub params: Vec<Type>,
    pub effects: EffectRow,
    pub ret: Box<Type>,
}

impl Type {
    pub fn var(id: TypeVarId) -> Self {
        Type::Var(TypeVar::star(id))
    }

    pub fn con(name: impl Into<String>) -> Self {
        Type::Con(name.into())
    }

    pub fn int() -> Self {
        Type::con(INT)
    }

    pub fn float() -> Self {
        Type::con(FLOAT)
    }

    pub fn string() -> Self {
        Type::con(STRING)
    }

    pub fn bool() -> Self {
        Type::con(BOOL)
    }

    pub fn unit() -> Self {
        Type::con(UNIT)
    }

    pub fn bytes() -> Self {
        Type::con(BYTES)
    }

    pub fn list(elem: Type) -> Self {
        Type::List(Box::new(elem))
    }

    pub fn function(params: Vec<Type>, effects: EffectRow, ret: Type) -> Self {
        Type::Function(FunctionType {
            params,
            effects,
            ret: Box::new(ret),
        })
    }

    pub fn pure_function(params: Vec<Type>, ret: Type) -> Self {
        Type::function(params, EffectRow::pure(), ret)
    }

    pub fn kind(&self) -> Kind {
        match self {
            Type::Var(v) => v.kind.clone(),
            _ => Kind::Star,
        }
    }

    pub fn is_con(&self, name: &str) -> bool {
        matches!(self, Type::Con(n) if n == name)
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Type::Var(_))
    }

    /// Encode a record with the positional legacy representation:
    /// `App(Con("Record{a,b}"), [τa, τb])`, labels in sorted order.
    pub fn legacy_record(fields: &BTreeMap<Label, Type>) -> Self {
        let names: Vec<&str> = fields.keys().map(Label::as_str).collect();
        Type::App(
            Box::new(Type::Con(format!("Record{{{}}}", names.join(",")))),
            fields.values().cloned().collect(),
        )
    }

    /// Labels of a legacy-encoded record, or `None` for any other type.
    pub fn legacy_record_labels(&self) -> Option<Vec<Label>> {
        let Type::App(head, _) = self else {
            return None;
        };
        let Type::Con(name) = head.as_ref() else {
            return None;
        };
        let inner = name.strip_prefix("Record{")?.strip_suffix('}')?;
        if inner.is_empty() {
            return Some(Vec::new());
        }
        Some(inner.split(',').map(Label::from).collect())
    }
}

/// Canonical head name used to key instances: `Int`, `List`, `Tuple`, ...
///
/// Returns `None` for a bare variable.
pub fn type_head(ty: &Type) -> Option<String> {
    match ty {
        Type::Var(_) => None,
        Type::Con(name) => Some(name.clone()),
        Type::App(head, _) => type_head(head),
        Type::List(_) => Some("List".to_string()),
        Type::Tuple(_) => Some("Tuple".to_string()),
        Type::Function(_) => Some("Function".to_string()),
        Type::Record(_) => Some("Record".to_string()),
    }
}

/// Immediate type arguments, as seen by instance contexts.
pub fn type_arguments(ty: &Type) -> Vec<&Type> {
    match ty {
        Type::App(_, args) | Type::Tuple(args) => args.iter().collect(),
        Type::List(elem) => vec![elem.as_ref()],
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A labeled row, closed when `rest` is `None`.
///
/// `kind` is the kind of the row itself: `Row(Record)` or `Row(Effect)`.
/// Effect rows map each label to `Unit`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Row {
    pub kind: Kind,
    pub fields: BTreeMap<Label, Type>,
    pub rest: Option<RowVarId>,
}

impl Row {
    pub fn closed_record(fields: impl IntoIterator<Item = (Label, Type)>) -> Self {
        Self {
            kind: Kind::record_row(),
            fields: fields.into_iter().collect(),
            rest: None,
        }
    }

    pub fn open_record(fields: impl IntoIterator<Item = (Label, Type)>, rest: RowVarId) -> Self {
        Self {
            kind: Kind::record_row(),
            fields: fields.into_iter().collect(),
            rest: Some(rest),
        }
    }

    pub fn closed_effects(labels: impl IntoIterator<Item = Label>) -> Self {
        Self {
            kind: Kind::effect_row(),
            fields: labels.into_iter().map(|l| (l, Type::unit())).collect(),
            rest: None,
        }
    }

    pub fn open_effects(labels: impl IntoIterator<Item = Label>, rest: RowVarId) -> Self {
        Self {
            rest: Some(rest),
            ..Self::closed_effects(labels)
        }
    }

    /// A row of the same kind with the given fields and tail.
    pub fn with_kind_of(&self, fields: BTreeMap<Label, Type>, rest: Option<RowVarId>) -> Self {
        Self {
            kind: self.kind.clone(),
            fields,
            rest,
        }
    }

    pub fn is_open(&self) -> bool {
        self.rest.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.rest.is_none()
    }

    pub fn is_effect(&self) -> bool {
        self.kind.is_effect_row()
    }

    pub fn get(&self, label: &Label) -> Option<&Type> {
        self.fields.get(label)
    }

    pub fn has(&self, label: &Label) -> bool {
        self.fields.contains_key(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &Label> {
        self.fields.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A function's latent effects. `row: None` is the purity sentinel, which
/// is distinct from an empty but effectful closed row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct EffectRow {
    pub row: Option<Row>,
}

impl EffectRow {
    pub fn pure() -> Self {
        Self { row: None }
    }

    pub fn closed(labels: impl IntoIterator<Item = Label>) -> Self {
        Self {
            row: Some(Row::closed_effects(labels)),
        }
    }

    pub fn open(labels: impl IntoIterator<Item = Label>, rest: RowVarId) -> Self {
        Self {
            row: Some(Row::open_effects(labels, rest)),
        }
    }

    pub fn from_row(row: Row) -> Self {
        Self { row: Some(row) }
    }

    pub fn is_pure(&self) -> bool {
        self.row.is_none()
    }

    /// The row view used by unification: purity is the empty closed row.
    pub fn to_row(&self) -> Row {
        self.row
            .clone()
            .unwrap_or_else(|| Row::closed_effects(std::iter::empty()))
    }

    pub fn labels(&self) -> BTreeSet<Label> {
        self.row
            .as_ref()
            .map(|r| r.fields.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn tail(&self) -> Option<RowVarId> {
        self.row.as_ref().and_then(|r| r.rest)
    }

    pub fn has(&self, label: &str) -> bool {
        self.row
            .as_ref()
            .is_some_and(|r| r.fields.contains_key(&Label::from(label)))
    }
}

// ---------------------------------------------------------------------------
// Type schemes (forall-quantified types)
// ---------------------------------------------------------------------------

/// A class predicate carried by a scheme, e.g. `Num a`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Predicate {
    pub class_name: String,
    pub ty: Type,
}

/// A type scheme: `forall a b r. C a => T`.
///
/// Schemes arise from let-generalization. Each use of a polymorphic
/// binding instantiates the scheme with fresh variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeScheme {
    pub type_vars: Vec<TypeVar>,
    pub row_vars: Vec<RowVarId>,
    pub predicates: Vec<Predicate>,
    pub ty: Type,
}

impl TypeScheme {
    /// A monomorphic scheme (no quantified variables).
    pub fn mono(ty: Type) -> Self {
        Self {
            type_vars: Vec::new(),
            row_vars: Vec::new(),
            predicates: Vec::new(),
            ty,
        }
    }

    pub fn is_mono(&self) -> bool {
        self.type_vars.is_empty() && self.row_vars.is_empty()
    }

    /// Type variables free in the scheme (not quantified).
    pub fn free_type_vars(&self) -> BTreeSet<TypeVarId> {
        let mut vars = free_type_vars(&self.ty);
        for pred in &self.predicates {
            vars.extend(free_type_vars(&pred.ty));
        }
        for tv in &self.type_vars {
            vars.remove(&tv.id);
        }
        vars
    }

    /// Row variables free in the scheme (not quantified).
    pub fn free_row_vars(&self) -> BTreeSet<RowVarId> {
        let mut vars = free_row_vars(&self.ty);
        for rv in &self.row_vars {
            vars.remove(rv);
        }
        vars
    }
}

// ---------------------------------------------------------------------------
// Free variable computation
// ---------------------------------------------------------------------------

/// Collect all free type variables in a type.
pub fn free_type_vars(ty: &Type) -> BTreeSet<TypeVarId> {
    let mut vars = BTreeSet::new();
    collect_free_type_vars(ty, &mut vars);
    vars
}

fn collect_free_type_vars(ty: &Type, vars: &mut BTreeSet<TypeVarId>) {
    match ty {
        Type::Var(v) => {
            vars.insert(v.id);
        }
        Type::Con(_) => {}
        Type::App(head, args) => {
            collect_free_type_vars(head, vars);
            for arg in args {
                collect_free_type_vars(arg, vars);
            }
        }
        Type::List(inner) => collect_free_type_vars(inner, vars),
        Type::Tuple(elems) => {
            for elem in elems {
                collect_free_type_vars(elem, vars);
            }
        }
        Type::Function(ft) => {
            for param in &ft.params {
                collect_free_type_vars(param, vars);
            }
            if let Some(row) = &ft.effects.row {
                collect_row_type_vars(row, vars);
            }
            collect_free_type_vars(&ft.ret, vars);
        }
        Type::Record(row) => collect_row_type_vars(row, vars),
    }
}

fn collect_row_type_vars(row: &Row, vars: &mut BTreeSet<TypeVarId>) {
    for ty in row.fields.values() {
        collect_free_type_vars(ty, vars);
    }
}

/// Collect all free row variables in a type, including effect-row tails.
pub fn free_row_vars(ty: &Type) -> BTreeSet<RowVarId> {
    let mut vars = BTreeSet::new();
    collect_free_row_vars(ty, &mut vars);
    vars
}

fn collect_free_row_vars(ty: &Type, vars: &mut BTreeSet<RowVarId>) {
    match ty {
        Type::Var(_) | Type::Con(_) => {}
        Type::App(head, args) => {
            collect_free_row_vars(head, vars);
            for arg in args {
                collect_free_row_vars(arg, vars);
            }
        }
        Type::List(inner) => collect_free_row_vars(inner, vars),
        Type::Tuple(elems) => {
            for elem in elems {
                collect_free_row_vars(elem, vars);
            }
        }
        Type::Function(ft) => {
            for param in &ft.params {
                collect_free_row_vars(param, vars);
            }
            if let Some(row) = &ft.effects.row {
                collect_row_row_vars(row, vars);
            }
            collect_free_row_vars(&ft.ret, vars);
        }
        Type::Record(row) => collect_row_row_vars(row, vars),
    }
}

fn collect_row_row_vars(row: &Row, vars: &mut BTreeSet<RowVarId>) {
    for ty in row.fields.values() {
        collect_free_row_vars(ty, vars);
    }
    if let Some(rest) = row.rest {
        vars.insert(rest);
    }
}

/// Row variables free in a row, including its own tail.
pub fn row_free_row_vars(row: &Row) -> BTreeSet<RowVarId> {
    let mut vars = BTreeSet::new();
    collect_row_row_vars(row, &mut vars);
    vars
}

/// Type variables free in a row's field types.
pub fn row_free_type_vars(row: &Row) -> BTreeSet<TypeVarId> {
    let mut vars = BTreeSet::new();
    collect_row_type_vars(row, &mut vars);
    vars
}

/// A type with no free type or row variables.
pub fn is_ground(ty: &Type) -> bool {
    free_type_vars(ty).is_empty() && free_row_vars(ty).is_empty()
}

/// Free type variables together with their kinds.
pub fn free_type_var_kinds(ty: &Type) -> BTreeMap<TypeVarId, Kind> {
    let mut kinds = BTreeMap::new();
    collect_kinds(ty, &mut kinds, &mut BTreeMap::new());
    kinds
}

/// Free row variables together with the kind of the row they end.
pub fn free_row_var_kinds(ty: &Type) -> BTreeMap<RowVarId, Kind> {
    let mut kinds = BTreeMap::new();
    collect_kinds(ty, &mut BTreeMap::new(), &mut kinds);
    kinds
}

fn collect_row_kinds(
    row: &Row,
    types: &mut BTreeMap<TypeVarId, Kind>,
    rows: &mut BTreeMap<RowVarId, Kind>,
) {
    for field in row.fields.values() {
        collect_kinds(field, types, rows);
    }
    if let Some(rest) = row.rest {
        rows.insert(rest, row.kind.clone());
    }
}

fn collect_kinds(
    ty: &Type,
    types: &mut BTreeMap<TypeVarId, Kind>,
    rows: &mut BTreeMap<RowVarId, Kind>,
) {
    match ty {
        Type::Var(v) => {
            types.insert(v.id, v.kind.clone());
        }
        Type::Con(_) => {}
        Type::App(head, args) => {
            collect_kinds(head, types, rows);
            for arg in args {
                collect_kinds(arg, types, rows);
            }
        }
        Type::List(inner) => collect_kinds(inner, types, rows),
        Type::Tuple(elems) => {
            for elem in elems {
                collect_kinds(elem, types, rows);
            }
        }
        Type::Function(ft) => {
            for param in &ft.params {
                collect_kinds(param, types, rows);
            }
            if let Some(row) = &ft.effects.row {
                collect_row_kinds(row, types, rows);
            }
            collect_kinds(&ft.ret, types, rows);
        }
        Type::Record(row) => collect_row_kinds(row, types, rows),
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

/// Display names for variables. Unnamed variables fall back to their ids.
#[derive(Debug, Clone, Default)]
struct VarNames {
    types: BTreeMap<TypeVarId, String>,
    rows: BTreeMap<RowVarId, String>,
}

impl VarNames {
    fn for_types<'a>(types: impl IntoIterator<Item = &'a Type>) -> Self {
        let mut type_vars = BTreeSet::new();
        let mut row_vars = BTreeSet::new();
        for ty in types {
            type_vars.extend(free_type_vars(ty));
            row_vars.extend(free_row_vars(ty));
        }
        Self {
            types: type_vars
                .into_iter()
                .enumerate()
                .map(|(i, v)| (v, alphabetic_var_name(i)))
                .collect(),
            rows: row_vars
                .into_iter()
                .enumerate()
                .map(|(i, v)| (v, alphabetic_var_name(i)))
                .collect(),
        }
    }
}

fn alphabetic_var_name(index: usize) -> String {
    let letter = (b'a' + (index % 26) as u8) as char;
    let suffix = index / 26;
    if suffix == 0 {
        letter.to_string()
    } else {
        format!("{letter}{suffix}")
    }
}

fn write_type(f: &mut fmt::Formatter<'_>, ty: &Type, names: &VarNames) -> fmt::Result {
    match ty {
        Type::Var(v) => match names.types.get(&v.id) {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "t{}", v.id.0),
        },
        Type::Con(name) => write!(f, "{name}"),
        Type::App(head, args) => {
            write_type(f, head, names)?;
            write!(f, "(")?;
            write_list(f, args, names)?;
            write!(f, ")")
        }
        Type::List(inner) => {
            write!(f, "List(")?;
            write_type(f, inner, names)?;
            write!(f, ")")
        }
        Type::Tuple(elems) => {
            write!(f, "#(")?;
            write_list(f, elems, names)?;
            write!(f, ")")
        }
        Type::Function(ft) => {
            write!(f, "(")?;
            write_list(f, &ft.params, names)?;
            match &ft.effects.row {
                Some(row) if !(row.is_empty() && row.is_closed()) => {
                    write!(f, ") -")?;
                    write_effects(f, row, names)?;
                    write!(f, "> ")?;
                }
                _ => write!(f, ") -> ")?,
            }
            write_type(f, &ft.ret, names)
        }
        Type::Record(row) => {
            if row.is_empty() && row.is_closed() {
                return write!(f, "{{}}");
            }
            write!(f, "{{ ")?;
            for (i, (label, ty)) in row.fields.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{label}: ")?;
                write_type(f, ty, names)?;
            }
            write_tail(f, row, names)?;
            write!(f, " }}")
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, types: &[Type], names: &VarNames) -> fmt::Result {
    for (i, ty) in types.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write_type(f, ty, names)?;
    }
    Ok(())
}

fn write_effects(f: &mut fmt::Formatter<'_>, row: &Row, names: &VarNames) -> fmt::Result {
    write!(f, "[")?;
    for (i, label) in row.fields.keys().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{label}")?;
    }
    write_tail(f, row, names)?;
    write!(f, "]")
}

fn write_tail(f: &mut fmt::Formatter<'_>, row: &Row, names: &VarNames) -> fmt::Result {
    let Some(rest) = row.rest else {
        return Ok(());
    };
    if !row.fields.is_empty() {
        write!(f, " | ")?;
    }
    let prefix = if row.is_effect() { 'e' } else { 'r' };
    match names.rows.get(&rest) {
        Some(name) => write!(f, "{prefix}{name}"),
        None => write!(f, "{prefix}{}", rest.0),
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_type(f, self, &VarNames::default())
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_effect() {
            write_effects(f, self, &VarNames::default())
        } else {
            write_type(f, &Type::Record(self.clone()), &VarNames::default())
        }
    }
}

impl fmt::Display for EffectRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.row {
            None => write!(f, "pure"),
            Some(row) => write_effects(f, row, &VarNames::default()),
        }
    }
}

impl fmt::Display for TypeScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = VarNames::default();
        for (i, tv) in self.type_vars.iter().enumerate() {
            names.types.insert(tv.id, alphabetic_var_name(i));
        }
        for (i, rv) in self.row_vars.iter().enumerate() {
            names.rows.insert(*rv, alphabetic_var_name(i));
        }
        if !self.type_vars.is_empty() {
            let quantified: Vec<&str> = self
                .type_vars
                .iter()
                .filter_map(|tv| names.types.get(&tv.id).map(String::as_str))
                .collect();
            write!(f, "forall {}. ", quantified.join(" "))?;
        }
        if !self.predicates.is_empty() {
            for (i, pred) in self.predicates.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{} ", pred.class_name)?;
                write_type(f, &pred.ty, &names)?;
            }
            write!(f, " => ")?;
        }
        write_type(f, &self.ty, &names)
    }
}

struct Sanitized<'a> {
    ty: &'a Type,
    names: &'a VarNames,
}

impl fmt::Display for Sanitized<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_type(f, self.ty, self.names)
    }
}

/// Display a type with variables renamed to `a`, `b`, ... and row tails to
/// `ra`/`ea`, ... so that inference counters never reach user output.
pub fn sanitize_type_display(ty: &Type) -> String {
    let names = VarNames::for_types([ty]);
    Sanitized { ty, names: &names }.to_string()
}

/// Display two types with one shared variable namespace.
///
/// The same source variable appears with the same name on both sides of a
/// mismatch message.
pub fn sanitize_type_pair_display(left: &Type, right: &Type) -> (String, String) {
    let names = VarNames::for_types([left, right]);
    (
        Sanitized { ty: left, names: &names }.to_string(),
        Sanitized {
            ty: right,
            names: &names,
        }
        .to_string(),
    )
}

// ---------------------------------------------------------------------------
// Substitution
// ---------------------------------------------------------------------------

/// A finite mapping from type variables to types and row variables to rows.
///
/// Bindings may refer to other bound variables; `apply` chases them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitution {
    type_map: BTreeMap<TypeVarId, Type>,
    row_map: BTreeMap<RowVarId, Row>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_type(&mut self, var: TypeVarId, ty: Type) {
        self.type_map.insert(var, ty);
    }

    pub fn bind_row(&mut self, var: RowVarId, row: Row) {
        self.row_map.insert(var, row);
    }

    pub fn lookup_type(&self, var: TypeVarId) -> Option<&Type> {
        self.type_map.get(&var)
    }

    pub fn lookup_row(&self, var: RowVarId) -> Option<&Row> {
        self.row_map.get(&var)
    }

    pub fn type_bindings(&self) -> &BTreeMap<TypeVarId, Type> {
        &self.type_map
    }

    pub fn row_bindings(&self) -> &BTreeMap<RowVarId, Row> {
        &self.row_map
    }

    pub fn is_empty(&self) -> bool {
        self.type_map.is_empty() && self.row_map.is_empty()
    }

    /// Apply this substitution to a type, replacing all bound variables.
    pub fn apply(&self, ty: &Type) -> Type {
        match ty {
            Type::Var(v) => match self.lookup_type(v.id) {
                Some(resolved) => self.apply(resolved),
                None => ty.clone(),
            },
            Type::Con(_) => ty.clone(),
            Type::App(head, args) => Type::App(
                Box::new(self.apply(head)),
                args.iter().map(|a| self.apply(a)).collect(),
            ),
            Type::List(inner) => Type::List(Box::new(self.apply(inner))),
            Type::Tuple(elems) => Type::Tuple(elems.iter().map(|t| self.apply(t)).collect()),
            Type::Function(ft) => Type::Function(FunctionType {
                params: ft.params.iter().map(|t| self.apply(t)).collect(),
                effects: self.apply_effect_row(&ft.effects),
                ret: Box::new(self.apply(&ft.ret)),
            }),
            Type::Record(row) => Type::Record(self.apply_row(row)),
        }
    }

    /// Apply this substitution to a row type.
    pub fn apply_row(&self, row: &Row) -> Row {
        let fields: BTreeMap<Label, Type> = row
            .fields
            .iter()
            .map(|(l, t)| (l.clone(), self.apply(t)))
            .collect();

        match row.rest {
            None => row.with_kind_of(fields, None),
            Some(var) => match self.lookup_row(var) {
                Some(resolved) => {
                    // Merge the resolved row's fields with our known fields.
                    let resolved = self.apply_row(resolved);
                    let mut all_fields = fields;
                    all_fields.extend(resolved.fields);
                    row.with_kind_of(all_fields, resolved.rest)
                }
                None => row.with_kind_of(fields, Some(var)),
            },
        }
    }

    pub fn apply_effect_row(&self, effects: &EffectRow) -> EffectRow {
        EffectRow {
            row: effects.row.as_ref().map(|r| self.apply_row(r)),
        }
    }

    /// Apply to the free part of a scheme, leaving quantified variables alone.
    pub fn apply_scheme(&self, scheme: &TypeScheme) -> TypeScheme {
        let mut shadowed = self.clone();
        for tv in &scheme.type_vars {
            shadowed.type_map.remove(&tv.id);
        }
        for rv in &scheme.row_vars {
            shadowed.row_map.remove(rv);
        }
        TypeScheme {
            type_vars: scheme.type_vars.clone(),
            row_vars: scheme.row_vars.clone(),
            predicates: scheme
                .predicates
                .iter()
                .map(|p| Predicate {
                    class_name: p.class_name.clone(),
                    ty: shadowed.apply(&p.ty),
                })
                .collect(),
            ty: shadowed.apply(&scheme.ty),
        }
    }

    /// `self` then `other`: `other` is applied to the codomain of `self`
    /// before the two maps are merged. Bindings in `self` win on overlap.
    pub fn compose(&self, other: &Substitution) -> Substitution {
        let mut type_map: BTreeMap<TypeVarId, Type> = self
            .type_map
            .iter()
            .map(|(v, t)| (*v, other.apply(t)))
            .collect();
        let mut row_map: BTreeMap<RowVarId, Row> = self
            .row_map
            .iter()
            .map(|(v, r)| (*v, other.apply_row(r)))
            .collect();
        for (v, t) in &other.type_map {
            type_map.entry(*v).or_insert_with(|| t.clone());
        }
        for (v, r) in &other.row_map {
            row_map.entry(*v).or_insert_with(|| r.clone());
        }
        Substitution { type_map, row_map }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tv(n: u32) -> Type {
        Type::var(TypeVarId(n))
    }

    #[test]
    fn row_closed_record_sorts_labels() {
        let row = Row::closed_record([
            (Label::new("y"), Type::bool()),
            (Label::new("x"), Type::int()),
        ]);
        let labels: Vec<&str> = row.labels().map(Label::as_str).collect();
        assert_eq!(labels, vec!["x", "y"]);
        assert!(row.is_closed());
        assert_eq!(row.kind, Kind::record_row());
    }

    #[test]
    fn effect_rows_distinguish_pure_from_empty() {
        let pure = EffectRow::pure();
        let empty = EffectRow::closed(std::iter::empty());
        assert!(pure.is_pure());
        assert!(!empty.is_pure());
        assert_ne!(pure, empty);
        assert_eq!(pure.to_row(), empty.to_row());
    }

    #[test]
    fn kinds_are_structural() {
        assert_eq!(Kind::effect_row(), Kind::Row(Box::new(Kind::Effect)));
        assert_ne!(Kind::effect_row(), Kind::record_row());
        assert_eq!(Type::int().kind(), Kind::Star);
        assert_eq!(Kind::effect_row().to_string(), "Row(Effect)");
    }

    #[test]
    fn substitution_apply_chases_bindings() {
        let mut s = Substitution::new();
        s.bind_type(TypeVarId(0), tv(1));
        s.bind_type(TypeVarId(1), Type::int());
        assert_eq!(s.apply(&Type::list(tv(0))), Type::list(Type::int()));
    }

    #[test]
    fn substitution_apply_row_merges_tail() {
        let mut s = Substitution::new();
        s.bind_row(
            RowVarId(0),
            Row::open_record([(Label::new("b"), Type::bool())], RowVarId(1)),
        );
        let row = Row::open_record([(Label::new("a"), Type::int())], RowVarId(0));
        let applied = s.apply_row(&row);
        assert!(applied.has(&Label::new("a")));
        assert!(applied.has(&Label::new("b")));
        assert_eq!(applied.rest, Some(RowVarId(1)));
        assert_eq!(applied.kind, Kind::record_row());
    }

    #[test]
    fn substitution_apply_effect_row_keeps_sentinel() {
        let mut s = Substitution::new();
        s.bind_row(RowVarId(0), Row::closed_effects([Label::new("IO")]));
        assert!(s.apply_effect_row(&EffectRow::pure()).is_pure());
        let applied = s.apply_effect_row(&EffectRow::open([], RowVarId(0)));
        assert!(applied.has("IO"));
        assert_eq!(applied.tail(), None);
    }

    #[test]
    fn compose_applies_second_to_first_codomain() {
        let mut first = Substitution::new();
        first.bind_type(TypeVarId(0), Type::list(tv(1)));
        let mut second = Substitution::new();
        second.bind_type(TypeVarId(1), Type::float());

        let composed = first.compose(&second);
        assert_eq!(
            composed.lookup_type(TypeVarId(0)),
            Some(&Type::list(Type::float()))
        );
        assert_eq!(composed.lookup_type(TypeVarId(1)), Some(&Type::float()));
    }

    #[test]
    fn apply_scheme_skips_quantified_vars() {
        let scheme = TypeScheme {
            type_vars: vec![TypeVar::star(TypeVarId(0))],
            row_vars: vec![],
            predicates: vec![],
            ty: Type::pure_function(vec![tv(0)], tv(1)),
        };
        let mut s = Substitution::new();
        s.bind_type(TypeVarId(0), Type::int());
        s.bind_type(TypeVarId(1), Type::bool());
        let applied = s.apply_scheme(&scheme);
        assert_eq!(applied.ty, Type::pure_function(vec![tv(0)], Type::bool()));
    }

    #[test]
    fn free_vars_cover_effect_tails() {
        let ty = Type::function(
            vec![tv(3)],
            EffectRow::open([Label::new("IO")], RowVarId(7)),
            Type::Record(Row::open_record([(Label::new("x"), tv(4))], RowVarId(8))),
        );
        assert_eq!(
            free_type_vars(&ty),
            [TypeVarId(3), TypeVarId(4)].into_iter().collect()
        );
        assert_eq!(
            free_row_vars(&ty),
            [RowVarId(7), RowVarId(8)].into_iter().collect()
        );
        assert!(!is_ground(&ty));
        assert!(is_ground(&Type::list(Type::int())));
    }

    #[test]
    fn var_kinds_follow_rows() {
        let ty = Type::function(
            vec![tv(1)],
            EffectRow::open([], RowVarId(2)),
            Type::Record(Row::open_record([], RowVarId(3))),
        );
        let rows = free_row_var_kinds(&ty);
        assert_eq!(rows.get(&RowVarId(2)), Some(&Kind::effect_row()));
        assert_eq!(rows.get(&RowVarId(3)), Some(&Kind::record_row()));
        assert_eq!(free_type_var_kinds(&ty).get(&TypeVarId(1)), Some(&Kind::Star));
    }

    #[test]
    fn type_heads_normalize_constructors() {
        assert_eq!(type_head(&Type::int()).as_deref(), Some("Int"));
        assert_eq!(type_head(&Type::list(tv(0))).as_deref(), Some("List"));
        assert_eq!(
            type_head(&Type::Tuple(vec![Type::int(), Type::bool()])).as_deref(),
            Some("Tuple")
        );
        assert_eq!(type_head(&tv(0)), None);
    }

    #[test]
    fn legacy_record_labels_round_trip() {
        let fields: BTreeMap<Label, Type> = [
            (Label::new("name"), Type::string()),
            (Label::new("age"), Type::int()),
        ]
        .into_iter()
        .collect();
        let legacy = Type::legacy_record(&fields);
        assert_eq!(legacy.to_string(), "Record{age,name}(Int, String)");
        assert_eq!(
            legacy.legacy_record_labels(),
            Some(vec![Label::new("age"), Label::new("name")])
        );
        assert_eq!(Type::int().legacy_record_labels(), None);
    }

    #[test]
    fn display_types() {
        let f = Type::function(
            vec![Type::int()],
            EffectRow::closed([Label::new("Net"), Label::new("IO")]),
            Type::unit(),
        );
        assert_eq!(f.to_string(), "(Int) -[IO, Net]> Unit");
        assert_eq!(
            Type::pure_function(vec![Type::int()], Type::int()).to_string(),
            "(Int) -> Int"
        );
        let rec = Type::Record(Row::open_record([(Label::new("x"), Type::int())], RowVarId(2)));
        assert_eq!(rec.to_string(), "{ x: Int | r2 }");
        assert_eq!(Type::Record(Row::closed_record([])).to_string(), "{}");
    }

    #[test]
    fn sanitized_display_hides_counters() {
        let ty = Type::function(vec![tv(41)], EffectRow::open([], RowVarId(9)), tv(40));
        assert_eq!(sanitize_type_display(&ty), "(b) -[ea]> a");

        let (left, right) = sanitize_type_pair_display(&tv(12), &Type::list(tv(12)));
        assert_eq!(left, "a");
        assert_eq!(right, "List(a)");
    }

    #[test]
    fn scheme_display_names_quantifiers() {
        let scheme = TypeScheme {
            type_vars: vec![TypeVar::star(TypeVarId(5))],
            row_vars: vec![],
            predicates: vec![Predicate {
                class_name: "Num".to_string(),
                ty: tv(5),
            }],
            ty: Type::pure_function(vec![tv(5)], tv(5)),
        };
        assert_eq!(scheme.to_string(), "forall a. Num a => (a) -> a");
        assert!(!scheme.is_mono());
        assert!(scheme.free_type_vars().is_empty());
    }
}
