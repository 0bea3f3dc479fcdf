//! The effect-row algebra: elaboration of effect annotations, union, and
//! subsumption.
//!
//! `EffectRow::pure()` (no row at all) is the purity sentinel and is kept
//! distinct from the empty closed row, which is effectful but performs no
//! named effect.

use std::collections::BTreeSet;

use sable_diag::{Category, Diagnostic};
use sable_types::{EffectRow, Label, Row};

/// The closed effect vocabulary.
pub const KNOWN_EFFECTS: &[&str] = &["IO", "FS", "Net", "Clock", "Rand", "DB", "Trace", "Async"];

pub fn is_known_effect(name: &str) -> bool {
    KNOWN_EFFECTS.contains(&name)
}

/// Elaborate a list of effect names into a closed effect row.
///
/// The empty list is the purity sentinel. Names are sorted and deduplicated;
/// any name outside `KNOWN_EFFECTS` is rejected.
pub fn elaborate_effect_row<S: AsRef<str>>(names: &[S]) -> Result<EffectRow, Diagnostic> {
    if names.is_empty() {
        return Ok(EffectRow::pure());
    }
    let mut labels = BTreeSet::new();
    for name in names {
        let name = name.as_ref();
        if !is_known_effect(name) {
            return Err(Diagnostic::error(
                Category::UnknownEffect,
                format!("unknown effect `{name}`"),
            )
            .with_help(format!("known effects are {}", KNOWN_EFFECTS.join(", "))));
        }
        labels.insert(Label::new(name));
    }
    Ok(EffectRow::closed(labels))
}

/// Union of two effect rows.
///
/// Purity is the identity. Labels are unioned; the result is open when
/// either side is open. When both sides are open the smaller tail id is
/// kept, which makes the operation commutative; callers that need the two
/// tails to agree must unify them separately.
pub fn union_effect_rows(a: &EffectRow, b: &EffectRow) -> EffectRow {
    let (ra, rb) = match (&a.row, &b.row) {
        (None, _) => return b.clone(),
        (_, None) => return a.clone(),
        (Some(ra), Some(rb)) => (ra, rb),
    };
    let mut fields = ra.fields.clone();
    fields.extend(rb.fields.iter().map(|(l, t)| (l.clone(), t.clone())));
    let rest = match (ra.rest, rb.rest) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, y) => x.or(y),
    };
    EffectRow::from_row(Row {
        kind: ra.kind.clone(),
        fields,
        rest,
    })
}

/// Whether every effect of `a` is permitted by `b`.
///
/// Purity is subsumed by anything; only purity is subsumed by purity. An
/// open `b` admits anything; otherwise `a` must be closed with labels that
/// are a subset of `b`'s.
pub fn subsume_effect_rows(a: &EffectRow, b: &EffectRow) -> bool {
    let Some(ra) = &a.row else {
        return true;
    };
    let Some(rb) = &b.row else {
        return false;
    };
    if rb.is_open() {
        return true;
    }
    ra.is_closed() && ra.fields.keys().all(|l| rb.fields.contains_key(l))
}
