//! Rémy-style row unification, shared by record rows and effect rows.
//!
//! Unifying `{x: Int | r1}` with `{y: Bool | r2}` produces:
//!   r1 ~ {y: Bool | r3}
//!   r2 ~ {x: Int | r3}
//! where r3 is fresh. An open row always absorbs the labels unique to the
//! *other* side.

use std::collections::BTreeMap;

use sable_types::{Label, Row, RowVarId, Type};

use crate::trace::UnifyAction;
use crate::{UnifyError, Unifier};

impl Unifier {
    /// Unify two rows of the same kind, extending the substitution.
    pub fn unify_rows(&mut self, expected: &Row, actual: &Row) -> Result<(), UnifyError> {
        if expected.kind != actual.kind {
            self.push_unify_step(
                UnifyAction::KindCheck,
                &Type::Record(expected.clone()),
                &Type::Record(actual.clone()),
                format!("{} vs {}", expected.kind, actual.kind),
            );
            return Err(UnifyError::Kind {
                expected: expected.kind.clone(),
                actual: actual.kind.clone(),
            });
        }

        let expected = self.substitution.apply_row(expected);
        let actual = self.substitution.apply_row(actual);

        if expected == actual {
            return Ok(());
        }

        self.push_unify_step(
            UnifyAction::UnifyRows,
            &Type::Record(expected.clone()),
            &Type::Record(actual.clone()),
            String::new(),
        );

        let mut common = Vec::new();
        let mut only_expected = BTreeMap::new();
        for (label, ty) in &expected.fields {
            match actual.fields.get(label) {
                Some(other) => common.push((label.clone(), ty.clone(), other.clone())),
                None => {
                    only_expected.insert(label.clone(), ty.clone());
                }
            }
        }
        let only_actual: BTreeMap<Label, Type> = actual
            .fields
            .iter()
            .filter(|(label, _)| !expected.fields.contains_key(*label))
            .map(|(l, t)| (l.clone(), t.clone()))
            .collect();

        for (label, exp_ty, act_ty) in &common {
            self.unify(exp_ty, act_ty).map_err(|source| UnifyError::Field {
                label: label.clone(),
                source: Box::new(source),
            })?;
        }

        // A common field may have bound one of the tails; restart on the
        // residual rows so the tail cases below see the current state.
        let tail_bound = |u: &Unifier, tail: Option<RowVarId>| {
            tail.is_some_and(|r| u.substitution.lookup_row(r).is_some())
        };
        if tail_bound(self, expected.rest) || tail_bound(self, actual.rest) {
            let residual_expected = expected.with_kind_of(only_expected, expected.rest);
            let residual_actual = actual.with_kind_of(only_actual, actual.rest);
            return self.unify_rows(&residual_expected, &residual_actual);
        }

        match (expected.rest, actual.rest) {
            (None, None) => self.require_same_labels(&expected, &only_expected, &only_actual),

            (Some(r), None) => {
                if !only_expected.is_empty() {
                    return self.rows_error(&expected, &only_expected, &BTreeMap::new());
                }
                let residual = expected.with_kind_of(only_actual, None);
                self.bind_row_var(r, residual)
            }

            (None, Some(r)) => {
                if !only_actual.is_empty() {
                    return self.rows_error(&expected, &BTreeMap::new(), &only_actual);
                }
                let residual = actual.with_kind_of(only_expected, None);
                self.bind_row_var(r, residual)
            }

            (Some(r1), Some(r2)) if r1 == r2 => {
                self.require_same_labels(&expected, &only_expected, &only_actual)
            }

            (Some(r1), Some(r2)) => {
                if only_expected.is_empty() && only_actual.is_empty() {
                    let tail = expected.with_kind_of(BTreeMap::new(), Some(r2));
                    return self.bind_row_var(r1, tail);
                }
                let r3 = self.fresh_row_var();
                self.push_unify_step(
                    UnifyAction::RemyDecompose,
                    &Type::Record(expected.clone()),
                    &Type::Record(actual.clone()),
                    format!(
                        "r{} ~ {{only_actual | r{}}}, r{} ~ {{only_expected | r{}}}",
                        r1.0, r3.0, r2.0, r3.0
                    ),
                );
                self.bind_row_var(r1, expected.with_kind_of(only_actual, Some(r3)))?;
                self.bind_row_var(r2, actual.with_kind_of(only_expected, Some(r3)))
            }
        }
    }

    fn require_same_labels(
        &mut self,
        row: &Row,
        only_expected: &BTreeMap<Label, Type>,
        only_actual: &BTreeMap<Label, Type>,
    ) -> Result<(), UnifyError> {
        if only_expected.is_empty() && only_actual.is_empty() {
            return Ok(());
        }
        self.rows_error(row, only_expected, only_actual)
    }

    fn rows_error(
        &mut self,
        row: &Row,
        only_expected: &BTreeMap<Label, Type>,
        only_actual: &BTreeMap<Label, Type>,
    ) -> Result<(), UnifyError> {
        let missing: Vec<Label> = only_expected.keys().cloned().collect();
        let extra: Vec<Label> = only_actual.keys().cloned().collect();
        let shown = Type::Record(row.clone());
        self.push_unify_step(
            UnifyAction::Error,
            &shown,
            &shown,
            format!("missing {missing:?}, extra {extra:?}"),
        );
        Err(UnifyError::Rows {
            kind: row.kind.clone(),
            missing,
            extra,
        })
    }
}
