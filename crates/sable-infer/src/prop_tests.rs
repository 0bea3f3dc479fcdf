//! Property tests for the unifier and the effect-row algebra using proptest.
//!
//! These stress invariants that must hold for ANY input, not just
//! hand-picked examples:
//!
//! 1. Substitution idempotence: apply(apply(t)) == apply(t)
//! 2. Unification reflexivity: unify(t, t) always succeeds
//! 3. After a successful unify(a, b), apply(a) and apply(b) coincide
//! 4. Occurs check: a variable never unifies with a type containing it
//! 5. Row unification succeeds or fails independently of argument order
//! 6. Effect union is commutative and associative with purity as identity
//! 7. Effect elaboration ignores order and duplicates

use std::collections::BTreeSet;

use proptest::prelude::*;
use sable_types::*;

use crate::effects::{KNOWN_EFFECTS, elaborate_effect_row, subsume_effect_rows, union_effect_rows};
use crate::typeck::{generalize, instantiate};
use crate::{InferenceContext, UnifyError, Unifier};

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

const LABEL_POOL: &[&str] = &["a", "b", "c", "x", "y", "name", "age"];

fn arb_label() -> impl Strategy<Value = Label> {
    prop::sample::select(LABEL_POOL).prop_map(Label::new)
}

fn arb_effect_label() -> impl Strategy<Value = Label> {
    prop::sample::select(KNOWN_EFFECTS).prop_map(Label::new)
}

fn arb_type_var_id() -> impl Strategy<Value = TypeVarId> {
    (0u32..6).prop_map(TypeVarId)
}

fn arb_row_var_id() -> impl Strategy<Value = RowVarId> {
    (0u32..4).prop_map(RowVarId)
}

fn arb_leaf() -> impl Strategy<Value = Type> {
    prop_oneof![
        Just(Type::int()),
        Just(Type::float()),
        Just(Type::string()),
        Just(Type::bool()),
        Just(Type::unit()),
        arb_type_var_id().prop_map(Type::var),
    ]
}

fn arb_effect_row() -> impl Strategy<Value = EffectRow> {
    prop_oneof![
        Just(EffectRow::pure()),
        prop::collection::btree_set(arb_effect_label(), 0..4).prop_map(EffectRow::closed),
        (
            prop::collection::btree_set(arb_effect_label(), 0..3),
            arb_row_var_id()
        )
            .prop_map(|(labels, rest)| EffectRow::open(labels, rest)),
    ]
}

fn arb_closed_effect_row() -> impl Strategy<Value = EffectRow> {
    prop_oneof![
        Just(EffectRow::pure()),
        prop::collection::btree_set(arb_effect_label(), 0..4).prop_map(EffectRow::closed),
    ]
}

/// Record rows whose fields are leaves, so rows never nest. Tails come
/// from a pool disjoint from effect tails.
fn arb_record_row() -> impl Strategy<Value = Row> {
    (
        prop::collection::btree_map(arb_label(), arb_leaf(), 0..4),
        prop::option::of((10u32..14).prop_map(RowVarId)),
    )
        .prop_map(|(fields, rest)| match rest {
            Some(rest) => Row::open_record(fields, rest),
            None => Row::closed_record(fields),
        })
}

fn arb_type(depth: u32) -> BoxedStrategy<Type> {
    if depth == 0 {
        return arb_leaf().boxed();
    }
    let inner = arb_type(depth - 1);
    prop_oneof![
        3 => arb_leaf(),
        1 => inner.clone().prop_map(Type::list),
        1 => prop::collection::vec(inner.clone(), 2..4).prop_map(Type::Tuple),
        1 => (prop::collection::vec(inner.clone(), 0..3), arb_effect_row(), inner)
            .prop_map(|(params, effects, ret)| Type::function(params, effects, ret)),
        1 => arb_record_row().prop_map(Type::Record),
    ]
    .boxed()
}

// ---------------------------------------------------------------------------
// Substitution and unification
// ---------------------------------------------------------------------------

proptest! {
    /// Applying a substitution twice to the same type produces the same
    /// result as applying it once.
    #[test]
    fn substitution_idempotent(ty in arb_type(2)) {
        let mut subst = Substitution::new();
        subst.bind_type(TypeVarId(0), Type::int());
        subst.bind_type(TypeVarId(1), Type::list(Type::var(TypeVarId(2))));
        subst.bind_type(TypeVarId(2), Type::bool());
        subst.bind_row(RowVarId(0), Row::closed_record([(Label::new("extra"), Type::bool())]));

        let once = subst.apply(&ty);
        let twice = subst.apply(&once);
        prop_assert_eq!(once, twice);
    }

    /// Any type unifies with itself without binding anything.
    #[test]
    fn unify_reflexive(ty in arb_type(2)) {
        let mut unifier = Unifier::with_var_offsets(100, 100);
        prop_assert!(unifier.unify(&ty, &ty).is_ok());
        prop_assert!(unifier.substitution.is_empty());
    }

    /// A successful unification makes both sides print identically.
    #[test]
    fn unify_makes_types_agree(a in arb_type(2), b in arb_type(2)) {
        let mut unifier = Unifier::with_var_offsets(100, 100);
        if unifier.unify(&a, &b).is_ok() {
            let (left, right) = sanitize_type_pair_display(&unifier.apply(&a), &unifier.apply(&b));
            prop_assert_eq!(left, right);
        }
    }

    /// A variable never unifies with a compound type that mentions it.
    #[test]
    fn occurs_check_rejects_cycles(ty in arb_type(1), var in arb_type_var_id()) {
        let cyclic = Type::list(Type::Tuple(vec![Type::var(var), ty]));
        let mut unifier = Unifier::with_var_offsets(100, 100);
        let result = unifier.unify(&Type::var(var), &cyclic);
        let is_occurs = matches!(result, Err(UnifyError::Occurs { .. }));
        prop_assert!(is_occurs);
    }

    /// Whether two record rows unify does not depend on which one is
    /// expected.
    #[test]
    fn record_row_unification_is_symmetric(a in arb_record_row(), b in arb_record_row()) {
        let mut forward = Unifier::with_var_offsets(100, 100);
        let mut backward = Unifier::with_var_offsets(100, 100);
        prop_assert_eq!(
            forward.unify_rows(&a, &b).is_ok(),
            backward.unify_rows(&b, &a).is_ok()
        );
    }

    /// Same for effect rows.
    #[test]
    fn effect_row_unification_is_symmetric(a in arb_effect_row(), b in arb_effect_row()) {
        let mut forward = Unifier::with_var_offsets(100, 100);
        let mut backward = Unifier::with_var_offsets(100, 100);
        prop_assert_eq!(
            forward.unify_rows(&a.to_row(), &b.to_row()).is_ok(),
            backward.unify_rows(&b.to_row(), &a.to_row()).is_ok()
        );
    }

    /// Instantiation replaces every quantified variable.
    #[test]
    fn instantiate_leaves_no_quantified_variable(ty in arb_type(2)) {
        let scheme = generalize(&ty, Vec::new(), &BTreeSet::new(), &BTreeSet::new());
        let mut ctx = InferenceContext::with_var_offsets(1000, 1000);
        let fresh = instantiate(&mut ctx, &scheme, sable_ast::NodeId(0));
        let vars = free_type_vars(&fresh);
        for tv in &scheme.type_vars {
            prop_assert!(!vars.contains(&tv.id));
        }
        let rows = free_row_vars(&fresh);
        for rv in &scheme.row_vars {
            prop_assert!(!rows.contains(rv));
        }
    }
}

// ---------------------------------------------------------------------------
// Effect-row algebra
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn effect_union_is_commutative(a in arb_effect_row(), b in arb_effect_row()) {
        prop_assert_eq!(union_effect_rows(&a, &b), union_effect_rows(&b, &a));
    }

    #[test]
    fn effect_union_is_associative(
        a in arb_effect_row(),
        b in arb_effect_row(),
        c in arb_effect_row(),
    ) {
        let left = union_effect_rows(&union_effect_rows(&a, &b), &c);
        let right = union_effect_rows(&a, &union_effect_rows(&b, &c));
        prop_assert_eq!(left, right);
    }

    #[test]
    fn purity_is_the_union_identity(a in arb_effect_row()) {
        prop_assert_eq!(union_effect_rows(&EffectRow::pure(), &a), a.clone());
        prop_assert_eq!(union_effect_rows(&a, &EffectRow::pure()), a);
    }

    #[test]
    fn subsumption_is_reflexive(a in arb_closed_effect_row()) {
        prop_assert!(subsume_effect_rows(&a, &a));
    }

    /// Each side of a union is subsumed by the union.
    #[test]
    fn union_subsumes_its_operands(a in arb_closed_effect_row(), b in arb_closed_effect_row()) {
        let joined = union_effect_rows(&a, &b);
        prop_assert!(subsume_effect_rows(&a, &joined));
        prop_assert!(subsume_effect_rows(&b, &joined));
    }

    #[test]
    fn elaboration_ignores_order_and_duplicates(
        names in prop::sample::subsequence(KNOWN_EFFECTS.to_vec(), 0..KNOWN_EFFECTS.len())
            .prop_shuffle()
    ) {
        let mut sorted = names.clone();
        sorted.sort_unstable();
        let mut doubled = names.clone();
        doubled.extend(names.iter().rev().copied());

        let elaborated = elaborate_effect_row(&names).unwrap();
        prop_assert_eq!(&elaborated, &elaborate_effect_row(&sorted).unwrap());
        prop_assert_eq!(&elaborated, &elaborate_effect_row(&doubled).unwrap());
        prop_assert_eq!(elaborated.is_pure(), names.is_empty());
    }
}
