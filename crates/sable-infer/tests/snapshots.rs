//! Snapshot tests for user-visible rendering: prelude schemes, checked
//! program schemes and diagnostics.

use std::collections::BTreeMap;

use insta::assert_snapshot;
use sable_ast::{AstBuilder, Decl, Program};
use sable_infer::VarSupply;
use sable_infer::builtins::{BuiltinProvider, Prelude};
use sable_infer::checker::{CheckError, TypeChecker};
use sable_infer::config::CheckerConfig;

fn checker() -> TypeChecker {
    TypeChecker::with_prelude(CheckerConfig::default()).unwrap()
}

fn first_diagnostic(result: Result<impl std::fmt::Debug, CheckError>) -> String {
    match result {
        Err(CheckError::Type(err)) => err.diagnostics()[0].to_string(),
        other => panic!("expected a type error, got {other:?}"),
    }
}

#[test]
fn snapshot_prelude_schemes() {
    let mut supply = VarSupply::with_offsets(0, 0);
    let rendered = Prelude
        .values(&mut supply)
        .into_iter()
        .map(|(name, scheme)| format!("{name} : {scheme}"))
        .collect::<Vec<_>>()
        .join("\n");
    assert_snapshot!(rendered, @r"
    print : (String) -[IO]> Unit
    show : forall a. Show a => (a) -> String
    length : forall a. (List(a)) -> Int
    map : forall a b. ((a) -[ea]> b, List(a)) -[ea]> List(b)
    read_file : (String) -[FS]> String
    fetch : (String) -[Net]> String
    now : () -[Clock]> Int
    random : () -[Rand]> Float
    sleep : (Int) -[Async]> Unit
    to_float : (Int) -> Float
    ");
}

#[test]
fn snapshot_program_schemes() {
    let mut b = AstBuilder::new();
    let x = b.var("x");
    let id_value = b.lambda(&["x"], x);
    let one = b.int(1);
    let n_value = b.call("id", vec![one]);
    let program = Program {
        decls: vec![
            Decl::Let {
                id: b.fresh_id(),
                name: "id".to_string(),
                value: id_value,
            },
            Decl::Let {
                id: b.fresh_id(),
                name: "n".to_string(),
                value: n_value,
            },
        ],
        effect_annotations: BTreeMap::new(),
    };
    let checked = checker().check_program(&program).unwrap();
    let rendered = checked
        .schemes
        .iter()
        .map(|(name, scheme)| format!("{name} : {scheme}"))
        .collect::<Vec<_>>()
        .join("\n");
    assert_snapshot!(rendered, @r"
    id : forall a. (a) -> a
    n : Int
    ");
}

#[test]
fn snapshot_if_condition_mismatch() {
    let mut b = AstBuilder::new();
    let condition = b.string("yes");
    let then_branch = b.int(1);
    let else_branch = b.int(2);
    let expr = b.if_then_else(condition, then_branch, else_branch);
    assert_snapshot!(first_diagnostic(checker().check_expr(&expr)), @r"
    error[E0001]: if condition must be Bool, got String
      --> expression > if
      expected: Bool
      actual:   String
    ");
}

#[test]
fn snapshot_undefined_name_in_declaration() {
    let mut b = AstBuilder::new();
    let value = b.var("nope");
    let program = Program {
        decls: vec![Decl::Let {
            id: b.fresh_id(),
            name: "bad".to_string(),
            value,
        }],
        effect_annotations: BTreeMap::new(),
    };
    assert_snapshot!(first_diagnostic(checker().check_program(&program)), @r"
    error[E0006]: undefined variable `nope`
      --> let bad
    ");
}
