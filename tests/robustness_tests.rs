use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

mod common;

#[test]
fn test_malformed_lines_are_reported_and_skipped() {
    let requests = common::write_requests(&[
        r#"{"operation": "createUser", "identityKey": "02aa", "name": "Alice"}"#,
        r#"{"operation": "createUser", "identityKey": "#,
        r#"["not", "an", "object"]"#,
        r#"{"identityKey": "02aa"}"#,
        r#"{"operation": "getBalance", "identityKey": "02aa"}"#,
    ]);

    let mut cmd = Command::new(cargo_bin!("botbazaar"));
    cmd.arg(requests.path()).env("PLATFORM_KEY", "k");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading request"))
        .stdout(predicate::str::contains(r#"{"result":0}"#))
        .stdout(predicate::str::contains(r#""status":"error""#).count(3));
}

#[test]
fn test_invalid_field_types() {
    let requests = common::write_requests(&[
        r#"{"operation": "createUser", "identityKey": 7, "name": "Alice"}"#,
        r#"{"operation": "createUser", "identityKey": "02aa", "name": "Alice"}"#,
        r#"{"operation": "listBotOnMarketplace", "identityKey": "02aa", "botID": "x", "amount": "lots"}"#,
        r#"{"operation": "cashOut"}"#,
        r#"{"operation": "withdrawEverything", "identityKey": "02aa"}"#,
    ]);

    let mut cmd = Command::new(cargo_bin!("botbazaar"));
    cmd.arg(requests.path()).env("PLATFORM_KEY", "k");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error processing request"))
        .stdout(predicate::str::contains(r#""code":"ERR_VALIDATION""#).count(3))
        .stdout(predicate::str::contains(r#""code":"ERR_NOT_FOUND""#).count(1))
        .stdout(predicate::str::contains(r#""displayName":"Alice""#));
}

#[test]
fn test_boundary_payment_amounts() {
    let requests = common::write_requests(&[
        r#"{"operation": "createUser", "identityKey": "02aa", "name": "Alice"}"#,
        r#"{"operation": "buyBotFromMarketplace", "identityKey": "02aa", "botID": "x", "paymentAmount": 18446744073709551615}"#,
        r#"{"operation": "buyBotFromMarketplace", "identityKey": "02aa", "botID": "x", "paymentAmount": 18446744073709551616}"#,
        r#"{"operation": "getBalance", "identityKey": "02aa"}"#,
    ]);

    let mut cmd = Command::new(cargo_bin!("botbazaar"));
    cmd.arg(requests.path()).env("PLATFORM_KEY", "k");

    // u64::MAX is refunded minus the fee, one past it is rejected outright
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(r#""code":"ERR_CONFLICT""#).count(1))
        .stdout(predicate::str::contains(r#""code":"ERR_VALIDATION""#).count(1))
        .stdout(predicate::str::contains(r#"{"result":18446744073709551515}"#));
}
