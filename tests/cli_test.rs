use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_cli_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!("botbazaar"));
    cmd.arg("tests/fixtures/marketplace.jsonl")
        .arg("--platform-key")
        .arg("test-key");

    let output = cmd.output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    let lines: Vec<&str> = stdout.lines().collect();

    // One response per non-blank request line
    assert_eq!(lines.len(), 9);
    assert!(lines[0].contains(r#""displayName":"Alice""#));
    assert!(lines[1].contains(r#""code":"ERR_CONFLICT""#));
    assert!(lines[2].contains(r#""code":"ERR_VALIDATION""#));
    assert_eq!(lines[3], r#"{"result":0}"#);
    assert!(lines[4].contains(r#""balance":0"#));
    assert!(lines[5].contains(r#""code":"ERR_INSUFFICIENT_BALANCE""#));
    assert_eq!(lines[6], r#"{"result":[]}"#);
    assert!(lines[7].contains(r#""code":"ERR_NOT_FOUND""#));
    assert_eq!(lines[8], r#"{"result":[]}"#);

    Ok(())
}

#[test]
fn test_cli_platform_key_from_env() {
    let mut cmd = Command::new(cargo_bin!("botbazaar"));
    cmd.arg("tests/fixtures/marketplace.jsonl")
        .env("PLATFORM_KEY", "env-key");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(r#"{"result":0}"#));
}

#[test]
fn test_cli_requires_platform_key() {
    let mut cmd = Command::new(cargo_bin!("botbazaar"));
    cmd.arg("tests/fixtures/marketplace.jsonl")
        .env_remove("PLATFORM_KEY");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("platform key"));
}

#[test]
fn test_cli_config_file_supplies_platform_key() {
    let config = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(
        config.path(),
        r#"{"minimumPayout": 5000, "platformKey": "file-key"}"#,
    )
    .unwrap();

    let mut cmd = Command::new(cargo_bin!("botbazaar"));
    cmd.arg("tests/fixtures/marketplace.jsonl")
        .arg("--config")
        .arg(config.path())
        .env_remove("PLATFORM_KEY");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("need 5000"));
}

#[test]
fn test_cli_rejects_overcommitted_shares() {
    let config = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(
        config.path(),
        r#"{"saleSellerShare": "0.99", "saleCreatorShare": "0.05"}"#,
    )
    .unwrap();

    let mut cmd = Command::new(cargo_bin!("botbazaar"));
    cmd.arg("tests/fixtures/marketplace.jsonl")
        .arg("--config")
        .arg(config.path())
        .arg("--platform-key")
        .arg("k");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Validation error"));
}
