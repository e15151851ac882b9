use std::process::{Command, Output};

fn gap_geobin(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gap-geobin"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn precision_out_of_range_is_rejected_before_opening_store() {
    let temp = tempfile::tempdir().unwrap();
    let db = temp.path().join("viz.sqlite");

    let output = gap_geobin(&["download", "2021-2021", db.to_str().unwrap(), "13"]);

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("geohash size"), "{stderr}");
    assert!(!db.exists());
}

#[test]
fn malformed_year_range_is_reported_distinctly() {
    let temp = tempfile::tempdir().unwrap();
    let db = temp.path().join("viz.sqlite");

    let output = gap_geobin(&["download", "2020-abc", db.to_str().unwrap(), "5"]);

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Year range"), "{stderr}");
    assert!(!stderr.contains("geohash size"), "{stderr}");
    assert!(!db.exists());
}

#[test]
fn missing_arguments_print_usage() {
    let output = gap_geobin(&["download", "2020-2021"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"), "{stderr}");
}

#[test]
fn create_table_twice_succeeds() {
    let temp = tempfile::tempdir().unwrap();
    let db = temp.path().join("viz.sqlite");
    let path = db.to_str().unwrap();

    assert!(gap_geobin(&["create-table", path]).status.success());
    assert!(gap_geobin(&["create-table", path]).status.success());
    assert!(db.exists());

    let summary = gap_geobin(&["summary", path, "--json"]);
    assert!(summary.status.success());
    let units: serde_json::Value = serde_json::from_slice(&summary.stdout).unwrap();
    assert_eq!(units, serde_json::json!([]));
}

#[test]
fn summary_of_missing_store_fails_without_creating_it() {
    let temp = tempfile::tempdir().unwrap();
    let db = temp.path().join("typo.sqlite");

    let output = gap_geobin(&["summary", db.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(4));
    assert!(!db.exists());
}

#[test]
fn summary_without_table_reports_it() {
    let temp = tempfile::tempdir().unwrap();
    let db = temp.path().join("other.sqlite");
    std::fs::write(&db, b"").unwrap();

    let output = gap_geobin(&["summary", db.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(4));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no aggregate table"), "{stderr}");
}
