//! Integration tests for the datamark CLI
//!
//! Tests command-line interface functionality including:
//! - Command parsing and validation
//! - Marking and re-reading documents
//! - Error handling and edge cases
//! - File I/O operations

use anyhow::Result;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{tempdir, TempDir};

const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<stix:STIX_Package
    xmlns:stix="http://stix.mitre.org/stix-1"
    xmlns:indicator="http://stix.mitre.org/Indicator-2"
    xmlns:marking="http://data-marking.mitre.org/Marking-1"
    xmlns:tlpMarking="http://data-marking.mitre.org/extensions/MarkingStructure#TLP-1"
    xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
    id="example:package-1" version="1.2">
  <stix:Indicators>
    <stix:Indicator id="example:indicator-1">
      <indicator:Title>Phishing</indicator:Title>
      <indicator:Alternative_ID>A</indicator:Alternative_ID>
      <indicator:Alternative_ID>B</indicator:Alternative_ID>
      <indicator:Handling>
        <marking:Marking>
          <marking:Controlled_Structure>../../../indicator:Title/self::node()</marking:Controlled_Structure>
          <marking:Marking_Structure xsi:type="tlpMarking:TLPMarkingStructureType" color="RED"/>
        </marking:Marking>
      </indicator:Handling>
    </stix:Indicator>
  </stix:Indicators>
</stix:STIX_Package>
"#;

/// Test helper to get the CLI binary path
fn get_cli_path() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // Remove test binary name
    if path.ends_with("deps") {
        path.pop(); // Remove "deps" directory
    }
    path.push("datamark");
    #[cfg(windows)]
    path.set_extension("exe");
    path
}

/// Test helper to create a temporary directory
fn setup_temp_dir() -> TempDir {
    tempdir().expect("Failed to create temp directory")
}

/// Test helper to run CLI command and return output
fn run_cli_command(args: &[&str]) -> Result<std::process::Output> {
    let output = Command::new(get_cli_path()).args(args).output()?;
    Ok(output)
}

/// Test helper to write the sample document
fn write_sample(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("sample.xml");
    fs::write(&path, SAMPLE).expect("Failed to write sample");
    path
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_cli_show_command() {
    let temp_dir = setup_temp_dir();
    let input = write_sample(&temp_dir);

    let output = run_cli_command(&["show", path_str(&input)]).expect("CLI command should run");
    assert!(output.status.success(), "Command should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("STIXPackage/indicators/indicator[0]/title"));
    assert!(stdout.contains("color=RED"));
    assert!(!stdout.contains("alternative_id"));
}

#[test]
fn test_cli_show_json() {
    let temp_dir = setup_temp_dir();
    let input = write_sample(&temp_dir);

    let output =
        run_cli_command(&["show", path_str(&input), "--json"]).expect("CLI command should run");
    assert!(output.status.success(), "Command should succeed");

    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("Output should be JSON");
    let marked = report["marked"].as_array().unwrap();
    assert_eq!(marked.len(), 1);
    assert_eq!(marked[0]["node"], "STIXPackage/indicators/indicator[0]/title");
    assert_eq!(
        marked[0]["markings"][0]["structures"][0]["attributes"]["color"],
        "RED"
    );
    assert_eq!(report["null"], serde_json::json!([]));
}

#[test]
fn test_cli_mark_entity_with_descendants() {
    let temp_dir = setup_temp_dir();
    let input = write_sample(&temp_dir);
    let output_path = temp_dir.path().join("marked.xml");

    let output = run_cli_command(&[
        "mark",
        path_str(&input),
        "-o",
        path_str(&output_path),
        "--id",
        "example:indicator-1",
        "--tlp",
        "amber",
        "--descendants",
    ])
    .expect("CLI command should run");
    assert!(output.status.success(), "Command should succeed");
    assert!(String::from_utf8_lossy(&output.stdout).contains("✓ Marked"));

    let marked = fs::read_to_string(&output_path).unwrap();
    assert!(marked.contains(
        "../../../descendant-or-self::node() | ../../../descendant-or-self::node()/@*"
    ));
    assert!(marked.contains("color=\"AMBER\""));
    assert!(marked.contains("color=\"RED\""));

    let show = run_cli_command(&["show", path_str(&output_path)]).unwrap();
    let stdout = String::from_utf8_lossy(&show.stdout);
    assert!(stdout.contains("STIXPackage/indicators/indicator[0]/alternative_id[1]"));
}

#[test]
fn test_cli_mark_list_item() {
    let temp_dir = setup_temp_dir();
    let input = write_sample(&temp_dir);
    let output_path = temp_dir.path().join("marked.xml");

    let output = run_cli_command(&[
        "mark",
        path_str(&input),
        "-o",
        path_str(&output_path),
        "--id",
        "example:indicator-1",
        "--field",
        "alternative_id",
        "--index",
        "1",
        "--statement",
        "Second id only",
    ])
    .expect("CLI command should run");
    assert!(output.status.success(), "Command should succeed");

    let marked = fs::read_to_string(&output_path).unwrap();
    assert!(marked.contains("../../../indicator:Alternative_ID[2]/self::node()"));
    assert!(marked.contains("<simpleMarking:Statement>Second id only</simpleMarking:Statement>"));
}

#[test]
fn test_cli_mark_global_and_null() {
    let temp_dir = setup_temp_dir();
    let input = write_sample(&temp_dir);
    let global_path = temp_dir.path().join("global.xml");
    let null_path = temp_dir.path().join("null.xml");

    let output = run_cli_command(&[
        "mark",
        path_str(&input),
        "-o",
        path_str(&global_path),
        "--global",
        "--tlp",
        "GREEN",
    ])
    .unwrap();
    assert!(output.status.success(), "Global marking should succeed");
    let global = fs::read_to_string(&global_path).unwrap();
    assert!(global.contains("<stix:STIX_Header>"));
    assert!(global.contains("//node() | //@*"));

    let output = run_cli_command(&[
        "mark",
        path_str(&global_path),
        "-o",
        path_str(&null_path),
        "--null",
        "--statement",
        "Covers nothing",
    ])
    .unwrap();
    assert!(output.status.success(), "Null marking should succeed");

    let show = run_cli_command(&["show", path_str(&null_path)]).unwrap();
    let stdout = String::from_utf8_lossy(&show.stdout);
    assert!(stdout.contains("(null)"));
    assert!(stdout.contains("color=GREEN"));
}

#[test]
fn test_cli_mark_duplicate_fails() {
    let temp_dir = setup_temp_dir();
    let input = write_sample(&temp_dir);
    let output_path = temp_dir.path().join("marked.xml");

    let output = run_cli_command(&[
        "mark",
        path_str(&input),
        "-o",
        path_str(&output_path),
        "--id",
        "example:indicator-1",
        "--field",
        "title",
        "--tlp",
        "RED",
    ])
    .unwrap();

    assert!(!output.status.success(), "Duplicate marking should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("already carries marking"));
    assert!(!output_path.exists());
}

#[test]
fn test_cli_mark_unknown_id_fails() {
    let temp_dir = setup_temp_dir();
    let input = write_sample(&temp_dir);
    let output_path = temp_dir.path().join("marked.xml");

    let output = run_cli_command(&[
        "mark",
        path_str(&input),
        "-o",
        path_str(&output_path),
        "--id",
        "example:missing",
        "--tlp",
        "RED",
    ])
    .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No entity with id 'example:missing'"));
}

#[test]
fn test_cli_mark_requires_single_target() {
    let temp_dir = setup_temp_dir();
    let input = write_sample(&temp_dir);
    let output_path = temp_dir.path().join("marked.xml");

    let output = run_cli_command(&[
        "mark",
        path_str(&input),
        "-o",
        path_str(&output_path),
        "--global",
        "--null",
        "--tlp",
        "RED",
    ])
    .unwrap();
    assert!(!output.status.success(), "Conflicting targets should fail");

    let output = run_cli_command(&[
        "mark",
        path_str(&input),
        "-o",
        path_str(&output_path),
        "--global",
    ])
    .unwrap();
    assert!(!output.status.success(), "Missing marking should fail");
}

#[test]
fn test_cli_show_nonexistent_file() {
    let temp_dir = setup_temp_dir();
    let nonexistent_path = temp_dir.path().join("nonexistent.xml");

    let output = run_cli_command(&["show", path_str(&nonexistent_path)]).unwrap();

    assert!(
        !output.status.success(),
        "Command should fail for nonexistent file"
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error"), "Should show error message");
}

#[test]
fn test_cli_fields_command() {
    let output = run_cli_command(&["fields"]).expect("CLI command should run");
    assert!(output.status.success(), "Command should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Indicator"));
    assert!(stdout.contains("indicator:Title"));
    assert!(!stdout.contains("xsi_type"), "Unmapped fields stay out of the table");
}

#[test]
fn test_cli_custom_schema() {
    let temp_dir = setup_temp_dir();
    let input = write_sample(&temp_dir);
    let schema_path = temp_dir.path().join("schema.json");
    fs::write(&schema_path, datamark::Schema::stix().to_json().unwrap()).unwrap();

    let output = run_cli_command(&[
        "show",
        path_str(&input),
        "--schema",
        path_str(&schema_path),
    ])
    .unwrap();
    assert!(output.status.success(), "Command should succeed");

    fs::write(&schema_path, "{ not json").unwrap();
    let output = run_cli_command(&["fields", "--schema", path_str(&schema_path)]).unwrap();
    assert!(!output.status.success(), "Broken schema should fail");
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to load schema"));
}

#[test]
fn test_cli_help_and_version() {
    let output = run_cli_command(&["--help"]).unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("show"));
    assert!(stdout.contains("mark"));
    assert!(stdout.contains("fields"));

    let output = run_cli_command(&["--version"]).unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("datamark"));
}
