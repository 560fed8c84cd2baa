//! CLI integration tests for espurna-build.
//!
//! These tests run the binary against throwaway projects. None of them need
//! the xtensa toolchain, re2c or a PlatformIO installation.

use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get the espurna-build binary command, isolated from the caller's
/// environment variables.
fn espurna_build(project: &Path) -> Command {
    let mut cmd = Command::cargo_bin("espurna-build").unwrap();
    cmd.current_dir(project)
        .env_remove("PIOENV")
        .env_remove("ESPURNA_BUILD_NAME")
        .env_remove("ESPURNA_BUILD_DESTINATION")
        .env_remove("ESPURNA_VERSION")
        .env_remove("PLATFORMIO_CORE_DIR");
    cmd
}

/// Create a project with a config file pointing at a local packages dir.
fn project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let packages = tmp.path().join("packages");
    fs::create_dir_all(&packages).unwrap();
    fs::write(
        tmp.path().join("espurna-build.toml"),
        format!(
            "[env]\nversion = \"1.15.0\"\n\n[toolchain]\nre2c = \"re2c-not-installed\"\n\n[platformio]\npackages_dir = '{}'\n",
            packages.display()
        ),
    )
    .unwrap();
    tmp
}

fn add_sources(project: &Path, names: &[&str]) {
    let espurna = project.join("espurna");
    fs::create_dir_all(&espurna).unwrap();
    fs::write(espurna.join("espurna.h"), "#pragma once\n").unwrap();
    for name in names {
        fs::write(espurna.join(name), "").unwrap();
    }
}

fn link(project: &Path, env: &str, image: &[u8]) {
    let build_dir = project.join(".pio/build").join(env);
    fs::create_dir_all(&build_dir).unwrap();
    fs::write(build_dir.join("firmware.bin"), image).unwrap();
}

// ============================================================================
// espurna-build info
// ============================================================================

#[test]
fn test_info_defaults() {
    let tmp = project();

    espurna_build(tmp.path())
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("environment:  default"))
        .stdout(predicate::str::contains("espurna-1.15.0-default"))
        .stdout(predicate::str::contains("ExtractDebugSymbols"))
        .stdout(predicate::str::contains("framework default (not installed)"));
}

#[test]
fn test_info_uses_environment_variables() {
    let tmp = project();

    espurna_build(tmp.path())
        .args(["info", "--json"])
        .env("PIOENV", "nodemcu-lolin")
        .env("ESPURNA_BUILD_NAME", "itead-sonoff-basic")
        .env("ESPURNA_BUILD_DESTINATION", "dist")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"env\": \"nodemcu-lolin\""))
        .stdout(predicate::str::contains(
            "espurna-1.15.0-itead-sonoff-basic",
        ))
        .stdout(predicate::str::contains("dist"));
}

#[test]
fn test_info_known_framework() {
    let tmp = project();
    let framework = tmp.path().join("packages/framework-arduinoespressif8266");
    fs::create_dir_all(&framework).unwrap();
    fs::write(
        framework.join("package.json"),
        r#"{"name": "framework-arduinoespressif8266", "version": "3.30102.0"}"#,
    )
    .unwrap();

    espurna_build(tmp.path())
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("platform_elf2bin_3_30102_0.py"));
}

#[test]
fn test_info_invalid_config() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("espurna-build.toml"), "[env\n").unwrap();

    espurna_build(tmp.path())
        .arg("info")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse config"));
}

// ============================================================================
// espurna-build merge
// ============================================================================

#[test]
fn test_merge_print() {
    let tmp = project();
    add_sources(tmp.path(), &["wifi.cpp", "main.cpp", "api.cpp"]);

    let output = espurna_build(tmp.path())
        .args(["merge", "--print"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let unit = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = unit.lines().collect();
    assert_eq!(lines[0], "// !!! Automatically generated file; DO NOT EDIT !!! ");
    assert!(lines[1].ends_with("espurna.h\""));
    assert!(lines[2].ends_with("api.cpp\""));
    assert!(lines[3].ends_with("main.cpp\""));
    assert!(lines[4].ends_with("wifi.cpp\""));
    assert_eq!(lines.len(), 5);
}

#[test]
fn test_merge_writes_unit() {
    let tmp = project();
    add_sources(tmp.path(), &["main.cpp"]);

    espurna_build(tmp.path())
        .args(["merge", "--env", "d1"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Merged 1 source(s)"));

    let unit = tmp
        .path()
        .join(".pio/build/d1/espurna_single_source/src/main.cpp");
    assert!(unit.is_file());
}

// ============================================================================
// espurna-build build
// ============================================================================

#[test]
fn test_build_gzip_then_reuse_in_other_env() {
    let tmp = project();
    link(tmp.path(), "envA", b"firmware image");
    link(tmp.path(), "envB", b"firmware image");

    espurna_build(tmp.path())
        .args(["build", "--env", "envA", "${BUILD_DIR}/firmware.bin.gz"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Built"));
    assert!(tmp.path().join(".pio/build/envA/firmware.bin.gz").is_file());

    espurna_build(tmp.path())
        .args(["build", "--env", "envB", "${BUILD_DIR}/firmware.bin.gz"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Cached"));
    assert_eq!(
        fs::read(tmp.path().join(".pio/build/envA/firmware.bin.gz")).unwrap(),
        fs::read(tmp.path().join(".pio/build/envB/firmware.bin.gz")).unwrap()
    );
}

#[test]
fn test_build_defaults_without_linked_program_fails() {
    let tmp = project();

    espurna_build(tmp.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("firmware.elf"));
}

#[test]
fn test_build_grammar_failure_exits_one() {
    let tmp = project();
    fs::create_dir_all(tmp.path().join("espurna")).unwrap();
    fs::write(tmp.path().join("espurna/parser.re"), "").unwrap();

    espurna_build(tmp.path())
        .args(["build", "espurna/parser.re.ipp", "espurna/other.re.ipp"])
        .assert()
        .code(1);
}

#[test]
fn test_build_unknown_target() {
    let tmp = project();

    espurna_build(tmp.path())
        .args(["build", "notes.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("don't know how to make"));
}

// ============================================================================
// espurna-build signature
// ============================================================================

#[test]
fn test_signature_matches_across_envs() {
    let tmp = project();
    link(tmp.path(), "envA", b"firmware image");
    link(tmp.path(), "envB", b"firmware image");

    let signature = |env: &str, mode: &str| {
        let output = espurna_build(tmp.path())
            .args([
                "signature",
                "--env",
                env,
                "--signatures",
                mode,
                "${BUILD_DIR}/firmware.bin.gz",
            ])
            .output()
            .unwrap();
        assert!(output.status.success());
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    };

    assert_eq!(signature("envA", "build-dir"), signature("envB", "build-dir"));
    assert_ne!(signature("envA", "project"), signature("envB", "project"));
    assert_eq!(signature("envA", "build-dir").len(), 64);
}

// ============================================================================
// espurna-build completions
// ============================================================================

#[test]
fn test_completions_bash() {
    let tmp = TempDir::new().unwrap();

    espurna_build(tmp.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("espurna-build"));
}
