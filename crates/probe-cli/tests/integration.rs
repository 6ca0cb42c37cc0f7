#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tempfile::TempDir;

const GENERATOR: &str = r#"#!/bin/sh
case "$3" in *broken*) echo "template exploded" >&2; exit 1;; esac
mkdir -p "$1"
cat > "$1/package.json" <<EOF
{
  "name": "$1",
  "version": "0.1.0",
  "private": true,
  "devDependencies": { "tmpl-fake": "^1.0.0" },
  "scripts": {
    "start": "cycle-scripts start",
    "test": "cycle-scripts test",
    "build": "cycle-scripts build",
    "take-off-training-wheels": "cycle-scripts take-off-training-wheels"
  }
}
EOF
"#;

const SCRIPT_RUNNER: &str = r#"#!/bin/sh
case "$1" in
  start)
    [ -n "$FAKE_SERVE_HANG" ] || echo "Server running at :8000"
    sleep 30
    ;;
  test)
    [ "$CI" = "true" ] || { echo "CI not set" >&2; exit 9; }
    ;;
  run)
    case "$2" in
      build)
        code=${FAKE_BUILD_EXIT:-0}
        [ "$code" = 0 ] && mkdir -p build
        exit "$code"
        ;;
      take-off-training-wheels) mkdir -p build ;;
    esac
    ;;
esac
"#;

fn write_executable(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// A workspace with a fake generator, a fake script runner and one template.
fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_executable(&root.join("gen.sh"), GENERATOR);
    write_executable(&root.join("npm.sh"), SCRIPT_RUNNER);
    std::fs::create_dir_all(root.join("templates/tmpl-fake")).unwrap();
    std::fs::create_dir_all(root.join("templates/tmpl-broken")).unwrap();
    std::fs::write(
        root.join(".scaffold-probe.yaml"),
        format!(
            r#"generator: ["sh", "{gen}"]
templates_root: templates
script_runner: "{npm}"
flavors:
  - name: Fake
    template: tmpl-fake
stream_libs: [xstream, rx]
phases:
  serve:
    deadline_secs: 10
    check_page: false
"#,
            gen = root.join("gen.sh").display(),
            npm = root.join("npm.sh").display(),
        ),
    )
    .unwrap();
    dir
}

fn probe(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("scaffold-probe").unwrap();
    cmd.current_dir(dir.path())
        .env("SCAFFOLD_PROBE_ROOT", dir.path())
        .env_remove("FAKE_SERVE_HANG")
        .env_remove("FAKE_BUILD_EXIT");
    cmd
}

fn leftover_projects(dir: &TempDir) -> Vec<String> {
    std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("example-"))
        .collect()
}

// ---------------------------------------------------------------------------
// scaffold-probe run
// ---------------------------------------------------------------------------

#[test]
fn run_passes_every_combination() {
    let dir = workspace();
    probe(&dir)
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("PASS  Fake / xstream"))
        .stdout(predicate::str::contains("PASS  Fake / rx"))
        .stdout(predicate::str::contains("2 passed, 0 failed"));
    assert!(leftover_projects(&dir).is_empty());
}

#[test]
fn run_failure_exits_2_and_runs_later_phases() {
    let dir = workspace();
    let output = probe(&dir)
        .args(["run", "--json", "--stream", "xstream"])
        .env("FAKE_BUILD_EXIT", "1")
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let result = &report["results"][0];
    assert_eq!(result["verdict"], "fail");
    let phases = result["phases"].as_array().unwrap();
    let kinds: Vec<_> = phases
        .iter()
        .map(|p| (p["name"].as_str().unwrap(), p["outcome"]["kind"].as_str().unwrap()))
        .collect();
    assert_eq!(
        kinds,
        [
            ("serve", "passed"),
            ("test", "passed"),
            ("build", "failed_exit_code"),
            ("unlock", "passed"),
        ]
    );
    assert_eq!(phases[2]["outcome"]["code"], 1);
    assert!(leftover_projects(&dir).is_empty());
}

#[test]
fn run_writes_report_file() {
    let dir = workspace();
    probe(&dir)
        .args(["run", "--stream", "rx", "--report", "out/report.json"])
        .assert()
        .success();

    let data = std::fs::read_to_string(dir.path().join("out/report.json")).unwrap();
    let report: serde_json::Value = serde_json::from_str(&data).unwrap();
    assert_eq!(report["aborted"], false);
    assert_eq!(report["results"].as_array().unwrap().len(), 1);
    assert_eq!(report["results"][0]["combination"]["stream_lib"], "rx");
}

#[test]
fn generation_failure_is_reported_per_combination() {
    let dir = workspace();
    let config = dir.path().join(".scaffold-probe.yaml");
    let yaml = std::fs::read_to_string(&config).unwrap().replace(
        "flavors:\n",
        "flavors:\n  - name: Broken\n    template: tmpl-broken\n",
    );
    std::fs::write(&config, yaml).unwrap();

    probe(&dir)
        .args(["run", "--stream", "most"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no combinations selected"));

    probe(&dir)
        .args(["run", "--stream", "xstream"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains(
            "FAIL  Broken / xstream  (generation: generator exited with result code: 1)",
        ))
        .stdout(predicate::str::contains("PASS  Fake / xstream"));
    assert!(leftover_projects(&dir).is_empty());
}

#[test]
fn suite_timeout_aborts_with_130() {
    let dir = workspace();
    probe(&dir)
        .args(["run", "--suite-timeout-secs", "1"])
        .env("FAKE_SERVE_HANG", "1")
        .timeout(std::time::Duration::from_secs(60))
        .assert()
        .code(130)
        .stdout(predicate::str::contains("(aborted)"));
    assert!(leftover_projects(&dir).is_empty());
}

#[test]
fn unknown_stream_filter_is_an_error() {
    let dir = workspace();
    probe(&dir)
        .args(["run", "--stream", "bacon"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown stream library 'bacon'"));
}

// ---------------------------------------------------------------------------
// scaffold-probe combos
// ---------------------------------------------------------------------------

#[test]
fn combos_lists_matrix() {
    let dir = workspace();
    probe(&dir)
        .arg("combos")
        .assert()
        .success()
        .stdout(predicate::str::contains("tmpl-fake"))
        .stdout(predicate::str::contains("xstream"))
        .stdout(predicate::str::contains("rx"));

    let output = probe(&dir).args(["combos", "--json"]).output().unwrap();
    let combos: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(combos.as_array().unwrap().len(), 2);
    assert_eq!(combos[0]["stream_lib"], "xstream");
}

// ---------------------------------------------------------------------------
// scaffold-probe check-manifest
// ---------------------------------------------------------------------------

#[test]
fn check_manifest_accepts_generated_project() {
    let dir = workspace();
    std::process::Command::new("sh")
        .args(["gen.sh", "example-manual", "--flavor", "x", "--stream", "rx"])
        .current_dir(dir.path())
        .status()
        .unwrap();

    probe(&dir)
        .args(["check-manifest", "example-manual", "--template", "tmpl-fake"])
        .assert()
        .success()
        .stdout(predicate::str::contains("example-manual 0.1.0"));

    probe(&dir)
        .args(["check-manifest", "example-manual", "--template", "other"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("devDependencies.other"));

    probe(&dir)
        .args([
            "check-manifest",
            "example-manual",
            "--template",
            "tmpl-fake",
            "--name",
            "proj1",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("field `name`"));
}

// ---------------------------------------------------------------------------
// scaffold-probe config
// ---------------------------------------------------------------------------

#[test]
fn config_show_fills_defaults() {
    let dir = workspace();
    probe(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("delegate: cycle-scripts"))
        .stdout(predicate::str::contains("generation_timeout_secs: 600"));
}

#[test]
fn config_validate_reports_errors() {
    let dir = workspace();
    probe(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));

    std::fs::write(dir.path().join("bad.yaml"), "flavors: []\nstream_libs: []\n").unwrap();
    probe(&dir)
        .args(["--config", "bad.yaml", "config", "validate"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("[error] no flavors configured"))
        .stderr(predicate::str::contains("config validation found errors"));
}
