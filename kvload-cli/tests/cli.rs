use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn kvload(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_kvload"))
        .args(args)
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .env("KVLOAD__LOGGING__LEVEL", "warn")
        .output()
        .unwrap()
}

#[test]
fn prints_version() {
    let dir = tempfile::tempdir().unwrap();
    let output = kvload(&["version"], dir.path());

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.starts_with("kvload "));
}

#[test]
fn runs_and_lists_persisted_keys() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("config.yaml"),
        r#"
run:
  threads: 2
sampler:
  interval: 100ms
  output: samples.csv
key_store:
  type: hierarchical
  path: keys
strategy:
  name: write-only
  options:
    max-operations: 6
    value-size: 32
"#,
    )
    .unwrap();

    let output = kvload(&["-c", "config.yaml", "run"], dir.path());
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("WRITE:"), "{stdout}");

    let csv = fs::read_to_string(dir.path().join("samples.csv")).unwrap();
    assert!(csv.starts_with("Timestamp,"));

    let output = kvload(&["keys", "keys"], dir.path());
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let mut keys: Vec<_> = stdout.lines().collect();
    keys.sort();
    assert_eq!(keys, ["key-0", "key-1", "key-2", "key-3", "key-4", "key-5"]);
}

#[test]
fn user_errors_exit_with_status_two() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("config.yaml"),
        "strategy:\n  name: write-only\n  options:\n    max-operations: 1\n    bogus: true\n",
    )
    .unwrap();

    let output = kvload(&["-c", "config.yaml", "run"], dir.path());
    assert_eq!(output.status.code(), Some(2));

    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("error: unknown options"), "{stderr}");
    assert!(stderr.contains("bogus"), "{stderr}");
}
