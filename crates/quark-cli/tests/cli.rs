//! End-to-end checks of the command-line front-end: flag precedence, exit
//! codes, and the `.qk` extension contract, driven as a real subprocess.

use std::io::Write;
use std::process::{Command, Stdio};

fn quark() -> Command {
    Command::new(env!("CARGO_BIN_EXE_quark"))
}

#[test]
fn help_flag_prints_usage_and_exits_zero() {
    let output = quark().arg("-help").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8(output.stdout).unwrap().contains("Usage: quark"));
}

#[test]
fn version_flag_prints_version_and_exits_zero() {
    let output = quark().arg("-version").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8(output.stdout).unwrap().contains("Quark v0.1.0"));
}

#[test]
fn help_takes_precedence_over_version() {
    let output = quark().args(["-help", "-version"]).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8(output.stdout).unwrap().contains("Usage: quark"));
}

#[test]
fn dash_c_runs_a_source_string() {
    let output = quark().args(["-c", "println(1 + 2)"]).output().unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "3\n");
}

#[test]
fn a_file_without_the_qk_extension_is_rejected() {
    let mut path = std::env::temp_dir();
    path.push(format!("quark-cli-test-{}.txt", std::process::id()));
    std::fs::write(&path, "export 1\n").unwrap();

    let output = quark().arg(&path).output().unwrap();
    assert_eq!(output.status.code(), Some(255));
    assert!(String::from_utf8(output.stderr).unwrap().contains("except: .qk"));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn a_runtime_error_in_a_file_exits_255() {
    let mut path = std::env::temp_dir();
    path.push(format!("quark-cli-test-{}.qk", std::process::id()));
    std::fs::write(&path, "export 1 / 0\n").unwrap();

    let output = quark().arg(&path).output().unwrap();
    assert_eq!(output.status.code(), Some(255));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn repl_echoes_non_null_results_and_exits_on_dot_exit() {
    let mut child = quark()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    child
        .stdin
        .as_mut()
        .unwrap()
        .write_all(b"1 + 1\n.exit\n")
        .unwrap();

    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains(">> "));
    assert!(stdout.contains('2'));
}
