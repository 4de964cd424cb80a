mod helpers;

use helpers::{script, stdout_of, weave};
use predicates::prelude::*;

#[test]
fn run_prints_return_value() {
    let (_tmp, path) = script("1 + 3");
    weave()
        .arg("run")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::eq("4\n"));
}

#[test]
fn run_binds_values_with_set_directive() {
    let (_tmp, path) = script(
        "#!set --name x --from-result\n1 + 3\n#!set --name y --from-value @csharp:x\nprint y * 10",
    );
    weave()
        .arg("run")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::eq("40\n"));
}

#[test]
fn run_shares_values_between_selected_kernels() {
    let (_tmp, path) = script(
        "#!fsharp\nlet y = 456\n#!csharp\n#!set --name x --from-value @fsharp:y\nx + 1",
    );
    weave()
        .arg("run")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::eq("457\n"));
}

#[test]
fn run_reads_input_prompts_from_stdin() {
    let (_tmp, path) = script("#!set --name who --from-value @input:Name\nprint \"hi \" + who");
    weave()
        .arg("run")
        .arg(&path)
        .write_stdin("Ada\n")
        .assert()
        .success()
        .stdout(predicate::eq("hi Ada\n"))
        .stderr(predicate::str::contains("Name: "));
}

#[test]
fn run_fails_when_input_is_closed() {
    let (_tmp, path) = script("#!set --name who --from-value @input:Name\nprint who");
    weave()
        .arg("run")
        .arg(&path)
        .write_stdin("")
        .assert()
        .failure()
        .stdout(predicate::str::is_empty());
}

#[test]
fn run_reports_failures_with_nonzero_exit() {
    let (_tmp, path) = script("let a = 1\nthrow \"nope\"\nprint a");
    weave()
        .arg("run")
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error: nope"));
}

#[test]
fn run_rejects_unknown_directive() {
    let (_tmp, path) = script("#!bogus\n1");
    weave()
        .arg("run")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unrecognized directive '#!bogus'."));
}

#[test]
fn default_kernel_comes_from_environment() {
    let (_tmp, path) = script("let z = 7\nz");
    let assert = weave()
        .env("WEAVE_DEFAULT_KERNEL", "fsharp")
        .args(["--json", "run"])
        .arg(&path)
        .assert()
        .success();
    let first: serde_json::Value =
        serde_json::from_str(stdout_of(&assert).lines().next().expect("event")).expect("json");
    assert_eq!(first["routing"][0], "fsharp");
    assert_eq!(first["event"]["event"]["formatted"]["value"], "7");
}

#[test]
fn json_output_is_one_envelope_per_line() {
    let (_tmp, path) = script("print \"hi\"\n2");
    let assert = weave().args(["--json", "run"]).arg(&path).assert().success();
    let events: Vec<serde_json::Value> = stdout_of(&assert)
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    let types: Vec<&str> = events
        .iter()
        .map(|e| e["event"]["eventType"].as_str().unwrap_or_default())
        .collect();
    assert_eq!(
        types,
        ["StandardOutputProduced", "ReturnValueProduced", "CommandSucceeded"]
    );
    assert!(events.iter().all(|e| e["v"] == 1));
}

#[test]
fn diagnose_does_not_run_code() {
    let (_tmp, path) = script("print \"side effect\"");
    weave()
        .args(["run", "--diagnose"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn run_missing_file_fails() {
    weave()
        .args(["run", "does-not-exist.weave"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("reading does-not-exist.weave"));
}
