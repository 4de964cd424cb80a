#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

/// `weave` with the `WEAVE_*` environment cleared.
pub fn weave() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("weave"));
    cmd.env_remove("WEAVE_DEFAULT_KERNEL")
        .env_remove("WEAVE_REQUEST_TIMEOUT_MS")
        .env_remove("WEAVE_LOG");
    cmd
}

/// Write `code` to a script file inside a fresh temp dir.
pub fn script(code: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().expect("tmpdir");
    let path = tmp.path().join("notebook.weave");
    fs::write(&path, code).expect("write script");
    (tmp, path)
}

pub fn stdout_of(assert: &assert_cmd::assert::Assert) -> String {
    String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 stdout")
}
