//! Common test utilities for dirsync scenario and CLI tests.
//!
//! `TestEnv` owns an isolated temp directory laid out the way `dirsync run`
//! expects (hot tree, backup tree, state file, event log) plus an isolated
//! config home, and knows how to drive the binary against it.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

/// Result of running a dirsync CLI command
#[derive(Debug)]
pub struct TestResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl From<Output> for TestResult {
    fn from(output: Output) -> Self {
        Self {
            success: output.status.success(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

pub struct TestEnv {
    root: TempDir,
    pub hot: PathBuf,
    pub backup: PathBuf,
    pub state: PathBuf,
    pub log: PathBuf,
    config_home: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let hot = root.path().join("hot");
        let backup = root.path().join("backup");
        let config_home = root.path().join("config-home");
        std::fs::create_dir_all(&hot).unwrap();
        std::fs::create_dir_all(&config_home).unwrap();
        Self {
            state: root.path().join("state.json"),
            log: root.path().join("sync_log.json"),
            hot,
            backup,
            config_home,
            root,
        }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.path().join(relative)
    }

    pub fn hot_path(&self, relative: &str) -> PathBuf {
        self.hot.join(relative)
    }

    pub fn backup_path(&self, relative: &str) -> PathBuf {
        self.backup.join(relative)
    }

    pub fn write_hot(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.hot_path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_dirsync"));
        cmd.current_dir(self.root.path())
            .env("HOME", &self.config_home)
            .env("XDG_CONFIG_HOME", &self.config_home)
            .env_remove("RUST_LOG")
            .env_remove("DIRSYNC_WORKERS")
            .env_remove("DIRSYNC_SHUTDOWN_GRACE_SECS");
        cmd
    }

    /// Run to completion.
    pub fn run(&self, args: &[&str]) -> TestResult {
        self.command().args(args).output().unwrap().into()
    }

    /// Start `dirsync run` against this environment in the background.
    pub fn spawn_run(&self, extra: &[&str]) -> Child {
        self.command()
            .arg("run")
            .arg("--hotdir")
            .arg(&self.hot)
            .arg("--backup")
            .arg(&self.backup)
            .arg("--state")
            .arg(&self.state)
            .arg("--log")
            .arg(&self.log)
            .args(extra)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap()
    }
}

/// Send SIGINT and collect the process output.
pub fn interrupt(child: Child) -> TestResult {
    let pid = child.id() as libc::pid_t;
    unsafe {
        libc::kill(pid, libc::SIGINT);
    }
    child.wait_with_output().unwrap().into()
}

/// Poll `pred` every 20ms for up to `timeout`.
pub fn wait_until(timeout: Duration, pred: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if pred() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

/// List all files in a directory recursively (for failure messages)
pub fn list_all_files(dir: &Path) -> Vec<String> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(list_all_files(&path));
            } else {
                files.push(path.display().to_string());
            }
        }
    }
    files.sort();
    files
}
