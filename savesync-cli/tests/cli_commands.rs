use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

use savesync_core::{config, Config};

fn savesync_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("savesync"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("NO_COLOR", "1");
    cmd
}

fn saves_dir() -> TempDir {
    let saves = TempDir::new().expect("saves");
    fs::create_dir_all(saves.path().join(".git")).expect("fake git dir");
    saves
}

#[test]
fn init_writes_config_with_overrides() {
    let home = TempDir::new().expect("home");
    let saves = saves_dir();

    savesync_cmd(home.path())
        .args(["init"])
        .arg(saves.path())
        .args(["--remote", "backup", "--branch", "saves"])
        .assert()
        .success()
        .stdout(contains("Pushing to backup/saves"));

    let loaded = config::load_at(home.path()).expect("load");
    assert_eq!(
        loaded.watch_root,
        saves.path().canonicalize().expect("canonical")
    );
    assert_eq!(loaded.remote, "backup");
    assert_eq!(loaded.branch, "saves");
    assert_eq!(loaded.debounce_ms, 5_000);
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let home = TempDir::new().expect("home");
    let saves = saves_dir();

    savesync_cmd(home.path())
        .arg("init")
        .arg(saves.path())
        .assert()
        .success();
    savesync_cmd(home.path())
        .arg("init")
        .arg(saves.path())
        .assert()
        .failure()
        .stderr(contains("already exists"));
    savesync_cmd(home.path())
        .arg("init")
        .arg(saves.path())
        .args(["--branch", "other", "--force"])
        .assert()
        .success();

    assert_eq!(config::load_at(home.path()).expect("load").branch, "other");
}

#[test]
fn init_warns_when_not_a_git_tree() {
    let home = TempDir::new().expect("home");
    let plain = TempDir::new().expect("plain");

    savesync_cmd(home.path())
        .arg("init")
        .arg(plain.path())
        .assert()
        .success()
        .stderr(contains("not a git working tree"));
}

#[test]
fn config_without_init_points_at_init() {
    let home = TempDir::new().expect("home");

    savesync_cmd(home.path())
        .arg("config")
        .assert()
        .failure()
        .stderr(contains("savesync init"));
}

#[test]
fn config_prints_effective_values() {
    let home = TempDir::new().expect("home");
    let mut cfg = Config::new("/srv/saves");
    cfg.max_retries = 5;
    config::save_at(home.path(), &cfg).expect("save");

    savesync_cmd(home.path())
        .arg("config")
        .assert()
        .success()
        .stdout(contains("/srv/saves"))
        .stdout(contains("max_retries"))
        .stdout(contains("5"))
        .stdout(contains("bin, png, sfo"));
}

#[test]
fn check_reports_accepted_and_rejected_paths() {
    let home = TempDir::new().expect("home");
    config::save_at(home.path(), &Config::new("/saves")).expect("save");

    savesync_cmd(home.path())
        .args(["check", "/saves/UABC12345/DATA0000.BIN", "UABC12345/icon0.png"])
        .assert()
        .success()
        .stdout(contains("UABC12345/DATA0000.BIN"))
        .stdout(contains("UABC12345/icon0.png"))
        .stdout(contains("skip").not());

    savesync_cmd(home.path())
        .args(["check", "/saves/readme.txt", "/saves/UABC12345/notes.txt"])
        .assert()
        .code(1)
        .stdout(contains("not inside a save container"))
        .stdout(contains("extension not allowed"));
}

#[test]
fn daemon_status_when_not_running() {
    let home = TempDir::new().expect("home");

    savesync_cmd(home.path())
        .args(["daemon", "status"])
        .assert()
        .success()
        .stdout(contains("\"running\": false"));

    savesync_cmd(home.path())
        .args(["daemon", "stop"])
        .assert()
        .success()
        .stdout(contains("daemon is not running"));

    savesync_cmd(home.path())
        .args(["daemon", "flush"])
        .assert()
        .code(1)
        .stdout(contains("daemon is not running"));
}

#[test]
fn daemon_start_exits_one_when_remote_unreachable() {
    let home = TempDir::new().expect("home");
    let saves = saves_dir();
    let mut cfg = Config::new(saves.path());
    cfg.probe_url = "https://savesync.invalid".to_string();
    cfg.probe_timeout_ms = 2_000;
    config::save_at(home.path(), &cfg).expect("save");

    savesync_cmd(home.path())
        .args(["daemon", "start"])
        .assert()
        .code(1)
        .stderr(contains("savesync.invalid"));
}

#[test]
fn daemon_start_without_config_exits_one() {
    let home = TempDir::new().expect("home");

    savesync_cmd(home.path())
        .args(["daemon", "start"])
        .assert()
        .code(1)
        .stderr(contains("savesync init"));
}
