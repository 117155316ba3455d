use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use savesync_core::SavePath;
use savesync_publish::{
    CommandOutput, CommandRunner, Pipeline, PublishError, PublishOptions, PublishOutcome,
    Publisher, Repository,
};
use tempfile::TempDir;

/// Records every git invocation and fails the ones whose leading args match.
#[derive(Default)]
struct ScriptedRunner {
    calls: Mutex<Vec<Vec<String>>>,
    fail_on: Vec<Vec<&'static str>>,
    porcelain: String,
}

impl ScriptedRunner {
    fn failing(fail_on: &[&[&'static str]]) -> Self {
        Self {
            fail_on: fail_on.iter().map(|f| f.to_vec()).collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, prefix: &[&str]) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.len() > prefix.len() && call[1..=prefix.len()] == *prefix)
            .count()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[&str], _cwd: &Path) -> Result<CommandOutput, PublishError> {
        let mut call = vec![program.to_string()];
        call.extend(args.iter().map(|a| a.to_string()));
        self.calls.lock().unwrap().push(call.clone());

        if self.fail_on.iter().any(|f| args.starts_with(f)) {
            return Err(PublishError::CommandFailed {
                command: call.join(" "),
                stderr: "fatal: scripted failure".to_string(),
            });
        }
        let stdout = if args.first() == Some(&"status") {
            self.porcelain.clone()
        } else {
            String::new()
        };
        Ok(CommandOutput {
            stdout,
            stderr: String::new(),
        })
    }
}

fn setup(runner: Arc<ScriptedRunner>) -> (TempDir, Pipeline) {
    let _ = env_logger::builder().is_test(true).try_init();
    let root = TempDir::new().expect("root");
    fs::create_dir_all(root.path().join(".git")).expect("mkdir .git");
    let repo = Repository::new(root.path(), "origin", "main", runner);
    let options = PublishOptions {
        lock_wait: Duration::from_millis(50),
        lock_poll: Duration::from_millis(10),
        commit_prefix: "Update saves".to_string(),
    };
    (root, Pipeline::new(repo, options))
}

fn write_save(root: &TempDir, rel: &str) -> SavePath {
    let path = SavePath::from(rel);
    let full = path.to_path(root.path());
    fs::create_dir_all(full.parent().unwrap()).expect("mkdir container");
    fs::write(full, b"save-bytes").expect("write save");
    path
}

#[test]
fn two_file_batch_is_staged_committed_and_pushed_once() {
    let runner = Arc::new(ScriptedRunner {
        porcelain: "M  UABC12345/data0000.bin\n".to_string(),
        ..ScriptedRunner::default()
    });
    let (root, pipeline) = setup(runner.clone());
    let batch = vec![
        write_save(&root, "UABC12345/data0000.bin"),
        write_save(&root, "UABC12345/icon0.png"),
    ];

    let outcome = pipeline.publish(&batch);

    let PublishOutcome::Published { files, message } = outcome else {
        panic!("expected Published, got {outcome:?}");
    };
    assert_eq!(files, batch);
    assert!(message.contains("UABC12345/data0000.bin"));
    assert!(message.contains("UABC12345/icon0.png"));
    assert!(message.contains(&chrono::Local::now().format("%Y-%m-%d").to_string()));

    assert_eq!(runner.count(&["add", "--"]), 2);
    assert_eq!(runner.count(&["add", "-f"]), 0, "dirty tree needs no force-add");
    assert_eq!(runner.count(&["commit", "--allow-empty"]), 1);
    assert_eq!(runner.count(&["push"]), 1);

    let calls = runner.calls();
    let commit = calls.iter().position(|c| c[1] == "commit").unwrap();
    let push = calls.iter().position(|c| c[1] == "push").unwrap();
    assert!(commit < push, "commit must precede push");
}

#[test]
fn clean_status_forces_add_and_still_commits() {
    let runner = Arc::new(ScriptedRunner::default());
    let (root, pipeline) = setup(runner.clone());
    let batch = vec![write_save(&root, "UABC12345/data0000.bin")];

    let outcome = pipeline.publish(&batch);

    assert!(matches!(outcome, PublishOutcome::Published { .. }));
    assert_eq!(runner.count(&["add", "-f", "--", "UABC12345/data0000.bin"]), 1);
    assert_eq!(runner.count(&["commit", "--allow-empty"]), 1);
}

#[test]
fn vanished_batch_produces_no_commit() {
    let runner = Arc::new(ScriptedRunner::default());
    let (_root, pipeline) = setup(runner.clone());
    let batch = vec![SavePath::from("UABC12345/gone.bin")];

    let outcome = pipeline.publish(&batch);

    let PublishOutcome::NothingToPublish { dropped } = outcome else {
        panic!("expected NothingToPublish, got {outcome:?}");
    };
    assert_eq!(dropped, batch);
    assert_eq!(runner.count(&["commit"]), 0);
    assert_eq!(runner.count(&["push"]), 0);
}

#[test]
fn vanished_files_are_dropped_from_a_mixed_batch() {
    let runner = Arc::new(ScriptedRunner::default());
    let (root, pipeline) = setup(runner.clone());
    let kept = write_save(&root, "UABC12345/data0000.bin");
    let batch = vec![kept.clone(), SavePath::from("UABC12345/renamed.bin")];

    let PublishOutcome::Published { files, message } = pipeline.publish(&batch) else {
        panic!("expected Published");
    };
    assert_eq!(files, vec![kept]);
    assert!(!message.contains("renamed.bin"));
}

#[test]
fn pull_failure_and_stale_lock_do_not_block_publish() {
    let runner = Arc::new(ScriptedRunner::failing(&[&["pull"]]));
    let (root, pipeline) = setup(runner.clone());
    let lock = root.path().join(".git").join("index.lock");
    fs::write(&lock, b"").expect("write lock");
    let batch = vec![write_save(&root, "UABC12345/data0000.bin")];

    let outcome = pipeline.publish(&batch);

    assert!(matches!(outcome, PublishOutcome::Published { .. }), "got {outcome:?}");
    assert!(!lock.exists(), "stale index lock should be removed");
    assert_eq!(runner.count(&["push"]), 1);
}

#[test]
fn failing_add_skips_the_file_but_not_the_batch() {
    let runner = Arc::new(ScriptedRunner::failing(&[&["add", "--", "UABC12345/icon0.png"]]));
    let (root, pipeline) = setup(runner.clone());
    let batch = vec![
        write_save(&root, "UABC12345/data0000.bin"),
        write_save(&root, "UABC12345/icon0.png"),
    ];

    let outcome = pipeline.publish(&batch);

    assert!(matches!(outcome, PublishOutcome::Published { .. }), "got {outcome:?}");
    assert_eq!(runner.count(&["push"]), 1);
}

#[test]
fn push_failure_is_reported_as_failed() {
    let runner = Arc::new(ScriptedRunner::failing(&[&["push"]]));
    let (root, pipeline) = setup(runner.clone());
    let batch = vec![write_save(&root, "UABC12345/data0000.bin")];

    let outcome = pipeline.publish(&batch);

    let PublishOutcome::Failed { error } = outcome else {
        panic!("expected a failed publish");
    };
    assert!(error.to_string().contains("git push origin main"), "got: {error}");
    assert_eq!(runner.count(&["commit"]), 1);
}

#[test]
fn commit_failure_skips_push() {
    let runner = Arc::new(ScriptedRunner::failing(&[&["commit"]]));
    let (root, pipeline) = setup(runner.clone());
    let batch = vec![write_save(&root, "UABC12345/data0000.bin")];

    assert!(matches!(
        pipeline.publish(&batch),
        PublishOutcome::Failed { .. }
    ));
    assert_eq!(runner.count(&["push"]), 0);
}
