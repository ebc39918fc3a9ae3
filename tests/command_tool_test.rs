//! Command Tool Tests
//!
//! Shell-out tasks running inside a pool.

#![cfg(unix)]

use batch_pool::tools::{command_task, CommandOutcome, CommandSpec};
use batch_pool::{Pool, TaskBatch, TaskErrorKind};
use std::path::PathBuf;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join("batch-pool-command-tests")
        .join(format!("{}-{}", name, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("scratch dir");
    dir
}

#[tokio::test]
async fn test_command_batch_produces_outputs() {
    let dir = scratch_dir("produce");
    let first = dir.join("first.txt");
    let second = dir.join("second.txt");

    let batch = TaskBatch::new("produce")
        .with_task(command_task(
            "touch_first",
            CommandSpec::new("touch").arg(first.display().to_string()).expect_output(&first),
        ))
        .with_task(command_task(
            "copy_to_second",
            CommandSpec::new("cp")
                .args([first.display().to_string(), second.display().to_string()])
                .expect_output(&second),
        ));

    let report = Pool::with_workers(1).run(vec![batch]).await.unwrap();

    assert_eq!(report.error_count(), 0);
    let values = report.batch_results()[0].values();
    assert_eq!(values[0], Some(&CommandOutcome::Produced(first.clone())));
    assert_eq!(values[1], Some(&CommandOutcome::Produced(second.clone())));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_existing_output_skips_command() {
    let dir = scratch_dir("skip");
    let existing = dir.join("done.txt");
    std::fs::write(&existing, "already here").unwrap();

    // Would fail if it ran
    let spec = CommandSpec::new("false").expect_output(&existing);
    let batch = TaskBatch::new("skip").with_task(command_task("cached", spec));

    let report = Pool::with_workers(1).run(vec![batch]).await.unwrap();

    assert_eq!(report.error_count(), 0);
    assert_eq!(
        report.column(0),
        vec![Some(&CommandOutcome::Skipped(existing.clone()))]
    );

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_failing_command_fails_its_batch_only() {
    let dir = scratch_dir("failing");
    let missing = dir.join("never.txt");

    let batches = vec![
        TaskBatch::new("exit_status").with_task(command_task(
            "exit_2",
            CommandSpec::new("sh").args(["-c", "exit 2"]),
        )),
        TaskBatch::new("no_output").with_task(command_task(
            "forgets_output",
            CommandSpec::new("true").expect_output(&missing),
        )),
        TaskBatch::new("echo").with_task(command_task(
            "say_hi",
            CommandSpec::new("echo").arg("hi"),
        )),
    ];

    let report = Pool::with_workers(2).run(batches).await.unwrap();

    assert_eq!(report.batch_count(), 3);
    assert_eq!(report.error_count(), 2);

    let exit = report.find("exit_status").unwrap().error().unwrap();
    assert_eq!(exit.kind, TaskErrorKind::Failed);
    assert!(exit.message.contains("exited with"));

    let no_output = report.find("no_output").unwrap().error().unwrap();
    assert!(no_output.message.contains("Output not created"));

    assert_eq!(
        report.find("echo").unwrap().results()[0].value,
        Some(CommandOutcome::Completed("hi\n".to_string()))
    );

    let _ = std::fs::remove_dir_all(&dir);
}
