use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use librclone::{
    DaemonConfig, DaemonSupervisor, Operations, Rclone, RcloneError, RcloneVolume,
    StaticMetadataStore,
};
use serial_test::serial;

/// Write an executable shell script standing in for the rclone binary.
fn fake_rclone(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("rclone");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn supervisor(rclone_bin: PathBuf) -> DaemonSupervisor {
    DaemonSupervisor::new(DaemonConfig {
        rclone_bin,
        ..Default::default()
    })
}

#[tokio::test]
#[serial]
async fn exit_status_is_reported_as_is() {
    let dir = tempfile::tempdir().unwrap();
    let bin = fake_rclone(dir.path(), "echo starting\necho failing >&2\nexit 3");

    let mut handle = supervisor(bin).start().unwrap();
    let status = handle.wait().await.unwrap();
    assert_eq!(status.code(), Some(3));

    // Already exited: both are no-ops.
    handle.kill().await.unwrap();
    assert_eq!(handle.wait().await.unwrap().code(), Some(3));
}

#[tokio::test]
#[serial]
async fn kill_stops_the_daemon_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let bin = fake_rclone(dir.path(), "exec sleep 30");

    let mut handle = supervisor(bin).start().unwrap();
    assert!(handle.id().is_some());
    handle.kill().await.unwrap();
    handle.kill().await.unwrap();

    let status = handle.wait().await.unwrap();
    assert!(!status.success());
}

#[tokio::test]
#[serial]
async fn kill_reaches_the_whole_process_group() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("grandchild.pid");
    let bin = fake_rclone(
        dir.path(),
        &format!("sleep 30 &\necho $! > {}\nwait", marker.display()),
    );

    let mut handle = supervisor(bin).start().unwrap();
    for _ in 0..50 {
        if std::fs::read_to_string(&marker).is_ok_and(|s| !s.trim().is_empty()) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    let grandchild: i32 = std::fs::read_to_string(&marker)
        .unwrap()
        .trim()
        .parse()
        .unwrap();

    handle.kill().await.unwrap();
    // The grandchild may linger as a zombie until init reaps it; give it a moment.
    let mut alive = true;
    for _ in 0..50 {
        let stat = std::fs::read_to_string(format!("/proc/{grandchild}/stat"));
        alive = match stat {
            Ok(stat) => !stat.contains(") Z"),
            Err(_) => false,
        };
        if !alive {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(!alive);
}

#[tokio::test]
#[serial]
async fn daemon_gets_a_private_empty_config_store() {
    let dir = tempfile::tempdir().unwrap();
    let args_file = dir.path().join("args");
    let bin = fake_rclone(
        dir.path(),
        &format!("echo \"$@\" > {}\nexec sleep 30", args_file.display()),
    );

    let mut handle = supervisor(bin).start().unwrap();
    let config_path = handle.config_path().to_path_buf();
    let meta = std::fs::metadata(&config_path).unwrap();
    assert_eq!(meta.len(), 0);
    assert_eq!(meta.permissions().mode() & 0o777, 0o600);

    let mut args = String::new();
    for _ in 0..50 {
        args = std::fs::read_to_string(&args_file).unwrap_or_default();
        if !args.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(args.starts_with("rcd --rc-addr=localhost:5572"));
    assert!(args.contains("--rc-no-auth"));
    assert!(args.contains(&format!("--config={}", config_path.display())));

    handle.kill().await.unwrap();
    drop(handle);
    assert!(!config_path.exists());
}

#[tokio::test]
#[serial]
async fn missing_binary_fails_to_start() {
    let err = supervisor(PathBuf::from("/nonexistent/rclone"))
        .start()
        .unwrap_err();
    assert!(matches!(err, RcloneError::Io(_)));
}

fn operations(rclone_bin: PathBuf) -> Rclone {
    let config = DaemonConfig {
        rclone_bin,
        ..Default::default()
    };
    Rclone::new(&config, Arc::new(StaticMetadataStore::new())).unwrap()
}

#[tokio::test]
#[serial]
async fn create_volume_runs_mkdir() {
    let dir = tempfile::tempdir().unwrap();
    let args_file = dir.path().join("args");
    let bin = fake_rclone(dir.path(), &format!("echo \"$@\" > {}", args_file.display()));
    let params = HashMap::from([("s3-region".to_owned(), "eu".to_owned())]);

    operations(bin)
        .create_volume("vol-1", "s3", "bucket", Path::new("/etc/rclone.conf"), &params)
        .await
        .unwrap();

    let args = std::fs::read_to_string(&args_file).unwrap();
    assert_eq!(
        args.trim_end(),
        "mkdir s3:bucket/vol-1 --config=/etc/rclone.conf --s3-region=eu"
    );
}

#[tokio::test]
#[serial]
async fn delete_volume_failure_carries_output() {
    let dir = tempfile::tempdir().unwrap();
    let bin = fake_rclone(dir.path(), "echo directory not found >&2\nexit 1");
    let volume = RcloneVolume {
        remote: "s3".into(),
        remote_path: "bucket/vol-1".into(),
        id: "vol-1".into(),
    };

    let err = operations(bin)
        .delete_volume(&volume, Path::new("/etc/rclone.conf"), &HashMap::new())
        .await
        .unwrap_err();

    let msg = err.to_string();
    assert!(msg.starts_with("purge failed: exit status 1"));
    assert!(msg.contains("remotePath: 'bucket/vol-1'"));
    assert!(msg.contains("directory not found"));
}

#[tokio::test]
#[serial]
async fn command_output_keeps_write_order() {
    let dir = tempfile::tempdir().unwrap();
    let bin = fake_rclone(
        dir.path(),
        "echo first >&2\necho second\necho third >&2\nexit 2",
    );

    let err = operations(bin)
        .create_volume("vol-1", "s3", "bucket", Path::new("/etc/rclone.conf"), &HashMap::new())
        .await
        .unwrap_err();

    match err {
        RcloneError::Command { reason, output, .. } => {
            assert_eq!(reason, "exit status 2");
            assert_eq!(output, "first\nsecond\nthird\n");
        }
        other => panic!("unexpected error: {other}"),
    }
}
