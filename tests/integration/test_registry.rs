//! Integration Tests for the Session Registry
//!
//! Sessions addressed by handle, configured from `Config`, run
//! concurrently and are torn down with their jobs.

use snail::config::{Config, SessionConfig};
use snail::{Error, SessionRegistry};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn registry_in(dir: &TempDir) -> SessionRegistry {
    let mut config = Config::default();
    config.session = SessionConfig {
        working_directory: Some(dir.path().to_path_buf()),
        inherit_environment: true,
        environment: HashMap::from([("SNAIL_TEST".to_string(), "configured".to_string())]),
    };
    config.jobs.kill_grace_period_ms = 500;
    SessionRegistry::new(config)
}

#[tokio::test]
async fn test_session_uses_configuration() {
    let dir = TempDir::new().unwrap();
    let registry = registry_in(&dir);
    let handle = registry.create().await.unwrap();

    let result = registry
        .run(handle, "test \"$SNAIL_TEST\" = configured && test \"$(pwd)\" = \"$PWD\"")
        .await
        .unwrap();
    assert_eq!(result.exit_code, 0);

    registry.run(handle, "touch made-here").await.unwrap();
    assert!(dir.path().join("made-here").exists());
}

#[tokio::test]
async fn test_invalid_working_directory_is_rejected() {
    let mut config = Config::default();
    config.session.working_directory = Some("/definitely/not/a/dir".into());
    let registry = SessionRegistry::new(config);
    assert!(matches!(
        registry.create().await,
        Err(Error::ConfigValidationFailed { .. })
    ));
    assert!(registry.is_empty().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sessions_run_concurrently() {
    let dir = TempDir::new().unwrap();
    let registry = registry_in(&dir);
    let a = registry.create().await.unwrap();
    let b = registry.create().await.unwrap();

    let started = Instant::now();
    let (ra, rb) = tokio::join!(
        registry.run(a, "sleep 0.5"),
        registry.run(b, "sleep 0.5")
    );
    assert_eq!(ra.unwrap().exit_code, 0);
    assert_eq!(rb.unwrap().exit_code, 0);
    assert!(started.elapsed() < Duration::from_millis(950));
}

#[tokio::test]
async fn test_calls_on_one_session_are_ordered() {
    let dir = TempDir::new().unwrap();
    let registry = registry_in(&dir);
    let handle = registry.create().await.unwrap();

    let first = registry.run(handle, "COUNT=1");
    let second = registry.run(handle, "test \"$COUNT\" = 1");
    let (first, second) = tokio::join!(first, second);
    assert_eq!(first.unwrap().exit_code, 0);
    assert_eq!(second.unwrap().exit_code, 0);
}

#[tokio::test]
async fn test_multi_line_input_through_registry() {
    let dir = TempDir::new().unwrap();
    let registry = registry_in(&dir);
    let handle = registry.create().await.unwrap();

    let first = registry.run(handle, "cat <<EOF > note.txt").await.unwrap();
    assert!(first.continue_input && first.newline);
    registry.run(handle, "kept").await.unwrap();
    let done = registry.run(handle, "EOF").await.unwrap();
    assert_eq!(done.exit_code, 0);

    let note = std::fs::read_to_string(dir.path().join("note.txt")).unwrap();
    assert_eq!(note, "kept\n");
}

#[tokio::test]
async fn test_remove_terminates_jobs() {
    let dir = TempDir::new().unwrap();
    let registry = registry_in(&dir);
    let handle = registry.create().await.unwrap();

    let result = registry.run(handle, "sleep 30 &").await.unwrap();
    assert!(result.background);

    let started = Instant::now();
    registry.remove(handle).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!registry.contains(handle).await);
    assert!(matches!(
        registry.run(handle, "true").await,
        Err(Error::SessionNotFound { .. })
    ));
}

#[tokio::test]
async fn test_sessions_do_not_share_state() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    let registry = registry_in(&dir);
    let a = registry.create().await.unwrap();
    let b = registry.create().await.unwrap();

    let setup = registry
        .run(a, "cd sub && X=1 && export SHARED=from-a")
        .await
        .unwrap();
    assert_eq!(setup.exit_code, 0);

    let in_a = registry
        .run(a, "test \"$X\" = 1 && test \"$SHARED\" = from-a && touch from-a")
        .await
        .unwrap();
    assert_eq!(in_a.exit_code, 0);

    let in_b = registry
        .run(b, "test -z \"$X\" && test -z \"$SHARED\" && touch from-b")
        .await
        .unwrap();
    assert_eq!(in_b.exit_code, 0);

    assert!(dir.path().join("sub").join("from-a").exists());
    assert!(dir.path().join("from-b").exists());
    assert!(!dir.path().join("sub").join("from-b").exists());
}
