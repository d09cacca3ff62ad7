//! Integration Tests for Background Jobs
//!
//! Lists ending in `&` return at once with `background` set; the job table
//! tracks them until they finish or are terminated.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use snail::jobs::{JobEvent, Signal};
use snail::models::ResultState;
use snail::JobStatus;
use std::time::{Duration, Instant};
use test_utils::captured_session;

#[test]
fn test_background_returns_immediately() {
    let mut t = captured_session();
    let started = Instant::now();
    let result = t.session.run("sleep 2 &").unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));

    assert_eq!(result.state(), ResultState::Background);
    assert!(!result.continue_input);
    assert!(result.error.is_none());
    let job = result.job.expect("background result carries its job");
    assert!(t.session.jobs().get(job).unwrap().status.is_running());

    let status = t
        .session
        .jobs()
        .terminate(job, Duration::from_millis(500))
        .unwrap();
    assert!(!status.is_running());
}

#[test]
fn test_background_exit_status_is_recorded() {
    let mut t = captured_session();
    let job = t.session.run("sh -c 'exit 5' &").unwrap().job.unwrap();
    assert_eq!(t.session.jobs().wait(job).unwrap(), 5);
    assert_eq!(t.session.jobs().get(job).unwrap().status, JobStatus::Done(5));
}

#[test]
fn test_foreground_after_background_is_not_background() {
    let mut t = captured_session();
    let result = t.session.run("true & false").unwrap();
    assert_eq!(result.state(), ResultState::Exited(1));
    assert!(result.job.is_none());
    t.session.jobs().wait_all();
}

#[test]
fn test_status_after_background_is_zero() {
    let mut t = captured_session();
    t.session.run("false").unwrap();
    t.session.run("sh -c 'exit 9' &").unwrap();
    t.session.run("echo $?").unwrap();
    assert_eq!(t.take_stdout(), "0\n");
    t.session.jobs().wait_all();
}

#[test]
fn test_background_does_not_mutate_session() {
    let mut t = captured_session();
    let cwd = t.session.env().cwd().to_path_buf();
    let job = t.session.run("cd / && JOB_VAR=set &").unwrap().job.unwrap();
    t.session.jobs().wait(job).unwrap();

    assert_eq!(t.session.env().cwd(), cwd);
    assert!(t.session.env().get("JOB_VAR").is_none());
}

#[test]
fn test_wait_builtin_returns_job_status() {
    let mut t = captured_session();
    t.session.run("(exit 3) &").unwrap();
    let result = t.session.run("wait %1").unwrap();
    assert_eq!(result.exit_code, 3);
}

#[test]
fn test_jobs_builtin_lists_jobs() {
    let mut t = captured_session();
    let job = t.session.run("sleep 0 &").unwrap().job.unwrap();
    t.session.jobs().wait(job).unwrap();
    t.session.run("jobs").unwrap();
    let listing = t.take_stdout();
    assert!(listing.contains("[1] Done"));
    assert!(listing.contains("sleep 0"));
}

#[test]
fn test_reap_finished_removes_jobs() {
    let mut t = captured_session();
    let job = t.session.run("true &").unwrap().job.unwrap();
    t.session.jobs().wait(job).unwrap();

    let reaped = t.session.jobs().reap_finished();
    assert_eq!(reaped.len(), 1);
    assert!(t.session.jobs().get(job).is_none());
}

#[test]
fn test_terminate_long_running_job() {
    let mut t = captured_session();
    let job = t.session.run("sleep 30 &").unwrap().job.unwrap();
    std::thread::sleep(Duration::from_millis(100));

    let status = t
        .session
        .jobs()
        .terminate(job, Duration::from_millis(500))
        .unwrap();
    assert!(matches!(status, JobStatus::Terminated(_)));
    assert!(status.exit_code().unwrap() > 128);
}

#[test]
fn test_shutdown_stops_every_job() {
    let mut t = captured_session();
    t.session.run("sleep 30 &").unwrap();
    t.session.run("sleep 30 &").unwrap();
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(t.session.jobs().running(), 2);

    t.session.shutdown(Duration::from_millis(500));
    assert_eq!(t.session.jobs().running(), 0);
}

#[test]
fn test_signal_to_finished_job_is_noop() {
    let mut t = captured_session();
    let job = t.session.run("true &").unwrap().job.unwrap();
    t.session.jobs().wait(job).unwrap();
    assert!(t.session.jobs().signal(job, Signal::Terminate).is_ok());
    assert_eq!(t.session.jobs().get(job).unwrap().status, JobStatus::Done(0));
}

#[tokio::test]
async fn test_job_events_are_published() {
    let mut t = captured_session();
    let mut events = t.session.jobs().subscribe();
    let job = t.session.run("sh -c 'exit 2' &").unwrap().job.unwrap();

    let started = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(started, JobEvent::Started { id, .. } if id == job));

    let finished = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        finished,
        JobEvent::Finished {
            id: job,
            status: JobStatus::Done(2)
        }
    );
}
