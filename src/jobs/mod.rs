//! Background job table
//!
//! Every session owns one [`JobTable`]. A list terminated by `&` is handed
//! to [`JobTable::spawn`], which runs it on its own thread and records the
//! outcome. Clones of the table share state, so the executor running a job
//! and the host inspecting it see the same entries.

pub mod signals;

pub use crate::models::job::{JobEvent, JobId, JobInfo, JobStatus};
pub use signals::Signal;

use crate::error::{Error, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

struct JobEntry {
    info: JobInfo,
    cancel: Arc<AtomicBool>,
    /// Signal that ended the job, when it was stopped through the table
    ended_by: Option<Signal>,
}

#[derive(Default)]
struct JobState {
    next_id: u32,
    jobs: BTreeMap<JobId, JobEntry>,
    subscribers: Vec<mpsc::UnboundedSender<JobEvent>>,
}

impl JobState {
    fn publish(&mut self, event: JobEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

#[derive(Default)]
struct Shared {
    state: Mutex<JobState>,
    changed: Condvar,
}

/// Table of a session's background jobs
#[derive(Clone, Default)]
pub struct JobTable {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for JobTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobTable")
            .field("jobs", &self.list().len())
            .finish()
    }
}

/// Handle given to the code running a job
#[derive(Debug, Clone)]
pub struct JobContext {
    id: JobId,
    table: JobTable,
    cancel: Arc<AtomicBool>,
}

impl JobContext {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Set once the job has been asked to stop
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Record a child process spawned for this job
    pub fn track(&self, pid: u32) {
        let mut state = self.table.lock();
        if let Some(entry) = state.jobs.get_mut(&self.id) {
            entry.info.pids.push(pid);
        }
    }

    /// Forget a child process once it has been reaped
    pub fn untrack(&self, pid: u32) {
        let mut state = self.table.lock();
        if let Some(entry) = state.jobs.get_mut(&self.id) {
            entry.info.pids.retain(|p| *p != pid);
        }
    }
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        match self.shared.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Run `work` on a new thread as a background job
    ///
    /// `work` returns the job's exit status.
    pub fn spawn<F>(&self, command: impl Into<String>, work: F) -> Result<JobId>
    where
        F: FnOnce(JobContext) -> i32 + Send + 'static,
    {
        let command = command.into();
        let cancel = Arc::new(AtomicBool::new(false));
        let id = {
            let mut state = self.lock();
            state.next_id += 1;
            let id = JobId(state.next_id);
            state.jobs.insert(
                id,
                JobEntry {
                    info: JobInfo {
                        id,
                        command: command.clone(),
                        status: JobStatus::Running,
                        pids: Vec::new(),
                        started_at: Utc::now(),
                        finished_at: None,
                    },
                    cancel: cancel.clone(),
                    ended_by: None,
                },
            );
            state.publish(JobEvent::Started {
                id,
                command: command.clone(),
            });
            id
        };

        let context = JobContext {
            id,
            table: self.clone(),
            cancel,
        };
        let table = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("snail-job-{}", id))
            .spawn(move || {
                let status = work(context);
                table.finish(id, status);
            });

        if let Err(e) = spawned {
            self.finish(id, 126);
            return Err(Error::Io(e));
        }

        info!("Started job [{}]: {}", id, command);
        Ok(id)
    }

    fn finish(&self, id: JobId, code: i32) {
        let mut state = self.lock();
        let Some(entry) = state.jobs.get_mut(&id) else {
            return;
        };
        let status = match entry.ended_by {
            Some(signal) => JobStatus::Terminated(signal),
            None => JobStatus::Done(code),
        };
        entry.info.status = status;
        entry.info.finished_at = Some(Utc::now());
        entry.info.pids.clear();
        state.publish(JobEvent::Finished { id, status });
        drop(state);

        self.shared.changed.notify_all();
        info!("Job [{}] finished: {}", id, status);
    }

    /// Snapshot of every job, in id order
    pub fn list(&self) -> Vec<JobInfo> {
        self.lock()
            .jobs
            .values()
            .map(|entry| entry.info.clone())
            .collect()
    }

    pub fn get(&self, id: JobId) -> Option<JobInfo> {
        self.lock().jobs.get(&id).map(|entry| entry.info.clone())
    }

    /// Number of jobs still running
    pub fn running(&self) -> usize {
        self.lock()
            .jobs
            .values()
            .filter(|entry| entry.info.status.is_running())
            .count()
    }

    /// Most recently started job
    pub fn last(&self) -> Option<JobId> {
        self.lock().jobs.keys().next_back().copied()
    }

    /// Block until the job finishes; returns its exit status
    pub fn wait(&self, id: JobId) -> Result<i32> {
        let mut state = self.lock();
        loop {
            let entry = state
                .jobs
                .get(&id)
                .ok_or(Error::JobNotFound { job_id: id.0 })?;
            if let Some(code) = entry.info.status.exit_code() {
                return Ok(code);
            }
            state = match self.shared.changed.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Like [`JobTable::wait`], giving up after `timeout` with `Ok(None)`
    pub fn wait_timeout(&self, id: JobId, timeout: Duration) -> Result<Option<i32>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            let entry = state
                .jobs
                .get(&id)
                .ok_or(Error::JobNotFound { job_id: id.0 })?;
            if let Some(code) = entry.info.status.exit_code() {
                return Ok(Some(code));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            state = match self.shared.changed.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Block until no job is running; returns the status of the last job
    pub fn wait_all(&self) -> i32 {
        let mut state = self.lock();
        loop {
            if state.jobs.values().all(|entry| !entry.info.status.is_running()) {
                return state
                    .jobs
                    .values()
                    .next_back()
                    .and_then(|entry| entry.info.status.exit_code())
                    .unwrap_or(0);
            }
            state = match self.shared.changed.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Remove finished jobs from the table and return them
    pub fn reap_finished(&self) -> Vec<JobInfo> {
        let mut state = self.lock();
        let finished: Vec<JobId> = state
            .jobs
            .iter()
            .filter(|(_, entry)| !entry.info.status.is_running())
            .map(|(id, _)| *id)
            .collect();
        finished
            .into_iter()
            .filter_map(|id| state.jobs.remove(&id).map(|entry| entry.info))
            .collect()
    }

    /// Receive [`JobEvent`]s from now on
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<JobEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push(tx);
        rx
    }

    /// Deliver `signal` to every process of a running job
    ///
    /// Fatal signals also cancel the job, so a job running only builtins
    /// stops at its next command.
    pub fn signal(&self, id: JobId, signal: Signal) -> Result<()> {
        let pids = {
            let mut state = self.lock();
            let entry = state
                .jobs
                .get_mut(&id)
                .ok_or(Error::JobNotFound { job_id: id.0 })?;
            if !entry.info.status.is_running() {
                debug!("Job [{}] already finished, not sending {}", id, signal);
                return Ok(());
            }
            if signal.is_fatal() {
                entry.cancel.store(true, Ordering::SeqCst);
                entry.ended_by.get_or_insert(signal);
            }
            entry.info.pids.clone()
        };

        let mut failure = None;
        for pid in pids {
            if let Err(e) = signals::send_signal_to_pid(pid, signal) {
                // The process may have exited between snapshot and delivery
                if signals::is_process_running(pid) {
                    warn!("Failed to send {} to job [{}] pid {}: {}", signal, id, pid, e);
                    failure = Some(e);
                }
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// SIGTERM, then SIGKILL if the job outlives `grace`; returns the final status
    pub fn terminate(&self, id: JobId, grace: Duration) -> Result<JobStatus> {
        self.signal(id, Signal::Terminate)?;
        if self.wait_timeout(id, grace)?.is_none() {
            warn!("Job [{}] ignored SIGTERM, sending SIGKILL", id);
            self.signal(id, Signal::Kill)?;
            if self.wait_timeout(id, grace)?.is_none() {
                warn!("Job [{}] still running after SIGKILL", id);
            }
        }
        self.get(id)
            .map(|info| info.status)
            .ok_or(Error::JobNotFound { job_id: id.0 })
    }

    /// Terminate every running job
    pub fn terminate_all(&self, grace: Duration) {
        let running: Vec<JobId> = self
            .list()
            .into_iter()
            .filter(|info| info.status.is_running())
            .map(|info| info.id)
            .collect();
        for id in running {
            if let Err(e) = self.terminate(id, grace) {
                warn!("Failed to terminate job [{}]: {}", id, e);
            }
        }
    }
}
