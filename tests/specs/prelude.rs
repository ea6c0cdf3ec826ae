//! Shared harness for the behavioral specs.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tm_engine::{EngineConfig, EngineEnv, Job, JobRegistry};
use tm_core::JobState;

pub struct Server {
    pub root: tempfile::TempDir,
    pub registry: Arc<JobRegistry>,
}

impl Server {
    /// A running engine over a fresh document root.
    pub fn start() -> Server {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("repository")).unwrap();
        let config = EngineConfig::new(root.path())
            .with_var_root(root.path().join("var"))
            .with_scheduler_interval(Duration::from_millis(100));
        let registry = JobRegistry::new(EngineEnv::new(config));
        registry.start();
        Server { root, registry }
    }

    pub fn env(&self) -> &Arc<EngineEnv> {
        self.registry.env()
    }

    pub fn write_ats(&self, name: &str, content: &str) {
        let path = self.root.path().join("repository").join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    /// Submit an ATS for an immediate run.
    pub fn submit_ats(&self, name: &str, source: &str) -> Arc<Job> {
        let job = Job::new_ats(self.env(), name, Some(source.to_string()), None);
        job.set_username("spec");
        job.set_scheduled_start(Some(self.env().clock.epoch() - 1.0));
        self.registry.submit(Arc::clone(&job)).unwrap();
        job
    }

    pub fn submit_campaign(&self, name: &str, source: &str) -> Arc<Job> {
        let job = Job::new_campaign(
            self.env(),
            name,
            Some(source.to_string()),
            Some(format!("/repository/{name}")),
        );
        job.set_username("spec");
        job.set_scheduled_start(Some(self.env().clock.epoch() - 1.0));
        self.registry.submit(Arc::clone(&job)).unwrap();
        job
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.registry.stop();
    }
}

/// Poll until the job reaches `state` or the timeout elapses.
pub fn wait_for_state(job: &Arc<Job>, state: JobState, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while job.state() != state {
        assert!(
            Instant::now() < deadline,
            "timeout waiting for {state}, job is {} (result {:?})",
            job.state(),
            job.result(),
        );
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Poll until the job is terminal.
pub fn wait_terminal(job: &Arc<Job>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while !job.state().is_terminal() {
        assert!(
            Instant::now() < deadline,
            "timeout waiting for a terminal state, job is {}",
            job.state(),
        );
        std::thread::sleep(Duration::from_millis(20));
    }
}
