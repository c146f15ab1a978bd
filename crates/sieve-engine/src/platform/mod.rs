//! Host collaborators
//!
//! The engine reaches storage, the network and the host's error reporting
//! only through these traits. Each has a default implementation that the
//! engine constructs on first use when the host supplies none.

mod error_callback;
mod file_system;
mod web_request;

pub use error_callback::{DefaultErrorCallback, ErrorCallback};
pub use file_system::{
    DefaultFileSystem, FileSystem, FsCallback, IoBuffer, ReadCallback, StatCallback, StatResult,
    SyncFileSystem,
};
pub use web_request::{
    DefaultWebRequest, HeaderList, RequestStatus, ResponseCallback, ServerResponse, WebRequest,
};

use crossbeam_channel::{Sender, unbounded};
use std::thread;
use tracing::warn;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Background thread draining a job queue in submission order.
///
/// If the thread cannot be started, or has gone away, jobs run inline on
/// the submitting thread so callbacks are still delivered.
pub(crate) struct Worker {
    name: &'static str,
    sender: Option<Sender<Job>>,
}

impl Worker {
    pub(crate) fn spawn(name: &'static str) -> Self {
        let (sender, receiver) = unbounded::<Job>();
        let spawned = thread::Builder::new().name(name.into()).spawn(move || {
            for job in receiver {
                job();
            }
        });
        match spawned {
            Ok(_) => Self {
                name,
                sender: Some(sender),
            },
            Err(e) => {
                warn!(worker = name, error = %e, "failed to start worker thread, running inline");
                Self { name, sender: None }
            }
        }
    }

    pub(crate) fn submit(&self, job: impl FnOnce() + Send + 'static) {
        let job: Job = Box::new(job);
        let Some(sender) = &self.sender else {
            job();
            return;
        };
        if let Err(rejected) = sender.send(job) {
            warn!(worker = self.name, "worker thread gone, running inline");
            (rejected.into_inner())();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::time::Duration;

    #[test]
    fn test_worker_runs_jobs_in_order() {
        let worker = Worker::spawn("sieve-test-worker");
        let (tx, rx) = bounded(3);
        for i in 0..3 {
            let tx = tx.clone();
            worker.submit(move || tx.send(i).unwrap());
        }
        let got: Vec<i32> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(got, vec![0, 1, 2]);
    }
}
