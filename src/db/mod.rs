use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

mod migrations;
pub mod transcripts;

pub use transcripts::TranscriptRecord;

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

/// Owns the thread that holds the connection. Dropping the last handle closes
/// the job channel, which ends the thread's loop, then joins it.
struct Worker {
    jobs: Option<mpsc::Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Transcript store thread panicked");
            }
        }
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open transcript store {}", path.display()))?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("failed to enable WAL journal")?;
    migrations::migrate(&mut conn)?;
    Ok(conn)
}

/// SQLite-backed transcript store. Connections are not `Sync`, so one thread
/// owns it and async callers queue closures onto that thread.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    path: Arc<PathBuf>,
}

impl Database {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let thread_path = path.clone();

        let thread = thread::Builder::new()
            .name("transcript-store".into())
            .spawn(move || {
                let mut conn = match open_connection(&thread_path) {
                    Ok(conn) => {
                        let _ = ready_tx.send(Ok(()));
                        conn
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                for job in jobs_rx {
                    job(&mut conn);
                }
            })
            .context("failed to spawn transcript store thread")?;

        ready_rx
            .recv()
            .context("transcript store thread exited during startup")??;
        info!("Transcript store ready at {}", path.display());

        Ok(Self {
            worker: Arc::new(Worker {
                jobs: Some(jobs_tx),
                thread: Some(thread),
            }),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `task` on the store thread and waits for its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            let _ = reply_tx.send(task(conn));
        });

        self.worker
            .jobs
            .as_ref()
            .ok_or_else(|| anyhow!("transcript store is shut down"))?
            .send(job)
            .map_err(|_| anyhow!("transcript store thread has stopped"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("transcript store dropped the request"))?
    }
}
