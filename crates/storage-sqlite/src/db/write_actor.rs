//! Single writer thread owning one pooled connection.
//!
//! Every write runs as a closure on this thread inside an immediate
//! transaction, so writers never contend for the SQLite write lock. Dropping
//! the last handle joins the thread, so its connection is closed by the time
//! the drop returns.

use std::sync::Arc;
use std::thread::JoinHandle;

use diesel::SqliteConnection;
use log::{debug, error};
use tokio::sync::{mpsc, oneshot};

use clientfolio_core::Result;

use super::DbPool;
use crate::errors::StorageError;

type Job = Box<dyn FnOnce(&mut SqliteConnection) + Send>;

/// Handle used to submit write closures to the writer thread.
#[derive(Clone, Debug)]
pub struct WriteHandle {
    inner: Arc<Writer>,
}

#[derive(Debug)]
struct Writer {
    tx: Option<mpsc::UnboundedSender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for Writer {
    fn drop(&mut self) {
        // Closing the channel ends the thread's receive loop.
        self.tx.take();
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == std::thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            error!("[Storage] Writer thread panicked");
        }
    }
}

enum TxError {
    Diesel(diesel::result::Error),
    Job(clientfolio_core::Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        TxError::Diesel(err)
    }
}

pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
    let spawned = std::thread::Builder::new()
        .name("clientfolio-db-writer".to_string())
        .spawn(move || {
            let mut conn = match pool.get() {
                Ok(conn) => conn,
                Err(err) => {
                    error!("[Storage] Writer could not acquire a connection: {}", err);
                    return;
                }
            };
            debug!("[Storage] Writer started");
            while let Some(job) = rx.blocking_recv() {
                job(&mut conn);
            }
            debug!("[Storage] Writer stopped");
        });
    let thread = match spawned {
        Ok(thread) => Some(thread),
        Err(err) => {
            error!("[Storage] Failed to spawn writer thread: {}", err);
            None
        }
    };
    WriteHandle {
        inner: Arc::new(Writer {
            tx: Some(tx),
            thread,
        }),
    }
}

impl WriteHandle {
    /// Runs `job` on the writer thread inside an immediate transaction.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel::<Result<T>>();
        let job: Job = Box::new(move |conn: &mut SqliteConnection| {
            let result = conn
                .immediate_transaction::<T, TxError, _>(|tx_conn| job(tx_conn).map_err(TxError::Job))
                .map_err(|err| match err {
                    TxError::Diesel(err) => StorageError::from(err).into(),
                    TxError::Job(err) => err,
                });
            let _ = reply_tx.send(result);
        });

        self.inner
            .tx
            .as_ref()
            .ok_or(StorageError::WriterClosed)?
            .send(job)
            .map_err(|_| StorageError::WriterClosed)?;
        reply_rx.await.map_err(|_| StorageError::WriterClosed)?
    }
}
