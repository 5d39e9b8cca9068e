//! Exclusive access to the session
//!
//! Every caller (listener loop, notification handler, send requests) goes
//! through one `Arbiter`. The tokio mutex hands the session out in FIFO order.

use crate::dispatcher::BoxFuture;
use crate::error::{Error, Result};
use crate::session::Session;
use crate::transport::ModemStream;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

pub struct Arbiter<S> {
    inner: Arc<Mutex<Session<S>>>,
    acquire_timeout: Duration,
}

impl<S> Clone for Arbiter<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            acquire_timeout: self.acquire_timeout,
        }
    }
}

impl<S: ModemStream> Arbiter<S> {
    pub fn new(session: Session<S>, acquire_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
            acquire_timeout,
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    /// Lock the session, waiting at most the acquire timeout.
    ///
    /// The guard releases the lock on drop, on every exit path.
    pub async fn acquire(&self) -> Result<MutexGuard<'_, Session<S>>> {
        match tokio::time::timeout(self.acquire_timeout, self.inner.lock()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                debug!("Session busy for {:?}", self.acquire_timeout);
                Err(Error::Busy(self.acquire_timeout))
            }
        }
    }

    /// Run `f` with the session locked. At most one caller runs at a time.
    ///
    /// ```ignore
    /// let frame = arbiter
    ///     .with_exclusive_access(|session| {
    ///         Box::pin(async move { session.execute("AT", Duration::from_secs(5)).await })
    ///     })
    ///     .await?;
    /// ```
    pub async fn with_exclusive_access<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut Session<S>) -> BoxFuture<'a, Result<T>>,
    {
        let mut guard = self.acquire().await?;
        f(&mut guard).await
    }

    /// Close the transport. Safe to call more than once.
    pub async fn close(&self) {
        let mut session = self.inner.lock().await;
        session.close().await;
    }
}
