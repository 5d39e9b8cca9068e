//! Listener loop: wait for `+CMTI`, then read, forward and delete
//!
//! The loop holds the session only for one poll window at a time, so send
//! requests queued on the arbiter get the device between windows.

use crate::client::SmsClient;
use crate::dispatcher::{BoxFuture, Dispatcher, NotificationHandler};
use crate::error::{Error, Result};
use crate::forwarder::MessageForwarder;
use crate::sms::SmsMessage;
use crate::transport::ModemStream;
use std::future::Future;
use tracing::{debug, error, info, warn};

/// Handler that moves each incoming message from modem storage to a forwarder.
pub struct FetchAndForward<S> {
    client: SmsClient<S>,
    forwarder: Box<dyn MessageForwarder>,
}

impl<S: ModemStream> FetchAndForward<S> {
    pub fn new(client: SmsClient<S>, forwarder: Box<dyn MessageForwarder>) -> Self {
        Self { client, forwarder }
    }

    /// Read, forward, then delete. The message stays on the modem if forwarding fails.
    pub async fn process(&mut self, storage: &str, index: u32) -> Result<()> {
        match self.client.read_message(storage, index).await? {
            Some(message) => self.forward_and_delete(&message).await,
            None => {
                debug!("Slot {}:{} is empty", storage, index);
                Ok(())
            }
        }
    }

    /// Forward and delete everything already in storage. Returns how many were moved.
    pub async fn sweep(&mut self, storage: &str) -> Result<usize> {
        let messages = self.client.list_messages(storage).await?;
        let mut moved = 0;
        for message in &messages {
            match self.forward_and_delete(message).await {
                Ok(()) => moved += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(
                    "Could not move stored message {}:{}: {}",
                    message.storage, message.index, e
                ),
            }
        }
        if moved > 0 {
            info!("Moved {} stored message(s) from {}", moved, storage);
        }
        Ok(moved)
    }

    async fn forward_and_delete(&mut self, message: &SmsMessage) -> Result<()> {
        self.forwarder.forward(message).await?;
        self.client
            .delete_message(&message.storage, message.index)
            .await
    }
}

impl<S: ModemStream> NotificationHandler for FetchAndForward<S> {
    fn on_incoming(&mut self, storage: String, index: u32) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.process(&storage, index).await })
    }
}

pub struct Listener<S> {
    client: SmsClient<S>,
    handler: FetchAndForward<S>,
}

impl<S: ModemStream> Listener<S> {
    pub fn new(client: SmsClient<S>, forwarder: Box<dyn MessageForwarder>) -> Self {
        let handler = FetchAndForward::new(client.clone(), forwarder);
        Self { client, handler }
    }

    /// Run until `shutdown` resolves or the device fails.
    ///
    /// The transport is closed on every exit path.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Listener { client, handler } = self;
        let result = Self::listen(&client, handler, shutdown).await;
        client.close().await;
        match &result {
            Ok(()) => info!("Listener stopped"),
            Err(e) => error!("Listener stopped: {}", e),
        }
        result
    }

    async fn listen<F>(
        client: &SmsClient<S>,
        mut handler: FetchAndForward<S>,
        shutdown: F,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let config = client.config().clone();
        if config.sweep_on_start {
            match handler.sweep(&config.storage).await {
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("Startup sweep failed: {}", e),
            }
        }

        let window = config.listen_window();
        let mut dispatcher = Dispatcher::new(Box::new(handler));
        info!("Listening for incoming messages");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    return Ok(());
                }
                polled = client.poll_notifications(window) => match polled {
                    Ok(notifications) => dispatcher.dispatch_all(notifications).await?,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(Error::Busy(waited)) => debug!("Listener waited {:?} for the session", waited),
                    Err(e) => warn!("Poll failed: {}", e),
                },
            }
        }
    }
}
