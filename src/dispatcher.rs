//! Unsolicited result codes and their handler
//!
//! Notifications are dispatched strictly in wire order: the handler for one
//! finishes before the next starts.

use crate::error::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, error, warn};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

static CMTI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\+CMTI:\s*"([^"]*)"\s*,\s*(\d+)"#).unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// `+CMTI: "<storage>",<index>`: a message was stored
    IncomingMessage { storage: String, index: u32 },
    Unknown { raw: String },
}

impl Notification {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if let Some(caps) = CMTI_RE.captures(line) {
            if let Ok(index) = caps[2].parse::<u32>() {
                return Notification::IncomingMessage {
                    storage: caps[1].to_string(),
                    index,
                };
            }
        }
        Notification::Unknown {
            raw: line.to_string(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Notification::Unknown { .. })
    }
}

/// Async callback for incoming-message notifications.
///
/// The handler issues its own commands through the arbiter like any other caller.
pub trait NotificationHandler: Send {
    fn on_incoming(&mut self, storage: String, index: u32) -> BoxFuture<'_, Result<()>>;
}

pub struct Dispatcher {
    handler: Box<dyn NotificationHandler>,
}

impl Dispatcher {
    pub fn new(handler: Box<dyn NotificationHandler>) -> Self {
        Self { handler }
    }

    /// Deliver one notification. Only fatal device errors are returned.
    pub async fn dispatch(&mut self, notification: Notification) -> Result<()> {
        match notification {
            Notification::IncomingMessage { storage, index } => {
                debug!("Dispatching incoming message {}:{}", storage, index);
                match self.handler.on_incoming(storage.clone(), index).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.is_fatal() => {
                        error!("Handler for {}:{} hit a fatal error: {}", storage, index, e);
                        Err(e)
                    }
                    Err(e) => {
                        warn!("Handler for {}:{} failed: {}", storage, index, e);
                        Ok(())
                    }
                }
            }
            Notification::Unknown { raw } => {
                debug!("Dropping unsolicited line {:?}", raw);
                Ok(())
            }
        }
    }

    /// Deliver a batch in order, stopping at the first fatal error.
    pub async fn dispatch_all(&mut self, notifications: Vec<Notification>) -> Result<()> {
        for notification in notifications {
            self.dispatch(notification).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        seen: Arc<Mutex<Vec<(String, u32)>>>,
        fail_with: Option<fn() -> Error>,
    }

    impl NotificationHandler for Recorder {
        fn on_incoming(&mut self, storage: String, index: u32) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                self.seen.lock().unwrap().push((storage, index));
                match self.fail_with {
                    Some(make) => Err(make()),
                    None => Ok(()),
                }
            })
        }
    }

    #[test]
    fn test_parse_cmti() {
        assert_eq!(
            Notification::parse("+CMTI: \"ME\",3"),
            Notification::IncomingMessage {
                storage: "ME".to_string(),
                index: 3
            }
        );
        assert_eq!(
            Notification::parse("+CMTI:\"SM\", 12 "),
            Notification::IncomingMessage {
                storage: "SM".to_string(),
                index: 12
            }
        );
        assert!(Notification::parse("+CMTI: ME,3").is_unknown());
        assert!(Notification::parse("RDY").is_unknown());
    }

    #[tokio::test]
    async fn test_dispatch_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new(Box::new(Recorder {
            seen: seen.clone(),
            fail_with: None,
        }));

        dispatcher
            .dispatch_all(vec![
                Notification::parse("+CMTI: \"ME\",1"),
                Notification::parse("+CREG: 1"),
                Notification::parse("+CMTI: \"SM\",2"),
            ])
            .await
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![("ME".to_string(), 1), ("SM".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn test_handler_errors_contained() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new(Box::new(Recorder {
            seen: seen.clone(),
            fail_with: Some(|| Error::Parse("bad message".to_string())),
        }));
        assert!(dispatcher
            .dispatch(Notification::parse("+CMTI: \"ME\",1"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_fatal_handler_error_propagates() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new(Box::new(Recorder {
            seen: seen.clone(),
            fail_with: Some(|| Error::DeviceClosed),
        }));
        let result = dispatcher
            .dispatch_all(vec![
                Notification::parse("+CMTI: \"ME\",1"),
                Notification::parse("+CMTI: \"ME\",2"),
            ])
            .await;
        assert!(matches!(result, Err(Error::DeviceClosed)));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
