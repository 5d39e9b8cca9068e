//! In-process fake AIR780E for integration tests
//!
//! The fake sits on the far end of a `tokio::io::duplex` pipe. It splits
//! incoming bytes into `\r`-terminated commands, asks a responder what to send
//! back, and handles the `AT+CMGS` input prompt up to Ctrl-Z.

#![allow(dead_code)]

use air780e_sms::commands;
use air780e_sms::transport::Transport;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const CTRL_Z: u8 = 0x1A;
const ESC: u8 = 0x1B;

/// Log marker written when a command arrives while another is still unanswered
pub const OVERLAP: &str = "<OVERLAP>";

pub enum Reply {
    /// Written back as-is
    Raw(String),
    /// Written after a delay, watching for commands sent in the meantime
    Delayed(Duration, String),
    /// Input prompt; the string is written after the payload's Ctrl-Z
    Prompt(String),
    /// No answer at all
    Silent,
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Raw("\r\nOK\r\n".to_string())
    }
}

/// Echo then OK for everything, with a manufacturer string and one
/// successful send.
pub fn standard(command: &str) -> Reply {
    if command == commands::MANUFACTURER {
        return Reply::Raw(format!("{}\r\r\nAirM2M\r\n\r\nOK\r\n", command));
    }
    if command.starts_with("AT+CMGS=") {
        return Reply::Prompt("\r\n+CMGS: 7\r\n\r\nOK\r\n".to_string());
    }
    Reply::Raw(format!("{}\r\r\nOK\r\n", command))
}

enum Event {
    Read(usize),
    Inject(Vec<u8>),
    Closed,
}

pub struct FakeModem {
    log: Arc<Mutex<Vec<String>>>,
    inject: mpsc::UnboundedSender<Vec<u8>>,
    task: JoinHandle<()>,
}

impl FakeModem {
    /// Start a fake answering with `responder`; returns the engine's end of the pipe.
    pub fn spawn<F>(responder: F) -> (Transport<DuplexStream>, FakeModem)
    where
        F: FnMut(&str) -> Reply + Send + 'static,
    {
        let (engine, modem) = tokio::io::duplex(8192);
        let log = Arc::new(Mutex::new(Vec::new()));
        let (inject, inject_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(modem, responder, Arc::clone(&log), inject_rx));
        (
            Transport::new(engine, "fake-modem"),
            FakeModem { log, inject, task },
        )
    }

    /// Write unsolicited bytes, e.g. `"\r\n+CMTI: \"ME\",3\r\n"`.
    pub fn inject(&self, raw: &str) {
        let _ = self.inject.send(raw.as_bytes().to_vec());
    }

    /// Commands and payloads seen so far, in order. Payloads are logged as
    /// `PAYLOAD:<text>`.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.log().iter().filter(|l| l.starts_with(prefix)).count()
    }

    /// Wait until `prefix` shows up in the log.
    pub async fn wait_for(&self, prefix: &str, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        while tokio::time::Instant::now() < deadline {
            if self.count(prefix) > 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

async fn run<F>(
    mut stream: DuplexStream,
    mut responder: F,
    log: Arc<Mutex<Vec<String>>>,
    mut inject_rx: mpsc::UnboundedReceiver<Vec<u8>>,
) where
    F: FnMut(&str) -> Reply + Send + 'static,
{
    let mut buf: Vec<u8> = Vec::new();
    let mut after_payload: Option<String> = None;
    let mut chunk = [0u8; 1024];

    loop {
        let event = tokio::select! {
            read = stream.read(&mut chunk) => match read {
                Ok(0) | Err(_) => Event::Closed,
                Ok(n) => Event::Read(n),
            },
            Some(raw) = inject_rx.recv() => Event::Inject(raw),
        };
        match event {
            Event::Closed => return,
            Event::Read(n) => buf.extend_from_slice(&chunk[..n]),
            Event::Inject(raw) => {
                if stream.write_all(&raw).await.is_err() {
                    return;
                }
                continue;
            }
        }

        loop {
            if let Some(reply) = after_payload.take() {
                let Some(pos) = buf.iter().position(|b| *b == CTRL_Z || *b == ESC) else {
                    after_payload = Some(reply);
                    break;
                };
                let bytes: Vec<u8> = buf.drain(..=pos).collect();
                if bytes[pos] == ESC {
                    log.lock().unwrap().push("<ESC>".to_string());
                    continue;
                }
                let payload = String::from_utf8_lossy(&bytes[..pos]).into_owned();
                log.lock().unwrap().push(format!("PAYLOAD:{}", payload));
                if stream.write_all(reply.as_bytes()).await.is_err() {
                    return;
                }
                continue;
            }

            if let Some(pos) = buf.iter().position(|b| *b == ESC) {
                buf.remove(pos);
                log.lock().unwrap().push("<ESC>".to_string());
                continue;
            }

            let Some(pos) = buf.iter().position(|b| *b == b'\r') else {
                break;
            };
            let line: Vec<u8> = buf.drain(..=pos).collect();
            let command = String::from_utf8_lossy(&line[..pos]).trim().to_string();
            if command.is_empty() {
                continue;
            }
            log.lock().unwrap().push(command.clone());

            match responder(&command) {
                Reply::Raw(text) => {
                    if stream.write_all(text.as_bytes()).await.is_err() {
                        return;
                    }
                }
                Reply::Delayed(delay, text) => {
                    tokio::time::sleep(delay).await;
                    // anything already waiting was sent before this answer
                    if let Ok(Ok(n)) =
                        tokio::time::timeout(Duration::ZERO, stream.read(&mut chunk)).await
                    {
                        if n > 0 {
                            log.lock().unwrap().push(OVERLAP.to_string());
                            buf.extend_from_slice(&chunk[..n]);
                        }
                    }
                    if stream.write_all(text.as_bytes()).await.is_err() {
                        return;
                    }
                }
                Reply::Prompt(reply) => {
                    if stream.write_all(b"\r\n> ").await.is_err() {
                        return;
                    }
                    after_payload = Some(reply);
                }
                Reply::Silent => {}
            }
        }
    }
}
