//! Local control socket
//!
//! A running listener owns the serial device, so other processes hand their
//! send requests to it over a Unix socket: one JSON request line, one JSON
//! response line.

use crate::client::SmsClient;
use crate::error::{Error, Result};
use crate::transport::ModemStream;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

const MAX_REQUEST_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub phone: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResponse {
    pub ok: bool,
    #[serde(default)]
    pub references: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Raw modem error code for rejected sends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl SendResponse {
    fn from_result(result: Result<Vec<u32>>) -> Self {
        match result {
            Ok(references) => Self {
                ok: true,
                references,
                error: None,
                code: None,
            },
            Err(e) => {
                let code = match &e {
                    Error::ModemRejected { code, .. } => Some(code.to_string()),
                    _ => None,
                };
                Self {
                    ok: false,
                    references: Vec::new(),
                    error: Some(e.to_string()),
                    code,
                }
            }
        }
    }
}

/// Accept loop running as a managed task. Dropping it without `shutdown` leaves
/// the socket file behind.
pub struct ControlServer {
    path: PathBuf,
    task: JoinHandle<()>,
}

impl ControlServer {
    /// Bind `path` and serve send requests through `client`.
    pub fn spawn<S: ModemStream>(path: &Path, client: SmsClient<S>) -> Result<Self> {
        if path.exists() {
            // a previous run may have left it behind
            std::fs::remove_file(path)?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(path)?;
        info!("Control socket listening on {}", path.display());

        let task = tokio::spawn(accept_loop(listener, client));
        Ok(Self {
            path: path.to_path_buf(),
            task,
        })
    }

    /// Stop accepting, abort in-flight connections, remove the socket file.
    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!("Could not remove {}: {}", self.path.display(), e);
            }
        }
        debug!("Control socket closed");
    }
}

async fn accept_loop<S: ModemStream>(listener: UnixListener, client: SmsClient<S>) {
    let mut connections = JoinSet::new();
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            Some(_) = connections.join_next(), if !connections.is_empty() => continue,
        };
        match accepted {
            Ok((stream, _)) => {
                let client = client.clone();
                connections.spawn(async move {
                    if let Err(e) = serve_connection(stream, client).await {
                        warn!("Control connection failed: {}", e);
                    }
                });
            }
            Err(e) => warn!("Control socket accept failed: {}", e),
        }
    }
}

async fn serve_connection<S: ModemStream>(stream: UnixStream, client: SmsClient<S>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Ok(());
    }

    let response = if line.len() > MAX_REQUEST_LEN {
        SendResponse::from_result(Err(Error::Parse("request too large".to_string())))
    } else {
        match serde_json::from_str::<SendRequest>(line.trim()) {
            Ok(request) => {
                debug!("Control send to {}", request.phone);
                let result = client.send(&request.phone, &request.message).await;
                SendResponse::from_result(result.map(|report| report.references))
            }
            Err(e) => SendResponse::from_result(Err(Error::Json(e))),
        }
    };

    let mut out = serde_json::to_string(&response)?;
    out.push('\n');
    writer.write_all(out.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Hand `request` to a running listener. `None` if nobody is listening on `path`.
pub async fn send_via_socket(path: &Path, request: &SendRequest) -> Result<Option<SendResponse>> {
    let stream = match UnixStream::connect(path).await {
        Ok(stream) => stream,
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::ConnectionRefused) => {
            debug!("No listener on {}: {}", path.display(), e);
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let (reader, mut writer) = stream.into_split();
    let mut out = serde_json::to_string(request)?;
    out.push('\n');
    writer.write_all(out.as_bytes()).await?;
    writer.flush().await?;

    let mut line = String::new();
    BufReader::new(reader).read_line(&mut line).await?;
    if line.trim().is_empty() {
        return Err(Error::ProtocolViolation(
            "control socket closed without a response".to_string(),
        ));
    }
    Ok(Some(serde_json::from_str(line.trim())?))
}
