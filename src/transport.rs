//! Serial transport
//!
//! Owns the byte stream to the modem. Production code opens a
//! `tokio_serial::SerialStream`; tests hand in one end of `tokio::io::duplex`.

use crate::error::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info};

const READ_CHUNK: usize = 1024;

/// Any async byte stream the engine can drive.
pub trait ModemStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> ModemStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

pub struct Transport<S> {
    stream: Option<S>,
    label: String,
}

impl Transport<tokio_serial::SerialStream> {
    /// Open a serial device, 8N1, no flow control.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let stream = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()?;
        info!("Opened {} at {} baud", path, baud_rate);
        Ok(Self::new(stream, path))
    }
}

impl<S: ModemStream> Transport<S> {
    pub fn new(stream: S, label: impl Into<String>) -> Self {
        Self {
            stream: Some(stream),
            label: label.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    fn stream(&mut self) -> Result<&mut S> {
        self.stream.as_mut().ok_or(Error::DeviceClosed)
    }

    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.stream()?;
        stream.write_all(bytes).await.map_err(Error::Device)?;
        stream.flush().await.map_err(Error::Device)?;
        debug!(bytes = bytes.len(), "tx {:?}", String::from_utf8_lossy(bytes));
        Ok(())
    }

    /// Next chunk of bytes, or `None` if nothing arrived before `deadline`.
    pub async fn read_chunk(&mut self, deadline: Instant) -> Result<Option<Vec<u8>>> {
        let stream = self.stream()?;
        let mut buf = vec![0u8; READ_CHUNK];
        match tokio::time::timeout_at(deadline, stream.read(&mut buf)).await {
            Err(_) => Ok(None),
            Ok(Ok(0)) => Err(Error::Device(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "serial device disappeared",
            ))),
            Ok(Ok(n)) => {
                buf.truncate(n);
                debug!(bytes = n, "rx {:?}", String::from_utf8_lossy(&buf));
                Ok(Some(buf))
            }
            Ok(Err(e)) => Err(Error::Device(e)),
        }
    }

    /// Release the device. Only the first call does anything.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            info!("Closed {}", self.label);
        }
    }
}
