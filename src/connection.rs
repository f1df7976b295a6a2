use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

use crate::error::ConnectionError;

pub type ConnectionResult<T> = Result<T, ConnectionError>;

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
    pub response_timeout: Duration,
    pub banner_timeout: Duration,
    pub recv_buffer_size: usize,
}

/// A single client session with the PiHub server.
///
/// The protocol has no response framing: every `receive` is one bounded read and whatever it
/// returns is treated as the whole response. A slow link can therefore split a reply across
/// two reads, and the tail then shows up as the response to the next command.
pub struct Connection {
    stream: TcpStream,
    settings: ConnectionSettings,
    buffer: Vec<u8>,
}

impl Connection {
    pub async fn open(
        host: &str,
        port: u16,
        settings: ConnectionSettings,
    ) -> ConnectionResult<Self> {
        let addr = format!("{}:{}", host, port);
        let stream = match timeout(settings.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ConnectionError::Connect { addr, source }),
            Err(_) => {
                return Err(ConnectionError::Connect {
                    addr,
                    source: std::io::ErrorKind::TimedOut.into(),
                })
            }
        };
        // Commands are tiny and each one waits for its reply; don't let Nagle hold them back.
        let _ = stream.set_nodelay(true);
        tracing::debug!("Connected to {}", addr);
        Ok(Self {
            stream,
            buffer: vec![0; settings.recv_buffer_size],
            settings,
        })
    }

    /// Best effort: the greeting is read once and thrown away. Returns it when one arrived so
    /// the caller can log it.
    pub async fn drain_banner(&mut self) -> Option<String> {
        match self.read_once(self.settings.banner_timeout).await {
            Ok(banner) => Some(banner),
            Err(err) => {
                tracing::debug!("No banner received: {}", err);
                None
            }
        }
    }

    /// Writes `command` plus the line terminator. A peer that stops reading fills the socket
    /// buffer; after `send_timeout` that counts as a failed write, since part of the line may
    /// already be on the wire.
    pub async fn send_command(&mut self, command: &str) -> ConnectionResult<()> {
        let mut line = String::with_capacity(command.len() + 1);
        line.push_str(command);
        line.push('\n');
        match timeout(self.settings.send_timeout, self.stream.write_all(line.as_bytes())).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(ConnectionError::Write { source }),
            Err(_) => Err(ConnectionError::Write {
                source: std::io::ErrorKind::TimedOut.into(),
            }),
        }
    }

    pub async fn receive(&mut self) -> ConnectionResult<String> {
        self.read_once(self.settings.response_timeout).await
    }

    /// Round trip helper: one command, one read.
    pub async fn request(&mut self, command: &str) -> ConnectionResult<String> {
        self.send_command(command).await?;
        self.receive().await
    }

    /// Shuts the write side down and releases the socket. Dropping a `Connection` releases it
    /// too; this only makes the goodbye explicit.
    pub async fn close(mut self) {
        if let Err(err) = self.stream.shutdown().await {
            tracing::debug!("Error shutting down connection: {}", err);
        }
    }

    async fn read_once(&mut self, wait: Duration) -> ConnectionResult<String> {
        match timeout(wait, self.stream.read(&mut self.buffer)).await {
            Err(_) => Err(ConnectionError::Timeout(wait)),
            Ok(Ok(0)) => Err(ConnectionError::Closed),
            Ok(Ok(len)) => Ok(String::from_utf8_lossy(&self.buffer[..len]).into_owned()),
            Ok(Err(err)) => {
                tracing::debug!("Read failed, treating connection as closed: {}", err);
                Err(ConnectionError::Closed)
            }
        }
    }
}
