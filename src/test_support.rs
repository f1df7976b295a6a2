use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, LinesCodec};

use crate::connection::ConnectionSettings;

pub const BANNER: &str = "> Welcome to PiHub - type `server help` for available commands.\n";

pub fn settings() -> ConnectionSettings {
    ConnectionSettings {
        connect_timeout: Duration::from_secs(1),
        send_timeout: Duration::from_millis(200),
        response_timeout: Duration::from_millis(200),
        banner_timeout: Duration::from_millis(200),
        recv_buffer_size: 2048,
    }
}

/// A port nothing listens on.
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[derive(Clone)]
enum Behavior {
    Reply {
        reply: String,
        close_after: Option<usize>,
    },
    Silent,
    Deaf,
}

/// In-process stand-in for the PiHub server, reading one command per line the same way the
/// real server does.
pub struct StubServer {
    port: u16,
    accepted: Arc<AtomicUsize>,
    received: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl StubServer {
    /// Greets every client, then answers every command with `reply`.
    pub async fn echo(reply: &str) -> Self {
        Self::start(Behavior::Reply {
            reply: reply.to_string(),
            close_after: None,
        })
        .await
    }

    /// Greets every client and answers `n` commands; the next one closes the connection.
    pub async fn closing_after(n: usize) -> Self {
        Self::start(Behavior::Reply {
            reply: "ok".to_string(),
            close_after: Some(n),
        })
        .await
    }

    /// Accepts connections and never writes anything.
    pub async fn silent() -> Self {
        Self::start(Behavior::Silent).await
    }

    /// Accepts connections and never reads from them, so their receive buffers fill up.
    pub async fn deaf() -> Self {
        Self::start(Behavior::Deaf).await
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> usize {
        self.received.load(Ordering::SeqCst)
    }

    async fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(AtomicUsize::new(0));
        let task = {
            let accepted = accepted.clone();
            let received = received.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    accepted.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(stream, behavior.clone(), received.clone()));
                }
            })
        };
        Self {
            port,
            accepted,
            received,
            task,
        }
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(stream: TcpStream, behavior: Behavior, received: Arc<AtomicUsize>) {
    if let Behavior::Deaf = behavior {
        let _stream = stream;
        return std::future::pending::<()>().await;
    }
    let (reader, mut writer) = stream.into_split();
    let mut lines = FramedRead::new(reader, LinesCodec::new());
    if let Behavior::Reply { .. } = behavior {
        if writer.write_all(BANNER.as_bytes()).await.is_err() {
            return;
        }
    }
    let mut answered = 0;
    while let Some(Ok(_line)) = lines.next().await {
        received.fetch_add(1, Ordering::SeqCst);
        let Behavior::Reply { reply, close_after } = &behavior else {
            continue;
        };
        if close_after.map_or(false, |n| answered >= n) {
            break;
        }
        if writer.write_all(format!("{}\n", reply).as_bytes()).await.is_err() {
            break;
        }
        answered += 1;
    }
}
