use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Clone)]
enum Reply {
    Text(String),
    Hang,
}

/// Builds a [`CannedServer`].
#[derive(Default)]
pub struct CannedServerBuilder {
    replies: HashMap<String, Reply>,
}

impl CannedServerBuilder {
    /// Answer `command` with `body`, then close the connection.
    pub fn reply(mut self, command: &str, body: impl Into<String>) -> Self {
        self.replies
            .insert(command.to_string(), Reply::Text(body.into()));
        self
    }

    /// Accept `command` but never answer nor close.
    pub fn hang(mut self, command: &str) -> Self {
        self.replies.insert(command.to_string(), Reply::Hang);
        self
    }

    pub async fn start(self) -> CannedServer {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind canned server");
        let addr = listener.local_addr().expect("canned server local addr");
        let received = Arc::new(Mutex::new(Vec::new()));
        let replies = Arc::new(self.replies);

        let log = Arc::clone(&received);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut sock, _peer)) = listener.accept().await else {
                    continue;
                };

                let replies = Arc::clone(&replies);
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    // four-letter words, no framing
                    let mut cmd = [0u8; 4];
                    if sock.read_exact(&mut cmd).await.is_err() {
                        return;
                    }
                    let cmd = String::from_utf8_lossy(&cmd).to_string();
                    log.lock().expect("lock received commands").push(cmd.clone());

                    match replies.get(&cmd).cloned() {
                        Some(Reply::Text(body)) => {
                            if sock.write_all(body.as_bytes()).await.is_ok() {
                                let _ = sock.shutdown().await;
                            }
                        }
                        Some(Reply::Hang) => {
                            std::future::pending::<()>().await;
                        }
                        None => {
                            tracing::debug!(message = "unknown command", %cmd);
                        }
                    }
                });
            }
        });

        CannedServer {
            addr,
            received,
            handle,
        }
    }
}

/// A TCP server answering four-letter words with canned bodies, the way a
/// ZooKeeper server does: the response is terminated by closing the
/// connection.
pub struct CannedServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl CannedServer {
    pub fn builder() -> CannedServerBuilder {
        CannedServerBuilder::default()
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Commands received so far, in arrival order.
    pub fn received(&self) -> Vec<String> {
        self.received
            .lock()
            .expect("lock received commands")
            .clone()
    }
}

impl Drop for CannedServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
