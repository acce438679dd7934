//! Network Server
//!
//! Tokio TCP server exposing a [`KvEngine`] over the wire protocol. One
//! task per connection; each request line is answered with exactly one
//! response line, and a malformed request produces an error response
//! without dropping the connection.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::error::Result;
use crate::protocol::{Request, Response};
use crate::store::{KvEngine, WriteOptions};

/// TCP server for client and replication traffic
pub struct KvServer {
    listener: tokio::net::TcpListener,
    engine: Arc<KvEngine>,
    shutdown: tokio::sync::watch::Sender<bool>,
}

impl KvServer {
    /// Bind `address` and serve `engine`. Port 0 picks a free port; see
    /// [`local_addr`](Self::local_addr).
    pub async fn bind(address: &str, engine: Arc<KvEngine>) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(address).await?;
        let (shutdown, _) = tokio::sync::watch::channel(false);

        tracing::info!(address = %listener.local_addr()?, "server listening");

        Ok(Self {
            listener,
            engine,
            shutdown,
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle that stops the accept loop
    pub fn shutdown_handle(&self) -> tokio::sync::watch::Sender<bool> {
        self.shutdown.clone()
    }

    /// Accept connections until the shutdown handle fires
    pub async fn serve(&self) -> Result<()> {
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((socket, addr)) => {
                            let engine = Arc::clone(&self.engine);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(socket, engine).await {
                                    tracing::warn!(peer = %addr, error = %e, "connection error");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "accept failed");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("server stopped");
        Ok(())
    }
}

/// Serve one connection: a sequence of request/response line pairs
async fn handle_connection(socket: TcpStream, engine: Arc<KvEngine>) -> Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                tracing::trace!(op = request.op_name(), "handling request");
                execute(&engine, request)
            }
            Err(e) => Response::failure(format!("invalid request: {e}")),
        };

        let mut payload = serde_json::to_string(&response)?;
        payload.push('\n');
        write_half.write_all(payload.as_bytes()).await?;
    }

    Ok(())
}

/// Translate one wire request into engine operations
pub fn execute(engine: &KvEngine, request: Request) -> Response {
    match request {
        Request::Set {
            key,
            value,
            version,
        } => match engine.set_with(&key, &value, WriteOptions::versioned(version)) {
            Ok(()) => Response::success(),
            Err(e) => Response::failure(e.to_string()),
        },

        Request::Get { key } => {
            let (value, version) = engine.fetch(&key);
            Response::with_value(value, version)
        }

        Request::Delete { key, version } => match engine.delete_with(&key, version) {
            Ok(existed) => Response::with_existed(existed),
            Err(e) => Response::failure(e.to_string()),
        },

        Request::BulkSet { items, version } => match engine.bulk_set_with(&items, version) {
            Ok(()) => Response::success(),
            Err(e) => Response::failure(e.to_string()),
        },

        Request::SearchFullText { query } => Response::with_keys(engine.search_full_text(&query)),

        Request::SearchEmbedding { query, top_k } => {
            Response::with_results(engine.search_embedding(&query, top_k.max(0) as usize))
        }
    }
}
