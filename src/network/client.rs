//! Network Client
//!
//! Blocking TCP client for the wire protocol. Used by command-line
//! tooling and by [`RemotePeer`](crate::cluster::RemotePeer) for
//! cross-process replication; connect and read timeouts bound every
//! call, so a hung node surfaces as a peer failure instead of a stall.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::{Request, Response};
use crate::wal::Version;

/// Blocking client holding one connection to a node
pub struct KvClient {
    reader: BufReader<TcpStream>,
    stream: TcpStream,
}

impl KvClient {
    /// Connect to `address` with `timeout` applied to the dial and to
    /// every read and write
    pub fn connect(address: &str, timeout: Duration) -> Result<Self> {
        let failed = |reason: String| Error::ConnectionFailed {
            address: address.to_string(),
            reason,
        };

        let addr = address
            .to_socket_addrs()
            .map_err(|e| failed(e.to_string()))?
            .next()
            .ok_or_else(|| failed("no address resolved".to_string()))?;

        let stream =
            TcpStream::connect_timeout(&addr, timeout).map_err(|e| failed(e.to_string()))?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;

        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self { reader, stream })
    }

    /// Send one request and read its response line
    pub fn request(&mut self, request: &Request) -> Result<Response> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        self.stream.write_all(line.as_bytes())?;
        self.stream.flush()?;

        let mut reply = String::new();
        let n = self.reader.read_line(&mut reply)?;
        if n == 0 {
            return Err(Error::Network("connection closed by server".into()));
        }

        serde_json::from_str(reply.trim_end())
            .map_err(|e| Error::Protocol(format!("invalid response: {e}")))
    }

    /// Set a key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.set_versioned(key, value, None)
    }

    /// Set a key carrying a replication version
    pub fn set_versioned(
        &mut self,
        key: &str,
        value: &str,
        version: Option<Version>,
    ) -> Result<()> {
        let request = Request::Set {
            key: key.to_string(),
            value: value.to_string(),
            version,
        };
        self.expect_ok(&request).map(|_| ())
    }

    /// Read a key
    pub fn get(&mut self, key: &str) -> Result<Option<String>> {
        let request = Request::Get {
            key: key.to_string(),
        };
        Ok(self.expect_ok(&request)?.value)
    }

    /// Read a key together with its last-writer version (quorum reads)
    pub fn fetch(&mut self, key: &str) -> Result<(Option<String>, Version)> {
        let request = Request::Get {
            key: key.to_string(),
        };
        let response = self.expect_ok(&request)?;
        Ok((response.value, response.version.unwrap_or(0)))
    }

    /// Delete a key, returning whether it existed
    pub fn delete(&mut self, key: &str) -> Result<bool> {
        self.delete_versioned(key, None)
    }

    /// Delete a key carrying a replication version
    pub fn delete_versioned(&mut self, key: &str, version: Option<Version>) -> Result<bool> {
        let request = Request::Delete {
            key: key.to_string(),
            version,
        };
        Ok(self.expect_ok(&request)?.existed.unwrap_or(false))
    }

    /// Set multiple keys atomically
    pub fn bulk_set(&mut self, items: &[(String, String)]) -> Result<()> {
        self.bulk_set_versioned(items, None)
    }

    /// Atomic bulk set carrying a replication version
    pub fn bulk_set_versioned(
        &mut self,
        items: &[(String, String)],
        version: Option<Version>,
    ) -> Result<()> {
        let request = Request::BulkSet {
            items: items.to_vec(),
            version,
        };
        self.expect_ok(&request).map(|_| ())
    }

    /// Keys whose value contains every query token
    pub fn search_full_text(&mut self, query: &str) -> Result<Vec<String>> {
        let request = Request::SearchFullText {
            query: query.to_string(),
        };
        Ok(self.expect_ok(&request)?.keys.unwrap_or_default())
    }

    /// Top-k keys by embedding similarity
    pub fn search_embedding(&mut self, query: &str, top_k: usize) -> Result<Vec<(String, f64)>> {
        let request = Request::SearchEmbedding {
            query: query.to_string(),
            top_k: top_k as i64,
        };
        Ok(self.expect_ok(&request)?.results.unwrap_or_default())
    }

    fn expect_ok(&mut self, request: &Request) -> Result<Response> {
        let response = self.request(request)?;
        if response.ok {
            Ok(response)
        } else {
            Err(Error::Network(
                response
                    .error
                    .unwrap_or_else(|| "unspecified server error".to_string()),
            ))
        }
    }
}
