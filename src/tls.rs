//! TLS transport wrapping `rustls::ServerConnection` over a non-blocking
//! `TcpStream`.
//!
//! No file in the teacher or the rest of the retrieval pack implements TLS;
//! this module is enrichment grounded in `rustls`'s own documented
//! non-blocking server pattern (`read_tls`/`process_new_packets`/
//! `read_plaintext`/`write_tls`), following the teacher's habit of a small
//! wrapper type around the underlying stream (`HttpConnection` wrapping
//! `TcpStream`) rather than threading raw `rustls` calls through the
//! reactor directly.

use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::path::Path;
use std::sync::Arc;

use mio::net::TcpStream;
use rustls::{ServerConfig, ServerConnection};

use crate::error::{EngineError, Result};

/// Loads a cert chain + private key from PEM files and builds a shared
/// server-side TLS configuration, one per engine (not per connection).
pub fn load_server_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(File::open(cert_path)?))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| EngineError::Config(format!("reading cert chain {}: {e}", cert_path.display())))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(key_path)?))
        .map_err(|e| EngineError::Config(format!("reading private key {}: {e}", key_path.display())))?
        .ok_or_else(|| EngineError::Config(format!("no private key found in {}", key_path.display())))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| EngineError::Config(format!("building TLS config: {e}")))?;
    Ok(Arc::new(config))
}

/// A TLS-wrapped connection: the raw TCP socket plus the `rustls` state
/// machine sitting in front of it. Reads and writes go through `rustls`,
/// which buffers ciphertext and plaintext separately.
pub struct TlsStream {
    tcp: TcpStream,
    conn: ServerConnection,
}

impl TlsStream {
    pub fn new(tcp: TcpStream, server_config: Arc<ServerConfig>) -> Result<Self> {
        let conn = ServerConnection::new(server_config)
            .map_err(|e| EngineError::ProtocolError(format!("TLS handshake setup: {e}")))?;
        Ok(Self { tcp, conn })
    }

    pub fn tcp_stream_mut(&mut self) -> &mut TcpStream {
        &mut self.tcp
    }

    pub fn wants_read(&self) -> bool {
        self.conn.wants_read()
    }

    pub fn wants_write(&self) -> bool {
        self.conn.wants_write()
    }
}

impl Read for TlsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.conn.wants_read() {
                match self.conn.read_tls(&mut self.tcp) {
                    Ok(0) => return Ok(0),
                    Ok(_) => {
                        if let Err(e) = self.conn.process_new_packets() {
                            return Err(io::Error::new(ErrorKind::InvalidData, e));
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {
                        // Ciphertext not yet available; fall through to see
                        // whether plaintext from a prior read is pending.
                    }
                    Err(e) => return Err(e),
                }
            }
            match self.conn.reader().read(buf) {
                Ok(0) if self.conn.wants_read() => return Err(io::Error::new(ErrorKind::WouldBlock, "tls: no plaintext yet")),
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Err(e),
                Err(e) => return Err(e),
            }
        }
    }
}

impl Write for TlsStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.conn.writer().write(buf)?;
        self.flush()?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        while self.conn.wants_write() {
            match self.conn.write_tls(&mut self.tcp) {
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
