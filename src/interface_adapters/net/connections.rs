// Process-wide connection set (spec.md §3 "Connection Set"): every accepted
// transport, keyed by a connection id, reachable by handle for both normal
// per-player writes/reads and the shutdown broadcast.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::interface_adapters::net::transport::{LineReader, LineWriter, ReadOutcome};

struct Connection {
    reader: Arc<Mutex<LineReader>>,
    writer: Arc<Mutex<LineWriter>>,
}

/// Registry of every live accepted connection. Added on accept, removed on
/// close (spec.md §3).
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    connections: Mutex<HashMap<u64, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        ConnectionRegistry {
            next_id: AtomicU64::new(1),
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a freshly-accepted stream and returns its handle.
    pub async fn insert(&self, stream: TcpStream) -> u64 {
        let handle = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (read_half, write_half) = stream.into_split();
        let connection = Connection {
            reader: Arc::new(Mutex::new(LineReader::new(read_half))),
            writer: Arc::new(Mutex::new(LineWriter::new(write_half))),
        };
        self.connections.lock().await.insert(handle, connection);
        handle
    }

    pub async fn remove(&self, handle: u64) {
        if let Some(conn) = self.connections.lock().await.remove(&handle) {
            let mut writer = conn.writer.lock().await;
            writer.shutdown().await;
        }
    }

    pub async fn read_line(&self, handle: u64, max: usize) -> Option<ReadOutcome> {
        let guard = self.connections.lock().await;
        let conn = guard.get(&handle)?;
        // Clone the per-connection Arc and drop the registry-wide guard
        // before awaiting: never hold a shared lock across a suspension
        // point that performs network I/O (spec.md §5).
        let reader = conn.reader.clone();
        drop(guard);
        let mut reader = reader.lock().await;
        reader.read_line(max).await.ok()
    }

    pub async fn read_line_timeout(
        &self,
        handle: u64,
        max: usize,
        seconds: u64,
    ) -> Option<ReadOutcome> {
        let guard = self.connections.lock().await;
        let conn = guard.get(&handle)?;
        let reader = conn.reader.clone();
        drop(guard);
        let mut reader = reader.lock().await;
        reader.read_line_timeout(max, seconds).await.ok()
    }

    pub async fn is_readable_now(&self, handle: u64) -> bool {
        let guard = self.connections.lock().await;
        let Some(conn) = guard.get(&handle) else {
            return false;
        };
        let reader = conn.reader.clone();
        drop(guard);
        reader.lock().await.is_readable_now().await
    }

    pub async fn write_line(&self, handle: u64, line: &str) -> bool {
        let guard = self.connections.lock().await;
        let Some(conn) = guard.get(&handle) else {
            return false;
        };
        let writer = conn.writer.clone();
        drop(guard);
        writer.lock().await.write_line(line).await.is_ok()
    }

    /// Best-effort broadcast to every live connection, used for shutdown
    /// (spec.md §5). Individual write failures are logged, not propagated.
    pub async fn broadcast(&self, line: &str) {
        let handles: Vec<u64> = self.connections.lock().await.keys().copied().collect();
        for handle in handles {
            if !self.write_line(handle, line).await {
                debug!(handle, "shutdown broadcast write failed");
            }
        }
    }

    pub async fn shutdown_all(&self) {
        let handles: Vec<u64> = self.connections.lock().await.keys().copied().collect();
        for handle in handles {
            self.remove(handle).await;
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Alias for `remove`, named for call sites that tear a connection down
    /// after a protocol violation rather than as ordinary session exit.
    pub async fn close(&self, handle: u64) {
        self.remove(handle).await;
    }
}
