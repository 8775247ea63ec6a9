// Shared primitives for one-time server bootstrapping across integration
// tests, same shape as the teacher's `tests/support/mod.rs`: a dedicated OS
// thread with its own Tokio runtime, publishing the bound address once.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use c45_lobby_server::ServerConfig;

static SERVER_ADDR: OnceLock<String> = OnceLock::new();
static SERVER_READY: OnceLock<()> = OnceLock::new();

/// Boots the server once (2 lobbies, generous for every seed scenario) and
/// returns its `host:port` address.
pub fn ensure_server() -> &'static str {
    SERVER_READY.get_or_init(|| {
        let published = Arc::new(OnceLock::<String>::new());
        let published_thread = Arc::clone(&published);
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("test runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind ephemeral test port");
                let addr = listener.local_addr().expect("get local addr");
                let _ = published_thread.set(addr.to_string());
                let config = ServerConfig {
                    ip: "127.0.0.1".to_string(),
                    port: addr.port(),
                    lobby_count: 8,
                };
                c45_lobby_server::run(listener, config).await.expect("server failed");
            });
        });
        wait_for_readiness(published);
    });

    SERVER_ADDR.get().expect("server addr should be initialized").as_str()
}

fn wait_for_readiness(published: Arc<OnceLock<String>>) {
    let addr = loop {
        if let Some(addr) = published.get() {
            break addr.clone();
        }
        std::thread::sleep(Duration::from_millis(10));
    };
    let _ = SERVER_ADDR.set(addr.clone());

    for _ in 0..100 {
        if TcpStream::connect(&addr).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("server did not become ready in time");
}

/// A thin line-oriented client wrapping a blocking `TcpStream`, used by
/// integration tests to drive the protocol directly (spec.md §6).
pub struct Client {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Client {
    pub fn connect(addr: &str) -> Self {
        let stream = TcpStream::connect(addr).expect("connect");
        stream.set_nodelay(true).ok();
        let reader = BufReader::new(stream.try_clone().expect("clone stream"));
        Client { stream, reader }
    }

    pub fn send(&mut self, line: &str) {
        self.stream.write_all(line.as_bytes()).expect("write");
        self.stream.write_all(b"\n").expect("write newline");
    }

    /// Reads one line, blocking up to `timeout` overall via a read timeout
    /// on the underlying socket.
    pub fn recv_line(&mut self, timeout: Duration) -> String {
        self.stream
            .set_read_timeout(Some(timeout))
            .expect("set read timeout");
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read line");
        line.trim_end_matches(['\n', '\r']).to_string()
    }

    pub fn recv_default(&mut self) -> String {
        self.recv_line(Duration::from_secs(5))
    }

    /// Shuts down both halves of the socket without consuming `self`, so a
    /// test can simulate a mid-match disconnect while still holding the
    /// value (and its borrow) in place.
    pub fn close(&self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}
