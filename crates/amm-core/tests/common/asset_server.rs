//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves one static body for every GET path. Can omit `Content-Length`,
//! answer with an error status, and trickle the body in small chunks so a
//! transfer stays live long enough to be joined or cancelled. Counts GETs.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    pub status: u16,
    /// If false, no `Content-Length`; the body ends when the connection closes.
    pub send_length: bool,
    /// Bytes written per chunk.
    pub chunk_size: usize,
    /// Pause after each chunk.
    pub chunk_delay: Option<Duration>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            status: 200,
            send_length: true,
            chunk_size: 16 * 1024,
            chunk_delay: None,
        }
    }
}

impl ServerOptions {
    /// Trickles the body: `chunk_size` bytes every `delay`.
    pub fn slow(chunk_size: usize, delay: Duration) -> Self {
        Self {
            chunk_size,
            chunk_delay: Some(delay),
            ..Self::default()
        }
    }
}

pub struct AssetServer {
    base: String,
    hits: Arc<AtomicUsize>,
}

impl AssetServer {
    /// URL of `path` on this server (`path` without leading slash).
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Number of GET requests received so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub fn start(body: Vec<u8>) -> AssetServer {
    start_with_options(body, ServerOptions::default())
}

/// Starts the server on a background thread; it runs until the process exits.
pub fn start_with_options(body: Vec<u8>, opts: ServerOptions) -> AssetServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let counter = Arc::clone(&counter);
            thread::spawn(move || handle(stream, &body, opts, &counter));
        }
    });
    AssetServer {
        base: format!("http://127.0.0.1:{}/", port),
        hits,
    }
}

fn handle(mut stream: TcpStream, body: &[u8], opts: ServerOptions, hits: &AtomicUsize) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = String::from_utf8_lossy(&buf[..n]);
    let method = request.split_whitespace().next().unwrap_or("");
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }
    hits.fetch_add(1, Ordering::SeqCst);

    if !(200..300).contains(&opts.status) {
        let response = format!(
            "HTTP/1.1 {} Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            opts.status
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    let length = if opts.send_length {
        format!("Content-Length: {}\r\n", body.len())
    } else {
        String::new()
    };
    let head = format!(
        "HTTP/1.1 {} OK\r\n{}Connection: close\r\n\r\n",
        opts.status, length
    );
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }
    for chunk in body.chunks(opts.chunk_size.max(1)) {
        // The client hanging up ends the response.
        if stream.write_all(chunk).is_err() || stream.flush().is_err() {
            return;
        }
        if let Some(delay) = opts.chunk_delay {
            thread::sleep(delay);
        }
    }
}
