//! # Stage: Webhook
//!
//! ## Responsibility
//! Accept outcomes over HTTP and expose the health score and a fresh cycle's
//! patterns to callers that cannot link the crate.
//!
//! ```text
//! POST /observe   Outcome JSON body   -> 201 {"id", "issues"}
//! GET  /health                        -> 200 {"health_score"}
//! GET  /patterns  runs one cycle      -> 200 {"health_score", "patterns"}
//! ```
//!
//! ## Guarantees
//! - One request per connection; every response carries `Connection: close`.
//! - Store and analysis work runs on the blocking pool, never on the accept loop.
//! - A bad request gets a JSON error body with a 4xx status. Storage failures
//!   answer 500 and the server keeps running.
//!
//! ## NOT Responsible For
//! - TLS, authentication, keep-alive or chunked request bodies.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::error::{Result, RsiError};
use crate::observe::Outcome;
use crate::pipeline::RsiLoop;

pub const DEFAULT_PORT: u16 = 8900;

/// Largest accepted request head (request line plus headers).
const MAX_HEAD_BYTES: usize = 8 * 1024;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

const MAX_HEADERS: usize = 32;

type ConnResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Bind `addr` and serve until the accept loop fails.
pub async fn serve(addr: &str, rsi: Arc<RsiLoop>) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| RsiError::Server { addr: addr.to_string(), source })?;
    serve_listener(listener, rsi).await
}

/// Serve on an already bound listener, one task per connection.
pub async fn serve_listener(listener: TcpListener, rsi: Arc<RsiLoop>) -> Result<()> {
    let addr = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    info!(target: "rsi_loop::webhook", %addr, "webhook listening");

    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|source| RsiError::Server { addr: addr.clone(), source })?;
        let rsi = Arc::clone(&rsi);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, rsi).await {
                warn!(target: "rsi_loop::webhook", %peer, error = %e, "connection error");
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, rsi: Arc<RsiLoop>) -> ConnResult {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];

    let head = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        match parse_head(&buf) {
            Ok(Some(head)) => break head,
            Ok(None) if buf.len() < MAX_HEAD_BYTES => {}
            Ok(None) => {
                let body = json!({ "error": "request head too large" });
                return write_response(&mut stream, 431, &body).await;
            }
            Err(e) => {
                let body = json!({ "error": format!("malformed request: {e}") });
                return write_response(&mut stream, 400, &body).await;
            }
        }
    };

    if head.content_length > MAX_BODY_BYTES {
        let body = json!({ "error": "request body too large" });
        return write_response(&mut stream, 413, &body).await;
    }

    let mut body = buf.split_off(head.head_len.min(buf.len()));
    while body.len() < head.content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            let err = json!({ "error": "request body shorter than Content-Length" });
            return write_response(&mut stream, 400, &err).await;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(head.content_length);

    let RequestHead { method, path, .. } = head;
    let (status, reply) =
        tokio::task::spawn_blocking(move || route(&rsi, &method, &path, &body)).await?;
    write_response(&mut stream, status, &reply).await
}

async fn write_response(stream: &mut TcpStream, status: u16, body: &Value) -> ConnResult {
    let body = serde_json::to_string(body)?;
    let response = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n{}",
        status,
        reason_phrase(status),
        body.len(),
        body,
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        431 => "Request Header Fields Too Large",
        _ => "Internal Server Error",
    }
}

// ---------------------------------------------------------------------------
// Request parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct RequestHead {
    method: String,
    /// Path without the query string.
    path: String,
    content_length: usize,
    head_len: usize,
}

/// Parse the request head; `Ok(None)` until the blank line has arrived.
fn parse_head(buf: &[u8]) -> std::result::Result<Option<RequestHead>, httparse::Error> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    let httparse::Status::Complete(head_len) = req.parse(buf)? else {
        return Ok(None);
    };

    let content_length = req
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("content-length"))
        .and_then(|h| std::str::from_utf8(h.value).ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0);
    let target = req.path.unwrap_or("/");
    let path = target.split_once('?').map_or(target, |(p, _)| p);

    Ok(Some(RequestHead {
        method: req.method.unwrap_or_default().to_string(),
        path: path.to_string(),
        content_length,
        head_len,
    }))
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Dispatch one request; returns the status code and JSON body.
///
/// Blocking: records to and reads from the outcome log.
pub fn route(rsi: &RsiLoop, method: &str, path: &str, body: &[u8]) -> (u16, Value) {
    let result = match (method, path) {
        ("POST", "/observe") => match serde_json::from_slice::<Outcome>(body) {
            Ok(outcome) => rsi
                .store()
                .record(outcome)
                .map(|o| (201, json!({ "id": o.id, "issues": o.issues }))),
            Err(e) => Ok((400, json!({ "error": format!("invalid outcome: {e}") }))),
        },
        ("GET", "/health") => rsi
            .health_score()
            .map(|score| (200, json!({ "health_score": score }))),
        ("GET", "/patterns") => rsi.run_cycle().and_then(|patterns| {
            let score = rsi.health_score()?;
            Ok((200, json!({ "health_score": score, "patterns": patterns })))
        }),
        (_, "/observe" | "/health" | "/patterns") => {
            Ok((405, json!({ "error": format!("{method} not allowed on {path}") })))
        }
        _ => Ok((404, json!({ "error": format!("no route for {path}") }))),
    };

    match result {
        Ok((status, reply)) => {
            debug!(target: "rsi_loop::webhook", method, path, status, "request handled");
            (status, reply)
        }
        Err(e) => {
            warn!(target: "rsi_loop::webhook", method, path, error = %e, "request failed");
            (500, json!({ "error": e.to_string() }))
        }
    }
}
