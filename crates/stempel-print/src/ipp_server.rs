// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// IPP-over-HTTP transport (RFC 8010 §3, RFC 7230 framing).
//
// The server listens on the printer's TCP port.  Each connection carries one
// HTTP POST with an `application/ipp` body.  The HTTP head and the IPP
// attribute section are buffered; whatever follows is the document, which
// is streamed to the operation handler rather than read up front, so large
// print jobs never sit in memory.  The response is written back as a
// minimal HTTP/1.1 200 wrapping the encoded IPP response, and the
// connection is closed.
//
// Requests that cannot be decoded still get an IPP answer (bad-request,
// echoing the request id) as long as the fixed 8-byte header arrived;
// otherwise a bare HTTP 400 is sent.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use stempel_core::error::{Result, StempelError};
use stempel_core::{Response, ServerStatus};

use crate::advertise::Advertisement;
use crate::codec::{self, DecodeError};
use crate::ingest::Document;
use crate::printer::Printer;
use crate::router;

/// Upper bound for the HTTP request line and headers.
const MAX_HTTP_HEAD_BYTES: usize = 16 * 1024;

/// Read size while buffering the head and attribute section.
const READ_CHUNK: usize = 8 * 1024;

/// The parts of an HTTP request head the transport looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
struct HttpHead {
    method: String,
    path: String,
    content_type: Option<String>,
    content_length: Option<u64>,
    chunked: bool,
    expect_continue: bool,
    /// Offset of the body within the buffered bytes.
    body_offset: usize,
}

/// Parse the request line and headers once the blank line has arrived.
/// Returns `None` while the head is still incomplete.
fn parse_http_head(data: &[u8]) -> Option<HttpHead> {
    let header_end = find_subsequence(data, b"\r\n\r\n")?;
    let text = String::from_utf8_lossy(&data[..header_end]);
    let mut lines = text.split("\r\n");

    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let mut head = HttpHead {
        method: request_line.next().unwrap_or_default().to_owned(),
        path: request_line.next().unwrap_or("/").to_owned(),
        content_type: None,
        content_length: None,
        chunked: false,
        expect_continue: false,
        body_offset: header_end + 4,
    };

    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "content-type" => head.content_type = Some(value.to_owned()),
            "content-length" => head.content_length = value.parse().ok(),
            "transfer-encoding" => head.chunked = value.to_ascii_lowercase().contains("chunked"),
            "expect" => head.expect_continue = value.eq_ignore_ascii_case("100-continue"),
            _ => {}
        }
    }
    Some(head)
}

fn is_ipp_content_type(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|value| value.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case("application/ipp"))
}

/// Find the first occurrence of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

// ---------------------------------------------------------------------------
// IppServer
// ---------------------------------------------------------------------------

/// IPP print server for one [`Printer`].
pub struct IppServer {
    printer: Arc<Printer>,
    status: ServerStatus,
    /// Notification handle used to signal a graceful shutdown.
    shutdown_signal: Arc<Notify>,
    /// Handle to the Tokio task running the accept loop.
    task_handle: Option<JoinHandle<()>>,
    active_connections: Arc<AtomicU32>,
    advertisement: Option<Advertisement>,
    local_addr: Option<SocketAddr>,
}

impl IppServer {
    /// Create a server for `printer`.  It starts out `Stopped`.
    pub fn new(printer: Arc<Printer>) -> Self {
        Self {
            printer,
            status: ServerStatus::Stopped,
            shutdown_signal: Arc::new(Notify::new()),
            task_handle: None,
            active_connections: Arc::new(AtomicU32::new(0)),
            advertisement: None,
            local_addr: None,
        }
    }

    /// The bound port once running, the configured one before that.
    pub fn port(&self) -> u16 {
        self.local_addr.map_or(self.printer.port(), |addr| addr.port())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn status(&self) -> ServerStatus {
        self.status
    }

    pub fn printer(&self) -> &Arc<Printer> {
        &self.printer
    }

    /// Number of connections currently being served.
    pub fn active_connections(&self) -> u32 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Bind `0.0.0.0:<port>`, advertise the printer if discovery is on and
    /// start accepting connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the port is already in use or the listener cannot
    /// be created.  A failed mDNS registration is logged, not returned.
    pub async fn start(&mut self) -> Result<()> {
        if self.status == ServerStatus::Running {
            debug!(port = self.port(), "IPP server already running");
            return Ok(());
        }

        self.status = ServerStatus::Starting;

        let bind_addr: SocketAddr = ([0, 0, 0, 0], self.printer.port()).into();
        let listener = match TcpListener::bind(bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.status = ServerStatus::Error;
                return Err(StempelError::PrintServer(format!("bind {bind_addr}: {e}")));
            }
        };
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        info!(addr = %local_addr, uri = %self.printer.uri(), "IPP print server listening");

        if self.printer.discovery() {
            match Advertisement::register(self.printer.name(), local_addr.port()) {
                Ok(advertisement) => self.advertisement = Some(advertisement),
                Err(e) => warn!(error = %e, "printer will only be reachable by address"),
            }
        }

        self.printer.start();

        let shutdown = Arc::clone(&self.shutdown_signal);
        let connections = Arc::clone(&self.active_connections);
        let printer = Arc::clone(&self.printer);
        self.task_handle = Some(tokio::spawn(Self::accept_loop(listener, shutdown, connections, printer)));

        self.status = ServerStatus::Running;
        Ok(())
    }

    /// Stop accepting connections and withdraw the advertisement.
    /// Connections already being served run to completion.
    pub async fn stop(&mut self) -> Result<()> {
        if self.status != ServerStatus::Running {
            return Ok(());
        }

        info!(port = self.port(), "stopping IPP print server");

        if let Some(advertisement) = self.advertisement.take() {
            advertisement.withdraw();
        }

        self.shutdown_signal.notify_one();

        if let Some(handle) = self.task_handle.take() {
            handle
                .await
                .map_err(|e| StempelError::PrintServer(format!("task join: {e}")))?;
        }

        self.printer.stop();
        self.status = ServerStatus::Stopped;
        info!(port = self.port(), "IPP print server stopped");
        Ok(())
    }

    /// Runs until the shutdown signal is received.  Each connection is
    /// served in its own task.
    async fn accept_loop(
        listener: TcpListener,
        shutdown: Arc<Notify>,
        connections: Arc<AtomicU32>,
        printer: Arc<Printer>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    debug!("accept loop received shutdown signal");
                    break;
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            debug!(peer = %peer_addr, "incoming IPP connection");
                            let connections = Arc::clone(&connections);
                            let printer = Arc::clone(&printer);
                            tokio::spawn(async move {
                                connections.fetch_add(1, Ordering::Relaxed);
                                if let Err(e) = handle_connection(stream, peer_addr, &printer).await {
                                    warn!(peer = %peer_addr, error = %e, "connection handler error");
                                }
                                connections.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Connection handling
// ---------------------------------------------------------------------------

/// Serve a single connection: one request, one response.
async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, printer: &Printer) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let mut buf = Vec::with_capacity(READ_CHUNK);

    let head = loop {
        if let Some(head) = parse_http_head(&buf) {
            break head;
        }
        if buf.len() > MAX_HTTP_HEAD_BYTES {
            warn!(peer = %peer_addr, "HTTP head too large");
            return send_http_status(&mut writer, 431, "Request Header Fields Too Large").await;
        }
        let mut chunk = [0u8; READ_CHUNK];
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            debug!(peer = %peer_addr, "connection closed before a request arrived");
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    debug!(
        peer = %peer_addr,
        method = %head.method,
        path = %head.path,
        content_length = ?head.content_length,
        "HTTP request"
    );

    if !head.method.eq_ignore_ascii_case("POST") {
        return send_http_status(&mut writer, 405, "Method Not Allowed").await;
    }
    if !is_ipp_content_type(head.content_type.as_deref()) {
        warn!(peer = %peer_addr, content_type = ?head.content_type, "not an IPP request");
        return send_http_status(&mut writer, 400, "Bad Request").await;
    }
    if head.chunked {
        return send_http_status(&mut writer, 411, "Length Required").await;
    }
    if head.expect_continue {
        writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
    }

    let mut body = buf.split_off(head.body_offset);
    if let Some(length) = head.content_length {
        body.truncate(usize::try_from(length).unwrap_or(usize::MAX));
    }
    let mut remaining = head.content_length.map(|length| length.saturating_sub(body.len() as u64));

    // Buffer until the attribute section is complete.
    let max_header_bytes = printer.max_header_bytes();
    let decoded = loop {
        let attempt = codec::decode_request(&body);
        let wants_more = matches!(attempt, Err(DecodeError::Incomplete(_) | DecodeError::TooShort(_)))
            && body.len() < max_header_bytes
            && remaining != Some(0);
        if !wants_more {
            break attempt;
        }
        if read_body(&mut reader, &mut body, &mut remaining).await? == 0 {
            break attempt;
        }
    };

    let request = match decoded {
        Ok(request) => request,
        Err(e) => {
            warn!(peer = %peer_addr, error = %e, "malformed IPP request");
            return match codec::decode_header(&body) {
                Some(header) => send_ipp(&mut writer, &router::reject_malformed(printer, header)).await,
                None => send_http_status(&mut writer, 400, "Bad Request").await,
            };
        }
    };

    debug!(
        peer = %peer_addr,
        operation_id = %format!("0x{:04X}", request.operation_id),
        request_id = request.request_id,
        groups = request.groups.len(),
        buffered_data = request.data.len(),
        "parsed IPP request"
    );

    let document = match remaining {
        Some(remaining) => Document::new(reader.take(remaining)),
        None => Document::new(reader),
    };
    let response = router::route(printer, request, document).await;
    send_ipp(&mut writer, &response).await?;

    info!(
        peer = %peer_addr,
        status = %response.status,
        request_id = response.request_id,
        "IPP response sent"
    );
    Ok(())
}

/// Read one more chunk of the body, never past `Content-Length`.
async fn read_body(reader: &mut OwnedReadHalf, body: &mut Vec<u8>, remaining: &mut Option<u64>) -> Result<usize> {
    let mut chunk = [0u8; READ_CHUNK];
    let want = remaining.map_or(READ_CHUNK, |left| left.min(READ_CHUNK as u64) as usize);
    let n = reader.read(&mut chunk[..want]).await?;
    body.extend_from_slice(&chunk[..n]);
    if let Some(left) = remaining.as_mut() {
        *left -= n as u64;
    }
    Ok(n)
}

/// Write `response` wrapped in a minimal HTTP/1.1 200.
async fn send_ipp(writer: &mut OwnedWriteHalf, response: &Response) -> Result<()> {
    let ipp_body = codec::encode_response(response);
    let http_head = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: application/ipp\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n",
        ipp_body.len()
    );

    writer
        .write_all(http_head.as_bytes())
        .await
        .map_err(|e| StempelError::PrintServer(format!("write HTTP headers: {e}")))?;
    writer
        .write_all(&ipp_body)
        .await
        .map_err(|e| StempelError::PrintServer(format!("write IPP body: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| StempelError::PrintServer(format!("flush: {e}")))?;
    Ok(())
}

/// Answer with a bodiless HTTP status.
async fn send_http_status(writer: &mut OwnedWriteHalf, code: u16, reason: &str) -> Result<()> {
    let allow = if code == 405 { "Allow: POST\r\n" } else { "" };
    let response = format!("HTTP/1.1 {code} {reason}\r\n{allow}Content-Length: 0\r\nConnection: close\r\n\r\n");
    writer
        .write_all(response.as_bytes())
        .await
        .map_err(|e| StempelError::PrintServer(format!("write HTTP status: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| StempelError::PrintServer(format!("flush: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use flate2::Compression as Level;
    use flate2::write::GzEncoder;
    use stempel_core::{
        Attribute, AttributeGroup, DecodedRequest, GroupTag, IppVersion, JobState, PrinterConfig, StatusCode,
    };

    fn printer() -> Arc<Printer> {
        Arc::new(Printer::new(&PrinterConfig {
            uri: Some("ipp://localhost/".into()),
            port: 0,
            discovery: false,
            ..Default::default()
        }))
    }

    async fn running_server() -> IppServer {
        let mut server = IppServer::new(printer());
        server.start().await.unwrap();
        server
    }

    fn addr(server: &IppServer) -> SocketAddr {
        let port = server.local_addr().unwrap().port();
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn ipp_request(version: IppVersion, operation_id: u16, attrs: Vec<Attribute>) -> DecodedRequest {
        let mut operation = vec![
            Attribute::charset("attributes-charset", "utf-8"),
            Attribute::natural_language("attributes-natural-language", "en"),
            Attribute::uri("printer-uri", "ipp://localhost/"),
        ];
        operation.extend(attrs);
        DecodedRequest {
            version,
            operation_id,
            request_id: 31,
            groups: vec![AttributeGroup::new(GroupTag::Operation, operation)],
            data: Vec::new(),
        }
    }

    fn http_post(body: &[u8]) -> Vec<u8> {
        let mut raw = format!(
            "POST /ipp/print HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/ipp\r\nContent-Length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        raw.extend_from_slice(body);
        raw
    }

    /// Send raw bytes and return the HTTP head and body of the answer.
    async fn exchange(addr: SocketAddr, raw: &[u8]) -> (String, Vec<u8>) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        let end = find_subsequence(&response, b"\r\n\r\n").unwrap();
        (
            String::from_utf8_lossy(&response[..end]).into_owned(),
            response[end + 4..].to_vec(),
        )
    }

    #[test]
    fn http_head_parsing() {
        let raw = b"POST /ipp/print HTTP/1.1\r\nContent-Type: application/ipp; charset=utf-8\r\ncontent-length: 42\r\nExpect: 100-continue\r\n\r\nBODY";
        let head = parse_http_head(raw).unwrap();
        assert_eq!(head.method, "POST");
        assert_eq!(head.path, "/ipp/print");
        assert_eq!(head.content_length, Some(42));
        assert!(head.expect_continue);
        assert!(!head.chunked);
        assert!(is_ipp_content_type(head.content_type.as_deref()));
        assert_eq!(&raw[head.body_offset..], b"BODY");

        assert!(parse_http_head(b"POST / HTTP/1.1\r\nHost: x\r\n").is_none());
        assert!(!is_ipp_content_type(Some("text/plain")));
        assert!(!is_ipp_content_type(None));
    }

    #[test]
    fn initial_state() {
        let server = IppServer::new(printer());
        assert_eq!(server.status(), ServerStatus::Stopped);
        assert_eq!(server.active_connections(), 0);
        assert!(server.local_addr().is_none());
    }

    #[tokio::test]
    async fn get_printer_attributes_over_http() {
        let mut server = running_server().await;
        assert_eq!(server.status(), ServerStatus::Running);

        let body = codec::encode_request(&ipp_request(IppVersion::V1_1, 0x000B, Vec::new()));
        let (head, ipp) = exchange(addr(&server), &http_post(&body)).await;

        assert!(head.starts_with("HTTP/1.1 200 OK"));
        assert!(head.contains("Content-Type: application/ipp"));
        let response = codec::decode_request(&ipp).unwrap();
        assert_eq!(response.version, IppVersion::V1_1);
        assert_eq!(response.operation_id, StatusCode::SuccessfulOk.code());
        assert_eq!(response.request_id, 31);
        assert_eq!(response.groups[0].tag, GroupTag::Operation);
        let printer_group = response.groups.iter().find(|g| g.tag == GroupTag::Printer).unwrap();
        assert_eq!(printer_group.string("printer-uri-supported").as_deref(), Some("ipp://localhost/"));

        server.stop().await.unwrap();
        assert_eq!(server.status(), ServerStatus::Stopped);
    }

    #[tokio::test]
    async fn gzip_print_job_over_http() {
        let server = running_server().await;

        let document = b"%!PS-Adobe-3.0\nshowpage\n".repeat(500);
        let mut encoder = GzEncoder::new(Vec::new(), Level::default());
        encoder.write_all(&document).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut request = ipp_request(
            IppVersion::V1_1,
            0x0002,
            vec![
                Attribute::name_without_language("job-name", "big.ps"),
                Attribute::keyword("compression", "gzip"),
            ],
        );
        request.data = compressed;
        let (_, ipp) = exchange(addr(&server), &http_post(&codec::encode_request(&request))).await;

        let response = codec::decode_request(&ipp).unwrap();
        assert_eq!(response.operation_id, StatusCode::SuccessfulOk.code());
        let job_group = response.groups.iter().find(|g| g.tag == GroupTag::Job).unwrap();
        assert_eq!(job_group.integer("job-state"), Some(JobState::Completed.code()));

        let job = server.printer().get_job(1).unwrap();
        assert_eq!(job.name(), Some("big.ps"));
        assert_eq!(job.octets(), document.len() as u64);
    }

    #[tokio::test]
    async fn version_two_is_rejected() {
        let server = running_server().await;
        let body = codec::encode_request(&ipp_request(IppVersion { major: 2, minor: 0 }, 0x0002, Vec::new()));
        let (_, ipp) = exchange(addr(&server), &http_post(&body)).await;

        let response = codec::decode_request(&ipp).unwrap();
        assert_eq!(response.operation_id, StatusCode::ServerErrorVersionNotSupported.code());
        assert_eq!(server.printer().job_count(), 0);
    }

    #[tokio::test]
    async fn malformed_body_keeps_request_id() {
        let server = running_server().await;
        // valid header, then a value tag with a truncated name
        let body = [1, 1, 0, 0x0B, 0, 0, 0, 55, 0x01, 0x47, 0x00];
        let (head, ipp) = exchange(addr(&server), &http_post(&body)).await;

        assert!(head.starts_with("HTTP/1.1 200 OK"));
        let response = codec::decode_request(&ipp).unwrap();
        assert_eq!(response.operation_id, StatusCode::ClientErrorBadRequest.code());
        assert_eq!(response.request_id, 55);
    }

    #[tokio::test]
    async fn short_body_is_an_http_error() {
        let server = running_server().await;
        let (head, ipp) = exchange(addr(&server), &http_post(&[1, 1, 0])).await;
        assert!(head.starts_with("HTTP/1.1 400"));
        assert!(ipp.is_empty());
    }

    #[tokio::test]
    async fn http_level_rejections() {
        let server = running_server().await;

        let (head, _) = exchange(addr(&server), b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        assert!(head.starts_with("HTTP/1.1 405"));
        assert!(head.contains("Allow: POST"));

        let raw = b"POST / HTTP/1.1\r\nContent-Type: text/plain\r\nContent-Length: 0\r\n\r\n";
        let (head, _) = exchange(addr(&server), raw).await;
        assert!(head.starts_with("HTTP/1.1 400"));

        let raw = b"POST / HTTP/1.1\r\nContent-Type: application/ipp\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\n";
        let (head, _) = exchange(addr(&server), raw).await;
        assert!(head.starts_with("HTTP/1.1 411"));
    }
}
