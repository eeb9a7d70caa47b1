// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document ingestion: drain the document stream of a Print-Job request,
// decompressing it if the client asked for compression, into the job's sink.
//
// Every byte that reaches the sink is counted and hashed (SHA-256) on the
// way, so a completed job knows how large its document was and can be
// matched against what the client sent.

use std::fmt;
use std::io::{self, Cursor, Write};
use std::pin::Pin;
use std::sync::Arc;

use flate2::write::{GzDecoder, ZlibDecoder};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tracing::{debug, info, instrument};

use stempel_core::error::{Result, StempelError};
use stempel_core::StatusCode;

use crate::job::{Job, JobSignal};

/// Read size for the document stream.
const CHUNK_SIZE: usize = 64 * 1024;

/// Where a job's decompressed document ends up.
pub type JobSink = Box<dyn Write + Send>;

/// The document part of a Print-Job request.
///
/// `leading` holds bytes that were already buffered together with the
/// attribute section; `body` yields the rest of the request body.
pub struct Document {
    leading: Vec<u8>,
    body: Pin<Box<dyn AsyncRead + Send>>,
}

impl Document {
    pub fn new(body: impl AsyncRead + Send + 'static) -> Self {
        Self {
            leading: Vec::new(),
            body: Box::pin(body),
        }
    }

    /// A document with no bytes at all.
    pub fn empty() -> Self {
        Self::new(tokio::io::empty())
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(Cursor::new(bytes.into()))
    }

    /// Put `bytes` in front of whatever the document already holds.
    pub fn prepend(mut self, mut bytes: Vec<u8>) -> Self {
        bytes.append(&mut self.leading);
        self.leading = bytes;
        self
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("leading", &self.leading.len())
            .finish_non_exhaustive()
    }
}

/// How an ingestion run ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The whole document reached the sink.
    Drained { octets: u64, digest: String },
    /// The job was aborted before any byte was read.
    Aborted(StatusCode),
    /// The job was canceled while the stream was being read.
    Canceled,
}

/// Compression schemes accepted in the `compression` operation attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Deflate,
    Gzip,
}

impl Compression {
    /// Keywords listed in `compression-supported`.
    pub const SUPPORTED: [&'static str; 3] = ["none", "deflate", "gzip"];

    /// Map the client's keyword.  No keyword means no compression; an
    /// unknown keyword yields `None`.
    pub fn from_keyword(keyword: Option<&str>) -> Option<Self> {
        match keyword {
            None | Some("none") => Some(Compression::None),
            Some("deflate") => Some(Compression::Deflate),
            Some("gzip") => Some(Compression::Gzip),
            Some(_) => None,
        }
    }
}

/// Counts and hashes everything written through it.
pub struct DigestWriter<W> {
    inner: W,
    hasher: Sha256,
    octets: u64,
}

impl<W: Write> DigestWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            octets: 0,
        }
    }

    pub fn octets(&self) -> u64 {
        self.octets
    }

    /// Flush the inner writer and return the octet count and hex digest.
    pub fn finish(mut self) -> io::Result<(u64, String)> {
        self.inner.flush()?;
        Ok((self.octets, hex::encode(self.hasher.finalize())))
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        self.octets += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// The decompression stage in front of the sink.
enum Decoder {
    Plain(DigestWriter<JobSink>),
    Deflate(ZlibDecoder<DigestWriter<JobSink>>),
    Gzip(GzDecoder<DigestWriter<JobSink>>),
}

impl Decoder {
    fn new(compression: Compression, sink: JobSink) -> Self {
        let sink = DigestWriter::new(sink);
        match compression {
            Compression::None => Decoder::Plain(sink),
            Compression::Deflate => Decoder::Deflate(ZlibDecoder::new(sink)),
            Compression::Gzip => Decoder::Gzip(GzDecoder::new(sink)),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        match self {
            Decoder::Plain(sink) => sink.write_all(buf).map_err(sink_error),
            Decoder::Deflate(decoder) => decoder.write_all(buf).map_err(decoder_error),
            Decoder::Gzip(decoder) => decoder.write_all(buf).map_err(decoder_error),
        }
    }

    fn finish(self) -> Result<(u64, String)> {
        let sink = match self {
            Decoder::Plain(sink) => sink,
            Decoder::Deflate(decoder) => decoder.finish().map_err(decoder_error)?,
            Decoder::Gzip(decoder) => decoder.finish().map_err(decoder_error)?,
        };
        sink.finish().map_err(sink_error)
    }
}

fn sink_error(e: io::Error) -> StempelError {
    StempelError::Ingest(format!("sink write failed: {e}"))
}

/// flate2 reports corrupt input as `InvalidInput` / `InvalidData`; any
/// other kind came from the sink behind the decoder.
fn decoder_error(e: io::Error) -> StempelError {
    match e.kind() {
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => StempelError::Decompression(e.to_string()),
        _ => sink_error(e),
    }
}

/// Status code a failed ingestion is answered with.
pub fn failure_status(error: &StempelError) -> StatusCode {
    match error {
        StempelError::Decompression(_) => StatusCode::ClientErrorCompressionError,
        _ => StatusCode::ServerErrorInternalError,
    }
}

/// Drain `document` into `sink` on behalf of `job`.
///
/// Runs until the stream ends, the job is canceled, or reading or
/// decompressing fails.  An unsupported compression keyword aborts the job
/// before anything is read.
#[instrument(skip_all, fields(job_id = job.id()))]
pub(crate) async fn run(job: Arc<Job>, document: Document, sink: JobSink) -> Result<IngestOutcome> {
    let outcome = drain(&job, document, sink).await;
    match &outcome {
        Ok(IngestOutcome::Drained { octets, digest }) => {
            job.complete(*octets, digest.clone());
        }
        Ok(IngestOutcome::Canceled) => info!(job_id = job.id(), "ingestion stopped, job canceled"),
        Ok(IngestOutcome::Aborted(_)) => {}
        Err(e) => job.fail(e.to_string()),
    }
    outcome
}

async fn drain(job: &Job, document: Document, sink: JobSink) -> Result<IngestOutcome> {
    let Some(compression) = Compression::from_keyword(job.compression()) else {
        let status = StatusCode::ClientErrorCompressionNotSupported;
        if !job.abort(status) {
            // canceled before ingestion started
            return Ok(IngestOutcome::Canceled);
        }
        return Ok(IngestOutcome::Aborted(status));
    };

    let mut signals = job.subscribe();
    let Document { leading, mut body } = document;
    let mut decoder = Decoder::new(compression, sink);
    debug!(job_id = job.id(), ?compression, leading = leading.len(), "ingesting document");

    if !leading.is_empty() {
        let len = leading.len();
        (decoder, _) = write_blocking(decoder, leading, len).await?;
    }

    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let read = tokio::select! {
            biased;
            _ = canceled(&mut signals) => return Ok(IngestOutcome::Canceled),
            read = body.read(&mut buf) => read,
        };
        let n = read.map_err(|e| StempelError::Ingest(format!("document read failed: {e}")))?;
        if n == 0 {
            break;
        }
        (decoder, buf) = write_blocking(decoder, buf, n).await?;
    }

    let (octets, digest) = tokio::task::spawn_blocking(move || decoder.finish())
        .await
        .map_err(join_error)??;
    Ok(IngestOutcome::Drained { octets, digest })
}

/// Push `buf[..len]` through the decoder on the blocking pool; sinks are
/// plain `std::io::Write` and may block on disk.  Hands both back for the
/// next chunk.
async fn write_blocking(mut decoder: Decoder, buf: Vec<u8>, len: usize) -> Result<(Decoder, Vec<u8>)> {
    tokio::task::spawn_blocking(move || -> Result<(Decoder, Vec<u8>)> {
        decoder.write_all(&buf[..len])?;
        Ok((decoder, buf))
    })
    .await
    .map_err(join_error)?
}

fn join_error(e: tokio::task::JoinError) -> StempelError {
    StempelError::Ingest(format!("sink task failed: {e}"))
}

/// Resolves once the job has been canceled.  Never resolves otherwise.
async fn canceled(signals: &mut watch::Receiver<JobSignal>) {
    loop {
        if *signals.borrow_and_update() == JobSignal::Canceled {
            return;
        }
        if signals.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use flate2::Compression as Level;
    use flate2::write::{GzEncoder, ZlibEncoder};
    use stempel_core::{
        Attribute, AttributeGroup, DecodedRequest, GroupTag, IppVersion, JobState, PrinterConfig,
    };

    use crate::printer::Printer;

    /// A sink the test can read back after the job is done with it.
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn printer() -> Printer {
        Printer::new(&PrinterConfig {
            uri: Some("ipp://localhost/".into()),
            discovery: false,
            ..Default::default()
        })
    }

    fn job_with(printer: &Printer, compression: Option<&str>) -> Arc<Job> {
        let attrs = compression
            .map(|c| vec![Attribute::keyword("compression", c)])
            .unwrap_or_default();
        let request = DecodedRequest {
            version: IppVersion::V1_1,
            operation_id: 0x0002,
            request_id: 1,
            groups: vec![AttributeGroup::new(GroupTag::Operation, attrs)],
            data: Vec::new(),
        };
        Job::create(printer, &request)
    }

    fn sha256_hex(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    const PAYLOAD: &[u8] = b"%!PS-Adobe-3.0\n/Helvetica findfont 12 scalefont setfont\nshowpage\n";

    #[test]
    fn compression_keywords() {
        assert_eq!(Compression::from_keyword(None), Some(Compression::None));
        assert_eq!(Compression::from_keyword(Some("none")), Some(Compression::None));
        assert_eq!(Compression::from_keyword(Some("deflate")), Some(Compression::Deflate));
        assert_eq!(Compression::from_keyword(Some("gzip")), Some(Compression::Gzip));
        assert_eq!(Compression::from_keyword(Some("compress")), None);
    }

    #[test]
    fn digest_writer_counts_and_hashes() {
        let mut writer = DigestWriter::new(Vec::new());
        writer.write_all(b"hello ").unwrap();
        writer.write_all(b"world").unwrap();
        assert_eq!(writer.octets(), 11);
        let (octets, digest) = writer.finish().unwrap();
        assert_eq!(octets, 11);
        assert_eq!(digest, sha256_hex(b"hello world"));
    }

    #[test]
    fn prepend_keeps_order() {
        let document = Document::empty().prepend(b"world".to_vec()).prepend(b"hello ".to_vec());
        assert_eq!(document.leading, b"hello world");
    }

    #[tokio::test]
    async fn plain_document_reaches_sink() {
        let printer = printer();
        let job = job_with(&printer, None);
        let sink = SharedSink::default();

        let document = Document::from_bytes(&PAYLOAD[10..]).prepend(PAYLOAD[..10].to_vec());
        let outcome = job.process(document, Box::new(sink.clone())).await.unwrap().unwrap();

        assert_eq!(
            outcome,
            IngestOutcome::Drained {
                octets: PAYLOAD.len() as u64,
                digest: sha256_hex(PAYLOAD),
            }
        );
        assert_eq!(&*sink.0.lock().unwrap(), PAYLOAD);
        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(job.octets(), PAYLOAD.len() as u64);
    }

    #[tokio::test]
    async fn deflate_document_is_decompressed() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Level::default());
        encoder.write_all(PAYLOAD).unwrap();
        let compressed = encoder.finish().unwrap();

        let printer = printer();
        let job = job_with(&printer, Some("deflate"));
        let sink = SharedSink::default();

        job.process(Document::from_bytes(compressed), Box::new(sink.clone()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&*sink.0.lock().unwrap(), PAYLOAD);
        assert_eq!(job.digest(), Some(sha256_hex(PAYLOAD)));
    }

    #[tokio::test]
    async fn gzip_document_is_decompressed() {
        let mut encoder = GzEncoder::new(Vec::new(), Level::fast());
        encoder.write_all(PAYLOAD).unwrap();
        let compressed = encoder.finish().unwrap();

        let printer = printer();
        let job = job_with(&printer, Some("gzip"));
        let sink = SharedSink::default();

        job.process(Document::from_bytes(compressed), Box::new(sink.clone()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&*sink.0.lock().unwrap(), PAYLOAD);
        assert_eq!(job.state(), JobState::Completed);
    }

    #[tokio::test]
    async fn unknown_compression_aborts_before_reading() {
        let printer = printer();
        let job = job_with(&printer, Some("compress"));

        let outcome = job
            .process(Document::from_bytes(PAYLOAD), Box::new(io::sink()))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            outcome,
            IngestOutcome::Aborted(StatusCode::ClientErrorCompressionNotSupported)
        );
        assert_eq!(job.state(), JobState::Aborted);
        assert!(job.completed_at().is_none());
    }

    #[tokio::test]
    async fn canceled_job_is_not_aborted_for_its_compression() {
        let printer = printer();
        let job = job_with(&printer, Some("compress"));
        assert!(job.cancel());

        let outcome = job
            .process(Document::from_bytes(PAYLOAD), Box::new(io::sink()))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome, IngestOutcome::Canceled);
        assert_eq!(job.state(), JobState::Canceled);
    }

    #[tokio::test]
    async fn corrupt_gzip_is_a_decompression_error() {
        let printer = printer();
        let job = job_with(&printer, Some("gzip"));
        let signals = job.subscribe();

        let err = job
            .process(Document::from_bytes(b"definitely not gzip".to_vec()), Box::new(io::sink()))
            .await
            .unwrap()
            .unwrap_err();

        assert!(matches!(err, StempelError::Decompression(_)));
        assert_eq!(failure_status(&err), StatusCode::ClientErrorCompressionError);
        assert!(matches!(*signals.borrow(), JobSignal::Failed(_)));
        // state is left for the request owner to decide
        assert_eq!(job.state(), JobState::Processing);
    }

    #[tokio::test]
    async fn cancel_stops_a_stalled_stream() {
        let printer = printer();
        let job = job_with(&printer, None);

        // the writer half stays open, so the read never finishes on its own
        let (_client, server) = tokio::io::duplex(64);
        let handle = job.process(Document::new(server), Box::new(io::sink()));

        tokio::task::yield_now().await;
        assert!(job.cancel());

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome, IngestOutcome::Canceled);
        assert_eq!(job.state(), JobState::Canceled);
        assert!(job.completed_at().is_none());
        assert!(job.processing_at().is_some());
    }
}
