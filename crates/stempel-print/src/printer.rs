// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The virtual printer: identity, job registry and printer attributes.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info};

use stempel_core::{Attribute, JobState, Operation, PrinterConfig, PrinterState};

use crate::groups::{CHARSET, NATURAL_LANGUAGE};
use crate::ingest::{Compression, JobSink};
use crate::job::Job;
use crate::negotiation;

/// Document formats accepted by Print-Job.
pub const DOCUMENT_FORMATS: [&str; 6] = [
    "text/html",
    "text/plain",
    "application/vnd.hp-PCL",
    "application/octet-stream",
    "application/pdf",
    "application/postscript",
];

pub const DEFAULT_DOCUMENT_FORMAT: &str = "application/postscript";

/// Backlog of job announcements kept for slow subscribers.
const JOB_CHANNEL_CAPACITY: usize = 64;

/// Opens the sink a job's document is written to.
pub type SinkFactory = Arc<dyn Fn(&Job) -> io::Result<JobSink> + Send + Sync>;

/// Whole seconds between `started` and `at`, never less than one.
pub fn seconds_since(started: DateTime<Utc>, at: DateTime<Utc>) -> i32 {
    let seconds = (at - started).num_seconds().max(1);
    i32::try_from(seconds).unwrap_or(i32::MAX)
}

/// A virtual IPP printer.
pub struct Printer {
    name: String,
    uri: String,
    port: u16,
    fallback: bool,
    discovery: bool,
    max_header_bytes: usize,
    started_at: DateTime<Utc>,
    accepting: Mutex<bool>,
    jobs: RwLock<Vec<Arc<Job>>>,
    last_job_id: AtomicI32,
    job_added: broadcast::Sender<Arc<Job>>,
    sink_factory: SinkFactory,
}

impl Printer {
    /// Build a printer from its configuration.  It reports `Stopped` until
    /// [`start`](Self::start) is called.  Documents are discarded unless a
    /// spool directory is configured.
    pub fn new(config: &PrinterConfig) -> Self {
        let (job_added, _) = broadcast::channel(JOB_CHANNEL_CAPACITY);
        let sink_factory: SinkFactory = match &config.spool_dir {
            Some(dir) => spool_to(dir.clone()),
            None => Arc::new(|_: &Job| -> io::Result<JobSink> { Ok(Box::new(io::sink())) }),
        };

        Self {
            name: config.name.clone(),
            uri: config.resolved_uri(),
            port: config.port,
            fallback: config.fallback,
            discovery: config.discovery,
            max_header_bytes: config.max_header_bytes,
            started_at: Utc::now(),
            accepting: Mutex::new(false),
            jobs: RwLock::new(Vec::new()),
            last_job_id: AtomicI32::new(0),
            job_added,
            sink_factory,
        }
    }

    /// Replace where job documents are written.
    pub fn with_sink_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Job) -> io::Result<JobSink> + Send + Sync + 'static,
    {
        self.sink_factory = Arc::new(factory);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn fallback(&self) -> bool {
        self.fallback
    }

    pub fn discovery(&self) -> bool {
        self.discovery
    }

    pub fn max_header_bytes(&self) -> usize {
        self.max_header_bytes
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Seconds since the printer was created.
    pub fn up_time(&self) -> i32 {
        seconds_since(self.started_at, Utc::now())
    }

    /// Mark the printer as accepting jobs (called when the server starts).
    /// The printer then reports `Idle`.
    pub fn start(&self) {
        *self.accepting.lock().unwrap_or_else(PoisonError::into_inner) = true;
        info!(printer = %self.name, uri = %self.uri, "printer started");
    }

    pub fn stop(&self) {
        *self.accepting.lock().unwrap_or_else(PoisonError::into_inner) = false;
        info!(printer = %self.name, "printer stopped");
    }

    pub fn is_accepting_jobs(&self) -> bool {
        *self.accepting.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `Processing` while any job is, `Idle` otherwise; `Stopped` once stopped.
    pub fn state(&self) -> PrinterState {
        if !self.is_accepting_jobs() {
            return PrinterState::Stopped;
        }
        let busy = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|job| job.state() == JobState::Processing);
        if busy { PrinterState::Processing } else { PrinterState::Idle }
    }

    pub(crate) fn next_job_id(&self) -> i32 {
        self.last_job_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Register a job and announce it to subscribers.
    pub fn add(&self, job: Arc<Job>) {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&job));
        // no subscribers is fine
        let _ = self.job_added.send(job);
    }

    /// Snapshot of all jobs in creation order.
    pub fn jobs(&self) -> Vec<Arc<Job>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn get_job(&self, id: i32) -> Option<Arc<Job>> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|job| job.id() == id)
            .cloned()
    }

    /// Receive every job as it is created.
    pub fn subscribe_jobs(&self) -> broadcast::Receiver<Arc<Job>> {
        self.job_added.subscribe()
    }

    /// Open the sink for `job` on the blocking pool; spool directories may
    /// sit on slow storage.
    pub(crate) async fn open_sink(&self, job: &Arc<Job>) -> io::Result<JobSink> {
        let factory = Arc::clone(&self.sink_factory);
        let job = Arc::clone(job);
        tokio::task::spawn_blocking(move || factory(&job))
            .await
            .map_err(io::Error::other)?
    }

    /// Protocol versions listed in `ipp-versions-supported`.
    fn versions_supported(&self) -> &'static [&'static str] {
        if self.fallback { &["1.0", "1.1"] } else { &["1.1"] }
    }

    /// Printer attributes, filtered by the requested names.
    pub fn attributes(&self, requested: Option<&[String]>) -> Vec<Attribute> {
        let attrs = vec![
            Attribute::uri("printer-uri-supported", &self.uri),
            Attribute::keyword("uri-security-supported", "none"),
            Attribute::keyword("uri-authentication-supported", "none"),
            Attribute::name_with_language("printer-name", NATURAL_LANGUAGE, &self.name),
            Attribute::enumeration("printer-state", self.state().code()),
            Attribute::keyword("printer-state-reasons", "none"),
            Attribute::keywords("ipp-versions-supported", self.versions_supported().iter().copied()),
            Attribute::enumerations(
                "operations-supported",
                Operation::ALL.iter().map(|op| i32::from(op.code())),
            ),
            Attribute::charset("charset-configured", CHARSET),
            Attribute::charset("charset-supported", CHARSET),
            Attribute::natural_language("natural-language-configured", NATURAL_LANGUAGE),
            Attribute::natural_language("generated-natural-language-supported", NATURAL_LANGUAGE),
            Attribute::mime_type("document-format-default", DEFAULT_DOCUMENT_FORMAT),
            Attribute::mime_types("document-format-supported", DOCUMENT_FORMATS),
            Attribute::boolean("printer-is-accepting-jobs", self.is_accepting_jobs()),
            Attribute::integer(
                "queued-job-count",
                i32::try_from(self.job_count()).unwrap_or(i32::MAX),
            ),
            Attribute::keyword("pdl-override-supported", "not-attempted"),
            Attribute::integer("printer-up-time", self.up_time()),
            Attribute::date_time("printer-current-time", Utc::now()),
            Attribute::keywords("compression-supported", Compression::SUPPORTED),
        ];

        negotiation::select(attrs, requested)
    }
}

impl fmt::Debug for Printer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Printer")
            .field("name", &self.name)
            .field("uri", &self.uri)
            .field("port", &self.port)
            .field("jobs", &self.job_count())
            .finish_non_exhaustive()
    }
}

/// Sink factory writing each job to `<dir>/job-<id>.prn`.
fn spool_to(dir: PathBuf) -> SinkFactory {
    Arc::new(move |job: &Job| -> io::Result<JobSink> {
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("job-{}.prn", job.id()));
        debug!(job_id = job.id(), path = %path.display(), "spooling document");
        Ok(Box::new(File::create(path)?))
    })
}
