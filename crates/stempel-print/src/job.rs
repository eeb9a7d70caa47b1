// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// A print job: identity, state machine and attribute projection.
//
// The job itself never touches document bytes.  `process` hands the document
// to an ingestion task (see `ingest`) bound to the job, and that task reports
// back through `complete` / `fail` / `abort`.  Observers follow the lifecycle
// through a per-job `watch` channel of `JobSignal`s.
//
//   Pending ──process──▶ Processing ──▶ Completed | Aborted
//   Pending | PendingHeld | Processing | ProcessingStopped ──cancel──▶ Canceled

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use stempel_core::error::Result;
use stempel_core::{Attribute, DecodedRequest, JobState, StatusCode};

use crate::groups::{CHARSET, NATURAL_LANGUAGE};
use crate::ingest::{self, Document, IngestOutcome, JobSink};
use crate::negotiation;
use crate::printer::{Printer, seconds_since};

/// Lifecycle events of one job, as seen by its observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSignal {
    /// Nothing has happened since the job was created.
    Idle,
    Canceled,
    /// The job was aborted; the status code explains why.
    Aborted(StatusCode),
    Completed,
    /// The document stream failed.  The state is left untouched; whoever
    /// owns the request decides what happens next.
    Failed(String),
}

/// The bits of the owning printer a job reports about itself.
#[derive(Debug, Clone)]
struct PrinterRef {
    uri: String,
    started_at: DateTime<Utc>,
}

/// Mutable part of a job, written only by the lifecycle methods.
#[derive(Debug)]
struct JobRecord {
    state: JobState,
    processing_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    abort_status: Option<StatusCode>,
    octets: u64,
    digest: Option<String>,
}

/// A single print job owned by a [`Printer`].
#[derive(Debug)]
pub struct Job {
    id: i32,
    uri: String,
    printer: PrinterRef,
    name: Option<String>,
    user_name: Option<String>,
    compression: Option<String>,
    created_at: DateTime<Utc>,
    record: Mutex<JobRecord>,
    signals: watch::Sender<JobSignal>,
}

impl Job {
    /// Create a job from a Print-Job request and register it with `printer`.
    ///
    /// Never fails: missing or mistyped operation attributes simply leave
    /// the name, user or compression unset.
    pub fn create(printer: &Printer, request: &DecodedRequest) -> Arc<Job> {
        let op_attrs = request.operation_attributes();
        let read = |name: &str| op_attrs.and_then(|g| g.string(name));

        let id = printer.next_job_id();
        let (signals, _) = watch::channel(JobSignal::Idle);

        let job = Arc::new(Job {
            id,
            uri: format!("{}{id}", printer.uri()),
            printer: PrinterRef {
                uri: printer.uri().to_owned(),
                started_at: printer.started_at(),
            },
            name: read("job-name"),
            user_name: read("requesting-user-name"),
            compression: read("compression"),
            created_at: Utc::now(),
            record: Mutex::new(JobRecord {
                state: JobState::Pending,
                processing_at: None,
                completed_at: None,
                abort_status: None,
                octets: 0,
                digest: None,
            }),
            signals,
        });

        info!(
            job_id = id,
            name = job.name.as_deref().unwrap_or("-"),
            user = job.user_name.as_deref().unwrap_or("-"),
            compression = job.compression.as_deref().unwrap_or("none"),
            "job created"
        );

        printer.add(Arc::clone(&job));
        job
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    /// The `compression` keyword the client sent, if any.
    pub fn compression(&self) -> Option<&str> {
        self.compression.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> JobState {
        self.record().state
    }

    pub fn processing_at(&self) -> Option<DateTime<Utc>> {
        self.record().processing_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.record().completed_at
    }

    /// Document octets written to the sink so far (known once completed).
    pub fn octets(&self) -> u64 {
        self.record().octets
    }

    /// Hex SHA-256 of the ingested document, once completed.
    pub fn digest(&self) -> Option<String> {
        self.record().digest.clone()
    }

    /// Follow this job's lifecycle.  The receiver starts at the latest signal.
    pub fn subscribe(&self) -> watch::Receiver<JobSignal> {
        self.signals.subscribe()
    }

    /// Job attributes, filtered by the requested names.
    ///
    /// Processing and completion times that have not happened yet are
    /// reported as `no-value` rather than left out.
    pub fn attributes(&self, requested: Option<&[String]>) -> Vec<Attribute> {
        let record = self.record();
        let up_time = |at| seconds_since(self.printer.started_at, at);
        let optional_name = |attr: &str, value: Option<&str>| match value {
            Some(value) => Attribute::name_without_language(attr, value),
            None => Attribute::no_value(attr),
        };

        let mut attrs = vec![
            Attribute::integer("job-id", self.id),
            Attribute::uri("job-uri", &self.uri),
            Attribute::enumeration("job-state", record.state.code()),
            Attribute::uri("job-printer-uri", &self.printer.uri),
            Attribute::integer("job-printer-up-time", up_time(Utc::now())),
            optional_name("job-name", self.name.as_deref()),
            optional_name("job-originating-user-name", self.user_name.as_deref()),
            Attribute::keyword("job-state-reasons", state_reason(record.state, record.abort_status)),
            Attribute::integer("job-k-octets-processed", k_octets(record.octets)),
            Attribute::integer("time-at-creation", up_time(self.created_at)),
            Attribute::date_time("date-time-at-creation", self.created_at),
            Attribute::charset("attributes-charset", CHARSET),
            Attribute::natural_language("attributes-natural-language", NATURAL_LANGUAGE),
        ];

        match record.processing_at {
            Some(at) => {
                attrs.push(Attribute::integer("time-at-processing", up_time(at)));
                attrs.push(Attribute::date_time("date-time-at-processing", at));
            }
            None => {
                attrs.push(Attribute::no_value("time-at-processing"));
                attrs.push(Attribute::no_value("date-time-at-processing"));
            }
        }
        match record.completed_at {
            Some(at) => {
                attrs.push(Attribute::integer("time-at-completed", up_time(at)));
                attrs.push(Attribute::date_time("date-time-at-completed", at));
            }
            None => {
                attrs.push(Attribute::no_value("time-at-completed"));
                attrs.push(Attribute::no_value("date-time-at-completed"));
            }
        }
        drop(record);

        negotiation::select(attrs, requested)
    }

    /// Start processing: `Pending` becomes `Processing` right away and the
    /// document is ingested by a spawned task that runs on a later turn of
    /// the scheduler, after the caller has attached its observers.
    ///
    /// The returned handle resolves once the document stream has been
    /// consumed (or ingestion stopped early).
    pub fn process(self: &Arc<Self>, document: Document, sink: JobSink) -> JoinHandle<Result<IngestOutcome>> {
        self.begin_processing();
        tokio::spawn(ingest::run(Arc::clone(self), document, sink))
    }

    /// `Pending` becomes `Processing` and the processing time is recorded.
    pub(crate) fn begin_processing(&self) {
        let mut record = self.record();
        if record.state == JobState::Pending {
            record.state = JobState::Processing;
            record.processing_at = Some(Utc::now());
            info!(job_id = self.id, "job processing");
        } else {
            warn!(job_id = self.id, state = ?record.state, "process() on a job that is not pending");
        }
    }

    /// Cancel the job.  Returns `false` if it had already finished.
    pub fn cancel(&self) -> bool {
        {
            let mut record = self.record();
            if record.state.is_terminal() {
                return false;
            }
            record.state = JobState::Canceled;
        }
        info!(job_id = self.id, "job canceled");
        self.signals.send_replace(JobSignal::Canceled);
        true
    }

    /// Abort the job with a status code for the owning request to answer
    /// with.  Returns `false` if it had already finished.
    pub fn abort(&self, status: StatusCode) -> bool {
        {
            let mut record = self.record();
            if record.state.is_terminal() {
                return false;
            }
            record.state = JobState::Aborted;
            record.abort_status = Some(status);
        }
        warn!(job_id = self.id, %status, "job aborted");
        self.signals.send_replace(JobSignal::Aborted(status));
        true
    }

    /// Ingestion drained the document.  Cancel or abort take precedence.
    pub(crate) fn complete(&self, octets: u64, digest: String) -> bool {
        {
            let mut record = self.record();
            if record.state != JobState::Processing {
                debug!(job_id = self.id, state = ?record.state, "completion ignored");
                return false;
            }
            record.state = JobState::Completed;
            record.completed_at = Some(Utc::now());
            record.octets = octets;
            record.digest = Some(digest.clone());
        }
        info!(job_id = self.id, octets, sha256 = %digest, "job completed");
        self.signals.send_replace(JobSignal::Completed);
        true
    }

    /// Ingestion failed.  Reported to observers only.
    pub(crate) fn fail(&self, reason: String) {
        warn!(job_id = self.id, reason = %reason, "document stream failed");
        self.signals.send_replace(JobSignal::Failed(reason));
    }

    fn record(&self) -> MutexGuard<'_, JobRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `job-state-reasons` keyword for a state.
fn state_reason(state: JobState, abort_status: Option<StatusCode>) -> &'static str {
    match state {
        JobState::Pending => "none",
        JobState::PendingHeld => "job-hold-until-specified",
        JobState::Processing => "job-printing",
        JobState::ProcessingStopped => "printer-stopped",
        JobState::Completed => "job-completed-successfully",
        JobState::Canceled => "job-canceled-by-user",
        JobState::Aborted => match abort_status {
            Some(StatusCode::ClientErrorCompressionNotSupported)
            | Some(StatusCode::ClientErrorCompressionError) => "compression-error",
            _ => "aborted-by-system",
        },
    }
}

/// Octets rounded up to whole KiB, as `job-k-octets-*` expects.
fn k_octets(octets: u64) -> i32 {
    i32::try_from(octets.div_ceil(1024)).unwrap_or(i32::MAX)
}
