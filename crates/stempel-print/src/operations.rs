// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The six IPP operations.  Each handler turns a decoded request into a
// `Reply`: a status code plus the attribute groups that follow the
// operation-attributes group.  The router adds the operation group and the
// request id.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use stempel_core::{Attribute, AttributeGroup, DecodedRequest, GroupTag, JobState, StatusCode};

use crate::groups;
use crate::ingest::{self, Document, IngestOutcome};
use crate::job::{Job, JobSignal};
use crate::negotiation::{self, ALL};
use crate::printer::Printer;

/// Attributes answered on a successful Print-Job.
const PRINT_JOB_ATTRIBUTES: [&str; 3] = ["job-uri", "job-id", "job-state"];

/// Attributes listed by Get-Jobs when the client names none.
const GET_JOBS_DEFAULT_ATTRIBUTES: [&str; 2] = ["job-uri", "job-id"];

/// A handler's answer, minus the operation-attributes group.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub groups: Vec<AttributeGroup>,
}

impl Reply {
    pub fn ok(groups: Vec<AttributeGroup>) -> Self {
        Self {
            status: StatusCode::SuccessfulOk,
            groups,
        }
    }

    /// A bare status with no groups beyond the operation attributes.
    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            groups: Vec::new(),
        }
    }
}

/// Hands a reply to the waiting request exactly once.  Later sends are
/// dropped.
#[derive(Debug)]
pub struct ReplyLatch {
    fired: AtomicBool,
    slot: Mutex<Option<oneshot::Sender<Reply>>>,
}

impl ReplyLatch {
    pub fn new() -> (Arc<Self>, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        let latch = Arc::new(Self {
            fired: AtomicBool::new(false),
            slot: Mutex::new(Some(tx)),
        });
        (latch, rx)
    }

    /// Returns `false` if a reply was already sent.
    pub fn send(&self, reply: Reply) -> bool {
        if self.fired.swap(true, AtomicOrdering::AcqRel) {
            debug!(status = %reply.status, "reply already sent, dropping");
            return false;
        }
        let sender = self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        match sender {
            // the receiver may be gone if the connection dropped
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(AtomicOrdering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Print-Job
// ---------------------------------------------------------------------------

/// Create a job and stream the document into it.
///
/// Answers once: with the abort status if the job is aborted before the
/// document stream ends, otherwise with `job-uri`, `job-id` and `job-state`
/// after the stream has ended (also when the job was canceled meanwhile).
pub async fn print_job(printer: &Printer, mut request: DecodedRequest, document: Document) -> Reply {
    let job = Job::create(printer, &request);

    let sink = match printer.open_sink(&job).await {
        Ok(sink) => sink,
        Err(e) => {
            error!(job_id = job.id(), error = %e, "cannot open document sink");
            job.begin_processing();
            job.abort(StatusCode::ServerErrorInternalError);
            return Reply::status(StatusCode::ServerErrorInternalError);
        }
    };

    let (latch, reply) = ReplyLatch::new();
    tokio::spawn(answer_on_abort(job.subscribe(), Arc::clone(&latch)));
    // `latch` moves into the stream-end task below

    let document = document.prepend(std::mem::take(&mut request.data));
    let pipeline = job.process(document, sink);

    let stream_end = {
        let job = Arc::clone(&job);
        async move {
            let aborted = match pipeline.await {
                Ok(Ok(IngestOutcome::Drained { .. } | IngestOutcome::Canceled)) => false,
                // answered by the abort watcher
                Ok(Ok(IngestOutcome::Aborted(_))) if job.state() == JobState::Aborted => return,
                Ok(Ok(IngestOutcome::Aborted(_))) => false,
                Ok(Err(e)) => job.abort(ingest::failure_status(&e)),
                Err(e) => {
                    error!(job_id = job.id(), error = %e, "ingestion task failed");
                    job.abort(StatusCode::ServerErrorInternalError)
                }
            };
            // a job that was already finished is reported as it stands
            if !aborted {
                latch.send(Reply::ok(vec![groups::job_attributes(print_job_attributes(&job))]));
            }
        }
    };
    tokio::spawn(stream_end);

    reply
        .await
        .unwrap_or_else(|_| Reply::status(StatusCode::ServerErrorInternalError))
}

fn print_job_attributes(job: &Job) -> Vec<Attribute> {
    let requested: Vec<String> = PRINT_JOB_ATTRIBUTES.iter().map(|s| (*s).to_owned()).collect();
    job.attributes(Some(requested.as_slice()))
}

/// Answer with the abort status as soon as the job is aborted.  Stops once
/// the job reaches any other end state.
async fn answer_on_abort(mut signals: watch::Receiver<JobSignal>, latch: Arc<ReplyLatch>) {
    loop {
        let signal = signals.borrow_and_update().clone();
        match signal {
            JobSignal::Aborted(status) => {
                latch.send(Reply::status(status));
                return;
            }
            JobSignal::Completed | JobSignal::Canceled => return,
            JobSignal::Idle | JobSignal::Failed(_) => {}
        }
        if signals.changed().await.is_err() {
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// Validate-Job
// ---------------------------------------------------------------------------

/// Always valid: nothing is checked and no job is created.
pub fn validate_job(_printer: &Printer, _request: &DecodedRequest) -> Reply {
    Reply::ok(Vec::new())
}

// ---------------------------------------------------------------------------
// Get-Printer-Attributes
// ---------------------------------------------------------------------------

pub fn get_printer_attributes(printer: &Printer, request: &DecodedRequest) -> Reply {
    let requested = negotiation::requested_attributes(request).unwrap_or_else(|| vec![ALL.to_owned()]);
    let attrs = printer.attributes(Some(requested.as_slice()));
    let unsupported = groups::unsupported_attributes(&attrs, Some(requested.as_slice()));

    Reply::ok(with_unsupported(unsupported, vec![groups::printer_attributes(attrs)]))
}

// ---------------------------------------------------------------------------
// Get-Jobs
// ---------------------------------------------------------------------------

/// States matched by a `which-jobs` keyword; `None` means every job.
fn which_jobs_states(which: Option<&str>) -> Result<Option<&'static [JobState]>, ()> {
    match which {
        None => Ok(None),
        Some("completed") => Ok(Some(&[JobState::Completed, JobState::Canceled, JobState::Aborted])),
        Some("not-completed") => Ok(Some(&[
            JobState::Pending,
            JobState::PendingHeld,
            JobState::Processing,
            JobState::ProcessingStopped,
        ])),
        Some(_) => Err(()),
    }
}

/// Finished jobs first, most recent completion first; the rest by
/// descending id.
fn listing_order(a: &Arc<Job>, b: &Arc<Job>) -> Ordering {
    match (a.completed_at(), b.completed_at()) {
        (Some(ca), Some(cb)) => cb.cmp(&ca).then_with(|| b.id().cmp(&a.id())),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => b.id().cmp(&a.id()),
    }
}

pub fn get_jobs(printer: &Printer, request: &DecodedRequest) -> Reply {
    let op_attrs = request.operation_attributes();
    let which = op_attrs.and_then(|g| g.string("which-jobs"));

    let Ok(states) = which_jobs_states(which.as_deref()) else {
        let which = which.unwrap_or_default();
        warn!(which_jobs = %which, "unsupported which-jobs value");
        return Reply {
            status: StatusCode::ClientErrorAttributesOrValuesNotSupported,
            groups: vec![AttributeGroup::new(
                GroupTag::Unsupported,
                vec![Attribute::unsupported("which-jobs", &which)],
            )],
        };
    };

    // zero or negative means no limit
    let limit = op_attrs
        .and_then(|g| g.integer("limit"))
        .and_then(|limit| usize::try_from(limit).ok())
        .filter(|limit| *limit > 0)
        .unwrap_or(usize::MAX);

    let requested = negotiation::requested_attributes(request)
        .unwrap_or_else(|| GET_JOBS_DEFAULT_ATTRIBUTES.iter().map(|s| (*s).to_owned()).collect());

    let mut jobs: Vec<_> = printer
        .jobs()
        .into_iter()
        .filter(|job| states.is_none_or(|states| states.contains(&job.state())))
        .collect();
    jobs.sort_by(listing_order);

    let job_groups: Vec<AttributeGroup> = jobs
        .iter()
        .take(limit)
        .map(|job| groups::job_attributes(job.attributes(Some(requested.as_slice()))))
        .collect();
    debug!(matched = jobs.len(), listed = job_groups.len(), "get-jobs");

    let unsupported = match job_groups.first() {
        Some(first) => groups::unsupported_attributes(&first.attributes, Some(requested.as_slice())),
        None => AttributeGroup::new(GroupTag::Unsupported, Vec::new()),
    };

    Reply::ok(with_unsupported(unsupported, job_groups))
}

// ---------------------------------------------------------------------------
// Cancel-Job / Get-Job-Attributes
// ---------------------------------------------------------------------------

/// The job a request targets: `job-id`, or failing that the trailing id of
/// a `job-uri` under this printer's URI.
fn target_job(printer: &Printer, request: &DecodedRequest) -> Option<Arc<Job>> {
    let op_attrs = request.operation_attributes()?;
    let id = match op_attrs.integer("job-id") {
        Some(id) => id,
        None => op_attrs
            .string("job-uri")?
            .strip_prefix(printer.uri())?
            .trim_matches('/')
            .parse()
            .ok()?,
    };
    printer.get_job(id)
}

pub fn cancel_job(printer: &Printer, request: &DecodedRequest) -> Reply {
    let Some(job) = target_job(printer, request) else {
        return Reply::status(StatusCode::ClientErrorNotFound);
    };

    match job.state() {
        JobState::Pending | JobState::PendingHeld | JobState::Processing | JobState::ProcessingStopped => {
            job.cancel();
            info!(job_id = job.id(), "cancel-job accepted");
            Reply::ok(Vec::new())
        }
        state => {
            debug!(job_id = job.id(), ?state, "cancel-job on finished job");
            Reply::status(StatusCode::ClientErrorNotPossible)
        }
    }
}

pub fn get_job_attributes(printer: &Printer, request: &DecodedRequest) -> Reply {
    let Some(job) = target_job(printer, request) else {
        return Reply::status(StatusCode::ClientErrorNotFound);
    };

    let requested = negotiation::requested_attributes(request).unwrap_or_else(|| vec![ALL.to_owned()]);
    let attrs = job.attributes(Some(requested.as_slice()));
    let unsupported = groups::unsupported_attributes(&attrs, Some(requested.as_slice()));

    Reply::ok(with_unsupported(unsupported, vec![groups::job_attributes(attrs)]))
}

/// Put a non-empty unsupported group in front of the others.
fn with_unsupported(unsupported: AttributeGroup, mut groups: Vec<AttributeGroup>) -> Vec<AttributeGroup> {
    if !unsupported.is_empty() {
        groups.insert(0, unsupported);
    }
    groups
}
