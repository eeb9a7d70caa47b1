// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Request dispatch: version check, operation lookup, response assembly.

use tracing::{debug, instrument, warn};

use stempel_core::{DecodedRequest, IppVersion, Operation, RequestHeader, Response, StatusCode};

use crate::groups;
use crate::ingest::Document;
use crate::operations::{self, Reply};
use crate::printer::Printer;

/// Answer one decoded request.
///
/// `document` is the remainder of the request body; only Print-Job reads it.
#[instrument(
    skip_all,
    fields(request_id = request.request_id, operation_id = request.operation_id, version = %request.version)
)]
pub async fn route(printer: &Printer, request: DecodedRequest, document: Document) -> Response {
    let header = request.header();

    if header.version.major != 1 {
        warn!("unsupported IPP version");
        return respond(printer, header, Reply::status(StatusCode::ServerErrorVersionNotSupported));
    }

    let reply = match Operation::from_code(header.operation_id) {
        Some(operation) => {
            debug!(operation = operation.name(), "dispatching");
            match operation {
                Operation::PrintJob => operations::print_job(printer, request, document).await,
                Operation::ValidateJob => operations::validate_job(printer, &request),
                Operation::GetPrinterAttributes => operations::get_printer_attributes(printer, &request),
                Operation::GetJobs => operations::get_jobs(printer, &request),
                Operation::CancelJob => operations::cancel_job(printer, &request),
                Operation::GetJobAttributes => operations::get_job_attributes(printer, &request),
            }
        }
        None => {
            warn!("unsupported operation");
            Reply::status(StatusCode::ServerErrorOperationNotSupported)
        }
    };

    debug!(status = %reply.status, groups = reply.groups.len(), "responding");
    respond(printer, header, reply)
}

/// Answer a request whose body could not be decoded past its header.
pub fn reject_malformed(printer: &Printer, header: RequestHeader) -> Response {
    warn!(request_id = header.request_id, "malformed request");
    respond(printer, header, Reply::status(StatusCode::ClientErrorBadRequest))
}

/// Assemble the response: operation attributes first, request id echoed.
///
/// With fallback enabled an IPP/1.0 request is answered as 1.0; everything
/// else is answered as 1.1.
pub fn respond(printer: &Printer, header: RequestHeader, reply: Reply) -> Response {
    let version = if printer.fallback() && header.version == IppVersion::V1_0 {
        IppVersion::V1_0
    } else {
        IppVersion::V1_1
    };

    let mut response_groups = Vec::with_capacity(reply.groups.len() + 1);
    response_groups.push(groups::operation_attributes(reply.status));
    response_groups.extend(reply.groups);

    Response {
        version,
        status: reply.status,
        request_id: header.request_id,
        groups: response_groups,
    }
}
