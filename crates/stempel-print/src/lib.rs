// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stempel Print: the IPP print engine.  Decoded requests are routed to one
// of six operation handlers which consult the printer's job registry, drive
// the per-job state machine and stream document data through an optional
// decompressor into a sink.  The TCP transport, wire codec and mDNS
// advertisement wrap that engine into a runnable server.

pub mod advertise;
pub mod codec;
pub mod groups;
pub mod ingest;
pub mod ipp_server;
pub mod job;
pub mod negotiation;
pub mod operations;
pub mod printer;
pub mod router;

pub use ingest::Document;
pub use ipp_server::IppServer;
pub use job::{Job, JobSignal};
pub use printer::Printer;
pub use router::route;
