// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stempel: protocol types, the attribute data model, errors and configuration
// shared by the print engine and the binary.

pub mod attribute;
pub mod config;
pub mod error;
pub mod types;

pub use attribute::{Attribute, AttributeGroup, DecodedRequest, RequestHeader, Response, Value};
pub use config::PrinterConfig;
pub use error::StempelError;
pub use types::*;
