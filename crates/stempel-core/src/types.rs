// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Protocol enumerations for IPP/1.1 (RFC 8010 / RFC 8011).

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// IPP version number carried in every request and response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IppVersion {
    pub major: u8,
    pub minor: u8,
}

impl IppVersion {
    pub const V1_0: IppVersion = IppVersion { major: 1, minor: 0 };
    pub const V1_1: IppVersion = IppVersion { major: 1, minor: 1 };
}

impl std::fmt::Display for IppVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

// ---------------------------------------------------------------------------
// Operations (RFC 8011 §4)
// ---------------------------------------------------------------------------

/// The operations this server implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    PrintJob,
    ValidateJob,
    CancelJob,
    GetJobAttributes,
    GetJobs,
    GetPrinterAttributes,
}

impl Operation {
    /// Every supported operation, in `operations-supported` order.
    pub const ALL: [Operation; 6] = [
        Operation::PrintJob,
        Operation::ValidateJob,
        Operation::GetJobs,
        Operation::GetPrinterAttributes,
        Operation::CancelJob,
        Operation::GetJobAttributes,
    ];

    /// Wire operation-id.
    pub fn code(self) -> u16 {
        match self {
            Self::PrintJob => 0x0002,
            Self::ValidateJob => 0x0004,
            Self::CancelJob => 0x0008,
            Self::GetJobAttributes => 0x0009,
            Self::GetJobs => 0x000A,
            Self::GetPrinterAttributes => 0x000B,
        }
    }

    /// Resolve a wire operation-id; `None` for anything unsupported.
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::PrintJob => "Print-Job",
            Self::ValidateJob => "Validate-Job",
            Self::CancelJob => "Cancel-Job",
            Self::GetJobAttributes => "Get-Job-Attributes",
            Self::GetJobs => "Get-Jobs",
            Self::GetPrinterAttributes => "Get-Printer-Attributes",
        }
    }
}

// ---------------------------------------------------------------------------
// Status codes (RFC 8011 §4.1.8, Appendix B)
// ---------------------------------------------------------------------------

/// Response status codes produced by this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    SuccessfulOk,
    ClientErrorBadRequest,
    ClientErrorNotPossible,
    ClientErrorNotFound,
    ClientErrorAttributesOrValuesNotSupported,
    ClientErrorCompressionNotSupported,
    ClientErrorCompressionError,
    ServerErrorInternalError,
    ServerErrorOperationNotSupported,
    ServerErrorVersionNotSupported,
}

impl StatusCode {
    pub fn code(self) -> u16 {
        match self {
            Self::SuccessfulOk => 0x0000,
            Self::ClientErrorBadRequest => 0x0400,
            Self::ClientErrorNotPossible => 0x0404,
            Self::ClientErrorNotFound => 0x0406,
            Self::ClientErrorAttributesOrValuesNotSupported => 0x040B,
            Self::ClientErrorCompressionNotSupported => 0x040F,
            Self::ClientErrorCompressionError => 0x0410,
            Self::ServerErrorInternalError => 0x0500,
            Self::ServerErrorOperationNotSupported => 0x0501,
            Self::ServerErrorVersionNotSupported => 0x0503,
        }
    }

    /// Human-readable keyword, used verbatim as the `status-message`.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::SuccessfulOk => "successful-ok",
            Self::ClientErrorBadRequest => "client-error-bad-request",
            Self::ClientErrorNotPossible => "client-error-not-possible",
            Self::ClientErrorNotFound => "client-error-not-found",
            Self::ClientErrorAttributesOrValuesNotSupported => {
                "client-error-attributes-or-values-not-supported"
            }
            Self::ClientErrorCompressionNotSupported => "client-error-compression-not-supported",
            Self::ClientErrorCompressionError => "client-error-compression-error",
            Self::ServerErrorInternalError => "server-error-internal-error",
            Self::ServerErrorOperationNotSupported => "server-error-operation-not-supported",
            Self::ServerErrorVersionNotSupported => "server-error-version-not-supported",
        }
    }

    pub fn is_success(self) -> bool {
        self.code() < 0x0100
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (0x{:04X})", self.keyword(), self.code())
    }
}

// ---------------------------------------------------------------------------
// Job and printer states (RFC 8011 §5.3.7, §5.4.11)
// ---------------------------------------------------------------------------

/// Lifecycle states of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    PendingHeld,
    Processing,
    ProcessingStopped,
    Canceled,
    Aborted,
    Completed,
}

impl JobState {
    /// Wire enum value for `job-state`.
    pub fn code(self) -> i32 {
        match self {
            Self::Pending => 3,
            Self::PendingHeld => 4,
            Self::Processing => 5,
            Self::ProcessingStopped => 6,
            Self::Canceled => 7,
            Self::Aborted => 8,
            Self::Completed => 9,
        }
    }

    /// Completed, canceled and aborted jobs never change state again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Canceled | Self::Aborted)
    }
}

/// Printer states as reported in `printer-state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrinterState {
    Idle,
    Processing,
    Stopped,
}

impl PrinterState {
    pub fn code(self) -> i32 {
        match self {
            Self::Idle => 3,
            Self::Processing => 4,
            Self::Stopped => 5,
        }
    }
}

/// Status of the embedded IPP print server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerStatus {
    Stopped,
    Starting,
    Running,
    Error,
}

// ---------------------------------------------------------------------------
// Tags (RFC 8010 §3.5)
// ---------------------------------------------------------------------------

/// Attribute group delimiter tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupTag {
    Operation,
    Job,
    Printer,
    Unsupported,
    /// Any other delimiter a client may send (e.g. subscription groups).
    Other(u8),
}

impl GroupTag {
    /// End-of-attributes delimiter; not a group in its own right.
    pub const END_OF_ATTRIBUTES: u8 = 0x03;

    pub fn code(self) -> u8 {
        match self {
            Self::Operation => 0x01,
            Self::Job => 0x02,
            Self::Printer => 0x04,
            Self::Unsupported => 0x05,
            Self::Other(code) => code,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => Self::Operation,
            0x02 => Self::Job,
            0x04 => Self::Printer,
            0x05 => Self::Unsupported,
            other => Self::Other(other),
        }
    }
}

/// Value tags describing the wire type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueTag {
    // out-of-band
    Unsupported,
    Unknown,
    NoValue,
    // integers
    Integer,
    Boolean,
    Enum,
    // octet strings
    OctetString,
    DateTime,
    Resolution,
    RangeOfInteger,
    TextWithLanguage,
    NameWithLanguage,
    // character strings
    TextWithoutLanguage,
    NameWithoutLanguage,
    Keyword,
    Uri,
    UriScheme,
    Charset,
    NaturalLanguage,
    MimeMediaType,
    Other(u8),
}

impl ValueTag {
    pub fn code(self) -> u8 {
        match self {
            Self::Unsupported => 0x10,
            Self::Unknown => 0x12,
            Self::NoValue => 0x13,
            Self::Integer => 0x21,
            Self::Boolean => 0x22,
            Self::Enum => 0x23,
            Self::OctetString => 0x30,
            Self::DateTime => 0x31,
            Self::Resolution => 0x32,
            Self::RangeOfInteger => 0x33,
            Self::TextWithLanguage => 0x35,
            Self::NameWithLanguage => 0x36,
            Self::TextWithoutLanguage => 0x41,
            Self::NameWithoutLanguage => 0x42,
            Self::Keyword => 0x44,
            Self::Uri => 0x45,
            Self::UriScheme => 0x46,
            Self::Charset => 0x47,
            Self::NaturalLanguage => 0x48,
            Self::MimeMediaType => 0x49,
            Self::Other(code) => code,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0x10 => Self::Unsupported,
            0x12 => Self::Unknown,
            0x13 => Self::NoValue,
            0x21 => Self::Integer,
            0x22 => Self::Boolean,
            0x23 => Self::Enum,
            0x30 => Self::OctetString,
            0x31 => Self::DateTime,
            0x32 => Self::Resolution,
            0x33 => Self::RangeOfInteger,
            0x35 => Self::TextWithLanguage,
            0x36 => Self::NameWithLanguage,
            0x41 => Self::TextWithoutLanguage,
            0x42 => Self::NameWithoutLanguage,
            0x44 => Self::Keyword,
            0x45 => Self::Uri,
            0x46 => Self::UriScheme,
            0x47 => Self::Charset,
            0x48 => Self::NaturalLanguage,
            0x49 => Self::MimeMediaType,
            other => Self::Other(other),
        }
    }

    /// Out-of-band tags carry no value on the wire.
    pub fn is_out_of_band(self) -> bool {
        (0x10..=0x1F).contains(&self.code())
    }
}
