// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Attribute negotiation: which of the attributes an object can report does
// the client actually want?
//
// Clients name attributes in `requested-attributes`.  Besides plain names
// they may use the wildcard `all` or one of the group keywords from RFC 8011
// §4.2.5.1 (`job-template`, `job-description`, `printer-description`).  The
// same rule serves printer and job projections so both operations agree.

use std::collections::HashSet;

use stempel_core::{Attribute, DecodedRequest};

/// Wildcard: no filtering at all.
pub const ALL: &str = "all";

/// Job Template attributes (RFC 8011 §5.2).
const JOB_TEMPLATE: &[&str] = &[
    "job-priority",
    "job-hold-until",
    "job-sheets",
    "multiple-document-handling",
    "copies",
    "finishings",
    "page-ranges",
    "sides",
    "number-up",
    "orientation-requested",
    "media",
    "printer-resolution",
    "print-quality",
];

/// Job Description attributes (RFC 8011 §5.3).
const JOB_DESCRIPTION: &[&str] = &[
    "job-uri",
    "job-id",
    "job-printer-uri",
    "job-more-info",
    "job-name",
    "job-originating-user-name",
    "job-state",
    "job-state-reasons",
    "job-state-message",
    "job-detailed-status-messages",
    "job-document-access-errors",
    "number-of-documents",
    "output-device-assigned",
    "time-at-creation",
    "time-at-processing",
    "time-at-completed",
    "job-printer-up-time",
    "date-time-at-creation",
    "date-time-at-processing",
    "date-time-at-completed",
    "number-of-intervening-jobs",
    "job-message-from-operator",
    "job-k-octets",
    "job-impressions",
    "job-media-sheets",
    "job-k-octets-processed",
    "job-impressions-completed",
    "job-media-sheets-completed",
    "attributes-charset",
    "attributes-natural-language",
];

/// Printer Description attributes (RFC 8011 §5.4).
const PRINTER_DESCRIPTION: &[&str] = &[
    "printer-uri-supported",
    "uri-security-supported",
    "uri-authentication-supported",
    "printer-name",
    "printer-location",
    "printer-info",
    "printer-more-info",
    "printer-driver-installer",
    "printer-make-and-model",
    "printer-more-info-manufacturer",
    "printer-state",
    "printer-state-reasons",
    "printer-state-message",
    "ipp-versions-supported",
    "operations-supported",
    "multiple-document-jobs-supported",
    "charset-configured",
    "charset-supported",
    "natural-language-configured",
    "generated-natural-language-supported",
    "document-format-default",
    "document-format-supported",
    "printer-is-accepting-jobs",
    "queued-job-count",
    "printer-message-from-operator",
    "color-supported",
    "reference-uri-schemes-supported",
    "pdl-override-supported",
    "printer-up-time",
    "printer-current-time",
    "multiple-operation-time-out",
    "compression-supported",
    "job-k-octets-supported",
    "job-impressions-supported",
    "job-media-sheets-supported",
    "pages-per-minute",
    "pages-per-minute-color",
];

/// Names that never count as unsupported: request bookkeeping attributes,
/// the wildcard and the group keywords.
const STANDARD_NAMES: &[&str] = &[
    "attributes-charset",
    "attributes-natural-language",
    "requesting-user-name",
    ALL,
    "job-template",
    "job-description",
    "printer-description",
];

/// Member names of a group keyword, or `None` for a plain attribute name.
pub fn group_members(keyword: &str) -> Option<&'static [&'static str]> {
    match keyword {
        "job-template" => Some(JOB_TEMPLATE),
        "job-description" => Some(JOB_DESCRIPTION),
        "printer-description" => Some(PRINTER_DESCRIPTION),
        _ => None,
    }
}

/// A resolved `requested-attributes` filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    All,
    Names(HashSet<String>),
}

impl Filter {
    /// Resolve the requested names: absent or containing `all` means no
    /// filtering; otherwise group keywords are expanded into their members.
    pub fn resolve(requested: Option<&[String]>) -> Self {
        let Some(requested) = requested else {
            return Filter::All;
        };
        if requested.iter().any(|name| name == ALL) {
            return Filter::All;
        }

        let mut names = HashSet::with_capacity(requested.len());
        for name in requested {
            match group_members(name) {
                Some(members) => names.extend(members.iter().map(|m| (*m).to_owned())),
                None => {
                    names.insert(name.clone());
                }
            }
        }
        Filter::Names(names)
    }

    pub fn admits(&self, name: &str) -> bool {
        match self {
            Filter::All => true,
            Filter::Names(names) => names.contains(name),
        }
    }
}

/// Keep the candidates the client asked for, preserving candidate order.
pub fn select(candidates: Vec<Attribute>, requested: Option<&[String]>) -> Vec<Attribute> {
    match Filter::resolve(requested) {
        Filter::All => candidates,
        filter => candidates
            .into_iter()
            .filter(|attr| filter.admits(&attr.name))
            .collect(),
    }
}

/// Whether a requested name is implicitly supported.
pub fn is_standard(name: &str) -> bool {
    STANDARD_NAMES.contains(&name)
}

/// The `requested-attributes` values of a request's operation group.
pub fn requested_attributes(request: &DecodedRequest) -> Option<Vec<String>> {
    request
        .operation_attributes()
        .and_then(|group| group.strings("requested-attributes"))
}
