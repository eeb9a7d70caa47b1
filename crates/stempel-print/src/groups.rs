// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Builders for the standard response attribute groups.

use stempel_core::{Attribute, AttributeGroup, GroupTag, StatusCode};

use crate::negotiation;

/// Charset every response is encoded in.
pub const CHARSET: &str = "utf-8";

/// Natural language of every generated text value.
pub const NATURAL_LANGUAGE: &str = "en-us";

/// Operation attributes heading every response: charset, natural language
/// and the status code's keyword as `status-message`.
pub fn operation_attributes(status: StatusCode) -> AttributeGroup {
    AttributeGroup::new(
        GroupTag::Operation,
        vec![
            Attribute::charset("attributes-charset", CHARSET),
            Attribute::natural_language("attributes-natural-language", NATURAL_LANGUAGE),
            Attribute::text_with_language("status-message", NATURAL_LANGUAGE, status.keyword()),
        ],
    )
}

pub fn printer_attributes(attributes: Vec<Attribute>) -> AttributeGroup {
    AttributeGroup::new(GroupTag::Printer, attributes)
}

pub fn job_attributes(attributes: Vec<Attribute>) -> AttributeGroup {
    AttributeGroup::new(GroupTag::Job, attributes)
}

/// One `unsupported` entry per requested name that none of `supported`
/// carries.  Standard names are never reported.
pub fn unsupported_attributes(supported: &[Attribute], requested: Option<&[String]>) -> AttributeGroup {
    let attributes = requested
        .unwrap_or_default()
        .iter()
        .filter(|name| !negotiation::is_standard(name))
        .filter(|name| !supported.iter().any(|attr| &attr.name == *name))
        .map(|name| Attribute::unsupported(name, "unsupported"))
        .collect();

    AttributeGroup::new(GroupTag::Unsupported, attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stempel_core::{Value, ValueTag};

    fn owned(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn operation_group_carries_status_keyword() {
        let group = operation_attributes(StatusCode::ClientErrorNotFound);
        assert_eq!(group.tag, GroupTag::Operation);
        assert_eq!(group.string("attributes-charset").as_deref(), Some("utf-8"));
        assert_eq!(group.string("attributes-natural-language").as_deref(), Some("en-us"));

        let message = group.get("status-message").unwrap();
        assert_eq!(message.tag, ValueTag::TextWithLanguage);
        assert_eq!(
            message.value,
            Value::Localized {
                language: "en-us".into(),
                text: "client-error-not-found".into(),
            }
        );
    }

    #[test]
    fn empty_input_yields_empty_group() {
        let group = printer_attributes(Vec::new());
        assert_eq!(group.tag, GroupTag::Printer);
        assert!(group.is_empty());

        let group = job_attributes(Vec::new());
        assert_eq!(group.tag, GroupTag::Job);
        assert!(group.is_empty());
    }

    #[test]
    fn unsupported_lists_each_missing_name() {
        let supported = vec![Attribute::integer("job-id", 1), Attribute::uri("job-uri", "x")];
        let requested = owned(&["job-id", "job-bogus", "job-uri", "x-other"]);

        let group = unsupported_attributes(&supported, Some(requested.as_slice()));
        assert_eq!(group.tag, GroupTag::Unsupported);
        assert_eq!(group.names().collect::<Vec<_>>(), vec!["job-bogus", "x-other"]);
        assert!(group.attributes.iter().all(|a| a.tag == ValueTag::Unsupported));
        assert_eq!(group.string("job-bogus").as_deref(), Some("unsupported"));
    }

    #[test]
    fn unsupported_ignores_standard_names() {
        let requested = owned(&["attributes-charset", "requesting-user-name", "all", "job-template"]);
        let group = unsupported_attributes(&[], Some(requested.as_slice()));
        assert!(group.is_empty());
    }

    #[test]
    fn unsupported_is_empty_without_request() {
        let supported = vec![Attribute::integer("job-id", 1)];
        assert!(unsupported_attributes(&supported, None).is_empty());
        assert!(unsupported_attributes(&supported, Some(Vec::<String>::new().as_slice())).is_empty());
    }
}
