// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Attribute data model: typed attribute values, attribute groups, and the
// decoded request / outgoing response objects exchanged with the wire codec.

use chrono::{DateTime, Utc};

use crate::types::{GroupTag, IppVersion, StatusCode, ValueTag};

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// An attribute value.  The wire type lives on the owning [`Attribute`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i32),
    Boolean(bool),
    /// Any character-string type (keyword, uri, name, text, charset, ...).
    Text(String),
    /// textWithLanguage / nameWithLanguage.
    Localized { language: String, text: String },
    DateTime(DateTime<Utc>),
    /// Octet strings and types this server does not interpret.
    Octets(Vec<u8>),
    /// A 1setOf value.
    Set(Vec<Value>),
    /// Out-of-band values (`no-value`, `unknown`).
    Empty,
}

impl Value {
    /// First member of a set, or the value itself.
    pub fn first(&self) -> &Value {
        match self {
            Value::Set(values) => values.first().unwrap_or(&Value::Empty),
            other => other,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.first() {
            Value::Text(text) => Some(text),
            Value::Localized { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self.first() {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Every string member, whether this is a single value or a set.
    pub fn strings(&self) -> Vec<String> {
        match self {
            Value::Set(values) => values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect(),
            other => other.as_str().map(str::to_owned).into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// A single named, typed protocol value.  Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub tag: ValueTag,
    pub name: String,
    pub value: Value,
}

impl Attribute {
    pub fn new(tag: ValueTag, name: impl Into<String>, value: Value) -> Self {
        Self {
            tag,
            name: name.into(),
            value,
        }
    }

    pub fn integer(name: &str, value: i32) -> Self {
        Self::new(ValueTag::Integer, name, Value::Integer(value))
    }

    pub fn enumeration(name: &str, value: i32) -> Self {
        Self::new(ValueTag::Enum, name, Value::Integer(value))
    }

    pub fn enumerations(name: &str, values: impl IntoIterator<Item = i32>) -> Self {
        let set = values.into_iter().map(Value::Integer).collect();
        Self::new(ValueTag::Enum, name, Value::Set(set))
    }

    pub fn boolean(name: &str, value: bool) -> Self {
        Self::new(ValueTag::Boolean, name, Value::Boolean(value))
    }

    pub fn keyword(name: &str, value: &str) -> Self {
        Self::new(ValueTag::Keyword, name, Value::Text(value.into()))
    }

    pub fn keywords<'a>(name: &str, values: impl IntoIterator<Item = &'a str>) -> Self {
        Self::string_set(ValueTag::Keyword, name, values)
    }

    pub fn uri(name: &str, value: &str) -> Self {
        Self::new(ValueTag::Uri, name, Value::Text(value.into()))
    }

    pub fn charset(name: &str, value: &str) -> Self {
        Self::new(ValueTag::Charset, name, Value::Text(value.into()))
    }

    pub fn natural_language(name: &str, value: &str) -> Self {
        Self::new(ValueTag::NaturalLanguage, name, Value::Text(value.into()))
    }

    pub fn mime_type(name: &str, value: &str) -> Self {
        Self::new(ValueTag::MimeMediaType, name, Value::Text(value.into()))
    }

    pub fn mime_types<'a>(name: &str, values: impl IntoIterator<Item = &'a str>) -> Self {
        Self::string_set(ValueTag::MimeMediaType, name, values)
    }

    pub fn name_without_language(name: &str, value: &str) -> Self {
        Self::new(ValueTag::NameWithoutLanguage, name, Value::Text(value.into()))
    }

    pub fn name_with_language(name: &str, language: &str, value: &str) -> Self {
        Self::new(
            ValueTag::NameWithLanguage,
            name,
            Value::Localized {
                language: language.into(),
                text: value.into(),
            },
        )
    }

    pub fn text_with_language(name: &str, language: &str, value: &str) -> Self {
        Self::new(
            ValueTag::TextWithLanguage,
            name,
            Value::Localized {
                language: language.into(),
                text: value.into(),
            },
        )
    }

    pub fn date_time(name: &str, value: DateTime<Utc>) -> Self {
        Self::new(ValueTag::DateTime, name, Value::DateTime(value))
    }

    /// Placeholder for an attribute that has no value yet.
    pub fn no_value(name: &str) -> Self {
        Self::new(ValueTag::NoValue, name, Value::Empty)
    }

    /// Entry of an unsupported-attributes group.
    pub fn unsupported(name: &str, value: &str) -> Self {
        Self::new(ValueTag::Unsupported, name, Value::Text(value.into()))
    }

    fn string_set<'a>(tag: ValueTag, name: &str, values: impl IntoIterator<Item = &'a str>) -> Self {
        let set = values.into_iter().map(|v| Value::Text(v.into())).collect();
        Self::new(tag, name, Value::Set(set))
    }
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// A tagged, ordered bundle of attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeGroup {
    pub tag: GroupTag,
    pub attributes: Vec<Attribute>,
}

impl AttributeGroup {
    pub fn new(tag: GroupTag, attributes: Vec<Attribute>) -> Self {
        Self { tag, attributes }
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Find the first attribute with the given name.
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Read the first value of the named attribute as a string.
    pub fn string(&self, name: &str) -> Option<String> {
        self.get(name).and_then(|a| a.value.as_str()).map(str::to_owned)
    }

    /// Read the first value of the named attribute as an integer.
    pub fn integer(&self, name: &str) -> Option<i32> {
        self.get(name).and_then(|a| a.value.as_integer())
    }

    /// Read every string value of the named attribute.
    pub fn strings(&self, name: &str) -> Option<Vec<String>> {
        self.get(name).map(|a| a.value.strings())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str())
    }
}

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

/// The fixed 8-byte prefix of every IPP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub version: IppVersion,
    /// Raw operation-id; unsupported ids must still be representable.
    pub operation_id: u16,
    /// Echoed verbatim in the response.
    pub request_id: u32,
}

/// A fully decoded request as handed over by the wire codec.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRequest {
    pub version: IppVersion,
    pub operation_id: u16,
    pub request_id: u32,
    pub groups: Vec<AttributeGroup>,
    /// Document bytes that arrived in the same read as the attribute section.
    pub data: Vec<u8>,
}

impl DecodedRequest {
    pub fn header(&self) -> RequestHeader {
        RequestHeader {
            version: self.version,
            operation_id: self.operation_id,
            request_id: self.request_id,
        }
    }

    /// Get the first operation-attributes group.
    pub fn operation_attributes(&self) -> Option<&AttributeGroup> {
        self.groups.iter().find(|g| g.tag == GroupTag::Operation)
    }
}

/// A response ready for the wire codec.
///
/// The operation-attributes group is always `groups[0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub version: IppVersion,
    pub status: StatusCode,
    pub request_id: u32,
    pub groups: Vec<AttributeGroup>,
}

impl Response {
    /// All groups carrying the given tag, in response order.
    pub fn groups_of(&self, tag: GroupTag) -> impl Iterator<Item = &AttributeGroup> {
        self.groups.iter().filter(move |g| g.tag == tag)
    }

    pub fn group(&self, tag: GroupTag) -> Option<&AttributeGroup> {
        self.groups_of(tag).next()
    }
}
