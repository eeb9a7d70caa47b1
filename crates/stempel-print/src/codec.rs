// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// IPP/1.1 binary encoding (RFC 8010 §3).
//
// ```text
// version-number:  2 bytes (major, minor)
// operation-id:    2 bytes (big-endian u16; status-code in responses)
// request-id:      4 bytes (big-endian u32)
// attribute-groups: variable
//   delimiter-tag: 1 byte
//   attributes:    variable
//     value-tag:    1 byte
//     name-length:  2 bytes (big-endian u16)
//     name:         name-length bytes
//     value-length: 2 bytes (big-endian u16)
//     value:        value-length bytes
// end-of-attributes-tag: 1 byte (0x03)
// document-data: remainder
// ```
//
// An attribute with an empty name is an additional value of the attribute
// before it; decoding folds such runs into a `Value::Set`, and encoding
// spreads a set back out the same way.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Timelike, Utc};
use thiserror::Error;
use tracing::warn;

use stempel_core::{
    Attribute, AttributeGroup, DecodedRequest, GroupTag, IppVersion, RequestHeader, Response, StempelError, Value,
    ValueTag,
};

/// Length of the version / operation / request-id prefix.
pub const HEADER_LEN: usize = 8;

/// Length of an RFC 2579 DateAndTime value.
const DATE_TIME_LEN: usize = 11;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes than the fixed header.
    #[error("IPP request too short: {0} bytes (minimum 8)")]
    TooShort(usize),

    /// The attribute section stops before its end tag; more bytes may fix it.
    #[error("incomplete IPP request: {0}")]
    Incomplete(&'static str),

    /// The bytes can never form a valid request.
    #[error("malformed IPP request: {0}")]
    Malformed(String),
}

impl From<DecodeError> for StempelError {
    fn from(e: DecodeError) -> Self {
        StempelError::Decode(e.to_string())
    }
}

/// Read just the fixed header, if there are enough bytes for it.
pub fn decode_header(data: &[u8]) -> Option<RequestHeader> {
    if data.len() < HEADER_LEN {
        return None;
    }
    Some(RequestHeader {
        version: IppVersion {
            major: data[0],
            minor: data[1],
        },
        operation_id: u16::from_be_bytes([data[2], data[3]]),
        request_id: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
    })
}

/// Big-endian cursor over a byte slice.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.data.len());
        let Some(end) = end else {
            return Err(DecodeError::Incomplete(what));
        };
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self, what: &'static str) -> Result<u8, DecodeError> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &'static str) -> Result<u16, DecodeError> {
        let bytes = self.take(2, what)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

/// Decode a request up to and including its end-of-attributes tag.  Bytes
/// after the tag become `data`.
pub fn decode_request(data: &[u8]) -> Result<DecodedRequest, DecodeError> {
    let Some(header) = decode_header(data) else {
        return Err(DecodeError::TooShort(data.len()));
    };

    let mut reader = Reader {
        data,
        pos: HEADER_LEN,
    };
    let mut groups: Vec<AttributeGroup> = Vec::new();
    let mut current: Option<AttributeGroup> = None;

    loop {
        let tag = reader.u8("missing end-of-attributes tag")?;

        // Delimiter tags are in the range 0x00..=0x0F.
        if tag <= 0x0F {
            if let Some(group) = current.take() {
                groups.push(group);
            }
            if tag == GroupTag::END_OF_ATTRIBUTES {
                break;
            }
            current = Some(AttributeGroup::new(GroupTag::from_code(tag), Vec::new()));
            continue;
        }

        let value_tag = ValueTag::from_code(tag);
        let name_len = reader.u16("truncated name-length field")? as usize;
        let name = reader.take(name_len, "truncated attribute name")?;
        let value_len = reader.u16("truncated value-length field")? as usize;
        let raw = reader.take(value_len, "truncated attribute value")?;
        let value = decode_value(value_tag, raw)?;

        let Some(group) = current.as_mut() else {
            warn!("IPP attribute outside of any group, discarded");
            continue;
        };

        if name.is_empty() {
            let Some(previous) = group.attributes.last_mut() else {
                return Err(DecodeError::Malformed("additional value without an attribute".into()));
            };
            append_value(&mut previous.value, value);
        } else {
            group.attributes.push(Attribute::new(
                value_tag,
                String::from_utf8_lossy(name).into_owned(),
                value,
            ));
        }
    }

    Ok(DecodedRequest {
        version: header.version,
        operation_id: header.operation_id,
        request_id: header.request_id,
        groups,
        data: reader.rest().to_vec(),
    })
}

fn append_value(target: &mut Value, value: Value) {
    match target {
        Value::Set(values) => values.push(value),
        single => {
            let first = std::mem::replace(single, Value::Empty);
            *single = Value::Set(vec![first, value]);
        }
    }
}

fn decode_value(tag: ValueTag, raw: &[u8]) -> Result<Value, DecodeError> {
    if tag.is_out_of_band() {
        return Ok(Value::Empty);
    }

    let malformed = |what: &str| DecodeError::Malformed(format!("{what}: {} bytes", raw.len()));

    let value = match tag {
        ValueTag::Integer | ValueTag::Enum => {
            let bytes: [u8; 4] = raw.try_into().map_err(|_| malformed("integer value"))?;
            Value::Integer(i32::from_be_bytes(bytes))
        }
        ValueTag::Boolean => match raw {
            [byte] => Value::Boolean(*byte != 0),
            _ => return Err(malformed("boolean value")),
        },
        ValueTag::DateTime => Value::DateTime(decode_date_time(raw).ok_or_else(|| malformed("dateTime value"))?),
        ValueTag::TextWithLanguage | ValueTag::NameWithLanguage => {
            let mut reader = Reader { data: raw, pos: 0 };
            let mut field = |what: &'static str| -> Result<String, DecodeError> {
                let len = reader.u16(what).map_err(|_| malformed(what))? as usize;
                let bytes = reader.take(len, what).map_err(|_| malformed(what))?;
                Ok(String::from_utf8_lossy(bytes).into_owned())
            };
            let language = field("natural-language field")?;
            let text = field("text field")?;
            Value::Localized { language, text }
        }
        ValueTag::TextWithoutLanguage
        | ValueTag::NameWithoutLanguage
        | ValueTag::Keyword
        | ValueTag::Uri
        | ValueTag::UriScheme
        | ValueTag::Charset
        | ValueTag::NaturalLanguage
        | ValueTag::MimeMediaType => Value::Text(String::from_utf8_lossy(raw).into_owned()),
        _ => Value::Octets(raw.to_vec()),
    };
    Ok(value)
}

/// RFC 2579 DateAndTime: year(2) month day hour minutes seconds
/// deci-seconds direction('+'/'-') utc-hours utc-minutes.
fn decode_date_time(raw: &[u8]) -> Option<DateTime<Utc>> {
    let raw: [u8; DATE_TIME_LEN] = raw.try_into().ok()?;
    let year = i32::from(u16::from_be_bytes([raw[0], raw[1]]));
    let offset_seconds = (i32::from(raw[9]) * 60 + i32::from(raw[10])) * 60;
    let offset = match raw[8] {
        b'+' => FixedOffset::east_opt(offset_seconds)?,
        b'-' => FixedOffset::west_opt(offset_seconds)?,
        _ => return None,
    };

    NaiveDate::from_ymd_opt(year, raw[2].into(), raw[3].into())?
        .and_hms_milli_opt(raw[4].into(), raw[5].into(), raw[6].into(), u32::from(raw[7]) * 100)?
        .and_local_timezone(offset)
        .single()
        .map(|local| local.with_timezone(&Utc))
}

fn encode_date_time(value: &DateTime<Utc>) -> Vec<u8> {
    let year = u16::try_from(value.year()).unwrap_or(0);
    let mut out = Vec::with_capacity(DATE_TIME_LEN);
    out.extend_from_slice(&year.to_be_bytes());
    out.extend_from_slice(&[
        value.month() as u8,
        value.day() as u8,
        value.hour() as u8,
        value.minute() as u8,
        value.second() as u8,
        (value.timestamp_subsec_millis() / 100).min(9) as u8,
        b'+',
        0,
        0,
    ]);
    out
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Accumulates an IPP message.
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new(version: IppVersion, code: u16, request_id: u32) -> Self {
        let mut buf = Vec::with_capacity(256);
        buf.push(version.major);
        buf.push(version.minor);
        buf.extend_from_slice(&code.to_be_bytes());
        buf.extend_from_slice(&request_id.to_be_bytes());
        Self { buf }
    }

    fn group(&mut self, group: &AttributeGroup) {
        self.buf.push(group.tag.code());
        for attr in &group.attributes {
            self.attribute(attr);
        }
    }

    fn attribute(&mut self, attr: &Attribute) {
        match &attr.value {
            Value::Set(values) if !attr.tag.is_out_of_band() => {
                let mut name = attr.name.as_str();
                for value in values {
                    self.write_attr(attr.tag, name, &encode_value(attr.tag, value));
                    name = "";
                }
                // an empty set still names the attribute once
                if values.is_empty() {
                    self.write_attr(attr.tag, &attr.name, &[]);
                }
            }
            value => self.write_attr(attr.tag, &attr.name, &encode_value(attr.tag, value)),
        }
    }

    /// Write a raw attribute (value-tag, name, value bytes).  Fields longer
    /// than a u16 length allows are truncated.
    fn write_attr(&mut self, tag: ValueTag, name: &str, value: &[u8]) {
        let name = clamp(name.as_bytes());
        let value = clamp(value);
        self.buf.push(tag.code());
        self.buf.extend_from_slice(&(name.len() as u16).to_be_bytes());
        self.buf.extend_from_slice(name);
        self.buf.extend_from_slice(&(value.len() as u16).to_be_bytes());
        self.buf.extend_from_slice(value);
    }

    fn finish(mut self, data: &[u8]) -> Vec<u8> {
        self.buf.push(GroupTag::END_OF_ATTRIBUTES);
        self.buf.extend_from_slice(data);
        self.buf
    }
}

fn clamp(bytes: &[u8]) -> &[u8] {
    &bytes[..bytes.len().min(usize::from(u16::MAX))]
}

fn encode_value(tag: ValueTag, value: &Value) -> Vec<u8> {
    if tag.is_out_of_band() {
        return Vec::new();
    }
    match value {
        Value::Integer(value) => value.to_be_bytes().to_vec(),
        Value::Boolean(value) => vec![u8::from(*value)],
        Value::Text(text) => text.as_bytes().to_vec(),
        Value::Localized { language, text } => {
            let language = clamp(language.as_bytes());
            let text = clamp(text.as_bytes());
            let mut out = Vec::with_capacity(4 + language.len() + text.len());
            out.extend_from_slice(&(language.len() as u16).to_be_bytes());
            out.extend_from_slice(language);
            out.extend_from_slice(&(text.len() as u16).to_be_bytes());
            out.extend_from_slice(text);
            out
        }
        Value::DateTime(value) => encode_date_time(value),
        Value::Octets(bytes) => bytes.clone(),
        // nested sets do not exist on the wire
        Value::Set(values) => values.first().map(|v| encode_value(tag, v)).unwrap_or_default(),
        Value::Empty => Vec::new(),
    }
}

/// Encode a response.
pub fn encode_response(response: &Response) -> Vec<u8> {
    let mut writer = Writer::new(response.version, response.status.code(), response.request_id);
    for group in &response.groups {
        writer.group(group);
    }
    writer.finish(&[])
}

/// Encode a request, followed by its document bytes.  Used by clients and
/// tests.
pub fn encode_request(request: &DecodedRequest) -> Vec<u8> {
    let mut writer = Writer::new(request.version, request.operation_id, request.request_id);
    for group in &request.groups {
        writer.group(group);
    }
    writer.finish(&request.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stempel_core::StatusCode;

    fn print_request() -> DecodedRequest {
        DecodedRequest {
            version: IppVersion::V1_1,
            operation_id: 0x0002,
            request_id: 0x0102_0304,
            groups: vec![AttributeGroup::new(
                GroupTag::Operation,
                vec![
                    Attribute::charset("attributes-charset", "utf-8"),
                    Attribute::natural_language("attributes-natural-language", "en"),
                    Attribute::uri("printer-uri", "ipp://localhost/"),
                    Attribute::name_without_language("job-name", "invoice.pdf"),
                    Attribute::keywords("requested-attributes", ["job-id", "job-state"]),
                ],
            )],
            data: b"%PDF-1.7".to_vec(),
        }
    }

    #[test]
    fn header_needs_eight_bytes() {
        assert!(decode_header(&[1, 1, 0, 2, 0, 0, 0]).is_none());
        let header = decode_header(&[2, 0, 0, 0x0B, 0, 0, 0, 9]).unwrap();
        assert_eq!(header.version, IppVersion { major: 2, minor: 0 });
        assert_eq!(header.operation_id, 0x000B);
        assert_eq!(header.request_id, 9);
    }

    #[test]
    fn decodes_groups_sets_and_document_data() {
        let bytes = encode_request(&print_request());
        let decoded = decode_request(&bytes).unwrap();

        assert_eq!(decoded, print_request());
        let op = decoded.operation_attributes().unwrap();
        assert_eq!(
            op.strings("requested-attributes"),
            Some(vec!["job-id".to_owned(), "job-state".to_owned()])
        );
    }

    #[test]
    fn too_short_and_truncated_input() {
        assert_eq!(decode_request(&[1, 1, 0]), Err(DecodeError::TooShort(3)));

        let bytes = encode_request(&print_request());
        // cut inside the attribute section
        let err = decode_request(&bytes[..20]).unwrap_err();
        assert!(matches!(err, DecodeError::Incomplete(_)));
        // header only, no end tag yet
        let err = decode_request(&bytes[..8]).unwrap_err();
        assert_eq!(err, DecodeError::Incomplete("missing end-of-attributes tag"));
    }

    #[test]
    fn bad_integer_length_is_malformed() {
        let mut bytes = vec![1, 1, 0, 0x0A, 0, 0, 0, 1, 0x01];
        bytes.push(0x21);
        bytes.extend_from_slice(&5u16.to_be_bytes());
        bytes.extend_from_slice(b"limit");
        bytes.extend_from_slice(&2u16.to_be_bytes());
        bytes.extend_from_slice(&[0, 1]);
        bytes.push(0x03);

        let err = decode_request(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn additional_value_without_attribute_is_malformed() {
        let mut bytes = vec![1, 1, 0, 0x0A, 0, 0, 0, 1, 0x01];
        bytes.push(0x44);
        bytes.extend_from_slice(&0u16.to_be_bytes());
        bytes.extend_from_slice(&3u16.to_be_bytes());
        bytes.extend_from_slice(b"all");
        bytes.push(0x03);

        let err = decode_request(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
        assert!(matches!(StempelError::from(err), StempelError::Decode(_)));
    }

    #[test]
    fn date_time_keeps_the_instant() {
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap();
        let raw = encode_date_time(&at);
        assert_eq!(raw.len(), DATE_TIME_LEN);
        assert_eq!(decode_date_time(&raw), Some(at));

        // 10:00 at UTC-5 is 15:00 UTC
        let remote = [0x07, 0xEA, 3, 14, 10, 0, 0, 0, b'-', 5, 0];
        assert_eq!(
            decode_date_time(&remote),
            Some(Utc.with_ymd_and_hms(2026, 3, 14, 15, 0, 0).unwrap())
        );
    }

    #[test]
    fn response_layout() {
        let response = Response {
            version: IppVersion::V1_0,
            status: StatusCode::ClientErrorNotFound,
            request_id: 77,
            groups: vec![AttributeGroup::new(
                GroupTag::Operation,
                vec![
                    Attribute::charset("attributes-charset", "utf-8"),
                    Attribute::no_value("time-at-completed"),
                    Attribute::unsupported("job-colour", "unsupported"),
                ],
            )],
        };
        let bytes = encode_response(&response);

        assert_eq!(&bytes[..8], &[1, 0, 0x04, 0x06, 0, 0, 0, 77]);
        assert_eq!(bytes[8], 0x01);
        assert_eq!(*bytes.last().unwrap(), 0x03);

        // a response decodes with the request layout; the status sits in
        // the operation-id slot
        let decoded = decode_request(&bytes).unwrap();
        assert_eq!(decoded.operation_id, 0x0406);
        let group = &decoded.groups[0];
        assert_eq!(group.get("time-at-completed").unwrap().value, Value::Empty);
        assert_eq!(group.get("job-colour").unwrap().tag, ValueTag::Unsupported);
        assert!(decoded.data.is_empty());
    }

    #[test]
    fn localized_values_round_trip() {
        let response = Response {
            version: IppVersion::V1_1,
            status: StatusCode::SuccessfulOk,
            request_id: 1,
            groups: vec![AttributeGroup::new(
                GroupTag::Printer,
                vec![Attribute::name_with_language("printer-name", "en-us", "Stempel")],
            )],
        };
        let decoded = decode_request(&encode_response(&response)).unwrap();
        assert_eq!(decoded.groups, response.groups);
    }
}
