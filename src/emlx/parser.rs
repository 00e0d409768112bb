//! The emlx container parser.
//!
//! Parsing runs in four stages:
//!
//! 1. **Framing**: the first line must be a decimal byte count `N`. The next
//!    `N` bytes are the RFC 5322 message. A count that overruns the buffer
//!    is tolerated (the message is parsed up to the end); a missing or
//!    non-numeric count line is `InvalidFormat`.
//! 2. **Message**: the message block goes through `mailparse`, which unfolds
//!    headers, decodes RFC 2047 encoded words, and builds the MIME tree.
//! 3. **Body dispatch**: `multipart/alternative` keeps the highest-fidelity
//!    text and html parts (parts are ordered plainest-first, so the last of
//!    each kind wins); other multiparts concatenate textual parts and
//!    collect everything else as attachments.
//! 4. **Trailer**: any bytes after the message block are tried as an Apple
//!    XML property list; a malformed trailer is ignored.
//!
//! Parsing is pure CPU work; only `parse_emlx_file` touches the filesystem.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use chrono::{DateTime, Utc};
use mailparse::{MailHeaderMap, ParsedMail};

use super::headers::{EmailAddress, ThreadingHeaders, parse_address_list, parse_threading};
use crate::error::EmlxError;

/// A non-body MIME part extracted from a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentInfo {
    pub filename: Option<String>,
    pub mime_type: String,
    /// Decoded size in bytes.
    pub size: usize,
    /// Content-ID with angle brackets stripped, when present.
    pub content_id: Option<String>,
    /// True iff the part's disposition is `inline`.
    pub is_inline: bool,
}

/// A value from the Apple plist trailer. Only the scalar types Mail writes
/// are preserved; containers and dates are skipped.
#[derive(Debug, Clone, PartialEq)]
pub enum PlistValue {
    String(String),
    Integer(i64),
    Real(f64),
    Bool(bool),
}

/// A fully parsed emlx message.
#[derive(Debug, Clone, PartialEq)]
pub struct EmlxMessage {
    /// Message-ID as written, angle brackets preserved.
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub from: Option<EmailAddress>,
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub bcc: Vec<EmailAddress>,
    /// Parsed Date header; `None` when unparseable (the raw value stays
    /// available in `headers`).
    pub date: Option<DateTime<Utc>>,
    /// In-Reply-To token as written, angle brackets preserved.
    pub in_reply_to: Option<String>,
    /// References tokens as written, oldest first.
    pub references: Vec<String>,
    /// Top-level content type, e.g. `multipart/alternative`.
    pub content_type: String,
    /// All headers in order, names as written, values RFC 2047-decoded.
    pub headers: Vec<(String, String)>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub attachments: Vec<AttachmentInfo>,
    /// Mail-private metadata from the plist trailer, when present and
    /// well-formed.
    pub apple_plist: Option<HashMap<String, PlistValue>>,
    /// Message bytes actually consumed; smaller than the declared count when
    /// the count overruns the file.
    pub bytes_consumed: usize,
}

impl EmlxMessage {
    /// Normalized identifiers for thread detection.
    pub fn threading_headers(&self) -> ThreadingHeaders {
        parse_threading(
            self.message_id.as_deref(),
            self.in_reply_to.as_deref(),
            &self.references,
        )
    }
}

/// Parse an emlx file from disk.
pub fn parse_emlx_file(path: &Path) -> Result<EmlxMessage, EmlxError> {
    let data = std::fs::read(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => EmlxError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => EmlxError::DecodingError {
            section: "file".to_string(),
            detail: err.to_string(),
        },
    })?;
    parse_emlx_bytes(&data)
}

/// Parse an emlx message from an in-memory buffer.
pub fn parse_emlx_bytes(data: &[u8]) -> Result<EmlxMessage, EmlxError> {
    let newline = data
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| EmlxError::InvalidFormat {
            detail: "missing byte-count line".to_string(),
        })?;

    let count_line = std::str::from_utf8(&data[..newline])
        .map_err(|_| EmlxError::InvalidFormat {
            detail: "byte-count line is not valid UTF-8".to_string(),
        })?
        .trim();
    let declared: usize = count_line.parse().map_err(|_| EmlxError::InvalidFormat {
        detail: format!("byte-count line is not an integer: {:?}", count_line),
    })?;

    let start = newline + 1;
    let end = start.saturating_add(declared).min(data.len());
    let message_block = data.get(start..end).unwrap_or(&[]);
    let trailer = data.get(end..).unwrap_or(&[]);

    if end - start < declared {
        log::debug!(
            "emlx declares {} message bytes but only {} remain; parsing to end of buffer",
            declared,
            end - start
        );
    }

    let parsed = mailparse::parse_mail(message_block).map_err(|err| EmlxError::DecodingError {
        section: "headers".to_string(),
        detail: err.to_string(),
    })?;

    let headers: Vec<(String, String)> = parsed
        .headers
        .iter()
        .map(|h| (h.get_key(), h.get_value()))
        .collect();

    let message_id = parsed
        .headers
        .get_first_value("Message-ID")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let subject = parsed.headers.get_first_value("Subject");

    let from = parsed
        .headers
        .get_first_value("From")
        .map(|v| parse_address_list(&v))
        .and_then(|mut list| if list.is_empty() { None } else { Some(list.remove(0)) });
    let to = address_header(&parsed, "To");
    let cc = address_header(&parsed, "Cc");
    let bcc = address_header(&parsed, "Bcc");

    let date = parsed
        .headers
        .get_first_value("Date")
        .and_then(|raw| dateparser::parse(&raw).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let in_reply_to = parsed
        .headers
        .get_first_value("In-Reply-To")
        .and_then(|v| v.split_whitespace().next().map(String::from));

    let references = parsed
        .headers
        .get_first_value("References")
        .map(|v| v.split_whitespace().map(String::from).collect())
        .unwrap_or_default();

    let content_type = parsed.ctype.mimetype.clone();

    let mut collector = BodyCollector::default();
    collect_part(&parsed, &mut collector)?;

    Ok(EmlxMessage {
        message_id,
        subject,
        from,
        to,
        cc,
        bcc,
        date,
        in_reply_to,
        references,
        content_type,
        headers,
        body_text: collector.text,
        body_html: collector.html,
        attachments: collector.attachments,
        apple_plist: parse_plist_trailer(trailer),
        bytes_consumed: end - start,
    })
}

fn address_header(parsed: &ParsedMail<'_>, name: &str) -> Vec<EmailAddress> {
    parsed
        .headers
        .get_first_value(name)
        .map(|v| parse_address_list(&v))
        .unwrap_or_default()
}

#[derive(Default)]
struct BodyCollector {
    text: Option<String>,
    html: Option<String>,
    attachments: Vec<AttachmentInfo>,
}

impl BodyCollector {
    fn append_text(&mut self, body: String) {
        match &mut self.text {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(&body);
            }
            None => self.text = Some(body),
        }
    }

    fn append_html(&mut self, body: String) {
        match &mut self.html {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(&body);
            }
            None => self.html = Some(body),
        }
    }
}

fn collect_part(part: &ParsedMail<'_>, out: &mut BodyCollector) -> Result<(), EmlxError> {
    let mimetype = part.ctype.mimetype.to_lowercase();

    if mimetype == "multipart/alternative" {
        // Alternative parts are ordered plainest-first; the last candidate
        // of each kind is the highest-fidelity one.
        for sub in &part.subparts {
            let mut candidate = BodyCollector::default();
            collect_part(sub, &mut candidate)?;
            if candidate.text.is_some() {
                out.text = candidate.text;
            }
            if candidate.html.is_some() {
                out.html = candidate.html;
            }
            out.attachments.extend(candidate.attachments);
        }
        return Ok(());
    }

    if mimetype.starts_with("multipart/") {
        for sub in &part.subparts {
            collect_part(sub, out)?;
        }
        return Ok(());
    }

    let disposition = part.get_content_disposition();
    let filename = disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .cloned();
    let is_inline = disposition.disposition == mailparse::DispositionType::Inline;
    let is_explicit_attachment =
        disposition.disposition == mailparse::DispositionType::Attachment || filename.is_some();
    let is_textual = mimetype == "text/plain" || mimetype == "text/html";

    if is_explicit_attachment || !is_textual {
        let raw = part.get_body_raw().map_err(|err| EmlxError::DecodingError {
            section: "attachment".to_string(),
            detail: err.to_string(),
        })?;
        let content_id = part
            .headers
            .get_first_value("Content-ID")
            .map(|v| v.trim().trim_matches(&['<', '>'][..]).to_string())
            .filter(|v| !v.is_empty());
        out.attachments.push(AttachmentInfo {
            filename,
            mime_type: part.ctype.mimetype.clone(),
            size: raw.len(),
            content_id,
            is_inline,
        });
        return Ok(());
    }

    let body = part.get_body().map_err(|err| EmlxError::DecodingError {
        section: "body".to_string(),
        detail: err.to_string(),
    })?;
    if mimetype == "text/plain" {
        out.append_text(body);
    } else {
        out.append_html(body);
    }
    Ok(())
}

fn parse_plist_trailer(trailer: &[u8]) -> Option<HashMap<String, PlistValue>> {
    let text_start = trailer.iter().position(|b| !b.is_ascii_whitespace())?;
    let rest = &trailer[text_start..];
    if !rest.starts_with(b"<") {
        return None;
    }

    let value = match plist::Value::from_reader_xml(Cursor::new(rest)) {
        Ok(value) => value,
        Err(err) => {
            log::debug!("ignoring malformed emlx plist trailer: {}", err);
            return None;
        }
    };
    let dict = value.into_dictionary()?;

    let mut map = HashMap::new();
    for (key, value) in dict {
        let converted = match value {
            plist::Value::String(s) => PlistValue::String(s),
            plist::Value::Integer(i) => match i.as_signed() {
                Some(v) => PlistValue::Integer(v),
                None => continue,
            },
            plist::Value::Real(r) => PlistValue::Real(r),
            plist::Value::Boolean(b) => PlistValue::Bool(b),
            _ => continue,
        };
        map.insert(key, converted);
    }
    Some(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(message: &str) -> Vec<u8> {
        let mut data = format!("{}\n", message.len()).into_bytes();
        data.extend_from_slice(message.as_bytes());
        data
    }

    const SIMPLE: &str = "Message-ID: <simple@test>\r\n\
        Subject: Plain message\r\n\
        From: Sender <sender@example.com>\r\n\
        To: one@example.com, Two <two@example.com>\r\n\
        Date: Tue, 15 Jul 2025 10:30:00 +0000\r\n\
        \r\n\
        Hello body\r\n";

    #[test]
    fn parses_simple_message() {
        let msg = parse_emlx_bytes(&frame(SIMPLE)).unwrap();
        assert_eq!(msg.message_id.as_deref(), Some("<simple@test>"));
        assert_eq!(msg.subject.as_deref(), Some("Plain message"));
        assert_eq!(msg.from.as_ref().unwrap().email, "sender@example.com");
        assert_eq!(msg.to.len(), 2);
        assert_eq!(msg.body_text.as_deref(), Some("Hello body\r\n"));
        assert!(msg.body_html.is_none());
        assert!(msg.attachments.is_empty());
        assert!(msg.apple_plist.is_none());
        assert!(msg.date.is_some());
        assert_eq!(msg.bytes_consumed, SIMPLE.len());
    }

    #[test]
    fn missing_count_line_is_invalid_format() {
        let err = parse_emlx_bytes(b"no newline at all").unwrap_err();
        assert!(matches!(err, EmlxError::InvalidFormat { .. }));
    }

    #[test]
    fn non_numeric_count_line_is_invalid_format() {
        let err = parse_emlx_bytes(b"not-a-number\nFrom: x@y\r\n\r\nbody").unwrap_err();
        assert!(matches!(err, EmlxError::InvalidFormat { .. }));
    }

    #[test]
    fn oversized_count_parses_to_end_of_buffer() {
        let mut data = b"999999\n".to_vec();
        data.extend_from_slice(SIMPLE.as_bytes());
        let msg = parse_emlx_bytes(&data).unwrap();
        assert_eq!(msg.subject.as_deref(), Some("Plain message"));
        assert_eq!(msg.bytes_consumed, SIMPLE.len());
    }

    #[test]
    fn folded_header_joins_continuation_lines() {
        let raw = "Subject: first part\r\n\tsecond part\r\nFrom: x@y.example\r\n\r\nbody\r\n";
        let msg = parse_emlx_bytes(&frame(raw)).unwrap();
        assert_eq!(msg.subject.as_deref(), Some("first part second part"));
    }

    #[test]
    fn unparseable_date_is_none_but_kept_raw() {
        let raw = "From: x@y.example\r\nDate: not a date\r\n\r\nbody\r\n";
        let msg = parse_emlx_bytes(&frame(raw)).unwrap();
        assert!(msg.date.is_none());
        assert!(
            msg.headers
                .iter()
                .any(|(k, v)| k == "Date" && v == "not a date")
        );
    }

    #[test]
    fn plist_trailer_is_parsed() {
        let message = "From: x@y.example\r\n\r\nbody\r\n";
        let mut data = frame(message);
        data.extend_from_slice(
            br#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
    <key>flags</key>
    <integer>8590195713</integer>
    <key>date-received</key>
    <real>1690000000.5</real>
    <key>color</key>
    <string>none</string>
    <key>junk</key>
    <false/>
</dict>
</plist>
"#,
        );

        let msg = parse_emlx_bytes(&data).unwrap();
        let plist = msg.apple_plist.expect("plist parsed");
        assert_eq!(plist.get("flags"), Some(&PlistValue::Integer(8590195713)));
        assert_eq!(
            plist.get("date-received"),
            Some(&PlistValue::Real(1690000000.5))
        );
        assert_eq!(
            plist.get("color"),
            Some(&PlistValue::String("none".to_string()))
        );
        assert_eq!(plist.get("junk"), Some(&PlistValue::Bool(false)));
    }

    #[test]
    fn malformed_trailer_is_ignored() {
        let message = "From: x@y.example\r\n\r\nbody\r\n";
        let mut data = frame(message);
        data.extend_from_slice(b"<plist><dict><key>broken");
        let msg = parse_emlx_bytes(&data).unwrap();
        assert!(msg.apple_plist.is_none());
        assert_eq!(msg.body_text.as_deref(), Some("body\r\n"));
    }
}
