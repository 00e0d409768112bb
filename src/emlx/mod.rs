//! Apple Mail emlx parsing.
//!
//! An emlx file is a decimal byte-count line, followed by that many bytes of
//! RFC 5322 message, followed (optionally) by an XML property list with
//! Mail-private metadata. The framing and the plist trailer are handled
//! here; the inner message (header unfolding, RFC 2047 encoded words, MIME
//! multipart, content-transfer-encodings) is parsed with `mailparse` and
//! lifted into structured fields.

mod headers;
mod parser;

pub use headers::{EmailAddress, ThreadingHeaders, parse_address_list, parse_threading};
pub use parser::{AttachmentInfo, EmlxMessage, PlistValue, parse_emlx_bytes, parse_emlx_file};
