//! Structured header values: addresses and threading identifiers.

use crate::identity::normalize_message_id;

/// A parsed mailbox address with an optional display name.
///
/// Display names have already been decoded per RFC 2047; empty displays are
/// `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAddress {
    pub name: Option<String>,
    pub email: String,
}

impl EmailAddress {
    /// `"Name <email>"` when a display name is present, else the bare email.
    pub fn display_string(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => format!("{} <{}>", name, self.email),
            _ => self.email.clone(),
        }
    }
}

/// Parse an address-list header value (`From`, `To`, `Cc`, `Bcc`).
///
/// Accepts `bare@host`, `Display <bare@host>`, and `"Quoted" <bare@host>`
/// forms, including comma-separated lists and groups. Unparseable input
/// yields an empty list rather than an error; a missing recipient header and
/// a malformed one look the same to callers.
pub fn parse_address_list(value: &str) -> Vec<EmailAddress> {
    let Ok(parsed) = mailparse::addrparse(value) else {
        return Vec::new();
    };

    let mut addresses = Vec::new();
    for addr in parsed.iter() {
        match addr {
            mailparse::MailAddr::Single(info) => addresses.push(single_to_address(info)),
            mailparse::MailAddr::Group(group) => {
                addresses.extend(group.addrs.iter().map(single_to_address));
            }
        }
    }
    addresses
}

fn single_to_address(info: &mailparse::SingleInfo) -> EmailAddress {
    let name = info
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from);
    EmailAddress {
        name,
        email: info.addr.clone(),
    }
}

/// The identifiers a message contributes to thread detection, normalized
/// (trimmed, bracket-stripped, lowercased).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThreadingHeaders {
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    /// Reference chain, oldest first, deduplicated preserving first
    /// occurrence.
    pub references: Vec<String>,
}

/// Extract threading identifiers from already-split header values.
pub fn parse_threading(
    message_id: Option<&str>,
    in_reply_to: Option<&str>,
    references: &[String],
) -> ThreadingHeaders {
    let mut seen = Vec::new();
    for token in references {
        if let Some(normalized) = normalize_message_id(token) {
            if !seen.contains(&normalized) {
                seen.push(normalized);
            }
        }
    }

    ThreadingHeaders {
        message_id: message_id.and_then(normalize_message_id),
        in_reply_to: in_reply_to.and_then(normalize_message_id),
        references: seen,
    }
}
