use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Field separator inside composite hash inputs.
const FIELD_SEP: char = '\u{1f}';

/// Hash `input` to a 32-character lowercase hex string.
///
/// SHA-256 truncated to its first 16 bytes. The same function backs message
/// ids, thread ids, and mailbox ids; callers disambiguate with a salt prefix
/// in the input.
pub fn stable_hash_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

/// A freshly generated random id: UUIDv4 rendered as 32 hex chars.
pub fn random_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// True iff `s` is exactly 32 chars of `[0-9a-f]`.
pub fn is_valid_id(s: &str) -> bool {
    s.len() == 32 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Trim a raw Message-ID token, strip angle brackets, and lowercase it.
/// Returns `None` when nothing remains.
pub fn normalize_message_id(raw: &str) -> Option<String> {
    let cleaned = raw.trim().trim_matches(&['<', '>'][..]).trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_lowercase())
    }
}

/// Derive the stable id for a mail message from its strongest natural key.
///
/// Priority order: normalized Message-ID, then the header tuple
/// (subject, sender, date, rowid), then the upstream ROWID alone, then a
/// random id for messages with no usable key at all.
pub fn generate_message_id(
    message_id: Option<&str>,
    subject: Option<&str>,
    sender: Option<&str>,
    date: Option<i64>,
    apple_rowid: Option<i64>,
) -> String {
    if let Some(normalized) = message_id.and_then(normalize_message_id) {
        return stable_hash_hex(&format!("msgid:{}", normalized));
    }

    if subject.is_some() || sender.is_some() || date.is_some() {
        let mut input = String::from("hdr:");
        input.push_str(subject.unwrap_or(""));
        input.push(FIELD_SEP);
        input.push_str(&sender.unwrap_or("").to_lowercase());
        input.push(FIELD_SEP);
        if let Some(d) = date {
            input.push_str(&d.to_string());
        }
        input.push(FIELD_SEP);
        if let Some(rowid) = apple_rowid {
            input.push_str(&rowid.to_string());
        }
        return stable_hash_hex(&input);
    }

    if let Some(rowid) = apple_rowid {
        return stable_hash_hex(&format!("row:{}", rowid));
    }

    random_id()
}

/// Stable mailbox id derived from the upstream mailbox url.
pub fn mailbox_id_for_url(url: &str) -> String {
    stable_hash_hex(&format!("mbox:{}", url))
}
