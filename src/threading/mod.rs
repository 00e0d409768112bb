//! Conversation detection.
//!
//! Messages map to threads by their strongest linking evidence, in order:
//! the root of the References chain, then In-Reply-To, then the normalized
//! subject, then the message's own id. Detection is a pure function; the
//! database work (junction upkeep, metadata recompute) lives in the
//! processing functions, and [`CachedThreadService`] puts an LRU cache in
//! front of thread reads.

mod cached;
mod detector;

pub use cached::{CachedThreadService, DEFAULT_CACHE_CAPACITY};
pub use detector::{
    detect_thread_id, is_forwarded, is_reply, normalize_subject, process_message_for_threading,
    process_messages_for_threading,
};
