//! Runtime limits and defaults.
//!
//! TigerStyle: every limit is explicit and carries its unit in the name.

/// Mailbox depth at which each further offer logs a warning.
///
/// The mailbox itself never rejects an offer; this is a log-only watermark
/// for hosts whose consumers fall behind.
pub const MAILBOX_DEPTH_WARN_DEFAULT: usize = 4096;

/// Completed plan invocations slower than this are logged as slow.
///
/// Log-only. The run loop never preempts a plan; deadlines belong to plan
/// authors.
pub const SLOW_PLAN_WARN_MS_DEFAULT: u64 = 1_000;

/// Queue capacity a fresh mailbox reserves up front.
pub const MAILBOX_PREALLOC_COUNT: usize = 32;

// Compile-time sanity checks on the defaults.
const _: () = {
    assert!(MAILBOX_DEPTH_WARN_DEFAULT > 0);
    assert!(MAILBOX_DEPTH_WARN_DEFAULT >= MAILBOX_PREALLOC_COUNT);
    assert!(SLOW_PLAN_WARN_MS_DEFAULT > 0);
};
