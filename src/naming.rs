//! Time-derived unique names for jobs and trials

use chrono::{DateTime, Utc};

/// Length of the `%Y-%m-%d-%H-%M-%S-%3f` suffix
const SUFFIX_LEN: usize = 23;

/// `"<base>-<YYYY-MM-DD-HH-MM-SS-mmm>"`, shortening `base` so the whole name
/// fits in `max_len` characters. The timestamp is never cut.
pub(crate) fn timestamped(base: &str, now: DateTime<Utc>, max_len: usize) -> String {
    let suffix = now.format("%Y-%m-%d-%H-%M-%S-%3f").to_string();
    let room = max_len.saturating_sub(SUFFIX_LEN + 1);
    let base: String = base.chars().take(room).collect();
    let base = base.trim_end_matches('-');
    if base.is_empty() {
        suffix
    } else {
        format!("{base}-{suffix}")
    }
}
