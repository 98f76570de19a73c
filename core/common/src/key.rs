//! Key normalization.
//!
//! Keys are flat strings whose segments are separated by `:`. Path-style
//! separators (`/` and `\`) are accepted on input and folded into `:` so that
//! `"cache/users/1"` and `"cache:users:1"` address the same item.

/// Separator between key segments.
pub const KEY_SEPARATOR: char = ':';

/// Normalize a raw key.
///
/// - Everything from the first `?` onward is dropped
/// - `/` and `\` become `:`
/// - Runs of `:` collapse into one
/// - Leading and trailing `:` are removed
///
/// Never fails and is idempotent. The empty string normalizes to itself.
pub fn normalize_key(key: &str) -> String {
    let key = key.split('?').next().unwrap_or_default();
    let mut normalized = String::with_capacity(key.len());

    for ch in key.chars() {
        let ch = match ch {
            '/' | '\\' => KEY_SEPARATOR,
            other => other,
        };
        if ch == KEY_SEPARATOR
            && (normalized.is_empty() || normalized.ends_with(KEY_SEPARATOR))
        {
            continue;
        }
        normalized.push(ch);
    }

    if normalized.ends_with(KEY_SEPARATOR) {
        normalized.pop();
    }
    normalized
}

/// Normalize a mount base.
///
/// Same as [`normalize_key`], with a trailing `:` appended to non-empty
/// bases so that a mount only captures whole segments: `"cache"` matches
/// `"cache:x"` but not `"cachex"`.
pub fn normalize_base_key(base: &str) -> String {
    let mut base = normalize_key(base);
    if !base.is_empty() {
        base.push(KEY_SEPARATOR);
    }
    base
}

/// Rebuild a full normalized key from a mount base and a provider-relative key.
pub fn join_key(base: &str, key: &str) -> String {
    normalize_key(&format!("{base}{key}"))
}
