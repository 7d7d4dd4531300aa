//! Device name to DNS label conversion.

/// Characters that survive sanitization unchanged. `0` and `8` are not in
/// the set and are mapped to `-` like any other character.
const ALLOWED: &str = "abcdefghijklmnopqrstuvwxyz12345679-";

/// Turn a free-form device name into a DNS label.
///
/// The name is lower-cased one character at a time, every character
/// outside the allow-list becomes `-`, and runs of `-` collapse into one
/// with leading and trailing hyphens removed. An empty result means the
/// name is unusable.
///
/// ```
/// use unifi_names_dns::names::sanitize;
///
/// assert_eq!(sanitize("Joe's Notebook"), "joe-s-notebook");
/// assert_eq!(sanitize("--"), "");
/// ```
pub fn sanitize(raw: &str) -> String {
    // Per-char lowering keeps one output char per input char; `İ` is `i`.
    let mapped: String = raw
        .chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .map(|c| if ALLOWED.contains(c) { c } else { '-' })
        .collect();

    mapped
        .split('-')
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
