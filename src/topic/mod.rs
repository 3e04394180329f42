//! Topic name handling
//!
//! Two concerns live here:
//! - private-path resolution: rewriting the `~` namespace marker against
//!   the configured private path prefix
//! - MQTT topic filter matching (`+`, `#`), used to route inbound broker
//!   messages to the bridge whose source topic is a filter
//!
//! Key rules:
//! - `~` is only special as the first character of a topic
//! - resolution is pure and total; malformed topics pass through untouched
//!   (validation is the owning bus's concern)
//! - filter matching follows the MQTT spec: `#` must terminate the filter,
//!   `+` matches exactly one level, `$`-topics never match wildcard-leading
//!   filters

/// Marker that selects the private namespace when it starts a topic.
pub const PRIVATE_PATH_MARKER: char = '~';

/// Resolve a topic against the private path prefix.
///
/// `~/foo` with prefix `device/01` becomes `device/01/foo`; with an empty
/// prefix it becomes `/foo` (the bus's own namespace root). Topics that do
/// not start with the marker are returned unchanged.
pub fn resolve_private_path(topic: &str, prefix: &str) -> String {
    match topic.strip_prefix(PRIVATE_PATH_MARKER) {
        Some(rest) => format!("{}{}", prefix, rest),
        None => topic.to_string(),
    }
}

/// Check if a topic matches a filter with MQTT wildcard semantics.
pub fn matches_filter(topic: &str, filter: &str) -> bool {
    // Topics starting with $ don't match filters starting with + or #
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let topic_levels: Vec<&str> = topic.split('/').collect();
    let filter_levels: Vec<&str> = filter.split('/').collect();

    let mut ti = 0;
    let mut fi = 0;

    while fi < filter_levels.len() {
        let filter_level = filter_levels[fi];

        if filter_level == "#" {
            // # matches everything remaining
            return true;
        }

        if ti >= topic_levels.len() {
            // No more topic levels but filter has more non-# levels
            return false;
        }

        if filter_level == "+" {
            // + matches any single level
            ti += 1;
            fi += 1;
        } else if filter_level == topic_levels[ti] {
            // Exact match
            ti += 1;
            fi += 1;
        } else {
            // No match
            return false;
        }
    }

    // Both must be exhausted for a match
    ti == topic_levels.len()
}
