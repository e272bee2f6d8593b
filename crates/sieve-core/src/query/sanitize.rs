//! Stripping of datastore operator injection from raw parameters.

use super::spec::QuerySpec;

/// Server-side evaluation operators removed from every value.
pub const BLOCKED_OPERATORS: [&str; 5] = ["$where", "$function", "$accumulator", "$expr", "$eval"];

/// Remove blocked operators until none remain, then trim.
///
/// Removal repeats so fragments like `$wh$whereere` cannot reassemble.
pub fn strip_blocked(value: &str) -> String {
    let mut out = value.to_string();
    loop {
        let before = out.len();
        for op in BLOCKED_OPERATORS {
            if out.contains(op) {
                out = out.replace(op, "");
            }
        }
        if out.len() == before {
            break;
        }
    }
    out.trim().to_string()
}

/// Return a sanitized copy of `spec`.
///
/// Keys carrying a `$` anywhere are dropped, as are keys that are empty after
/// trimming. Values have blocked operators stripped and are trimmed. Keys that
/// collide once trimmed accumulate their values.
pub fn sanitize(spec: &QuerySpec) -> QuerySpec {
    let mut clean = QuerySpec::new();
    for (key, value) in spec.iter() {
        let key = key.trim();
        if key.is_empty() || key.contains('$') {
            tracing::debug!(key, "dropping query parameter");
            continue;
        }
        for raw in value.values() {
            clean.append(key, strip_blocked(raw));
        }
    }
    clean
}
