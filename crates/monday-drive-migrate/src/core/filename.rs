//! Centralized filename sanitization.
//!
//! Destination filenames participate in both the duplicate-existence check
//! and the upload itself, so sanitization must be deterministic and applied
//! identically on both paths. Keeping it in one function guarantees that.

/// Characters rejected by common filesystems and by Drive search queries.
const ILLEGAL: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Sanitize a string into a safe, stable filename component.
///
/// Illegal characters become `_`, runs of whitespace collapse to a single
/// space, and surrounding whitespace is trimmed.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_space = false;

    for c in name.trim().chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        if ILLEGAL.contains(&c) {
            out.push('_');
        } else {
            out.push(c);
        }
    }

    out
}
