//! Filename sanitization for extracted archive entries.

/// Longest filename accepted on the target filesystems, in bytes.
pub const MAX_FILENAME_BYTES: usize = 255;

const UNSAFE_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Make a single path component safe to create inside a session directory.
///
/// Unsafe and control characters become `_`; the result is capped at
/// [`MAX_FILENAME_BYTES`] keeping the extension when it fits. Idempotent.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c.is_control() || UNSAFE_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return "unnamed".to_string();
    }

    truncate_preserving_extension(trimmed, MAX_FILENAME_BYTES)
}

/// Last component of an archive entry path (either separator).
pub fn entry_basename(entry_name: &str) -> &str {
    entry_name
        .rsplit(['/', '\\'])
        .find(|s| !s.is_empty())
        .unwrap_or("")
}

fn truncate_preserving_extension(name: &str, max_bytes: usize) -> String {
    if name.len() <= max_bytes {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        Some(idx) if idx > 0 && name.len() - idx <= 16 => name.split_at(idx),
        _ => (name, ""),
    };

    let budget = max_bytes - ext.len();
    let mut cut = budget.min(stem.len());
    while !stem.is_char_boundary(cut) {
        cut -= 1;
    }
    // Truncation can expose trailing whitespace; trim so a second pass is a no-op.
    let stem = stem[..cut].trim_end();
    let stem = if stem.is_empty() { "unnamed" } else { stem };
    format!("{}{}", stem, ext)
}
