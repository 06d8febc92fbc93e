//! StoryReel Core Type Definitions
//!
//! Fundamental aliases and small helpers shared across the pipeline.

// =============================================================================
// ID Types
// =============================================================================

/// Project unique identifier (ULID)
pub type ProjectId = String;

/// Scene unique identifier (ULID)
pub type SceneId = String;

/// Asset unique identifier (ULID)
pub type AssetId = String;

/// Provider-issued identifier of an asynchronous video job
pub type TaskId = String;

/// Time in seconds (floating point)
pub type TimeSec = f64;

/// Generates a new ULID-backed identifier
pub fn new_id() -> String {
    ulid::Ulid::new().to_string()
}

/// Returns the first `n` characters of an identifier (char-boundary safe)
pub fn short_id(id: &str, n: usize) -> &str {
    match id.char_indices().nth(n) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_truncates_on_char_boundary() {
        assert_eq!(short_id("01HZX9ABCDEF", 8), "01HZX9AB");
        assert_eq!(short_id("abc", 8), "abc");
        assert_eq!(short_id("ééééééééé", 2), "éé");
    }

    #[test]
    fn test_new_id_is_unique_ulid() {
        let a = new_id();
        let b = new_id();
        assert_eq!(a.len(), 26);
        assert_ne!(a, b);
    }
}
