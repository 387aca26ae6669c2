//! Default values for manifest fields.
//!
//! These functions are used by serde for default deserialization.

pub fn r#false() -> bool {
    false
}

// ============================================================================
// [directories] Section Defaults
// ============================================================================

pub mod directories {
    use std::path::PathBuf;

    pub fn content() -> PathBuf {
        "content".into()
    }

    pub fn template() -> PathBuf {
        "template".into()
    }

    pub fn asset() -> PathBuf {
        "asset".into()
    }

    pub fn cache() -> PathBuf {
        ".cache".into()
    }

    pub fn dist() -> PathBuf {
        "dist".into()
    }
}
