//! Crate and backup format versions

/// Crate version stamped into backups as `app_version`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Layout of [`crate::backup::BackupDocument`]; bump when exported tables change shape
pub const BACKUP_FORMAT_VERSION: u32 = 1;

/// `BizSync v0.1.1`, with ` [debug]` appended in debug builds
pub fn version_string() -> String {
    if cfg!(debug_assertions) {
        format!("BizSync v{} [debug]", VERSION)
    } else {
        format!("BizSync v{}", VERSION)
    }
}

/// A backup imports only if it was written in this node's format
pub fn is_backup_compatible(format_version: u32) -> bool {
    format_version == BACKUP_FORMAT_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_matches_manifest() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
        assert!(version_string().starts_with(&format!("BizSync v{}", VERSION)));
    }

    #[test]
    fn test_backup_compatibility() {
        assert!(is_backup_compatible(BACKUP_FORMAT_VERSION));
        assert!(!is_backup_compatible(BACKUP_FORMAT_VERSION + 1));
        assert!(!is_backup_compatible(0));
    }
}
