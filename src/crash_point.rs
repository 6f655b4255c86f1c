//! Crash point injection for fault testing
//!
//! Setting `PITR_CRASH_POINT=<name>` makes the process abort the moment
//! execution reaches that point: no cleanup, no unwinding, no catching.
//! Fault tests use it to prove a restore interrupted at any stage leaves
//! a dbpath that cannot be mistaken for a restored one.
//!
//! ```bash
//! PITR_CRASH_POINT=restore_after_replay pitrestore restore --dbpath ... --channel ...
//! ```

use std::sync::OnceLock;

/// Environment variable naming the active crash point
pub const CRASH_POINT_ENV: &str = "PITR_CRASH_POINT";

static CRASH_POINT: OnceLock<Option<String>> = OnceLock::new();

#[inline]
fn get_crash_point() -> Option<&'static str> {
    CRASH_POINT
        .get_or_init(|| std::env::var(CRASH_POINT_ENV).ok())
        .as_deref()
}

/// Returns true if `PITR_CRASH_POINT` equals `name`
#[inline]
pub fn crash_point_enabled(name: &str) -> bool {
    get_crash_point().map(|p| p == name).unwrap_or(false)
}

/// Abort the process if the named crash point is enabled
#[inline]
pub fn maybe_crash(name: &str) {
    if crash_point_enabled(name) {
        eprintln!("[CRASH] Triggering crash at point: {}", name);
        std::process::abort();
    }
}

/// All defined crash point names
pub mod points {
    // Backup staging
    pub const BACKUP_AFTER_CURSOR_OPEN: &str = "backup_after_cursor_open";
    pub const BACKUP_AFTER_FILE_COPY: &str = "backup_after_file_copy";

    // Restore engine stages
    pub const RESTORE_AFTER_LOCK: &str = "restore_after_lock";
    pub const RESTORE_AFTER_CONFIG: &str = "restore_after_config";
    pub const RESTORE_AFTER_CHECKPOINT_APPLIED: &str = "restore_after_checkpoint_applied";
    pub const RESTORE_DURING_REPLAY: &str = "restore_during_replay";
    pub const RESTORE_AFTER_REPLAY: &str = "restore_after_replay";
    pub const RESTORE_AFTER_METADATA: &str = "restore_after_metadata";
    pub const RESTORE_BEFORE_STABLE_CHECKPOINT: &str = "restore_before_stable_checkpoint";

    /// Get all crash point names
    pub fn all() -> &'static [&'static str] {
        &[
            BACKUP_AFTER_CURSOR_OPEN,
            BACKUP_AFTER_FILE_COPY,
            RESTORE_AFTER_LOCK,
            RESTORE_AFTER_CONFIG,
            RESTORE_AFTER_CHECKPOINT_APPLIED,
            RESTORE_DURING_REPLAY,
            RESTORE_AFTER_REPLAY,
            RESTORE_AFTER_METADATA,
            RESTORE_BEFORE_STABLE_CHECKPOINT,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crash_point_disabled_by_default() {
        assert!(!crash_point_enabled("test_point"));
    }

    #[test]
    fn test_restore_points_defined() {
        let all = points::all();
        assert_eq!(all.len(), 9);
        assert!(all.contains(&"restore_after_lock"));
        assert!(all.contains(&"restore_before_stable_checkpoint"));
    }

    #[test]
    fn test_crash_point_names_are_lowercase_with_underscores() {
        for point in points::all() {
            assert!(
                point.chars().all(|c| c.is_lowercase() || c == '_'),
                "Crash point '{}' should be lowercase with underscores",
                point
            );
        }
    }
}
