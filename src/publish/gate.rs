use std::path::Path;

use crate::results::SubscriptionResult;
use crate::traits::{FileSystem, Output};

/// Push only when pushing is enabled and at least one resource group exported
pub fn should_push(result: &SubscriptionResult, push_enabled: bool) -> bool {
    push_enabled && result.successful_rgs > 0
}

/// Post-push housekeeping. Returns true if the export directory was removed.
///
/// Removal is permanent; nothing is kept locally once the push succeeded.
pub fn after_push(
    pushed: bool,
    cleanup_after_push: bool,
    export_path: &Path,
    fs: &dyn FileSystem,
    output: &dyn Output,
) -> bool {
    if !pushed || !cleanup_after_push {
        return false;
    }

    match fs.remove_dir_all(export_path) {
        Ok(()) => {
            output.info(&format!("Cleaned up local export: {}", export_path.display()));
            true
        }
        Err(e) => {
            output.warning(&format!("Could not clean up {}: {:#}", export_path.display(), e));
            false
        }
    }
}
