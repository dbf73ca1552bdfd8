// Built-in Job Definitions
//
// The four jobs shipped with the engine: scan, detect_duplicates,
// detect_bursts, auto_tag.

mod bursts;
mod duplicates;
mod scan;
mod tagging;

pub use bursts::DetectBurstsJob;
pub use duplicates::DetectDuplicatesJob;
pub use scan::ScanJob;
pub use tagging::AutoTagJob;

use std::sync::Arc;

use crate::infrastructure::jobs::JobRegistry;
use crate::shared::error::DomainError;

/// Registers the built-in job definitions
///
/// Called once at process start, before the first submission.
pub fn register_builtin_jobs(registry: &JobRegistry) -> Result<(), DomainError> {
    registry.register(Arc::new(ScanJob))?;
    registry.register(Arc::new(DetectDuplicatesJob))?;
    registry.register(Arc::new(DetectBurstsJob))?;
    registry.register(Arc::new(AutoTagJob))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_register_once() {
        let registry = JobRegistry::new();
        register_builtin_jobs(&registry).unwrap();
        assert_eq!(
            registry.list_names(),
            vec!["auto_tag", "detect_bursts", "detect_duplicates", "scan"]
        );
        // Registering twice is a configuration error
        assert!(register_builtin_jobs(&registry).is_err());
    }
}
