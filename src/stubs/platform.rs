use crate::{
    constants::FALLBACK_PAGE_SIZE,
    core::{errors::PlatformError, traits::platform::Platform},
};

/// Platform without memory locking or process tuning. Every hook reports
/// `Unsupported`, which callers treat as a warning.
#[derive(Debug, Clone)]
#[cfg_attr(target_os = "linux", allow(dead_code))]
pub struct NoopPlatform {
    page_size: usize,
}

#[cfg_attr(target_os = "linux", allow(dead_code))]
impl NoopPlatform {
    pub fn new() -> Self {
        Self {
            page_size: FALLBACK_PAGE_SIZE,
        }
    }
}

impl Platform for NoopPlatform {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn lock_memory(&self) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported { op: "mlockall" })
    }

    fn unlock_memory(&self) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported { op: "munlockall" })
    }

    fn raise_priority(&self) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported { op: "setpriority" })
    }

    fn shield_from_oom_killer(&self) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported {
            op: "oom_score_adj",
        })
    }
}
