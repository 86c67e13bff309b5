use crate::core::errors::PlatformError;

/// Best-effort OS hooks. Every method may fail without affecting the run;
/// callers log the error and carry on.
#[mockall::automock]
pub trait Platform: std::fmt::Debug + Send + Sync {
    fn page_size(&self) -> usize;

    /// Pins current and future process memory against swap-out.
    fn lock_memory(&self) -> Result<(), PlatformError>;

    fn unlock_memory(&self) -> Result<(), PlatformError>;

    fn raise_priority(&self) -> Result<(), PlatformError>;

    /// Makes the process the last candidate for the OOM killer.
    fn shield_from_oom_killer(&self) -> Result<(), PlatformError>;
}
