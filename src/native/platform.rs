use std::sync::Arc;

use crate::core::traits::platform::Platform;

/// Picks the platform implementation for the running OS.
pub fn probe() -> Arc<dyn Platform> {
    #[cfg(target_os = "linux")]
    {
        Arc::new(linux::LinuxPlatform::new())
    }
    #[cfg(not(target_os = "linux"))]
    {
        tracing::warn!(
            os = std::env::consts::OS,
            "memory locking and OOM protection are unavailable on this platform"
        );
        Arc::new(crate::stubs::platform::NoopPlatform::new())
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use nix::errno::Errno;
    use nix::libc;
    use nix::sys::mman::{MlockAllFlags, mlockall, munlockall};
    use nix::unistd::{SysconfVar, sysconf};

    use crate::{
        constants::{FALLBACK_PAGE_SIZE, OOM_SCORE_ADJ_MIN, OOM_SCORE_ADJ_PATH, TARGET_NICENESS},
        core::{errors::PlatformError, traits::platform::Platform},
    };

    #[derive(Debug, Clone)]
    pub struct LinuxPlatform {
        page_size: usize,
    }

    impl LinuxPlatform {
        pub fn new() -> Self {
            let page_size = match sysconf(SysconfVar::PAGE_SIZE) {
                Ok(Some(size)) if size > 0 => size as usize,
                other => {
                    tracing::warn!(
                        result = ?other,
                        fallback = FALLBACK_PAGE_SIZE,
                        "could not query page size"
                    );
                    FALLBACK_PAGE_SIZE
                }
            };
            Self { page_size }
        }
    }

    fn syscall_error(op: &'static str, errno: Errno) -> PlatformError {
        PlatformError::Syscall {
            op,
            msg: errno.desc().to_string(),
        }
    }

    impl Platform for LinuxPlatform {
        fn page_size(&self) -> usize {
            self.page_size
        }

        fn lock_memory(&self) -> Result<(), PlatformError> {
            mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE)
                .map_err(|e| syscall_error("mlockall", e))
        }

        fn unlock_memory(&self) -> Result<(), PlatformError> {
            munlockall().map_err(|e| syscall_error("munlockall", e))
        }

        fn raise_priority(&self) -> Result<(), PlatformError> {
            // SAFETY: plain syscall on the calling process, no pointers involved.
            let res = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, TARGET_NICENESS) };
            Errno::result(res)
                .map(drop)
                .map_err(|e| syscall_error("setpriority", e))
        }

        fn shield_from_oom_killer(&self) -> Result<(), PlatformError> {
            std::fs::write(OOM_SCORE_ADJ_PATH, OOM_SCORE_ADJ_MIN).map_err(|source| {
                PlatformError::Io {
                    path: OOM_SCORE_ADJ_PATH.to_string(),
                    source,
                }
            })
        }
    }

}
