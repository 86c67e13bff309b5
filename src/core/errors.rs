//! Error types shared by the engine. Only [`RunError`] ever reaches `main`;
//! everything else is recovered where it is handled and logged once there.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationError {
    #[error("chunk {index} has an invalid layout ({bytes} bytes, align {align})")]
    InvalidLayout {
        index: usize,
        bytes: usize,
        align: usize,
    },
    #[error("out of memory while allocating chunk {index} ({bytes} bytes)")]
    OutOfMemory { index: usize, bytes: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("{op} is not supported on this platform")]
    Unsupported { op: &'static str },
    #[error("{op} failed: {msg}")]
    Syscall { op: &'static str, msg: String },
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum MonitorError {
    #[error("current process is not visible to the monitor")]
    ProcessNotFound,
    #[error("system statistics unavailable: {msg}")]
    Unavailable { msg: String },
}

/// Fatal outcomes of a run. Anything not listed here is degraded to a warning.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("invalid configuration: {msg}")]
    InvalidConfiguration { msg: String },
    #[error("no memory chunk could be allocated: {source}")]
    EmptyPool {
        #[source]
        source: AllocationError,
    },
    #[error("internal error: {msg}")]
    Internal { msg: String },
}
