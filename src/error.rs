use std::cell::RefCell;
use std::fmt;

/// Errors surfaced to the host by tracker startup and settings parsing.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Antilatency Device Network library is null")]
    DeviceNetworkLibraryMissing,

    #[error("Antilatency Alt Tracking library is null")]
    TrackingLibraryMissing,

    #[error("Failed to load Antilatency Storage Client library")]
    StorageClientLibraryMissing,

    #[error("Failed to load Antilatency Alt Environment Selector library")]
    EnvironmentSelectorLibraryMissing,

    #[error("Failed to create device network")]
    NetworkUnavailable,

    #[error("Failed to create tracking cotask constructor")]
    CotaskConstructorUnavailable,

    #[error("Invalid value for setting '{key}': {value:?}")]
    InvalidSetting { key: String, value: String },

    #[error("Null pointer passed for {0}")]
    NullArgument(&'static str),
}

/// Reasons a tracking session could not be started.
///
/// These are never returned to the host; the sampler logs them and retries on
/// the next device network update.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("no tracking node given")]
    NullNode,

    #[error("{0} is not available")]
    LibraryUnavailable(&'static str),

    #[error("local storage unavailable, Antilatency Service may not be installed")]
    LocalStorageUnavailable,

    #[error("default environment is not set, configure it in Antilatency Service")]
    EnvironmentNotConfigured,

    #[error("failed to create environment from stored code")]
    EnvironmentRejected,

    #[error("failed to create placement from stored code")]
    PlacementRejected,

    #[error("failed to start tracking task on node {0}")]
    TaskStartFailed(u32),
}

/// Last-error storage for the C FFI layer, kept per thread.
pub(crate) struct LastError {
    message: RefCell<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: RefCell::new(String::new()),
        }
    }

    pub fn set(&self, err: &TrackerError) {
        *self.message.borrow_mut() = fmt::format(format_args!("{}\0", err));
    }

    pub fn clear(&self) {
        self.message.borrow_mut().clear();
    }

    /// Pointer into the stored message; valid until the next `set`/`clear`.
    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        let msg = self.message.borrow();
        if msg.is_empty() {
            std::ptr::null()
        } else {
            msg.as_ptr() as *const std::ffi::c_char
        }
    }
}
