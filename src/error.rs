//! # Engine Error Kinds
//!
//! The engine surfaces every failure through `eyre::Result`, but the kinds a
//! caller may want to dispatch on are carried by a typed [`EngineError`]
//! raised with `bail!`. Callers can recover the kind from an `eyre::Report`
//! with `report.downcast_ref::<EngineError>()`.
//!
//! Corruption and allocation exhaustion are fatal to the enclosing operation
//! but not to the pool: the caller may keep reading other pages.

use crate::storage::PageLocator;

/// Typed failure kinds surfaced by the core.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// File missing, wrong size, or bad boot-page content.
    BadOpen { reason: String },
    /// The virtual-memory reservation is exhausted.
    BadAlloc { requested: usize, reserved: usize },
    /// A file read failed at the given byte offset.
    Io { offset: u64, reason: String },
    /// A loaded page or row contradicts itself or the schema.
    Corruption { page: PageLocator, reason: String },
    /// A column was requested as one type but declared as another.
    TypeMismatch {
        column: usize,
        requested: &'static str,
        declared: &'static str,
    },
    /// The cooperative cancel flag fired.
    Cancelled,
}

impl EngineError {
    pub fn corruption(page: PageLocator, reason: impl Into<String>) -> Self {
        EngineError::Corruption {
            page,
            reason: reason.into(),
        }
    }

    pub fn bad_open(reason: impl Into<String>) -> Self {
        EngineError::BadOpen {
            reason: reason.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::BadOpen { reason } => write!(f, "bad open: {}", reason),
            EngineError::BadAlloc { requested, reserved } => write!(
                f,
                "reservation exhausted: requested {} bytes from a {} byte reservation",
                requested, reserved
            ),
            EngineError::Io { offset, reason } => {
                write!(f, "read failed at offset {}: {}", offset, reason)
            }
            EngineError::Corruption { page, reason } => {
                write!(f, "corrupt page {}: {}", page, reason)
            }
            EngineError::TypeMismatch {
                column,
                requested,
                declared,
            } => write!(
                f,
                "column {} requested as {} but declared as {}",
                column, requested, declared
            ),
            EngineError::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Cooperative cancellation flag, checked at page boundaries of long scans.
///
/// Cloning shares the flag. The token never unblocks a file read already in
/// flight; it is observed between pages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, std::sync::atomic::Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(std::sync::atomic::Ordering::Acquire)
    }

    pub(crate) fn check(&self) -> eyre::Result<()> {
        if self.is_cancelled() {
            eyre::bail!(EngineError::Cancelled);
        }
        Ok(())
    }
}
