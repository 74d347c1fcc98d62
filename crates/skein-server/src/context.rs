//! Cancellable call context.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Context carried by every call and stream.
///
/// Clones and [`Context::scoped`] children share cancellation state:
/// cancelling any of them cancels them all. The server cancels a
/// connection's contexts when it stops. Cancellation is cooperative;
/// handlers poll [`Context::is_cancelled`].
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
    metadata: Arc<BTreeMap<String, String>>,
}

impl Context {
    /// Creates an uncancelled context without metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an uncancelled context carrying call metadata.
    #[must_use]
    pub fn with_metadata(metadata: BTreeMap<String, String>) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            metadata: Arc::new(metadata),
        }
    }

    /// Creates a context carrying `metadata` that shares this context's
    /// cancellation state.
    #[must_use]
    pub fn scoped(&self, metadata: BTreeMap<String, String>) -> Self {
        Self {
            cancelled: Arc::clone(&self.cancelled),
            metadata: Arc::new(metadata),
        }
    }

    /// Metadata supplied by the caller.
    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Marks this context, and every clone of it, as cancelled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Reports whether [`Context::cancel`] has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
