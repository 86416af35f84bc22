//! Capability seam between the session controller and whatever radio or
//! software stands in for one. The controller drives these traits and never
//! sees a concrete transport type.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::ndef::{NdefMessage, TagStatus};

mod emulated;
pub use emulated::{EmulatedSession, EmulatedTag, EmulatedTransport};

/// Why a session stopped delivering detections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEndReason {
    UserCancelled,
    FirstTagRead,
    Error(String),
}

/// One wakeup from a scanning session: either a batch of detected tags or
/// the terminal notice that the session has ended.
pub enum Detection {
    Tags(Vec<Arc<dyn TagHandle>>),
    Ended(SessionEndReason),
}

#[async_trait]
pub trait TagTransport: Send + Sync {
    fn scanning_available(&self) -> bool;

    /// Open a scanning session showing `prompt`. When
    /// `invalidate_after_first_read` is false the session stays connected
    /// across several tag exchanges.
    async fn begin_session(
        &self,
        prompt: &str,
        invalidate_after_first_read: bool,
    ) -> Result<Arc<dyn TagSession>>;
}

#[async_trait]
pub trait TagSession: Send + Sync {
    /// Resolves with the next detection batch, or with `Ended` once the
    /// session terminates for any reason (cancellation included).
    async fn next_detection(&self) -> Detection;

    async fn set_prompt(&self, text: &str);

    /// Resume polling for tags after a rejected detection batch.
    async fn restart_polling(&self);

    /// End the session. Idempotent.
    async fn invalidate(&self);
}

#[async_trait]
pub trait TagHandle: Send + Sync {
    async fn connect(&self) -> Result<()>;

    /// NDEF capability and capacity in bytes.
    async fn query_status(&self) -> Result<(TagStatus, usize)>;

    async fn read_message(&self) -> Result<Option<NdefMessage>>;

    async fn write_message(&self, message: &NdefMessage) -> Result<()>;
}

/// Null transport for hosts without a reader.
pub struct MissingTagTransport;

#[async_trait]
impl TagTransport for MissingTagTransport {
    fn scanning_available(&self) -> bool {
        false
    }

    async fn begin_session(
        &self,
        _prompt: &str,
        _invalidate_after_first_read: bool,
    ) -> Result<Arc<dyn TagSession>> {
        Err(anyhow!("tag transport is unavailable on this host"))
    }
}
