//! The tag session controller: one scanning session at a time, one tag, one
//! action, one outcome. Drives a [`TagTransport`] through the
//! detect -> connect -> inspect -> act -> respond -> invalidate protocol.

use std::sync::Arc;
use std::time::Duration;

use shared::domain::{Location, Visitor};
use shared::error::TagError;
use shared::ndef::{NdefMessage, NdefRecord, TagStatus};
use tag_transport::{Detection, SessionEndReason, TagHandle, TagSession, TagTransport};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Pause before resuming polling after a rejected multi-tag batch.
const RESTART_POLLING_DELAY: Duration = Duration::from_millis(500);

const TOO_MANY_TAGS_PROMPT: &str =
    "There are too many tags present. Remove all and then try again.";

/// The three things a caller can ask of a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagAction {
    ReadLocation,
    SetupLocation { location_name: String },
    AddVisitor { visitor_name: String },
}

impl TagAction {
    /// User-facing prompt shown while scanning for this action.
    pub fn prompt(&self) -> String {
        match self {
            Self::ReadLocation => "Place tag near the reader to read the location.".to_string(),
            Self::SetupLocation { location_name } => {
                format!("Place tag near the reader to setup {location_name}")
            }
            Self::AddVisitor { visitor_name } => {
                format!("Place tag near the reader to add {visitor_name}")
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::ReadLocation => "read_location",
            Self::SetupLocation { .. } => "setup_location",
            Self::AddVisitor { .. } => "add_visitor",
        }
    }
}

/// How a tag operation ended when it did not fail. `Cancelled` covers the
/// expected terminations (user dismissed the scan, transport auto-closed
/// after the first read) that must never surface as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed(Location),
    Cancelled,
}

/// Single-flight controller over one transport. Concurrent `perform_action`
/// calls fail fast with [`TagError::InProgress`] instead of clobbering the
/// running operation's session.
pub struct TagSessionController {
    transport: Arc<dyn TagTransport>,
    in_flight: Mutex<()>,
}

impl TagSessionController {
    pub fn new(transport: Arc<dyn TagTransport>) -> Self {
        Self {
            transport,
            in_flight: Mutex::new(()),
        }
    }

    /// Run one complete tag interaction. Exactly one outcome per call: a
    /// tag-confirmed [`Location`], a cancellation, or a typed error. The
    /// scanning session opened here is invalidated on every exit path.
    pub async fn perform_action(&self, action: TagAction) -> Result<ActionOutcome, TagError> {
        if !self.transport.scanning_available() {
            return Err(TagError::Unavailable);
        }
        let Ok(_in_flight) = self.in_flight.try_lock() else {
            return Err(TagError::InProgress);
        };

        let session = match self.transport.begin_session(&action.prompt(), false).await {
            Ok(session) => session,
            Err(err) => return Err(TagError::invalidated(err.to_string())),
        };
        info!(action = action.kind(), "tag session started");

        self.run(session.as_ref(), &action).await
    }

    async fn run(
        &self,
        session: &dyn TagSession,
        action: &TagAction,
    ) -> Result<ActionOutcome, TagError> {
        let tag = match self.await_single_tag(session).await? {
            Some(tag) => tag,
            None => {
                info!(action = action.kind(), "tag session cancelled");
                return Ok(ActionOutcome::Cancelled);
            }
        };

        if let Err(err) = tag.connect().await {
            return Err(self.transport_failure(session, &err).await);
        }
        let (status, capacity) = match tag.query_status().await {
            Ok(status) => status,
            Err(err) => return Err(self.transport_failure(session, &err).await),
        };
        info!(action = action.kind(), ?status, capacity, "tag connected");

        match (status, action) {
            (TagStatus::NotSupported, _) => {
                Err(self.fail(session, "Unsupported tag.").await)
            }
            // Every action, reads included, requires a writable tag class;
            // a read-only tag is unusable for this protocol.
            (TagStatus::ReadOnly, _) => {
                Err(self.fail(session, "Unable to write to tag.").await)
            }
            (TagStatus::ReadWrite, TagAction::ReadLocation) => {
                let location = self.read_location(session, tag.as_ref()).await?;
                self.finish(session, "Read tag.").await;
                Ok(ActionOutcome::Completed(location))
            }
            (TagStatus::ReadWrite, TagAction::SetupLocation { location_name }) => {
                self.confirm_readable(session, tag.as_ref()).await?;
                self.update_location(
                    session,
                    tag.as_ref(),
                    Location::new(location_name.clone()),
                    None,
                )
                .await
            }
            (TagStatus::ReadWrite, TagAction::AddVisitor { visitor_name }) => {
                let location = self.read_location(session, tag.as_ref()).await?;
                self.update_location(
                    session,
                    tag.as_ref(),
                    location,
                    Some(Visitor::new(visitor_name.clone())),
                )
                .await
            }
        }
    }

    /// Wait for a detection batch containing exactly one tag. Batches with
    /// any other count re-prompt and resume polling after a short delay;
    /// the loop is unbounded and ends only through detection or session
    /// termination.
    async fn await_single_tag(
        &self,
        session: &dyn TagSession,
    ) -> Result<Option<Arc<dyn TagHandle>>, TagError> {
        loop {
            match session.next_detection().await {
                Detection::Tags(mut tags) if tags.len() == 1 => {
                    return Ok(Some(tags.remove(0)));
                }
                Detection::Tags(tags) => {
                    warn!(count = tags.len(), "need exactly one tag, resuming polling");
                    session.set_prompt(TOO_MANY_TAGS_PROMPT).await;
                    tokio::time::sleep(RESTART_POLLING_DELAY).await;
                    session.restart_polling().await;
                }
                Detection::Ended(
                    SessionEndReason::UserCancelled | SessionEndReason::FirstTagRead,
                ) => return Ok(None),
                Detection::Ended(SessionEndReason::Error(message)) => {
                    return Err(TagError::Invalidated { message });
                }
            }
        }
    }

    /// Read the tag and decode its first record as a Location.
    async fn read_location(
        &self,
        session: &dyn TagSession,
        tag: &dyn TagHandle,
    ) -> Result<Location, TagError> {
        let message = match tag.read_message().await {
            Ok(message) => message,
            Err(err) => return Err(self.transport_failure(session, &err).await),
        };
        let Some(record) = message.and_then(|m| m.records.into_iter().next()) else {
            return Err(self.decode_failure(session).await);
        };
        match serde_json::from_slice::<Location>(&record.payload) {
            Ok(location) => Ok(location),
            Err(err) => {
                warn!(error = %err, "tag payload is not a location record");
                Err(self.decode_failure(session).await)
            }
        }
    }

    /// Setup only needs the tag to answer a read before it is overwritten;
    /// a blank or undecodable tag is acceptable here.
    async fn confirm_readable(
        &self,
        session: &dyn TagSession,
        tag: &dyn TagHandle,
    ) -> Result<(), TagError> {
        match tag.read_message().await {
            Ok(_) => Ok(()),
            Err(err) => Err(self.transport_failure(session, &err).await),
        }
    }

    /// Serialize the (possibly extended) location, check it against the
    /// tag's capacity, write it, and read it back so the caller receives the
    /// tag-confirmed value rather than the in-memory one.
    async fn update_location(
        &self,
        session: &dyn TagSession,
        tag: &dyn TagHandle,
        mut location: Location,
        visitor: Option<Visitor>,
    ) -> Result<ActionOutcome, TagError> {
        let success_prompt = match visitor {
            Some(visitor) => {
                location.visitors.push(visitor);
                "Successfully added visitor."
            }
            None => "Successfully setup location.",
        };

        let payload = match serde_json::to_vec(&location) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "location failed to serialize");
                return Err(self
                    .fail_with(session, "Bad data", TagError::invalidated("Bad data"))
                    .await);
            }
        };
        let message = NdefMessage::new(vec![NdefRecord::unknown(payload)]);

        let (_, capacity) = match tag.query_status().await {
            Ok(status) => status,
            Err(err) => return Err(self.transport_failure(session, &err).await),
        };
        if message.encoded_len() > capacity {
            warn!(
                encoded_len = message.encoded_len(),
                capacity, "message does not fit on tag"
            );
            let error = TagError::InvalidPayloadSize;
            let prompt = error.to_string();
            return Err(self.fail_with(session, &prompt, error).await);
        }

        if let Err(err) = tag.write_message(&message).await {
            return Err(self.transport_failure(session, &err).await);
        }
        info!(
            encoded_len = message.encoded_len(),
            capacity, "tag message written"
        );

        let confirmed = self.read_location(session, tag).await?;
        self.finish(session, success_prompt).await;
        Ok(ActionOutcome::Completed(confirmed))
    }

    /// Shared error path: show the failure on the scan prompt, invalidate.
    async fn fail_with(
        &self,
        session: &dyn TagSession,
        prompt: &str,
        error: TagError,
    ) -> TagError {
        warn!(error = %error, "tag session aborted");
        session.set_prompt(prompt).await;
        session.invalidate().await;
        error
    }

    async fn fail(&self, session: &dyn TagSession, message: &str) -> TagError {
        self.fail_with(session, message, TagError::invalidated(message))
            .await
    }

    async fn transport_failure(
        &self,
        session: &dyn TagSession,
        err: &anyhow::Error,
    ) -> TagError {
        let message = err.to_string();
        self.fail_with(session, &message, TagError::Invalidated { message: message.clone() })
            .await
    }

    async fn decode_failure(&self, session: &dyn TagSession) -> TagError {
        self.fail_with(session, "Could not read tag data.", TagError::DecodeFailed)
            .await
    }

    async fn finish(&self, session: &dyn TagSession, prompt: &str) {
        session.set_prompt(prompt).await;
        session.invalidate().await;
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
