//! Software tag and transport. Backs the CLI's file-based tag image and the
//! controller tests; failure injection covers the flaky-transport paths a
//! physical tag exercises (removal mid-read, bad writes, cancellation).

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::ndef::{NdefMessage, TagStatus};
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::{Detection, SessionEndReason, TagHandle, TagSession, TagTransport};

#[derive(Default)]
struct TagFailures {
    connect: Option<String>,
    read: Option<String>,
    write: Option<String>,
}

struct TagState {
    status: TagStatus,
    capacity: usize,
    message: Option<NdefMessage>,
    failures: TagFailures,
    writes: u32,
}

/// An in-memory tag with a fixed status and capacity.
pub struct EmulatedTag {
    state: Mutex<TagState>,
}

impl EmulatedTag {
    pub fn new(status: TagStatus, capacity: usize) -> Self {
        Self {
            state: Mutex::new(TagState {
                status,
                capacity,
                message: None,
                failures: TagFailures::default(),
                writes: 0,
            }),
        }
    }

    pub fn read_write(capacity: usize) -> Self {
        Self::new(TagStatus::ReadWrite, capacity)
    }

    pub fn read_only(capacity: usize) -> Self {
        Self::new(TagStatus::ReadOnly, capacity)
    }

    pub fn not_supported() -> Self {
        Self::new(TagStatus::NotSupported, 0)
    }

    pub fn with_message(mut self, message: NdefMessage) -> Self {
        self.state.get_mut().message = Some(message);
        self
    }

    pub fn failing_connect(mut self, message: impl Into<String>) -> Self {
        self.state.get_mut().failures.connect = Some(message.into());
        self
    }

    pub fn failing_read(mut self, message: impl Into<String>) -> Self {
        self.state.get_mut().failures.read = Some(message.into());
        self
    }

    pub fn failing_write(mut self, message: impl Into<String>) -> Self {
        self.state.get_mut().failures.write = Some(message.into());
        self
    }

    pub async fn stored_message(&self) -> Option<NdefMessage> {
        self.state.lock().await.message.clone()
    }

    pub async fn write_count(&self) -> u32 {
        self.state.lock().await.writes
    }
}

#[async_trait]
impl TagHandle for EmulatedTag {
    async fn connect(&self) -> Result<()> {
        let state = self.state.lock().await;
        if let Some(message) = &state.failures.connect {
            return Err(anyhow!(message.clone()));
        }
        Ok(())
    }

    async fn query_status(&self) -> Result<(TagStatus, usize)> {
        let state = self.state.lock().await;
        Ok((state.status, state.capacity))
    }

    async fn read_message(&self) -> Result<Option<NdefMessage>> {
        let state = self.state.lock().await;
        if let Some(message) = &state.failures.read {
            return Err(anyhow!(message.clone()));
        }
        Ok(state.message.clone())
    }

    async fn write_message(&self, message: &NdefMessage) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(failure) = &state.failures.write {
            return Err(anyhow!(failure.clone()));
        }
        if message.encoded_len() > state.capacity {
            return Err(anyhow!(
                "message of {} bytes exceeds tag capacity {}",
                message.encoded_len(),
                state.capacity
            ));
        }
        debug!(encoded_len = message.encoded_len(), "emulated tag written");
        state.message = Some(message.clone());
        state.writes += 1;
        Ok(())
    }
}

struct SessionState {
    pending: VecDeque<Vec<Arc<dyn TagHandle>>>,
    ended: Option<SessionEndReason>,
    prompts: Vec<String>,
    restarts: u32,
}

/// A scanning session over a scripted sequence of detection batches.
pub struct EmulatedSession {
    state: Mutex<SessionState>,
    wake: Notify,
}

impl EmulatedSession {
    fn new(batches: Vec<Vec<Arc<dyn TagHandle>>>) -> Self {
        Self {
            state: Mutex::new(SessionState {
                pending: batches.into(),
                ended: None,
                prompts: Vec::new(),
                restarts: 0,
            }),
            wake: Notify::new(),
        }
    }

    /// End the session with an explicit reason, waking any parked
    /// `next_detection`. Later calls keep the first reason.
    pub async fn terminate(&self, reason: SessionEndReason) {
        let mut state = self.state.lock().await;
        if state.ended.is_none() {
            state.ended = Some(reason);
        }
        self.wake.notify_one();
    }

    pub async fn prompts(&self) -> Vec<String> {
        self.state.lock().await.prompts.clone()
    }

    pub async fn restart_count(&self) -> u32 {
        self.state.lock().await.restarts
    }
}

#[async_trait]
impl TagSession for EmulatedSession {
    async fn next_detection(&self) -> Detection {
        loop {
            let waiting = self.wake.notified();
            {
                let mut state = self.state.lock().await;
                if let Some(reason) = state.ended.clone() {
                    return Detection::Ended(reason);
                }
                if let Some(batch) = state.pending.pop_front() {
                    debug!(tags = batch.len(), "emulated detection delivered");
                    return Detection::Tags(batch);
                }
            }
            waiting.await;
        }
    }

    async fn set_prompt(&self, text: &str) {
        self.state.lock().await.prompts.push(text.to_string());
    }

    async fn restart_polling(&self) {
        self.state.lock().await.restarts += 1;
        self.wake.notify_one();
    }

    async fn invalidate(&self) {
        self.terminate(SessionEndReason::UserCancelled).await;
    }
}

/// Transport over a scripted detection sequence. Each session started gets
/// its own copy of the script.
pub struct EmulatedTransport {
    available: bool,
    script: Vec<Vec<Arc<dyn TagHandle>>>,
    sessions: Mutex<Vec<Arc<EmulatedSession>>>,
}

impl EmulatedTransport {
    /// A transport that detects `tag` once per session.
    pub fn new(tag: Arc<EmulatedTag>) -> Self {
        Self::with_script(vec![vec![tag as Arc<dyn TagHandle>]])
    }

    pub fn with_script(script: Vec<Vec<Arc<dyn TagHandle>>>) -> Self {
        Self {
            available: true,
            script,
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// A transport whose sessions never detect anything on their own; tags
    /// appear only through `terminate` or never.
    pub fn parked() -> Self {
        Self::with_script(Vec::new())
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            script: Vec::new(),
            sessions: Mutex::new(Vec::new()),
        }
    }

    pub async fn sessions_started(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn last_session(&self) -> Option<Arc<EmulatedSession>> {
        self.sessions.lock().await.last().cloned()
    }
}

#[async_trait]
impl TagTransport for EmulatedTransport {
    fn scanning_available(&self) -> bool {
        self.available
    }

    async fn begin_session(
        &self,
        prompt: &str,
        _invalidate_after_first_read: bool,
    ) -> Result<Arc<dyn TagSession>> {
        if !self.available {
            return Err(anyhow!("emulated transport marked unavailable"));
        }
        let session = Arc::new(EmulatedSession::new(self.script.clone()));
        session.set_prompt(prompt).await;
        self.sessions.lock().await.push(Arc::clone(&session));
        Ok(session)
    }
}
