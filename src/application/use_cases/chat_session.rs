use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::{ChatService, MessageLog, PartialCallback};
use crate::domain::{
    DomainError, GeneratedResponse, Message, MessageFeedback, MessageId, MessageMetadata,
    UserProfile,
};

/// Number of messages requested per page when scrolling back through the log.
pub const MESSAGES_PER_PAGE: usize = 20;

/// Shown in place of a reply whenever the chat service fails.
pub const APOLOGY_TEXT: &str =
    "I apologize, but I seem to have encountered a technical difficulty. Could you please try again?";

/// First id handed to messages created in the session. Pages loaded from the
/// message log are numbered downwards from just below it, so ids keep
/// increasing in history order without colliding.
const FIRST_SESSION_ID: u64 = 1 << 32;

const EVENT_BUFFER: usize = 64;

/// Where a single send cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPhase {
    Idle,
    Sending,
    AwaitingCompletion,
    Fulfilled,
    Failed,
}

/// Operator-facing notifications. Failures that the conversation swallows
/// are reported here.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ResponseGenerated {
        message_id: MessageId,
    },
    ResponseFailed {
        message_id: MessageId,
        error: String,
        retryable: bool,
    },
    PageLoaded {
        page: usize,
        count: usize,
    },
    PageLoadFailed {
        page: usize,
        error: String,
    },
    Cleared,
}

/// Point-in-time copy of the session state, for rendering.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub messages: Vec<Message>,
    pub is_typing: bool,
    pub is_generating: bool,
    pub has_more: bool,
    pub page: usize,
    pub phase: SendPhase,
}

struct IdSequence {
    next_newer: u64,
    next_older: u64,
}

impl IdSequence {
    fn new() -> Self {
        Self {
            next_newer: FIRST_SESSION_ID,
            next_older: FIRST_SESSION_ID - 1,
        }
    }

    fn newer(&mut self) -> MessageId {
        let id = MessageId::new(self.next_newer);
        self.next_newer += 1;
        id
    }

    fn older(&mut self) -> MessageId {
        let id = MessageId::new(self.next_older);
        self.next_older = self.next_older.saturating_sub(1);
        id
    }
}

struct SessionState {
    messages: Vec<Message>,
    is_typing: bool,
    is_generating: bool,
    has_more: bool,
    is_loading_page: bool,
    page: usize,
    phase: SendPhase,
    /// Bumped by `clear_chat` so that replies and pages requested before the
    /// reset are dropped instead of landing in the fresh history.
    epoch: u64,
    ids: IdSequence,
}

impl SessionState {
    fn transition(&mut self, session: Uuid, next: SendPhase) {
        debug!(session = %session, "Send phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }
}

/// Owns the conversation for one chat view: history, turn-taking, retry,
/// feedback and pagination.
///
/// All operations take `&self` and may be driven from concurrent tasks. State
/// lives behind a single lock that is never held across the chat service call,
/// which is the only suspension point of a send cycle. Overlapping sends are
/// rejected by the busy guard (`is_typing`), not queued.
pub struct ChatSession {
    id: Uuid,
    profile: UserProfile,
    chat_service: Arc<dyn ChatService>,
    message_log: Option<Arc<dyn MessageLog>>,
    state: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl ChatSession {
    /// Starts a session seeded with a welcome message for `profile`.
    pub fn new(profile: UserProfile, chat_service: Arc<dyn ChatService>) -> Self {
        let id = Uuid::new_v4();
        let mut ids = IdSequence::new();
        let welcome = Message::assistant(ids.newer(), welcome_text(&profile));
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        info!(session = %id, "Chat session started for {}", profile.name());

        Self {
            id,
            profile,
            chat_service,
            message_log: None,
            state: Mutex::new(SessionState {
                messages: vec![welcome],
                is_typing: false,
                is_generating: false,
                has_more: false,
                is_loading_page: false,
                page: 1,
                phase: SendPhase::Idle,
                epoch: 0,
                ids,
            }),
            events,
        }
    }

    /// Attaches the log that `load_more_messages` pages through.
    pub fn with_message_log(mut self, log: Arc<dyn MessageLog>) -> Self {
        self.message_log = Some(log);
        self.state.get_mut().has_more = true;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.state.lock().await.messages.clone()
    }

    pub async fn is_typing(&self) -> bool {
        self.state.lock().await.is_typing
    }

    pub async fn is_generating(&self) -> bool {
        self.state.lock().await.is_generating
    }

    pub async fn has_more(&self) -> bool {
        self.state.lock().await.has_more
    }

    pub async fn page(&self) -> usize {
        self.state.lock().await.page
    }

    pub async fn phase(&self) -> SendPhase {
        self.state.lock().await.phase
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        SessionSnapshot {
            messages: state.messages.clone(),
            is_typing: state.is_typing,
            is_generating: state.is_generating,
            has_more: state.has_more,
            page: state.page,
            phase: state.phase,
        }
    }

    /// Appends a user turn and the reply to it.
    ///
    /// Dropped silently when `text` is blank or a reply is already pending.
    /// Never fails: a chat service error becomes an apology message.
    pub async fn send_message(&self, text: &str) {
        if let Some((epoch, history)) = self.begin_send(text).await {
            self.complete_turn(epoch, text, &history, None).await;
        }
    }

    /// Same as [`ChatSession::send_message`], reporting the reply as it streams
    /// in. `on_partial` always receives the cumulative text.
    pub async fn send_message_streaming(&self, text: &str, on_partial: PartialCallback<'_>) {
        if let Some((epoch, history)) = self.begin_send(text).await {
            self.complete_turn(epoch, text, &history, Some(on_partial))
                .await;
        }
    }

    /// Regenerates the reply to the last user message.
    ///
    /// Only acts when the history ends with a user message followed by an
    /// assistant message; the old reply is discarded and the user message is
    /// kept in place.
    pub async fn retry_last_message(&self) {
        let (epoch, user_text, history) = {
            let mut state = self.state.lock().await;
            if state.is_typing {
                debug!(session = %self.id, "Retry ignored: a reply is pending");
                return;
            }

            let len = state.messages.len();
            if len < 2 {
                return;
            }
            let last_user = &state.messages[len - 2];
            let last_reply = &state.messages[len - 1];
            if !(last_user.is_from_user() && last_reply.is_from_assistant()) {
                debug!(session = %self.id, "Retry ignored: last exchange is incomplete");
                return;
            }

            let user_text = last_user.text().to_string();
            if let Some(discarded) = state.messages.pop() {
                debug!(session = %self.id, "Discarding reply {} for retry", discarded.id());
            }
            let history = state.messages[..len - 2].to_vec();

            state.is_typing = true;
            state.is_generating = true;
            state.transition(self.id, SendPhase::Sending);
            state.transition(self.id, SendPhase::AwaitingCompletion);
            (state.epoch, user_text, history)
        };

        self.complete_turn(epoch, &user_text, &history, None).await;
    }

    /// Replaces the feedback of the message with `message_id`.
    ///
    /// Returns `false`, changing nothing, when no such message exists.
    pub async fn update_message_feedback(
        &self,
        message_id: MessageId,
        feedback: Option<MessageFeedback>,
    ) -> bool {
        let mut state = self.state.lock().await;
        match state.messages.iter_mut().find(|m| m.id() == message_id) {
            Some(message) => {
                message.set_feedback(feedback);
                true
            }
            None => {
                debug!(session = %self.id, "Feedback ignored: no message {}", message_id);
                false
            }
        }
    }

    /// Prepends the next older page from the message log.
    ///
    /// No-op once the log is exhausted. A failed fetch is logged and leaves
    /// the state untouched so the next call retries the same page.
    pub async fn load_more_messages(&self) {
        let page = {
            let mut state = self.state.lock().await;
            if !state.has_more || state.is_loading_page {
                return;
            }
            state.is_loading_page = true;
            state.page
        };

        self.fetch_page(page * MESSAGES_PER_PAGE, true).await;
    }

    /// Fills the session with the most recent page of the log, which counts
    /// as page 1. Call once after attaching a log.
    pub async fn preload_recent(&self) {
        {
            let mut state = self.state.lock().await;
            if !state.has_more || state.is_loading_page {
                return;
            }
            state.is_loading_page = true;
        }

        self.fetch_page(0, false).await;
    }

    /// Empties the history and asks the chat service to forget its context.
    pub async fn clear_chat(&self) {
        {
            let mut state = self.state.lock().await;
            state.messages.clear();
            state.page = 1;
            state.has_more = false;
            state.epoch += 1;
        }

        self.chat_service.clear_context().await;
        info!(session = %self.id, "Chat history cleared");
        let _ = self.events.send(SessionEvent::Cleared);
    }

    /// Busy-guard check and user-message append. Returns the history that
    /// precedes the new user message.
    async fn begin_send(&self, text: &str) -> Option<(u64, Vec<Message>)> {
        if text.trim().is_empty() {
            debug!(session = %self.id, "Ignoring blank message");
            return None;
        }

        let mut state = self.state.lock().await;
        if state.is_typing {
            debug!(session = %self.id, "Send dropped: a reply is pending");
            return None;
        }

        let history = state.messages.clone();
        let user_message = Message::user(state.ids.newer(), text);
        state.messages.push(user_message);
        state.is_typing = true;
        state.is_generating = true;
        state.transition(self.id, SendPhase::Sending);
        state.transition(self.id, SendPhase::AwaitingCompletion);

        Some((state.epoch, history))
    }

    async fn complete_turn(
        &self,
        epoch: u64,
        user_text: &str,
        history: &[Message],
        on_partial: Option<PartialCallback<'_>>,
    ) {
        let result = match on_partial {
            Some(on_partial) => {
                self.chat_service
                    .generate_response_streaming(user_text, &self.profile, history, on_partial)
                    .await
            }
            None => {
                self.chat_service
                    .generate_response(user_text, &self.profile, history)
                    .await
            }
        };

        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            debug!(session = %self.id, "Reply arrived after the chat was cleared; dropping it");
        } else {
            let message_id = state.ids.newer();
            match result {
                Ok(response) => {
                    state.messages.push(assistant_message(message_id, response));
                    state.transition(self.id, SendPhase::Fulfilled);
                    let _ = self
                        .events
                        .send(SessionEvent::ResponseGenerated { message_id });
                }
                Err(e) => {
                    warn!(session = %self.id, "Failed to generate response: {}", e);
                    state.messages.push(apology_message(message_id));
                    state.transition(self.id, SendPhase::Failed);
                    let _ = self.events.send(failure_event(message_id, &e));
                }
            }
        }

        state.is_typing = false;
        state.is_generating = false;
        state.transition(self.id, SendPhase::Idle);
    }

    async fn fetch_page(&self, offset: usize, advance_page: bool) {
        let Some(log) = self.message_log.clone() else {
            let mut state = self.state.lock().await;
            state.has_more = false;
            state.is_loading_page = false;
            return;
        };

        let (epoch, page) = {
            let state = self.state.lock().await;
            let page = if advance_page { state.page + 1 } else { state.page };
            (state.epoch, page)
        };

        let result = log.load_page(offset, MESSAGES_PER_PAGE).await;

        let mut state = self.state.lock().await;
        state.is_loading_page = false;
        if state.epoch != epoch {
            debug!(session = %self.id, "Page arrived after the chat was cleared; dropping it");
            return;
        }

        match result {
            Ok(older) => {
                let count = older.len();
                if count < MESSAGES_PER_PAGE {
                    state.has_more = false;
                }

                // Number the page newest-first so ids still ascend front to back.
                let mut renumbered: Vec<Message> = older
                    .into_iter()
                    .rev()
                    .map(|m| {
                        let id = state.ids.older();
                        m.reidentified(id)
                    })
                    .collect();
                renumbered.reverse();
                renumbered.append(&mut state.messages);
                state.messages = renumbered;

                state.page = page;
                info!(session = %self.id, "Loaded {} older messages (page {})", count, page);
                let _ = self.events.send(SessionEvent::PageLoaded { page, count });
            }
            Err(e) => {
                warn!(session = %self.id, "Failed to load more messages: {}", e);
                let _ = self.events.send(SessionEvent::PageLoadFailed {
                    page,
                    error: e.to_string(),
                });
            }
        }
    }
}

fn welcome_text(profile: &UserProfile) -> String {
    format!(
        "Ah, welcome {}! I see you've come seeking guidance about {}. \
         Let's explore this scene in your reality film together.",
        profile.name(),
        profile.transformation_intent().label()
    )
}

fn assistant_message(id: MessageId, response: GeneratedResponse) -> Message {
    let message = Message::assistant(id, response.text);
    match response.metadata {
        Some(metadata) => message.with_metadata(metadata),
        None => message,
    }
}

fn apology_message(id: MessageId) -> Message {
    Message::assistant(id, APOLOGY_TEXT).with_metadata(
        MessageMetadata::default()
            .with_relevance_score(0.0)
            .with_cached(false),
    )
}

fn failure_event(message_id: MessageId, error: &DomainError) -> SessionEvent {
    SessionEvent::ResponseFailed {
        message_id,
        error: error.to_string(),
        retryable: error.is_retryable(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TransformationIntent;

    #[test]
    fn id_sequence_grows_both_ways_without_overlap() {
        let mut ids = IdSequence::new();
        let a = ids.newer();
        let b = ids.newer();
        let older = ids.older();
        let oldest = ids.older();

        assert!(oldest < older);
        assert!(older < a);
        assert!(a < b);
    }

    #[test]
    fn welcome_mentions_name_and_intent() {
        let profile = UserProfile::new("Alice")
            .with_transformation_intent(TransformationIntent::BreakingPatterns);
        let text = welcome_text(&profile);

        assert!(text.contains("Alice"));
        assert!(text.contains("breaking patterns"));
    }

    #[test]
    fn apology_carries_zero_relevance_and_no_cache() {
        let message = apology_message(MessageId::new(9));
        let metadata = message.metadata().unwrap();

        assert_eq!(message.text(), APOLOGY_TEXT);
        assert!(message.is_from_assistant());
        assert_eq!(metadata.relevance_score, Some(0.0));
        assert_eq!(metadata.cached, Some(false));
    }

    #[test]
    fn failure_event_flags_retryable_errors() {
        let event = failure_event(MessageId::new(1), &DomainError::transport("timed out"));
        match event {
            SessionEvent::ResponseFailed { retryable, error, .. } => {
                assert!(retryable);
                assert!(error.contains("timed out"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
