//! Conversation session controller
//!
//! The SessionController is the only place conversation state changes. It:
//! 1. Hydrates history from the store at startup
//! 2. Admits at most one submission at a time
//! 3. Sends prior turns plus the new input to the inference endpoint
//! 4. Appends the reply, or records a generic error, when the call returns
//! 5. Writes the history through to the store after every change
//! 6. Notifies listeners with a fresh view after every change

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::conversation::{ConversationState, Message};
use crate::providers::{CompletionRequest, InferenceClient};

use super::store::ConversationStore;

/// The only failure text a user ever sees
pub const GENERIC_ERROR: &str = "An error occurred. Please try again.";

/// Snapshot of the session handed to renderers
///
/// Views are published from several tasks; a view whose `revision` is not
/// higher than one already seen is stale and can be dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationView {
    pub revision: u64,
    pub messages: Vec<Message>,
    pub draft: String,
    pub is_pending: bool,
    pub error: Option<String>,
    /// Whether the submit action should be enabled
    pub can_submit: bool,
}

impl From<&ConversationState> for ConversationView {
    fn from(state: &ConversationState) -> Self {
        Self {
            revision: state.revision,
            messages: state.history.clone(),
            draft: state.draft.clone(),
            is_pending: state.is_pending,
            error: state.last_error.clone(),
            can_submit: state.can_submit(),
        }
    }
}

/// Receives a new view after every state change
pub trait Listener: Send + Sync {
    fn on_change(&self, view: &ConversationView);
}

impl<F> Listener for F
where
    F: Fn(&ConversationView) + Send + Sync,
{
    fn on_change(&self, view: &ConversationView) {
        self(view)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// What a call to [`SessionController::submit`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Empty draft or a request already in flight; nothing changed
    Ignored,
    /// The endpoint replied and the reply was appended
    Answered,
    /// The call failed; the user turn stays, `last_error` is set
    Failed,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Arc<dyn Listener>)>,
}

pub struct SessionController {
    state: Mutex<ConversationState>,
    store: Arc<dyn ConversationStore>,
    client: Arc<dyn InferenceClient>,
    listeners: Mutex<Listeners>,
}

impl SessionController {
    pub fn new(store: Arc<dyn ConversationStore>, client: Arc<dyn InferenceClient>) -> Self {
        Self {
            state: Mutex::new(ConversationState::default()),
            store,
            client,
            listeners: Mutex::new(Listeners::default()),
        }
    }

    /// Load persisted history and reset the transient flags.
    pub async fn initialize(&self) {
        let history = self.store.load().await;
        tracing::info!(messages = history.len(), "Session initialized");

        {
            let mut state = self.state();
            let revision = state.revision;
            *state = ConversationState {
                revision,
                ..ConversationState::with_history(history)
            };
        }
        self.notify();
    }

    pub fn view(&self) -> ConversationView {
        ConversationView::from(&*self.state())
    }

    pub fn subscribe(&self, listener: Arc<dyn Listener>) -> ListenerId {
        let mut listeners = self.listeners();
        let id = ListenerId(listeners.next_id);
        listeners.next_id += 1;
        listeners.entries.push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners();
        let before = listeners.entries.len();
        listeners.entries.retain(|(entry, _)| *entry != id);
        listeners.entries.len() != before
    }

    /// Replace the draft verbatim. Allowed while a request is in flight.
    pub fn set_draft(&self, text: impl Into<String>) {
        self.state().draft = text.into();
        self.notify();
    }

    /// Send the draft as a new user turn.
    ///
    /// A blank draft or an in-flight request makes this a no-op. A failed call
    /// keeps the user turn in history and sets the generic error.
    pub async fn submit(&self) -> Submission {
        let (request, snapshot) = {
            let mut state = self.state();
            if state.is_pending {
                return Submission::Ignored;
            }
            let Some(input) = state.submittable_input().map(str::to_owned) else {
                return Submission::Ignored;
            };

            let request = CompletionRequest {
                user_input: input.clone(),
                conversation_history: state.history.clone(),
            };

            state.add_user(&input);
            state.draft.clear();
            state.is_pending = true;
            state.last_error = None;

            (request, state.history.clone())
        };

        tracing::debug!(history_len = request.conversation_history.len(), "Submitting");
        self.store.save(&snapshot).await;
        self.notify();

        match self.client.complete(&request).await {
            Ok(reply) => {
                let snapshot = {
                    let mut state = self.state();
                    state.add_assistant(&reply);
                    state.history.clone()
                };
                self.store.save(&snapshot).await;
                self.state().is_pending = false;
                self.notify();

                Submission::Answered
            }
            Err(e) => {
                tracing::warn!(error = %e, "Completion request failed");
                {
                    let mut state = self.state();
                    state.last_error = Some(GENERIC_ERROR.to_string());
                    state.is_pending = false;
                }
                self.notify();

                Submission::Failed
            }
        }
    }

    /// Forget the history and purge the store.
    ///
    /// An in-flight request is not cancelled; its reply lands in the emptied history.
    pub async fn clear(&self) {
        self.state().reset();
        self.store.clear().await;
        tracing::info!("Conversation cleared");
        self.notify();
    }

    fn state(&self) -> MutexGuard<'_, ConversationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        let view = {
            let mut state = self.state();
            state.revision += 1;
            ConversationView::from(&*state)
        };
        let listeners: Vec<_> = self
            .listeners()
            .entries
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            listener.on_change(&view);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::{InMemoryStore, SqliteStore, DEFAULT_KEY};
    use crate::conversation::Role;
    use crate::providers::ClientError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio::sync::Notify;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    /// Mock client that returns queued replies and records every request
    #[derive(Default)]
    struct MockClient {
        replies: Mutex<VecDeque<Result<String, ClientError>>>,
        requests: Mutex<Vec<CompletionRequest>>,
        gate: Option<Arc<Notify>>,
    }

    impl MockClient {
        fn replying(reply: &str) -> Self {
            let client = Self::default();
            client.queue(Ok(reply.to_string()));
            client
        }

        fn failing() -> Self {
            let client = Self::default();
            client.queue(Err(ClientError::InvalidResponse("timed out".into())));
            client
        }

        /// Hold every call until `gate` is notified
        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }

        fn queue(&self, reply: Result<String, ClientError>) {
            self.replies.lock().unwrap().push_back(reply);
        }

        fn recorded(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InferenceClient for MockClient {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, ClientError> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ClientError::InvalidResponse("no reply queued".into())))
        }
    }

    async fn controller(
        client: MockClient,
    ) -> (SessionController, Arc<InMemoryStore>, Arc<MockClient>) {
        let store = Arc::new(InMemoryStore::new());
        let client = Arc::new(client);
        let controller = SessionController::new(store.clone(), client.clone());
        controller.initialize().await;
        (controller, store, client)
    }

    #[tokio::test]
    async fn test_successful_submission() {
        let (controller, store, client) = controller(MockClient::replying("Consider a base case.")).await;

        controller.set_draft("def f(): pass");
        let outcome = controller.submit().await;

        assert_eq!(outcome, Submission::Answered);
        let view = controller.view();
        let expected = vec![
            Message::user("def f(): pass"),
            Message::assistant("Consider a base case."),
        ];
        assert_eq!(view.messages, expected);
        assert!(!view.is_pending);
        assert!(view.error.is_none());
        assert_eq!(view.draft, "");
        assert_eq!(store.load().await, expected);

        let requests = client.recorded();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].user_input, "def f(): pass");
        assert!(requests[0].conversation_history.is_empty());
    }

    #[tokio::test]
    async fn test_failed_submission_keeps_user_turn() {
        let (controller, store, _client) = controller(MockClient::failing()).await;

        controller.set_draft("def f(): pass");
        let outcome = controller.submit().await;

        assert_eq!(outcome, Submission::Failed);
        let view = controller.view();
        assert_eq!(view.messages, vec![Message::user("def f(): pass")]);
        assert_eq!(view.error.as_deref(), Some(GENERIC_ERROR));
        assert!(!view.is_pending);
        assert_eq!(store.load().await, vec![Message::user("def f(): pass")]);
    }

    #[tokio::test]
    async fn test_blank_draft_is_noop() {
        let (controller, store, client) = controller(MockClient::failing()).await;

        // Leave a prior error in place to prove it is not cleared
        controller.set_draft("first");
        controller.submit().await;
        let before = controller.view();

        for draft in ["", "   ", "\n\t  \n"] {
            controller.set_draft(draft);
            assert_eq!(controller.submit().await, Submission::Ignored);
        }

        let after = controller.view();
        assert_eq!(after.messages, before.messages);
        assert_eq!(after.error, before.error);
        assert!(!after.is_pending);
        assert_eq!(client.recorded().len(), 1);
        assert_eq!(store.load().await, before.messages);
    }

    #[tokio::test]
    async fn test_input_is_trimmed() {
        let (controller, _store, client) = controller(MockClient::replying("ok")).await;

        controller.set_draft("\n   fn main() {}  \n\n");
        controller.submit().await;

        assert_eq!(controller.view().messages[0].content, "fn main() {}");
        assert_eq!(client.recorded()[0].user_input, "fn main() {}");
    }

    #[tokio::test]
    async fn test_payload_excludes_new_turn() {
        let client = MockClient::default();
        client.queue(Ok("first reply".into()));
        client.queue(Ok("second reply".into()));
        let (controller, _store, client) = controller(client).await;

        controller.set_draft("one");
        controller.submit().await;
        controller.set_draft("two");
        controller.submit().await;

        let requests = client.recorded();
        assert_eq!(requests[1].user_input, "two");
        assert_eq!(
            requests[1].conversation_history,
            vec![Message::user("one"), Message::assistant("first reply")]
        );
        assert_eq!(controller.view().messages.len(), 4);
    }

    #[tokio::test]
    async fn test_single_flight() {
        let gate = Arc::new(Notify::new());
        let (controller, store, client) =
            controller(MockClient::replying("hint").gated(gate.clone())).await;

        controller.set_draft("first");
        let mut first = task::spawn(controller.submit());
        assert_pending!(first.poll());

        let view = controller.view();
        assert!(view.is_pending);
        assert!(!view.can_submit);
        assert_eq!(view.messages, vec![Message::user("first")]);
        assert_eq!(store.load().await, vec![Message::user("first")]);

        // Typing ahead is allowed, submitting is not
        controller.set_draft("second");
        assert_eq!(controller.view().draft, "second");
        let mut second = task::spawn(controller.submit());
        assert_ready_eq!(second.poll(), Submission::Ignored);
        assert_eq!(client.recorded().len(), 1);
        assert_eq!(controller.view().messages.len(), 1);

        gate.notify_one();
        assert!(first.is_woken());
        assert_ready_eq!(first.poll(), Submission::Answered);

        let view = controller.view();
        assert!(!view.is_pending);
        assert_eq!(view.draft, "second");
        assert!(view.can_submit);
        assert_eq!(
            view.messages,
            vec![Message::user("first"), Message::assistant("hint")]
        );
    }

    #[tokio::test]
    async fn test_retry_after_failure() {
        let client = MockClient::default();
        client.queue(Err(ClientError::InvalidResponse("down".into())));
        client.queue(Ok("better now".into()));
        let (controller, _store, client) = controller(client).await;

        controller.set_draft("question");
        assert_eq!(controller.submit().await, Submission::Failed);

        controller.set_draft("question");
        assert_eq!(controller.submit().await, Submission::Answered);

        let view = controller.view();
        assert!(view.error.is_none());
        assert_eq!(
            view.messages,
            vec![
                Message::user("question"),
                Message::user("question"),
                Message::assistant("better now"),
            ]
        );
        // The failed turn is part of what the endpoint sees next time
        assert_eq!(
            client.recorded()[1].conversation_history,
            vec![Message::user("question")]
        );
    }

    #[tokio::test]
    async fn test_clear_resets_history_and_store() {
        let client = MockClient::default();
        client.queue(Ok("a".into()));
        client.queue(Err(ClientError::InvalidResponse("down".into())));
        let (controller, store, _client) = controller(client).await;

        controller.set_draft("one");
        controller.submit().await;
        controller.set_draft("two");
        controller.submit().await;
        controller.set_draft("unsent");

        controller.clear().await;

        let view = controller.view();
        assert!(view.messages.is_empty());
        assert!(view.error.is_none());
        assert_eq!(view.draft, "unsent");
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_reply_after_clear_lands_in_empty_history() {
        let gate = Arc::new(Notify::new());
        let (controller, store, _client) =
            controller(MockClient::replying("late").gated(gate.clone())).await;

        controller.set_draft("question");
        let mut pending = task::spawn(controller.submit());
        assert_pending!(pending.poll());

        controller.clear().await;
        assert!(controller.view().is_pending);

        gate.notify_one();
        assert_ready_eq!(pending.poll(), Submission::Answered);

        let expected = vec![Message::assistant("late")];
        assert_eq!(controller.view().messages, expected);
        assert_eq!(store.load().await, expected);
    }

    #[tokio::test]
    async fn test_history_only_grows_between_clears() {
        let client = MockClient::default();
        for i in 0..6 {
            if i % 3 == 0 {
                client.queue(Err(ClientError::InvalidResponse("flaky".into())));
            } else {
                client.queue(Ok(format!("reply {i}")));
            }
        }
        let (controller, _store, _client) = controller(client).await;

        let mut last_len = 0;
        for i in 0..6 {
            controller.set_draft(if i == 2 { "   " } else { "code" });
            controller.submit().await;
            let len = controller.view().messages.len();
            assert!(len >= last_len);
            last_len = len;
        }
    }

    #[tokio::test]
    async fn test_initialize_hydrates_from_store() {
        let store = Arc::new(InMemoryStore::new());
        let saved = vec![Message::user("old"), Message::assistant("older reply")];
        store.save(&saved).await;

        let controller =
            SessionController::new(store.clone(), Arc::new(MockClient::replying("new")));
        controller.initialize().await;

        let view = controller.view();
        assert_eq!(view.messages, saved);
        assert!(!view.is_pending);
        assert!(view.error.is_none());
        assert!(view.draft.is_empty());
    }

    #[tokio::test]
    async fn test_history_survives_restart_with_sqlite() {
        let store = Arc::new(SqliteStore::in_memory(DEFAULT_KEY).await.unwrap());
        let client = MockClient::default();
        client.queue(Ok("one".into()));
        client.queue(Ok("two".into()));

        let first = SessionController::new(store.clone(), Arc::new(client));
        first.initialize().await;
        first.set_draft("a");
        first.submit().await;
        first.set_draft("b");
        first.submit().await;
        let before = first.view().messages;
        drop(first);

        let second = SessionController::new(store.clone(), Arc::new(MockClient::default()));
        second.initialize().await;
        assert_eq!(second.view().messages, before);
        assert_eq!(before.len(), 4);
        assert_eq!(before[3].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_listeners_see_every_transition() {
        let (controller, _store, _client) = controller(MockClient::replying("hint")).await;

        let seen: Arc<Mutex<Vec<ConversationView>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        controller.subscribe(Arc::new(move |view: &ConversationView| {
            sink.lock().unwrap().push(view.clone());
        }));

        controller.set_draft("code");
        controller.submit().await;
        controller.clear().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert!(seen[0].can_submit);
        assert!(seen[1].is_pending);
        assert_eq!(seen[1].messages.len(), 1);
        assert!(!seen[2].is_pending);
        assert_eq!(seen[2].messages.len(), 2);
        assert!(seen[3].messages.is_empty());
    }

    #[tokio::test]
    async fn test_published_revisions_increase() {
        let (controller, _store, _client) = controller(MockClient::replying("hint")).await;
        let initial = controller.view().revision;
        assert!(initial > 0);

        let revisions = Arc::new(Mutex::new(Vec::new()));
        let sink = revisions.clone();
        controller.subscribe(Arc::new(move |view: &ConversationView| {
            sink.lock().unwrap().push(view.revision);
        }));

        controller.set_draft("code");
        controller.submit().await;
        controller.clear().await;
        controller.initialize().await;

        let revisions = revisions.lock().unwrap();
        assert_eq!(revisions.len(), 5);
        assert!(revisions.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(revisions[0] > initial);
        assert_eq!(controller.view().revision, revisions[4]);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_notifications() {
        let (controller, _store, _client) = controller(MockClient::default()).await;

        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();
        let id = controller.subscribe(Arc::new(move |_: &ConversationView| {
            *counter.lock().unwrap() += 1;
        }));

        controller.set_draft("a");
        assert!(controller.unsubscribe(id));
        assert!(!controller.unsubscribe(id));
        controller.set_draft("b");

        assert_eq!(*count.lock().unwrap(), 1);
    }
}
