use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::store::{ConversationStore, Message};

/// Persona instructions prepended to every completion request.
pub const SYSTEM_PROMPT: &str = "You are Charla, a helpful assistant running in a \
terminal chat client. Answer clearly and concisely, using plain text that reads \
well in a monospaced window. Be helpful, harmless, and honest.";

/// Conversation titles are cut to this many characters.
const TITLE_MAX_CHARS: usize = 50;

/// Generic fallback when a failure renders an empty description.
const GENERIC_SEND_ERROR: &str = "Failed to send message";

/// A remote completion backend: ordered role-tagged messages in, one
/// completion string out.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, model: &str, messages: &[Message]) -> Result<String>;
}

/// Derive a conversation title from its first user message: the first 50
/// characters, with an ellipsis marker when the content is longer.
pub fn derive_title(content: &str) -> String {
    let mut title: String = content.chars().take(TITLE_MAX_CHARS).collect();
    if content.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

/// Coordinates a single message send against the conversation store and a
/// completion client. At most one send is in flight at a time; the `loading`
/// flag is the permit, and overlapping sends are dropped rather than queued.
#[derive(Default)]
pub struct ChatCoordinator {
    pub loading: bool,
    pub error: Option<String>,
    task: Option<JoinHandle<Result<String>>>,
    /// Conversation the in-flight send targets. Recorded at dispatch so a
    /// mid-flight conversation switch cannot misdirect the reply.
    pending: Option<u64>,
}

impl ChatCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch one send: append the user message, derive the title on a
    /// first message, append the empty assistant placeholder, and spawn the
    /// remote call. Returns true when the transcript changed, so the caller
    /// can scroll to the latest message.
    ///
    /// Empty input, a missing active conversation, or an in-flight send all
    /// make this a silent no-op.
    pub fn send_message(
        &mut self,
        store: &mut ConversationStore,
        client: Arc<dyn CompletionClient>,
        model: &str,
        content: &str,
    ) -> bool {
        let content = content.trim();
        if content.is_empty() || self.loading {
            return false;
        }
        let Some(id) = store.active_conversation_id() else {
            return false;
        };

        self.error = None;
        self.loading = true;

        // Snapshot the prior transcript before mutating it; the request
        // payload wants the history as it stood before this send.
        let history: Vec<Message> = store
            .active_conversation()
            .map(|c| c.messages.clone())
            .unwrap_or_default();
        let first_message = history.is_empty();

        let user_message = Message::user(content);
        store.add_message(id, user_message.clone());

        if first_message {
            store.set_title(id, derive_title(content));
        }

        // Payload order: persona, full prior history, then the new message.
        let mut payload = Vec::with_capacity(history.len() + 2);
        payload.push(Message::system(SYSTEM_PROMPT));
        payload.extend(history);
        payload.push(user_message);

        // Placeholder goes in before the remote call resolves so the UI can
        // render a pending state. Its content is replaced, never appended to.
        store.add_message(id, Message::assistant(""));

        tracing::debug!(conversation = id, model, "dispatching completion request");

        let model = model.to_string();
        self.pending = Some(id);
        self.task = Some(tokio::spawn(
            async move { client.complete(&model, &payload).await },
        ));
        true
    }

    /// Non-blocking check driven by UI ticks. When the in-flight call has
    /// settled, applies the outcome and returns true so the caller can
    /// scroll the transcript.
    pub async fn poll_completion(&mut self, store: &mut ConversationStore) -> bool {
        if !self.task.as_ref().is_some_and(|task| task.is_finished()) {
            return false;
        }
        self.settle(store).await;
        true
    }

    /// Await the in-flight completion, if any, and apply its outcome.
    pub async fn settle(&mut self, store: &mut ConversationStore) {
        let Some(task) = self.task.take() else {
            return;
        };
        let result = match task.await {
            Ok(result) => result,
            Err(err) => Err(anyhow!("completion task panicked: {err}")),
        };
        self.finish(store, result);
    }

    fn finish(&mut self, store: &mut ConversationStore, result: Result<String>) {
        let target = self.pending.take();
        match result {
            Ok(reply) => {
                if let Some(id) = target {
                    store.update_last_message(id, reply);
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "completion request failed");
                let display = err.to_string();
                self.error = Some(if display.is_empty() {
                    GENERIC_SEND_ERROR.to_string()
                } else {
                    display
                });
            }
        }
        self.loading = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Role;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    struct FixedClient(&'static str);

    #[async_trait]
    impl CompletionClient for FixedClient {
        async fn complete(&self, _model: &str, _messages: &[Message]) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingClient;

    #[async_trait]
    impl CompletionClient for FailingClient {
        async fn complete(&self, _model: &str, _messages: &[Message]) -> Result<String> {
            Err(anyhow!("connection refused"))
        }
    }

    /// Blocks until notified, then succeeds. Lets tests hold a send in
    /// flight deterministically.
    struct BlockedClient(Arc<Notify>);

    #[async_trait]
    impl CompletionClient for BlockedClient {
        async fn complete(&self, _model: &str, _messages: &[Message]) -> Result<String> {
            self.0.notified().await;
            Ok("done".to_string())
        }
    }

    /// Records the payload it was called with.
    #[derive(Default)]
    struct CapturingClient {
        seen: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl CompletionClient for CapturingClient {
        async fn complete(&self, _model: &str, messages: &[Message]) -> Result<String> {
            *self.seen.lock().unwrap() = messages.to_vec();
            Ok("ok".to_string())
        }
    }

    fn store_with_conversation() -> (ConversationStore, u64) {
        let mut store = ConversationStore::new();
        let id = store.new_conversation();
        (store, id)
    }

    #[tokio::test]
    async fn send_appends_user_then_assistant_pair() {
        let (mut store, id) = store_with_conversation();
        let mut chat = ChatCoordinator::new();

        let sent = chat.send_message(&mut store, Arc::new(FixedClient("4")), "m", "what is 2+2?");
        assert!(sent);
        assert!(chat.loading);

        // Placeholder is visible before the remote call resolves.
        let messages = &store.get(id).unwrap().messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "what is 2+2?");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "");

        chat.settle(&mut store).await;
        assert!(!chat.loading);
        assert!(chat.error.is_none());
        let messages = &store.get(id).unwrap().messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "4");
    }

    #[tokio::test]
    async fn whitespace_only_input_is_a_noop() {
        let (mut store, id) = store_with_conversation();
        let mut chat = ChatCoordinator::new();

        let sent = chat.send_message(&mut store, Arc::new(FixedClient("x")), "m", "   \n\t ");
        assert!(!sent);
        assert!(!chat.loading);
        assert!(store.get(id).unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn no_active_conversation_is_a_noop() {
        let mut store = ConversationStore::new();
        let mut chat = ChatCoordinator::new();

        let sent = chat.send_message(&mut store, Arc::new(FixedClient("x")), "m", "hello");
        assert!(!sent);
        assert!(!chat.loading);
    }

    #[tokio::test]
    async fn reentrant_send_is_dropped_while_loading() {
        let (mut store, id) = store_with_conversation();
        let mut chat = ChatCoordinator::new();
        let gate = Arc::new(Notify::new());

        assert!(chat.send_message(
            &mut store,
            Arc::new(BlockedClient(gate.clone())),
            "m",
            "first",
        ));
        assert!(chat.loading);

        // Second send while the first is in flight: silently dropped.
        let sent = chat.send_message(&mut store, Arc::new(FixedClient("x")), "m", "second");
        assert!(!sent);
        assert_eq!(store.get(id).unwrap().messages.len(), 2);
        assert!(chat.error.is_none());

        gate.notify_one();
        chat.settle(&mut store).await;

        let messages = &store.get(id).unwrap().messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "done");
        assert!(!chat.loading);
    }

    #[tokio::test]
    async fn poll_is_false_until_the_completion_settles() {
        let (mut store, id) = store_with_conversation();
        let mut chat = ChatCoordinator::new();
        let gate = Arc::new(Notify::new());

        chat.send_message(&mut store, Arc::new(BlockedClient(gate.clone())), "m", "hi");
        assert!(!chat.poll_completion(&mut store).await);
        assert!(chat.loading);

        gate.notify_one();
        while !chat.poll_completion(&mut store).await {
            tokio::task::yield_now().await;
        }
        assert!(!chat.loading);
        assert_eq!(store.get(id).unwrap().messages[1].content, "done");
    }

    #[tokio::test]
    async fn first_message_sets_title_from_content() {
        let (mut store, id) = store_with_conversation();
        let mut chat = ChatCoordinator::new();

        chat.send_message(&mut store, Arc::new(FixedClient("hi")), "m", "Hello");
        chat.settle(&mut store).await;
        assert_eq!(store.get(id).unwrap().title, "Hello");

        // A second message never retitles.
        chat.send_message(&mut store, Arc::new(FixedClient("hi")), "m", "Something else");
        chat.settle(&mut store).await;
        assert_eq!(store.get(id).unwrap().title, "Hello");
    }

    #[tokio::test]
    async fn long_first_message_is_truncated_with_ellipsis() {
        let (mut store, id) = store_with_conversation();
        let mut chat = ChatCoordinator::new();

        let long = "a".repeat(60);
        chat.send_message(&mut store, Arc::new(FixedClient("hi")), "m", &long);
        chat.settle(&mut store).await;

        let expected = format!("{}...", "a".repeat(50));
        assert_eq!(store.get(id).unwrap().title, expected);
    }

    #[tokio::test]
    async fn payload_is_system_then_history_then_new_message() {
        let (mut store, id) = store_with_conversation();
        store.add_message(id, Message::user("earlier question"));
        store.add_message(id, Message::assistant("earlier answer"));

        let client = Arc::new(CapturingClient::default());
        let mut chat = ChatCoordinator::new();
        chat.send_message(&mut store, client.clone(), "m", "follow-up");
        chat.settle(&mut store).await;

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0].role, Role::System);
        assert_eq!(seen[0].content, SYSTEM_PROMPT);
        assert_eq!(seen[1].content, "earlier question");
        assert_eq!(seen[2].content, "earlier answer");
        assert_eq!(seen[3].role, Role::User);
        assert_eq!(seen[3].content, "follow-up");
    }

    #[tokio::test]
    async fn trimmed_content_is_what_gets_sent() {
        let (mut store, id) = store_with_conversation();
        let mut chat = ChatCoordinator::new();

        chat.send_message(&mut store, Arc::new(FixedClient("hi")), "m", "  padded  ");
        chat.settle(&mut store).await;
        assert_eq!(store.get(id).unwrap().messages[0].content, "padded");
    }

    #[tokio::test]
    async fn failure_records_error_and_leaves_placeholder_empty() {
        let (mut store, id) = store_with_conversation();
        let mut chat = ChatCoordinator::new();

        chat.send_message(&mut store, Arc::new(FailingClient), "m", "hello");
        chat.settle(&mut store).await;

        assert!(!chat.loading);
        let error = chat.error.as_deref().unwrap();
        assert!(error.contains("connection refused"));

        let messages = &store.get(id).unwrap().messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "");
    }

    #[tokio::test]
    async fn consecutive_failures_append_independent_pairs() {
        let (mut store, id) = store_with_conversation();
        let mut chat = ChatCoordinator::new();

        chat.send_message(&mut store, Arc::new(FailingClient), "m", "one");
        chat.settle(&mut store).await;
        chat.send_message(&mut store, Arc::new(FailingClient), "m", "two");
        chat.settle(&mut store).await;

        let messages = &store.get(id).unwrap().messages;
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].content, "one");
        assert_eq!(messages[1].content, "");
        assert_eq!(messages[2].content, "two");
        assert_eq!(messages[3].content, "");
        assert!(chat.error.is_some());
    }

    #[tokio::test]
    async fn next_send_clears_the_previous_error() {
        let (mut store, _id) = store_with_conversation();
        let mut chat = ChatCoordinator::new();

        chat.send_message(&mut store, Arc::new(FailingClient), "m", "bad");
        chat.settle(&mut store).await;
        assert!(chat.error.is_some());

        chat.send_message(&mut store, Arc::new(FixedClient("ok")), "m", "good");
        assert!(chat.error.is_none());
        chat.settle(&mut store).await;
        assert!(chat.error.is_none());
    }

    #[tokio::test]
    async fn reply_lands_in_the_conversation_it_was_sent_from() {
        let mut store = ConversationStore::new();
        let first = store.new_conversation();
        let mut chat = ChatCoordinator::new();
        let gate = Arc::new(Notify::new());

        chat.send_message(&mut store, Arc::new(BlockedClient(gate.clone())), "m", "hi");

        // Switching conversations mid-flight must not misdirect the reply.
        let second = store.new_conversation();
        store.select(second);

        gate.notify_one();
        chat.settle(&mut store).await;

        assert_eq!(store.get(first).unwrap().messages[1].content, "done");
        assert!(store.get(second).unwrap().messages.is_empty());
    }

    #[test]
    fn derive_title_passes_short_content_through() {
        assert_eq!(derive_title("Hello"), "Hello");
    }

    #[test]
    fn derive_title_counts_characters_not_bytes() {
        let input: String = "é".repeat(51);
        let expected = format!("{}...", "é".repeat(50));
        assert_eq!(derive_title(&input), expected);
    }
}
