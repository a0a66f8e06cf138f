use serde::{Deserialize, Serialize};

/// The sender of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single chat message. Immutable once appended, except for the assistant
/// placeholder whose content is replaced when the completion arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A conversation: a title plus an ordered message transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: u64,
    pub title: String,
    pub messages: Vec<Message>,
}

/// Owns every conversation and tracks which one is active. All mutation of
/// conversation state goes through this store.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    active_id: Option<u64>,
    next_id: u64,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty conversation, make it active, and return its id.
    pub fn new_conversation(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.conversations.push(Conversation {
            id,
            title: "New chat".to_string(),
            messages: Vec::new(),
        });
        self.active_id = Some(id);
        id
    }

    pub fn active_conversation_id(&self) -> Option<u64> {
        self.active_id
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active_id.and_then(|id| self.get(id))
    }

    /// Switch the active conversation. Unknown ids are ignored.
    pub fn select(&mut self, id: u64) {
        if self.get(id).is_some() {
            self.active_id = Some(id);
        }
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn get(&self, id: u64) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn add_message(&mut self, id: u64, message: Message) {
        if let Some(conversation) = self.get_mut(id) {
            conversation.messages.push(message);
        }
    }

    /// Replace the content of the conversation's last message in place.
    /// No-op when the conversation is unknown or empty.
    pub fn update_last_message(&mut self, id: u64, content: impl Into<String>) {
        if let Some(conversation) = self.get_mut(id) {
            if let Some(last) = conversation.messages.last_mut() {
                last.content = content.into();
            }
        }
    }

    pub fn set_title(&mut self, id: u64, title: impl Into<String>) {
        if let Some(conversation) = self.get_mut(id) {
            conversation.title = title.into();
        }
    }

    fn get_mut(&mut self, id: u64) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_conversation_becomes_active() {
        let mut store = ConversationStore::new();
        assert!(store.active_conversation().is_none());

        let id = store.new_conversation();
        assert_eq!(store.active_conversation_id(), Some(id));
        assert_eq!(store.active_conversation().unwrap().title, "New chat");
    }

    #[test]
    fn add_message_targets_the_given_conversation() {
        let mut store = ConversationStore::new();
        let first = store.new_conversation();
        let second = store.new_conversation();

        store.add_message(first, Message::user("hi"));

        assert_eq!(store.get(first).unwrap().messages.len(), 1);
        assert!(store.get(second).unwrap().messages.is_empty());
    }

    #[test]
    fn update_last_message_replaces_content_in_place() {
        let mut store = ConversationStore::new();
        let id = store.new_conversation();
        store.add_message(id, Message::user("question"));
        store.add_message(id, Message::assistant(""));

        store.update_last_message(id, "answer");

        let messages = &store.get(id).unwrap().messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "question");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "answer");
    }

    #[test]
    fn update_last_message_on_empty_conversation_is_a_noop() {
        let mut store = ConversationStore::new();
        let id = store.new_conversation();
        store.update_last_message(id, "orphan");
        assert!(store.get(id).unwrap().messages.is_empty());
    }

    #[test]
    fn select_switches_the_active_conversation() {
        let mut store = ConversationStore::new();
        let first = store.new_conversation();
        let second = store.new_conversation();
        assert_eq!(store.active_conversation_id(), Some(second));

        store.select(first);
        assert_eq!(store.active_conversation_id(), Some(first));

        // Unknown id leaves the selection alone
        store.select(999);
        assert_eq!(store.active_conversation_id(), Some(first));
    }

    #[test]
    fn set_title_updates_the_conversation() {
        let mut store = ConversationStore::new();
        let id = store.new_conversation();
        store.set_title(id, "Hello");
        assert_eq!(store.get(id).unwrap().title, "Hello");
    }
}
