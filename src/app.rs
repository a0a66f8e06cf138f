use std::sync::Arc;

use anyhow::Result;
use ratatui::widgets::ListState;

use crate::chat::{ChatCoordinator, CompletionClient};
use crate::claude::ClaudeClient;
use crate::config::Config;
use crate::ollama::OllamaClient;
use crate::openai::OpenAIClient;
use crate::provider::Provider;
use crate::store::ConversationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Conversations,
    Chat,
    Input,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub focus: FocusPane,

    // Conversation state
    pub store: ConversationStore,
    pub chat: ChatCoordinator,
    pub conversation_state: ListState,

    // Input box state
    pub input: String,
    pub input_cursor: usize, // cursor position in chars

    // Transcript scroll state
    pub chat_scroll: u16,
    pub chat_height: u16, // inner height of the transcript area, set during render
    pub chat_width: u16,  // inner width, for wrap calculations

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Provider state
    pub current_provider: Provider,
    pub selected_model: String,
    pub ollama: OllamaClient,
    pub claude_client: Option<ClaudeClient>,
    pub openai_client: Option<OpenAIClient>,

    // Model picker state
    pub show_model_picker: bool,
    pub available_models: Vec<String>,
    pub model_picker_state: ListState,

    // Provider picker state
    pub show_provider_picker: bool,
    pub provider_picker_state: ListState,

    // API key input state
    pub show_api_key_input: bool,
    pub api_key_input: String,
    pub api_key_input_cursor: usize,
    pub api_key_target_provider: Option<Provider>,
}

impl App {
    pub fn new() -> Result<Self> {
        let config = Config::load().unwrap_or_else(|_| Config::new());

        let current_provider = config.provider.unwrap_or(Provider::Ollama);

        // API keys resolve env-first, then config
        let claude_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .or_else(|| config.claude_api_key.clone());
        let claude_client = claude_key.as_deref().map(ClaudeClient::new);

        let openai_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .or_else(|| config.openai_api_key.clone());
        let openai_client = openai_key.as_deref().map(OpenAIClient::new);

        let ollama = OllamaClient::new(config.ollama_base_url());

        let selected_model = config
            .default_model
            .clone()
            .unwrap_or_else(|| default_model_for(current_provider));

        let mut store = ConversationStore::new();
        store.new_conversation();

        let mut conversation_state = ListState::default();
        conversation_state.select(Some(0));

        Ok(Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            focus: FocusPane::Input,

            store,
            chat: ChatCoordinator::new(),
            conversation_state,

            input: String::new(),
            input_cursor: 0,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            animation_frame: 0,

            current_provider,
            selected_model,
            ollama,
            claude_client,
            openai_client,

            show_model_picker: false,
            available_models: Vec::new(),
            model_picker_state: ListState::default(),

            show_provider_picker: false,
            provider_picker_state: ListState::default(),

            show_api_key_input: false,
            api_key_input: String::new(),
            api_key_input_cursor: 0,
            api_key_target_provider: None,
        })
    }

    /// The client for the current provider, or None when its key is missing.
    pub fn completion_client(&self) -> Option<Arc<dyn CompletionClient>> {
        match self.current_provider {
            Provider::Ollama => Some(Arc::new(self.ollama.clone())),
            Provider::Claude => self
                .claude_client
                .clone()
                .map(|c| Arc::new(c) as Arc<dyn CompletionClient>),
            Provider::OpenAI => self
                .openai_client
                .clone()
                .map(|c| Arc::new(c) as Arc<dyn CompletionClient>),
        }
    }

    /// Send whatever is in the input box through the coordinator. Clears the
    /// input and pins the transcript to the bottom when a send dispatched.
    pub fn send_current_input(&mut self) {
        let Some(client) = self.completion_client() else {
            self.chat.error = Some(format!(
                "{} API key not configured. Press 'P' to set one.",
                self.current_provider.display_name()
            ));
            return;
        };

        let content = self.input.clone();
        let model = self.selected_model.clone();
        if self.chat.send_message(&mut self.store, client, &model, &content) {
            self.input.clear();
            self.input_cursor = 0;
            self.scroll_chat_to_bottom();
        }
    }

    /// Apply a settled completion, if any. Called on every tick.
    pub async fn poll_completion(&mut self) {
        if self.chat.poll_completion(&mut self.store).await {
            self.scroll_chat_to_bottom();
        }
    }

    /// Estimate the wrapped height of the transcript and pin the viewport to
    /// the latest message.
    pub fn scroll_chat_to_bottom(&mut self) {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;

        if let Some(conversation) = self.store.active_conversation() {
            for msg in &conversation.messages {
                total_lines += 1; // Role line ("You:" or "Assistant:")
                for line in msg.content.lines() {
                    // Character count, not byte length, for UTF-8 content
                    let char_count = line.chars().count();
                    if char_count == 0 {
                        total_lines += 1;
                    } else {
                        total_lines += ((char_count / wrap_width) + 1) as u16;
                    }
                }
                if msg.content.is_empty() {
                    total_lines += 1; // Placeholder renders one pending line
                }
                total_lines += 1; // Blank line after message
            }
        }

        if self.chat.error.is_some() {
            total_lines += 2;
        }

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    pub fn scroll_chat_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_chat_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines);
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.chat.loading {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Conversation sidebar
    pub fn new_conversation(&mut self) {
        self.store.new_conversation();
        let last = self.store.conversations().len().saturating_sub(1);
        self.conversation_state.select(Some(last));
        self.chat_scroll = 0;
    }

    pub fn conversations_nav_down(&mut self) {
        let len = self.store.conversations().len();
        if len > 0 {
            let i = self.conversation_state.selected().unwrap_or(0);
            self.conversation_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn conversations_nav_up(&mut self) {
        let i = self.conversation_state.selected().unwrap_or(0);
        self.conversation_state.select(Some(i.saturating_sub(1)));
    }

    /// Make the sidebar selection the active conversation.
    pub fn activate_selected_conversation(&mut self) {
        if let Some(i) = self.conversation_state.selected() {
            if let Some(conversation) = self.store.conversations().get(i) {
                let id = conversation.id;
                self.store.select(id);
                self.scroll_chat_to_bottom();
            }
        }
    }

    // Model picker
    pub fn model_picker_nav_down(&mut self) {
        let len = self.available_models.len();
        if len > 0 {
            let i = self.model_picker_state.selected().unwrap_or(0);
            self.model_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn model_picker_nav_up(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_model(&mut self) {
        if let Some(i) = self.model_picker_state.selected() {
            if let Some(model) = self.available_models.get(i) {
                self.selected_model = model.clone();
                self.show_model_picker = false;
                let _ = Config::save_default_model(&self.selected_model);
            }
        }
    }

    // Provider picker
    pub fn provider_picker_nav_down(&mut self) {
        let len = Provider::all().len();
        if len > 0 {
            let i = self.provider_picker_state.selected().unwrap_or(0);
            self.provider_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn provider_picker_nav_up(&mut self) {
        let i = self.provider_picker_state.selected().unwrap_or(0);
        self.provider_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn models_for_provider(&self, provider: Provider) -> Vec<String> {
        match provider {
            Provider::Ollama => Vec::new(), // Fetched async from the server
            Provider::Claude => ClaudeClient::list_models(),
            Provider::OpenAI => OpenAIClient::list_models(),
        }
    }

    /// Where the provider's credentials come from: "env", "config", "local",
    /// or None when it is not configured at all.
    pub fn key_source(&self, provider: Provider) -> Option<&'static str> {
        match provider {
            Provider::Ollama => Some("local"),
            Provider::Claude => {
                if std::env::var("ANTHROPIC_API_KEY").is_ok() {
                    Some("env")
                } else if self.claude_client.is_some() {
                    Some("config")
                } else {
                    None
                }
            }
            Provider::OpenAI => {
                if std::env::var("OPENAI_API_KEY").is_ok() {
                    Some("env")
                } else if self.openai_client.is_some() {
                    Some("config")
                } else {
                    None
                }
            }
        }
    }
}

pub fn default_model_for(provider: Provider) -> String {
    match provider {
        Provider::Ollama => "llama3.2:latest".to_string(),
        Provider::Claude => ClaudeClient::list_models()
            .into_iter()
            .next()
            .unwrap_or_default(),
        Provider::OpenAI => OpenAIClient::list_models()
            .into_iter()
            .next()
            .unwrap_or_default(),
    }
}
