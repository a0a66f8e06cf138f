use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};

use crate::app::{App, FocusPane, InputMode};
use crate::claude::ClaudeClient;
use crate::config::Config;
use crate::openai::OpenAIClient;
use crate::provider::Provider;
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key).await?,
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
            app.poll_completion().await;
        }
    }
    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key).await?,
        InputMode::Editing => handle_editing_mode(app, key),
    }

    Ok(())
}

async fn handle_normal_mode(app: &mut App, key: KeyEvent) -> Result<()> {
    // Popups take priority over everything else
    if app.show_api_key_input {
        handle_api_key_input(app, key);
        return Ok(());
    }
    if app.show_provider_picker {
        handle_provider_picker(app, key).await;
        return Ok(());
    }
    if app.show_model_picker {
        handle_model_picker(app, key);
        return Ok(());
    }

    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Dismiss a displayed error
        KeyCode::Esc => app.chat.error = None,

        // Tab cycles: Conversations -> Input -> Chat -> Conversations
        KeyCode::Tab => {
            app.focus = match app.focus {
                FocusPane::Conversations => FocusPane::Input,
                FocusPane::Input => FocusPane::Chat,
                FocusPane::Chat => FocusPane::Conversations,
            };

            // Auto-enter editing mode when focusing the input
            if app.focus == FocusPane::Input {
                app.input_mode = InputMode::Editing;
                app.input_cursor = app.input.chars().count();
            }
        }

        // Navigation / scrolling based on focus
        KeyCode::Char('j') | KeyCode::Down => match app.focus {
            FocusPane::Conversations => app.conversations_nav_down(),
            FocusPane::Chat => app.scroll_chat_down(1),
            FocusPane::Input => {}
        },
        KeyCode::Char('k') | KeyCode::Up => match app.focus {
            FocusPane::Conversations => app.conversations_nav_up(),
            FocusPane::Chat => app.scroll_chat_up(1),
            FocusPane::Input => {}
        },
        KeyCode::Char('g') => app.chat_scroll = 0,
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),

        // Enter activates the selected conversation, or returns to typing
        KeyCode::Enter => match app.focus {
            FocusPane::Conversations => app.activate_selected_conversation(),
            _ => {
                app.focus = FocusPane::Input;
                app.input_mode = InputMode::Editing;
                app.input_cursor = app.input.chars().count();
            }
        },

        KeyCode::Char('i') => {
            app.focus = FocusPane::Input;
            app.input_mode = InputMode::Editing;
            app.input_cursor = app.input.chars().count();
        }

        // New conversation
        KeyCode::Char('n') => {
            app.new_conversation();
            app.focus = FocusPane::Input;
            app.input_mode = InputMode::Editing;
        }

        // Open model picker
        KeyCode::Char('M') => {
            let models = match app.current_provider {
                Provider::Ollama => app.ollama.list_models().await.unwrap_or_default(),
                Provider::Claude => ClaudeClient::list_models(),
                Provider::OpenAI => OpenAIClient::list_models(),
            };
            app.available_models = models;
            if !app.available_models.is_empty() {
                let current_idx = app
                    .available_models
                    .iter()
                    .position(|m| m == &app.selected_model)
                    .unwrap_or(0);
                app.model_picker_state.select(Some(current_idx));
                app.show_model_picker = true;
            }
        }

        // Open provider picker
        KeyCode::Char('P') => {
            let current_idx = Provider::all()
                .iter()
                .position(|p| *p == app.current_provider)
                .unwrap_or(0);
            app.provider_picker_state.select(Some(current_idx));
            app.show_provider_picker = true;
        }

        _ => {}
    }
    Ok(())
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            // Stays in editing mode so the next message can be typed while
            // the reply is pending. Reentrant sends are dropped upstream.
            app.send_current_input();
        }
        KeyCode::Backspace => {
            if app.input_cursor > 0 {
                app.input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.input_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.input_cursor = (app.input_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = app.input.chars().count();
        }
        KeyCode::Tab => {
            app.input_mode = InputMode::Normal;
            app.focus = FocusPane::Chat;
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
            app.input.insert(byte_pos, c);
            app.input_cursor += 1;
        }
        _ => {}
    }
}

fn handle_api_key_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.show_api_key_input = false;
            app.api_key_input.clear();
            app.api_key_target_provider = None;
        }
        KeyCode::Enter => {
            if !app.api_key_input.is_empty() {
                if let Some(provider) = app.api_key_target_provider {
                    let mut config = Config::load().unwrap_or_else(|_| Config::new());
                    match provider {
                        Provider::Claude => {
                            config.claude_api_key = Some(app.api_key_input.clone());
                            app.claude_client = Some(ClaudeClient::new(&app.api_key_input));
                        }
                        Provider::OpenAI => {
                            config.openai_api_key = Some(app.api_key_input.clone());
                            app.openai_client = Some(OpenAIClient::new(&app.api_key_input));
                        }
                        Provider::Ollama => {}
                    }
                    config.provider = Some(provider);
                    let _ = config.save();
                    app.current_provider = provider;
                    let models = app.models_for_provider(provider);
                    if let Some(model) = models.first() {
                        app.selected_model = model.clone();
                    }
                }
            }
            app.show_api_key_input = false;
            app.api_key_input.clear();
            app.api_key_target_provider = None;
        }
        KeyCode::Backspace => {
            if app.api_key_input_cursor > 0 {
                app.api_key_input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.api_key_input, app.api_key_input_cursor);
                app.api_key_input.remove(byte_pos);
            }
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.api_key_input, app.api_key_input_cursor);
            app.api_key_input.insert(byte_pos, c);
            app.api_key_input_cursor += 1;
        }
        KeyCode::Left => {
            app.api_key_input_cursor = app.api_key_input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.api_key_input.chars().count();
            app.api_key_input_cursor = (app.api_key_input_cursor + 1).min(char_count);
        }
        _ => {}
    }
}

async fn handle_provider_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.show_provider_picker = false;
        }
        KeyCode::Char('j') | KeyCode::Down => {
            app.provider_picker_nav_down();
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.provider_picker_nav_up();
        }
        KeyCode::Enter => {
            if let Some(i) = app.provider_picker_state.selected() {
                let providers = Provider::all();
                if let Some(&provider) = providers.get(i) {
                    // A hosted provider without a key first needs one entered
                    let needs_key = app.key_source(provider).is_none();
                    if needs_key {
                        app.api_key_target_provider = Some(provider);
                        app.show_api_key_input = true;
                        app.api_key_input.clear();
                        app.api_key_input_cursor = 0;
                    } else {
                        app.current_provider = provider;
                        let mut config = Config::load().unwrap_or_else(|_| Config::new());
                        config.provider = Some(provider);
                        let _ = config.save();
                        match provider {
                            Provider::Ollama => {
                                if let Ok(models) = app.ollama.list_models().await {
                                    if let Some(model) = models.first() {
                                        app.selected_model = model.clone();
                                    }
                                }
                            }
                            _ => {
                                let models = app.models_for_provider(provider);
                                if let Some(model) = models.first() {
                                    app.selected_model = model.clone();
                                }
                            }
                        }
                    }
                    app.show_provider_picker = false;
                }
            }
        }
        _ => {}
    }
}

fn handle_model_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.show_model_picker = false;
        }
        KeyCode::Char('j') | KeyCode::Down => {
            app.model_picker_nav_down();
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.model_picker_nav_up();
        }
        KeyCode::Enter => {
            app.select_model();
        }
        _ => {}
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_chat_down(3),
        MouseEventKind::ScrollUp => app.scroll_chat_up(3),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_to_byte_index_handles_multibyte_characters() {
        let s = "héllo";
        assert_eq!(char_to_byte_index(s, 0), 0);
        assert_eq!(char_to_byte_index(s, 1), 1);
        assert_eq!(char_to_byte_index(s, 2), 3); // 'é' is two bytes
        assert_eq!(char_to_byte_index(s, 5), s.len());
        assert_eq!(char_to_byte_index(s, 99), s.len());
    }
}
