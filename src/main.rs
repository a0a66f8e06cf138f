use std::time::Duration;

use anyhow::Result;

mod app;
mod chat;
mod claude;
mod config;
mod handler;
mod logging;
mod ollama;
mod openai;
mod provider;
mod store;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init()?;
    tui::install_panic_hook();

    let mut terminal = tui::init()?;
    let mut app = App::new()?;
    let mut events = EventHandler::new(Duration::from_millis(300));

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}
