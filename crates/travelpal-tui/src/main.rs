use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use travelpal_core::config::API_URL_ENV;
use travelpal_core::{ChatClient, Config, ConversationController, Overrides, Sender, Settings};

mod app;
mod handler;
mod logging;
mod tui;
mod ui;

use app::App;
use tui::{EventHandler, Tui};

#[derive(Parser)]
#[command(name = "travelpal", version)]
#[command(about = "Terminal chat client for the TravelPal assistant")]
struct Cli {
    /// Base URL of the assistant endpoint
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Seconds to wait for a reply before giving up (0 waits forever)
    #[arg(long, global = true)]
    timeout: Option<u64>,
    /// Log file for the chat UI
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a single message and print the assistant's reply
    Ask {
        /// Your message
        text: String,
    },
    /// Save the assistant endpoint URL to the config file
    SetUrl {
        /// Base URL, e.g. http://localhost:8000
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let overrides = Overrides {
        api_url: cli.api_url.or_else(|| std::env::var(API_URL_ENV).ok()),
        timeout_secs: cli.timeout,
    };

    match cli.command {
        Some(Commands::SetUrl { url }) => {
            let path = Config::save_api_url(&url)?;
            println!("Saved endpoint {} to {}", url, path.display());
            Ok(())
        }
        Some(Commands::Ask { text }) => {
            logging::init_stderr()?;
            ask(&load_settings(overrides), &text).await
        }
        None => {
            let log_path = match cli.log_file {
                Some(path) => path,
                None => logging::default_log_path()?,
            };
            logging::init_file(&log_path)?;
            run_chat(load_settings(overrides)).await
        }
    }
}

fn load_settings(overrides: Overrides) -> Settings {
    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "could not read config, using defaults");
        Config::new()
    });
    config.resolve(overrides)
}

fn build_controller(settings: &Settings) -> Result<ConversationController> {
    let client = ChatClient::from_settings(settings)?;
    Ok(ConversationController::with_greeting(
        Arc::new(client),
        settings.greeting.clone(),
    ))
}

async fn ask(settings: &Settings, text: &str) -> Result<()> {
    let mut controller = build_controller(settings)?;
    let before = controller.messages().len();

    controller.submit(text).await;
    if controller.messages().len() == before {
        bail!("Nothing to send: the message is empty");
    }

    for message in &controller.messages()[before..] {
        if message.sender() == Sender::Assistant {
            println!("{}", message.text());
        }
    }
    Ok(())
}

async fn run_chat(settings: Settings) -> Result<()> {
    let controller = build_controller(&settings)?;
    tracing::info!(api_url = %settings.api_url, timeout = ?settings.timeout, "starting chat session");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut app = App::new(controller);

    let result = event_loop(&mut terminal, &mut app).await;
    tui::restore()?;
    tracing::info!(messages = app.controller.messages().len(), "chat session ended");
    result
}

async fn event_loop(terminal: &mut Tui, app: &mut App) -> Result<()> {
    let mut events = EventHandler::new();

    while !app.should_quit {
        app.sync_scroll();
        terminal.draw(|frame| ui::render(app, frame))?;

        tokio::select! {
            event = events.next() => match event {
                Some(event) => handler::handle_event(app, event),
                None => break,
            },
            reply = app::next_reply(&mut app.pending), if app.pending.is_some() => {
                app.finish(reply);
            }
        }
    }

    Ok(())
}
