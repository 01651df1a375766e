//! `chat-session` command line front end.
//!
//! Each invocation builds one `SessionController` from the environment (or
//! flags), runs a single command against the backend, and prints the
//! resulting notifications: successes to stdout, errors to stderr.

#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;

use std::path::PathBuf;
use std::sync::Arc;

use chat_session::config::{BACKEND_URL_VAR, STORAGE_PATH_VAR};
use chat_session::notify::ChannelNotifier;
use chat_session::{
    AuthError, ConfigError, LoginMode, Notification, NotificationKind, Session, SessionConfig,
    SessionController,
};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value, json};
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("http client setup failed: {0}")]
    Client(#[from] AuthError),
    #[error("not logged in; run `chat-session login` first")]
    NotAuthenticated,
    #[error("nothing to update; pass --full-name, --bio, or --profile-pic")]
    EmptyUpdate,
    #[error("{0}")]
    Failed(String),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("signal handler failed: {0}")]
    Signal(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "chat-session", about = "Chat backend session and presence CLI")]
struct Cli {
    #[arg(long, env = "CHAT_BACKEND_URL")]
    backend_url: Option<String>,

    #[arg(long, env = "CHAT_STORAGE_PATH")]
    storage_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Validate the stored token against the backend.
    Check,
    /// Print the authenticated user's profile.
    Whoami,
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "CHAT_PASSWORD")]
        password: String,
    },
    Register {
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "CHAT_PASSWORD")]
        password: String,
        #[arg(long)]
        bio: Option<String>,
    },
    Logout,
    UpdateProfile {
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        bio: Option<String>,
        #[arg(long)]
        profile_pic: Option<String>,
    },
    /// Stream online users until Ctrl-C or the server closes the socket.
    Watch,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;
    let (notifier, mut notes) = ChannelNotifier::new();
    let mut controller = SessionController::from_config_with_notifier(&config, Arc::new(notifier))?;

    let result = run(&mut controller, cli.command).await;
    let failure = drain_notifications(&mut notes);
    result?;
    match failure {
        Some(message) => Err(CliError::Failed(message)),
        None => Ok(()),
    }
}

fn build_config(cli: &Cli) -> Result<SessionConfig, CliError> {
    let config = SessionConfig::from_lookup(|key| match key {
        BACKEND_URL_VAR => cli.backend_url.clone(),
        STORAGE_PATH_VAR => cli
            .storage_path
            .as_ref()
            .map(|path| path.to_string_lossy().into_owned()),
        _ => std::env::var(key).ok(),
    })?;
    Ok(config)
}

async fn run(controller: &mut SessionController, command: Command) -> Result<(), CliError> {
    match command {
        Command::Check => {
            controller.initialize().await;
            print_status(&controller.snapshot());
            Ok(())
        }
        Command::Whoami => {
            let session = authenticated(controller).await?;
            let user = session.user.ok_or(CliError::NotAuthenticated)?;
            print_json(&Value::Object(user.0))
        }
        Command::Login { email, password } => {
            controller
                .login(LoginMode::Login, &login_body(&email, &password))
                .await;
            Ok(())
        }
        Command::Register {
            full_name,
            email,
            password,
            bio,
        } => {
            let body = register_body(&full_name, &email, &password, bio.as_deref());
            controller.login(LoginMode::Register, &body).await;
            Ok(())
        }
        Command::Logout => {
            controller.logout();
            Ok(())
        }
        Command::UpdateProfile {
            full_name,
            bio,
            profile_pic,
        } => {
            let body = profile_body(full_name, bio, profile_pic).ok_or(CliError::EmptyUpdate)?;
            authenticated(controller).await?;
            controller.update_profile(&body).await;
            Ok(())
        }
        Command::Watch => watch(controller).await,
    }
}

/// Run startup validation and require a logged-in session.
async fn authenticated(controller: &mut SessionController) -> Result<Session, CliError> {
    controller.initialize().await;
    let session = controller.snapshot();
    if session.is_authenticated() {
        Ok(session)
    } else {
        Err(CliError::NotAuthenticated)
    }
}

async fn watch(controller: &mut SessionController) -> Result<(), CliError> {
    let mut rx = controller.subscribe();
    authenticated(controller).await?;
    let mut last = None;

    loop {
        let session = rx.borrow_and_update().clone();
        if session.online_user_ids != last {
            if let Some(ids) = &session.online_user_ids {
                let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
                println!("online ({}): {}", ids.len(), ids.join(", "));
            }
            last = session.online_user_ids;
        }
        if !session.connected && !controller.is_connected() {
            tracing::info!("presence connection closed");
            return Ok(());
        }

        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                controller.disconnect_socket();
                return Ok(());
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
            }
        }
    }
}

fn login_body(email: &str, password: &str) -> Value {
    json!({ "email": email, "password": password })
}

fn register_body(full_name: &str, email: &str, password: &str, bio: Option<&str>) -> Value {
    let mut body = json!({
        "fullName": full_name,
        "email": email,
        "password": password,
    });
    if let (Some(bio), Some(map)) = (bio, body.as_object_mut()) {
        map.insert("bio".to_owned(), Value::String(bio.to_owned()));
    }
    body
}

/// Only the fields the caller passed; `None` when there is nothing to send.
fn profile_body(
    full_name: Option<String>,
    bio: Option<String>,
    profile_pic: Option<String>,
) -> Option<Value> {
    let mut map = Map::new();
    for (key, value) in [
        ("fullName", full_name),
        ("bio", bio),
        ("profilePic", profile_pic),
    ] {
        if let Some(value) = value {
            map.insert(key.to_owned(), Value::String(value));
        }
    }
    (!map.is_empty()).then_some(Value::Object(map))
}

/// Print every queued notification; returns the last error message, if any.
fn drain_notifications(notes: &mut UnboundedReceiver<Notification>) -> Option<String> {
    let mut failure = None;
    while let Ok(note) = notes.try_recv() {
        match note.kind {
            NotificationKind::Success => println!("{}", note.message),
            NotificationKind::Error => {
                eprintln!("error: {}", note.message);
                failure = Some(note.message);
            }
        }
    }
    failure
}

fn print_status(session: &Session) {
    match &session.user {
        Some(user) => {
            let name = user
                .str_field("fullName")
                .or_else(|| user.str_field("email"))
                .unwrap_or("unknown");
            let id = user.id().unwrap_or_default();
            println!("authenticated as {name} ({id})");
        }
        None => println!("not authenticated"),
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
