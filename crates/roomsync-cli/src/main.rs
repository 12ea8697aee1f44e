//! Roomsync command-line chat client.
//!
//! # Usage
//!
//! ```bash
//! # Create an account and join a room
//! roomsync --username alice --password secret --register --room general
//!
//! # Log in to an existing account against another server
//! roomsync --server https://chat.example.com -u alice -p secret
//! ```
//!
//! Lines typed on stdin are sent as messages; `/help` lists commands.

mod command;
mod render;

use std::{io::Write, sync::Arc, time::Duration};

use clap::Parser;
use roomsync_client::{
    AuthClient, ClientConfig, RoomView, RuntimeHandle, SyncRuntime, SystemEnv,
    auth::{STATUS_LOGGED_IN, STATUS_REGISTERED},
    config::DEFAULT_BASE_URL,
    grpc_web::GrpcWebTransport,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    command::{Command, HELP},
    render::Renderer,
};

/// Roomsync chat client
#[derive(Parser, Debug)]
#[command(name = "roomsync")]
#[command(about = "Line-oriented chat room client")]
#[command(version)]
struct Args {
    /// Server base URL
    #[arg(short, long, default_value = DEFAULT_BASE_URL)]
    server: String,

    /// Account name
    #[arg(short, long)]
    username: String,

    /// Account password
    #[arg(short, long)]
    password: String,

    /// Create the account before joining
    #[arg(long)]
    register: bool,

    /// Room to join
    #[arg(short, long, default_value = "general")]
    room: String,

    /// Poll instead of opening a push stream
    #[arg(long)]
    no_stream: bool,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "15")]
    timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // Logs go to stderr so chat output on stdout stays clean
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut config = ClientConfig::with_base_url(args.server);
    config.request_timeout = Duration::from_secs(args.timeout.max(1));
    config.sync.streaming_enabled = !args.no_stream;

    tracing::info!(server = %config.base_url, room = %args.room, "starting");

    let transport = Arc::new(GrpcWebTransport::new(&config)?);
    let auth = AuthClient::new(Arc::clone(&transport));

    let session = if args.register {
        let session = auth.register(&args.username, &args.password).await?;
        say(STATUS_REGISTERED);
        session
    } else {
        let session = auth.login(&args.username, &args.password).await?;
        say(STATUS_LOGGED_IN);
        session
    };

    let (runtime, handle) =
        SyncRuntime::new(Arc::clone(&transport), SystemEnv::new(), session, &args.room, &config);
    let runtime_task = runtime.spawn();
    let render_task = tokio::spawn(render_updates(handle.subscribe()));

    handle.connect().await?;
    let result = read_commands(&handle).await;

    handle.shutdown().await;
    render_task.abort();
    if let Err(e) = runtime_task.await {
        tracing::warn!(error = %e, "runtime task failed");
    }

    result
}

/// Print view changes until the runtime stops.
async fn render_updates(mut view: tokio::sync::watch::Receiver<RoomView>) {
    let mut renderer = Renderer::new();
    loop {
        let lines = renderer.update(&view.borrow_and_update());
        print_lines(&lines);
        if view.changed().await.is_err() {
            return;
        }
    }
}

async fn read_commands(handle: &RuntimeHandle) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let Some(command) = Command::parse(&line) else {
            continue;
        };

        let outcome = match command {
            Command::Say(text) => handle.send(text).await,
            Command::More => handle.load_more().await,
            Command::Refresh => handle.refresh().await,
            Command::Show => {
                print_lines(&Renderer::new().page(&handle.view()));
                Ok(())
            },
            Command::Leave => handle.disconnect().await,
            Command::Join(room) => {
                handle.disconnect().await?;
                handle.set_room(room).await?;
                handle.connect().await
            },
            Command::Logout => {
                handle.logout().await?;
                return Ok(());
            },
            Command::Quit => return Ok(()),
            Command::Help => {
                say(HELP);
                Ok(())
            },
            Command::Unknown(name) => {
                say(&format!("unknown command /{name}, try /help"));
                Ok(())
            },
        };

        if let Err(e) = outcome {
            tracing::debug!(error = %e, "command rejected");
            say(&format!("!! {e}"));
        }
    }

    Ok(())
}

fn say(text: &str) {
    print_lines(&[text.to_string()]);
}

fn print_lines(lines: &[String]) {
    let mut out = std::io::stdout().lock();
    for line in lines {
        // Nothing useful to do if stdout is gone
        let _ = writeln!(out, "{line}");
    }
}
