use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use time::OffsetDateTime;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use hush::api::{ApiError, HttpRoomApi, RoomApi};
use hush::app::ChatInput;
use hush::chat_session::{ChatSession, ChatSessionError, HistoryOutcome, Mounted};
use hush::config::{ClientConfig, ConfigError, TransportMode};
use hush::model::ChatMessage;
use hush::net::{ConnectionError, Connector, StompConnector};
use hush::room_entry::{Field, RoomEntry, RoomEntryError};
use hush::session::SessionStore;
use hush::view;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("{0}")]
    RoomEntry(#[from] RoomEntryError),
    #[error(transparent)]
    Chat(#[from] ChatSessionError),
    #[error("session is not connected")]
    NotConnected,
    #[error("terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Flags override `HUSH_*` environment variables (and `.env`), which
/// override defaults.
#[derive(Parser, Debug)]
#[command(name = "hush", about = "Realtime room chat in the terminal")]
struct Cli {
    /// Server base URL
    #[arg(long, env = "HUSH_BASE_URL")]
    base_url: Option<String>,

    /// auto, sockjs or websocket
    #[arg(long, env = "HUSH_TRANSPORT")]
    transport: Option<TransportMode>,

    #[arg(long, env = "HUSH_CONNECT_TIMEOUT_SECS")]
    connect_timeout_secs: Option<u64>,

    /// STOMP heart-beat period, 0 disables
    #[arg(long, env = "HUSH_HEARTBEAT_MS")]
    heartbeat_ms: Option<u32>,

    /// Stored messages loaded on entry
    #[arg(long, env = "HUSH_HISTORY_SIZE")]
    history_size: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Join an existing room and chat.
    Join(EntryArgs),
    /// Create a room and chat.
    Create(EntryArgs),
    /// Print a room's stored messages.
    History {
        #[arg(long)]
        room: String,
    },
}

#[derive(Args, Debug)]
struct EntryArgs {
    #[arg(long)]
    room: String,
    #[arg(long)]
    user: String,
}

impl Cli {
    fn client_config(&self) -> Result<ClientConfig, CliError> {
        let mut config = ClientConfig::from_env()?;
        if let Some(base_url) = &self.base_url {
            config = ClientConfig { base_url: ClientConfig::new(base_url)?.base_url, ..config };
        }
        if let Some(transport) = self.transport {
            config = config.with_transport(transport);
        }
        if let Some(secs) = self.connect_timeout_secs {
            config = config.with_connect_timeout(Duration::from_secs(secs));
        }
        if let Some(ms) = self.heartbeat_ms {
            config = config.with_heartbeat_ms(ms);
        }
        if let Some(size) = self.history_size {
            config = config.with_history_page_size(size);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hush=warn")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = cli.client_config()?;
    let api: Arc<dyn RoomApi> = Arc::new(HttpRoomApi::new(&config)?);

    match cli.command {
        Command::Join(args) => run_chat(config, api, args, false).await,
        Command::Create(args) => run_chat(config, api, args, true).await,
        Command::History { room } => run_history(api.as_ref(), &room).await,
    }
}

async fn run_history(api: &dyn RoomApi, room_id: &str) -> Result<(), CliError> {
    let now = OffsetDateTime::now_utc();
    for message in api.fetch_history(room_id).await? {
        println!("{}", view::render_message(&message, "", now));
    }
    Ok(())
}

async fn run_chat(
    config: ClientConfig,
    api: Arc<dyn RoomApi>,
    args: EntryArgs,
    create: bool,
) -> Result<(), CliError> {
    let session = SessionStore::new();
    let connector: Arc<dyn Connector> = Arc::new(StompConnector::new(config)?);

    let mut entry = RoomEntry::new(api.clone(), session.clone());
    entry.update_field(Field::RoomId, &args.room);
    entry.update_field(Field::UserName, &args.user);
    let entered = if create { entry.create_room().await? } else { entry.join_room().await? };
    eprintln!("{}", entered.notice);

    let mut chat = ChatSession::new(session.clone(), api, connector);
    let mounted = match chat.mount().await {
        Ok(mounted) => mounted,
        Err(e) => {
            chat.logout().await;
            return Err(e.into());
        }
    };
    match mounted {
        Mounted::Redirect(_) => return Err(CliError::NotConnected),
        Mounted::Live { history, notice } => {
            if let HistoryOutcome::Failed(e) = history {
                eprintln!("could not load history: {e}");
            }
            println!("{}", view::render_header(&session.room_id(), &session.current_user()));
            let now = OffsetDateTime::now_utc();
            for message in chat.messages() {
                println!("{}", view::render_message(message, &session.current_user(), now));
            }
            eprintln!("{notice}");
        }
    }

    let outcome = chat_loop(&mut chat, &session).await;
    chat.logout().await;
    outcome
}

/// Read stdin lines and print live messages until logout, EOF, or the
/// connection ends.
async fn chat_loop(chat: &mut ChatSession, session: &SessionStore) -> Result<(), CliError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };
                match ChatInput::parse(&line) {
                    ChatInput::Logout => return Ok(()),
                    ChatInput::ChangeRoom(room_id) => {
                        chat.change_room(room_id).await?;
                        println!("{}", view::render_header(&session.room_id(), &session.current_user()));
                    }
                    ChatInput::Message(text) => {
                        chat.set_input(text);
                        if let Err(e) = chat.send_message() {
                            eprintln!("{e}");
                        }
                    }
                }
            }
            message = chat.next_message() => {
                let Some(message) = message else {
                    eprintln!("disconnected from chat");
                    return Ok(());
                };
                print_message(&message, session);
            }
        }
    }
}

fn print_message(message: &ChatMessage, session: &SessionStore) {
    let now = OffsetDateTime::now_utc();
    println!("{}", view::render_message(message, &session.current_user(), now));
}
