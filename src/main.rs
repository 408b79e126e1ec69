use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use securevault_client::{
    config::Config,
    models::session::SessionState,
    state::AppState,
};

mod handlers {
    pub mod audit;
    pub mod auth;
    pub mod files;
    pub mod keys;
}

/// Command-line client for the SecureVault file vault.
#[derive(Parser)]
#[command(name = "securevault", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and store the session.
    Login {
        #[arg(long, env = "VAULT_EMAIL")]
        email: String,
    },
    /// Create an account.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        /// Log in right after registering.
        #[arg(long)]
        login: bool,
    },
    /// End the stored session.
    Logout,
    /// Show the identity carried by the stored session.
    Whoami,
    /// Encrypt and upload files.
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Download a stored file, decrypted unless `--ciphertext` is given.
    Download {
        id: i64,
        #[arg(long, conflicts_with = "verify")]
        ciphertext: bool,
        /// A local ciphertext copy to digest for out-of-band comparison.
        #[arg(long)]
        verify: Option<PathBuf>,
    },
    /// Submit a local ciphertext for decryption with the named key.
    Decrypt {
        path: PathBuf,
        #[arg(long)]
        key: String,
    },
    /// List stored files.
    Files {
        /// Delete this file, then list again.
        #[arg(long)]
        delete: Option<i64>,
        /// Show a single file.
        #[arg(long, conflicts_with = "delete")]
        show: Option<i64>,
    },
    /// Inspect or rotate the wrapping key.
    Key {
        #[command(subcommand)]
        action: KeyCommand,
    },
    /// Query the audit trail (administrators only).
    Audit {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        action: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    /// Show dashboard counters.
    Stats,
}

#[derive(Subcommand)]
enum KeyCommand {
    /// Show the active key.
    Active,
    /// Generate a new key. The previous key is retired.
    Generate {
        #[arg(long)]
        label: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    tracing::debug!("✅ Configuration loaded successfully");

    let state = AppState::new(&config)?;
    let started_authenticated = state.session.is_authenticated();
    let mut session_events = state.session.subscribe();
    let is_logout = matches!(cli.command, Command::Logout);

    let result = match cli.command {
        Command::Login { email } => handlers::auth::login(&state, email).await,
        Command::Register { email, username, login } => {
            handlers::auth::register(&state, email, username, login).await
        }
        Command::Logout => handlers::auth::logout(&state),
        Command::Whoami => handlers::auth::whoami(&state),
        Command::Upload { paths } => handlers::files::upload(&state, paths).await,
        Command::Download { id, ciphertext, verify } => {
            handlers::files::download(&state, id, ciphertext, verify).await
        }
        Command::Decrypt { path, key } => handlers::files::decrypt(&state, path, key).await,
        Command::Files { delete, show } => handlers::files::list(&state, delete, show).await,
        Command::Key { action } => match action {
            KeyCommand::Active => handlers::keys::active(&state).await,
            KeyCommand::Generate { label } => handlers::keys::generate(&state, label).await,
        },
        Command::Audit { search, action, status } => {
            handlers::audit::list(&state, search, action, status).await
        }
        Command::Stats => handlers::files::stats(&state).await,
    };

    let forced_logout = started_authenticated
        && !is_logout
        && session_events.has_changed().unwrap_or(false)
        && *session_events.borrow_and_update() == SessionState::Anonymous;

    if forced_logout {
        tracing::warn!("🔒 Session ended by the server");
        eprintln!("Your session has ended. Run `securevault login` to sign in again.");
    }

    result
}
