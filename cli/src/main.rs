use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use roomsync_session::{
    ConfigError, FileCredentialStore, NavigationError, Navigator, OAuthProvider, SessionConfig, SessionError,
    SessionManager,
};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),
    #[error("no data directory; pass --credential-file or set ROOMSYNC_CREDENTIAL_FILE")]
    NoDataDir,
    #[error("not signed in")]
    NotSignedIn,
    #[error("server returned {status}: {message}")]
    ServerError { status: u16, message: String },
}

#[derive(Parser, Debug)]
#[command(name = "roomsync", about = "RoomSync session CLI")]
struct Cli {
    #[arg(long, env = "ROOMSYNC_API_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "ROOMSYNC_CREDENTIAL_FILE")]
    credential_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the backend URL that starts an OAuth login.
    LoginUrl { provider: OAuthProvider },
    /// Start an OAuth login; the target URL is printed for a browser.
    Oauth { provider: OAuthProvider },
    /// Finish OAuth from the login-success URL the browser landed on.
    OauthComplete { callback_url: String },
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "ROOMSYNC_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "ROOMSYNC_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Print the claims of the stored session token.
    Whoami,
    Status,
    Profile,
    Logout,
    /// Send an arbitrary API request through the session.
    Request {
        method: String,
        path: String,
        #[arg(long)]
        data: Option<String>,
    },
}

/// Hands the OAuth URL to the person at the terminal.
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&self, url: &str) -> Result<(), NavigationError> {
        eprintln!("Open this URL in a browser to continue:");
        println!("{url}");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = load_config(cli.base_url.as_deref())?;
    let credential_file = match cli.credential_file {
        Some(path) => path,
        None => default_credential_file()?,
    };
    let store = FileCredentialStore::new(&credential_file, &config.cookie_name, &config.cookie_path);
    let session = SessionManager::new(config, store)?;

    match cli.command {
        Command::LoginUrl { provider } => {
            println!("{}", session.oauth_login_url(provider));
            Ok(())
        }
        Command::Oauth { provider } => {
            session.begin_oauth_login(provider, &TerminalNavigator)?;
            Ok(())
        }
        Command::OauthComplete { callback_url } => {
            let claims = session.complete_oauth_login(&callback_url)?;
            print_json(&serde_json::to_value(claims)?)
        }
        Command::Login { email, password } => {
            let claims = session.login_with_password(&email, &password).await?;
            if session.persistence_degraded() {
                eprintln!("warning: session could not be saved to {}", credential_file.display());
            }
            print_json(&serde_json::to_value(claims)?)
        }
        Command::Register { name, email, password } => {
            let user = session.register(&name, &email, &password).await?;
            print_json(&serde_json::to_value(user)?)
        }
        Command::Whoami => {
            let claims = session.current_identity().ok_or(CliError::NotSignedIn)?;
            let expired = claims.is_expired_at(now_unix());
            let mut value = serde_json::to_value(claims)?;
            if let Some(map) = value.as_object_mut() {
                map.insert("expired".to_owned(), Value::Bool(expired));
            }
            print_json(&value)
        }
        Command::Status => {
            let state = session.auth_state();
            let identity = state.identity();
            print_json(&json!({
                "authenticated": state.is_authenticated(),
                "expired": identity.as_ref().map(|claims| claims.is_expired_at(now_unix())),
                "identity": identity,
                "credential_file": credential_file.display().to_string(),
                "persistence_degraded": session.persistence_degraded(),
            }))
        }
        Command::Profile => {
            let profile = session.fetch_profile().await.ok_or(CliError::NotSignedIn)?;
            print_json(&serde_json::to_value(profile)?)
        }
        Command::Logout => {
            session.logout()?;
            print_json(&json!({ "authenticated": false }))
        }
        Command::Request { method, path, data } => run_request(&session, &method, &path, data.as_deref()).await,
    }
}

fn load_config(base_url: Option<&str>) -> Result<SessionConfig, CliError> {
    let config = SessionConfig::from_lookup(|key| match (key, base_url) {
        ("ROOMSYNC_API_BASE_URL", Some(url)) => Some(url.to_owned()),
        _ => std::env::var(key).ok(),
    })?;
    Ok(config)
}

fn default_credential_file() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("roomsync").join("session.json"))
        .ok_or(CliError::NoDataDir)
}

async fn run_request(
    session: &SessionManager<FileCredentialStore>,
    method: &str,
    path: &str,
    data: Option<&str>,
) -> Result<(), CliError> {
    let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| CliError::InvalidMethod(method.to_owned()))?;
    let mut builder = session.api().request(method, path);
    if let Some(data) = data {
        builder = builder.json(&serde_json::from_str::<Value>(data)?);
    }

    let response = session.api().send(builder).await?;
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(CliError::ServerError { status: status.as_u16(), message: text });
    }
    if text.trim().is_empty() {
        return print_json(&json!({ "status": status.as_u16() }));
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => print_json(&value),
        Err(_) => {
            println!("{text}");
            Ok(())
        }
    }
}

fn now_unix() -> i64 {
    let Ok(duration) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(duration.as_secs()).unwrap_or(0)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
