//! HuecoApp CLI - sign in to the pothole reporting backend and make
//! authenticated calls from a terminal.
//!
//! Tokens are kept between runs and refreshed transparently when the backend
//! rejects an expired one.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hueco_core::auth::FileTokenStorage;
use hueco_core::{ApiClient, ApiError, Config, SessionState, TokenBackend};

const USAGE: &str = "\
Usage: hueco <command>

Commands:
  login <email>             Sign in with email and password
  login-google <id-token>   Sign in with a Google ID token
  login-facebook <token>    Sign in with a Facebook access token
  logout                    Forget the stored session
  status                    Show whether a session is active
  get <path>                Authenticated GET, prints the JSON response

Environment:
  HUECO_API_URL             Backend base URL (overrides config)
  RUST_LOG                  Log filter, e.g. RUST_LOG=debug";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    let mut config = Config::load()?;
    let base_url = config.base_url();
    let store = Arc::new(config.open_token_store()?);
    let session = SessionState::spawn(store.clone());
    let api = ApiClient::new(&base_url, store)?;
    info!(base_url = %base_url, "HuecoApp CLI starting");

    match (command.as_str(), args.get(1)) {
        ("login", email) => {
            let email = match email {
                Some(email) => email.clone(),
                None => prompt_email(config.last_email.as_deref())?,
            };
            let password = rpassword::prompt_password("Password: ")
                .context("Failed to read password")?;
            api.login(&email, &password).await?;

            config.last_email = Some(email.clone());
            config.save()?;
            println!("Logged in as {}", email);
        }
        ("login-google", Some(id_token)) => {
            api.login_with_google(id_token).await?;
            println!("Logged in with Google");
        }
        ("login-facebook", Some(token)) => {
            api.login_with_facebook(token).await?;
            println!("Logged in with Facebook");
        }
        ("logout", _) => {
            session.logout().await?;
            println!("Logged out");
        }
        ("status", _) => {
            if session.is_active() {
                println!("Session active ({})", base_url);
                if config.token_backend == TokenBackend::File {
                    let storage = FileTokenStorage::new(config.data_dir()?);
                    if let Some(updated_at) = storage.updated_at() {
                        let updated_at = updated_at.format("%Y-%m-%d %H:%M UTC");
                        println!("Tokens last updated {}", updated_at);
                    }
                }
            } else {
                println!("Not logged in");
            }
        }
        ("get", Some(path)) => {
            match api.get_json::<serde_json::Value>(path).await {
                Ok(body) => println!("{}", serde_json::to_string_pretty(&body)?),
                Err(e) if requires_login(&e) => {
                    bail!("Session expired. Run `hueco login` to sign in again.")
                }
                Err(e) => return Err(e),
            }
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}

fn requires_login(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ApiError>()
        .map(ApiError::requires_login)
        .unwrap_or(false)
}

fn prompt_email(last_email: Option<&str>) -> Result<String> {
    match last_email {
        Some(last) => print!("Email [{}]: ", last),
        None => print!("Email: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    match (input.is_empty(), last_email) {
        (false, _) => Ok(input.to_string()),
        (true, Some(last)) => Ok(last.to_string()),
        (true, None) => bail!("An email is required to log in"),
    }
}
