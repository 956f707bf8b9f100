//! Operator session: the bearer credential every request carries.
//!
//! The session is an explicit object with a lifecycle rather than ambient
//! state:
//!
//! 1. [`SessionStore::init`] reads the persisted credential and drops it if
//!    the token is malformed or its `exp` claim is in the past.
//! 2. [`SessionStore::login`] exchanges username and password for a token
//!    and persists it.
//! 3. [`SessionStore::logout`] clears memory and deletes the file. The CLI
//!    also calls it when the server answers 401.
//!
//! The store is passed by reference to whoever builds an
//! [`HttpApiClient`](crate::client::HttpApiClient).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::client::HttpApiClient;
use crate::config::Config;
use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: String,
}

/// Response of `POST /api/auth/login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub user: SessionUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSession {
    token: String,
    user: SessionUser,
}

pub struct SessionStore {
    path: PathBuf,
    current: Option<StoredSession>,
}

impl SessionStore {
    /// Loads the session persisted at `path`, if any and still valid.
    ///
    /// An unreadable, malformed or expired session file is deleted.
    pub fn init(path: &Path) -> Result<Self> {
        let mut store = SessionStore {
            path: path.to_path_buf(),
            current: None,
        };
        if !path.exists() {
            return Ok(store);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file: {}", path.display()))?;
        match serde_json::from_str::<StoredSession>(&content) {
            Ok(stored) if is_token_valid(&stored.token, Utc::now()) => {
                debug!("restored session for {}", stored.user.username);
                store.current = Some(stored);
            }
            Ok(_) => {
                info!("stored session expired, discarding");
                store.clear_file()?;
            }
            Err(e) => {
                warn!("discarding unreadable session file: {}", e);
                store.clear_file()?;
            }
        }
        Ok(store)
    }

    pub fn token(&self) -> Option<&str> {
        self.current.as_ref().map(|s| s.token.as_str())
    }

    pub fn user(&self) -> Option<&SessionUser> {
        self.current.as_ref().map(|s| &s.user)
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.is_some()
    }

    /// Expiry of the current token, when it carries one.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.token().and_then(token_expiry)
    }

    /// Logs in through `client` and persists the resulting session.
    pub async fn login(
        &mut self,
        client: &HttpApiClient,
        username: &str,
        password: &str,
    ) -> Result<&SessionUser> {
        let response = client
            .login(username, password)
            .await
            .map_err(|e| match e {
                ApiError::Unauthorized { detail } => anyhow::anyhow!(
                    "login failed: {}",
                    detail.as_deref().unwrap_or("invalid credentials")
                ),
                other => anyhow::Error::new(other).context("login failed"),
            })?;
        self.establish(response)?;
        self.user()
            .ok_or_else(|| anyhow::anyhow!("session was not established"))
    }

    /// Stores a fresh login response in memory and on disk.
    pub fn establish(&mut self, response: LoginResponse) -> Result<()> {
        let stored = StoredSession {
            token: response.access_token,
            user: response.user,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create session directory: {}", parent.display())
                })?;
            }
        }
        let json = serde_json::to_string_pretty(&stored)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write session file: {}", self.path.display()))?;
        restrict_permissions(&self.path)?;
        info!("logged in as {}", stored.user.username);
        self.current = Some(stored);
        Ok(())
    }

    /// Forgets the session in memory and on disk.
    pub fn logout(&mut self) -> Result<()> {
        self.current = None;
        self.clear_file()
    }

    fn clear_file(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to remove session file: {}", self.path.display())
            }),
        }
    }
}

/// REST client carrying the session's bearer token, if there is one.
pub fn authenticated_client(config: &Config, session: &SessionStore) -> Result<HttpApiClient> {
    if !session.is_authenticated() {
        debug!("no active session, requests will be sent without a token");
    }
    HttpApiClient::new(&config.api, session.token())
}

pub async fn run_login(config: &Config, username: &str, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => read_password()?,
    };
    let mut session = SessionStore::init(&config.session.path)?;
    let client = HttpApiClient::new(&config.api, None)?;
    let user = session.login(&client, username, &password).await?;
    println!("Logged in as {} ({}).", user.username, user.role);
    Ok(())
}

pub fn run_logout(config: &Config) -> Result<()> {
    let mut session = SessionStore::init(&config.session.path)?;
    let was_authenticated = session.is_authenticated();
    session.logout()?;
    if was_authenticated {
        println!("Logged out.");
    } else {
        println!("No active session.");
    }
    Ok(())
}

fn read_password() -> Result<String> {
    use std::io::{BufRead, Write};
    if atty::is(atty::Stream::Stdin) {
        eprint!("Password: ");
        let _ = std::io::stderr().flush();
    }
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        anyhow::bail!("password must not be empty");
    }
    Ok(password)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    exp: Option<f64>,
}

fn decode_claims(token: &str) -> Option<Claims> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// `exp` claim of a JWT, if the token has one.
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let exp = decode_claims(token)?.exp?;
    DateTime::from_timestamp(exp as i64, 0)
}

/// A token is valid when its payload decodes and `exp`, if present, is
/// later than `now`.
pub fn is_token_valid(token: &str, now: DateTime<Utc>) -> bool {
    match decode_claims(token) {
        None => false,
        Some(Claims { exp: None }) => true,
        Some(Claims { exp: Some(exp) }) => {
            DateTime::from_timestamp(exp as i64, 0).is_some_and(|at| at > now)
        }
    }
}
