//! Player identity for remote saves.
//!
//! The remote save backend needs an identity (`id` plus a short-lived
//! `token`). `AuthSession` holds the current one; an `IdentityProvider`
//! performs the actual login/registration. Credentials are trimmed and
//! validated before any provider call.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use bevy::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::GameSettings;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("email address is not valid")]
    InvalidEmail,
    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },
    #[error("wrong email or password")]
    InvalidCredentials,
    #[error("identity provider failed: {0}")]
    Provider(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered(Identity),
    AlreadyExists,
}

pub trait IdentityProvider: Send + Sync {
    fn login(&self, email: &str, password: &str) -> Result<Identity, AuthError>;
    fn register(&self, email: &str, password: &str) -> Result<RegisterOutcome, AuthError>;
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_address_char(c: char) -> bool {
    is_word_char(c) || c == '.' || c == '-'
}

/// `local@domain.tld`: word characters, dots and hyphens on both sides of a
/// single `@`, and a final dot-separated part of word characters only.
pub fn validate_email(email: &str) -> Result<(), AuthError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(AuthError::InvalidEmail);
    };
    if local.is_empty() || !local.chars().all(is_address_char) || !domain.chars().all(is_address_char) {
        return Err(AuthError::InvalidEmail);
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return Err(AuthError::InvalidEmail);
    };
    if host.is_empty() || tld.is_empty() || !tld.chars().all(is_word_char) {
        return Err(AuthError::InvalidEmail);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::PasswordTooShort { min: MIN_PASSWORD_LEN });
    }
    Ok(())
}

fn validate(email: &str, password: &str) -> Result<(String, String), AuthError> {
    let (email, password) = (email.trim(), password.trim());
    validate_email(email)?;
    validate_password(password)?;
    Ok((email.to_string(), password.to_string()))
}

/// Current identity, if logged in.
#[derive(Resource, Debug, Clone, Default)]
pub struct AuthSession {
    identity: Option<Identity>,
    email: Option<String>,
}

impl AuthSession {
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.identity.is_some()
    }

    pub fn login(
        &mut self,
        provider: &dyn IdentityProvider,
        email: &str,
        password: &str,
    ) -> Result<(), AuthError> {
        let (email, password) = validate(email, password)?;
        match provider.login(&email, &password) {
            Ok(identity) => {
                info!("Logged in as {email}");
                self.identity = Some(identity);
                self.email = Some(email);
                Ok(())
            }
            Err(e) => {
                warn!("Login failed: {e}");
                Err(e)
            }
        }
    }

    /// Registers and, on success, logs in with the new identity.
    pub fn register(
        &mut self,
        provider: &dyn IdentityProvider,
        email: &str,
        password: &str,
    ) -> Result<RegisterOutcome, AuthError> {
        let (email, password) = validate(email, password)?;
        let outcome = provider.register(&email, &password)?;
        if let RegisterOutcome::Registered(identity) = &outcome {
            info!("Registered {email}");
            self.identity = Some(identity.clone());
            self.email = Some(email);
        }
        Ok(outcome)
    }

    pub fn logout(&mut self) {
        self.identity = None;
        self.email = None;
    }
}

/// Account store kept in memory. Used in tests.
#[derive(Debug, Default)]
pub struct MemoryIdentityProvider {
    /// email → (password, user id)
    accounts: Mutex<HashMap<String, (String, String)>>,
}

fn random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from_digit(rng.gen_range(0..16), 16).unwrap_or('0'))
        .collect()
}

impl IdentityProvider for MemoryIdentityProvider {
    fn login(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let accounts = self
            .accounts
            .lock()
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        match accounts.get(email) {
            Some((stored, id)) if stored == password => Ok(Identity {
                id: id.clone(),
                token: random_hex(32),
            }),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    fn register(&self, email: &str, password: &str) -> Result<RegisterOutcome, AuthError> {
        let mut accounts = self
            .accounts
            .lock()
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        if accounts.contains_key(email) {
            return Ok(RegisterOutcome::AlreadyExists);
        }
        let id = random_hex(28);
        accounts.insert(email.to_string(), (password.to_string(), id.clone()));
        Ok(RegisterOutcome::Registered(Identity {
            id,
            token: random_hex(32),
        }))
    }
}

fn provider_error(e: impl std::fmt::Display) -> AuthError {
    AuthError::Provider(e.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Account {
    password: String,
    id: String,
}

/// Account store kept in a JSON file, so an account keeps its user id
/// (and with it its remote saves) from one run to the next.
#[derive(Debug)]
pub struct FileIdentityProvider {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileIdentityProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_accounts(&self) -> Result<BTreeMap<String, Account>, AuthError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let text = std::fs::read_to_string(&self.path).map_err(provider_error)?;
        serde_json::from_str(&text).map_err(provider_error)
    }

    fn write_accounts(&self, accounts: &BTreeMap<String, Account>) -> Result<(), AuthError> {
        let text = serde_json::to_string_pretty(accounts).map_err(provider_error)?;
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(provider_error)?;
        }
        std::fs::write(&self.path, text).map_err(provider_error)
    }
}

impl IdentityProvider for FileIdentityProvider {
    fn login(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let _guard = self.lock.lock().map_err(provider_error)?;
        match self.read_accounts()?.get(email) {
            Some(account) if account.password == password => Ok(Identity {
                id: account.id.clone(),
                token: random_hex(32),
            }),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    fn register(&self, email: &str, password: &str) -> Result<RegisterOutcome, AuthError> {
        let _guard = self.lock.lock().map_err(provider_error)?;
        let mut accounts = self.read_accounts()?;
        if accounts.contains_key(email) {
            return Ok(RegisterOutcome::AlreadyExists);
        }
        let id = random_hex(28);
        accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                id: id.clone(),
            },
        );
        self.write_accounts(&accounts)?;
        Ok(RegisterOutcome::Registered(Identity {
            id,
            token: random_hex(32),
        }))
    }
}

/// Identity provider used to sign in at startup.
#[derive(Resource, Clone)]
pub struct Accounts(pub Arc<dyn IdentityProvider>);

/// Installs the file account store named in the settings, unless a provider
/// was inserted already.
pub fn connect_accounts(
    mut commands: Commands,
    settings: Option<Res<GameSettings>>,
    accounts: Option<Res<Accounts>>,
) {
    if accounts.is_some() {
        return;
    }
    let Some(remote) = settings.as_ref().and_then(|s| s.remote.as_ref()) else {
        info!("No remote account configured; cloud saves are unavailable");
        return;
    };
    commands.insert_resource(Accounts(Arc::new(FileIdentityProvider::new(
        remote.accounts_file(),
    ))));
}

/// Logs in with the configured account, registering it on first use.
pub fn sign_in_from_settings(
    settings: Option<Res<GameSettings>>,
    accounts: Option<Res<Accounts>>,
    mut session: ResMut<AuthSession>,
) {
    if session.is_logged_in() {
        return;
    }
    let remote = settings.as_ref().and_then(|s| s.remote.as_ref());
    let (Some(remote), Some(accounts)) = (remote, accounts) else {
        return;
    };
    let provider = accounts.0.as_ref();
    // Login failures are logged by the session.
    if !matches!(
        session.login(provider, &remote.email, &remote.password),
        Err(AuthError::InvalidCredentials)
    ) {
        return;
    }
    match session.register(provider, &remote.email, &remote.password) {
        Ok(RegisterOutcome::Registered(_)) => {}
        Ok(RegisterOutcome::AlreadyExists) => {
            warn!("Account {} exists with a different password", remote.email);
        }
        Err(e) => warn!("Could not register {}: {e}", remote.email),
    }
}

pub struct AuthPlugin;

impl Plugin for AuthPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<AuthSession>()
            .add_systems(Startup, (connect_accounts, sign_in_from_settings).chain());
    }
}
