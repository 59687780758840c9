use std::{fmt, path::PathBuf};

use spotex_common::error::{Result, SpotexError};
use tracing::debug;

pub const ACCESS_KEY_ENV: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_KEY_ENV: &str = "AWS_SECRET_ACCESS_KEY";
pub const SESSION_TOKEN_ENV: &str = "AWS_SESSION_TOKEN";
pub const SHARED_CREDENTIALS_FILE_ENV: &str = "AWS_SHARED_CREDENTIALS_FILE";
pub const PROFILE_ENV: &str = "AWS_PROFILE";
pub const DEFAULT_PROFILE: &str = "default";

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    fn from_parts(
        access_key: Option<String>,
        secret_key: Option<String>,
        session_token: Option<String>,
    ) -> Option<Self> {
        let access_key = access_key.filter(|value| !value.is_empty())?;
        let secret_key = secret_key.filter(|value| !value.is_empty())?;
        Some(Self {
            access_key,
            secret_key,
            session_token: session_token.filter(|value| !value.is_empty()),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

pub trait CredentialProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn provide(&self) -> Result<Credentials>;
}

#[derive(Clone, Debug)]
pub struct StaticCredentialProvider {
    credentials: Option<Credentials>,
}

impl StaticCredentialProvider {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            credentials: Credentials::from_parts(
                Some(access_key.into()),
                Some(secret_key.into()),
                None,
            ),
        }
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    fn provide(&self) -> Result<Credentials> {
        self.credentials.clone().ok_or_else(|| {
            SpotexError::Credentials("static access key or secret key is empty".to_string())
        })
    }
}

/// Reads `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and `AWS_SESSION_TOKEN`.
#[derive(Clone, Debug, Default)]
pub struct EnvCredentialProvider;

impl CredentialProvider for EnvCredentialProvider {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn provide(&self) -> Result<Credentials> {
        Credentials::from_parts(
            std::env::var(ACCESS_KEY_ENV).ok(),
            std::env::var(SECRET_KEY_ENV).ok(),
            std::env::var(SESSION_TOKEN_ENV).ok(),
        )
        .ok_or_else(|| {
            SpotexError::Credentials(format!("{ACCESS_KEY_ENV} or {SECRET_KEY_ENV} not set"))
        })
    }
}

/// Reads one profile from the shared credentials file.
#[derive(Clone, Debug)]
pub struct ProfileCredentialProvider {
    path: PathBuf,
    profile: String,
}

impl ProfileCredentialProvider {
    pub fn new(path: impl Into<PathBuf>, profile: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            profile: profile.into(),
        }
    }

    /// Resolves the file and profile the same way the AWS CLI does.
    pub fn from_env() -> Option<Self> {
        let path = match std::env::var(SHARED_CREDENTIALS_FILE_ENV) {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => home_dir()?.join(".aws").join("credentials"),
        };
        let profile = std::env::var(PROFILE_ENV)
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string());
        Some(Self::new(path, profile))
    }
}

impl CredentialProvider for ProfileCredentialProvider {
    fn name(&self) -> &'static str {
        "shared-credentials-file"
    }

    fn provide(&self) -> Result<Credentials> {
        let contents = std::fs::read_to_string(&self.path)?;
        parse_profile(&contents, &self.profile).ok_or_else(|| {
            SpotexError::Credentials(format!(
                "profile {} not found or incomplete in {}",
                self.profile,
                self.path.display()
            ))
        })
    }
}

/// Tries each provider in order and returns the first credentials found.
pub struct ChainCredentialProvider {
    providers: Vec<Box<dyn CredentialProvider>>,
}

impl ChainCredentialProvider {
    pub fn new(providers: Vec<Box<dyn CredentialProvider>>) -> Self {
        Self { providers }
    }

    /// Environment first, then the shared credentials file.
    pub fn default_chain() -> Self {
        let mut providers: Vec<Box<dyn CredentialProvider>> = vec![Box::new(EnvCredentialProvider)];
        if let Some(profile) = ProfileCredentialProvider::from_env() {
            providers.push(Box::new(profile));
        }
        Self::new(providers)
    }
}

impl CredentialProvider for ChainCredentialProvider {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn provide(&self) -> Result<Credentials> {
        let mut failures = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            match provider.provide() {
                Ok(credentials) => {
                    debug!(provider = provider.name(), "loaded aws credentials");
                    return Ok(credentials);
                }
                Err(err) => failures.push(format!("{}: {err}", provider.name())),
            }
        }

        Err(SpotexError::Credentials(if failures.is_empty() {
            "no credential providers configured".to_string()
        } else {
            failures.join("; ")
        }))
    }
}

/// Reads one profile from a shared credentials file.
///
/// Only the plain `[name]` section form of the credentials file is matched;
/// the `[profile name]` form belongs to the CLI config file and is ignored.
/// Values are taken verbatim after trimming, so quotes are kept as part of
/// the value. Later keys in the same section override earlier ones.
fn parse_profile(contents: &str, profile: &str) -> Option<Credentials> {
    let mut in_profile = false;
    let mut access_key = None;
    let mut secret_key = None;
    let mut session_token = None;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(section) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            in_profile = section.trim() == profile;
            continue;
        }

        if !in_profile {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = Some(value.trim().to_string());
        match key.trim() {
            "aws_access_key_id" => access_key = value,
            "aws_secret_access_key" => secret_key = value,
            "aws_session_token" => session_token = value,
            _ => {}
        }
    }

    Credentials::from_parts(access_key, secret_key, session_token)
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}
