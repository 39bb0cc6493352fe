//! Resolution of the inference API key.
//!
//! A key comes from the first configured [`SecretSource`]. For the `llm`
//! section that is `api_key_file` (for example a mounted secret) and then
//! the `api_key_env` variable, `OPENAI_API_KEY` by default.

use std::fs;
use std::path::PathBuf;

use secrecy::SecretString;

use crate::config::LlmConfig;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("no API key source configured (set a key file or an environment variable)")]
    NoSourceProvided,

    #[error("cannot read key file '{}': {source}", path.display())]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("environment variable '{name}' is not set")]
    EnvVarNotSet { name: String },

    #[error("environment variable '{name}' is not valid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("{origin} holds an empty key")]
    Empty { origin: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Where a key may be read from. Blank names are treated as unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource<'a> {
    /// A file whose trimmed contents are the key; `~/` is expanded.
    File(&'a str),
    /// An environment variable.
    Env(&'a str),
}

impl SecretSource<'_> {
    fn is_configured(&self) -> bool {
        match self {
            Self::File(path) => !path.trim().is_empty(),
            Self::Env(name) => !name.trim().is_empty(),
        }
    }

    fn read(&self) -> Result<SecretString> {
        match *self {
            Self::File(path) => {
                let path = expand_home(path.trim());
                let content = fs::read_to_string(&path).map_err(|source| {
                    SecretError::FileReadError {
                        path: path.clone(),
                        source,
                    }
                })?;
                non_empty(&content, || format!("key file '{}'", path.display()))
            }
            Self::Env(name) => {
                let name = name.trim();
                match std::env::var(name) {
                    Ok(value) => non_empty(&value, || format!("environment variable '{}'", name)),
                    Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                        name: name.to_string(),
                    }),
                    Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                        name: name.to_string(),
                    }),
                }
            }
        }
    }
}

/// Reads the key from the first configured source.
///
/// Later sources are not consulted once one is configured, so a broken key
/// file is reported rather than silently replaced by the environment.
pub fn resolve_secret(sources: &[SecretSource<'_>]) -> Result<SecretString> {
    sources
        .iter()
        .find(|source| source.is_configured())
        .ok_or(SecretError::NoSourceProvided)?
        .read()
}

/// The inference API key for the `llm` section.
pub fn resolve_api_key(config: &LlmConfig) -> Result<SecretString> {
    let mut sources = Vec::with_capacity(2);
    if let Some(path) = config.api_key_file.as_deref() {
        sources.push(SecretSource::File(path));
    }
    sources.push(SecretSource::Env(&config.api_key_env));
    resolve_secret(&sources)
}

fn non_empty(raw: &str, origin: impl FnOnce() -> String) -> Result<SecretString> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(SecretError::Empty { origin: origin() });
    }
    Ok(SecretString::from(value.to_string()))
}

fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some("") => "",
        Some(rest) if rest.starts_with('/') => &rest[1..],
        _ => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}
