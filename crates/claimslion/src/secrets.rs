//! Resolution of the model API key from configuration.
//!
//! Sources are tried in order: a direct value in the config file, a file
//! holding the key (Docker/Kubernetes secret mounts), then an environment
//! variable. The first non-empty source wins.

use secrecy::SecretString;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source configured (set api_key, api_key_file or api_key_env_var)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Secret file '{0}' is empty")]
    EmptyFile(PathBuf),

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// One configured place a secret can live.
#[derive(Debug, Clone, Copy)]
enum Source<'a> {
    Direct(&'a str),
    File(&'a str),
    Env(&'a str),
}

impl Source<'_> {
    fn read(self) -> Result<SecretString> {
        match self {
            Source::Direct(value) => Ok(SecretString::from(value.to_string())),
            Source::File(path) => {
                let path = expand_home(path);
                let content =
                    std::fs::read_to_string(&path).map_err(|e| SecretError::FileReadError {
                        path: path.clone(),
                        source: e,
                    })?;
                match content.trim() {
                    "" => Err(SecretError::EmptyFile(path)),
                    key => Ok(SecretString::from(key.to_string())),
                }
            }
            Source::Env(name) => match std::env::var(name) {
                Ok(value) => Ok(SecretString::from(value.trim().to_string())),
                Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                    name: name.to_string(),
                }),
                Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                    name: name.to_string(),
                }),
            },
        }
    }
}

/// Reads the secret from the first configured source. A configured source
/// that fails is an error; later sources are not consulted.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    let configured = [
        direct.map(Source::Direct),
        file_path.map(Source::File),
        env_var.map(Source::Env),
    ];

    configured
        .into_iter()
        .flatten()
        .find(|source| match source {
            Source::Direct(v) | Source::File(v) | Source::Env(v) => !v.is_empty(),
        })
        .ok_or(SecretError::NoSourceProvided)?
        .read()
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
