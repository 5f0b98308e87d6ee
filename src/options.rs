//! Engine-level options: application identity, key derivation cost and the
//! recent-sources capacity.
//!
//! Options are layered with `confique`: `XMLFIG_*` environment variables over
//! an optional TOML file over the defaults declared on [`EngineOptions`]. The
//! file is checked strictly: any key the options don't declare is reported
//! with its dotted path and best-effort line number.
//!
//! ```toml
//! app_name = "inventory"
//! organization = "acme"
//! profile_scope = "local"
//!
//! [crypto]
//! iterations = 20000
//!
//! [recent]
//! capacity = 5
//! ```

use std::path::Path;

use confique::Config;
use tracing::debug;

use crate::crypto::{DEFAULT_ITERATIONS, DEFAULT_SALT_SIZE, PasswordProvider};
use crate::error::XmlfigError;
use crate::file::{ProfileScope, UserProfileProvider};
use crate::source::RecentSources;

#[derive(Config, Debug, Clone)]
pub struct EngineOptions {
    /// Application name, used to locate the per-user profile directory.
    #[config(env = "XMLFIG_APP_NAME", default = "xmlfig")]
    pub app_name: String,

    /// Organization owning the application. May be empty.
    #[config(env = "XMLFIG_ORGANIZATION", default = "")]
    pub organization: String,

    /// Which per-user store to use: "roaming" or "local".
    #[config(env = "XMLFIG_PROFILE_SCOPE", default = "roaming")]
    pub profile_scope: ProfileScope,

    /// Password-based key derivation.
    #[config(nested)]
    pub crypto: CryptoOptions,

    /// Recently used sources.
    #[config(nested)]
    pub recent: RecentOptions,
}

#[derive(Config, Debug, Clone)]
pub struct CryptoOptions {
    /// PBKDF2 iteration count.
    #[config(env = "XMLFIG_CRYPTO_ITERATIONS", default = 10000)]
    pub iterations: u32,

    /// Salt length in bytes for password-derived keys.
    #[config(env = "XMLFIG_CRYPTO_SALT_SIZE", default = 16)]
    pub salt_size: usize,
}

#[derive(Config, Debug, Clone)]
pub struct RecentOptions {
    /// Number of recently used sources to remember.
    #[config(env = "XMLFIG_RECENT_CAPACITY", default = 10)]
    pub capacity: usize,
}

impl EngineOptions {
    /// Load options from the environment and, when it exists, the TOML file at `path`.
    pub fn load(path: Option<&Path>) -> Result<Self, XmlfigError> {
        let file = match path {
            Some(path) if path.is_file() => {
                let content = std::fs::read_to_string(path).map_err(|e| XmlfigError::io(path, e))?;
                Some(strict_layer(&content, path)?)
            }
            Some(path) => {
                debug!(path = %path.display(), "no engine options file");
                None
            }
            None => None,
        };

        let mut builder = Self::builder().env();
        if let Some(layer) = file {
            builder = builder.preloaded(layer);
        }
        builder.load().map_err(XmlfigError::from)
    }

    /// Options from TOML text alone, ignoring the environment. `path` only
    /// labels errors.
    pub fn from_toml(content: &str, path: &Path) -> Result<Self, XmlfigError> {
        let layer = strict_layer(content, path)?;
        Self::builder()
            .preloaded(layer)
            .load()
            .map_err(XmlfigError::from)
    }

    /// A commented TOML file listing every option with its default.
    pub fn template() -> String {
        confique::toml::template::<Self>(confique::toml::FormatOptions::default())
    }

    /// A password provider using the configured derivation cost.
    pub fn password_provider(&self, password: impl Into<String>) -> PasswordProvider {
        PasswordProvider::new(password)
            .iterations(self.crypto.iterations)
            .salt_size(self.crypto.salt_size)
    }

    pub fn user_profile_provider(&self) -> Result<UserProfileProvider, XmlfigError> {
        UserProfileProvider::new(&self.organization, &self.app_name, self.profile_scope)
    }

    pub fn recent_sources(&self) -> RecentSources {
        RecentSources::new(self.recent.capacity)
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            app_name: "xmlfig".into(),
            organization: String::new(),
            profile_scope: ProfileScope::default(),
            crypto: CryptoOptions {
                iterations: DEFAULT_ITERATIONS,
                salt_size: DEFAULT_SALT_SIZE,
            },
            recent: RecentOptions {
                capacity: crate::source::DEFAULT_RECENT_CAPACITY,
            },
        }
    }
}

type OptionsLayer = <EngineOptions as Config>::Layer;

/// Parse the options file into a layer. Every key the options don't declare
/// is collected, located and reported together.
fn strict_layer(content: &str, path: &Path) -> Result<OptionsLayer, XmlfigError> {
    let mut unknown = Vec::new();
    let layer: OptionsLayer =
        serde_ignored::deserialize(toml::Deserializer::new(content), |ignored| {
            let key = ignored.to_string();
            unknown.push(XmlfigError::UnknownOption {
                line: line_of(content, &key),
                key,
                path: path.to_path_buf(),
            });
        })
        .map_err(|source| XmlfigError::OptionsParse {
            path: path.to_path_buf(),
            source,
        })?;

    if unknown.is_empty() {
        Ok(layer)
    } else {
        Err(XmlfigError::UnknownOptions(unknown))
    }
}

/// 1-indexed line assigning `key`, a dotted path whose leading segments name
/// the `[table]` it lives in. 0 when not found. Quoted keys, dotted keys and
/// inline tables are not recognized.
fn line_of(content: &str, key: &str) -> usize {
    let (table, leaf) = key.rsplit_once('.').unwrap_or(("", key));
    let mut current = String::new();
    for (number, line) in (1..).zip(content.lines()) {
        let line = line.trim();
        if let Some(header) = line.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
            current = header
                .split('.')
                .map(str::trim)
                .collect::<Vec<_>>()
                .join(".");
            continue;
        }
        if current == table
            && let Some((name, _)) = line.split_once('=')
            && name.trim() == leaf
        {
            return number;
        }
    }
    0
}
