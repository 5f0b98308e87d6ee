//! Declarative XML configuration for Rust applications. Describe a section
//! once, point it at storage, and load it.
//!
//! xmlfig maps typed configuration sections to and from XML documents. Each
//! section lists its settings in one place; the engine reads them with
//! per-setting defaults, writes them back, encrypts the flagged ones, and
//! caches one shared instance per type behind a [`ConfigMaster`].
//!
//! ```ignore
//! let master = ConfigMaster::builder()
//!     .crypto(Arc::new(PasswordProvider::new("s3cret")))
//!     .build();
//! let server: Arc<Server> = master.get_settings()?;
//! ```
//!
//! That single call finds the document provider mapped for `Server` (by
//! default `<executable>.config` next to the binary), loads its documents,
//! reads the `<Server>` section from the last document that has one, and
//! caches the result for every later caller.
//!
//! # Sections as source of truth
//!
//! A type becomes a section by implementing [`ConfigSection`] and listing its
//! settings with [`config_settings!`]:
//!
//! ```ignore
//! #[derive(Debug, Clone, Default)]
//! struct Server {
//!     host: String,
//!     port: u16,
//!     password: String,
//!     backend: Option<Box<dyn DynSection>>,
//! }
//!
//! impl ConfigSection for Server {
//!     const NAME: &'static str = "Server";
//!
//!     config_settings! {
//!         host: value(SettingDescriptor::new("Host").default("localhost")),
//!         port: value(SettingDescriptor::new("Port").default("8080")),
//!         password: value(SettingDescriptor::new("Password").encrypted()),
//!         backend: polymorphic(SettingDescriptor::new("Backend")),
//!     }
//! }
//! ```
//!
//! - **Defaults** are text, parsed with the same codec as stored values, and
//!   applied whenever the document has no node for a setting.
//! - **Encrypted** settings are stored as opaque base64. Plaintext found in
//!   an encrypted slot is accepted as-is, so a hand-edited file keeps working
//!   and is encrypted on the next save.
//! - **Polymorphic** members persist the concrete type name in a `type`
//!   attribute; the name is resolved through an explicit [`TypeRegistry`].
//!
//! # Document format
//!
//! ```text
//! <configuration>
//!   <Server Port="8080">
//!     <Host>db.internal</Host>
//!     <Password>base64...</Password>
//!     <Tags><Item>a</Item><Item>b</Item></Tags>
//!     <Backend type="FileBackend"><Path>/var/data</Path></Backend>
//!   </Server>
//! </configuration>
//! ```
//!
//! A setting may be stored as a child element or an attribute; both are
//! accepted on read, and the descriptor decides which one is written.
//!
//! # Errors
//!
//! Reading never stops at the first bad value. A value that fails to convert
//! falls back to its default and is recorded as a [`ConfigError`]; the list
//! comes back alongside the section in [`Mapped`]. Structural problems (no
//! type for a polymorphic member, a missing crypto provider, a malformed
//! document) are fatal and surface as [`XmlfigError`] carrying every error
//! collected up to that point.
//!
//! # Storage
//!
//! A [`DocumentProvider`] supplies documents in precedence order, later
//! documents winning:
//!
//! | Provider | Storage | Writable |
//! |----------|---------|----------|
//! | [`FileProvider`] | one XML file | yes |
//! | [`DefaultFileProvider`] | `<executable>.config` | yes |
//! | [`UserProfileProvider`] | per-user `user.config` | yes |
//! | [`MultiFileProvider`] | several files | no |
//! | [`MemoryProvider`] | a literal string | no |
//! | [`CompositeProvider`] | other providers | no |
//!
//! The [`ProviderRegistry`] decides which provider serves each section type.
//! Remapping a type, or changing the default, evicts the affected cached
//! instances from every master sharing the registry.
//!
//! # Encryption
//!
//! [`FixedKeyProvider`] and [`PasswordProvider`] seal values with AES-256-CBC
//! and authenticate them with HMAC-SHA256. A [`CryptoSection`] can store which
//! registered provider to use, itself encrypted.
//!
//! # Engine options
//!
//! [`EngineOptions`] holds the application identity, key-derivation cost and
//! recent-source capacity, layered from `XMLFIG_*` environment variables over
//! an optional TOML file. Unknown keys in that file are rejected with their
//! line number.

pub mod composite;
pub mod crypto;
pub mod crypto_section;
pub mod document;
pub mod error;
pub mod file;
pub mod mapping;
pub mod master;
pub mod options;
pub mod provider;
pub mod providers;
pub mod reader;
pub mod registry;
pub mod scalar;
pub mod section;
pub mod source;
pub mod writer;

mod builder;

#[cfg(test)]
mod fixtures;

pub use builder::ConfigMasterBuilder;
pub use composite::CompositeProvider;
pub use crypto::{CryptoProvider, Envelope, FixedKeyProvider, PasswordProvider};
pub use crypto_section::CryptoSection;
pub use document::{Document, Element};
pub use error::{ConfigError, ErrorCode, Mapped, XmlfigError};
pub use file::{DefaultFileProvider, FileProvider, MultiFileProvider, ProfileScope, UserProfileProvider};
pub use mapping::MappingContext;
pub use master::ConfigMaster;
pub use options::EngineOptions;
pub use provider::{DocumentProvider, MemoryProvider};
pub use providers::{ListenerId, ProviderRegistry, TypeKey};
pub use registry::TypeRegistry;
pub use section::{ConfigSection, DynSection, Handled, SectionHandler, SettingDescriptor};
pub use source::{ConfigSource, RecentSources, SourcePlugin, SourcePlugins};
