//! Named configuration sources and the recently-used list.
//!
//! A [`ConfigSource`] is what a front end shows for a document provider: the
//! provider plus an optional alias and icon. [`RecentSources`] keeps the most
//! recently used ones, newest first, de-duplicated by
//! [`source_identifier`](DocumentProvider::source_identifier). File-backed
//! entries can be persisted through [`RecentSourcesSection`].
//!
//! Additional sources come from [`SourcePlugin`]s registered explicitly in a
//! [`SourcePlugins`] set.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config_settings;
use crate::error::XmlfigError;
use crate::file::FileProvider;
use crate::provider::DocumentProvider;
use crate::section::{ConfigSection, SettingDescriptor};

/// Default number of entries kept by [`RecentSources`].
pub const DEFAULT_RECENT_CAPACITY: usize = 10;

#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub provider: Arc<dyn DocumentProvider>,
    pub alias: Option<String>,
    pub icon: Option<String>,
}

impl ConfigSource {
    pub fn new(provider: Arc<dyn DocumentProvider>) -> Self {
        Self {
            provider,
            alias: None,
            icon: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// The alias, or the provider's own description.
    pub fn display_name(&self) -> String {
        match &self.alias {
            Some(alias) if !alias.is_empty() => alias.clone(),
            _ => self.provider.to_string(),
        }
    }

    pub fn identifier(&self) -> String {
        self.provider.source_identifier()
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// Most-recently-used config sources, newest first.
#[derive(Debug)]
pub struct RecentSources {
    capacity: usize,
    entries: Mutex<Vec<ConfigSource>>,
}

impl Default for RecentSources {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_CAPACITY)
    }
}

impl RecentSources {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Move `source` to the front, replacing any entry with the same
    /// identifier and dropping the oldest entries beyond capacity.
    pub fn push(&self, source: ConfigSource) {
        let id = source.identifier();
        let mut entries = self.entries.lock();
        entries.retain(|s| s.identifier() != id);
        entries.insert(0, source);
        let keep = self.capacity.min(entries.len());
        for dropped in entries.drain(keep..) {
            debug!(source = %dropped.identifier(), "recent source evicted");
        }
    }

    /// Remove the entry with `identifier`. Returns whether one was present.
    pub fn remove(&self, identifier: &str) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|s| s.identifier() != identifier);
        entries.len() != before
    }

    pub fn remove_provider(&self, provider: &dyn DocumentProvider) -> bool {
        self.remove(&provider.source_identifier())
    }

    pub fn sources(&self) -> Vec<ConfigSource> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Persistable form, keeping only file-backed sources.
    pub fn to_section(&self) -> RecentSourcesSection {
        let entries = self
            .entries
            .lock()
            .iter()
            .filter_map(|s| {
                let path = s.provider.file_path()?;
                Some(RecentSourceEntry {
                    path: path.display().to_string(),
                    alias: s.alias.clone(),
                    icon: s.icon.clone(),
                })
            })
            .collect();
        RecentSourcesSection { entries }
    }

    /// Rebuild from a persisted section, oldest entries past `capacity` dropped.
    pub fn from_section(section: &RecentSourcesSection, capacity: usize) -> Self {
        let recent = Self::new(capacity);
        {
            let mut entries = recent.entries.lock();
            for entry in &section.entries {
                if entry.path.is_empty() {
                    warn!("skipping recent source without a path");
                    continue;
                }
                if entries.len() == recent.capacity {
                    break;
                }
                let provider: Arc<dyn DocumentProvider> = Arc::new(FileProvider::new(&entry.path));
                let id = provider.source_identifier();
                if entries.iter().any(|s| s.identifier() == id) {
                    continue;
                }
                entries.push(ConfigSource {
                    provider,
                    alias: entry.alias.clone(),
                    icon: entry.icon.clone(),
                });
            }
        }
        recent
    }
}

/// One persisted recent source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecentSourceEntry {
    pub path: String,
    pub alias: Option<String>,
    pub icon: Option<String>,
}

impl ConfigSection for RecentSourceEntry {
    const NAME: &'static str = "Source";

    config_settings! {
        path: value(SettingDescriptor::new("Path").attribute()),
        alias: value(SettingDescriptor::new("Alias").attribute()),
        icon: value(SettingDescriptor::new("Icon").attribute()),
    }
}

/// The recently-used list as stored in a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecentSourcesSection {
    pub entries: Vec<RecentSourceEntry>,
}

impl ConfigSection for RecentSourcesSection {
    const NAME: &'static str = "RecentSources";

    config_settings! {
        entries: sections(SettingDescriptor::new("Sources")),
    }
}

/// An extension point contributing a config source.
pub trait SourcePlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the plugin can contribute a source in this environment.
    fn can_provide(&self) -> bool;

    fn initialize(&self) -> Result<(), XmlfigError> {
        Ok(())
    }

    fn get_source(&self) -> Result<Option<ConfigSource>, XmlfigError>;
}

/// Explicitly registered source plugins.
#[derive(Default)]
pub struct SourcePlugins {
    plugins: Vec<Arc<dyn SourcePlugin>>,
}

impl SourcePlugins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn SourcePlugin>) -> &mut Self {
        self.plugins.push(plugin);
        self
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Sources from every plugin that can provide one, in registration order.
    pub fn sources(&self) -> Result<Vec<ConfigSource>, XmlfigError> {
        let mut sources = Vec::new();
        for plugin in &self.plugins {
            if !plugin.can_provide() {
                debug!(plugin = plugin.name(), "source plugin unavailable");
                continue;
            }
            plugin.initialize()?;
            if let Some(source) = plugin.get_source()? {
                sources.push(source);
            }
        }
        Ok(sources)
    }
}

impl fmt::Debug for SourcePlugins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.plugins.iter().map(|p| p.name()).collect();
        f.debug_struct("SourcePlugins").field("plugins", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::mapping::{MappingContext, load_section, store_section};
    use crate::provider::MemoryProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn file_source(path: &str) -> ConfigSource {
        ConfigSource::new(Arc::new(FileProvider::new(path)))
    }

    fn identifiers(recent: &RecentSources) -> Vec<String> {
        recent.sources().iter().map(ConfigSource::identifier).collect()
    }

    #[test]
    fn display_name_prefers_alias() {
        let source = file_source("/etc/app.config");
        assert_eq!(source.display_name(), "/etc/app.config");
        let source = source.alias("Production").icon("prod.png");
        assert_eq!(source.to_string(), "Production");
    }

    #[test]
    fn push_moves_duplicates_to_front() {
        let recent = RecentSources::new(5);
        recent.push(file_source("/a"));
        recent.push(file_source("/b"));
        recent.push(file_source("/a").alias("again"));
        assert_eq!(identifiers(&recent), vec!["/a", "/b"]);
        assert_eq!(recent.sources()[0].alias.as_deref(), Some("again"));
    }

    #[test]
    fn capacity_drops_oldest() {
        let recent = RecentSources::new(2);
        for path in ["/a", "/b", "/c"] {
            recent.push(file_source(path));
        }
        assert_eq!(identifiers(&recent), vec!["/c", "/b"]);
        assert_eq!(RecentSources::new(0).capacity(), 1);
    }

    #[test]
    fn remove_by_identifier_or_provider() {
        let recent = RecentSources::default();
        let memory: Arc<dyn DocumentProvider> = Arc::new(MemoryProvider::empty());
        recent.push(ConfigSource::new(memory.clone()));
        recent.push(file_source("/a"));
        assert!(recent.remove("/a"));
        assert!(!recent.remove("/a"));
        assert!(recent.remove_provider(memory.as_ref()));
        assert!(recent.is_empty());
    }

    #[test]
    fn concurrent_pushes_never_duplicate() {
        let recent = Arc::new(RecentSources::new(50));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let recent = recent.clone();
                std::thread::spawn(move || {
                    for n in 0..20 {
                        recent.push(file_source(&format!("/cfg/{}", (n + i) % 10)));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let mut ids = identifiers(&recent);
        assert_eq!(ids.len(), 10);
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn persisted_list_keeps_file_sources_only() {
        let recent = RecentSources::default();
        recent.push(file_source("/first").alias("First"));
        recent.push(ConfigSource::new(Arc::new(MemoryProvider::empty())));
        recent.push(file_source("/second"));

        let section = recent.to_section();
        assert_eq!(section.entries.len(), 2);
        assert_eq!(section.entries[0].path, "/second");
        assert_eq!(section.entries[1].alias.as_deref(), Some("First"));

        let ctx = MappingContext::default();
        let mut doc = Document::default();
        store_section(&mut doc, &section, &ctx).unwrap();
        let xml = doc.to_xml_string().unwrap();
        assert!(xml.contains(r#"<Source Path="/first" Alias="First">"#), "{xml}");

        let back = load_section::<RecentSourcesSection>(&[doc], &ctx).unwrap().value;
        assert_eq!(back, section);
        let restored = RecentSources::from_section(&back, 1);
        assert_eq!(identifiers(&restored), vec!["/second"]);
    }

    struct StaticPlugin {
        available: bool,
        initialized: AtomicUsize,
    }

    impl SourcePlugin for StaticPlugin {
        fn name(&self) -> &str {
            "static"
        }

        fn can_provide(&self) -> bool {
            self.available
        }

        fn initialize(&self) -> Result<(), XmlfigError> {
            self.initialized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn get_source(&self) -> Result<Option<ConfigSource>, XmlfigError> {
            Ok(Some(
                ConfigSource::new(Arc::new(MemoryProvider::empty())).alias("Built-in"),
            ))
        }
    }

    #[test]
    fn plugins_contribute_only_when_available() {
        let on = Arc::new(StaticPlugin {
            available: true,
            initialized: AtomicUsize::new(0),
        });
        let off = Arc::new(StaticPlugin {
            available: false,
            initialized: AtomicUsize::new(0),
        });
        let mut plugins = SourcePlugins::new();
        plugins.register(on.clone()).register(off.clone());
        assert_eq!(plugins.len(), 2);

        let sources = plugins.sources().unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].display_name(), "Built-in");
        assert_eq!(on.initialized.load(Ordering::SeqCst), 1);
        assert_eq!(off.initialized.load(Ordering::SeqCst), 0);
    }
}
