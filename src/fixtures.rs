#[cfg(test)]
pub mod test {
    use std::fmt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::config_enum;
    use crate::config_settings;
    use crate::crypto::FixedKeyProvider;
    use crate::document::{Document, Element};
    use crate::error::{ConfigError, XmlfigError};
    use crate::mapping::MappingContext;
    use crate::provider::DocumentProvider;
    use crate::registry::TypeRegistry;
    use crate::section::{ConfigSection, DynSection, Handled, SectionHandler, SettingDescriptor};

    config_enum! {
        #[derive(Default)]
        pub enum Mode {
            #[default]
            Fast,
            Slow,
        }
    }

    // -- Plain sections ---------------------------------------------------------

    #[derive(Debug, Clone, PartialEq)]
    pub struct ServerSection {
        pub host: String,
        pub port: u16,
        pub password: String,
        pub mode: Mode,
        pub tags: Vec<String>,
        pub timeout: Duration,
        pub database: DatabaseSection,
    }

    impl Default for ServerSection {
        fn default() -> Self {
            Self {
                host: "localhost".into(),
                port: 8080,
                password: String::new(),
                mode: Mode::Fast,
                tags: Vec::new(),
                timeout: Duration::ZERO,
                database: DatabaseSection::default(),
            }
        }
    }

    impl ConfigSection for ServerSection {
        const NAME: &'static str = "Server";

        config_settings! {
            host: value(SettingDescriptor::new("Host").default("localhost")),
            port: value(SettingDescriptor::new("Port").default("8080")),
            password: value(SettingDescriptor::new("Password").encrypted()),
            mode: value(SettingDescriptor::new("Mode").default("Fast")),
            tags: list(SettingDescriptor::new("Tags")),
            timeout: value(SettingDescriptor::new("Timeout")),
            database: section(SettingDescriptor::new("Database")),
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct DatabaseSection {
        pub url: Option<String>,
        pub pool_size: usize,
    }

    impl Default for DatabaseSection {
        fn default() -> Self {
            Self {
                url: None,
                pool_size: 5,
            }
        }
    }

    impl ConfigSection for DatabaseSection {
        const NAME: &'static str = "Database";

        config_settings! {
            url: value(SettingDescriptor::new("Url").description("Connection string URL")),
            pool_size: value(SettingDescriptor::new("PoolSize").default("5")),
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct CredentialsSection {
        pub user: String,
        pub secret: String,
    }

    impl ConfigSection for CredentialsSection {
        const NAME: &'static str = "Credentials";

        config_settings! {
            user: value(SettingDescriptor::new("User")),
            secret: value(SettingDescriptor::new("Secret").encrypted()),
        }
    }

    /// A whole nested section stored as one encrypted blob.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct SealedSection {
        pub inner: DatabaseSection,
    }

    impl ConfigSection for SealedSection {
        const NAME: &'static str = "Sealed";

        config_settings! {
            inner: section(SettingDescriptor::new("Inner").encrypted()),
        }
    }

    /// A list of sections sealed entry by entry.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct SecretReplicas {
        pub replicas: Vec<DatabaseSection>,
    }

    impl ConfigSection for SecretReplicas {
        const NAME: &'static str = "SecretReplicas";

        config_settings! {
            replicas: sections(SettingDescriptor::new("Replicas").encrypted()),
        }
    }

    /// A scalar list whose default is not empty.
    #[derive(Debug, Clone, PartialEq)]
    pub struct TaggedSection {
        pub tags: Vec<String>,
    }

    impl Default for TaggedSection {
        fn default() -> Self {
            Self {
                tags: vec!["seed".into(), "other".into()],
            }
        }
    }

    impl ConfigSection for TaggedSection {
        const NAME: &'static str = "Tagged";

        config_settings! {
            tags: list(SettingDescriptor::new("Tags")),
        }
    }

    // -- Polymorphic members ----------------------------------------------------

    #[derive(Debug, Clone, Default)]
    pub struct AppSettings {
        pub title: String,
        pub port: u16,
        pub replicas: Vec<DatabaseSection>,
        pub backend: Option<Box<dyn DynSection>>,
    }

    impl ConfigSection for AppSettings {
        const NAME: &'static str = "App";

        config_settings! {
            title: value,
            port: value(SettingDescriptor::new("Port")),
            replicas: sections(SettingDescriptor::new("Replicas")),
            backend: polymorphic(SettingDescriptor::new("Backend")),
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct FileBackend {
        pub path: String,
        pub read_only: bool,
    }

    impl ConfigSection for FileBackend {
        const NAME: &'static str = "FileBackend";

        config_settings! {
            path: value(SettingDescriptor::new("Path")),
            read_only: value(SettingDescriptor::new("ReadOnly").default("false")),
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct NetworkBackend {
        pub endpoint: String,
        pub retries: u32,
    }

    impl ConfigSection for NetworkBackend {
        const NAME: &'static str = "NetworkBackend";

        config_settings! {
            endpoint: value(SettingDescriptor::new("Endpoint")),
            retries: value(SettingDescriptor::new("Retries").default("3")),
        }
    }

    /// Backend wrapping another backend, for self-similar documents.
    #[derive(Debug, Clone, Default)]
    pub struct ChainBackend {
        pub next: Option<Box<dyn DynSection>>,
    }

    impl ConfigSection for ChainBackend {
        const NAME: &'static str = "ChainBackend";

        config_settings! {
            next: polymorphic(SettingDescriptor::new("Backend")),
        }
    }

    /// Backend whose own attribute collides with the polymorphic type attribute.
    #[derive(Debug, Clone, Default)]
    pub struct KindedBackend {
        pub kind: String,
    }

    impl ConfigSection for KindedBackend {
        const NAME: &'static str = "KindedBackend";

        config_settings! {
            kind: value(SettingDescriptor::new("type").attribute()),
        }
    }

    pub fn fixture_types() -> TypeRegistry {
        let mut types = TypeRegistry::new();
        types
            .register_section::<FileBackend>()
            .register_section::<NetworkBackend>()
            .register_section::<ChainBackend>();
        types
    }

    pub fn test_crypto() -> FixedKeyProvider {
        FixedKeyProvider::new([3; 32], [4; 32])
    }

    // -- Nesting restrictions ---------------------------------------------------

    #[derive(Debug, Clone, Default)]
    pub struct TopOnly {
        pub enabled: bool,
    }

    impl ConfigSection for TopOnly {
        const NAME: &'static str = "Top";
        const NESTABLE: bool = false;

        config_settings! {
            enabled: value(SettingDescriptor::new("Enabled")),
        }
    }

    #[derive(Debug, Clone, Default)]
    pub struct NestsTopOnly {
        pub top: TopOnly,
    }

    impl ConfigSection for NestsTopOnly {
        const NAME: &'static str = "Outer";

        config_settings! {
            top: section(SettingDescriptor::new("Top")),
        }
    }

    // -- Custom handler ---------------------------------------------------------

    /// Counts the children of its element instead of mapping settings.
    #[derive(Debug, Clone, Default)]
    pub struct CountingHandlerSection {
        pub children: usize,
    }

    impl ConfigSection for CountingHandlerSection {
        const NAME: &'static str = "Counting";

        fn handler() -> Option<Box<dyn SectionHandler<Self>>> {
            Some(Box::new(CountingHandler))
        }

        config_settings! {
            children: value(SettingDescriptor::new("children").attribute()),
        }
    }

    struct CountingHandler;

    impl SectionHandler<CountingHandlerSection> for CountingHandler {
        fn read_section(
            &self,
            element: &Element,
            _ctx: &MappingContext<'_>,
        ) -> Handled<CountingHandlerSection> {
            let children = element.children.len();
            let handled = Handled::ok(CountingHandlerSection { children });
            if children == 0 {
                return handled.without_diagnostics();
            }
            handled.with_diagnostics(vec![ConfigError::conversion(format!(
                "{children} unexpected child element(s)"
            ))])
        }

        fn write_section(
            &self,
            name: &str,
            value: &CountingHandlerSection,
            _ctx: &MappingContext<'_>,
        ) -> Handled<Element> {
            let mut element = Element::new(name);
            element.set_attribute("children", value.children.to_string());
            Handled::ok(element)
        }
    }

    // -- Providers --------------------------------------------------------------

    /// In-memory provider that counts the calls made on it.
    #[derive(Debug)]
    pub struct RecordingProvider {
        id: String,
        documents: Vec<Document>,
        modified: bool,
        modified_checks: AtomicUsize,
        initializations: AtomicUsize,
    }

    impl RecordingProvider {
        pub fn new(id: &str, documents: Vec<Document>) -> Self {
            Self {
                id: id.to_string(),
                documents,
                modified: false,
                modified_checks: AtomicUsize::new(0),
                initializations: AtomicUsize::new(0),
            }
        }

        pub fn modified(mut self, modified: bool) -> Self {
            self.modified = modified;
            self
        }

        pub fn modified_checks(&self) -> usize {
            self.modified_checks.load(Ordering::SeqCst)
        }

        pub fn initializations(&self) -> usize {
            self.initializations.load(Ordering::SeqCst)
        }
    }

    impl fmt::Display for RecordingProvider {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "recording provider {}", self.id)
        }
    }

    impl DocumentProvider for RecordingProvider {
        fn initialize(&self) -> Result<(), XmlfigError> {
            self.initializations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn load(&self) -> Result<Vec<Document>, XmlfigError> {
            Ok(self.documents.clone())
        }

        fn save(&self, _document: &Document) -> Result<(), XmlfigError> {
            Err(XmlfigError::NotSupported {
                provider: self.to_string(),
                operation: "save",
            })
        }

        fn delete(&self) -> Result<(), XmlfigError> {
            Err(XmlfigError::NotSupported {
                provider: self.to_string(),
                operation: "delete",
            })
        }

        fn can_delete(&self) -> bool {
            false
        }

        fn is_read_only(&self) -> bool {
            true
        }

        fn modified_since_load(&self) -> bool {
            self.modified_checks.fetch_add(1, Ordering::SeqCst);
            self.modified
        }

        fn source_identifier(&self) -> String {
            self.id.clone()
        }
    }

    #[test]
    fn server_defaults_match_declared_defaults() {
        let mapped = crate::mapping::read_section::<ServerSection>(
            &Element::new(ServerSection::NAME),
            &MappingContext::default(),
        )
        .unwrap();
        assert!(mapped.is_clean());
        assert_eq!(mapped.value, ServerSection::default());
    }
}
