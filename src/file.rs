//! File-backed document providers.
//!
//! # Staleness
//!
//! A [`FileProvider`] remembers the file's last-write time as observed by its
//! most recent `load` or `save`. The timestamp is read from the same open
//! handle as the contents, under the provider's lock, so
//! [`modified_since_load`](DocumentProvider::modified_since_load) compares
//! against exactly the state that was read. A provider's own `save` refreshes
//! the timestamp; a save through any other provider instance does not.
//!
//! # Missing files
//!
//! Loading a file that does not exist yields one empty default document. The
//! [`MultiFileProvider`] instead skips missing files.
//!
//! # Platform locations
//!
//! [`DefaultFileProvider`] points at `<current executable>.config`;
//! [`UserProfileProvider`] at `user.config` inside the platform's per-user
//! config directory, resolved with `directories`.

use std::fmt;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::document::Document;
use crate::error::XmlfigError;
use crate::provider::{DocumentProvider, IDENTIFIER_SEPARATOR};

/// File name of the per-user configuration file.
pub const USER_CONFIG_FILE: &str = "user.config";

/// Extension appended to the executable path for the application config file.
pub const APP_CONFIG_EXTENSION: &str = ".config";

/// What the provider saw at its last load or save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stamp {
    Unloaded,
    Missing,
    Written(Option<SystemTime>),
}

/// One physical configuration file.
#[derive(Debug)]
pub struct FileProvider {
    path: PathBuf,
    stamp: Mutex<Stamp>,
}

impl FileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            stamp: Mutex::new(Stamp::Unloaded),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the file if it exists, recording its timestamp either way.
    pub fn load_existing(&self) -> Result<Option<Document>, XmlfigError> {
        let mut stamp = self.stamp.lock();
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                *stamp = Stamp::Missing;
                debug!(path = %self.path.display(), "config file not found");
                return Ok(None);
            }
            Err(e) => return Err(XmlfigError::io(&self.path, e)),
        };
        let modified = file
            .metadata()
            .map_err(|e| XmlfigError::io(&self.path, e))?
            .modified()
            .ok();
        let mut content = String::new();
        file.read_to_string(&mut content)
            .map_err(|e| XmlfigError::io(&self.path, e))?;
        let document = Document::parse(&content)?;
        *stamp = Stamp::Written(modified);
        debug!(path = %self.path.display(), "loaded config file");
        Ok(Some(document))
    }

    fn current_modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).ok().and_then(|m| m.modified().ok())
    }

    fn access_denied(&self) -> XmlfigError {
        XmlfigError::AccessDenied {
            path: self.path.clone(),
        }
    }
}

impl fmt::Display for FileProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl DocumentProvider for FileProvider {
    fn load(&self) -> Result<Vec<Document>, XmlfigError> {
        Ok(vec![self.load_existing()?.unwrap_or_default()])
    }

    fn save(&self, document: &Document) -> Result<(), XmlfigError> {
        if self.is_read_only() {
            return Err(self.access_denied());
        }
        let xml = document.to_xml_string()?;
        let mut stamp = self.stamp.lock();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| XmlfigError::io(parent, e))?;
        }
        let mut file = File::create(&self.path).map_err(|e| XmlfigError::io(&self.path, e))?;
        file.write_all(xml.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| XmlfigError::io(&self.path, e))?;
        let modified = file
            .metadata()
            .map_err(|e| XmlfigError::io(&self.path, e))?
            .modified()
            .ok();
        *stamp = Stamp::Written(modified);
        info!(path = %self.path.display(), "saved config file");
        Ok(())
    }

    fn delete(&self) -> Result<(), XmlfigError> {
        if self.is_read_only() {
            return Err(self.access_denied());
        }
        let mut stamp = self.stamp.lock();
        match fs::remove_file(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "deleted config file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(XmlfigError::io(&self.path, e)),
        }
        *stamp = Stamp::Missing;
        Ok(())
    }

    fn can_delete(&self) -> bool {
        self.path.is_file() && !self.is_read_only()
    }

    fn is_read_only(&self) -> bool {
        fs::metadata(&self.path)
            .map(|m| m.permissions().readonly())
            .unwrap_or(false)
    }

    fn modified_since_load(&self) -> bool {
        match *self.stamp.lock() {
            Stamp::Unloaded => false,
            Stamp::Missing => self.path.exists(),
            Stamp::Written(seen) => self.current_modified() != seen,
        }
    }

    fn source_identifier(&self) -> String {
        self.path.display().to_string()
    }

    fn file_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Several configuration files read as one ordered sequence. Read-only.
#[derive(Debug)]
pub struct MultiFileProvider {
    files: Vec<FileProvider>,
}

impl MultiFileProvider {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            files: paths.into_iter().map(FileProvider::new).collect(),
        }
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(FileProvider::path)
    }

    fn not_supported(&self, operation: &'static str) -> XmlfigError {
        XmlfigError::NotSupported {
            provider: "multi-file provider".into(),
            operation,
        }
    }
}

impl fmt::Display for MultiFileProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.files.iter().map(ToString::to_string).collect();
        write!(f, "{}", names.join(", "))
    }
}

impl DocumentProvider for MultiFileProvider {
    fn initialize(&self) -> Result<(), XmlfigError> {
        self.files.iter().try_for_each(DocumentProvider::initialize)
    }

    fn load(&self) -> Result<Vec<Document>, XmlfigError> {
        let mut documents = Vec::with_capacity(self.files.len());
        for file in &self.files {
            if let Some(document) = file.load_existing()? {
                documents.push(document);
            }
        }
        debug!(files = self.files.len(), documents = documents.len(), "loaded config files");
        Ok(documents)
    }

    fn save(&self, _document: &Document) -> Result<(), XmlfigError> {
        Err(self.not_supported("save"))
    }

    fn delete(&self) -> Result<(), XmlfigError> {
        Err(self.not_supported("delete"))
    }

    fn can_delete(&self) -> bool {
        false
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn modified_since_load(&self) -> bool {
        self.files
            .iter()
            .fold(false, |changed, file| file.modified_since_load() || changed)
    }

    fn source_identifier(&self) -> String {
        self.files
            .iter()
            .map(FileProvider::source_identifier)
            .collect::<Vec<_>>()
            .join(IDENTIFIER_SEPARATOR)
    }
}

/// Forward the provider contract to an inner [`FileProvider`].
macro_rules! delegate_to_file {
    ($ty:ty) => {
        impl DocumentProvider for $ty {
            fn initialize(&self) -> Result<(), XmlfigError> {
                self.0.initialize()
            }
            fn load(&self) -> Result<Vec<Document>, XmlfigError> {
                self.0.load()
            }
            fn save(&self, document: &Document) -> Result<(), XmlfigError> {
                self.0.save(document)
            }
            fn delete(&self) -> Result<(), XmlfigError> {
                self.0.delete()
            }
            fn can_delete(&self) -> bool {
                self.0.can_delete()
            }
            fn is_read_only(&self) -> bool {
                self.0.is_read_only()
            }
            fn modified_since_load(&self) -> bool {
                self.0.modified_since_load()
            }
            fn source_identifier(&self) -> String {
                self.0.source_identifier()
            }
            fn file_path(&self) -> Option<&Path> {
                self.0.file_path()
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl std::ops::Deref for $ty {
            type Target = FileProvider;

            fn deref(&self) -> &FileProvider {
                &self.0
            }
        }
    };
}

/// The application's own config file, next to the running executable.
#[derive(Debug)]
pub struct DefaultFileProvider(FileProvider);

impl DefaultFileProvider {
    pub fn new() -> Result<Self, XmlfigError> {
        let exe = std::env::current_exe().map_err(|e| XmlfigError::io("<current executable>", e))?;
        Ok(Self::for_executable(exe))
    }

    /// The config file belonging to the executable at `exe`.
    pub fn for_executable(exe: impl Into<PathBuf>) -> Self {
        let mut path = exe.into().into_os_string();
        path.push(APP_CONFIG_EXTENSION);
        Self(FileProvider::new(path))
    }
}

delegate_to_file!(DefaultFileProvider);

/// Which per-user store a [`UserProfileProvider`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileScope {
    /// Follows the user across machines where the platform supports it.
    #[default]
    Roaming,
    Local,
}

/// Per-user config file in the platform config directory
/// (e.g. `~/.config/{app}/user.config` on Linux).
#[derive(Debug)]
pub struct UserProfileProvider(FileProvider);

impl UserProfileProvider {
    pub fn new(organization: &str, app_name: &str, scope: ProfileScope) -> Result<Self, XmlfigError> {
        let dirs = directories::ProjectDirs::from("", organization, app_name).ok_or_else(|| {
            XmlfigError::NoProfileDirectory {
                app_name: app_name.to_string(),
            }
        })?;
        let dir = match scope {
            ProfileScope::Roaming => dirs.config_dir(),
            ProfileScope::Local => dirs.config_local_dir(),
        };
        Ok(Self(FileProvider::new(dir.join(USER_CONFIG_FILE))))
    }
}

delegate_to_file!(UserProfileProvider);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::time::Duration;
    use tempfile::TempDir;

    const SERVER_DOC: &str =
        "<configuration><Server><Host>from-file</Host></Server></configuration>";

    fn backdate(path: &Path) {
        let past = SystemTime::now() - Duration::from_secs(3600);
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(past)
            .unwrap();
    }

    #[test]
    fn missing_file_yields_default_document() {
        let dir = TempDir::new().unwrap();
        let provider = FileProvider::new(dir.path().join("absent.config"));
        assert_eq!(provider.load().unwrap(), vec![Document::default()]);
        assert!(!provider.modified_since_load());
        assert!(!provider.can_delete());
    }

    #[test]
    fn load_parses_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.config");
        fs::write(&path, SERVER_DOC).unwrap();
        let docs = FileProvider::new(&path).load().unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].section("Server").is_some());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.config");
        fs::write(&path, "<configuration><Server>").unwrap();
        let err = FileProvider::new(&path).load().unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidDocument);
    }

    #[test]
    fn save_creates_parent_directories_and_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("app.config");
        let provider = FileProvider::new(&path);
        let doc = Document::parse(SERVER_DOC).unwrap();
        provider.save(&doc).unwrap();
        assert_eq!(provider.load().unwrap(), vec![doc]);
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("<?xml"));
    }

    #[test]
    fn own_save_is_not_staleness_but_foreign_save_is() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shared.config");
        fs::write(&path, SERVER_DOC).unwrap();
        backdate(&path);

        let first = FileProvider::new(&path);
        let second = FileProvider::new(&path);
        first.load().unwrap();
        second.load().unwrap();
        assert!(!first.modified_since_load());
        assert!(!second.modified_since_load());

        first.save(&Document::default()).unwrap();
        assert!(!first.modified_since_load());
        assert!(second.modified_since_load());

        second.load().unwrap();
        assert!(!second.modified_since_load());
    }

    #[test]
    fn file_appearing_after_missing_load_is_a_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("late.config");
        let provider = FileProvider::new(&path);
        provider.load().unwrap();
        fs::write(&path, SERVER_DOC).unwrap();
        assert!(provider.modified_since_load());
    }

    #[test]
    fn read_only_file_rejects_save_and_delete() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("locked.config");
        fs::write(&path, SERVER_DOC).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&path, perms.clone()).unwrap();

        let provider = FileProvider::new(&path);
        assert!(provider.is_read_only());
        assert!(!provider.can_delete());
        let err = provider.save(&Document::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::AccessDenied);
        let err = provider.delete().unwrap_err();
        assert!(matches!(err, XmlfigError::AccessDenied { .. }));
        assert!(path.exists());

        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        fs::set_permissions(&path, perms).unwrap();
    }

    #[test]
    fn delete_removes_file_and_tolerates_absence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.config");
        fs::write(&path, SERVER_DOC).unwrap();
        let provider = FileProvider::new(&path);
        assert!(provider.can_delete());
        provider.delete().unwrap();
        assert!(!path.exists());
        provider.delete().unwrap();
    }

    #[test]
    fn multi_file_concatenates_in_order_and_skips_missing() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.config");
        let b = dir.path().join("b.config");
        let missing = dir.path().join("missing.config");
        fs::write(&a, "<configuration><A/></configuration>").unwrap();
        fs::write(&b, "<configuration><B/></configuration>").unwrap();

        let provider = MultiFileProvider::new([&a, &missing, &b]);
        let docs = provider.load().unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].section("A").is_some());
        assert!(docs[1].section("B").is_some());

        assert!(provider.is_read_only());
        assert!(!provider.can_delete());
        assert_eq!(
            provider.save(&Document::default()).unwrap_err().code(),
            ErrorCode::NotSupported
        );
        assert_eq!(provider.delete().unwrap_err().code(), ErrorCode::NotSupported);
    }

    #[test]
    fn multi_file_identifier_joins_paths() {
        let provider = MultiFileProvider::new(["/etc/a.config", "/etc/b.config"]);
        assert_eq!(provider.source_identifier(), "/etc/a.config;/etc/b.config");
        assert_eq!(provider.paths().count(), 2);
    }

    #[test]
    fn multi_file_staleness_tracks_any_file() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.config");
        let b = dir.path().join("b.config");
        fs::write(&a, SERVER_DOC).unwrap();
        fs::write(&b, SERVER_DOC).unwrap();
        backdate(&a);
        backdate(&b);

        let provider = MultiFileProvider::new([&a, &b]);
        provider.load().unwrap();
        assert!(!provider.modified_since_load());
        FileProvider::new(&b).save(&Document::default()).unwrap();
        assert!(provider.modified_since_load());
    }

    #[test]
    fn default_provider_appends_config_extension() {
        let provider = DefaultFileProvider::for_executable("/opt/tool/bin/tool");
        assert_eq!(provider.path(), Path::new("/opt/tool/bin/tool.config"));
        assert_eq!(provider.source_identifier(), "/opt/tool/bin/tool.config");
        assert!(DefaultFileProvider::new().is_ok());
    }

    #[test]
    fn user_profile_provider_targets_user_config() {
        // Not every CI environment has a home directory.
        if let Ok(provider) = UserProfileProvider::new("acme", "xmlfig-test", ProfileScope::Local) {
            assert_eq!(provider.path().file_name().unwrap(), USER_CONFIG_FILE);
            assert!(provider.to_string().contains("xmlfig-test"));
        }
    }
}
