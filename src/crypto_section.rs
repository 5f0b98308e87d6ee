//! Persisting which crypto provider a config source uses.
//!
//! The provider's registered name is stored encrypted with the context's
//! crypto provider, so the configured algorithm does not appear in the
//! document. Key material is never stored; the provider is rebuilt from the
//! [`TypeRegistry`] factory on read.

use std::sync::Arc;

use tracing::debug;

use crate::crypto::CryptoProvider;
use crate::document::Element;
use crate::error::{ConfigError, ErrorCode};
use crate::mapping::MappingContext;
use crate::reader::SectionReader;
use crate::registry::TypeRegistry;
use crate::section::{ConfigSection, Handled, SectionHandler, SettingDescriptor};
use crate::writer::SectionWriter;

const PROVIDER_ELEMENT: &str = "Provider";

/// The crypto provider configured for a config source, if any.
#[derive(Debug, Clone, Default)]
pub struct CryptoSection {
    provider_type: Option<String>,
    provider: Option<Arc<dyn CryptoProvider>>,
}

impl CryptoSection {
    /// Configure the provider registered as `name`.
    pub fn configured(name: &str, types: &TypeRegistry) -> Result<Self, ConfigError> {
        let provider = types.create_crypto(name).ok_or_else(|| {
            ConfigError::invalid_type(format!("'{name}' is not a registered crypto provider"))
        })?;
        Ok(Self {
            provider_type: Some(name.to_string()),
            provider: Some(provider),
        })
    }

    pub fn provider_type(&self) -> Option<&str> {
        self.provider_type.as_deref()
    }

    pub fn provider(&self) -> Option<Arc<dyn CryptoProvider>> {
        self.provider.clone()
    }
}

impl ConfigSection for CryptoSection {
    const NAME: &'static str = "CryptoProvider";

    fn handler() -> Option<Box<dyn SectionHandler<Self>>> {
        Some(Box::new(CryptoSectionHandler))
    }

    fn read_settings(&mut self, _reader: &mut SectionReader<'_>) {}

    fn write_settings(&self, _writer: &mut SectionWriter<'_>) {}

    fn settings() -> Vec<SettingDescriptor> {
        vec![SettingDescriptor::new(PROVIDER_ELEMENT).encrypted()]
    }
}

pub struct CryptoSectionHandler;

fn creation_failed(message: impl Into<String>) -> ConfigError {
    ConfigError::new(ErrorCode::CryptographyProviderCreationFailed, message)
}

impl SectionHandler<CryptoSection> for CryptoSectionHandler {
    fn read_section(&self, element: &Element, ctx: &MappingContext<'_>) -> Handled<CryptoSection> {
        let payload = element
            .child(PROVIDER_ELEMENT)
            .and_then(Element::text)
            .map(str::trim)
            .unwrap_or_default();
        if payload.is_empty() {
            debug!(section = %element.name, "no crypto provider configured");
            return Handled::ok(CryptoSection::default());
        }

        let Some(crypto) = ctx.crypto else {
            return Handled::fail(creation_failed(
                "crypto provider type is encrypted but no crypto provider is configured",
            ));
        };
        let Some(name) = crypto.decrypt(payload) else {
            return Handled::fail(creation_failed(
                "crypto provider type could not be decrypted",
            ));
        };
        match ctx.types.create_crypto(&name) {
            Some(provider) => Handled::ok(CryptoSection {
                provider_type: Some(name),
                provider: Some(provider),
            }),
            None => Handled::fail(creation_failed(format!(
                "'{name}' is not a registered crypto provider"
            ))),
        }
    }

    fn write_section(
        &self,
        name: &str,
        value: &CryptoSection,
        ctx: &MappingContext<'_>,
    ) -> Handled<Element> {
        let mut element = Element::new(name);
        let Some(provider_type) = value.provider_type() else {
            return Handled::ok(element);
        };
        if !ctx.types.has_crypto(provider_type) {
            return Handled::fail(ConfigError::invalid_type(format!(
                "'{provider_type}' cannot be instantiated as a crypto provider"
            )));
        }
        let Some(crypto) = ctx.crypto else {
            return Handled::fail(ConfigError::invalid_type(
                "crypto provider type must be encrypted but no crypto provider is configured",
            ));
        };
        element.push_child(Element::with_text(
            PROVIDER_ELEMENT,
            crypto.encrypt(provider_type),
        ));
        Handled::ok(element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{FixedKeyProvider, PasswordProvider};
    use crate::mapping::{read_section, write_section};

    fn types() -> TypeRegistry {
        let mut types = TypeRegistry::new();
        types.register_crypto("Vault", || {
            Arc::new(PasswordProvider::new("vault-pw").iterations(10).named("Vault"))
                as Arc<dyn CryptoProvider>
        });
        types
    }

    fn master_key() -> FixedKeyProvider {
        FixedKeyProvider::new([5; 32], [6; 32])
    }

    #[test]
    fn provider_type_round_trips_encrypted() {
        let types = types();
        let key = master_key();
        let ctx = MappingContext::new(&types).with_crypto(&key);

        let section = CryptoSection::configured("Vault", &types).unwrap();
        let element = write_section(CryptoSection::NAME, &section, &ctx)
            .unwrap()
            .value;
        let xml = element.to_xml_string().unwrap();
        assert!(!xml.contains("Vault"), "{xml}");

        let back = read_section::<CryptoSection>(&element, &ctx).unwrap().value;
        assert_eq!(back.provider_type(), Some("Vault"));
        let provider = back.provider().unwrap();
        assert_eq!(provider.name(), "Vault");
        assert_eq!(provider.decrypt(&provider.encrypt("x")).as_deref(), Some("x"));
    }

    #[test]
    fn missing_or_empty_node_means_no_provider() {
        let types = types();
        let key = master_key();
        let ctx = MappingContext::new(&types).with_crypto(&key);
        for xml in ["<CryptoProvider/>", "<CryptoProvider><Other>x</Other></CryptoProvider>"] {
            let element = Element::parse(xml).unwrap();
            let back = read_section::<CryptoSection>(&element, &ctx).unwrap();
            assert!(back.is_clean());
            assert!(back.value.provider().is_none());
        }
    }

    #[test]
    fn garbage_payload_fails_provider_creation() {
        let types = types();
        let key = master_key();
        let ctx = MappingContext::new(&types).with_crypto(&key);
        let element = Element::parse(
            "<CryptoProvider><Provider>bm90IGEgcmVhbCBwYXlsb2Fk</Provider></CryptoProvider>",
        )
        .unwrap();
        let err = read_section::<CryptoSection>(&element, &ctx).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CryptographyProviderCreationFailed);
    }

    #[test]
    fn unregistered_name_after_decrypt_fails_provider_creation() {
        let types = types();
        let key = master_key();
        let ctx = MappingContext::new(&types).with_crypto(&key);
        let element = Element::parse(&format!(
            "<CryptoProvider><Provider>{}</Provider></CryptoProvider>",
            key.encrypt("Retired")
        ))
        .unwrap();
        let err = read_section::<CryptoSection>(&element, &ctx).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CryptographyProviderCreationFailed);
    }

    #[test]
    fn writing_unknown_provider_type_is_invalid() {
        let types = types();
        let key = master_key();
        let ctx = MappingContext::new(&types).with_crypto(&key);
        let section = CryptoSection {
            provider_type: Some("Rot13".into()),
            provider: None,
        };
        let err = write_section(CryptoSection::NAME, &section, &ctx).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidConfigType);

        assert!(CryptoSection::configured("Rot13", &types).is_err());
    }

    #[test]
    fn writing_without_context_crypto_is_invalid() {
        let types = types();
        let ctx = MappingContext::new(&types);
        let section = CryptoSection::configured("Vault", &types).unwrap();
        let err = write_section(CryptoSection::NAME, &section, &ctx).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidConfigType);
    }
}
