use proptest::prelude::*;
use sdk::errors::{RegistryError, RegistryErrorExt};
use sdk::types::{parse_registry_key, registry_key, ContentId, PluginDescriptor};

// Every error variant carries a non-empty hint that does not echo caller input.
proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "[a-z/]{8,32}") {
        let errs = vec![
            RegistryError::Store(error_str.clone()),
            RegistryError::NotFound(error_str.clone()),
            RegistryError::Serialization(error_str.clone()),
            RegistryError::Bootstrap(error_str.clone()),
            RegistryError::DeadlineExceeded(error_str.clone()),
            RegistryError::pin(error_str.clone(), error_str.clone()),
            RegistryError::registration(error_str.clone(), RegistryError::Store(error_str.clone())),
            RegistryError::io(
                std::path::PathBuf::from(&error_str),
                std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            ),
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            prop_assert!(!hint.contains(&error_str));
        }
    }
}

// Keys built from valid names and versions parse back to the same pair.
proptest! {
    #[test]
    fn test_registry_key_parse(
        name in "[a-z][a-z0-9_-]{0,20}",
        version in "[0-9]+\\.[0-9]+(\\.[0-9]+)?(-[a-z0-9.]+)?",
    ) {
        let key = registry_key(&name, &version);
        prop_assert!(key.starts_with("plugin:"));
        prop_assert_eq!(parse_registry_key(&key), Some((name.as_str(), version.as_str())));
    }
}

// Stored descriptors tolerate fields added by newer writers.
proptest! {
    #[test]
    fn test_descriptor_ignores_added_fields(
        name in "[a-z]{1,12}",
        cid in "bafy[a-z2-7]{20}",
        extra in "[a-z_]{1,10}",
    ) {
        let json = format!(
            r#"{{"name":"{}","version":"1.0","content_id":"{}","path":"/tmp/p","x_{}":42}}"#,
            name, cid, extra
        );
        let descriptor = PluginDescriptor::from_json(&json).unwrap();
        prop_assert_eq!(descriptor.content_id, ContentId::new(cid));
        prop_assert_eq!(descriptor.name, name);
    }
}
