//! Registry of device profiles.

use std::sync::LazyLock;

use indexmap::IndexMap;

use super::{Device, DeviceProfile, HostnameRule};
use crate::error::{DeviceError, Result};

/// Shared read-only registry with the built-in profiles.
static BUILTIN: LazyLock<DeviceRegistry> = LazyLock::new(DeviceRegistry::with_builtin);

/// Registry for device profiles, kept in registration order.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    profiles: IndexMap<String, DeviceProfile>,
}

impl DeviceRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            profiles: IndexMap::new(),
        }
    }

    /// A registry holding the `linux`, `oneos` and `radius` profiles.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for profile in builtin_profiles() {
            registry.profiles.insert(profile.name.clone(), profile);
        }
        registry
    }

    /// The process-wide built-in registry, created on first use.
    ///
    /// Callers needing extra profiles build their own registry with
    /// [`DeviceRegistry::with_builtin`] and register into it.
    pub fn builtin() -> &'static DeviceRegistry {
        &BUILTIN
    }

    /// Register a profile.
    pub fn register(&mut self, profile: DeviceProfile) -> Result<()> {
        if self.profiles.contains_key(&profile.name) {
            return Err(DeviceError::AlreadyRegistered {
                name: profile.name.clone(),
            }
            .into());
        }
        self.profiles.insert(profile.name.clone(), profile);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&DeviceProfile> {
        self.profiles.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    /// Registered profile names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    /// Build a device from the named profile.
    pub fn create_device(
        &self,
        name: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<Device> {
        let profile = self.get(name).ok_or_else(|| DeviceError::UnknownKind {
            name: name.to_string(),
        })?;
        Ok(profile.device(username, password))
    }
}

fn builtin_profiles() -> [DeviceProfile; 3] {
    // The prompt changes to '#' when logged in as root.
    let linux = DeviceProfile::new("linux", "$")
        .with_credentials("user", "user")
        .with_hostname(HostnameRule::KindAndUser);

    let oneos = DeviceProfile::new("oneos", "#")
        .with_credentials("admin", "admin")
        .with_hostname(HostnameRule::Fixed("localhost".to_string()));

    let radius = DeviceProfile::new("radius", "$")
        .with_kind("linux")
        .with_credentials("user", "user")
        .with_hostname(HostnameRule::Fixed("radius-server".to_string()));

    [linux, oneos, radius]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_builtin_profiles() {
        let registry = DeviceRegistry::builtin();
        assert_eq!(registry.names().collect::<Vec<_>>(), ["linux", "oneos", "radius"]);

        let router = registry.create_device("oneos", None, None).unwrap();
        assert_eq!(router.kind, "oneos");
        assert_eq!(router.username, "admin");
        assert_eq!(router.default_prompt_symbol, "#");
        assert_eq!(router.hostname.as_deref(), Some("localhost"));
    }

    #[test]
    fn test_radius_is_a_linux_device() {
        let radius = DeviceRegistry::builtin()
            .create_device("radius", Some("radius_admin"), Some("secret"))
            .unwrap();
        assert_eq!(radius.kind, "linux");
        assert_eq!(radius.username, "radius_admin");
        assert_eq!(radius.default_prompt_symbol, "$");
        assert_eq!(radius.hostname.as_deref(), Some("radius-server"));
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = DeviceRegistry::with_builtin();
        let err = registry
            .register(DeviceProfile::new("linux", "$"))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Device(DeviceError::AlreadyRegistered { ref name }) if name == "linux"
        ));

        registry
            .register(DeviceProfile::new("junos", ">").with_credentials("root", "juniper"))
            .unwrap();
        let device = registry.create_device("junos", None, None).unwrap();
        assert_eq!(device.username, "root");
        assert!(device.hostname.is_none());
    }

    #[test]
    fn test_unknown_kind() {
        let err = DeviceRegistry::new()
            .create_device("cisco", None, None)
            .unwrap_err();
        assert!(matches!(err, Error::Device(DeviceError::UnknownKind { .. })));
    }
}
