//! Device descriptors.
//!
//! A [`Device`] is what a session needs to know about the remote end:
//! credentials, an optional hostname for diagnostics, and the prompt symbol
//! its shell prints. Sessions share a device with the caller through an
//! `Arc` and never modify it.

mod registry;

use std::fmt;

use secrecy::SecretString;
use serde::Deserialize;

pub use registry::DeviceRegistry;

/// Credentials and prompt of a remote device.
#[derive(Debug, Deserialize)]
pub struct Device {
    /// Device family, e.g. `linux` or `oneos`.
    pub kind: String,

    pub username: String,

    pub password: SecretString,

    #[serde(default)]
    pub hostname: Option<String>,

    /// Text the device's shell prints when ready for a command.
    pub default_prompt_symbol: String,
}

impl Device {
    pub fn new(
        kind: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        default_prompt_symbol: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            username: username.into(),
            password: SecretString::from(password.into()),
            hostname: None,
            default_prompt_symbol: default_prompt_symbol.into(),
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Hostname for log and error messages.
    pub fn display_hostname(&self) -> &str {
        self.hostname.as_deref().unwrap_or("unknown")
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.username, self.display_hostname(), self.kind)
    }
}

/// How a profile derives a device hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostnameRule {
    /// No hostname.
    None,
    /// Always this name.
    Fixed(String),
    /// `<kind>-<username>`, e.g. `linux-user`.
    KindAndUser,
}

/// Defaults for one family of devices.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    /// Registry key.
    pub name: String,

    /// Kind given to devices built from this profile.
    pub kind: String,

    pub default_username: String,

    /// Factory password of lab images, not a secret.
    pub default_password: String,

    pub default_prompt_symbol: String,

    pub hostname: HostnameRule,
}

impl DeviceProfile {
    /// A profile whose registry key and device kind are the same.
    pub fn new(name: impl Into<String>, prompt_symbol: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            kind: name.clone(),
            name,
            default_username: String::new(),
            default_password: String::new(),
            default_prompt_symbol: prompt_symbol.into(),
            hostname: HostnameRule::None,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.default_username = username.into();
        self.default_password = password.into();
        self
    }

    pub fn with_hostname(mut self, rule: HostnameRule) -> Self {
        self.hostname = rule;
        self
    }

    /// Build a device, falling back to the profile defaults for missing or
    /// empty credentials.
    pub fn device(&self, username: Option<&str>, password: Option<&str>) -> Device {
        let username = username
            .filter(|u| !u.is_empty())
            .unwrap_or(self.default_username.as_str());
        let password = password
            .filter(|p| !p.is_empty())
            .unwrap_or(self.default_password.as_str());

        let device = Device::new(
            self.kind.as_str(),
            username,
            password,
            self.default_prompt_symbol.as_str(),
        );
        match &self.hostname {
            HostnameRule::None => device,
            HostnameRule::Fixed(name) => device.with_hostname(name.as_str()),
            HostnameRule::KindAndUser => device.with_hostname(format!("{}-{}", self.kind, username)),
        }
    }
}
