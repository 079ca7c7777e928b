//! Driver settings and persisted property values.
//!
//! A config file is an `<INDIDriver>` root holding one `new*Vector` per saved
//! property. Loading replays those commands as if a client had sent them.

use std::fs;
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use indiwire_codec::{CodecConfig, XmlElement};
use indiwire_property::emit::emit_new;
use indiwire_property::{
    parse_number, Permission, PropertyKind, PropertyUpdate, PropertyVector, SwitchState, PROTOCOL_VERSION,
};

use crate::error::ConfigError;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "INDICONFIG";

const ROOT_TAG: &str = "INDIDriver";
const DEFAULT_SUFFIX: &str = ".default";

type Result<T> = std::result::Result<T, ConfigError>;

/// Driver-side behavior knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    /// Version announced in `getProperties` and accepted from clients.
    pub protocol_version: String,
    /// Send non-fatal dispatch errors back to the client as `message`s.
    pub echo_errors_to_client: bool,
    /// Explicit config file; otherwise `INDICONFIG` or `~/.indi/<device>_config.xml`.
    pub config_path: Option<PathBuf>,
    pub codec: CodecConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            echo_errors_to_client: true,
            config_path: None,
            codec: CodecConfig::default(),
        }
    }
}

/// A driver config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Locate the config file for `device`.
    pub fn resolve(explicit: Option<&Path>, device: &str) -> Result<Self> {
        if let Some(path) = explicit {
            return Ok(Self::new(path));
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Ok(Self::new(path));
        }
        let home = std::env::var_os("HOME")
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConfigError::NoPath(device.to_string()))?;
        Ok(Self::new(
            PathBuf::from(home).join(".indi").join(format!("{device}_config.xml")),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the one-time default snapshot.
    pub fn default_path(&self) -> PathBuf {
        let mut path = self.path.clone().into_os_string();
        path.push(DEFAULT_SUFFIX);
        PathBuf::from(path)
    }

    /// Save the writable number, text and switch vectors of `device`.
    /// Returns how many vectors were written.
    pub fn save<'a>(&self, vectors: impl IntoIterator<Item = &'a PropertyVector>, device: &str) -> Result<usize> {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(format!("<{ROOT_TAG}>\n").as_bytes());
        let mut saved = 0;
        for vector in vectors.into_iter().filter(|v| v.device == device && is_persistent(v)) {
            emit_new(&mut buf, &PropertyUpdate::from_vector(vector));
            saved += 1;
        }
        buf.extend_from_slice(format!("</{ROOT_TAG}>\n").as_bytes());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.io(source))?;
        }
        fs::write(&self.path, &buf).map_err(|source| self.io(source))?;
        tracing::debug!(path = %self.path.display(), device, saved, "config saved");
        Ok(saved)
    }

    /// Stored commands for `device`, optionally narrowed to one property.
    pub fn load(&self, device: &str, property: Option<&str>) -> Result<Vec<XmlElement>> {
        let root = self.read_root()?;
        Ok(root
            .children()
            .iter()
            .filter(|e| e.tag().starts_with("new"))
            .filter(|e| e.attribute("device") == Some(device))
            .filter(|e| property.is_none() || e.attribute("name") == property)
            .cloned()
            .collect())
    }

    /// Remove the config file.
    pub fn purge(&self) -> Result<()> {
        fs::remove_file(&self.path).map_err(|source| self.io(source))
    }

    pub fn read_number(&self, device: &str, property: &str, element: &str) -> Result<f64> {
        let text = self.read_member(device, property, element, PropertyKind::Number)?;
        parse_number(&text).map_err(|err| ConfigError::Malformed {
            path: self.path.clone(),
            reason: err.to_string(),
        })
    }

    pub fn read_switch(&self, device: &str, property: &str, element: &str) -> Result<SwitchState> {
        let text = self.read_member(device, property, element, PropertyKind::Switch)?;
        text.parse().map_err(|err: indiwire_property::PropertyError| ConfigError::Malformed {
            path: self.path.clone(),
            reason: err.to_string(),
        })
    }

    pub fn read_text(&self, device: &str, property: &str, element: &str) -> Result<String> {
        self.read_member(device, property, element, PropertyKind::Text)
    }

    /// Name of the first switch saved as On in a switch vector.
    pub fn read_on_switch(&self, device: &str, property: &str) -> Result<String> {
        let vector = self.find_vector(device, property, PropertyKind::Switch)?;
        vector
            .children()
            .iter()
            .find(|m| m.text().starts_with("On"))
            .and_then(|m| m.attribute("name"))
            .map(str::to_string)
            .ok_or_else(|| ConfigError::NotFound {
                key: format!("{device}.{property}"),
            })
    }

    /// Copy the config file to its `.default` sibling unless that already
    /// exists. Returns true when a copy was made.
    pub fn save_default(&self) -> Result<bool> {
        let target = self.default_path();
        if target.exists() {
            return Ok(false);
        }
        fs::copy(&self.path, &target).map_err(|source| self.io(source))?;
        Ok(true)
    }

    fn read_root(&self) -> Result<XmlElement> {
        let bytes = fs::read(&self.path).map_err(|source| self.io(source))?;
        let root = XmlElement::parse(&bytes).map_err(|err| ConfigError::Malformed {
            path: self.path.clone(),
            reason: err.to_string(),
        })?;
        if root.tag() != ROOT_TAG {
            return Err(ConfigError::Malformed {
                path: self.path.clone(),
                reason: format!("root element is <{}>, expected <{ROOT_TAG}>", root.tag()),
            });
        }
        Ok(root)
    }

    fn find_vector(&self, device: &str, property: &str, kind: PropertyKind) -> Result<XmlElement> {
        let tag = format!("new{kind}Vector");
        self.read_root()?
            .children()
            .iter()
            .find(|e| e.tag() == tag && e.attribute("device") == Some(device) && e.attribute("name") == Some(property))
            .cloned()
            .ok_or_else(|| ConfigError::NotFound {
                key: format!("{device}.{property}"),
            })
    }

    fn read_member(&self, device: &str, property: &str, element: &str, kind: PropertyKind) -> Result<String> {
        let vector = self.find_vector(device, property, kind)?;
        vector
            .children()
            .iter()
            .find(|m| m.attribute("name") == Some(element))
            .map(|m| m.text().to_string())
            .ok_or_else(|| ConfigError::NotFound {
                key: format!("{device}.{property}.{element}"),
            })
    }

    fn io(&self, source: std::io::Error) -> ConfigError {
        ConfigError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn is_persistent(vector: &PropertyVector) -> bool {
    vector.permission != Permission::ReadOnly
        && matches!(vector.kind(), PropertyKind::Number | PropertyKind::Text | PropertyKind::Switch)
}
