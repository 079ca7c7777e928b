use chrono::NaiveDateTime;
use indiwire_property::{PropertyKind, PropertyRegistry, PropertyVector};

/// A remote device as reconstructed from the message stream.
#[derive(Debug, Clone)]
pub struct Device {
    name: String,
    properties: PropertyRegistry,
    messages: Vec<String>,
}

impl Device {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: PropertyRegistry::new(),
            messages: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> impl Iterator<Item = &PropertyVector> {
        self.properties.iter()
    }

    pub fn property(&self, name: &str) -> Option<&PropertyVector> {
        self.properties.get(&self.name, name)
    }

    pub fn number(&self, name: &str) -> Option<&PropertyVector> {
        self.property_of(name, PropertyKind::Number)
    }

    pub fn text(&self, name: &str) -> Option<&PropertyVector> {
        self.property_of(name, PropertyKind::Text)
    }

    pub fn switch(&self, name: &str) -> Option<&PropertyVector> {
        self.property_of(name, PropertyKind::Switch)
    }

    pub fn light(&self, name: &str) -> Option<&PropertyVector> {
        self.property_of(name, PropertyKind::Light)
    }

    pub fn blob(&self, name: &str) -> Option<&PropertyVector> {
        self.property_of(name, PropertyKind::Blob)
    }

    /// Number of defined properties.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Message log, oldest first. Each entry reads `<timestamp>: <text>`.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn message(&self, index: usize) -> Option<&str> {
        self.messages.get(index).map(String::as_str)
    }

    pub fn last_message(&self) -> Option<&str> {
        self.messages.last().map(String::as_str)
    }

    pub(crate) fn registry(&self) -> &PropertyRegistry {
        &self.properties
    }

    pub(crate) fn registry_mut(&mut self) -> &mut PropertyRegistry {
        &mut self.properties
    }

    /// Append a log entry and return its index.
    pub(crate) fn push_message(&mut self, entry: String) -> usize {
        self.messages.push(entry);
        self.messages.len() - 1
    }

    fn property_of(&self, name: &str, kind: PropertyKind) -> Option<&PropertyVector> {
        self.property(name).filter(|p| p.kind() == kind)
    }
}

/// Split a log entry into its timestamp and text.
///
/// The timestamp is `None` when the prefix is not an INDI timestamp
/// (`YYYY-MM-DDTHH:MM:SS`, optionally with fractional seconds).
pub fn split_message(entry: &str) -> (Option<NaiveDateTime>, &str) {
    match entry.split_once(": ") {
        Some((stamp, text)) => match NaiveDateTime::parse_from_str(stamp, "%Y-%m-%dT%H:%M:%S%.f") {
            Ok(time) => (Some(time), text),
            Err(_) => (None, entry),
        },
        None => (None, entry),
    }
}
