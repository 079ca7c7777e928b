use std::collections::HashMap;

use crate::error::{PropertyError, Result};
use crate::model::{Permission, PropertyVector};

/// Outcome of [`PropertyRegistry::define`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// First definition of this device/name pair.
    New,
    /// The pair was deleted earlier and is now defined again.
    Revived,
    /// The pair is already registered; the registry is unchanged.
    Duplicate,
}

/// A registry slot. Deleted vectors keep their slot with `registered == false`.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    pub vector: PropertyVector,
    pub registered: bool,
}

/// Insertion-ordered property vectors keyed by device and name.
#[derive(Debug, Clone, Default)]
pub struct PropertyRegistry {
    entries: Vec<RegistryEntry>,
    index: HashMap<String, HashMap<String, usize>>,
}

impl PropertyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a vector.
    pub fn define(&mut self, vector: PropertyVector) -> Registration {
        if let Some(slot) = self.slot(&vector.device, &vector.name) {
            let entry = &mut self.entries[slot];
            if entry.registered {
                return Registration::Duplicate;
            }
            entry.vector = vector;
            entry.registered = true;
            return Registration::Revived;
        }

        let slot = self.entries.len();
        self.index
            .entry(vector.device.clone())
            .or_default()
            .insert(vector.name.clone(), slot);
        self.entries.push(RegistryEntry {
            vector,
            registered: true,
        });
        Registration::New
    }

    /// Mark a vector unregistered. Its slot is kept for a later revival.
    pub fn delete(&mut self, device: &str, name: &str) -> Result<()> {
        match self.slot(device, name) {
            Some(slot) if self.entries[slot].registered => {
                self.entries[slot].registered = false;
                Ok(())
            }
            _ => Err(PropertyError::PropertyNotFound {
                device: device.to_string(),
                name: name.to_string(),
            }),
        }
    }

    /// Drop every slot of a device. Returns how many registered vectors went away.
    pub fn remove_device(&mut self, device: &str) -> usize {
        if self.index.remove(device).is_none() {
            return 0;
        }
        let removed = self
            .entries
            .iter()
            .filter(|e| e.vector.device == device && e.registered)
            .count();
        self.entries.retain(|e| e.vector.device != device);
        self.reindex();
        removed
    }

    pub fn get(&self, device: &str, name: &str) -> Option<&PropertyVector> {
        self.entry(device, name)
            .filter(|e| e.registered)
            .map(|e| &e.vector)
    }

    pub fn get_mut(&mut self, device: &str, name: &str) -> Option<&mut PropertyVector> {
        let slot = self.slot(device, name)?;
        let entry = &mut self.entries[slot];
        entry.registered.then_some(&mut entry.vector)
    }

    pub fn contains(&self, device: &str, name: &str) -> bool {
        self.get(device, name).is_some()
    }

    /// The slot for a pair, registered or not.
    pub fn entry(&self, device: &str, name: &str) -> Option<&RegistryEntry> {
        self.slot(device, name).map(|slot| &self.entries[slot])
    }

    /// Registered vectors in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &PropertyVector> {
        self.entries
            .iter()
            .filter(|e| e.registered)
            .map(|e| &e.vector)
    }

    pub fn iter_device<'a>(&'a self, device: &'a str) -> impl Iterator<Item = &'a PropertyVector> + 'a {
        self.iter().filter(move |v| v.device == device)
    }

    /// Devices with at least one registered vector, in first-seen order.
    pub fn devices(&self) -> Vec<&str> {
        let mut devices: Vec<&str> = Vec::new();
        for vector in self.iter() {
            if !devices.contains(&vector.device.as_str()) {
                devices.push(&vector.device);
            }
        }
        devices
    }

    /// Number of registered vectors.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.registered).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn permission(&self, device: &str, name: &str) -> Option<Permission> {
        self.get(device, name).map(|v| v.permission)
    }

    fn slot(&self, device: &str, name: &str) -> Option<usize> {
        self.index.get(device)?.get(name).copied()
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (slot, entry) in self.entries.iter().enumerate() {
            self.index
                .entry(entry.vector.device.clone())
                .or_default()
                .insert(entry.vector.name.clone(), slot);
        }
    }
}
