use std::io::Write;
use std::sync::Arc;

use indiwire_codec::MessageWriter;
use indiwire_property::emit::{
    emit_definition, emit_delete, emit_enable_blob, emit_get_properties, emit_limits, emit_message,
    emit_update_wrapped,
};
use indiwire_property::{
    BlobPolicy, BlobValue, PropertyError, PropertyKind, PropertyRegistry, PropertyState, PropertyUpdate,
    PropertyVector, Registration, SwitchState,
};

use crate::config::{ConfigStore, DriverConfig};
use crate::error::{DispatchError, Result};
use crate::snoop::SnoopRouter;

/// A driver's side of one connection: its registered properties and the
/// outbound message stream.
///
/// Every message the driver emits goes through this session, so writes are
/// never interleaved.
pub struct DriverSession<W> {
    registry: PropertyRegistry,
    writer: MessageWriter<W>,
    snoop: Arc<SnoopRouter>,
    config: DriverConfig,
    name: String,
}

impl<W: Write> DriverSession<W> {
    /// `name` identifies this driver as a snoop subscriber.
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self::with_config(name, writer, DriverConfig::default())
    }

    pub fn with_config(name: impl Into<String>, writer: W, config: DriverConfig) -> Self {
        Self {
            registry: PropertyRegistry::new(),
            writer: MessageWriter::with_config(writer, config.codec.clone()),
            snoop: Arc::new(SnoopRouter::new()),
            config,
            name: name.into(),
        }
    }

    /// Share an existing snoop router.
    pub fn with_snoop_router(mut self, router: Arc<SnoopRouter>) -> Self {
        self.snoop = router;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn registry(&self) -> &PropertyRegistry {
        &self.registry
    }

    pub fn snoop_router(&self) -> &Arc<SnoopRouter> {
        &self.snoop
    }

    pub fn get(&self, device: &str, name: &str) -> Option<&PropertyVector> {
        self.registry.get(device, name)
    }

    /// Registered vector for in-place changes before a [`publish`](Self::publish).
    pub fn vector_mut(&mut self, device: &str, name: &str) -> Result<&mut PropertyVector> {
        self.registry
            .get_mut(device, name)
            .ok_or_else(|| not_found(device, name))
    }

    pub fn writer(&self) -> &W {
        self.writer.get_ref()
    }

    pub fn writer_mut(&mut self) -> &mut W {
        self.writer.get_mut()
    }

    pub fn into_writer(self) -> W {
        self.writer.into_inner()
    }

    /// Register a vector and announce it with `def*Vector`.
    ///
    /// A duplicate definition leaves the registered vector untouched and
    /// announces it again.
    pub fn define(&mut self, vector: PropertyVector) -> Result<Registration> {
        self.define_with_message(vector, None)
    }

    pub fn define_with_message(&mut self, vector: PropertyVector, message: Option<&str>) -> Result<Registration> {
        let (device, name) = (vector.device.clone(), vector.name.clone());
        let registration = self.registry.define(vector);
        if registration == Registration::Duplicate {
            tracing::debug!(device = %device, property = %name, "duplicate definition, re-announcing");
        }
        self.send_definition(&device, &name, message)?;
        Ok(registration)
    }

    /// Register a vector without announcing it. Clients see it on their
    /// next `getProperties`, including one scoped to this property.
    pub fn register(&mut self, vector: PropertyVector) -> Registration {
        self.registry.define(vector)
    }

    /// Re-emit the definition of a registered vector.
    pub fn send_definition(&mut self, device: &str, name: &str, message: Option<&str>) -> Result<()> {
        let vector = self.registry.get(device, name).ok_or_else(|| not_found(device, name))?;
        self.writer
            .send_with(|buf| emit_definition(buf, vector, message))?;
        Ok(())
    }

    /// Publish the current values of a vector as `set*Vector`.
    pub fn publish(&mut self, device: &str, name: &str, message: Option<&str>) -> Result<()> {
        let vector = self.registry.get(device, name).ok_or_else(|| not_found(device, name))?;
        let mut update = PropertyUpdate::from_vector(vector);
        update.message = message.map(str::to_string);
        let width = self.config.codec.blob_line_width;
        self.writer
            .send_with(|buf| emit_update_wrapped(buf, &update, width))?;
        Ok(())
    }

    /// Publish a number vector's values together with min, max and step.
    pub fn publish_limits(&mut self, device: &str, name: &str, message: Option<&str>) -> Result<()> {
        let vector = self.registry.get(device, name).ok_or_else(|| not_found(device, name))?;
        if vector.kind() != PropertyKind::Number {
            return Err(PropertyError::KindMismatch {
                device: device.to_string(),
                name: name.to_string(),
                expected: PropertyKind::Number,
                found: vector.kind(),
            }
            .into());
        }
        self.writer.send_with(|buf| emit_limits(buf, vector, message))?;
        Ok(())
    }

    /// Delete one vector, or every vector of the device when `name` is `None`.
    pub fn delete(&mut self, device: &str, name: Option<&str>, message: Option<&str>) -> Result<()> {
        match name {
            Some(name) => self.registry.delete(device, name)?,
            None => {
                let removed = self.registry.remove_device(device);
                tracing::debug!(device, removed, "device deleted");
            }
        }
        self.writer
            .send_with(|buf| emit_delete(buf, device, name, message))?;
        Ok(())
    }

    /// Send a free-form `message`, optionally bound to a device.
    pub fn message(&mut self, device: Option<&str>, text: &str) -> Result<()> {
        self.writer.send_with(|buf| emit_message(buf, device, text))?;
        Ok(())
    }

    /// Ask the hub for another device's traffic.
    pub fn snoop_device(&mut self, device: &str, property: Option<&str>) -> Result<()> {
        self.snoop.subscribe(&self.name, device, property)?;
        let version = self.config.protocol_version.as_str();
        self.writer
            .send_with(|buf| emit_get_properties(buf, version, Some(device), property))?;
        Ok(())
    }

    /// Set which snooped BLOBs are forwarded.
    pub fn snoop_blobs(&mut self, device: &str, property: Option<&str>, policy: BlobPolicy) -> Result<()> {
        self.snoop.set_blob_policy(&self.name, device, property, policy)?;
        self.writer
            .send_with(|buf| emit_enable_blob(buf, device, property, policy))?;
        Ok(())
    }

    /// Apply client numbers atomically. On failure the vector is left
    /// unchanged in Alert state.
    pub fn apply_numbers<S: AsRef<str>>(&mut self, device: &str, name: &str, values: &[(S, f64)]) -> Result<()> {
        self.vector_mut(device, name)?.apply_numbers(values)?;
        Ok(())
    }

    pub fn apply_switches<S: AsRef<str>>(
        &mut self,
        device: &str,
        name: &str,
        states: &[(S, SwitchState)],
    ) -> Result<()> {
        self.vector_mut(device, name)?.apply_switches(states)?;
        Ok(())
    }

    /// Apply texts best effort; unknown names come back as warnings.
    pub fn apply_texts<S: AsRef<str>, T: AsRef<str>>(
        &mut self,
        device: &str,
        name: &str,
        values: &[(S, T)],
    ) -> Result<Vec<PropertyError>> {
        Ok(self.vector_mut(device, name)?.apply_texts(values)?)
    }

    pub fn apply_blobs<S: AsRef<str>>(
        &mut self,
        device: &str,
        name: &str,
        values: &[(S, BlobValue)],
    ) -> Result<Vec<PropertyError>> {
        Ok(self.vector_mut(device, name)?.apply_blobs(values)?)
    }

    /// Apply a client command and answer it.
    ///
    /// On success the vector goes to Ok and is published. When the command is
    /// rejected it goes to Alert and is published with the reason.
    pub fn accept(&mut self, update: &PropertyUpdate) -> Result<()> {
        let (device, name) = (update.device.as_str(), update.name.as_str());
        let outcome = match update.kind {
            PropertyKind::Number => self.apply_numbers(device, name, &update.numbers()).map(|()| Vec::new()),
            PropertyKind::Switch => self.apply_switches(device, name, &update.switches()).map(|()| Vec::new()),
            PropertyKind::Text => self.apply_texts(device, name, &update.texts()),
            PropertyKind::Blob => self.apply_blobs(device, name, &update.blobs()),
            PropertyKind::Light => Err(DispatchError::MalformedMessage(format!(
                "lights of {device}.{name} cannot be commanded"
            ))),
        };

        match outcome {
            Ok(warnings) => {
                for warning in &warnings {
                    tracing::warn!(device, property = name, error = %warning, "member ignored");
                }
                self.vector_mut(device, name)?.state = PropertyState::Ok;
                self.publish(device, name, None)
            }
            Err(DispatchError::Property(err)) => {
                tracing::warn!(device, property = name, error = %err, "command rejected");
                self.vector_mut(device, name)?.state = PropertyState::Alert;
                self.publish(device, name, Some(&err.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    /// Config store for `device`, honoring [`DriverConfig::config_path`].
    pub fn config_store(&self, device: &str) -> Result<ConfigStore> {
        Ok(ConfigStore::resolve(self.config.config_path.as_deref(), device)?)
    }

    /// Persist the writable properties of `device`.
    pub fn save_config(&mut self, device: &str) -> Result<usize> {
        let store = self.config_store(device)?;
        let saved = store.save(self.registry.iter(), device)?;
        Ok(saved)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

fn not_found(device: &str, name: &str) -> DispatchError {
    DispatchError::PropertyNotFound {
        device: device.to_string(),
        name: name.to_string(),
    }
}
