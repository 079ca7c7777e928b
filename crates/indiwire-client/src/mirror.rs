use std::io::{Read, Write};

use bytes::{Bytes, BytesMut};
use indexmap::IndexMap;
use indiwire_codec::{ElementReader, MessageWriter, XmlElement};
use indiwire_property::emit::{emit_enable_blob, emit_get_properties, emit_new, timestamp_now};
use indiwire_property::{
    parse_definition, parse_update, BlobPolicy, BlobValue, ElementValue, MessageTag, NumberValue, PropertyError,
    PropertyKind, PropertyState, PropertyUpdate, Registration, SwitchState,
};

use crate::config::ClientConfig;
use crate::device::Device;
use crate::error::{ClientError, Result};
use crate::observer::MirrorObserver;

/// What the mirror did with one inbound element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A new property was registered.
    Defined,
    /// Re-definition of a property already tracked; nothing changed.
    Duplicate,
    Updated,
    PropertyRemoved,
    DeviceRemoved,
    Message,
    /// Filtered out by BLOB mode or watch list, or not meant for clients.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BlobMode {
    device: String,
    property: Option<String>,
    policy: BlobPolicy,
}

/// Local copy of the devices and properties announced by one server.
///
/// Inbound elements go through [`dispatch`](Self::dispatch); commands are
/// queued in an outgoing buffer and written with
/// [`flush_to`](Self::flush_to).
pub struct ClientMirror<O> {
    devices: IndexMap<String, Device>,
    observer: O,
    config: ClientConfig,
    blob_modes: Vec<BlobMode>,
    watched: IndexMap<String, Vec<String>>,
    outgoing: BytesMut,
}

impl<O: MirrorObserver> ClientMirror<O> {
    pub fn new(observer: O) -> Self {
        Self::with_config(observer, ClientConfig::default())
    }

    pub fn with_config(observer: O, config: ClientConfig) -> Self {
        Self {
            devices: IndexMap::new(),
            observer,
            config,
            blob_modes: Vec::new(),
            watched: IndexMap::new(),
            outgoing: BytesMut::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn into_observer(self) -> O {
        self.observer
    }

    /// Devices in the order they were first defined.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn device(&self, name: &str) -> Option<&Device> {
        self.devices.get(name)
    }

    /// Apply one element from the server.
    ///
    /// Errors are per element: the mirror stays consistent and the next
    /// element can be dispatched.
    pub fn dispatch(&mut self, element: &XmlElement) -> Result<Outcome> {
        tracing::debug!(tag = element.tag(), "mirroring element");
        match MessageTag::classify(element.tag()) {
            MessageTag::Def(kind) => self.define(element, kind),
            MessageTag::Set(kind) => self.update(element, kind),
            MessageTag::Message => self.message(element),
            MessageTag::DelProperty => self.delete(element),
            // Requests and echoed commands carry no new state.
            MessageTag::GetProperties | MessageTag::New(_) => Ok(Outcome::Ignored),
            MessageTag::EnableBlob | MessageTag::Unknown => {
                Err(ClientError::UnknownCommand(element.tag().to_string()))
            }
        }
    }

    /// Read one element from `reader` and dispatch it.
    pub fn process_next<R: Read>(&mut self, reader: &mut ElementReader<R>) -> Result<Outcome> {
        let element = reader.read_element()?;
        self.dispatch(&element)
    }

    fn define(&mut self, element: &XmlElement, kind: PropertyKind) -> Result<Outcome> {
        let device_name = attribute(element, "device")?;
        let name = attribute(element, "name")?;
        if self.filtered(device_name, name, kind) {
            return Ok(Outcome::Ignored);
        }
        if self
            .devices
            .get(device_name)
            .is_some_and(|d| d.registry().contains(device_name, name))
        {
            tracing::debug!(device = device_name, property = name, "duplicate definition ignored");
            return Ok(Outcome::Duplicate);
        }
        let vector = parse_definition(element)?;

        let created = !self.devices.contains_key(device_name);
        let device = self
            .devices
            .entry(device_name.to_string())
            .or_insert_with(|| Device::new(device_name));
        if created {
            tracing::debug!(device = device_name, "new device");
            self.observer.new_device(device);
        }

        let registration = device.registry_mut().define(vector);
        debug_assert_ne!(registration, Registration::Duplicate);
        if let Some(vector) = device.registry().get(device_name, name) {
            self.observer.new_property(vector);
        }
        log_message(&mut self.observer, device, element);
        Ok(Outcome::Defined)
    }

    fn update(&mut self, element: &XmlElement, kind: PropertyKind) -> Result<Outcome> {
        let device_name = attribute(element, "device")?;
        let name = attribute(element, "name")?;
        if self.filtered(device_name, name, kind) {
            return Ok(Outcome::Ignored);
        }
        let parsed = parse_update(element)?;
        for skipped in &parsed.skipped {
            tracing::warn!(
                device = device_name,
                property = name,
                element = %skipped.name,
                error = %skipped.reason,
                "dropping undecodable member"
            );
        }

        let not_found = || ClientError::PropertyNotFound {
            device: device_name.to_string(),
            name: name.to_string(),
        };
        let device = self.devices.get_mut(device_name).ok_or_else(not_found)?;
        let vector = device
            .registry_mut()
            .get_mut(device_name, name)
            .ok_or_else(not_found)?;
        for warning in vector.apply_update(&parsed.update)? {
            tracing::warn!(error = %warning, "partial update");
        }

        match vector.kind() {
            PropertyKind::Number => self.observer.new_number(vector),
            PropertyKind::Text => self.observer.new_text(vector),
            PropertyKind::Switch => self.observer.new_switch(vector),
            PropertyKind::Light => self.observer.new_light(vector),
            PropertyKind::Blob => self.observer.new_blob(vector),
        }
        log_message(&mut self.observer, device, element);
        Ok(Outcome::Updated)
    }

    fn message(&mut self, element: &XmlElement) -> Result<Outcome> {
        let text = attribute(element, "message")?;
        let entry = stamped(element, text);
        match element.attribute("device").and_then(|d| self.devices.get_mut(d)) {
            Some(device) => {
                let index = device.push_message(entry);
                self.observer.new_message(device, index);
            }
            None => self.observer.universal_message(&entry),
        }
        Ok(Outcome::Message)
    }

    fn delete(&mut self, element: &XmlElement) -> Result<Outcome> {
        let device_name = attribute(element, "device")?;
        let Some(name) = element.attribute("name") else {
            let device = self
                .devices
                .shift_remove(device_name)
                .ok_or_else(|| ClientError::DeviceNotFound(device_name.to_string()))?;
            tracing::debug!(device = device_name, properties = device.len(), "device removed");
            self.observer.remove_device(&device);
            return Ok(Outcome::DeviceRemoved);
        };

        let blob_only = self.blob_mode(device_name, None) == BlobPolicy::Only;
        let device = self
            .devices
            .get_mut(device_name)
            .ok_or_else(|| ClientError::DeviceNotFound(device_name.to_string()))?;
        log_message(&mut self.observer, device, element);
        let Some(vector) = device.registry().get(device_name, name) else {
            // BLOB-only clients never saw the other definitions.
            if blob_only {
                return Ok(Outcome::Ignored);
            }
            return Err(ClientError::PropertyNotFound {
                device: device_name.to_string(),
                name: name.to_string(),
            });
        };
        self.observer.remove_property(vector);
        device.registry_mut().delete(device_name, name)?;
        Ok(Outcome::PropertyRemoved)
    }

    fn filtered(&self, device: &str, name: &str, kind: PropertyKind) -> bool {
        if kind != PropertyKind::Blob && self.blob_mode(device, None) == BlobPolicy::Only {
            return true;
        }
        if self.watched.values().any(|properties| !properties.is_empty()) {
            return !self
                .watched
                .get(device)
                .is_some_and(|properties| properties.iter().any(|p| p == name));
        }
        false
    }

    /// BLOB handling in effect for a device, or for one of its properties.
    ///
    /// Without `property`, the first mode recorded for the device applies.
    pub fn blob_mode(&self, device: &str, property: Option<&str>) -> BlobPolicy {
        self.blob_modes
            .iter()
            .find(|m| m.device == device && property.is_none_or(|p| m.property.as_deref() == Some(p)))
            .map(|m| m.policy)
            .unwrap_or(self.config.default_blob_mode)
    }

    /// Record a BLOB mode and queue the matching `enableBLOB`.
    ///
    /// Nothing is sent when the mode is unchanged or `device` is empty.
    pub fn set_blob_mode(&mut self, policy: BlobPolicy, device: &str, property: Option<&str>) {
        if device.is_empty() {
            return;
        }
        match self
            .blob_modes
            .iter_mut()
            .find(|m| m.device == device && m.property.as_deref() == property)
        {
            Some(mode) if mode.policy == policy => return,
            Some(mode) => mode.policy = policy,
            None => self.blob_modes.push(BlobMode {
                device: device.to_string(),
                property: property.map(str::to_string),
                policy,
            }),
        }
        emit_enable_blob(&mut self.outgoing, device, property, policy);
    }

    /// Limit [`get_properties`](Self::get_properties) to a device.
    pub fn watch_device(&mut self, device: &str) {
        if !self.watched.contains_key(device) {
            self.watched.insert(device.to_string(), Vec::new());
        }
    }

    /// Limit requests and inbound traffic to specific properties.
    pub fn watch_property(&mut self, device: &str, property: &str) {
        self.watch_device(device);
        if let Some(properties) = self.watched.get_mut(device) {
            if !properties.iter().any(|p| p == property) {
                properties.push(property.to_string());
            }
        }
    }

    /// Queue `getProperties` requests for everything being watched, or one
    /// unfiltered request when nothing is.
    pub fn get_properties(&mut self) {
        let version = self.config.protocol_version.as_str();
        if self.watched.is_empty() {
            emit_get_properties(&mut self.outgoing, version, None, None);
            return;
        }
        for (device, properties) in &self.watched {
            if properties.is_empty() {
                emit_get_properties(&mut self.outgoing, version, Some(device), None);
            }
            for property in properties {
                emit_get_properties(&mut self.outgoing, version, Some(device), Some(property));
            }
        }
    }

    pub fn send_new_number(&mut self, device: &str, name: &str, values: &[(&str, f64)]) -> Result<()> {
        let values = values
            .iter()
            .map(|(element, value)| (element.to_string(), ElementValue::Number(NumberValue::new(*value))))
            .collect();
        self.send_new(device, name, PropertyKind::Number, values)
    }

    pub fn send_new_text(&mut self, device: &str, name: &str, values: &[(&str, &str)]) -> Result<()> {
        let values = values
            .iter()
            .map(|(element, value)| (element.to_string(), ElementValue::Text(value.to_string())))
            .collect();
        self.send_new(device, name, PropertyKind::Text, values)
    }

    pub fn send_new_switch(&mut self, device: &str, name: &str, values: &[(&str, SwitchState)]) -> Result<()> {
        let values = values
            .iter()
            .map(|(element, state)| (element.to_string(), ElementValue::Switch(*state)))
            .collect();
        self.send_new(device, name, PropertyKind::Switch, values)
    }

    pub fn send_new_blob(
        &mut self,
        device: &str,
        name: &str,
        element: &str,
        format: &str,
        payload: impl Into<Bytes>,
    ) -> Result<()> {
        let payload = payload.into();
        let value = ElementValue::Blob(BlobValue {
            format: format.to_string(),
            size: payload.len(),
            payload,
        });
        self.send_new(device, name, PropertyKind::Blob, vec![(element.to_string(), value)])
    }

    /// Queue a `new*Vector` and mark the local copy Busy until the driver answers.
    fn send_new(
        &mut self,
        device: &str,
        name: &str,
        kind: PropertyKind,
        values: Vec<(String, ElementValue)>,
    ) -> Result<()> {
        let vector = self
            .devices
            .get_mut(device)
            .and_then(|d| d.registry_mut().get_mut(device, name))
            .ok_or_else(|| ClientError::PropertyNotFound {
                device: device.to_string(),
                name: name.to_string(),
            })?;
        if vector.kind() != kind {
            return Err(PropertyError::KindMismatch {
                device: device.to_string(),
                name: name.to_string(),
                expected: kind,
                found: vector.kind(),
            }
            .into());
        }
        let known = vector.elements().names();
        if let Some((missing, _)) = values.iter().find(|(element, _)| !known.contains(&element.as_str())) {
            return Err(PropertyError::ElementNotFound {
                device: device.to_string(),
                name: name.to_string(),
                element: missing.clone(),
            }
            .into());
        }

        let mut update = PropertyUpdate::new(device, name, kind);
        for (element, value) in values {
            update.push(element, value);
        }
        emit_new(&mut self.outgoing, &update);
        vector.state = PropertyState::Busy;
        tracing::debug!(device, property = name, %kind, "command queued");
        Ok(())
    }

    /// Commands queued but not yet written.
    pub fn outgoing(&self) -> &[u8] {
        &self.outgoing
    }

    pub fn take_outgoing(&mut self) -> Bytes {
        self.outgoing.split().freeze()
    }

    /// Write and flush every queued command.
    pub fn flush_to<W: Write>(&mut self, writer: &mut MessageWriter<W>) -> Result<()> {
        if self.outgoing.is_empty() {
            return Ok(());
        }
        let pending = self.outgoing.split();
        tracing::trace!(bytes = pending.len(), "sending commands");
        writer.send(&pending)?;
        Ok(())
    }
}

fn attribute<'a>(element: &'a XmlElement, name: &str) -> Result<&'a str> {
    element
        .attribute(name)
        .ok_or_else(|| ClientError::MalformedMessage(format!("{} missing attribute {name}", element.tag())))
}

/// Log the `message` attribute of a def/set/del element, if any.
fn log_message<O: MirrorObserver>(observer: &mut O, device: &mut Device, element: &XmlElement) {
    if let Some(text) = element.attribute("message") {
        let index = device.push_message(stamped(element, text));
        observer.new_message(device, index);
    }
}

fn stamped(element: &XmlElement, text: &str) -> String {
    match element.attribute("timestamp") {
        Some(timestamp) => format!("{timestamp}: {text}"),
        None => format!("{}: {text}", timestamp_now()),
    }
}
