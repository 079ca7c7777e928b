//! Turning inbound elements into driver callbacks.

use std::io::Write;

use indiwire_codec::XmlElement;
use indiwire_property::{
    parse_number, parse_update, Permission, PropertyError, PropertyKind, PropertyUpdate, MessageTag,
    PROTOCOL_VERSION, PROTOCOL_VERSION_NUMBER,
};

use crate::config::DriverConfig;
use crate::error::{DispatchError, Result};
use crate::session::DriverSession;
use crate::snoop::SnoopDelivery;

/// Device-specific behavior behind a dispatcher.
///
/// Only [`get_properties`](Driver::get_properties) is required. The default
/// `new_*` handlers apply the command to the registry and answer with the
/// resulting vector (state Ok, or Alert with the rejection reason).
pub trait Driver {
    /// A client asked for definitions, of one device or of all.
    fn get_properties<W: Write>(&mut self, session: &mut DriverSession<W>, device: Option<&str>) -> Result<()>;

    fn new_number<W: Write>(&mut self, session: &mut DriverSession<W>, update: &PropertyUpdate) -> Result<()> {
        session.accept(update)
    }

    fn new_text<W: Write>(&mut self, session: &mut DriverSession<W>, update: &PropertyUpdate) -> Result<()> {
        session.accept(update)
    }

    fn new_switch<W: Write>(&mut self, session: &mut DriverSession<W>, update: &PropertyUpdate) -> Result<()> {
        session.accept(update)
    }

    fn new_blob<W: Write>(&mut self, session: &mut DriverSession<W>, update: &PropertyUpdate) -> Result<()> {
        session.accept(update)
    }

    /// Snooped traffic for a subscription made through
    /// [`DriverSession::snoop_device`].
    fn snoop<W: Write>(&mut self, _session: &mut DriverSession<W>, _delivery: &SnoopDelivery) -> Result<()> {
        Ok(())
    }
}

/// Routes inbound elements to a [`Driver`] through its [`DriverSession`].
pub struct Dispatcher<D, W> {
    driver: D,
    session: DriverSession<W>,
}

impl<D: Driver, W: Write> Dispatcher<D, W> {
    pub fn new(name: impl Into<String>, driver: D, writer: W) -> Self {
        Self::with_config(name, driver, writer, DriverConfig::default())
    }

    pub fn with_config(name: impl Into<String>, driver: D, writer: W, config: DriverConfig) -> Self {
        Self::from_parts(driver, DriverSession::with_config(name, writer, config))
    }

    pub fn from_parts(driver: D, session: DriverSession<W>) -> Self {
        Self { driver, session }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn session(&self) -> &DriverSession<W> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut DriverSession<W> {
        &mut self.session
    }

    pub fn into_parts(self) -> (D, DriverSession<W>) {
        (self.driver, self.session)
    }

    /// Handle one inbound element.
    pub fn dispatch(&mut self, element: &XmlElement) -> Result<()> {
        let tag = MessageTag::classify(element.tag());
        tracing::debug!(tag = element.tag(), device = element.attribute("device"), "dispatch");
        match tag {
            MessageTag::GetProperties => self.get_properties(element),
            MessageTag::Def(_) | MessageTag::Set(_) | MessageTag::Message | MessageTag::DelProperty => {
                self.snoop(element)
            }
            MessageTag::New(kind) => self.new_vector(kind, element),
            MessageTag::EnableBlob | MessageTag::Unknown => {
                Err(DispatchError::UnknownCommand(element.tag().to_string()))
            }
        }
    }

    /// Replay saved commands for `device` from its config file.
    /// Returns how many were applied.
    pub fn load_config(&mut self, device: &str, property: Option<&str>) -> Result<usize> {
        let store = self.session.config_store(device)?;
        let mut applied = 0;
        for element in store.load(device, property)? {
            match self.dispatch(&element) {
                Ok(()) => applied += 1,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => tracing::warn!(device, error = %err, "saved command not applied"),
            }
        }
        tracing::debug!(device, applied, path = %store.path().display(), "config loaded");
        Ok(applied)
    }

    fn get_properties(&mut self, element: &XmlElement) -> Result<()> {
        let version = element.attribute("version").unwrap_or_default();
        let supported = parse_number(version)
            .map(|v| v <= PROTOCOL_VERSION_NUMBER)
            .unwrap_or(false);
        if !supported {
            tracing::error!(version, "incompatible protocol version");
            return Err(DispatchError::ProtocolVersionIncompatible {
                requested: version.to_string(),
                supported: PROTOCOL_VERSION,
            });
        }

        let device = element.attribute("device");
        match (device, element.attribute("name")) {
            (Some(device), Some(name)) => {
                if self.session.get(device, name).is_some() {
                    self.session.send_definition(device, name, None)?;
                }
                Ok(())
            }
            _ => self.driver.get_properties(&mut self.session, device),
        }
    }

    /// Hand the driver the deliveries for its own subscriptions. A router
    /// shared between sessions also returns other subscribers' deliveries.
    fn snoop(&mut self, element: &XmlElement) -> Result<()> {
        let deliveries = self.session.snoop_router().route(element)?;
        let own = self.session.name().to_string();
        for delivery in deliveries.iter().filter(|d| d.subscriber == own) {
            self.driver.snoop(&mut self.session, delivery)?;
        }
        Ok(())
    }

    fn new_vector(&mut self, kind: PropertyKind, element: &XmlElement) -> Result<()> {
        let tag = element.tag();
        let (Some(device), Some(name)) = (element.attribute("device"), element.attribute("name")) else {
            return Err(DispatchError::MalformedMessage(format!("{tag} requires device and name")));
        };
        let vector = self
            .session
            .get(device, name)
            .ok_or_else(|| DispatchError::PropertyNotFound {
                device: device.to_string(),
                name: name.to_string(),
            })?;
        if vector.permission == Permission::ReadOnly {
            return Err(DispatchError::PermissionDenied {
                device: device.to_string(),
                name: name.to_string(),
            });
        }
        if vector.kind() != kind {
            return Err(DispatchError::MalformedMessage(format!(
                "{tag} sent to {} property {device}.{name}",
                vector.kind()
            )));
        }

        let parsed = parse_update(element)?;
        for skipped in &parsed.skipped {
            let text = diagnostic(name, &skipped.reason);
            tracing::warn!(device, property = name, member = %skipped.name, error = %skipped.reason, "member skipped");
            self.session.message(Some(device), &text)?;
        }
        if parsed.update.is_empty() {
            self.session
                .message(Some(device), &format!("[ERROR] {name}: {tag} with no valid members"))?;
            return Err(DispatchError::NoValidMembers {
                device: device.to_string(),
                name: name.to_string(),
                tag: tag.to_string(),
            });
        }

        let update = parsed.update;
        match kind {
            PropertyKind::Number => self.driver.new_number(&mut self.session, &update),
            PropertyKind::Text => self.driver.new_text(&mut self.session, &update),
            PropertyKind::Switch => self.driver.new_switch(&mut self.session, &update),
            PropertyKind::Blob => self.driver.new_blob(&mut self.session, &update),
            PropertyKind::Light => Err(DispatchError::UnknownCommand(tag.to_string())),
        }
    }
}

fn diagnostic(name: &str, reason: &PropertyError) -> String {
    match reason {
        PropertyError::InvalidNumber(text) => format!("[ERROR] {name}: Bad format {text}"),
        PropertyError::InvalidToken {
            what: "switch state",
            token,
        } => format!("[ERROR] {name}: must be On or Off: {token}"),
        other => format!("[ERROR] {name}: {other}"),
    }
}
