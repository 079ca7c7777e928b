//! Cross-device snooping.
//!
//! A driver may subscribe to another device's traffic. The hub forwards
//! matching `def*`, `set*`, `message` and `delProperty` elements; the router
//! decodes each element once and hands it to every interested subscriber.

use std::sync::{Arc, RwLock};

use indiwire_codec::XmlElement;
use indiwire_property::{
    parse_definition, parse_update, BlobPolicy, MessageTag, PropertyKind, PropertyUpdate, PropertyVector,
};

use crate::error::{DispatchError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnoopSubscription {
    pub subscriber: String,
    pub device: String,
    /// `None` subscribes to every property of the device.
    pub property: Option<String>,
    pub blob_policy: BlobPolicy,
}

impl SnoopSubscription {
    fn matches(&self, device: &str, property: Option<&str>) -> bool {
        self.device == device
            && match (&self.property, property) {
                (None, _) => true,
                (Some(wanted), Some(name)) => wanted == name,
                // Device-wide traffic reaches property subscriptions too.
                (Some(_), None) => true,
            }
    }
}

/// A decoded snooped element.
#[derive(Debug, Clone, PartialEq)]
pub enum SnoopedMessage {
    Definition(PropertyVector),
    Update(PropertyUpdate),
    Message {
        device: String,
        text: String,
        timestamp: Option<String>,
    },
    Delete {
        device: String,
        name: Option<String>,
    },
}

impl SnoopedMessage {
    fn carries_blob(&self) -> bool {
        match self {
            Self::Definition(vector) => vector.kind() == PropertyKind::Blob,
            Self::Update(update) => update.is_blob(),
            Self::Message { .. } | Self::Delete { .. } => false,
        }
    }

    fn admitted_by(&self, policy: BlobPolicy) -> bool {
        match policy {
            BlobPolicy::Never => !self.carries_blob(),
            BlobPolicy::Also => true,
            BlobPolicy::Only => self.carries_blob() || matches!(self, Self::Delete { .. }),
        }
    }
}

/// One snooped message for one subscriber.
#[derive(Debug, Clone)]
pub struct SnoopDelivery {
    pub subscriber: String,
    pub message: Arc<SnoopedMessage>,
}

/// Subscription table shared between sessions.
#[derive(Debug, Default)]
pub struct SnoopRouter {
    subscriptions: RwLock<Vec<SnoopSubscription>>,
}

impl SnoopRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a device, or to one of its properties. Repeating a
    /// subscription is a no-op.
    pub fn subscribe(&self, subscriber: &str, device: &str, property: Option<&str>) -> Result<()> {
        let mut subscriptions = self
            .subscriptions
            .write()
            .map_err(|_| DispatchError::SnoopLockPoisoned)?;
        if find(&subscriptions, subscriber, device, property).is_none() {
            tracing::debug!(subscriber, device, property, "snoop subscription added");
            subscriptions.push(SnoopSubscription {
                subscriber: subscriber.to_string(),
                device: device.to_string(),
                property: property.map(str::to_string),
                blob_policy: BlobPolicy::Never,
            });
        }
        Ok(())
    }

    /// Set the BLOB policy of a subscription, creating it when absent.
    pub fn set_blob_policy(
        &self,
        subscriber: &str,
        device: &str,
        property: Option<&str>,
        policy: BlobPolicy,
    ) -> Result<()> {
        let mut subscriptions = self
            .subscriptions
            .write()
            .map_err(|_| DispatchError::SnoopLockPoisoned)?;
        match find(&subscriptions, subscriber, device, property) {
            Some(index) => subscriptions[index].blob_policy = policy,
            None => subscriptions.push(SnoopSubscription {
                subscriber: subscriber.to_string(),
                device: device.to_string(),
                property: property.map(str::to_string),
                blob_policy: policy,
            }),
        }
        Ok(())
    }

    pub fn subscriptions(&self) -> Result<Vec<SnoopSubscription>> {
        let subscriptions = self
            .subscriptions
            .read()
            .map_err(|_| DispatchError::SnoopLockPoisoned)?;
        Ok(subscriptions.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.read().map(|s| s.is_empty()).unwrap_or(true)
    }

    /// Deliveries for an inbound element.
    ///
    /// Each subscriber receives the element at most once, judged by its most
    /// specific matching subscription. Elements nobody wants are not decoded.
    pub fn route(&self, element: &XmlElement) -> Result<Vec<SnoopDelivery>> {
        let tag = MessageTag::classify(element.tag());
        if !matches!(
            tag,
            MessageTag::Def(_) | MessageTag::Set(_) | MessageTag::Message | MessageTag::DelProperty
        ) {
            return Ok(Vec::new());
        }
        let Some(device) = element.attribute("device") else {
            return Ok(Vec::new());
        };
        let property = match tag {
            MessageTag::Message => None,
            _ => element.attribute("name"),
        };

        let subscriptions = self
            .subscriptions
            .read()
            .map_err(|_| DispatchError::SnoopLockPoisoned)?;
        let mut chosen: Vec<&SnoopSubscription> = Vec::new();
        for sub in subscriptions.iter().filter(|s| s.matches(device, property)) {
            match chosen.iter_mut().find(|c| c.subscriber == sub.subscriber) {
                Some(current) if current.property.is_none() && sub.property.is_some() => *current = sub,
                Some(_) => {}
                None => chosen.push(sub),
            }
        }
        if chosen.is_empty() {
            return Ok(Vec::new());
        }

        let message = Arc::new(decode(tag, device, element)?);
        let deliveries: Vec<SnoopDelivery> = chosen
            .into_iter()
            .filter(|sub| message.admitted_by(sub.blob_policy))
            .map(|sub| SnoopDelivery {
                subscriber: sub.subscriber.clone(),
                message: Arc::clone(&message),
            })
            .collect();
        tracing::trace!(tag = element.tag(), device, deliveries = deliveries.len(), "snoop routed");
        Ok(deliveries)
    }
}

fn find(subscriptions: &[SnoopSubscription], subscriber: &str, device: &str, property: Option<&str>) -> Option<usize> {
    subscriptions
        .iter()
        .position(|s| s.subscriber == subscriber && s.device == device && s.property.as_deref() == property)
}

fn decode(tag: MessageTag, device: &str, element: &XmlElement) -> Result<SnoopedMessage> {
    Ok(match tag {
        MessageTag::Def(_) => SnoopedMessage::Definition(parse_definition(element)?),
        MessageTag::Set(_) => {
            let parsed = parse_update(element)?;
            for skipped in &parsed.skipped {
                tracing::warn!(device, member = %skipped.name, error = %skipped.reason, "snooped member dropped");
            }
            SnoopedMessage::Update(parsed.update)
        }
        MessageTag::Message => SnoopedMessage::Message {
            device: device.to_string(),
            text: element.attribute("message").unwrap_or_default().to_string(),
            timestamp: element.attribute("timestamp").map(str::to_string),
        },
        _ => SnoopedMessage::Delete {
            device: device.to_string(),
            name: element.attribute("name").map(str::to_string),
        },
    })
}
