//! Value-only property traffic.
//!
//! A [`PropertyUpdate`] is what travels in `set*Vector` and `new*Vector`
//! messages: element values by name, plus optional vector attributes.

use bytes::Bytes;

use crate::model::{Elements, PropertyKind, PropertyState, PropertyVector, SwitchState};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberValue {
    pub value: f64,
    /// Limit overrides, only present when a driver republishes limits.
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
}

impl NumberValue {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            min: None,
            max: None,
            step: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobValue {
    pub format: String,
    pub size: usize,
    pub payload: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    Number(NumberValue),
    Text(String),
    Switch(SwitchState),
    Light(PropertyState),
    Blob(BlobValue),
}

impl ElementValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Number(_) => PropertyKind::Number,
            Self::Text(_) => PropertyKind::Text,
            Self::Switch(_) => PropertyKind::Switch,
            Self::Light(_) => PropertyKind::Light,
            Self::Blob(_) => PropertyKind::Blob,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyUpdate {
    pub device: String,
    pub name: String,
    pub kind: PropertyKind,
    pub state: Option<PropertyState>,
    pub timeout: Option<f64>,
    pub timestamp: Option<String>,
    pub message: Option<String>,
    pub values: Vec<(String, ElementValue)>,
}

impl PropertyUpdate {
    pub fn new(device: impl Into<String>, name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            device: device.into(),
            name: name.into(),
            kind,
            state: None,
            timeout: None,
            timestamp: None,
            message: None,
            values: Vec::new(),
        }
    }

    /// Snapshot every element value of `vector`, with its state and timeout.
    pub fn from_vector(vector: &PropertyVector) -> Self {
        let values = match vector.elements() {
            Elements::Number(e) => e
                .iter()
                .map(|e| (e.name.clone(), ElementValue::Number(NumberValue::new(e.value))))
                .collect(),
            Elements::Text(e) => e
                .iter()
                .map(|e| (e.name.clone(), ElementValue::Text(e.value.clone())))
                .collect(),
            Elements::Switch { elements, .. } => elements
                .iter()
                .map(|e| (e.name.clone(), ElementValue::Switch(e.value)))
                .collect(),
            Elements::Light(e) => e
                .iter()
                .map(|e| (e.name.clone(), ElementValue::Light(e.value)))
                .collect(),
            Elements::Blob(e) => e
                .iter()
                .map(|e| {
                    let blob = BlobValue {
                        format: e.format.clone(),
                        size: e.size,
                        payload: e.payload.clone(),
                    };
                    (e.name.clone(), ElementValue::Blob(blob))
                })
                .collect(),
        };
        let timeout = (vector.kind() != PropertyKind::Light).then_some(vector.timeout);
        Self {
            device: vector.device.clone(),
            name: vector.name.clone(),
            kind: vector.kind(),
            state: Some(vector.state),
            timeout,
            timestamp: vector.timestamp.clone(),
            message: None,
            values,
        }
    }

    /// Like [`from_vector`](Self::from_vector), but numbers carry their
    /// current min, max and step.
    pub fn limits_from_vector(vector: &PropertyVector) -> Self {
        let mut update = Self::from_vector(vector);
        for ((_, value), element) in update.values.iter_mut().zip(vector.numbers()) {
            if let ElementValue::Number(number) = value {
                number.min = Some(element.min);
                number.max = Some(element.max);
                number.step = Some(element.step);
            }
        }
        update
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_state(mut self, state: PropertyState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: ElementValue) {
        self.values.push((name.into(), value));
    }

    pub fn value(&self, name: &str) -> Option<&ElementValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn is_blob(&self) -> bool {
        self.kind == PropertyKind::Blob
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number values as `(name, value)` pairs, for `apply_numbers`.
    pub fn numbers(&self) -> Vec<(&str, f64)> {
        self.values
            .iter()
            .filter_map(|(n, v)| match v {
                ElementValue::Number(number) => Some((n.as_str(), number.value)),
                _ => None,
            })
            .collect()
    }

    pub fn texts(&self) -> Vec<(&str, &str)> {
        self.values
            .iter()
            .filter_map(|(n, v)| match v {
                ElementValue::Text(text) => Some((n.as_str(), text.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn switches(&self) -> Vec<(&str, SwitchState)> {
        self.values
            .iter()
            .filter_map(|(n, v)| match v {
                ElementValue::Switch(state) => Some((n.as_str(), *state)),
                _ => None,
            })
            .collect()
    }

    pub fn blobs(&self) -> Vec<(&str, BlobValue)> {
        self.values
            .iter()
            .filter_map(|(n, v)| match v {
                ElementValue::Blob(blob) => Some((n.as_str(), blob.clone())),
                _ => None,
            })
            .collect()
    }
}
