use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::error::{PropertyError, Result};
use crate::number::{format_number, format_wire};
use crate::update::{BlobValue, ElementValue, PropertyUpdate};

macro_rules! wire_tokens {
    ($ty:ident, $what:literal, { $($variant:ident => $token:literal),+ $(,)? }) => {
        impl $ty {
            /// Token used on the wire.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $token,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = PropertyError;

            fn from_str(token: &str) -> Result<Self> {
                match token.trim() {
                    $($token => Ok(Self::$variant),)+
                    other => Err(PropertyError::InvalidToken {
                        what: $what,
                        token: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// The five property vector kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Number,
    Text,
    Switch,
    Light,
    Blob,
}

wire_tokens!(PropertyKind, "property kind", {
    Number => "Number",
    Text => "Text",
    Switch => "Switch",
    Light => "Light",
    Blob => "BLOB",
});

/// Advisory state attached to every vector (and carried by lights).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PropertyState {
    #[default]
    Idle,
    Ok,
    Busy,
    Alert,
}

wire_tokens!(PropertyState, "property state", {
    Idle => "Idle",
    Ok => "Ok",
    Busy => "Busy",
    Alert => "Alert",
});

/// Who may write a vector. Read-only vectors never accept client commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Permission {
    #[default]
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

wire_tokens!(Permission, "permission", {
    ReadOnly => "ro",
    WriteOnly => "wo",
    ReadWrite => "rw",
});

/// Constraint on how many switches of a vector may be On.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwitchRule {
    /// Exactly one On.
    OneOfMany,
    /// Zero or one On.
    AtMostOne,
    /// Independent switches.
    AnyOfMany,
}

wire_tokens!(SwitchRule, "switch rule", {
    OneOfMany => "OneOfMany",
    AtMostOne => "AtMostOne",
    AnyOfMany => "AnyOfMany",
});

/// How BLOB traffic is forwarded to a client or snooping driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BlobPolicy {
    /// No BLOBs.
    #[default]
    Never,
    /// BLOBs along with everything else.
    Also,
    /// BLOBs and nothing else.
    Only,
}

wire_tokens!(BlobPolicy, "BLOB policy", {
    Never => "Never",
    Also => "Also",
    Only => "Only",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SwitchState {
    #[default]
    Off,
    On,
}

impl SwitchState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "On",
            Self::Off => "Off",
        }
    }

    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

impl FromStr for SwitchState {
    type Err = PropertyError;

    /// Any token starting with `On` is On; only the exact token `Off` is Off.
    fn from_str(token: &str) -> Result<Self> {
        let token = token.trim();
        if token.starts_with("On") {
            Ok(Self::On)
        } else if token == "Off" {
            Ok(Self::Off)
        } else {
            Err(PropertyError::InvalidToken {
                what: "switch state",
                token: token.to_string(),
            })
        }
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberElement {
    pub name: String,
    pub label: String,
    /// printf-style display format, e.g. `%g` or `%010.6m`.
    pub format: String,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub value: f64,
}

impl NumberElement {
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        format: impl Into<String>,
        min: f64,
        max: f64,
        step: f64,
        value: f64,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            format: format.into(),
            min,
            max,
            step,
            value,
        }
    }

    /// The value rendered with the element's display format.
    pub fn formatted(&self) -> String {
        format_number(&self.format, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextElement {
    pub name: String,
    pub label: String,
    pub value: String,
}

impl TextElement {
    pub fn new(name: impl Into<String>, label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchElement {
    pub name: String,
    pub label: String,
    pub value: SwitchState,
}

impl SwitchElement {
    pub fn new(name: impl Into<String>, label: impl Into<String>, value: SwitchState) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightElement {
    pub name: String,
    pub label: String,
    pub value: PropertyState,
}

impl LightElement {
    pub fn new(name: impl Into<String>, label: impl Into<String>, value: PropertyState) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobElement {
    pub name: String,
    pub label: String,
    /// File-extension-like tag such as `.fits` or `.fits.z`.
    pub format: String,
    /// Decoded size; for compressed formats, the size after decompression.
    pub size: usize,
    pub payload: Bytes,
}

impl BlobElement {
    /// An empty BLOB slot.
    pub fn new(name: impl Into<String>, label: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            format: format.into(),
            size: 0,
            payload: Bytes::new(),
        }
    }
}

/// The element list of a vector, one variant per kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Elements {
    Number(Vec<NumberElement>),
    Text(Vec<TextElement>),
    Switch {
        rule: SwitchRule,
        elements: Vec<SwitchElement>,
    },
    Light(Vec<LightElement>),
    Blob(Vec<BlobElement>),
}

impl Elements {
    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Number(_) => PropertyKind::Number,
            Self::Text(_) => PropertyKind::Text,
            Self::Switch { .. } => PropertyKind::Switch,
            Self::Light(_) => PropertyKind::Light,
            Self::Blob(_) => PropertyKind::Blob,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Number(e) => e.len(),
            Self::Text(e) => e.len(),
            Self::Switch { elements, .. } => elements.len(),
            Self::Light(e) => e.len(),
            Self::Blob(e) => e.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::Number(e) => e.iter().map(|e| e.name.as_str()).collect(),
            Self::Text(e) => e.iter().map(|e| e.name.as_str()).collect(),
            Self::Switch { elements, .. } => elements.iter().map(|e| e.name.as_str()).collect(),
            Self::Light(e) => e.iter().map(|e| e.name.as_str()).collect(),
            Self::Blob(e) => e.iter().map(|e| e.name.as_str()).collect(),
        }
    }
}

/// A named, typed group of elements exposed by a device.
///
/// The element list is fixed at construction; only values change afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyVector {
    pub device: String,
    pub name: String,
    pub label: String,
    pub group: String,
    pub permission: Permission,
    pub state: PropertyState,
    /// Seconds; advisory only.
    pub timeout: f64,
    /// Timestamp as last seen on the wire, if any.
    pub timestamp: Option<String>,
    elements: Elements,
}

impl PropertyVector {
    /// Build a vector, checking that it has elements, that element names are
    /// unique and that switch rules hold.
    ///
    /// The label defaults to the name and the permission to read-write
    /// (read-only for lights).
    pub fn new(device: impl Into<String>, name: impl Into<String>, elements: Elements) -> Result<Self> {
        let device = device.into();
        let name = name.into();
        let invalid = |reason: String| PropertyError::InvalidVector {
            device: device.clone(),
            name: name.clone(),
            reason,
        };

        if device.is_empty() || name.is_empty() {
            return Err(invalid("device and name are required".into()));
        }
        if elements.is_empty() {
            return Err(invalid("vector has no elements".into()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = elements.names().into_iter().find(|n| !seen.insert(*n)) {
            return Err(invalid(format!("duplicate element {dup}")));
        }
        if let Elements::Switch { rule, elements } = &elements {
            let on = elements.iter().filter(|s| s.value.is_on()).count();
            if let Some(reason) = switch_rule_violation(*rule, on) {
                return Err(invalid(reason));
            }
        }

        let permission = if elements.kind() == PropertyKind::Light {
            Permission::ReadOnly
        } else {
            Permission::ReadWrite
        };
        Ok(Self {
            label: name.clone(),
            device,
            name,
            group: String::new(),
            permission,
            state: PropertyState::Idle,
            timeout: 0.0,
            timestamp: None,
            elements,
        })
    }

    pub fn new_number(
        device: impl Into<String>,
        name: impl Into<String>,
        elements: Vec<NumberElement>,
    ) -> Result<Self> {
        Self::new(device, name, Elements::Number(elements))
    }

    pub fn new_text(device: impl Into<String>, name: impl Into<String>, elements: Vec<TextElement>) -> Result<Self> {
        Self::new(device, name, Elements::Text(elements))
    }

    pub fn new_switch(
        device: impl Into<String>,
        name: impl Into<String>,
        rule: SwitchRule,
        elements: Vec<SwitchElement>,
    ) -> Result<Self> {
        Self::new(device, name, Elements::Switch { rule, elements })
    }

    pub fn new_light(device: impl Into<String>, name: impl Into<String>, elements: Vec<LightElement>) -> Result<Self> {
        Self::new(device, name, Elements::Light(elements))
    }

    pub fn new_blob(device: impl Into<String>, name: impl Into<String>, elements: Vec<BlobElement>) -> Result<Self> {
        Self::new(device, name, Elements::Blob(elements))
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Set the permission. Lights stay read-only.
    pub fn with_permission(mut self, permission: Permission) -> Self {
        if self.kind() != PropertyKind::Light {
            self.permission = permission;
        }
        self
    }

    pub fn with_state(mut self, state: PropertyState) -> Self {
        self.state = state;
        self
    }

    pub fn with_timeout(mut self, timeout: f64) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn kind(&self) -> PropertyKind {
        self.elements.kind()
    }

    pub fn elements(&self) -> &Elements {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn rule(&self) -> Option<SwitchRule> {
        match &self.elements {
            Elements::Switch { rule, .. } => Some(*rule),
            _ => None,
        }
    }

    /// True unless the vector is read-only.
    pub fn is_writable(&self) -> bool {
        self.permission != Permission::ReadOnly
    }

    pub fn numbers(&self) -> &[NumberElement] {
        match &self.elements {
            Elements::Number(e) => e,
            _ => &[],
        }
    }

    pub fn texts(&self) -> &[TextElement] {
        match &self.elements {
            Elements::Text(e) => e,
            _ => &[],
        }
    }

    pub fn switches(&self) -> &[SwitchElement] {
        match &self.elements {
            Elements::Switch { elements, .. } => elements,
            _ => &[],
        }
    }

    pub fn lights(&self) -> &[LightElement] {
        match &self.elements {
            Elements::Light(e) => e,
            _ => &[],
        }
    }

    pub fn blobs(&self) -> &[BlobElement] {
        match &self.elements {
            Elements::Blob(e) => e,
            _ => &[],
        }
    }

    pub fn number(&self, name: &str) -> Option<&NumberElement> {
        self.numbers().iter().find(|e| e.name == name)
    }

    pub fn text(&self, name: &str) -> Option<&TextElement> {
        self.texts().iter().find(|e| e.name == name)
    }

    pub fn switch(&self, name: &str) -> Option<&SwitchElement> {
        self.switches().iter().find(|e| e.name == name)
    }

    pub fn light(&self, name: &str) -> Option<&LightElement> {
        self.lights().iter().find(|e| e.name == name)
    }

    pub fn blob(&self, name: &str) -> Option<&BlobElement> {
        self.blobs().iter().find(|e| e.name == name)
    }

    /// First switch that is On.
    pub fn on_switch(&self) -> Option<&SwitchElement> {
        self.switches().iter().find(|e| e.value.is_on())
    }

    pub fn number_mut(&mut self, name: &str) -> Option<&mut NumberElement> {
        match &mut self.elements {
            Elements::Number(e) => e.iter_mut().find(|e| e.name == name),
            _ => None,
        }
    }

    pub fn text_mut(&mut self, name: &str) -> Option<&mut TextElement> {
        match &mut self.elements {
            Elements::Text(e) => e.iter_mut().find(|e| e.name == name),
            _ => None,
        }
    }

    pub fn light_mut(&mut self, name: &str) -> Option<&mut LightElement> {
        match &mut self.elements {
            Elements::Light(e) => e.iter_mut().find(|e| e.name == name),
            _ => None,
        }
    }

    pub fn blob_mut(&mut self, name: &str) -> Option<&mut BlobElement> {
        match &mut self.elements {
            Elements::Blob(e) => e.iter_mut().find(|e| e.name == name),
            _ => None,
        }
    }

    /// Apply client-submitted switch states atomically.
    ///
    /// OneOfMany vectors (and AtMostOne vectors receiving an On) start from
    /// all-Off, so a client may send just the switch it wants On. On any
    /// unknown name or rule violation the state becomes Alert and no switch
    /// changes.
    pub fn apply_switches<S: AsRef<str>>(&mut self, states: &[(S, SwitchState)]) -> Result<()> {
        if self.kind() != PropertyKind::Switch {
            return Err(self.kind_mismatch(PropertyKind::Switch));
        }
        let next = match self.plan_switches(states) {
            Ok(next) => next,
            Err(err) => {
                self.state = PropertyState::Alert;
                return Err(err);
            }
        };
        if let Elements::Switch { elements, .. } = &mut self.elements {
            for (element, value) in elements.iter_mut().zip(next) {
                element.value = value;
            }
        }
        Ok(())
    }

    fn plan_switches<S: AsRef<str>>(&self, states: &[(S, SwitchState)]) -> Result<Vec<SwitchState>> {
        let elements = self.switches();
        let rule = self.rule().unwrap_or(SwitchRule::AnyOfMany);
        let mut next: Vec<SwitchState> = elements.iter().map(|e| e.value).collect();

        let reset = match rule {
            SwitchRule::OneOfMany => true,
            SwitchRule::AtMostOne => states.iter().any(|(_, s)| s.is_on()),
            SwitchRule::AnyOfMany => false,
        };
        if reset {
            next.fill(SwitchState::Off);
        }

        for (name, state) in states {
            let name = name.as_ref();
            let index = elements
                .iter()
                .position(|e| e.name == name)
                .ok_or_else(|| missing(&self.device, &self.name, name))?;
            next[index] = *state;
        }

        let on = next.iter().filter(|s| s.is_on()).count();
        match switch_rule_violation(rule, on) {
            Some(reason) => Err(self.validation_failed(reason)),
            None => Ok(next),
        }
    }

    /// Apply client-submitted numbers atomically.
    ///
    /// Every name must exist and every value must lie in `[min, max]`; on any
    /// violation the state becomes Alert and no value changes.
    pub fn apply_numbers<S: AsRef<str>>(&mut self, values: &[(S, f64)]) -> Result<()> {
        if self.kind() != PropertyKind::Number {
            return Err(self.kind_mismatch(PropertyKind::Number));
        }
        let targets = match self.check_numbers(values) {
            Ok(targets) => targets,
            Err(err) => {
                self.state = PropertyState::Alert;
                return Err(err);
            }
        };
        if let Elements::Number(elements) = &mut self.elements {
            for ((_, value), index) in values.iter().zip(targets) {
                elements[index].value = *value;
            }
        }
        Ok(())
    }

    fn check_numbers<S: AsRef<str>>(&self, values: &[(S, f64)]) -> Result<Vec<usize>> {
        let elements = self.numbers();
        values
            .iter()
            .map(|(name, value)| {
                let name = name.as_ref();
                let index = elements
                    .iter()
                    .position(|e| e.name == name)
                    .ok_or_else(|| missing(&self.device, &self.name, name))?;
                let element = &elements[index];
                if !(element.min..=element.max).contains(value) {
                    return Err(self.validation_failed(format!(
                        "invalid range for {} ({}): valid range is {} to {}, requested {}",
                        element.label,
                        element.name,
                        format_wire(element.min),
                        format_wire(element.max),
                        format_wire(*value),
                    )));
                }
                Ok(index)
            })
            .collect()
    }

    /// Apply texts element by element. Unknown names are returned as warnings.
    pub fn apply_texts<S: AsRef<str>, T: AsRef<str>>(&mut self, values: &[(S, T)]) -> Result<Vec<PropertyError>> {
        if self.kind() != PropertyKind::Text {
            return Err(self.kind_mismatch(PropertyKind::Text));
        }
        let (device, vector) = (&self.device, &self.name);
        let Elements::Text(elements) = &mut self.elements else {
            return Ok(Vec::new());
        };
        let mut warnings = Vec::new();
        for (name, text) in values {
            match elements.iter_mut().find(|e| e.name == name.as_ref()) {
                Some(element) => element.value = text.as_ref().to_string(),
                None => warnings.push(missing(device, vector, name.as_ref())),
            }
        }
        Ok(warnings)
    }

    /// Apply light states element by element. Unknown names are returned as warnings.
    pub fn apply_lights<S: AsRef<str>>(&mut self, values: &[(S, PropertyState)]) -> Result<Vec<PropertyError>> {
        if self.kind() != PropertyKind::Light {
            return Err(self.kind_mismatch(PropertyKind::Light));
        }
        let (device, vector) = (&self.device, &self.name);
        let Elements::Light(elements) = &mut self.elements else {
            return Ok(Vec::new());
        };
        let mut warnings = Vec::new();
        for (name, state) in values {
            match elements.iter_mut().find(|e| e.name == name.as_ref()) {
                Some(element) => element.value = *state,
                None => warnings.push(missing(device, vector, name.as_ref())),
            }
        }
        Ok(warnings)
    }

    /// Store BLOBs element by element. Unknown names are returned as warnings.
    pub fn apply_blobs<S: AsRef<str>>(&mut self, values: &[(S, BlobValue)]) -> Result<Vec<PropertyError>> {
        if self.kind() != PropertyKind::Blob {
            return Err(self.kind_mismatch(PropertyKind::Blob));
        }
        let (device, vector) = (&self.device, &self.name);
        let Elements::Blob(elements) = &mut self.elements else {
            return Ok(Vec::new());
        };
        let mut warnings = Vec::new();
        for (name, blob) in values {
            match elements.iter_mut().find(|e| e.name == name.as_ref()) {
                Some(element) => {
                    element.format = blob.format.clone();
                    element.size = blob.size;
                    element.payload = blob.payload.clone();
                }
                None => warnings.push(missing(device, vector, name.as_ref())),
            }
        }
        Ok(warnings)
    }

    /// Apply a wire update (`set*Vector`) without range or rule checks.
    ///
    /// State, timeout and timestamp overrides are taken when present. Unknown
    /// element names are returned as warnings; values of another kind are
    /// ignored. A switch vector left breaking its rule is also a warning.
    pub fn apply_update(&mut self, update: &PropertyUpdate) -> Result<Vec<PropertyError>> {
        if update.kind != self.kind() {
            return Err(self.kind_mismatch(update.kind));
        }
        if let Some(state) = update.state {
            self.state = state;
        }
        if let Some(timeout) = update.timeout {
            self.timeout = timeout;
        }
        if let Some(timestamp) = &update.timestamp {
            self.timestamp = Some(timestamp.clone());
        }

        let (device, vector) = (&self.device, &self.name);
        let mut warnings = Vec::new();
        for (name, value) in &update.values {
            let applied = match (&mut self.elements, value) {
                (Elements::Number(elements), ElementValue::Number(number)) => {
                    elements.iter_mut().find(|e| &e.name == name).map(|e| {
                        e.value = number.value;
                        e.min = number.min.unwrap_or(e.min);
                        e.max = number.max.unwrap_or(e.max);
                        e.step = number.step.unwrap_or(e.step);
                    })
                }
                (Elements::Text(elements), ElementValue::Text(text)) => elements
                    .iter_mut()
                    .find(|e| &e.name == name)
                    .map(|e| e.value = text.clone()),
                (Elements::Switch { elements, .. }, ElementValue::Switch(state)) => elements
                    .iter_mut()
                    .find(|e| &e.name == name)
                    .map(|e| e.value = *state),
                (Elements::Light(elements), ElementValue::Light(state)) => elements
                    .iter_mut()
                    .find(|e| &e.name == name)
                    .map(|e| e.value = *state),
                (Elements::Blob(elements), ElementValue::Blob(blob)) => {
                    elements.iter_mut().find(|e| &e.name == name).map(|e| {
                        e.format = blob.format.clone();
                        e.size = blob.size;
                        e.payload = blob.payload.clone();
                    })
                }
                _ => {
                    tracing::debug!(
                        device = %device,
                        property = %vector,
                        element = %name,
                        "ignoring element of another kind"
                    );
                    Some(())
                }
            };
            if applied.is_none() {
                warnings.push(missing(device, vector, name));
            }
        }

        // Mirrored as received; a broken rule is reported, not repaired.
        if let Elements::Switch { rule, elements } = &self.elements {
            let on = elements.iter().filter(|e| e.value.is_on()).count();
            if let Some(reason) = switch_rule_violation(*rule, on) {
                warnings.push(self.validation_failed(reason));
            }
        }
        Ok(warnings)
    }

    fn kind_mismatch(&self, expected: PropertyKind) -> PropertyError {
        PropertyError::KindMismatch {
            device: self.device.clone(),
            name: self.name.clone(),
            expected,
            found: self.kind(),
        }
    }

    fn validation_failed(&self, reason: String) -> PropertyError {
        PropertyError::ValidationFailed {
            device: self.device.clone(),
            name: self.name.clone(),
            reason,
        }
    }
}

fn missing(device: &str, name: &str, element: &str) -> PropertyError {
    PropertyError::ElementNotFound {
        device: device.to_string(),
        name: name.to_string(),
        element: element.to_string(),
    }
}

fn switch_rule_violation(rule: SwitchRule, on: usize) -> Option<String> {
    match rule {
        SwitchRule::OneOfMany if on == 0 => Some("OneOfMany requires one switch On, none is On".into()),
        SwitchRule::OneOfMany if on > 1 => Some(format!("OneOfMany allows one switch On, {on} are On")),
        SwitchRule::AtMostOne if on > 1 => Some(format!("AtMostOne allows at most one switch On, {on} are On")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::NumberValue;

    fn target() -> PropertyVector {
        PropertyVector::new_number(
            "Sim",
            "TARGET",
            vec![
                NumberElement::new("VALUE", "Value", "%g", 0.0, 100.0, 1.0, 50.0),
                NumberElement::new("RATE", "Rate", "%.1f", -5.0, 5.0, 0.5, 1.0),
            ],
        )
        .unwrap()
        .with_label("Target")
    }

    fn abc() -> PropertyVector {
        PropertyVector::new_switch(
            "Sim",
            "MODE",
            SwitchRule::OneOfMany,
            vec![
                SwitchElement::new("A", "A", SwitchState::On),
                SwitchElement::new("B", "B", SwitchState::Off),
                SwitchElement::new("C", "C", SwitchState::Off),
            ],
        )
        .unwrap()
    }

    #[test]
    fn tokens_roundtrip() {
        for state in [PropertyState::Idle, PropertyState::Ok, PropertyState::Busy, PropertyState::Alert] {
            assert_eq!(state.as_str().parse::<PropertyState>().unwrap(), state);
        }
        assert_eq!("rw".parse::<Permission>().unwrap(), Permission::ReadWrite);
        assert_eq!("AtMostOne".parse::<SwitchRule>().unwrap(), SwitchRule::AtMostOne);
        assert_eq!("Only".parse::<BlobPolicy>().unwrap(), BlobPolicy::Only);
        assert_eq!(PropertyKind::Blob.to_string(), "BLOB");
        assert!("bogus".parse::<Permission>().is_err());
    }

    #[test]
    fn switch_state_accepts_on_prefix() {
        assert_eq!("On".parse::<SwitchState>().unwrap(), SwitchState::On);
        assert_eq!("  Onward ".parse::<SwitchState>().unwrap(), SwitchState::On);
        assert_eq!("Off".parse::<SwitchState>().unwrap(), SwitchState::Off);
        assert!("off".parse::<SwitchState>().is_err());
        assert!("Offset".parse::<SwitchState>().is_err());
    }

    #[test]
    fn construction_rejects_empty_and_duplicates() {
        assert!(matches!(
            PropertyVector::new_number("Sim", "EMPTY", vec![]),
            Err(PropertyError::InvalidVector { .. })
        ));
        let dup = PropertyVector::new_text(
            "Sim",
            "DUP",
            vec![TextElement::new("X", "", "a"), TextElement::new("X", "", "b")],
        );
        assert!(matches!(dup, Err(PropertyError::InvalidVector { reason, .. }) if reason.contains("X")));
    }

    #[test]
    fn construction_enforces_one_of_many() {
        let none_on = PropertyVector::new_switch(
            "Sim",
            "MODE",
            SwitchRule::OneOfMany,
            vec![SwitchElement::new("A", "", SwitchState::Off)],
        );
        assert!(none_on.is_err());
        let two_on = PropertyVector::new_switch(
            "Sim",
            "MODE",
            SwitchRule::AtMostOne,
            vec![
                SwitchElement::new("A", "", SwitchState::On),
                SwitchElement::new("B", "", SwitchState::On),
            ],
        );
        assert!(two_on.is_err());
    }

    #[test]
    fn lights_are_always_read_only() {
        let lights = PropertyVector::new_light("Sim", "STATUS", vec![LightElement::new("L", "", PropertyState::Ok)])
            .unwrap()
            .with_permission(Permission::ReadWrite);
        assert_eq!(lights.permission, Permission::ReadOnly);
        assert!(!lights.is_writable());
    }

    #[test]
    fn numbers_apply_when_all_in_range() {
        let mut vector = target();
        vector.apply_numbers(&[("VALUE", 75.0), ("RATE", -2.5)]).unwrap();
        assert_eq!(vector.number("VALUE").unwrap().value, 75.0);
        assert_eq!(vector.number("RATE").unwrap().value, -2.5);
    }

    #[test]
    fn numbers_are_atomic() {
        let mut vector = target();
        let err = vector
            .apply_numbers(&[("VALUE", 60.0), ("RATE", 9.0)])
            .unwrap_err();
        match err {
            PropertyError::ValidationFailed { reason, .. } => {
                assert!(reason.contains("RATE"));
                assert!(reason.contains("-5"));
                assert!(reason.contains("5"));
                assert!(reason.contains("9"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(vector.number("VALUE").unwrap().value, 50.0);
        assert_eq!(vector.number("RATE").unwrap().value, 1.0);
        assert_eq!(vector.state, PropertyState::Alert);
    }

    #[test]
    fn numbers_reject_unknown_names_atomically() {
        let mut vector = target();
        let err = vector.apply_numbers(&[("VALUE", 10.0), ("NOPE", 1.0)]).unwrap_err();
        assert!(matches!(err, PropertyError::ElementNotFound { element, .. } if element == "NOPE"));
        assert_eq!(vector.number("VALUE").unwrap().value, 50.0);
    }

    #[test]
    fn degenerate_range_is_enforced() {
        let mut vector = PropertyVector::new_number(
            "Sim",
            "FIXED",
            vec![NumberElement::new("X", "", "%g", 0.0, 0.0, 0.0, 0.0)],
        )
        .unwrap();
        assert!(vector.apply_numbers(&[("X", 0.0)]).is_ok());
        assert!(vector.apply_numbers(&[("X", 1.0)]).is_err());
    }

    #[test]
    fn one_of_many_rejects_all_off() {
        let mut vector = abc();
        let err = vector
            .apply_switches(&[("A", SwitchState::Off), ("B", SwitchState::Off), ("C", SwitchState::Off)])
            .unwrap_err();
        assert!(matches!(err, PropertyError::ValidationFailed { reason, .. } if reason.contains("OneOfMany")));
        assert_eq!(vector.on_switch().unwrap().name, "A");
        assert_eq!(vector.state, PropertyState::Alert);
    }

    #[test]
    fn one_of_many_accepts_exactly_one() {
        let mut vector = abc();
        vector
            .apply_switches(&[("A", SwitchState::Off), ("B", SwitchState::On), ("C", SwitchState::Off)])
            .unwrap();
        let on: Vec<&str> = vector
            .switches()
            .iter()
            .filter(|s| s.value.is_on())
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(on, ["B"]);
    }

    #[test]
    fn one_of_many_single_on_switches_over() {
        let mut vector = abc();
        vector.apply_switches(&[("C", SwitchState::On)]).unwrap();
        assert_eq!(vector.on_switch().unwrap().name, "C");
        assert_eq!(vector.switch("A").unwrap().value, SwitchState::Off);
    }

    #[test]
    fn at_most_one_allows_all_off() {
        let mut vector = PropertyVector::new_switch(
            "Sim",
            "OPT",
            SwitchRule::AtMostOne,
            vec![
                SwitchElement::new("X", "", SwitchState::On),
                SwitchElement::new("Y", "", SwitchState::Off),
            ],
        )
        .unwrap();
        vector.apply_switches(&[("X", SwitchState::Off)]).unwrap();
        assert!(vector.on_switch().is_none());
        assert!(vector
            .apply_switches(&[("X", SwitchState::On), ("Y", SwitchState::On)])
            .is_err());
        assert!(vector.on_switch().is_none());
    }

    #[test]
    fn texts_are_best_effort() {
        let mut vector = PropertyVector::new_text(
            "Sim",
            "INFO",
            vec![TextElement::new("A", "", "old"), TextElement::new("B", "", "old")],
        )
        .unwrap();
        let warnings = vector.apply_texts(&[("A", "new"), ("Z", "lost"), ("B", "newer")]).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(matches!(&warnings[0], PropertyError::ElementNotFound { element, .. } if element == "Z"));
        assert_eq!(vector.text("A").unwrap().value, "new");
        assert_eq!(vector.text("B").unwrap().value, "newer");
    }

    #[test]
    fn blobs_are_best_effort() {
        let mut vector = PropertyVector::new_blob("Cam", "CCD1", vec![BlobElement::new("CCD1", "Image", "")]).unwrap();
        let blob = BlobValue {
            format: ".fits".into(),
            size: 3,
            payload: Bytes::from_static(b"abc"),
        };
        let warnings = vector
            .apply_blobs(&[("CCD1", blob.clone()), ("CCD2", blob)])
            .unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(vector.blob("CCD1").unwrap().payload.as_ref(), b"abc");
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let mut vector = target();
        assert!(matches!(
            vector.apply_switches(&[("VALUE", SwitchState::On)]),
            Err(PropertyError::KindMismatch { .. })
        ));
        assert_eq!(vector.state, PropertyState::Idle);
    }

    #[test]
    fn wire_update_overrides_limits_and_state() {
        let mut vector = target();
        let mut update = PropertyUpdate::new("Sim", "TARGET", PropertyKind::Number);
        update.state = Some(PropertyState::Busy);
        update.values.push((
            "VALUE".into(),
            ElementValue::Number(NumberValue {
                value: 150.0,
                min: Some(0.0),
                max: Some(200.0),
                step: None,
            }),
        ));
        update.values.push(("GHOST".into(), ElementValue::Number(NumberValue::new(1.0))));
        let warnings = vector.apply_update(&update).unwrap();
        assert_eq!(warnings.len(), 1);
        let value = vector.number("VALUE").unwrap();
        assert_eq!((value.value, value.max, value.step), (150.0, 200.0, 1.0));
        assert_eq!(vector.state, PropertyState::Busy);
    }

    #[test]
    fn wire_update_breaking_switch_rule_is_reported() {
        let mut vector = abc();
        let mut update = PropertyUpdate::new("Sim", "MODE", PropertyKind::Switch);
        update.values.push(("B".into(), ElementValue::Switch(SwitchState::On)));
        let warnings = vector.apply_update(&update).unwrap();

        assert_eq!(warnings.len(), 1);
        assert!(matches!(&warnings[0], PropertyError::ValidationFailed { reason, .. } if reason.contains("2 are On")));
        assert!(vector.switch("A").unwrap().value.is_on());
        assert!(vector.switch("B").unwrap().value.is_on());

        let mut update = PropertyUpdate::new("Sim", "MODE", PropertyKind::Switch);
        update.values.push(("A".into(), ElementValue::Switch(SwitchState::Off)));
        assert!(vector.apply_update(&update).unwrap().is_empty());
    }

    #[test]
    fn formatted_uses_element_format() {
        let vector = target();
        assert_eq!(vector.number("RATE").unwrap().formatted(), "1.0");
    }
}
