//! Decoding of protocol elements into property types.

use bytes::Bytes;
use indiwire_codec::{BlobFrame, XmlElement};

use crate::error::{PropertyError, Result};
use crate::model::{
    BlobElement, Elements, LightElement, NumberElement, Permission, PropertyKind, PropertyState, PropertyVector,
    SwitchElement, SwitchRule, TextElement,
};
use crate::number::parse_number;
use crate::update::{BlobValue, ElementValue, NumberValue, PropertyUpdate};

/// Top-level protocol tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTag {
    GetProperties,
    Def(PropertyKind),
    Set(PropertyKind),
    New(PropertyKind),
    DelProperty,
    Message,
    EnableBlob,
    Unknown,
}

impl MessageTag {
    pub fn classify(tag: &str) -> Self {
        match tag {
            "getProperties" => return Self::GetProperties,
            "delProperty" => return Self::DelProperty,
            "message" => return Self::Message,
            "enableBLOB" => return Self::EnableBlob,
            _ => {}
        }
        let Some(body) = tag.strip_suffix("Vector") else {
            return Self::Unknown;
        };
        let (Some(family), Some(kind)) = (body.get(..3), body.get(3..)) else {
            return Self::Unknown;
        };
        let Ok(kind) = kind.parse::<PropertyKind>() else {
            return Self::Unknown;
        };
        match family {
            "def" => Self::Def(kind),
            "set" => Self::Set(kind),
            // Clients never command lights.
            "new" if kind != PropertyKind::Light => Self::New(kind),
            _ => Self::Unknown,
        }
    }

    pub fn kind(self) -> Option<PropertyKind> {
        match self {
            Self::Def(kind) | Self::Set(kind) | Self::New(kind) => Some(kind),
            _ => None,
        }
    }
}

/// A member of a `set*`/`new*` vector that could not be decoded.
#[derive(Debug)]
pub struct SkippedMember {
    /// Element name, empty when the member had none.
    pub name: String,
    pub reason: PropertyError,
}

/// A decoded update plus the members dropped on the way.
#[derive(Debug)]
pub struct ParsedUpdate {
    pub update: PropertyUpdate,
    pub skipped: Vec<SkippedMember>,
}

pub fn required_attribute<'a>(element: &'a XmlElement, name: &str) -> Result<&'a str> {
    element
        .attribute(name)
        .ok_or_else(|| PropertyError::MalformedMessage(format!("{} missing attribute {name}", element.tag())))
}

fn optional_number(element: &XmlElement, name: &str) -> Result<Option<f64>> {
    element.attribute(name).map(parse_number).transpose()
}

/// Build a vector from a `def*Vector` element.
///
/// Missing `perm` reads as read-only, missing `state` as Idle and a missing
/// switch `rule` as AnyOfMany.
pub fn parse_definition(element: &XmlElement) -> Result<PropertyVector> {
    let MessageTag::Def(kind) = MessageTag::classify(element.tag()) else {
        return Err(PropertyError::MalformedMessage(format!(
            "{} is not a definition",
            element.tag()
        )));
    };
    let device = required_attribute(element, "device")?;
    let name = required_attribute(element, "name")?;
    let member_tag = format!("def{kind}");
    let members = element.children().iter().filter(|c| c.tag() == member_tag);

    let elements = match kind {
        PropertyKind::Number => Elements::Number(
            members
                .map(|m| {
                    let name = required_attribute(m, "name")?;
                    Ok(NumberElement::new(
                        name,
                        m.attribute("label").unwrap_or(name),
                        m.attribute("format").unwrap_or("%g"),
                        optional_number(m, "min")?.unwrap_or(0.0),
                        optional_number(m, "max")?.unwrap_or(0.0),
                        optional_number(m, "step")?.unwrap_or(0.0),
                        parse_number(m.text())?,
                    ))
                })
                .collect::<Result<_>>()?,
        ),
        PropertyKind::Text => Elements::Text(
            members
                .map(|m| {
                    let name = required_attribute(m, "name")?;
                    Ok(TextElement::new(name, m.attribute("label").unwrap_or(name), m.text()))
                })
                .collect::<Result<_>>()?,
        ),
        PropertyKind::Switch => Elements::Switch {
            rule: element
                .attribute("rule")
                .map(str::parse)
                .transpose()?
                .unwrap_or(SwitchRule::AnyOfMany),
            elements: members
                .map(|m| {
                    let name = required_attribute(m, "name")?;
                    Ok(SwitchElement::new(
                        name,
                        m.attribute("label").unwrap_or(name),
                        m.text().parse()?,
                    ))
                })
                .collect::<Result<_>>()?,
        },
        PropertyKind::Light => Elements::Light(
            members
                .map(|m| {
                    let name = required_attribute(m, "name")?;
                    Ok(LightElement::new(
                        name,
                        m.attribute("label").unwrap_or(name),
                        m.text().parse()?,
                    ))
                })
                .collect::<Result<_>>()?,
        ),
        PropertyKind::Blob => Elements::Blob(
            members
                .map(|m| {
                    let name = required_attribute(m, "name")?;
                    Ok(BlobElement::new(
                        name,
                        m.attribute("label").unwrap_or(name),
                        m.attribute("format").unwrap_or_default(),
                    ))
                })
                .collect::<Result<_>>()?,
        ),
    };

    let mut vector = PropertyVector::new(device, name, elements)?
        .with_label(element.attribute("label").unwrap_or(name))
        .with_group(element.attribute("group").unwrap_or_default())
        .with_permission(
            element
                .attribute("perm")
                .map(str::parse)
                .transpose()?
                .unwrap_or(Permission::ReadOnly),
        )
        .with_state(
            element
                .attribute("state")
                .map(str::parse)
                .transpose()?
                .unwrap_or(PropertyState::Idle),
        )
        .with_timeout(optional_number(element, "timeout")?.unwrap_or(0.0));
    vector.timestamp = element.attribute("timestamp").map(str::to_string);
    Ok(vector)
}

/// Decode a `set*Vector` or `new*Vector` element.
///
/// Members that fail to decode are collected in [`ParsedUpdate::skipped`]
/// and left out of the update.
pub fn parse_update(element: &XmlElement) -> Result<ParsedUpdate> {
    let kind = match MessageTag::classify(element.tag()) {
        MessageTag::Set(kind) | MessageTag::New(kind) => kind,
        _ => {
            return Err(PropertyError::MalformedMessage(format!(
                "{} is not a value update",
                element.tag()
            )))
        }
    };
    let mut update = PropertyUpdate::new(
        required_attribute(element, "device")?,
        required_attribute(element, "name")?,
        kind,
    );
    update.state = element.attribute("state").map(str::parse).transpose()?;
    update.timeout = optional_number(element, "timeout")?;
    update.timestamp = element.attribute("timestamp").map(str::to_string);
    update.message = element.attribute("message").map(str::to_string);

    let member_tag = format!("one{kind}");
    let mut skipped = Vec::new();
    for member in element.children() {
        if member.tag() != member_tag {
            tracing::debug!(tag = member.tag(), expected = %member_tag, "ignoring foreign member");
            continue;
        }
        let name = member.attribute("name").unwrap_or_default();
        let decoded = if name.is_empty() {
            Err(PropertyError::MalformedMessage(format!("{member_tag} missing attribute name")))
        } else {
            decode_member(kind, member)
        };
        match decoded {
            Ok(value) => update.push(name, value),
            Err(reason) => skipped.push(SkippedMember {
                name: name.to_string(),
                reason,
            }),
        }
    }
    Ok(ParsedUpdate { update, skipped })
}

fn decode_member(kind: PropertyKind, member: &XmlElement) -> Result<ElementValue> {
    Ok(match kind {
        PropertyKind::Number => ElementValue::Number(NumberValue {
            value: parse_number(member.text())?,
            min: optional_number(member, "min")?,
            max: optional_number(member, "max")?,
            step: optional_number(member, "step")?,
        }),
        PropertyKind::Text => ElementValue::Text(member.text().to_string()),
        PropertyKind::Switch => ElementValue::Switch(member.text().parse()?),
        PropertyKind::Light => ElementValue::Light(member.text().parse()?),
        PropertyKind::Blob => {
            let size = required_attribute(member, "size")?;
            let size = size
                .trim()
                .parse::<usize>()
                .map_err(|_| PropertyError::InvalidNumber(size.to_string()))?;
            let format = required_attribute(member, "format")?.to_string();
            let enclen = member
                .attribute("enclen")
                .map(|v| {
                    v.trim()
                        .parse::<usize>()
                        .map_err(|_| PropertyError::InvalidNumber(v.to_string()))
                })
                .transpose()?;
            let payload = if size == 0 {
                Bytes::new()
            } else {
                BlobFrame::decode(member.text(), enclen)?
            };
            ElementValue::Blob(BlobValue { format, size, payload })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> XmlElement {
        XmlElement::parse(xml.as_bytes()).unwrap()
    }

    #[test]
    fn classify_tags() {
        assert_eq!(MessageTag::classify("defNumberVector"), MessageTag::Def(PropertyKind::Number));
        assert_eq!(MessageTag::classify("setBLOBVector"), MessageTag::Set(PropertyKind::Blob));
        assert_eq!(MessageTag::classify("newSwitchVector"), MessageTag::New(PropertyKind::Switch));
        assert_eq!(MessageTag::classify("newLightVector"), MessageTag::Unknown);
        assert_eq!(MessageTag::classify("getProperties"), MessageTag::GetProperties);
        assert_eq!(MessageTag::classify("Vector"), MessageTag::Unknown);
        assert_eq!(MessageTag::classify("pingRequest"), MessageTag::Unknown);
    }

    #[test]
    fn definition_with_defaults() {
        let vector = parse_definition(&parse(
            "<defSwitchVector device='Sim' name='CONNECTION'>\
               <defSwitch name='CONNECT'>On</defSwitch>\
               <defSwitch name='DISCONNECT' label='Disconnect'>Off</defSwitch>\
             </defSwitchVector>",
        ))
        .unwrap();
        assert_eq!(vector.permission, Permission::ReadOnly);
        assert_eq!(vector.state, PropertyState::Idle);
        assert_eq!(vector.rule(), Some(SwitchRule::AnyOfMany));
        assert_eq!(vector.label, "CONNECTION");
        assert_eq!(vector.switch("CONNECT").unwrap().label, "CONNECT");
        assert_eq!(vector.switch("DISCONNECT").unwrap().label, "Disconnect");
    }

    #[test]
    fn definition_of_numbers() {
        let vector = parse_definition(&parse(
            "<defNumberVector device='Sim' name='TARGET' label='Target' group='Main' state='Ok' perm='rw' timeout='60'>\
               <defNumber name='VALUE' label='Value' format='%6.2f' min='0' max='100' step='1'>50</defNumber>\
               <defNumber name='RA' format='%010.6m' min='0' max='24' step='0'>5:30:00</defNumber>\
             </defNumberVector>",
        ))
        .unwrap();
        assert_eq!(vector.group, "Main");
        assert_eq!(vector.permission, Permission::ReadWrite);
        assert_eq!(vector.timeout, 60.0);
        assert_eq!(vector.number("VALUE").unwrap().value, 50.0);
        assert_eq!(vector.number("RA").unwrap().value, 5.5);
    }

    #[test]
    fn definition_rejects_bad_tokens() {
        let bad_perm = parse(
            "<defTextVector device='Sim' name='X' perm='rx'><defText name='A'>a</defText></defTextVector>",
        );
        assert!(matches!(
            parse_definition(&bad_perm),
            Err(PropertyError::InvalidToken { what: "permission", .. })
        ));
        let no_device = parse("<defTextVector name='X'><defText name='A'>a</defText></defTextVector>");
        assert!(matches!(
            parse_definition(&no_device),
            Err(PropertyError::MalformedMessage(_))
        ));
    }

    #[test]
    fn escaped_label_roundtrip() {
        let vector = parse_definition(&parse(
            "<defTextVector device='Sim' name='INFO' label='a &lt;b&gt; &amp; &quot;c&quot;'>\
               <defText name='T'>x</defText>\
             </defTextVector>",
        ))
        .unwrap();
        assert_eq!(vector.label, "a <b> & \"c\"");
    }

    #[test]
    fn update_skips_undecodable_members() {
        let parsed = parse_update(&parse(
            "<newNumberVector device='Sim' name='TARGET'>\
               <oneNumber name='A'>1.5</oneNumber>\
               <oneNumber name='B'>abc</oneNumber>\
               <oneNumber>3</oneNumber>\
               <oneText name='C'>ignored</oneText>\
             </newNumberVector>",
        ))
        .unwrap();
        assert_eq!(parsed.update.numbers(), [("A", 1.5)]);
        assert_eq!(parsed.skipped.len(), 2);
        assert_eq!(parsed.skipped[0].name, "B");
        assert!(matches!(parsed.skipped[0].reason, PropertyError::InvalidNumber(_)));
    }

    #[test]
    fn update_reads_vector_attributes() {
        let parsed = parse_update(&parse(
            "<setLightVector device='Sim' name='STATUS' state='Busy' timestamp='2024-01-01T00:00:00' message='hi'>\
               <oneLight name='L'>Alert</oneLight>\
             </setLightVector>",
        ))
        .unwrap();
        let update = parsed.update;
        assert_eq!(update.state, Some(PropertyState::Busy));
        assert_eq!(update.timestamp.as_deref(), Some("2024-01-01T00:00:00"));
        assert_eq!(update.message.as_deref(), Some("hi"));
        assert_eq!(update.value("L"), Some(&ElementValue::Light(PropertyState::Alert)));
    }

    #[test]
    fn blob_members() {
        let parsed = parse_update(&parse(
            "<setBLOBVector device='Cam' name='CCD1'>\
               <oneBLOB name='IMG' size='5' format='.fits' enclen='8'>aGVs\nbG8=\n</oneBLOB>\
               <oneBLOB name='EMPTY' size='0' format='.fits' enclen='0'></oneBLOB>\
               <oneBLOB name='LIAR' size='5' format='.fits' enclen='12'>aGVsbG8=</oneBLOB>\
               <oneBLOB name='NOSIZE' format='.fits'>aGVsbG8=</oneBLOB>\
             </setBLOBVector>",
        ))
        .unwrap();
        let blobs = parsed.update.blobs();
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].1.payload.as_ref(), b"hello");
        assert!(blobs[1].1.payload.is_empty());
        let skipped: Vec<&str> = parsed.skipped.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(skipped, ["LIAR", "NOSIZE"]);
    }
}
