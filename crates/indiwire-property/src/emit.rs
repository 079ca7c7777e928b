//! Rendering of protocol messages into a byte buffer.
//!
//! Every emitter appends one complete top-level element followed by a
//! newline. Vectors without a timestamp are stamped with the current UTC time.

use bytes::BytesMut;
use indiwire_codec::{escape, BlobFrame, BLOB_LINE_WIDTH};

use crate::model::{BlobPolicy, Elements, PropertyKind, PropertyVector};
use crate::number::format_wire;
use crate::update::{ElementValue, PropertyUpdate};

/// Current UTC time in protocol form (`YYYY-MM-DDTHH:MM:SS`).
pub fn timestamp_now() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

fn push(buf: &mut BytesMut, text: &str) {
    buf.extend_from_slice(text.as_bytes());
}

fn attr(buf: &mut BytesMut, name: &str, value: &str) {
    push(buf, " ");
    push(buf, name);
    push(buf, "='");
    push(buf, &escape(value));
    push(buf, "'");
}

fn opt_attr(buf: &mut BytesMut, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        attr(buf, name, value);
    }
}

fn open(buf: &mut BytesMut, indent: &str, tag: &str) {
    push(buf, indent);
    push(buf, "<");
    push(buf, tag);
}

fn close(buf: &mut BytesMut, indent: &str, tag: &str) {
    push(buf, indent);
    push(buf, "</");
    push(buf, tag);
    push(buf, ">\n");
}

/// A member whose content fits on the tag's line.
fn member(buf: &mut BytesMut, tag: &str, text: &str) {
    push(buf, ">");
    push(buf, &escape(text));
    close(buf, "", tag);
}

/// `def*Vector` announcing a vector and its current values.
pub fn emit_definition(buf: &mut BytesMut, vector: &PropertyVector, message: Option<&str>) {
    let kind = vector.kind();
    let tag = format!("def{kind}Vector");
    let member_tag = format!("def{kind}");

    open(buf, "", &tag);
    attr(buf, "device", &vector.device);
    attr(buf, "name", &vector.name);
    attr(buf, "label", &vector.label);
    attr(buf, "group", &vector.group);
    attr(buf, "state", vector.state.as_str());
    if kind != PropertyKind::Light {
        attr(buf, "perm", vector.permission.as_str());
    }
    if let Some(rule) = vector.rule() {
        attr(buf, "rule", rule.as_str());
    }
    if kind != PropertyKind::Light {
        attr(buf, "timeout", &format_wire(vector.timeout));
    }
    attr(buf, "timestamp", &stamp(vector.timestamp.as_deref()));
    opt_attr(buf, "message", message);
    push(buf, ">\n");

    match vector.elements() {
        Elements::Number(elements) => {
            for e in elements {
                open(buf, "  ", &member_tag);
                attr(buf, "name", &e.name);
                attr(buf, "label", &e.label);
                attr(buf, "format", &e.format);
                attr(buf, "min", &format_wire(e.min));
                attr(buf, "max", &format_wire(e.max));
                attr(buf, "step", &format_wire(e.step));
                member(buf, &member_tag, &format_wire(e.value));
            }
        }
        Elements::Text(elements) => {
            for e in elements {
                open(buf, "  ", &member_tag);
                attr(buf, "name", &e.name);
                attr(buf, "label", &e.label);
                member(buf, &member_tag, &e.value);
            }
        }
        Elements::Switch { elements, .. } => {
            for e in elements {
                open(buf, "  ", &member_tag);
                attr(buf, "name", &e.name);
                attr(buf, "label", &e.label);
                member(buf, &member_tag, e.value.as_str());
            }
        }
        Elements::Light(elements) => {
            for e in elements {
                open(buf, "  ", &member_tag);
                attr(buf, "name", &e.name);
                attr(buf, "label", &e.label);
                member(buf, &member_tag, e.value.as_str());
            }
        }
        Elements::Blob(elements) => {
            for e in elements {
                open(buf, "  ", &member_tag);
                attr(buf, "name", &e.name);
                attr(buf, "label", &e.label);
                push(buf, "/>\n");
            }
        }
    }
    close(buf, "", &tag);
}

/// `set*Vector` carrying the values of `update`.
pub fn emit_update(buf: &mut BytesMut, update: &PropertyUpdate) {
    emit_update_wrapped(buf, update, BLOB_LINE_WIDTH);
}

/// [`emit_update`] with an explicit BLOB line width.
pub fn emit_update_wrapped(buf: &mut BytesMut, update: &PropertyUpdate, line_width: usize) {
    let tag = format!("set{}Vector", update.kind);
    open(buf, "", &tag);
    attr(buf, "device", &update.device);
    attr(buf, "name", &update.name);
    if let Some(state) = update.state {
        attr(buf, "state", state.as_str());
    }
    if update.kind != PropertyKind::Light {
        if let Some(timeout) = update.timeout {
            attr(buf, "timeout", &format_wire(timeout));
        }
    }
    attr(buf, "timestamp", &stamp(update.timestamp.as_deref()));
    opt_attr(buf, "message", update.message.as_deref());
    push(buf, ">\n");
    write_members(buf, update, line_width);
    close(buf, "", &tag);
}

/// `setNumberVector` republishing current values together with min, max and step.
pub fn emit_limits(buf: &mut BytesMut, vector: &PropertyVector, message: Option<&str>) {
    let mut update = PropertyUpdate::limits_from_vector(vector);
    update.message = message.map(str::to_string);
    emit_update(buf, &update);
}

/// `new*Vector` command from a client.
pub fn emit_new(buf: &mut BytesMut, update: &PropertyUpdate) {
    let tag = format!("new{}Vector", update.kind);
    open(buf, "", &tag);
    attr(buf, "device", &update.device);
    attr(buf, "name", &update.name);
    opt_attr(buf, "timestamp", update.timestamp.as_deref());
    push(buf, ">\n");
    write_members(buf, update, BLOB_LINE_WIDTH);
    close(buf, "", &tag);
}

fn write_members(buf: &mut BytesMut, update: &PropertyUpdate, line_width: usize) {
    let member_tag = format!("one{}", update.kind);
    for (name, value) in &update.values {
        open(buf, "  ", &member_tag);
        attr(buf, "name", name);
        match value {
            ElementValue::Number(number) => {
                let limits = [("min", number.min), ("max", number.max), ("step", number.step)];
                for (key, limit) in limits {
                    if let Some(limit) = limit {
                        attr(buf, key, &format_wire(limit));
                    }
                }
                member(buf, &member_tag, &format_wire(number.value));
            }
            ElementValue::Text(text) => member(buf, &member_tag, text),
            ElementValue::Switch(state) => member(buf, &member_tag, state.as_str()),
            ElementValue::Light(state) => member(buf, &member_tag, state.as_str()),
            ElementValue::Blob(blob) => {
                attr(buf, "size", &blob.size.to_string());
                attr(buf, "format", &blob.format);
                if blob.size == 0 {
                    // State-only update.
                    attr(buf, "enclen", "0");
                    push(buf, ">\n");
                } else {
                    let frame = BlobFrame::encode(blob.format.as_str(), blob.size, &blob.payload);
                    attr(buf, "enclen", &frame.enclen.to_string());
                    push(buf, ">\n");
                    push(buf, &frame.wrapped(line_width));
                }
                close(buf, "  ", &member_tag);
            }
        }
    }
}

/// `delProperty` for one vector, or for the whole device when `name` is `None`.
pub fn emit_delete(buf: &mut BytesMut, device: &str, name: Option<&str>, message: Option<&str>) {
    open(buf, "", "delProperty");
    attr(buf, "device", device);
    opt_attr(buf, "name", name);
    attr(buf, "timestamp", &timestamp_now());
    opt_attr(buf, "message", message);
    push(buf, "/>\n");
}

/// Free-form `message`, optionally bound to a device.
pub fn emit_message(buf: &mut BytesMut, device: Option<&str>, message: &str) {
    open(buf, "", "message");
    opt_attr(buf, "device", device);
    attr(buf, "timestamp", &timestamp_now());
    attr(buf, "message", message);
    push(buf, "/>\n");
}

pub fn emit_get_properties(buf: &mut BytesMut, version: &str, device: Option<&str>, name: Option<&str>) {
    open(buf, "", "getProperties");
    attr(buf, "version", version);
    opt_attr(buf, "device", device);
    opt_attr(buf, "name", name);
    push(buf, "/>\n");
}

pub fn emit_enable_blob(buf: &mut BytesMut, device: &str, name: Option<&str>, policy: BlobPolicy) {
    open(buf, "", "enableBLOB");
    attr(buf, "device", device);
    opt_attr(buf, "name", name);
    member(buf, "enableBLOB", policy.as_str());
}

fn stamp(timestamp: Option<&str>) -> String {
    match timestamp {
        Some(ts) if !ts.is_empty() => ts.to_string(),
        _ => timestamp_now(),
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use indiwire_codec::XmlElement;

    use super::*;
    use crate::model::{
        BlobElement, NumberElement, Permission, PropertyState, SwitchElement, SwitchRule, SwitchState, TextElement,
    };
    use crate::parse::{parse_definition, parse_update};
    use crate::update::BlobValue;

    fn element(buf: &BytesMut) -> XmlElement {
        XmlElement::parse(buf).unwrap()
    }

    #[test]
    fn definition_parses_back() {
        let vector = PropertyVector::new_switch(
            "Sim",
            "MODE",
            SwitchRule::OneOfMany,
            vec![
                SwitchElement::new("A", "Mode A", SwitchState::On),
                SwitchElement::new("B", "Mode B", SwitchState::Off),
            ],
        )
        .unwrap()
        .with_group("Main")
        .with_timeout(5.0)
        .with_timestamp("2024-05-01T10:00:00");

        let mut buf = BytesMut::new();
        emit_definition(&mut buf, &vector, None);
        let text = std::str::from_utf8(&buf).unwrap();
        assert!(text.starts_with("<defSwitchVector device='Sim' name='MODE'"));
        assert!(text.contains("rule='OneOfMany'"));
        assert!(text.contains("timestamp='2024-05-01T10:00:00'"));
        assert!(text.ends_with("</defSwitchVector>\n"));

        assert_eq!(parse_definition(&element(&buf)).unwrap(), vector);
    }

    #[test]
    fn label_escaping_roundtrip() {
        let vector = PropertyVector::new_text("Sim", "INFO", vec![TextElement::new("T", "<&\">", "a < b & \"c\"")])
            .unwrap()
            .with_label("Tom & \"Jerry\" <x>")
            .with_permission(Permission::ReadOnly)
            .with_timestamp("2024-05-01T10:00:00");
        let mut buf = BytesMut::new();
        emit_definition(&mut buf, &vector, Some("it's <ok>"));

        let text = std::str::from_utf8(&buf).unwrap();
        assert!(text.contains("label='Tom &amp; &quot;Jerry&quot; &lt;x&gt;'"));
        assert!(text.contains("message='it&apos;s &lt;ok&gt;'"));

        let parsed = parse_definition(&element(&buf)).unwrap();
        assert_eq!(parsed.label, "Tom & \"Jerry\" <x>");
        assert_eq!(parsed.text("T").unwrap().label, "<&\">");
        assert_eq!(parsed.text("T").unwrap().value, "a < b & \"c\"");
    }

    #[test]
    fn lights_have_no_perm_or_timeout() {
        let vector = PropertyVector::new_light(
            "Sim",
            "STATUS",
            vec![crate::model::LightElement::new("L", "", PropertyState::Busy)],
        )
        .unwrap();
        let mut buf = BytesMut::new();
        emit_definition(&mut buf, &vector, None);
        emit_update(&mut buf, &PropertyUpdate::from_vector(&vector));
        let text = std::str::from_utf8(&buf).unwrap();
        assert!(!text.contains("perm="));
        assert!(!text.contains("timeout="));
    }

    #[test]
    fn update_with_limits() {
        let vector = PropertyVector::new_number(
            "Sim",
            "TARGET",
            vec![NumberElement::new("VALUE", "", "%g", 0.0, 100.0, 0.5, 75.0)],
        )
        .unwrap()
        .with_state(PropertyState::Ok);
        let mut buf = BytesMut::new();
        emit_limits(&mut buf, &vector, None);
        let text = std::str::from_utf8(&buf).unwrap();
        assert!(text.contains("<oneNumber name='VALUE' min='0' max='100' step='0.5'>75</oneNumber>"));
        assert!(text.contains("state='Ok'"));
    }

    #[test]
    fn blob_update_wraps_content() {
        let payload = Bytes::from(vec![7u8; 100]);
        let mut vector = PropertyVector::new_blob("Cam", "CCD1", vec![BlobElement::new("IMG", "", "")]).unwrap();
        vector
            .apply_blobs(&[(
                "IMG",
                BlobValue {
                    format: ".fits".into(),
                    size: 100,
                    payload: payload.clone(),
                },
            )])
            .unwrap();

        let mut buf = BytesMut::new();
        emit_update(&mut buf, &PropertyUpdate::from_vector(&vector));
        let text = std::str::from_utf8(&buf).unwrap();
        assert!(text.contains("enclen='136'"));
        assert!(text
            .lines()
            .filter(|line| !line.trim_start().starts_with('<'))
            .all(|line| line.len() <= BLOB_LINE_WIDTH));

        let parsed = parse_update(&element(&buf)).unwrap();
        assert!(parsed.skipped.is_empty());
        assert_eq!(parsed.update.blobs()[0].1.payload, payload);
    }

    #[test]
    fn empty_blob_is_state_only() {
        let vector = PropertyVector::new_blob("Cam", "CCD1", vec![BlobElement::new("IMG", "", ".fits")])
            .unwrap()
            .with_state(PropertyState::Alert);
        let mut buf = BytesMut::new();
        emit_update(&mut buf, &PropertyUpdate::from_vector(&vector));
        let text = std::str::from_utf8(&buf).unwrap();
        assert!(text.contains("size='0' format='.fits' enclen='0'>\n  </oneBLOB>"));
    }

    #[test]
    fn control_messages() {
        let mut buf = BytesMut::new();
        emit_get_properties(&mut buf, "1.7", Some("Sim"), None);
        emit_enable_blob(&mut buf, "Cam", Some("CCD1"), BlobPolicy::Also);
        emit_delete(&mut buf, "Sim", None, Some("bye"));
        emit_message(&mut buf, Some("Sim"), "hello");

        let text = std::str::from_utf8(&buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "<getProperties version='1.7' device='Sim'/>");
        assert_eq!(lines[1], "<enableBLOB device='Cam' name='CCD1'>Also</enableBLOB>");
        assert!(lines[2].starts_with("<delProperty device='Sim' timestamp='"));
        assert!(lines[2].ends_with("message='bye'/>"));
        assert!(lines[3].contains("message='hello'"));
    }

    #[test]
    fn new_vector_has_no_state() {
        let mut update = PropertyUpdate::new("Sim", "MODE", PropertyKind::Switch);
        update.push("B", ElementValue::Switch(SwitchState::On));
        let mut buf = BytesMut::new();
        emit_new(&mut buf, &update);
        assert_eq!(
            std::str::from_utf8(&buf).unwrap(),
            "<newSwitchVector device='Sim' name='MODE'>\n  <oneSwitch name='B'>On</oneSwitch>\n</newSwitchVector>\n"
        );
    }

    #[test]
    fn timestamp_shape() {
        let ts = timestamp_now();
        assert_eq!(ts.len(), 19);
        assert_eq!(&ts[10..11], "T");
    }
}
