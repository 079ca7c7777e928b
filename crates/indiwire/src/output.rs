use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use indiwire_property::{Elements, PropertyVector};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct PropertyOutput<'a> {
    device: &'a str,
    name: &'a str,
    label: &'a str,
    group: &'a str,
    kind: &'static str,
    state: &'static str,
    permission: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<&'a str>,
    elements: Vec<ElementOutput<'a>>,
}

#[derive(Serialize)]
struct ElementOutput<'a> {
    name: &'a str,
    label: &'a str,
    value: Value,
}

pub fn print_properties<'a>(properties: impl IntoIterator<Item = &'a PropertyVector>, format: OutputFormat) {
    let properties: Vec<&PropertyVector> = properties.into_iter().collect();
    match format {
        OutputFormat::Json => {
            let out: Vec<PropertyOutput<'_>> = properties.iter().map(|p| property_output(p)).collect();
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["DEVICE", "PROPERTY", "ELEMENT", "VALUE", "STATE", "PERM"]);
            for property in &properties {
                for (element, value) in display_values(property) {
                    table.add_row(vec![
                        property.device.clone(),
                        property.name.clone(),
                        element.to_string(),
                        value,
                        property.state.to_string(),
                        property.permission.to_string(),
                    ]);
                }
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for property in &properties {
                for line in pretty_lines(property) {
                    println!("{line}");
                }
            }
        }
    }
}

/// `device.property.element=value` lines.
pub fn pretty_lines(property: &PropertyVector) -> Vec<String> {
    display_values(property)
        .into_iter()
        .map(|(element, value)| format!("{}.{}.{element}={value}", property.device, property.name))
        .collect()
}

fn property_output(property: &PropertyVector) -> PropertyOutput<'_> {
    let elements = match property.elements() {
        Elements::Number(elements) => elements
            .iter()
            .map(|e| element_output(&e.name, &e.label, json!(e.value)))
            .collect(),
        Elements::Text(elements) => elements
            .iter()
            .map(|e| element_output(&e.name, &e.label, json!(e.value)))
            .collect(),
        Elements::Switch { elements, .. } => elements
            .iter()
            .map(|e| element_output(&e.name, &e.label, json!(e.value.as_str())))
            .collect(),
        Elements::Light(elements) => elements
            .iter()
            .map(|e| element_output(&e.name, &e.label, json!(e.value.as_str())))
            .collect(),
        Elements::Blob(elements) => elements
            .iter()
            .map(|e| element_output(&e.name, &e.label, json!({ "format": e.format, "size": e.size })))
            .collect(),
    };
    PropertyOutput {
        device: &property.device,
        name: &property.name,
        label: &property.label,
        group: &property.group,
        kind: property.kind().as_str(),
        state: property.state.as_str(),
        permission: property.permission.as_str(),
        timestamp: property.timestamp.as_deref(),
        elements,
    }
}

fn element_output<'a>(name: &'a str, label: &'a str, value: Value) -> ElementOutput<'a> {
    ElementOutput { name, label, value }
}

fn display_values(property: &PropertyVector) -> Vec<(&str, String)> {
    match property.elements() {
        Elements::Number(elements) => elements.iter().map(|e| (e.name.as_str(), e.formatted())).collect(),
        Elements::Text(elements) => elements.iter().map(|e| (e.name.as_str(), e.value.clone())).collect(),
        Elements::Switch { elements, .. } => elements
            .iter()
            .map(|e| (e.name.as_str(), e.value.to_string()))
            .collect(),
        Elements::Light(elements) => elements
            .iter()
            .map(|e| (e.name.as_str(), e.value.to_string()))
            .collect(),
        Elements::Blob(elements) => elements
            .iter()
            .map(|e| (e.name.as_str(), format!("<{} bytes {}>", e.size, e.format)))
            .collect(),
    }
}
