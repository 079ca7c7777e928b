use std::fs;
use std::path::Path;

use indiwire_client::{ClientMirror, NullObserver};
use indiwire_property::{parse_number, Permission, PropertyKind, SwitchState};

use crate::cmd::{connect, pump, SetArgs};
use crate::exit::{
    client_error, io_error, property_error, CliError, CliResult, PERMISSION_DENIED, SUCCESS, TIMEOUT, USAGE,
};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Assignment {
    device: String,
    property: String,
    element: String,
    value: String,
}

/// Assignments for one property, in command-line order.
#[derive(Debug)]
struct Command {
    device: String,
    property: String,
    values: Vec<(String, String)>,
}

pub fn run(args: SetArgs) -> CliResult<i32> {
    let assignments = args
        .assignments
        .iter()
        .map(|a| parse_assignment(a))
        .collect::<CliResult<Vec<_>>>()?;
    let commands = group(assignments);
    let mut connection = connect(&args.server)?;

    let mut mirror = ClientMirror::new(NullObserver);
    for command in &commands {
        mirror.watch_property(&command.device, &command.property);
    }
    mirror.get_properties();
    mirror
        .flush_to(&mut connection.writer)
        .map_err(|err| client_error("send failed", err))?;

    let defined = pump(&mut mirror, &mut connection.reader, |mirror| {
        commands.iter().all(|c| {
            mirror
                .device(&c.device)
                .and_then(|d| d.property(&c.property))
                .is_some()
        })
    })?;
    if !defined {
        let missing: Vec<String> = commands
            .iter()
            .filter(|c| {
                mirror
                    .device(&c.device)
                    .and_then(|d| d.property(&c.property))
                    .is_none()
            })
            .map(|c| format!("{}.{}", c.device, c.property))
            .collect();
        return Err(CliError::new(
            TIMEOUT,
            format!("server did not define {}", missing.join(", ")),
        ));
    }

    for command in &commands {
        send(&mut mirror, command)?;
    }
    mirror
        .flush_to(&mut connection.writer)
        .map_err(|err| client_error("send failed", err))?;
    Ok(SUCCESS)
}

fn send(mirror: &mut ClientMirror<NullObserver>, command: &Command) -> CliResult<()> {
    let (device, property) = (command.device.as_str(), command.property.as_str());
    let Some(vector) = mirror.device(device).and_then(|d| d.property(property)) else {
        return Err(CliError::new(USAGE, format!("{device}.{property} is not defined")));
    };
    if vector.permission == Permission::ReadOnly {
        return Err(CliError::new(
            PERMISSION_DENIED,
            format!("{device}.{property} is read-only"),
        ));
    }

    let sent = match vector.kind() {
        PropertyKind::Number => {
            let values = command
                .values
                .iter()
                .map(|(element, value)| {
                    parse_number(value)
                        .map(|number| (element.as_str(), number))
                        .map_err(|err| property_error(&format!("bad value for {element}"), err))
                })
                .collect::<CliResult<Vec<_>>>()?;
            mirror.send_new_number(device, property, &values)
        }
        PropertyKind::Text => {
            let values: Vec<(&str, &str)> = command
                .values
                .iter()
                .map(|(element, value)| (element.as_str(), value.as_str()))
                .collect();
            mirror.send_new_text(device, property, &values)
        }
        PropertyKind::Switch => {
            let values = command
                .values
                .iter()
                .map(|(element, value)| {
                    value
                        .parse::<SwitchState>()
                        .map(|state| (element.as_str(), state))
                        .map_err(|err| property_error(&format!("bad value for {element}"), err))
                })
                .collect::<CliResult<Vec<_>>>()?;
            mirror.send_new_switch(device, property, &values)
        }
        PropertyKind::Blob => {
            for (element, path) in &command.values {
                let path = Path::new(path);
                let payload =
                    fs::read(path).map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
                mirror
                    .send_new_blob(device, property, element, &blob_format(path), payload)
                    .map_err(|err| client_error("set failed", err))?;
            }
            Ok(())
        }
        PropertyKind::Light => {
            return Err(CliError::new(
                PERMISSION_DENIED,
                format!("{device}.{property} is a light and cannot be set"),
            ))
        }
    };
    sent.map_err(|err| client_error("set failed", err))?;
    tracing::info!(device, property, "new values sent");
    Ok(())
}

/// `device.property.element=value`. Only the device may contain dots.
fn parse_assignment(input: &str) -> CliResult<Assignment> {
    let invalid = || CliError::new(USAGE, format!("invalid assignment: {input}"));
    let (path, value) = input.split_once('=').ok_or_else(invalid)?;
    let mut parts = path.rsplitn(3, '.');
    let (Some(element), Some(property), Some(device)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    if [device, property, element].iter().any(|part| part.is_empty()) {
        return Err(invalid());
    }
    Ok(Assignment {
        device: device.to_string(),
        property: property.to_string(),
        element: element.to_string(),
        value: value.to_string(),
    })
}

fn group(assignments: Vec<Assignment>) -> Vec<Command> {
    let mut commands: Vec<Command> = Vec::new();
    for assignment in assignments {
        let pair = (assignment.element, assignment.value);
        match commands
            .iter_mut()
            .find(|c| c.device == assignment.device && c.property == assignment.property)
        {
            Some(command) => command.values.push(pair),
            None => commands.push(Command {
                device: assignment.device,
                property: assignment.property,
                values: vec![pair],
            }),
        }
    }
    commands
}

/// BLOB format tag from a file name: `image.fits.z` gives `.fits.z`.
fn blob_format(path: &Path) -> String {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    match name.find('.') {
        Some(dot) if dot > 0 => name[dot..].to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_assignment_splits_from_the_right() {
        let assignment = parse_assignment("CCD v1.2.EXPOSURE.SECONDS=1.5").unwrap();
        assert_eq!(assignment.device, "CCD v1.2");
        assert_eq!(assignment.property, "EXPOSURE");
        assert_eq!(assignment.element, "SECONDS");
        assert_eq!(assignment.value, "1.5");

        assert_eq!(parse_assignment("Sim.NOTE.TEXT=a=b").unwrap().value, "a=b");
    }

    #[test]
    fn parse_assignment_rejects_incomplete_paths() {
        assert!(parse_assignment("Sim.TARGET=5").is_err());
        assert!(parse_assignment("Sim.TARGET.VALUE").is_err());
        assert!(parse_assignment(".TARGET.VALUE=5").is_err());
    }

    #[test]
    fn group_keeps_order_per_property() {
        let assignments = ["Sim.MODE.FAST=Off", "Sim.TARGET.VALUE=5", "Sim.MODE.SLOW=On"]
            .iter()
            .map(|a| parse_assignment(a).unwrap())
            .collect();
        let commands = group(assignments);
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].property, "MODE");
        assert_eq!(
            commands[0].values,
            [("FAST".to_string(), "Off".to_string()), ("SLOW".to_string(), "On".to_string())]
        );
    }

    #[test]
    fn blob_format_from_file_name() {
        assert_eq!(blob_format(Path::new("/tmp/frame.fits.z")), ".fits.z");
        assert_eq!(blob_format(Path::new("raw")), "");
        assert_eq!(blob_format(Path::new(".hidden")), "");
    }
}
