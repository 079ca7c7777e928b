use indiwire_client::{ClientMirror, NullObserver};
use indiwire_property::PropertyVector;

use crate::cmd::{connect, pump, GetArgs};
use crate::exit::{client_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{print_properties, OutputFormat};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    device: String,
    property: Option<String>,
}

impl Target {
    fn matches(&self, vector: &PropertyVector) -> bool {
        vector.device == self.device && self.property.as_ref().is_none_or(|p| *p == vector.name)
    }
}

pub fn run(args: GetArgs, format: OutputFormat) -> CliResult<i32> {
    let targets = args
        .targets
        .iter()
        .map(|t| parse_target(t))
        .collect::<CliResult<Vec<_>>>()?;
    let mut connection = connect(&args.server)?;

    let mut mirror = ClientMirror::new(NullObserver);
    for target in &targets {
        match &target.property {
            Some(property) => mirror.watch_property(&target.device, property),
            None => mirror.watch_device(&target.device),
        }
    }
    mirror.get_properties();
    mirror
        .flush_to(&mut connection.writer)
        .map_err(|err| client_error("send failed", err))?;

    // Definitions keep coming until the server goes quiet.
    pump(&mut mirror, &mut connection.reader, |_| false)?;

    let properties: Vec<&PropertyVector> = mirror
        .devices()
        .flat_map(|device| device.properties())
        .filter(|vector| targets.is_empty() || targets.iter().any(|t| t.matches(vector)))
        .collect();
    if properties.is_empty() {
        return Err(CliError::new(FAILURE, "no matching properties received"));
    }
    tracing::debug!(properties = properties.len(), "printing");
    print_properties(properties, format);
    Ok(SUCCESS)
}

/// `device` or `device.property`.
fn parse_target(input: &str) -> CliResult<Target> {
    let (device, property) = match input.split_once('.') {
        Some((device, property)) => (device, Some(property)),
        None => (input, None),
    };
    if device.is_empty() || property.is_some_and(str::is_empty) {
        return Err(CliError::new(USAGE, format!("invalid target: {input}")));
    }
    Ok(Target {
        device: device.to_string(),
        property: property.map(str::to_string),
    })
}
