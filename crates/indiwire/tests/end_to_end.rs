#![cfg(all(feature = "driver", feature = "client"))]

use std::io::{Cursor, Write};

use indiwire::client::{ClientMirror, MirrorObserver, Outcome};
use indiwire::codec::{ElementReader, XmlElement};
use indiwire::driver::{Dispatcher, Driver, DriverRunner, DriverSession, Result};
use indiwire::property::{BlobPolicy, NumberElement, PropertyVector};

struct Sim;

impl Driver for Sim {
    fn get_properties<W: Write>(&mut self, session: &mut DriverSession<W>, _device: Option<&str>) -> Result<()> {
        session.define(PropertyVector::new_number(
            "Sim",
            "TARGET",
            vec![NumberElement::new("VALUE", "Value", "%g", 0.0, 100.0, 1.0, 50.0)],
        )?)?;
        Ok(())
    }
}

#[derive(Default)]
struct Counter {
    devices: usize,
    properties: usize,
    numbers: usize,
}

impl MirrorObserver for Counter {
    fn new_device(&mut self, _device: &indiwire::client::Device) {
        self.devices += 1;
    }

    fn new_property(&mut self, _property: &PropertyVector) {
        self.properties += 1;
    }

    fn new_number(&mut self, _property: &PropertyVector) {
        self.numbers += 1;
    }
}

/// Run the driver over `input` and return everything it wrote.
fn drive(input: &[u8]) -> Vec<u8> {
    let dispatcher = Dispatcher::new("Sim", Sim, Vec::new());
    let mut runner = DriverRunner::new(Cursor::new(input.to_vec()), dispatcher);
    runner.run().expect("driver loop should end cleanly at EOF");
    let (_, session) = runner.into_dispatcher().into_parts();
    session.into_writer()
}

fn mirror_all(mirror: &mut ClientMirror<Counter>, output: Vec<u8>) -> Vec<Outcome> {
    ElementReader::new(Cursor::new(output))
        .map(|element| {
            let element = element.expect("driver output should parse");
            mirror.dispatch(&element).expect("mirror should accept driver output")
        })
        .collect()
}

fn value(mirror: &ClientMirror<Counter>) -> f64 {
    mirror
        .device("Sim")
        .and_then(|d| d.number("TARGET"))
        .and_then(|p| p.number("VALUE"))
        .map(|e| e.value)
        .expect("Sim.TARGET.VALUE should be mirrored")
}

#[test]
fn definition_and_update_reach_the_mirror() {
    let mut mirror = ClientMirror::new(Counter::default());
    mirror.get_properties();
    let request = mirror.take_outgoing();

    let outcomes = mirror_all(&mut mirror, drive(&request));
    assert_eq!(outcomes, [Outcome::Defined]);
    assert_eq!(value(&mirror), 50.0);

    mirror.send_new_number("Sim", "TARGET", &[("VALUE", 75.0)]).unwrap();
    let mut commands = request.to_vec();
    commands.extend_from_slice(&mirror.take_outgoing());

    // The replayed definition is absorbed as a duplicate; the update lands once.
    let outcomes = mirror_all(&mut mirror, drive(&commands));
    assert_eq!(outcomes, [Outcome::Duplicate, Outcome::Updated]);
    assert_eq!(value(&mirror), 75.0);

    let observer = mirror.observer();
    assert_eq!(observer.devices, 1);
    assert_eq!(observer.properties, 1);
    assert_eq!(observer.numbers, 1);
}

#[test]
fn rejected_command_comes_back_as_alert() {
    let mut mirror = ClientMirror::new(Counter::default());
    mirror.get_properties();
    let mut commands = mirror.take_outgoing().to_vec();
    mirror_all(&mut mirror, drive(&commands));

    mirror.send_new_number("Sim", "TARGET", &[("VALUE", 150.0)]).unwrap();
    commands.extend_from_slice(&mirror.take_outgoing());
    mirror_all(&mut mirror, drive(&commands));

    let target = mirror.device("Sim").and_then(|d| d.number("TARGET")).unwrap();
    assert_eq!(target.state, indiwire::property::PropertyState::Alert);
    assert_eq!(target.number("VALUE").unwrap().value, 50.0);
    let log = mirror.device("Sim").unwrap().last_message().unwrap();
    assert!(log.contains("VALUE"), "rejection reason should be logged: {log}");
}

#[test]
fn escaped_labels_survive_the_trip() {
    let mut session = DriverSession::new("Sim", Vec::new());
    session
        .define(
            PropertyVector::new_number(
                "Sim",
                "LIMITS",
                vec![NumberElement::new("MAX", "a < b & \"c\"", "%g", 0.0, 1.0, 0.0, 1.0)],
            )
            .unwrap()
            .with_label("Limits <&> \"quoted\""),
        )
        .unwrap();

    let mut mirror = ClientMirror::new(Counter::default());
    let element = XmlElement::parse(session.writer()).unwrap();
    mirror.dispatch(&element).unwrap();
    let limits = mirror.device("Sim").unwrap().number("LIMITS").unwrap();
    assert_eq!(limits.label, "Limits <&> \"quoted\"");
    assert_eq!(limits.number("MAX").unwrap().label, "a < b & \"c\"");
}

#[test]
fn blob_mode_request_is_well_formed() {
    let mut mirror = ClientMirror::new(Counter::default());
    mirror.set_blob_mode(BlobPolicy::Also, "Sim", None);
    let element = XmlElement::parse(&mirror.take_outgoing()).unwrap();
    assert_eq!(element.tag(), "enableBLOB");
    assert_eq!(element.attribute("device"), Some("Sim"));
    assert_eq!(element.text(), "Also");
}
