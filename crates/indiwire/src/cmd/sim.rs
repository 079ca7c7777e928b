use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indiwire_driver::{DispatchError, Dispatcher, Driver, DriverConfig, DriverRunner, DriverSession, Result};
use indiwire_property::{
    BlobElement, LightElement, NumberElement, PropertyState, PropertyUpdate, PropertyVector, SwitchElement,
    SwitchRule, SwitchState, TextElement,
};

use crate::cmd::SimArgs;
use crate::exit::{dispatch_error, property_error, CliError, CliResult, INTERNAL, SUCCESS};

const TARGET: &str = "TARGET";
const STATUS: &str = "STATUS";
const CONFIG_PROCESS: &str = "CONFIG_PROCESS";

/// A device with one of each property kind and no hardware behind it.
pub struct Simulator {
    device: String,
}

impl Simulator {
    pub fn new(device: impl Into<String>) -> Self {
        Self { device: device.into() }
    }

    fn properties(&self) -> indiwire_property::Result<Vec<PropertyVector>> {
        let device = self.device.as_str();
        Ok(vec![
            PropertyVector::new_number(
                device,
                TARGET,
                vec![NumberElement::new("VALUE", "Value", "%g", 0.0, 100.0, 1.0, 50.0)],
            )?
            .with_label("Target")
            .with_group("Main"),
            PropertyVector::new_switch(
                device,
                "MODE",
                SwitchRule::OneOfMany,
                vec![
                    SwitchElement::new("FAST", "Fast", SwitchState::On),
                    SwitchElement::new("SLOW", "Slow", SwitchState::Off),
                ],
            )?
            .with_label("Mode")
            .with_group("Main"),
            PropertyVector::new_text(device, "NOTE", vec![TextElement::new("TEXT", "Text", "")])?
                .with_label("Note")
                .with_group("Main"),
            PropertyVector::new_light(
                device,
                STATUS,
                vec![LightElement::new("READY", "Ready", PropertyState::Idle)],
            )?
            .with_label("Status")
            .with_group("Main"),
            PropertyVector::new_blob(device, "UPLOAD", vec![BlobElement::new("DATA", "Data", "")])?
                .with_label("Upload")
                .with_group("Main"),
            PropertyVector::new_switch(
                device,
                CONFIG_PROCESS,
                SwitchRule::AtMostOne,
                vec![
                    SwitchElement::new("CONFIG_SAVE", "Save", SwitchState::Off),
                    SwitchElement::new("CONFIG_PURGE", "Purge", SwitchState::Off),
                ],
            )?
            .with_label("Configuration")
            .with_group("Options"),
        ])
    }

    /// Track every property up front so requests scoped to one of them are
    /// answered before any bare `getProperties`.
    fn register<W: Write>(&self, session: &mut DriverSession<W>) -> indiwire_property::Result<()> {
        for vector in self.properties()? {
            session.register(vector);
        }
        Ok(())
    }

    fn config_action<W: Write>(&self, session: &mut DriverSession<W>, action: &str) -> Result<String> {
        match action {
            "CONFIG_SAVE" => {
                let saved = session.save_config(&self.device)?;
                Ok(format!("saved {saved} properties"))
            }
            "CONFIG_PURGE" => {
                session
                    .config_store(&self.device)?
                    .purge()
                    .map_err(DispatchError::from)?;
                Ok("configuration purged".to_string())
            }
            other => Err(DispatchError::MalformedMessage(format!("unknown config action {other}"))),
        }
    }
}

impl Driver for Simulator {
    fn get_properties<W: Write>(&mut self, session: &mut DriverSession<W>, device: Option<&str>) -> Result<()> {
        if device.is_some_and(|d| d != self.device) {
            return Ok(());
        }
        for vector in self.properties()? {
            session.define(vector)?;
        }
        Ok(())
    }

    fn new_number<W: Write>(&mut self, session: &mut DriverSession<W>, update: &PropertyUpdate) -> Result<()> {
        session.accept(update)?;
        let reached = session
            .get(&self.device, TARGET)
            .is_some_and(|v| update.name == TARGET && v.state == PropertyState::Ok);
        if reached {
            let status = session.vector_mut(&self.device, STATUS)?;
            status.state = PropertyState::Ok;
            if let Some(ready) = status.light_mut("READY") {
                ready.value = PropertyState::Ok;
            }
            session.publish(&self.device, STATUS, None)?;
        }
        Ok(())
    }

    /// Config buttons act without latching; everything else is applied.
    fn new_switch<W: Write>(&mut self, session: &mut DriverSession<W>, update: &PropertyUpdate) -> Result<()> {
        if update.name != CONFIG_PROCESS {
            return session.accept(update);
        }
        let action = update
            .switches()
            .into_iter()
            .find(|(_, state)| state.is_on())
            .map(|(name, _)| name.to_string());
        let Some(action) = action else {
            return session.publish(&self.device, CONFIG_PROCESS, None);
        };

        let (state, message) = match self.config_action(session, &action) {
            Ok(message) => (PropertyState::Ok, message),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                tracing::warn!(action = %action, error = %err, "config action failed");
                (PropertyState::Alert, err.to_string())
            }
        };
        session.vector_mut(&self.device, CONFIG_PROCESS)?.state = state;
        session.publish(&self.device, CONFIG_PROCESS, Some(&message))
    }
}

pub fn run(args: SimArgs) -> CliResult<i32> {
    let config = DriverConfig {
        echo_errors_to_client: !args.quiet,
        config_path: args.config.clone(),
        ..DriverConfig::default()
    };
    let device = args.device;
    let simulator = Simulator::new(device.clone());
    let mut session = DriverSession::with_config(device.clone(), std::io::stdout(), config);
    simulator
        .register(&mut session)
        .map_err(|err| property_error("define failed", err))?;
    let mut dispatcher = Dispatcher::from_parts(simulator, session);

    if let Some(path) = args.config.as_deref().filter(|p| p.exists()) {
        let applied = dispatcher
            .load_config(&device, None)
            .map_err(|err| dispatch_error("config load failed", err))?;
        tracing::info!(applied, path = %path.display(), "config loaded");
    }

    let mut runner = DriverRunner::new(std::io::stdin(), dispatcher);
    install_ctrlc_handler(runner.stop_handle())?;
    tracing::info!(device = %device, "simulator running");
    runner
        .run()
        .map_err(|err| dispatch_error("driver stopped", err))?;
    Ok(SUCCESS)
}

fn install_ctrlc_handler(stop: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use indiwire_codec::{decode_element, XmlElement};

    use super::*;

    fn dispatcher(config: DriverConfig) -> Dispatcher<Simulator, Vec<u8>> {
        let mut dispatcher = Dispatcher::with_config("Sim", Simulator::new("Sim"), Vec::new(), config);
        dispatcher
            .dispatch(&xml("<getProperties version='1.7'/>"))
            .unwrap();
        dispatcher
    }

    fn xml(text: &str) -> XmlElement {
        XmlElement::parse(text.as_bytes()).unwrap()
    }

    fn sent(dispatcher: &Dispatcher<Simulator, Vec<u8>>) -> Vec<XmlElement> {
        let mut buf = BytesMut::from(dispatcher.session().writer().as_slice());
        let mut out = Vec::new();
        while let Some(element) = decode_element(&mut buf, usize::MAX).unwrap() {
            out.push(element);
        }
        out
    }

    #[test]
    fn defines_every_kind() {
        let dispatcher = dispatcher(DriverConfig::default());
        let tags: Vec<String> = sent(&dispatcher).iter().map(|e| e.tag().to_string()).collect();
        assert_eq!(
            tags,
            [
                "defNumberVector",
                "defSwitchVector",
                "defTextVector",
                "defLightVector",
                "defBLOBVector",
                "defSwitchVector"
            ]
        );
    }

    #[test]
    fn other_devices_get_nothing() {
        let mut dispatcher = Dispatcher::new("Sim", Simulator::new("Sim"), Vec::new());
        dispatcher
            .dispatch(&xml("<getProperties version='1.7' device='Mount'/>"))
            .unwrap();
        assert!(sent(&dispatcher).is_empty());
    }

    #[test]
    fn registered_properties_answer_scoped_requests() {
        let simulator = Simulator::new("Sim");
        let mut session = DriverSession::new("Sim", Vec::new());
        simulator.register(&mut session).unwrap();
        let mut dispatcher = Dispatcher::from_parts(simulator, session);
        assert!(dispatcher.session().writer().is_empty());

        dispatcher
            .dispatch(&xml("<getProperties version='1.7' device='Sim' name='TARGET'/>"))
            .unwrap();
        let out = sent(&dispatcher);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].tag(), "defNumberVector");
        assert_eq!(out[0].attribute("name"), Some("TARGET"));
    }

    #[test]
    fn reaching_target_lights_status() {
        let mut dispatcher = dispatcher(DriverConfig::default());
        dispatcher
            .dispatch(&xml(
                "<newNumberVector device='Sim' name='TARGET'><oneNumber name='VALUE'>75</oneNumber></newNumberVector>",
            ))
            .unwrap();

        let status = dispatcher.session().get("Sim", STATUS).unwrap();
        assert_eq!(status.light("READY").unwrap().value, PropertyState::Ok);
        let out = sent(&dispatcher);
        let tail: Vec<&str> = out[out.len() - 2..].iter().map(|e| e.tag()).collect();
        assert_eq!(tail, ["setNumberVector", "setLightVector"]);
    }

    #[test]
    fn out_of_range_target_leaves_status() {
        let mut dispatcher = dispatcher(DriverConfig::default());
        dispatcher
            .dispatch(&xml(
                "<newNumberVector device='Sim' name='TARGET'><oneNumber name='VALUE'>175</oneNumber></newNumberVector>",
            ))
            .unwrap();
        let session = dispatcher.session();
        assert_eq!(session.get("Sim", TARGET).unwrap().state, PropertyState::Alert);
        assert_eq!(
            session.get("Sim", STATUS).unwrap().light("READY").unwrap().value,
            PropertyState::Idle
        );
    }

    #[test]
    fn config_buttons_save_and_purge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.xml");
        let mut dispatcher = dispatcher(DriverConfig {
            config_path: Some(path.clone()),
            ..DriverConfig::default()
        });

        dispatcher
            .dispatch(&xml(
                "<newSwitchVector device='Sim' name='CONFIG_PROCESS'>\
                 <oneSwitch name='CONFIG_SAVE'>On</oneSwitch></newSwitchVector>",
            ))
            .unwrap();
        assert!(path.exists());
        let process = dispatcher.session().get("Sim", CONFIG_PROCESS).unwrap();
        assert_eq!(process.state, PropertyState::Ok);
        assert!(!process.switch("CONFIG_SAVE").unwrap().value.is_on());
        let reply = sent(&dispatcher).pop().unwrap();
        assert_eq!(reply.attribute("message"), Some("saved 4 properties"));

        dispatcher
            .dispatch(&xml(
                "<newSwitchVector device='Sim' name='CONFIG_PROCESS'>\
                 <oneSwitch name='CONFIG_PURGE'>On</oneSwitch></newSwitchVector>",
            ))
            .unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn saved_values_are_replayed() {
        let dir = tempfile::tempdir().unwrap();
        let config = DriverConfig {
            config_path: Some(dir.path().join("sim.xml")),
            ..DriverConfig::default()
        };
        let mut first = dispatcher(config.clone());
        first
            .dispatch(&xml(
                "<newNumberVector device='Sim' name='TARGET'><oneNumber name='VALUE'>33</oneNumber></newNumberVector>",
            ))
            .unwrap();
        first.session_mut().save_config("Sim").unwrap();

        let mut second = dispatcher(config);
        assert_eq!(second.load_config("Sim", None).unwrap(), 4);
        let target = second.session().get("Sim", TARGET).unwrap();
        assert_eq!(target.number("VALUE").unwrap().value, 33.0);
    }
}
