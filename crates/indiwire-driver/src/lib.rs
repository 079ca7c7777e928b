//! Driver side of the INDI protocol.
//!
//! A driver process reads client commands from its input and writes
//! definitions and updates to its output. This crate provides:
//! - [`Dispatcher`] turning each inbound element into a [`Driver`] callback
//! - [`DriverSession`] owning the property registry and the outbound stream
//! - [`SnoopRouter`] delivering other devices' traffic to subscribers
//! - [`ConfigStore`] saving and replaying property values
//! - [`DriverRunner`], the blocking read-dispatch loop
//!
//! # Example
//!
//! ```no_run
//! use std::io::Write;
//!
//! use indiwire_driver::{Dispatcher, Driver, DriverRunner, DriverSession, Result};
//! use indiwire_property::{NumberElement, PropertyVector};
//!
//! struct Focuser;
//!
//! impl Driver for Focuser {
//!     fn get_properties<W: Write>(&mut self, session: &mut DriverSession<W>, _device: Option<&str>) -> Result<()> {
//!         session.define(PropertyVector::new_number(
//!             "Focuser",
//!             "ABS_POSITION",
//!             vec![NumberElement::new("POSITION", "Steps", "%.0f", 0.0, 50000.0, 1.0, 0.0)],
//!         )?)?;
//!         Ok(())
//!     }
//! }
//!
//! let dispatcher = Dispatcher::new("Focuser", Focuser, std::io::stdout());
//! DriverRunner::new(std::io::stdin(), dispatcher).run()?;
//! # Ok::<(), indiwire_driver::DispatchError>(())
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod runner;
pub mod session;
pub mod snoop;

pub use config::{ConfigStore, DriverConfig, CONFIG_ENV};
pub use dispatch::{Dispatcher, Driver};
pub use error::{ConfigError, DispatchError, Result};
pub use runner::DriverRunner;
pub use session::DriverSession;
pub use snoop::{SnoopDelivery, SnoopRouter, SnoopSubscription, SnoopedMessage};
