//! Client side of the INDI protocol.
//!
//! [`ClientMirror`] rebuilds the device and property tree announced by a
//! server and reports every change to a [`MirrorObserver`]. Commands
//! (`getProperties`, `enableBLOB`, `new*Vector`) are queued on the mirror and
//! written out with [`ClientMirror::flush_to`].
//!
//! ```no_run
//! use std::net::TcpStream;
//!
//! use indiwire_client::{ClientMirror, NullObserver};
//! use indiwire_codec::{ElementReader, MessageWriter};
//!
//! let stream = TcpStream::connect("127.0.0.1:7624")?;
//! let mut writer = MessageWriter::new(stream.try_clone()?);
//! let mut reader = ElementReader::new(stream);
//!
//! let mut mirror = ClientMirror::new(NullObserver);
//! mirror.get_properties();
//! mirror.flush_to(&mut writer)?;
//! loop {
//!     mirror.process_next(&mut reader)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod mirror;
pub mod observer;

pub use config::ClientConfig;
pub use device::{split_message, Device};
pub use error::{ClientError, Result};
pub use mirror::{ClientMirror, Outcome};
pub use observer::{MirrorObserver, NullObserver};
