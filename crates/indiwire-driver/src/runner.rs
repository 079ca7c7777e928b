use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indiwire_codec::{CodecError, ElementReader};

use crate::dispatch::{Dispatcher, Driver};
use crate::error::{DispatchError, Result};

/// Blocking read-dispatch loop for one connection.
pub struct DriverRunner<R, D, W> {
    reader: ElementReader<R>,
    dispatcher: Dispatcher<D, W>,
    stop: Arc<AtomicBool>,
}

impl<R: Read, D: Driver, W: Write> DriverRunner<R, D, W> {
    pub fn new(input: R, dispatcher: Dispatcher<D, W>) -> Self {
        let config = dispatcher.session().config().codec.clone();
        Self {
            reader: ElementReader::with_config(input, config),
            dispatcher,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that ends [`run`](Self::run) before the next element.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn dispatcher(&self) -> &Dispatcher<D, W> {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher<D, W> {
        &mut self.dispatcher
    }

    pub fn into_dispatcher(self) -> Dispatcher<D, W> {
        self.dispatcher
    }

    /// Read and dispatch until end of input, a stop request or a fatal error.
    ///
    /// Non-fatal errors are logged and, when configured and a device is
    /// known, echoed to the client as a `message`.
    pub fn run(&mut self) -> Result<()> {
        while !self.stop.load(Ordering::Relaxed) {
            let element = match self.reader.read_element() {
                Ok(element) => element,
                Err(CodecError::ConnectionClosed) => {
                    tracing::debug!("input closed");
                    return Ok(());
                }
                Err(err @ (CodecError::MalformedXml(_) | CodecError::ElementTooLarge { .. })) => {
                    tracing::warn!(error = %err, "dropping unreadable element");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            match self.dispatcher.dispatch(&element) {
                Ok(()) => {}
                Err(err) if err.is_fatal() => {
                    tracing::error!(tag = element.tag(), error = %err, "fatal dispatch error");
                    return Err(err);
                }
                Err(err) => self.report(element.tag(), &err)?,
            }
        }
        tracing::debug!("stop requested");
        Ok(())
    }

    fn report(&mut self, tag: &str, err: &DispatchError) -> Result<()> {
        tracing::warn!(tag, error = %err, "element dropped");
        let session = self.dispatcher.session_mut();
        if !session.config().echo_errors_to_client {
            return Ok(());
        }
        // Undecodable members were already reported member by member.
        if matches!(err, DispatchError::NoValidMembers { .. }) {
            return Ok(());
        }
        match err.device() {
            Some(device) => session.message(Some(device), &err.to_string()),
            None => Ok(()),
        }
    }
}
