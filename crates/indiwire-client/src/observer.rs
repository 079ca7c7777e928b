use indiwire_property::PropertyVector;

use crate::device::Device;

/// Change notifications from a [`ClientMirror`](crate::ClientMirror).
///
/// Every method defaults to a no-op, so an observer implements only what it
/// cares about. Each inbound element fires at most one value callback.
pub trait MirrorObserver {
    /// First definition seen for a device.
    fn new_device(&mut self, _device: &Device) {}

    /// Device removed by a device-wide `delProperty`. The device is already
    /// detached from the mirror.
    fn remove_device(&mut self, _device: &Device) {}

    fn new_property(&mut self, _property: &PropertyVector) {}

    /// Called just before the property leaves the mirror.
    fn remove_property(&mut self, _property: &PropertyVector) {}

    fn new_number(&mut self, _property: &PropertyVector) {}

    fn new_text(&mut self, _property: &PropertyVector) {}

    fn new_switch(&mut self, _property: &PropertyVector) {}

    fn new_light(&mut self, _property: &PropertyVector) {}

    fn new_blob(&mut self, _property: &PropertyVector) {}

    /// A message was appended to `device`'s log at `index`.
    fn new_message(&mut self, _device: &Device, _index: usize) {}

    /// Message not tied to any known device, already timestamp-prefixed.
    fn universal_message(&mut self, _message: &str) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl MirrorObserver for NullObserver {}
