//! The external interfaces a [`super::Sequencer`] consumes. The
//! process-wide device registry that would normally satisfy these is
//! out of scope for this crate — callers hand handles in directly via
//! [`super::Sequencer::update_device_connections`].

use crate::MidiMessage;
use std::sync::{Arc, Mutex};

/// A destination for MIDI messages, e.g. a synthesizer or another
/// sequencer's recording input.
pub trait Receiver: Send {
    /// Deliver `message`. `timestamp == -1` means "unspecified"; the
    /// sequencer always sends `0` during playback.
    fn send(&mut self, message: &MidiMessage, timestamp: i64);

    /// Release any resources. The default implementation does
    /// nothing.
    fn close(&mut self) {}
}

/// A source of MIDI messages, e.g. a MIDI input port.
pub trait Transmitter: Send {
    /// Attach (or detach, with `None`) the receiver that will be
    /// delivered every message this transmitter produces.
    fn set_receiver(&mut self, receiver: Option<Arc<Mutex<dyn Receiver>>>);

    fn get_receiver(&self) -> Option<Arc<Mutex<dyn Receiver>>>;

    /// Release any resources. The default implementation does
    /// nothing.
    fn close(&mut self) {}
}

/// Notified of every controller-change message for a registered
/// controller number while the sequencer plays back or records.
pub trait ControllerEventListener: Send {
    fn controller_change(&mut self, message: &crate::ShortMessage);
}

/// Notified of every meta event while the sequencer plays back or
/// records.
pub trait MetaEventListener: Send {
    fn meta_event(&mut self, message: &crate::MetaMessage);
}
