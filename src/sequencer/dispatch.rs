//! Shared fan-out to receivers and event listeners, used by both the
//! playback scheduler and the recording receiver so a message is
//! announced identically regardless of which direction it travels.

use super::traits::{ControllerEventListener, MetaEventListener, Receiver};
use crate::message::{MetaMessage, MidiMessage, ShortMessage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub(crate) type ReceiverList = Arc<Mutex<Vec<Arc<Mutex<dyn Receiver>>>>>;
pub(crate) type MetaListenerList = Arc<Mutex<Vec<Arc<Mutex<dyn MetaEventListener>>>>>;
pub(crate) type ControllerListenerMap =
    Arc<Mutex<HashMap<u8, Vec<Arc<Mutex<dyn ControllerEventListener>>>>>>;

/// Deliver `message` to every registered receiver. Snapshots the
/// receiver list under its own lock and releases it before calling
/// out, so a receiver that calls back into the sequencer cannot
/// deadlock against this dispatch.
pub(crate) fn send_to_receivers(receivers: &ReceiverList, message: &MidiMessage) {
    let snapshot: Vec<_> = receivers.lock().unwrap().clone();
    for receiver in snapshot {
        receiver.lock().unwrap().send(message, 0);
    }
}

pub(crate) fn notify_meta_listeners(listeners: &MetaListenerList, message: &MetaMessage) {
    let snapshot: Vec<_> = listeners.lock().unwrap().clone();
    for listener in snapshot {
        listener.lock().unwrap().meta_event(message);
    }
}

/// Notify listeners registered for `message`'s controller number, if
/// `message` is a control-change message.
pub(crate) fn notify_controller_listeners(listeners: &ControllerListenerMap, message: &ShortMessage) {
    if message.command() != 0xB0 {
        return;
    }
    let controller = match message.data1() {
        Some(c) => c,
        None => return,
    };
    let snapshot: Vec<_> = {
        let guard = listeners.lock().unwrap();
        guard.get(&controller).cloned().unwrap_or_default()
    };
    for listener in snapshot {
        listener.lock().unwrap().controller_change(message);
    }
}

/// Dispatch one message to receivers and, if it's a short or meta
/// message, the relevant listeners.
pub(crate) fn dispatch(
    receivers: &ReceiverList,
    controller_listeners: &ControllerListenerMap,
    meta_listeners: &MetaListenerList,
    message: &MidiMessage,
) {
    send_to_receivers(receivers, message);
    match message {
        MidiMessage::Short(short) => notify_controller_listeners(controller_listeners, short),
        MidiMessage::Meta(meta) => notify_meta_listeners(meta_listeners, meta),
        MidiMessage::Sysex(_) => {}
    }
}
