//! The receiver a [`super::Sequencer`] attaches to an input
//! transmitter while recording. It holds only the shared handles it
//! needs, never a reference back to the [`super::Sequencer`] itself —
//! a `Sequencer -> RecordingReceiver -> Sequencer` cycle would leak,
//! since both ends would be reference-counted.

use super::dispatch::{ControllerListenerMap, MetaListenerList, ReceiverList};
use super::state::{self, PlaybackState};
use super::traits::Receiver;
use crate::event::MidiEvent;
use crate::message::MidiMessage;
use std::sync::{Arc, Mutex};

pub(crate) struct RecordingReceiver {
    pub(crate) state: Arc<Mutex<PlaybackState>>,
    pub(crate) receivers: ReceiverList,
    pub(crate) controller_listeners: ControllerListenerMap,
    pub(crate) meta_listeners: MetaListenerList,
}

impl Receiver for RecordingReceiver {
    fn send(&mut self, message: &MidiMessage, _timestamp: i64) {
        let mut guard = self.state.lock().unwrap();
        if !guard.is_recording || !guard.is_running {
            return;
        }
        let tick = state::compute_tick_position(&guard);
        guard.recording_buffer.push(MidiEvent::new(message.clone(), tick));
        drop(guard);

        super::dispatch::dispatch(
            &self.receivers,
            &self.controller_listeners,
            &self.meta_listeners,
            message,
        );
    }
}
