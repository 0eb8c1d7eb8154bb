use crate::message::MidiMessage;

/// A message paired with its tick position within a track.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MidiEvent {
    message: MidiMessage,
    tick: i64,
}

impl MidiEvent {
    pub fn new(message: MidiMessage, tick: i64) -> Self {
        MidiEvent { message, tick }
    }

    pub fn message(&self) -> &MidiMessage {
        &self.message
    }

    pub fn set_message(&mut self, message: MidiMessage) {
        self.message = message;
    }

    pub fn tick(&self) -> i64 {
        self.tick
    }

    pub fn set_tick(&mut self, tick: i64) {
        self.tick = tick;
    }
}
