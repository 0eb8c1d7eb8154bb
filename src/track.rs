//! Ordered containers of [`MidiEvent`]s and the comparator used to
//! normalize simultaneous events.

use crate::event::MidiEvent;
use crate::message::MidiMessage;
use std::cmp::Ordering;

/// An ordered, mutable sequence of events.
#[derive(Clone, Debug, Default)]
pub struct Track {
    events: Vec<MidiEvent>,
}

impl Track {
    pub fn new() -> Self {
        Track { events: Vec::new() }
    }

    pub fn add(&mut self, event: MidiEvent) {
        self.events.push(event);
    }

    pub fn remove(&mut self, index: usize) -> MidiEvent {
        self.events.remove(index)
    }

    pub fn get(&self, index: usize) -> Option<&MidiEvent> {
        self.events.get(index)
    }

    pub fn size(&self) -> usize {
        self.events.len()
    }

    pub fn events(&self) -> impl Iterator<Item = &MidiEvent> {
        self.events.iter()
    }

    pub fn events_mut(&mut self) -> impl Iterator<Item = &mut MidiEvent> {
        self.events.iter_mut()
    }

    /// Retain only the events for which `keep` returns `true`.
    pub fn retain<F: FnMut(&MidiEvent) -> bool>(&mut self, keep: F) {
        self.events.retain(keep);
    }

    /// The tick of the last event, or 0 if the track is empty.
    /// Meaningful once the track has been through [`Track::sort_events`].
    pub fn ticks(&self) -> i64 {
        self.events.last().map(|e| e.tick()).unwrap_or(0)
    }

    /// Normalize the track: strip all end-of-track meta events,
    /// stable-sort the rest by (tick, priority), then append exactly
    /// one end-of-track event.
    pub fn sort_events(&mut self) {
        self.events.retain(|e| !is_end_of_track(e.message()));
        self.events.sort_by(compare_events);
        let eot_tick = self.events.last().map(|e| e.tick() + 1).unwrap_or(0);
        self.events.push(MidiEvent::new(
            MidiMessage::Meta(crate::message::MetaMessage::end_of_track()),
            eot_tick,
        ));
    }
}

fn is_end_of_track(message: &MidiMessage) -> bool {
    message.raw_bytes() == [0xFF, 0x2F, 0x00]
}

/// Total order over simultaneous events: ascending tick, then by a
/// fixed class ordering so that controller/system/meta messages
/// precede note-on, which precedes note-off at the same tick.
pub(crate) fn compare_events(a: &MidiEvent, b: &MidiEvent) -> Ordering {
    a.tick()
        .cmp(&b.tick())
        .then_with(|| event_class(a.message()).cmp(&event_class(b.message())))
}

/// Lower sorts first: 0 for everything except note-on (1) and
/// note-off (2), so overlapping notes at the same tick turn off only
/// after the replacement note has turned on.
fn event_class(message: &MidiMessage) -> u8 {
    match message.raw_bytes().first().copied().unwrap_or(0) & 0xF0 {
        0x90 => 1,
        0x80 => 2,
        _ => 0,
    }
}
