mod utils;

use midi_sequence::sequencer::{Receiver, Sequencer};
use midi_sequence::{DivisionType, MetaMessage, MidiEvent, MidiMessage, Sequence, ShortMessage};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use utils::enable_logging;

struct ChannelSink {
    sender: mpsc::Sender<(MidiMessage, i64)>,
}

impl Receiver for ChannelSink {
    fn send(&mut self, message: &MidiMessage, timestamp: i64) {
        let _ = self.sender.send((message.clone(), timestamp));
    }
}

fn note_on(channel: u8, note: u8, velocity: u8) -> MidiMessage {
    MidiMessage::Short(ShortMessage::from_command(0x90, channel, note, velocity).unwrap())
}

fn note_off(channel: u8, note: u8) -> MidiMessage {
    MidiMessage::Short(ShortMessage::from_command(0x80, channel, note, 0).unwrap())
}

fn attach_sink(sequencer: &Sequencer) -> mpsc::Receiver<(MidiMessage, i64)> {
    let (tx, rx) = mpsc::channel();
    let sink: Arc<Mutex<dyn Receiver>> = Arc::new(Mutex::new(ChannelSink { sender: tx }));
    sequencer.update_device_connections(vec![sink], vec![]);
    rx
}

#[test]
fn playback_runs_to_completion_and_stops_dispatching() {
    enable_logging();
    let mut sequence = Sequence::new(DivisionType::Ppq, 24).unwrap();
    let track = sequence.create_track();
    track.add(MidiEvent::new(note_on(0, 60, 100), 0));
    track.add(MidiEvent::new(note_off(0, 60), 4));
    track.sort_events();

    let sequencer = Sequencer::new();
    sequencer.open().unwrap();
    sequencer.set_sequence(sequence).unwrap();
    sequencer.set_tempo_bpm(100_000.0);
    let rx = attach_sink(&sequencer);

    sequencer.start().unwrap();
    let (first, _) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(first.status(), 0x90);
    let (second, _) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(second.status(), 0x80);

    // the end-of-track meta event is not itself dispatched to
    // receivers, and no further messages arrive once playback ends.
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    sequencer.close();
}

#[test]
fn tempo_meta_event_reduces_observed_inter_event_delay() {
    enable_logging();
    let mut sequence = Sequence::new(DivisionType::Ppq, 24).unwrap();
    let track = sequence.create_track();
    // starts at the default 500_000 microsecond tempo, then speeds up
    // by a large factor before the second note.
    track.add(MidiEvent::new(
        MidiMessage::Meta(MetaMessage::new(0x51, &[0x00, 0x00, 0x01]).unwrap()),
        0,
    ));
    track.add(MidiEvent::new(note_on(0, 60, 100), 0));
    track.add(MidiEvent::new(note_on(0, 61, 100), 48));
    track.sort_events();

    let sequencer = Sequencer::new();
    sequencer.open().unwrap();
    sequencer.set_sequence(sequence).unwrap();
    let rx = attach_sink(&sequencer);

    sequencer.start().unwrap();
    let (first, _) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(first.raw_bytes()[1], 60);
    let (second, _) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(second.raw_bytes()[1], 61);
    sequencer.close();
}

#[test]
fn looping_replays_the_loop_region_before_finishing() {
    enable_logging();
    let mut sequence = Sequence::new(DivisionType::Ppq, 24).unwrap();
    let track = sequence.create_track();
    track.add(MidiEvent::new(note_on(0, 60, 100), 0));
    track.sort_events();

    let sequencer = Sequencer::new();
    sequencer.open().unwrap();
    sequencer.set_sequence(sequence).unwrap();
    sequencer.set_tempo_bpm(200_000.0);
    sequencer.set_loop_start_point(0).unwrap();
    sequencer.set_loop_end_point(1).unwrap();
    sequencer.set_loop_count(1);
    let rx = attach_sink(&sequencer);

    sequencer.start().unwrap();
    let (first, _) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(first.raw_bytes()[1], 60);
    let (second, _) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(second.raw_bytes()[1], 60);
    sequencer.close();
}

#[test]
fn recording_captures_transmitted_messages_into_the_enabled_track() {
    enable_logging();
    let sequence = Sequence::with_tracks(DivisionType::Ppq, 480, 1).unwrap();

    let sequencer = Sequencer::new();
    sequencer.open().unwrap();
    sequencer.set_sequence(sequence).unwrap();
    sequencer.set_record_enable(0, None);
    sequencer.start().unwrap();
    sequencer.start_recording().unwrap();
    assert!(sequencer.is_recording());

    let recording_receiver = sequencer.recording_receiver_handle();
    recording_receiver
        .lock()
        .unwrap()
        .send(&note_on(0, 67, 90), 0);

    // give the worker thread a moment to flip needs_refresh and allow
    // the recorded sequence to become visible.
    std::thread::sleep(Duration::from_millis(50));
    sequencer.stop_recording();
    sequencer.stop().unwrap();

    let recorded = sequencer.sequence().unwrap();
    let recorded_track = &recorded.tracks()[0];
    assert!(recorded_track
        .events()
        .any(|e| e.message().raw_bytes() == note_on(0, 67, 90).raw_bytes()));
    sequencer.close();
}

#[test]
fn start_recording_appends_and_enables_a_fresh_track_without_prior_setup() {
    enable_logging();
    let sequence = Sequence::with_tracks(DivisionType::Ppq, 480, 2).unwrap();

    let sequencer = Sequencer::new();
    sequencer.open().unwrap();
    sequencer.set_sequence(sequence).unwrap();

    // no set_record_enable call beforehand: start_recording must still
    // succeed by creating and enabling its own destination track.
    sequencer.start_recording().unwrap();
    assert!(sequencer.is_recording());
    assert_eq!(sequencer.sequence().unwrap().tracks().len(), 3);
    sequencer.stop_recording();
    sequencer.close();
}

