//! The mutable playback state shared between [`super::Sequencer`]'s
//! public methods and its scheduler thread. Everything that the
//! scheduler's wait predicate depends on lives in one
//! [`std::sync::Mutex`] paired with one [`std::sync::Condvar`], rather
//! than a scatter of atomics, so a single lock acquisition always sees
//! a consistent snapshot.

use crate::event::MidiEvent;
use crate::message::MidiMessage;
use crate::sequence::Sequence;
use crate::track::Track;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Sentinel for [`PlaybackState::loop_count`]: loop forever.
pub const LOOP_CONTINUOUSLY: i32 = -1;

pub(crate) struct PlaybackState {
    pub(crate) is_open: bool,
    pub(crate) is_running: bool,
    pub(crate) is_recording: bool,
    pub(crate) shutdown: bool,

    pub(crate) sequence: Option<Sequence>,
    pub(crate) playing_track: Track,
    pub(crate) needs_refresh: bool,

    pub(crate) tempo_mpq: u32,
    pub(crate) tempo_factor: f32,

    pub(crate) loop_count: i32,
    pub(crate) loop_start: i64,
    /// `-1` means "the end of the sequence", tracked dynamically
    /// rather than snapshotted at the time the loop was configured.
    pub(crate) loop_end: i64,

    pub(crate) tick_position: i64,
    pub(crate) tick_position_set_time: Instant,

    pub(crate) track_mute: HashSet<usize>,
    pub(crate) track_solo: HashSet<usize>,
    /// Track index -> enabled channels, `None` meaning "all channels".
    /// Marks both which tracks are excluded from playback while actively
    /// recording, and which tracks `stop_recording` merges into.
    pub(crate) record_enable: HashMap<usize, Option<HashSet<u8>>>,
    /// Raw captured events since `start_recording`, staged outside any
    /// track until `stop_recording` distributes them into the
    /// record-enabled destination tracks.
    pub(crate) recording_buffer: Vec<MidiEvent>,
    pub(crate) record_start_tick: i64,
}

impl PlaybackState {
    pub(crate) fn new() -> Self {
        PlaybackState {
            is_open: false,
            is_running: false,
            is_recording: false,
            shutdown: false,
            sequence: None,
            playing_track: Track::new(),
            needs_refresh: false,
            tempo_mpq: 500_000,
            tempo_factor: 1.0,
            loop_count: 0,
            loop_start: 0,
            loop_end: -1,
            tick_position: 0,
            tick_position_set_time: Instant::now(),
            track_mute: HashSet::new(),
            track_solo: HashSet::new(),
            record_enable: HashMap::new(),
            recording_buffer: Vec::new(),
            record_start_tick: 0,
        }
    }

    /// The configured loop end tick, resolved against the current
    /// sequence's length when set to "end of sequence".
    pub(crate) fn effective_loop_end(&self) -> i64 {
        if self.loop_end >= 0 {
            self.loop_end
        } else {
            self.sequence.as_ref().map(|s| s.tick_length()).unwrap_or(0)
        }
    }
}

/// Ticks per microsecond at the current tempo and division, before
/// `tempo_factor` is applied. For PPQ sequences this is
/// `resolution / tempo_mpq`; for SMPTE sequences it is fixed by the
/// frame rate and does not vary with `tempo_mpq`.
fn base_ticks_per_microsecond(state: &PlaybackState) -> f64 {
    let sequence = match &state.sequence {
        Some(s) => s,
        None => return 0.0,
    };
    if sequence.division_type().is_ppq() {
        sequence.resolution() as f64 / state.tempo_mpq.max(1) as f64
    } else {
        let frames_per_second = sequence.division_type().as_f32() as f64;
        sequence.resolution() as f64 * frames_per_second / 1_000_000.0
    }
}

/// Ticks per microsecond including `tempo_factor`.
pub(crate) fn ticks_per_microsecond(state: &PlaybackState) -> f64 {
    base_ticks_per_microsecond(state) * state.tempo_factor.max(0.0) as f64
}

/// The current tick position, projecting forward from
/// `tick_position_set_time` if the sequencer is running.
pub(crate) fn compute_tick_position(state: &PlaybackState) -> i64 {
    if !state.is_running {
        return state.tick_position;
    }
    let tpus = ticks_per_microsecond(state);
    if tpus <= 0.0 {
        return state.tick_position;
    }
    let elapsed_micros = Instant::now()
        .saturating_duration_since(state.tick_position_set_time)
        .as_micros() as f64;
    state.tick_position + (elapsed_micros * tpus).round() as i64
}

/// Freeze the current projected tick position into `tick_position` and
/// rebase `tick_position_set_time` to now. Must be called before any
/// change that would shift `ticks_per_microsecond`'s value (a tempo
/// change, factor change, or pause), so the position already elapsed
/// under the old rate isn't recomputed under the new one.
pub(crate) fn rebase_position(state: &mut PlaybackState) {
    state.tick_position = compute_tick_position(state);
    state.tick_position_set_time = Instant::now();
}

pub(crate) fn apply_tempo_mpq(state: &mut PlaybackState, mpq: u32) {
    rebase_position(state);
    state.tempo_mpq = mpq.max(1);
}

pub(crate) fn apply_tempo_factor(state: &mut PlaybackState, factor: f32) {
    rebase_position(state);
    state.tempo_factor = factor.max(0.0);
}

pub(crate) fn set_tick_position(state: &mut PlaybackState, tick: i64) {
    state.tick_position = tick.max(0);
    state.tick_position_set_time = Instant::now();
}

/// Whether a record-enable entry for a track means that track is
/// actively being recorded into right now: a wildcard (`None`, "all
/// channels") or a non-empty explicit channel set counts; an entry
/// with an empty channel set does not (the track is merely reserved).
fn is_being_recorded(channel_filter: &Option<HashSet<u8>>) -> bool {
    match channel_filter {
        None => true,
        Some(channels) => !channels.is_empty(),
    }
}

/// Whether track `index` should sound during playback: soloed tracks
/// (if any exist) play exclusively; otherwise every unmuted track
/// plays, except a track currently being recorded into, which is
/// withheld from the merged view until `stop_recording` folds the
/// freshly captured events back in.
fn track_is_active(
    index: usize,
    mute: &HashSet<usize>,
    solo: &HashSet<usize>,
    record_enable: &HashMap<usize, Option<HashSet<u8>>>,
    is_recording: bool,
) -> bool {
    if is_recording {
        if let Some(filter) = record_enable.get(&index) {
            if is_being_recorded(filter) {
                return false;
            }
        }
    }
    if !solo.is_empty() {
        solo.contains(&index)
    } else {
        !mute.contains(&index)
    }
}

/// Flatten a sequence's active tracks into the single ordered track
/// the scheduler walks during playback.
pub(crate) fn merge_sequence_to_track(
    sequence: &Sequence,
    track_mute: &HashSet<usize>,
    track_solo: &HashSet<usize>,
    record_enable: &HashMap<usize, Option<HashSet<u8>>>,
    is_recording: bool,
) -> Track {
    let mut merged = Track::new();
    for (index, track) in sequence.tracks().iter().enumerate() {
        if !track_is_active(index, track_mute, track_solo, record_enable, is_recording) {
            continue;
        }
        for event in track.events() {
            merged.add(event.clone());
        }
    }
    merged.sort_events();
    merged
}

pub(crate) fn rebuild_playing_track(state: &mut PlaybackState) {
    state.playing_track = match &state.sequence {
        Some(sequence) => merge_sequence_to_track(
            sequence,
            &state.track_mute,
            &state.track_solo,
            &state.record_enable,
            state.is_recording,
        ),
        None => Track::new(),
    };
    state.needs_refresh = false;
}

/// Whether `message`, arriving on `channel`, passes the record-enable
/// filter configured for `channel_filter` (`None` means every
/// channel).
pub(crate) fn is_recordable(message: &MidiMessage, channel_filter: &Option<HashSet<u8>>) -> bool {
    let channel = match message {
        MidiMessage::Short(m) => m.channel(),
        MidiMessage::Sysex(_) => None,
        MidiMessage::Meta(_) => None,
    };
    match (channel, channel_filter) {
        (_, None) => true,
        (None, Some(_)) => true,
        (Some(ch), Some(channels)) => channels.contains(&ch),
    }
}

pub(crate) fn find_event_index(events: &[MidiEvent], tick: i64) -> usize {
    events.partition_point(|e| e.tick() < tick)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::division::DivisionType;
    use crate::message::ShortMessage;

    #[test]
    fn base_ticks_per_microsecond_for_ppq_matches_default_tempo() {
        let mut state = PlaybackState::new();
        state.sequence = Some(Sequence::new(DivisionType::Ppq, 480).unwrap());
        // 480 ticks / 500000us = 480 ticks per half-second at 120bpm,
        // i.e. exactly 1 tick per 1041.67us.
        let tpus = ticks_per_microsecond(&state);
        assert!((tpus - 480.0 / 500_000.0).abs() < 1e-9);
    }

    #[test]
    fn rebase_position_freezes_elapsed_ticks() {
        let mut state = PlaybackState::new();
        state.sequence = Some(Sequence::new(DivisionType::Ppq, 480).unwrap());
        state.is_running = true;
        state.tick_position_set_time =
            Instant::now() - std::time::Duration::from_micros(500_000);
        rebase_position(&mut state);
        assert_eq!(state.tick_position, 480);
    }

    #[test]
    fn track_is_active_respects_solo_over_mute() {
        let mute = HashSet::new();
        let mut solo = HashSet::new();
        solo.insert(1);
        let record_enable = HashMap::new();
        assert!(!track_is_active(0, &mute, &solo, &record_enable, false));
        assert!(track_is_active(1, &mute, &solo, &record_enable, false));
    }

    #[test]
    fn track_is_active_withholds_a_track_being_recorded_into() {
        let mute = HashSet::new();
        let solo = HashSet::new();
        let mut record_enable = HashMap::new();
        record_enable.insert(0, None);
        record_enable.insert(1, Some(HashSet::new()));
        assert!(!track_is_active(0, &mute, &solo, &record_enable, true));
        assert!(track_is_active(1, &mute, &solo, &record_enable, true));
        assert!(track_is_active(0, &mute, &solo, &record_enable, false));
    }

    #[test]
    fn is_recordable_filters_by_channel() {
        let msg = MidiMessage::Short(ShortMessage::from_command(0x90, 2, 60, 100).unwrap());
        let mut allowed = HashSet::new();
        allowed.insert(3u8);
        assert!(!is_recordable(&msg, &Some(allowed.clone())));
        allowed.insert(2);
        assert!(is_recordable(&msg, &Some(allowed)));
        assert!(is_recordable(&msg, &None));
    }

    #[test]
    fn is_recordable_treats_meta_as_non_channel() {
        let mut allowed = HashSet::new();
        allowed.insert(3u8);
        let tempo = MidiMessage::Meta(crate::message::MetaMessage::new(0x51, &[0, 0, 1]).unwrap());
        assert!(is_recordable(&tempo, &Some(allowed)));
    }

    #[test]
    fn find_event_index_locates_first_not_less_than_tick() {
        let events = vec![
            MidiEvent::new(
                MidiMessage::Short(ShortMessage::from_command(0x90, 0, 1, 1).unwrap()),
                0,
            ),
            MidiEvent::new(
                MidiMessage::Short(ShortMessage::from_command(0x90, 0, 2, 1).unwrap()),
                10,
            ),
            MidiEvent::new(
                MidiMessage::Short(ShortMessage::from_command(0x90, 0, 3, 1).unwrap()),
                10,
            ),
        ];
        assert_eq!(find_event_index(&events, 0), 0);
        assert_eq!(find_event_index(&events, 5), 1);
        assert_eq!(find_event_index(&events, 10), 1);
        assert_eq!(find_event_index(&events, 11), 3);
    }
}
