//! The sequencer's single worker thread: wait on the shared condvar
//! until playback is requested, then walk the merged playing track in
//! tick order, pacing each event against wall-clock time at the
//! current tempo.

use super::dispatch::{self, ControllerListenerMap, MetaListenerList, ReceiverList};
use super::state::{self, PlaybackState};
use crate::event::MidiEvent;
use crate::message::MidiMessage;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

pub(crate) struct SchedulerHandles {
    pub(crate) state: Arc<Mutex<PlaybackState>>,
    pub(crate) condvar: Arc<Condvar>,
    pub(crate) receivers: ReceiverList,
    pub(crate) controller_listeners: ControllerListenerMap,
    pub(crate) meta_listeners: MetaListenerList,
}

pub(crate) fn run(handles: SchedulerHandles) {
    let SchedulerHandles {
        state,
        condvar,
        receivers,
        controller_listeners,
        meta_listeners,
    } = handles;

    loop {
        let mut guard = state.lock().unwrap();
        while !guard.shutdown && !guard.is_running {
            guard = condvar.wait(guard).unwrap();
        }
        if guard.shutdown {
            return;
        }
        drop(guard);

        let (mut events, mut idx) = sync_to_position(&state, &receivers, &controller_listeners, &meta_listeners);

        'playback: loop {
            let mut guard = state.lock().unwrap();
            if guard.shutdown || !guard.is_running {
                break 'playback;
            }

            if guard.needs_refresh {
                drop(guard);
                let synced = sync_to_position(&state, &receivers, &controller_listeners, &meta_listeners);
                events = synced.0;
                idx = synced.1;
                continue 'playback;
            }

            if idx >= events.len() {
                if restart_loop_iteration(&mut guard) {
                    idx = state::find_event_index(&events, guard.tick_position);
                    continue 'playback;
                }
                guard.tick_position = state::compute_tick_position(&guard);
                guard.is_running = false;
                break 'playback;
            }

            let event = events[idx].clone();
            if guard.loop_count != 0 && event.tick() > guard.effective_loop_end() {
                if restart_loop_iteration(&mut guard) {
                    idx = state::find_event_index(&events, guard.tick_position);
                    continue 'playback;
                }
            }

            let current_tick = state::compute_tick_position(&guard);
            if event.tick() > current_tick {
                let tpus = state::ticks_per_microsecond(&guard);
                let wait_micros = if tpus > 0.0 {
                    ((event.tick() - current_tick) as f64 / tpus) as u64
                } else {
                    // No tempo information yet (division type unknown
                    // or tempo factor set to zero): re-check shortly
                    // rather than spinning or blocking forever.
                    50_000
                };
                let (_guard, _timed_out) = condvar
                    .wait_timeout(guard, Duration::from_micros(wait_micros.max(1)))
                    .unwrap();
                continue 'playback;
            }

            let tempo_change = tempo_of(event.message());
            if let Some(mpq) = tempo_change {
                state::apply_tempo_mpq(&mut guard, mpq);
            }
            guard.tick_position = event.tick();
            guard.tick_position_set_time = Instant::now();
            // Release the lock before calling out to receivers and
            // listeners: a callback that calls back into the
            // sequencer (e.g. to read the tick position) would
            // otherwise deadlock against this same thread.
            drop(guard);
            match (tempo_change, event.message()) {
                (Some(_), MidiMessage::Meta(meta)) => {
                    dispatch::notify_meta_listeners(&meta_listeners, meta);
                }
                (_, message) if is_end_of_track(message) => {}
                _ => dispatch::dispatch(&receivers, &controller_listeners, &meta_listeners, event.message()),
            }
            idx += 1;
        }
    }
}

/// If looping is configured and iterations remain, decrement the
/// remaining count (if finite) and rewind to the loop start. Returns
/// whether a rewind happened.
fn restart_loop_iteration(guard: &mut PlaybackState) -> bool {
    if guard.loop_count == 0 {
        return false;
    }
    if guard.loop_count > 0 {
        guard.loop_count -= 1;
    }
    let loop_start = guard.loop_start;
    state::set_tick_position(guard, loop_start);
    true
}

fn tempo_of(message: &MidiMessage) -> Option<u32> {
    match message {
        MidiMessage::Meta(meta) => meta.tempo_micros_per_quarter(),
        _ => None,
    }
}

fn is_note_on_or_off(message: &MidiMessage) -> bool {
    matches!(message, MidiMessage::Short(s) if matches!(s.status() & 0xF0, 0x80 | 0x90))
}

fn is_end_of_track(message: &MidiMessage) -> bool {
    matches!(message, MidiMessage::Meta(meta) if meta.is_end_of_track())
}

/// Rebuild the merged playing track if `needs_refresh` is set, and
/// return it along with the index of the first event at or beyond the
/// current tick position. If a refresh actually happened (i.e. this is
/// a seek, not a plain pause/resume), fast-forward silently through
/// every skipped event first: note-on/note-off are suppressed outright
/// so a jump never leaves a stuck note, tempo-change meta events are
/// applied but never forwarded to receivers, the end-of-track marker is
/// never forwarded either, and everything else (program changes,
/// controller state, sysex) is dispatched normally so a listener
/// watching live state stays consistent across the jump.
fn sync_to_position(
    state: &Arc<Mutex<PlaybackState>>,
    receivers: &ReceiverList,
    controller_listeners: &ControllerListenerMap,
    meta_listeners: &MetaListenerList,
) -> (Vec<MidiEvent>, usize) {
    let mut guard = state.lock().unwrap();
    let was_seek = guard.needs_refresh;
    if was_seek {
        state::rebuild_playing_track(&mut guard);
    }
    let events: Vec<_> = guard.playing_track.events().cloned().collect();
    let target = guard.tick_position;
    drop(guard);

    if !was_seek {
        let idx = state::find_event_index(&events, target);
        return (events, idx);
    }

    let mut idx = 0;
    while idx < events.len() && events[idx].tick() < target {
        let event = &events[idx];
        if let Some(mpq) = tempo_of(event.message()) {
            let mut guard = state.lock().unwrap();
            state::apply_tempo_mpq(&mut guard, mpq);
            drop(guard);
            if let MidiMessage::Meta(meta) = event.message() {
                dispatch::notify_meta_listeners(meta_listeners, meta);
            }
        } else if !is_note_on_or_off(event.message()) && !is_end_of_track(event.message()) {
            dispatch::dispatch(receivers, controller_listeners, meta_listeners, event.message());
        }
        idx += 1;
    }
    (events, idx)
}
