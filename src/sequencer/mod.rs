//! The real-time playback and recording engine: a [`Sequencer`] plays
//! a [`crate::Sequence`] back on a dedicated worker thread, firing
//! registered receivers and listeners as it crosses each event, and
//! can simultaneously record incoming messages from a transmitter back
//! into one of the sequence's tracks.
//!
//! The process-wide device registry a full MIDI stack would use to
//! look up receivers and transmitters by name is out of scope here;
//! callers hand handles directly to [`Sequencer::update_device_connections`].

mod dispatch;
mod recording;
mod state;
mod traits;
mod worker;

pub use traits::{ControllerEventListener, MetaEventListener, Receiver, Transmitter};

use crate::error::{unavailable, LibResult};
use crate::message::MidiMessage;
use crate::sequence::Sequence;
use dispatch::{ControllerListenerMap, MetaListenerList, ReceiverList};
use recording::RecordingReceiver;
use state::PlaybackState;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

pub use state::LOOP_CONTINUOUSLY;

/// Plays back and records [`Sequence`]s in real time on a dedicated
/// worker thread.
///
/// Cloning a `Sequencer` shares the same underlying playback state and
/// worker thread — every clone is a handle onto the same running
/// sequencer, the way a device reference is shared in the systems this
/// model descends from. Call [`Sequencer::close`] when done with it;
/// there is no `Drop`-based cleanup, since a shared handle has no
/// single owner to trigger one correctly.
pub struct Sequencer {
    state: Arc<Mutex<PlaybackState>>,
    condvar: Arc<Condvar>,
    receivers: ReceiverList,
    transmitters: Arc<Mutex<Vec<Arc<Mutex<dyn Transmitter>>>>>,
    controller_listeners: ControllerListenerMap,
    meta_listeners: MetaListenerList,
    recording_receiver: Arc<Mutex<RecordingReceiver>>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Clone for Sequencer {
    fn clone(&self) -> Self {
        Sequencer {
            state: Arc::clone(&self.state),
            condvar: Arc::clone(&self.condvar),
            receivers: Arc::clone(&self.receivers),
            transmitters: Arc::clone(&self.transmitters),
            controller_listeners: Arc::clone(&self.controller_listeners),
            meta_listeners: Arc::clone(&self.meta_listeners),
            recording_receiver: Arc::clone(&self.recording_receiver),
            worker: Arc::clone(&self.worker),
        }
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

fn require_open(state: &PlaybackState) -> LibResult<()> {
    if !state.is_open {
        unavailable!("the sequencer is not open");
    }
    Ok(())
}

impl Sequencer {
    pub fn new() -> Self {
        let state = Arc::new(Mutex::new(PlaybackState::new()));
        let receivers: ReceiverList = Arc::new(Mutex::new(Vec::new()));
        let controller_listeners: ControllerListenerMap = Arc::new(Mutex::new(HashMap::new()));
        let meta_listeners: MetaListenerList = Arc::new(Mutex::new(Vec::new()));
        let recording_receiver = Arc::new(Mutex::new(RecordingReceiver {
            state: Arc::clone(&state),
            receivers: Arc::clone(&receivers),
            controller_listeners: Arc::clone(&controller_listeners),
            meta_listeners: Arc::clone(&meta_listeners),
        }));

        Sequencer {
            state,
            condvar: Arc::new(Condvar::new()),
            receivers,
            transmitters: Arc::new(Mutex::new(Vec::new())),
            controller_listeners,
            meta_listeners,
            recording_receiver,
            worker: Arc::new(Mutex::new(None)),
        }
    }

    /// Open the sequencer and spawn its worker thread. Idempotent.
    pub fn open(&self) -> crate::Result<()> {
        let mut worker_slot = self.worker.lock().unwrap();
        {
            let mut guard = self.state.lock().unwrap();
            if guard.is_open {
                return Ok(());
            }
            guard.is_open = true;
            guard.shutdown = false;
        }
        let handles = worker::SchedulerHandles {
            state: Arc::clone(&self.state),
            condvar: Arc::clone(&self.condvar),
            receivers: Arc::clone(&self.receivers),
            controller_listeners: Arc::clone(&self.controller_listeners),
            meta_listeners: Arc::clone(&self.meta_listeners),
        };
        *worker_slot = Some(
            std::thread::Builder::new()
                .name("midi-sequencer".into())
                .spawn(move || worker::run(handles))
                .expect("failed to spawn sequencer worker thread"),
        );
        log::debug!("sequencer opened");
        Ok(())
    }

    /// Stop playback, close every registered receiver/transmitter, and
    /// join the worker thread. Idempotent.
    pub fn close(&self) {
        {
            let mut guard = self.state.lock().unwrap();
            if !guard.is_open {
                return;
            }
            guard.is_open = false;
            guard.is_running = false;
            guard.is_recording = false;
            guard.shutdown = true;
        }
        self.condvar.notify_all();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
        for receiver in self.receivers.lock().unwrap().drain(..) {
            receiver.lock().unwrap().close();
        }
        for transmitter in self.transmitters.lock().unwrap().drain(..) {
            transmitter.lock().unwrap().close();
        }
        log::debug!("sequencer closed");
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().unwrap().is_open
    }

    pub fn start(&self) -> crate::Result<()> {
        let mut guard = self.state.lock().unwrap();
        require_open(&guard)?;
        guard.is_running = true;
        guard.tick_position_set_time = std::time::Instant::now();
        drop(guard);
        self.condvar.notify_all();
        Ok(())
    }

    pub fn stop(&self) -> crate::Result<()> {
        let mut guard = self.state.lock().unwrap();
        require_open(&guard)?;
        state::rebase_position(&mut guard);
        guard.is_running = false;
        guard.is_recording = false;
        drop(guard);
        self.condvar.notify_all();
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().is_running
    }

    /// Replace the sequence this sequencer plays, resetting the tick
    /// position to zero.
    pub fn set_sequence(&self, sequence: Sequence) -> crate::Result<()> {
        let mut guard = self.state.lock().unwrap();
        guard.sequence = Some(sequence);
        guard.tick_position = 0;
        guard.tick_position_set_time = std::time::Instant::now();
        guard.loop_start = 0;
        guard.loop_end = -1;
        guard.needs_refresh = true;
        Ok(())
    }

    pub fn sequence(&self) -> Option<Sequence> {
        self.state.lock().unwrap().sequence.clone()
    }

    pub fn get_tick_position(&self) -> i64 {
        let guard = self.state.lock().unwrap();
        state::compute_tick_position(&guard)
    }

    pub fn set_tick_position(&self, tick: i64) {
        let mut guard = self.state.lock().unwrap();
        state::set_tick_position(&mut guard, tick);
        drop(guard);
        self.condvar.notify_all();
    }

    /// An approximation of the playback position in microseconds,
    /// computed from the tempo in effect right now. Unlike
    /// [`Sequence::microsecond_length`], this does not integrate over
    /// every tempo change the sequence contains up to this point.
    pub fn get_microsecond_position(&self) -> i64 {
        let guard = self.state.lock().unwrap();
        let tpus = state::ticks_per_microsecond(&guard);
        if tpus <= 0.0 {
            return 0;
        }
        (state::compute_tick_position(&guard) as f64 / tpus) as i64
    }

    pub fn tempo_bpm(&self) -> f32 {
        let mpq = self.state.lock().unwrap().tempo_mpq;
        60_000_000.0 / mpq as f32
    }

    pub fn set_tempo_bpm(&self, bpm: f32) {
        let mpq = (60_000_000.0 / bpm.max(1.0)) as u32;
        self.set_tempo_mpq(mpq);
    }

    pub fn tempo_mpq(&self) -> u32 {
        self.state.lock().unwrap().tempo_mpq
    }

    pub fn set_tempo_mpq(&self, mpq: u32) {
        let mut guard = self.state.lock().unwrap();
        state::apply_tempo_mpq(&mut guard, mpq);
    }

    pub fn tempo_factor(&self) -> f32 {
        self.state.lock().unwrap().tempo_factor
    }

    pub fn set_tempo_factor(&self, factor: f32) {
        let mut guard = self.state.lock().unwrap();
        state::apply_tempo_factor(&mut guard, factor);
    }

    /// `count == 0` plays the loop region once with no repeats;
    /// [`LOOP_CONTINUOUSLY`] loops forever; a positive count is the
    /// number of additional repeats.
    pub fn set_loop_count(&self, count: i32) {
        self.state.lock().unwrap().loop_count = count;
    }

    /// Reading a loop start point against "the sequence's length" is
    /// undefined with no sequence loaded, so this rejects that case
    /// rather than silently accepting a point that can never be
    /// reached.
    pub fn set_loop_start_point(&self, tick: i64) -> crate::Result<()> {
        let mut guard = self.state.lock().unwrap();
        if guard.sequence.is_none() {
            return Err(crate::error::invalid_data_e!(
                "cannot set a loop start point with no sequence loaded"
            )
            .into());
        }
        guard.loop_start = tick.max(0);
        Ok(())
    }

    /// `tick == -1` sets the loop end to the sequence's end. Any other
    /// value requires a loaded sequence for the same reason
    /// [`Sequencer::set_loop_start_point`] does.
    pub fn set_loop_end_point(&self, tick: i64) -> crate::Result<()> {
        let mut guard = self.state.lock().unwrap();
        if tick != -1 && guard.sequence.is_none() {
            return Err(crate::error::invalid_data_e!(
                "cannot set a loop end point with no sequence loaded"
            )
            .into());
        }
        guard.loop_end = tick;
        Ok(())
    }

    pub fn set_track_mute(&self, track: usize, mute: bool) {
        let mut guard = self.state.lock().unwrap();
        if mute {
            guard.track_mute.insert(track);
        } else {
            guard.track_mute.remove(&track);
        }
        guard.needs_refresh = true;
    }

    pub fn get_track_mute(&self, track: usize) -> bool {
        self.state.lock().unwrap().track_mute.contains(&track)
    }

    pub fn set_track_solo(&self, track: usize, solo: bool) {
        let mut guard = self.state.lock().unwrap();
        if solo {
            guard.track_solo.insert(track);
        } else {
            guard.track_solo.remove(&track);
        }
        guard.needs_refresh = true;
    }

    pub fn get_track_solo(&self, track: usize) -> bool {
        self.state.lock().unwrap().track_solo.contains(&track)
    }

    /// Enable `track` for recording. `channels`, if given, restricts
    /// recording to those channel numbers; `None` records every
    /// channel.
    pub fn set_record_enable(&self, track: usize, channels: Option<&[u8]>) {
        let mut guard = self.state.lock().unwrap();
        let filter = channels.map(|c| c.iter().copied().collect());
        guard.record_enable.insert(track, filter);
        guard.needs_refresh = true;
    }

    /// Disable recording for `track`, or every track if `None`.
    pub fn record_disable(&self, track: Option<usize>) {
        let mut guard = self.state.lock().unwrap();
        match track {
            Some(t) => {
                guard.record_enable.remove(&t);
            }
            None => {
                guard.record_enable.clear();
            }
        }
        guard.needs_refresh = true;
    }

    /// Begin recording: creates a new track in the current sequence,
    /// enables it for all 16 channels, and captures every message sent
    /// to [`Sequencer::recording_receiver_handle`] into an internal
    /// buffer, staged outside the sequence until [`Sequencer::stop_recording`]
    /// folds it into the record-enabled destination tracks. The
    /// sequencer must be open and have a sequence set; recording only
    /// actually captures messages while playback is also running, so
    /// this also starts playback.
    pub fn start_recording(&self) -> crate::Result<()> {
        {
            let mut guard = self.state.lock().unwrap();
            require_open(&guard)?;
            if guard.sequence.is_none() {
                return Err(crate::error::unavailable_e!(
                    "cannot start recording with no sequence loaded"
                )
                .into());
            }
            let sequence = guard.sequence.as_mut().unwrap();
            sequence.create_track();
            let new_track_index = sequence.tracks().len() - 1;
            guard.record_enable.insert(new_track_index, None);
            guard.recording_buffer.clear();
            guard.record_start_tick = state::compute_tick_position(&guard);
            guard.is_recording = true;
            guard.needs_refresh = true;
        }
        self.start()
    }

    /// Stop capturing new messages and fold the captured buffer back
    /// into every record-enabled track: for each such track, remove its
    /// previous events that fall within the recorded window and are
    /// recordable for that track's channel filter, then append the
    /// captured events that are recordable for it, and re-sort.
    pub fn stop_recording(&self) {
        let mut guard = self.state.lock().unwrap();
        if !guard.is_recording {
            return;
        }
        guard.is_recording = false;
        let record_start = guard.record_start_tick;
        let record_end = state::compute_tick_position(&guard);
        let captured = std::mem::take(&mut guard.recording_buffer);
        let record_enable = guard.record_enable.clone();
        if let Some(sequence) = guard.sequence.as_mut() {
            for (track_index, channel_filter) in &record_enable {
                let track = match sequence.tracks_mut().get_mut(*track_index) {
                    Some(t) => t,
                    None => continue,
                };
                track.retain(|event| {
                    let in_window = event.tick() >= record_start && event.tick() <= record_end;
                    !(in_window && state::is_recordable(event.message(), channel_filter))
                });
                for event in &captured {
                    if state::is_recordable(event.message(), channel_filter) {
                        track.add(event.clone());
                    }
                }
                track.sort_events();
            }
        }
        guard.needs_refresh = true;
    }

    pub fn is_recording(&self) -> bool {
        self.state.lock().unwrap().is_recording
    }

    /// A handle to the receiver this sequencer feeds from its attached
    /// transmitters while recording. Exposed so callers can wire it to
    /// a transmitter manually instead of going through
    /// [`Sequencer::update_device_connections`].
    pub fn recording_receiver_handle(&self) -> Arc<Mutex<dyn Receiver>> {
        self.recording_receiver.clone()
    }

    /// Replace the receivers playback is sent to and the transmitters
    /// recording is read from. Every transmitter is wired to this
    /// sequencer's internal recording receiver.
    pub fn update_device_connections(
        &self,
        receivers: Vec<Arc<Mutex<dyn Receiver>>>,
        transmitters: Vec<Arc<Mutex<dyn Transmitter>>>,
    ) {
        *self.receivers.lock().unwrap() = receivers;
        let recording_receiver: Arc<Mutex<dyn Receiver>> = self.recording_receiver.clone();
        for transmitter in &transmitters {
            transmitter
                .lock()
                .unwrap()
                .set_receiver(Some(Arc::clone(&recording_receiver)));
        }
        *self.transmitters.lock().unwrap() = transmitters;
    }

    pub fn add_controller_event_listener(
        &self,
        controller: u8,
        listener: Arc<Mutex<dyn ControllerEventListener>>,
    ) {
        self.controller_listeners
            .lock()
            .unwrap()
            .entry(controller)
            .or_insert_with(Vec::new)
            .push(listener);
    }

    pub fn remove_controller_event_listener(
        &self,
        controller: u8,
        listener: &Arc<Mutex<dyn ControllerEventListener>>,
    ) {
        if let Some(list) = self.controller_listeners.lock().unwrap().get_mut(&controller) {
            list.retain(|l| !Arc::ptr_eq(l, listener));
        }
    }

    pub fn add_meta_event_listener(&self, listener: Arc<Mutex<dyn MetaEventListener>>) {
        self.meta_listeners.lock().unwrap().push(listener);
    }

    pub fn remove_meta_event_listener(&self, listener: &Arc<Mutex<dyn MetaEventListener>>) {
        self.meta_listeners
            .lock()
            .unwrap()
            .retain(|l| !Arc::ptr_eq(l, listener));
    }
}
