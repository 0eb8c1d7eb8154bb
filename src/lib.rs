//! A Standard MIDI File codec and an in-memory sequencer runtime.
//!
//! The codec (see [`Sequence`], [`message`], [`track`]) reads and
//! writes SMF type-0 and type-1 files, tolerant of type-2 files on
//! read. [`sequencer::Sequencer`] plays back (and records into) a
//! [`Sequence`] in real time on a dedicated worker thread.
//!
//! This crate has no CLI, no environment variable surface, and no
//! on-disk state beyond SMF files themselves. The process-wide device
//! registry that a full MIDI stack would use to look up receivers and
//! transmitters by name is not part of this crate; callers hand
//! [`sequencer::Receiver`]/[`sequencer::Transmitter`] handles directly
//! to [`sequencer::Sequencer::update_device_connections`].

mod error;

mod byte_reader;
mod division;
mod event;
mod message;
mod sequence;
pub mod sequencer;
mod smf;
mod track;
mod vlq;

pub use division::DivisionType;
pub use error::{Error, ErrorKind, Result};
pub use event::MidiEvent;
pub use message::{MetaMessage, MidiMessage, ShortMessage, SysexMessage};
pub use sequence::{Sequence, SmfFileType};
pub use track::Track;
pub use vlq::{decode as decode_vlq, encode as encode_vlq};
