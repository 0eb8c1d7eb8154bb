//! The Standard MIDI File codec: parsing bytes into a [`crate::Sequence`]
//! and serializing a [`crate::Sequence`] back to bytes.

pub(crate) mod reader;
pub(crate) mod writer;
