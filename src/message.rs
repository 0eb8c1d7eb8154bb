//! The MIDI message model: a tagged sum of [`ShortMessage`],
//! [`SysexMessage`], and [`MetaMessage`], each storing its own
//! byte-exact serialized form. Every constructor validates eagerly, so
//! a constructed message is always well-formed.

use crate::error::{invalid_data, invalid_data_e, LibResult};
use crate::vlq;

/// A MIDI message: a channel/system short message, a sysex message, or
/// a meta event (the latter only meaningful inside an SMF track).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MidiMessage {
    Short(ShortMessage),
    Sysex(SysexMessage),
    Meta(MetaMessage),
}

impl MidiMessage {
    /// The exact bytes this message serializes to (status byte, or
    /// leading sysex/meta byte, included).
    pub fn raw_bytes(&self) -> &[u8] {
        match self {
            MidiMessage::Short(m) => m.raw_bytes(),
            MidiMessage::Sysex(m) => m.raw_bytes(),
            MidiMessage::Meta(m) => m.raw_bytes(),
        }
    }

    /// The leading status byte.
    pub fn status(&self) -> u8 {
        self.raw_bytes()[0]
    }

    /// The number of serialized bytes.
    pub fn len(&self) -> usize {
        self.raw_bytes().len()
    }
}

/// Returns the number of data bytes that follow a short-message status
/// byte, per the MIDI 1.0 length table. `status` must be `0x80..=0xFF`
/// and not `0xF0`/`0xF7` (those are sysex leads, not short messages).
pub(crate) fn status_length(status: u8) -> LibResult<usize> {
    match status {
        0xF6 | 0xF8 | 0xF9 | 0xFA..=0xFD | 0xFE | 0xFF => Ok(0),
        0xF1 | 0xF3 => Ok(1),
        0xF2 => Ok(2),
        0x80..=0xEF => match status & 0xF0 {
            0x80 | 0x90 | 0xA0 | 0xB0 | 0xE0 => Ok(2),
            0xC0 | 0xD0 => Ok(1),
            _ => invalid_data!("status byte {:#04x} is not a valid channel command", status),
        },
        _ => invalid_data!("status byte {:#04x} is not a valid short-message status", status),
    }
}

fn validate_data_byte(b: u8) -> LibResult<()> {
    if b > 0x7F {
        invalid_data!("data byte {:#04x} exceeds the 7-bit MIDI data range", b);
    }
    Ok(())
}

/// A 1-, 2-, or 3-byte channel voice or system message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShortMessage {
    bytes: [u8; 3],
    len: u8,
}

impl ShortMessage {
    /// Build from a raw status byte and up to two data bytes. Unused
    /// data bytes (when the status implies fewer than two) are
    /// accepted but discarded, matching the `(status, data1, data2)`
    /// constructor shape of the system this crate's model descends
    /// from.
    pub fn new(status: u8, data1: u8, data2: u8) -> crate::Result<Self> {
        Ok(Self::new_lib(status, data1, data2)?)
    }

    pub(crate) fn new_lib(status: u8, data1: u8, data2: u8) -> LibResult<Self> {
        let len = status_length(status)?;
        let mut bytes = [status, 0, 0];
        if len >= 1 {
            validate_data_byte(data1)?;
            bytes[1] = data1;
        }
        if len >= 2 {
            validate_data_byte(data2)?;
            bytes[2] = data2;
        }
        Ok(ShortMessage {
            bytes,
            len: 1 + len as u8,
        })
    }

    /// Build a channel voice message from a command nibble (e.g.
    /// `0x90` for note-on) and a channel number.
    pub fn from_command(command: u8, channel: u8, data1: u8, data2: u8) -> crate::Result<Self> {
        Ok(Self::from_command_lib(command, channel, data1, data2)?)
    }

    pub(crate) fn from_command_lib(
        command: u8,
        channel: u8,
        data1: u8,
        data2: u8,
    ) -> LibResult<Self> {
        if !(0x80..=0xE0).contains(&command) || command & 0x0F != 0 {
            invalid_data!("{:#04x} is not a channel command nibble", command);
        }
        if channel > 0x0F {
            invalid_data!("channel {} is out of range 0..=15", channel);
        }
        Self::new_lib(command | channel, data1, data2)
    }

    pub fn raw_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn status(&self) -> u8 {
        self.bytes[0]
    }

    /// The command nibble (`status & 0xF0`) for channel messages, or
    /// the full status byte for system messages (`status >= 0xF0`).
    pub fn command(&self) -> u8 {
        if self.status() < 0xF0 {
            self.status() & 0xF0
        } else {
            self.status()
        }
    }

    /// The channel number for channel messages, `None` for system
    /// messages.
    pub fn channel(&self) -> Option<u8> {
        if self.status() < 0xF0 {
            Some(self.status() & 0x0F)
        } else {
            None
        }
    }

    pub fn data1(&self) -> Option<u8> {
        self.raw_bytes().get(1).copied()
    }

    pub fn data2(&self) -> Option<u8> {
        self.raw_bytes().get(2).copied()
    }
}

/// A system exclusive message: leading byte `0xF0` (start) or `0xF7`
/// (continuation/end), followed by an opaque payload.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SysexMessage {
    bytes: Vec<u8>,
}

impl SysexMessage {
    pub fn new(status: u8, payload: &[u8]) -> crate::Result<Self> {
        Ok(Self::new_lib(status, payload)?)
    }

    pub(crate) fn new_lib(status: u8, payload: &[u8]) -> LibResult<Self> {
        if status != 0xF0 && status != 0xF7 {
            invalid_data!("{:#04x} is not a valid sysex leading byte", status);
        }
        let mut bytes = Vec::with_capacity(1 + payload.len());
        bytes.push(status);
        bytes.extend_from_slice(payload);
        Ok(SysexMessage { bytes })
    }

    pub fn raw_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn status(&self) -> u8 {
        self.bytes[0]
    }

    /// The payload, excluding the leading status byte.
    pub fn get_data(&self) -> &[u8] {
        &self.bytes[1..]
    }
}

/// A meta event: `0xFF`, a type byte `0x00..=0x7F`, a VLQ length, and
/// the payload. Only meaningful inside an SMF track.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MetaMessage {
    bytes: Vec<u8>,
}

pub(crate) const END_OF_TRACK_TYPE: u8 = 0x2F;
pub(crate) const TEMPO_TYPE: u8 = 0x51;

impl MetaMessage {
    /// Build from a type byte and payload, computing the VLQ length
    /// prefix.
    pub fn new(kind: u8, payload: &[u8]) -> crate::Result<Self> {
        Ok(Self::new_lib(kind, payload)?)
    }

    pub(crate) fn new_lib(kind: u8, payload: &[u8]) -> LibResult<Self> {
        if kind > 0x7F {
            invalid_data!("meta event type {:#04x} exceeds the 7-bit range", kind);
        }
        let mut bytes = Vec::with_capacity(2 + 5 + payload.len());
        bytes.push(0xFF);
        bytes.push(kind);
        bytes.extend_from_slice(&vlq::encode(payload.len() as u32));
        bytes.extend_from_slice(payload);
        Ok(MetaMessage { bytes })
    }

    /// Parse from raw bytes `[0xFF, type, VLQ(len), payload, ...]`.
    /// Tolerates trailing bytes beyond the declared payload length;
    /// fails if there are too few.
    pub(crate) fn from_raw(bytes: &[u8]) -> LibResult<Self> {
        if bytes.len() < 2 || bytes[0] != 0xFF {
            invalid_data!("meta event does not begin with 0xFF and a type byte");
        }
        let kind = bytes[1];
        if kind > 0x7F {
            invalid_data!("meta event type {:#04x} exceeds the 7-bit range", kind);
        }
        let (len, vlq_len) = vlq::decode_at(bytes, 2)?;
        let payload_start = 2 + vlq_len;
        let payload_end = payload_start
            .checked_add(len as usize)
            .ok_or_else(|| invalid_data_e!("meta event declares an unrepresentable payload length"))?;
        if payload_end > bytes.len() {
            invalid_data!(
                "meta event declares payload length {} but only {} bytes remain",
                len,
                bytes.len() - payload_start
            );
        }
        Ok(MetaMessage {
            bytes: bytes[..payload_end].to_vec(),
        })
    }

    pub(crate) fn end_of_track() -> Self {
        MetaMessage::new_lib(END_OF_TRACK_TYPE, &[]).expect("end-of-track is always valid")
    }

    pub fn raw_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> u8 {
        self.bytes[1]
    }

    /// The payload, excluding the `0xFF`, type byte, and VLQ length.
    pub fn payload(&self) -> &[u8] {
        let (_, vlq_len) = vlq::decode_at(&self.bytes, 2).expect("validated at construction");
        &self.bytes[2 + vlq_len..]
    }

    pub fn is_end_of_track(&self) -> bool {
        self.kind() == END_OF_TRACK_TYPE
    }

    /// If this is a well-formed tempo meta event (`FF 51 03 tt tt
    /// tt`), the tempo in microseconds per quarter note.
    pub fn tempo_micros_per_quarter(&self) -> Option<u32> {
        let raw = self.raw_bytes();
        if raw.len() == 6 && raw[1] == TEMPO_TYPE && raw[2] == 0x03 {
            Some(((raw[3] as u32) << 16) | ((raw[4] as u32) << 8) | raw[5] as u32)
        } else {
            None
        }
    }
}
