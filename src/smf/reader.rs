use crate::byte_reader::ByteReader;
use crate::division::DivisionType;
use crate::error::{invalid_data, LibResult};
use crate::event::MidiEvent;
use crate::message::{self, MetaMessage, MidiMessage, ShortMessage, SysexMessage};
use crate::sequence::Sequence;
use crate::track::Track;

/// Parse a complete SMF byte stream into a [`Sequence`].
pub(crate) fn parse(bytes: &[u8]) -> LibResult<Sequence> {
    let mut r = ByteReader::new(bytes);
    r.expect_tag(b"MThd")?;
    let header_len = r.read_u32()?;
    if header_len < 6 {
        invalid_data!("MThd chunk length {} is less than 6", header_len);
    }
    let format = r.read_u16()?;
    if !matches!(format, 0 | 1 | 2) {
        invalid_data!("unsupported SMF format {}", format);
    }
    let number_of_tracks = r.read_u16()?;
    if number_of_tracks == 0 {
        invalid_data!("SMF header declares zero tracks");
    }
    let division = r.read_u16()?;
    let (division_type, resolution) = decode_division(division)?;
    r.skip((header_len - 6) as usize)?;

    let mut sequence = Sequence::new_lib(division_type, resolution)?;
    for _ in 0..number_of_tracks {
        let track = parse_track(&mut r)?;
        sequence.tracks_mut().push(track);
    }
    Ok(sequence)
}

fn decode_division(division: u16) -> LibResult<(DivisionType, u16)> {
    if division & 0x8000 != 0 {
        let resolution = division & 0xFF;
        let upper_byte = ((division >> 8) & 0xFF) as i32;
        let frames = (256 - upper_byte) as u8;
        let division_type = DivisionType::from_smf_frame_byte(frames)
            .ok_or_else(|| crate::error::invalid_data_e!("unsupported SMPTE frame rate byte {}", frames))?;
        Ok((division_type, resolution))
    } else {
        Ok((DivisionType::Ppq, division & 0x7FFF))
    }
}

fn parse_track(r: &mut ByteReader) -> LibResult<Track> {
    r.expect_tag(b"MTrk")?;
    let _track_len = r.read_u32()?; // size-tolerant: declared length is not enforced
    let mut track = Track::new();
    let mut running_status: i32 = -1;
    let mut ticks: i64 = 0;

    loop {
        let delta = r.read_vlq()? as i64;
        ticks += delta;
        let d = r.read_u8()?;

        if d < 0x80 {
            if (0x00..0xF0).contains(&running_status) {
                let status = running_status as u8;
                let msg = parse_running_channel(r, status, d)?;
                track.add(MidiEvent::new(msg, ticks));
            } else if (0xF0..=0xFF).contains(&running_status) {
                let status = running_status as u8;
                let msg = parse_running_system(status, d)?;
                track.add(MidiEvent::new(msg, ticks));
            } else {
                invalid_data!("data byte {:#04x} encountered with no running status", d);
            }
        } else if (0x80..0xF0).contains(&d) {
            let data1 = r.read_u8()?;
            let msg = parse_running_channel(r, d, data1)?;
            running_status = d as i32;
            track.add(MidiEvent::new(msg, ticks));
        } else if d == 0xF0 || d == 0xF7 {
            let len = r.read_vlq()? as usize;
            if len > r.remaining() {
                invalid_data!("sysex length {} exceeds the {} bytes remaining", len, r.remaining());
            }
            let payload = r.read_n(len)?;
            let msg = MidiMessage::Sysex(SysexMessage::new_lib(d, payload)?);
            track.add(MidiEvent::new(msg, ticks));
            running_status = -1;
        } else if d == 0xFF {
            let kind = r.read_u8()?;
            let len = r.read_vlq()? as usize;
            if len > r.remaining() {
                invalid_data!("meta event length {} exceeds the {} bytes remaining", len, r.remaining());
            }
            let payload = r.read_n(len)?;
            let is_eot = kind == message::END_OF_TRACK_TYPE;
            let msg = MetaMessage::new_lib(kind, payload)?;
            track.add(MidiEvent::new(MidiMessage::Meta(msg), ticks));
            running_status = -1;
            if is_eot {
                break;
            }
        } else {
            let msg = parse_new_system(r, d)?;
            running_status = d as i32;
            track.add(MidiEvent::new(msg, ticks));
        }

        if r.is_end() {
            // No end-of-track meta event was found before the bytes
            // ran out; treat the track as finished rather than
            // looping forever.
            break;
        }
    }

    track.sort_events();
    Ok(track)
}

fn parse_running_channel(r: &mut ByteReader, status: u8, data1: u8) -> LibResult<MidiMessage> {
    match status & 0xF0 {
        0x80 | 0x90 | 0xA0 | 0xB0 | 0xE0 => {
            let data2 = r.read_u8()?;
            Ok(MidiMessage::Short(ShortMessage::new_lib(status, data1, data2)?))
        }
        0xC0 | 0xD0 => Ok(MidiMessage::Short(ShortMessage::new_lib(status, data1, 0)?)),
        _ => invalid_data!("{:#04x} is not a valid running-status channel byte", status),
    }
}

fn parse_running_system(status: u8, data1: u8) -> LibResult<MidiMessage> {
    match status {
        0xF1 | 0xF3 => Ok(MidiMessage::Short(ShortMessage::new_lib(status, data1, 0)?)),
        0xF2 => invalid_data!(
            "running status for {:#04x} requires a second data byte not available here",
            status
        ),
        _ => invalid_data!("{:#04x} does not take data bytes via running status", status),
    }
}

fn parse_new_system(r: &mut ByteReader, status: u8) -> LibResult<MidiMessage> {
    let len = message::status_length(status)?;
    let data1 = if len >= 1 { r.read_u8()? } else { 0 };
    let data2 = if len >= 2 { r.read_u8()? } else { 0 };
    Ok(MidiMessage::Short(ShortMessage::new_lib(status, data1, data2)?))
}
