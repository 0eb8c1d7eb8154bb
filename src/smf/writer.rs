use crate::division::DivisionType;
use crate::error::LibResult;
use crate::message::MidiMessage;
use crate::sequence::{Sequence, SmfFileType};
use crate::track::Track;
use crate::vlq;

/// Serialize `sequence` as a complete SMF byte stream of `file_type`.
pub(crate) fn write_bytes(sequence: &Sequence, file_type: SmfFileType) -> LibResult<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(b"MThd");
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&(file_type as u16).to_be_bytes());
    out.extend_from_slice(&(sequence.tracks().len() as u16).to_be_bytes());
    out.extend_from_slice(&encode_division(sequence.division_type(), sequence.resolution()));

    for track in sequence.tracks() {
        let body = write_track_body(track);
        out.extend_from_slice(b"MTrk");
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&body);
    }

    Ok(out)
}

fn encode_division(division_type: DivisionType, resolution: u16) -> [u8; 2] {
    let value: i16 = match division_type.smf_frame_byte() {
        None => (resolution & 0x7FFF) as i16,
        Some(frames) => -((frames as i16) << 8) + (resolution & 0xFF) as i16,
    };
    (value as u16).to_be_bytes()
}

/// Write one track's body, dropping system real-time messages (status
/// `>= 0xF8`) and folding their delta time into the next event,
/// exactly as the writer's one deliberate asymmetry with the reader
/// specifies.
fn write_track_body(track: &Track) -> Vec<u8> {
    let mut out = Vec::new();
    let mut last_tick: i64 = 0;
    let mut pending_delta: i64 = 0;
    let mut wrote_eot = false;

    for event in track.events() {
        let step = event.tick() - last_tick;
        last_tick = event.tick();

        if is_dropped_real_time(event.message()) {
            log::trace!(
                "dropping system real-time message {:#04x} at tick {} from the written track",
                event.message().status(),
                event.tick()
            );
            pending_delta += step;
            continue;
        }

        let delta = pending_delta + step;
        pending_delta = 0;
        debug_assert!(delta >= 0, "track events must be non-decreasing in tick");
        out.extend_from_slice(&vlq::encode(delta.max(0) as u32));

        match event.message() {
            MidiMessage::Sysex(sysex) => {
                out.push(sysex.status());
                let data = sysex.get_data();
                out.extend_from_slice(&vlq::encode(data.len() as u32));
                out.extend_from_slice(data);
            }
            other => out.extend_from_slice(other.raw_bytes()),
        }

        wrote_eot = matches!(event.message(), MidiMessage::Meta(m) if m.is_end_of_track());
    }

    if !wrote_eot {
        out.extend_from_slice(&vlq::encode(0));
        out.extend_from_slice(&[0xFF, 0x2F, 0x00]);
    }

    out
}

fn is_dropped_real_time(message: &MidiMessage) -> bool {
    matches!(message, MidiMessage::Short(s) if s.status() >= 0xF8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MidiEvent;
    use crate::message::{MetaMessage, ShortMessage};

    #[test]
    fn minimal_type0_round_trip_matches_exact_bytes() {
        let mut sequence = Sequence::new(DivisionType::Ppq, 480).unwrap();
        let track = sequence.create_track();
        track.add(MidiEvent::new(
            MidiMessage::Short(ShortMessage::from_command(0x90, 0, 60, 100).unwrap()),
            0,
        ));
        track.add(MidiEvent::new(
            MidiMessage::Short(ShortMessage::from_command(0x80, 0, 60, 0).unwrap()),
            480,
        ));
        track.sort_events();

        let bytes = write_bytes(&sequence, SmfFileType::Type0).unwrap();
        let expected_header: &[u8] = &[
            0x4D, 0x54, 0x68, 0x64, 0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x01, 0x01, 0xE0,
        ];
        assert_eq!(&bytes[0..14], expected_header);

        let expected_track_payload: &[u8] =
            &[0x00, 0x90, 0x3C, 0x64, 0x83, 0x60, 0x80, 0x3C, 0x00, 0x00, 0xFF, 0x2F, 0x00];
        assert_eq!(&bytes[14..18], b"MTrk");
        let len = u32::from_be_bytes([bytes[18], bytes[19], bytes[20], bytes[21]]) as usize;
        assert_eq!(len, expected_track_payload.len());
        assert_eq!(&bytes[22..22 + len], expected_track_payload);
    }

    #[test]
    fn real_time_messages_are_dropped_and_their_delta_is_folded() {
        let mut sequence = Sequence::new(DivisionType::Ppq, 24).unwrap();
        let track = sequence.create_track();
        track.add(MidiEvent::new(
            MidiMessage::Short(ShortMessage::new(0xF8, 0, 0).unwrap()),
            5,
        ));
        track.add(MidiEvent::new(
            MidiMessage::Short(ShortMessage::from_command(0x90, 0, 60, 100).unwrap()),
            10,
        ));
        track.sort_events();
        let body = write_track_body(track);
        // First written event should be the note-on with its delta
        // time (10) including the dropped clock's contribution.
        assert_eq!(&body[0..4], &[10, 0x90, 0x3C, 0x64]);
    }

    #[test]
    fn append_eot_when_last_event_is_not_meta() {
        let mut track = Track::new();
        track.add(MidiEvent::new(
            MidiMessage::Short(ShortMessage::from_command(0x90, 0, 60, 100).unwrap()),
            0,
        ));
        let body = write_track_body(&track);
        assert_eq!(&body[body.len() - 3..], &[0xFF, 0x2F, 0x00]);
    }

    #[test]
    fn get_midi_file_types_respected_by_writer_enum() {
        // file_type values correspond to the SMF format field exactly.
        assert_eq!(SmfFileType::Type0 as u16, 0);
        assert_eq!(SmfFileType::Type1 as u16, 1);
    }

    #[test]
    fn does_not_duplicate_preexisting_end_of_track() {
        let mut track = Track::new();
        track.add(MidiEvent::new(
            MidiMessage::Meta(MetaMessage::end_of_track()),
            0,
        ));
        let body = write_track_body(&track);
        assert_eq!(body, vec![0x00, 0xFF, 0x2F, 0x00]);
    }
}
