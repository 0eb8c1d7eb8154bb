use crate::division::DivisionType;
use crate::error::{invalid_data, LibResult};
use crate::track::Track;
use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::Path;

/// An in-memory MIDI sequence: a division type, a resolution, and a
/// collection of tracks, each independently owned.
#[derive(Clone, Debug)]
pub struct Sequence {
    division_type: DivisionType,
    resolution: u16,
    tracks: Vec<Track>,
}

/// The SMF file type a [`Sequence`] is written as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SmfFileType {
    /// A single track (or multiple tracks played as one).
    Type0 = 0,
    /// Multiple simultaneous tracks.
    Type1 = 1,
}

impl Sequence {
    /// Construct an empty sequence.
    pub fn new(division_type: DivisionType, resolution: u16) -> crate::Result<Self> {
        Ok(Self::new_lib(division_type, resolution)?)
    }

    pub(crate) fn new_lib(division_type: DivisionType, resolution: u16) -> LibResult<Self> {
        if resolution > division_type.max_resolution() {
            invalid_data!(
                "resolution {} exceeds the maximum {} for this division type",
                resolution,
                division_type.max_resolution()
            );
        }
        Ok(Sequence {
            division_type,
            resolution,
            tracks: Vec::new(),
        })
    }

    /// Construct with `number_of_tracks` pre-allocated empty tracks.
    pub fn with_tracks(
        division_type: DivisionType,
        resolution: u16,
        number_of_tracks: usize,
    ) -> crate::Result<Self> {
        let mut sequence = Self::new(division_type, resolution)?;
        for _ in 0..number_of_tracks {
            sequence.tracks.push(Track::new());
        }
        Ok(sequence)
    }

    pub fn division_type(&self) -> DivisionType {
        self.division_type
    }

    pub fn resolution(&self) -> u16 {
        self.resolution
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn tracks_mut(&mut self) -> &mut Vec<Track> {
        &mut self.tracks
    }

    /// Append and return a mutable reference to a new, empty track.
    pub fn create_track(&mut self) -> &mut Track {
        self.tracks.push(Track::new());
        self.tracks.last_mut().unwrap()
    }

    /// The maximum tick length over all tracks.
    pub fn tick_length(&self) -> i64 {
        self.tracks.iter().map(|t| t.ticks()).max().unwrap_or(0)
    }

    /// The sequence's length in microseconds, computed at the default
    /// tempo (120 BPM) for PPQ sequences, or from the frame rate for
    /// SMPTE sequences.
    pub fn microsecond_length(&self) -> i64 {
        if self.resolution == 0 {
            return 0;
        }
        let d: f64 = if self.division_type.is_ppq() {
            2.0
        } else {
            self.division_type.as_f32() as f64
        };
        let tick_length = self.tick_length() as f64;
        (1_000_000.0 * tick_length / (d * self.resolution as f64)) as i64
    }

    /// The SMF file types this sequence can be losslessly written as:
    /// `{Type1}` if it has more than one track, else `{Type0, Type1}`.
    pub fn midi_file_types(&self) -> HashSet<SmfFileType> {
        let mut types = HashSet::new();
        if self.tracks.len() > 1 {
            types.insert(SmfFileType::Type1);
        } else {
            types.insert(SmfFileType::Type0);
            types.insert(SmfFileType::Type1);
        }
        types
    }

    /// Parse a sequence from a complete SMF byte stream.
    pub fn read<R: Read>(mut reader: R) -> crate::Result<Self> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| crate::error::io_error(e))?;
        Ok(crate::smf::reader::parse(&bytes)?)
    }

    /// Load a sequence from an SMF file on disk.
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| crate::error::io_error(e))?;
        Ok(crate::smf::reader::parse(&bytes)?)
    }

    /// Serialize this sequence as an SMF byte stream of the given file
    /// type.
    pub fn write<W: Write>(&self, file_type: SmfFileType, mut writer: W) -> crate::Result<()> {
        let bytes = crate::smf::writer::write_bytes(self, file_type)?;
        writer
            .write_all(&bytes)
            .map_err(|e| crate::error::io_error(e))?;
        Ok(())
    }

    /// Save this sequence to an SMF file on disk.
    pub fn save<P: AsRef<Path>>(&self, file_type: SmfFileType, path: P) -> crate::Result<()> {
        let bytes = crate::smf::writer::write_bytes(self, file_type)?;
        std::fs::write(path, bytes).map_err(|e| crate::error::io_error(e))?;
        Ok(())
    }
}
