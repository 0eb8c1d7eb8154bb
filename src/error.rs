use snafu::Snafu;

/// The public Error type for this library. Opaque by design — match on
/// [`Error::kind`] rather than the hidden variant.
#[derive(Debug, Snafu)]
pub struct Error(LibError);

/// The public Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

/// The internal Result type for this library.
pub(crate) type LibResult<T> = std::result::Result<T, LibError>;

/// The two error kinds surfaced by this crate's error handling design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-range message construction, an unsupported
    /// division type, or an invalid SMF header, track, or event stream.
    InvalidMidiData,
    /// A receiver or transmitter was requested but none is registered,
    /// or the sequencer was not open when an operation required it.
    MidiUnavailable,
}

impl Error {
    /// Which of the two documented kinds this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match &self.0 {
            LibError::InvalidData { .. } => ErrorKind::InvalidMidiData,
            LibError::Unavailable { .. } => ErrorKind::MidiUnavailable,
            // A failed file load is, to a caller matching on the two
            // documented kinds, indistinguishable from unreadable data.
            LibError::Io { .. } => ErrorKind::InvalidMidiData,
        }
    }
}

/// Wrap a `std::io::Error` from `Sequence::load`/`save` as a public
/// [`Error`].
pub(crate) fn io_error(source: std::io::Error) -> Error {
    use snafu::ResultExt;
    let result: std::result::Result<(), std::io::Error> = Err(source);
    result.context(Io { site: site!() }).unwrap_err().into()
}

/// The internal Error type for this library.
#[derive(Debug, Snafu)]
#[snafu(visibility = "pub(crate)")]
pub(crate) enum LibError {
    #[snafu(display("{}: invalid MIDI data: {}", site, description))]
    InvalidData { site: String, description: String },

    #[snafu(display("{}: unavailable: {}", site, description))]
    Unavailable { site: String, description: String },

    #[snafu(display("{}: i/o error: {}", site, source))]
    Io {
        site: String,
        source: std::io::Error,
    },
}

macro_rules! site {
    () => {
        format!("{}:{}", file!(), line!())
    };
}

macro_rules! invalid_data_e {
    ($msg:expr) => {
        $crate::error::InvalidData {
            site: $crate::error::site!(),
            description: $msg,
        }
        .build()
    };
    ($fmt:expr, $($arg:expr),+) => {
        $crate::error::InvalidData {
            site: $crate::error::site!(),
            description: format!($fmt, $($arg),+),
        }
        .build()
    };
}

/// Build and return an `Err(LibError::InvalidData { .. })`.
macro_rules! invalid_data {
    ($msg:expr) => {
        return Err($crate::error::invalid_data_e!($msg))
    };
    ($fmt:expr, $($arg:expr),+) => {
        return Err($crate::error::invalid_data_e!($fmt, $($arg),+))
    };
}

macro_rules! unavailable_e {
    ($msg:expr) => {
        $crate::error::Unavailable {
            site: $crate::error::site!(),
            description: $msg,
        }
        .build()
    };
}

/// Build and return an `Err(LibError::Unavailable { .. })`.
macro_rules! unavailable {
    ($msg:expr) => {
        return Err($crate::error::unavailable_e!($msg))
    };
}

pub(crate) use invalid_data;
pub(crate) use invalid_data_e;
pub(crate) use site;
pub(crate) use unavailable_e;
pub(crate) use unavailable;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_test() {
        let line = line!() + 1;
        let site = site!();
        assert!(site.contains("error.rs"));
        assert!(site.contains(format!("{}", line).as_str()));
    }

    #[test]
    fn invalid_data_macro_test() {
        fn foo() -> LibResult<u64> {
            invalid_data!("bad byte {}", 7);
        }
        let result = foo();
        assert!(result.is_err());
        let err: Error = result.err().unwrap().into();
        assert_eq!(err.kind(), ErrorKind::InvalidMidiData);
        let message = format!("{}", err);
        assert!(message.contains("bad byte 7"));
    }

    #[test]
    fn unavailable_macro_test() {
        fn foo() -> LibResult<u64> {
            unavailable!("no receiver registered");
        }
        let result = foo();
        assert!(result.is_err());
        let err: Error = result.err().unwrap().into();
        assert_eq!(err.kind(), ErrorKind::MidiUnavailable);
    }
}
