use std::collections::TryReserveError;
use std::io;
use quick_error::quick_error;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        /// The source could not be opened or positioned at its start offset
        Open(err: io::Error) {
            display("can't open GIF source: {}", err)
        }
        NotGif {
            display("not a GIF file (bad signature)")
        }
        NoScreenDescriptor {
            display("GIF logical screen descriptor is missing or truncated")
        }
        InvalidScreenSize {
            display("GIF logical screen has zero width or height")
        }
        InvalidImageSize {
            display("GIF frame has zero width or height")
        }
        ImageNotConfined {
            display("GIF frame extends beyond the logical screen")
        }
        WrongRecord(byte: u8) {
            display("unexpected GIF record type 0x{:02x}", byte)
        }
        /// Malformed LZW data
        ImageDefect {
            display("GIF image data is corrupted")
        }
        /// LZW end code before all pixels of the frame were decoded
        PrematureEnd {
            display("GIF image data ended too soon")
        }
        TruncatedInput {
            display("GIF data is truncated")
        }
        RewindFailed {
            display("source can't be rewound")
        }
        NoFrames {
            display("GIF has no frames")
        }
        OutOfMemory {
            display("out of memory")
        }
        InvalidBuffer {
            display("empty or invalid byte buffer")
        }
        InvalidState(msg: &'static str) {
            display("invalid state: {}", msg)
        }
        WrongSize(msg: String) {
            display("{}", msg)
        }
        /// Internal error
        ThreadSend {
            display("Internal error; unexpectedly aborted")
        }
        ThreadJoin(msg: String) {
            display("decode thread crashed: {}", msg)
        }
        Aborted {
            display("aborted")
        }
        Io(err: io::Error) {
            from()
            display("I/O: {}", err)
        }
    }
}

pub type CatResult<T, E = Error> = Result<T, E>;

impl Error {
    /// Errors raised by the LZW decoder for a single frame
    #[must_use]
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Self::ImageDefect | Self::PrematureEnd | Self::TruncatedInput)
    }
}

impl From<TryReserveError> for Error {
    #[cold]
    fn from(_: TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for Error {
    #[cold]
    fn from(_: crossbeam_channel::SendError<T>) -> Self {
        Self::ThreadSend
    }
}

impl From<crossbeam_channel::RecvError> for Error {
    #[cold]
    fn from(_: crossbeam_channel::RecvError) -> Self {
        Self::Aborted
    }
}
