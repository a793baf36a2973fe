use crate::error::Error;
use std::fmt;
use std::io;
use std::os::raw::c_int;

/// Error codes returned by the C functions and by [`Animation::native_error_code`](crate::Animation::native_error_code).
///
/// The numbers of the decoder errors are giflib's.
#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[allow(non_camel_case_types)]
#[allow(clippy::upper_case_acronyms)]
pub enum GifplayError {
    OK = 0,
    OPEN_FAILED = 101,
    READ_FAILED = 102,
    NOT_GIF_FILE = 103,
    NO_SCRN_DSCR = 104,
    WRONG_RECORD = 107,
    NOT_ENOUGH_MEM = 109,
    IMAGE_DEFECT = 112,
    EOF_TOO_SOON = 113,
    NO_FRAMES = 1000,
    INVALID_SCR_DIMS = 1001,
    INVALID_IMG_DIMS = 1002,
    IMG_NOT_CONFINED = 1003,
    REWIND_FAILED = 1004,
    INVALID_BYTE_BUFFER = 1005,
    NULL_ARG = 2000,
    INVALID_STATE,
    INVALID_INPUT,
    THREAD_LOST,
    ABORTED,
    OTHER,
}

impl From<c_int> for GifplayError {
    #[cold]
    fn from(res: c_int) -> Self {
        use GifplayError::*;
        [
            OK, OPEN_FAILED, READ_FAILED, NOT_GIF_FILE, NO_SCRN_DSCR, WRONG_RECORD, NOT_ENOUGH_MEM,
            IMAGE_DEFECT, EOF_TOO_SOON, NO_FRAMES, INVALID_SCR_DIMS, INVALID_IMG_DIMS, IMG_NOT_CONFINED,
            REWIND_FAILED, INVALID_BYTE_BUFFER, NULL_ARG, INVALID_STATE, INVALID_INPUT, THREAD_LOST, ABORTED,
        ]
        .into_iter()
        .find(|&code| code as c_int == res)
        .unwrap_or(OTHER)
    }
}

impl From<&Error> for GifplayError {
    #[cold]
    fn from(err: &Error) -> Self {
        use crate::error::Error::*;
        match err {
            Open(_) => Self::OPEN_FAILED,
            Io(err) => err.kind().into(),
            NotGif => Self::NOT_GIF_FILE,
            NoScreenDescriptor => Self::NO_SCRN_DSCR,
            InvalidScreenSize => Self::INVALID_SCR_DIMS,
            InvalidImageSize => Self::INVALID_IMG_DIMS,
            ImageNotConfined => Self::IMG_NOT_CONFINED,
            WrongRecord(_) => Self::WRONG_RECORD,
            ImageDefect => Self::IMAGE_DEFECT,
            PrematureEnd => Self::EOF_TOO_SOON,
            TruncatedInput => Self::READ_FAILED,
            RewindFailed => Self::REWIND_FAILED,
            NoFrames => Self::NO_FRAMES,
            OutOfMemory => Self::NOT_ENOUGH_MEM,
            InvalidBuffer => Self::INVALID_BYTE_BUFFER,
            InvalidState(_) => Self::INVALID_STATE,
            WrongSize(_) => Self::INVALID_INPUT,
            ThreadSend | ThreadJoin(_) => Self::THREAD_LOST,
            Aborted => Self::ABORTED,
        }
    }
}

impl<T> From<Result<T, Error>> for GifplayError {
    #[cold]
    fn from(res: Result<T, Error>) -> Self {
        match res {
            Ok(_) => Self::OK,
            Err(ref err) => err.into(),
        }
    }
}

impl From<io::ErrorKind> for GifplayError {
    #[cold]
    fn from(res: io::ErrorKind) -> Self {
        use std::io::ErrorKind as EK;
        match res {
            EK::NotFound | EK::PermissionDenied => Self::OPEN_FAILED,
            EK::UnexpectedEof => Self::EOF_TOO_SOON,
            EK::InvalidInput | EK::InvalidData => Self::INVALID_INPUT,
            EK::OutOfMemory => Self::NOT_ENOUGH_MEM,
            EK::Interrupted => Self::ABORTED,
            _ => Self::READ_FAILED,
        }
    }
}

impl std::error::Error for GifplayError {}

impl fmt::Display for GifplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
