//! Rewindable byte sources for the parser
//!
//! The parser reads the header once, calls `mark()`, and from then on
//! returns to that position with `rewind()` every time playback loops
//! or seeks backwards.

use crate::error::{CatResult, Error};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Size of the chunks pulled from a push-style stream
const STREAM_BUFFER_SIZE: usize = 8192;

/// Byte source with read and rewind-to-mark semantics.
pub trait GifSource: Send {
    /// Fills as much of `buf` as possible. Returns fewer bytes only at the end of data.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Remembers the current position as the target of `rewind`.
    fn mark(&mut self) -> io::Result<()>;

    /// Returns to the marked position.
    fn rewind(&mut self) -> io::Result<()>;

    /// Total size of the underlying data, if known
    fn source_length(&self) -> Option<u64> {
        None
    }

    /// Called once when the animation is closed.
    fn close(&mut self) {}
}

impl<T: GifSource + ?Sized> GifSource for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn mark(&mut self) -> io::Result<()> {
        (**self).mark()
    }

    fn rewind(&mut self) -> io::Result<()> {
        (**self).rewind()
    }

    fn source_length(&self) -> Option<u64> {
        (**self).source_length()
    }

    fn close(&mut self) {
        (**self).close();
    }
}

fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// A file, optionally starting at an offset (e.g. a GIF embedded in a larger file)
pub struct FileSource {
    file: File,
    start: u64,
    length: Option<u64>,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> CatResult<Self> {
        let file = File::open(path).map_err(Error::Open)?;
        Self::with_offset(file, 0)
    }

    /// GIF data starts `offset` bytes into the file.
    pub fn with_offset(mut file: File, offset: u64) -> CatResult<Self> {
        file.seek(SeekFrom::Start(offset)).map_err(Error::Open)?;
        let length = file.metadata().ok().map(|m| m.len());
        Ok(Self { file, start: offset, length })
    }
}

impl GifSource for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        read_full(&mut self.file, buf)
    }

    fn mark(&mut self) -> io::Result<()> {
        self.start = self.file.stream_position()?;
        Ok(())
    }

    fn rewind(&mut self) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(self.start))?;
        Ok(())
    }

    fn source_length(&self) -> Option<u64> {
        self.length
    }
}

/// In-memory GIF data
pub struct BytesSource {
    data: Vec<u8>,
    position: usize,
    start: usize,
}

impl BytesSource {
    /// Fails with `InvalidBuffer` if `data` is empty.
    pub fn new(data: impl Into<Vec<u8>>) -> CatResult<Self> {
        let data = data.into();
        if data.is_empty() {
            return Err(Error::InvalidBuffer);
        }
        Ok(Self { data, position: 0, start: 0 })
    }
}

impl GifSource for BytesSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.data.get(self.position..).unwrap_or_default();
        let len = buf.len().min(available.len());
        buf[..len].copy_from_slice(&available[..len]);
        self.position += len;
        Ok(len)
    }

    fn mark(&mut self) -> io::Result<()> {
        self.start = self.position;
        Ok(())
    }

    fn rewind(&mut self) -> io::Result<()> {
        self.position = self.start;
        Ok(())
    }

    fn source_length(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}

/// A push-style stream that can't seek.
///
/// Everything read after `mark()` is retained, so that `rewind()` can replay it.
/// The whole GIF (minus its header) ends up in memory after the first loop.
pub struct StreamSource<R> {
    reader: R,
    replay: Vec<u8>,
    position: usize,
    marked: bool,
    close_hook: Option<Box<dyn FnOnce() + Send>>,
}

impl<R: Read + Send> StreamSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            replay: Vec::new(),
            position: 0,
            marked: false,
            close_hook: None,
        }
    }

    /// `hook` runs once, when the animation using this stream is closed or dropped.
    /// Use it to release the underlying resource.
    #[must_use]
    pub fn with_close_hook(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.close_hook = Some(Box::new(hook));
        self
    }

    fn fill_replay(&mut self) -> io::Result<usize> {
        let mut chunk = [0u8; STREAM_BUFFER_SIZE];
        let len = read_full(&mut self.reader, &mut chunk)?;
        self.replay.try_reserve(len).map_err(|_| io::Error::from(io::ErrorKind::OutOfMemory))?;
        self.replay.extend_from_slice(&chunk[..len]);
        Ok(len)
    }
}

impl<R: Read + Send> GifSource for StreamSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.marked {
            return read_full(&mut self.reader, buf);
        }
        let mut total = 0;
        while total < buf.len() {
            if self.position == self.replay.len() && self.fill_replay()? == 0 {
                break;
            }
            let available = &self.replay[self.position..];
            let len = (buf.len() - total).min(available.len());
            buf[total..total + len].copy_from_slice(&available[..len]);
            self.position += len;
            total += len;
        }
        Ok(total)
    }

    fn mark(&mut self) -> io::Result<()> {
        self.replay.drain(..self.position);
        self.position = 0;
        self.marked = true;
        Ok(())
    }

    fn rewind(&mut self) -> io::Result<()> {
        if !self.marked {
            return Err(io::Error::new(io::ErrorKind::Unsupported, "stream has not been marked"));
        }
        self.position = 0;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(hook) = self.close_hook.take() {
            hook();
        }
    }
}

impl<R> Drop for StreamSource<R> {
    fn drop(&mut self) {
        if let Some(hook) = self.close_hook.take() {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};
    use std::sync::Arc;

    fn read_all(src: &mut dyn GifSource, len: usize) -> Vec<u8> {
        let mut buf = vec![0; len];
        let n = src.read(&mut buf).unwrap();
        buf.truncate(n);
        buf
    }

    #[test]
    fn bytes_rewind_to_mark() {
        let mut src = BytesSource::new(b"headerBODY".to_vec()).unwrap();
        assert_eq!(read_all(&mut src, 6), b"header");
        src.mark().unwrap();
        assert_eq!(read_all(&mut src, 100), b"BODY");
        assert_eq!(read_all(&mut src, 1), b"");
        src.rewind().unwrap();
        assert_eq!(read_all(&mut src, 2), b"BO");
        assert_eq!(src.source_length(), Some(10));
    }

    #[test]
    fn empty_buffer_is_rejected() {
        assert!(matches!(BytesSource::new(Vec::new()), Err(Error::InvalidBuffer)));
    }

    #[test]
    fn stream_replays_after_mark() {
        let data: Vec<u8> = (0..20000u32).map(|i| i as u8).collect();
        let mut src = StreamSource::new(io::Cursor::new(data.clone()));
        assert!(src.rewind().is_err());
        assert_eq!(read_all(&mut src, 13), &data[..13]);
        src.mark().unwrap();
        assert_eq!(read_all(&mut src, 9000), &data[13..9013]);
        src.rewind().unwrap();
        assert_eq!(read_all(&mut src, 30000), &data[13..]);
        src.rewind().unwrap();
        assert_eq!(read_all(&mut src, 5), &data[13..18]);
        assert_eq!(src.source_length(), None);
    }

    #[test]
    fn stream_close_hook_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let mut src = StreamSource::new(io::empty()).with_close_hook(move || {
            c.fetch_add(1, SeqCst);
        });
        src.close();
        src.close();
        drop(src);
        assert_eq!(1, calls.load(SeqCst));
    }

    #[test]
    fn file_with_offset() {
        let path = std::env::temp_dir().join(format!("gifplay-source-test-{}.bin", std::process::id()));
        File::create(&path).unwrap().write_all(b"junkGIF89a").unwrap();
        let mut src = FileSource::with_offset(File::open(&path).unwrap(), 4).unwrap();
        assert_eq!(read_all(&mut src, 3), b"GIF");
        src.mark().unwrap();
        assert_eq!(read_all(&mut src, 10), b"89a");
        src.rewind().unwrap();
        assert_eq!(read_all(&mut src, 2), b"89");
        assert_eq!(src.source_length(), Some(10));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_file() {
        assert!(matches!(FileSource::open("/nonexistent/gifplay.gif"), Err(Error::Open(_))));
    }
}
