/*
 gifplay GIF animation decoder and player
 © 2017 Kornel Lesiński

 This program is free software: you can redistribute it and/or modify
 it under the terms of the GNU Affero General Public License as
 published by the Free Software Foundation, either version 3 of the
 License, or (at your option) any later version.

 This program is distributed in the hope that it will be useful,
 but WITHOUT ANY WARRANTY; without even the implied warranty of
 MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 GNU Affero General Public License for more details.

 You should have received a copy of the GNU Affero General Public License
 along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use rgb::RGB8;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

mod error;
pub use crate::error::*;
mod source;
pub use crate::source::*;
mod blocks;
mod lzw;
mod parser;
pub use crate::parser::{DisposalMethod, Frame, FrameDescriptor, GraphicsControl, Rect, COMMENT_LENGTH_MAX, DEFAULT_FRAME_DURATION_MS};
mod compose;
pub use crate::compose::Canvas;
mod playback;
pub use crate::playback::{Clock, ManualClock, MonotonicClock, PlaybackState, SavedState, SeekTarget, Tick};
mod animation;
pub use crate::animation::Animation;
mod pipeline;
pub use crate::pipeline::{FrameGuard, RenderPipeline};
pub mod c_api;
pub use crate::c_api::GifplayError;

/// Per-animation options. See [`Animation::set_options`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Down-sampling factor: keep every Nth pixel of every Nth row. 0 and 1 mean full size.
    pub sample_size: u16,
    /// Draw only color channels, leaving the canvas alpha as it was
    pub is_opaque: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sample_size: 1,
            is_opaque: false,
        }
    }
}

/// Everything known about a GIF without decoding its pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub width: usize,
    pub height: usize,
    pub frame_count: usize,
    /// 0 is infinite
    pub loop_count: u32,
    /// Duration of one loop
    pub duration: Duration,
    pub comment: Option<String>,
    pub source_length: Option<u64>,
    pub allocation_byte_count: usize,
    pub metadata_byte_count: usize,
}

/// Shared state for opening animations.
///
/// Holds the greyscale palette used for frames that come without one.
#[derive(Clone)]
pub struct Context {
    default_palette: Arc<[RGB8]>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_palette: compose::default_palette(),
        }
    }

    /// Reads the GIF's metadata and prepares it for playback.
    ///
    /// Fails if the file is not a GIF, is malformed before the first frame, or has no frames.
    pub fn open(&self, source: impl GifSource + 'static) -> CatResult<Animation> {
        Animation::new(Box::new(source), self.default_palette.clone())
    }

    pub fn open_path(&self, path: impl AsRef<Path>) -> CatResult<Animation> {
        self.open(FileSource::open(path)?)
    }

    pub fn open_bytes(&self, data: impl Into<Vec<u8>>) -> CatResult<Animation> {
        self.open(BytesSource::new(data)?)
    }

    /// The reader only has to be read forward. Frames are replayed from memory when looping.
    pub fn open_stream(&self, reader: impl Read + Send + 'static) -> CatResult<Animation> {
        self.open(StreamSource::new(reader))
    }

    /// Reads the metadata and closes the source
    pub fn open_metadata(&self, source: impl GifSource + 'static) -> CatResult<Metadata> {
        Ok(self.open(source)?.metadata())
    }
}
