//! GIF record parsing.
//!
//! Opening runs a metadata scan over the whole file: it collects frame descriptors,
//! graphics control blocks, the comment and the loop count, and walks image data
//! without decompressing it. Decoding then jumps to one frame at a time, rewinding
//! to the first record when playback moves backwards.

use crate::blocks::BlockReader;
use crate::error::{CatResult, Error};
use crate::lzw::LzwDecoder;
use crate::source::GifSource;
use log::{debug, trace, warn};
use rgb::RGB8;

/// Frame duration used when the delay is missing, 0 or 1 centiseconds
pub const DEFAULT_FRAME_DURATION_MS: u32 = 100;
/// Longest comment kept, including room for a terminator
pub const COMMENT_LENGTH_MAX: usize = 2048;

const IMAGE_DESCRIPTOR: u8 = 0x2C;
const EXTENSION: u8 = 0x21;
const TRAILER: u8 = 0x3B;

const GRAPHICS_CONTROL: u8 = 0xF9;
const COMMENT: u8 = 0xFE;
const APPLICATION: u8 = 0xFF;

const INTERLACED_OFFSETS: [usize; 4] = [0, 4, 2, 1];
const INTERLACED_JUMPS: [usize; 4] = [8, 8, 4, 2];

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum DisposalMethod {
    #[default]
    Unspecified,
    DoNotDispose,
    RestoreBackground,
    RestorePrevious,
}

impl DisposalMethod {
    fn from_packed(bits: u8) -> Self {
        match bits {
            1 => Self::DoNotDispose,
            2 => Self::RestoreBackground,
            3 => Self::RestorePrevious,
            _ => Self::Unspecified,
        }
    }
}

/// Per-frame timing, disposal and transparency
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GraphicsControl {
    pub disposal: DisposalMethod,
    /// Already converted to milliseconds, with the 100ms default applied
    pub delay_ms: u32,
    pub transparent_index: Option<u8>,
}

impl Default for GraphicsControl {
    fn default() -> Self {
        Self {
            disposal: DisposalMethod::Unspecified,
            delay_ms: DEFAULT_FRAME_DURATION_MS,
            transparent_index: None,
        }
    }
}

impl GraphicsControl {
    fn parse(block: &[u8]) -> Option<Self> {
        let &[packed, delay_lo, delay_hi, transparent] = block else {
            return None;
        };
        let delay = u32::from(u16::from_le_bytes([delay_lo, delay_hi]));
        Some(Self {
            disposal: DisposalMethod::from_packed((packed >> 2) & 0x07),
            delay_ms: if delay > 1 { delay * 10 } else { DEFAULT_FRAME_DURATION_MS },
            transparent_index: if packed & 0x01 != 0 { Some(transparent) } else { None },
        })
    }
}

/// Rectangle in canvas pixels
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: usize,
    pub top: usize,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    /// `other` lies entirely within `self`
    #[must_use]
    pub fn covers(&self, other: &Rect) -> bool {
        self.left <= other.left
            && other.left + other.width <= self.left + self.width
            && self.top <= other.top
            && other.top + other.height <= self.top + self.height
    }

    #[must_use]
    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

/// Image descriptor as stored in the file, before any sampling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    pub interlaced: bool,
    pub palette: Option<Vec<RGB8>>,
}

impl FrameDescriptor {
    /// Geometry after integer down-sampling
    #[must_use]
    pub fn rect(&self, sample_size: u16) -> Rect {
        let n = usize::from(sample_size.max(1));
        Rect {
            left: usize::from(self.left) / n,
            top: usize::from(self.top) / n,
            width: usize::from(self.width) / n,
            height: usize::from(self.height) / n,
        }
    }

    fn pixel_count(&self) -> usize {
        usize::from(self.width) * usize::from(self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub descriptor: FrameDescriptor,
    pub control: GraphicsControl,
}

#[derive(Debug, Clone)]
pub(crate) struct ScreenDescriptor {
    pub width: u16,
    pub height: u16,
    pub background_index: u8,
    pub global_palette: Option<Vec<RGB8>>,
}

impl ScreenDescriptor {
    /// Down-sampled dimensions, never less than 1x1
    pub fn size(&self, sample_size: u16) -> (usize, usize) {
        let n = usize::from(sample_size.max(1));
        ((usize::from(self.width) / n).max(1), (usize::from(self.height) / n).max(1))
    }
}

pub(crate) struct GifParser {
    reader: BlockReader<Box<dyn GifSource>>,
    lzw: LzwDecoder,
    screen: ScreenDescriptor,
    frames: Vec<Frame>,
    /// 0 is infinite, otherwise the number of times to play
    loop_count: u32,
    comment: Vec<u8>,
    raster: Vec<u8>,
    largest_frame: usize,
    /// Index of the next image record in the stream. Unknown after an error.
    position: Option<usize>,
}

impl GifParser {
    /// Reads the header and scans all records. The source is left at the first record.
    pub fn open(source: Box<dyn GifSource>) -> CatResult<Self> {
        let mut reader = BlockReader::new(source);
        let screen = read_header(&mut reader)?;
        reader.mark()?;

        let mut parser = Self {
            reader,
            lzw: LzwDecoder::new(),
            screen,
            frames: Vec::new(),
            loop_count: 1,
            comment: Vec::new(),
            raster: Vec::new(),
            largest_frame: 0,
            position: None,
        };
        parser.scan()?;
        parser.reader.rewind()?;
        parser.position = Some(0);
        Ok(parser)
    }

    fn scan(&mut self) -> CatResult<()> {
        let mut pending_control = None;
        loop {
            let Some(record) = self.reader.try_read_u8()? else {
                if self.frames.is_empty() {
                    return Err(Error::NoFrames);
                }
                warn!("GIF has no trailer after {} frames", self.frames.len());
                break;
            };
            match record {
                IMAGE_DESCRIPTOR => {
                    let descriptor = self.read_image_descriptor()?;
                    trace!("frame {}: {descriptor:?}", self.frames.len());
                    self.reader.read_u8()?;
                    self.reader.skip_blocks()?;
                    self.largest_frame = self.largest_frame.max(descriptor.pixel_count());
                    self.frames.try_reserve(1)?;
                    self.frames.push(Frame {
                        descriptor,
                        control: pending_control.take().unwrap_or_default(),
                    });
                },
                EXTENSION => {
                    let label = self.reader.read_u8()?;
                    trace!("extension 0x{label:02x}");
                    match label {
                        GRAPHICS_CONTROL => pending_control = self.read_graphics_control()?.or(pending_control),
                        COMMENT => self.read_comment()?,
                        APPLICATION => self.read_application()?,
                        _ => self.reader.skip_blocks()?,
                    }
                },
                TRAILER => break,
                other => return Err(Error::WrongRecord(other)),
            }
        }
        if self.frames.is_empty() {
            return Err(Error::NoFrames);
        }
        debug!(
            "GIF {}x{}: {} frames, loop count {}, comment {} bytes",
            self.screen.width,
            self.screen.height,
            self.frames.len(),
            self.loop_count,
            self.comment.len()
        );
        Ok(())
    }

    fn read_image_descriptor(&mut self) -> CatResult<FrameDescriptor> {
        let left = self.reader.read_u16()?;
        let top = self.reader.read_u16()?;
        let width = self.reader.read_u16()?;
        let height = self.reader.read_u16()?;
        let flags = self.reader.read_u8()?;
        if width == 0 || height == 0 {
            return Err(Error::InvalidImageSize);
        }
        if u32::from(left) + u32::from(width) > u32::from(self.screen.width)
            || u32::from(top) + u32::from(height) > u32::from(self.screen.height)
        {
            return Err(Error::ImageNotConfined);
        }
        let palette = if flags & 0x80 != 0 {
            Some(read_palette(&mut self.reader, flags)?)
        } else {
            None
        };
        Ok(FrameDescriptor {
            left,
            top,
            width,
            height,
            interlaced: flags & 0x40 != 0,
            palette,
        })
    }

    /// The last well-formed block in an extension wins
    fn read_graphics_control(&mut self) -> CatResult<Option<GraphicsControl>> {
        let mut control = None;
        while let Some(block) = self.reader.read_block()? {
            match GraphicsControl::parse(block) {
                Some(parsed) => control = Some(parsed),
                None => warn!("ignoring graphics control block of {} bytes", block.len()),
            }
        }
        Ok(control)
    }

    fn read_comment(&mut self) -> CatResult<()> {
        while let Some(block) = self.reader.read_block()? {
            if self.comment.len() + block.len() + 1 <= COMMENT_LENGTH_MAX {
                self.comment.extend_from_slice(block);
            }
        }
        Ok(())
    }

    fn read_application(&mut self) -> CatResult<()> {
        let Some(id) = self.reader.read_block()? else {
            return Ok(());
        };
        if id != b"NETSCAPE2.0" && id != b"ANIMEXTS1.0" {
            return self.reader.skip_blocks();
        }
        let Some(data) = self.reader.read_block()? else {
            return Ok(());
        };
        if let &[1, lo, hi] = data {
            let count = u32::from(u16::from_le_bytes([lo, hi]));
            self.loop_count = if count != 0 { count + 1 } else { 0 };
        }
        self.reader.skip_blocks()
    }

    /// Decodes frame `index` into the raster, down-sampled by `sample_size`
    pub fn decode_frame(&mut self, index: usize, sample_size: u16) -> CatResult<()> {
        let res = self.decode_frame_inner(index, sample_size);
        self.position = match res {
            Ok(()) => Some(index + 1),
            Err(_) => None,
        };
        res
    }

    fn decode_frame_inner(&mut self, index: usize, sample_size: u16) -> CatResult<()> {
        let descriptor = &self.frames.get(index).ok_or(Error::InvalidState("frame index out of range"))?.descriptor;
        let (width, height, interlaced) = (descriptor.width, descriptor.height, descriptor.interlaced);
        let mut position = match self.position {
            Some(pos) if pos <= index => pos,
            _ => {
                trace!("rewinding to reach frame {index}");
                self.position = None;
                self.reader.rewind()?;
                0
            },
        };
        while position < index {
            self.skip_to_image()?;
            self.skip_image()?;
            position += 1;
        }
        self.skip_to_image()?;
        self.skip_image_header(width, height)?;

        let width = usize::from(width);
        let height = usize::from(height);
        let pixels = width * height;
        if self.raster.len() < pixels {
            self.raster.try_reserve(pixels - self.raster.len())?;
            self.raster.resize(pixels, 0);
        }

        let code_size = self.reader.read_u8()?;
        self.lzw.start(code_size)?;
        self.reader.begin_data();
        if interlaced {
            for (&offset, &jump) in INTERLACED_OFFSETS.iter().zip(&INTERLACED_JUMPS) {
                for row in (offset..height).step_by(jump) {
                    self.lzw.decode_line(&mut self.reader, &mut self.raster[row * width..(row + 1) * width])?;
                }
            }
        } else {
            self.lzw.decode_line(&mut self.reader, &mut self.raster[..pixels])?;
        }
        self.reader.finish_data()?;

        if sample_size > 1 {
            decimate(&mut self.raster, width, height, usize::from(sample_size));
        }
        Ok(())
    }

    /// Reads records up to and including the next image separator
    fn skip_to_image(&mut self) -> CatResult<()> {
        loop {
            match self.reader.read_u8()? {
                IMAGE_DESCRIPTOR => return Ok(()),
                EXTENSION => {
                    self.reader.read_u8()?;
                    self.reader.skip_blocks()?;
                },
                // the scan has counted the frames, so this stream has changed since
                TRAILER => return Err(Error::TruncatedInput),
                other => return Err(Error::WrongRecord(other)),
            }
        }
    }

    /// Fails if the image no longer matches what the scan recorded
    fn skip_image_header(&mut self, expected_width: u16, expected_height: u16) -> CatResult<()> {
        let mut header = [0; 9];
        self.reader.read_exact(&mut header)?;
        if header[8] & 0x80 != 0 {
            let mut palette = [0; 256 * 3];
            self.reader.read_exact(&mut palette[..palette_len(header[8]) * 3])?;
        }
        let width = u16::from_le_bytes([header[4], header[5]]);
        let height = u16::from_le_bytes([header[6], header[7]]);
        if width != expected_width || height != expected_height {
            return Err(Error::WrongSize(format!(
                "frame is now {width}x{height}, was {expected_width}x{expected_height}"
            )));
        }
        Ok(())
    }

    fn skip_image(&mut self) -> CatResult<()> {
        let mut header = [0; 9];
        self.reader.read_exact(&mut header)?;
        if header[8] & 0x80 != 0 {
            let mut palette = [0; 256 * 3];
            self.reader.read_exact(&mut palette[..palette_len(header[8]) * 3])?;
        }
        self.reader.read_u8()?;
        self.reader.skip_blocks()
    }

    /// Forces the next decode to start from the first record
    pub fn rewind(&mut self) -> CatResult<()> {
        self.position = None;
        self.reader.rewind()?;
        self.position = Some(0);
        Ok(())
    }

    /// Palette indices of the last decoded frame, `rect(sample_size)` wide
    pub fn raster(&self) -> &[u8] {
        &self.raster
    }

    pub fn raster_byte_count(&self) -> usize {
        self.raster.len().max(self.largest_frame)
    }

    pub fn screen(&self) -> &ScreenDescriptor {
        &self.screen
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    pub fn source_length(&self) -> Option<u64> {
        self.reader.source().source_length()
    }

    pub fn close(&mut self) {
        self.reader.source_mut().close();
    }
}

fn palette_len(flags: u8) -> usize {
    1 << ((flags & 0x07) + 1)
}

fn read_palette<S: GifSource>(reader: &mut BlockReader<S>, flags: u8) -> CatResult<Vec<RGB8>> {
    let mut bytes = [0; 256 * 3];
    let bytes = &mut bytes[..palette_len(flags) * 3];
    reader.read_exact(bytes)?;
    Ok(bytes.chunks_exact(3).map(|c| RGB8::new(c[0], c[1], c[2])).collect())
}

fn read_header<S: GifSource>(reader: &mut BlockReader<S>) -> CatResult<ScreenDescriptor> {
    let mut signature = [0; 6];
    reader.read_exact(&mut signature)?;
    if &signature[..3] != b"GIF" {
        return Err(Error::NotGif);
    }

    let mut descriptor = [0; 7];
    reader.read_exact(&mut descriptor).map_err(|_| Error::NoScreenDescriptor)?;
    let width = u16::from_le_bytes([descriptor[0], descriptor[1]]);
    let height = u16::from_le_bytes([descriptor[2], descriptor[3]]);
    let flags = descriptor[4];
    let global_palette = if flags & 0x80 != 0 {
        Some(read_palette(reader, flags).map_err(|_| Error::NoScreenDescriptor)?)
    } else {
        None
    };
    if width == 0 || height == 0 {
        return Err(Error::InvalidScreenSize);
    }
    Ok(ScreenDescriptor {
        width,
        height,
        background_index: descriptor[5],
        global_palette,
    })
}

/// Nearest-neighbor down-sampling in place: keeps every `n`th pixel of every `n`th row
fn decimate(raster: &mut [u8], width: usize, height: usize, n: usize) {
    let sampled_width = width / n;
    for row in 0..height / n {
        for col in 0..sampled_width {
            raster[row * sampled_width + col] = raster[row * n * width + col * n];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::BytesSource;

    const PALETTE: [u8; 12] = [0, 0, 0, 255, 0, 0, 0, 255, 0, 0, 0, 255];

    fn encode(width: u16, height: u16, repeat: Option<gif::Repeat>, frames: &[gif::Frame<'_>]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut enc = gif::Encoder::new(&mut out, width, height, &PALETTE).unwrap();
            if let Some(repeat) = repeat {
                enc.set_repeat(repeat).unwrap();
            }
            for frame in frames {
                enc.write_frame(frame).unwrap();
            }
        }
        out
    }

    fn frame(left: u16, top: u16, width: u16, height: u16, color: u8) -> gif::Frame<'static> {
        gif::Frame {
            left,
            top,
            width,
            height,
            buffer: vec![color; usize::from(width) * usize::from(height)].into(),
            ..gif::Frame::default()
        }
    }

    /// Inserts raw records right after the header and global color table
    fn splice(mut gif: Vec<u8>, records: &[u8]) -> Vec<u8> {
        let at = 13 + PALETTE.len();
        gif.splice(at..at, records.iter().copied());
        gif
    }

    fn open(data: Vec<u8>) -> CatResult<GifParser> {
        GifParser::open(Box::new(BytesSource::new(data)?))
    }

    #[test]
    fn scan_metadata() {
        let mut f1 = frame(0, 0, 4, 4, 1);
        f1.delay = 7;
        f1.dispose = gif::DisposalMethod::Background;
        let mut f2 = frame(1, 1, 2, 2, 2);
        f2.delay = 1;
        f2.transparent = Some(0);
        let p = open(encode(4, 4, Some(gif::Repeat::Finite(3)), &[f1, f2])).unwrap();
        assert_eq!(2, p.frames().len());
        assert_eq!(4, p.loop_count());
        assert_eq!(GraphicsControl { disposal: DisposalMethod::RestoreBackground, delay_ms: 70, transparent_index: None }, p.frames()[0].control);
        assert_eq!(GraphicsControl { disposal: DisposalMethod::Unspecified, delay_ms: 100, transparent_index: Some(0) }, p.frames()[1].control);
        assert_eq!(Rect { left: 1, top: 1, width: 2, height: 2 }, p.frames()[1].descriptor.rect(1));
        assert_eq!(16, p.raster_byte_count());
    }

    #[test]
    fn loop_count_defaults() {
        let p = open(encode(2, 2, None, &[frame(0, 0, 2, 2, 1)])).unwrap();
        assert_eq!(1, p.loop_count());
        let p = open(encode(2, 2, Some(gif::Repeat::Infinite), &[frame(0, 0, 2, 2, 1)])).unwrap();
        assert_eq!(0, p.loop_count());
    }

    #[test]
    fn comment_blocks_are_capped() {
        let mut records = vec![EXTENSION, COMMENT];
        for len in [255u8, 255, 255, 255, 255, 255, 255, 255, 100, 10] {
            records.push(len);
            records.extend(std::iter::repeat(b'x').take(len.into()));
        }
        records.push(0);
        let p = open(splice(encode(2, 2, None, &[frame(0, 0, 2, 2, 1)]), &records)).unwrap();
        // 8 * 255 = 2040 bytes fit, then neither 100 nor 10 more do
        assert_eq!(2040, p.comment().len());
    }

    #[test]
    fn last_graphics_control_wins() {
        let mut f = frame(0, 0, 2, 2, 1);
        f.delay = 50;
        let records = [EXTENSION, GRAPHICS_CONTROL, 4, 3 << 2, 20, 0, 0, 0];
        let gif = encode(2, 2, None, &[f]);
        let p = open(splice(gif, &records)).unwrap();
        assert_eq!(500, p.frames()[0].control.delay_ms);
        assert_eq!(DisposalMethod::Unspecified, p.frames()[0].control.disposal);
    }

    #[test]
    fn malformed_graphics_control_is_ignored() {
        let records = [EXTENSION, GRAPHICS_CONTROL, 3, 1, 2, 3, 0];
        let mut gif = encode(2, 2, None, &[frame(0, 0, 2, 2, 1)]);
        // drop the encoder's own control block so only the malformed one applies
        let at = 13 + PALETTE.len();
        gif.drain(at..at + 8);
        let p = open(splice(gif, &records)).unwrap();
        assert_eq!(GraphicsControl::default(), p.frames()[0].control);
    }

    #[test]
    fn open_errors() {
        assert!(matches!(open(b"PNG89a".to_vec()), Err(Error::NotGif)));
        assert!(matches!(open(b"GIF8".to_vec()), Err(Error::TruncatedInput)));
        assert!(matches!(open(b"GIF89a\x01\x00".to_vec()), Err(Error::NoScreenDescriptor)));
        assert!(matches!(open(b"GIF89a\x00\x00\x01\x00\x00\x00\x00\x3B".to_vec()), Err(Error::InvalidScreenSize)));
        assert!(matches!(open(b"GIF89a\x01\x00\x01\x00\x00\x00\x00\x3B".to_vec()), Err(Error::NoFrames)));
        assert!(matches!(open(b"GIF89a\x01\x00\x01\x00\x00\x00\x00\x99".to_vec()), Err(Error::WrongRecord(0x99))));
        assert!(matches!(open(b"GIF89a\x01\x00\x01\x00\x00\x00\x00".to_vec()), Err(Error::NoFrames)));
    }

    #[test]
    fn frame_outside_screen() {
        let gif = encode(4, 4, None, &[frame(0, 0, 4, 4, 1)]);
        let mut bad = gif.clone();
        // image descriptor follows the 8-byte control extension
        let desc = 13 + PALETTE.len() + 8;
        assert_eq!(IMAGE_DESCRIPTOR, bad[desc]);
        bad[desc + 1] = 1;
        assert!(matches!(open(bad), Err(Error::ImageNotConfined)));
        let mut empty = gif;
        empty[desc + 5] = 0;
        assert!(matches!(open(empty), Err(Error::InvalidImageSize)));
    }

    #[test]
    fn missing_trailer_is_tolerated() {
        let mut gif = encode(2, 2, None, &[frame(0, 0, 2, 2, 1), frame(0, 0, 2, 2, 2)]);
        assert_eq!(Some(&TRAILER), gif.last());
        gif.pop();
        let mut p = open(gif).unwrap();
        assert_eq!(2, p.frames().len());
        p.decode_frame(1, 1).unwrap();
        assert_eq!(&[2, 2, 2, 2], &p.raster()[..4]);
    }

    #[test]
    fn decode_in_any_order() {
        let frames: Vec<_> = (0..4).map(|i| frame(0, 0, 3, 2, i)).collect();
        let mut p = open(encode(3, 2, None, &frames)).unwrap();
        for index in [0, 1, 3, 2, 2, 0, 3] {
            p.decode_frame(index, 1).unwrap();
            assert!(p.raster()[..6].iter().all(|&px| px == index as u8), "{index}");
        }
    }

    #[test]
    fn interlaced_rows() {
        let width = 2;
        let height = 10u16;
        let pixels: Vec<u8> = (0..height).flat_map(|row| [row as u8 % 4; 2]).collect();
        // the encoder stores rows as given, so pass them in interlaced order
        let mut stored = Vec::new();
        for (&offset, &jump) in INTERLACED_OFFSETS.iter().zip(&INTERLACED_JUMPS) {
            for row in (offset..usize::from(height)).step_by(jump) {
                stored.extend_from_slice(&pixels[row * width..(row + 1) * width]);
            }
        }
        let f = gif::Frame {
            width: 2,
            height,
            interlaced: true,
            buffer: stored.into(),
            ..gif::Frame::default()
        };
        let mut p = open(encode(2, height, None, &[f])).unwrap();
        p.decode_frame(0, 1).unwrap();
        assert_eq!(&pixels[..], &p.raster()[..pixels.len()]);
    }

    #[test]
    fn sample_size_decimates() {
        let pixels: Vec<u8> = (0..36).map(|i| (i % 4) as u8).collect();
        let f = gif::Frame { width: 6, height: 6, buffer: pixels.clone().into(), ..gif::Frame::default() };
        let mut p = open(encode(6, 6, None, &[f])).unwrap();
        p.decode_frame(0, 2).unwrap();
        let pixels = &pixels;
        let expected: Vec<u8> = (0..3).flat_map(|r| (0..3).map(move |c| pixels[r * 2 * 6 + c * 2])).collect();
        assert_eq!(&expected[..], &p.raster()[..9]);
        assert_eq!((3, 3), p.screen().size(2));
        assert_eq!((1, 1), p.screen().size(10));
    }

    #[test]
    fn decode_error_forces_resync() {
        let gif = encode(2, 2, None, &[frame(0, 0, 2, 2, 1), frame(0, 0, 2, 2, 2)]);
        let mut corrupt = gif.clone();
        // code size byte of the first frame
        let code_size = 13 + PALETTE.len() + 8 + 10;
        corrupt[code_size] = 12;
        let mut p = open(corrupt).unwrap();
        assert!(matches!(p.decode_frame(0, 1), Err(Error::ImageDefect)));
        p.decode_frame(1, 1).unwrap();
        assert_eq!(&[2, 2, 2, 2], &p.raster()[..4]);
    }
}
