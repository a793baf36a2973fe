use crate::error::{CatResult, Error};
use crate::parser::{DisposalMethod, Frame, Rect, ScreenDescriptor};
use imgref::{ImgRef, ImgVec};
use rgb::{RGB8, RGBA8};
use std::mem;
use std::sync::Arc;

/// Full-screen RGBA pixels that frames are composited onto.
///
/// The caller owns it and passes it to every render call. Its contents are only meaningful
/// in sequence: each frame is drawn on top of what the previous frames left behind.
pub struct Canvas {
    pixels: ImgVec<RGBA8>,
}

impl Canvas {
    /// Transparent black canvas
    pub fn new(width: usize, height: usize) -> CatResult<Self> {
        Ok(Self { pixels: blank_image(width, height)? })
    }

    /// 0x0 placeholder, doesn't allocate
    pub(crate) fn empty() -> Self {
        Self { pixels: ImgVec::new_stride(Vec::new(), 0, 0, 1) }
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> usize {
        self.pixels.width()
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> usize {
        self.pixels.height()
    }

    #[inline]
    #[must_use]
    pub fn as_ref(&self) -> ImgRef<'_, RGBA8> {
        self.pixels.as_ref()
    }

    /// Row-major pixels, `width()` per row
    #[inline]
    #[must_use]
    pub fn pixels(&self) -> &[RGBA8] {
        self.pixels.buf()
    }

    #[must_use]
    pub fn into_inner(self) -> ImgVec<RGBA8> {
        self.pixels
    }

    pub(crate) fn check_size(&self, width: usize, height: usize) -> CatResult<()> {
        if self.width() != width || self.height() != height {
            return Err(Error::WrongSize(format!(
                "canvas is {}x{}, but the animation is {width}x{height}",
                self.width(),
                self.height()
            )));
        }
        Ok(())
    }

    fn fill(&mut self, color: RGBA8) {
        self.pixels.buf_mut().fill(color);
    }

    fn fill_rect(&mut self, rect: Rect, color: RGBA8) {
        let Some(rect) = clamp(rect, self.width(), self.height()) else {
            return;
        };
        let mut region = self.pixels.sub_image_mut(rect.left, rect.top, rect.width, rect.height);
        for row in region.rows_mut() {
            row.fill(color);
        }
    }
}

fn blank_image(width: usize, height: usize) -> CatResult<ImgVec<RGBA8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(width * height)?;
    buf.resize(width * height, RGBA8::default());
    Ok(ImgVec::new(buf, width, height))
}

/// Part of the rectangle that lies within the canvas, if any
fn clamp(rect: Rect, width: usize, height: usize) -> Option<Rect> {
    if rect.left >= width || rect.top >= height {
        return None;
    }
    let clamped = Rect {
        width: rect.width.min(width - rect.left),
        height: rect.height.min(height - rect.top),
        ..rect
    };
    (clamped.width > 0 && clamped.height > 0).then_some(clamped)
}

/// Applies disposal, transparency and palettes to draw frames onto a canvas
pub(crate) struct Compositor {
    /// Canvas as it was before the last RESTORE_PREVIOUS frame was drawn
    backup: Option<ImgVec<RGBA8>>,
    is_opaque: bool,
    default_palette: Arc<[RGB8]>,
}

/// What the compositor needs to know about the animation
pub(crate) struct Scene<'a> {
    pub screen: &'a ScreenDescriptor,
    pub frames: &'a [Frame],
    pub sample_size: u16,
}

impl Scene<'_> {
    fn rect(&self, index: usize) -> Rect {
        self.frames[index].descriptor.rect(self.sample_size)
    }

    /// Frame `index` covers the whole down-sampled screen
    pub fn is_full_screen(&self, index: usize) -> bool {
        let (width, height) = self.screen.size(self.sample_size);
        self.rect(index) == Rect { left: 0, top: 0, width, height }
    }
}

impl Compositor {
    pub fn new(default_palette: Arc<[RGB8]>) -> Self {
        Self {
            backup: None,
            is_opaque: false,
            default_palette,
        }
    }

    pub fn set_opaque(&mut self, is_opaque: bool) {
        self.is_opaque = is_opaque;
    }

    pub fn has_backup(&self) -> bool {
        self.backup.is_some()
    }

    /// Draws frame `index` using the previous canvas contents.
    /// `raster` holds the frame's palette indices, down-sampled like the scene.
    pub fn draw(&mut self, canvas: &mut Canvas, scene: &Scene<'_>, index: usize, raster: &[u8]) -> CatResult<()> {
        if index == 0 {
            self.prepare(canvas, scene);
        } else {
            self.dispose_previous(canvas, scene, index);
        }
        if scene.frames[index].control.disposal == DisposalMethod::RestorePrevious {
            self.snapshot(canvas)?;
        }
        self.blit(canvas, scene, index, raster);
        Ok(())
    }

    /// Draws frame `index` as if nothing came before it.
    /// Only valid for frames whose result doesn't depend on the earlier ones,
    /// and which don't use RESTORE_PREVIOUS themselves.
    pub fn draw_key_frame(&self, canvas: &mut Canvas, scene: &Scene<'_>, index: usize, raster: &[u8]) {
        canvas.fill(RGBA8::default());
        self.blit(canvas, scene, index, raster);
    }

    /// Background color if there's a global palette and the first frame is opaque,
    /// transparent black otherwise
    fn prepare(&self, canvas: &mut Canvas, scene: &Scene<'_>) {
        let first_is_opaque = scene.frames.first().is_some_and(|f| f.control.transparent_index.is_none());
        let background = match &scene.screen.global_palette {
            Some(palette) if first_is_opaque => palette_color(palette, scene.screen.background_index),
            _ => RGBA8::default(),
        };
        canvas.fill(background);
    }

    fn dispose_previous(&mut self, canvas: &mut Canvas, scene: &Scene<'_>, index: usize) {
        let previous = &scene.frames[index - 1];
        let current = &scene.frames[index];
        let previous_rect = scene.rect(index - 1);
        let current_rect = scene.rect(index);

        let needs_disposal = current.control.transparent_index.is_some() || !current_rect.covers(&previous_rect);
        if !needs_disposal {
            return;
        }
        match previous.control.disposal {
            DisposalMethod::RestoreBackground => canvas.fill_rect(previous_rect, RGBA8::default()),
            DisposalMethod::RestorePrevious => {
                match &mut self.backup {
                    Some(backup) if backup.width() == canvas.width() && backup.height() == canvas.height() => {
                        mem::swap(&mut canvas.pixels, backup);
                    },
                    // nothing was saved, so the frame before started from a blank canvas
                    _ => canvas.fill(RGBA8::default()),
                }
            },
            DisposalMethod::Unspecified | DisposalMethod::DoNotDispose => {},
        }
    }

    fn snapshot(&mut self, canvas: &Canvas) -> CatResult<()> {
        match &mut self.backup {
            Some(backup) if backup.width() == canvas.width() && backup.height() == canvas.height() => {
                backup.buf_mut().copy_from_slice(canvas.pixels.buf());
            },
            _ => {
                let mut backup = blank_image(canvas.width(), canvas.height())?;
                backup.buf_mut().copy_from_slice(canvas.pixels.buf());
                self.backup = Some(backup);
            },
        }
        Ok(())
    }

    fn blit(&self, canvas: &mut Canvas, scene: &Scene<'_>, index: usize, raster: &[u8]) {
        let frame = &scene.frames[index];
        let rect = scene.rect(index);
        if raster.len() < rect.area() {
            return;
        }
        let Some(visible) = clamp(rect, canvas.width(), canvas.height()) else {
            return;
        };

        let palette = frame.descriptor.palette.as_deref()
            .or(scene.screen.global_palette.as_deref())
            .unwrap_or(&self.default_palette[..]);
        let mut colors = [RGBA8::default(); 256];
        for (i, color) in colors.iter_mut().enumerate() {
            *color = palette_color(palette, i as u8);
        }
        let transparent = frame.control.transparent_index;

        let mut region = canvas.pixels.sub_image_mut(visible.left, visible.top, visible.width, visible.height);
        for (dst_row, src_row) in region.rows_mut().zip(raster.chunks_exact(rect.width)) {
            for (dst, &idx) in dst_row.iter_mut().zip(src_row) {
                if Some(idx) == transparent {
                    continue;
                }
                let color = colors[usize::from(idx)];
                if self.is_opaque {
                    *dst = RGBA8 { a: dst.a, ..color };
                } else {
                    *dst = color;
                }
            }
        }
    }
}

/// Opaque palette entry. Indices past the end of the palette use the first entry.
fn palette_color(palette: &[RGB8], index: u8) -> RGBA8 {
    palette.get(usize::from(index))
        .or(palette.first())
        .map_or(RGBA8::default(), |c| c.with_alpha(255))
}

/// Greyscale ramp used by frames without any palette
pub(crate) fn default_palette() -> Arc<[RGB8]> {
    (0..=255u8).map(|i| RGB8::new(i, i, i)).collect()
}
