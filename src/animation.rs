use crate::c_api::GifplayError;
use crate::compose::{Canvas, Compositor, Scene};
use crate::error::{CatResult, Error};
use crate::parser::{DisposalMethod, Frame, GifParser};
use crate::playback::{Clock, MonotonicClock, Playback, PlaybackState, SavedState, SeekTarget, Step, Tick};
use crate::source::GifSource;
use crate::{Metadata, Settings};
use log::{debug, warn};
use rgb::RGB8;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

/// An open GIF, ready to be drawn frame by frame onto a [`Canvas`].
///
/// Create one with [`Context::open`](crate::Context::open).
/// The canvas is owned by the caller and must stay the same between calls,
/// because every frame is drawn on top of the previous ones.
pub struct Animation {
    parser: GifParser,
    compositor: Compositor,
    playback: Playback,
    settings: Settings,
    clock: Box<dyn Clock>,
    /// A frame has been decoded, so the settings can't change anymore
    started: bool,
    /// Set when the source couldn't be rewound for the next loop. Cleared by a successful `reset()`.
    rewind_failed: bool,
    error_code: GifplayError,
}

fn millis(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}

impl Animation {
    pub(crate) fn new(source: Box<dyn GifSource>, default_palette: Arc<[RGB8]>) -> CatResult<Self> {
        let parser = GifParser::open(source)?;
        let playback = Playback::new(parser.frames().len(), parser.loop_count());
        Ok(Self {
            parser,
            compositor: Compositor::new(default_palette),
            playback,
            settings: Settings::default(),
            clock: Box::new(MonotonicClock::default()),
            started: false,
            rewind_failed: false,
            error_code: GifplayError::OK,
        })
    }

    /// Canvas width, after down-sampling
    #[must_use]
    pub fn width(&self) -> usize {
        self.parser.screen().size(self.settings.sample_size).0
    }

    /// Canvas height, after down-sampling
    #[must_use]
    pub fn height(&self) -> usize {
        self.parser.screen().size(self.settings.sample_size).1
    }

    /// A blank canvas of the right size for this animation
    pub fn new_canvas(&self) -> CatResult<Canvas> {
        Canvas::new(self.width(), self.height())
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.parser.frames().len()
    }

    #[must_use]
    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.parser.frames().get(index)
    }

    /// Display time of a frame, ignoring the speed factor
    #[must_use]
    pub fn frame_duration(&self, index: usize) -> Option<Duration> {
        self.frame(index).map(|f| Duration::from_millis(f.control.delay_ms.into()))
    }

    /// Duration of one loop
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        Duration::from_millis(self.durations().map(u64::from).sum())
    }

    fn durations(&self) -> impl Iterator<Item = u32> + '_ {
        self.parser.frames().iter().map(|f| f.control.delay_ms)
    }

    /// `None` if the file has no comment extension
    #[must_use]
    pub fn comment(&self) -> Option<String> {
        let comment = self.parser.comment();
        (!comment.is_empty()).then(|| String::from_utf8_lossy(comment).into_owned())
    }

    /// 0 means looping forever
    #[must_use]
    pub fn loop_count(&self) -> u32 {
        self.playback.loop_count()
    }

    pub fn set_loop_count(&mut self, loop_count: u32) {
        self.playback.set_loop_count(loop_count);
    }

    #[must_use]
    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Changes sample size and opacity. Fails once the first frame has been decoded.
    pub fn set_options(&mut self, settings: Settings) -> CatResult<()> {
        if self.started {
            return Err(self.record(Error::InvalidState("options must be set before the first frame")));
        }
        self.settings = Settings {
            sample_size: settings.sample_size.max(1),
            ..settings
        };
        self.compositor.set_opaque(settings.is_opaque);
        Ok(())
    }

    #[must_use]
    pub fn is_opaque(&self) -> bool {
        self.settings.is_opaque
    }

    #[must_use]
    pub fn speed_factor(&self) -> f32 {
        self.playback.speed()
    }

    /// Values above 1 play faster
    pub fn set_speed_factor(&mut self, speed: f32) -> CatResult<()> {
        if !speed.is_finite() || speed <= 0. {
            return Err(Error::InvalidState("speed factor must be a positive number"));
        }
        self.playback.set_speed(speed);
        Ok(())
    }

    /// Replaces the wall clock used for frame timing
    pub fn set_clock(&mut self, clock: impl Clock + 'static) {
        self.clock = Box::new(clock);
    }

    /// Time from the start of the current loop
    #[must_use]
    pub fn current_position(&self) -> Duration {
        millis(self.playback.position(self.clock.now_ms(), self.durations()))
    }

    /// Frame currently on the canvas
    #[must_use]
    pub fn current_frame_index(&self) -> usize {
        self.playback.shown_index()
    }

    #[must_use]
    pub fn current_loop_index(&self) -> u32 {
        self.playback.loop_index()
    }

    #[must_use]
    pub fn is_animation_completed(&self) -> bool {
        self.playback.is_completed()
    }

    #[must_use]
    pub fn playback_state(&self) -> PlaybackState {
        self.playback.state()
    }

    /// Code of the last error, `OK` if there was none
    #[must_use]
    pub fn native_error_code(&self) -> GifplayError {
        self.error_code
    }

    /// Size of the file or buffer, if known
    #[must_use]
    pub fn source_length(&self) -> Option<u64> {
        self.parser.source_length()
    }

    /// Bytes of pixel buffers held by the decoder, not counting the caller's canvas
    #[must_use]
    pub fn allocation_byte_count(&self) -> usize {
        let mut bytes = self.parser.raster_byte_count();
        let needs_backup = self.parser.frames().iter().skip(1)
            .any(|f| f.control.disposal == DisposalMethod::RestorePrevious);
        if self.compositor.has_backup() || needs_backup {
            bytes += self.width() * self.height() * 4;
        }
        bytes
    }

    /// Bytes of everything except the pixel buffers
    #[must_use]
    pub fn metadata_byte_count(&self) -> usize {
        let palettes: usize = self.parser.frames().iter()
            .filter_map(|f| f.descriptor.palette.as_ref())
            .map(|p| p.len() * mem::size_of::<RGB8>())
            .sum();
        mem::size_of::<Self>() + self.frame_count() * mem::size_of::<Frame>() + palettes + self.parser.comment().len()
    }

    #[must_use]
    pub fn metadata(&self) -> Metadata {
        Metadata {
            width: self.width(),
            height: self.height(),
            frame_count: self.frame_count(),
            loop_count: self.loop_count(),
            duration: self.total_duration(),
            comment: self.comment(),
            source_length: self.source_length(),
            allocation_byte_count: self.allocation_byte_count(),
            metadata_byte_count: self.metadata_byte_count(),
        }
    }

    /// Draws the next frame onto the canvas.
    ///
    /// Returns how long to wait before calling it again, with the time spent drawing already taken off.
    /// `None` when the animation has completed; further calls do nothing.
    ///
    /// A pending seek is applied instead of drawing the next frame.
    ///
    /// On a decode error the canvas keeps the last good frame, and the same frame is tried again next time.
    pub fn render_next_frame(&mut self, canvas: &mut Canvas) -> CatResult<Option<Duration>> {
        self.check_ready(canvas)?;
        if let Some(target) = self.playback.take_pending() {
            return self.seek(target, canvas).map(Some);
        }
        if self.playback.is_completed() {
            return Ok(None);
        }
        let start = self.clock.now_ms();
        let index = self.playback.frame_index();
        self.draw_frame(canvas, index)?;
        let duration = self.finish_frame(index);
        let delay = self.playback.invalidation_delay(start, self.clock.now_ms(), duration);
        Ok(delay.map(millis))
    }

    /// Draws the next frame if it's due
    pub fn advance(&mut self, canvas: &mut Canvas) -> CatResult<Tick> {
        if self.playback.state() != PlaybackState::SeekPending {
            if self.playback.is_completed() {
                return Ok(Tick::Completed);
            }
            let wait = self.playback.next_start() - self.clock.now_ms();
            if wait > 0 {
                return Ok(Tick::Wait(millis(wait)));
            }
        }
        Ok(match self.render_next_frame(canvas)? {
            Some(delay) => Tick::Rendered(delay),
            None if self.playback.is_completed() => Tick::Completed,
            None => Tick::Rendered(Duration::ZERO),
        })
    }

    /// Remembers a seek for the next [`render_next_frame`](Self::render_next_frame)
    pub fn request_seek(&mut self, target: SeekTarget) {
        self.playback.request_seek(target);
    }

    /// Applies a seek requested earlier, if any. Returns how long to wait for the next frame.
    pub fn apply_pending_seek(&mut self, canvas: &mut Canvas) -> CatResult<Option<Duration>> {
        match self.playback.take_pending() {
            Some(target) => self.seek(target, canvas).map(Some),
            None => Ok(None),
        }
    }

    fn seek(&mut self, target: SeekTarget, canvas: &mut Canvas) -> CatResult<Duration> {
        match target {
            SeekTarget::Frame(index) => self.seek_to_frame(index, canvas),
            SeekTarget::Time(ms) => self.seek_to_time(ms, canvas),
        }
    }

    /// Draws frame `index` (clamped to the last one), as if it was reached by normal playback.
    /// Returns how long to wait before the next frame.
    pub fn seek_to_frame(&mut self, index: usize, canvas: &mut Canvas) -> CatResult<Duration> {
        self.check_ready(canvas)?;
        let paused = self.playback.remainder().is_some();
        let duration = self.seek_to_index(index, canvas)?;
        let now = self.clock.now_ms();
        self.playback.finish_frame_seek(now, duration, paused);
        Ok(millis(self.playback.next_start() - now))
    }

    /// Draws the frame shown `ms` after the start of a loop.
    /// Returns how long to wait before the next frame.
    pub fn seek_to_time(&mut self, ms: u32, canvas: &mut Canvas) -> CatResult<Duration> {
        self.check_ready(canvas)?;
        let (index, mut into_frame) = self.playback.frame_at_time(ms, self.durations());
        if index + 1 == self.frame_count() {
            into_frame = into_frame.min(self.durations().last().map_or(0, i64::from));
        }
        let paused = self.playback.remainder().is_some();
        self.seek_to_index(index, canvas)?;
        let now = self.clock.now_ms();
        self.playback.finish_time_seek(now, into_frame, paused);
        Ok(millis(self.playback.next_start() - now))
    }

    /// Rewinds if the target is behind, then draws every frame up to the target.
    /// Returns the duration of the target frame.
    fn seek_to_index(&mut self, desired: usize, canvas: &mut Canvas) -> CatResult<u32> {
        let desired = desired.min(self.frame_count() - 1);
        let current = self.playback.frame_index();
        if desired < current || current == 0 {
            self.reset()?;
        }
        let current = self.playback.frame_index();
        let first = match self.key_frame(current, desired) {
            Some(key) => {
                debug!("seek to {desired} starts at key frame {key}");
                self.draw_key_frame(canvas, key)?;
                key + 1
            },
            None => current,
        };
        for index in first..=desired {
            if let Err(err) = self.draw_frame(canvas, index) {
                // the canvas has everything before `index`
                self.playback.jump_to(index);
                return Err(err);
            }
        }
        self.playback.jump_to(desired);
        Ok(self.finish_frame(desired))
    }

    /// The last frame in `current+1..=desired` that looks the same regardless of the frames before it
    fn key_frame(&self, current: usize, desired: usize) -> Option<usize> {
        // in opaque mode the canvas alpha depends on the history
        if self.settings.is_opaque {
            return None;
        }
        let scene = self.scene();
        (current + 1..=desired).rev().find(|&k| {
            let frame = &scene.frames[k].control;
            let previous = &scene.frames[k - 1].control;
            frame.disposal != DisposalMethod::RestorePrevious
                && ((frame.transparent_index.is_none() && scene.is_full_screen(k))
                    || (previous.disposal == DisposalMethod::RestoreBackground && scene.is_full_screen(k - 1)))
        })
    }

    fn scene(&self) -> Scene<'_> {
        Scene {
            screen: self.parser.screen(),
            frames: self.parser.frames(),
            sample_size: self.settings.sample_size,
        }
    }

    fn decode(&mut self, index: usize) -> CatResult<()> {
        self.started = true;
        self.parser.decode_frame(index, self.settings.sample_size).map_err(|err| self.record(err))
    }

    fn draw_frame(&mut self, canvas: &mut Canvas, index: usize) -> CatResult<()> {
        self.decode(index)?;
        let scene = Scene {
            screen: self.parser.screen(),
            frames: self.parser.frames(),
            sample_size: self.settings.sample_size,
        };
        let res = self.compositor.draw(canvas, &scene, index, self.parser.raster());
        res.map_err(|err| self.record(err))
    }

    fn draw_key_frame(&mut self, canvas: &mut Canvas, index: usize) -> CatResult<()> {
        self.decode(index)?;
        self.compositor.draw_key_frame(canvas, &self.scene(), index, self.parser.raster());
        Ok(())
    }

    /// Moves past a drawn frame. Returns its duration, or 0 if the animation has completed.
    fn finish_frame(&mut self, index: usize) -> u32 {
        let duration = self.parser.frames()[index].control.delay_ms;
        match self.playback.finish_frame(duration) {
            Step::Continue(duration) => duration,
            Step::Wrap(duration) => {
                match self.parser.rewind() {
                    Ok(()) => self.playback.wrap(),
                    Err(err) => {
                        // this frame is fine, the next one can't be reached
                        self.rewind_failed = true;
                        self.record(err);
                    },
                }
                duration
            },
            Step::Completed => 0,
        }
    }

    fn check_ready(&mut self, canvas: &Canvas) -> CatResult<()> {
        canvas.check_size(self.width(), self.height())?;
        if self.rewind_failed {
            return Err(self.record(Error::RewindFailed));
        }
        Ok(())
    }

    fn record(&mut self, err: Error) -> Error {
        warn!("{err}");
        self.error_code = GifplayError::from(&err);
        err
    }

    /// Goes back to the first frame of the first loop
    pub fn reset(&mut self) -> CatResult<()> {
        if let Err(err) = self.parser.rewind() {
            self.rewind_failed = true;
            return Err(self.record(err));
        }
        self.rewind_failed = false;
        self.playback.reset();
        Ok(())
    }

    /// Freezes the time left for the current frame, e.g. while the animation is hidden
    pub fn save_remainder(&mut self) {
        self.playback.save_remainder(self.clock.now_ms());
    }

    /// Unfreezes the time saved by [`save_remainder`](Self::save_remainder).
    /// Returns how long to wait for the next frame, `None` if nothing was saved or the animation has completed.
    pub fn restore_remainder(&mut self) -> Option<Duration> {
        self.playback.restore_remainder(self.clock.now_ms()).map(millis)
    }

    #[must_use]
    pub fn save_state(&self) -> SavedState {
        self.playback.save_state()
    }

    /// Draws the saved frame and restores loop, pause and speed.
    ///
    /// Returns how long to wait for the next frame if the state wasn't paused.
    /// The state is ignored (`Ok(None)`) for single-frame animations and for out-of-range states.
    pub fn restore_state(&mut self, state: &SavedState, canvas: &mut Canvas) -> CatResult<Option<Duration>> {
        self.check_ready(canvas)?;
        if self.frame_count() == 1 || state.frame_index >= self.frame_count()
            || self.playback.loop_index() > self.playback.loop_count() {
            return Ok(None);
        }
        if state.frame_index < self.playback.frame_index() {
            self.reset()?;
        }
        let mut duration = self.parser.frames()[self.playback.frame_index()].control.delay_ms;
        while self.playback.frame_index() < state.frame_index {
            let index = self.playback.frame_index();
            self.draw_frame(canvas, index)?;
            duration = self.finish_frame(index);
        }
        self.playback.restore_timing(state);
        if self.playback.remainder().is_some() {
            return Ok(None);
        }
        let delay = self.playback.scaled(duration);
        self.playback.set_next_start(self.clock.now_ms() + delay);
        Ok(Some(millis(delay)))
    }
}

impl Drop for Animation {
    fn drop(&mut self) {
        self.parser.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::ManualClock;
    use crate::source::BytesSource;
    use crate::Context;
    use rgb::RGBA8;

    /// 2x1 screen, one palette color per frame, full-screen frames with the given delays
    fn gif(delays: &[u16], repeat: gif::Repeat) -> Vec<u8> {
        let palette = [0, 0, 0, 255, 0, 0, 0, 255, 0, 0, 0, 255];
        let mut out = vec![];
        {
            let mut enc = gif::Encoder::new(&mut out, 2, 1, &palette).unwrap();
            enc.set_repeat(repeat).unwrap();
            for (i, &delay) in delays.iter().enumerate() {
                let mut frame = gif::Frame::from_indexed_pixels(2, 1, vec![(i % 3 + 1) as u8; 2], None);
                frame.delay = delay;
                enc.write_frame(&frame).unwrap();
            }
        }
        out
    }

    fn open(data: Vec<u8>) -> (Animation, Canvas, ManualClock) {
        let mut anim = Context::new().open(BytesSource::new(data).unwrap()).unwrap();
        let clock = ManualClock::default();
        anim.set_clock(clock.clone());
        let canvas = anim.new_canvas().unwrap();
        (anim, canvas, clock)
    }

    #[test]
    fn renders_in_order_and_completes() {
        let (mut anim, mut canvas, _) = open(gif(&[10, 20, 30], gif::Repeat::Finite(1)));
        assert_eq!(2, anim.loop_count());
        assert_eq!(Duration::from_millis(600), anim.total_duration());
        assert_eq!(PlaybackState::Stopped, anim.playback_state());

        assert_eq!(Some(Duration::from_millis(100)), anim.render_next_frame(&mut canvas).unwrap());
        assert_eq!(RGBA8::new(255, 0, 0, 255), canvas.pixels()[0]);
        assert_eq!(PlaybackState::Playing { frame_index: 0, loop_index: 0 }, anim.playback_state());
        for _ in 0..5 {
            anim.render_next_frame(&mut canvas).unwrap();
        }
        assert!(anim.is_animation_completed());
        assert_eq!(2, anim.current_loop_index());
        assert_eq!(2, anim.current_frame_index());
        assert_eq!(None, anim.render_next_frame(&mut canvas).unwrap());
        assert_eq!(RGBA8::new(0, 0, 255, 255), canvas.pixels()[0]);
    }

    #[test]
    fn options_are_fixed_after_first_frame() {
        let (mut anim, _, _) = open(gif(&[10, 10], gif::Repeat::Infinite));
        anim.set_options(Settings { sample_size: 0, is_opaque: true }).unwrap();
        assert_eq!(1, anim.settings().sample_size);
        assert!(anim.is_opaque());
        let mut canvas = anim.new_canvas().unwrap();
        anim.render_next_frame(&mut canvas).unwrap();
        assert!(matches!(anim.set_options(Settings::default()), Err(Error::InvalidState(_))));
        assert_eq!(GifplayError::INVALID_STATE, anim.native_error_code());
    }

    #[test]
    fn wrong_canvas_size() {
        let (mut anim, _, _) = open(gif(&[10], gif::Repeat::Infinite));
        let mut canvas = Canvas::new(3, 3).unwrap();
        assert!(matches!(anim.render_next_frame(&mut canvas), Err(Error::WrongSize(_))));
    }

    #[test]
    fn advance_waits_for_the_clock() {
        let (mut anim, mut canvas, clock) = open(gif(&[10, 10], gif::Repeat::Infinite));
        assert_eq!(Tick::Rendered(Duration::from_millis(100)), anim.advance(&mut canvas).unwrap());
        clock.advance(40);
        assert_eq!(Tick::Wait(Duration::from_millis(60)), anim.advance(&mut canvas).unwrap());
        clock.advance(60);
        assert_eq!(Tick::Rendered(Duration::from_millis(100)), anim.advance(&mut canvas).unwrap());
        assert_eq!(1, anim.current_frame_index());
    }

    #[test]
    fn seek_past_end_clamps() {
        let (mut anim, mut canvas, _) = open(gif(&[10, 20, 30], gif::Repeat::Infinite));
        assert_eq!(Duration::from_millis(300), anim.seek_to_frame(99, &mut canvas).unwrap());
        assert_eq!(2, anim.current_frame_index());
        assert_eq!(RGBA8::new(0, 0, 255, 255), canvas.pixels()[0]);
        // the next frame starts a new loop
        anim.render_next_frame(&mut canvas).unwrap();
        assert_eq!(0, anim.current_frame_index());
    }

    #[test]
    fn pending_seek_is_applied_by_render() {
        let (mut anim, mut canvas, _) = open(gif(&[10, 20, 30], gif::Repeat::Infinite));
        anim.request_seek(SeekTarget::Time(150));
        assert_eq!(PlaybackState::SeekPending, anim.playback_state());
        anim.render_next_frame(&mut canvas).unwrap();
        assert_eq!(PlaybackState::Playing { frame_index: 1, loop_index: 0 }, anim.playback_state());
        assert_eq!(RGBA8::new(0, 255, 0, 255), canvas.pixels()[0]);
        assert_eq!(None, anim.apply_pending_seek(&mut canvas).unwrap());
    }

    #[test]
    fn paused_time_seek_keeps_offset() {
        let (mut anim, mut canvas, clock) = open(gif(&[10, 20, 30], gif::Repeat::Infinite));
        anim.render_next_frame(&mut canvas).unwrap();
        anim.save_remainder();
        clock.set(1000);
        anim.seek_to_time(250, &mut canvas).unwrap();
        assert_eq!(1, anim.current_frame_index());
        assert_eq!(Some(Duration::from_millis(150)), anim.restore_remainder());
        assert_eq!(Duration::from_millis(150), anim.current_position());
    }

    #[test]
    fn speed_factor_validation() {
        let (mut anim, _, _) = open(gif(&[10, 10], gif::Repeat::Infinite));
        assert!(anim.set_speed_factor(0.).is_err());
        assert!(anim.set_speed_factor(f32::NAN).is_err());
        anim.set_speed_factor(4.).unwrap();
        assert_eq!(4., anim.speed_factor());
    }

    #[test]
    fn restore_state_renders_forward() {
        let (mut anim, mut canvas, _) = open(gif(&[10, 20, 30], gif::Repeat::Infinite));
        anim.set_speed_factor(2.).unwrap();
        for _ in 0..2 {
            anim.render_next_frame(&mut canvas).unwrap();
        }
        let state = anim.save_state();
        assert_eq!(2, state.frame_index);

        let (mut other, mut other_canvas, _) = open(gif(&[10, 20, 30], gif::Repeat::Infinite));
        assert_eq!(Some(Duration::from_millis(100)), other.restore_state(&state, &mut other_canvas).unwrap());
        assert_eq!(canvas.pixels(), other_canvas.pixels());
        assert_eq!(2., other.speed_factor());

        let bad = SavedState { frame_index: 3, ..state };
        assert_eq!(None, other.restore_state(&bad, &mut other_canvas).unwrap());
    }

    #[test]
    fn byte_counts() {
        let (mut anim, mut canvas, _) = open(gif(&[10, 20], gif::Repeat::Infinite));
        assert_eq!(2, anim.allocation_byte_count());
        anim.render_next_frame(&mut canvas).unwrap();
        assert_eq!(2, anim.allocation_byte_count());
        assert!(anim.metadata_byte_count() >= 2 * mem::size_of::<Frame>());
        let meta = anim.metadata();
        assert_eq!(2, meta.frame_count);
        assert_eq!(None, meta.comment);
        assert!(meta.source_length.is_some());
    }
}
