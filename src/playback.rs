//! Frame/loop bookkeeping and timing.
//!
//! All times are milliseconds from an arbitrary origin given by a [`Clock`].
//! The "remainder" is how much of the current frame's display time was left when
//! playback was paused, so that resuming doesn't count the pause as elapsed time.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of the current time, in milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall clock that can't go backwards
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> i64 {
        self.origin.elapsed().as_millis() as i64
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Clone, Default)]
pub struct ManualClock(Arc<AtomicI64>);

impl ManualClock {
    pub fn set(&self, ms: i64) {
        self.0.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing has been drawn since opening or the last reset
    Stopped,
    /// `frame_index` is the frame currently on the canvas
    Playing { frame_index: usize, loop_index: u32 },
    /// A seek was requested and will be applied by the next render
    SeekPending,
    /// The last loop has finished
    Completed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SeekTarget {
    Frame(usize),
    /// Milliseconds from the start of the animation
    Time(u32),
}

/// Result of [`Animation::advance`](crate::Animation::advance)
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Tick {
    /// A frame was drawn. Call again after the delay.
    Rendered(Duration),
    /// Too early, nothing was drawn
    Wait(Duration),
    Completed,
}

/// Position and timing, for suspending and resuming playback elsewhere
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SavedState {
    pub frame_index: usize,
    pub loop_index: u32,
    pub remainder: Option<i64>,
    pub speed: f32,
}

impl SavedState {
    /// `[frame index, loop index, remainder or -1, speed's f32 bits]`
    #[must_use]
    pub fn to_array(&self) -> [i64; 4] {
        [
            self.frame_index as i64,
            i64::from(self.loop_index),
            self.remainder.unwrap_or(-1),
            i64::from(self.speed.to_bits()),
        ]
    }

    #[must_use]
    pub fn from_array(state: [i64; 4]) -> Self {
        Self {
            frame_index: state[0].max(0) as usize,
            loop_index: state[1].clamp(0, i64::from(u32::MAX)) as u32,
            remainder: (state[2] >= 0).then_some(state[2]),
            speed: f32::from_bits(state[3] as u32),
        }
    }
}

/// What happened to the frame index after a frame was drawn
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Step {
    /// Moved to the next frame, which should be shown after this many ms
    Continue(u32),
    /// Passed the last frame and should start over. The caller must rewind, then call `wrap()`.
    Wrap(u32),
    /// That was the last frame of the last loop
    Completed,
}

pub(crate) struct Playback {
    frame_count: usize,
    /// Next frame to draw
    frame_index: usize,
    loop_index: u32,
    /// 0 is infinite
    loop_count: u32,
    speed: f32,
    remainder: Option<i64>,
    next_start: i64,
    pending: Option<SeekTarget>,
    /// Frame currently on the canvas
    shown: Option<usize>,
}

impl Playback {
    pub fn new(frame_count: usize, loop_count: u32) -> Self {
        Self {
            frame_count,
            frame_index: 0,
            loop_index: 0,
            loop_count,
            speed: 1.,
            remainder: None,
            next_start: 0,
            pending: None,
            shown: None,
        }
    }

    pub fn reset(&mut self) {
        self.frame_index = 0;
        self.loop_index = 0;
        self.next_start = 0;
        self.remainder = None;
        self.shown = None;
    }

    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Last frame drawn, 0 before the first one
    pub fn shown_index(&self) -> usize {
        self.shown.unwrap_or(0)
    }

    pub fn loop_index(&self) -> u32 {
        self.loop_index
    }

    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    pub fn set_loop_count(&mut self, loop_count: u32) {
        self.loop_count = loop_count;
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    pub fn next_start(&self) -> i64 {
        self.next_start
    }

    pub fn is_completed(&self) -> bool {
        self.loop_count != 0 && self.loop_index >= self.loop_count
    }

    pub fn state(&self) -> PlaybackState {
        if self.pending.is_some() {
            PlaybackState::SeekPending
        } else if self.is_completed() {
            PlaybackState::Completed
        } else if let Some(frame_index) = self.shown {
            PlaybackState::Playing { frame_index, loop_index: self.loop_index }
        } else {
            PlaybackState::Stopped
        }
    }

    pub fn request_seek(&mut self, target: SeekTarget) {
        self.pending = Some(target);
    }

    pub fn take_pending(&mut self) -> Option<SeekTarget> {
        self.pending.take()
    }

    /// Moves past the frame that has just been drawn, which lasts `duration` ms
    pub fn finish_frame(&mut self, duration: u32) -> Step {
        self.shown = Some(self.frame_index);
        if self.frame_index + 1 < self.frame_count {
            self.frame_index += 1;
            return Step::Continue(duration);
        }
        if self.loop_count == 0 || self.loop_index + 1 < self.loop_count {
            Step::Wrap(duration)
        } else {
            self.loop_index += 1;
            self.frame_index = 0;
            Step::Completed
        }
    }

    /// Starts the next loop, after the source has been rewound
    pub fn wrap(&mut self) {
        if self.loop_count > 0 {
            self.loop_index += 1;
        }
        self.frame_index = 0;
    }

    /// Makes `index` the next frame to be finished, after a seek has drawn it
    pub fn jump_to(&mut self, index: usize) {
        self.frame_index = index;
    }

    /// `duration` adjusted for speed
    pub fn scaled(&self, duration: u32) -> i64 {
        if self.speed == 1. {
            i64::from(duration)
        } else {
            (duration as f32 / self.speed) as i64
        }
    }

    /// Time to wait before drawing the next frame, minus the time it took to draw this one.
    /// `None` for a zero duration.
    pub fn invalidation_delay(&mut self, render_start: i64, now: i64, duration: u32) -> Option<i64> {
        if duration == 0 {
            return None;
        }
        let delay = self.scaled(duration);
        let rendering_time = now - render_start;
        let delay = if rendering_time >= delay { 0 } else { delay - rendering_time };
        self.next_start = render_start + delay;
        Some(delay)
    }

    /// The frame at `ms` from the start, and how far into it that is
    pub fn frame_at_time(&self, ms: u32, durations: impl Iterator<Item = u32>) -> (usize, i64) {
        let mut sum = 0i64;
        let mut index = 0;
        for duration in durations.take(self.frame_count.saturating_sub(1)) {
            let next = sum + i64::from(duration);
            if next > i64::from(ms) {
                break;
            }
            sum = next;
            index += 1;
        }
        (index, i64::from(ms) - sum)
    }

    /// After seeking to a time. `into_frame` is how far into the frame the target was,
    /// capped by the caller to the last frame's duration.
    /// `paused` is whether a remainder was saved before the seek.
    pub fn finish_time_seek(&mut self, now: i64, into_frame: i64, paused: bool) {
        let wait = if paused {
            self.remainder = Some(into_frame);
            into_frame
        } else {
            0
        };
        self.next_start = now + (wait as f32 / self.speed) as i64;
    }

    pub fn finish_frame_seek(&mut self, now: i64, duration: u32, paused: bool) {
        self.next_start = now + self.scaled(duration);
        if paused {
            self.remainder = Some(0);
        }
    }

    /// Freezes the time left for the current frame
    pub fn save_remainder(&mut self, now: i64) {
        if self.remainder.is_some() || self.frame_count == 1 {
            return;
        }
        self.remainder = Some((self.next_start - now).max(0));
    }

    /// Resumes the time saved by `save_remainder`. Returns how long to wait.
    pub fn restore_remainder(&mut self, now: i64) -> Option<i64> {
        if self.frame_count == 1 || self.is_completed() {
            return None;
        }
        let remainder = self.remainder.take()?;
        self.next_start = now + remainder;
        Some(remainder)
    }

    /// Milliseconds from the start of the loop to now
    pub fn position(&self, now: i64, durations: impl Iterator<Item = u32>) -> i64 {
        if self.frame_count == 1 {
            return 0;
        }
        let shown = if self.frame_index == 0 { self.frame_count } else { self.frame_index };
        let sum: i64 = durations.take(shown).map(i64::from).sum();
        let remainder = self.remainder.unwrap_or_else(|| (self.next_start - now).max(0));
        sum - remainder
    }

    pub fn save_state(&self) -> SavedState {
        SavedState {
            frame_index: self.frame_index,
            loop_index: self.loop_index,
            remainder: self.remainder,
            speed: self.speed,
        }
    }

    /// Applies everything except the frame position, which the caller renders up to
    pub fn restore_timing(&mut self, state: &SavedState) {
        self.loop_index = state.loop_index;
        self.remainder = state.remainder;
        if state.speed.is_finite() && state.speed > 0. {
            self.speed = state.speed;
        }
    }

    pub fn remainder(&self) -> Option<i64> {
        self.remainder
    }

    pub fn set_next_start(&mut self, next_start: i64) {
        self.next_start = next_start;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(p: &mut Playback) -> Step {
        let step = p.finish_frame(100);
        if let Step::Wrap(_) = step {
            p.wrap();
        }
        step
    }

    #[test]
    fn loops_then_completes() {
        let mut p = Playback::new(3, 2);
        assert_eq!(PlaybackState::Stopped, p.state());
        let steps: Vec<_> = (0..6).map(|_| play(&mut p)).collect();
        assert_eq!(steps, [
            Step::Continue(100), Step::Continue(100), Step::Wrap(100),
            Step::Continue(100), Step::Continue(100), Step::Completed,
        ]);
        assert_eq!(2, p.loop_index());
        assert_eq!(0, p.frame_index());
        assert_eq!(2, p.shown_index());
        assert!(p.is_completed());
        assert_eq!(PlaybackState::Completed, p.state());
    }

    #[test]
    fn infinite_loop_keeps_loop_index() {
        let mut p = Playback::new(2, 0);
        for _ in 0..10 {
            assert_ne!(Step::Completed, play(&mut p));
        }
        assert_eq!(0, p.loop_index());
        assert!(!p.is_completed());
        assert_eq!(PlaybackState::Playing { frame_index: 1, loop_index: 0 }, p.state());
    }

    #[test]
    fn play_once() {
        let mut p = Playback::new(2, 1);
        assert_eq!(Step::Continue(100), play(&mut p));
        assert_eq!(Step::Completed, play(&mut p));
        assert_eq!(1, p.loop_index());
    }

    #[test]
    fn delay_scales_with_speed() {
        let mut p = Playback::new(2, 0);
        assert_eq!(Some(100), p.invalidation_delay(1000, 1000, 100));
        assert_eq!(1100, p.next_start());
        p.set_speed(2.);
        assert_eq!(Some(50), p.invalidation_delay(1000, 1000, 100));
        assert_eq!(Some(35), p.invalidation_delay(1000, 1015, 100));
        assert_eq!(1035, p.next_start());
        p.set_speed(0.5);
        assert_eq!(Some(0), p.invalidation_delay(0, 300, 100));
        assert_eq!(None, p.invalidation_delay(0, 0, 0));
    }

    #[test]
    fn remainder_survives_pause() {
        let mut p = Playback::new(3, 0);
        p.finish_frame(100);
        p.invalidation_delay(1000, 1000, 100);
        p.save_remainder(1030);
        assert_eq!(Some(70), p.remainder());
        // a second save doesn't overwrite the first
        p.save_remainder(1090);
        assert_eq!(Some(70), p.remainder());
        assert_eq!(Some(70), p.restore_remainder(5000));
        assert_eq!(5070, p.next_start());
        assert_eq!(None, p.restore_remainder(5000));
    }

    #[test]
    fn remainder_ignored_for_still_images_and_completion() {
        let mut p = Playback::new(1, 0);
        p.save_remainder(0);
        assert_eq!(None, p.remainder());

        let mut p = Playback::new(2, 1);
        p.save_remainder(0);
        play(&mut p);
        play(&mut p);
        assert_eq!(None, p.restore_remainder(0));
    }

    #[test]
    fn position_in_loop() {
        let durations = [100, 200, 300];
        let mut p = Playback::new(3, 0);
        p.finish_frame(100);
        p.invalidation_delay(0, 0, 100);
        assert_eq!(60, p.position(60, durations.iter().copied()));
        p.finish_frame(200);
        p.invalidation_delay(100, 100, 200);
        assert_eq!(150, p.position(150, durations.iter().copied()));
        assert_eq!(300, p.position(999, durations.iter().copied()));
        assert_eq!(0, Playback::new(1, 0).position(5, durations.iter().copied()));
    }

    #[test]
    fn time_to_frame() {
        let durations = [100, 200, 300];
        let p = Playback::new(3, 0);
        assert_eq!((0, 0), p.frame_at_time(0, durations.iter().copied()));
        assert_eq!((0, 99), p.frame_at_time(99, durations.iter().copied()));
        assert_eq!((1, 0), p.frame_at_time(100, durations.iter().copied()));
        assert_eq!((2, 50), p.frame_at_time(350, durations.iter().copied()));
        assert_eq!((2, 9700), p.frame_at_time(10000, durations.iter().copied()));
    }

    #[test]
    fn seeks_keep_pause() {
        let mut p = Playback::new(3, 0);
        p.finish_time_seek(1000, 40, false);
        assert_eq!(None, p.remainder());
        assert_eq!(1000, p.next_start());
        p.set_speed(2.);
        p.finish_time_seek(1000, 40, true);
        assert_eq!(Some(40), p.remainder());
        assert_eq!(1020, p.next_start());
        p.finish_frame_seek(1000, 100, true);
        assert_eq!(Some(0), p.remainder());
        assert_eq!(1050, p.next_start());
    }

    #[test]
    fn saved_state_array() {
        let state = SavedState { frame_index: 3, loop_index: 1, remainder: None, speed: 1.5 };
        let array = state.to_array();
        assert_eq!(-1, array[2]);
        assert_eq!(state, SavedState::from_array(array));
        let state = SavedState { remainder: Some(40), ..state };
        assert_eq!(state, SavedState::from_array(state.to_array()));
    }

    #[test]
    fn manual_clock_is_shared() {
        let clock = ManualClock::default();
        let other = clock.clone();
        clock.set(10);
        other.advance(5);
        assert_eq!(15, clock.now_ms());
        assert!(MonotonicClock::default().now_ms() >= 0);
    }
}
