//! Decoding on a background thread.
//!
//! There is one canvas, and it is passed back and forth: the decode thread draws a frame
//! and sends the canvas to the caller, who shows it and drops the [`FrameGuard`],
//! which sends it back. Neither side can touch the canvas while the other has it.
//!
//! Between frames the decode thread sleeps for the frame delay, but wakes up early
//! to handle seeks and cancellation.

use crate::animation::Animation;
use crate::compose::Canvas;
use crate::error::{CatResult, Error};
use crate::playback::{PlaybackState, SeekTarget};
use crossbeam_channel::{bounded, select, unbounded, Receiver, RecvError, Select, Sender};
use log::{debug, warn};
use std::mem;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Every seek starts a new generation. Messages from older ones are stale.
type Generation = u64;

enum Control {
    Seek(SeekTarget, Generation),
    Cancel,
}

enum Message {
    /// A drawn frame and the time to show it for
    Frame(Canvas, Option<Duration>, Generation),
    /// No more frames until a seek. `Ok` when the animation has completed.
    Finished(CatResult<()>, Generation),
}

enum Sent {
    Delivered,
    /// A seek came in first, and the message was dropped
    Superseded,
    Cancelled,
}

/// Counts moments when both threads were using the canvas at once
#[derive(Default)]
struct Probe {
    writing: AtomicBool,
    reading: AtomicBool,
    overlaps: AtomicUsize,
}

impl Probe {
    fn begin_write(&self) {
        self.writing.store(true, Ordering::SeqCst);
        if self.reading.load(Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn end_write(&self) {
        self.writing.store(false, Ordering::SeqCst);
    }

    fn begin_read(&self) {
        self.reading.store(true, Ordering::SeqCst);
        if self.writing.load(Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn end_read(&self) {
        self.reading.store(false, Ordering::SeqCst);
    }
}

/// Plays an [`Animation`] on a background thread
pub struct RenderPipeline {
    control: Sender<Control>,
    ready: Receiver<Message>,
    free: Sender<Canvas>,
    thread: Option<thread::JoinHandle<(Animation, Option<Canvas>)>>,
    probe: Arc<Probe>,
    generation: Generation,
    finished: bool,
}

/// A drawn frame. Drop it to let the next one be drawn.
pub struct FrameGuard<'a> {
    canvas: Canvas,
    delay: Option<Duration>,
    free: &'a Sender<Canvas>,
    probe: &'a Probe,
}

impl FrameGuard<'_> {
    /// How long this frame should be shown. `None` for the last frame of the last loop.
    #[must_use]
    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }
}

impl Deref for FrameGuard<'_> {
    type Target = Canvas;

    fn deref(&self) -> &Canvas {
        &self.canvas
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.probe.end_read();
        let canvas = mem::replace(&mut self.canvas, Canvas::empty());
        // fails only if the decode thread has exited
        let _ = self.free.send(canvas);
    }
}

impl RenderPipeline {
    /// Starts decoding from the animation's current position.
    /// The canvas must be the animation's size, and keeps what was drawn on it before.
    pub fn start(animation: Animation, canvas: Canvas) -> CatResult<Self> {
        canvas.check_size(animation.width(), animation.height())?;
        let (control_tx, control_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);
        let (free_tx, free_rx) = bounded(1);
        let probe = Arc::new(Probe::default());

        let worker = Worker {
            animation,
            canvas: Some(canvas),
            control: control_rx,
            ready: ready_tx,
            free: free_rx,
            probe: probe.clone(),
            generation: 0,
        };
        let thread = thread::Builder::new()
            .name("gifplay-decode".into())
            .spawn(move || worker.run())?;

        Ok(Self {
            control: control_tx,
            ready: ready_rx,
            free: free_tx,
            thread: Some(thread),
            probe,
            generation: 0,
            finished: false,
        })
    }

    /// Waits for the next frame.
    ///
    /// `Ok(None)` once the animation has completed. A decode error is returned once,
    /// after which there are no more frames until [`seek`](Self::seek).
    pub fn next_frame(&mut self) -> CatResult<Option<FrameGuard<'_>>> {
        if self.finished {
            return Ok(None);
        }
        let (canvas, delay) = loop {
            match self.ready.recv()? {
                Message::Frame(canvas, delay, generation) if generation == self.generation => break (canvas, delay),
                Message::Frame(canvas, ..) => {
                    // drawn before the last seek
                    let _ = self.free.send(canvas);
                },
                Message::Finished(res, generation) if generation == self.generation => {
                    self.finished = true;
                    return res.map(|()| None);
                },
                Message::Finished(..) => {},
            }
        };
        self.probe.begin_read();
        Ok(Some(FrameGuard {
            canvas,
            delay,
            free: &self.free,
            probe: &self.probe,
        }))
    }

    /// Interrupts the current delay and draws the target frame next.
    /// Frames and completion reported before the seek are skipped.
    pub fn seek(&mut self, target: SeekTarget) -> CatResult<()> {
        self.finished = false;
        self.generation += 1;
        self.control.send(Control::Seek(target, self.generation))?;
        Ok(())
    }

    /// Number of times the canvas was seen by both threads at once. Always 0.
    #[must_use]
    pub fn overlap_count(&self) -> usize {
        self.probe.overlaps.load(Ordering::SeqCst)
    }

    /// Stops the decode thread, keeping the time left of the current frame,
    /// and gives back the animation and the canvas with the last frame on it.
    pub fn stop(mut self) -> CatResult<(Animation, Canvas)> {
        let (animation, canvas) = self.shutdown()?;
        let canvas = canvas.ok_or(Error::InvalidState("canvas was not returned by the decode thread"))?;
        Ok((animation, canvas))
    }

    fn shutdown(&mut self) -> CatResult<(Animation, Option<Canvas>)> {
        let thread = self.thread.take().ok_or(Error::InvalidState("already stopped"))?;
        // fails only if the thread has exited already
        let _ = self.control.send(Control::Cancel);
        let (animation, canvas) = thread.join().map_err(|panic| {
            let msg = panic.downcast_ref::<&str>().map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            Error::ThreadJoin(msg)
        })?;
        let canvas = canvas.or_else(|| {
            self.ready.try_iter().find_map(|msg| match msg {
                Message::Frame(canvas, ..) => Some(canvas),
                Message::Finished(..) => None,
            })
        });
        Ok((animation, canvas))
    }
}

impl Drop for RenderPipeline {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(err) = self.shutdown() {
                warn!("decode thread: {err}");
            }
        }
    }
}

struct Worker {
    animation: Animation,
    /// `None` while the caller has it
    canvas: Option<Canvas>,
    control: Receiver<Control>,
    ready: Sender<Message>,
    free: Receiver<Canvas>,
    probe: Arc<Probe>,
    /// Of the last seek received
    generation: Generation,
}

impl Worker {
    fn run(mut self) -> (Animation, Option<Canvas>) {
        if let Err(err) = self.play() {
            debug!("decode thread ended: {err}");
        }
        if self.canvas.is_none() {
            self.canvas = self.free.try_recv().ok();
        }
        (self.animation, self.canvas)
    }

    /// Returns when cancelled, or with an error if the caller is gone
    fn play(&mut self) -> CatResult<()> {
        loop {
            let seeking = self.animation.playback_state() == PlaybackState::SeekPending;
            if self.animation.is_animation_completed() && !seeking {
                match self.send(Message::Finished(Ok(()), self.generation))? {
                    Sent::Delivered => if !self.idle()? {
                        return Ok(());
                    },
                    Sent::Superseded => {},
                    Sent::Cancelled => return Ok(()),
                }
                continue;
            }

            let Some(mut canvas) = self.canvas.take() else {
                return Err(Error::InvalidState("no canvas to draw on"));
            };
            self.probe.begin_write();
            let res = self.animation.render_next_frame(&mut canvas);
            self.probe.end_write();

            match res {
                Ok(delay) => {
                    let deadline = Instant::now() + delay.unwrap_or_default();
                    match self.send(Message::Frame(canvas, delay, self.generation))? {
                        Sent::Delivered => if !self.wait_for_canvas()? || !self.sleep_until(deadline) {
                            return Ok(());
                        },
                        Sent::Superseded => {},
                        Sent::Cancelled => return Ok(()),
                    }
                },
                Err(err) => {
                    warn!("frame {} failed: {err}", self.animation.current_frame_index());
                    self.canvas = Some(canvas);
                    match self.send(Message::Finished(Err(err), self.generation))? {
                        Sent::Delivered => if !self.idle()? {
                            return Ok(());
                        },
                        Sent::Superseded => {},
                        Sent::Cancelled => return Ok(()),
                    }
                },
            }
        }
    }

    /// Waits until the caller takes the message, or a seek or cancellation comes in.
    /// A canvas that wasn't delivered is kept.
    fn send(&mut self, msg: Message) -> CatResult<Sent> {
        let (ready, control) = (self.ready.clone(), self.control.clone());
        loop {
            let mut sel = Select::new();
            let send_op = sel.send(&ready);
            let control_op = sel.recv(&control);
            let oper = sel.select();
            if oper.index() == send_op {
                return match oper.send(&ready, msg) {
                    Ok(()) => Ok(Sent::Delivered),
                    Err(err) => {
                        self.keep_canvas(err.into_inner());
                        Err(Error::ThreadSend)
                    },
                };
            }
            debug_assert_eq!(control_op, oper.index());
            let received = oper.recv(&control);
            let is_seek = matches!(received, Ok(Control::Seek(..)));
            let keep_going = self.handle(received);
            if !keep_going || is_seek {
                self.keep_canvas(msg);
                return Ok(if keep_going { Sent::Superseded } else { Sent::Cancelled });
            }
        }
    }

    fn keep_canvas(&mut self, msg: Message) {
        if let Message::Frame(canvas, ..) = msg {
            self.canvas = Some(canvas);
        }
    }

    /// `false` to stop
    fn handle(&mut self, msg: Result<Control, RecvError>) -> bool {
        match msg {
            Ok(Control::Seek(target, generation)) => {
                self.generation = generation;
                self.animation.request_seek(target);
                true
            },
            Ok(Control::Cancel) | Err(_) => {
                self.animation.save_remainder();
                false
            },
        }
    }

    fn wait_for_canvas(&mut self) -> CatResult<bool> {
        let (free, control) = (self.free.clone(), self.control.clone());
        loop {
            select! {
                recv(free) -> canvas => {
                    self.canvas = Some(canvas?);
                    return Ok(true);
                },
                recv(control) -> msg => if !self.handle(msg) {
                    return Ok(false);
                },
            }
        }
    }

    /// Cancellable sleep. A seek ends it early.
    fn sleep_until(&mut self, deadline: Instant) -> bool {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() || self.animation.playback_state() == PlaybackState::SeekPending {
            return true;
        }
        let control = self.control.clone();
        select! {
            recv(control) -> msg => self.handle(msg),
            default(left) => true,
        }
    }

    /// Waits for a seek or cancellation
    fn idle(&mut self) -> CatResult<bool> {
        let msg = self.control.recv();
        Ok(self.handle(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Context;
    use rgb::RGBA8;

    fn gif(frames: u8, repeat: gif::Repeat) -> Vec<u8> {
        let palette: Vec<u8> = (0..4).flat_map(|i| [i * 60, 0, 0]).collect();
        let mut out = vec![];
        {
            let mut enc = gif::Encoder::new(&mut out, 3, 2, &palette).unwrap();
            enc.set_repeat(repeat).unwrap();
            for i in 0..frames {
                enc.write_frame(&gif::Frame::from_indexed_pixels(3, 2, vec![i % 4; 6], None)).unwrap();
            }
        }
        out
    }

    fn start(frames: u8, repeat: gif::Repeat) -> RenderPipeline {
        let mut anim = Context::new().open_bytes(gif(frames, repeat)).unwrap();
        anim.set_speed_factor(1e6).unwrap();
        let canvas = anim.new_canvas().unwrap();
        RenderPipeline::start(anim, canvas).unwrap()
    }

    #[test]
    fn ping_pong_never_overlaps() {
        let mut pipeline = start(4, gif::Repeat::Infinite);
        for i in 0..10_000 {
            let frame = pipeline.next_frame().unwrap().unwrap();
            assert_eq!(RGBA8::new((i % 4 * 60) as u8, 0, 0, 255), frame.pixels()[5]);
        }
        assert_eq!(0, pipeline.overlap_count());
        let (anim, canvas) = pipeline.stop().unwrap();
        assert!(anim.current_frame_index() < 4);
        assert_eq!(255, canvas.pixels()[0].a);
    }

    #[test]
    fn completes_and_seeks_again() {
        let mut pipeline = start(3, gif::Repeat::Finite(0));
        let mut shown = 0;
        while let Some(frame) = pipeline.next_frame().unwrap() {
            shown += 1;
            if shown == 3 {
                assert_eq!(None, frame.delay());
            }
        }
        assert_eq!(3, shown);
        assert!(pipeline.next_frame().unwrap().is_none());

        pipeline.seek(SeekTarget::Frame(1)).unwrap();
        let frame = pipeline.next_frame().unwrap().unwrap();
        assert_eq!(RGBA8::new(60, 0, 0, 255), frame.pixels()[0]);
        drop(frame);
        let (anim, _) = pipeline.stop().unwrap();
        assert_eq!(3, anim.frame_count());
    }

    fn play_to_completion(pipeline: &mut RenderPipeline, frames: usize) {
        for _ in 0..frames {
            drop(pipeline.next_frame().unwrap().unwrap());
        }
        // let the decode thread queue up its completion
        thread::sleep(Duration::from_millis(200));
    }

    #[test]
    fn seek_skips_unread_completion() {
        let mut pipeline = start(3, gif::Repeat::Finite(0));
        play_to_completion(&mut pipeline, 3);
        pipeline.seek(SeekTarget::Frame(1)).unwrap();
        let frame = pipeline.next_frame().unwrap().unwrap();
        assert_eq!(RGBA8::new(60, 0, 0, 255), frame.pixels()[0]);
        drop(frame);
        let (anim, _) = pipeline.stop().unwrap();
        assert_eq!(3, anim.frame_count());
    }

    #[test]
    fn stop_after_seek_with_unread_completion() {
        let mut pipeline = start(3, gif::Repeat::Finite(0));
        play_to_completion(&mut pipeline, 3);
        pipeline.seek(SeekTarget::Frame(0)).unwrap();
        thread::sleep(Duration::from_millis(50));

        let (done_tx, done_rx) = bounded(1);
        thread::spawn(move || {
            let _ = done_tx.send(pipeline.stop().map(|(anim, canvas)| (anim.frame_count(), canvas.width())));
        });
        let res = done_rx.recv_timeout(Duration::from_secs(5)).expect("stop() hung");
        assert_eq!((3, 3), res.unwrap());
    }

    #[test]
    fn stale_frames_are_skipped_after_seek() {
        let mut anim = Context::new().open_bytes(gif(4, gif::Repeat::Infinite)).unwrap();
        anim.set_speed_factor(1e6).unwrap();
        let canvas = anim.new_canvas().unwrap();
        let mut pipeline = RenderPipeline::start(anim, canvas).unwrap();
        // frame 0 is drawn and waiting, unread
        thread::sleep(Duration::from_millis(50));
        pipeline.seek(SeekTarget::Frame(2)).unwrap();
        let frame = pipeline.next_frame().unwrap().unwrap();
        assert_eq!(RGBA8::new(120, 0, 0, 255), frame.pixels()[0]);
        drop(frame);
        let frame = pipeline.next_frame().unwrap().unwrap();
        assert_eq!(RGBA8::new(180, 0, 0, 255), frame.pixels()[0]);
        drop(frame);
        assert_eq!(0, pipeline.overlap_count());
    }

    #[test]
    fn stop_while_frame_is_pending() {
        let mut pipeline = start(2, gif::Repeat::Infinite);
        drop(pipeline.next_frame().unwrap());
        let (anim, canvas) = pipeline.stop().unwrap();
        assert_eq!((3, 2), (canvas.width(), canvas.height()));
        assert!(anim.frame_count() == 2);
    }

    #[test]
    fn wrong_canvas() {
        let anim = Context::new().open_bytes(gif(2, gif::Repeat::Infinite)).unwrap();
        assert!(RenderPipeline::start(anim, Canvas::new(1, 1).unwrap()).is_err());
    }
}
