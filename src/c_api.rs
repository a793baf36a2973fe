#![allow(clippy::missing_safety_doc)]
//! How to use from C
//!
//! ```c
//! GifplayError err;
//! gifplay *g = gifplay_open_file("file.gif", 0, &err);
//! if (!g) return err;
//!
//! uint32_t width = gifplay_get_width(g), height = gifplay_get_height(g);
//! uint8_t *pixels = malloc(width * height * 4);
//! for(;;) {
//!      int64_t delay = gifplay_render_next_frame(g, pixels, width * 4);
//!      if (delay < 0) break; // -1 completed, -2 error
//!      show(pixels);
//!      sleep_ms(delay);
//! }
//! gifplay_close(g);
//! ```
//!
//! The pixels are RGBA, with alpha byte last. The buffer is only written to;
//! the animation keeps its own copy of the canvas, so the same buffer doesn't have to be passed every time.
//!
//! Functions that take a handle may be called from any thread, but calls on the same handle are serialized.
//!
//! To build as a library:
//!
//! ```bash
//! cargo build --release --lib
//! ```
//!
//! it will create `target/release/libgifplay.a` (static library)
//! and `target/release/libgifplay.so`/`dylib` or `gifplay.dll` (dynamic library)

use super::*;
use std::ffi::{CStr, CString};
use std::fs::File;
use std::io::Write;
use std::mem;
use std::os::raw::{c_char, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::slice;
use std::sync::Mutex;
use rgb::RGBA8;
mod c_api_error;
pub use self::c_api_error::GifplayError;

/// Returned by render functions when the animation has completed
pub const GIFPLAY_COMPLETED: i64 = -1;
/// Returned by render functions on error. See `gifplay_native_error_code`.
pub const GIFPLAY_FAILED: i64 = -2;

/// Opaque handle used in methods. Note that the handle pointer is actually `Arc<GifplayHandleInternal>`,
/// but `Arc::into_raw` is nice enough to point past the counter.
#[repr(C)]
pub struct GifplayHandle {
    _opaque: usize,
}

pub struct GifplayHandleInternal {
    player: Mutex<Player>,
    error_callback: Mutex<Option<Box<dyn Fn(String) + 'static + Sync + Send>>>,
}

pub struct Player {
    animation: Animation,
    /// Allocated at the first render, when the size is final
    canvas: Option<Canvas>,
}

unsafe fn open(source: CatResult<impl GifSource + 'static>, error: *mut GifplayError) -> *const GifplayHandle {
    let res = source.and_then(|source| Context::new().open(source));
    if let Some(error) = error.as_mut() {
        *error = match &res {
            Ok(_) => GifplayError::OK,
            Err(err) => err.into(),
        };
    }
    match res {
        Ok(animation) => Arc::into_raw(Arc::new(GifplayHandleInternal {
            player: Mutex::new(Player { animation, canvas: None }),
            error_callback: Mutex::new(None),
        })).cast::<GifplayHandle>(),
        Err(_) => ptr::null(),
    }
}

/// Opens a GIF file, starting at `offset` bytes into it. File path must be valid UTF-8.
///
/// Returns a handle for the other functions, or `NULL` on error.
/// If `error` isn't `NULL`, the reason is written to it.
#[no_mangle]
pub unsafe extern "C" fn gifplay_open_file(path: *const c_char, offset: u64, error: *mut GifplayError) -> *const GifplayHandle {
    if path.is_null() {
        if let Some(error) = error.as_mut() {
            *error = GifplayError::NULL_ARG;
        }
        return ptr::null();
    }
    let Ok(path) = CStr::from_ptr(path).to_str() else {
        if let Some(error) = error.as_mut() {
            *error = GifplayError::INVALID_INPUT;
        }
        return ptr::null();
    };
    let source = File::open(path).map_err(Error::Open).and_then(|file| FileSource::with_offset(file, offset));
    open(source, error)
}

/// Opens a GIF from memory. The bytes are copied, so the buffer can be freed immediately.
#[no_mangle]
pub unsafe extern "C" fn gifplay_open_bytes(data: *const u8, len: usize, error: *mut GifplayError) -> *const GifplayHandle {
    if data.is_null() {
        if let Some(error) = error.as_mut() {
            *error = GifplayError::NULL_ARG;
        }
        return ptr::null();
    }
    let bytes = slice::from_raw_parts(data, len);
    open(BytesSource::new(bytes), error)
}

/// Releases the animation and its buffers. The handle can't be used after this call.
#[no_mangle]
pub unsafe extern "C" fn gifplay_close(handle: *const GifplayHandle) -> GifplayError {
    if handle.is_null() {
        return GifplayError::NULL_ARG;
    }
    let g = Arc::from_raw(handle.cast::<GifplayHandleInternal>());
    match catch_unwind(AssertUnwindSafe(move || drop(g))) {
        Ok(()) => GifplayError::OK,
        Err(_) => GifplayError::THREAD_LOST,
    }
}

/// `sample_size` of 2 or more shrinks the canvas. Only valid before the first frame is rendered.
#[no_mangle]
pub unsafe extern "C" fn gifplay_set_options(handle: *const GifplayHandle, sample_size: u16, is_opaque: bool) -> GifplayError {
    let Some(g) = borrow(handle) else { return GifplayError::NULL_ARG };
    g.with_player(|p| {
        p.animation.set_options(Settings { sample_size, is_opaque })?;
        p.canvas = None;
        Ok(())
    })
}

/// Only valid when the pixels are returned through a render function.
unsafe fn pixels_slice_mut<'a>(pixels: *mut RGBA8, width: usize, height: usize, bytes_per_row: u32) -> Result<(&'a mut [RGBA8], usize), GifplayError> {
    if pixels.is_null() {
        return Err(GifplayError::NULL_ARG);
    }
    let stride = bytes_per_row as usize / mem::size_of::<RGBA8>();
    if stride < width || width == 0 || height == 0 {
        return Err(GifplayError::INVALID_INPUT);
    }
    let pixels = slice::from_raw_parts_mut(pixels, stride * height + width - stride);
    Ok((pixels, stride))
}

/// Draws the next frame into `pixels`, which must be `bytes_per_row` × height bytes large.
///
/// Returns the number of milliseconds to wait before the next call, `GIFPLAY_COMPLETED` (-1) when there are no more frames,
/// or `GIFPLAY_FAILED` (-2) on error.
#[no_mangle]
pub unsafe extern "C" fn gifplay_render_next_frame(handle: *const GifplayHandle, pixels: *mut RGBA8, bytes_per_row: u32) -> i64 {
    let Some(g) = borrow(handle) else { return GIFPLAY_FAILED };
    match g.draw(pixels, bytes_per_row, |a, canvas| a.render_next_frame(canvas)) {
        Ok(Some(delay)) => delay.as_millis() as i64,
        Ok(None) => GIFPLAY_COMPLETED,
        Err(_) => GIFPLAY_FAILED,
    }
}

/// Draws frame `index` into `pixels`. Out-of-range indices are clamped to the last frame.
#[no_mangle]
pub unsafe extern "C" fn gifplay_seek_to_frame(handle: *const GifplayHandle, index: u32, pixels: *mut RGBA8, bytes_per_row: u32) -> GifplayError {
    let Some(g) = borrow(handle) else { return GifplayError::NULL_ARG };
    g.draw(pixels, bytes_per_row, |a, canvas| a.seek_to_frame(index as usize, canvas)).map_or_else(|e| e, |_| GifplayError::OK)
}

/// Draws the frame shown `ms` milliseconds after the start into `pixels`
#[no_mangle]
pub unsafe extern "C" fn gifplay_seek_to_time(handle: *const GifplayHandle, ms: u32, pixels: *mut RGBA8, bytes_per_row: u32) -> GifplayError {
    let Some(g) = borrow(handle) else { return GifplayError::NULL_ARG };
    g.draw(pixels, bytes_per_row, |a, canvas| a.seek_to_time(ms, canvas)).map_or_else(|e| e, |_| GifplayError::OK)
}

/// Canvas width, after down-sampling. 0 if the handle is `NULL`.
#[no_mangle]
pub unsafe extern "C" fn gifplay_get_width(handle: *const GifplayHandle) -> u32 {
    borrow(handle).and_then(|g| g.get(|a| a.width() as u32)).unwrap_or(0)
}

#[no_mangle]
pub unsafe extern "C" fn gifplay_get_height(handle: *const GifplayHandle) -> u32 {
    borrow(handle).and_then(|g| g.get(|a| a.height() as u32)).unwrap_or(0)
}

#[no_mangle]
pub unsafe extern "C" fn gifplay_get_frame_count(handle: *const GifplayHandle) -> u32 {
    borrow(handle).and_then(|g| g.get(|a| a.frame_count() as u32)).unwrap_or(0)
}

/// Copies the comment, nul-terminated, into `buffer` of `capacity` bytes.
///
/// Returns the comment's full length without the terminator, which may be more than what fit. 0 if there's no comment.
#[no_mangle]
pub unsafe extern "C" fn gifplay_get_comment(handle: *const GifplayHandle, buffer: *mut c_char, capacity: usize) -> usize {
    let Some(comment) = borrow(handle).and_then(|g| g.get(|a| a.comment())).flatten() else { return 0 };
    if !buffer.is_null() && capacity > 0 {
        let len = comment.len().min(capacity - 1);
        ptr::copy_nonoverlapping(comment.as_ptr().cast::<c_char>(), buffer, len);
        *buffer.add(len) = 0;
    }
    comment.len()
}

/// 0 means infinite
#[no_mangle]
pub unsafe extern "C" fn gifplay_get_loop_count(handle: *const GifplayHandle) -> u32 {
    borrow(handle).and_then(|g| g.get(|a| a.loop_count())).unwrap_or(0)
}

#[no_mangle]
pub unsafe extern "C" fn gifplay_set_loop_count(handle: *const GifplayHandle, loop_count: u32) -> GifplayError {
    let Some(g) = borrow(handle) else { return GifplayError::NULL_ARG };
    g.with_player(|p| {
        p.animation.set_loop_count(loop_count);
        Ok(())
    })
}

/// Milliseconds, or -1 if the index is out of range
#[no_mangle]
pub unsafe extern "C" fn gifplay_get_frame_duration(handle: *const GifplayHandle, index: u32) -> i64 {
    borrow(handle).and_then(|g| g.get(|a| a.frame_duration(index as usize))).flatten()
        .map_or(-1, |d| d.as_millis() as i64)
}

/// Milliseconds of one loop
#[no_mangle]
pub unsafe extern "C" fn gifplay_get_total_duration(handle: *const GifplayHandle) -> u64 {
    borrow(handle).and_then(|g| g.get(|a| a.total_duration().as_millis() as u64)).unwrap_or(0)
}

/// Milliseconds since the start of the current loop
#[no_mangle]
pub unsafe extern "C" fn gifplay_get_current_position(handle: *const GifplayHandle) -> u64 {
    borrow(handle).and_then(|g| g.get(|a| a.current_position().as_millis() as u64)).unwrap_or(0)
}

#[no_mangle]
pub unsafe extern "C" fn gifplay_get_current_frame_index(handle: *const GifplayHandle) -> u32 {
    borrow(handle).and_then(|g| g.get(|a| a.current_frame_index() as u32)).unwrap_or(0)
}

#[no_mangle]
pub unsafe extern "C" fn gifplay_get_current_loop_index(handle: *const GifplayHandle) -> u32 {
    borrow(handle).and_then(|g| g.get(|a| a.current_loop_index())).unwrap_or(0)
}

#[no_mangle]
pub unsafe extern "C" fn gifplay_is_animation_completed(handle: *const GifplayHandle) -> bool {
    borrow(handle).and_then(|g| g.get(|a| a.is_animation_completed())).unwrap_or(false)
}

/// Values above 1 play faster. Must be a positive number.
#[no_mangle]
pub unsafe extern "C" fn gifplay_set_speed_factor(handle: *const GifplayHandle, speed: f32) -> GifplayError {
    let Some(g) = borrow(handle) else { return GifplayError::NULL_ARG };
    g.with_player(|p| p.animation.set_speed_factor(speed))
}

/// Pauses the timing of the current frame
#[no_mangle]
pub unsafe extern "C" fn gifplay_save_remainder(handle: *const GifplayHandle) -> GifplayError {
    let Some(g) = borrow(handle) else { return GifplayError::NULL_ARG };
    g.with_player(|p| {
        p.animation.save_remainder();
        Ok(())
    })
}

/// Resumes after `gifplay_save_remainder`. Returns milliseconds to wait, or -1 if there was nothing to resume.
#[no_mangle]
pub unsafe extern "C" fn gifplay_restore_remainder(handle: *const GifplayHandle) -> i64 {
    borrow(handle).and_then(|g| g.get_mut(|a| a.restore_remainder())).flatten()
        .map_or(-1, |d| d.as_millis() as i64)
}

/// Goes back to the first frame
#[no_mangle]
pub unsafe extern "C" fn gifplay_reset(handle: *const GifplayHandle) -> GifplayError {
    let Some(g) = borrow(handle) else { return GifplayError::NULL_ARG };
    g.with_player(|p| p.animation.reset())
}

/// Writes 4 values to `state`: frame index, loop index, paused remainder (or -1), and speed.
#[no_mangle]
pub unsafe extern "C" fn gifplay_save_state(handle: *const GifplayHandle, state: *mut [i64; 4]) -> GifplayError {
    let Some(g) = borrow(handle) else { return GifplayError::NULL_ARG };
    let Some(state) = state.as_mut() else { return GifplayError::NULL_ARG };
    match g.get(|a| a.save_state().to_array()) {
        Some(saved) => {
            *state = saved;
            GifplayError::OK
        },
        None => GifplayError::THREAD_LOST,
    }
}

/// Renders the frame saved by `gifplay_save_state` into `pixels`.
///
/// Returns milliseconds to wait for the next frame, -1 if the state doesn't apply to this animation
/// (or was paused), or `GIFPLAY_FAILED`.
#[no_mangle]
pub unsafe extern "C" fn gifplay_restore_state(handle: *const GifplayHandle, state: *const [i64; 4], pixels: *mut RGBA8, bytes_per_row: u32) -> i64 {
    let Some(g) = borrow(handle) else { return GIFPLAY_FAILED };
    let Some(state) = state.as_ref() else { return GIFPLAY_FAILED };
    let state = SavedState::from_array(*state);
    match g.draw(pixels, bytes_per_row, |a, canvas| a.restore_state(&state, canvas)) {
        Ok(Some(delay)) => delay.as_millis() as i64,
        Ok(None) => -1,
        Err(_) => GIFPLAY_FAILED,
    }
}

/// Code of the last error on this handle
#[no_mangle]
pub unsafe extern "C" fn gifplay_native_error_code(handle: *const GifplayHandle) -> GifplayError {
    borrow(handle).and_then(|g| g.get(|a| a.native_error_code())).unwrap_or(GifplayError::NULL_ARG)
}

/// Size of the file or buffer, or -1 if unknown
#[no_mangle]
pub unsafe extern "C" fn gifplay_get_source_length(handle: *const GifplayHandle) -> i64 {
    borrow(handle).and_then(|g| g.get(|a| a.source_length())).flatten().map_or(-1, |len| len as i64)
}

#[no_mangle]
pub unsafe extern "C" fn gifplay_get_allocation_byte_count(handle: *const GifplayHandle) -> u64 {
    borrow(handle).and_then(|g| g.get(|a| a.allocation_byte_count() as u64)).unwrap_or(0)
}

#[no_mangle]
pub unsafe extern "C" fn gifplay_get_metadata_byte_count(handle: *const GifplayHandle) -> u64 {
    borrow(handle).and_then(|g| g.get(|a| a.metadata_byte_count() as u64)).unwrap_or(0)
}

/// Get a callback for error messages. Otherwise they're printed to stderr.
///
/// The callback gets a nul-terminated message and the `user_data` pointer.
/// It may be called from any thread that calls a function with this handle.
#[no_mangle]
pub unsafe extern "C" fn gifplay_set_error_message_callback(handle: *const GifplayHandle, cb: unsafe extern "C" fn(*const c_char, *mut c_void), user_data: *mut c_void) -> GifplayError {
    let Some(g) = borrow(handle) else { return GifplayError::NULL_ARG };

    let user_data = SendableUserData(user_data);
    match g.error_callback.lock() {
        Ok(mut error_callback) => {
            *error_callback = Some(Box::new(move |mut s: String| {
                s.reserve_exact(1);
                s.push('\0');
                let cstring = CString::from_vec_with_nul(s.into_bytes()).unwrap_or_default();
                unsafe { cb(cstring.as_ptr(), user_data.clone().0) } // the clone is a no-op, only to force closure to own it
            }));
            GifplayError::OK
        },
        Err(_) => GifplayError::THREAD_LOST,
    }
}

#[derive(Clone)]
struct SendableUserData(*mut c_void);
unsafe impl Send for SendableUserData {}
unsafe impl Sync for SendableUserData {}

unsafe fn borrow<'a>(handle: *const GifplayHandle) -> Option<&'a GifplayHandleInternal> {
    let g = handle.cast::<GifplayHandleInternal>();
    g.as_ref()
}

impl GifplayHandleInternal {
    fn get<T>(&self, f: impl FnOnce(&Animation) -> T) -> Option<T> {
        self.player.lock().ok().map(|p| f(&p.animation))
    }

    fn get_mut<T>(&self, f: impl FnOnce(&mut Animation) -> T) -> Option<T> {
        self.player.lock().ok().map(|mut p| f(&mut p.animation))
    }

    fn with_player(&self, f: impl FnOnce(&mut Player) -> CatResult<()>) -> GifplayError {
        let Ok(mut player) = self.player.lock() else { return GifplayError::THREAD_LOST };
        let res = f(&mut player);
        if let Err(err) = &res {
            self.print_error(err.to_string());
        }
        res.into()
    }

    /// Runs a render function on the canvas, and copies the canvas to the caller's pixels
    unsafe fn draw<T>(&self, pixels: *mut RGBA8, bytes_per_row: u32, f: impl FnOnce(&mut Animation, &mut Canvas) -> CatResult<T>) -> Result<T, GifplayError> {
        let mut player = self.player.lock().map_err(|_| GifplayError::THREAD_LOST)?;
        let Player { animation, canvas } = &mut *player;
        let (width, height) = (animation.width(), animation.height());
        let (out, stride) = pixels_slice_mut(pixels, width, height, bytes_per_row)?;

        let res = catch_unwind(AssertUnwindSafe(|| {
            let canvas = match canvas {
                Some(canvas) => canvas,
                None => canvas.insert(animation.new_canvas()?),
            };
            let value = f(animation, canvas)?;
            for (dst, src) in out.chunks_mut(stride).zip(canvas.pixels().chunks_exact(width)) {
                dst[..width].copy_from_slice(src);
            }
            Ok::<T, Error>(value)
        }));
        match res {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                self.print_error(err.to_string());
                Err(GifplayError::from(&err))
            },
            Err(panic) => {
                self.print_panic(panic);
                Err(GifplayError::THREAD_LOST)
            },
        }
    }

    fn print_error(&self, mut err: String) {
        if let Ok(Some(cb)) = self.error_callback.lock().as_deref() {
            cb(err);
        } else {
            err.reserve_exact(1);
            err.push('\n');
            let _ = std::io::stderr().write_all(err.as_bytes());
        }
    }

    fn print_panic(&self, e: Box<dyn std::any::Any + Send>) {
        let msg = e.downcast_ref::<String>().map(|s| s.as_str())
            .or_else(|| e.downcast_ref::<&str>().copied()).unwrap_or("unknown panic");
        self.print_error(format!("decoder crashed (this is a bug): {msg}"));
    }
}

#[cfg(test)]
fn test_gif(frames: u8, repeat: gif::Repeat) -> Vec<u8> {
    let palette = [0, 0, 0, 255, 0, 0, 0, 255, 0, 0, 0, 255];
    let mut out = vec![];
    {
        let mut enc = gif::Encoder::new(&mut out, 2, 2, &palette).unwrap();
        enc.set_repeat(repeat).unwrap();
        for i in 0..frames {
            let mut frame = gif::Frame::from_indexed_pixels(2, 2, vec![i % 3 + 1; 4], None);
            frame.delay = 5;
            enc.write_frame(&frame).unwrap();
        }
    }
    out
}

#[cfg(test)]
fn open_test_gif(frames: u8, repeat: gif::Repeat) -> *const GifplayHandle {
    let data = test_gif(frames, repeat);
    let mut err = GifplayError::OTHER;
    let g = unsafe { gifplay_open_bytes(data.as_ptr(), data.len(), &mut err) };
    assert_eq!(GifplayError::OK, err);
    assert!(!g.is_null());
    g
}

#[test]
fn null_args() {
    let mut err = GifplayError::OK;
    unsafe {
        assert!(gifplay_open_bytes(ptr::null(), 0, &mut err).is_null());
        assert_eq!(GifplayError::NULL_ARG, err);
        assert!(gifplay_open_file(ptr::null(), 0, ptr::null_mut()).is_null());
        assert_eq!(GifplayError::NULL_ARG, gifplay_close(ptr::null()));
        assert_eq!(GIFPLAY_FAILED, gifplay_render_next_frame(ptr::null(), ptr::null_mut(), 0));
        assert_eq!(0, gifplay_get_width(ptr::null()));
    }
}

#[test]
fn open_errors() {
    let mut err = GifplayError::OK;
    unsafe {
        let data = b"PNG89a not really";
        assert!(gifplay_open_bytes(data.as_ptr(), data.len(), &mut err).is_null());
        assert_eq!(GifplayError::NOT_GIF_FILE, err);
        assert!(gifplay_open_bytes(data.as_ptr(), 0, &mut err).is_null());
        assert_eq!(GifplayError::INVALID_BYTE_BUFFER, err);
        let path = CString::new("/nonexistent/file.gif").unwrap();
        assert!(gifplay_open_file(path.as_ptr(), 0, &mut err).is_null());
        assert_eq!(GifplayError::OPEN_FAILED, err);
    }
}

#[test]
fn render_loop() {
    let g = open_test_gif(2, gif::Repeat::Finite(0));
    let mut pixels = vec![RGBA8::default(); 2 * 2];
    unsafe {
        assert_eq!(2, gifplay_get_width(g));
        assert_eq!(2, gifplay_get_frame_count(g));
        assert_eq!(1, gifplay_get_loop_count(g));
        assert_eq!(100, gifplay_get_total_duration(g));
        assert_eq!(50, gifplay_get_frame_duration(g, 1));
        assert_eq!(-1, gifplay_get_frame_duration(g, 2));

        assert!(gifplay_render_next_frame(g, pixels.as_mut_ptr(), 2 * 4) >= 0);
        assert_eq!(RGBA8::new(255, 0, 0, 255), pixels[3]);
        assert_eq!(GIFPLAY_COMPLETED, gifplay_render_next_frame(g, pixels.as_mut_ptr(), 2 * 4));
        assert_eq!(RGBA8::new(0, 255, 0, 255), pixels[3]);
        assert!(gifplay_is_animation_completed(g));
        assert_eq!(GIFPLAY_COMPLETED, gifplay_render_next_frame(g, pixels.as_mut_ptr(), 2 * 4));
        assert_eq!(GifplayError::OK, gifplay_native_error_code(g));

        assert_eq!(GIFPLAY_FAILED, gifplay_render_next_frame(g, pixels.as_mut_ptr(), 4));
        assert_eq!(GifplayError::OK, gifplay_close(g));
    }
}

#[test]
fn rejected_options_keep_the_canvas() {
    let palette = [0, 0, 0, 255, 0, 0, 0, 255, 0];
    let mut data = vec![];
    {
        let mut enc = gif::Encoder::new(&mut data, 2, 2, &palette).unwrap();
        enc.write_frame(&gif::Frame::from_indexed_pixels(2, 2, vec![1; 4], None)).unwrap();
        let mut frame = gif::Frame::from_indexed_pixels(1, 1, vec![2], None);
        frame.left = 1;
        frame.top = 1;
        enc.write_frame(&frame).unwrap();
    }
    let mut err = GifplayError::OTHER;
    let mut pixels = vec![RGBA8::default(); 2 * 2];
    unsafe {
        let g = gifplay_open_bytes(data.as_ptr(), data.len(), &mut err);
        assert_eq!(GifplayError::OK, err);
        assert!(gifplay_render_next_frame(g, pixels.as_mut_ptr(), 2 * 4) >= 0);
        assert_eq!(GifplayError::INVALID_STATE, gifplay_set_options(g, 2, false));
        assert_eq!(2, gifplay_get_width(g));

        gifplay_render_next_frame(g, pixels.as_mut_ptr(), 2 * 4);
        assert_eq!(RGBA8::new(255, 0, 0, 255), pixels[0]);
        assert_eq!(RGBA8::new(0, 255, 0, 255), pixels[3]);
        assert_eq!(GifplayError::OK, gifplay_close(g));
    }
}

#[test]
fn strided_output() {
    let g = open_test_gif(1, gif::Repeat::Infinite);
    let mut pixels = vec![RGBA8::default(); 3 * 2];
    unsafe {
        assert_eq!(GifplayError::OK, gifplay_seek_to_frame(g, 0, pixels.as_mut_ptr(), 3 * 4));
        assert_eq!(RGBA8::new(255, 0, 0, 255), pixels[4]);
        assert_eq!(RGBA8::default(), pixels[2]);
        assert_eq!(GifplayError::OK, gifplay_close(g));
    }
}

#[test]
fn state_round_trip() {
    let g = open_test_gif(3, gif::Repeat::Infinite);
    let mut pixels = vec![RGBA8::default(); 4];
    let mut state = [0i64; 4];
    unsafe {
        assert_eq!(GifplayError::OK, gifplay_seek_to_time(g, 60, pixels.as_mut_ptr(), 8));
        assert_eq!(1, gifplay_get_current_frame_index(g));
        assert_eq!(GifplayError::OK, gifplay_save_state(g, &mut state));
        assert_eq!(2, state[0]);
        assert_eq!(-1, state[2]);
        assert_eq!(GifplayError::OK, gifplay_close(g));

        let g = open_test_gif(3, gif::Repeat::Infinite);
        let mut restored = vec![RGBA8::default(); 4];
        assert_eq!(50, gifplay_restore_state(g, &state, restored.as_mut_ptr(), 8));
        assert_eq!(pixels, restored);
        assert_eq!(GifplayError::OK, gifplay_close(g));
    }
}

#[test]
fn test_error_callback() {
    let g = open_test_gif(2, gif::Repeat::Infinite);
    unsafe extern "C" fn errcb(msg: *const c_char, user_data: *mut c_void) {
        let callback_msg = user_data.cast::<Option<String>>();
        *callback_msg = Some(CStr::from_ptr(msg).to_str().unwrap().to_string());
    }
    let mut callback_msg: Option<String> = None;
    let mut pixels = vec![RGBA8::default(); 4];
    unsafe {
        assert_eq!(GifplayError::OK, gifplay_set_error_message_callback(g, errcb, ptr::addr_of_mut!(callback_msg).cast()));
        assert_eq!(GifplayError::OK, gifplay_set_options(g, 2, false));
        assert_eq!(1, gifplay_get_width(g));
        assert!(gifplay_render_next_frame(g, pixels.as_mut_ptr(), 4) >= 0);
        assert_eq!(GifplayError::INVALID_STATE, gifplay_set_options(g, 1, false));
        assert_eq!(GifplayError::INVALID_STATE, gifplay_native_error_code(g));
        assert_eq!(GifplayError::INVALID_STATE, gifplay_set_speed_factor(g, -1.));
        assert_eq!(GifplayError::OK, gifplay_close(g));
    }
    assert!(callback_msg.unwrap().contains("speed"));
}

#[test]
fn comment_and_lengths() {
    let g = open_test_gif(2, gif::Repeat::Infinite);
    let mut buf = [1 as c_char; 8];
    unsafe {
        assert_eq!(0, gifplay_get_comment(g, buf.as_mut_ptr(), buf.len()));
        assert!(gifplay_get_source_length(g) > 0);
        assert!(gifplay_get_metadata_byte_count(g) > 0);
        assert_eq!(4, gifplay_get_allocation_byte_count(g));
        assert_eq!(-1, gifplay_restore_remainder(g));
        assert_eq!(GifplayError::OK, gifplay_close(g));
    }
}
