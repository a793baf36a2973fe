#[macro_use] extern crate clap;

use clap::{Arg, ArgAction, Command};
use gifplay::{Animation, Canvas, Context, RenderPipeline, Settings};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[cfg(feature = "png")]
mod png;

pub type BinResult<T, E = Box<dyn std::error::Error + Send + Sync>> = Result<T, E>;

fn main() {
    if let Err(e) = bin_main() {
        eprintln!("error: {e}");
        if let Some(e) = e.source() {
            eprintln!("error: {e}");
        }
        std::process::exit(1);
    }
}

fn bin_main() -> BinResult<()> {
    let matches = Command::new(crate_name!())
        .version(crate_version!())
        .about("Decodes and plays animated GIFs")
        .arg_required_else_help(true)
        .arg(Arg::new("sample")
            .long("sample")
            .short('s')
            .help("Down-sample by keeping every Nth pixel of every Nth row")
            .value_parser(value_parser!(u16).range(1..))
            .value_name("N")
            .default_value("1"))
        .arg(Arg::new("opaque")
            .long("opaque")
            .help("Ignore transparency; the background stays black")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("speed")
            .long("speed")
            .help("Playback speed multiplier")
            .value_parser(value_parser!(f32))
            .value_name("x")
            .default_value("1"))
        .arg(Arg::new("loops")
            .long("loops")
            .help("Override the number of loops from the file (0 is forever)")
            .value_parser(value_parser!(u32))
            .value_name("num"))
        .arg(Arg::new("play")
            .long("play")
            .help("Play in real time on a decode thread, printing each frame's timing")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("dump")
            .long("dump")
            .help("Write every frame of the first loop as PNG files to this directory")
            .value_parser(value_parser!(PathBuf))
            .value_name("dir"))
        .arg(Arg::new("FILE")
            .help("GIF file to open")
            .value_parser(value_parser!(PathBuf))
            .required(true))
        .get_matches_from(wild::args_os());

    let path = matches.get_one::<PathBuf>("FILE").ok_or("Missing file")?;
    let settings = Settings {
        sample_size: matches.get_one::<u16>("sample").copied().unwrap_or(1),
        is_opaque: matches.get_flag("opaque"),
    };
    let speed = matches.get_one::<f32>("speed").copied().unwrap_or(1.);

    let mut anim = Context::new().open_path(path)
        .map_err(|e| format!("Can't open {}: {e}", path.display()))?;
    anim.set_options(settings)?;
    anim.set_speed_factor(speed).map_err(|_| "Speed must be a positive number")?;
    if let Some(&loops) = matches.get_one::<u32>("loops") {
        anim.set_loop_count(loops);
    }

    print_info(&anim);

    if matches.get_flag("play") {
        play(anim)?;
    } else {
        render_loop(anim, matches.get_one::<PathBuf>("dump").map(PathBuf::as_path))?;
    }
    Ok(())
}

fn print_info(anim: &Animation) {
    let meta = anim.metadata();
    println!("size: {}x{}", meta.width, meta.height);
    println!("frames: {}", meta.frame_count);
    println!("duration: {}ms", meta.duration.as_millis());
    match meta.loop_count {
        0 => println!("loops: forever"),
        n => println!("loops: {n}"),
    }
    if let Some(comment) = &meta.comment {
        println!("comment: {comment}");
    }
    if let Some(len) = meta.source_length {
        println!("file size: {len} bytes");
    }
    println!("memory: {} bytes of pixels, {} bytes of metadata", meta.allocation_byte_count, meta.metadata_byte_count);
}

/// Plays one loop, or until the animation completes
fn play(anim: Animation) -> BinResult<()> {
    let frame_count = anim.frame_count();
    let canvas = anim.new_canvas()?;
    let mut pipeline = RenderPipeline::start(anim, canvas)?;
    let start = Instant::now();
    for n in 0..frame_count {
        let Some(frame) = pipeline.next_frame()? else { break };
        match frame.delay() {
            Some(delay) => println!("{:>6}ms  frame {n}, next in {}ms", start.elapsed().as_millis(), delay.as_millis()),
            None => println!("{:>6}ms  frame {n}, last", start.elapsed().as_millis()),
        }
    }
    let (anim, _) = pipeline.stop()?;
    println!("stopped at frame {}, loop {}", anim.current_frame_index(), anim.current_loop_index());
    Ok(())
}

/// Draws every frame of one loop as fast as possible
fn render_loop(mut anim: Animation, dump: Option<&Path>) -> BinResult<()> {
    if let Some(dir) = dump {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("Can't create {}: {e}", dir.display()))?;
    }
    let mut canvas = anim.new_canvas()?;
    let start = Instant::now();
    for n in 0..anim.frame_count() {
        let delay = anim.render_next_frame(&mut canvas)?;
        if let Some(dir) = dump {
            let path = write_png(dir, n, &canvas)?;
            println!("frame {n}: {}", path.display());
        } else {
            println!("frame {n}: {}ms", delay.unwrap_or_default().as_millis());
        }
    }
    println!("rendered {} frames in {}ms", anim.frame_count(), start.elapsed().as_millis());
    Ok(())
}

#[cfg(feature = "png")]
fn write_png(dir: &Path, index: usize, canvas: &Canvas) -> BinResult<PathBuf> {
    png::write_frame(dir, index, canvas)
}

#[cfg(not(feature = "png"))]
fn write_png(_: &Path, _: usize, _: &Canvas) -> BinResult<PathBuf> {
    Err("Built without PNG support".into())
}
