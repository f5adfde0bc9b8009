// main.rs      gifex command
//
// Copyright (c) 2020  Douglas Lau
//
#![forbid(unsafe_code)]

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use gifex::block::DisposalMethod;
use gifex::{Animation, Extractor};
use std::error::Error;
use std::ffi::OsStr;
use std::io::Write;
use std::path::PathBuf;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Crate version
const VERSION: &'static str = std::env!("CARGO_PKG_VERSION");

/// Main entry point
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::builder().format_timestamp(None).init();
    let mut out = StandardStream::stdout(ColorChoice::Always);
    match create_app().get_matches().subcommand() {
        ("show", Some(matches)) => show(&mut out, matches)?,
        ("split", Some(matches)) => split(matches)?,
        _ => panic!(),
    }
    out.reset()?;
    Ok(())
}

/// Create clap App
fn create_app() -> App<'static, 'static> {
    App::new("gifex")
        .version(VERSION)
        .setting(AppSettings::GlobalVersion)
        .about("Animated GIF frame extractor")
        .setting(AppSettings::ArgRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("show")
                .about("Show extracted frame table")
                .arg(
                    Arg::with_name("files")
                        .required(true)
                        .min_values(1)
                        .help("input file(s)"),
                ),
        )
        .subcommand(
            SubCommand::with_name("split")
                .about("Split frames into PNG files")
                .arg(Arg::with_name("file").required(true).help("input file"))
                .arg(
                    Arg::with_name("dir")
                        .short("o")
                        .long("out-dir")
                        .takes_value(true)
                        .help("output directory"),
                )
                .arg(
                    Arg::with_name("original")
                        .long("original")
                        .help("write frames as decoded, without compositing"),
                ),
        )
}

/// Handle show subcommand
fn show(
    out: &mut StandardStream,
    matches: &ArgMatches,
) -> Result<(), Box<dyn Error>> {
    let values = matches.values_of_os("files").unwrap();
    for path in values {
        show_file(out, path)?;
    }
    Ok(())
}

/// Show the frame table of one GIF file
fn show_file(
    out: &mut StandardStream,
    path: &OsStr,
) -> Result<(), Box<dyn Error>> {
    let mut magenta = ColorSpec::new();
    magenta.set_fg(Some(Color::Magenta));
    let mut yellow = ColorSpec::new();
    yellow.set_fg(Some(Color::Yellow)).set_intense(true);
    let mut cyan = ColorSpec::new();
    cyan.set_fg(Some(Color::Cyan)).set_intense(true);
    let mut bold = ColorSpec::new();
    bold.set_fg(Some(Color::White))
        .set_intense(true)
        .set_bold(true);
    let animation = Extractor::open(path)?.extract()?;
    let frame_digits = digits(animation.frame_count()).max(3);
    let size_digits =
        4.max(1 + digits(animation.width() as usize)
            + digits(animation.height() as usize));
    out.set_color(&magenta)?;
    writeln!(out, "{:?}", path)?;
    out.set_color(&bold)?;
    write!(
        out,
        "{}x{}, frames: {}, duration: {:.2}",
        animation.width(),
        animation.height(),
        animation.frame_count(),
        animation.total_duration_cs() as f32 / 100f32
    )?;
    if let Some(c) = animation.loop_count() {
        write!(out, ", repeat: ")?;
        if c == 0 {
            write!(out, "∞")?;
        } else {
            write!(out, "{}", c)?;
        }
    }
    writeln!(out)?;
    out.set_color(&cyan)?;
    for c in animation.comments() {
        for l in c.split('\n') {
            let l = l.trim();
            if l.len() > 0 {
                writeln!(out, "  # {}", l)?;
            }
        }
    }
    out.set_color(&yellow)?;
    write!(out, "{:>w$}", "Fr#", w = frame_digits)?;
    write!(out, "  Delay Disp")?;
    write!(out, " {:>w$}", "Size", w = size_digits)?;
    write!(out, " {:>w$}", "X,Y", w = size_digits)?;
    writeln!(out, " Trn")?;
    for (n, f) in animation.frames().iter().enumerate() {
        show_frame(f, out, n, frame_digits, size_digits)?;
    }
    Ok(())
}

/// Show one frame of an extracted animation
fn show_frame(
    frame: &gifex::Frame,
    out: &mut StandardStream,
    number: usize,
    frame_digits: usize,
    size_digits: usize,
) -> Result<(), Box<dyn Error>> {
    let mut dflt = ColorSpec::new();
    dflt.set_fg(Some(Color::White));
    let mut bold = ColorSpec::new();
    bold.set_fg(Some(Color::White))
        .set_intense(true)
        .set_bold(true);
    let mut red = ColorSpec::new();
    red.set_fg(Some(Color::Red)).set_intense(true);
    out.set_color(&bold)?;
    write!(out, "{:>w$}", number, w = frame_digits)?;
    let d = frame.delay_time_cs();
    if d == 0 {
        out.set_color(&dflt)?;
    }
    write!(out, " {:6.2}", d as f32 / 100f32)?;
    let d = match frame.disposal_method() {
        DisposalMethod::NoAction => "none",
        DisposalMethod::Keep => "keep",
        DisposalMethod::Background => "bg",
        DisposalMethod::Previous => "prev",
        _ => "res",
    };
    out.set_color(match d {
        "none" => &dflt,
        "res" => &red,
        _ => &bold,
    })?;
    write!(out, " {:>4}", d)?;
    out.set_color(&dflt)?;
    write!(
        out,
        " {:>w$}",
        &format!("{}x{}", frame.width(), frame.height()),
        w = size_digits
    )?;
    if frame.left() == 0 && frame.top() == 0 {
        out.set_color(&dflt)?;
    } else {
        out.set_color(&bold)?;
    }
    write!(
        out,
        " {:>w$}",
        &format!("{},{}", frame.left(), frame.top()),
        w = size_digits
    )?;
    let tc = match frame.transparent_color() {
        Some(tc) => format!("{}", tc),
        None => "-".to_string(),
    };
    if tc == "-" {
        out.set_color(&dflt)?;
    } else {
        out.set_color(&bold)?;
    }
    writeln!(out, " {:>3}", tc)?;
    Ok(())
}

/// Handle split subcommand
fn split(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let path = matches.value_of_os("file").unwrap();
    let dir = matches
        .value_of_os("dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let animation = Extractor::open(path)?
        .original_frames(matches.is_present("original"))
        .extract()?;
    std::fs::create_dir_all(&dir)?;
    write_frames(&animation, &dir)?;
    Ok(())
}

/// Write one PNG file per extracted frame
fn write_frames(
    animation: &Animation,
    dir: &PathBuf,
) -> Result<(), Box<dyn Error>> {
    let frame_digits = digits(animation.frame_count()).max(3);
    for (n, frame) in animation.frames().iter().enumerate() {
        let name = format!("frame_{:0w$}.png", n, w = frame_digits);
        let out = dir.join(&name);
        frame
            .image()
            .save_with_format(&out, image::ImageFormat::Png)?;
        println!(
            "{}  {:.2}s",
            out.display(),
            frame.delay_time_cs() as f32 / 100f32
        );
    }
    Ok(())
}

/// Calculate digits in a number
fn digits<T: Into<usize>>(v: T) -> usize {
    let v = v.into();
    match v {
        0..=9 => 1,
        10..=99 => 2,
        100..=999 => 3,
        1000..=9999 => 4,
        _ => 5,
    }
}
