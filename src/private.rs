// private.rs
//
// Copyright (c) 2020  Douglas Lau
//
//! Private module for top-level items
use crate::composite::{Animation, Compositor};
use crate::cursor::ByteCursor;
use crate::error::{Error, Result};
use crate::scan::{Blocks, Frames};
use std::fs::File;
use std::io::{self, BufReader, Cursor, ErrorKind, Read, Seek};
use std::path::Path;

/// Length of the animation marker pattern: a graphic control extension
/// terminator sequence followed by an image separator or another extension
const MARKER_SZ: usize = 10;

/// Chunk size for probing files
const PROBE_CHUNK_SZ: usize = 64 * 1024;

/// Check whether a GIF file is animated.
///
/// Scans the file in bounded chunks, counting graphic control extensions
/// which are followed by an image block or another extension; a GIF with
/// at least two of them is animated.  Returns `false` when the file
/// cannot be read.
pub fn is_animated<P: AsRef<Path>>(path: P) -> bool {
    probe_file(path.as_ref()).unwrap_or(false)
}

/// Check whether in-memory GIF data is animated.
///
/// Same check as [is_animated](fn.is_animated.html), over a full buffer.
pub fn is_animated_data(data: &[u8]) -> bool {
    count_markers(data) > 1
}

/// Probe a file for animation markers, chunk by chunk
fn probe_file(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buf = vec![0; PROBE_CHUNK_SZ];
    let mut start = 0;
    let mut count = 0;
    loop {
        let n = fill(&mut file, &mut buf[start..])?;
        if n == 0 {
            return Ok(count > 1);
        }
        let len = start + n;
        count += count_markers(&buf[..len]);
        if count > 1 {
            return Ok(true);
        }
        // carry the tail so markers straddling a chunk boundary count
        let keep = len.min(MARKER_SZ - 1);
        buf.copy_within(len - keep..len, 0);
        start = keep;
    }
}

/// Fill a buffer from a reader, stopping at end of input
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut len = 0;
    while len < buf.len() {
        match reader.read(&mut buf[len..]) {
            Ok(0) => break, // EOF
            Ok(n) => len += n,
            Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(len)
}

/// Count non-overlapping animation markers in a buffer
fn count_markers(buf: &[u8]) -> usize {
    let mut count = 0;
    let mut i = 0;
    while i + MARKER_SZ <= buf.len() {
        if buf[i] == 0x00
            && buf[i + 1] == 0x21
            && buf[i + 2] == 0xF9
            && buf[i + 3] == 0x04
            && buf[i + 8] == 0x00
            && (buf[i + 9] == 0x2C || buf[i + 9] == 0x21)
        {
            count += 1;
            i += MARKER_SZ;
        } else {
            i += 1;
        }
    }
    count
}

/// Animated GIF frame extractor
///
/// Walks the GIF block structure once, binds each graphic control
/// extension to the image block it governs, and composites every frame
/// onto a canvas sized to the largest frame.  A fresh extractor is
/// built per input; nothing is shared between extractions.
///
/// ## Example: extract frames from data
/// ```
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # let gif = &[
/// #   0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00,
/// #   0x02, 0x00, 0x91, 0x00, 0x00, 0xFF, 0x00, 0x00,
/// #   0x00, 0xFF, 0x00, 0x00, 0x00, 0xFF, 0x00, 0x00,
/// #   0x00, 0x21, 0xF9, 0x04, 0x00, 0x05, 0x00, 0x00,
/// #   0x00, 0x2C, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00,
/// #   0x02, 0x00, 0x00, 0x02, 0x04, 0x04, 0x41, 0x10,
/// #   0x05, 0x00, 0x21, 0xF9, 0x04, 0x00, 0x05, 0x00,
/// #   0x00, 0x00, 0x2C, 0x00, 0x00, 0x00, 0x00, 0x02,
/// #   0x00, 0x02, 0x00, 0x00, 0x02, 0x04, 0x0C, 0xC3,
/// #   0x30, 0x05, 0x00, 0x3B,
/// # ][..];
/// let animation = gifex::Extractor::from_data(gif)?.extract()?;
/// for frame in animation.frames() {
///     println!("{}x{}, {} cs", frame.width(), frame.height(),
///         frame.delay_time_cs());
/// }
/// # Ok(())
/// # }
/// ```
pub struct Extractor<R: Read + Seek> {
    /// Reader for input data
    reader: R,
    /// Return frames as decoded, without compositing
    original_frames: bool,
    /// Maximum frame size, in pixels
    max_image_sz: Option<usize>,
}

impl Extractor<BufReader<File>> {
    /// Create an extractor for a GIF file.
    ///
    /// Fails with [NotAnimated](enum.Error.html#variant.NotAnimated) when
    /// the file is a still GIF, is not a GIF, or cannot be read.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if !is_animated(&path) {
            return Err(Error::NotAnimated);
        }
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<'a> Extractor<Cursor<&'a [u8]>> {
    /// Create an extractor for in-memory GIF data.
    ///
    /// Fails with [NotAnimated](enum.Error.html#variant.NotAnimated) when
    /// the data is a still GIF or not a GIF.
    pub fn from_data(data: &'a [u8]) -> Result<Self> {
        if !is_animated_data(data) {
            return Err(Error::NotAnimated);
        }
        Ok(Self::new(Cursor::new(data)))
    }
}

impl<R: Read + Seek> Extractor<R> {
    /// Create a new extractor
    fn new(reader: R) -> Self {
        Extractor {
            reader,
            original_frames: false,
            max_image_sz: Some(1 << 25),
        }
    }

    /// Return frames as decoded, with a transparent background, instead
    /// of compositing each one onto the previous frames.
    pub fn original_frames(mut self, original_frames: bool) -> Self {
        self.original_frames = original_frames;
        self
    }

    /// Set the maximum frame size (in pixels) to allow for extraction.
    pub fn max_image_sz(mut self, max_image_sz: Option<usize>) -> Self {
        self.max_image_sz = max_image_sz;
        self
    }

    /// Extract all frames.
    ///
    /// Any parsing or decoding error is fatal: a frame's composite
    /// depends on every frame before it, so there are no partial results.
    pub fn extract(self) -> Result<Animation> {
        let cursor = ByteCursor::new(self.reader)?;
        let mut frames = Frames::new(Blocks::new(cursor, self.max_image_sz))?;
        let mut sources = vec![];
        for source in &mut frames {
            sources.push(source?);
        }
        let preamble = frames.into_preamble();
        Compositor::new(preamble, self.original_frames).extract(sources)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::{build_gif, TestFrame, PALETTE};

    const MARKER: [u8; 10] =
        [0x00, 0x21, 0xF9, 0x04, 0x01, 0x02, 0x03, 0x04, 0x00, 0x2C];

    #[test]
    fn marker_counting() {
        let mut buf = vec![0xAA; 40];
        assert!(!is_animated_data(&buf));
        buf[4..14].copy_from_slice(&MARKER);
        assert_eq!(count_markers(&buf), 1);
        assert!(!is_animated_data(&buf));
        buf[20..30].copy_from_slice(&MARKER);
        assert_eq!(count_markers(&buf), 2);
        assert!(is_animated_data(&buf));
        // extension follow byte counts too
        buf[29] = 0x21;
        assert!(is_animated_data(&buf));
        // anything else does not
        buf[29] = 0x3B;
        assert!(!is_animated_data(&buf));
    }

    #[test]
    fn single_frame_rejected() {
        let gif =
            build_gif(2, 2, &PALETTE, &[TestFrame::solid(2, 2, 0).delay(5)]);
        assert!(!is_animated_data(&gif));
        assert!(matches!(
            Extractor::from_data(&gif),
            Err(Error::NotAnimated)
        ));
    }

    #[test]
    fn extract_from_data() {
        let gif = build_gif(
            100,
            100,
            &PALETTE,
            &[
                TestFrame::solid(100, 100, 0),
                TestFrame::solid(100, 100, 1).delay(10).disposal(2),
                TestFrame::solid(50, 50, 2).delay(20).disposal(1).at(10, 10),
            ],
        );
        assert!(is_animated_data(&gif));
        let animation = Extractor::from_data(&gif).unwrap().extract().unwrap();
        assert_eq!(animation.frame_count(), 3);
        assert_eq!(animation.total_duration_cs(), 30);
        let delays: Vec<_> = animation
            .frames()
            .iter()
            .map(|f| f.delay_time_cs())
            .collect();
        assert_eq!(delays, vec![0, 10, 20]);
    }

    #[test]
    fn extract_from_file() {
        let gif = build_gif(
            4,
            4,
            &PALETTE,
            &[
                TestFrame::solid(4, 4, 0).delay(5),
                TestFrame::solid(4, 4, 1).delay(5),
            ],
        );
        let path = std::env::temp_dir().join("gifex_extract_test.gif");
        std::fs::write(&path, &gif).unwrap();
        assert!(is_animated(&path));
        let animation = Extractor::open(&path).unwrap().extract().unwrap();
        assert_eq!(animation.frame_count(), 2);
        assert_eq!(animation.total_duration_cs(), 10);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn unreadable_file() {
        let path = std::env::temp_dir().join("gifex_no_such_file.gif");
        assert!(!is_animated(&path));
        assert!(matches!(Extractor::open(&path), Err(Error::NotAnimated)));
    }

    #[test]
    fn marker_straddles_chunk_boundary() {
        // one marker within the first chunk, one across the boundary
        let mut buf = vec![0xAA; PROBE_CHUNK_SZ + 100];
        buf[100..110].copy_from_slice(&MARKER);
        let split = PROBE_CHUNK_SZ - 6;
        buf[split..split + 10].copy_from_slice(&MARKER);
        let path = std::env::temp_dir().join("gifex_probe_test.bin");
        std::fs::write(&path, &buf).unwrap();
        assert!(is_animated(&path));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn frame_size_cap() {
        let gif = build_gif(
            100,
            100,
            &PALETTE,
            &[
                TestFrame::solid(100, 100, 0).delay(5),
                TestFrame::solid(100, 100, 1).delay(5),
            ],
        );
        let result = Extractor::from_data(&gif)
            .unwrap()
            .max_image_sz(Some(1000))
            .extract();
        assert!(matches!(result, Err(Error::TooLargeImage)));
    }
}
