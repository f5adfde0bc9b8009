// composite.rs
//
// Copyright (c) 2020  Douglas Lau
//
use crate::block::{ColorTableConfig, DisposalMethod};
use crate::error::Result;
use crate::scan::{FrameSource, Preamble};
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbaImage};

/// One extracted frame: the composited image plus its timing and placement
#[derive(Debug)]
pub struct Frame {
    image: RgbaImage,
    delay_time_cs: u16,
    left: u16,
    top: u16,
    width: u16,
    height: u16,
    disposal: DisposalMethod,
    transparent_color: Option<u8>,
    interlaced: bool,
    local_color_table: ColorTableConfig,
}

impl Frame {
    /// Get the composited frame image
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }
    /// Take ownership of the composited frame image
    pub fn into_image(self) -> RgbaImage {
        self.image
    }
    /// Get the frame delay in centiseconds (hundredths of a second)
    pub fn delay_time_cs(&self) -> u16 {
        self.delay_time_cs
    }
    /// Get the frame offset from the left of the canvas
    pub fn left(&self) -> u16 {
        self.left
    }
    /// Get the frame offset from the top of the canvas
    pub fn top(&self) -> u16 {
        self.top
    }
    /// Get the declared frame width
    pub fn width(&self) -> u16 {
        self.width
    }
    /// Get the declared frame height
    pub fn height(&self) -> u16 {
        self.height
    }
    pub fn disposal_method(&self) -> DisposalMethod {
        self.disposal
    }
    /// Get the transparent color index, if transparency is enabled
    pub fn transparent_color(&self) -> Option<u8> {
        self.transparent_color
    }
    pub fn interlaced(&self) -> bool {
        self.interlaced
    }
    /// Get the local color table configuration
    pub fn local_color_table(&self) -> ColorTableConfig {
        self.local_color_table
    }
}

/// All frames extracted from an animated GIF, in stream order
#[derive(Debug)]
pub struct Animation {
    frames: Vec<Frame>,
    width: u32,
    height: u32,
    screen_width: u16,
    screen_height: u16,
    total_duration_cs: u32,
    loop_count: Option<u16>,
    comments: Vec<String>,
}

impl Animation {
    /// Get the extracted frames
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
    /// Take ownership of the extracted frames
    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
    /// Get the number of extracted frames
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
    /// Get the canvas width: the maximum width of all frames
    pub fn width(&self) -> u32 {
        self.width
    }
    /// Get the canvas height: the maximum height of all frames
    pub fn height(&self) -> u32 {
        self.height
    }
    /// Get the declared logical screen width
    pub fn screen_width(&self) -> u16 {
        self.screen_width
    }
    /// Get the declared logical screen height
    pub fn screen_height(&self) -> u16 {
        self.screen_height
    }
    /// Get the sum of all frame delays, in centiseconds
    pub fn total_duration_cs(&self) -> u32 {
        self.total_duration_cs
    }
    /// Get the animation loop count (zero means loop forever)
    pub fn loop_count(&self) -> Option<u16> {
        self.loop_count
    }
    /// Get the comment extension text
    pub fn comments(&self) -> &[String] {
        &self.comments
    }
}

/// Compositor for the extracted frames.
///
/// Each frame record is synthesized into a standalone still image and
/// decoded through the image codec, then layered onto a canvas according
/// to its disposal method.  Compositing is strictly sequential: a frame
/// which keeps the previous frame reads the previous composite.
pub(crate) struct Compositor {
    preamble: Preamble,
    original_frames: bool,
    /// Canvas size: maximum size of all frames, which may differ from the
    /// logical screen
    width: u32,
    height: u32,
    /// Previous composited frame
    previous: Option<RgbaImage>,
}

impl Compositor {
    /// Create a new compositor
    pub fn new(preamble: Preamble, original_frames: bool) -> Self {
        Compositor {
            preamble,
            original_frames,
            width: 0,
            height: 0,
            previous: None,
        }
    }

    /// Composite all frames, in stream order
    pub fn extract(mut self, sources: Vec<FrameSource>) -> Result<Animation> {
        self.width = sources.iter().map(|s| s.width).max().unwrap_or(0).into();
        self.height = sources.iter().map(|s| s.height).max().unwrap_or(0).into();
        let mut frames = Vec::with_capacity(sources.len());
        let mut total_duration_cs = 0;
        for (index, source) in sources.iter().enumerate() {
            debug!(
                "  frame  : {:?} delay {:?} at {:?},{:?}",
                index, source.delay_time_cs, source.left, source.top
            );
            total_duration_cs += source.delay_time_cs as u32;
            let image = self.composite(source, index)?;
            frames.push(Frame {
                image,
                delay_time_cs: source.delay_time_cs,
                left: source.left,
                top: source.top,
                width: source.width,
                height: source.height,
                disposal: source.disposal,
                transparent_color: source.transparent_color,
                interlaced: source.interlaced,
                local_color_table: source.local_color_table,
            });
        }
        Ok(Animation {
            frames,
            width: self.width,
            height: self.height,
            screen_width: self.preamble.screen.screen_width(),
            screen_height: self.preamble.screen.screen_height(),
            total_duration_cs,
            loop_count: self.preamble.loop_count,
            comments: self.preamble.comments,
        })
    }

    /// Synthesize a standalone still image for one frame: header, graphic
    /// control extension, image block and trailer
    fn synthesize_still(&self, source: &FrameSource) -> Vec<u8> {
        let header = &self.preamble.header;
        let control_len = source.graphic_control.as_ref().map_or(0, Vec::len);
        let mut buf = Vec::with_capacity(
            header.len() + control_len + source.image_block.len() + 1,
        );
        buf.extend_from_slice(header);
        if let Some(control) = &source.graphic_control {
            buf.extend_from_slice(control);
        }
        buf.extend_from_slice(&source.image_block);
        buf.push(0x3B);
        buf
    }

    /// Composite one frame onto the canvas
    fn composite(
        &mut self,
        source: &FrameSource,
        index: usize,
    ) -> Result<RgbaImage> {
        let still = self.synthesize_still(source);
        let decoded = image::load_from_memory_with_format(&still, ImageFormat::Gif)?
            .to_rgba8();
        if self.original_frames {
            return Ok(decoded);
        }
        // a kept frame starts from the previous composite; any other
        // disposal starts from a transparent canvas
        let mut canvas = match (&self.previous, source.disposal) {
            (Some(previous), DisposalMethod::Keep) if index > 0 => {
                previous.clone()
            }
            _ => RgbaImage::new(self.width, self.height),
        };
        let decoded = if decoded.dimensions() != (self.width, self.height) {
            imageops::resize(&decoded, self.width, self.height, FilterType::Triangle)
        } else {
            decoded
        };
        // transparent source pixels leave the canvas untouched
        imageops::overlay(
            &mut canvas,
            &decoded,
            source.left as i64,
            source.top as i64,
        );
        self.previous = Some(canvas.clone());
        Ok(canvas)
    }
}
