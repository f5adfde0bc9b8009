// block.rs
//
// Copyright (c) 2020  Douglas Lau
//
use crate::cursor::bit_field;

const CHANNELS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorTableExistence {
    Absent,
    Present,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorTableOrdering {
    NotSorted,
    Sorted,
}

/// Configuration of a global or local color table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorTableConfig {
    existence: ColorTableExistence,
    ordering: ColorTableOrdering,
    table_len: usize, // must be between 2...256
}

impl Default for ColorTableConfig {
    fn default() -> Self {
        let existence = ColorTableExistence::Absent;
        let ordering = ColorTableOrdering::NotSorted;
        let table_len = 2;
        ColorTableConfig {
            existence,
            ordering,
            table_len,
        }
    }
}

impl ColorTableConfig {
    /// Decode a color table configuration from packed flags.
    ///
    /// `present` / `sorted` / `exponent` are the flag bits as laid out in
    /// both the logical screen descriptor and the image descriptor; a
    /// table holds `2 ^ (exponent + 1)` colors.
    fn from_flags(present: u8, sorted: u8, exponent: u8) -> Self {
        let existence = if present != 0 {
            ColorTableExistence::Present
        } else {
            ColorTableExistence::Absent
        };
        let ordering = if sorted != 0 {
            ColorTableOrdering::Sorted
        } else {
            ColorTableOrdering::NotSorted
        };
        let table_len = 2 << (exponent as usize);
        ColorTableConfig {
            existence,
            ordering,
            table_len,
        }
    }
    pub fn existence(&self) -> ColorTableExistence {
        self.existence
    }
    pub fn ordering(&self) -> ColorTableOrdering {
        self.ordering
    }
    /// Get the number of color entries
    pub fn len(&self) -> usize {
        match self.existence {
            ColorTableExistence::Absent => 0,
            ColorTableExistence::Present => self.table_len,
        }
    }
    /// Get the size of the table, in bytes
    pub fn size_bytes(&self) -> usize {
        self.len() * CHANNELS
    }
}

/// Disposal method for a frame, declared by its graphic control extension
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DisposalMethod {
    /// No disposal specified
    NoAction,
    /// Do not dispose; the frame remains on the canvas
    Keep,
    /// Restore the frame area to the background color
    Background,
    /// Restore the frame area to the previous frame
    Previous,
    /// Reserved disposal values
    Reserved(u8),
}

impl Default for DisposalMethod {
    fn default() -> Self {
        DisposalMethod::NoAction
    }
}

impl From<u8> for DisposalMethod {
    fn from(n: u8) -> Self {
        use self::DisposalMethod::*;
        match n & 0b0111 {
            0 => NoAction,
            1 => Keep,
            2 => Background,
            3 => Previous,
            _ => Reserved(n),
        }
    }
}

/// Logical screen descriptor block
#[derive(Debug, Default, Clone)]
pub struct LogicalScreenDesc {
    screen_width: u16,
    screen_height: u16,
    flags: u8,
    background_color_idx: u8, // index into global color table
    pixel_aspect_ratio: u8,
}

impl LogicalScreenDesc {
    pub fn with_screen_width(mut self, screen_width: u16) -> Self {
        self.screen_width = screen_width;
        self
    }
    pub fn screen_width(&self) -> u16 {
        self.screen_width
    }
    pub fn with_screen_height(mut self, screen_height: u16) -> Self {
        self.screen_height = screen_height;
        self
    }
    pub fn screen_height(&self) -> u16 {
        self.screen_height
    }
    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }
    pub fn flags(&self) -> u8 {
        self.flags
    }
    pub fn color_resolution(&self) -> u16 {
        2 << bit_field(self.flags, 1, 3) as u16
    }
    pub fn color_table_config(&self) -> ColorTableConfig {
        ColorTableConfig::from_flags(
            bit_field(self.flags, 0, 1),
            bit_field(self.flags, 4, 1),
            bit_field(self.flags, 5, 3),
        )
    }
    pub fn with_background_color_idx(mut self, background_color_idx: u8) -> Self {
        self.background_color_idx = background_color_idx;
        self
    }
    pub fn background_color_idx(&self) -> u8 {
        self.background_color_idx
    }
    pub fn with_pixel_aspect_ratio(mut self, pixel_aspect_ratio: u8) -> Self {
        self.pixel_aspect_ratio = pixel_aspect_ratio;
        self
    }
    pub fn pixel_aspect_ratio(&self) -> u8 {
        self.pixel_aspect_ratio
    }
}

/// Graphic control extension block
#[derive(Debug, Default, Clone)]
pub struct GraphicControl {
    flags: u8,
    delay_time_cs: u16, // delay in centiseconds (hundredths of a second)
    transparent_color_idx: u8,
}

impl GraphicControl {
    pub fn set_flags(&mut self, flags: u8) {
        self.flags = flags;
    }
    pub fn flags(&self) -> u8 {
        self.flags
    }
    pub fn disposal_method(&self) -> DisposalMethod {
        bit_field(self.flags, 3, 3).into()
    }
    pub fn user_input(&self) -> bool {
        bit_field(self.flags, 6, 1) != 0
    }
    pub fn delay_time_cs(&self) -> u16 {
        self.delay_time_cs
    }
    pub fn set_delay_time_cs(&mut self, delay_time_cs: u16) {
        self.delay_time_cs = delay_time_cs;
    }
    /// Get the transparent color index, if transparency is enabled
    pub fn transparent_color(&self) -> Option<u8> {
        if bit_field(self.flags, 7, 1) != 0 {
            Some(self.transparent_color_idx)
        } else {
            None
        }
    }
    pub fn set_transparent_color_idx(&mut self, transparent_color_idx: u8) {
        self.transparent_color_idx = transparent_color_idx;
    }
}

/// Comment extension block
#[derive(Debug, Default)]
pub struct Comment {
    comments: Vec<Vec<u8>>, // ascii only comments recommended
}

impl Comment {
    pub fn add_comment(&mut self, b: &[u8]) {
        assert!(b.len() < 256);
        self.comments.push(b.to_vec());
    }
    pub fn comments(&self) -> &Vec<Vec<u8>> {
        &self.comments
    }
}

/// Application extension block
#[derive(Debug, Default)]
pub struct Application {
    app_data: Vec<Vec<u8>>, // sequence of sub-blocks
}

impl Application {
    fn is_looping(app_id: &[u8]) -> bool {
        app_id == b"NETSCAPE2.0" || app_id == b"ANIMEXTS1.0"
    }
    pub fn add_app_data(&mut self, b: &[u8]) {
        assert!(b.len() < 256);
        self.app_data.push(b.to_vec());
    }
    pub fn app_data(&self) -> &Vec<Vec<u8>> {
        &self.app_data
    }
    /// Get the animation loop count, if this is a looping extension
    pub fn loop_count(&self) -> Option<u16> {
        // NOTE: this block must follow immediately after GlobalColorTable
        //       (or LogicalScreenDesc if there is no GlobalColorTable).
        let d = &self.app_data;
        let exists = d.len() == 2 &&            // 2 sub-blocks
                     Self::is_looping(&d[0]) && // app ID / auth code
                     d[1].len() == 3 &&         // app data sub-block length
                     d[1][0] == 1; // sub-block ID
        if exists {
            // Number of times to loop animation (zero means loop forever)
            let c = (d[1][1] as u16) << 8 | d[1][2] as u16;
            Some(c)
        } else {
            None
        }
    }
}

/// Image descriptor block
#[derive(Debug, Default, Clone)]
pub struct ImageDesc {
    left: u16,
    top: u16,
    width: u16,
    height: u16,
    flags: u8,
}

impl ImageDesc {
    pub fn with_left(mut self, left: u16) -> Self {
        self.left = left;
        self
    }
    pub fn left(&self) -> u16 {
        self.left
    }
    pub fn with_top(mut self, top: u16) -> Self {
        self.top = top;
        self
    }
    pub fn top(&self) -> u16 {
        self.top
    }
    pub fn with_width(mut self, width: u16) -> Self {
        self.width = width;
        self
    }
    pub fn width(&self) -> u16 {
        self.width
    }
    pub fn with_height(mut self, height: u16) -> Self {
        self.height = height;
        self
    }
    pub fn height(&self) -> u16 {
        self.height
    }
    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }
    pub fn flags(&self) -> u8 {
        self.flags
    }
    pub fn interlaced(&self) -> bool {
        bit_field(self.flags, 1, 1) != 0
    }
    pub fn color_table_config(&self) -> ColorTableConfig {
        ColorTableConfig::from_flags(
            bit_field(self.flags, 0, 1),
            bit_field(self.flags, 2, 1),
            bit_field(self.flags, 5, 3),
        )
    }
    /// Get the frame size, in pixels
    pub fn image_sz(&self) -> usize {
        self.width as usize * self.height as usize
    }
}
