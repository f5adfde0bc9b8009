// scan.rs
//
// Copyright (c) 2020  Douglas Lau
//
use crate::block::*;
use crate::cursor::ByteCursor;
use crate::error::{Error, Result};
use std::io::{Read, Seek};

/// Block signature bytes
const EXTENSION: u8 = 0x21; // '!'
const IMAGE_SEPARATOR: u8 = 0x2C; // ','
const TRAILER: u8 = 0x3B; // ';'

/// Extension label bytes
const GRAPHIC_CONTROL: u8 = 0xF9;
const COMMENT: u8 = 0xFE;
const APPLICATION: u8 = 0xFF;

/// Blocks at the start of the file, before any frame
#[derive(Debug, Default)]
pub(crate) struct Preamble {
    /// Raw header range: signature, logical screen descriptor and global
    /// color table.  Reused verbatim as the header of every synthesized
    /// still image.
    pub header: Vec<u8>,
    /// Decoded logical screen descriptor
    pub screen: LogicalScreenDesc,
    /// Loop count from a looping application extension
    pub loop_count: Option<u16>,
    /// Comment extension text
    pub comments: Vec<String>,
}

/// One raw block with its captured byte range, where needed downstream
#[derive(Debug)]
pub(crate) enum RawBlock {
    /// Decoded graphic control extension plus its full byte range
    GraphicControl(GraphicControl, Vec<u8>),
    Comment(Comment),
    Application(Application),
    /// Extension with an unrecognized label; consumed, not interpreted
    Unknown,
    /// Decoded image descriptor plus the full image block byte range
    /// (descriptor, optional local color table and image data sub-blocks)
    Image(ImageDesc, Vec<u8>),
}

/// Scanner for the raw blocks of a GIF stream
pub(crate) struct Blocks<R: Read + Seek> {
    cursor: ByteCursor<R>,
    max_image_sz: Option<usize>,
}

impl<R: Read + Seek> Blocks<R> {
    /// Create a new block scanner
    pub fn new(cursor: ByteCursor<R>, max_image_sz: Option<usize>) -> Self {
        Blocks {
            cursor,
            max_image_sz,
        }
    }

    /// Read the header: signature, logical screen descriptor and global
    /// color table.  Returns the raw header range with the decoded
    /// descriptor.
    pub fn preamble(&mut self) -> Result<(Vec<u8>, LogicalScreenDesc)> {
        let signature = self.cursor.read_bytes(6)?;
        if &signature[..3] != b"GIF" {
            return Err(Error::MalformedHeader);
        }
        let version = [signature[3], signature[4], signature[5]];
        match &version {
            b"87a" | b"89a" => {}
            _ => return Err(Error::UnsupportedVersion(version)),
        }
        let buf = self.cursor.read_bytes(7)?;
        let screen = LogicalScreenDesc::from_buf(&buf);
        let table = screen.color_table_config();
        if table.size_bytes() > 0 {
            self.cursor.skip(table.size_bytes() as u64)?;
        }
        debug!("  header : {:?} {:?}", version, screen);
        let header = self.cursor.slice(0, self.cursor.position() as usize)?;
        Ok((header, screen))
    }

    /// Scan the next raw block.  Returns `None` at the trailer byte or at
    /// the end of input.
    pub fn next_raw(&mut self) -> Result<Option<RawBlock>> {
        if self.cursor.at_end() {
            return Ok(None);
        }
        let start = self.cursor.position();
        match self.cursor.read_u8()? {
            TRAILER => Ok(None),
            EXTENSION => {
                let label = self.cursor.read_u8()?;
                self.extension(label, start).map(Some)
            }
            IMAGE_SEPARATOR => self.image_block(start).map(Some),
            _ => Err(Error::InvalidBlockCode),
        }
    }

    /// Scan one extension block
    fn extension(&mut self, label: u8, start: u64) -> Result<RawBlock> {
        match label {
            GRAPHIC_CONTROL => {
                self.skip_sub_blocks()?;
                let len = (self.cursor.position() - start) as usize;
                let raw = self.cursor.slice(start, len)?;
                let control = GraphicControl::from_raw(&raw)?;
                debug!("  block  : {:?}", control);
                Ok(RawBlock::GraphicControl(control, raw))
            }
            COMMENT => {
                let mut comment = Comment::default();
                for sub_block in self.read_sub_blocks()? {
                    comment.add_comment(&sub_block);
                }
                debug!("  block  : {:?}", comment);
                Ok(RawBlock::Comment(comment))
            }
            APPLICATION => {
                let mut app = Application::default();
                for sub_block in self.read_sub_blocks()? {
                    app.add_app_data(&sub_block);
                }
                debug!("  block  : {:?}", app);
                Ok(RawBlock::Application(app))
            }
            _ => {
                // value-consume the sub-block chain to stay synchronized
                warn!("skipping extension: {:02X}", label);
                self.skip_sub_blocks()?;
                Ok(RawBlock::Unknown)
            }
        }
    }

    /// Scan one image block: descriptor, optional local color table,
    /// LZW minimum code size and image data sub-blocks.  The whole range
    /// from the image separator is captured.
    fn image_block(&mut self, start: u64) -> Result<RawBlock> {
        let buf = self.cursor.read_bytes(9)?;
        let desc = ImageDesc::from_buf(&buf);
        if let Some(sz) = self.max_image_sz {
            if desc.image_sz() > sz {
                return Err(Error::TooLargeImage);
            }
        }
        let table = desc.color_table_config();
        if table.size_bytes() > 0 {
            self.cursor.skip(table.size_bytes() as u64)?;
        }
        self.cursor.skip(1)?; // LZW minimum code size
        self.skip_sub_blocks()?;
        let len = (self.cursor.position() - start) as usize;
        let raw = self.cursor.slice(start, len)?;
        debug!("  block  : {:?} {:?}", desc, len);
        Ok(RawBlock::Image(desc, raw))
    }

    /// Skip a sub-block chain: length-prefixed segments terminated by a
    /// zero length.  A zero immediately after the introducer is a valid
    /// empty chain.
    fn skip_sub_blocks(&mut self) -> Result<()> {
        loop {
            let len = self.cursor.read_u8()?;
            if len == 0 {
                return Ok(());
            }
            self.cursor.skip(len as u64)?;
        }
    }

    /// Read a sub-block chain, collecting each segment
    fn read_sub_blocks(&mut self) -> Result<Vec<Vec<u8>>> {
        let mut sub_blocks = vec![];
        loop {
            let len = self.cursor.read_u8()?;
            if len == 0 {
                return Ok(sub_blocks);
            }
            sub_blocks.push(self.cursor.read_bytes(len as usize)?);
        }
    }
}

impl LogicalScreenDesc {
    /// Decode a logical screen descriptor from its 7-byte range
    fn from_buf(buf: &[u8]) -> Self {
        debug_assert_eq!(buf.len(), 7);
        let width = (buf[1] as u16) << 8 | buf[0] as u16;
        let height = (buf[3] as u16) << 8 | buf[2] as u16;
        LogicalScreenDesc::default()
            .with_screen_width(width)
            .with_screen_height(height)
            .with_flags(buf[4])
            .with_background_color_idx(buf[5])
            .with_pixel_aspect_ratio(buf[6])
    }
}

impl ImageDesc {
    /// Decode an image descriptor from its 9-byte range (after the
    /// image separator)
    fn from_buf(buf: &[u8]) -> Self {
        debug_assert_eq!(buf.len(), 9);
        let left = (buf[1] as u16) << 8 | buf[0] as u16;
        let top = (buf[3] as u16) << 8 | buf[2] as u16;
        let width = (buf[5] as u16) << 8 | buf[4] as u16;
        let height = (buf[7] as u16) << 8 | buf[6] as u16;
        Self::default()
            .with_left(left)
            .with_top(top)
            .with_width(width)
            .with_height(height)
            .with_flags(buf[8])
    }
}

impl GraphicControl {
    /// Decode a graphic control extension from its captured range
    fn from_raw(raw: &[u8]) -> Result<Self> {
        // introducer, label, block size, flags, delay x2, transparent idx
        if raw.len() >= 8 && raw[2] >= 4 {
            let mut control = GraphicControl::default();
            control.set_flags(raw[3]);
            let delay = (raw[5] as u16) << 8 | raw[4] as u16;
            control.set_delay_time_cs(delay);
            control.set_transparent_color_idx(raw[6]);
            Ok(control)
        } else {
            Err(Error::MalformedGraphicControlExtension)
        }
    }
}

/// Frame record: decoded per-frame fields plus the captured byte ranges
/// needed to synthesize a standalone still image
#[derive(Debug)]
pub(crate) struct FrameSource {
    /// Delay in centiseconds (hundredths of a second)
    pub delay_time_cs: u16,
    /// Disposal method for compositing
    pub disposal: DisposalMethod,
    /// Transparent color index, if transparency is enabled
    pub transparent_color: Option<u8>,
    /// Frame offset from the left of the canvas
    pub left: u16,
    /// Frame offset from the top of the canvas
    pub top: u16,
    pub width: u16,
    pub height: u16,
    pub interlaced: bool,
    /// Local color table configuration
    pub local_color_table: ColorTableConfig,
    /// Raw graphic control extension range, if one governs this frame
    pub graphic_control: Option<Vec<u8>>,
    /// Raw image block range: descriptor, local color table, image data
    pub image_block: Vec<u8>,
}

impl FrameSource {
    /// Bind a pending graphic control extension (or none) to an image
    /// block, decoding the per-frame fields.  Frames with no extension
    /// get default disposal and timing.
    fn bind(
        pending: Option<(GraphicControl, Vec<u8>)>,
        desc: ImageDesc,
        image_block: Vec<u8>,
    ) -> Self {
        let (control, graphic_control) = match pending {
            Some((control, raw)) => (control, Some(raw)),
            None => (GraphicControl::default(), None),
        };
        FrameSource {
            delay_time_cs: control.delay_time_cs(),
            disposal: control.disposal_method(),
            transparent_color: control.transparent_color(),
            left: desc.left(),
            top: desc.top(),
            width: desc.width(),
            height: desc.height(),
            interlaced: desc.interlaced(),
            local_color_table: desc.color_table_config(),
            graphic_control,
            image_block,
        }
    }
}

/// An `Iterator` for the frames of a GIF stream.
///
/// Holds the single pending graphic control extension slot: an extension
/// applies to the image block which follows it, comment and application
/// extensions in between notwithstanding.  A second extension before any
/// image block supersedes the first.
pub(crate) struct Frames<R: Read + Seek> {
    blocks: Blocks<R>,
    preamble: Preamble,
    pending: Option<(GraphicControl, Vec<u8>)>,
    done: bool,
}

impl<R: Read + Seek> Frames<R> {
    /// Create a new frame iterator, reading the preamble blocks
    pub fn new(mut blocks: Blocks<R>) -> Result<Self> {
        let (header, screen) = blocks.preamble()?;
        let preamble = Preamble {
            header,
            screen,
            loop_count: None,
            comments: vec![],
        };
        Ok(Frames {
            blocks,
            preamble,
            pending: None,
            done: false,
        })
    }

    /// Get the accumulated preamble.  Loop count and comments are only
    /// complete once the iterator is exhausted.
    pub fn into_preamble(self) -> Preamble {
        self.preamble
    }

    /// Handle one raw block; `Some` when a frame is complete
    fn handle_block(&mut self, block: RawBlock) -> Option<FrameSource> {
        match block {
            RawBlock::GraphicControl(control, raw) => {
                if self.pending.is_some() {
                    // malformed, but recoverable: last one wins
                    warn!("graphic control extension without image block");
                }
                self.pending = Some((control, raw));
                None
            }
            RawBlock::Comment(comment) => {
                for c in comment.comments() {
                    let text = String::from_utf8_lossy(c);
                    self.preamble.comments.push(text.into_owned());
                }
                None
            }
            RawBlock::Application(app) => {
                if self.preamble.loop_count.is_none() {
                    self.preamble.loop_count = app.loop_count();
                }
                None
            }
            RawBlock::Unknown => None,
            RawBlock::Image(desc, raw) => {
                Some(FrameSource::bind(self.pending.take(), desc, raw))
            }
        }
    }
}

impl<R: Read + Seek> Iterator for Frames<R> {
    type Item = Result<FrameSource>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.blocks.next_raw() {
                Ok(Some(block)) => {
                    if let Some(frame) = self.handle_block(block) {
                        return Some(Ok(frame));
                    }
                }
                Ok(None) => self.done = true,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::{build_gif, TestFrame, PALETTE};
    use std::io::Cursor;

    fn scan(gif: &[u8]) -> Result<(Preamble, Vec<FrameSource>)> {
        let cursor = ByteCursor::new(Cursor::new(gif))?;
        let mut frames = Frames::new(Blocks::new(cursor, None))?;
        let mut sources = vec![];
        for source in &mut frames {
            sources.push(source?);
        }
        Ok((frames.into_preamble(), sources))
    }

    #[test]
    fn three_frame_fields() {
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
        let (preamble, sources) = scan(&gif).unwrap();
        assert_eq!(preamble.screen.screen_width(), 100);
        assert_eq!(preamble.screen.screen_height(), 100);
        assert_eq!(sources.len(), 3);
        // no extension: default disposal and timing
        assert!(sources[0].graphic_control.is_none());
        assert_eq!(sources[0].delay_time_cs, 0);
        assert_eq!(sources[0].disposal, DisposalMethod::NoAction);
        assert_eq!(sources[0].transparent_color, None);
        assert_eq!(sources[1].delay_time_cs, 10);
        assert_eq!(sources[1].disposal, DisposalMethod::Background);
        assert_eq!(sources[2].delay_time_cs, 20);
        assert_eq!(sources[2].disposal, DisposalMethod::Keep);
        assert_eq!((sources[2].left, sources[2].top), (10, 10));
        assert_eq!((sources[2].width, sources[2].height), (50, 50));
        assert!(sources[2].graphic_control.is_some());
    }

    #[test]
    fn image_block_range() {
        let gif = build_gif(
            4,
            4,
            &PALETTE,
            &[
                TestFrame::solid(4, 4, 0).delay(5),
                TestFrame::solid(4, 4, 1).delay(5),
            ],
        );
        let (_, sources) = scan(&gif).unwrap();
        for source in &sources {
            // descriptor, minimum code size and chain terminator included
            assert_eq!(source.image_block[0], 0x2C);
            assert_eq!(*source.image_block.last().unwrap(), 0x00);
            let control = source.graphic_control.as_ref().unwrap();
            assert_eq!(&control[..3], &[0x21, 0xF9, 0x04]);
            assert_eq!(control.len(), 8);
        }
    }

    #[test]
    fn extensions_between_control_and_image() {
        // comment and application extensions must not break the binding
        let mut frames = [
            TestFrame::solid(2, 2, 0).delay(7),
            TestFrame::solid(2, 2, 1).delay(9),
        ];
        frames[1].comment = Some(b"interleaved".to_vec());
        frames[1].app_data = true;
        let gif = build_gif(2, 2, &PALETTE, &frames);
        let (preamble, sources) = scan(&gif).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[1].delay_time_cs, 9);
        assert_eq!(preamble.comments, vec!["interleaved".to_string()]);
        assert_eq!(preamble.loop_count, Some(0));
    }

    #[test]
    fn last_control_extension_wins() {
        let mut gif = build_gif(2, 2, &PALETTE, &[]);
        let trailer = gif.pop().unwrap();
        assert_eq!(trailer, 0x3B);
        // two extensions in a row, then one image block
        gif.extend(&[0x21, 0xF9, 0x04, 0x00, 0x05, 0x00, 0x00, 0x00]);
        gif.extend(&[0x21, 0xF9, 0x04, 0x00, 0x09, 0x00, 0x00, 0x00]);
        let frame = build_gif(2, 2, &PALETTE, &[TestFrame::solid(2, 2, 0)]);
        let start = frame.iter().position(|&b| b == 0x2C).unwrap();
        gif.extend(&frame[start..]); // image block + trailer
        let (_, sources) = scan(&gif).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].delay_time_cs, 9);
    }

    #[test]
    fn unknown_extension_skipped() {
        let mut gif = build_gif(2, 2, &PALETTE, &[]);
        gif.pop();
        // plain text extension with two sub-blocks
        gif.extend(&[0x21, 0x01, 0x03, 1, 2, 3, 0x02, 4, 5, 0x00]);
        let frame = build_gif(2, 2, &PALETTE, &[TestFrame::solid(2, 2, 0)]);
        let start = frame.iter().position(|&b| b == 0x2C).unwrap();
        gif.extend(&frame[start..]);
        let (_, sources) = scan(&gif).unwrap();
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn empty_sub_block_chain() {
        let mut gif = build_gif(2, 2, &PALETTE, &[]);
        gif.pop();
        // comment extension with an immediately-terminated chain
        gif.extend(&[0x21, 0xFE, 0x00]);
        gif.push(0x3B);
        let (preamble, sources) = scan(&gif).unwrap();
        assert!(sources.is_empty());
        assert!(preamble.comments.is_empty());
    }

    #[test]
    fn missing_trailer_ends_scan() {
        let mut gif = build_gif(2, 2, &PALETTE, &[TestFrame::solid(2, 2, 0)]);
        gif.pop();
        let (_, sources) = scan(&gif).unwrap();
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn truncated_image_data() {
        let gif = build_gif(2, 2, &PALETTE, &[TestFrame::solid(2, 2, 0)]);
        let gif = &gif[..gif.len() - 4];
        assert!(matches!(scan(gif), Err(Error::UnexpectedEndOfFile)));
    }

    #[test]
    fn invalid_block_code() {
        let mut gif = build_gif(2, 2, &PALETTE, &[]);
        gif.pop();
        gif.push(0x55);
        assert!(matches!(scan(&gif), Err(Error::InvalidBlockCode)));
    }

    #[test]
    fn bad_signatures() {
        assert!(matches!(
            scan(b"NOTGIF\x00\x00"),
            Err(Error::MalformedHeader)
        ));
        assert!(matches!(
            scan(b"GIF99a\x02\x00\x02\x00\x00\x00\x00\x3B"),
            Err(Error::UnsupportedVersion([b'9', b'9', b'a']))
        ));
    }

    #[test]
    fn image_size_guard() {
        let gif = build_gif(100, 100, &PALETTE, &[TestFrame::solid(100, 100, 0)]);
        let cursor = ByteCursor::new(Cursor::new(&gif[..])).unwrap();
        let mut frames =
            Frames::new(Blocks::new(cursor, Some(1000))).unwrap();
        assert!(matches!(frames.next(), Some(Err(Error::TooLargeImage))));
    }
}
