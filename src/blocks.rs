use crate::error::{CatResult, Error};
use crate::source::GifSource;
use log::warn;

/// Reads GIF records from a source: fixed-size fields, length-prefixed sub-blocks,
/// and the byte-at-a-time feed the LZW decoder pulls from.
pub(crate) struct BlockReader<S> {
    source: S,
    block: [u8; 255],
    block_len: usize,
    block_pos: usize,
    /// Zero-length terminator of the current image data has been consumed
    data_done: bool,
}

impl<S: GifSource> BlockReader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            block: [0; 255],
            block_len: 0,
            block_pos: 0,
            data_done: true,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Fails with `TruncatedInput` if the source has fewer bytes left
    pub fn read_exact(&mut self, buf: &mut [u8]) -> CatResult<()> {
        let len = self.source.read(buf)?;
        if len != buf.len() {
            return Err(Error::TruncatedInput);
        }
        Ok(())
    }

    /// `None` at a clean end of data
    pub fn try_read_u8(&mut self) -> CatResult<Option<u8>> {
        let mut byte = [0; 1];
        Ok(match self.source.read(&mut byte)? {
            0 => None,
            _ => Some(byte[0]),
        })
    }

    pub fn read_u8(&mut self) -> CatResult<u8> {
        let mut byte = [0; 1];
        self.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    pub fn read_u16(&mut self) -> CatResult<u16> {
        let mut word = [0; 2];
        self.read_exact(&mut word)?;
        Ok(u16::from_le_bytes(word))
    }

    /// Next sub-block, or `None` for the zero-length terminator
    pub fn read_block(&mut self) -> CatResult<Option<&[u8]>> {
        let len = self.read_u8()? as usize;
        if len == 0 {
            return Ok(None);
        }
        let mut block = [0; 255];
        self.read_exact(&mut block[..len])?;
        self.block = block;
        Ok(Some(&self.block[..len]))
    }

    /// Skips sub-blocks up to and including the terminator
    pub fn skip_blocks(&mut self) -> CatResult<()> {
        while self.read_block()?.is_some() {}
        Ok(())
    }

    /// Prepares the LZW feed for the image data that follows the code size byte
    pub fn begin_data(&mut self) {
        self.block_len = 0;
        self.block_pos = 0;
        self.data_done = false;
    }

    pub fn next_data_byte(&mut self) -> CatResult<u8> {
        if self.block_pos >= self.block_len {
            let len = self.read_u8()? as usize;
            if len == 0 {
                // the end code should have come before the terminator
                self.data_done = true;
                return Err(Error::ImageDefect);
            }
            let mut block = [0; 255];
            self.read_exact(&mut block[..len])?;
            self.block = block;
            self.block_len = len;
            self.block_pos = 0;
        }
        let byte = self.block[self.block_pos];
        self.block_pos += 1;
        Ok(byte)
    }

    /// Discards whatever is left of the image data, including the terminator
    pub fn finish_data(&mut self) -> CatResult<()> {
        self.block_len = 0;
        self.block_pos = 0;
        if !self.data_done {
            self.data_done = true;
            self.skip_blocks()?;
        }
        Ok(())
    }

    pub fn mark(&mut self) -> CatResult<()> {
        self.source.mark()?;
        Ok(())
    }

    pub fn rewind(&mut self) -> CatResult<()> {
        self.block_len = 0;
        self.block_pos = 0;
        self.data_done = true;
        self.source.rewind().map_err(|e| {
            warn!("rewind failed: {e}");
            Error::RewindFailed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::BytesSource;

    fn reader(data: &[u8]) -> BlockReader<BytesSource> {
        BlockReader::new(BytesSource::new(data.to_vec()).unwrap())
    }

    #[test]
    fn fields() {
        let mut r = reader(&[7, 0x34, 0x12, 9]);
        assert_eq!(7, r.read_u8().unwrap());
        assert_eq!(0x1234, r.read_u16().unwrap());
        assert_eq!(Some(9), r.try_read_u8().unwrap());
        assert_eq!(None, r.try_read_u8().unwrap());
        assert!(matches!(r.read_u8(), Err(Error::TruncatedInput)));
    }

    #[test]
    fn sub_blocks() {
        let mut r = reader(&[2, b'a', b'b', 1, b'c', 0, 42]);
        assert_eq!(Some(&b"ab"[..]), r.read_block().unwrap());
        r.skip_blocks().unwrap();
        assert_eq!(42, r.read_u8().unwrap());
    }

    #[test]
    fn truncated_block() {
        let mut r = reader(&[5, 1, 2]);
        assert!(matches!(r.read_block(), Err(Error::TruncatedInput)));
    }

    #[test]
    fn data_feed_spans_blocks() {
        let mut r = reader(&[1, 10, 2, 11, 12, 1, 13, 0, 99]);
        r.begin_data();
        assert_eq!(10, r.next_data_byte().unwrap());
        assert_eq!(11, r.next_data_byte().unwrap());
        assert_eq!(12, r.next_data_byte().unwrap());
        r.finish_data().unwrap();
        assert_eq!(99, r.read_u8().unwrap());
    }

    #[test]
    fn data_terminator_is_a_defect() {
        let mut r = reader(&[1, 10, 0, 99]);
        r.begin_data();
        r.next_data_byte().unwrap();
        assert!(matches!(r.next_data_byte(), Err(Error::ImageDefect)));
        r.finish_data().unwrap();
        assert_eq!(99, r.read_u8().unwrap());
    }

    #[test]
    fn rewind_to_mark() {
        let mut r = reader(&[1, 2, 3]);
        r.read_u8().unwrap();
        r.mark().unwrap();
        r.read_u16().unwrap();
        r.rewind().unwrap();
        assert_eq!(2, r.read_u8().unwrap());
    }
}
