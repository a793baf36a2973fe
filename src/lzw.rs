//! GIF flavor of LZW: variable-width codes packed LSB-first, up to 12 bits.
//!
//! Decoding is incremental (one raster line per call), and every loop is bounded
//! by the size of the code table, so malformed data ends in an error rather than
//! a hang or an out-of-bounds write.

use crate::blocks::BlockReader;
use crate::error::{CatResult, Error};
use crate::source::GifSource;

const LZ_MAX_CODE: usize = 4095;
const LZ_BITS: u8 = 12;
const NO_SUCH_CODE: u16 = 4098;

const CODE_MASKS: [u32; 13] = [
    0x0000, 0x0001, 0x0003, 0x0007, 0x000f, 0x001f, 0x003f, 0x007f, 0x00ff, 0x01ff, 0x03ff, 0x07ff, 0x0fff,
];

pub(crate) struct LzwDecoder {
    bits_per_pixel: u8,
    clear_code: u16,
    eof_code: u16,
    running_code: u16,
    running_bits: u8,
    max_code1: u16,
    last_code: u16,
    shift_state: u8,
    shift_bits: u32,
    stack_ptr: usize,
    prefix: Box<[u16]>,
    suffix: Box<[u8]>,
    stack: Box<[u8]>,
}

impl LzwDecoder {
    pub fn new() -> Self {
        Self {
            bits_per_pixel: 0,
            clear_code: 0,
            eof_code: 0,
            running_code: 0,
            running_bits: 0,
            max_code1: 0,
            last_code: NO_SUCH_CODE,
            shift_state: 0,
            shift_bits: 0,
            stack_ptr: 0,
            prefix: vec![NO_SUCH_CODE; LZ_MAX_CODE + 1].into_boxed_slice(),
            suffix: vec![0; LZ_MAX_CODE + 1].into_boxed_slice(),
            stack: vec![0; LZ_MAX_CODE].into_boxed_slice(),
        }
    }

    /// Starts a new image with the given minimum code size
    pub fn start(&mut self, code_size: u8) -> CatResult<()> {
        if code_size > 8 {
            return Err(Error::ImageDefect);
        }
        self.bits_per_pixel = code_size;
        self.clear_code = 1 << code_size;
        self.eof_code = self.clear_code + 1;
        self.reset_table();
        self.stack_ptr = 0;
        self.shift_state = 0;
        self.shift_bits = 0;
        Ok(())
    }

    fn reset_table(&mut self) {
        self.prefix.fill(NO_SUCH_CODE);
        self.running_code = self.eof_code + 1;
        self.running_bits = self.bits_per_pixel + 1;
        self.max_code1 = 1 << self.running_bits;
        self.last_code = NO_SUCH_CODE;
    }

    fn read_code<S: GifSource>(&mut self, input: &mut BlockReader<S>) -> CatResult<u16> {
        if self.running_bits > LZ_BITS {
            return Err(Error::ImageDefect);
        }
        while self.shift_state < self.running_bits {
            let byte = input.next_data_byte()?;
            self.shift_bits |= u32::from(byte) << self.shift_state;
            self.shift_state += 8;
        }
        let code = (self.shift_bits & CODE_MASKS[self.running_bits as usize]) as u16;
        self.shift_bits >>= self.running_bits;
        self.shift_state -= self.running_bits;

        // at 12 bits the table stays full until the next clear code
        if usize::from(self.running_code) < LZ_MAX_CODE + 2 {
            self.running_code += 1;
            if self.running_code > self.max_code1 && self.running_bits < LZ_BITS {
                self.max_code1 <<= 1;
                self.running_bits += 1;
            }
        }
        Ok(code)
    }

    /// Follows the prefix chain down to a literal. `NO_SUCH_CODE` if the chain is broken.
    fn prefix_char(&self, mut code: u16) -> u16 {
        let mut steps = 0;
        while code > self.clear_code && steps <= LZ_MAX_CODE {
            if usize::from(code) > LZ_MAX_CODE {
                return NO_SUCH_CODE;
            }
            code = self.prefix[usize::from(code)];
            steps += 1;
        }
        code
    }

    /// Fills `line` with palette indices
    pub fn decode_line<S: GifSource>(&mut self, input: &mut BlockReader<S>, line: &mut [u8]) -> CatResult<()> {
        let mut i = 0;
        while self.stack_ptr != 0 && i < line.len() {
            self.stack_ptr -= 1;
            line[i] = self.stack[self.stack_ptr];
            i += 1;
        }

        while i < line.len() {
            let code = self.read_code(input)?;

            if code == self.eof_code {
                return Err(Error::PrematureEnd);
            }
            if code == self.clear_code {
                self.reset_table();
                continue;
            }

            let newest = usize::from(self.running_code) - 2;
            if code < self.clear_code {
                line[i] = code as u8;
                i += 1;
            } else {
                let mut prefix = if self.prefix[usize::from(code)] == NO_SUCH_CODE {
                    // only the code about to be defined may be unknown
                    if usize::from(code) != newest {
                        return Err(Error::ImageDefect);
                    }
                    let first = self.prefix_char(self.last_code) as u8;
                    self.suffix[newest] = first;
                    self.stack[self.stack_ptr] = first;
                    self.stack_ptr += 1;
                    self.last_code
                } else {
                    code
                };

                while self.stack_ptr < LZ_MAX_CODE && prefix > self.clear_code && usize::from(prefix) <= LZ_MAX_CODE {
                    self.stack[self.stack_ptr] = self.suffix[usize::from(prefix)];
                    self.stack_ptr += 1;
                    prefix = self.prefix[usize::from(prefix)];
                }
                if self.stack_ptr >= LZ_MAX_CODE || usize::from(prefix) > LZ_MAX_CODE {
                    return Err(Error::ImageDefect);
                }
                self.stack[self.stack_ptr] = prefix as u8;
                self.stack_ptr += 1;

                while self.stack_ptr != 0 && i < line.len() {
                    self.stack_ptr -= 1;
                    line[i] = self.stack[self.stack_ptr];
                    i += 1;
                }
            }

            // a full table is frozen until the next clear code
            if self.last_code != NO_SUCH_CODE && newest <= LZ_MAX_CODE && self.prefix[newest] == NO_SUCH_CODE {
                self.prefix[newest] = self.last_code;
                let tail = if usize::from(code) == newest { self.last_code } else { code };
                self.suffix[newest] = self.prefix_char(tail) as u8;
            }
            self.last_code = code;
        }
        Ok(())
    }
}
