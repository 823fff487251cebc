use std::io;

use byteorder::{LittleEndian, WriteBytesExt};

const MSZIP_SIGNATURE: u16 = 0x4B43; // "CK" stored little-endian
const MSZIP_SIGNATURE_LEN: usize = 2;
const DEFLATE_MAX_DICT_LEN: usize = 0x8000;

/// Decompressor for MSZIP blocks.  Every block is a separate deflate stream,
/// but back-references may reach into the previous 32 KiB of output of the
/// same folder, so that history is kept between calls.
pub struct MsZipDecompressor {
    decompressor: flate2::Decompress,
    dictionary: Vec<u8>,
}

impl MsZipDecompressor {
    pub fn new() -> MsZipDecompressor {
        MsZipDecompressor {
            decompressor: flate2::Decompress::new(false),
            dictionary: Vec::with_capacity(DEFLATE_MAX_DICT_LEN),
        }
    }

    pub fn reset(&mut self) {
        self.decompressor.reset(false);
        self.dictionary.clear();
    }

    /// Decompresses one block.  The result is never longer than
    /// `uncompressed_size` but may be shorter; callers decide whether a short
    /// block is acceptable.
    pub fn decompress_block(
        &mut self,
        data: &[u8],
        uncompressed_size: usize,
    ) -> io::Result<Vec<u8>> {
        if data.len() < MSZIP_SIGNATURE_LEN
            || ((data[0] as u16) | ((data[1] as u16) << 8)) != MSZIP_SIGNATURE
        {
            invalid_data!(
                "MSZIP decompression failed: Invalid block signature"
            );
        }
        let data = &data[MSZIP_SIGNATURE_LEN..];
        // Prime the inflater with the history as a stored block:
        self.decompressor.reset(false);
        if !self.dictionary.is_empty() {
            let length = self.dictionary.len() as u16;
            let mut chunk: Vec<u8> = vec![0];
            chunk.write_u16::<LittleEndian>(length)?;
            chunk.write_u16::<LittleEndian>(!length)?;
            chunk.extend_from_slice(&self.dictionary);
            let mut out = Vec::with_capacity(self.dictionary.len());
            let flush = flate2::FlushDecompress::Sync;
            match self.decompressor.decompress_vec(&chunk, &mut out, flush) {
                Ok(flate2::Status::Ok) => {}
                Ok(status) => invalid_data!(
                    "MSZIP decompression failed: Could not restore \
                     dictionary ({:?})",
                    status
                ),
                Err(error) => invalid_data!(
                    "MSZIP decompression failed: Could not restore \
                     dictionary ({})",
                    error
                ),
            }
        }
        // One spare byte of room tells an exact fit from an overlong block.
        let mut out = Vec::<u8>::with_capacity(uncompressed_size + 1);
        let flush = flate2::FlushDecompress::Finish;
        if let Err(error) =
            self.decompressor.decompress_vec(data, &mut out, flush)
        {
            invalid_data!("MSZIP decompression failed: {}", error);
        }
        if out.len() > uncompressed_size {
            invalid_data!(
                "MSZIP decompression failed: Block inflates to more than \
                 the declared {} bytes",
                uncompressed_size
            );
        }
        self.remember(&out);
        Ok(out)
    }

    fn remember(&mut self, out: &[u8]) {
        if out.len() >= DEFLATE_MAX_DICT_LEN {
            let start = out.len() - DEFLATE_MAX_DICT_LEN;
            self.dictionary.clear();
            self.dictionary.extend_from_slice(&out[start..]);
        } else {
            let total = self.dictionary.len() + out.len();
            if total > DEFLATE_MAX_DICT_LEN {
                self.dictionary.drain(..(total - DEFLATE_MAX_DICT_LEN));
            }
            self.dictionary.extend_from_slice(out);
        }
    }
}

impl Default for MsZipDecompressor {
    fn default() -> Self {
        MsZipDecompressor::new()
    }
}
