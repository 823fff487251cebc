use std::fmt;
use std::io;

use crate::mszip::MsZipDecompressor;

const CTYPE_MASK: u16 = 0x000f;
const CTYPE_NONE: u16 = 0;
const CTYPE_MSZIP: u16 = 1;
const CTYPE_QUANTUM: u16 = 2;
const CTYPE_LZX: u16 = 3;

/// A scheme for compressing data within the cabinet.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum CompressionType {
    /// No compression.
    None,
    /// MSZIP compression.  MSZIP is described further in
    /// [MS-MCI](https://msdn.microsoft.com/en-us/library/cc483131.aspx).
    MsZip,
    /// Quantum compression with the given level and memory.  Folders using
    /// it are recognized but cannot be extracted.
    Quantum(u16, u16),
    /// LZX compression with the given window size (in bits).  Folders using
    /// it are recognized but cannot be extracted.
    Lzx(u16),
    /// A compression type this crate does not know, with the raw bitfield.
    Unknown(u16),
}

impl CompressionType {
    /// Decodes the packed `typeCompress` field of a folder entry.  The low
    /// nibble selects the scheme; the high byte holds scheme parameters.
    pub(crate) fn from_bitfield(bits: u16) -> CompressionType {
        match bits & CTYPE_MASK {
            CTYPE_NONE => CompressionType::None,
            CTYPE_MSZIP => CompressionType::MsZip,
            CTYPE_QUANTUM => {
                let level = (bits & 0x00f0) >> 4;
                let memory = (bits & 0x1f00) >> 8;
                CompressionType::Quantum(level, memory)
            }
            CTYPE_LZX => CompressionType::Lzx((bits & 0x1f00) >> 8),
            _ => CompressionType::Unknown(bits),
        }
    }

    /// Returns true if folders using this scheme can be extracted.
    pub fn is_supported(self) -> bool {
        matches!(self, CompressionType::None | CompressionType::MsZip)
    }

    /// Creates a fresh decompressor for one folder.
    pub(crate) fn decompressor(self) -> io::Result<Decompressor> {
        match self {
            CompressionType::None => Ok(Decompressor::Uncompressed),
            CompressionType::MsZip => {
                Ok(Decompressor::MsZip(Box::new(MsZipDecompressor::new())))
            }
            CompressionType::Quantum(_, _) => {
                unsupported!("Quantum decompression is not supported")
            }
            CompressionType::Lzx(_) => {
                unsupported!("LZX decompression is not supported")
            }
            CompressionType::Unknown(bits) => {
                unsupported!("Unknown compression type: 0x{:04x}", bits)
            }
        }
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CompressionType::None => f.write_str("None"),
            CompressionType::MsZip => f.write_str("MsZip"),
            CompressionType::Quantum(level, memory) => {
                write!(f, "Q{}/{}", level, memory)
            }
            CompressionType::Lzx(window) => write!(f, "Lzx{}", window),
            CompressionType::Unknown(bits) => write!(f, "?{:04x}", bits),
        }
    }
}

/// Per-folder decompression state.  One instance is fed every block of a
/// logical folder in order, including blocks stored in later cabinets.
pub(crate) enum Decompressor {
    Uncompressed,
    MsZip(Box<MsZipDecompressor>),
}

impl Decompressor {
    /// Clears all state carried over from previously decompressed blocks.
    pub(crate) fn reset(&mut self) {
        match self {
            Decompressor::Uncompressed => {}
            Decompressor::MsZip(d) => d.reset(),
        }
    }

    /// Decompresses one (possibly joined) block.  Stored blocks pass through
    /// untouched.  MSZIP output shorter than `uncompressed_size` is padded
    /// with zeros when `allow_short` is set, since some cabinets in the wild
    /// declare more than their blocks produce.
    pub(crate) fn decompress(
        &mut self,
        data: Vec<u8>,
        uncompressed_size: usize,
        allow_short: bool,
    ) -> io::Result<Vec<u8>> {
        match self {
            Decompressor::Uncompressed => Ok(data),
            Decompressor::MsZip(decompressor) => {
                let mut out =
                    decompressor.decompress_block(&data, uncompressed_size)?;
                if out.len() < uncompressed_size {
                    if !allow_short {
                        invalid_data!(
                            "MSZIP block too short \
                             (expected {} bytes, got {})",
                            uncompressed_size,
                            out.len()
                        );
                    }
                    log::debug!(
                        "MSZIP block size mismatch (expected {} bytes, \
                         got {}); padding with zeros",
                        uncompressed_size,
                        out.len()
                    );
                    out.resize(uncompressed_size, 0);
                }
                Ok(out)
            }
        }
    }
}
