use std::io::{self, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::ctype::CompressionType;

/// Metadata about one folder in a cabinet.  A folder that continues into
/// another cabinet is described once per cabinet; each entry only counts the
/// data blocks stored in its own cabinet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FolderEntry {
    first_data_block_offset: u32,
    num_data_blocks: u16,
    compression_type: CompressionType,
    reserve_data: Vec<u8>,
}

impl FolderEntry {
    /// Returns the scheme used to compress this folder's data.
    pub fn compression_type(&self) -> CompressionType {
        self.compression_type
    }

    /// Returns the number of data blocks this folder has in this cabinet.
    pub fn num_data_blocks(&self) -> u16 {
        self.num_data_blocks
    }

    /// Returns the offset of the folder's first data block, relative to the
    /// start of the cabinet.
    pub fn first_data_block_offset(&self) -> u32 {
        self.first_data_block_offset
    }

    /// Returns the application-defined reserve data for this folder.
    pub fn reserve_data(&self) -> &[u8] {
        &self.reserve_data
    }

    /// Returns true if this folder has data blocks at a plausible location.
    pub fn has_data(&self) -> bool {
        self.num_data_blocks > 0 && self.first_data_block_offset > 0
    }
}

pub(crate) fn parse_folder_entry<R: Read>(
    mut reader: R,
    reserve_size: usize,
) -> io::Result<FolderEntry> {
    let first_data_offset = reader.read_u32::<LittleEndian>()?;
    let num_data_blocks = reader.read_u16::<LittleEndian>()?;
    let compression_bits = reader.read_u16::<LittleEndian>()?;
    let mut reserve_data = vec![0u8; reserve_size];
    if reserve_size > 0 {
        reader.read_exact(&mut reserve_data)?;
    }
    Ok(FolderEntry {
        first_data_block_offset: first_data_offset,
        num_data_blocks,
        compression_type: CompressionType::from_bitfield(compression_bits),
        reserve_data,
    })
}
