use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::checksum;

/// One CFDATA block as read from a cabinet, or two of them joined together
/// when a block was split across a cabinet boundary.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct DataBlock {
    pub checksum: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u16,
    pub reserve_data: Vec<u8>,
    pub data: Vec<u8>,
}

impl DataBlock {
    /// A block that declares no uncompressed data is the first half of a
    /// block whose remainder opens the folder in the next cabinet.
    pub fn is_continued(&self) -> bool {
        self.uncompressed_size == 0
    }

    /// Returns false if the block carries a checksum that does not match its
    /// contents.  Only meaningful for blocks as stored, not joined ones.
    pub fn checksum_matches(&self) -> bool {
        self.checksum == 0 || self.checksum == self.computed_checksum()
    }

    pub fn computed_checksum(&self) -> u32 {
        checksum::data_block(
            self.compressed_size as u16,
            self.uncompressed_size,
            &self.reserve_data,
            &self.data,
        )
    }

    /// Appends the rest of a split block, read from the next cabinet.
    pub fn join(&mut self, rest: DataBlock) {
        self.data.extend_from_slice(&rest.data);
        self.compressed_size += rest.compressed_size;
        self.uncompressed_size = rest.uncompressed_size;
    }
}

/// Reads the data block at `offset` and returns it along with the offset of
/// the block that follows it.
pub(crate) fn read_data_block<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    reserve_size: usize,
) -> io::Result<(DataBlock, u64)> {
    reader.seek(SeekFrom::Start(offset))?;
    let checksum = reader.read_u32::<LittleEndian>()?;
    let compressed_size = reader.read_u16::<LittleEndian>()?;
    let uncompressed_size = reader.read_u16::<LittleEndian>()?;
    let mut reserve_data = vec![0u8; reserve_size];
    reader.read_exact(&mut reserve_data)?;
    let mut data = vec![0u8; compressed_size as usize];
    reader.read_exact(&mut data)?;
    let next_offset =
        offset + 8 + reserve_size as u64 + compressed_size as u64;
    let block = DataBlock {
        checksum,
        compressed_size: compressed_size as u32,
        uncompressed_size,
        reserve_data,
        data,
    };
    Ok((block, next_offset))
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, ErrorKind};

    use super::read_data_block;

    #[test]
    fn read_two_blocks_in_sequence() {
        let bytes = b"junk\
            \x4c\x1a\x2e\x7f\x0e\0\x0e\0Hello, world!\n\
            \0\0\0\0\x03\0\0\0abc"
            .to_vec();
        let mut cursor = Cursor::new(bytes);
        let (first, next) = read_data_block(&mut cursor, 4, 0).unwrap();
        assert_eq!(first.data, b"Hello, world!\n");
        assert_eq!(first.compressed_size, 14);
        assert!(!first.is_continued());
        assert!(first.checksum_matches());
        assert_eq!(next, 4 + 8 + 14);

        let (second, end) = read_data_block(&mut cursor, next, 0).unwrap();
        assert!(second.is_continued());
        assert_eq!(second.data, b"abc");
        assert_eq!(end, next + 11);
    }

    #[test]
    fn reserve_bytes_are_skipped_and_checksummed() {
        let bytes = b"\0\0\0\0\x02\0\x02\0\xaa\xbb\xcchi".to_vec();
        let (mut block, next) =
            read_data_block(&mut Cursor::new(bytes), 0, 3).unwrap();
        assert_eq!(block.reserve_data, b"\xaa\xbb\xcc");
        assert_eq!(block.data, b"hi");
        assert_eq!(next, 13);
        assert!(block.checksum_matches());
        block.checksum = block.computed_checksum();
        assert!(block.checksum_matches());
        block.checksum ^= 1;
        assert!(!block.checksum_matches());
    }

    #[test]
    fn join_adopts_second_size() {
        let bytes = b"\0\0\0\0\x02\0\0\0ab\0\0\0\0\x03\0\x05\0cde".to_vec();
        let mut cursor = Cursor::new(bytes);
        let (mut first, next) = read_data_block(&mut cursor, 0, 0).unwrap();
        let (second, _) = read_data_block(&mut cursor, next, 0).unwrap();
        first.join(second);
        assert_eq!(first.data, b"abcde");
        assert_eq!(first.compressed_size, 5);
        assert_eq!(first.uncompressed_size, 5);
        assert!(!first.is_continued());
    }

    #[test]
    fn truncated_payload_is_eof() {
        let bytes = b"\0\0\0\0\x10\0\x10\0short".to_vec();
        let error =
            read_data_block(&mut Cursor::new(bytes), 0, 0).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::UnexpectedEof);
    }
}
