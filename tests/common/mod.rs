#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use parking_lot::Mutex;

// ========================================================================= //

pub const NONE: u16 = 0x0000;
pub const MSZIP: u16 = 0x0001;
pub const QUANTUM: u16 = 0x1472;
pub const LZX: u16 = 0x1503;

pub const FROM_PREV: u16 = 0xfffd;
pub const TO_NEXT: u16 = 0xfffe;
pub const PREV_AND_NEXT: u16 = 0xffff;

/// One data block as it will be stored.
#[derive(Clone, Debug)]
pub struct Block {
    pub data: Vec<u8>,
    pub uncompressed_size: u16,
}

impl Block {
    pub fn stored(data: &[u8]) -> Block {
        Block { data: data.to_vec(), uncompressed_size: data.len() as u16 }
    }

    /// Splits the block's payload at `at`: the first half is a continuation
    /// block for the end of one cabinet, the second half opens the folder in
    /// the next cabinet.
    pub fn split(self, at: usize) -> (Block, Block) {
        let head =
            Block { data: self.data[..at].to_vec(), uncompressed_size: 0 };
        let tail = Block {
            data: self.data[at..].to_vec(),
            uncompressed_size: self.uncompressed_size,
        };
        (head, tail)
    }
}

pub fn stored_blocks(data: &[u8], block_size: usize) -> Vec<Block> {
    data.chunks(block_size).map(Block::stored).collect()
}

/// Compresses `data` as one deflate stream cut into MSZIP blocks, so that
/// later blocks may refer back into earlier ones.
pub fn mszip_blocks(data: &[u8], block_size: usize) -> Vec<Block> {
    let mut compressor = flate2::Compress::new(Compression::best(), false);
    let chunks: Vec<&[u8]> = data.chunks(block_size).collect();
    let mut blocks = Vec::new();
    for (index, chunk) in chunks.iter().enumerate() {
        let is_last = index + 1 == chunks.len();
        let mut out = Vec::<u8>::with_capacity(chunk.len() * 2 + 64);
        out.extend_from_slice(b"CK");
        let flush = if is_last {
            flate2::FlushCompress::Finish
        } else {
            flate2::FlushCompress::Sync
        };
        compressor.compress_vec(chunk, &mut out, flush).unwrap();
        if !is_last {
            out.write_u16::<LittleEndian>(0x0003).unwrap();
        }
        let uncompressed_size = chunk.len() as u16;
        blocks.push(Block { data: out, uncompressed_size });
    }
    blocks
}

pub fn lorem(size: usize) -> Vec<u8> {
    let mut text = lipsum::lipsum(size / 4 + 16).into_bytes();
    while text.len() < size {
        text.extend_from_slice(b" and so on");
    }
    text.truncate(size);
    text
}

// ========================================================================= //

struct FolderPlan {
    ctype: u16,
    blocks: Vec<Block>,
}

struct FilePlan {
    name: String,
    size: u32,
    folder_index: u16,
}

/// Assembles a single cabinet file byte by byte.
pub struct CabBuilder {
    set_id: u16,
    set_index: u16,
    prev: Option<String>,
    next: Option<String>,
    data_reserve_size: u8,
    bad_checksums: bool,
    folders: Vec<FolderPlan>,
    files: Vec<FilePlan>,
}

impl CabBuilder {
    pub fn new() -> CabBuilder {
        CabBuilder {
            set_id: 0x1234,
            set_index: 0,
            prev: None,
            next: None,
            data_reserve_size: 0,
            bad_checksums: false,
            folders: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn set_index(mut self, index: u16) -> CabBuilder {
        self.set_index = index;
        self
    }

    pub fn prev(mut self, name: &str) -> CabBuilder {
        self.prev = Some(name.to_string());
        self
    }

    pub fn next(mut self, name: &str) -> CabBuilder {
        self.next = Some(name.to_string());
        self
    }

    pub fn data_reserve_size(mut self, size: u8) -> CabBuilder {
        self.data_reserve_size = size;
        self
    }

    pub fn bad_checksums(mut self) -> CabBuilder {
        self.bad_checksums = true;
        self
    }

    pub fn folder(mut self, ctype: u16, blocks: Vec<Block>) -> CabBuilder {
        self.folders.push(FolderPlan { ctype, blocks });
        self
    }

    pub fn file(mut self, name: &str, size: usize, folder: u16) -> CabBuilder {
        self.files.push(FilePlan {
            name: name.to_string(),
            size: size as u32,
            folder_index: folder,
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let has_reserve = self.data_reserve_size > 0;
        let mut flags = 0u16;
        let mut links = Vec::<u8>::new();
        if let Some(ref name) = self.prev {
            flags |= 0x1;
            links.extend_from_slice(name.as_bytes());
            links.extend_from_slice(b"\0Disk\0");
        }
        if let Some(ref name) = self.next {
            flags |= 0x2;
            links.extend_from_slice(name.as_bytes());
            links.extend_from_slice(b"\0Disk\0");
        }
        if has_reserve {
            flags |= 0x4;
        }
        let header_size = 36 + if has_reserve { 4 } else { 0 } + links.len();
        let first_file_offset = header_size + 8 * self.folders.len();
        let files_size: usize =
            self.files.iter().map(|file| 17 + file.name.len()).sum();
        let mut offset = first_file_offset + files_size;
        let mut folder_offsets = Vec::new();
        for folder in self.folders.iter() {
            if folder.blocks.is_empty() {
                folder_offsets.push(0);
                continue;
            }
            folder_offsets.push(offset);
            let reserve = self.data_reserve_size as usize;
            for block in folder.blocks.iter() {
                offset += 8 + reserve + block.data.len();
            }
        }
        let total_size = offset;

        let mut out = Vec::<u8>::with_capacity(total_size);
        out.extend_from_slice(b"MSCF");
        out.write_u32::<LittleEndian>(0).unwrap(); // reserved1
        out.write_u32::<LittleEndian>(total_size as u32).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap(); // reserved2
        out.write_u32::<LittleEndian>(first_file_offset as u32).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap(); // reserved3
        out.write_u8(3).unwrap();
        out.write_u8(1).unwrap();
        out.write_u16::<LittleEndian>(self.folders.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(self.files.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(flags).unwrap();
        out.write_u16::<LittleEndian>(self.set_id).unwrap();
        out.write_u16::<LittleEndian>(self.set_index).unwrap();
        if has_reserve {
            out.write_u16::<LittleEndian>(0).unwrap();
            out.write_u8(0).unwrap();
            out.write_u8(self.data_reserve_size).unwrap();
        }
        out.extend_from_slice(&links);

        for (folder, &first) in self.folders.iter().zip(&folder_offsets) {
            out.write_u32::<LittleEndian>(first as u32).unwrap();
            out.write_u16::<LittleEndian>(folder.blocks.len() as u16).unwrap();
            out.write_u16::<LittleEndian>(folder.ctype).unwrap();
        }

        let num_folders = self.folders.len() as u16;
        let mut folder_fill = HashMap::<u16, u32>::new();
        for file in self.files.iter() {
            let folder = match file.folder_index {
                FROM_PREV | PREV_AND_NEXT => 0,
                TO_NEXT => num_folders.saturating_sub(1),
                index => index,
            };
            let fill = folder_fill.entry(folder).or_insert(0);
            let file_offset = if file.folder_index == FROM_PREV
                || file.folder_index == PREV_AND_NEXT
            {
                0
            } else {
                *fill
            };
            *fill = file_offset + file.size;
            out.write_u32::<LittleEndian>(file.size).unwrap();
            out.write_u32::<LittleEndian>(file_offset).unwrap();
            out.write_u16::<LittleEndian>(file.folder_index).unwrap();
            out.write_u16::<LittleEndian>(0x226c).unwrap(); // 1997-03-12
            out.write_u16::<LittleEndian>(0x59ba).unwrap(); // 11:13:52
            out.write_u16::<LittleEndian>(0x20).unwrap();
            out.extend_from_slice(file.name.as_bytes());
            out.write_u8(0).unwrap();
        }

        let reserve = vec![0xa5u8; self.data_reserve_size as usize];
        for folder in self.folders.iter() {
            for block in folder.blocks.iter() {
                let mut checksum = cabset::checksum::data_block(
                    block.data.len() as u16,
                    block.uncompressed_size,
                    &reserve,
                    &block.data,
                );
                if self.bad_checksums {
                    checksum ^= 0xdead_beef;
                }
                out.write_u32::<LittleEndian>(checksum).unwrap();
                out.write_u16::<LittleEndian>(block.data.len() as u16)
                    .unwrap();
                out.write_u16::<LittleEndian>(block.uncompressed_size)
                    .unwrap();
                out.extend_from_slice(&reserve);
                out.extend_from_slice(&block.data);
            }
        }
        assert_eq!(out.len(), total_size);
        out
    }
}

// ========================================================================= //

/// A reader that records the offset of every absolute seek, which is how
/// data blocks are located.
#[derive(Clone)]
pub struct TracingReader {
    inner: Cursor<Vec<u8>>,
    seeks: Arc<Mutex<Vec<u64>>>,
}

impl TracingReader {
    pub fn new(bytes: Vec<u8>) -> TracingReader {
        TracingReader {
            inner: Cursor::new(bytes),
            seeks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns a handle on the recorded offsets.
    pub fn seeks(&self) -> Arc<Mutex<Vec<u64>>> {
        self.seeks.clone()
    }
}

impl Read for TracingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for TracingReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if let SeekFrom::Start(offset) = pos {
            self.seeks.lock().push(offset);
        }
        self.inner.seek(pos)
    }
}

/// Resolves a set from in-memory cabinets, starting at `first`.
pub fn resolve_in_memory(
    cabinets: &[(&str, Vec<u8>)],
    first: &str,
) -> io::Result<cabset::CabinetSet<Cursor<Vec<u8>>>> {
    let lookup = |name: &str| {
        cabinets
            .iter()
            .find(|(cab_name, _)| *cab_name == name)
            .map(|(_, bytes)| Cursor::new(bytes.clone()))
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name))
    };
    let reader = lookup(first)?;
    cabset::CabinetSet::resolve(first, reader, lookup)
}

/// Like [`resolve_in_memory`], but every reader shares one seek log.
pub fn resolve_traced(
    cabinets: &[(&str, Vec<u8>)],
    first: &str,
) -> (cabset::CabinetSet<TracingReader>, Arc<Mutex<Vec<u64>>>) {
    let seeks = Arc::new(Mutex::new(Vec::new()));
    let lookup = |name: &str| {
        cabinets
            .iter()
            .find(|(cab_name, _)| *cab_name == name)
            .map(|(_, bytes)| TracingReader {
                inner: Cursor::new(bytes.clone()),
                seeks: seeks.clone(),
            })
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name))
    };
    let reader = lookup(first).unwrap();
    let set = cabset::CabinetSet::resolve(first, reader, lookup).unwrap();
    seeks.lock().clear();
    (set, seeks)
}
