use std::io::{self, Read, Seek, SeekFrom};

use crate::file::{parse_file_entry, FileEntry, FolderIndex};
use crate::folder::{parse_folder_entry, FolderEntry};
use crate::header::{parse_header, CabinetHeader};

/// The parsed tables of one physical cabinet file.  Parsing never touches
/// data blocks; they are read on demand during extraction.
#[derive(Clone, Debug)]
pub struct Cabinet {
    header: CabinetHeader,
    folders: Vec<FolderEntry>,
    files: Vec<FileEntry>,
    base_offset: u64,
}

impl Cabinet {
    /// Parses a cabinet starting at the reader's current position.  All
    /// offsets stored in the cabinet are taken relative to that position, so
    /// a cabinet embedded in a larger stream can be read in place.
    pub fn parse<R: Read + Seek>(reader: &mut R) -> io::Result<Cabinet> {
        let base_offset = reader.stream_position()?;
        let stream_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(base_offset))?;

        let header = parse_header(&mut *reader)?;
        let folder_reserve_size = header.folder_reserve_size as usize;
        let mut folders = Vec::with_capacity(header.num_folders as usize);
        for _ in 0..header.num_folders {
            let entry = parse_folder_entry(&mut *reader, folder_reserve_size)?;
            if entry.num_data_blocks() > 0
                && base_offset + entry.first_data_block_offset() as u64
                    >= stream_len
            {
                invalid_data!(
                    "Folder data offset 0x{:x} is past the end of the \
                     cabinet ({} bytes)",
                    entry.first_data_block_offset(),
                    stream_len - base_offset
                );
            }
            folders.push(entry);
        }

        let first_file_offset = base_offset + header.first_file_offset as u64;
        if first_file_offset > stream_len {
            invalid_data!(
                "File table offset 0x{:x} is past the end of the cabinet \
                 ({} bytes)",
                header.first_file_offset,
                stream_len - base_offset
            );
        }
        reader.seek(SeekFrom::Start(first_file_offset))?;
        let mut files = Vec::with_capacity(header.num_files as usize);
        for _ in 0..header.num_files {
            let entry = parse_file_entry(&mut *reader)?;
            if let FolderIndex::Literal(index) = entry.folder_index() {
                if index as usize >= folders.len() {
                    invalid_data!(
                        "File entry {:?} refers to folder {} but the cabinet \
                         has only {} folders",
                        entry.name(),
                        index,
                        folders.len()
                    );
                }
            }
            files.push(entry);
        }
        Ok(Cabinet { header, folders, files, base_offset })
    }

    /// Returns the cabinet's header.
    pub fn header(&self) -> &CabinetHeader {
        &self.header
    }

    /// Returns the folder entries of this cabinet, in table order.
    pub fn folder_entries(&self) -> &[FolderEntry] {
        &self.folders
    }

    /// Returns the file entries of this cabinet, in table order, including
    /// entries that merely repeat a file begun in the previous cabinet.
    pub fn file_entries(&self) -> &[FileEntry] {
        &self.files
    }

    /// Returns the entry for the file with the given name, if any.
    pub fn get_file_entry(&self, name: &str) -> Option<&FileEntry> {
        self.files.iter().find(|&file| file.name() == name)
    }

    /// Returns the position in the underlying stream at which the cabinet
    /// starts.
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Iterates over the entries whose data lives in the given folder.
    pub(crate) fn files_in_folder(
        &self,
        folder: usize,
    ) -> impl Iterator<Item = &FileEntry> + '_ {
        let num_folders = self.folders.len();
        self.files.iter().filter(move |file| {
            file.folder_index().resolve(num_folders) == Some(folder)
        })
    }

    /// True if this cabinet's first folder began in the previous cabinet.
    pub(crate) fn starts_continued(&self) -> bool {
        self.files
            .iter()
            .any(|file| file.folder_index().is_continued_from_prev())
    }

    /// True if this cabinet's last folder runs on into the next cabinet.
    pub(crate) fn ends_continued(&self) -> bool {
        self.files
            .iter()
            .any(|file| file.folder_index().is_continued_to_next())
    }
}
