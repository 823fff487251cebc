use std::io::{self, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use time::PrimitiveDateTime;

use crate::consts;
use crate::string::read_null_terminated_string;

/// The folder a file entry belongs to.  Besides plain indices, the format
/// reserves a few values for files whose data crosses a cabinet boundary;
/// those refer to a folder shared with the adjacent cabinet.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum FolderIndex {
    /// The first folder (raw value 0).
    First,
    /// A folder of this cabinet.
    Literal(u16),
    /// The file started in the previous cabinet and finishes in this
    /// cabinet's first folder.
    ContinuedFromPrev,
    /// The file starts in this cabinet's last folder and continues into the
    /// next cabinet.
    ContinuedToNext,
    /// The file started in the previous cabinet, runs through this
    /// cabinet's only folder and continues into the next cabinet.
    ContinuedPrevAndNext,
}

impl FolderIndex {
    pub(crate) fn from_bits(bits: u16) -> FolderIndex {
        match bits {
            consts::IFOLD_FIRST => FolderIndex::First,
            consts::IFOLD_CONTINUED_FROM_PREV => {
                FolderIndex::ContinuedFromPrev
            }
            consts::IFOLD_CONTINUED_TO_NEXT => FolderIndex::ContinuedToNext,
            consts::IFOLD_CONTINUED_PREV_AND_NEXT => {
                FolderIndex::ContinuedPrevAndNext
            }
            index => FolderIndex::Literal(index),
        }
    }

    /// Returns true if this entry repeats a file whose data began in the
    /// previous cabinet.
    pub fn is_continued_from_prev(self) -> bool {
        matches!(
            self,
            FolderIndex::ContinuedFromPrev | FolderIndex::ContinuedPrevAndNext
        )
    }

    /// Returns true if this file's data runs on into the next cabinet.
    pub fn is_continued_to_next(self) -> bool {
        matches!(
            self,
            FolderIndex::ContinuedToNext | FolderIndex::ContinuedPrevAndNext
        )
    }

    /// Maps the entry onto a folder of a cabinet with `num_folders`
    /// folders, or `None` if that cabinet has no folder it could refer to.
    pub fn resolve(self, num_folders: usize) -> Option<usize> {
        let index = match self {
            FolderIndex::First
            | FolderIndex::ContinuedFromPrev
            | FolderIndex::ContinuedPrevAndNext => 0,
            FolderIndex::ContinuedToNext => num_folders.checked_sub(1)?,
            FolderIndex::Literal(index) => index as usize,
        };
        if index < num_folders {
            Some(index)
        } else {
            None
        }
    }
}

/// Metadata about one file stored in a cabinet.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FileEntry {
    name: String,
    datetime: Option<PrimitiveDateTime>,
    uncompressed_size: u32,
    uncompressed_offset: u32,
    folder_index: FolderIndex,
    attributes: u16,
}

impl FileEntry {
    /// Returns the name of file.  Directory components may be separated by
    /// either `\` or `/`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the datetime for this file.  According to the MS-CAB format,
    /// this "is typically considered the 'last modified' time in local time,
    /// but the actual definition is application-defined."
    ///
    /// Note that this will return [`None`] if the datetime in the cabinet file
    /// was zero or not a valid date/time.
    pub fn datetime(&self) -> Option<PrimitiveDateTime> {
        self.datetime
    }

    /// Returns the total size of the file when decompressed, in bytes.
    pub fn uncompressed_size(&self) -> u32 {
        self.uncompressed_size
    }

    /// Returns the offset of the file's data within its folder's
    /// decompressed stream.
    pub fn uncompressed_offset(&self) -> u32 {
        self.uncompressed_offset
    }

    /// Returns the folder this file's data lives in.
    pub fn folder_index(&self) -> FolderIndex {
        self.folder_index
    }

    /// Returns true if this file has the "read-only" attribute set.
    pub fn is_read_only(&self) -> bool {
        (self.attributes & consts::ATTR_READ_ONLY) != 0
    }

    /// Returns true if this file has the "hidden" attribute set.
    pub fn is_hidden(&self) -> bool {
        (self.attributes & consts::ATTR_HIDDEN) != 0
    }

    /// Returns true if this file has the "system file" attribute set.
    pub fn is_system(&self) -> bool {
        (self.attributes & consts::ATTR_SYSTEM) != 0
    }

    /// Returns true if this file has the "archive" (modified since last
    /// backup) attribute set.
    pub fn is_archive(&self) -> bool {
        (self.attributes & consts::ATTR_ARCH) != 0
    }

    /// Returns true if this file has the "execute after extraction" attribute
    /// set.
    pub fn is_exec(&self) -> bool {
        (self.attributes & consts::ATTR_EXEC) != 0
    }

    /// Returns true if this file has the "name is UTF" attribute set.
    pub fn is_name_utf(&self) -> bool {
        (self.attributes & consts::ATTR_NAME_IS_UTF) != 0
    }
}

pub(crate) fn parse_file_entry<R: Read>(
    mut reader: R,
) -> io::Result<FileEntry> {
    let uncompressed_size = reader.read_u32::<LittleEndian>()?;
    let uncompressed_offset = reader.read_u32::<LittleEndian>()?;
    let folder_index = reader.read_u16::<LittleEndian>()?;
    let date = reader.read_u16::<LittleEndian>()?;
    let time = reader.read_u16::<LittleEndian>()?;
    let attributes = reader.read_u16::<LittleEndian>()?;
    let is_utf8 = (attributes & consts::ATTR_NAME_IS_UTF) != 0;
    let name = read_null_terminated_string(&mut reader, is_utf8)?;
    Ok(FileEntry {
        name,
        datetime: datetime_from_bits(date, time),
        uncompressed_size,
        uncompressed_offset,
        folder_index: FolderIndex::from_bits(folder_index),
        attributes,
    })
}

// Date is YYYYYYYM MMMDDDDD (years since 1980), time is HHHHHMMM MMMSSSSS
// (seconds halved).
fn datetime_from_bits(date: u16, time: u16) -> Option<PrimitiveDateTime> {
    if date == 0 && time == 0 {
        return None;
    }
    let year = (date >> 9) as i32 + 1980;
    let month = (((date >> 5) & 0xf) as u8).try_into().ok()?;
    let day = (date & 0x1f) as u8;
    let hour = (time >> 11) as u8;
    let minute = ((time >> 5) & 0x3f) as u8;
    let second = 2 * (time & 0x1f) as u8;
    Some(PrimitiveDateTime::new(
        time::Date::from_calendar_date(year, month, day).ok()?,
        time::Time::from_hms(hour, minute, second).ok()?,
    ))
}
