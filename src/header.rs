use std::io::{self, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::consts;
use crate::string::read_null_terminated_string;

/// A reference from one cabinet to an adjacent cabinet of the same set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CabinetLink {
    cabinet_name: String,
    disk_name: String,
}

impl CabinetLink {
    /// Returns the file name of the linked cabinet.
    pub fn cabinet_name(&self) -> &str {
        &self.cabinet_name
    }

    /// Returns the human-readable name of the disk holding the linked
    /// cabinet.
    pub fn disk_name(&self) -> &str {
        &self.disk_name
    }
}

/// The fixed header at the start of a cabinet file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CabinetHeader {
    pub(crate) total_size: u32,
    pub(crate) first_file_offset: u32,
    pub(crate) version: (u8, u8),
    pub(crate) num_folders: u16,
    pub(crate) num_files: u16,
    pub(crate) flags: u16,
    pub(crate) set_id: u16,
    pub(crate) set_index: u16,
    pub(crate) reserve_data: Vec<u8>,
    pub(crate) folder_reserve_size: u8,
    pub(crate) data_reserve_size: u8,
    pub(crate) prev: Option<CabinetLink>,
    pub(crate) next: Option<CabinetLink>,
}

impl CabinetHeader {
    /// Returns the size of the whole cabinet file in bytes, as recorded in
    /// the header.
    pub fn total_size(&self) -> u32 {
        self.total_size
    }

    /// Returns the format version as `(major, minor)`.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Returns the raw header flags.
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Returns the cabinet set ID for this cabinet (an arbitrary number used
    /// to group together a set of cabinets).
    pub fn set_id(&self) -> u16 {
        self.set_id
    }

    /// Returns this cabinet's (zero-based) index within its cabinet set.
    pub fn set_index(&self) -> u16 {
        self.set_index
    }

    /// Returns the application-defined reserve data stored in the cabinet
    /// header.
    pub fn reserve_data(&self) -> &[u8] {
        &self.reserve_data
    }

    /// Returns the number of reserve bytes at the end of each folder entry.
    pub fn folder_reserve_size(&self) -> u8 {
        self.folder_reserve_size
    }

    /// Returns the number of reserve bytes in each data block header.
    pub fn data_reserve_size(&self) -> u8 {
        self.data_reserve_size
    }

    /// Returns the link to the previous cabinet of the set, if any.
    pub fn prev(&self) -> Option<&CabinetLink> {
        self.prev.as_ref()
    }

    /// Returns the link to the next cabinet of the set, if any.
    pub fn next(&self) -> Option<&CabinetLink> {
        self.next.as_ref()
    }
}

pub(crate) fn parse_header<R: Read>(
    mut reader: R,
) -> io::Result<CabinetHeader> {
    let signature = reader.read_u32::<LittleEndian>()?;
    if signature != consts::FILE_SIGNATURE {
        invalid_data!("Not a cabinet file (invalid file signature)");
    }
    let _reserved1 = reader.read_u32::<LittleEndian>()?;
    let total_size = reader.read_u32::<LittleEndian>()?;
    if total_size > consts::MAX_TOTAL_CAB_SIZE {
        invalid_data!(
            "Cabinet total size field is too large \
             ({} bytes; max is {} bytes)",
            total_size,
            consts::MAX_TOTAL_CAB_SIZE
        );
    }
    let _reserved2 = reader.read_u32::<LittleEndian>()?;
    let first_file_offset = reader.read_u32::<LittleEndian>()?;
    let _reserved3 = reader.read_u32::<LittleEndian>()?;
    let minor_version = reader.read_u8()?;
    let major_version = reader.read_u8()?;
    if major_version > consts::VERSION_MAJOR
        || major_version == consts::VERSION_MAJOR
            && minor_version > consts::VERSION_MINOR
    {
        invalid_data!(
            "Version {}.{} cabinet files are not supported",
            major_version,
            minor_version
        );
    }
    let num_folders = reader.read_u16::<LittleEndian>()?;
    let num_files = reader.read_u16::<LittleEndian>()?;
    let flags = reader.read_u16::<LittleEndian>()?;
    let set_id = reader.read_u16::<LittleEndian>()?;
    let set_index = reader.read_u16::<LittleEndian>()?;
    let mut header_reserve_size = 0u16;
    let mut folder_reserve_size = 0u8;
    let mut data_reserve_size = 0u8;
    if (flags & consts::FLAG_RESERVE_PRESENT) != 0 {
        header_reserve_size = reader.read_u16::<LittleEndian>()?;
        folder_reserve_size = reader.read_u8()?;
        data_reserve_size = reader.read_u8()?;
    }
    let mut reserve_data = vec![0u8; header_reserve_size as usize];
    if header_reserve_size > 0 {
        reader.read_exact(&mut reserve_data)?;
    }
    let prev = if (flags & consts::FLAG_PREV_CABINET) != 0 {
        Some(parse_link(&mut reader)?)
    } else {
        None
    };
    let next = if (flags & consts::FLAG_NEXT_CABINET) != 0 {
        Some(parse_link(&mut reader)?)
    } else {
        None
    };
    Ok(CabinetHeader {
        total_size,
        first_file_offset,
        version: (major_version, minor_version),
        num_folders,
        num_files,
        flags,
        set_id,
        set_index,
        reserve_data,
        folder_reserve_size,
        data_reserve_size,
        prev,
        next,
    })
}

fn parse_link<R: Read>(reader: &mut R) -> io::Result<CabinetLink> {
    let cabinet_name = read_null_terminated_string(reader, false)?;
    let disk_name = read_null_terminated_string(reader, false)?;
    Ok(CabinetLink { cabinet_name, disk_name })
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use super::parse_header;

    #[test]
    fn plain_header() {
        let bytes: &[u8] = b"MSCF\0\0\0\0\x59\0\0\0\0\0\0\0\
            \x2c\0\0\0\0\0\0\0\x03\x01\x01\0\x01\0\0\0\x34\x12\0\0";
        let header = parse_header(bytes).unwrap();
        assert_eq!(header.total_size(), 0x59);
        assert_eq!(header.first_file_offset, 0x2c);
        assert_eq!(header.version(), (1, 3));
        assert_eq!(header.num_folders, 1);
        assert_eq!(header.num_files, 1);
        assert_eq!(header.set_id(), 0x1234);
        assert_eq!(header.set_index(), 0);
        assert!(header.reserve_data().is_empty());
        assert!(header.prev().is_none());
        assert!(header.next().is_none());
    }

    #[test]
    fn header_with_reserve_and_links() {
        let bytes: &[u8] = b"MSCF\0\0\0\0\0\x01\0\0\0\0\0\0\
            \x60\0\0\0\0\0\0\0\x03\x01\x01\0\x02\0\x07\0\x34\x12\x01\0\
            \x03\0\x02\x04abc\
            one.cab\0Disk 1\0three.cab\0Disk 3\0";
        let header = parse_header(bytes).unwrap();
        assert_eq!(header.set_index(), 1);
        assert_eq!(header.reserve_data(), b"abc");
        assert_eq!(header.folder_reserve_size(), 2);
        assert_eq!(header.data_reserve_size(), 4);
        let prev = header.prev().unwrap();
        assert_eq!(prev.cabinet_name(), "one.cab");
        assert_eq!(prev.disk_name(), "Disk 1");
        let next = header.next().unwrap();
        assert_eq!(next.cabinet_name(), "three.cab");
        assert_eq!(next.disk_name(), "Disk 3");
    }

    #[test]
    fn bad_signature() {
        let bytes: &[u8] = b"MSCX\0\0\0\0\x59\0\0\0\0\0\0\0\
            \x2c\0\0\0\0\0\0\0\x03\x01\x01\0\x01\0\0\0\x34\x12\0\0";
        let error = parse_header(bytes).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn newer_version_is_rejected() {
        let bytes: &[u8] = b"MSCF\0\0\0\0\x59\0\0\0\0\0\0\0\
            \x2c\0\0\0\0\0\0\0\x04\x01\x01\0\x01\0\0\0\x34\x12\0\0";
        let error = parse_header(bytes).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn oversized_total_is_rejected() {
        let bytes: &[u8] = b"MSCF\0\0\0\0\0\0\0\x80\0\0\0\0\
            \x2c\0\0\0\0\0\0\0\x03\x01\x01\0\x01\0\0\0\x34\x12\0\0";
        let error = parse_header(bytes).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn truncated_header() {
        let bytes: &[u8] = b"MSCF\0\0\0\0\x59\0\0\0";
        let error = parse_header(bytes).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::UnexpectedEof);
    }
}
