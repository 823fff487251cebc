use std::fs::{self, File};
use std::io::{self, ErrorKind, Read, Seek};
use std::path::Path;

use parking_lot::Mutex;

use crate::block::{read_data_block, DataBlock};
use crate::cabinet::Cabinet;
use crate::file::FileEntry;

/// One physical cabinet within a [`CabinetSet`].
pub struct Volume<R> {
    name: String,
    cabinet: Cabinet,
    reader: Mutex<R>,
    prev: Option<usize>,
    next: Option<usize>,
}

impl<R> Volume<R> {
    fn new(name: &str, cabinet: Cabinet, reader: R) -> Volume<R> {
        Volume {
            name: name.to_string(),
            cabinet,
            reader: Mutex::new(reader),
            prev: None,
            next: None,
        }
    }

    /// Returns the name this cabinet was opened under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parsed tables of this cabinet.
    pub fn cabinet(&self) -> &Cabinet {
        &self.cabinet
    }

    /// Returns the index of the previous volume within the set, if it was
    /// found.
    pub fn prev(&self) -> Option<usize> {
        self.prev
    }

    /// Returns the index of the next volume within the set, if it was found.
    pub fn next(&self) -> Option<usize> {
        self.next
    }
}

impl<R: Read + Seek> Volume<R> {
    /// Reads the data block at `offset` (relative to the cabinet start) and
    /// returns it with the relative offset of the following block.  The
    /// reader is locked only for the duration of the read.
    pub(crate) fn read_block(
        &self,
        offset: u64,
    ) -> io::Result<(DataBlock, u64)> {
        let base = self.cabinet.base_offset();
        let reserve_size = self.cabinet.header().data_reserve_size() as usize;
        let (block, next) = {
            let mut reader = self.reader.lock();
            read_data_block(&mut *reader, base + offset, reserve_size)?
        };
        Ok((block, next - base))
    }
}

/// A group of cabinets linked through the `prev`/`next` names in their
/// headers.  Volumes are stored in the order they were opened; the chain
/// order is available through [`CabinetSet::iter`].
pub struct CabinetSet<R> {
    volumes: Vec<Volume<R>>,
    start: usize,
}

impl CabinetSet<File> {
    /// Opens the cabinet at `path` along with every cabinet of its set that
    /// can be found in the same directory.  A sibling whose exact name is
    /// missing may be matched case-insensitively.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<CabinetSet<File>> {
        let path = path.as_ref();
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => invalid_input!("Not a cabinet path: {}", path.display()),
        };
        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        let file = File::open(path)?;
        CabinetSet::resolve(&name, file, |sibling| open_sibling(dir, sibling))
    }
}

impl<R: Read + Seek> CabinetSet<R> {
    /// Creates a set holding a single cabinet, without following any links.
    pub fn single(name: &str, mut reader: R) -> io::Result<CabinetSet<R>> {
        let cabinet = Cabinet::parse(&mut reader)?;
        let volume = Volume::new(name, cabinet, reader);
        Ok(CabinetSet { volumes: vec![volume], start: 0 })
    }

    /// Parses the cabinet in `reader`, then follows its links backwards and
    /// forwards, opening each sibling through `open_sibling`.  A failure to
    /// parse the first cabinet is an error; a sibling that cannot be opened
    /// or parsed merely ends the chain in that direction.
    pub fn resolve<F>(
        name: &str,
        reader: R,
        mut open_sibling: F,
    ) -> io::Result<CabinetSet<R>>
    where
        F: FnMut(&str) -> io::Result<R>,
    {
        let mut set = CabinetSet::single(name, reader)?;

        let mut current = 0;
        while let Some(link) = set.volumes[current].cabinet.header().prev() {
            let sibling = link.cabinet_name().to_string();
            match set.load_sibling(&sibling, &mut open_sibling) {
                Some(index) => {
                    set.link(index, current);
                    current = index;
                }
                None => break,
            }
        }
        set.start = current;

        let mut current = 0;
        while let Some(link) = set.volumes[current].cabinet.header().next() {
            let sibling = link.cabinet_name().to_string();
            match set.load_sibling(&sibling, &mut open_sibling) {
                Some(index) => {
                    set.link(current, index);
                    current = index;
                }
                None => break,
            }
        }
        log::debug!(
            "Resolved {} cabinet(s) starting at {:?}",
            set.volumes.len(),
            set.volumes[set.start].name
        );
        Ok(set)
    }

    fn load_sibling<F>(&mut self, name: &str, open: &mut F) -> Option<usize>
    where
        F: FnMut(&str) -> io::Result<R>,
    {
        if self.volumes.iter().any(|v| v.name.eq_ignore_ascii_case(name)) {
            log::warn!("Cabinet {:?} is linked twice; stopping here", name);
            return None;
        }
        let mut reader = match open(name) {
            Ok(reader) => reader,
            Err(error) => {
                log::warn!("Cannot open cabinet {:?}: {}", name, error);
                return None;
            }
        };
        match Cabinet::parse(&mut reader) {
            Ok(cabinet) => {
                self.volumes.push(Volume::new(name, cabinet, reader));
                Some(self.volumes.len() - 1)
            }
            Err(error) => {
                log::warn!("Cannot parse cabinet {:?}: {}", name, error);
                None
            }
        }
    }
}

impl<R> CabinetSet<R> {
    fn link(&mut self, prev: usize, next: usize) {
        let prev_id = self.volumes[prev].cabinet.header().set_id();
        let next_id = self.volumes[next].cabinet.header().set_id();
        if prev_id != next_id {
            log::warn!(
                "Cabinets {:?} and {:?} have different set IDs \
                 (0x{:04x} and 0x{:04x})",
                self.volumes[prev].name,
                self.volumes[next].name,
                prev_id,
                next_id
            );
        }
        self.volumes[prev].next = Some(next);
        self.volumes[next].prev = Some(prev);
    }

    /// Returns every volume of the set, in the order they were opened.
    pub fn volumes(&self) -> &[Volume<R>] {
        &self.volumes
    }

    /// Returns the index of the earliest volume found.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Iterates over the volumes in chain order, from the earliest one.
    pub fn iter(&self) -> impl Iterator<Item = &Volume<R>> + '_ {
        std::iter::successors(Some(self.start), move |&index| {
            self.volumes[index].next
        })
        .map(move |index| &self.volumes[index])
    }

    /// Returns true if the chain neither begins nor ends with a link to a
    /// cabinet that could not be found.
    pub fn is_complete(&self) -> bool {
        let first = &self.volumes[self.start];
        let last = self.iter().last().unwrap_or(first);
        first.cabinet.header().prev().is_none()
            && last.cabinet.header().next().is_none()
    }

    /// Iterates over the logical files of the set in chain order.  A file
    /// that spans cabinets is listed once, under the cabinet where it
    /// starts.
    pub fn file_entries(&self) -> impl Iterator<Item = &FileEntry> + '_ {
        self.iter().flat_map(|volume| {
            volume
                .cabinet
                .file_entries()
                .iter()
                .filter(|file| !file.folder_index().is_continued_from_prev())
        })
    }
}

fn open_sibling(dir: &Path, name: &str) -> io::Result<File> {
    match File::open(dir.join(name)) {
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        result => return result,
    }
    let search_dir =
        if dir.as_os_str().is_empty() { Path::new(".") } else { dir };
    for entry in fs::read_dir(search_dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().eq_ignore_ascii_case(name) {
            return File::open(entry.path());
        }
    }
    not_found!("No cabinet named {:?} in {}", name, search_dir.display())
}
