use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io::{self, ErrorKind, Read, Seek};
use std::path::Path;

use crate::block::DataBlock;
use crate::ctype::{CompressionType, Decompressor};
use crate::file::FileEntry;
use crate::set::CabinetSet;
use crate::sink::{DirectorySink, Sink};

// ========================================================================= //

/// Settings for an extraction run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExtractOptions {
    verify_checksums: bool,
    allow_short_blocks: bool,
}

impl ExtractOptions {
    /// Returns the default options: checksums are not verified and short
    /// MSZIP blocks are zero-padded.
    pub fn new() -> ExtractOptions {
        ExtractOptions { verify_checksums: false, allow_short_blocks: true }
    }

    /// Sets whether data block checksums are verified.  Mismatches are only
    /// ever logged; they do not stop extraction.
    pub fn verify_checksums(mut self, verify: bool) -> ExtractOptions {
        self.verify_checksums = verify;
        self
    }

    /// Sets whether an MSZIP block that inflates to fewer bytes than it
    /// declares is padded with zeros (the default) or fails its folder.
    pub fn allow_short_blocks(mut self, allow: bool) -> ExtractOptions {
        self.allow_short_blocks = allow;
        self
    }

    /// Returns true if data block checksums will be verified.
    pub fn verifies_checksums(&self) -> bool {
        self.verify_checksums
    }

    /// Returns true if short MSZIP blocks will be padded.
    pub fn allows_short_blocks(&self) -> bool {
        self.allow_short_blocks
    }
}

impl Default for ExtractOptions {
    fn default() -> ExtractOptions {
        ExtractOptions::new()
    }
}

// ========================================================================= //

/// What happened to one logical folder during extraction.
#[derive(Debug)]
pub enum FolderStatus {
    /// Every file of the folder was written out.
    Extracted,
    /// The folder has no files of its own.
    Empty,
    /// The folder uses a compression scheme this crate cannot decode; none
    /// of its files were written.
    Unsupported(CompressionType),
    /// Extraction stopped partway; files already written are left in place.
    Failed(io::Error),
}

/// The outcome for one logical folder, which may span several cabinets.
#[derive(Debug)]
pub struct FolderReport {
    volume: String,
    folder: usize,
    num_cabinets: usize,
    num_files: usize,
    status: FolderStatus,
}

impl FolderReport {
    /// Returns the name of the cabinet in which the folder starts.
    pub fn volume(&self) -> &str {
        &self.volume
    }

    /// Returns the folder's index within that cabinet.
    pub fn folder_index(&self) -> usize {
        self.folder
    }

    /// Returns the number of cabinets the folder's data is stored in.
    pub fn num_cabinets(&self) -> usize {
        self.num_cabinets
    }

    /// Returns the number of files stored in the folder.
    pub fn num_files(&self) -> usize {
        self.num_files
    }

    /// Returns what happened to the folder.
    pub fn status(&self) -> &FolderStatus {
        &self.status
    }
}

impl fmt::Display for FolderReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} folder {}: ", self.volume, self.folder)?;
        match self.status {
            FolderStatus::Extracted => {
                write!(f, "extracted {} file(s)", self.num_files)
            }
            FolderStatus::Empty => f.write_str("empty"),
            FolderStatus::Unsupported(ctype) => {
                write!(f, "skipped ({} compression)", ctype)
            }
            FolderStatus::Failed(ref error) => write!(f, "failed: {}", error),
        }
    }
}

/// The per-folder outcome of extracting a cabinet set.
#[derive(Debug, Default)]
pub struct ExtractReport {
    folders: Vec<FolderReport>,
}

impl ExtractReport {
    /// Returns the report for each logical folder, in extraction order.
    pub fn folders(&self) -> &[FolderReport] {
        &self.folders
    }

    /// Returns the reports of folders that failed.
    pub fn failures(&self) -> impl Iterator<Item = &FolderReport> + '_ {
        self.folders
            .iter()
            .filter(|report| matches!(report.status, FolderStatus::Failed(_)))
    }

    /// Returns the number of folders that were fully extracted.
    pub fn num_extracted(&self) -> usize {
        self.count(|status| matches!(status, FolderStatus::Extracted))
    }

    /// Returns true if no folder failed and something was extracted.  A set
    /// whose folders are all empty counts as a success; one whose folders
    /// were all skipped as unsupported does not.
    pub fn is_success(&self) -> bool {
        let failed = self.count(|s| matches!(s, FolderStatus::Failed(_)));
        let skipped =
            self.count(|s| matches!(s, FolderStatus::Unsupported(_)));
        failed == 0 && (self.num_extracted() > 0 || skipped == 0)
    }

    fn count<F: Fn(&FolderStatus) -> bool>(&self, predicate: F) -> usize {
        self.folders.iter().filter(|report| predicate(&report.status)).count()
    }
}

// ========================================================================= //

impl<R: Read + Seek> CabinetSet<R> {
    /// Extracts every folder of the set into `dir`, which is created if
    /// needed.  Only a failure to create the directory is returned as an
    /// error; everything else is recorded in the report.
    pub fn extract_to<P: AsRef<Path>>(
        &self,
        dir: P,
        options: &ExtractOptions,
    ) -> io::Result<ExtractReport> {
        fs::create_dir_all(dir.as_ref())?;
        let mut sink = DirectorySink::new(dir);
        Ok(self.extract(&mut sink, options))
    }

    /// Extracts every folder of the set into `sink`, walking the volumes
    /// in chain order.  A folder that fails does not stop the others.
    pub fn extract<S: Sink + ?Sized>(
        &self,
        sink: &mut S,
        options: &ExtractOptions,
    ) -> ExtractReport {
        let mut report = ExtractReport::default();
        let mut consumed = HashSet::<(usize, usize)>::new();
        let mut decompressors = HashMap::new();
        for index in self.extraction_order() {
            let num_folders =
                self.volumes()[index].cabinet().folder_entries().len();
            for folder in 0..num_folders {
                if consumed.contains(&(index, folder)) {
                    continue;
                }
                let span = Span::gather(self, index, folder);
                consumed.extend(span.pieces.iter().copied());
                let status = self.extract_span(
                    &span,
                    sink,
                    options,
                    &mut decompressors,
                );
                let folder_report = span.report(self, status);
                match folder_report.status {
                    FolderStatus::Failed(_) => {
                        log::warn!("{}", folder_report)
                    }
                    _ => log::debug!("{}", folder_report),
                }
                report.folders.push(folder_report);
            }
        }
        report
    }

    /// Volume indices in chain order from the start, stopping before the
    /// first later cabinet that has no folders.
    fn extraction_order(&self) -> impl Iterator<Item = usize> + '_ {
        let start = self.start();
        std::iter::successors(Some(start), move |&index| {
            self.volumes()[index].next()
        })
        .take_while(move |&index| {
            index == start
                || !self.volumes()[index].cabinet().folder_entries().is_empty()
        })
    }

    /// Returns the contents of the named file, following its data into
    /// later cabinets if needed.  Only the blocks up to the end of the file
    /// are read.
    pub fn read_file(&self, name: &str) -> io::Result<Vec<u8>> {
        let (index, target) = match self.locate(name) {
            Some(found) => found,
            None => not_found!("No such file in cabinet set: {:?}", name),
        };
        let num_folders =
            self.volumes()[index].cabinet().folder_entries().len();
        let folder = match target.folder_index().resolve(num_folders) {
            Some(folder) => folder,
            None => invalid_data!("File {:?} has no folder", name),
        };
        let mut span = Span::gather(self, index, folder);
        let position =
            span.files.iter().position(|&file| std::ptr::eq(file, target));
        match position {
            Some(position) => span.files.truncate(position + 1),
            None => invalid_data!("File {:?} is not part of its folder", name),
        }
        let mut sink = Capture { target, data: None, capturing: false };
        let mut decompressors = HashMap::new();
        let options = ExtractOptions::new();
        match self.extract_span(&span, &mut sink, &options, &mut decompressors)
        {
            FolderStatus::Extracted | FolderStatus::Empty => {
                Ok(sink.data.unwrap_or_default())
            }
            FolderStatus::Unsupported(ctype) => {
                unsupported!("Cannot read {:?}: {} compression", name, ctype)
            }
            FolderStatus::Failed(error) => Err(error),
        }
    }

    fn locate(&self, name: &str) -> Option<(usize, &FileEntry)> {
        self.extraction_order().find_map(|index| {
            let cabinet = self.volumes()[index].cabinet();
            cabinet
                .file_entries()
                .iter()
                .find(|file| {
                    file.name() == name
                        && !file.folder_index().is_continued_from_prev()
                })
                .map(|file| (index, file))
        })
    }

    fn extract_span<S: Sink + ?Sized>(
        &self,
        span: &Span<'_>,
        sink: &mut S,
        options: &ExtractOptions,
        decompressors: &mut HashMap<CompressionType, Decompressor>,
    ) -> FolderStatus {
        if span.missing_prev {
            return FolderStatus::Failed(io::Error::new(
                ErrorKind::NotFound,
                "Folder begins in a previous cabinet that was not found",
            ));
        }
        if span.files.is_empty() {
            return FolderStatus::Empty;
        }
        let (first_volume, first_folder) = span.pieces[0];
        let entry = &self.volumes()[first_volume].cabinet().folder_entries()
            [first_folder];
        let ctype = entry.compression_type();
        if !ctype.is_supported() {
            return FolderStatus::Unsupported(ctype);
        }
        let decompressor = match decompressors.entry(ctype) {
            Entry::Occupied(slot) => {
                let decompressor = slot.into_mut();
                decompressor.reset();
                decompressor
            }
            Entry::Vacant(slot) => {
                match ctype.decompressor() {
                    Ok(decompressor) => slot.insert(decompressor),
                    Err(error) => return FolderStatus::Failed(error),
                }
            }
        };
        let mut slicer = FileSlicer::new(sink, &span.files);
        let result = self.pump(span, &mut slicer, decompressor, options);
        match result {
            Ok(()) => FolderStatus::Extracted,
            Err(error) => {
                slicer.abandon();
                FolderStatus::Failed(error)
            }
        }
    }

    fn pump<S: Sink + ?Sized>(
        &self,
        span: &Span<'_>,
        slicer: &mut FileSlicer<'_, S>,
        decompressor: &mut Decompressor,
        options: &ExtractOptions,
    ) -> io::Result<()> {
        slicer.settle()?;
        if slicer.is_done() {
            return Ok(());
        }
        let (first_volume, first_folder) = span.pieces[0];
        let entry = &self.volumes()[first_volume].cabinet().folder_entries()
            [first_folder];
        if !entry.has_data() {
            invalid_data!(
                "Folder {} of {:?} has files but no data blocks",
                first_folder,
                self.volumes()[first_volume].name()
            );
        }
        let mut stream =
            FolderStream::new(self, &span.pieces, options.verify_checksums)?;
        while !slicer.is_done() {
            let block = match stream.next_block()? {
                Some(block) => block,
                None if span.cut_short => not_found!(
                    "Folder continues into a cabinet that was not found \
                     ({} bytes missing)",
                    slicer.pending()
                ),
                None => {
                    return Err(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        format!(
                            "Folder data ended {} bytes early",
                            slicer.pending()
                        ),
                    ))
                }
            };
            let size = block.uncompressed_size as usize;
            let data = decompressor.decompress(
                block.data,
                size,
                options.allow_short_blocks,
            )?;
            slicer.feed(&data)?;
        }
        Ok(())
    }
}

// ========================================================================= //

/// The pieces of one logical folder, in stream order, along with the files
/// stored in it.
struct Span<'a> {
    pieces: Vec<(usize, usize)>,
    files: Vec<&'a FileEntry>,
    missing_prev: bool,
    cut_short: bool,
}

impl<'a> Span<'a> {
    fn gather<R>(
        set: &'a CabinetSet<R>,
        volume: usize,
        folder: usize,
    ) -> Span<'a> {
        let volumes = set.volumes();
        let mut first = (volume, folder);
        let mut missing_prev = false;
        loop {
            let (index, folder) = first;
            let cabinet = volumes[index].cabinet();
            if folder != 0 || !cabinet.starts_continued() {
                break;
            }
            let prev = volumes[index].prev().and_then(|prev| {
                let num = volumes[prev].cabinet().folder_entries().len();
                num.checked_sub(1).map(|last| (prev, last))
            });
            match prev {
                Some(piece) => first = piece,
                None => {
                    missing_prev = true;
                    break;
                }
            }
        }

        let mut pieces = vec![first];
        let mut cut_short = false;
        loop {
            let (index, folder) = pieces[pieces.len() - 1];
            let cabinet = volumes[index].cabinet();
            if folder + 1 != cabinet.folder_entries().len() {
                break;
            }
            let continues = cabinet.ends_continued();
            let next = volumes[index].next().filter(|&next| {
                !volumes[next].cabinet().folder_entries().is_empty()
            });
            match next {
                Some(next)
                    if continues
                        || volumes[next].cabinet().starts_continued() =>
                {
                    pieces.push((next, 0));
                }
                Some(_) => break,
                None => {
                    cut_short = continues;
                    break;
                }
            }
        }

        let files = pieces
            .iter()
            .flat_map(move |&(index, folder)| {
                volumes[index].cabinet().files_in_folder(folder)
            })
            .filter(|file| !file.folder_index().is_continued_from_prev())
            .collect();
        Span { pieces, files, missing_prev, cut_short }
    }

    fn report<R>(
        &self,
        set: &CabinetSet<R>,
        status: FolderStatus,
    ) -> FolderReport {
        let (volume, folder) = self.pieces[0];
        FolderReport {
            volume: set.volumes()[volume].name().to_string(),
            folder,
            num_cabinets: self.pieces.len(),
            num_files: self.files.len(),
            status,
        }
    }
}

// ========================================================================= //

/// Reads the data blocks of a span in order, moving from one cabinet to the
/// next and joining blocks that were split between them.
struct FolderStream<'a, R> {
    set: &'a CabinetSet<R>,
    pieces: &'a [(usize, usize)],
    piece: usize,
    offset: u64,
    blocks_left: u16,
    verify_checksums: bool,
}

impl<'a, R: Read + Seek> FolderStream<'a, R> {
    fn new(
        set: &'a CabinetSet<R>,
        pieces: &'a [(usize, usize)],
        verify_checksums: bool,
    ) -> io::Result<FolderStream<'a, R>> {
        let mut stream = FolderStream {
            set,
            pieces,
            piece: 0,
            offset: 0,
            blocks_left: 0,
            verify_checksums,
        };
        stream.enter(0)?;
        Ok(stream)
    }

    fn enter(&mut self, piece: usize) -> io::Result<()> {
        let (volume, folder) = self.pieces[piece];
        let volume = &self.set.volumes()[volume];
        let entry = &volume.cabinet().folder_entries()[folder];
        if entry.num_data_blocks() > 0 && entry.first_data_block_offset() == 0
        {
            invalid_data!(
                "Folder {} of {:?} has no data offset",
                folder,
                volume.name()
            );
        }
        self.piece = piece;
        self.offset = entry.first_data_block_offset() as u64;
        self.blocks_left = entry.num_data_blocks();
        Ok(())
    }

    /// Returns the next whole block, or `None` once every piece is used up.
    fn next_block(&mut self) -> io::Result<Option<DataBlock>> {
        while self.blocks_left == 0 {
            if self.piece + 1 >= self.pieces.len() {
                return Ok(None);
            }
            self.enter(self.piece + 1)?;
        }
        let mut block = self.read_block()?;
        while block.is_continued() {
            if self.piece + 1 >= self.pieces.len() {
                not_found!(
                    "Data block continues into a cabinet that was not found"
                );
            }
            self.enter(self.piece + 1)?;
            if self.blocks_left == 0 {
                invalid_data!("Continued folder has no data blocks");
            }
            let rest = self.read_block()?;
            block.join(rest);
        }
        Ok(Some(block))
    }

    fn read_block(&mut self) -> io::Result<DataBlock> {
        let volume = &self.set.volumes()[self.pieces[self.piece].0];
        let (block, next_offset) = volume.read_block(self.offset)?;
        if self.verify_checksums && !block.checksum_matches() {
            log::warn!(
                "Checksum mismatch in data block at 0x{:x} of {:?} \
                 (stored 0x{:08x}, computed 0x{:08x})",
                self.offset,
                volume.name(),
                block.checksum,
                block.computed_checksum()
            );
        }
        self.offset = next_offset;
        self.blocks_left -= 1;
        Ok(block)
    }
}

// ========================================================================= //

/// Cuts a folder's decompressed stream into consecutive files.
struct FileSlicer<'a, S: ?Sized> {
    sink: &'a mut S,
    files: &'a [&'a FileEntry],
    next_file: usize,
    bytes_left: u64,
    is_open: bool,
}

impl<'a, S: Sink + ?Sized> FileSlicer<'a, S> {
    fn new(sink: &'a mut S, files: &'a [&'a FileEntry]) -> FileSlicer<'a, S> {
        FileSlicer { sink, files, next_file: 0, bytes_left: 0, is_open: false }
    }

    /// Closes finished files and opens new ones until the current file
    /// expects data or the list runs out.
    fn settle(&mut self) -> io::Result<()> {
        loop {
            if self.is_open {
                if self.bytes_left > 0 {
                    return Ok(());
                }
                self.is_open = false;
                self.sink.finish()?;
            }
            let file = match self.files.get(self.next_file) {
                Some(file) => file,
                None => return Ok(()),
            };
            self.sink.create(file)?;
            self.is_open = true;
            self.bytes_left = file.uncompressed_size() as u64;
            self.next_file += 1;
        }
    }

    fn is_done(&self) -> bool {
        !self.is_open && self.next_file >= self.files.len()
    }

    /// Returns the number of bytes still expected.
    fn pending(&self) -> u64 {
        let later: u64 = self.files[self.next_file..]
            .iter()
            .map(|file| file.uncompressed_size() as u64)
            .sum();
        self.bytes_left + later
    }

    fn feed(&mut self, mut data: &[u8]) -> io::Result<()> {
        self.settle()?;
        while !data.is_empty() && !self.is_done() {
            let length = (self.bytes_left.min(data.len() as u64)) as usize;
            self.sink.write(&data[..length])?;
            self.bytes_left -= length as u64;
            data = &data[length..];
            self.settle()?;
        }
        if !data.is_empty() {
            log::debug!("Discarding {} bytes past the last file", data.len());
        }
        Ok(())
    }

    /// Closes the current file after an error, keeping what was written.
    fn abandon(&mut self) {
        if self.is_open {
            self.is_open = false;
            if let Err(error) = self.sink.finish() {
                log::debug!("Could not close partial output: {}", error);
            }
        }
    }
}

// ========================================================================= //

/// Keeps the data of one file and drops everything else.
struct Capture<'a> {
    target: &'a FileEntry,
    data: Option<Vec<u8>>,
    capturing: bool,
}

impl<'a> Sink for Capture<'a> {
    fn create(&mut self, file: &FileEntry) -> io::Result<()> {
        self.capturing = std::ptr::eq(file, self.target);
        if self.capturing {
            let size = file.uncompressed_size() as usize;
            self.data = Some(Vec::with_capacity(size));
        }
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if let (true, Some(buffer)) = (self.capturing, self.data.as_mut()) {
            buffer.extend_from_slice(data);
        }
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.capturing = false;
        Ok(())
    }
}

// ========================================================================= //
