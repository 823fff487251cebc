use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use crate::file::FileEntry;

/// A destination for extracted files.  The extractor calls
/// [`create`](Sink::create) once per file, then [`write`](Sink::write) zero
/// or more times with consecutive pieces of its data, then
/// [`finish`](Sink::finish).  Files are delivered one at a time.
pub trait Sink {
    /// Starts a new output file.
    fn create(&mut self, file: &FileEntry) -> io::Result<()>;

    /// Appends data to the file most recently started.
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Completes the file most recently started.
    fn finish(&mut self) -> io::Result<()>;
}

/// Writes extracted files beneath a directory on disk, creating parent
/// directories as needed.
pub struct DirectorySink {
    root: PathBuf,
    current: Option<BufWriter<File>>,
}

impl DirectorySink {
    /// Creates a sink that writes under `root`.  The directory itself is
    /// created on first use.
    pub fn new<P: AsRef<Path>>(root: P) -> DirectorySink {
        DirectorySink { root: root.as_ref().to_path_buf(), current: None }
    }

    /// Returns the directory files are written to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a name stored in a cabinet onto a path under the root.  Both
    /// `\` and `/` separate components; empty, `.` and `..` components are
    /// dropped, so the result never leaves the root.  Returns `None` if
    /// nothing is left of the name.
    pub fn output_path(&self, name: &str) -> Option<PathBuf> {
        let relative = sanitize(name)?;
        Some(self.root.join(relative))
    }
}

fn sanitize(name: &str) -> Option<PathBuf> {
    let mut path = PathBuf::new();
    for part in name.split(|c| c == '\\' || c == '/') {
        if part.is_empty() || part == "." || part == ".." {
            continue;
        }
        // Things like drive prefixes would make `join` discard the root.
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => path.push(part),
            _ => continue,
        }
    }
    if path.as_os_str().is_empty() {
        None
    } else {
        Some(path)
    }
}

impl Sink for DirectorySink {
    fn create(&mut self, file: &FileEntry) -> io::Result<()> {
        self.finish()?;
        let path = match self.output_path(file.name()) {
            Some(path) => path,
            None => {
                invalid_input!("Cannot write file named {:?}", file.name())
            }
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.current = Some(BufWriter::new(File::create(&path)?));
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        match self.current.as_mut() {
            Some(writer) => writer.write_all(data),
            None => invalid_input!("No output file is open"),
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        if let Some(mut writer) = self.current.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Collects extracted files in memory, in extraction order.
#[derive(Debug, Default)]
pub struct MemorySink {
    files: Vec<(String, Vec<u8>)>,
    open: bool,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> MemorySink {
        MemorySink::default()
    }

    /// Returns the collected `(name, data)` pairs.
    pub fn files(&self) -> &[(String, Vec<u8>)] {
        &self.files
    }

    /// Returns the data of the first collected file with the given name.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.files
            .iter()
            .find(|(file_name, _)| file_name == name)
            .map(|(_, data)| data.as_slice())
    }

    /// Consumes the sink, returning the collected files.
    pub fn into_files(self) -> Vec<(String, Vec<u8>)> {
        self.files
    }
}

impl Sink for MemorySink {
    fn create(&mut self, file: &FileEntry) -> io::Result<()> {
        self.files.push((file.name().to_string(), Vec::new()));
        self.open = true;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        match self.files.last_mut() {
            Some((_, buffer)) if self.open => {
                buffer.extend_from_slice(data);
                Ok(())
            }
            _ => invalid_input!("No output file is open"),
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        self.open = false;
        Ok(())
    }
}
