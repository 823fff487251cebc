//! A library for reading [Windows
//! cabinet](https://en.wikipedia.org/wiki/Cabinet_(file_format)) (CAB) files,
//! including sets of cabinets whose folders are split across several
//! physical files.
//!
//! A [`CabinetSet`] is opened from one cabinet of a set; the other cabinets
//! are found through the previous/next links in their headers.  Extraction
//! then walks the set in order, following folder data from one cabinet into
//! the next:
//!
//! ```no_run
//! use cabset::{CabinetSet, ExtractOptions};
//!
//! let set = CabinetSet::open("disk1.cab")?;
//! for file in set.file_entries() {
//!     println!("{} ({} bytes)", file.name(), file.uncompressed_size());
//! }
//! let report = set.extract_to("out", &ExtractOptions::new())?;
//! for failure in report.failures() {
//!     eprintln!("{}", failure);
//! }
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! Folders compressed with MSZIP or stored uncompressed are extracted.
//! Quantum and LZX folders are recognized and reported as unsupported.
//! Diagnostics go through the [`log`](https://docs.rs/log) facade.

#![warn(missing_docs)]

#[macro_use]
mod macros;

mod block;
mod cabinet;
pub mod checksum;
mod consts;
mod ctype;
mod extract;
mod file;
mod folder;
mod header;
mod mszip;
mod set;
mod sink;
mod string;

pub use crate::cabinet::Cabinet;
pub use crate::ctype::CompressionType;
pub use crate::extract::{
    ExtractOptions, ExtractReport, FolderReport, FolderStatus,
};
pub use crate::file::{FileEntry, FolderIndex};
pub use crate::folder::FolderEntry;
pub use crate::header::{CabinetHeader, CabinetLink};
pub use crate::set::{CabinetSet, Volume};
pub use crate::sink::{DirectorySink, MemorySink, Sink};
