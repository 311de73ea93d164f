//! Jar reading, writing, and the whole-archive remapping pipeline.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{Cursor, Read, Seek, Write};

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use rayon::prelude::*;
use tracing::{debug, info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::classfile::ClassFile;
use crate::config::RunOptions;
use crate::dictionary::Dictionary;
use crate::error::{VignetteError, VignetteResult};
use crate::hierarchy::ClassHierarchy;
use crate::mapping::MappingSet;
use crate::mappings_io;
use crate::remapper::Remapper;
use crate::rewriter::{ClassRewriter, RewrittenClass};
use crate::stable::stabilize;

/// Resource listing synthesized parameter names for methods without bodies.
pub const ABSTRACT_PARAMETER_NAMES: &str = "fernflower_abstract_parameter_names.txt";

const CLASS_SUFFIX: &str = ".class";

/// Upper bound on the buffer reserved from an entry's declared size.
const MAX_PREALLOCATION: u64 = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryContent {
    File(Vec<u8>),
    Directory,
}

/// One archive member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub content: EntryContent,
    /// `None` leaves the timestamp to the archive writer.
    pub modified: Option<NaiveDateTime>,
}

impl ArchiveEntry {
    pub fn file(path: impl Into<String>, bytes: Vec<u8>) -> Self {
        ArchiveEntry {
            path: path.into(),
            content: EntryContent::File(bytes),
            modified: None,
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        ArchiveEntry {
            path: path.into(),
            content: EntryContent::Directory,
            modified: None,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.content, EntryContent::Directory)
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.content {
            EntryContent::File(bytes) => Some(bytes),
            EntryContent::Directory => None,
        }
    }

    pub fn is_class(&self) -> bool {
        !self.is_directory() && self.path.ends_with(CLASS_SUFFIX)
    }
}

fn from_dos_time(time: zip::DateTime) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(
        i32::from(time.year()),
        u32::from(time.month()),
        u32::from(time.day()),
    )?
    .and_hms_opt(
        u32::from(time.hour()),
        u32::from(time.minute()),
        u32::from(time.second()),
    )
}

fn to_dos_time(time: NaiveDateTime) -> VignetteResult<zip::DateTime> {
    let out_of_range = || VignetteError::format(format!("timestamp {time} cannot be stored in an archive"));
    let year = u16::try_from(time.year()).map_err(|_| out_of_range())?;
    // every component but the year fits in a byte
    zip::DateTime::from_date_and_time(
        year,
        time.month() as u8,
        time.day() as u8,
        time.hour() as u8,
        time.minute() as u8,
        time.second() as u8,
    )
    .map_err(|()| out_of_range())
}

/// Reads every member of a zip archive, preserving order.
pub fn read_archive(bytes: &[u8]) -> VignetteResult<Vec<ArchiveEntry>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let modified = from_dos_time(file.last_modified());
        let path = file.name().to_owned();
        let content = if file.is_dir() {
            EntryContent::Directory
        } else {
            let reserve = file.size().min(MAX_PREALLOCATION);
            let mut buffer = Vec::with_capacity(usize::try_from(reserve).unwrap_or(0));
            file.read_to_end(&mut buffer)?;
            EntryContent::File(buffer)
        };
        entries.push(ArchiveEntry {
            path,
            content,
            modified,
        });
    }
    Ok(entries)
}

/// Writes `entries` in order; files are deflated, directories stored.
pub fn write_archive<W: Write + Seek>(entries: &[ArchiveEntry], writer: W) -> VignetteResult<W> {
    let mut zip = ZipWriter::new(writer);
    for entry in entries {
        let mut options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        if let Some(modified) = entry.modified {
            options = options.last_modified_time(to_dos_time(modified)?);
        }
        match &entry.content {
            EntryContent::Directory => zip.add_directory(entry.path.as_str(), options)?,
            EntryContent::File(bytes) => {
                zip.start_file(entry.path.as_str(), options)?;
                zip.write_all(bytes)?;
            }
        }
    }
    Ok(zip.finish()?)
}

/// Keeps any directory prefix of the entry, such as a multi-release root.
fn renamed_class_path(path: &str, original_name: &str, name: &str) -> String {
    let prefix = path
        .strip_suffix(CLASS_SUFFIX)
        .and_then(|stem| stem.strip_suffix(original_name))
        .unwrap_or("");
    format!("{prefix}{name}{CLASS_SUFFIX}")
}

/// Remaps every class of a jar against one mapping set.
#[derive(Debug)]
pub struct JarRemapper {
    mappings: MappingSet,
    dictionary: Option<Dictionary>,
    fernflower_meta: bool,
    threads: Option<usize>,
}

impl JarRemapper {
    pub fn new(mappings: MappingSet) -> Self {
        JarRemapper {
            mappings,
            dictionary: None,
            fernflower_meta: false,
            threads: None,
        }
    }

    pub fn with_deduction(mut self, dictionary: Dictionary) -> Self {
        self.dictionary = Some(dictionary);
        self
    }

    /// Emits [`ABSTRACT_PARAMETER_NAMES`] into the output.
    pub fn with_fernflower_meta(mut self, enabled: bool) -> Self {
        self.fernflower_meta = enabled;
        self
    }

    /// Runs the rewrite on a dedicated pool instead of the global one.
    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    /// Rewrites `input`; `libraries` only contribute to the class hierarchy.
    pub fn run(
        self,
        input: Vec<ArchiveEntry>,
        libraries: &[ArchiveEntry],
    ) -> VignetteResult<Vec<ArchiveEntry>> {
        match self.threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|err| VignetteError::Config(err.to_string()))?;
                pool.install(move || self.remap(input, libraries))
            }
            None => self.remap(input, libraries),
        }
    }

    fn remap(
        mut self,
        input: Vec<ArchiveEntry>,
        libraries: &[ArchiveEntry],
    ) -> VignetteResult<Vec<ArchiveEntry>> {
        let classes: Vec<(usize, String, ClassFile)> = input
            .par_iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_class())
            .map(|(index, entry)| {
                let bytes = entry.bytes().unwrap_or_default();
                let class =
                    ClassFile::parse(bytes).map_err(|err| err.in_class(entry.path.as_str()))?;
                let name = class.this_name()?.to_owned();
                Ok((index, name, class))
            })
            .collect::<VignetteResult<_>>()?;

        let mut hierarchy = ClassHierarchy::new();
        for (_, _, class) in &classes {
            hierarchy.insert_class(class)?;
        }
        for entry in libraries.iter().filter(|entry| entry.is_class()) {
            let parsed = ClassFile::parse(entry.bytes().unwrap_or_default())
                .and_then(|class| hierarchy.insert_class(&class));
            if let Err(err) = parsed {
                warn!(path = %entry.path, error = %err, "skipping unreadable library class");
            }
        }
        self.mappings
            .complete(&hierarchy, classes.iter().map(|(_, name, _)| name.as_str()));

        let mut rewriter = ClassRewriter::new(Remapper::new(&self.mappings));
        if let Some(dictionary) = &self.dictionary {
            rewriter = rewriter.with_deduction(dictionary);
        }
        let mut rewritten: HashMap<usize, RewrittenClass> = classes
            .par_iter()
            .map(|(index, name, class)| {
                let result = rewriter
                    .rewrite(class)
                    .map_err(|err| err.in_class(name.as_str()))?;
                Ok((*index, result))
            })
            .collect::<VignetteResult<_>>()?;
        info!(
            classes = rewritten.len(),
            hierarchy = hierarchy.len(),
            "rewrote classes"
        );

        let mut abstract_parameters = Vec::new();
        let mut seen = HashSet::new();
        let mut output = Vec::with_capacity(input.len() + 1);
        for (index, mut entry) in input.into_iter().enumerate() {
            if let Some(class) = rewritten.remove(&index) {
                entry.path = renamed_class_path(&entry.path, &class.original_name, &class.name);
                entry.content = EntryContent::File(class.bytes);
                abstract_parameters.extend(class.abstract_parameters);
            }
            if !entry.is_directory() && !seen.insert(entry.path.clone()) {
                return Err(VignetteError::DuplicateEntry(entry.path));
            }
            output.push(entry);
        }

        if self.fernflower_meta && !abstract_parameters.is_empty() {
            abstract_parameters.sort();
            let listing: String = abstract_parameters
                .iter()
                .map(|names| format!("{names}\n"))
                .collect();
            debug!(methods = abstract_parameters.len(), "writing {ABSTRACT_PARAMETER_NAMES}");
            if !seen.insert(ABSTRACT_PARAMETER_NAMES.to_owned()) {
                return Err(VignetteError::DuplicateEntry(ABSTRACT_PARAMETER_NAMES.to_owned()));
            }
            output.push(ArchiveEntry::file(ABSTRACT_PARAMETER_NAMES, listing.into_bytes()));
        }
        Ok(output)
    }
}

/// Reads the inputs named by `options`, remaps, and writes the output jar.
pub fn run(options: &RunOptions) -> VignetteResult<()> {
    info!("Input: {}", options.input.display());
    info!("Output: {}", options.output.display());
    if !options.input.exists() {
        return Err(VignetteError::Config("Input jar does not exist!".to_owned()));
    }
    info!("Format: {}", options.mapping_format);
    info!("Mappings: {}", options.mappings.display());
    if !options.mappings.exists() {
        return Err(VignetteError::Config("Input mappings does not exist!".to_owned()));
    }

    let mappings = mappings_io::read(
        options.mapping_format,
        &fs::read_to_string(&options.mappings)?,
    )?;
    let input = read_archive(&fs::read(&options.input)?)?;

    let mut libraries = Vec::new();
    for library in &options.libraries {
        info!("Library: {}", library.display());
        libraries.extend(
            read_archive(&fs::read(library)?)?
                .into_iter()
                .filter(ArchiveEntry::is_class),
        );
    }

    let mut remapper = JarRemapper::new(mappings)
        .with_fernflower_meta(options.fernflower_meta)
        .with_threads(options.threads);
    if options.deduce_param_names {
        let mut dictionary = Dictionary::new();
        for path in &options.dictionaries {
            info!("Dictionary: {}", path.display());
            dictionary.extend(Dictionary::load(&fs::read_to_string(path)?)?);
        }
        info!(rules = dictionary.len(), "Deducing parameter names");
        remapper = remapper.with_deduction(dictionary);
    }

    let mut output = remapper.run(input, &libraries)?;
    if options.stable {
        output = stabilize(output)?;
    }
    let bytes = write_archive(&output, Cursor::new(Vec::new()))?.into_inner();
    fs::write(&options.output, bytes)?;
    info!("Processing Complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ArchiveEntry, read_archive, renamed_class_path, write_archive};
    use crate::error::VignetteResult;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[test]
    fn class_paths_keep_their_prefix() {
        assert_eq!(renamed_class_path("a.class", "a", "net/Foo"), "net/Foo.class");
        assert_eq!(
            renamed_class_path("META-INF/versions/9/a$b.class", "a$b", "net/Foo$Bar"),
            "META-INF/versions/9/net/Foo$Bar.class"
        );
        assert_eq!(renamed_class_path("odd/x.class", "a", "b"), "b.class");
    }

    #[test]
    fn archives_round_trip_in_order() -> VignetteResult<()> {
        let entries = vec![
            ArchiveEntry::file("z.txt", b"last letter".to_vec()),
            ArchiveEntry::directory("a/"),
            ArchiveEntry::file("a/b.class", vec![0xCA, 0xFE]),
        ];
        let bytes = write_archive(&entries, Cursor::new(Vec::new()))?.into_inner();
        let read = read_archive(&bytes)?;
        let summary: Vec<(&str, Option<&[u8]>)> = read
            .iter()
            .map(|entry| (entry.path.as_str(), entry.bytes()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("z.txt", Some(&b"last letter"[..])),
                ("a/", None),
                ("a/b.class", Some(&[0xCA, 0xFE][..])),
            ]
        );
        assert!(read[2].is_class() && !read[1].is_class());
        Ok(())
    }

    #[test]
    fn declared_sizes_are_not_trusted() -> VignetteResult<()> {
        let entries = vec![ArchiveEntry::file("big.bin", b"actually small".to_vec())];
        let mut bytes = write_archive(&entries, Cursor::new(Vec::new()))?.into_inner();
        // uncompressed size in the central directory header
        let central = bytes
            .windows(4)
            .position(|window| window == &b"PK\x01\x02"[..])
            .expect("central directory header");
        bytes[central + 24..central + 28].copy_from_slice(&0x7fff_ffffu32.to_le_bytes());

        let read = read_archive(&bytes)?;
        assert_eq!(read[0].bytes(), Some(&b"actually small"[..]));
        Ok(())
    }
}
