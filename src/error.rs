use std::io;

use thiserror::Error;

/// Result alias for operations that may produce a [`VignetteError`].
pub type VignetteResult<T> = Result<T, VignetteError>;

/// Errors that can occur while reading, remapping, or writing class files and archives.
#[derive(Debug, Error)]
pub enum VignetteError {
    /// Wrapper around [`io::Error`] for filesystem and stream operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// The archive container could not be read or written.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    /// The class file did not start with `0xCAFEBABE`.
    #[error("invalid magic bytes: expected 0xcafebabe, found {found:#010x}")]
    InvalidMagic { found: u32 },
    /// The stream terminated before enough bytes could be read.
    #[error("unexpected end of class data at byte {offset}, expected {expected} more")]
    UnexpectedEof { offset: usize, expected: usize },
    /// The class declared a version newer than the supported range.
    #[error("unsupported class file version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },
    /// Any other format violation detected while decoding or encoding.
    #[error("format error: {0}")]
    Format(String),
    /// A dictionary line could not be split into a trigger and an action.
    #[error("malformed dictionary rule on line {line}: {message}")]
    MalformedRule { line: usize, message: String },
    /// A mapping file line could not be understood.
    #[error("malformed mapping on line {line}: {message}")]
    MalformedMapping { line: usize, message: String },
    /// A field, parameter, or method descriptor does not follow the binary grammar.
    #[error("invalid descriptor `{descriptor}`")]
    InvalidDescriptor { descriptor: String },
    /// A deduced or mapped parameter name collides with a reserved keyword.
    #[error("parameter name `{name}` of {owner}.{method}{descriptor} is a reserved keyword")]
    ReservedName {
        name: String,
        owner: String,
        method: String,
        descriptor: String,
    },
    /// A deduced or mapped parameter name begins with a disallowed glyph.
    #[error("parameter name `{name}` of {owner}.{method}{descriptor} begins with an unsupported glyph")]
    UnsupportedGlyph {
        name: String,
        owner: String,
        method: String,
        descriptor: String,
    },
    /// Dictionary rules reduced a parameter name to nothing.
    #[error("parameter {index} of {owner}.{method}{descriptor} was deduced to an empty name")]
    EmptyName {
        index: u16,
        owner: String,
        method: String,
        descriptor: String,
    },
    /// A lambda-producing call site carried unexpected bootstrap arguments.
    #[error("malformed lambda call site `{name}{descriptor}` in {owner}: {message}")]
    DynamicCallSite {
        owner: String,
        name: String,
        descriptor: String,
        message: String,
    },
    /// Command line or argument file problems.
    #[error("{0}")]
    Config(String),
    /// Two archive entries claimed the same path.
    #[error("duplicate archive entry `{0}`")]
    DuplicateEntry(String),
    /// Attaches the class being processed to an inner failure.
    #[error("failed to rewrite class {class}")]
    Class {
        class: String,
        #[source]
        source: Box<VignetteError>,
    },
}

impl VignetteError {
    /// Creates a new [`VignetteError::Format`] with the provided message.
    pub fn format(message: impl Into<String>) -> Self {
        VignetteError::Format(message.into())
    }

    /// Creates a new [`VignetteError::InvalidDescriptor`] for `descriptor`.
    pub fn descriptor(descriptor: impl Into<String>) -> Self {
        VignetteError::InvalidDescriptor {
            descriptor: descriptor.into(),
        }
    }

    /// Wraps `self` with the name of the class it was raised for.
    pub fn in_class(self, class: impl Into<String>) -> Self {
        VignetteError::Class {
            class: class.into(),
            source: Box::new(self),
        }
    }
}
