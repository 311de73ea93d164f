//! Remapping of obfuscated JVM class files, with parameter name deduction
//! and reproducible archive output.

pub mod archive;
pub mod classfile;
pub mod config;
pub mod deducer;
pub mod dictionary;
pub mod error;
pub mod hierarchy;
pub mod mapping;
pub mod mappings_io;
pub mod remapper;
pub mod rewriter;
pub mod stable;

pub use archive::{
    ABSTRACT_PARAMETER_NAMES, ArchiveEntry, EntryContent, JarRemapper, read_archive, run,
    write_archive,
};
pub use classfile::{ClassFile, ConstantPool, ConstantPoolEntry, MethodDescriptor, TypeDescriptor};
pub use config::{RunOptions, expand_args};
pub use deducer::{DeduceRequest, RESERVED_NAMES, SNOWMAN, UsedNames, deduce};
pub use dictionary::{Action, Dictionary, Rule, Trigger, split_case};
pub use error::{VignetteError, VignetteResult};
pub use hierarchy::{ClassHierarchy, ClassInfo, InheritanceProvider};
pub use mapping::{ClassMapping, FieldMapping, MappingSet, MethodMapping, MethodSignature};
pub use mappings_io::MappingFormat;
pub use remapper::Remapper;
pub use rewriter::{AbstractParameterNames, ClassRewriter, LambdaFactory, RewrittenClass};
pub use stable::{STABLE_TIMESTAMP_MILLIS, make_stable, stabilize};
