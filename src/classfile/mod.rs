//! Reading and writing of JVM class files.
//!
//! The model keeps constant pool indices stable across a rewrite so that code
//! bytes never need to be touched.

pub mod attributes;
pub mod classes;
pub mod constant_pool;
pub mod reader;
pub mod types;

pub use attributes::{
    Annotation, Attribute, BootstrapMethod, CodeAttribute, ElementValue, EnclosingMethod,
    ExceptionHandler, InnerClassEntry, LocalVariableEntry, RecordComponent, names,
};
pub use classes::{AccessFlags, ClassFile, ClassMember, find_attribute};
pub use constant_pool::{
    ConstantPool, ConstantPoolEntry, MemberKind, MemberRef, MethodHandleKind, MethodHandleRef,
};
pub use reader::{
    ClassReader, ClassVersion, ClassWriter, decode_mutf8, decode_mutf8_units, encode_mutf8,
};
pub use types::{MethodDescriptor, PrimitiveType, TypeDescriptor};
