//! Constant pool definitions covering strings, numeric literals, and member references.

use std::collections::HashMap;

use super::reader::{ClassReader, ClassWriter, decode_mutf8_units, table_len};
use crate::error::{VignetteError, VignetteResult};

/// Individual constant pool entries, tagged as in the class file format.
///
/// Floating point values keep their raw bits so an unchanged pool round-trips byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstantPoolEntry {
    /// Index zero and the slot following a `Long` or `Double`.
    Unusable,
    Utf8(String),
    /// A `Utf8` whose text is not valid Unicode, such as a lone surrogate in a
    /// string literal. The modified UTF-8 bytes are kept untouched.
    Utf8Raw(Vec<u8>),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    FieldRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    MethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        kind: MethodHandleKind,
        reference_index: u16,
    },
    MethodType {
        descriptor_index: u16,
    },
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    Module {
        name_index: u16,
    },
    Package {
        name_index: u16,
    },
}

impl ConstantPoolEntry {
    const TAG_UTF8: u8 = 1;
    const TAG_INTEGER: u8 = 3;
    const TAG_FLOAT: u8 = 4;
    const TAG_LONG: u8 = 5;
    const TAG_DOUBLE: u8 = 6;
    const TAG_CLASS: u8 = 7;
    const TAG_STRING: u8 = 8;
    const TAG_FIELD_REF: u8 = 9;
    const TAG_METHOD_REF: u8 = 10;
    const TAG_INTERFACE_METHOD_REF: u8 = 11;
    const TAG_NAME_AND_TYPE: u8 = 12;
    const TAG_METHOD_HANDLE: u8 = 15;
    const TAG_METHOD_TYPE: u8 = 16;
    const TAG_DYNAMIC: u8 = 17;
    const TAG_INVOKE_DYNAMIC: u8 = 18;
    const TAG_MODULE: u8 = 19;
    const TAG_PACKAGE: u8 = 20;

    /// Whether the entry occupies two pool slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, ConstantPoolEntry::Long(_) | ConstantPoolEntry::Double(_))
    }

    fn read(reader: &mut ClassReader<'_>) -> VignetteResult<Self> {
        let tag = reader.read_u8()?;
        let entry = match tag {
            Self::TAG_UTF8 => {
                let len = reader.read_u16()? as usize;
                let bytes = reader.read_bytes(len)?;
                match String::from_utf16(&decode_mutf8_units(bytes)?) {
                    Ok(value) => ConstantPoolEntry::Utf8(value),
                    Err(_) => ConstantPoolEntry::Utf8Raw(bytes.to_vec()),
                }
            }
            Self::TAG_INTEGER => ConstantPoolEntry::Integer(reader.read_u32()? as i32),
            Self::TAG_FLOAT => ConstantPoolEntry::Float(reader.read_u32()?),
            Self::TAG_LONG => ConstantPoolEntry::Long(reader.read_u64()? as i64),
            Self::TAG_DOUBLE => ConstantPoolEntry::Double(reader.read_u64()?),
            Self::TAG_CLASS => ConstantPoolEntry::Class {
                name_index: reader.read_u16()?,
            },
            Self::TAG_STRING => ConstantPoolEntry::String {
                string_index: reader.read_u16()?,
            },
            Self::TAG_FIELD_REF => ConstantPoolEntry::FieldRef {
                class_index: reader.read_u16()?,
                name_and_type_index: reader.read_u16()?,
            },
            Self::TAG_METHOD_REF => ConstantPoolEntry::MethodRef {
                class_index: reader.read_u16()?,
                name_and_type_index: reader.read_u16()?,
            },
            Self::TAG_INTERFACE_METHOD_REF => ConstantPoolEntry::InterfaceMethodRef {
                class_index: reader.read_u16()?,
                name_and_type_index: reader.read_u16()?,
            },
            Self::TAG_NAME_AND_TYPE => ConstantPoolEntry::NameAndType {
                name_index: reader.read_u16()?,
                descriptor_index: reader.read_u16()?,
            },
            Self::TAG_METHOD_HANDLE => ConstantPoolEntry::MethodHandle {
                kind: MethodHandleKind::from_raw(reader.read_u8()?),
                reference_index: reader.read_u16()?,
            },
            Self::TAG_METHOD_TYPE => ConstantPoolEntry::MethodType {
                descriptor_index: reader.read_u16()?,
            },
            Self::TAG_DYNAMIC => ConstantPoolEntry::Dynamic {
                bootstrap_method_attr_index: reader.read_u16()?,
                name_and_type_index: reader.read_u16()?,
            },
            Self::TAG_INVOKE_DYNAMIC => ConstantPoolEntry::InvokeDynamic {
                bootstrap_method_attr_index: reader.read_u16()?,
                name_and_type_index: reader.read_u16()?,
            },
            Self::TAG_MODULE => ConstantPoolEntry::Module {
                name_index: reader.read_u16()?,
            },
            Self::TAG_PACKAGE => ConstantPoolEntry::Package {
                name_index: reader.read_u16()?,
            },
            other => {
                return Err(VignetteError::format(format!(
                    "unknown constant pool tag {other} at byte {}",
                    reader.position() - 1
                )));
            }
        };
        Ok(entry)
    }

    fn write(&self, writer: &mut ClassWriter) -> VignetteResult<()> {
        match self {
            ConstantPoolEntry::Unusable => {}
            ConstantPoolEntry::Utf8(value) => {
                writer.write_u8(Self::TAG_UTF8);
                writer.write_mutf8(value)?;
            }
            ConstantPoolEntry::Utf8Raw(bytes) => {
                writer.write_u8(Self::TAG_UTF8);
                writer.write_u16(table_len(bytes.len())?);
                writer.write_bytes(bytes);
            }
            ConstantPoolEntry::Integer(value) => {
                writer.write_u8(Self::TAG_INTEGER);
                writer.write_u32(*value as u32);
            }
            ConstantPoolEntry::Float(bits) => {
                writer.write_u8(Self::TAG_FLOAT);
                writer.write_u32(*bits);
            }
            ConstantPoolEntry::Long(value) => {
                writer.write_u8(Self::TAG_LONG);
                writer.write_u64(*value as u64);
            }
            ConstantPoolEntry::Double(bits) => {
                writer.write_u8(Self::TAG_DOUBLE);
                writer.write_u64(*bits);
            }
            ConstantPoolEntry::Class { name_index } => {
                writer.write_u8(Self::TAG_CLASS);
                writer.write_u16(*name_index);
            }
            ConstantPoolEntry::String { string_index } => {
                writer.write_u8(Self::TAG_STRING);
                writer.write_u16(*string_index);
            }
            ConstantPoolEntry::FieldRef {
                class_index,
                name_and_type_index,
            } => {
                writer.write_u8(Self::TAG_FIELD_REF);
                writer.write_u16(*class_index);
                writer.write_u16(*name_and_type_index);
            }
            ConstantPoolEntry::MethodRef {
                class_index,
                name_and_type_index,
            } => {
                writer.write_u8(Self::TAG_METHOD_REF);
                writer.write_u16(*class_index);
                writer.write_u16(*name_and_type_index);
            }
            ConstantPoolEntry::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => {
                writer.write_u8(Self::TAG_INTERFACE_METHOD_REF);
                writer.write_u16(*class_index);
                writer.write_u16(*name_and_type_index);
            }
            ConstantPoolEntry::NameAndType {
                name_index,
                descriptor_index,
            } => {
                writer.write_u8(Self::TAG_NAME_AND_TYPE);
                writer.write_u16(*name_index);
                writer.write_u16(*descriptor_index);
            }
            ConstantPoolEntry::MethodHandle {
                kind,
                reference_index,
            } => {
                writer.write_u8(Self::TAG_METHOD_HANDLE);
                writer.write_u8(kind.to_raw());
                writer.write_u16(*reference_index);
            }
            ConstantPoolEntry::MethodType { descriptor_index } => {
                writer.write_u8(Self::TAG_METHOD_TYPE);
                writer.write_u16(*descriptor_index);
            }
            ConstantPoolEntry::Dynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => {
                writer.write_u8(Self::TAG_DYNAMIC);
                writer.write_u16(*bootstrap_method_attr_index);
                writer.write_u16(*name_and_type_index);
            }
            ConstantPoolEntry::InvokeDynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => {
                writer.write_u8(Self::TAG_INVOKE_DYNAMIC);
                writer.write_u16(*bootstrap_method_attr_index);
                writer.write_u16(*name_and_type_index);
            }
            ConstantPoolEntry::Module { name_index } => {
                writer.write_u8(Self::TAG_MODULE);
                writer.write_u16(*name_index);
            }
            ConstantPoolEntry::Package { name_index } => {
                writer.write_u8(Self::TAG_PACKAGE);
                writer.write_u16(*name_index);
            }
        }
        Ok(())
    }
}

/// Kinds of method handles supported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodHandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
    Unknown(u8),
}

impl MethodHandleKind {
    /// Create a [`MethodHandleKind`] from the raw `reference_kind` byte.
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => MethodHandleKind::GetField,
            2 => MethodHandleKind::GetStatic,
            3 => MethodHandleKind::PutField,
            4 => MethodHandleKind::PutStatic,
            5 => MethodHandleKind::InvokeVirtual,
            6 => MethodHandleKind::InvokeStatic,
            7 => MethodHandleKind::InvokeSpecial,
            8 => MethodHandleKind::NewInvokeSpecial,
            9 => MethodHandleKind::InvokeInterface,
            other => MethodHandleKind::Unknown(other),
        }
    }

    /// Retrieve the raw discriminant used in the binary entry.
    pub const fn to_raw(self) -> u8 {
        match self {
            MethodHandleKind::GetField => 1,
            MethodHandleKind::GetStatic => 2,
            MethodHandleKind::PutField => 3,
            MethodHandleKind::PutStatic => 4,
            MethodHandleKind::InvokeVirtual => 5,
            MethodHandleKind::InvokeStatic => 6,
            MethodHandleKind::InvokeSpecial => 7,
            MethodHandleKind::NewInvokeSpecial => 8,
            MethodHandleKind::InvokeInterface => 9,
            MethodHandleKind::Unknown(value) => value,
        }
    }
}

/// Which table a member reference points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Method,
    InterfaceMethod,
}

/// A resolved field or method reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub kind: MemberKind,
    pub owner: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
}

/// A resolved method handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodHandleRef<'a> {
    pub kind: MethodHandleKind,
    pub member: MemberRef<'a>,
}

/// The constant pool of one class file, indexed from 1.
///
/// Existing entries never move. New entries are appended and deduplicated
/// against what is already present, so indices held by code and attributes
/// stay valid while the pool grows.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPool {
    entries: Vec<ConstantPoolEntry>,
    utf8_lookup: HashMap<String, u16>,
    class_lookup: HashMap<u16, u16>,
    name_and_type_lookup: HashMap<(u16, u16), u16>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        ConstantPool::new()
    }
}

impl ConstantPool {
    pub fn new() -> Self {
        ConstantPool {
            entries: vec![ConstantPoolEntry::Unusable],
            utf8_lookup: HashMap::new(),
            class_lookup: HashMap::new(),
            name_and_type_lookup: HashMap::new(),
        }
    }

    pub fn read(reader: &mut ClassReader<'_>) -> VignetteResult<Self> {
        let count = reader.read_u16()?;
        let mut pool = ConstantPool::new();
        while pool.entries.len() < count as usize {
            let entry = ConstantPoolEntry::read(reader)?;
            pool.push(entry)?;
        }
        if pool.entries.len() != count as usize {
            return Err(VignetteError::format(
                "wide constant overflows the declared pool size",
            ));
        }
        Ok(pool)
    }

    pub fn write(&self, writer: &mut ClassWriter) -> VignetteResult<()> {
        let count = u16::try_from(self.entries.len())
            .map_err(|_| VignetteError::format("constant pool exceeds 65535 entries"))?;
        writer.write_u16(count);
        for entry in &self.entries[1..] {
            entry.write(writer)?;
        }
        Ok(())
    }

    /// Value of the `constant_pool_count` field.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Iterates over `(index, entry)` pairs, skipping unusable slots.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &ConstantPoolEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !matches!(entry, ConstantPoolEntry::Unusable))
            .map(|(index, entry)| (index as u16, entry))
    }

    pub fn get(&self, index: u16) -> VignetteResult<&ConstantPoolEntry> {
        match self.entries.get(index as usize) {
            Some(ConstantPoolEntry::Unusable) | None => Err(VignetteError::format(format!(
                "invalid constant pool index {index}"
            ))),
            Some(entry) => Ok(entry),
        }
    }

    /// Appends `entry`, returning its index.
    pub fn push(&mut self, entry: ConstantPoolEntry) -> VignetteResult<u16> {
        let index = u16::try_from(self.entries.len())
            .ok()
            .filter(|index| *index < u16::MAX - u16::from(entry.is_wide()))
            .ok_or_else(|| VignetteError::format("constant pool exceeds 65535 entries"))?;
        match &entry {
            ConstantPoolEntry::Utf8(value) => {
                self.utf8_lookup.entry(value.clone()).or_insert(index);
            }
            ConstantPoolEntry::Class { name_index } => {
                self.class_lookup.entry(*name_index).or_insert(index);
            }
            ConstantPoolEntry::NameAndType {
                name_index,
                descriptor_index,
            } => {
                self.name_and_type_lookup
                    .entry((*name_index, *descriptor_index))
                    .or_insert(index);
            }
            _ => {}
        }
        let wide = entry.is_wide();
        self.entries.push(entry);
        if wide {
            self.entries.push(ConstantPoolEntry::Unusable);
        }
        Ok(index)
    }

    /// Replaces the entry at `index`. `Utf8` slots may be shared and are never replaced.
    pub fn replace(&mut self, index: u16, entry: ConstantPoolEntry) -> VignetteResult<()> {
        let current = self.get(index)?;
        if matches!(current, ConstantPoolEntry::Utf8(_) | ConstantPoolEntry::Utf8Raw(_))
            || current.is_wide() != entry.is_wide()
        {
            return Err(VignetteError::format(format!(
                "constant pool entry {index} cannot be replaced in place"
            )));
        }
        match &entry {
            ConstantPoolEntry::Class { name_index } => {
                self.class_lookup.entry(*name_index).or_insert(index);
            }
            ConstantPoolEntry::NameAndType {
                name_index,
                descriptor_index,
            } => {
                self.name_and_type_lookup
                    .entry((*name_index, *descriptor_index))
                    .or_insert(index);
            }
            _ => {}
        }
        self.entries[index as usize] = entry;
        Ok(())
    }

    pub fn intern_utf8(&mut self, value: &str) -> VignetteResult<u16> {
        match self.utf8_lookup.get(value) {
            Some(index) => Ok(*index),
            None => self.push(ConstantPoolEntry::Utf8(value.to_owned())),
        }
    }

    pub fn intern_class(&mut self, name: &str) -> VignetteResult<u16> {
        let name_index = self.intern_utf8(name)?;
        match self.class_lookup.get(&name_index) {
            Some(index) => Ok(*index),
            None => self.push(ConstantPoolEntry::Class { name_index }),
        }
    }

    pub fn intern_name_and_type(&mut self, name: &str, descriptor: &str) -> VignetteResult<u16> {
        let name_index = self.intern_utf8(name)?;
        let descriptor_index = self.intern_utf8(descriptor)?;
        match self.name_and_type_lookup.get(&(name_index, descriptor_index)) {
            Some(index) => Ok(*index),
            None => self.push(ConstantPoolEntry::NameAndType {
                name_index,
                descriptor_index,
            }),
        }
    }

    pub fn utf8(&self, index: u16) -> VignetteResult<&str> {
        match self.get(index)? {
            ConstantPoolEntry::Utf8(value) => Ok(value),
            ConstantPoolEntry::Utf8Raw(_) => Err(VignetteError::format(format!(
                "constant pool entry {index} is not valid Unicode"
            ))),
            other => Err(unexpected(index, "Utf8", other)),
        }
    }

    pub fn class_name(&self, index: u16) -> VignetteResult<&str> {
        match self.get(index)? {
            ConstantPoolEntry::Class { name_index } => self.utf8(*name_index),
            other => Err(unexpected(index, "Class", other)),
        }
    }

    pub fn name_and_type(&self, index: u16) -> VignetteResult<(&str, &str)> {
        match self.get(index)? {
            ConstantPoolEntry::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            other => Err(unexpected(index, "NameAndType", other)),
        }
    }

    pub fn member_ref(&self, index: u16) -> VignetteResult<MemberRef<'_>> {
        let (kind, class_index, name_and_type_index) = match self.get(index)? {
            ConstantPoolEntry::FieldRef {
                class_index,
                name_and_type_index,
            } => (MemberKind::Field, class_index, name_and_type_index),
            ConstantPoolEntry::MethodRef {
                class_index,
                name_and_type_index,
            } => (MemberKind::Method, class_index, name_and_type_index),
            ConstantPoolEntry::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => (MemberKind::InterfaceMethod, class_index, name_and_type_index),
            other => return Err(unexpected(index, "member reference", other)),
        };
        let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
        Ok(MemberRef {
            kind,
            owner: self.class_name(*class_index)?,
            name,
            descriptor,
        })
    }

    pub fn method_handle(&self, index: u16) -> VignetteResult<MethodHandleRef<'_>> {
        match self.get(index)? {
            ConstantPoolEntry::MethodHandle {
                kind,
                reference_index,
            } => Ok(MethodHandleRef {
                kind: *kind,
                member: self.member_ref(*reference_index)?,
            }),
            other => Err(unexpected(index, "MethodHandle", other)),
        }
    }

    pub fn method_type(&self, index: u16) -> VignetteResult<&str> {
        match self.get(index)? {
            ConstantPoolEntry::MethodType { descriptor_index } => self.utf8(*descriptor_index),
            other => Err(unexpected(index, "MethodType", other)),
        }
    }
}

fn unexpected(index: u16, expected: &str, found: &ConstantPoolEntry) -> VignetteError {
    VignetteError::format(format!(
        "constant pool entry {index} should be {expected}, found {found:?}"
    ))
}

#[cfg(test)]
mod tests {
    use super::{ConstantPool, ConstantPoolEntry, MemberKind};
    use crate::classfile::reader::{ClassReader, ClassWriter};
    use crate::error::VignetteResult;

    #[test]
    fn wide_entries_take_two_slots_and_round_trip() -> VignetteResult<()> {
        let mut pool = ConstantPool::new();
        let long = pool.push(ConstantPoolEntry::Long(-7))?;
        let text = pool.intern_utf8("after")?;
        assert_eq!(long, 1);
        assert_eq!(text, 3);
        assert!(pool.get(2).is_err());

        let mut writer = ClassWriter::new();
        pool.write(&mut writer)?;
        let bytes = writer.into_inner();
        let reread = ConstantPool::read(&mut ClassReader::new(&bytes))?;
        assert_eq!(reread, pool);
        assert_eq!(reread.utf8(3)?, "after");
        Ok(())
    }

    #[test]
    fn interning_reuses_existing_entries() -> VignetteResult<()> {
        let mut pool = ConstantPool::new();
        let class = pool.intern_class("a/B")?;
        assert_eq!(pool.intern_class("a/B")?, class);
        let nat = pool.intern_name_and_type("run", "()V")?;
        assert_eq!(pool.intern_name_and_type("run", "()V")?, nat);
        let before = pool.len();
        pool.intern_utf8("run")?;
        assert_eq!(pool.len(), before);
        Ok(())
    }

    #[test]
    fn resolves_member_references() -> VignetteResult<()> {
        let mut pool = ConstantPool::new();
        let class_index = pool.intern_class("a/B")?;
        let name_and_type_index = pool.intern_name_and_type("f", "I")?;
        let field = pool.push(ConstantPoolEntry::FieldRef {
            class_index,
            name_and_type_index,
        })?;
        let member = pool.member_ref(field)?;
        assert_eq!(member.kind, MemberKind::Field);
        assert_eq!((member.owner, member.name, member.descriptor), ("a/B", "f", "I"));
        assert!(pool.member_ref(class_index).is_err());
        Ok(())
    }

    #[test]
    fn lone_surrogate_strings_round_trip_unchanged() -> VignetteResult<()> {
        // count 3, Utf8 "\u{d800}", String -> 1
        let bytes = [0x00, 0x03, 0x01, 0x00, 0x03, 0xed, 0xa0, 0x80, 0x08, 0x00, 0x01];
        let pool = ConstantPool::read(&mut ClassReader::new(&bytes))?;
        assert_eq!(pool.get(1)?, &ConstantPoolEntry::Utf8Raw(vec![0xed, 0xa0, 0x80]));
        assert!(pool.utf8(1).is_err());

        let mut writer = ClassWriter::new();
        pool.write(&mut writer)?;
        assert_eq!(writer.into_inner(), bytes);
        Ok(())
    }

    #[test]
    fn utf8_entries_cannot_be_replaced() -> VignetteResult<()> {
        let mut pool = ConstantPool::new();
        let index = pool.intern_utf8("shared")?;
        assert!(
            pool.replace(index, ConstantPoolEntry::Integer(1))
                .is_err()
        );
        Ok(())
    }
}
