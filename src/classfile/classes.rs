//! Top-level class file structure: header, members, and attribute tables.

use super::attributes::Attribute;
use super::constant_pool::ConstantPool;
use super::reader::{ClassReader, ClassVersion, ClassWriter, table_len};
use crate::error::{VignetteError, VignetteResult};

/// Access and property flags shared by classes, fields, and methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessFlags(pub u16);

impl AccessFlags {
    pub const NONE: AccessFlags = AccessFlags(0);
    pub const PUBLIC: AccessFlags = AccessFlags(0x0001);
    pub const PRIVATE: AccessFlags = AccessFlags(0x0002);
    pub const PROTECTED: AccessFlags = AccessFlags(0x0004);
    pub const STATIC: AccessFlags = AccessFlags(0x0008);
    pub const FINAL: AccessFlags = AccessFlags(0x0010);
    /// `ACC_SUPER` on classes, `ACC_SYNCHRONIZED` on methods.
    pub const SUPER: AccessFlags = AccessFlags(0x0020);
    pub const BRIDGE: AccessFlags = AccessFlags(0x0040);
    pub const VARARGS: AccessFlags = AccessFlags(0x0080);
    pub const NATIVE: AccessFlags = AccessFlags(0x0100);
    pub const INTERFACE: AccessFlags = AccessFlags(0x0200);
    pub const ABSTRACT: AccessFlags = AccessFlags(0x0400);
    pub const SYNTHETIC: AccessFlags = AccessFlags(0x1000);
    pub const ANNOTATION: AccessFlags = AccessFlags(0x2000);
    pub const ENUM: AccessFlags = AccessFlags(0x4000);

    pub const fn contains(self, other: AccessFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    pub const fn intersects(self, other: AccessFlags) -> bool {
        (self.0 & other.0) != 0
    }

    pub const fn union(self, other: AccessFlags) -> AccessFlags {
        AccessFlags(self.0 | other.0)
    }
}

impl Default for AccessFlags {
    fn default() -> Self {
        AccessFlags::NONE
    }
}

/// A field or method declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMember {
    pub access_flags: AccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl ClassMember {
    pub fn new(access_flags: AccessFlags, name_index: u16, descriptor_index: u16) -> Self {
        ClassMember {
            access_flags,
            name_index,
            descriptor_index,
            attributes: Vec::new(),
        }
    }

    pub fn name<'a>(&self, pool: &'a ConstantPool) -> VignetteResult<&'a str> {
        pool.utf8(self.name_index)
    }

    pub fn descriptor<'a>(&self, pool: &'a ConstantPool) -> VignetteResult<&'a str> {
        pool.utf8(self.descriptor_index)
    }

    /// Methods flagged abstract or native carry no `Code` attribute.
    pub fn has_body(&self) -> bool {
        !self
            .access_flags
            .intersects(AccessFlags::ABSTRACT.union(AccessFlags::NATIVE))
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(AccessFlags::STATIC)
    }

    pub fn find_attribute<'a>(
        &'a self,
        pool: &ConstantPool,
        name: &str,
    ) -> VignetteResult<Option<&'a Attribute>> {
        find_attribute(&self.attributes, pool, name)
    }

    fn read(reader: &mut ClassReader<'_>) -> VignetteResult<Self> {
        Ok(ClassMember {
            access_flags: AccessFlags(reader.read_u16()?),
            name_index: reader.read_u16()?,
            descriptor_index: reader.read_u16()?,
            attributes: Attribute::read_all(reader)?,
        })
    }

    fn write(&self, writer: &mut ClassWriter) -> VignetteResult<()> {
        writer.write_u16(self.access_flags.0);
        writer.write_u16(self.name_index);
        writer.write_u16(self.descriptor_index);
        Attribute::write_all(writer, &self.attributes)
    }
}

/// Looks up the first attribute called `name`.
pub fn find_attribute<'a>(
    attributes: &'a [Attribute],
    pool: &ConstantPool,
    name: &str,
) -> VignetteResult<Option<&'a Attribute>> {
    for attribute in attributes {
        if attribute.name(pool)? == name {
            return Ok(Some(attribute));
        }
    }
    Ok(None)
}

/// A complete, parsed class file.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    pub version: ClassVersion,
    pub constant_pool: ConstantPool,
    pub access_flags: AccessFlags,
    pub this_class: u16,
    /// Zero only for `java/lang/Object` and module descriptors.
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<ClassMember>,
    pub methods: Vec<ClassMember>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Starts an empty class with the given internal names.
    pub fn new(
        version: ClassVersion,
        access_flags: AccessFlags,
        name: &str,
        super_name: Option<&str>,
    ) -> VignetteResult<Self> {
        let mut constant_pool = ConstantPool::new();
        let this_class = constant_pool.intern_class(name)?;
        let super_class = match super_name {
            Some(super_name) => constant_pool.intern_class(super_name)?,
            None => 0,
        };
        Ok(ClassFile {
            version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        })
    }

    pub fn parse(bytes: &[u8]) -> VignetteResult<Self> {
        let mut reader = ClassReader::new(bytes);
        let version = ClassVersion::read(&mut reader)?;
        let constant_pool = ConstantPool::read(&mut reader)?;
        let access_flags = AccessFlags(reader.read_u16()?);
        let this_class = reader.read_u16()?;
        let super_class = reader.read_u16()?;
        let interfaces = reader.read_u16_table()?;

        let field_count = reader.read_u16()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            fields.push(ClassMember::read(&mut reader)?);
        }
        let method_count = reader.read_u16()?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            methods.push(ClassMember::read(&mut reader)?);
        }
        let attributes = Attribute::read_all(&mut reader)?;

        if reader.remaining() != 0 {
            return Err(VignetteError::format(format!(
                "{} unexpected bytes after the class structure",
                reader.remaining()
            )));
        }

        Ok(ClassFile {
            version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    pub fn to_bytes(&self) -> VignetteResult<Vec<u8>> {
        let mut writer = ClassWriter::with_capacity(1024);
        self.version.write(&mut writer);
        self.constant_pool.write(&mut writer)?;
        writer.write_u16(self.access_flags.0);
        writer.write_u16(self.this_class);
        writer.write_u16(self.super_class);
        writer.write_u16_table(&self.interfaces)?;
        writer.write_u16(table_len(self.fields.len())?);
        for field in &self.fields {
            field.write(&mut writer)?;
        }
        writer.write_u16(table_len(self.methods.len())?);
        for method in &self.methods {
            method.write(&mut writer)?;
        }
        Attribute::write_all(&mut writer, &self.attributes)?;
        Ok(writer.into_inner())
    }

    pub fn this_name(&self) -> VignetteResult<&str> {
        self.constant_pool.class_name(self.this_class)
    }

    pub fn super_name(&self) -> VignetteResult<Option<&str>> {
        match self.super_class {
            0 => Ok(None),
            index => self.constant_pool.class_name(index).map(Some),
        }
    }

    pub fn interface_names(&self) -> VignetteResult<Vec<&str>> {
        self.interfaces
            .iter()
            .map(|index| self.constant_pool.class_name(*index))
            .collect()
    }

    pub fn find_attribute(&self, name: &str) -> VignetteResult<Option<&Attribute>> {
        find_attribute(&self.attributes, &self.constant_pool, name)
    }

    /// Declares a field, interning its name and descriptor.
    pub fn add_field(
        &mut self,
        access_flags: AccessFlags,
        name: &str,
        descriptor: &str,
    ) -> VignetteResult<&mut ClassMember> {
        let member = self.member(access_flags, name, descriptor)?;
        self.fields.push(member);
        let last = self.fields.len() - 1;
        Ok(&mut self.fields[last])
    }

    /// Declares a method, interning its name and descriptor.
    pub fn add_method(
        &mut self,
        access_flags: AccessFlags,
        name: &str,
        descriptor: &str,
    ) -> VignetteResult<&mut ClassMember> {
        let member = self.member(access_flags, name, descriptor)?;
        self.methods.push(member);
        let last = self.methods.len() - 1;
        Ok(&mut self.methods[last])
    }

    fn member(
        &mut self,
        access_flags: AccessFlags,
        name: &str,
        descriptor: &str,
    ) -> VignetteResult<ClassMember> {
        let name_index = self.constant_pool.intern_utf8(name)?;
        let descriptor_index = self.constant_pool.intern_utf8(descriptor)?;
        Ok(ClassMember::new(access_flags, name_index, descriptor_index))
    }
}
