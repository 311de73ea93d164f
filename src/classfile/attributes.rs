//! Attribute payloads the remapping pass needs to see inside.
//!
//! Attributes are kept as raw bytes on classes, fields, and methods. The types
//! here decode the few payloads that carry constant pool references to names
//! or descriptors, so they can be rewritten and encoded again. Everything else
//! passes through untouched.

use super::constant_pool::ConstantPool;
use super::reader::{ClassReader, ClassWriter, table_len};
use crate::error::{VignetteError, VignetteResult};

/// Well-known attribute names.
pub mod names {
    pub const ANNOTATION_DEFAULT: &str = "AnnotationDefault";
    pub const BOOTSTRAP_METHODS: &str = "BootstrapMethods";
    pub const CODE: &str = "Code";
    pub const ENCLOSING_METHOD: &str = "EnclosingMethod";
    pub const INNER_CLASSES: &str = "InnerClasses";
    pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
    pub const LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";
    pub const RECORD: &str = "Record";
    pub const RUNTIME_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";
    pub const RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS: &str =
        "RuntimeInvisibleParameterAnnotations";
    pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
    pub const RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeVisibleParameterAnnotations";
    pub const SIGNATURE: &str = "Signature";
}

/// A raw attribute: name index plus undecoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name_index: u16,
    pub info: Vec<u8>,
}

impl Attribute {
    pub fn new(name_index: u16, info: Vec<u8>) -> Self {
        Attribute { name_index, info }
    }

    pub fn name<'a>(&self, pool: &'a ConstantPool) -> VignetteResult<&'a str> {
        pool.utf8(self.name_index)
    }

    /// Reads the `u2` index stored by single-index attributes such as `Signature`.
    pub fn single_index(&self) -> VignetteResult<u16> {
        decode_exact(&self.info, |reader| reader.read_u16())
    }

    pub fn read_all(reader: &mut ClassReader<'_>) -> VignetteResult<Vec<Attribute>> {
        let count = reader.read_u16()?;
        let mut attributes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name_index = reader.read_u16()?;
            let len = reader.read_u32()? as usize;
            attributes.push(Attribute::new(name_index, reader.read_bytes(len)?.to_vec()));
        }
        Ok(attributes)
    }

    pub fn write_all(writer: &mut ClassWriter, attributes: &[Attribute]) -> VignetteResult<()> {
        writer.write_u16(table_len(attributes.len())?);
        for attribute in attributes {
            writer.write_u16(attribute.name_index);
            let len = u32::try_from(attribute.info.len())
                .map_err(|_| VignetteError::format("attribute exceeds 4GiB"))?;
            writer.write_u32(len);
            writer.write_bytes(&attribute.info);
        }
        Ok(())
    }
}

/// Runs `decode` over `info` and insists that every byte was consumed.
fn decode_exact<T>(
    info: &[u8],
    decode: impl FnOnce(&mut ClassReader<'_>) -> VignetteResult<T>,
) -> VignetteResult<T> {
    let mut reader = ClassReader::new(info);
    let value = decode(&mut reader)?;
    if reader.remaining() != 0 {
        return Err(VignetteError::format(format!(
            "{} trailing bytes after attribute payload",
            reader.remaining()
        )));
    }
    Ok(value)
}

fn encode(write: impl FnOnce(&mut ClassWriter) -> VignetteResult<()>) -> VignetteResult<Vec<u8>> {
    let mut writer = ClassWriter::new();
    write(&mut writer)?;
    Ok(writer.into_inner())
}

/// Exception table row of a `Code` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

/// The `Code` attribute of a method with a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

impl CodeAttribute {
    pub fn parse(info: &[u8]) -> VignetteResult<Self> {
        decode_exact(info, |reader| {
            let max_stack = reader.read_u16()?;
            let max_locals = reader.read_u16()?;
            let code_len = reader.read_u32()? as usize;
            let code = reader.read_bytes(code_len)?.to_vec();
            let handler_count = reader.read_u16()?;
            let mut exception_table = Vec::with_capacity(handler_count as usize);
            for _ in 0..handler_count {
                exception_table.push(ExceptionHandler {
                    start_pc: reader.read_u16()?,
                    end_pc: reader.read_u16()?,
                    handler_pc: reader.read_u16()?,
                    catch_type: reader.read_u16()?,
                });
            }
            Ok(CodeAttribute {
                max_stack,
                max_locals,
                code,
                exception_table,
                attributes: Attribute::read_all(reader)?,
            })
        })
    }

    pub fn to_bytes(&self) -> VignetteResult<Vec<u8>> {
        encode(|writer| {
            writer.write_u16(self.max_stack);
            writer.write_u16(self.max_locals);
            let code_len = u32::try_from(self.code.len())
                .map_err(|_| VignetteError::format("method body exceeds 4GiB"))?;
            writer.write_u32(code_len);
            writer.write_bytes(&self.code);
            writer.write_u16(table_len(self.exception_table.len())?);
            for handler in &self.exception_table {
                writer.write_u16(handler.start_pc);
                writer.write_u16(handler.end_pc);
                writer.write_u16(handler.handler_pc);
                writer.write_u16(handler.catch_type);
            }
            Attribute::write_all(writer, &self.attributes)
        })
    }
}

/// One row of a `LocalVariableTable` or `LocalVariableTypeTable`.
///
/// In the type table `descriptor_index` points at a generic signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableEntry {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub index: u16,
}

impl LocalVariableEntry {
    pub fn parse_table(info: &[u8]) -> VignetteResult<Vec<Self>> {
        decode_exact(info, |reader| {
            let count = reader.read_u16()?;
            let mut entries = Vec::with_capacity(count as usize);
            for _ in 0..count {
                entries.push(LocalVariableEntry {
                    start_pc: reader.read_u16()?,
                    length: reader.read_u16()?,
                    name_index: reader.read_u16()?,
                    descriptor_index: reader.read_u16()?,
                    index: reader.read_u16()?,
                });
            }
            Ok(entries)
        })
    }

    pub fn table_to_bytes(entries: &[Self]) -> VignetteResult<Vec<u8>> {
        encode(|writer| {
            writer.write_u16(table_len(entries.len())?);
            for entry in entries {
                writer.write_u16(entry.start_pc);
                writer.write_u16(entry.length);
                writer.write_u16(entry.name_index);
                writer.write_u16(entry.descriptor_index);
                writer.write_u16(entry.index);
            }
            Ok(())
        })
    }
}

/// Entry of the class-level `BootstrapMethods` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapMethod {
    pub method_ref: u16,
    pub arguments: Vec<u16>,
}

impl BootstrapMethod {
    pub fn parse_table(info: &[u8]) -> VignetteResult<Vec<Self>> {
        decode_exact(info, |reader| {
            let count = reader.read_u16()?;
            let mut methods = Vec::with_capacity(count as usize);
            for _ in 0..count {
                methods.push(BootstrapMethod {
                    method_ref: reader.read_u16()?,
                    arguments: reader.read_u16_table()?,
                });
            }
            Ok(methods)
        })
    }

    pub fn table_to_bytes(methods: &[Self]) -> VignetteResult<Vec<u8>> {
        encode(|writer| {
            writer.write_u16(table_len(methods.len())?);
            for method in methods {
                writer.write_u16(method.method_ref);
                writer.write_u16_table(&method.arguments)?;
            }
            Ok(())
        })
    }
}

/// Entry of the `InnerClasses` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClassEntry {
    pub inner_class_info_index: u16,
    pub outer_class_info_index: u16,
    /// Zero for anonymous classes.
    pub inner_name_index: u16,
    pub access_flags: u16,
}

impl InnerClassEntry {
    pub fn parse_table(info: &[u8]) -> VignetteResult<Vec<Self>> {
        decode_exact(info, |reader| {
            let count = reader.read_u16()?;
            let mut entries = Vec::with_capacity(count as usize);
            for _ in 0..count {
                entries.push(InnerClassEntry {
                    inner_class_info_index: reader.read_u16()?,
                    outer_class_info_index: reader.read_u16()?,
                    inner_name_index: reader.read_u16()?,
                    access_flags: reader.read_u16()?,
                });
            }
            Ok(entries)
        })
    }

    pub fn table_to_bytes(entries: &[Self]) -> VignetteResult<Vec<u8>> {
        encode(|writer| {
            writer.write_u16(table_len(entries.len())?);
            for entry in entries {
                writer.write_u16(entry.inner_class_info_index);
                writer.write_u16(entry.outer_class_info_index);
                writer.write_u16(entry.inner_name_index);
                writer.write_u16(entry.access_flags);
            }
            Ok(())
        })
    }
}

/// The `EnclosingMethod` attribute; `method_index` is zero outside a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnclosingMethod {
    pub class_index: u16,
    pub method_index: u16,
}

impl EnclosingMethod {
    pub fn parse(info: &[u8]) -> VignetteResult<Self> {
        decode_exact(info, |reader| {
            Ok(EnclosingMethod {
                class_index: reader.read_u16()?,
                method_index: reader.read_u16()?,
            })
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ClassWriter::with_capacity(4);
        writer.write_u16(self.class_index);
        writer.write_u16(self.method_index);
        writer.into_inner()
    }
}

/// One component of a `Record` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordComponent {
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl RecordComponent {
    pub fn parse_table(info: &[u8]) -> VignetteResult<Vec<Self>> {
        decode_exact(info, |reader| {
            let count = reader.read_u16()?;
            let mut components = Vec::with_capacity(count as usize);
            for _ in 0..count {
                components.push(RecordComponent {
                    name_index: reader.read_u16()?,
                    descriptor_index: reader.read_u16()?,
                    attributes: Attribute::read_all(reader)?,
                });
            }
            Ok(components)
        })
    }

    pub fn table_to_bytes(components: &[Self]) -> VignetteResult<Vec<u8>> {
        encode(|writer| {
            writer.write_u16(table_len(components.len())?);
            for component in components {
                writer.write_u16(component.name_index);
                writer.write_u16(component.descriptor_index);
                Attribute::write_all(writer, &component.attributes)?;
            }
            Ok(())
        })
    }
}

/// A runtime annotation: a type descriptor plus named element values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub type_index: u16,
    pub elements: Vec<(u16, ElementValue)>,
}

/// Values stored inside annotation elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    /// Primitive or string constant (`B C D F I J S Z s`).
    Const { tag: u8, value_index: u16 },
    Enum {
        type_name_index: u16,
        const_name_index: u16,
    },
    /// `class_info_index` points at a return descriptor `Utf8`.
    Class { class_info_index: u16 },
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

impl Annotation {
    fn read(reader: &mut ClassReader<'_>) -> VignetteResult<Self> {
        let type_index = reader.read_u16()?;
        let count = reader.read_u16()?;
        let mut elements = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name_index = reader.read_u16()?;
            elements.push((name_index, ElementValue::read(reader)?));
        }
        Ok(Annotation {
            type_index,
            elements,
        })
    }

    fn write(&self, writer: &mut ClassWriter) -> VignetteResult<()> {
        writer.write_u16(self.type_index);
        writer.write_u16(table_len(self.elements.len())?);
        for (name_index, value) in &self.elements {
            writer.write_u16(*name_index);
            value.write(writer)?;
        }
        Ok(())
    }

    /// Decodes a `Runtime(In)VisibleAnnotations` payload.
    pub fn parse_table(info: &[u8]) -> VignetteResult<Vec<Self>> {
        decode_exact(info, read_annotation_list)
    }

    pub fn table_to_bytes(annotations: &[Self]) -> VignetteResult<Vec<u8>> {
        encode(|writer| write_annotation_list(writer, annotations))
    }

    /// Decodes a `Runtime(In)VisibleParameterAnnotations` payload.
    pub fn parse_parameter_table(info: &[u8]) -> VignetteResult<Vec<Vec<Self>>> {
        decode_exact(info, |reader| {
            let count = reader.read_u8()?;
            let mut parameters = Vec::with_capacity(count as usize);
            for _ in 0..count {
                parameters.push(read_annotation_list(reader)?);
            }
            Ok(parameters)
        })
    }

    pub fn parameter_table_to_bytes(parameters: &[Vec<Self>]) -> VignetteResult<Vec<u8>> {
        encode(|writer| {
            let count = u8::try_from(parameters.len())
                .map_err(|_| VignetteError::format("more than 255 annotated parameters"))?;
            writer.write_u8(count);
            for annotations in parameters {
                write_annotation_list(writer, annotations)?;
            }
            Ok(())
        })
    }
}

fn read_annotation_list(reader: &mut ClassReader<'_>) -> VignetteResult<Vec<Annotation>> {
    let count = reader.read_u16()?;
    let mut annotations = Vec::with_capacity(count as usize);
    for _ in 0..count {
        annotations.push(Annotation::read(reader)?);
    }
    Ok(annotations)
}

fn write_annotation_list(writer: &mut ClassWriter, annotations: &[Annotation]) -> VignetteResult<()> {
    writer.write_u16(table_len(annotations.len())?);
    for annotation in annotations {
        annotation.write(writer)?;
    }
    Ok(())
}

impl ElementValue {
    fn read(reader: &mut ClassReader<'_>) -> VignetteResult<Self> {
        let tag = reader.read_u8()?;
        let value = match tag {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => ElementValue::Const {
                tag,
                value_index: reader.read_u16()?,
            },
            b'e' => ElementValue::Enum {
                type_name_index: reader.read_u16()?,
                const_name_index: reader.read_u16()?,
            },
            b'c' => ElementValue::Class {
                class_info_index: reader.read_u16()?,
            },
            b'@' => ElementValue::Annotation(Annotation::read(reader)?),
            b'[' => {
                let count = reader.read_u16()?;
                let mut values = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    values.push(ElementValue::read(reader)?);
                }
                ElementValue::Array(values)
            }
            other => {
                return Err(VignetteError::format(format!(
                    "unknown annotation element tag {:?}",
                    other as char
                )));
            }
        };
        Ok(value)
    }

    fn write(&self, writer: &mut ClassWriter) -> VignetteResult<()> {
        match self {
            ElementValue::Const { tag, value_index } => {
                writer.write_u8(*tag);
                writer.write_u16(*value_index);
            }
            ElementValue::Enum {
                type_name_index,
                const_name_index,
            } => {
                writer.write_u8(b'e');
                writer.write_u16(*type_name_index);
                writer.write_u16(*const_name_index);
            }
            ElementValue::Class { class_info_index } => {
                writer.write_u8(b'c');
                writer.write_u16(*class_info_index);
            }
            ElementValue::Annotation(annotation) => {
                writer.write_u8(b'@');
                annotation.write(writer)?;
            }
            ElementValue::Array(values) => {
                writer.write_u8(b'[');
                writer.write_u16(table_len(values.len())?);
                for value in values {
                    value.write(writer)?;
                }
            }
        }
        Ok(())
    }

    /// Decodes an `AnnotationDefault` payload.
    pub fn parse_default(info: &[u8]) -> VignetteResult<Self> {
        decode_exact(info, ElementValue::read)
    }

    pub fn to_bytes(&self) -> VignetteResult<Vec<u8>> {
        encode(|writer| self.write(writer))
    }
}

#[cfg(test)]
mod tests {
    use super::{Annotation, CodeAttribute, ElementValue, ExceptionHandler, LocalVariableEntry};
    use crate::error::VignetteResult;
    use pretty_assertions::assert_eq;

    #[test]
    fn code_attribute_round_trips_with_nested_tables() -> VignetteResult<()> {
        let locals = vec![LocalVariableEntry {
            start_pc: 0,
            length: 3,
            name_index: 7,
            descriptor_index: 8,
            index: 1,
        }];
        let code = CodeAttribute {
            max_stack: 2,
            max_locals: 2,
            code: vec![0x2a, 0x2b, 0xb1],
            exception_table: vec![ExceptionHandler {
                start_pc: 0,
                end_pc: 2,
                handler_pc: 2,
                catch_type: 0,
            }],
            attributes: vec![super::Attribute::new(
                6,
                LocalVariableEntry::table_to_bytes(&locals)?,
            )],
        };
        let reparsed = CodeAttribute::parse(&code.to_bytes()?)?;
        assert_eq!(reparsed, code);
        assert_eq!(
            LocalVariableEntry::parse_table(&reparsed.attributes[0].info)?,
            locals
        );
        Ok(())
    }

    #[test]
    fn nested_annotation_values_round_trip() -> VignetteResult<()> {
        let annotations = vec![Annotation {
            type_index: 1,
            elements: vec![(
                2,
                ElementValue::Array(vec![
                    ElementValue::Class {
                        class_info_index: 3,
                    },
                    ElementValue::Annotation(Annotation {
                        type_index: 4,
                        elements: vec![(
                            5,
                            ElementValue::Enum {
                                type_name_index: 6,
                                const_name_index: 7,
                            },
                        )],
                    }),
                ]),
            )],
        }];
        let bytes = Annotation::table_to_bytes(&annotations)?;
        assert_eq!(Annotation::parse_table(&bytes)?, annotations);
        Ok(())
    }

    #[test]
    fn trailing_payload_bytes_are_rejected() {
        assert!(LocalVariableEntry::parse_table(&[0, 0, 1]).is_err());
    }
}
