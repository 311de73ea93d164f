//! Field and method descriptors as they appear in class file metadata.

use std::fmt;

use crate::error::{VignetteError, VignetteResult};

/// Primitive value kinds, keyed by their single-letter descriptor code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Boolean,
    Char,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
}

impl PrimitiveType {
    pub const fn from_code(code: char) -> Option<Self> {
        match code {
            'Z' => Some(PrimitiveType::Boolean),
            'C' => Some(PrimitiveType::Char),
            'B' => Some(PrimitiveType::Byte),
            'S' => Some(PrimitiveType::Short),
            'I' => Some(PrimitiveType::Int),
            'J' => Some(PrimitiveType::Long),
            'F' => Some(PrimitiveType::Float),
            'D' => Some(PrimitiveType::Double),
            'V' => Some(PrimitiveType::Void),
            _ => None,
        }
    }

    pub const fn code(self) -> char {
        match self {
            PrimitiveType::Boolean => 'Z',
            PrimitiveType::Char => 'C',
            PrimitiveType::Byte => 'B',
            PrimitiveType::Short => 'S',
            PrimitiveType::Int => 'I',
            PrimitiveType::Long => 'J',
            PrimitiveType::Float => 'F',
            PrimitiveType::Double => 'D',
            PrimitiveType::Void => 'V',
        }
    }

    /// Number of local variable slots a value of this type occupies.
    pub const fn slot_size(self) -> u16 {
        match self {
            PrimitiveType::Long | PrimitiveType::Double => 2,
            PrimitiveType::Void => 0,
            _ => 1,
        }
    }
}

/// A parsed field descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Primitive(PrimitiveType),
    /// Internal (slash separated) class name.
    Object(String),
    /// `element` is never itself an array.
    Array {
        element: Box<TypeDescriptor>,
        dimensions: u8,
    },
}

impl TypeDescriptor {
    /// Parses a complete field descriptor. `V` is rejected.
    pub fn parse(descriptor: &str) -> VignetteResult<Self> {
        let (parsed, rest) = Self::parse_prefix(descriptor)
            .ok_or_else(|| VignetteError::descriptor(descriptor))?;
        if !rest.is_empty() || parsed == TypeDescriptor::Primitive(PrimitiveType::Void) {
            return Err(VignetteError::descriptor(descriptor));
        }
        Ok(parsed)
    }

    /// Parses a return descriptor, which additionally admits `V`.
    pub fn parse_return(descriptor: &str) -> VignetteResult<Self> {
        match Self::parse_prefix(descriptor) {
            Some((parsed, "")) => Ok(parsed),
            _ => Err(VignetteError::descriptor(descriptor)),
        }
    }

    /// Parses one descriptor from the front of `input`, returning the remainder.
    fn parse_prefix(input: &str) -> Option<(TypeDescriptor, &str)> {
        let stripped = input.trim_start_matches('[');
        let dimensions = input.len() - stripped.len();
        let mut chars = stripped.chars();
        let first = chars.next()?;
        let (element, rest) = if first == 'L' {
            let body = chars.as_str();
            let end = body.find(';')?;
            let name = &body[..end];
            if name.is_empty() || name.contains(['.', '[']) {
                return None;
            }
            (TypeDescriptor::Object(name.to_owned()), &body[end + 1..])
        } else {
            (
                TypeDescriptor::Primitive(PrimitiveType::from_code(first)?),
                chars.as_str(),
            )
        };

        if dimensions == 0 {
            return Some((element, rest));
        }
        if element == TypeDescriptor::Primitive(PrimitiveType::Void) {
            return None;
        }
        Some((
            TypeDescriptor::Array {
                element: Box::new(element),
                dimensions: u8::try_from(dimensions).ok()?,
            },
            rest,
        ))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, TypeDescriptor::Array { .. })
    }

    /// Innermost non-array type.
    pub fn element(&self) -> &TypeDescriptor {
        match self {
            TypeDescriptor::Array { element, .. } => element,
            other => other,
        }
    }

    pub fn slot_size(&self) -> u16 {
        match self {
            TypeDescriptor::Primitive(primitive) => primitive.slot_size(),
            _ => 1,
        }
    }

    /// Rewrites every class name inside this descriptor.
    pub fn map_classes(&self, map: &mut impl FnMut(&str) -> String) -> TypeDescriptor {
        match self {
            TypeDescriptor::Primitive(primitive) => TypeDescriptor::Primitive(*primitive),
            TypeDescriptor::Object(name) => TypeDescriptor::Object(map(name)),
            TypeDescriptor::Array {
                element,
                dimensions,
            } => TypeDescriptor::Array {
                element: Box::new(element.map_classes(map)),
                dimensions: *dimensions,
            },
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Primitive(primitive) => write!(f, "{}", primitive.code()),
            TypeDescriptor::Object(name) => write!(f, "L{name};"),
            TypeDescriptor::Array {
                element,
                dimensions,
            } => {
                for _ in 0..*dimensions {
                    f.write_str("[")?;
                }
                write!(f, "{element}")
            }
        }
    }
}

/// A parsed method descriptor such as `(ILjava/lang/String;)V`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    pub parameters: Vec<TypeDescriptor>,
    pub return_type: TypeDescriptor,
}

impl MethodDescriptor {
    pub fn new(parameters: Vec<TypeDescriptor>, return_type: TypeDescriptor) -> Self {
        MethodDescriptor {
            parameters,
            return_type,
        }
    }

    pub fn parse(descriptor: &str) -> VignetteResult<Self> {
        let invalid = || VignetteError::descriptor(descriptor);
        let mut rest = descriptor.strip_prefix('(').ok_or_else(invalid)?;
        let mut parameters = Vec::new();
        while !rest.starts_with(')') {
            let (parameter, remainder) = TypeDescriptor::parse_prefix(rest).ok_or_else(invalid)?;
            if parameter == TypeDescriptor::Primitive(PrimitiveType::Void) {
                return Err(invalid());
            }
            parameters.push(parameter);
            rest = remainder;
        }
        let return_type = TypeDescriptor::parse_return(&rest[1..]).map_err(|_| invalid())?;
        Ok(MethodDescriptor::new(parameters, return_type))
    }

    /// Total slots taken by the parameters, excluding any receiver.
    pub fn parameter_slots(&self) -> u16 {
        self.parameters.iter().map(TypeDescriptor::slot_size).sum()
    }

    pub fn map_classes(&self, map: &mut impl FnMut(&str) -> String) -> MethodDescriptor {
        MethodDescriptor {
            parameters: self
                .parameters
                .iter()
                .map(|parameter| parameter.map_classes(map))
                .collect(),
            return_type: self.return_type.map_classes(map),
        }
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for parameter in &self.parameters {
            write!(f, "{parameter}")?;
        }
        write!(f, "){}", self.return_type)
    }
}

#[cfg(test)]
mod tests {
    use super::{MethodDescriptor, PrimitiveType, TypeDescriptor};
    use crate::error::VignetteResult;

    #[test]
    fn parses_object_and_array_descriptors() -> VignetteResult<()> {
        assert_eq!(
            TypeDescriptor::parse("Lnet/minecraft/Foo$Bar;")?,
            TypeDescriptor::Object("net/minecraft/Foo$Bar".to_owned())
        );
        let array = TypeDescriptor::parse("[[I")?;
        assert_eq!(
            array,
            TypeDescriptor::Array {
                element: Box::new(TypeDescriptor::Primitive(PrimitiveType::Int)),
                dimensions: 2,
            }
        );
        assert_eq!(array.to_string(), "[[I");
        Ok(())
    }

    #[test]
    fn rejects_malformed_descriptors() {
        for descriptor in ["", "V", "[V", "Lfoo", "L;", "Q", "II", "Ljava.lang.String;"] {
            assert!(
                TypeDescriptor::parse(descriptor).is_err(),
                "{descriptor} should be rejected"
            );
        }
        for descriptor in ["", "()", "(V)V", "I)V", "(I"] {
            assert!(MethodDescriptor::parse(descriptor).is_err(), "{descriptor}");
        }
    }

    #[test]
    fn counts_wide_parameter_slots() -> VignetteResult<()> {
        let descriptor = MethodDescriptor::parse("(JLjava/lang/Object;D[J)V")?;
        assert_eq!(descriptor.parameters.len(), 4);
        assert_eq!(descriptor.parameter_slots(), 6);
        assert_eq!(descriptor.to_string(), "(JLjava/lang/Object;D[J)V");
        Ok(())
    }

    #[test]
    fn maps_class_names_in_place() -> VignetteResult<()> {
        let descriptor = MethodDescriptor::parse("(La;[La;I)Lb;")?;
        let mapped = descriptor.map_classes(&mut |name| format!("net/{name}"));
        assert_eq!(mapped.to_string(), "(Lnet/a;[Lnet/a;I)Lnet/b;");
        Ok(())
    }
}
