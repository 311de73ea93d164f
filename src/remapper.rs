//! Identifier remapping over a completed [`MappingSet`].

use crate::classfile::types::{MethodDescriptor, TypeDescriptor};
use crate::error::{VignetteError, VignetteResult};
use crate::mapping::{MappingSet, MethodMapping, MethodSignature};

/// Maps class, member, and parameter names through a mapping set.
///
/// The set is only read, so one remapper can be shared by every worker.
#[derive(Debug, Clone, Copy)]
pub struct Remapper<'m> {
    mappings: &'m MappingSet,
}

impl<'m> Remapper<'m> {
    pub fn new(mappings: &'m MappingSet) -> Self {
        Remapper { mappings }
    }

    pub fn mappings(&self) -> &'m MappingSet {
        self.mappings
    }

    /// Maps an internal class name. Array types are mapped as descriptors.
    ///
    /// Nested classes without a mapping of their own follow their outer class.
    pub fn map_type(&self, name: &str) -> String {
        if name.starts_with('[') {
            return self.map_desc(name).unwrap_or_else(|_| name.to_owned());
        }
        if let Some(mapped) = self
            .mappings
            .class(name)
            .and_then(|class| class.deobfuscated.as_deref())
        {
            return mapped.to_owned();
        }
        match name.rsplit_once('$') {
            Some((outer, inner)) if !outer.is_empty() && !inner.is_empty() => {
                format!("{}${inner}", self.map_type(outer))
            }
            _ => name.to_owned(),
        }
    }

    pub fn map_desc(&self, descriptor: &str) -> VignetteResult<String> {
        let parsed = TypeDescriptor::parse(descriptor)?;
        Ok(parsed.map_classes(&mut |name| self.map_type(name)).to_string())
    }

    /// Like [`Remapper::map_desc`] but also admits `V`.
    pub fn map_return_desc(&self, descriptor: &str) -> VignetteResult<String> {
        let parsed = TypeDescriptor::parse_return(descriptor)?;
        Ok(parsed.map_classes(&mut |name| self.map_type(name)).to_string())
    }

    pub fn map_method_desc(&self, descriptor: &str) -> VignetteResult<String> {
        let parsed = MethodDescriptor::parse(descriptor)?;
        Ok(parsed.map_classes(&mut |name| self.map_type(name)).to_string())
    }

    pub fn map_field_name(&self, owner: &str, name: &str, _descriptor: &str) -> String {
        self.mappings
            .class(owner)
            .and_then(|class| class.field(name))
            .map_or_else(|| name.to_owned(), |field| field.deobfuscated.clone())
    }

    pub fn method_mapping(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Option<&'m MethodMapping> {
        self.mappings
            .class(owner)?
            .method(&MethodSignature::new(name, descriptor))
    }

    pub fn map_method_name(&self, owner: &str, name: &str, descriptor: &str) -> String {
        if name.starts_with('<') {
            return name.to_owned();
        }
        self.method_mapping(owner, name, descriptor)
            .map_or_else(|| name.to_owned(), |method| method.deobfuscated.clone())
    }

    /// Mapped name of the parameter in local slot `index`, if the set has one.
    pub fn map_parameter_name(
        &self,
        owner: &str,
        method: &str,
        descriptor: &str,
        index: u16,
    ) -> Option<&'m str> {
        self.method_mapping(owner, method, descriptor)?
            .parameter(index)
    }

    /// Name of a non-lambda dynamic call site, which is left alone.
    pub fn map_invoke_dynamic_method_name(&self, name: &str, _descriptor: &str) -> String {
        name.to_owned()
    }

    /// Simple name recorded in an `InnerClasses` entry for `name`.
    pub fn map_inner_class_name(&self, name: &str, inner_name: &str) -> String {
        let mapped = self.map_type(name);
        match mapped.rfind('$') {
            Some(index) => mapped[index + 1..]
                .trim_start_matches(|c: char| c.is_ascii_digit())
                .to_owned(),
            None => inner_name.to_owned(),
        }
    }

    /// Maps every class name inside a generic signature, as found in
    /// `Signature` and `LocalVariableTypeTable` attributes.
    pub fn map_signature(&self, signature: &str) -> VignetteResult<String> {
        let mut mapper = SignatureMapper {
            remapper: self,
            source: signature,
            input: signature.as_bytes(),
            position: 0,
            output: String::with_capacity(signature.len()),
        };
        mapper.signature()?;
        Ok(mapper.output)
    }
}

/// Recursive-descent rewriter for the generic signature grammar.
struct SignatureMapper<'s, 'r, 'm> {
    remapper: &'r Remapper<'m>,
    source: &'s str,
    input: &'s [u8],
    position: usize,
    output: String,
}

impl<'s> SignatureMapper<'s, '_, '_> {
    fn signature(&mut self) -> VignetteResult<()> {
        if self.peek()? == b'<' {
            self.type_parameters()?;
        }
        while self.position < self.input.len() {
            match self.peek()? {
                b'(' | b')' | b'^' | b'V' => self.copy(1)?,
                b'Z' | b'C' | b'B' | b'S' | b'I' | b'J' | b'F' | b'D' => self.copy(1)?,
                _ => self.reference_type()?,
            }
        }
        Ok(())
    }

    fn type_parameters(&mut self) -> VignetteResult<()> {
        self.copy(1)?;
        while self.peek()? != b'>' {
            let name_end = self.find(b":")?;
            self.copy(name_end - self.position)?;
            while self.peek()? == b':' {
                self.copy(1)?;
                if matches!(self.peek()?, b'L' | b'T' | b'[') {
                    self.reference_type()?;
                }
            }
        }
        self.copy(1)
    }

    fn reference_type(&mut self) -> VignetteResult<()> {
        match self.peek()? {
            b'L' => self.class_type(),
            b'T' => {
                let end = self.find(b";")?;
                self.copy(end + 1 - self.position)
            }
            b'[' => {
                self.copy(1)?;
                match self.peek()? {
                    b'Z' | b'C' | b'B' | b'S' | b'I' | b'J' | b'F' | b'D' => self.copy(1),
                    _ => self.reference_type(),
                }
            }
            _ => Err(self.invalid()),
        }
    }

    fn class_type(&mut self) -> VignetteResult<()> {
        self.position += 1;
        self.output.push('L');
        let mut name = self.identifier()?.to_owned();
        self.output.push_str(&self.remapper.map_type(&name));
        loop {
            match self.peek()? {
                b'<' => self.type_arguments()?,
                b'.' => {
                    self.position += 1;
                    let inner = self.identifier()?;
                    let mapped_outer = format!("{}$", self.remapper.map_type(&name));
                    name = format!("{name}${inner}");
                    let mapped = self.remapper.map_type(&name);
                    let start = if mapped.starts_with(&mapped_outer) {
                        mapped_outer.len()
                    } else {
                        mapped.rfind('$').map_or(0, |index| index + 1)
                    };
                    self.output.push('.');
                    self.output.push_str(&mapped[start..]);
                }
                b';' => return self.copy(1),
                _ => return Err(self.invalid()),
            }
        }
    }

    fn type_arguments(&mut self) -> VignetteResult<()> {
        self.copy(1)?;
        while self.peek()? != b'>' {
            match self.peek()? {
                b'*' => self.copy(1)?,
                b'+' | b'-' => {
                    self.copy(1)?;
                    self.reference_type()?;
                }
                _ => self.reference_type()?,
            }
        }
        self.copy(1)
    }

    /// Reads a class name segment up to `<`, `.` or `;`.
    fn identifier(&mut self) -> VignetteResult<&'s str> {
        let start = self.position;
        while !matches!(self.peek()?, b'<' | b'.' | b';') {
            self.position += 1;
        }
        if start == self.position {
            return Err(self.invalid());
        }
        let source = self.source;
        Ok(&source[start..self.position])
    }

    fn find(&self, needle: &[u8]) -> VignetteResult<usize> {
        self.input[self.position..]
            .iter()
            .position(|byte| needle.contains(byte))
            .map(|offset| self.position + offset)
            .ok_or_else(|| self.invalid())
    }

    fn peek(&self) -> VignetteResult<u8> {
        self.input
            .get(self.position)
            .copied()
            .ok_or_else(|| self.invalid())
    }

    /// Copies `len` input bytes verbatim; only called on ASCII boundaries.
    fn copy(&mut self, len: usize) -> VignetteResult<()> {
        let source = self.source;
        let end = self.position + len;
        let text = source.get(self.position..end).ok_or_else(|| self.invalid())?;
        self.output.push_str(text);
        self.position = end;
        Ok(())
    }

    fn invalid(&self) -> VignetteError {
        VignetteError::descriptor(self.source)
    }
}
