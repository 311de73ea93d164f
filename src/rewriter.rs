//! Rewrites one class file through a [`Remapper`], naming parameters on the way.
//!
//! The rewrite never moves an existing constant pool entry. Renamed strings
//! are interned as new `Utf8` entries and the referring entries or attributes
//! are pointed at them, so method bodies stay valid byte for byte.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::debug;

use crate::classfile::{
    Annotation, Attribute, BootstrapMethod, ClassFile, ClassMember, CodeAttribute,
    ConstantPool, ConstantPoolEntry, ElementValue, EnclosingMethod, InnerClassEntry,
    LocalVariableEntry, MemberKind, MethodDescriptor, MethodHandleKind, RecordComponent,
    TypeDescriptor, names,
};
use crate::deducer::{DeduceRequest, UsedNames, deduce};
use crate::dictionary::Dictionary;
use crate::error::{VignetteError, VignetteResult};
use crate::remapper::Remapper;

pub const LAMBDA_METAFACTORY: &str = "java/lang/invoke/LambdaMetafactory";
pub const METAFACTORY_DESCRIPTOR: &str = "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;";
pub const ALT_METAFACTORY_DESCRIPTOR: &str = "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;[Ljava/lang/Object;)Ljava/lang/invoke/CallSite;";

/// The two bootstrap methods that spin up lambda instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LambdaFactory {
    Metafactory,
    AltMetafactory,
}

impl LambdaFactory {
    /// Leading bootstrap arguments both factories require: the interface
    /// method type, the implementation handle, and the instantiated type.
    pub const REQUIRED_ARGUMENTS: usize = 3;

    /// Recognizes `invokestatic LambdaMetafactory.metafactory` and `.altMetafactory`.
    pub fn identify(
        pool: &ConstantPool,
        bootstrap: &BootstrapMethod,
    ) -> VignetteResult<Option<LambdaFactory>> {
        let handle = pool.method_handle(bootstrap.method_ref)?;
        let member = handle.member;
        if handle.kind != MethodHandleKind::InvokeStatic
            || member.kind != MemberKind::Method
            || member.owner != LAMBDA_METAFACTORY
        {
            return Ok(None);
        }
        Ok(match (member.name, member.descriptor) {
            ("metafactory", METAFACTORY_DESCRIPTOR) => Some(LambdaFactory::Metafactory),
            ("altMetafactory", ALT_METAFACTORY_DESCRIPTOR) => Some(LambdaFactory::AltMetafactory),
            _ => None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            LambdaFactory::Metafactory => "metafactory",
            LambdaFactory::AltMetafactory => "altMetafactory",
        }
    }
}

/// Parameter names synthesized for a method without a body.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AbstractParameterNames {
    pub class: String,
    pub method: String,
    pub descriptor: String,
    pub names: Vec<String>,
}

impl fmt::Display for AbstractParameterNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.class, self.method, self.descriptor)?;
        for name in &self.names {
            write!(f, " {name}")?;
        }
        Ok(())
    }
}

/// Output of rewriting one class.
#[derive(Debug, Clone)]
pub struct RewrittenClass {
    pub original_name: String,
    pub name: String,
    pub bytes: Vec<u8>,
    pub abstract_parameters: Vec<AbstractParameterNames>,
}

/// Rewrites classes against a shared remapper and optional dictionary.
///
/// Without a dictionary parameters only take names from the mapping set.
#[derive(Debug, Clone, Copy)]
pub struct ClassRewriter<'a> {
    remapper: Remapper<'a>,
    dictionary: Option<&'a Dictionary>,
}

impl<'a> ClassRewriter<'a> {
    pub fn new(remapper: Remapper<'a>) -> Self {
        ClassRewriter {
            remapper,
            dictionary: None,
        }
    }

    /// Enables name deduction for parameters the mapping set leaves unnamed.
    pub fn with_deduction(mut self, dictionary: &'a Dictionary) -> Self {
        self.dictionary = Some(dictionary);
        self
    }

    pub fn deduces(&self) -> bool {
        self.dictionary.is_some()
    }

    pub fn rewrite_bytes(&self, bytes: &[u8]) -> VignetteResult<RewrittenClass> {
        let class = ClassFile::parse(bytes)?;
        let name = class.this_name()?.to_owned();
        self.rewrite(&class).map_err(|err| err.in_class(name))
    }

    pub fn rewrite(&self, class: &ClassFile) -> VignetteResult<RewrittenClass> {
        let owner = class.this_name()?;
        let bootstrap_methods = match class.find_attribute(names::BOOTSTRAP_METHODS)? {
            Some(attribute) => BootstrapMethod::parse_table(&attribute.info)?,
            None => Vec::new(),
        };
        let mut rewrite = ClassRewrite {
            remapper: self.remapper,
            dictionary: self.dictionary,
            source: &class.constant_pool,
            pool: class.constant_pool.clone(),
            owner,
            bootstrap_methods,
            abstract_parameters: Vec::new(),
        };

        rewrite.remap_constant_pool()?;
        let fields = class
            .fields
            .iter()
            .map(|field| rewrite.rewrite_field(field))
            .collect::<VignetteResult<Vec<_>>>()?;
        let methods = class
            .methods
            .iter()
            .map(|method| rewrite.rewrite_method(method))
            .collect::<VignetteResult<Vec<_>>>()?;
        let attributes = class
            .attributes
            .iter()
            .map(|attribute| rewrite.rewrite_class_attribute(attribute))
            .collect::<VignetteResult<Vec<_>>>()?;

        let output = ClassFile {
            version: class.version,
            constant_pool: rewrite.pool,
            access_flags: class.access_flags,
            this_class: class.this_class,
            super_class: class.super_class,
            interfaces: class.interfaces.clone(),
            fields,
            methods,
            attributes,
        };
        let name = self.remapper.map_type(owner);
        debug!(
            class = owner,
            mapped = %name,
            constants = output.constant_pool.len(),
            "rewrote class"
        );
        Ok(RewrittenClass {
            original_name: owner.to_owned(),
            name,
            bytes: output.to_bytes()?,
            abstract_parameters: rewrite.abstract_parameters,
        })
    }
}

/// A method as seen by parameter naming.
struct MethodContext<'c> {
    owner: &'c str,
    name: &'c str,
    descriptor: &'c str,
    is_static: bool,
    /// Remapped parameter types.
    parameters: Vec<TypeDescriptor>,
}

impl MethodContext<'_> {
    /// Local slot and remapped descriptor of every declared parameter.
    fn parameter_slots(&self) -> Vec<(u16, String)> {
        let mut slot = u16::from(!self.is_static);
        let mut slots = Vec::with_capacity(self.parameters.len());
        for parameter in &self.parameters {
            slots.push((slot, parameter.to_string()));
            slot += parameter.slot_size();
        }
        slots
    }

    fn request<'p>(&'p self, parameter: &'p PendingParameter) -> DeduceRequest<'p> {
        DeduceRequest {
            owner: self.owner,
            method: self.name,
            descriptor: self.descriptor,
            index: parameter.slot,
            raw_name: &parameter.raw_name,
            parameter_type: &parameter.parameter_type,
        }
    }
}

struct PendingParameter {
    slot: u16,
    raw_name: String,
    parameter_type: String,
}

/// State of one class rewrite. Reads come from `source`, writes go to `pool`.
struct ClassRewrite<'r, 'c> {
    remapper: Remapper<'r>,
    dictionary: Option<&'r Dictionary>,
    source: &'c ConstantPool,
    pool: ConstantPool,
    owner: &'c str,
    bootstrap_methods: Vec<BootstrapMethod>,
    abstract_parameters: Vec<AbstractParameterNames>,
}

impl<'c> ClassRewrite<'_, 'c> {
    /// Index of a `Utf8` holding `mapped`, reusing `index` when nothing changed.
    fn redirect(&mut self, index: u16, mapped: &str) -> VignetteResult<u16> {
        if self.source.utf8(index)? == mapped {
            Ok(index)
        } else {
            self.pool.intern_utf8(mapped)
        }
    }

    fn redirect_name_and_type(
        &mut self,
        index: u16,
        name: &str,
        descriptor: &str,
    ) -> VignetteResult<Option<u16>> {
        let (old_name, old_descriptor) = self.source.name_and_type(index)?;
        if old_name == name && old_descriptor == descriptor {
            return Ok(None);
        }
        self.pool.intern_name_and_type(name, descriptor).map(Some)
    }

    fn remap_constant_pool(&mut self) -> VignetteResult<()> {
        let source = self.source;
        for (index, entry) in source.iter() {
            if let Some(replacement) = self.remap_entry(entry)? {
                self.pool.replace(index, replacement)?;
            }
        }
        Ok(())
    }

    fn remap_entry(&mut self, entry: &ConstantPoolEntry) -> VignetteResult<Option<ConstantPoolEntry>> {
        let source = self.source;
        let replacement = match *entry {
            ConstantPoolEntry::Class { name_index } => {
                let name = source.utf8(name_index)?;
                let mapped = self.remapper.map_type(name);
                if mapped == name {
                    None
                } else {
                    Some(ConstantPoolEntry::Class {
                        name_index: self.pool.intern_utf8(&mapped)?,
                    })
                }
            }
            ConstantPoolEntry::FieldRef {
                class_index,
                name_and_type_index,
            } => self
                .remap_member(MemberKind::Field, class_index, name_and_type_index)?
                .map(|name_and_type_index| ConstantPoolEntry::FieldRef {
                    class_index,
                    name_and_type_index,
                }),
            ConstantPoolEntry::MethodRef {
                class_index,
                name_and_type_index,
            } => self
                .remap_member(MemberKind::Method, class_index, name_and_type_index)?
                .map(|name_and_type_index| ConstantPoolEntry::MethodRef {
                    class_index,
                    name_and_type_index,
                }),
            ConstantPoolEntry::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => self
                .remap_member(MemberKind::InterfaceMethod, class_index, name_and_type_index)?
                .map(|name_and_type_index| ConstantPoolEntry::InterfaceMethodRef {
                    class_index,
                    name_and_type_index,
                }),
            ConstantPoolEntry::MethodType { descriptor_index } => {
                let descriptor = source.utf8(descriptor_index)?;
                let mapped = self.remapper.map_method_desc(descriptor)?;
                if mapped == descriptor {
                    None
                } else {
                    Some(ConstantPoolEntry::MethodType {
                        descriptor_index: self.pool.intern_utf8(&mapped)?,
                    })
                }
            }
            ConstantPoolEntry::Dynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => {
                let (name, descriptor) = source.name_and_type(name_and_type_index)?;
                let mapped_name = self.remapper.map_invoke_dynamic_method_name(name, descriptor);
                let mapped_descriptor = self.remapper.map_desc(descriptor)?;
                self.redirect_name_and_type(name_and_type_index, &mapped_name, &mapped_descriptor)?
                    .map(|name_and_type_index| ConstantPoolEntry::Dynamic {
                        bootstrap_method_attr_index,
                        name_and_type_index,
                    })
            }
            ConstantPoolEntry::InvokeDynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => {
                let (name, descriptor) = source.name_and_type(name_and_type_index)?;
                let mapped_name =
                    self.call_site_name(bootstrap_method_attr_index, name, descriptor)?;
                let mapped_descriptor = self.remapper.map_method_desc(descriptor)?;
                self.redirect_name_and_type(name_and_type_index, &mapped_name, &mapped_descriptor)?
                    .map(|name_and_type_index| ConstantPoolEntry::InvokeDynamic {
                        bootstrap_method_attr_index,
                        name_and_type_index,
                    })
            }
            _ => None,
        };
        Ok(replacement)
    }

    fn remap_member(
        &mut self,
        kind: MemberKind,
        class_index: u16,
        name_and_type_index: u16,
    ) -> VignetteResult<Option<u16>> {
        let source = self.source;
        let owner = source.class_name(class_index)?;
        let (name, descriptor) = source.name_and_type(name_and_type_index)?;
        let (mapped_name, mapped_descriptor) = match kind {
            MemberKind::Field => (
                self.remapper.map_field_name(owner, name, descriptor),
                self.remapper.map_desc(descriptor)?,
            ),
            MemberKind::Method | MemberKind::InterfaceMethod => (
                self.remapper.map_method_name(owner, name, descriptor),
                self.remapper.map_method_desc(descriptor)?,
            ),
        };
        self.redirect_name_and_type(name_and_type_index, &mapped_name, &mapped_descriptor)
    }

    /// Name an `invokedynamic` site should carry after the rewrite.
    ///
    /// Lambda sites implement a method of the interface they return, so the
    /// name is mapped as that method, using the interface method type from the
    /// first bootstrap argument. The arguments themselves are ordinary pool
    /// entries and are remapped once by the pool pass.
    fn call_site_name(
        &self,
        bootstrap_index: u16,
        name: &str,
        descriptor: &str,
    ) -> VignetteResult<String> {
        let bootstrap = self
            .bootstrap_methods
            .get(bootstrap_index as usize)
            .ok_or_else(|| {
                VignetteError::format(format!(
                    "call site `{name}` refers to missing bootstrap method {bootstrap_index}"
                ))
            })?;
        let Some(factory) = LambdaFactory::identify(self.source, bootstrap)? else {
            return Ok(self.remapper.map_invoke_dynamic_method_name(name, descriptor));
        };

        let malformed = |message: String| VignetteError::DynamicCallSite {
            owner: self.owner.to_owned(),
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            message,
        };
        let interface = match MethodDescriptor::parse(descriptor)?.return_type {
            TypeDescriptor::Object(interface) => interface,
            other => {
                return Err(malformed(format!(
                    "{} call site returns `{other}` instead of an interface",
                    factory.name()
                )));
            }
        };
        if bootstrap.arguments.len() < LambdaFactory::REQUIRED_ARGUMENTS {
            return Err(malformed(format!(
                "{} needs at least {} bootstrap arguments, found {}",
                factory.name(),
                LambdaFactory::REQUIRED_ARGUMENTS,
                bootstrap.arguments.len()
            )));
        }
        let sam_descriptor = match self.source.get(bootstrap.arguments[0])? {
            ConstantPoolEntry::MethodType { descriptor_index } => self.source.utf8(*descriptor_index)?,
            other => {
                return Err(malformed(format!(
                    "first bootstrap argument should be a method type, found {other:?}"
                )));
            }
        };
        Ok(self
            .remapper
            .map_method_name(&interface, name, sam_descriptor))
    }

    fn rewrite_field(&mut self, field: &ClassMember) -> VignetteResult<ClassMember> {
        let source = self.source;
        let name = field.name(source)?;
        let descriptor = field.descriptor(source)?;
        let mapped_name = self.remapper.map_field_name(self.owner, name, descriptor);
        let mapped_descriptor = self.remapper.map_desc(descriptor)?;
        Ok(ClassMember {
            access_flags: field.access_flags,
            name_index: self.redirect(field.name_index, &mapped_name)?,
            descriptor_index: self.redirect(field.descriptor_index, &mapped_descriptor)?,
            attributes: self.rewrite_common_attributes(&field.attributes)?,
        })
    }

    fn rewrite_method(&mut self, method: &ClassMember) -> VignetteResult<ClassMember> {
        let source = self.source;
        let name = method.name(source)?;
        let descriptor = method.descriptor(source)?;
        let mapped_name = self.remapper.map_method_name(self.owner, name, descriptor);
        let mapped_descriptor = self.remapper.map_method_desc(descriptor)?;
        let context = MethodContext {
            owner: self.owner,
            name,
            descriptor,
            is_static: method.is_static(),
            parameters: MethodDescriptor::parse(&mapped_descriptor)?.parameters,
        };

        let mut used_names = UsedNames::new();
        if !method.has_body() {
            self.name_abstract_parameters(&context, &mapped_name, &mapped_descriptor, &mut used_names)?;
        }

        let mut attributes = Vec::with_capacity(method.attributes.len());
        for attribute in &method.attributes {
            let rewritten = if attribute.name(source)? == names::CODE {
                self.rewrite_code(attribute, &context, &mut used_names)?
            } else {
                self.rewrite_common_attribute(attribute)?
            };
            attributes.push(rewritten);
        }

        Ok(ClassMember {
            access_flags: method.access_flags,
            name_index: self.redirect(method.name_index, &mapped_name)?,
            descriptor_index: self.redirect(method.descriptor_index, &mapped_descriptor)?,
            attributes,
        })
    }

    /// Picks a name for each pending parameter: the mapping set first, then
    /// deduction. `None` means the original name stays.
    fn assign_names(
        &self,
        context: &MethodContext<'_>,
        pending: &[PendingParameter],
        used_names: &mut UsedNames,
    ) -> VignetteResult<Vec<Option<String>>> {
        let mapped: Vec<Option<&str>> = pending
            .iter()
            .map(|parameter| {
                self.remapper.map_parameter_name(
                    context.owner,
                    context.name,
                    context.descriptor,
                    parameter.slot,
                )
            })
            .collect();
        for (parameter, name) in pending.iter().zip(&mapped) {
            if let Some(name) = name {
                context.request(parameter).validate(name)?;
                used_names.reserve(name);
            }
        }

        pending
            .iter()
            .zip(mapped)
            .map(|(parameter, mapped)| match (mapped, self.dictionary) {
                (Some(name), _) => Ok(Some(name.to_owned())),
                (None, Some(dictionary)) => {
                    deduce(&context.request(parameter), used_names, dictionary).map(Some)
                }
                (None, None) => Ok(None),
            })
            .collect()
    }

    fn name_abstract_parameters(
        &mut self,
        context: &MethodContext<'_>,
        mapped_name: &str,
        mapped_descriptor: &str,
        used_names: &mut UsedNames,
    ) -> VignetteResult<()> {
        let pending: Vec<PendingParameter> = context
            .parameter_slots()
            .into_iter()
            .map(|(slot, parameter_type)| PendingParameter {
                slot,
                raw_name: format!("var{slot}"),
                parameter_type,
            })
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        let assigned = self.assign_names(context, &pending, used_names)?;
        if self.dictionary.is_none() && assigned.iter().all(Option::is_none) {
            return Ok(());
        }
        let names = pending
            .into_iter()
            .zip(assigned)
            .map(|(parameter, name)| name.unwrap_or(parameter.raw_name))
            .collect();
        self.abstract_parameters.push(AbstractParameterNames {
            class: self.remapper.map_type(self.owner),
            method: mapped_name.to_owned(),
            descriptor: mapped_descriptor.to_owned(),
            names,
        });
        Ok(())
    }

    fn rewrite_code(
        &mut self,
        attribute: &Attribute,
        context: &MethodContext<'_>,
        used_names: &mut UsedNames,
    ) -> VignetteResult<Attribute> {
        let source = self.source;
        let mut code = CodeAttribute::parse(&attribute.info)?;

        let mut parameter_types: HashMap<u16, String> =
            context.parameter_slots().into_iter().collect();
        if !context.is_static {
            parameter_types.insert(0, format!("L{};", self.remapper.map_type(self.owner)));
        }

        let mut tables = Vec::with_capacity(code.attributes.len());
        let mut type_tables = Vec::new();
        for (position, nested) in code.attributes.iter().enumerate() {
            match nested.name(source)? {
                names::LOCAL_VARIABLE_TABLE => {
                    tables.push((position, LocalVariableEntry::parse_table(&nested.info)?))
                }
                names::LOCAL_VARIABLE_TYPE_TABLE => {
                    type_tables.push((position, LocalVariableEntry::parse_table(&nested.info)?))
                }
                _ => {}
            }
        }

        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for entry in tables.iter().flat_map(|(_, entries)| entries) {
            if entry.start_pc != 0 || !seen.insert(entry.index) {
                continue;
            }
            if let Some(parameter_type) = parameter_types.get(&entry.index) {
                pending.push(PendingParameter {
                    slot: entry.index,
                    raw_name: source.utf8(entry.name_index)?.to_owned(),
                    parameter_type: parameter_type.clone(),
                });
            }
        }
        pending.sort_by_key(|parameter| parameter.slot);
        let assigned: HashMap<u16, String> = pending
            .iter()
            .zip(self.assign_names(context, &pending, used_names)?)
            .filter_map(|(parameter, name)| name.map(|name| (parameter.slot, name)))
            .collect();

        let mut renamed = HashMap::new();
        for (position, entries) in &mut tables {
            for entry in entries.iter_mut() {
                let descriptor = source.utf8(entry.descriptor_index)?;
                let mapped = self.remapper.map_desc(descriptor)?;
                entry.descriptor_index = self.redirect(entry.descriptor_index, &mapped)?;
                if entry.start_pc != 0 {
                    continue;
                }
                if let Some(name) = assigned.get(&entry.index) {
                    entry.name_index = self.redirect(entry.name_index, name)?;
                    renamed.insert((entry.start_pc, entry.length, entry.index), entry.name_index);
                }
            }
            code.attributes[*position].info = LocalVariableEntry::table_to_bytes(entries)?;
        }
        for (position, entries) in &mut type_tables {
            for entry in entries.iter_mut() {
                let signature = source.utf8(entry.descriptor_index)?;
                let mapped = self.remapper.map_signature(signature)?;
                entry.descriptor_index = self.redirect(entry.descriptor_index, &mapped)?;
                if let Some(name_index) = renamed.get(&(entry.start_pc, entry.length, entry.index)) {
                    entry.name_index = *name_index;
                }
            }
            code.attributes[*position].info = LocalVariableEntry::table_to_bytes(entries)?;
        }

        Ok(Attribute::new(attribute.name_index, code.to_bytes()?))
    }

    fn rewrite_class_attribute(&mut self, attribute: &Attribute) -> VignetteResult<Attribute> {
        let source = self.source;
        let info = match attribute.name(source)? {
            names::INNER_CLASSES => {
                let mut entries = InnerClassEntry::parse_table(&attribute.info)?;
                for entry in &mut entries {
                    if entry.inner_name_index == 0 {
                        continue;
                    }
                    let inner = source.class_name(entry.inner_class_info_index)?;
                    let simple = source.utf8(entry.inner_name_index)?;
                    let mapped = self.remapper.map_inner_class_name(inner, simple);
                    entry.inner_name_index = self.redirect(entry.inner_name_index, &mapped)?;
                }
                InnerClassEntry::table_to_bytes(&entries)?
            }
            names::ENCLOSING_METHOD => {
                let mut enclosing = EnclosingMethod::parse(&attribute.info)?;
                if enclosing.method_index != 0 {
                    let outer = source.class_name(enclosing.class_index)?;
                    let (name, descriptor) = source.name_and_type(enclosing.method_index)?;
                    let mapped_name = self.remapper.map_method_name(outer, name, descriptor);
                    let mapped_descriptor = self.remapper.map_method_desc(descriptor)?;
                    if let Some(index) =
                        self.redirect_name_and_type(enclosing.method_index, &mapped_name, &mapped_descriptor)?
                    {
                        enclosing.method_index = index;
                    }
                }
                enclosing.to_bytes()
            }
            names::RECORD => {
                let mut components = RecordComponent::parse_table(&attribute.info)?;
                for component in &mut components {
                    let name = source.utf8(component.name_index)?;
                    let descriptor = source.utf8(component.descriptor_index)?;
                    let mapped_name = self.remapper.map_field_name(self.owner, name, descriptor);
                    let mapped_descriptor = self.remapper.map_desc(descriptor)?;
                    component.name_index = self.redirect(component.name_index, &mapped_name)?;
                    component.descriptor_index =
                        self.redirect(component.descriptor_index, &mapped_descriptor)?;
                    component.attributes = self.rewrite_common_attributes(&component.attributes)?;
                }
                RecordComponent::table_to_bytes(&components)?
            }
            _ => return self.rewrite_common_attribute(attribute),
        };
        Ok(Attribute::new(attribute.name_index, info))
    }

    fn rewrite_common_attributes(&mut self, attributes: &[Attribute]) -> VignetteResult<Vec<Attribute>> {
        attributes
            .iter()
            .map(|attribute| self.rewrite_common_attribute(attribute))
            .collect()
    }

    /// Signatures and annotations, which may appear on any declaration.
    fn rewrite_common_attribute(&mut self, attribute: &Attribute) -> VignetteResult<Attribute> {
        let source = self.source;
        let info = match attribute.name(source)? {
            names::SIGNATURE => {
                let index = attribute.single_index()?;
                let mapped = self.remapper.map_signature(source.utf8(index)?)?;
                self.redirect(index, &mapped)?.to_be_bytes().to_vec()
            }
            names::RUNTIME_VISIBLE_ANNOTATIONS | names::RUNTIME_INVISIBLE_ANNOTATIONS => {
                let annotations = Annotation::parse_table(&attribute.info)?
                    .iter()
                    .map(|annotation| self.map_annotation(annotation))
                    .collect::<VignetteResult<Vec<_>>>()?;
                Annotation::table_to_bytes(&annotations)?
            }
            names::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS
            | names::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS => {
                let mut parameters = Annotation::parse_parameter_table(&attribute.info)?;
                for annotations in &mut parameters {
                    for annotation in annotations.iter_mut() {
                        *annotation = self.map_annotation(annotation)?;
                    }
                }
                Annotation::parameter_table_to_bytes(&parameters)?
            }
            names::ANNOTATION_DEFAULT => {
                let value = ElementValue::parse_default(&attribute.info)?;
                self.map_element_value(&value)?.to_bytes()?
            }
            _ => return Ok(attribute.clone()),
        };
        Ok(Attribute::new(attribute.name_index, info))
    }

    fn map_annotation(&mut self, annotation: &Annotation) -> VignetteResult<Annotation> {
        let mapped_type = self.remapper.map_desc(self.source.utf8(annotation.type_index)?)?;
        let mut elements = Vec::with_capacity(annotation.elements.len());
        for (name_index, value) in &annotation.elements {
            elements.push((*name_index, self.map_element_value(value)?));
        }
        Ok(Annotation {
            type_index: self.redirect(annotation.type_index, &mapped_type)?,
            elements,
        })
    }

    fn map_element_value(&mut self, value: &ElementValue) -> VignetteResult<ElementValue> {
        let source = self.source;
        Ok(match value {
            ElementValue::Const { .. } => value.clone(),
            ElementValue::Enum {
                type_name_index,
                const_name_index,
            } => {
                let mapped = self.remapper.map_desc(source.utf8(*type_name_index)?)?;
                ElementValue::Enum {
                    type_name_index: self.redirect(*type_name_index, &mapped)?,
                    const_name_index: *const_name_index,
                }
            }
            ElementValue::Class { class_info_index } => {
                let mapped = self.remapper.map_return_desc(source.utf8(*class_info_index)?)?;
                ElementValue::Class {
                    class_info_index: self.redirect(*class_info_index, &mapped)?,
                }
            }
            ElementValue::Annotation(annotation) => {
                ElementValue::Annotation(self.map_annotation(annotation)?)
            }
            ElementValue::Array(values) => ElementValue::Array(
                values
                    .iter()
                    .map(|value| self.map_element_value(value))
                    .collect::<VignetteResult<Vec<_>>>()?,
            ),
        })
    }
}
