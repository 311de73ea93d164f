#![allow(dead_code)]

use vignette::classfile::{
    AccessFlags, Attribute, BootstrapMethod, ClassFile, ClassVersion, CodeAttribute,
    ConstantPool, ConstantPoolEntry, LocalVariableEntry, MethodHandleKind, names,
};
use vignette::mapping::{FieldMapping, MappingSet, MethodMapping, MethodSignature};
use vignette::rewriter::{LAMBDA_METAFACTORY, METAFACTORY_DESCRIPTOR};

pub const RETURN: u8 = 0xb1;

pub fn class(name: &str, super_name: &str) -> ClassFile {
    ClassFile::new(
        ClassVersion::new(61, 0),
        AccessFlags::PUBLIC.union(AccessFlags::SUPER),
        name,
        Some(super_name),
    )
    .expect("new class")
}

pub fn native_method(class: &mut ClassFile, name: &str, descriptor: &str) {
    class
        .add_method(AccessFlags::PUBLIC.union(AccessFlags::NATIVE), name, descriptor)
        .expect("add native method");
}

/// Adds a method whose body is a lone `return` with the given locals
/// `(name, descriptor, slot)` all live from the first instruction.
pub fn method_with_locals(
    class: &mut ClassFile,
    access: AccessFlags,
    name: &str,
    descriptor: &str,
    locals: &[(&str, &str, u16)],
) {
    let pool = &mut class.constant_pool;
    let entries = locals
        .iter()
        .map(|(local, local_descriptor, slot)| LocalVariableEntry {
            start_pc: 0,
            length: 1,
            name_index: pool.intern_utf8(local).expect("local name"),
            descriptor_index: pool.intern_utf8(local_descriptor).expect("local descriptor"),
            index: *slot,
        })
        .collect::<Vec<_>>();
    let table_name = pool.intern_utf8(names::LOCAL_VARIABLE_TABLE).expect("table name");
    let code_name = pool.intern_utf8(names::CODE).expect("code name");
    let max_locals = locals.iter().map(|(_, _, slot)| slot + 2).max().unwrap_or(1);
    let code = CodeAttribute {
        max_stack: 0,
        max_locals,
        code: vec![RETURN],
        exception_table: Vec::new(),
        attributes: vec![Attribute::new(
            table_name,
            LocalVariableEntry::table_to_bytes(&entries).expect("encode table"),
        )],
    };
    let info = code.to_bytes().expect("encode code");
    class
        .add_method(access, name, descriptor)
        .expect("add method")
        .attributes
        .push(Attribute::new(code_name, info));
}

pub fn static_handle(pool: &mut ConstantPool, owner: &str, name: &str, descriptor: &str) -> u16 {
    let class_index = pool.intern_class(owner).expect("owner");
    let name_and_type_index = pool.intern_name_and_type(name, descriptor).expect("name and type");
    let reference_index = pool
        .push(ConstantPoolEntry::MethodRef {
            class_index,
            name_and_type_index,
        })
        .expect("method ref");
    pool.push(ConstantPoolEntry::MethodHandle {
        kind: MethodHandleKind::InvokeStatic,
        reference_index,
    })
    .expect("method handle")
}

pub fn method_type(pool: &mut ConstantPool, descriptor: &str) -> u16 {
    let descriptor_index = pool.intern_utf8(descriptor).expect("method type descriptor");
    pool.push(ConstantPoolEntry::MethodType { descriptor_index })
        .expect("method type")
}

/// Adds an `invokedynamic` entry bootstrapped by the static method
/// `(owner, name, descriptor)`, with arguments built by `arguments`.
/// Returns the pool index of the call site.
pub fn dynamic_call_site(
    class: &mut ClassFile,
    bootstrap: (&str, &str, &str),
    name: &str,
    call_descriptor: &str,
    arguments: impl FnOnce(&mut ConstantPool) -> Vec<u16>,
) -> u16 {
    let pool = &mut class.constant_pool;
    let (owner, bootstrap_name, bootstrap_descriptor) = bootstrap;
    let method_ref = static_handle(pool, owner, bootstrap_name, bootstrap_descriptor);
    let arguments = arguments(pool);
    let name_and_type_index = pool.intern_name_and_type(name, call_descriptor).expect("call site");
    let call_site = pool
        .push(ConstantPoolEntry::InvokeDynamic {
            bootstrap_method_attr_index: 0,
            name_and_type_index,
        })
        .expect("invokedynamic");
    let attribute_name = pool.intern_utf8(names::BOOTSTRAP_METHODS).expect("attribute name");
    let table = BootstrapMethod::table_to_bytes(&[BootstrapMethod {
        method_ref,
        arguments,
    }])
    .expect("bootstrap table");
    class.attributes.push(Attribute::new(attribute_name, table));
    call_site
}

/// The three leading lambda factory arguments: erased interface type,
/// implementation handle and instantiated interface type.
pub fn lambda_arguments(
    pool: &mut ConstantPool,
    interface_descriptor: &str,
    implementation: (&str, &str, &str),
) -> Vec<u16> {
    let (owner, name, descriptor) = implementation;
    let erased = method_type(pool, interface_descriptor);
    let implementation = static_handle(pool, owner, name, descriptor);
    let instantiated = method_type(pool, interface_descriptor);
    vec![erased, implementation, instantiated]
}

/// Adds a `LambdaMetafactory.metafactory` call site and returns its pool index.
pub fn lambda_call_site(
    class: &mut ClassFile,
    name: &str,
    call_descriptor: &str,
    interface_descriptor: &str,
    implementation: (&str, &str, &str),
) -> u16 {
    dynamic_call_site(
        class,
        (LAMBDA_METAFACTORY, "metafactory", METAFACTORY_DESCRIPTOR),
        name,
        call_descriptor,
        |pool| lambda_arguments(pool, interface_descriptor, implementation),
    )
}

pub fn map_class(set: &mut MappingSet, obfuscated: &str, deobfuscated: &str) {
    set.class_mut_or_insert(obfuscated).deobfuscated = Some(deobfuscated.to_owned());
}

pub fn map_method<'a>(
    set: &'a mut MappingSet,
    owner: &str,
    name: &str,
    descriptor: &str,
    deobfuscated: &str,
) -> &'a mut MethodMapping {
    let method = set
        .class_mut_or_insert(owner)
        .method_mut_or_insert(MethodSignature::new(name, descriptor));
    method.deobfuscated = deobfuscated.to_owned();
    method
}

pub fn map_field(set: &mut MappingSet, owner: &str, name: &str, deobfuscated: &str) {
    set.class_mut_or_insert(owner).insert_field(FieldMapping {
        obfuscated: name.to_owned(),
        deobfuscated: deobfuscated.to_owned(),
        descriptor: None,
    });
}

pub fn method_names(class: &ClassFile) -> Vec<(String, String)> {
    class
        .methods
        .iter()
        .map(|method| {
            (
                method.name(&class.constant_pool).expect("name").to_owned(),
                method.descriptor(&class.constant_pool).expect("descriptor").to_owned(),
            )
        })
        .collect()
}

/// `(slot, name)` of every local variable of method `name`.
pub fn local_names(class: &ClassFile, name: &str) -> Vec<(u16, String)> {
    let pool = &class.constant_pool;
    let method = class
        .methods
        .iter()
        .find(|method| method.name(pool).expect("name") == name)
        .expect("method exists");
    let code = method
        .find_attribute(pool, names::CODE)
        .expect("attribute lookup")
        .expect("method has code");
    let code = CodeAttribute::parse(&code.info).expect("parse code");
    let table = vignette::classfile::find_attribute(&code.attributes, pool, names::LOCAL_VARIABLE_TABLE)
        .expect("attribute lookup")
        .expect("method has locals");
    LocalVariableEntry::parse_table(&table.info)
        .expect("parse locals")
        .into_iter()
        .map(|entry| (entry.index, pool.utf8(entry.name_index).expect("local name").to_owned()))
        .collect()
}

/// Name and descriptor of the `invokedynamic` entry at `index`.
pub fn call_site(class: &ClassFile, index: u16) -> (String, String) {
    let pool = &class.constant_pool;
    match pool.get(index).expect("call site entry") {
        ConstantPoolEntry::InvokeDynamic {
            name_and_type_index,
            ..
        } => {
            let (name, descriptor) = pool.name_and_type(*name_and_type_index).expect("name and type");
            (name.to_owned(), descriptor.to_owned())
        }
        other => panic!("expected invokedynamic, found {other:?}"),
    }
}
