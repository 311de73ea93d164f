//! Class inheritance lookups used to complete mappings.

use std::collections::HashMap;

use crate::classfile::{AccessFlags, ClassFile};
use crate::error::VignetteResult;
use crate::mapping::MethodSignature;

/// Supertypes and member visibility of one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub access_flags: AccessFlags,
    pub fields: HashMap<String, AccessFlags>,
    pub methods: HashMap<MethodSignature, AccessFlags>,
}

impl ClassInfo {
    pub fn new(name: impl Into<String>, super_name: Option<String>) -> Self {
        ClassInfo {
            name: name.into(),
            super_name,
            interfaces: Vec::new(),
            access_flags: AccessFlags::PUBLIC,
            fields: HashMap::new(),
            methods: HashMap::new(),
        }
    }

    pub fn from_class(class: &ClassFile) -> VignetteResult<Self> {
        let pool = &class.constant_pool;
        let mut info = ClassInfo::new(
            class.this_name()?,
            class.super_name()?.map(str::to_owned),
        );
        info.access_flags = class.access_flags;
        info.interfaces = class
            .interface_names()?
            .into_iter()
            .map(str::to_owned)
            .collect();
        for field in &class.fields {
            info.fields
                .insert(field.name(pool)?.to_owned(), field.access_flags);
        }
        for method in &class.methods {
            info.methods.insert(
                MethodSignature::new(method.name(pool)?, method.descriptor(pool)?),
                method.access_flags,
            );
        }
        Ok(info)
    }

    /// Superclass first, then interfaces in declaration order.
    pub fn parents(&self) -> impl Iterator<Item = &str> {
        self.super_name
            .as_deref()
            .into_iter()
            .chain(self.interfaces.iter().map(String::as_str))
    }

    pub fn package(&self) -> &str {
        package_of(&self.name)
    }

    /// Whether `child` inherits the field `name` declared here.
    pub fn can_inherit_field(&self, child: &ClassInfo, name: &str) -> bool {
        self.fields
            .get(name)
            .is_some_and(|access| self.visible_to(child, *access))
    }

    /// Whether `child` inherits the method `signature` declared here.
    pub fn can_inherit_method(&self, child: &ClassInfo, signature: &MethodSignature) -> bool {
        if signature.is_initializer() {
            return false;
        }
        self.methods
            .get(signature)
            .is_some_and(|access| self.visible_to(child, *access))
    }

    fn visible_to(&self, child: &ClassInfo, access: AccessFlags) -> bool {
        if access.contains(AccessFlags::PRIVATE) {
            return false;
        }
        access.intersects(AccessFlags::PUBLIC.union(AccessFlags::PROTECTED))
            || self.package() == child.package()
    }
}

pub fn package_of(class_name: &str) -> &str {
    class_name
        .rsplit_once('/')
        .map_or("", |(package, _)| package)
}

/// Read-only source of [`ClassInfo`] by internal class name.
pub trait InheritanceProvider: Send + Sync {
    fn provide(&self, name: &str) -> Option<&ClassInfo>;
}

/// Inheritance data collected from the input archive and its libraries.
#[derive(Debug, Clone, Default)]
pub struct ClassHierarchy {
    classes: HashMap<String, ClassInfo>,
}

impl ClassHierarchy {
    pub fn new() -> Self {
        ClassHierarchy::default()
    }

    /// Adds `info`; the first class registered under a name wins.
    pub fn insert(&mut self, info: ClassInfo) {
        self.classes.entry(info.name.clone()).or_insert(info);
    }

    pub fn insert_class(&mut self, class: &ClassFile) -> VignetteResult<()> {
        self.insert(ClassInfo::from_class(class)?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }
}

impl InheritanceProvider for ClassHierarchy {
    fn provide(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::{ClassHierarchy, ClassInfo, InheritanceProvider, package_of};
    use crate::classfile::{AccessFlags, ClassFile, ClassVersion};
    use crate::error::VignetteResult;
    use crate::mapping::MethodSignature;

    #[test]
    fn collects_parents_and_members_from_class_files() -> VignetteResult<()> {
        let mut class = ClassFile::new(
            ClassVersion::new(52, 0),
            AccessFlags::PUBLIC,
            "a/Child",
            Some("a/Base"),
        )?;
        let iface = class.constant_pool.intern_class("b/Iface")?;
        class.interfaces.push(iface);
        class.add_method(AccessFlags::PUBLIC, "m", "()V")?;
        class.add_field(AccessFlags::PRIVATE, "f", "I")?;

        let mut hierarchy = ClassHierarchy::new();
        hierarchy.insert_class(&class)?;
        let info = hierarchy.provide("a/Child").ok_or_else(|| {
            crate::error::VignetteError::format("class missing from hierarchy")
        })?;
        assert_eq!(info.parents().collect::<Vec<_>>(), vec!["a/Base", "b/Iface"]);
        assert_eq!(
            info.methods.get(&MethodSignature::new("m", "()V")),
            Some(&AccessFlags::PUBLIC)
        );
        assert_eq!(info.fields.get("f"), Some(&AccessFlags::PRIVATE));
        Ok(())
    }

    #[test]
    fn visibility_rules_follow_access_and_package() {
        let mut parent = ClassInfo::new("a/Parent", None);
        parent.fields.insert("shared".to_owned(), AccessFlags::NONE);
        parent.fields.insert("hidden".to_owned(), AccessFlags::PRIVATE);
        parent
            .methods
            .insert(MethodSignature::new("run", "()V"), AccessFlags::PROTECTED);
        parent
            .methods
            .insert(MethodSignature::new("<init>", "()V"), AccessFlags::PUBLIC);

        let same_package = ClassInfo::new("a/Child", Some("a/Parent".to_owned()));
        let elsewhere = ClassInfo::new("b/Child", Some("a/Parent".to_owned()));

        assert!(parent.can_inherit_field(&same_package, "shared"));
        assert!(!parent.can_inherit_field(&elsewhere, "shared"));
        assert!(!parent.can_inherit_field(&same_package, "hidden"));
        assert!(parent.can_inherit_method(&elsewhere, &MethodSignature::new("run", "()V")));
        assert!(!parent.can_inherit_method(&elsewhere, &MethodSignature::new("<init>", "()V")));
        assert!(!parent.can_inherit_method(&elsewhere, &MethodSignature::new("walk", "()V")));
        assert_eq!(package_of("Toplevel"), "");
    }
}
