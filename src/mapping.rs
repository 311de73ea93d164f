//! In-memory mapping set: obfuscated names to readable ones.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::hierarchy::InheritanceProvider;

/// A method identified by name and descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodSignature {
    pub name: String,
    pub descriptor: String,
}

impl MethodSignature {
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        MethodSignature {
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    /// `<init>` and `<clinit>` are never renamed or inherited.
    pub fn is_initializer(&self) -> bool {
        self.name.starts_with('<')
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub obfuscated: String,
    pub deobfuscated: String,
    pub descriptor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodMapping {
    pub signature: MethodSignature,
    pub deobfuscated: String,
    /// Parameter names by local variable slot.
    pub parameters: BTreeMap<u16, String>,
}

impl MethodMapping {
    pub fn new(signature: MethodSignature, deobfuscated: impl Into<String>) -> Self {
        MethodMapping {
            signature,
            deobfuscated: deobfuscated.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn parameter(&self, index: u16) -> Option<&str> {
        self.parameters.get(&index).map(String::as_str)
    }
}

/// Mappings for a single class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMapping {
    pub obfuscated: String,
    /// `None` when only members are mapped.
    pub deobfuscated: Option<String>,
    fields: HashMap<String, FieldMapping>,
    methods: HashMap<MethodSignature, MethodMapping>,
}

impl ClassMapping {
    pub fn new(obfuscated: impl Into<String>) -> Self {
        ClassMapping {
            obfuscated: obfuscated.into(),
            deobfuscated: None,
            fields: HashMap::new(),
            methods: HashMap::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldMapping> {
        self.fields.get(name)
    }

    pub fn method(&self, signature: &MethodSignature) -> Option<&MethodMapping> {
        self.methods.get(signature)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldMapping> {
        self.fields.values()
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodMapping> {
        self.methods.values()
    }

    /// Inserts or replaces a field mapping, keyed by obfuscated name.
    pub fn insert_field(&mut self, mapping: FieldMapping) {
        self.fields.insert(mapping.obfuscated.clone(), mapping);
    }

    pub fn insert_method(&mut self, mapping: MethodMapping) {
        self.methods.insert(mapping.signature.clone(), mapping);
    }

    /// Returns the method mapping for `signature`, creating an identity one.
    pub fn method_mut_or_insert(&mut self, signature: MethodSignature) -> &mut MethodMapping {
        self.methods.entry(signature.clone()).or_insert_with(|| {
            let name = signature.name.clone();
            MethodMapping::new(signature, name)
        })
    }
}

/// All class mappings of one mapping file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingSet {
    classes: HashMap<String, ClassMapping>,
}

impl MappingSet {
    pub fn new() -> Self {
        MappingSet::default()
    }

    pub fn class(&self, obfuscated: &str) -> Option<&ClassMapping> {
        self.classes.get(obfuscated)
    }

    pub fn class_mut_or_insert(&mut self, obfuscated: &str) -> &mut ClassMapping {
        self.classes
            .entry(obfuscated.to_owned())
            .or_insert_with(|| ClassMapping::new(obfuscated))
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassMapping> {
        self.classes.values()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Copies inheritable member mappings down the hierarchy of each class.
    ///
    /// Every class in `classes` receives the field and method mappings of
    /// its supertypes that it can see, without replacing its own. Must run
    /// before the set is shared for lookups.
    pub fn complete<'a>(
        &mut self,
        provider: &dyn InheritanceProvider,
        classes: impl IntoIterator<Item = &'a str>,
    ) {
        let mut completed = HashSet::new();
        for class in classes {
            self.complete_class(provider, class, &mut completed);
        }
        debug!(classes = completed.len(), "completed mappings against hierarchy");
    }

    fn complete_class(
        &mut self,
        provider: &dyn InheritanceProvider,
        name: &str,
        completed: &mut HashSet<String>,
    ) {
        if !completed.insert(name.to_owned()) {
            return;
        }
        let Some(info) = provider.provide(name) else {
            return;
        };

        let mut inherited_fields = Vec::new();
        let mut inherited_methods = Vec::new();
        for parent_name in info.parents() {
            self.complete_class(provider, parent_name, completed);
            let (Some(parent), Some(parent_mapping)) =
                (provider.provide(parent_name), self.classes.get(parent_name))
            else {
                continue;
            };
            inherited_fields.extend(
                parent_mapping
                    .fields()
                    .filter(|field| parent.can_inherit_field(info, &field.obfuscated))
                    .cloned(),
            );
            inherited_methods.extend(
                parent_mapping
                    .methods()
                    .filter(|method| parent.can_inherit_method(info, &method.signature))
                    .cloned(),
            );
        }
        if inherited_fields.is_empty() && inherited_methods.is_empty() {
            return;
        }

        let mapping = self.class_mut_or_insert(name);
        for field in inherited_fields {
            mapping.fields.entry(field.obfuscated.clone()).or_insert(field);
        }
        for method in inherited_methods {
            mapping
                .methods
                .entry(method.signature.clone())
                .or_insert(method);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldMapping, MappingSet, MethodMapping, MethodSignature};
    use crate::classfile::AccessFlags;
    use crate::hierarchy::{ClassHierarchy, ClassInfo};
    use pretty_assertions::assert_eq;

    fn hierarchy() -> ClassHierarchy {
        let mut base = ClassInfo::new("a/Base", None);
        base.methods
            .insert(MethodSignature::new("a", "()V"), AccessFlags::PUBLIC);
        base.methods
            .insert(MethodSignature::new("b", "()V"), AccessFlags::PRIVATE);
        base.fields.insert("c".to_owned(), AccessFlags::PROTECTED);

        let mut middle = ClassInfo::new("a/Middle", Some("a/Base".to_owned()));
        middle
            .methods
            .insert(MethodSignature::new("a", "()V"), AccessFlags::PUBLIC);
        let leaf = ClassInfo::new("z/Leaf", Some("a/Middle".to_owned()));

        let mut hierarchy = ClassHierarchy::new();
        hierarchy.insert(base);
        hierarchy.insert(middle);
        hierarchy.insert(leaf);
        hierarchy
    }

    fn mappings() -> MappingSet {
        let mut set = MappingSet::new();
        let base = set.class_mut_or_insert("a/Base");
        base.deobfuscated = Some("net/Base".to_owned());
        let mut run = MethodMapping::new(MethodSignature::new("a", "()V"), "run");
        run.parameters.insert(1, "unused".to_owned());
        base.insert_method(run);
        base.insert_method(MethodMapping::new(MethodSignature::new("b", "()V"), "secret"));
        base.insert_field(FieldMapping {
            obfuscated: "c".to_owned(),
            deobfuscated: "counter".to_owned(),
            descriptor: None,
        });
        set
    }

    #[test]
    fn completion_walks_the_whole_supertype_chain() {
        let hierarchy = hierarchy();
        let mut set = mappings();
        set.complete(&hierarchy, ["z/Leaf"]);

        let leaf = set.class("z/Leaf").map(|class| class.deobfuscated.clone());
        assert_eq!(leaf, Some(None));
        let run = set
            .class("z/Leaf")
            .and_then(|class| class.method(&MethodSignature::new("a", "()V")));
        assert_eq!(run.map(|method| method.deobfuscated.as_str()), Some("run"));
        assert_eq!(run.and_then(|method| method.parameter(1)), Some("unused"));
        // private methods stay behind, and so do fields the middle class never declared
        assert!(
            set.class("a/Middle")
                .and_then(|class| class.method(&MethodSignature::new("b", "()V")))
                .is_none()
        );
        assert!(set.class("z/Leaf").and_then(|class| class.field("c")).is_none());
    }

    #[test]
    fn own_mappings_win_over_inherited_ones() {
        let hierarchy = hierarchy();
        let mut set = mappings();
        set.class_mut_or_insert("a/Middle")
            .insert_method(MethodMapping::new(MethodSignature::new("a", "()V"), "walk"));
        set.complete(&hierarchy, hierarchy.names());
        let name = |class: &str| {
            set.class(class)
                .and_then(|mapping| mapping.method(&MethodSignature::new("a", "()V")))
                .map(|method| method.deobfuscated.clone())
        };
        assert_eq!(name("a/Middle").as_deref(), Some("walk"));
        assert_eq!(name("z/Leaf").as_deref(), Some("walk"));
        assert_eq!(name("a/Base").as_deref(), Some("run"));
    }
}
