//! Parameter name deduction from declared types.

use std::collections::HashSet;

use tracing::trace;

use crate::classfile::types::TypeDescriptor;
use crate::dictionary::Dictionary;
use crate::error::{VignetteError, VignetteResult};

/// Java keywords and literals that cannot name a parameter.
pub const RESERVED_NAMES: [&str; 53] = [
    "abstract",
    "assert",
    "boolean",
    "break",
    "byte",
    "case",
    "catch",
    "char",
    "class",
    "const",
    "continue",
    "default",
    "do",
    "double",
    "else",
    "enum",
    "extends",
    "final",
    "finally",
    "float",
    "for",
    "goto",
    "if",
    "implements",
    "import",
    "instanceof",
    "int",
    "interface",
    "long",
    "native",
    "new",
    "package",
    "private",
    "protected",
    "public",
    "return",
    "short",
    "static",
    "strictfp",
    "super",
    "switch",
    "synchronized",
    "this",
    "throw",
    "throws",
    "transient",
    "try",
    "void",
    "volatile",
    "while",
    "true",
    "false",
    "null",
];

/// Left behind by an old compiler in place of real parameter names.
pub const SNOWMAN: char = '\u{2603}';

const RECEIVER: &str = "this";

/// Names already given out within one method.
#[derive(Debug, Default)]
pub struct UsedNames(HashSet<String>);

impl UsedNames {
    pub fn new() -> Self {
        UsedNames::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// Records `name` as taken; returns `false` if it already was.
    pub fn reserve(&mut self, name: &str) -> bool {
        self.0.insert(name.to_owned())
    }

    /// Returns `base`, or `base` followed by the first free counter from 1.
    pub fn claim(&mut self, base: &str) -> String {
        let mut name = base.to_owned();
        let mut counter = 1u32;
        while !self.reserve(&name) {
            name = format!("{base}{counter}");
            counter += 1;
        }
        name
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything the deducer knows about one parameter.
#[derive(Debug, Clone, Copy)]
pub struct DeduceRequest<'a> {
    pub owner: &'a str,
    pub method: &'a str,
    pub descriptor: &'a str,
    /// Local variable slot of the parameter.
    pub index: u16,
    pub raw_name: &'a str,
    /// Field descriptor of the parameter, already remapped.
    pub parameter_type: &'a str,
}

impl DeduceRequest<'_> {
    /// Checks that `name` may be written out for this parameter.
    pub fn validate(&self, name: &str) -> VignetteResult<()> {
        if name.starts_with(SNOWMAN) {
            return Err(VignetteError::UnsupportedGlyph {
                name: name.to_owned(),
                owner: self.owner.to_owned(),
                method: self.method.to_owned(),
                descriptor: self.descriptor.to_owned(),
            });
        }
        if is_reserved(name) {
            return Err(VignetteError::ReservedName {
                name: name.to_owned(),
                owner: self.owner.to_owned(),
                method: self.method.to_owned(),
                descriptor: self.descriptor.to_owned(),
            });
        }
        Ok(())
    }
}

/// Whether `name` is a keyword or literal. The receiver name is allowed.
pub fn is_reserved(name: &str) -> bool {
    name != RECEIVER && RESERVED_NAMES.contains(&name)
}

/// The class name, or primitive code, a parameter descriptor is built on.
pub fn type_token(parameter_type: &str) -> VignetteResult<(String, bool)> {
    let parsed = TypeDescriptor::parse(parameter_type)?;
    let token = match parsed.element() {
        TypeDescriptor::Object(name) => name.clone(),
        TypeDescriptor::Primitive(primitive) => primitive.code().to_string(),
        TypeDescriptor::Array { .. } => return Err(VignetteError::descriptor(parameter_type)),
    };
    Ok((token, parsed.is_array()))
}

/// Innermost simple name of a binary class name.
pub fn simple_name(class_name: &str) -> &str {
    let unqualified = class_name.rsplit('/').next().unwrap_or(class_name);
    unqualified.rsplit('$').next().unwrap_or(unqualified)
}

/// Derives a name for one parameter and records it in `used_names`.
pub fn deduce(
    request: &DeduceRequest<'_>,
    used_names: &mut UsedNames,
    dictionary: &Dictionary,
) -> VignetteResult<String> {
    if request.raw_name.eq_ignore_ascii_case(RECEIVER) {
        return Ok(request.raw_name.to_owned());
    }

    let (token, is_array) = type_token(request.parameter_type)?;
    let simple = simple_name(&token);
    let base = if is_array {
        format!("a{simple}")
    } else {
        simple.to_owned()
    };
    let candidate = dictionary.apply(&base, &token).to_lowercase();

    if candidate.is_empty() {
        return Err(VignetteError::EmptyName {
            index: request.index,
            owner: request.owner.to_owned(),
            method: request.method.to_owned(),
            descriptor: request.descriptor.to_owned(),
        });
    }
    request.validate(&candidate)?;

    let name = used_names.claim(&candidate);
    trace!(
        owner = request.owner,
        method = request.method,
        index = request.index,
        %name,
        "deduced parameter name"
    );
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::{DeduceRequest, UsedNames, deduce, simple_name, type_token};
    use crate::dictionary::Dictionary;
    use crate::error::{VignetteError, VignetteResult};
    use pretty_assertions::assert_eq;

    fn request<'a>(raw_name: &'a str, parameter_type: &'a str) -> DeduceRequest<'a> {
        DeduceRequest {
            owner: "net/example/Owner",
            method: "compute",
            descriptor: "(LFoo;[LFoo;)V",
            index: 1,
            raw_name,
            parameter_type,
        }
    }

    #[test]
    fn strips_packages_and_outer_classes() -> VignetteResult<()> {
        assert_eq!(simple_name("net/minecraft/world/Level$Chunk"), "Chunk");
        assert_eq!(simple_name("Foo"), "Foo");
        assert_eq!(
            type_token("[[Lnet/Foo;")?,
            ("net/Foo".to_owned(), true)
        );
        assert_eq!(type_token("J")?, ("J".to_owned(), false));
        Ok(())
    }

    #[test]
    fn object_arrays_and_primitives() -> VignetteResult<()> {
        let dictionary = Dictionary::new();
        let mut used = UsedNames::new();
        assert_eq!(
            deduce(&request("p1", "Lnet/a/BlockPos;"), &mut used, &dictionary)?,
            "blockpos"
        );
        assert_eq!(
            deduce(&request("p2", "[Lnet/a/Foo;"), &mut used, &dictionary)?,
            "afoo"
        );
        assert_eq!(deduce(&request("p3", "I"), &mut used, &dictionary)?, "i");
        assert_eq!(deduce(&request("p4", "[I"), &mut used, &dictionary)?, "ai");
        Ok(())
    }

    #[test]
    fn collisions_get_numeric_suffixes() -> VignetteResult<()> {
        let dictionary = Dictionary::new();
        let mut used = UsedNames::new();
        let names: Vec<String> = (0..3)
            .map(|_| deduce(&request("p", "LFoo;"), &mut used, &dictionary))
            .collect::<VignetteResult<_>>()?;
        assert_eq!(names, vec!["foo", "foo1", "foo2"]);
        assert_eq!(used.len(), 3);
        Ok(())
    }

    #[test]
    fn receiver_is_never_deduced() -> VignetteResult<()> {
        let dictionary = Dictionary::load(".* RENAME:other\n")?;
        let mut used = UsedNames::new();
        assert_eq!(
            deduce(&request("This", "LFoo;"), &mut used, &dictionary)?,
            "This"
        );
        assert!(used.is_empty());
        Ok(())
    }

    #[test]
    fn reserved_words_are_rejected() {
        let dictionary = Dictionary::new();
        let mut used = UsedNames::new();
        match deduce(&request("p", "Lnet/Int;"), &mut used, &dictionary) {
            Err(VignetteError::ReservedName { name, .. }) => assert_eq!(name, "int"),
            other => panic!("expected a reserved name error, got {other:?}"),
        }
        assert!(!used.contains("int"));
    }

    #[test]
    fn snowman_and_empty_names_are_rejected() -> VignetteResult<()> {
        let mut used = UsedNames::new();
        let snowman = Dictionary::load("^Foo$ RENAME:\u{2603}x\n")?;
        assert!(matches!(
            deduce(&request("p", "LFoo;"), &mut used, &snowman),
            Err(VignetteError::UnsupportedGlyph { .. })
        ));
        // a missing capture group expands to nothing
        let eraser = Dictionary::load("^(F)oo$ RENAME:$9\n")?;
        assert!(matches!(
            deduce(&request("p", "LFoo;"), &mut used, &eraser),
            Err(VignetteError::EmptyName { .. })
        ));
        Ok(())
    }

    #[test]
    fn invalid_descriptors_are_fatal() {
        let mut used = UsedNames::new();
        assert!(matches!(
            deduce(&request("p", "Lbroken"), &mut used, &Dictionary::new()),
            Err(VignetteError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn dictionary_rules_shape_the_candidate() -> VignetteResult<()> {
        let dictionary = Dictionary::load("^a(.*) RENAME:$1\n^b:Bar PREFIX:x\n")?;
        let mut used = UsedNames::new();
        assert_eq!(
            deduce(&request("p", "[Lnet/Bar;"), &mut used, &dictionary)?,
            "bar"
        );
        let abar = Dictionary::load("^Bar$ RENAME:abar\n^a(.*) RENAME:$1\n^b:Bar PREFIX:x\n")?;
        assert_eq!(deduce(&request("p", "LBar;"), &mut used, &abar)?, "xbar");
        Ok(())
    }
}
