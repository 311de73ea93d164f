//! Readers for the SRG family of mapping files.

use std::fmt;

use clap::ValueEnum;
use tracing::debug;

use crate::error::{VignetteError, VignetteResult};
use crate::mapping::{ClassMapping, FieldMapping, MappingSet, MethodSignature};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum MappingFormat {
    /// `PK:`/`CL:`/`FD:`/`MD:` records.
    #[default]
    Srg,
    /// Tab-indented members under their class.
    Tsrg,
    /// Tab-indented with namespaces, parameters and `static` markers.
    Tsrg2,
}

impl fmt::Display for MappingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MappingFormat::Srg => "SRG",
            MappingFormat::Tsrg => "TSRG",
            MappingFormat::Tsrg2 => "TSRG2",
        })
    }
}

/// Parses `text` in the given format. Only the first two namespaces of a
/// TSRG2 file are used.
pub fn read(format: MappingFormat, text: &str) -> VignetteResult<MappingSet> {
    let mappings = match format {
        MappingFormat::Srg => read_srg(text)?,
        MappingFormat::Tsrg => read_tsrg(text)?,
        MappingFormat::Tsrg2 => read_tsrg2(text)?,
    };
    debug!(%format, classes = mappings.len(), "read mappings");
    Ok(mappings)
}

fn malformed(line: usize, message: impl Into<String>) -> VignetteError {
    VignetteError::MalformedMapping {
        line,
        message: message.into(),
    }
}

/// Lines with their 1-based number, skipping blanks and `#` comments.
fn records(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim_end()))
        .filter(|(_, line)| {
            let content = line.trim_start();
            !content.is_empty() && !content.starts_with('#')
        })
}

fn split_member(line: usize, qualified: &str) -> VignetteResult<(&str, &str)> {
    qualified
        .rsplit_once('/')
        .ok_or_else(|| malformed(line, format!("`{qualified}` has no owner")))
}

fn set_class(mappings: &mut MappingSet, obfuscated: &str, deobfuscated: &str) {
    mappings.class_mut_or_insert(obfuscated).deobfuscated = Some(deobfuscated.to_owned());
}

fn insert_field(class: &mut ClassMapping, obfuscated: &str, deobfuscated: &str, descriptor: Option<&str>) {
    class.insert_field(FieldMapping {
        obfuscated: obfuscated.to_owned(),
        deobfuscated: deobfuscated.to_owned(),
        descriptor: descriptor.map(str::to_owned),
    });
}

fn read_srg(text: &str) -> VignetteResult<MappingSet> {
    let mut mappings = MappingSet::new();
    for (line, record) in records(text) {
        let mut tokens = record.split_whitespace();
        let kind = tokens.next().unwrap_or_default();
        let values: Vec<&str> = tokens.collect();
        match (kind, values.as_slice()) {
            ("PK:", [_, _]) => {}
            ("CL:", [obfuscated, deobfuscated]) => set_class(&mut mappings, obfuscated, deobfuscated),
            ("FD:", [obfuscated, deobfuscated]) | ("FD:", [obfuscated, _, deobfuscated, _]) => {
                let (owner, name) = split_member(line, obfuscated)?;
                let (_, mapped) = split_member(line, deobfuscated)?;
                let descriptor = (values.len() == 4).then(|| values[1]);
                insert_field(mappings.class_mut_or_insert(owner), name, mapped, descriptor);
            }
            ("MD:", [obfuscated, descriptor, deobfuscated, _]) => {
                let (owner, name) = split_member(line, obfuscated)?;
                let (_, mapped) = split_member(line, deobfuscated)?;
                mappings
                    .class_mut_or_insert(owner)
                    .method_mut_or_insert(MethodSignature::new(name, *descriptor))
                    .deobfuscated = (*mapped).to_owned();
            }
            _ => return Err(malformed(line, format!("unrecognized record `{record}`"))),
        }
    }
    Ok(mappings)
}

fn read_tsrg(text: &str) -> VignetteResult<MappingSet> {
    let mut mappings = MappingSet::new();
    let mut current: Option<String> = None;
    for (line, record) in records(text) {
        let member = record.starts_with(['\t', ' ']);
        let tokens: Vec<&str> = record.split_whitespace().collect();
        if !member {
            match tokens.as_slice() {
                // package renames carry no class information
                [obfuscated, _] if obfuscated.ends_with('/') => current = None,
                [obfuscated, deobfuscated] => {
                    set_class(&mut mappings, obfuscated, deobfuscated);
                    current = Some((*obfuscated).to_owned());
                }
                _ => return Err(malformed(line, "class lines need two names")),
            }
            continue;
        }
        let owner = current
            .as_deref()
            .ok_or_else(|| malformed(line, "member outside of a class"))?;
        let class = mappings.class_mut_or_insert(owner);
        match tokens.as_slice() {
            [obfuscated, deobfuscated] => insert_field(class, obfuscated, deobfuscated, None),
            [obfuscated, descriptor, deobfuscated] => {
                class
                    .method_mut_or_insert(MethodSignature::new(*obfuscated, *descriptor))
                    .deobfuscated = (*deobfuscated).to_owned();
            }
            _ => return Err(malformed(line, format!("unrecognized member `{}`", record.trim()))),
        }
    }
    Ok(mappings)
}

fn read_tsrg2(text: &str) -> VignetteResult<MappingSet> {
    let mut records = records(text);
    let namespaces = match records.next() {
        Some((_, header)) if header.starts_with("tsrg2 ") => header.split_whitespace().count() - 1,
        Some((line, _)) => return Err(malformed(line, "missing `tsrg2` header")),
        None => return Ok(MappingSet::new()),
    };
    if namespaces < 2 {
        return Err(malformed(1, "at least two namespaces are required"));
    }

    let mut mappings = MappingSet::new();
    let mut class: Option<String> = None;
    let mut method: Option<MethodSignature> = None;
    for (line, record) in records {
        let depth = record.len() - record.trim_start_matches('\t').len();
        let tokens: Vec<&str> = record.split_whitespace().collect();
        match depth {
            0 => {
                if tokens.len() != namespaces {
                    return Err(malformed(line, format!("class lines need {namespaces} names")));
                }
                method = None;
                if tokens[0].ends_with('/') {
                    class = None;
                    continue;
                }
                set_class(&mut mappings, tokens[0], tokens[1]);
                class = Some(tokens[0].to_owned());
            }
            1 => {
                let owner = class
                    .as_deref()
                    .ok_or_else(|| malformed(line, "member outside of a class"))?;
                let mapping = mappings.class_mut_or_insert(owner);
                method = None;
                if tokens.len() == namespaces {
                    insert_field(mapping, tokens[0], tokens[1], None);
                } else if tokens.len() == namespaces + 1 && tokens[1].starts_with('(') {
                    let signature = MethodSignature::new(tokens[0], tokens[1]);
                    mapping.method_mut_or_insert(signature.clone()).deobfuscated = tokens[2].to_owned();
                    method = Some(signature);
                } else if tokens.len() == namespaces + 1 {
                    insert_field(mapping, tokens[0], tokens[2], Some(tokens[1]));
                } else {
                    return Err(malformed(line, format!("unrecognized member `{}`", record.trim())));
                }
            }
            2 => {
                let (Some(owner), Some(signature)) = (class.as_deref(), method.as_ref()) else {
                    return Err(malformed(line, "parameter outside of a method"));
                };
                match tokens.as_slice() {
                    ["static"] => {}
                    [index, names @ ..] if names.len() == namespaces => {
                        let index: u16 = index
                            .parse()
                            .map_err(|_| malformed(line, format!("bad parameter index `{index}`")))?;
                        mappings
                            .class_mut_or_insert(owner)
                            .method_mut_or_insert(signature.clone())
                            .parameters
                            .insert(index, names[1].to_owned());
                    }
                    _ => return Err(malformed(line, format!("unrecognized parameter `{}`", record.trim()))),
                }
            }
            _ => return Err(malformed(line, "indentation is too deep")),
        }
    }
    Ok(mappings)
}

#[cfg(test)]
mod tests {
    use super::{MappingFormat, read};
    use crate::error::{VignetteError, VignetteResult};
    use crate::mapping::{MappingSet, MethodSignature};
    use pretty_assertions::assert_eq;

    fn method_name(set: &MappingSet, class: &str, name: &str, descriptor: &str) -> Option<String> {
        set.class(class)
            .and_then(|mapping| mapping.method(&MethodSignature::new(name, descriptor)))
            .map(|method| method.deobfuscated.clone())
    }

    #[test]
    fn reads_srg_records() -> VignetteResult<()> {
        let text = "PK: ./ net/example\n\
                    CL: a net/example/Foo\n\
                    FD: a/b net/example/Foo/count\n\
                    FD: a/c I net/example/Foo/size I\n\
                    # comment\n\
                    MD: a/d (La;)V net/example/Foo/accept (Lnet/example/Foo;)V\n";
        let set = read(MappingFormat::Srg, text)?;
        let foo = set.class("a").map(|class| class.deobfuscated.clone());
        assert_eq!(foo, Some(Some("net/example/Foo".to_owned())));
        let fields = set.class("a").map(|class| {
            (
                class.field("b").map(|field| field.deobfuscated.clone()),
                class.field("c").and_then(|field| field.descriptor.clone()),
            )
        });
        assert_eq!(fields, Some((Some("count".to_owned()), Some("I".to_owned()))));
        assert_eq!(method_name(&set, "a", "d", "(La;)V").as_deref(), Some("accept"));
        Ok(())
    }

    #[test]
    fn reads_tsrg_members_under_their_class() -> VignetteResult<()> {
        let text = "a/ net/example/\na net/example/Foo\n\tb count\n\td (La;)V accept\nc net/example/Bar\n";
        let set = read(MappingFormat::Tsrg, text)?;
        assert_eq!(set.len(), 2);
        assert_eq!(method_name(&set, "a", "d", "(La;)V").as_deref(), Some("accept"));
        assert_eq!(
            set.class("a").and_then(|class| class.field("b")).map(|field| field.deobfuscated.as_str()),
            Some("count")
        );
        Ok(())
    }

    #[test]
    fn reads_tsrg2_parameters() -> VignetteResult<()> {
        let text = "tsrg2 obf srg\n\
                    a net/example/Foo\n\
                    \tb I count\n\
                    \td (JI)V accept\n\
                    \t\tstatic\n\
                    \t\t0 e first\n\
                    \t\t2 f second\n";
        let set = read(MappingFormat::Tsrg2, text)?;
        let accept = set
            .class("a")
            .and_then(|class| class.method(&MethodSignature::new("d", "(JI)V")));
        assert_eq!(accept.map(|method| method.deobfuscated.as_str()), Some("accept"));
        assert_eq!(accept.and_then(|method| method.parameter(0)), Some("first"));
        assert_eq!(accept.and_then(|method| method.parameter(2)), Some("second"));
        assert_eq!(
            set.class("a").and_then(|class| class.field("b")).and_then(|field| field.descriptor.as_deref()),
            Some("I")
        );
        Ok(())
    }

    #[test]
    fn reports_the_offending_line() {
        let err = read(MappingFormat::Srg, "CL: a net/Foo\nXX: what\n");
        assert!(matches!(err, Err(VignetteError::MalformedMapping { line: 2, .. })));
        let err = read(MappingFormat::Tsrg, "\tb count\n");
        assert!(matches!(err, Err(VignetteError::MalformedMapping { line: 1, .. })));
        let err = read(MappingFormat::Tsrg2, "obf srg\n");
        assert!(matches!(err, Err(VignetteError::MalformedMapping { line: 1, .. })));
    }
}
