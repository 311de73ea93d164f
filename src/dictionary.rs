//! Ordered rewrite rules used to turn a type name into a parameter name.
//!
//! A dictionary file holds one rule per line:
//!
//! ```text
//! # comment
//! <pattern>[:<filter>] <action>
//! ```
//!
//! `pattern` is searched in the candidate name and `filter`, when present, in
//! the fully qualified type the parameter was declared with. The action is one
//! of `RENAME:<value>`, `PREFIX:<value>`, `SUFFIX:<value>`, `FIRST` or `LAST`.
//! Any other action text, colons included, is taken verbatim as a `RENAME`
//! replacement. Replacements may refer to capture groups as `$1`, `${1}` or
//! `${name}`. A group number ends at the first digit that would name a group
//! the pattern does not have, so `$1s` is group 1 followed by `s`. `\$` and
//! `\\` escape the next character.

use regex::Regex;
use tracing::trace;

use crate::error::{VignetteError, VignetteResult};

/// Matching condition of a rule.
#[derive(Debug, Clone)]
pub struct Trigger {
    pattern: Regex,
    filter: Option<Regex>,
}

impl Trigger {
    pub fn new(pattern: Regex, filter: Option<Regex>) -> Self {
        Trigger { pattern, filter }
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    pub fn filter(&self) -> Option<&Regex> {
        self.filter.as_ref()
    }

    /// Whether the rule applies to parameters declared with `type_token`.
    pub fn accepts_type(&self, type_token: &str) -> bool {
        self.filter
            .as_ref()
            .is_none_or(|filter| filter.is_match(type_token))
    }
}

/// Transformation applied to the span matched by a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Rename(String),
    Prefix(String),
    Suffix(String),
    First,
    Last,
}

impl Action {
    fn parse(text: &str) -> Result<Action, String> {
        let (keyword, value) = match text.split_once(':') {
            Some((keyword, value)) => (keyword, Some(value)),
            None => (text, None),
        };
        let with_value = |make: fn(String) -> Action| match value {
            Some(value) if !value.is_empty() => Ok(make(value.to_owned())),
            _ => Err(format!("action {keyword} requires a value")),
        };
        match keyword {
            "RENAME" => with_value(Action::Rename),
            "PREFIX" => with_value(Action::Prefix),
            "SUFFIX" => with_value(Action::Suffix),
            "FIRST" => Ok(Action::First),
            "LAST" => Ok(Action::Last),
            _ => Ok(Action::Rename(text.to_owned())),
        }
    }
}

/// A trigger paired with the action it fires.
#[derive(Debug, Clone)]
pub struct Rule {
    pub trigger: Trigger,
    pub action: Action,
}

impl Rule {
    /// Applies the rule to `candidate`, returning the rewritten name if it fired.
    pub fn apply(&self, candidate: &str, type_token: &str) -> Option<String> {
        if !self.trigger.accepts_type(type_token) {
            return None;
        }
        let found = self.trigger.pattern.find(candidate)?;
        let span = found.as_str();
        let (before, after) = (&candidate[..found.start()], &candidate[found.end()..]);
        let rewritten = match &self.action {
            Action::Rename(replacement) => {
                let mut expanded = String::new();
                if let Some(captures) = self.trigger.pattern.captures(candidate) {
                    let groups = self.trigger.pattern.captures_len() - 1;
                    captures.expand(&group_references(replacement, groups), &mut expanded);
                }
                expanded
            }
            Action::Prefix(value) => format!("{value}{span}"),
            Action::Suffix(value) => format!("{span}{value}"),
            Action::First => split_case(span).first().copied().unwrap_or_default().to_owned(),
            Action::Last => split_case(span).last().copied().unwrap_or_default().to_owned(),
        };
        Some(format!("{before}{rewritten}{after}"))
    }
}

/// Rules in file order. Immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    rules: Vec<Rule>,
}

impl Dictionary {
    pub fn new() -> Self {
        Dictionary::default()
    }

    /// Parses dictionary text, compiling every pattern up front.
    pub fn load(text: &str) -> VignetteResult<Self> {
        let mut rules = Vec::new();
        for (number, raw) in text.lines().enumerate() {
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }
            let malformed = |message: String| VignetteError::MalformedRule {
                line: number + 1,
                message,
            };
            let (trigger, action) = line
                .split_once(char::is_whitespace)
                .map(|(trigger, action)| (trigger, action.trim_start()))
                .ok_or_else(|| malformed(format!("`{line}` has no action")))?;

            let (pattern, filter) = match trigger.split_once(':') {
                Some((pattern, filter)) if !filter.is_empty() => (pattern, Some(filter)),
                Some((pattern, _)) => (pattern, None),
                None => (trigger, None),
            };
            let compile =
                |source: &str| Regex::new(source).map_err(|err| malformed(err.to_string()));
            let trigger = Trigger::new(compile(pattern)?, filter.map(compile).transpose()?);
            let action = Action::parse(action).map_err(malformed)?;
            rules.push(Rule { trigger, action });
        }
        Ok(Dictionary { rules })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Appends the rules of `other` after the existing ones.
    pub fn extend(&mut self, other: Dictionary) {
        self.rules.extend(other.rules);
    }

    /// Folds every rule, in order, over `candidate`.
    pub fn apply(&self, candidate: &str, type_token: &str) -> String {
        self.rules
            .iter()
            .fold(candidate.to_owned(), |current, rule| {
                match rule.apply(&current, type_token) {
                    Some(next) => {
                        trace!(from = %current, to = %next, pattern = %rule.trigger.pattern, "dictionary rule fired");
                        next
                    }
                    None => current,
                }
            })
    }
}

/// Rewrites a replacement into the syntax of [`regex::Captures::expand`],
/// which would otherwise read `$1s` as a group named `1s`.
fn group_references(replacement: &str, groups: usize) -> String {
    let mut expansion = String::with_capacity(replacement.len() + 4);
    let mut chars = replacement.chars().peekable();
    while let Some(current) = chars.next() {
        match current {
            '\\' => match chars.next() {
                Some('$') => expansion.push_str("$$"),
                Some(escaped) => expansion.push(escaped),
                None => expansion.push('\\'),
            },
            '$' => match chars.peek().copied() {
                Some(digit @ '0'..='9') => {
                    chars.next();
                    let mut number = digit as usize - '0' as usize;
                    while let Some(next) = chars.peek().and_then(|next| next.to_digit(10)) {
                        let longer = number * 10 + next as usize;
                        if longer > groups {
                            break;
                        }
                        number = longer;
                        chars.next();
                    }
                    expansion.push_str(&format!("${{{number}}}"));
                }
                Some('{') => {
                    expansion.push('$');
                    for name in chars.by_ref() {
                        expansion.push(name);
                        if name == '}' {
                            break;
                        }
                    }
                }
                _ => expansion.push_str("$$"),
            },
            other => expansion.push(other),
        }
    }
    expansion
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(index) => &line[..index],
        None => line,
    }
}

/// Splits an identifier into its camel-case words.
///
/// A word starts at an upper-case letter that follows a non upper-case
/// character, or at the last capital of a run that is followed by a
/// lower-case letter: `HTTPServerId` becomes `HTTP`, `Server`, `Id`.
pub fn split_case(input: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut words = Vec::new();
    let mut start = 0;
    for position in 1..chars.len() {
        let (offset, current) = chars[position];
        if !current.is_uppercase() {
            continue;
        }
        let previous = chars[position - 1].1;
        let next_is_lower = chars
            .get(position + 1)
            .is_some_and(|(_, next)| next.is_lowercase());
        if !previous.is_uppercase() || next_is_lower {
            words.push(&input[start..offset]);
            start = offset;
        }
    }
    words.push(&input[start..]);
    words
}

#[cfg(test)]
mod tests {
    use super::{Action, Dictionary, split_case};
    use crate::error::{VignetteError, VignetteResult};
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_keyword_actions_and_comments() -> VignetteResult<()> {
        let dictionary = Dictionary::load(
            "# leading comment\n\
             \n\
             ^Abstract(.*) RENAME:$1   # trailing comment\n\
             Builder$ FIRST\n\
             ^(.*)Impl$:impl LAST\n\
             ^Map PREFIX:the\n\
             ^List SUFFIX:s\n",
        )?;
        let actions: Vec<&Action> = dictionary.rules().iter().map(|rule| &rule.action).collect();
        assert_eq!(
            actions,
            vec![
                &Action::Rename("$1".to_owned()),
                &Action::First,
                &Action::Last,
                &Action::Prefix("the".to_owned()),
                &Action::Suffix("s".to_owned()),
            ]
        );
        let filtered = &dictionary.rules()[2].trigger;
        assert_eq!(filtered.pattern().as_str(), "^(.*)Impl$");
        assert_eq!(filtered.filter().map(|filter| filter.as_str()), Some("impl"));
        Ok(())
    }

    #[test]
    fn bare_literal_keeps_the_whole_line_including_colons() -> VignetteResult<()> {
        let dictionary = Dictionary::load("^Entry$ key:value pair\n")?;
        assert_eq!(
            dictionary.rules()[0].action,
            Action::Rename("key:value pair".to_owned())
        );
        assert_eq!(dictionary.apply("Entry", "Entry"), "key:value pair");
        Ok(())
    }

    #[test]
    fn lowercase_keywords_are_bare_literals() -> VignetteResult<()> {
        let dictionary = Dictionary::load("^Foo$ rename:bar\n")?;
        assert_eq!(
            dictionary.rules()[0].action,
            Action::Rename("rename:bar".to_owned())
        );
        Ok(())
    }

    #[test]
    fn rejects_malformed_lines() {
        for (text, expected_line) in [
            ("^Foo$\n", 1),
            ("# ok\n^Foo RENAME\n", 2),
            ("^Foo PREFIX:\n", 1),
            ("\n\n([ RENAME:x\n", 3),
            ("^Foo:(bad RENAME:x\n", 1),
        ] {
            match Dictionary::load(text) {
                Err(VignetteError::MalformedRule { line, .. }) => {
                    assert_eq!(line, expected_line, "{text:?}")
                }
                other => panic!("{text:?} should be malformed, got {other:?}"),
            }
        }
    }

    #[test]
    fn rules_compose_in_file_order() -> VignetteResult<()> {
        let dictionary = Dictionary::load("^a(.*) RENAME:$1\n^b:Bar PREFIX:x\n")?;
        assert_eq!(dictionary.apply("abar", "Bar"), "xbar");
        Ok(())
    }

    #[test]
    fn filter_gates_on_the_raw_type() -> VignetteResult<()> {
        let dictionary = Dictionary::load("^b:Bar PREFIX:x\n")?;
        assert_eq!(dictionary.apply("bar", "Baz"), "bar");
        assert_eq!(dictionary.apply("bar", "net/x/Bar"), "xbar");
        Ok(())
    }

    #[test]
    fn actions_rewrite_only_the_matched_span() -> VignetteResult<()> {
        let dictionary = Dictionary::load("Server LAST\nHTTPServer:Http FIRST\n")?;
        assert_eq!(dictionary.apply("myServerSocket", "Socket"), "myServerSocket");
        assert_eq!(dictionary.apply("HTTPServerSocket", "HttpFactory"), "HTTPSocket");
        let suffix = Dictionary::load("Item SUFFIX:Stack\n")?;
        assert_eq!(suffix.apply("anItemOf", "Item"), "anItemStackOf");
        Ok(())
    }

    #[test]
    fn group_numbers_stop_before_trailing_text() -> VignetteResult<()> {
        let plural = Dictionary::load("^(.*)Impl$ RENAME:$1s\n")?;
        assert_eq!(plural.apply("FooImpl", "net/FooImpl"), "Foos");

        let swapped = Dictionary::load("^(Block)(Pos)$ RENAME:$2$1\n")?;
        assert_eq!(swapped.apply("BlockPos", "net/BlockPos"), "PosBlock");

        // one group only, so `$12` is group 1 and a literal 2
        let numbered = Dictionary::load("^(Vec)$ RENAME:$12\n")?;
        assert_eq!(numbered.apply("Vec", "net/Vec"), "Vec2");

        let named = Dictionary::load("^(?P<head>[A-Z][a-z]+)Ref$ RENAME:${head}Handle\n")?;
        assert_eq!(named.apply("EntityRef", "net/EntityRef"), "EntityHandle");
        Ok(())
    }

    #[test]
    fn escaped_dollars_are_literal() -> VignetteResult<()> {
        let dictionary = Dictionary::load("^(Money)$ RENAME:\\$$1\n")?;
        assert_eq!(dictionary.apply("Money", "net/Money"), "$Money");
        Ok(())
    }

    #[test]
    fn extend_appends_rules() -> VignetteResult<()> {
        let mut dictionary = Dictionary::load("^a RENAME:b\n")?;
        dictionary.extend(Dictionary::load("^b RENAME:c\n")?);
        assert_eq!(dictionary.len(), 2);
        assert_eq!(dictionary.apply("a", "A"), "c");
        Ok(())
    }

    #[test]
    fn splits_camel_case_words() {
        assert_eq!(split_case("HTTPServer"), vec!["HTTP", "Server"]);
        assert_eq!(split_case("blockPosId"), vec!["block", "Pos", "Id"]);
        assert_eq!(split_case("Item"), vec!["Item"]);
        assert_eq!(split_case("URL"), vec!["URL"]);
        assert_eq!(split_case("aFoo"), vec!["a", "Foo"]);
        assert_eq!(split_case(""), vec![""]);
    }
}
