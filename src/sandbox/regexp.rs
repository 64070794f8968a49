//! Regular expression values.
//!
//! Literals and `RegExp(...)` compile through the `regex` crate. The flags
//! `i`, `m` and `s` become builder options; `g` and `y` only change how the
//! matching methods walk the input. Positions seen by scripts are char
//! offsets.

use regex::{Captures, Regex, RegexBuilder};
use std::cell::Cell;
use std::ops::Range;

const KNOWN_FLAGS: &str = "dgimsuy";

pub struct RegexValue {
    pub source: String,
    pub flags: String,
    pub compiled: Regex,
    /// Where the next global or sticky match starts
    pub last_index: Cell<usize>,
}

impl RegexValue {
    /// Compile `source` with script flags
    ///
    /// # Errors
    /// The message a `SyntaxError` should carry
    pub fn compile(source: &str, flags: &str) -> Result<Self, String> {
        for (at, flag) in flags.char_indices() {
            if !KNOWN_FLAGS.contains(flag) || flags[..at].contains(flag) {
                return Err(format!(
                    "Invalid flags supplied to RegExp constructor '{}'",
                    flags
                ));
            }
        }
        let compiled = RegexBuilder::new(source)
            .case_insensitive(flags.contains('i'))
            .multi_line(flags.contains('m'))
            .dot_matches_new_line(flags.contains('s'))
            .build()
            .map_err(|e| {
                format!(
                    "Invalid regular expression: /{}/{}: {}",
                    source,
                    flags,
                    describe(&e)
                )
            })?;
        Ok(Self {
            source: source.to_string(),
            flags: flags.to_string(),
            compiled,
            last_index: Cell::new(0),
        })
    }

    pub fn global(&self) -> bool {
        self.flags.contains('g')
    }

    pub fn sticky(&self) -> bool {
        self.flags.contains('y')
    }

    /// Next match for `exec` and `test`, honouring and updating `lastIndex`
    pub fn exec_at<'t>(&self, text: &'t str) -> Option<Captures<'t>> {
        let tracks = self.global() || self.sticky();
        let start = if tracks { self.last_index.get() } else { 0 };
        let Some(byte) = byte_offset(text, start) else {
            self.last_index.set(0);
            return None;
        };
        let found = self
            .compiled
            .captures_at(text, byte)
            .filter(|caps| !self.sticky() || caps.get(0).is_some_and(|m| m.start() == byte));
        if tracks {
            let next = found
                .as_ref()
                .and_then(|caps| caps.get(0))
                .map_or(0, |m| char_offset(text, m.end()));
            self.last_index.set(next);
        }
        found
    }

    /// Literal form: `/source/flags`
    pub fn display(&self) -> String {
        format!("/{}/{}", self.source, self.flags)
    }
}

fn describe(error: &regex::Error) -> String {
    match error {
        regex::Error::Syntax(text) => text
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .map(|line| line.trim().trim_start_matches("error: ").to_string())
            .unwrap_or_default(),
        other => other.to_string(),
    }
}

/// Byte offset of the `index`-th char; the text length is a valid end
pub fn byte_offset(text: &str, index: usize) -> Option<usize> {
    text.char_indices()
        .map(|(byte, _)| byte)
        .chain(std::iter::once(text.len()))
        .nth(index)
}

pub fn char_offset(text: &str, byte: usize) -> usize {
    text[..byte].chars().count()
}

/// Capture groups in order, `None` for groups that did not participate
pub fn groups(caps: &Captures) -> Vec<Option<String>> {
    caps.iter()
        .map(|group| group.map(|m| m.as_str().to_string()))
        .collect()
}

/// Expand a replacement template: `$&`, `` $` ``, `$'`, `$1`..`$99`,
/// `$<name>` and `$$`
pub fn expand(template: &str, caps: &Captures, text: &str) -> String {
    let whole: Range<usize> = caps.get(0).map_or(0..0, |m| m.range());
    let group = |index: usize| caps.get(index).map_or("", |m| m.as_str());

    let mut out = String::new();
    let mut rest = template;
    while let Some(at) = rest.find('$') {
        out.push_str(&rest[..at]);
        let after = &rest[at + 1..];
        let bytes = after.as_bytes();
        let (piece, used): (&str, usize) = match bytes.first() {
            Some(b'$') => ("$", 1),
            Some(b'&') => (&text[whole.clone()], 1),
            Some(b'`') => (&text[..whole.start], 1),
            Some(b'\'') => (&text[whole.end..], 1),
            Some(b'<') => match after.find('>') {
                Some(close) => (caps.name(&after[1..close]).map_or("", |m| m.as_str()), close + 1),
                None => ("$", 0),
            },
            Some(d) if d.is_ascii_digit() => {
                let two = bytes
                    .get(1)
                    .filter(|b| b.is_ascii_digit())
                    .map(|b| usize::from(d - b'0') * 10 + usize::from(b - b'0'));
                let one = usize::from(d - b'0');
                match two {
                    Some(n) if n >= 1 && n < caps.len() => (group(n), 2),
                    _ if one >= 1 && one < caps.len() => (group(one), 1),
                    _ => ("$", 0),
                }
            }
            _ => ("$", 0),
        };
        out.push_str(piece);
        rest = &after[used..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_become_builder_options() {
        let re = RegexValue::compile("^b.c$", "ims").unwrap();
        assert!(re.compiled.is_match("a\nB\nC"));
        assert!(!re.global());
        assert_eq!(re.display(), "/^b.c$/ims");
    }

    #[test]
    fn test_bad_patterns_and_flags() {
        let err = RegexValue::compile("a(", "").err().unwrap();
        assert!(err.starts_with("Invalid regular expression: /a(/: "));
        let err = RegexValue::compile("a", "gg").err().unwrap();
        assert_eq!(err, "Invalid flags supplied to RegExp constructor 'gg'");
    }

    #[test]
    fn test_global_matching_walks_last_index() {
        let re = RegexValue::compile("o", "g").unwrap();
        let text = "foo";
        assert_eq!(re.exec_at(text).unwrap().get(0).unwrap().start(), 1);
        assert_eq!(re.last_index.get(), 2);
        assert!(re.exec_at(text).is_some());
        assert!(re.exec_at(text).is_none());
        assert_eq!(re.last_index.get(), 0);
    }

    #[test]
    fn test_sticky_matches_only_at_last_index() {
        let re = RegexValue::compile("b", "y").unwrap();
        assert!(re.exec_at("ab").is_none());
        re.last_index.set(1);
        assert!(re.exec_at("ab").is_some());
    }

    #[test]
    fn test_expand_replacement_templates() {
        let re = Regex::new(r"(?<word>\w+)@(\w+)").unwrap();
        let text = "to: ann@home!";
        let caps = re.captures(text).unwrap();
        assert_eq!(expand("$2/$1 [$&] $$", &caps, text), "home/ann [ann@home] $");
        assert_eq!(expand("$<word>|$`|$'", &caps, text), "ann|to: |!");
        assert_eq!(expand("$9 $0 $", &caps, text), "$9 $0 $");
    }

    #[test]
    fn test_offsets_count_chars() {
        assert_eq!(byte_offset("héllo", 2), Some(3));
        assert_eq!(byte_offset("ab", 2), Some(2));
        assert_eq!(byte_offset("ab", 3), None);
        assert_eq!(char_offset("héllo", 3), 2);
    }
}
