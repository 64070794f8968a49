//! Line patterns recognized in program output.

use once_cell::sync::Lazy;
use regex::Regex;

/// `outer calling inner`, `outer() is calling inner()`
pub static CALLING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([A-Za-z_$][\w$]*)(?:\(\))?\s+(?:is\s+)?(?:now\s+)?calling\s+([A-Za-z_$][\w$]*)")
        .expect("valid regex")
});

/// `first function starting`, `loader() started`, `entering parse`
pub static STARTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b([A-Za-z_$][\w$]*)(?:\(\))?\s+(?:function\s+|method\s+|callback\s+)?(?:is\s+)?(?:starting|started|begins|beginning|entered|running)\b",
    )
    .expect("valid regex")
});

pub static ENTERING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:entering|starting|start of)\s+([A-Za-z_$][\w$]*)").expect("valid regex")
});

/// `first function completed`, `loader() finished`, `exiting parse`
pub static COMPLETED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b([A-Za-z_$][\w$]*)(?:\(\))?\s+(?:function\s+|method\s+|callback\s+)?(?:is\s+)?(?:completed|complete|finished|done|ended|returned|returning)\b",
    )
    .expect("valid regex")
});

pub static EXITING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:exiting|leaving|end of)\s+([A-Za-z_$][\w$]*)").expect("valid regex")
});

/// A bare call mention: `name()`
pub static MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Za-z_$][\w$]*)\(\)").expect("valid regex"));

/// Words that look like names in these phrases but never are
const NOISE: &[&str] = &[
    "function", "method", "callback", "is", "now", "the", "a", "an", "then", "and", "it",
    "Uncaught", "error", "warn",
];

pub fn is_noise(word: &str) -> bool {
    NOISE.iter().any(|noise| noise.eq_ignore_ascii_case(word))
}

/// Name and phase of a start/complete phrase on one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Start(String),
    Complete(String),
}

/// Start or completion phrase on `line`, if any. Completion wins when a
/// line carries both.
pub fn marker(line: &str) -> Option<Marker> {
    let named = |re: &Regex| {
        re.captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|name| !is_noise(name))
    };
    if let Some(name) = named(&COMPLETED).or_else(|| named(&EXITING)) {
        return Some(Marker::Complete(name));
    }
    named(&STARTED)
        .or_else(|| named(&ENTERING))
        .map(Marker::Start)
}

/// Every `caller calling callee` pair on `line`
pub fn calls(line: &str) -> Vec<(String, String)> {
    CALLING
        .captures_iter(line)
        .filter_map(|caps| {
            let caller = caps.get(1)?.as_str();
            let callee = caps.get(2)?.as_str();
            (!is_noise(caller) && !is_noise(callee) && caller != callee)
                .then(|| (caller.to_string(), callee.to_string()))
        })
        .collect()
}

/// Names mentioned as `name()` on `line`, in order
pub fn mentions(line: &str) -> Vec<String> {
    MENTION
        .captures_iter(line)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|name| !is_noise(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers() {
        assert_eq!(marker("first function starting"), Some(Marker::Start("first".into())));
        assert_eq!(marker("loader() finished in 3ms"), Some(Marker::Complete("loader".into())));
        assert_eq!(marker("Entering parse"), Some(Marker::Start("parse".into())));
        assert_eq!(marker("nothing to see"), None);
    }

    #[test]
    fn test_calls() {
        assert_eq!(
            calls("outer() is calling inner"),
            vec![("outer".to_string(), "inner".to_string())]
        );
        assert!(calls("recursion calling recursion").is_empty());
    }

    #[test]
    fn test_mentions() {
        assert_eq!(mentions("run() then stop() then run()"), vec!["run", "stop", "run"]);
    }
}
