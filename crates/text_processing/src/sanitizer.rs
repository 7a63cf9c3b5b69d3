//! Output sanitizer
//!
//! An ordered list of pure rewrite rules that strip markdown and other
//! unspeakable markup from model output. Rules run in order, and the whole
//! list is re-applied until the text stops changing, so `clean` is
//! idempotent. No rule ever lengthens its input, which bounds the loop.
//!
//! Streaming tokens such as `" your"` carry word-boundary spaces, so the
//! whitespace rule collapses runs but never trims.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

/// One named rewrite rule
#[derive(Clone, Copy)]
pub struct Rule {
    /// Rule name, for logging and tests
    pub name: &'static str,
    apply: fn(&str) -> Cow<'_, str>,
}

impl Rule {
    /// Apply this rule once
    pub fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        (self.apply)(text)
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Rule").field(&self.name).finish()
    }
}

static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static UNDERLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"__([^_]+)__").unwrap());
static ITALIC_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+)\*").unwrap());
static ITALIC_UNDERSCORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_([^_]+)_").unwrap());
static STRIKETHROUGH: Lazy<Regex> = Lazy::new(|| Regex::new(r"~~([^~]+)~~").unwrap());
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#+[ \t]*").unwrap());
static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[^`]*```").unwrap());
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap());
static EMPHASIS_MARKERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[*_]+").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn strip_bold(text: &str) -> Cow<'_, str> {
    BOLD.replace_all(text, "${1}")
}

fn strip_underline(text: &str) -> Cow<'_, str> {
    UNDERLINE.replace_all(text, "${1}")
}

fn strip_italic_star(text: &str) -> Cow<'_, str> {
    ITALIC_STAR.replace_all(text, "${1}")
}

fn strip_italic_underscore(text: &str) -> Cow<'_, str> {
    ITALIC_UNDERSCORE.replace_all(text, "${1}")
}

fn strip_strikethrough(text: &str) -> Cow<'_, str> {
    STRIKETHROUGH.replace_all(text, "${1}")
}

fn strip_headings(text: &str) -> Cow<'_, str> {
    HEADING.replace_all(text, "")
}

fn strip_code_fences(text: &str) -> Cow<'_, str> {
    CODE_FENCE.replace_all(text, "")
}

fn unwrap_inline_code(text: &str) -> Cow<'_, str> {
    INLINE_CODE.replace_all(text, "${1}")
}

fn unwrap_links(text: &str) -> Cow<'_, str> {
    LINK.replace_all(text, "${1}")
}

fn strip_emphasis_markers(text: &str) -> Cow<'_, str> {
    EMPHASIS_MARKERS.replace_all(text, "")
}

fn collapse_whitespace(text: &str) -> Cow<'_, str> {
    WHITESPACE.replace_all(text, " ")
}

/// Rules in application order
pub static RULES: &[Rule] = &[
    Rule { name: "strip_bold", apply: strip_bold },
    Rule { name: "strip_underline", apply: strip_underline },
    Rule { name: "strip_italic_star", apply: strip_italic_star },
    Rule { name: "strip_italic_underscore", apply: strip_italic_underscore },
    Rule { name: "strip_strikethrough", apply: strip_strikethrough },
    Rule { name: "strip_headings", apply: strip_headings },
    Rule { name: "strip_code_fences", apply: strip_code_fences },
    Rule { name: "unwrap_inline_code", apply: unwrap_inline_code },
    Rule { name: "unwrap_links", apply: unwrap_links },
    Rule { name: "strip_emphasis_markers", apply: strip_emphasis_markers },
    // must stay last
    Rule { name: "collapse_whitespace", apply: collapse_whitespace },
];

fn apply_rules(text: &str) -> String {
    RULES
        .iter()
        .fold(text.to_string(), |acc, rule| rule.apply(&acc).into_owned())
}

/// Clean model output for speech
pub fn clean(text: &str) -> String {
    let mut current = apply_rules(text);
    loop {
        let next = apply_rules(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str) -> Rule {
        *RULES.iter().find(|r| r.name == name).unwrap()
    }

    #[test]
    fn test_cleaning_cases() {
        let cases = [
            ("I'm *really* excited to help!", "I'm really excited to help!"),
            ("This is **very** important!", "This is very important!"),
            ("*smiles* Sure, I can help with that!", "smiles Sure, I can help with that!"),
            ("Here's the __important__ part.", "Here's the important part."),
            ("Check out this ~~mistake~~ correction.", "Check out this mistake correction."),
            ("# Welcome to our service", "Welcome to our service"),
            ("Use the `code` function here.", "Use the code function here."),
            ("Visit [our website](https://example.com) for more.", "Visit our website for more."),
            ("This   has    multiple     spaces.", "This has multiple spaces."),
            ("Normal text without formatting.", "Normal text without formatting."),
            (
                "**Bold** and *italic* and __underline__ all together!",
                "Bold and italic and underline all together!",
            ),
            (
                "*laughs* That's **really** funny! *winks*",
                "laughs That's really funny! winks",
            ),
        ];

        for (input, expected) in cases {
            assert_eq!(clean(input), expected, "input: {:?}", input);
        }
    }

    #[test]
    fn test_preserves_token_spaces() {
        assert_eq!(clean(" your"), " your");
        assert_eq!(clean(" friendly"), " friendly");
        assert_eq!(clean("Hello "), "Hello ");
        assert_eq!(clean(" "), " ");
        assert_eq!(clean("  spaced  "), " spaced ");
        // a streamed token that opens with a hash keeps its separator
        assert_eq!(clean(" #4"), " #4");
        assert_eq!(clean(" #"), " #");
        assert_eq!(clean(" # "), " # ");
    }

    #[test]
    fn test_code_fence_removed() {
        let text = "Here:\n```rust\nlet x = 1;\n```\nDone.";
        assert_eq!(clean(text), "Here: Done.");
    }

    #[test]
    fn test_heading_at_line_start() {
        assert_eq!(clean("Intro\n## Hours\nOpen daily"), "Intro Hours Open daily");
        // mid-line hashes are not headings
        assert_eq!(clean("Room #4"), "Room #4");
        assert_eq!(clean("# Hours"), "Hours");
    }

    #[test]
    fn test_rules_individually() {
        assert_eq!(rule("strip_bold").apply("a **b** c"), "a b c");
        assert_eq!(rule("strip_underline").apply("__b__"), "b");
        assert_eq!(rule("strip_italic_star").apply("*b*"), "b");
        assert_eq!(rule("strip_italic_underscore").apply("_b_"), "b");
        assert_eq!(rule("strip_strikethrough").apply("~~b~~"), "b");
        assert_eq!(rule("strip_headings").apply("### Title"), "Title");
        assert_eq!(rule("strip_code_fences").apply("a```x```b"), "ab");
        assert_eq!(rule("unwrap_inline_code").apply("`x`"), "x");
        assert_eq!(rule("unwrap_links").apply("[x](http://y)"), "x");
        assert_eq!(rule("strip_emphasis_markers").apply("a*_b"), "ab");
        assert_eq!(rule("collapse_whitespace").apply("a \n\t b"), "a b");
    }

    #[test]
    fn test_whitespace_rule_is_last() {
        assert_eq!(RULES.last().map(|r| r.name), Some("collapse_whitespace"));
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "``a``",
            "# # a",
            "***a***",
            "_*a*_",
            "[`x`](u)",
            "a  \n\t b",
            "**",
            "__init__ method",
            "~~~~",
            "```",
            "**Bold** and *italic* and __underline__ all together!",
            " your",
            "",
        ];

        for input in inputs {
            let once = clean(input);
            assert_eq!(clean(&once), once, "input: {:?}", input);
        }
    }

    #[test]
    fn test_rules_never_lengthen() {
        let inputs = ["**a** _b_ `c` [d](e) ~~f~~ # g", "\t\t", "plain"];
        for input in inputs {
            for rule in RULES {
                assert!(rule.apply(input).len() <= input.len(), "{:?}", rule);
            }
        }
    }
}
