//! Tag scanning over a growing byte buffer
//!
//! The scanner is stateless: it inspects the front of the parser's buffer and
//! reports whether a protocol tag begins there. It never commits to a tag
//! until the closing `>` of the opening tag has actually arrived, which is
//! what makes the parser invariant under arbitrary chunk splits — a partial
//! `<thou` at the end of a chunk simply waits for the rest.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

/// Outcome of probing the buffer front for a tag.
#[derive(Debug, Clone, PartialEq)]
pub enum TagMatch {
    /// A complete opening tag `<name ...>` sits at position 0.
    Open {
        /// The matched tag name.
        name: &'static str,
        /// Parsed attributes from the opening tag.
        attrs: HashMap<String, String>,
        /// Total byte length of the tag, including `<` and `>`.
        len: usize,
    },
    /// A complete closing tag `</name>` sits at position 0.
    Close {
        /// The matched tag name.
        name: &'static str,
        /// Total byte length of the tag.
        len: usize,
    },
    /// The buffer front could still become one of the candidate tags once
    /// more bytes arrive; the caller must wait.
    Partial,
    /// The buffer front is definitely not one of the candidate tags.
    NotATag,
}

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    // key="value" or key='value', whitespace-tolerant.
    Regex::new(r#"(\w+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("attribute regex")
});

/// Parse an attribute list slice into a key → value map.
///
/// Attributes use `key="value"` or `key='value'` syntax. Unknown attribute
/// names are retained; the caller decides which ones matter.
pub fn parse_attrs(slice: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    for caps in ATTR_RE.captures_iter(slice) {
        let key = caps[1].to_string();
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        attrs.insert(key, value);
    }
    attrs
}

/// Probe the front of `buf` (which must start with `<`) for one of the
/// candidate tags.
///
/// `open` lists tag names recognized as opening tags in the current parser
/// state, `close` lists names recognized as closing tags. Returns
/// [`TagMatch::Partial`] whenever the bytes seen so far are a prefix of a
/// candidate but the tag is not yet complete.
pub fn match_tag(buf: &str, open: &[&'static str], close: &[&'static str]) -> TagMatch {
    debug_assert!(buf.starts_with('<'));
    if buf.len() == 1 {
        // A lone `<` could begin anything.
        return if open.is_empty() && close.is_empty() {
            TagMatch::NotATag
        } else {
            TagMatch::Partial
        };
    }

    if buf.as_bytes()[1] == b'/' {
        let rest = &buf[2..];
        for &name in close {
            let target = format!("{}>", name);
            if rest.len() >= target.len() {
                if rest.starts_with(&target) {
                    return TagMatch::Close {
                        name,
                        len: 2 + target.len(),
                    };
                }
            } else if target.starts_with(rest) {
                return TagMatch::Partial;
            }
        }
        return TagMatch::NotATag;
    }

    let rest = &buf[1..];
    for &name in open {
        if let Some(after) = rest.strip_prefix(name) {
            match after.chars().next() {
                // `<name` with nothing after it yet: wait for `>` or attrs.
                None => return TagMatch::Partial,
                Some('>') => {
                    return TagMatch::Open {
                        name,
                        attrs: HashMap::new(),
                        len: 1 + name.len() + 1,
                    }
                }
                Some(c) if c.is_whitespace() => {
                    // Attribute list; only commit once the `>` is present.
                    match after.find('>') {
                        Some(gt) => {
                            return TagMatch::Open {
                                name,
                                attrs: parse_attrs(&after[..gt]),
                                len: 1 + name.len() + gt + 1,
                            }
                        }
                        None => return TagMatch::Partial,
                    }
                }
                // e.g. `<thoughtful` — a longer word, not this tag.
                Some(_) => continue,
            }
        } else if name.starts_with(rest) {
            return TagMatch::Partial;
        }
    }
    TagMatch::NotATag
}

/// What to do with a possible markdown fence at the buffer front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceAction {
    /// Drop this many leading bytes: a complete fence line, newline included.
    Strip(usize),
    /// Consume this many leading backticks as plain content (fewer than
    /// three, so not a fence).
    Content(usize),
    /// The bytes so far could still become a fence line; wait for more.
    Wait,
    /// Final pass: the trailing unterminated fence line is dropped entirely.
    Discard,
    /// The buffer front is not a fence position.
    NotAFence,
}

/// Classify the buffer front as a markdown fence line.
///
/// Fence lines are whole lines beginning with three or more backticks (with
/// or without a language tag) at a line start. Backticks that do not open a
/// line are plain content and are never stripped.
pub fn scan_fence(buf: &str, at_line_start: bool, finalizing: bool) -> FenceAction {
    if !at_line_start || !buf.starts_with('`') {
        return FenceAction::NotAFence;
    }
    let ticks = buf.chars().take_while(|&c| c == '`').count();
    if ticks >= 3 {
        match buf.find('\n') {
            Some(nl) => FenceAction::Strip(nl + 1),
            None if finalizing => FenceAction::Discard,
            None => FenceAction::Wait,
        }
    } else if ticks == buf.len() && !finalizing {
        // One or two backticks at the buffer end may still grow into ```.
        FenceAction::Wait
    } else {
        FenceAction::Content(ticks)
    }
}

/// Number of leading bytes of `buf` that are plain content, stopping before
/// the next structural boundary: a `<` (possible tag) or a backtick at a line
/// start (possible markdown fence).
///
/// `at_line_start` says whether `buf[0]` begins a line. The first byte is
/// never treated as a boundary — the caller has already classified it as
/// content before asking for a run.
pub fn content_run(buf: &str, at_line_start: bool) -> usize {
    let mut line_start = at_line_start;
    for (i, c) in buf.char_indices() {
        if i > 0 {
            if c == '<' {
                return i;
            }
            if line_start && c == '`' {
                return i;
            }
        }
        line_start = c == '\n';
    }
    buf.len()
}
