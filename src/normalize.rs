//! Cleanup applied to gateway output before it is shown.
//!
//! Functions behind the gateway frequently return a JSON-encoded string, so
//! the body arrives wrapped in quotes with newlines escaped as the two
//! characters `\` `n`. Markdown produced that way also tends to carry ragged
//! whitespace after list and heading markers. [`normalize`] undoes both.
//!
//! Steps, always in this order:
//!
//! 1. strip one matching pair of outer quotes (buffered text only)
//! 2. escaped `\n\n` becomes a paragraph break
//! 3. escaped `\n` becomes a line break
//! 4. `-` plus spaces/tabs at a line start becomes `- `
//! 5. a `#` run plus spaces/tabs at a line start becomes the run plus one space

use once_cell::sync::Lazy;
use regex::Regex;

static BULLET_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^-[ \t]+").expect("bullet regex is valid"));

static HEADING_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(#+)[ \t]+").expect("heading regex is valid"));

static PARTIAL_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(-|#+)[ \t]*$").expect("partial marker regex is valid"));

const ESCAPED_PARAGRAPH: &str = "\\n\\n";
const ESCAPED_NEWLINE: &str = "\\n";

/// What kind of text is being normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeMode {
    /// A complete response body.
    Buffered,
    /// One streamed fragment. It may start or end mid-line, so outer quotes
    /// are left alone.
    Fragment,
}

/// Apply the cleanup steps to `text`.
pub fn normalize(text: &str, mode: NormalizeMode) -> String {
    let text = match mode {
        NormalizeMode::Buffered => strip_outer_quotes(text),
        NormalizeMode::Fragment => text,
    };
    rewrite_markers(&unescape(text))
}

fn unescape(text: &str) -> String {
    text.replace(ESCAPED_PARAGRAPH, "\n\n")
        .replace(ESCAPED_NEWLINE, "\n")
}

fn rewrite_markers(text: &str) -> String {
    let text = BULLET_MARKER.replace_all(text, "- ");
    HEADING_MARKER.replace_all(&text, "$1 ").into_owned()
}

/// Shorthand for [`normalize`] in buffered mode.
pub fn normalize_buffered(text: &str) -> String {
    normalize(text, NormalizeMode::Buffered)
}

/// Shorthand for [`normalize`] in fragment mode.
pub fn normalize_fragment(text: &str) -> String {
    normalize(text, NormalizeMode::Fragment)
}

/// Fragment-mode normalization over a sequence of fragments.
///
/// Feeding the pieces of a text through [`push`](Self::push) and then calling
/// [`finish`](Self::finish) yields the same output as
/// `normalize_fragment` on the whole text, wherever the pieces were cut. To
/// get there it holds back a trailing backslash (it may start an escape) and a
/// trailing line that is still only a marker (its spacing may continue), and
/// it only rewrites markers that really sit at the start of a line.
#[derive(Debug)]
pub struct FragmentNormalizer {
    escape_carry: String,
    line_carry: String,
    at_line_start: bool,
}

impl Default for FragmentNormalizer {
    fn default() -> Self {
        Self {
            escape_carry: String::new(),
            line_carry: String::new(),
            at_line_start: true,
        }
    }
}

impl FragmentNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize the next piece. May return less than was given, or nothing.
    pub fn push(&mut self, piece: &str) -> String {
        let mut raw = std::mem::take(&mut self.escape_carry);
        raw.push_str(piece);
        if raw.ends_with('\\') {
            raw.pop();
            self.escape_carry.push('\\');
        }

        let mut text = std::mem::take(&mut self.line_carry);
        text.push_str(&unescape(&raw));

        let (last_line_at, last_line_starts) = match text.rfind('\n') {
            Some(i) => (i + 1, true),
            None => (0, self.at_line_start),
        };
        if last_line_starts && PARTIAL_MARKER.is_match(&text[last_line_at..]) {
            self.line_carry = text.split_off(last_line_at);
        }
        self.emit(&text)
    }

    /// Flush everything held back.
    pub fn finish(&mut self) -> String {
        let raw = std::mem::take(&mut self.escape_carry);
        let mut text = std::mem::take(&mut self.line_carry);
        text.push_str(&unescape(&raw));
        self.emit(&text)
    }

    fn emit(&mut self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let out = if self.at_line_start {
            rewrite_markers(text)
        } else {
            match text.find('\n') {
                Some(i) => format!("{}{}", &text[..i], rewrite_markers(&text[i..])),
                None => text.to_string(),
            }
        };
        self.at_line_start = out.ends_with('\n');
        out
    }
}

fn strip_outer_quotes(text: &str) -> &str {
    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return &text[1..text.len() - 1];
        }
    }
    text
}
