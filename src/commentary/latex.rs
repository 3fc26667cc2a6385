/*!
Math-aware formatting of streamed model output.

Splits finalized text into math spans and prose, lifts package
declarations into a separate preamble, escapes prose-only special
characters and rebuilds enumerate lists. Math spans are never touched.
*/

use log::warn;
use serde::{Deserialize, Serialize};

const USEPACKAGE: &str = "\\usepackage{";
const BEGIN_ENUMERATE: &str = "\\begin{enumerate}";
const END_ENUMERATE: &str = "\\end{enumerate}";
const ITEM: &str = "\\item";

/// Characters escaped with a backslash outside math spans
const PROSE_SPECIALS: [char; 7] = ['&', '%', '$', '#', '_', '{', '}'];

/// Preamble declarations and display-ready body text
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedOutput {
    pub preamble: String,
    pub content: String,
}

impl FormattedOutput {
    /// Text handed to the math-capable display: preamble, newline, content
    #[must_use]
    pub fn display_text(&self) -> String {
        format!("{}\n{}", self.preamble, self.content)
    }
}

/// Raised when a package declaration cannot be delimited
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamParseError {
    #[error("unterminated package declaration at byte {offset}")]
    UnterminatedDeclaration { offset: usize },

    #[error("nested brace in package declaration at byte {offset}")]
    NestedBrace { offset: usize },
}

impl StreamParseError {
    /// Byte offset in the raw text where the malformed declaration starts
    #[must_use]
    pub fn offset(&self) -> usize {
        match self {
            Self::UnterminatedDeclaration { offset } | Self::NestedBrace { offset } => *offset,
        }
    }
}

/// Turns finalized raw text into [`FormattedOutput`]
pub trait TextFormatter {
    fn format(&self, raw: &str) -> FormattedOutput;
}

/// Pure formatter for LaTeX-flavoured model output
#[derive(Clone, Copy, Debug, Default)]
pub struct LatexFormatter;

impl LatexFormatter {
    /// Format `raw`, failing on malformed package declarations
    pub fn try_format(&self, raw: &str) -> Result<FormattedOutput, StreamParseError> {
        let mut preamble = Vec::new();
        let mut content = String::with_capacity(raw.len() + raw.len() / 8);

        for span in split_math(raw) {
            match span {
                Span::Math { text } => content.push_str(text),
                Span::Prose { text, offset } => {
                    let tokens = tokenize_prose(text, offset)?;
                    render_prose(&tokens, &mut preamble, &mut content);
                }
            }
        }

        Ok(FormattedOutput {
            preamble: preamble.join("\n"),
            content,
        })
    }
}

impl TextFormatter for LatexFormatter {
    /// Never fails: on a malformed declaration the text before it is
    /// formatted as content and the preamble is left empty.
    fn format(&self, raw: &str) -> FormattedOutput {
        match self.try_format(raw) {
            Ok(output) => output,
            Err(e) => {
                warn!("Formatting degraded: {e}");
                let prefix = &raw[..e.offset()];
                let content = self
                    .try_format(prefix)
                    .map(|output| output.content)
                    .unwrap_or_else(|_| prefix.to_string());
                FormattedOutput {
                    preamble: String::new(),
                    content,
                }
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Span<'a> {
    Math { text: &'a str },
    Prose { text: &'a str, offset: usize },
}

/// Split on `$$...$$` and `$...$`, display delimiters taking precedence.
/// An unmatched `$` stays in prose.
fn split_math(raw: &str) -> Vec<Span<'_>> {
    let mut spans = Vec::new();
    let mut prose_start = 0;
    let mut cursor = 0;

    while let Some(rel) = raw[cursor..].find('$') {
        let start = cursor + rel;
        let display_end = raw[start..]
            .starts_with("$$")
            .then(|| raw[start + 2..].find("$$").map(|e| start + 2 + e + 2))
            .flatten();
        let end = display_end.or_else(|| raw[start + 1..].find('$').map(|e| start + 1 + e + 1));

        let Some(end) = end else {
            break;
        };

        if start > prose_start {
            spans.push(Span::Prose {
                text: &raw[prose_start..start],
                offset: prose_start,
            });
        }
        spans.push(Span::Math {
            text: &raw[start..end],
        });
        prose_start = end;
        cursor = end;
    }

    if prose_start < raw.len() {
        spans.push(Span::Prose {
            text: &raw[prose_start..],
            offset: prose_start,
        });
    }

    spans
}

/// Structural pieces of a prose span
#[derive(Debug, PartialEq, Eq)]
enum ProseToken<'a> {
    Text(&'a str),
    Declaration(&'a str),
    ListBegin,
    ListEnd,
    Item,
}

fn tokenize_prose(text: &str, base_offset: usize) -> Result<Vec<ProseToken<'_>>, StreamParseError> {
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut cursor = 0;

    while let Some(rel) = text[cursor..].find('\\') {
        let at = cursor + rel;
        let rest = &text[at..];

        let (token, len) = if rest.starts_with(USEPACKAGE) {
            match declaration_len(rest, base_offset + at)? {
                Some(len) => (ProseToken::Declaration(&rest[..len]), len),
                None => {
                    cursor = at + 1;
                    continue;
                }
            }
        } else if rest.starts_with(BEGIN_ENUMERATE) {
            (ProseToken::ListBegin, BEGIN_ENUMERATE.len())
        } else if rest.starts_with(END_ENUMERATE) {
            (ProseToken::ListEnd, END_ENUMERATE.len())
        } else if is_control_word(rest, ITEM) {
            (ProseToken::Item, ITEM.len())
        } else {
            cursor = at + 1;
            continue;
        };

        if at > text_start {
            tokens.push(ProseToken::Text(&text[text_start..at]));
        }
        tokens.push(token);
        text_start = at + len;
        cursor = text_start;
    }

    if text_start < text.len() {
        tokens.push(ProseToken::Text(&text[text_start..]));
    }

    Ok(tokens)
}

/// Length of a `\usepackage{name}` declaration at the start of `rest`.
///
/// `Ok(None)` for an empty argument, which is left as ordinary prose.
fn declaration_len(rest: &str, offset: usize) -> Result<Option<usize>, StreamParseError> {
    let body = &rest[USEPACKAGE.len()..];
    for (i, ch) in body.char_indices() {
        match ch {
            '}' if i == 0 => return Ok(None),
            '}' => return Ok(Some(USEPACKAGE.len() + i + 1)),
            '{' => return Err(StreamParseError::NestedBrace { offset }),
            _ => {}
        }
    }
    Err(StreamParseError::UnterminatedDeclaration { offset })
}

/// `\item` but not `\itemsep`
fn is_control_word(rest: &str, word: &str) -> bool {
    rest.starts_with(word)
        && !rest[word.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
}

fn render_prose<'a>(tokens: &[ProseToken<'a>], preamble: &mut Vec<&'a str>, out: &mut String) {
    let mut iter = tokens.iter().peekable();
    while let Some(token) = iter.next() {
        match token {
            ProseToken::Text(text) => escape_into(text, out),
            ProseToken::Declaration(decl) => preamble.push(*decl),
            ProseToken::ListBegin => out.push_str(BEGIN_ENUMERATE),
            ProseToken::ListEnd => out.push_str(END_ENUMERATE),
            ProseToken::Item => {
                out.push_str(ITEM);
                let spaced = matches!(
                    iter.peek(),
                    Some(ProseToken::Text(next)) if next.starts_with(char::is_whitespace)
                );
                if !spaced {
                    out.push(' ');
                }
            }
        }
    }
}

fn escape_into(text: &str, out: &mut String) {
    for ch in text.chars() {
        if PROSE_SPECIALS.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(raw: &str) -> FormattedOutput {
        LatexFormatter.format(raw)
    }

    #[test]
    fn escapes_prose_specials() {
        let out = format("50% & #1");
        assert_eq!(out.content, "50\\% \\& \\#1");
        assert!(out.preamble.is_empty());
    }

    #[test]
    fn escapes_underscores_and_braces() {
        assert_eq!(format("a_b {c}").content, "a\\_b \\{c\\}");
    }

    #[test]
    fn inline_math_is_untouched() {
        let out = format("Pythagoras: $x^2+y^2=z^2$ holds 100%");
        assert!(out.content.contains("$x^2+y^2=z^2$"));
        assert!(out.content.ends_with("holds 100\\%"));
    }

    #[test]
    fn display_math_is_untouched() {
        let raw = "Sum: $$\\sum_{i=1}^n i = \\frac{n(n+1)}{2}$$ done";
        let out = format(raw);
        assert_eq!(
            out.content,
            "Sum: $$\\sum_{i=1}^n i = \\frac{n(n+1)}{2}$$ done"
        );
    }

    #[test]
    fn list_markers_inside_math_are_not_rewritten() {
        let raw = "see $\\item_{\\usepackage{x}}$ here";
        let out = format(raw);
        assert_eq!(out.content, raw);
        assert!(out.preamble.is_empty());
    }

    #[test]
    fn unmatched_dollar_is_escaped_prose() {
        assert_eq!(format("costs 5$ total").content, "costs 5\\$ total");
    }

    #[test]
    fn empty_inline_pair_counts_as_math() {
        // "$$a$": no closing "$$", so the first two dollars form an empty inline span
        assert_eq!(format("$$a$").content, "$$a\\$");
    }

    #[test]
    fn preamble_collects_declarations_in_order() {
        let out = format("\\usepackage{amsmath}Body\\usepackage{amssymb} more");
        assert_eq!(out.preamble, "\\usepackage{amsmath}\n\\usepackage{amssymb}");
        assert_eq!(out.content, "Body more");
    }

    #[test]
    fn empty_declaration_is_prose() {
        let out = format("\\usepackage{}");
        assert!(out.preamble.is_empty());
        assert_eq!(out.content, "\\usepackage\\{\\}");
    }

    #[test]
    fn enumerate_is_rebuilt() {
        let out = format("\\begin{enumerate}\\item One\\item Two\\end{enumerate}");
        assert_eq!(
            out.content,
            "\\begin{enumerate}\\item One\\item Two\\end{enumerate}"
        );
    }

    #[test]
    fn item_gets_separating_space() {
        assert_eq!(format("\\item1% off").content, "\\item 1\\% off");
        assert_eq!(format("\\itemsep").content, "\\itemsep");
    }

    #[test]
    fn unterminated_declaration_degrades_to_prefix() {
        let raw = "Intro 5% \\usepackage{amsmath";
        assert_eq!(
            LatexFormatter.try_format(raw),
            Err(StreamParseError::UnterminatedDeclaration { offset: 9 })
        );

        let out = format(raw);
        assert!(out.preamble.is_empty());
        assert_eq!(out.content, "Intro 5\\% ");
    }

    #[test]
    fn nested_brace_degrades_and_keeps_math() {
        let raw = "\\usepackage{a}$x_1$ then \\usepackage{b{c}}";
        let out = format(raw);
        assert!(out.preamble.is_empty());
        assert_eq!(out.content, "$x_1$ then ");
    }

    #[test]
    fn formatting_is_deterministic() {
        let raw = "\\usepackage{amsmath}Let $a$ & $$b$$ # \\item c";
        assert_eq!(format(raw), format(raw));
    }

    #[test]
    fn empty_input_formats_to_empty_output() {
        assert_eq!(format(""), FormattedOutput::default());
    }

    #[test]
    fn display_text_joins_preamble_and_content() {
        let out = FormattedOutput {
            preamble: "\\usepackage{amsmath}".into(),
            content: "x".into(),
        };
        assert_eq!(out.display_text(), "\\usepackage{amsmath}\nx");
    }

    #[test]
    fn split_reports_prose_offsets() {
        assert_eq!(
            split_math("ab $c$ d"),
            vec![
                Span::Prose {
                    text: "ab ",
                    offset: 0
                },
                Span::Math { text: "$c$" },
                Span::Prose {
                    text: " d",
                    offset: 6
                },
            ]
        );
    }
}
