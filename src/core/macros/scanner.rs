// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tokenizer for `%{...}` macro references.
//!
//! Escape forms are `\%`, `\{`, `\}`, `\\`, `\n` and `\t`. The scanner
//! recognizes them so an escaped marker never opens a token, but leaves them
//! in the text; [`unescape`] turns them into their literal characters once
//! every expansion pass is done.

pub const MARKER: &str = "%{";
const ESCAPE: u8 = b'\\';

/// One piece of scanned input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Literal text, escapes untouched
    Text(&'a str),
    /// A balanced `%{token}`; `raw` includes the markers
    Macro { token: &'a str, raw: &'a str },
    /// An open marker without a matching close; `raw` is the marker itself
    Unterminated { raw: &'a str },
}

/// Iterator over the segments of a parameter value.
///
/// After an [`Segment::Unterminated`] the scan resumes right after the open
/// marker.
pub struct MacroScanner<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> MacroScanner<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn is_escapable(b: u8) -> bool {
        matches!(b, b'%' | b'{' | b'}' | b'\\' | b'n' | b't')
    }

    /// Byte offset of the next unescaped open marker at or after `from`.
    fn find_marker(&self, from: usize) -> Option<usize> {
        let bytes = self.text.as_bytes();
        let mut i = from;
        while i < bytes.len() {
            match bytes[i] {
                ESCAPE if i + 1 < bytes.len() && Self::is_escapable(bytes[i + 1]) => i += 2,
                b'%' if bytes.get(i + 1) == Some(&b'{') => return Some(i),
                _ => i += 1,
            }
        }
        None
    }

    /// Byte offset of the close brace balancing the marker at `open`.
    fn find_close(&self, open: usize) -> Option<usize> {
        let bytes = self.text.as_bytes();
        let mut depth = 1usize;
        let mut i = open + MARKER.len();
        while i < bytes.len() {
            match bytes[i] {
                ESCAPE if i + 1 < bytes.len() && Self::is_escapable(bytes[i + 1]) => {
                    i += 2;
                    continue;
                }
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
            i += 1;
        }
        None
    }
}

impl<'a> Iterator for MacroScanner<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.text.len() {
            return None;
        }
        let open = match self.find_marker(self.pos) {
            Some(open) => open,
            None => {
                let rest = &self.text[self.pos..];
                self.pos = self.text.len();
                return Some(Segment::Text(rest));
            }
        };
        if open > self.pos {
            let text = &self.text[self.pos..open];
            self.pos = open;
            return Some(Segment::Text(text));
        }
        match self.find_close(open) {
            Some(close) => {
                self.pos = close + 1;
                Some(Segment::Macro {
                    token: &self.text[open + MARKER.len()..close],
                    raw: &self.text[open..=close],
                })
            }
            None => {
                self.pos = open + MARKER.len();
                Some(Segment::Unterminated {
                    raw: &self.text[open..self.pos],
                })
            }
        }
    }
}

/// Replace escape forms with the characters they stand for.
pub fn unescape(text: &str) -> String {
    if !text.contains('\\') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some(&next) if matches!(next, '%' | '{' | '}' | '\\') => {
                out.push(next);
                chars.next();
            }
            Some('n') => {
                out.push('\n');
                chars.next();
            }
            Some('t') => {
                out.push('\t');
                chars.next();
            }
            _ => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments(text: &str) -> Vec<Segment<'_>> {
        MacroScanner::new(text).collect()
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(segments("no macros"), vec![Segment::Text("no macros")]);
        assert!(segments("").is_empty());
    }

    #[test]
    fn test_tokens_between_text() {
        assert_eq!(
            segments("a%{x}b%{y}"),
            vec![
                Segment::Text("a"),
                Segment::Macro { token: "x", raw: "%{x}" },
                Segment::Text("b"),
                Segment::Macro { token: "y", raw: "%{y}" },
            ]
        );
    }

    #[test]
    fn test_balanced_braces() {
        assert_eq!(
            segments("%{a{b}c}!"),
            vec![
                Segment::Macro { token: "a{b}c", raw: "%{a{b}c}" },
                Segment::Text("!"),
            ]
        );
    }

    #[test]
    fn test_unterminated_resumes_after_marker() {
        assert_eq!(
            segments("x%{abc"),
            vec![
                Segment::Text("x"),
                Segment::Unterminated { raw: "%{" },
                Segment::Text("abc"),
            ]
        );
    }

    #[test]
    fn test_escaped_marker_is_text() {
        assert_eq!(segments(r"cost \%{x}"), vec![Segment::Text(r"cost \%{x}")]);
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"a\%b\{c\}d\\e\nf\tg\q"), "a%b{c}d\\e\nf\tg\\q");
        assert_eq!(unescape("plain"), "plain");
        assert_eq!(unescape("trailing\\"), "trailing\\");
    }

    #[test]
    fn test_multibyte_text_survives() {
        assert_eq!(
            segments("grüße %{n} ü"),
            vec![
                Segment::Text("grüße "),
                Segment::Macro { token: "n", raw: "%{n}" },
                Segment::Text(" ü"),
            ]
        );
    }
}
