//! Permissive scanning of compiled CSS.
//!
//! The scanner never fails: unterminated comments, strings and blocks run
//! to the end of the input, the way a browser recovers them. It only looks
//! for `@property` at-rules and tracks enough lexical state to skip
//! comments and strings.

use std::ops::Range;

use nom::{
    IResult, Parser,
    bytes::complete::{tag_no_case, take_till},
    character::complete::multispace1,
    sequence::preceded,
};

/// One `@property` at-rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyBlock {
    /// Name as written after `@property`.
    pub name: String,
    /// `syntax` descriptor with quotes stripped.
    pub syntax: String,
    /// `true` only for the literal `inherits: true`.
    pub inherits: bool,
    /// Raw `initial-value` descriptor.
    pub initial_value: String,
    /// Byte range of the rule, including trailing whitespace up to the line break.
    pub span: Range<usize>,
}

/// Parses the at-rule keyword and returns the prelude up to the block.
fn at_property(input: &str) -> IResult<&str, &str> {
    preceded(
        (tag_no_case("@property"), multispace1),
        take_till(|c: char| c == '{' || c == ';' || c == '}'),
    )
    .parse(input)
}

/// Byte length of a comment starting at `s[0..2] == "/*"`.
fn comment_len(s: &str) -> usize {
    s[2..].find("*/").map_or(s.len(), |end| end + 4)
}

/// Byte length of a string starting at `s[0]`.
fn string_len(s: &str, quote: u8) -> usize {
    let bytes = s.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return i,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    s.len()
}

/// Byte length of a block starting at `s[0] == '{'`, up to and including the
/// matching `}`, or the rest of the input.
fn block_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => i += comment_len(&s[i..]),
            b'"' | b'\'' => i += string_len(&s[i..], bytes[i]),
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' => {
                depth = depth.saturating_sub(1);
                i += 1;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    s.len()
}

/// Removes comments from a block body.
fn strip_comments(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        rest = &rest[start + comment_len(&rest[start..])..];
    }
    out.push_str(rest);
    out
}

fn parse_block(name: &str, body: &str, span: Range<usize>) -> PropertyBlock {
    let mut block = PropertyBlock {
        name: name.to_owned(),
        syntax: String::new(),
        inherits: false,
        initial_value: String::new(),
        span,
    };
    for declaration in strip_comments(body).split(';') {
        let Some((prop, value)) = declaration.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match prop.trim().to_ascii_lowercase().as_str() {
            "syntax" => block.syntax = value.chars().filter(|c| *c != '"' && *c != '\'').collect(),
            "inherits" => block.inherits = value == "true",
            "initial-value" => block.initial_value = value.to_owned(),
            _ => {}
        }
    }
    block
}

/// Returns every `@property` rule of `css` in source order.
#[must_use]
pub fn scan_properties(css: &str) -> Vec<PropertyBlock> {
    let bytes = css.as_bytes();
    let mut blocks = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => i += comment_len(&css[i..]),
            b'"' | b'\'' => i += string_len(&css[i..], bytes[i]),
            b'@' => {
                let Ok((after, prelude)) = at_property(&css[i..]) else {
                    i += 1;
                    continue;
                };
                let open = css.len() - after.len();
                if !after.starts_with('{') {
                    i = open;
                    continue;
                }
                let body_len = block_len(after);
                let body_end = open + body_len;
                let body = css[open + 1..body_end].strip_suffix('}').unwrap_or(&css[open + 1..body_end]);
                let trailing = css[body_end..]
                    .find(|c: char| c == '\n' || !c.is_whitespace())
                    .map_or(css.len() - body_end, |idx| {
                        idx + usize::from(css[body_end + idx..].starts_with('\n'))
                    });
                blocks.push(parse_block(prelude.trim(), body, i..body_end + trailing));
                i = body_end;
            }
            _ => i += 1,
        }
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_property_blocks() {
        let css = "@property --s1 {\n  syntax: '<length>';\n  inherits: false;\n  initial-value: 0px;\n}\n.a { width: var(--s1); }\n";
        let blocks = scan_properties(css);
        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(block.name, "--s1");
        assert_eq!(block.syntax, "<length>");
        assert!(!block.inherits);
        assert_eq!(block.initial_value, "0px");
        assert_eq!(&css[block.span.end..], ".a { width: var(--s1); }\n");
        assert!(css[block.span.clone()].starts_with("@property"));
    }

    #[test]
    fn inherits_requires_literal_true() {
        let blocks = scan_properties(
            "@property --a { inherits: true; }\n@property --b { inherits: TRUE; }\n@property --c { syntax: \"*\" }",
        );
        let inherits: Vec<bool> = blocks.iter().map(|b| b.inherits).collect();
        assert_eq!(inherits, vec![true, false, false]);
        assert_eq!(blocks[2].syntax, "*");
    }

    #[test]
    fn skips_comments_and_strings() {
        let css = "/* @property --x { } */\n.a::after { content: \"@property --y {}\"; }\n";
        assert!(scan_properties(css).is_empty());
    }

    #[test]
    fn recovers_unterminated_block() {
        let css = ".a { color: red; }\n@property --open {\n  syntax: '<color>';\n  initial-value: red";
        let blocks = scan_properties(css);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].initial_value, "red");
        assert_eq!(blocks[0].span.end, css.len());
    }

    #[test]
    fn nested_in_layers() {
        let css = "@layer base {\n  @property --tw-x { syntax: '*'; inherits: false; }\n}\n";
        let blocks = scan_properties(css);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].name, "--tw-x");
        assert!(css[blocks[0].span.end..].starts_with('}'));
    }

    #[test]
    fn comments_inside_body_are_ignored() {
        let blocks = scan_properties("@property --c { /* syntax: 'x'; */ initial-value: 1 }");
        assert_eq!(blocks[0].syntax, "");
        assert_eq!(blocks[0].initial_value, "1");
    }
}
