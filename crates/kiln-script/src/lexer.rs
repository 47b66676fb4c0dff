//! Scanning of ES module source text using `nom`.
//!
//! Produces the closed [`ModuleItem`] sequence: import and re-export
//! statements, dynamic imports with a literal argument, and `className` /
//! `class` attributes with a literal value. Everything else is copied into
//! [`ModuleItem::Code`] verbatim, so printing the items reproduces the input.
//!
//! Strings, comments, template literals and regular expression literals are
//! skipped as opaque text so that keywords and braces inside them are never
//! mistaken for code. A `/` starts a regular expression only where an
//! expression may begin. Unterminated block comments, unterminated template
//! literals and unbalanced braces are parse errors. A quote glued to a word or
//! left open at the line break is an apostrophe in JSX text and is copied on
//! its own.

use kiln_common::ast::{ClassNameItem, ImportItem, ImportKind, ModuleItem};
use kiln_common::error::{KilnError, Result};
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_till, take_while, take_while1},
    character::complete::{char, multispace0, multispace1, satisfy},
    combinator::{not, opt, peek, recognize},
    sequence::terminated,
};

const fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$' || !c.is_ascii()
}

const fn is_ident_continue(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

/// Keywords after which a `/` starts a regular expression.
const REGEX_KEYWORDS: &[&str] = &[
    "await", "case", "delete", "do", "else", "in", "instanceof", "new", "of", "return", "throw", "typeof", "void",
    "yield",
];

/// Parses an identifier.
fn identifier(input: &str) -> IResult<&str, &str> {
    recognize((take_while1(is_ident_start), take_while(is_ident_continue))).parse(input)
}

/// Parses `word` when it is not followed by another identifier character.
fn keyword<'a>(word: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = nom::error::Error<&'a str>> {
    terminated(tag(word), not(peek(satisfy(is_ident_continue))))
}

/// Parses a single- or double-quoted specifier, returning the quote and the body.
fn quoted(input: &str) -> IResult<&str, (char, &str)> {
    let (input, quote) = alt((char('"'), char('\''))).parse(input)?;
    let (input, body) = take_till(|c: char| c == quote || c == '\n' || c == '\\')(input)?;
    let (input, _) = char(quote)(input)?;
    Ok((input, (quote, body)))
}

/// Parses the binding list of an import or re-export, up to and including `from`.
///
/// Accepts identifiers, braces, commas, `*` and whitespace. Fails on anything
/// else, which leaves the statement to be copied as plain code.
fn binding_clause(input: &str) -> IResult<&str, &str> {
    let mut rest = input;
    let mut tokens = 0usize;
    loop {
        let (r, _) = multispace0(rest)?;
        if tokens > 0 {
            if let Ok((after, _)) = (keyword("from"), multispace0).parse(r) {
                if peek(quoted).parse(after).is_ok() {
                    let consumed = input.len() - after.len();
                    return Ok((after, &input[..consumed]));
                }
            }
        }
        let (r, _) = alt((identifier, tag("{"), tag("}"), tag(","), tag("*"))).parse(r)?;
        tokens += 1;
        rest = r;
    }
}

/// Parses what follows the `import` keyword, returning the kind and the prefix
/// tail (text between the keyword and the opening quote).
fn import_tail(input: &str) -> IResult<&str, (ImportKind, &str)> {
    let side_effect = recognize(multispace0).map(|p| (ImportKind::SideEffect, p));
    let dynamic = recognize((multispace0, char('('), multispace0)).map(|p| (ImportKind::Dynamic, p));
    let static_import = alt((
        recognize((multispace1, binding_clause)),
        recognize((multispace0, peek(char('{')), binding_clause)),
        recognize((multispace0, peek(char('*')), binding_clause)),
    ))
    .map(|p| (ImportKind::Static, p));

    let (rest, (kind, prefix)) = alt((static_import, dynamic, side_effect)).parse(input)?;
    let _ = peek(quoted).parse(rest)?;
    Ok((rest, (kind, prefix)))
}

/// Parses what follows the `export` keyword for a re-export statement.
fn reexport_tail(input: &str) -> IResult<&str, &str> {
    let (after_ws, _) = multispace0(input)?;
    let _ = peek(alt((tag("*"), tag("{"), keyword("type")))).parse(after_ws)?;
    let (rest, _) = (multispace0, binding_clause).parse(input)?;
    Ok((rest, &input[..input.len() - rest.len()]))
}

/// Parses what follows a `className` / `class` identifier up to the opening quote.
fn class_attr_tail(input: &str) -> IResult<&str, &str> {
    let (rest, prefix) = recognize((
        multispace0,
        alt((char('='), char(':'))),
        multispace0,
        opt((char('{'), multispace0)),
    ))
    .parse(input)?;
    let _ = peek(alt((char('"'), char('\''), char('`')))).parse(rest)?;
    Ok((rest, prefix))
}

/// Byte length of a quoted string starting at `s[0]`, or of the rest of the
/// line when it is unterminated.
fn string_len(s: &str, quote: char) -> usize {
    let mut chars = s.char_indices().skip(1);
    while let Some((idx, c)) = chars.next() {
        match c {
            '\\' => {
                let _ = chars.next();
            }
            '\n' => return idx,
            c if c == quote => return idx + 1,
            _ => {}
        }
    }
    s.len()
}

/// Returns `true` if a `/` after `before` starts a regular expression
/// rather than a division.
fn regex_allowed(before: &str) -> bool {
    let before = before.trim_end();
    if before.ends_with("=>") {
        return true;
    }
    let Some(last) = before.chars().next_back() else {
        return true;
    };
    if is_ident_continue(last) {
        let start = before
            .char_indices()
            .rev()
            .take_while(|&(_, c)| is_ident_continue(c))
            .last()
            .map_or(0, |(idx, _)| idx);
        return REGEX_KEYWORDS.contains(&&before[start..]) && !before[..start].ends_with('.');
    }
    matches!(
        last,
        '(' | ',' | '=' | ':' | '[' | '!' | '&' | '|' | '?' | '{' | '}' | ';' | '+' | '-' | '*' | '%' | '~' | '^'
    )
}

/// Byte length of a regular expression literal starting at `s[0]` (a slash),
/// flags included. `None` if the line ends first.
fn regex_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    // `/>` closes a JSX element.
    if matches!(bytes.get(1), None | Some(b'>' | b'\n' | b'\r')) {
        return None;
    }
    let mut in_class = false;
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' | b'\r' => return None,
            b'[' => {
                in_class = true;
                i += 1;
            }
            b']' => {
                in_class = false;
                i += 1;
            }
            b'/' if !in_class => {
                let flags = s[i + 1..].bytes().take_while(u8::is_ascii_alphabetic).count();
                return Some(i + 1 + flags);
            }
            _ => i += 1,
        }
    }
    None
}

/// Byte length of a template literal starting at `s[0]` (a backtick),
/// including nested `${ ... }` expressions. `None` if unterminated.
fn template_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'`' => return Some(i + 1),
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                i += 2 + expression_len(&s[i + 2..])?;
            }
            _ => i += 1,
        }
    }
    None
}

/// Byte length of a template expression body up to and including its `}`.
fn expression_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' if depth == 0 => return Some(i + 1),
            b'}' => {
                depth -= 1;
                i += 1;
            }
            b'"' | b'\'' => i += string_len(&s[i..], bytes[i] as char),
            b'`' => i += template_len(&s[i..])?,
            _ => i += 1,
        }
    }
    None
}

/// Converts a byte offset into a 1-based `line:column` label.
fn position(source: &str, offset: usize) -> String {
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
    format!("{line}:{column}")
}

/// Accumulates items, merging adjacent code runs.
struct ItemSink {
    items: Vec<ModuleItem>,
    code: String,
}

impl ItemSink {
    const fn new() -> Self {
        Self {
            items: Vec::new(),
            code: String::new(),
        }
    }

    fn code(&mut self, text: &str) {
        self.code.push_str(text);
    }

    fn item(&mut self, item: ModuleItem) {
        self.flush();
        self.items.push(item);
    }

    fn flush(&mut self) {
        if !self.code.is_empty() {
            self.items.push(ModuleItem::Code(std::mem::take(&mut self.code)));
        }
    }

    fn finish(mut self) -> Vec<ModuleItem> {
        self.flush();
        self.items
    }
}

/// Scans `source` into module items.
///
/// # Errors
///
/// Returns [`KilnError::Parse`] for unterminated comments or template
/// literals and for unbalanced braces.
pub fn tokenize(filename: &str, source: &str) -> Result<Vec<ModuleItem>> {
    let parse_err = |offset: usize, what: &str| KilnError::Parse {
        filename: filename.to_owned(),
        message: format!("{}: {what}", position(source, offset)),
    };

    let mut sink = ItemSink::new();
    let mut braces: Vec<usize> = Vec::new();
    let mut pos = 0;

    while pos < source.len() {
        let rest = &source[pos..];
        let Some(c) = rest.chars().next() else {
            break;
        };

        if rest.starts_with("//") {
            let len = rest.find('\n').unwrap_or(rest.len());
            sink.code(&rest[..len]);
            pos += len;
            continue;
        }
        if rest.starts_with("/*") {
            let len = rest[2..]
                .find("*/")
                .map(|end| end + 4)
                .ok_or_else(|| parse_err(pos, "unterminated block comment"))?;
            sink.code(&rest[..len]);
            pos += len;
            continue;
        }

        if c == '/' && regex_allowed(&source[..pos]) {
            if let Some(len) = regex_len(rest) {
                sink.code(&rest[..len]);
                pos += len;
                continue;
            }
        }

        match c {
            '"' | '\'' => {
                let len = string_len(rest, c);
                let glued = source[..pos].chars().next_back().is_some_and(is_ident_continue);
                let len = if glued || len < 2 || !rest[..len].ends_with(c) {
                    1
                } else {
                    len
                };
                sink.code(&rest[..len]);
                pos += len;
            }
            '`' => {
                let len = template_len(rest).ok_or_else(|| parse_err(pos, "unterminated template literal"))?;
                sink.code(&rest[..len]);
                pos += len;
            }
            '{' => {
                braces.push(pos);
                sink.code("{");
                pos += 1;
            }
            '}' => {
                if braces.pop().is_none() {
                    return Err(parse_err(pos, "unexpected `}`"));
                }
                sink.code("}");
                pos += 1;
            }
            c if is_ident_start(c) => {
                let (after, word) = identifier(rest).map_err(|_| parse_err(pos, "invalid identifier"))?;
                let member_access = source[..pos].ends_with('.');
                let scanned = if member_access {
                    None
                } else {
                    scan_statement(word, after, &mut sink)
                };
                match scanned {
                    Some(Scanned { len, opens_brace }) => {
                        if opens_brace {
                            braces.push(pos);
                        }
                        pos += word.len() + len;
                    }
                    None => {
                        sink.code(word);
                        pos += word.len();
                    }
                }
            }
            _ => {
                sink.code(&rest[..c.len_utf8()]);
                pos += c.len_utf8();
            }
        }
    }

    if let Some(&open) = braces.last() {
        return Err(parse_err(open, "unclosed `{`"));
    }

    Ok(sink.finish())
}

/// A statement recognised after an identifier.
struct Scanned {
    /// Bytes consumed after the identifier.
    len: usize,
    /// Whether the consumed text opened a brace closed later in plain code.
    opens_brace: bool,
}

/// Tries to read an import, re-export or class attribute starting with `word`.
///
/// Returns `None` if the identifier starts ordinary code.
fn scan_statement(word: &str, after: &str, sink: &mut ItemSink) -> Option<Scanned> {
    match word {
        "import" => {
            let (rest, (kind, tail)) = import_tail(after).ok()?;
            let (rest, (quote, specifier)) = quoted(rest).ok()?;
            sink.item(ModuleItem::Import(ImportItem {
                kind,
                prefix: format!("{word}{tail}"),
                quote,
                specifier: specifier.to_owned(),
            }));
            Some(Scanned {
                len: after.len() - rest.len(),
                opens_brace: false,
            })
        }
        "export" => {
            let (rest, tail) = reexport_tail(after).ok()?;
            let (rest, (quote, specifier)) = quoted(rest).ok()?;
            sink.item(ModuleItem::Import(ImportItem {
                kind: ImportKind::ReExport,
                prefix: format!("{word}{tail}"),
                quote,
                specifier: specifier.to_owned(),
            }));
            Some(Scanned {
                len: after.len() - rest.len(),
                opens_brace: false,
            })
        }
        "className" | "class" => {
            let (rest, tail) = class_attr_tail(after).ok()?;
            let quote = rest.chars().next()?;
            let len = if quote == '`' {
                template_len(rest)?
            } else {
                let len = string_len(rest, quote);
                if !rest[..len].ends_with(quote) || len < 2 {
                    return None;
                }
                len
            };
            sink.item(ModuleItem::ClassName(ClassNameItem {
                prefix: format!("{word}{tail}"),
                quote,
                value: rest[1..len - 1].to_owned(),
            }));
            Some(Scanned {
                len: after.len() - rest.len() + len,
                opens_brace: tail.contains('{'),
            })
        }
        _ => None,
    }
}
