//! Recursive-descent parser for the binding configuration DSL.
//!
//! ```text
//! bindings := (binding)*
//! binding  := expr "<=" command_text NEWLINE
//! expr     := or
//! or       := xor ("|" xor)*
//! xor      := and ("^" and)*
//! and      := primary ("&" primary)*
//! primary  := "!" primary | postfix
//! postfix  := atom duration?
//! atom     := "(" expr ")" | event
//! event    := NAME (":" cmp? INTEGER)?
//! cmp      := "eq" | "ne" | "lt" | "gt" | "le" | "ge"
//! duration := "[" UINT ("s" | "ms")? "]"
//! NAME     := [A-Za-z0-9_]+
//! ```
//!
//! `|`, `^`, `&` are left-associative; precedence low-to-high is OR, XOR,
//! AND, NOT, postfix/atom. Grammar composition is ordinary recursive
//! functions over a byte cursor — no function-pointer table, no trait
//! objects; there's nothing here that needs dynamic dispatch.

use rx_codes::lookup as lookup_code;
use rx_expr::{Comparator, Dur, Expr, Match};

/// One parsed DSL line: a predicate and the shell command it gates.
/// `Dur` node ids are left at their placeholder value (`0`); the context
/// assigns real ids during indexing.
#[derive(Debug, Clone)]
pub struct ParsedBinding {
    pub expr: Expr,
    pub command: String,
}

/// A parse failure, with enough position information to point a user at the
/// offending line without needing to re-scan the file themselves.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{source_label}:{line}:{col}: {message}")]
pub struct ParseError {
    pub source_label: String,
    pub line: usize,
    pub col: usize,
    pub message: String,
}

type PResult<T> = Result<T, String>;

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Skip whitespace and `# ...` line comments, which are interchangeable
    /// wherever whitespace is legal.
    fn skip_ws_and_comments(&mut self) {
        loop {
            let before = self.pos;
            while let Some(c) = self.peek() {
                if c.is_whitespace() {
                    self.bump();
                } else {
                    break;
                }
            }
            if self.peek() == Some('#') {
                while let Some(c) = self.peek() {
                    self.bump();
                    if c == '\n' {
                        break;
                    }
                }
            }
            if self.pos == before {
                break;
            }
        }
    }

    /// Consume exactly `lit` if present, then skip trailing whitespace and
    /// comments. Returns whether it matched.
    fn consume_literal(&mut self, lit: &str) -> bool {
        if self.rest().starts_with(lit) {
            self.pos += lit.len();
            self.skip_ws_and_comments();
            true
        } else {
            false
        }
    }

    fn parse_name(&mut self) -> Option<&'a str> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        if self.pos == start {
            None
        } else {
            Some(&self.text[start..self.pos])
        }
    }

    /// A signed integer literal: optional `-`, then `0x`-hex or decimal.
    /// Leading whitespace is skipped first (mirrors `strtoul`'s behavior,
    /// which is why `KEY_A:eq 1` may have a space before the value).
    fn parse_integer(&mut self) -> PResult<i32> {
        self.skip_ws_and_comments();
        let negative = self.peek() == Some('-');
        if negative {
            self.bump();
        }
        let start = self.pos;
        let radix = if self.rest().starts_with("0x") || self.rest().starts_with("0X") {
            self.pos += 2;
            16
        } else {
            10
        };
        let digits_start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_digit(radix) {
                self.bump();
            } else {
                break;
            }
        }
        if self.pos == digits_start {
            return Err("expected an integer value".to_string());
        }
        let digits = &self.text[digits_start..self.pos];
        let magnitude = i64::from_str_radix(digits, radix)
            .map_err(|_| format!("integer literal out of range: {}", &self.text[start..self.pos]))?;
        let value = if negative { -magnitude } else { magnitude };
        self.skip_ws_and_comments();
        Ok(value as i32)
    }

    fn parse_uint(&mut self) -> PResult<u64> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.bump();
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err("expected an unsigned integer".to_string());
        }
        self.text[start..self.pos]
            .parse()
            .map_err(|_| "duration value out of range".to_string())
    }
}

fn parse_comparator(cur: &mut Cursor) -> Comparator {
    const KEYWORDS: &[(&str, Comparator)] = &[
        ("eq", Comparator::Eq),
        ("ne", Comparator::Ne),
        ("lt", Comparator::Lt),
        ("gt", Comparator::Gt),
        ("le", Comparator::Le),
        ("ge", Comparator::Ge),
    ];
    for (kw, cmp) in KEYWORDS {
        if cur.rest().starts_with(kw) {
            cur.pos += kw.len();
            return *cmp;
        }
    }
    Comparator::Eq
}

/// `event := NAME (":" cmp? INTEGER)?`. A bare `KEY_A` means `KEY_A:eq 1`;
/// `KEY_A:0` means `KEY_A:eq 0` (no comparator keyword defaults to `eq`).
fn parse_event(cur: &mut Cursor) -> PResult<Expr> {
    let start = cur.pos;
    let name = cur.parse_name().ok_or_else(|| "expected an event name".to_string())?;
    let entry = lookup_code(name).ok_or_else(|| format!("unknown event name '{}'", name))?;
    cur.skip_ws_and_comments();

    let (cmp, value) = if cur.consume_literal(":") {
        let cmp = parse_comparator(cur);
        let value = cur.parse_integer()?;
        (cmp, value)
    } else {
        (Comparator::Eq, 1)
    };

    let _ = start;
    Ok(Expr::Primary(Match::unresolved(entry.typecode(), cmp, value)))
}

/// `duration := "[" UINT ("s" | "ms")? "]"`. Returns the duration in
/// milliseconds, or `None` if no bracket was present at all. Once the
/// opening bracket is seen, the qualifier must be well-formed: unlike the
/// reference implementation, a missing unsigned value or closing bracket is
/// a hard parse error rather than being silently treated as "no duration".
fn parse_duration(cur: &mut Cursor) -> PResult<Option<u64>> {
    if !cur.consume_literal("[") {
        return Ok(None);
    }

    let mut ms = cur.parse_uint()?;
    if cur.rest().starts_with("ms") {
        cur.pos += 2;
    } else if cur.rest().starts_with('s') {
        cur.pos += 1;
        ms *= 1000;
    }
    cur.skip_ws_and_comments();

    if !cur.consume_literal("]") {
        return Err("unterminated duration qualifier, expected ']'".to_string());
    }

    Ok(Some(ms))
}

fn parse_group(cur: &mut Cursor) -> PResult<Expr> {
    if !cur.consume_literal("(") {
        return Err("expected '('".to_string());
    }
    let e = parse_or(cur)?;
    if !cur.consume_literal(")") {
        return Err("unmatched '(', expected ')'".to_string());
    }
    Ok(e)
}

/// `atom := "(" expr ")" | event`
fn parse_atom(cur: &mut Cursor) -> PResult<Expr> {
    if cur.peek() == Some('(') {
        parse_group(cur)
    } else {
        parse_event(cur)
    }
}

/// `postfix := atom duration?`
fn parse_postfix(cur: &mut Cursor) -> PResult<Expr> {
    let atom = parse_atom(cur)?;
    match parse_duration(cur)? {
        Some(ms) if ms > 0 => Ok(Expr::Dur(Dur {
            duration_ms: ms,
            child: Box::new(atom),
            id: 0,
        })),
        _ => Ok(atom),
    }
}

/// `primary := "!" primary | postfix`
fn parse_primary(cur: &mut Cursor) -> PResult<Expr> {
    if cur.consume_literal("!") {
        let inner = parse_primary(cur)?;
        Ok(Expr::Not(Box::new(inner)))
    } else {
        parse_postfix(cur)
    }
}

/// `and := primary ("&" primary)*`
fn parse_and(cur: &mut Cursor) -> PResult<Expr> {
    let mut lhs = parse_primary(cur)?;
    while cur.consume_literal("&") {
        let rhs = parse_primary(cur)?;
        lhs = Expr::And(Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

/// `xor := and ("^" and)*`
fn parse_xor(cur: &mut Cursor) -> PResult<Expr> {
    let mut lhs = parse_and(cur)?;
    while cur.consume_literal("^") {
        let rhs = parse_and(cur)?;
        lhs = Expr::Xor(Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

/// `or := xor ("|" xor)*`
fn parse_or(cur: &mut Cursor) -> PResult<Expr> {
    let mut lhs = parse_xor(cur)?;
    while cur.consume_literal("|") {
        let rhs = parse_xor(cur)?;
        lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_binding(cur: &mut Cursor) -> PResult<ParsedBinding> {
    let expr = parse_or(cur)?;
    if !cur.consume_literal("<=") {
        return Err("expected '<=' after expression".to_string());
    }
    let start = cur.pos;
    while let Some(c) = cur.peek() {
        if c == '\n' {
            break;
        }
        cur.bump();
    }
    let command = cur.text[start..cur.pos].to_string();
    if cur.peek() == Some('\n') {
        cur.bump();
    }
    cur.skip_ws_and_comments();
    Ok(ParsedBinding { expr, command })
}

fn line_col(text: &str, byte_pos: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for c in text[..byte_pos.min(text.len())].chars() {
        if c == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// Parse one config source (a file's contents, or an inline `-e` string) into
/// a list of bindings. `source_label` is carried into error messages only
/// (e.g. a file path, or `"<inline>"`). Parsing is all-or-nothing: any
/// syntax error anywhere in the source discards everything parsed from it.
pub fn parse(source_label: &str, text: &str) -> Result<Vec<ParsedBinding>, ParseError> {
    let mut cur = Cursor::new(text);
    cur.skip_ws_and_comments();

    let mut bindings = Vec::new();
    while !cur.eof() {
        let start = cur.pos;
        match parse_binding(&mut cur) {
            Ok(b) => bindings.push(b),
            Err(message) => {
                let (line, col) = line_col(text, start);
                return Err(ParseError {
                    source_label: source_label.to_string(),
                    line,
                    col,
                    message,
                });
            }
        }
    }
    Ok(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rx_expr::MatchSource;

    fn typecode_of(e: &Expr) -> u32 {
        match e {
            Expr::Primary(m) => match m.source {
                MatchSource::Unresolved(tc) => tc,
                MatchSource::Resolved(_) => panic!("unexpected resolved match from parser"),
            },
            _ => panic!("expected a leaf"),
        }
    }

    #[test]
    fn bare_event_is_sugar_for_eq_1() {
        let bindings = parse("<inline>", "KEY_A <= echo a\n").unwrap();
        assert_eq!(bindings.len(), 1);
        let Expr::Primary(m) = &bindings[0].expr else {
            panic!("expected leaf")
        };
        assert_eq!(m.cmp, Comparator::Eq);
        assert_eq!(m.value, 1);
        assert_eq!(bindings[0].command, "echo a");
    }

    #[test]
    fn bare_integer_after_colon_defaults_to_eq() {
        let bindings = parse("<inline>", "KEY_A:0 <= echo a\n").unwrap();
        let Expr::Primary(m) = &bindings[0].expr else {
            panic!("expected leaf")
        };
        assert_eq!(m.cmp, Comparator::Eq);
        assert_eq!(m.value, 0);
    }

    #[test]
    fn explicit_comparator_keyword() {
        let bindings = parse("<inline>", "ABS_X:gt 100 <= echo big\n").unwrap();
        let Expr::Primary(m) = &bindings[0].expr else {
            panic!("expected leaf")
        };
        assert_eq!(m.cmp, Comparator::Gt);
        assert_eq!(m.value, 100);
    }

    #[test]
    fn operator_precedence_and_associativity() {
        // OR lowest, AND highest: `a & b | c ^ d` == (a&b) | (c^d)
        let bindings = parse(
            "<inline>",
            "KEY_A & KEY_B | KEY_C ^ KEY_D <= echo x\n",
        )
        .unwrap();
        match &bindings[0].expr {
            Expr::Or(l, r) => {
                assert!(matches!(l.as_ref(), Expr::And(_, _)));
                assert!(matches!(r.as_ref(), Expr::Xor(_, _)));
            }
            other => panic!("expected top-level OR, got {other:?}"),
        }
    }

    #[test]
    fn negation_binds_tighter_than_and() {
        let bindings = parse("<inline>", "!KEY_A & KEY_B <= echo x\n").unwrap();
        match &bindings[0].expr {
            Expr::And(l, r) => {
                assert!(matches!(l.as_ref(), Expr::Not(_)));
                assert!(matches!(r.as_ref(), Expr::Primary(_)));
            }
            other => panic!("expected AND at top level, got {other:?}"),
        }
    }

    #[test]
    fn grouping_overrides_precedence() {
        let bindings = parse("<inline>", "(KEY_A | KEY_B) & KEY_C <= echo x\n").unwrap();
        assert!(matches!(bindings[0].expr, Expr::And(_, _)));
    }

    #[test]
    fn duration_qualifier_milliseconds_default() {
        let bindings = parse("<inline>", "KEY_P [500] <= echo held\n").unwrap();
        match &bindings[0].expr {
            Expr::Dur(d) => assert_eq!(d.duration_ms, 500),
            other => panic!("expected Dur node, got {other:?}"),
        }
    }

    #[test]
    fn duration_qualifier_seconds_suffix_multiplies() {
        let bindings = parse("<inline>", "SW_LID:eq 1 [2s] <= systemctl suspend\n").unwrap();
        match &bindings[0].expr {
            Expr::Dur(d) => assert_eq!(d.duration_ms, 2000),
            other => panic!("expected Dur node, got {other:?}"),
        }
    }

    #[test]
    fn zero_duration_is_equivalent_to_omitted() {
        let bindings = parse("<inline>", "KEY_A [0] <= echo a\n").unwrap();
        assert!(matches!(bindings[0].expr, Expr::Primary(_)));
        let bindings2 = parse("<inline>", "KEY_A [0ms] <= echo a\n").unwrap();
        assert!(matches!(bindings2[0].expr, Expr::Primary(_)));
    }

    #[test]
    fn command_text_is_stored_verbatim_including_trailing_whitespace() {
        let bindings = parse("<inline>", "KEY_A <= echo -n \"x\" \n").unwrap();
        assert_eq!(bindings[0].command, "echo -n \"x\" ");
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let text = "\n# a comment\n\nKEY_A <= echo a # trailing comment is NOT part of command\n";
        // NOTE: per the grammar, comments are only elided between tokens; once the
        // command text begins (after `<=`) everything to end-of-line is literal.
        let bindings = parse("<inline>", text).unwrap();
        assert_eq!(bindings.len(), 1);
        assert!(bindings[0].command.contains('#'));
    }

    #[test]
    fn multiple_bindings_in_order() {
        let text = "KEY_MUTE <= amixer set Master toggle\nKEY_VOLUMEUP <= amixer set Master 5%+\n";
        let bindings = parse("<inline>", text).unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].command, "amixer set Master toggle");
        assert_eq!(bindings[1].command, "amixer set Master 5%+");
    }

    #[test]
    fn unknown_event_name_fails_the_whole_parse() {
        let err = parse("cfg.cfg", "KEY_DOES_NOT_EXIST <= echo a\n").unwrap_err();
        assert_eq!(err.source_label, "cfg.cfg");
        assert!(err.message.contains("unknown event name"));
    }

    #[test]
    fn missing_arrow_fails_parse() {
        let err = parse("<inline>", "KEY_A echo a\n").unwrap_err();
        assert!(err.message.contains("<="));
    }

    #[test]
    fn unmatched_paren_fails_parse() {
        let err = parse("<inline>", "(KEY_A & KEY_B <= echo x\n").unwrap_err();
        assert!(err.message.contains(')'));
    }

    #[test]
    fn malformed_duration_fails_parse() {
        let err = parse("<inline>", "KEY_A [500 <= echo x\n").unwrap_err();
        assert!(err.message.contains(']'));
    }

    #[test]
    fn combo_example_from_docs() {
        let text = "(KEY_LEFTCTRL & KEY_LEFTALT & KEY_DELETE) [500ms] <= reboot\n";
        let bindings = parse("<inline>", text).unwrap();
        assert_eq!(bindings.len(), 1);
        match &bindings[0].expr {
            Expr::Dur(d) => {
                assert_eq!(d.duration_ms, 500);
                assert!(matches!(d.child.as_ref(), Expr::And(_, _)));
            }
            other => panic!("expected Dur node, got {other:?}"),
        }
    }

    #[test]
    fn negated_switch_example_from_docs() {
        let bindings = parse("<inline>", "!SW_HEADPHONE_INSERT <= pulseaudio --kill\n").unwrap();
        assert!(matches!(bindings[0].expr, Expr::Not(_)));
        assert_eq!(bindings[0].command, "pulseaudio --kill");
    }

    #[test]
    fn no_bindings_is_not_an_error() {
        let bindings = parse("<inline>", "   \n# just a comment\n\n").unwrap();
        assert!(bindings.is_empty());
    }

    #[test]
    fn typecode_preserved_through_parse() {
        let entry = lookup_code("KEY_A").unwrap();
        let bindings = parse("<inline>", "KEY_A <= echo a\n").unwrap();
        assert_eq!(typecode_of(&bindings[0].expr), entry.typecode());
    }
}
