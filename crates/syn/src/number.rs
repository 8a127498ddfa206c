use logos::Logos;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum NumberLit {
    #[regex(r"[+-]?[0-9]+")]
    Decimal,

    #[regex(r"[+-]?0[xX][0-9a-fA-F]+")]
    Hex,

    #[regex(r"[+-]?0[bB][01]+")]
    Binary,

    #[regex(r"[+-]?[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?")]
    #[regex(r"[+-]?[0-9]+[eE][+-]?[0-9]+")]
    Float,

    #[error]
    Error,
}

/// A number literal, either integral or floating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
}

/// Returns `(negative, digits)` with the sign and the 2-character radix
/// prefix removed.
fn split_prefixed(text: &str) -> (bool, &str) {
    let (negative, rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    (negative, rest.get(2..).unwrap_or_default())
}

fn parse_radix(text: &str, radix: u32) -> Option<i64> {
    let (negative, digits) = split_prefixed(text);
    // Parse with the sign attached so that i64::MIN is accepted.
    let signed = if negative {
        format!("-{}", digits)
    } else {
        digits.to_owned()
    };
    i64::from_str_radix(&signed, radix).ok()
}

/// Parse a whole atom as a number. Returns `None` unless all of `text` is one
/// well-formed literal that fits its type.
pub fn parse_number(text: &str) -> Option<Literal> {
    let mut lexer = NumberLit::lexer(text);
    let kind = lexer.next()?;
    if lexer.span() != (0..text.len()) {
        return None;
    }

    match kind {
        NumberLit::Decimal => text.parse().ok().map(Literal::Int),
        NumberLit::Hex => parse_radix(text, 16).map(Literal::Int),
        NumberLit::Binary => parse_radix(text, 2).map(Literal::Int),
        NumberLit::Float => text.parse().ok().map(Literal::Float),
        NumberLit::Error => None,
    }
}
