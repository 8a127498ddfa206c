//! Bracket balancing, checked before anything is read.

use crate::error::ParseErrorKind;

pub(crate) fn is_opening(c: char) -> bool {
    matches!(c, '(' | '[' | '{')
}

pub(crate) fn is_closing(c: char) -> bool {
    matches!(c, ')' | ']' | '}')
}

fn is_closing_of(open: char, close: char) -> bool {
    matches!((open, close), ('(', ')') | ('[', ']') | ('{', '}'))
}

/// Check that every bracket outside strings and comments is closed by its
/// matching bracket. Returns the error kind and the offending byte offset.
///
/// An unclosed scope is reported at its opening bracket; the innermost one
/// wins when several are left open.
pub(crate) fn check_scopes(src: &str) -> Result<(), (ParseErrorKind, usize)> {
    let mut open = Vec::new();
    let mut chars = src.char_indices();

    while let Some((idx, c)) = chars.next() {
        match c {
            ';' => {
                for (_, c) in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '"' => {
                let mut escaped = false;
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if escaped {
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == '"' {
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err((ParseErrorKind::UnterminatedString, idx));
                }
            }
            c if is_opening(c) => open.push((c, idx)),
            c if is_closing(c) => match open.pop() {
                Some((opener, _)) if is_closing_of(opener, c) => {}
                _ => return Err((ParseErrorKind::FaultyClosing, idx)),
            },
            _ => {}
        }
    }

    match open.pop() {
        Some((_, idx)) => Err((ParseErrorKind::ScopeLeftOpen, idx)),
        None => Ok(()),
    }
}
