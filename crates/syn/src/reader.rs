//! The reader turns source text into value trees.
//!
//! There is no separate tokenizer. The reader looks at the next character to
//! decide what comes next and reads atoms up to the next delimiter.

use std::iter;

use masp_vm::{Pools, Value};
use text_lines::TextLines;

use crate::error::{ParseError, ParseErrorKind, Result};
use crate::number::{parse_number, Literal};
use crate::scope::{check_scopes, is_closing};

fn is_whitespace(c: char) -> bool {
    c.is_whitespace() || c == ','
}

/// Characters ending an atom.
fn is_delimiter(c: char) -> bool {
    is_whitespace(c) || matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '"' | ';' | '\'')
}

/// Deepest accepted nesting of lists, vectors, maps and quotes.
pub const MAX_NESTING: usize = 256;

pub struct Reader<'src, 'p> {
    src: &'src str,
    pos: usize,
    depth: usize,
    pools: &'p Pools,
}

impl<'src, 'p> Reader<'src, 'p> {
    pub fn new(src: &'src str, pools: &'p Pools) -> Self {
        Reader {
            src,
            pos: 0,
            depth: 0,
            pools,
        }
    }

    /// Read the whole source as `(begin <forms...>)`.
    pub fn read_program(&mut self) -> Result<Value> {
        check_scopes(self.src).map_err(|(kind, offset)| self.error_at(kind, offset))?;

        let mut forms = vec![Value::symbol("begin")];
        loop {
            self.skip_trivia();
            if self.peek().is_none() {
                break;
            }
            forms.push(self.read_form()?);
        }
        Ok(Value::List(self.pools.list_from(forms)))
    }

    fn error_at(&self, kind: ParseErrorKind, offset: usize) -> ParseError {
        let position = TextLines::new(self.src).line_and_column_index(offset);
        ParseError {
            kind,
            offset,
            line: position.line_index + 1,
            column: position.column_index + 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.src[self.pos..].chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Skip whitespace, commas and `;` comments.
    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if is_whitespace(c) {
                self.bump();
            } else if c == ';' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn read_form(&mut self) -> Result<Value> {
        self.skip_trivia();
        let start = self.pos;
        if self.depth >= MAX_NESTING {
            return Err(self.error_at(ParseErrorKind::NestingTooDeep, start));
        }
        self.depth += 1;
        let form = self.read_form_at(start);
        self.depth -= 1;
        form
    }

    fn read_form_at(&mut self, start: usize) -> Result<Value> {
        let c = match self.peek() {
            Some(c) => c,
            None => return Err(self.error_at(ParseErrorKind::ScopeLeftOpen, start)),
        };

        match c {
            '"' => self.read_string(),
            '(' => {
                self.bump();
                let items = self.read_seq(')')?;
                self.finish_list(items, start)
            }
            '[' => {
                self.bump();
                let items = self.read_seq(']')?;
                Ok(self.tagged("make-vector", items))
            }
            '{' => {
                self.bump();
                let items = self.read_seq('}')?;
                Ok(self.tagged("make-map", items))
            }
            '\'' => {
                self.bump();
                self.skip_trivia();
                match self.peek() {
                    Some(c) if !is_closing(c) => {
                        let quoted = self.read_form()?;
                        Ok(self.tagged("quote", vec![quoted]))
                    }
                    _ => Err(self.error_at(ParseErrorKind::DanglingQuote, start)),
                }
            }
            c if is_closing(c) => Err(self.error_at(ParseErrorKind::FaultyClosing, start)),
            '#' | '`' | '~' | '@' | '\\' => {
                Err(self.error_at(ParseErrorKind::UnexpectedChar(c), start))
            }
            c if c.is_ascii_digit() => self.read_number(),
            '+' | '-' if self.peek_second().map_or(false, |c| c.is_ascii_digit()) => {
                self.read_number()
            }
            _ => Ok(self.read_symbol()),
        }
    }

    /// Read forms up to and including `close`.
    fn read_seq(&mut self, close: char) -> Result<Vec<Value>> {
        let mut items = vec![];
        loop {
            self.skip_trivia();
            match self.peek() {
                Some(c) if c == close => {
                    self.bump();
                    return Ok(items);
                }
                _ => items.push(self.read_form()?),
            }
        }
    }

    /// `(head items...)`
    fn tagged(&self, head: &str, items: Vec<Value>) -> Value {
        let list = self
            .pools
            .list_from(iter::once(Value::symbol(head)).chain(items));
        Value::List(list)
    }

    /// Build a list, rewriting `(defn name params body...)` into
    /// `(def name (fn params body...))`.
    fn finish_list(&self, items: Vec<Value>, start: usize) -> Result<Value> {
        let is_defn = items.first().map_or(false, |v| v.is_symbol_named("defn"));
        if !is_defn {
            return Ok(Value::List(self.pools.list_from(items)));
        }
        if items.len() < 3 {
            return Err(self.error_at(ParseErrorKind::MalformedDefn, start));
        }

        let mut items = items.into_iter().skip(1);
        let name = items.next().unwrap_or(Value::Nil);
        let function = self.tagged("fn", items.collect());
        Ok(self.tagged("def", vec![name, function]))
    }

    fn read_string(&mut self) -> Result<Value> {
        let start = self.pos;
        self.bump();
        let mut s = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(Value::String(s)),
                Some('\\') => match self.bump() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some('0') => s.push('\0'),
                    Some(other) => s.push(other),
                    None => break,
                },
                Some(c) => s.push(c),
                None => break,
            }
        }
        Err(self.error_at(ParseErrorKind::UnterminatedString, start))
    }

    /// Consume everything up to the next delimiter.
    fn read_atom(&mut self) -> &'src str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_delimiter(c) {
                break;
            }
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn read_number(&mut self) -> Result<Value> {
        let start = self.pos;
        let text = self.read_atom();
        match parse_number(text) {
            Some(Literal::Int(v)) => Ok(Value::int(v)),
            Some(Literal::Float(v)) => Ok(Value::float(v)),
            None => Err(self.error_at(ParseErrorKind::MalformedNumber(text.to_owned()), start)),
        }
    }

    fn read_symbol(&mut self) -> Value {
        match self.read_atom() {
            "nil" => Value::Nil,
            "true" => Value::Boolean(true),
            "false" => Value::Boolean(false),
            name => Value::symbol(name),
        }
    }
}
