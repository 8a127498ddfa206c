use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("scope left open")]
    ScopeLeftOpen,

    #[error("faulty closing")]
    FaultyClosing,

    #[error("unterminated string")]
    UnterminatedString,

    #[error("malformed number `{0}`")]
    MalformedNumber(String),

    #[error("unexpected character `{0}`")]
    UnexpectedChar(char),

    #[error("defn needs a name and a parameter list")]
    MalformedDefn,

    #[error("nothing to quote")]
    DanglingQuote,

    #[error("nesting too deep")]
    NestingTooDeep,
}

/// A parse failure and where it happened. Lines and columns start at 1.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at {line}:{column}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// Byte offset into the source.
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

pub type Result<T> = std::result::Result<T, ParseError>;
