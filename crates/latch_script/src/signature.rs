// signature.rs - Marshalable value kinds and call signatures
//
// Grammar: argument codes, optionally followed by '>' and result codes.
//   d = floating point, i = integer, s = text
// "ss>s" takes two texts and returns one text.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Number,
    Integer,
    Text,
}

impl ValueKind {
    pub fn code(self) -> char {
        match self {
            ValueKind::Number => 'd',
            ValueKind::Integer => 'i',
            ValueKind::Text => 's',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'd' => Some(ValueKind::Number),
            'i' => Some(ValueKind::Integer),
            's' => Some(ValueKind::Text),
            _ => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Number => "number",
            ValueKind::Integer => "integer",
            ValueKind::Text => "text",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarshalError {
    #[error("unsupported signature code '{code}' at position {position}")]
    UnsupportedCode { code: char, position: usize },

    #[error("second '>' separator at position {position}")]
    DuplicateSeparator { position: usize },

    #[error("expected {expected} arguments, got {found}")]
    ArgumentCount { expected: usize, found: usize },

    #[error("argument {index}: expected {expected}, got {found}")]
    ArgumentMismatch {
        index: usize,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("expected {expected} results, got {found}")]
    ResultCount { expected: usize, found: usize },

    #[error("result {index}: expected {expected}, got {found}")]
    ResultMismatch {
        index: usize,
        expected: ValueKind,
        found: String,
    },
}

/// Argument and result kinds of a script function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    pub args: Vec<ValueKind>,
    pub results: Vec<ValueKind>,
}

impl Signature {
    pub fn new(args: Vec<ValueKind>, results: Vec<ValueKind>) -> Self {
        Self { args, results }
    }

    pub fn parse(text: &str) -> Result<Self, MarshalError> {
        let mut signature = Signature::default();
        let mut in_results = false;

        for (position, code) in text.chars().enumerate() {
            if code == '>' {
                if in_results {
                    return Err(MarshalError::DuplicateSeparator { position });
                }
                in_results = true;
                continue;
            }

            let kind = ValueKind::from_code(code).ok_or(MarshalError::UnsupportedCode { code, position })?;
            if in_results {
                signature.results.push(kind);
            } else {
                signature.args.push(kind);
            }
        }

        Ok(signature)
    }
}

impl FromStr for Signature {
    type Err = MarshalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Signature::parse(s)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for kind in &self.args {
            write!(f, "{}", kind.code())?;
        }
        if !self.results.is_empty() {
            f.write_str(">")?;
            for kind in &self.results {
                write!(f, "{}", kind.code())?;
            }
        }
        Ok(())
    }
}
