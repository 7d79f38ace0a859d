use nom::{
    IResult,
    error::{ContextError, ErrorKind, ParseError},
};
use thiserror::Error;

use super::{section::SectionCode, types::ExternalKind};

pub(crate) type Decoded<'a, T> = IResult<&'a [u8], T, DecodeError>;

pub(crate) fn fail<'a, T>(err: DecodeError) -> Decoded<'a, T> {
    Err(nom::Err::Failure(err))
}

/// Outcome of a failed load.
///
/// `NotAModule` means the buffer does not carry the module header at all and a
/// caller may try another format. `Malformed` means the header matched but the
/// contents are broken.
#[derive(Debug, Error, PartialEq)]
pub enum LoadError {
    #[error("not a module: {0}")]
    NotAModule(&'static str),
    #[error("malformed module: {0}")]
    Malformed(#[from] DecodeError),
}

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("malformed input ({0:?})")]
    Parse(ErrorKind),
    #[error("unknown section id 0x{0:02X}")]
    UnknownSection(u8),
    #[error("{section:?} section is not allowed after {previous:?} section")]
    SectionOutOfOrder {
        section: SectionCode,
        previous: SectionCode,
    },
    #[error("{section:?} section has {unread} unread bytes")]
    SectionSizeMismatch { section: SectionCode, unread: usize },
    #[error("unsupported type constructor 0x{0:02X}")]
    UnsupportedTypeForm(u8),
    #[error("unknown value type 0x{0:02X}")]
    UnknownValueType(u8),
    #[error("unknown external kind 0x{0:02X}")]
    UnknownExternalKind(u8),
    #[error("unsupported flags 0x{flags:X} in {context}")]
    UnsupportedFlags { context: &'static str, flags: u32 },
    #[error("type index {0} is out of range")]
    TypeIndexOutOfRange(u32),
    #[error("unexpected byte, expecting 0x{expected:02X} but encountered 0x{found:02X}")]
    UnexpectedByte { expected: u8, found: u8 },
    #[error("unsupported initializer for {0:?} global")]
    UnsupportedInitializer(super::types::ValueType),
    #[error("unsupported constant expression opcode 0x{0:02X}")]
    UnsupportedConstExpr(u8),
    #[error("element segments specified when no tables are defined")]
    MissingTable,
    #[error("data segments specified when no memories are defined")]
    MissingMemory,
    #[error("{declared} functions declared but {bodies} bodies present")]
    FunctionBodyCountMismatch { declared: usize, bodies: usize },
    #[error("function {0} declares too many locals")]
    TooManyLocals(usize),
    #[error("body of function {0} does not end with `end`")]
    MissingEnd(usize),
    #[error("invalid utf-8 name")]
    InvalidUtf8,
    #[error("{0:?} import declared after a local definition")]
    ImportAfterLocal(ExternalKind),
}

impl<'a> ParseError<&'a [u8]> for DecodeError {
    fn from_error_kind(_input: &'a [u8], kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Eof => DecodeError::UnexpectedEof,
            kind => DecodeError::Parse(kind),
        }
    }

    fn append(_input: &'a [u8], _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

// LEB128 readers require context support; the context string is dropped.
impl<'a> ContextError<&'a [u8]> for DecodeError {}

impl From<nom::Err<DecodeError>> for DecodeError {
    fn from(err: nom::Err<DecodeError>) -> Self {
        match err {
            nom::Err::Error(err) | nom::Err::Failure(err) => err,
            nom::Err::Incomplete(_) => DecodeError::UnexpectedEof,
        }
    }
}
