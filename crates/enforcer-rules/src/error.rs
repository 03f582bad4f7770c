//! Error types for the rule expression language.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("empty rule")]
  Empty,

  #[error("unexpected character {ch:?} at offset {pos}")]
  UnexpectedChar { ch: char, pos: usize },

  #[error("unterminated string starting at offset {0}")]
  UnterminatedString(usize),

  #[error("invalid number {0:?}")]
  InvalidNumber(String),

  #[error("unexpected {found} at offset {pos}, expected {expected}")]
  Unexpected { found: String, expected: &'static str, pos: usize },

  #[error("rule nests deeper than {0} levels")]
  TooDeep(usize),

  #[error("unexpected end of rule, expected {0}")]
  UnexpectedEnd(&'static str),

  #[error("unknown identifier {0:?}; paths start with `actor.` or `event.`")]
  UnknownIdentifier(String),

  #[error("cannot apply `{op}` to {left} and {right}")]
  TypeMismatch { op: &'static str, left: &'static str, right: &'static str },

  #[error("invalid timestamp {0:?}")]
  InvalidTimestamp(String),

  #[error("invalid regex: {0}")]
  Regex(#[from] regex::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
