//! Rule text to syntax tree.
//!
//! Pipeline:
//!   raw &str
//!     └─ tokenize()          → Vec<Spanned>
//!          └─ Parser::expr()  → Expr
//!
//! Precedence, loosest first: `||`, `&&`, prefix `!`, one comparison,
//! primaries. Comparisons do not chain.

use enforcer_core::env::Value;

use crate::error::{Error, Result};

// ─── Syntax tree ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  Literal(Value),
  /// A dotted path such as `actor.tier`, resolved against the environment.
  Path(String),
  List(Vec<Expr>),
  Not(Box<Expr>),
  And(Box<Expr>, Box<Expr>),
  Or(Box<Expr>, Box<Expr>),
  Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  In,
  NotIn,
  Contains,
  StartsWith,
  EndsWith,
  Matches,
}

impl BinaryOp {
  pub fn symbol(self) -> &'static str {
    match self {
      Self::Eq => "==",
      Self::Ne => "!=",
      Self::Lt => "<",
      Self::Le => "<=",
      Self::Gt => ">",
      Self::Ge => ">=",
      Self::In => "in",
      Self::NotIn => "not in",
      Self::Contains => "contains",
      Self::StartsWith => "startsWith",
      Self::EndsWith => "endsWith",
      Self::Matches => "matches",
    }
  }
}

const ROOTS: [&str; 2] = ["actor", "event"];

// ─── Tokens ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
  Number(f64),
  Str(String),
  Ident(String),
  LParen,
  RParen,
  LBracket,
  RBracket,
  Comma,
  Dot,
  Bang,
  Minus,
  AndAnd,
  OrOr,
  EqEq,
  NotEq,
  Lt,
  Le,
  Gt,
  Ge,
}

struct Spanned {
  token: Token,
  pos:   usize,
}

fn tokenize(src: &str) -> Result<Vec<Spanned>> {
  let chars: Vec<(usize, char)> = src.char_indices().collect();
  let at = |i: usize| chars.get(i).map(|&(_, c)| c);
  let mut tokens = Vec::new();
  let mut i = 0;

  while let Some(&(pos, c)) = chars.get(i) {
    let (token, width) = match c {
      c if c.is_whitespace() => {
        i += 1;
        continue;
      }
      '(' => (Token::LParen, 1),
      ')' => (Token::RParen, 1),
      '[' => (Token::LBracket, 1),
      ']' => (Token::RBracket, 1),
      ',' => (Token::Comma, 1),
      '.' => (Token::Dot, 1),
      '-' => (Token::Minus, 1),
      '&' if at(i + 1) == Some('&') => (Token::AndAnd, 2),
      '|' if at(i + 1) == Some('|') => (Token::OrOr, 2),
      '=' if at(i + 1) == Some('=') => (Token::EqEq, 2),
      '!' if at(i + 1) == Some('=') => (Token::NotEq, 2),
      '!' => (Token::Bang, 1),
      '<' if at(i + 1) == Some('=') => (Token::Le, 2),
      '<' => (Token::Lt, 1),
      '>' if at(i + 1) == Some('=') => (Token::Ge, 2),
      '>' => (Token::Gt, 1),
      '\'' | '"' => {
        let (s, next) = lex_string(&chars, i)?;
        tokens.push(Spanned { token: Token::Str(s), pos });
        i = next;
        continue;
      }
      c if c.is_ascii_digit() => {
        let mut end = i;
        while at(end).is_some_and(|c| c.is_ascii_digit()) {
          end += 1;
        }
        if at(end) == Some('.') && at(end + 1).is_some_and(|c| c.is_ascii_digit()) {
          end += 2;
          while at(end).is_some_and(|c| c.is_ascii_digit()) {
            end += 1;
          }
        }
        let text: String = chars[i..end].iter().map(|&(_, c)| c).collect();
        let n = text.parse().map_err(|_| Error::InvalidNumber(text.clone()))?;
        (Token::Number(n), end - i)
      }
      c if c.is_alphabetic() || c == '_' => {
        let mut end = i;
        while at(end).is_some_and(|c| c.is_alphanumeric() || c == '_') {
          end += 1;
        }
        let text = chars[i..end].iter().map(|&(_, c)| c).collect();
        (Token::Ident(text), end - i)
      }
      ch => return Err(Error::UnexpectedChar { ch, pos }),
    };
    tokens.push(Spanned { token, pos });
    i += width;
  }
  Ok(tokens)
}

/// Lex a quoted string starting at `chars[start]`. Returns the unescaped
/// contents and the index just past the closing quote.
fn lex_string(chars: &[(usize, char)], start: usize) -> Result<(String, usize)> {
  let (pos, quote) = chars[start];
  let mut out = String::new();
  let mut i = start + 1;
  while let Some(&(_, c)) = chars.get(i) {
    match c {
      '\\' => {
        let Some(&(_, escaped)) = chars.get(i + 1) else { break };
        out.push(match escaped {
          'n' => '\n',
          't' => '\t',
          other => other,
        });
        i += 2;
      }
      c if c == quote => return Ok((out, i + 1)),
      c => {
        out.push(c);
        i += 1;
      }
    }
  }
  Err(Error::UnterminatedString(pos))
}

// ─── Parser ──────────────────────────────────────────────────────────────────

/// Deepest expression tree the parser builds. Parsing, evaluation and drop
/// all recurse over the tree, so this bounds their stack use.
pub const MAX_DEPTH: usize = 256;

/// Parse a complete rule.
pub fn parse(src: &str) -> Result<Expr> {
  let tokens = tokenize(src)?;
  if tokens.is_empty() {
    return Err(Error::Empty);
  }
  let mut parser = Parser { tokens, next: 0, depth: 0 };
  let expr = parser.or()?;
  if let Some(extra) = parser.tokens.get(parser.next) {
    return Err(Error::Unexpected {
      found:    format!("{:?}", extra.token),
      expected: "end of rule",
      pos:      extra.pos,
    });
  }
  Ok(expr)
}

struct Parser {
  tokens: Vec<Spanned>,
  next:   usize,
  /// Nesting of the node under construction; see [`MAX_DEPTH`].
  depth:  usize,
}

impl Parser {
  fn peek(&self) -> Option<&Token> { self.peek_at(0) }

  fn peek_at(&self, n: usize) -> Option<&Token> {
    self.tokens.get(self.next + n).map(|s| &s.token)
  }

  fn is_keyword(&self, n: usize, kw: &str) -> bool {
    matches!(self.peek_at(n), Some(Token::Ident(s)) if s == kw)
  }

  fn bump(&mut self, expected: &'static str) -> Result<Spanned> {
    let Some(spanned) = self.tokens.get(self.next) else {
      return Err(Error::UnexpectedEnd(expected));
    };
    let spanned = Spanned { token: spanned.token.clone(), pos: spanned.pos };
    self.next += 1;
    Ok(spanned)
  }

  fn expect(&mut self, want: Token, expected: &'static str) -> Result<()> {
    let got = self.bump(expected)?;
    if got.token != want {
      return Err(Error::Unexpected {
        found: format!("{:?}", got.token),
        expected,
        pos: got.pos,
      });
    }
    Ok(())
  }

  fn enter(&mut self) -> Result<()> {
    self.depth += 1;
    if self.depth > MAX_DEPTH {
      return Err(Error::TooDeep(MAX_DEPTH));
    }
    Ok(())
  }

  // Each chained operator wraps everything to its left, so it counts as one
  // more level for the operands that follow.

  fn or(&mut self) -> Result<Expr> {
    let depth = self.depth;
    self.enter()?;
    let mut lhs = self.and()?;
    while matches!(self.peek(), Some(Token::OrOr)) || self.is_keyword(0, "or") {
      self.next += 1;
      self.enter()?;
      lhs = Expr::Or(Box::new(lhs), Box::new(self.and()?));
    }
    self.depth = depth;
    Ok(lhs)
  }

  fn and(&mut self) -> Result<Expr> {
    let depth = self.depth;
    let mut lhs = self.not()?;
    while matches!(self.peek(), Some(Token::AndAnd)) || self.is_keyword(0, "and") {
      self.next += 1;
      self.enter()?;
      lhs = Expr::And(Box::new(lhs), Box::new(self.not()?));
    }
    self.depth = depth;
    Ok(lhs)
  }

  fn not(&mut self) -> Result<Expr> {
    let depth = self.depth;
    let mut negations = 0;
    while matches!(self.peek(), Some(Token::Bang)) || self.is_keyword(0, "not") {
      self.next += 1;
      self.enter()?;
      negations += 1;
    }
    let mut expr = self.comparison()?;
    for _ in 0..negations {
      expr = Expr::Not(Box::new(expr));
    }
    self.depth = depth;
    Ok(expr)
  }

  fn comparison(&mut self) -> Result<Expr> {
    let lhs = self.primary()?;
    let (op, width) = match self.peek() {
      Some(Token::EqEq) => (BinaryOp::Eq, 1),
      Some(Token::NotEq) => (BinaryOp::Ne, 1),
      Some(Token::Lt) => (BinaryOp::Lt, 1),
      Some(Token::Le) => (BinaryOp::Le, 1),
      Some(Token::Gt) => (BinaryOp::Gt, 1),
      Some(Token::Ge) => (BinaryOp::Ge, 1),
      Some(Token::Ident(kw)) => match kw.as_str() {
        "in" => (BinaryOp::In, 1),
        "not" if self.is_keyword(1, "in") => (BinaryOp::NotIn, 2),
        "contains" => (BinaryOp::Contains, 1),
        "startsWith" => (BinaryOp::StartsWith, 1),
        "endsWith" => (BinaryOp::EndsWith, 1),
        "matches" => (BinaryOp::Matches, 1),
        _ => return Ok(lhs),
      },
      _ => return Ok(lhs),
    };
    self.next += width;
    let rhs = self.primary()?;
    Ok(Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
  }

  fn primary(&mut self) -> Result<Expr> {
    const EXPECTED: &str = "a value, path or `(`";
    let Spanned { token, pos } = self.bump(EXPECTED)?;
    match token {
      Token::Number(n) => Ok(Expr::Literal(Value::Number(n))),
      Token::Minus => match self.bump("a number")? {
        Spanned { token: Token::Number(n), .. } => Ok(Expr::Literal(Value::Number(-n))),
        Spanned { token, pos } => Err(Error::Unexpected {
          found: format!("{token:?}"),
          expected: "a number",
          pos,
        }),
      },
      Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
      Token::LParen => {
        let inner = self.or()?;
        self.expect(Token::RParen, "`)`")?;
        Ok(inner)
      }
      Token::LBracket => self.list(),
      Token::Ident(name) => match name.as_str() {
        "true" => Ok(Expr::Literal(Value::Bool(true))),
        "false" => Ok(Expr::Literal(Value::Bool(false))),
        "null" => Ok(Expr::Literal(Value::Null)),
        root if ROOTS.contains(&root) => self.path(name),
        _ => Err(Error::UnknownIdentifier(name)),
      },
      token => Err(Error::Unexpected { found: format!("{token:?}"), expected: EXPECTED, pos }),
    }
  }

  /// The opening `[` has been consumed.
  fn list(&mut self) -> Result<Expr> {
    let mut items = Vec::new();
    if matches!(self.peek(), Some(Token::RBracket)) {
      self.next += 1;
      return Ok(Expr::List(items));
    }
    loop {
      items.push(self.or()?);
      match self.bump("`,` or `]`")? {
        Spanned { token: Token::Comma, .. } => continue,
        Spanned { token: Token::RBracket, .. } => return Ok(Expr::List(items)),
        Spanned { token, pos } => {
          return Err(Error::Unexpected {
            found: format!("{token:?}"),
            expected: "`,` or `]`",
            pos,
          });
        }
      }
    }
  }

  /// The root identifier has been consumed; at least one `.key` must follow.
  fn path(&mut self, root: String) -> Result<Expr> {
    let mut path = root;
    loop {
      self.expect(Token::Dot, "`.` after path root")?;
      match self.bump("a field name")? {
        Spanned { token: Token::Ident(key), .. } => {
          path.push('.');
          path.push_str(&key);
        }
        Spanned { token, pos } => {
          return Err(Error::Unexpected {
            found: format!("{token:?}"),
            expected: "a field name",
            pos,
          });
        }
      }
      if !matches!(self.peek(), Some(Token::Dot)) {
        return Ok(Expr::Path(path));
      }
    }
  }
}
