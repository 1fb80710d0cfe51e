//! Query tokenizer.

use super::{QueryError, QueryResult};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `/`
    Slash,
    /// `//`
    DoubleSlash,
    /// `|`
    Pipe,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `@`
    At,
    /// `::`
    ColonColon,
    /// `.`
    Dot,
    /// `..`
    DotDot,
    /// `*`
    Star,
    /// `=`
    Equals,
    /// `local` or `prefix:local`
    Name(String),
    /// `prefix:*`
    PrefixWildcard(String),
    Number(usize),
    /// Quoted string, quotes removed.
    Literal(String),
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Slash => f.write_str("'/'"),
            Token::DoubleSlash => f.write_str("'//'"),
            Token::Pipe => f.write_str("'|'"),
            Token::LBracket => f.write_str("'['"),
            Token::RBracket => f.write_str("']'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::At => f.write_str("'@'"),
            Token::ColonColon => f.write_str("'::'"),
            Token::Dot => f.write_str("'.'"),
            Token::DotDot => f.write_str("'..'"),
            Token::Star => f.write_str("'*'"),
            Token::Equals => f.write_str("'='"),
            Token::Name(name) => write!(f, "name '{name}'"),
            Token::PrefixWildcard(prefix) => write!(f, "'{prefix}:*'"),
            Token::Number(n) => write!(f, "number {n}"),
            Token::Literal(text) => write!(f, "literal {text:?}"),
            Token::Eof => f.write_str("end of query"),
        }
    }
}

pub struct Lexer<'a> {
    source: &'a str,
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Tokenizes the whole input; the last token is always [`Token::Eof`].
    pub fn tokenize(mut self) -> QueryResult<Vec<(Token, usize)>> {
        let mut tokens = Vec::new();
        loop {
            let (token, position) = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push((token, position));
            if done {
                return Ok(tokens);
            }
        }
    }

    /// Next token and the byte position it starts at.
    pub fn next_token(&mut self) -> QueryResult<(Token, usize)> {
        self.skip_whitespace();
        let start = self.position;
        let Some(ch) = self.bump() else {
            return Ok((Token::Eof, start));
        };

        let token = match ch {
            '/' => {
                if self.peek() == Some('/') {
                    self.bump();
                    Token::DoubleSlash
                } else {
                    Token::Slash
                }
            }
            '|' => Token::Pipe,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '@' => Token::At,
            '*' => Token::Star,
            '=' => Token::Equals,
            ':' => {
                if self.peek() == Some(':') {
                    self.bump();
                    Token::ColonColon
                } else {
                    return Err(self.error(start, "unexpected ':'"));
                }
            }
            '.' => match self.peek() {
                Some('.') => {
                    self.bump();
                    Token::DotDot
                }
                Some(c) if c.is_ascii_digit() => {
                    return Err(self.error(start, "decimal numbers are not supported"))
                }
                _ => Token::Dot,
            },
            '\'' | '"' => Token::Literal(self.read_literal(ch, start)?),
            c if c.is_ascii_digit() => Token::Number(self.read_number(start)?),
            c if is_name_start(c) => self.read_name(start)?,
            other => return Err(self.error(start, &format!("unexpected character '{other}'"))),
        };
        Ok((token, start))
    }

    fn peek(&self) -> Option<char> {
        self.source[self.position..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.source[self.position..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.position += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn read_literal(&mut self, quote: char, start: usize) -> QueryResult<String> {
        let body = self.position;
        while let Some(ch) = self.bump() {
            if ch == quote {
                return Ok(self.source[body..self.position - 1].to_string());
            }
        }
        Err(self.error(start, "unterminated literal"))
    }

    fn read_number(&mut self, start: usize) -> QueryResult<usize> {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        self.source[start..self.position]
            .parse()
            .map_err(|_| self.error(start, "number out of range"))
    }

    fn read_ncname(&mut self) -> &'a str {
        let start = self.position;
        while self.peek().is_some_and(is_name_char) {
            self.bump();
        }
        &self.source[start..self.position]
    }

    fn read_name(&mut self, start: usize) -> QueryResult<Token> {
        // The first character was already consumed.
        self.read_ncname();
        let prefix = &self.source[start..self.position];

        if self.peek() == Some(':') && self.peek_second() != Some(':') {
            self.bump();
            if self.peek() == Some('*') {
                self.bump();
                return Ok(Token::PrefixWildcard(prefix.to_string()));
            }
            if !self.peek().is_some_and(is_name_start) {
                return Err(self.error(self.position, "expected local name after ':'"));
            }
            let local = self.read_ncname();
            return Ok(Token::Name(format!("{prefix}:{local}")));
        }
        Ok(Token::Name(prefix.to_string()))
    }

    fn error(&self, position: usize, message: &str) -> QueryError {
        QueryError::Syntax {
            position,
            message: message.to_string(),
        }
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}
