// Ambient, out-of-core-scope tokenizer (spec §1) producing the token
// stream `parser.rs` consumes. Hand-rolled rather than generated — the
// pack's copy of the teacher repo doesn't actually carry its
// `grammar.lalrpop`/`build.rs` pair (see DESIGN.md), so there is no
// grammar file to generalize, and a hand-rolled scanner is the direct,
// auditable translation of `original_source`'s lexer.

use crate::diagnostics::{CbError, SourceLocation};
use std::fmt;

pub type Result<T> = std::result::Result<T, CbError>;

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),

    KwInt,
    KwLong,
    KwShort,
    KwTiny,
    KwBool,
    KwChar,
    KwString,
    KwFloat,
    KwDouble,
    KwQuad,
    KwVoid,
    KwStruct,
    KwUnion,
    KwInterface,
    KwImpl,
    KwFor,
    KwTypedef,
    KwEnum,
    KwWhile,
    KwIf,
    KwElse,
    KwReturn,
    KwBreak,
    KwContinue,
    KwStatic,
    KwConst,
    KwUnsigned,
    KwPrint,
    KwPrintln,
    KwPrintf,
    KwPrintlnf,
    KwAssert,
    KwTrue,
    KwFalse,
    KwNull,
    KwSelf,
    KwPrivate,
    KwPublic,

    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Dot,
    Arrow,
    ColonColon,
    Colon,

    Eq,
    EqEq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Shl,
    Shr,
    AndAnd,
    OrOr,
    PlusPlus,
    MinusMinus,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    Question,

    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub loc: SourceLocation,
}

fn keyword(word: &str) -> Option<Token> {
    use Token::*;
    Some(match word {
        "int" => KwInt,
        "long" => KwLong,
        "short" => KwShort,
        "tiny" => KwTiny,
        "bool" => KwBool,
        "char" => KwChar,
        "string" => KwString,
        "float" => KwFloat,
        "double" => KwDouble,
        "quad" => KwQuad,
        "void" => KwVoid,
        "struct" => KwStruct,
        "union" => KwUnion,
        "interface" => KwInterface,
        "impl" => KwImpl,
        "for" => KwFor,
        "typedef" => KwTypedef,
        "enum" => KwEnum,
        "while" => KwWhile,
        "if" => KwIf,
        "else" => KwElse,
        "return" => KwReturn,
        "break" => KwBreak,
        "continue" => KwContinue,
        "static" => KwStatic,
        "const" => KwConst,
        "unsigned" => KwUnsigned,
        "print" => KwPrint,
        "println" => KwPrintln,
        "printf" => KwPrintf,
        "printlnf" => KwPrintlnf,
        "assert" => KwAssert,
        "true" => KwTrue,
        "false" => KwFalse,
        "null" => KwNull,
        "self" => KwSelf,
        "private" => KwPrivate,
        "public" => KwPublic,
        _ => return None,
    })
}

pub struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    _source: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Lexer<'a> {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            _source: source,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn loc(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.col)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while self.peek().is_some() && self.peek() != Some('\n') {
                        self.advance();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.advance();
                    self.advance();
                    while self.peek().is_some() && !(self.peek() == Some('*') && self.peek_at(1) == Some('/')) {
                        self.advance();
                    }
                    self.advance();
                    self.advance();
                }
                _ => break,
            }
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<SpannedToken>> {
        let mut out = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            let loc = self.loc();
            let c = match self.peek() {
                None => {
                    out.push(SpannedToken { token: Token::Eof, loc });
                    break;
                }
                Some(c) => c,
            };

            let token = if c.is_ascii_digit() {
                self.lex_number()?
            } else if c == '"' {
                self.lex_string()?
            } else if c.is_alphabetic() || c == '_' {
                self.lex_ident_or_keyword()
            } else {
                self.lex_punct(loc)?
            };
            out.push(SpannedToken { token, loc });
        }
        Ok(out)
    }

    fn lex_number(&mut self) -> Result<Token> {
        let start = self.pos;
        while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.advance();
        }
        let mut is_float = false;
        if self.peek() == Some('.') && self.peek_at(1).map(|c| c.is_ascii_digit()).unwrap_or(false) {
            is_float = true;
            self.advance();
            while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                self.advance();
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|e| CbError::ParseError(format!("bad float literal '{}': {}", text, e)))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|e| CbError::ParseError(format!("bad integer literal '{}': {}", text, e)))
        }
    }

    fn lex_string(&mut self) -> Result<Token> {
        self.advance(); // opening quote
        let mut s = String::new();
        loop {
            match self.advance() {
                None => return Err(CbError::ParseError("unterminated string literal".to_string())),
                Some('"') => break,
                Some('\\') => match self.advance() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some('\\') => s.push('\\'),
                    Some('"') => s.push('"'),
                    Some(other) => s.push(other),
                    None => return Err(CbError::ParseError("unterminated escape sequence".to_string())),
                },
                Some(c) => s.push(c),
            }
        }
        Ok(Token::Str(s))
    }

    fn lex_ident_or_keyword(&mut self) -> Token {
        let start = self.pos;
        while self.peek().map(|c| c.is_alphanumeric() || c == '_').unwrap_or(false) {
            self.advance();
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        keyword(&text).unwrap_or(Token::Ident(text))
    }

    fn lex_punct(&mut self, loc: SourceLocation) -> Result<Token> {
        let c = self.advance().unwrap();
        use Token::*;
        let two = |lexer: &mut Self, expect: char, one: Token, two: Token| -> Token {
            if lexer.peek() == Some(expect) {
                lexer.advance();
                two
            } else {
                one
            }
        };
        Ok(match c {
            '{' => LBrace,
            '}' => RBrace,
            '(' => LParen,
            ')' => RParen,
            '[' => LBracket,
            ']' => RBracket,
            ';' => Semi,
            ',' => Comma,
            '.' => Dot,
            '~' => Tilde,
            '?' => Question,
            ':' => two(self, ':', Colon, ColonColon),
            '=' => two(self, '=', Eq, EqEq),
            '!' => two(self, '=', Bang, Ne),
            '<' => {
                if self.peek() == Some('<') {
                    self.advance();
                    Shl
                } else {
                    two(self, '=', Lt, Le)
                }
            }
            '>' => {
                if self.peek() == Some('>') {
                    self.advance();
                    Shr
                } else {
                    two(self, '=', Gt, Ge)
                }
            }
            '+' => {
                if self.peek() == Some('+') {
                    self.advance();
                    PlusPlus
                } else {
                    two(self, '=', Plus, PlusEq)
                }
            }
            '-' => {
                if self.peek() == Some('-') {
                    self.advance();
                    MinusMinus
                } else if self.peek() == Some('>') {
                    self.advance();
                    Arrow
                } else {
                    two(self, '=', Minus, MinusEq)
                }
            }
            '*' => two(self, '=', Star, StarEq),
            '/' => two(self, '=', Slash, SlashEq),
            '%' => two(self, '=', Percent, PercentEq),
            '&' => two(self, '&', Amp, AndAnd),
            '|' => two(self, '|', Pipe, OrOr),
            '^' => Caret,
            other => return Err(CbError::ParseError(format!("unexpected character '{}' at {}", other, loc))),
        })
    }
}
