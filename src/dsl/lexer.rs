//! Script text to tokens.

use super::{DslError, DslResult};
use std::iter::Peekable;
use std::str::CharIndices;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Eof,
    Str,
    Number,
    Ident,

    // Keywords
    Connect,
    Call,
    Assert,
    Wait,
    Loop,
    In,
    If,
    Else,
    Set,
    Print,
    Define,
    Run,
    True,
    False,
    Null,

    // Operators
    EqEq,
    NotEq,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    AndAnd,
    OrOr,
    Bang,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,

    // Delimiters
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Dot,
    Arrow,
    Newline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text, or the unescaped contents for string literals.
    pub text: String,
    pub line: usize,
    pub column: usize,
}

/// Keyword for `word`, matched ASCII case-insensitively.
pub fn keyword(word: &str) -> Option<TokenKind> {
    let kind = match word.to_ascii_lowercase().as_str() {
        "connect" => TokenKind::Connect,
        "call" => TokenKind::Call,
        "assert" => TokenKind::Assert,
        "wait" => TokenKind::Wait,
        "loop" => TokenKind::Loop,
        "in" => TokenKind::In,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "set" => TokenKind::Set,
        "print" => TokenKind::Print,
        "define" => TokenKind::Define,
        "run" => TokenKind::Run,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        _ => return None,
    };
    Some(kind)
}

pub fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

pub fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

pub fn tokenize(source: &str) -> DslResult<Vec<Token>> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> DslResult<Vec<Token>> {
        while let Some(&(start, c)) = self.chars.peek() {
            let (line, column) = (self.line, self.column);

            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '\n' => {
                    self.bump();
                    self.push(TokenKind::Newline, "\n", line, column);
                    self.line += 1;
                    self.column = 1;
                }
                '#' => {
                    while self.chars.peek().is_some_and(|&(_, c)| c != '\n') {
                        self.bump();
                    }
                }
                '"' | '\'' => {
                    let text = self.string(c, line, column)?;
                    self.push(TokenKind::Str, text, line, column);
                }
                c if c.is_ascii_digit() => {
                    let text = self.number(start);
                    self.push(TokenKind::Number, text, line, column);
                }
                c if is_ident_start(c) => {
                    let mut end = start;
                    while let Some(&(i, c)) = self.chars.peek() {
                        if !is_ident_continue(c) {
                            break;
                        }
                        end = i + c.len_utf8();
                        self.bump();
                    }
                    let word = &self.source[start..end];
                    let kind = keyword(word).unwrap_or(TokenKind::Ident);
                    self.push(kind, word.to_string(), line, column);
                }
                _ => {
                    self.bump();
                    let next = self.chars.peek().map(|&(_, c)| c);
                    let (kind, text) = match (c, next) {
                        ('=', Some('=')) => (TokenKind::EqEq, "=="),
                        ('!', Some('=')) => (TokenKind::NotEq, "!="),
                        ('<', Some('=')) => (TokenKind::LessEq, "<="),
                        ('>', Some('=')) => (TokenKind::GreaterEq, ">="),
                        ('&', Some('&')) => (TokenKind::AndAnd, "&&"),
                        ('|', Some('|')) => (TokenKind::OrOr, "||"),
                        ('-', Some('>')) => (TokenKind::Arrow, "->"),
                        ('=', _) => (TokenKind::Assign, "="),
                        ('!', _) => (TokenKind::Bang, "!"),
                        ('<', _) => (TokenKind::Less, "<"),
                        ('>', _) => (TokenKind::Greater, ">"),
                        ('-', _) => (TokenKind::Minus, "-"),
                        ('+', _) => (TokenKind::Plus, "+"),
                        ('*', _) => (TokenKind::Star, "*"),
                        ('/', _) => (TokenKind::Slash, "/"),
                        ('(', _) => (TokenKind::LParen, "("),
                        (')', _) => (TokenKind::RParen, ")"),
                        ('{', _) => (TokenKind::LBrace, "{"),
                        ('}', _) => (TokenKind::RBrace, "}"),
                        ('[', _) => (TokenKind::LBracket, "["),
                        (']', _) => (TokenKind::RBracket, "]"),
                        (',', _) => (TokenKind::Comma, ","),
                        (':', _) => (TokenKind::Colon, ":"),
                        ('.', _) => (TokenKind::Dot, "."),
                        _ => {
                            return Err(DslError::Lex {
                                message: format!("unexpected character '{}'", c),
                                line,
                                column,
                            })
                        }
                    };
                    if text.len() == 2 {
                        self.bump();
                    }
                    self.push(kind, text, line, column);
                }
            }
        }

        let (line, column) = (self.line, self.column);
        self.push(TokenKind::Eof, "", line, column);
        Ok(self.tokens)
    }

    fn bump(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        self.column += 1;
        Some(c)
    }

    fn push(&mut self, kind: TokenKind, text: impl Into<String>, line: usize, column: usize) {
        self.tokens.push(Token {
            kind,
            text: text.into(),
            line,
            column,
        });
    }

    fn string(&mut self, quote: char, line: usize, column: usize) -> DslResult<String> {
        self.bump();
        let mut value = String::new();

        loop {
            let Some(c) = self.bump() else {
                return Err(DslError::Lex {
                    message: "unterminated string".to_string(),
                    line,
                    column,
                });
            };
            match c {
                c if c == quote => return Ok(value),
                '\\' => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some(other) => value.push(other),
                    None => {
                        return Err(DslError::Lex {
                            message: "unterminated string".to_string(),
                            line,
                            column,
                        })
                    }
                },
                '\n' => {
                    value.push('\n');
                    self.line += 1;
                    self.column = 1;
                }
                c => value.push(c),
            }
        }
    }

    /// Digits with an optional fraction; the dot needs a digit after it.
    fn number(&mut self, start: usize) -> String {
        let mut end = start;
        let mut seen_dot = false;

        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                end = i + 1;
                self.bump();
            } else if c == '.' && !seen_dot && self.digit_follows(i + 1) {
                seen_dot = true;
                end = i + 1;
                self.bump();
            } else {
                break;
            }
        }

        self.source[start..end].to_string()
    }

    fn digit_follows(&self, at: usize) -> bool {
        self.source[at..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn statement_tokens() {
        use TokenKind::*;
        assert_eq!(
            kinds("set x = 1 + 2\nprint x"),
            vec![Set, Ident, Assign, Number, Plus, Number, Newline, Print, Ident, Eof]
        );
    }

    #[test]
    fn keywords_case_insensitive() {
        use TokenKind::*;
        assert_eq!(kinds("CONNECT Print tRuE nul"), vec![Connect, Print, True, Ident, Eof]);
    }

    #[test]
    fn two_char_operators() {
        use TokenKind::*;
        assert_eq!(
            kinds("== != <= >= && || -> = ! < > -"),
            vec![EqEq, NotEq, LessEq, GreaterEq, AndAnd, OrOr, Arrow, Assign, Bang, Less, Greater, Minus, Eof]
        );
    }

    #[test]
    fn string_escapes_and_quotes() {
        let tokens = tokenize(r#""a\n\"b\"" 'it\'s'"#).unwrap();
        assert_eq!(tokens[0].text, "a\n\"b\"");
        assert_eq!(tokens[1].text, "it's");
        assert_eq!(tokens[1].kind, TokenKind::Str);
    }

    #[test]
    fn unterminated_string_fails() {
        let err = tokenize("print \"open").unwrap_err();
        assert!(err.to_string().contains("unterminated string"));
    }

    #[test]
    fn numbers_need_digit_after_dot() {
        let tokens = tokenize("1.5 2. 30").unwrap();
        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["1.5", "2", ".", "30", ""]);
    }

    #[test]
    fn comments_dropped() {
        use TokenKind::*;
        assert_eq!(kinds("# heading\nprint 1 # trailing"), vec![Newline, Print, Number, Eof]);
    }

    #[test]
    fn positions_tracked() {
        let tokens = tokenize("set a = 1\n  print a").unwrap();
        let print = tokens.iter().find(|t| t.kind == TokenKind::Print).unwrap();
        assert_eq!((print.line, print.column), (2, 3));
        assert_eq!((tokens[2].line, tokens[2].column), (1, 7));
    }

    #[test]
    fn stray_character_rejected() {
        let err = tokenize("print 1 & 2").unwrap_err();
        assert!(matches!(err, DslError::Lex { column: 9, .. }));
    }
}
