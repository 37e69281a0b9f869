//! Expression tokenizer
//!
//! One lexer serves all four expression surfaces (key condition,
//! condition/filter, update). Keywords and function names are not
//! distinguished here; parsers match identifier tokens case-insensitively.
//!
//! Token shapes:
//! - bare identifier: `[A-Za-z_][A-Za-z0-9_-]*`
//! - name placeholder: `#` + `[A-Za-z_][A-Za-z0-9_]*`
//! - value placeholder: `:` + `[A-Za-z_][A-Za-z0-9_]*`
//! - number literal: decimal, optional leading `-`
//! - string literal: single- or double-quoted

use dynamem_core::{EngineError, Result};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    NamePlaceholder(String),
    ValuePlaceholder(String),
    Number(f64),
    StringLit(String),
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "{s}"),
            Token::NamePlaceholder(s) => write!(f, "{s}"),
            Token::ValuePlaceholder(s) => write!(f, "{s}"),
            Token::Number(n) => write!(f, "{}", dynamem_core::format_number(*n)),
            Token::StringLit(s) => write!(f, "'{s}'"),
            Token::Eq => write!(f, "="),
            Token::Ne => write!(f, "<>"),
            Token::Lt => write!(f, "<"),
            Token::Le => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Ge => write!(f, ">="),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
        }
    }
}

impl Token {
    /// Case-insensitive keyword match on identifier tokens.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Ident(s) if s.eq_ignore_ascii_case(keyword))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_placeholder_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Tokenize an expression string.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' | ':' => {
                chars.next();
                let mut name = String::new();
                match chars.peek() {
                    Some(&n) if is_ident_start(n) => {}
                    _ => {
                        return Err(EngineError::validation(format!(
                            "Syntax error; token: \"{c}\""
                        )))
                    }
                }
                while let Some(&n) = chars.peek() {
                    if is_placeholder_continue(n) {
                        name.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let token = format!("{c}{name}");
                tokens.push(if c == '#' {
                    Token::NamePlaceholder(token)
                } else {
                    Token::ValuePlaceholder(token)
                });
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut lit = String::new();
                let mut closed = false;
                for n in chars.by_ref() {
                    if n == quote {
                        closed = true;
                        break;
                    }
                    lit.push(n);
                }
                if !closed {
                    return Err(EngineError::validation(
                        "Syntax error; unterminated string literal",
                    ));
                }
                tokens.push(Token::StringLit(lit));
            }
            c if c.is_ascii_digit() => {
                tokens.push(lex_number(&mut chars)?);
            }
            '-' => {
                chars.next();
                match chars.peek() {
                    Some(&n) if n.is_ascii_digit() => {
                        let token = lex_number(&mut chars)?;
                        let Token::Number(v) = token else {
                            unreachable!("lex_number yields Number");
                        };
                        tokens.push(Token::Number(-v));
                    }
                    _ => tokens.push(Token::Minus),
                }
            }
            c if is_ident_start(c) => {
                let mut ident = String::new();
                while let Some(&n) = chars.peek() {
                    if is_ident_continue(n) {
                        ident.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            '<' => {
                chars.next();
                match chars.peek() {
                    Some('=') => {
                        chars.next();
                        tokens.push(Token::Le);
                    }
                    Some('>') => {
                        chars.next();
                        tokens.push(Token::Ne);
                    }
                    _ => tokens.push(Token::Lt),
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '=' => {
                chars.next();
                tokens.push(Token::Eq);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            other => {
                return Err(EngineError::validation(format!(
                    "Syntax error; token: \"{other}\""
                )))
            }
        }
    }
    Ok(tokens)
}

fn lex_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<Token> {
    let mut text = String::new();
    while let Some(&n) = chars.peek() {
        if n.is_ascii_digit() || n == '.' {
            text.push(n);
            chars.next();
        } else {
            break;
        }
    }
    text.parse::<f64>()
        .map(Token::Number)
        .map_err(|_| EngineError::validation(format!("Syntax error; token: \"{text}\"")))
}

/// Cursor over a token stream shared by the expression parsers.
pub struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenStream {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn lex(input: &str) -> Result<Self> {
        Ok(Self::new(tokenize(input)?))
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub fn peek_second(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1)
    }

    pub fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Consume the next token if it matches the keyword.
    pub fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_keyword(keyword)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume the next token if it equals `token` exactly.
    pub fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Description of the next token for syntax errors; `"<EOF>"` at end.
    pub fn describe_next(&self) -> String {
        match self.peek() {
            Some(token) => token.to_string(),
            None => "<EOF>".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_key_condition() {
        let tokens = tokenize("PK = :pk AND begins_with(SK, :prefix)").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("PK".into()),
                Token::Eq,
                Token::ValuePlaceholder(":pk".into()),
                Token::Ident("AND".into()),
                Token::Ident("begins_with".into()),
                Token::LParen,
                Token::Ident("SK".into()),
                Token::Comma,
                Token::ValuePlaceholder(":prefix".into()),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_tokenize_path_with_indices() {
        let tokens = tokenize("#meta.tags[0]").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::NamePlaceholder("#meta".into()),
                Token::Dot,
                Token::Ident("tags".into()),
                Token::LBracket,
                Token::Number(0.0),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn test_tokenize_operators() {
        let tokens = tokenize("a <> b <= c >= d < e > f").unwrap();
        let ops: Vec<&Token> = tokens.iter().filter(|t| !matches!(t, Token::Ident(_))).collect();
        assert_eq!(
            ops,
            vec![&Token::Ne, &Token::Le, &Token::Ge, &Token::Lt, &Token::Gt]
        );
    }

    #[test]
    fn test_tokenize_numbers() {
        assert_eq!(tokenize("3").unwrap(), vec![Token::Number(3.0)]);
        assert_eq!(tokenize("-2.5").unwrap(), vec![Token::Number(-2.5)]);
        assert_eq!(
            tokenize("a - 1").unwrap(),
            vec![
                Token::Ident("a".into()),
                Token::Minus,
                Token::Number(1.0)
            ]
        );
    }

    #[test]
    fn test_hyphen_inside_identifier() {
        assert_eq!(
            tokenize("attr-name").unwrap(),
            vec![Token::Ident("attr-name".into())]
        );
    }

    #[test]
    fn test_tokenize_string_literals() {
        assert_eq!(
            tokenize("'single' \"double\"").unwrap(),
            vec![
                Token::StringLit("single".into()),
                Token::StringLit("double".into())
            ]
        );
    }

    #[test]
    fn test_unterminated_string_fails() {
        assert!(tokenize("'oops").is_err());
    }

    #[test]
    fn test_bad_placeholder_fails() {
        assert!(tokenize("# name").is_err());
        assert!(tokenize(": 1").is_err());
    }

    #[test]
    fn test_unknown_character_fails() {
        let err = tokenize("a & b").unwrap_err();
        assert!(err.to_string().contains('&'));
    }

    #[test]
    fn test_keyword_matching_is_case_insensitive() {
        let tokens = tokenize("and OR Between").unwrap();
        assert!(tokens[0].is_keyword("AND"));
        assert!(tokens[1].is_keyword("or"));
        assert!(tokens[2].is_keyword("BETWEEN"));
    }

    #[test]
    fn test_describe_next_at_eof() {
        let ts = TokenStream::lex("").unwrap();
        assert_eq!(ts.describe_next(), "<EOF>");
    }
}
