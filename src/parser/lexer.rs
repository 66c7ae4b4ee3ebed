//! P lexer/tokenizer
//!
//! Converts source text into a stream of tokens, one at a time.

use std::fmt;

/// Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Number(i32),
    Ident(String),

    // Operators and punctuation
    Bang,      // !
    LParen,    // (
    RParen,    // )
    LBrace,    // {
    RBrace,    // }
    Plus,      // +
    Minus,     // -
    Star,      // *
    Slash,     // /
    Semicolon, // ;
    Comma,     // ,

    EqEq,     // ==
    LtGt,     // <>
    Lt,       // <
    LtEq,     // <=
    Gt,       // >
    GtEq,     // >=
    AmpAmp,   // &&
    PipePipe, // ||

    // Keywords
    Assign,
    To,
    If,
    Else,
    While,
    End,
    Print,
    Read,

    // Special
    Eof,
}

/// Source position (1-based line and column)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourcePos {
    pub line: usize,
    pub column: usize,
}

/// Error produced when the input cannot be tokenized
///
/// The position references the start of the offending token; for an
/// unterminated block comment it references the opening `/*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexicalError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl fmt::Display for LexicalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for LexicalError {}

/// Lexer for P source code
pub struct Lexer<'a> {
    source: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
    /// Start position of the token last returned by `next_token`
    token_pos: SourcePos,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            token_pos: SourcePos { line: 1, column: 1 },
        }
    }

    /// Get the start position of the most recently returned token
    pub fn token_pos(&self) -> SourcePos {
        self.token_pos
    }

    /// Peek at the current character without consuming it
    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    /// Peek at the next character
    fn peek_next(&self) -> Option<u8> {
        self.source.get(self.pos + 1).copied()
    }

    /// Consume the current character
    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Build a lexical error anchored at the current token's start
    fn error(&self, message: impl Into<String>) -> LexicalError {
        LexicalError {
            line: self.token_pos.line,
            column: self.token_pos.column,
            message: message.into(),
        }
    }

    /// Skip whitespace and comments
    fn skip_whitespace(&mut self) -> Result<(), LexicalError> {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => {
                    self.advance();
                }
                Some(b'/') if self.peek_next() == Some(b'/') => {
                    // Line comment
                    while let Some(c) = self.advance() {
                        if c == b'\n' {
                            break;
                        }
                    }
                }
                Some(b'/') if self.peek_next() == Some(b'*') => {
                    // Block comment; errors point at the opening `/*`
                    let open = SourcePos {
                        line: self.line,
                        column: self.column,
                    };
                    self.advance(); // /
                    self.advance(); // *
                    let mut star = false; // last consumed char was '*'
                    loop {
                        match self.advance() {
                            Some(b'*') => star = true,
                            Some(b'/') if star => break,
                            Some(_) => star = false,
                            None => {
                                return Err(LexicalError {
                                    line: open.line,
                                    column: open.column,
                                    message: "unterminated block comment".to_string(),
                                });
                            }
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    /// Read the next token
    ///
    /// Returns `Token::Eof` once the input is exhausted; further calls keep
    /// returning `Token::Eof`.
    pub fn next_token(&mut self) -> Result<Token, LexicalError> {
        self.skip_whitespace()?;
        self.token_pos = SourcePos {
            line: self.line,
            column: self.column,
        };

        let Some(c) = self.peek() else {
            return Ok(Token::Eof);
        };

        // Identifiers and keywords
        if c.is_ascii_alphabetic() || c == b'_' {
            return self.read_identifier();
        }

        // Numbers
        if c.is_ascii_digit() {
            return self.read_number();
        }

        // Operators and punctuation
        self.advance();
        match c {
            b'!' => Ok(Token::Bang),
            b'(' => Ok(Token::LParen),
            b')' => Ok(Token::RParen),
            b'{' => Ok(Token::LBrace),
            b'}' => Ok(Token::RBrace),
            b'+' => Ok(Token::Plus),
            b'-' => Ok(Token::Minus),
            b'*' => Ok(Token::Star),
            b'/' => Ok(Token::Slash),
            b';' => Ok(Token::Semicolon),
            b',' => Ok(Token::Comma),
            b'&' => match self.peek() {
                Some(b'&') => {
                    self.advance();
                    Ok(Token::AmpAmp)
                }
                _ => Err(self.error("invalid character after '&' (expected '&&')")),
            },
            b'|' => match self.peek() {
                Some(b'|') => {
                    self.advance();
                    Ok(Token::PipePipe)
                }
                _ => Err(self.error("invalid character after '|' (expected '||')")),
            },
            b'=' => match self.peek() {
                Some(b'=') => {
                    self.advance();
                    Ok(Token::EqEq)
                }
                _ => Err(self.error("invalid character after '=' (expected '==')")),
            },
            b'<' => match self.peek() {
                Some(b'>') => {
                    self.advance();
                    Ok(Token::LtGt)
                }
                Some(b'=') => {
                    self.advance();
                    Ok(Token::LtEq)
                }
                _ => Ok(Token::Lt),
            },
            b'>' => match self.peek() {
                Some(b'=') => {
                    self.advance();
                    Ok(Token::GtEq)
                }
                _ => Ok(Token::Gt),
            },
            _ => Err(self.error(format!("invalid character: '{}'", c as char))),
        }
    }

    /// Read an identifier or keyword
    fn read_identifier(&mut self) -> Result<Token, LexicalError> {
        let start = self.pos;

        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.advance();
            } else {
                break;
            }
        }

        // Scanned bytes are ASCII letters/digits/underscore only
        let lexeme = std::str::from_utf8(&self.source[start..self.pos])
            .unwrap_or("")
            .to_string();

        if lexeme.bytes().all(|b| b == b'_') {
            return Err(self.error("an identifier cannot consist solely of underscores"));
        }

        // Check for keywords
        Ok(match lexeme.as_str() {
            "assign" => Token::Assign,
            "to" => Token::To,
            "if" => Token::If,
            "else" => Token::Else,
            "while" => Token::While,
            "end" => Token::End,
            "print" => Token::Print,
            "read" => Token::Read,
            _ => Token::Ident(lexeme),
        })
    }

    /// Read a number literal
    fn read_number(&mut self) -> Result<Token, LexicalError> {
        let start = self.pos;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }

        if let Some(c) = self.peek() {
            if c.is_ascii_alphabetic() || c == b'_' {
                return Err(self.error("invalid suffix after number literal"));
            }
        }

        let digits = std::str::from_utf8(&self.source[start..self.pos]).unwrap_or("0");
        match digits.parse::<i32>() {
            Ok(n) => Ok(Token::Number(n)),
            Err(_) => Err(self.error(format!("number literal out of range: {}", digits))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token().unwrap();
            if token == Token::Eof {
                return out;
            }
            out.push(token);
        }
    }

    fn first_error(source: &str) -> LexicalError {
        let mut lexer = Lexer::new(source);
        loop {
            match lexer.next_token() {
                Ok(Token::Eof) => panic!("lexer did not fail on {source:?}"),
                Ok(_) => continue,
                Err(e) => return e,
            }
        }
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("0 42 2147483647"),
            vec![Token::Number(0), Token::Number(42), Token::Number(i32::MAX)]
        );
    }

    #[test]
    fn test_number_out_of_range() {
        let err = first_error("2147483648");
        assert!(err.message.contains("out of range"));
    }

    #[test]
    fn test_number_suffix_rejected() {
        let err = first_error("  123abc");
        assert!(err.message.contains("invalid suffix"));
        assert_eq!((err.line, err.column), (1, 3));

        assert!(first_error("7_").message.contains("invalid suffix"));
    }

    #[test]
    fn test_identifiers_and_keywords() {
        assert_eq!(
            tokens("foo assign to if else while end print read _x x_1"),
            vec![
                Token::Ident("foo".to_string()),
                Token::Assign,
                Token::To,
                Token::If,
                Token::Else,
                Token::While,
                Token::End,
                Token::Print,
                Token::Read,
                Token::Ident("_x".to_string()),
                Token::Ident("x_1".to_string()),
            ]
        );
    }

    #[test]
    fn test_underscore_only_identifier_rejected() {
        for source in ["_", "___"] {
            let err = first_error(source);
            assert!(err.message.contains("underscores"));
            assert_eq!((err.line, err.column), (1, 1));
        }
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            tokens("! ( ) { } + - * / ; , == <> < <= > >= && ||"),
            vec![
                Token::Bang,
                Token::LParen,
                Token::RParen,
                Token::LBrace,
                Token::RBrace,
                Token::Plus,
                Token::Minus,
                Token::Star,
                Token::Slash,
                Token::Semicolon,
                Token::Comma,
                Token::EqEq,
                Token::LtGt,
                Token::Lt,
                Token::LtEq,
                Token::Gt,
                Token::GtEq,
                Token::AmpAmp,
                Token::PipePipe,
            ]
        );
    }

    #[test]
    fn test_half_operators_rejected() {
        for source in ["&x", "|1", "=5", "& ", "|", "="] {
            assert!(Lexer::new(source).next_token().is_err(), "source: {source}");
        }
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            tokens("1 // comment\n2 /* block */ 3"),
            vec![Token::Number(1), Token::Number(2), Token::Number(3)]
        );
        assert_eq!(tokens("// only a comment"), vec![]);
        assert_eq!(
            tokens("1 /* multi\nline\n* comment **/ 2"),
            vec![Token::Number(1), Token::Number(2)]
        );
    }

    #[test]
    fn test_unterminated_block_comment_reports_opening_position() {
        let mut lexer = Lexer::new("assign 1 to x;\n  /* never\nclosed");
        for _ in 0..5 {
            lexer.next_token().unwrap();
        }

        let err = lexer.next_token().unwrap_err();
        assert_eq!(err.message, "unterminated block comment");
        assert_eq!((err.line, err.column), (2, 3));
    }

    #[test]
    fn test_eof_is_idempotent() {
        let mut lexer = Lexer::new("x");
        assert_eq!(lexer.next_token().unwrap(), Token::Ident("x".to_string()));
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);
    }

    #[test]
    fn test_token_positions() {
        let mut lexer = Lexer::new("assign 5\n  to x");
        lexer.next_token().unwrap();
        assert_eq!(lexer.token_pos(), SourcePos { line: 1, column: 1 });
        lexer.next_token().unwrap();
        assert_eq!(lexer.token_pos(), SourcePos { line: 1, column: 8 });
        lexer.next_token().unwrap();
        assert_eq!(lexer.token_pos(), SourcePos { line: 2, column: 3 });
        lexer.next_token().unwrap();
        assert_eq!(lexer.token_pos(), SourcePos { line: 2, column: 6 });
    }

    #[test]
    fn test_invalid_character() {
        let err = first_error("a @ b");
        assert!(err.message.contains("invalid character"));
        assert_eq!((err.line, err.column), (1, 3));
    }
}
