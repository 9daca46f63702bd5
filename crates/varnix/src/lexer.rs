use crate::token::{lookup_keyword, Token, TokenKind};

/// Hand-written VCL lexer. Produces trivia tokens (`Lf`, `Comment`) so the
/// parser can attach comments to AST nodes; faults surface as `Illegal`
/// tokens carrying the offending text.
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    peeked: Option<Token>,
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

// VCL identifiers are dotted paths (`req.http.Host`) and may contain dashes
// (`X-Cache-Hits` appears in header positions of long strings only, but
// dashes also occur in backend names).
fn is_ident_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-')
}

fn is_rtime_unit(ch: char) -> bool {
    matches!(ch, 's' | 'm' | 'h' | 'd' | 'y')
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            peeked: None,
        }
    }

    /// Next token, consuming it.
    pub fn next_token(&mut self) -> Token {
        if let Some(token) = self.peeked.take() {
            return token;
        }
        self.read_token()
    }

    /// Next token without consuming it. Idempotent: repeated calls return
    /// the same token until `next_token` is called.
    pub fn peek_token(&mut self) -> Token {
        if let Some(token) = &self.peeked {
            return token.clone();
        }
        let token = self.read_token();
        self.peeked = Some(token.clone());
        token
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn lookahead(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.current()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_spaces(&mut self) {
        while matches!(self.current(), Some(' ' | '\t' | '\r')) {
            self.bump();
        }
    }

    fn read_token(&mut self) -> Token {
        self.skip_spaces();
        let line = self.line;
        let column = self.column;

        let Some(ch) = self.current() else {
            return Token::new(TokenKind::Eof, "", line, column);
        };

        match ch {
            '\n' => {
                self.bump();
                Token::new(TokenKind::Lf, "\n", line, column)
            }
            '#' => {
                self.bump();
                self.read_line_comment(line, column)
            }
            '/' => match self.lookahead(1) {
                Some('/') => {
                    self.bump();
                    self.bump();
                    self.read_line_comment(line, column)
                }
                Some('*') => {
                    self.bump();
                    self.bump();
                    self.read_block_comment(line, column)
                }
                _ => {
                    self.bump();
                    Token::new(TokenKind::Slash, "/", line, column)
                }
            },
            '"' => {
                self.bump();
                self.read_string(line, column)
            }
            '{' => {
                if self.lookahead(1) == Some('"') {
                    self.bump();
                    self.bump();
                    self.read_long_string(line, column)
                } else {
                    self.bump();
                    Token::new(TokenKind::LeftBrace, "{", line, column)
                }
            }
            '}' => {
                self.bump();
                Token::new(TokenKind::RightBrace, "}", line, column)
            }
            '(' => {
                self.bump();
                Token::new(TokenKind::LeftParen, "(", line, column)
            }
            ')' => {
                self.bump();
                Token::new(TokenKind::RightParen, ")", line, column)
            }
            ';' => {
                self.bump();
                Token::new(TokenKind::Semicolon, ";", line, column)
            }
            ',' => {
                self.bump();
                Token::new(TokenKind::Comma, ",", line, column)
            }
            ':' => {
                self.bump();
                Token::new(TokenKind::Colon, ":", line, column)
            }
            '%' => {
                self.bump();
                Token::new(TokenKind::Percent, "%", line, column)
            }
            '.' => {
                self.bump();
                Token::new(TokenKind::Dot, ".", line, column)
            }
            '+' => {
                self.bump();
                Token::new(TokenKind::Plus, "+", line, column)
            }
            '-' => {
                self.bump();
                Token::new(TokenKind::Minus, "-", line, column)
            }
            '~' => {
                self.bump();
                Token::new(TokenKind::Match, "~", line, column)
            }
            '=' => {
                self.bump();
                if self.current() == Some('=') {
                    self.bump();
                    Token::new(TokenKind::Equal, "==", line, column)
                } else {
                    Token::new(TokenKind::Assign, "=", line, column)
                }
            }
            '!' => {
                self.bump();
                match self.current() {
                    Some('=') => {
                        self.bump();
                        Token::new(TokenKind::NotEqual, "!=", line, column)
                    }
                    Some('~') => {
                        self.bump();
                        Token::new(TokenKind::NotMatch, "!~", line, column)
                    }
                    _ => Token::new(TokenKind::Not, "!", line, column),
                }
            }
            '>' => {
                self.bump();
                if self.current() == Some('=') {
                    self.bump();
                    Token::new(TokenKind::GreaterThanEqual, ">=", line, column)
                } else {
                    Token::new(TokenKind::GreaterThan, ">", line, column)
                }
            }
            '<' => {
                self.bump();
                if self.current() == Some('=') {
                    self.bump();
                    Token::new(TokenKind::LessThanEqual, "<=", line, column)
                } else {
                    Token::new(TokenKind::LessThan, "<", line, column)
                }
            }
            '&' => {
                self.bump();
                if self.current() == Some('&') {
                    self.bump();
                    Token::new(TokenKind::And, "&&", line, column)
                } else {
                    Token::new(TokenKind::Illegal, "&", line, column)
                }
            }
            '|' => {
                self.bump();
                if self.current() == Some('|') {
                    self.bump();
                    Token::new(TokenKind::Or, "||", line, column)
                } else {
                    Token::new(TokenKind::Illegal, "|", line, column)
                }
            }
            ch if ch.is_ascii_digit() => self.read_number(line, column),
            ch if is_ident_start(ch) => self.read_ident(line, column),
            other => {
                self.bump();
                Token::new(TokenKind::Illegal, other.to_string(), line, column)
            }
        }
    }

    fn read_line_comment(&mut self, line: usize, column: usize) -> Token {
        let mut text = String::new();
        while let Some(ch) = self.current() {
            if ch == '\n' {
                break;
            }
            text.push(ch);
            self.bump();
        }
        Token::new(TokenKind::Comment, text, line, column)
    }

    fn read_block_comment(&mut self, line: usize, column: usize) -> Token {
        let mut text = String::new();
        loop {
            match self.current() {
                None => {
                    return Token::new(TokenKind::Illegal, format!("/*{text}"), line, column);
                }
                Some('*') if self.lookahead(1) == Some('/') => {
                    self.bump();
                    self.bump();
                    return Token::new(TokenKind::Comment, text, line, column);
                }
                Some(ch) => {
                    text.push(ch);
                    self.bump();
                }
            }
        }
    }

    // VCL short strings do not process backslash escapes; the literal runs
    // to the next double quote.
    fn read_string(&mut self, line: usize, column: usize) -> Token {
        let mut text = String::new();
        loop {
            match self.current() {
                None | Some('\n') => {
                    return Token::new(TokenKind::Illegal, format!("\"{text}"), line, column);
                }
                Some('"') => {
                    self.bump();
                    return Token::new(TokenKind::String, text, line, column);
                }
                Some(ch) => {
                    text.push(ch);
                    self.bump();
                }
            }
        }
    }

    // Long strings `{"..."}` may contain quotes and newlines; they end at
    // the first `"}` sequence.
    fn read_long_string(&mut self, line: usize, column: usize) -> Token {
        let mut text = String::new();
        loop {
            match self.current() {
                None => {
                    return Token::new(TokenKind::Illegal, format!("{{\"{text}"), line, column);
                }
                Some('"') if self.lookahead(1) == Some('}') => {
                    self.bump();
                    self.bump();
                    return Token::new(TokenKind::String, text, line, column);
                }
                Some(ch) => {
                    text.push(ch);
                    self.bump();
                }
            }
        }
    }

    fn read_number(&mut self, line: usize, column: usize) -> Token {
        let mut text = String::new();
        let mut is_float = false;
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.bump();
            } else if ch == '.' && !is_float && self.lookahead(1).is_some_and(|c| c.is_ascii_digit())
            {
                is_float = true;
                text.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        // A trailing duration unit turns the number into an rtime literal:
        // 1s, 10m, 2.5h, 100ms, 30d, 1y.
        if self.current() == Some('m')
            && self.lookahead(1) == Some('s')
            && !self.lookahead(2).is_some_and(is_ident_continue)
        {
            text.push('m');
            text.push('s');
            self.bump();
            self.bump();
            return Token::new(TokenKind::RTime, text, line, column);
        }
        if let Some(unit) = self.current().filter(|&ch| is_rtime_unit(ch)) {
            // Only when the unit is not the start of a longer identifier
            // (`10seconds` stays illegal-adjacent, `10s` is an rtime).
            if !self.lookahead(1).is_some_and(is_ident_continue) {
                text.push(unit);
                self.bump();
                return Token::new(TokenKind::RTime, text, line, column);
            }
        }
        let kind = if is_float {
            TokenKind::Float
        } else {
            TokenKind::Int
        };
        Token::new(kind, text, line, column)
    }

    fn read_ident(&mut self, line: usize, column: usize) -> Token {
        let mut text = String::new();
        while let Some(ch) = self.current() {
            if is_ident_continue(ch) {
                text.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        let kind = lookup_keyword(&text).unwrap_or(TokenKind::Ident);
        Token::new(kind, text, line, column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token();
            let kind = token.kind;
            out.push(kind);
            if kind == TokenKind::Eof {
                return out;
            }
        }
    }

    #[test]
    fn lexes_backend_declaration() {
        let got = kinds(r#"backend b { .host = "127.0.0.1"; }"#);
        assert_eq!(
            got,
            vec![
                TokenKind::Backend,
                TokenKind::Ident,
                TokenKind::LeftBrace,
                TokenKind::Dot,
                TokenKind::Ident,
                TokenKind::Assign,
                TokenKind::String,
                TokenKind::Semicolon,
                TokenKind::RightBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keeps_dotted_identifiers_whole() {
        let mut lexer = Lexer::new("set req.http.Host = synthetic.base64");
        assert_eq!(lexer.next_token().kind, TokenKind::Set);
        let ident = lexer.next_token();
        assert_eq!(ident.kind, TokenKind::Ident);
        assert_eq!(ident.literal, "req.http.Host");
        assert_eq!(lexer.next_token().kind, TokenKind::Assign);
        assert_eq!(lexer.next_token().kind, TokenKind::SyntheticBase64);
    }

    #[test]
    fn lexes_operators() {
        let got = kinds("== != ~ !~ < <= > >= + && || !");
        assert_eq!(
            got,
            vec![
                TokenKind::Equal,
                TokenKind::NotEqual,
                TokenKind::Match,
                TokenKind::NotMatch,
                TokenKind::LessThan,
                TokenKind::LessThanEqual,
                TokenKind::GreaterThan,
                TokenKind::GreaterThanEqual,
                TokenKind::Plus,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Not,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_rtime_literals() {
        let mut lexer = Lexer::new("1s 2.5h 100ms 30d 10");
        for expected in ["1s", "2.5h", "100ms", "30d"] {
            let token = lexer.next_token();
            assert_eq!(token.kind, TokenKind::RTime, "literal {expected}");
            assert_eq!(token.literal, expected);
        }
        assert_eq!(lexer.next_token().kind, TokenKind::Int);
    }

    #[test]
    fn lexes_comments_and_lf_as_trivia() {
        let got = kinds("# leading\nset // trailing\n/* block */ restart");
        assert_eq!(
            got,
            vec![
                TokenKind::Comment,
                TokenKind::Lf,
                TokenKind::Set,
                TokenKind::Comment,
                TokenKind::Lf,
                TokenKind::Comment,
                TokenKind::Restart,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn long_string_spans_lines() {
        let mut lexer = Lexer::new("{\"line one\nline \"two\"\"} ;");
        let token = lexer.next_token();
        assert_eq!(token.kind, TokenKind::String);
        assert_eq!(token.literal, "line one\nline \"two\"");
        assert_eq!(lexer.next_token().kind, TokenKind::Semicolon);
    }

    #[test]
    fn peek_is_idempotent() {
        let mut lexer = Lexer::new("acl a");
        let first = lexer.peek_token();
        let second = lexer.peek_token();
        assert_eq!(first, second);
        assert_eq!(lexer.next_token(), first);
        assert_eq!(lexer.next_token().kind, TokenKind::Ident);
    }

    #[test]
    fn tracks_positions() {
        let mut lexer = Lexer::new("set\n  unset");
        let set = lexer.next_token();
        assert_eq!((set.line, set.column), (1, 1));
        lexer.next_token(); // LF
        let unset = lexer.next_token();
        assert_eq!((unset.line, unset.column), (2, 3));
    }

    #[test]
    fn unterminated_string_is_illegal() {
        let mut lexer = Lexer::new("\"never closed");
        assert_eq!(lexer.next_token().kind, TokenKind::Illegal);
    }
}
