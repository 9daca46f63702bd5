mod declarations;
mod expressions;
mod statements;
#[cfg(test)]
mod tests;

use thiserror::Error;

use crate::ast::{Comment, Comments, Declaration, Meta, Statement, Vcl};
use crate::diagnostics::Position;
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("lexical error at {position}: {literal:?}")]
    Lexical { literal: String, position: Position },
    #[error("unexpected token \"{token}\" at {position}")]
    UnexpectedToken { token: Token, position: Position },
}

impl ParseError {
    pub(crate) fn unexpected(meta: &Meta) -> Self {
        if meta.token.kind == TokenKind::Illegal {
            return ParseError::Lexical {
                literal: meta.token.literal.clone(),
                position: meta.position(),
            };
        }
        ParseError::UnexpectedToken {
            token: meta.token.clone(),
            position: meta.position(),
        }
    }

    pub fn position(&self) -> Position {
        match self {
            ParseError::Lexical { position, .. } => *position,
            ParseError::UnexpectedToken { position, .. } => *position,
        }
    }
}

/// Operator binding powers, lowest first. STRING/IDENT/IF sit at `Concat`
/// because adjacency is VCL's string concatenation operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Precedence {
    Lowest,
    Or,
    And,
    Regex,
    Equals,
    LessGreater,
    Concat,
    Prefix,
    Call,
}

pub(crate) fn precedence_of(kind: TokenKind) -> Precedence {
    match kind {
        TokenKind::Equal | TokenKind::NotEqual => Precedence::Equals,
        TokenKind::GreaterThan
        | TokenKind::GreaterThanEqual
        | TokenKind::LessThan
        | TokenKind::LessThanEqual => Precedence::LessGreater,
        TokenKind::Match | TokenKind::NotMatch => Precedence::Regex,
        TokenKind::Plus | TokenKind::String | TokenKind::Ident | TokenKind::If => {
            Precedence::Concat
        }
        TokenKind::LeftParen => Precedence::Call,
        TokenKind::And => Precedence::And,
        TokenKind::Or => Precedence::Or,
        _ => Precedence::Lowest,
    }
}

/// Recursive-descent VCL parser with a three-slot token window. `prev`
/// exists only so statement parsers can point error messages at what was
/// just consumed; there is no backtracking.
pub struct Parser {
    lexer: Lexer,
    prev: Meta,
    cur: Meta,
    peek: Meta,
    level: usize,
}

fn placeholder_meta() -> Meta {
    Meta::new(Token::new(TokenKind::Eof, "", 0, 0), 0, Comments::new())
}

impl Parser {
    pub fn new(lexer: Lexer) -> Self {
        let mut parser = Self {
            lexer,
            prev: placeholder_meta(),
            cur: placeholder_meta(),
            peek: placeholder_meta(),
            level: 0,
        };
        parser.advance();
        parser.advance();
        parser
    }

    pub fn from_source(source: &str) -> Self {
        Self::new(Lexer::new(source))
    }

    pub(crate) fn advance(&mut self) {
        self.prev = std::mem::replace(&mut self.cur, placeholder_meta());
        self.cur = std::mem::replace(&mut self.peek, placeholder_meta());
        self.read_peek();
    }

    // Skips LFs, folds comment runs into the next significant token's
    // leading trivia, and bumps the brace level before the meta is built so
    // a node's nesting level is the level at its first token.
    fn read_peek(&mut self) {
        let mut leading = Comments::new();
        loop {
            let token = self.lexer.next_token();
            match token.kind {
                TokenKind::Lf => continue,
                TokenKind::Comment => {
                    leading.push(Comment {
                        text: token.literal.clone(),
                        token,
                    });
                    continue;
                }
                TokenKind::LeftBrace => self.level += 1,
                TokenKind::RightBrace => self.level = self.level.saturating_sub(1),
                _ => {}
            }
            self.peek = Meta::new(token, self.level, leading);
            return;
        }
    }

    /// Harvests trailing comments for the statement that just ended.
    /// Trailing comments live on the same logical line as the statement
    /// terminator; anything past the next LF belongs to the next node.
    /// The window refill may already have folded same-line comments into
    /// the pending peek's leading buffer, so those are reclaimed first;
    /// comments the lexer has not produced yet are harvested by peeking
    /// it directly (the parser window stays put). At EOF a still-dangling
    /// leading buffer is flushed as one trailing comment so it is not
    /// lost.
    pub(crate) fn trailing(&mut self) -> Comments {
        let mut comments = Comments::new();
        let line = self.cur.token.line;

        let mut index = 0;
        while index < self.peek.leading.len() {
            if self.peek.leading[index].token.line == line {
                comments.push(self.peek.leading.remove(index));
            } else {
                index += 1;
            }
        }

        loop {
            let token = self.lexer.peek_token();
            match token.kind {
                TokenKind::Lf => break,
                TokenKind::Eof => break,
                TokenKind::Comment => {
                    comments.push(Comment {
                        text: token.literal.clone(),
                        token,
                    });
                    self.lexer.next_token();
                }
                _ => break,
            }
        }

        if self.peek.token.kind == TokenKind::Eof && !self.peek.leading.is_empty() {
            comments.push(Comment {
                text: self.peek.leading_text().trim().to_string(),
                token: self.peek.token.clone(),
            });
            self.peek.leading.clear();
        }
        comments
    }

    pub(crate) fn cur(&self) -> &Meta {
        &self.cur
    }

    pub(crate) fn prev(&self) -> &Meta {
        &self.prev
    }

    pub(crate) fn peek(&self) -> &Meta {
        &self.peek
    }

    pub(crate) fn cur_token_is(&self, kind: TokenKind) -> bool {
        self.cur.token.kind == kind
    }

    pub(crate) fn peek_token_is(&self, kind: TokenKind) -> bool {
        self.peek.token.kind == kind
    }

    pub(crate) fn expect_peek(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        if !self.peek_token_is(kind) {
            return Err(ParseError::unexpected(&self.peek));
        }
        self.advance();
        Ok(())
    }

    pub(crate) fn cur_precedence(&self) -> Precedence {
        precedence_of(self.cur.token.kind)
    }

    pub(crate) fn peek_precedence(&self) -> Precedence {
        precedence_of(self.peek.token.kind)
    }

    /// Parses a whole VCL source into its top-level declarations.
    pub fn parse_vcl(&mut self) -> Result<Vcl, ParseError> {
        let mut vcl = Vcl::default();
        while !self.cur_token_is(TokenKind::Eof) {
            vcl.declarations.push(self.parse_declaration()?);
            self.advance();
        }
        Ok(vcl)
    }

    fn parse_declaration(&mut self) -> Result<Declaration, ParseError> {
        match self.cur.token.kind {
            TokenKind::Acl => self.parse_acl_declaration().map(Declaration::Acl),
            TokenKind::Import => self.parse_import_declaration().map(Declaration::Import),
            TokenKind::Include => self.parse_include_statement().map(Declaration::Include),
            TokenKind::Backend => self.parse_backend_declaration().map(Declaration::Backend),
            TokenKind::Director => self.parse_director_declaration().map(Declaration::Director),
            TokenKind::Table => self.parse_table_declaration().map(Declaration::Table),
            TokenKind::Subroutine => self
                .parse_subroutine_declaration()
                .map(Declaration::Subroutine),
            TokenKind::Penaltybox => self
                .parse_penaltybox_declaration()
                .map(Declaration::Penaltybox),
            TokenKind::Ratecounter => self
                .parse_ratecounter_declaration()
                .map(Declaration::Ratecounter),
            _ => Err(ParseError::unexpected(&self.cur)),
        }
    }

    /// Parses a VCL snippet: a statement sequence as it would appear inside
    /// a subroutine body, including bare `{ ... }` blocks.
    pub fn parse_snippet(&mut self) -> Result<Vec<Statement>, ParseError> {
        let mut statements = Vec::new();
        while !self.peek_token_is(TokenKind::Eof) {
            statements.push(self.parse_statement()?);
            self.advance();
        }
        self.advance();
        Ok(statements)
    }
}

/// Convenience entry: lex and parse a full VCL source.
pub fn parse(source: &str) -> Result<Vcl, ParseError> {
    Parser::from_source(source).parse_vcl()
}

/// Convenience entry: lex and parse a statement snippet.
pub fn parse_snippet(source: &str) -> Result<Vec<Statement>, ParseError> {
    Parser::from_source(source).parse_snippet()
}
