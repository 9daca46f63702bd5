use super::{ParseError, Parser, Precedence};
use crate::ast::{
    AclDecl, AclEntry, BackendDecl, BackendProperty, BackendPropertyValue, DirectorBackend, DirectorDecl,
    DirectorEntry, DirectorProperty, ImportDecl, IntegerLiteral, PenaltyboxDecl, RatecounterDecl,
    SubroutineDecl, TableDecl, TableEntry,
};
use crate::token::TokenKind;

impl Parser {
    pub(super) fn parse_acl_declaration(&mut self) -> Result<AclDecl, ParseError> {
        let meta = self.cur().clone();
        self.expect_peek(TokenKind::Ident)?;
        let name = self.cur_ident();
        self.expect_peek(TokenKind::LeftBrace)?;
        let mut entries = Vec::new();
        while !self.peek_token_is(TokenKind::RightBrace) {
            self.advance();
            entries.push(self.parse_acl_entry()?);
        }
        self.advance();
        Ok(AclDecl {
            meta,
            name,
            entries,
        })
    }

    // `"192.0.2.0"/24;` or `!"192.0.2.12";`
    fn parse_acl_entry(&mut self) -> Result<AclEntry, ParseError> {
        let mut meta = self.cur().clone();
        let inverse = self.cur_token_is(TokenKind::Not);
        if inverse {
            self.advance();
        }
        if !self.cur_token_is(TokenKind::String) {
            return Err(ParseError::unexpected(self.cur()));
        }
        let address = self.cur_string();
        let mask = if self.peek_token_is(TokenKind::Slash) {
            self.advance();
            self.expect_peek(TokenKind::Int)?;
            Some(self.parse_integer_literal()?)
        } else {
            None
        };
        self.expect_peek(TokenKind::Semicolon)?;
        meta.trailing = self.trailing();
        Ok(AclEntry {
            meta,
            inverse,
            address,
            mask,
        })
    }

    pub(super) fn parse_integer_literal(&mut self) -> Result<IntegerLiteral, ParseError> {
        let value = self
            .cur()
            .token
            .literal
            .parse::<i64>()
            .map_err(|_| ParseError::unexpected(self.cur()))?;
        Ok(IntegerLiteral {
            meta: self.cur().clone(),
            value,
        })
    }

    pub(super) fn parse_backend_declaration(&mut self) -> Result<BackendDecl, ParseError> {
        let meta = self.cur().clone();
        self.expect_peek(TokenKind::Ident)?;
        let name = self.cur_ident();
        self.expect_peek(TokenKind::LeftBrace)?;
        let mut properties = Vec::new();
        while !self.peek_token_is(TokenKind::RightBrace) {
            self.advance();
            properties.push(self.parse_backend_property()?);
        }
        self.advance();
        Ok(BackendDecl {
            meta,
            name,
            properties,
        })
    }

    // `.host = "origin.example.com";` or a nested object such as
    // `.probe = { .request = "GET / HTTP/1.1"; }`.
    fn parse_backend_property(&mut self) -> Result<BackendProperty, ParseError> {
        let mut meta = self.cur().clone();
        if !self.cur_token_is(TokenKind::Dot) {
            return Err(ParseError::unexpected(self.cur()));
        }
        self.expect_peek(TokenKind::Ident)?;
        let key = self.cur_ident();
        self.expect_peek(TokenKind::Assign)?;
        let value = if self.peek_token_is(TokenKind::LeftBrace) {
            self.advance();
            let mut nested = Vec::new();
            while !self.peek_token_is(TokenKind::RightBrace) {
                self.advance();
                nested.push(self.parse_backend_property()?);
            }
            self.advance();
            // The closing brace ends the object; a trailing semicolon is
            // accepted but not required.
            if self.peek_token_is(TokenKind::Semicolon) {
                self.advance();
            }
            BackendPropertyValue::Object(nested)
        } else {
            self.advance();
            let expr = self.parse_expression(Precedence::Lowest)?;
            self.expect_peek(TokenKind::Semicolon)?;
            BackendPropertyValue::Expression(expr)
        };
        meta.trailing = self.trailing();
        Ok(BackendProperty { meta, key, value })
    }

    pub(super) fn parse_director_declaration(&mut self) -> Result<DirectorDecl, ParseError> {
        let meta = self.cur().clone();
        self.expect_peek(TokenKind::Ident)?;
        let name = self.cur_ident();
        self.expect_peek(TokenKind::Ident)?;
        let director_type = self.cur_ident();
        self.expect_peek(TokenKind::LeftBrace)?;
        let mut entries = Vec::new();
        while !self.peek_token_is(TokenKind::RightBrace) {
            self.advance();
            match self.cur().token.kind {
                TokenKind::Dot => {
                    entries.push(DirectorEntry::Property(self.parse_director_property()?));
                }
                TokenKind::LeftBrace => {
                    entries.push(DirectorEntry::Backend(self.parse_director_backend()?));
                }
                _ => return Err(ParseError::unexpected(self.cur())),
            }
        }
        self.advance();
        Ok(DirectorDecl {
            meta,
            name,
            director_type,
            entries,
        })
    }

    fn parse_director_property(&mut self) -> Result<DirectorProperty, ParseError> {
        let mut meta = self.cur().clone();
        self.expect_peek(TokenKind::Ident)?;
        let key = self.cur_ident();
        self.expect_peek(TokenKind::Assign)?;
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        // `.quorum = 50%;` — the percent sign is part of the property
        // syntax, not a value kind.
        if self.peek_token_is(TokenKind::Percent) {
            self.advance();
        }
        self.expect_peek(TokenKind::Semicolon)?;
        meta.trailing = self.trailing();
        Ok(DirectorProperty { meta, key, value })
    }

    // `{ .backend = origin_0; .weight = 1; }`
    fn parse_director_backend(&mut self) -> Result<DirectorBackend, ParseError> {
        let mut meta = self.cur().clone();
        let mut properties = Vec::new();
        while !self.peek_token_is(TokenKind::RightBrace) {
            self.advance();
            if !self.cur_token_is(TokenKind::Dot) {
                return Err(ParseError::unexpected(self.cur()));
            }
            properties.push(self.parse_director_property()?);
        }
        self.advance();
        meta.trailing = self.trailing();
        Ok(DirectorBackend { meta, properties })
    }

    pub(super) fn parse_table_declaration(&mut self) -> Result<TableDecl, ParseError> {
        let meta = self.cur().clone();
        self.expect_peek(TokenKind::Ident)?;
        let name = self.cur_ident();
        // Optional value type: `table routes BACKEND { ... }`.
        let value_type = if self.peek_token_is(TokenKind::Ident) {
            self.advance();
            Some(self.cur_ident())
        } else {
            None
        };
        self.expect_peek(TokenKind::LeftBrace)?;
        let mut entries = Vec::new();
        while !self.peek_token_is(TokenKind::RightBrace) {
            self.advance();
            entries.push(self.parse_table_entry()?);
        }
        self.advance();
        Ok(TableDecl {
            meta,
            name,
            value_type,
            entries,
        })
    }

    // `"key": "value",` — the comma after the last entry is optional.
    fn parse_table_entry(&mut self) -> Result<TableEntry, ParseError> {
        let mut meta = self.cur().clone();
        if !self.cur_token_is(TokenKind::String) {
            return Err(ParseError::unexpected(self.cur()));
        }
        let key = self.cur_string();
        self.expect_peek(TokenKind::Colon)?;
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        if self.peek_token_is(TokenKind::Comma) {
            self.advance();
        }
        meta.trailing = self.trailing();
        Ok(TableEntry { meta, key, value })
    }

    pub(super) fn parse_subroutine_declaration(&mut self) -> Result<SubroutineDecl, ParseError> {
        let mut meta = self.cur().clone();
        self.expect_peek(TokenKind::Ident)?;
        let name = self.cur_ident();
        // Functional subroutines carry a return type before the body.
        let return_type = if self.peek_token_is(TokenKind::Ident) {
            self.advance();
            Some(self.cur_ident())
        } else {
            None
        };
        self.expect_peek(TokenKind::LeftBrace)?;
        let block = self.parse_block_statement()?;
        meta.trailing = self.trailing();
        Ok(SubroutineDecl {
            meta,
            name,
            return_type,
            block,
        })
    }

    pub(super) fn parse_penaltybox_declaration(&mut self) -> Result<PenaltyboxDecl, ParseError> {
        let mut meta = self.cur().clone();
        self.expect_peek(TokenKind::Ident)?;
        let name = self.cur_ident();
        self.expect_peek(TokenKind::LeftBrace)?;
        let block = self.parse_block_statement()?;
        meta.trailing = self.trailing();
        Ok(PenaltyboxDecl { meta, name, block })
    }

    pub(super) fn parse_ratecounter_declaration(&mut self) -> Result<RatecounterDecl, ParseError> {
        let mut meta = self.cur().clone();
        self.expect_peek(TokenKind::Ident)?;
        let name = self.cur_ident();
        self.expect_peek(TokenKind::LeftBrace)?;
        let block = self.parse_block_statement()?;
        meta.trailing = self.trailing();
        Ok(RatecounterDecl { meta, name, block })
    }

    pub(super) fn parse_import_declaration(&mut self) -> Result<ImportDecl, ParseError> {
        let mut meta = self.cur().clone();
        self.expect_peek(TokenKind::Ident)?;
        let name = self.cur_ident();
        self.expect_peek(TokenKind::Semicolon)?;
        meta.trailing = self.trailing();
        Ok(ImportDecl { meta, name })
    }
}
