use super::{ParseError, Parser, Precedence};
use crate::ast::{
    AddStatement, BlockStatement, CallStatement, DeclareStatement, ErrorStatement, EsiStatement,
    Expression, FunctionCallStatement, GotoDestinationStatement, GotoStatement, Ident, IfStatement,
    IncludeStmt, LogStatement, RemoveStatement, RestartStatement, ReturnStatement, SetStatement,
    Statement, StringLiteral, SyntheticBase64Statement, SyntheticStatement, UnsetStatement,
};
use crate::token::TokenKind;

impl Parser {
    pub(super) fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        match self.cur().token.kind {
            // Bare nested blocks are legal inside subroutine bodies.
            TokenKind::LeftBrace => self.parse_block_statement().map(Statement::Block),
            TokenKind::Set => self.parse_set_statement().map(Statement::Set),
            TokenKind::Unset => self.parse_unset_statement().map(Statement::Unset),
            TokenKind::Remove => self.parse_remove_statement().map(Statement::Remove),
            TokenKind::Add => self.parse_add_statement().map(Statement::Add),
            TokenKind::Call => self.parse_call_statement().map(Statement::Call),
            TokenKind::Declare => self.parse_declare_statement().map(Statement::Declare),
            TokenKind::Error => self.parse_error_statement().map(Statement::Error),
            TokenKind::Esi => self.parse_esi_statement().map(Statement::Esi),
            TokenKind::Log => self.parse_log_statement().map(Statement::Log),
            TokenKind::Restart => self.parse_restart_statement().map(Statement::Restart),
            TokenKind::Return => self.parse_return_statement().map(Statement::Return),
            TokenKind::Synthetic => self.parse_synthetic_statement().map(Statement::Synthetic),
            TokenKind::SyntheticBase64 => self
                .parse_synthetic_base64_statement()
                .map(Statement::SyntheticBase64),
            TokenKind::If => self.parse_if_statement().map(Statement::If),
            TokenKind::Goto => self.parse_goto_statement().map(Statement::Goto),
            TokenKind::Include => self.parse_include_statement().map(Statement::Include),
            TokenKind::Ident => {
                if self.peek_token_is(TokenKind::LeftParen) {
                    self.parse_function_call_statement()
                        .map(Statement::FunctionCall)
                } else {
                    self.parse_goto_destination()
                        .map(Statement::GotoDestination)
                }
            }
            _ => Err(ParseError::unexpected(self.cur())),
        }
    }

    pub(super) fn cur_ident(&self) -> Ident {
        Ident {
            value: self.cur().token.literal.clone(),
            meta: self.cur().clone(),
        }
    }

    pub(super) fn cur_string(&self) -> StringLiteral {
        StringLiteral {
            value: self.cur().token.literal.clone(),
            meta: self.cur().clone(),
        }
    }

    /// Parses `{ ... }`; on return the current token is the closing brace.
    pub(super) fn parse_block_statement(&mut self) -> Result<BlockStatement, ParseError> {
        let meta = self.cur().clone();
        let mut statements = Vec::new();
        while !self.peek_token_is(TokenKind::RightBrace) {
            self.advance();
            statements.push(self.parse_statement()?);
        }
        self.advance();
        Ok(BlockStatement { meta, statements })
    }

    fn parse_set_statement(&mut self) -> Result<SetStatement, ParseError> {
        let mut meta = self.cur().clone();
        self.expect_peek(TokenKind::Ident)?;
        let ident = self.cur_ident();
        self.expect_peek(TokenKind::Assign)?;
        let operator = self.cur().token.clone();
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(TokenKind::Semicolon)?;
        meta.trailing = self.trailing();
        Ok(SetStatement {
            meta,
            ident,
            operator,
            value,
        })
    }

    fn parse_add_statement(&mut self) -> Result<AddStatement, ParseError> {
        let mut meta = self.cur().clone();
        self.expect_peek(TokenKind::Ident)?;
        let ident = self.cur_ident();
        self.expect_peek(TokenKind::Assign)?;
        let operator = self.cur().token.clone();
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(TokenKind::Semicolon)?;
        meta.trailing = self.trailing();
        Ok(AddStatement {
            meta,
            ident,
            operator,
            value,
        })
    }

    fn parse_unset_statement(&mut self) -> Result<UnsetStatement, ParseError> {
        let mut meta = self.cur().clone();
        self.expect_peek(TokenKind::Ident)?;
        let ident = self.cur_ident();
        self.expect_peek(TokenKind::Semicolon)?;
        meta.trailing = self.trailing();
        Ok(UnsetStatement { meta, ident })
    }

    fn parse_remove_statement(&mut self) -> Result<RemoveStatement, ParseError> {
        let mut meta = self.cur().clone();
        self.expect_peek(TokenKind::Ident)?;
        let ident = self.cur_ident();
        self.expect_peek(TokenKind::Semicolon)?;
        meta.trailing = self.trailing();
        Ok(RemoveStatement { meta, ident })
    }

    fn parse_call_statement(&mut self) -> Result<CallStatement, ParseError> {
        let mut meta = self.cur().clone();
        self.expect_peek(TokenKind::Ident)?;
        let subroutine = self.cur_ident();
        self.expect_peek(TokenKind::Semicolon)?;
        meta.trailing = self.trailing();
        Ok(CallStatement { meta, subroutine })
    }

    // `declare local var.name TYPE;`
    fn parse_declare_statement(&mut self) -> Result<DeclareStatement, ParseError> {
        let mut meta = self.cur().clone();
        self.expect_peek(TokenKind::Ident)?;
        if self.cur().token.literal != "local" {
            return Err(ParseError::unexpected(self.cur()));
        }
        self.expect_peek(TokenKind::Ident)?;
        let name = self.cur_ident();
        self.expect_peek(TokenKind::Ident)?;
        let value_type = self.cur_ident();
        self.expect_peek(TokenKind::Semicolon)?;
        meta.trailing = self.trailing();
        Ok(DeclareStatement {
            meta,
            name,
            value_type,
        })
    }

    // `error;` | `error 503;` | `error 503 "forbidden";`
    // The status parses at PREFIX binding power so an adjacent message
    // string is not swallowed by juxtaposition concat.
    fn parse_error_statement(&mut self) -> Result<ErrorStatement, ParseError> {
        let mut meta = self.cur().clone();
        let mut code = None;
        let mut argument = None;
        if !self.peek_token_is(TokenKind::Semicolon) {
            self.advance();
            code = Some(self.parse_expression(Precedence::Prefix)?);
            if !self.peek_token_is(TokenKind::Semicolon) {
                self.advance();
                argument = Some(self.parse_expression(Precedence::Lowest)?);
            }
        }
        self.expect_peek(TokenKind::Semicolon)?;
        meta.trailing = self.trailing();
        Ok(ErrorStatement {
            meta,
            code,
            argument,
        })
    }

    fn parse_esi_statement(&mut self) -> Result<EsiStatement, ParseError> {
        let mut meta = self.cur().clone();
        self.expect_peek(TokenKind::Semicolon)?;
        meta.trailing = self.trailing();
        Ok(EsiStatement { meta })
    }

    fn parse_log_statement(&mut self) -> Result<LogStatement, ParseError> {
        let mut meta = self.cur().clone();
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(TokenKind::Semicolon)?;
        meta.trailing = self.trailing();
        Ok(LogStatement { meta, value })
    }

    fn parse_restart_statement(&mut self) -> Result<RestartStatement, ParseError> {
        let mut meta = self.cur().clone();
        self.expect_peek(TokenKind::Semicolon)?;
        meta.trailing = self.trailing();
        Ok(RestartStatement { meta })
    }

    fn parse_return_statement(&mut self) -> Result<ReturnStatement, ParseError> {
        let mut meta = self.cur().clone();
        if self.peek_token_is(TokenKind::Semicolon) {
            self.advance();
            meta.trailing = self.trailing();
            return Ok(ReturnStatement {
                meta,
                value: None,
                has_parenthesis: false,
            });
        }
        let has_parenthesis = self.peek_token_is(TokenKind::LeftParen);
        if has_parenthesis {
            self.advance();
        }
        self.advance();
        let value = Some(self.parse_expression(Precedence::Lowest)?);
        if has_parenthesis {
            self.expect_peek(TokenKind::RightParen)?;
        }
        self.expect_peek(TokenKind::Semicolon)?;
        meta.trailing = self.trailing();
        Ok(ReturnStatement {
            meta,
            value,
            has_parenthesis,
        })
    }

    fn parse_synthetic_statement(&mut self) -> Result<SyntheticStatement, ParseError> {
        let mut meta = self.cur().clone();
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(TokenKind::Semicolon)?;
        meta.trailing = self.trailing();
        Ok(SyntheticStatement { meta, value })
    }

    fn parse_synthetic_base64_statement(
        &mut self,
    ) -> Result<SyntheticBase64Statement, ParseError> {
        let mut meta = self.cur().clone();
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(TokenKind::Semicolon)?;
        meta.trailing = self.trailing();
        Ok(SyntheticBase64Statement { meta, value })
    }

    fn parse_if_statement(&mut self) -> Result<IfStatement, ParseError> {
        let mut stmt = self.parse_if_arm()?;
        loop {
            match self.peek().token.kind {
                TokenKind::Else => {
                    self.advance();
                    if self.peek_token_is(TokenKind::If) {
                        self.advance();
                        let another = self.parse_if_arm()?;
                        stmt.another.push(another);
                    } else {
                        self.expect_peek(TokenKind::LeftBrace)?;
                        stmt.alternative = Some(self.parse_block_statement()?);
                        break;
                    }
                }
                TokenKind::Elseif | TokenKind::Elsif => {
                    self.advance();
                    let another = self.parse_if_arm()?;
                    stmt.another.push(another);
                }
                _ => break,
            }
        }
        stmt.meta.trailing = self.trailing();
        Ok(stmt)
    }

    // One `if (cond) { ... }` arm without its else chain; shared by the
    // leading `if` and every `else if`/`elseif`/`elsif`.
    fn parse_if_arm(&mut self) -> Result<IfStatement, ParseError> {
        let meta = self.cur().clone();
        self.expect_peek(TokenKind::LeftParen)?;
        self.advance();
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(TokenKind::RightParen)?;
        self.expect_peek(TokenKind::LeftBrace)?;
        let consequence = self.parse_block_statement()?;
        Ok(IfStatement {
            meta,
            condition,
            consequence,
            another: Vec::new(),
            alternative: None,
        })
    }

    fn parse_goto_statement(&mut self) -> Result<GotoStatement, ParseError> {
        let mut meta = self.cur().clone();
        self.expect_peek(TokenKind::Ident)?;
        let destination = self.cur_ident();
        self.expect_peek(TokenKind::Semicolon)?;
        meta.trailing = self.trailing();
        Ok(GotoStatement { meta, destination })
    }

    // A bare `label:` statement.
    fn parse_goto_destination(&mut self) -> Result<GotoDestinationStatement, ParseError> {
        let mut meta = self.cur().clone();
        let name = self.cur_ident();
        self.expect_peek(TokenKind::Colon)?;
        meta.trailing = self.trailing();
        Ok(GotoDestinationStatement { meta, name })
    }

    fn parse_function_call_statement(&mut self) -> Result<FunctionCallStatement, ParseError> {
        let mut meta = self.cur().clone();
        let function = self.cur_ident();
        self.advance(); // onto '('
        let arguments = self.parse_call_arguments()?;
        self.expect_peek(TokenKind::Semicolon)?;
        meta.trailing = self.trailing();
        Ok(FunctionCallStatement {
            meta,
            function,
            arguments,
        })
    }

    /// Argument list with the current token on `(`; leaves the current
    /// token on `)`.
    pub(super) fn parse_call_arguments(&mut self) -> Result<Vec<Expression>, ParseError> {
        let mut arguments = Vec::new();
        if self.peek_token_is(TokenKind::RightParen) {
            self.advance();
            return Ok(arguments);
        }
        self.advance();
        arguments.push(self.parse_expression(Precedence::Lowest)?);
        while self.peek_token_is(TokenKind::Comma) {
            self.advance();
            self.advance();
            arguments.push(self.parse_expression(Precedence::Lowest)?);
        }
        self.expect_peek(TokenKind::RightParen)?;
        Ok(arguments)
    }

    pub(super) fn parse_include_statement(&mut self) -> Result<IncludeStmt, ParseError> {
        let mut meta = self.cur().clone();
        self.expect_peek(TokenKind::String)?;
        let path = self.cur_string();
        self.expect_peek(TokenKind::Semicolon)?;
        meta.trailing = self.trailing();
        Ok(IncludeStmt { meta, path })
    }
}
