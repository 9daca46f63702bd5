use super::{ParseError, Parser, Precedence};
use crate::ast::{
    BoolLiteral, Expression, FloatLiteral, FunctionCallExpression, GroupedExpression, IfExpression,
    InfixExpression, PrefixExpression, RTimeLiteral,
};
use crate::token::TokenKind;

impl Parser {
    /// Pratt loop. Starts at the current token; finishes with the current
    /// token on the last token of the expression.
    pub(crate) fn parse_expression(
        &mut self,
        precedence: Precedence,
    ) -> Result<Expression, ParseError> {
        let mut left = self.parse_prefix()?;
        while !self.peek_token_is(TokenKind::Semicolon) && precedence < self.peek_precedence() {
            left = match self.peek().token.kind {
                TokenKind::Equal
                | TokenKind::NotEqual
                | TokenKind::GreaterThan
                | TokenKind::GreaterThanEqual
                | TokenKind::LessThan
                | TokenKind::LessThanEqual
                | TokenKind::Match
                | TokenKind::NotMatch
                | TokenKind::Plus
                | TokenKind::And
                | TokenKind::Or => {
                    self.advance();
                    self.parse_infix_operation(left)?
                }
                // Adjacency is concatenation: a STRING, IDENT, or IF
                // expression directly following another expression.
                TokenKind::String | TokenKind::Ident | TokenKind::If => {
                    self.advance();
                    self.parse_infix_concat(left)?
                }
                TokenKind::LeftParen => {
                    self.advance();
                    self.parse_function_call_expression(left)?
                }
                // A token can carry a precedence without an infix parser;
                // that simply ends the expression.
                _ => return Ok(left),
            };
        }
        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expression, ParseError> {
        match self.cur().token.kind {
            TokenKind::Ident => Ok(Expression::Ident(self.cur_ident())),
            TokenKind::String => Ok(Expression::String(self.cur_string())),
            TokenKind::Int => self.parse_integer_literal().map(Expression::Integer),
            TokenKind::Float => {
                let value = self
                    .cur()
                    .token
                    .literal
                    .parse::<f64>()
                    .map_err(|_| ParseError::unexpected(self.cur()))?;
                Ok(Expression::Float(FloatLiteral {
                    meta: self.cur().clone(),
                    value,
                }))
            }
            TokenKind::RTime => Ok(Expression::RTime(RTimeLiteral {
                meta: self.cur().clone(),
                value: self.cur().token.literal.clone(),
            })),
            TokenKind::True | TokenKind::False => Ok(Expression::Bool(BoolLiteral {
                meta: self.cur().clone(),
                value: self.cur_token_is(TokenKind::True),
            })),
            TokenKind::Not | TokenKind::Minus => self.parse_prefix_expression(),
            TokenKind::LeftParen => self.parse_grouped_expression(),
            TokenKind::If => self.parse_if_expression(),
            _ => Err(ParseError::unexpected(self.cur())),
        }
    }

    fn parse_prefix_expression(&mut self) -> Result<Expression, ParseError> {
        let meta = self.cur().clone();
        let operator = self.cur().token.literal.clone();
        self.advance();
        let right = self.parse_expression(Precedence::Prefix)?;
        Ok(Expression::Prefix(PrefixExpression {
            meta,
            operator,
            right: Box::new(right),
        }))
    }

    fn parse_grouped_expression(&mut self) -> Result<Expression, ParseError> {
        let meta = self.cur().clone();
        self.advance();
        let right = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(TokenKind::RightParen)?;
        Ok(Expression::Group(GroupedExpression {
            meta,
            right: Box::new(right),
        }))
    }

    // Ternary builtin form: `if(cond, consequence, alternative)`.
    fn parse_if_expression(&mut self) -> Result<Expression, ParseError> {
        let meta = self.cur().clone();
        self.expect_peek(TokenKind::LeftParen)?;
        self.advance();
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(TokenKind::Comma)?;
        self.advance();
        let consequence = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(TokenKind::Comma)?;
        self.advance();
        let alternative = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(TokenKind::RightParen)?;
        Ok(Expression::IfExpr(IfExpression {
            meta,
            condition: Box::new(condition),
            consequence: Box::new(consequence),
            alternative: Box::new(alternative),
        }))
    }

    fn parse_infix_operation(&mut self, left: Expression) -> Result<Expression, ParseError> {
        let meta = self.cur().clone();
        let operator = self.cur().token.literal.clone();
        let precedence = self.cur_precedence();
        self.advance();
        let right = self.parse_expression(precedence)?;
        Ok(Expression::Infix(InfixExpression {
            meta,
            operator,
            left: Box::new(left),
            right: Box::new(right),
        }))
    }

    // The current token already is the first token of the right operand;
    // the synthetic operator is `+`.
    fn parse_infix_concat(&mut self, left: Expression) -> Result<Expression, ParseError> {
        let meta = self.cur().clone();
        let right = self.parse_expression(Precedence::Concat)?;
        Ok(Expression::Infix(InfixExpression {
            meta,
            operator: "+".to_string(),
            left: Box::new(left),
            right: Box::new(right),
        }))
    }

    fn parse_function_call_expression(&mut self, left: Expression) -> Result<Expression, ParseError> {
        let Expression::Ident(function) = left else {
            // Only a bare identifier can be called; point at what was just
            // consumed so the message lands on the callee, not the paren.
            return Err(ParseError::unexpected(self.prev()));
        };
        let arguments = self.parse_call_arguments()?;
        let meta = function.meta.clone();
        Ok(Expression::FunctionCall(FunctionCallExpression {
            meta,
            function,
            arguments,
        }))
    }
}
