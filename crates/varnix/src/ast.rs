use crate::diagnostics::Position;
use crate::token::Token;

/// A single comment attached to a node, either leading or trailing.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub token: Token,
    pub text: String,
}

pub type Comments = Vec<Comment>;

/// Metadata attached to every AST node: the first token of the node, the
/// brace-nesting level at that token, and the comment trivia the parser
/// folded onto it. Trailing comments are filled at statement boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct Meta {
    pub token: Token,
    pub nest_level: usize,
    pub leading: Comments,
    pub trailing: Comments,
}

impl Meta {
    pub fn new(token: Token, nest_level: usize, leading: Comments) -> Self {
        Self {
            token,
            nest_level,
            leading,
            trailing: Comments::new(),
        }
    }

    pub fn position(&self) -> Position {
        self.token.position()
    }

    /// Leading comments joined into one string, used when a dangling
    /// comment buffer has to be flushed at EOF.
    pub fn leading_text(&self) -> String {
        self.leading
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Vcl {
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Acl(AclDecl),
    Backend(BackendDecl),
    Director(DirectorDecl),
    Table(TableDecl),
    Subroutine(SubroutineDecl),
    Penaltybox(PenaltyboxDecl),
    Ratecounter(RatecounterDecl),
    Import(ImportDecl),
    Include(IncludeStmt),
}

impl Declaration {
    pub fn meta(&self) -> &Meta {
        match self {
            Declaration::Acl(d) => &d.meta,
            Declaration::Backend(d) => &d.meta,
            Declaration::Director(d) => &d.meta,
            Declaration::Table(d) => &d.meta,
            Declaration::Subroutine(d) => &d.meta,
            Declaration::Penaltybox(d) => &d.meta,
            Declaration::Ratecounter(d) => &d.meta,
            Declaration::Import(d) => &d.meta,
            Declaration::Include(d) => &d.meta,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Declaration::Acl(d) => Some(&d.name.value),
            Declaration::Backend(d) => Some(&d.name.value),
            Declaration::Director(d) => Some(&d.name.value),
            Declaration::Table(d) => Some(&d.name.value),
            Declaration::Subroutine(d) => Some(&d.name.value),
            Declaration::Penaltybox(d) => Some(&d.name.value),
            Declaration::Ratecounter(d) => Some(&d.name.value),
            Declaration::Import(d) => Some(&d.name.value),
            Declaration::Include(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AclDecl {
    pub meta: Meta,
    pub name: Ident,
    pub entries: Vec<AclEntry>,
}

/// One ACL entry: `"192.0.2.0"/24;` or `!"192.0.2.12";`.
#[derive(Debug, Clone, PartialEq)]
pub struct AclEntry {
    pub meta: Meta,
    pub inverse: bool,
    pub address: StringLiteral,
    pub mask: Option<IntegerLiteral>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendDecl {
    pub meta: Meta,
    pub name: Ident,
    pub properties: Vec<BackendProperty>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendProperty {
    pub meta: Meta,
    pub key: Ident,
    pub value: BackendPropertyValue,
}

/// Backend property values are either plain expressions or a nested object
/// (`.probe = { .request = ...; }`).
#[derive(Debug, Clone, PartialEq)]
pub enum BackendPropertyValue {
    Expression(Expression),
    Object(Vec<BackendProperty>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectorDecl {
    pub meta: Meta,
    pub name: Ident,
    pub director_type: Ident,
    pub entries: Vec<DirectorEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DirectorEntry {
    Property(DirectorProperty),
    Backend(DirectorBackend),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectorProperty {
    pub meta: Meta,
    pub key: Ident,
    pub value: Expression,
}

/// A brace-wrapped backend entry inside a director:
/// `{ .backend = origin; .weight = 1; }`.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectorBackend {
    pub meta: Meta,
    pub properties: Vec<DirectorProperty>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableDecl {
    pub meta: Meta,
    pub name: Ident,
    pub value_type: Option<Ident>,
    pub entries: Vec<TableEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableEntry {
    pub meta: Meta,
    pub key: StringLiteral,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubroutineDecl {
    pub meta: Meta,
    pub name: Ident,
    /// Present for functional subroutines: `sub get_region STRING { ... }`.
    pub return_type: Option<Ident>,
    pub block: BlockStatement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PenaltyboxDecl {
    pub meta: Meta,
    pub name: Ident,
    pub block: BlockStatement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RatecounterDecl {
    pub meta: Meta,
    pub name: Ident,
    pub block: BlockStatement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub meta: Meta,
    pub name: Ident,
}

/// `include "mod";` — legal both at the top level and inside subroutines.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeStmt {
    pub meta: Meta,
    pub path: StringLiteral,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Block(BlockStatement),
    Set(SetStatement),
    Unset(UnsetStatement),
    Remove(RemoveStatement),
    Add(AddStatement),
    Call(CallStatement),
    Declare(DeclareStatement),
    Error(ErrorStatement),
    Esi(EsiStatement),
    Log(LogStatement),
    Restart(RestartStatement),
    Return(ReturnStatement),
    Synthetic(SyntheticStatement),
    SyntheticBase64(SyntheticBase64Statement),
    If(IfStatement),
    Goto(GotoStatement),
    GotoDestination(GotoDestinationStatement),
    FunctionCall(FunctionCallStatement),
    Include(IncludeStmt),
}

impl Statement {
    pub fn meta(&self) -> &Meta {
        match self {
            Statement::Block(s) => &s.meta,
            Statement::Set(s) => &s.meta,
            Statement::Unset(s) => &s.meta,
            Statement::Remove(s) => &s.meta,
            Statement::Add(s) => &s.meta,
            Statement::Call(s) => &s.meta,
            Statement::Declare(s) => &s.meta,
            Statement::Error(s) => &s.meta,
            Statement::Esi(s) => &s.meta,
            Statement::Log(s) => &s.meta,
            Statement::Restart(s) => &s.meta,
            Statement::Return(s) => &s.meta,
            Statement::Synthetic(s) => &s.meta,
            Statement::SyntheticBase64(s) => &s.meta,
            Statement::If(s) => &s.meta,
            Statement::Goto(s) => &s.meta,
            Statement::GotoDestination(s) => &s.meta,
            Statement::FunctionCall(s) => &s.meta,
            Statement::Include(s) => &s.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut Meta {
        match self {
            Statement::Block(s) => &mut s.meta,
            Statement::Set(s) => &mut s.meta,
            Statement::Unset(s) => &mut s.meta,
            Statement::Remove(s) => &mut s.meta,
            Statement::Add(s) => &mut s.meta,
            Statement::Call(s) => &mut s.meta,
            Statement::Declare(s) => &mut s.meta,
            Statement::Error(s) => &mut s.meta,
            Statement::Esi(s) => &mut s.meta,
            Statement::Log(s) => &mut s.meta,
            Statement::Restart(s) => &mut s.meta,
            Statement::Return(s) => &mut s.meta,
            Statement::Synthetic(s) => &mut s.meta,
            Statement::SyntheticBase64(s) => &mut s.meta,
            Statement::If(s) => &mut s.meta,
            Statement::Goto(s) => &mut s.meta,
            Statement::GotoDestination(s) => &mut s.meta,
            Statement::FunctionCall(s) => &mut s.meta,
            Statement::Include(s) => &mut s.meta,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockStatement {
    pub meta: Meta,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetStatement {
    pub meta: Meta,
    pub ident: Ident,
    pub operator: Token,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnsetStatement {
    pub meta: Meta,
    pub ident: Ident,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoveStatement {
    pub meta: Meta,
    pub ident: Ident,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddStatement {
    pub meta: Meta,
    pub ident: Ident,
    pub operator: Token,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallStatement {
    pub meta: Meta,
    pub subroutine: Ident,
}

/// `declare local var.name TYPE;`
#[derive(Debug, Clone, PartialEq)]
pub struct DeclareStatement {
    pub meta: Meta,
    pub name: Ident,
    pub value_type: Ident,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorStatement {
    pub meta: Meta,
    pub code: Option<Expression>,
    pub argument: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EsiStatement {
    pub meta: Meta,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogStatement {
    pub meta: Meta,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestartStatement {
    pub meta: Meta,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStatement {
    pub meta: Meta,
    pub value: Option<Expression>,
    pub has_parenthesis: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticStatement {
    pub meta: Meta,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticBase64Statement {
    pub meta: Meta,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    pub meta: Meta,
    pub condition: Expression,
    pub consequence: BlockStatement,
    /// `else if` / `elseif` / `elsif` chain, in source order.
    pub another: Vec<IfStatement>,
    pub alternative: Option<BlockStatement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GotoStatement {
    pub meta: Meta,
    pub destination: Ident,
}

/// A bare `label:` marking a goto target inside a subroutine body.
#[derive(Debug, Clone, PartialEq)]
pub struct GotoDestinationStatement {
    pub meta: Meta,
    pub name: Ident,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallStatement {
    pub meta: Meta,
    pub function: Ident,
    pub arguments: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Ident(Ident),
    String(StringLiteral),
    Integer(IntegerLiteral),
    Float(FloatLiteral),
    Bool(BoolLiteral),
    RTime(RTimeLiteral),
    Prefix(PrefixExpression),
    Infix(InfixExpression),
    Group(GroupedExpression),
    IfExpr(IfExpression),
    FunctionCall(FunctionCallExpression),
}

impl Expression {
    pub fn meta(&self) -> &Meta {
        match self {
            Expression::Ident(e) => &e.meta,
            Expression::String(e) => &e.meta,
            Expression::Integer(e) => &e.meta,
            Expression::Float(e) => &e.meta,
            Expression::Bool(e) => &e.meta,
            Expression::RTime(e) => &e.meta,
            Expression::Prefix(e) => &e.meta,
            Expression::Infix(e) => &e.meta,
            Expression::Group(e) => &e.meta,
            Expression::IfExpr(e) => &e.meta,
            Expression::FunctionCall(e) => &e.meta,
        }
    }

    pub fn position(&self) -> Position {
        self.meta().position()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub meta: Meta,
    pub value: String,
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringLiteral {
    pub meta: Meta,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntegerLiteral {
    pub meta: Meta,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FloatLiteral {
    pub meta: Meta,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoolLiteral {
    pub meta: Meta,
    pub value: bool,
}

/// Duration literal; the raw text (`"2.5h"`) is kept and parsed at
/// evaluation time.
#[derive(Debug, Clone, PartialEq)]
pub struct RTimeLiteral {
    pub meta: Meta,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrefixExpression {
    pub meta: Meta,
    pub operator: String,
    pub right: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InfixExpression {
    pub meta: Meta,
    pub operator: String,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupedExpression {
    pub meta: Meta,
    pub right: Box<Expression>,
}

/// Ternary `if(cond, then, else)` in expression position.
#[derive(Debug, Clone, PartialEq)]
pub struct IfExpression {
    pub meta: Meta,
    pub condition: Box<Expression>,
    pub consequence: Box<Expression>,
    pub alternative: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallExpression {
    pub meta: Meta,
    pub function: Ident,
    pub arguments: Vec<Expression>,
}
