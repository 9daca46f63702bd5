use crate::ast::{
    ErrorStatement, Expression, GotoStatement, IfStatement, Statement,
};
use crate::diagnostics::Position;

use super::expression::truthy;
use super::value::Value;
use super::{Interpreter, RuntimeError, State};

/// Control flow out of a statement: keep going, leave with a state
/// transition, or leave a functional subroutine with a value.
pub(crate) enum Flow {
    Continue,
    State(State),
    Return(Value),
}

// Attaches the statement position to faults raised without one.
fn at(position: Position) -> impl FnOnce(RuntimeError) -> RuntimeError {
    move |err| match err {
        RuntimeError::Message(message) => RuntimeError::Runtime { message, position },
        RuntimeError::Function(inner) => RuntimeError::Runtime {
            message: inner.to_string(),
            position,
        },
        other => other,
    }
}

impl Interpreter {
    /// Runs a statement sequence in source order. `goto` jumps are
    /// forward-only and resolved against this sequence by index; the
    /// cancellation token is checked before every statement.
    pub(crate) fn exec_statements(
        &mut self,
        statements: &[Statement],
    ) -> Result<Flow, RuntimeError> {
        let mut index = 0;
        while index < statements.len() {
            if self.ctx.cancel.is_cancelled() {
                return Err(RuntimeError::Cancelled);
            }
            let statement = &statements[index];
            if let Statement::Goto(goto) = statement {
                index = resolve_goto(statements, index, goto)?;
                continue;
            }
            let position = statement.meta().position();
            match self.exec_statement(statement).map_err(at(position))? {
                Flow::Continue => {}
                flow => return Ok(flow),
            }
            index += 1;
        }
        Ok(Flow::Continue)
    }

    fn exec_statement(&mut self, statement: &Statement) -> Result<Flow, RuntimeError> {
        let scope = self.ctx.scope;
        match statement {
            Statement::Block(block) => return self.exec_statements(&block.statements),
            Statement::Set(stmt) => {
                let value = self.eval_expression(&stmt.value)?;
                self.ctx.set_variable(scope, &stmt.ident.value, value)?;
            }
            Statement::Add(stmt) => {
                let value = self.eval_expression(&stmt.value)?;
                self.ctx.add_variable(scope, &stmt.ident.value, value)?;
            }
            Statement::Unset(stmt) => {
                self.ctx.unset_variable(scope, &stmt.ident.value)?;
            }
            Statement::Remove(stmt) => {
                self.ctx.unset_variable(scope, &stmt.ident.value)?;
            }
            Statement::Declare(stmt) => {
                self.ctx
                    .declare_local(&stmt.name.value, &stmt.value_type.value)?;
            }
            Statement::Call(stmt) => {
                let name = stmt.subroutine.value.as_str();
                let Some(sub) = self.subroutine(name) else {
                    return Err(RuntimeError::Message(format!(
                        "subroutine {name} is not defined"
                    )));
                };
                tracing::debug!(subroutine = name, "call");
                match self.exec_statements(&sub.block.statements)? {
                    // A bare `return;` leaves the called subroutine only.
                    Flow::State(State::None) | Flow::Continue | Flow::Return(_) => {}
                    flow => return Ok(flow),
                }
            }
            Statement::Error(stmt) => return self.exec_error(stmt),
            Statement::Esi(_) => {
                tracing::debug!("esi is a no-op in simulation");
            }
            Statement::Log(stmt) => {
                let value = self.eval_expression(&stmt.value)?;
                tracing::info!(target: "vcl", "{}", value.to_vcl_string());
            }
            Statement::Restart(_) => return Ok(Flow::State(State::Restart)),
            Statement::Return(stmt) => {
                let Some(expr) = &stmt.value else {
                    return Ok(Flow::State(State::None));
                };
                if let Expression::Ident(ident) = expr {
                    if let Some(state) = State::from_action(&ident.value) {
                        return Ok(Flow::State(state));
                    }
                }
                let value = self.eval_expression(expr)?;
                return Ok(Flow::Return(value));
            }
            Statement::Synthetic(stmt) => {
                let value = self.eval_expression(&stmt.value)?;
                let object = self.ctx.object.get_or_insert_with(Default::default);
                object.body = value.to_vcl_string();
            }
            Statement::SyntheticBase64(stmt) => {
                let value = self.eval_expression(&stmt.value)?;
                let decoded = base64_decode(&value.to_vcl_string()).ok_or_else(|| {
                    RuntimeError::Message("synthetic.base64: invalid base64 input".to_string())
                })?;
                let body = String::from_utf8(decoded).map_err(|_| {
                    RuntimeError::Message(
                        "synthetic.base64: decoded body is not valid UTF-8".to_string(),
                    )
                })?;
                let object = self.ctx.object.get_or_insert_with(Default::default);
                object.body = body;
            }
            Statement::If(stmt) => return self.exec_if(stmt),
            Statement::Goto(_) => {
                // Handled by exec_statements; reaching here means a goto
                // escaped its statement sequence.
                return Err(RuntimeError::Message(
                    "goto cannot be resolved here".to_string(),
                ));
            }
            Statement::GotoDestination(_) => {}
            Statement::FunctionCall(stmt) => {
                let call = crate::ast::FunctionCallExpression {
                    meta: stmt.meta.clone(),
                    function: stmt.function.clone(),
                    arguments: stmt.arguments.clone(),
                };
                self.call_function(&call, true)?;
            }
            Statement::Include(stmt) => {
                // Module resolution happens before the interpreter runs;
                // an include reaching execution is inert.
                tracing::debug!(path = %stmt.path.value, "include not materialized");
            }
        }
        Ok(Flow::Continue)
    }

    fn exec_if(&mut self, stmt: &IfStatement) -> Result<Flow, RuntimeError> {
        let condition = self.eval_expression(&stmt.condition)?;
        if truthy(&condition, stmt.meta.position())? {
            return self.exec_statements(&stmt.consequence.statements);
        }
        for arm in &stmt.another {
            let condition = self.eval_expression(&arm.condition)?;
            if truthy(&condition, arm.meta.position())? {
                return self.exec_statements(&arm.consequence.statements);
            }
        }
        if let Some(alternative) = &stmt.alternative {
            return self.exec_statements(&alternative.statements);
        }
        Ok(Flow::Continue)
    }

    fn exec_error(&mut self, stmt: &ErrorStatement) -> Result<Flow, RuntimeError> {
        let status = match &stmt.code {
            Some(expr) => match self.eval_expression(expr)?.coerce_to("INTEGER")? {
                Value::Integer(status) => Some(status),
                _ => None,
            },
            None => None,
        };
        let message = match &stmt.argument {
            Some(expr) => Some(self.eval_expression(expr)?.to_vcl_string()),
            None => None,
        };
        let object = self
            .ctx
            .object
            .get_or_insert_with(|| super::http::Response::new(503));
        if let Some(status) = status {
            object.status = status;
        }
        if let Some(message) = message {
            object.response = message;
        }
        Ok(Flow::State(State::Error))
    }
}

fn resolve_goto(
    statements: &[Statement],
    index: usize,
    goto: &GotoStatement,
) -> Result<usize, RuntimeError> {
    let name = goto.destination.value.as_str();
    for (offset, statement) in statements[index + 1..].iter().enumerate() {
        if let Statement::GotoDestination(dest) = statement {
            if dest.name.value == name {
                return Ok(index + 1 + offset);
            }
        }
    }
    Err(RuntimeError::Runtime {
        message: format!("goto destination {name} not found ahead of the jump"),
        position: goto.meta.position(),
    })
}

// Minimal base64 (standard alphabet, `=` padding). Kept local: the body
// of a synthetic.base64 statement is the only consumer.
fn base64_decode(input: &str) -> Option<Vec<u8>> {
    fn value_of(ch: u8) -> Option<u32> {
        match ch {
            b'A'..=b'Z' => Some((ch - b'A') as u32),
            b'a'..=b'z' => Some((ch - b'a' + 26) as u32),
            b'0'..=b'9' => Some((ch - b'0' + 52) as u32),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }

    let cleaned: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let trimmed: &[u8] = match cleaned.iter().position(|&b| b == b'=') {
        Some(index) => {
            if cleaned[index..].iter().any(|&b| b != b'=') {
                return None;
            }
            &cleaned[..index]
        }
        None => &cleaned,
    };
    if trimmed.len() % 4 == 1 {
        return None;
    }

    let mut out = Vec::with_capacity(trimmed.len() / 4 * 3 + 2);
    for chunk in trimmed.chunks(4) {
        let mut acc: u32 = 0;
        for &byte in chunk {
            acc = (acc << 6) | value_of(byte)?;
        }
        match chunk.len() {
            4 => {
                out.push((acc >> 16) as u8);
                out.push((acc >> 8) as u8);
                out.push(acc as u8);
            }
            3 => {
                acc <<= 6;
                out.push((acc >> 16) as u8);
                out.push((acc >> 8) as u8);
            }
            2 => {
                acc <<= 12;
                out.push((acc >> 16) as u8);
            }
            _ => return None,
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::base64_decode;

    #[test]
    fn decodes_padded_and_unpadded_base64() {
        assert_eq!(base64_decode("aGVsbG8=").as_deref(), Some(b"hello".as_slice()));
        assert_eq!(base64_decode("aGVsbG8").as_deref(), Some(b"hello".as_slice()));
        assert_eq!(base64_decode("aGk=").as_deref(), Some(b"hi".as_slice()));
        assert!(base64_decode("!!!").is_none());
    }
}
