use super::{parse, parse_snippet, ParseError};
use crate::ast::{BackendPropertyValue, Declaration, Expression, Statement};
use crate::token::TokenKind;

fn single_subroutine_body(source: &str) -> Vec<Statement> {
    let vcl = parse(source).expect("parse failure");
    let decl = vcl.declarations.into_iter().next().expect("one declaration");
    match decl {
        Declaration::Subroutine(sub) => sub.block.statements,
        other => panic!("expected subroutine, got {other:?}"),
    }
}

#[test]
fn parses_backend_with_string_properties() {
    let vcl = parse(r#"backend example { .host = "127.0.0.1"; .port = "80"; }"#).unwrap();
    assert_eq!(vcl.declarations.len(), 1);
    let Declaration::Backend(backend) = &vcl.declarations[0] else {
        panic!("expected backend declaration");
    };
    assert_eq!(backend.name.value, "example");
    assert_eq!(backend.properties.len(), 2);
    for (property, key, expected) in [
        (&backend.properties[0], "host", "127.0.0.1"),
        (&backend.properties[1], "port", "80"),
    ] {
        assert_eq!(property.key.value, key);
        match &property.value {
            BackendPropertyValue::Expression(Expression::String(s)) => assert_eq!(s.value, expected),
            other => panic!("expected string property, got {other:?}"),
        }
    }
}

#[test]
fn parses_nested_probe_object() {
    let vcl = parse(
        r#"backend origin {
  .host = "origin.example.com";
  .probe = {
    .request = "GET / HTTP/1.1";
    .timeout = 2s;
  }
}"#,
    )
    .unwrap();
    let Declaration::Backend(backend) = &vcl.declarations[0] else {
        panic!("expected backend");
    };
    let probe = &backend.properties[1];
    assert_eq!(probe.key.value, "probe");
    let BackendPropertyValue::Object(nested) = &probe.value else {
        panic!("expected nested object");
    };
    assert_eq!(nested.len(), 2);
    assert_eq!(nested[0].key.value, "request");
}

#[test]
fn juxtaposition_concat_builds_plus_infix() {
    let statements = single_subroutine_body(r#"sub vcl_recv { set req.http.X = "a" "b"; }"#);
    let Statement::Set(set) = &statements[0] else {
        panic!("expected set");
    };
    let Expression::Infix(infix) = &set.value else {
        panic!("expected infix, got {:?}", set.value);
    };
    assert_eq!(infix.operator, "+");
    assert!(matches!(*infix.left, Expression::String(_)));
    assert!(matches!(*infix.right, Expression::String(_)));
}

#[test]
fn lower_precedence_operator_keeps_higher_on_the_right() {
    // prec(==) < prec(+), so `a == b + c` must parse as `a == (b + c)`.
    let statements =
        single_subroutine_body(r#"sub vcl_recv { if (req.http.A == "b" + "c") { esi; } }"#);
    let Statement::If(stmt) = &statements[0] else {
        panic!("expected if");
    };
    let Expression::Infix(eq) = &stmt.condition else {
        panic!("expected infix condition");
    };
    assert_eq!(eq.operator, "==");
    let Expression::Infix(concat) = &*eq.right else {
        panic!("expected nested concat on the right");
    };
    assert_eq!(concat.operator, "+");
}

#[test]
fn logical_operators_bind_loosest() {
    let statements = single_subroutine_body(
        r#"sub vcl_recv { if (req.http.A == "1" && req.http.B != "2" || req.http.C ~ "x") { esi; } }"#,
    );
    let Statement::If(stmt) = &statements[0] else {
        panic!("expected if");
    };
    // `||` is the loosest operator, so it is the root.
    let Expression::Infix(or) = &stmt.condition else {
        panic!("expected infix");
    };
    assert_eq!(or.operator, "||");
    let Expression::Infix(and) = &*or.left else {
        panic!("expected && on the left");
    };
    assert_eq!(and.operator, "&&");
    let Expression::Infix(regex) = &*or.right else {
        panic!("expected ~ on the right");
    };
    assert_eq!(regex.operator, "~");
}

#[test]
fn same_precedence_is_left_associative() {
    let statements = single_subroutine_body(r#"sub vcl_recv { set req.http.X = 1 + 2 + 3; }"#);
    let Statement::Set(set) = &statements[0] else {
        panic!("expected set");
    };
    let Expression::Infix(outer) = &set.value else {
        panic!("expected infix");
    };
    assert!(matches!(*outer.left, Expression::Infix(_)));
    assert!(matches!(*outer.right, Expression::Integer(_)));
}

#[test]
fn if_chain_collects_every_spelling() {
    let statements = single_subroutine_body(
        r#"sub vcl_recv {
  if (req.http.A) { esi; }
  else if (req.http.B) { esi; }
  elseif (req.http.C) { esi; }
  elsif (req.http.D) { esi; }
  else { restart; }
}"#,
    );
    let Statement::If(stmt) = &statements[0] else {
        panic!("expected if");
    };
    assert_eq!(stmt.another.len(), 3);
    assert!(stmt.alternative.is_some());
}

#[test]
fn nesting_levels_grow_with_blocks() {
    let statements = single_subroutine_body(
        r#"sub vcl_recv {
  set req.http.A = "1";
  {
    set req.http.B = "2";
  }
}"#,
    );
    let Statement::Set(outer) = &statements[0] else {
        panic!("expected set");
    };
    assert_eq!(outer.meta.nest_level, 1);
    let Statement::Block(block) = &statements[1] else {
        panic!("expected nested block");
    };
    assert_eq!(block.meta.nest_level, 2);
    let Statement::Set(inner) = &block.statements[0] else {
        panic!("expected inner set");
    };
    assert_eq!(inner.meta.nest_level, 2);
}

#[test]
fn leading_comments_cross_linefeeds() {
    let vcl = parse(
        "# about the backend\n# second line\n\nbackend b { .host = \"h\"; }",
    )
    .unwrap();
    let meta = vcl.declarations[0].meta();
    assert_eq!(meta.leading.len(), 2);
    assert_eq!(meta.leading[0].text, " about the backend");
    assert_eq!(meta.leading[1].text, " second line");
}

#[test]
fn trailing_comments_stop_at_first_linefeed() {
    let statements = single_subroutine_body(
        "sub vcl_recv {\n  esi; # same line\n  # next line, belongs to restart\n  restart;\n}",
    );
    let Statement::Esi(esi) = &statements[0] else {
        panic!("expected esi");
    };
    assert_eq!(esi.meta.trailing.len(), 1);
    assert_eq!(esi.meta.trailing[0].text, " same line");
    let Statement::Restart(restart) = &statements[1] else {
        panic!("expected restart");
    };
    assert_eq!(restart.meta.leading.len(), 1);
}

#[test]
fn dangling_comment_flushes_at_eof() {
    let statements = parse_snippet("restart;\n# dangling").unwrap();
    let Statement::Restart(restart) = &statements[0] else {
        panic!("expected restart");
    };
    assert_eq!(restart.meta.trailing.len(), 1);
    assert_eq!(restart.meta.trailing[0].text, "dangling");
    assert_eq!(restart.meta.trailing[0].token.kind, TokenKind::Eof);
}

#[test]
fn snippet_accepts_statement_forms() {
    let statements = parse_snippet(
        r#"{
  log "nested";
}
std.collect(req.http.Cookie);
retry_here:
goto retry_here;"#,
    )
    .unwrap();
    assert!(matches!(statements[0], Statement::Block(_)));
    let Statement::FunctionCall(call) = &statements[1] else {
        panic!("expected function call statement");
    };
    assert_eq!(call.function.value, "std.collect");
    assert_eq!(call.arguments.len(), 1);
    assert!(matches!(statements[2], Statement::GotoDestination(_)));
    assert!(matches!(statements[3], Statement::Goto(_)));
}

#[test]
fn parses_acl_entries() {
    let vcl = parse(
        r#"acl office {
  "192.0.2.0"/24;
  !"192.0.2.12";
}"#,
    )
    .unwrap();
    let Declaration::Acl(acl) = &vcl.declarations[0] else {
        panic!("expected acl");
    };
    assert_eq!(acl.entries.len(), 2);
    assert_eq!(acl.entries[0].mask.as_ref().map(|m| m.value), Some(24));
    assert!(!acl.entries[0].inverse);
    assert!(acl.entries[1].inverse);
    assert!(acl.entries[1].mask.is_none());
}

#[test]
fn parses_table_with_value_type_and_trailing_comma() {
    let vcl = parse(
        r#"table redirects STRING {
  "/old": "/new",
  "/gone": "/",
}"#,
    )
    .unwrap();
    let Declaration::Table(table) = &vcl.declarations[0] else {
        panic!("expected table");
    };
    assert_eq!(table.value_type.as_ref().map(|t| t.value.as_str()), Some("STRING"));
    assert_eq!(table.entries.len(), 2);
    assert_eq!(table.entries[0].key.value, "/old");
}

#[test]
fn parses_director_with_backend_entries() {
    let vcl = parse(
        r#"director pool random {
  .quorum = 50%;
  { .backend = origin_0; .weight = 1; }
  { .backend = origin_1; .weight = 2; }
}"#,
    )
    .unwrap();
    let Declaration::Director(director) = &vcl.declarations[0] else {
        panic!("expected director");
    };
    assert_eq!(director.director_type.value, "random");
    assert_eq!(director.entries.len(), 3);
}

#[test]
fn parses_remaining_declarations() {
    let vcl = parse(
        r#"import boltsort;
include "shared";
penaltybox pbox {}
ratecounter rcounter {}
sub lookup_region STRING {
  return "eu";
}"#,
    )
    .unwrap();
    assert_eq!(vcl.declarations.len(), 5);
    assert!(matches!(vcl.declarations[0], Declaration::Import(_)));
    assert!(matches!(vcl.declarations[1], Declaration::Include(_)));
    assert!(matches!(vcl.declarations[2], Declaration::Penaltybox(_)));
    assert!(matches!(vcl.declarations[3], Declaration::Ratecounter(_)));
    let Declaration::Subroutine(sub) = &vcl.declarations[4] else {
        panic!("expected subroutine");
    };
    assert_eq!(sub.return_type.as_ref().map(|t| t.value.as_str()), Some("STRING"));
}

#[test]
fn error_statement_keeps_status_and_message_apart() {
    let statements =
        single_subroutine_body(r#"sub vcl_recv { error 601 "access denied"; }"#);
    let Statement::Error(stmt) = &statements[0] else {
        panic!("expected error statement");
    };
    assert!(matches!(stmt.code, Some(Expression::Integer(_))));
    assert!(matches!(stmt.argument, Some(Expression::String(_))));
}

#[test]
fn return_with_parenthesis() {
    let statements = single_subroutine_body(r#"sub vcl_recv { return(lookup); }"#);
    let Statement::Return(stmt) = &statements[0] else {
        panic!("expected return");
    };
    assert!(stmt.has_parenthesis);
    assert!(matches!(stmt.value, Some(Expression::Ident(_))));
}

#[test]
fn unexpected_token_reports_position() {
    let err = parse("backend b { host = \"x\"; }").unwrap_err();
    match err {
        ParseError::UnexpectedToken { position, .. } => {
            assert_eq!(position.line, 1);
            assert_eq!(position.column, 13);
        }
        other => panic!("expected UnexpectedToken, got {other}"),
    }
}

#[test]
fn declaration_coverage_matches_significant_tokens() {
    // Parser totality: every significant token belongs to the tree; the
    // last consumed token of a valid parse is EOF.
    let sources = [
        r#"backend b { .host = "h"; }"#,
        r#"sub vcl_recv { set req.http.X = "1"; }"#,
        r#"acl a { "10.0.0.0"/8; }"#,
    ];
    for source in sources {
        let vcl = parse(source).unwrap();
        assert!(!vcl.declarations.is_empty(), "source: {source}");
    }
}

#[test]
fn if_expression_in_value_position() {
    let statements = single_subroutine_body(
        r#"sub vcl_recv { set req.http.X = if(req.http.A == "1", "yes", "no"); }"#,
    );
    let Statement::Set(set) = &statements[0] else {
        panic!("expected set");
    };
    assert!(matches!(set.value, Expression::IfExpr(_)));
}
