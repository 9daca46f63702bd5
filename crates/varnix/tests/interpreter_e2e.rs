use varnix::{parse, Interpreter, Request, Response, Scope, Value};

const DEFAULT_BACKEND: &str = r#"
backend example {
  .host = "127.0.0.1";
  .port = "80";
  .ssl = false;
}
"#;

/// Parses `vcl` (with a default backend prepended), runs one request
/// through the state machine, and asserts each named variable in `scope`.
fn assert_interpreter(vcl: &str, scope: Scope, assertions: &[(&str, Value)]) {
    let source = format!("{DEFAULT_BACKEND}\n{vcl}");
    let parsed = parse(&source).expect("VCL parsing error");
    let mut ip = Interpreter::new(parsed);
    let mut response = Response::default();
    ip.process(&mut response, Request::get("http://localhost/"))
        .expect("interpreter process error");

    for (name, expected) in assertions {
        let got = ip
            .vars()
            .get(scope, name)
            .unwrap_or_else(|err| panic!("reading {name}: {err}"));
        assert_eq!(&got, expected, "variable {name}");
    }
}

#[test]
fn backend_declaration_and_fetch_headers() {
    let mut ip = Interpreter::new(
        parse(&format!(
            "{DEFAULT_BACKEND}\nsub vcl_deliver {{ set resp.http.X-Origin = resp.http.X-Backend-Host; }}"
        ))
        .unwrap(),
    );
    let mut response = Response::default();
    ip.process(&mut response, Request::get("http://localhost/"))
        .unwrap();
    assert_eq!(response.headers.get("X-Backend"), Some("example"));
    assert_eq!(response.headers.get("X-Origin"), Some("127.0.0.1"));
    assert_eq!(response.status, 200);
}

#[test]
fn juxtaposition_concat_assigns_joined_string() {
    assert_interpreter(
        r#"sub vcl_recv { set req.http.X = "a" "b"; }"#,
        Scope::RECV,
        &[("req.http.X", Value::String("ab".into()))],
    );
}

#[test]
fn host_match_sets_header() {
    assert_interpreter(
        r#"sub vcl_recv {
  if (req.http.Host == "localhost") {
    set req.http.Y = "1";
  }
}"#,
        Scope::RECV,
        &[("req.http.Y", Value::String("1".into()))],
    );
}

#[test]
fn integer_arithmetic_stringifies_into_headers() {
    assert_interpreter(
        r#"sub vcl_recv { set req.http.Z = 1 + 2; }"#,
        Scope::RECV,
        &[("req.http.Z", Value::String("3".into()))],
    );
}

#[test]
fn state_machine_visits_every_default_phase() {
    assert_interpreter(
        r#"sub vcl_recv    { set req.http.Trace = "recv"; }
sub vcl_hash    { set req.http.Trace = req.http.Trace "-hash"; }
sub vcl_miss    { set req.http.Trace = req.http.Trace "-miss"; }
sub vcl_fetch   { set req.http.Trace = req.http.Trace "-fetch"; }
sub vcl_deliver { set req.http.Trace = req.http.Trace "-deliver"; }
sub vcl_log     { set req.http.Trace = req.http.Trace "-log"; }"#,
        Scope::RECV,
        &[(
            "req.http.Trace",
            Value::String("recv-hash-miss-fetch-deliver-log".into()),
        )],
    );
}

#[test]
fn pass_skips_cache_phases() {
    assert_interpreter(
        r#"sub vcl_recv { return (pass); }
sub vcl_pass  { set req.http.Trace = "pass"; }
sub vcl_miss  { set req.http.Trace = "miss"; }
sub vcl_fetch { set req.http.Trace = req.http.Trace "-fetch"; }"#,
        Scope::RECV,
        &[("req.http.Trace", Value::String("pass-fetch".into()))],
    );
}

#[test]
fn error_transition_builds_the_error_page() {
    let source = format!(
        "{DEFAULT_BACKEND}\n{}",
        r#"sub vcl_recv { error 403 "go away"; }
sub vcl_error {
  set obj.http.Content-Type = "text/html";
  synthetic "<h1>blocked</h1>";
  return (deliver);
}"#
    );
    let mut ip = Interpreter::new(parse(&source).unwrap());
    let mut response = Response::default();
    ip.process(&mut response, Request::get("http://localhost/"))
        .unwrap();
    assert_eq!(response.status, 403);
    assert_eq!(response.response, "go away");
    assert_eq!(response.headers.get("Content-Type"), Some("text/html"));
    assert_eq!(response.body, "<h1>blocked</h1>");
}

#[test]
fn restart_replays_recv_with_counter() {
    assert_interpreter(
        r#"sub vcl_recv {
  set req.http.Seen = req.http.Seen "x";
  if (req.restarts < 1) {
    restart;
  }
}"#,
        Scope::RECV,
        &[("req.http.Seen", Value::String("xx".into()))],
    );
}

#[test]
fn regex_and_captures_against_request_url() {
    assert_interpreter(
        r#"sub vcl_recv {
  if (req.url ~ "^/articles/(\d+)$") {
    set req.http.Article-Id = re.group.1;
  } else {
    set req.http.Article-Id = "none";
  }
}"#,
        Scope::RECV,
        &[("req.http.Article-Id", Value::String("none".into()))],
    );
}

#[test]
fn functional_subroutine_feeds_table_lookup() {
    assert_interpreter(
        r#"table regions STRING {
  "localhost": "dev",
}
sub region_of STRING {
  return table.lookup(regions, req.http.Host, "unknown");
}
sub vcl_recv { set req.http.Region = region_of(); }"#,
        Scope::RECV,
        &[("req.http.Region", Value::String("dev".into()))],
    );
}

#[test]
fn rtime_arithmetic_against_now() {
    assert_interpreter(
        r#"sub vcl_recv {
  declare local var.later TIME;
  set var.later = now + 10m;
  declare local var.window RTIME;
  set var.window = 5m + 30s;
}"#,
        Scope::RECV,
        &[(
            "var.window",
            Value::RTime(chrono::Duration::seconds(330)),
        )],
    );
}

#[test]
fn unknown_subroutine_call_is_a_runtime_error() {
    let parsed = parse(r#"sub vcl_recv { call missing_sub; }"#).unwrap();
    let mut ip = Interpreter::new(parsed);
    let mut response = Response::default();
    let err = ip
        .process(&mut response, Request::get("http://localhost/"))
        .unwrap_err();
    assert!(err.to_string().contains("missing_sub"));
}

#[test]
fn acl_with_mask_and_negation_governs_access() {
    assert_interpreter(
        r#"acl trusted {
  !"127.1.2.3";
  "127.0.0.0"/8;
}
sub vcl_recv {
  if (client.ip ~ trusted) {
    set req.http.Trusted = "1";
  }
  if (std.ip("127.1.2.3", client.ip) ~ trusted) {
    set req.http.Excluded = "no";
  } else {
    set req.http.Excluded = "yes";
  }
}"#,
        Scope::RECV,
        &[
            ("req.http.Trusted", Value::String("1".into())),
            ("req.http.Excluded", Value::String("yes".into())),
        ],
    );
}
