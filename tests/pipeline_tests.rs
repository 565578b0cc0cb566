use delve::{
    resolve, AllowAll, Caller, CommandRegistry, DenyAll, Engine, Environment, ErrorKind, Event, GrantTable,
    MemoryStore, Output, PipelineError, Record, ResultSet,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

fn event(index: &str, host: &str, text: &str) -> Event {
    let mut event = Event::new(index, host, "access.log", "json", text);
    event.extract_fields();
    event
}

fn sample_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_events(vec![
        event("web", "web01", r#"{"a": 1, "status": 200}"#),
        event("db", "db01", r#"{"a": 2, "status": 500}"#),
        event("web", "web02", r#"{"a": 3, "status": 404}"#),
    ])
    .unwrap())
}

fn engine_for(store: &Arc<MemoryStore>) -> Engine {
    Engine::new(CommandRegistry::builtin(), store.clone())
}

fn run(engine: &Engine, query: &str) -> Result<Output, PipelineError> {
    let caller = Caller::new("alice");
    let mut env = Environment::for_caller(&caller);
    engine.execute(query, &caller, &mut env)
}

fn records(engine: &Engine, query: &str) -> Vec<Record> {
    run(engine, query).unwrap().into_records().unwrap()
}

fn obj(value: Value) -> Record {
    value.as_object().cloned().unwrap()
}

#[test]
fn test_zero_stages_yield_nothing() {
    let store = sample_store();
    let engine = engine_for(&store);
    assert!(records(&engine, "").is_empty());
    assert!(records(&engine, "   ").is_empty());
}

#[test]
fn test_search_filters_store() {
    let store = sample_store();
    let engine = engine_for(&store);

    let hosts: Vec<Value> = records(&engine, "search index=web")
        .into_iter()
        .map(|r| r["host"].clone())
        .collect();
    assert_eq!(hosts, vec![json!("web01"), json!("web02")]);

    assert_eq!(records(&engine, "search host=web* status!=200").len(), 1);
    assert_eq!(records(&engine, "search index=nope").len(), 0);
}

#[test]
fn test_resolve_is_idempotent_and_uniform() {
    let input = vec![obj(json!({"a": 1})), obj(json!({"b": 2, "a": 3})), obj(json!({"c": null}))];
    let once = resolve(ResultSet::Materialized(input)).unwrap();
    let twice = resolve(ResultSet::Materialized(once.clone())).unwrap();
    assert_eq!(once, twice);

    let keys: Vec<Vec<&String>> = once.iter().map(|r| r.keys().collect()).collect();
    assert!(keys.iter().all(|k| k == &keys[0]));
    assert_eq!(once[0]["b"], Value::Null);
}

#[test]
fn test_stage_order_determines_transform_order() {
    let store = Arc::new(MemoryStore::with_events(vec![event("test", "h", r#"{"a": 1}"#)]).unwrap());
    let engine = engine_for(&store);

    let out = records(&engine, "search index=test | explode extracted_fields | rename -f a -t b");
    assert_eq!(out.len(), 1);
    assert_eq!(out[0]["b"], 1);
    assert!(!out[0].contains_key("a"));

    let out = records(&engine, r#"echo '{"a": 1}' | rename -f a -t b"#);
    assert_eq!(out, vec![obj(json!({"b": 1}))]);

    let out = records(&engine, "search index=test | rename -f a -t b");
    assert_eq!(out.len(), 1);
    assert_eq!(out[0]["b"], 1);
    assert!(!out[0].contains_key("a"));
    assert!(out[0]["extracted_fields"].get("a").is_none());
}

#[test]
fn test_rename_missing_field_aborts() {
    let store = sample_store();
    let engine = engine_for(&store);

    let err = run(&engine, r#"echo '{"x": 1}' | rename -f y -t z"#).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Field);
    let report = err.report();
    assert_eq!(report.stage, Some(2));
    assert_eq!(report.command.as_deref(), Some("rename"));
}

#[test]
fn test_lazy_stage_errors_name_the_producing_stage() {
    let store = sample_store();
    let engine = engine_for(&store);

    let err = run(&engine, r#"echo '[{"x": 1}, {"y": 2}]' | rename -f x -t z | table"#).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Field);
    assert_eq!(err.report().stage, Some(2));
}

#[test]
fn test_make_events_requires_add_permission() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_for(&store).with_permissions(Arc::new(DenyAll));

    let err = run(&engine, "fake_data -n 3 | make_events -S").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);
    assert_eq!(err.report().stage, Some(2));
    assert!(store.is_empty());
    assert!(!store.is_dirty());
}

#[test]
fn test_make_events_resolves_templates() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_for(&store);

    let out = records(&engine, "fake_data -n 10 | make_events -o $host -i $nope -s weblogs -S");
    assert_eq!(out.len(), 10);
    for record in &out {
        assert!(["web01", "web02", "db01", "cache01", "worker01"].contains(&record["host"].as_str().unwrap()));
        assert_eq!(record["index"], "$nope");
        assert_eq!(record["source"], "weblogs");
        assert_eq!(record["sourcetype"], "json");
        assert_eq!(record["user"], "alice");
    }
    assert_eq!(store.len(), 10);
    assert!(store.is_dirty());
}

#[test]
fn test_make_events_without_save_writes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_for(&store);

    let out = records(&engine, r#"echo '[{"n": 1}, {"n": 2}]' | make_events -d n"#);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0]["text"], "{}");
    assert!(store.is_empty());
}

#[test]
fn test_update_requires_deferred_input() {
    let store = sample_store();
    let engine = engine_for(&store);
    let before = store.snapshot();

    let err = run(&engine, r#"echo '{"a": 1}' | update host=x"#).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    assert_eq!(store.snapshot(), before);

    let err = run(&engine, "search index=web | head -n 1 | rename -f host -t h | update host=x").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    assert_eq!(store.snapshot(), before);
}

#[test]
fn test_update_counts_changed_events() {
    let store = sample_store();
    let engine = engine_for(&store);

    let out = run(&engine, "search index=web | update host=patched").unwrap();
    assert_eq!(out.as_value(), Some(&json!(2)));

    let hosts: Vec<String> = store.snapshot().into_iter().map(|e| e.host).collect();
    assert_eq!(hosts, vec!["patched", "db01", "patched"]);
}

#[test]
fn test_update_requires_change_permission() {
    let store = sample_store();
    let engine = engine_for(&store).with_permissions(Arc::new(GrantTable::new().grant("alice", "add_event")));
    let before = store.snapshot();

    let err = run(&engine, "search index=web | update host=patched").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);
    assert_eq!(store.snapshot(), before);
}

#[test]
fn test_delete_requires_delete_permission() {
    let store = sample_store();
    let engine = engine_for(&store).with_permissions(Arc::new(GrantTable::new().grant("alice", "change_event")));

    let err = run(&engine, "search index=web | delete").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);
    assert_eq!(store.len(), 3);

    let engine = engine.with_permissions(Arc::new(AllowAll));
    let out = run(&engine, "search index=web | delete").unwrap();
    assert_eq!(out.as_value(), Some(&json!(2)));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_last_returns_final_stored_event() {
    let store = sample_store();
    let engine = engine_for(&store);

    let out = records(&engine, "search index=web | last");
    assert_eq!(out.len(), 1);
    assert_eq!(out[0]["host"], "web02");

    assert!(records(&engine, "search index=nope | last").is_empty());

    let err = run(&engine, r#"echo '{"a": 1}' | last"#).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
}

#[test]
fn test_table_encodes_cells() {
    let store = sample_store();
    let engine = engine_for(&store);

    let out = run(&engine, r#"echo '{"a": 1, "b": 2}' | table"#).unwrap().into_value();
    assert_eq!(out["visualization"], "table");
    assert_eq!(out["columns"], json!([{"title": "a"}, {"title": "b"}]));
    assert_eq!(out["data"], json!([["1", "2"]]));

    let out = run(&engine, r#"echo '{"a": "<b>", "n": "42"}' | table -f n a"#).unwrap().into_value();
    assert_eq!(out["data"], json!([["42", "\"&lt;b&gt;\""]]));

    let out = run(&engine, r#"echo '{"a": 1, "b": 2}' | table -f"#).unwrap().into_value();
    assert_eq!(out["columns"], json!([]));
    assert_eq!(out["data"], json!([[]]));
}

#[test]
fn test_quoted_pipe_does_not_split_stage() {
    let store = sample_store();
    let engine = engine_for(&store);

    let out = records(&engine, r#"echo '[{"msg": "a|b"}, {"msg": "c"}]' | search "msg=a|b""#);
    assert_eq!(out, vec![obj(json!({"msg": "a|b"}))]);
}

#[test]
fn test_unresolved_references_stay_literal() {
    let store = sample_store();
    let engine = engine_for(&store);

    let out = records(&engine, r#"set greeting=hi | echo '{"msg": "$greeting $nope"}'"#);
    assert_eq!(out, vec![obj(json!({"msg": "hi $nope"}))]);
}

#[test]
fn test_head_bounds_infinite_generator() {
    let store = sample_store();
    let engine = engine_for(&store);

    let out = records(&engine, "fake_data | head -n 3");
    assert_eq!(out.len(), 3);
    assert_eq!(out[2]["seq"], 2);

    assert_eq!(records(&engine, "search index=web | head -n 1").len(), 1);
}

fn dated_store() -> Arc<MemoryStore> {
    let at = |host: &str, created: DateTime<Utc>| {
        let mut event = event("t", host, r#"{"a": 1}"#);
        event.created = created;
        event
    };
    Arc::new(
        MemoryStore::with_events(vec![
            at("old", "2020-06-01T00:00:00Z".parse().unwrap()),
            at("new", "2024-06-01T00:00:00Z".parse().unwrap()),
            at("recent", Utc::now() - Duration::hours(1)),
        ])
        .unwrap(),
    )
}

fn hosts(engine: &Engine, query: &str) -> Vec<String> {
    records(engine, query)
        .into_iter()
        .map(|r| r["host"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn test_time_bounds_narrow_across_stages() {
    let store = dated_store();
    let engine = engine_for(&store);

    assert_eq!(hosts(&engine, "search --latest 2021-01-01"), vec!["old"]);
    assert_eq!(hosts(&engine, "search --earliest 2023-01-01 --latest 2025-01-01"), vec!["new"]);
    assert_eq!(hosts(&engine, "search --since 2h"), vec!["recent"]);

    assert_eq!(
        hosts(&engine, "search --earliest 2023-01-01 | search --earliest 2019-01-01"),
        vec!["new", "recent"]
    );
    assert_eq!(
        hosts(&engine, "search --latest 2025-01-01 | search --latest 2030-01-01"),
        vec!["old", "new"]
    );
    assert_eq!(hosts(&engine, "search --since 2h | search --earliest 2019-01-01"), vec!["recent"]);
    assert!(hosts(&engine, "search --earliest 2023-01-01 | search --latest 2021-01-01").is_empty());

    assert_eq!(
        hosts(&engine, "search --earliest 2023-01-01 | head -n 5 | search --earliest 2019-01-01"),
        vec!["new", "recent"]
    );
}

#[test]
fn test_stages_after_head_see_only_limited_events() {
    let store = sample_store();
    let engine = engine_for(&store);

    assert!(records(&engine, "search | head -n 1 | search index=db").is_empty());
    assert_eq!(hosts(&engine, "search | head -n 2 | search index=web"), vec!["web01"]);
    assert_eq!(hosts(&engine, "search | head -n 2 | sort -r host"), vec!["web01", "db01"]);
    assert_eq!(hosts(&engine, "search | sort -r host | head -n 2"), vec!["web02", "web01"]);
}

#[test]
fn test_filter_and_eval() {
    let store = sample_store();
    let engine = engine_for(&store);

    let out = records(&engine, r#"echo '[{"n": 1}, {"n": 5}]' | filter n > 1 | eval double=n*2"#);
    assert_eq!(out, vec![obj(json!({"n": 5, "double": 10}))]);
}

#[test]
fn test_sort_and_dedup() {
    let store = sample_store();
    let engine = engine_for(&store);

    let out = records(&engine, r#"echo '[{"k": 2}, {"k": 1}, {"k": 2}, {"k": 3}]' | dedup k | sort -r k"#);
    let keys: Vec<Value> = out.into_iter().map(|r| r["k"].clone()).collect();
    assert_eq!(keys, vec![json!(3), json!(2), json!(1)]);
}

#[test]
fn test_stats_groups_and_stores_context() {
    let store = sample_store();
    let engine = engine_for(&store);
    let caller = Caller::new("alice");
    let mut env = Environment::for_caller(&caller);

    let out = engine
        .execute("search index=web | stats count -c total", &caller, &mut env)
        .unwrap()
        .into_records()
        .unwrap();
    assert_eq!(out, vec![obj(json!({"count": 2}))]);
    assert_eq!(env.get("total"), Some(&json!(2)));

    let out = records(
        &engine,
        "search | explode extracted_fields | stats -b index count sum(a)",
    );
    assert_eq!(
        out,
        vec![
            obj(json!({"index": "web", "count": 2, "sum(a)": 4})),
            obj(json!({"index": "db", "count": 1, "sum(a)": 2})),
        ]
    );
}

#[test]
fn test_join_with_subquery() {
    let store = sample_store();
    let engine = engine_for(&store);

    let out = records(
        &engine,
        r#"echo '[{"host": "web01", "role": "frontend"}, {"host": "db99", "role": "spare"}]' | join -f host "search index=web | head -n 5""#,
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0]["role"], "frontend");
    assert_eq!(out[0]["index"], "web");

    let out = records(
        &engine,
        r#"echo '[{"host": "web01"}, {"host": "db99"}]' | join -t left -f host search index=web"#,
    );
    assert_eq!(out.len(), 2);
    assert_eq!(out[1]["host"], "db99");
    assert_eq!(out[1]["index"], Value::Null);
}

#[test]
fn test_error_kinds() {
    let store = sample_store();
    let engine = engine_for(&store);

    let err = run(&engine, "search | nosuch").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownCommand);
    assert_eq!(err.report().stage, Some(2));

    let err = run(&engine, "search | head -n lots").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArguments);

    let err = run(&engine, "search | | head").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    assert_eq!(err.report().stage, None);

    let err = run(&engine, "search 'index=web").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
}

#[test]
fn test_record_shaping_commands() {
    let store = sample_store();
    let engine = engine_for(&store);

    let out = records(
        &engine,
        r#"echo '{"geo": {"city": "Oslo", "pos": {"lat": 1}}, "n": "7", "t": "true", "tags": "x", "none": null}'
            | explode geo --prefix geo_ --flatten
            | drop_fields geo
            | autocast n
            | ensure_list tags none
            | select geo_city geo_pos.lat n t tags none missing"#,
    );
    assert_eq!(
        out,
        vec![obj(json!({
            "geo_city": "Oslo",
            "geo_pos.lat": 1,
            "n": 7,
            "t": "true",
            "tags": ["x"],
            "none": [],
            "missing": null,
        }))]
    );
}
