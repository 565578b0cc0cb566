// tests/cli_tests.rs

use assert_cmd::Command;
use predicates::prelude::*;

fn delve() -> Command {
    let mut cmd = Command::cargo_bin("delve").unwrap();
    cmd.env_remove("DELVE_CONFIG").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_search_jsonl_output() {
    delve()
        .arg("search")
        .arg(r#"echo '[{"host":"web01","n":1},{"host":"web02","n":2}]' | head -n 1"#)
        .arg("-F")
        .arg("jsonl")
        .assert()
        .success()
        .stdout("{\"host\":\"web01\",\"n\":1}\n");
}

#[test]
fn test_keys_and_csv_output() {
    delve()
        .arg("search")
        .arg(r#"echo '{"name":"alice","geo":{"city":"Oslo"},"age":30}'"#)
        .arg("-F")
        .arg("csv")
        .arg("-k")
        .arg("geo.city,name")
        .assert()
        .success()
        .stdout("geo.city,name\nOslo,alice\n");
}

#[test]
fn test_set_seeds_query_variables() {
    delve()
        .arg("search")
        .arg(r#"echo '{"who":"$who"}'"#)
        .arg("--set")
        .arg("who=bob")
        .arg("-F")
        .arg("jsonl")
        .assert()
        .success()
        .stdout("{\"who\":\"bob\"}\n");
}

#[test]
fn test_saved_events_persist_between_runs() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("events.jsonl");

    delve()
        .arg("search")
        .arg("fake_data -n 3 | make_events -i weblogs -S")
        .arg("--data")
        .arg(&data)
        .arg("--user")
        .arg("carol")
        .arg("-F")
        .arg("jsonl")
        .assert()
        .success();
    assert_eq!(std::fs::read_to_string(&data).unwrap().lines().count(), 3);

    delve()
        .arg("search")
        .arg("search index=weblogs user=carol | stats count")
        .arg("--data")
        .arg(&data)
        .arg("-F")
        .arg("jsonl")
        .assert()
        .success()
        .stdout("{\"count\":3}\n");
}

#[test]
fn test_config_file_restricts_commands() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("delve.yaml");
    std::fs::write(&config, "commands:\n  find: search\n  first: head\n").unwrap();

    delve()
        .arg("--config")
        .arg(&config)
        .arg("commands")
        .assert()
        .success()
        .stdout(predicate::str::contains("find").and(predicate::str::contains("first")))
        .stdout(predicate::str::contains("make_events").not());

    delve()
        .env("DELVE_CONFIG", &config)
        .arg("search")
        .arg("fake_data -n 2")
        .assert()
        .failure()
        .stderr(predicate::str::contains("fake_data"));
}

#[test]
fn test_stage_errors_exit_nonzero() {
    delve()
        .arg("search")
        .arg(r#"echo '{"x":1}' | rename -f y -t z"#)
        .arg("-F")
        .arg("jsonl")
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::starts_with("delve: stage 2 (rename): "));
}

#[test]
fn test_json_format_reports_structured_errors() {
    delve()
        .arg("search")
        .arg(r#"echo '{"x":1}' | rename -f y -t z"#)
        .arg("-F")
        .arg("json")
        .assert()
        .failure()
        .stderr(predicate::str::contains(r#""kind":"field""#).and(predicate::str::contains(r#""stage":2"#)));
}

#[test]
fn test_value_output_as_table() {
    delve()
        .arg("search")
        .arg(r#"echo '{"a":1,"b":"x"}' | table"#)
        .arg("-F")
        .arg("table")
        .assert()
        .success()
        .stdout("a  b\n-  ---\n1  \"x\"\n");
}
