use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Example Feed</title>
    <link>http://www.example.com/</link>
    <cloud domain="rpc.example.com"/>
    <item>
      <title>First post</title>
      <guid>http://www.example.com/posts/1</guid>
    </item>
    <item>
      <title>Second post</title>
      <guid>http://www.example.com/posts/2</guid>
    </item>
  </channel>
</rss>
"#;

fn dmap(dir: &Path) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("dmap").into();
    cmd.current_dir(dir);
    cmd.env("NO_COLOR", "1");
    cmd.env_remove("DATAMAPPER_DB");
    cmd.env_remove("DATAMAPPER_SCHEMA");
    cmd
}

/// Tempdir holding `feed.xml`. The guard must be kept alive.
fn workspace() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let feed = tmp.path().join("feed.xml");
    fs::write(&feed, FEED).unwrap();
    (tmp, feed)
}

// --- Binary startup ---

#[test]
fn binary_runs() {
    let mut cmd: Command = cargo_bin_cmd!("dmap").into();
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("dmap"));
}

// --- Import ---

#[test]
fn import_creates_database() {
    let (tmp, feed) = workspace();

    dmap(tmp.path())
        .args(["import", feed.to_str().unwrap()])
        .assert()
        .success()
        .stderr(predicate::str::contains("3 entities (3 new, 0 existing)"));

    assert!(tmp.path().join("datamapper.db").exists());
}

#[test]
fn import_twice_matches_channel() {
    let (tmp, feed) = workspace();

    dmap(tmp.path())
        .args(["import", feed.to_str().unwrap()])
        .assert()
        .success();
    dmap(tmp.path())
        .args(["import", feed.to_str().unwrap()])
        .assert()
        .success()
        .stderr(predicate::str::contains("(2 new, 1 existing)"));
}

#[test]
fn import_respects_db_flag() {
    let (tmp, feed) = workspace();

    dmap(tmp.path())
        .args(["import", feed.to_str().unwrap(), "--db", "feeds.db"])
        .assert()
        .success();

    assert!(tmp.path().join("feeds.db").exists());
    assert!(!tmp.path().join("datamapper.db").exists());
}

#[test]
fn import_reads_db_from_env() {
    let (tmp, feed) = workspace();

    dmap(tmp.path())
        .env("DATAMAPPER_DB", "env.db")
        .args(["import", feed.to_str().unwrap()])
        .assert()
        .success();

    assert!(tmp.path().join("env.db").exists());
}

#[test]
fn import_dry_run_writes_nothing() {
    let (tmp, feed) = workspace();

    dmap(tmp.path())
        .args(["import", feed.to_str().unwrap(), "--dry-run"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Mapped"));

    assert!(!tmp.path().join("datamapper.db").exists());
}

#[test]
fn import_lists_unmapped_tags() {
    let (tmp, feed) = workspace();

    dmap(tmp.path())
        .args(["import", feed.to_str().unwrap(), "--dry-run"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Unmapped tags"))
        .stderr(predicate::str::contains("rss"));
}

#[test]
fn import_json_report() {
    let (tmp, feed) = workspace();

    let output = dmap(tmp.path())
        .args(["import", feed.to_str().unwrap(), "--dry-run", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["entities"], 3);
    assert_eq!(report["created"], 3);
}

#[test]
fn import_json_document() {
    let tmp = TempDir::new().unwrap();
    let feed = tmp.path().join("feed.json");
    fs::write(
        &feed,
        r#"{"channel": {"link": "l", "item": [{"title": "a"}]}}"#,
    )
    .unwrap();

    dmap(tmp.path())
        .args(["import", feed.to_str().unwrap()])
        .assert()
        .success()
        .stderr(predicate::str::contains("2 entities"));
}

#[test]
fn import_format_flag_overrides_extension() {
    let tmp = TempDir::new().unwrap();
    let feed = tmp.path().join("feed.txt");
    fs::write(&feed, r#"{"channel": {"link": "l"}}"#).unwrap();

    dmap(tmp.path())
        .args(["import", feed.to_str().unwrap(), "--format", "json", "--dry-run"])
        .assert()
        .success()
        .stderr(predicate::str::contains("1 entities"));
}

#[test]
fn import_json_root_tag_names_entity() {
    let tmp = TempDir::new().unwrap();
    let feed = tmp.path().join("channel.json");
    fs::write(&feed, r#"{"link": "l", "item": [{"title": "a"}, {"title": "b"}]}"#).unwrap();

    dmap(tmp.path())
        .args(["import", feed.to_str().unwrap(), "--dry-run"])
        .args(["--root-tag", "channel"])
        .assert()
        .success()
        .stderr(predicate::str::contains("3 entities"));
}

#[test]
fn import_missing_file() {
    let tmp = TempDir::new().unwrap();

    dmap(tmp.path())
        .args(["import", "nope.xml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("file not found"));
}

#[test]
fn import_malformed_xml() {
    let tmp = TempDir::new().unwrap();
    let feed = tmp.path().join("broken.xml");
    fs::write(&feed, "<rss><channel>").unwrap();

    dmap(tmp.path())
        .args(["import", feed.to_str().unwrap(), "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to map"));
}

#[test]
fn import_with_custom_schema() {
    let (tmp, feed) = workspace();
    let schema = tmp.path().join("schema.json");
    fs::write(
        &schema,
        r#"{"entities": [
            {"name": "Channel", "fields": [{"name": "title", "kind": "scalar"}]},
            {"name": "Item", "fields": [
                {"name": "channel", "kind": "reference", "target": "Channel"},
                {"name": "guid", "kind": "scalar", "unique": true}
            ]}
        ]}"#,
    )
    .unwrap();

    for expected in ["3 new, 0 existing", "1 new, 2 existing"] {
        dmap(tmp.path())
            .args(["import", feed.to_str().unwrap()])
            .args(["--schema", schema.to_str().unwrap()])
            .assert()
            .success()
            .stderr(predicate::str::contains(expected));
    }
}

#[test]
fn import_ambiguous_schema_fails() {
    let (tmp, feed) = workspace();
    let schema = tmp.path().join("schema.json");
    fs::write(
        &schema,
        r#"{"entities": [{"name": "Item", "fields": [
            {"name": "pub_date", "kind": "scalar"},
            {"name": "pubDate", "kind": "scalar"}
        ]}]}"#,
    )
    .unwrap();

    dmap(tmp.path())
        .args(["import", feed.to_str().unwrap()])
        .args(["--schema", schema.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load schema"));
}

// --- Schema ---

#[test]
fn schema_shows_builtin_rss() {
    let tmp = TempDir::new().unwrap();

    dmap(tmp.path())
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("Channel"))
        .stdout(predicate::str::contains("managingeditor"))
        .stdout(predicate::str::contains("-> Channel"));
}

#[test]
fn schema_reports_ambiguities() {
    let tmp = TempDir::new().unwrap();
    let schema = tmp.path().join("schema.json");
    fs::write(
        &schema,
        r#"{"entities": [{"name": "Item", "fields": [
            {"name": "pub_date", "kind": "scalar"},
            {"name": "pubDate", "kind": "scalar"}
        ]}]}"#,
    )
    .unwrap();

    dmap(tmp.path())
        .args(["schema", "--schema", schema.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("pub_date, pubDate"));
}

// --- History ---

#[test]
fn history_empty() {
    let tmp = TempDir::new().unwrap();

    dmap(tmp.path())
        .arg("history")
        .assert()
        .success()
        .stderr(predicate::str::contains("No imports recorded"));
}

#[test]
fn history_lists_imports() {
    let (tmp, feed) = workspace();

    dmap(tmp.path())
        .args(["import", feed.to_str().unwrap()])
        .assert()
        .success();

    dmap(tmp.path())
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("feed.xml"))
        .stdout(predicate::str::contains("3 entities"));
}
