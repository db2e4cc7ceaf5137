#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use nodescrape_lib::series::{Labels, OutputFormat, SeriesFormat};
use nodescrape_lib::{ExternalCollector, MetricSource, ScrapeError};
use tempfile::TempDir;
use tokio::sync::Mutex;

lazy_static! {
    // Writing an executable while another test forks can make exec fail
    // with ETXTBSY, so script tests run one at a time.
    static ref SCRIPTS: Mutex<()> = Mutex::new(());
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
    path
}

/// Script printing `app.run 1 <n>` where n counts its invocations.
fn counter_script(dir: &Path) -> PathBuf {
    let counter = dir.join("count");
    write_script(
        dir,
        "counter.sh",
        &format!(
            "n=$(cat '{0}' 2>/dev/null || echo 0)\nn=$((n + 1))\necho $n > '{0}'\necho \"app.run 1 $n\"",
            counter.display()
        ),
    )
}

fn text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).expect("utf-8 output")
}

#[tokio::test]
async fn both_dialects_are_encoded_as_sensision() {
    let _guard = SCRIPTS.lock().await;
    let dir = TempDir::new().unwrap();
    let script = write_script(
        dir.path(),
        "mixed.sh",
        r#"echo "os.cpu 1620000000000000 42.5"
echo '{"metric":"os.mem","timestamp":1620000000000000,"value":87,"tags":{"host":"a"}}'
echo "not a valid point"
echo ""
echo '{"Metric":"os.mem","Name":"unit","Value":"bytes"}'
echo "app.state 1620000000000000 up and running zone=eu""#,
    );

    let collector = ExternalCollector::new(&script, 3, false, &SeriesFormat::default());
    collector.scrape().await.unwrap();

    assert_eq!(
        text(collector.metrics().await),
        "1620000000000000// os.cpu{} 42.5\n\
         1620000000000000// os.mem{host=a} 87\n\
         1620000000000000// app.state{zone=eu} 'up%20and%20running'\n"
    );
}

#[tokio::test]
async fn global_format_is_ignored_but_separator_and_labels_apply() {
    let _guard = SCRIPTS.lock().await;
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), "one.sh", "echo 'os.cpu 1620000000000000 1'");

    let mut labels = Labels::new();
    labels.insert("dc".to_string(), "gra".to_string());
    let format = SeriesFormat::new(OutputFormat::Prometheus, "_", labels);
    let collector = ExternalCollector::new(&script, 1, false, &format);
    collector.scrape().await.unwrap();

    assert_eq!(
        text(collector.metrics().await),
        "1620000000000000// os_cpu{dc=gra} 1\n"
    );
}

#[tokio::test]
async fn stderr_is_not_part_of_the_output() {
    let _guard = SCRIPTS.lock().await;
    let dir = TempDir::new().unwrap();
    let script = write_script(
        dir.path(),
        "noisy.sh",
        "echo 'warming up' >&2\necho 'app.up 1 true'\necho 'done' >&2",
    );

    let collector = ExternalCollector::new(&script, 1, false, &SeriesFormat::default());
    collector.scrape().await.unwrap();
    assert_eq!(text(collector.metrics().await), "1// app.up{} 'true'\n");
}

#[tokio::test]
async fn nonzero_exit_fails_but_keeps_parsed_lines() {
    let _guard = SCRIPTS.lock().await;
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), "fail.sh", "echo 'app.partial 1 5'\nexit 3");

    let collector = ExternalCollector::new(&script, 1, false, &SeriesFormat::default());
    let err = collector.scrape().await.unwrap_err();
    assert!(matches!(err, ScrapeError::Exit { .. }));
    assert_eq!(text(collector.metrics().await), "1// app.partial{} 5\n");
}

#[tokio::test]
async fn missing_executable_is_a_spawn_error() {
    let dir = TempDir::new().unwrap();
    let collector = ExternalCollector::new(
        dir.path().join("absent.sh"),
        1,
        false,
        &SeriesFormat::default(),
    );
    let err = collector.scrape().await.unwrap_err();
    assert!(matches!(err, ScrapeError::Spawn { .. }));
    assert!(collector.metrics().await.is_empty());
}

#[tokio::test]
async fn history_keeps_the_most_recent_commits() {
    let _guard = SCRIPTS.lock().await;
    let dir = TempDir::new().unwrap();
    let collector = ExternalCollector::new(counter_script(dir.path()), 2, true, &SeriesFormat::default());

    collector.scrape().await.unwrap();
    assert_eq!(text(collector.metrics().await), "1// app.run{} 1\n");

    collector.scrape().await.unwrap();
    assert_eq!(
        text(collector.metrics().await),
        "1// app.run{} 2\n1// app.run{} 1\n"
    );

    collector.scrape().await.unwrap();
    assert_eq!(
        text(collector.metrics().await),
        "1// app.run{} 3\n1// app.run{} 2\n"
    );
    assert_eq!(
        text(collector.retained().await),
        "1// app.run{} 3\n1// app.run{} 2\n"
    );

    // Reading again without a scrape commits an empty snapshot.
    assert_eq!(text(collector.metrics().await), "1// app.run{} 3\n");
}

#[tokio::test]
async fn without_history_only_the_newest_commit_is_returned() {
    let _guard = SCRIPTS.lock().await;
    let dir = TempDir::new().unwrap();
    let collector = ExternalCollector::new(counter_script(dir.path()), 3, false, &SeriesFormat::default());

    collector.scrape().await.unwrap();
    collector.scrape().await.unwrap();
    assert_eq!(
        text(collector.metrics().await),
        "1// app.run{} 1\n1// app.run{} 2\n"
    );
    assert!(collector.metrics().await.is_empty());
}

#[tokio::test]
async fn invalid_utf8_spoils_only_its_own_line() {
    let _guard = SCRIPTS.lock().await;
    let dir = TempDir::new().unwrap();
    let script = write_script(
        dir.path(),
        "binary.sh",
        "echo 'app.a 1 1'\nprintf 'app.bad 1 \\377\\n'\necho 'binary' >&2\nprintf '\\377\\n' >&2\necho 'app.b 1 2'",
    );

    let collector = ExternalCollector::new(&script, 1, false, &SeriesFormat::default());
    collector.scrape().await.unwrap();

    assert_eq!(
        text(collector.metrics().await),
        "1// app.a{} 1\n1// app.bad{} '%EF%BF%BD'\n1// app.b{} 2\n"
    );
}
