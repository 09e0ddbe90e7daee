use std::fs::OpenOptions;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use qit_runner::fifo::make_fifo;
use qit_runner::{ReportEvent, ReportHandler, ReportMessage};

fn collecting_handler(path: &std::path::Path) -> (ReportHandler, Arc<Mutex<Vec<ReportMessage>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut handler = ReportHandler::new(path).with_poll_interval(Duration::from_millis(10));
    handler.subscribe(move |m| sink.lock().expect("lock").push(m.clone()));
    (handler, seen)
}

#[test]
fn messages_reach_subscribers_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("run-report");
    make_fifo(&path).expect("mkfifo");

    let (handler, seen) = collecting_handler(&path);
    let mut listener = handler.start().expect("start");

    let mut writer = OpenOptions::new().write(true).open(&path).expect("open writer");
    writer
        .write_all(b"PROGRESS_UPDATE 42\n\nFOO bar\n")
        .expect("write");
    drop(writer);

    let started = Instant::now();
    listener.stop();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!listener.is_running());

    let seen = seen.lock().expect("lock");
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].event, ReportEvent::ProgressUpdate);
    assert_eq!(seen[0].args, vec!["42"]);
    assert_eq!(seen[1].event, ReportEvent::Unknown);
    assert_eq!(seen[1].tag, "FOO");
    assert_eq!(seen[1].args, vec!["bar"]);
}

#[test]
fn stop_returns_when_no_writer_ever_connects() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("idle-report");
    make_fifo(&path).expect("mkfifo");

    let (handler, seen) = collecting_handler(&path);
    let mut listener = handler.start().expect("start");
    std::thread::sleep(Duration::from_millis(30));

    let started = Instant::now();
    listener.stop();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(seen.lock().expect("lock").is_empty());
}

#[test]
fn stop_drains_a_writer_that_is_still_open() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("open-report");
    make_fifo(&path).expect("mkfifo");

    let (handler, seen) = collecting_handler(&path);
    let mut listener = handler.start().expect("start");

    let mut writer = OpenOptions::new().write(true).open(&path).expect("open writer");
    writer.write_all(b"ERROR disk full\nPROGRESS_POP").expect("write");

    let started = Instant::now();
    listener.stop();
    assert!(started.elapsed() < Duration::from_secs(1));
    drop(writer);

    let seen = seen.lock().expect("lock");
    let tags = seen.iter().map(|m| m.tag.as_str()).collect::<Vec<_>>();
    assert_eq!(tags, vec!["ERROR", "PROGRESS_POP"]);
    assert_eq!(seen[0].args, vec!["disk", "full"]);
}

#[test]
fn dropping_a_listener_stops_it() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("dropped-report");
    make_fifo(&path).expect("mkfifo");

    let (handler, _seen) = collecting_handler(&path);
    let listener = handler.start().expect("start");
    let started = Instant::now();
    drop(listener);
    assert!(started.elapsed() < Duration::from_secs(1));
}
