//! Report channel: line-oriented `TAG arg...` messages from the running
//! program, read on a dedicated thread.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::DEFAULT_REPORT_POLL_INTERVAL;
use crate::fifo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportEvent {
    ProgressPush,
    ProgressPop,
    ProgressUpdate,
    Error,
    Unknown,
}

impl ReportEvent {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "PROGRESS_PUSH" => ReportEvent::ProgressPush,
            "PROGRESS_POP" => ReportEvent::ProgressPop,
            "PROGRESS_UPDATE" => ReportEvent::ProgressUpdate,
            "ERROR" => ReportEvent::Error,
            _ => ReportEvent::Unknown,
        }
    }

    pub fn as_tag(&self) -> Option<&'static str> {
        match self {
            ReportEvent::ProgressPush => Some("PROGRESS_PUSH"),
            ReportEvent::ProgressPop => Some("PROGRESS_POP"),
            ReportEvent::ProgressUpdate => Some("PROGRESS_UPDATE"),
            ReportEvent::Error => Some("ERROR"),
            ReportEvent::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportMessage {
    pub event: ReportEvent,
    /// Wire tag as received, kept for `Unknown` events.
    pub tag: String,
    pub args: Vec<String>,
}

/// `None` for blank lines.
pub fn parse_line(line: &str) -> Option<ReportMessage> {
    let mut tokens = line.split_whitespace();
    let tag = tokens.next()?;
    Some(ReportMessage {
        event: ReportEvent::from_tag(tag),
        tag: tag.to_string(),
        args: tokens.map(str::to_string).collect(),
    })
}

pub type Subscriber = Box<dyn FnMut(&ReportMessage) + Send>;

/// A report pipe with its subscribers, not yet listening.
pub struct ReportHandler {
    fifo: PathBuf,
    poll_interval: Duration,
    subscribers: Vec<Subscriber>,
}

impl ReportHandler {
    pub fn new(fifo: impl Into<PathBuf>) -> Self {
        Self {
            fifo: fifo.into(),
            poll_interval: DEFAULT_REPORT_POLL_INTERVAL,
            subscribers: Vec::new(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&ReportMessage) + Send + 'static) {
        self.subscribers.push(Box::new(callback));
    }

    /// Opens the pipe on the calling thread, so a writer launched afterwards
    /// never blocks, then hands it to the reader thread.
    pub fn start(self) -> Result<ReportListener> {
        let file = fifo::open_nonblocking_reader(&self.fifo)?;
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let interval = self.poll_interval;
        let subscribers = self.subscribers;
        let thread = std::thread::Builder::new()
            .name("qit-report".to_string())
            .spawn(move || listen(file, &thread_stop, interval, subscribers))
            .context("spawn report listener")?;
        log::debug!("listening on {}", self.fifo.display());
        Ok(ReportListener {
            stop,
            thread: Some(thread),
        })
    }
}

pub struct ReportListener {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ReportListener {
    /// Drains what is already in the pipe, then joins the reader thread.
    /// Subscribers are dropped with the thread. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("report listener panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }
}

impl Drop for ReportListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn listen(mut file: File, stop: &AtomicBool, interval: Duration, mut subscribers: Vec<Subscriber>) {
    let mut pending = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let stopping = stop.load(Ordering::Acquire);
        if !stopping {
            match fifo::poll_readable(&file, interval) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    log::warn!("report pipe poll failed: {err}");
                    return;
                }
            }
        }

        let mut hit_eof = false;
        loop {
            match file.read(&mut buf) {
                Ok(0) => {
                    hit_eof = true;
                    break;
                }
                Ok(n) => {
                    pending.extend_from_slice(&buf[..n]);
                    dispatch_lines(&mut pending, &mut subscribers);
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    log::warn!("report pipe read failed: {err}");
                    return;
                }
            }
        }

        if stopping {
            if !pending.is_empty() {
                pending.push(b'\n');
                dispatch_lines(&mut pending, &mut subscribers);
            }
            return;
        }
        // A closed writer keeps the pipe readable at EOF.
        if hit_eof {
            std::thread::sleep(interval);
        }
    }
}

fn dispatch_lines(pending: &mut Vec<u8>, subscribers: &mut [Subscriber]) {
    while let Some(end) = pending.iter().position(|&b| b == b'\n') {
        let line = pending.drain(..=end).collect::<Vec<_>>();
        let text = String::from_utf8_lossy(&line);
        let Some(message) = parse_line(&text) else {
            continue;
        };
        log::debug!("report {} {:?}", message.tag, message.args);
        for subscriber in subscribers.iter_mut() {
            subscriber(&message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_split_on_whitespace() {
        let msg = parse_line("PROGRESS_UPDATE  42\t7\n").expect("message");
        assert_eq!(msg.event, ReportEvent::ProgressUpdate);
        assert_eq!(msg.tag, "PROGRESS_UPDATE");
        assert_eq!(msg.args, vec!["42", "7"]);
        assert_eq!(parse_line("   \n"), None);
    }

    #[test]
    fn unknown_tags_keep_their_text() {
        let msg = parse_line("FOO bar").expect("message");
        assert_eq!(msg.event, ReportEvent::Unknown);
        assert_eq!(msg.tag, "FOO");
        assert_eq!(ReportEvent::Unknown.as_tag(), None);
        for event in [
            ReportEvent::ProgressPush,
            ReportEvent::ProgressPop,
            ReportEvent::ProgressUpdate,
            ReportEvent::Error,
        ] {
            let tag = event.as_tag().expect("wire tag");
            assert_eq!(ReportEvent::from_tag(tag), event);
        }
    }

    #[test]
    fn partial_lines_wait_for_newline() {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut subs: Vec<Subscriber> = vec![Box::new(move |m: &ReportMessage| {
            sink.lock().expect("lock").push(m.tag.clone());
        })];
        let mut pending = b"ERROR a\nPROGRESS_P".to_vec();
        dispatch_lines(&mut pending, &mut subs);
        assert_eq!(*seen.lock().expect("lock"), vec!["ERROR"]);
        assert_eq!(pending, b"PROGRESS_P");
    }
}
