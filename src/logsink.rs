use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

/// Severity attached to a sink message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

#[derive(Debug)]
struct Record {
    severity: Severity,
    message: String,
}

/// Handle for submitting audit messages without blocking the caller.
///
/// Messages are queued onto a bounded channel and drained by a single
/// consumer task, so submissions from one caller come out in the order they
/// were made. If the queue is full the message is emitted directly instead
/// of blocking the submitter.
#[derive(Clone)]
pub struct LogSink {
    tx: mpsc::Sender<Record>,
}

impl LogSink {
    /// Starts the consumer task and returns the submission handle.
    /// The task ends once every handle has been dropped.
    pub fn start(capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity);
        let task = tokio::spawn(drain(rx));
        (LogSink { tx }, task)
    }

    pub fn queue(&self, severity: Severity, message: impl Into<String>) {
        let record = Record {
            severity,
            message: message.into(),
        };

        if let Err(TrySendError::Full(record) | TrySendError::Closed(record)) =
            self.tx.try_send(record)
        {
            emit(&record);
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.queue(Severity::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.queue(Severity::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.queue(Severity::Error, message);
    }
}

async fn drain(mut rx: mpsc::Receiver<Record>) {
    while let Some(record) = rx.recv().await {
        emit(&record);
    }
}

fn emit(record: &Record) {
    match record.severity {
        Severity::Info => log::info!("{}", record.message),
        Severity::Warn => log::warn!("{}", record.message),
        Severity::Error => log::error!("{}", record.message),
    }
}
