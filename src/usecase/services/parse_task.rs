use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};

use crate::usecase::ports::parser::{CancelFlag, ParseError, ParseReply, ParseRequest, SheetParser};

/// Handle to one in-flight parse. Dropping it tears the task down.
///
/// Teardown is advisory: the worker notices the flag between row chunks and
/// still sends its (cancelled) reply, which the session then ignores.
#[derive(Debug)]
pub struct ParseTaskHandle {
    id: u64,
    cancel: CancelFlag,
    worker: Option<JoinHandle<()>>,
}

impl ParseTaskHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn tear_down(self) {
        drop(self);
    }
}

impl Drop for ParseTaskHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        // Detach; joining here would block the interactive thread.
        self.worker.take();
    }
}

/// Runs `request` on a fresh worker thread and delivers exactly one reply.
///
/// One thread per call, never pooled. `wrap` turns the reply into whatever
/// message type the receiving inbox carries.
pub fn spawn_parse<M, F>(
    parser: Arc<dyn SheetParser>,
    request: ParseRequest,
    inbox: Sender<M>,
    wrap: F,
) -> Result<ParseTaskHandle>
where
    M: Send + 'static,
    F: FnOnce(ParseReply) -> M + Send + 'static,
{
    let id = request.id;
    let cancel = CancelFlag::new();
    let worker_cancel = cancel.clone();

    let worker = thread::Builder::new()
        .name(format!("sheet-parse-{id}"))
        .spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                parser.parse(&request, &worker_cancel)
            }))
            .unwrap_or_else(|_| Err(ParseError::Failed("parser panicked".to_string())));

            // The session may already be gone; nobody is left to care.
            let _ = inbox.send(wrap(ParseReply { id, outcome }));
        })
        .with_context(|| format!("failed to start parse worker {id}"))?;

    Ok(ParseTaskHandle {
        id,
        cancel,
        worker: Some(worker),
    })
}

/// A caller-visible slot holding at most one in-flight parse.
#[derive(Debug, Default)]
pub struct ParseSlot {
    current: Option<ParseTaskHandle>,
}

impl ParseSlot {
    /// Installs `handle`, tearing down whatever was running in the slot.
    pub fn start(&mut self, handle: ParseTaskHandle) {
        if let Some(previous) = self.current.replace(handle) {
            tracing::debug!(id = previous.id(), "tearing down superseded parse task");
            previous.tear_down();
        }
    }

    /// Releases the slot if `id` is the task occupying it.
    pub fn finish(&mut self, id: u64) {
        if self.current.as_ref().is_some_and(|handle| handle.id() == id) {
            self.current = None;
        }
    }

    pub fn cancel(&mut self) {
        self.current = None;
    }

    pub fn is_busy(&self) -> bool {
        self.current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;
    use crate::domain::entities::source::SheetSelection;
    use crate::domain::entities::workbook::{ParsedSheet, RawSheet, Scalar, Workbook};
    use crate::usecase::services::normalize::NormalizingParser;

    struct PanickingParser;

    impl SheetParser for PanickingParser {
        fn parse(&self, _: &ParseRequest, _: &CancelFlag) -> Result<ParsedSheet, ParseError> {
            panic!("boom");
        }
    }

    fn request(id: u64, sheet: &str) -> ParseRequest {
        let workbook = Workbook::new(vec![RawSheet::new(
            "Data",
            vec![
                vec![Scalar::from("Name")],
                vec![Scalar::from("alpha")],
            ],
        )]);
        ParseRequest {
            id,
            selection: SheetSelection::Single(sheet.to_string()),
            workbook: Arc::new(workbook),
            chunk_rows: 100,
        }
    }

    #[test]
    fn worker_replies_once_with_parsed_sheet() {
        let (tx, rx) = mpsc::channel();
        let handle = spawn_parse(Arc::new(NormalizingParser), request(7, "Data"), tx, |reply| reply)
            .expect("worker should start");

        let reply = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("worker should reply");

        assert_eq!(reply.id, 7);
        assert_eq!(reply.outcome.expect("parse should succeed").row_count(), 1);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err(), "exactly one reply");
        drop(handle);
    }

    #[test]
    fn missing_sheet_is_reported_as_error_reply() {
        let (tx, rx) = mpsc::channel();
        let _handle = spawn_parse(Arc::new(NormalizingParser), request(1, "Nope"), tx, |reply| reply)
            .expect("worker should start");

        let reply = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("worker should reply");

        assert_eq!(reply.outcome, Err(ParseError::MissingSheet("Nope".to_string())));
    }

    #[test]
    fn panicking_parser_still_replies() {
        let (tx, rx) = mpsc::channel();
        let _handle = spawn_parse(Arc::new(PanickingParser), request(3, "Data"), tx, |reply| reply)
            .expect("worker should start");

        let reply = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("worker should reply");

        assert!(matches!(reply.outcome, Err(ParseError::Failed(_))));
    }

    #[test]
    fn slot_keeps_only_latest_task() {
        let (tx, rx) = mpsc::channel();
        let mut slot = ParseSlot::default();
        let first = spawn_parse(Arc::new(NormalizingParser), request(1, "Data"), tx.clone(), |r| r)
            .expect("worker should start");
        let second = spawn_parse(Arc::new(NormalizingParser), request(2, "Data"), tx, |r| r)
            .expect("worker should start");

        slot.start(first);
        slot.start(second);
        slot.finish(1);
        assert!(slot.is_busy(), "finishing a superseded id must not free the slot");
        slot.finish(2);
        assert!(!slot.is_busy());

        let _ = rx.recv_timeout(Duration::from_secs(5));
        let _ = rx.recv_timeout(Duration::from_secs(5));
    }
}
