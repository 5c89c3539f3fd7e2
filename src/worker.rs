//! Off-thread work that never touches the object graph.
//!
//! A [`BackgroundTask`] owns one spawned thread and the receiving end of its
//! result channel. Cancellation is cooperative: the job polls its
//! [`CancelToken`]. Dropping the task cancels it and joins the thread.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::JoinHandle;

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::jq_exec;
use crate::path_de;

// ————————————————————————————————————————————————————————————————————————————
// TASKS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() { Err(Error::Cancelled) } else { Ok(()) }
    }
}

pub struct BackgroundTask<T> {
    handle: Option<JoinHandle<()>>,
    rx: Receiver<Result<T>>,
    token: CancelToken,
}

impl<T: Send + 'static> BackgroundTask<T> {
    pub fn spawn(name: &str, job: impl FnOnce(&CancelToken) -> Result<T> + Send + 'static) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let token = CancelToken::default();
        let job_token = token.clone();
        let handle = std::thread::Builder::new().name(name.to_string()).spawn(move || {
            let result = job(&job_token);
            // the receiver may already be gone
            let _ = tx.send(result);
        })?;
        tracing::debug!(task = name, "spawned background task");
        Ok(Self { handle: Some(handle), rx, token })
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// The result, if the job has finished.
    pub fn try_result(&mut self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(Error::Cancelled)),
        }
    }

    /// Blocks until the job finishes.
    pub fn wait(mut self) -> Result<T> {
        let result = self.rx.recv().unwrap_or(Err(Error::Cancelled));
        self.join();
        result
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("background task panicked");
            }
        }
    }
}

impl<T> Drop for BackgroundTask<T> {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// ROWS FILES
// ————————————————————————————————————————————————————————————————————————————

/// One parsed rows document. Plain JSON so it can cross threads.
#[derive(Debug, Clone, PartialEq)]
pub struct RowsDocument {
    pub source: PathBuf,
    pub json: serde_json::Value,
}

/// Parses `path`, then reshapes it through `jq_expr` when given.
pub fn parse_rows_file(path: &Path, jq_expr: Option<&str>, token: &CancelToken) -> Result<Vec<RowsDocument>> {
    token.check()?;
    let json: serde_json::Value = path_de::from_file_with_path(path)?;
    let documents = match jq_expr {
        None => vec![json],
        Some(filter) => jq_exec::run_jaq(filter, &json)?,
    };
    tracing::debug!(path = %path.display(), documents = documents.len(), "parsed rows file");
    Ok(documents
        .into_iter()
        .map(|json| RowsDocument { source: path.to_path_buf(), json })
        .collect())
}

/// Parses every file in parallel on a background thread. Documents keep the
/// order of `paths`.
pub fn spawn_rows_loader(paths: Vec<PathBuf>, jq_expr: Option<String>) -> Result<BackgroundTask<Vec<RowsDocument>>> {
    BackgroundTask::spawn("rows-loader", move |token| {
        let parsed = paths
            .par_iter()
            .map(|path| parse_rows_file(path, jq_expr.as_deref(), token))
            .collect::<Result<Vec<_>>>()?;
        token.check()?;
        Ok(parsed.into_iter().flatten().collect())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("preforge-worker-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_files_in_order() {
        let a = temp_file("a.json", r#"[{"A": "1"}]"#);
        let b = temp_file("b.json", r#"{"rows": [{"A": "2"}]}"#);
        let task = spawn_rows_loader(vec![a.clone(), b.clone()], None).unwrap();
        let docs = task.wait().unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].source, a);
        assert_eq!(docs[1].source, b);
    }

    #[test]
    fn jq_reshapes_documents() {
        let path = temp_file("nested.json", r#"{"rows": [{"A": "1"}, {"A": "2"}]}"#);
        let docs = spawn_rows_loader(vec![path], Some(".rows".into())).unwrap().wait().unwrap();
        assert_eq!(docs[0].json, serde_json::json!([{"A": "1"}, {"A": "2"}]));
    }

    #[test]
    fn missing_files_are_errors() {
        let task = spawn_rows_loader(vec![PathBuf::from("/nonexistent/rows.json")], None).unwrap();
        assert!(matches!(task.wait(), Err(Error::Io(_))));
    }

    #[test]
    fn cancellation_is_observed() {
        let task = BackgroundTask::spawn("spin", |token: &CancelToken| {
            while !token.is_cancelled() {
                std::thread::sleep(Duration::from_millis(5));
            }
            token.check()
        })
        .unwrap();
        task.cancel();
        assert!(matches!(task.wait(), Err(Error::Cancelled)));
    }

    #[test]
    fn drop_cancels_and_joins() {
        let task = BackgroundTask::spawn("spin", |token: &CancelToken| {
            while !token.is_cancelled() {
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        })
        .unwrap();
        let token = task.token().clone();
        drop(task);
        assert!(token.is_cancelled());
    }
}
