//! Units of work executed by the pool or the confirmation gate

use crate::context::Store;
use crate::types::Payload;
use anyhow::{Context, Result};
use log::{debug, info};
use std::sync::Arc;

/// A unit of work against the remote store.
///
/// `run` returns `Ok(true)` when a change was applied and `Ok(false)` when
/// nothing was done. An `Err` is fatal: the sync aborts.
pub trait Task: Send {
    /// Human-readable description, e.g. `Policy [app]`.
    fn description(&self) -> String;

    /// Remote path the task targets.
    fn path(&self) -> &str;

    /// Question asked before a destructive task runs.
    fn confirmation_prompt(&self) -> String {
        format!("Delete {} at {}", self.description(), self.path())
    }

    /// Execute the task on the given worker.
    fn run(&self, worker: usize) -> Result<bool>;
}

/// A boxed task for type-erased queues
pub type BoxedTask = Box<dyn Task>;

/// Exactly one remote write.
pub struct WriteTask {
    store: Arc<dyn Store>,
    path: String,
    description: String,
    data: Payload,
}

impl WriteTask {
    pub fn new(
        store: Arc<dyn Store>,
        path: impl Into<String>,
        description: impl Into<String>,
        data: Payload,
    ) -> Self {
        Self {
            store,
            path: path.into(),
            description: description.into(),
            data,
        }
    }
}

impl Task for WriteTask {
    fn description(&self) -> String {
        self.description.clone()
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn run(&self, worker: usize) -> Result<bool> {
        debug!("Writing {} {{worker-{worker}}}", self.description);
        self.store
            .write(&self.path, &self.data)
            .with_context(|| format!("Error writing {} to {}", self.description, self.path))?;
        Ok(true)
    }
}

/// Exactly one remote delete.
pub struct DeleteTask {
    store: Arc<dyn Store>,
    path: String,
    description: String,
}

impl DeleteTask {
    pub fn new(store: Arc<dyn Store>, path: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            store,
            path: path.into(),
            description: description.into(),
        }
    }
}

impl Task for DeleteTask {
    fn description(&self) -> String {
        self.description.clone()
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn run(&self, _worker: usize) -> Result<bool> {
        self.store
            .delete(&self.path)
            .with_context(|| format!("Error deleting {} at {}", self.description, self.path))?;
        info!("{} deleted", self.description);
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Store that records calls and can fail on chosen paths.
    #[derive(Default)]
    pub(crate) struct RecordingStore {
        pub writes: Mutex<Vec<(String, Payload)>>,
        pub deletes: Mutex<Vec<String>>,
        pub fail_on: Mutex<Vec<String>>,
    }

    impl Store for RecordingStore {
        fn write(&self, path: &str, data: &Payload) -> Result<()> {
            if self.fail_on.lock().iter().any(|p| p == path) {
                anyhow::bail!("permission denied");
            }
            self.writes.lock().push((path.to_string(), data.clone()));
            Ok(())
        }

        fn delete(&self, path: &str) -> Result<()> {
            if self.fail_on.lock().iter().any(|p| p == path) {
                anyhow::bail!("permission denied");
            }
            self.deletes.lock().push(path.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_write_task_writes_once() {
        let store = Arc::new(RecordingStore::default());
        let mut data = Payload::new();
        data.insert("policy".into(), "path \"*\" {}".into());
        let task = WriteTask::new(store.clone(), "sys/policies/acl/app", "Policy [app]", data);

        assert!(task.run(1).unwrap());
        let writes = store.writes.lock();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, "sys/policies/acl/app");
    }

    #[test]
    fn test_write_task_error_names_description() {
        let store = Arc::new(RecordingStore::default());
        store.fail_on.lock().push("sys/policies/acl/app".into());
        let task = WriteTask::new(store, "sys/policies/acl/app", "Policy [app]", Payload::new());

        let err = task.run(0).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("Error writing Policy [app]"));
        assert!(message.contains("permission denied"));
    }

    #[test]
    fn test_delete_prompt_names_path() {
        let store = Arc::new(RecordingStore::default());
        let task = DeleteTask::new(store.clone(), "sys/policies/acl/old", "Policy [old]");

        assert_eq!(
            task.confirmation_prompt(),
            "Delete Policy [old] at sys/policies/acl/old"
        );
        assert!(task.run(0).unwrap());
        assert_eq!(*store.deletes.lock(), vec!["sys/policies/acl/old".to_string()]);
    }
}
