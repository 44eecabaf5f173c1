//! Sync context and provider traits
//!
//! These traits allow the engine to be used without depending on a
//! specific remote client or terminal implementation.

use crate::counter::WorkCounter;
use crate::executor::WorkerPool;
use crate::gate::ConfirmationGate;
use crate::task::{BoxedTask, DeleteTask, WriteTask};
use crate::types::{Payload, SyncStats, SyncSummary};
use anyhow::Result;
use log::warn;
use std::collections::VecDeque;
use std::sync::Arc;

/// Default number of attempts before an unparseable answer counts as "no".
pub const DEFAULT_CONFIRM_ATTEMPTS: usize = 3;

/// Remote store the engine writes to
///
/// Implement this trait over the concrete API client.
pub trait Store: Send + Sync {
    /// Write a payload to a path
    fn write(&self, path: &str, data: &Payload) -> Result<()>;

    /// Delete a path
    fn delete(&self, path: &str) -> Result<()>;
}

/// Decides whether a destructive change may proceed
///
/// Implement this trait to handle operator interaction.
pub trait ConfirmationPolicy: Send {
    /// Ask whether the action described by `prompt` may proceed
    ///
    /// # Returns
    /// `true` if approved, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// Always approve
pub struct AutoConfirm;

impl ConfirmationPolicy for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Always decline
pub struct AutoDecline;

impl ConfirmationPolicy for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Replays a fixed list of typed answers, for tests and scripted runs.
///
/// Answers are consumed in order with the same retry rules as an
/// interactive prompt; running out of answers counts as no input.
pub struct ScriptedAnswers {
    answers: VecDeque<String>,
    prompts: Vec<String>,
    max_attempts: usize,
}

impl ScriptedAnswers {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            prompts: Vec::new(),
            max_attempts: DEFAULT_CONFIRM_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Prompts shown so far, one entry per confirmation.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    /// Answers not yet consumed.
    pub fn remaining(&self) -> usize {
        self.answers.len()
    }
}

impl ConfirmationPolicy for ScriptedAnswers {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        self.prompts.push(prompt.to_string());
        let answers = &mut self.answers;
        confirm_with_retries(self.max_attempts, |_| Ok(answers.pop_front()))
    }
}

/// Interpret a typed answer. `None` means it could not be understood.
///
/// A bare return is "no".
pub fn parse_answer(input: &str) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "" | "n" | "no" => Some(false),
        _ => None,
    }
}

/// Ask up to `max_attempts` times until an answer parses.
///
/// `ask` receives the 1-based attempt number and returns the raw answer,
/// or `None` when input is exhausted. Exhausted input or attempts resolve
/// to `false`.
pub fn confirm_with_retries<F>(max_attempts: usize, mut ask: F) -> Result<bool>
where
    F: FnMut(usize) -> Result<Option<String>>,
{
    for attempt in 1..=max_attempts {
        let Some(answer) = ask(attempt)? else {
            break;
        };
        match parse_answer(&answer) {
            Some(decision) => return Ok(decision),
            None => warn!("Unrecognized answer '{}', expected y/n", answer.trim()),
        }
    }
    Ok(false)
}

/// Everything a sync routine needs, passed explicitly.
///
/// Bundles the store handle, worker pool, confirmation gate and counters.
/// There is no global state, so several contexts can coexist in tests.
pub struct SyncContext {
    store: Arc<dyn Store>,
    pool: WorkerPool,
    gate: ConfirmationGate,
    stats: Arc<SyncStats>,
}

impl SyncContext {
    /// Create a context with `workers` workers.
    pub fn new(store: Arc<dyn Store>, workers: usize) -> Result<Self> {
        let stats = Arc::new(SyncStats::default());
        Ok(Self {
            pool: WorkerPool::new(workers, Arc::clone(&stats))?,
            gate: ConfirmationGate::new(),
            store,
            stats,
        })
    }

    pub fn store(&self) -> Arc<dyn Store> {
        Arc::clone(&self.store)
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn gate(&self) -> &ConfirmationGate {
        &self.gate
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Queue a write on the pool.
    pub fn write(&self, path: impl Into<String>, description: impl Into<String>, data: Payload) -> Result<()> {
        self.pool
            .submit(Box::new(WriteTask::new(self.store(), path, description, data)))
    }

    /// Queue a write that also holds a ticket on a private barrier.
    pub fn write_tracked(
        &self,
        path: impl Into<String>,
        description: impl Into<String>,
        data: Payload,
        barrier: &Arc<WorkCounter>,
    ) -> Result<()> {
        self.pool.submit_tracked(
            Box::new(WriteTask::new(self.store(), path, description, data)),
            barrier,
        )
    }

    /// Propose deleting a path; runs only if confirmed.
    pub fn propose_delete(&self, path: impl Into<String>, description: impl Into<String>) -> Result<()> {
        self.gate
            .propose(Box::new(DeleteTask::new(self.store(), path, description)))
    }

    /// Propose an arbitrary destructive task.
    pub fn propose(&self, task: BoxedTask) -> Result<()> {
        self.gate.propose(task)
    }

    /// Record a resource skipped after a recoverable problem.
    pub fn skip(&self) {
        self.stats.record_skip();
    }

    /// Wait for all queued writes, then confirm proposals one by one.
    pub fn finish(&self, policy: &mut dyn ConfirmationPolicy) -> Result<SyncSummary> {
        self.pool.wait()?;
        self.gate.close_and_drain(policy, &self.stats)?;
        Ok(self.stats.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::tests::RecordingStore;

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("y"), Some(true));
        assert_eq!(parse_answer(" YES \n"), Some(true));
        assert_eq!(parse_answer("No"), Some(false));
        assert_eq!(parse_answer(""), Some(false));
        assert_eq!(parse_answer("  \n"), Some(false));
        assert_eq!(parse_answer("maybe"), None);
    }

    #[test]
    fn test_retries_until_parseable() {
        let mut answers = vec!["what", "?", "y"].into_iter();
        let mut asked = 0;
        let decision = confirm_with_retries(3, |attempt| {
            asked = attempt;
            Ok(answers.next().map(String::from))
        })
        .unwrap();
        assert!(decision);
        assert_eq!(asked, 3);
    }

    #[test]
    fn test_unparseable_answers_default_to_no() {
        for limit in 1..=5 {
            let decision =
                confirm_with_retries(limit, |_| Ok(Some("sure".to_string()))).unwrap();
            assert!(!decision);
        }

        // A "yes" after the attempt limit is never read.
        let mut policy = ScriptedAnswers::new(["?", "?", "?", "yes"]);
        assert!(!policy.confirm("Delete Policy [old]").unwrap());
        assert_eq!(policy.remaining(), 1);
    }

    #[test]
    fn test_empty_answer_declines_without_retry() {
        let mut policy = ScriptedAnswers::new(["", "y"]);
        assert!(!policy.confirm("Delete Policy [old]").unwrap());
        assert_eq!(policy.remaining(), 1);
    }

    #[test]
    fn test_exhausted_input_defaults_to_no() {
        let mut policy = ScriptedAnswers::new(Vec::<String>::new());
        assert!(!policy.confirm("Delete x").unwrap());
    }

    #[test]
    fn test_ask_errors_propagate() {
        let result = confirm_with_retries(3, |_| Err(anyhow::anyhow!("stdin closed")));
        assert!(result.is_err());
    }

    #[test]
    fn test_context_finish_runs_writes_before_proposals() {
        let store = Arc::new(RecordingStore::default());
        let ctx = SyncContext::new(store.clone(), 2).unwrap();

        ctx.write("sys/policies/acl/app", "Policy [app]", Payload::new())
            .unwrap();
        ctx.propose_delete("sys/policies/acl/old", "Policy [old]")
            .unwrap();
        ctx.skip();

        let summary = ctx.finish(&mut AutoConfirm).unwrap();
        assert_eq!(summary.written, 1);
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(*store.deletes.lock(), vec!["sys/policies/acl/old".to_string()]);
    }

    #[test]
    fn test_context_finish_reports_fatal_write() {
        let store = Arc::new(RecordingStore::default());
        store.fail_on.lock().push("sys/policies/acl/app".into());
        let ctx = SyncContext::new(store.clone(), 2).unwrap();

        ctx.write("sys/policies/acl/app", "Policy [app]", Payload::new())
            .unwrap();
        ctx.propose_delete("sys/policies/acl/old", "Policy [old]")
            .unwrap();

        assert!(ctx.finish(&mut AutoConfirm).is_err());
        assert!(store.deletes.lock().is_empty());
    }
}
