//! Confirmation gate - serializes destructive proposals behind operator approval

use crate::context::ConfirmationPolicy;
use crate::task::BoxedTask;
use crate::types::{EngineError, SyncStats};
use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, unbounded};
use log::info;
use parking_lot::Mutex;

/// Unbounded queue of destructive tasks.
///
/// Nothing queued here runs until [`close_and_drain`](Self::close_and_drain),
/// which the driver calls once all additive work has finished. Items are
/// then processed one at a time on the calling thread.
pub struct ConfirmationGate {
    sender: Mutex<Option<Sender<BoxedTask>>>,
    receiver: Receiver<BoxedTask>,
}

impl Default for ConfirmationGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfirmationGate {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver,
        }
    }

    /// Queue a destructive task for confirmation.
    pub fn propose(&self, task: BoxedTask) -> Result<()> {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(sender) => sender
                .send(task)
                .map_err(|e| EngineError::GateClosed(e.into_inner().description()).into()),
            None => Err(EngineError::GateClosed(task.description()).into()),
        }
    }

    /// Number of proposals waiting.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Close the queue and run each proposal the policy approves.
    ///
    /// A declined proposal leaves the resource untouched. An approved one
    /// runs immediately; its failure is fatal and stops the drain.
    pub fn close_and_drain(&self, policy: &mut dyn ConfirmationPolicy, stats: &SyncStats) -> Result<()> {
        drop(self.sender.lock().take());

        for task in self.receiver.iter() {
            let description = task.description();
            info!("{description} does not exist in configuration, prompting for confirmation");

            if policy.confirm(&task.confirmation_prompt())? {
                if task.run(0)? {
                    stats.record_delete();
                }
            } else {
                info!("Leaving {description} even though it is not in configuration");
                stats.record_decline();
            }
        }
        Ok(())
    }
}
