//! Operator confirmation on the terminal

use crate::cli::ConfirmMode;
use anyhow::Result;
use dialoguer::Input;
use log::warn;
use reconcile::{AutoConfirm, AutoDecline, ConfirmationPolicy, DEFAULT_CONFIRM_ATTEMPTS, confirm_with_retries};

/// Asks on the terminal, giving up after a few unparseable answers
pub struct TerminalPrompt {
    max_attempts: usize,
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_CONFIRM_ATTEMPTS,
        }
    }
}

impl ConfirmationPolicy for TerminalPrompt {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        confirm_with_retries(self.max_attempts, |_| {
            let answer = Input::<String>::new()
                .with_prompt(format!("{prompt} [y/n]?"))
                .allow_empty(true)
                .interact_text();
            match answer {
                Ok(answer) => Ok(Some(answer)),
                // No terminal to read from counts as no answer at all.
                Err(err) => {
                    warn!("Could not read answer: {err}");
                    Ok(None)
                }
            }
        })
    }
}

/// Confirmation policy for the selected mode
pub fn policy_for(mode: ConfirmMode) -> Box<dyn ConfirmationPolicy> {
    match mode {
        ConfirmMode::Interactive => Box::new(TerminalPrompt::default()),
        ConfirmMode::AlwaysApprove => Box::new(AutoConfirm),
        ConfirmMode::AlwaysDeny => Box::new(AutoDecline),
    }
}
