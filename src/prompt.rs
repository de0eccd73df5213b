//! Interactive confirmation collaborator.
//!
//! Corrections that rewrite existing state (changing a live group's gid)
//! are gated behind a yes/no prompt unless the caller passed --assume-yes.
//! The prompt is a blocking call with no timeout.

use anyhow::Result;
use std::io::{self, BufRead, Write};

/// A yes/no decision point presented to the operator.
pub trait InteractionPrompt {
    fn confirm(&self, message: &str) -> Result<bool>;
}

/// Reads the decision from the terminal.
pub struct StdinPrompt;

impl InteractionPrompt for StdinPrompt {
    fn confirm(&self, message: &str) -> Result<bool> {
        print!("{} [y/N] ", message);
        io::stdout().flush()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        let answer = answer.trim().to_ascii_lowercase();
        Ok(answer == "y" || answer == "yes")
    }
}

/// Fixed answer, for --assume-yes and for tests.
pub struct PresetPrompt {
    pub answer: bool,
}

impl InteractionPrompt for PresetPrompt {
    fn confirm(&self, _message: &str) -> Result<bool> {
        Ok(self.answer)
    }
}
