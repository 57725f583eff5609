use anyhow::Result;
use inquire::Confirm;

/// Yes/no questions asked before destructive commands
pub trait Prompt {
    fn confirm(&self, message: &str, default: bool) -> Result<bool>;
}

/// Asks on the terminal through `inquire`
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        let answer = Confirm::new(message).with_default(default).prompt()?;
        Ok(answer)
    }
}

/// Gives the same answer to every question; for scripted runs and tests
#[derive(Debug, Clone, Copy)]
pub struct FixedPrompt(pub bool);

impl Prompt for FixedPrompt {
    fn confirm(&self, _message: &str, _default: bool) -> Result<bool> {
        Ok(self.0)
    }
}
