use clap::Subcommand;
use magicblock_core::Request;

use super::{dispatch, CliResult};

#[derive(Subcommand)]
pub enum AnswerAction {
    /// Mark the pending question as answered correctly
    Correct,
    /// Mark the pending question as answered incorrectly
    Incorrect,
    /// Check an answer against the pending question
    Submit { answer: String },
}

pub async fn run(action: AnswerAction) -> CliResult {
    let request = match action {
        AnswerAction::Correct => Request::AnswerCorrect,
        AnswerAction::Incorrect => Request::AnswerIncorrect,
        AnswerAction::Submit { answer } => Request::SubmitAnswer { answer },
    };
    dispatch(request).await
}
