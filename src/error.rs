use thiserror::Error;

use crate::workflow::StepName;

/// Every rule the draft broke, in the order the rules were checked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", .0.join("; "))]
pub struct ValidationErrors(pub Vec<String>);

impl ValidationErrors {
    pub fn messages(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, message: &str) -> bool {
        self.0.iter().any(|m| m == message)
    }
}

/// Failures talking to the solver. The workflow rolls back to review on any of them.
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// Solver could not be reached or timed out
    #[error("Solveur injoignable: {0}")]
    Unreachable(String),

    /// Solver answered with a non-2xx status
    #[error("Le solveur a répondu {status}: {body}")]
    Status { status: u16, body: String },

    /// Body could not be decoded or broke a proposal invariant
    #[error("Réponse du solveur invalide: {0}")]
    Malformed(String),
}

impl SubmissionError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        SubmissionError::Malformed(msg.into())
    }
}

/// An action that the current workflow step does not allow.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("action `{action}` impossible depuis l'étape {from}")]
    NotAllowed {
        action: &'static str,
        from: StepName,
    },

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("le formulaire contient des erreurs: {0}")]
    Invalid(#[from] ValidationErrors),

    #[error("enregistrement du planning impossible: {0}")]
    Persistence(#[source] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_display_every_message() {
        let errors = ValidationErrors(vec![
            "Code formation requis".to_string(),
            "Au moins un jour actif requis".to_string(),
        ]);

        assert_eq!(
            errors.to_string(),
            "Code formation requis; Au moins un jour actif requis"
        );
        let wrapped = TransitionError::from(errors);
        assert!(wrapped.to_string().ends_with("Au moins un jour actif requis"));
    }
}
