use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::builder::SessionDraft;
use crate::error::{SubmissionError, TransitionError};
use crate::models::{SchedulingRequest, SessionKind};
use crate::notify::{NotificationRecord, NotificationSink};
use crate::proposal::Proposal;
use crate::repository::SessionRepository;
use crate::solver::{ResponseConfig, Solver, SolverEnvelope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    TypeSelection,
    FormBuilding,
    Review,
    Submitting,
    ProposalReceived,
    Validated,
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepName::TypeSelection => "type-selection",
            StepName::FormBuilding => "form-building",
            StepName::Review => "review",
            StepName::Submitting => "submitting",
            StepName::ProposalReceived => "proposal-received",
            StepName::Validated => "validated",
        };
        f.write_str(name)
    }
}

/// Whole workflow context. Serializes, so a caller can park it between steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum WorkflowState {
    TypeSelection,
    FormBuilding {
        draft: SessionDraft,
    },
    Review {
        draft: SessionDraft,
        request: SchedulingRequest,
        /// Dismissible banner left by the last failed submission.
        error: Option<String>,
    },
    Submitting {
        draft: SessionDraft,
        request: SchedulingRequest,
    },
    ProposalReceived {
        draft: SessionDraft,
        request: SchedulingRequest,
        proposal: Proposal,
    },
    Validated {
        request: SchedulingRequest,
        proposal: Proposal,
        planning_id: Uuid,
    },
}

impl WorkflowState {
    pub fn step(&self) -> StepName {
        match self {
            WorkflowState::TypeSelection => StepName::TypeSelection,
            WorkflowState::FormBuilding { .. } => StepName::FormBuilding,
            WorkflowState::Review { .. } => StepName::Review,
            WorkflowState::Submitting { .. } => StepName::Submitting,
            WorkflowState::ProposalReceived { .. } => StepName::ProposalReceived,
            WorkflowState::Validated { .. } => StepName::Validated,
        }
    }
}

pub struct PlanningWorkflow {
    state: WorkflowState,
    solver: Arc<dyn Solver>,
    notifications: Arc<dyn NotificationSink>,
    sessions: Arc<dyn SessionRepository>,
    response_config: ResponseConfig,
}

impl PlanningWorkflow {
    pub fn new(
        solver: Arc<dyn Solver>,
        notifications: Arc<dyn NotificationSink>,
        sessions: Arc<dyn SessionRepository>,
    ) -> Self {
        Self {
            state: WorkflowState::TypeSelection,
            solver,
            notifications,
            sessions,
            response_config: ResponseConfig::default(),
        }
    }

    /// Pick up a parked workflow.
    ///
    /// A parked state comes from outside, so its request is rebuilt from the
    /// draft and any held proposal is checked again against it. A draft that no
    /// longer builds lands back in the form; a proposal that no longer fits is
    /// dropped. A workflow parked mid-submission has no request in flight any
    /// more, so it resumes in review.
    pub fn resume(
        state: WorkflowState,
        solver: Arc<dyn Solver>,
        notifications: Arc<dyn NotificationSink>,
        sessions: Arc<dyn SessionRepository>,
    ) -> Self {
        let state = match state {
            WorkflowState::Review { draft, error, .. } => match rebuild(draft) {
                Ok((draft, request)) => WorkflowState::Review {
                    draft,
                    request,
                    error,
                },
                Err(form) => form,
            },
            WorkflowState::Submitting { draft, .. } => match rebuild(draft) {
                Ok((draft, request)) => WorkflowState::Review {
                    draft,
                    request,
                    error: Some("Soumission interrompue, veuillez confirmer à nouveau".to_string()),
                },
                Err(form) => form,
            },
            WorkflowState::ProposalReceived {
                draft, proposal, ..
            } => match rebuild(draft) {
                Ok((draft, request)) => match proposal.check_against(&request) {
                    Ok(()) => WorkflowState::ProposalReceived {
                        draft,
                        request,
                        proposal,
                    },
                    Err(err) => {
                        tracing::warn!(error = %err, "parked proposal dropped");
                        WorkflowState::Review {
                            draft,
                            request,
                            error: Some(format!("Proposition écartée: {err}")),
                        }
                    }
                },
                Err(form) => form,
            },
            other => other,
        };

        Self {
            state,
            ..Self::new(solver, notifications, sessions)
        }
    }

    pub fn with_response_config(mut self, response_config: ResponseConfig) -> Self {
        self.response_config = response_config;
        self
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn step(&self) -> StepName {
        self.state.step()
    }

    pub fn is_submitting(&self) -> bool {
        matches!(self.state, WorkflowState::Submitting { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            WorkflowState::Review { error, .. } => error.as_deref(),
            _ => None,
        }
    }

    pub fn request(&self) -> Option<&SchedulingRequest> {
        match &self.state {
            WorkflowState::Review { request, .. }
            | WorkflowState::Submitting { request, .. }
            | WorkflowState::ProposalReceived { request, .. }
            | WorkflowState::Validated { request, .. } => Some(request),
            _ => None,
        }
    }

    pub fn proposal(&self) -> Option<&Proposal> {
        match &self.state {
            WorkflowState::ProposalReceived { proposal, .. }
            | WorkflowState::Validated { proposal, .. } => Some(proposal),
            _ => None,
        }
    }

    fn not_allowed(&self, action: &'static str) -> TransitionError {
        TransitionError::NotAllowed {
            action,
            from: self.step(),
        }
    }

    fn enter(&mut self, state: WorkflowState) {
        tracing::debug!(step = %state.step(), "workflow step");
        self.state = state;
    }

    pub fn select_type(&mut self, kind: SessionKind) -> Result<(), TransitionError> {
        if !matches!(self.state, WorkflowState::TypeSelection) {
            return Err(self.not_allowed("select_type"));
        }
        self.enter(WorkflowState::FormBuilding {
            draft: SessionDraft::new(kind),
        });
        Ok(())
    }

    /// Edit the form. The session kind picked at type selection is kept.
    pub fn update_draft(
        &mut self,
        edit: impl FnOnce(&mut SessionDraft),
    ) -> Result<(), TransitionError> {
        match &mut self.state {
            WorkflowState::FormBuilding { draft } => {
                let kind = draft.session_kind;
                edit(draft);
                draft.session_kind = kind;
                Ok(())
            }
            _ => Err(self.not_allowed("update_draft")),
        }
    }

    /// Validate the form and move to review. On validation failure the form
    /// stays as it is.
    pub fn submit_form(&mut self) -> Result<(), TransitionError> {
        let request = match &self.state {
            WorkflowState::FormBuilding { draft } => draft.build()?,
            _ => return Err(self.not_allowed("submit_form")),
        };

        if let WorkflowState::FormBuilding { draft } =
            std::mem::replace(&mut self.state, WorkflowState::TypeSelection)
        {
            self.enter(WorkflowState::Review {
                draft,
                request,
                error: None,
            });
        }
        Ok(())
    }

    /// Leave the form for type selection, dropping everything typed so far.
    pub fn back(&mut self) -> Result<(), TransitionError> {
        if !matches!(self.state, WorkflowState::FormBuilding { .. }) {
            return Err(self.not_allowed("back"));
        }
        self.enter(WorkflowState::TypeSelection);
        Ok(())
    }

    /// Return from review to the form with the draft intact.
    pub fn edit(&mut self) -> Result<(), TransitionError> {
        if !matches!(self.state, WorkflowState::Review { .. }) {
            return Err(self.not_allowed("edit"));
        }
        if let WorkflowState::Review { draft, .. } =
            std::mem::replace(&mut self.state, WorkflowState::TypeSelection)
        {
            self.enter(WorkflowState::FormBuilding { draft });
        }
        Ok(())
    }

    pub fn dismiss_error(&mut self) {
        if let WorkflowState::Review { error, .. } = &mut self.state {
            *error = None;
        }
    }

    /// Send the reviewed request to the solver.
    ///
    /// Lands in `ProposalReceived` on success. Any solver failure puts the
    /// workflow back in review with the error as a banner and is also returned;
    /// the request is not retried.
    pub async fn confirm(&mut self) -> Result<(), TransitionError> {
        let (draft, request) = match std::mem::replace(&mut self.state, WorkflowState::TypeSelection)
        {
            WorkflowState::Review { draft, request, .. } => (draft, request),
            other => {
                self.state = other;
                return Err(self.not_allowed("confirm"));
            }
        };
        self.enter(WorkflowState::Submitting {
            draft: draft.clone(),
            request: request.clone(),
        });

        let record = NotificationRecord::generation_requested(&request);
        if let Err(err) = self.notifications.notify(&record).await {
            tracing::warn!(error = %err, "failed to record planning notification");
        }

        match self.call_solver(&request).await {
            Ok(proposal) => {
                tracing::info!(
                    code_formation = %request.code_formation,
                    proposal_id = %proposal.id(),
                    sessions = proposal.sessions().len(),
                    "proposal received"
                );
                self.enter(WorkflowState::ProposalReceived {
                    draft,
                    request,
                    proposal,
                });
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    code_formation = %request.code_formation,
                    error = %err,
                    "solver submission failed"
                );
                self.enter(WorkflowState::Review {
                    draft,
                    request,
                    error: Some(err.to_string()),
                });
                Err(TransitionError::Submission(err))
            }
        }
    }

    async fn call_solver(&self, request: &SchedulingRequest) -> Result<Proposal, SubmissionError> {
        let envelope = SolverEnvelope {
            request: request.clone(),
            response_config: self.response_config.clone(),
        };
        let timeout = Duration::from_secs(self.response_config.timeout_seconds);

        let response = tokio::time::timeout(timeout, self.solver.solve(&envelope))
            .await
            .map_err(|_| {
                SubmissionError::Unreachable(format!(
                    "délai de {}s dépassé",
                    self.response_config.timeout_seconds
                ))
            })??;

        Proposal::from_solver(request, response)
    }

    /// Accept the proposal and persist it. Terminal.
    pub async fn accept(&mut self) -> Result<Uuid, TransitionError> {
        let (request, proposal) = match &self.state {
            WorkflowState::ProposalReceived {
                request, proposal, ..
            } => (request.clone(), proposal.clone()),
            _ => return Err(self.not_allowed("accept")),
        };

        let planning_id = self
            .sessions
            .save_planning(&request, &proposal)
            .await
            .map_err(TransitionError::Persistence)?;

        tracing::info!(
            code_formation = %request.code_formation,
            %planning_id,
            "planning validated"
        );
        self.enter(WorkflowState::Validated {
            request,
            proposal,
            planning_id,
        });
        Ok(planning_id)
    }

    /// Drop the proposal and go back to review with the same request.
    pub fn reject(&mut self) -> Result<(), TransitionError> {
        if !matches!(self.state, WorkflowState::ProposalReceived { .. }) {
            return Err(self.not_allowed("reject"));
        }
        if let WorkflowState::ProposalReceived { draft, request, .. } =
            std::mem::replace(&mut self.state, WorkflowState::TypeSelection)
        {
            self.enter(WorkflowState::Review {
                draft,
                request,
                error: None,
            });
        }
        Ok(())
    }

    /// Drop the proposal and the form, and start the form over for the same kind.
    pub fn adjust(&mut self) -> Result<(), TransitionError> {
        let kind = match &self.state {
            WorkflowState::ProposalReceived { request, .. } => request.session_kind,
            _ => return Err(self.not_allowed("adjust")),
        };
        self.enter(WorkflowState::FormBuilding {
            draft: SessionDraft::new(kind),
        });
        Ok(())
    }
}

/// Build the request a parked draft stands for, or fall back to the form.
fn rebuild(draft: SessionDraft) -> Result<(SessionDraft, SchedulingRequest), WorkflowState> {
    match draft.build() {
        Ok(request) => Ok((draft, request)),
        Err(errors) => {
            tracing::warn!(errors = %errors, "parked draft no longer valid");
            Err(WorkflowState::FormBuilding { draft })
        }
    }
}
