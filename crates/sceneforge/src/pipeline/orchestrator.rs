//! Render job orchestrator.
//!
//! Coordinates one conversational turn: persist the user's message,
//! recover runnable code from the model reply, persist the reply, submit
//! the code to the renderer, and keep the store consistent when any step
//! fails. Only a failed submission is compensated — a turn that never
//! produced a trackable job must not linger in history.

use std::sync::Arc;

use log::{info, warn};

use crate::db::{prompt_repo, Database, PromptKind, PromptRow};
use crate::extract::{self, ExtractedCode};
use crate::render::{RenderApi, RenderJob};

use super::error::PipelineError;

/// Result of a successful turn submission.
#[derive(Debug, Clone)]
pub struct SubmittedTurn {
    /// Handle to the remote job, ready for tracking.
    pub job: RenderJob,
    /// Id of the persisted USER record.
    pub user_prompt_id: String,
    /// Id of the persisted SYSTEM record; carries the task id and later
    /// the artifact URL.
    pub system_prompt_id: String,
    /// The code that was submitted, with extraction metadata.
    pub code: ExtractedCode,
}

/// Coordinates the conversation store, extractor, normalizer and render
/// client for one turn at a time. Turns across conversations are
/// independent; the orchestrator holds no per-turn state.
pub struct RenderJobOrchestrator {
    db: Database,
    render: Arc<dyn RenderApi>,
}

impl RenderJobOrchestrator {
    pub fn new(db: Database, render: Arc<dyn RenderApi>) -> Self {
        Self { db, render }
    }

    /// Submits one conversational turn.
    ///
    /// On extraction failure the USER record stays (the user's message is
    /// real) but no SYSTEM record or job is created. On submission failure
    /// both records are deleted in one transaction and the cause returned.
    pub async fn submit_turn(
        &self,
        project_id: &str,
        user_text: &str,
        model_reply: &str,
    ) -> Result<SubmittedTurn, PipelineError> {
        // Step 1: persist the user turn.
        let user_row = PromptRow::new(project_id, user_text, PromptKind::User);
        prompt_repo::insert(&self.db, &user_row)?;

        // Step 2: recover runnable code from the reply.
        let code = match extract::extract_and_normalize(model_reply) {
            Ok(code) => code,
            Err(e) => {
                info!(
                    "No code extracted for project {}; keeping user record {}",
                    project_id, user_row.id
                );
                return Err(e.into());
            }
        };
        if code.was_repaired {
            info!(
                "Extracted code ({} strategy) needed repair for project {}",
                code.strategy, project_id
            );
        }

        // Step 3: persist the raw reply so the conversation keeps the
        // model's full explanation, not just the code.
        let system_row = PromptRow::new(project_id, model_reply, PromptKind::System);
        prompt_repo::insert(&self.db, &system_row)?;

        // Step 4: submit; compensate both records if no job was created.
        let task_id = match self.render.submit(&code.source).await {
            Ok(task_id) => task_id,
            Err(submission) => {
                warn!(
                    "Render submission failed for project {}: {}; rolling back turn",
                    project_id, submission
                );
                if let Err(compensation) =
                    prompt_repo::delete_turn(&self.db, &user_row.id, &system_row.id)
                {
                    return Err(PipelineError::CompensationFailed {
                        submission,
                        compensation,
                    });
                }
                return Err(PipelineError::Submission(submission));
            }
        };

        // Step 5: attach the job to the system record and hand the job
        // handle to the caller.
        prompt_repo::set_task_id(&self.db, &system_row.id, &task_id)?;
        info!(
            "Turn submitted for project {}: task {} on prompt {}",
            project_id, task_id, system_row.id
        );

        Ok(SubmittedTurn {
            job: RenderJob::submitted(task_id),
            user_prompt_id: user_row.id,
            system_prompt_id: system_row.id,
            code,
        })
    }
}
