//! Administrative job reassignment.
//!
//! A reassignment reads the current assignment, refuses a no-op move, and
//! writes the new assignee with a compare-and-set on the assignment version.
//! Of two concurrent reassignments of one request at most one succeeds; the
//! other fails with a `Conflict` and is not retried. A retried attempt whose
//! earlier write committed without being acknowledged reports success.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tandem_core::access::Principal;
use tandem_core::admin_error::{AdminOperationError, OperationContext};
use tandem_core::cross_role::{EventCategory, NewCrossRoleEvent};
use tandem_core::error::CoreError;
use tandem_core::roles::Role;
use tandem_core::service::RequestRef;
use tandem_core::types::{DbId, Timestamp};
use tandem_db::models::assignment::{Assignment, Reassign};
use tokio::sync::Mutex;

use crate::error::EngineError;
use crate::event_log::CrossRoleEventLog;
use crate::retry::RetryPolicy;
use crate::store::AssignmentStore;

/// Action name used in logs and error context.
pub const ACTION_REASSIGN: &str = "reassign";

/// Event type appended after a successful reassignment.
pub const EVENT_JOB_REASSIGNED: &str = "job_reassigned";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReassignRequest {
    pub request: RequestRef,
    pub new_assignee_id: DbId,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReassignOutcome {
    pub success: bool,
    pub assignee_id: DbId,
    pub reassigned_at: Timestamp,
}

/// A compare-and-set issued by an earlier attempt of the same call.
#[derive(Debug, Clone, Copy)]
struct IssuedWrite {
    expected_version: i64,
    previous_assignee: Option<DbId>,
}

pub struct Reassignment {
    assignments: Arc<dyn AssignmentStore>,
    events: Arc<CrossRoleEventLog>,
    retry: RetryPolicy,
}

impl Reassignment {
    pub fn new(
        assignments: Arc<dyn AssignmentStore>,
        events: Arc<CrossRoleEventLog>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            assignments,
            events,
            retry,
        }
    }

    /// Move `input.request` to `input.new_assignee_id` as `principal`.
    pub async fn reassign(
        &self,
        principal: &Principal,
        input: ReassignRequest,
    ) -> Result<ReassignOutcome, AdminOperationError> {
        let context = OperationContext::new(ACTION_REASSIGN, Some(principal.actor_id))
            .with_subject(input.request)
            .with_subject(input.new_assignee_id)
            .with_metadata(json!({
                "service_type": input.request.service_type,
                "reason": input.reason,
            }));

        let (updated, previous_assignee) = match self.try_reassign(principal, &input).await {
            Ok(result) => result,
            Err(e) => {
                let err = AdminOperationError::from_failure(e, context);
                tracing::warn!(
                    request = %input.request,
                    new_assignee_id = input.new_assignee_id,
                    actor_id = principal.actor_id,
                    code = %err.code,
                    error = %err.message,
                    "Reassignment failed"
                );
                return Err(err);
            }
        };

        tracing::info!(
            request = %input.request,
            previous_assignee_id = ?previous_assignee,
            new_assignee_id = input.new_assignee_id,
            version = updated.version,
            actor_id = principal.actor_id,
            "Job reassigned"
        );

        self.record_event(principal, &input, &updated, previous_assignee)
            .await;

        Ok(ReassignOutcome {
            success: true,
            assignee_id: input.new_assignee_id,
            reassigned_at: updated.reassigned_at.unwrap_or_else(Utc::now),
        })
    }

    async fn try_reassign(
        &self,
        principal: &Principal,
        input: &ReassignRequest,
    ) -> Result<(Assignment, Option<DbId>), EngineError> {
        if !principal.is_privileged() {
            return Err(CoreError::Forbidden(format!(
                "{} {} may not reassign jobs",
                principal.role, principal.actor_id
            ))
            .into());
        }
        if input.new_assignee_id <= 0 {
            return Err(CoreError::Validation("new_assignee_id must be positive".into()).into());
        }

        let write = Reassign {
            new_assignee_id: input.new_assignee_id,
            reason: input.reason.clone(),
            notes: input.notes.clone(),
        };
        let request = &input.request;
        let write = &write;
        let issued = &Mutex::new(None);
        self.retry
            .execute(ACTION_REASSIGN, move || self.attempt(request, write, issued))
            .await
    }

    async fn attempt(
        &self,
        request: &RequestRef,
        write: &Reassign,
        issued: &Mutex<Option<IssuedWrite>>,
    ) -> Result<(Assignment, Option<DbId>), EngineError> {
        let current = self
            .assignments
            .current_assignment(request)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                entity: "assignment",
                id: request.to_string(),
            })?;

        if current.assignee_id == Some(write.new_assignee_id) {
            // Our own write from an attempt whose result was lost.
            if let Some(prior) = *issued.lock().await {
                if current.version > prior.expected_version {
                    tracing::info!(
                        request = %request,
                        version = current.version,
                        "Earlier reassignment attempt had committed"
                    );
                    return Ok((current, prior.previous_assignee));
                }
            }
            return Err(CoreError::Conflict(format!(
                "Job is already assigned to provider {}",
                write.new_assignee_id
            ))
            .into());
        }

        *issued.lock().await = Some(IssuedWrite {
            expected_version: current.version,
            previous_assignee: current.assignee_id,
        });
        let updated = self
            .assignments
            .compare_and_reassign(request, current.version, write)
            .await?
            .ok_or_else(|| {
                CoreError::Conflict("Job was already assigned by a concurrent reassignment".into())
            })?;
        Ok((updated, current.assignee_id))
    }

    async fn record_event(
        &self,
        principal: &Principal,
        input: &ReassignRequest,
        updated: &Assignment,
        previous_assignee: Option<DbId>,
    ) {
        let event = NewCrossRoleEvent::new(EVENT_JOB_REASSIGNED, EventCategory::Booking, principal.role)
            .with_actor(principal.actor_id)
            .with_target(Role::Provider, Some(input.new_assignee_id))
            .with_request(input.request, None)
            .with_data(json!({
                "previous_assignee_id": previous_assignee,
                "new_assignee_id": input.new_assignee_id,
                "reason": input.reason,
                "notes": input.notes,
                "version": updated.version,
            }));
        let event = &event;
        let appended = self
            .retry
            .execute("append_event", move || self.events.append(event.clone()))
            .await;
        if let Err(e) = appended {
            tracing::error!(request = %input.request, error = %e, "Failed to append reassignment event");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
