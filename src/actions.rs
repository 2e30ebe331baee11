use std::sync::Arc;

use crate::composer::QueryComposer;
use crate::error::{ServiceError, StoreError};
use crate::models::{ActionOutcome, Identity, Status};
use crate::registry::StoreRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Approve,
    Reject,
}

impl Action {
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Action::Approve),
            "reject" => Ok(Action::Reject),
            _ => Err(ServiceError::InvalidAction(raw.to_string())),
        }
    }

    pub fn target(&self) -> Status {
        match self {
            Action::Approve => Status::Approved,
            Action::Reject => Status::Rejected,
        }
    }

    fn past_tense(&self) -> &'static str {
        match self {
            Action::Approve => "approved",
            Action::Reject => "rejected",
        }
    }
}

/// Applies review decisions. Each call is one status UPDATE; concurrent
/// reviewers race with last-write-wins.
pub struct ActionService {
    registry: Arc<StoreRegistry>,
    composer: QueryComposer,
}

impl ActionService {
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        let composer = QueryComposer::for_registry(&registry);
        Self { registry, composer }
    }

    pub fn transition(
        &self,
        reviewer: &Identity,
        entity_id: i64,
        action: &str,
    ) -> Result<ActionOutcome, ServiceError> {
        let action = Action::parse(action)?;
        let target = action.target();

        let probe = self.composer.build_status_probe(entity_id);
        let rows = probe.run(&self.registry)?;
        let Some(row) = rows.first() else {
            return Err(ServiceError::NotFound(entity_id));
        };
        let current = Status::from_foreign_key(
            row.get::<Option<i64>>("new_companies_status_id")
                .map_err(|e| StoreError::query(probe.store, e))?,
        );

        if current == target {
            tracing::debug!(company_id = entity_id, reviewer = reviewer.id, status = ?current, "transition already applied");
            return Ok(ActionOutcome {
                success: true,
                message: format!("Company {} is already {}", entity_id, action.past_tense()),
                status: current,
            });
        }

        let update = self.composer.build_status_update(entity_id, target);
        let affected = self
            .registry
            .execute_write(update.store, &update.sql, &update.params)?;
        if affected == 0 {
            return Err(ServiceError::NotFound(entity_id));
        }

        tracing::info!(
            company_id = entity_id,
            reviewer = reviewer.id,
            role = %reviewer.role,
            from = current.label(),
            to = target.label(),
            "company status changed"
        );

        let message = if current == Status::Pending {
            format!("Company {} {}", entity_id, action.past_tense())
        } else {
            format!(
                "Company {} {} (was {})",
                entity_id,
                action.past_tense(),
                current.label()
            )
        };
        Ok(ActionOutcome {
            success: true,
            message,
            status: target,
        })
    }
}
