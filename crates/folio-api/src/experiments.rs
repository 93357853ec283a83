use axum::extract::State;
use chrono::Utc;
use tracing::debug;

use folio_core::stats::{chi_squared, significance};
use folio_db::models::AssignmentRow;
use folio_types::api::{AssignmentResponse, ExperimentResultsResponse, VariantResultResponse};

use crate::caller::Caller;
use crate::error::{ActionError, ActionResult, blocking, ok};
use crate::extract::PathParam;
use crate::state::AppState;
use crate::validate;

/// Enroll the caller. The variant is a pure function of experiment and
/// user, so repeated calls return the same answer.
pub async fn assign(
    State(state): State<AppState>,
    caller: Caller,
    PathParam(name): PathParam<String>,
) -> ActionResult<AssignmentResponse> {
    caller.require_active()?;
    validate::experiment_name(&name)?;

    let db = state.db.clone();
    let user_id = caller.id();
    let row = blocking(move || db.assign_experiment(&name, user_id, Utc::now())).await?;
    debug!("{} is in {} of {}", user_id, row.variant, row.experiment);
    ok(assignment_response(row))
}

pub async fn convert(
    State(state): State<AppState>,
    caller: Caller,
    PathParam(name): PathParam<String>,
) -> ActionResult<AssignmentResponse> {
    caller.require_active()?;
    validate::experiment_name(&name)?;

    let db = state.db.clone();
    let user_id = caller.id();
    let row = blocking(move || db.mark_converted(&name, user_id))
        .await?
        .ok_or(ActionError::NotFound("Not enrolled in this experiment"))?;
    ok(assignment_response(row))
}

pub async fn results(
    State(state): State<AppState>,
    caller: Caller,
    PathParam(name): PathParam<String>,
) -> ActionResult<ExperimentResultsResponse> {
    caller.require_admin()?;
    validate::experiment_name(&name)?;

    let db = state.db.clone();
    let experiment = name.clone();
    let counts = blocking(move || db.variant_counts(&experiment)).await?;
    let statistic = chi_squared(&counts);

    ok(ExperimentResultsResponse {
        experiment: name,
        variants: counts
            .iter()
            .map(|v| VariantResultResponse {
                variant: v.name.clone(),
                participants: v.participants,
                conversions: v.conversions,
                conversion_rate: v.conversion_rate(),
            })
            .collect(),
        chi_squared: statistic,
        significance: significance(statistic).label().to_string(),
    })
}

fn assignment_response(row: AssignmentRow) -> AssignmentResponse {
    AssignmentResponse {
        experiment: row.experiment,
        variant: row.variant,
        converted: row.converted,
    }
}
