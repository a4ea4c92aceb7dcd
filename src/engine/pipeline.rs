//! Per-row pipeline: skip decision, prompt render, provider call
//! with language-validation retry, durable write.

use super::render::{append_literal, column_values, substitute};
use super::{RowContext, RowOutcome, SkipReason};
use crate::error::{ProviderError, SchemaError};
use crate::provider::Message;
use crate::schema::DynValue;
use crate::storage::{AuditEntry, EnrichmentResult, SourceRow};
use crate::strategy::StorageMode;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Language-validation failures are retried: the original call plus up to
/// two more attempts.
const MAX_ATTEMPTS: u32 = 3;

/// Tokens reserved for the response and general slack when checking a
/// prompt against a model's context window.
const SAFETY_MARGIN_TOKENS: u32 = 2000;

/// A failed provider call or post-processing step, tagged with whether a
/// retry is worthwhile.
#[derive(Debug)]
enum CallError {
    Provider(ProviderError),
    Schema(SchemaError),
}

impl CallError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Provider(_) => false,
            Self::Schema(err) => err.is_recoverable(),
        }
    }
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provider(err) => write!(f, "{err}"),
            Self::Schema(err) => write!(f, "{err}"),
        }
    }
}

struct CallOutcome {
    raw_json: String,
    fields: Vec<(String, DynValue)>,
}

/// Runs the full per-row pipeline for one `(row, model)` pair.
pub(super) async fn process_row(ctx: &RowContext, row: &SourceRow, qualified: &BTreeMap<(String, String), BTreeMap<String, String>>) -> RowOutcome {
    if ctx.cancel.is_cancelled() {
        return RowOutcome::Skipped(SkipReason::Cancelled);
    }

    if !ctx.overwrite {
        match ctx.store.has_response(&row.sha1, &ctx.enrichment_name, &ctx.model).await {
            Ok(true) => return RowOutcome::Skipped(SkipReason::AlreadyDone),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(sha1 = %row.sha1, error = %err, "skip check failed, processing row anyway");
            }
        }
    }

    let values = column_values(&row.columns, qualified, &row.sha1, &ctx.strategy.input_columns);
    let substituted = substitute(&ctx.prompt_template, &values);
    let mut rendered = append_literal(&substituted, ctx.append.as_deref());

    if let Some(context_limit) = ctx.provider.max_context_tokens(&ctx.model) {
        let budget = context_limit.saturating_sub(SAFETY_MARGIN_TOKENS);
        let system_tokens = ctx.system_prompt.as_deref().map_or(0, |s| ctx.provider.count_tokens(s));
        let estimated = ctx.provider.count_tokens(&rendered) + system_tokens;

        if ctx.truncate {
            rendered = crate::provider::truncate_to_fit(&rendered, budget.saturating_sub(system_tokens));
        } else if estimated > budget {
            let err = CallError::Provider(ProviderError::ContextExceeded {
                tokens: estimated as usize,
                limit: budget as usize,
            });
            if let Err(write_err) = write_failure(ctx, row, &Uuid::new_v4().to_string(), &rendered, &err).await {
                tracing::warn!(sha1 = %row.sha1, error = %write_err, "audit write for context-exceeded row failed");
            }
            return RowOutcome::Failed;
        }
    }

    let mut messages = Vec::with_capacity(2);
    if let Some(system_prompt) = &ctx.system_prompt {
        messages.push(Message::system(system_prompt.clone()));
    }
    messages.push(Message::user(rendered.clone()));

    if ctx.cancel.is_cancelled() {
        return RowOutcome::Skipped(SkipReason::Cancelled);
    }

    let attempt_result = attempt_call(ctx, &messages, &row.sha1).await;

    let enrichment_id = Uuid::new_v4().to_string();
    match attempt_result {
        Ok(outcome) => match write_success(ctx, row, &enrichment_id, &rendered, outcome).await {
            Ok(()) => RowOutcome::Processed,
            Err(err) => {
                tracing::warn!(sha1 = %row.sha1, error = %err, "durable write failed");
                RowOutcome::Failed
            }
        },
        Err(err) => {
            if let Err(write_err) = write_failure(ctx, row, &enrichment_id, &rendered, &err).await {
                tracing::warn!(sha1 = %row.sha1, error = %write_err, "audit write for failed row failed");
            }
            RowOutcome::Failed
        }
    }
}

async fn attempt_call(ctx: &RowContext, messages: &[Message], sha1: &str) -> Result<CallOutcome, CallError> {
    let mut last_err = None;
    for attempt in 1..=MAX_ATTEMPTS {
        let permit = match ctx.api_semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return Err(last_err.unwrap_or(CallError::Provider(ProviderError::Transport("API semaphore closed".to_string())))),
        };
        let result = call_provider(ctx, messages).await;
        drop(permit);

        match result {
            Ok(outcome) => return Ok(outcome),
            Err(err) if attempt < MAX_ATTEMPTS && err.is_recoverable() => {
                tracing::debug!(sha1, attempt, "retrying after recoverable language-validation failure");
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.unwrap_or(CallError::Provider(ProviderError::Transport("no attempts made".to_string()))))
}

async fn call_provider(ctx: &RowContext, messages: &[Message]) -> Result<CallOutcome, CallError> {
    let raw = ctx
        .provider
        .generate_structured(&ctx.model, messages, &ctx.wire_schema, ctx.generation_params)
        .await
        .map_err(CallError::Provider)?;
    let fields = ctx.validator.validate(&raw).map_err(CallError::Schema)?;
    Ok(CallOutcome {
        raw_json: raw.to_string(),
        fields,
    })
}

async fn write_success(ctx: &RowContext, row: &SourceRow, enrichment_id: &str, full_prompt: &str, outcome: CallOutcome) -> crate::error::Result<()> {
    let audit = AuditEntry {
        enrichment_id: enrichment_id.to_string(),
        sha1: row.sha1.clone(),
        enrichment_name: ctx.enrichment_name.clone(),
        model_used: ctx.model.clone(),
        prompt_id: ctx.prompt_id.clone(),
        full_prompt: Some(full_prompt.to_string()),
        raw_json: outcome.raw_json,
    };

    let _permit = ctx
        .db_semaphore
        .acquire()
        .await
        .map_err(|_| crate::error::Error::InvalidState {
            message: "DB semaphore closed".to_string(),
        })?;
    ctx.store.append_audit(&audit).await?;

    let fields: BTreeMap<String, DynValue> = outcome.fields.into_iter().collect();
    let has_content = fields.values().any(|v| !v.is_empty_result());
    if has_content {
        let result = EnrichmentResult {
            enrichment_id: enrichment_id.to_string(),
            sha1: row.sha1.clone(),
            model_used: ctx.model.clone(),
            fields,
        };
        if ctx.strategy.storage_mode == StorageMode::SeparateTable {
            ctx.store.ensure_output_table(&ctx.strategy).await?;
        }
        ctx.store.write_result(&ctx.strategy, &result).await?;
    }
    Ok(())
}

async fn write_failure(ctx: &RowContext, row: &SourceRow, enrichment_id: &str, full_prompt: &str, err: &CallError) -> crate::error::Result<()> {
    let audit = AuditEntry {
        enrichment_id: enrichment_id.to_string(),
        sha1: row.sha1.clone(),
        enrichment_name: ctx.enrichment_name.clone(),
        model_used: ctx.model.clone(),
        prompt_id: ctx.prompt_id.clone(),
        full_prompt: Some(full_prompt.to_string()),
        raw_json: serde_json::json!({"error": err.to_string()}).to_string(),
    };

    let _permit = ctx
        .db_semaphore
        .acquire()
        .await
        .map_err(|_| crate::error::Error::InvalidState {
            message: "DB semaphore closed".to_string(),
        })?;
    ctx.store.append_audit(&audit).await
}
