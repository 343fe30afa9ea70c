//! Webhook handlers for the render provider and Stripe.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use clipforge_core::{Plan, RenderError, UserId};

use crate::crypto::{verify_provider_signature, verify_stripe_signature};
use crate::error::ApiError;
use crate::provider::RawJobResponse;
use crate::state::AppState;

/// Headers the provider may carry its body signature in.
const PROVIDER_SIGNATURE_HEADERS: [&str; 2] = ["x-webhook-signature", "x-signature"];

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was processed.
    pub received: bool,
}

/// Handle render provider job callbacks.
///
/// Unknown jobs and payloads without a job ID are logged and acknowledged so
/// the provider does not keep retrying them.
pub async fn render_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    if let Some(secret) = &state.config.provider_webhook_secret {
        let signature = PROVIDER_SIGNATURE_HEADERS
            .iter()
            .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
            .ok_or_else(|| ApiError::BadRequest("Missing webhook signature".into()))?;

        if !verify_provider_signature(&body, signature, secret) {
            tracing::warn!("Invalid render webhook signature");
            return Err(ApiError::Unauthorized);
        }
    }

    let raw: RawJobResponse = match serde_json::from_str(&body) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable render webhook payload");
            return Ok(Json(WebhookResponse { received: true }));
        }
    };

    let Some(renders) = &state.renders else {
        tracing::warn!("Render webhook received but rendering is not configured");
        return Ok(Json(WebhookResponse { received: true }));
    };

    match renders.handle_webhook(raw).await {
        Ok(Some(job)) => {
            tracing::info!(job_id = %job.id, status = ?job.status, "Render webhook applied");
        }
        Ok(None) => {}
        Err(RenderError::Validation(msg)) => {
            tracing::warn!(error = %msg, "Render webhook without job ID");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(Json(WebhookResponse { received: true }))
}

/// Stripe webhook payload (simplified).
#[derive(Debug, Deserialize)]
pub struct StripeWebhook {
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event ID.
    pub id: String,
    /// Event data.
    pub data: StripeEventData,
}

/// Stripe event data container.
#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    /// Event object.
    pub object: serde_json::Value,
}

/// Handle Stripe webhooks.
///
/// Subscription events move the account between plans; the plan change
/// resets the credit balance through the ledger.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    // Verify signature if webhook_secret is configured
    if let Some(webhook_secret) = &state.config.stripe_webhook_secret {
        let signature = headers
            .get("stripe-signature")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::BadRequest("Missing Stripe signature".into()))?;

        if !verify_stripe_signature(&body, signature, webhook_secret) {
            tracing::warn!("Invalid Stripe webhook signature");
            return Err(ApiError::BadRequest("Invalid webhook signature".into()));
        }
    } else {
        // No webhook_secret configured - skip verification (development mode)
        tracing::warn!("Stripe webhook_secret not configured - skipping signature verification");
    }

    let webhook: StripeWebhook =
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(
        event_type = %webhook.event_type,
        event_id = %webhook.id,
        "Received Stripe webhook"
    );

    match webhook.event_type.as_str() {
        "customer.subscription.created" | "customer.subscription.updated" => {
            handle_subscription_update(&state, &webhook.data.object)?;
        }
        "customer.subscription.deleted" => {
            handle_subscription_deleted(&state, &webhook.data.object)?;
        }
        _ => {
            tracing::debug!(event_type = %webhook.event_type, "Unhandled Stripe event");
        }
    }

    Ok(Json(WebhookResponse { received: true }))
}

fn subscription_user(data: &serde_json::Value) -> Result<UserId, ApiError> {
    data.pointer("/metadata/user_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ApiError::BadRequest("Missing metadata.user_id".into()))?
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid metadata.user_id".into()))
}

/// Plan code from the subscription metadata or its first price.
fn subscription_plan_code(data: &serde_json::Value) -> Option<&str> {
    data.pointer("/metadata/plan")
        .or_else(|| data.pointer("/items/data/0/price/lookup_key"))
        .and_then(|v| v.as_str())
}

fn handle_subscription_update(state: &AppState, data: &serde_json::Value) -> Result<(), ApiError> {
    let subscription_id = data.get("id").and_then(|v| v.as_str()).unwrap_or("unknown");
    let status = data
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");

    if !matches!(status, "active" | "trialing") {
        tracing::info!(
            subscription_id = %subscription_id,
            status = %status,
            "Subscription not active, plan unchanged"
        );
        return Ok(());
    }

    let user_id = subscription_user(data)?;
    let Some(plan) = subscription_plan_code(data).and_then(Plan::from_code) else {
        tracing::warn!(
            subscription_id = %subscription_id,
            user_id = %user_id,
            "Subscription carries no known plan"
        );
        return Ok(());
    };

    state.ledger.upgrade_subscription(user_id, plan)?;

    tracing::info!(
        subscription_id = %subscription_id,
        user_id = %user_id,
        plan = plan.as_str(),
        "Subscription plan applied"
    );

    Ok(())
}

fn handle_subscription_deleted(state: &AppState, data: &serde_json::Value) -> Result<(), ApiError> {
    let subscription_id = data.get("id").and_then(|v| v.as_str()).unwrap_or("unknown");
    let user_id = subscription_user(data)?;

    state.ledger.upgrade_subscription(user_id, Plan::Free)?;

    tracing::info!(
        subscription_id = %subscription_id,
        user_id = %user_id,
        "Subscription cancelled, back on the free plan"
    );

    Ok(())
}
