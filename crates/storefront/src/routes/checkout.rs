//! Checkout route handlers.
//!
//! The handler owns the visitor's [`CheckoutPhase`]: it is written through
//! to the session store before the order is attempted and updated with the
//! outcome, so a second tab opening checkout mid-submission is not bounced
//! home and is handed the in-flight submission id.

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use muscle_shop_core::{OrderNumber, PaymentMethod, SubmissionId, Totals};
use serde::Serialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, add_breadcrumb};
use crate::models::CheckoutPhase;
use crate::models::session::keys;
use crate::routes::cart::{CartLineView, line_views};
use crate::services::cart::{CartStore, SessionCartStorage};
use crate::services::checkout::{
    CHECKOUT_PAYMENT_METHODS, CheckoutEntry, CheckoutForm, PREFECTURES, checkout_entry,
};
use crate::state::AppState;

/// A payment method choice on the form.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentOption {
    pub value: PaymentMethod,
    pub label: &'static str,
}

/// Data for rendering the checkout form.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutView {
    pub lines: Vec<CartLineView>,
    pub totals: Totals,
    /// Echo this back with the form so a resubmission is recognised.
    pub submission_id: SubmissionId,
    pub payment_methods: Vec<PaymentOption>,
    pub prefectures: &'static [&'static str],
}

/// Result of a successful submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub order_number: OrderNumber,
    pub payment_method: PaymentMethod,
    /// Confirmation page to navigate to.
    pub redirect: String,
}

async fn load_phase(session: &Session) -> CheckoutPhase {
    match session.get::<CheckoutPhase>(keys::CHECKOUT).await {
        Ok(phase) => phase.unwrap_or_default(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read checkout phase");
            CheckoutPhase::Idle
        }
    }
}

async fn save_phase(session: &Session, phase: &CheckoutPhase) {
    if let Err(e) = session.insert(keys::CHECKOUT, phase).await {
        tracing::warn!(error = %e, "Failed to store checkout phase");
    }
}

/// Store `phase` and write the session through to the store now, so
/// concurrent requests see it before this one finishes.
async fn publish_phase(session: &Session, phase: &CheckoutPhase) {
    save_phase(session, phase).await;
    if let Err(e) = session.save().await {
        tracing::warn!(error = %e, "Failed to persist checkout phase");
    }
}

/// `GET /api/checkout`
///
/// Redirects home when there is nothing to check out, or to the
/// confirmation page when the visitor's order has just been placed.
pub async fn show(session: Session) -> Response {
    let phase = load_phase(&session).await;
    let cart = CartStore::load(SessionCartStorage::new(session)).await;

    match checkout_entry(cart.cart(), &phase, Utc::now()) {
        CheckoutEntry::RedirectHome => Redirect::to("/").into_response(),
        CheckoutEntry::RedirectConfirmation(path) => Redirect::to(&path).into_response(),
        CheckoutEntry::Proceed => {
            let submission_id = match phase {
                CheckoutPhase::Submitting { submission_id, .. } => submission_id,
                _ => SubmissionId::random(),
            };
            Json(CheckoutView {
                lines: line_views(cart.cart().lines()),
                totals: cart.totals(),
                submission_id,
                payment_methods: CHECKOUT_PAYMENT_METHODS
                    .iter()
                    .map(|&method| PaymentOption {
                        value: method,
                        label: method.label(),
                    })
                    .collect(),
                prefectures: &PREFECTURES,
            })
            .into_response()
        }
    }
}

/// `POST /api/checkout`
///
/// Places the order. The confirmation email is sent in the background and
/// never delays or fails the response.
#[instrument(skip_all, fields(submission_id = tracing::field::Empty))]
pub async fn submit(
    State(state): State<AppState>,
    session: Session,
    Json(mut form): Json<CheckoutForm>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let submission_id = form.submission_id.unwrap_or_else(SubmissionId::random);
    form.submission_id = Some(submission_id);
    tracing::Span::current().record("submission_id", tracing::field::display(submission_id));

    publish_phase(
        &session,
        &CheckoutPhase::Submitting {
            submission_id,
            started_at: Utc::now(),
        },
    )
    .await;
    add_breadcrumb("checkout", "Order submitted", None);

    let mut cart = CartStore::load(SessionCartStorage::new(session.clone())).await;
    match state.checkout().submit(&mut cart, &form).await {
        Ok(success) => {
            save_phase(
                &session,
                &CheckoutPhase::Succeeded {
                    order_number: success.order_number().clone(),
                    payment_method: success.payment_method(),
                },
            )
            .await;
            Ok(Json(CheckoutResponse {
                redirect: success.confirmation_path(),
                order_number: success.order_number().clone(),
                payment_method: success.payment_method(),
            }))
        }
        Err(e) => {
            save_phase(
                &session,
                &CheckoutPhase::Failed {
                    message: e.user_message().to_owned(),
                },
            )
            .await;
            Err(e.into())
        }
    }
}
