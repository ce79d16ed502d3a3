//! Extraction orchestrator.
//!
//! [`Extractor::extract`] runs one extraction end to end:
//!
//! ```text
//! connecting ──▶ invoking ──▶ materializing ──▶ responding
//!     │              │              │
//!     └──────────────┴──────────────┴──▶ responding-with-error
//! ```
//!
//! It never returns an error. Store rejections are classified (HTTP 400 with
//! the store's business code); anything else becomes an opaque HTTP 500
//! whose detail only reaches the logs. The connection is owned by the call:
//! it is closed on every normal exit and dropped (released) if the caller's
//! future is cancelled. There are no retries, since the procedure changes
//! item status.
//!
//! Each call runs inside its own `extraction` tracing span carrying a
//! request id and the employee id.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::classify::classify;
use crate::materialize::{materialize, MaterializeError};
use crate::models::{ErrorResponse, ExtractionRequest, ExtractionResult, ResponseEnvelope};
use crate::store::{ExtractionParams, ExtractionStore, StoreError};

/// Envelope message for a completed extraction.
pub const SUCCESS_MESSAGE: &str = "extraction completed successfully";
/// Envelope message when the store rejected the extraction.
pub const REJECTED_MESSAGE: &str = "auction extraction failed";
/// Envelope and error message for every unclassified failure.
pub const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

/// Why an extraction did not produce a result.
#[derive(Debug, Error)]
enum ExtractionFailure {
    #[error("store rejected the extraction with code {code}: {message}")]
    Rejected { code: i32, message: String },

    #[error(transparent)]
    Store(StoreError),

    #[error("unreadable procedure output: {0}")]
    Materialize(#[from] MaterializeError),
}

impl From<StoreError> for ExtractionFailure {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database { code, message } => ExtractionFailure::Rejected { code, message },
            other => ExtractionFailure::Store(other),
        }
    }
}

/// Runs extractions against a store. Cheap to share behind an `Arc`.
pub struct Extractor {
    store: Arc<dyn ExtractionStore>,
}

impl Extractor {
    pub fn new(store: Arc<dyn ExtractionStore>) -> Self {
        Self { store }
    }

    /// Extract auction items for `request`, translating every failure into
    /// the returned envelope.
    pub async fn extract(&self, request: &ExtractionRequest) -> ResponseEnvelope<ExtractionResult> {
        let span = info_span!(
            "extraction",
            request_id = %Uuid::new_v4(),
            employee_id = %request.employee_id,
        );
        self.respond(request).instrument(span).await
    }

    async fn respond(&self, request: &ExtractionRequest) -> ResponseEnvelope<ExtractionResult> {
        info!(
            date_from = ?request.date_from,
            date_to = ?request.date_to,
            organization_id = ?request.organization_id,
            item_status_id = ?request.item_status_id,
            "starting auction extraction"
        );

        match self.run(request).await {
            Ok(result) => {
                if !result.validation_errors.is_empty() {
                    warn!(
                        validation_errors = result.validation_errors.len(),
                        "store reported validation errors without rejecting the call"
                    );
                }
                info!(
                    total_extracted = result.total_extracted,
                    rows = result.extracted_items.len(),
                    "auction extraction completed"
                );
                ResponseEnvelope::ok(result, SUCCESS_MESSAGE)
            }
            Err(ExtractionFailure::Rejected { code, message }) => {
                warn!(code, %message, "store rejected auction extraction");
                ResponseEnvelope::failure(
                    classify(code, &message).into_error_response(),
                    REJECTED_MESSAGE,
                )
            }
            Err(err) => {
                error!(error = %err, "auction extraction failed unexpectedly");
                ResponseEnvelope::failure(
                    ErrorResponse {
                        error_code: 500,
                        message: INTERNAL_ERROR_MESSAGE.to_string(),
                        http_status_code: 500,
                    },
                    INTERNAL_ERROR_MESSAGE,
                )
            }
        }
    }

    async fn run(&self, request: &ExtractionRequest) -> Result<ExtractionResult, ExtractionFailure> {
        let params = ExtractionParams::from(request);

        let mut conn = self.store.connect().await?;
        let outcome = conn.execute_extraction(&params).await;
        if let Err(err) = conn.close().await {
            warn!(error = %err, "store connection did not close cleanly");
        }

        let raw = outcome?;
        Ok(materialize(&raw.result_sets, raw.total_extracted)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materialize::columns;
    use crate::models::EmployeeId;
    use crate::store::memory::ScriptedStore;
    use crate::store::{RawExtraction, ResultSet, SqlValue};
    use std::time::Duration;

    fn request() -> ExtractionRequest {
        ExtractionRequest::new(EmployeeId::new("E-100").unwrap())
    }

    fn extractor(store: &Arc<ScriptedStore>) -> Extractor {
        Extractor::new(store.clone())
    }

    fn item_set(codes: &[&str]) -> ResultSet {
        let mut names = vec![
            columns::ITEM_CODE,
            columns::PHASE_TWO_ENTRY,
            columns::PHASE_TWO_END,
            columns::CATEGORY,
            columns::PRODUCT_NAME,
            columns::DESCRIPTION,
            columns::CONDITION,
            columns::QUANTITY,
            columns::TOTAL_PRICE,
            columns::COMMISSION,
            columns::INCREMENT,
            columns::ORGANIZATION_NAME,
            columns::ORGANIZATION_TAX_ID,
            columns::EMAIL,
            columns::PHONE,
            columns::COMUNA,
            columns::CONTACT_ADDRESS,
            columns::REGION,
        ];
        names.extend(columns::PHOTOS);
        names.extend(columns::REPORTS);

        let width = names.len();
        let mut set = ResultSet::new(names);
        for code in codes {
            let mut row = vec![SqlValue::Null; width];
            row[0] = (*code).into();
            set.push_row(row);
        }
        set
    }

    fn error_response(envelope: &ResponseEnvelope<ExtractionResult>) -> &ErrorResponse {
        envelope.error.as_ref().expect("envelope should carry an error")
    }

    #[tokio::test]
    async fn test_success_releases_connection_once() {
        let store = Arc::new(ScriptedStore::responding(RawExtraction {
            result_sets: vec![ResultSet::default(), item_set(&["P-1", "P-2"])],
            total_extracted: Some(2),
        }));

        let envelope = extractor(&store).extract(&request()).await;

        assert!(envelope.success);
        assert_eq!(envelope.message, SUCCESS_MESSAGE);
        assert_eq!(envelope.http_status(), 200);
        let data = envelope.data.unwrap();
        assert_eq!(data.total_extracted, 2);
        assert_eq!(data.extracted_items.len(), 2);
        assert_eq!(data.message, "2 items extracted successfully");
        assert_eq!(store.connects(), 1);
        assert_eq!(store.executions(), 1);
        assert_eq!(store.releases(), 1);
    }

    #[tokio::test]
    async fn test_nothing_to_extract() {
        let store = Arc::new(ScriptedStore::responding(RawExtraction {
            result_sets: vec![],
            total_extracted: Some(0),
        }));

        let envelope = extractor(&store).extract(&request()).await;

        let data = envelope.data.unwrap();
        assert_eq!(data.message, "no items matched the extraction criteria");
        assert!(data.extracted_items.is_empty());
        assert_eq!(data.total_extracted, 0);
    }

    #[tokio::test]
    async fn test_total_comes_from_counter() {
        let store = Arc::new(ScriptedStore::responding(RawExtraction {
            result_sets: vec![ResultSet::default(), item_set(&["P-1", "P-2"])],
            total_extracted: Some(3),
        }));

        let data = extractor(&store).extract(&request()).await.data.unwrap();
        assert_eq!(data.extracted_items.len(), 2);
        assert_eq!(data.total_extracted, 3);
    }

    #[tokio::test]
    async fn test_parameters_are_bound_from_request() {
        let store = Arc::new(ScriptedStore::responding(RawExtraction {
            result_sets: vec![],
            total_extracted: Some(0),
        }));
        let mut req = request();
        req.organization_id = Some(11);
        req.item_status_id = Some(4);

        extractor(&store).extract(&req).await;

        let params = store.last_params().unwrap();
        assert_eq!(params.employee_id.as_str(), "E-100");
        assert_eq!(params.organization_id, Some(11));
        assert_eq!(params.item_status_id, Some(4));
        assert_eq!(params.date_from, None);
    }

    #[tokio::test]
    async fn test_date_range_rejection_is_classified() {
        let store = Arc::new(ScriptedStore::raising(
            53006,
            "Rango de fechas inválido: FechaDesde > FechaHasta",
        ));

        let envelope = extractor(&store).extract(&request()).await;

        assert!(!envelope.success);
        assert!(envelope.data.is_none());
        assert_eq!(envelope.message, REJECTED_MESSAGE);
        let err = error_response(&envelope);
        assert_eq!(err.error_code, 53006);
        assert_eq!(err.http_status_code, 400);
        assert_eq!(err.message, "invalid date range: from > to");
        assert_eq!(store.releases(), 1);
    }

    #[tokio::test]
    async fn test_invalid_items_message_passes_through() {
        let text = "Existen 2 prendas con campos inválidos";
        let store = Arc::new(ScriptedStore::raising(53011, text));

        let envelope = extractor(&store).extract(&request()).await;

        let err = error_response(&envelope);
        assert_eq!(err.error_code, 53011);
        assert_eq!(err.http_status_code, 400);
        assert_eq!(err.message, text);
    }

    #[tokio::test]
    async fn test_unknown_store_code_is_kept() {
        let store = Arc::new(ScriptedStore::raising(547, "FK constraint"));

        let envelope = extractor(&store).extract(&request()).await;

        let err = error_response(&envelope);
        assert_eq!(err.error_code, 547);
        assert_eq!(err.http_status_code, 400);
        assert_eq!(err.message, "FK constraint");
        assert_eq!(store.releases(), 1);
    }

    #[tokio::test]
    async fn test_protocol_failure_is_opaque() {
        let store = Arc::new(ScriptedStore::garbling("token stream corrupted at 0x3f"));

        let envelope = extractor(&store).extract(&request()).await;

        assert_eq!(envelope.http_status(), 500);
        assert_eq!(envelope.message, INTERNAL_ERROR_MESSAGE);
        let err = error_response(&envelope);
        assert_eq!(err.error_code, 500);
        assert_eq!(err.message, INTERNAL_ERROR_MESSAGE);
        let body = serde_json::to_string(&envelope).unwrap();
        assert!(!body.contains("corrupted"));
        assert_eq!(store.releases(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_opaque() {
        let store = Arc::new(ScriptedStore::unreachable("connection refused by 10.0.0.5"));

        let envelope = extractor(&store).extract(&request()).await;

        assert_eq!(envelope.http_status(), 500);
        assert!(!serde_json::to_string(&envelope).unwrap().contains("10.0.0.5"));
        assert_eq!(store.connects(), 0);
        assert_eq!(store.releases(), 0);
    }

    #[tokio::test]
    async fn test_refused_session_is_classified() {
        let store = Arc::new(ScriptedStore::refusing(18456, "Login failed for user 'sa'."));

        let envelope = extractor(&store).extract(&request()).await;

        assert_eq!(envelope.http_status(), 400);
        assert_eq!(envelope.message, REJECTED_MESSAGE);
        let err = error_response(&envelope);
        assert_eq!(err.error_code, 18456);
        assert_eq!(err.http_status_code, 400);
        assert_eq!(err.message, "Login failed for user 'sa'.");
        assert_eq!(store.connects(), 0);
        assert_eq!(store.executions(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_output_is_opaque() {
        let store = Arc::new(ScriptedStore::responding(RawExtraction {
            result_sets: vec![ResultSet::default(), item_set(&["P-1"])],
            total_extracted: None,
        }));

        let envelope = extractor(&store).extract(&request()).await;

        assert_eq!(envelope.http_status(), 500);
        assert_eq!(store.releases(), 1);
    }

    #[tokio::test]
    async fn test_validation_rows_without_rejection_are_reported() {
        let errors = ResultSet::new([
            columns::ERROR_ITEM_ID,
            columns::ERROR_ITEM_CODE,
            columns::ERROR_REASON,
        ])
        .with_row(vec![SqlValue::Int(9), "P-9".into(), "Sin precio".into()]);
        let store = Arc::new(ScriptedStore::responding(RawExtraction {
            result_sets: vec![errors],
            total_extracted: Some(0),
        }));

        let envelope = extractor(&store).extract(&request()).await;

        assert!(envelope.success);
        let data = envelope.data.unwrap();
        assert_eq!(data.validation_errors.len(), 1);
        assert_eq!(data.validation_errors[0].item_code, "P-9");
    }

    #[tokio::test]
    async fn test_cancelled_call_releases_connection() {
        let store = Arc::new(ScriptedStore::hanging());
        let extractor = extractor(&store);
        let req = request();

        let outcome =
            tokio::time::timeout(Duration::from_millis(50), extractor.extract(&req)).await;

        assert!(outcome.is_err(), "hanging store should not complete");
        assert_eq!(store.connects(), 1);
        assert_eq!(store.releases(), 1);
    }
}
