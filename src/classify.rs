//! Maps store error codes onto the application's error taxonomy.
//!
//! The table is fixed and total: every code produces a classification, and
//! unknown codes fall through to a pass-through entry carrying the store's
//! own code and message.

use crate::models::ErrorResponse;

/// The procedure was called without an employee id for the audit trail.
pub const EMPLOYEE_REQUIRED: i32 = 53003;
/// `@FechaDesde` is later than `@FechaHasta`.
pub const INVALID_DATE_RANGE: i32 = 53006;
/// One or more items have invalid fields; the store lists them row by row.
pub const INVALID_ITEM_FIELDS: i32 = 53011;

/// User-facing translation of a store error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub message: String,
    pub http_status: u16,
    pub business_code: i32,
}

impl Classification {
    pub fn into_error_response(self) -> ErrorResponse {
        ErrorResponse {
            error_code: self.business_code,
            message: self.message,
            http_status_code: self.http_status,
        }
    }
}

/// Classify a store error by its numeric code.
pub fn classify(code: i32, message: &str) -> Classification {
    let (message, business_code) = match code {
        EMPLOYEE_REQUIRED => ("employee id required for audit".to_string(), EMPLOYEE_REQUIRED),
        INVALID_DATE_RANGE => ("invalid date range: from > to".to_string(), INVALID_DATE_RANGE),
        INVALID_ITEM_FIELDS => (message.to_string(), INVALID_ITEM_FIELDS),
        other => (message.to_string(), other),
    };

    Classification {
        message,
        http_status: 400,
        business_code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_employee() {
        let c = classify(53003, "Emp_ID es requerido");
        assert_eq!(c.message, "employee id required for audit");
        assert_eq!(c.http_status, 400);
        assert_eq!(c.business_code, 53003);
    }

    #[test]
    fn test_date_range_ignores_store_text() {
        for text in ["FechaDesde > FechaHasta", "", "anything at all"] {
            let c = classify(53006, text);
            assert_eq!(c.message, "invalid date range: from > to");
            assert_eq!(c.http_status, 400);
            assert_eq!(c.business_code, 53006);
        }
    }

    #[test]
    fn test_invalid_items_pass_message_through() {
        let text = "Prendas con campos inválidos: P-001, P-002";
        let c = classify(53011, text);
        assert_eq!(c.message, text);
        assert_eq!(c.http_status, 400);
        assert_eq!(c.business_code, 53011);
    }

    #[test]
    fn test_unknown_codes_keep_their_code() {
        for code in [0, 1, 547, 2627, 50000, 53012, -1, i32::MIN, i32::MAX] {
            let c = classify(code, "original");
            assert_eq!(c.business_code, code);
            assert_eq!(c.http_status, 400);
            assert_eq!(c.message, "original");
        }
    }

    #[test]
    fn test_into_error_response() {
        let err = classify(53006, "x").into_error_response();
        assert_eq!(err.error_code, 53006);
        assert_eq!(err.http_status_code, 400);
        assert_eq!(err.message, "invalid date range: from > to");
    }
}
