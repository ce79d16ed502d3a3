//! Request and response shapes exchanged with extraction callers.
//!
//! Everything here is request-scoped: built when a call arrives, serialized
//! into the HTTP response (or printed by the CLI), then dropped. Wire names
//! are camelCase; the Spanish names used by the legacy API host, and the
//! PascalCase spelling of every field, are accepted as aliases on the
//! request side. Decimal amounts are written as JSON numbers.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

/// Returned when an employee id is missing or blank.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("employee id must not be empty")]
pub struct MissingEmployeeId;

/// Employee recorded as the audit actor of an extraction.
///
/// Always non-blank: a request without a usable employee id cannot be
/// constructed, so the orchestrator never sees one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EmployeeId(String);

impl EmployeeId {
    pub fn new(value: impl Into<String>) -> Result<Self, MissingEmployeeId> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(MissingEmployeeId);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EmployeeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i64),
        }

        let raw = match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s,
            Raw::Number(n) => n.to_string(),
        };
        EmployeeId::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Filters for one extraction run.
///
/// `date_from <= date_to` is checked by the store (error 53006), not here.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRequest {
    #[serde(
        default,
        alias = "fechaDesde",
        alias = "FechaDesde",
        alias = "DateFrom",
        deserialize_with = "datetime::deserialize_option"
    )]
    pub date_from: Option<NaiveDateTime>,
    #[serde(
        default,
        alias = "fechaHasta",
        alias = "FechaHasta",
        alias = "DateTo",
        deserialize_with = "datetime::deserialize_option"
    )]
    pub date_to: Option<NaiveDateTime>,
    #[serde(default, alias = "organismoId", alias = "OrganismoId", alias = "OrganizationId")]
    pub organization_id: Option<i32>,
    #[serde(default, alias = "estBienId", alias = "EstBienId", alias = "ItemStatusId")]
    pub item_status_id: Option<i32>,
    #[serde(alias = "empId", alias = "EmpId", alias = "EmployeeId")]
    pub employee_id: EmployeeId,
    #[serde(default, alias = "PC", alias = "Pc")]
    pub pc: Option<Decimal>,
    #[serde(default, alias = "comision", alias = "Comision", alias = "Commission")]
    pub commission: Option<Decimal>,
    #[serde(default, alias = "incremento", alias = "Incremento", alias = "Increment")]
    pub increment: Option<Decimal>,
}

impl ExtractionRequest {
    /// A request with no filters, extracting on behalf of `employee_id`.
    pub fn new(employee_id: EmployeeId) -> Self {
        Self {
            date_from: None,
            date_to: None,
            organization_id: None,
            item_status_id: None,
            employee_id,
            pc: None,
            commission: None,
            increment: None,
        }
    }
}

/// An item the store refused to extract, with the business rule it failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationErrorRow {
    pub item_id: i64,
    pub item_code: String,
    pub reason: String,
}

/// One extracted item.
///
/// Every field is independently optional: `None` means the store did not
/// record a value and is serialized as `null`, never as `""` or `0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedItemRow {
    pub item_code: Option<String>,
    pub phase_two_entry_date: Option<NaiveDateTime>,
    pub phase_two_end_date: Option<NaiveDateTime>,
    pub category: Option<String>,
    pub product_name: Option<String>,
    pub description: Option<String>,
    pub condition: Option<String>,
    pub quantity: Option<i32>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub total_price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub commission: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub increment: Option<Decimal>,

    // Owning organization, denormalized.
    pub organization_name: Option<String>,
    pub organization_tax_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub comuna: Option<String>,
    pub contact_address: Option<String>,
    pub region: Option<String>,

    pub photo1: Option<String>,
    pub photo2: Option<String>,
    pub photo3: Option<String>,
    pub photo4: Option<String>,
    pub photo5: Option<String>,
    pub photo6: Option<String>,

    pub report1: Option<String>,
    pub report2: Option<String>,
    pub report3: Option<String>,
    pub report4: Option<String>,
    pub report5: Option<String>,
    pub report6: Option<String>,
}

/// Outcome of a successful extraction call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub validation_errors: Vec<ValidationErrorRow>,
    pub extracted_items: Vec<ExtractedItemRow>,
    /// Taken from the procedure's output parameter, not from counting rows.
    pub total_extracted: i32,
    pub message: String,
}

/// Error detail carried by a failed [`ResponseEnvelope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error_code: i32,
    pub message: String,
    pub http_status_code: u16,
}

/// Uniform response wrapper returned by every extraction call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

impl<T> ResponseEnvelope<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: message.into(),
            error: None,
        }
    }

    pub fn failure(error: ErrorResponse, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: message.into(),
            error: Some(error),
        }
    }

    /// HTTP status the envelope should be sent with: the embedded status on
    /// failure, 200 otherwise.
    pub fn http_status(&self) -> u16 {
        self.error
            .as_ref()
            .map(|e| e.http_status_code)
            .unwrap_or(200)
    }
}

/// Lenient date-time parsing for request filters.
///
/// Accepts a bare date (`2024-03-01`, midnight), a local date-time with or
/// without fractional seconds, or an RFC 3339 timestamp (offset dropped).
pub mod datetime {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
    use serde::{Deserialize, Deserializer};

    pub fn parse(value: &str) -> Result<NaiveDateTime, String> {
        let value = value.trim();
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
            return Ok(dt);
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f") {
            return Ok(dt);
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Ok(dt.naive_local());
        }
        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            return Ok(date.and_time(NaiveTime::MIN));
        }
        Err(format!("invalid date '{}': expected YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS", value))
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => parse(&s).map(Some).map_err(serde::de::Error::custom),
        }
    }
}
