//! Backing-store abstraction for the extraction procedure.
//!
//! The [`ExtractionStore`] trait hands out [`StoreConnection`]s; a connection
//! runs the extraction procedure once and returns everything it produced as
//! plain tabular data ([`RawExtraction`]). Interpreting that data is the
//! materializer's job, so backends only move cells around.
//!
//! Connections are owned values. Dropping one releases it, which is what
//! keeps release unconditional when a caller's future is cancelled mid-call;
//! [`StoreConnection::close`] is the graceful path for normal exits.
//!
//! | Backend | Purpose |
//! |---------|---------|
//! | [`mssql::MssqlStore`] | SQL Server over TDS (`tiberius`) |
//! | [`memory::ScriptedStore`] | In-process store with a fixed response, for tests |

pub mod memory;
pub mod mssql;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{EmployeeId, ExtractionRequest};

/// Default name of the extraction stored procedure.
pub const DEFAULT_PROCEDURE: &str = "dbo.sp_Extraccion_Subasta";

/// Input parameter names, in binding order.
pub const INPUT_PARAMS: [&str; 8] = [
    "@FechaDesde",
    "@FechaHasta",
    "@Organismo_ID",
    "@EstBien_ID",
    "@Emp_ID",
    "@PC",
    "@Comision",
    "@Incremento",
];

/// INT OUTPUT parameter carrying the authoritative extracted count.
pub const OUTPUT_PARAM: &str = "@TotalExtraidas";

/// A single cell of a tabular result set.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    DateTime(NaiveDateTime),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Short type label used in materialization errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bit",
            SqlValue::Int(_) => "int",
            SqlValue::Float(_) => "float",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::Text(_) => "text",
            SqlValue::DateTime(_) => "datetime",
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<Decimal> for SqlValue {
    fn from(value: Decimal) -> Self {
        SqlValue::Decimal(value)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(value: NaiveDateTime) -> Self {
        SqlValue::DateTime(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// One result set: column names in store order plus its rows.
///
/// Column names are kept exactly as the store reports them, including
/// spaces and accented characters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
}

impl ResultSet {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<SqlValue>) {
        self.rows.push(row);
    }

    /// Builder form of [`push_row`](Self::push_row).
    pub fn with_row(mut self, row: Vec<SqlValue>) -> Self {
        self.push_row(row);
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<SqlValue>] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Exact (case- and accent-sensitive) column lookup.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Everything one procedure call produced, drained in order.
///
/// `result_sets` holds the procedure's own result sets positionally
/// (validation errors first, extracted items second). `total_extracted` is
/// the OUTPUT parameter, only read once the stream has been fully consumed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawExtraction {
    pub result_sets: Vec<ResultSet>,
    pub total_extracted: Option<i32>,
}

/// Bound values for the nine procedure parameters (the output parameter is
/// implicit).
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionParams {
    pub date_from: Option<NaiveDateTime>,
    pub date_to: Option<NaiveDateTime>,
    pub organization_id: Option<i32>,
    pub item_status_id: Option<i32>,
    pub employee_id: EmployeeId,
    pub pc: Option<Decimal>,
    pub commission: Option<Decimal>,
    pub increment: Option<Decimal>,
}

impl From<&ExtractionRequest> for ExtractionParams {
    fn from(request: &ExtractionRequest) -> Self {
        Self {
            date_from: request.date_from,
            date_to: request.date_to,
            organization_id: request.organization_id,
            item_status_id: request.item_status_id,
            employee_id: request.employee_id.clone(),
            pc: request.pc,
            commission: request.commission,
            increment: request.increment,
        }
    }
}

/// Failures reported by a store backend.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store itself rejected the call with a numeric error code
    /// (business-rule violations raised by the procedure land here).
    #[error("store error {code}: {message}")]
    Database { code: i32, message: String },

    /// The store could not be reached or the transport failed.
    #[error("store connection failed: {0}")]
    Connection(String),

    /// The store answered with something this crate cannot interpret.
    #[error("store protocol error: {0}")]
    Protocol(String),
}

/// Source of scoped store connections.
#[async_trait]
pub trait ExtractionStore: Send + Sync {
    /// Open a connection dedicated to a single extraction call.
    async fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError>;
}

/// A connection owned by exactly one extraction call.
#[async_trait]
pub trait StoreConnection: Send {
    /// Run the extraction procedure once and drain all of its output.
    async fn execute_extraction(
        &mut self,
        params: &ExtractionParams,
    ) -> Result<RawExtraction, StoreError>;

    /// Release the connection gracefully.
    async fn close(self: Box<Self>) -> Result<(), StoreError>;
}
