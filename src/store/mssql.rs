//! SQL Server backend built on `tiberius`.
//!
//! The procedure is executed inside a small T-SQL batch that declares the
//! OUTPUT variable, binds the eight inputs by name and selects the output
//! variable last. The counter therefore arrives as a trailing result set and
//! can only be read after every procedure result set has been drained.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use tiberius::numeric::Numeric;
use tiberius::{Client, ColumnData, FromSql, Query, QueryItem};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use super::{
    ExtractionParams, ExtractionStore, RawExtraction, ResultSet, SqlValue, StoreConnection,
    StoreError, INPUT_PARAMS, OUTPUT_PARAM,
};
use crate::config::DbConfig;

/// Store that opens a fresh TDS session per extraction call.
pub struct MssqlStore {
    config: tiberius::Config,
    procedure: String,
}

impl MssqlStore {
    /// Build a store from an ADO.NET-style connection string.
    pub fn from_ado_string(
        connection_string: &str,
        procedure: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let config = tiberius::Config::from_ado_string(connection_string)
            .map_err(|e| StoreError::Connection(format!("invalid connection string: {}", e)))?;
        Ok(Self {
            config,
            procedure: procedure.into(),
        })
    }

    pub fn from_config(db: &DbConfig) -> Result<Self, StoreError> {
        Self::from_ado_string(&db.connection_string, db.procedure.clone())
    }
}

#[async_trait]
impl ExtractionStore for MssqlStore {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
        let addr = self.config.get_addr();
        debug!(%addr, "opening store connection");

        let tcp = TcpStream::connect(&addr)
            .await
            .map_err(|e| StoreError::Connection(format!("{}: {}", addr, e)))?;
        tcp.set_nodelay(true)
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        // A login rejected by the server carries its error number and is
        // classified like any other store error.
        let client = Client::connect(self.config.clone(), tcp.compat_write())
            .await
            .map_err(map_error)?;

        Ok(Box::new(MssqlConnection {
            client,
            procedure: self.procedure.clone(),
        }))
    }
}

struct MssqlConnection {
    client: Client<Compat<TcpStream>>,
    procedure: String,
}

#[async_trait]
impl StoreConnection for MssqlConnection {
    async fn execute_extraction(
        &mut self,
        params: &ExtractionParams,
    ) -> Result<RawExtraction, StoreError> {
        let mut query = Query::new(extraction_batch(&self.procedure));
        query.bind(params.date_from);
        query.bind(params.date_to);
        query.bind(params.organization_id);
        query.bind(params.item_status_id);
        query.bind(params.employee_id.as_str());
        query.bind(params.pc.map(|d| Numeric::new_with_scale(d.mantissa(), d.scale() as u8)));
        query.bind(params.commission.map(|d| Numeric::new_with_scale(d.mantissa(), d.scale() as u8)));
        query.bind(params.increment.map(|d| Numeric::new_with_scale(d.mantissa(), d.scale() as u8)));

        let mut stream = query.query(&mut self.client).await.map_err(map_error)?;

        let mut assembler = ResultSetAssembler::default();
        while let Some(item) = stream.try_next().await.map_err(map_error)? {
            let event = match item {
                QueryItem::Metadata(meta) => StreamEvent::Columns(
                    meta.columns().iter().map(|c| c.name().to_string()).collect(),
                ),
                QueryItem::Row(row) => StreamEvent::Row(
                    row.into_iter()
                        .map(cell_from_column)
                        .collect::<Result<Vec<_>, _>>()?,
                ),
            };
            assembler.push(event)?;
        }

        let raw = assembler.finish()?;
        debug!(
            result_sets = raw.result_sets.len(),
            total_extracted = raw.total_extracted,
            "extraction procedure drained"
        );
        Ok(raw)
    }

    async fn close(self: Box<Self>) -> Result<(), StoreError> {
        self.client.close().await.map_err(map_error)
    }
}

/// One item of the drained TDS stream.
#[derive(Debug)]
enum StreamEvent {
    /// Column metadata opening a new result set.
    Columns(Vec<String>),
    Row(Vec<SqlValue>),
}

/// Groups stream events into result sets and splits off the trailing
/// counter set selected by [`extraction_batch`].
#[derive(Debug, Default)]
struct ResultSetAssembler {
    sets: Vec<ResultSet>,
}

impl ResultSetAssembler {
    fn push(&mut self, event: StreamEvent) -> Result<(), StoreError> {
        match event {
            StreamEvent::Columns(columns) => self.sets.push(ResultSet::new(columns)),
            StreamEvent::Row(cells) => self
                .sets
                .last_mut()
                .ok_or_else(|| StoreError::Protocol("row received before column metadata".into()))?
                .push_row(cells),
        }
        Ok(())
    }

    fn finish(mut self) -> Result<RawExtraction, StoreError> {
        let counter = self
            .sets
            .pop()
            .ok_or_else(|| StoreError::Protocol("output counter result set missing".into()))?;
        Ok(RawExtraction {
            total_extracted: read_counter(&counter)?,
            result_sets: self.sets,
        })
    }
}

/// T-SQL batch that runs the procedure and surfaces its OUTPUT parameter.
///
/// `procedure` is validated by config loading to contain only identifier
/// characters and dots.
fn extraction_batch(procedure: &str) -> String {
    let bindings: Vec<String> = INPUT_PARAMS
        .iter()
        .enumerate()
        .map(|(i, name)| format!("    {} = @P{},", name, i + 1))
        .collect();

    format!(
        "SET NOCOUNT ON;\n\
         DECLARE {out} INT;\n\
         EXEC {procedure}\n\
         {bindings}\n    \
         {out} = {out} OUTPUT;\n\
         SELECT {out} AS TotalExtraidas;",
        out = OUTPUT_PARAM,
        procedure = procedure,
        bindings = bindings.join("\n"),
    )
}

fn read_counter(set: &ResultSet) -> Result<Option<i32>, StoreError> {
    let cell = set
        .rows()
        .first()
        .and_then(|row| row.first())
        .ok_or_else(|| StoreError::Protocol("output counter row missing".into()))?;

    match cell {
        SqlValue::Null => Ok(None),
        SqlValue::Int(n) => i32::try_from(*n)
            .map(Some)
            .map_err(|_| StoreError::Protocol(format!("output counter out of range: {}", n))),
        other => Err(StoreError::Protocol(format!(
            "output counter has type {}",
            other.type_name()
        ))),
    }
}

fn cell_from_column(data: ColumnData<'static>) -> Result<SqlValue, StoreError> {
    let value = match &data {
        ColumnData::U8(v) => v.map(|n| SqlValue::Int(n.into())),
        ColumnData::I16(v) => v.map(|n| SqlValue::Int(n.into())),
        ColumnData::I32(v) => v.map(|n| SqlValue::Int(n.into())),
        ColumnData::I64(v) => v.map(SqlValue::Int),
        ColumnData::F32(v) => v.map(|n| SqlValue::Float(n.into())),
        ColumnData::F64(v) => v.map(SqlValue::Float),
        ColumnData::Bit(v) => v.map(SqlValue::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| SqlValue::Text(s.to_string())),
        ColumnData::Numeric(_) => Decimal::from_sql(&data)
            .map_err(map_error)?
            .map(SqlValue::Decimal),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(&data)
                .map_err(map_error)?
                .map(SqlValue::DateTime)
        }
        ColumnData::Date(_) => NaiveDate::from_sql(&data)
            .map_err(map_error)?
            .map(|d| SqlValue::DateTime(d.and_time(NaiveTime::MIN))),
        other => {
            return Err(StoreError::Protocol(format!(
                "unsupported column type: {:?}",
                other
            )))
        }
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

/// Error raised by the server itself, during login or while running the batch.
fn rejection(code: u32, message: &str) -> StoreError {
    StoreError::Database {
        code: i32::try_from(code).unwrap_or(i32::MAX),
        message: message.to_string(),
    }
}

fn map_error(err: tiberius::error::Error) -> StoreError {
    match err {
        tiberius::error::Error::Server(token) => rejection(token.code(), token.message()),
        e @ (tiberius::error::Error::Io { .. }
        | tiberius::error::Error::Tls(_)
        | tiberius::error::Error::Routing { .. }) => StoreError::Connection(e.to_string()),
        other => StoreError::Protocol(other.to_string()),
    }
}
