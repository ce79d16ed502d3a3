//! Builds an [`ExtractionResult`] from the procedure's raw output.
//!
//! Result sets are positional: the first holds validation errors, the second
//! the extracted items. Either may be missing or empty. Columns are looked up
//! by their exact store names, which include spaces and accents
//! (`"Fecha ingreso Fase 2"`, `"Descripción"`); the tables in [`columns`] are
//! the only place those names appear.
//!
//! The reported total always comes from the procedure's output counter,
//! never from the number of rows materialized.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{ExtractedItemRow, ExtractionResult, ValidationErrorRow};
use crate::store::{ResultSet, SqlValue};

/// Store column names, verbatim.
pub mod columns {
    pub const ERROR_ITEM_ID: &str = "CLPrenda_ID";
    pub const ERROR_ITEM_CODE: &str = "CLPrenda_Cod";
    pub const ERROR_REASON: &str = "Motivo";

    pub const ITEM_CODE: &str = "CLPrenda_Codigo";
    pub const PHASE_TWO_ENTRY: &str = "Fecha ingreso Fase 2";
    pub const PHASE_TWO_END: &str = "Fecha termino Fase 2";
    pub const CATEGORY: &str = "Categoria";
    pub const PRODUCT_NAME: &str = "NombreProducto";
    pub const DESCRIPTION: &str = "Descripción";
    pub const CONDITION: &str = "Estado bien";
    pub const QUANTITY: &str = "Cantidad";
    pub const TOTAL_PRICE: &str = "Precio Total (Unidad x Cantidad)";
    pub const COMMISSION: &str = "Comisión";
    pub const INCREMENT: &str = "Incremento";
    pub const ORGANIZATION_NAME: &str = "Nombre Organización";
    pub const ORGANIZATION_TAX_ID: &str = "Rut Organización";
    pub const EMAIL: &str = "Correo";
    pub const PHONE: &str = "Telefono";
    pub const COMUNA: &str = "Comuna";
    pub const CONTACT_ADDRESS: &str = "Direccion contacto";
    pub const REGION: &str = "Región";
    pub const PHOTOS: [&str; 6] = ["Foto1", "Foto2", "Foto3", "Foto4", "Foto5", "Foto6"];
    pub const REPORTS: [&str; 6] = [
        "Informe1", "Informe2", "Informe3", "Informe4", "Informe5", "Informe6",
    ];
}

const VALIDATION_SET: &str = "validation errors";
const ITEMS_SET: &str = "extracted items";

static NULL: SqlValue = SqlValue::Null;

/// Raw output that does not match the expected column contract.
#[derive(Debug, Error, PartialEq)]
pub enum MaterializeError {
    #[error("{set} result set has no column '{column}'")]
    MissingColumn {
        set: &'static str,
        column: &'static str,
    },

    #[error("{set} row {row}, column '{column}': expected {expected}, found {found}")]
    TypeMismatch {
        set: &'static str,
        row: usize,
        column: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{set} row {row}, column '{column}' is null")]
    UnexpectedNull {
        set: &'static str,
        row: usize,
        column: &'static str,
    },

    #[error("output counter was not set by the procedure")]
    MissingCounter,
}

/// Materialize the procedure output into the response payload.
pub fn materialize(
    result_sets: &[ResultSet],
    total_extracted: Option<i32>,
) -> Result<ExtractionResult, MaterializeError> {
    let validation_errors = match result_sets.first() {
        Some(set) if !set.is_empty() => read_validation_errors(set)?,
        _ => Vec::new(),
    };

    let extracted_items = match result_sets.get(1) {
        Some(set) if !set.is_empty() => read_extracted_items(set)?,
        _ => Vec::new(),
    };

    let total_extracted = total_extracted.ok_or(MaterializeError::MissingCounter)?;

    Ok(ExtractionResult {
        validation_errors,
        extracted_items,
        total_extracted,
        message: summary_message(total_extracted),
    })
}

/// Human-readable summary for a given output counter.
pub fn summary_message(total_extracted: i32) -> String {
    if total_extracted == 0 {
        "no items matched the extraction criteria".to_string()
    } else {
        format!("{} items extracted successfully", total_extracted)
    }
}

fn read_validation_errors(set: &ResultSet) -> Result<Vec<ValidationErrorRow>, MaterializeError> {
    let id = column(set, VALIDATION_SET, columns::ERROR_ITEM_ID)?;
    let code = column(set, VALIDATION_SET, columns::ERROR_ITEM_CODE)?;
    let reason = column(set, VALIDATION_SET, columns::ERROR_REASON)?;

    set.rows()
        .iter()
        .enumerate()
        .map(|(i, cells)| {
            let row = Row::new(VALIDATION_SET, i, cells);
            Ok(ValidationErrorRow {
                item_id: row.required(id, Row::int64)?,
                item_code: row.required(code, Row::text)?,
                reason: row.required(reason, Row::text)?,
            })
        })
        .collect()
}

fn read_extracted_items(set: &ResultSet) -> Result<Vec<ExtractedItemRow>, MaterializeError> {
    let layout = ItemLayout::resolve(set)?;
    set.rows()
        .iter()
        .enumerate()
        .map(|(i, cells)| layout.read(&Row::new(ITEMS_SET, i, cells)))
        .collect()
}

/// A resolved column: its store name and position.
#[derive(Clone, Copy)]
struct Col {
    name: &'static str,
    index: usize,
}

fn column(set: &ResultSet, set_name: &'static str, name: &'static str) -> Result<Col, MaterializeError> {
    set.column_index(name)
        .map(|index| Col { name, index })
        .ok_or(MaterializeError::MissingColumn {
            set: set_name,
            column: name,
        })
}

/// Column positions for the extracted-items set, resolved once per set.
struct ItemLayout {
    item_code: Col,
    phase_two_entry: Col,
    phase_two_end: Col,
    category: Col,
    product_name: Col,
    description: Col,
    condition: Col,
    quantity: Col,
    total_price: Col,
    commission: Col,
    increment: Col,
    organization_name: Col,
    organization_tax_id: Col,
    email: Col,
    phone: Col,
    comuna: Col,
    contact_address: Col,
    region: Col,
    photos: [Col; 6],
    reports: [Col; 6],
}

impl ItemLayout {
    fn resolve(set: &ResultSet) -> Result<Self, MaterializeError> {
        let col = |name: &'static str| column(set, ITEMS_SET, name);
        let many = |names: [&'static str; 6]| -> Result<[Col; 6], MaterializeError> {
            let mut cols = [Col { name: "", index: 0 }; 6];
            for (slot, name) in cols.iter_mut().zip(names) {
                *slot = column(set, ITEMS_SET, name)?;
            }
            Ok(cols)
        };

        Ok(Self {
            item_code: col(columns::ITEM_CODE)?,
            phase_two_entry: col(columns::PHASE_TWO_ENTRY)?,
            phase_two_end: col(columns::PHASE_TWO_END)?,
            category: col(columns::CATEGORY)?,
            product_name: col(columns::PRODUCT_NAME)?,
            description: col(columns::DESCRIPTION)?,
            condition: col(columns::CONDITION)?,
            quantity: col(columns::QUANTITY)?,
            total_price: col(columns::TOTAL_PRICE)?,
            commission: col(columns::COMMISSION)?,
            increment: col(columns::INCREMENT)?,
            organization_name: col(columns::ORGANIZATION_NAME)?,
            organization_tax_id: col(columns::ORGANIZATION_TAX_ID)?,
            email: col(columns::EMAIL)?,
            phone: col(columns::PHONE)?,
            comuna: col(columns::COMUNA)?,
            contact_address: col(columns::CONTACT_ADDRESS)?,
            region: col(columns::REGION)?,
            photos: many(columns::PHOTOS)?,
            reports: many(columns::REPORTS)?,
        })
    }

    fn read(&self, row: &Row<'_>) -> Result<ExtractedItemRow, MaterializeError> {
        let [p1, p2, p3, p4, p5, p6] = self.photos;
        let [r1, r2, r3, r4, r5, r6] = self.reports;

        Ok(ExtractedItemRow {
            item_code: row.text(self.item_code)?,
            phase_two_entry_date: row.datetime(self.phase_two_entry)?,
            phase_two_end_date: row.datetime(self.phase_two_end)?,
            category: row.text(self.category)?,
            product_name: row.text(self.product_name)?,
            description: row.text(self.description)?,
            condition: row.text(self.condition)?,
            quantity: row.int32(self.quantity)?,
            total_price: row.decimal(self.total_price)?,
            commission: row.decimal(self.commission)?,
            increment: row.decimal(self.increment)?,
            organization_name: row.text(self.organization_name)?,
            organization_tax_id: row.text(self.organization_tax_id)?,
            email: row.text(self.email)?,
            phone: row.text(self.phone)?,
            comuna: row.text(self.comuna)?,
            contact_address: row.text(self.contact_address)?,
            region: row.text(self.region)?,
            photo1: row.text(p1)?,
            photo2: row.text(p2)?,
            photo3: row.text(p3)?,
            photo4: row.text(p4)?,
            photo5: row.text(p5)?,
            photo6: row.text(p6)?,
            report1: row.text(r1)?,
            report2: row.text(r2)?,
            report3: row.text(r3)?,
            report4: row.text(r4)?,
            report5: row.text(r5)?,
            report6: row.text(r6)?,
        })
    }
}

/// Typed cell access for one row. Every getter maps a null cell to `None`.
struct Row<'a> {
    set: &'static str,
    index: usize,
    cells: &'a [SqlValue],
}

impl<'a> Row<'a> {
    fn new(set: &'static str, index: usize, cells: &'a [SqlValue]) -> Self {
        Self { set, index, cells }
    }

    fn cell(&self, col: Col) -> &SqlValue {
        // Short rows read as null rather than panicking.
        self.cells.get(col.index).unwrap_or(&NULL)
    }

    fn mismatch(&self, col: Col, expected: &'static str, found: &SqlValue) -> MaterializeError {
        MaterializeError::TypeMismatch {
            set: self.set,
            row: self.index,
            column: col.name,
            expected,
            found: found.type_name(),
        }
    }

    fn required<T>(
        &self,
        col: Col,
        get: fn(&Self, Col) -> Result<Option<T>, MaterializeError>,
    ) -> Result<T, MaterializeError> {
        get(self, col)?.ok_or(MaterializeError::UnexpectedNull {
            set: self.set,
            row: self.index,
            column: col.name,
        })
    }

    fn text(&self, col: Col) -> Result<Option<String>, MaterializeError> {
        match self.cell(col) {
            SqlValue::Null => Ok(None),
            SqlValue::Text(s) => Ok(Some(s.clone())),
            other => Err(self.mismatch(col, "text", other)),
        }
    }

    fn int64(&self, col: Col) -> Result<Option<i64>, MaterializeError> {
        match self.cell(col) {
            SqlValue::Null => Ok(None),
            SqlValue::Int(n) => Ok(Some(*n)),
            other => Err(self.mismatch(col, "int", other)),
        }
    }

    fn int32(&self, col: Col) -> Result<Option<i32>, MaterializeError> {
        match self.cell(col) {
            SqlValue::Int(n) => i32::try_from(*n)
                .map(Some)
                .map_err(|_| self.mismatch(col, "int", &SqlValue::Int(*n))),
            SqlValue::Null => Ok(None),
            other => Err(self.mismatch(col, "int", other)),
        }
    }

    fn decimal(&self, col: Col) -> Result<Option<Decimal>, MaterializeError> {
        match self.cell(col) {
            SqlValue::Null => Ok(None),
            SqlValue::Decimal(d) => Ok(Some(*d)),
            SqlValue::Int(n) => Ok(Some(Decimal::from(*n))),
            SqlValue::Float(f) => Decimal::try_from(*f)
                .map(Some)
                .map_err(|_| self.mismatch(col, "decimal", &SqlValue::Float(*f))),
            other => Err(self.mismatch(col, "decimal", other)),
        }
    }

    fn datetime(&self, col: Col) -> Result<Option<NaiveDateTime>, MaterializeError> {
        match self.cell(col) {
            SqlValue::Null => Ok(None),
            SqlValue::DateTime(dt) => Ok(Some(*dt)),
            other => Err(self.mismatch(col, "datetime", other)),
        }
    }
}
