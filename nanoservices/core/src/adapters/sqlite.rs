//! Conversions between SQLite result sets and Arrow tables.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BinaryArray, BinaryBuilder, Float64Array, Float64Builder, Int64Array,
    Int64Builder, StringArray, StringBuilder,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use medallion_utils::Table;
use rusqlite::types::Value;
use rusqlite::{Connection, Transaction};

#[derive(Debug, thiserror::Error)]
pub enum SqlError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Arrow(#[from] ArrowError),
    #[error("statement is not read-only: {0}")]
    NotReadOnly(String),
    #[error("table has no columns")]
    NoColumns,
    #[error("column '{column}' is declared {expected} but holds {found}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: String,
    },
}

impl SqlError {
    pub fn is_missing_table(&self) -> bool {
        matches!(self, SqlError::Sqlite(e) if e.to_string().contains("no such table"))
    }
}

/// Storage class of a result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Affinity {
    Null,
    Integer,
    Real,
    Text,
    Blob,
}

impl Affinity {
    /// Affinity of a declared column type, following SQLite's name rules.
    /// `None` for expressions and NUMERIC-like declarations, whose type only
    /// the stored values can tell.
    fn declared(decl: Option<&str>) -> Option<Self> {
        let decl = decl?.to_ascii_uppercase();
        if decl.is_empty() {
            None
        } else if decl.contains("INT") {
            Some(Affinity::Integer)
        } else if ["CHAR", "CLOB", "TEXT"].iter().any(|t| decl.contains(t)) {
            Some(Affinity::Text)
        } else if decl.contains("BLOB") {
            Some(Affinity::Blob)
        } else if ["REAL", "FLOA", "DOUB"].iter().any(|t| decl.contains(t)) {
            Some(Affinity::Real)
        } else {
            None
        }
    }

    fn widen(self, value: &Value) -> Self {
        let other = match value {
            Value::Null => return self,
            Value::Integer(_) => Affinity::Integer,
            Value::Real(_) => Affinity::Real,
            Value::Text(_) => Affinity::Text,
            Value::Blob(_) => Affinity::Blob,
        };
        match (self, other) {
            (Affinity::Null, o) => o,
            (a, o) if a == o => a,
            (Affinity::Blob, _) | (_, Affinity::Blob) => Affinity::Blob,
            (Affinity::Text, _) | (_, Affinity::Text) => Affinity::Text,
            _ => Affinity::Real,
        }
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Attach `file` as database `schema` unless that name is already attached.
/// Must run outside a transaction.
pub fn attach_schema(conn: &Connection, schema: &str, file: &str) -> rusqlite::Result<()> {
    let attached: i64 = conn.query_row(
        "SELECT count(*) FROM pragma_database_list WHERE name = ?1",
        [schema],
        |row| row.get(0),
    )?;
    if attached == 0 {
        conn.execute(&format!("ATTACH DATABASE ?1 AS {}", quote_ident(schema)), [file])?;
    }
    Ok(())
}

/// Column type used when creating a warehouse table.
pub fn sql_type(data_type: &DataType) -> &'static str {
    if data_type.is_integer() || *data_type == DataType::Boolean {
        "INTEGER"
    } else if data_type.is_floating() {
        "REAL"
    } else if matches!(data_type, DataType::Binary | DataType::LargeBinary) {
        "BLOB"
    } else {
        "TEXT"
    }
}

/// Run a read-only `query` and collect the complete result set.
///
/// Column types come from the declared types of the result columns, so an
/// empty result has the same schema as a full one. Columns without a usable
/// declaration are typed from their values, all-null ones as text.
pub fn query_table(conn: &Connection, query: &str) -> Result<Table, SqlError> {
    let mut stmt = conn.prepare(query)?;
    if !stmt.readonly() {
        return Err(SqlError::NotReadOnly(query.to_string()));
    }
    let declared: Vec<(String, Option<Affinity>)> = stmt
        .columns()
        .iter()
        .map(|c| (c.name().to_string(), Affinity::declared(c.decl_type())))
        .collect();
    if declared.is_empty() {
        return Err(SqlError::NoColumns);
    }

    let mut columns: Vec<Vec<Value>> = vec![Vec::new(); declared.len()];
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        for (idx, column) in columns.iter_mut().enumerate() {
            column.push(row.get::<_, Value>(idx)?);
        }
    }

    let mut fields = Vec::with_capacity(declared.len());
    let mut arrays = Vec::with_capacity(declared.len());
    for ((name, affinity), values) in declared.into_iter().zip(columns) {
        let affinity = affinity.unwrap_or_else(|| values.iter().fold(Affinity::Null, |acc, v| acc.widen(v)));
        let (data_type, array) = values_to_array(&name, affinity, values)?;
        fields.push(Field::new(name, data_type, true));
        arrays.push(array);
    }

    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?;
    Ok(Table::from_batch(batch))
}

fn mismatch(column: &str, expected: &'static str, value: &Value) -> SqlError {
    SqlError::TypeMismatch {
        column: column.to_string(),
        expected,
        found: format!("{value:?}"),
    }
}

fn values_to_array(column: &str, affinity: Affinity, values: Vec<Value>) -> Result<(DataType, ArrayRef), SqlError> {
    Ok(match affinity {
        Affinity::Integer => {
            let mut builder = Int64Builder::with_capacity(values.len());
            for value in values {
                match value {
                    Value::Null => builder.append_null(),
                    Value::Integer(i) => builder.append_value(i),
                    Value::Real(r) if r.fract() == 0.0 => builder.append_value(r as i64),
                    other => return Err(mismatch(column, "INTEGER", &other)),
                }
            }
            (DataType::Int64, Arc::new(builder.finish()) as ArrayRef)
        }
        Affinity::Real => {
            let mut builder = Float64Builder::with_capacity(values.len());
            for value in values {
                match value {
                    Value::Null => builder.append_null(),
                    Value::Integer(i) => builder.append_value(i as f64),
                    Value::Real(r) => builder.append_value(r),
                    other => return Err(mismatch(column, "REAL", &other)),
                }
            }
            (DataType::Float64, Arc::new(builder.finish()) as ArrayRef)
        }
        Affinity::Blob => {
            let mut builder = BinaryBuilder::new();
            for value in values {
                match value {
                    Value::Null => builder.append_null(),
                    Value::Blob(b) => builder.append_value(b),
                    Value::Text(s) => builder.append_value(s.as_bytes()),
                    Value::Integer(i) => builder.append_value(i.to_string().as_bytes()),
                    Value::Real(r) => builder.append_value(r.to_string().as_bytes()),
                }
            }
            (DataType::Binary, Arc::new(builder.finish()) as ArrayRef)
        }
        Affinity::Text | Affinity::Null => {
            let mut builder = StringBuilder::new();
            for value in values {
                match value {
                    Value::Null => builder.append_null(),
                    Value::Text(s) => builder.append_value(s),
                    Value::Integer(i) => builder.append_value(i.to_string()),
                    Value::Real(r) => builder.append_value(r.to_string()),
                    Value::Blob(b) => builder.append_value(String::from_utf8_lossy(&b)),
                }
            }
            (DataType::Utf8, Arc::new(builder.finish()) as ArrayRef)
        }
    })
}

/// One Arrow column viewed through its SQLite storage class.
enum SqlColumn {
    Integer(Int64Array),
    Real(Float64Array),
    Text(StringArray),
    Blob(BinaryArray),
}

impl SqlColumn {
    fn from_array(array: &ArrayRef) -> Result<Self, ArrowError> {
        let data_type = array.data_type();
        Ok(match sql_type(data_type) {
            "INTEGER" => SqlColumn::Integer(cast(array, &DataType::Int64)?.as_primitive::<Int64Type>().clone()),
            "REAL" => SqlColumn::Real(cast(array, &DataType::Float64)?.as_primitive::<Float64Type>().clone()),
            "BLOB" => SqlColumn::Blob(cast(array, &DataType::Binary)?.as_binary::<i32>().clone()),
            _ => SqlColumn::Text(cast(array, &DataType::Utf8)?.as_string::<i32>().clone()),
        })
    }

    fn value(&self, row: usize) -> Value {
        match self {
            SqlColumn::Integer(a) if a.is_valid(row) => Value::Integer(a.value(row)),
            SqlColumn::Real(a) if a.is_valid(row) => Value::Real(a.value(row)),
            SqlColumn::Text(a) if a.is_valid(row) => Value::Text(a.value(row).to_string()),
            SqlColumn::Blob(a) if a.is_valid(row) => Value::Blob(a.value(row).to_vec()),
            _ => Value::Null,
        }
    }
}

/// Drop and recreate `target` inside `tx`, then insert every row of `table`.
/// `target` must already be quoted.
pub fn replace_table(tx: &Transaction<'_>, target: &str, table: &Table) -> Result<usize, SqlError> {
    let schema = table.schema();
    if schema.fields().is_empty() {
        return Err(SqlError::NoColumns);
    }

    let definitions = schema
        .fields()
        .iter()
        .map(|f| format!("{} {}", quote_ident(f.name()), sql_type(f.data_type())))
        .collect::<Vec<_>>()
        .join(", ");
    tx.execute_batch(&format!("DROP TABLE IF EXISTS {target}; CREATE TABLE {target} ({definitions});"))?;

    let names = schema
        .fields()
        .iter()
        .map(|f| quote_ident(f.name()))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=schema.fields().len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = tx.prepare(&format!("INSERT INTO {target} ({names}) VALUES ({placeholders})"))?;

    let mut inserted = 0;
    for batch in table.batches() {
        let columns = batch
            .columns()
            .iter()
            .map(SqlColumn::from_array)
            .collect::<Result<Vec<_>, _>>()?;
        for row in 0..batch.num_rows() {
            stmt.execute(rusqlite::params_from_iter(columns.iter().map(|c| c.value(row))))?;
            inserted += 1;
        }
    }
    Ok(inserted)
}
