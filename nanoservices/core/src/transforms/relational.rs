//! Relational operators over Arrow tables, the building blocks of asset
//! transforms. All operators are pure: they return a new table.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float64Array, Float64Builder, Int64Array, Int64Builder, Scalar,
    StringArray, StringBuilder, UInt32Array,
};
use arrow::compute::kernels::numeric::add;
use arrow::compute::kernels::substring::substring_by_char;
use arrow::compute::kernels::zip::zip;
use arrow::compute::{self, cast, filter_record_batch, take, take_record_batch, SortOptions};
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema};
use arrow::record_batch::RecordBatch;
use arrow::row::{Row, RowConverter, SortField};
use medallion_utils::error::Error;
use medallion_utils::{MedallionResult, Table};

fn column_index(schema: &Schema, name: &str) -> MedallionResult<usize> {
    schema
        .index_of(name)
        .map_err(|_| Error::Transformation(format!("missing expected column '{name}'")))
}

fn row_converter<'a>(types: impl IntoIterator<Item = &'a DataType>) -> MedallionResult<RowConverter> {
    Ok(RowConverter::new(types.into_iter().map(|t| SortField::new(t.clone())).collect())?)
}

/// Keep `columns`, in the given order.
pub fn project(table: &Table, columns: &[&str]) -> MedallionResult<Table> {
    let schema = table.schema();
    let indices = columns
        .iter()
        .map(|c| column_index(&schema, c))
        .collect::<MedallionResult<Vec<_>>>()?;
    let projected = Arc::new(schema.project(&indices)?);
    let batches = table
        .batches()
        .iter()
        .map(|b| b.project(&indices))
        .collect::<Result<Vec<_>, _>>()?;
    Table::new(projected, batches)
}

/// Remove `columns`. Every named column must exist.
pub fn drop_columns(table: &Table, columns: &[&str]) -> MedallionResult<Table> {
    let schema = table.schema();
    for c in columns {
        column_index(&schema, c)?;
    }
    let keep: Vec<&str> = schema
        .fields()
        .iter()
        .map(|f| f.name().as_str())
        .filter(|n| !columns.contains(n))
        .collect();
    project(table, &keep)
}

/// Rename columns by `(from, to)` pairs.
pub fn rename(table: &Table, mapping: &[(&str, &str)]) -> MedallionResult<Table> {
    let schema = table.schema();
    for (from, _) in mapping {
        column_index(&schema, from)?;
    }
    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .map(|f| match mapping.iter().find(|(from, _)| f.name().as_str() == *from) {
            Some((_, to)) => f.as_ref().clone().with_name(*to),
            None => f.as_ref().clone(),
        })
        .collect();
    let renamed = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
    Table::new(renamed, table.batches().to_vec())
}

/// Drop rows with a null in any of `subset`, or in any column when `None`.
pub fn drop_nulls(table: &Table, subset: Option<&[&str]>) -> MedallionResult<Table> {
    let schema = table.schema();
    let checked: Vec<usize> = match subset {
        Some(columns) => columns
            .iter()
            .map(|c| column_index(&schema, c))
            .collect::<MedallionResult<_>>()?,
        None => (0..schema.fields().len()).collect(),
    };

    let mut batches = Vec::with_capacity(table.batches().len());
    for batch in table.batches() {
        // true where every checked column is non-null
        let mut mask = vec![true; batch.num_rows()];
        for &idx in &checked {
            if let Some(nulls) = batch.column(idx).logical_nulls() {
                for (i, keep) in mask.iter_mut().enumerate() {
                    if nulls.is_null(i) {
                        *keep = false;
                    }
                }
            }
        }
        batches.push(filter_record_batch(batch, &BooleanArray::from(mask))?);
    }
    Table::new(schema, batches)
}

/// Drop duplicate rows, keeping the first occurrence. Nulls compare equal.
pub fn distinct(table: &Table) -> MedallionResult<Table> {
    if table.num_columns() == 0 {
        return Ok(table.clone());
    }
    let batch = table.to_batch()?;
    let schema = batch.schema();
    let converter = row_converter(schema.fields().iter().map(|f| f.data_type()))?;
    let rows = converter.convert_columns(batch.columns())?;

    let mut seen: HashSet<Row<'_>> = HashSet::with_capacity(rows.num_rows());
    let keep: Vec<u32> = (0..rows.num_rows())
        .filter(|&i| seen.insert(rows.row(i)))
        .map(|i| i as u32)
        .collect();
    Ok(Table::from_batch(take_record_batch(&batch, &UInt32Array::from(keep))?))
}

/// Trim any of `chars` from both ends of every value of a string column.
pub fn strip_chars(table: &Table, column: &str, chars: &str) -> MedallionResult<Table> {
    let batch = table.to_batch()?;
    let idx = column_index(&batch.schema(), column)?;
    let values = batch
        .column(idx)
        .as_string_opt::<i32>()
        .ok_or_else(|| Error::Transformation(format!("column '{column}' is not a string column")))?;
    let stripped: StringArray = values
        .iter()
        .map(|v| v.map(|s| s.trim_matches(|c: char| chars.contains(c))))
        .collect();

    let mut columns = batch.columns().to_vec();
    columns[idx] = Arc::new(stripped);
    Ok(Table::from_batch(RecordBatch::try_new(batch.schema(), columns)?))
}

/// Stable sort by `(column, ascending)` keys. Nulls sort last.
pub fn sort_by(table: &Table, keys: &[(&str, bool)]) -> MedallionResult<Table> {
    let batch = table.to_batch()?;
    let schema = batch.schema();
    let mut fields = Vec::with_capacity(keys.len());
    let mut columns = Vec::with_capacity(keys.len());
    for (name, ascending) in keys {
        let idx = column_index(&schema, name)?;
        let options = SortOptions { descending: !ascending, nulls_first: false };
        fields.push(SortField::new_with_options(schema.field(idx).data_type().clone(), options));
        columns.push(batch.column(idx).clone());
    }
    if fields.is_empty() {
        return Ok(table.clone());
    }

    let rows = RowConverter::new(fields)?.convert_columns(&columns)?;
    let mut indices: Vec<u32> = (0..batch.num_rows() as u32).collect();
    indices.sort_by(|&a, &b| rows.row(a as usize).cmp(&rows.row(b as usize)));
    Ok(Table::from_batch(take_record_batch(&batch, &UInt32Array::from(indices))?))
}

/// Inner equi-join on same-named key columns.
///
/// Output rows follow the left table, each followed by its right matches in
/// right order. Columns are the left columns, then the right non-key columns;
/// clashing non-key names get `_x` / `_y` suffixes. Rows with a null key
/// never match.
pub fn inner_join(left: &Table, right: &Table, on: &[&str]) -> MedallionResult<Table> {
    if on.is_empty() {
        return Err(Error::Transformation("join needs at least one key column".to_string()));
    }
    let lb = left.to_batch()?;
    let rb = right.to_batch()?;
    let (ls, rs) = (lb.schema(), rb.schema());

    let mut left_keys = Vec::with_capacity(on.len());
    let mut right_keys = Vec::with_capacity(on.len());
    let mut sort_fields = Vec::with_capacity(on.len());
    let mut left_cols: Vec<ArrayRef> = Vec::with_capacity(on.len());
    let mut right_cols: Vec<ArrayRef> = Vec::with_capacity(on.len());
    for key in on {
        let li = column_index(&ls, key)?;
        let ri = column_index(&rs, key)?;
        let data_type = ls.field(li).data_type();
        sort_fields.push(SortField::new(data_type.clone()));
        left_cols.push(lb.column(li).clone());
        right_cols.push(cast(rb.column(ri), data_type)?);
        left_keys.push(li);
        right_keys.push(ri);
    }

    let converter = RowConverter::new(sort_fields)?;
    let left_rows = converter.convert_columns(&left_cols)?;
    let right_rows = converter.convert_columns(&right_cols)?;
    let has_null = |cols: &[ArrayRef], i: usize| cols.iter().any(|c| c.is_null(i));

    let mut matches: HashMap<Row<'_>, Vec<u32>> = HashMap::new();
    for i in 0..rb.num_rows() {
        if !has_null(&right_cols, i) {
            matches.entry(right_rows.row(i)).or_default().push(i as u32);
        }
    }

    let mut left_take = Vec::new();
    let mut right_take = Vec::new();
    for i in 0..lb.num_rows() {
        if has_null(&left_cols, i) {
            continue;
        }
        if let Some(found) = matches.get(&left_rows.row(i)) {
            for &j in found {
                left_take.push(i as u32);
                right_take.push(j);
            }
        }
    }
    let left_take = UInt32Array::from(left_take);
    let right_take = UInt32Array::from(right_take);

    let right_rest: Vec<usize> = (0..rs.fields().len()).filter(|i| !right_keys.contains(i)).collect();
    let right_names: HashSet<&str> = right_rest.iter().map(|&i| rs.field(i).name().as_str()).collect();
    let left_names: HashSet<&str> = ls.fields().iter().map(|f| f.name().as_str()).collect();

    let mut fields = Vec::with_capacity(ls.fields().len() + right_rest.len());
    let mut columns = Vec::with_capacity(fields.capacity());
    for (i, field) in ls.fields().iter().enumerate() {
        let name = if !left_keys.contains(&i) && right_names.contains(field.name().as_str()) {
            format!("{}_x", field.name())
        } else {
            field.name().clone()
        };
        fields.push(field.as_ref().clone().with_name(name));
        columns.push(take(lb.column(i).as_ref(), &left_take, None)?);
    }
    for &i in &right_rest {
        let field = rs.field(i);
        let name = if left_names.contains(field.name().as_str()) {
            format!("{}_y", field.name())
        } else {
            field.name().clone()
        };
        fields.push(field.clone().with_name(name));
        columns.push(take(rb.column(i).as_ref(), &right_take, None)?);
    }

    Ok(Table::from_batch(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?))
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggFunc {
    Sum,
    /// Non-null values
    Count,
    CountDistinct,
    Avg,
    Max,
    Min,
    /// Non-null values joined with the separator, in row order
    GroupConcat(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub column: String,
    pub func: AggFunc,
    pub alias: String,
}

impl Aggregate {
    pub fn new(column: impl Into<String>, func: AggFunc, alias: impl Into<String>) -> Self {
        Self { column: column.into(), func, alias: alias.into() }
    }

    pub fn sum(column: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::new(column, AggFunc::Sum, alias)
    }

    pub fn count(column: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::new(column, AggFunc::Count, alias)
    }

    pub fn count_distinct(column: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::new(column, AggFunc::CountDistinct, alias)
    }

    pub fn avg(column: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::new(column, AggFunc::Avg, alias)
    }

    pub fn max(column: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::new(column, AggFunc::Max, alias)
    }

    pub fn min(column: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::new(column, AggFunc::Min, alias)
    }

    pub fn group_concat(column: impl Into<String>, separator: &str, alias: impl Into<String>) -> Self {
        Self::new(column, AggFunc::GroupConcat(separator.to_string()), alias)
    }
}

/// Group rows by `keys` and compute `aggregates` per group.
///
/// Groups appear in order of first appearance; null keys form their own
/// group. Aggregates over groups without a non-null value are null, except
/// the counts which are zero.
pub fn group_by(table: &Table, keys: &[&str], aggregates: &[Aggregate]) -> MedallionResult<Table> {
    if keys.is_empty() {
        return Err(Error::Transformation("group by needs at least one key column".to_string()));
    }
    let batch = table.to_batch()?;
    let schema = batch.schema();
    let key_idx = keys
        .iter()
        .map(|k| column_index(&schema, k))
        .collect::<MedallionResult<Vec<_>>>()?;

    let key_cols: Vec<ArrayRef> = key_idx.iter().map(|&i| batch.column(i).clone()).collect();
    let converter = row_converter(key_idx.iter().map(|&i| schema.field(i).data_type()))?;
    let rows = converter.convert_columns(&key_cols)?;

    let mut group_of: HashMap<Row<'_>, usize> = HashMap::new();
    let mut groups: Vec<Vec<u32>> = Vec::new();
    for i in 0..batch.num_rows() {
        let g = *group_of.entry(rows.row(i)).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[g].push(i as u32);
    }

    let firsts = UInt32Array::from(groups.iter().map(|g| g[0]).collect::<Vec<_>>());
    let mut fields = Vec::with_capacity(keys.len() + aggregates.len());
    let mut columns = Vec::with_capacity(fields.capacity());
    for &i in &key_idx {
        fields.push(schema.field(i).clone());
        columns.push(take(batch.column(i).as_ref(), &firsts, None)?);
    }
    for agg in aggregates {
        let idx = column_index(&schema, &agg.column)?;
        let (data_type, array) = aggregate(batch.column(idx), &groups, agg)?;
        fields.push(Field::new(&agg.alias, data_type, true));
        columns.push(array);
    }

    Ok(Table::from_batch(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?))
}

enum Numeric {
    Int(Int64Array),
    Float(Float64Array),
}

fn numeric(values: &ArrayRef, column: &str) -> MedallionResult<Numeric> {
    let data_type = values.data_type();
    if data_type.is_integer() {
        Ok(Numeric::Int(cast(values, &DataType::Int64)?.as_primitive::<Int64Type>().clone()))
    } else if data_type.is_floating() || matches!(data_type, DataType::Decimal128(..)) {
        Ok(Numeric::Float(cast(values, &DataType::Float64)?.as_primitive::<Float64Type>().clone()))
    } else {
        Err(Error::Transformation(format!(
            "column '{column}' of type {data_type} cannot be aggregated numerically"
        )))
    }
}

fn indices(group: &[u32]) -> UInt32Array {
    UInt32Array::from(group.to_vec())
}

fn aggregate(values: &ArrayRef, groups: &[Vec<u32>], agg: &Aggregate) -> MedallionResult<(DataType, ArrayRef)> {
    let column = agg.column.as_str();
    match &agg.func {
        AggFunc::Count => {
            let mut out = Int64Builder::with_capacity(groups.len());
            for g in groups {
                let valid = g.iter().filter(|&&i| values.is_valid(i as usize)).count();
                out.append_value(valid as i64);
            }
            Ok((DataType::Int64, Arc::new(out.finish())))
        }
        AggFunc::CountDistinct => {
            let converter = row_converter([values.data_type()])?;
            let rows = converter.convert_columns(&[values.clone()])?;
            let mut out = Int64Builder::with_capacity(groups.len());
            for g in groups {
                let distinct: HashSet<Row<'_>> = g
                    .iter()
                    .filter(|&&i| values.is_valid(i as usize))
                    .map(|&i| rows.row(i as usize))
                    .collect();
                out.append_value(distinct.len() as i64);
            }
            Ok((DataType::Int64, Arc::new(out.finish())))
        }
        AggFunc::GroupConcat(separator) => {
            let text = cast(values, &DataType::Utf8)?;
            let text = text.as_string::<i32>();
            let mut out = StringBuilder::new();
            for g in groups {
                let parts: Vec<&str> = g
                    .iter()
                    .filter(|&&i| text.is_valid(i as usize))
                    .map(|&i| text.value(i as usize))
                    .collect();
                if parts.is_empty() {
                    out.append_null();
                } else {
                    out.append_value(parts.join(separator));
                }
            }
            Ok((DataType::Utf8, Arc::new(out.finish())))
        }
        AggFunc::Max | AggFunc::Min if matches!(values.data_type(), DataType::Utf8 | DataType::LargeUtf8) => {
            let text = cast(values, &DataType::Utf8)?;
            let mut out = StringBuilder::new();
            for g in groups {
                let taken = take(text.as_ref(), &indices(g), None)?;
                let taken = taken.as_string::<i32>();
                let value = if agg.func == AggFunc::Max {
                    compute::max_string(taken)
                } else {
                    compute::min_string(taken)
                };
                out.append_option(value);
            }
            Ok((DataType::Utf8, Arc::new(out.finish())))
        }
        AggFunc::Avg => {
            let numbers = numeric(values, column)?;
            let mut out = Float64Builder::with_capacity(groups.len());
            for g in groups {
                let (sum, count) = match &numbers {
                    Numeric::Int(a) => {
                        let taken = take(a, &indices(g), None)?;
                        let taken = taken.as_primitive::<Int64Type>();
                        (compute::sum(taken).map(|s| s as f64), taken.len() - taken.null_count())
                    }
                    Numeric::Float(a) => {
                        let taken = take(a, &indices(g), None)?;
                        let taken = taken.as_primitive::<Float64Type>();
                        (compute::sum(taken), taken.len() - taken.null_count())
                    }
                };
                out.append_option(sum.filter(|_| count > 0).map(|s| s / count as f64));
            }
            Ok((DataType::Float64, Arc::new(out.finish())))
        }
        AggFunc::Sum | AggFunc::Max | AggFunc::Min => match numeric(values, column)? {
            Numeric::Int(a) => {
                let mut out = Int64Builder::with_capacity(groups.len());
                for g in groups {
                    let taken = take(&a, &indices(g), None)?;
                    let taken = taken.as_primitive::<Int64Type>();
                    out.append_option(match agg.func {
                        AggFunc::Sum => compute::sum(taken),
                        AggFunc::Max => compute::max(taken),
                        _ => compute::min(taken),
                    });
                }
                Ok((DataType::Int64, Arc::new(out.finish())))
            }
            Numeric::Float(a) => {
                let mut out = Float64Builder::with_capacity(groups.len());
                for g in groups {
                    let taken = take(&a, &indices(g), None)?;
                    let taken = taken.as_primitive::<Float64Type>();
                    out.append_option(match agg.func {
                        AggFunc::Sum => compute::sum(taken),
                        AggFunc::Max => compute::max(taken),
                        _ => compute::min(taken),
                    });
                }
                Ok((DataType::Float64, Arc::new(out.finish())))
            }
        },
    }
}

/// Replacement value for [`fill_nulls`], cast to the column's type.
#[derive(Debug, Clone, PartialEq)]
pub enum Fill {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Replace nulls in `column` with `fill`.
pub fn fill_nulls(table: &Table, column: &str, fill: Fill) -> MedallionResult<Table> {
    let batch = table.to_batch()?;
    let schema = batch.schema();
    let idx = column_index(&schema, column)?;

    let replacement: ArrayRef = match fill {
        Fill::Int(v) => Arc::new(Int64Array::from(vec![v])),
        Fill::Float(v) => Arc::new(Float64Array::from(vec![v])),
        Fill::Text(v) => Arc::new(StringArray::from(vec![v])),
    };
    let replacement = cast(&replacement, schema.field(idx).data_type())?;

    let values = batch.column(idx);
    let present = compute::is_not_null(values)?;
    let filled = zip(&present, values, &Scalar::new(replacement))?;

    let mut columns = batch.columns().to_vec();
    columns[idx] = filled;
    Ok(Table::from_batch(RecordBatch::try_new(schema, columns)?))
}

/// Set `name` to `values`, replacing a column of that name or appending a new one.
pub fn with_column(table: &Table, name: &str, values: ArrayRef) -> MedallionResult<Table> {
    let batch = table.to_batch()?;
    let schema = batch.schema();
    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    let mut columns = batch.columns().to_vec();
    let field = Field::new(name, values.data_type().clone(), true);
    match schema.index_of(name) {
        Ok(idx) => {
            fields[idx] = field;
            columns[idx] = values;
        }
        Err(_) => {
            fields.push(field);
            columns.push(values);
        }
    }
    Ok(Table::from_batch(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?))
}

/// `alias = left + right` over two numeric columns, computed as Float64.
/// A null on either side gives a null.
pub fn add_columns(table: &Table, left: &str, right: &str, alias: &str) -> MedallionResult<Table> {
    let batch = table.to_batch()?;
    let schema = batch.schema();
    let operand = |name: &str| -> MedallionResult<ArrayRef> {
        let values = batch.column(column_index(&schema, name)?);
        if !values.data_type().is_numeric() {
            return Err(Error::Transformation(format!("column '{name}' is not numeric")));
        }
        Ok(cast(values, &DataType::Float64)?)
    };
    let total = add(&operand(left)?, &operand(right)?)?;
    with_column(table, alias, total)
}

/// `alias` = at most `length` characters of a string column, from `start`.
pub fn substring(table: &Table, column: &str, start: i64, length: u64, alias: &str) -> MedallionResult<Table> {
    let batch = table.to_batch()?;
    let values = batch.column(column_index(&batch.schema(), column)?);
    if values.data_type() != &DataType::Utf8 {
        return Err(Error::Transformation(format!("column '{column}' is not a string column")));
    }
    let sliced = substring_by_char(values.as_string::<i32>(), start, Some(length))?;
    with_column(table, alias, Arc::new(sliced))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int32Array;
    use medallion_utils::ErrorKind;

    fn table(columns: Vec<(&str, ArrayRef)>) -> Table {
        let fields: Vec<Field> = columns
            .iter()
            .map(|(name, a)| Field::new(*name, a.data_type().clone(), true))
            .collect();
        let arrays = columns.into_iter().map(|(_, a)| a).collect();
        Table::from_batch(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap())
    }

    fn strings(values: &[Option<&str>]) -> ArrayRef {
        Arc::new(StringArray::from(values.to_vec()))
    }

    fn ints(values: &[Option<i64>]) -> ArrayRef {
        Arc::new(Int64Array::from(values.to_vec()))
    }

    fn floats(values: &[Option<f64>]) -> ArrayRef {
        Arc::new(Float64Array::from(values.to_vec()))
    }

    #[test]
    fn drop_nulls_removes_null_rows() {
        let t = table(vec![
            ("id", Arc::new(Int32Array::from(vec![1, 2, 3])) as ArrayRef),
            ("name", strings(&[Some("a"), None, Some("c")])),
        ]);
        let result = drop_nulls(&t, None).unwrap();
        assert_eq!(result.num_rows(), 2);

        let subset = drop_nulls(&t, Some(&["id"][..])).unwrap();
        assert_eq!(subset.num_rows(), 3);
    }

    #[test]
    fn project_rename_and_drop() {
        let t = table(vec![
            ("a", ints(&[Some(1)])),
            ("b", ints(&[Some(2)])),
            ("c", ints(&[Some(3)])),
        ]);
        assert_eq!(project(&t, &["c", "a"]).unwrap().column_names(), vec!["c", "a"]);
        assert_eq!(drop_columns(&t, &["b"]).unwrap().column_names(), vec!["a", "c"]);
        assert_eq!(rename(&t, &[("b", "beta")]).unwrap().column_names(), vec!["a", "beta", "c"]);

        let err = project(&t, &["missing"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransformationError);
        assert!(drop_columns(&t, &["missing"]).is_err());
    }

    #[test]
    fn distinct_keeps_first_occurrences() {
        let t = table(vec![
            ("id", ints(&[Some(1), Some(2), Some(1), None, None])),
            ("v", strings(&[Some("x"), Some("y"), Some("x"), None, None])),
        ]);
        let result = distinct(&t).unwrap();
        let expected = table(vec![
            ("id", ints(&[Some(1), Some(2), None])),
            ("v", strings(&[Some("x"), Some("y"), None])),
        ]);
        assert_eq!(result, expected);
    }

    #[test]
    fn strip_removes_surrounding_quotes() {
        let t = table(vec![("id", strings(&[Some("\"abc\""), Some("def"), None, Some("\"\"")]))]);
        let result = strip_chars(&t, "id", "\"").unwrap();
        let expected = table(vec![("id", strings(&[Some("abc"), Some("def"), None, Some("")]))]);
        assert_eq!(result, expected);

        let numbers = table(vec![("n", ints(&[Some(1)]))]);
        assert!(strip_chars(&numbers, "n", "\"").is_err());
    }

    #[test]
    fn sort_is_stable_with_nulls_last() {
        let t = table(vec![
            ("k", strings(&[Some("b"), None, Some("a"), Some("b")])),
            ("n", ints(&[Some(1), Some(2), Some(3), Some(4)])),
        ]);
        let sorted = sort_by(&t, &[("k", true)]).unwrap();
        let expected = table(vec![
            ("k", strings(&[Some("a"), Some("b"), Some("b"), None])),
            ("n", ints(&[Some(3), Some(1), Some(4), Some(2)])),
        ]);
        assert_eq!(sorted, expected);

        let desc = sort_by(&t, &[("n", false)]).unwrap();
        assert_eq!(desc.column("n").unwrap().as_primitive::<Int64Type>().value(0), 4);
    }

    #[test]
    fn inner_join_matches_keys_and_suffixes_clashes() {
        let orders = table(vec![
            ("order_id", strings(&[Some("o1"), Some("o2"), None, Some("o3")])),
            ("status", strings(&[Some("delivered"), Some("shipped"), Some("lost"), Some("new")])),
        ]);
        let items = table(vec![
            ("order_id", strings(&[Some("o2"), Some("o1"), Some("o2"), None])),
            ("status", strings(&[Some("a"), Some("b"), Some("c"), Some("d")])),
            ("price", floats(&[Some(1.0), Some(2.0), Some(3.0), Some(4.0)])),
        ]);

        let joined = inner_join(&orders, &items, &["order_id"]).unwrap();
        assert_eq!(joined.column_names(), vec!["order_id", "status_x", "status_y", "price"]);
        let expected = table(vec![
            ("order_id", strings(&[Some("o1"), Some("o2"), Some("o2")])),
            ("status_x", strings(&[Some("delivered"), Some("shipped"), Some("shipped")])),
            ("status_y", strings(&[Some("b"), Some("a"), Some("c")])),
            ("price", floats(&[Some(2.0), Some(1.0), Some(3.0)])),
        ]);
        assert_eq!(joined, expected);
    }

    #[test]
    fn group_by_computes_aggregates() {
        let t = table(vec![
            ("customer_id", strings(&[Some("c1"), Some("c2"), Some("c1"), Some("c1")])),
            ("order_id", strings(&[Some("o1"), Some("o2"), Some("o1"), Some("o3")])),
            ("score", ints(&[Some(5), None, Some(3), Some(4)])),
            ("payment", floats(&[Some(10.0), Some(5.5), Some(2.0), None])),
        ]);
        let grouped = group_by(
            &t,
            &["customer_id"],
            &[
                Aggregate::count_distinct("order_id", "orders"),
                Aggregate::count("score", "reviews"),
                Aggregate::avg("score", "avg_score"),
                Aggregate::sum("payment", "total"),
                Aggregate::max("score", "best"),
                Aggregate::group_concat("order_id", ",", "order_ids"),
            ],
        )
        .unwrap();

        let expected = table(vec![
            ("customer_id", strings(&[Some("c1"), Some("c2")])),
            ("orders", ints(&[Some(2), Some(1)])),
            ("reviews", ints(&[Some(3), Some(0)])),
            ("avg_score", floats(&[Some(4.0), None])),
            ("total", floats(&[Some(12.0), Some(5.5)])),
            ("best", ints(&[Some(5), None])),
            ("order_ids", strings(&[Some("o1,o1,o3"), Some("o2")])),
        ]);
        assert_eq!(grouped, expected);
    }

    #[test]
    fn group_by_rejects_non_numeric_sum() {
        let t = table(vec![("k", strings(&[Some("a")])), ("v", strings(&[Some("x")]))]);
        let err = group_by(&t, &["k"], &[Aggregate::sum("v", "s")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransformationError);
    }

    #[test]
    fn fill_nulls_replaces_only_nulls() {
        let t = table(vec![("avg", floats(&[Some(4.5), None]))]);
        let filled = fill_nulls(&t, "avg", Fill::Int(0)).unwrap();
        let expected = table(vec![("avg", floats(&[Some(4.5), Some(0.0)]))]);
        assert_eq!(filled, expected);
    }

    #[test]
    fn add_columns_sums_as_floats() {
        let t = table(vec![
            ("price", floats(&[Some(10.0), Some(2.5), None])),
            ("freight", ints(&[Some(2), Some(1), Some(4)])),
        ]);
        let result = add_columns(&t, "price", "freight", "total").unwrap();
        assert_eq!(result.column_names(), vec!["price", "freight", "total"]);
        let expected = floats(&[Some(12.0), Some(3.5), None]);
        assert_eq!(result.column("total").unwrap().as_ref(), expected.as_ref());

        let replaced = add_columns(&t, "price", "price", "price").unwrap();
        assert_eq!(replaced.column_names(), vec!["price", "freight"]);

        let text = table(vec![("a", strings(&[Some("x")])), ("b", ints(&[Some(1)]))]);
        assert!(add_columns(&text, "a", "b", "c").is_err());
    }

    #[test]
    fn substring_takes_a_prefix() {
        let t = table(vec![("ts", strings(&[Some("2018-01-03 12:00:00"), Some("2018"), None]))]);
        let result = substring(&t, "ts", 0, 7, "month").unwrap();
        let expected = strings(&[Some("2018-01"), Some("2018"), None]);
        assert_eq!(result.column("month").unwrap().as_ref(), expected.as_ref());
        assert_eq!(result.column("ts").unwrap().len(), 3);

        let numbers = table(vec![("n", ints(&[Some(1)]))]);
        assert!(substring(&numbers, "n", 0, 1, "m").is_err());
    }
}
