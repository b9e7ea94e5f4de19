use crate::error::{EtlError, Result};
use crate::types::{ColumnDef, ColumnType, Value};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

/// An ordered collection of named, typed columns with rows of scalar values.
/// This is the substrate every transformation stage works on.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Vec<Value>>,
}

impl Frame {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Load a delimited file with a header line. Column types are inferred
    /// from the content (integer, then double, then string; empty cells are
    /// null). Rows whose field count does not match the header are dropped
    /// silently; only the count is returned.
    pub fn from_csv(bytes: &[u8]) -> Result<(Frame, usize)> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);

        let mut records = reader.records();
        let header = match records.next() {
            Some(record) => record?,
            None => return Ok((Frame { columns: Vec::new(), rows: Vec::new() }, 0)),
        };

        // Unnamed header fields get positional names, the way distributed
        // engines label artifact index columns.
        let names: Vec<String> = header
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let h = h.trim();
                if h.is_empty() {
                    format!("_c{i}")
                } else {
                    h.to_string()
                }
            })
            .collect();

        let mut raw_rows: Vec<Vec<String>> = Vec::new();
        let mut malformed = 0usize;
        for record in records {
            let record = record?;
            if record.len() != names.len() {
                malformed += 1;
                continue;
            }
            raw_rows.push(record.iter().map(|s| s.to_string()).collect());
        }

        let mut columns = Vec::with_capacity(names.len());
        for (j, name) in names.iter().enumerate() {
            let mut saw_value = false;
            let mut all_int = true;
            let mut all_double = true;
            for row in &raw_rows {
                let cell = row[j].trim();
                if cell.is_empty() {
                    continue;
                }
                saw_value = true;
                if cell.parse::<i64>().is_err() {
                    all_int = false;
                }
                if cell.parse::<f64>().is_err() {
                    all_double = false;
                }
            }
            let ty = if !saw_value {
                ColumnType::Str
            } else if all_int {
                ColumnType::Int
            } else if all_double {
                ColumnType::Double
            } else {
                ColumnType::Str
            };
            columns.push(ColumnDef::new(name.clone(), ty));
        }

        let rows = raw_rows
            .into_iter()
            .map(|raw| {
                raw.into_iter()
                    .zip(columns.iter())
                    .map(|(cell, col)| parse_cell(&cell, col.ty))
                    .collect()
            })
            .collect();

        Ok((Frame { columns, rows }, malformed))
    }

    /// Rebuild a frame from all-text rows (query results) using a declared
    /// schema. Cells that fail to coerce become null.
    pub fn from_text_rows(schema: &[ColumnDef], text_rows: Vec<Vec<String>>) -> Self {
        let rows = text_rows
            .into_iter()
            .map(|raw| {
                schema
                    .iter()
                    .enumerate()
                    .map(|(j, col)| match raw.get(j) {
                        Some(cell) => parse_cell(cell, col.ty),
                        None => Value::Null,
                    })
                    .collect()
            })
            .collect();
        Frame { columns: schema.to_vec(), rows }
    }

    /// Apply a canonicalization function to every column name.
    pub fn rename_columns(&mut self, f: impl Fn(&str) -> String) {
        for col in &mut self.columns {
            col.name = f(&col.name);
        }
    }

    /// Qualify every column name with a table alias, `alias.column`.
    pub fn prefix_columns(&mut self, alias: &str) {
        for col in &mut self.columns {
            col.name = format!("{}.{}", alias, col.name);
        }
    }

    /// Reparse a column from a fixed date pattern. Values that do not match
    /// become null and fall out at the null-drop step.
    pub fn reparse_date(&mut self, column: &str, pattern: &str) -> Result<()> {
        let idx = self
            .column_index(column)
            .ok_or_else(|| EtlError::Schema(format!("no such column to reparse: {column}")))?;
        for row in &mut self.rows {
            row[idx] = match &row[idx] {
                Value::Date(d) => Value::Date(*d),
                Value::Str(s) => match NaiveDate::parse_from_str(s.trim(), pattern) {
                    Ok(d) => Value::Date(d),
                    Err(_) => Value::Null,
                },
                _ => Value::Null,
            };
        }
        self.columns[idx].ty = ColumnType::Date;
        Ok(())
    }

    /// Drop a column if present. Returns whether anything was removed.
    pub fn drop_column(&mut self, name: &str) -> bool {
        match self.column_index(name) {
            Some(idx) => {
                self.columns.remove(idx);
                for row in &mut self.rows {
                    row.remove(idx);
                }
                true
            }
            None => false,
        }
    }

    /// Remove every row containing a null in any column. Returns the number
    /// of rows removed.
    pub fn drop_null_rows(&mut self) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| !row.iter().any(Value::is_null));
        before - self.rows.len()
    }

    /// Remove exact duplicate rows (all columns compared), keeping the first
    /// occurrence. Returns the number of rows removed.
    pub fn drop_duplicate_rows(&mut self) -> usize {
        let before = self.rows.len();
        let mut seen: HashSet<Vec<Value>> = HashSet::with_capacity(before);
        self.rows.retain(|row| seen.insert(row.clone()));
        before - self.rows.len()
    }

    /// Left outer join: every left row is kept; unmatched right columns are
    /// null. A non-unique right key fans out. Null keys never match.
    pub fn left_join(&self, right: &Frame, left_key: &str, right_key: &str) -> Result<Frame> {
        let li = self
            .column_index(left_key)
            .ok_or_else(|| EtlError::Schema(format!("join key not found: {left_key}")))?;
        let ri = right
            .column_index(right_key)
            .ok_or_else(|| EtlError::Schema(format!("join key not found: {right_key}")))?;

        let mut columns = self.columns.clone();
        for col in &right.columns {
            if columns.iter().any(|c| c.name == col.name) {
                return Err(EtlError::Schema(format!(
                    "ambiguous column after join: {}",
                    col.name
                )));
            }
            columns.push(col.clone());
        }

        let mut index: HashMap<&Value, Vec<usize>> = HashMap::new();
        for (i, row) in right.rows.iter().enumerate() {
            let key = &row[ri];
            if !key.is_null() {
                index.entry(key).or_default().push(i);
            }
        }

        let right_width = right.columns.len();
        let mut rows = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            match index.get(&row[li]) {
                Some(matches) => {
                    for &j in matches {
                        let mut out = row.clone();
                        out.extend(right.rows[j].iter().cloned());
                        rows.push(out);
                    }
                }
                None => {
                    let mut out = row.clone();
                    out.extend(std::iter::repeat(Value::Null).take(right_width));
                    rows.push(out);
                }
            }
        }

        Ok(Frame { columns, rows })
    }

    /// Project a fixed set of columns, renaming each `(source, output)` pair.
    pub fn select(&self, projection: &[(&str, &str)]) -> Result<Frame> {
        let mut indices = Vec::with_capacity(projection.len());
        let mut columns = Vec::with_capacity(projection.len());
        for (source, output) in projection {
            let idx = self
                .column_index(source)
                .ok_or_else(|| EtlError::Schema(format!("projected column not found: {source}")))?;
            indices.push(idx);
            columns.push(ColumnDef::new(*output, self.columns[idx].ty));
        }
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(Frame { columns, rows })
    }

    /// Rebuild this frame under a declared schema the way a query engine
    /// binds data to a table definition: names resolve case-insensitively,
    /// integers widen to doubles, and a declared column missing from the
    /// data yields nulls rather than an error.
    pub fn align_to_schema(&self, schema: &[ColumnDef]) -> Frame {
        let indices: Vec<Option<usize>> = schema
            .iter()
            .map(|col| {
                self.columns
                    .iter()
                    .position(|c| c.name.eq_ignore_ascii_case(&col.name))
            })
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                schema
                    .iter()
                    .zip(indices.iter())
                    .map(|(col, idx)| match idx {
                        Some(i) => coerce(&row[*i], col.ty),
                        None => Value::Null,
                    })
                    .collect()
            })
            .collect();
        Frame { columns: schema.to_vec(), rows }
    }

    /// Append the rows of another frame with an identical schema.
    pub fn concat(&mut self, other: Frame) -> Result<()> {
        if self.columns != other.columns {
            return Err(EtlError::Schema(
                "cannot concatenate frames with different schemas".to_string(),
            ));
        }
        self.rows.extend(other.rows);
        Ok(())
    }
}

fn parse_cell(cell: &str, ty: ColumnType) -> Value {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    match ty {
        ColumnType::Int => trimmed.parse::<i64>().map(Value::Int).unwrap_or(Value::Null),
        ColumnType::Double => trimmed.parse::<f64>().map(Value::Double).unwrap_or(Value::Null),
        ColumnType::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .map(Value::Date)
            .unwrap_or(Value::Null),
        ColumnType::Str => Value::Str(cell.to_string()),
    }
}

fn coerce(value: &Value, ty: ColumnType) -> Value {
    match (value, ty) {
        (Value::Null, _) => Value::Null,
        (Value::Int(i), ColumnType::Int) => Value::Int(*i),
        (Value::Int(i), ColumnType::Double) => Value::Double(*i as f64),
        (Value::Double(d), ColumnType::Double) => Value::Double(*d),
        (Value::Str(s), ColumnType::Str) => Value::Str(s.clone()),
        (Value::Date(d), ColumnType::Date) => Value::Date(*d),
        (Value::Str(s), ColumnType::Date) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Value::Date)
            .unwrap_or(Value::Null),
        (v, ColumnType::Str) => Value::Str(v.render()),
        // Anything else is a silent schema mismatch, surfaced as null.
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> Value {
        Value::Int(i)
    }

    #[test]
    fn csv_load_infers_types_and_drops_malformed_rows() {
        let data = b"id,score,label\n1,2.5,a\n2,3.0,b\nbad-row-with,too,many,fields\n3,,c\n";
        let (frame, malformed) = Frame::from_csv(data).unwrap();
        assert_eq!(malformed, 1);
        assert_eq!(frame.rows.len(), 3);
        assert_eq!(frame.columns[0].ty, ColumnType::Int);
        assert_eq!(frame.columns[1].ty, ColumnType::Double);
        assert_eq!(frame.columns[2].ty, ColumnType::Str);
        // empty cell became null
        assert!(frame.rows[2][1].is_null());
    }

    #[test]
    fn csv_load_names_unnamed_index_column() {
        let data = b",age\n0,45\n1,50\n";
        let (frame, _) = Frame::from_csv(data).unwrap();
        assert_eq!(frame.columns[0].name, "_c0");
        assert_eq!(frame.columns[1].name, "age");
    }

    #[test]
    fn null_and_duplicate_rows_are_removed() {
        let mut frame = Frame::new(vec![
            ColumnDef::new("a", ColumnType::Int),
            ColumnDef::new("b", ColumnType::Int),
        ]);
        frame.rows = vec![
            vec![int(1), int(2)],
            vec![int(1), Value::Null],
            vec![int(1), int(2)],
            vec![int(3), int(4)],
        ];
        assert_eq!(frame.drop_null_rows(), 1);
        assert_eq!(frame.drop_duplicate_rows(), 1);
        assert_eq!(frame.rows, vec![vec![int(1), int(2)], vec![int(3), int(4)]]);
    }

    #[test]
    fn left_join_fans_out_on_non_unique_key() {
        let mut left = Frame::new(vec![
            ColumnDef::new("cardio.id", ColumnType::Int),
            ColumnDef::new("cardio.age", ColumnType::Int),
        ]);
        left.rows = vec![vec![int(1), int(45)], vec![int(2), int(60)]];

        let mut right = Frame::new(vec![
            ColumnDef::new("heart.age", ColumnType::Int),
            ColumnDef::new("heart.cholesterol", ColumnType::Int),
        ]);
        right.rows = vec![vec![int(45), int(200)], vec![int(45), int(210)]];

        let joined = left.left_join(&right, "cardio.age", "heart.age").unwrap();
        // age 45 cross-multiplies with both heart rows; age 60 keeps nulls
        assert_eq!(joined.rows.len(), 3);
        assert_eq!(joined.rows[0][3], int(200));
        assert_eq!(joined.rows[1][3], int(210));
        assert!(joined.rows[2][2].is_null());
        assert!(joined.rows[2][3].is_null());
    }

    #[test]
    fn left_join_skips_null_keys() {
        let mut left = Frame::new(vec![ColumnDef::new("l.k", ColumnType::Int)]);
        left.rows = vec![vec![Value::Null]];
        let mut right = Frame::new(vec![ColumnDef::new("r.k", ColumnType::Int)]);
        right.rows = vec![vec![Value::Null]];

        let joined = left.left_join(&right, "l.k", "r.k").unwrap();
        assert_eq!(joined.rows.len(), 1);
        // null does not match null; right side stays unmatched
        assert!(joined.rows[0][1].is_null());
    }

    #[test]
    fn select_projects_and_renames_in_order() {
        let mut frame = Frame::new(vec![
            ColumnDef::new("cardio.id", ColumnType::Int),
            ColumnDef::new("cardio.age", ColumnType::Int),
        ]);
        frame.rows = vec![vec![int(7), int(45)]];
        let projected = frame
            .select(&[("cardio.age", "age"), ("cardio.id", "user_id")])
            .unwrap();
        assert_eq!(projected.column_names(), vec!["age", "user_id"]);
        assert_eq!(projected.rows[0], vec![int(45), int(7)]);
    }

    #[test]
    fn align_to_schema_is_case_insensitive_and_widens_ints() {
        let mut frame = Frame::new(vec![
            ColumnDef::new("User_ID", ColumnType::Int),
            ColumnDef::new("Protein", ColumnType::Int),
        ]);
        frame.rows = vec![vec![int(1), int(30)]];
        let schema = vec![
            ColumnDef::new("user_id", ColumnType::Int),
            ColumnDef::new("protein", ColumnType::Double),
            ColumnDef::new("missing", ColumnType::Str),
        ];
        let aligned = frame.align_to_schema(&schema);
        assert_eq!(aligned.rows[0][0], int(1));
        assert_eq!(aligned.rows[0][1], Value::Double(30.0));
        assert!(aligned.rows[0][2].is_null());
    }

    #[test]
    fn text_rows_coerce_by_declared_type() {
        let schema = vec![
            ColumnDef::new("user_id", ColumnType::Int),
            ColumnDef::new("bmi", ColumnType::Double),
            ColumnDef::new("sex", ColumnType::Str),
        ];
        let frame = Frame::from_text_rows(
            &schema,
            vec![vec!["12".to_string(), "24.5".to_string(), "M".to_string()]],
        );
        assert_eq!(frame.rows[0][0], int(12));
        assert_eq!(frame.rows[0][1], Value::Double(24.5));
        assert_eq!(frame.rows[0][2], Value::Str("M".to_string()));
    }

    #[test]
    fn reparse_date_nulls_unparseable_values() {
        let mut frame = Frame::new(vec![ColumnDef::new("Date", ColumnType::Str)]);
        frame.rows = vec![
            vec![Value::Str("2024-01-05".to_string())],
            vec![Value::Str("05/01/2024".to_string())],
        ];
        frame.reparse_date("Date", "%Y-%m-%d").unwrap();
        assert_eq!(frame.columns[0].ty, ColumnType::Date);
        assert!(matches!(frame.rows[0][0], Value::Date(_)));
        assert!(frame.rows[1][0].is_null());
    }
}
