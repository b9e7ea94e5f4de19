use crate::error::{EtlError, Result};
use crate::frame::Frame;
use crate::types::{ColumnDef, ColumnType, Value};
use arrow::array::{Array, ArrayRef, Date32Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Duration, NaiveDate};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::sync::Arc;

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
}

fn arrow_type(ty: ColumnType) -> DataType {
    match ty {
        ColumnType::Int => DataType::Int64,
        ColumnType::Double => DataType::Float64,
        ColumnType::Str => DataType::Utf8,
        ColumnType::Date => DataType::Date32,
    }
}

/// Serialize a frame to Parquet bytes (SNAPPY-compressed).
pub fn frame_to_parquet(frame: &Frame) -> Result<Vec<u8>> {
    let fields: Vec<Field> = frame
        .columns
        .iter()
        .map(|c| Field::new(&c.name, arrow_type(c.ty), true))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(frame.columns.len());
    for (j, col) in frame.columns.iter().enumerate() {
        let array: ArrayRef = match col.ty {
            ColumnType::Int => {
                let values: Vec<Option<i64>> = frame
                    .rows
                    .iter()
                    .map(|row| match &row[j] {
                        Value::Int(i) => Some(*i),
                        _ => None,
                    })
                    .collect();
                Arc::new(Int64Array::from(values))
            }
            ColumnType::Double => {
                let values: Vec<Option<f64>> = frame
                    .rows
                    .iter()
                    .map(|row| match &row[j] {
                        Value::Double(d) => Some(*d),
                        Value::Int(i) => Some(*i as f64),
                        _ => None,
                    })
                    .collect();
                Arc::new(Float64Array::from(values))
            }
            ColumnType::Str => {
                let values: Vec<Option<String>> = frame
                    .rows
                    .iter()
                    .map(|row| match &row[j] {
                        Value::Null => None,
                        v => Some(v.render()),
                    })
                    .collect();
                Arc::new(StringArray::from(values))
            }
            ColumnType::Date => {
                let values: Vec<Option<i32>> = frame
                    .rows
                    .iter()
                    .map(|row| match &row[j] {
                        Value::Date(d) => {
                            Some(d.signed_duration_since(epoch()).num_days() as i32)
                        }
                        _ => None,
                    })
                    .collect();
                Arc::new(Date32Array::from(values))
            }
        };
        arrays.push(array);
    }

    if frame.columns.is_empty() {
        return Err(EtlError::Schema("cannot write a frame with no columns".to_string()));
    }
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(buf)
}

/// Deserialize Parquet bytes back into a frame.
pub fn parquet_to_frame(bytes: &[u8]) -> Result<Frame> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes::Bytes::from(bytes.to_vec()))?;
    let schema = builder.schema().clone();

    let mut columns = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let ty = match field.data_type() {
            DataType::Int64 => ColumnType::Int,
            DataType::Float64 => ColumnType::Double,
            DataType::Utf8 => ColumnType::Str,
            DataType::Date32 => ColumnType::Date,
            other => {
                return Err(EtlError::Schema(format!(
                    "unsupported Parquet column type for {}: {other}",
                    field.name()
                )))
            }
        };
        columns.push(ColumnDef::new(field.name().clone(), ty));
    }

    let mut frame = Frame::new(columns);
    let reader = builder.build()?;
    for batch in reader {
        let batch = batch?;
        for row in 0..batch.num_rows() {
            let mut out = Vec::with_capacity(frame.columns.len());
            for (j, col) in frame.columns.iter().enumerate() {
                let array = batch.column(j);
                if array.is_null(row) {
                    out.push(Value::Null);
                    continue;
                }
                let value = match col.ty {
                    ColumnType::Int => {
                        let a = array.as_any().downcast_ref::<Int64Array>().ok_or_else(|| {
                            EtlError::Schema(format!("column {} is not Int64", col.name))
                        })?;
                        Value::Int(a.value(row))
                    }
                    ColumnType::Double => {
                        let a = array.as_any().downcast_ref::<Float64Array>().ok_or_else(
                            || EtlError::Schema(format!("column {} is not Float64", col.name)),
                        )?;
                        Value::Double(a.value(row))
                    }
                    ColumnType::Str => {
                        let a = array.as_any().downcast_ref::<StringArray>().ok_or_else(
                            || EtlError::Schema(format!("column {} is not Utf8", col.name)),
                        )?;
                        Value::Str(a.value(row).to_string())
                    }
                    ColumnType::Date => {
                        let a = array.as_any().downcast_ref::<Date32Array>().ok_or_else(
                            || EtlError::Schema(format!("column {} is not Date32", col.name)),
                        )?;
                        Value::Date(epoch() + Duration::days(a.value(row) as i64))
                    }
                };
                out.push(value);
            }
            frame.rows.push(out);
        }
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parquet_round_trip_preserves_values_and_nulls() {
        let mut frame = Frame::new(vec![
            ColumnDef::new("user_id", ColumnType::Int),
            ColumnDef::new("bmi", ColumnType::Double),
            ColumnDef::new("sex", ColumnType::Str),
            ColumnDef::new("date", ColumnType::Date),
        ]);
        frame.rows = vec![
            vec![
                Value::Int(1),
                Value::Double(24.5),
                Value::Str("M".to_string()),
                Value::Date(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()),
            ],
            vec![Value::Int(2), Value::Null, Value::Null, Value::Null],
        ];

        let bytes = frame_to_parquet(&frame).unwrap();
        let decoded = parquet_to_frame(&bytes).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn empty_frame_round_trips_schema() {
        let frame = Frame::new(vec![ColumnDef::new("age", ColumnType::Int)]);
        let bytes = frame_to_parquet(&frame).unwrap();
        let decoded = parquet_to_frame(&bytes).unwrap();
        assert_eq!(decoded.columns, frame.columns);
        assert!(decoded.is_empty());
    }
}
