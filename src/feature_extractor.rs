//! Feature extraction for fraud model training and inference.
//!
//! Only `TX_AMOUNT` and `TX_TIME_SECONDS` are model inputs. Identifier,
//! label and derived columns in the source table are ignored.

use crate::error::{PredictionError, Result};
use crate::table::Table;
use crate::types::transaction::{
    FeatureVector, Label, LabeledDataset, TransactionRecord, AMOUNT_COLUMN, FEATURE_COUNT,
    FEATURE_NAMES, ID_COLUMN, LABEL_COLUMN, TIME_GAP_COLUMN,
};

/// Feature extractor that turns table rows into model input features.
///
/// Features are produced in the exact order the classifier was trained on.
pub struct FeatureExtractor;

/// Resolved positions of the columns the extractor reads
struct ColumnMap {
    amount: usize,
    time_gap: usize,
    label: Option<usize>,
    id: Option<usize>,
}

impl FeatureExtractor {
    /// Create a new feature extractor.
    pub fn new() -> Self {
        Self
    }

    /// Extract the feature vector of a single record.
    pub fn extract(&self, record: &TransactionRecord) -> FeatureVector {
        FeatureVector::new(record.amount, record.time_gap_seconds)
    }

    /// Extract one feature vector per row, in row order.
    ///
    /// Fails without producing anything if a required column is missing or
    /// any cell cannot be parsed.
    pub fn extract_batch(&self, table: &Table) -> Result<Vec<FeatureVector>> {
        let columns = self.resolve(table, false)?;
        table
            .rows()
            .iter()
            .enumerate()
            .map(|(i, row)| self.row_features(row, i, &columns))
            .collect()
    }

    /// Parse every row into a transaction record, keeping labels and ids when present.
    pub fn records(&self, table: &Table) -> Result<Vec<TransactionRecord>> {
        let columns = self.resolve(table, false)?;
        table
            .rows()
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let features = self.row_features(row, i, &columns)?;
                let mut record = TransactionRecord::new(features.amount, features.time_gap_seconds);
                if let Some(idx) = columns.id {
                    record.transaction_id = Some(row[idx].clone());
                }
                if let Some(idx) = columns.label {
                    record.is_fraud = Some(parse_label(&row[idx], i)?);
                }
                Ok(record)
            })
            .collect()
    }

    /// Build a labelled dataset from a training table (`TX_FRAUD` required).
    pub fn labeled_dataset(&self, table: &Table) -> Result<LabeledDataset> {
        let columns = self.resolve(table, true)?;
        let label_idx = columns.label.ok_or_else(|| PredictionError::MissingColumns {
            columns: vec![LABEL_COLUMN.to_string()],
        })?;
        let mut dataset = LabeledDataset::new();

        for (i, row) in table.rows().iter().enumerate() {
            let features = self.row_features(row, i, &columns)?;
            dataset.push(features, parse_label(&row[label_idx], i)?);
        }

        Ok(dataset)
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }

    /// Get feature names in model order.
    pub fn feature_names(&self) -> Vec<&'static str> {
        FEATURE_NAMES.to_vec()
    }

    fn resolve(&self, table: &Table, with_label: bool) -> Result<ColumnMap> {
        let mut required = FEATURE_NAMES.to_vec();
        if with_label {
            required.push(LABEL_COLUMN);
        }
        let missing = table.missing_columns(&required);
        match (table.column_index(AMOUNT_COLUMN), table.column_index(TIME_GAP_COLUMN)) {
            (Some(amount), Some(time_gap)) if missing.is_empty() => Ok(ColumnMap {
                amount,
                time_gap,
                label: table.column_index(LABEL_COLUMN),
                id: table.column_index(ID_COLUMN),
            }),
            _ => Err(PredictionError::MissingColumns { columns: missing }),
        }
    }

    fn row_features(&self, row: &[String], row_index: usize, columns: &ColumnMap) -> Result<FeatureVector> {
        let amount = parse_cell(&row[columns.amount], row_index, AMOUNT_COLUMN)?;
        let time_gap = parse_cell(&row[columns.time_gap], row_index, TIME_GAP_COLUMN)?;
        Ok(FeatureVector::new(amount, time_gap))
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Rows are reported 1-based, counting data rows only.
fn invalid_cell(value: &str, row_index: usize, column: &str) -> PredictionError {
    PredictionError::InvalidCell {
        row: row_index + 1,
        column: column.to_string(),
        value: value.to_string(),
    }
}

/// Amounts, gaps and labels are all finite and non-negative.
fn parse_cell(value: &str, row_index: usize, column: &str) -> Result<f64> {
    match value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(invalid_cell(value, row_index, column)),
    }
}

fn parse_label(value: &str, row_index: usize) -> Result<Label> {
    let parsed = parse_cell(value, row_index, LABEL_COLUMN)?;
    if parsed == 0.0 {
        Ok(Label::Legitimate)
    } else if parsed == 1.0 {
        Ok(Label::Fraud)
    } else {
        Err(invalid_cell(value, row_index, LABEL_COLUMN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRAINING: &str = "ID,TRANSACTION_ID,TX_DATETIME,CUSTOMER_ID,TERMINAL_ID,TX_AMOUNT,TX_TIME_SECONDS,TX_TIME_DAYS,TX_FRAUD,TX_FRAUD_SCENARIO\n\
        0,0,2018-04-01 00:00:31,596,3156,57.16,31,0,0,0\n\
        1,1,2018-04-01 00:02:10,4961,3412,81.51,130,0,1,1\n\
        2,2,2018-04-01 00:07:56,2,1365,146.00,476,0,0,0\n";

    fn training_table() -> Table {
        Table::from_reader(TRAINING.as_bytes()).unwrap()
    }

    #[test]
    fn test_extract_batch_keeps_order_and_ignores_metadata() {
        let extractor = FeatureExtractor::new();
        let features = extractor.extract_batch(&training_table()).unwrap();

        assert_eq!(
            features,
            vec![
                FeatureVector::new(57.16, 31.0),
                FeatureVector::new(81.51, 130.0),
                FeatureVector::new(146.0, 476.0),
            ]
        );
    }

    #[test]
    fn test_labeled_dataset() {
        let dataset = FeatureExtractor::new()
            .labeled_dataset(&training_table())
            .unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.class_counts(), [2, 1]);
        assert_eq!(dataset.samples()[1].label, Label::Fraud);
    }

    #[test]
    fn test_records_carry_id_and_label() {
        let records = FeatureExtractor::new().records(&training_table()).unwrap();

        assert_eq!(records[1].transaction_id.as_deref(), Some("1"));
        assert_eq!(records[1].is_fraud, Some(Label::Fraud));
        assert_eq!(FeatureExtractor::new().extract(&records[2]), FeatureVector::new(146.0, 476.0));
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let table = Table::from_reader("TX_AMOUNT,CUSTOMER_ID\n10,1\n".as_bytes()).unwrap();

        match FeatureExtractor::new().extract_batch(&table) {
            Err(PredictionError::MissingColumns { columns }) => {
                assert_eq!(columns, vec![TIME_GAP_COLUMN.to_string()]);
            }
            other => panic!("expected missing columns, got {:?}", other),
        }
    }

    #[test]
    fn test_unparseable_cell_is_schema_error() {
        let table = Table::from_reader("TX_AMOUNT,TX_TIME_SECONDS\n10,5\nabc,7\n".as_bytes()).unwrap();

        match FeatureExtractor::new().extract_batch(&table) {
            Err(PredictionError::InvalidCell { row, column, value }) => {
                assert_eq!(row, 2);
                assert_eq!(column, AMOUNT_COLUMN);
                assert_eq!(value, "abc");
            }
            other => panic!("expected invalid cell, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_cell_is_schema_error() {
        let table =
            Table::from_reader("TX_AMOUNT,TX_TIME_SECONDS\n10,5\n12,-3\n".as_bytes()).unwrap();

        match FeatureExtractor::new().extract_batch(&table) {
            Err(PredictionError::InvalidCell { row, column, value }) => {
                assert_eq!(row, 2);
                assert_eq!(column, TIME_GAP_COLUMN);
                assert_eq!(value, "-3");
            }
            other => panic!("expected invalid cell, got {:?}", other),
        }

        let training =
            Table::from_reader("TX_AMOUNT,TX_TIME_SECONDS,TX_FRAUD\n-5,10,1\n".as_bytes()).unwrap();
        assert!(matches!(
            FeatureExtractor::new().labeled_dataset(&training),
            Err(PredictionError::InvalidCell { row: 1, ref column, .. }) if column == AMOUNT_COLUMN
        ));
    }

    #[test]
    fn test_label_must_be_binary() {
        let table =
            Table::from_reader("TX_AMOUNT,TX_TIME_SECONDS,TX_FRAUD\n10,5,2\n".as_bytes()).unwrap();
        let err = FeatureExtractor::new().labeled_dataset(&table).unwrap_err();
        assert!(matches!(err, PredictionError::InvalidCell { ref column, .. } if column == LABEL_COLUMN));

        let unlabeled = Table::from_reader("TX_AMOUNT,TX_TIME_SECONDS\n10,5\n".as_bytes()).unwrap();
        match FeatureExtractor::new().labeled_dataset(&unlabeled) {
            Err(PredictionError::MissingColumns { columns }) => {
                assert_eq!(columns, vec![LABEL_COLUMN.to_string()])
            }
            other => panic!("expected missing label column, got {:?}", other),
        }
    }

    #[test]
    fn test_feature_count() {
        let extractor = FeatureExtractor::new();
        assert_eq!(extractor.feature_count(), 2);
        assert_eq!(extractor.feature_names(), vec!["TX_AMOUNT", "TX_TIME_SECONDS"]);
    }
}
