//! Compressed on-disk persistence for trained models
//!
//! A model file is a gzip stream holding one JSON document:
//! `{ "format": "fraud-forest", "version": 1, "features": [...], "model": {...} }`.
//! The header fields let `load` tell a damaged file apart from a file that
//! was never one of ours, and refuse models trained on another feature set.

use crate::error::{PredictionError, Result};
use crate::models::forest::{ModelParts, TrainedModel};
use crate::types::transaction::FEATURE_NAMES;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Read};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Format tag written into every model file
pub const MODEL_FORMAT: &str = "fraud-forest";

/// Current layout version
pub const MODEL_FORMAT_VERSION: u64 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    format: &'a str,
    version: u64,
    features: &'a [String],
    model: &'a TrainedModel,
}

#[derive(Deserialize)]
struct Envelope {
    model: ModelParts,
}

/// Saves and loads trained models as compressed blobs
#[derive(Debug, Clone)]
pub struct ModelStore {
    compression: Compression,
}

impl ModelStore {
    /// Create a store with the default gzip level
    pub fn new() -> Self {
        Self {
            compression: Compression::default(),
        }
    }

    /// Create a store with an explicit gzip level (0-9)
    pub fn with_compression_level(level: u32) -> Self {
        Self {
            compression: Compression::new(level.min(9)),
        }
    }

    /// Write `model` to `destination`.
    ///
    /// The blob is written to a temporary file beside the destination and
    /// renamed over it, so readers see either the old file or the complete
    /// new one.
    pub fn save<P: AsRef<Path>>(&self, model: &TrainedModel, destination: P) -> Result<()> {
        let path = destination.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| PredictionError::io(dir, e))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| PredictionError::io(dir, e))?;
        {
            let envelope = EnvelopeRef {
                format: MODEL_FORMAT,
                version: MODEL_FORMAT_VERSION,
                features: &model.metadata().feature_names,
                model,
            };
            let mut encoder = GzEncoder::new(BufWriter::new(&mut tmp), self.compression);
            serde_json::to_writer(&mut encoder, &envelope)
                .map_err(|e| PredictionError::io(path, e.into()))?;
            encoder
                .finish()
                .map_err(|e| PredictionError::io(path, e))?
                .into_inner()
                .map_err(|e| PredictionError::io(path, e.into_error()))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| PredictionError::io(path, e))?;
        let bytes = tmp.as_file().metadata().map(|m| m.len()).unwrap_or(0);

        tmp.persist(path)
            .map_err(|e| PredictionError::io(path, e.error))?;

        info!(
            path = %path.display(),
            model_id = %model.metadata().model_id,
            trees = model.forest().len(),
            bytes = bytes,
            "Model saved"
        );
        Ok(())
    }

    /// Read, decompress and validate a model file
    pub fn load<P: AsRef<Path>>(&self, source: P) -> Result<TrainedModel> {
        let path = source.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PredictionError::NotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(PredictionError::io(path, e)),
        };

        let mut json = Vec::new();
        GzDecoder::new(BufReader::new(file))
            .read_to_end(&mut json)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidData | ErrorKind::InvalidInput | ErrorKind::UnexpectedEof => {
                    corrupt(path, format!("decompression failed: {}", e))
                }
                _ => PredictionError::io(path, e),
            })?;
        if json.is_empty() {
            return Err(corrupt(path, "file holds no data"));
        }

        let value: Value = serde_json::from_slice(&json)
            .map_err(|e| corrupt(path, format!("content is not a readable model document: {}", e)))?;
        check_header(path, &value)?;

        let envelope: Envelope = serde_json::from_value(value)
            .map_err(|e| corrupt(path, format!("model structure is damaged: {}", e)))?;
        check_features(path, &envelope.model.metadata.feature_names)?;
        let model =
            TrainedModel::try_from(envelope.model).map_err(|reason| incompatible(path, reason))?;

        debug!(bytes = json.len(), "Model document decoded");
        info!(
            path = %path.display(),
            model_id = %model.metadata().model_id,
            trained_at = %model.metadata().trained_at,
            trees = model.forest().len(),
            "Model loaded"
        );
        Ok(model)
    }
}

impl Default for ModelStore {
    fn default() -> Self {
        Self::new()
    }
}

fn corrupt<R: Into<String>>(path: &Path, reason: R) -> PredictionError {
    PredictionError::CorruptModel {
        path: PathBuf::from(path),
        reason: reason.into(),
    }
}

fn incompatible<R: Into<String>>(path: &Path, reason: R) -> PredictionError {
    PredictionError::IncompatibleModel {
        path: PathBuf::from(path),
        reason: reason.into(),
    }
}

fn check_header(path: &Path, value: &Value) -> Result<()> {
    match value.get("format").and_then(Value::as_str) {
        Some(MODEL_FORMAT) => {}
        Some(other) => {
            return Err(incompatible(
                path,
                format!("format '{}' is not '{}'", other, MODEL_FORMAT),
            ))
        }
        None => return Err(incompatible(path, "document is not a fraud model")),
    }

    match value.get("version").and_then(Value::as_u64) {
        Some(MODEL_FORMAT_VERSION) => {}
        Some(other) => {
            return Err(incompatible(
                path,
                format!("unsupported format version {}", other),
            ))
        }
        None => return Err(incompatible(path, "missing format version")),
    }

    let features: Vec<String> = value
        .get("features")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(|n| n.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    check_features(path, &features)
}

fn check_features(path: &Path, features: &[String]) -> Result<()> {
    if features.iter().map(String::as_str).eq(FEATURE_NAMES) {
        Ok(())
    } else {
        Err(incompatible(
            path,
            format!(
                "model was trained on features [{}], expected [{}]",
                features.join(", "),
                FEATURE_NAMES.join(", ")
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::forest::ForestParams;
    use crate::types::transaction::{FeatureVector, LabeledDataset, Label};
    use serde_json::json;
    use std::io::Write;
    use tempfile::tempdir;

    fn model() -> TrainedModel {
        let mut ds = LabeledDataset::new();
        for i in 0..12 {
            ds.push(FeatureVector::new(10.0 + i as f64, 4000.0 - i as f64 * 3.3), Label::Legitimate);
            ds.push(FeatureVector::new(700.0 + i as f64 * 1.7, 15.0 + i as f64), Label::Fraud);
        }
        let params = ForestParams {
            n_trees: 9,
            ..ForestParams::default()
        };
        TrainedModel::fit(&ds, &params, 11).unwrap()
    }

    fn write_gzip(path: &Path, bytes: &[u8]) {
        let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap();
    }

    fn envelope_with(model: &TrainedModel, patch: impl FnOnce(&mut Value)) -> Vec<u8> {
        let mut value = json!({
            "format": MODEL_FORMAT,
            "version": MODEL_FORMAT_VERSION,
            "features": FEATURE_NAMES,
            "model": serde_json::to_value(model).unwrap(),
        });
        patch(&mut value);
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("model.json.gz");
        let store = ModelStore::new();
        let model = model();

        store.save(&model, &path).unwrap();
        let loaded = store.load(&path).unwrap();

        assert_eq!(loaded, model);
        for probe in [
            FeatureVector::new(9999.0, 1.0),
            FeatureVector::new(12.0, 3990.0),
            FeatureVector::new(705.5, 20.0),
        ] {
            assert_eq!(loaded.predict(&probe).unwrap(), model.predict(&probe).unwrap());
        }
    }

    #[test]
    fn test_save_leaves_only_the_model_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json.gz");
        let store = ModelStore::with_compression_level(9);

        store.save(&model(), &path).unwrap();
        store.save(&model(), &path).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap()).collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path(), path);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            ModelStore::new().load(dir.path().join("absent.gz")),
            Err(PredictionError::NotFound { .. })
        ));
    }

    #[test]
    fn test_unreadable_source_is_io_error() {
        let dir = tempdir().unwrap();
        let err = ModelStore::new().load(dir.path()).unwrap_err();

        assert!(matches!(err, PredictionError::Io { .. }), "unexpected error: {:?}", err);
        assert!(err.is_fatal());
    }

    #[test]
    fn test_not_gzip_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.gz");
        fs::write(&path, b"TX_AMOUNT,TX_TIME_SECONDS\n1,2\n").unwrap();

        assert!(matches!(
            ModelStore::new().load(&path),
            Err(PredictionError::CorruptModel { .. })
        ));
    }

    #[test]
    fn test_truncated_blob_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json.gz");
        ModelStore::new().save(&model(), &path).unwrap();

        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        assert!(matches!(
            ModelStore::new().load(&path),
            Err(PredictionError::CorruptModel { .. })
        ));
    }

    #[test]
    fn test_gzip_text_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.gz");
        write_gzip(&path, b"just some compressed notes");

        assert!(matches!(
            ModelStore::new().load(&path),
            Err(PredictionError::CorruptModel { .. })
        ));
    }

    #[test]
    fn test_foreign_json_is_incompatible() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("other.gz");
        write_gzip(&path, br#"{"weights": [0.1, 0.2], "bias": 0.5}"#);

        assert!(matches!(
            ModelStore::new().load(&path),
            Err(PredictionError::IncompatibleModel { .. })
        ));
    }

    #[test]
    fn test_header_mismatches_are_incompatible() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json.gz");
        let model = model();

        let patches: Vec<Box<dyn FnOnce(&mut Value)>> = vec![
            Box::new(|v| v["format"] = json!("isolation-forest")),
            Box::new(|v| v["version"] = json!(2)),
            Box::new(|v| v["features"] = json!(["TX_TIME_SECONDS", "TX_AMOUNT"])),
            Box::new(|v| v["model"]["forest"]["trees"] = json!([])),
        ];

        for patch in patches {
            write_gzip(&path, &envelope_with(&model, patch));
            match ModelStore::new().load(&path) {
                Err(PredictionError::IncompatibleModel { .. }) => {}
                other => panic!("expected incompatible model, got {:?}", other.map(|_| ())),
            }
        }
    }

    #[test]
    fn test_damaged_model_body_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json.gz");
        let bytes = envelope_with(&model(), |v| v["model"]["forest"] = json!("oops"));
        write_gzip(&path, &bytes);

        assert!(matches!(
            ModelStore::new().load(&path),
            Err(PredictionError::CorruptModel { .. })
        ));
    }
}
