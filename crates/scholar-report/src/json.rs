//! JSON manifest generation.
//!
//! [`JsonGenerator`] serializes a [`RunExport`] without its binary payloads.
//! The manifest names each module's artifact files instead.
//!
//! # Example
//!
//! ```rust
//! use scholar_orchestrator::{GenerationMode, PipelineState, Topic};
//! use scholar_report::{json::JsonGenerator, RunExport};
//!
//! let state = PipelineState::new("run-1", Topic::new("Tides").unwrap(), GenerationMode::Single);
//! let export = RunExport::from_state(&state);
//! let generator = JsonGenerator::new(&export);
//!
//! let compact = generator.generate().unwrap();
//! assert!(!compact.contains('\n'));
//! ```

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::{ReportError, Result, RunExport};

/// JSON manifest generator.
pub struct JsonGenerator<'a> {
    export: &'a RunExport,
}

impl<'a> JsonGenerator<'a> {
    /// Creates a new JSON generator for the given export.
    #[must_use]
    pub const fn new(export: &'a RunExport) -> Self {
        Self { export }
    }

    /// Generates compact JSON output.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    pub fn generate(&self) -> Result<String> {
        serde_json::to_string(self.export).map_err(ReportError::from)
    }

    /// Generates pretty-printed JSON output with indentation.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    pub fn generate_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self.export).map_err(ReportError::from)
    }

    /// Writes the manifest to a file, creating or overwriting it.
    ///
    /// Parent directories must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    /// Returns [`ReportError::Io`] if file creation or writing fails.
    pub fn write_to_file(&self, path: &Path, pretty: bool) -> Result<()> {
        let json = if pretty {
            self.generate_pretty()?
        } else {
            self.generate()?
        };

        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::test_support::{completed_state, failed_state};

    #[test]
    fn test_generate_compact_json() {
        let export = RunExport::from_state(&completed_state());
        let json = JsonGenerator::new(&export).generate().unwrap();

        assert!(!json.contains('\n'));
        assert!(json.contains(r#""status":"completed""#));
        assert!(json.contains(r#""mode":"multi""#));
        assert!(json.contains(r#""moduleTitle":"Sunlight Kitchen""#));
    }

    #[test]
    fn test_generate_pretty_json() {
        let export = RunExport::from_state(&completed_state());
        let json = JsonGenerator::new(&export).generate_pretty().unwrap();

        assert!(json.contains('\n'));
        assert!(json.contains("  \"runId\""));
    }

    #[test]
    fn test_failed_run_includes_failure_and_partial_module() {
        let export = RunExport::from_state(&failed_state());
        let value: serde_json::Value =
            serde_json::from_str(&JsonGenerator::new(&export).generate().unwrap()).unwrap();

        assert_eq!(value["summary"]["status"], "failed");
        assert_eq!(value["failure"]["step"], "image");
        assert_eq!(value["failure"]["moduleIndex"], 1);
        assert_eq!(value["failedModule"]["moduleTitle"], "Day and Night Shifts");
        assert!(value["failedModule"].get("script").is_none());
    }

    #[test]
    fn test_completed_run_omits_failure_fields() {
        let export = RunExport::from_state(&completed_state());
        let value: serde_json::Value =
            serde_json::from_str(&JsonGenerator::new(&export).generate().unwrap()).unwrap();

        assert!(value.get("failure").is_none());
        assert!(value.get("failedModule").is_none());
        assert_eq!(value["modules"][1]["files"]["audio"], "module-02.wav");
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let export = RunExport::from_state(&completed_state());

        JsonGenerator::new(&export)
            .write_to_file(&path, false)
            .expect("manifest should be written");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.ends_with('\n'));
        let back: RunExport = serde_json::from_str(&contents).unwrap();
        assert_eq!(back.run_id, "run-1");
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("manifest.json");
        let export = RunExport::from_state(&completed_state());

        let err = JsonGenerator::new(&export)
            .write_to_file(&path, true)
            .unwrap_err();
        assert!(matches!(err, ReportError::Io(_)));
    }
}
