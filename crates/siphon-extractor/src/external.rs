//! External extractor programs (`exec:` entry points)
//!
//! A program is invoked once per call with one argument:
//!
//! - `describe`: print the [`ExtractorDescription`] as JSON on stdout
//! - `extract`: read a JSON array of inputs on stdin, print a JSON array
//!   of results (one per input, same shapes as the worker protocol)
//!
//! A non-zero exit fails every input of that call.

use crate::error::ExtractorError;
use crate::protocol::{WireError, WireInput, WireResult};
use siphon_domain::{Content, Extracted, ExtractionError, ExtractionInput, Extractor, ExtractorDescription};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Extractor backed by an external program
#[derive(Debug, Clone)]
pub struct ExecExtractor {
    program: PathBuf,
    description: ExtractorDescription,
}

impl ExecExtractor {
    /// Start `program describe` and keep its description
    ///
    /// The catalog name overrides whatever name the program reports.
    pub fn load(name: &str, program: &Path) -> Result<Self, ExtractorError> {
        let output = Command::new(program)
            .arg("describe")
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()?;
        if !output.status.success() {
            return Err(ExtractorError::Catalog(format!(
                "{} describe exited with {}",
                program.display(),
                output.status
            )));
        }
        let mut description: ExtractorDescription = serde_json::from_slice(&output.stdout)?;
        description.name = name.to_string();
        debug!(extractor = name, program = %program.display(), "Loaded external extractor");

        Ok(Self {
            program: program.to_path_buf(),
            description,
        })
    }

    fn run_extract(&self, inputs: &[ExtractionInput]) -> Result<Vec<WireResult>, ExtractionError> {
        let failed = |msg: String| ExtractionError::Failed(format!("{}: {msg}", self.program.display()));

        let payload: Vec<WireInput> = inputs.iter().cloned().map(Into::into).collect();
        let payload = serde_json::to_vec(&payload).map_err(|e| failed(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .arg("extract")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| failed(e.to_string()))?;

        // Feed stdin from its own thread while stdout drains, so a program
        // that writes before it has read everything cannot fill both pipes
        let stdin = child.stdin.take();
        let (written, output) = std::thread::scope(|scope| {
            let writer = scope.spawn(move || match stdin {
                Some(mut stdin) => stdin.write_all(&payload),
                None => Ok(()),
            });
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
            (written, output)
        });
        let output = output.map_err(|e| failed(e.to_string()))?;
        if !output.status.success() {
            return Err(failed(format!("exited with {}", output.status)));
        }
        written.map_err(|e| failed(format!("writing input: {e}")))?;

        let results: Vec<WireResult> = serde_json::from_slice(&output.stdout).map_err(|e| failed(e.to_string()))?;
        if results.len() != inputs.len() {
            return Err(failed(format!(
                "returned {} results for {} inputs",
                results.len(),
                inputs.len()
            )));
        }
        Ok(results)
    }
}

fn to_extraction_result(result: WireResult) -> Result<Vec<Extracted>, ExtractionError> {
    match result {
        WireResult::Ok { outputs } => Ok(outputs.into_iter().map(Into::into).collect()),
        WireResult::Error { error } => Err(match error {
            WireError::InvalidParams(m) => ExtractionError::InvalidParams(m),
            WireError::UnsupportedInput(m) => ExtractionError::UnsupportedInput(m),
            WireError::Failed(m)
            | WireError::Panicked(m)
            | WireError::UnknownExtractor(m)
            | WireError::Other(m) => ExtractionError::Failed(m),
        }),
    }
}

impl Extractor for ExecExtractor {
    fn description(&self) -> ExtractorDescription {
        self.description.clone()
    }

    fn sample_input(&self) -> ExtractionInput {
        ExtractionInput::new(Content::from_text(""), None)
    }

    fn extract(&self, content: &Content, params: Option<&str>) -> Result<Vec<Extracted>, ExtractionError> {
        let input = ExtractionInput::new(content.clone(), params.map(str::to_string));
        self.extract_batch(std::slice::from_ref(&input))
            .pop()
            .unwrap_or_else(|| Err(ExtractionError::Failed("no result".to_string())))
    }

    fn extract_batch(&self, inputs: &[ExtractionInput]) -> Vec<Result<Vec<Extracted>, ExtractionError>> {
        match self.run_extract(inputs) {
            Ok(results) => results.into_iter().map(to_extraction_result).collect(),
            Err(e) => inputs.iter().map(|_| Err(e.clone())).collect(),
        }
    }

    fn describe(&self) -> Result<ExtractorDescription, ExtractionError> {
        // Schemas come from the program itself
        Ok(self.description.clone())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("extractor.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    const DESCRIBE: &str = r#"{"name":"ext","version":"1.0.0","description":"external","input_mime_types":["text/plain"]}"#;

    #[test]
    fn test_load_and_extract() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(
            dir.path(),
            &format!(
                r#"case "$1" in
  describe) echo '{DESCRIBE}' ;;
  extract) cat > /dev/null; echo '[{{"status":"ok","outputs":[{{"type":"feature","feature_type":"metadata","name":"m","data":1}}]}},{{"status":"error","error":{{"kind":"invalid_params","message":"no"}}}}]' ;;
esac"#
            ),
        );

        let extractor = ExecExtractor::load("renamed", &program).unwrap();
        assert_eq!(extractor.description().name, "renamed");

        let inputs = vec![
            ExtractionInput::new(Content::from_text("a"), None),
            ExtractionInput::new(Content::from_text("b"), Some("{}".to_string())),
        ];
        let results = extractor.extract_batch(&inputs);
        assert_eq!(results[0].as_ref().unwrap().len(), 1);
        assert!(matches!(results[1], Err(ExtractionError::InvalidParams(_))));
    }

    #[test]
    fn test_non_zero_exit_fails_every_input() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(
            dir.path(),
            &format!(
                r#"case "$1" in
  describe) echo '{DESCRIBE}' ;;
  extract) cat > /dev/null; exit 3 ;;
esac"#
            ),
        );

        let extractor = ExecExtractor::load("ext", &program).unwrap();
        let inputs = vec![
            ExtractionInput::new(Content::from_text("a"), None),
            ExtractionInput::new(Content::from_text("b"), None),
        ];
        let results = extractor.extract_batch(&inputs);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| matches!(r, Err(ExtractionError::Failed(_)))));
    }

    #[test]
    fn test_large_input_to_streaming_program() {
        let dir = tempfile::tempdir().unwrap();
        // Echoes its input straight back, far more than a pipe buffer holds
        let program = script(
            dir.path(),
            &format!(
                r#"case "$1" in
  describe) echo '{DESCRIBE}' ;;
  extract) cat ;;
esac"#
            ),
        );
        let extractor = ExecExtractor::load("ext", &program).unwrap();
        let inputs = vec![ExtractionInput::new(Content::new("application/octet-stream", vec![7u8; 2 * 1024 * 1024]), None)];

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(extractor.extract_batch(&inputs));
        });
        let results = rx
            .recv_timeout(std::time::Duration::from_secs(30))
            .expect("extract_batch did not return");

        // The echoed inputs are not results, but the call completes
        assert_eq!(results.len(), 1);
        assert!(matches!(&results[0], Err(ExtractionError::Failed(_))));
    }
}
