//! Extract command implementation.

use crate::cli::ExtractArgs;
use crate::commands::load_registry;
use crate::error::{CliError, Result};
use crate::output::Formatter;
use siphon_domain::Content;
use siphon_extractor::{ExtractionExecutor, InlineExecutor};
use std::fs;

const DEFAULT_FILE_MIME: &str = "application/octet-stream";

/// Execute the extract command.
pub async fn execute_extract(args: ExtractArgs, formatter: &Formatter) -> Result<()> {
    let content = input_content(&args)?;
    if let Some(params) = &args.params {
        serde_json::from_str::<serde_json::Value>(params)
            .map_err(|e| CliError::InvalidInput(format!("--params is not valid JSON: {e}")))?;
    }

    let (_, registry) = load_registry(args.catalog.catalog.as_deref())?;
    let executor = InlineExecutor::new(registry);

    let outputs = executor.extract_one(&args.extractor, content, args.params).await?;
    println!("{}", formatter.format_outputs(outputs)?);
    Ok(())
}

fn input_content(args: &ExtractArgs) -> Result<Content> {
    match (&args.text, &args.file) {
        (Some(text), None) => {
            let content = Content::from_text(text.clone());
            Ok(match &args.mime {
                Some(mime) => Content::new(mime.clone(), content.data),
                None => content,
            })
        }
        (None, Some(path)) => {
            let data = fs::read(path)?;
            let mime = args.mime.clone().unwrap_or_else(|| DEFAULT_FILE_MIME.to_string());
            Ok(Content::new(mime, data))
        }
        _ => Err(CliError::InvalidInput(
            "Must specify exactly one of --text or --file".to_string(),
        )),
    }
}
