mod bootstrap;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use usage_core::settings::{Command, Settings};
use usage_core::time_utils::{convert_timestamp, CivilClock};
use usage_data::pipeline::{run_batch, run_convert, run_merge, OutputFile};
use usage_data::reader::expand_inputs;
use usage_runtime::loader::load_documents;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("Solar Usage v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Timezone: {}, Output: {}",
        settings.timezone,
        settings.output_dir.display()
    );

    let clock = CivilClock::from_name(&settings.timezone);

    match &settings.command {
        Command::BatchCsv {
            inputs,
            print_log,
            stdout,
        } => {
            let files = resolve_inputs(inputs)?;
            let documents = load_documents(&files).await?;
            let result = run_batch(documents, clock)?;

            if *print_log {
                eprintln!("{}", result.merged.log);
            }
            tracing::info!(
                "{} samples kept, {} normalUsage and {} reverseUsage records dropped",
                result.series.stats.kept,
                result.series.stats.normal_dropped,
                result.series.stats.reverse_dropped
            );
            emit(&settings.output_dir, &result.csv, *stdout).await?;
        }

        Command::Convert { input, stdout } => {
            let documents = load_documents(std::slice::from_ref(input)).await?;
            let Some(document) = documents.first() else {
                bail!("{} could not be read", input.display());
            };
            let output = run_convert(document, clock)?;
            emit(&settings.output_dir, &output, *stdout).await?;
        }

        Command::Merge { inputs } => {
            let files = resolve_inputs(inputs)?;
            let documents = load_documents(&files).await?;
            let (merged, outputs) = run_merge(documents)?;
            tracing::debug!("\n{}", merged.log);
            for output in &outputs {
                emit(&settings.output_dir, output, false).await?;
            }
        }

        Command::Timestamp { value } => {
            let conversion = convert_timestamp(value, &clock)?;
            println!("input:   {} ({})", conversion.original, conversion.original_display);
            println!("rounded: {} ({})", conversion.rounded, conversion.rounded_display);
        }
    }

    Ok(())
}

/// Expand directories and refuse an empty selection.
fn resolve_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let files = expand_inputs(inputs);
    if files.is_empty() {
        bail!("no JSON files found in the given inputs");
    }
    tracing::info!("{} input files selected", files.len());
    Ok(files)
}

/// Print `output` to stdout, or write it into `dir`.
async fn emit(dir: &Path, output: &OutputFile, to_stdout: bool) -> Result<()> {
    if to_stdout {
        print!("{}", output.contents);
        return Ok(());
    }
    let path = write_output(dir, output).await?;
    println!("{}", path.display());
    Ok(())
}

async fn write_output(dir: &Path, output: &OutputFile) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(&output.file_name);
    tokio::fs::write(&path, &output.contents)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    tracing::info!("Wrote {}", path.display());
    Ok(path)
}
