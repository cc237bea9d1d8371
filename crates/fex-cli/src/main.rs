use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use fex_engines::{AdaptOptions, InstructionsReport, LocalityOptions, RemoteSchemaStatus};

#[derive(Parser, Debug)]
#[command(
    name = "fex",
    version,
    about = "validate, adapt, submit and provision experiment descriptions"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct ExperimentInput {
    /// fetch the experiment (template) from an http or https URL
    #[arg(short = 'u', long, value_name = "URL")]
    experiment_url: Option<String>,
    /// read the experiment (template) from a local file
    #[arg(short = 'f', long, value_name = "FILE")]
    experiment_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// fill in template variables and validate the resulting experiment
    Parse {
        #[command(flatten)]
        input: ExperimentInput,
        /// write the resulting experiment to a file instead of stdout
        #[arg(short = 'o', long, value_name = "FILE")]
        output_file: Option<PathBuf>,
        /// read a JSON object with variable bindings from stdin instead of
        /// prompting interactively
        #[arg(short = 'n', long)]
        non_interactive: bool,
    },
    /// validate an experiment description against the built-in schemas
    Validate {
        #[command(flatten)]
        input: ExperimentInput,
    },
    /// rewrite input and result file connectors for a different data locality
    Adapt {
        #[command(flatten)]
        input: ExperimentInput,
        /// point input file connectors at the local file server
        #[arg(long)]
        use_local_input_files: bool,
        /// point result file connectors at the local file server
        #[arg(long)]
        use_local_result_files: bool,
        /// write the adapted experiment to a file instead of stdout
        #[arg(short = 'o', long, value_name = "FILE")]
        output_file: Option<PathBuf>,
        #[arg(short = 'n', long)]
        non_interactive: bool,
    },
    /// submit the experiment instructions to the configured execution engine
    Run {
        #[command(flatten)]
        input: ExperimentInput,
        #[arg(short = 'n', long)]
        non_interactive: bool,
    },
    /// generate files to set up the execution engine in a local virtual machine
    Vagrant {
        #[command(flatten)]
        input: ExperimentInput,
        /// save the generated files in this directory
        #[arg(short = 'o', long, value_name = "DIRECTORY")]
        output_directory: PathBuf,
        /// change remote input and result file references to local ones in
        /// the generated experiment document
        #[arg(short = 'l', long)]
        use_local_data: bool,
        #[arg(short = 'n', long)]
        non_interactive: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();
    let cli = Cli::parse();
    run_command(cli.command)
}

fn run_command(command: Commands) -> Result<()> {
    match command {
        Commands::Parse {
            input,
            output_file,
            non_interactive,
        } => {
            let template = load_input(&input)?;
            let root = resolve_template(&template, non_interactive)?;
            let (document, report) =
                fex_engines::validate(root).context("experiment format is invalid")?;
            warn_remote_schema(&report);
            let rendered = document.to_pretty_json()?;
            emit_document(&rendered, output_file.as_deref())?;
        }
        Commands::Validate { input } => {
            let raw = load_input(&input)?;
            let root: Value = serde_json::from_str(&raw)
                .map_err(|e| fex_core::Error::MalformedDocument(e.to_string()))
                .context("could not parse experiment file")?;
            let (_, report) =
                fex_engines::validate(root).context("experiment format is invalid")?;
            warn_remote_schema(&report);
            println!("ok");
        }
        Commands::Adapt {
            input,
            use_local_input_files,
            use_local_result_files,
            output_file,
            non_interactive,
        } => {
            let template = load_input(&input)?;
            let root = resolve_template(&template, non_interactive)?;
            let (document, report) =
                fex_engines::validate(root).context("experiment format is invalid")?;
            warn_remote_schema(&report);
            let engine = fex_engines::get_engine(&document)?;
            let adapted = engine
                .adapt(
                    &document,
                    &AdaptOptions {
                        use_local_input_files,
                        use_local_result_files,
                    },
                )
                .context("could not adapt experiment")?;
            let rendered = adapted.to_pretty_json()?;
            emit_document(&rendered, output_file.as_deref())?;
        }
        Commands::Run {
            input,
            non_interactive,
        } => {
            let template = load_input(&input)?;
            let root = resolve_template(&template, non_interactive)?;
            let (document, report) =
                fex_engines::validate(root).context("experiment format is invalid")?;
            warn_remote_schema(&report);
            let engine = fex_engines::get_engine(&document)?;
            let result = engine.run(&document).context("could not run experiment")?;
            println!("{}", serde_json::to_string_pretty(&result.response)?);
        }
        Commands::Vagrant {
            input,
            output_directory,
            use_local_data,
            non_interactive,
        } => {
            if output_directory.exists() && !output_directory.is_dir() {
                return Err(fex_core::Error::ResourceUnavailable(format!(
                    "output path exists but is not a directory: {}",
                    output_directory.display()
                ))
                .into());
            }
            let template = load_input(&input)?;
            let root = resolve_template(&template, non_interactive)?;
            let (document, report) =
                fex_engines::validate(root).context("experiment format is invalid")?;
            warn_remote_schema(&report);
            let engine = fex_engines::get_engine(&document)?;
            let bundle = engine
                .provision(
                    &document,
                    &output_directory,
                    &LocalityOptions { use_local_data },
                )
                .context("could not generate provisioning files")?;
            for file in &bundle.files {
                println!("wrote: {}", file.display());
            }
            println!("{}", bundle.runbook);
        }
    }
    Ok(())
}

fn load_input(input: &ExperimentInput) -> Result<String> {
    if let Some(path) = &input.experiment_file {
        fex_core::load_local(path).context("could not read experiment file")
    } else if let Some(url) = &input.experiment_url {
        fex_core::load_url(url).context("could not load experiment from URL")
    } else {
        Err(anyhow::anyhow!(
            "either --experiment-file or --experiment-url is required"
        ))
    }
}

fn resolve_template(template: &str, non_interactive: bool) -> Result<Value> {
    let variables = fex_template::find_variables(template);
    let bindings = if variables.is_empty() {
        BTreeMap::new()
    } else if non_interactive {
        let stdin = io::stdin();
        fex_template::bindings_from_json(&mut stdin.lock(), &variables)
            .context("could not read variable bindings from stdin")?
    } else {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        fex_template::bindings_from_prompts(&mut stdin.lock(), &mut stdout, &variables)
            .context("could not prompt for variable bindings")?
    };
    fex_template::parse_document(template, &bindings)
        .context("could not parse experiment template")
}

fn warn_remote_schema(report: &InstructionsReport) {
    if let RemoteSchemaStatus::Unavailable { reason } = &report.remote_schema {
        eprintln!(
            "WARNING: instructions were not validated against the remote schema: {}",
            reason
        );
    }
}

fn emit_document(rendered: &str, output_file: Option<&std::path::Path>) -> Result<()> {
    match output_file {
        Some(path) => {
            fex_core::write_text(path, &format!("{}\n", rendered))?;
            println!("wrote: {}", path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn input_sources_are_mutually_exclusive() {
        let err = Cli::try_parse_from([
            "fex",
            "validate",
            "-f",
            "experiment.json",
            "-u",
            "https://example.org/experiment.json",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn vagrant_requires_an_output_directory() {
        let err =
            Cli::try_parse_from(["fex", "vagrant", "-f", "experiment.json"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }
}
