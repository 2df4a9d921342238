//! PMML Predictor - command-line shell
//!
//! Loads a model file and scores a single record or a delimited batch.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pmml_predictor::{
    config::AppConfig, BatchPredictionError, DataType, RawValue, Session, SinglePredictionError,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "pmml-predictor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Score records against a PMML model", long_about = None)]
struct Cli {
    /// Configuration file (default: config/config.toml when present)
    #[arg(short, long, global = true, env = "PMML_PREDICTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show model details and its input/output fields
    Info {
        /// Model file
        model: PathBuf,
    },

    /// Score one record
    Predict {
        /// Model file
        model: PathBuf,

        /// Input value as name=value (repeatable)
        #[arg(short, long = "set", value_name = "NAME=VALUE")]
        values: Vec<String>,

        /// Declare an input's type as name=integer|float|string (repeatable)
        #[arg(short, long = "type", value_name = "NAME=TYPE")]
        types: Vec<String>,

        /// Print the prediction as JSON
        #[arg(long)]
        json: bool,
    },

    /// Score every row of a delimited file
    Batch {
        /// Model file
        model: PathBuf,

        /// Delimited input with a header row
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the result (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Declare an input's type as name=integer|float|string (repeatable)
        #[arg(short, long = "type", value_name = "NAME=TYPE")]
        types: Vec<String>,
    },

    /// Write a header-only batch file for the model's inputs
    Template {
        /// Model file
        model: PathBuf,

        /// Where to write the template (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    init_logging(&config, cli.json_logs)?;

    let mut session = Session::new(config);
    let result = run(&mut session, cli.command);
    session.metrics().print_summary();
    result
}

fn init_logging(config: &AppConfig, json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().or_else(|_| {
        tracing_subscriber::EnvFilter::try_new(format!("pmml_predictor={}", config.logging.level))
    })?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json || config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn run(session: &mut Session, command: Commands) -> Result<()> {
    match command {
        Commands::Info { model } => {
            load_model(session, &model)?;
            print_info(session);
        }
        Commands::Predict {
            model,
            values,
            types,
            json,
        } => {
            load_model(session, &model)?;
            declare_types(session, &types)?;
            let raw = values
                .iter()
                .map(|v| parse_assignment(v))
                .collect::<Result<Vec<_>>>()?;

            let row = match session.predict_one(&raw) {
                Ok(row) => row,
                Err(SinglePredictionError::Prediction(e)) => {
                    error!(error = %e.message, "Prediction failed");
                    eprintln!("{}", e.trace);
                    bail!(e);
                }
                Err(e) => bail!(e),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&row)?);
            } else {
                for (name, value) in row.iter() {
                    println!("{name}: {value}");
                }
            }
        }
        Commands::Batch {
            model,
            input,
            output,
            types,
        } => {
            load_model(session, &model)?;
            declare_types(session, &types)?;
            let text = fs::read_to_string(&input)
                .with_context(|| format!("Failed to read batch input {}", input.display()))?;
            let table = session.parse_table(&text)?;
            info!(rows = table.len(), columns = table.columns().len(), "Batch input loaded");

            let result = match session.predict_batch(&table) {
                Ok(result) => result,
                Err(e) => {
                    if let BatchPredictionError::Engine { trace, .. } = &e {
                        eprintln!("{trace}");
                    }
                    bail!(e);
                }
            };

            write_output(output.as_deref(), &session.export(&result)?)?;
        }
        Commands::Template { model, output } => {
            load_model(session, &model)?;
            let Some(template) = session.template() else {
                bail!("no model is loaded");
            };
            write_output(output.as_deref(), &template?)?;
        }
    }
    Ok(())
}

fn load_model(session: &mut Session, path: &Path) -> Result<()> {
    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read model file {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    session
        .load(&name, &bytes)
        .with_context(|| format!("Failed to load model {}", path.display()))?;
    Ok(())
}

fn declare_types(session: &mut Session, declarations: &[String]) -> Result<()> {
    for declaration in declarations {
        let Some((name, type_name)) = declaration.split_once('=') else {
            bail!("expected NAME=TYPE, got '{declaration}'");
        };
        let data_type = DataType::from_engine_name(type_name);
        if data_type == DataType::Unknown {
            bail!("unknown type '{type_name}'; use integer, float or string");
        }
        session
            .declare_type(name.trim(), data_type)
            .with_context(|| format!("Failed to declare type for '{}'", name.trim()))?;
    }
    Ok(())
}

fn parse_assignment(text: &str) -> Result<(String, RawValue)> {
    let Some((name, value)) = text.split_once('=') else {
        bail!("expected NAME=VALUE, got '{text}'");
    };
    Ok((name.trim().to_string(), RawValue::Text(value.to_string())))
}

fn write_output(path: Option<&Path>, text: &str) -> Result<()> {
    match path {
        Some(path) => {
            fs::write(path, text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Output written");
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn print_info(session: &Session) {
    let (Some(info), Some(schema)) = (session.model_info(), session.schema()) else {
        return;
    };

    println!("Model:       {}", info.name);
    println!("Kind:        {}", info.kind);
    if let Some(function) = &info.function {
        println!("Function:    {function}");
    }
    if let Some(description) = &info.description {
        println!("Description: {description}");
    }
    println!("Engine:      {}", info.engine);
    println!("Loaded at:   {}", info.loaded_at.format("%Y-%m-%d %H:%M:%S UTC"));

    println!();
    println!("Inputs ({}):", schema.inputs().len());
    for field in schema.inputs() {
        println!("  {:<24} {}", field.name(), field.data_type());
    }
    println!("Outputs ({}):", schema.outputs().len());
    for field in schema.outputs() {
        println!("  {:<24} {}", field.name(), field.data_type());
    }

    if let Some(incomplete) = schema.incomplete() {
        println!();
        println!("Warning: {incomplete}");
    }
    if schema.is_manual_entry() {
        let names = session.manual_entry().default_names(None);
        println!(
            "No declared inputs; pass values by name, e.g. --set {}=0",
            names[0]
        );
    }
}
