//! Sample Batch Generator
//!
//! Writes random rows matching a model's declared inputs, for trying out
//! batch scoring.

use anyhow::{bail, Context, Result};
use clap::Parser;
use pmml_predictor::{config::AppConfig, table, DataType, FieldDescriptor, ModelLoader};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "sample-batch")]
#[command(about = "Generate a random batch file for a PMML model", long_about = None)]
struct Args {
    /// Model file
    model: PathBuf,

    /// Number of rows to generate
    #[arg(short = 'n', long, default_value = "100")]
    rows: usize,

    /// Candidate values for a string input, as name=a|b|c (repeatable)
    #[arg(long = "choices", value_name = "NAME=A|B|C")]
    choices: Vec<String>,

    /// Probability that a cell is left empty
    #[arg(long, default_value = "0.0")]
    missing_rate: f64,

    /// Seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,

    /// Where to write the batch (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Configuration file (default: config/config.toml when present)
    #[arg(short, long, env = "PMML_PREDICTOR_CONFIG")]
    config: Option<PathBuf>,
}

/// Random cell generator for one model's inputs
struct RowGenerator {
    rng: StdRng,
    choices: HashMap<String, Vec<String>>,
    missing_rate: f64,
}

impl RowGenerator {
    fn new(rng: StdRng, choices: HashMap<String, Vec<String>>, missing_rate: f64) -> Self {
        Self {
            rng,
            choices,
            missing_rate,
        }
    }

    fn generate(&mut self, fields: &[FieldDescriptor]) -> Vec<String> {
        fields.iter().map(|f| self.cell(f)).collect()
    }

    fn cell(&mut self, field: &FieldDescriptor) -> String {
        if self.missing_rate > 0.0 && self.rng.gen_bool(self.missing_rate) {
            return String::new();
        }

        match field.data_type() {
            DataType::Integer => self.rng.gen_range(0..100).to_string(),
            DataType::Float | DataType::Unknown => {
                format!("{:.2}", self.rng.gen_range(0.0..100.0))
            }
            DataType::String => match self.choices.get(field.name()) {
                Some(values) => values[self.rng.gen_range(0..values.len())].clone(),
                None => format!("{}_{}", field.name(), self.rng.gen_range(1..=5)),
            },
        }
    }
}

fn parse_choices(specs: &[String]) -> Result<HashMap<String, Vec<String>>> {
    let mut choices = HashMap::new();
    for entry in specs {
        let Some((name, values)) = entry.split_once('=') else {
            bail!("expected NAME=A|B|C, got '{entry}'");
        };
        let values: Vec<String> = values
            .split('|')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        if values.is_empty() {
            bail!("no values given for '{name}'");
        }
        choices.insert(name.trim().to_string(), values);
    }
    Ok(choices)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sample_batch=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if !(0.0..=1.0).contains(&args.missing_rate) {
        bail!("--missing-rate must be between 0 and 1");
    }
    let config = match &args.config {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };

    let bytes = std::fs::read(&args.model)
        .with_context(|| format!("Failed to read model file {}", args.model.display()))?;
    let handle = ModelLoader::new()
        .load(&args.model.display().to_string(), &bytes)
        .context("Failed to load model")?;

    let fields = handle.schema().inputs();
    if fields.is_empty() {
        bail!("model declares no inputs; nothing to generate");
    }

    let choices = parse_choices(&args.choices)?;
    for name in choices.keys() {
        if handle.schema().input(name).is_none() {
            warn!(field = %name, "Choices given for a field the model does not declare");
        }
    }

    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut generator = RowGenerator::new(rng, choices, args.missing_rate);

    let delimiter = config.table.delimiter;
    let Some(delimiter) = table::delimiter_byte(delimiter) else {
        bail!("configured delimiter {delimiter:?} cannot separate fields");
    };
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());

    writer.write_record(fields.iter().map(FieldDescriptor::name))?;
    for _ in 0..args.rows {
        writer.write_record(generator.generate(fields))?;
    }
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(rows = args.rows, path = %path.display(), "Sample batch written");
        }
        None => print!("{}", String::from_utf8(bytes)?),
    }

    Ok(())
}
