mod catalog;
mod config;
mod generate;
mod logging;
mod synth;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Write};
use std::path::Path;

use catalog::{Catalog, pause_markers, preview};
use config::Settings;
use generate::{BatchReport, Outcome, generate_all, generate_scenario};
use synth::{ElevenLabsClient, SpeechSynthesizer};

const BIN_NAME: &str = "scenario-tts";
const LIST_PREVIEW_CHARS: usize = 80;
const RULE_WIDTH: usize = 60;

#[derive(Debug, Parser)]
#[command(name = BIN_NAME, version)]
#[command(about = "Generate ElevenLabs speech and metadata for the built-in banking scenarios")]
struct Cli {
    #[arg(
        value_name = "COMMAND",
        help = "`list`, `all`, or the name of a single scenario to generate"
    )]
    command: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Usage,
    List,
    All,
    Generate(String),
}

impl Command {
    fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            None => Self::Usage,
            Some("list") => Self::List,
            Some("all") => Self::All,
            Some(name) => Self::Generate(name.to_string()),
        }
    }
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    logging::init();
    let cli = Cli::parse();

    // Nothing else runs without a credential.
    let settings = Settings::from_env()?;
    tracing::debug!(?settings, "loaded settings");

    let catalog = Catalog::builtin();
    catalog
        .validate()
        .context("built-in scenario catalog is inconsistent")?;

    let client = ElevenLabsClient::new(&settings)?;
    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    run(
        Command::from_arg(cli.command.as_deref()),
        &catalog,
        &client,
        &settings.output_dir,
        &mut stdout,
    )
}

fn run<W: Write>(
    command: Command,
    catalog: &Catalog<'_>,
    synthesizer: &dyn SpeechSynthesizer,
    output_dir: &Path,
    out: &mut W,
) -> Result<()> {
    match command {
        Command::Usage => {
            print_usage(catalog, out)?;
            list_scenarios(catalog, out)?;
        }
        Command::List => list_scenarios(catalog, out)?,
        Command::All => {
            print_heading(out, "GENERATING ALL SCENARIOS")?;
            writeln!(out, "Total scenarios: {}", catalog.scenarios().len())?;
            let report = generate_all(catalog, synthesizer, output_dir);
            print_report(&report, output_dir, out)?;
        }
        Command::Generate(name) => {
            let files = generate_scenario(catalog, synthesizer, output_dir, &name)
                .with_context(|| format!("failed to generate {name}"))?;
            writeln!(out, "Audio saved to: {}", files.audio_path.display())?;
            writeln!(out, "Metadata saved to: {}", files.metadata_path.display())?;
        }
    }
    out.flush()?;
    Ok(())
}

fn print_heading<W: Write>(out: &mut W, title: &str) -> io::Result<()> {
    let rule = "=".repeat(RULE_WIDTH);
    writeln!(out, "\n{rule}\n{title}\n{rule}")
}

fn print_usage<W: Write>(catalog: &Catalog<'_>, out: &mut W) -> io::Result<()> {
    print_heading(out, "ELEVENLABS TTS AUDIO GENERATOR")?;
    writeln!(out, "\nUsage:")?;
    writeln!(out, "  {BIN_NAME} list               # List all scenarios")?;
    writeln!(out, "  {BIN_NAME} all                # Generate all scenarios")?;
    writeln!(out, "  {BIN_NAME} <scenario_name>    # Generate specific scenario")?;
    writeln!(out, "\nExamples:")?;
    for scenario in catalog.scenarios().iter().take(2) {
        writeln!(out, "  {BIN_NAME} {}", scenario.name)?;
    }
    writeln!(out, "\nPresets:")?;
    for preset in catalog.presets() {
        writeln!(
            out,
            "  {:<14} {} ({}, {})",
            preset.name, preset.voice_name, preset.model_id, preset.voice_id
        )?;
    }
    writeln!(out, "\nFirst time setup:")?;
    writeln!(out, "  1. Create a .env file with: {}=your_key_here", config::API_KEY_VAR)?;
    writeln!(out, "  2. Run: {BIN_NAME} list")
}

fn list_scenarios<W: Write>(catalog: &Catalog<'_>, out: &mut W) -> io::Result<()> {
    print_heading(out, "AVAILABLE SCENARIOS")?;
    for scenario in catalog.scenarios() {
        writeln!(out, "\n{}:", scenario.name)?;
        writeln!(out, "  Preset: {}", scenario.preset_name)?;
        writeln!(out, "  Manipulation: {}", scenario.manipulation_target)?;
        writeln!(out, "  Type: {}", scenario.variant_type)?;
        writeln!(out, "  Pauses: {}", pause_markers(scenario.text).len())?;
        writeln!(
            out,
            "  Text preview: {}...",
            preview(scenario.text, LIST_PREVIEW_CHARS)
        )?;
    }
    Ok(())
}

fn print_report<W: Write>(report: &BatchReport, output_dir: &Path, out: &mut W) -> io::Result<()> {
    writeln!(out)?;
    for entry in &report.entries {
        match &entry.outcome {
            Outcome::Generated(files) => {
                writeln!(out, "ok     {} -> {}", entry.scenario, files.audio_path.display())?
            }
            Outcome::Failed { message } => {
                writeln!(out, "failed {}: {message}", entry.scenario)?
            }
        }
    }
    print_heading(out, "GENERATION COMPLETE")?;
    writeln!(
        out,
        "Generated: {}  Failed: {}",
        report.succeeded(),
        report.failed()
    )?;
    writeln!(out, "Output directory: {}", output_dir.display())
}
