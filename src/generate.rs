use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::catalog::{Catalog, CatalogError, Resolved, VoiceSettings, preview};
use crate::synth::{AudioStream, SpeechSynthesizer, SynthesisError, SynthesisRequest};

const BANNER_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("synthesis failed for scenario '{scenario}'")]
    Synthesis {
        scenario: String,
        #[source]
        source: SynthesisError,
    },
    #[error("failed writing {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(
        "audio saved to {} but metadata could not be written to {}",
        .audio.display(),
        .path.display()
    )]
    Metadata {
        audio: PathBuf,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFiles {
    pub audio_path: PathBuf,
    pub metadata_path: PathBuf,
    pub bytes_written: u64,
}

/// Sidecar description of one generated audio file.
#[derive(Debug, Serialize)]
pub struct MetadataRecord<'a> {
    pub scenario_name: &'a str,
    pub preset: &'a str,
    pub voice_settings: VoiceSettings,
    pub model: &'a str,
    pub voice_id: &'a str,
    pub voice_name: &'a str,
    pub manipulation_target: &'a str,
    pub variant_type: &'a str,
    pub text: &'a str,
    pub output_file: String,
}

impl<'a> MetadataRecord<'a> {
    pub fn new(resolved: &Resolved<'a>, audio_path: &Path) -> Self {
        let Resolved { scenario, preset } = *resolved;
        Self {
            scenario_name: scenario.name,
            preset: preset.name,
            voice_settings: preset.settings,
            model: preset.model_id,
            voice_id: preset.voice_id,
            voice_name: preset.voice_name,
            manipulation_target: scenario.manipulation_target,
            variant_type: scenario.variant_type,
            text: scenario.text,
            output_file: audio_path.display().to_string(),
        }
    }
}

pub fn audio_path(output_dir: &Path, scenario_name: &str) -> PathBuf {
    output_dir.join(format!("{scenario_name}.mp3"))
}

pub fn metadata_path(output_dir: &Path, scenario_name: &str) -> PathBuf {
    output_dir.join(format!("{scenario_name}_metadata.json"))
}

/// Synthesizes one scenario and writes its audio and metadata into `output_dir`.
///
/// The scenario and its preset are resolved before anything touches the
/// filesystem or the network, so an unknown name leaves no trace.
pub fn generate_scenario(
    catalog: &Catalog<'_>,
    synthesizer: &dyn SpeechSynthesizer,
    output_dir: &Path,
    scenario_name: &str,
) -> Result<GeneratedFiles, GenerateError> {
    let resolved = catalog.resolve(scenario_name)?;
    let Resolved { scenario, preset } = resolved;
    let settings = &preset.settings;

    tracing::info!(
        scenario = scenario.name,
        preset = preset.name,
        model = preset.model_id,
        voice = preset.voice_name,
        voice_id = preset.voice_id,
        manipulation_target = scenario.manipulation_target,
        variant_type = scenario.variant_type,
        "generating scenario"
    );
    tracing::info!(
        stability = settings.stability,
        similarity_boost = settings.similarity_boost,
        style = settings.style,
        use_speaker_boost = settings.use_speaker_boost,
        speed = settings.speed,
        text = %format!("{}...", preview(scenario.text, BANNER_PREVIEW_CHARS)),
        "voice settings"
    );

    fs::create_dir_all(output_dir).map_err(|source| GenerateError::Io {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let request = SynthesisRequest {
        text: scenario.text,
        voice_id: preset.voice_id,
        model_id: preset.model_id,
        voice_settings: preset.settings,
    };
    let stream = synthesizer
        .synthesize(&request)
        .map_err(|source| GenerateError::Synthesis {
            scenario: scenario.name.to_string(),
            source,
        })?;

    let audio_path = audio_path(output_dir, scenario.name);
    let bytes_written = write_audio(&audio_path, stream, scenario.name)?;
    tracing::info!(
        path = %audio_path.display(),
        bytes = bytes_written,
        synthesizer = synthesizer.name(),
        "audio saved"
    );

    let metadata_path = metadata_path(output_dir, scenario.name);
    write_metadata(&metadata_path, &MetadataRecord::new(&resolved, &audio_path)).map_err(
        |source| GenerateError::Metadata {
            audio: audio_path.clone(),
            path: metadata_path.clone(),
            source,
        },
    )?;
    tracing::info!(path = %metadata_path.display(), "metadata saved");

    Ok(GeneratedFiles {
        audio_path,
        metadata_path,
        bytes_written,
    })
}

/// Streams every chunk into `dest`, going through a `.part` file that is
/// renamed on success and removed on failure.
fn write_audio(dest: &Path, stream: AudioStream, scenario: &str) -> Result<u64, GenerateError> {
    let temp_path = dest.with_extension("mp3.part");
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| GenerateError::Io { path, source }
    };

    let result = (|| -> Result<u64, GenerateError> {
        let file = File::create(&temp_path).map_err(io_err(&temp_path))?;
        let mut writer = BufWriter::new(file);
        let mut written = 0u64;
        for chunk in stream {
            let chunk = chunk.map_err(|source| GenerateError::Synthesis {
                scenario: scenario.to_string(),
                source,
            })?;
            writer.write_all(&chunk).map_err(io_err(&temp_path))?;
            written += chunk.len() as u64;
        }
        let file = writer
            .into_inner()
            .map_err(|err| GenerateError::Io {
                path: temp_path.clone(),
                source: err.into_error(),
            })?;
        file.sync_all().map_err(io_err(&temp_path))?;
        drop(file);

        fs::rename(&temp_path, dest).map_err(io_err(dest))?;
        Ok(written)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

pub fn write_metadata(path: &Path, record: &MetadataRecord<'_>) -> io::Result<()> {
    let json = serde_json::to_string_pretty(record)?;
    fs::write(path, json)
}

#[derive(Debug)]
pub enum Outcome {
    Generated(GeneratedFiles),
    Failed { message: String },
}

#[derive(Debug)]
pub struct ScenarioReport {
    pub scenario: String,
    pub outcome: Outcome,
}

/// Per-scenario results of a batch run, in table order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub entries: Vec<ScenarioReport>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, Outcome::Generated(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.succeeded()
    }
}

/// Generates every scenario in table order. A failure is logged and recorded,
/// and the batch moves on to the next scenario.
pub fn generate_all(
    catalog: &Catalog<'_>,
    synthesizer: &dyn SpeechSynthesizer,
    output_dir: &Path,
) -> BatchReport {
    let total = catalog.scenarios().len();
    tracing::info!(total, "generating all scenarios");

    let mut report = BatchReport::default();
    for scenario in catalog.scenarios() {
        let outcome = match generate_scenario(catalog, synthesizer, output_dir, scenario.name) {
            Ok(files) => Outcome::Generated(files),
            Err(err) => {
                let message = format!("{:#}", anyhow::Error::new(err));
                tracing::error!(scenario = scenario.name, error = %message, "scenario failed");
                Outcome::Failed { message }
            }
        };
        report.entries.push(ScenarioReport {
            scenario: scenario.name.to_string(),
            outcome,
        });
    }

    tracing::info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        "batch complete"
    );
    report
}
