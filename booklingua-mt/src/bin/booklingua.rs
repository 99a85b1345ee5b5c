use booklingua::{CacheStore, ChapterSelection, DocumentAdapter, MarkdownDocument, Phase};
use booklingua_mt::{
    ChatCompletionsProvider, DEFAULT_CONTEXT_SIZE, DEFAULT_MAX_CHUNK_CHARS, MachineTranslator,
    MockMode, MockTranslator, Orchestrator, PipelineSettings, Preset, ProviderConfig,
    ProviderOverrides, RetryPolicy, RunSummary,
};
use clap::{Args, Parser};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Translate a book chapter by chapter through a chat-completions model.
///
/// Every result is cached next to the input, so an interrupted run resumes
/// where it stopped.
#[derive(Parser, Debug)]
#[command(name = "booklingua", version, about)]
struct Cli {
    /// Input document (Markdown)
    input: PathBuf,

    /// Split the document into units
    #[arg(long)]
    extract: bool,
    /// Translate extracted units
    #[arg(long)]
    translate: bool,
    /// Proofread translated units
    #[arg(long)]
    proofread: bool,
    /// Write the translated document
    #[arg(long)]
    build: bool,
    /// Run every phase, proofreading included
    #[arg(long)]
    all: bool,

    #[arg(short, long, default_value = "English")]
    source_lang: String,
    #[arg(short, long, default_value = "Romanian")]
    target_lang: String,
    /// Units to process, e.g. "1,3-5" (default: all)
    #[arg(short, long)]
    chapters: Option<String>,
    /// Minimum seconds between service calls
    #[arg(long, default_value_t = 0.0)]
    throttle: f64,
    /// Start a new edition: translate again, ignoring cached results
    #[arg(long)]
    new_edition: bool,

    #[command(flatten)]
    preset: PresetFlags,
    /// Endpoint base URL, overriding the preset
    #[arg(short = 'u', long)]
    base_url: Option<String>,
    /// Model name; "provider@model" routes through OpenRouter
    #[arg(short, long)]
    model: Option<String>,
    /// API key (default: the preset's environment variable)
    #[arg(short = 'k', long)]
    api_key: Option<String>,
    #[arg(long)]
    temperature: Option<f32>,
    #[arg(long)]
    max_tokens: Option<u32>,
    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Cache store directory (default: <input stem>.lingua)
    #[arg(long)]
    store: Option<PathBuf>,
    /// Output document (default: <input stem>_<target>.<ext>)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Maximum chunk size in characters
    #[arg(long, default_value_t = DEFAULT_MAX_CHUNK_CHARS)]
    max_chunk: usize,
    /// Context exchanges kept per chapter
    #[arg(long, default_value_t = DEFAULT_CONTEXT_SIZE)]
    context_size: usize,
    /// Attempts per service call, the first included
    #[arg(long, default_value_t = 5)]
    retries: u32,

    /// Export the cache as JSON Lines after the run
    #[arg(long, value_name = "FILE")]
    export: Option<PathBuf>,
    /// Import cache entries from JSON Lines before the run
    #[arg(long, value_name = "FILE")]
    import: Option<PathBuf>,

    /// Use the offline mock translator
    #[arg(long)]
    mock: bool,
    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Provider presets, at most one
#[derive(Args, Debug, Default)]
#[group(multiple = false)]
struct PresetFlags {
    #[arg(long)]
    openai: bool,
    #[arg(long)]
    ollama: bool,
    #[arg(long)]
    mistral: bool,
    #[arg(long)]
    deepseek: bool,
    #[arg(long)]
    lmstudio: bool,
    #[arg(long)]
    together: bool,
    #[arg(long)]
    openrouter: bool,
}

impl PresetFlags {
    fn preset(&self) -> Preset {
        let flags = [
            (self.openai, Preset::OpenAi),
            (self.ollama, Preset::Ollama),
            (self.mistral, Preset::Mistral),
            (self.deepseek, Preset::DeepSeek),
            (self.lmstudio, Preset::LmStudio),
            (self.together, Preset::Together),
            (self.openrouter, Preset::OpenRouter),
        ];
        flags
            .into_iter()
            .find(|(set, _)| *set)
            .map(|(_, preset)| preset)
            .unwrap_or_default()
    }
}

impl Cli {
    /// Phases to run, in pipeline order
    ///
    /// Without phase flags the default is extract, translate and build,
    /// unless the run only imports or exports.
    fn phases(&self) -> Vec<Phase> {
        if self.all {
            return Phase::ALL.to_vec();
        }
        let requested: Vec<Phase> = [
            (self.extract, Phase::Extract),
            (self.translate, Phase::Translate),
            (self.proofread, Phase::Proofread),
            (self.build, Phase::Build),
        ]
        .into_iter()
        .filter(|(set, _)| *set)
        .map(|(_, phase)| phase)
        .collect();

        if requested.is_empty() && self.export.is_none() && self.import.is_none() {
            vec![Phase::Extract, Phase::Translate, Phase::Build]
        } else {
            requested
        }
    }

    fn settings(&self) -> Result<PipelineSettings, Box<dyn std::error::Error>> {
        let mut settings = PipelineSettings::new(&self.source_lang, &self.target_lang);
        if let Some(chapters) = &self.chapters {
            settings.selection = ChapterSelection::parse(chapters)?;
        }
        settings.throttle = Duration::try_from_secs_f64(self.throttle)
            .map_err(|_| format!("invalid throttle interval: {}", self.throttle))?;
        settings.new_edition = self.new_edition;
        settings.max_chunk_chars = self.max_chunk;
        settings.context_size = self.context_size;
        settings.retry = RetryPolicy {
            max_attempts: self.retries,
            ..RetryPolicy::default()
        };
        if let Some(max_tokens) = self.max_tokens {
            settings.context_word_budget = max_tokens as usize / 8;
        }
        settings.validate()?;
        Ok(settings)
    }

    fn translator(&self) -> Result<Arc<dyn MachineTranslator>, Box<dyn std::error::Error>> {
        if self.mock {
            return Ok(Arc::new(MockTranslator::new(MockMode::Suffix)));
        }
        let overrides = ProviderOverrides {
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: self.timeout.map(Duration::from_secs),
        };
        let config = ProviderConfig::resolve(self.preset.preset(), overrides)?;
        Ok(Arc::new(ChatCompletionsProvider::new(config)?))
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_summary(summary: &RunSummary) {
    println!();
    for report in &summary.reports {
        let icon = if report.failed.is_empty() { "✅" } else { "⚠️" };
        println!("{} {}", icon, report);
        for (index, error) in &report.failed {
            println!("   ❌ unit {}: {}", index, error);
        }
        if !report.skipped.is_empty() && report.phase == Phase::Build {
            println!("   ⏭️  not ready: {:?}", report.skipped);
        }
    }
    if let Some(output) = &summary.output {
        println!("📄 Output: {}", output.display());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Configuration errors surface here, before any phase runs
    let settings = cli.settings()?;
    let translator = cli.translator()?;
    let adapter = Arc::new(MarkdownDocument);

    let store_path = cli
        .store
        .clone()
        .unwrap_or_else(|| CacheStore::default_path(&cli.input));
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| adapter.output_path(&cli.input, &settings.target_lang));

    let lock_timeout = settings.lock_timeout;
    let store =
        tokio::task::spawn_blocking(move || CacheStore::open(store_path, lock_timeout)).await??;

    if let Some(path) = &cli.import {
        let count = store.import_jsonl(path)?;
        println!("📥 Imported {} entries from {}", count, path.display());
    }

    let phases = cli.phases();
    let mut summary = RunSummary::default();
    if !phases.is_empty() {
        println!(
            "📖 {} → {} with {} ({})",
            settings.source_lang,
            settings.target_lang,
            translator.provider_name(),
            translator.model()
        );
        let mut orchestrator = Orchestrator::new(store.clone(), translator, adapter, settings)?;

        let outcome = tokio::select! {
            result = orchestrator.run(&phases, &cli.input, &output) => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        };
        match outcome {
            Some(result) => {
                summary = result?;
                print_summary(&summary);
            }
            None => {
                store.flush()?;
                eprintln!("\n⚠️  Interrupted. Finished chunks are cached; run again to resume.");
                return Err("interrupted".into());
            }
        }
    }

    if let Some(path) = &cli.export {
        let count = store.export_jsonl(path)?;
        println!("📤 Exported {} entries to {}", count, path.display());
    }
    store.flush()?;

    let failed = summary.failed_units();
    if !failed.is_empty() {
        return Err(format!("{} unit(s) failed: {:?}", failed.len(), failed).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("booklingua").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_default_phases_skip_proofread() {
        let cli = parse(&["book.md"]);
        assert_eq!(
            cli.phases(),
            vec![Phase::Extract, Phase::Translate, Phase::Build]
        );
        assert_eq!(parse(&["book.md", "--all"]).phases(), Phase::ALL.to_vec());
        assert_eq!(parse(&["book.md", "--build"]).phases(), vec![Phase::Build]);
    }

    #[test]
    fn test_export_only_runs_no_phase() {
        assert!(parse(&["book.md", "--export", "cache.jsonl"]).phases().is_empty());
    }

    #[test]
    fn test_presets_are_exclusive() {
        assert_eq!(parse(&["book.md", "--mistral"]).preset.preset(), Preset::Mistral);
        assert_eq!(parse(&["book.md"]).preset.preset(), Preset::Ollama);
        assert!(Cli::try_parse_from(["booklingua", "book.md", "--openai", "--ollama"]).is_err());
    }

    #[test]
    fn test_settings_from_flags() {
        let cli = parse(&[
            "book.md", "-s", "French", "-t", "German", "-c", "1,3-4", "--throttle", "1.5",
            "--new-edition", "--retries", "2",
        ]);
        let settings = cli.settings().unwrap();
        assert_eq!(settings.source_lang, "French");
        assert!(settings.selection.contains(3));
        assert!(!settings.selection.contains(2));
        assert_eq!(settings.throttle, Duration::from_millis(1500));
        assert!(settings.new_edition);
        assert_eq!(settings.retry.max_attempts, 2);
    }

    #[test]
    fn test_bad_selection_is_config_error() {
        assert!(parse(&["book.md", "-c", "5-2"]).settings().is_err());
        assert!(parse(&["book.md", "--throttle=-1"]).settings().is_err());
    }
}
