//! hanzi-bridge 命令行入口

use std::error::Error;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use hanzi_bridge::env::{core::LogLevel, EnvVar};
use hanzi_bridge::translation::config::{ConfigManager, Language, LANGUAGES};
use hanzi_bridge::translation::metering::{character_cost, StatsSnapshot, UsageMeter};
use hanzi_bridge::translation::phonetic::PhoneticStyle;
use hanzi_bridge::translation::pipeline::{ChunkStatus, Document, Progress};
use hanzi_bridge::translation::{AppConfig, TranslateRequest, TranslationMode, TranslationOutcome, TranslationService};
use hanzi_bridge::translation::storage::open_store;
use hanzi_bridge::utils::read_text_file;

#[derive(Parser)]
#[command(name = "hanzi-bridge")]
#[command(about = "Translate Chinese text with pinyin, word glosses and per-key daily quotas")]
#[command(version)]
struct Cli {
    /// Configuration file (overrides the search path)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a text or file
    Translate {
        /// API key or admin password
        #[arg(long)]
        key: String,

        #[command(flatten)]
        input: InputArgs,

        /// Target language name or code
        #[arg(long, default_value = "vi")]
        target: String,

        /// Skip the English rendition
        #[arg(long)]
        no_english: bool,

        /// standard, block or interactive
        #[arg(long, default_value = "standard")]
        mode: TranslationMode,

        /// tone-marks or tone-numbers
        #[arg(long, default_value = "tone-marks")]
        pinyin: PhoneticStyle,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Usage statistics for all keys (admin only)
    Stats {
        #[arg(long)]
        key: String,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Billable characters of a request, without translating
    Cost {
        #[command(flatten)]
        input: InputArgs,

        #[arg(long, default_value = "vi")]
        target: String,

        #[arg(long)]
        no_english: bool,
    },
    /// Supported target languages
    Languages,
    /// Write an example configuration file
    InitConfig { path: PathBuf },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct InputArgs {
    /// UTF-8 or GB18030 text file
    #[arg(long)]
    file: Option<PathBuf>,

    #[arg(long)]
    text: Option<String>,
}

impl InputArgs {
    fn read(&self) -> Result<String, Box<dyn Error>> {
        match (&self.file, &self.text) {
            (Some(path), _) => Ok(read_text_file(path)?.text),
            (None, Some(text)) => Ok(text.clone()),
            (None, None) => Err("either --file or --text is required".into()),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::InitConfig { path } => {
            ConfigManager::generate_example_config(&path)?;
            println!("Example configuration written to {}", path.display());
        }
        Commands::Languages => {
            for language in LANGUAGES {
                println!("{:<4} {}", language.code, language.name);
            }
        }
        Commands::Cost {
            input,
            target,
            no_english,
        } => {
            let config = load_config(cli.config)?;
            let text = input.read()?;
            let target = Language::target(&target).ok_or_else(|| format!("unsupported target language '{}'", target))?;
            let include_secondary = config.translation.include_secondary && !no_english;
            let want_secondary = config.translation.wants_secondary_for(target.code, include_secondary);
            println!("{}", character_cost(&text, want_secondary, target.code));
        }
        Commands::Stats { key, format } => {
            let config = load_config(cli.config)?;
            // 进程内存储在每次运行时都是空的
            if config.translation.usage_store_path.is_none() {
                return Err("stats need a persistent usage store: set translation.usage_store_path or HANZI_BRIDGE_USAGE_DB".into());
            }
            let meter = UsageMeter::new(config.access, open_store(&config.translation)?);
            if !meter.is_admin(&meter.resolve_identity(&key)) {
                return Err("stats require the admin password".into());
            }
            let snapshot = meter.stats_snapshot()?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
                OutputFormat::Text => print_stats(&snapshot),
            }
        }
        Commands::Translate {
            key,
            input,
            target,
            no_english,
            mode,
            pinyin,
            format,
        } => {
            let config = load_config(cli.config)?;
            let include_secondary = config.translation.include_secondary && !no_english;
            let service = TranslationService::from_config(config)?;
            if !service.meter().is_known_credential(&key) {
                return Err("unknown API key".into());
            }

            let cancel = service.cancel_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("收到中断信号，取消未完成的片段");
                    cancel.cancel();
                }
            });

            let request = TranslateRequest::new(key, input.read()?, target)
                .with_secondary(include_secondary)
                .with_mode(mode)
                .with_phonetic(pinyin);
            let progress = |progress: Progress| {
                tracing::info!("进度 {}/{} ({:.0}%)", progress.completed, progress.total, progress.percent());
            };

            let outcome = service.translate(&request, &progress).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
                OutputFormat::Text => print_outcome(&outcome),
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    let level = LogLevel::get_or_default("info".to_string());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<AppConfig, Box<dyn Error>> {
    let manager = match path {
        Some(path) => ConfigManager::from_path(path)?,
        None => ConfigManager::new()?,
    };
    if let Some(source) = manager.source() {
        tracing::debug!("使用配置文件: {}", source);
    }
    Ok(manager.into_config())
}

fn print_outcome(outcome: &TranslationOutcome) {
    match &outcome.document {
        Document::Standard(records) => {
            for record in records {
                println!("{}", record.source);
                if let Some(phonetic) = &record.phonetic {
                    println!("  {}", phonetic);
                }
                println!("  {}", record.primary);
                if let Some(secondary) = &record.secondary {
                    println!("  {}", secondary);
                }
                if record.status == ChunkStatus::Errored {
                    eprintln!("chunk {} failed", record.index);
                }
                println!();
            }
        }
        Document::Interactive(paragraphs) => {
            for paragraph in paragraphs {
                for word in &paragraph.words {
                    println!("{} [{}] {}", word.surface_form, word.phonetic, word.glosses.join("; "));
                }
                println!();
            }
        }
    }
    println!("{}", outcome.usage);
}

fn print_stats(snapshot: &StatsSnapshot) {
    println!("Keys: {}", snapshot.total_distinct_keys);
    println!("Characters: {}", snapshot.total_characters());
    for (date, total) in &snapshot.per_date_totals {
        println!("{}  {}", date, total);
    }
    for (key_name, dates) in &snapshot.per_key_per_date_totals {
        for (date, total) in dates {
            println!("{}  {}  {}", key_name, date, total);
        }
    }
}
