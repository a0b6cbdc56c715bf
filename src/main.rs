// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::PathBuf;

use storyforge::app_config::{self, Config, LlmProvider};
use storyforge::app_controller::Controller;

/// CLI Wrapper for LlmProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLlmProvider {
    Groq,
    #[value(name = "openai")]
    OpenAI,
    #[value(name = "lmstudio")]
    LMStudio,
}

impl From<CliLlmProvider> for LlmProvider {
    fn from(cli_provider: CliLlmProvider) -> Self {
        match cli_provider {
            CliLlmProvider::Groq => LlmProvider::Groq,
            CliLlmProvider::OpenAI => LlmProvider::OpenAI,
            CliLlmProvider::LMStudio => LlmProvider::LMStudio,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate shell completions for storyforge
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// StoryForge - narrated short story videos from a single topic
///
/// Writes a story, narrates it, transcribes the narration for word timings,
/// matches every passage with stock footage and renders a captioned video.
#[derive(Parser, Debug)]
#[command(name = "storyforge")]
#[command(version)]
#[command(about = "AI-powered story video generator")]
#[command(args_conflicts_with_subcommands = true)]
#[command(long_about = "StoryForge writes a short story about a topic, narrates it, and renders it over stock footage with burned-in captions.

EXAMPLES:
    storyforge \"a lighthouse keeper's last night\"        # Render to the configured output file
    storyforge -o keeper.mp4 \"a lighthouse keeper\"       # Choose the output file
    storyforge -p openai -m gpt-4o \"a lost robot\"        # Use a specific provider and model
    storyforge --dump-plan plan.json \"a desert storm\"    # Also write the render plan as JSON
    storyforge completions bash > storyforge.bash         # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically. API keys left empty are read from GROQ_API_KEY,
    OPENAI_API_KEY and PEXELS_KEY.

SUPPORTED PROVIDERS:
    groq      - Groq API (default: llama3-70b-8192)
    openai    - OpenAI API
    lmstudio  - LM Studio local server (OpenAI-compatible on http://localhost:1234/v1)")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Topic of the story
    #[arg(value_name = "TOPIC")]
    topic: Option<String>,

    /// Output video file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Language model provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliLlmProvider>,

    /// Model name to use for script and phrase generation
    #[arg(short, long)]
    model: Option<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Write the validated render plan as JSON to this file
    #[arg(long, value_name = "PATH")]
    dump_plan: Option<PathBuf>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌ ",
            Level::Warn => "🚧 ",
            Level::Info => " ",
            Level::Debug => "🔍 ",
            Level::Trace => "📋 ",
        }
    }

    // @returns: ANSI color for log level
    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {} {}\x1B[0m",
                Self::get_color_for_level(record.level()),
                now,
                Self::get_emoji_for_level(record.level()),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn level_filter(level: &app_config::LogLevel) -> LevelFilter {
    match level {
        app_config::LogLevel::Error => LevelFilter::Error,
        app_config::LogLevel::Warn => LevelFilter::Warn,
        app_config::LogLevel::Info => LevelFilter::Info,
        app_config::LogLevel::Debug => LevelFilter::Debug,
        app_config::LogLevel::Trace => LevelFilter::Trace,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Trace is the ceiling; the effective level is applied with set_max_level below
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "storyforge", &mut std::io::stdout());
        return Ok(());
    }

    let topic = cli
        .topic
        .clone()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| anyhow!("TOPIC is required when no subcommand is specified"))?;

    run_story(cli, topic).await
}

async fn run_story(options: CommandLineOptions, topic: String) -> Result<()> {
    if let Some(cmd_log_level) = &options.log_level {
        log::set_max_level(level_filter(&cmd_log_level.clone().into()));
    }

    let mut config = Config::load_or_create(&options.config_path)?;

    // Override config with CLI options if provided
    if let Some(provider) = &options.provider {
        config.llm.provider = provider.clone().into();
    }
    if let Some(model) = &options.model {
        let provider_str = config.llm.provider.to_lowercase_string();
        match config
            .llm
            .available_providers
            .iter_mut()
            .find(|p| p.provider_type == provider_str)
        {
            Some(provider_config) => provider_config.model = model.clone(),
            None => {
                let mut provider_config = app_config::ProviderConfig::new(config.llm.provider.clone());
                provider_config.model = model.clone();
                config.llm.available_providers.push(provider_config);
            }
        }
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }

    config.validate().context("Configuration validation failed")?;

    if options.log_level.is_none() {
        log::set_max_level(level_filter(&config.log_level));
    }

    let output = options
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.render.output_file));

    let controller = Controller::with_config(config);
    controller
        .run(&topic, &output, options.dump_plan.clone())
        .await
        .map_err(|failure| anyhow!(failure))?;

    Ok(())
}
