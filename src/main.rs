mod cli;

use vobreel::{
    batch::{self, BatchEvent, BatchOutcome, BatchRequest, BatchStatus},
    config::{self, persist, Config},
    diagnostics, scanner,
};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, ConfigAction};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use vobreel_av::{AudioMode, EncodeJob, EncodeSettings, FfmpegEncoder};

/// Encoding overrides given on the command line.
struct ConvertOptions {
    output: Option<PathBuf>,
    crf: Option<u8>,
    preset: Option<vobreel_av::SpeedPreset>,
    audio: Option<AudioMode>,
    concat: Option<vobreel_av::ConcatMethod>,
    dry_run: bool,
}

impl ConvertOptions {
    fn apply(&self, mut settings: EncodeSettings) -> EncodeSettings {
        if let Some(crf) = self.crf {
            settings.crf = crf;
        }
        if let Some(preset) = self.preset {
            settings.preset = preset;
        }
        if let Some(audio) = self.audio {
            settings.audio = audio;
        }
        if let Some(concat) = self.concat {
            settings.concat = concat;
        }
        settings
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "vobreel=debug,vobreel_av=debug".to_string()
        } else {
            "vobreel=warn,vobreel_av=warn".to_string()
        }
    });

    // stdout carries batch output and JSON
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = config::config_path(cli.config.as_deref());

    match cli.command {
        Commands::Convert {
            source,
            output,
            quality,
            crf,
            preset,
            keep_audio,
            aac_audio,
            concat,
            dry_run,
        } => {
            let audio = if keep_audio {
                Some(AudioMode::Copy)
            } else if aac_audio {
                Some(AudioMode::Aac)
            } else {
                None
            };
            let options = ConvertOptions {
                output,
                crf: crf.or(quality.map(|q| q.crf())),
                preset,
                audio,
                concat,
                dry_run,
            };
            convert(&source, &config_path, &options)
        }
        Commands::Scan { source, json } => scan(&source, json),
        Commands::CheckTools { json } => check_tools(&config_path, json),
        Commands::Config { action } => config_command(&config_path, action),
        Commands::Version => {
            println!("vobreel {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn convert(source: &Path, config_path: &Path, options: &ConvertOptions) -> Result<()> {
    let config = config::load_or_create(config_path)?;

    if !source.is_dir() {
        anyhow::bail!("Source directory does not exist: {:?}", source);
    }

    let settings = options.apply(config.encode_settings());
    settings.validate()?;

    let output_dir = options
        .output
        .clone()
        .unwrap_or_else(|| config.default_export_path.clone());

    let ffmpeg_program = config
        .ffmpeg_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("ffmpeg"));

    if options.dry_run {
        return print_plan(source, &output_dir, &settings, &ffmpeg_program);
    }

    let report = diagnostics::check_requirements(config.ffmpeg_path.as_deref());
    if report.missing().contains(&"ffprobe") {
        tracing::warn!("ffprobe not found; your FFmpeg install may be incomplete");
    }
    let ffmpeg = vobreel_av::resolve_tool("ffmpeg", config.ffmpeg_path.as_deref())
        .context("FFmpeg was not found. Please install FFmpeg to use this software")?;

    println!("Starting batch process...");
    println!(
        "Settings: CRF {} | Preset: {} | Audio Copy: {} | Concat: {}",
        settings.crf,
        settings.preset,
        settings.audio == AudioMode::Copy,
        settings.concat
    );
    println!("Output: {}", output_dir.display());

    let request = BatchRequest {
        source_dir: source.to_path_buf(),
        output_dir,
        settings,
    };

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(run_batch(request, FfmpegEncoder::new(ffmpeg)))?;

    println!(
        "\n--- JOB {} --- ({} converted, {} skipped, {} failed)",
        match outcome.status {
            BatchStatus::Completed => "COMPLETE",
            BatchStatus::Stopped => "STOPPED",
            BatchStatus::NothingFound => "FAILED",
        },
        outcome.converted,
        outcome.skipped,
        outcome.failed
    );

    match outcome.status {
        BatchStatus::NothingFound => {
            anyhow::bail!("No valid VOB title sets found in {:?}", source)
        }
        _ if outcome.failed > 0 => {
            anyhow::bail!("{} of {} title sets failed", outcome.failed, outcome.total)
        }
        _ => Ok(()),
    }
}

async fn run_batch(request: BatchRequest, encoder: FfmpegEncoder) -> Result<BatchOutcome> {
    let cancel = encoder.cancel_signal();
    let mut handle = batch::spawn(request, encoder);
    let mut interrupts = 0u32;
    let mut last_progress = None;

    loop {
        tokio::select! {
            event = handle.events.recv() => match event {
                Some(BatchEvent::Log(line)) => println!("{}", line),
                Some(BatchEvent::Progress(percent)) => {
                    if last_progress != Some(percent) {
                        println!("[{:>3}%]", percent);
                        last_progress = Some(percent);
                    }
                }
                Some(BatchEvent::Finished(_)) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if interrupts < 2 => {
                interrupts += 1;
                handle.stop();
                if interrupts == 1 {
                    println!("Stopping after the current title... (press Ctrl-C again to abort it)");
                } else {
                    cancel.store(true, Ordering::Relaxed);
                    println!("Aborting the current title...");
                }
            }
        }
    }

    handle.task.await.context("Batch worker panicked")?
}

fn print_plan(
    source: &Path,
    output_dir: &Path,
    settings: &EncodeSettings,
    ffmpeg: &Path,
) -> Result<()> {
    let title_sets = scanner::scan_title_sets(source)?;
    if title_sets.is_empty() {
        anyhow::bail!("No valid VOB title sets found in {:?}", source);
    }

    let encoder = FfmpegEncoder::new(ffmpeg);
    println!("Found {} titles to process.", title_sets.len());

    for title_set in &title_sets {
        let output = output_dir.join(title_set.output_file_name());
        println!("\n{} ({} parts)", title_set.key, title_set.parts.len());
        if output.exists() {
            println!("  skip: {} already exists", output.display());
            continue;
        }
        let job = EncodeJob::new(title_set.parts.clone(), output, settings.clone());
        let line = encoder.command_line(&job)?;
        println!("  {}", line.join(" "));
    }

    println!("\n[DRY RUN] Would convert {} title sets", title_sets.len());
    Ok(())
}

fn scan(source: &Path, json: bool) -> Result<()> {
    let title_sets = scanner::scan_title_sets(source)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&title_sets)?);
        return Ok(());
    }

    if title_sets.is_empty() {
        println!("No valid VOB Title Sets found.");
        return Ok(());
    }

    println!("Found {} title sets:\n", title_sets.len());
    for title_set in &title_sets {
        println!("{} ({} parts)", title_set.key, title_set.parts.len());
        for part in &title_set.parts {
            println!("  {}", part.display());
        }
    }

    Ok(())
}

fn check_tools(config_path: &Path, json: bool) -> Result<()> {
    let config = config::load_or_create(config_path)?;
    let report = diagnostics::check_requirements(config.ffmpeg_path.as_deref());

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Checking system requirements...\n");

    for tool in &report.tools {
        let status = if tool.available { "✓" } else { "✗" };
        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        match tool.path {
            Some(ref path) => print!(" - {}", path.display()),
            None => print!(" - not found in PATH"),
        }

        println!();
    }

    println!();
    if report.is_ready() {
        println!("SUCCESS: FFmpeg is installed and ready.");
    } else {
        println!("ERROR: Missing components: {}", report.missing().join(", "));
        println!("Please install FFmpeg to use this software.");
    }

    Ok(())
}

fn config_command(config_path: &Path, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
        ConfigAction::Show => {
            let config = config::load_or_create(config_path)?;
            println!("# {}", config_path.display());
            for key in config::CONFIG_KEYS {
                println!("{} = {}", key, config::get_value(&config, key)?);
            }
        }
        ConfigAction::Get { key } => {
            let config = config::load_or_create(config_path)?;
            println!("{}", config::get_value(&config, &key)?);
        }
        ConfigAction::Set { key, value } => {
            let config = persist::update_value(config_path, &key, &value)?;
            println!("{} = {}", key, config::get_value(&config, &key)?);
        }
        ConfigAction::Reset => {
            config::save_config(config_path, &Config::default())?;
            println!("Restored default settings in {}", config_path.display());
        }
    }

    Ok(())
}
