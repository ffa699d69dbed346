use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

use gifpress::{
    Converter, Dither, EncoderBackend, GifpressError, Options, ProgressCallback, ProgressUpdate,
    SourceInfo, WatermarkConfig,
};

const CLI_AFTER_HELP: &str = "Examples:\n  gifpress probe input.mp4 --json\n  gifpress convert input.mp4 --out clip.gif --start 2 --end 6.5 --framerate 15 --width 480\n  gifpress convert input.mp4 --out clip.gif --backend engine --dither floyd-steinberg\n  gifpress convert input.mp4 --out clip.gif --watermarks marks.json --watermark 0";

#[derive(Debug, Parser)]
#[command(
    name = "gifpress",
    version,
    about = "Convert video clips into animated GIFs",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    /// Show additional logging output.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the probed source information.
    #[command(
        about = "Print source width, height, and duration",
        visible_alias = "info"
    )]
    Probe {
        /// Input media path.
        input: PathBuf,

        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Convert a clip of the input video into an animated GIF.
    #[command(about = "Convert a video clip into an animated GIF")]
    Convert {
        /// Input media path.
        input: PathBuf,

        /// Output GIF path.
        #[arg(long, short)]
        out: PathBuf,

        /// Trim start in seconds (defaults to the start of the file).
        #[arg(long)]
        start: Option<f64>,

        /// Trim end in seconds (defaults to the end of the file).
        #[arg(long)]
        end: Option<f64>,

        /// Playback speed factor; 2 halves the output duration.
        #[arg(long, default_value_t = 1.0)]
        speed: f64,

        /// Output width in pixels; -1 derives it from the aspect ratio.
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        width: i32,

        /// Output height in pixels; -1 derives it from the aspect ratio.
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        height: i32,

        /// Output frames per second.
        #[arg(long, default_value_t = 12.0)]
        framerate: f64,

        /// Maximum palette size (2-256).
        #[arg(long, default_value_t = 255)]
        max_colors: u16,

        /// Dithering algorithm for the engine back end.
        #[arg(long, value_enum, default_value_t = DitherArg::Bayer)]
        dither: DitherArg,

        /// JSON file holding an ordered list of watermark presets.
        #[arg(long)]
        watermarks: Option<PathBuf>,

        /// Index of the watermark preset to apply; -1 applies none.
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        watermark: i32,

        /// Encoder back end.
        #[arg(long, value_enum, default_value_t = BackendArg::Direct)]
        backend: BackendArg,

        /// Hide the progress bar.
        #[arg(long)]
        quiet: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DitherArg {
    None,
    Bayer,
    FloydSteinberg,
    Sierra2,
    Sierra2_4a,
}

impl From<DitherArg> for Dither {
    fn from(value: DitherArg) -> Self {
        match value {
            DitherArg::None => Dither::None,
            DitherArg::Bayer => Dither::Bayer,
            DitherArg::FloydSteinberg => Dither::FloydSteinberg,
            DitherArg::Sierra2 => Dither::Sierra2,
            DitherArg::Sierra2_4a => Dither::Sierra2_4a,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    /// In-process palette encoder.
    Direct,
    /// External FFmpeg palettegen/paletteuse graph.
    Engine,
}

impl From<BackendArg> for EncoderBackend {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::Direct => EncoderBackend::DirectPixel,
            BackendArg::Engine => EncoderBackend::Engine,
        }
    }
}

struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{msg:>16} [{bar:32}] {percent:>3}%")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for BarProgress {
    fn on_progress(&self, update: &ProgressUpdate) {
        self.bar.set_message(update.label.to_string());
        match update.percent {
            Some(percent) => self.bar.set_position(percent as u64),
            None => self.bar.tick(),
        }
    }
}

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("{} {}", format!("[{}]", record.level()).dimmed(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.verbose && log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Debug);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(GifpressError::Aborted) => {
            eprintln!("{}", "aborted".yellow());
            ExitCode::from(130)
        }
        Err(error) => {
            eprintln!("{} {error}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), GifpressError> {
    match cli.command {
        Commands::Probe { input, json } => {
            let info = SourceInfo::probe(&input)?;
            if json {
                let payload = json!({
                    "width": info.width,
                    "height": info.height,
                    "duration": info.duration,
                });
                println!("{payload}");
            } else {
                println!("{}", input.display().to_string().bold());
                println!("  size:     {}x{}", info.width, info.height);
                println!("  duration: {:.3}s", info.duration);
            }
            Ok(())
        }

        Commands::Convert {
            input,
            out,
            start,
            end,
            speed,
            width,
            height,
            framerate,
            max_colors,
            dither,
            watermarks,
            watermark,
            backend,
            quiet,
        } => {
            let source = SourceInfo::probe(&input)?;

            let options = Options {
                start: start.unwrap_or(0.0),
                end: end.unwrap_or(source.duration),
                speed,
                width,
                height,
                framerate,
                max_colors,
                dither: dither.into(),
                watermark_index: watermark,
            };

            let presets = match watermarks {
                Some(path) => load_watermarks(&path)?,
                None => Vec::new(),
            };

            let mut converter = Converter::new()?.with_backend(backend.into());

            let bar = (!quiet).then(BarProgress::new);
            if let Some(bar) = &bar {
                converter = converter.with_progress(Arc::new(BarProgress {
                    bar: bar.bar.clone(),
                }));
            }

            let result = converter.run(&input, &source, &options, &presets);
            if let Some(bar) = &bar {
                bar.finish();
            }

            let bytes = result?;
            std::fs::write(&out, &bytes)?;
            println!(
                "{} {} ({} bytes)",
                "wrote".green().bold(),
                out.display(),
                bytes.len()
            );
            Ok(())
        }
    }
}

fn load_watermarks(path: &PathBuf) -> Result<Vec<WatermarkConfig>, GifpressError> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|error| {
        GifpressError::Validation(format!(
            "cannot parse watermark presets {}: {error}",
            path.display()
        ))
    })
}
