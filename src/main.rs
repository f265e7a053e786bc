use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::Parser;
use simple_logger::SimpleLogger;

use adaptive_limiter::engine::engine::AudioEngine;
use adaptive_limiter::engine::render::render_file;
use adaptive_limiter::{LevelReport, ParamUpdate, Parameters};

#[derive(Parser, Debug)]
#[command(
    name = "adaptive-limiter",
    version,
    about = "Plays or renders an audio file through a lookahead peak limiter"
)]
struct Cli {
    /// Audio file to process
    #[arg(value_name = "PATH")]
    path: PathBuf,

    #[arg(long, value_name = "DB", allow_negative_numbers = true)]
    threshold_db: Option<f32>,

    #[arg(long, value_name = "DB", allow_negative_numbers = true)]
    knee_db: Option<f32>,

    #[arg(long, value_name = "DB", allow_negative_numbers = true)]
    makeup_db: Option<f32>,

    #[arg(long, value_name = "MS")]
    lookahead_ms: Option<f32>,

    #[arg(long, value_name = "MS")]
    min_recovery_ms: Option<f32>,

    /// Write the limited signal to this WAV file instead of playing it
    #[arg(long, value_name = "OUT.wav")]
    render: Option<PathBuf>,

    /// Frames per processing block when rendering
    #[arg(long, value_name = "N", default_value_t = 512)]
    block_size: usize,

    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: log::LevelFilter,
}

impl Cli {
    fn parameter_update(&self) -> ParamUpdate {
        ParamUpdate {
            threshold_db: self.threshold_db,
            knee_width_db: self.knee_db,
            makeup_gain_db: self.makeup_db,
            lookahead_ms: self.lookahead_ms,
            min_recovery_ms: self.min_recovery_ms,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    SimpleLogger::new().with_level(cli.log_level).init()?;

    let mut params = Parameters::default();
    params.apply(&cli.parameter_update());
    log::info!("Limiter parameters {:?}", params);

    match &cli.render {
        Some(out) => {
            let summary = render_file(&cli.path, out, params, cli.block_size)?;
            log_levels("Peak", &summary.peak);
        }
        None => play(&cli, params)?,
    }
    Ok(())
}

fn play(cli: &Cli, params: Parameters) -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = AudioEngine::new(params)?;
    engine.load(&cli.path)?;
    engine.play()?;
    log::info!("Playing {}", cli.path.display());

    let mut peak = LevelReport::SILENT;
    while !engine.is_finished() {
        engine.tick();
        let levels = engine.levels();
        peak = peak.max(levels);
        log::info!(
            "{:7.2}s | in {:7.2} {:7.2} dB | out {:7.2} {:7.2} dB",
            engine.get_time_secs(),
            levels.in_l,
            levels.in_r,
            levels.out_l,
            levels.out_r
        );
        thread::sleep(Duration::from_secs(1));
    }

    log_levels("Peak", &peak);
    Ok(())
}

fn log_levels(label: &str, levels: &LevelReport) {
    log::info!(
        "{} in {:.2}/{:.2} dB, out {:.2}/{:.2} dB",
        label,
        levels.in_l,
        levels.in_r,
        levels.out_l,
        levels.out_r
    );
}
