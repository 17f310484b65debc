use clap::{Parser, Subcommand};
use cli::Settings;
use color_eyre::eyre::{Result, eyre};
use std::path::{Path, PathBuf};
use stockvision::{
    CalibrationEngine, CameraSession, EdgeMode, Pipeline, Resolution, StillImageSource,
    capture::capture_averaged, rescale_reference_point,
};
use tracing::info;
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (.toml or .json); defaults are used when omitted
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trace the stock in an image and write DXF (or GeoJSON by extension)
    Export {
        /// Image file(s) acting as camera devices; the configured device id picks one
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,
        /// Output file (.dxf or .geojson)
        #[arg(short, long)]
        output: PathBuf,
        /// Background edge raster written by `capture --edges`
        #[arg(long)]
        background: Option<PathBuf>,
        /// Override the edge mode from the settings
        #[arg(long)]
        mode: Option<EdgeMode>,
        /// Override the frame count from the settings
        #[arg(long)]
        frames: Option<usize>,
    },
    /// Measure inches per pixel from two points a known distance apart
    Calibrate {
        #[arg(long, value_parser = parse_point)]
        p1: [f64; 2],
        #[arg(long, value_parser = parse_point)]
        p2: [f64; 2],
        /// Known distance between the points, in inches
        #[arg(short, long)]
        distance: f64,
        /// Points were picked on a preview of this size (WIDTHxHEIGHT)
        #[arg(long, value_parser = parse_resolution)]
        preview: Option<Resolution>,
        /// Write the accepted scale back into the settings file
        #[arg(long)]
        save: bool,
    },
    /// Average the colour around a pixel and use it for colour mode
    SampleColor {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(long, value_parser = parse_point)]
        at: [f64; 2],
        /// Override the sample radius from the settings
        #[arg(long)]
        radius: Option<u32>,
        /// Store the sample and switch the settings to colour mode
        #[arg(long)]
        save: bool,
    },
    /// Average frames from a device and write them as a timestamped PNG
    Capture {
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
        /// Also write the combined edge raster, usable as a background
        #[arg(long)]
        edges: bool,
    },
    /// Express a reference pixel recorded at one resolution at another
    RescaleReference {
        #[arg(long, value_parser = parse_point)]
        point: [f64; 2],
        #[arg(long, value_parser = parse_resolution)]
        from: Resolution,
        #[arg(long, value_parser = parse_resolution)]
        to: Resolution,
    },
    /// Create, print or describe settings files
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Write default settings to a file
    Init { path: PathBuf },
    /// Print the effective settings as TOML
    Show,
    /// Print the JSON schema of the settings file
    Schema,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cli = Cli::parse();
    let settings_path = cli.settings.as_deref();

    match cli.command {
        Commands::Export { input, output, background, mode, frames } => {
            export(settings_path, input, &output, background.as_deref(), mode, frames)?;
        }
        Commands::Calibrate { p1, p2, distance, preview, save } => {
            calibrate(settings_path, p1, p2, distance, preview, save)?;
        }
        Commands::SampleColor { input, at, radius, save } => {
            sample_color(settings_path, &input, at, radius, save)?;
        }
        Commands::Capture { input, output_dir, edges } => {
            capture(settings_path, input, &output_dir, edges)?;
        }
        Commands::RescaleReference { point, from, to } => {
            let [x, y] = rescale_reference_point(point, from, to);
            println!("{x:.3},{y:.3}");
        }
        Commands::Settings { action } => settings_command(settings_path, action)?,
    }

    Ok(())
}

fn parse_point(value: &str) -> Result<[f64; 2], String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got '{value}'"))?;
    let parse = |v: &str| v.trim().parse::<f64>().map_err(|err| format!("'{v}': {err}"));
    Ok([parse(x)?, parse(y)?])
}

fn parse_resolution(value: &str) -> Result<Resolution, String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
    let parse = |v: &str| v.trim().parse::<u32>().map_err(|err| format!("'{v}': {err}"));
    Ok(Resolution::new(parse(w)?, parse(h)?))
}

fn load_pipeline(settings: &Settings) -> Result<Pipeline> {
    Ok(Pipeline::new(settings.pipeline_config()?))
}

/// Open the configured device from a set of still images and average `frames` reads.
fn averaged_frame(
    settings: &Settings,
    pipeline: &Pipeline,
    input: Vec<PathBuf>,
    frames: usize,
) -> Result<stockvision::capture::AveragedCapture> {
    let mut session = CameraSession::new(StillImageSource::new(input));
    let camera = settings.camera;
    // native size for still images; the reference point is rescaled to whatever comes back
    let resolution = session.open(camera.device_id, 0, 0)?;
    info!(%resolution, frames, "capturing");

    let device = session.device_mut().ok_or_else(|| eyre!("device closed during capture"))?;
    Ok(capture_averaged(device, pipeline, frames)?)
}

fn export(
    settings_path: Option<&Path>,
    input: Vec<PathBuf>,
    output: &Path,
    background: Option<&Path>,
    mode: Option<EdgeMode>,
    frames: Option<usize>,
) -> Result<()> {
    let mut settings = Settings::load_or_default(settings_path)?;
    if let Some(mode) = mode {
        settings.pipeline.edge_mode = mode;
    }
    if let Some(path) = background {
        settings.pipeline.subtract_background = true;
        info!(path = %path.display(), "subtracting background edges");
    }

    let mut pipeline = load_pipeline(&settings)?;
    if let Some(path) = background {
        pipeline.set_background(image::open(path)?.to_luma8());
    }

    let frames = frames.unwrap_or(settings.capture_frames);
    let capture = averaged_frame(&settings, &pipeline, input, frames)?;
    let summary = pipeline.export_to_file(Some(&capture.frame), output)?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    info!("✅ Export written to {}", output.display());
    Ok(())
}

fn calibrate(
    settings_path: Option<&Path>,
    p1: [f64; 2],
    p2: [f64; 2],
    distance: f64,
    preview: Option<Resolution>,
    save: bool,
) -> Result<()> {
    let mut settings = Settings::load_or_default(settings_path)?;
    let frame = settings.camera.resolution();

    let mut engine = CalibrationEngine::new(settings.pipeline.registration.scale);
    engine.start(distance)?;
    for point in [p1, p2] {
        match preview {
            Some(preview) => engine.click_preview(point, preview, frame)?,
            None => engine.click(point)?,
        };
    }
    let scale = engine.accept()?;
    println!("1 pixel = {:.6} inches", scale.inches_per_pixel());

    if save {
        let path = settings_path.ok_or_else(|| eyre!("--save needs --settings"))?;
        settings.pipeline.registration.scale = scale;
        settings.save(path)?;
        info!(path = %path.display(), "scale saved");
    }
    Ok(())
}

fn sample_color(
    settings_path: Option<&Path>,
    input: &Path,
    [x, y]: [f64; 2],
    radius: Option<u32>,
    save: bool,
) -> Result<()> {
    let mut settings = Settings::load_or_default(settings_path)?;
    if let Some(radius) = radius {
        settings.pipeline.sample_radius = radius;
    }
    let frame = image::open(input)?.to_rgb8();
    let pipeline = Pipeline::new(settings.pipeline.clone());
    let sample = pipeline.sample_color(&frame, x.max(0.0) as u32, y.max(0.0) as u32);
    println!("{} {} {}", sample.r, sample.g, sample.b);

    if save {
        let path = settings_path.ok_or_else(|| eyre!("--save needs --settings"))?;
        settings.pipeline.color_sample = Some(sample);
        settings.pipeline.edge_mode = EdgeMode::Color;
        settings.save(path)?;
        info!(path = %path.display(), "colour sample saved");
    }
    Ok(())
}

fn capture(settings_path: Option<&Path>, input: Vec<PathBuf>, output_dir: &Path, edges: bool) -> Result<()> {
    let settings = Settings::load_or_default(settings_path)?;
    let pipeline = load_pipeline(&settings)?;
    let capture = averaged_frame(&settings, &pipeline, input, settings.capture_frames)?;

    std::fs::create_dir_all(output_dir)?;
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let frame_path = output_dir.join(format!("capture_{stamp}.png"));
    capture.frame.save(&frame_path)?;
    info!("📷 Averaged {} frames into {}", capture.frames, frame_path.display());

    if edges {
        let edges_path = output_dir.join(format!("capture_{stamp}_edges.png"));
        capture.edges.save(&edges_path)?;
        info!("Edge raster saved to {}", edges_path.display());
    }
    Ok(())
}

fn settings_command(settings_path: Option<&Path>, action: SettingsAction) -> Result<()> {
    match action {
        SettingsAction::Init { path } => {
            Settings::default().save(&path)?;
            info!("📄 Default settings written to {}", path.display());
        }
        SettingsAction::Show => {
            let settings = Settings::load_or_default(settings_path)?;
            print!("{}", settings.to_toml()?);
        }
        SettingsAction::Schema => {
            println!("{}", serde_json::to_string_pretty(&Settings::schema())?);
        }
    }
    Ok(())
}
