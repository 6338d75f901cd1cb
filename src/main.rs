use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;

use liquidglow::{
    AnalysisRecorder, CpuBackend, FieldMetrics, FluidApp, FluidConfiguration, FluidService,
    ImageExporter, Snapshot,
};

#[derive(Parser, Debug)]
#[command(name = "liquidglow", about = "Stable-fluids simulation with bloom and sunrays")]
struct Cli {
    /// JSON configuration file, overlaid on the preset
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// One of: default, smoke, circle
    #[arg(long, global = true, default_value = "default")]
    preset: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run headless on the CPU backend and export PNG frames
    Test(HeadlessArgs),
    /// Run headless on the wgpu backend and export PNG frames
    #[cfg(feature = "gpu")]
    Gpu(HeadlessArgs),
}

#[derive(Args, Debug)]
struct HeadlessArgs {
    #[arg(long, default_value_t = 20)]
    frames: usize,

    #[arg(long, default_value_t = 320)]
    width: u32,

    #[arg(long, default_value_t = 240)]
    height: u32,

    #[arg(long, default_value_t = 64)]
    sim_resolution: u32,

    #[arg(long, default_value_t = 256)]
    dye_resolution: u32,

    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Directory the PNG frames are written to
    #[arg(long, default_value = "frames")]
    out: PathBuf,
}

fn load_config(cli: &Cli) -> Result<FluidConfiguration, Box<dyn std::error::Error>> {
    let base = FluidConfiguration::preset(&cli.preset)
        .ok_or_else(|| format!("unknown preset '{}'", cli.preset))?;
    let Some(path) = &cli.config else {
        return Ok(base);
    };

    // Keys missing from the file keep the preset's values.
    let contents = fs::read_to_string(path)?;
    let mut merged = serde_json::to_value(&base)?;
    let overlay: serde_json::Value = serde_json::from_str(&contents)?;
    if let (Some(target), serde_json::Value::Object(fields)) = (merged.as_object_mut(), overlay) {
        target.extend(fields);
    }
    Ok(serde_json::from_value(merged)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match &cli.command {
        Some(Command::Test(args)) => run_headless_test(config, args)?,
        #[cfg(feature = "gpu")]
        Some(Command::Gpu(args)) => run_headless_gpu(config, args)?,
        None => run_gui_app(config)?,
    }

    Ok(())
}

fn headless_config(mut config: FluidConfiguration, args: &HeadlessArgs) -> FluidConfiguration {
    config.sim_resolution = args.sim_resolution;
    config.dye_resolution = args.dye_resolution;
    config
}

fn run_headless_test(
    config: FluidConfiguration,
    args: &HeadlessArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Running headless fluid simulation test with quantitative analysis...");

    let mut service = FluidService::new(headless_config(config, args));
    service.bind(CpuBackend::new(args.width, args.height))?;

    let exporter = ImageExporter::new(args.width, args.height);
    let mut recorder = AnalysisRecorder::new();
    let mut rng = StdRng::seed_from_u64(args.seed);
    fs::create_dir_all(&args.out)?;

    println!("Initializing simulation with random splats...");
    service.multiple_splats_with(&mut rng, 5)?;

    let dt = 1.0 / 60.0;
    for frame in 0..=args.frames {
        if frame > 0 {
            service.step(dt)?;
        }
        service.render(None)?;

        let (Some(backend), Some(fields)) = (service.backend(), service.fields()) else {
            log::warn!("simulation disabled, only the background is rendered");
            break;
        };
        let surface = Snapshot::surface(backend);
        exporter.export_png(&surface, &frame_path(&args.out, "frame", frame))?;

        let dye = Snapshot::target(backend, fields.dye().read());
        let velocity = Snapshot::target(backend, fields.velocity().read());
        if let (Some(dye), Some(velocity)) = (dye, velocity) {
            exporter.export_velocity_png(
                &velocity,
                &frame_path(&args.out, "velocity", frame),
                0.01,
            )?;
            recorder.record_frame(&dye, &velocity, frame);

            // Print metrics every 5 frames
            if frame % 5 == 0 {
                FieldMetrics::analyze(&dye, &velocity, frame).print_summary();
            }
        }
    }

    recorder.print_trends();

    println!(
        "Test completed! Generated {} frames in {}.",
        args.frames + 1,
        args.out.display()
    );
    Ok(())
}

#[cfg(feature = "gpu")]
fn run_headless_gpu(
    config: FluidConfiguration,
    args: &HeadlessArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    use liquidglow::{RenderBackend, WgpuBackend};

    println!("Running headless fluid simulation on the GPU...");

    let backend = pollster::block_on(WgpuBackend::new(args.width, args.height))?;
    let mut service = FluidService::new(headless_config(config, args));
    service.bind(backend)?;

    let exporter = ImageExporter::new(args.width, args.height);
    let mut rng = StdRng::seed_from_u64(args.seed);
    fs::create_dir_all(&args.out)?;
    service.multiple_splats_with(&mut rng, 5)?;

    for frame in 0..=args.frames {
        if frame > 0 {
            service.step(1.0 / 60.0)?;
        }
        service.render(None)?;

        if let Some(backend) = service.backend() {
            let texels = pollster::block_on(backend.read_surface())?;
            let surface = Snapshot::new(backend.drawing_buffer_size(), texels);
            exporter.export_png(&surface, &frame_path(&args.out, "gpu_frame", frame))?;
        }
    }

    println!("GPU test completed! Generated {} frames.", args.frames + 1);
    Ok(())
}

fn frame_path(dir: &Path, name: &str, frame: usize) -> PathBuf {
    dir.join(format!("{}_{:04}.png", name, frame))
}

fn run_gui_app(config: FluidConfiguration) -> Result<(), Box<dyn std::error::Error>> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([800.0, 800.0])
            .with_title("liquidglow - Interactive Fluid Simulation"),
        ..Default::default()
    };

    let config = FluidConfiguration {
        sim_resolution: config.sim_resolution.min(128),
        dye_resolution: config.dye_resolution.min(512),
        ..config
    };

    eframe::run_native(
        "liquidglow",
        options,
        Box::new(|_cc| Box::new(FluidApp::new(config))),
    )?;
    Ok(())
}
