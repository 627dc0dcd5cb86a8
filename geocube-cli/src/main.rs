use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rayon::ThreadPoolBuilder;
use std::path::PathBuf;
use tracing::{info, warn};

use geocube::geobox::{Align, BoundingGeometry, GridConfig, Resolution};
use geocube::writer::{read_grid_spec, GeoTiffWriter};
use geocube::{Crs, GeocubeOptions, GridDataMethod};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rasterize vector data into one GeoTIFF per measurement
    MakeGeocube(MakeGeocubeArgs),
    /// Print versions of geocube and GDAL for bug reports
    ShowVersions,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum InterpolateMethod {
    Nearest,
    Linear,
    Cubic,
}

impl From<InterpolateMethod> for GridDataMethod {
    fn from(method: InterpolateMethod) -> Self {
        match method {
            InterpolateMethod::Nearest => GridDataMethod::Nearest,
            InterpolateMethod::Linear => GridDataMethod::Linear,
            InterpolateMethod::Cubic => GridDataMethod::Cubic,
        }
    }
}

#[derive(Args, Debug)]
struct MakeGeocubeArgs {
    /// Any OGR-readable vector file
    #[arg(value_name = "VECTOR")]
    vector_data: PathBuf,

    /// Directory receiving <measurement>.tif files
    #[arg(value_name = "OUTPUT_DIR")]
    output_dir: PathBuf,

    /// Measurement subset to rasterize (repeatable)
    #[arg(short, long = "measurements")]
    measurements: Vec<String>,

    /// CRS of the output grid (e.g. epsg:4326); defaults to the input CRS
    #[arg(short = 'c', long)]
    output_crs: Option<String>,

    /// Signed pixel size, e.g. `-r -10 10`; one value means square north-up pixels
    #[arg(short, long, num_args = 1..=2, value_names = ["Y", "X"], allow_negative_numbers = true)]
    resolution: Option<Vec<f64>>,

    /// Point lying on a pixel boundary; default (0, 0)
    #[arg(short, long, num_args = 2, value_names = ["Y", "X"], allow_negative_numbers = true)]
    align: Option<Vec<f64>>,

    /// GeoJSON geometry bounding the grid
    #[arg(short, long)]
    geom: Option<String>,

    /// Raster whose grid is reused as-is
    #[arg(short, long, value_name = "TEMPLATE")]
    like: Option<PathBuf>,

    /// No-data value (default: NaN)
    #[arg(short, long, allow_negative_numbers = true)]
    fill: Option<f64>,

    /// Stack layers along the distinct values of this column
    #[arg(long)]
    group_by: Option<String>,

    /// Fill no-data cells after rasterizing
    #[arg(short, long = "interpolate-na-method", value_enum)]
    interpolate_na_method: Option<InterpolateMethod>,

    /// Measurements holding timestamps (repeatable)
    #[arg(long = "datetime")]
    datetime_measurements: Vec<String>,

    /// Number of worker threads (default: number of CPUs)
    #[arg(short, long)]
    threads: Option<usize>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Command::MakeGeocube(args) => make_geocube(args),
        Command::ShowVersions => {
            show_versions();
            Ok(())
        }
    }
}

fn show_versions() {
    println!("geocube v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("GDAL:");
    println!("{}", gdal::version::VersionInfo::version_report());
}

fn pair(values: &[f64], flag: &str) -> Result<(f64, f64)> {
    match values {
        [y, x] => Ok((*y, *x)),
        _ => anyhow::bail!("--{} takes two values (Y X)", flag),
    }
}

fn grid_config(args: &MakeGeocubeArgs) -> Result<GridConfig> {
    let mut config = GridConfig::new();
    config.output_crs = args.output_crs.as_deref().map(Crs::new);
    if let Some(values) = &args.resolution {
        config.resolution = Some(match values.as_slice() {
            [r] => Resolution::square(*r),
            _ => {
                let (y, x) = pair(values, "resolution")?;
                Resolution::new(y, x)
            }
        });
    }
    if let Some(values) = &args.align {
        let (y, x) = pair(values, "align")?;
        config.align = Some(Align::new(y, x));
    }
    if let Some(geom) = &args.geom {
        config.geom = Some(
            geom.parse::<BoundingGeometry>()
                .context("Failed to parse --geom")?,
        );
    }
    if let Some(like) = &args.like {
        config.like = Some(read_grid_spec(like)?);
    }
    Ok(config)
}

fn make_geocube(args: MakeGeocubeArgs) -> Result<()> {
    let start_time = std::time::Instant::now();

    if let Some(threads) = args.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to build thread pool")?;
    }

    let features = geocube::load_vector_data(&args.vector_data, None)
        .with_context(|| format!("Failed to load {:?}", args.vector_data))?;
    info!("Loaded {} features from {:?}", features.len(), args.vector_data);

    let config = grid_config(&args)?;
    let options = GeocubeOptions {
        measurements: (!args.measurements.is_empty()).then(|| args.measurements.clone()),
        datetime_measurements: args.datetime_measurements.clone(),
        group_by: args.group_by.clone(),
        fill: args.fill.unwrap_or(f64::NAN),
        interpolate_na_method: args.interpolate_na_method.map(GridDataMethod::from),
        ..GeocubeOptions::default()
    };

    let cube = geocube::make_geocube(&features, &config, &options)?;
    for diagnostic in &cube.diagnostics {
        warn!("{}: {}", diagnostic.measurement, diagnostic.message);
    }

    let written = GeoTiffWriter::new().write(&cube, &args.output_dir)?;
    info!("Wrote {} GeoTIFF files to {:?}", written.len(), args.output_dir);
    info!("Total processing time: {:?}", start_time.elapsed());

    Ok(())
}
