use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use sensorplan::config::{ActiveFilter, LabelMode, LabelText, PlanConfig};
use sensorplan::overrides::OverrideTable;
use sensorplan::pipeline::build_plan;
use sensorplan::sources::{load_config, load_map, load_overrides, load_sensors, or_empty};
use std::io::Write;
use std::path::PathBuf;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Inline,
    Offset,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum TextArg {
    Index,
    Code,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Map geometry JSON (line groups with polyline fragments).
    #[arg(long, env = "LUPINE_MAP")]
    map: PathBuf,

    /// Sensor description text, or converted sensor JSON.
    #[arg(long, env = "LUPINE_SENSORS")]
    sensors: PathBuf,

    /// Override table JSON mapping "kp|kg" to a line.
    #[arg(long, env = "LUPINE_OVERRIDES")]
    overrides: Option<PathBuf>,

    /// Plan parameters as JSON. Flags below take precedence.
    #[arg(long, env = "LUPINE_CONFIG")]
    config: Option<PathBuf>,

    /// Where to write the plan. Stdout when absent.
    #[arg(long)]
    out: Option<PathBuf>,

    #[arg(long)]
    width: Option<f64>,

    #[arg(long)]
    join_distance: Option<f64>,

    #[arg(long)]
    join_angle: Option<f64>,

    #[arg(long)]
    epsilon: Option<f64>,

    #[arg(long)]
    smooth: Option<u32>,

    #[arg(long)]
    min_trunk: Option<f64>,

    #[arg(long)]
    tolerance: Option<f64>,

    /// 0 keeps raw sensor positions, 100 snaps them onto the line.
    #[arg(long)]
    snap: Option<f64>,

    /// Highlight one line by index.
    #[arg(long, conflicts_with = "kp_kg")]
    group: Option<usize>,

    /// Highlight one "kp|kg" pair.
    #[arg(long)]
    kp_kg: Option<String>,

    #[arg(long, value_enum)]
    label_mode: Option<ModeArg>,

    #[arg(long, value_enum)]
    label_text: Option<TextArg>,

    /// Include the raw fragments as an overlay.
    #[arg(long)]
    overlay: bool,

    /// Draw each line as a straight lane instead of in map shape.
    #[arg(long)]
    lanes: bool,
}

fn parse_kp_kg(value: &str) -> Result<ActiveFilter> {
    let (kp, kg) = value
        .split_once('|')
        .with_context(|| format!("expected \"kp|kg\", got '{}'", value))?;
    Ok(ActiveFilter::KpKg {
        kp: kp.trim().parse().context("kp is not a number")?,
        kg: kg.trim().parse().context("kg is not a number")?,
    })
}

impl Args {
    fn apply(&self, mut cfg: PlanConfig) -> Result<PlanConfig> {
        if let Some(v) = self.width {
            cfg.target_width = v;
        }
        if let Some(v) = self.join_distance {
            cfg.stitch.join_distance = v;
        }
        if let Some(v) = self.join_angle {
            cfg.stitch.join_angle_deg = v;
        }
        if let Some(v) = self.epsilon {
            cfg.simplify_epsilon = v;
        }
        if let Some(v) = self.smooth {
            cfg.smooth_passes = v;
        }
        if let Some(v) = self.min_trunk {
            cfg.min_trunk_length = v;
        }
        if let Some(v) = self.tolerance {
            cfg.projection_tolerance = v;
        }
        if let Some(v) = self.snap {
            cfg.snap_strength = v;
        }
        if let Some(index) = self.group {
            cfg.active_filter = ActiveFilter::Group { index };
        }
        if let Some(pair) = &self.kp_kg {
            cfg.active_filter = parse_kp_kg(pair)?;
        }
        match self.label_mode {
            Some(ModeArg::Inline) => cfg.labels.mode = LabelMode::Inline,
            Some(ModeArg::Offset) => cfg.labels.mode = LabelMode::Offset,
            None => {}
        }
        match self.label_text {
            Some(TextArg::Index) => cfg.labels.text = LabelText::Index,
            Some(TextArg::Code) => cfg.labels.text = LabelText::Code,
            None => {}
        }
        if self.overlay {
            cfg.include_overlay = true;
        }
        if self.lanes {
            cfg.preserve_shape = false;
        }
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    let base = match &args.config {
        Some(path) => or_empty("Plan config", load_config(path).await),
        None => PlanConfig::default(),
    };
    let cfg = args.apply(base)?;

    // Independent sources load concurrently, a missing one is an empty set
    let (map, sensors, overrides) = tokio::join!(
        load_map(&args.map),
        load_sensors(&args.sensors),
        async {
            match &args.overrides {
                Some(path) => load_overrides(path).await,
                None => Ok(OverrideTable::new()),
            }
        }
    );
    let map = or_empty("Map geometry", map);
    let sensors = or_empty("Sensor list", sensors);
    let overrides = or_empty("Override table", overrides);

    let plan = tokio::task::spawn_blocking(move || build_plan(&map, &sensors, &overrides, &cfg))
        .await
        .context("plan computation panicked")?;

    let counts = &plan.diagnostics.reason_counts;
    info!(
        "override={} color={} kg={} nearest={} unplaced={} pseudo={}",
        counts.override_, counts.color, counts.kg, counts.nearest, counts.unplaced, counts.pseudo
    );

    let json = serde_json::to_string_pretty(&plan).context("serializing plan")?;
    match &args.out {
        Some(path) => {
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("writing plan to {}", path.display()))?;
            info!("Wrote plan to {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", json).context("writing plan to stdout")?;
        }
    }

    Ok(())
}
