use tidalsim::{ScenarioConfig, ScenarioFile, Scenario};
use tidalsim::{bench_gravity, bench_theta};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(about = "Tidal disruption of a dwarf galaxy in a static Milky Way potential")]
struct Args {
    /// Scenario parameter file (JSON or YAML)
    #[arg(short, long = "file", default_value = "orphan_model_2.json")]
    file_name: String,

    /// Write the histogram here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Dump the final bodies as JSON
    #[arg(long)]
    bodies: Option<PathBuf>,

    /// Size of the worker pool (defaults to one per core)
    #[arg(long)]
    threads: Option<usize>,

    /// Run the gravity benchmarks instead of a scenario
    #[arg(long)]
    bench: bool,
}

/// Look for `file_name` as given, then under the crate's `scenarios/`
fn resolve_scenario_path(file_name: &str) -> PathBuf {
    let given = PathBuf::from(file_name);
    if given.exists() {
        return given;
    }
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios").join(file_name)
}

// load here to keep main clean
fn load_scenario(path: &Path) -> Result<ScenarioConfig> {
    let file = File::open(path).with_context(|| format!("failed to open scenario {}", path.display()))?;
    let reader = BufReader::new(file);

    let is_yaml = matches!(path.extension().and_then(|e| e.to_str()), Some("yaml" | "yml"));
    let scenario_file: ScenarioFile = if is_yaml {
        serde_yaml::from_reader(reader).with_context(|| format!("failed to parse {}", path.display()))?
    } else {
        serde_json::from_reader(reader).with_context(|| format!("failed to parse {}", path.display()))?
    };

    Ok(scenario_file.parameters)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure the thread pool")?;
    }

    if args.bench {
        bench_gravity();
        bench_theta();
        return Ok(());
    }

    let path = resolve_scenario_path(&args.file_name);
    info!("loading scenario {}", path.display());
    let scenario_cfg = load_scenario(&path)?;

    let scenario = Scenario::build_scenario(&scenario_cfg)?;
    let output = scenario.run()?;

    match &args.output {
        Some(out_path) => {
            let file = File::create(out_path).with_context(|| format!("failed to create {}", out_path.display()))?;
            let mut writer = BufWriter::new(file);
            writeln!(writer, "{}", output.histogram)?;
            writer.flush()?;
            info!("histogram written to {}", out_path.display());
        }
        None => println!("{}", output.histogram),
    }

    if let Some(bodies_path) = &args.bodies {
        let file = File::create(bodies_path).with_context(|| format!("failed to create {}", bodies_path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &output.system)?;
        info!("final state written to {}", bodies_path.display());
    }

    Ok(())
}
