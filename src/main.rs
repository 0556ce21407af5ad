use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;

use cachemesh::sim::top::{SimOptions, SimTop};

#[derive(Parser)]
#[command(version, about)]
struct CachemeshArgs {
    #[arg(help = "Path to config.toml; defaults apply when omitted")]
    config_path: Option<PathBuf>,
    #[arg(long, help = "Override number of core lanes")]
    num_lanes: Option<usize>,
    #[arg(long, help = "Override number of cache units")]
    num_units: Option<usize>,
    #[arg(long, help = "Force the translation stage on")]
    xlat: bool,
    #[arg(long, help = "Override the timeout, in cycles")]
    timeout: Option<u64>,
}

pub fn main() -> Result<()> {
    env_logger::init();

    let argv = CachemeshArgs::parse();
    let mut opts = match &argv.config_path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("cannot read config {}", path.display()))?;
            SimOptions::from_toml(&text)?
        }
        None => SimOptions::default(),
    };
    if let Some(num_lanes) = argv.num_lanes {
        opts.cluster.num_lanes = num_lanes;
    }
    if let Some(num_units) = argv.num_units {
        opts.cluster.num_units = num_units;
    }
    if argv.xlat {
        opts.cluster.xlat_enable = true;
    }
    if let Some(timeout) = argv.timeout {
        opts.sim.timeout = timeout;
    }

    let mut top = SimTop::new(&opts)?;
    let report = top.run()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
