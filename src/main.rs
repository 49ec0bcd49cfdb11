use anyhow::{Context, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;

use noa_rs::{CalcMode, IndexPolicy, ModelFile, Symbol};

#[derive(Parser, Debug)]
#[command(name = "noa")]
#[command(about = "Nonlinear observability analysis via the observability rank criterion", long_about = None)]
struct Args {
    /// Model file (JSON: name, states, fields, outputs, params, options)
    #[arg(value_name = "MODEL")]
    model: PathBuf,

    /// Index policy (permutation, combination, drift2ndOrder, drift2ndOrderWuest)
    #[arg(long)]
    policy: Option<IndexPolicy>,

    /// Lie derivative order before escalation (0 = number of inputs)
    #[arg(long)]
    lie_order: Option<usize>,

    /// Highest order escalation may reach
    #[arg(long)]
    max_order: Option<usize>,

    /// Rank computation (symbolic, numeric)
    #[arg(long)]
    rank: Option<CalcMode>,

    /// Nullspace computation (symbolic, numeric)
    #[arg(long)]
    nullspace: Option<CalcMode>,

    /// JSON parameter configuration for numeric mode
    #[arg(long)]
    config: Option<PathBuf>,

    /// Additional parameter to substitute in numeric mode
    #[arg(long = "param", value_name = "NAME")]
    params: Vec<String>,

    /// Parameter override, repeatable
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_override)]
    overrides: Vec<(String, f64)>,

    /// Seed for the prime-number parameter shuffle
    #[arg(long)]
    seed: Option<u64>,

    /// Directory for the analysis snapshot
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Stop after the rank verdict
    #[arg(long)]
    skip_decomposition: bool,
}

fn parse_override(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value for {}: {}", name, e))?;
    Ok((name.trim().to_string(), value))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut file = ModelFile::from_path(&args.model)
        .with_context(|| format!("loading model {}", args.model.display()))?;

    // CLI flags take precedence over the model file
    let options = &mut file.options;
    if let Some(policy) = args.policy {
        options.index_policy = policy;
    }
    if let Some(order) = args.lie_order {
        options.lie_order = order;
    }
    if let Some(order) = args.max_order {
        options.max_order = Some(order);
    }
    if let Some(mode) = args.rank {
        options.rank_mode = mode;
    }
    if let Some(mode) = args.nullspace {
        options.nullspace_mode = mode;
    }
    if let Some(config) = args.config {
        options.config_path = Some(config);
    }
    if let Some(seed) = args.seed {
        options.prime_seed = Some(seed);
    }
    for name in args.params {
        let symbol = Symbol::new(name);
        if !options.substitution_params.contains(&symbol) {
            options.substitution_params.push(symbol);
        }
    }
    let overrides: BTreeMap<String, f64> = args.overrides.into_iter().collect();
    file.overrides.extend(overrides);

    let mut model = file.into_model().context("building model")?;

    let summary = model.orc().context("observability rank criterion")?;
    println!(
        "{}: rank {} of {} ({})",
        model.name,
        summary.rank,
        summary.sys_order,
        if summary.weakly_locally_observable {
            "weakly locally observable"
        } else {
            "NOT weakly locally observable"
        }
    );

    if !args.skip_decomposition {
        let decomposition = model.observable_mode().context("observable mode decomposition")?;
        println!("observable: {:?}", decomposition.observable());
        for pde in decomposition.pdes() {
            println!("  {}", pde);
        }
    }

    if let Some(dir) = args.save_dir {
        let base = model
            .save(&dir)
            .with_context(|| format!("saving snapshot to {}", dir.display()))?;
        println!("snapshot: {}.json(.gz)", base.display());
    }

    Ok(())
}
