use std::fs::{self, File};
use std::io::BufReader;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use polygon2bins::config::Config;
use polygon2bins::{build_database, BinGrid, NodeGrid};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = Config::parse();
    let started = Instant::now();

    // Configuration errors surface before any polygon is read.
    let grid = BinGrid::from_degrees(cfg.bin_size)?;
    let nodes = NodeGrid::read_file(&cfg.nodes, &grid)
        .with_context(|| format!("reading node grid {}", cfg.nodes.display()))?;
    info!(
        "{}° bins: {} x {} ({} bins), node grid {} x {}",
        cfg.bin_size,
        grid.nx,
        grid.ny,
        grid.n_bins(),
        nodes.nx,
        nodes.ny
    );

    let source = File::open(&cfg.polygons)
        .with_context(|| format!("opening polygon file {}", cfg.polygons.display()))?;
    let (db, stats) = build_database(BufReader::new(source), &grid, &nodes, cfg.log_every)
        .with_context(|| format!("building bins from {}", cfg.polygons.display()))?;

    if let Some(dir) = cfg.prefix.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    shorebin::write_files(&cfg.prefix, &db)
        .with_context(|| format!("writing database {}.*", cfg.prefix.display()))?;
    info!(
        "wrote {}.{{bin,seg,pt,par}}: {} segments, {} points",
        cfg.prefix.display(),
        db.header.n_segments,
        db.header.n_points
    );

    if cfg.verify {
        let back = shorebin::read_files(&cfg.prefix)
            .with_context(|| format!("reading back {}.*", cfg.prefix.display()))?;
        back.validate().context("written database failed validation")?;
        anyhow::ensure!(back == db, "written database differs from the one built");
        info!("verified {} bins", back.header.n_bins);
    }

    stats.log_summary();
    info!("done in {:.2}s", started.elapsed().as_secs_f64());

    Ok(())
}
