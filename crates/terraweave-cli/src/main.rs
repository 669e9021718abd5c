//! terraweave: generate a stitched grid of terrain tiles and report on it.
//!
//! Run with: `cargo run -p terraweave-cli -- --rows 4 --columns 4`
//!
//! With `--watch` the grid stays alive and edits to `config.ron` are
//! regenerated through the debounced scheduler.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use terraweave_config::{CONFIG_FILE, CliArgs, Config, default_config_dir};
use terraweave_terrain::{TileCoord, TileGrid};
use tracing::{error, info, warn};

/// How long each watch iteration waits for settled requests.
const WATCH_POLL: Duration = Duration::from_millis(250);

fn main() -> ExitCode {
    let args = CliArgs::parse();

    // Resolve config directory
    let config_dir = args
        .config
        .clone()
        .or_else(default_config_dir)
        .unwrap_or_else(|| PathBuf::from("terraweave"));

    // Load or create config, then apply CLI overrides
    let file_config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    let mut config = file_config.clone();
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    terraweave_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    if let Err(e) = config.validate() {
        error!("{e}");
        return ExitCode::from(2);
    }

    let terrain = config.terrain_settings();
    let grid_settings = config.grid_settings();
    info!(
        "Grid: {}x{} tiles | resolution {} | tile size {} | preset {}",
        grid_settings.columns,
        grid_settings.rows,
        terrain.resolution,
        terrain.tile_size,
        config.preset.name,
    );
    info!(
        "Layers: {} | erosion: {} | smoothing: {}",
        terrain.layers.len(),
        if terrain.erosion.enabled { "on" } else { "off" },
        if terrain.smoothing.enabled { "on" } else { "off" },
    );

    let mut grid = match TileGrid::in_memory(&grid_settings, &terrain) {
        Ok(grid) => grid,
        Err(e) => {
            error!("Failed to build grid: {e}");
            return ExitCode::FAILURE;
        }
    };

    let generated = grid.generate_all();
    let seam_before = grid.max_seam_error();
    let blended = grid.blend_all(&config.blend_settings());
    let seam_after = grid.max_seam_error();

    for (coord, e) in generated.failures.iter().chain(&blended.failures) {
        warn!("Tile {coord}: {e}");
    }

    let (lo, hi) = grid
        .cells()
        .iter()
        .filter_map(|cell| cell.heights().ok())
        .map(|field| field.min_max())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), (a, b)| {
            (lo.min(a), hi.max(b))
        });

    info!(
        "Generated {} tiles in {:.1} ms, blended {} edges in {:.1} ms",
        generated.tiles_generated,
        generated.elapsed.as_secs_f64() * 1000.0,
        blended.edges_blended,
        blended.elapsed.as_secs_f64() * 1000.0,
    );
    info!("Height range: [{lo:.4}, {hi:.4}]");
    info!("Max seam error: {seam_before:.6} before blending, {seam_after:.6} after");

    let failed = generated.failures.len() + blended.failures.len();
    if args.watch {
        watch(&mut grid, &config_dir, &args, file_config, config);
    }
    grid.delete();

    if failed > 0 {
        error!("{failed} tile operations failed");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Reload the config until the process is stopped, requesting regeneration of
/// every tile whose settings changed.
///
/// `file_config` is the config as read from disk, before CLI overrides, so
/// reloads only fire on real edits.
fn watch(
    grid: &mut TileGrid,
    config_dir: &Path,
    args: &CliArgs,
    mut file_config: Config,
    mut config: Config,
) {
    let scheduler = match TileGrid::regeneration_scheduler(config.debounce()) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!("Failed to start regeneration worker: {e}");
            return;
        }
    };
    info!(
        "Watching {} (debounce {} ms)",
        config_dir.join(CONFIG_FILE).display(),
        config.generation.debounce_ms
    );

    loop {
        match file_config.reload(config_dir) {
            Ok(Some(reloaded)) => {
                let mut next = reloaded.clone();
                next.apply_cli_overrides(args);
                file_config = reloaded;
                if let Err(e) = next.validate() {
                    warn!("Ignoring invalid config: {e}");
                } else if next.grid_settings() != config.grid_settings() {
                    warn!("Grid size changes take effect after a restart");
                } else {
                    let terrain = next.terrain_settings();
                    let reblend = next.blend_settings() != config.blend_settings();
                    let changed: Vec<TileCoord> = grid
                        .cells()
                        .iter()
                        .filter(|cell| reblend || *cell.settings() != terrain)
                        .map(|cell| cell.coord())
                        .collect();
                    for &coord in &changed {
                        if let Some(cell) = grid.cell_mut(coord) {
                            *cell.settings_mut() = terrain.clone();
                        }
                        scheduler.request(coord);
                    }
                    info!("Config changed, {} tiles queued for regeneration", changed.len());
                    config = next;
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Config reload failed: {e}"),
        }

        let report = grid.wait_settled(&scheduler, WATCH_POLL, &config.blend_settings());
        if report.tiles_generated > 0 || !report.is_clean() {
            info!(
                "Regenerated {} tiles ({} edges, {} failures), max seam error {:.6}",
                report.tiles_generated,
                report.edges_blended,
                report.failures.len(),
                grid.max_seam_error(),
            );
        }
    }
}
