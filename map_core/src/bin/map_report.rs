use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use serde::Serialize;
use tracing::{error, info, warn};

use map_core::boundary::remove_duplicate_points;
use map_core::{
    detect_adjacencies, load_map_config_from_env, load_provinces, GridStats, ProvinceGraph,
    ProvinceId, ProvinceSpatialIndex, QuadTreeIndex,
};

#[derive(Debug, Serialize)]
struct MapReport {
    provinces: usize,
    rejected: Vec<ProvinceId>,
    adjacencies: usize,
    average_neighbors: f64,
    most_connected: Option<ProvinceId>,
    graph_valid: bool,
    validation_issues: usize,
    grid: GridSummary,
    quadtree_nodes: usize,
    quadtree_depth: u32,
}

#[derive(Debug, Serialize)]
struct GridSummary {
    cells_used: usize,
    max_per_cell: usize,
    avg_per_cell: f64,
    load_factor: f64,
}

impl From<GridStats> for GridSummary {
    fn from(stats: GridStats) -> Self {
        Self {
            cells_used: stats.total_cells_used,
            max_per_cell: stats.max_provinces_per_cell,
            avg_per_cell: stats.avg_provinces_per_cell,
            load_factor: stats.load_factor,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let Some(path) = env::args_os().nth(1).map(PathBuf::from) else {
        error!(target: "map_core::report", "usage: map_report <provinces.json>");
        return ExitCode::from(2);
    };

    let (config, config_path) = load_map_config_from_env();
    let config_source = config_path
        .as_ref()
        .map_or_else(|| "builtin".to_string(), |p| p.display().to_string());
    info!(
        target: "map_core::report",
        provinces = %path.display(),
        config = %config_source,
        "map_report.start"
    );

    let mut provinces = match load_provinces(&path) {
        Ok(provinces) => provinces,
        Err(err) => {
            error!(target: "map_core::report", error = %err, "map_report.load_failed");
            return ExitCode::FAILURE;
        }
    };

    for province in &mut provinces {
        remove_duplicate_points(&mut province.boundary, config.geometry.duplicate_point_tolerance);
        province.normalize();
    }
    let adjacencies = detect_adjacencies(&mut provinces, config.geometry.adjacency_tolerance);

    let grid = ProvinceSpatialIndex::from_config(&config);
    for province in &provinces {
        grid.insert_province(province.id, province.center.x, province.center.y);
    }
    let mut quadtree = QuadTreeIndex::from_config(&config);
    quadtree.build(&provinces);

    let mut graph = ProvinceGraph::new();
    let build = graph.build_owned(provinces);
    if !build.is_clean() {
        warn!(
            target: "map_core::report",
            rejected = build.rejected.len(),
            "map_report.duplicates_rejected"
        );
    }
    let issues = graph.validation_issues();
    let graph_valid = graph.validate();

    let report = MapReport {
        provinces: graph.len(),
        rejected: build.rejected.iter().map(|r| r.id).collect(),
        adjacencies,
        average_neighbors: graph.average_neighbors(),
        most_connected: graph.most_connected_province(),
        graph_valid,
        validation_issues: issues.len(),
        grid: grid.stats().into(),
        quadtree_nodes: quadtree.node_count(),
        quadtree_depth: quadtree.max_depth(),
    };

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(err) => {
            error!(target: "map_core::report", error = %err, "map_report.encode_failed");
            return ExitCode::FAILURE;
        }
    }

    info!(
        target: "map_core::report",
        provinces = report.provinces,
        adjacencies,
        graph_valid,
        "map_report.done"
    );
    if graph_valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
