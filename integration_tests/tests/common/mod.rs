#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Once};

use map_core::{
    detect_adjacencies, load_provinces, Coordinate, MapConfig, ProvinceId, ProvinceRecord,
};

static INIT: Once = Once::new();

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Point `MAP_CONFIG_PATH` at the test config once per test binary.
pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = fixture_path("test_map_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test map config at {}",
            config_path.display()
        );

        std::env::set_var("MAP_CONFIG_PATH", &config_path);
    });
}

pub fn test_config() -> Arc<MapConfig> {
    let path = fixture_path("test_map_config.json");
    match MapConfig::from_file(&path) {
        Ok(config) => Arc::new(config),
        Err(err) => panic!("test map config should load: {err}"),
    }
}

/// The fixture map with adjacencies detected: a 3x2 block of 100-unit
/// squares (ids 1-6), a detached island (7) and a duplicate of id 2.
pub fn fixture_map() -> Vec<ProvinceRecord> {
    let mut provinces = match load_provinces(&fixture_path("provinces.json")) {
        Ok(provinces) => provinces,
        Err(err) => panic!("fixture provinces should load: {err}"),
    };
    detect_adjacencies(&mut provinces, 0.001);
    provinces
}

pub fn square(id: ProvinceId, x: f64, y: f64, size: f64) -> ProvinceRecord {
    ProvinceRecord::new(
        id,
        format!("Square {id}"),
        0,
        vec![
            Coordinate::new(x, y),
            Coordinate::new(x + size, y),
            Coordinate::new(x + size, y + size),
            Coordinate::new(x, y + size),
        ],
    )
}
