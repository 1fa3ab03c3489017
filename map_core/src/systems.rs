//! Fog-of-war tick as ECS systems.
//!
//! Two systems run in sequence each tick:
//! 1. `demote_visible_cells` - Visible cells become Explored for every player
//! 2. `reveal_observer_areas` - Every observer reveals what it can see

use bevy_ecs::prelude::*;

use crate::{
    fog_of_war::{FogOfWar, PlayerId},
    geometry::Coordinate,
    line_of_sight::LineOfSightCalculator,
    map_config::MapConfigHandle,
    terrain::TerrainGrid,
};

/// Game time stamped onto revealed cells.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq)]
pub struct MapClock(pub f64);

/// Global multiplier on vision ranges (fog, rain, night).
#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct WeatherState {
    pub modifier: f64,
}

impl Default for WeatherState {
    fn default() -> Self {
        Self { modifier: 1.0 }
    }
}

/// Something that reveals fog for its player.
#[derive(Component, Debug, Clone, PartialEq)]
pub struct Observer {
    pub player: PlayerId,
    pub position: Coordinate,
    /// Key into the configured sight ranges.
    pub unit_kind: String,
}

impl Observer {
    pub fn new(player: PlayerId, position: Coordinate, unit_kind: impl Into<String>) -> Self {
        Self {
            player,
            position,
            unit_kind: unit_kind.into(),
        }
    }
}

/// Step 1: demote every player's Visible cells to Explored.
pub fn demote_visible_cells(mut fog: ResMut<FogOfWar>, clock: Res<MapClock>) {
    let mut demoted = 0;
    for player in fog.players() {
        demoted += fog.update_visibility(player, clock.0);
    }
    tracing::info!(
        target: "map_core::fog_of_war",
        time = clock.0,
        demoted,
        "fog_of_war.step1_demote_visible"
    );
}

/// Step 2: reveal around every observer. With a terrain grid present the
/// reveal follows line of sight; without one it is a plain circle.
pub fn reveal_observer_areas(
    mut fog: ResMut<FogOfWar>,
    config: Res<MapConfigHandle>,
    clock: Res<MapClock>,
    weather: Option<Res<WeatherState>>,
    terrain: Option<Res<TerrainGrid>>,
    observers: Query<&Observer>,
) {
    let cfg = config.0.as_ref();
    let calculator = LineOfSightCalculator::from_config(cfg);
    let weather = weather.map_or(1.0, |state| state.modifier);
    let terrain = terrain.as_deref();
    let time = clock.0;

    let _span = tracing::debug_span!(
        target: "map_core::fog_of_war",
        "reveal_observer_areas",
        time,
        los = terrain.is_some()
    )
    .entered();

    let mut observer_count = 0usize;
    let mut revealed = 0usize;
    for observer in observers.iter() {
        observer_count += 1;
        fog.ensure_player(observer.player, &cfg.fog_of_war);

        let base_range = cfg.sight_range_for(&observer.unit_kind);
        let range =
            calculator.calculate_vision_range(observer.position, terrain, base_range, weather);
        revealed += match terrain {
            Some(grid) => fog.reveal_with_line_of_sight(
                observer.player,
                &calculator,
                grid,
                observer.position,
                range,
                time,
            ),
            None => fog.reveal_area(
                observer.player,
                observer.position.x,
                observer.position.y,
                range,
                time,
            ),
        };
    }

    tracing::info!(
        target: "map_core::fog_of_war",
        time,
        observers = observer_count,
        revealed,
        "fog_of_war.step2_reveal_observers"
    );
}

/// The tick schedule: demote, then reveal.
pub fn build_visibility_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems((demote_visible_cells, reveal_observer_areas).chain());
    schedule
}
