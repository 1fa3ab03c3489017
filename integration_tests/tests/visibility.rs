mod common;

use bevy_ecs::prelude::*;
use map_core::{
    build_visibility_schedule, Coordinate, FogOfWar, MapClock, MapConfigHandle, Observer,
    PlayerId, TerrainCell, TerrainCellType, TerrainGrid, VisibilityState,
};

const RED: PlayerId = PlayerId(1);
const BLUE: PlayerId = PlayerId(2);

/// 1000x1000 world in 10-unit cells with a mountain ridge along cell column 30.
fn ridge_world() -> World {
    let mut terrain = TerrainGrid::new(100, 100, 10.0);
    terrain.fill_region(30, 0, 30, 99, TerrainCell::new(TerrainCellType::Mountain, 600.0));

    let mut world = World::new();
    world.insert_resource(FogOfWar::default());
    world.insert_resource(MapConfigHandle::new(common::test_config()));
    world.insert_resource(MapClock(0.0));
    world.insert_resource(terrain);
    world
}

#[test]
fn ridge_hides_the_far_side_until_the_observer_crosses() {
    let mut world = ridge_world();
    let tower = world
        .spawn(Observer::new(RED, Coordinate::new(205.0, 505.0), "Watchtower"))
        .id();
    let mut schedule = build_visibility_schedule();
    schedule.run(&mut world);

    {
        let fog = world.resource::<FogOfWar>();
        assert!(fog.is_position_visible(RED, 255.0, 505.0));
        assert!(fog.is_position_visible(RED, 305.0, 505.0));
        assert!(!fog.is_position_explored(RED, 355.0, 505.0));

        let ridge = fog
            .grid(RED)
            .and_then(|grid| grid.cell(30, 50))
            .expect("ridge cell inside the grid");
        assert_eq!(ridge.explored_terrain_type, TerrainCellType::Mountain);
    }

    world.resource_mut::<MapClock>().0 = 1.0;
    if let Some(mut observer) = world.get_mut::<Observer>(tower) {
        observer.position = Coordinate::new(505.0, 505.0);
    }
    schedule.run(&mut world);

    let fog = world.resource::<FogOfWar>();
    assert!(fog.is_position_visible(RED, 355.0, 505.0));
    assert_eq!(fog.visibility_state(RED, 255.0, 505.0), VisibilityState::Explored);
    assert!(fog.is_position_explored(RED, 255.0, 505.0));
    assert!(!fog.is_position_visible(RED, 255.0, 505.0));
}

#[test]
fn players_do_not_share_fog() {
    let mut world = ridge_world();
    world.spawn(Observer::new(RED, Coordinate::new(105.0, 105.0), "Infantry"));
    world.spawn(Observer::new(BLUE, Coordinate::new(805.0, 805.0), "Infantry"));
    build_visibility_schedule().run(&mut world);

    let fog = world.resource::<FogOfWar>();
    assert_eq!(fog.players(), vec![RED, BLUE]);
    assert!(fog.is_position_visible(RED, 105.0, 105.0));
    assert!(!fog.is_position_explored(RED, 805.0, 805.0));
    assert!(fog.is_position_visible(BLUE, 805.0, 805.0));
    assert!(!fog.is_position_explored(BLUE, 105.0, 105.0));
}

#[test]
fn explored_cells_survive_many_ticks_until_reset() {
    let mut world = ridge_world();
    let scout = world
        .spawn(Observer::new(RED, Coordinate::new(505.0, 505.0), "Scout"))
        .id();
    let mut schedule = build_visibility_schedule();
    schedule.run(&mut world);
    assert!(world.despawn(scout));

    for tick in 1..=5 {
        world.resource_mut::<MapClock>().0 = f64::from(tick);
        schedule.run(&mut world);
        let fog = world.resource::<FogOfWar>();
        assert_eq!(fog.visibility_state(RED, 505.0, 505.0), VisibilityState::Explored);
    }

    let (unexplored, explored, visible) = world
        .resource::<FogOfWar>()
        .grid(RED)
        .map(|grid| grid.count_by_state())
        .expect("player grid exists");
    assert_eq!(visible, 0);
    assert!(explored > 0);
    assert_eq!(unexplored + explored, 100 * 100);

    world.resource_mut::<FogOfWar>().reset_player(RED);
    let fog = world.resource::<FogOfWar>();
    assert!(!fog.is_position_explored(RED, 505.0, 505.0));
    let raster = fog.grid(RED).map(|grid| grid.to_byte_raster()).unwrap_or_default();
    assert!(raster.iter().all(|&state| state == 0));
}
