// amove.rs — Actor movement resolution loop
//
// Drives one actor's tick through PREPARE -> SWEEP -> APPLY -> (SLIDE | DONE).
// Every sweep narrows the allowed travel distance; the agreed distance is
// applied, then movement either completes, stops dead, or slides along the
// blocking surface and sweeps again. A hard portal block stops the tick
// outright. The loop is capped so degenerate corner geometry can never hang
// the simulation tick.

use log::{debug, warn};

use crate::collide::{
    collide_indoor_with_decorations, collide_indoor_with_geometry, collide_indoor_with_portals,
    collide_outdoor_with_decorations, collide_outdoor_with_models, collide_with_actor,
    collide_with_player, collide_with_sprite_objects, CollisionState, SweepOutcome,
};
use crate::fixmath::{fixpoint_mul, Vec3i};
use crate::level::{world_to_grid, Actor, IndoorLevel, OutdoorLevel, Pid, Player, SpriteObject};

/// Upper bound on SWEEP/SLIDE iterations per tick.
pub const MAX_COLLISION_ITERATIONS: u32 = 32;

/// Result of one actor's movement resolution pass.
#[derive(Debug, Clone, Copy)]
pub struct MoveResult {
    pub position: Vec3i,
    pub sector_id: u32,
    /// Last obstacle touched, for gameplay reactions (damage, messages).
    pub pid: Pid,
    /// True when the full requested displacement was consumed.
    pub completed: bool,
}

fn result_of(state: &CollisionState, completed: bool) -> MoveResult {
    MoveResult {
        position: state.position_lo,
        sector_id: state.sector_id,
        pid: state.pid,
        completed,
    }
}

/// Advances both sphere centers along the current direction and moves the
/// consumed distance from `move_distance` to `total_move_distance`.
fn apply_move(state: &mut CollisionState, distance: i32) {
    if distance > 0 {
        state.position_lo = state.position_lo.advanced_by(state.direction, distance);
        state.position_hi = state.position_lo + Vec3i::new(0, 0, state.height);
        state.total_move_distance += distance;
        state.move_distance -= distance;
    }
}

/// No sweep objected: the whole remaining distance is safe, so the pass
/// finishes at the precomputed tentative end position.
fn complete_move(state: &mut CollisionState) {
    state.position_lo = state.new_position_lo;
    state.position_hi = state.new_position_hi;
    state.total_move_distance += state.move_distance;
    state.move_distance = 0;
}

/// Removes the velocity component pointing into the obstacle just hit,
/// excludes that face from re-testing, and re-derives direction, speed and
/// the remaining travel distance from the slid velocity. Returns false when
/// no movement remains.
fn slide_along(state: &mut CollisionState) -> bool {
    if !state.hit_normal.is_zero() {
        let along = (Vec3i::dot64(state.velocity, state.hit_normal) >> 16) as i32;
        if along < 0 {
            state.velocity -= Vec3i::new(
                fixpoint_mul(state.hit_normal.x, along),
                fixpoint_mul(state.hit_normal.y, along),
                fixpoint_mul(state.hit_normal.z, along),
            );
        }
    }
    if let Pid::Face { .. } = state.pid {
        state.ignored_face = state.pid;
    }
    state.speed = state.velocity.length();
    if state.speed == 0 {
        return false; // stopped dead against the obstacle
    }
    // the slid velocity is shorter than the original request, so the
    // remaining distance shrinks with it
    state.move_distance = state.move_distance.min(state.speed - state.total_move_distance);
    if state.move_distance <= 0 {
        state.move_distance = 0;
        return false;
    }
    state.direction = state.velocity.to_fixpoint_unit(state.speed);
    state.refresh_targets();
    true
}

/// Resolves one actor's movement through an indoor (sector/portal) level.
/// `moving_actor` is the mover's own index in `actors`, excluded from the
/// actor sweep.
pub fn resolve_indoor_movement(
    level: &IndoorLevel,
    actors: &[Actor],
    moving_actor: Option<usize>,
    sprites: &[SpriteObject],
    player: Option<&Player>,
    state: &mut CollisionState,
    ignore_ethereal: bool,
) -> MoveResult {
    if state.prepare_and_check_if_stationary() {
        return result_of(state, true);
    }
    for iteration in 0..MAX_COLLISION_ITERATIONS {
        state.begin_sweep();
        collide_indoor_with_geometry(level, state, ignore_ethereal);
        collide_indoor_with_decorations(level, state);
        for idx in 0..actors.len() {
            if Some(idx) == moving_actor {
                continue;
            }
            collide_with_actor(state, actors, idx, 0);
        }
        collide_with_sprite_objects(state, sprites);
        if let Some(p) = player {
            collide_with_player(state, p);
        }
        collide_indoor_with_portals(level, state);

        match state.outcome() {
            SweepOutcome::Blocked => {
                debug!(
                    "indoor move blocked at iteration {}, pid {:?}, sector {}",
                    iteration, state.pid, state.sector_id
                );
                return result_of(state, false);
            }
            SweepOutcome::Clear => {
                complete_move(state);
                return result_of(state, true);
            }
            SweepOutcome::Limited(distance) => {
                apply_move(state, distance);
                if state.move_distance <= 0 {
                    return result_of(state, true);
                }
                if !slide_along(state) {
                    return result_of(state, false);
                }
            }
        }
    }
    warn!(
        "indoor collision resolution hit the iteration cap at {:?}",
        state.position_lo
    );
    result_of(state, false)
}

/// Resolves one actor's movement through an outdoor (model/terrain-grid)
/// level. Decoration sweeps run for every grid cell the swept bbox touches.
pub fn resolve_outdoor_movement(
    level: &OutdoorLevel,
    actors: &[Actor],
    moving_actor: Option<usize>,
    sprites: &[SpriteObject],
    player: Option<&Player>,
    state: &mut CollisionState,
    ignore_ethereal: bool,
) -> MoveResult {
    if state.prepare_and_check_if_stationary() {
        return result_of(state, true);
    }
    for iteration in 0..MAX_COLLISION_ITERATIONS {
        state.begin_sweep();
        collide_outdoor_with_models(level, state, ignore_ethereal);
        let (gx0, gy0) = world_to_grid(state.bbox.min);
        let (gx1, gy1) = world_to_grid(state.bbox.max);
        for gx in gx0.min(gx1)..=gx0.max(gx1) {
            for gy in gy0.min(gy1)..=gy0.max(gy1) {
                collide_outdoor_with_decorations(level, state, gx, gy);
            }
        }
        for idx in 0..actors.len() {
            if Some(idx) == moving_actor {
                continue;
            }
            collide_with_actor(state, actors, idx, 0);
        }
        collide_with_sprite_objects(state, sprites);
        if let Some(p) = player {
            collide_with_player(state, p);
        }

        match state.outcome() {
            SweepOutcome::Blocked => {
                debug!("outdoor move blocked at iteration {}, pid {:?}", iteration, state.pid);
                return result_of(state, false);
            }
            SweepOutcome::Clear => {
                complete_move(state);
                return result_of(state, true);
            }
            SweepOutcome::Limited(distance) => {
                apply_move(state, distance);
                if state.move_distance <= 0 {
                    return result_of(state, true);
                }
                if !slide_along(state) {
                    return result_of(state, false);
                }
            }
        }
    }
    warn!(
        "outdoor collision resolution hit the iteration cap at {:?}",
        state.position_lo
    );
    result_of(state, false)
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collide::HARD_BLOCK_DISTANCE;
    use crate::level::{BspModel, Decoration, Face, FaceAttributes, Sector};

    fn quad(x0: Vec3i, x1: Vec3i, x2: Vec3i, x3: Vec3i) -> (Vec<Vec3i>, Vec<u32>) {
        (vec![x0, x1, x2, x3], vec![0, 1, 2, 3])
    }

    // single sector, one wall at x = wall_x facing -x
    fn wall_level(wall_x: i32, attributes: FaceAttributes) -> IndoorLevel {
        let (vertices, ids) = quad(
            Vec3i::new(wall_x, -200, -200),
            Vec3i::new(wall_x, -200, 200),
            Vec3i::new(wall_x, 200, 200),
            Vec3i::new(wall_x, 200, -200),
        );
        let face = Face::from_vertices(&vertices, &ids, attributes).unwrap();
        IndoorLevel {
            vertices,
            faces: vec![face],
            sectors: vec![Sector { faces: vec![0], ..Default::default() }],
            decorations: vec![],
        }
    }

    fn actor_state(pos: Vec3i, radius: i32, velocity: Vec3i) -> CollisionState {
        let mut state = CollisionState::new();
        state.radius_lo = radius;
        state.radius_hi = radius;
        state.position_lo = pos;
        state.velocity = velocity;
        state
    }

    fn push_face(level: &mut IndoorLevel, verts: [Vec3i; 4], attributes: FaceAttributes) -> u32 {
        let base = level.vertices.len() as u32;
        level.vertices.extend(verts);
        let face = Face::from_vertices(
            &level.vertices,
            &[base, base + 1, base + 2, base + 3],
            attributes,
        )
        .unwrap();
        level.faces.push(face);
        (level.faces.len() - 1) as u32
    }

    #[test]
    fn test_stationary_actor_short_circuits() {
        let level = wall_level(50, FaceAttributes::empty());
        let mut state = actor_state(Vec3i::new(5, 5, 5), 32, Vec3i::ZERO);
        let result = resolve_indoor_movement(&level, &[], None, &[], None, &mut state, false);
        assert!(result.completed);
        assert_eq!(result.position, Vec3i::new(5, 5, 5));
        assert_eq!(state.total_move_distance, 0);
    }

    #[test]
    fn test_wall_stops_actor_at_touch_distance() {
        let level = wall_level(50, FaceAttributes::empty());
        let mut state = actor_state(Vec3i::ZERO, 32, Vec3i::new(100, 0, 0));
        let result = resolve_indoor_movement(&level, &[], None, &[], None, &mut state, false);
        // plane 50 away, radius 32: contact after 18 units, then the slide
        // removes the whole velocity
        assert!(!result.completed);
        assert_eq!(result.position, Vec3i::new(18, 0, 0));
        assert_eq!(state.total_move_distance, 18);
        assert_eq!(result.pid, Pid::Face { model: None, face: 0 });
    }

    #[test]
    fn test_ethereal_wall_passes_through() {
        let level = wall_level(50, FaceAttributes::ETHEREAL);
        let mut state = actor_state(Vec3i::ZERO, 32, Vec3i::new(100, 0, 0));
        let result = resolve_indoor_movement(&level, &[], None, &[], None, &mut state, true);
        assert!(result.completed);
        assert_eq!(result.position, Vec3i::new(100, 0, 0));
        assert_eq!(state.total_move_distance, 100);
        assert_eq!(result.pid, Pid::None);
    }

    #[test]
    fn test_perpendicular_corner_slide() {
        // walls at x = 50 (facing -x) and y = 50 (facing -y), diagonal approach
        let mut level = wall_level(50, FaceAttributes::empty());
        let wall_y = push_face(
            &mut level,
            [
                Vec3i::new(-200, 50, -200),
                Vec3i::new(200, 50, -200),
                Vec3i::new(200, 50, 200),
                Vec3i::new(-200, 50, 200),
            ],
            FaceAttributes::empty(),
        );
        level.sectors[0].faces.push(wall_y);
        assert_eq!(level.faces[wall_y as usize].normal, Vec3i::new(0, -0x10000, 0));

        let mut state = actor_state(Vec3i::ZERO, 32, Vec3i::new(100, 100, 0));
        let result = resolve_indoor_movement(&level, &[], None, &[], None, &mut state, false);
        assert!(!result.completed);
        assert!(state.total_move_distance > 0);
        // no penetration of either wall
        assert!(level.faces[0].signed_distance(result.position) >= 31);
        assert!(level.faces[wall_y as usize].signed_distance(result.position) >= 31);
    }

    #[test]
    fn test_v_corner_terminates_without_penetration() {
        // V-shaped corner: two 45-degree walls meeting at (100, 0)
        let mut level = wall_level(50, FaceAttributes::ETHEREAL); // unused filler wall
        level.sectors[0].faces.clear();
        let wall_a = push_face(
            &mut level,
            [
                Vec3i::new(60, -40, -200),
                Vec3i::new(60, -40, 200),
                Vec3i::new(100, 0, 200),
                Vec3i::new(100, 0, -200),
            ],
            FaceAttributes::empty(),
        );
        let wall_b = push_face(
            &mut level,
            [
                Vec3i::new(100, 0, -200),
                Vec3i::new(100, 0, 200),
                Vec3i::new(60, 40, 200),
                Vec3i::new(60, 40, -200),
            ],
            FaceAttributes::empty(),
        );
        level.sectors[0].faces.push(wall_a);
        level.sectors[0].faces.push(wall_b);

        let mut state = actor_state(Vec3i::ZERO, 32, Vec3i::new(100, 0, 0));
        let result = resolve_indoor_movement(&level, &[], None, &[], None, &mut state, false);
        assert!(!result.completed);
        assert!(state.total_move_distance > 0); // no livelock
        // final position keeps both walls at least a radius away
        // (one unit of fixpoint rounding tolerance)
        assert!(level.faces[wall_a as usize].signed_distance(result.position) >= 31);
        assert!(level.faces[wall_b as usize].signed_distance(result.position) >= 31);
    }

    #[test]
    fn test_portal_blocks_whole_tick_and_switches_sector() {
        // portal at x = 50 into sector 1, solid wall behind it at x = 90
        let mut level = wall_level(90, FaceAttributes::empty());
        let portal_id = push_face(
            &mut level,
            [
                Vec3i::new(50, -200, -200),
                Vec3i::new(50, -200, 200),
                Vec3i::new(50, 200, 200),
                Vec3i::new(50, 200, -200),
            ],
            FaceAttributes::PORTAL,
        );
        level.faces[portal_id as usize].sector_front = Some(0);
        level.faces[portal_id as usize].sector_back = Some(1);
        level.sectors[0].portals.push(portal_id);
        level.sectors.push(Sector::default());

        let mut state = actor_state(Vec3i::ZERO, 32, Vec3i::new(100, 0, 0));
        let result = resolve_indoor_movement(&level, &[], None, &[], None, &mut state, false);
        assert!(!result.completed);
        assert_eq!(result.position, Vec3i::ZERO); // hard block, no travel
        assert_eq!(result.sector_id, 1);
        assert_eq!(state.adjusted_move_distance, HARD_BLOCK_DISTANCE);
        assert_eq!(state.total_move_distance, 0);
    }

    #[test]
    fn test_actor_sweep_excludes_the_mover() {
        let actors = vec![
            Actor { position: Vec3i::ZERO, radius: 32, height: 60, alive: true },
            Actor { position: Vec3i::new(100, 0, 0), radius: 30, height: 60, alive: true },
        ];
        let level = IndoorLevel {
            sectors: vec![Sector::default()],
            ..Default::default()
        };
        let mut state = actor_state(Vec3i::ZERO, 32, Vec3i::new(200, 0, 0));
        let result =
            resolve_indoor_movement(&level, &actors, Some(0), &[], None, &mut state, false);
        assert!(!result.completed);
        assert_eq!(result.position, Vec3i::new(38, 0, 0)); // 100 - (32 + 30)
        assert_eq!(result.pid, Pid::Actor(1));
    }

    #[test]
    fn test_outdoor_model_stops_actor() {
        let vertices = vec![
            Vec3i::new(50, -200, -200),
            Vec3i::new(50, -200, 200),
            Vec3i::new(50, 200, 200),
            Vec3i::new(50, 200, -200),
        ];
        let face = Face::from_vertices(&vertices, &[0, 1, 2, 3], FaceAttributes::empty()).unwrap();
        let level = OutdoorLevel::new(vec![BspModel::new(vertices, vec![face])], vec![]);

        let mut state = actor_state(Vec3i::ZERO, 32, Vec3i::new(100, 0, 0));
        let result = resolve_outdoor_movement(&level, &[], None, &[], None, &mut state, false);
        assert!(!result.completed);
        assert_eq!(result.position, Vec3i::new(18, 0, 0));
        assert_eq!(state.total_move_distance, 18);
        assert_eq!(result.pid, Pid::Face { model: Some(0), face: 0 });
    }

    #[test]
    fn test_outdoor_decoration_found_via_grid() {
        // decoration two grid cells away; the bbox-driven cell walk must find it
        let dec = Decoration { origin: Vec3i::new(1000, 0, 0), radius: 20, height: 100 };
        let level = OutdoorLevel::new(vec![], vec![dec]);

        let mut state = actor_state(Vec3i::ZERO, 32, Vec3i::new(1200, 0, 0));
        let result = resolve_outdoor_movement(&level, &[], None, &[], None, &mut state, false);
        assert!(!result.completed);
        assert_eq!(result.position, Vec3i::new(948, 0, 0)); // 1000 - (32 + 20)
        assert_eq!(result.pid, Pid::Decoration(0));
    }

    #[test]
    fn test_outdoor_open_ground_completes() {
        let level = OutdoorLevel::new(vec![], vec![]);
        let mut state = actor_state(Vec3i::ZERO, 32, Vec3i::new(300, 400, 0));
        let result = resolve_outdoor_movement(&level, &[], None, &[], None, &mut state, false);
        assert!(result.completed);
        assert_eq!(result.position, Vec3i::new(300, 400, 0));
        assert_eq!(state.total_move_distance, 500);
    }
}
