// collide.rs — Swept collision tests and obstacle sweeps
//
// The actor body is two spheres, "feet" (lo) and "head" (hi). A resolution
// pass fills a CollisionState, then runs the obstacle sweeps; every sweep
// narrows the allowed travel distance (a running minimum) or, for portals,
// vetoes the move outright. Sweeps never mutate level data.

use crate::fixmath::{fixpoint_div, fixpoint_mul, int_sqrt, normalize_to_fixpoint, BBoxi, Vec3i};
use crate::level::{Actor, Face, IndoorLevel, OutdoorLevel, Pid, Player, SpriteObject};

// ============================================================
// Constants
// ============================================================

/// Sentinel travel distance stored on a hard block (an impassable
/// portal hit). Larger than any reachable move distance.
pub const HARD_BLOCK_DISTANCE: i32 = 0xFFFFFF;

// ============================================================
// Collision state
// ============================================================

/// Per-actor mutable record for one movement resolution pass. Long-lived
/// and reused every tick; contents are stale between ticks and must not
/// be read before `prepare_and_check_if_stationary` runs again.
#[derive(Debug, Clone, Default)]
pub struct CollisionState {
    /// Check the hi sphere too. If unset, only the lo sphere is swept.
    pub check_hi: bool,
    pub radius_lo: i32,
    pub radius_hi: i32,
    /// Vertical offset from the lo sphere center to the hi sphere center.
    pub height: i32,
    pub position_lo: Vec3i,
    pub position_hi: Vec3i,
    pub new_position_lo: Vec3i,
    pub new_position_hi: Vec3i,
    /// Requested displacement for the tick, world units.
    pub velocity: Vec3i,
    /// Movement direction, fixpoint unit vector. Valid while speed != 0.
    pub direction: Vec3i,
    pub speed: i32,
    /// Distance consumed across resolution iterations, starts at 0.
    pub total_move_distance: i32,
    /// Distance remaining to attempt in the current iteration.
    pub move_distance: i32,
    /// Distance actually permitted after sweeping, running minimum.
    /// Set to HARD_BLOCK_DISTANCE on a portal veto.
    pub adjusted_move_distance: i32,
    pub sector_id: u32,
    /// Last obstacle collided with, for gameplay reactions.
    pub pid: Pid,
    /// Face excluded from testing, normally the one the actor rests on.
    pub ignored_face: Pid,
    /// Fixpoint unit normal of the nearest registered obstacle,
    /// consumed by the slide step.
    pub hit_normal: Vec3i,
    /// Swept-volume bounds used to prune candidate faces and objects.
    pub bbox: BBoxi,
}

/// Outcome of one full sweep pass, derived from the narrowed distance.
/// A hard block dominates any soft limit registered in the same pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// No sweep proposed a restriction; the full remaining distance is safe.
    Clear,
    /// A blocking obstacle allows only this much travel.
    Limited(i32),
    /// Hard veto; no travel this tick.
    Blocked,
}

impl CollisionState {
    pub fn new() -> CollisionState {
        CollisionState::default()
    }

    /// Re-initializes the state for this tick's pass from `position_lo`,
    /// `velocity` and the body parameters. Returns true if the actor is
    /// stationary (or degenerate), in which case all sweeps are skipped.
    pub fn prepare_and_check_if_stationary(&mut self) -> bool {
        self.total_move_distance = 0;
        self.pid = Pid::None;
        self.hit_normal = Vec3i::ZERO;
        self.speed = self.velocity.length();
        if self.speed == 0 || self.radius_lo <= 0 {
            self.direction = Vec3i::ZERO;
            self.move_distance = 0;
            self.adjusted_move_distance = 0;
            return true;
        }
        self.direction = self.velocity.to_fixpoint_unit(self.speed);
        self.move_distance = self.speed;
        self.adjusted_move_distance = self.speed;
        self.position_hi = self.position_lo + Vec3i::new(0, 0, self.height);
        // the full-tick end position is exact here, no fixpoint rounding
        self.set_targets(self.position_lo + self.velocity);
        false
    }

    /// Recomputes the tentative end positions and the swept bbox from the
    /// current position, direction and remaining distance. Called by the
    /// resolution loop after every position or direction change.
    pub fn refresh_targets(&mut self) {
        self.set_targets(self.position_lo.advanced_by(self.direction, self.move_distance));
    }

    fn set_targets(&mut self, end_lo: Vec3i) {
        self.new_position_lo = end_lo;
        self.new_position_hi = self.new_position_lo + Vec3i::new(0, 0, self.height);
        let r = if self.check_hi {
            self.radius_lo.max(self.radius_hi)
        } else {
            self.radius_lo
        };
        let mut bbox = BBoxi::from_points([self.position_lo, self.new_position_lo]);
        if self.check_hi {
            bbox.add_point(self.position_hi);
            bbox.add_point(self.new_position_hi);
        }
        self.bbox = bbox.expanded(r);
    }

    /// Resets the running minimum for one sweep iteration.
    pub fn begin_sweep(&mut self) {
        self.adjusted_move_distance = self.move_distance;
        self.hit_normal = Vec3i::ZERO;
    }

    /// Folds a positive sweep result into the running minimum. Once the
    /// pass is hard-blocked, soft hits are ignored.
    pub fn register_hit(&mut self, distance: i32, pid: Pid, normal: Vec3i) {
        if self.adjusted_move_distance >= HARD_BLOCK_DISTANCE {
            return;
        }
        if distance < self.adjusted_move_distance {
            self.adjusted_move_distance = distance;
            self.pid = pid;
            self.hit_normal = normal;
        }
    }

    /// Hard veto: no travel this iteration, regardless of soft limits.
    pub fn block(&mut self, pid: Pid) {
        self.adjusted_move_distance = HARD_BLOCK_DISTANCE;
        self.pid = pid;
        self.hit_normal = Vec3i::ZERO;
    }

    pub fn outcome(&self) -> SweepOutcome {
        if self.adjusted_move_distance >= HARD_BLOCK_DISTANCE {
            SweepOutcome::Blocked
        } else if self.adjusted_move_distance < self.move_distance {
            SweepOutcome::Limited(self.adjusted_move_distance)
        } else {
            SweepOutcome::Clear
        }
    }
}

// ============================================================
// Plane projection and point-in-polygon
// ============================================================

/// Principal plane a face projects onto, picked by the dominant
/// component of its normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainPlane {
    XY,
    YZ,
    ZX,
}

pub fn dominant_plane(normal: Vec3i) -> MainPlane {
    let ax = normal.x.abs();
    let ay = normal.y.abs();
    let az = normal.z.abs();
    if az >= ax && az >= ay {
        MainPlane::XY
    } else if ax >= ay {
        MainPlane::YZ
    } else {
        MainPlane::ZX
    }
}

fn project(p: Vec3i, plane: MainPlane) -> (i32, i32) {
    match plane {
        MainPlane::XY => (p.x, p.y),
        MainPlane::YZ => (p.y, p.z),
        MainPlane::ZX => (p.z, p.x),
    }
}

/// Crossing-number point-in-polygon test on the projected vertex ring.
/// A point on the boundary counts as inside, so adjacent faces leave no
/// gap between them.
fn point_inside_projected(pool: &[Vec3i], face: &Face, point: Vec3i) -> bool {
    let n = face.vertices.len();
    if n < 3 {
        return false;
    }
    let plane = dominant_plane(face.normal);
    let (px, py) = project(point, plane);
    let mut inside = false;
    let (mut x1, mut y1) = project(pool[face.vertices[n - 1] as usize], plane);
    for i in 0..n {
        let (x2, y2) = project(pool[face.vertices[i] as usize], plane);
        let cross = (x2 - x1) as i64 * (py - y1) as i64 - (y2 - y1) as i64 * (px - x1) as i64;
        if cross == 0
            && px >= x1.min(x2)
            && px <= x1.max(x2)
            && py >= y1.min(y2)
            && py <= y1.max(y2)
        {
            return true;
        }
        if (y1 > py) != (y2 > py) && (cross > 0) == (y2 > y1) {
            inside = !inside;
        }
        x1 = x2;
        y1 = y2;
    }
    inside
}

pub fn is_projected_point_inside_indoor_face(
    level: &IndoorLevel,
    face: &Face,
    point: Vec3i,
) -> bool {
    point_inside_projected(&level.vertices, face, point)
}

pub fn is_projected_point_inside_outdoor_face(
    level: &OutdoorLevel,
    model_index: usize,
    face: &Face,
    point: Vec3i,
) -> bool {
    match level.models.get(model_index) {
        Some(model) => point_inside_projected(&model.vertices, face, point),
        None => false,
    }
}

// ============================================================
// Swept sphere-vs-face
// ============================================================

/// Travel distance along `dir` at which a sphere at `pos` first touches
/// the face, where touching means the center-to-plane distance equals
/// `radius`. None when the sphere is receding, moving parallel without
/// contact, fully behind the face, or the touch point falls outside the
/// polygon's footprint.
fn collide_sphere_with_face(
    pool: &[Vec3i],
    face: &Face,
    pos: Vec3i,
    radius: i32,
    dir: Vec3i,
    ignore_ethereal: bool,
) -> Option<i32> {
    if radius <= 0 {
        return None;
    }
    if ignore_ethereal && face.is_ethereal() {
        return None;
    }
    let dist = face.signed_distance(pos);
    let cos = face.cos_direction(dir);
    if dist > radius {
        if cos >= 0 {
            return None; // receding or parallel, not yet touching
        }
        let t64 = (((dist - radius) as i64) << 16) / (-cos) as i64;
        if t64 >= HARD_BLOCK_DISTANCE as i64 {
            return None; // grazing approach, contact beyond any reachable move
        }
        let t = t64 as i32;
        let advanced = pos.advanced_by(dir, t);
        let touch = Vec3i::new(
            advanced.x - fixpoint_mul(face.normal.x, radius),
            advanced.y - fixpoint_mul(face.normal.y, radius),
            advanced.z - fixpoint_mul(face.normal.z, radius),
        );
        if point_inside_projected(pool, face, touch) {
            Some(t)
        } else {
            None
        }
    } else if dist >= -radius {
        // already inside the radius slab; contact at zero distance if
        // still moving into the plane
        if cos >= 0 {
            return None;
        }
        let touch = Vec3i::new(
            pos.x - fixpoint_mul(face.normal.x, dist),
            pos.y - fixpoint_mul(face.normal.y, dist),
            pos.z - fixpoint_mul(face.normal.z, dist),
        );
        if point_inside_projected(pool, face, touch) {
            Some(0)
        } else {
            None
        }
    } else {
        None // fully behind the face
    }
}

pub fn collide_indoor_with_face(
    level: &IndoorLevel,
    face: &Face,
    pos: Vec3i,
    radius: i32,
    dir: Vec3i,
    ignore_ethereal: bool,
) -> Option<i32> {
    collide_sphere_with_face(&level.vertices, face, pos, radius, dir, ignore_ethereal)
}

pub fn collide_outdoor_with_face(
    level: &OutdoorLevel,
    model_index: usize,
    face: &Face,
    pos: Vec3i,
    radius: i32,
    dir: Vec3i,
    ignore_ethereal: bool,
) -> Option<i32> {
    let model = level.models.get(model_index)?;
    collide_sphere_with_face(&model.vertices, face, pos, radius, dir, ignore_ethereal)
}

// ============================================================
// Swept point-vs-face
// ============================================================

/// Point-body variant: the travel distance is the exact ray/plane
/// intersection. `move_distance` is the nearest-hit-so-far accumulator
/// across faces; it is only ever decreased, and left untouched on a
/// negative result.
fn collide_point_with_face(
    pool: &[Vec3i],
    face: &Face,
    pos: Vec3i,
    dir: Vec3i,
    move_distance: &mut i32,
) -> bool {
    let cos = face.cos_direction(dir);
    if cos == 0 {
        return false; // moving parallel to the plane
    }
    let dist_fp = face.signed_distance_fp(pos);
    // on the plane itself, any non-parallel motion crosses at t = 0
    if dist_fp != 0 && (cos > 0) == (dist_fp > 0) {
        return false; // moving away from the plane
    }
    let t64 = -dist_fp / cos as i64;
    if t64 < 0 || t64 > *move_distance as i64 {
        return false;
    }
    let t = t64 as i32;
    let point = pos.advanced_by(dir, t);
    if !point_inside_projected(pool, face, point) {
        return false;
    }
    *move_distance = t;
    true
}

pub fn collide_point_indoor_with_face(
    level: &IndoorLevel,
    face: &Face,
    pos: Vec3i,
    dir: Vec3i,
    move_distance: &mut i32,
) -> bool {
    collide_point_with_face(&level.vertices, face, pos, dir, move_distance)
}

pub fn collide_point_outdoor_with_face(
    level: &OutdoorLevel,
    model_index: usize,
    face: &Face,
    pos: Vec3i,
    dir: Vec3i,
    move_distance: &mut i32,
) -> bool {
    match level.models.get(model_index) {
        Some(model) => collide_point_with_face(&model.vertices, face, pos, dir, move_distance),
        None => false,
    }
}

// ============================================================
// Geometry sweeps
// ============================================================

/// Sweeps the actor's spheres against the solid faces of the current
/// sector and of neighbor sectors whose connecting portal overlaps the
/// swept bbox. Narrows `adjusted_move_distance`.
pub fn collide_indoor_with_geometry(
    level: &IndoorLevel,
    state: &mut CollisionState,
    ignore_ethereal: bool,
) {
    let mut sector_ids: Vec<u32> = Vec::with_capacity(4);
    sector_ids.push(state.sector_id);
    if let Some(sector) = level.sectors.get(state.sector_id as usize) {
        for &face_id in &sector.portals {
            let face = &level.faces[face_id as usize];
            if !face.bbox.intersects(&state.bbox) {
                continue;
            }
            if let Some(neighbor) = face.portal_neighbor(state.sector_id) {
                if !sector_ids.contains(&neighbor) {
                    sector_ids.push(neighbor);
                }
            }
        }
    }

    for &sector_id in &sector_ids {
        let Some(sector) = level.sectors.get(sector_id as usize) else {
            continue;
        };
        for &face_id in &sector.faces {
            let face = &level.faces[face_id as usize];
            if face.is_portal() {
                continue; // portals have their own sweep
            }
            if !face.bbox.intersects(&state.bbox) {
                continue;
            }
            let pid = Pid::Face { model: None, face: face_id };
            if pid == state.ignored_face {
                continue;
            }
            if let Some(t) = collide_sphere_with_face(
                &level.vertices,
                face,
                state.position_lo,
                state.radius_lo,
                state.direction,
                ignore_ethereal,
            ) {
                state.register_hit(t, pid, face.normal);
            }
            if state.check_hi {
                if let Some(t) = collide_sphere_with_face(
                    &level.vertices,
                    face,
                    state.position_hi,
                    state.radius_hi,
                    state.direction,
                    ignore_ethereal,
                ) {
                    state.register_hit(t, pid, face.normal);
                }
            }
        }
    }
}

/// Outdoor counterpart: sweeps against the faces of every placed model
/// whose bounds overlap the swept bbox.
pub fn collide_outdoor_with_models(
    level: &OutdoorLevel,
    state: &mut CollisionState,
    ignore_ethereal: bool,
) {
    for (model_index, model) in level.models.iter().enumerate() {
        if !model.bbox.expanded(state.radius_lo).intersects(&state.bbox) {
            continue;
        }
        for (face_index, face) in model.faces.iter().enumerate() {
            if !face.bbox.intersects(&state.bbox) {
                continue;
            }
            let pid = Pid::Face { model: Some(model_index as u32), face: face_index as u32 };
            if pid == state.ignored_face {
                continue;
            }
            if let Some(t) = collide_sphere_with_face(
                &model.vertices,
                face,
                state.position_lo,
                state.radius_lo,
                state.direction,
                ignore_ethereal,
            ) {
                state.register_hit(t, pid, face.normal);
            }
            if state.check_hi {
                if let Some(t) = collide_sphere_with_face(
                    &model.vertices,
                    face,
                    state.position_hi,
                    state.radius_hi,
                    state.direction,
                    ignore_ethereal,
                ) {
                    state.register_hit(t, pid, face.normal);
                }
            }
        }
    }
}

// ============================================================
// Cylinder sweep (decorations, actors, sprites, player)
// ============================================================

/// Sweeps the actor's lo sphere against a vertical cylinder footprint.
/// The solve is 2D in the horizontal plane; the advance is converted
/// back to travel distance along the full 3D direction, then gated by
/// vertical overlap at the moment of contact. Registers the hit and
/// returns the contact distance when one exists.
fn collide_with_cylinder(
    state: &mut CollisionState,
    center: Vec3i,
    radius: i32,
    height: i32,
    pid: Pid,
) -> Option<i32> {
    let total_radius = state.radius_lo + radius;
    let cyl_bbox = BBoxi {
        min: Vec3i::new(center.x - radius, center.y - radius, center.z),
        max: Vec3i::new(center.x + radius, center.y + radius, center.z + height),
    };
    if !state.bbox.intersects(&cyl_bbox) {
        return None;
    }
    let dir_xy = state.direction.length_xy();
    if dir_xy == 0 {
        return None; // purely vertical motion is resolved by floor/ceiling faces
    }
    let ux = fixpoint_div(state.direction.x, dir_xy);
    let uy = fixpoint_div(state.direction.y, dir_xy);
    let dx = center.x - state.position_lo.x;
    let dy = center.y - state.position_lo.y;
    let dist2 = dx as i64 * dx as i64 + dy as i64 * dy as i64;
    let total2 = total_radius as i64 * total_radius as i64;
    // advance along the horizontal motion to the closest approach
    let a = ((dx as i64 * ux as i64 + dy as i64 * uy as i64) >> 16) as i32;
    if a < 0 && dist2 > total2 {
        return None; // moving away and not already overlapping
    }
    let perp2 = dist2 - a as i64 * a as i64;
    if perp2 > total2 {
        return None;
    }
    let mut t2d = a - int_sqrt(total2 - perp2);
    if t2d < 0 {
        t2d = 0;
    }
    let t64 = ((t2d as i64) << 16) / dir_xy as i64;
    if t64 >= HARD_BLOCK_DISTANCE as i64 {
        return None;
    }
    let t = t64 as i32;
    // vertical overlap at the moment of contact
    let z_at = state.position_lo.z + fixpoint_mul(state.direction.z, t);
    let body_top = if state.check_hi {
        z_at + state.height + state.radius_hi
    } else {
        z_at + state.radius_lo
    };
    if body_top < center.z || z_at - state.radius_lo > center.z + height {
        return None;
    }
    // pushback normal: horizontal, from the cylinder axis to the contact point
    let nx = state.position_lo.x + fixpoint_mul(state.direction.x, t) - center.x;
    let ny = state.position_lo.y + fixpoint_mul(state.direction.y, t) - center.y;
    let normal =
        normalize_to_fixpoint(nx as i64, ny as i64, 0).unwrap_or(Vec3i::new(-ux, -uy, 0));
    state.register_hit(t, pid, normal);
    Some(t)
}

// ============================================================
// Decoration sweeps
// ============================================================

/// Sweeps against the decorations of the actor's current sector.
pub fn collide_indoor_with_decorations(level: &IndoorLevel, state: &mut CollisionState) {
    let Some(sector) = level.sectors.get(state.sector_id as usize) else {
        return;
    };
    for &dec_id in &sector.decorations {
        let Some(dec) = level.decorations.get(dec_id as usize) else {
            continue;
        };
        collide_with_cylinder(state, dec.origin, dec.radius, dec.height, Pid::Decoration(dec_id));
    }
}

/// Sweeps against the decorations of a single terrain grid cell. The
/// resolution loop calls this for every cell the swept bbox overlaps.
pub fn collide_outdoor_with_decorations(
    level: &OutdoorLevel,
    state: &mut CollisionState,
    grid_x: i32,
    grid_y: i32,
) {
    for &dec_id in level.decorations_in_cell(grid_x, grid_y) {
        let Some(dec) = level.decorations.get(dec_id as usize) else {
            continue;
        };
        collide_with_cylinder(state, dec.origin, dec.radius, dec.height, Pid::Decoration(dec_id));
    }
}

// ============================================================
// Portal sweep
// ============================================================

/// Tests the actor's path against the current sector's portal polygons.
/// A portal hit closer than any geometry limit is a hard veto: the
/// recorded sector transitions to the neighbor and the move is blocked
/// for this tick, so crossing a sector boundary never partially
/// succeeds. Returns true iff there was no portal collision.
pub fn collide_indoor_with_portals(level: &IndoorLevel, state: &mut CollisionState) -> bool {
    let Some(sector) = level.sectors.get(state.sector_id as usize) else {
        return true;
    };
    let mut nearest: Option<u32> = None;
    let mut limit = state.move_distance;
    for &face_id in &sector.portals {
        let face = &level.faces[face_id as usize];
        if !face.bbox.intersects(&state.bbox) {
            continue;
        }
        if collide_point_with_face(
            &level.vertices,
            face,
            state.position_lo,
            state.direction,
            &mut limit,
        ) {
            nearest = Some(face_id);
        }
    }
    if let Some(face_id) = nearest {
        if limit < state.adjusted_move_distance {
            let face = &level.faces[face_id as usize];
            if let Some(neighbor) = face.portal_neighbor(state.sector_id) {
                state.sector_id = neighbor;
            }
            state.block(Pid::Face { model: None, face: face_id });
            return false;
        }
    }
    true
}

// ============================================================
// Actor / object sweeps
// ============================================================

/// Sphere-vs-sphere feasibility check against another actor, folded into
/// the running minimum like every other sweep. `override_radius`
/// substitutes the target actor's radius when nonzero, so reach queries
/// (e.g. melee range) can reuse the same primitive. Returns whether the
/// collision is possible along the current path.
pub fn collide_with_actor(
    state: &mut CollisionState,
    actors: &[Actor],
    actor_idx: usize,
    override_radius: i32,
) -> bool {
    let Some(actor) = actors.get(actor_idx) else {
        return false;
    };
    if !actor.alive {
        return false;
    }
    let radius = if override_radius > 0 { override_radius } else { actor.radius };
    collide_with_cylinder(state, actor.position, radius, actor.height, Pid::Actor(actor_idx as u32))
        .is_some()
}

/// Sweeps against sprite-style world objects (missiles, loose items).
pub fn collide_with_sprite_objects(state: &mut CollisionState, sprites: &[SpriteObject]) {
    for (i, sprite) in sprites.iter().enumerate() {
        collide_with_cylinder(
            state,
            sprite.position,
            sprite.radius,
            sprite.height,
            Pid::Sprite(i as u32),
        );
    }
}

/// Specialized check against the player's body cylinder. Returns true
/// when the moving actor can hit the player along the current path.
pub fn collide_with_player(state: &mut CollisionState, player: &Player) -> bool {
    collide_with_cylinder(state, player.position, player.radius, player.height, Pid::Player)
        .is_some()
}

// ============================================================
// Tests
// ============================================================
