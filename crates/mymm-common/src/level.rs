// level.rs — In-memory level and scene data consumed by the collision core
//
// Indoor levels are sector graphs: convex sectors bounded by faces, with
// portal faces linking neighboring sectors. Outdoor levels are a terrain
// grid with placed BSP models and decorations. Everything here is read-only
// during a collision resolution pass.

use std::collections::HashMap;

use bitflags::bitflags;
use thiserror::Error;

use crate::fixmath::{normalize_to_fixpoint, BBoxi, Vec3i};

// ============================================================
// Errors (level construction/validation only, never on the
// per-tick collision path)
// ============================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LevelError {
    #[error("polygon has fewer than 3 vertices")]
    DegeneratePolygon,
    #[error("polygon normal has zero length")]
    ZeroNormal,
    #[error("vertex index {0} is out of range")]
    BadVertexIndex(u32),
    #[error("sector {sector} references missing face {face}")]
    MissingFace { sector: usize, face: u32 },
    #[error("portal face {face} is not linked to any sector")]
    UnlinkedPortal { face: usize },
}

// ============================================================
// Faces
// ============================================================

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FaceAttributes: u32 {
        /// Non-solid face; sweeps skip it when asked to ignore ethereal.
        const ETHEREAL  = 0x0001;
        /// Sector boundary polygon, handled by the portal sweep only.
        const PORTAL    = 0x0002;
        const INVISIBLE = 0x0004;
    }
}

/// A planar convex polygon. The normal is a 16.16 fixpoint unit vector;
/// `dist` is the fixpoint plane offset so that `dot(normal, p) + dist == 0`
/// for points on the plane. Vertices are indices into the owning vertex
/// pool (the level's indoors, the model's outdoors).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Face {
    pub normal: Vec3i,
    pub dist: i64,
    pub attributes: FaceAttributes,
    pub vertices: Vec<u32>,
    pub bbox: BBoxi,
    pub sector_front: Option<u32>,
    pub sector_back: Option<u32>,
}

impl Face {
    /// Builds a face from a vertex pool and a vertex index ring.
    /// The plane normal is derived from the winding (counter-clockwise
    /// when seen from the front side).
    pub fn from_vertices(
        pool: &[Vec3i],
        vertex_ids: &[u32],
        attributes: FaceAttributes,
    ) -> Result<Face, LevelError> {
        if vertex_ids.len() < 3 {
            return Err(LevelError::DegeneratePolygon);
        }
        for &id in vertex_ids {
            if id as usize >= pool.len() {
                return Err(LevelError::BadVertexIndex(id));
            }
        }
        let v0 = pool[vertex_ids[0] as usize];
        let v1 = pool[vertex_ids[1] as usize];
        let v2 = pool[vertex_ids[2] as usize];
        let e1 = v1 - v0;
        let e2 = v2 - v0;
        let cx = e1.y as i64 * e2.z as i64 - e1.z as i64 * e2.y as i64;
        let cy = e1.z as i64 * e2.x as i64 - e1.x as i64 * e2.z as i64;
        let cz = e1.x as i64 * e2.y as i64 - e1.y as i64 * e2.x as i64;
        let normal = normalize_to_fixpoint(cx, cy, cz).ok_or(LevelError::ZeroNormal)?;
        let dist = -Vec3i::dot64(normal, v0);
        let bbox = BBoxi::from_points(vertex_ids.iter().map(|&id| pool[id as usize]));
        Ok(Face {
            normal,
            dist,
            attributes,
            vertices: vertex_ids.to_vec(),
            bbox,
            sector_front: None,
            sector_back: None,
        })
    }

    pub fn is_ethereal(&self) -> bool {
        self.attributes.contains(FaceAttributes::ETHEREAL)
    }

    pub fn is_portal(&self) -> bool {
        self.attributes.contains(FaceAttributes::PORTAL)
    }

    /// Signed distance from a point to the face plane, in world units.
    /// Positive on the front (normal) side.
    pub fn signed_distance(&self, p: Vec3i) -> i32 {
        ((Vec3i::dot64(self.normal, p) + self.dist) >> 16) as i32
    }

    /// Same as `signed_distance` but keeps the full fixpoint value.
    pub fn signed_distance_fp(&self, p: Vec3i) -> i64 {
        Vec3i::dot64(self.normal, p) + self.dist
    }

    /// Fixpoint cosine between the face normal and a fixpoint unit
    /// direction. Negative when moving toward the front side.
    pub fn cos_direction(&self, dir_fp: Vec3i) -> i32 {
        Vec3i::dot_fix(self.normal, dir_fp)
    }

    /// For a portal face, the sector on the other side of `sector`.
    /// `None` means the portal leads outside the built level.
    pub fn portal_neighbor(&self, sector: u32) -> Option<u32> {
        if self.sector_front == Some(sector) {
            self.sector_back
        } else if self.sector_back == Some(sector) {
            self.sector_front
        } else {
            None
        }
    }
}

// ============================================================
// Indoor level
// ============================================================

#[derive(Debug, Clone, Default)]
pub struct Sector {
    pub faces: Vec<u32>,
    pub portals: Vec<u32>,
    pub decorations: Vec<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct IndoorLevel {
    pub vertices: Vec<Vec3i>,
    pub faces: Vec<Face>,
    pub sectors: Vec<Sector>,
    pub decorations: Vec<Decoration>,
}

impl IndoorLevel {
    pub fn validate(&self) -> Result<(), LevelError> {
        for (i, face) in self.faces.iter().enumerate() {
            if face.vertices.len() < 3 {
                return Err(LevelError::DegeneratePolygon);
            }
            if face.normal.is_zero() {
                return Err(LevelError::ZeroNormal);
            }
            for &id in &face.vertices {
                if id as usize >= self.vertices.len() {
                    return Err(LevelError::BadVertexIndex(id));
                }
            }
            if face.is_portal() && face.sector_front.is_none() && face.sector_back.is_none() {
                return Err(LevelError::UnlinkedPortal { face: i });
            }
        }
        for (i, sector) in self.sectors.iter().enumerate() {
            for &id in sector.faces.iter().chain(sector.portals.iter()) {
                if id as usize >= self.faces.len() {
                    return Err(LevelError::MissingFace { sector: i, face: id });
                }
            }
        }
        Ok(())
    }
}

// ============================================================
// Outdoor level: placed models + terrain grid
// ============================================================

/// World-space cell size of the outdoor terrain grid.
pub const GRID_CELL_SHIFT: i32 = 9; // 512 units
pub const GRID_SIZE: i32 = 128;

/// Maps a world position to terrain grid cell coordinates. The grid is
/// centered on the world origin; the y axis of the grid runs opposite
/// to world y.
pub fn world_to_grid(p: Vec3i) -> (i32, i32) {
    ((p.x >> GRID_CELL_SHIFT) + GRID_SIZE / 2, GRID_SIZE / 2 - 1 - (p.y >> GRID_CELL_SHIFT))
}

/// A placed 3D model in an outdoor level. Vertices are already in world
/// space; faces index into this model's own vertex pool.
#[derive(Debug, Clone, Default)]
pub struct BspModel {
    pub vertices: Vec<Vec3i>,
    pub faces: Vec<Face>,
    pub bbox: BBoxi,
}

impl BspModel {
    pub fn new(vertices: Vec<Vec3i>, faces: Vec<Face>) -> BspModel {
        let bbox = BBoxi::from_points(vertices.iter().copied());
        BspModel { vertices, faces, bbox }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutdoorLevel {
    pub models: Vec<BspModel>,
    pub decorations: Vec<Decoration>,
    decoration_grid: HashMap<(i32, i32), Vec<u32>>,
}

impl OutdoorLevel {
    pub fn new(models: Vec<BspModel>, decorations: Vec<Decoration>) -> OutdoorLevel {
        let mut level = OutdoorLevel { models, decorations, decoration_grid: HashMap::new() };
        level.rebuild_decoration_grid();
        level
    }

    /// Re-derives the per-cell decoration lists from decoration origins.
    /// Must be called again after decorations are added or moved.
    pub fn rebuild_decoration_grid(&mut self) {
        self.decoration_grid.clear();
        for (i, dec) in self.decorations.iter().enumerate() {
            let cell = world_to_grid(dec.origin);
            self.decoration_grid.entry(cell).or_default().push(i as u32);
        }
    }

    pub fn decorations_in_cell(&self, grid_x: i32, grid_y: i32) -> &[u32] {
        self.decoration_grid
            .get(&(grid_x, grid_y))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

// ============================================================
// Dynamic bodies
// ============================================================

/// A decorative object with a vertical cylinder collision footprint.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoration {
    pub origin: Vec3i,
    pub radius: i32,
    pub height: i32,
}

impl Decoration {
    pub fn bbox(&self) -> BBoxi {
        BBoxi {
            min: Vec3i::new(self.origin.x - self.radius, self.origin.y - self.radius, self.origin.z),
            max: Vec3i::new(
                self.origin.x + self.radius,
                self.origin.y + self.radius,
                self.origin.z + self.height,
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Actor {
    pub position: Vec3i,
    pub radius: i32,
    pub height: i32,
    pub alive: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpriteObject {
    pub position: Vec3i,
    pub radius: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Player {
    pub position: Vec3i,
    pub radius: i32,
    pub height: i32,
}

// ============================================================
// Obstacle handles
// ============================================================

/// Stable handle to the object a collision was registered against.
/// Outdoor faces carry their owning model index; indoor faces don't.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pid {
    #[default]
    None,
    Face { model: Option<u32>, face: u32 },
    Decoration(u32),
    Actor(u32),
    Sprite(u32),
    Player,
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn square_pool() -> Vec<Vec3i> {
        vec![
            Vec3i::new(50, -100, -100),
            Vec3i::new(50, -100, 100),
            Vec3i::new(50, 100, 100),
            Vec3i::new(50, 100, -100),
        ]
    }

    #[test]
    fn test_face_from_vertices_plane() {
        let pool = square_pool();
        let face = Face::from_vertices(&pool, &[0, 1, 2, 3], FaceAttributes::empty()).unwrap();
        // winding above faces -x
        assert_eq!(face.normal, Vec3i::new(-0x10000, 0, 0));
        assert_eq!(face.signed_distance(Vec3i::ZERO), 50);
        assert_eq!(face.signed_distance(Vec3i::new(50, 0, 0)), 0);
        assert_eq!(face.signed_distance(Vec3i::new(80, 0, 0)), -30);
    }

    #[test]
    fn test_face_degenerate_rejected() {
        let pool = square_pool();
        assert_eq!(
            Face::from_vertices(&pool, &[0, 1], FaceAttributes::empty()),
            Err(LevelError::DegeneratePolygon)
        );
        let collinear = vec![Vec3i::ZERO, Vec3i::new(10, 0, 0), Vec3i::new(20, 0, 0)];
        assert_eq!(
            Face::from_vertices(&collinear, &[0, 1, 2], FaceAttributes::empty()),
            Err(LevelError::ZeroNormal)
        );
        assert_eq!(
            Face::from_vertices(&pool, &[0, 1, 9], FaceAttributes::empty()),
            Err(LevelError::BadVertexIndex(9))
        );
    }

    #[test]
    fn test_portal_neighbor() {
        let pool = square_pool();
        let mut face = Face::from_vertices(&pool, &[0, 1, 2, 3], FaceAttributes::PORTAL).unwrap();
        face.sector_front = Some(0);
        face.sector_back = Some(1);
        assert_eq!(face.portal_neighbor(0), Some(1));
        assert_eq!(face.portal_neighbor(1), Some(0));
        assert_eq!(face.portal_neighbor(7), None);
    }

    #[test]
    fn test_validate_catches_bad_refs() {
        let pool = square_pool();
        let face = Face::from_vertices(&pool, &[0, 1, 2, 3], FaceAttributes::empty()).unwrap();
        let mut level = IndoorLevel {
            vertices: pool,
            faces: vec![face],
            sectors: vec![Sector { faces: vec![0, 5], ..Default::default() }],
            decorations: vec![],
        };
        assert_eq!(level.validate(), Err(LevelError::MissingFace { sector: 0, face: 5 }));
        level.sectors[0].faces = vec![0];
        assert_eq!(level.validate(), Ok(()));
    }

    #[test]
    fn test_unlinked_portal_rejected() {
        let pool = square_pool();
        let face = Face::from_vertices(&pool, &[0, 1, 2, 3], FaceAttributes::PORTAL).unwrap();
        let level = IndoorLevel {
            vertices: pool,
            faces: vec![face],
            sectors: vec![],
            decorations: vec![],
        };
        assert_eq!(level.validate(), Err(LevelError::UnlinkedPortal { face: 0 }));
    }

    #[test]
    fn test_world_to_grid() {
        assert_eq!(world_to_grid(Vec3i::new(0, 0, 0)), (64, 63));
        assert_eq!(world_to_grid(Vec3i::new(1000, 1000, 0)), (65, 62));
        assert_eq!(world_to_grid(Vec3i::new(-1000, -1000, 0)), (62, 65));
    }

    #[test]
    fn test_decoration_grid_lookup() {
        let dec = Decoration { origin: Vec3i::new(1000, 1000, 0), radius: 20, height: 60 };
        let level = OutdoorLevel::new(vec![], vec![dec]);
        assert_eq!(level.decorations_in_cell(65, 62), &[0]);
        assert!(level.decorations_in_cell(64, 63).is_empty());
    }
}
