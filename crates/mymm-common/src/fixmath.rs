// fixmath.rs — Fixed-point scalar, vector and bounding-box math
//
// All positions, radii and distances are plain integer world units.
// Unit vectors (movement directions, plane normals) are 16.16 fixpoint.
// Products and dot products go through i64 so no intermediate overflows.

use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

// ============================================================
// Fixpoint scalars
// ============================================================

/// 1.0 in 16.16 fixpoint.
pub const FIXPOINT_ONE: i32 = 0x10000;

/// Fixpoint multiply. The shift is arithmetic, so rounding is
/// always toward negative infinity. This is the single rounding
/// rule used everywhere in the collision core.
pub fn fixpoint_mul(a: i32, b: i32) -> i32 {
    ((a as i64 * b as i64) >> 16) as i32
}

/// Fixpoint divide. Caller guarantees `b != 0`.
pub fn fixpoint_div(a: i32, b: i32) -> i32 {
    (((a as i64) << 16) / b as i64) as i32
}

/// Integer square root, exact floor. Accepts i64 so squared vector
/// lengths can be passed directly.
pub fn int_sqrt(mut n: i64) -> i32 {
    if n <= 0 {
        return 0;
    }
    let mut result: i64 = 0;
    let mut bit: i64 = 1 << 62;
    while bit > n {
        bit >>= 2;
    }
    while bit != 0 {
        if n >= result + bit {
            n -= result + bit;
            result = (result >> 1) + bit;
        } else {
            result >>= 1;
        }
        bit >>= 2;
    }
    result as i32
}

// ============================================================
// Integer 3D vector
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Vec3i {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Vec3i {
    pub const ZERO: Vec3i = Vec3i { x: 0, y: 0, z: 0 };

    pub fn new(x: i32, y: i32, z: i32) -> Vec3i {
        Vec3i { x, y, z }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0 && self.y == 0 && self.z == 0
    }

    /// Raw i64 dot product, no shift applied.
    pub fn dot64(a: Vec3i, b: Vec3i) -> i64 {
        a.x as i64 * b.x as i64 + a.y as i64 * b.y as i64 + a.z as i64 * b.z as i64
    }

    /// Dot product of a fixpoint vector with an integer (or second
    /// fixpoint) vector, shifted back down by 16.
    pub fn dot_fix(a: Vec3i, b: Vec3i) -> i32 {
        (Vec3i::dot64(a, b) >> 16) as i32
    }

    pub fn length_sqr(&self) -> i64 {
        Vec3i::dot64(*self, *self)
    }

    pub fn length(&self) -> i32 {
        int_sqrt(self.length_sqr())
    }

    pub fn length_xy(&self) -> i32 {
        int_sqrt(self.x as i64 * self.x as i64 + self.y as i64 * self.y as i64)
    }

    /// Scales this integer vector into a 16.16 fixpoint unit vector.
    /// `len` must be this vector's length and must be nonzero.
    pub fn to_fixpoint_unit(&self, len: i32) -> Vec3i {
        Vec3i {
            x: fixpoint_div(self.x, len),
            y: fixpoint_div(self.y, len),
            z: fixpoint_div(self.z, len),
        }
    }

    /// Advances an integer position by `distance` units along a
    /// fixpoint unit direction.
    pub fn advanced_by(&self, dir_fp: Vec3i, distance: i32) -> Vec3i {
        Vec3i {
            x: self.x + fixpoint_mul(dir_fp.x, distance),
            y: self.y + fixpoint_mul(dir_fp.y, distance),
            z: self.z + fixpoint_mul(dir_fp.z, distance),
        }
    }
}

impl Add for Vec3i {
    type Output = Vec3i;
    fn add(self, o: Vec3i) -> Vec3i {
        Vec3i::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }
}

impl AddAssign for Vec3i {
    fn add_assign(&mut self, o: Vec3i) {
        *self = *self + o;
    }
}

impl Sub for Vec3i {
    type Output = Vec3i;
    fn sub(self, o: Vec3i) -> Vec3i {
        Vec3i::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }
}

impl SubAssign for Vec3i {
    fn sub_assign(&mut self, o: Vec3i) {
        *self = *self - o;
    }
}

impl Neg for Vec3i {
    type Output = Vec3i;
    fn neg(self) -> Vec3i {
        Vec3i::new(-self.x, -self.y, -self.z)
    }
}

/// Normalizes an i64 vector (e.g. a raw cross product) into a 16.16
/// fixpoint unit vector. Returns None for a zero-length input.
/// Components are pre-shifted down so the squared length fits in i64.
pub fn normalize_to_fixpoint(mut x: i64, mut y: i64, mut z: i64) -> Option<Vec3i> {
    if x == 0 && y == 0 && z == 0 {
        return None;
    }
    while x.abs() >= (1 << 20) || y.abs() >= (1 << 20) || z.abs() >= (1 << 20) {
        x >>= 1;
        y >>= 1;
        z >>= 1;
    }
    let len = int_sqrt(x * x + y * y + z * z) as i64;
    if len == 0 {
        return None;
    }
    Some(Vec3i {
        x: ((x << 16) / len) as i32,
        y: ((y << 16) / len) as i32,
        z: ((z << 16) / len) as i32,
    })
}

// ============================================================
// Integer axis-aligned bounding box
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BBoxi {
    pub min: Vec3i,
    pub max: Vec3i,
}

impl BBoxi {
    pub fn from_points<I: IntoIterator<Item = Vec3i>>(points: I) -> BBoxi {
        let mut it = points.into_iter();
        let first = it.next().unwrap_or(Vec3i::ZERO);
        let mut bbox = BBoxi { min: first, max: first };
        for p in it {
            bbox.add_point(p);
        }
        bbox
    }

    pub fn add_point(&mut self, p: Vec3i) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    pub fn expanded(&self, r: i32) -> BBoxi {
        BBoxi {
            min: Vec3i::new(self.min.x - r, self.min.y - r, self.min.z - r),
            max: Vec3i::new(self.max.x + r, self.max.y + r, self.max.z + r),
        }
    }

    pub fn intersects(&self, o: &BBoxi) -> bool {
        self.min.x <= o.max.x && self.max.x >= o.min.x
            && self.min.y <= o.max.y && self.max.y >= o.min.y
            && self.min.z <= o.max.z && self.max.z >= o.min.z
    }
}

// ============================================================
// Tests
// ============================================================
