//! Indexed triangle meshes for the cluster objects.
//!
//! Builders place the shape centred on the origin. Every builder records an
//! outward direction per vertex while generating and then orients each
//! triangle counter-clockwise as seen from outside, so recomputed normals
//! always point out of the surface.

use std::collections::HashMap;
use std::f32::consts::{PI, TAU};

use glam::Vec3;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    fn push_vertex(&mut self, position: Vec3, outward: Vec3) -> u32 {
        self.positions.push(position);
        self.normals.push(outward);
        (self.positions.len() - 1) as u32
    }

    /// Flip any triangle whose winding disagrees with the recorded outward directions.
    fn orient_outward(&mut self) {
        for tri in self.indices.chunks_exact_mut(3) {
            let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            let face = (self.positions[b] - self.positions[a]).cross(self.positions[c] - self.positions[a]);
            let outward = self.normals[a] + self.normals[b] + self.normals[c];
            if face.dot(outward) < 0.0 {
                tri.swap(1, 2);
            }
        }
    }

    /// Area-weighted vertex normals from the current positions.
    ///
    /// Vertices with no usable face contribution fall back to their radial
    /// direction, then to +Y.
    pub fn recompute_normals(&mut self) {
        recompute_normals(&self.positions, &self.indices, &mut self.normals);
    }

    /// Append `other` scaled per axis then translated.
    pub fn merge(&mut self, other: &Mesh, scale: Vec3, offset: Vec3) {
        let base = self.positions.len() as u32;
        self.positions
            .extend(other.positions.iter().map(|&p| p * scale + offset));
        self.normals.extend(
            other
                .normals
                .iter()
                .map(|&n| (n / scale).try_normalize().unwrap_or(Vec3::Y)),
        );
        self.indices.extend(other.indices.iter().map(|&i| i + base));
    }

    pub fn translated(mut self, offset: Vec3) -> Mesh {
        for p in &mut self.positions {
            *p += offset;
        }
        self
    }
}

/// Area-weighted vertex normals written into `normals`.
pub fn recompute_normals(positions: &[Vec3], indices: &[u32], normals: &mut Vec<Vec3>) {
    normals.clear();
    normals.resize(positions.len(), Vec3::ZERO);

    for tri in indices.chunks_exact(3) {
        let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        let face = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
        if face.is_finite() {
            normals[a] += face;
            normals[b] += face;
            normals[c] += face;
        }
    }

    for (n, p) in normals.iter_mut().zip(positions) {
        *n = n
            .try_normalize()
            .or_else(|| p.try_normalize())
            .unwrap_or(Vec3::Y);
    }
}

/// Latitude/longitude sphere.
pub fn uv_sphere(radius: f32, width_segments: u32, height_segments: u32) -> Mesh {
    let ws = width_segments.max(3);
    let hs = height_segments.max(2);
    let mut mesh = Mesh::default();

    for iy in 0..=hs {
        let v = iy as f32 / hs as f32;
        for ix in 0..=ws {
            let u = ix as f32 / ws as f32;
            let dir = Vec3::new(
                -(u * TAU).cos() * (v * PI).sin(),
                (v * PI).cos(),
                (u * TAU).sin() * (v * PI).sin(),
            );
            mesh.push_vertex(dir * radius, dir);
        }
    }

    let row = ws + 1;
    for iy in 0..hs {
        for ix in 0..ws {
            let a = iy * row + ix + 1;
            let b = iy * row + ix;
            let c = (iy + 1) * row + ix;
            let d = (iy + 1) * row + ix + 1;
            if iy != 0 {
                mesh.indices.extend_from_slice(&[a, b, d]);
            }
            if iy != hs - 1 {
                mesh.indices.extend_from_slice(&[b, c, d]);
            }
        }
    }

    finish(mesh)
}

/// Grid face spanning `center ± u ± v`, facing `u × v`.
fn grid_face(mesh: &mut Mesh, center: Vec3, u: Vec3, v: Vec3, u_segments: u32, v_segments: u32) {
    let us = u_segments.max(1);
    let vs = v_segments.max(1);
    let outward = u.cross(v).normalize_or_zero();
    let base = mesh.positions.len() as u32;

    for j in 0..=vs {
        let t = j as f32 / vs as f32 * 2.0 - 1.0;
        for i in 0..=us {
            let s = i as f32 / us as f32 * 2.0 - 1.0;
            mesh.push_vertex(center + u * s + v * t, outward);
        }
    }

    let row = us + 1;
    for j in 0..vs {
        for i in 0..us {
            let a = base + j * row + i;
            let b = a + 1;
            let c = a + row + 1;
            let d = a + row;
            mesh.indices.extend_from_slice(&[a, b, c, a, c, d]);
        }
    }
}

/// Axis-aligned box with `segments` subdivisions along x, y and z.
pub fn subdivided_box(size: Vec3, segments: [u32; 3]) -> Mesh {
    let h = size * 0.5;
    let [sx, sy, sz] = segments;
    let mut mesh = Mesh::default();

    grid_face(&mut mesh, Vec3::X * h.x, Vec3::Y * h.y, Vec3::Z * h.z, sy, sz);
    grid_face(&mut mesh, -Vec3::X * h.x, Vec3::Z * h.z, Vec3::Y * h.y, sz, sy);
    grid_face(&mut mesh, Vec3::Y * h.y, Vec3::Z * h.z, Vec3::X * h.x, sz, sx);
    grid_face(&mut mesh, -Vec3::Y * h.y, Vec3::X * h.x, Vec3::Z * h.z, sx, sz);
    grid_face(&mut mesh, Vec3::Z * h.z, Vec3::X * h.x, Vec3::Y * h.y, sx, sy);
    grid_face(&mut mesh, -Vec3::Z * h.z, Vec3::Y * h.y, Vec3::X * h.x, sy, sx);

    finish(mesh)
}

/// Flat square in the XY plane facing +Z.
pub fn plane(size: f32, segments: u32) -> Mesh {
    let mut mesh = Mesh::default();
    let h = size * 0.5;
    grid_face(&mut mesh, Vec3::ZERO, Vec3::X * h, Vec3::Y * h, segments, segments);
    finish(mesh)
}

/// Torus in the XY plane; `arc` < 2π gives an open section.
pub fn torus(radius: f32, tube: f32, radial_segments: u32, tubular_segments: u32, arc: f32) -> Mesh {
    let radial = radial_segments.max(3);
    let tubular = tubular_segments.max(3);
    let mut mesh = Mesh::default();

    for j in 0..=radial {
        let v = j as f32 / radial as f32 * TAU;
        for i in 0..=tubular {
            let u = i as f32 / tubular as f32 * arc;
            let center = Vec3::new(radius * u.cos(), radius * u.sin(), 0.0);
            let p = Vec3::new(
                (radius + tube * v.cos()) * u.cos(),
                (radius + tube * v.cos()) * u.sin(),
                tube * v.sin(),
            );
            mesh.push_vertex(p, (p - center).normalize_or_zero());
        }
    }

    let row = tubular + 1;
    for j in 1..=radial {
        for i in 1..=tubular {
            let a = row * j + i - 1;
            let b = row * (j - 1) + i - 1;
            let c = row * (j - 1) + i;
            let d = row * j + i;
            mesh.indices.extend_from_slice(&[a, b, d, b, c, d]);
        }
    }

    finish(mesh)
}

fn knot_point(u: f32, p: f32, q: f32, radius: f32) -> Vec3 {
    let qu = q / p * u;
    let cs = qu.cos();
    Vec3::new(
        radius * (2.0 + cs) * 0.5 * u.cos(),
        radius * (2.0 + cs) * 0.5 * u.sin(),
        radius * qu.sin() * 0.5,
    )
}

/// (2,3) torus knot tube.
pub fn torus_knot(radius: f32, tube: f32, tubular_segments: u32, radial_segments: u32) -> Mesh {
    let (p, q) = (2.0, 3.0);
    let tubular = tubular_segments.max(3);
    let radial = radial_segments.max(3);
    let mut mesh = Mesh::default();

    for i in 0..=tubular {
        let u = i as f32 / tubular as f32 * p * TAU;
        let p1 = knot_point(u, p, q, radius);
        let p2 = knot_point(u + 0.01, p, q, radius);
        let tangent = p2 - p1;
        let mut normal = p2 + p1;
        let binormal = tangent.cross(normal).normalize_or_zero();
        normal = binormal.cross(tangent).normalize_or_zero();

        for j in 0..=radial {
            let v = j as f32 / radial as f32 * TAU;
            let offset = normal * (-tube * v.cos()) + binormal * (tube * v.sin());
            mesh.push_vertex(p1 + offset, offset.normalize_or_zero());
        }
    }

    let row = radial + 1;
    for j in 1..=tubular {
        for i in 1..=radial {
            let a = row * (j - 1) + (i - 1);
            let b = row * j + (i - 1);
            let c = row * j + i;
            let d = row * (j - 1) + i;
            mesh.indices.extend_from_slice(&[a, b, d, b, c, d]);
        }
    }

    finish(mesh)
}

/// Subdivide each triangular face `detail` times per edge and project onto
/// the sphere of `radius`. Shared vertices are merged.
fn polyhedron(base: &[Vec3], faces: &[[usize; 3]], radius: f32, detail: u32) -> Mesh {
    let cols = detail as usize + 1;
    let mut mesh = Mesh::default();
    let mut lookup: HashMap<[i32; 3], u32> = HashMap::new();

    let mut vertex = |mesh: &mut Mesh, p: Vec3| -> u32 {
        let dir = p.normalize_or_zero();
        let key = [
            (dir.x * 1.0e5).round() as i32,
            (dir.y * 1.0e5).round() as i32,
            (dir.z * 1.0e5).round() as i32,
        ];
        *lookup
            .entry(key)
            .or_insert_with(|| mesh.push_vertex(dir * radius, dir))
    };

    for face in faces {
        let (a, b, c) = (base[face[0]], base[face[1]], base[face[2]]);

        // rows[i][j]: i steps from edge ab toward c
        let mut rows: Vec<Vec<u32>> = Vec::with_capacity(cols + 1);
        for i in 0..=cols {
            let t = i as f32 / cols as f32;
            let start = a.lerp(c, t);
            let end = b.lerp(c, t);
            let span = cols - i;
            let row = (0..=span)
                .map(|j| {
                    let p = if span == 0 {
                        start
                    } else {
                        start.lerp(end, j as f32 / span as f32)
                    };
                    vertex(&mut mesh, p)
                })
                .collect();
            rows.push(row);
        }

        for i in 0..cols {
            for j in 0..(2 * (cols - i) - 1) {
                let k = j / 2;
                if j % 2 == 0 {
                    mesh.indices
                        .extend_from_slice(&[rows[i][k + 1], rows[i + 1][k], rows[i][k]]);
                } else {
                    mesh.indices
                        .extend_from_slice(&[rows[i][k + 1], rows[i + 1][k + 1], rows[i + 1][k]]);
                }
            }
        }
    }

    finish(mesh)
}

const ICOSAHEDRON_FACES: [[usize; 3]; 20] = [
    [0, 11, 5], [0, 5, 1], [0, 1, 7], [0, 7, 10], [0, 10, 11],
    [1, 5, 9], [5, 11, 4], [11, 10, 2], [10, 7, 6], [7, 1, 8],
    [3, 9, 4], [3, 4, 2], [3, 2, 6], [3, 6, 8], [3, 8, 9],
    [4, 9, 5], [2, 4, 11], [6, 2, 10], [8, 6, 7], [9, 8, 1],
];

/// Geodesic sphere from a subdivided icosahedron.
pub fn icosahedron(radius: f32, detail: u32) -> Mesh {
    let t = (1.0 + 5f32.sqrt()) / 2.0;
    let base = [
        Vec3::new(-1.0, t, 0.0),
        Vec3::new(1.0, t, 0.0),
        Vec3::new(-1.0, -t, 0.0),
        Vec3::new(1.0, -t, 0.0),
        Vec3::new(0.0, -1.0, t),
        Vec3::new(0.0, 1.0, t),
        Vec3::new(0.0, -1.0, -t),
        Vec3::new(0.0, 1.0, -t),
        Vec3::new(t, 0.0, -1.0),
        Vec3::new(t, 0.0, 1.0),
        Vec3::new(-t, 0.0, -1.0),
        Vec3::new(-t, 0.0, 1.0),
    ];
    polyhedron(&base, &ICOSAHEDRON_FACES, radius, detail)
}

const DODECAHEDRON_FACES: [[usize; 3]; 36] = [
    [3, 11, 7], [3, 7, 15], [3, 15, 13],
    [7, 19, 17], [7, 17, 6], [7, 6, 15],
    [17, 4, 8], [17, 8, 10], [17, 10, 6],
    [8, 0, 16], [8, 16, 2], [8, 2, 10],
    [0, 12, 1], [0, 1, 18], [0, 18, 16],
    [6, 10, 2], [6, 2, 13], [6, 13, 15],
    [2, 16, 18], [2, 18, 3], [2, 3, 13],
    [18, 1, 9], [18, 9, 11], [18, 11, 3],
    [4, 14, 12], [4, 12, 0], [4, 0, 8],
    [11, 9, 5], [11, 5, 19], [11, 19, 7],
    [19, 5, 14], [19, 14, 4], [19, 4, 17],
    [1, 12, 14], [1, 14, 5], [1, 5, 9],
];

/// Subdivided dodecahedron (pentagons split into three triangles).
pub fn dodecahedron(radius: f32, detail: u32) -> Mesh {
    let t = (1.0 + 5f32.sqrt()) / 2.0;
    let r = 1.0 / t;
    let base = [
        Vec3::new(-1.0, -1.0, -1.0),
        Vec3::new(-1.0, -1.0, 1.0),
        Vec3::new(-1.0, 1.0, -1.0),
        Vec3::new(-1.0, 1.0, 1.0),
        Vec3::new(1.0, -1.0, -1.0),
        Vec3::new(1.0, -1.0, 1.0),
        Vec3::new(1.0, 1.0, -1.0),
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(0.0, -r, -t),
        Vec3::new(0.0, -r, t),
        Vec3::new(0.0, r, -t),
        Vec3::new(0.0, r, t),
        Vec3::new(-r, -t, 0.0),
        Vec3::new(-r, t, 0.0),
        Vec3::new(r, -t, 0.0),
        Vec3::new(r, t, 0.0),
        Vec3::new(-t, 0.0, -r),
        Vec3::new(t, 0.0, -r),
        Vec3::new(-t, 0.0, r),
        Vec3::new(t, 0.0, r),
    ];
    polyhedron(&base, &DODECAHEDRON_FACES, radius, detail)
}

/// Frustum along Y centred on the origin. `open_ended` omits both caps.
pub fn cylinder(
    radius_top: f32,
    radius_bottom: f32,
    height: f32,
    radial_segments: u32,
    height_segments: u32,
    open_ended: bool,
) -> Mesh {
    let radial = radial_segments.max(3);
    let rows = height_segments.max(1);
    let half = height * 0.5;
    let slope = (radius_bottom - radius_top) / height.max(1.0e-6);
    let mut mesh = Mesh::default();

    for y in 0..=rows {
        let v = y as f32 / rows as f32;
        let r = v * (radius_bottom - radius_top) + radius_top;
        for x in 0..=radial {
            let theta = x as f32 / radial as f32 * TAU;
            let (s, c) = theta.sin_cos();
            let outward = Vec3::new(s, slope, c).normalize_or_zero();
            mesh.push_vertex(Vec3::new(r * s, -v * height + half, r * c), outward);
        }
    }

    let row = radial + 1;
    for y in 0..rows {
        for x in 0..radial {
            let a = y * row + x;
            let b = (y + 1) * row + x;
            let c = (y + 1) * row + x + 1;
            let d = y * row + x + 1;
            mesh.indices.extend_from_slice(&[a, b, d, b, c, d]);
        }
    }

    if !open_ended {
        if radius_top > 0.0 {
            cap(&mut mesh, radius_top, half, Vec3::Y, radial);
        }
        if radius_bottom > 0.0 {
            cap(&mut mesh, radius_bottom, -half, -Vec3::Y, radial);
        }
    }

    finish(mesh)
}

fn cap(mesh: &mut Mesh, radius: f32, y: f32, outward: Vec3, segments: u32) {
    let center = mesh.push_vertex(Vec3::new(0.0, y, 0.0), outward);
    let first = mesh.positions.len() as u32;
    for x in 0..=segments {
        let theta = x as f32 / segments as f32 * TAU;
        let (s, c) = theta.sin_cos();
        mesh.push_vertex(Vec3::new(radius * s, y, radius * c), outward);
    }
    for x in 0..segments {
        mesh.indices
            .extend_from_slice(&[center, first + x, first + x + 1]);
    }
}

/// Flat disc in the XZ plane facing -Y.
pub fn disc(radius: f32, segments: u32) -> Mesh {
    let mut mesh = Mesh::default();
    cap(&mut mesh, radius, 0.0, -Vec3::Y, segments.max(3));
    finish(mesh)
}

fn finish(mut mesh: Mesh) -> Mesh {
    mesh.orient_outward();
    mesh.recompute_normals();
    mesh
}

fn merge_all(parts: &[(Mesh, Vec3)]) -> Mesh {
    let mut out = Mesh::default();
    for (part, offset) in parts {
        out.merge(part, Vec3::ONE, *offset);
    }
    out.recompute_normals();
    out
}

pub fn chair() -> Mesh {
    let leg = subdivided_box(Vec3::new(0.3, 3.0, 0.3), [2, 8, 2]);
    merge_all(&[
        (subdivided_box(Vec3::new(4.0, 0.5, 4.0), [8, 2, 8]), Vec3::ZERO),
        (subdivided_box(Vec3::new(4.0, 4.0, 0.5), [8, 8, 2]), Vec3::new(0.0, 2.2, -1.8)),
        (leg.clone(), Vec3::new(1.8, -1.5, 1.8)),
        (leg.clone(), Vec3::new(-1.8, -1.5, 1.8)),
        (leg.clone(), Vec3::new(1.8, -1.5, -1.8)),
        (leg, Vec3::new(-1.8, -1.5, -1.8)),
    ])
}

pub fn lamp() -> Mesh {
    merge_all(&[
        (cylinder(1.5, 2.0, 0.5, 24, 4, false), Vec3::ZERO),
        (cylinder(0.2, 0.2, 5.0, 12, 8, false), Vec3::new(0.0, 2.5, 0.0)),
        (cylinder(0.0, 2.5, 3.0, 24, 8, true), Vec3::new(0.0, 5.0, 0.0)),
    ])
}

pub fn sofa() -> Mesh {
    let arm = subdivided_box(Vec3::new(1.0, 2.0, 3.5), [2, 4, 8]);
    merge_all(&[
        (subdivided_box(Vec3::new(8.0, 2.0, 3.5), [16, 4, 8]), Vec3::ZERO),
        (subdivided_box(Vec3::new(8.0, 2.5, 1.0), [16, 8, 2]), Vec3::new(0.0, 2.0, -1.25)),
        (arm.clone(), Vec3::new(3.5, 1.0, 0.0)),
        (arm, Vec3::new(-3.5, 1.0, 0.0)),
    ])
}

pub fn mug() -> Mesh {
    merge_all(&[
        (cylinder(2.0, 2.0, 4.0, 48, 16, true), Vec3::ZERO),
        (disc(2.0, 48), Vec3::new(0.0, -2.0, 0.0)),
        (torus(1.2, 0.3, 12, 32, PI), Vec3::new(2.0, 0.0, 0.0)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_valid(mesh: &Mesh) {
        assert!(mesh.vertex_count() > 0);
        assert_eq!(mesh.indices.len() % 3, 0);
        assert_eq!(mesh.normals.len(), mesh.positions.len());
        for &i in &mesh.indices {
            assert!((i as usize) < mesh.vertex_count());
        }
        for n in &mesh.normals {
            assert!((n.length() - 1.0).abs() < 1e-3);
        }
    }

    /// For shapes star-shaped about the origin, normals point away from it.
    fn assert_outward(mesh: &Mesh) {
        let outward = mesh
            .positions
            .iter()
            .zip(&mesh.normals)
            .filter(|(p, n)| p.dot(**n) > 0.0)
            .count();
        assert!(outward as f32 / mesh.vertex_count() as f32 > 0.95);
    }

    #[test]
    fn test_sphere_shape() {
        let mesh = uv_sphere(2.0, 16, 12);
        assert_valid(&mesh);
        assert_outward(&mesh);
        for p in &mesh.positions {
            assert!((p.length() - 2.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_box_normals_outward() {
        let mesh = subdivided_box(Vec3::splat(3.0), [4, 4, 4]);
        assert_valid(&mesh);
        assert_outward(&mesh);
        assert_eq!(mesh.triangle_count(), 6 * 4 * 4 * 2);
    }

    #[test]
    fn test_polyhedra_are_closed_spheres() {
        let ico = icosahedron(1.0, 0);
        assert_eq!(ico.vertex_count(), 12);
        assert_eq!(ico.triangle_count(), 20);
        assert_outward(&ico);

        let dense = icosahedron(5.0, 3);
        assert_valid(&dense);
        assert_eq!(dense.triangle_count(), 20 * 16);
        // Euler characteristic of a closed sphere: V - E + F = 2
        let v = dense.vertex_count() as i64;
        let f = dense.triangle_count() as i64;
        assert_eq!(v - f * 3 / 2 + f, 2);

        let dodeca = dodecahedron(3.0, 2);
        assert_valid(&dodeca);
        assert_outward(&dodeca);
    }

    #[test]
    fn test_torus_normals_point_away_from_ring() {
        let mesh = torus(4.0, 1.0, 16, 32, TAU);
        assert_valid(&mesh);
        for (p, n) in mesh.positions.iter().zip(&mesh.normals) {
            let ring = Vec3::new(p.x, p.y, 0.0).normalize() * 4.0;
            assert!((*p - ring).dot(*n) > 0.0);
        }
    }

    #[test]
    fn test_torus_knot_and_props_valid() {
        assert_valid(&torus_knot(4.0, 1.0, 64, 12));
        assert_valid(&chair());
        assert_valid(&lamp());
        assert_valid(&sofa());
        assert_valid(&mug());
        assert_valid(&plane(4.0, 8));
    }

    #[test]
    fn test_plane_faces_positive_z() {
        let mesh = plane(2.0, 2);
        for n in &mesh.normals {
            assert!((n.z - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_recompute_normals_survives_degenerate_triangles() {
        let positions = vec![Vec3::ZERO, Vec3::ZERO, Vec3::ZERO];
        let mut normals = Vec::new();
        recompute_normals(&positions, &[0, 1, 2], &mut normals);
        for n in normals {
            assert_eq!(n, Vec3::Y);
        }
    }
}
