// Triangle-list mesh and midpoint subdivision
//
// Each subdivision step replaces every triangle with its three corner
// triangles and drops the centre one, which converges on a Sierpinski
// triangle.

use anyhow::Result;
use glam::Vec2;

/// Deepest subdivision the demo allows: a single triangle grows to
/// 3^(depth + 1) vertices, about 1.6M (12.8 MB) at this depth.
pub const MAX_SUBDIVISION_DEPTH: u32 = 12;

/// Flat triangle list in normalized device coordinates.
///
/// Always holds a non-zero multiple of three vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleMesh {
    vertices: Vec<Vec2>,
    depth: u32,
}

impl TriangleMesh {
    pub fn new(vertices: Vec<Vec2>) -> Result<Self> {
        if vertices.is_empty() {
            anyhow::bail!("Triangle mesh needs at least one triangle");
        }
        if vertices.len() % 3 != 0 {
            anyhow::bail!(
                "Triangle list length must be a multiple of 3, got {}",
                vertices.len()
            );
        }
        Ok(Self { vertices, depth: 0 })
    }

    pub fn triangle(a: Vec2, b: Vec2, c: Vec2) -> Self {
        Self {
            vertices: vec![a, b, c],
            depth: 0,
        }
    }

    /// Random triangle with every corner in [-1, 1) on both axes
    pub fn random_triangle(rng: &mut Xorshift32) -> Self {
        let mut corner = || Vec2::new(rng.next_signed_unit(), rng.next_signed_unit());
        let (a, b, c) = (corner(), corner(), corner());
        Self::triangle(a, b, c)
    }

    /// One midpoint subdivision step over every triangle in the list.
    pub fn subdivide(&mut self) {
        let mut next = Vec::with_capacity(self.vertices.len() * 3);

        for tri in self.vertices.chunks_exact(3) {
            let (v0, v1, v2) = (tri[0], tri[1], tri[2]);
            let m01 = v0.lerp(v1, 0.5);
            let m02 = v0.lerp(v2, 0.5);
            let m12 = v1.lerp(v2, 0.5);

            // top, right and left corners in that order
            next.extend_from_slice(&[v0, m01, m02]);
            next.extend_from_slice(&[m01, v1, m12]);
            next.extend_from_slice(&[m02, m12, v2]);
        }

        self.vertices = next;
        self.depth += 1;
    }

    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.vertices.len() / 3
    }

    /// Number of subdivision steps applied since construction
    pub fn depth(&self) -> u32 {
        self.depth
    }
}

/// Small xorshift generator for the randomize key; quality is irrelevant here.
#[derive(Debug, Clone)]
pub struct Xorshift32 {
    state: u32,
}

impl Xorshift32 {
    pub fn new(seed: u32) -> Self {
        // zero is a fixed point of xorshift
        Self {
            state: if seed == 0 { 0x9E37_79B9 } else { seed },
        }
    }

    pub fn from_time() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos() ^ d.as_secs() as u32)
            .unwrap_or(0);
        Self::new(nanos)
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Uniform value in [-1, 1)
    pub fn next_signed_unit(&mut self) -> f32 {
        // top 24 bits fit exactly in an f32 mantissa
        let unit = (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32;
        unit * 2.0 - 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn total_area(mesh: &TriangleMesh) -> f32 {
        mesh.vertices()
            .chunks_exact(3)
            .map(|t| 0.5 * (t[1] - t[0]).perp_dot(t[2] - t[0]).abs())
            .sum()
    }

    fn unit_triangle() -> TriangleMesh {
        TriangleMesh::triangle(
            Vec2::new(0.0, -0.5),
            Vec2::new(0.5, 0.5),
            Vec2::new(-0.5, 0.5),
        )
    }

    #[test]
    fn rejects_empty_and_ragged_lists() {
        assert!(TriangleMesh::new(Vec::new()).is_err());
        assert!(TriangleMesh::new(vec![Vec2::ZERO; 4]).is_err());
        assert!(TriangleMesh::new(vec![Vec2::ZERO; 6]).is_ok());
    }

    #[test]
    fn single_step_produces_corner_triangles_in_order() {
        let mut mesh = unit_triangle();
        mesh.subdivide();

        let v0 = Vec2::new(0.0, -0.5);
        let v1 = Vec2::new(0.5, 0.5);
        let v2 = Vec2::new(-0.5, 0.5);
        let m01 = Vec2::new(0.25, 0.0);
        let m02 = Vec2::new(-0.25, 0.0);
        let m12 = Vec2::new(0.0, 0.5);

        let expected = [v0, m01, m02, m01, v1, m12, m02, m12, v2];
        assert_eq!(mesh.vertex_count(), expected.len());
        for (got, want) in mesh.vertices().iter().zip(expected) {
            assert!(got.abs_diff_eq(want, 1e-6), "{got} != {want}");
        }
        assert_eq!(mesh.depth(), 1);
    }

    #[test]
    fn counts_grow_by_powers_of_three() {
        let mut mesh = unit_triangle();
        for depth in 1..=5u32 {
            mesh.subdivide();
            assert_eq!(mesh.depth(), depth);
            assert_eq!(mesh.triangle_count(), 3usize.pow(depth));
            assert_eq!(mesh.vertex_count(), 3usize.pow(depth + 1));
        }
    }

    #[test]
    fn each_step_keeps_three_quarters_of_the_area() {
        let mut mesh = unit_triangle();
        let mut area = total_area(&mesh);
        assert_relative_eq!(area, 0.5);
        for _ in 0..4 {
            mesh.subdivide();
            let next = total_area(&mesh);
            assert_relative_eq!(next, area * 0.75, epsilon = 1e-6);
            area = next;
        }
    }

    #[test]
    fn deepest_mesh_vertex_count_fits_a_draw_call() {
        let vertices = 3u64.pow(MAX_SUBDIVISION_DEPTH + 1);
        assert!(u32::try_from(vertices).is_ok());
    }

    #[test]
    fn outer_corners_survive_subdivision() {
        let mut mesh = unit_triangle();
        let corners = mesh.vertices().to_vec();
        mesh.subdivide();
        mesh.subdivide();
        for corner in corners {
            assert!(mesh.vertices().contains(&corner));
        }
    }

    #[test]
    fn subdivides_every_triangle_of_a_multi_triangle_list() {
        let mut mesh = TriangleMesh::new(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(0.0, 0.0),
            Vec2::new(-1.0, 0.0),
            Vec2::new(0.0, -1.0),
        ])
        .unwrap();
        mesh.subdivide();
        assert_eq!(mesh.triangle_count(), 6);
        assert!(mesh.vertices()[9].abs_diff_eq(Vec2::new(0.0, 0.0), 1e-6));
        assert!(mesh.vertices()[10].abs_diff_eq(Vec2::new(-0.5, 0.0), 1e-6));
    }

    #[test]
    fn random_triangles_stay_in_clip_space() {
        let mut rng = Xorshift32::new(42);
        for _ in 0..100 {
            let mesh = TriangleMesh::random_triangle(&mut rng);
            assert_eq!(mesh.vertex_count(), 3);
            for v in mesh.vertices() {
                assert!((-1.0..1.0).contains(&v.x));
                assert!((-1.0..1.0).contains(&v.y));
            }
        }
    }

    #[test]
    fn zero_seed_does_not_get_stuck() {
        let mut rng = Xorshift32::new(0);
        assert_ne!(rng.next_u32(), 0);
    }
}
