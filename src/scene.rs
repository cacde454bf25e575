// Demo scene: the current mesh plus the schedule that subdivides it.

use crate::config::DemoConfig;
use crate::mesh::{TriangleMesh, Xorshift32};
use glam::Vec2;
use std::time::{Duration, Instant};

pub struct Scene {
    initial: [Vec2; 3],
    mesh: TriangleMesh,
    step_interval: Duration,
    max_depth: u32,
    auto_step: bool,
    last_step: Instant,
}

impl Scene {
    pub fn new(config: &DemoConfig, now: Instant) -> Self {
        let initial = config.initial_vertices();
        Self {
            initial,
            mesh: TriangleMesh::triangle(initial[0], initial[1], initial[2]),
            step_interval: config.step_interval(),
            max_depth: config.max_depth,
            auto_step: config.auto_step,
            last_step: now,
        }
    }

    pub fn mesh(&self) -> &TriangleMesh {
        &self.mesh
    }

    pub fn auto_step(&self) -> bool {
        self.auto_step
    }

    /// Advance the automatic schedule. Returns true when the mesh changed.
    pub fn update(&mut self, now: Instant) -> bool {
        match self.next_deadline() {
            Some(deadline) if now >= deadline => {
                self.subdivide(now);
                true
            }
            _ => false,
        }
    }

    /// When the next automatic step is due, if one is still pending
    pub fn next_deadline(&self) -> Option<Instant> {
        if !self.auto_step || self.at_max_depth() {
            return None;
        }
        // an interval too long to represent as an instant is never due
        self.last_step.checked_add(self.step_interval)
    }

    /// Force a subdivision now. Returns false once max depth is reached.
    pub fn step(&mut self, now: Instant) -> bool {
        if self.at_max_depth() {
            log::info!("Already at max depth {}", self.max_depth);
            return false;
        }
        self.subdivide(now);
        true
    }

    pub fn reset(&mut self, now: Instant) {
        let [a, b, c] = self.initial;
        self.mesh = TriangleMesh::triangle(a, b, c);
        self.last_step = now;
        log::info!("Scene reset to the initial triangle");
    }

    pub fn randomize(&mut self, rng: &mut Xorshift32, now: Instant) {
        self.mesh = TriangleMesh::random_triangle(rng);
        self.last_step = now;
        log::info!("Scene randomized: {:?}", self.mesh.vertices());
    }

    /// Pause or resume automatic stepping; resuming restarts the interval.
    pub fn toggle_auto_step(&mut self, now: Instant) -> bool {
        self.auto_step = !self.auto_step;
        self.last_step = now;
        self.auto_step
    }

    fn at_max_depth(&self) -> bool {
        self.mesh.depth() >= self.max_depth
    }

    fn subdivide(&mut self, now: Instant) {
        self.mesh.subdivide();
        self.last_step = now;
        log::info!(
            "Subdivided to depth {} ({} triangles)",
            self.mesh.depth(),
            self.mesh.triangle_count()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_depth: u32, auto_step: bool) -> DemoConfig {
        DemoConfig {
            max_depth,
            auto_step,
            step_interval_secs: 2.0,
            ..DemoConfig::default()
        }
    }

    #[test]
    fn waits_for_the_interval_before_stepping() {
        let start = Instant::now();
        let mut scene = Scene::new(&config(8, true), start);

        assert!(!scene.update(start + Duration::from_millis(1999)));
        assert_eq!(scene.mesh().depth(), 0);

        assert!(scene.update(start + Duration::from_secs(2)));
        assert_eq!(scene.mesh().depth(), 1);

        // the interval restarts from the step
        assert!(!scene.update(start + Duration::from_secs(3)));
        assert!(scene.update(start + Duration::from_secs(4)));
        assert_eq!(scene.mesh().depth(), 2);
    }

    #[test]
    fn a_late_update_steps_only_once() {
        let start = Instant::now();
        let mut scene = Scene::new(&config(8, true), start);
        assert!(scene.update(start + Duration::from_secs(60)));
        assert_eq!(scene.mesh().depth(), 1);
    }

    #[test]
    fn stops_at_max_depth() {
        let start = Instant::now();
        let mut scene = Scene::new(&config(2, true), start);
        let mut t = start;
        for _ in 0..5 {
            t += Duration::from_secs(2);
            scene.update(t);
        }
        assert_eq!(scene.mesh().depth(), 2);
        assert_eq!(scene.next_deadline(), None);
        assert!(!scene.step(t));
    }

    #[test]
    fn paused_scene_only_steps_on_demand() {
        let start = Instant::now();
        let mut scene = Scene::new(&config(8, false), start);
        assert_eq!(scene.next_deadline(), None);
        assert!(!scene.update(start + Duration::from_secs(10)));
        assert!(scene.step(start + Duration::from_secs(10)));
        assert_eq!(scene.mesh().depth(), 1);
    }

    #[test]
    fn resuming_restarts_the_interval() {
        let start = Instant::now();
        let mut scene = Scene::new(&config(8, false), start);
        let resume = start + Duration::from_secs(30);
        assert!(scene.toggle_auto_step(resume));
        assert_eq!(scene.next_deadline(), Some(resume + Duration::from_secs(2)));
    }

    #[test]
    fn huge_interval_never_comes_due() {
        let start = Instant::now();
        let demo = DemoConfig {
            step_interval_secs: 1e20,
            ..DemoConfig::default()
        };
        let mut scene = Scene::new(&demo, start);
        assert_eq!(scene.next_deadline(), None);
        assert!(!scene.update(start + Duration::from_secs(3600)));
        assert!(scene.step(start));
    }

    #[test]
    fn reset_restores_the_initial_triangle() {
        let start = Instant::now();
        let mut scene = Scene::new(&config(8, true), start);
        let initial = scene.mesh().clone();
        scene.step(start);
        scene.step(start);
        scene.reset(start);
        assert_eq!(scene.mesh(), &initial);
    }

    #[test]
    fn randomize_starts_over_at_depth_zero() {
        let start = Instant::now();
        let mut scene = Scene::new(&config(8, true), start);
        scene.step(start);
        let mut rng = Xorshift32::new(7);
        scene.randomize(&mut rng, start);
        assert_eq!(scene.mesh().depth(), 0);
        assert_eq!(scene.mesh().vertex_count(), 3);
    }
}
