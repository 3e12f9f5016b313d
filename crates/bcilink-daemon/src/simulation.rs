//! Simulated scene objects
//!
//! Stand-ins for engine objects: each one circles the origin in the XZ
//! plane and is projected onto a fixed 1920x1080 screen.

use bcilink_core::ObjectSource;
use std::cell::Cell;
use std::f32::consts::TAU;

use crate::config::ObjectConfig;

const SCREEN_WIDTH: f32 = 1920.0;
const SCREEN_HEIGHT: f32 = 1080.0;
/// Pixels per metre at the projection plane
const PIXELS_PER_METRE: f32 = 200.0;
/// Distance from the camera to the orbit centre
const CAMERA_DISTANCE: f32 = 10.0;

pub struct SimulatedObject {
    name: String,
    radius: f32,
    period_secs: f32,
    elapsed: Cell<f32>,
}

impl SimulatedObject {
    pub fn new(name: impl Into<String>, radius: f32, period_secs: f32) -> Self {
        Self {
            name: name.into(),
            radius,
            period_secs,
            elapsed: Cell::new(0.0),
        }
    }

    pub fn from_config(config: &ObjectConfig) -> Self {
        Self::new(config.name.clone(), config.radius, config.period_secs)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed.get()
    }

    /// Move the simulation forward by `dt` seconds
    pub fn advance(&self, dt: f32) {
        self.elapsed.set(self.elapsed.get() + dt);
    }

    fn angle(&self) -> f32 {
        if self.period_secs <= 0.0 {
            return 0.0;
        }
        TAU * self.elapsed.get() / self.period_secs
    }
}

impl ObjectSource for SimulatedObject {
    fn position(&self) -> [f32; 3] {
        let angle = self.angle();
        [self.radius * angle.cos(), 0.0, self.radius * angle.sin()]
    }

    fn screen_position(&self) -> [f32; 3] {
        let [x, y, z] = self.position();
        [
            SCREEN_WIDTH / 2.0 + x * PIXELS_PER_METRE,
            SCREEN_HEIGHT / 2.0 - y * PIXELS_PER_METRE,
            CAMERA_DISTANCE + z,
        ]
    }

    fn is_visible(&self) -> Option<bool> {
        let [x, y, depth] = self.screen_position();
        Some(depth > 0.0 && (0.0..SCREEN_WIDTH).contains(&x) && (0.0..SCREEN_HEIGHT).contains(&y))
    }

    fn speed(&self) -> Option<f32> {
        if self.period_secs <= 0.0 {
            return Some(0.0);
        }
        Some(TAU * self.radius / self.period_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_orbit() {
        let object = SimulatedObject::new("Cube", 2.0, 4.0);
        let [x, _, z] = object.position();
        assert!(close(x, 2.0) && close(z, 0.0));

        // a quarter period later the object is on the Z axis
        object.advance(1.0);
        let [x, _, z] = object.position();
        assert!(close(x, 0.0) && close(z, 2.0));

        assert!(close(object.speed().unwrap(), TAU * 2.0 / 4.0));
    }

    #[test]
    fn test_screen_projection() {
        let object = SimulatedObject::new("Cube", 1.0, 4.0);
        let [sx, sy, depth] = object.screen_position();
        assert!(close(sx, 1160.0));
        assert!(close(sy, 540.0));
        assert!(close(depth, 10.0));
        assert_eq!(object.is_visible(), Some(true));

        let far = SimulatedObject::new("Far", 10.0, 4.0);
        assert_eq!(far.is_visible(), Some(false));
    }

    #[test]
    fn test_zero_period_is_static() {
        let object = SimulatedObject::new("Still", 1.0, 0.0);
        object.advance(3.0);
        assert_eq!(object.position(), [1.0, 0.0, 0.0]);
        assert_eq!(object.speed(), Some(0.0));
    }
}
