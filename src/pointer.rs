//! Pointer samples to texture-space movements.

use crate::resolution::Dimensions;

/// A pointer position in texture space (origin bottom-left) and the
/// aspect-corrected movement that led to it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TexMovement {
    pub x: f32,
    pub y: f32,
    pub delta_x: f32,
    pub delta_y: f32,
}

pub fn correct_delta_x(delta: f32, surface: Dimensions) -> f32 {
    let aspect_ratio = surface.aspect_ratio();
    if aspect_ratio < 1.0 {
        delta * aspect_ratio
    } else {
        delta
    }
}

pub fn correct_delta_y(delta: f32, surface: Dimensions) -> f32 {
    let aspect_ratio = surface.aspect_ratio();
    if aspect_ratio > 1.0 {
        delta / aspect_ratio
    } else {
        delta
    }
}

/// Pairs consecutive pointer samples into [`TexMovement`]s.
///
/// Samples are in surface pixels with the origin at the top-left, as window
/// systems report them.
#[derive(Debug, Default)]
pub struct PointerTracker {
    previous: Option<(f32, f32)>,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a movement once two samples are known and the pointer moved.
    pub fn track(&mut self, px: f32, py: f32, surface: Dimensions) -> Option<TexMovement> {
        if surface.is_empty() {
            return None;
        }

        let current = (
            px / surface.width as f32,
            py / surface.height as f32,
        );
        let previous = self.previous.replace(current)?;

        let movement = TexMovement {
            x: current.0,
            y: 1.0 - current.1,
            delta_x: correct_delta_x(current.0 - previous.0, surface),
            delta_y: correct_delta_y(previous.1 - current.1, surface),
        };
        (movement.delta_x.abs() > 0.0 || movement.delta_y.abs() > 0.0).then_some(movement)
    }

    /// Forgets the last sample, e.g. when the button is released.
    pub fn reset(&mut self) {
        self.previous = None;
    }
}

/// `amount` points on a ring around `center`, each pushing outwards.
///
/// `delta` widens the ring the forces point at; the ring is stretched so it
/// stays round on a non-square surface.
pub fn circle_points(
    center: (f32, f32),
    amount: usize,
    radius: f32,
    delta: f32,
    surface: Dimensions,
) -> Vec<TexMovement> {
    if amount == 0 || surface.is_empty() {
        return Vec::new();
    }

    let min_dimension = surface.width.min(surface.height) as f32;
    let vertical_ratio = surface.height as f32 / min_dimension;
    let horizontal_ratio = surface.width as f32 / min_dimension;
    let delta_radius = radius + delta;
    let angle_step = std::f32::consts::TAU / amount as f32;

    (0..amount)
        .map(|i| {
            let angle = 90.0 - angle_step + i as f32 * angle_step;
            let (sin, cos) = angle.sin_cos();
            TexMovement {
                x: center.0 + radius * cos * vertical_ratio,
                y: center.1 + radius * sin * horizontal_ratio,
                delta_x: center.0 + delta_radius * cos * vertical_ratio,
                delta_y: center.1 + delta_radius * sin * horizontal_ratio,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_only_primes() {
        let mut tracker = PointerTracker::new();
        assert!(tracker.track(10.0, 10.0, Dimensions::new(100, 100)).is_none());
    }

    #[test]
    fn movement_flips_y() {
        let surface = Dimensions::new(100, 100);
        let mut tracker = PointerTracker::new();
        tracker.track(50.0, 50.0, surface);
        let movement = tracker.track(60.0, 40.0, surface).unwrap();

        assert!((movement.x - 0.6).abs() < 1e-6);
        assert!((movement.y - 0.6).abs() < 1e-6);
        assert!((movement.delta_x - 0.1).abs() < 1e-6);
        assert!((movement.delta_y - 0.1).abs() < 1e-6, "moving up is positive");
    }

    #[test]
    fn stationary_pointer_is_dropped() {
        let surface = Dimensions::new(100, 100);
        let mut tracker = PointerTracker::new();
        tracker.track(5.0, 5.0, surface);
        assert!(tracker.track(5.0, 5.0, surface).is_none());
        assert!(tracker.track(6.0, 5.0, surface).is_some());
    }

    #[test]
    fn deltas_are_aspect_corrected() {
        let wide = Dimensions::new(200, 100);
        assert_eq!(correct_delta_x(0.5, wide), 0.5);
        assert_eq!(correct_delta_y(0.5, wide), 0.25);

        let tall = Dimensions::new(100, 200);
        assert_eq!(correct_delta_x(0.5, tall), 0.25);
        assert_eq!(correct_delta_y(0.5, tall), 0.5);
    }

    #[test]
    fn ring_has_requested_points() {
        let points = circle_points((0.5, 0.5), 16, 0.1, 250.0, Dimensions::new(100, 100));
        assert_eq!(points.len(), 16);
        for point in &points {
            let r = ((point.x - 0.5).powi(2) + (point.y - 0.5).powi(2)).sqrt();
            assert!((r - 0.1).abs() < 1e-4);
        }
        assert!(circle_points((0.5, 0.5), 0, 0.1, 1.0, Dimensions::new(1, 1)).is_empty());
    }
}
