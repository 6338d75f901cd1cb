//! Grid sizing for the simulation, dye, bloom and sunrays targets.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Halves both axes `levels` times, as the bloom mip chain does.
    pub fn shifted_down(&self, levels: u32) -> Self {
        Self {
            width: self.width.checked_shr(levels).unwrap_or(0),
            height: self.height.checked_shr(levels).unwrap_or(0),
        }
    }
}

/// Maps a scalar resolution onto the drawing buffer's aspect ratio.
///
/// The short axis gets `resolution` texels, the long axis gets
/// `resolution * aspect`, both floored. Results are memoized per
/// `(buffer width, buffer height, resolution)` because the service asks
/// again on every resize poll.
#[derive(Debug, Default)]
pub struct ResolutionPlanner {
    cache: HashMap<(u32, u32, u32), Dimensions>,
}

impl ResolutionPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&mut self, drawing_buffer: Dimensions, resolution: u32) -> Dimensions {
        let key = (drawing_buffer.width, drawing_buffer.height, resolution);
        *self
            .cache
            .entry(key)
            .or_insert_with(|| plan(drawing_buffer, resolution))
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

fn plan(drawing_buffer: Dimensions, resolution: u32) -> Dimensions {
    if drawing_buffer.is_empty() {
        return Dimensions::new(resolution, resolution);
    }

    let width = drawing_buffer.width as f64;
    let height = drawing_buffer.height as f64;
    let aspect_ratio = (width / height).max(height / width);

    let min = resolution as f64;
    let max = min * aspect_ratio;

    if drawing_buffer.width > drawing_buffer.height {
        Dimensions::new(max.floor() as u32, min.floor() as u32)
    } else {
        Dimensions::new(min.floor() as u32, max.floor() as u32)
    }
}
