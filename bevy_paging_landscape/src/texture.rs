//! Page texture residency and height-band colouring

use crate::config::Options;
use bevy::log::debug;
use bevy::prelude::*;
use std::collections::HashSet;

/// Colours of the three height bands (low, mid, high) and of steep rock
const BAND_COLORS: [[f32; 4]; 3] = [
    [0.30, 0.45, 0.20, 1.0],
    [0.45, 0.38, 0.28, 1.0],
    [0.92, 0.92, 0.95, 1.0],
];
const ROCK_COLOR: [f32; 4] = [0.40, 0.40, 0.42, 1.0];

/// Slope (1 - normal.y) above which rock replaces the band colour
const ROCK_SLOPE: f32 = 0.35;

/// Tracks which pages have their texture loaded and shades by height band
pub struct TextureManager {
    loaded: HashSet<IVec2>,
    material_heights: (f32, f32),
}

impl TextureManager {
    pub fn new(options: &Options) -> Self {
        Self {
            loaded: HashSet::new(),
            material_heights: options.material_heights(),
        }
    }

    pub fn load(&mut self, page: IVec2) -> bool {
        let inserted = self.loaded.insert(page);
        if inserted {
            debug!("texture loaded for page {}", page);
        }
        inserted
    }

    pub fn unload(&mut self, page: IVec2) -> bool {
        self.loaded.remove(&page)
    }

    pub fn is_loaded(&self, page: IVec2) -> bool {
        self.loaded.contains(&page)
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    /// Vertex colour for a height (world units, relative to the data minimum) and surface normal
    pub fn color_at(&self, height: f32, normal: Vec3) -> [f32; 4] {
        if 1.0 - normal.y > ROCK_SLOPE {
            return ROCK_COLOR;
        }
        let (low, high) = self.material_heights;
        if height < low {
            BAND_COLORS[0]
        } else if height < high {
            BAND_COLORS[1]
        } else {
            BAND_COLORS[2]
        }
    }
}
