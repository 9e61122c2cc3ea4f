//! Height sources and the 2D height-data provider
//!
//! A `HeightmapSource` describes the pristine terrain at any world position.
//! A `HeightDataProvider` owns the per-page sample grids the landscape
//! actually reads and edits; pages are filled from a source when streamed in.

use crate::config::Options;
use crate::tile::TileInfo;
use bevy::log::debug;
use bevy::prelude::*;
use fastnoise_lite::{FastNoiseLite, FractalType, NoiseType};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Trait for height sampling at any world coordinate
pub trait HeightmapSource: Send + Sync + 'static {
    /// Sample the height, in world units, at a given world position
    fn sample(&self, x: f32, z: f32) -> f32;
}

/// Simple procedural heightmap using a closure
pub struct ProceduralHeightmap<F>
where
    F: Fn(f32, f32) -> f32 + Send + Sync + 'static,
{
    height_fn: F,
}

impl<F> ProceduralHeightmap<F>
where
    F: Fn(f32, f32) -> f32 + Send + Sync + 'static,
{
    pub fn new(height_fn: F) -> Self {
        Self { height_fn }
    }
}

impl<F> HeightmapSource for ProceduralHeightmap<F>
where
    F: Fn(f32, f32) -> f32 + Send + Sync + 'static,
{
    fn sample(&self, x: f32, z: f32) -> f32 {
        (self.height_fn)(x, z)
    }
}

/// Shaping parameters for `TerrainNoise`
#[derive(Clone, Debug)]
pub struct NoiseSettings {
    /// Height of the highest peaks in world units
    pub max_height: f32,
    /// Continental level above which ridges start to show (0.0-1.0)
    pub mountain_threshold: f32,
    /// Domain warp strength in world units
    pub warp_strength: f32,
}

impl Default for NoiseSettings {
    fn default() -> Self {
        Self {
            max_height: 200.0,
            mountain_threshold: 0.6,
            warp_strength: 40.0,
        }
    }
}

/// Multi-layer noise terrain: continents, rolling hills and masked ridges
pub struct TerrainNoise {
    continental: FastNoiseLite,
    erosion: FastNoiseLite,
    ridges: FastNoiseLite,
    warp: FastNoiseLite,
    detail: FastNoiseLite,
    settings: NoiseSettings,
}

impl Default for TerrainNoise {
    fn default() -> Self {
        Self::with_seed(42, NoiseSettings::default())
    }
}

impl TerrainNoise {
    /// Create terrain noise with a specific seed
    pub fn with_seed(seed: i32, settings: NoiseSettings) -> Self {
        let layer = |offset: i32, frequency: f32, fractal: FractalType, octaves: i32| {
            let mut noise = FastNoiseLite::with_seed(seed + offset);
            noise.set_noise_type(Some(NoiseType::OpenSimplex2S));
            noise.set_frequency(Some(frequency));
            noise.set_fractal_type(Some(fractal));
            noise.set_fractal_octaves(Some(octaves));
            noise
        };

        let mut erosion = layer(81, 0.0015, FractalType::FBm, 4);
        erosion.set_fractal_gain(Some(0.4));
        let mut ridges = layer(414, 0.003, FractalType::Ridged, 5);
        ridges.set_fractal_gain(Some(0.4));

        Self {
            continental: layer(0, 0.0004, FractalType::FBm, 4),
            erosion,
            ridges,
            warp: layer(747, 0.001, FractalType::FBm, 3),
            detail: layer(969, 0.05, FractalType::FBm, 2),
            settings,
        }
    }
}

impl HeightmapSource for TerrainNoise {
    fn sample(&self, x: f32, z: f32) -> f32 {
        let warp = self.settings.warp_strength;
        let wx = x + self.warp.get_noise_2d(x, z) * warp;
        let wz = z + self.warp.get_noise_2d(x + 1000.0, z + 1000.0) * warp;

        let continental = (self.continental.get_noise_2d(wx, wz) + 1.0) * 0.5;
        let erosion = (self.erosion.get_noise_2d(wx, wz) + 1.0) * 0.5;
        let mountain_mask =
            (continental - self.settings.mountain_threshold * 0.5).max(0.0) * 2.5;
        let ridge = self.ridges.get_noise_2d(wx, wz).max(0.0) * mountain_mask.powf(1.2);
        let detail = self.detail.get_noise_2d(wx, wz) * 0.02;

        let combined =
            (continental * 0.30 + erosion * 0.45 + ridge * 0.25 + detail).clamp(0.0, 1.0);
        smoothstep(0.0, 1.0, combined) * self.settings.max_height
    }
}

/// Smooth interpolation (ease in/out)
fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Sphere used for bulk terrain additions and removals
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeightSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl HeightSphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Vertical span `(bottom, top)` of the sphere above `(x, z)`, if any
    fn span_at(&self, x: f32, z: f32) -> Option<(f32, f32)> {
        let d2 = Vec2::new(x - self.center.x, z - self.center.z).length_squared();
        let r2 = self.radius * self.radius;
        if d2 > r2 {
            return None;
        }
        let half = (r2 - d2).sqrt();
        Some((self.center.y - half, self.center.y + half))
    }
}

/// Owner of the per-page height samples the landscape reads and edits
pub trait HeightDataProvider: Send + Sync {
    /// Make a page's samples resident. Returns `false` if it already was or lies outside the world.
    fn load_page(&mut self, page: IVec2) -> bool;

    /// Drop a page's samples. Returns `false` if it was not resident.
    fn unload_page(&mut self, page: IVec2) -> bool;

    fn is_page_loaded(&self, page: IVec2) -> bool;

    fn loaded_page_count(&self) -> usize;

    /// Interpolated terrain height at a world position. `info` names the tile
    /// the caller believes contains the point.
    fn real_world_height(&self, x: f32, z: f32, info: Option<&TileInfo>) -> f32;

    /// Lower the sample nearest to `point` by `delta`
    fn deform_height(&mut self, point: Vec3, delta: f32, info: Option<&TileInfo>) -> bool;

    /// Raise the surface to the top of `sphere` where the sphere reaches it
    fn add_new_height(&mut self, sphere: HeightSphere) -> bool;

    /// Carve the surface down to the bottom of `sphere` where the sphere reaches it
    fn remove_new_height(&mut self, sphere: HeightSphere) -> bool;

    /// Surface normal from central differences
    fn normal_at(&self, x: f32, z: f32, step: f32) -> Vec3 {
        let left = self.real_world_height(x - step, z, None);
        let right = self.real_world_height(x + step, z, None);
        let down = self.real_world_height(x, z - step, None);
        let up = self.real_world_height(x, z + step, None);

        let dx = (right - left) / (2.0 * step);
        let dz = (up - down) / (2.0 * step);

        Vec3::new(-dx, 1.0, -dz).normalize()
    }
}

/// In-memory height provider backed by a `HeightmapSource`
///
/// Edited pages keep their samples when they stream out, so a reload restores
/// every deformation without replaying an edit history.
pub struct HeightData2D {
    options: Options,
    source: Arc<dyn HeightmapSource>,
    pages: HashMap<IVec2, Vec<f32>>,
    /// Resident pages that differ from the source
    dirty: HashSet<IVec2>,
    /// Edited samples of pages that are not resident
    stored: HashMap<IVec2, Vec<f32>>,
}

impl HeightData2D {
    pub fn new(options: &Options, source: Arc<dyn HeightmapSource>) -> Self {
        Self {
            options: options.clone(),
            source,
            pages: HashMap::new(),
            dirty: HashSet::new(),
            stored: HashMap::new(),
        }
    }

    /// Number of pages, resident or not, that carry edits
    pub fn edited_page_count(&self) -> usize {
        self.dirty.len() + self.stored.len()
    }

    fn page_samples(&self) -> i32 {
        self.options.page_size as i32
    }

    fn clamp_height(&self, height: f32) -> f32 {
        let (min, max) = self.options.height_range();
        height.clamp(min, max)
    }

    /// Pages holding a copy of a global sample; edge samples are shared
    fn pages_holding(&self, sample: IVec2) -> Vec<IVec2> {
        let span = self.page_samples() - 1;
        let axis = |g: i32, pages: i32| -> Vec<i32> {
            let mut found = Vec::with_capacity(2);
            let page = g / span;
            if page < pages {
                found.push(page);
            }
            if g % span == 0 && page > 0 {
                found.push(page - 1);
            }
            found
        };
        let xs = axis(sample.x, self.options.world_width as i32);
        let zs = axis(sample.y, self.options.world_height as i32);
        xs.iter()
            .flat_map(|&x| zs.iter().map(move |&z| IVec2::new(x, z)))
            .collect()
    }

    fn sample_in_range(&self, sample: IVec2) -> bool {
        let max = self.options.world_samples().as_ivec2();
        sample.x >= 0 && sample.y >= 0 && sample.x <= max.x && sample.y <= max.y
    }

    fn local_index(&self, page: IVec2, sample: IVec2) -> Option<usize> {
        let span = self.page_samples() - 1;
        let local = sample - page * span;
        if local.x < 0 || local.y < 0 || local.x > span || local.y > span {
            return None;
        }
        Some((local.y * self.page_samples() + local.x) as usize)
    }

    /// Resident value of a global sample, preferring the hinted page
    fn sample(&self, sample: IVec2, hint: Option<IVec2>) -> Option<f32> {
        if let Some(page) = hint
            && let Some(samples) = self.pages.get(&page)
            && let Some(index) = self.local_index(page, sample)
        {
            return Some(samples[index]);
        }
        self.pages_holding(sample).into_iter().find_map(|page| {
            let samples = self.pages.get(&page)?;
            self.local_index(page, sample).map(|index| samples[index])
        })
    }

    /// Samples of a page filled from the source
    fn generate_page(&self, page: IVec2) -> Vec<f32> {
        let size = self.page_samples();
        let origin = page * (size - 1);
        let mut samples = Vec::with_capacity((size * size) as usize);
        for z in 0..size {
            for x in 0..size {
                let world = self.options.sample_to_world(origin + IVec2::new(x, z));
                samples.push(self.clamp_height(self.source.sample(world.x, world.y)));
            }
        }
        samples
    }

    /// Writable samples of a page. A page that is neither resident nor stored
    /// is generated into the store so the edit survives until it streams in
    fn edit_page(&mut self, page: IVec2) -> Option<&mut Vec<f32>> {
        if !self.options.page_in_world(page) {
            return None;
        }
        if self.pages.contains_key(&page) {
            self.dirty.insert(page);
            return self.pages.get_mut(&page);
        }
        if !self.stored.contains_key(&page) {
            let samples = self.generate_page(page);
            self.stored.insert(page, samples);
        }
        self.stored.get_mut(&page)
    }

    /// Current value of a global sample, resident or stored
    fn edited_sample(&self, sample: IVec2) -> Option<f32> {
        self.pages_holding(sample).into_iter().find_map(|page| {
            let index = self.local_index(page, sample)?;
            let samples = self.pages.get(&page).or_else(|| self.stored.get(&page))?;
            Some(samples[index])
        })
    }

    /// Write a global sample into every page holding it
    fn write_sample(&mut self, sample: IVec2, height: f32) -> bool {
        let mut written = false;
        for page in self.pages_holding(sample) {
            let Some(index) = self.local_index(page, sample) else {
                continue;
            };
            if let Some(samples) = self.edit_page(page) {
                samples[index] = height;
                written = true;
            }
        }
        written
    }

    fn nearest_sample(&self, x: f32, z: f32) -> IVec2 {
        self.options.world_to_sample(x, z).round().as_ivec2()
    }

    /// Apply a sphere to every sample under it
    fn apply_sphere(&mut self, sphere: HeightSphere, add: bool) -> bool {
        let (center, r) = (sphere.center, sphere.radius);
        let lo = self.nearest_sample(center.x - r, center.z - r);
        let hi = self.nearest_sample(center.x + r, center.z + r);
        let lo = lo.max(IVec2::ZERO);
        let hi = hi.min(self.options.world_samples().as_ivec2());

        let mut changed = false;
        for gz in lo.y..=hi.y {
            for gx in lo.x..=hi.x {
                let sample = IVec2::new(gx, gz);
                let world = self.options.sample_to_world(sample);
                let Some((bottom, top)) = sphere.span_at(world.x, world.y) else {
                    continue;
                };
                let height = self
                    .edited_sample(sample)
                    .unwrap_or_else(|| self.clamp_height(self.source.sample(world.x, world.y)));
                let target = if add {
                    (top > height && bottom <= height).then_some(top)
                } else {
                    (bottom < height && top >= height).then_some(bottom)
                };
                if let Some(target) = target {
                    let target = self.clamp_height(target);
                    if target != height {
                        changed |= self.write_sample(sample, target);
                    }
                }
            }
        }
        changed
    }

    fn apply_deform(&mut self, sample: IVec2, delta: f32) -> bool {
        let Some(height) = self.sample(sample, None) else {
            return false;
        };
        let lowered = self.clamp_height(height - delta);
        self.write_sample(sample, lowered)
    }
}

impl HeightDataProvider for HeightData2D {
    fn load_page(&mut self, page: IVec2) -> bool {
        if self.pages.contains_key(&page) || !self.options.page_in_world(page) {
            return false;
        }

        let samples = match self.stored.remove(&page) {
            Some(samples) => {
                self.dirty.insert(page);
                samples
            }
            None => self.generate_page(page),
        };
        self.pages.insert(page, samples);

        debug!("height data loaded for page {}", page);
        true
    }

    fn unload_page(&mut self, page: IVec2) -> bool {
        let Some(samples) = self.pages.remove(&page) else {
            return false;
        };
        if self.dirty.remove(&page) {
            self.stored.insert(page, samples);
            debug!("height data stored for edited page {}", page);
        } else {
            debug!("height data released for page {}", page);
        }
        true
    }

    fn is_page_loaded(&self, page: IVec2) -> bool {
        self.pages.contains_key(&page)
    }

    fn loaded_page_count(&self) -> usize {
        self.pages.len()
    }

    fn real_world_height(&self, x: f32, z: f32, info: Option<&TileInfo>) -> f32 {
        let max = self.options.world_samples().as_vec2();
        let position = self.options.world_to_sample(x, z).clamp(Vec2::ZERO, max);
        let base = position.floor();
        let fraction = position - base;
        let s00 = base.as_ivec2();
        let s11 = (base + Vec2::ONE).min(max).as_ivec2();
        let hint = info.map(TileInfo::page);

        let corners = [
            self.sample(s00, hint),
            self.sample(IVec2::new(s11.x, s00.y), hint),
            self.sample(IVec2::new(s00.x, s11.y), hint),
            self.sample(s11, hint),
        ];
        let [Some(h00), Some(h10), Some(h01), Some(h11)] = corners else {
            // Not resident: answer from the pristine source
            return self.clamp_height(self.source.sample(x, z));
        };

        let h0 = h00 * (1.0 - fraction.x) + h10 * fraction.x;
        let h1 = h01 * (1.0 - fraction.x) + h11 * fraction.x;
        h0 * (1.0 - fraction.y) + h1 * fraction.y
    }

    fn deform_height(&mut self, point: Vec3, delta: f32, info: Option<&TileInfo>) -> bool {
        let sample = self.nearest_sample(point.x, point.z);
        if !self.sample_in_range(sample) {
            return false;
        }
        if info.is_some_and(|info| self.sample(sample, Some(info.page())).is_none()) {
            return false;
        }
        self.apply_deform(sample, delta)
    }

    fn add_new_height(&mut self, sphere: HeightSphere) -> bool {
        self.apply_sphere(sphere, true)
    }

    fn remove_new_height(&mut self, sphere: HeightSphere) -> bool {
        self.apply_sphere(sphere, false)
    }
}
