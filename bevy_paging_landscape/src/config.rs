//! Landscape options, the settings loader and the generic option surface
//!
//! `Options` keeps the raw user values exactly as configured and a handful of
//! derived thresholds. Distances used on the hot path are stored squared so
//! streaming and LOD decisions never need a square root.

use crate::error::{LandscapeError, LandscapeResult};
use crate::heightmap::HeightSphere;
use crate::tile::TileInfo;
use bevy::math::bounding::Aabb2d;
use bevy::prelude::*;
use std::path::Path;

/// Flat key/value settings table, as read from a landscape config file
pub type SettingsTable = toml::Table;

/// Main configuration for the paging landscape
#[derive(Clone, Debug, PartialEq)]
pub struct Options {
    /// Height samples per page side (2^n + 1)
    pub page_size: u32,
    /// Height samples per tile side (2^m + 1)
    pub tile_size: u32,
    /// World extent along X, in pages
    pub world_width: u32,
    /// World extent along Z, in pages
    pub world_height: u32,
    /// Axis scale applied to sample spacing (X, Z) and heights (Y)
    pub scale: Vec3,
    /// Largest raw height value of the data
    pub max_value: f32,
    /// Smallest raw height value of the data
    pub min_value: f32,
    /// Pages within this ring distance of the camera keep their tiles
    pub max_adjacent_pages: u32,
    /// Pages within this ring distance of the camera keep their height data
    pub max_preload_pages: u32,
    /// Initial tile pool size
    pub num_tiles: u32,
    /// Tile pool growth step
    pub num_tiles_increment: u32,
    /// Initial renderable pool size
    pub num_renderables: u32,
    /// Renderable pool growth step
    pub num_renderables_increment: u32,
    /// Per-frame streaming budget (queue entries and renderables in flight)
    pub num_renderables_loading: u32,
    /// Distance, in tiles, within which tiles get a renderable
    pub visible_renderables: f32,
    /// Distance, in tiles, of one LOD step
    pub distance_lod: f32,
    /// Camera movement that triggers a re-evaluation of the page rings
    pub camera_threshold: f32,
    /// Highest LOD level; 0 derives it from the tile size
    pub max_render_level: u32,
    /// First texture band height, raw 0-255
    pub material_height1: f32,
    /// Second texture band height, raw 0-255
    pub material_height2: f32,

    camera_threshold_sq: f32,
    renderable_factor: f32,
    lod_factor: f32,
    render_levels: u32,
    scaled_material_height1: f32,
    scaled_material_height2: f32,
}

impl Default for Options {
    fn default() -> Self {
        let mut options = Self {
            page_size: 257,
            tile_size: 65,
            world_width: 4,
            world_height: 4,
            scale: Vec3::ONE,
            max_value: 255.0,
            min_value: 0.0,
            max_adjacent_pages: 2,
            max_preload_pages: 3,
            num_tiles: 64,
            num_tiles_increment: 16,
            num_renderables: 64,
            num_renderables_increment: 16,
            num_renderables_loading: 10,
            visible_renderables: 8.0,
            distance_lod: 4.0,
            camera_threshold: 5.0,
            max_render_level: 0,
            material_height1: 51.0,
            material_height2: 153.0,
            camera_threshold_sq: 0.0,
            renderable_factor: 0.0,
            lod_factor: 0.0,
            render_levels: 0,
            scaled_material_height1: 0.0,
            scaled_material_height2: 0.0,
        };
        options.derive_thresholds();
        options
    }
}

impl Options {
    /// Create options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for customizing options
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Read a TOML settings file and load options from it
    pub fn load_file(path: impl AsRef<Path>) -> LandscapeResult<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| LandscapeError::ConfigRead {
                path: path.to_path_buf(),
                source,
            })?;
        let settings: SettingsTable = content.parse()?;
        Self::from_settings(&settings)
    }

    /// Load options from a flat settings table.
    ///
    /// Absent keys keep their default. Values may be numbers or strings
    /// holding numbers.
    pub fn from_settings(settings: &SettingsTable) -> LandscapeResult<Self> {
        let mut options = Self::default();

        read_setting(settings, "PageSize", &mut options.page_size)?;
        read_setting(settings, "TileSize", &mut options.tile_size)?;
        read_setting(settings, "World_Width", &mut options.world_width)?;
        read_setting(settings, "World_Height", &mut options.world_height)?;
        read_setting(settings, "ScaleX", &mut options.scale.x)?;
        read_setting(settings, "ScaleY", &mut options.scale.y)?;
        read_setting(settings, "ScaleZ", &mut options.scale.z)?;
        read_setting(settings, "MaxValue", &mut options.max_value)?;
        read_setting(settings, "MinValue", &mut options.min_value)?;
        read_setting(settings, "Max_Adjacent_Pages", &mut options.max_adjacent_pages)?;
        read_setting(settings, "Max_Preload_Pages", &mut options.max_preload_pages)?;
        read_setting(settings, "Num_Tiles", &mut options.num_tiles)?;
        read_setting(settings, "Num_Tiles_Increment", &mut options.num_tiles_increment)?;
        read_setting(settings, "Num_Renderables", &mut options.num_renderables)?;
        read_setting(
            settings,
            "Num_Renderables_Increment",
            &mut options.num_renderables_increment,
        )?;
        read_setting(
            settings,
            "Num_Renderables_Loading",
            &mut options.num_renderables_loading,
        )?;
        read_setting(settings, "VisibleRenderables", &mut options.visible_renderables)?;
        read_setting(settings, "DistanceLOD", &mut options.distance_lod)?;
        read_setting(settings, "CameraThreshold", &mut options.camera_threshold)?;
        read_setting(settings, "MaxRenderLevel", &mut options.max_render_level)?;
        read_setting(settings, "MaterialHeight1", &mut options.material_height1)?;
        read_setting(settings, "MaterialHeight2", &mut options.material_height2)?;

        options.validate()?;
        options.derive_thresholds();
        Ok(options)
    }

    /// Check the geometric constraints the paging layout relies on
    pub fn validate(&self) -> LandscapeResult<()> {
        if !is_power_of_two_plus_one(self.page_size) {
            return Err(LandscapeError::InvalidSetting {
                key: "PageSize".to_string(),
                value: format!("{} is not 2^n + 1", self.page_size),
            });
        }
        if !is_power_of_two_plus_one(self.tile_size) {
            return Err(LandscapeError::InvalidSetting {
                key: "TileSize".to_string(),
                value: format!("{} is not 2^n + 1", self.tile_size),
            });
        }
        if self.tile_size > self.page_size {
            return Err(LandscapeError::InvalidGeometry(format!(
                "tile size {} exceeds page size {}",
                self.tile_size, self.page_size
            )));
        }
        if self.num_renderables_loading == 0 {
            return Err(LandscapeError::InvalidSetting {
                key: "Num_Renderables_Loading".to_string(),
                value: "0 would stall every page in the preload queue".to_string(),
            });
        }
        if self.world_width == 0 || self.world_height == 0 {
            return Err(LandscapeError::InvalidGeometry(
                "world must be at least one page wide".to_string(),
            ));
        }
        if self.scale.min_element() <= 0.0 {
            return Err(LandscapeError::InvalidGeometry(format!(
                "scale {} must be positive on every axis",
                self.scale
            )));
        }
        if self.max_value <= self.min_value {
            return Err(LandscapeError::InvalidGeometry(format!(
                "MaxValue {} must exceed MinValue {}",
                self.max_value, self.min_value
            )));
        }
        Ok(())
    }

    /// Recompute every derived threshold from the raw values
    pub fn derive_thresholds(&mut self) {
        self.derive_camera_threshold();
        self.derive_renderable_factor();
        self.derive_lod_factor();

        self.render_levels = if self.max_render_level == 0 {
            let mut level = 0;
            while (1u64 << level) < u64::from(self.tile_size) {
                level += 1;
            }
            level
        } else {
            self.max_render_level
        };

        let height_scale = (self.max_value - self.min_value) / 255.0;
        self.scaled_material_height1 = self.material_height1 * height_scale;
        self.scaled_material_height2 = self.material_height2 * height_scale;
    }

    fn derive_camera_threshold(&mut self) {
        self.camera_threshold_sq = self.camera_threshold * self.camera_threshold;
    }

    fn derive_renderable_factor(&mut self) {
        let extent = self.tile_extent_sum();
        self.renderable_factor = (self.visible_renderables * extent).powi(2);
    }

    fn derive_lod_factor(&mut self) {
        let extent = self.tile_extent_sum();
        self.lod_factor = (self.distance_lod * extent).powi(2);
    }

    /// `TileSize * ScaleX + TileSize * ScaleZ`, the unit of the user distances
    fn tile_extent_sum(&self) -> f32 {
        self.tile_size as f32 * self.scale.x + self.tile_size as f32 * self.scale.z
    }

    /// Squared camera re-evaluation distance
    pub fn camera_threshold_sq(&self) -> f32 {
        self.camera_threshold_sq
    }

    /// Squared distance within which a tile gets a renderable
    pub fn renderable_factor(&self) -> f32 {
        self.renderable_factor
    }

    /// Squared distance of one LOD step
    pub fn lod_factor(&self) -> f32 {
        self.lod_factor
    }

    /// Highest usable LOD level
    pub fn max_render_level(&self) -> u32 {
        self.render_levels
    }

    /// Texture band heights, scaled into the data's height range
    pub fn material_heights(&self) -> (f32, f32) {
        (self.scaled_material_height1, self.scaled_material_height2)
    }

    /// Ring distance within which pages keep their height data
    pub fn preload_radius(&self) -> u32 {
        self.max_preload_pages.max(self.max_adjacent_pages)
    }

    /// World size of one page (X, Z)
    pub fn page_world_size(&self) -> Vec2 {
        let samples = (self.page_size - 1) as f32;
        Vec2::new(samples * self.scale.x, samples * self.scale.z)
    }

    /// World size of one tile (X, Z)
    pub fn tile_world_size(&self) -> Vec2 {
        let samples = (self.tile_size - 1) as f32;
        Vec2::new(samples * self.scale.x, samples * self.scale.z)
    }

    /// Number of tiles along one page side
    pub fn tiles_per_page(&self) -> u32 {
        (self.page_size - 1) / (self.tile_size - 1)
    }

    /// Half extents `(W, H)` of the world rectangle centred on the origin
    pub fn world_half_extent(&self) -> Vec2 {
        let page = self.page_world_size();
        Vec2::new(
            self.world_width as f32 * page.x * 0.5,
            self.world_height as f32 * page.y * 0.5,
        )
    }

    /// Number of sample intervals across the world (X, Z)
    pub fn world_samples(&self) -> UVec2 {
        UVec2::new(
            self.world_width * (self.page_size - 1),
            self.world_height * (self.page_size - 1),
        )
    }

    /// Whether `(x, z)` lies in the closed world rectangle
    pub fn contains_world(&self, x: f32, z: f32) -> bool {
        let half = self.world_half_extent();
        x >= -half.x && x <= half.x && z >= -half.y && z <= half.y
    }

    /// Page containing `(x, z)`; may lie outside the world
    pub fn page_at(&self, x: f32, z: f32) -> IVec2 {
        let half = self.world_half_extent();
        let page = self.page_world_size();
        IVec2::new(
            ((x + half.x) / page.x).floor() as i32,
            ((z + half.y) / page.y).floor() as i32,
        )
    }

    /// Tile within its page containing `(x, z)`; may be computed outside the world
    pub fn tile_in_page_at(&self, x: f32, z: f32) -> IVec2 {
        let half = self.world_half_extent();
        let tile = self.tile_world_size();
        let per_page = self.tiles_per_page() as i32;
        IVec2::new(
            (((x + half.x) / tile.x).floor() as i32).rem_euclid(per_page),
            (((z + half.y) / tile.y).floor() as i32).rem_euclid(per_page),
        )
    }

    /// Whether a page coordinate lies inside the world
    pub fn page_in_world(&self, page: IVec2) -> bool {
        page.x >= 0
            && page.y >= 0
            && page.x < self.world_width as i32
            && page.y < self.world_height as i32
    }

    /// Tile under `(x, z)`, or `None` outside the world rectangle.
    ///
    /// Points on the far world edge belong to the last tile.
    pub fn tile_info_at(&self, x: f32, z: f32) -> Option<TileInfo> {
        if !self.contains_world(x, z) {
            return None;
        }
        let half = self.world_half_extent();
        let tile = self.tile_world_size();
        let per_page = self.tiles_per_page() as i32;

        let max_x = self.world_width as i32 * per_page - 1;
        let max_z = self.world_height as i32 * per_page - 1;
        let gx = (((x + half.x) / tile.x).floor() as i32).clamp(0, max_x);
        let gz = (((z + half.y) / tile.y).floor() as i32).clamp(0, max_z);

        Some(TileInfo::new(
            gx / per_page,
            gz / per_page,
            gx % per_page,
            gz % per_page,
        ))
    }

    /// World-space bounds of a tile on the XZ plane
    pub fn tile_bounds(&self, info: &TileInfo) -> Aabb2d {
        let half = self.world_half_extent();
        let tile = self.tile_world_size();
        let per_page = self.tiles_per_page() as i32;
        let gx = info.page_x * per_page + info.tile_x;
        let gz = info.page_z * per_page + info.tile_z;
        let min = Vec2::new(-half.x + gx as f32 * tile.x, -half.y + gz as f32 * tile.y);
        Aabb2d::new(min + tile * 0.5, tile * 0.5)
    }

    /// World-space centre of a tile on the XZ plane
    pub fn tile_center(&self, info: &TileInfo) -> Vec2 {
        let bounds = self.tile_bounds(info);
        (bounds.min + bounds.max) * 0.5
    }

    /// Convert a world position into fractional global sample coordinates
    pub fn world_to_sample(&self, x: f32, z: f32) -> Vec2 {
        let half = self.world_half_extent();
        Vec2::new((x + half.x) / self.scale.x, (z + half.y) / self.scale.z)
    }

    /// Convert global sample coordinates back into a world position
    pub fn sample_to_world(&self, sample: IVec2) -> Vec2 {
        let half = self.world_half_extent();
        Vec2::new(
            sample.x as f32 * self.scale.x - half.x,
            sample.y as f32 * self.scale.z - half.y,
        )
    }

    /// Height range `[min, max]` in world units
    pub fn height_range(&self) -> (f32, f32) {
        (self.min_value * self.scale.y, self.max_value * self.scale.y)
    }

    /// Whether `key` names an option of this surface
    pub fn has_option(&self, key: &str) -> bool {
        OptionKey::from_name(key).is_some()
    }

    /// All option keys this surface understands
    pub fn option_keys(&self) -> Vec<&'static str> {
        OptionKey::ALL.iter().map(|key| key.name()).collect()
    }

    /// Read an option; unknown keys yield `None`
    pub fn get_option(&self, key: &str) -> Option<OptionValue> {
        let key = OptionKey::from_name(key)?;
        let value = match key {
            OptionKey::PageSize => OptionValue::Integer(i64::from(self.page_size)),
            OptionKey::TileSize => OptionValue::Integer(i64::from(self.tile_size)),
            OptionKey::WorldWidth => OptionValue::Integer(i64::from(self.world_width)),
            OptionKey::WorldHeight => OptionValue::Integer(i64::from(self.world_height)),
            OptionKey::Scale => OptionValue::Vector(self.scale),
            OptionKey::VisibleRenderables => OptionValue::Real(self.visible_renderables),
            OptionKey::DistanceLod => OptionValue::Real(self.distance_lod),
            OptionKey::CameraThreshold => OptionValue::Real(self.camera_threshold),
            OptionKey::NumRenderablesLoading => {
                OptionValue::Integer(i64::from(self.num_renderables_loading))
            }
            OptionKey::MaxAdjacentPages => {
                OptionValue::Integer(i64::from(self.max_adjacent_pages))
            }
            OptionKey::MaxPreloadPages => OptionValue::Integer(i64::from(self.max_preload_pages)),
            OptionKey::VisibleDistance => OptionValue::Real(self.renderable_factor.sqrt()),
            OptionKey::VisibleLod => {
                OptionValue::Real(self.lod_factor.sqrt() / self.tile_extent_sum())
            }
            OptionKey::MaxRenderLevel => OptionValue::Integer(i64::from(self.render_levels)),
        };
        Some(value)
    }

    /// Write an option and re-derive the thresholds it feeds.
    ///
    /// Returns `false` for unknown keys, read-only keys and mistyped values.
    pub fn set_option(&mut self, key: &str, value: OptionValue) -> bool {
        let Some(key) = OptionKey::from_name(key) else {
            return false;
        };
        match key {
            OptionKey::Scale => match value.as_vector() {
                Some(scale) if scale.min_element() > 0.0 => {
                    self.scale = scale;
                    self.derive_renderable_factor();
                    self.derive_lod_factor();
                    true
                }
                _ => false,
            },
            OptionKey::VisibleRenderables => match value.as_real() {
                Some(distance) if distance >= 0.0 => {
                    self.visible_renderables = distance;
                    self.derive_renderable_factor();
                    true
                }
                _ => false,
            },
            OptionKey::DistanceLod => match value.as_real() {
                Some(distance) if distance >= 0.0 => {
                    self.distance_lod = distance;
                    self.derive_lod_factor();
                    true
                }
                _ => false,
            },
            OptionKey::CameraThreshold => match value.as_real() {
                Some(threshold) if threshold >= 0.0 => {
                    self.camera_threshold = threshold;
                    self.derive_camera_threshold();
                    true
                }
                _ => false,
            },
            OptionKey::NumRenderablesLoading => match value.as_count() {
                Some(budget) if budget > 0 => {
                    self.num_renderables_loading = budget;
                    true
                }
                _ => false,
            },
            OptionKey::MaxAdjacentPages => match value.as_count() {
                Some(radius) => {
                    self.max_adjacent_pages = radius;
                    true
                }
                None => false,
            },
            OptionKey::MaxPreloadPages => match value.as_count() {
                Some(radius) => {
                    self.max_preload_pages = radius;
                    true
                }
                None => false,
            },
            OptionKey::PageSize
            | OptionKey::TileSize
            | OptionKey::WorldWidth
            | OptionKey::WorldHeight
            | OptionKey::VisibleDistance
            | OptionKey::VisibleLod
            | OptionKey::MaxRenderLevel => false,
        }
    }
}

/// Keys of the generic option surface
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OptionKey {
    PageSize,
    TileSize,
    WorldWidth,
    WorldHeight,
    Scale,
    VisibleRenderables,
    DistanceLod,
    CameraThreshold,
    NumRenderablesLoading,
    MaxAdjacentPages,
    MaxPreloadPages,
    /// Read-only: square root of the renderable factor, in world units
    VisibleDistance,
    /// Read-only: LOD step distance recovered from the squared LOD factor
    VisibleLod,
    /// Read-only: derived highest LOD level
    MaxRenderLevel,
}

impl OptionKey {
    pub const ALL: [OptionKey; 14] = [
        OptionKey::PageSize,
        OptionKey::TileSize,
        OptionKey::WorldWidth,
        OptionKey::WorldHeight,
        OptionKey::Scale,
        OptionKey::VisibleRenderables,
        OptionKey::DistanceLod,
        OptionKey::CameraThreshold,
        OptionKey::NumRenderablesLoading,
        OptionKey::MaxAdjacentPages,
        OptionKey::MaxPreloadPages,
        OptionKey::VisibleDistance,
        OptionKey::VisibleLod,
        OptionKey::MaxRenderLevel,
    ];

    /// The string key used by tooling
    pub fn name(self) -> &'static str {
        match self {
            OptionKey::PageSize => "PageSize",
            OptionKey::TileSize => "TileSize",
            OptionKey::WorldWidth => "World_Width",
            OptionKey::WorldHeight => "World_Height",
            OptionKey::Scale => "Scale",
            OptionKey::VisibleRenderables => "VisibleRenderables",
            OptionKey::DistanceLod => "DistanceLOD",
            OptionKey::CameraThreshold => "CameraThreshold",
            OptionKey::NumRenderablesLoading => "Num_Renderables_Loading",
            OptionKey::MaxAdjacentPages => "Max_Adjacent_Pages",
            OptionKey::MaxPreloadPages => "Max_Preload_Pages",
            OptionKey::VisibleDistance => "VisibleDistance",
            OptionKey::VisibleLod => "VisibleLOD",
            OptionKey::MaxRenderLevel => "MaxRenderLevel",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|key| key.name() == name)
    }
}

/// Value carried through the generic option surface
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OptionValue {
    Real(f32),
    Integer(i64),
    Vector(Vec3),
    Sphere(HeightSphere),
}

impl OptionValue {
    /// Numeric value; integers widen to reals
    pub fn as_real(&self) -> Option<f32> {
        match *self {
            OptionValue::Real(value) => Some(value),
            OptionValue::Integer(value) => Some(value as f32),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            OptionValue::Integer(value) => Some(value),
            _ => None,
        }
    }

    /// Non-negative integer that fits a `u32`
    pub fn as_count(&self) -> Option<u32> {
        self.as_integer().and_then(|value| u32::try_from(value).ok())
    }

    pub fn as_vector(&self) -> Option<Vec3> {
        match *self {
            OptionValue::Vector(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_sphere(&self) -> Option<HeightSphere> {
        match *self {
            OptionValue::Sphere(value) => Some(value),
            _ => None,
        }
    }
}

/// Conversion from a raw settings value
trait SettingValue: Sized {
    fn from_setting(value: &toml::Value) -> Option<Self>;
}

impl SettingValue for u32 {
    fn from_setting(value: &toml::Value) -> Option<Self> {
        match value {
            toml::Value::Integer(value) => u32::try_from(*value).ok(),
            toml::Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }
}

impl SettingValue for f32 {
    fn from_setting(value: &toml::Value) -> Option<Self> {
        match value {
            toml::Value::Integer(value) => Some(*value as f32),
            toml::Value::Float(value) => Some(*value as f32),
            toml::Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }
}

fn read_setting<T: SettingValue>(
    settings: &SettingsTable,
    key: &str,
    field: &mut T,
) -> LandscapeResult<()> {
    let Some(value) = settings.get(key) else {
        return Ok(());
    };
    *field = T::from_setting(value).ok_or_else(|| LandscapeError::InvalidSetting {
        key: key.to_string(),
        value: value.to_string(),
    })?;
    Ok(())
}

fn is_power_of_two_plus_one(size: u32) -> bool {
    size >= 2 && (size - 1).is_power_of_two()
}

/// Builder for creating customized Options
#[derive(Default)]
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    /// Set the page and tile sizes in samples
    pub fn page_size(mut self, page_size: u32, tile_size: u32) -> Self {
        self.options.page_size = page_size;
        self.options.tile_size = tile_size;
        self
    }

    /// Set the world extent in pages
    pub fn world_size(mut self, width: u32, height: u32) -> Self {
        self.options.world_width = width;
        self.options.world_height = height;
        self
    }

    /// Set the axis scale
    pub fn scale(mut self, scale: Vec3) -> Self {
        self.options.scale = scale;
        self
    }

    /// Set the raw height range
    pub fn height_range(mut self, min_value: f32, max_value: f32) -> Self {
        self.options.min_value = min_value;
        self.options.max_value = max_value;
        self
    }

    /// Set the tile (adjacent) and height data (preload) radii in pages
    pub fn page_radii(mut self, adjacent: u32, preload: u32) -> Self {
        self.options.max_adjacent_pages = adjacent;
        self.options.max_preload_pages = preload;
        self
    }

    /// Set the initial tile pool size and its growth step
    pub fn tile_pool(mut self, size: u32, increment: u32) -> Self {
        self.options.num_tiles = size;
        self.options.num_tiles_increment = increment;
        self
    }

    /// Set the initial renderable pool size and its growth step
    pub fn renderable_pool(mut self, size: u32, increment: u32) -> Self {
        self.options.num_renderables = size;
        self.options.num_renderables_increment = increment;
        self
    }

    /// Set the per-frame streaming budget
    pub fn loading_budget(mut self, budget: u32) -> Self {
        self.options.num_renderables_loading = budget;
        self
    }

    /// Set the renderable distance in tiles
    pub fn visible_renderables(mut self, distance: f32) -> Self {
        self.options.visible_renderables = distance;
        self
    }

    /// Set the LOD step distance in tiles
    pub fn distance_lod(mut self, distance: f32) -> Self {
        self.options.distance_lod = distance;
        self
    }

    /// Set the camera re-evaluation distance
    pub fn camera_threshold(mut self, threshold: f32) -> Self {
        self.options.camera_threshold = threshold;
        self
    }

    /// Build the Options, validating the geometry and deriving thresholds
    pub fn build(self) -> LandscapeResult<Options> {
        let mut options = self.options;
        options.validate()?;
        options.derive_thresholds();
        Ok(options)
    }
}
