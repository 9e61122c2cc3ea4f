//! Landscape scene manager
//!
//! Owns the options and, once world geometry is loaded, every service the
//! streaming path needs. Also answers ray queries against the height field
//! and applies the crater brush when a query asks to modify the terrain.

use crate::config::{Options, OptionValue, SettingsTable};
use crate::error::LandscapeResult;
use crate::heightmap::{HeightData2D, HeightDataProvider, HeightSphere, HeightmapSource};
use crate::paging::{PageManager, PagingContext};
use crate::renderable::RenderablePool;
use crate::texture::TextureManager;
use crate::tile::{SegmentWalk, TileInfo, TilePool};
use bevy::log::{debug, info, warn};
use bevy::prelude::*;
use std::path::Path;
use std::sync::Arc;

/// Highest Y a ray start may be stepped through while entering the world
pub const WORLD_CEILING: f32 = 999_999.0;

/// Reported impact when a query misses
pub const NO_IMPACT: Vec3 = Vec3::splat(-1.0);

/// Brush radius in height samples
const BRUSH_RADIUS: i32 = 7;
/// Brush depth per unit of remaining radius
const BRUSH_DEPTH: f32 = 10.0;

/// Bounded jumps while stepping a ray start into the world rectangle
const MAX_ENTRY_JUMPS: usize = 8;

/// Scene-level keys of the option surface
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SceneKey {
    AddNewHeight,
    RemoveNewHeight,
    PagePreloadQueue,
    PageLoadQueue,
    PageUnloadQueue,
    PagePostUnloadQueue,
    NumTiles,
    NumFreeTiles,
    RenderablesCount,
    FreeRenderables,
    LoadingRenderables,
    NumVisibleRenderables,
    CurrentCameraPageX,
    CurrentCameraPageZ,
    CurrentCameraTileX,
    CurrentCameraTileZ,
    LastImpact,
    ImpactPageX,
    ImpactPageZ,
    ImpactTileX,
    ImpactTileZ,
}

impl SceneKey {
    pub const ALL: [SceneKey; 21] = [
        SceneKey::AddNewHeight,
        SceneKey::RemoveNewHeight,
        SceneKey::PagePreloadQueue,
        SceneKey::PageLoadQueue,
        SceneKey::PageUnloadQueue,
        SceneKey::PagePostUnloadQueue,
        SceneKey::NumTiles,
        SceneKey::NumFreeTiles,
        SceneKey::RenderablesCount,
        SceneKey::FreeRenderables,
        SceneKey::LoadingRenderables,
        SceneKey::NumVisibleRenderables,
        SceneKey::CurrentCameraPageX,
        SceneKey::CurrentCameraPageZ,
        SceneKey::CurrentCameraTileX,
        SceneKey::CurrentCameraTileZ,
        SceneKey::LastImpact,
        SceneKey::ImpactPageX,
        SceneKey::ImpactPageZ,
        SceneKey::ImpactTileX,
        SceneKey::ImpactTileZ,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SceneKey::AddNewHeight => "AddNewHeight",
            SceneKey::RemoveNewHeight => "RemoveNewHeight",
            SceneKey::PagePreloadQueue => "PagePreloadQueue",
            SceneKey::PageLoadQueue => "PageLoadQueue",
            SceneKey::PageUnloadQueue => "PageUnloadQueue",
            SceneKey::PagePostUnloadQueue => "PagePostUnloadQueue",
            SceneKey::NumTiles => "NumTiles",
            SceneKey::NumFreeTiles => "NumFreeTiles",
            SceneKey::RenderablesCount => "RenderablesCount",
            SceneKey::FreeRenderables => "FreeRenderables",
            SceneKey::LoadingRenderables => "LoadingRenderables",
            SceneKey::NumVisibleRenderables => "NumVisibleRenderables",
            SceneKey::CurrentCameraPageX => "CurrentCameraPageX",
            SceneKey::CurrentCameraPageZ => "CurrentCameraPageZ",
            SceneKey::CurrentCameraTileX => "CurrentCameraTileX",
            SceneKey::CurrentCameraTileZ => "CurrentCameraTileZ",
            SceneKey::LastImpact => "LastImpact",
            SceneKey::ImpactPageX => "ImpactPageX",
            SceneKey::ImpactPageZ => "ImpactPageZ",
            SceneKey::ImpactTileX => "ImpactTileX",
            SceneKey::ImpactTileZ => "ImpactTileZ",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|key| key.name() == name)
    }
}

/// Services that exist while world geometry is loaded.
///
/// Fields drop in declaration order: pages before the pools they draw from.
pub struct LandscapeWorld {
    pages: PageManager,
    tiles: TilePool,
    renderables: RenderablePool,
    textures: TextureManager,
    data: Box<dyn HeightDataProvider>,
}

impl LandscapeWorld {
    fn new(options: &Options, source: Arc<dyn HeightmapSource>) -> Self {
        Self {
            pages: PageManager::new(),
            tiles: TilePool::new(options),
            renderables: RenderablePool::new(options),
            textures: TextureManager::new(options),
            data: Box::new(HeightData2D::new(options, source)),
        }
    }

    pub fn pages(&self) -> &PageManager {
        &self.pages
    }

    pub fn tiles(&self) -> &TilePool {
        &self.tiles
    }

    pub fn renderables(&self) -> &RenderablePool {
        &self.renderables
    }

    pub fn renderables_mut(&mut self) -> &mut RenderablePool {
        &mut self.renderables
    }

    pub fn textures(&self) -> &TextureManager {
        &self.textures
    }

    pub fn data(&self) -> &dyn HeightDataProvider {
        self.data.as_ref()
    }

    /// Request a mesh rebuild for every resident tile overlapping a square
    fn flag_tiles(&mut self, options: &Options, center: Vec2, radius: f32) -> usize {
        let half = options.world_half_extent();
        let tile = options.tile_world_size();
        let per_page = options.tiles_per_page() as i32;
        let last = IVec2::new(
            options.world_width as i32 * per_page - 1,
            options.world_height as i32 * per_page - 1,
        );
        // Pad by one sample so tiles sharing an edge sample are included
        let pad = radius + options.scale.x.max(options.scale.z);
        let lo = ((center - pad + half) / tile).floor().as_ivec2().max(IVec2::ZERO);
        let hi = ((center + pad + half) / tile).floor().as_ivec2().min(last);

        let mut flagged = 0;
        for gz in lo.y..=hi.y {
            for gx in lo.x..=hi.x {
                let info = TileInfo::new(
                    gx / per_page,
                    gz / per_page,
                    gx % per_page,
                    gz % per_page,
                );
                let Some(tile) = self.pages.tile_for(options, &info) else {
                    continue;
                };
                if let Some(tile) = self.tiles.get(tile)
                    && tile.need_update(&mut self.renderables)
                {
                    flagged += 1;
                }
            }
        }
        flagged
    }
}

/// Entry point of the paging landscape
#[derive(Resource)]
pub struct LandscapeSceneManager {
    options: Options,
    source: Arc<dyn HeightmapSource>,
    world: Option<LandscapeWorld>,
    last_impact: Vec3,
}

impl LandscapeSceneManager {
    /// Create an empty scene that will fill pages from `source`
    pub fn new(source: Arc<dyn HeightmapSource>) -> Self {
        Self {
            options: Options::default(),
            source,
            world: None,
            last_impact: NO_IMPACT,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn world(&self) -> Option<&LandscapeWorld> {
        self.world.as_ref()
    }

    pub fn world_mut(&mut self) -> Option<&mut LandscapeWorld> {
        self.world.as_mut()
    }

    /// Options alongside the loaded world, for callers that edit both sides
    pub fn split_mut(&mut self) -> Option<(&Options, &mut LandscapeWorld)> {
        let world = self.world.as_mut()?;
        Some((&self.options, world))
    }

    pub fn is_world_loaded(&self) -> bool {
        self.world.is_some()
    }

    /// Load world geometry from a settings file, replacing any loaded world.
    ///
    /// On error the scene is left without geometry.
    pub fn load_world_geometry(&mut self, path: impl AsRef<Path>) -> LandscapeResult<()> {
        self.clear_scene();
        let options = Options::load_file(path.as_ref())?;
        self.setup(options);
        Ok(())
    }

    /// Load world geometry from an in-memory settings table
    pub fn load_world_geometry_from_settings(
        &mut self,
        settings: &SettingsTable,
    ) -> LandscapeResult<()> {
        self.clear_scene();
        let options = Options::from_settings(settings)?;
        self.setup(options);
        Ok(())
    }

    /// Load world geometry from prepared options
    pub fn load_world_geometry_with(&mut self, mut options: Options) -> LandscapeResult<()> {
        self.clear_scene();
        options.validate()?;
        options.derive_thresholds();
        self.setup(options);
        Ok(())
    }

    fn setup(&mut self, options: Options) {
        self.world = Some(LandscapeWorld::new(&options, Arc::clone(&self.source)));
        info!(
            "landscape loaded: {}x{} pages of {} samples, {} tiles per page",
            options.world_width,
            options.world_height,
            options.page_size,
            options.tiles_per_page().pow(2)
        );
        self.options = options;
    }

    /// Tear down the loaded world. Does nothing when no world is loaded.
    pub fn clear_scene(&mut self) {
        self.last_impact = NO_IMPACT;
        if self.world.take().is_some() {
            info!("landscape cleared");
        }
    }

    /// Stream around the camera, then clear the per-frame visibility marks
    pub fn update_scene_graph(&mut self, camera_pos: Vec3) {
        let Some(world) = self.world.as_mut() else {
            return;
        };
        let mut ctx = PagingContext {
            options: &self.options,
            tiles: &mut world.tiles,
            renderables: &mut world.renderables,
            textures: &mut world.textures,
            data: world.data.as_mut(),
        };
        world.pages.update(camera_pos, &mut ctx);
        world.renderables.reset_visibles();
    }

    pub fn has_option(&self, key: &str) -> bool {
        SceneKey::from_name(key).is_some() || self.options.has_option(key)
    }

    pub fn option_keys(&self) -> Vec<&'static str> {
        let mut keys: Vec<&'static str> = SceneKey::ALL.iter().map(|key| key.name()).collect();
        keys.extend(self.options.option_keys());
        keys
    }

    /// Write an option. Unknown keys, read-only keys and mistyped values return `false`.
    pub fn set_option(&mut self, key: &str, value: OptionValue) -> bool {
        match SceneKey::from_name(key) {
            Some(SceneKey::AddNewHeight) => self.edit_height(value, true),
            Some(SceneKey::RemoveNewHeight) => self.edit_height(value, false),
            Some(_) => false,
            None if key == "Scale" && self.world.is_some() => {
                warn!("Scale cannot change while world geometry is loaded");
                false
            }
            None => {
                let changed = self.options.set_option(key, value);
                if changed && let Some(world) = self.world.as_mut() {
                    world.pages.invalidate();
                }
                changed
            }
        }
    }

    /// Read an option. Unknown keys yield `None`, as do world diagnostics
    /// while no world is loaded.
    pub fn get_option(&self, key: &str) -> Option<OptionValue> {
        match SceneKey::from_name(key) {
            Some(scene_key) => self.scene_option(scene_key),
            None => self.options.get_option(key),
        }
    }

    fn scene_option(&self, key: SceneKey) -> Option<OptionValue> {
        let count = |value: usize| Some(OptionValue::Integer(value as i64));
        let coord = |value: i32| Some(OptionValue::Integer(i64::from(value)));

        match key {
            SceneKey::AddNewHeight | SceneKey::RemoveNewHeight => return None,
            SceneKey::LastImpact => return Some(OptionValue::Vector(self.last_impact)),
            SceneKey::ImpactPageX | SceneKey::ImpactPageZ => {
                let page = self.impact_info().map_or(IVec2::NEG_ONE, |info| info.page());
                return coord(if key == SceneKey::ImpactPageX { page.x } else { page.y });
            }
            SceneKey::ImpactTileX | SceneKey::ImpactTileZ => {
                let tile = self.impact_info().map_or(IVec2::NEG_ONE, |info| info.tile());
                return coord(if key == SceneKey::ImpactTileX { tile.x } else { tile.y });
            }
            _ => {}
        }

        let world = self.world.as_ref()?;
        match key {
            SceneKey::PagePreloadQueue => count(world.pages.preload_queue_size()),
            SceneKey::PageLoadQueue => count(world.pages.load_queue_size()),
            SceneKey::PageUnloadQueue => count(world.pages.unload_queue_size()),
            SceneKey::PagePostUnloadQueue => count(world.pages.post_unload_queue_size()),
            SceneKey::NumTiles => count(world.tiles.num_tiles()),
            SceneKey::NumFreeTiles => count(world.tiles.num_free()),
            SceneKey::RenderablesCount => count(world.renderables.capacity()),
            SceneKey::FreeRenderables => count(world.renderables.free_count()),
            SceneKey::LoadingRenderables => count(world.renderables.loading_count()),
            SceneKey::NumVisibleRenderables => count(world.renderables.visible_count()),
            SceneKey::CurrentCameraPageX => coord(world.pages.camera_page()?.x),
            SceneKey::CurrentCameraPageZ => coord(world.pages.camera_page()?.y),
            SceneKey::CurrentCameraTileX => coord(world.pages.camera_tile()?.x),
            SceneKey::CurrentCameraTileZ => coord(world.pages.camera_tile()?.y),
            _ => None,
        }
    }

    fn impact_info(&self) -> Option<TileInfo> {
        if self.last_impact == NO_IMPACT {
            return None;
        }
        self.options
            .tile_info_at(self.last_impact.x, self.last_impact.z)
    }

    fn edit_height(&mut self, value: OptionValue, add: bool) -> bool {
        let Some(sphere) = value.as_sphere() else {
            return false;
        };
        let Some(world) = self.world.as_mut() else {
            return false;
        };
        let changed = if add {
            world.data.add_new_height(sphere)
        } else {
            world.data.remove_new_height(sphere)
        };
        if changed {
            world.flag_tiles(&self.options, sphere.center.xz(), sphere.radius);
        }
        changed
    }

    /// Add terrain up to the top of `sphere`
    pub fn add_new_height(&mut self, sphere: HeightSphere) -> bool {
        self.edit_height(OptionValue::Sphere(sphere), true)
    }

    /// Carve terrain down to the bottom of `sphere`
    pub fn remove_new_height(&mut self, sphere: HeightSphere) -> bool {
        self.edit_height(OptionValue::Sphere(sphere), false)
    }

    /// Position of the last ray impact, `(-1, -1, -1)` after a miss
    pub fn last_impact(&self) -> Vec3 {
        self.last_impact
    }

    /// Terrain height at a world position inside the loaded world
    pub fn height_at(&self, x: f32, z: f32) -> Option<f32> {
        let world = self.world.as_ref()?;
        if !self.options.contains_world(x, z) {
            return None;
        }
        Some(world.data.real_world_height(x, z, None))
    }

    /// Terrain normal at a world position inside the loaded world
    pub fn normal_at(&self, x: f32, z: f32) -> Option<Vec3> {
        let world = self.world.as_ref()?;
        if !self.options.contains_world(x, z) {
            return None;
        }
        let step = self.options.scale.x.min(self.options.scale.z);
        Some(world.data.normal_at(x, z, step))
    }

    /// Intersect the segment direction from `start` towards `end` with the
    /// terrain. With `modify`, a crater is stamped at the impact.
    pub fn intersect_segment(&mut self, start: Vec3, end: Vec3, modify: bool) -> Option<Vec3> {
        let impact = self.find_impact(start, end);
        self.last_impact = impact.unwrap_or(NO_IMPACT);
        let point = impact?;
        if modify {
            self.stamp_crater(point);
        }
        Some(point)
    }

    fn find_impact(&self, start: Vec3, end: Vec3) -> Option<Vec3> {
        let world = self.world.as_ref()?;
        let dir = (end - start).normalize_or_zero();
        if dir == Vec3::ZERO {
            return None;
        }
        let start = self.enter_world(start, dir)?;

        if dir.x == 0.0 && dir.z == 0.0 {
            let height = world.data.real_world_height(start.x, start.z, None);
            let hit = start.y <= height || dir.y < 0.0;
            return hit.then(|| Vec3::new(start.x, height, start.z));
        }

        let mut point = start;
        loop {
            let tile = world.pages.tile_at(&self.options, point.x, point.z)?;
            let tile = world.tiles.get(tile)?;
            match tile.intersect_segment(point, dir, &self.options, world.data.as_ref()) {
                SegmentWalk::Hit(hit) => return Some(hit),
                SegmentWalk::Exit(next) => point = next,
                SegmentWalk::Miss => return None,
            }
        }
    }

    /// Step `start` along `dir` in whole increments until it lies over the
    /// world rectangle
    fn enter_world(&self, start: Vec3, dir: Vec3) -> Option<Vec3> {
        let half = self.options.world_half_extent();
        let in_height = |y: f32| (0.0..=WORLD_CEILING).contains(&y);

        let mut point = start;
        for _ in 0..MAX_ENTRY_JUMPS {
            if self.options.contains_world(point.x, point.z) {
                return Some(point);
            }
            if !in_height(point.y) {
                return None;
            }

            let mut steps = 0.0f32;
            for (position, direction, limit) in
                [(point.x, dir.x, half.x), (point.z, dir.z, half.y)]
            {
                let gap = if position < -limit {
                    -limit - position
                } else if position > limit {
                    position - limit
                } else {
                    continue;
                };
                // Moving away from, or parallel to, the world on this axis
                let closing = if position < -limit { direction } else { -direction };
                if closing <= 0.0 {
                    return None;
                }
                steps = steps.max((gap / closing).ceil());
            }
            point += dir * steps.max(1.0);
            if !in_height(point.y) {
                return None;
            }
        }
        None
    }

    /// Lower the terrain around `impact` with the radius-7 brush
    fn stamp_crater(&mut self, impact: Vec3) {
        let Some(world) = self.world.as_mut() else {
            return;
        };
        let center = self
            .options
            .world_to_sample(impact.x, impact.z)
            .round()
            .as_ivec2();
        let max = self.options.world_samples().as_ivec2();
        let in_world = |sample: IVec2| sample.cmpge(IVec2::ZERO).all() && sample.cmple(max).all();
        if !in_world(center) {
            debug!("impact {} outside the height grid, no edit", impact);
            return;
        }

        let radius_sq = BRUSH_RADIUS * BRUSH_RADIUS;
        let mut edited = 0;
        for dz in -BRUSH_RADIUS..=BRUSH_RADIUS {
            for dx in -BRUSH_RADIUS..=BRUSH_RADIUS {
                let remaining = radius_sq - dx * dx - dz * dz;
                let sample = center + IVec2::new(dx, dz);
                if remaining <= 0 || !in_world(sample) {
                    continue;
                }
                let delta = BRUSH_DEPTH * (remaining as f32).sqrt();
                let at = self.options.sample_to_world(sample);
                if world
                    .data
                    .deform_height(Vec3::new(at.x, impact.y, at.y), delta, None)
                {
                    edited += 1;
                }
            }
        }

        if edited > 0 {
            let radius = BRUSH_RADIUS as f32 * self.options.scale.x.max(self.options.scale.z);
            let flagged = world.flag_tiles(&self.options, impact.xz(), radius);
            debug!(
                "crater at {}: {} samples lowered, {} tiles flagged",
                impact, edited, flagged
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heightmap::ProceduralHeightmap;
    use std::io::Write;

    fn flat_scene(height: f32) -> LandscapeSceneManager {
        let mut scene =
            LandscapeSceneManager::new(Arc::new(ProceduralHeightmap::new(move |_, _| height)));
        let options = Options::builder()
            .page_size(257, 65)
            .world_size(2, 2)
            .scale(Vec3::ONE)
            .build()
            .unwrap();
        scene.load_world_geometry_with(options).unwrap();
        scene
    }

    fn settle(scene: &mut LandscapeSceneManager, camera: Vec3) {
        for _ in 0..20 {
            scene.update_scene_graph(camera);
        }
    }

    fn sample_height(scene: &LandscapeSceneManager, sample: IVec2) -> f32 {
        let at = scene.options().sample_to_world(sample);
        scene.height_at(at.x, at.y).unwrap()
    }

    #[test]
    fn test_vertical_ray_hits_flat_ground() {
        let mut scene = flat_scene(10.0);
        settle(&mut scene, Vec3::ZERO);

        let hit = scene.intersect_segment(
            Vec3::new(0.0, 100.0, 0.0),
            Vec3::new(0.0, -100.0, 0.0),
            false,
        );
        assert_eq!(hit.map(|p| p.y), Some(10.0));
        assert_eq!(scene.last_impact(), Vec3::new(0.0, 10.0, 0.0));
    }

    #[test]
    fn test_vertical_ray_upwards_from_above_misses() {
        let mut scene = flat_scene(10.0);
        let hit = scene.intersect_segment(
            Vec3::new(0.0, 50.0, 0.0),
            Vec3::new(0.0, 100.0, 0.0),
            false,
        );
        assert_eq!(hit, None);

        // From below the surface it still counts as a hit
        let hit = scene.intersect_segment(Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, 100.0, 0.0), false);
        assert_eq!(hit, Some(Vec3::new(0.0, 10.0, 0.0)));
    }

    #[test]
    fn test_ray_pointing_away_misses() {
        let mut scene = flat_scene(10.0);
        settle(&mut scene, Vec3::ZERO);

        let start = Vec3::new(10_256.0, 50.0, 0.0);
        let hit = scene.intersect_segment(start, start + Vec3::new(100.0, -1.0, 0.0), false);
        assert_eq!(hit, None);
        assert_eq!(scene.last_impact(), NO_IMPACT);
        assert_eq!(
            scene.get_option("LastImpact"),
            Some(OptionValue::Vector(Vec3::new(-1.0, -1.0, -1.0)))
        );
        assert_eq!(scene.get_option("ImpactTileX"), Some(OptionValue::Integer(-1)));
    }

    #[test]
    fn test_ray_from_outside_enters_world() {
        let mut scene = flat_scene(10.0);
        settle(&mut scene, Vec3::ZERO);

        let start = Vec3::new(-1000.0, 30.0, 5.0);
        let hit = scene
            .intersect_segment(start, Vec3::new(0.0, 0.0, 5.0), false)
            .unwrap();
        assert_eq!(hit.y, 10.0);
        assert!(scene.options().contains_world(hit.x, hit.z));
    }

    #[test]
    fn test_ray_dropping_below_ground_before_entry_misses() {
        let mut scene = flat_scene(10.0);
        settle(&mut scene, Vec3::ZERO);

        // Crosses y = 0 near x = -500, well before the world edge at -256
        let hit = scene.intersect_segment(
            Vec3::new(-1000.0, 0.5, 0.0),
            Vec3::new(0.0, -0.5, 0.0),
            false,
        );
        assert_eq!(hit, None);
        assert_eq!(scene.last_impact(), NO_IMPACT);
    }

    #[test]
    fn test_oblique_ray_walks_across_tiles() {
        let mut scene = flat_scene(10.0);
        settle(&mut scene, Vec3::ZERO);

        let hit = scene
            .intersect_segment(
                Vec3::new(-200.0, 100.0, -200.0),
                Vec3::new(200.0, -100.0, 200.0),
                false,
            )
            .unwrap();
        assert_eq!(hit.y, 10.0);
        // 90 units of descent move the ray 180 units along each axis
        assert!((hit.x + 20.0).abs() < 1.0, "hit at {hit}");
        assert!((hit.z + 20.0).abs() < 1.0, "hit at {hit}");

        let page = scene.get_option("ImpactPageX").unwrap().as_integer();
        assert_eq!(page, Some(0));
        let tile_x = scene.get_option("ImpactTileX").unwrap().as_integer();
        assert_eq!(tile_x, Some(3));
    }

    #[test]
    fn test_ray_over_unloaded_tiles_misses() {
        let mut scene = flat_scene(10.0);
        // No update yet: nothing is resident
        let hit = scene.intersect_segment(
            Vec3::new(-200.0, 100.0, -200.0),
            Vec3::new(200.0, -100.0, 200.0),
            false,
        );
        assert_eq!(hit, None);
    }

    #[test]
    fn test_crater_brush_radius() {
        let mut scene = flat_scene(200.0);
        settle(&mut scene, Vec3::ZERO);

        // An impact at the origin is a real impact
        let hit = scene.intersect_segment(
            Vec3::new(0.0, 300.0, 0.0),
            Vec3::new(0.0, -300.0, 0.0),
            true,
        );
        assert_eq!(hit, Some(Vec3::new(0.0, 200.0, 0.0)));

        let center = IVec2::new(256, 256);
        assert_eq!(sample_height(&scene, center), 130.0);
        for dz in -9..=9 {
            for dx in -9..=9 {
                let height = sample_height(&scene, center + IVec2::new(dx, dz));
                if dx * dx + dz * dz < 49 {
                    assert!(height < 200.0, "({dx}, {dz}) untouched");
                } else {
                    assert_eq!(height, 200.0, "({dx}, {dz}) modified");
                }
            }
        }
    }

    #[test]
    fn test_crater_requests_mesh_updates() {
        let mut scene = flat_scene(200.0);
        settle(&mut scene, Vec3::ZERO);
        let world = scene.world_mut().unwrap();
        let ids: Vec<_> = world.renderables().iter().map(|(id, _)| id).collect();
        for id in ids {
            world.renderables_mut().take_update(id);
        }

        scene.intersect_segment(Vec3::new(0.0, 300.0, 0.0), Vec3::ZERO, true);
        let pending = scene
            .world()
            .unwrap()
            .renderables()
            .iter()
            .filter(|(_, r)| r.needs_update())
            .count();
        // The origin is a corner shared by four tiles
        assert_eq!(pending, 4);
    }

    #[test]
    fn test_unknown_option_key() {
        let mut scene = flat_scene(10.0);
        assert_eq!(scene.get_option("Bogus"), None);
        assert!(!scene.set_option("Bogus", OptionValue::Real(1.0)));
        assert!(!scene.has_option("Bogus"));
    }

    #[test]
    fn test_option_surface_pass_through() {
        let mut scene = flat_scene(10.0);
        assert!(scene.has_option("DistanceLOD"));
        assert!(scene.has_option("PagePreloadQueue"));
        assert!(scene.set_option("DistanceLOD", OptionValue::Real(2.0)));
        let visible = scene.get_option("VisibleLOD").unwrap().as_real().unwrap();
        assert!((visible - 2.0).abs() < 1e-4);

        assert!(!scene.set_option("NumTiles", OptionValue::Integer(5)));
        assert!(!scene.set_option("Scale", OptionValue::Vector(Vec3::splat(2.0))));
        assert_eq!(scene.options().scale, Vec3::ONE);
        assert!(scene.option_keys().contains(&"ImpactTileZ"));
    }

    #[test]
    fn test_diagnostics() {
        let mut scene = flat_scene(10.0);
        assert_eq!(scene.get_option("CurrentCameraPageX"), None);
        settle(&mut scene, Vec3::new(10.0, 50.0, -70.0));

        let int = |key: &str| scene.get_option(key).and_then(|v| v.as_integer());
        assert_eq!(int("CurrentCameraPageX"), Some(1));
        assert_eq!(int("CurrentCameraPageZ"), Some(0));
        assert_eq!(int("CurrentCameraTileX"), Some(0));
        assert_eq!(int("CurrentCameraTileZ"), Some(2));
        assert_eq!(int("PagePreloadQueue"), Some(0));
        assert_eq!(int("NumTiles"), Some(64));
        assert_eq!(int("NumFreeTiles"), Some(0));

        let free = int("FreeRenderables").unwrap();
        let loading = int("LoadingRenderables").unwrap();
        let visible = int("NumVisibleRenderables").unwrap();
        let capacity = int("RenderablesCount").unwrap();
        let invisible = scene.world().unwrap().renderables().invisible_count() as i64;
        assert_eq!(free + loading + visible + invisible, capacity);
    }

    #[test]
    fn test_sphere_options() {
        let mut scene = flat_scene(10.0);
        settle(&mut scene, Vec3::ZERO);

        let sphere = HeightSphere::new(Vec3::new(50.0, 10.0, 50.0), 5.0);
        assert!(scene.set_option("AddNewHeight", OptionValue::Sphere(sphere)));
        assert_eq!(scene.height_at(50.0, 50.0), Some(15.0));
        assert!(!scene.set_option("AddNewHeight", OptionValue::Real(3.0)));
        assert_eq!(scene.get_option("AddNewHeight"), None);

        let sphere = HeightSphere::new(Vec3::new(-50.0, 15.0, -50.0), 8.0);
        assert!(scene.remove_new_height(sphere));
        assert_eq!(scene.height_at(-50.0, -50.0), Some(7.0));
    }

    #[test]
    fn test_load_twice_is_idempotent() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "World_Width = 2\nWorld_Height = 2\nVisibleRenderables = 3").unwrap();

        let mut scene = LandscapeSceneManager::new(Arc::new(ProceduralHeightmap::new(|_, _| 0.0)));
        scene.load_world_geometry(file.path()).unwrap();
        let first = scene.options().clone();
        settle(&mut scene, Vec3::ZERO);

        scene.load_world_geometry(file.path()).unwrap();
        assert_eq!(scene.options(), &first);
        assert_eq!(scene.options().renderable_factor(), first.renderable_factor());
        // Fresh world: nothing streamed yet
        assert_eq!(scene.get_option("PagePreloadQueue"), Some(OptionValue::Integer(0)));
        assert_eq!(scene.world().unwrap().pages().page_count(), 0);
    }

    #[test]
    fn test_failed_load_leaves_scene_unset() {
        let mut scene = flat_scene(10.0);
        assert!(scene.load_world_geometry("/nonexistent/landscape.toml").is_err());
        assert!(!scene.is_world_loaded());

        // Every entry point is a safe no-op without geometry
        scene.update_scene_graph(Vec3::ZERO);
        scene.clear_scene();
        assert_eq!(scene.intersect_segment(Vec3::Y, Vec3::ZERO, true), None);
        assert_eq!(scene.height_at(0.0, 0.0), None);
    }

    #[test]
    fn test_clear_scene() {
        let mut scene = flat_scene(10.0);
        settle(&mut scene, Vec3::ZERO);
        scene.intersect_segment(Vec3::new(0.0, 50.0, 0.0), Vec3::ZERO, false);
        assert_ne!(scene.last_impact(), NO_IMPACT);

        scene.clear_scene();
        assert!(!scene.is_world_loaded());
        assert_eq!(scene.last_impact(), NO_IMPACT);
    }

    #[test]
    fn test_pool_capacity_never_shrinks() {
        let mut scene = flat_scene(10.0);
        let mut capacity = 0;
        for step in 0..60 {
            let x = -250.0 + step as f32 * 8.0;
            scene.update_scene_graph(Vec3::new(x, 40.0, x * 0.5));
            let renderables = scene.world().unwrap().renderables();
            assert!(renderables.capacity() >= capacity);
            capacity = renderables.capacity();
        }
    }
}
