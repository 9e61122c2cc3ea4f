//! Page manager: camera-relative paging and the four-stage streaming queues
//!
//! Pages move through `Preloading -> Preloaded -> Loading -> Loaded ->
//! Unloading -> PostUnload` and back to unloaded. Each page carries exactly
//! one state, and the preload, load and unload queues only ever hold pages in
//! the matching state, so a page can never sit in two queues at once.
//!
//! Work is capped per frame by `Num_Renderables_Loading`. Resources released
//! while unloading are parked on a retire list and only returned to their
//! pools at the start of the next frame, after the renderer has finished
//! with the previous frame's draw list.

use crate::config::Options;
use crate::heightmap::HeightDataProvider;
use crate::renderable::{RenderableId, RenderablePool, select_render_level};
use crate::texture::TextureManager;
use crate::tile::{TileId, TileInfo, TilePool};
use bevy::log::debug;
use bevy::prelude::*;
use std::collections::{HashMap, VecDeque};

/// Streaming state of a page
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageState {
    /// Waiting in the preload queue for its height data
    Preloading,
    /// Height data resident, no tiles
    Preloaded,
    /// Waiting in the load queue for its texture and tiles
    Loading,
    /// Resident: texture loaded and tiles attached
    Loaded,
    /// Waiting in the unload queue
    Unloading,
    /// Render resources released; tiles return to the pool next frame
    PostUnload,
}

/// A coarse grid cell of the world
#[derive(Debug)]
pub struct Page {
    state: PageState,
    tiles: Vec<TileId>,
}

impl Page {
    fn new(state: PageState) -> Self {
        Self {
            state,
            tiles: Vec::new(),
        }
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn tiles(&self) -> &[TileId] {
        &self.tiles
    }
}

/// Services the page manager drives during an update
pub struct PagingContext<'a> {
    pub options: &'a Options,
    pub tiles: &'a mut TilePool,
    pub renderables: &'a mut RenderablePool,
    pub textures: &'a mut TextureManager,
    pub data: &'a mut dyn HeightDataProvider,
}

/// Chebyshev distance between two page coordinates
pub fn ring_distance(a: IVec2, b: IVec2) -> i32 {
    let delta = (a - b).abs();
    delta.x.max(delta.y)
}

/// Page coordinates exactly `ring` pages away from `center`, row by row
fn ring_pages(center: IVec2, ring: i32) -> impl Iterator<Item = IVec2> {
    (-ring..=ring).flat_map(move |dz| {
        (-ring..=ring)
            .filter(move |dx| dx.abs().max(dz.abs()) == ring)
            .map(move |dx| center + IVec2::new(dx, dz))
    })
}

/// Owns the pages, the streaming queues and the camera's paging position
#[derive(Default)]
pub struct PageManager {
    pages: HashMap<IVec2, Page>,
    preload_queue: VecDeque<IVec2>,
    load_queue: VecDeque<IVec2>,
    unload_queue: VecDeque<IVec2>,
    post_unload: Vec<IVec2>,
    retired: Vec<RenderableId>,
    loading: Vec<RenderableId>,
    camera_page: Option<IVec2>,
    camera_tile: Option<IVec2>,
    last_evaluation: Option<Vec3>,
}

impl PageManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance streaming by one frame for a camera at `camera_pos`
    pub fn update(&mut self, camera_pos: Vec3, ctx: &mut PagingContext) {
        let options = ctx.options;
        let camera_page = options.page_at(camera_pos.x, camera_pos.z);
        self.camera_page = Some(camera_page);
        self.camera_tile = Some(options.tile_in_page_at(camera_pos.x, camera_pos.z));

        self.drain_retired(camera_page, ctx);
        for id in self.loading.drain(..) {
            ctx.renderables.finish_loading(id);
        }

        let moved = self.last_evaluation.is_none_or(|last| {
            last.distance_squared(camera_pos) >= options.camera_threshold_sq()
        });
        if moved {
            self.last_evaluation = Some(camera_pos);
            self.evaluate(camera_page, ctx);
        }

        let budget = options.num_renderables_loading as usize;
        self.process_load_queue(budget, ctx);
        self.process_preload_queue(budget, camera_page, ctx);
        self.process_unload_queue(budget, ctx);
        self.update_tiles(camera_pos, camera_page, ctx);
    }

    /// Force a full re-evaluation on the next update
    pub fn invalidate(&mut self) {
        self.last_evaluation = None;
    }

    /// Return last frame's retired resources to their pools
    fn drain_retired(&mut self, camera_page: IVec2, ctx: &mut PagingContext) {
        for id in self.retired.drain(..) {
            ctx.renderables.release(id);
        }

        let adjacent = ctx.options.max_adjacent_pages as i32;
        let preload = ctx.options.preload_radius() as i32;
        for coord in std::mem::take(&mut self.post_unload) {
            let Some(page) = self.pages.get_mut(&coord) else {
                continue;
            };
            for tile in page.tiles.drain(..) {
                ctx.tiles.release(tile);
            }

            let distance = ring_distance(coord, camera_page);
            if distance <= adjacent {
                page.state = PageState::Loading;
                self.load_queue.push_back(coord);
            } else if distance <= preload {
                page.state = PageState::Preloaded;
            } else {
                self.pages.remove(&coord);
                ctx.data.unload_page(coord);
                debug!("page {} unloaded", coord);
            }
        }
    }

    /// Recompute which pages should be resident around the camera page
    fn evaluate(&mut self, camera_page: IVec2, ctx: &mut PagingContext) {
        let options = ctx.options;
        let adjacent = options.max_adjacent_pages as i32;
        let preload = options.preload_radius() as i32;

        let mut known: Vec<IVec2> = self.pages.keys().copied().collect();
        known.sort_by_key(|coord| (ring_distance(*coord, camera_page), coord.y, coord.x));
        for coord in known {
            let distance = ring_distance(coord, camera_page);
            let Some(page) = self.pages.get_mut(&coord) else {
                continue;
            };
            let state = page.state;
            match state {
                PageState::Loaded if distance > adjacent => {
                    page.state = PageState::Unloading;
                    self.unload_queue.push_back(coord);
                }
                PageState::Loading if distance > adjacent => {
                    self.load_queue.retain(|queued| *queued != coord);
                    if distance <= preload {
                        page.state = PageState::Preloaded;
                    } else {
                        self.pages.remove(&coord);
                        ctx.data.unload_page(coord);
                    }
                }
                PageState::Preloading if distance > preload => {
                    self.preload_queue.retain(|queued| *queued != coord);
                    self.pages.remove(&coord);
                }
                PageState::Preloaded if distance > preload => {
                    self.pages.remove(&coord);
                    ctx.data.unload_page(coord);
                }
                _ => {}
            }
        }

        for ring in 0..=preload {
            for coord in ring_pages(camera_page, ring) {
                if !options.page_in_world(coord) {
                    continue;
                }
                match self.pages.get_mut(&coord) {
                    None => {
                        self.pages.insert(coord, Page::new(PageState::Preloading));
                        self.preload_queue.push_back(coord);
                    }
                    Some(page) if ring <= adjacent => match page.state {
                        PageState::Preloaded => {
                            page.state = PageState::Loading;
                            self.load_queue.push_back(coord);
                        }
                        PageState::Unloading => {
                            // Camera came back before the unload ran
                            self.unload_queue.retain(|queued| *queued != coord);
                            page.state = PageState::Loaded;
                        }
                        _ => {}
                    },
                    Some(_) => {}
                }
            }
        }
    }

    /// Load -> Loaded: texture and tiles
    fn process_load_queue(&mut self, budget: usize, ctx: &mut PagingContext) {
        let per_page = ctx.options.tiles_per_page() as i32;
        for _ in 0..budget {
            let Some(coord) = self.load_queue.pop_front() else {
                break;
            };
            let Some(page) = self.pages.get_mut(&coord) else {
                continue;
            };
            ctx.textures.load(coord);
            for tile_z in 0..per_page {
                for tile_x in 0..per_page {
                    let info = TileInfo::new(coord.x, coord.y, tile_x, tile_z);
                    page.tiles.push(ctx.tiles.acquire(info));
                }
            }
            page.state = PageState::Loaded;
            debug!("page {} loaded with {} tiles", coord, page.tiles.len());
        }
    }

    /// Preload -> Preloaded or Loading: height data
    fn process_preload_queue(
        &mut self,
        budget: usize,
        camera_page: IVec2,
        ctx: &mut PagingContext,
    ) {
        let adjacent = ctx.options.max_adjacent_pages as i32;
        for _ in 0..budget {
            let Some(coord) = self.preload_queue.pop_front() else {
                break;
            };
            let Some(page) = self.pages.get_mut(&coord) else {
                continue;
            };
            ctx.data.load_page(coord);
            if ring_distance(coord, camera_page) <= adjacent {
                page.state = PageState::Loading;
                self.load_queue.push_back(coord);
            } else {
                page.state = PageState::Preloaded;
            }
            debug!("page {} preloaded", coord);
        }
    }

    /// Unload -> PostUnload: detach renderables and release the texture
    fn process_unload_queue(&mut self, budget: usize, ctx: &mut PagingContext) {
        for _ in 0..budget {
            let Some(coord) = self.unload_queue.pop_front() else {
                break;
            };
            let Some(page) = self.pages.get_mut(&coord) else {
                continue;
            };
            for &tile_id in &page.tiles {
                let Some(tile) = ctx.tiles.get_mut(tile_id) else {
                    continue;
                };
                if let Some(renderable) = tile.detach_renderable() {
                    ctx.renderables.retire(renderable);
                    self.retired.push(renderable);
                }
                tile.unload();
            }
            ctx.textures.unload(coord);
            page.state = PageState::PostUnload;
            self.post_unload.push(coord);
            debug!("page {} moved to post-unload", coord);
        }
    }

    /// Bind renderables to tiles in range, pick their LOD and retire the rest
    fn update_tiles(&mut self, camera_pos: Vec3, camera_page: IVec2, ctx: &mut PagingContext) {
        let options = ctx.options;
        let budget = options.num_renderables_loading as usize;
        let camera = camera_pos.xz();

        let mut resident: Vec<IVec2> = self
            .pages
            .iter()
            .filter(|(_, page)| page.state == PageState::Loaded)
            .map(|(coord, _)| *coord)
            .collect();
        resident.sort_by_key(|coord| (ring_distance(*coord, camera_page), coord.y, coord.x));

        for coord in resident {
            let Some(page) = self.pages.get(&coord) else {
                continue;
            };
            for &tile_id in &page.tiles {
                let Some(tile) = ctx.tiles.get_mut(tile_id) else {
                    continue;
                };
                let Some(info) = tile.info() else {
                    continue;
                };
                let dist_sq = options.tile_center(&info).distance_squared(camera);

                if dist_sq <= options.renderable_factor() {
                    let level = select_render_level(dist_sq, options);
                    match tile.renderable() {
                        Some(renderable) => {
                            ctx.renderables.set_render_level(renderable, level);
                        }
                        None if self.loading.len() < budget => {
                            let renderable = ctx.renderables.acquire(info, level);
                            tile.attach_renderable(renderable);
                            self.loading.push(renderable);
                        }
                        None => {}
                    }
                } else if let Some(renderable) = tile.detach_renderable() {
                    ctx.renderables.retire(renderable);
                    self.loading.retain(|id| *id != renderable);
                    self.retired.push(renderable);
                }
            }
        }
    }

    /// Tile under a world position, if its page is resident
    pub fn tile_at(&self, options: &Options, x: f32, z: f32) -> Option<TileId> {
        self.tile_for(options, &options.tile_info_at(x, z)?)
    }

    /// Pooled tile bound to `info`, if its page is resident
    pub fn tile_for(&self, options: &Options, info: &TileInfo) -> Option<TileId> {
        let page = self.pages.get(&info.page())?;
        if page.state != PageState::Loaded {
            return None;
        }
        let per_page = options.tiles_per_page() as i32;
        page.tiles
            .get((info.tile_z * per_page + info.tile_x) as usize)
            .copied()
    }

    pub fn page(&self, coord: IVec2) -> Option<&Page> {
        self.pages.get(&coord)
    }

    pub fn page_state(&self, coord: IVec2) -> Option<PageState> {
        self.pages.get(&coord).map(Page::state)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Resident pages, sorted by coordinate
    pub fn loaded_pages(&self) -> Vec<IVec2> {
        let mut loaded: Vec<IVec2> = self
            .pages
            .iter()
            .filter(|(_, page)| page.state == PageState::Loaded)
            .map(|(coord, _)| *coord)
            .collect();
        loaded.sort_by_key(|coord| (coord.y, coord.x));
        loaded
    }

    /// Every page currently waiting in any queue
    pub fn queued_pages(&self) -> impl Iterator<Item = IVec2> + '_ {
        self.preload_queue
            .iter()
            .chain(&self.load_queue)
            .chain(&self.unload_queue)
            .chain(&self.post_unload)
            .copied()
    }

    pub fn preload_queue_size(&self) -> usize {
        self.preload_queue.len()
    }

    pub fn load_queue_size(&self) -> usize {
        self.load_queue.len()
    }

    pub fn unload_queue_size(&self) -> usize {
        self.unload_queue.len()
    }

    pub fn post_unload_queue_size(&self) -> usize {
        self.post_unload.len()
    }

    /// Camera page as of the last update
    pub fn camera_page(&self) -> Option<IVec2> {
        self.camera_page
    }

    /// Camera tile within its page as of the last update
    pub fn camera_tile(&self) -> Option<IVec2> {
        self.camera_tile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heightmap::{HeightData2D, ProceduralHeightmap};
    use std::collections::HashSet;
    use std::sync::Arc;

    struct Fixture {
        options: Options,
        tiles: TilePool,
        renderables: RenderablePool,
        textures: TextureManager,
        data: HeightData2D,
        pages: PageManager,
    }

    impl Fixture {
        fn new(options: Options) -> Self {
            Self {
                tiles: TilePool::new(&options),
                renderables: RenderablePool::new(&options),
                textures: TextureManager::new(&options),
                data: HeightData2D::new(
                    &options,
                    Arc::new(ProceduralHeightmap::new(|_, _| 10.0)),
                ),
                pages: PageManager::new(),
                options,
            }
        }

        fn frame(&mut self, camera: Vec3) {
            let mut ctx = PagingContext {
                options: &self.options,
                tiles: &mut self.tiles,
                renderables: &mut self.renderables,
                textures: &mut self.textures,
                data: &mut self.data,
            };
            self.pages.update(camera, &mut ctx);
            self.renderables.reset_visibles();
        }

        fn settle(&mut self, camera: Vec3, frames: usize) {
            for _ in 0..frames {
                self.frame(camera);
                self.check_invariants();
            }
        }

        fn check_invariants(&self) {
            let queued: Vec<IVec2> = self.pages.queued_pages().collect();
            let unique: HashSet<IVec2> = queued.iter().copied().collect();
            assert_eq!(queued.len(), unique.len(), "page queued twice");

            let r = &self.renderables;
            assert_eq!(
                r.free_count() + r.loading_count() + r.visible_count() + r.invisible_count(),
                r.capacity()
            );
        }

        fn expected_ring(&self, center: IVec2, radius: i32) -> Vec<IVec2> {
            let mut pages = Vec::new();
            for z in 0..self.options.world_height as i32 {
                for x in 0..self.options.world_width as i32 {
                    let coord = IVec2::new(x, z);
                    if ring_distance(coord, center) <= radius {
                        pages.push(coord);
                    }
                }
            }
            pages
        }
    }

    fn options(world: u32, adjacent: u32, preload: u32) -> Options {
        Options::builder()
            .world_size(world, world)
            .page_radii(adjacent, preload)
            .build()
            .unwrap()
    }

    #[test]
    fn test_ring_pages() {
        assert_eq!(ring_pages(IVec2::ZERO, 0).count(), 1);
        assert_eq!(ring_pages(IVec2::ZERO, 1).count(), 8);
        assert_eq!(ring_pages(IVec2::ZERO, 2).count(), 16);
        assert!(ring_pages(IVec2::ONE, 2).all(|c| ring_distance(c, IVec2::ONE) == 2));
    }

    #[test]
    fn test_resident_pages_follow_camera() {
        let mut fixture = Fixture::new(options(4, 1, 2));

        let camera = Vec3::new(-128.0, 50.0, -128.0);
        fixture.settle(camera, 30);
        assert_eq!(fixture.pages.camera_page(), Some(IVec2::new(1, 1)));
        assert_eq!(
            fixture.pages.loaded_pages(),
            fixture.expected_ring(IVec2::new(1, 1), 1)
        );
        assert_eq!(fixture.data.loaded_page_count(), 16);

        let camera = Vec3::new(384.0, 50.0, 384.0);
        fixture.settle(camera, 30);
        assert_eq!(
            fixture.pages.loaded_pages(),
            fixture.expected_ring(IVec2::new(3, 3), 1)
        );
        assert_eq!(fixture.data.loaded_page_count(), 9);
        assert_eq!(fixture.textures.loaded_count(), 4);
        assert_eq!(fixture.tiles.num_tiles() - fixture.tiles.num_free(), 4 * 16);
        assert_eq!(fixture.pages.queued_pages().count(), 0);
    }

    #[test]
    fn test_queue_work_is_budgeted() {
        let options = Options::builder()
            .world_size(4, 4)
            .page_radii(1, 2)
            .loading_budget(2)
            .build()
            .unwrap();
        let mut fixture = Fixture::new(options);

        fixture.frame(Vec3::new(-128.0, 50.0, -128.0));
        // 16 candidates, two preloaded, both adjacent and now waiting to load
        assert_eq!(fixture.pages.preload_queue_size(), 14);
        assert_eq!(fixture.pages.load_queue_size(), 2);
        assert_eq!(fixture.data.loaded_page_count(), 2);

        fixture.frame(Vec3::new(-128.0, 50.0, -128.0));
        assert_eq!(fixture.pages.loaded_pages().len(), 2);
        assert!(fixture.renderables.loading_count() <= 2);
    }

    #[test]
    fn test_post_unload_returns_tiles_one_frame_later() {
        let mut fixture = Fixture::new(options(2, 0, 0));
        fixture.settle(Vec3::new(-128.0, 50.0, -128.0), 10);
        assert_eq!(fixture.pages.loaded_pages(), vec![IVec2::new(0, 0)]);
        let in_use = fixture.tiles.num_tiles() - fixture.tiles.num_free();
        assert_eq!(in_use, 16);

        fixture.frame(Vec3::new(128.0, 50.0, 128.0));
        assert_eq!(
            fixture.pages.page_state(IVec2::ZERO),
            Some(PageState::PostUnload)
        );
        assert_eq!(fixture.pages.post_unload_queue_size(), 1);
        // Old tiles and their retired renderables are still held
        assert_eq!(fixture.tiles.num_tiles() - fixture.tiles.num_free(), 16);
        let held = fixture.renderables.capacity() - fixture.renderables.free_count();
        assert_eq!(held, 16);
        assert!(fixture.renderables.iter().all(|(_, r)| r.tile().is_none()));

        fixture.frame(Vec3::new(128.0, 50.0, 128.0));
        assert_eq!(fixture.pages.page_state(IVec2::ZERO), None);
        assert!(!fixture.data.is_page_loaded(IVec2::ZERO));
        assert_eq!(fixture.pages.loaded_pages(), vec![IVec2::new(1, 1)]);
        // Only the new page's tiles are in use
        assert_eq!(fixture.tiles.num_tiles() - fixture.tiles.num_free(), 16);
    }

    #[test]
    fn test_camera_threshold_skips_evaluation() {
        let options = Options::builder()
            .world_size(2, 2)
            .page_radii(0, 0)
            .camera_threshold(5.0)
            .build()
            .unwrap();
        let mut fixture = Fixture::new(options);
        fixture.settle(Vec3::new(-1.0, 10.0, -100.0), 5);
        assert_eq!(fixture.pages.loaded_pages(), vec![IVec2::new(0, 0)]);

        fixture.frame(Vec3::new(1.0, 10.0, -100.0));
        assert_eq!(fixture.pages.camera_page(), Some(IVec2::new(1, 0)));
        assert_eq!(fixture.pages.page_state(IVec2::new(1, 0)), None);

        fixture.frame(Vec3::new(6.0, 10.0, -100.0));
        assert!(fixture.pages.page_state(IVec2::new(1, 0)).is_some());
    }

    #[test]
    fn test_queues_stay_exclusive_while_moving() {
        let options = Options::builder()
            .world_size(6, 6)
            .page_radii(1, 2)
            .loading_budget(3)
            .build()
            .unwrap();
        let mut fixture = Fixture::new(options);
        let mut capacity = 0;

        for step in 0..120 {
            let t = step as f32 * 0.1;
            let camera = Vec3::new(t.cos() * 600.0, 80.0, (t * 0.7).sin() * 600.0);
            fixture.frame(camera);
            fixture.check_invariants();

            for coord in fixture.pages.queued_pages() {
                assert!(fixture.pages.page_state(coord).is_some());
            }
            assert!(fixture.renderables.capacity() >= capacity);
            capacity = fixture.renderables.capacity();
        }
    }

    #[test]
    fn test_renderables_only_within_distance() {
        let options = Options::builder()
            .world_size(2, 2)
            .page_radii(1, 1)
            .visible_renderables(1.0)
            .build()
            .unwrap();
        let mut fixture = Fixture::new(options);
        let camera = Vec3::new(-224.0, 50.0, -224.0);
        fixture.settle(camera, 40);

        let limit = fixture.options.renderable_factor();
        let mut bound = 0;
        for (_, tile) in fixture.tiles.iter() {
            let info = tile.info().unwrap();
            let center = fixture.options.tile_center(&info);
            let in_range = center.distance_squared(camera.xz()) <= limit;
            assert_eq!(tile.renderable().is_some(), in_range);
            bound += usize::from(in_range);
        }
        assert!(bound > 0);
        assert_eq!(fixture.renderables.loading_count(), 0);
    }

    #[test]
    fn test_tile_at_resident_page() {
        let mut fixture = Fixture::new(options(2, 1, 1));
        fixture.settle(Vec3::new(0.0, 50.0, 0.0), 10);

        let id = fixture.pages.tile_at(&fixture.options, 10.0, 70.0).unwrap();
        let tile = fixture.tiles.get(id).unwrap();
        assert_eq!(tile.info(), Some(TileInfo::new(1, 1, 0, 1)));
        assert!(fixture.pages.tile_at(&fixture.options, 900.0, 0.0).is_none());
    }
}
