//! Pooled renderables and squared-distance LOD selection
//!
//! The pool keeps one counter per renderable state so diagnostics never have
//! to walk the slabs. Every state change goes through the pool for that reason.

use crate::config::Options;
use crate::pool::{PoolSlot, SlabPool};
use crate::tile::TileInfo;
use bevy::log::warn;

/// Lifecycle of a pooled renderable
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RenderableState {
    #[default]
    Free,
    /// Bound to a tile, mesh data still being produced
    Loading,
    /// Drawn in the current frame
    Visible,
    /// Ready but culled (or not yet re-marked) this frame
    Invisible,
}

/// Handle to a renderable in the `RenderablePool`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderableId(PoolSlot);

/// Drawable bound 1:1 to a loaded tile
#[derive(Debug, Default)]
pub struct Renderable {
    state: RenderableState,
    tile: Option<TileInfo>,
    render_level: u32,
    need_update: bool,
    generation: u64,
}

impl Renderable {
    pub fn state(&self) -> RenderableState {
        self.state
    }

    /// Tile this renderable draws; `None` once it has been retired
    pub fn tile(&self) -> Option<TileInfo> {
        self.tile
    }

    pub fn render_level(&self) -> u32 {
        self.render_level
    }

    pub fn needs_update(&self) -> bool {
        self.need_update
    }

    /// Changes every time the slot is handed out again
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Pool of renderables with O(1) state counters
pub struct RenderablePool {
    pool: SlabPool<Renderable>,
    loading: usize,
    visible: usize,
    invisible: usize,
    next_generation: u64,
}

impl RenderablePool {
    pub fn new(options: &Options) -> Self {
        Self {
            pool: SlabPool::new(
                "renderable",
                options.num_renderables as usize,
                options.num_renderables_increment as usize,
            ),
            loading: 0,
            visible: 0,
            invisible: 0,
            next_generation: 0,
        }
    }

    /// Take a renderable for `tile`; it starts in the `Loading` state
    pub fn acquire(&mut self, tile: TileInfo, render_level: u32) -> RenderableId {
        let slot = self.pool.acquire();
        self.next_generation += 1;
        if let Some(renderable) = self.pool.get_mut(slot) {
            renderable.state = RenderableState::Loading;
            renderable.tile = Some(tile);
            renderable.render_level = render_level;
            renderable.need_update = false;
            renderable.generation = self.next_generation;
        }
        self.loading += 1;
        RenderableId(slot)
    }

    /// Return a renderable to the free set
    pub fn release(&mut self, id: RenderableId) -> bool {
        let Some(state) = self.pool.get(id.0).map(Renderable::state) else {
            warn!("renderable {:?} released twice", id);
            return false;
        };
        self.uncount(state);
        self.pool.release(id.0)
    }

    /// Finish loading: `Loading -> Invisible`, with a mesh build requested
    pub fn finish_loading(&mut self, id: RenderableId) -> bool {
        let Some(renderable) = self.pool.get_mut(id.0) else {
            return false;
        };
        if renderable.state != RenderableState::Loading {
            return false;
        }
        renderable.state = RenderableState::Invisible;
        renderable.need_update = true;
        self.loading -= 1;
        self.invisible += 1;
        true
    }

    /// Mark a ready renderable as drawn this frame
    pub fn mark_visible(&mut self, id: RenderableId) -> bool {
        let Some(renderable) = self.pool.get_mut(id.0) else {
            return false;
        };
        if renderable.state != RenderableState::Invisible {
            return false;
        }
        renderable.state = RenderableState::Visible;
        self.invisible -= 1;
        self.visible += 1;
        true
    }

    /// Clear the visible flag on every live renderable.
    ///
    /// Must run once per frame, before the renderer's visibility pass.
    pub fn reset_visibles(&mut self) {
        if self.visible == 0 {
            return;
        }
        for (_, renderable) in self.pool.iter_mut() {
            if renderable.state == RenderableState::Visible {
                renderable.state = RenderableState::Invisible;
            }
        }
        self.invisible += self.visible;
        self.visible = 0;
    }

    /// Request a mesh rebuild
    pub fn request_update(&mut self, id: RenderableId) -> bool {
        match self.pool.get_mut(id.0) {
            Some(renderable) => {
                renderable.need_update = true;
                true
            }
            None => false,
        }
    }

    /// Consume a pending mesh rebuild request
    pub fn take_update(&mut self, id: RenderableId) -> bool {
        self.pool
            .get_mut(id.0)
            .is_some_and(|renderable| std::mem::take(&mut renderable.need_update))
    }

    /// Change the LOD level; a change requests a mesh rebuild
    pub fn set_render_level(&mut self, id: RenderableId, level: u32) -> bool {
        let Some(renderable) = self.pool.get_mut(id.0) else {
            return false;
        };
        if renderable.render_level == level {
            return false;
        }
        renderable.render_level = level;
        renderable.need_update = true;
        true
    }

    /// Unbind from its tile ahead of the deferred release
    pub(crate) fn retire(&mut self, id: RenderableId) {
        if let Some(renderable) = self.pool.get_mut(id.0) {
            renderable.tile = None;
        }
    }

    fn uncount(&mut self, state: RenderableState) {
        match state {
            RenderableState::Loading => self.loading -= 1,
            RenderableState::Visible => self.visible -= 1,
            RenderableState::Invisible => self.invisible -= 1,
            RenderableState::Free => {}
        }
    }

    pub fn get(&self, id: RenderableId) -> Option<&Renderable> {
        self.pool.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RenderableId, &Renderable)> {
        self.pool.iter().map(|(slot, renderable)| (RenderableId(slot), renderable))
    }

    /// Total renderables ever allocated
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    pub fn free_count(&self) -> usize {
        self.pool.free_count()
    }

    pub fn loading_count(&self) -> usize {
        self.loading
    }

    pub fn visible_count(&self) -> usize {
        self.visible
    }

    pub fn invisible_count(&self) -> usize {
        self.invisible
    }
}

/// LOD level for a squared camera distance: the smallest level `L` with
/// `dist_sq <= lod_factor * (L + 1)^2`, capped at the max render level.
pub fn select_render_level(dist_sq: f32, options: &Options) -> u32 {
    let max_level = options.max_render_level();
    let lod_factor = options.lod_factor();
    let mut level = 0;
    while level < max_level && dist_sq > lod_factor * ((level + 1) as f32).powi(2) {
        level += 1;
    }
    level
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_counts(pool: &RenderablePool) {
        assert_eq!(
            pool.free_count() + pool.loading_count() + pool.visible_count() + pool.invisible_count(),
            pool.capacity()
        );
    }

    #[test]
    fn test_lifecycle_counters() {
        let options = Options::builder().renderable_pool(2, 2).build().unwrap();
        let mut pool = RenderablePool::new(&options);
        let tile = TileInfo::new(0, 0, 0, 0);

        let a = pool.acquire(tile, 0);
        assert_eq!(pool.get(a).unwrap().state(), RenderableState::Loading);
        assert_eq!(pool.loading_count(), 1);
        assert_counts(&pool);

        // Loading renderables cannot be drawn
        assert!(!pool.mark_visible(a));
        assert!(pool.finish_loading(a));
        assert!(pool.get(a).unwrap().needs_update());
        assert!(pool.mark_visible(a));
        assert_eq!(pool.visible_count(), 1);
        assert_counts(&pool);

        pool.reset_visibles();
        assert_eq!(pool.visible_count(), 0);
        assert_eq!(pool.invisible_count(), 1);
        assert_eq!(pool.get(a).unwrap().state(), RenderableState::Invisible);

        assert!(pool.release(a));
        assert!(!pool.release(a));
        assert_eq!(pool.free_count(), 2);
        assert_counts(&pool);
    }

    #[test]
    fn test_growth_and_generations() {
        let options = Options::builder().renderable_pool(1, 4).build().unwrap();
        let mut pool = RenderablePool::new(&options);
        let tile = TileInfo::new(0, 0, 0, 0);

        let a = pool.acquire(tile, 0);
        let first_generation = pool.get(a).unwrap().generation();
        pool.release(a);
        let again = pool.acquire(tile, 0);
        assert_eq!(again, a);
        assert_ne!(pool.get(again).unwrap().generation(), first_generation);

        pool.acquire(tile, 0);
        assert_eq!(pool.capacity(), 5);
        assert_counts(&pool);
    }

    #[test]
    fn test_update_requests() {
        let options = Options::default();
        let mut pool = RenderablePool::new(&options);
        let id = pool.acquire(TileInfo::new(0, 0, 0, 0), 0);

        assert!(!pool.take_update(id));
        assert!(pool.set_render_level(id, 2));
        assert!(!pool.set_render_level(id, 2));
        assert!(pool.take_update(id));
        assert!(!pool.take_update(id));
        assert!(pool.request_update(id));
        assert!(pool.get(id).unwrap().needs_update());
    }

    #[test]
    fn test_select_render_level() {
        let options = Options::default();
        let step = options.lod_factor();
        assert_eq!(select_render_level(0.0, &options), 0);
        assert_eq!(select_render_level(step, &options), 0);
        assert_eq!(select_render_level(step * 1.01, &options), 1);
        assert_eq!(select_render_level(step * 4.5, &options), 2);
        assert_eq!(
            select_render_level(f32::MAX, &options),
            options.max_render_level()
        );
    }
}
