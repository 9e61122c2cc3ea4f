//! Tiles, the tile pool and per-tile segment intersection

use crate::config::Options;
use crate::heightmap::HeightDataProvider;
use crate::pool::{PoolSlot, SlabPool};
use crate::renderable::{RenderableId, RenderablePool};
use bevy::log::warn;
use bevy::prelude::*;

/// Number of bisection steps used to refine a surface crossing
const REFINE_STEPS: u32 = 8;

/// Address of a tile: its page and its cell within the page
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileInfo {
    pub page_x: i32,
    pub page_z: i32,
    pub tile_x: i32,
    pub tile_z: i32,
}

impl TileInfo {
    pub fn new(page_x: i32, page_z: i32, tile_x: i32, tile_z: i32) -> Self {
        Self {
            page_x,
            page_z,
            tile_x,
            tile_z,
        }
    }

    pub fn page(&self) -> IVec2 {
        IVec2::new(self.page_x, self.page_z)
    }

    pub fn tile(&self) -> IVec2 {
        IVec2::new(self.tile_x, self.tile_z)
    }
}

/// Handle to a tile in the `TilePool`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileId(PoolSlot);

/// A grid cell of a page, bound to at most one renderable
#[derive(Debug, Default)]
pub struct Tile {
    info: Option<TileInfo>,
    renderable: Option<RenderableId>,
    loaded: bool,
}

/// Outcome of walking a segment through one tile
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SegmentWalk {
    /// The segment crossed the surface at this point
    Hit(Vec3),
    /// The segment left the tile; the walk continues from this point
    Exit(Vec3),
    /// The segment can no longer reach the surface
    Miss,
}

impl Tile {
    pub fn info(&self) -> Option<TileInfo> {
        self.info
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn renderable(&self) -> Option<RenderableId> {
        self.renderable
    }

    pub(crate) fn attach_renderable(&mut self, renderable: RenderableId) {
        self.renderable = Some(renderable);
    }

    pub(crate) fn detach_renderable(&mut self) -> Option<RenderableId> {
        self.renderable.take()
    }

    pub(crate) fn unload(&mut self) {
        self.loaded = false;
    }

    /// Ask the bound renderable to rebuild its mesh
    pub fn need_update(&self, renderables: &mut RenderablePool) -> bool {
        match self.renderable {
            Some(id) => renderables.request_update(id),
            None => false,
        }
    }

    /// March from `start` along the normalized `dir` in sample-sized steps
    /// until the surface is crossed or the tile is left.
    pub fn intersect_segment(
        &self,
        start: Vec3,
        dir: Vec3,
        options: &Options,
        data: &dyn HeightDataProvider,
    ) -> SegmentWalk {
        let Some(info) = self.info else {
            return SegmentWalk::Miss;
        };
        let step = options.scale.x.min(options.scale.z);
        let (_, ceiling) = options.height_range();

        let mut previous: Option<Vec3> = None;
        let mut point = start;
        loop {
            if options.tile_info_at(point.x, point.z) != Some(info) {
                return SegmentWalk::Exit(point);
            }

            let height = data.real_world_height(point.x, point.z, Some(&info));
            if point.y <= height {
                let crossing = match previous {
                    Some(above) => refine_crossing(above, point, &info, data),
                    None => Vec3::new(point.x, height, point.z),
                };
                return SegmentWalk::Hit(crossing);
            }

            if dir.y >= 0.0 && point.y > ceiling {
                return SegmentWalk::Miss;
            }

            previous = Some(point);
            point += dir * step;
        }
    }
}

/// Bisect between a point above the surface and one below it
fn refine_crossing(
    mut above: Vec3,
    mut below: Vec3,
    info: &TileInfo,
    data: &dyn HeightDataProvider,
) -> Vec3 {
    for _ in 0..REFINE_STEPS {
        let middle = (above + below) * 0.5;
        if middle.y <= data.real_world_height(middle.x, middle.z, Some(info)) {
            below = middle;
        } else {
            above = middle;
        }
    }
    let height = data.real_world_height(below.x, below.z, Some(info));
    Vec3::new(below.x, height, below.z)
}

/// Fixed-capacity pool of tiles that grows by an increment when exhausted
pub struct TilePool {
    pool: SlabPool<Tile>,
}

impl TilePool {
    pub fn new(options: &Options) -> Self {
        Self {
            pool: SlabPool::new(
                "tile",
                options.num_tiles as usize,
                options.num_tiles_increment as usize,
            ),
        }
    }

    /// Take a tile and bind it to `info`
    pub fn acquire(&mut self, info: TileInfo) -> TileId {
        let slot = self.pool.acquire();
        if let Some(tile) = self.pool.get_mut(slot) {
            tile.info = Some(info);
            tile.loaded = true;
        }
        TileId(slot)
    }

    /// Return a tile to the pool; callers must drop the id afterwards
    pub fn release(&mut self, id: TileId) -> bool {
        let released = self.pool.release(id.0);
        if !released {
            warn!("tile {:?} released twice", id);
        }
        released
    }

    pub fn get(&self, id: TileId) -> Option<&Tile> {
        self.pool.get(id.0)
    }

    pub fn get_mut(&mut self, id: TileId) -> Option<&mut Tile> {
        self.pool.get_mut(id.0)
    }

    /// Total tiles ever allocated
    pub fn num_tiles(&self) -> usize {
        self.pool.capacity()
    }

    pub fn num_free(&self) -> usize {
        self.pool.free_count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TileId, &Tile)> {
        self.pool.iter().map(|(slot, tile)| (TileId(slot), tile))
    }
}
