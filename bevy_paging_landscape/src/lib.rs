//! # bevy_paging_landscape
//!
//! A paging terrain landscape for Bevy featuring:
//! - Camera-relative page streaming through preload, load, unload and post-unload stages
//! - Slab-backed tile and renderable pools that grow instead of failing
//! - Squared-distance LOD selection per tile
//! - HeightmapSource abstraction for procedural terrain
//! - Ray queries against the height field with crater deformation
//! - A generic key/value option surface for tooling

use bevy::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;

pub mod config;
pub mod error;
pub mod heightmap;
pub mod material;
pub mod mesh;
pub mod paging;
pub mod pool;
pub mod renderable;
pub mod scene;
pub mod systems;
pub mod texture;
pub mod tile;

pub mod prelude {
    pub use crate::config::{OptionKey, OptionValue, Options, OptionsBuilder};
    pub use crate::error::{LandscapeError, LandscapeResult};
    pub use crate::heightmap::{
        HeightDataProvider, HeightSphere, HeightmapSource, NoiseSettings, ProceduralHeightmap,
        TerrainNoise,
    };
    pub use crate::paging::PageState;
    pub use crate::scene::{LandscapeSceneManager, SceneKey};
    pub use crate::systems::LandscapeTile;
    pub use crate::{PagingLandscapePlugin, PagingLandscapePluginBuilder};
}

/// Plugin that owns a `LandscapeSceneManager` and drives it every frame
pub struct PagingLandscapePlugin {
    /// Settings file to load; `options` are used when absent
    pub config_path: Option<PathBuf>,
    /// Options used when no settings file is given
    pub options: config::Options,
    /// Terrain the pages are filled from
    pub source: Arc<dyn heightmap::HeightmapSource>,
}

impl Default for PagingLandscapePlugin {
    fn default() -> Self {
        Self {
            config_path: None,
            options: config::Options::default(),
            source: Arc::new(heightmap::TerrainNoise::default()),
        }
    }
}

impl PagingLandscapePlugin {
    /// Create a plugin that loads `options` and samples `source`
    pub fn new(options: config::Options, source: Arc<dyn heightmap::HeightmapSource>) -> Self {
        Self {
            config_path: None,
            options,
            source,
        }
    }

    /// Create a landscape plugin using a builder pattern
    pub fn builder() -> PagingLandscapePluginBuilder {
        PagingLandscapePluginBuilder::default()
    }

    fn load_scene(&self) -> scene::LandscapeSceneManager {
        let mut scene = scene::LandscapeSceneManager::new(Arc::clone(&self.source));
        let loaded = match &self.config_path {
            Some(path) => scene.load_world_geometry(path),
            None => scene.load_world_geometry_with(self.options.clone()),
        };
        if let Err(err) = loaded {
            error!("landscape world geometry failed to load: {err}");
        }
        scene
    }
}

impl Plugin for PagingLandscapePlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(self.load_scene())
            .init_resource::<material::LandscapeMaterialHandle>()
            .init_resource::<systems::TileEntities>()
            .add_systems(Startup, material::setup_landscape_material)
            .add_systems(
                Update,
                (systems::update_scene_graph, systems::sync_tile_meshes).chain(),
            )
            .add_systems(Last, systems::mark_visible_renderables);
    }
}

/// Builder for constructing a PagingLandscapePlugin with custom settings
#[derive(Default)]
pub struct PagingLandscapePluginBuilder {
    plugin: PagingLandscapePlugin,
}

impl PagingLandscapePluginBuilder {
    /// Load options from a TOML settings file
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.plugin.config_path = Some(path.into());
        self
    }

    pub fn options(mut self, options: config::Options) -> Self {
        self.plugin.options = options;
        self
    }

    pub fn source(mut self, source: impl heightmap::HeightmapSource) -> Self {
        self.plugin.source = Arc::new(source);
        self
    }

    pub fn build(self) -> PagingLandscapePlugin {
        self.plugin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heightmap::ProceduralHeightmap;

    #[test]
    fn test_plugin_loads_scene() {
        let options = config::Options::builder().world_size(2, 2).build().unwrap();
        let plugin = PagingLandscapePlugin::builder()
            .options(options)
            .source(ProceduralHeightmap::new(|_, _| 3.0))
            .build();

        let scene = plugin.load_scene();
        assert!(scene.is_world_loaded());
        assert_eq!(scene.options().world_width, 2);
        assert_eq!(scene.height_at(0.0, 0.0), Some(3.0));
    }

    #[test]
    fn test_plugin_with_missing_config_stays_unloaded() {
        let plugin = PagingLandscapePlugin::builder()
            .config_path("/nonexistent/landscape.toml")
            .build();
        let scene = plugin.load_scene();
        assert!(!scene.is_world_loaded());
    }
}
