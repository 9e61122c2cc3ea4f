//! Bevy systems driving the landscape scene manager
//!
//! Order within a frame: `update_scene_graph` streams and resets the visible
//! marks, `sync_tile_meshes` mirrors renderables as mesh entities, Bevy's
//! visibility pass runs in `PostUpdate`, and `mark_visible_renderables`
//! copies its result back into the renderable pool in `Last`.

use crate::material::LandscapeMaterialHandle;
use crate::mesh::build_tile_mesh;
use crate::renderable::{RenderableId, RenderableState};
use crate::scene::LandscapeSceneManager;
use bevy::prelude::*;
use std::collections::HashMap;

/// Mesh entity mirroring one renderable
#[derive(Component, Debug)]
pub struct LandscapeTile {
    pub renderable: RenderableId,
    /// Generation of the renderable when the entity was spawned
    pub generation: u64,
    pub render_level: u32,
}

/// Renderable to entity lookup
#[derive(Resource, Default)]
pub struct TileEntities {
    entities: HashMap<RenderableId, Entity>,
}

impl TileEntities {
    pub fn get(&self, id: RenderableId) -> Option<Entity> {
        self.entities.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// System: stream the landscape around the camera
pub fn update_scene_graph(
    camera_query: Query<&Transform, With<Camera>>,
    mut scene: ResMut<LandscapeSceneManager>,
) {
    let Ok(camera) = camera_query.single() else {
        return;
    };
    scene.update_scene_graph(camera.translation);
}

/// System: spawn, rebuild and despawn tile mesh entities
pub fn sync_tile_meshes(
    mut commands: Commands,
    mut scene: ResMut<LandscapeSceneManager>,
    mut tile_entities: ResMut<TileEntities>,
    mut meshes: ResMut<Assets<Mesh>>,
    material: Res<LandscapeMaterialHandle>,
    tiles: Query<&LandscapeTile>,
) {
    let Some((options, world)) = scene.split_mut() else {
        for (_, entity) in tile_entities.entities.drain() {
            commands.entity(entity).despawn();
        }
        return;
    };

    // Despawn entities whose renderable was retired or handed out again
    tile_entities.entities.retain(|&id, &mut entity| {
        let current = world
            .renderables()
            .get(id)
            .filter(|renderable| renderable.tile().is_some())
            .map(|renderable| renderable.generation());
        let spawned = tiles.get(entity).ok().map(|tile| tile.generation);
        let keep = current.is_some() && (spawned.is_none() || spawned == current);
        if !keep {
            commands.entity(entity).despawn();
        }
        keep
    });

    let Some(material) = material.handle.clone() else {
        return;
    };

    let pending: Vec<_> = world
        .renderables()
        .iter()
        .filter(|(_, renderable)| {
            renderable.needs_update()
                && matches!(
                    renderable.state(),
                    RenderableState::Visible | RenderableState::Invisible
                )
        })
        .filter_map(|(id, renderable)| {
            let info = renderable.tile()?;
            Some((id, info, renderable.render_level(), renderable.generation()))
        })
        .collect();

    for (id, info, render_level, generation) in pending {
        world.renderables_mut().take_update(id);
        let mesh = build_tile_mesh(&info, render_level, options, world.data(), world.textures());
        let handle = meshes.add(mesh);
        let tile = LandscapeTile {
            renderable: id,
            generation,
            render_level,
        };

        match tile_entities.get(id) {
            Some(entity) => {
                commands.entity(entity).insert((Mesh3d(handle), tile));
            }
            None => {
                let entity = commands
                    .spawn((
                        Mesh3d(handle),
                        MeshMaterial3d(material.clone()),
                        Transform::default(),
                        tile,
                    ))
                    .id();
                tile_entities.entities.insert(id, entity);
            }
        }
    }
}

/// System: record which renderables the renderer actually drew
pub fn mark_visible_renderables(
    mut scene: ResMut<LandscapeSceneManager>,
    tiles: Query<(&LandscapeTile, &ViewVisibility)>,
) {
    let Some(world) = scene.world_mut() else {
        return;
    };
    for (tile, visibility) in &tiles {
        if !visibility.get() {
            continue;
        }
        let current = world
            .renderables()
            .get(tile.renderable)
            .is_some_and(|renderable| renderable.generation() == tile.generation);
        if current {
            world.renderables_mut().mark_visible(tile.renderable);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use crate::heightmap::ProceduralHeightmap;
    use std::sync::Arc;

    fn test_app() -> App {
        let mut scene =
            LandscapeSceneManager::new(Arc::new(ProceduralHeightmap::new(|_, _| 10.0)));
        let options = Options::builder()
            .world_size(2, 2)
            .page_radii(0, 0)
            .visible_renderables(1.0)
            .build()
            .unwrap();
        scene.load_world_geometry_with(options).unwrap();

        let mut app = App::new();
        app.init_resource::<Assets<Mesh>>()
            .init_resource::<TileEntities>()
            .insert_resource(LandscapeMaterialHandle {
                handle: Some(Handle::default()),
            })
            .insert_resource(scene)
            .add_systems(Update, (update_scene_graph, sync_tile_meshes).chain());
        app.world_mut().spawn((
            Camera::default(),
            Transform::from_xyz(-224.0, 50.0, -224.0),
        ));
        app
    }

    #[test]
    fn test_meshes_follow_renderables() {
        let mut app = test_app();
        for _ in 0..5 {
            app.update();
        }

        let scene = app.world().resource::<LandscapeSceneManager>();
        let bound = scene
            .world()
            .unwrap()
            .renderables()
            .iter()
            .filter(|(_, renderable)| renderable.tile().is_some())
            .count();
        assert!(bound > 0);
        assert_eq!(app.world().resource::<TileEntities>().len(), bound);

        let mut query = app.world_mut().query::<(Entity, &LandscapeTile)>();
        let spawned: Vec<(Entity, RenderableId)> = query
            .iter(app.world())
            .map(|(entity, tile)| (entity, tile.renderable))
            .collect();
        assert_eq!(spawned.len(), bound);
        let tile_entities = app.world().resource::<TileEntities>();
        for (entity, renderable) in spawned {
            assert_eq!(tile_entities.get(renderable), Some(entity));
        }
    }

    #[test]
    fn test_entities_despawned_when_world_cleared() {
        let mut app = test_app();
        for _ in 0..5 {
            app.update();
        }
        app.world_mut()
            .resource_mut::<LandscapeSceneManager>()
            .clear_scene();
        app.update();

        assert!(app.world().resource::<TileEntities>().is_empty());
        let mut query = app.world_mut().query::<&LandscapeTile>();
        assert_eq!(query.iter(app.world()).count(), 0);
    }
}
