//! Shared material for landscape tiles

use bevy::prelude::*;

/// Shared material handle for all tile meshes
#[derive(Resource, Default)]
pub struct LandscapeMaterialHandle {
    pub handle: Option<Handle<StandardMaterial>>,
}

/// Initialize the shared landscape material once at startup
pub fn setup_landscape_material(
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut landscape_material: ResMut<LandscapeMaterialHandle>,
) {
    landscape_material.handle = Some(materials.add(StandardMaterial {
        base_color: Color::WHITE, // Vertex colors will modulate this
        perceptual_roughness: 0.85,
        metallic: 0.0,
        reflectance: 0.25,
        ..default()
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_landscape_material() {
        let mut app = App::new();
        app.init_resource::<Assets<StandardMaterial>>()
            .init_resource::<LandscapeMaterialHandle>()
            .add_systems(Update, setup_landscape_material);
        app.update();

        let handle = app.world().resource::<LandscapeMaterialHandle>();
        let handle = handle.handle.clone().unwrap();
        let materials = app.world().resource::<Assets<StandardMaterial>>();
        assert!(materials.get(&handle).is_some());
    }
}
