use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use bevy_paging_landscape::prelude::*;

/// Length of the picking segment cast from the camera
const PICK_DISTANCE: f32 = 5_000.0;

/// Radius of the mound raised with the mound key
const MOUND_RADIUS: f32 = 12.0;

/// Diagnostic keys printed by the stats key
const STAT_KEYS: [&str; 12] = [
    "CurrentCameraPageX",
    "CurrentCameraPageZ",
    "CurrentCameraTileX",
    "CurrentCameraTileZ",
    "PagePreloadQueue",
    "PageLoadQueue",
    "PageUnloadQueue",
    "PagePostUnloadQueue",
    "NumTiles",
    "NumFreeTiles",
    "RenderablesCount",
    "NumVisibleRenderables",
];

pub struct EditingPlugin;

impl Plugin for EditingPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, (crater_click_system, mound_key_system, stats_key_system));
    }
}

/// Left click stamps a crater where the cursor ray meets the terrain
fn crater_click_system(
    mouse_input: Res<ButtonInput<MouseButton>>,
    window_query: Query<&Window, With<PrimaryWindow>>,
    camera_query: Query<(&Camera, &GlobalTransform)>,
    mut scene: ResMut<LandscapeSceneManager>,
) {
    if !mouse_input.just_pressed(MouseButton::Left) {
        return;
    }

    let Some(window) = window_query.iter().next() else {
        return;
    };
    let Some(cursor_position) = window.cursor_position() else {
        return;
    };
    let Some((camera, camera_transform)) = camera_query.iter().next() else {
        return;
    };
    let Ok(ray) = camera.viewport_to_world(camera_transform, cursor_position) else {
        return;
    };

    let end = ray.origin + *ray.direction * PICK_DISTANCE;
    match scene.intersect_segment(ray.origin, end, true) {
        Some(impact) => info!("Crater at {impact}"),
        None => info!("No terrain under the cursor"),
    }
}

/// M raises a mound at the last impact
fn mound_key_system(keyboard: Res<ButtonInput<KeyCode>>, mut scene: ResMut<LandscapeSceneManager>) {
    if !keyboard.just_pressed(KeyCode::KeyM) {
        return;
    }
    let Some(impact) = scene.get_option("LastImpact").and_then(|value| value.as_vector()) else {
        return;
    };
    if impact == Vec3::NEG_ONE {
        info!("Click the terrain before raising a mound");
        return;
    }

    if scene.add_new_height(HeightSphere::new(impact, MOUND_RADIUS)) {
        info!("Mound raised at {impact}");
    }
}

/// Tab logs the streaming diagnostics
fn stats_key_system(keyboard: Res<ButtonInput<KeyCode>>, scene: Res<LandscapeSceneManager>) {
    if !keyboard.just_pressed(KeyCode::Tab) {
        return;
    }
    let stats: Vec<String> = STAT_KEYS
        .iter()
        .filter_map(|key| {
            let value = scene.get_option(key)?.as_integer()?;
            Some(format!("{key}={value}"))
        })
        .collect();
    info!("Landscape: {}", stats.join(" "));
}
