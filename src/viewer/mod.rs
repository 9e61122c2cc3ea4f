use bevy::prelude::*;
use bevy_paging_landscape::prelude::*;

mod camera;
mod editing;

/// Settings file loaded at startup, relative to the working directory
const CONFIG_PATH: &str = "config/landscape.toml";

/// Overrides the random terrain seed when set
const SEED_VAR: &str = "LANDSCAPE_SEED";

pub struct ViewerPlugin;

impl Plugin for ViewerPlugin {
    fn build(&self, app: &mut App) {
        let seed = terrain_seed();
        info!("terrain seed {seed}");

        app.add_plugins(
            PagingLandscapePlugin::builder()
                .config_path(CONFIG_PATH)
                .source(TerrainNoise::with_seed(seed, NoiseSettings::default()))
                .build(),
        )
        .add_plugins(camera::CameraPlugin)
        .add_plugins(editing::EditingPlugin)
        .add_systems(Startup, setup_lights);
    }
}

fn terrain_seed() -> i32 {
    std::env::var(SEED_VAR)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or_else(rand::random)
}

fn setup_lights(mut commands: Commands) {
    // Directional light (sun)
    commands.spawn((
        DirectionalLight {
            shadows_enabled: true,
            illuminance: 15_000.0,
            ..default()
        },
        Transform::from_rotation(Quat::from_euler(
            EulerRot::XYZ,
            -std::f32::consts::FRAC_PI_3, // Steeper angle for better shadows
            -std::f32::consts::FRAC_PI_4,
            0.0,
        )),
    ));
}
