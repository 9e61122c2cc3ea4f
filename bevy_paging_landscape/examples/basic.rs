//! Basic landscape example
//!
//! Demonstrates minimal setup for a paging landscape over procedural noise.
//!
//! Run with: `cargo run -p bevy_paging_landscape --example basic`

use bevy::prelude::*;
use bevy_paging_landscape::prelude::*;

fn main() {
    let options = Options::builder()
        .world_size(8, 8)
        .page_radii(1, 2)
        .build()
        .unwrap_or_default();

    App::new()
        .add_plugins(DefaultPlugins)
        .add_plugins(
            PagingLandscapePlugin::builder()
                .options(options)
                .source(TerrainNoise::default())
                .build(),
        )
        .add_systems(Startup, setup)
        .add_systems(Update, camera_controller)
        .run();
}

fn setup(mut commands: Commands) {
    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(0.0, 300.0, 300.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    // Directional light (sun)
    commands.spawn((
        DirectionalLight {
            shadows_enabled: true,
            illuminance: 15_000.0,
            ..default()
        },
        Transform::from_rotation(Quat::from_euler(
            EulerRot::XYZ,
            -std::f32::consts::FRAC_PI_3,
            -std::f32::consts::FRAC_PI_4,
            0.0,
        )),
    ));
}

/// Simple fly camera controller
fn camera_controller(
    time: Res<Time>,
    keyboard: Res<ButtonInput<KeyCode>>,
    mut camera_query: Query<&mut Transform, With<Camera>>,
) {
    let Ok(mut transform) = camera_query.single_mut() else {
        return;
    };

    let mut velocity = Vec3::ZERO;
    let speed = 200.0;

    if keyboard.pressed(KeyCode::KeyW) {
        velocity += *transform.forward();
    }
    if keyboard.pressed(KeyCode::KeyS) {
        velocity -= *transform.forward();
    }
    if keyboard.pressed(KeyCode::KeyA) {
        velocity -= *transform.right();
    }
    if keyboard.pressed(KeyCode::KeyD) {
        velocity += *transform.right();
    }
    if keyboard.pressed(KeyCode::Space) {
        velocity += Vec3::Y;
    }
    if keyboard.pressed(KeyCode::ShiftLeft) {
        velocity -= Vec3::Y;
    }

    if velocity != Vec3::ZERO {
        transform.translation += velocity.normalize() * speed * time.delta_secs();
    }
}
