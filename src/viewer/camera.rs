use bevy::input::mouse::AccumulatedMouseMotion;
use bevy::input::mouse::AccumulatedMouseScroll;
use bevy::prelude::*;
use bevy_paging_landscape::prelude::*;

/// Minimum clearance kept between the camera and the terrain
const GROUND_CLEARANCE: f32 = 5.0;

pub struct CameraPlugin;

impl Plugin for CameraPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, setup_camera)
            .add_systems(Update, (camera_movement, keep_above_ground).chain());
    }
}

fn setup_camera(mut commands: Commands) {
    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(0.0, 250.0, 150.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
}

fn camera_movement(
    time: Res<Time>,
    keyboard: Res<ButtonInput<KeyCode>>,
    mouse_buttons: Res<ButtonInput<MouseButton>>,
    scroll: Res<AccumulatedMouseScroll>,
    mouse_motion: Res<AccumulatedMouseMotion>,
    mut query: Query<&mut Transform, With<Camera3d>>,
) {
    let speed = if keyboard.pressed(KeyCode::ShiftLeft) {
        400.0
    } else {
        100.0
    };
    let zoom_speed = 10.0;
    let rotation_speed = 0.005;

    for mut transform in &mut query {
        let forward = transform.forward();
        let right = transform.right();

        // Flatten forward/right to XZ plane for movement
        let forward_xz = Vec3::new(forward.x, 0.0, forward.z).normalize_or_zero();
        let right_xz = Vec3::new(right.x, 0.0, right.z).normalize_or_zero();

        let mut velocity = Vec3::ZERO;
        if keyboard.pressed(KeyCode::KeyW) {
            velocity += forward_xz;
        }
        if keyboard.pressed(KeyCode::KeyS) {
            velocity -= forward_xz;
        }
        if keyboard.pressed(KeyCode::KeyA) {
            velocity -= right_xz;
        }
        if keyboard.pressed(KeyCode::KeyD) {
            velocity += right_xz;
        }
        if keyboard.pressed(KeyCode::KeyE) {
            velocity += Vec3::Y;
        }
        if keyboard.pressed(KeyCode::KeyQ) {
            velocity -= Vec3::Y;
        }
        transform.translation += velocity * speed * time.delta_secs();

        if scroll.delta.y != 0.0 {
            transform.translation.y -= scroll.delta.y * zoom_speed;
        }

        // Middle mouse button: yaw in place
        if mouse_buttons.pressed(MouseButton::Middle) && mouse_motion.delta.x != 0.0 {
            transform.rotate_y(-mouse_motion.delta.x * rotation_speed);
        }

        // Right mouse button: free look with a pitch limit
        if mouse_buttons.pressed(MouseButton::Right) {
            let delta = mouse_motion.delta;
            let (yaw, pitch, _) = transform.rotation.to_euler(EulerRot::YXZ);
            let yaw = yaw - delta.x * rotation_speed;
            let pitch = (pitch - delta.y * rotation_speed).clamp(-1.5, 1.5);
            transform.rotation = Quat::from_euler(EulerRot::YXZ, yaw, pitch, 0.0);
        }
    }
}

/// Push the camera up when it would dip below the terrain surface
fn keep_above_ground(
    scene: Res<LandscapeSceneManager>,
    mut query: Query<&mut Transform, With<Camera3d>>,
) {
    for mut transform in &mut query {
        let position = transform.translation;
        let Some(ground) = scene.height_at(position.x, position.z) else {
            continue;
        };
        let floor = ground + GROUND_CLEARANCE;
        if position.y < floor {
            transform.translation.y = floor;
        }
    }
}
