use bevy::prelude::*;

mod viewer;

fn main() {
    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Landscape Viewer".into(),
                ..default()
            }),
            ..default()
        }))
        .add_plugins(viewer::ViewerPlugin)
        .run();
}
