//! Tile mesh generation from the resident height data

use crate::config::Options;
use crate::heightmap::HeightDataProvider;
use crate::texture::TextureManager;
use crate::tile::TileInfo;
use bevy::asset::RenderAssetUsages;
use bevy::mesh::Indices;
use bevy::prelude::*;
use bevy::render::render_resource::PrimitiveTopology;

/// Skirt depth in sample spacings at LOD 0; doubles with each level
const SKIRT_SAMPLES: f32 = 2.0;

/// Sample stride of a render level, capped to the tile span
pub fn level_step(level: u32, options: &Options) -> u32 {
    let span = options.tile_size - 1;
    1u32.checked_shl(level).unwrap_or(span).min(span)
}

/// Build the mesh of a tile at a render level. Positions are in world space.
pub fn build_tile_mesh(
    info: &TileInfo,
    level: u32,
    options: &Options,
    data: &dyn HeightDataProvider,
    textures: &TextureManager,
) -> Mesh {
    let mut mesh = Mesh::new(
        PrimitiveTopology::TriangleList,
        RenderAssetUsages::default(),
    );

    let step = level_step(level, options);
    let span = options.tile_size - 1;
    let vertices_per_side = span / step + 1;
    let bounds = options.tile_bounds(info);
    let spacing = Vec2::new(options.scale.x, options.scale.z) * step as f32;
    let normal_step = options.scale.x.min(options.scale.z);
    let (min_height, _) = options.height_range();

    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut normals: Vec<[f32; 3]> = Vec::new();
    let mut colors: Vec<[f32; 4]> = Vec::new();
    let mut uvs: Vec<[f32; 2]> = Vec::new();

    for z in 0..vertices_per_side {
        for x in 0..vertices_per_side {
            let world = bounds.min + Vec2::new(x as f32, z as f32) * spacing;
            let height = data.real_world_height(world.x, world.y, Some(info));
            let normal = data.normal_at(world.x, world.y, normal_step);

            positions.push([world.x, height, world.y]);
            normals.push(normal.to_array());
            // Bands are expressed in raw units above the data minimum
            let raw = (height - min_height) / options.scale.y;
            colors.push(textures.color_at(raw, normal));
            uvs.push([
                x as f32 / (vertices_per_side - 1) as f32,
                z as f32 / (vertices_per_side - 1) as f32,
            ]);
        }
    }

    let mut indices: Vec<u32> = Vec::new();
    for z in 0..vertices_per_side - 1 {
        for x in 0..vertices_per_side - 1 {
            let top_left = z * vertices_per_side + x;
            let top_right = top_left + 1;
            let bottom_left = (z + 1) * vertices_per_side + x;
            let bottom_right = bottom_left + 1;

            indices.extend([top_left, bottom_left, top_right]);
            indices.extend([top_right, bottom_left, bottom_right]);
        }
    }

    let skirt_depth = SKIRT_SAMPLES * spacing.max_element();
    add_skirts(
        &mut positions,
        &mut normals,
        &mut colors,
        &mut uvs,
        &mut indices,
        vertices_per_side as usize,
        skirt_depth,
    );

    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
    mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
    mesh.insert_attribute(Mesh::ATTRIBUTE_COLOR, colors);
    mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, uvs);
    mesh.insert_indices(Indices::U32(indices));

    mesh
}

/// Hang a skirt below the tile border to hide cracks between LOD levels
fn add_skirts(
    positions: &mut Vec<[f32; 3]>,
    normals: &mut Vec<[f32; 3]>,
    colors: &mut Vec<[f32; 4]>,
    uvs: &mut Vec<[f32; 2]>,
    indices: &mut Vec<u32>,
    vertices_per_side: usize,
    skirt_depth: f32,
) {
    let start_vertex = positions.len() as u32;
    let last = vertices_per_side - 1;

    // Border ring: top, right, bottom, left
    let mut edge: Vec<u32> = Vec::with_capacity(vertices_per_side * 4);
    edge.extend((0..vertices_per_side).map(|x| x as u32));
    edge.extend((0..vertices_per_side).map(|z| (z * vertices_per_side + last) as u32));
    edge.extend(
        (0..vertices_per_side)
            .rev()
            .map(|x| (last * vertices_per_side + x) as u32),
    );
    edge.extend((0..vertices_per_side).rev().map(|z| (z * vertices_per_side) as u32));

    for &idx in &edge {
        let p = positions[idx as usize];
        positions.push([p[0], p[1] - skirt_depth, p[2]]);
        normals.push(normals[idx as usize]);
        colors.push(colors[idx as usize]);
        uvs.push(uvs[idx as usize]);
    }

    let count = edge.len();
    for i in 0..count {
        let curr = edge[i];
        let next = edge[(i + 1) % count];
        let curr_skirt = start_vertex + i as u32;
        let next_skirt = start_vertex + ((i + 1) % count) as u32;

        indices.extend([curr, next, curr_skirt]);
        indices.extend([next, next_skirt, curr_skirt]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heightmap::{HeightData2D, ProceduralHeightmap};
    use bevy::mesh::VertexAttributeValues;
    use std::sync::Arc;

    fn setup() -> (Options, HeightData2D, TextureManager) {
        let options = Options::builder().world_size(2, 2).build().unwrap();
        let mut data = HeightData2D::new(
            &options,
            Arc::new(ProceduralHeightmap::new(|_, _| 25.0)),
        );
        data.load_page(IVec2::new(1, 1));
        let textures = TextureManager::new(&options);
        (options, data, textures)
    }

    #[test]
    fn test_level_step() {
        let options = Options::default();
        assert_eq!(level_step(0, &options), 1);
        assert_eq!(level_step(3, &options), 8);
        assert_eq!(level_step(7, &options), 64);
        assert_eq!(level_step(40, &options), 64);
    }

    #[test]
    fn test_mesh_vertex_count_follows_level() {
        let (options, data, textures) = setup();
        let info = TileInfo::new(1, 1, 0, 0);

        // 65 x 65 grid plus a skirt ring of 4 * 65 vertices
        let full = build_tile_mesh(&info, 0, &options, &data, &textures);
        assert_eq!(full.count_vertices(), 65 * 65 + 4 * 65);

        // Step 4: 17 x 17 grid
        let coarse = build_tile_mesh(&info, 2, &options, &data, &textures);
        assert_eq!(coarse.count_vertices(), 17 * 17 + 4 * 17);
        let Some(Indices::U32(indices)) = coarse.indices() else {
            panic!("expected u32 indices");
        };
        assert_eq!(indices.len(), 16 * 16 * 6 + 4 * 17 * 6);
    }

    #[test]
    fn test_mesh_positions_in_world_space() {
        let (options, data, textures) = setup();
        let mesh = build_tile_mesh(&TileInfo::new(1, 1, 1, 0), 6, &options, &data, &textures);

        let Some(VertexAttributeValues::Float32x3(positions)) =
            mesh.attribute(Mesh::ATTRIBUTE_POSITION)
        else {
            panic!("missing positions");
        };
        // Level 6 leaves only the four corners
        assert_eq!(positions[0], [64.0, 25.0, 0.0]);
        assert_eq!(positions[3], [128.0, 25.0, 64.0]);
    }
}
