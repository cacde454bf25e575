// Game objects - a shared model drawn with its own offset and colour

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use std::rc::Rc;

use crate::config::ObjectConfig;
use crate::model::Model;

pub type GameObjectId = u32;

/// Per-draw data for `simple_shader`.
///
/// Matches the shader's std430 push_constant block: `vec2 offset` at 0,
/// `vec3 color` at 16.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SimplePushConstantData {
    pub offset: Vec2,
    _pad0: [f32; 2],
    pub color: Vec3,
    _pad1: f32,
}

impl SimplePushConstantData {
    pub fn new(offset: Vec2, color: Vec3) -> Self {
        Self {
            offset,
            _pad0: [0.0; 2],
            color,
            _pad1: 0.0,
        }
    }

    pub fn stages() -> vk::ShaderStageFlags {
        vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
    }

    pub fn range() -> vk::PushConstantRange {
        vk::PushConstantRange {
            stage_flags: Self::stages(),
            offset: 0,
            size: std::mem::size_of::<Self>() as u32,
        }
    }
}

pub struct GameObject {
    id: GameObjectId,
    pub model: Rc<Model>,
    pub offset: Vec2,
    pub color: Vec3,
}

impl GameObject {
    pub fn new(id: GameObjectId, model: Rc<Model>, config: &ObjectConfig) -> Self {
        Self {
            id,
            model,
            offset: config.offset(),
            color: config.color(),
        }
    }

    pub fn id(&self) -> GameObjectId {
        self.id
    }

    pub fn push_constants(&self) -> SimplePushConstantData {
        SimplePushConstantData::new(self.offset, self.color)
    }
}

/// One object per configured entry, all drawing `model`
pub fn load_game_objects(model: &Rc<Model>, configs: &[ObjectConfig]) -> Vec<GameObject> {
    configs
        .iter()
        .enumerate()
        .map(|(i, config)| {
            let object = GameObject::new(i as GameObjectId, model.clone(), config);
            log::debug!(
                "Game object {} at {:?}, color {:?}",
                object.id(),
                object.offset,
                object.color
            );
            object
        })
        .collect()
}

/// Point every object at a rebuilt model; the old one is freed with its last user
pub fn replace_model(objects: &mut [GameObject], model: &Rc<Model>) {
    for object in objects {
        object.model = model.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn push_constants_follow_std430_layout() {
        assert_eq!(size_of::<SimplePushConstantData>(), 32);
        assert_eq!(offset_of!(SimplePushConstantData, offset), 0);
        assert_eq!(offset_of!(SimplePushConstantData, color), 16);
    }

    #[test]
    fn push_constant_range_covers_both_stages() {
        let range = SimplePushConstantData::range();
        assert_eq!(range.offset, 0);
        assert_eq!(range.size, 32);
        assert!(range.stage_flags.contains(vk::ShaderStageFlags::VERTEX));
        assert!(range.stage_flags.contains(vk::ShaderStageFlags::FRAGMENT));
    }

    #[test]
    fn push_constant_bytes_carry_offset_and_color() {
        let data = SimplePushConstantData::new(Vec2::new(0.25, -0.5), Vec3::new(0.0, 1.0, 0.5));
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&data));
        assert_eq!(floats, &[0.25, -0.5, 0.0, 0.0, 0.0, 1.0, 0.5, 0.0]);
    }
}
