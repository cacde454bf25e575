// Model - vertex data uploaded to the GPU

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use std::sync::Arc;

use crate::backend::buffer::Buffer;
use crate::backend::VulkanDevice;
use crate::mesh::TriangleMesh;

/// Vertex layout shared with `simple_shader.vert`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec2,
}

impl Vertex {
    pub fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![vk::VertexInputAttributeDescription {
            binding: 0,
            location: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: std::mem::offset_of!(Vertex, position) as u32,
        }]
    }
}

pub struct Model {
    vertex_buffer: Buffer,
    vertex_count: u32,
}

impl Model {
    pub fn new(device: &Arc<VulkanDevice>, vertices: &[Vertex]) -> Result<Self> {
        if vertices.len() < 3 {
            anyhow::bail!("Model needs at least 3 vertices, got {}", vertices.len());
        }
        let vertex_count = draw_count(vertices.len())?;

        let vertex_buffer = Buffer::with_data(
            device,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            vertices,
            "model vertices",
        )?;

        log::debug!("Uploaded model with {} vertices", vertices.len());

        Ok(Self {
            vertex_buffer,
            vertex_count,
        })
    }

    pub fn from_mesh(device: &Arc<VulkanDevice>, mesh: &TriangleMesh) -> Result<Self> {
        let vertices: Vec<Vertex> = mesh
            .vertices()
            .iter()
            .map(|&position| Vertex { position })
            .collect();
        Self::new(device, &vertices)
    }

    pub fn bind(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        unsafe { device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]) };
    }

    pub fn draw(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        unsafe { device.cmd_draw(cmd, self.vertex_count, 1, 0, 0) };
    }
}

fn draw_count(len: usize) -> Result<u32> {
    u32::try_from(len).with_context(|| format!("Model has too many vertices to draw: {}", len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_two_packed_floats() {
        assert_eq!(std::mem::size_of::<Vertex>(), 8);
        let bindings = Vertex::binding_descriptions();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].stride, 8);
        assert_eq!(bindings[0].input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn position_attribute_matches_shader_location() {
        let attributes = Vertex::attribute_descriptions();
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes[0].location, 0);
        assert_eq!(attributes[0].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attributes[0].offset, 0);
    }

    #[test]
    fn draw_count_rejects_lengths_beyond_u32() {
        assert_eq!(draw_count(9).unwrap(), 9);
        assert_eq!(draw_count(u32::MAX as usize).unwrap(), u32::MAX);
        if let Some(too_many) = (u32::MAX as usize).checked_add(1) {
            assert!(draw_count(too_many).is_err());
        }
    }

    #[test]
    fn vertices_cast_to_raw_floats() {
        let vertices = [
            Vertex { position: Vec2::new(0.0, -0.5) },
            Vertex { position: Vec2::new(0.5, 0.5) },
        ];
        let floats: &[f32] = bytemuck::cast_slice(&vertices);
        assert_eq!(floats, &[0.0, -0.5, 0.5, 0.5]);
    }
}
