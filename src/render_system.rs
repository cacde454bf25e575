// Render system - owns the pipeline layout and graphics pipeline used to
// draw models into the swapchain render pass.

use anyhow::{Context, Result};
use ash::vk;
use std::mem::ManuallyDrop;
use std::path::Path;
use std::sync::Arc;

use crate::backend::pipeline::{Pipeline, PipelineConfig};
use crate::backend::VulkanDevice;
use crate::game_object::{GameObject, SimplePushConstantData};
use crate::model::Vertex;

pub const VERTEX_SHADER: &str = "simple_shader.vert.spv";
pub const FRAGMENT_SHADER: &str = "simple_shader.frag.spv";

pub struct SimpleRenderSystem {
    pipeline: ManuallyDrop<Pipeline>,
    pipeline_layout: vk::PipelineLayout,
    device: Arc<VulkanDevice>,
}

impl SimpleRenderSystem {
    pub fn new(
        device: &Arc<VulkanDevice>,
        render_pass: vk::RenderPass,
        shader_dir: &Path,
    ) -> Result<Self> {
        let pipeline_layout = Self::create_pipeline_layout(device)?;

        let config = PipelineConfig::new(pipeline_layout, render_pass)
            .with_vertex_input(Vertex::binding_descriptions(), Vertex::attribute_descriptions());

        let pipeline = match Pipeline::new(
            device,
            &shader_dir.join(VERTEX_SHADER),
            &shader_dir.join(FRAGMENT_SHADER),
            &config,
        ) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                unsafe { device.device.destroy_pipeline_layout(pipeline_layout, None) };
                return Err(e);
            }
        };

        Ok(Self {
            pipeline: ManuallyDrop::new(pipeline),
            pipeline_layout,
            device: device.clone(),
        })
    }

    /// No descriptor sets; one push constant block per draw
    fn create_pipeline_layout(device: &VulkanDevice) -> Result<vk::PipelineLayout> {
        let push_constant_ranges = [SimplePushConstantData::range()];
        let layout_info =
            vk::PipelineLayoutCreateInfo::builder().push_constant_ranges(&push_constant_ranges);

        unsafe { device.device.create_pipeline_layout(&layout_info, None) }
            .context("Failed to create pipeline layout")
    }

    pub fn render_game_objects(&self, cmd: vk::CommandBuffer, game_objects: &[GameObject]) {
        let device = &self.device.device;
        self.pipeline.bind(cmd);

        for object in game_objects {
            let push = object.push_constants();
            unsafe {
                device.cmd_push_constants(
                    cmd,
                    self.pipeline_layout,
                    SimplePushConstantData::stages(),
                    0,
                    bytemuck::bytes_of(&push),
                );
            }
            object.model.bind(device, cmd);
            object.model.draw(device, cmd);
        }
    }
}

impl Drop for SimpleRenderSystem {
    fn drop(&mut self) {
        unsafe {
            // pipeline goes before the layout it was created with
            ManuallyDrop::drop(&mut self.pipeline);
            self.device
                .device
                .destroy_pipeline_layout(self.pipeline_layout, None);
        }
    }
}
