// Graphics pipeline creation and management
//
// The graphics pipeline defines how vertices are processed and rasterized.
// Viewport and scissor are dynamic, so a pipeline survives window resizes
// as long as the render pass stays compatible.

use anyhow::{Context, Result};
use ash::vk;
use std::ffi::CStr;
use std::path::Path;
use std::sync::Arc;

use super::shader::load_shader_module;
use super::VulkanDevice;

const ENTRY_POINT: &CStr = c"main";

/// Fixed-function state for a graphics pipeline.
///
/// Plain Vulkan structs without pointers; the create-info chain is built
/// from these when the pipeline is created.
#[derive(Clone)]
pub struct PipelineConfig {
    pub input_assembly: vk::PipelineInputAssemblyStateCreateInfo,
    pub rasterization: vk::PipelineRasterizationStateCreateInfo,
    pub multisample: vk::PipelineMultisampleStateCreateInfo,
    pub color_blend_attachment: vk::PipelineColorBlendAttachmentState,
    pub depth_stencil: vk::PipelineDepthStencilStateCreateInfo,
    pub dynamic_states: Vec<vk::DynamicState>,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub pipeline_layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
}

impl PipelineConfig {
    /// Default state: opaque filled triangle list, no culling, depth test on
    pub fn new(pipeline_layout: vk::PipelineLayout, render_pass: vk::RenderPass) -> Self {
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false)
            .build();

        // Subdivided triangles keep the winding of their parent, so culling is off
        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false)
            .build();

        let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0)
            .build();

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build();

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .stencil_test_enable(false)
            .build();

        Self {
            input_assembly,
            rasterization,
            multisample,
            color_blend_attachment,
            depth_stencil,
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            pipeline_layout,
            render_pass,
            subpass: 0,
        }
    }

    pub fn with_vertex_input(
        mut self,
        bindings: Vec<vk::VertexInputBindingDescription>,
        attributes: Vec<vk::VertexInputAttributeDescription>,
    ) -> Self {
        self.vertex_bindings = bindings;
        self.vertex_attributes = attributes;
        self
    }
}

/// Graphics pipeline built from a vertex/fragment shader pair
pub struct Pipeline {
    pub pipeline: vk::Pipeline,
    device: Arc<VulkanDevice>,
}

impl Pipeline {
    pub fn new(
        device: &Arc<VulkanDevice>,
        vert_path: &Path,
        frag_path: &Path,
        config: &PipelineConfig,
    ) -> Result<Self> {
        if config.pipeline_layout == vk::PipelineLayout::null() {
            anyhow::bail!("Cannot create graphics pipeline: no pipeline layout in config");
        }
        if config.render_pass == vk::RenderPass::null() {
            anyhow::bail!("Cannot create graphics pipeline: no render pass in config");
        }

        let vert_shader = load_shader_module(device, vert_path)?;
        let frag_shader = match load_shader_module(device, frag_path) {
            Ok(module) => module,
            Err(e) => {
                unsafe { device.device.destroy_shader_module(vert_shader, None) };
                return Err(e);
            }
        };

        let result = Self::create(device, vert_shader, frag_shader, config);

        // Modules are only needed while the pipeline is being built
        unsafe {
            device.device.destroy_shader_module(vert_shader, None);
            device.device.destroy_shader_module(frag_shader, None);
        }

        let pipeline = result?;
        log::info!("Created graphics pipeline from {:?} + {:?}", vert_path, frag_path);

        Ok(Self {
            pipeline,
            device: device.clone(),
        })
    }

    fn create(
        device: &VulkanDevice,
        vert_shader: vk::ShaderModule,
        frag_shader: vk::ShaderModule,
        config: &PipelineConfig,
    ) -> Result<vk::Pipeline> {
        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_shader)
                .name(ENTRY_POINT)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_shader)
                .name(ENTRY_POINT)
                .build(),
        ];

        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&config.vertex_bindings)
            .vertex_attribute_descriptions(&config.vertex_attributes);

        // Counts only; the actual rectangles are set per frame
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let color_blend_attachments = [config.color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&color_blend_attachments);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&config.dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&config.input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&config.rasterization)
            .multisample_state(&config.multisample)
            .depth_stencil_state(&config.depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(config.pipeline_layout)
            .render_pass(config.render_pass)
            .subpass(config.subpass)
            .build();

        let pipelines = unsafe {
            device
                .device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, e)| e)
                .context("Failed to create graphics pipeline")?
        };

        Ok(pipelines[0])
    }

    pub fn bind(&self, cmd: vk::CommandBuffer) {
        unsafe {
            self.device
                .device
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_pipeline(self.pipeline, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_an_opaque_triangle_list() {
        let config = PipelineConfig::new(vk::PipelineLayout::null(), vk::RenderPass::null());
        assert_eq!(config.input_assembly.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(config.rasterization.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(config.rasterization.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(config.rasterization.line_width, 1.0);
        assert_eq!(
            config.multisample.rasterization_samples,
            vk::SampleCountFlags::TYPE_1
        );
        assert_eq!(config.color_blend_attachment.blend_enable, vk::FALSE);
        assert_eq!(
            config.color_blend_attachment.color_write_mask,
            vk::ColorComponentFlags::RGBA
        );
        assert_eq!(config.subpass, 0);
    }

    #[test]
    fn depth_test_keeps_the_closest_fragment() {
        let config = PipelineConfig::new(vk::PipelineLayout::null(), vk::RenderPass::null());
        assert_eq!(config.depth_stencil.depth_test_enable, vk::TRUE);
        assert_eq!(config.depth_stencil.depth_write_enable, vk::TRUE);
        assert_eq!(config.depth_stencil.depth_compare_op, vk::CompareOp::LESS);
    }

    #[test]
    fn viewport_and_scissor_are_dynamic() {
        let config = PipelineConfig::new(vk::PipelineLayout::null(), vk::RenderPass::null());
        assert_eq!(
            config.dynamic_states,
            vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]
        );
    }

    #[test]
    fn vertex_input_is_attached() {
        let binding = vk::VertexInputBindingDescription {
            binding: 0,
            stride: 8,
            input_rate: vk::VertexInputRate::VERTEX,
        };
        let config = PipelineConfig::new(vk::PipelineLayout::null(), vk::RenderPass::null())
            .with_vertex_input(vec![binding], Vec::new());
        assert_eq!(config.vertex_bindings.len(), 1);
        assert_eq!(config.vertex_bindings[0].stride, 8);
    }
}
