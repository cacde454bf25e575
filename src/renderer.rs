// =============================================================================
// RENDERER - frame lifecycle around the swapchain
// =============================================================================
//
// FRAME FLOW:
// 1. begin_frame: wait for this slot's fence, acquire an image, start recording
// 2. begin_render_pass / (draw calls) / end_render_pass
// 3. end_frame: submit, present, recreate the swapchain if it went stale
//
// Command buffers are re-recorded every frame, one per frame in flight.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use crate::backend::swapchain::AcquiredImage;
use crate::backend::sync::FrameSync;
use crate::backend::{Swapchain, VulkanDevice};
use crate::config::Config;

pub struct Renderer {
    device: Arc<VulkanDevice>,
    swapchain: Swapchain,
    present_mode: vk::PresentModeKHR,
    clear_color: [f32; 4],

    /// One command buffer and sync slot per frame in flight
    command_buffers: Vec<vk::CommandBuffer>,
    frame_sync: Vec<FrameSync>,
    /// Fence of the frame currently using each swapchain image (null if none)
    images_in_flight: Vec<vk::Fence>,
    wait_stages: [vk::PipelineStageFlags; 1],

    current_frame: usize,
    current_image: u32,
    frame_started: bool,

    /// Set on resize or suboptimal present; handled at the next frame boundary
    needs_recreate: bool,
    render_pass_changed: bool,
}

impl Renderer {
    pub fn new(device: Arc<VulkanDevice>, window_extent: vk::Extent2D, config: &Config) -> Result<Self> {
        let present_mode = config.present_mode();
        let swapchain = Swapchain::new(device.clone(), window_extent, present_mode, None)?;

        let frames_in_flight = config.graphics.max_frames_in_flight;
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(device.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(frames_in_flight as u32);

        let command_buffers = unsafe { device.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffers")?;

        let frame_sync = (0..frames_in_flight)
            .map(|_| FrameSync::new(&device))
            .collect::<Result<Vec<_>>>()?;

        log::info!(
            "Renderer ready: {} frames in flight, {} swapchain images",
            frames_in_flight,
            swapchain.image_count()
        );

        Ok(Self {
            images_in_flight: vec![vk::Fence::null(); swapchain.image_count()],
            device,
            swapchain,
            present_mode,
            clear_color: config.graphics.clear_color,
            command_buffers,
            frame_sync,
            wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
            current_frame: 0,
            current_image: 0,
            frame_started: false,
            needs_recreate: false,
            render_pass_changed: false,
        })
    }

    pub fn swapchain_render_pass(&self) -> vk::RenderPass {
        self.swapchain.render_pass
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    /// Request swapchain recreation at the next frame boundary
    pub fn mark_resized(&mut self) {
        self.needs_recreate = true;
    }

    /// True once after a recreation produced an incompatible render pass;
    /// pipelines built against the old one must be rebuilt.
    pub fn take_render_pass_changed(&mut self) -> bool {
        std::mem::take(&mut self.render_pass_changed)
    }

    /// Start a frame. Returns `None` when nothing can be rendered right now
    /// (minimized window or the swapchain had to be recreated).
    pub fn begin_frame(&mut self, window_extent: vk::Extent2D) -> Result<Option<vk::CommandBuffer>> {
        if self.frame_started {
            anyhow::bail!("begin_frame called while a frame is already in progress");
        }
        if is_zero_extent(window_extent) {
            return Ok(None);
        }
        if self.needs_recreate {
            self.recreate_swapchain(window_extent)?;
        }

        let sync = &self.frame_sync[self.current_frame];
        sync.wait()?;
        let (image_available, in_flight_fence) = (sync.image_available, sync.in_flight_fence);

        let image_index = match self.swapchain.acquire_next_image(image_available)? {
            AcquiredImage::Ready { index, suboptimal } => {
                if suboptimal {
                    self.needs_recreate = true;
                }
                index
            }
            AcquiredImage::OutOfDate => {
                self.needs_recreate = true;
                self.recreate_swapchain(window_extent)?;
                return Ok(None);
            }
        };

        // A previous frame may still be rendering into this image
        let image_fence = self.images_in_flight[image_index as usize];
        if image_fence != vk::Fence::null() {
            unsafe { self.device.device.wait_for_fences(&[image_fence], true, u64::MAX) }
                .context("Failed to wait for swapchain image fence")?;
        }
        self.images_in_flight[image_index as usize] = in_flight_fence;

        let cmd = self.command_buffers[self.current_frame];
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .context("Failed to reset command buffer")?;
            self.device
                .device
                .begin_command_buffer(cmd, &begin_info)
                .context("Failed to begin recording command buffer")?;
        }

        self.current_image = image_index;
        self.frame_started = true;
        Ok(Some(cmd))
    }

    /// Begin the swapchain render pass and set the dynamic viewport/scissor
    pub fn begin_render_pass(&self, cmd: vk::CommandBuffer) -> Result<()> {
        self.check_recording(cmd)?;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        let extent = self.swapchain.extent;
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.swapchain.render_pass)
            .framebuffer(self.swapchain.framebuffers[self.current_image as usize])
            .render_area(render_area)
            .clear_values(&clear_values);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            let device = &self.device.device;
            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[render_area]);
        }

        Ok(())
    }

    pub fn end_render_pass(&self, cmd: vk::CommandBuffer) -> Result<()> {
        self.check_recording(cmd)?;
        unsafe { self.device.device.cmd_end_render_pass(cmd) };
        Ok(())
    }

    /// Finish recording, submit and present the current frame
    pub fn end_frame(&mut self, window_extent: vk::Extent2D) -> Result<()> {
        if !self.frame_started {
            anyhow::bail!("end_frame called without begin_frame");
        }
        self.frame_started = false;

        let cmd = self.command_buffers[self.current_frame];
        let sync = &self.frame_sync[self.current_frame];

        unsafe { self.device.device.end_command_buffer(cmd) }
            .context("Failed to record command buffer")?;

        let wait_semaphores = [sync.image_available];
        let signal_semaphores = [sync.render_finished];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // Reset only once we know work will be submitted against the fence
        sync.reset()?;
        unsafe {
            self.device
                .device
                .queue_submit(self.device.graphics_queue, &[submit_info.build()], sync.in_flight_fence)
                .context("Failed to submit draw command buffer")?;
        }

        let stale = self.swapchain.present(self.current_image, &signal_semaphores)?;

        self.current_frame = (self.current_frame + 1) % self.frame_sync.len();

        if stale || self.needs_recreate {
            self.needs_recreate = true;
            self.recreate_swapchain(window_extent)?;
        }

        Ok(())
    }

    /// Rebuild the swapchain for the current window size.
    ///
    /// Skipped while the window has a zero dimension; the request stays
    /// pending until the window is restored.
    pub fn recreate_swapchain(&mut self, window_extent: vk::Extent2D) -> Result<()> {
        if is_zero_extent(window_extent) {
            return Ok(());
        }

        self.device.wait_idle()?;

        let swapchain = Swapchain::new(
            self.device.clone(),
            window_extent,
            self.present_mode,
            Some(&self.swapchain),
        )?;

        if !swapchain.compatible_with(&self.swapchain) {
            log::info!("Swapchain formats changed, render pass is no longer compatible");
            self.render_pass_changed = true;
        }

        // Old swapchain is destroyed here, after the new one took over its images
        self.swapchain = swapchain;
        self.images_in_flight = vec![vk::Fence::null(); self.swapchain.image_count()];
        self.needs_recreate = false;

        Ok(())
    }

    fn check_recording(&self, cmd: vk::CommandBuffer) -> Result<()> {
        if !self.frame_started {
            anyhow::bail!("No frame in progress");
        }
        if cmd != self.command_buffers[self.current_frame] {
            anyhow::bail!("Command buffer does not belong to the current frame");
        }
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::warn!("Failed to wait for device idle: {:#}", e);
        }
        unsafe {
            self.device
                .device
                .free_command_buffers(self.device.command_pool, &self.command_buffers);
        }
    }
}

fn is_zero_extent(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_extent_detection() {
        assert!(is_zero_extent(vk::Extent2D { width: 0, height: 600 }));
        assert!(is_zero_extent(vk::Extent2D { width: 800, height: 0 }));
        assert!(!is_zero_extent(vk::Extent2D { width: 800, height: 600 }));
    }
}
