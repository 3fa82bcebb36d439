//! Shader modules and the mesh graphics pipeline
//!
//! SPIR-V loading and pipeline creation following RAII patterns.

use ash::{vk, Device};
use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;

use crate::render::backends::vulkan::rendering::vertex_layout::VertexLayout;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

const ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create a shader module from SPIR-V bytecode
    pub fn from_bytes(device: Device, bytes: &[u8]) -> VulkanResult<Self> {
        let code = ash::util::read_spv(&mut Cursor::new(bytes))
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid SPIR-V: {e}")))?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);
        let module = unsafe { device.create_shader_module(&create_info, None) }
            .map_err(VulkanError::api("vkCreateShaderModule"))?;

        Ok(Self { device, module })
    }

    /// Load a shader from a SPIR-V file
    pub fn from_file<P: AsRef<Path>>(device: Device, path: P) -> VulkanResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            VulkanError::InitializationFailed(format!("Failed to read shader file {}: {e}", path.display()))
        })?;
        log::debug!("Loaded shader {} ({} bytes)", path.display(), bytes.len());

        Self::from_bytes(device, &bytes)
    }

    /// Get shader module handle
    pub const fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Stage description with the `main` entry point
    pub fn stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Graphics pipeline wrapper with RAII cleanup
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Create the mesh pipeline
    ///
    /// Viewport and scissor are dynamic, so the pipeline does not depend on
    /// the swapchain extent.
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        vertex_shader: &ShaderModule,
        fragment_shader: &ShaderModule,
        descriptor_set_layout: vk::DescriptorSetLayout,
    ) -> VulkanResult<Self> {
        let shader_stages = [
            vertex_shader.stage_info(vk::ShaderStageFlags::VERTEX),
            fragment_shader.stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];

        let binding_descriptions = [VertexLayout::binding_description()];
        let attribute_descriptions = VertexLayout::attribute_descriptions();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&binding_descriptions)
            .vertex_attribute_descriptions(&attribute_descriptions);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Counts only; the values are set while recording
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = dynamic_states();
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = rasterization_state();

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let set_layouts = [descriptor_set_layout];
        let push_constant_ranges = [model_push_constant_range()];
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .map_err(VulkanError::api("vkCreatePipelineLayout"))?;

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0)
            .build();

        let created = unsafe { device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None) };
        let pipeline = match created {
            Ok(pipelines) => pipelines.into_iter().next(),
            Err((_, code)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(VulkanError::api("vkCreateGraphicsPipelines")(code));
            }
        };
        let Some(pipeline) = pipeline else {
            unsafe { device.destroy_pipeline_layout(layout, None) };
            return Err(VulkanError::invalid("Driver returned no pipeline"));
        };

        log::debug!("Created mesh graphics pipeline");
        Ok(Self { device, pipeline, layout })
    }

    /// Get pipeline handle
    pub const fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get layout handle
    pub const fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Bytes of per-draw push constants: one column-major model matrix
pub const MODEL_PUSH_CONSTANT_SIZE: u32 = 64;

const fn model_push_constant_range() -> vk::PushConstantRange {
    vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::VERTEX,
        offset: 0,
        size: MODEL_PUSH_CONSTANT_SIZE,
    }
}

const fn dynamic_states() -> [vk::DynamicState; 2] {
    [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]
}

fn rasterization_state() -> vk::PipelineRasterizationStateCreateInfo {
    vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .depth_bias_enable(false)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_back_faces_culled_ccw_front() {
        let state = rasterization_state();
        assert_eq!(state.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(state.front_face, vk::FrontFace::COUNTER_CLOCKWISE);
        assert_eq!(state.polygon_mode, vk::PolygonMode::FILL);
    }

    #[test]
    fn test_viewport_and_scissor_are_dynamic() {
        let states = dynamic_states();
        assert!(states.contains(&vk::DynamicState::VIEWPORT));
        assert!(states.contains(&vk::DynamicState::SCISSOR));
    }

    #[test]
    fn test_push_constants_hold_one_matrix() {
        let range = model_push_constant_range();
        assert_eq!(range.size as usize, std::mem::size_of::<[[f32; 4]; 4]>());
        assert_eq!(range.stage_flags, vk::ShaderStageFlags::VERTEX);
    }

    #[test]
    fn test_entry_point_name() {
        assert_eq!(ENTRY_POINT.to_str().unwrap(), "main");
    }
}
