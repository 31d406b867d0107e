// Graphics pipeline creation
//
// Render pass, pipeline layout, the one fixed-function pipeline this program
// ever builds, and the per-image framebuffers.

use ash::vk;
use std::path::Path;
use std::sync::Arc;

use super::error::{InitError, InitResult};
use super::shader::ShaderModule;
use super::Device;

/// Single color attachment matching the swapchain format: cleared on load,
/// stored on finish, handed over in present layout.
pub fn create_render_pass(device: &Device, format: vk::Format) -> InitResult<vk::RenderPass> {
    let color_attachment = vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

    let color_attachment_refs = [vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];

    let subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_attachment_refs);

    let attachments = [color_attachment];
    let subpasses = [subpass];
    let render_pass_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses);

    unsafe { device.handle.create_render_pass(&render_pass_info, None) }
        .map_err(InitError::vulkan("creating the render pass"))
}

/// Empty layout: the pipeline takes no descriptor sets and no push constants.
pub fn create_pipeline_layout(device: &Device) -> InitResult<vk::PipelineLayout> {
    let layout_info = vk::PipelineLayoutCreateInfo::default();
    unsafe { device.handle.create_pipeline_layout(&layout_info, None) }
        .map_err(InitError::vulkan("creating the pipeline layout"))
}

/// Build the triangle pipeline.
///
/// The vertex shader generates its own positions and colors, so there are no
/// vertex input bindings. Viewport and line width are dynamic states, set
/// once while recording. The shader modules live only for the duration of
/// this call.
pub fn create_graphics_pipeline(
    device: &Arc<Device>,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    extent: vk::Extent2D,
    vert_path: impl AsRef<Path>,
    frag_path: impl AsRef<Path>,
) -> InitResult<vk::Pipeline> {
    let vert_shader = ShaderModule::load(device.clone(), vert_path)?;
    let frag_shader = ShaderModule::load(device.clone(), frag_path)?;

    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vert_shader.handle)
            .name(c"main"),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(frag_shader.handle)
            .name(c"main"),
    ];

    // No bindings, no attributes
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    let viewports = [vk::Viewport::default()
        .x(0.0)
        .y(0.0)
        .width(extent.width as f32)
        .height(extent.height as f32)
        .min_depth(0.0)
        .max_depth(1.0)];
    let scissors = [vk::Rect2D::default()
        .offset(vk::Offset2D { x: 0, y: 0 })
        .extent(extent)];
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewports(&viewports)
        .scissors(&scissors);

    let rasterizer = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    // Straight-through color output, no blending
    let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&color_blend_attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::LINE_WIDTH];
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
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
        .subpass(0);

    let pipelines = unsafe {
        device.handle.create_graphics_pipelines(
            vk::PipelineCache::null(),
            &[pipeline_info],
            None,
        )
    }
    .map_err(|(_, result)| InitError::Vulkan {
        step: "creating the graphics pipeline",
        result,
    })?;

    // vert_shader and frag_shader drop here, destroying the modules
    Ok(pipelines[0])
}

pub fn create_framebuffer(
    device: &Device,
    render_pass: vk::RenderPass,
    image_view: vk::ImageView,
    extent: vk::Extent2D,
) -> InitResult<vk::Framebuffer> {
    let attachments = [image_view];
    let framebuffer_info = vk::FramebufferCreateInfo::default()
        .render_pass(render_pass)
        .attachments(&attachments)
        .width(extent.width)
        .height(extent.height)
        .layers(1);

    unsafe { device.handle.create_framebuffer(&framebuffer_info, None) }
        .map_err(InitError::vulkan("creating a framebuffer"))
}
