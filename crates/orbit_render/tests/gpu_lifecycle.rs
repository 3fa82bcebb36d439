//! GPU lifecycle tests
//!
//! These need a Vulkan device and a display, so they are ignored by default:
//!
//! ```text
//! cargo test -p orbit_render --test gpu_lifecycle -- --ignored --test-threads=1
//! ```

use ash::vk;
use orbit_render::prelude::*;
use orbit_render::render::backends::vulkan::{
    Framebuffers, GpuAllocator, MemoryPolicy, RenderPass, StagingEngine, Swapchain, SwapchainState, VulkanContext,
};

const WIDTH: u32 = 800;
const HEIGHT: u32 = 600;

fn setup() -> (Window, VulkanContext) {
    let window = Window::new("orbit_render lifecycle test", WIDTH, HEIGHT).expect("window");
    let context = VulkanContext::new(&window, "orbit_render tests", (0, 1, 0), false).expect("context");
    (window, context)
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

#[test]
#[ignore = "needs a Vulkan device and a display"]
fn staging_upload_round_trip() {
    let (_window, context) = setup();
    let mut pool = GpuAllocator::from_context(&context).unwrap();
    let mut staging = StagingEngine::new(&context).unwrap();

    let info = vk::BufferCreateInfo::builder()
        .size(4096)
        .usage(vk::BufferUsageFlags::TRANSFER_DST)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .build();
    let target = pool.allocate_buffer(&info, MemoryPolicy::CpuToGpu).unwrap();
    let data = pattern(1000);

    staging.upload_buffer(&mut pool, &data, &target, 512).unwrap();
    assert_eq!(pool.read_buffer(&target, 512, data.len()).unwrap(), data);

    // Same upload again leaves the same bytes
    staging.upload_buffer(&mut pool, &data, &target, 512).unwrap();
    assert_eq!(pool.read_buffer(&target, 512, data.len()).unwrap(), data);

    // Staging buffers never outlive their upload
    assert_eq!(pool.live_allocation_count(), 1);

    assert!(staging.upload_buffer(&mut pool, &data, &target, 4000).is_err());
    assert_eq!(pool.live_allocation_count(), 1);

    assert!(pool.free_buffer(&target));
    assert!(!pool.free_buffer(&target));
    assert_eq!(pool.backend_allocation_count(), 0);
    pool.teardown();
}

#[test]
#[ignore = "needs a Vulkan device and a display"]
fn unsupported_transition_is_rejected() {
    let (_window, context) = setup();
    let mut pool = GpuAllocator::from_context(&context).unwrap();
    let mut staging = StagingEngine::new(&context).unwrap();

    let info = vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .extent(vk::Extent3D { width: 4, height: 4, depth: 1 })
        .mip_levels(1)
        .array_layers(1)
        .format(vk::Format::R8G8B8A8_UNORM)
        .tiling(vk::ImageTiling::OPTIMAL)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .samples(vk::SampleCountFlags::TYPE_1)
        .build();
    let image = pool.allocate_image(&info, MemoryPolicy::GpuOnly).unwrap();

    let result = staging.transition_image_layout(
        image.handle(),
        vk::Format::R8G8B8A8_UNORM,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::PRESENT_SRC_KHR,
    );
    assert!(matches!(result, Err(VulkanError::UnsupportedTransition { .. })));

    staging
        .transition_image_layout(
            image.handle(),
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();

    pool.teardown();
}

#[test]
#[ignore = "needs a Vulkan device and a display"]
fn swapchain_views_and_framebuffers_match_images() {
    let (window, context) = setup();
    let mut swapchain = Swapchain::new(&context);
    assert_eq!(swapchain.state(), SwapchainState::Uninitialized);

    assert!(swapchain.create(&window, 0, HEIGHT).is_err());
    assert_eq!(swapchain.state(), SwapchainState::Uninitialized);

    let (width, height) = window.get_framebuffer_size();
    swapchain.create(&window, width, height).unwrap();
    assert_eq!(swapchain.state(), SwapchainState::Created);

    let count = swapchain.image_count();
    assert!(count >= 2);
    assert_eq!(swapchain.image_views().len(), count);
    assert!(swapchain.image_view(count - 1).is_some());
    assert!(swapchain.image_view(count).is_none());

    let render_pass = RenderPass::new_color_pass(context.device().clone(), swapchain.format().format).unwrap();
    let framebuffers = Framebuffers::new(
        context.device().clone(),
        render_pass.handle(),
        swapchain.image_views(),
        swapchain.extent(),
    )
    .unwrap();
    assert_eq!(framebuffers.len(), count);

    // A zero size never reaches the driver
    assert!(swapchain.recreate(0, 0).is_err());
    assert_eq!(swapchain.state(), SwapchainState::Created);

    drop(framebuffers);
    drop(render_pass);
    context.wait_idle().unwrap();
    swapchain.recreate(width, height).unwrap();
    assert_eq!(swapchain.image_views().len(), swapchain.image_count());

    swapchain.destroy();
    assert_eq!(swapchain.state(), SwapchainState::Destroyed);
    swapchain.destroy();
}

#[test]
#[ignore = "needs a Vulkan device, a display and compiled shaders"]
fn renders_one_frame_of_a_quad() {
    let config = RendererConfig::new("orbit_render e2e").with_window_size(WIDTH, HEIGHT);
    let mut window = Window::new(&config.window.title, WIDTH, HEIGHT).unwrap();
    let mut renderer = Renderer::on_create(&mut window, &config).unwrap();

    let quad = MeshData::quad();
    assert_eq!((quad.vertices.len(), quad.indices.len()), (4, 6));
    renderer.load_model(&[quad]).unwrap();

    let image_count = renderer.swapchain().image_count();
    let frame = renderer.frame_resources().unwrap();
    assert_eq!(frame.framebuffer_count(), image_count);
    assert_eq!(frame.descriptor_set_count(), image_count);
    assert_eq!(frame.uniform_buffer_count(), image_count);

    window.poll_events();
    match renderer.on_draw().unwrap() {
        FrameStatus::Presented { image_index } => {
            assert!((image_index as usize) < image_count);
            assert!(renderer.last_frame_time() > std::time::Duration::ZERO);
        }
        FrameStatus::SwapchainOutOfDate => renderer.on_resize(&mut window).unwrap(),
    }

    renderer.on_destroy();
}

#[test]
#[ignore = "needs a Vulkan device, a display and compiled shaders"]
fn resize_rebuilds_frame_resources() {
    let config = RendererConfig::new("orbit_render resize").with_window_size(WIDTH, HEIGHT);
    let mut window = Window::new(&config.window.title, WIDTH, HEIGHT).unwrap();
    let mut renderer = Renderer::on_create(&mut window, &config).unwrap();
    renderer.load_model(&[MeshData::quad()]).unwrap();

    // Twice in a row, as after a rebuild that had to be retried
    renderer.on_resize(&mut window).unwrap();
    renderer.on_resize(&mut window).unwrap();
    assert_eq!(renderer.swapchain().state(), SwapchainState::Created);

    let image_count = renderer.swapchain().image_count();
    assert_eq!(renderer.frame_resources().unwrap().framebuffer_count(), image_count);

    window.poll_events();
    if let FrameStatus::Presented { image_index } = renderer.on_draw().unwrap() {
        assert!((image_index as usize) < image_count);
    }

    renderer.on_destroy();
}
