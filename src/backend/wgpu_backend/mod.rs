//! wgpu backend implementation
//!
//! Headless device plus texture-backed render targets. Readback copies the
//! texture into a staging buffer, maps it and strips the row padding wgpu
//! requires for buffer copies.

use std::sync::mpsc;
use std::sync::Arc;

use crate::backend::memory::{decode_colors, decode_float16};
use crate::backend::traits::*;
use crate::backend::types::*;

fn to_wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
    }
}

/// Align a row pitch to `COPY_BYTES_PER_ROW_ALIGNMENT`.
fn padded_bytes_per_row(tight: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    tight.div_ceil(align) * align
}

/// Shared wgpu device and queue
pub struct WgpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
}

impl WgpuContext {
    /// Create a device without a surface.
    pub fn new_headless() -> BackendResult<Arc<Self>> {
        pollster::block_on(Self::new_headless_async())
    }

    pub async fn new_headless_async() -> BackendResult<Arc<Self>> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("No adapter found".into()))?;

        let adapter_name = adapter.get_info().name;
        log::info!("Using adapter: {}", adapter_name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Capture Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

        Ok(Arc::new(Self {
            device,
            queue,
            adapter_name,
        }))
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn create_texture(
        &self,
        label: &str,
        width: u32,
        height: u32,
        layers: u32,
        format: TextureFormat,
    ) -> BackendResult<wgpu::Texture> {
        if width == 0 || height == 0 {
            return Err(BackendError::TargetCreationFailed(format!(
                "{}: {}x{} is empty",
                label, width, height
            )));
        }
        Ok(self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: to_wgpu_format(format),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        }))
    }

    fn write_layer(
        &self,
        texture: &wgpu::Texture,
        layer: u32,
        size: (u32, u32),
        format: TextureFormat,
        data: &[u8],
    ) -> BackendResult<()> {
        let (width, height) = size;
        let tight = width * format.bytes_per_pixel();
        let expected = (tight * height) as usize;
        if data.len() != expected {
            return Err(BackendError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: layer,
                },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(tight),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    /// Copy one layer into a tightly packed CPU buffer.
    ///
    /// `Flushing` waits for the whole queue to drain. `Fast` only polls for
    /// the copy's own submission and fails if the mapping is not ready yet.
    fn read_layer(
        &self,
        texture: &wgpu::Texture,
        layer: u32,
        size: (u32, u32),
        format: TextureFormat,
        mode: ReadbackMode,
    ) -> BackendResult<Vec<u8>> {
        let (width, height) = size;
        let tight = width * format.bytes_per_pixel();
        let padded = padded_bytes_per_row(tight);

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Capture Readback Staging"),
            size: padded as wgpu::BufferAddress * height as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Capture Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: layer,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        let submission = self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        match mode {
            ReadbackMode::Flushing => {
                let _ = self.device.poll(wgpu::Maintain::Wait);
            }
            ReadbackMode::Fast => {
                let _ = self
                    .device
                    .poll(wgpu::Maintain::WaitForSubmissionIndex(submission));
            }
        }

        let mapped = match mode {
            ReadbackMode::Flushing => receiver.recv().map_err(|_| BackendError::DeviceLost)?,
            ReadbackMode::Fast => receiver.try_recv().map_err(|_| {
                BackendError::ReadbackFailed("staging buffer not mapped yet".into())
            })?,
        };
        mapped.map_err(|e| BackendError::ReadbackFailed(e.to_string()))?;

        let data = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((tight * height) as usize);
        for row in data.chunks_exact(padded as usize) {
            pixels.extend_from_slice(&row[..tight as usize]);
        }
        drop(data);
        staging.unmap();

        Ok(pixels)
    }
}

/// 2D render target backed by a wgpu texture
pub struct WgpuRenderTarget2D {
    context: Arc<WgpuContext>,
    texture: wgpu::Texture,
    label: String,
    width: u32,
    height: u32,
    format: TextureFormat,
}

impl WgpuRenderTarget2D {
    pub fn new(
        context: Arc<WgpuContext>,
        label: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> BackendResult<Self> {
        let texture = context.create_texture(label, width, height, 1, format)?;
        Ok(Self {
            context,
            texture,
            label: label.to_string(),
            width,
            height,
            format,
        })
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }
}

impl RenderTarget2D for WgpuRenderTarget2D {
    fn label(&self) -> &str {
        &self.label
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn read_pixels(&self, mode: ReadbackMode) -> BackendResult<Vec<Color>> {
        let bytes = self
            .context
            .read_layer(&self.texture, 0, self.size(), self.format, mode)?;
        Ok(decode_colors(self.format, &bytes))
    }

    fn read_float16_pixels(&self) -> BackendResult<Vec<Float16Color>> {
        let bytes = self.context.read_layer(
            &self.texture,
            0,
            self.size(),
            self.format,
            ReadbackMode::Flushing,
        )?;
        Ok(decode_float16(self.format, &bytes))
    }

    fn write_pixels(&self, data: &[u8]) -> BackendResult<()> {
        self.context
            .write_layer(&self.texture, 0, self.size(), self.format, data)
    }
}

/// Cube render target backed by a six-layer wgpu texture
pub struct WgpuRenderTargetCube {
    context: Arc<WgpuContext>,
    texture: wgpu::Texture,
    label: String,
    face_size: u32,
    format: TextureFormat,
}

impl WgpuRenderTargetCube {
    pub fn new(
        context: Arc<WgpuContext>,
        label: &str,
        face_size: u32,
        format: TextureFormat,
    ) -> BackendResult<Self> {
        let layers = CubeFace::ALL.len() as u32;
        let texture = context.create_texture(label, face_size, face_size, layers, format)?;
        Ok(Self {
            context,
            texture,
            label: label.to_string(),
            face_size,
            format,
        })
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }
}

impl RenderTargetCube for WgpuRenderTargetCube {
    fn label(&self) -> &str {
        &self.label
    }

    fn face_size(&self) -> u32 {
        self.face_size
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn read_face(&self, face: CubeFace) -> BackendResult<Vec<u8>> {
        self.context.read_layer(
            &self.texture,
            face.layer(),
            (self.face_size, self.face_size),
            self.format,
            ReadbackMode::Flushing,
        )
    }

    fn write_face(&self, face: CubeFace, data: &[u8]) -> BackendResult<()> {
        self.context.write_layer(
            &self.texture,
            face.layer(),
            (self.face_size, self.face_size),
            self.format,
            data,
        )
    }
}
