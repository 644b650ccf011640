//! Interop surface textures.

use crate::pipeline::Extent;

/// A texture both pipelines can use: the display side renders into it and
/// samples it, the compute side binds it as a storage texture.
///
/// Created with `STORAGE_BINDING | TEXTURE_BINDING | RENDER_ATTACHMENT |
/// COPY_SRC | COPY_DST` so it can also be read back or uploaded to when a
/// partition is composited on another device.
#[derive(Clone)]
pub struct InteropTexture {
    /// The underlying GPU texture.
    pub texture: wgpu::Texture,
    /// A default full-texture view.
    pub view: wgpu::TextureView,
    /// Texture size in pixels.
    pub extent: Extent,
}

impl InteropTexture {
    /// Create an interop texture with the given extent and format.
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        extent: Extent,
        format: wgpu::TextureFormat,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent_3d(extent),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            extent,
        }
    }
}

/// Single-layer [`wgpu::Extent3d`] for `extent`.
#[must_use]
pub fn extent_3d(extent: Extent) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: extent.width,
        height: extent.height,
        depth_or_array_layers: 1,
    }
}

/// Bytes per row of an RGBA8 copy of `width` pixels, padded to
/// [`wgpu::COPY_BYTES_PER_ROW_ALIGNMENT`].
#[must_use]
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(1), 256);
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(640), 2560);
    }
}
