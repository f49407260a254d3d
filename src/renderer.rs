// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    aspect::aspect_ratios_match,
    fps::FpsRecorder,
    geometry::{
        center_fit, compute_transform, mirror_horizontally, AffineMatrix, GeometryError,
        Rectangle, Rotation, Size,
    },
    provider::{RenderSurface, StreamHandle, SurfaceProvider, TransformationInfo},
};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Frame drawn by the [`PreviewRenderer`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RenderedFrame {
    pub timestamp_ns: i64,
    /// Running average, `None` until the averaging window is full
    pub fps: Option<f64>,
}

/// Builds the matrix mapping the crop region of a camera buffer onto
/// `target`, rotated and mirrored as the stream requires.
///
/// The target is filled without distortion: when the crop and the target
/// disagree on aspect ratio the crop is narrowed to its centered region with
/// the target's ratio, seen in buffer orientation (center-crop).
pub fn buffer_to_surface(
    info: &TransformationInfo,
    target: &Rectangle,
) -> Result<AffineMatrix, GeometryError> {
    let crop = Rectangle::from(info.crop);
    let (width, height) = if info.rotation.is_90_or_270() {
        (target.height(), target.width())
    } else {
        (target.width(), target.height())
    };
    let viewport = Size::new(width.round() as u32, height.round() as u32);

    let source = if viewport.is_empty()
        || aspect_ratios_match(info.crop.size(), false, viewport, true)
    {
        crop
    } else {
        center_fit(&crop, width, height)
    };

    let matrix = compute_transform(&source, target, info.rotation)?;
    if info.mirrored {
        Ok(matrix.then(&mirror_horizontally(target)))
    } else {
        Ok(matrix)
    }
}

/// Drives a [`RenderSurface`] on behalf of the camera binder.
///
/// The buffer-to-surface matrix only changes when the stream, the surface
/// size or the surface rotation changes, so it is recomputed lazily and pushed
/// to the surface only while dirty.
///
/// Not thread-safe, the renderer is owned by the binder task.
pub struct PreviewRenderer {
    surface: Arc<dyn RenderSurface>,
    stream: Option<TransformationInfo>,
    surface_size: Option<Size>,
    surface_rotation: Rotation,
    transform: Option<AffineMatrix>,
    dirty: bool,
    fps: FpsRecorder,
    shutdown: bool,
}

impl PreviewRenderer {
    pub fn new(surface: Arc<dyn RenderSurface>, fps_window: usize) -> Self {
        let surface_size = surface.surface_size();
        Self {
            surface,
            stream: None,
            surface_size,
            surface_rotation: Rotation::Rotation0,
            transform: None,
            dirty: true,
            fps: FpsRecorder::new(fps_window),
            shutdown: false,
        }
    }

    pub fn surface_provider(&self) -> SurfaceProvider {
        self.surface.surface_provider()
    }

    pub fn attach_stream(&mut self, stream: &StreamHandle) {
        if self.shutdown {
            return;
        }
        if self.stream != Some(stream.transformation) {
            self.dirty = true;
        }
        self.stream = Some(stream.transformation);
        self.surface.attach_stream(stream);
        self.fps.reset();
        self.refresh_surface();
        self.update_transform();
    }

    pub fn detach_stream(&mut self) {
        if self.shutdown {
            return;
        }
        if self.stream.take().is_some() {
            self.surface.detach_stream();
            self.transform = None;
            self.dirty = true;
        }
    }

    /// Picks up a new surface size after a layout change.
    pub fn refresh_surface(&mut self) {
        let size = self.surface.surface_size();
        if size != self.surface_size {
            debug!(?size, "surface resized");
            self.dirty = true;
        }
        self.surface_size = size;
    }

    /// Records a display rotation change.
    pub fn invalidate_surface(&mut self, rotation: Rotation) {
        if self.shutdown {
            return;
        }
        if rotation != self.surface_rotation {
            self.dirty = true;
        }
        self.surface_rotation = rotation;
        self.refresh_surface();
    }

    /// Draws the latest frame, updating the transform first if needed.
    /// Returns `None` when there is nothing to draw to or from.
    pub fn render_frame(&mut self, timestamp_ns: i64) -> Option<RenderedFrame> {
        if self.shutdown || self.stream.is_none() || self.surface_size.is_none() {
            return None;
        }
        self.update_transform();
        let fps = self.fps.record_timestamp(timestamp_ns);
        trace!(timestamp_ns, ?fps, "frame rendered");
        Some(RenderedFrame { timestamp_ns, fps })
    }

    fn update_transform(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        let (Some(info), Some(size)) = (self.stream, self.surface_size) else {
            return false;
        };

        let target = Rectangle::from_size(size);
        match buffer_to_surface(&info, &target) {
            Ok(matrix) => {
                debug!(
                    crop = %info.crop,
                    rotation = %info.rotation,
                    mirrored = info.mirrored,
                    surface = %size,
                    surface_rotation = %self.surface_rotation,
                    %matrix,
                    "buffer to surface transform updated"
                );
                self.surface.set_transform(&matrix);
                self.transform = Some(matrix);
                self.dirty = false;
                true
            }
            Err(err) => {
                warn!(%err, crop = %info.crop, "cannot compute buffer to surface transform");
                false
            }
        }
    }

    /// The matrix last pushed to the surface.
    pub fn transform(&self) -> Option<AffineMatrix> {
        self.transform
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn surface_rotation(&self) -> Rotation {
        self.surface_rotation
    }

    /// Shuts the surface down. Every later call is ignored.
    pub fn shutdown(&mut self) {
        if self.shutdown {
            return;
        }
        self.detach_stream();
        self.surface.shutdown();
        self.shutdown = true;
        debug!("renderer shut down");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }
}
