// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Capabilities consumed by the camera binder.
//!
//! The binder never talks to camera hardware, the display service or the GPU
//! directly. Hosts provide implementations of [`CameraProvider`],
//! [`DisplayMonitor`] and [`RenderSurface`]; [`crate::sim`] provides software
//! implementations for testing.

use crate::{
    aspect::AspectRatio,
    geometry::{AffineMatrix, GeometryError, Rect, Rotation, Size},
};
use async_trait::async_trait;
use core::fmt;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use thiserror::Error;

/// Which physical camera a stream is sourced from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LensFacing {
    Front,
    Back,
}

impl LensFacing {
    pub fn other(self) -> Self {
        match self {
            LensFacing::Front => LensFacing::Back,
            LensFacing::Back => LensFacing::Front,
        }
    }
}

impl fmt::Display for LensFacing {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LensFacing::Front => write!(f, "front"),
            LensFacing::Back => write!(f, "back"),
        }
    }
}

/// How a camera buffer relates to the requested target orientation.
///
/// Produced by the camera capability when a stream is negotiated.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TransformationInfo {
    /// Region of the buffer intended for display
    pub crop: Rect,
    /// Clockwise rotation needed to display the buffer upright
    pub rotation: Rotation,
    /// Buffer must be flipped horizontally, typical for front cameras
    pub mirrored: bool,
}

/// Token identifying the render surface a stream should be delivered to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SurfaceProvider {
    pub surface_id: u64,
}

/// Parameters of a stream bind request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamSpec {
    pub aspect_ratio: AspectRatio,
    pub target_rotation: Rotation,
    pub surface: SurfaceProvider,
}

/// A stream delivered by the camera capability after a successful bind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamHandle {
    pub id: u64,
    pub facing: LensFacing,
    pub resolution: Size,
    pub transformation: TransformationInfo,
}

static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

/// Host lifecycle a stream is bound to.
///
/// Closed when the host is destroyed, capabilities must refuse to bind to a
/// closed scope.
#[derive(Clone, Debug)]
pub struct LifecycleScope {
    id: u64,
    active: Arc<AtomicBool>,
}

impl LifecycleScope {
    pub fn new() -> Self {
        Self {
            id: NEXT_SCOPE.fetch_add(1, Ordering::Relaxed),
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn close(&self) {
        self.active.store(false, Ordering::Release);
    }
}

impl Default for LifecycleScope {
    fn default() -> Self {
        Self::new()
    }
}

pub type DisplayId = u32;
pub type ListenerId = u64;

/// Display change callback. May be invoked from any thread.
pub type DisplayListener = Arc<dyn Fn(DisplayId) + Send + Sync>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("camera provider unavailable: {0}")]
    Unavailable(String),
    #[error("camera information unavailable: {0}")]
    CapabilityUnavailable(String),
}

/// Reasons a stream bind is rejected. Binding failures are never fatal, the
/// next rebind tries again.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindError {
    #[error("stream bind rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error("lifecycle scope {0} is no longer active")]
    ScopeInactive(u64),
}

/// Asynchronous entry point to the camera subsystem.
#[async_trait]
pub trait CameraProvider: Send + Sync {
    async fn acquire(&self) -> Result<Arc<dyn ProviderHandle>, ProviderError>;
}

/// Camera capability returned by [`CameraProvider::acquire`].
pub trait ProviderHandle: Send + Sync {
    fn has_camera(&self, facing: LensFacing) -> Result<bool, ProviderError>;

    /// Releases every stream bound through this capability.
    fn unbind_all(&self);

    fn bind(
        &self,
        scope: &LifecycleScope,
        facing: LensFacing,
        spec: &StreamSpec,
    ) -> Result<StreamHandle, BindError>;
}

/// Display rotation and metrics service.
pub trait DisplayMonitor: Send + Sync {
    fn display_id(&self) -> DisplayId;

    /// Platform rotation code, expected to be one of 0, 1, 2 or 3.
    fn current_rotation_code(&self) -> i32;

    /// Window metrics in host pixels.
    fn current_metrics(&self) -> Size;

    fn register_listener(&self, listener: DisplayListener) -> ListenerId;

    fn unregister_listener(&self, id: ListenerId);
}

/// Output surface frames are drawn to.
pub trait RenderSurface: Send + Sync {
    fn surface_provider(&self) -> SurfaceProvider;

    /// Current surface size, `None` until the surface is laid out.
    fn surface_size(&self) -> Option<Size>;

    fn attach_stream(&self, stream: &StreamHandle);

    fn detach_stream(&self);

    fn set_transform(&self, matrix: &AffineMatrix);

    fn shutdown(&self);
}
