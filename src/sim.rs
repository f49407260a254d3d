// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Software implementations of the binder capabilities.
//!
//! Used by the command line simulation and by the tests, and useful to hosts
//! which want to exercise the binder without camera hardware.

use crate::{
    aspect::AspectRatio,
    geometry::{AffineMatrix, Rect, Rotation, Size},
    provider::{
        BindError, CameraProvider, DisplayId, DisplayListener, DisplayMonitor, LensFacing,
        LifecycleScope, ListenerId, ProviderError, ProviderHandle, RenderSurface, StreamHandle,
        StreamSpec, SurfaceProvider, TransformationInfo,
    },
};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::debug;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Rotation a buffer from a sensor mounted at `sensor` needs to appear upright
/// on a display rotated by `target`.
///
/// Front sensors face the user so the display rotation adds to the sensor
/// orientation instead of subtracting from it.
pub fn relative_rotation(sensor: Rotation, target: Rotation, facing: LensFacing) -> Rotation {
    match facing {
        LensFacing::Back => sensor.rotate_by(target.inverse()),
        LensFacing::Front => sensor.rotate_by(target),
    }
}

/// Buffer resolution a simulated sensor delivers for an aspect ratio.
pub fn stream_resolution(aspect_ratio: AspectRatio) -> Size {
    match aspect_ratio {
        AspectRatio::Ratio4x3 => Size::new(640, 480),
        AspectRatio::Ratio16x9 => Size::new(1280, 720),
    }
}

#[derive(Clone, Debug)]
pub struct SimulatedCameraConfig {
    pub front: bool,
    pub back: bool,
    /// Sensor mounting orientation relative to the device's natural orientation
    pub sensor_orientation: Rotation,
    pub acquire_delay: Duration,
    pub fail_acquire: bool,
    /// Camera information queries fail, as when the camera service restarts
    pub info_unavailable: bool,
    /// Number of binds rejected before binds succeed
    pub failing_binds: usize,
}

impl Default for SimulatedCameraConfig {
    fn default() -> Self {
        Self {
            front: true,
            back: true,
            sensor_orientation: Rotation::Rotation90,
            acquire_delay: Duration::ZERO,
            fail_acquire: false,
            info_unavailable: false,
            failing_binds: 0,
        }
    }
}

/// A bind request received by [`SimulatedCameraHandle`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindRecord {
    pub scope: u64,
    pub facing: LensFacing,
    pub spec: StreamSpec,
    pub result: Result<StreamHandle, BindError>,
}

/// Simulated camera provider.
pub struct SimulatedCamera {
    config: SimulatedCameraConfig,
    handle: Arc<SimulatedCameraHandle>,
    fail_acquire: AtomicBool,
    acquisitions: AtomicUsize,
}

impl SimulatedCamera {
    pub fn new(config: SimulatedCameraConfig) -> Self {
        Self {
            handle: Arc::new(SimulatedCameraHandle::new(config.clone())),
            fail_acquire: AtomicBool::new(config.fail_acquire),
            config,
            acquisitions: AtomicUsize::new(0),
        }
    }

    /// The capability handed out by [`CameraProvider::acquire`].
    pub fn handle(&self) -> Arc<SimulatedCameraHandle> {
        self.handle.clone()
    }

    /// Makes later acquisitions fail or succeed, as when the camera service
    /// stops or comes back.
    pub fn set_fail_acquire(&self, fail: bool) {
        self.fail_acquire.store(fail, Ordering::Release);
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::Acquire)
    }
}

#[async_trait]
impl CameraProvider for SimulatedCamera {
    async fn acquire(&self) -> Result<Arc<dyn ProviderHandle>, ProviderError> {
        self.acquisitions.fetch_add(1, Ordering::AcqRel);
        if !self.config.acquire_delay.is_zero() {
            tokio::time::sleep(self.config.acquire_delay).await;
        }
        if self.fail_acquire.load(Ordering::Acquire) {
            return Err(ProviderError::Unavailable(
                "simulated camera service is not running".to_string(),
            ));
        }
        Ok(self.handle.clone())
    }
}

/// Simulated camera capability.
pub struct SimulatedCameraHandle {
    config: SimulatedCameraConfig,
    failing_binds: AtomicUsize,
    unbinds: AtomicUsize,
    next_stream: AtomicU64,
    active: Mutex<Option<StreamHandle>>,
    binds: Mutex<Vec<BindRecord>>,
}

impl SimulatedCameraHandle {
    fn new(config: SimulatedCameraConfig) -> Self {
        Self {
            failing_binds: AtomicUsize::new(config.failing_binds),
            config,
            unbinds: AtomicUsize::new(0),
            next_stream: AtomicU64::new(1),
            active: Mutex::new(None),
            binds: Mutex::new(Vec::new()),
        }
    }

    /// Rejects the next `count` bind requests.
    pub fn fail_next_binds(&self, count: usize) {
        self.failing_binds.store(count, Ordering::Release);
    }

    pub fn active_stream(&self) -> Option<StreamHandle> {
        lock(&self.active).clone()
    }

    pub fn binds(&self) -> Vec<BindRecord> {
        lock(&self.binds).clone()
    }

    pub fn unbind_count(&self) -> usize {
        self.unbinds.load(Ordering::Acquire)
    }

    fn present(&self, facing: LensFacing) -> bool {
        match facing {
            LensFacing::Front => self.config.front,
            LensFacing::Back => self.config.back,
        }
    }

    fn negotiate(
        &self,
        scope: &LifecycleScope,
        facing: LensFacing,
        spec: &StreamSpec,
    ) -> Result<StreamHandle, BindError> {
        if !scope.is_active() {
            return Err(BindError::ScopeInactive(scope.id()));
        }
        if !self.present(facing) {
            return Err(BindError::Rejected(format!("no {facing} camera")));
        }
        let failing = self.failing_binds.load(Ordering::Acquire);
        if failing > 0 {
            self.failing_binds.store(failing - 1, Ordering::Release);
            return Err(BindError::Rejected("simulated bind failure".to_string()));
        }

        let resolution = stream_resolution(spec.aspect_ratio);
        Ok(StreamHandle {
            id: self.next_stream.fetch_add(1, Ordering::AcqRel),
            facing,
            resolution,
            transformation: TransformationInfo {
                crop: Rect::from_size(resolution),
                rotation: relative_rotation(
                    self.config.sensor_orientation,
                    spec.target_rotation,
                    facing,
                ),
                mirrored: facing == LensFacing::Front,
            },
        })
    }
}

impl ProviderHandle for SimulatedCameraHandle {
    fn has_camera(&self, facing: LensFacing) -> Result<bool, ProviderError> {
        if self.config.info_unavailable {
            return Err(ProviderError::CapabilityUnavailable(format!(
                "{facing} camera information"
            )));
        }
        Ok(self.present(facing))
    }

    fn unbind_all(&self) {
        self.unbinds.fetch_add(1, Ordering::AcqRel);
        if let Some(stream) = lock(&self.active).take() {
            debug!(stream = stream.id, "simulated stream unbound");
        }
    }

    fn bind(
        &self,
        scope: &LifecycleScope,
        facing: LensFacing,
        spec: &StreamSpec,
    ) -> Result<StreamHandle, BindError> {
        let result = self.negotiate(scope, facing, spec);
        if let Ok(stream) = &result {
            *lock(&self.active) = Some(stream.clone());
        }
        lock(&self.binds).push(BindRecord {
            scope: scope.id(),
            facing,
            spec: spec.clone(),
            result: result.clone(),
        });
        result
    }
}

/// Simulated display service.
pub struct SimulatedDisplay {
    id: DisplayId,
    rotation: AtomicI32,
    metrics: Mutex<Size>,
    listeners: Arc<Mutex<HashMap<ListenerId, DisplayListener>>>,
    next_listener: AtomicU64,
}

impl SimulatedDisplay {
    pub fn new(id: DisplayId, metrics: Size, rotation_code: i32) -> Self {
        Self {
            id,
            rotation: AtomicI32::new(rotation_code),
            metrics: Mutex::new(metrics),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Rotates the display without notifying listeners and returns the new
    /// window metrics. Width and height swap when the rotation changes
    /// between portrait and landscape.
    pub fn set_rotation(&self, rotation_code: i32) -> Size {
        let previous = self.rotation.swap(rotation_code, Ordering::AcqRel);
        let mut metrics = lock(&self.metrics);
        if previous.rem_euclid(2) != rotation_code.rem_euclid(2) {
            *metrics = metrics.swapped();
        }
        *metrics
    }

    pub fn set_metrics(&self, metrics: Size) {
        *lock(&self.metrics) = metrics;
    }

    /// Notifies listeners of a change to `display_id` from a separate thread,
    /// as a platform display service would.
    pub fn notify(&self, display_id: DisplayId) -> JoinHandle<()> {
        let listeners: Vec<DisplayListener> = lock(&self.listeners).values().cloned().collect();
        thread::spawn(move || {
            for listener in listeners {
                listener(display_id);
            }
        })
    }

    /// Rotates the display and notifies listeners.
    pub fn rotate(&self, rotation_code: i32) -> JoinHandle<()> {
        self.set_rotation(rotation_code);
        self.notify(self.id)
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }
}

impl DisplayMonitor for SimulatedDisplay {
    fn display_id(&self) -> DisplayId {
        self.id
    }

    fn current_rotation_code(&self) -> i32 {
        self.rotation.load(Ordering::Acquire)
    }

    fn current_metrics(&self) -> Size {
        *lock(&self.metrics)
    }

    fn register_listener(&self, listener: DisplayListener) -> ListenerId {
        let id = self.next_listener.fetch_add(1, Ordering::AcqRel);
        lock(&self.listeners).insert(id, listener);
        id
    }

    fn unregister_listener(&self, id: ListenerId) {
        lock(&self.listeners).remove(&id);
    }
}

static NEXT_SURFACE: AtomicU64 = AtomicU64::new(1);

/// Simulated render surface recording what the renderer pushes to it.
pub struct SimulatedSurface {
    id: u64,
    size: Mutex<Option<Size>>,
    stream: Mutex<Option<StreamHandle>>,
    transforms: Mutex<Vec<AffineMatrix>>,
    shutdown: AtomicBool,
}

impl SimulatedSurface {
    pub fn new(size: Size) -> Self {
        Self {
            id: NEXT_SURFACE.fetch_add(1, Ordering::Relaxed),
            size: Mutex::new(Some(size)),
            stream: Mutex::new(None),
            transforms: Mutex::new(Vec::new()),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Surface that has not been laid out yet.
    pub fn r#unsized() -> Self {
        let surface = Self::new(Size::default());
        *lock(&surface.size) = None;
        surface
    }

    pub fn set_size(&self, size: Size) {
        *lock(&self.size) = Some(size);
    }

    pub fn attached_stream(&self) -> Option<StreamHandle> {
        lock(&self.stream).clone()
    }

    pub fn transforms(&self) -> Vec<AffineMatrix> {
        lock(&self.transforms).clone()
    }

    pub fn last_transform(&self) -> Option<AffineMatrix> {
        lock(&self.transforms).last().copied()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

impl RenderSurface for SimulatedSurface {
    fn surface_provider(&self) -> SurfaceProvider {
        SurfaceProvider {
            surface_id: self.id,
        }
    }

    fn surface_size(&self) -> Option<Size> {
        *lock(&self.size)
    }

    fn attach_stream(&self, stream: &StreamHandle) {
        *lock(&self.stream) = Some(stream.clone());
    }

    fn detach_stream(&self) {
        lock(&self.stream).take();
    }

    fn set_transform(&self, matrix: &AffineMatrix) {
        lock(&self.transforms).push(*matrix);
    }

    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}
