// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Camera binding coordinator.
//!
//! [`CameraBinder`] acquires the camera capability asynchronously, selects a
//! lens, binds a preview stream sized for the current display and rebinds it
//! whenever the display rotates or the layout changes. Teardown is
//! deterministic and runs on every destroy path.
//!
//! All mutable state lives in a single task which consumes one command queue.
//! Host calls, acquisition completions and display notifications (which may
//! arrive on any thread) are posted into that queue, so state is never
//! touched concurrently and no lock is held. Failures inside the task are
//! never raised into host code: they are logged and surfaced through
//! [`CameraBinder::state`] and the [`PreviewEvent`] channel.
//!
//! # Example
//!
//! ```no_run
//! use edgefirst_preview::{
//!     binder::{BinderConfig, CameraBinder, CameraBindingState},
//!     geometry::Size,
//!     sim::{SimulatedCamera, SimulatedCameraConfig, SimulatedDisplay, SimulatedSurface},
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let camera = Arc::new(SimulatedCamera::new(SimulatedCameraConfig::default()));
//! let display = Arc::new(SimulatedDisplay::new(0, Size::new(1080, 1920), 0));
//! let surface = Arc::new(SimulatedSurface::new(Size::new(1080, 1920)));
//!
//! let binder = CameraBinder::spawn(BinderConfig::default(), camera, display, surface);
//! binder.on_lifecycle_create().await?;
//! binder.initialize().await?;
//! let state = binder.wait_for(|s| s.is_bound()).await?;
//! assert!(matches!(state, CameraBindingState::Bound(_)));
//! binder.on_lifecycle_destroy().await?;
//! # Ok(())
//! # }
//! ```

use crate::{
    aspect::AspectRatio,
    geometry::{normalize_rotation, Rotation},
    provider::{
        BindError, CameraProvider, DisplayId, DisplayMonitor, LensFacing, LifecycleScope,
        ListenerId, ProviderError, ProviderHandle, RenderSurface, StreamHandle, StreamSpec,
    },
    renderer::{PreviewRenderer, RenderedFrame},
};
use kanal::{AsyncReceiver, AsyncSender};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, oneshot, watch};
use tracing::{debug, error, info, instrument, warn};

/// Why the binder gave up on the camera.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// Acquiring the camera provider failed, `initialize` may be retried
    ProviderUnavailable,
    /// Neither lens is present, unrecoverable for this session
    NoCameraAvailable,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum CameraBindingState {
    #[default]
    Uninitialized,
    Acquiring,
    Bound(LensFacing),
    Failed(FailureReason),
    TornDown,
}

impl CameraBindingState {
    /// Transition table of the binder.
    pub fn can_transition_to(&self, next: &CameraBindingState) -> bool {
        use CameraBindingState::*;
        matches!(
            (self, next),
            (Uninitialized, Acquiring)
                | (Acquiring, Bound(_))
                | (Acquiring, Failed(_))
                | (Bound(_), Bound(_))
                | (Failed(FailureReason::ProviderUnavailable), Acquiring)
                | (Uninitialized | Acquiring | Bound(_) | Failed(_), TornDown)
        )
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, CameraBindingState::Bound(_))
    }

    /// True once the state can no longer change without caller action.
    pub fn is_settled(&self) -> bool {
        !matches!(
            self,
            CameraBindingState::Uninitialized | CameraBindingState::Acquiring
        )
    }
}

/// Errors returned by [`CameraBinder`] operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error("camera binding is not initialized")]
    NotInitialized,
    #[error("camera binding is already initialized")]
    AlreadyInitialized,
    #[error("camera provider is unavailable")]
    ProviderUnavailable,
    #[error("back and front cameras are unavailable")]
    NoCameraAvailable,
    #[error("camera binding has been torn down")]
    TornDown,
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error("camera binder task has stopped")]
    Closed,
}

/// Events published by the binder.
#[derive(Clone, Debug, PartialEq)]
pub enum PreviewEvent {
    Bound {
        generation: u64,
        facing: LensFacing,
        aspect_ratio: AspectRatio,
        rotation: Rotation,
    },
    BindFailed {
        generation: u64,
        error: BindError,
    },
    FrameRendered(RenderedFrame),
}

/// Host lifecycle events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    Create,
    ConfigurationChanged,
    Destroy,
}

#[derive(Clone, Debug)]
pub struct BinderConfig {
    /// Lens tried first, the other lens is the fallback
    pub preferred_lens: LensFacing,
    /// Frames averaged by the frame rate recorder
    pub fps_window: usize,
    /// Events buffered per subscriber before lagging
    pub event_capacity: usize,
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self {
            preferred_lens: LensFacing::Back,
            fps_window: 30,
            event_capacity: 64,
        }
    }
}

/// Camera stream owned by the binder while bound.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraHandle {
    generation: u64,
    facing: LensFacing,
    stream: StreamHandle,
}

impl CameraHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn facing(&self) -> LensFacing {
        self.facing
    }

    pub fn stream(&self) -> &StreamHandle {
        &self.stream
    }
}

/// Picks the preferred lens, falling back to the other one.
///
/// A lens whose information cannot be read counts as absent.
pub fn select_lens(
    capability: &dyn ProviderHandle,
    preferred: LensFacing,
) -> Result<LensFacing, BindingError> {
    [preferred, preferred.other()]
        .into_iter()
        .find(|facing| match capability.has_camera(*facing) {
            Ok(present) => present,
            Err(err) => {
                warn!(%facing, %err, "camera information unavailable");
                false
            }
        })
        .ok_or(BindingError::NoCameraAvailable)
}

enum Command {
    Initialize(oneshot::Sender<Result<(), BindingError>>),
    ProviderReady {
        epoch: u64,
        result: Result<Arc<dyn ProviderHandle>, ProviderError>,
    },
    Rebind(oneshot::Sender<Result<(), BindingError>>),
    DisplayChanged(DisplayId),
    Create(oneshot::Sender<()>),
    Destroy(oneshot::Sender<()>),
    FrameAvailable(i64),
    LastError(oneshot::Sender<Option<BindError>>),
    CurrentCamera(oneshot::Sender<Option<CameraHandle>>),
    Shutdown,
}

struct Shared {
    commands: AsyncSender<Command>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        // The task holds its own sender, so it has to be told to stop.
        let _ = self.commands.try_send(Command::Shutdown);
    }
}

/// Handle to the camera binding task.
///
/// Cheap to clone. The task releases the camera and stops once the last
/// handle is dropped.
#[derive(Clone)]
pub struct CameraBinder {
    shared: Arc<Shared>,
    state: watch::Receiver<CameraBindingState>,
    events: broadcast::Sender<PreviewEvent>,
}

impl CameraBinder {
    /// Spawns the binder task on the current tokio runtime.
    pub fn spawn(
        config: BinderConfig,
        provider: Arc<dyn CameraProvider>,
        display: Arc<dyn DisplayMonitor>,
        surface: Arc<dyn RenderSurface>,
    ) -> Self {
        let (tx, rx) = kanal::unbounded_async();
        let (state_tx, state_rx) = watch::channel(CameraBindingState::Uninitialized);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let task = BinderTask {
            renderer: PreviewRenderer::new(surface, config.fps_window),
            config,
            provider,
            display,
            commands: tx.clone(),
            state: state_tx,
            events: events.clone(),
            scope: LifecycleScope::new(),
            capability: None,
            lens: None,
            camera: None,
            listener: None,
            epoch: 0,
            generation: 0,
            last_error: None,
        };
        tokio::spawn(task.run(rx));

        Self {
            shared: Arc::new(Shared { commands: tx }),
            state: state_rx,
            events,
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, BindingError> {
        let (tx, rx) = oneshot::channel();
        self.shared
            .commands
            .send(command(tx))
            .await
            .map_err(|_| BindingError::Closed)?;
        rx.await.map_err(|_| BindingError::Closed)
    }

    /// Starts acquiring the camera. Returns once the request is queued; the
    /// outcome is observed through [`CameraBinder::state`].
    pub async fn initialize(&self) -> Result<(), BindingError> {
        self.request(Command::Initialize).await?
    }

    /// Releases the current stream and binds a new one for the current
    /// display metrics and rotation.
    pub async fn rebind(&self) -> Result<(), BindingError> {
        self.request(Command::Rebind).await?
    }

    pub async fn on_host_rotation_or_layout_changed(&self) -> Result<(), BindingError> {
        self.rebind().await
    }

    pub async fn on_configuration_changed(&self) -> Result<(), BindingError> {
        self.rebind().await
    }

    /// Registers for display change notifications.
    pub async fn on_lifecycle_create(&self) -> Result<(), BindingError> {
        self.request(Command::Create).await
    }

    /// Unregisters notifications, releases the camera and tears down.
    /// Idempotent.
    pub async fn on_lifecycle_destroy(&self) -> Result<(), BindingError> {
        self.request(Command::Destroy).await
    }

    pub async fn handle(&self, event: LifecycleEvent) -> Result<(), BindingError> {
        match event {
            LifecycleEvent::Create => self.on_lifecycle_create().await,
            LifecycleEvent::ConfigurationChanged => self.on_configuration_changed().await,
            LifecycleEvent::Destroy => self.on_lifecycle_destroy().await,
        }
    }

    /// Notifies the binder that a new camera frame is ready to draw.
    pub async fn frame_available(&self, timestamp_ns: i64) -> Result<(), BindingError> {
        self.shared
            .commands
            .send(Command::FrameAvailable(timestamp_ns))
            .await
            .map_err(|_| BindingError::Closed)
    }

    /// Most recent bind failure, cleared by the next successful bind.
    pub async fn last_bind_error(&self) -> Result<Option<BindError>, BindingError> {
        self.request(Command::LastError).await
    }

    /// The camera stream currently bound, if any.
    pub async fn camera(&self) -> Result<Option<CameraHandle>, BindingError> {
        self.request(Command::CurrentCamera).await
    }

    pub fn state(&self) -> CameraBindingState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<CameraBindingState> {
        self.state.clone()
    }

    /// Waits until the state satisfies `predicate` and returns it.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&CameraBindingState) -> bool,
    ) -> Result<CameraBindingState, BindingError> {
        let mut state = self.state.clone();
        let result = state
            .wait_for(predicate)
            .await
            .map(|state| *state)
            .map_err(|_| BindingError::Closed);
        result
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PreviewEvent> {
        self.events.subscribe()
    }
}

struct BinderTask {
    config: BinderConfig,
    provider: Arc<dyn CameraProvider>,
    display: Arc<dyn DisplayMonitor>,
    renderer: PreviewRenderer,
    commands: AsyncSender<Command>,
    state: watch::Sender<CameraBindingState>,
    events: broadcast::Sender<PreviewEvent>,
    scope: LifecycleScope,
    capability: Option<Arc<dyn ProviderHandle>>,
    lens: Option<LensFacing>,
    camera: Option<CameraHandle>,
    listener: Option<ListenerId>,
    /// Bumped by every acquisition and by teardown so late results are dropped
    epoch: u64,
    /// Bumped by every rebind
    generation: u64,
    last_error: Option<BindError>,
}

impl BinderTask {
    async fn run(mut self, commands: AsyncReceiver<Command>) {
        while let Ok(command) = commands.recv().await {
            match command {
                Command::Initialize(reply) => {
                    let _ = reply.send(self.initialize());
                }
                Command::ProviderReady { epoch, result } => self.on_provider_ready(epoch, result),
                Command::Rebind(reply) => {
                    let _ = reply.send(self.rebind());
                }
                Command::DisplayChanged(display_id) => self.on_display_changed(display_id),
                Command::Create(reply) => {
                    self.on_create();
                    let _ = reply.send(());
                }
                Command::Destroy(reply) => {
                    self.on_destroy();
                    let _ = reply.send(());
                }
                Command::FrameAvailable(timestamp_ns) => self.on_frame(timestamp_ns),
                Command::LastError(reply) => {
                    let _ = reply.send(self.last_error.clone());
                }
                Command::CurrentCamera(reply) => {
                    let _ = reply.send(self.camera.clone());
                }
                Command::Shutdown => break,
            }
        }
        self.on_destroy();
        debug!("camera binder stopped");
    }

    fn current(&self) -> CameraBindingState {
        *self.state.borrow()
    }

    fn transition(&mut self, next: CameraBindingState) -> bool {
        let current = self.current();
        if current == next {
            return true;
        }
        if !current.can_transition_to(&next) {
            warn!(?current, ?next, "rejected camera binding state transition");
            return false;
        }
        debug!(?current, ?next, "camera binding state transition");
        self.state.send_replace(next);
        true
    }

    #[instrument(skip(self))]
    fn initialize(&mut self) -> Result<(), BindingError> {
        match self.current() {
            CameraBindingState::Uninitialized
            | CameraBindingState::Failed(FailureReason::ProviderUnavailable) => {}
            CameraBindingState::Acquiring | CameraBindingState::Bound(_) => {
                return Err(BindingError::AlreadyInitialized)
            }
            CameraBindingState::Failed(FailureReason::NoCameraAvailable) => {
                return Err(BindingError::NoCameraAvailable)
            }
            CameraBindingState::TornDown => return Err(BindingError::TornDown),
        }

        if !self.transition(CameraBindingState::Acquiring) {
            return Err(BindingError::AlreadyInitialized);
        }
        self.epoch += 1;
        let epoch = self.epoch;
        let provider = self.provider.clone();
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let result = provider.acquire().await;
            // Fails only once the binder has stopped, the result is unused then.
            let _ = commands
                .send(Command::ProviderReady { epoch, result })
                .await;
        });
        debug!(epoch, "camera provider requested");
        Ok(())
    }

    fn on_provider_ready(
        &mut self,
        epoch: u64,
        result: Result<Arc<dyn ProviderHandle>, ProviderError>,
    ) {
        if epoch != self.epoch || self.current() != CameraBindingState::Acquiring {
            debug!(epoch, current = self.epoch, "discarding stale camera provider");
            return;
        }

        let capability = match result {
            Ok(capability) => capability,
            Err(err) => {
                error!(%err, "camera initialization failed");
                let failed =
                    self.transition(CameraBindingState::Failed(FailureReason::ProviderUnavailable));
                debug_assert!(failed, "acquisition results are only handled while acquiring");
                return;
            }
        };

        match select_lens(capability.as_ref(), self.config.preferred_lens) {
            Ok(facing) => {
                info!(%facing, "camera lens selected");
                self.lens = Some(facing);
            }
            Err(err) => {
                error!(%err, "no usable camera");
                let failed =
                    self.transition(CameraBindingState::Failed(FailureReason::NoCameraAvailable));
                debug_assert!(failed, "acquisition results are only handled while acquiring");
                return;
            }
        }
        self.capability = Some(capability);

        if let Err(err) = self.rebind() {
            debug!(%err, "initial bind did not complete");
        }
    }

    #[instrument(skip(self))]
    fn rebind(&mut self) -> Result<(), BindingError> {
        if !matches!(
            self.current(),
            CameraBindingState::Acquiring | CameraBindingState::Bound(_)
        ) {
            return Err(BindingError::NotInitialized);
        }
        let (Some(capability), Some(facing)) = (self.capability.clone(), self.lens) else {
            return Err(BindingError::NotInitialized);
        };

        self.generation += 1;
        let generation = self.generation;

        let metrics = self.display.current_metrics();
        let aspect_ratio = AspectRatio::from_size(metrics);
        let rotation = match normalize_rotation(self.display.current_rotation_code()) {
            Ok(rotation) => rotation,
            Err(err) => return Err(self.bind_failed(generation, err.into())),
        };
        debug!(%metrics, %aspect_ratio, %rotation, generation, "rebinding camera");

        self.release_camera(capability.as_ref());

        let spec = StreamSpec {
            aspect_ratio,
            target_rotation: rotation,
            surface: self.renderer.surface_provider(),
        };
        match capability.bind(&self.scope, facing, &spec) {
            Ok(stream) => {
                if !self.transition(CameraBindingState::Bound(facing)) {
                    capability.unbind_all();
                    return Err(BindingError::NotInitialized);
                }
                info!(
                    %facing,
                    %aspect_ratio,
                    %rotation,
                    stream = stream.id,
                    resolution = %stream.resolution,
                    "camera stream bound"
                );
                self.renderer.invalidate_surface(rotation);
                self.renderer.attach_stream(&stream);
                self.camera = Some(CameraHandle {
                    generation,
                    facing,
                    stream,
                });
                self.last_error = None;
                let _ = self.events.send(PreviewEvent::Bound {
                    generation,
                    facing,
                    aspect_ratio,
                    rotation,
                });
                Ok(())
            }
            Err(err) => Err(self.bind_failed(generation, err)),
        }
    }

    fn bind_failed(&mut self, generation: u64, err: BindError) -> BindingError {
        warn!(%err, generation, "use case binding failed");
        self.last_error = Some(err.clone());
        let _ = self.events.send(PreviewEvent::BindFailed {
            generation,
            error: err.clone(),
        });
        BindingError::Bind(err)
    }

    fn release_camera(&mut self, capability: &dyn ProviderHandle) {
        if let Some(camera) = self.camera.take() {
            debug!(
                generation = camera.generation,
                stream = camera.stream.id,
                "releasing camera stream"
            );
        }
        capability.unbind_all();
        self.renderer.detach_stream();
    }

    fn on_display_changed(&mut self, display_id: DisplayId) {
        if self.listener.is_none() || display_id != self.display.display_id() {
            return;
        }
        match normalize_rotation(self.display.current_rotation_code()) {
            Ok(rotation) => self.renderer.invalidate_surface(rotation),
            Err(err) => warn!(%err, display_id, "display reported an invalid rotation"),
        }
        if let Err(err) = self.rebind() {
            debug!(%err, "rebind after display change skipped");
        }
    }

    fn on_create(&mut self) {
        if self.current() == CameraBindingState::TornDown {
            warn!("lifecycle create after teardown ignored");
            return;
        }
        if self.listener.is_some() {
            return;
        }
        let commands = self.commands.clone();
        let id = self.display.register_listener(Arc::new(move |display_id| {
            // Called on the display service's thread.
            let _ = commands.try_send(Command::DisplayChanged(display_id));
        }));
        self.listener = Some(id);
        debug!(listener = id, "display listener registered");
    }

    fn on_destroy(&mut self) {
        if let Some(id) = self.listener.take() {
            self.display.unregister_listener(id);
            debug!(listener = id, "display listener unregistered");
        }
        if let Some(capability) = self.capability.take() {
            self.release_camera(capability.as_ref());
        }
        self.camera = None;
        self.renderer.shutdown();
        self.scope.close();
        self.epoch += 1;
        if self.current() != CameraBindingState::TornDown {
            let torn_down = self.transition(CameraBindingState::TornDown);
            debug_assert!(torn_down, "every live state can be torn down");
            info!("camera binding torn down");
        }
    }

    fn on_frame(&mut self, timestamp_ns: i64) {
        if let Some(frame) = self.renderer.render_frame(timestamp_ns) {
            let _ = self.events.send(PreviewEvent::FrameRendered(frame));
        }
    }
}
