// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_preview::{
    aspect::AspectRatio,
    binder::{
        select_lens, BinderConfig, BindingError, CameraBinder, CameraBindingState,
        FailureReason, LifecycleEvent, PreviewEvent,
    },
    geometry::{AffineMatrix, GeometryError, Point, Rotation, Size},
    provider::{BindError, LensFacing},
    sim::{SimulatedCamera, SimulatedCameraConfig, SimulatedDisplay, SimulatedSurface},
};
use std::{error::Error, sync::Arc, time::Duration};
use tokio::{
    sync::broadcast::{self, error::TryRecvError},
    time::{sleep, timeout},
};

const TIMEOUT: Duration = Duration::from_secs(5);
const PORTRAIT: Size = Size::new(1080, 1920);

struct Fixture {
    camera: Arc<SimulatedCamera>,
    display: Arc<SimulatedDisplay>,
    surface: Arc<SimulatedSurface>,
    binder: CameraBinder,
}

fn fixture(camera: SimulatedCameraConfig, config: BinderConfig) -> Fixture {
    let camera = Arc::new(SimulatedCamera::new(camera));
    let display = Arc::new(SimulatedDisplay::new(0, PORTRAIT, 0));
    let surface = Arc::new(SimulatedSurface::new(PORTRAIT));
    let binder = CameraBinder::spawn(config, camera.clone(), display.clone(), surface.clone());
    Fixture {
        camera,
        display,
        surface,
        binder,
    }
}

async fn settle(binder: &CameraBinder) -> Result<CameraBindingState, Box<dyn Error>> {
    Ok(timeout(TIMEOUT, binder.wait_for(CameraBindingState::is_settled)).await??)
}

async fn next_event(
    events: &mut broadcast::Receiver<PreviewEvent>,
) -> Result<PreviewEvent, Box<dyn Error>> {
    Ok(timeout(TIMEOUT, events.recv()).await??)
}

#[tokio::test]
async fn test_bind_preferred_lens() -> Result<(), Box<dyn Error>> {
    let f = fixture(SimulatedCameraConfig::default(), BinderConfig::default());
    let mut events = f.binder.subscribe();

    f.binder.handle(LifecycleEvent::Create).await?;
    f.binder.initialize().await?;
    assert_eq!(settle(&f.binder).await?, CameraBindingState::Bound(LensFacing::Back));

    assert_eq!(
        next_event(&mut events).await?,
        PreviewEvent::Bound {
            generation: 1,
            facing: LensFacing::Back,
            aspect_ratio: AspectRatio::Ratio16x9,
            rotation: Rotation::Rotation0,
        }
    );

    let binds = f.camera.handle().binds();
    assert_eq!(binds.len(), 1);
    assert_eq!(binds[0].spec.aspect_ratio, AspectRatio::Ratio16x9);
    assert_eq!(binds[0].spec.target_rotation, Rotation::Rotation0);

    let camera = f.binder.camera().await?.ok_or("no camera bound")?;
    assert_eq!(camera.generation(), 1);
    assert_eq!(camera.facing(), LensFacing::Back);
    assert_eq!(camera.stream().resolution, Size::new(1280, 720));
    assert_eq!(f.surface.attached_stream().as_ref(), Some(camera.stream()));

    // A landscape sensor buffer fills the portrait surface rotated 90 degrees
    let matrix = f.surface.last_transform().ok_or("no transform")?;
    let corner = matrix.map_point(Point::new(0.0, 0.0));
    assert!((corner.x - 1080.0).abs() < 1e-3 && corner.y.abs() < 1e-3);

    assert_eq!(f.binder.initialize().await, Err(BindingError::AlreadyInitialized));
    Ok(())
}

#[tokio::test]
async fn test_lens_fallback() -> Result<(), Box<dyn Error>> {
    let f = fixture(
        SimulatedCameraConfig {
            back: false,
            ..SimulatedCameraConfig::default()
        },
        BinderConfig::default(),
    );
    f.binder.initialize().await?;
    assert_eq!(settle(&f.binder).await?, CameraBindingState::Bound(LensFacing::Front));

    let stream = f.camera.handle().active_stream().ok_or("no active stream")?;
    assert!(stream.transformation.mirrored);
    Ok(())
}

#[test]
fn test_select_lens() {
    let both = SimulatedCamera::new(SimulatedCameraConfig::default());
    assert_eq!(select_lens(&*both.handle(), LensFacing::Front), Ok(LensFacing::Front));
    assert_eq!(select_lens(&*both.handle(), LensFacing::Back), Ok(LensFacing::Back));

    let back_only = SimulatedCamera::new(SimulatedCameraConfig {
        front: false,
        ..SimulatedCameraConfig::default()
    });
    assert_eq!(
        select_lens(&*back_only.handle(), LensFacing::Front),
        Ok(LensFacing::Back)
    );

    let none = SimulatedCamera::new(SimulatedCameraConfig {
        front: false,
        back: false,
        ..SimulatedCameraConfig::default()
    });
    assert_eq!(
        select_lens(&*none.handle(), LensFacing::Back),
        Err(BindingError::NoCameraAvailable)
    );

    // Unreadable camera information counts as absent
    let unreadable = SimulatedCamera::new(SimulatedCameraConfig {
        info_unavailable: true,
        ..SimulatedCameraConfig::default()
    });
    assert_eq!(
        select_lens(&*unreadable.handle(), LensFacing::Back),
        Err(BindingError::NoCameraAvailable)
    );
}

#[tokio::test]
async fn test_no_camera_available() -> Result<(), Box<dyn Error>> {
    let f = fixture(
        SimulatedCameraConfig {
            front: false,
            back: false,
            ..SimulatedCameraConfig::default()
        },
        BinderConfig::default(),
    );
    f.binder.initialize().await?;
    assert_eq!(
        settle(&f.binder).await?,
        CameraBindingState::Failed(FailureReason::NoCameraAvailable)
    );
    assert!(f.camera.handle().binds().is_empty());
    assert_eq!(f.binder.initialize().await, Err(BindingError::NoCameraAvailable));
    assert_eq!(f.binder.rebind().await, Err(BindingError::NotInitialized));
    Ok(())
}

#[tokio::test]
async fn test_provider_unavailable() -> Result<(), Box<dyn Error>> {
    let f = fixture(
        SimulatedCameraConfig {
            fail_acquire: true,
            ..SimulatedCameraConfig::default()
        },
        BinderConfig::default(),
    );
    assert_eq!(f.binder.rebind().await, Err(BindingError::NotInitialized));

    f.binder.initialize().await?;
    assert_eq!(
        settle(&f.binder).await?,
        CameraBindingState::Failed(FailureReason::ProviderUnavailable)
    );
    assert_eq!(f.binder.rebind().await, Err(BindingError::NotInitialized));
    assert!(f.camera.handle().binds().is_empty());
    assert_eq!(f.binder.camera().await?, None);

    // Initialization may be retried
    f.binder.initialize().await?;
    assert_eq!(
        settle(&f.binder).await?,
        CameraBindingState::Failed(FailureReason::ProviderUnavailable)
    );
    assert_eq!(f.camera.acquisitions(), 2);

    // and succeeds once the camera service is back
    f.camera.set_fail_acquire(false);
    f.binder.initialize().await?;
    assert_eq!(settle(&f.binder).await?, CameraBindingState::Bound(LensFacing::Back));
    assert_eq!(f.camera.acquisitions(), 3);
    assert_eq!(f.camera.handle().binds().len(), 1);
    assert!(f.binder.camera().await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_state_is_committed_before_events() -> Result<(), Box<dyn Error>> {
    let f = fixture(SimulatedCameraConfig::default(), BinderConfig::default());
    let mut events = f.binder.subscribe();
    f.binder.initialize().await?;

    assert!(matches!(
        next_event(&mut events).await?,
        PreviewEvent::Bound { .. }
    ));
    assert_eq!(f.binder.state(), CameraBindingState::Bound(LensFacing::Back));

    f.binder.rebind().await?;
    match next_event(&mut events).await? {
        PreviewEvent::Bound { generation, .. } => assert_eq!(generation, 2),
        event => panic!("unexpected event {:?}", event),
    }
    assert_eq!(f.binder.state(), CameraBindingState::Bound(LensFacing::Back));

    // Torn down bindings never report a bound stream again
    f.binder.on_lifecycle_destroy().await?;
    assert_eq!(f.binder.rebind().await, Err(BindingError::NotInitialized));
    assert_eq!(f.binder.camera().await?, None);
    assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
    Ok(())
}

#[test]
fn test_transition_table() {
    use CameraBindingState::*;
    let back = Bound(LensFacing::Back);
    let front = Bound(LensFacing::Front);

    assert!(Uninitialized.can_transition_to(&Acquiring));
    assert!(Acquiring.can_transition_to(&back));
    assert!(back.can_transition_to(&front));
    assert!(Failed(FailureReason::ProviderUnavailable).can_transition_to(&Acquiring));
    assert!(back.can_transition_to(&TornDown));

    assert!(!Uninitialized.can_transition_to(&back));
    assert!(!Failed(FailureReason::NoCameraAvailable).can_transition_to(&Acquiring));
    assert!(!Failed(FailureReason::ProviderUnavailable).can_transition_to(&back));
    assert!(!TornDown.can_transition_to(&back));
    assert!(!TornDown.can_transition_to(&Acquiring));
    assert!(!back.can_transition_to(&Acquiring));
}

#[tokio::test]
async fn test_bind_failure_is_published() -> Result<(), Box<dyn Error>> {
    let f = fixture(
        SimulatedCameraConfig {
            failing_binds: 1,
            ..SimulatedCameraConfig::default()
        },
        BinderConfig::default(),
    );
    let mut events = f.binder.subscribe();
    f.binder.initialize().await?;

    match next_event(&mut events).await? {
        PreviewEvent::BindFailed { generation, error } => {
            assert_eq!(generation, 1);
            assert!(matches!(error, BindError::Rejected(_)));
        }
        event => panic!("unexpected event {:?}", event),
    }
    assert_eq!(f.binder.state(), CameraBindingState::Acquiring);
    assert!(matches!(
        f.binder.last_bind_error().await?,
        Some(BindError::Rejected(_))
    ));

    // The next rebind tries again
    f.binder.rebind().await?;
    assert_eq!(f.binder.state(), CameraBindingState::Bound(LensFacing::Back));
    assert_eq!(f.binder.last_bind_error().await?, None);

    // A failed rebind releases the stream but keeps the state
    f.camera.handle().fail_next_binds(1);
    let result = f.binder.rebind().await;
    assert!(matches!(
        result,
        Err(BindingError::Bind(BindError::Rejected(_)))
    ));
    assert_eq!(f.binder.state(), CameraBindingState::Bound(LensFacing::Back));
    assert_eq!(f.binder.camera().await?, None);
    assert_eq!(f.surface.attached_stream(), None);

    let generations: Vec<u64> = std::iter::from_fn(|| match events.try_recv() {
        Ok(PreviewEvent::Bound { generation, .. }) => Some(generation),
        Ok(PreviewEvent::BindFailed { generation, .. }) => Some(generation),
        _ => None,
    })
    .collect();
    assert_eq!(generations, vec![2, 3]);
    Ok(())
}

#[tokio::test]
async fn test_invalid_rotation_fails_rebind() -> Result<(), Box<dyn Error>> {
    let f = fixture(SimulatedCameraConfig::default(), BinderConfig::default());
    f.binder.initialize().await?;
    settle(&f.binder).await?;

    f.display.set_rotation(5);
    assert_eq!(
        f.binder.rebind().await,
        Err(BindingError::Bind(BindError::Geometry(
            GeometryError::InvalidRotation(5)
        )))
    );
    // The current stream is kept when the request cannot be built
    assert!(f.binder.camera().await?.is_some());
    assert_eq!(f.camera.handle().binds().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_destroy_during_acquisition() -> Result<(), Box<dyn Error>> {
    let f = fixture(
        SimulatedCameraConfig {
            acquire_delay: Duration::from_millis(100),
            ..SimulatedCameraConfig::default()
        },
        BinderConfig::default(),
    );
    f.binder.handle(LifecycleEvent::Create).await?;
    f.binder.initialize().await?;
    assert_eq!(f.binder.state(), CameraBindingState::Acquiring);

    f.binder.handle(LifecycleEvent::Destroy).await?;
    assert_eq!(f.binder.state(), CameraBindingState::TornDown);

    // The late acquisition result is discarded
    sleep(Duration::from_millis(300)).await;
    assert_eq!(f.camera.acquisitions(), 1);
    assert_eq!(f.binder.state(), CameraBindingState::TornDown);
    assert!(f.camera.handle().binds().is_empty());
    assert_eq!(f.binder.camera().await?, None);
    assert_eq!(f.binder.initialize().await, Err(BindingError::TornDown));
    assert_eq!(f.binder.rebind().await, Err(BindingError::NotInitialized));
    Ok(())
}

#[tokio::test]
async fn test_destroy_is_idempotent() -> Result<(), Box<dyn Error>> {
    let f = fixture(SimulatedCameraConfig::default(), BinderConfig::default());
    f.binder.on_lifecycle_create().await?;
    f.binder.on_lifecycle_create().await?;
    assert_eq!(f.display.listener_count(), 1);

    f.binder.initialize().await?;
    settle(&f.binder).await?;
    let unbinds = f.camera.handle().unbind_count();

    f.binder.on_lifecycle_destroy().await?;
    assert_eq!(f.binder.state(), CameraBindingState::TornDown);
    assert_eq!(f.display.listener_count(), 0);
    assert_eq!(f.camera.handle().active_stream(), None);
    assert_eq!(f.camera.handle().unbind_count(), unbinds + 1);
    assert!(f.surface.is_shutdown());

    f.binder.on_lifecycle_destroy().await?;
    assert_eq!(f.binder.state(), CameraBindingState::TornDown);
    assert_eq!(f.camera.handle().unbind_count(), unbinds + 1);

    // Registering again after teardown is ignored
    f.binder.on_lifecycle_create().await?;
    assert_eq!(f.display.listener_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_rotation_from_display_thread() -> Result<(), Box<dyn Error>> {
    let f = fixture(SimulatedCameraConfig::default(), BinderConfig::default());
    f.binder.on_lifecycle_create().await?;
    f.binder.initialize().await?;
    settle(&f.binder).await?;
    let mut events = f.binder.subscribe();

    let metrics = f.display.set_rotation(1);
    assert_eq!(metrics, Size::new(1920, 1080));
    f.surface.set_size(metrics);
    f.display
        .notify(0)
        .join()
        .map_err(|_| "display thread panicked")?;

    assert_eq!(
        next_event(&mut events).await?,
        PreviewEvent::Bound {
            generation: 2,
            facing: LensFacing::Back,
            aspect_ratio: AspectRatio::Ratio16x9,
            rotation: Rotation::Rotation90,
        }
    );

    let binds = f.camera.handle().binds();
    assert_eq!(binds.len(), 2);
    assert_eq!(binds[1].spec.target_rotation, Rotation::Rotation90);

    // Sensor and display rotations cancel out, the buffer is only scaled
    let matrix = f.surface.last_transform().ok_or("no transform")?;
    assert!(
        matrix.approx_eq(&AffineMatrix::scale_translate(1.5, 1.5, 0.0, 0.0), 1e-4),
        "{}",
        matrix
    );

    // Changes to other displays are ignored
    f.display
        .notify(7)
        .join()
        .map_err(|_| "display thread panicked")?;
    f.binder.last_bind_error().await?;
    assert_eq!(f.camera.handle().binds().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_no_notifications_before_create() -> Result<(), Box<dyn Error>> {
    let f = fixture(SimulatedCameraConfig::default(), BinderConfig::default());
    f.binder.initialize().await?;
    settle(&f.binder).await?;

    assert_eq!(f.display.listener_count(), 0);
    f.display
        .rotate(1)
        .join()
        .map_err(|_| "display thread panicked")?;
    f.binder.last_bind_error().await?;
    assert_eq!(f.camera.handle().binds().len(), 1);

    // Explicit host notification still rebinds
    f.binder.on_host_rotation_or_layout_changed().await?;
    assert_eq!(f.camera.handle().binds().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_frames() -> Result<(), Box<dyn Error>> {
    let f = fixture(
        SimulatedCameraConfig::default(),
        BinderConfig {
            fps_window: 2,
            ..BinderConfig::default()
        },
    );
    let mut events = f.binder.subscribe();

    // Nothing to draw before a stream is bound
    f.binder.frame_available(0).await?;
    f.binder.last_bind_error().await?;
    assert_eq!(events.try_recv(), Err(TryRecvError::Empty));

    f.binder.initialize().await?;
    settle(&f.binder).await?;
    assert!(matches!(
        next_event(&mut events).await?,
        PreviewEvent::Bound { .. }
    ));

    let mut rates = Vec::new();
    for timestamp_ns in [0, 33_333_333, 66_666_666] {
        f.binder.frame_available(timestamp_ns).await?;
        match next_event(&mut events).await? {
            PreviewEvent::FrameRendered(frame) => {
                assert_eq!(frame.timestamp_ns, timestamp_ns);
                rates.push(frame.fps);
            }
            event => panic!("unexpected event {:?}", event),
        }
    }
    assert_eq!(rates[0], None);
    assert_eq!(rates[1], None);
    let fps = rates[2].ok_or("no frame rate")?;
    assert!((fps - 30.0).abs() < 0.01, "{}", fps);
    Ok(())
}

#[tokio::test]
async fn test_dropping_binder_releases_camera() -> Result<(), Box<dyn Error>> {
    let f = fixture(SimulatedCameraConfig::default(), BinderConfig::default());
    f.binder.on_lifecycle_create().await?;
    f.binder.initialize().await?;
    settle(&f.binder).await?;

    let mut state = f.binder.watch_state();
    drop(f.binder);
    timeout(
        TIMEOUT,
        state.wait_for(|s| *s == CameraBindingState::TornDown),
    )
    .await??;

    assert!(f.surface.is_shutdown());
    assert_eq!(f.display.listener_count(), 0);
    assert_eq!(f.camera.handle().active_stream(), None);
    Ok(())
}
