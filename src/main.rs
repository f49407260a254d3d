// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::Args;
use clap::Parser;
use edgefirst_preview::{
    aspect::{aspect_ratios_match, AspectRatio},
    binder::{BinderConfig, CameraBinder, CameraBindingState, LifecycleEvent, PreviewEvent},
    geometry::{normalize_rotation, rectangle_to_vertices, Rect, Rectangle, Rotation, Size},
    provider::{DisplayMonitor, LensFacing, TransformationInfo},
    renderer::buffer_to_surface,
    sim::{
        relative_rotation, SimulatedCamera, SimulatedCameraConfig, SimulatedDisplay,
        SimulatedSurface,
    },
};
use serde_json::json;
use std::{error::Error, sync::Arc, time::Duration};
use tokio::{sync::broadcast, time::timeout};
use tracing::{debug, info, warn};
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, Layer, Registry};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);
const FRAME_INTERVAL_NS: i64 = 33_333_333;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(&args)?;

    let report = transform_report(&args)?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if args.simulate {
        simulate(&args).await?;
    }

    Ok(())
}

fn init_tracing(args: &Args) -> Result<(), Box<dyn Error>> {
    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let console = args.tokio_console.then(console_subscriber::spawn::<Registry>);
    let stdout_log = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(level);
    let journald = tracing_journald::layer()
        .ok()
        .map(|layer| layer.with_filter(level));
    let tracy = if args.tracy {
        tracy_client::Client::start();
        Some(tracing_tracy::TracyLayer::default().with_filter(LevelFilter::TRACE))
    } else {
        None
    };

    let subscriber = tracing_subscriber::registry()
        .with(console)
        .with(stdout_log)
        .with(journald)
        .with(tracy);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;

    Ok(())
}

fn transform_report(args: &Args) -> Result<serde_json::Value, Box<dyn Error>> {
    let buffer = Size::new(args.buffer_size[0], args.buffer_size[1]);
    let surface = Size::new(args.surface_size[0], args.surface_size[1]);
    let crop = match args.crop.as_slice() {
        [x, y, width, height] => Rect::new(*x, *y, *width, *height),
        _ => Rect::from_size(buffer),
    };

    let display_rotation = normalize_rotation(args.rotation)?;
    let sensor = Rotation::from_degrees(args.sensor_rotation)?;
    let lens = LensFacing::from(args.lens);
    let info = TransformationInfo {
        crop,
        rotation: relative_rotation(sensor, display_rotation, lens),
        mirrored: args.mirror,
    };

    let matrix = buffer_to_surface(&info, &Rectangle::from_size(surface))?;
    let corners = matrix.map_vertices(&rectangle_to_vertices(&Rectangle::from(crop)));

    // The crop is compared as it appears once rotated upright.
    let upright = if info.rotation.is_90_or_270() {
        crop.size().swapped()
    } else {
        crop.size()
    };

    Ok(json!({
        "buffer": [buffer.width, buffer.height],
        "crop": [crop.x, crop.y, crop.width, crop.height],
        "surface": [surface.width, surface.height],
        "lens": lens.to_string(),
        "stream_aspect_ratio": AspectRatio::from_size(surface).to_string(),
        "aspect_ratio_matches": aspect_ratios_match(upright, false, surface, true),
        "rotation": info.rotation.degrees(),
        "mirrored": info.mirrored,
        "matrix": matrix.to_array(),
        "mat4": matrix.to_mat4(),
        "corners": corners.iter().map(|p| [p.x, p.y]).collect::<Vec<_>>(),
    }))
}

async fn simulate(args: &Args) -> Result<(), Box<dyn Error>> {
    let surface_size = Size::new(args.surface_size[0], args.surface_size[1]);
    let camera = Arc::new(SimulatedCamera::new(SimulatedCameraConfig {
        sensor_orientation: Rotation::from_degrees(args.sensor_rotation)?,
        ..SimulatedCameraConfig::default()
    }));
    let display = Arc::new(SimulatedDisplay::new(0, surface_size, args.rotation));
    let surface = Arc::new(SimulatedSurface::new(surface_size));

    let binder = CameraBinder::spawn(
        BinderConfig::from(args),
        camera.clone(),
        display.clone(),
        surface.clone(),
    );
    let mut events = binder.subscribe();

    binder.handle(LifecycleEvent::Create).await?;
    binder.initialize().await?;
    let state = timeout(
        EVENT_TIMEOUT,
        binder.wait_for(CameraBindingState::is_settled),
    )
    .await??;
    info!(?state, "camera binding settled");

    if state.is_bound() {
        let mut timestamp_ns = 0;
        render_frames(&binder, &mut events, args.frames, &mut timestamp_ns).await?;

        for &code in &args.rotations {
            let metrics = display.set_rotation(code);
            surface.set_size(metrics);
            display.notify(display.display_id());

            match next_bind_event(&mut events).await? {
                PreviewEvent::Bound {
                    generation,
                    facing,
                    aspect_ratio,
                    rotation,
                } => info!(
                    generation,
                    %facing,
                    %aspect_ratio,
                    %rotation,
                    %metrics,
                    "rebound after display rotation"
                ),
                PreviewEvent::BindFailed { generation, error } => {
                    warn!(generation, %error, code, "rebind after display rotation failed")
                }
                PreviewEvent::FrameRendered(_) => {}
            }
            if let Some(matrix) = surface.last_transform() {
                info!(%matrix, "surface transform");
            }

            render_frames(&binder, &mut events, args.frames, &mut timestamp_ns).await?;
        }
    } else {
        warn!(?state, "camera did not bind");
    }

    binder.handle(LifecycleEvent::Destroy).await?;
    info!(
        state = ?binder.state(),
        acquisitions = camera.acquisitions(),
        binds = camera.handle().binds().len(),
        transforms = surface.transforms().len(),
        "simulation finished"
    );

    Ok(())
}

async fn next_bind_event(
    events: &mut broadcast::Receiver<PreviewEvent>,
) -> Result<PreviewEvent, Box<dyn Error>> {
    loop {
        match timeout(EVENT_TIMEOUT, events.recv()).await? {
            Ok(event @ (PreviewEvent::Bound { .. } | PreviewEvent::BindFailed { .. })) => {
                return Ok(event)
            }
            Ok(PreviewEvent::FrameRendered(_)) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "preview events lagged")
            }
            Err(err) => return Err(err.into()),
        }
    }
}

async fn render_frames(
    binder: &CameraBinder,
    events: &mut broadcast::Receiver<PreviewEvent>,
    frames: u32,
    timestamp_ns: &mut i64,
) -> Result<(), Box<dyn Error>> {
    if frames == 0 {
        return Ok(());
    }
    for _ in 0..frames {
        *timestamp_ns += FRAME_INTERVAL_NS;
        binder.frame_available(*timestamp_ns).await?;
    }

    let last = *timestamp_ns;
    loop {
        match timeout(EVENT_TIMEOUT, events.recv()).await {
            Ok(Ok(PreviewEvent::FrameRendered(frame))) if frame.timestamp_ns == last => {
                match frame.fps {
                    Some(fps) => info!("preview frame rate {:.1} fps", fps),
                    None => debug!("not enough frames for a frame rate"),
                }
                return Ok(());
            }
            Ok(Ok(_)) => {}
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                debug!(skipped, "preview events lagged")
            }
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => {
                warn!("frames were not rendered");
                return Ok(());
            }
        }
    }
}
