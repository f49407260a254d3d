// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_preview::{binder::BinderConfig, provider::LensFacing};

/// Camera lens selection.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum LensSetting {
    /// Camera facing the user
    Front,
    /// Camera facing away from the user
    Back,
}

impl From<LensSetting> for LensFacing {
    fn from(lens: LensSetting) -> Self {
        match lens {
            LensSetting::Front => LensFacing::Front,
            LensSetting::Back => LensFacing::Back,
        }
    }
}

/// Command-line arguments for EdgeFirst Camera Preview.
///
/// Without `--simulate` the tool prints the buffer-to-surface transform for
/// the given buffer, crop, surface and rotation. With `--simulate` it also
/// runs a preview session against simulated camera and display services,
/// rotating the display through `--rotations`. Arguments can be specified via
/// command line or environment variables.
///
/// # Example
///
/// ```bash
/// # Transform for a 4:3 sensor on a landscape display
/// edgefirst-preview --surface-size 1920 1080 --rotation 1
///
/// # Simulated session using the front camera
/// export LENS=front
/// edgefirst-preview --simulate --rotations 1 2 3 0
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Display surface size in pixels (width height)
    #[arg(
        long,
        env = "SURFACE_SIZE",
        default_value = "1080 1920",
        value_delimiter = ' ',
        num_args = 2
    )]
    pub surface_size: Vec<u32>,

    /// Camera buffer size in pixels (width height)
    #[arg(
        long,
        env = "BUFFER_SIZE",
        default_value = "640 480",
        value_delimiter = ' ',
        num_args = 2
    )]
    pub buffer_size: Vec<u32>,

    /// Crop rectangle within the camera buffer (x y width height), defaults
    /// to the full buffer
    #[arg(long, env = "CROP", value_delimiter = ' ', num_args = 4)]
    pub crop: Vec<i32>,

    /// Display rotation code (0, 1, 2 or 3)
    #[arg(long, env = "ROTATION", default_value = "0")]
    pub rotation: i32,

    /// Sensor mounting orientation in degrees (0, 90, 180 or 270)
    #[arg(long, env = "SENSOR_ROTATION", default_value = "90")]
    pub sensor_rotation: i32,

    /// Flip the camera image horizontally
    #[arg(long, env = "MIRROR")]
    pub mirror: bool,

    /// Preferred camera lens, the other lens is used as a fallback
    #[arg(long, env = "LENS", default_value = "back", value_enum)]
    pub lens: LensSetting,

    /// Run a preview session against simulated camera and display services
    #[arg(long, env = "SIMULATE")]
    pub simulate: bool,

    /// Display rotation codes applied in turn during the simulated session
    #[arg(long, default_value = "1 2 3 0", value_delimiter = ' ', num_args = 1..)]
    pub rotations: Vec<i32>,

    /// Frames rendered after each rotation of the simulated session
    #[arg(long, env = "FRAMES", default_value = "30")]
    pub frames: u32,

    /// Number of frames averaged by the frame rate recorder
    #[arg(long, env = "FPS_WINDOW", default_value = "30")]
    pub fps_window: usize,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable Tokio async runtime console for debugging
    #[arg(long, env = "TOKIO_CONSOLE")]
    pub tokio_console: bool,

    /// Enable Tracy profiler for performance analysis
    #[arg(long, env = "TRACY")]
    pub tracy: bool,
}

impl From<&Args> for BinderConfig {
    fn from(args: &Args) -> Self {
        BinderConfig {
            preferred_lens: args.lens.into(),
            fps_window: args.fps_window,
            ..BinderConfig::default()
        }
    }
}
