// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # EdgeFirst Camera Preview Library
//!
//! This library renders a live camera feed into a host provided surface,
//! upright and scaled regardless of device rotation, sensor orientation and
//! surface aspect ratio, and manages the lifecycle of the camera resource
//! feeding it.
//!
//! ## Features
//!
//! - **Geometry**: Affine buffer-to-surface transforms under 90 degree
//!   rotations and non-matching aspect ratios.
//! - **Aspect Ratio Matching**: Rounding tolerant aspect ratio comparison and
//!   4:3 / 16:9 stream ratio selection.
//! - **Camera Binding**: Asynchronous camera acquisition, lens selection and
//!   rebinding on rotation or layout changes, with deterministic teardown.
//! - **Simulation**: Software camera, display and surface capabilities for
//!   running the pipeline without hardware.
//!
//! ## Example
//!
//! ```
//! use edgefirst_preview::geometry::{compute_transform, Point, Rectangle, Rotation};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Landscape sensor buffer shown on a portrait surface
//! let buffer = Rectangle::new(0.0, 0.0, 640.0, 480.0);
//! let surface = Rectangle::new(0.0, 0.0, 1080.0, 1440.0);
//! let matrix = compute_transform(&buffer, &surface, Rotation::Rotation90)?;
//!
//! // The buffer's top-left corner lands on the surface's top-right corner
//! let corner = matrix.map_point(Point::new(0.0, 0.0));
//! assert!((corner.x - 1080.0).abs() < 1e-3);
//! assert!(corner.y.abs() < 1e-3);
//! # Ok(())
//! # }
//! ```

pub mod aspect;
pub mod binder;
pub mod fps;
pub mod geometry;
pub mod provider;
pub mod renderer;
pub mod sim;
