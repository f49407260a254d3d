// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Aspect ratio comparison and stream aspect ratio selection.

use crate::geometry::Size;
use core::fmt;

pub const RATIO_4_3_VALUE: f64 = 4.0 / 3.0;
pub const RATIO_16_9_VALUE: f64 = 16.0 / 9.0;

/// Checks if two aspect ratios match while tolerating rounding error.
///
/// Crop rectangles derived from the same viewport are rounded to whole pixels
/// independently, so their ratios rarely compare equal. A 601x797 surface,
/// for example, never yields a crop with exactly the same ratio. Each rounded
/// coordinate is at most 0.5 away from its true value, so a rounded width or
/// height is at most 1.0 away. The true ratio of a rounded size therefore lies
/// within `[(w - 1) / (h + 1), (w + 1) / (h - 1)]` while an accurate size,
/// such as the surface the viewport is based on, has its exact ratio. The
/// ratios match when the two ranges overlap.
pub fn aspect_ratios_match(size1: Size, accurate1: bool, size2: Size, accurate2: bool) -> bool {
    let (lower1, upper1) = ratio_bounds(size1, accurate1);
    let (lower2, upper2) = ratio_bounds(size2, accurate2);
    upper1 >= lower2 && upper2 >= lower1
}

fn ratio_bounds(size: Size, accurate: bool) -> (f32, f32) {
    let width = size.width as f32;
    let height = size.height as f32;
    if accurate {
        let ratio = width / height;
        (ratio, ratio)
    } else {
        ((width - 1.0) / (height + 1.0), (width + 1.0) / (height - 1.0))
    }
}

/// Aspect ratio requested from the camera when binding a stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AspectRatio {
    /// 4:3, the native ratio of most sensors
    Ratio4x3,
    /// 16:9
    Ratio16x9,
}

impl AspectRatio {
    /// Picks the ratio closest to the given dimensions, independent of
    /// orientation. Ties resolve to 4:3.
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        let long = width.max(height) as f64;
        let short = width.min(height) as f64;
        let ratio = long / short;
        if (ratio - RATIO_4_3_VALUE).abs() <= (ratio - RATIO_16_9_VALUE).abs() {
            AspectRatio::Ratio4x3
        } else {
            AspectRatio::Ratio16x9
        }
    }

    pub fn from_size(size: Size) -> Self {
        Self::from_dimensions(size.width, size.height)
    }

    /// Long side over short side.
    pub fn value(self) -> f64 {
        match self {
            AspectRatio::Ratio4x3 => RATIO_4_3_VALUE,
            AspectRatio::Ratio16x9 => RATIO_16_9_VALUE,
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AspectRatio::Ratio4x3 => write!(f, "4:3"),
            AspectRatio::Ratio16x9 => write!(f, "16:9"),
        }
    }
}
