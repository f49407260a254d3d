// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Buffer-to-surface geometry.
//!
//! Rectangles, quads and 2D affine matrices used to map camera buffer
//! coordinates onto a display surface. Transforms are composed through the
//! normalized square `(-1, -1) - (1, 1)`: the source is stretched onto the
//! square, rotated about the origin in 90 degree steps, then stretched onto the
//! target. Every stretch is scale-to-fill, X and Y are scaled independently so
//! aspect compensation must be done by the caller when choosing the source and
//! target rectangles.

use core::fmt;
use thiserror::Error;

/// Errors raised by geometry preconditions.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GeometryError {
    /// Rotation value outside of the supported set.
    #[error("invalid rotation value {0}")]
    InvalidRotation(i32),
    /// Source rectangle has no area so it cannot be stretched.
    #[error("source rectangle is empty")]
    EmptyRectangle,
}

/// The normalized space `(-1, -1) - (1, 1)`.
pub const NORMALIZED_RECT: Rectangle = Rectangle {
    left: -1.0,
    top: -1.0,
    right: 1.0,
    bottom: 1.0,
};

/// Clockwise rotation in 90 degree steps.
///
/// Mirrors the rotation set supported by display surfaces and camera
/// sensors, any other angle is rejected rather than rounded.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Rotation {
    /// No rotation (0 degrees)
    #[default]
    Rotation0 = 0,
    /// Rotate 90 degrees clockwise
    Rotation90 = 90,
    /// Rotate 180 degrees
    Rotation180 = 180,
    /// Rotate 270 degrees clockwise (90 degrees counter-clockwise)
    Rotation270 = 270,
}

impl Rotation {
    /// Parses an angle in degrees, only 0, 90, 180 and 270 are accepted.
    pub fn from_degrees(degrees: i32) -> Result<Self, GeometryError> {
        match degrees {
            0 => Ok(Rotation::Rotation0),
            90 => Ok(Rotation::Rotation90),
            180 => Ok(Rotation::Rotation180),
            270 => Ok(Rotation::Rotation270),
            _ => Err(GeometryError::InvalidRotation(degrees)),
        }
    }

    /// Converts a platform surface rotation code (0, 1, 2, 3) to a rotation.
    pub fn from_surface_code(code: i32) -> Result<Self, GeometryError> {
        match code {
            0..=3 => Ok(Self::from_quarter_turns(code)),
            _ => Err(GeometryError::InvalidRotation(code)),
        }
    }

    /// Rotation of `turns` clockwise quarter turns, wrapping in both
    /// directions.
    pub fn from_quarter_turns(turns: i32) -> Self {
        match turns.rem_euclid(4) {
            0 => Rotation::Rotation0,
            1 => Rotation::Rotation90,
            2 => Rotation::Rotation180,
            _ => Rotation::Rotation270,
        }
    }

    pub const fn degrees(self) -> i32 {
        self as i32
    }

    pub const fn quarter_turns(self) -> i32 {
        self.degrees() / 90
    }

    /// Returns true when the rotation swaps width and height.
    pub const fn is_90_or_270(self) -> bool {
        matches!(self, Rotation::Rotation90 | Rotation::Rotation270)
    }

    /// Adds another rotation to this one.
    pub fn rotate_by(self, other: Rotation) -> Self {
        Self::from_quarter_turns(self.quarter_turns() + other.quarter_turns())
    }

    /// The rotation that undoes this one.
    pub fn inverse(self) -> Self {
        Self::from_quarter_turns(-self.quarter_turns())
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Maps a platform rotation code `{0, 1, 2, 3}` to `{0, 90, 180, 270}`.
pub fn normalize_rotation(code: i32) -> Result<Rotation, GeometryError> {
    Rotation::from_surface_code(code)
}

/// Returns true for 90 or 270 degrees and false for 0 or 180 degrees.
pub fn is_90_or_270(degrees: i32) -> Result<bool, GeometryError> {
    Rotation::from_degrees(degrees).map(Rotation::is_90_or_270)
}

/// Width and height in pixels.
///
/// Sizes are expected to be positive, zero sized surfaces are never
/// negotiated with the camera.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// The same size with width and height exchanged.
    pub const fn swapped(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Integer pixel rectangle, as negotiated crop rectangles are expressed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    /// X coordinate of top-left corner
    pub x: i32,
    /// Y coordinate of top-left corner
    pub y: i32,
    /// Width of the rectangle in pixels
    pub width: i32,
    /// Height of the rectangle in pixels
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a full buffer of the given size.
    pub const fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width as i32, size.height as i32)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width.max(0) as u32, self.height.max(0) as u32)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Floating point rectangle defined by its edges.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Rectangle {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rectangle {
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle `(0, 0) - (width, height)`.
    pub fn from_size(size: Size) -> Self {
        Self::new(0.0, 0.0, size.width as f32, size.height as f32)
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }
}

impl From<Rect> for Rectangle {
    fn from(rect: Rect) -> Self {
        let left = rect.x as f32;
        let top = rect.y as f32;
        Rectangle::new(left, top, left + rect.width as f32, top + rect.height as f32)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Quad ordered top-left, top-right, bottom-right, bottom-left.
pub type Vertices = [Point; 4];

pub fn rectangle_to_vertices(rect: &Rectangle) -> Vertices {
    [
        Point::new(rect.left, rect.top),
        Point::new(rect.right, rect.top),
        Point::new(rect.right, rect.bottom),
        Point::new(rect.left, rect.bottom),
    ]
}

/// Bounding box of a quad. Lossy for rotated quads.
pub fn vertices_to_rectangle(vertices: &Vertices) -> Rectangle {
    let xs = vertices.map(|p| p.x);
    let ys = vertices.map(|p| p.y);
    Rectangle::new(min4(xs), min4(ys), max4(xs), max4(ys))
}

pub fn size_to_vertices(size: Size) -> Vertices {
    rectangle_to_vertices(&Rectangle::from_size(size))
}

fn min4(v: [f32; 4]) -> f32 {
    v[0].min(v[1]).min(v[2].min(v[3]))
}

fn max4(v: [f32; 4]) -> f32 {
    v[0].max(v[1]).max(v[2].max(v[3]))
}

/// 2D affine matrix.
///
/// A point is mapped as
///
/// ```text
/// x' = scale_x * x + skew_x * y + translate_x
/// y' = skew_y  * x + scale_y * y + translate_y
/// ```
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AffineMatrix {
    pub scale_x: f32,
    pub skew_x: f32,
    pub translate_x: f32,
    pub skew_y: f32,
    pub scale_y: f32,
    pub translate_y: f32,
}

impl Default for AffineMatrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl AffineMatrix {
    pub const IDENTITY: AffineMatrix = AffineMatrix {
        scale_x: 1.0,
        skew_x: 0.0,
        translate_x: 0.0,
        skew_y: 0.0,
        scale_y: 1.0,
        translate_y: 0.0,
    };

    pub const fn scale_translate(
        scale_x: f32,
        scale_y: f32,
        translate_x: f32,
        translate_y: f32,
    ) -> Self {
        Self {
            scale_x,
            skew_x: 0.0,
            translate_x,
            skew_y: 0.0,
            scale_y,
            translate_y,
        }
    }

    /// Clockwise rotation about the origin in y-down coordinates.
    ///
    /// Sine and cosine are exact for 90 degree steps so corners land exactly
    /// on corners.
    pub const fn rotation(rotation: Rotation) -> Self {
        let (cos, sin) = match rotation {
            Rotation::Rotation0 => (1.0, 0.0),
            Rotation::Rotation90 => (0.0, 1.0),
            Rotation::Rotation180 => (-1.0, 0.0),
            Rotation::Rotation270 => (0.0, -1.0),
        };
        Self {
            scale_x: cos,
            skew_x: -sin,
            translate_x: 0.0,
            skew_y: sin,
            scale_y: cos,
            translate_y: 0.0,
        }
    }

    /// Scale-to-fill map stretching `source` onto `target`.
    pub fn rect_to_rect(source: &Rectangle, target: &Rectangle) -> Result<Self, GeometryError> {
        if source.is_empty() {
            return Err(GeometryError::EmptyRectangle);
        }
        let scale_x = target.width() / source.width();
        let scale_y = target.height() / source.height();
        Ok(Self::scale_translate(
            scale_x,
            scale_y,
            target.left - source.left * scale_x,
            target.top - source.top * scale_y,
        ))
    }

    /// Composes `self` followed by `next`.
    pub fn then(&self, next: &AffineMatrix) -> AffineMatrix {
        AffineMatrix {
            scale_x: next.scale_x * self.scale_x + next.skew_x * self.skew_y,
            skew_x: next.scale_x * self.skew_x + next.skew_x * self.scale_y,
            translate_x: next.scale_x * self.translate_x
                + next.skew_x * self.translate_y
                + next.translate_x,
            skew_y: next.skew_y * self.scale_x + next.scale_y * self.skew_y,
            scale_y: next.skew_y * self.skew_x + next.scale_y * self.scale_y,
            translate_y: next.skew_y * self.translate_x
                + next.scale_y * self.translate_y
                + next.translate_y,
        }
    }

    pub fn map_point(&self, point: Point) -> Point {
        Point::new(
            self.scale_x * point.x + self.skew_x * point.y + self.translate_x,
            self.skew_y * point.x + self.scale_y * point.y + self.translate_y,
        )
    }

    pub fn map_vertices(&self, vertices: &Vertices) -> Vertices {
        vertices.map(|p| self.map_point(p))
    }

    /// Bounding box of the mapped rectangle.
    pub fn map_rectangle(&self, rect: &Rectangle) -> Rectangle {
        vertices_to_rectangle(&self.map_vertices(&rectangle_to_vertices(rect)))
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn approx_eq(&self, other: &AffineMatrix, epsilon: f32) -> bool {
        let a = self.to_array();
        let b = other.to_array();
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= epsilon)
    }

    /// Row-major `[scale_x, skew_x, translate_x, skew_y, scale_y, translate_y]`.
    pub fn to_array(&self) -> [f32; 6] {
        [
            self.scale_x,
            self.skew_x,
            self.translate_x,
            self.skew_y,
            self.scale_y,
            self.translate_y,
        ]
    }

    /// Column-major 4x4 matrix as consumed by GL vertex shaders.
    pub fn to_mat4(&self) -> [f32; 16] {
        [
            self.scale_x,
            self.skew_y,
            0.0,
            0.0,
            self.skew_x,
            self.scale_y,
            0.0,
            0.0,
            0.0,
            0.0,
            1.0,
            0.0,
            self.translate_x,
            self.translate_y,
            0.0,
            1.0,
        ]
    }
}

impl fmt::Display for AffineMatrix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{:.4} {:.4} {:.4}; {:.4} {:.4} {:.4}]",
            self.scale_x,
            self.skew_x,
            self.translate_x,
            self.skew_y,
            self.scale_y,
            self.translate_y
        )
    }
}

/// Scale-to-fill map from the normalized space onto `rect`.
pub fn normalized_to_rectangle(rect: &Rectangle) -> AffineMatrix {
    let scale_x = rect.width() / 2.0;
    let scale_y = rect.height() / 2.0;
    AffineMatrix::scale_translate(scale_x, scale_y, rect.left + scale_x, rect.top + scale_y)
}

/// Transform mapping `source` onto `target` with a clockwise rotation.
///
/// The corners `<a, b, c, d>` of the source land on the corners of the target
/// shifted by one position per quarter turn:
///
/// ```text
///  a----------b               d'-----------a'
///  |  source  |    90° ->     |            |
///  d----------c               |   target   |
///                             |            |
///                             c'-----------b'
/// ```
pub fn compute_transform(
    source: &Rectangle,
    target: &Rectangle,
    rotation: Rotation,
) -> Result<AffineMatrix, GeometryError> {
    let matrix = AffineMatrix::rect_to_rect(source, &NORMALIZED_RECT)?
        .then(&AffineMatrix::rotation(rotation))
        .then(&normalized_to_rectangle(target));
    Ok(matrix)
}

/// Largest rectangle with the `width:height` aspect ratio centered inside
/// `bounds`, the source rectangle of a center-crop.
pub fn center_fit(bounds: &Rectangle, width: f32, height: f32) -> Rectangle {
    let scale = (bounds.width() / width).min(bounds.height() / height);
    let fit_width = width * scale;
    let fit_height = height * scale;
    let left = bounds.left + (bounds.width() - fit_width) / 2.0;
    let top = bounds.top + (bounds.height() - fit_height) / 2.0;
    Rectangle::new(left, top, left + fit_width, top + fit_height)
}

/// Horizontal flip about the vertical center line of `target`.
pub fn mirror_horizontally(target: &Rectangle) -> AffineMatrix {
    AffineMatrix::scale_translate(-1.0, 1.0, target.left + target.right, 0.0)
}
