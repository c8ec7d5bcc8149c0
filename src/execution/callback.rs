//! Callback vocabulary shared by every dispatcher operation.
//!
//! Callbacks receive one argument struct per call and answer with an
//! [`Outcome`]. The struct borrows the operation's parameters and, for vector
//! operations, the current pixel's values; nothing outlives the call.

/// What a callback produced for one pixel (or one plane of a pixel).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome<T> {
    /// Write this value.
    Value(T),
    /// Leave the destination untouched. Not an error.
    Decline,
    /// Stop the operation. The dispatcher returns `Ok(false)`, or a
    /// `CallbackAbort` error when configured to.
    Abort,
}

impl<T> Outcome<T> {
    pub fn is_value(&self) -> bool {
        matches!(self, Outcome::Value(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Value(v) => Outcome::Value(f(v)),
            Outcome::Decline => Outcome::Decline,
            Outcome::Abort => Outcome::Abort,
        }
    }
}

impl<T> From<Option<T>> for Outcome<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Outcome::Value(v),
            None => Outcome::Decline,
        }
    }
}

/// Position of the sample being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelPos {
    pub x: usize,
    pub y: usize,
    pub plane: usize,
}

impl PixelPos {
    pub fn new(x: usize, y: usize, plane: usize) -> Self {
        Self { x, y, plane }
    }
}

/// Argument of a unary point callback: one source sample.
#[derive(Debug, Clone, Copy)]
pub struct UnaryPoint<'a> {
    pub src: f32,
    pub params: &'a [f32],
    pub pos: PixelPos,
}

/// Argument of a unary color callback: the whole source pixel.
///
/// `dst` starts out holding the destination pixel's current values; the
/// callback edits it in place and returns `Outcome::Value(())` to commit.
#[derive(Debug)]
pub struct ColorPoint<'a> {
    pub src: &'a [f32],
    pub dst: &'a mut [f32],
    pub params: &'a [f32],
    pub x: usize,
    pub y: usize,
}

/// Argument of a multi-image point callback: one sample per source image,
/// all at the same position and plane.
#[derive(Debug, Clone, Copy)]
pub struct MultiPoint<'a> {
    pub src: &'a [f32],
    pub params: &'a [f32],
    pub pos: PixelPos,
}

/// Argument of a multi-image color callback.
///
/// `src` holds every plane of every source image at `(x, y)`, image by image:
/// `src[i * src_depth + d]` is plane `d` of image `i`.
#[derive(Debug)]
pub struct MultiColorPoint<'a> {
    pub src: &'a [f32],
    pub src_depth: usize,
    pub dst: &'a mut [f32],
    pub params: &'a [f32],
    pub x: usize,
    pub y: usize,
}

impl MultiColorPoint<'_> {
    /// Planes of source image `index` at the current position.
    pub fn source(&self, index: usize) -> &[f32] {
        let start = index * self.src_depth;
        &self.src[start..start + self.src_depth]
    }

    pub fn source_count(&self) -> usize {
        if self.src_depth == 0 {
            0
        } else {
            self.src.len() / self.src_depth
        }
    }
}

/// Argument of a render callback: position only.
#[derive(Debug, Clone, Copy)]
pub struct RenderPoint<'a> {
    pub params: &'a [f32],
    pub pos: PixelPos,
}

/// Result of a conditional render callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conditional {
    pub value: f32,
    /// Write `value` only when set.
    pub apply: bool,
}

impl Conditional {
    pub fn apply(value: f32) -> Self {
        Self { value, apply: true }
    }

    pub fn skip() -> Self {
        Self {
            value: 0.0,
            apply: false,
        }
    }
}
