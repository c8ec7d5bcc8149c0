//! Typed operation dispatcher.
//!
//! The dispatcher validates its arguments with the requirement checks, then
//! drives a callback over every pixel of the destination image. Validation
//! always completes before the first write, so a rejected call leaves every
//! image untouched.
//!
//! Callbacks receive an explicit context reference on every call. Stateful
//! callbacks (the default) run one at a time in row-major order inside a
//! [`SerialScope`](crate::execution::mode::SerialScope); pure callbacks may
//! run rows on several threads. The `*_serial` operations take `&mut` context
//! and `FnMut` callbacks with no thread-safety bounds and always run serially.

use crate::core::error::{ProcessError, ProcessResult};
use crate::core::image::{ImageDescriptor, RowMut};
use crate::core::params::{ArgValue, MarshalStats, Marshaller, ParameterArray};
use crate::execution::callback::{
    ColorPoint, Conditional, MultiColorPoint, MultiPoint, Outcome, PixelPos, RenderPoint,
    UnaryPoint,
};
use crate::execution::mode::{CallbackMode, ThreadBudget};
use crate::execution::options::DispatchOptions;
use crate::validation::requirements::{
    require_match_size, require_not_complex, require_same_depth,
};
use log::{debug, warn};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::sync::Arc;

/// How a row finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowFlow {
    Continue,
    /// The callback asked to stop.
    Abort(PixelPos),
    /// The callback could not produce a required value.
    Fail(PixelPos),
}

/// Validates and runs pixel operations.
pub struct Dispatcher {
    options: DispatchOptions,
    budget: Arc<ThreadBudget>,
    marshaller: Marshaller,
    pool: Mutex<Option<(usize, Arc<rayon::ThreadPool>)>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("options", &self.options)
            .field("budget", &self.budget)
            .field("marshaller", &self.marshaller)
            .finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher with default options (stateful callbacks).
    pub fn new() -> Self {
        Self::with_options(DispatchOptions::default())
    }

    pub fn with_options(options: DispatchOptions) -> Self {
        Self {
            budget: ThreadBudget::new_shared(options.max_threads),
            options,
            marshaller: Marshaller::new(),
            pool: Mutex::new(None),
        }
    }

    /// Share a thread budget with other dispatchers.
    pub fn with_budget(mut self, budget: Arc<ThreadBudget>) -> Self {
        self.budget = budget;
        self
    }

    /// Share marshaling counters with other dispatchers.
    pub fn with_marshaller(mut self, marshaller: Marshaller) -> Self {
        self.marshaller = marshaller;
        self
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    pub fn budget(&self) -> &Arc<ThreadBudget> {
        &self.budget
    }

    pub fn marshaller(&self) -> &Marshaller {
        &self.marshaller
    }

    pub fn marshal_stats(&self) -> &Arc<MarshalStats> {
        self.marshaller.stats()
    }

    // ========================================================================
    // Point operations
    // ========================================================================

    /// Call `callback` for every sample of `src` and write accepted results
    /// into the same sample of `dst`.
    ///
    /// Requires equal sizes and depths and no complex data; the data types
    /// may differ. Returns `Ok(false)` when the callback aborts.
    pub fn invoke_unary_point_op<C, F>(
        &self,
        src: &ImageDescriptor,
        dst: &mut ImageDescriptor,
        context: &C,
        callback: F,
        params: &[f32],
        operation: &str,
    ) -> ProcessResult<bool>
    where
        C: Sync + ?Sized,
        F: Fn(&C, UnaryPoint<'_>) -> Outcome<f32> + Sync,
    {
        self.check_unary(src, dst, true, operation)?;
        let width = dst.width();
        self.run(operation, dst, |y, row| {
            unary_row(src, params, width, y, row, |point| callback(context, point))
        })
    }

    /// Serial form of [`Dispatcher::invoke_unary_point_op`] for callbacks
    /// whose state is not thread-safe.
    pub fn invoke_unary_point_op_serial<C, F>(
        &self,
        src: &ImageDescriptor,
        dst: &mut ImageDescriptor,
        context: &mut C,
        mut callback: F,
        params: &[f32],
        operation: &str,
    ) -> ProcessResult<bool>
    where
        C: ?Sized,
        F: FnMut(&mut C, UnaryPoint<'_>) -> Outcome<f32>,
    {
        self.check_unary(src, dst, true, operation)?;
        let width = dst.width();
        self.run_stateful(operation, dst, |y, row| {
            unary_row(src, params, width, y, row, |point| callback(&mut *context, point))
        })
    }

    /// Like [`Dispatcher::invoke_unary_point_op`] but the callback sees the
    /// whole pixel: every plane of `src` (alpha included) and an editable copy
    /// of the destination pixel. Depths may differ.
    pub fn invoke_unary_point_color_op<C, F>(
        &self,
        src: &ImageDescriptor,
        dst: &mut ImageDescriptor,
        context: &C,
        callback: F,
        params: &[f32],
        operation: &str,
    ) -> ProcessResult<bool>
    where
        C: Sync + ?Sized,
        F: Fn(&C, ColorPoint<'_>) -> Outcome<()> + Sync,
    {
        self.check_unary(src, dst, false, operation)?;
        let width = dst.width();
        self.run(operation, dst, |y, row| {
            unary_color_row(src, params, width, y, row, |point| callback(context, point))
        })
    }

    pub fn invoke_unary_point_color_op_serial<C, F>(
        &self,
        src: &ImageDescriptor,
        dst: &mut ImageDescriptor,
        context: &mut C,
        mut callback: F,
        params: &[f32],
        operation: &str,
    ) -> ProcessResult<bool>
    where
        C: ?Sized,
        F: FnMut(&mut C, ColorPoint<'_>) -> Outcome<()>,
    {
        self.check_unary(src, dst, false, operation)?;
        let width = dst.width();
        self.run_stateful(operation, dst, |y, row| {
            unary_color_row(src, params, width, y, row, |point| callback(&mut *context, point))
        })
    }

    /// Combine several source images plane by plane into `dst`.
    ///
    /// `sources` is marshaled into an image array that is released on every
    /// exit path. Every source must fully match the first (size, data type,
    /// color space); the first must match `dst` in size and depth; no image
    /// may be complex.
    pub fn invoke_multi_point_op<C, F>(
        &self,
        sources: &[ArgValue<'_>],
        dst: &mut ImageDescriptor,
        context: &C,
        callback: F,
        params: &[f32],
        operation: &str,
    ) -> ProcessResult<bool>
    where
        C: Sync + ?Sized,
        F: Fn(&C, MultiPoint<'_>) -> Outcome<f32> + Sync,
    {
        let images = self.check_multi(sources, dst, true, operation)?;
        let width = dst.width();
        let images = &images;
        self.run(operation, dst, |y, row| {
            multi_row(images, params, width, y, row, |point| callback(context, point))
        })
    }

    pub fn invoke_multi_point_op_serial<C, F>(
        &self,
        sources: &[ArgValue<'_>],
        dst: &mut ImageDescriptor,
        context: &mut C,
        mut callback: F,
        params: &[f32],
        operation: &str,
    ) -> ProcessResult<bool>
    where
        C: ?Sized,
        F: FnMut(&mut C, MultiPoint<'_>) -> Outcome<f32>,
    {
        let images = self.check_multi(sources, dst, true, operation)?;
        let width = dst.width();
        let images = &images;
        self.run_stateful(operation, dst, |y, row| {
            multi_row(images, params, width, y, row, |point| callback(&mut *context, point))
        })
    }

    /// Vector-valued form of [`Dispatcher::invoke_multi_point_op`]: one call
    /// per pixel with every plane of every source. `dst` may have a
    /// different depth than the sources.
    pub fn invoke_multi_point_color_op<C, F>(
        &self,
        sources: &[ArgValue<'_>],
        dst: &mut ImageDescriptor,
        context: &C,
        callback: F,
        params: &[f32],
        operation: &str,
    ) -> ProcessResult<bool>
    where
        C: Sync + ?Sized,
        F: Fn(&C, MultiColorPoint<'_>) -> Outcome<()> + Sync,
    {
        let images = self.check_multi(sources, dst, false, operation)?;
        let width = dst.width();
        let images = &images;
        self.run(operation, dst, |y, row| {
            multi_color_row(images, params, width, y, row, |point| callback(context, point))
        })
    }

    pub fn invoke_multi_point_color_op_serial<C, F>(
        &self,
        sources: &[ArgValue<'_>],
        dst: &mut ImageDescriptor,
        context: &mut C,
        mut callback: F,
        params: &[f32],
        operation: &str,
    ) -> ProcessResult<bool>
    where
        C: ?Sized,
        F: FnMut(&mut C, MultiColorPoint<'_>) -> Outcome<()>,
    {
        let images = self.check_multi(sources, dst, false, operation)?;
        let width = dst.width();
        let images = &images;
        self.run_stateful(operation, dst, |y, row| {
            multi_color_row(images, params, width, y, row, |point| {
                callback(&mut *context, point)
            })
        })
    }

    // ========================================================================
    // Render operations
    // ========================================================================

    /// Generate every sample of `image` from its position.
    ///
    /// With `plus` the value is added to the existing sample, otherwise it
    /// replaces it. A render callback must produce a value: declining fails
    /// the call with `CallbackAbort`.
    pub fn invoke_render_op<C, F>(
        &self,
        image: &mut ImageDescriptor,
        context: &C,
        callback: F,
        params: &[f32],
        plus: bool,
        operation: &str,
    ) -> ProcessResult<bool>
    where
        C: Sync + ?Sized,
        F: Fn(&C, RenderPoint<'_>) -> Outcome<f32> + Sync,
    {
        require_not_complex(image).map_err(|e| self.rejected(operation, e))?;
        let width = image.width();
        self.run(operation, image, |y, row| {
            render_row(params, plus, width, y, row, |point| callback(context, point))
        })
    }

    pub fn invoke_render_op_serial<C, F>(
        &self,
        image: &mut ImageDescriptor,
        context: &mut C,
        mut callback: F,
        params: &[f32],
        plus: bool,
        operation: &str,
    ) -> ProcessResult<bool>
    where
        C: ?Sized,
        F: FnMut(&mut C, RenderPoint<'_>) -> Outcome<f32>,
    {
        require_not_complex(image).map_err(|e| self.rejected(operation, e))?;
        let width = image.width();
        self.run_stateful(operation, image, |y, row| {
            render_row(params, plus, width, y, row, |point| callback(&mut *context, point))
        })
    }

    /// Generate samples of `image` only where the callback sets `apply`.
    /// A declined sample is treated as not applied.
    pub fn invoke_render_cond_op<C, F>(
        &self,
        image: &mut ImageDescriptor,
        context: &C,
        callback: F,
        params: &[f32],
        operation: &str,
    ) -> ProcessResult<bool>
    where
        C: Sync + ?Sized,
        F: Fn(&C, RenderPoint<'_>) -> Outcome<Conditional> + Sync,
    {
        require_not_complex(image).map_err(|e| self.rejected(operation, e))?;
        let width = image.width();
        self.run(operation, image, |y, row| {
            render_cond_row(params, width, y, row, |point| callback(context, point))
        })
    }

    pub fn invoke_render_cond_op_serial<C, F>(
        &self,
        image: &mut ImageDescriptor,
        context: &mut C,
        mut callback: F,
        params: &[f32],
        operation: &str,
    ) -> ProcessResult<bool>
    where
        C: ?Sized,
        F: FnMut(&mut C, RenderPoint<'_>) -> Outcome<Conditional>,
    {
        require_not_complex(image).map_err(|e| self.rejected(operation, e))?;
        let width = image.width();
        self.run_stateful(operation, image, |y, row| {
            render_cond_row(params, width, y, row, |point| callback(&mut *context, point))
        })
    }

    // ========================================================================
    // Validation
    // ========================================================================

    fn check_unary(
        &self,
        src: &ImageDescriptor,
        dst: &ImageDescriptor,
        same_depth: bool,
        operation: &str,
    ) -> ProcessResult<()> {
        let mut checked = require_not_complex(src)
            .and_then(|_| require_not_complex(dst))
            .and_then(|_| require_match_size(src, dst));
        if same_depth {
            checked = checked.and_then(|_| require_same_depth(src, dst));
        }
        checked.map_err(|e| self.rejected(operation, e))
    }

    /// Marshal `sources` and check them against `dst`. The returned array is
    /// tracked by the marshaller until dropped.
    fn check_multi<'a>(
        &self,
        sources: &[ArgValue<'a>],
        dst: &ImageDescriptor,
        same_depth: bool,
        operation: &str,
    ) -> ProcessResult<ParameterArray<&'a ImageDescriptor>> {
        require_not_complex(dst).map_err(|e| self.rejected(operation, e))?;
        let images = self
            .marshaller
            .to_image_array(Some(sources), "src_images")
            .map_err(|e| self.rejected(operation, e))?;
        check_sources(&images, dst, same_depth).map_err(|e| self.rejected(operation, e))?;
        Ok(images)
    }

    // ========================================================================
    // Driver
    // ========================================================================

    fn run<R>(&self, operation: &str, dst: &mut ImageDescriptor, row_fn: R) -> ProcessResult<bool>
    where
        R: Fn(usize, &mut [RowMut<'_>]) -> RowFlow + Sync,
    {
        let mode = self.options.callback_mode;
        self.log_start(operation, dst, mode);

        let rows = dst.rows_mut();
        let flow = match mode {
            CallbackMode::Stateful => {
                let _serial = self.budget.serial_scope();
                run_serial(rows, &row_fn)
            }
            CallbackMode::Pure => match self.budget.current() {
                1 => run_serial(rows, &row_fn),
                threads => self.run_parallel(rows, &row_fn, threads),
            },
        };
        self.finish(operation, flow)
    }

    /// Row-major loop under a serial scope, for callbacks that are not `Sync`.
    fn run_stateful<R>(
        &self,
        operation: &str,
        dst: &mut ImageDescriptor,
        row_fn: R,
    ) -> ProcessResult<bool>
    where
        R: FnMut(usize, &mut [RowMut<'_>]) -> RowFlow,
    {
        self.log_start(operation, dst, CallbackMode::Stateful);

        let rows = dst.rows_mut();
        let flow = {
            let _serial = self.budget.serial_scope();
            run_serial(rows, row_fn)
        };
        self.finish(operation, flow)
    }

    fn log_start(&self, operation: &str, dst: &ImageDescriptor, mode: CallbackMode) {
        debug!(
            "{}: {}x{} {} {} image, {:?} callback",
            operation,
            dst.width(),
            dst.height(),
            dst.color_space(),
            dst.data_type(),
            mode
        );
    }

    fn finish(&self, operation: &str, flow: RowFlow) -> ProcessResult<bool> {
        match flow {
            RowFlow::Continue => Ok(true),
            RowFlow::Abort(pos) if self.options.abort_as_error => {
                Err(callback_abort(operation, pos))
            }
            RowFlow::Abort(pos) => {
                debug!("{}: aborted by callback at ({}, {})", operation, pos.x, pos.y);
                Ok(false)
            }
            RowFlow::Fail(pos) => Err(callback_abort(operation, pos)),
        }
    }

    fn run_parallel<R>(&self, rows: Vec<Vec<RowMut<'_>>>, row_fn: &R, threads: usize) -> RowFlow
    where
        R: Fn(usize, &mut [RowMut<'_>]) -> RowFlow + Sync,
    {
        let work = move || {
            rows.into_par_iter()
                .enumerate()
                .try_for_each(|(y, mut row)| match row_fn(y, row.as_mut_slice()) {
                    RowFlow::Continue => Ok(()),
                    stop => Err(stop),
                })
        };
        let result = match self.pool(threads) {
            Some(pool) => pool.install(work),
            None => work(),
        };
        match result {
            Ok(()) => RowFlow::Continue,
            Err(stop) => stop,
        }
    }

    /// Pool with exactly `threads` workers, or `None` for the global pool.
    fn pool(&self, threads: usize) -> Option<Arc<rayon::ThreadPool>> {
        if threads == 0 {
            return None;
        }
        let mut cached = self.pool.lock();
        if let Some((size, pool)) = cached.as_ref() {
            if *size == threads {
                return Some(Arc::clone(pool));
            }
        }
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => {
                let pool = Arc::new(pool);
                *cached = Some((threads, Arc::clone(&pool)));
                Some(pool)
            }
            Err(err) => {
                warn!("could not build a {}-thread pool ({}), using the global pool", threads, err);
                None
            }
        }
    }

    fn rejected(&self, operation: &str, error: ProcessError) -> ProcessError {
        warn!("{}: rejected: {}", operation, error);
        error
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn run_serial<R>(rows: Vec<Vec<RowMut<'_>>>, mut row_fn: R) -> RowFlow
where
    R: FnMut(usize, &mut [RowMut<'_>]) -> RowFlow,
{
    for (y, mut row) in rows.into_iter().enumerate() {
        match row_fn(y, row.as_mut_slice()) {
            RowFlow::Continue => {}
            stop => return stop,
        }
    }
    RowFlow::Continue
}

// Row bodies shared by the parallel-capable and serial entry points.

fn unary_row<G>(
    src: &ImageDescriptor,
    params: &[f32],
    width: usize,
    y: usize,
    row: &mut [RowMut<'_>],
    mut call: G,
) -> RowFlow
where
    G: FnMut(UnaryPoint<'_>) -> Outcome<f32>,
{
    for x in 0..width {
        for (d, plane) in row.iter_mut().enumerate() {
            let pos = PixelPos::new(x, y, d);
            let point = UnaryPoint {
                src: src.get(x, y, d),
                params,
                pos,
            };
            match call(point) {
                Outcome::Value(value) => plane.set(x, value),
                Outcome::Decline => {}
                Outcome::Abort => return RowFlow::Abort(pos),
            }
        }
    }
    RowFlow::Continue
}

fn unary_color_row<G>(
    src: &ImageDescriptor,
    params: &[f32],
    width: usize,
    y: usize,
    row: &mut [RowMut<'_>],
    mut call: G,
) -> RowFlow
where
    G: FnMut(ColorPoint<'_>) -> Outcome<()>,
{
    let mut src_pixel = vec![0.0f32; src.depth()];
    let mut dst_pixel = vec![0.0f32; row.len()];
    for x in 0..width {
        for (d, value) in src_pixel.iter_mut().enumerate() {
            *value = src.get(x, y, d);
        }
        for (value, plane) in dst_pixel.iter_mut().zip(row.iter()) {
            *value = plane.get(x);
        }
        let point = ColorPoint {
            src: &src_pixel,
            dst: &mut dst_pixel,
            params,
            x,
            y,
        };
        match call(point) {
            Outcome::Value(()) => write_pixel(row, x, &dst_pixel),
            Outcome::Decline => {}
            Outcome::Abort => return RowFlow::Abort(PixelPos::new(x, y, 0)),
        }
    }
    RowFlow::Continue
}

fn multi_row<G>(
    images: &[&ImageDescriptor],
    params: &[f32],
    width: usize,
    y: usize,
    row: &mut [RowMut<'_>],
    mut call: G,
) -> RowFlow
where
    G: FnMut(MultiPoint<'_>) -> Outcome<f32>,
{
    let mut values = vec![0.0f32; images.len()];
    for x in 0..width {
        for (d, plane) in row.iter_mut().enumerate() {
            for (value, image) in values.iter_mut().zip(images) {
                *value = image.get(x, y, d);
            }
            let pos = PixelPos::new(x, y, d);
            let point = MultiPoint {
                src: &values,
                params,
                pos,
            };
            match call(point) {
                Outcome::Value(value) => plane.set(x, value),
                Outcome::Decline => {}
                Outcome::Abort => return RowFlow::Abort(pos),
            }
        }
    }
    RowFlow::Continue
}

fn multi_color_row<G>(
    images: &[&ImageDescriptor],
    params: &[f32],
    width: usize,
    y: usize,
    row: &mut [RowMut<'_>],
    mut call: G,
) -> RowFlow
where
    G: FnMut(MultiColorPoint<'_>) -> Outcome<()>,
{
    let src_depth = images.first().map_or(0, |image| image.depth());
    let mut src_pixels = vec![0.0f32; src_depth * images.len()];
    let mut dst_pixel = vec![0.0f32; row.len()];
    for x in 0..width {
        for (i, image) in images.iter().enumerate() {
            for d in 0..src_depth {
                src_pixels[i * src_depth + d] = image.get(x, y, d);
            }
        }
        for (value, plane) in dst_pixel.iter_mut().zip(row.iter()) {
            *value = plane.get(x);
        }
        let point = MultiColorPoint {
            src: &src_pixels,
            src_depth,
            dst: &mut dst_pixel,
            params,
            x,
            y,
        };
        match call(point) {
            Outcome::Value(()) => write_pixel(row, x, &dst_pixel),
            Outcome::Decline => {}
            Outcome::Abort => return RowFlow::Abort(PixelPos::new(x, y, 0)),
        }
    }
    RowFlow::Continue
}

fn render_row<G>(
    params: &[f32],
    plus: bool,
    width: usize,
    y: usize,
    row: &mut [RowMut<'_>],
    mut call: G,
) -> RowFlow
where
    G: FnMut(RenderPoint<'_>) -> Outcome<f32>,
{
    for x in 0..width {
        for (d, plane) in row.iter_mut().enumerate() {
            let pos = PixelPos::new(x, y, d);
            match call(RenderPoint { params, pos }) {
                Outcome::Value(value) if plus => {
                    let sum = plane.get(x) + value;
                    plane.set(x, sum);
                }
                Outcome::Value(value) => plane.set(x, value),
                Outcome::Decline => return RowFlow::Fail(pos),
                Outcome::Abort => return RowFlow::Abort(pos),
            }
        }
    }
    RowFlow::Continue
}

fn render_cond_row<G>(
    params: &[f32],
    width: usize,
    y: usize,
    row: &mut [RowMut<'_>],
    mut call: G,
) -> RowFlow
where
    G: FnMut(RenderPoint<'_>) -> Outcome<Conditional>,
{
    for x in 0..width {
        for (d, plane) in row.iter_mut().enumerate() {
            let pos = PixelPos::new(x, y, d);
            match call(RenderPoint { params, pos }) {
                Outcome::Value(Conditional { value, apply: true }) => plane.set(x, value),
                Outcome::Value(_) | Outcome::Decline => {}
                Outcome::Abort => return RowFlow::Abort(pos),
            }
        }
    }
    RowFlow::Continue
}

fn write_pixel(row: &mut [RowMut<'_>], x: usize, values: &[f32]) {
    for (plane, &value) in row.iter_mut().zip(values) {
        plane.set(x, value);
    }
}

fn check_sources(
    images: &[&ImageDescriptor],
    dst: &ImageDescriptor,
    same_depth: bool,
) -> ProcessResult<()> {
    let first = images.first().ok_or_else(|| {
        ProcessError::invalid_argument("src_images", "must contain at least one image")
    })?;
    require_not_complex(first)?;
    require_match_size(first, dst)?;
    if same_depth {
        require_same_depth(first, dst)?;
    }
    Ok(())
}

fn callback_abort(operation: &str, pos: PixelPos) -> ProcessError {
    ProcessError::CallbackAbort {
        operation: operation.to_string(),
        x: pos.x,
        y: pos.y,
        plane: pos.plane,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::types::{ColorSpace, DataType};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn gray(width: usize, height: usize) -> ImageDescriptor {
        ImageDescriptor::create(width, height, ColorSpace::Gray, DataType::Byte).unwrap()
    }

    fn ramp(width: usize, height: usize) -> ImageDescriptor {
        let mut image = gray(width, height);
        for y in 0..height {
            for x in 0..width {
                image.set(x, y, 0, (y * width + x) as f32);
            }
        }
        image
    }

    fn pure_dispatcher(threads: usize) -> Dispatcher {
        Dispatcher::with_options(
            DispatchOptions::new()
                .with_callback_mode(CallbackMode::Pure)
                .with_max_threads(threads),
        )
    }

    #[test]
    fn test_unary_point_op_writes_values() {
        let dispatcher = Dispatcher::new();
        let src = ramp(4, 3);
        let mut dst = ImageDescriptor::create(4, 3, ColorSpace::Gray, DataType::Float).unwrap();

        let ok = dispatcher
            .invoke_unary_point_op(
                &src,
                &mut dst,
                &(),
                |_, p| Outcome::Value(p.src * p.params[0]),
                &[0.5],
                "scale",
            )
            .unwrap();

        assert!(ok);
        assert_eq!(dst.get(3, 2, 0), 5.5);
    }

    #[test]
    fn test_unary_point_op_always_declining_keeps_dst() {
        let dispatcher = Dispatcher::new();
        let src = ramp(5, 5);
        let mut dst = ramp(5, 5);
        dst.fill(42.0);
        let before = dst.clone();

        let ok = dispatcher
            .invoke_unary_point_op(&src, &mut dst, &(), |_, _| Outcome::Decline, &[], "noop")
            .unwrap();

        assert!(ok);
        assert_eq!(dst, before);
    }

    #[test]
    fn test_unary_point_op_abort_returns_false() {
        let dispatcher = Dispatcher::new();
        let src = ramp(3, 3);
        let mut dst = gray(3, 3);

        let ok = dispatcher
            .invoke_unary_point_op(
                &src,
                &mut dst,
                &(),
                |_, p| {
                    if p.pos.y == 1 {
                        Outcome::Abort
                    } else {
                        Outcome::Value(1.0)
                    }
                },
                &[],
                "abort",
            )
            .unwrap();

        assert!(!ok);
        assert_eq!(dst.get(2, 0, 0), 1.0);
        assert_eq!(dst.get(0, 2, 0), 0.0);
    }

    #[test]
    fn test_abort_as_error() {
        let dispatcher = Dispatcher::with_options(DispatchOptions::new().with_abort_as_error(true));
        let src = ramp(2, 2);
        let mut dst = gray(2, 2);

        let err = dispatcher
            .invoke_unary_point_op(&src, &mut dst, &(), |_, _| Outcome::Abort, &[], "stop")
            .unwrap_err();

        assert_eq!(
            err,
            ProcessError::CallbackAbort {
                operation: "stop".to_string(),
                x: 0,
                y: 0,
                plane: 0
            }
        );
    }

    #[test]
    fn test_unary_point_op_rejects_before_writing() {
        let dispatcher = Dispatcher::new();
        let calls = AtomicUsize::new(0);
        let src = ImageDescriptor::create(2, 2, ColorSpace::Gray, DataType::CFloat).unwrap();
        let mut dst = gray(2, 2);

        let err = dispatcher
            .invoke_unary_point_op(
                &src,
                &mut dst,
                &calls,
                |calls, _| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Outcome::Value(1.0)
                },
                &[],
                "complex",
            )
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UnsupportedDataType);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unary_point_op_depth_and_size_checks() {
        let dispatcher = Dispatcher::new();
        let src = gray(2, 2);
        let mut rgb = ImageDescriptor::create(2, 2, ColorSpace::Rgb, DataType::Byte).unwrap();
        let err = dispatcher
            .invoke_unary_point_op(&src, &mut rgb, &(), |_, _| Outcome::Decline, &[], "d")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let mut bigger = gray(3, 2);
        let err = dispatcher
            .invoke_unary_point_op(&src, &mut bigger, &(), |_, _| Outcome::Decline, &[], "s")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SizeMismatch);
    }

    #[test]
    fn test_stateful_callback_runs_serially_and_restores_budget() {
        let dispatcher = Dispatcher::with_options(DispatchOptions::new().with_max_threads(4));
        let budget = Arc::clone(dispatcher.budget());
        let saw_parallel = AtomicBool::new(false);
        let src = ramp(8, 8);
        let mut dst = gray(8, 8);

        dispatcher
            .invoke_unary_point_op(
                &src,
                &mut dst,
                &(budget.as_ref(), &saw_parallel),
                |(budget, saw), p| {
                    if budget.current() != 1 {
                        saw.store(true, Ordering::SeqCst);
                    }
                    Outcome::Value(p.src)
                },
                &[],
                "copy",
            )
            .unwrap();

        assert!(!saw_parallel.load(Ordering::SeqCst));
        assert_eq!(budget.current(), 4);
    }

    #[test]
    fn test_budget_restored_after_abort_error() {
        let dispatcher = Dispatcher::with_options(
            DispatchOptions::new()
                .with_max_threads(3)
                .with_abort_as_error(true),
        );
        let mut image = gray(2, 2);
        let result =
            dispatcher.invoke_render_op(&mut image, &(), |_, _| Outcome::Abort, &[], false, "r");
        assert!(result.is_err());
        assert_eq!(dispatcher.budget().current(), 3);
        assert!(!dispatcher.budget().is_serial());
    }

    #[test]
    fn test_stateful_order_is_row_major() {
        let dispatcher = Dispatcher::new();
        let order = Mutex::new(Vec::new());
        let src = ramp(3, 2);
        let mut dst = gray(3, 2);

        dispatcher
            .invoke_unary_point_op(
                &src,
                &mut dst,
                &order,
                |order, p| {
                    order.lock().push((p.pos.x, p.pos.y));
                    Outcome::Decline
                },
                &[],
                "trace",
            )
            .unwrap();

        assert_eq!(
            order.into_inner(),
            vec![(0, 0), (1, 0), (2, 0), (0, 1), (1, 1), (2, 1)]
        );
    }

    #[test]
    fn test_pure_parallel_matches_serial() {
        let src = ramp(16, 16);
        let mut serial = gray(16, 16);
        let mut parallel = gray(16, 16);
        let invert = |_: &(), p: UnaryPoint<'_>| Outcome::Value(255.0 - p.src);

        Dispatcher::new()
            .invoke_unary_point_op(&src, &mut serial, &(), invert, &[], "invert")
            .unwrap();
        pure_dispatcher(2)
            .invoke_unary_point_op(&src, &mut parallel, &(), invert, &[], "invert")
            .unwrap();

        assert_eq!(serial, parallel);
    }

    #[test]
    fn test_unary_color_op_rgb_to_gray() {
        let dispatcher = Dispatcher::new();
        let mut rgb = ImageDescriptor::create(2, 1, ColorSpace::Rgb, DataType::Byte).unwrap();
        rgb.set(0, 0, 0, 30.0);
        rgb.set(0, 0, 1, 60.0);
        rgb.set(0, 0, 2, 90.0);
        let mut out = gray(2, 1);

        dispatcher
            .invoke_unary_point_color_op(
                &rgb,
                &mut out,
                &(),
                |_, p| {
                    p.dst[0] = p.src.iter().sum::<f32>() / p.src.len() as f32;
                    Outcome::Value(())
                },
                &[],
                "mean",
            )
            .unwrap();

        assert_eq!(out.get(0, 0, 0), 60.0);
        assert_eq!(out.get(1, 0, 0), 0.0);
    }

    #[test]
    fn test_unary_color_op_sees_alpha_and_current_dst() {
        let dispatcher = Dispatcher::new();
        let mut src =
            ImageDescriptor::create_with_alpha(1, 1, ColorSpace::Rgb, DataType::Float).unwrap();
        src.set(0, 0, 3, 0.25);
        let mut dst = ImageDescriptor::create(1, 1, ColorSpace::Rgb, DataType::Float).unwrap();
        dst.fill(9.0);

        dispatcher
            .invoke_unary_point_color_op(
                &src,
                &mut dst,
                &(),
                |_, p| {
                    assert_eq!(p.src.len(), 4);
                    assert_eq!(p.dst, &[9.0, 9.0, 9.0]);
                    p.dst[1] = p.src[3];
                    Outcome::Value(())
                },
                &[],
                "alpha",
            )
            .unwrap();

        assert_eq!(dst.get(0, 0, 0), 9.0);
        assert_eq!(dst.get(0, 0, 1), 0.25);
    }

    #[test]
    fn test_multi_point_op_average() {
        let dispatcher = Dispatcher::new();
        let mut a = gray(2, 2);
        let mut b = gray(2, 2);
        a.fill(10.0);
        b.fill(30.0);
        let mut dst = gray(2, 2);
        let sources = ArgValue::images(&[&a, &b]);

        dispatcher
            .invoke_multi_point_op(
                &sources,
                &mut dst,
                &(),
                |_, p| Outcome::Value(p.src.iter().sum::<f32>() / p.src.len() as f32),
                &[],
                "average",
            )
            .unwrap();

        assert_eq!(dst.get(1, 1, 0), 20.0);
        assert_eq!(dispatcher.marshal_stats().allocated(), 1);
        assert_eq!(dispatcher.marshal_stats().live(), 0);
    }

    #[test]
    fn test_multi_point_op_releases_array_on_mismatch() {
        let dispatcher = Dispatcher::new();
        let images: Vec<ImageDescriptor> = (0..5)
            .map(|i| {
                let cs = if i == 2 { ColorSpace::Rgb } else { ColorSpace::Gray };
                ImageDescriptor::create(4, 4, cs, DataType::Byte).unwrap()
            })
            .collect();
        let refs: Vec<&ImageDescriptor> = images.iter().collect();
        let sources = ArgValue::images(&refs);
        let mut dst = gray(4, 4);

        let err = dispatcher
            .invoke_multi_point_op(&sources, &mut dst, &(), |_, _| Outcome::Value(1.0), &[], "m")
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ColorSpaceMismatch);
        assert_eq!(dispatcher.marshal_stats().allocated(), 1);
        assert_eq!(dispatcher.marshal_stats().live(), 0);
        assert_eq!(dst.get(0, 0, 0), 0.0);
    }

    #[test]
    fn test_multi_point_op_empty_and_non_image() {
        let dispatcher = Dispatcher::new();
        let mut dst = gray(2, 2);

        let err = dispatcher
            .invoke_multi_point_op(&[], &mut dst, &(), |_, _| Outcome::Decline, &[], "m")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let a = gray(2, 2);
        let sources = vec![ArgValue::Image(&a), ArgValue::Number(1.0)];
        let err = dispatcher
            .invoke_multi_point_op(&sources, &mut dst, &(), |_, _| Outcome::Decline, &[], "m")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(dispatcher.marshal_stats().live(), 0);
    }

    #[test]
    fn test_multi_point_op_checks_dst_first() {
        let dispatcher = Dispatcher::new();
        let a = gray(2, 2);
        let sources = ArgValue::images(&[&a]);
        let mut dst = ImageDescriptor::create(2, 2, ColorSpace::Gray, DataType::CFloat).unwrap();

        let err = dispatcher
            .invoke_multi_point_op(&sources, &mut dst, &(), |_, _| Outcome::Decline, &[], "m")
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UnsupportedDataType);
        assert_eq!(dispatcher.marshal_stats().allocated(), 0);
    }

    #[test]
    fn test_multi_point_color_op_depth_may_differ() {
        let dispatcher = pure_dispatcher(2);
        let mut a = ImageDescriptor::create(3, 3, ColorSpace::Rgb, DataType::Byte).unwrap();
        let mut b = ImageDescriptor::create(3, 3, ColorSpace::Rgb, DataType::Byte).unwrap();
        a.fill(100.0);
        b.fill(50.0);
        let sources = ArgValue::images(&[&a, &b]);
        let mut dst = gray(3, 3);

        dispatcher
            .invoke_multi_point_color_op(
                &sources,
                &mut dst,
                &(),
                |_, p| {
                    let first: f32 = p.source(0).iter().sum();
                    let second: f32 = p.source(1).iter().sum();
                    p.dst[0] = (first - second) / 3.0;
                    Outcome::Value(())
                },
                &[],
                "difference",
            )
            .unwrap();

        assert_eq!(dst.get(2, 2, 0), 50.0);
        assert_eq!(dispatcher.marshal_stats().live(), 0);
    }

    #[test]
    fn test_render_op_overwrite_and_plus() {
        let dispatcher = Dispatcher::new();
        let mut image = ImageDescriptor::create(3, 2, ColorSpace::Gray, DataType::Int).unwrap();

        dispatcher
            .invoke_render_op(
                &mut image,
                &(),
                |_, p| Outcome::Value((p.pos.x + p.pos.y) as f32 * p.params[0]),
                &[2.0],
                false,
                "ramp",
            )
            .unwrap();
        assert_eq!(image.get(2, 1, 0), 6.0);

        dispatcher
            .invoke_render_op(&mut image, &(), |_, _| Outcome::Value(1.0), &[], true, "add")
            .unwrap();
        assert_eq!(image.get(2, 1, 0), 7.0);
        assert_eq!(image.get(0, 0, 0), 1.0);
    }

    #[test]
    fn test_render_op_decline_is_callback_abort() {
        let dispatcher = Dispatcher::new();
        let mut image = gray(2, 2);
        let err = dispatcher
            .invoke_render_op(&mut image, &(), |_, _| Outcome::Decline, &[], false, "bad")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CallbackAbort);
    }

    #[test]
    fn test_render_cond_op_center_only() {
        let dispatcher = Dispatcher::new();
        let mut image = gray(3, 3);
        image.fill(2.0);

        let ok = dispatcher
            .invoke_render_cond_op(
                &mut image,
                &(),
                |_, p| {
                    if p.pos.x == 1 && p.pos.y == 1 {
                        Outcome::Value(Conditional::apply(7.0))
                    } else {
                        Outcome::Value(Conditional::skip())
                    }
                },
                &[],
                "center",
            )
            .unwrap();

        assert!(ok);
        for y in 0..3 {
            for x in 0..3 {
                let expected = if (x, y) == (1, 1) { 7.0 } else { 2.0 };
                assert_eq!(image.get(x, y, 0), expected);
            }
        }
    }

    #[test]
    fn test_render_rejects_complex() {
        let dispatcher = Dispatcher::new();
        let mut image = ImageDescriptor::create(2, 2, ColorSpace::Gray, DataType::CFloat).unwrap();
        let err = dispatcher
            .invoke_render_cond_op(&mut image, &(), |_, _| Outcome::Decline, &[], "c")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedDataType);
    }

    #[test]
    fn test_pure_budget_of_one_runs_serially() {
        let dispatcher = pure_dispatcher(1);
        let mut image = gray(4, 4);
        let ok = dispatcher
            .invoke_render_op(&mut image, &(), |_, _| Outcome::Value(3.0), &[], false, "fill")
            .unwrap();
        assert!(ok);
        assert_eq!(image.get(3, 3, 0), 3.0);
        assert!(!dispatcher.budget().is_serial());
    }

    #[test]
    fn test_unary_color_op_abort() {
        let dispatcher = Dispatcher::new();
        let src = ImageDescriptor::create(3, 2, ColorSpace::Rgb, DataType::Byte).unwrap();
        let mut dst = gray(3, 2);

        let ok = dispatcher
            .invoke_unary_point_color_op(
                &src,
                &mut dst,
                &(),
                |_, p| {
                    if (p.x, p.y) == (1, 1) {
                        return Outcome::Abort;
                    }
                    p.dst[0] = 5.0;
                    Outcome::Value(())
                },
                &[],
                "abort",
            )
            .unwrap();

        assert!(!ok);
        assert_eq!(dst.get(2, 0, 0), 5.0);
        assert_eq!(dst.get(0, 1, 0), 5.0);
        assert_eq!(dst.get(1, 1, 0), 0.0);
        assert_eq!(dst.get(2, 1, 0), 0.0);
    }

    #[test]
    fn test_multi_point_op_abort_as_error_releases_array() {
        let dispatcher = Dispatcher::with_options(DispatchOptions::new().with_abort_as_error(true));
        let a = ramp(3, 3);
        let b = ramp(3, 3);
        let sources = ArgValue::images(&[&a, &b]);
        let mut dst = gray(3, 3);

        let err = dispatcher
            .invoke_multi_point_op(
                &sources,
                &mut dst,
                &(),
                |_, p| {
                    if p.pos.y == 2 {
                        Outcome::Abort
                    } else {
                        Outcome::Value(p.src[0] + p.src[1])
                    }
                },
                &[],
                "sum",
            )
            .unwrap_err();

        assert_eq!(
            err,
            ProcessError::CallbackAbort {
                operation: "sum".to_string(),
                x: 0,
                y: 2,
                plane: 0
            }
        );
        assert_eq!(dst.get(2, 1, 0), 10.0);
        assert_eq!(dispatcher.marshal_stats().live(), 0);
    }

    #[test]
    fn test_multi_point_op_abort_returns_false() {
        let dispatcher = Dispatcher::new();
        let a = ramp(2, 2);
        let sources = ArgValue::images(&[&a]);
        let mut dst = gray(2, 2);

        let ok = dispatcher
            .invoke_multi_point_op(&sources, &mut dst, &(), |_, _| Outcome::Abort, &[], "m")
            .unwrap();

        assert!(!ok);
        assert_eq!(dispatcher.marshal_stats().live(), 0);
    }

    #[test]
    fn test_multi_point_color_op_abort() {
        let dispatcher = Dispatcher::new();
        let a = ramp(2, 2);
        let b = ramp(2, 2);
        let sources = ArgValue::images(&[&a, &b]);
        let mut dst = gray(2, 2);

        let ok = dispatcher
            .invoke_multi_point_color_op(
                &sources,
                &mut dst,
                &(),
                |_, p| {
                    if p.x == 1 {
                        return Outcome::Abort;
                    }
                    p.dst[0] = 9.0;
                    Outcome::Value(())
                },
                &[],
                "mc",
            )
            .unwrap();

        assert!(!ok);
        assert_eq!(dst.get(0, 0, 0), 9.0);
        assert_eq!(dst.get(1, 0, 0), 0.0);
        assert_eq!(dst.get(0, 1, 0), 0.0);
        assert_eq!(dispatcher.marshal_stats().live(), 0);
    }

    #[test]
    fn test_pure_abort_returns_false_and_keeps_budget() {
        let dispatcher = pure_dispatcher(4);
        let src = ramp(8, 8);
        let mut dst = gray(8, 8);

        let ok = dispatcher
            .invoke_unary_point_op(
                &src,
                &mut dst,
                &(),
                |_, p| {
                    if p.pos.y == 5 {
                        Outcome::Abort
                    } else {
                        Outcome::Value(p.src)
                    }
                },
                &[],
                "abort",
            )
            .unwrap();

        assert!(!ok);
        assert_eq!(dispatcher.budget().current(), 4);
        assert!(!dispatcher.budget().is_serial());
    }

    #[test]
    fn test_serial_op_threads_non_sync_state() {
        let dispatcher = Dispatcher::new();
        let src = ramp(3, 2);
        let mut dst = gray(3, 2);
        let mut calls = Rc::new(Cell::new(0usize));

        let ok = dispatcher
            .invoke_unary_point_op_serial(
                &src,
                &mut dst,
                &mut calls,
                |calls, p| {
                    calls.set(calls.get() + 1);
                    Outcome::Value(p.src + 1.0)
                },
                &[],
                "count",
            )
            .unwrap();

        assert!(ok);
        assert_eq!(calls.get(), 6);
        assert_eq!(dst.get(2, 1, 0), 6.0);
    }

    #[test]
    fn test_serial_op_is_row_major_and_restores_budget() {
        let dispatcher = pure_dispatcher(4);
        let budget = Arc::clone(dispatcher.budget());
        let mut image = gray(3, 2);
        let mut seen: Vec<(usize, usize, usize)> = Vec::new();

        dispatcher
            .invoke_render_op_serial(
                &mut image,
                &mut seen,
                |seen, p| {
                    seen.push((p.pos.x, p.pos.y, budget.current()));
                    Outcome::Value(1.0)
                },
                &[],
                false,
                "trace",
            )
            .unwrap();

        assert_eq!(
            seen,
            vec![(0, 0, 1), (1, 0, 1), (2, 0, 1), (0, 1, 1), (1, 1, 1), (2, 1, 1)]
        );
        assert_eq!(budget.current(), 4);
    }

    #[test]
    fn test_serial_ops_share_validation_and_abort() {
        let dispatcher = Dispatcher::new();
        let state = RefCell::new(Vec::new());
        let mut context = &state;

        let complex = ImageDescriptor::create(2, 2, ColorSpace::Gray, DataType::CFloat).unwrap();
        let mut dst = gray(2, 2);
        let err = dispatcher
            .invoke_unary_point_color_op_serial(
                &complex,
                &mut dst,
                &mut context,
                |_, _| Outcome::Value(()),
                &[],
                "c",
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedDataType);

        let a = ramp(2, 2);
        let sources = ArgValue::images(&[&a, &a]);
        let ok = dispatcher
            .invoke_multi_point_op_serial(
                &sources,
                &mut dst,
                &mut context,
                |state, p| {
                    state.borrow_mut().push(p.pos.x);
                    if p.pos.x == 1 {
                        Outcome::Abort
                    } else {
                        Outcome::Value(p.src[0] + p.src[1])
                    }
                },
                &[],
                "m",
            )
            .unwrap();
        assert!(!ok);
        assert_eq!(state.borrow().as_slice(), &[0, 1]);
        assert_eq!(dispatcher.marshal_stats().live(), 0);

        let ok = dispatcher
            .invoke_multi_point_color_op_serial(
                &sources,
                &mut dst,
                &mut context,
                |state, p| {
                    state.borrow_mut().push(10 + p.x);
                    p.dst[0] = p.source(1)[0];
                    Outcome::Value(())
                },
                &[],
                "mc",
            )
            .unwrap();
        assert!(ok);
        assert_eq!(dst.get(1, 1, 0), 3.0);

        let err = dispatcher
            .invoke_render_op_serial(&mut dst, &mut context, |_, _| Outcome::Decline, &[], false, "r")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CallbackAbort);

        let ok = dispatcher
            .invoke_render_cond_op_serial(
                &mut dst,
                &mut context,
                |_, p| Outcome::Value(Conditional { value: 4.0, apply: p.pos.x == 0 }),
                &[],
                "rc",
            )
            .unwrap();
        assert!(ok);
        assert_eq!(dst.get(0, 1, 0), 4.0);
        assert_eq!(dst.get(1, 1, 0), 3.0);
        assert!(!dispatcher.budget().is_serial());
    }
}
