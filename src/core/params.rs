//! Host-neutral argument values and operation-scoped parameter arrays.
//!
//! A host runtime (a scripting binding, a CLI, a test) hands the core ordered
//! collections of [`ArgValue`]s. [`Marshaller::to_array`] turns such a
//! collection into a typed, owned [`ParameterArray`]. Every array is counted
//! in the marshaller's [`MarshalStats`] when allocated and again when dropped,
//! so a caller can observe that no array outlives a failed operation.

use crate::core::error::{ProcessError, ProcessResult};
use crate::core::image::ImageDescriptor;
use crate::validation::requirements::require_match_full;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A single value supplied by the host.
#[derive(Debug, Clone, Copy)]
pub enum ArgValue<'a> {
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    Image(&'a ImageDescriptor),
}

impl<'a> ArgValue<'a> {
    /// Wrap a list of images as host values.
    pub fn images(images: &[&'a ImageDescriptor]) -> Vec<ArgValue<'a>> {
        images.iter().map(|&image| ArgValue::Image(image)).collect()
    }

    /// Wrap a list of numbers as host values.
    pub fn numbers(values: &[f64]) -> Vec<ArgValue<'a>> {
        values.iter().map(|&v| ArgValue::Number(v)).collect()
    }

    /// Wrap a list of integers as host values.
    pub fn integers(values: &[i64]) -> Vec<ArgValue<'a>> {
        values.iter().map(|&v| ArgValue::Integer(v)).collect()
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ArgValue::Nil => "nil",
            ArgValue::Boolean(_) => "boolean",
            ArgValue::Integer(_) => "integer",
            ArgValue::Number(_) => "number",
            ArgValue::Image(_) => "image",
        }
    }
}

/// Where element 0 of a marshaled array comes from.
///
/// With `One` the array mirrors the collection exactly. With `Zero` the array
/// reserves one extra leading slot (index 0 on the host side, which a 1-based
/// host list never fills), so an `N`-element collection yields `N + 1`
/// elements with the collection starting at index 1. The reserved slot is
/// zero-filled. Element types with no zero value (image handles) reject `Zero`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexBase {
    Zero,
    One,
}

/// Element types a [`ParameterArray`] can hold.
pub trait ArrayElement<'a>: Sized {
    /// Name used in diagnostics.
    const NAME: &'static str;

    fn from_value(value: &ArgValue<'a>) -> Option<Self>;

    fn to_value(&self) -> ArgValue<'a>;

    /// Value of the reserved slot under [`IndexBase::Zero`].
    fn padding() -> Option<Self>;
}

impl<'a> ArrayElement<'a> for i32 {
    const NAME: &'static str = "integer";

    fn from_value(value: &ArgValue<'a>) -> Option<Self> {
        match *value {
            ArgValue::Integer(v) => i32::try_from(v).ok(),
            ArgValue::Number(v) if v.is_finite() => i32::try_from(v.trunc() as i64).ok(),
            _ => None,
        }
    }

    fn to_value(&self) -> ArgValue<'a> {
        ArgValue::Integer(*self as i64)
    }

    fn padding() -> Option<Self> {
        Some(0)
    }
}

impl<'a> ArrayElement<'a> for u64 {
    const NAME: &'static str = "unsigned integer";

    fn from_value(value: &ArgValue<'a>) -> Option<Self> {
        match *value {
            ArgValue::Integer(v) => u64::try_from(v).ok(),
            ArgValue::Number(v) if v.is_finite() && v >= 0.0 => Some(v.trunc() as u64),
            _ => None,
        }
    }

    fn to_value(&self) -> ArgValue<'a> {
        ArgValue::Number(*self as f64)
    }

    fn padding() -> Option<Self> {
        Some(0)
    }
}

impl<'a> ArrayElement<'a> for f32 {
    const NAME: &'static str = "number";

    fn from_value(value: &ArgValue<'a>) -> Option<Self> {
        match *value {
            ArgValue::Integer(v) => Some(v as f32),
            ArgValue::Number(v) => Some(v as f32),
            _ => None,
        }
    }

    fn to_value(&self) -> ArgValue<'a> {
        ArgValue::Number(*self as f64)
    }

    fn padding() -> Option<Self> {
        Some(0.0)
    }
}

impl<'a> ArrayElement<'a> for &'a ImageDescriptor {
    const NAME: &'static str = "image";

    fn from_value(value: &ArgValue<'a>) -> Option<Self> {
        match *value {
            ArgValue::Image(image) => Some(image),
            _ => None,
        }
    }

    fn to_value(&self) -> ArgValue<'a> {
        ArgValue::Image(*self)
    }

    fn padding() -> Option<Self> {
        None
    }
}

/// Allocation and release counters for marshaled arrays.
#[derive(Debug, Default)]
pub struct MarshalStats {
    allocated: AtomicUsize,
    released: AtomicUsize,
}

impl MarshalStats {
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Arrays allocated and not yet dropped.
    pub fn live(&self) -> usize {
        self.allocated().saturating_sub(self.released())
    }
}

/// An owned, homogeneous array built for one operation invocation.
///
/// The array is released when dropped; ownership passes to the caller only
/// when an operation returns it.
pub struct ParameterArray<T> {
    values: Vec<T>,
    stats: Option<Arc<MarshalStats>>,
}

impl<T> ParameterArray<T> {
    /// An untracked array holding `values`.
    pub fn from_vec(values: Vec<T>) -> Self {
        Self { values, stats: None }
    }

    /// The absent array: no elements, nothing allocated.
    pub fn empty() -> Self {
        Self::from_vec(Vec::new())
    }

    fn tracked(capacity: usize, stats: &Arc<MarshalStats>) -> Self {
        stats.allocated.fetch_add(1, Ordering::SeqCst);
        Self {
            values: Vec::with_capacity(capacity),
            stats: Some(Arc::clone(stats)),
        }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    pub fn into_vec(mut self) -> Vec<T> {
        std::mem::take(&mut self.values)
    }

    /// Convert back to host values using the same index convention as
    /// [`Marshaller::to_array`]: under [`IndexBase::Zero`] element 0 is the
    /// reserved slot and is not part of the host list.
    pub fn to_values<'a>(&self, base: IndexBase) -> Vec<ArgValue<'a>>
    where
        T: ArrayElement<'a>,
    {
        let skip = usize::from(base == IndexBase::Zero);
        self.values.iter().skip(skip).map(|v| v.to_value()).collect()
    }
}

impl<T> Deref for ParameterArray<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.values
    }
}

impl<T> Drop for ParameterArray<T> {
    fn drop(&mut self) {
        if let Some(stats) = &self.stats {
            stats.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ParameterArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterArray")
            .field("values", &self.values)
            .field("tracked", &self.stats.is_some())
            .finish()
    }
}

/// Builds [`ParameterArray`]s from host collections and accounts for them.
#[derive(Debug, Clone, Default)]
pub struct Marshaller {
    stats: Arc<MarshalStats>,
}

impl Marshaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an existing set of counters.
    pub fn with_stats(stats: Arc<MarshalStats>) -> Self {
        Self { stats }
    }

    pub fn stats(&self) -> &Arc<MarshalStats> {
        &self.stats
    }

    /// Marshal a required collection. An absent collection is an `InvalidArgument`.
    pub fn to_array<'a, T: ArrayElement<'a>>(
        &self,
        collection: Option<&[ArgValue<'a>]>,
        base: IndexBase,
        argument: &str,
    ) -> ProcessResult<ParameterArray<T>> {
        let collection = collection
            .ok_or_else(|| ProcessError::invalid_argument(argument, "must be a table"))?;
        self.marshal(collection, base, argument)
    }

    /// Marshal an optional collection. An absent collection yields an empty,
    /// untracked array.
    pub fn to_array_opt<'a, T: ArrayElement<'a>>(
        &self,
        collection: Option<&[ArgValue<'a>]>,
        base: IndexBase,
        argument: &str,
    ) -> ProcessResult<ParameterArray<T>> {
        match collection {
            Some(collection) => self.marshal(collection, base, argument),
            None => Ok(ParameterArray::empty()),
        }
    }

    /// Marshal a list of image handles and require that every image matches
    /// the first in size, data type and color space.
    ///
    /// The array is released before a mismatch is reported.
    pub fn to_image_array<'a>(
        &self,
        collection: Option<&[ArgValue<'a>]>,
        argument: &str,
    ) -> ProcessResult<ParameterArray<&'a ImageDescriptor>> {
        let images: ParameterArray<&ImageDescriptor> =
            self.to_array(collection, IndexBase::One, argument)?;
        if let Some((first, rest)) = images.split_first() {
            for image in rest {
                require_match_full(first, image)?;
            }
        }
        Ok(images)
    }

    fn marshal<'a, T: ArrayElement<'a>>(
        &self,
        collection: &[ArgValue<'a>],
        base: IndexBase,
        argument: &str,
    ) -> ProcessResult<ParameterArray<T>> {
        let count = collection.len() + usize::from(base == IndexBase::Zero);
        let mut array = ParameterArray::tracked(count, &self.stats);

        if base == IndexBase::Zero {
            let padding = T::padding().ok_or_else(|| {
                ProcessError::invalid_argument(
                    argument,
                    format!("{} arrays must start at index 1", T::NAME),
                )
            })?;
            array.values.push(padding);
        }

        for (i, value) in collection.iter().enumerate() {
            let element = T::from_value(value).ok_or_else(|| {
                ProcessError::invalid_argument(
                    format!("{}[{}]", argument, i + 1),
                    format!("expected {}, got {}", T::NAME, value.type_name()),
                )
            })?;
            array.values.push(element);
        }

        debug_assert_eq!(array.len(), count);
        Ok(array)
    }
}

/// Parse an 8-character bit mask such as `"11000110"`; the first character
/// is the most significant bit.
pub fn check_mask(mask: &str) -> ProcessResult<u8> {
    if mask.chars().count() != 8 {
        return Err(ProcessError::invalid_argument(
            "mask",
            "invalid mask, must have 8 elements",
        ));
    }
    mask.chars().try_fold(0u8, |acc, c| match c {
        '0' => Ok(acc << 1),
        '1' => Ok((acc << 1) | 1),
        _ => Err(ProcessError::invalid_argument(
            "mask",
            "invalid mask, must have 0s or 1s only",
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::types::{ColorSpace, DataType};

    #[test]
    fn test_base_one_keeps_length() {
        let marshaller = Marshaller::new();
        let values = ArgValue::integers(&[4, 5, 6]);
        let array: ParameterArray<i32> =
            marshaller.to_array(Some(&values), IndexBase::One, "kernel").unwrap();
        assert_eq!(array.as_slice(), &[4, 5, 6]);
    }

    #[test]
    fn test_base_zero_reserves_leading_slot() {
        let marshaller = Marshaller::new();
        let values = ArgValue::numbers(&[1.5, 2.5]);
        let array: ParameterArray<f32> =
            marshaller.to_array(Some(&values), IndexBase::Zero, "weights").unwrap();
        assert_eq!(array.as_slice(), &[0.0, 1.5, 2.5]);
    }

    #[test]
    fn test_required_absent_fails() {
        let marshaller = Marshaller::new();
        let err = marshaller
            .to_array::<u64>(None, IndexBase::One, "histogram")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(marshaller.stats().allocated(), 0);
    }

    #[test]
    fn test_optional_absent_is_empty() {
        let marshaller = Marshaller::new();
        let array = marshaller
            .to_array_opt::<f32>(None, IndexBase::Zero, "params")
            .unwrap();
        assert!(array.is_empty());
        assert_eq!(marshaller.stats().allocated(), 0);
    }

    #[test]
    fn test_bad_element_releases_array() {
        let marshaller = Marshaller::new();
        let values = vec![ArgValue::Integer(1), ArgValue::Boolean(true)];
        let err = marshaller
            .to_array::<i32>(Some(&values), IndexBase::One, "sizes")
            .unwrap_err();
        assert!(matches!(err, ProcessError::InvalidArgument { ref argument, .. } if argument == "sizes[2]"));
        assert_eq!(marshaller.stats().allocated(), 1);
        assert_eq!(marshaller.stats().live(), 0);
    }

    #[test]
    fn test_integer_out_of_range() {
        assert_eq!(i32::from_value(&ArgValue::Integer(i64::MAX)), None);
        assert_eq!(u64::from_value(&ArgValue::Integer(-1)), None);
        assert_eq!(i32::from_value(&ArgValue::Number(3.9)), Some(3));
    }

    #[test]
    fn test_images_reject_zero_base() {
        let image = ImageDescriptor::create(2, 2, ColorSpace::Gray, DataType::Byte).unwrap();
        let values = ArgValue::images(&[&image]);
        let marshaller = Marshaller::new();
        let err = marshaller
            .to_array::<&ImageDescriptor>(Some(&values), IndexBase::Zero, "images")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(marshaller.stats().live(), 0);
    }

    #[test]
    fn test_image_array_mismatch_is_released() {
        let a = ImageDescriptor::create(2, 2, ColorSpace::Gray, DataType::Byte).unwrap();
        let b = ImageDescriptor::create(2, 2, ColorSpace::Gray, DataType::Float).unwrap();
        let values = ArgValue::images(&[&a, &b]);
        let marshaller = Marshaller::new();
        let err = marshaller.to_image_array(Some(&values), "src").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataTypeMismatch);
        assert_eq!(marshaller.stats().live(), 0);
    }

    #[test]
    fn test_to_values_inverts_zero_base() {
        let marshaller = Marshaller::new();
        let values = ArgValue::integers(&[7, 8]);
        let array: ParameterArray<i32> =
            marshaller.to_array(Some(&values), IndexBase::Zero, "t").unwrap();
        let back = array.to_values(IndexBase::Zero);
        assert_eq!(back.len(), 2);
        assert!(matches!(back[0], ArgValue::Integer(7)));
    }

    #[test]
    fn test_check_mask() {
        assert_eq!(check_mask("11000110").unwrap(), 0b1100_0110);
        assert_eq!(check_mask("00000001").unwrap(), 1);
        assert_eq!(check_mask("1100011").unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(check_mask("1100011x").unwrap_err().kind(), ErrorKind::InvalidArgument);
    }
}
