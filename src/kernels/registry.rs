//! Kernel registry for managing named numeric kernels.

use crate::core::error::{ProcessError, ProcessResult};
use crate::core::image::ImageDescriptor;
use crate::core::params::ArgValue;
use crate::execution::callback::{
    ColorPoint, Conditional, MultiColorPoint, MultiPoint, Outcome, RenderPoint, UnaryPoint,
};
use crate::execution::dispatcher::Dispatcher;
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Unary point kernel.
pub type UnaryPointKernel = Arc<dyn Fn(UnaryPoint<'_>) -> Outcome<f32> + Send + Sync>;
/// Unary color kernel.
pub type UnaryColorKernel = Arc<dyn Fn(ColorPoint<'_>) -> Outcome<()> + Send + Sync>;
/// Multi-image point kernel.
pub type MultiPointKernel = Arc<dyn Fn(MultiPoint<'_>) -> Outcome<f32> + Send + Sync>;
/// Multi-image color kernel.
pub type MultiColorKernel = Arc<dyn Fn(MultiColorPoint<'_>) -> Outcome<()> + Send + Sync>;
/// Render kernel.
pub type RenderKernel = Arc<dyn Fn(RenderPoint<'_>) -> Outcome<f32> + Send + Sync>;
/// Conditional render kernel.
pub type RenderCondKernel = Arc<dyn Fn(RenderPoint<'_>) -> Outcome<Conditional> + Send + Sync>;

/// Extra parameter validation, run before any pixel is touched.
pub type ParamCheck = Arc<dyn Fn(&[f32]) -> Result<(), String> + Send + Sync>;

/// Which dispatcher operation a kernel plugs into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signature {
    UnaryPoint,
    UnaryColor,
    MultiPoint,
    MultiColor,
    Render,
    RenderCond,
}

impl Signature {
    pub fn name(self) -> &'static str {
        match self {
            Signature::UnaryPoint => "unary point",
            Signature::UnaryColor => "unary color",
            Signature::MultiPoint => "multi point",
            Signature::MultiColor => "multi color",
            Signature::Render => "render",
            Signature::RenderCond => "conditional render",
        }
    }

    /// Render kernels write into their single image and read no sources.
    pub fn is_render(self) -> bool {
        matches!(self, Signature::Render | Signature::RenderCond)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A kernel, tagged with its signature.
#[derive(Clone)]
pub enum Kernel {
    UnaryPoint(UnaryPointKernel),
    UnaryColor(UnaryColorKernel),
    MultiPoint(MultiPointKernel),
    MultiColor(MultiColorKernel),
    Render(RenderKernel),
    RenderCond(RenderCondKernel),
}

impl Kernel {
    pub fn unary_point<F>(f: F) -> Self
    where
        F: Fn(UnaryPoint<'_>) -> Outcome<f32> + Send + Sync + 'static,
    {
        Kernel::UnaryPoint(Arc::new(f))
    }

    pub fn unary_color<F>(f: F) -> Self
    where
        F: Fn(ColorPoint<'_>) -> Outcome<()> + Send + Sync + 'static,
    {
        Kernel::UnaryColor(Arc::new(f))
    }

    pub fn multi_point<F>(f: F) -> Self
    where
        F: Fn(MultiPoint<'_>) -> Outcome<f32> + Send + Sync + 'static,
    {
        Kernel::MultiPoint(Arc::new(f))
    }

    pub fn multi_color<F>(f: F) -> Self
    where
        F: Fn(MultiColorPoint<'_>) -> Outcome<()> + Send + Sync + 'static,
    {
        Kernel::MultiColor(Arc::new(f))
    }

    pub fn render<F>(f: F) -> Self
    where
        F: Fn(RenderPoint<'_>) -> Outcome<f32> + Send + Sync + 'static,
    {
        Kernel::Render(Arc::new(f))
    }

    pub fn render_cond<F>(f: F) -> Self
    where
        F: Fn(RenderPoint<'_>) -> Outcome<Conditional> + Send + Sync + 'static,
    {
        Kernel::RenderCond(Arc::new(f))
    }

    pub fn signature(&self) -> Signature {
        match self {
            Kernel::UnaryPoint(_) => Signature::UnaryPoint,
            Kernel::UnaryColor(_) => Signature::UnaryColor,
            Kernel::MultiPoint(_) => Signature::MultiPoint,
            Kernel::MultiColor(_) => Signature::MultiColor,
            Kernel::Render(_) => Signature::Render,
            Kernel::RenderCond(_) => Signature::RenderCond,
        }
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kernel({})", self.signature())
    }
}

/// A named kernel parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelParam {
    pub name: String,
    pub description: String,
}

/// Descriptive data about a kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelMetadata {
    /// Unique identifier used for lookup.
    pub id: String,
    /// Display name.
    pub name: String,
    pub description: String,
    /// Parameters in the order the kernel reads them.
    pub params: Vec<KernelParam>,
    /// Accepted number of source images.
    pub sources: RangeInclusive<usize>,
}

impl KernelMetadata {
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> KernelMetadataBuilder {
        KernelMetadataBuilder {
            metadata: KernelMetadata {
                id: id.into(),
                name: name.into(),
                description: String::new(),
                params: Vec::new(),
                sources: 1..=1,
            },
        }
    }
}

/// Builder for [`KernelMetadata`].
#[derive(Debug)]
pub struct KernelMetadataBuilder {
    metadata: KernelMetadata,
}

impl KernelMetadataBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = description.into();
        self
    }

    pub fn param(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.metadata.params.push(KernelParam {
            name: name.into(),
            description: description.into(),
        });
        self
    }

    pub fn sources(mut self, sources: RangeInclusive<usize>) -> Self {
        self.metadata.sources = sources;
        self
    }

    pub fn build(self) -> KernelMetadata {
        self.metadata
    }
}

/// Registry entry containing the kernel and its metadata.
#[derive(Clone)]
pub struct KernelEntry {
    pub kernel: Kernel,
    pub metadata: KernelMetadata,
    /// Optional extra parameter validation.
    pub check: Option<ParamCheck>,
}

impl KernelEntry {
    pub fn signature(&self) -> Signature {
        self.kernel.signature()
    }
}

impl fmt::Debug for KernelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelEntry")
            .field("kernel", &self.kernel)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Registry of named numeric kernels.
///
/// Each kernel is a pure function of its point argument, tagged with the
/// dispatcher signature it fits. [`KernelRegistry::apply`] validates the
/// kernel's parameters and routes it to the matching dispatcher operation.
#[derive(Debug, Default)]
pub struct KernelRegistry {
    kernels: IndexMap<String, KernelEntry>,
    signatures: IndexMap<Signature, Vec<String>>,
}

impl KernelRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with the built-in kernels.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::kernels::builtin::register_all(&mut registry);
        registry
    }

    /// Register a kernel. A kernel with the same id is replaced.
    pub fn register(&mut self, metadata: KernelMetadata, kernel: Kernel) {
        self.insert(metadata, kernel, None);
    }

    /// Register a kernel with an extra parameter check.
    pub fn register_with_check<C>(&mut self, metadata: KernelMetadata, kernel: Kernel, check: C)
    where
        C: Fn(&[f32]) -> Result<(), String> + Send + Sync + 'static,
    {
        self.insert(metadata, kernel, Some(Arc::new(check)));
    }

    fn insert(&mut self, metadata: KernelMetadata, kernel: Kernel, check: Option<ParamCheck>) {
        let id = metadata.id.clone();
        let signature = kernel.signature();
        if self.contains(&id) {
            self.unregister(&id);
        }

        self.kernels.insert(
            id.clone(),
            KernelEntry {
                kernel,
                metadata,
                check,
            },
        );
        self.signatures.entry(signature).or_default().push(id);
    }

    pub fn get_metadata(&self, id: &str) -> Option<&KernelMetadata> {
        self.kernels.get(id).map(|e| &e.metadata)
    }

    pub fn get_entry(&self, id: &str) -> Option<&KernelEntry> {
        self.kernels.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.kernels.contains_key(id)
    }

    /// All registered kernel ids, in registration order.
    pub fn kernel_ids(&self) -> impl Iterator<Item = &str> {
        self.kernels.keys().map(|s| s.as_str())
    }

    pub fn kernels(&self) -> impl Iterator<Item = (&str, &KernelEntry)> {
        self.kernels.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn kernels_by_signature(&self, signature: Signature) -> Vec<&str> {
        self.signatures
            .get(&signature)
            .map(|ids| ids.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn signatures(&self) -> impl Iterator<Item = &Signature> {
        self.signatures.keys()
    }

    pub fn unregister(&mut self, id: &str) -> bool {
        match self.kernels.shift_remove(id) {
            Some(entry) => {
                if let Some(ids) = self.signatures.get_mut(&entry.signature()) {
                    ids.retain(|i| i != id);
                }
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    /// Look up a kernel and check `params` against it.
    ///
    /// Too few parameters, or a failing extra check, is an invalid `params`
    /// argument.
    pub fn validate_params(&self, id: &str, params: &[f32]) -> ProcessResult<&KernelEntry> {
        let entry = self
            .kernels
            .get(id)
            .ok_or_else(|| ProcessError::invalid_argument("kernel", format!("unknown kernel '{}'", id)))?;

        let expected = entry.metadata.params.len();
        if params.len() < expected {
            let names: Vec<&str> = entry.metadata.params.iter().map(|p| p.name.as_str()).collect();
            return Err(ProcessError::invalid_argument(
                "params",
                format!(
                    "'{}' expects {} parameters ({}), got {}",
                    id,
                    expected,
                    names.join(", "),
                    params.len()
                ),
            ));
        }
        if let Some(check) = &entry.check {
            check(params).map_err(|reason| {
                ProcessError::invalid_argument("params", format!("'{}': {}", id, reason))
            })?;
        }
        Ok(entry)
    }

    /// Run kernel `id` over `dst`.
    ///
    /// Point and color kernels read `sources`; render kernels ignore them and
    /// overwrite `dst`.
    pub fn apply(
        &self,
        dispatcher: &Dispatcher,
        id: &str,
        sources: &[&ImageDescriptor],
        dst: &mut ImageDescriptor,
        params: &[f32],
    ) -> ProcessResult<bool> {
        self.run(dispatcher, id, sources, dst, params, false)
    }

    /// Run render kernel `id`, adding its values to the samples of `image`.
    pub fn accumulate(
        &self,
        dispatcher: &Dispatcher,
        id: &str,
        image: &mut ImageDescriptor,
        params: &[f32],
    ) -> ProcessResult<bool> {
        let signature = self.validate_params(id, params)?.signature();
        if signature != Signature::Render {
            return Err(ProcessError::invalid_argument(
                "kernel",
                format!("'{}' is a {} kernel, only render kernels accumulate", id, signature),
            ));
        }
        self.run(dispatcher, id, &[], image, params, true)
    }

    fn run(
        &self,
        dispatcher: &Dispatcher,
        id: &str,
        sources: &[&ImageDescriptor],
        dst: &mut ImageDescriptor,
        params: &[f32],
        plus: bool,
    ) -> ProcessResult<bool> {
        let entry = self.validate_params(id, params)?;
        let accepted = if entry.signature().is_render() {
            0..=0
        } else {
            entry.metadata.sources.clone()
        };
        if !accepted.contains(&sources.len()) {
            return Err(ProcessError::invalid_argument(
                "src_images",
                format!(
                    "'{}' takes {} to {} source images, got {}",
                    id,
                    accepted.start(),
                    accepted.end(),
                    sources.len()
                ),
            ));
        }
        debug!("kernel {} ({}) with {} parameters", id, entry.signature(), params.len());

        match &entry.kernel {
            Kernel::UnaryPoint(kernel) => dispatcher.invoke_unary_point_op(
                first_source(id, sources)?,
                dst,
                &**kernel,
                |kernel, point| kernel(point),
                params,
                id,
            ),
            Kernel::UnaryColor(kernel) => dispatcher.invoke_unary_point_color_op(
                first_source(id, sources)?,
                dst,
                &**kernel,
                |kernel, point| kernel(point),
                params,
                id,
            ),
            Kernel::MultiPoint(kernel) => dispatcher.invoke_multi_point_op(
                &ArgValue::images(sources),
                dst,
                &**kernel,
                |kernel, point| kernel(point),
                params,
                id,
            ),
            Kernel::MultiColor(kernel) => dispatcher.invoke_multi_point_color_op(
                &ArgValue::images(sources),
                dst,
                &**kernel,
                |kernel, point| kernel(point),
                params,
                id,
            ),
            Kernel::Render(kernel) => dispatcher.invoke_render_op(
                dst,
                &**kernel,
                |kernel, point| kernel(point),
                params,
                plus,
                id,
            ),
            Kernel::RenderCond(kernel) => dispatcher.invoke_render_cond_op(
                dst,
                &**kernel,
                |kernel, point| kernel(point),
                params,
                id,
            ),
        }
    }
}

/// Unary kernels need exactly one image even if their metadata admits none.
fn first_source<'a>(
    id: &str,
    sources: &[&'a ImageDescriptor],
) -> ProcessResult<&'a ImageDescriptor> {
    sources.first().copied().ok_or_else(|| {
        ProcessError::invalid_argument("src_images", format!("'{}' needs a source image", id))
    })
}
