//! Operation dispatch.
//!
//! This module drives user callbacks over images: the callback argument
//! types, the execution mode and thread budget, dispatcher options and the
//! dispatcher itself.

pub mod callback;
pub mod dispatcher;
pub mod mode;
pub mod options;

pub use callback::{
    ColorPoint, Conditional, MultiColorPoint, MultiPoint, Outcome, PixelPos, RenderPoint,
    UnaryPoint,
};
pub use dispatcher::Dispatcher;
pub use mode::{CallbackMode, SerialScope, ThreadBudget};
pub use options::DispatchOptions;
