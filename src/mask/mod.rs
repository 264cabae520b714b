//! The masking engine: boolean arrays in, boolean arrays out.
//!
//! * [`slices`] – true runs of a mask as half-open parts
//! * [`trigger`] – start/stop trigger pairing
//! * [`duration`] – part length policies
//! * [`expr`] – condition expressions over channels

pub mod duration;
pub mod expr;
pub mod slices;
pub mod trigger;

pub use duration::{apply_duration, DurationKind, DurationRule};
pub use expr::{combine, evaluate, Binder, Condition};
pub use slices::{slices, Part};
pub use trigger::{trigger_mask, Gate};
