//! Channel packs: column-oriented records with a boolean mask over them.
//!
//! Channels are loaded into a [`ChannelStore`], conditions are evaluated
//! into a mask, and the mask's true runs ("parts") drive how data is read
//! back out.

pub mod config;
pub mod data;
pub mod error;
pub mod mask;

pub use data::filter::{Category, Conditions};
pub use data::model::{Channel, Value};
pub use data::store::{ChannelId, ChannelStore, NameStyle, Record, Records, View};
pub use error::{ErrorCategory, PackError, Result};
pub use mask::{DurationKind, DurationRule, Part};
