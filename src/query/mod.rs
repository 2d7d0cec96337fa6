//! Query string -> raw query set -> validated query layer.

pub mod builder;
pub mod expression;
mod grammar;
pub mod parser;
pub mod raw;

pub use builder::QueryLayerBuilder;
pub use expression::*;
pub use parser::{default_operator_vocabulary, FilterOperator, QueryStringParser};
pub use raw::*;
