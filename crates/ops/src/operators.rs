//! The closed set of operator kinds dispatched by [`crate::operator::OperatorKind`].

pub mod aggregate;
pub mod emit;
pub mod filter;
pub mod join;
pub mod offer_take;
pub mod project;
pub mod scan;
pub mod write;
