//! Wire types shared between the monitor client core and its collaborators.

pub mod domain;
pub mod error;
pub mod protocol;
