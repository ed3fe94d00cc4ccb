//! Helpers shared by the OLE and BIFF layers

pub mod binary;

pub use binary::{BinaryError, BinaryResult};
