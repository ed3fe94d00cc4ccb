//! OLE2 file writing module
//!
//! Builds compound documents in memory and lays them out on write.
//!
//! # Implementation Notes
//!
//! Sector layout follows Apache POI's POIFS writer and the Microsoft
//! Compound File Binary Format.
//!
//! - Streams of 4096 bytes or more get regular sectors; smaller ones are
//!   packed into the mini stream
//! - Every chain is contiguous, so a stream occupies one run of sectors
//! - The FAT and DIFAT are sized last, once every other sector is known
//!
//! # Performance
//!
//! The whole file is assembled from in-memory buffers. Stream contents are
//! copied once into the writer and once more into the output, which suits
//! workbooks of a few megabytes.

/// FAT (File Allocation Table) generation
mod fat;

/// MiniFAT (Mini File Allocation Table) generation
mod minifat;

/// DIFAT (Double Indirect FAT) generation
mod difat;

/// Directory tree generation
mod directory;

/// OLE2 header generation
mod header;

/// Core OLE writer implementation
mod core;

#[cfg(test)]
mod tests;

pub use core::OleWriter;
