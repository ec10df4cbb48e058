//! Hardware device drivers
//!
//! This module contains drivers for various hardware devices.

pub mod irq_sources;
