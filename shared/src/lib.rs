//! Shared components and utilities for galcube modules.
//!
//! This crate holds the array and CLI primitives the cube engine builds on:
//! image-plane convolution with Gaussian kernels, deterministic seeding for
//! parallel work, and command-line range arguments.

pub mod algo;
pub mod image_proc;
pub mod range_arg;
