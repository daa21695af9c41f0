//! # Carton Testkit
//!
//! Testing utilities for the carton bundle format.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Keys**: throwaway Ed25519 keypairs, PEM-encoded the way the
//!   signing API expects them
//! - **Streams**: canned byte-stream suppliers, including failing ones
//! - **Bundles**: a raw tar builder for assembling malformed or
//!   hand-tuned bundles byte by byte
//!
//! ## Keys
//!
//! ```rust
//! use carton_testkit::keys::generate_keypair;
//!
//! let keypair = generate_keypair();
//! assert!(keypair.private_pem.contains("PRIVATE KEY"));
//! assert!(keypair.public_pem.contains("PUBLIC KEY"));
//! ```
//!
//! ## Raw Bundles
//!
//! The high-level writer refuses to produce invalid output, so
//! corruption tests assemble archives directly:
//!
//! ```rust
//! use carton_testkit::bundles::RawBundleBuilder;
//!
//! let archive = RawBundleBuilder::new()
//!     .entry("contents.json", b"not even json")
//!     .entry("contents.sig", b"{}")
//!     .build();
//! assert!(!archive.is_empty());
//! ```

pub mod bundles;
pub mod keys;
pub mod streams;

pub use bundles::{descriptor, RawBundleBuilder};
pub use keys::{generate_keypair, TestKeypair};
pub use streams::{byte_stream, chunked_stream, failing_stream};
