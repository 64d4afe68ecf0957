//! Symmetric request-signature verification.
//!
//! A client attaches `base64(json(package))` to a request header. The server
//! rebuilds the same seven-field package from what it observed and accepts the
//! request only if both encode to identical bytes.
//!
//! # Main types
//!
//! - [`SignatureProtocol`] — Entry point: version dispatch and verification.
//! - [`CheckerRegistry`] — `(version, name)` → checker factory.
//! - [`SignatureChecker`] / [`AuthChecker`] — Per-version verification.
//! - [`SignaturePackage`] — The decoded seven-field package.
//! - [`RequestContext`] / [`StaticRequest`] — Request data the checker reads.
//! - [`PackageSigner`] — Client-side package construction.

/// Per-version checkers.
pub mod checker;
/// Deterministic encoding primitives.
pub mod codec;
/// The signed package type.
pub mod package;
/// Verification entry point.
pub mod protocol;
/// Checker registry.
pub mod registry;
/// Request access.
pub mod request;
/// Client-side signing.
pub mod signer;
/// Protocol versions.
pub mod version;

pub use checker::{AuthChecker, CheckContext, SignatureChecker, CLOCK_SKEW_TOLERANCE_SECS};
pub use package::{SignaturePackage, PACKAGE_KEYS};
pub use protocol::SignatureProtocol;
pub use registry::{CheckerFactory, CheckerRegistry};
pub use request::{RequestContext, StaticRequest};
pub use signer::PackageSigner;
pub use version::ApiVersion;
