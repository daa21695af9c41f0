//! # Carton
//!
//! A single-artifact bundle format: one structured manifest plus any
//! number of binary resources, packed into a tar stream that can be
//! produced and consumed without ever touching a filesystem or holding
//! a whole resource in memory.
//!
//! ## Layout
//!
//! Every bundle is a plain tar archive with a fixed entry order:
//!
//! 1. `contents.json` - version, bundle type, the caller's manifest
//!    payload, and a descriptor (id, size, digest) per resource.
//! 2. `contents.sig` - SHA-256 of the `contents.json` bytes, plus an
//!    optional detached Ed25519 signature over them.
//! 3. `resources/<digest-hex>` - the resource payloads, stored under
//!    their digest so identical content is written exactly once.
//!
//! ## Key Types
//!
//! - [`WritableBundle`] - streaming producer; declare descriptors up
//!   front, feed each resource as a byte stream, then finalize.
//! - [`ReadableBundle`] - streaming consumer; verifies the header
//!   entries before exposing the manifest, then hands out each
//!   resource as a digest-checked stream in storage order.
//! - [`Digest`] - typed `algorithm:hex` content address.
//! - [`RegistryClient`] - the contract for pushing bundle contents
//!   into a container registry; the core never implements it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use carton::{BundleOptions, ReadableBundle, WritableBundle};
//!
//! async fn example(descriptor: carton::ResourceDescriptor) {
//!     let mut buffer = Vec::new();
//!     let bundle = WritableBundle::new(
//!         &mut buffer,
//!         BundleOptions {
//!             bundle_type: "release@1".to_string(),
//!             manifest: vec!["app.img".to_string()],
//!             resources: vec![descriptor],
//!             sign: None,
//!         },
//!     )
//!     .await
//!     .unwrap();
//!     let payload = futures::stream::iter(vec![Ok(bytes::Bytes::from_static(b"..."))]);
//!     bundle.add_resource("app", payload).await.unwrap();
//!     bundle.finalize().await.unwrap();
//!     drop(bundle);
//!
//!     let mut reading: ReadableBundle<Vec<String>> =
//!         ReadableBundle::new(std::io::Cursor::new(buffer), "release@1", None);
//!     let _manifest = reading.manifest().await.unwrap();
//!     let mut resources = reading.resources().unwrap();
//!     while let Some(resource) = resources.next().await {
//!         let resource = resource.unwrap();
//!         let _bytes = resource.data.read_to_vec().await.unwrap();
//!     }
//! }
//! ```

pub(crate) mod archive;
pub mod contents;
pub mod digest;
pub(crate) mod entries;
pub mod error;
pub mod hasher;
pub mod readable;
pub mod registry;
pub mod signer;
pub mod writable;

pub use contents::{
    ContentsDocument, ResourceDescriptor, SignatureEnvelope, BUNDLE_VERSION, CONTENTS_JSON,
    CONTENTS_SIG, RESOURCES_DIR,
};
pub use digest::{Digest, DigestAlgorithm};
pub use error::{BundleError, ContentsError, DigestError, SignatureError};
pub use readable::{ReadableBundle, ResourceData, ResourceStream, VerifiedResource};
pub use registry::{
    BlobDescriptor, ByteStream, FetchedManifest, RegistryClient, RegistryCredentials,
    RegistryError, RegistryToken,
};
pub use writable::{BundleOptions, SignOptions, WritableBundle};
