pub mod manifest;

pub use manifest::{BlobDescriptor, Image, Manifest};
