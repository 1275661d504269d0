use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::Digest;

pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";

#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Default, Clone)]
pub struct BlobDescriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub size: u64,
    pub digest: String,
}

/// Schema 2 image manifest. This is only a view used to find the blobs an
/// image refers to, the bytes that get republished are kept in [`Image`].
#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Clone)]
pub struct Manifest {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u16,

    #[serde(rename = "mediaType", default)]
    pub media_type: Option<String>,

    pub config: BlobDescriptor,

    pub layers: Vec<BlobDescriptor>,
}

impl Manifest {
    pub fn parse(manifest_bytes: &[u8]) -> Result<Manifest, serde_json::Error> {
        serde_json::from_slice(manifest_bytes)
    }
}

/// An image as fetched from the source repository.
#[derive(Debug, Clone)]
pub struct Image {
    pub layers: Vec<String>,
    pub config: String,
    pub manifest: Manifest,
    raw: Bytes,
    digest: String,
}

impl Image {
    pub fn from_manifest_bytes(raw: Bytes) -> Result<Image, serde_json::Error> {
        let manifest = Manifest::parse(&raw)?;
        let layers = manifest.layers.iter().map(|l| l.digest.clone()).collect();
        let config = manifest.config.digest.clone();
        let digest = sha256_digest(&raw);
        Ok(Image {
            layers,
            config,
            manifest,
            raw,
            digest,
        })
    }

    /// Exactly what the source registry served us.
    pub fn raw_manifest(&self) -> &Bytes {
        &self.raw
    }

    /// `sha256:<hex>` of the raw manifest, i.e. the manifest digest any
    /// registry will compute for it.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Every blob the destination needs, layers first in manifest order and
    /// the config last.
    pub fn blobs(&self) -> Vec<BlobDescriptor> {
        let mut blobs = self.manifest.layers.clone();
        blobs.push(self.manifest.config.clone());
        blobs
    }
}

pub fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{:x}", sha2::Sha256::digest(data))
}
