use std::sync::Arc;

use console::style;
use futures::{StreamExt, TryStreamExt};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::container_specs::{BlobDescriptor, Image};
use crate::error::RetagError;

use super::Registry;

pub const BYTES_IN_MB: u64 = 1024 * 1024;
pub const BYTES_IN_GB: u64 = BYTES_IN_MB * 1024;

pub fn size_to_string(size: u64) -> String {
    let gb = size / BYTES_IN_GB;
    let mb = size / BYTES_IN_MB;
    if gb > 0 {
        let gb_flt = (gb as f64) + ((mb % 1024) as f64) / 1024_f64;
        format!("{} GB", gb_flt)
    } else {
        format!("{} MB", mb)
    }
}

#[derive(Default, Debug, PartialEq, Eq)]
pub struct ActionsTaken {
    already_present: usize,
    already_present_size: u64,

    mounted_from_source_repository: usize,
    mounted_from_source_repository_size: u64,
}

impl std::fmt::Display for ActionsTaken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lines = [
            format!(
                "Already present in destination:          {} entries, {}",
                self.already_present,
                size_to_string(self.already_present_size)
            ),
            format!(
                "Mounted from source repository:          {} entries, {}",
                self.mounted_from_source_repository,
                size_to_string(self.mounted_from_source_repository_size)
            ),
        ];
        write!(f, "{}", lines.join("\n"))
    }
}

impl ActionsTaken {
    pub fn merge(&mut self, other: &ActionsTaken) {
        self.already_present += other.already_present;
        self.already_present_size += other.already_present_size;
        self.mounted_from_source_repository += other.mounted_from_source_repository;
        self.mounted_from_source_repository_size += other.mounted_from_source_repository_size;
    }

    pub fn already_present(blob: &BlobDescriptor) -> ActionsTaken {
        ActionsTaken {
            already_present: 1,
            already_present_size: blob.size,
            ..Default::default()
        }
    }

    pub fn mounted_from_source_repository(blob: &BlobDescriptor) -> ActionsTaken {
        ActionsTaken {
            mounted_from_source_repository: 1,
            mounted_from_source_repository_size: blob.size,
            ..Default::default()
        }
    }

    pub fn already_present_count(&self) -> usize {
        self.already_present
    }

    pub fn mounted_count(&self) -> usize {
        self.mounted_from_source_repository
    }
}

pub struct RequestState {
    pub source_registry: Arc<dyn Registry>,
    pub destination_registry: Arc<dyn Registry>,
    pub progress: Arc<MultiProgress>,
}

/// Make `blob` present in the destination repository: a HEAD, then a mount
/// from the source repository only if the HEAD said 404.
pub async fn ensure_present(
    blob: &BlobDescriptor,
    request_state: &RequestState,
) -> Result<ActionsTaken, RetagError> {
    let message_style = ProgressStyle::with_template("{prefix:80} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    let pb = request_state.progress.add(ProgressBar::new(1));
    pb.set_style(message_style);
    pb.set_prefix(blob.digest.clone());

    pb.set_message("Checking destination presence");
    let present = match request_state
        .destination_registry
        .blob_exists(&blob.digest)
        .await
    {
        Ok(present) => present,
        Err(e) => {
            pb.abandon_with_message(format!("{} Presence check failed", style("x").red()));
            return Err(e);
        }
    };
    if present {
        tracing::info!("Blob {} already exists", blob.digest);
        pb.finish_with_message(format!("{}", style("✔").green()));
        return Ok(ActionsTaken::already_present(blob));
    }

    tracing::debug!("Blob {} does not exist, mounting", blob.digest);
    pb.set_message("Mounting from source repository");
    let source_registry_name = request_state.source_registry.registry_name();
    if let Err(e) = request_state
        .destination_registry
        .try_copy_from(&source_registry_name, &blob.digest)
        .await
    {
        pb.abandon_with_message(format!("{} Mount failed", style("x").red()));
        return Err(e);
    }
    tracing::info!("Blob {} mounted", blob.digest);
    pb.finish_with_message(format!("{}", style("✔").green()));
    Ok(ActionsTaken::mounted_from_source_repository(blob))
}

/// Run [`ensure_present`] for every blob of `image`, at most `parallelism`
/// at a time. Returns only once every blob is confirmed, stopping at the
/// first failure.
pub async fn ensure_all_present(
    image: &Image,
    request_state: &RequestState,
    parallelism: usize,
) -> Result<ActionsTaken, RetagError> {
    let blobs = image.blobs();
    let pb_main = request_state
        .progress
        .add(ProgressBar::new(blobs.len() as u64));

    let actions_taken = futures::stream::iter(blobs)
        .map(|blob| {
            let pb_main = pb_main.clone();
            async move {
                let r = ensure_present(&blob, request_state).await;
                pb_main.inc(1);
                r
            }
        })
        .buffered(parallelism.max(1))
        .try_fold(ActionsTaken::default(), |mut acc, actions| async move {
            acc.merge(&actions);
            Ok::<_, RetagError>(acc)
        })
        .await?;
    pb_main.finish();
    Ok(actions_taken)
}

/// Fetch `source_tag` from the source repository, get every blob it refers to
/// into the destination repository and publish the manifest as
/// `destination_tag`. The manifest is never published unless every blob made
/// it.
pub async fn retag(
    request_state: &RequestState,
    source_tag: &str,
    destination_tag: &str,
    parallelism: usize,
) -> Result<ActionsTaken, RetagError> {
    let image = request_state
        .source_registry
        .fetch_manifest(source_tag)
        .await?;
    tracing::info!(
        "Manifest retrieved and parsed, {} layers, digest {}",
        image.layers.len(),
        image.digest()
    );

    let actions_taken = ensure_all_present(&image, request_state, parallelism).await?;
    tracing::info!(
        "All referred to blobs have been ensured present, actions taken:\n{}",
        actions_taken
    );

    request_state
        .destination_registry
        .upload_manifest(&image, destination_tag)
        .await?;
    tracing::info!("Manifest uploaded");
    Ok(actions_taken)
}
