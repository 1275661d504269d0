use std::sync::Arc;

use clap::Parser;
use indicatif::MultiProgress;

use error::RetagError;
use image_ref::{ensure_same_registry, ImageRef};
use registry::ops::{ActionsTaken, RequestState};
use registry::Credentials;

#[derive(Parser, Debug)]
#[clap(
    name = "retag app",
    about = "Retag an image within a registry by mounting its blobs into the destination repository"
)]
pub struct Opt {
    /// Talk plain http to the registry instead of https.
    #[clap(long)]
    pub insecure: bool,

    /// User for the token exchange.
    #[clap(long, env = "RETAG_USER", default_value = "")]
    pub user: String,

    /// Password for the token exchange.
    #[clap(long = "pass", env = "RETAG_PASS", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Log every request and response, `RUST_LOG` still wins when set.
    #[clap(long)]
    pub debug: bool,

    /// How many blobs may be checked and mounted at the same time.
    #[clap(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub parallelism: u16,

    /// Source image, `registry/repository[:tag]`.
    pub source: String,

    /// Destination image on the same registry, `registry/repository[:tag]`.
    pub destination: String,
}

impl Opt {
    pub fn scheme(&self) -> &'static str {
        if self.insecure {
            "http"
        } else {
            "https"
        }
    }

    pub fn credentials(&self) -> Option<Credentials> {
        if self.user.is_empty() {
            None
        } else {
            Some(Credentials {
                user: self.user.clone(),
                password: self.password.clone(),
            })
        }
    }
}

pub async fn retag_main(
    opt: Opt,
    progress: Arc<MultiProgress>,
) -> Result<ActionsTaken, RetagError> {
    tracing::debug!("insecure: {}", opt.insecure);
    let source = ImageRef::parse(&opt.source)?;
    let destination = ImageRef::parse(&opt.destination)?;
    tracing::debug!("source: {}, destination: {}", source, destination);
    ensure_same_registry(&source, &destination)?;

    let credentials = opt.credentials();
    let registries = registry::connect(
        opt.scheme(),
        source.registry(),
        source.repository(),
        destination.repository(),
        credentials.as_ref(),
    )
    .await?;

    let request_state = RequestState {
        source_registry: registries.source,
        destination_registry: registries.destination,
        progress,
    };

    let actions_taken = registry::ops::retag(
        &request_state,
        source.tag(),
        destination.tag(),
        opt.parallelism as usize,
    )
    .await?;
    tracing::info!("Image successfully retagged {} -> {}", source, destination);
    Ok(actions_taken)
}

pub mod container_specs;
pub mod error;
pub mod image_ref;
pub mod registry;
