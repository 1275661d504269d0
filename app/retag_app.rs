use std::sync::Arc;

use clap::Parser;
use indicatif::MultiProgress;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use registry_retag::Opt;

// cargo run --bin retag-app -- --user bob --pass secret registry.example.com/team/app:1.2 registry.example.com/team/app:stable

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let opt = Opt::parse();

    let default_level = if opt.debug {
        "registry_retag=debug,retag_app=debug"
    } else {
        "registry_retag=info,retag_app=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mp = Arc::new(MultiProgress::new());
    mp.set_alignment(indicatif::MultiProgressAlignment::Bottom);

    let actions_taken = registry_retag::retag_main(opt, mp).await?;
    println!("Image retagged, actions taken:\n{}", actions_taken);
    Ok(())
}
