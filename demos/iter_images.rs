//! Walk the images of a Drive folder and report their sizes.
//!
//! ```sh
//! cargo run --example iter_images -- path/to/service-account.json FOLDER_ID
//! ```
use display_error_chain::DisplayErrorChain;
use futures::TryStreamExt;
use gdrive_images::GoogleDrive;
use std::process::ExitCode;
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    match do_main().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let error_chain = DisplayErrorChain::new(e.as_ref());
            tracing::error!(error.debug = ?e, error.chained = %error_chain, "execution failed");
            ExitCode::FAILURE
        }
    }
}

async fn do_main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let (Some(credentials), Some(folder_id)) = (args.next(), args.next()) else {
        return Err("usage: iter_images <credentials.json> <folder-id>".into());
    };

    let drive = GoogleDrive::new(&credentials)?;

    let images = drive.iter_images(folder_id.as_str());
    futures::pin_mut!(images);

    let mut count = 0usize;
    let mut total = 0usize;
    while let Some(bytes) = images.try_next().await? {
        count += 1;
        total += bytes.len();
        info!(index = count, bytes = bytes.len(), "image received");
    }

    info!(images = count, bytes = total, folder.id = %folder_id, "folder done");
    Ok(())
}
