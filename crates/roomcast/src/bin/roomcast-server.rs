//! `roomcast-server`: runs a relay until Ctrl-C.

use clap::Parser;
use roomcast::RoomcastServer;
use roomcast::cli::ServerArgs;
use roomcast::logging::init_logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = ServerArgs::parse().into_config()?;
    let server = RoomcastServer::builder().config(config).build().await?;
    let handle = server.handle();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("interrupt received, shutting down"),
            Err(e) => tracing::warn!(error = %e, "cannot listen for Ctrl-C, shutting down"),
        }
        handle.stop();
    });

    server.run().await?;
    Ok(())
}
