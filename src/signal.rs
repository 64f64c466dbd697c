//! OS signal handling.

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancel `shutdown` on SIGTERM or SIGINT.
///
/// The listener task exits on its own once `shutdown` is cancelled by
/// anything else.
#[cfg(unix)]
pub(crate) fn install(shutdown: CancellationToken) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        tokio::select! {
            () = shutdown.cancelled() => return,
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
        shutdown.cancel();
    });

    info!("OS signal handlers installed (SIGTERM, SIGINT)");
    Ok(())
}

/// Cancel `shutdown` on Ctrl+C.
#[cfg(not(unix))]
pub(crate) fn install(shutdown: CancellationToken) -> std::io::Result<()> {
    tokio::spawn(async move {
        tokio::select! {
            () = shutdown.cancelled() => return,
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    info!("Received Ctrl+C");
                }
            }
        }
        shutdown.cancel();
    });

    info!("OS signal handlers installed (Ctrl+C only)");
    Ok(())
}
