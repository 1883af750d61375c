use tokio::select;
use tokio_util::sync::CancellationToken;

/// Cancels `cancelation` on ctrl-c, or returns early once someone else cancelled it.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => (),
    };
}
