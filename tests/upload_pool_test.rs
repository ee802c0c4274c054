//! Upload Pool Accounting Tests
//!
//! The in-flight gauge is process-global, so these checks live in their own
//! test binary where nothing else runs uploads.

use kura::metrics::UPLOADS_IN_FLIGHT;
use kura::server::UploadPool;
use std::time::Duration;

#[tokio::test]
async fn test_abandoned_upload_releases_gauge_and_permit() {
    let pool = UploadPool::new(1);
    let before = UPLOADS_IN_FLIGHT.get();

    let worker = pool.clone();
    let task = tokio::spawn(async move {
        worker
            .run(|| std::thread::sleep(Duration::from_millis(200)))
            .await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(UPLOADS_IN_FLIGHT.get(), before + 1);

    // The request went away while its job was still running
    task.abort();
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(UPLOADS_IN_FLIGHT.get(), before);
    assert_eq!(pool.available(), 1);
}
