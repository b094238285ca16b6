//! Connectivity probe.
//!
//! Periodically issues a request against the remote base URL and reports
//! offline/online transitions to the scheduler. Any HTTP response counts
//! as reachable; only transport failures count as offline.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::scheduler::SchedulerHandle;

/// Spawn the probe loop. The first result is always reported.
pub fn spawn_probe(url: String, every: Duration, handle: SchedulerHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        let client = match reqwest::Client::builder().timeout(every).build() {
            Ok(client) => client,
            Err(err) => {
                debug!(error = %err, "network probe disabled");
                return;
            }
        };
        let mut ticker = tokio::time::interval(every);
        let mut last: Option<bool> = None;
        loop {
            ticker.tick().await;
            let online = probe(&client, &url).await;
            if last != Some(online) {
                debug!(online, url = %url, "network probe");
                handle.set_online(online);
                last = Some(online);
            }
        }
    })
}

async fn probe(client: &reqwest::Client, url: &str) -> bool {
    client.head(url).send().await.is_ok()
}
