use futures::StreamExt;

use super::key::{MetricKey, RUOK as RUOK_METRIC, SERVER_LEADER, Snapshot, UP};
use super::parse::{Parsed, is_rejected, parse};
use super::probe::{IMOK, MNTR, ProbeError, Prober, RUOK};

/// Probes every target and assembles one snapshot per scrape.
#[derive(Clone)]
pub struct Collector {
    prober: Prober,
    concurrency: usize,
}

impl Collector {
    pub fn new(prober: Prober, concurrency: usize) -> Self {
        Self {
            prober,
            concurrency: concurrency.max(1),
        }
    }

    /// At most `concurrency` targets are probed at the same time. Each target
    /// builds its own snapshot, they are merged once all of them finished, so
    /// there is no shared state between targets and a failing one never hides
    /// the others.
    pub async fn collect(&self, targets: &[String]) -> Snapshot {
        let tasks = targets
            .iter()
            .map(|target| self.collect_target(target))
            .collect::<Vec<_>>();
        let partials = futures::stream::iter(tasks)
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        let mut snapshot = Snapshot::new();
        for partial in partials {
            snapshot.extend(partial);
        }

        snapshot
    }

    async fn collect_target(&self, target: &str) -> Snapshot {
        let mut snapshot = Snapshot::new();
        let up = MetricKey::new(UP, target);

        let response = match self.prober.probe(target, MNTR).await {
            Ok(response) => response,
            Err(err @ (ProbeError::Resolve { .. } | ProbeError::Connect { .. })) => {
                warn!(message = "probe zookeeper failed", %err);

                snapshot.insert(up, "0".to_string());
                return snapshot;
            }
            Err(err) => {
                // connected, so the member is up even though the response is lost
                warn!(message = "probe zookeeper failed", %err);
                String::new()
            }
        };

        match parse(&response, target) {
            Parsed::NotServing => {
                // a leader which does not serve clients, no stats to collect
                snapshot.insert(up, "1".to_string());
                snapshot.insert(MetricKey::new(SERVER_LEADER, target), "1".to_string());
                return snapshot;
            }
            Parsed::Rejected => {
                command_not_allowed(MNTR, target);

                snapshot.insert(up, "0".to_string());
                return snapshot;
            }
            Parsed::Stats(stats) => snapshot.extend(stats),
        }

        let ruok = match self.prober.probe(target, RUOK).await {
            Ok(response) if response == IMOK => "1",
            Ok(response) => {
                if is_rejected(&response) {
                    command_not_allowed(RUOK, target);
                }
                "0"
            }
            Err(err) => {
                warn!(message = "probe zookeeper failed", %err);
                "0"
            }
        };
        snapshot.insert(MetricKey::new(RUOK_METRIC, target), ruok.to_string());
        snapshot.insert(up, "1".to_string());

        snapshot
    }
}

fn command_not_allowed(command: &str, host: &str) {
    warn!(
        message = "command isn't allowed, see '4lw.commands.whitelist' ZK config parameter",
        command,
        host,
    );
}
