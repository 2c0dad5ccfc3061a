use std::fmt::Write;

use super::key::Snapshot;

/// Render a snapshot in the Prometheus text exposition format, one
/// `key value` line per metric.
pub fn render(snapshot: &Snapshot) -> String {
    let mut buf = String::with_capacity(snapshot.len() * 64);
    for (key, value) in snapshot {
        // writing to a String never fails
        let _ = writeln!(buf, "{key} {value}");
    }

    buf
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::zookeeper::key::MetricKey;
    use crate::zookeeper::parse::{Parsed, parse};

    #[test]
    fn single_metric() {
        let snapshot = Snapshot::from([(
            MetricKey::new("zk_avg_latency", "h"),
            "0".to_string(),
        )]);

        assert_eq!(render(&snapshot), "zk_avg_latency{zk_host=\"h\"} 0\n");
    }

    #[test]
    fn empty() {
        assert_eq!(render(&Snapshot::new()), "");
    }

    #[test]
    fn every_entry_once() {
        let snapshot = Snapshot::from([
            (MetricKey::new("zk_up", "zk1:2181"), "1".to_string()),
            (MetricKey::new("zk_up", "zk2:2181"), "0".to_string()),
            (
                MetricKey::new("zk_version", "zk1:2181").with_label("version", "3.8.4"),
                "1".to_string(),
            ),
            (
                MetricKey::new("zk_avg_commit_processor_time", "zk1:2181"),
                "0.5".to_string(),
            ),
        ]);

        let output = render(&snapshot);
        let lines = output.lines().collect::<Vec<_>>();

        assert_eq!(lines.len(), snapshot.len());
        for (key, value) in &snapshot {
            let line = format!("{key} {value}");
            assert_eq!(lines.iter().filter(|l| **l == line).count(), 1, "{line}");
        }
        assert!(output.ends_with('\n'));
    }

    #[test]
    fn parsed_values_survive_rendering() {
        let response = "zk_version\t3.5.9-83df9301aa5c2a5d284a9940177808c01bc35cef, built on 01/06/2021 20:03 GMT
zk_server_state\tfollower
zk_peer_state\tfollowing - broadcast
zk_avg_latency\t0.1
zk_max_latency\t12
zk_fsync-threshold.exceed_count\t0
zk_learner_requests{type=\"ping\"}\t8
zk_local_sessions\tnot-a-number
";
        let Parsed::Stats(snapshot) = parse(response, "10.0.0.1:2181") else {
            panic!("expected stats");
        };

        let want = snapshot
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect::<BTreeSet<_>>();
        let got = render(&snapshot)
            .lines()
            .map(|line| {
                let (key, value) = line.rsplit_once(' ').expect("metric line has a value");
                (key.to_string(), value.to_string())
            })
            .collect::<BTreeSet<_>>();

        assert_eq!(got, want);
        assert_eq!(got.len(), 7);
    }
}
