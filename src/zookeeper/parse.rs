use std::sync::LazyLock;

use regex::Regex;

use super::key::{MetricKey, PEER_STATE, SERVER_LEADER, Snapshot, VERSION};

/// Body of any command sent to a member which is not serving client
/// requests, e.g. a leader with `leaderServes=no`.
pub const NOT_SERVING: &str = "This ZooKeeper instance is not currently serving requests";

/// Suffix of the body returned for a command excluded by
/// `4lw.commands.whitelist`.
pub const NOT_IN_WHITELIST: &str = "is not executed because it is not in the whitelist.";

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+\.[0-9]+\.[0-9]+).*$").expect("valid version regex"));

/// The shape of a `mntr` response.
#[derive(Debug, PartialEq)]
pub enum Parsed {
    /// The member accepts no client requests in its current mode.
    NotServing,
    /// The command is disabled server side.
    Rejected,
    Stats(Snapshot),
}

/// Whether the body is a whitelist rejection. Only the first line counts.
pub fn is_rejected(response: &str) -> bool {
    first_line(response).contains(NOT_IN_WHITELIST)
}

fn first_line(response: &str) -> &str {
    response.split('\n').next().unwrap_or_default()
}

/// Parse a `mntr` response into metrics labeled with `host`.
pub fn parse(response: &str, host: &str) -> Parsed {
    let first = first_line(response);
    if first == NOT_SERVING {
        return Parsed::NotServing;
    }
    if first.contains(NOT_IN_WHITELIST) {
        return Parsed::Rejected;
    }

    let mut snapshot = Snapshot::new();
    for line in response.split('\n') {
        let line = line.replace('\t', " ");
        let (key, value) = line.split_once(' ').unwrap_or((line.as_str(), ""));

        match key {
            "" => continue,
            "zk_server_state" => {
                let leader = if value == "leader" { "1" } else { "0" };
                snapshot.insert(MetricKey::new(SERVER_LEADER, host), leader.to_string());
            }
            "zk_version" => {
                snapshot.insert(
                    MetricKey::new(VERSION, host).with_label("version", parse_version(value)),
                    "1".to_string(),
                );
            }
            "zk_peer_state" => {
                snapshot.insert(
                    MetricKey::new(PEER_STATE, host).with_label("state", value),
                    "1".to_string(),
                );
            }
            _ => {
                if !is_number(value) {
                    warn!(
                        message = "skipping metric which holds non-numeric value",
                        key,
                        value,
                        host,
                    );
                    continue;
                }

                snapshot.insert(MetricKey::from_stat(key, host), value.to_string());
            }
        }
    }

    Parsed::Stats(snapshot)
}

/// Keep the leading `major.minor.patch` of the version, e.g.
/// `3.4.10-39d3a4f269333c922ed3db283be479f9deacaa0f, built on ...` becomes
/// `3.4.10`. Anything else is kept as is.
fn parse_version(value: &str) -> &str {
    VERSION_RE
        .captures(value)
        .and_then(|captures| captures.get(1))
        .map_or(value, |m| m.as_str())
}

fn is_number(value: &str) -> bool {
    value.parse::<i64>().is_ok() || value.parse::<f64>().is_ok()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;

    use super::*;

    const HOST: &str = "127.0.0.1:2181";

    const MNTR: &str = "zk_version\t3.4.10-39d3a4f269333c922ed3db283be479f9deacaa0f, built on 03/23/2017 10:13 GMT
zk_avg_latency\t0
zk_max_latency\t12
zk_min_latency\t0
zk_packets_received\t1447
zk_packets_sent\t1446
zk_num_alive_connections\t1
zk_outstanding_requests\t0
zk_server_state\tfollower
zk_znode_count\t4
zk_watch_count\t0
zk_ephemerals_count\t0
zk_approximate_data_size\t27
zk_open_file_descriptor_count\t28
zk_max_file_descriptor_count\t1048576
zk_fsync_threshold_exceed_count\t0
zk_avg_commit_processor_time\t0.5
";

    fn rendered(parsed: Parsed) -> BTreeMap<String, String> {
        match parsed {
            Parsed::Stats(snapshot) => snapshot
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
            other => panic!("expected stats, got {other:?}"),
        }
    }

    #[test]
    fn follower_stats() {
        let got = rendered(parse(MNTR, HOST));

        assert_eq!(got.len(), 17);
        assert_eq!(
            got.get(r#"zk_version{zk_host="127.0.0.1:2181",version="3.4.10"}"#),
            Some(&"1".to_string())
        );
        assert_eq!(
            got.get(r#"zk_server_leader{zk_host="127.0.0.1:2181"}"#),
            Some(&"0".to_string())
        );
        assert_eq!(
            got.get(r#"zk_avg_latency{zk_host="127.0.0.1:2181"}"#),
            Some(&"0".to_string())
        );
        assert_eq!(
            got.get(r#"zk_avg_commit_processor_time{zk_host="127.0.0.1:2181"}"#),
            Some(&"0.5".to_string())
        );
        assert!(!got.keys().any(|key| key.starts_with("zk_server_state")));
    }

    #[test]
    fn leader_state() {
        let got = rendered(parse("zk_server_state leader\n", HOST));
        assert_eq!(
            got,
            BTreeMap::from([(
                r#"zk_server_leader{zk_host="127.0.0.1:2181"}"#.to_string(),
                "1".to_string()
            )])
        );

        for state in ["follower", "standalone", "observer"] {
            let got = rendered(parse(&format!("zk_server_state\t{state}"), HOST));
            assert_eq!(
                got.get(r#"zk_server_leader{zk_host="127.0.0.1:2181"}"#),
                Some(&"0".to_string()),
                "{state}"
            );
        }
    }

    #[test]
    fn version_prefix() {
        for (input, want) in [
            ("3.4.10-abc123, built on 03/23/2017 10:13 GMT", "3.4.10"),
            (
                "3.7.0-e3704b390a6697bfdf4b0bef79e3da7a4f6bac4b, built on 2021-03-17 09:46 UTC",
                "3.7.0",
            ),
            ("3.9.2", "3.9.2"),
            ("unknown-build", "unknown-build"),
            ("", ""),
        ] {
            assert_eq!(parse_version(input), want, "{input}");
        }
    }

    #[test]
    fn peer_state_label() {
        let got = rendered(parse("zk_peer_state\tfollowing - broadcast\n", HOST));
        assert_eq!(
            got,
            BTreeMap::from([(
                r#"zk_peer_state{zk_host="127.0.0.1:2181",state="following - broadcast"}"#
                    .to_string(),
                "1".to_string()
            )])
        );
    }

    #[test]
    fn non_numeric_values_are_skipped() {
        let got = rendered(parse(
            "zk_avg_latency 1\nzk_weird not-a-number\nzk_no_value\n\n",
            HOST,
        ));

        assert_eq!(
            got,
            BTreeMap::from([(
                r#"zk_avg_latency{zk_host="127.0.0.1:2181"}"#.to_string(),
                "1".to_string()
            )])
        );
    }

    #[test]
    fn later_line_wins() {
        let got = rendered(parse("zk_znode_count 4\nzk_znode_count 5\n", HOST));
        assert_eq!(
            got.get(r#"zk_znode_count{zk_host="127.0.0.1:2181"}"#),
            Some(&"5".to_string())
        );
    }

    #[test]
    fn not_serving() {
        assert_eq!(parse(NOT_SERVING, HOST), Parsed::NotServing);
        assert_eq!(
            parse(&format!("{NOT_SERVING}\nzk_avg_latency 0\n"), HOST),
            Parsed::NotServing
        );
        // only an exact first line counts
        assert_eq!(
            parse(&format!("zk_avg_latency 0\n{NOT_SERVING}\n"), HOST),
            Parsed::Stats(Snapshot::from([(
                MetricKey::new("zk_avg_latency", HOST),
                "0".to_string()
            )]))
        );
    }

    #[test]
    fn rejected() {
        let body = "mntr is not executed because it is not in the whitelist.\n";
        assert_eq!(parse(body, HOST), Parsed::Rejected);
        assert!(is_rejected(body));
        assert!(!is_rejected("imok"));
    }

    #[test]
    fn empty_response() {
        assert_eq!(parse("", HOST), Parsed::Stats(Snapshot::new()));
    }
}
