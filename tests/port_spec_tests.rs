//! Property tests for port specification parsing and enumeration

use async_trait::async_trait;
use futures::StreamExt;
use portprobe::scanner::{ProbeOutcome, ProbeSpace, ScanScheduler, SchedulerOptions};
use portprobe::utils::port_parser::{enumerate, PortItem, PortRange, PortSpec};
use portprobe::{PortState, ProbeEngine, ProbeResult, Protocol, ScanError};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn port_item() -> impl Strategy<Value = PortItem> {
    prop_oneof![
        (1u16..=65535).prop_map(PortItem::Single),
        (1u16..=65535, 0u16..500).prop_map(|(start, len)| PortItem::Range(start, start.saturating_add(len))),
    ]
}

proptest! {
    #[test]
    fn enumerate_is_ascending_and_unique(items in prop::collection::vec(port_item(), 1..20)) {
        let range = enumerate(&PortSpec::Explicit(items.clone())).unwrap();
        let ports = range.to_vec();

        prop_assert!(ports.windows(2).all(|pair| pair[0] < pair[1]));

        let expected: BTreeSet<u16> = items
            .iter()
            .flat_map(|item| match *item {
                PortItem::Single(port) => port..=port,
                PortItem::Range(start, end) => start..=end,
            })
            .collect();
        prop_assert_eq!(ports, expected.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn display_parse_enumerate_is_idempotent(items in prop::collection::vec(port_item(), 1..20)) {
        let first = enumerate(&PortSpec::Explicit(items)).unwrap();
        let reparsed: PortSpec = first.to_string().parse().unwrap();
        let second = enumerate(&reparsed).unwrap();
        prop_assert_eq!(&first, &second);

        let range: PortRange = first.to_string().parse().unwrap();
        prop_assert_eq!(range, first);
    }

    #[test]
    fn reversed_ranges_are_rejected(start in 2u16..=65535, gap in 1u16..1000) {
        let end = start.saturating_sub(gap).max(1);
        prop_assume!(end < start);
        let spec = format!("{}-{}", start, end);
        prop_assert!(matches!(spec.parse::<PortSpec>(), Err(ScanError::InvalidPortSpec(_))));
    }

    #[test]
    fn exclusion_removes_exactly_the_excluded(
        ports in prop::collection::btree_set(1u16..=2000, 1..200),
        excluded in prop::collection::btree_set(1u16..=2000, 0..200),
    ) {
        let range = PortRange::from_ports(ports.iter().copied()).unwrap();
        let removed = PortRange::from_ports(excluded.iter().copied()).unwrap();
        let remaining = range.exclude(&removed);

        let expected: Vec<u16> = ports.difference(&excluded).copied().collect();
        prop_assert_eq!(remaining.to_vec(), expected);
    }
}

/// Echoes every probe back as open
struct EchoEngine;

#[async_trait]
impl ProbeEngine for EchoEngine {
    async fn probe(&self, _address: IpAddr, port: u16, protocol: Protocol, _timeout: Duration) -> ProbeResult {
        ProbeResult::new(port, protocol, PortState::Open)
    }

    fn name(&self) -> &str {
        "echo"
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn scheduler_yields_one_outcome_per_enumerated_port(
        items in prop::collection::vec(port_item(), 1..5),
        concurrency in 1usize..16,
    ) {
        let range = enumerate(&PortSpec::Explicit(items)).unwrap();
        let space = ProbeSpace::build(&[IpAddr::V4(Ipv4Addr::LOCALHOST)], &[(Protocol::Tcp, range.clone())]);
        let scheduler = ScanScheduler::new(
            Arc::new(EchoEngine),
            SchedulerOptions::default().with_concurrency(concurrency),
        );

        let outcomes: Vec<ProbeOutcome> = tokio_test::block_on(async {
            scheduler.run(space, CancellationToken::new()).collect().await
        });

        let mut ports: Vec<u16> = outcomes.iter().map(|o| o.task.port).collect();
        ports.sort_unstable();
        prop_assert_eq!(ports, range.to_vec());
    }
}
