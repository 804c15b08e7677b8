//! Representative crawler: probing peers and tracking who answers where.

mod common;

use std::time::{Duration, Instant};

use common::{make_block, sign_vote, Harness};
use orv_consensus::ConsensusConfig;
use orv_messages::{ConfirmReq, Message};
use orv_types::{Block, ChannelId, NetworkId, NodeId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A harness whose ledger holds one confirmed block to probe with.
fn with_probe_block() -> (Harness, Block) {
    let h = Harness::new();
    let block = make_block(10, 9, 100);
    h.ledger.add_confirmed(block.clone());
    (h, block)
}

fn confirm_req_count(h: &Harness) -> usize {
    h.network
        .sent()
        .iter()
        .filter(|m| matches!(m.message, Message::ConfirmReq(_)))
        .count()
}

// ---------------------------------------------------------------------------
// 1. Probe and response
// ---------------------------------------------------------------------------

#[test]
fn answered_probe_registers_representative() {
    let (h, block) = with_probe_block();
    let rep = h.rep(1, 5_000);
    let now = Instant::now();

    h.crawler.query(&[ChannelId(1)], now);
    assert_eq!(
        h.network.sent_to(ChannelId(1)),
        vec![Message::ConfirmReq(ConfirmReq::single(block.hash(), block.root()))]
    );
    assert_eq!(h.crawler.pending_query_count(), 1);

    assert!(h.crawler.process(sign_vote(&rep, 1, vec![block.hash()]), ChannelId(1)));
    h.crawler.validate_and_process(now);

    assert_eq!(h.crawler.representative_count(), 1);
    assert!(h.crawler.is_pr(ChannelId(1)));
    assert_eq!(h.crawler.total_weight(), 5_000);
    let reps = h.crawler.representatives(10, 0);
    assert_eq!(reps[0].account, rep.account);
    assert_eq!(reps[0].channel, ChannelId(1));
    assert_eq!(h.stats.count("rep_crawler", "rep_new"), 1);
}

#[test]
fn node_id_probe_resolves_its_channel() {
    let (h, block) = with_probe_block();
    let node = NodeId([4; 32]);
    let now = Instant::now();
    assert!(!h.crawler.query_node_id(&node, now));
    assert_eq!(h.stats.count("rep_crawler", "node_id_unknown"), 1);

    h.network.register_node_id(node, ChannelId(3));
    assert!(h.crawler.query_node_id(&node, now));
    assert_eq!(
        h.network.sent_to(ChannelId(3)),
        vec![Message::ConfirmReq(ConfirmReq::single(block.hash(), block.root()))]
    );
}

#[test]
fn vote_on_unprobed_channel_is_not_a_response() {
    let (h, block) = with_probe_block();
    let rep = h.rep(1, 5_000);
    h.crawler.query(&[ChannelId(1)], Instant::now());
    assert!(!h.crawler.process(sign_vote(&rep, 1, vec![block.hash()]), ChannelId(2)));
    assert!(!h
        .crawler
        .process(sign_vote(&rep, 1, vec![make_block(11, 11, 1).hash()]), ChannelId(1)));
}

#[test]
fn responses_without_weight_are_discarded() {
    let (h, block) = with_probe_block();
    let nobody = h.rep(1, 0);
    let now = Instant::now();
    h.crawler.query(&[ChannelId(1)], now);
    h.crawler.process(sign_vote(&nobody, 1, vec![block.hash()]), ChannelId(1));
    h.crawler.validate_and_process(now);
    assert_eq!(h.crawler.representative_count(), 0);
}

#[test]
fn no_probe_without_confirmed_blocks() {
    let h = Harness::new();
    h.crawler.query(&[ChannelId(1)], Instant::now());
    assert!(h.network.sent().is_empty());
    assert_eq!(h.stats.count("rep_crawler", "query_target_failed"), 1);
}

#[test]
fn duplicate_probe_is_not_resent() {
    let (h, _) = with_probe_block();
    let now = Instant::now();
    h.crawler.query(&[ChannelId(1)], now);
    h.crawler.query(&[ChannelId(1)], now);
    assert_eq!(confirm_req_count(&h), 1);
    assert_eq!(h.stats.count("rep_crawler", "query_duplicate"), 1);
}

// ---------------------------------------------------------------------------
// 2. Timeouts and eviction
// ---------------------------------------------------------------------------

#[test]
fn timed_out_probes_are_forgotten_but_reps_kept() {
    let (h, block) = with_probe_block();
    let rep = h.rep(1, 5_000);
    let now = Instant::now();
    h.crawler.query(&[ChannelId(1), ChannelId(2)], now);
    h.crawler.process(sign_vote(&rep, 1, vec![block.hash()]), ChannelId(1));
    h.crawler.validate_and_process(now);

    h.crawler.cleanup(now + Duration::from_millis(500));
    assert_eq!(h.crawler.pending_query_count(), 2);

    h.crawler.cleanup(now + Duration::from_secs(2));
    assert_eq!(h.crawler.pending_query_count(), 0);
    assert_eq!(h.crawler.representative_count(), 1);
    assert_eq!(h.stats.count("rep_crawler", "query_completion"), 1);
    assert_eq!(h.stats.count("rep_crawler", "query_timeout"), 1);
}

#[test]
fn representative_follows_its_new_channel() {
    let (h, block) = with_probe_block();
    let rep = h.rep(1, 5_000);
    let now = Instant::now();
    h.crawler.query(&[ChannelId(1)], now);
    h.crawler.process(sign_vote(&rep, 1, vec![block.hash()]), ChannelId(1));
    h.crawler.validate_and_process(now);

    h.crawler.force_query(block.hash(), ChannelId(2), now);
    h.crawler.process(sign_vote(&rep, 2, vec![block.hash()]), ChannelId(2));
    h.crawler.validate_and_process(now);

    assert_eq!(h.crawler.representative_count(), 1);
    assert!(h.crawler.is_pr(ChannelId(2)));
    assert!(!h.crawler.is_pr(ChannelId(1)));
}

#[test]
fn dead_channel_and_lost_weight_evict() {
    let (h, block) = with_probe_block();
    let first = h.rep(1, 5_000);
    let second = h.rep(2, 5_000);
    let now = Instant::now();
    h.crawler.query(&[ChannelId(1), ChannelId(2)], now);
    h.crawler.process(sign_vote(&first, 1, vec![block.hash()]), ChannelId(1));
    h.crawler.process(sign_vote(&second, 1, vec![block.hash()]), ChannelId(2));
    h.crawler.validate_and_process(now);
    assert_eq!(h.crawler.representative_count(), 2);

    h.network.disconnect(ChannelId(1));
    assert_eq!(h.crawler.total_weight(), 5_000);
    h.ledger.set_weight(second.account, 0);
    h.crawler.cleanup(now);

    assert_eq!(h.crawler.representative_count(), 0);
    assert_eq!(h.stats.count("rep_crawler", "channel_dead"), 1);
    assert_eq!(h.stats.count("rep_crawler", "weight_zero"), 1);
}

// ---------------------------------------------------------------------------
// 3. Target selection
// ---------------------------------------------------------------------------

#[test]
fn unknown_channels_limited_by_attempts() {
    let mut config = ConsensusConfig::for_network(NetworkId::Dev);
    config.rep_crawler.aggressive_max_attempts = 1;
    let h = Harness::with_config(config);
    let now = Instant::now();
    h.crawler
        .force_query(make_block(10, 9, 1).hash(), ChannelId(1), now);

    let targets = h.crawler.prepare_crawl_targets(false, now);
    assert_eq!(targets.len(), 7);
    assert!(!targets.contains(&ChannelId(1)));
}

#[test]
fn known_representatives_are_throttled() {
    let (h, block) = with_probe_block();
    let rep = h.rep(1, 5_000);
    let now = Instant::now();
    h.crawler.query(&[ChannelId(1)], now);
    h.crawler.process(sign_vote(&rep, 1, vec![block.hash()]), ChannelId(1));
    h.crawler.validate_and_process(now);
    h.crawler
        .force_query(make_block(11, 11, 1).hash(), ChannelId(1), now);

    let soon = h.crawler.prepare_crawl_targets(true, now + Duration::from_millis(100));
    assert!(!soon.contains(&ChannelId(1)));
    let later = h.crawler.prepare_crawl_targets(true, now + Duration::from_secs(1));
    assert!(later.contains(&ChannelId(1)));
}

#[test]
fn tick_probes_live_peers() {
    let (h, _) = with_probe_block();
    let now = Instant::now();
    h.crawler.tick(now);
    assert_eq!(confirm_req_count(&h), 8);
    assert_eq!(h.stats.count("rep_crawler", "crawl_aggressive"), 1);

    // Not due again until the interval has passed.
    h.crawler.tick(now + Duration::from_millis(10));
    assert_eq!(confirm_req_count(&h), 8);
}

#[test]
fn principal_reps_sorted_by_weight() {
    let (h, block) = with_probe_block();
    let light = h.rep(1, 1_000);
    let heavy = h.rep(2, 9_000);
    let now = Instant::now();
    h.crawler.query(&[ChannelId(1), ChannelId(2)], now);
    h.crawler.process(sign_vote(&light, 1, vec![block.hash()]), ChannelId(1));
    h.crawler.process(sign_vote(&heavy, 1, vec![block.hash()]), ChannelId(2));
    h.crawler.validate_and_process(now);

    let reps = h.crawler.principal_representatives(10);
    let accounts: Vec<_> = reps.iter().map(|r| r.account).collect();
    assert_eq!(accounts, vec![heavy.account, light.account]);
    assert_eq!(h.crawler.representatives(1, 0).len(), 1);
    assert!(h.crawler.representatives(10, 5_000).iter().all(|r| r.weight >= 5_000));
}
