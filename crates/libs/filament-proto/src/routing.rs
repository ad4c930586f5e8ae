//! Operations over an envelope's origin chain and return route.
//!
//! The chain is a `;`-joined list of `nodeId[:thingId]` entries: first entry
//! is the originator, last entry the most recent relay. Malformed or empty
//! chains degrade to neutral results; routing decisions never panic.

use crate::constants::{HOP_SEPARATOR, THING_SEPARATOR};
use crate::context::{NodeContext, SenderClass};
use crate::envelope::Envelope;

/// Leading node id of a chain entry, before any `:thingId` suffix.
fn leading_id(entry: &str) -> &str {
    entry.split(THING_SEPARATOR).next().unwrap_or("")
}

/// Number of hops recorded in the chain.
pub fn hop_count(chain: &str) -> usize {
    if chain.is_empty() {
        0
    } else {
        chain.split(HOP_SEPARATOR).count()
    }
}

/// True iff any entry's leading id equals `node_id`.
pub fn contains(chain: &str, node_id: &str) -> bool {
    !chain.is_empty() && chain.split(HOP_SEPARATOR).any(|entry| leading_id(entry) == node_id)
}

/// Append `node_id` unless it already appears anywhere in the chain.
/// Returns whether a hop was actually added.
pub fn add_hop(chain: &mut String, node_id: &str) -> bool {
    if contains(chain, node_id) {
        return false;
    }
    if !chain.is_empty() {
        chain.push(HOP_SEPARATOR);
    }
    chain.push_str(node_id);
    true
}

/// The birthplace node id, or empty if the chain is empty.
pub fn originator(chain: &str) -> &str {
    chain.split(HOP_SEPARATOR).next().map(leading_id).unwrap_or("")
}

/// The `:thingId` annotation of the first entry, if present.
pub fn originator_thing(chain: &str) -> Option<&str> {
    let first = chain.split(HOP_SEPARATOR).next()?;
    let thing = first.splitn(2, THING_SEPARATOR).nth(1)?;
    if thing.is_empty() {
        None
    } else {
        Some(thing)
    }
}

/// Replace the first entry's leading id, preserving any `:thingId` suffix.
/// No-op when `node_id` already appears in the chain; sets the chain when
/// it was empty.
pub fn set_originator(chain: &mut String, node_id: &str) {
    if contains(chain, node_id) {
        return;
    }
    if chain.is_empty() {
        chain.push_str(node_id);
        return;
    }
    let mut entries: Vec<String> =
        chain.split(HOP_SEPARATOR).map(str::to_owned).collect();
    let suffix = entries[0]
        .splitn(2, THING_SEPARATOR)
        .nth(1)
        .map(str::to_owned);
    entries[0] = match suffix {
        Some(thing) => format!("{node_id}{THING_SEPARATOR}{thing}"),
        None => node_id.to_owned(),
    };
    *chain = entries.join(";");
}

/// Context-bound routing operations: everything that needs the local node
/// identity, its isolation state, or sender classification.
pub struct Router<'a, C: NodeContext + ?Sized> {
    ctx: &'a C,
}

impl<'a, C: NodeContext + ?Sized> Router<'a, C> {
    pub fn new(ctx: &'a C) -> Self {
        Self { ctx }
    }

    /// Stamp the local node onto the chain. Idempotent.
    pub fn add_local_hop(&self, envelope: &mut Envelope) -> bool {
        add_hop(&mut envelope.origin_chain, self.ctx.local_node_id())
    }

    /// Did this message arrive directly from its true originator?
    ///
    /// True for hop count 1; for hop count 2 when the last entry is the
    /// local node; and, with `check_isolated` on an isolated node, for hop
    /// count 3 when the last entry is the local node (one isolation-proxy
    /// hop is ignored).
    pub fn is_first_node(&self, envelope: &Envelope, check_isolated: bool) -> bool {
        let chain = &envelope.origin_chain;
        let last_is_local = chain
            .rsplit(HOP_SEPARATOR)
            .next()
            .map(leading_id)
            .is_some_and(|id| id == self.ctx.local_node_id());
        match hop_count(chain) {
            1 => true,
            2 => last_is_local,
            3 => check_isolated && self.ctx.isolated() && last_is_local,
            _ => false,
        }
    }

    /// The node treated as the originator's trust boundary.
    ///
    /// Normally the first entry; but when the chain has more than two
    /// entries and the first sender is browser-class (a thin client that
    /// cannot be a trust boundary), the first real relay stands in.
    pub fn originator_security_proxy<'e>(&self, envelope: &'e Envelope) -> &'e str {
        let chain = &envelope.origin_chain;
        if chain.is_empty() {
            return "";
        }
        let mut entries = chain.split(HOP_SEPARATOR);
        let first = entries.next().map(leading_id).unwrap_or("");
        if hop_count(chain) > 2 && self.ctx.classify(first) == SenderClass::Browser {
            entries.next().map(leading_id).unwrap_or(first)
        } else {
            first
        }
    }

    /// The most recent relay, skipping the local node itself when it is the
    /// last entry.
    pub fn last_relay<'e>(&self, envelope: &'e Envelope) -> &'e str {
        let chain = &envelope.origin_chain;
        if chain.is_empty() {
            return "";
        }
        let mut entries = chain.rsplit(HOP_SEPARATOR);
        let last = entries.next().map(leading_id).unwrap_or("");
        if last == self.ctx.local_node_id() {
            if let Some(previous) = entries.next() {
                return leading_id(previous);
            }
        }
        last
    }

    /// Attach or replace the first entry's `:thingId` suffix, defaulting
    /// the leading id to the local node when the chain was empty.
    pub fn set_originator_thing(&self, envelope: &mut Envelope, thing_id: &str) {
        let chain = &mut envelope.origin_chain;
        let mut entries: Vec<String> = if chain.is_empty() {
            vec![self.ctx.local_node_id().to_owned()]
        } else {
            chain.split(HOP_SEPARATOR).map(str::to_owned).collect()
        };
        let updated = format!("{}{THING_SEPARATOR}{thing_id}", leading_id(&entries[0]));
        if entries[0] == updated {
            return;
        }
        entries[0] = updated;
        *chain = entries.join(";");
    }

    /// Next hop back toward the originator along the return route: the
    /// entry immediately preceding the local node's position. None when the
    /// route is empty, the local node is absent, or it is the first entry.
    pub fn next_node<'e>(&self, envelope: &'e Envelope) -> Option<&'e str> {
        let route = &envelope.return_route;
        if route.is_empty() {
            return None;
        }
        let entries: Vec<&str> = route.split(HOP_SEPARATOR).collect();
        let position = entries
            .iter()
            .position(|entry| leading_id(entry) == self.ctx.local_node_id())?;
        if position == 0 {
            return None;
        }
        Some(leading_id(entries[position - 1]))
    }
}

#[cfg(test)]
mod tests {
    use super::{add_hop, contains, hop_count, originator, originator_thing, set_originator, Router};
    use crate::context::{NodeContext, SenderClass};
    use crate::envelope::Envelope;

    struct TestContext {
        id: &'static str,
        isolated: bool,
        browsers: Vec<&'static str>,
    }

    impl TestContext {
        fn node(id: &'static str) -> Self {
            Self { id, isolated: false, browsers: Vec::new() }
        }
    }

    impl NodeContext for TestContext {
        fn local_node_id(&self) -> &str {
            self.id
        }

        fn started(&self) -> bool {
            true
        }

        fn isolated(&self) -> bool {
            self.isolated
        }

        fn classify(&self, node_id: &str) -> SenderClass {
            if self.browsers.contains(&node_id) {
                SenderClass::Browser
            } else {
                SenderClass::Node
            }
        }
    }

    fn envelope_with_chain(ctx: &TestContext, chain: &str) -> Envelope {
        let mut envelope = Envelope::new(ctx);
        envelope.origin_chain = chain.to_owned();
        envelope
    }

    #[test]
    fn hop_count_matches_separator_count_plus_one() {
        assert_eq!(hop_count(""), 0);
        assert_eq!(hop_count("N1"), 1);
        assert_eq!(hop_count("N1;N2"), 2);
        assert_eq!(hop_count("N1:thing;N2;N3"), 3);
    }

    #[test]
    fn contains_compares_leading_segments_only() {
        assert!(contains("N1:sensor;N2", "N1"));
        assert!(contains("N1;N2", "N2"));
        assert!(!contains("N1:sensor;N2", "sensor"));
        assert!(!contains("", "N1"));
    }

    #[test]
    fn add_hop_is_idempotent() {
        let mut chain = String::from("N1");
        assert!(add_hop(&mut chain, "N2"));
        assert_eq!(chain, "N1;N2");
        assert!(!add_hop(&mut chain, "N2"));
        assert_eq!(chain, "N1;N2");
    }

    #[test]
    fn fresh_envelope_add_hop_reports_no_change() {
        let ctx = TestContext::node("N1");
        let mut envelope = Envelope::with_text(&ctx, "PING");
        assert_eq!(envelope.origin_chain, "N1");
        let router = Router::new(&ctx);
        assert!(!router.add_local_hop(&mut envelope));
        assert_eq!(envelope.origin_chain, "N1");
    }

    #[test]
    fn originator_and_thing_come_from_first_entry() {
        assert_eq!(originator("N1:sensor;N2;N3"), "N1");
        assert_eq!(originator(""), "");
        assert_eq!(originator_thing("N1:sensor;N2"), Some("sensor"));
        assert_eq!(originator_thing("N1;N2"), None);
        assert_eq!(originator_thing(""), None);
    }

    #[test]
    fn set_originator_preserves_thing_suffix() {
        let mut chain = String::from("N1:sensor;N2");
        set_originator(&mut chain, "N9");
        assert_eq!(chain, "N9:sensor;N2");

        // Already present: no change.
        set_originator(&mut chain, "N2");
        assert_eq!(chain, "N9:sensor;N2");

        let mut empty = String::new();
        set_originator(&mut empty, "N5");
        assert_eq!(empty, "N5");
    }

    #[test]
    fn is_first_node_truth_table() {
        let ctx = TestContext::node("N3");
        let router = Router::new(&ctx);

        assert!(router.is_first_node(&envelope_with_chain(&ctx, "N1"), false));
        assert!(router.is_first_node(&envelope_with_chain(&ctx, "N1;N3"), false));
        assert!(!router.is_first_node(&envelope_with_chain(&ctx, "N1;N2"), false));
        assert!(!router.is_first_node(&envelope_with_chain(&ctx, "N1;N2;N3"), false));
        assert!(!router.is_first_node(&envelope_with_chain(&ctx, "N1;N2;N3"), true));
        assert!(!router.is_first_node(&envelope_with_chain(&ctx, ""), false));
    }

    #[test]
    fn is_first_node_ignores_one_proxy_hop_on_isolated_nodes() {
        let ctx = TestContext { id: "N3", isolated: true, browsers: Vec::new() };
        let router = Router::new(&ctx);
        assert!(router.is_first_node(&envelope_with_chain(&ctx, "N1;N2;N3"), true));
        assert!(!router.is_first_node(&envelope_with_chain(&ctx, "N1;N2;N3"), false));
        assert!(!router.is_first_node(&envelope_with_chain(&ctx, "N1;N2;N9"), true));
        assert!(!router.is_first_node(&envelope_with_chain(&ctx, "N1;N2;N3;N4"), true));
    }

    #[test]
    fn security_proxy_skips_browser_class_originators() {
        let ctx = TestContext { id: "N9", isolated: false, browsers: vec!["B1"] };
        let router = Router::new(&ctx);

        // Browser origin behind more than two hops: first relay is the proxy.
        let envelope = envelope_with_chain(&ctx, "B1;N2;N3");
        assert_eq!(router.originator_security_proxy(&envelope), "N2");

        // Short chains keep the browser itself.
        let envelope = envelope_with_chain(&ctx, "B1;N2");
        assert_eq!(router.originator_security_proxy(&envelope), "B1");

        // Trusted origin is always its own proxy.
        let envelope = envelope_with_chain(&ctx, "N1:thing;N2;N3");
        assert_eq!(router.originator_security_proxy(&envelope), "N1");

        let envelope = envelope_with_chain(&ctx, "");
        assert_eq!(router.originator_security_proxy(&envelope), "");
    }

    #[test]
    fn last_relay_skips_self() {
        let ctx = TestContext::node("N3");
        let router = Router::new(&ctx);

        let envelope = envelope_with_chain(&ctx, "N1;N2;N3");
        assert_eq!(router.last_relay(&envelope), "N2");
        assert_eq!(originator(&envelope.origin_chain), "N1");
        assert_eq!(hop_count(&envelope.origin_chain), 3);

        let envelope = envelope_with_chain(&ctx, "N1;N2");
        assert_eq!(router.last_relay(&envelope), "N2");

        let envelope = envelope_with_chain(&ctx, "N3");
        assert_eq!(router.last_relay(&envelope), "N3");

        let envelope = envelope_with_chain(&ctx, "");
        assert_eq!(router.last_relay(&envelope), "");
    }

    #[test]
    fn set_originator_thing_defaults_to_local_node() {
        let ctx = TestContext::node("N1");
        let router = Router::new(&ctx);

        let mut envelope = envelope_with_chain(&ctx, "");
        router.set_originator_thing(&mut envelope, "pump");
        assert_eq!(envelope.origin_chain, "N1:pump");

        // Replaces an existing annotation.
        router.set_originator_thing(&mut envelope, "valve");
        assert_eq!(envelope.origin_chain, "N1:valve");

        // No-op when nothing would change.
        router.set_originator_thing(&mut envelope, "valve");
        assert_eq!(envelope.origin_chain, "N1:valve");

        let mut envelope = envelope_with_chain(&ctx, "N2;N3");
        router.set_originator_thing(&mut envelope, "gauge");
        assert_eq!(envelope.origin_chain, "N2:gauge;N3");
    }

    #[test]
    fn next_node_walks_return_route_toward_originator() {
        let ctx = TestContext::node("N3");
        let router = Router::new(&ctx);

        let mut envelope = envelope_with_chain(&ctx, "N1");
        envelope.return_route = "N1;N2;N3;N4".into();
        assert_eq!(router.next_node(&envelope), Some("N2"));

        envelope.return_route = "N3;N4".into();
        assert_eq!(router.next_node(&envelope), None);

        envelope.return_route = "N1;N2".into();
        assert_eq!(router.next_node(&envelope), None);

        envelope.return_route = String::new();
        assert_eq!(router.next_node(&envelope), None);
    }
}
