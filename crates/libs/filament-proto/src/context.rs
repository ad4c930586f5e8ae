/// Classification of the node a message entry names.
///
/// Browser-class senders are thin clients with no independent trust; routing
/// treats their first relay as the trust boundary instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderClass {
    Browser,
    Service,
    Node,
    Device,
    #[default]
    Unknown,
}

/// What the protocol core needs to know about the process hosting it.
///
/// Constructed once at process start and passed by reference; the core never
/// reaches for ambient global state.
pub trait NodeContext {
    /// Stable identifier of the local node.
    fn local_node_id(&self) -> &str;

    /// Whether the hosting process has finished starting up. Envelopes
    /// constructed earlier carry a sentinel origin instead of the node id.
    fn started(&self) -> bool;

    /// Whether the local node is an isolated node (reachable only through a
    /// single isolation proxy).
    fn isolated(&self) -> bool;

    /// Trust classification for an arbitrary node id.
    fn classify(&self, node_id: &str) -> SenderClass;
}
