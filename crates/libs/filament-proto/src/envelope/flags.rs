/// 16-bit set of independent envelope behaviors.
///
/// Bit positions are part of the wire format and must not be reordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvelopeFlags(u16);

const DO_NOT_RELAY: u16 = 1 << 0;
const UNSUBSCRIBE_AFTER_PUBLISH: u16 = 1 << 1;
const CLOUD_ONLY: u16 = 1 << 2;
const SERVICES_ONLY: u16 = 1 << 3;
const NODES_ONLY: u16 = 1 << 4;
const WAS_PROCESSED: u16 = 1 << 5;
const ACKNOWLEDGED: u16 = 1 << 6;
const RELAY_ONLY: u16 = 1 << 7;
const KEEP_FIRST_DUPLICATE: u16 = 1 << 8;
const KEEP_LATEST_DUPLICATE: u16 = 1 << 9;
const SEND_PULSE: u16 = 1 << 10;
const SENT_VIA_CLOUD: u16 = 1 << 11;
const ENCRYPT_PAYLOAD_REQUEST: u16 = 1 << 12;
const PAYLOAD_IS_ENCRYPTED: u16 = 1 << 13;
const DO_NOT_CHUNK: u16 = 1 << 14;

impl EnvelopeFlags {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    fn get(self, mask: u16) -> bool {
        self.0 & mask != 0
    }

    fn put(&mut self, mask: u16, on: bool) {
        if on {
            self.0 |= mask;
        } else {
            self.0 &= !mask;
        }
    }

    /// Message must not travel beyond the next hop.
    pub fn do_not_relay(self) -> bool {
        self.get(DO_NOT_RELAY)
    }

    pub fn set_do_not_relay(&mut self, on: bool) {
        self.put(DO_NOT_RELAY, on);
    }

    pub fn unsubscribe_after_publish(self) -> bool {
        self.get(UNSUBSCRIBE_AFTER_PUBLISH)
    }

    pub fn set_unsubscribe_after_publish(&mut self, on: bool) {
        self.put(UNSUBSCRIBE_AFTER_PUBLISH, on);
    }

    pub fn cloud_only(self) -> bool {
        self.get(CLOUD_ONLY)
    }

    pub fn set_cloud_only(&mut self, on: bool) {
        self.put(CLOUD_ONLY, on);
    }

    pub fn services_only(self) -> bool {
        self.get(SERVICES_ONLY)
    }

    pub fn set_services_only(&mut self, on: bool) {
        self.put(SERVICES_ONLY, on);
    }

    pub fn nodes_only(self) -> bool {
        self.get(NODES_ONLY)
    }

    pub fn set_nodes_only(&mut self, on: bool) {
        self.put(NODES_ONLY, on);
    }

    /// Custom marker toggled by consumers once a message has been handled.
    pub fn was_processed(self) -> bool {
        self.get(WAS_PROCESSED)
    }

    pub fn set_was_processed(&mut self, on: bool) {
        self.put(WAS_PROCESSED, on);
    }

    pub fn acknowledged(self) -> bool {
        self.get(ACKNOWLEDGED)
    }

    pub fn set_acknowledged(&mut self, on: bool) {
        self.put(ACKNOWLEDGED, on);
    }

    /// Message stops at the first relay.
    pub fn relay_only(self) -> bool {
        self.get(RELAY_ONLY)
    }

    pub fn set_relay_only(&mut self, on: bool) {
        self.put(RELAY_ONLY, on);
    }

    /// While queued, keep the first copy and drop later duplicates with the
    /// same similarity hash.
    pub fn keep_first_duplicate(self) -> bool {
        self.get(KEEP_FIRST_DUPLICATE)
    }

    pub fn set_keep_first_duplicate(&mut self, on: bool) {
        self.put(KEEP_FIRST_DUPLICATE, on);
    }

    /// While queued, keep the latest copy and evict earlier duplicates with
    /// the same similarity hash.
    pub fn keep_latest_duplicate(self) -> bool {
        self.get(KEEP_LATEST_DUPLICATE)
    }

    pub fn set_keep_latest_duplicate(&mut self, on: bool) {
        self.put(KEEP_LATEST_DUPLICATE, on);
    }

    pub fn send_pulse(self) -> bool {
        self.get(SEND_PULSE)
    }

    pub fn set_send_pulse(&mut self, on: bool) {
        self.put(SEND_PULSE, on);
    }

    /// Set by the relay layer when a message traveled through the cloud.
    pub fn sent_via_cloud(self) -> bool {
        self.get(SENT_VIA_CLOUD)
    }

    pub fn set_sent_via_cloud(&mut self, on: bool) {
        self.put(SENT_VIA_CLOUD, on);
    }

    /// Asks the transport to encrypt the text payload before sending.
    pub fn encrypt_payload_request(self) -> bool {
        self.get(ENCRYPT_PAYLOAD_REQUEST)
    }

    pub fn set_encrypt_payload_request(&mut self, on: bool) {
        self.put(ENCRYPT_PAYLOAD_REQUEST, on);
    }

    /// Reflects transport state: the text payload is currently encrypted.
    pub fn payload_is_encrypted(self) -> bool {
        self.get(PAYLOAD_IS_ENCRYPTED)
    }

    pub fn set_payload_is_encrypted(&mut self, on: bool) {
        self.put(PAYLOAD_IS_ENCRYPTED, on);
    }

    pub fn do_not_chunk(self) -> bool {
        self.get(DO_NOT_CHUNK)
    }

    pub fn set_do_not_chunk(&mut self, on: bool) {
        self.put(DO_NOT_CHUNK, on);
    }
}

#[cfg(test)]
mod tests {
    use super::EnvelopeFlags;

    #[test]
    fn bit_positions_stay_wire_compatible() {
        let mut flags = EnvelopeFlags::new();
        flags.set_do_not_relay(true);
        assert_eq!(flags.bits(), 0x0001);

        let mut flags = EnvelopeFlags::new();
        flags.set_relay_only(true);
        assert_eq!(flags.bits(), 0x0080);

        let mut flags = EnvelopeFlags::new();
        flags.set_keep_latest_duplicate(true);
        assert_eq!(flags.bits(), 0x0200);

        let mut flags = EnvelopeFlags::new();
        flags.set_do_not_chunk(true);
        assert_eq!(flags.bits(), 0x4000);
    }

    #[test]
    fn bits_toggle_independently() {
        let mut flags = EnvelopeFlags::new();
        flags.set_cloud_only(true);
        flags.set_nodes_only(true);
        flags.set_acknowledged(true);
        assert!(flags.cloud_only());
        assert!(!flags.services_only());
        assert!(flags.nodes_only());
        assert!(flags.acknowledged());

        flags.set_nodes_only(false);
        assert!(flags.cloud_only());
        assert!(!flags.nodes_only());
        assert!(flags.acknowledged());
    }

    #[test]
    fn round_trips_through_raw_bits() {
        let mut flags = EnvelopeFlags::new();
        flags.set_encrypt_payload_request(true);
        flags.set_send_pulse(true);
        let restored = EnvelopeFlags::from_bits(flags.bits());
        assert_eq!(restored, flags);
        assert!(restored.encrypt_payload_request());
        assert!(restored.send_pulse());
    }
}
