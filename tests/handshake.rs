//! Handshake behaviour under fragmentation and adversarial proposals.

use std::sync::Arc;

use graphwire::{
    FramingError, HANDSHAKE_LEN, HANDSHAKE_MAGIC, HandshakeOutcome, Negotiator, ProtocolHandler,
    ProtocolRegistry, ProtocolVersion, SecurityRequirement,
};
use proptest::prelude::*;
use rstest::rstest;

struct NullHandler(ProtocolVersion);

impl ProtocolHandler for NullHandler {
    fn version(&self) -> ProtocolVersion { self.0 }

    fn handle_inbound(&mut self, _bytes: &[u8]) -> Result<(), FramingError> { Ok(()) }
}

fn registry_with(versions: &[u32]) -> Arc<ProtocolRegistry> {
    let mut registry = ProtocolRegistry::new();
    for &v in versions {
        let version = ProtocolVersion::new(v);
        registry.register(version, move || NullHandler(version));
    }
    Arc::new(registry)
}

fn negotiator(versions: &[u32]) -> Negotiator {
    Negotiator::new(registry_with(versions), SecurityRequirement::Optional, false)
}

fn handshake_bytes(proposals: [u32; 4]) -> Vec<u8> {
    let mut bytes = HANDSHAKE_MAGIC.to_vec();
    for proposal in proposals {
        bytes.extend_from_slice(&proposal.to_be_bytes());
    }
    bytes
}

fn chosen_version(outcome: &HandshakeOutcome) -> Option<u32> {
    match outcome {
        HandshakeOutcome::Chosen(handler) => Some(handler.version().as_u32()),
        _ => None,
    }
}

#[test]
fn split_2_2_7_9_stays_partial_until_complete() {
    let mut negotiator = negotiator(&[1]);
    let bytes = handshake_bytes([1, 0, 0, 0]);
    assert_eq!(bytes.len(), HANDSHAKE_LEN);

    assert!(matches!(
        negotiator.perform(&bytes[..2]),
        HandshakeOutcome::Partial
    ));
    assert!(matches!(
        negotiator.perform(&bytes[2..4]),
        HandshakeOutcome::Partial
    ));
    assert!(matches!(
        negotiator.perform(&bytes[4..11]),
        HandshakeOutcome::Partial
    ));
    let outcome = negotiator.perform(&bytes[11..]);
    assert_eq!(chosen_version(&outcome), Some(1));
}

#[test]
fn surplus_bytes_stay_buffered_for_the_next_layer() {
    let mut negotiator = negotiator(&[1]);
    let mut bytes = handshake_bytes([1, 0, 0, 0]);
    bytes.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]);

    let outcome = negotiator.perform(&bytes);
    assert_eq!(chosen_version(&outcome), Some(1));
    assert_eq!(
        negotiator.take_remainder().as_ref(),
        &[0xAA, 0xBB, 0xCC, 0xDD]
    );
}

#[test]
fn boundary_version_value_is_supported() {
    let mut negotiator = negotiator(&[u32::MAX]);
    let outcome = negotiator.perform(&handshake_bytes([u32::MAX, 0, 0, 0]));
    assert_eq!(chosen_version(&outcome), Some(u32::MAX));
}

#[rstest]
#[case::version_we_support([1, 0, 0, 0])]
#[case::no_version_at_all([0, 0, 0, 0])]
fn bad_magic_is_invalid_regardless_of_versions(#[case] proposals: [u32; 4]) {
    let mut negotiator = negotiator(&[1]);
    let mut bytes = 0xDEAD_B017_u32.to_be_bytes().to_vec();
    for proposal in proposals {
        bytes.extend_from_slice(&proposal.to_be_bytes());
    }
    assert!(matches!(
        negotiator.perform(&bytes),
        HandshakeOutcome::Invalid
    ));
}

#[test]
fn unsupported_proposals_yield_no_applicable_protocol() {
    let mut negotiator = negotiator(&[1]);
    let outcome = negotiator.perform(&handshake_bytes([2, 3, 4, 0]));
    assert!(matches!(outcome, HandshakeOutcome::NoApplicableProtocol));
}

#[test]
fn plaintext_transport_fails_a_required_encryption_policy() {
    let mut negotiator =
        Negotiator::new(registry_with(&[1]), SecurityRequirement::Required, false);
    let outcome = negotiator.perform(&handshake_bytes([1, 0, 0, 0]));
    assert!(matches!(outcome, HandshakeOutcome::Insecure));
}

proptest! {
    /// Any fragmentation of the 20 handshake bytes resolves identically to
    /// delivering them in one call.
    #[test]
    fn fragmentation_invariance(
        mut cuts in prop::collection::vec(1_usize..HANDSHAKE_LEN, 0..6),
        first in 0_u32..4,
        second in 0_u32..4,
    ) {
        let proposals = [first, second, 0, 0];
        let bytes = handshake_bytes(proposals);

        let mut whole = negotiator(&[1, 3]);
        let expected = whole.perform(&bytes);

        cuts.sort_unstable();
        cuts.dedup();
        let mut fragmented = negotiator(&[1, 3]);
        let mut outcome = HandshakeOutcome::Partial;
        let mut start = 0;
        for cut in cuts.iter().copied().chain(std::iter::once(HANDSHAKE_LEN)) {
            prop_assert!(matches!(outcome, HandshakeOutcome::Partial));
            outcome = fragmented.perform(&bytes[start..cut]);
            start = cut;
        }

        prop_assert_eq!(outcome.name(), expected.name());
        prop_assert_eq!(chosen_version(&outcome), chosen_version(&expected));
    }
}
