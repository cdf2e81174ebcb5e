use tracing::{debug, warn};

use crate::scale::EntityScales;

use super::packet::ScaleSyncMessage;

/// Sends one message per dirty state through `send`. A state's pending flag
/// is cleared before sending and restored when `send` fails, so a failed
/// flush is retried on the next call. Stops at the first error.
pub fn flush_dirty<E>(
    store: &EntityScales,
    mut send: impl FnMut(ScaleSyncMessage) -> Result<(), E>,
) -> Result<usize, E> {
    let mut sent = 0;
    for data in store.constructed() {
        if !data.take_sync() {
            continue;
        }
        let message = ScaleSyncMessage::from_data(store.entity(), &data);
        if let Err(err) = send(message) {
            data.mark_for_sync(true);
            return Err(err);
        }
        sent += 1;
    }
    if sent > 0 {
        debug!(entity = store.entity().0, sent, "scale_sync_flushed");
    }
    Ok(sent)
}

pub fn tracking_snapshot(store: &EntityScales) -> Vec<ScaleSyncMessage> {
    store
        .get_all()
        .into_iter()
        .filter(|data| !data.kind().is_invalid())
        .map(|data| ScaleSyncMessage::from_data(store.entity(), &data))
        .collect()
}

pub fn apply_sync_message(store: &EntityScales, message: &ScaleSyncMessage) -> bool {
    if message.entity != store.entity() {
        warn!(
            expected = store.entity().0,
            received = message.entity.0,
            "scale_sync_entity_mismatch"
        );
        return false;
    }
    let Some(kind) = store.registries().kinds().get(&message.kind).cloned() else {
        warn!(kind = %message.kind, "scale_sync_unknown_kind");
        return false;
    };
    if kind.is_invalid() {
        return false;
    }
    store
        .get(&kind)
        .apply_payload(&message.payload, store.registries().modifiers())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::ScaleConfig;
    use crate::identifier::Identifier;
    use crate::registry::{kinds, ScaleRegistries};
    use crate::scale::{EntityId, SimulationSide};
    use crate::sync::{decode_batch, encode_batch};

    fn pair() -> (Arc<EntityScales>, Arc<EntityScales>) {
        let registries = Arc::new(ScaleRegistries::with_builtins());
        let server = EntityScales::new(
            EntityId(5),
            SimulationSide::Authoritative,
            Arc::clone(&registries),
            ScaleConfig::default(),
        );
        let client = EntityScales::new(
            EntityId(5),
            SimulationSide::Replica,
            registries,
            ScaleConfig::default(),
        );
        (server, client)
    }

    #[test]
    fn flush_sends_dirty_states_once_and_clears_flag() {
        let (server, client) = pair();
        let base = server.get_by_id(&Identifier::scaling(kinds::BASE));
        base.set_target_scale(2.0);
        server.get_by_id(&Identifier::scaling(kinds::REACH));

        let mut outbox = Vec::new();
        let sent = flush_dirty(&server, |message| {
            outbox.push(message);
            Ok::<_, ()>(())
        })
        .expect("flush");
        assert_eq!(sent, 1);
        assert!(!base.should_sync());

        let bytes = encode_batch(&outbox).expect("encode");
        for message in decode_batch(&bytes).expect("decode") {
            assert!(apply_sync_message(&client, &message));
        }
        let mirrored = client.get_by_id(&Identifier::scaling(kinds::BASE));
        assert_eq!(mirrored.values(), base.values());
        assert!(!mirrored.should_sync());

        let again = flush_dirty(&server, |_| Ok::<_, ()>(())).expect("flush");
        assert_eq!(again, 0);
    }

    #[test]
    fn failed_send_keeps_state_dirty() {
        let (server, _client) = pair();
        let base = server.get_by_id(&Identifier::scaling(kinds::BASE));
        base.set_scale_tick_delay(4);
        let err = flush_dirty(&server, |_| Err("link down")).expect_err("send fails");
        assert_eq!(err, "link down");
        assert!(base.should_sync());
    }

    #[test]
    fn tracking_snapshot_covers_every_valid_kind() {
        let (server, client) = pair();
        server
            .get_by_id(&Identifier::scaling(kinds::HEIGHT))
            .set_scale(1.25);
        let snapshot = tracking_snapshot(&server);
        assert_eq!(snapshot.len(), 9);
        assert!(snapshot
            .iter()
            .all(|message| message.kind != Identifier::scaling("invalid")));
        for message in &snapshot {
            assert!(apply_sync_message(&client, message));
        }
        assert_eq!(
            client
                .get_by_id(&Identifier::scaling(kinds::HEIGHT))
                .base_scale(),
            1.25
        );
    }

    #[test]
    fn misaddressed_or_unknown_messages_are_dropped() {
        let (server, client) = pair();
        let mut message = ScaleSyncMessage::from_data(
            EntityId(99),
            &server.get_by_id(&Identifier::scaling(kinds::BASE)),
        );
        assert!(!apply_sync_message(&client, &message));
        message.entity = EntityId(5);
        message.kind = Identifier::scaling("unregistered");
        assert!(!apply_sync_message(&client, &message));
        assert_eq!(client.construction_count(), 0);
    }
}
