use std::sync::Arc;

use tracing::warn;

use crate::identifier::Identifier;
use crate::registry::ModifierRegistry;
use crate::scale::{EntityId, ScaleData, ScaleValues};

use super::codec::{PacketReader, PacketWriter, WireError};

pub const FIXED_PREFIX_LEN: usize = 24;

#[derive(Debug, Clone, PartialEq)]
pub struct ScalePayload {
    pub values: ScaleValues,
    pub modifiers: Vec<Identifier>,
}

impl ScalePayload {
    pub fn encode(&self, writer: &mut PacketWriter) -> Result<(), WireError> {
        let values = &self.values;
        writer.write_f32(values.base_scale);
        writer.write_f32(values.prev_base_scale);
        writer.write_f32(values.initial_scale);
        writer.write_f32(values.target_scale);
        writer.write_u32(values.scale_ticks);
        writer.write_u32(values.total_scale_ticks);
        writer.write_u32(self.modifiers.len() as u32);
        for id in &self.modifiers {
            writer.write_identifier(id)?;
        }
        Ok(())
    }

    pub fn decode(reader: &mut PacketReader<'_>) -> Result<Self, WireError> {
        let values = ScaleValues {
            base_scale: reader.read_f32()?,
            prev_base_scale: reader.read_f32()?,
            initial_scale: reader.read_f32()?,
            target_scale: reader.read_f32()?,
            scale_ticks: reader.read_u32()?,
            total_scale_ticks: reader.read_u32()?,
        };
        let count = reader.read_u32()?;
        // Every identifier needs at least its length byte.
        if count as usize > reader.remaining() {
            return Err(WireError::TooManyModifiers { count });
        }
        let modifiers = (0..count)
            .map(|_| reader.read_identifier())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { values, modifiers })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        let mut writer = PacketWriter::new();
        self.encode(&mut writer)?;
        Ok(writer.into_bytes())
    }
}

impl ScaleData {
    pub fn to_payload(&self) -> ScalePayload {
        ScalePayload {
            values: self.values(),
            modifiers: self
                .modifier_set()
                .difference(self.kind().default_modifiers())
                .iter()
                .map(|modifier| modifier.id().clone())
                .collect(),
        }
    }

    pub fn apply_payload(&self, payload: &ScalePayload, modifiers: &ModifierRegistry) -> bool {
        let mut set = self.kind().default_modifiers().clone();
        for id in &payload.modifiers {
            match modifiers.get(id) {
                Some(modifier) => {
                    set.insert(Arc::clone(modifier));
                }
                None => warn!(
                    kind = %self.kind().id(),
                    modifier = %id,
                    "unknown_modifier_in_payload"
                ),
            }
        }
        if !self.replace_state(payload.values, set) {
            return false;
        }
        self.kind().events().fire_changed(self);
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScaleSyncMessage {
    pub entity: EntityId,
    pub kind: Identifier,
    pub payload: ScalePayload,
}

impl ScaleSyncMessage {
    pub fn from_data(entity: EntityId, data: &ScaleData) -> Self {
        Self {
            entity,
            kind: data.kind().id().clone(),
            payload: data.to_payload(),
        }
    }

    pub fn encode(&self, writer: &mut PacketWriter) -> Result<(), WireError> {
        writer.write_var_u32(self.entity.0);
        writer.write_identifier(&self.kind)?;
        self.payload.encode(writer)
    }

    pub fn decode(reader: &mut PacketReader<'_>) -> Result<Self, WireError> {
        let entity = EntityId(reader.read_var_u32()?);
        let kind = reader.read_identifier()?;
        let payload = ScalePayload::decode(reader)?;
        Ok(Self {
            entity,
            kind,
            payload,
        })
    }
}

pub fn encode_batch(messages: &[ScaleSyncMessage]) -> Result<Vec<u8>, WireError> {
    let mut writer = PacketWriter::new();
    writer.write_var_u32(messages.len() as u32);
    for message in messages {
        message.encode(&mut writer)?;
    }
    Ok(writer.into_bytes())
}

pub fn decode_batch(bytes: &[u8]) -> Result<Vec<ScaleSyncMessage>, WireError> {
    let mut reader = PacketReader::new(bytes);
    let count = reader.read_var_u32()?;
    let mut messages = Vec::new();
    for _ in 0..count {
        messages.push(ScaleSyncMessage::decode(&mut reader)?);
    }
    reader.finish()?;
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScaleConfig;
    use crate::registry::{kinds, modifiers, Modifier, ScaleKindDef, ScaleRegistries};
    use crate::scale::{EntityScales, SimulationSide};

    fn sample_values() -> ScaleValues {
        ScaleValues {
            base_scale: 1.5,
            prev_base_scale: 1.0,
            initial_scale: 1.0,
            target_scale: 2.0,
            scale_ticks: 3,
            total_scale_ticks: 20,
        }
    }

    #[test]
    fn mid_transition_state_encodes_to_fixed_prefix_and_empty_count() {
        let registries = ScaleRegistries::with_builtins();
        let kind = registries
            .kinds()
            .get(&Identifier::scaling(kinds::BASE))
            .expect("base");
        let data = ScaleData::new(Arc::clone(kind));
        data.replace_state(sample_values(), kind.default_modifiers().clone());

        let bytes = data.to_payload().to_bytes().expect("encode");
        assert_eq!(bytes.len(), FIXED_PREFIX_LEN + 4);
        assert_eq!(
            bytes,
            vec![
                0x3f, 0xc0, 0, 0, // current 1.5
                0x3f, 0x80, 0, 0, // previous 1.0
                0x3f, 0x80, 0, 0, // initial 1.0
                0x40, 0, 0, 0, // target 2.0
                0, 0, 0, 3, // elapsed
                0, 0, 0, 20, // total
                0, 0, 0, 0, // modifier count
            ]
        );
        let mut reader = PacketReader::new(&bytes);
        let decoded = ScalePayload::decode(&mut reader).expect("decode");
        reader.finish().expect("no trailing bytes");
        assert_eq!(decoded.values, sample_values());
        assert!(decoded.modifiers.is_empty());
    }

    #[test]
    fn payload_carries_only_non_default_modifiers() {
        let mut registries = ScaleRegistries::with_builtins();
        let extra = registries
            .register_modifier(Modifier::new(
                Identifier::scaling("extra"),
                2.0,
                |_: &ScaleData, value: f32, _: f32| value,
            ))
            .expect("extra");
        let kind = registries
            .register_kind(
                ScaleKindDef::new(Identifier::scaling("custom"))
                    .with_modifier(Identifier::scaling(modifiers::BASE_MULTIPLIER)),
            )
            .expect("custom");
        let data = ScaleData::new(kind);
        assert!(data.to_payload().modifiers.is_empty());
        data.add_modifier(extra);
        assert_eq!(
            data.to_payload().modifiers,
            vec![Identifier::scaling("extra")]
        );
    }

    #[test]
    fn apply_payload_restores_defaults_plus_delta_without_dirtying() {
        let mut registries = ScaleRegistries::with_builtins();
        registries
            .register_modifier(Modifier::new(
                Identifier::scaling("extra"),
                2.0,
                |_: &ScaleData, value: f32, _: f32| value,
            ))
            .expect("extra");
        let registries = Arc::new(registries);
        let replica = EntityScales::new(
            EntityId(3),
            SimulationSide::Replica,
            Arc::clone(&registries),
            ScaleConfig::default(),
        );
        let width = replica.get_by_id(&Identifier::scaling(kinds::WIDTH));
        let payload = ScalePayload {
            values: sample_values(),
            modifiers: vec![Identifier::scaling("extra"), Identifier::scaling("gone")],
        };
        assert!(width.apply_payload(&payload, registries.modifiers()));
        assert_eq!(width.values(), sample_values());
        assert_eq!(
            width.modifier_ids(),
            vec![
                Identifier::scaling("extra"),
                Identifier::scaling(modifiers::BASE_MULTIPLIER)
            ]
        );
        assert!(!width.should_sync());
    }

    #[test]
    fn batch_round_trips_messages_with_varint_entities() {
        let messages = vec![
            ScaleSyncMessage {
                entity: EntityId(1),
                kind: Identifier::scaling(kinds::BASE),
                payload: ScalePayload {
                    values: sample_values(),
                    modifiers: Vec::new(),
                },
            },
            ScaleSyncMessage {
                entity: EntityId(70_000),
                kind: Identifier::scaling(kinds::REACH),
                payload: ScalePayload {
                    values: ScaleValues::uniform(0.5, 4),
                    modifiers: vec![Identifier::scaling("extra")],
                },
            },
        ];
        let bytes = encode_batch(&messages).expect("encode");
        assert_eq!(decode_batch(&bytes).expect("decode"), messages);
    }

    #[test]
    fn truncated_or_padded_batches_are_rejected() {
        let message = ScaleSyncMessage {
            entity: EntityId(1),
            kind: Identifier::scaling(kinds::BASE),
            payload: ScalePayload {
                values: sample_values(),
                modifiers: Vec::new(),
            },
        };
        let mut bytes = encode_batch(&[message]).expect("encode");
        assert!(matches!(
            decode_batch(&bytes[..bytes.len() - 1]),
            Err(WireError::UnexpectedEnd { .. })
        ));
        bytes.push(0);
        assert_eq!(
            decode_batch(&bytes),
            Err(WireError::TrailingBytes { count: 1 })
        );
    }

    #[test]
    fn absurd_modifier_count_is_rejected_before_allocation() {
        let mut writer = PacketWriter::new();
        ScalePayload {
            values: sample_values(),
            modifiers: Vec::new(),
        }
        .encode(&mut writer)
        .expect("encode");
        let mut bytes = writer.into_bytes();
        bytes[FIXED_PREFIX_LEN..].copy_from_slice(&u32::MAX.to_be_bytes());
        let mut reader = PacketReader::new(&bytes);
        assert_eq!(
            ScalePayload::decode(&mut reader),
            Err(WireError::TooManyModifiers { count: u32::MAX })
        );
    }
}
