use std::sync::Arc;

use serde_json::{Map, Number, Value};
use tracing::warn;

use crate::identifier::Identifier;
use crate::registry::ModifierRegistry;
use crate::scale::{EntityScales, ScaleData, ScaleValues};

pub const DOCUMENT_KEY: &str = "scaling:scale_data_types";

pub const SCALE_KEY: &str = "scale";
pub const PREVIOUS_KEY: &str = "previous";
pub const INITIAL_KEY: &str = "initial";
pub const TARGET_KEY: &str = "target";
pub const TICKS_KEY: &str = "ticks";
pub const TOTAL_TICKS_KEY: &str = "total_ticks";
pub const MODIFIERS_KEY: &str = "modifiers";
pub const BASE_VALUE_MODIFIERS_KEY: &str = "baseValueModifiers";

pub type Document = Map<String, Value>;

impl ScaleData {
    pub fn write_document(&self) -> Document {
        let mut doc = Document::new();
        if !self.is_mutable() {
            return doc;
        }
        let values = self.values();
        let defaults = ScaleValues::defaults(self.kind());

        for (key, value, default) in [
            (SCALE_KEY, values.base_scale, defaults.base_scale),
            (PREVIOUS_KEY, values.prev_base_scale, defaults.prev_base_scale),
            (INITIAL_KEY, values.initial_scale, defaults.initial_scale),
            (TARGET_KEY, values.target_scale, defaults.target_scale),
        ] {
            if value.to_bits() == default.to_bits() {
                continue;
            }
            doc.insert(key.to_string(), encode_float(value));
        }
        if values.scale_ticks != defaults.scale_ticks {
            doc.insert(TICKS_KEY.to_string(), Value::from(values.scale_ticks));
        }
        if values.total_scale_ticks != defaults.total_scale_ticks {
            doc.insert(
                TOTAL_TICKS_KEY.to_string(),
                Value::from(values.total_scale_ticks),
            );
        }

        let extra = self
            .modifier_set()
            .difference(self.kind().default_modifiers());
        if !extra.is_empty() {
            let ids = extra
                .iter()
                .map(|modifier| Value::String(modifier.id().to_string()))
                .collect();
            doc.insert(MODIFIERS_KEY.to_string(), Value::Array(ids));
        }
        doc
    }

    pub fn read_document(&self, doc: &Document, modifiers: &ModifierRegistry) {
        if !self.is_mutable() {
            return;
        }
        let kind = self.kind();
        let defaults = ScaleValues::defaults(kind);
        let values = ScaleValues {
            base_scale: self.float_field(doc, SCALE_KEY, defaults.base_scale),
            prev_base_scale: self.float_field(doc, PREVIOUS_KEY, defaults.prev_base_scale),
            initial_scale: self.float_field(doc, INITIAL_KEY, defaults.initial_scale),
            target_scale: self.float_field(doc, TARGET_KEY, defaults.target_scale),
            scale_ticks: self.tick_field(doc, TICKS_KEY, defaults.scale_ticks),
            total_scale_ticks: self.tick_field(doc, TOTAL_TICKS_KEY, defaults.total_scale_ticks),
        };

        let mut set = kind.default_modifiers().clone();
        let (modifiers_key, entries) = match doc.get(MODIFIERS_KEY) {
            Some(entries) => (MODIFIERS_KEY, Some(entries)),
            None => (BASE_VALUE_MODIFIERS_KEY, doc.get(BASE_VALUE_MODIFIERS_KEY)),
        };
        match entries {
            None => {}
            Some(Value::Array(entries)) => {
                for entry in entries {
                    let id = entry.as_str().and_then(Identifier::try_parse);
                    match id.as_ref().and_then(|id| modifiers.get(id)) {
                        Some(modifier) => {
                            set.insert(Arc::clone(modifier));
                        }
                        None => warn!(
                            kind = %kind.id(),
                            modifier = %entry,
                            "unknown_modifier_in_document"
                        ),
                    }
                }
            }
            Some(other) => self.warn_malformed(modifiers_key, other),
        }

        if self.replace_state(values, set) {
            self.on_update();
        }
    }

    fn float_field(&self, doc: &Document, key: &'static str, default: f32) -> f32 {
        match doc.get(key) {
            None => default,
            Some(value) => match decode_float(value) {
                Some(number) => number,
                None => {
                    self.warn_malformed(key, value);
                    default
                }
            },
        }
    }

    fn tick_field(&self, doc: &Document, key: &'static str, default: u32) -> u32 {
        match doc.get(key) {
            None => default,
            Some(value) => match value.as_u64().and_then(|n| u32::try_from(n).ok()) {
                Some(ticks) => ticks,
                None => {
                    self.warn_malformed(key, value);
                    default
                }
            },
        }
    }

    fn warn_malformed(&self, field: &'static str, value: &Value) {
        warn!(
            kind = %self.kind().id(),
            field,
            value = %value,
            "malformed_scale_document_field"
        );
    }
}

// JSON has no non-finite numbers, so those travel as strings.
fn encode_float(value: f32) -> Value {
    match Number::from_f64(f64::from(value)) {
        Some(number) => Value::Number(number),
        None if value.is_nan() => Value::String("nan".to_string()),
        None if value > 0.0 => Value::String("inf".to_string()),
        None => Value::String("-inf".to_string()),
    }
}

fn decode_float(value: &Value) -> Option<f32> {
    match value {
        Value::Number(number) => number
            .as_f64()
            .filter(|number| number.abs() <= f64::from(f32::MAX))
            .map(|number| number as f32),
        Value::String(raw) => match raw.as_str() {
            "inf" => Some(f32::INFINITY),
            "-inf" => Some(f32::NEG_INFINITY),
            "nan" => Some(f32::NAN),
            _ => None,
        },
        _ => None,
    }
}

impl EntityScales {
    pub fn write_document(&self, root: &mut Document) {
        if self.ignores_document() {
            return;
        }
        let mut types = Document::new();
        for data in self.constructed() {
            let doc = data.write_document();
            if !doc.is_empty() {
                types.insert(data.kind().id().to_string(), Value::Object(doc));
            }
        }
        if types.is_empty() {
            root.remove(DOCUMENT_KEY);
        } else {
            root.insert(DOCUMENT_KEY.to_string(), Value::Object(types));
        }
    }

    pub fn read_document(&self, root: &Document) {
        if self.ignores_document() {
            return;
        }
        let types = match root.get(DOCUMENT_KEY) {
            None => return,
            Some(Value::Object(types)) => types,
            Some(other) => {
                warn!(
                    entity = self.entity().0,
                    value = %other,
                    "malformed_scale_document"
                );
                return;
            }
        };

        let registries = Arc::clone(self.registries());
        for kind in registries.kinds().iter_valid() {
            match types.get(&kind.id().to_string()) {
                Some(Value::Object(doc)) => {
                    self.get(kind).read_document(doc, registries.modifiers());
                }
                Some(other) => warn!(
                    entity = self.entity().0,
                    kind = %kind.id(),
                    value = %other,
                    "malformed_scale_document"
                ),
                None => {}
            }
        }
    }
}
