//! Attribute codec: bitmask packing and spell checking of free text.

use resource_controller_sdk::{AttrValue, Attributes, Dictionary};
use serde::Serialize;

use super::schema::{AttrKind, BitMaskSpec, ResourceSchema};

/// Pack the flag booleans of `attrs` into `spec.attribute`.
///
/// Flags present in `attrs` set or clear their bit. Absent flags keep the bit
/// from `base` (the stored mask on update, or a mask the client sent
/// directly); with no base they are clear. The flag attributes are removed.
pub fn encode_bitmask(spec: &BitMaskSpec, attrs: &mut Attributes, base: Option<i64>) {
    let sent = attrs.remove(&spec.attribute).and_then(|v| v.as_i64());
    let mut mask = sent.or(base).unwrap_or(0);

    for (bit, flag) in spec.flags.iter().enumerate() {
        let Some(value) = attrs.remove(flag) else {
            continue;
        };
        if value.as_bool().unwrap_or(false) {
            mask |= 1_i64 << bit;
        } else {
            mask &= !(1_i64 << bit);
        }
    }

    attrs.insert(spec.attribute.clone(), AttrValue::Integer(mask));
}

/// Replace `spec.attribute` with one boolean per flag.
///
/// A missing or null mask decodes to all flags clear; a non-integer value is
/// left untouched.
pub fn decode_bitmask(spec: &BitMaskSpec, attrs: &mut Attributes) {
    let mask = match attrs.get(&spec.attribute) {
        None | Some(AttrValue::Null) => 0,
        Some(AttrValue::Integer(mask)) => *mask,
        Some(other) => {
            tracing::warn!(
                attribute = %spec.attribute,
                value = %other,
                "Bitmask attribute does not hold an integer; leaving it as is"
            );
            return;
        }
    };
    attrs.remove(&spec.attribute);
    for (bit, flag) in spec.flags.iter().enumerate() {
        attrs.insert(flag.clone(), AttrValue::Bool(mask & (1_i64 << bit) != 0));
    }
}

/// Unknown word found in a spell-checked attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpellWarning {
    pub attribute: String,
    pub word: String,
    pub suggestions: Vec<String>,
}

/// Check every spell-checked string attribute present in `attrs`.
///
/// Tokens containing digits are skipped. Each unknown word is reported once
/// per attribute.
pub fn spell_check(
    schema: &ResourceSchema,
    attrs: &Attributes,
    dictionary: &dyn Dictionary,
) -> Vec<SpellWarning> {
    let mut warnings = Vec::new();
    for decl in schema
        .attributes()
        .iter()
        .filter(|d| d.spell_checked && d.kind == AttrKind::String)
    {
        let Some(text) = attrs.get(&decl.name).and_then(AttrValue::as_str) else {
            continue;
        };
        let mut seen = Vec::<&str>::new();
        for word in words(text) {
            if seen.contains(&word) || dictionary.check(word) {
                continue;
            }
            seen.push(word);
            warnings.push(SpellWarning {
                attribute: decl.name.clone(),
                word: word.to_owned(),
                suggestions: dictionary.suggest(word),
            });
        }
    }
    warnings
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\''))
        .filter(|w| !w.is_empty() && !w.chars().any(|c| c.is_ascii_digit()))
}

/// Request-scoped view of the codec switches for one resource type.
pub struct AttributeCodec<'a> {
    schema: &'a ResourceSchema,
    bit_mask: bool,
}

impl<'a> AttributeCodec<'a> {
    #[must_use]
    pub fn new(schema: &'a ResourceSchema, bit_mask: bool) -> Self {
        Self { schema, bit_mask }
    }

    /// The bitmask in effect, if the switch is on and the type declares one.
    #[must_use]
    pub fn mask(&self) -> Option<&'a BitMaskSpec> {
        if self.bit_mask { self.schema.bit_mask() } else { None }
    }

    /// Wire attributes -> stored attributes. `stored` is the current record
    /// on update.
    pub fn encode(&self, attrs: &mut Attributes, stored: Option<&Attributes>) {
        if let Some(spec) = self.mask() {
            let base = stored
                .and_then(|s| s.get(&spec.attribute))
                .and_then(AttrValue::as_i64);
            encode_bitmask(spec, attrs, base);
        }
    }

    /// Stored attributes -> wire attributes.
    pub fn decode(&self, attrs: &mut Attributes) {
        if let Some(spec) = self.mask() {
            decode_bitmask(spec, attrs);
        }
    }
}
