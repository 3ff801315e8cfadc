//! The symbolic structure-description sequence.

use crate::{common::*, dataset::StructureKind, dataset::StructureParameters};

/// The fixed number of sentence slots.
pub const SENTENCE_LEN: usize = 5;

/// Semantic role of a sentence value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenRole {
    Shape,
    Rotation,
    PositionX,
    PositionY,
    Radius,
}

/// A sentence value, either symbolic or numeric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenValue {
    Text(String),
    Scalar(f64),
}

/// One slot of the structure-description sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SentenceWord {
    /// A real (value, role) token.
    Value { value: TokenValue, role: TokenRole },
    /// The explicit padding sentinel.
    Pad,
}

impl SentenceWord {
    fn text(text: &str, role: TokenRole) -> Self {
        Self::Value {
            value: TokenValue::Text(text.to_owned()),
            role,
        }
    }

    fn scalar(value: f64, role: TokenRole) -> Self {
        Self::Value {
            value: TokenValue::Scalar(value),
            role,
        }
    }
}

/// The external tokenizer seam mapping sentence words to vocabulary ids.
pub trait Tokenizer {
    fn tokenize(&self, word: &SentenceWord) -> Result<i64>;
}

/// Build the padded sentence and its pad mask for a structure.
///
/// Circle and line descriptions fill all [`SENTENCE_LEN`] slots; tower
/// and dinner use four and an explicit pad slot. Line lengths enter the
/// radius slot halved.
pub fn build_sentence(params: &StructureParameters) -> (Vec<SentenceWord>, Vec<i64>) {
    let mut sentence = vec![
        SentenceWord::text(params.kind.name(), TokenRole::Shape),
        SentenceWord::scalar(params.rotation[2], TokenRole::Rotation),
        SentenceWord::scalar(params.position[0], TokenRole::PositionX),
        SentenceWord::scalar(params.position[1], TokenRole::PositionY),
    ];

    let pad_mask = match params.kind {
        StructureKind::Circle { radius } => {
            sentence.push(SentenceWord::scalar(radius, TokenRole::Radius));
            vec![0; SENTENCE_LEN]
        }
        StructureKind::Line { length } => {
            sentence.push(SentenceWord::scalar(length / 2.0, TokenRole::Radius));
            vec![0; SENTENCE_LEN]
        }
        StructureKind::Tower | StructureKind::Dinner => {
            sentence.push(SentenceWord::Pad);
            vec![0, 0, 0, 0, 1]
        }
    };

    (sentence, pad_mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(kind: StructureKind) -> StructureParameters {
        StructureParameters {
            kind,
            position: [0.4, -0.2, 0.0],
            rotation: [0.0, 0.0, 1.5],
        }
    }

    #[test]
    fn circle_sentence_fills_every_slot() {
        let (sentence, pad_mask) = build_sentence(&params(StructureKind::Circle { radius: 0.3 }));

        assert_eq!(sentence.len(), SENTENCE_LEN);
        assert_eq!(pad_mask, vec![0; 5]);
        assert_eq!(
            sentence[0],
            SentenceWord::text("circle", TokenRole::Shape)
        );
        assert_eq!(sentence[4], SentenceWord::scalar(0.3, TokenRole::Radius));
    }

    #[test]
    fn line_sentence_halves_the_length() {
        let (sentence, _) = build_sentence(&params(StructureKind::Line { length: 0.5 }));
        assert_eq!(sentence[4], SentenceWord::scalar(0.25, TokenRole::Radius));
    }

    #[test]
    fn tower_sentence_ends_with_an_explicit_pad() {
        let (sentence, pad_mask) = build_sentence(&params(StructureKind::Tower));

        assert_eq!(sentence.len(), SENTENCE_LEN);
        assert_eq!(sentence[4], SentenceWord::Pad);
        assert_eq!(pad_mask, vec![0, 0, 0, 0, 1]);
    }
}
