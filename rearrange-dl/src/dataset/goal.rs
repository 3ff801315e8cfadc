//! The symbolic goal specification attached to each recorded episode.

use crate::common::*;

/// One named object group of a goal specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectGroup {
    pub objects: Vec<String>,
}

/// The closed set of target arrangement shapes.
///
/// The recorded JSON tags the shape with a `type` field; an unrecognized
/// shape fails deserialization, so no other case can reach the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StructureKind {
    Circle { radius: f64 },
    Line { length: f64 },
    Tower,
    Dinner,
}

impl StructureKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Circle { .. } => "circle",
            Self::Line { .. } => "line",
            Self::Tower => "tower",
            Self::Dinner => "dinner",
        }
    }

    /// Whether the recorded target-object order is reversed for this shape.
    pub fn reverses_object_order(&self) -> bool {
        matches!(self, Self::Circle { .. } | Self::Line { .. })
    }
}

/// Pose and shape parameters of the target arrangement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureParameters {
    #[serde(flatten)]
    pub kind: StructureKind,
    pub position: [f64; 3],
    /// Static-xyz Euler angles.
    pub rotation: [f64; 3],
}

/// The parsed goal specification of one episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalSpecification {
    pub rearrange: ObjectGroup,
    pub anchor: ObjectGroup,
    pub distract: ObjectGroup,
    pub shape: StructureParameters,
}

impl GoalSpecification {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("malformed goal specification")
    }

    /// Number of objects to be rearranged.
    pub fn num_rearrange_objects(&self) -> usize {
        self.rearrange.objects.len()
    }

    /// Number of anchor and distractor objects.
    pub fn num_other_objects(&self) -> usize {
        self.anchor.objects.len() + self.distract.objects.len()
    }
}
