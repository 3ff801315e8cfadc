//! Error classes that calling code needs to tell apart.

/// Per-example data failures.
///
/// These indicate a corrupted or occluded recording rather than a broken
/// configuration. A driving loop should downcast to this type, drop the
/// example, and continue; every other error aborts example construction
/// as a configuration error.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// The segmentation mask selected no depth-valid pixel for an object.
    #[error("object {object:?} has no valid point under its segmentation mask")]
    EmptyObjectMask { object: String },

    /// A recorded object pose cannot be inverted.
    #[error("recorded pose of object {object:?} is singular")]
    SingularPose { object: String },
}
