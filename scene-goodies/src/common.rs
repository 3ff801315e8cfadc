pub use anyhow::{bail, ensure, format_err, Context as _, Error, Result};
pub use nalgebra::{Matrix3, Matrix4, Rotation3, Vector3};
pub use noisy_float::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::fmt::Debug;
pub use tch::{kind::FLOAT_CPU, Device, IndexOp, Kind, Tensor};
