pub use anyhow::{bail, ensure, format_err, Context as _, Error, Result};
pub use getset::{CopyGetters, Getters};
pub use indexmap::IndexMap;
pub use itertools::{izip, Itertools as _};
pub use log::{debug, warn};
pub use nalgebra::{Matrix3, Matrix4, Vector3};
pub use noisy_float::prelude::*;
pub use rand::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::{
    collections::HashMap,
    fmt::Debug,
    iter,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};
pub use tch::{
    kind::{FLOAT_CPU, INT64_CPU},
    Device, IndexOp, Kind, Tensor,
};
pub use tch_tensor_like::TensorLike;
