//! Fixed-cardinality object point-cloud extraction.

use crate::{common::*, error::DataError};

/// Extract exactly `num_pts` (position, color) samples of one object.
///
/// `mask` is the boolean per-pixel selection (segmentation id match AND
/// depth validity). Fewer masked pixels than `num_pts` are resampled with
/// replacement; more are subsampled without replacement. An empty mask is
/// a [`DataError::EmptyObjectMask`] and rejects the whole example.
pub fn sample_object_points<R>(
    xyz: &Tensor,
    rgb: &Tensor,
    mask: &Tensor,
    num_pts: usize,
    object: &str,
    rng: &mut R,
) -> Result<(Tensor, Tensor)>
where
    R: Rng,
{
    let (height, width, _channels) = xyz.size3()?;
    ensure!(
        mask.size2()? == (height, width),
        "mask size {:?} does not match the point field size ({}, {})",
        mask.size(),
        height,
        width
    );

    tch::no_grad(|| {
        let candidates = mask.view([-1]).nonzero().view([-1]);
        let available = candidates.size()[0];
        if available == 0 {
            return Err(DataError::EmptyObjectMask {
                object: object.to_owned(),
            }
            .into());
        }

        let chosen: Vec<i64> = if available >= num_pts as i64 {
            rand::seq::index::sample(rng, available as usize, num_pts)
                .iter()
                .map(|index| index as i64)
                .collect()
        } else {
            (0..num_pts).map(|_| rng.gen_range(0..available)).collect()
        };
        let chosen = candidates.index_select(0, &Tensor::of_slice(&chosen));

        let points = xyz.view([-1, 3]).index_select(0, &chosen);
        let colors = rgb.view([-1, 3]).index_select(0, &chosen);
        Ok((points, colors))
    })
}
