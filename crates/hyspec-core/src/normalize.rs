//! Normalization schemes mapping one spectral band into the displayable
//! `[0, 1]` range.
//!
//! Every scheme runs the same sequence through
//! [`NormalizationScheme::normalize`]: `pre_check` validates inputs,
//! `do_normalize` computes, `post_check` validates the result. A zero
//! value range never divides; the band degrades to all zeros instead.

use std::fmt;

use ndarray::{Array2, ArrayView2, s};
use serde::{Deserialize, Serialize};

use crate::annotation::{ContourSet, REFERENCE_LABELS, Rect};
use crate::cube::min_max;
use crate::error::{HyspecError, Result};

/// Display channel a band is rendered into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Red,
    Green,
    Blue,
}

impl Channel {
    pub const ALL: [Self; 3] = [Self::Red, Self::Green, Self::Blue];

    pub const fn index(&self) -> usize {
        match self {
            Self::Red => 0,
            Self::Green => 1,
            Self::Blue => 2,
        }
    }
}

/// Side information a scheme may need beyond the band itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizationContext<'a> {
    pub annotations: Option<&'a ContourSet>,
}

pub trait NormalizationScheme: fmt::Debug {
    fn name(&self) -> &'static str;

    fn pre_check(&self, _band: ArrayView2<'_, f32>, _ctx: &NormalizationContext<'_>) -> Result<()> {
        Ok(())
    }

    fn do_normalize(
        &self,
        band: ArrayView2<'_, f32>,
        channel: Channel,
        ctx: &NormalizationContext<'_>,
    ) -> Result<Array2<f32>>;

    fn post_check(&self, _normalized: &Array2<f32>) -> Result<()> {
        Ok(())
    }

    fn normalize(
        &self,
        band: ArrayView2<'_, f32>,
        channel: Channel,
        ctx: &NormalizationContext<'_>,
    ) -> Result<Array2<f32>> {
        self.pre_check(band, ctx)?;
        let normalized = self.do_normalize(band, channel, ctx)?;
        self.post_check(&normalized)?;
        Ok(normalized)
    }
}

/// Linear map of `[lo, hi]` onto `[0, 1]`, optionally clipped.
fn rescale(band: ArrayView2<'_, f32>, lo: f32, hi: f32, clip: bool) -> Array2<f32> {
    let range = hi - lo;
    if range == 0.0 {
        return Array2::zeros(band.raw_dim());
    }
    band.mapv(|v| {
        let t = (v - lo) / range;
        if clip { t.clamp(0.0, 1.0) } else { t }
    })
}

fn finite_range<'a>(values: impl IntoIterator<Item = &'a f32>, what: &str) -> Result<(f32, f32)> {
    min_max(values).ok_or_else(|| HyspecError::Normalization(format!("{what} has no finite samples")))
}

/// Min/max of the band handed in.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleNormalization;

impl NormalizationScheme for SimpleNormalization {
    fn name(&self) -> &'static str {
        "simple"
    }

    fn do_normalize(
        &self,
        band: ArrayView2<'_, f32>,
        _channel: Channel,
        _ctx: &NormalizationContext<'_>,
    ) -> Result<Array2<f32>> {
        let (lo, hi) = finite_range(band.iter(), "band")?;
        Ok(rescale(band, lo, hi, false))
    }

    fn post_check(&self, normalized: &Array2<f32>) -> Result<()> {
        if normalized
            .iter()
            .any(|v| v.is_finite() && !(0.0..=1.0).contains(v))
        {
            return Err(HyspecError::Normalization(
                "simple normalization left the unit range".to_string(),
            ));
        }
        Ok(())
    }
}

/// A `[min, max]` window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

/// User-supplied range, globally or per display channel. Samples outside
/// the range clip.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedNormalization {
    default: ValueRange,
    per_channel: [Option<ValueRange>; 3],
}

impl FixedNormalization {
    pub fn new(min: f32, max: f32) -> Self {
        Self {
            default: ValueRange { min, max },
            per_channel: [None; 3],
        }
    }

    /// Override the range used for one channel.
    pub fn with_channel(mut self, channel: Channel, min: f32, max: f32) -> Self {
        self.per_channel[channel.index()] = Some(ValueRange { min, max });
        self
    }

    pub fn range_for(&self, channel: Channel) -> ValueRange {
        self.per_channel[channel.index()].unwrap_or(self.default)
    }
}

impl NormalizationScheme for FixedNormalization {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn pre_check(&self, _band: ArrayView2<'_, f32>, _ctx: &NormalizationContext<'_>) -> Result<()> {
        for channel in Channel::ALL {
            let r = self.range_for(channel);
            if r.min > r.max {
                return Err(HyspecError::Normalization(format!(
                    "fixed range for {channel:?} has min {} above max {}",
                    r.min, r.max
                )));
            }
        }
        Ok(())
    }

    fn do_normalize(
        &self,
        band: ArrayView2<'_, f32>,
        channel: Channel,
        _ctx: &NormalizationContext<'_>,
    ) -> Result<Array2<f32>> {
        let r = self.range_for(channel);
        Ok(rescale(band, r.min, r.max, true))
    }
}

/// Min/max taken over a sub-region of the band.
///
/// The region is sliced half-open, so the `bottom` row and `right` column
/// do not contribute to the range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionNormalization {
    pub region: Rect,
}

impl NormalizationScheme for RegionNormalization {
    fn name(&self) -> &'static str {
        "region"
    }

    fn pre_check(&self, band: ArrayView2<'_, f32>, _ctx: &NormalizationContext<'_>) -> Result<()> {
        let (h, w) = band.dim();
        self.region.check_within(h, w)
    }

    fn do_normalize(
        &self,
        band: ArrayView2<'_, f32>,
        _channel: Channel,
        _ctx: &NormalizationContext<'_>,
    ) -> Result<Array2<f32>> {
        let r = self.region;
        let window = band.slice(s![r.top..r.bottom, r.left..r.right]);
        let (lo, hi) = finite_range(window.iter(), "region")?;
        Ok(rescale(band, lo, hi, true))
    }
}

/// Min/max restricted to pixels covered by labeled object polygons.
/// Reference-marker polygons are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectNormalization {
    excluded_labels: Vec<String>,
}

impl Default for ObjectNormalization {
    fn default() -> Self {
        Self {
            excluded_labels: REFERENCE_LABELS.iter().map(|l| l.to_string()).collect(),
        }
    }
}

impl ObjectNormalization {
    pub fn with_excluded_labels(labels: Vec<String>) -> Self {
        Self {
            excluded_labels: labels,
        }
    }
}

impl NormalizationScheme for ObjectNormalization {
    fn name(&self) -> &'static str {
        "object_annotations"
    }

    fn pre_check(&self, _band: ArrayView2<'_, f32>, ctx: &NormalizationContext<'_>) -> Result<()> {
        match ctx.annotations {
            Some(set) if set.has_annotations() => Ok(()),
            _ => Err(HyspecError::Normalization(
                "object normalization requires annotations".to_string(),
            )),
        }
    }

    fn do_normalize(
        &self,
        band: ArrayView2<'_, f32>,
        _channel: Channel,
        ctx: &NormalizationContext<'_>,
    ) -> Result<Array2<f32>> {
        let Some(annotations) = ctx.annotations else {
            return Err(HyspecError::Normalization("annotations missing".to_string()));
        };
        let (h, w) = band.dim();
        let excluded: Vec<&str> = self.excluded_labels.iter().map(String::as_str).collect();
        let mask = annotations.rasterize(h, w, &excluded);

        let selected = band
            .iter()
            .zip(mask.iter())
            .filter_map(|(v, &inside)| inside.then_some(v));
        let (lo, hi) = finite_range(selected, "annotated object area")?;
        Ok(rescale(band, lo, hi, true))
    }
}

/// Leaves the band untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNormalization;

impl NormalizationScheme for NoNormalization {
    fn name(&self) -> &'static str {
        "none"
    }

    fn do_normalize(
        &self,
        band: ArrayView2<'_, f32>,
        _channel: Channel,
        _ctx: &NormalizationContext<'_>,
    ) -> Result<Array2<f32>> {
        Ok(band.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{Contour, WHITE_REFERENCE_LABEL};
    use ndarray::array;

    fn ctx() -> NormalizationContext<'static> {
        NormalizationContext::default()
    }

    #[test]
    fn test_simple_maps_extremes_exactly() {
        let band = array![[3.0_f32, 5.0], [7.0, 11.0]];
        let out = SimpleNormalization
            .normalize(band.view(), Channel::Red, &ctx())
            .unwrap();
        assert_eq!(out[[0, 0]], 0.0);
        assert_eq!(out[[1, 1]], 1.0);
        assert_eq!(out[[0, 1]], 0.25);
    }

    #[test]
    fn test_constant_band_degrades_to_zeros() {
        let band = Array2::from_elem((3, 3), 4.2_f32);
        let out = SimpleNormalization
            .normalize(band.view(), Channel::Green, &ctx())
            .unwrap();
        assert!(out.iter().all(|&v| v == 0.0));

        let fixed = FixedNormalization::new(1.0, 1.0);
        let out = fixed.normalize(band.view(), Channel::Blue, &ctx()).unwrap();
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_fixed_clips_and_uses_channel_override() {
        let band = array![[-5.0_f32, 0.0], [5.0, 20.0]];
        let scheme = FixedNormalization::new(0.0, 10.0).with_channel(Channel::Blue, 5.0, 15.0);

        let red = scheme.normalize(band.view(), Channel::Red, &ctx()).unwrap();
        assert_eq!(red, array![[0.0_f32, 0.0], [0.5, 1.0]]);

        let blue = scheme.normalize(band.view(), Channel::Blue, &ctx()).unwrap();
        assert_eq!(blue, array![[0.0_f32, 0.0], [0.0, 1.0]]);
    }

    #[test]
    fn test_fixed_rejects_inverted_range() {
        let scheme = FixedNormalization::new(2.0, 1.0);
        let band = Array2::<f32>::zeros((1, 1));
        assert!(scheme.normalize(band.view(), Channel::Red, &ctx()).is_err());
    }

    #[test]
    fn test_region_excludes_bottom_row_and_right_column() {
        // Region rows 0..2, columns 0..2: the 100.0 at [2, 2] lies on the
        // excluded boundary and must not stretch the range.
        let band = array![[0.0_f32, 1.0, 9.0], [2.0, 4.0, 9.0], [9.0, 9.0, 100.0]];
        let scheme = RegionNormalization {
            region: Rect::new(0, 0, 2, 2),
        };
        let out = scheme.normalize(band.view(), Channel::Red, &ctx()).unwrap();
        assert_eq!(out[[1, 1]], 1.0);
        assert_eq!(out[[0, 1]], 0.25);
        assert_eq!(out[[2, 2]], 1.0);
    }

    #[test]
    fn test_region_outside_band_fails_pre_check() {
        let scheme = RegionNormalization {
            region: Rect::new(0, 0, 5, 5),
        };
        let band = Array2::<f32>::zeros((3, 3));
        assert!(scheme.normalize(band.view(), Channel::Red, &ctx()).is_err());
    }

    #[test]
    fn test_object_normalization_uses_masked_pixels_only() {
        let mut band = Array2::from_elem((4, 4), 50.0_f32);
        band[[1, 1]] = 10.0;
        band[[2, 2]] = 20.0;
        band[[1, 2]] = 15.0;
        band[[2, 1]] = 15.0;
        let set = ContourSet::new(vec![
            Contour::from_rect("leaf", Rect::new(1, 1, 3, 3)),
            Contour::from_rect(WHITE_REFERENCE_LABEL, Rect::new(0, 0, 4, 4)),
        ]);
        let context = NormalizationContext {
            annotations: Some(&set),
        };
        let out = ObjectNormalization::default()
            .normalize(band.view(), Channel::Red, &context)
            .unwrap();
        assert_eq!(out[[1, 1]], 0.0);
        assert_eq!(out[[2, 2]], 1.0);
        assert_eq!(out[[1, 2]], 0.5);
        assert_eq!(out[[0, 0]], 1.0);
    }

    #[test]
    fn test_object_normalization_requires_annotations() {
        let band = Array2::<f32>::zeros((2, 2));
        let err = ObjectNormalization::default()
            .normalize(band.view(), Channel::Red, &ctx())
            .unwrap_err();
        assert!(matches!(err, HyspecError::Normalization(_)));
    }

    #[test]
    fn test_none_passes_through() {
        let band = array![[-1.0_f32, 300.0]];
        let out = NoNormalization
            .normalize(band.view(), Channel::Red, &ctx())
            .unwrap();
        assert_eq!(out, band);
    }
}
