//! Scene timing for the final slideshow.

use crate::core::{AssetHandle, JobResultItem, Ordinal};
use serde::{Deserialize, Serialize};

/// Default crossfade between images.
pub const TRANSITION_SECONDS: f64 = 0.8;
/// Shortest time an image stays on screen.
pub const MIN_IMAGE_SECONDS: f64 = 2.0;
/// Above this, transitions are widened.
pub const WIDEN_ABOVE_SECONDS: f64 = 8.0;
/// Widest transition.
pub const MAX_TRANSITION_SECONDS: f64 = 1.5;
/// Video length when the narration length is unknown.
pub const FALLBACK_DURATION_SECONDS: f64 = 30.0;

/// One image on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Ordinal of the source image.
    pub ordinal: Ordinal,
    /// The image.
    pub asset: AssetHandle,
    /// When the image appears.
    pub start_seconds: f64,
    /// How long it stays.
    pub duration_seconds: f64,
}

/// Timeline of the final video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenePlan {
    /// Total video length.
    pub duration_seconds: f64,
    /// Display time of each image.
    pub image_duration_seconds: f64,
    /// Crossfade between consecutive images.
    pub transition_seconds: f64,
    /// Scenes in ordinal order.
    pub scenes: Vec<Scene>,
}

impl ScenePlan {
    /// Spreads `images` over the narration.
    ///
    /// A missing, zero or non-finite duration falls back to
    /// [`FALLBACK_DURATION_SECONDS`].
    #[must_use]
    pub fn compute(duration: Option<f64>, images: &[JobResultItem]) -> Self {
        let duration_seconds = duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(FALLBACK_DURATION_SECONDS);

        let mut ordered: Vec<&JobResultItem> = images.iter().collect();
        ordered.sort_by_key(|item| item.ordinal);

        if ordered.is_empty() {
            return Self {
                duration_seconds,
                image_duration_seconds: 0.0,
                transition_seconds: TRANSITION_SECONDS,
                scenes: Vec::new(),
            };
        }

        #[allow(clippy::cast_precision_loss)]
        let count = ordered.len() as f64;
        let per_image = |transition: f64| {
            ((duration_seconds - (count - 1.0) * transition) / count).max(MIN_IMAGE_SECONDS)
        };

        let mut transition_seconds = TRANSITION_SECONDS;
        let mut image_duration_seconds = per_image(transition_seconds);
        if image_duration_seconds > WIDEN_ABOVE_SECONDS {
            transition_seconds = MAX_TRANSITION_SECONDS.min(image_duration_seconds * 0.15);
            image_duration_seconds = per_image(transition_seconds);
        }

        let step = image_duration_seconds + transition_seconds;
        let scenes = ordered
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                #[allow(clippy::cast_precision_loss)]
                let start_seconds = index as f64 * step;
                Scene {
                    ordinal: item.ordinal,
                    asset: item.asset.clone(),
                    start_seconds,
                    duration_seconds: image_duration_seconds,
                }
            })
            .collect();

        Self {
            duration_seconds,
            image_duration_seconds,
            transition_seconds,
            scenes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images(ordinals: &[Ordinal]) -> Vec<JobResultItem> {
        ordinals
            .iter()
            .map(|&o| JobResultItem::new(o, AssetHandle::new(format!("img-{o}"))))
            .collect()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_four_images_over_thirty_seconds() {
        let plan = ScenePlan::compute(Some(30.0), &images(&[0, 1, 2, 3]));
        assert!(close(plan.transition_seconds, 0.8));
        assert!(close(plan.image_duration_seconds, 6.9));
        assert!(close(plan.scenes[1].start_seconds, 7.7));
        assert_eq!(plan.scenes.len(), 4);
    }

    #[test]
    fn test_long_images_widen_transitions() {
        let plan = ScenePlan::compute(Some(20.0), &images(&[0, 1]));
        assert!(close(plan.transition_seconds, 1.44));
        assert!(close(plan.image_duration_seconds, 9.28));

        let single = ScenePlan::compute(Some(30.0), &images(&[0]));
        assert!(close(single.transition_seconds, 1.5));
        assert!(close(single.image_duration_seconds, 30.0));
    }

    #[test]
    fn test_minimum_image_time() {
        let plan = ScenePlan::compute(Some(10.0), &images(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]));
        assert!(close(plan.image_duration_seconds, MIN_IMAGE_SECONDS));
    }

    #[test]
    fn test_unknown_duration_falls_back() {
        for duration in [None, Some(0.0), Some(f64::NAN)] {
            let plan = ScenePlan::compute(duration, &images(&[0, 1, 2, 3]));
            assert!(close(plan.duration_seconds, FALLBACK_DURATION_SECONDS));
        }
    }

    #[test]
    fn test_scenes_follow_ordinals_and_gaps() {
        let plan = ScenePlan::compute(Some(30.0), &images(&[3, 0, 2]));
        let ordinals: Vec<Ordinal> = plan.scenes.iter().map(|s| s.ordinal).collect();
        assert_eq!(ordinals, vec![0, 2, 3]);
        assert!(close(plan.scenes[0].start_seconds, 0.0));
    }

    #[test]
    fn test_no_images() {
        let plan = ScenePlan::compute(Some(12.0), &[]);
        assert!(plan.scenes.is_empty());
        assert!(close(plan.duration_seconds, 12.0));
    }
}
