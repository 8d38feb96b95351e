//! Running average of the ratings a volunteer received on completed requests.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::domain::{LifecycleError, RequestId, UserId};
use super::repository::{DirectoryError, UserDirectory};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// A validated rating in `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct RatingScore(u8);

impl RatingScore {
    pub fn new(value: u8) -> Result<Self, LifecycleError> {
        if (MIN_RATING..=MAX_RATING).contains(&value) {
            Ok(Self(value))
        } else {
            Err(LifecycleError::InvalidInput(format!(
                "rating must be between {MIN_RATING} and {MAX_RATING}, got {value}"
            )))
        }
    }

    pub const fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for RatingScore {
    type Error = LifecycleError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RatingScore> for u8 {
    fn from(score: RatingScore) -> Self {
        score.0
    }
}

/// Rating state carried on a volunteer's profile.
///
/// The exact sum is kept next to the rounded average so repeated folds never
/// accumulate rounding error: the published `rating` is always
/// `round1(sum / total_ratings)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredRatingStats")]
pub struct RatingStats {
    pub rating: f64,
    pub total_ratings: u32,
    rating_sum: f64,
}

/// Profile rating as stored. Older profiles carry only the published average.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRatingStats {
    #[serde(default)]
    rating: f64,
    #[serde(default)]
    total_ratings: u32,
    #[serde(default)]
    rating_sum: Option<f64>,
}

impl From<StoredRatingStats> for RatingStats {
    fn from(stored: StoredRatingStats) -> Self {
        match stored.rating_sum {
            Some(rating_sum) => Self {
                rating: stored.rating,
                total_ratings: stored.total_ratings,
                rating_sum,
            },
            None => Self::from_average(stored.rating, stored.total_ratings),
        }
    }
}

impl RatingStats {
    /// Rebuild stats from a published average, e.g. a profile imported with
    /// `(rating, totalRatings)` only.
    pub fn from_average(rating: f64, total_ratings: u32) -> Self {
        Self {
            rating: round1(rating),
            total_ratings,
            rating_sum: rating * f64::from(total_ratings),
        }
    }

    /// Fold one more rating into the average.
    #[must_use]
    pub fn fold(self, score: RatingScore) -> Self {
        let rating_sum = self.rating_sum + f64::from(score.value());
        let total_ratings = self.total_ratings.saturating_add(1);
        Self {
            rating: round1(rating_sum / f64::from(total_ratings)),
            total_ratings,
            rating_sum,
        }
    }
}

/// Round half away from zero to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// One rating owed to one volunteer for one completed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingGrant {
    pub request: RequestId,
    pub volunteer: UserId,
    pub score: RatingScore,
}

/// Result of handing a grant to the directory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RatingOutcome {
    Applied(RatingStats),
    /// The directory had already folded this `(request, volunteer)` pair.
    AlreadyRecorded(RatingStats),
}

/// Forwards completion ratings to the user directory, once per grant.
pub struct RatingAggregator<D> {
    directory: Arc<D>,
}

impl<D> Clone for RatingAggregator<D> {
    fn clone(&self) -> Self {
        Self {
            directory: Arc::clone(&self.directory),
        }
    }
}

impl<D> RatingAggregator<D>
where
    D: UserDirectory + 'static,
{
    pub fn new(directory: Arc<D>) -> Self {
        Self { directory }
    }

    pub fn record(&self, grant: &RatingGrant) -> Result<RatingOutcome, DirectoryError> {
        let outcome = self.directory.record_rating(grant)?;
        match outcome {
            RatingOutcome::Applied(stats) => info!(
                request = %grant.request,
                volunteer = %grant.volunteer,
                score = grant.score.value(),
                rating = stats.rating,
                total_ratings = stats.total_ratings,
                "volunteer rating updated"
            ),
            RatingOutcome::AlreadyRecorded(_) => debug!(
                request = %grant.request,
                volunteer = %grant.volunteer,
                "rating already recorded for this completion"
            ),
        }
        Ok(outcome)
    }
}
