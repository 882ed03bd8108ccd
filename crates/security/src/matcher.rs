//! Face matching: nearest registered identity under an L2 threshold.
//!
//! Both the probe and every reference are compared as unit vectors. The best
//! reference is accepted only when its distance is at most the threshold, and
//! only when no other identity lies within `tie_epsilon` of that distance.
//! Picking the first of two near-equal candidates would authenticate whoever
//! happens to sort first, so near-ties are rejected as ambiguous instead.

use mimir_config::FaceConfig;
use mimir_core::error::AuthError;
use mimir_core::identity::UserIdentity;
use mimir_store::vector::{l2_distance, normalize};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPolicy {
    /// Maximum accepted distance (inclusive)
    pub threshold: f32,
    pub tie_epsilon: f32,
}

impl From<&FaceConfig> for MatchPolicy {
    fn from(config: &FaceConfig) -> Self {
        Self {
            threshold: config.threshold,
            tie_epsilon: config.tie_epsilon,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub user_id: String,
    pub display_name: String,
    pub role: String,
    pub distance: f32,
}

#[derive(Debug, Clone)]
pub struct FaceMatcher {
    policy: MatchPolicy,
}

impl FaceMatcher {
    pub fn new(policy: MatchPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Distance between a probe and a reference, both normalised first.
    pub fn distance(&self, probe: &[f32], reference: &[f32]) -> Option<f32> {
        l2_distance(&normalize(probe), &normalize(reference))
    }

    /// Match a probe embedding against a snapshot of registered identities.
    ///
    /// Pure: reads the snapshot, touches nothing else.
    pub fn find_match(&self, probe: &[f32], references: &[UserIdentity]) -> Result<MatchResult, AuthError> {
        if probe.is_empty() {
            return Err(AuthError::NoFaceDetected);
        }
        let probe = normalize(probe);

        let mut best: Option<(&UserIdentity, f32)> = None;
        let mut runner_up: Option<f32> = None;

        for identity in references {
            let Some(distance) = l2_distance(&probe, &normalize(&identity.reference_embedding)) else {
                warn!(
                    user_id = %identity.user_id,
                    expected = probe.len(),
                    actual = identity.reference_embedding.len(),
                    "Skipping reference with mismatched embedding dimension"
                );
                continue;
            };

            match best {
                Some((_, best_distance)) if distance >= best_distance => {
                    if runner_up.is_none_or(|r| distance < r) {
                        runner_up = Some(distance);
                    }
                }
                _ => {
                    if let Some((_, previous)) = best {
                        runner_up = Some(previous);
                    }
                    best = Some((identity, distance));
                }
            }
        }

        let Some((identity, distance)) = best else {
            debug!("No comparable references registered");
            return Err(AuthError::NoMatch);
        };

        if distance > self.policy.threshold {
            debug!(distance, threshold = self.policy.threshold, "Nearest face above threshold");
            return Err(AuthError::NoMatch);
        }

        if let Some(second) = runner_up {
            if second - distance <= self.policy.tie_epsilon {
                warn!(distance, runner_up = second, "Ambiguous face match rejected");
                return Err(AuthError::AmbiguousMatch);
            }
        }

        Ok(MatchResult {
            user_id: identity.user_id.clone(),
            display_name: identity.display_name.clone(),
            role: identity.role.clone(),
            distance,
        })
    }
}
