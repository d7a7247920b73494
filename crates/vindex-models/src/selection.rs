//! Selection policies.
//!
//! A policy is a per `(asset, kind)` rule telling the read path which
//! subset of envelopes to present. Policies are mutable, consulted only at
//! read time, and compile into a [`SelectionFilter`] the artifact store
//! turns into a single query.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactId, ModelProfile};
use crate::error::{ModelError, ModelResult};
use crate::kind::ArtifactKind;
use crate::run::RunId;
use crate::video::VideoId;

/// Selection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// No extra filter
    Default,
    /// Only envelopes from the newest run
    #[default]
    Latest,
    /// Only envelopes with the preferred model profile
    Profile,
    /// Only envelopes from a pinned run (optionally one pinned artifact)
    Pinned,
    /// All envelopes, best profile first
    BestQuality,
}

impl SelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMode::Default => "default",
            SelectionMode::Latest => "latest",
            SelectionMode::Profile => "profile",
            SelectionMode::Pinned => "pinned",
            SelectionMode::BestQuality => "best_quality",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "default" => Some(SelectionMode::Default),
            "latest" => Some(SelectionMode::Latest),
            "profile" => Some(SelectionMode::Profile),
            "pinned" => Some(SelectionMode::Pinned),
            "best_quality" => Some(SelectionMode::BestQuality),
            _ => None,
        }
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per `(asset, kind)` selection policy row.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SelectionPolicy {
    pub asset_id: VideoId,
    pub artifact_type: ArtifactKind,
    pub mode: SelectionMode,
    /// Required when mode is `profile`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_profile: Option<ModelProfile>,
    /// Required when mode is `pinned`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned_run_id: Option<RunId>,
    /// Optional refinement of a pinned run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned_artifact_id: Option<ArtifactId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SelectionPolicy {
    /// Create a policy with the given mode and no parameters.
    pub fn new(asset_id: VideoId, artifact_type: ArtifactKind, mode: SelectionMode) -> Self {
        let now = Utc::now();
        Self {
            asset_id,
            artifact_type,
            mode,
            preferred_profile: None,
            pinned_run_id: None,
            pinned_artifact_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The implicit policy when none is stored.
    pub fn default_policy(asset_id: VideoId, artifact_type: ArtifactKind) -> Self {
        Self::new(asset_id, artifact_type, SelectionMode::Latest)
    }

    /// Set the preferred profile (for `profile` mode).
    pub fn with_preferred_profile(mut self, profile: ModelProfile) -> Self {
        self.preferred_profile = Some(profile);
        self
    }

    /// Pin a run (for `pinned` mode).
    pub fn with_pinned_run(mut self, run_id: RunId) -> Self {
        self.pinned_run_id = Some(run_id);
        self
    }

    /// Pin a single artifact within the pinned run.
    pub fn with_pinned_artifact(mut self, artifact_id: ArtifactId) -> Self {
        self.pinned_artifact_id = Some(artifact_id);
        self
    }

    /// Domain validation: mode-specific required parameters.
    pub fn validate(&self) -> ModelResult<()> {
        match self.mode {
            SelectionMode::Profile if self.preferred_profile.is_none() => Err(
                ModelError::policy_invalid("profile mode requires preferred_profile"),
            ),
            SelectionMode::Pinned if self.pinned_run_id.is_none() => Err(
                ModelError::policy_invalid("pinned mode requires pinned_run_id"),
            ),
            _ => Ok(()),
        }
    }

    /// Compile into the filter the artifact store executes.
    pub fn compile(&self) -> ModelResult<SelectionFilter> {
        match self.mode {
            SelectionMode::Default => Ok(SelectionFilter::None),
            SelectionMode::Latest => Ok(SelectionFilter::LatestRun),
            SelectionMode::Profile => match self.preferred_profile {
                Some(profile) => Ok(SelectionFilter::Profile(profile)),
                None => Err(ModelError::policy_invalid(
                    "profile mode requires preferred_profile",
                )),
            },
            SelectionMode::Pinned => match &self.pinned_run_id {
                Some(run_id) => Ok(SelectionFilter::Pinned {
                    run_id: run_id.clone(),
                    artifact_id: self.pinned_artifact_id.clone(),
                }),
                None => Err(ModelError::policy_invalid(
                    "pinned mode requires pinned_run_id",
                )),
            },
            SelectionMode::BestQuality => Ok(SelectionFilter::BestQualityFirst),
        }
    }
}

/// Compiled selection filter consumed by the artifact store.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionFilter {
    /// No extra filter, default ordering
    None,
    /// Only the run with the newest `created_at` for this `(asset, kind)`
    LatestRun,
    /// Only envelopes with this profile
    Profile(ModelProfile),
    /// Only the pinned run, optionally narrowed to one artifact
    Pinned {
        run_id: RunId,
        artifact_id: Option<ArtifactId>,
    },
    /// No filter, but order `high_quality > balanced > fast` before the
    /// default span ordering
    BestQualityFirst,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_mode_requires_profile() {
        let policy = SelectionPolicy::new(
            VideoId::from("v1"),
            ArtifactKind::TranscriptSegment,
            SelectionMode::Profile,
        );
        assert!(policy.validate().is_err());

        let policy = policy.with_preferred_profile(ModelProfile::HighQuality);
        assert!(policy.validate().is_ok());
        assert_eq!(
            policy.compile().unwrap(),
            SelectionFilter::Profile(ModelProfile::HighQuality)
        );
    }

    #[test]
    fn pinned_mode_requires_run() {
        let policy = SelectionPolicy::new(
            VideoId::from("v1"),
            ArtifactKind::Scene,
            SelectionMode::Pinned,
        );
        assert!(policy.validate().is_err());

        let policy = policy.with_pinned_run(RunId::from("r1"));
        assert!(policy.validate().is_ok());
        match policy.compile().unwrap() {
            SelectionFilter::Pinned { run_id, artifact_id } => {
                assert_eq!(run_id, RunId::from("r1"));
                assert!(artifact_id.is_none());
            }
            other => panic!("unexpected filter: {other:?}"),
        }
    }

    #[test]
    fn default_policy_is_latest() {
        let policy = SelectionPolicy::default_policy(VideoId::from("v1"), ArtifactKind::Scene);
        assert_eq!(policy.mode, SelectionMode::Latest);
        assert_eq!(policy.compile().unwrap(), SelectionFilter::LatestRun);
    }

    #[test]
    fn unknown_mode_string_rejected() {
        assert_eq!(SelectionMode::parse("newest"), None);
        assert_eq!(SelectionMode::parse("best_quality"), Some(SelectionMode::BestQuality));
    }
}
