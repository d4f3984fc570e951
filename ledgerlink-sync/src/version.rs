//! Server version detection and API rung selection.

use crate::cancel::CancelToken;
use crate::client::HledgerClient;
use crate::error::{FetchError, FetchResult};
use ledgerlink_types::{ApiVersion, DetectedVersion, Profile, ServerVersion};
use tracing::{debug, warn};

/// Queries `GET version`.
///
/// A 404 is a positive "older than 1.19" answer. A body that does not parse
/// as a version yields `Ok(None)`, meaning nothing is known.
pub async fn detect_version(
    client: &HledgerClient,
    profile: &Profile,
    cancel: &CancelToken,
) -> FetchResult<Option<DetectedVersion>> {
    match client.get_text(profile, "version", cancel).await {
        Ok(body) => match ServerVersion::parse_response(&body) {
            Ok(version) => {
                debug!(profile = %profile.id, %version, "detected server version");
                Ok(Some(DetectedVersion::Known(version)))
            }
            Err(e) => {
                warn!(profile = %profile.id, "unrecognised version response: {e}");
                Ok(None)
            }
        },
        Err(FetchError::NotFound) => {
            debug!(profile = %profile.id, "no version endpoint, assuming pre-1.19");
            Ok(Some(DetectedVersion::Pre119))
        }
        Err(e) => Err(e),
    }
}

/// Rungs to try for `profile`, best first.
///
/// A fixed hint on the profile wins without touching the network.
pub async fn candidate_apis(
    client: &HledgerClient,
    profile: &Profile,
    cancel: &CancelToken,
) -> FetchResult<Vec<ApiVersion>> {
    if profile.api_version != ApiVersion::Auto {
        return Ok(vec![profile.api_version]);
    }
    let detected = detect_version(client, profile, cancel).await?;
    Ok(candidates_for(detected))
}

pub(crate) fn candidates_for(detected: Option<DetectedVersion>) -> Vec<ApiVersion> {
    match detected {
        Some(detected) => detected.candidate_apis(),
        None => ApiVersion::newest_first().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_version_tries_every_rung() {
        let all = candidates_for(None);
        assert_eq!(all.len(), ApiVersion::LADDER.len());
        assert_eq!(all.first(), Some(&ApiVersion::V1_50));
        assert_eq!(all.last(), Some(&ApiVersion::V1_14));
    }

    #[test]
    fn too_old_server_has_no_candidates() {
        let old = DetectedVersion::Known(ServerVersion::new(1, 12));
        assert!(candidates_for(Some(old)).is_empty());
    }

    #[test]
    fn known_version_picks_highest_suitable_rung() {
        let v = DetectedVersion::Known(ServerVersion::new(1, 34));
        assert_eq!(candidates_for(Some(v)), vec![ApiVersion::V1_32]);
    }
}
