//! Release creation and lookup.

use log::{debug, info};

use crate::error::Result;
use crate::github::api::GitHubApi;
use crate::github::types::{NewRelease, Release};

/// Publish a release for an existing tag.
pub async fn create_release(
    api: &dyn GitHubApi,
    tag: &str,
    name: &str,
    body: &str,
) -> Result<Release> {
    info!("Creating release {tag}");
    let release = api
        .create_release(&NewRelease {
            tag_name: tag.to_string(),
            name: name.to_string(),
            body: body.to_string(),
        })
        .await?;
    info!("Release created: {}", release.html_url);
    Ok(release)
}

/// The release published for `tag`, or `None` when it does not exist.
/// Other API failures still propagate.
pub async fn find_release_by_tag(api: &dyn GitHubApi, tag: &str) -> Result<Option<Release>> {
    match api.get_release_by_tag(tag).await {
        Ok(release) => Ok(Some(release)),
        Err(err) if err.api_status() == Some(404) => {
            debug!("No release found for tag {tag}");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
