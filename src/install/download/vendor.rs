//! Vendor download-links API interaction

use log::{debug, info, warn};
use serde::Deserialize;

use super::platform::Platform;
use super::retry::Failure;
use crate::config::{ApiConfig, DownloadConfig};
use crate::error::{Result, UpdateError};
use crate::install::version::{Channel, Version};

/// Download catalogue returned by the vendor API
#[derive(Deserialize, Debug)]
struct LinksResponse {
    result: LinksResult,
}

#[derive(Deserialize, Debug)]
struct LinksResult {
    links: Vec<DownloadLink>,
}

/// One platform/channel variant in the catalogue
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLink {
    pub download_type: String,
    pub download_url: String,
    #[serde(default, alias = "checksum")]
    pub sha256: Option<String>,
}

/// The build selected for this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub version: Version,
    pub channel: Channel,
    pub platform: Platform,
    pub download_type: String,
    pub download_url: String,
    /// Lowercase hex SHA-256 of the archive, when the vendor publishes one
    pub checksum: Option<String>,
}

impl ReleaseInfo {
    /// File name of the archive, taken from the download URL.
    pub fn archive_name(&self) -> String {
        archive_file_name(&self.download_url).unwrap_or_else(|| "bedrock-server.zip".to_string())
    }
}

/// Queries the vendor API and picks the download for a platform/channel.
pub struct ReleaseResolver {
    client: reqwest::Client,
    urls: Vec<String>,
    retry: DownloadConfig,
}

impl ReleaseResolver {
    pub fn new(api: &ApiConfig, download: &DownloadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("bedrock-updater/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(api.timeout())
            .timeout(api.timeout())
            .build()
            .map_err(|e| UpdateError::UpstreamUnavailable(format!("HTTP client setup: {e}")))?;

        Ok(Self {
            client,
            urls: api.urls.clone(),
            retry: download.clone(),
        })
    }

    /// Resolve the latest build for `(platform, channel)`.
    pub async fn resolve(&self, channel: Channel, platform: Platform) -> Result<ReleaseInfo> {
        let links = self.fetch_catalogue().await?;
        select_release(&links, channel, platform)
    }

    /// Fetch the catalogue, falling back across endpoints and retrying rounds
    /// while failures look transient.
    async fn fetch_catalogue(&self) -> Result<Vec<DownloadLink>> {
        let mut last_error = String::from("no endpoint configured");

        for round in 0..=self.retry.max_retries {
            if round > 0 {
                let delay = self.retry.backoff(round - 1);
                info!("Retrying vendor API in {} ms", delay.as_millis());
                tokio::time::sleep(delay).await;
            }

            let mut transient = false;
            for url in &self.urls {
                debug!("Querying vendor API {url} (round {})", round + 1);
                match self.fetch_from(url).await {
                    Ok(links) => {
                        info!("Vendor API answered from {url}");
                        return Ok(links);
                    }
                    Err(failure) => {
                        warn!("Vendor API {url} failed: {}", failure.message());
                        transient |= failure.is_transient();
                        last_error = format!("{url}: {}", failure.message());
                    }
                }
            }

            if !transient {
                break;
            }
        }

        Err(UpdateError::UpstreamUnavailable(last_error))
    }

    async fn fetch_from(&self, url: &str) -> std::result::Result<Vec<DownloadLink>, Failure> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Failure::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Failure::from_status(status));
        }

        let body = response.bytes().await.map_err(|e| Failure::from_reqwest(&e))?;
        let parsed: LinksResponse = serde_json::from_slice(&body)
            .map_err(|e| Failure::Permanent(format!("malformed payload: {e}")))?;
        Ok(parsed.result.links)
    }
}

/// Pick the single catalogue entry for `(platform, channel)`.
pub fn select_release(
    links: &[DownloadLink],
    channel: Channel,
    platform: Platform,
) -> Result<ReleaseInfo> {
    let download_type = platform.download_type(channel);
    let mut matching = links.iter().filter(|l| l.download_type == download_type);

    let link = matching
        .next()
        .ok_or_else(|| UpdateError::NoMatchingVariant {
            download_type: download_type.to_string(),
        })?;
    if matching.any(|other| other.download_url != link.download_url) {
        warn!("Vendor catalogue lists several {download_type} downloads, using the first");
    }

    let version = version_from_url(&link.download_url).ok_or_else(|| {
        UpdateError::UpstreamUnavailable(format!(
            "malformed payload: no version in download URL {}",
            link.download_url
        ))
    })?;

    let checksum = link.sha256.as_deref().and_then(|raw| {
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.len() == 64 && normalized.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(normalized)
        } else {
            warn!("Ignoring malformed checksum `{raw}` for {download_type}");
            None
        }
    });

    Ok(ReleaseInfo {
        version,
        channel,
        platform,
        download_type: download_type.to_string(),
        download_url: link.download_url.clone(),
        checksum,
    })
}

fn archive_file_name(download_url: &str) -> Option<String> {
    let parsed = url::Url::parse(download_url).ok()?;
    parsed
        .path_segments()?
        .next_back()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// `.../bedrock-server-1.21.120.4.zip` → `1.21.120.4`
pub fn version_from_url(download_url: &str) -> Option<Version> {
    let name = archive_file_name(download_url)?;
    let stem = [".tar.gz", ".tgz", ".zip"]
        .iter()
        .find_map(|ext| name.strip_suffix(ext))
        .unwrap_or(&name);
    let raw = stem.strip_prefix("bedrock-server-").unwrap_or(stem);
    raw.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(download_type: &str, url: &str) -> DownloadLink {
        DownloadLink {
            download_type: download_type.into(),
            download_url: url.into(),
            sha256: None,
        }
    }

    fn catalogue() -> Vec<DownloadLink> {
        vec![
            link(
                "serverBedrockWindows",
                "https://cdn.example.net/bin-win/bedrock-server-1.21.120.4.zip",
            ),
            link(
                "serverBedrockLinux",
                "https://cdn.example.net/bin-linux/bedrock-server-1.21.120.4.zip",
            ),
            link(
                "serverBedrockPreviewLinux",
                "https://cdn.example.net/bin-linux-preview/bedrock-server-1.21.130.22.zip",
            ),
            link("serverJar", "https://cdn.example.net/server.jar"),
        ]
    }

    #[test]
    fn picks_platform_and_channel() {
        let release = select_release(&catalogue(), Channel::Preview, Platform::Linux).expect("found");
        assert_eq!(release.version.to_string(), "1.21.130.22");
        assert_eq!(release.download_type, "serverBedrockPreviewLinux");
        assert_eq!(release.archive_name(), "bedrock-server-1.21.130.22.zip");

        let release = select_release(&catalogue(), Channel::Release, Platform::Windows).expect("found");
        assert!(release.download_url.contains("bin-win"));
    }

    #[test]
    fn missing_variant_is_reported() {
        let err = select_release(&catalogue(), Channel::Preview, Platform::Windows).unwrap_err();
        match err {
            UpdateError::NoMatchingVariant { download_type } => {
                assert_eq!(download_type, "serverBedrockPreviewWindows")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn url_without_version_is_malformed() {
        let links = vec![link("serverBedrockLinux", "https://cdn.example.net/latest.zip")];
        let err = select_release(&links, Channel::Release, Platform::Linux).unwrap_err();
        assert!(matches!(err, UpdateError::UpstreamUnavailable(_)));
    }

    #[test]
    fn checksum_is_normalized_or_dropped() {
        let mut links = catalogue();
        links[1].sha256 = Some("AB".repeat(32));
        let release = select_release(&links, Channel::Release, Platform::Linux).expect("found");
        assert_eq!(release.checksum, Some("ab".repeat(32)));

        links[1].sha256 = Some("not-a-digest".into());
        let release = select_release(&links, Channel::Release, Platform::Linux).expect("found");
        assert_eq!(release.checksum, None);
    }

    #[test]
    fn version_from_various_urls() {
        let v = |u: &str| version_from_url(u).map(|v| v.to_string());
        assert_eq!(
            v("https://x.net/bin-linux/bedrock-server-1.21.120.4.zip?sig=abc"),
            Some("1.21.120.4".into())
        );
        assert_eq!(v("https://x.net/bedrock-server-1.2.3.tar.gz"), Some("1.2.3".into()));
        assert_eq!(v("https://x.net/bin-linux/"), None);
        assert_eq!(v("not a url"), None);
    }

    #[test]
    fn payload_shape_deserializes() {
        let body = r#"{"result":{"links":[
            {"downloadType":"serverBedrockLinux","downloadUrl":"https://x.net/bedrock-server-1.0.0.1.zip"},
            {"downloadType":"serverBedrockWindows","downloadUrl":"https://x.net/w.zip","checksum":"00"}
        ]}}"#;
        let parsed: LinksResponse = serde_json::from_str(body).expect("parse");
        assert_eq!(parsed.result.links.len(), 2);
        assert_eq!(parsed.result.links[1].sha256.as_deref(), Some("00"));
    }
}
