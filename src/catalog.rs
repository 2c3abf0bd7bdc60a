//! Version catalog
//!
//! The catalog is built from a curated list of recent releases (the ground truth
//! for versions whose patch releases share one download directory) merged with
//! whatever the release index at <https://download.blender.org/release/> lists.
//! The remote listing is best-effort: if it cannot be fetched, the curated list
//! alone is returned.
//!
//! # Examples
//!
//! ```no_run
//! use blenders::CatalogClient;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = CatalogClient::official()?;
//! for descriptor in catalog.list_versions() {
//!     println!("{} -> {}", descriptor.version, descriptor.source_url);
//! }
//! # Ok(())
//! # }
//! ```

use crate::version::BlenderVersion;
use crate::{Error, Result};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// Release index of the official download host
pub const RELEASE_INDEX_URL: &str = "https://download.blender.org/release/";

/// Environment variable overriding the release index (mirrors, tests)
pub const RELEASE_INDEX_ENV: &str = "BLENDERS_RELEASE_INDEX";

/// Curated releases: (version, directory under the release index, release year)
pub const CURATED_RELEASES: &[(&str, &str, &str)] = &[
    ("4.3.0", "Blender4.3/", "2024"),
    ("4.2.4", "Blender4.2/", "2024"),
    ("4.2.3", "Blender4.2/", "2024"),
    ("4.2.2", "Blender4.2/", "2024"),
    ("4.2.1", "Blender4.2/", "2024"),
    ("4.2.0", "Blender4.2/", "2023"),
    ("3.6.5", "Blender3.6/", "2023"),
    ("3.5.1", "Blender3.5/", "2023"),
    ("3.4.1", "Blender3.4/", "2022"),
    ("3.3.1", "Blender3.3/", "2022"),
    ("3.2.2", "Blender3.2/", "2022"),
    ("3.0.1", "Blender3.0/", "2022"),
];

/// One known Blender version and where its installers live
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionDescriptor {
    pub version: String,

    /// Directory URL containing this version's artifacts
    pub source_url: String,

    /// Display only
    pub release_year: Option<String>,
}

impl VersionDescriptor {
    pub fn new(version: &str, source_url: &str) -> Self {
        Self {
            version: version.to_string(),
            source_url: source_url.to_string(),
            release_year: None,
        }
    }

    /// Full download URL of `artifact_name` in this version's directory
    pub fn artifact_url(&self, artifact_name: &str) -> Result<Url> {
        let mut base = Url::parse(&self.source_url)?;
        // Url::join replaces the last segment unless the base ends with '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base.join(artifact_name)?)
    }
}

/// The curated releases, with directories resolved against `index_url`
pub fn curated_versions(index_url: &Url) -> Vec<VersionDescriptor> {
    CURATED_RELEASES
        .iter()
        .filter_map(|(version, directory, year)| {
            let source_url = index_url.join(directory).ok()?;
            Some(VersionDescriptor {
                version: version.to_string(),
                source_url: source_url.to_string(),
                release_year: Some(year.to_string()),
            })
        })
        .collect()
}

/// Extract version directories from a release index page
///
/// Matches links like `href="Blender2.83.0/"` or `href="Blender2.79.1.2/"` and
/// keeps the first three numbers. Anything else is ignored.
pub fn parse_listing(index_url: &Url, html: &str) -> Vec<VersionDescriptor> {
    let Ok(link_re) = Regex::new(r#"href="(Blender\d+\.\d+\.\d+(/|\.\d+/?))""#) else {
        return Vec::new();
    };
    let Ok(version_re) = Regex::new(r"Blender(\d+\.\d+\.\d+)") else {
        return Vec::new();
    };

    let mut found = Vec::new();
    for captures in link_re.captures_iter(html) {
        let Some(directory) = captures.get(1).map(|m| m.as_str()) else {
            continue;
        };
        let Some(version) = version_re
            .captures(directory)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
        else {
            continue;
        };
        // Numbers too large for u64 are malformed
        if BlenderVersion::parse(version).is_err() {
            continue;
        }
        let Ok(source_url) = index_url.join(directory) else {
            continue;
        };

        found.push(VersionDescriptor::new(version, source_url.as_str()));
    }
    found
}

/// Merge scraped versions into the curated list and sort newest first
///
/// Curated entries win over scraped ones with the same version string, and
/// repeated scraped entries are dropped, so every version appears once.
pub fn merge_versions(
    curated: Vec<VersionDescriptor>,
    scraped: Vec<VersionDescriptor>,
) -> Vec<VersionDescriptor> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::with_capacity(curated.len() + scraped.len());

    for descriptor in curated.into_iter().chain(scraped) {
        if seen.insert(descriptor.version.clone()) {
            merged.push(descriptor);
        }
    }

    sort_newest_first(merged)
}

/// Sort by integer components, descending; unparseable versions are dropped
pub fn sort_newest_first(descriptors: Vec<VersionDescriptor>) -> Vec<VersionDescriptor> {
    let mut keyed: Vec<(BlenderVersion, VersionDescriptor)> = descriptors
        .into_iter()
        .filter_map(|d| BlenderVersion::parse(&d.version).ok().map(|v| (v, d)))
        .collect();

    keyed.sort_by(|(a, _), (b, _)| b.cmp(a));
    keyed.into_iter().map(|(_, d)| d).collect()
}

/// Client for the release index
pub struct CatalogClient {
    index_url: Url,
    client: reqwest::blocking::Client,
}

impl CatalogClient {
    pub fn new(index_url: &str) -> Result<Self> {
        let index_url = Url::parse(index_url)?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self { index_url, client })
    }

    /// Client for the official download host
    pub fn official() -> Result<Self> {
        Self::new(RELEASE_INDEX_URL)
    }

    /// Client for BLENDERS_RELEASE_INDEX if set, otherwise the official host
    pub fn from_env() -> Result<Self> {
        match std::env::var(RELEASE_INDEX_ENV) {
            Ok(url) if !url.is_empty() => Self::new(&url),
            _ => Self::official(),
        }
    }

    pub fn index_url(&self) -> &Url {
        &self.index_url
    }

    /// The curated releases only, without touching the network
    pub fn curated(&self) -> Vec<VersionDescriptor> {
        sort_newest_first(curated_versions(&self.index_url))
    }

    /// All known versions, newest first
    ///
    /// Never fails: a release index that cannot be fetched only means fewer
    /// versions.
    pub fn list_versions(&self) -> Vec<VersionDescriptor> {
        let curated = curated_versions(&self.index_url);

        let scraped = match self.fetch_index() {
            Ok(html) => parse_listing(&self.index_url, &html),
            Err(e) => {
                tracing::warn!(url = %self.index_url, "release index unavailable: {}", e);
                Vec::new()
            }
        };

        tracing::debug!(
            curated = curated.len(),
            scraped = scraped.len(),
            "merging version catalog"
        );
        merge_versions(curated, scraped)
    }

    /// Release directory a version is published under (`Blender{major}.{minor}/`)
    pub fn default_source_url(&self, version: &str) -> Result<Url> {
        let parsed = BlenderVersion::parse(version)?;
        let components = parsed.components();
        let directory = format!("Blender{}.{}/", components[0], components[1]);
        Ok(self.index_url.join(&directory)?)
    }

    /// Descriptor for `version`, from the catalog if listed there
    ///
    /// Versions the catalog does not know (e.g. "4.2" rather than "4.2.0") are
    /// looked up in their default release directory.
    pub fn descriptor_for(&self, version: &str, offline: bool) -> Result<VersionDescriptor> {
        let known = if offline {
            self.curated()
        } else {
            self.list_versions()
        };

        if let Some(descriptor) = known.into_iter().find(|d| d.version == version) {
            return Ok(descriptor);
        }

        let source_url = self.default_source_url(version)?;
        Ok(VersionDescriptor::new(version, source_url.as_str()))
    }

    fn fetch_index(&self) -> Result<String> {
        let response = self.client.get(self.index_url.clone()).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Other(format!(
                "Release index returned HTTP {}",
                status.as_u16()
            )));
        }

        Ok(response.text()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> Url {
        Url::parse(RELEASE_INDEX_URL).unwrap()
    }

    fn versions(descriptors: &[VersionDescriptor]) -> Vec<&str> {
        descriptors.iter().map(|d| d.version.as_str()).collect()
    }

    #[test]
    fn test_curated_urls_resolve_against_index() {
        let curated = curated_versions(&index());
        let v43 = curated.iter().find(|d| d.version == "4.3.0").unwrap();
        assert_eq!(
            v43.source_url,
            "https://download.blender.org/release/Blender4.3/"
        );
        assert_eq!(v43.release_year.as_deref(), Some("2024"));

        // Patch releases share one directory
        let shared: Vec<_> = curated
            .iter()
            .filter(|d| d.source_url.ends_with("Blender4.2/"))
            .collect();
        assert_eq!(shared.len(), 5);
    }

    #[test]
    fn test_parse_listing() {
        let html = r#"
            <a href="Blender2.83.0/">Blender2.83.0/</a>
            <a href="Blender2.79.1.2/">Blender2.79.1.2/</a>
            <a href="Blender4.2/">Blender4.2/</a>
            <a href="Blender2.80rc1/">Blender2.80rc1/</a>
            <a href="BlenderBenchmark2.0/">BlenderBenchmark2.0/</a>
            <a href="Blender99999999999999999999.0.0/">overflow</a>
        "#;

        let parsed = parse_listing(&index(), html);
        assert_eq!(versions(&parsed), vec!["2.83.0", "2.79.1"]);
        assert_eq!(
            parsed[0].source_url,
            "https://download.blender.org/release/Blender2.83.0/"
        );
        assert!(parsed.iter().all(|d| d.release_year.is_none()));
    }

    #[test]
    fn test_sort_is_numeric_not_lexicographic() {
        let sorted = sort_newest_first(vec![
            VersionDescriptor::new("3.9.0", "https://example.com/a/"),
            VersionDescriptor::new("3.10.0", "https://example.com/b/"),
            VersionDescriptor::new("10.0.0", "https://example.com/c/"),
        ]);
        assert_eq!(versions(&sorted), vec!["10.0.0", "3.10.0", "3.9.0"]);
    }

    #[test]
    fn test_curated_wins_over_scraped() {
        let curated = curated_versions(&index());
        let scraped = vec![
            VersionDescriptor::new("4.2.1", "https://mirror.example.com/Blender4.2.1/"),
            VersionDescriptor::new("2.93.0", "https://mirror.example.com/Blender2.93.0/"),
            VersionDescriptor::new("2.93.0", "https://mirror.example.com/Blender2.93.0.1/"),
        ];

        let merged = merge_versions(curated.clone(), scraped);
        assert_eq!(merged.len(), curated.len() + 1);

        let v421 = merged.iter().find(|d| d.version == "4.2.1").unwrap();
        assert!(v421.source_url.starts_with(RELEASE_INDEX_URL));
        assert_eq!(v421.release_year.as_deref(), Some("2024"));

        let unique: HashSet<_> = merged.iter().map(|d| d.version.clone()).collect();
        assert_eq!(unique.len(), merged.len(), "no duplicate version keys");
        assert_eq!(merged.first().unwrap().version, "4.3.0");
        assert_eq!(merged.last().unwrap().version, "2.93.0");
    }

    #[test]
    fn test_artifact_url() {
        let descriptor =
            VersionDescriptor::new("4.2", "https://download.blender.org/release/Blender4.2/");
        let url = descriptor
            .artifact_url("blender-4.2.0-linux-x64.tar.xz")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://download.blender.org/release/Blender4.2/blender-4.2.0-linux-x64.tar.xz"
        );

        let no_slash =
            VersionDescriptor::new("4.2", "https://download.blender.org/release/Blender4.2");
        assert_eq!(
            no_slash
                .artifact_url("blender-4.2.0-macos-x64.dmg")
                .unwrap()
                .as_str(),
            "https://download.blender.org/release/Blender4.2/blender-4.2.0-macos-x64.dmg"
        );
    }

    #[test]
    fn test_descriptor_for_unlisted_version() {
        let client = CatalogClient::official().unwrap();

        let listed = client.descriptor_for("3.6.5", true).unwrap();
        assert_eq!(listed.release_year.as_deref(), Some("2023"));

        let unlisted = client.descriptor_for("4.2", true).unwrap();
        assert_eq!(
            unlisted.source_url,
            "https://download.blender.org/release/Blender4.2/"
        );
        assert!(unlisted.release_year.is_none());

        assert!(client.descriptor_for("latest", true).is_err());
    }

    #[test]
    fn test_unreachable_index_falls_back_to_curated() {
        // Nothing listens on port 9 locally
        let client = CatalogClient::new("http://127.0.0.1:9/release/").unwrap();
        let listed = client.list_versions();
        assert_eq!(listed, client.curated());
        assert!(!listed.is_empty());
    }
}
