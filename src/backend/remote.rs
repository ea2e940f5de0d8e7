//! GitHub releases backend.
//!
//! Each device gets a repository named after it, owned by the configured
//! organization or by the token's user. Each build is a release tagged with
//! the build name, and each file is an asset of that release referenced by
//! its download URL.

use std::collections::HashSet;
use std::fs;
use std::time::Duration;

use reqwest::blocking::{Body, Client, RequestBuilder, Response};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{Backend, BackendError};
use crate::artifact::{Build, File};
use crate::config::Config;

const USER_AGENT: &str = concat!("lineage-publisher/", env!("CARGO_PKG_VERSION"));

/// A release as returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub id: u64,
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl Release {
    pub fn asset(&self, filename: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.name == filename)
    }

    /// Whether every file of `build` is attached.
    pub fn has_assets_for(&self, build: &Build) -> bool {
        !build.files.is_empty() && build.files.iter().all(|f| self.asset(&f.filename).is_some())
    }
}

/// A release asset as returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub id: u64,
    pub name: String,
    pub browser_download_url: String,
}

#[derive(Debug, Deserialize)]
struct User {
    login: String,
}

/// Publishes builds as GitHub releases.
#[derive(Debug)]
pub struct RemoteBackend {
    client: Client,
    api_url: String,
    uploads_url: String,
    token: String,
    organization: Option<String>,
    owner: Option<String>,
    known_repositories: HashSet<String>,
}

impl RemoteBackend {
    pub fn from_config(config: &Config) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .user_agent(USER_AGENT)
            .build()?;

        let organization = Some(config.github_organization.clone()).filter(|o| !o.is_empty());
        Ok(Self {
            client,
            api_url: config.github_api_url.trim_end_matches('/').to_string(),
            uploads_url: config.github_uploads_url.trim_end_matches('/').to_string(),
            token: config.github_token.clone(),
            owner: organization.clone(),
            organization,
            known_repositories: HashSet::new(),
        })
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
    }

    /// Login owning the device repositories.
    fn owner(&mut self) -> Result<String, BackendError> {
        if let Some(owner) = &self.owner {
            return Ok(owner.clone());
        }
        let url = format!("{}/user", self.api_url);
        let response = self.request(Method::GET, &url).send()?;
        let user: User = check(response, Method::GET, &url)?.json()?;
        debug!(login = %user.login, "resolved repository owner");
        self.owner = Some(user.login.clone());
        Ok(user.login)
    }

    /// Whether the repository for `device` exists.
    pub fn find_repository(&mut self, device: &str) -> Result<bool, BackendError> {
        if self.known_repositories.contains(device) {
            return Ok(true);
        }
        let owner = self.owner()?;
        let url = repository_url(&self.api_url, &owner, device);
        let response = self.request(Method::GET, &url).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(response, Method::GET, &url)?;
        self.known_repositories.insert(device.to_string());
        Ok(true)
    }

    fn ensure_repository(&mut self, device: &str) -> Result<String, BackendError> {
        let owner = self.owner()?;
        if self.find_repository(device)? {
            return Ok(owner);
        }

        let url = match &self.organization {
            Some(org) => format!("{}/orgs/{}/repos", self.api_url, org),
            None => format!("{}/user/repos", self.api_url),
        };
        // Releases need a commit to tag, hence auto_init.
        let response = self
            .request(Method::POST, &url)
            .json(&json!({ "name": device, "auto_init": true }))
            .send()?;
        // 422: created concurrently since the lookup
        if response.status() != StatusCode::UNPROCESSABLE_ENTITY {
            check(response, Method::POST, &url)?;
            info!(repository = %format!("{owner}/{device}"), "created repository");
        }
        self.known_repositories.insert(device.to_string());
        Ok(owner)
    }

    /// The release tagged `tag` in the repository for `device`, if any.
    pub fn find_release(&mut self, device: &str, tag: &str) -> Result<Option<Release>, BackendError> {
        if !self.find_repository(device)? {
            return Ok(None);
        }
        let owner = self.owner()?;
        let url = format!("{}/releases/tags/{}", repository_url(&self.api_url, &owner, device), tag);
        let response = self.request(Method::GET, &url).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let release: Release = check(response, Method::GET, &url)?.json()?;
        Ok(Some(release))
    }

    fn create_release(&mut self, device: &str, tag: &str) -> Result<Release, BackendError> {
        let owner = self.ensure_repository(device)?;
        let url = format!("{}/releases", repository_url(&self.api_url, &owner, device));
        let response = self
            .request(Method::POST, &url)
            .json(&json!({ "tag_name": tag, "name": tag, "body": tag }))
            .send()?;
        let release: Release = check(response, Method::POST, &url)?.json()?;
        debug!(device, tag, id = release.id, "created release");
        Ok(release)
    }

    fn delete_release(&mut self, device: &str, release: &Release) -> Result<(), BackendError> {
        let owner = self.owner()?;
        let repo = repository_url(&self.api_url, &owner, device);

        let url = format!("{}/releases/{}", repo, release.id);
        self.delete(&url)?;

        let url = format!("{}/git/refs/tags/{}", repo, release.tag_name);
        self.delete(&url)?;

        debug!(device, tag = %release.tag_name, "deleted release");
        Ok(())
    }

    fn upload_asset(&mut self, device: &str, release: &Release, file: &mut File) -> Result<(), BackendError> {
        let path = file
            .path
            .clone()
            .ok_or_else(|| BackendError::MissingLocalPath(file.filename.clone()))?;
        let handle = fs::File::open(&path).map_err(|source| BackendError::Io {
            path: path.clone(),
            source,
        })?;
        let size = handle
            .metadata()
            .map_err(|source| BackendError::Io { path, source })?
            .len();

        let owner = self.owner()?;
        let url = format!(
            "{}/repos/{}/{}/releases/{}/assets",
            self.uploads_url, owner, device, release.id
        );
        let response = self
            .request(Method::POST, &url)
            .query(&[("name", file.filename.as_str())])
            .header("Content-Type", "application/octet-stream")
            .body(Body::sized(handle, size))
            .send()?;
        let asset: Asset = check(response, Method::POST, &url)?.json()?;
        debug!(file = %file.filename, url = %asset.browser_download_url, "uploaded asset");
        file.reference = Some(asset.browser_download_url);
        Ok(())
    }

    fn delete_asset(&mut self, device: &str, asset: &Asset) -> Result<(), BackendError> {
        let owner = self.owner()?;
        let url = format!(
            "{}/releases/assets/{}",
            repository_url(&self.api_url, &owner, device),
            asset.id
        );
        self.delete(&url)
    }

    /// DELETE, treating an already missing resource as success.
    fn delete(&self, url: &str) -> Result<(), BackendError> {
        let response = self.request(Method::DELETE, url).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(response, Method::DELETE, url)?;
        Ok(())
    }
}

impl Backend for RemoteBackend {
    fn is_uploaded(&mut self, build: &Build) -> Result<bool, BackendError> {
        Ok(self
            .find_release(&build.device, &build.name)?
            .map(|release| release.has_assets_for(build))
            .unwrap_or(false))
    }

    fn upload(&mut self, build: &mut Build) -> Result<(), BackendError> {
        self.ensure_repository(&build.device)?;
        if let Some(stale) = self.find_release(&build.device, &build.name)? {
            self.delete_release(&build.device, &stale)?;
        }

        let release = self.create_release(&build.device, &build.name)?;
        let device = build.device.clone();
        for file in &mut build.files {
            self.upload_asset(&device, &release, file)?;
        }
        info!(build = %build.name, files = build.files.len(), "published release");
        Ok(())
    }

    fn unupload(&mut self, build: &Build) -> Result<(), BackendError> {
        match self.find_release(&build.device, &build.name)? {
            Some(release) => self.delete_release(&build.device, &release),
            None => {
                debug!(build = %build.name, "no release to delete");
                Ok(())
            }
        }
    }

    fn upload_file(&mut self, build: &Build, file: &mut File) -> Result<(), BackendError> {
        let release = match self.find_release(&build.device, &build.name)? {
            Some(release) => release,
            None => self.create_release(&build.device, &build.name)?,
        };
        if let Some(existing) = release.asset(&file.filename) {
            self.delete_asset(&build.device, existing)?;
        }
        self.upload_asset(&build.device, &release, file)
    }

    fn remove_file(&mut self, build: &Build, file: &File) -> Result<(), BackendError> {
        let Some(release) = self.find_release(&build.device, &build.name)? else {
            return Ok(());
        };
        match release.asset(&file.filename) {
            Some(asset) => self.delete_asset(&build.device, asset),
            None => Ok(()),
        }
    }
}

fn repository_url(api_url: &str, owner: &str, device: &str) -> String {
    format!("{api_url}/repos/{owner}/{device}")
}

fn check(response: Response, method: Method, url: &str) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(BackendError::Status {
        method: method.to_string(),
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}
