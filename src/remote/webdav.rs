use super::propfind::{self, PropEntry};
use super::{
    check_put_status, encode_path, establish, ByteStream, Connector, RemoteFile, RemoteLayout,
    RemoteSession,
};
use crate::config::Endpoint;
use crate::error::{BackupError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client, Method, RequestBuilder, StatusCode, Url};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct WebdavSession {
    client: Client,
    base_url: String,
    base_path: String,
    username: String,
    password: String,
    timeout: Option<Duration>,
}

fn dav_method(name: &'static str) -> Result<Method> {
    Method::from_bytes(name.as_bytes()).map_err(|e| BackupError::Protocol(e.to_string()))
}

fn trim_dir(path: &str) -> &str {
    path.trim_end_matches('/')
}

impl WebdavSession {
    pub fn new(endpoint: &Endpoint, webdav_root: &str, timeout: Option<Duration>) -> Result<Self> {
        let base_url = format!(
            "{}://{}/{}",
            endpoint.scheme,
            endpoint.host.trim_end_matches('/'),
            webdav_root.trim_matches('/')
        );
        let base_url = base_url.trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url)
            .map_err(|e| BackupError::Connect(format!("invalid url {}: {}", base_url, e)))?;
        let base_path = percent_decode_str(parsed.path()).decode_utf8_lossy().to_string();

        let mut builder =
            Client::builder().user_agent(concat!("nc-backup-uploader/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| BackupError::Connect(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            base_path: trim_dir(&base_path).to_string(),
            username: endpoint.username.clone(),
            password: endpoint.password.clone(),
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        format!("{}{}", self.base_url, encode_path(&path))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .basic_auth(&self.username, Some(&self.password))
    }

    // Everything but PUT, whose body can outlast the probe timeout.
    fn bounded(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self.request(method, path);
        match self.timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    fn relative_path(&self, href: &str) -> String {
        let raw_path = match Url::parse(href) {
            Ok(url) => url.path().to_string(),
            Err(_) => href.to_string(),
        };
        let decoded = percent_decode_str(&raw_path).decode_utf8_lossy().to_string();
        let relative = decoded.strip_prefix(&self.base_path).unwrap_or(&decoded);
        if relative.starts_with('/') {
            relative.to_string()
        } else {
            format!("/{}", relative)
        }
    }

    fn to_remote_file(&self, entry: PropEntry) -> RemoteFile {
        let path = self.relative_path(&entry.href);
        let last_modified = entry.last_modified.unwrap_or_else(|| {
            debug!("No modification time for {}, treating as oldest", path);
            DateTime::<Utc>::UNIX_EPOCH
        });
        RemoteFile {
            path: if entry.is_collection {
                trim_dir(&path).to_string()
            } else {
                path
            },
            last_modified,
            is_dir: entry.is_collection,
        }
    }
}

#[async_trait]
impl RemoteSession for WebdavSession {
    async fn list_directory(&self, path: &str) -> Result<Vec<RemoteFile>> {
        let response = self
            .bounded(dav_method("PROPFIND")?, path)
            .header("Depth", "1")
            .header(CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(propfind::REQUEST_BODY)
            .send()
            .await
            .map_err(|e| BackupError::Listing(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::MULTI_STATUS {
            return Err(BackupError::Listing(format!("PROPFIND {} returned {}", path, status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| BackupError::Listing(e.to_string()))?;
        let requested = trim_dir(path);

        let entries = propfind::parse_multistatus(&body)?
            .into_iter()
            .map(|entry| self.to_remote_file(entry))
            .filter(|file| trim_dir(&file.path) != requested)
            .collect::<Vec<_>>();

        debug!("Listed {} entries in {}", entries.len(), path);
        Ok(entries)
    }

    async fn create_directory(&self, path: &str) -> Result<()> {
        let response = self.bounded(dav_method("MKCOL")?, path).send().await?;
        match response.status() {
            StatusCode::CREATED => {
                info!("Created remote folder {}", path);
                Ok(())
            }
            StatusCode::METHOD_NOT_ALLOWED => {
                debug!("Remote folder {} already exists", path);
                Ok(())
            }
            other => Err(BackupError::Protocol(format!("MKCOL {} returned {}", path, other))),
        }
    }

    async fn put(&self, path: &str, body: ByteStream, length: u64) -> Result<()> {
        let response = self
            .request(Method::PUT, path)
            .header(CONTENT_LENGTH, length)
            .body(Body::wrap_stream(body))
            .send()
            .await
            .map_err(|e| BackupError::Transfer(e.to_string()))?;

        let code = response.status().as_u16();
        check_put_status(code)?;
        info!("...Upload finished (status: {})", code);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let response = self
            .bounded(Method::DELETE, path)
            .send()
            .await
            .map_err(|e| BackupError::Delete(format!("{}: {}", path, e)))?;

        if !response.status().is_success() {
            return Err(BackupError::Delete(format!(
                "DELETE {} returned {}",
                path,
                response.status()
            )));
        }
        debug!("Deleted remote file {}", path);
        Ok(())
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

pub struct WebdavConnector {
    webdav_root: String,
    layout: RemoteLayout,
    timeout: Option<Duration>,
}

impl WebdavConnector {
    pub fn new(webdav_root: &str, layout: RemoteLayout, timeout: Option<Duration>) -> Self {
        Self {
            webdav_root: webdav_root.to_string(),
            layout,
            timeout,
        }
    }
}

#[async_trait]
impl Connector for WebdavConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn RemoteSession>> {
        info!("Initializing and checking WebDAV client...");
        let session = WebdavSession::new(endpoint, &self.webdav_root, self.timeout)?;
        establish(&session, &self.layout).await?;
        Ok(Arc::new(session))
    }
}
