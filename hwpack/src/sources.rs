// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! APT source entries and the transports used to fetch from them.

A source entry is a sources.list line without its leading `deb`:
`<uri> <distribution> [<component>...]`. A distribution ending in `/`
denotes a flat repository whose indices live directly under
`<uri>/<distribution>`.
*/

use {
    crate::error::{HwpackError, Result},
    log::debug,
    once_cell::sync::Lazy,
    regex::Regex,
    url::Url,
};

static RE_URL_CREDENTIALS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w+://)([^:/@\s]+):[^@\s]*@").unwrap());

/// Replace passwords embedded in URLs with `***`.
pub fn redact_credentials(s: &str) -> String {
    RE_URL_CREDENTIALS.replace_all(s, "$1$2:***@").to_string()
}

/// A parsed sources entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourceEntry {
    /// Base URI with credentials removed.
    uri: Url,
    distribution: String,
    components: Vec<String>,
    username: Option<String>,
    password: Option<String>,
}

impl SourceEntry {
    /// Parse an entry of the form `<uri> <distribution> [<component>...]`.
    pub fn parse(entry: &str) -> Result<Self> {
        let mut tokens = entry.split_whitespace();

        let (uri, distribution) = match (tokens.next(), tokens.next()) {
            (Some(uri), Some(distribution)) => (uri, distribution),
            _ => {
                return Err(HwpackError::config(
                    "sources",
                    redact_credentials(entry),
                    "sources entry must have at least a URI and a distribution",
                ))
            }
        };
        let components = tokens.map(|s| s.to_string()).collect::<Vec<_>>();

        let mut uri = Url::parse(uri)?;

        let username = Some(uri.username().to_string()).filter(|s| !s.is_empty());
        let password = uri.password().map(|s| s.to_string());

        if username.is_some() || password.is_some() {
            let invalid = |_| {
                HwpackError::config(
                    "sources",
                    redact_credentials(entry),
                    "cannot strip credentials from URI",
                )
            };
            uri.set_username("").map_err(invalid)?;
            uri.set_password(None).map_err(invalid)?;
        }

        if !distribution.ends_with('/') && components.is_empty() {
            return Err(HwpackError::config(
                "sources",
                redact_credentials(entry),
                "non-flat sources entries need at least one component",
            ));
        }

        Ok(Self {
            uri,
            distribution: distribution.to_string(),
            components,
            username,
            password,
        })
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn distribution(&self) -> &str {
        &self.distribution
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Whether this entry denotes a flat repository.
    pub fn is_flat(&self) -> bool {
        self.distribution.ends_with('/')
    }

    /// Username and password from the original URI, if present.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.username
            .as_deref()
            .map(|u| (u, self.password.as_deref().unwrap_or_default()))
    }

    /// The `deb ...` line for a sources.list, without credentials.
    pub fn sources_list_line(&self) -> String {
        let mut parts = vec![
            "deb".to_string(),
            self.uri.as_str().to_string(),
            self.distribution.clone(),
        ];
        parts.extend(self.components.iter().cloned());

        parts.join(" ")
    }

    /// The `machine` line for an APT `auth.conf`, for entries with credentials.
    pub fn auth_conf_line(&self) -> Option<String> {
        let (login, password) = self.credentials()?;

        let mut machine = self.uri.host_str().unwrap_or_default().to_string();
        if let Some(port) = self.uri.port() {
            machine.push_str(&format!(":{}", port));
        }
        machine.push_str(self.uri.path().trim_end_matches('/'));

        Some(format!(
            "machine {} login {} password {}",
            machine, login, password
        ))
    }

    /// Resolve a path relative to the repository root.
    pub fn join(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}/{}",
            self.uri.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        ))?)
    }

    /// URL of the `Release` file.
    pub fn release_url(&self) -> Result<Url> {
        if self.is_flat() {
            self.join(&format!("{}Release", self.flat_prefix()))
        } else {
            self.join(&format!("dists/{}/Release", self.distribution))
        }
    }

    /// Directories holding `Packages` indices, one per component.
    ///
    /// Flat repositories have a single directory.
    pub fn index_directories(&self, architecture: Option<&str>) -> Vec<String> {
        if self.is_flat() {
            vec![self.flat_prefix()]
        } else {
            self.components
                .iter()
                .map(|component| {
                    format!(
                        "dists/{}/{}/binary-{}/",
                        self.distribution,
                        component,
                        architecture.unwrap_or("all")
                    )
                })
                .collect()
        }
    }

    fn flat_prefix(&self) -> String {
        match self.distribution.as_str() {
            "./" => "".to_string(),
            d => d.trim_start_matches("./").to_string(),
        }
    }
}

/// Fetches resources referenced by source entries.
///
/// `file://` URLs are read from the filesystem. With the `http` feature,
/// `http://` and `https://` URLs go through a blocking HTTP client.
#[derive(Default)]
pub struct Transport {
    #[cfg(feature = "http")]
    client: once_cell::unsync::OnceCell<reqwest::blocking::Client>,
}

/// Obtain an HTTP client, taking proxy environment variables into account.
#[cfg(feature = "http")]
pub fn get_http_client() -> reqwest::Result<reqwest::blocking::Client> {
    let mut builder = reqwest::blocking::ClientBuilder::new();

    for (key, value) in std::env::vars() {
        let key = key.to_lowercase();
        if let Some(schema) = key.strip_suffix("_proxy") {
            if let Ok(url) = Url::parse(&value) {
                let proxy = match schema {
                    "http" => Some(reqwest::Proxy::http(url.as_str())),
                    "https" => Some(reqwest::Proxy::https(url.as_str())),
                    _ => None,
                };

                if let Some(Ok(proxy)) = proxy {
                    builder = builder.proxy(proxy);
                }
            }
        }
    }

    builder.build()
}

impl Transport {
    /// Fetch a URL.
    ///
    /// Returns `Ok(None)` when the resource does not exist.
    #[cfg_attr(not(feature = "http"), allow(unused_variables))]
    pub fn fetch(&self, url: &Url, credentials: Option<(&str, &str)>) -> Result<Option<Vec<u8>>> {
        debug!("fetching {}", url);

        match url.scheme() {
            "file" => {
                let path = url.to_file_path().map_err(|_| HwpackError::Fetch {
                    item: url.to_string(),
                    message: "not a valid file URL".to_string(),
                })?;

                match std::fs::read(&path) {
                    Ok(data) => Ok(Some(data)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(HwpackError::Fetch {
                        item: url.to_string(),
                        message: e.to_string(),
                    }),
                }
            }
            #[cfg(feature = "http")]
            "http" | "https" => self.fetch_http(url, credentials),
            scheme => Err(HwpackError::Fetch {
                item: redact_credentials(url.as_str()),
                message: format!("unsupported URL scheme: {}", scheme),
            }),
        }
    }

    #[cfg(feature = "http")]
    fn fetch_http(&self, url: &Url, credentials: Option<(&str, &str)>) -> Result<Option<Vec<u8>>> {
        let client = self.client.get_or_try_init(get_http_client)?;

        let mut request = client.get(url.clone());
        if let Some((username, password)) = credentials {
            request = request.basic_auth(username, Some(password));
        }

        let mut response = request.send().map_err(|e| HwpackError::Fetch {
            item: url.to_string(),
            message: redact_credentials(&e.to_string()),
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(HwpackError::Fetch {
                item: url.to_string(),
                message: format!("HTTP status {}", response.status()),
            });
        }

        let mut data = vec![];
        std::io::Read::read_to_end(&mut response, &mut data)?;

        Ok(Some(data))
    }
}
