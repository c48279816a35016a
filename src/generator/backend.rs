//! Requests to the subscription converter backend
//!
//! The backend receives obfuscated links only. Links are batched so that no
//! single request URL grows unbounded.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use tracing::{debug, warn};
use url::Url;

use crate::client::Target;

/// Separator the backend expects between links in the `url` parameter
pub const LINK_SEPARATOR: &str = "|";

const RESERVED_PARAMS: [&str; 2] = ["target", "url"];

/// Builds one backend URL per chunk of at most `chunk_size` links
///
/// Each URL is `<backend>?target=<target>&url=<links joined by '|'>` followed
/// by `params`. Params named `target` or `url` are ignored.
pub fn build_backend_urls<S: AsRef<str>>(
    backend: &str,
    target: Target,
    links: &[S],
    chunk_size: usize,
    params: &BTreeMap<String, String>,
) -> Result<Vec<String>> {
    if chunk_size == 0 {
        anyhow::bail!("chunk_size must be greater than 0");
    }
    let base = Url::parse(backend).with_context(|| format!("Invalid backend URL: {}", backend))?;

    for key in params.keys() {
        if RESERVED_PARAMS.contains(&key.as_str()) {
            warn!("Ignoring reserved backend parameter '{}'", key);
        }
    }

    let urls: Vec<String> = links
        .chunks(chunk_size)
        .map(|chunk| {
            let joined = chunk
                .iter()
                .map(|link| link.as_ref())
                .collect::<Vec<&str>>()
                .join(LINK_SEPARATOR);

            let mut url = base.clone();
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("target", target.as_str());
                query.append_pair("url", &joined);
                for (key, value) in params {
                    if !RESERVED_PARAMS.contains(&key.as_str()) {
                        query.append_pair(key, value);
                    }
                }
            }
            url.to_string()
        })
        .collect();

    debug!(
        "Built {} backend request(s) for {} link(s)",
        urls.len(),
        links.len()
    );
    Ok(urls)
}
