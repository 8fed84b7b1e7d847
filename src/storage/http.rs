// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// HTTP plumbing for the time-series backends

use crate::error::{Result, StorageError};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

/// Build a client for the duration of one call; nothing is pooled across calls
pub(crate) fn client(timeout: Duration) -> Result<Client> {
    reqwest::ClientBuilder::new()
        .timeout(timeout)
        .pool_max_idle_per_host(0)
        .build()
        .map_err(|e| StorageError::connection("Failed to build HTTP client", e))
}

/// Join a base URL and an API path without doubling slashes
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

pub(crate) fn send_error(url: &str, e: reqwest::Error) -> StorageError {
    StorageError::connection(format!("Failed to reach '{}'", url), e)
}

/// Turn a non-success response into the matching error category
pub(crate) async fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StorageError::config(format!(
            "{} rejected the credentials ({}): {}",
            what, status, body
        )),
        StatusCode::NOT_FOUND => {
            StorageError::schema(format!("{} failed with status {}: {}", what, status, body))
        }
        StatusCode::BAD_REQUEST => {
            StorageError::data(format!("{} failed with status {}: {}", what, status, body))
        }
        _ => StorageError::unreachable(format!(
            "{} failed with status {}: {}",
            what, status, body
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_join() {
        assert_eq!(
            endpoint("http://localhost:8086/", "/query"),
            "http://localhost:8086/query"
        );
        assert_eq!(
            endpoint("http://localhost:8086", "api/v2/write"),
            "http://localhost:8086/api/v2/write"
        );
    }
}
