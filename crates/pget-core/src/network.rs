// HTTP client construction and the pre-flight HEAD probe.

use reqwest::header;

use crate::types::PgetError;

/// The probe client is short-lived and shared across requests, so it gets a
/// larger pool than the per-download worker clients.
const PROBE_POOL_SIZE: usize = 16;

/// Build the client shared by one download's chunk workers.
///
/// The pool is sized for `parallelism` concurrent range requests. Content
/// decoding stays off: ranged bodies must arrive verbatim.
pub fn build_client(
    parallelism: usize,
    proxy_url: Option<&str>,
) -> Result<reqwest::Client, PgetError> {
    client_with_pool(parallelism, proxy_url)
}

/// Build the client used for HEAD probes.
pub fn probe_client(proxy_url: Option<&str>) -> Result<reqwest::Client, PgetError> {
    client_with_pool(PROBE_POOL_SIZE, proxy_url)
}

fn client_with_pool(pool: usize, proxy_url: Option<&str>) -> Result<reqwest::Client, PgetError> {
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(pool.max(1))
        .no_gzip()
        .no_brotli()
        .no_deflate();

    if let Some(proxy) = proxy_url.filter(|p| !p.is_empty()) {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }

    Ok(builder.build()?)
}

/// Issue the pre-flight HEAD request for a download.
///
/// The server must advertise `Accept-Ranges: bytes` and a positive
/// `Content-Length`; the latter is returned.
pub async fn probe(
    client: &reqwest::Client,
    url: &str,
    user_agent: &str,
) -> Result<u64, PgetError> {
    let response = client
        .head(url)
        .header(header::USER_AGENT, user_agent)
        .send()
        .await?;

    let headers = response.headers();

    let resumable = headers
        .get(header::ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "bytes")
        .unwrap_or(false);
    if !resumable {
        return Err(PgetError::RangeNotSupported);
    }

    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0);
    if content_length <= 0 {
        return Err(PgetError::InvalidContentLength);
    }

    Ok(content_length as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_probe_ok() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/file.bin"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Accept-Ranges", "bytes")
                    .insert_header("Content-Length", "1000000"),
            )
            .mount(&server)
            .await;

        let client = probe_client(None).unwrap();
        let size = probe(&client, &format!("{}/file.bin", server.uri()), "Pget/test")
            .await
            .unwrap();
        assert_eq!(size, 1_000_000);
    }

    #[tokio::test]
    async fn test_probe_range_not_supported() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/no-ranges"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Length", "1000"))
            .mount(&server)
            .await;

        let client = probe_client(None).unwrap();
        let err = probe(&client, &format!("{}/no-ranges", server.uri()), "Pget/test")
            .await
            .unwrap_err();
        assert!(matches!(err, PgetError::RangeNotSupported));
    }

    #[tokio::test]
    async fn test_probe_invalid_content_length() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/empty"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Accept-Ranges", "bytes")
                    .insert_header("Content-Length", "0"),
            )
            .mount(&server)
            .await;

        let client = probe_client(None).unwrap();
        let err = probe(&client, &format!("{}/empty", server.uri()), "Pget/test")
            .await
            .unwrap_err();
        assert!(matches!(err, PgetError::InvalidContentLength));
    }

    #[test]
    fn test_invalid_proxy_url_rejected() {
        assert!(build_client(4, Some("not a proxy url")).is_err());
    }

    #[test]
    fn test_empty_proxy_means_direct() {
        assert!(build_client(4, Some("")).is_ok());
        assert!(build_client(4, None).is_ok());
    }
}
