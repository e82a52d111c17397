//! Reqwest-backed backend client.

use std::time::Duration;

use reqwest::{header, Client, Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::dto::{RemotePatient, RemoteSession};
use super::{RemoteError, RemoteResult};

/// Additional attempts after a retryable failure.
pub const DEFAULT_RETRIES: u32 = 2;

const PATIENTS: &str = "pacientes";
const SESSIONS: &str = "sesiones";

/// Client for one backend base URL.
pub struct RemoteClient {
    client: Client,
    base_url: Url,
    retries: u32,
}

impl RemoteClient {
    /// Build a client with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the base URL does not parse or the HTTP client
    /// cannot be constructed.
    pub fn new(base_url: &str, timeout: Duration) -> RemoteResult<Self> {
        let base_url = Url::parse(base_url).map_err(|e| RemoteError::Url(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::Url(format!("{} cannot be a base", base_url)));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Network(format!("client setup failed: {}", e)))?;
        Ok(Self {
            client,
            base_url,
            retries: DEFAULT_RETRIES,
        })
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn list_patients(&self) -> RemoteResult<Vec<RemotePatient>> {
        let url = self.endpoint(&[PATIENTS])?;
        decode(&self.execute(Method::GET, url, None).await?)
    }

    pub async fn get_patient(&self, id: &str) -> RemoteResult<RemotePatient> {
        let url = self.endpoint(&[PATIENTS, id])?;
        decode(&self.execute(Method::GET, url, None).await?)
    }

    pub async fn create_patient(&self, patient: &RemotePatient) -> RemoteResult<RemotePatient> {
        let url = self.endpoint(&[PATIENTS])?;
        let body = encode(patient)?;
        decode(&self.execute(Method::POST, url, Some(&body)).await?)
    }

    pub async fn update_patient(
        &self,
        id: &str,
        patient: &RemotePatient,
    ) -> RemoteResult<RemotePatient> {
        let url = self.endpoint(&[PATIENTS, id])?;
        let body = encode(patient)?;
        decode(&self.execute(Method::PUT, url, Some(&body)).await?)
    }

    pub async fn delete_patient(&self, id: &str) -> RemoteResult<()> {
        let url = self.endpoint(&[PATIENTS, id])?;
        self.execute(Method::DELETE, url, None).await?;
        Ok(())
    }

    pub async fn list_sessions_for_patient(&self, patient_id: &str) -> RemoteResult<Vec<RemoteSession>> {
        let mut url = self.endpoint(&[SESSIONS])?;
        url.query_pairs_mut().append_pair("paciente_id", patient_id);
        decode(&self.execute(Method::GET, url, None).await?)
    }

    pub async fn create_session(&self, session: &RemoteSession) -> RemoteResult<RemoteSession> {
        let url = self.endpoint(&[SESSIONS])?;
        let body = encode(session)?;
        decode(&self.execute(Method::POST, url, Some(&body)).await?)
    }

    pub async fn delete_session(&self, id: &str) -> RemoteResult<()> {
        let url = self.endpoint(&[SESSIONS, id])?;
        self.execute(Method::DELETE, url, None).await?;
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> RemoteResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Url(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request, retrying retryable failures up to `retries` times.
    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> RemoteResult<Vec<u8>> {
        let mut attempt = 0;
        loop {
            match self.attempt(method.clone(), url.clone(), body).await {
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    tracing::debug!("{} {} failed ({}), retry {}/{}", method, url, e, attempt, self.retries);
                }
                Err(e) => {
                    tracing::warn!("{} {} failed: {}", method, url, e);
                    return Err(e);
                }
                Ok(bytes) => return Ok(bytes),
            }
        }
    }

    async fn attempt(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> RemoteResult<Vec<u8>> {
        let mut request = self
            .client
            .request(method, url)
            .header(header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(RemoteError::Status {
                code: status.as_u16(),
                body: body_preview(&bytes),
            });
        }
        Ok(bytes.to_vec())
    }
}

fn encode<T: Serialize>(value: &T) -> RemoteResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| RemoteError::Decode(format!("cannot encode body: {}", e)))
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> RemoteResult<T> {
    serde_json::from_slice(body).map_err(|e| RemoteError::Decode(e.to_string()))
}

fn map_transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Network(format!("timed out: {}", error))
    } else if error.is_decode() {
        RemoteError::Decode(error.to_string())
    } else {
        RemoteError::Network(error.to_string())
    }
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        let preview: String = compact.chars().take(PREVIEW_CHAR_LIMIT).collect();
        format!("{}...", preview)
    } else {
        compact
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> RemoteClient {
        RemoteClient::new(base, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let remote = client("https://api.kinesphere.com/v1");
        let url = remote.endpoint(&[PATIENTS, "12"]).unwrap();
        assert_eq!(url.as_str(), "https://api.kinesphere.com/v1/pacientes/12");

        let remote = client("http://localhost:3000/");
        let url = remote.endpoint(&[SESSIONS]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/sesiones");
    }

    #[test]
    fn test_endpoint_escapes_ids() {
        let remote = client("http://localhost:3000");
        let url = remote.endpoint(&[PATIENTS, "a/b"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/pacientes/a%2Fb");
    }

    #[test]
    fn test_invalid_base_url() {
        let result = RemoteClient::new("not a url", Duration::from_secs(1));
        assert!(matches!(result, Err(RemoteError::Url(_))));
    }

    #[test]
    fn test_body_preview_compacts_whitespace() {
        assert_eq!(body_preview(b"{\n  \"error\": \"boom\"\n}"), "{ \"error\": \"boom\" }");
        let long = "x".repeat(200);
        assert!(body_preview(long.as_bytes()).ends_with("..."));
    }

    #[test]
    fn test_decode_error_is_classified() {
        let result: RemoteResult<Vec<RemotePatient>> = decode(b"<html>");
        assert!(matches!(result, Err(RemoteError::Decode(_))));
    }
}
