use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capture::CapturedImage;
use crate::errors::{AppError, AppResult};
use crate::faces::encoder::{EncoderClient, EncodingOutcome};
use crate::faces::matcher::{Nearest, NearestNeighbor};
use crate::faces::quality::RejectionReason;
use crate::faces::vector::Vector;
use crate::secret_service::SharedSecret;

pub const DEFAULT_SERVICE_TIMEOUT: Duration =
    Duration::from_secs(facematch_config::DEFAULT_SERVICE_TIMEOUT_SECS);
pub const API_KEY_HEADER: &str = "X-API-KEY";

#[derive(Debug, Clone)]
pub struct RemoteServiceConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub secret: Option<SharedSecret>,
}

impl RemoteServiceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_SERVICE_TIMEOUT,
            secret: None,
        }
    }
}

/// Connection to the biometric service shared by the remote encoder and the
/// remote matcher.
#[derive(Debug, Clone)]
pub struct RemoteService {
    client: Client,
    base_url: String,
    secret: Option<SharedSecret>,
}

impl RemoteService {
    pub fn new(config: RemoteServiceConfig) -> AppResult<Self> {
        let base_url = normalize_base_url(&config.base_url)?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| AppError::Configuration(format!("failed to build HTTP client: {err}")))?;
        if config.secret.is_none() {
            warn!(url = %base_url, "no shared secret configured; requests are unauthenticated");
        }
        Ok(Self {
            client,
            base_url,
            secret: config.secret,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.post(format!("{}{path}", self.base_url)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.secret {
            Some(secret) => request.header(API_KEY_HEADER, secret.expose()),
            None => request,
        }
    }

    /// Calls `GET /health`. Any failure reports the service as unavailable.
    pub fn health(&self) -> AppResult<()> {
        let response = self
            .authorize(self.client.get(format!("{}/health", self.base_url)))
            .send()
            .map_err(|err| {
                warn!(error = %err, "health check failed");
                AppError::EncoderUnavailable
            })?;
        if response.status().is_success() {
            Ok(())
        } else {
            warn!(status = %response.status(), "health check returned an error status");
            Err(AppError::EncoderUnavailable)
        }
    }
}

fn normalize_base_url(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AppError::Configuration("service_url cannot be empty".into()));
    }
    if trimmed.contains("://") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("http://{trimmed}"))
    }
}

/// Statuses that mean "try again later" rather than "this request is bad".
fn is_availability_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::UNAUTHORIZED
            | StatusCode::FORBIDDEN
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

#[derive(Deserialize)]
struct EncodeResponse {
    encoding: Vec<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

impl ErrorBody {
    fn parse(response: Response) -> Self {
        response
            .text()
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    fn rejection(&self) -> Option<RejectionReason> {
        if let Some(reason) = self.reason.as_deref().and_then(RejectionReason::from_code) {
            return Some(reason);
        }
        let message = self.error.as_deref()?.to_ascii_lowercase();
        if message.contains("resolution too low") {
            Some(RejectionReason::LowResolution)
        } else if message.contains("no face detected") {
            Some(RejectionReason::NoFaceDetected)
        } else if message.contains("face too small") {
            Some(RejectionReason::FaceTooSmall)
        } else if message.contains("multiple faces") {
            Some(RejectionReason::MultipleFacesAmbiguous)
        } else {
            None
        }
    }

    fn detail(&self, status: StatusCode) -> String {
        match &self.error {
            Some(message) => format!("HTTP {status}: {message}"),
            None => format!("HTTP {status}"),
        }
    }
}

/// Encoder backed by the service's `POST /encode`.
#[derive(Debug, Clone)]
pub struct RemoteEncoder {
    service: RemoteService,
}

impl RemoteEncoder {
    pub fn new(service: RemoteService) -> Self {
        Self { service }
    }
}

impl EncoderClient for RemoteEncoder {
    fn encode(&self, image: &CapturedImage, enrollment_mode: bool) -> EncodingOutcome {
        let part = Part::bytes(image.bytes().to_vec()).file_name(image.file_name());
        let form = Form::new()
            .text("is_enrollment", if enrollment_mode { "true" } else { "false" })
            .part("image", part);

        let response = match self.service.post("/encode").multipart(form).send() {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, timeout = err.is_timeout(), "encoder request failed");
                return EncodingOutcome::EncoderUnavailable;
            }
        };

        let status = response.status();
        if status.is_success() {
            return match response.json::<EncodeResponse>() {
                Ok(body) => {
                    debug!(values = body.encoding.len(), enrollment_mode, "remote encoding received");
                    EncodingOutcome::Success(Vector::new(body.encoding))
                }
                Err(err) if err.is_timeout() => {
                    warn!(error = %err, "encoder response timed out");
                    EncodingOutcome::EncoderUnavailable
                }
                Err(err) => EncodingOutcome::EncoderError(format!("malformed encoder response: {err}")),
            };
        }

        if is_availability_status(status) {
            warn!(%status, "encoder service unavailable");
            return EncodingOutcome::EncoderUnavailable;
        }

        let body = ErrorBody::parse(response);
        if matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY) {
            if let Some(reason) = body.rejection() {
                debug!(%status, reason = reason.code(), "encoder rejected image");
                return EncodingOutcome::QualityRejected(reason);
            }
        }
        warn!(%status, "encoder returned an error");
        EncodingOutcome::EncoderError(body.detail(status))
    }
}

#[derive(Serialize)]
struct CompareRequest<'a> {
    unknown: &'a [f64],
    knowns: Vec<&'a [f64]>,
    tolerance: f64,
}

#[derive(Deserialize)]
struct CompareResponse {
    match_index: i64,
    #[serde(default)]
    distance: Option<f64>,
}

/// Nearest-neighbor search delegated to the service's `POST /compare`.
#[derive(Debug, Clone)]
pub struct RemoteMatcher {
    service: RemoteService,
}

impl RemoteMatcher {
    pub fn new(service: RemoteService) -> Self {
        Self { service }
    }
}

impl NearestNeighbor for RemoteMatcher {
    fn nearest(
        &self,
        unknown: &Vector,
        knowns: &[&Vector],
        tolerance: f64,
    ) -> AppResult<Option<Nearest>> {
        let request = CompareRequest {
            unknown: unknown.as_slice(),
            knowns: knowns.iter().map(|known| known.as_slice()).collect(),
            tolerance,
        };

        let response = self
            .service
            .post("/compare")
            .json(&request)
            .send()
            .map_err(|err| {
                warn!(error = %err, timeout = err.is_timeout(), "matcher request failed");
                AppError::MatcherUnavailable
            })?;

        let status = response.status();
        if is_availability_status(status) {
            warn!(%status, "matcher service unavailable");
            return Err(AppError::MatcherUnavailable);
        }
        if !status.is_success() {
            let body = ErrorBody::parse(response);
            return Err(AppError::Matcher(body.detail(status)));
        }

        let body: CompareResponse = response.json().map_err(|err| {
            if err.is_timeout() {
                AppError::MatcherUnavailable
            } else {
                AppError::Matcher(format!("malformed matcher response: {err}"))
            }
        })?;

        if body.match_index == -1 {
            return Ok(None);
        }
        let index = usize::try_from(body.match_index)
            .ok()
            .filter(|index| *index < knowns.len())
            .ok_or_else(|| {
                AppError::Matcher(format!(
                    "match_index {} outside 0..{}",
                    body.match_index,
                    knowns.len()
                ))
            })?;
        let distance = body
            .distance
            .filter(|distance| distance.is_finite())
            .ok_or_else(|| AppError::Matcher("match without a finite distance".into()))?;

        Ok(Some(Nearest { index, distance }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_scheme_and_loses_trailing_slash() {
        assert_eq!(
            normalize_base_url("10.0.0.5:5000/").unwrap(),
            "http://10.0.0.5:5000"
        );
        assert_eq!(
            normalize_base_url("https://bio.example.org").unwrap(),
            "https://bio.example.org"
        );
        assert!(matches!(
            normalize_base_url("  "),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn error_body_prefers_reason_code() {
        let body = ErrorBody {
            error: Some("No face detected".into()),
            reason: Some("face_too_small".into()),
        };
        assert_eq!(body.rejection(), Some(RejectionReason::FaceTooSmall));
    }

    #[test]
    fn error_body_recognizes_legacy_messages() {
        let cases = [
            (
                "Image resolution too low. Minimum 200x200 required.",
                RejectionReason::LowResolution,
            ),
            ("No face detected", RejectionReason::NoFaceDetected),
            (
                "Face too small or too far away. Please move closer.",
                RejectionReason::FaceTooSmall,
            ),
        ];
        for (message, expected) in cases {
            let body = ErrorBody {
                error: Some(message.into()),
                reason: None,
            };
            assert_eq!(body.rejection(), Some(expected), "{message}");
        }

        let body = ErrorBody {
            error: Some("No image provided".into()),
            reason: None,
        };
        assert_eq!(body.rejection(), None);
    }

    #[test]
    fn availability_statuses() {
        for status in [401u16, 403, 429, 502, 503, 504] {
            assert!(is_availability_status(StatusCode::from_u16(status).unwrap()));
        }
        for status in [400u16, 404, 500] {
            assert!(!is_availability_status(StatusCode::from_u16(status).unwrap()));
        }
    }
}
