use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT_LANGUAGE, RETRY_AFTER};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::types::{history_field, ChatMessage, ErrorBody, SignupRequest, TokenResponse, UploadResponse};
use super::upload::{require_patient, validate_credentials, validate_signup, ImageUpload};
use super::BackendError;
use crate::config::AppConfig;
use crate::models::{AnalysisRecord, DashboardStats, HistoryEntry, ImageRef, NewPatient, PatientRef};
use crate::session::Session;

/// HTTP client for the screening backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    http: reqwest::Client,
    timeout_secs: u64,
}

impl BackendClient {
    pub fn new(config: &AppConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::Http(e.to_string()))?;

        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            http,
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Underlying client, shared with the report image loader.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the bearer token; refuses before any network traffic without one.
    fn authorized(&self, builder: RequestBuilder, session: &Session) -> Result<RequestBuilder, BackendError> {
        let token = session.token().ok_or(BackendError::NotAuthenticated)?;
        Ok(builder
            .bearer_auth(token)
            .header(ACCEPT_LANGUAGE, session.translator().accept_language()))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, BackendError> {
        builder.send().await.map_err(|e| {
            if e.is_connect() {
                BackendError::Connection(self.base_url.clone())
            } else if e.is_timeout() {
                BackendError::Timeout(self.timeout_secs)
            } else {
                BackendError::Http(e.to_string())
            }
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, session: &Session, path: &str) -> Result<T, BackendError> {
        let builder = self.authorized(self.http.get(self.url(path)), session)?;
        let response = check_status(self.send(builder).await?).await?;
        parse_json(response).await
    }

    // ─── Auth ────────────────────────────────────────────────────────────────

    /// Exchange credentials for an access token.
    pub async fn login(&self, email: &str, password: &str) -> Result<String, BackendError> {
        validate_credentials(email, password)?;
        let builder = self
            .http
            .post(self.url("/token"))
            .form(&[("username", email.trim()), ("password", password)]);
        let response = self.send(builder).await?;

        if matches!(response.status(), StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED) {
            return Err(BackendError::Rejected(error_detail(response).await));
        }
        let token: TokenResponse = parse_json(check_status(response).await?).await?;
        let token = token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BackendError::InvalidResponse("no access token".into()))?;

        tracing::info!("Logged in");
        Ok(token)
    }

    pub async fn signup(&self, email: &str, password: &str) -> Result<(), BackendError> {
        validate_signup(email, password)?;
        let builder = self.http.post(self.url("/signup")).json(&SignupRequest {
            email: email.trim(),
            password,
        });
        let response = self.send(builder).await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST
            || status == StatusCode::CONFLICT
            || status == StatusCode::UNPROCESSABLE_ENTITY
        {
            return Err(BackendError::Rejected(error_detail(response).await));
        }
        check_status(response).await?;
        tracing::info!("Account created");
        Ok(())
    }

    // ─── Analysis ────────────────────────────────────────────────────────────

    /// Upload a fundus image for the selected patient and return the result.
    pub async fn analyze(
        &self,
        session: &Session,
        upload: &ImageUpload,
        patient_id: Option<&str>,
    ) -> Result<AnalysisRecord, BackendError> {
        let patient_id = require_patient(patient_id)?;
        let part = Part::bytes(upload.bytes().to_vec())
            .file_name(upload.filename().to_string())
            .mime_str(upload.mime())
            .map_err(|e| BackendError::Http(e.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("patient_id", patient_id.to_string());

        let builder = self.authorized(self.http.post(self.url("/uploadfile/")), session)?;
        let started = std::time::Instant::now();
        let response = check_status(self.send(builder.multipart(form)).await?).await?;
        let body: UploadResponse = parse_json(response).await?;

        let source = match upload.path() {
            Some(path) => ImageRef::File(path.to_path_buf()),
            None => ImageRef::Inline(format!(
                "data:{};base64,{}",
                upload.mime(),
                BASE64.encode(upload.bytes())
            )),
        };
        let record = body
            .analysis
            .into_record(
                &self.base_url,
                Some(source),
                Some(patient_id),
                &session.translator(),
                Utc::now(),
            )
            .map_err(BackendError::Analysis)?;

        tracing::info!(
            patient_id,
            classification = record.classification().as_str(),
            confidence = record.confidence(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Analysis received"
        );
        Ok(record)
    }

    // ─── Registry, history, dashboard ────────────────────────────────────────

    pub async fn list_patients(&self, session: &Session) -> Result<Vec<PatientRef>, BackendError> {
        self.get_json(session, "/patients").await
    }

    /// Register a patient. Returns the stored row when the backend echoes it.
    pub async fn create_patient(
        &self,
        session: &Session,
        patient: &NewPatient,
    ) -> Result<Option<PatientRef>, BackendError> {
        let builder = self.authorized(self.http.post(self.url("/patients")), session)?;
        let response = check_status(self.send(builder.json(patient)).await?).await?;
        let body: serde_json::Value = parse_json(response).await?;
        tracing::info!("Patient registered");
        Ok(serde_json::from_value(body).ok())
    }

    pub async fn history(&self, session: &Session) -> Result<Vec<HistoryEntry>, BackendError> {
        self.get_json(session, "/history").await
    }

    pub async fn dashboard_stats(&self, session: &Session) -> Result<DashboardStats, BackendError> {
        self.get_json(session, "/dashboard/stats").await
    }

    // ─── Assistants ──────────────────────────────────────────────────────────

    /// Clinical assistant. `context` is sent as a text-only summary of the
    /// current analysis (never the images).
    pub async fn chat(
        &self,
        session: &Session,
        message: &str,
        history: &[ChatMessage],
        context: Option<&AnalysisRecord>,
        on_chunk: impl FnMut(&str),
    ) -> Result<String, BackendError> {
        let mut form = self.chat_form(message, history)?;
        if let Some(record) = context {
            form = form.text("analysis_context", record.context_summary().to_string());
        }
        self.stream_chat("/chat", session, form, on_chunk).await
    }

    /// Application help assistant.
    pub async fn guide(
        &self,
        session: &Session,
        message: &str,
        history: &[ChatMessage],
        on_chunk: impl FnMut(&str),
    ) -> Result<String, BackendError> {
        let form = self.chat_form(message, history)?;
        self.stream_chat("/chat/guide", session, form, on_chunk).await
    }

    fn chat_form(&self, message: &str, history: &[ChatMessage]) -> Result<Form, BackendError> {
        let history = history_field(history).map_err(|e| BackendError::Http(e.to_string()))?;
        Ok(Form::new()
            .text("message", message.to_string())
            .text("history", history))
    }

    async fn stream_chat(
        &self,
        path: &str,
        session: &Session,
        form: Form,
        mut on_chunk: impl FnMut(&str),
    ) -> Result<String, BackendError> {
        let mut builder = self
            .http
            .post(self.url(path))
            .header(ACCEPT_LANGUAGE, session.translator().accept_language())
            .multipart(form);
        if let Some(token) = session.token() {
            builder = builder.bearer_auth(token);
        }
        let response = check_status(self.send(builder).await?).await?;

        let mut stream = std::pin::pin!(response.bytes_stream());
        let mut decoder = Utf8StreamDecoder::default();
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| BackendError::Http(e.to_string()))?;
            let piece = decoder.push(&chunk);
            if !piece.is_empty() {
                on_chunk(&piece);
                text.push_str(&piece);
            }
        }
        let tail = decoder.finish();
        if !tail.is_empty() {
            on_chunk(&tail);
            text.push_str(&tail);
        }

        tracing::debug!(path, chars = text.chars().count(), "Assistant reply streamed");
        Ok(text)
    }
}

async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::UNAUTHORIZED => Err(BackendError::Unauthorized),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            Err(BackendError::RateLimited { retry_after })
        }
        _ => {
            let status = status.as_u16();
            let detail = error_detail(response).await;
            tracing::warn!(status, detail = %detail, "Backend error");
            Err(BackendError::Status { status, detail })
        }
    }
}

async fn error_detail(response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.detail_text())
        .unwrap_or(body)
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    response
        .json()
        .await
        .map_err(|e| BackendError::InvalidResponse(e.to_string()))
}

/// Incremental UTF-8 decoding for streamed bodies: a multi-byte sequence
/// split across chunks is held back until complete.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(std::str::from_utf8(&self.pending[..valid]).unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush whatever is left; an unfinished sequence becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::backend::ValidationError;
    use crate::i18n::Locale;
    use crate::models::{Classification, Gender};
    use crate::test_support::{png_bytes, serve};
    use axum::body::{Body, Bytes};
    use axum::extract::Multipart;
    use axum::http::HeaderMap;
    use axum::response::{IntoResponse, Response as AxumResponse};
    use axum::routing::{get, post};
    use axum::{Form as AxumForm, Json, Router};
    use serde_json::json;

    const TOKEN: &str = "tok-1";

    fn client(base: &str) -> BackendClient {
        BackendClient::new(&AppConfig {
            api_url: format!("{base}/"),
            ..Default::default()
        })
        .unwrap()
    }

    fn session() -> Session {
        Session::anonymous(Locale::Fr).with_token(TOKEN)
    }

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == format!("Bearer {TOKEN}"))
    }

    async fn token(AxumForm(form): AxumForm<HashMap<String, String>>) -> AxumResponse {
        if form.get("username").map(String::as_str) == Some("doc@clinic.fr")
            && form.get("password").map(String::as_str) == Some("secret123")
        {
            Json(json!({"access_token": TOKEN, "token_type": "bearer"})).into_response()
        } else {
            (
                axum::http::StatusCode::UNAUTHORIZED,
                Json(json!({"detail": "Incorrect email or password"})),
            )
                .into_response()
        }
    }

    async fn patients(headers: HeaderMap) -> AxumResponse {
        if !authorized(&headers) {
            return axum::http::StatusCode::UNAUTHORIZED.into_response();
        }
        Json(json!([
            {"id": 12, "full_name": "Jean Dupont", "age": 64, "gender": "M"},
            {"id": "13", "full_name": "Amina Benali", "age": null, "gender": "F"}
        ]))
        .into_response()
    }

    fn registry() -> Router {
        Router::new()
            .route("/token", post(token))
            .route(
                "/patients",
                get(patients).post(|Json(body): Json<serde_json::Value>| async move {
                    let mut row = body;
                    row["id"] = json!(14);
                    Json(row)
                }),
            )
            .route(
                "/history",
                get(|| async {
                    Json(json!([{
                        "id": 3, "has_glaucoma": true, "confidence": 0.88,
                        "timestamp": "2024-05-01T09:30:00", "image_url": "http://img/a.png",
                        "is_expired": false, "filename": "12_1714555800_eye.png"
                    }]))
                }),
            )
            .route(
                "/dashboard/stats",
                get(|| async {
                    Json(json!({"total_patients": 4, "total_analyses": 10, "total_glaucoma": 3,
                                "recent_patients": []}))
                }),
            )
    }

    #[tokio::test]
    async fn login_returns_token() {
        let base = serve(registry()).await;
        let client = client(&base);
        assert_eq!(client.base_url(), base);
        assert_eq!(client.login("doc@clinic.fr", "secret123").await.unwrap(), TOKEN);
    }

    #[tokio::test]
    async fn bad_credentials_show_backend_reason() {
        let base = serve(registry()).await;
        let err = client(&base).login("doc@clinic.fr", "wrong").await.unwrap_err();
        assert!(matches!(err, BackendError::Rejected(ref d) if d == "Incorrect email or password"));
    }

    #[tokio::test]
    async fn empty_credentials_never_reach_network() {
        let err = client("http://127.0.0.1:9").login("", "").await.unwrap_err();
        assert!(matches!(err, BackendError::Validation(_)));
    }

    #[tokio::test]
    async fn missing_token_fails_before_request() {
        let client = client("http://127.0.0.1:9");
        let err = client
            .list_patients(&Session::anonymous(Locale::En))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotAuthenticated));
    }

    #[tokio::test]
    async fn registry_history_and_stats() {
        let base = serve(registry()).await;
        let client = client(&base);

        let patients = client.list_patients(&session()).await.unwrap();
        assert_eq!(patients.len(), 2);
        assert_eq!(patients[0].id, "12");
        assert_eq!(patients[1].gender, Gender::Female);

        let history = client.history(&session()).await.unwrap();
        assert_eq!(history[0].classification(), Classification::GlaucomaSuspected);

        let stats = client.dashboard_stats(&session()).await.unwrap();
        assert_eq!(stats.total_healthy(), 7);
    }

    #[tokio::test]
    async fn created_patient_is_echoed() {
        let base = serve(registry()).await;
        let new = NewPatient {
            full_name: "Lucía Pérez".into(),
            age: Some(51),
            gender: Gender::Female,
            phone: None,
        };
        let created = client(&base).create_patient(&session(), &new).await.unwrap().unwrap();
        assert_eq!(created.id, "14");
        assert_eq!(created.full_name, "Lucía Pérez");
    }

    #[tokio::test]
    async fn expired_token_is_unauthorized() {
        let base = serve(registry()).await;
        let stale = Session::anonymous(Locale::Fr).with_token("old");
        let err = client(&base).list_patients(&stale).await.unwrap_err();
        assert!(err.needs_login());
    }

    #[tokio::test]
    async fn unreachable_backend_is_connection_error() {
        let err = client("http://127.0.0.1:9")
            .history(&session())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Connection(_)));
    }

    #[tokio::test]
    async fn analyze_sends_file_and_patient() {
        let seen: Arc<Mutex<Vec<(String, Option<String>)>>> = Arc::default();
        let recorded = seen.clone();
        let app = Router::new().route(
            "/uploadfile/",
            post(move |headers: HeaderMap, mut multipart: Multipart| {
                let recorded = recorded.clone();
                async move {
                    assert!(authorized(&headers));
                    while let Some(field) = multipart.next_field().await.unwrap() {
                        let name = field.name().unwrap_or_default().to_string();
                        let file = field.file_name().map(str::to_string);
                        recorded.lock().unwrap().push((name, file));
                    }
                    Json(json!({
                        "filename": "eye.png",
                        "analysis": {"prediction_class": 0, "probability": 0.912,
                                     "gradcam_url": "/heatmaps/eye.png"}
                    }))
                }
            }),
        );
        let base = serve(app).await;
        let client = client(&base);

        let upload = ImageUpload::from_bytes("eye.png", png_bytes(8, 8), &Default::default()).unwrap();
        let record = client.analyze(&session(), &upload, Some("12")).await.unwrap();

        assert_eq!(record.classification(), Classification::Healthy);
        assert_eq!(record.confidence_label(), "91.2");
        assert_eq!(record.overlay(), Some(&ImageRef::Url(format!("{base}/heatmaps/eye.png"))));
        assert!(matches!(record.source_image(), Some(ImageRef::Inline(uri)) if uri.starts_with("data:image/png;base64,")));

        let fields = seen.lock().unwrap().clone();
        assert!(fields.contains(&("file".to_string(), Some("eye.png".to_string()))));
        assert!(fields.contains(&("patient_id".to_string(), None)));
    }

    #[tokio::test]
    async fn analyze_requires_patient() {
        let upload = ImageUpload::from_bytes("eye.png", png_bytes(8, 8), &Default::default()).unwrap();
        let err = client("http://127.0.0.1:9")
            .analyze(&session(), &upload, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Validation(ValidationError::NoPatient)));
    }

    #[tokio::test]
    async fn chat_streams_and_sends_context() {
        let seen: Arc<Mutex<HashMap<String, String>>> = Arc::default();
        let recorded = seen.clone();
        let app = Router::new().route(
            "/chat",
            post(move |headers: HeaderMap, mut multipart: Multipart| {
                let recorded = recorded.clone();
                async move {
                    let lang = headers
                        .get("accept-language")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    recorded.lock().unwrap().insert("lang".into(), lang);
                    while let Some(field) = multipart.next_field().await.unwrap() {
                        let name = field.name().unwrap_or_default().to_string();
                        let value = field.text().await.unwrap();
                        recorded.lock().unwrap().insert(name, value);
                    }
                    // "é" split across two chunks
                    let chunks = vec![
                        Bytes::from_static(b"Risque \xC3"),
                        Bytes::from_static(b"\xA9lev\xC3\xA9."),
                    ];
                    Body::from_stream(futures_util::stream::iter(
                        chunks.into_iter().map(Ok::<_, std::io::Error>),
                    ))
                }
            }),
        );
        let base = serve(app).await;
        let client = client(&base);
        let record = AnalysisRecord::new(Classification::GlaucomaSuspected, 88.0, Utc::now());

        let mut pieces = Vec::new();
        let reply = client
            .chat(
                &session(),
                "Que faire ?",
                &[ChatMessage::assistant("Bonjour")],
                Some(&record),
                |p| pieces.push(p.to_string()),
            )
            .await
            .unwrap();

        assert_eq!(reply, "Risque élevé.");
        assert_eq!(pieces.concat(), reply);
        let seen = seen.lock().unwrap();
        assert_eq!(seen["message"], "Que faire ?");
        assert_eq!(seen["lang"], "fr");
        assert!(seen["history"].contains("Bonjour"));
        assert!(seen["analysis_context"].contains("glaucoma_suspected"));
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let app = Router::new().route(
            "/chat/guide",
            post(|| async {
                (
                    axum::http::StatusCode::TOO_MANY_REQUESTS,
                    [("retry-after", "30")],
                    "quota",
                )
            }),
        );
        let base = serve(app).await;
        let err = client(&base)
            .guide(&Session::anonymous(Locale::En), "help", &[], |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::RateLimited { retry_after: Some(30) }));
    }

    #[tokio::test]
    async fn server_error_detail_is_kept_for_logs() {
        let app = Router::new().route(
            "/history",
            get(|| async {
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"detail": "db down"})),
                )
            }),
        );
        let base = serve(app).await;
        let err = client(&base).history(&session()).await.unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 500, ref detail } if detail == "db down"));
    }

    #[test]
    fn decoder_joins_split_sequences() {
        let mut decoder = Utf8StreamDecoder::default();
        assert_eq!(decoder.push(b"caf\xC3"), "caf");
        assert_eq!(decoder.push(b"\xA9 \xF0\x9F"), "é ");
        assert_eq!(decoder.push(b"\x91\x81"), "👁");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8StreamDecoder::default();
        assert_eq!(decoder.push(b"a\xFFb"), "a\u{FFFD}b");
        assert_eq!(decoder.push(b"\xE2\x82"), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }
}
