//! reqwest implementation of [`Backend`] against the sidecar HTTP service.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use quill_types::{FileListing, ProjectDir, RelPath, UserConfig};

use crate::{Backend, BackendFut, GatewayError, HealthInfo};

const CONNECT_TIMEOUT_SECS: u64 = 5;
const POOL_MAX_IDLE_PER_HOST: usize = 4;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

/// The `{success, data, detail}` envelope wrapping most backend payloads.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FilesData {
    files: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ContentData {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ConfigData {
    config: UserConfig,
}

#[derive(Debug, Deserialize)]
struct ChatData {
    response: String,
}

/// Compile results carry the build tool's output instead of a detail string.
#[derive(Debug, Default, Deserialize)]
struct CompileData {
    #[serde(default)]
    stdout: Option<String>,
    #[serde(default)]
    stderr: Option<String>,
}

impl CompileData {
    /// The diagnostic a failed build surfaces to the user. latexmk writes its
    /// errors to stdout, so stderr alone is not enough.
    fn diagnostic(self) -> String {
        match (self.stderr, self.stdout) {
            (Some(err), _) if !err.trim().is_empty() => err,
            (_, Some(out)) if !out.trim().is_empty() => out,
            _ => "build failed".to_owned(),
        }
    }
}

/// Error body FastAPI attaches to non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

/// [`Backend`] implementation speaking HTTP to the local backend process.
///
/// Holds only the reqwest connection pool; every call is a single request
/// with no retries. Construct one per backend address and share it.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Build a client for the backend at `base_url`.
    ///
    /// The builder mirrors our provider clients minus TLS enforcement: the
    /// backend is a loopback sidecar and speaks plain HTTP.
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
            .build()?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { client, base_url })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    /// Decode an enveloped response, mapping HTTP and envelope failures to
    /// [`GatewayError`].
    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            return Err(Self::status_error(status, response).await);
        }

        let body = response.text().await?;
        let envelope: Envelope<T> = serde_json::from_str(&body)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        if !envelope.success {
            return Err(GatewayError::Api {
                detail: envelope
                    .detail
                    .unwrap_or_else(|| "backend reported failure".to_owned()),
            });
        }
        envelope
            .data
            .ok_or_else(|| GatewayError::InvalidResponse("missing data field".to_owned()))
    }

    async fn status_error(status: StatusCode, response: reqwest::Response) -> GatewayError {
        if status == StatusCode::NOT_FOUND {
            return GatewayError::NotFound;
        }
        match response.json::<ErrorBody>().await {
            Ok(body) => GatewayError::Api {
                detail: body.detail,
            },
            Err(_) => GatewayError::Api {
                detail: format!("backend returned HTTP {status}"),
            },
        }
    }
}

/// Race a gateway call against its cancellation token.
///
/// Settles as [`GatewayError::Cancelled`] the moment the token fires, even
/// when the underlying request would eventually have succeeded. Callers rely
/// on this to tell "superseded" apart from "backend said no".
async fn with_cancel<T>(
    cancel: CancellationToken,
    fut: impl Future<Output = Result<T, GatewayError>>,
) -> Result<T, GatewayError> {
    tokio::select! {
        () = cancel.cancelled() => Err(GatewayError::Cancelled),
        result = fut => result,
    }
}

impl Backend for HttpBackend {
    fn health<'a>(&'a self, cancel: CancellationToken) -> BackendFut<'a, HealthInfo> {
        Box::pin(with_cancel(cancel, async move {
            // /health is the one endpoint without the envelope.
            let response = self.client.get(self.url("/health")).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(Self::status_error(status, response).await);
            }
            response
                .json::<HealthInfo>()
                .await
                .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
        }))
    }

    fn list_files<'a>(
        &'a self,
        dir: &'a ProjectDir,
        cancel: CancellationToken,
    ) -> BackendFut<'a, FileListing> {
        Box::pin(with_cancel(cancel, async move {
            let response = self
                .client
                .get(self.url("/files"))
                .query(&[("dir", dir.to_string())])
                .send()
                .await?;
            let data: FilesData = Self::decode(response).await?;
            Ok(FileListing::new(data.files))
        }))
    }

    fn read_file<'a>(
        &'a self,
        dir: &'a ProjectDir,
        path: &'a RelPath,
        cancel: CancellationToken,
    ) -> BackendFut<'a, String> {
        Box::pin(with_cancel(cancel, async move {
            let response = self
                .client
                .get(self.url("/file"))
                .query(&[("dir", dir.to_string()), ("path", path.to_string())])
                .send()
                .await?;
            let data: ContentData = Self::decode(response).await?;
            Ok(data.content)
        }))
    }

    fn write_file<'a>(
        &'a self,
        dir: &'a ProjectDir,
        path: &'a RelPath,
        content: &'a str,
        cancel: CancellationToken,
    ) -> BackendFut<'a, ()> {
        Box::pin(with_cancel(cancel, async move {
            let response = self
                .client
                .post(self.url("/file"))
                .json(&json!({
                    "dir": dir.to_string(),
                    "path": path.as_str(),
                    "content": content,
                }))
                .send()
                .await?;
            Self::decode::<serde_json::Value>(response).await?;
            Ok(())
        }))
    }

    fn init_project<'a>(
        &'a self,
        dir: &'a ProjectDir,
        template: &'a str,
        cancel: CancellationToken,
    ) -> BackendFut<'a, ()> {
        Box::pin(with_cancel(cancel, async move {
            let response = self
                .client
                .post(self.url("/init"))
                .json(&json!({ "dir": dir.to_string(), "template": template }))
                .send()
                .await?;
            Self::decode::<serde_json::Value>(response).await?;
            Ok(())
        }))
    }

    fn compile<'a>(
        &'a self,
        dir: &'a ProjectDir,
        cancel: CancellationToken,
    ) -> BackendFut<'a, ()> {
        Box::pin(with_cancel(cancel, async move {
            let response = self
                .client
                .post(self.url("/compile"))
                .json(&json!({ "dir": dir.to_string() }))
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(Self::status_error(status, response).await);
            }

            // Unlike the other endpoints, a failed compile still answers 200;
            // the envelope's success flag carries the verdict and the build
            // tool's output stands in for the detail string.
            let body = response.text().await?;
            let envelope: Envelope<CompileData> = serde_json::from_str(&body)
                .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
            if envelope.success {
                return Ok(());
            }
            let detail = match envelope.detail {
                Some(detail) => detail,
                None => envelope.data.unwrap_or_default().diagnostic(),
            };
            Err(GatewayError::Api { detail })
        }))
    }

    fn fetch_artifact<'a>(
        &'a self,
        dir: &'a ProjectDir,
        cancel: CancellationToken,
    ) -> BackendFut<'a, Vec<u8>> {
        Box::pin(with_cancel(cancel, async move {
            let response = self
                .client
                .get(self.url("/pdf"))
                .query(&[("dir", dir.to_string())])
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(Self::status_error(status, response).await);
            }
            Ok(response.bytes().await?.to_vec())
        }))
    }

    fn get_config<'a>(&'a self, cancel: CancellationToken) -> BackendFut<'a, UserConfig> {
        Box::pin(with_cancel(cancel, async move {
            let response = self.client.get(self.url("/config")).send().await?;
            let data: ConfigData = Self::decode(response).await?;
            Ok(data.config)
        }))
    }

    fn update_config<'a>(
        &'a self,
        updates: &'a UserConfig,
        cancel: CancellationToken,
    ) -> BackendFut<'a, UserConfig> {
        Box::pin(with_cancel(cancel, async move {
            let response = self
                .client
                .post(self.url("/config"))
                .json(updates)
                .send()
                .await?;
            let data: ConfigData = Self::decode(response).await?;
            Ok(data.config)
        }))
    }

    fn reset_config<'a>(&'a self, cancel: CancellationToken) -> BackendFut<'a, ()> {
        Box::pin(with_cancel(cancel, async move {
            let response = self.client.post(self.url("/nuke")).send().await?;
            Self::decode::<serde_json::Value>(response).await?;
            Ok(())
        }))
    }

    fn chat<'a>(
        &'a self,
        dir: &'a ProjectDir,
        query: &'a str,
        cancel: CancellationToken,
    ) -> BackendFut<'a, String> {
        Box::pin(with_cancel(cancel, async move {
            let response = self
                .client
                .post(self.url("/chat"))
                .json(&json!({ "dir": dir.to_string(), "query": query }))
                .send()
                .await?;
            let data: ChatData = Self::decode(response).await?;
            Ok(data.response)
        }))
    }
}

#[cfg(test)]
mod integration_tests {
    use std::time::Duration;

    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn backend_for(server: &MockServer) -> HttpBackend {
        HttpBackend::new(server.uri()).expect("client builds")
    }

    #[tokio::test]
    async fn health_decodes_flat_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "version": "0.3.1",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let info = backend
            .health(CancellationToken::new())
            .await
            .expect("health succeeds");
        assert_eq!(info.status, "ok");
        assert_eq!(info.version, "0.3.1");
    }

    #[tokio::test]
    async fn list_files_unwraps_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .and(query_param("dir", "/p"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": { "files": ["main.tex", "refs.bib"] },
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let dir = ProjectDir::new("/p");
        let listing = backend
            .list_files(&dir, CancellationToken::new())
            .await
            .expect("listing succeeds");
        assert!(listing.contains("main.tex"));
        assert!(listing.contains("refs.bib"));
        assert_eq!(listing.len(), 2);
    }

    #[tokio::test]
    async fn envelope_failure_surfaces_detail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "detail": "directory does not exist",
            })))
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let dir = ProjectDir::new("/missing");
        let err = backend
            .list_files(&dir, CancellationToken::new())
            .await
            .expect_err("listing fails");
        match err {
            GatewayError::Api { detail } => assert_eq!(detail, "directory does not exist"),
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_error_body_becomes_api_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/init"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(serde_json::json!({ "detail": "permission denied" })),
            )
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let dir = ProjectDir::new("/p");
        let err = backend
            .init_project(&dir, "default", CancellationToken::new())
            .await
            .expect_err("init fails");
        match err {
            GatewayError::Api { detail } => assert_eq!(detail, "permission denied"),
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_artifact_maps_404_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pdf"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({ "detail": "main.pdf not found" })),
            )
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let dir = ProjectDir::new("/p");
        let err = backend
            .fetch_artifact(&dir, CancellationToken::new())
            .await
            .expect_err("fetch fails");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn fetch_artifact_returns_raw_bytes() {
        let server = MockServer::start().await;
        let pdf = vec![0x25, 0x50, 0x44, 0x46, 0x2d];
        Mock::given(method("GET"))
            .and(path("/pdf"))
            .and(query_param("dir", "/p"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf.clone()))
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let dir = ProjectDir::new("/p");
        let bytes = backend
            .fetch_artifact(&dir, CancellationToken::new())
            .await
            .expect("fetch succeeds");
        assert_eq!(bytes, pdf);
    }

    #[tokio::test]
    async fn failed_compile_carries_build_diagnostic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/compile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "data": {
                    "stdout": "! Undefined control sequence.\nl.4 \\foo",
                    "stderr": "",
                },
            })))
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let dir = ProjectDir::new("/p");
        let err = backend
            .compile(&dir, CancellationToken::new())
            .await
            .expect_err("compile fails");
        match err {
            GatewayError::Api { detail } => assert!(detail.contains("Undefined control sequence")),
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn write_file_posts_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/file"))
            .and(body_json(serde_json::json!({
                "dir": "/p",
                "path": "main.tex",
                "content": "\\documentclass{article}",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": { "message": "written" },
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let dir = ProjectDir::new("/p");
        let file = RelPath::new("main.tex").unwrap();
        backend
            .write_file(
                &dir,
                &file,
                "\\documentclass{article}",
                CancellationToken::new(),
            )
            .await
            .expect("write succeeds");
    }

    #[tokio::test]
    async fn cancelled_call_settles_as_cancelled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(30))
                    .set_body_json(serde_json::json!({
                        "success": true,
                        "data": { "files": [] },
                    })),
            )
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let dir = ProjectDir::new("/p");
        let cancel = CancellationToken::new();

        let call = backend.list_files(&dir, cancel.clone());
        cancel.cancel();
        let err = call.await.expect_err("call settles as cancelled");
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn config_roundtrip_uses_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/config"))
            .and(body_json(serde_json::json!({ "full_name": "Ada" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": { "config": { "full_name": "Ada" } },
            })))
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let updates = UserConfig {
            full_name: Some("Ada".to_owned()),
            ..UserConfig::default()
        };
        let merged = backend
            .update_config(&updates, CancellationToken::new())
            .await
            .expect("update succeeds");
        assert_eq!(merged.full_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn chat_returns_assistant_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .and(body_json(serde_json::json!({
                "dir": "/p",
                "query": "shorten the abstract",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": { "response": "Done - trimmed to four sentences." },
            })))
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let dir = ProjectDir::new("/p");
        let reply = backend
            .chat(&dir, "shorten the abstract", CancellationToken::new())
            .await
            .expect("chat succeeds");
        assert!(reply.starts_with("Done"));
    }
}
