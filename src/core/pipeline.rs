use crate::core::report;
use crate::domain::model::{DiffResult, Snapshot};
use crate::domain::ports::{ConfigProvider, Notifier, Pipeline, Storage};
use crate::utils::error::{MonitorError, Result};
use chrono::Utc;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// 入口網站的回應信封：{"status": "success", "data": {...}}
#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

pub struct PortalPipeline<S: Storage, C: ConfigProvider> {
    storage: S,
    config: C,
    client: Client,
    notifier: Box<dyn Notifier>,
}

impl<S: Storage, C: ConfigProvider> PortalPipeline<S, C> {
    pub fn new(storage: S, config: C, notifier: Box<dyn Notifier>) -> Self {
        Self {
            storage,
            config,
            client: Client::new(),
            notifier,
        }
    }

    /// One authenticated portal call with retry. Credentials ride in the JSON
    /// body alongside any endpoint parameters.
    ///
    /// Returns `Ok(None)` when the portal kept answering unsuccessfully after
    /// all attempts; callers decide whether that is tolerable. Rejected
    /// credentials and an unreachable endpoint are hard errors.
    async fn request(
        &self,
        endpoint: &str,
        params: Option<serde_json::Map<String, Value>>,
    ) -> Result<Option<Value>> {
        let url = format!(
            "{}/{}",
            self.config.api_endpoint().trim_end_matches('/'),
            endpoint
        );

        let mut body = serde_json::Map::new();
        body.insert(
            "username".to_string(),
            Value::String(self.config.username().to_string()),
        );
        body.insert(
            "password".to_string(),
            Value::String(self.config.password().to_string()),
        );
        if let Some(params) = params {
            body.extend(params);
        }

        let attempts = self.config.retry_attempts().max(1);
        let mut last_failure = String::new();

        for attempt in 1..=attempts {
            tracing::debug!("📡 Fetching {} (attempt {}/{})", endpoint, attempt, attempts);

            match self
                .client
                .post(&url)
                .timeout(self.config.request_timeout())
                .json(&body)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();

                    // 憑證被拒絕就不用重試了
                    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                        return Err(MonitorError::AuthError {
                            message: format!(
                                "portal rejected credentials for '{}' (HTTP {})",
                                endpoint,
                                status.as_u16()
                            ),
                        });
                    }

                    if status.is_success() {
                        match response.json::<Envelope>().await {
                            Ok(envelope) if envelope.status == "success" => {
                                return Ok(Some(
                                    envelope
                                        .data
                                        .unwrap_or_else(|| Value::Object(Default::default())),
                                ));
                            }
                            Ok(envelope) => {
                                last_failure = envelope
                                    .message
                                    .unwrap_or_else(|| format!("status '{}'", envelope.status));
                                tracing::warn!("❌ Portal error for {}: {}", endpoint, last_failure);
                            }
                            Err(e) => {
                                last_failure = format!("unparseable response: {}", e);
                                tracing::warn!("❌ Portal error for {}: {}", endpoint, last_failure);
                            }
                        }
                    } else {
                        last_failure = format!("HTTP {}", status.as_u16());
                        tracing::warn!("❌ Portal error for {}: {}", endpoint, last_failure);
                    }
                }
                Err(e) => {
                    if attempt == attempts {
                        return Err(MonitorError::NetworkError(e));
                    }
                    last_failure = e.to_string();
                    tracing::warn!("❌ Request error for {}: {}", endpoint, last_failure);
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.config.retry_delay()).await;
            }
        }

        tracing::warn!(
            "⚠️ Giving up on {} after {} attempts: {}",
            endpoint,
            attempts,
            last_failure
        );
        Ok(None)
    }

    async fn fetch_summary(&self) -> Result<BTreeMap<String, Option<Value>>> {
        tracing::info!("🔍 Fetching summary data...");

        let mut summaries = BTreeMap::new();
        for (index, section) in self.config.sections().iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.request_delay()).await;
            }
            let data = self.request(section, None).await?;
            summaries.insert(section.clone(), data);
        }
        Ok(summaries)
    }

    /// Fetch one detail endpoint and record it under `field`. Per-item failures
    /// are logged and skipped so one broken course does not lose the whole run;
    /// only rejected credentials abort.
    async fn fetch_detail(
        &self,
        snapshot: &mut Snapshot,
        endpoint: &str,
        field: String,
        param_key: &str,
        param_value: Value,
    ) -> Result<()> {
        tokio::time::sleep(self.config.request_delay()).await;

        let mut params = serde_json::Map::new();
        params.insert(param_key.to_string(), param_value);

        match self.request(endpoint, Some(params)).await {
            Ok(Some(data)) => {
                tracing::info!("✅ Fetched {}", field);
                snapshot.insert(field, data);
            }
            Ok(None) => tracing::warn!("⚠️ No data for {}", field),
            Err(e @ MonitorError::AuthError { .. }) => return Err(e),
            Err(e) => tracing::warn!("❌ Error fetching {}: {}", field, e),
        }
        Ok(())
    }
}

/// Course codes advertised by the grades/attendance summaries
/// (`available_courses`, either plain strings or objects with a `code`).
fn extract_courses(summaries: &BTreeMap<String, Option<Value>>) -> Vec<String> {
    let mut courses = BTreeSet::new();

    for section in ["grades", "attendance"] {
        let Some(Some(data)) = summaries.get(section) else {
            continue;
        };
        let Some(list) = data.get("available_courses").and_then(Value::as_array) else {
            continue;
        };
        for course in list {
            match course {
                Value::String(code) => {
                    courses.insert(code.clone());
                }
                Value::Object(obj) => {
                    if let Some(code) = obj.get("code").and_then(Value::as_str) {
                        courses.insert(code.to_string());
                    }
                }
                _ => {}
            }
        }
    }

    courses.into_iter().collect()
}

/// Transcript years (`available_years`, objects with `text` and `value`),
/// keeping only entries whose text mentions a year >= `min_year`.
fn extract_years(summaries: &BTreeMap<String, Option<Value>>, min_year: i32) -> Vec<(String, Value)> {
    let Some(Some(data)) = summaries.get("transcript") else {
        return Vec::new();
    };
    let Some(list) = data.get("available_years").and_then(Value::as_array) else {
        return Vec::new();
    };

    let year_pattern = Regex::new(r"\d{4}").unwrap();

    let mut years = Vec::new();
    for entry in list {
        let Value::Object(obj) = entry else { continue };
        let text = obj.get("text").and_then(Value::as_str).unwrap_or_default();
        let Some(value) = obj.get("value") else {
            continue;
        };

        let admitted = year_pattern
            .find_iter(text)
            .filter_map(|m| m.as_str().parse::<i32>().ok())
            .any(|year| year >= min_year);
        if admitted {
            years.push((text.to_string(), value.clone()));
        }
    }
    years
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for PortalPipeline<S, C> {
    async fn fetch(&self) -> Result<Snapshot> {
        let mut snapshot = Snapshot::new(Utc::now());

        // 第一階段：各區段的摘要
        let summaries = self.fetch_summary().await?;
        if summaries.values().all(Option::is_none) {
            return Err(MonitorError::PortalError {
                endpoint: self.config.api_endpoint().to_string(),
                message: format!(
                    "none of the {} watched sections returned data after retries",
                    summaries.len()
                ),
            });
        }

        let courses = extract_courses(&summaries);
        let years = extract_years(&summaries, self.config.min_transcript_year());
        tracing::info!(
            "📚 Found {} courses and {} transcript years",
            courses.len(),
            years.len()
        );

        if courses.is_empty() {
            return Err(MonitorError::AuthError {
                message: "no courses found in portal summaries; check credentials".to_string(),
            });
        }

        for (section, data) in &summaries {
            if let Some(data) = data {
                snapshot.insert(format!("summary/{}", section), data.clone());
            }
        }

        // 第二階段：逐一抓取課程與學年的明細
        tracing::info!("📊 Fetching detailed grades for {} courses...", courses.len());
        for course in &courses {
            self.fetch_detail(
                &mut snapshot,
                "grades",
                format!("grades/{}", course),
                "course_code",
                Value::String(course.clone()),
            )
            .await?;
        }

        tracing::info!(
            "📅 Fetching detailed attendance for {} courses...",
            courses.len()
        );
        for course in &courses {
            self.fetch_detail(
                &mut snapshot,
                "attendance",
                format!("attendance/{}", course),
                "course_code",
                Value::String(course.clone()),
            )
            .await?;
        }

        tracing::info!("🎓 Fetching detailed transcripts for {} years...", years.len());
        for (text, value) in &years {
            self.fetch_detail(
                &mut snapshot,
                "transcript",
                format!("transcript/{}", text),
                "year_value",
                value.clone(),
            )
            .await?;
        }

        tracing::info!("📦 Snapshot complete: {} fields", snapshot.len());
        Ok(snapshot)
    }

    async fn load_previous(&self) -> Result<Option<Snapshot>> {
        match self.storage.read_file(self.config.state_file()).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                tracing::debug!(
                    "Loaded previous snapshot from {} ({} fields)",
                    self.config.state_file(),
                    snapshot.len()
                );
                Ok(Some(snapshot))
            }
            Err(MonitorError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("🆕 No previous snapshot found - this is the first run");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn notify(&self, diff: &DiffResult) -> Result<()> {
        let report = report::build_report(diff, Utc::now(), self.config.api_endpoint());
        self.notifier.notify(&report).await
    }

    async fn persist(&self, snapshot: &Snapshot) -> Result<String> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        self.storage
            .write_file(self.config.state_file(), &bytes)
            .await?;
        tracing::info!("💾 Snapshot saved to {}", self.config.state_file());
        Ok(self.config.state_file().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{ChangeReport, FieldChange};
    use httpmock::prelude::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[derive(Clone)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        fn new() -> Self {
            Self {
                files: Arc::new(Mutex::new(HashMap::new())),
            }
        }

        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned()
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                MonitorError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }
    }

    struct MockConfig {
        api_endpoint: String,
        sections: Vec<String>,
        retry_attempts: u32,
        min_year: i32,
    }

    impl MockConfig {
        fn new(api_endpoint: String) -> Self {
            Self {
                api_endpoint,
                sections: vec![
                    "grades".to_string(),
                    "attendance".to_string(),
                    "transcript".to_string(),
                ],
                retry_attempts: 1,
                min_year: 2022,
            }
        }
    }

    impl ConfigProvider for MockConfig {
        fn api_endpoint(&self) -> &str {
            &self.api_endpoint
        }

        fn username(&self) -> &str {
            "alice"
        }

        fn password(&self) -> &str {
            "secret"
        }

        fn sections(&self) -> &[String] {
            &self.sections
        }

        fn state_file(&self) -> &str {
            "previous_data.json"
        }

        fn request_timeout(&self) -> Duration {
            Duration::from_secs(5)
        }

        fn retry_attempts(&self) -> u32 {
            self.retry_attempts
        }

        fn retry_delay(&self) -> Duration {
            Duration::ZERO
        }

        fn request_delay(&self) -> Duration {
            Duration::ZERO
        }

        fn min_transcript_year(&self) -> i32 {
            self.min_year
        }
    }

    #[derive(Clone)]
    struct MockNotifier {
        subjects: Arc<Mutex<Vec<String>>>,
    }

    impl MockNotifier {
        fn new() -> Self {
            Self {
                subjects: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait::async_trait]
    impl Notifier for MockNotifier {
        async fn notify(&self, report: &ChangeReport) -> Result<()> {
            let mut subjects = self.subjects.lock().await;
            subjects.push(report.subject.clone());
            Ok(())
        }
    }

    fn credentials() -> serde_json::Value {
        json!({"username": "alice", "password": "secret"})
    }

    fn with_course(course: &str) -> serde_json::Value {
        json!({"username": "alice", "password": "secret", "course_code": course})
    }

    fn pipeline_for(server: &MockServer) -> PortalPipeline<MockStorage, MockConfig> {
        PortalPipeline::new(
            MockStorage::new(),
            MockConfig::new(server.url("")),
            Box::new(MockNotifier::new()),
        )
    }

    #[tokio::test]
    async fn test_fetch_builds_snapshot_from_portal_data() {
        let server = MockServer::start();

        let grades_summary = server.mock(|when, then| {
            when.method(POST).path("/grades").json_body(credentials());
            then.status(200).json_body(json!({
                "status": "success",
                "data": {"available_courses": [{"code": "CSEN701"}]}
            }));
        });
        let attendance_summary = server.mock(|when, then| {
            when.method(POST).path("/attendance").json_body(credentials());
            then.status(200).json_body(json!({
                "status": "success",
                "data": {"available_courses": [{"code": "CSEN701"}]}
            }));
        });
        let transcript_summary = server.mock(|when, then| {
            when.method(POST).path("/transcript").json_body(credentials());
            then.status(200).json_body(json!({
                "status": "success",
                "data": {"available_years": [
                    {"text": "Winter 2024", "value": "W24"},
                    {"text": "Winter 2019", "value": "W19"}
                ]}
            }));
        });

        let grades_detail = server.mock(|when, then| {
            when.method(POST)
                .path("/grades")
                .json_body(with_course("CSEN701"));
            then.status(200).json_body(json!({
                "status": "success",
                "data": {"detailed_grades": [{"name": "Quiz 1", "grade": "9/10"}]}
            }));
        });
        let attendance_detail = server.mock(|when, then| {
            when.method(POST)
                .path("/attendance")
                .json_body(with_course("CSEN701"));
            then.status(200).json_body(json!({
                "status": "success",
                "data": {"detailed_attendance": [{"week": 1, "status": "present"}]}
            }));
        });
        let transcript_detail = server.mock(|when, then| {
            when.method(POST).path("/transcript").json_body(json!({
                "username": "alice", "password": "secret", "year_value": "W24"
            }));
            then.status(200).json_body(json!({
                "status": "success",
                "data": {"gpa": 3.31, "transcript_data": []}
            }));
        });

        let pipeline = pipeline_for(&server);
        let snapshot = pipeline.fetch().await.unwrap();

        grades_summary.assert();
        attendance_summary.assert();
        transcript_summary.assert();
        grades_detail.assert();
        attendance_detail.assert();
        transcript_detail.assert();

        assert!(snapshot.get("summary/grades").is_some());
        assert!(snapshot.get("summary/attendance").is_some());
        assert!(snapshot.get("summary/transcript").is_some());
        assert!(snapshot.get("grades/CSEN701").is_some());
        assert!(snapshot.get("attendance/CSEN701").is_some());
        assert!(snapshot.get("transcript/Winter 2024").is_some());
        // 2019 低於 min_year，不應該抓
        assert!(snapshot.get("transcript/Winter 2019").is_none());
        assert_eq!(snapshot.len(), 6);
    }

    #[tokio::test]
    async fn test_unauthorized_fails_fast_with_auth_error() {
        let server = MockServer::start();

        let rejected = server.mock(|when, then| {
            when.method(POST).path("/grades");
            then.status(401);
        });

        let pipeline = pipeline_for(&server);
        let err = pipeline.fetch().await.unwrap_err();

        assert!(matches!(err, MonitorError::AuthError { .. }), "got {:?}", err);
        // 401 不重試
        rejected.assert_hits(1);
    }

    #[tokio::test]
    async fn test_error_envelope_is_retried_then_run_fails() {
        let server = MockServer::start();

        let failing = server.mock(|when, then| {
            when.method(POST);
            then.status(200)
                .json_body(json!({"status": "error", "message": "maintenance window"}));
        });

        let storage = MockStorage::new();
        let mut config = MockConfig::new(server.url(""));
        config.retry_attempts = 3;
        config.sections = vec!["grades".to_string()];
        let pipeline = PortalPipeline::new(storage, config, Box::new(MockNotifier::new()));

        let err = pipeline.fetch().await.unwrap_err();

        assert!(matches!(err, MonitorError::PortalError { .. }), "got {:?}", err);
        failing.assert_hits(3);
    }

    #[tokio::test]
    async fn test_empty_summaries_mean_credential_problem() {
        let server = MockServer::start();

        server.mock(|when, then| {
            when.method(POST);
            then.status(200)
                .json_body(json!({"status": "success", "data": {"available_courses": []}}));
        });

        let pipeline = pipeline_for(&server);
        let err = pipeline.fetch().await.unwrap_err();

        assert!(matches!(err, MonitorError::AuthError { .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_broken_detail_endpoint_is_skipped() {
        let server = MockServer::start();

        server.mock(|when, then| {
            when.method(POST).path("/grades").json_body(credentials());
            then.status(200).json_body(json!({
                "status": "success",
                "data": {"available_courses": ["CSEN701"]}
            }));
        });
        server.mock(|when, then| {
            when.method(POST).path("/attendance").json_body(credentials());
            then.status(200)
                .json_body(json!({"status": "success", "data": {}}));
        });
        server.mock(|when, then| {
            when.method(POST).path("/transcript").json_body(credentials());
            then.status(200)
                .json_body(json!({"status": "success", "data": {}}));
        });
        // 明細端點壞掉
        server.mock(|when, then| {
            when.method(POST)
                .path("/grades")
                .json_body(with_course("CSEN701"));
            then.status(500);
        });
        server.mock(|when, then| {
            when.method(POST)
                .path("/attendance")
                .json_body(with_course("CSEN701"));
            then.status(500);
        });

        let pipeline = pipeline_for(&server);
        let snapshot = pipeline.fetch().await.unwrap();

        assert!(snapshot.get("summary/grades").is_some());
        assert!(snapshot.get("grades/CSEN701").is_none());
        assert!(snapshot.get("attendance/CSEN701").is_none());
    }

    #[tokio::test]
    async fn test_persist_then_load_previous_round_trip() {
        let server = MockServer::start();
        let storage = MockStorage::new();
        let pipeline = PortalPipeline::new(
            storage.clone(),
            MockConfig::new(server.url("")),
            Box::new(MockNotifier::new()),
        );

        assert!(pipeline.load_previous().await.unwrap().is_none());

        let mut snapshot = Snapshot::new(Utc::now());
        snapshot.insert("summary/grades", json!({"courses": 2}));
        let path = pipeline.persist(&snapshot).await.unwrap();
        assert_eq!(path, "previous_data.json");
        assert!(storage.get_file("previous_data.json").await.is_some());

        let restored = pipeline.load_previous().await.unwrap().unwrap();
        assert_eq!(restored.get("summary/grades"), Some(&json!({"courses": 2})));
    }

    #[tokio::test]
    async fn test_corrupt_state_file_is_an_error() {
        let server = MockServer::start();
        let storage = MockStorage::new();
        storage
            .write_file("previous_data.json", b"not json at all")
            .await
            .unwrap();

        let pipeline = PortalPipeline::new(
            storage,
            MockConfig::new(server.url("")),
            Box::new(MockNotifier::new()),
        );

        let err = pipeline.load_previous().await.unwrap_err();
        assert!(matches!(err, MonitorError::SerializationError(_)));
    }

    #[tokio::test]
    async fn test_notify_delegates_to_notifier() {
        let server = MockServer::start();
        let notifier = MockNotifier::new();
        let pipeline = PortalPipeline::new(
            MockStorage::new(),
            MockConfig::new(server.url("")),
            Box::new(notifier.clone()),
        );

        let diff = DiffResult {
            changes: vec![FieldChange {
                field: "status".to_string(),
                old: Some(json!("open")),
                new: Some(json!("closed")),
            }],
        };
        pipeline.notify(&diff).await.unwrap();

        let subjects = notifier.subjects.lock().await;
        assert_eq!(subjects.len(), 1);
        assert!(subjects[0].contains("1 change(s)"));
    }

    #[test]
    fn test_extract_courses_accepts_strings_and_objects() {
        let mut summaries = BTreeMap::new();
        summaries.insert(
            "grades".to_string(),
            Some(json!({"available_courses": ["CSEN701", {"code": "CSEN702"}, 42]})),
        );
        summaries.insert(
            "attendance".to_string(),
            Some(json!({"available_courses": [{"code": "CSEN701"}]})),
        );

        let courses = extract_courses(&summaries);
        assert_eq!(courses, vec!["CSEN701".to_string(), "CSEN702".to_string()]);
    }

    #[test]
    fn test_extract_years_filters_by_min_year() {
        let mut summaries = BTreeMap::new();
        summaries.insert(
            "transcript".to_string(),
            Some(json!({"available_years": [
                {"text": "Winter 2024", "value": "W24"},
                {"text": "Winter 2019", "value": "W19"},
                {"text": "no year here", "value": "X"}
            ]})),
        );

        let years = extract_years(&summaries, 2022);
        assert_eq!(years.len(), 1);
        assert_eq!(years[0].0, "Winter 2024");
        assert_eq!(years[0].1, json!("W24"));
    }
}
