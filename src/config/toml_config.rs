use crate::domain::ports::ConfigProvider;
use crate::utils::error::{MonitorError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_SECTIONS: [&str; 3] = ["grades", "attendance", "transcript"];
const DEFAULT_STATE_FILE: &str = "previous_data.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub monitor: MonitorInfo,
    pub portal: PortalConfig,
    pub transcript: Option<TranscriptConfig>,
    pub state: StateConfig,
    pub email: Option<EmailConfig>,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorInfo {
    pub name: String,
    pub description: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub sections: Option<Vec<String>>,
    pub timeout_seconds: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_seconds: Option<u64>,
    pub request_delay_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptConfig {
    pub min_year: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    pub path: String,
    pub file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: Option<u16>,
    pub from: String,
    pub to: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

impl MonitorConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(MonitorError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content)?;

        let mut config: MonitorConfig =
            toml::from_str(&processed_content).map_err(|e| MonitorError::ConfigValidationError {
                field: "toml_parsing".to_string(),
                message: format!("TOML parsing error: {}", e),
            })?;

        // 沒寫 sections 就監看預設的三個區段
        if config.portal.sections.is_none() {
            config.portal.sections =
                Some(DEFAULT_SECTIONS.iter().map(|s| s.to_string()).collect());
        }

        Ok(config)
    }

    /// 替換環境變數 (例如 ${PORTAL_PASSWORD})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").unwrap();

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_url("portal.endpoint", &self.portal.endpoint)?;

        validation::validate_non_empty_string("portal.username", &self.portal.username)?;
        validation::validate_resolved("portal.username", &self.portal.username)?;
        validation::validate_non_empty_string("portal.password", &self.portal.password)?;
        validation::validate_resolved("portal.password", &self.portal.password)?;

        validation::validate_path("state.path", &self.state.path)?;
        if let Some(file) = &self.state.file {
            validation::validate_non_empty_string("state.file", file)?;
        }

        if let Some(attempts) = self.portal.retry_attempts {
            validation::validate_positive_number("portal.retry_attempts", attempts as usize, 1)?;
        }

        if let Some(sections) = &self.portal.sections {
            if sections.is_empty() {
                return Err(MonitorError::InvalidConfigValueError {
                    field: "portal.sections".to_string(),
                    value: "[]".to_string(),
                    reason: "At least one watched section is required".to_string(),
                });
            }
        }

        if let Some(transcript) = &self.transcript {
            if let Some(min_year) = transcript.min_year {
                validation::validate_range("transcript.min_year", min_year, 2000, 2100)?;
            }
        }

        if let Some(email) = &self.email {
            if email.enabled {
                validation::validate_non_empty_string("email.smtp_host", &email.smtp_host)?;
                if let Some(port) = email.smtp_port {
                    validation::validate_range("email.smtp_port", port, 1, u16::MAX)?;
                }
                validation::validate_non_empty_string("email.from", &email.from)?;
                validation::validate_resolved("email.from", &email.from)?;
                validation::validate_non_empty_string("email.password", &email.password)?;
                validation::validate_resolved("email.password", &email.password)?;
                if let Some(to) = &email.to {
                    validation::validate_non_empty_string("email.to", to)?;
                }
            }
        }

        Ok(())
    }

    /// 狀態檔所在目錄
    pub fn state_path(&self) -> &str {
        &self.state.path
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn email_enabled(&self) -> bool {
        self.email.as_ref().map(|e| e.enabled).unwrap_or(false)
    }
}

impl ConfigProvider for MonitorConfig {
    fn api_endpoint(&self) -> &str {
        &self.portal.endpoint
    }

    fn username(&self) -> &str {
        &self.portal.username
    }

    fn password(&self) -> &str {
        &self.portal.password
    }

    fn sections(&self) -> &[String] {
        self.portal.sections.as_deref().unwrap_or(&[])
    }

    fn state_file(&self) -> &str {
        self.state.file.as_deref().unwrap_or(DEFAULT_STATE_FILE)
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.portal.timeout_seconds.unwrap_or(30))
    }

    fn retry_attempts(&self) -> u32 {
        self.portal.retry_attempts.unwrap_or(3)
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.portal.retry_delay_seconds.unwrap_or(2))
    }

    fn request_delay(&self) -> Duration {
        Duration::from_secs(self.portal.request_delay_seconds.unwrap_or(1))
    }

    fn min_transcript_year(&self) -> i32 {
        self.transcript
            .as_ref()
            .and_then(|t| t.min_year)
            .unwrap_or(2022)
    }
}

impl Validate for MonitorConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
