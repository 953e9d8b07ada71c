use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment,
    parse_store_backend, parse_u16, parse_u32, parse_u64, parse_usize,
};
use super::types::{
    AiSettings, ApiSettings, AssessmentSettings, ConfigError, CorsSettings, DatabaseSettings,
    RuntimeSettings, ServerHost, ServerPort, ServerSettings, Settings, StoreBackend,
    TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("GRADEWISE_HOST", "0.0.0.0");
        let port = env_or_default("GRADEWISE_PORT", "8000");

        let environment = parse_environment(
            env_optional("GRADEWISE_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("GRADEWISE_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Gradewise API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "gradewise");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "gradewise_db");
        let database_url = env_optional("DATABASE_URL");

        let store = parse_store_backend(env_optional("GRADEWISE_STORE"))?;

        let expiry_sweep_interval_seconds = parse_u64(
            "EXPIRY_SWEEP_INTERVAL_SECONDS",
            env_or_default("EXPIRY_SWEEP_INTERVAL_SECONDS", "30"),
        )?;
        let max_bulk_import_rows =
            parse_usize("MAX_BULK_IMPORT_ROWS", env_or_default("MAX_BULK_IMPORT_ROWS", "1000"))?;
        let max_batch_grading_items = parse_usize(
            "MAX_BATCH_GRADING_ITEMS",
            env_or_default("MAX_BATCH_GRADING_ITEMS", "500"),
        )?;
        let default_max_attempts =
            parse_u32("DEFAULT_MAX_ATTEMPTS", env_or_default("DEFAULT_MAX_ATTEMPTS", "1"))?;

        let essay_assist_enabled =
            env_optional("ESSAY_ASSIST_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);
        let openai_api_key = env_or_default("OPENAI_API_KEY", "");
        let openai_base_url = env_or_default("OPENAI_BASE_URL", "");
        let ai_model = env_or_default("AI_MODEL", "gpt-4o-mini");
        let ai_max_tokens = parse_u32("AI_MAX_TOKENS", env_or_default("AI_MAX_TOKENS", "2000"))?;
        let ai_request_timeout =
            parse_u64("AI_REQUEST_TIMEOUT", env_or_default("AI_REQUEST_TIMEOUT", "120"))?;

        let log_level = env_or_default("GRADEWISE_LOG_LEVEL", "info");
        let json =
            env_optional("GRADEWISE_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            store,
            assessment: AssessmentSettings {
                expiry_sweep_interval_seconds,
                max_bulk_import_rows,
                max_batch_grading_items,
                default_max_attempts,
            },
            ai: AiSettings {
                essay_assist_enabled,
                openai_api_key,
                openai_base_url,
                ai_model,
                ai_max_tokens,
                ai_request_timeout,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn store(&self) -> StoreBackend {
        self.store
    }

    pub(crate) fn assessment(&self) -> &AssessmentSettings {
        &self.assessment
    }

    pub(crate) fn ai(&self) -> &AiSettings {
        &self.ai
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.assessment.expiry_sweep_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "EXPIRY_SWEEP_INTERVAL_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.assessment.max_bulk_import_rows == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_BULK_IMPORT_ROWS",
                value: "0".to_string(),
            });
        }

        if self.assessment.max_batch_grading_items == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_BATCH_GRADING_ITEMS",
                value: "0".to_string(),
            });
        }

        if self.assessment.default_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DEFAULT_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        if !self.api.api_v1_str.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "API_V1_STR",
                value: self.api.api_v1_str.clone(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.store == StoreBackend::Postgres
            && self.database.database_url.is_none()
            && self.database.postgres_password.is_empty()
        {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if self.ai.essay_assist_enabled {
            if self.ai.openai_api_key.is_empty() {
                return Err(ConfigError::MissingSecret("OPENAI_API_KEY"));
            }
            if self.ai.openai_base_url.is_empty() {
                return Err(ConfigError::MissingSecret("OPENAI_BASE_URL"));
            }
        }

        Ok(())
    }
}
