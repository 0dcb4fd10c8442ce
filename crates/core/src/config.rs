use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub sandbox: SandboxSettings,
    pub orchestrator: OrchestratorConfig,
    pub planner: PlannerConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Empty or containing `*` means any origin.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SandboxSettings {
    pub container_name: String,
    pub image: String,
    pub build_context: String,
    pub dockerfile: String,
    /// Host directory bind-mounted into the container.
    pub host_dir: String,
    pub mount_target: String,
    pub user: String,
    pub workdir: String,
    pub chown_uid: Option<u32>,
    pub chown_gid: Option<u32>,
    pub operation_timeout_secs: u64,
    pub init_command: Option<String>,
    pub shell: String,
    pub terminal_shells: Vec<String>,
    pub max_output_bytes: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OrchestratorConfig {
    pub max_turns: usize,
    pub excluded_tools: Vec<String>,
    pub excluded_prefixes: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlannerConfig {
    /// One of `openai`, `anthropic`, `gemini`.
    pub provider: String,
    pub model: String,
    pub requests_per_minute: u32,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TelemetryConfig {
    pub log_filter: String,
    pub json_logs: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("SHELLPILOT_ENV").unwrap_or_else(|_| "development".into());
        let dir = std::env::var("SHELLPILOT_CONFIG_DIR").unwrap_or_else(|_| "config".into());

        let s = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::with_name(&format!("{}/default", dir)).required(false))
            .add_source(File::with_name(&format!("{}/{}", dir, env)).required(false))
            .add_source(File::with_name(&format!("{}/local", dir)).required(false))
            // Map SHELLPILOT__SERVER__PORT=18511 to server.port
            .add_source(
                Environment::with_prefix("SHELLPILOT")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.allowed_origins")
                    .with_list_parse_key("orchestrator.excluded_tools")
                    .with_list_parse_key("orchestrator.excluded_prefixes")
                    .with_list_parse_key("sandbox.terminal_shells")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }
}

impl SandboxSettings {
    pub fn operation_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.operation_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 18511,
                allowed_origins: vec![],
            },
            sandbox: SandboxSettings::default(),
            orchestrator: OrchestratorConfig::default(),
            planner: PlannerConfig {
                provider: "gemini".into(),
                model: "gemini-1.5-flash".into(),
                requests_per_minute: 60,
                temperature: None,
                max_tokens: Some(4096),
            },
            telemetry: TelemetryConfig {
                log_filter: "info,shellpilot=debug".into(),
                json_logs: false,
            },
        }
    }
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            container_name: "dev-environment".into(),
            image: "agent-thing-dev".into(),
            build_context: ".".into(),
            dockerfile: "Dockerfile".into(),
            host_dir: "./sandbox-home".into(),
            mount_target: "/home/developer".into(),
            user: "developer".into(),
            workdir: "/home/developer".into(),
            chown_uid: None,
            chown_gid: None,
            operation_timeout_secs: 120,
            init_command: Some(
                "mkdir -p ~/.ssh && ssh-keyscan github.com >> ~/.ssh/known_hosts".into(),
            ),
            shell: "/bin/bash".into(),
            terminal_shells: vec!["/bin/bash".into(), "/bin/sh".into()],
            max_output_bytes: 8 * 1024 * 1024, // 8MB
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_turns: 15,
            excluded_tools: vec!["ssh_key_gen".into()],
            excluded_prefixes: vec!["docker_".into()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.orchestrator.max_turns, 15);
        assert_eq!(cfg.sandbox.container_name, "dev-environment");
        assert_eq!(cfg.sandbox.operation_timeout().as_secs(), 120);
        assert_eq!(cfg.sandbox.terminal_shells[0], "/bin/bash");
    }

    #[test]
    fn test_defaults_survive_layering() {
        let cfg: AppConfig = Config::builder()
            .add_source(Config::try_from(&AppConfig::default()).unwrap())
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(cfg.server.port, 18511);
        assert_eq!(cfg.orchestrator.excluded_prefixes, vec!["docker_".to_string()]);
        assert!(cfg.sandbox.chown_uid.is_none());
    }
}
