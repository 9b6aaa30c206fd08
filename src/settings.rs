use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WasteworksSettings {
    pub application: ApplicationSettings,
    pub session: SessionSettings,
    pub store: StoreSettings,
    pub provider: ProviderSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    /// Public base URL used to build the OIDC redirect URI
    pub redirect_base_url: String,
    pub cors_origins: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Cookie sealing password, at least 32 characters
    pub cookie_password: String,
    pub cookie_secure: bool,
    /// Server-side session record lifetime in hours
    pub session_duration_hours: u64,
}

/// Session store backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// "memory" or "redis"
    pub engine: String,
    pub redis_url: String,
    /// Prefix for session keys in the shared store
    pub key_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// OIDC discovery document URL, fetched once at startup
    pub discovery_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Identifier of this service at the identity provider, forwarded on the
    /// authorization redirect
    pub service_id: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            redirect_base_url: "http://localhost:3000".to_string(),
            cors_origins: "http://localhost:3000".to_string(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_password: String::new(), // Will be generated if empty
            cookie_secure: true,
            session_duration_hours: 3,
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            engine: "memory".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "wasteworks:session:".to_string(),
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            discovery_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            service_id: String::new(),
            scopes: vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
                "offline_access".to_string(),
            ],
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl WasteworksSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file cannot be read or parsed
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_env_file();

        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);

        Ok(settings)
    }

    /// Load base settings from TOML file(s) or use defaults
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading)
    /// 2. Settings.toml in `WASTEWORKS_SECRETS_DIR` (if set and present)
    /// 3. Settings.toml in current directory (if present)
    /// 4. Default settings
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file cannot be read or TOML parsing fails
    fn load_base_settings() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::default();

        let default_config_path = std::path::PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            let toml_content = fs::read_to_string(&default_config_path)?;
            settings = basic_toml::from_str(&toml_content)?;
            log::info!("Loaded base settings from {}", default_config_path.display());
        }

        if let Ok(secrets_dir) = std::env::var("WASTEWORKS_SECRETS_DIR") {
            let secrets_path = std::path::Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                let secrets_toml_content = fs::read_to_string(&secrets_path)?;
                settings = basic_toml::from_str(&secrets_toml_content)?;
                log::info!("Overriding settings from {}", secrets_path.display());
            }
        }

        Ok(settings)
    }

    fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_session_env_overrides(&mut settings.session);
        Self::apply_store_env_overrides(&mut settings.store);
        Self::apply_provider_env_overrides(&mut settings.provider);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        if let Ok(host) = std::env::var("HOST") {
            app_settings.host = host;
        }
        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                app_settings.port = port;
            }
        }
        if let Ok(redirect_base_url) = std::env::var("REDIRECT_BASE_URL") {
            app_settings.redirect_base_url = redirect_base_url;
        }
        if let Ok(cors_origins) = std::env::var("CORS_ORIGINS") {
            app_settings.cors_origins = cors_origins;
        }
    }

    /// Apply environment overrides for session settings
    pub fn apply_session_env_overrides(session_settings: &mut SessionSettings) {
        if let Ok(duration_str) = std::env::var("SESSION_DURATION_HOURS") {
            if let Ok(duration) = duration_str.parse::<u64>() {
                session_settings.session_duration_hours = duration;
            }
        }
        if let Ok(cookie_secure_str) = std::env::var("COOKIE_SECURE") {
            if let Ok(cookie_secure) = cookie_secure_str.parse::<bool>() {
                session_settings.cookie_secure = cookie_secure;
            }
        }

        Self::handle_cookie_password_override(session_settings);
    }

    /// Handle cookie password environment override and generation
    fn handle_cookie_password_override(session_settings: &mut SessionSettings) {
        let env_password_set = std::env::var("COOKIE_PASSWORD").is_ok_and(|password| {
            if password.is_empty() {
                false
            } else {
                session_settings.cookie_password = password;
                true
            }
        });

        // Sessions won't survive a restart with a generated password
        if !env_password_set && session_settings.cookie_password.is_empty() {
            session_settings.cookie_password = Self::generate_random_cookie_password();
            log::warn!(
                "Using auto-generated cookie password; set COOKIE_PASSWORD or \
                 session.cookie_password in Settings.toml for production"
            );
        }
    }

    /// Generate a cryptographically secure random cookie password
    ///
    /// Generates 32 bytes (256 bits) of entropy for AES-256 compatibility
    fn generate_random_cookie_password() -> String {
        use rand::RngCore;
        let mut secret = [0u8; 32];
        rand::rng().fill_bytes(&mut secret);
        general_purpose::STANDARD.encode(secret)
    }

    fn apply_store_env_overrides(store_settings: &mut StoreSettings) {
        if let Ok(engine) = std::env::var("SESSION_STORE_ENGINE") {
            store_settings.engine = engine;
        }
        if let Ok(redis_url) = std::env::var("REDIS_URL") {
            store_settings.redis_url = redis_url;
        }
        if let Ok(key_prefix) = std::env::var("SESSION_KEY_PREFIX") {
            store_settings.key_prefix = key_prefix;
        }
    }

    fn apply_provider_env_overrides(provider_settings: &mut ProviderSettings) {
        if let Ok(discovery_url) = std::env::var("OIDC_DISCOVERY_URL") {
            provider_settings.discovery_url = discovery_url;
        }
        if let Ok(client_id) = std::env::var("OIDC_CLIENT_ID") {
            provider_settings.client_id = client_id;
        }
        if let Ok(client_secret) = std::env::var("OIDC_CLIENT_SECRET") {
            provider_settings.client_secret = client_secret;
        }
        if let Ok(service_id) = std::env::var("OIDC_SERVICE_ID") {
            provider_settings.service_id = service_id;
        }
        if let Ok(scopes) = std::env::var("OIDC_SCOPES") {
            provider_settings.scopes = scopes.split(' ').map(str::to_string).collect();
        }
    }

    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            logging_settings.level = log_level;
        }
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    /// Get CORS origins as a vector of strings
    #[must_use]
    pub fn get_cors_origins(&self) -> Vec<String> {
        self.application
            .cors_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .collect()
    }

    /// Scope string sent on token and refresh requests
    ///
    /// The provider expects the client id itself as the first scope entry.
    #[must_use]
    pub fn token_scope(&self) -> String {
        let mut parts = Vec::with_capacity(self.provider.scopes.len() + 1);
        parts.push(self.provider.client_id.clone());
        parts.extend(self.provider.scopes.iter().cloned());
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clean_env_vars() {
        std::env::remove_var("COOKIE_PASSWORD");
        std::env::remove_var("COOKIE_SECURE");
        std::env::remove_var("SESSION_DURATION_HOURS");
        std::env::remove_var("SESSION_STORE_ENGINE");
        std::env::remove_var("REDIS_URL");
        std::env::remove_var("SESSION_KEY_PREFIX");
        std::env::remove_var("OIDC_DISCOVERY_URL");
        std::env::remove_var("OIDC_CLIENT_ID");
        std::env::remove_var("OIDC_CLIENT_SECRET");
        std::env::remove_var("OIDC_SERVICE_ID");
        std::env::remove_var("OIDC_SCOPES");
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clean_env_vars();
        let settings = WasteworksSettings::default();

        assert_eq!(settings.application.port, 3000);
        assert_eq!(settings.store.engine, "memory");
        assert_eq!(settings.session.session_duration_hours, 3);
        assert!(settings.session.cookie_secure);
        assert_eq!(
            settings.provider.scopes,
            vec!["openid", "profile", "email", "offline_access"]
        );
    }

    #[test]
    #[serial]
    fn test_session_env_overrides() {
        clean_env_vars();
        std::env::set_var("SESSION_DURATION_HOURS", "6");
        std::env::set_var("COOKIE_SECURE", "false");
        std::env::set_var("COOKIE_PASSWORD", "explicit_password_32_chars_long!");

        let mut session = SessionSettings::default();
        WasteworksSettings::apply_session_env_overrides(&mut session);

        assert_eq!(session.session_duration_hours, 6);
        assert!(!session.cookie_secure);
        assert_eq!(session.cookie_password, "explicit_password_32_chars_long!");

        clean_env_vars();
    }

    #[test]
    #[serial]
    fn test_cookie_password_generated_when_unset() {
        clean_env_vars();

        let mut session = SessionSettings::default();
        WasteworksSettings::apply_session_env_overrides(&mut session);

        assert!(!session.cookie_password.is_empty());
        // Base64 of 32 bytes
        assert_eq!(session.cookie_password.len(), 44);
    }

    #[test]
    #[serial]
    fn test_store_and_provider_env_overrides() {
        clean_env_vars();
        std::env::set_var("SESSION_STORE_ENGINE", "redis");
        std::env::set_var("REDIS_URL", "redis://cache.internal:6379");
        std::env::set_var("OIDC_CLIENT_ID", "client-abc");
        std::env::set_var("OIDC_SCOPES", "openid email");

        let mut settings = WasteworksSettings::default();
        WasteworksSettings::apply_env_overrides(&mut settings);

        assert_eq!(settings.store.engine, "redis");
        assert_eq!(settings.store.redis_url, "redis://cache.internal:6379");
        assert_eq!(settings.provider.client_id, "client-abc");
        assert_eq!(settings.provider.scopes, vec!["openid", "email"]);

        clean_env_vars();
    }

    #[test]
    #[serial]
    fn test_token_scope_includes_client_id_first() {
        clean_env_vars();
        let mut settings = WasteworksSettings::default();
        settings.provider.client_id = "client-abc".to_string();

        assert_eq!(
            settings.token_scope(),
            "client-abc openid profile email offline_access"
        );
    }

    #[test]
    #[serial]
    fn test_settings_parse_from_toml() {
        clean_env_vars();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Settings.toml");
        std::fs::write(
            &path,
            r#"
[application]
host = "127.0.0.1"
port = 8081
redirect_base_url = "https://portal.example"
cors_origins = "https://portal.example"

[session]
cookie_password = "toml_configured_password_32_char"
cookie_secure = true
session_duration_hours = 4

[store]
engine = "redis"
redis_url = "redis://127.0.0.1:6379"
key_prefix = "portal:session:"

[provider]
discovery_url = "https://idp.example/.well-known/openid-configuration"
client_id = "portal-client"
client_secret = "portal-secret"
service_id = "service-42"
scopes = ["openid", "profile", "email", "offline_access"]

[logging]
level = "debug"
"#,
        )
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let settings: WasteworksSettings = basic_toml::from_str(&content).unwrap();

        assert_eq!(settings.application.port, 8081);
        assert_eq!(settings.store.key_prefix, "portal:session:");
        assert_eq!(settings.provider.service_id, "service-42");
        assert_eq!(settings.session.session_duration_hours, 4);
        assert_eq!(settings.logging.level, "debug");
    }
}
