use serde::Deserialize;

use crate::otp::yubico_client::DEFAULT_API_URL;

/// Process settings, read from the environment with the `MAILWARD_`
/// prefix after loading any `.env` file.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database_url: String,
    pub redis_url: String,
    /// Brand string prefixed to fail-ban notices.
    pub app_brand: String,
    /// AppID handed out with U2F challenges, normally the panel origin.
    pub u2f_app_id: String,
    pub yubico_api_url: String,
    pub fail2ban_channel: String,
}

impl Settings {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        config::Config::builder()
            .set_default("app_brand", "mailward")?
            .set_default("yubico_api_url", DEFAULT_API_URL)?
            .set_default("fail2ban_channel", "F2B_CHANNEL")?
            .add_source(config::Environment::with_prefix("MAILWARD"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_the_optional_settings() {
        // Required settings provided, defaults fill in the rest.
        let settings: Settings = config::Config::builder()
            .set_default("app_brand", "mailward")
            .unwrap()
            .set_default("yubico_api_url", DEFAULT_API_URL)
            .unwrap()
            .set_default("fail2ban_channel", "F2B_CHANNEL")
            .unwrap()
            .set_override("database_url", "postgres://localhost/mailward")
            .unwrap()
            .set_override("redis_url", "redis://localhost")
            .unwrap()
            .set_override("u2f_app_id", "https://mail.example.com")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.app_brand, "mailward");
        assert_eq!(settings.fail2ban_channel, "F2B_CHANNEL");
        assert_eq!(settings.yubico_api_url, DEFAULT_API_URL);
    }
}
