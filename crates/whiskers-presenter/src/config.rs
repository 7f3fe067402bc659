//! Presenter configuration, read from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use whiskers_core::error::PresenterError;
use whiskers_core::features::FeatureToggles;
use whiskers_sidechannel::{AudioConfig, MinigameConfig};
use whiskers_transport::TransportConfig;

/// Everything the presenter needs to start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenterConfig {
    pub transport: TransportConfig,
    pub features: FeatureToggles,
    pub audio: AudioConfig,
    pub minigame: MinigameConfig,
    /// Story file (`.json`, `.yaml` or `.yml`); the embedded story when unset.
    pub story_path: Option<PathBuf>,
    /// Address of the development status server; disabled when unset.
    pub status_addr: Option<SocketAddr>,
}

impl PresenterConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `PresenterError::Config` naming the first variable whose value
    /// does not parse.
    pub fn from_env() -> Result<Self, PresenterError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, falling back to defaults for
    /// unset variables.
    ///
    /// # Errors
    ///
    /// Returns `PresenterError::Config` naming the first variable whose value
    /// does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PresenterError> {
        let env = Lookup(&lookup);
        let defaults = Self::default();
        let t = defaults.transport;
        let f = defaults.features;

        let transport = TransportConfig {
            broker: env.string("MQTT_BROKER", t.broker),
            port: env.parse("MQTT_PORT", t.port)?,
            secure_port: env.parse("MQTT_SECURE_PORT", t.secure_port)?,
            use_ssl: env.flag("MQTT_USE_SSL", t.use_ssl)?,
            client_id_prefix: env.string("MQTT_CLIENT_ID_PREFIX", t.client_id_prefix),
            reconnect_period: env.millis("MQTT_RECONNECT_PERIOD_MS", t.reconnect_period)?,
            connect_timeout: env.millis("MQTT_CONNECT_TIMEOUT_MS", t.connect_timeout)?,
            keep_alive: Duration::from_secs(
                env.parse("MQTT_KEEP_ALIVE_SECS", t.keep_alive.as_secs())?,
            ),
            clean_session: env.flag("MQTT_CLEAN_SESSION", t.clean_session)?,
            subscribe_topic: env.string("MQTT_TOPIC_SUBSCRIBE", t.subscribe_topic),
            publish_topic: env.string("MQTT_TOPIC_PUBLISH", t.publish_topic),
            reconnect: t.reconnect,
        };
        let features = FeatureToggles {
            mqtt: env.flag("MQTT_ENABLED", f.mqtt)?,
            audio: env.flag("AUDIO_ENABLED", f.audio)?,
            minigames: env.flag("MINIGAMES_ENABLED", f.minigames)?,
            development_mode: env.flag("DEVELOPMENT_MODE", f.development_mode)?,
        };
        let audio = AudioConfig {
            base_path: env.string("AUDIO_BASE_PATH", defaults.audio.base_path),
            mock_delay: env.optional("MOCK_AUDIO_DELAY_MS")?.map(Duration::from_millis),
        };
        let minigame = MinigameConfig {
            loading_timeout: env.millis(
                "MINIGAME_LOADING_TIMEOUT_MS",
                defaults.minigame.loading_timeout,
            )?,
        };

        Ok(Self {
            transport,
            features,
            audio,
            minigame,
            story_path: lookup("STORY_PATH").map(PathBuf::from),
            status_addr: env.optional("STATUS_ADDR")?,
        })
    }
}

struct Lookup<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Lookup<'_, F> {
    fn string(&self, key: &str, default: String) -> String {
        (self.0)(key).unwrap_or(default)
    }

    fn optional<T>(&self, key: &str) -> Result<Option<T>, PresenterError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        (self.0)(key)
            .map(|raw| {
                raw.trim()
                    .parse()
                    .map_err(|e| PresenterError::Config(format!("{key} is invalid: {e}")))
            })
            .transpose()
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, PresenterError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.optional(key)?.unwrap_or(default))
    }

    fn millis(&self, key: &str, default: Duration) -> Result<Duration, PresenterError> {
        Ok(self
            .optional(key)?
            .map_or(default, Duration::from_millis))
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, PresenterError> {
        match (self.0)(key).as_deref().map(str::trim) {
            None => Ok(default),
            Some("true" | "1" | "yes") => Ok(true),
            Some("false" | "0" | "no") => Ok(false),
            Some(other) => Err(PresenterError::Config(format!(
                "{key} must be true or false, got {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = PresenterConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config, PresenterConfig::default());
        assert_eq!(config.transport.connect_timeout, Duration::from_millis(15_000));
        assert!(!config.features.audio);
        assert!(config.status_addr.is_none());
    }

    #[test]
    fn test_overrides_are_applied() {
        // Arrange
        let env = lookup(&[
            ("MQTT_BROKER", "localhost"),
            ("MQTT_USE_SSL", "true"),
            ("MQTT_SECURE_PORT", "9001"),
            ("AUDIO_ENABLED", "1"),
            ("MOCK_AUDIO_DELAY_MS", "2500"),
            ("STATUS_ADDR", "127.0.0.1:4000"),
            ("STORY_PATH", "stories/cat.yaml"),
        ]);

        // Act
        let config = PresenterConfig::from_lookup(env).unwrap();

        // Assert
        assert_eq!(config.transport.broker_url(), "wss://localhost:9001/mqtt");
        assert!(config.features.audio);
        assert_eq!(config.audio.mock_delay, Some(Duration::from_millis(2500)));
        assert_eq!(config.status_addr, Some("127.0.0.1:4000".parse().unwrap()));
        assert_eq!(config.story_path, Some(PathBuf::from("stories/cat.yaml")));
    }

    #[test]
    fn test_invalid_port_names_the_variable() {
        let result = PresenterConfig::from_lookup(lookup(&[("MQTT_PORT", "eighty")]));

        match result {
            Err(PresenterError::Config(message)) => assert!(message.contains("MQTT_PORT")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_flag_is_rejected() {
        let result = PresenterConfig::from_lookup(lookup(&[("DEVELOPMENT_MODE", "maybe")]));

        assert!(matches!(result, Err(PresenterError::Config(_))));
    }
}
