use serde::{Deserialize, Serialize};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChadMeetConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub livekit: LiveKitConfig,
    #[serde(default)]
    pub room: RoomConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path to web client static files
    #[serde(default = "default_web_root")]
    pub web_root: String,
    /// Serve over HTTPS. Browsers only grant camera/microphone access to
    /// secure origins, so this is needed for anything other than localhost.
    #[serde(default)]
    pub tls: bool,
    /// Path to TLS certificate (self-signed if absent and `tls` is on)
    pub tls_cert: Option<String>,
    /// Path to TLS key (self-signed if absent and `tls` is on)
    pub tls_key: Option<String>,
}

/// Media server settings. The key and secret sign join tokens; the URL is
/// handed to clients so they know where to connect.
#[derive(Clone, Serialize, Deserialize)]
pub struct LiveKitConfig {
    /// Signaling URL clients connect to (ws:// or wss://)
    #[serde(default = "default_livekit_url")]
    pub url: String,
    /// API key, overridden by `LIVEKIT_API_KEY`
    pub api_key: Option<String>,
    /// API secret, overridden by `LIVEKIT_API_SECRET`
    pub api_secret: Option<String>,
    /// Lifetime of minted join tokens in seconds
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Room joined when the client does not name one
    #[serde(default = "default_room_name")]
    pub default_room: String,
}

/// Signing credentials, present only when both halves are non-empty.
#[derive(Clone, Copy)]
pub struct Credentials<'a> {
    pub api_key: &'a str,
    pub api_secret: &'a str,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            web_root: default_web_root(),
            tls: false,
            tls_cert: None,
            tls_key: None,
        }
    }
}

impl Default for LiveKitConfig {
    fn default() -> Self {
        Self {
            url: default_livekit_url(),
            api_key: None,
            api_secret: None,
            token_ttl_secs: default_token_ttl(),
        }
    }
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            default_room: default_room_name(),
        }
    }
}

impl std::fmt::Debug for LiveKitConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveKitConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key)
            .field(
                "api_secret",
                &self.api_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

impl LiveKitConfig {
    /// Both signing halves, or `None` if either is unset or empty.
    pub fn credentials(&self) -> Option<Credentials<'_>> {
        let api_key = self.api_key.as_deref().filter(|k| !k.is_empty())?;
        let api_secret = self.api_secret.as_deref().filter(|s| !s.is_empty())?;
        Some(Credentials {
            api_key,
            api_secret,
        })
    }
}

impl ChadMeetConfig {
    /// Apply environment overrides on top of file values.
    ///
    /// `lookup` is `std::env::var(..).ok()` in production; tests pass a map.
    /// `NEXT_PUBLIC_LIVEKIT_URL` is honoured for deployments that still carry
    /// the old front-end variable name; `LIVEKIT_URL` wins when both are set.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("LIVEKIT_API_KEY") {
            self.livekit.api_key = Some(key);
        }
        if let Some(secret) = lookup("LIVEKIT_API_SECRET") {
            self.livekit.api_secret = Some(secret);
        }
        if let Some(url) = lookup("LIVEKIT_URL").or_else(|| lookup("NEXT_PUBLIC_LIVEKIT_URL")) {
            self.livekit.url = url;
        }
    }

    /// Validate the configuration, returning a list of issues found.
    ///
    /// Issues are prefixed with "ERROR:" (fatal, server should not start) or
    /// "WARNING:" (advisory, server can start but the config is likely wrong).
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        // --- Port ---
        if self.server.port == 0 {
            issues.push("ERROR: server.port must be between 1 and 65535, got 0.".to_string());
        }

        // --- TLS cert/key ---
        if self.server.tls {
            match (&self.server.tls_cert, &self.server.tls_key) {
                (Some(cert), Some(key)) => {
                    if !std::path::Path::new(cert).exists() {
                        issues.push(format!("ERROR: tls_cert '{}' does not exist.", cert));
                    }
                    if !std::path::Path::new(key).exists() {
                        issues.push(format!("ERROR: tls_key '{}' does not exist.", key));
                    }
                }
                (Some(_), None) | (None, Some(_)) => {
                    issues.push(
                        "WARNING: only one of tls_cert/tls_key is set. \
                         Both must be set for custom TLS, or omit both for a self-signed certificate."
                            .to_string(),
                    );
                }
                (None, None) => {}
            }
        } else if self.server.tls_cert.is_some() || self.server.tls_key.is_some() {
            issues.push(
                "WARNING: tls_cert/tls_key are set but server.tls is false; they will be ignored."
                    .to_string(),
            );
        }

        // --- Signaling URL ---
        if !self.livekit.url.starts_with("ws://") && !self.livekit.url.starts_with("wss://") {
            issues.push(format!(
                "ERROR: livekit.url '{}' must start with 'ws://' or 'wss://'. \
                 Example: wss://meet.example.com",
                self.livekit.url
            ));
        }

        // --- Credentials ---
        // Missing credentials are not fatal: the server still starts and the
        // token endpoint answers 500 until they are provided.
        if self.livekit.credentials().is_none() {
            issues.push(
                "WARNING: LIVEKIT_API_KEY/LIVEKIT_API_SECRET are not both set. \
                 Token requests will fail with a server configuration error."
                    .to_string(),
            );
        }

        // --- Token lifetime ---
        if self.livekit.token_ttl_secs < 60 {
            issues.push(format!(
                "ERROR: livekit.token_ttl_secs must be at least 60 seconds, got {}.",
                self.livekit.token_ttl_secs
            ));
        } else if self.livekit.token_ttl_secs > 7 * 24 * 60 * 60 {
            issues.push(format!(
                "WARNING: livekit.token_ttl_secs is {} ({} days); leaked join tokens stay valid that long.",
                self.livekit.token_ttl_secs,
                self.livekit.token_ttl_secs / 86_400
            ));
        }

        // --- Room ---
        if self.room.default_room.trim().is_empty() {
            issues.push("ERROR: room.default_room must not be empty.".to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

fn default_web_root() -> String {
    "web/dist".to_string()
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_livekit_url() -> String {
    "ws://localhost:7880".to_string()
}
fn default_token_ttl() -> u64 {
    6 * 60 * 60 // 6 hours
}
fn default_room_name() -> String {
    "ChadMeetings".to_string()
}
