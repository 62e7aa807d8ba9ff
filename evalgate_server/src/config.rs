use std::net::SocketAddr;

use clap::Parser;

/// Service configuration, read from the command line or the environment
#[derive(Clone, Debug, Parser)]
#[command(name = "evalgate", version, about)]
pub struct Config {
    /// The service name reported by the health check
    #[arg(long, env, default_value = "Evaluations API")]
    pub app_name: String,

    /// The address to listen on
    #[arg(long, env, default_value = "127.0.0.1:8000")]
    pub bind_addr: SocketAddr,

    /// The identity provider's base URL
    #[arg(long, env, default_value = "http://localhost:8080")]
    pub snapauth_base_url: String,

    /// The identity provider's key set URL, if not at the well-known path
    #[arg(long, env)]
    pub snapauth_jwks_url: Option<String>,

    /// The API key used to register users with the identity provider
    #[arg(long, env, hide_env_values = true)]
    pub snapauth_api_key: Option<String>,

    /// The audience tokens must be issued for
    #[arg(long, env)]
    pub jwt_audience: Option<String>,

    /// The issuer tokens must come from
    #[arg(long, env)]
    pub jwt_issuer: Option<String>,
}

impl Config {
    /// The URL of the identity provider's key set
    pub fn jwks_url(&self) -> String {
        match &self.snapauth_jwks_url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => format!(
                "{}/v1/.well-known/jwks.json",
                self.snapauth_base_url.trim_end_matches('/')
            ),
        }
    }
}
