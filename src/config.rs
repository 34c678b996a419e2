use crate::delivery::retry::RetryPolicy;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Local emulator of the SNS topic/subscription API.
#[derive(Parser, Debug, Clone)]
#[command(name = "local-sns", version, about, long_about = None)]
pub struct Config {
    /// Address to bind
    #[arg(long, env = "LOCAL_SNS_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind
    #[arg(long, env = "LOCAL_SNS_PORT", default_value_t = 4002)]
    pub port: u16,

    /// Region used in topic ARNs and queue clients
    #[arg(long, env = "LOCAL_SNS_REGION", default_value = "us-east-1")]
    pub region: String,

    /// Account id used in topic ARNs and for `#{AWS::...}` pseudo parameters
    #[arg(long, env = "LOCAL_SNS_ACCOUNT_ID", default_value = "123456789012")]
    pub account_id: String,

    /// Additional HTTP delivery attempts after a failure
    #[arg(long, env = "LOCAL_SNS_RETRY", default_value_t = 0)]
    pub retry: u32,

    /// Milliseconds between HTTP delivery attempts
    #[arg(long, env = "LOCAL_SNS_RETRY_INTERVAL", default_value_t = 0)]
    pub retry_interval: u64,

    /// Milliseconds before a stalled HTTP delivery attempt is abandoned
    #[arg(long, env = "LOCAL_SNS_HTTP_TIMEOUT", default_value_t = 30_000)]
    pub http_timeout: u64,

    /// Queue service endpoint used for every queue delivery
    #[arg(long, env = "LOCAL_SNS_SQS_ENDPOINT")]
    pub sqs_endpoint: Option<String>,

    /// JSON file of topics and subscriptions created at startup
    #[arg(long, env = "LOCAL_SNS_SUBSCRIPTIONS")]
    pub subscriptions: Option<PathBuf>,

    /// Default log directive, overridden by RUST_LOG
    #[arg(long, env = "LOCAL_SNS_LOG", default_value = "info")]
    pub log_level: String,

    /// Log every request, filter decision and delivery attempt
    #[arg(long, env = "LOCAL_SNS_DEBUG")]
    pub debug: bool,
}

impl Config {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry, Duration::from_millis(self.retry_interval))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn log_directive(&self) -> &str {
        if self.debug { "debug" } else { &self.log_level }
    }
}
