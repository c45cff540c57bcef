// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use cloudcall_core::{Context, Error, Result, SigningScheme};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Env value for the target region.
pub const CLOUDCALL_REGION: &str = "CLOUDCALL_REGION";
/// Fallback env value for the target region.
pub const AWS_REGION: &str = "AWS_REGION";
/// Env value for an explicit base URI.
pub const CLOUDCALL_ENDPOINT: &str = "CLOUDCALL_ENDPOINT";
/// Env value for the per-call timeout, in seconds.
pub const CLOUDCALL_TIMEOUT: &str = "CLOUDCALL_TIMEOUT";
/// Env value for the per-host connection bound.
pub const CLOUDCALL_MAX_CONNECTIONS_PER_HOST: &str = "CLOUDCALL_MAX_CONNECTIONS_PER_HOST";
/// Env value for the signing scheme.
pub const CLOUDCALL_SIGNING_SCHEME: &str = "CLOUDCALL_SIGNING_SCHEME";
/// Env value enabling fail-fast dispatch.
pub const CLOUDCALL_FAIL_FAST: &str = "CLOUDCALL_FAIL_FAST";

/// Config for a cloudcall client.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// `region` will be loaded from:
    ///
    /// - env value: [`CLOUDCALL_REGION`], then [`AWS_REGION`]
    /// - default to `us-east-1`
    pub region: String,
    /// `endpoint_override` replaces the built-in endpoint table when set.
    ///
    /// - env value: [`CLOUDCALL_ENDPOINT`]
    pub endpoint_override: Option<String>,
    /// End-to-end deadline of one call: waiting for a connection slot,
    /// sending and reading the full response.
    ///
    /// - env value: [`CLOUDCALL_TIMEOUT`] in seconds
    /// - default to 30s
    pub timeout: Duration,
    /// Optional separate connect deadline handed to the transport.
    pub connect_timeout: Option<Duration>,
    /// Bound of concurrently open connections per host.
    ///
    /// - env value: [`CLOUDCALL_MAX_CONNECTIONS_PER_HOST`]
    /// - default to 16
    pub max_connections_per_host: usize,
    /// Signing scheme used for every call.
    ///
    /// - env value: [`CLOUDCALL_SIGNING_SCHEME`]
    /// - default to `v4`
    pub signing_scheme: SigningScheme,
    /// Fail with `PoolExhausted` instead of waiting for a free connection.
    ///
    /// - env value: [`CLOUDCALL_FAIL_FAST`]
    pub fail_fast: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint_override: None,
            timeout: Duration::from_secs(30),
            connect_timeout: None,
            max_connections_per_host: 16,
            signing_scheme: SigningScheme::V4,
            fail_fast: false,
        }
    }
}

/// On-disk form of [`Config`], durations in seconds.
#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    region: Option<String>,
    endpoint_override: Option<String>,
    timeout: Option<f64>,
    connect_timeout: Option<f64>,
    max_connections_per_host: Option<usize>,
    signing_scheme: Option<String>,
    fail_fast: Option<bool>,
}

impl Config {
    /// Load config from env, overriding fields that are set.
    pub fn from_env(mut self, ctx: &Context) -> Result<Self> {
        if let Some(v) = ctx
            .env_var(CLOUDCALL_REGION)
            .or_else(|| ctx.env_var(AWS_REGION))
        {
            self.region = v;
        }
        if let Some(v) = ctx.env_var(CLOUDCALL_ENDPOINT) {
            self.endpoint_override = Some(v);
        }
        if let Some(v) = ctx.env_var(CLOUDCALL_TIMEOUT) {
            self.timeout = parse_seconds(CLOUDCALL_TIMEOUT, &v)?;
        }
        if let Some(v) = ctx.env_var(CLOUDCALL_MAX_CONNECTIONS_PER_HOST) {
            self.max_connections_per_host = v.trim().parse().map_err(|e| {
                Error::config_invalid(format!(
                    "{CLOUDCALL_MAX_CONNECTIONS_PER_HOST} must be an integer, got {v}"
                ))
                .with_source(e)
            })?;
        }
        if let Some(v) = ctx.env_var(CLOUDCALL_SIGNING_SCHEME) {
            self.signing_scheme = v.parse()?;
        }
        if let Some(v) = ctx.env_var(CLOUDCALL_FAIL_FAST) {
            self.fail_fast = parse_bool(CLOUDCALL_FAIL_FAST, &v)?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Parse config from a TOML document. Missing keys keep their defaults.
    ///
    /// ```
    /// use cloudcall::Config;
    ///
    /// let cfg = Config::from_toml("region = \"eu-west-1\"\ntimeout = 5").unwrap();
    /// assert_eq!(cfg.region, "eu-west-1");
    /// assert_eq!(cfg.timeout.as_secs(), 5);
    /// ```
    pub fn from_toml(s: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(s)
            .map_err(|e| Error::config_invalid("invalid config document").with_source(e))?;

        let mut cfg = Config::default();
        if let Some(v) = file.region {
            cfg.region = v;
        }
        cfg.endpoint_override = file.endpoint_override;
        if let Some(v) = file.timeout {
            cfg.timeout = seconds("timeout", v)?;
        }
        if let Some(v) = file.connect_timeout {
            cfg.connect_timeout = Some(seconds("connect_timeout", v)?);
        }
        if let Some(v) = file.max_connections_per_host {
            cfg.max_connections_per_host = v;
        }
        if let Some(v) = file.signing_scheme {
            cfg.signing_scheme = v.parse()?;
        }
        if let Some(v) = file.fail_fast {
            cfg.fail_fast = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(Error::config_invalid("region must not be empty"));
        }
        if self.timeout.is_zero() {
            return Err(Error::config_invalid("timeout must be greater than zero"));
        }
        if self.max_connections_per_host == 0 {
            return Err(Error::config_invalid(
                "max_connections_per_host must be greater than zero",
            ));
        }
        if self.max_connections_per_host > Semaphore::MAX_PERMITS {
            return Err(Error::config_invalid(format!(
                "max_connections_per_host must not exceed {}",
                Semaphore::MAX_PERMITS
            )));
        }
        Ok(())
    }
}

fn seconds(key: &str, v: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(v)
        .map_err(|e| Error::config_invalid(format!("{key} must be a positive number of seconds")).with_source(e))
}

fn parse_seconds(key: &str, v: &str) -> Result<Duration> {
    let secs: f64 = v.trim().parse().map_err(|e| {
        Error::config_invalid(format!("{key} must be a number of seconds, got {v}")).with_source(e)
    })?;
    seconds(key, secs)
}

fn parse_bool(key: &str, v: &str) -> Result<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" | "" => Ok(false),
        _ => Err(Error::config_invalid(format!(
            "{key} must be a boolean, got {v}"
        ))),
    }
}
