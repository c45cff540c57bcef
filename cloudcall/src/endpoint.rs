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

use cloudcall_core::{Endpoint, Error, Result};
use log::debug;
use std::collections::HashMap;

/// Regions served by the built-in table.
const REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "ca-central-1",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-central-1",
    "eu-north-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-south-1",
    "sa-east-1",
];

/// Legacy region names still accepted by older callers.
const REGION_ALIASES: &[(&str, &str)] = &[("US", "us-east-1"), ("EU", "eu-west-1")];

/// Region that global services are signed for.
const GLOBAL_REGION: &str = "us-east-1";

enum Layout {
    /// `{prefix}.{region}.amazonaws.com`
    Regional(&'static str),
    /// One host for every region.
    Global(&'static str),
    /// Only served from a single region.
    Pinned(&'static str, &'static str),
}

const SERVICES: &[(&str, Layout)] = &[
    ("autoscaling", Layout::Regional("autoscaling")),
    ("cloudformation", Layout::Regional("cloudformation")),
    ("dynamodb", Layout::Regional("dynamodb")),
    ("ec2", Layout::Regional("ec2")),
    ("elasticloadbalancing", Layout::Regional("elasticloadbalancing")),
    ("iam", Layout::Global("iam.amazonaws.com")),
    ("monitoring", Layout::Regional("monitoring")),
    ("rds", Layout::Regional("rds")),
    ("route53", Layout::Global("route53.amazonaws.com")),
    ("route53domains", Layout::Pinned("route53domains", GLOBAL_REGION)),
    ("s3", Layout::Regional("s3")),
    ("sns", Layout::Regional("sns")),
    ("sqs", Layout::Regional("sqs")),
    ("sts", Layout::Regional("sts")),
];

/// EndpointResolver maps (service, region) to a base URI.
///
/// Resolution order: the explicit override, then entries registered with
/// [`EndpointResolver::with_endpoint`], then the built-in table. Anything
/// else is a configuration error; no URI is ever guessed.
#[derive(Debug, Clone, Default)]
pub struct EndpointResolver {
    endpoint_override: Option<Endpoint>,
    custom: HashMap<(String, String), Endpoint>,
}

impl EndpointResolver {
    /// Create a resolver backed by the built-in table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Send every call to `uri`, whatever the service and region.
    ///
    /// The URI is validated here so a bad override fails before any call is
    /// made.
    pub fn with_override(mut self, uri: &str) -> Result<Self> {
        self.endpoint_override = Some(Endpoint::parse(uri, GLOBAL_REGION)?);
        Ok(self)
    }

    /// Register an endpoint for one (service, region) pair.
    pub fn with_endpoint(mut self, service: &str, region: &str, endpoint: Endpoint) -> Self {
        self.custom
            .insert((service.to_string(), normalize_region(region).to_string()), endpoint);
        self
    }

    /// Resolve the endpoint for `service` in `region`.
    pub fn resolve(&self, service: &str, region: &str) -> Result<Endpoint> {
        let region = normalize_region(region);

        if let Some(ep) = &self.endpoint_override {
            let ep = ep.clone().with_signing_region(region);
            debug!("resolved {service} in {region} to override {ep}");
            return Ok(ep);
        }
        if let Some(ep) = self.custom.get(&(service.to_string(), region.to_string())) {
            return Ok(ep.clone());
        }

        let Some((_, layout)) = SERVICES.iter().find(|(name, _)| *name == service) else {
            return Err(Error::config_invalid(format!("unknown service: {service}")));
        };

        let ep = match layout {
            Layout::Global(host) => Endpoint::https(*host, GLOBAL_REGION),
            Layout::Pinned(prefix, pinned) => {
                Endpoint::https(format!("{prefix}.{pinned}.amazonaws.com"), *pinned)
            }
            Layout::Regional(prefix) => {
                if !REGIONS.contains(&region) {
                    return Err(Error::config_invalid(format!("unknown region: {region}")));
                }
                if *prefix == "s3" && region == "us-east-1" {
                    Endpoint::https("s3.amazonaws.com", region)
                } else {
                    Endpoint::https(format!("{prefix}.{region}.amazonaws.com"), region)
                }
            }
        };
        debug!("resolved {service} in {region} to {ep}");
        Ok(ep)
    }
}

fn normalize_region(region: &str) -> &str {
    REGION_ALIASES
        .iter()
        .find(|(alias, _)| *alias == region)
        .map(|(_, name)| *name)
        .unwrap_or(region)
}
