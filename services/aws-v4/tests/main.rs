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

use cloudcall_aws_v4::RequestSigner;
use cloudcall_core::time::parse_iso8601;
use cloudcall_core::{ActionRequest, Credential, Endpoint, SignRequest, SigningScheme};
use http::header::AUTHORIZATION;
use http::{HeaderValue, Method};
use pretty_assertions::assert_eq;
use test_case::test_case;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn signed_headers_of(auth: &HeaderValue) -> String {
    let auth = auth.to_str().unwrap();
    let start = auth.find("SignedHeaders=").unwrap() + "SignedHeaders=".len();
    let end = auth[start..].find(',').unwrap() + start;
    auth[start..end].to_string()
}

#[test_case("service", "host;x-amz-date"; "plain service")]
#[test_case("s3", "host;x-amz-content-sha256;x-amz-date"; "s3")]
fn test_signed_header_set(service: &str, expected: &str) {
    init();

    let req = ActionRequest::new(service, "Get").with_path("/object");
    let endpoint = Endpoint::https("example.amazonaws.com", "us-east-1");
    let cred = Credential::new("AKIDEXAMPLE", "secret");
    let signed = RequestSigner::new()
        .sign(&req, &endpoint, &cred, parse_iso8601("20150830T123600Z").unwrap())
        .unwrap();

    let auth = signed.request().headers().get(AUTHORIZATION).unwrap();
    assert_eq!(signed_headers_of(auth), expected);
    assert_eq!(signed.scheme(), SigningScheme::V4);
}

#[test]
fn test_query_protocol_over_v4() {
    init();

    let req = ActionRequest::new("sts", "GetCallerIdentity")
        .with_version("2011-06-15")
        .with_method(Method::POST)
        .with_header(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
    let endpoint = Endpoint::https("sts.amazonaws.com", "us-east-1");
    let cred = Credential::new("AKIDEXAMPLE", "secret");
    let signed = RequestSigner::new()
        .sign(&req, &endpoint, &cred, parse_iso8601("20150830T123600Z").unwrap())
        .unwrap();

    let auth = signed.request().headers().get(AUTHORIZATION).unwrap();
    assert_eq!(signed_headers_of(auth), "content-type;host;x-amz-date");
    assert_eq!(
        signed.request().uri().query(),
        Some("Action=GetCallerIdentity&Version=2011-06-15")
    );
}

#[test]
fn test_fresh_time_fresh_signature() {
    init();

    let req = ActionRequest::new("service", "Get");
    let endpoint = Endpoint::https("example.amazonaws.com", "us-east-1");
    let cred = Credential::new("AKIDEXAMPLE", "secret");
    let signer = RequestSigner::new();

    let first = signer
        .sign(&req, &endpoint, &cred, parse_iso8601("20150830T123600Z").unwrap())
        .unwrap();
    let again = signer
        .sign(&req, &endpoint, &cred, parse_iso8601("20150830T123600Z").unwrap())
        .unwrap();
    let later = signer
        .sign(&req, &endpoint, &cred, parse_iso8601("20150830T123601Z").unwrap())
        .unwrap();

    assert_eq!(first.signature(), again.signature());
    assert_ne!(first.signature(), later.signature());
}
