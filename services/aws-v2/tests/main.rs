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

use cloudcall_aws_v2::RequestSigner;
use cloudcall_core::time::parse_rfc3339;
use cloudcall_core::{ActionRequest, Credential, Endpoint, SignRequest};
use http::Method;
use pretty_assertions::assert_eq;
use std::collections::HashMap;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_post_sends_signed_form_body() {
    init();

    let req = ActionRequest::new("sqs", "SendMessage")
        .with_version("2012-11-05")
        .with_method(Method::POST)
        .with_param("MessageBody", "hello world");
    let endpoint = Endpoint::https("sqs.us-east-1.amazonaws.com", "us-east-1");
    let cred = Credential::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY");
    let now = parse_rfc3339("2015-08-30T12:36:00Z").unwrap();

    let signed = RequestSigner::new()
        .sign(&req, &endpoint, &cred, now)
        .expect("signing must succeed");

    assert_eq!(signed.signature(), "z84Fx/jsMWqz0O7XD1dT2+o7DVhlCUmH1K5WuTvbXe4=");

    let http_req = signed.request();
    assert_eq!(http_req.method(), Method::POST);
    assert_eq!(http_req.uri().query(), None);

    let form: HashMap<String, String> = form_urlencoded::parse(http_req.body())
        .into_owned()
        .collect();
    assert_eq!(form["Action"], "SendMessage");
    assert_eq!(form["MessageBody"], "hello world");
    assert_eq!(form["SignatureVersion"], "2");
    assert_eq!(form["Timestamp"], "2015-08-30T12:36:00Z");
    assert_eq!(form["Signature"], "z84Fx/jsMWqz0O7XD1dT2+o7DVhlCUmH1K5WuTvbXe4=");
}

#[test]
fn test_parameter_order_does_not_change_signature() {
    init();

    let endpoint = Endpoint::https("ec2.us-east-1.amazonaws.com", "us-east-1");
    let cred = Credential::new("AKIDEXAMPLE", "secret");
    let now = parse_rfc3339("2015-08-30T12:36:00Z").unwrap();

    let forward = ActionRequest::new("ec2", "DescribeInstances")
        .with_version("2016-11-15")
        .with_param("a", "1")
        .with_param("b", "2");
    let backward = ActionRequest::new("ec2", "DescribeInstances")
        .with_version("2016-11-15")
        .with_param("b", "2")
        .with_param("a", "1");

    let signer = RequestSigner::new();
    let forward = signer.sign(&forward, &endpoint, &cred, now).unwrap();
    let backward = signer.sign(&backward, &endpoint, &cred, now).unwrap();

    assert_eq!(forward.signature(), backward.signature());
}
