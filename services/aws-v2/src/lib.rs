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

//! Signature version 2 for query protocol APIs.
//!
//! The canonical query string is signed with a single HMAC keyed by the raw
//! secret, and the base64 signature travels as the `Signature` parameter.
//!
//! ```
//! use cloudcall_aws_v2::{RequestSigner, SignatureMethod};
//! use cloudcall_core::{ActionRequest, Credential, Endpoint, SignRequest};
//!
//! let signer = RequestSigner::new().with_signature_method(SignatureMethod::HmacSha1);
//! let req = ActionRequest::new("ec2", "DescribeRegions").with_version("2016-11-15");
//! let endpoint = Endpoint::https("ec2.us-east-1.amazonaws.com", "us-east-1");
//! let cred = Credential::new("AKIDEXAMPLE", "secret");
//!
//! let signed = signer
//!     .sign(&req, &endpoint, &cred, cloudcall_core::time::now())
//!     .unwrap();
//! assert!(signed.request().uri().query().unwrap().contains("Signature="));
//! ```

mod constants;

mod sign_request;
pub use sign_request::{RequestSigner, SignatureMethod};
