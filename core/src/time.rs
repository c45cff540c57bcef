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

//! Time related utils.

use crate::{Error, Result};
use chrono::{NaiveDateTime, Utc};

/// DateTime is the alias for `chrono::DateTime<Utc>`.
pub type DateTime = chrono::DateTime<Utc>;

/// Create a new DateTime from the current wall clock.
pub fn now() -> DateTime {
    Utc::now()
}

/// DATE is a time format like `20220301`.
const DATE: &str = "%Y%m%d";

/// ISO8601 is a time format like `20220313T072004Z`.
const ISO8601: &str = "%Y%m%dT%H%M%SZ";

/// ISO8601_WITH_SEPARATOR is a time format like `2022-03-13T07:20:04Z`.
const ISO8601_WITH_SEPARATOR: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Format time into date: `20220301`
pub fn format_date(t: DateTime) -> String {
    t.format(DATE).to_string()
}

/// Format time into ISO8601: `20220313T072004Z`
pub fn format_iso8601(t: DateTime) -> String {
    t.format(ISO8601).to_string()
}

/// Format time into ISO8601 with separators: `2022-03-13T07:20:04Z`
pub fn format_iso8601_with_separator(t: DateTime) -> String {
    t.format(ISO8601_WITH_SEPARATOR).to_string()
}

/// Parse time from ISO8601: `20220313T072004Z`
pub fn parse_iso8601(s: &str) -> Result<DateTime> {
    NaiveDateTime::parse_from_str(s, ISO8601)
        .map(|t| t.and_utc())
        .map_err(|e| Error::config_invalid(format!("invalid iso8601 time: {s}")).with_source(e))
}

/// Parse time from RFC3339: `2022-03-13T07:20:04Z`
pub fn parse_rfc3339(s: &str) -> Result<DateTime> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::config_invalid(format!("invalid rfc3339 time: {s}")).with_source(e))
}
