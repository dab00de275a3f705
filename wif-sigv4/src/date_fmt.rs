/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0.
 */

use crate::error::SigningError;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

const DATE_FORMAT: &str = "%Y%m%d";
const DATE_TIME_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Formats a date as `YYYYMMDD`, the date component of a credential scope
pub(crate) fn format_date(time: &DateTime<Utc>) -> String {
    time.format(DATE_FORMAT).to_string()
}

/// Formats a timestamp in the `x-amz-date` format, `YYYYMMDD'T'HHMMSS'Z'`
pub(crate) fn format_date_time(time: &DateTime<Utc>) -> String {
    time.format(DATE_TIME_FORMAT).to_string()
}

/// Parses an `x-amz-date` formatted timestamp
pub(crate) fn parse_date_time(date_time_str: &str) -> Result<DateTime<Utc>, SigningError> {
    NaiveDateTime::parse_from_str(date_time_str, DATE_TIME_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|err| SigningError::invalid_date_header("x-amz-date", date_time_str, err))
}

/// Parses an RFC 7231 `Date` header value, for example `Mon, 09 Sep 2011 23:36:00 GMT`
pub(crate) fn parse_http_date(date_str: &str) -> Result<DateTime<Utc>, SigningError> {
    DateTime::parse_from_rfc2822(date_str)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|err| SigningError::invalid_date_header("date", date_str, err))
}
