//! Classification of scanned strings.
//!
//! A scan is accepted when it mentions the current batch id or the
//! verification domain. Acceptance is presence-based string matching: there is
//! nothing cryptographic here, and a different batch id is still reported as
//! verified, only flagged as such.
//!
//! A scan that matched on the domain alone reports the batch id found in the
//! path after the domain, and only falls back to `<prefix>-XXX` when that
//! path segment is missing. Empty batch ids and domains never match.

use std::fmt;

use serde::Serialize;
use time::OffsetDateTime;
use url::form_urlencoded;

use crate::config::FarmProfile;
use crate::model::long_date;

/// Characters of an unrecognized scan echoed back to the user.
pub const PREVIEW_LEN: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMatch {
    CurrentBatch,
    DifferentBatch,
}

impl fmt::Display for BatchMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BatchMatch::CurrentBatch => "current batch",
            BatchMatch::DifferentBatch => "different batch",
        })
    }
}

/// Display fields extracted from an accepted scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedProduct {
    pub batch_id: String,
    pub farm: String,
    pub farmer: String,
    pub product: String,
    pub location: String,
    pub harvest: String,
    pub step: String,
    pub batch_match: BatchMatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Match(VerifiedProduct),
    NoMatch { preview: String },
}

impl Verdict {
    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::Match(_))
    }
}

/// What the scan is matched against.
#[derive(Debug, Clone, Copy)]
pub struct VerifyContext<'a> {
    pub current_batch: &'a str,
    pub current_step: u8,
    pub profile: &'a FarmProfile,
}

pub fn classify(scanned: &str, ctx: &VerifyContext<'_>) -> Verdict {
    let domain = ctx.profile.verify_domain.as_str();
    let has_batch = !ctx.current_batch.is_empty() && scanned.contains(ctx.current_batch);
    let has_domain = !domain.is_empty() && scanned.contains(domain);
    if !has_batch && !has_domain {
        return Verdict::NoMatch {
            preview: preview(scanned),
        };
    }

    let batch_id = if has_batch {
        ctx.current_batch.to_string()
    } else {
        batch_after_domain(scanned, domain).unwrap_or_else(|| ctx.profile.placeholder_batch())
    };
    let batch_match = if batch_id == ctx.current_batch {
        BatchMatch::CurrentBatch
    } else {
        BatchMatch::DifferentBatch
    };

    let query = scanned.split('?').nth(1).unwrap_or_default();
    let field = |key: &str, default: &str| param(query, key).unwrap_or_else(|| default.to_string());

    Verdict::Match(VerifiedProduct {
        farm: field("farm", &ctx.profile.farm),
        farmer: field("farmer", &ctx.profile.farmer),
        product: field("product", &ctx.profile.product),
        location: field("location", &ctx.profile.location),
        harvest: field("harvest", &long_date(OffsetDateTime::now_utc())),
        step: field("step", &ctx.current_step.to_string()),
        batch_id,
        batch_match,
    })
}

/// First occurrence of `key`; an empty value counts as absent.
fn param(query: &str, key: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// Path segment following `<domain>/`, if any.
fn batch_after_domain(scanned: &str, domain: &str) -> Option<String> {
    let start = scanned.find(domain)? + domain.len();
    let rest = scanned[start..].strip_prefix('/')?;
    let segment = rest.split(['?', '/', '#']).next().unwrap_or_default();
    (!segment.is_empty()).then(|| segment.to_string())
}

fn preview(scanned: &str) -> String {
    let mut out: String = scanned.chars().take(PREVIEW_LEN).collect();
    if scanned.chars().count() > PREVIEW_LEN {
        out.push_str("...");
    }
    out
}
