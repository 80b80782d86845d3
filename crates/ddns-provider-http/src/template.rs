//! Endpoint template rendering
//!
//! Templates are plain URLs with `{name}` placeholders. Every substituted
//! value is percent-encoded.

use ddns_core::traits::UpdateRequest;
use ddns_core::{Error, Result};
use std::borrow::Cow;

/// Placeholders understood by [`render`]
pub const PLACEHOLDERS: &[&str] = &["hostname", "address", "username", "credential", "record_id", "ttl"];

/// What the credential is replaced with in log output
const REDACTED: &str = "REDACTED";

/// Render the request URL
pub fn render(template: &str, request: &UpdateRequest) -> Result<String> {
    expand(template, |name| value(name, request, false))
}

/// Render the request URL with the credential masked, for logs and errors
pub fn redacted(template: &str, request: &UpdateRequest) -> Result<String> {
    expand(template, |name| value(name, request, true))
}

/// Check that a template only uses known placeholders and is well-formed
pub fn validate(template: &str) -> Result<()> {
    expand(template, |name| {
        if PLACEHOLDERS.contains(&name) {
            Ok(Cow::Borrowed(""))
        } else {
            Err(unknown(name))
        }
    })
    .map(|_| ())
}

/// Whether the template needs a provider-side record id
pub fn uses_record_id(template: &str) -> bool {
    template.contains("{record_id}")
}

fn expand<'a, F>(template: &str, mut lookup: F) -> Result<String>
where
    F: FnMut(&str) -> Result<Cow<'a, str>>,
{
    let mut rendered = String::with_capacity(template.len() + 64);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            Error::config(format!(
                "Unclosed placeholder in endpoint template near '{}'",
                &rest[open..]
            ))
        })?;

        rendered.push_str(&lookup(&after[..close])?);
        rest = &after[close + 1..];
    }

    rendered.push_str(rest);
    Ok(rendered)
}

fn value<'a>(name: &str, request: &'a UpdateRequest, redact: bool) -> Result<Cow<'a, str>> {
    let provider = &request.provider;

    let value = match name {
        "hostname" => urlencoding::encode(&request.hostname),
        "address" => Cow::Owned(urlencoding::encode(&request.address.to_string()).into_owned()),
        "username" => urlencoding::encode(&provider.username),
        "credential" if redact => Cow::Borrowed(REDACTED),
        "credential" => urlencoding::encode(&provider.credential),
        "record_id" => match provider.record_id.as_deref() {
            Some(id) if !id.trim().is_empty() => urlencoding::encode(id),
            _ => {
                return Err(Error::config(
                    "Endpoint template uses {record_id} but no record id is configured",
                ));
            }
        },
        "ttl" => Cow::Owned(provider.ttl.to_string()),
        other => return Err(unknown(other)),
    };

    Ok(value)
}

fn unknown(name: &str) -> Error {
    Error::config(format!(
        "Unknown placeholder '{{{}}}' in endpoint template. Valid: {}",
        name,
        PLACEHOLDERS.join(", ")
    ))
}
