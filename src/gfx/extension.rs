// Extension and layer negotiation
//
// A request is a name plus whether it is required. Negotiation keeps the
// requests the implementation offers, drops absent optional ones and fails
// on the first absent required one.

use std::collections::HashSet;
use std::fmt;

use super::GfxError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRequest {
    pub name: String,
    pub required: bool,
}

impl ExtensionRequest {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Extension,
    Layer,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Extension => f.write_str("extension"),
            RequestKind::Layer => f.write_str("layer"),
        }
    }
}

/// Collapse repeated names, keeping first-seen order. A name requested
/// more than once is required if any of its requests is.
pub fn merge_requests(requested: &[ExtensionRequest]) -> Vec<ExtensionRequest> {
    let mut merged: Vec<ExtensionRequest> = Vec::with_capacity(requested.len());
    for request in requested {
        match merged.iter_mut().find(|r| r.name == request.name) {
            Some(existing) => existing.required |= request.required,
            None => merged.push(request.clone()),
        }
    }
    merged
}

/// Intersect `requested` with `available`.
///
/// Returns the enabled names in request order.
pub fn negotiate<'a, I>(
    kind: RequestKind,
    available: I,
    requested: &[ExtensionRequest],
) -> Result<Vec<String>, GfxError>
where
    I: IntoIterator<Item = &'a str>,
{
    let available: HashSet<&str> = available.into_iter().collect();
    let mut enabled = Vec::new();

    for request in merge_requests(requested) {
        if available.contains(request.name.as_str()) {
            enabled.push(request.name);
        } else if request.required {
            return Err(match kind {
                RequestKind::Extension => GfxError::MissingExtension(request.name),
                RequestKind::Layer => GfxError::MissingLayer(request.name),
            });
        } else {
            log::info!("Optional {} {} is not available, skipping", kind, request.name);
        }
    }

    Ok(enabled)
}
