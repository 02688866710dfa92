//! `Link` header pagination for list endpoints.
//!
//! While more results remain, the registry answers with
//! `Link: </v2/...?last=foo&n=100>; rel="next"` (RFC 5988). Targets may be
//! relative and resolve against the registry base.

use http::header::LINK;
use http::{HeaderMap, Uri};
use url::Url;

use crate::error::RegistryError;

/// Extract the `rel="next"` target from a response, resolved absolute.
pub(crate) fn next_page(base: &Url, headers: &HeaderMap) -> Result<Option<Uri>, RegistryError> {
    for value in headers.get_all(LINK) {
        let value = value.to_str().map_err(|_| {
            RegistryError::InvalidPaginationLink("Link header is not ASCII".to_owned())
        })?;

        for link in split_link_values(value) {
            let link = link.trim();
            if link.is_empty() {
                continue;
            }

            let Some(rest) = link.strip_prefix('<') else {
                return Err(RegistryError::InvalidPaginationLink(link.to_owned()));
            };
            let Some((target, params)) = rest.split_once('>') else {
                return Err(RegistryError::InvalidPaginationLink(link.to_owned()));
            };

            if !rel_is_next(params) {
                continue;
            }

            let resolved = base
                .join(target)
                .map_err(|error| RegistryError::InvalidPaginationLink(error.to_string()))?;
            let uri = resolved
                .as_str()
                .parse()
                .map_err(|_| RegistryError::InvalidPaginationLink(resolved.into()))?;
            return Ok(Some(uri));
        }
    }

    Ok(None)
}

/// Split a `Link` header into link-values, honoring `<…>` sections where
/// commas are part of the target.
fn split_link_values(header: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_target = false;

    for (idx, c) in header.char_indices() {
        match c {
            '<' => in_target = true,
            '>' => in_target = false,
            ',' if !in_target => {
                parts.push(&header[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }

    parts.push(&header[start..]);
    parts
}

fn rel_is_next(params: &str) -> bool {
    params.split(';').any(|param| {
        param
            .trim()
            .strip_prefix("rel=")
            .map(|rel| rel.trim_matches('"').eq_ignore_ascii_case("next"))
            .unwrap_or(false)
    })
}
