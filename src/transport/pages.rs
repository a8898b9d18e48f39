//! Listings split across `Link: rel="next"` pages.

use std::collections::HashSet;

use serde::de::DeserializeOwned;

use super::{HubRequest, Transport};
use crate::error::{HubError, Result};

/// Fetch `first` and every page after it, concatenated in order.
///
/// With `cap`, stops once that many items were collected. Any failing page
/// fails the whole listing; nothing partial is returned.
pub async fn fetch_all<T: DeserializeOwned>(
    transport: &dyn Transport,
    first: HubRequest,
    cap: Option<usize>,
) -> Result<Vec<T>> {
    let mut items: Vec<T> = Vec::new();
    let mut seen = HashSet::new();
    let mut request = first;

    loop {
        let response = transport.execute(request.clone()).await?;
        let page: Vec<T> = response.json()?;
        items.extend(page);

        if let Some(cap) = cap {
            if items.len() >= cap {
                items.truncate(cap);
                return Ok(items);
            }
        }

        let Some(link) = response.next_link() else {
            return Ok(items);
        };
        if !seen.insert(link.clone()) {
            return Err(HubError::InconsistentState(format!(
                "Pagination loops back to {}",
                link
            )));
        }
        request = request.follow(&link).ok_or_else(|| {
            HubError::InconsistentState(format!("Unusable next-page link '{}'", link))
        })?;
        tracing::debug!("Following next page of {}", request.path());
    }
}
