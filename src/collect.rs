use std::future::Future;

use tracing::{debug, error};

use crate::error::Error;

/// Collects every item of an offset/limit paginated query.
///
/// Pages are fetched starting at offset 0, with the offset advanced to the
/// number of items collected so far, until an empty page is returned. A fetch
/// error ends the loop early: the failure is logged and whatever was
/// accumulated is returned, since a partial (or empty) result is a valid,
/// degraded outcome for the aggregation. There is no retry.
pub async fn collect_paginated<T, F, Fut>(what: &'static str, fetch: F) -> Vec<T>
where
    F: Fn(u64) -> Fut,
    Fut: Future<Output = Result<Vec<T>, Error>>,
{
    let mut items: Vec<T> = Vec::new();

    loop {
        let page = match fetch(items.len() as u64).await {
            Ok(page) => page,
            Err(err) => {
                error!(what, %err, "could not fetch page, keeping items collected so far");
                break;
            }
        };

        if page.is_empty() {
            break;
        }
        items.extend(page);
    }

    debug!(what, total = items.len(), "finished paginated query");
    items
}
