//! Endpoint connection and collection resolution

use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use mongodb::Client;
use mongoferry_types::{CollectionSelection, ConnectionEndpoint, Error, Result};
use std::time::Duration;
use tracing::debug;

/// Connect to an endpoint and confirm reachability with a ping.
///
/// Raised before any mutation begins: an unreachable or unauthorized
/// endpoint surfaces as [`Error::Connectivity`] here, never later in
/// the middle of a copy.
pub async fn connect(endpoint: &ConnectionEndpoint, timeout: Duration) -> Result<Client> {
    let mut options = ClientOptions::parse(endpoint.uri())
        .await
        .map_err(|e| Error::connectivity(endpoint.redacted(), e.to_string()))?;
    options.server_selection_timeout = Some(timeout);

    let client = Client::with_options(options)
        .map_err(|e| Error::connectivity(endpoint.redacted(), e.to_string()))?;
    client
        .database("admin")
        .run_command(doc! { "ping": 1 })
        .await
        .map_err(|e| Error::connectivity(endpoint.redacted(), e.to_string()))?;

    debug!(endpoint = %endpoint.redacted(), "connected");
    Ok(client)
}

/// Resolve a collection selection against a live database.
///
/// `All` expands to every collection except `system.*`; explicit
/// selections are returned as given. Selection validity has already
/// been checked spec-side; this only needs the database for `All`.
pub async fn resolve_collections(
    client: &Client,
    database: &str,
    selection: &CollectionSelection,
) -> Result<Vec<String>> {
    match selection {
        CollectionSelection::One(name) => Ok(vec![name.clone()]),
        CollectionSelection::Many(names) => Ok(names.clone()),
        CollectionSelection::All => {
            let mut names = client
                .database(database)
                .list_collection_names()
                .await
                .map_err(|e| Error::connectivity(database, e.to_string()))?;
            names.retain(|name| !name.starts_with("system."));
            names.sort();
            if names.is_empty() {
                return Err(Error::validation(format!(
                    "database '{database}' has no collections to copy"
                )));
            }
            Ok(names)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_endpoint_is_a_connectivity_error() {
        // Reserved TEST-NET address, nothing listens there.
        let endpoint = ConnectionEndpoint::new("mongodb://192.0.2.1:27017/db", "db");
        let err = connect(&endpoint, Duration::from_millis(200)).await.unwrap_err();
        assert_eq!(err.kind(), mongoferry_types::ErrorKind::Connectivity);
    }
}
