use super::notion::normalize_page_id;
use super::{RemoteClient, TargetInfo};
use crate::core::connection::{Connection, ConnectionConfig, ConnectionKind, NewConnection};
use crate::error::{RemoteError, SyncError};
use crate::store::Store;

/// Check the credentials against the target page and save a connection only
/// if the check passes. `name` defaults to the page title.
pub async fn connect<S: Store, R: RemoteClient>(
    store: &S,
    remote: &R,
    name: Option<String>,
    token: &str,
    page: &str,
) -> Result<(Connection, TargetInfo), SyncError> {
    let page_id = normalize_page_id(page).ok_or_else(|| {
        RemoteError::InvalidTarget(format!("'{}' is not a Notion page id or URL", page))
    })?;
    let config = ConnectionConfig {
        token: token.trim().to_string(),
        page_id,
    };

    let info = remote.test_connection(&config).await?;
    log::info!(
        "Connection test passed for '{}' ({} properties)",
        info.title,
        info.property_names.len()
    );

    let connection = store
        .create_connection(NewConnection {
            kind: ConnectionKind::Notion,
            name: name.unwrap_or_else(|| info.title.clone()),
            config,
            enabled: true,
        })
        .await?;
    Ok((connection, info))
}
