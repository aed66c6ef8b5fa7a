// Stable client identifier sent to the cloud as `deviceToken`.

use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::info;

use crate::error::CoreError;
use crate::namespace::APP_ID;
use crate::store::{ObjectMeta, StateStore, StateValue, ValueKind};

pub const APP_ID_LEN: usize = 64;

pub fn generate() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(APP_ID_LEN)
        .map(char::from)
        .collect()
}

/// Read the persisted id, generating and persisting one on first use.
pub async fn load_or_create(store: &dyn StateStore) -> Result<String, CoreError> {
    if let Some(state) = store.get_state(APP_ID).await? {
        if let StateValue::Text(id) = state.value {
            if !id.is_empty() {
                return Ok(id);
            }
        }
    }

    let id = generate();
    store
        .ensure_object(APP_ID, ObjectMeta::state("App ID", ValueKind::String, false))
        .await?;
    store.set_state(APP_ID, StateValue::Text(id.clone()), true).await?;
    info!("generated new app id");
    Ok(id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn generated_ids_are_alphanumeric() {
        let id = generate();
        assert_eq!(id.len(), APP_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn id_is_created_once() {
        let store = MemoryStore::new();
        let first = load_or_create(&store).await.unwrap();
        let second = load_or_create(&store).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.value(APP_ID), Some(StateValue::Text(first)));
    }
}
