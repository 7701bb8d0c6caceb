/// User namespace repair
///
/// Guarantees that every known user owns a complete set of module
/// collections. Repair is additive: unknown users and unknown keys are
/// never removed.
use tracing::info;

use super::data::{Store, UserRecord};

/// Users created when the store has none
pub const DEFAULT_USERS: [&str; 3] = ["Manthan", "Vihan", "Nemi"];

/// Repair `store` in place and hand it back
///
/// Uses [`DEFAULT_USERS`] when the user list is empty.
pub fn ensure_shape(store: &mut Store) -> &mut Store {
    let defaults: Vec<String> = DEFAULT_USERS.iter().map(|name| name.to_string()).collect();
    ensure_shape_with(store, &defaults)
}

/// Like [`ensure_shape`], with a configured default user list
pub fn ensure_shape_with<'a>(store: &'a mut Store, default_users: &[String]) -> &'a mut Store {
    if store.users.is_empty() {
        info!("No users in store, resetting to {:?}", default_users);
        store.users = default_users.to_vec();
    }

    for user in &store.users {
        if !store.data.contains_key(user) {
            info!("Creating empty record for '{}'", user);
            store.data.insert(user.clone(), UserRecord::default());
        }
    }

    store
}

/// A fresh store holding only the default users
pub fn default_store(default_users: &[String]) -> Store {
    let mut store = Store::default();
    ensure_shape_with(&mut store, default_users);
    store
}
